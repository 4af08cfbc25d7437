mod cron;
mod helpers;
mod withdrawals;
