//! # Ledger server
//! This crate hosts the HTTP process for the marketplace ledger. It is responsible for:
//! * Running the escrow workers on a timer, and on demand through the cron routes.
//! * Accepting withdrawal requests from sellers and riders, and the approve and reject decisions on them.
//! * Sending approved withdrawals to Stripe Connect.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `GET /health`: A health check route that returns a 200 OK response.
//! * `POST /cron/{job}`: Runs one escrow worker (or `all` of them). Requires `x-cron-secret`.
//! * `POST /withdrawals/{kind}`: Requests a withdrawal. `kind` is `seller` or `rider`. Requires `x-admin-secret`.
//! * `POST /withdrawals/{kind}/{id}/approve` and `POST /withdrawals/{kind}/{id}/reject`: Decides on a withdrawal.
//!   Requires `x-admin-secret`.
//! * `GET /withdrawals/user/{user_id}`: Lists a user's withdrawals. Requires `x-admin-secret`.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod routes;
pub mod scheduler_worker;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
