use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use ledger_engine::{
    db_types::{NewUser, UserRole},
    traits::OrderManagement,
    CommissionRates,
    EscrowFlowApi,
    SchedulerApi,
    SqliteDatabase,
    TransferProvider,
    WithdrawalApi,
};
use log::*;
use stripe_tools::StripeApi;

use crate::{
    config::{AccessSecrets, ServerConfig},
    errors::ServerError,
    integrations::stripe::StripeTransfers,
    routes::{
        health,
        ApproveWithdrawalRoute,
        CronJobRoute,
        RejectWithdrawalRoute,
        RequestWithdrawalRoute,
        UserWithdrawalsRoute,
    },
    scheduler_worker::start_scheduler_worker,
};

const TREASURY_USER_NAME: &str = "Platform escrow";

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let rates = config.commission_rates()?;
    let db = open_database(&config.database_url).await?;
    check_treasury(&db, config.treasury_user_id).await?;
    if !config.stripe_config.is_configured() {
        warn!("🚨️ No Stripe secret key is configured. Every withdrawal approval will fail and be rejected.");
    }
    let stripe =
        StripeApi::new(config.stripe_config.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let transfers = StripeTransfers::new(stripe);
    let scheduler = scheduler_api(&db, &config, rates);
    if let Some(period) = config.scheduler_interval {
        let _ = start_scheduler_worker(scheduler.clone(), period);
    }
    let srv = create_server_instance(config, db, scheduler, transfers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn create_server_instance<T>(
    config: ServerConfig,
    db: SqliteDatabase,
    scheduler: SchedulerApi<SqliteDatabase>,
    transfers: T,
) -> Result<Server, ServerError>
where
    T: TransferProvider + Clone + Send + 'static,
{
    let secrets = AccessSecrets::from_config(&config);
    let treasury_user_id = config.treasury_user_id;
    let policy = config.policy;
    let srv = HttpServer::new(move || {
        let withdrawals = WithdrawalApi::new(db.clone(), transfers.clone(), treasury_user_id, policy);
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("ledger::access_log"))
            .app_data(web::Data::new(secrets.clone()))
            .app_data(web::Data::new(scheduler.clone()))
            .app_data(web::Data::new(withdrawals))
            .configure(configure_routes::<T>)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    info!("🚀️ Listening on {}:{}", config.host, config.port);
    Ok(srv)
}

/// Registers every route. The app must carry [`AccessSecrets`], a [`SchedulerApi`] and a [`WithdrawalApi`] as data.
pub fn configure_routes<T>(cfg: &mut web::ServiceConfig)
where T: TransferProvider + 'static {
    let json_config =
        web::JsonConfig::default().error_handler(|e, _req| ServerError::InvalidRequestBody(e.to_string()).into());
    cfg.app_data(json_config)
        .service(health)
        .service(CronJobRoute::<SqliteDatabase>::new())
        .service(UserWithdrawalsRoute::<SqliteDatabase, T>::new())
        .service(RequestWithdrawalRoute::<SqliteDatabase, T>::new())
        .service(ApproveWithdrawalRoute::<SqliteDatabase, T>::new())
        .service(RejectWithdrawalRoute::<SqliteDatabase, T>::new());
}

pub fn scheduler_api(
    db: &SqliteDatabase,
    config: &ServerConfig,
    rates: CommissionRates,
) -> SchedulerApi<SqliteDatabase> {
    let flow = EscrowFlowApi::new(db.clone(), config.treasury_user_id, rates, config.policy);
    SchedulerApi::new(flow)
}

async fn open_database(url: &str) -> Result<SqliteDatabase, ServerError> {
    SqliteDatabase::create_database_if_not_exist(url).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let db = SqliteDatabase::new_with_url(url, 25).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    Ok(db)
}

/// Every escrowed cent sits in the treasury wallet. On a fresh database the treasury user is created; otherwise the
/// configured user must already exist.
async fn check_treasury(db: &SqliteDatabase, treasury_user_id: i64) -> Result<(), ServerError> {
    let user = match db.fetch_user(treasury_user_id).await.map_err(|e| ServerError::InitializeError(e.to_string()))? {
        Some(user) => user,
        None => {
            warn!("🚀️ Treasury user #{treasury_user_id} does not exist. Creating it.");
            let new_user = NewUser::new(TREASURY_USER_NAME, UserRole::Platform);
            db.create_user(new_user).await.map_err(|e| ServerError::InitializeError(e.to_string()))?
        },
    };
    if user.id != treasury_user_id {
        return Err(ServerError::ConfigurationError(format!(
            "The treasury user was created as #{} but LEDGER_TREASURY_USER_ID is {treasury_user_id}. Set \
             LEDGER_TREASURY_USER_ID to the platform escrow account.",
            user.id
        )));
    }
    info!("🚀️ Treasury account is #{} ({})", user.id, user.name);
    Ok(())
}
