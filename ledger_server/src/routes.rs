//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two MUST go into a separate module.
//!
//! Every handler is async. The ledger APIs only ever await the database or the transfer provider, so a handler never
//! blocks the worker thread it runs on.
//!
//! Two groups of routes are guarded by shared secrets:
//! * `/cron/*` needs `x-cron-secret`. These are the hooks an external scheduler calls to drive the escrow workers.
//! * `/withdrawals/*` needs `x-admin-secret`. These are the actions the operations team takes on withdrawal requests.
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use ledger_common::Usd;
use ledger_engine::{
    ledger_api::action::INVALID_AMOUNT,
    traits::{EscrowManagement, JobManagement, OrderManagement, WithdrawalManagement},
    ActionResult,
    SchedulerApi,
    TransferProvider,
    WithdrawalApi,
};
use log::*;

use crate::{
    config::AccessSecrets,
    data_objects::{CronJob, KindParam, RejectionParams, WithdrawalParams},
    errors::ServerError,
    helpers::{action_response, require_secret, ADMIN_SECRET_HEADER, CRON_SECRET_HEADER},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:path),+ ; $provider:path) => {
        paste::paste! { pub struct [<$name:camel Route>]<B, T>(core::marker::PhantomData<fn() -> (B, T)>);}
        paste::paste! { impl<B, T> [<$name:camel Route>]<B, T> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> (B, T)>)
            }
        }}
        paste::paste! { impl<B, T> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B, T>
        where
            B: $($bounds +)+ 'static,
            T: $provider + 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<B, T>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:path),+) => {
        paste::paste! { pub struct [<$name:camel Route>]<B>(core::marker::PhantomData<fn() -> B>);}
        paste::paste! { impl<B> [<$name:camel Route>]<B> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> B>)
            }
        }}
        paste::paste! { impl<B> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B>
        where
            B: $($bounds +)+ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<B>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Cron  ----------------------------------------------------
route!(cron_job => Post "/cron/{job}" impl EscrowManagement, JobManagement);
/// Runs one escrow worker, or all of them in order for `/cron/all`, and returns what it did.
///
/// A worker that finds its lock held elsewhere, or nothing to do, reports `skipped: true` with a reason. That is not
/// an error.
pub async fn cron_job<B>(
    req: HttpRequest,
    path: web::Path<String>,
    secrets: web::Data<AccessSecrets>,
    api: web::Data<SchedulerApi<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: EscrowManagement + JobManagement,
{
    require_secret(&req, CRON_SECRET_HEADER, &secrets.cron)?;
    let job = path.into_inner().parse::<CronJob>()?;
    debug!("💻️ Cron trigger for {job}");
    let now = Utc::now();
    let result = match job {
        CronJob::All => {
            let reports = api.run_all(now).await;
            return Ok(HttpResponse::Ok().json(reports));
        },
        CronJob::EscrowPayouts => api.process_escrow_payouts(now).await?,
        CronJob::SellerGroups => api.release_eligible_seller_groups(now).await?,
        CronJob::RiderPayouts => api.release_eligible_rider_payouts(now).await?,
        CronJob::HubTimeouts => api.process_hub_timeouts(now).await?,
        CronJob::FinalizeDelivered => api.finalize_delivered_orders(now).await?,
        CronJob::EscrowSnapshot => api.create_daily_escrow_snapshot(now).await?,
    };
    Ok(HttpResponse::Ok().json(result))
}

//----------------------------------------------   Withdrawals  ----------------------------------------------------
route!(request_withdrawal => Post "/withdrawals/{kind}"
    impl WithdrawalManagement, OrderManagement; TransferProvider);
/// Opens a withdrawal for the user in the body and reserves the funds in their wallet.
///
/// `amount` is in dollars with at most two decimal places.
pub async fn request_withdrawal<B, T>(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<WithdrawalParams>,
    secrets: web::Data<AccessSecrets>,
    api: web::Data<WithdrawalApi<B, T>>,
) -> Result<HttpResponse, ServerError>
where
    B: WithdrawalManagement + OrderManagement,
    T: TransferProvider,
{
    require_secret(&req, ADMIN_SECRET_HEADER, &secrets.admin)?;
    let KindParam(kind) = path.into_inner().parse()?;
    let params = body.into_inner();
    debug!("💻️ {kind} withdrawal request from user #{} for ${}", params.user_id, params.amount);
    let amount = match Usd::try_from(params.amount) {
        Ok(amount) => amount,
        Err(e) => return Ok(action_response(ActionResult::<()>::failure(INVALID_AMOUNT, e.to_string()))),
    };
    let result = api.request_withdrawal(kind, params.user_id, amount, params.method).await;
    Ok(action_response(result))
}

route!(approve_withdrawal => Post "/withdrawals/{kind}/{id}/approve"
    impl WithdrawalManagement, OrderManagement; TransferProvider);
/// Pays out a pending withdrawal. A declined transfer rejects the withdrawal and returns the funds to the wallet. If
/// the provider cannot be reached the response is a 503 and the withdrawal stays PROCESSING for another approval.
pub async fn approve_withdrawal<B, T>(
    req: HttpRequest,
    path: web::Path<(String, i64)>,
    secrets: web::Data<AccessSecrets>,
    api: web::Data<WithdrawalApi<B, T>>,
) -> Result<HttpResponse, ServerError>
where
    B: WithdrawalManagement + OrderManagement,
    T: TransferProvider,
{
    require_secret(&req, ADMIN_SECRET_HEADER, &secrets.admin)?;
    let (kind, id) = path.into_inner();
    let KindParam(kind) = kind.parse()?;
    info!("💻️ Approving {kind} withdrawal #{id}");
    let result = api.approve_withdrawal(kind, id).await;
    Ok(action_response(result))
}

route!(reject_withdrawal => Post "/withdrawals/{kind}/{id}/reject"
    impl WithdrawalManagement, OrderManagement; TransferProvider);
/// Rejects a PENDING withdrawal. One that is already PROCESSING gets INVALID_STATE.
pub async fn reject_withdrawal<B, T>(
    req: HttpRequest,
    path: web::Path<(String, i64)>,
    body: web::Json<RejectionParams>,
    secrets: web::Data<AccessSecrets>,
    api: web::Data<WithdrawalApi<B, T>>,
) -> Result<HttpResponse, ServerError>
where
    B: WithdrawalManagement + OrderManagement,
    T: TransferProvider,
{
    require_secret(&req, ADMIN_SECRET_HEADER, &secrets.admin)?;
    let (kind, id) = path.into_inner();
    let KindParam(kind) = kind.parse()?;
    info!("💻️ Rejecting {kind} withdrawal #{id}");
    let result = api.reject_withdrawal(kind, id, &body.reason).await;
    Ok(action_response(result))
}

route!(user_withdrawals => Get "/withdrawals/user/{user_id}"
    impl WithdrawalManagement, OrderManagement; TransferProvider);
pub async fn user_withdrawals<B, T>(
    req: HttpRequest,
    path: web::Path<i64>,
    secrets: web::Data<AccessSecrets>,
    api: web::Data<WithdrawalApi<B, T>>,
) -> Result<HttpResponse, ServerError>
where
    B: WithdrawalManagement + OrderManagement,
    T: TransferProvider,
{
    require_secret(&req, ADMIN_SECRET_HEADER, &secrets.admin)?;
    let user_id = path.into_inner();
    trace!("💻️ GET withdrawals for user #{user_id}");
    let withdrawals = api.withdrawals_for_user(user_id).await?;
    Ok(HttpResponse::Ok().json(withdrawals))
}
