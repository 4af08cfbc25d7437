use actix_web::{http::StatusCode, HttpRequest, HttpResponse};
use ledger_common::Secret;
use ledger_engine::{
    ledger_api::action::{INTERNAL_ERROR, NOT_FOUND, TRANSFER_FAILED, TRANSFER_PENDING},
    ActionResult,
};
use log::*;
use serde::Serialize;

use crate::errors::ServerError;

pub const CRON_SECRET_HEADER: &str = "x-cron-secret";
pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

/// Checks that the request carries `secret` in the `header` header. An unset secret refuses every request.
pub fn require_secret(req: &HttpRequest, header: &'static str, secret: &Secret<String>) -> Result<(), ServerError> {
    let presented = req.headers().get(header).and_then(|v| v.to_str().ok()).unwrap_or_default();
    if secret.matches(presented) {
        Ok(())
    } else {
        let peer = req.connection_info().peer_addr().map(|a| a.to_string()).unwrap_or_else(|| "unknown".into());
        warn!("💻️ Refused {} {} from {peer}: bad or missing {header}", req.method(), req.path());
        Err(ServerError::Unauthorized(header))
    }
}

/// Wraps an action result in an HTTP response whose status reflects the result code. The body is always the result
/// itself.
pub fn action_response<T: Serialize>(result: ActionResult<T>) -> HttpResponse {
    let status = match (result.success, result.code()) {
        (true, _) => StatusCode::OK,
        (false, Some(NOT_FOUND)) => StatusCode::NOT_FOUND,
        (false, Some(INTERNAL_ERROR)) => StatusCode::INTERNAL_SERVER_ERROR,
        (false, Some(TRANSFER_FAILED)) => StatusCode::BAD_GATEWAY,
        (false, Some(TRANSFER_PENDING)) => StatusCode::SERVICE_UNAVAILABLE,
        (false, _) => StatusCode::BAD_REQUEST,
    };
    HttpResponse::build(status).json(result)
}

#[cfg(test)]
mod test {
    use actix_web::test::TestRequest;
    use ledger_engine::ledger_api::action::INSUFFICIENT_BALANCE;

    use super::*;

    #[test]
    fn secrets_must_match() {
        let secret = Secret::new("s3cret".to_string());
        let req = TestRequest::default().insert_header((CRON_SECRET_HEADER, "s3cret")).to_http_request();
        assert!(require_secret(&req, CRON_SECRET_HEADER, &secret).is_ok());
        let req = TestRequest::default().insert_header((CRON_SECRET_HEADER, "guess")).to_http_request();
        assert!(require_secret(&req, CRON_SECRET_HEADER, &secret).is_err());
        let req = TestRequest::default().to_http_request();
        assert!(require_secret(&req, CRON_SECRET_HEADER, &secret).is_err());
    }

    #[test]
    fn an_unset_secret_refuses_everything() {
        let secret = Secret::default();
        let req = TestRequest::default().insert_header((ADMIN_SECRET_HEADER, "")).to_http_request();
        assert!(require_secret(&req, ADMIN_SECRET_HEADER, &secret).is_err());
    }

    #[test]
    fn statuses_follow_codes() {
        assert_eq!(action_response(ActionResult::ok(1)).status(), StatusCode::OK);
        let failed = ActionResult::<()>::failure(INSUFFICIENT_BALANCE, "Not enough");
        assert_eq!(action_response(failed).status(), StatusCode::BAD_REQUEST);
        let missing = ActionResult::<()>::failure(NOT_FOUND, "Nope");
        assert_eq!(action_response(missing).status(), StatusCode::NOT_FOUND);
        let declined = ActionResult::failure_with(TRANSFER_FAILED, "Declined", 7);
        assert_eq!(action_response(declined).status(), StatusCode::BAD_GATEWAY);
        let retry = ActionResult::failure_with(TRANSFER_PENDING, "Provider down", 7);
        assert_eq!(action_response(retry).status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
