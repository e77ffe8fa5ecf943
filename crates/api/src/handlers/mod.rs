pub mod brand;
pub mod domains;
pub mod feedback;
pub mod metrics;
pub mod notice;

pub use brand::{
    get_domain_brand_handler, get_domain_logo_handler, remove_domain_logo_handler,
    update_domain_brand_handler, update_domain_logo_handler,
};
pub use domains::{
    add_domain_handler, get_domain_handler, list_domains_handler, remove_domain_handler,
    verify_domain_handler,
};
pub use feedback::{authenticity_challenge_handler, receive_feedback_handler};
pub use metrics::metrics_handler;
pub use notice::{get_notice_handler, post_notice_handler};

use std::net::IpAddr;

use actix_web::{http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use ::metrics::counter;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::error;

use vanish_domain::config::SiteConfig;
use vanish_domain::logic::{run_logic, Logic, LogicError, SuccessData};
use vanish_domain::model::Caller;

use crate::state::AppState;

/// Header set by the authenticating proxy in front of the service. Only
/// honoured when the peer is a trusted proxy.
pub const CUSTOMER_HEADER: &str = "X-Customer-Id";
pub const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

const UNKNOWN_CLIENT: &str = "unknown";

const RETRIEVE_FAILURE: &str = "Could not retrieve records.";
const RATE_LIMITED_MESSAGE: &str = "Cripes! You have been rate limited.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Form(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Failure(String),
}

impl ApiError {
    /// Maps a logic failure. Storage and upstream detail is logged and
    /// replaced by the action's fixed failure message.
    pub fn from_logic(err: LogicError, failure_message: &str) -> Self {
        match err {
            LogicError::Form(message) => ApiError::Form(message),
            LogicError::Verification(message) => ApiError::Forbidden(message),
            LogicError::NotFound(message) => ApiError::NotFound(message),
            LogicError::RateLimited(_) => ApiError::RateLimited(RATE_LIMITED_MESSAGE.to_string()),
            LogicError::Storage(err) => {
                error!(%err, "storage failure while processing request");
                ApiError::Failure(failure_message.to_string())
            }
            LogicError::Upstream(detail) => {
                error!(%detail, "upstream failure while processing request");
                ApiError::Failure(failure_message.to_string())
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Form(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Failure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            message: self.to_string(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

/// Identity of the requester. The client address is the socket peer unless
/// that peer is a trusted proxy, in which case forwarded headers and the
/// customer id from [`CUSTOMER_HEADER`] are accepted.
///
/// Unix socket connections carry no peer address; only local processes can
/// reach them, so they are treated as the proxy.
pub fn caller_from_request(req: &HttpRequest, site: &SiteConfig) -> Caller {
    let peer = req.peer_addr().map(|addr| addr.ip());
    if let Some(peer) = peer {
        if !site.is_trusted_proxy(peer) {
            return Caller::anonymous(peer.to_string());
        }
    }

    let ip = forwarded_client(req, site)
        .or(peer)
        .map_or_else(|| UNKNOWN_CLIENT.to_owned(), |ip| ip.to_string());
    let custid = req
        .headers()
        .get(CUSTOMER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    match custid {
        Some(custid) => Caller::customer(custid, ip),
        None => Caller::anonymous(ip),
    }
}

/// Right-most `X-Forwarded-For` hop that is not itself a trusted proxy.
/// Entries further left are client-supplied and ignored.
fn forwarded_client(req: &HttpRequest, site: &SiteConfig) -> Option<IpAddr> {
    let hops: Vec<IpAddr> = req
        .headers()
        .get_all(FORWARDED_FOR_HEADER)
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|hop| hop.trim().parse().ok())
        .collect();
    hops.into_iter().rev().find(|hop| !site.is_trusted_proxy(*hop))
}

/// Runs a mutating action and reports `success_message` unless the action
/// supplied its own.
pub async fn process_action<L: Logic>(
    state: &AppState,
    caller: &Caller,
    logic: L,
    success_message: &str,
    failure_message: &str,
) -> Result<HttpResponse, ApiError> {
    dispatch(state, caller, logic, Some(success_message), failure_message).await
}

/// Runs a read-only action.
pub async fn retrieve_records<L: Logic>(
    state: &AppState,
    caller: &Caller,
    logic: L,
) -> Result<HttpResponse, ApiError> {
    dispatch(state, caller, logic, None, RETRIEVE_FAILURE).await
}

async fn dispatch<L: Logic>(
    state: &AppState,
    caller: &Caller,
    logic: L,
    success_message: Option<&str>,
    failure_message: &str,
) -> Result<HttpResponse, ApiError> {
    let ctx = state.logic_context(caller);
    match run_logic(logic, &ctx).await {
        Ok(data) => {
            counter!("api_requests_total", "action" => L::BUCKET.name(), "outcome" => "success")
                .increment(1);
            Ok(HttpResponse::Ok().json(response_body(data, caller, success_message)))
        }
        Err(err) => {
            counter!("api_requests_total", "action" => L::BUCKET.name(), "outcome" => "error")
                .increment(1);
            Err(ApiError::from_logic(err, failure_message))
        }
    }
}

fn response_body(mut data: SuccessData, caller: &Caller, success_message: Option<&str>) -> Value {
    if let Some(message) = success_message {
        data.details
            .entry("message")
            .or_insert_with(|| Value::String(message.to_string()));
    }
    let mut body = match serde_json::to_value(&data) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    body.insert(
        "custid".to_string(),
        caller
            .custid()
            .map_or(Value::Null, |custid| Value::String(custid.to_string())),
    );
    Value::Object(body)
}
