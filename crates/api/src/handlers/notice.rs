use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use vanish_domain::services::notices::{NoticeKind, NoticePosition};

use crate::state::AppState;

use super::ApiError;

/// Operator request for the internal listener. An empty message hides the
/// current notice.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct NoticeRequest {
    pub message: String,
    pub kind: Option<NoticeKind>,
    pub position: Option<NoticePosition>,
}

pub async fn get_notice_handler(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.notices().snapshot())
}

pub async fn post_notice_handler(
    state: web::Data<AppState>,
    payload: web::Json<NoticeRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = payload.into_inner();
    let message = request.message.trim();
    if message.is_empty() {
        state.notices().hide();
    } else {
        let kind = request
            .kind
            .ok_or_else(|| ApiError::Form("Notice kind is required".to_string()))?;
        state.notices().show(message, kind, request.position);
    }
    Ok(HttpResponse::Ok().json(state.notices().snapshot()))
}
