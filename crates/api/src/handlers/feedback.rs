use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{Duration, Utc};
use metrics::counter;
use tracing::error;
use vanish_domain::logic::{FeedbackParams, ReceiveFeedback};
use vanish_domain::services::authenticity::create_challenge;

use crate::state::AppState;

use super::{caller_from_request, process_action, ApiError};

/// Lifetime of an issued proof-of-work challenge.
const CHALLENGE_TTL_MINUTES: i64 = 20;

pub async fn receive_feedback_handler(
    req: HttpRequest,
    state: web::Data<AppState>,
    payload: web::Json<FeedbackParams>,
) -> Result<HttpResponse, ApiError> {
    let caller = caller_from_request(&req, state.site());
    process_action(
        &state,
        &caller,
        ReceiveFeedback::new(payload.into_inner()),
        "Message received. Send as much as you like!",
        "Message could not be sent.",
    )
    .await
}

pub async fn authenticity_challenge_handler(
    state: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let Some(secret) = state.site().authenticity_secret() else {
        counter!("api_challenges_total", "status" => "unconfigured").increment(1);
        return Err(ApiError::Unavailable(
            "Authenticity checks are not available.".to_string(),
        ));
    };
    let expires = Utc::now() + Duration::minutes(CHALLENGE_TTL_MINUTES);
    let challenge = create_challenge(secret, state.site().authenticity_max_number(), Some(expires))
        .map_err(|err| {
            error!(%err, "failed to issue authenticity challenge");
            ApiError::Failure("Could not create a challenge.".to_string())
        })?;
    counter!("api_challenges_total", "status" => "issued").increment(1);
    Ok(HttpResponse::Ok().json(challenge))
}
