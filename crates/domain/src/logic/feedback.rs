use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::model::truncate_chars;
use crate::services::{authenticity::verify_solution, rate_limit::RateBucket};
use crate::storage::FeedbackStore;

use super::{Logic, LogicContext, LogicError, SuccessData};

const MAX_MESSAGE_LENGTH: usize = 999;
const MAX_PAYLOAD_LENGTH: usize = 999;
const MAX_TZ_LENGTH: usize = 64;
const MAX_VERSION_LENGTH: usize = 32;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeedbackParams {
    pub msg: String,
    pub authenticity_payload: String,
    pub tz: String,
    pub version: String,
}

/// Accepts a free-form message from a visitor. Anonymous visitors must
/// attach a solved proof-of-work challenge.
pub struct ReceiveFeedback {
    msg: String,
    authenticity_payload: String,
    tz: String,
    version: String,
}

impl ReceiveFeedback {
    pub fn new(params: FeedbackParams) -> Self {
        Self {
            msg: truncate_chars(&params.msg, MAX_MESSAGE_LENGTH),
            authenticity_payload: truncate_chars(&params.authenticity_payload, MAX_PAYLOAD_LENGTH),
            tz: truncate_chars(&params.tz, MAX_TZ_LENGTH),
            version: truncate_chars(&params.version, MAX_VERSION_LENGTH),
        }
    }

    fn format_message(&self, identifier: &str) -> String {
        format!(
            "{} [{}] [TZ: {}] [v{}]",
            self.msg, identifier, self.tz, self.version
        )
    }

    fn verify_authenticity(&self, ctx: &LogicContext<'_>) -> bool {
        let Some(secret) = ctx.site.authenticity_secret() else {
            warn!("authenticity secret not configured; rejecting anonymous feedback");
            return false;
        };
        match verify_solution(&self.authenticity_payload, secret, ctx.now) {
            Ok(_) => true,
            Err(err) => {
                debug!(%err, "authenticity payload rejected");
                false
            }
        }
    }
}

#[async_trait]
impl Logic for ReceiveFeedback {
    const BUCKET: RateBucket = RateBucket::SendFeedback;

    async fn raise_concerns(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        if self.msg.is_empty() {
            return Err(LogicError::form("You can be more original than that!"));
        }
        if ctx.caller.is_anonymous() {
            if self.authenticity_payload.is_empty() {
                return Err(LogicError::form("Cannot skip authenticity check"));
            }
            if !self.verify_authenticity(ctx) {
                return Err(LogicError::form("You need to be carbon-based to do that"));
            }
        }
        Ok(())
    }

    async fn process(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError> {
        let message = self.format_message(ctx.caller.identifier());
        ctx.store.add_feedback(message, ctx.now).await?;
        Ok(())
    }

    fn success_data(&self) -> SuccessData {
        SuccessData::empty().with_detail("message", "Message received. Send as much as you like!")
    }
}
