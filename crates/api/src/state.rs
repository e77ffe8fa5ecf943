use std::sync::Arc;

use chrono::Utc;
use vanish_domain::config::SiteConfig;
use vanish_domain::logic::LogicContext;
use vanish_domain::model::Caller;
use vanish_domain::services::{
    notices::NoticeBoard, rate_limit::RateLimiter, telemetry::TelemetryGuard,
    validation::DomainValidator,
};
use vanish_storage::SeaOrmStorage;

#[derive(Clone)]
pub struct AppState {
    storage: SeaOrmStorage,
    site: Arc<SiteConfig>,
    limiter: Arc<RateLimiter>,
    validator: Arc<dyn DomainValidator>,
    notices: NoticeBoard,
    telemetry: TelemetryGuard,
}

impl AppState {
    pub fn new(
        storage: SeaOrmStorage,
        site: SiteConfig,
        validator: Arc<dyn DomainValidator>,
        telemetry: TelemetryGuard,
    ) -> Self {
        let limiter = RateLimiter::new(site.rate_limit_window());
        let notices = NoticeBoard::new(site.notice_dismiss());
        Self {
            storage,
            site: Arc::new(site),
            limiter: Arc::new(limiter),
            validator,
            notices,
            telemetry,
        }
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Arc::new(limiter);
        self
    }

    pub fn storage(&self) -> &SeaOrmStorage {
        &self.storage
    }

    pub fn site(&self) -> &SiteConfig {
        self.site.as_ref()
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }

    /// Collaborators for one logic invocation on behalf of `caller`.
    pub fn logic_context<'a>(&'a self, caller: &'a Caller) -> LogicContext<'a> {
        LogicContext {
            store: &self.storage,
            site: self.site.as_ref(),
            limiter: self.limiter.as_ref(),
            validator: self.validator.as_ref(),
            caller,
            now: Utc::now(),
        }
    }
}
