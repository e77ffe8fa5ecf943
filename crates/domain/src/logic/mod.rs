//! Request-scoped actions. Each one sanitizes its input on construction, then
//! runs through [`run_logic`]: rate limit, `raise_concerns`, `process` and
//! finally `success_data`.

mod brand;
mod domains;
mod feedback;
mod repository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::SiteConfig;
use crate::model::{BrandError, Caller, LogoError};
use crate::services::rate_limit::{RateBucket, RateLimited, RateLimiter};
use crate::services::validation::DomainValidator;
use crate::storage::{FeedbackStore, RecordStore, StorageError};

pub use brand::{GetDomainBrand, GetDomainLogo, RemoveDomainLogo, UpdateDomainBrand, UpdateDomainLogo};
pub use domains::{AddDomain, DomainParams, GetDomain, ListDomains, RemoveDomain, VerifyDomain};
pub use feedback::{FeedbackParams, ReceiveFeedback};
pub use repository::DomainRepository;

#[derive(Debug, Error)]
pub enum LogicError {
    /// Invalid input; the message is shown to the user as is.
    #[error("{0}")]
    Form(String),
    /// The caller may not perform the action.
    #[error("{0}")]
    Verification(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    RateLimited(#[from] RateLimited),
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
    #[error("upstream failure: {0}")]
    Upstream(String),
}

impl LogicError {
    pub fn form(message: impl Into<String>) -> Self {
        Self::Form(message.into())
    }
}

impl From<BrandError> for LogicError {
    fn from(value: BrandError) -> Self {
        Self::Form(value.to_string())
    }
}

impl From<LogoError> for LogicError {
    fn from(value: LogoError) -> Self {
        Self::Form(value.to_string())
    }
}

impl From<getrandom::Error> for LogicError {
    fn from(value: getrandom::Error) -> Self {
        Self::Upstream(format!("random source: {value}"))
    }
}

/// Everything a successful action hands back to the dispatch layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessData {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    pub details: Map<String, Value>,
}

impl SuccessData {
    pub fn record(record: Value) -> Self {
        Self {
            success: true,
            record: Some(record),
            records: None,
            count: None,
            details: Map::new(),
        }
    }

    pub fn records(records: Vec<Value>) -> Self {
        Self {
            success: true,
            record: None,
            count: Some(records.len()),
            records: Some(records),
            details: Map::new(),
        }
    }

    pub fn empty() -> Self {
        Self::record(Value::Object(Map::new()))
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Storage surface the actions need.
pub trait Backend: RecordStore + FeedbackStore {}

impl<T: RecordStore + FeedbackStore + ?Sized> Backend for T {}

/// Collaborators of one action invocation, passed explicitly.
#[derive(Clone, Copy)]
pub struct LogicContext<'a> {
    pub store: &'a dyn Backend,
    pub site: &'a SiteConfig,
    pub limiter: &'a RateLimiter,
    pub validator: &'a dyn DomainValidator,
    pub caller: &'a Caller,
    pub now: DateTime<Utc>,
}

impl<'a> LogicContext<'a> {
    pub fn domains(&self) -> DomainRepository<'a> {
        DomainRepository::new(self.store, self.site.record_ttl())
    }

    /// Customer id of the caller, refusing anonymous visitors.
    pub fn require_customer(&self) -> Result<&'a str, LogicError> {
        self.caller
            .custid()
            .ok_or_else(|| LogicError::Verification("Sign in to manage domains".to_string()))
    }
}

#[async_trait]
pub trait Logic: Send {
    /// Rate-limit bucket charged once per invocation.
    const BUCKET: RateBucket;

    async fn raise_concerns(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError>;

    async fn process(&mut self, ctx: &LogicContext<'_>) -> Result<(), LogicError>;

    fn success_data(&self) -> SuccessData;
}

pub async fn run_logic<L: Logic>(
    mut logic: L,
    ctx: &LogicContext<'_>,
) -> Result<SuccessData, LogicError> {
    ctx.limiter
        .limit_action(L::BUCKET, ctx.caller.identifier())?;
    logic.raise_concerns(ctx).await?;
    logic.process(ctx).await?;
    debug!(bucket = L::BUCKET.name(), "logic processed");
    Ok(logic.success_data())
}

/// Normalizes a domain name taken from a path or form field for lookups.
pub(crate) fn lookup_name(raw: &str) -> String {
    match crate::model::DisplayDomain::parse(raw) {
        Ok(parsed) => parsed.as_str().to_owned(),
        Err(_) => raw.trim().to_ascii_lowercase(),
    }
}

/// Serializes a model for a response body.
pub(crate) fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
