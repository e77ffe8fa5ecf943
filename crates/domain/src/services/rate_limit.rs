use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use metrics::counter;
use moka::sync::Cache;
use strum_macros::{Display, EnumIter, IntoStaticStr};
use thiserror::Error;
use tracing::warn;

/// Named buckets, one per action that can be abused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum RateBucket {
    AddDomain,
    VerifyDomain,
    RemoveDomain,
    GetDomain,
    ListDomains,
    GetDomainBrand,
    UpdateDomainBrand,
    GetDomainLogo,
    UpdateDomainLogo,
    RemoveDomainLogo,
    SendFeedback,
}

impl RateBucket {
    /// Events allowed per caller within one window.
    pub fn default_limit(self) -> u32 {
        match self {
            RateBucket::AddDomain | RateBucket::RemoveDomain => 30,
            RateBucket::VerifyDomain => 100,
            RateBucket::UpdateDomainBrand
            | RateBucket::UpdateDomainLogo
            | RateBucket::RemoveDomainLogo => 50,
            RateBucket::GetDomain
            | RateBucket::ListDomains
            | RateBucket::GetDomainBrand
            | RateBucket::GetDomainLogo => 500,
            RateBucket::SendFeedback => 10,
        }
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("rate limit exceeded for `{bucket}` ({attempts}/{limit})")]
pub struct RateLimited {
    pub bucket: RateBucket,
    pub attempts: u32,
    pub limit: u32,
}

/// Fixed-window event counter keyed by bucket and caller identity. A
/// window opens with the first event and closes `window` later.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    counters: Cache<(RateBucket, String), Arc<AtomicU32>>,
    overrides: HashMap<RateBucket, u32>,
}

impl RateLimiter {
    pub const DEFAULT_CAPACITY: u64 = 100_000;

    pub fn new(window: Duration) -> Self {
        Self {
            counters: Cache::builder()
                .time_to_live(window)
                .max_capacity(Self::DEFAULT_CAPACITY)
                .build(),
            overrides: HashMap::new(),
        }
    }

    pub fn with_limit(mut self, bucket: RateBucket, limit: u32) -> Self {
        self.overrides.insert(bucket, limit);
        self
    }

    pub fn limit_for(&self, bucket: RateBucket) -> u32 {
        self.overrides
            .get(&bucket)
            .copied()
            .unwrap_or_else(|| bucket.default_limit())
    }

    /// Counts one event, failing once the caller exceeds the bucket limit.
    pub fn limit_action(&self, bucket: RateBucket, identity: &str) -> Result<u32, RateLimited> {
        let counter = self
            .counters
            .get_with((bucket, identity.to_owned()), || Arc::new(AtomicU32::new(0)));
        let attempts = counter.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        let limit = self.limit_for(bucket);

        if attempts > limit {
            counter!("rate_limit_events_total", "bucket" => bucket.name(), "state" => "exceeded")
                .increment(1);
            warn!(
                bucket = bucket.name(),
                identifier = identity,
                attempts,
                "rate limit exceeded"
            );
            return Err(RateLimited {
                bucket,
                attempts,
                limit,
            });
        }

        counter!("rate_limit_events_total", "bucket" => bucket.name(), "state" => "allowed")
            .increment(1);
        Ok(attempts)
    }

    /// Forgets the caller's count for `bucket`.
    pub fn reset(&self, bucket: RateBucket, identity: &str) {
        self.counters.invalidate(&(bucket, identity.to_owned()));
    }
}
