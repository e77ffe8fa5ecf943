//! Shared services: telemetry wiring, rate limiting, proof-of-work checks,
//! DNS validation and the site notice board.

pub mod authenticity;
pub mod notices;
pub mod rate_limit;
pub mod telemetry;
pub mod validation;

pub use notices::{NoticeBoard, NoticeKind, NoticePosition, NoticeState};
pub use rate_limit::{RateBucket, RateLimited, RateLimiter};
pub use telemetry::*;
pub use validation::{DohValidator, DomainValidator, ValidationError};
