//! Record-store contracts plus the batch and expirable-record helpers built on
//! top of them.

mod batch;
mod expirable;
mod traits;

pub use batch::Batch;
pub use expirable::{ExpirableRecord, ExpirationOptions, SaveOptions};
pub use traits::*;
