//! Background purge of lapsed records. Reads already hide expired keys; the
//! sweeper reclaims their rows.

pub mod worker;

pub use worker::{run_sweeper, sweep_once, SweeperError};
