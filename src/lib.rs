pub mod applicator;
pub mod config;
pub mod errors;
pub mod id;
pub mod lock;
pub mod paths;
pub mod query;
pub mod report;
pub mod reviewer;
pub mod session;

pub use errors::{CoordError, ErrorCategory};
