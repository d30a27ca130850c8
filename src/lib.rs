pub mod config;
pub mod errors;
pub mod output;
pub mod pipeline;
pub mod utils;

pub use errors::{EgressError, ErrorKind, Result};
