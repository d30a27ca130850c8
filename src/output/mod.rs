//! Output side of a session: storage naming and byte sinks.

pub mod naming;
pub mod sink;

pub use naming::{IdentitySeed, NamingPlan, resolve_naming};
pub use sink::{FileSink, Sink};
