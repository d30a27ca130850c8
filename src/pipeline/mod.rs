//! Media graph construction and track lifecycle
//!
//! This module describes the processing graph of an egress session and keeps
//! it in step with the tracks published during the session:
//! - Policy: channel placement, output topology and format selection
//! - Building: branch, track, filler and output bins described as data
//! - Engine: the interface the described bins are realized through
//! - Lifecycle: monotonic state gate, track registry, async error reporting
//!
//! # Architecture
//!
//! ```text
//! pipeline
//! ├── audio   (track bins | capture) → mixer → encoder → queue | tee
//! ├── video   (track bins | capture) → compositor → encoder → queue | tee
//! └── <type>_sink_<n>  one per requested output
//! ```
//! The [`PipelineCoordinator`] owns one [`SourceBin`] per enabled branch and
//! routes track events to it.

pub mod builder;
pub mod coordinator;
pub mod engine;
pub mod memory;
pub mod policy;
pub mod registry;
pub mod report;
pub mod source_bin;
pub mod state;
pub mod types;

pub use coordinator::PipelineCoordinator;
pub use engine::{Bin, Engine, Factory, PropValue, ROOT_BIN, Stage};
pub use memory::MemoryEngine;
pub use report::{ErrorReporter, PipelineError};
pub use source_bin::SourceBin;
pub use state::{LifecycleState, PipelineState};
pub use types::{MediaKind, MimeType, ParticipantRole, TrackSource};
