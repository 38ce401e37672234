//! # Background Tasks
//!
//! Lifecycle tracking for long-running computations. A caller creates a task,
//! hands its id to a producer, and polls the record while the producer
//! reports progress.
//!
//! ```text
//! PENDING ──start──▶ RUNNING ──complete──▶ COMPLETED
//!    │                  │ ──fail──────▶ FAILED
//!    └──────cancel──────┴──cancel──────▶ CANCELLED
//! ```

pub mod record;
pub mod registry;
pub mod status;

pub use record::TaskRecord;
pub use registry::{RegistryStats, TaskError, TaskRegistry};
pub use status::TaskStatus;
