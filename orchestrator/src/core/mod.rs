//! Core run logic
//!
//! Path planning, command-line construction, log merging and the tunnel
//! establishment protocol. Everything here is either pure or talks to the
//! outside world only through the traits in `crate::traits`.

pub mod link;
pub mod logs;
pub mod merge;
pub mod metadata;
pub mod stats;
pub mod tunnel;

pub use link::EmulatedLink;
pub use logs::{Direction, FlowLogs, LogLocation, LogSet};
pub use metadata::RunMetadata;
pub use stats::{StatsFile, StatsRecord};
pub use tunnel::{check_stagger, ClientInvocation, RetryPolicy};
