//! Process-wide logging bootstrap and span helpers shared by every binary
//! in the workspace.

mod init;
mod spans;
mod trace_id;

pub use init::{LogFormat, init_logger};
pub use spans::{child_span, cycle_span};
pub use trace_id::TraceId;
