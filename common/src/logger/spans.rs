use tracing::{Span, field};

use super::TraceId;

/// Root span for one polling cycle. `batch_size` is recorded once the batch
/// has been fetched.
pub fn cycle_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "cycle",
        name = %name,
        trace_id = %trace_id,
        batch_size = field::Empty
    )
}

/// Child span; inherits the trace id from the enclosing cycle span.
pub fn child_span(name: &'static str) -> Span {
    tracing::info_span!("child", name = %name)
}
