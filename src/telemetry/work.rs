//! Work execution span helpers.
//!
//! Each work item opens one span at construction; state transitions are
//! recorded as events inside it and the executor instruments its run
//! with it.

use tracing::Span;

use crate::model::WorkId;

/// Start a span for a work item.
///
/// The `work.status` field is declared empty and updated by
/// [`record_state_transition`].
pub fn start_work_span(name: &str, id: WorkId) -> Span {
    tracing::info_span!(
        "work.execute",
        "work.name" = name,
        "work.id" = id.0,
        "work.status" = tracing::field::Empty,
    )
}

/// Record a state transition on the given span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("work.status", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
