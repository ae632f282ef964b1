//! Structured lifecycle events for a sourcing run.
//!
//! [`RunSpan`] ties every event of one run to its `run_id`; the `emit_*`
//! functions log the run's milestones at `info!` with an `event` field.

use std::future::Future;

use tracing::instrument::Instrumented;
use tracing::{info, warn, Instrument};

/// Run-scoped span. Futures are instrumented with it rather than holding an
/// entered guard across awaits, so they stay `Send`.
pub struct RunSpan {
    span: tracing::Span,
}

impl RunSpan {
    pub fn new(run_id: &str) -> Self {
        Self {
            span: tracing::info_span!("ghgraph.run", run_id = %run_id),
        }
    }

    pub fn instrument<F: Future>(&self, future: F) -> Instrumented<F> {
        future.instrument(self.span.clone())
    }
}

pub fn emit_run_started(run_id: &str, providers: usize) {
    info!(event = "run.started", run_id = %run_id, providers = providers);
}

pub fn emit_run_finished(run_id: &str, duration_ms: u64, entities_created: usize, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        entities_created = entities_created,
        success = success,
    );
}

/// A provider's fetch returned records.
pub fn emit_provider_fetched(provider: &str, key: Option<&str>, records: usize) {
    info!(
        event = "provider.fetched",
        provider = %provider,
        key = key.unwrap_or_default(),
        records = records,
    );
}

pub fn emit_provider_failed(provider: &str, error: &dyn std::fmt::Display) {
    warn!(event = "provider.failed", provider = %provider, error = %error);
}

/// A record group was dropped because its type is not registered.
pub fn emit_type_discarded(type_name: &str, records: usize) {
    warn!(event = "type.discarded", type_name = %type_name, records = records);
}

pub fn emit_run_failed(run_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.failed", run_id = %run_id, error = %error);
}
