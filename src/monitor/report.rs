use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::warn;

use crate::error::MonitorError;
use crate::services::ErrorReporter;
use crate::telemetry::event::MonitorEvent;
use crate::telemetry::recorder::TelemetryRecorder;

/// Where caught collaborator failures go: a local log line with the full error, a telemetry
/// count, and a PII-free report to the external error sink.
#[derive(Clone)]
pub struct FailureSink {
    reporter: Arc<dyn ErrorReporter>,
    telemetry: Arc<TelemetryRecorder>,
}

impl FailureSink {
    pub fn new(reporter: Arc<dyn ErrorReporter>, telemetry: Arc<TelemetryRecorder>) -> Self {
        Self { reporter, telemetry }
    }

    pub async fn collaborator_failed(
        &self,
        component: &'static str,
        err: &anyhow::Error,
        correlation_id: &str,
    ) {
        warn!(correlation_id, component, error = %format!("{err:#}"), "collaborator call failed, using fallback");
        self.telemetry.record(MonitorEvent::CollaboratorFailure { component });

        // The error text can embed paths or identifiers, so only the component travels.
        let mut context = BTreeMap::new();
        context.insert("component".to_string(), component.to_string());
        self.reporter
            .report("collaborator", &format!("{component} call failed"), correlation_id, context)
            .await;
    }

    /// Reports an error that is about to be returned to the caller.
    pub async fn rejected(&self, err: &MonitorError, correlation_id: &str) {
        warn!(correlation_id, kind = err.kind(), "{}", err);
        self.reporter
            .report(err.kind(), &err.to_string(), correlation_id, BTreeMap::new())
            .await;
    }
}
