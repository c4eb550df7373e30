//! Structured operator telemetry. The pipeline emits events to an opaque
//! sink; the default sink writes tracing records. Emission is always
//! best-effort and never fails the caller.

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct TelemetryEvent {
    pub event: String,
    pub level: &'static str,
    pub site_url: String,
    pub message: Option<String>,
    pub data: Value,
}

impl TelemetryEvent {
    pub fn info(event: impl Into<String>, site_url: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            level: "info",
            site_url: site_url.into(),
            message: None,
            data,
        }
    }

    pub fn error(event: impl Into<String>, site_url: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            level: "error",
            site_url: site_url.into(),
            message: None,
            data,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Collector boundary. Implementations must swallow their own failures.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);

    /// Exception-class event with the failing context attached.
    fn emit_exception(&self, event: &str, error: &str, properties: Value) {
        self.emit(TelemetryEvent {
            event: event.to_string(),
            level: "error",
            site_url: properties
                .get("siteUrl")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            message: Some(error.to_string()),
            data: properties,
        });
    }
}

/// Default sink: structured tracing records.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: TelemetryEvent) {
        match event.level {
            "error" => tracing::error!(
                event = %event.event,
                site_url = %event.site_url,
                message = event.message.as_deref().unwrap_or(""),
                data = %event.data,
                "telemetry"
            ),
            _ => tracing::info!(
                event = %event.event,
                site_url = %event.site_url,
                message = event.message.as_deref().unwrap_or(""),
                data = %event.data,
                "telemetry"
            ),
        }
    }
}

/// Dispatch log line emitted when a scrape request leaves for a provider.
pub fn log_provider_dispatch(provider: &str, url: &str, kind: Option<&str>, extra: Option<&str>) {
    tracing::info!(
        provider,
        url,
        kind = kind.unwrap_or(""),
        extra = extra.unwrap_or(""),
        "scrape dispatch"
    );
}

/// Synchronous provider response summary.
pub fn log_sync_response(provider: &str, action: &str, url: &str, summary: &str) {
    tracing::info!(provider, action, url, summary, "scrape response");
}

#[cfg(any(test, feature = "test-support"))]
pub mod capture {
    use super::*;
    use std::sync::Mutex;

    /// Test sink that records every event.
    #[derive(Default)]
    pub struct CaptureSink {
        events: Mutex<Vec<TelemetryEvent>>,
    }

    impl CaptureSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<TelemetryEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventSink for CaptureSink {
        fn emit(&self, event: TelemetryEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}
