#![forbid(unsafe_code)]

//! A `tracing-subscriber` layer that records span names and event messages.
//!
//! ```ignore
//! let capture = TraceCapture::new();
//! let subscriber = tracing_subscriber::registry().with(capture.clone());
//! let _guard = tracing::subscriber::set_default(subscriber);
//! // ... drive a session ...
//! assert!(capture.snapshot().saw_span("attrflow.evaluate"));
//! ```

use std::sync::{Arc, Mutex};

use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Everything captured so far.
#[derive(Debug, Clone, Default)]
pub struct TraceSnapshot {
    pub spans: Vec<String>,
    pub events: Vec<String>,
}

impl TraceSnapshot {
    #[must_use]
    pub fn saw_span(&self, name: &str) -> bool {
        self.spans.iter().any(|s| s == name)
    }

    #[must_use]
    pub fn saw_event(&self, message: &str) -> bool {
        self.events.iter().any(|e| e == message)
    }

    #[must_use]
    pub fn span_count(&self, name: &str) -> usize {
        self.spans.iter().filter(|s| *s == name).count()
    }

    #[must_use]
    pub fn event_count(&self, message: &str) -> usize {
        self.events.iter().filter(|e| *e == message).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TraceCapture {
    state: Arc<Mutex<TraceSnapshot>>,
}

impl TraceCapture {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> TraceSnapshot {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_default()
    }
}

struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}").trim_matches('"').to_string());
        }
    }
}

impl<S> Layer<S> for TraceCapture
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        _id: &tracing::Id,
        _ctx: Context<'_, S>,
    ) {
        if let Ok(mut state) = self.state.lock() {
            state.spans.push(attrs.metadata().name().to_string());
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor { message: None };
        event.record(&mut visitor);
        if let Some(message) = visitor.message
            && let Ok(mut state) = self.state.lock()
        {
            state.events.push(message);
        }
    }
}
