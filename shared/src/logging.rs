//! Shared logging utilities for consistent tracing across leader and workers
//!
//! Besides stdout formatting, every event that carries a `correlation_id`
//! field is captured by the [`DiagnosticLayer`] into a bounded in-memory
//! [`DiagnosticLog`], which can later be queried by correlation id. That log
//! is the diagnostic sink failure handlers write into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;

/// Default number of events retained by a [`DiagnosticLog`]
pub const DEFAULT_LOG_CAPACITY: usize = 10_000;

/// Structured event captured for later diagnosis
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DiagnosticEvent {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
    pub correlation_id: String,
    pub fields: HashMap<String, serde_json::Value>,
}

/// Filter over captured events; unset fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticQuery {
    pub correlation_id: Option<String>,
    pub level: Option<String>,
    pub message_contains: Option<String>,
    pub limit: Option<usize>,
}

/// Bounded in-memory event store keyed by correlation id
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    events: Arc<Mutex<VecDeque<DiagnosticEvent>>>,
    capacity: usize,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            capacity: capacity.max(1),
        }
    }

    /// Build a subscriber layer that feeds this log
    pub fn layer(&self) -> DiagnosticLayer {
        DiagnosticLayer { log: self.clone() }
    }

    pub fn record(&self, event: DiagnosticEvent) {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push_back(event);

        // Keep only the newest events to bound memory
        while events.len() > self.capacity {
            events.pop_front();
        }
    }

    /// Query events with filters, oldest first
    pub fn query(&self, query: &DiagnosticQuery) -> Vec<DiagnosticEvent> {
        let events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut filtered: Vec<DiagnosticEvent> = events
            .iter()
            .filter(|event| {
                if let Some(ref correlation_id) = query.correlation_id {
                    if &event.correlation_id != correlation_id {
                        return false;
                    }
                }

                if let Some(ref level) = query.level {
                    if !event.level.eq_ignore_ascii_case(level) {
                        return false;
                    }
                }

                if let Some(ref fragment) = query.message_contains {
                    if !event.message.contains(fragment) {
                        return false;
                    }
                }

                true
            })
            .cloned()
            .collect();

        filtered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));

        if let Some(limit) = query.limit {
            filtered.truncate(limit);
        }

        filtered
    }

    /// All events recorded under one correlation id
    pub fn for_correlation(&self, correlation_id: &str) -> Vec<DiagnosticEvent> {
        self.query(&DiagnosticQuery {
            correlation_id: Some(correlation_id.to_string()),
            ..Default::default()
        })
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracing layer that captures correlated events into a [`DiagnosticLog`]
pub struct DiagnosticLayer {
    log: DiagnosticLog,
}

impl<S> tracing_subscriber::Layer<S> for DiagnosticLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut fields = HashMap::new();
        let mut message = String::new();

        let mut visitor = EventVisitor {
            message: &mut message,
            fields: &mut fields,
        };
        event.record(&mut visitor);

        // Only correlated events are diagnostic output
        let correlation_id = match fields.remove("correlation_id") {
            Some(serde_json::Value::String(id)) => id,
            Some(other) => other.to_string(),
            None => return,
        };

        self.log.record(DiagnosticEvent {
            timestamp: Utc::now(),
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message,
            correlation_id,
            fields,
        });
    }
}

/// Visitor to extract event fields and message
struct EventVisitor<'a> {
    message: &'a mut String,
    fields: &'a mut HashMap<String, serde_json::Value>,
}

impl tracing::field::Visit for EventVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message.push_str(&format!("{value:?}"));
        } else {
            self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(format!("{value:?}")),
            );
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(serde_json::Number::from(value)),
        );
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(serde_json::Number::from(value)),
        );
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

fn level_filter(log_level: Option<&str>) -> String {
    let base_level = log_level.unwrap_or("info");
    format!("harness={base_level},shared={base_level},reqwest=warn,hyper=warn")
}

/// Initialize the global subscriber: compact stdout plus an optional diagnostic log
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(log_level: Option<&str>, diagnostics: Option<&DiagnosticLog>) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let env_filter = EnvFilter::new(level_filter(log_level));
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(diagnostics.map(DiagnosticLog::layer))
        .with(fmt_layer)
        .try_init();

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed, keeping existing one");
    }
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for correlation-aware info logging
#[macro_export]
macro_rules! correlated_info {
    ($correlation_id:expr, $($arg:tt)*) => {
        ::tracing::info!(
            correlation_id = %$correlation_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for correlation-aware warning logging
#[macro_export]
macro_rules! correlated_warn {
    ($correlation_id:expr, $($arg:tt)*) => {
        ::tracing::warn!(
            correlation_id = %$correlation_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for correlation-aware error logging
#[macro_export]
macro_rules! correlated_error {
    ($correlation_id:expr, $($arg:tt)*) => {
        ::tracing::error!(
            correlation_id = %$correlation_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for correlation-aware debug logging
#[macro_export]
macro_rules! correlated_debug {
    ($correlation_id:expr, $($arg:tt)*) => {
        ::tracing::debug!(
            correlation_id = %$correlation_id,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CorrelationId;
    use tracing_subscriber::prelude::*;

    fn capture<F: FnOnce()>(log: &DiagnosticLog, f: F) {
        let subscriber = tracing_subscriber::registry().with(log.layer());
        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn test_only_correlated_events_are_captured() {
        let log = DiagnosticLog::new();
        let id = CorrelationId::new();

        capture(&log, || {
            tracing::info!("uncorrelated noise");
            correlated_info!(id, resource_id = "space-0001", "🧾 created space");
            correlated_warn!(id, "⚠️ retrying delete");
        });

        let events = log.for_correlation(&id.to_string());
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "🧾 created space");
        assert_eq!(
            events[0].fields.get("resource_id"),
            Some(&serde_json::Value::String("space-0001".to_string()))
        );
        assert!(!events[0].fields.contains_key("correlation_id"));
        assert_eq!(events[1].level, "WARN");
    }

    #[test]
    fn test_query_filters_by_level_and_fragment() {
        let log = DiagnosticLog::new();
        let first = CorrelationId::new();
        let second = CorrelationId::new();

        capture(&log, || {
            correlated_info!(first, "droplet lookup");
            correlated_error!(first, "Droplet not found");
            correlated_error!(second, "Droplet not found");
        });

        let errors = log.query(&DiagnosticQuery {
            correlation_id: Some(first.to_string()),
            level: Some("error".to_string()),
            message_contains: Some("Droplet".to_string()),
            limit: None,
        });
        assert_eq!(errors.len(), 1);

        let limited = log.query(&DiagnosticQuery {
            message_contains: Some("Droplet not found".to_string()),
            limit: Some(1),
            ..Default::default()
        });
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_log_is_bounded() {
        let log = DiagnosticLog::with_capacity(3);
        let id = CorrelationId::new();

        capture(&log, || {
            for i in 0..5 {
                correlated_debug!(id, "event {}", i);
            }
        });

        // Debug events pass because no filter layer is installed here
        assert_eq!(log.len(), 3);
        let events = log.for_correlation(&id.to_string());
        assert_eq!(events[0].message, "event 2");

        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_init_tracing_accepts_either_sink_and_repeat_calls() {
        let log = DiagnosticLog::new();

        init_tracing(Some("debug"), Some(&log));
        init_tracing(None, None);

        assert_eq!(level_filter(None), "harness=info,shared=info,reqwest=warn,hyper=warn");
    }
}
