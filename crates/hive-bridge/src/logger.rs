//! Boundary logger
//!
//! The host installs four callbacks, one per severity. Bridge code logs with
//! `tracing`; [`BoundaryLayer`] formats each event and hands the text to the
//! matching callback. Until a callback is installed, events of that severity
//! are dropped.
//!
//! `ERROR` goes to the error callback, `WARN` to warn, `INFO` to info and
//! `DEBUG`/`TRACE` both go to the trace callback.

use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use std::ffi::{c_char, CString};
use std::fmt::{self, Write};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Host log callback; the message is only valid for the duration of the call
pub type LogCallback = unsafe extern "C" fn(message: *const c_char);

/// Severity as seen by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSeverity {
    Trace,
    Info,
    Warn,
    Error,
}

impl From<Level> for LogSeverity {
    fn from(level: Level) -> Self {
        match level {
            Level::ERROR => LogSeverity::Error,
            Level::WARN => LogSeverity::Warn,
            Level::INFO => LogSeverity::Info,
            _ => LogSeverity::Trace,
        }
    }
}

/// Host callbacks; `None` discards messages of that severity
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundarySink {
    pub info: Option<LogCallback>,
    pub warn: Option<LogCallback>,
    pub trace: Option<LogCallback>,
    pub error: Option<LogCallback>,
}

impl BoundarySink {
    fn callback(&self, severity: LogSeverity) -> Option<LogCallback> {
        match severity {
            LogSeverity::Trace => self.trace,
            LogSeverity::Info => self.info,
            LogSeverity::Warn => self.warn,
            LogSeverity::Error => self.error,
        }
    }
}

static SINK: Lazy<RwLock<BoundarySink>> = Lazy::new(|| RwLock::new(BoundarySink::default()));
static SUBSCRIBER: OnceCell<bool> = OnceCell::new();

/// Install host callbacks and make sure the boundary layer is receiving events
///
/// `filter` is an `EnvFilter` directive string; `HIVE_LOG` overrides it. The
/// global subscriber is set up once per process, later calls only swap the
/// callbacks. Returns false when another global subscriber was already set.
pub fn install(sink: BoundarySink, filter: &str) -> bool {
    *SINK.write() = sink;
    *SUBSCRIBER.get_or_init(|| {
        let filter = EnvFilter::try_from_env("HIVE_LOG")
            .or_else(|_| EnvFilter::try_new(filter))
            .unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry()
            .with(filter)
            .with(BoundaryLayer)
            .try_init()
            .is_ok()
    })
}

/// Drop all callbacks
pub fn reset() {
    *SINK.write() = BoundarySink::default();
}

/// Send one message to the host callback for `severity`
pub fn emit(severity: LogSeverity, message: &str) {
    let Some(callback) = SINK.read().callback(severity) else {
        return;
    };
    let Ok(text) = CString::new(message.replace('\0', "")) else {
        return;
    };
    // SAFETY: the host registered this callback for exactly this signature;
    // the string outlives the call.
    unsafe { callback(text.as_ptr()) };
}

/// `tracing` layer forwarding events to the host callbacks
pub struct BoundaryLayer;

impl<S: Subscriber> Layer<S> for BoundaryLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        emit((*event.metadata().level()).into(), &visitor.finish());
    }
}

/// Formats `message` followed by ` key=value` pairs
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(mut self) -> String {
        self.message.push_str(&self.fields);
        self.message
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::ffi::CStr;

    static SEEN: Mutex<Vec<(char, String)>> = parking_lot::const_mutex(Vec::new());

    unsafe fn record(tag: char, message: *const c_char) {
        let text = CStr::from_ptr(message).to_string_lossy().into_owned();
        SEEN.lock().push((tag, text));
    }

    unsafe extern "C" fn on_error(message: *const c_char) {
        record('e', message)
    }

    unsafe extern "C" fn on_trace(message: *const c_char) {
        record('t', message)
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(LogSeverity::from(Level::ERROR), LogSeverity::Error);
        assert_eq!(LogSeverity::from(Level::WARN), LogSeverity::Warn);
        assert_eq!(LogSeverity::from(Level::INFO), LogSeverity::Info);
        assert_eq!(LogSeverity::from(Level::DEBUG), LogSeverity::Trace);
        assert_eq!(LogSeverity::from(Level::TRACE), LogSeverity::Trace);
    }

    #[test]
    fn test_layer_routes_by_level() {
        let sink = BoundarySink {
            error: Some(on_error),
            trace: Some(on_trace),
            ..BoundarySink::default()
        };
        *SINK.write() = sink;

        let subscriber = tracing_subscriber::registry().with(BoundaryLayer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(id = 7, "lookup failed");
            tracing::debug!("collecting");
            tracing::info!("dropped, no info callback");
        });
        reset();

        let seen = SEEN.lock();
        assert!(seen.contains(&('e', "lookup failed id=7".to_string())));
        assert!(seen.contains(&('t', "collecting".to_string())));
        assert!(!seen.iter().any(|(_, m)| m.contains("dropped")));
    }
}
