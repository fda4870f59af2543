use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// Lines kept for replay to late `/api/logs` subscribers.
pub(crate) const LOG_RING_CAPACITY: usize = 500;

/// Forwards every tracing event as a JSON line to SSE log subscribers.
///
/// Events emitted inside a driver span carry that span's `upload` id, so the
/// log view can be filtered per record.
pub(crate) struct BroadcastLayer {
    pub tx: broadcast::Sender<String>,
    pub ring: Arc<Mutex<VecDeque<String>>>,
}

/// Upload id recorded on a span, stored in its extensions.
struct UploadId(String);

#[derive(Default)]
struct LineFields {
    message: String,
    upload: Option<String>,
}

impl Visit for LineFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = value.to_string(),
            "upload" => self.upload = Some(value.to_string()),
            _ => {}
        }
    }

    // `%` fields arrive here with Display output, so no quotes to strip.
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => {
                self.message.clear();
                let _ = write!(self.message, "{value:?}");
            }
            "upload" => self.upload = Some(format!("{value:?}")),
            _ => {}
        }
    }
}

fn category(target: &str) -> &'static str {
    if target.starts_with("lexdesk_core") {
        "uploads"
    } else if target.starts_with("tower_http") || target.starts_with("lexdesk_server::routes") {
        "http"
    } else {
        "system"
    }
}

fn level_name(level: &Level) -> Option<&'static str> {
    match *level {
        Level::ERROR => Some("err"),
        Level::WARN => Some("warn"),
        Level::INFO => Some("info"),
        Level::DEBUG => Some("debug"),
        Level::TRACE => None,
    }
}

impl BroadcastLayer {
    fn publish(&self, line: String) {
        let _ = self.tx.send(line.clone());
        let mut ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.push_back(line);
        if ring.len() > LOG_RING_CAPACITY {
            ring.pop_front();
        }
    }
}

impl<S> Layer<S> for BroadcastLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut fields = LineFields::default();
        attrs.record(&mut fields);
        if let (Some(upload), Some(span)) = (fields.upload, ctx.span(id)) {
            span.extensions_mut().insert(UploadId(upload));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let Some(level) = level_name(event.metadata().level()) else {
            return;
        };

        let mut fields = LineFields::default();
        event.record(&mut fields);

        // Innermost span with an upload id wins.
        let upload = fields.upload.or_else(|| {
            ctx.event_scope(event)?.find_map(|span| {
                let extensions = span.extensions();
                extensions.get::<UploadId>().map(|u| u.0.clone())
            })
        });

        let line = serde_json::json!({
            "ts": chrono::Utc::now().timestamp(),
            "level": level,
            "message": fields.message,
            "category": category(event.metadata().target()),
            "upload": upload,
        })
        .to_string();
        self.publish(line);
    }
}
