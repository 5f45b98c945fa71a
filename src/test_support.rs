//! Shared helpers for the crate's tests

use std::fmt::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use aliri_base64::Base64Url;
use aliri_clock::{Clock, UnixTime};
use tracing::field::{Field, Visit};
use tracing::{span, Dispatch, Event, Level, Metadata, Subscriber};

/// A clock whose current time can be advanced while a cache holds it
#[derive(Clone, Debug, Default)]
pub(crate) struct SharedClock(Arc<AtomicU64>);

impl SharedClock {
    pub(crate) fn set(&self, time: UnixTime) {
        self.0.store(time.0, Ordering::SeqCst);
    }
}

impl Clock for SharedClock {
    fn now(&self) -> UnixTime {
        UnixTime(self.0.load(Ordering::SeqCst))
    }
}

/// Records every event routed through a dispatcher built by
/// [`LogCapture::dispatch`]
#[derive(Clone, Default)]
pub(crate) struct LogCapture {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl LogCapture {
    pub(crate) fn dispatch(&self) -> Dispatch {
        Dispatch::new(CaptureSubscriber {
            capture: self.clone(),
            next_span_id: AtomicU64::new(1),
        })
    }

    pub(crate) fn events(&self) -> Vec<(Level, String)> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }
}

struct CaptureSubscriber {
    capture: LogCapture,
    next_span_id: AtomicU64,
}

impl Subscriber for CaptureSubscriber {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, _attrs: &span::Attributes<'_>) -> span::Id {
        span::Id::from_u64(self.next_span_id.fetch_add(1, Ordering::SeqCst))
    }

    fn record(&self, _id: &span::Id, _values: &span::Record<'_>) {}

    fn record_follows_from(&self, _id: &span::Id, _follows: &span::Id) {}

    fn event(&self, event: &Event<'_>) {
        let mut message = String::new();
        event.record(&mut MessageVisitor(&mut message));
        self.capture
            .events
            .lock()
            .unwrap()
            .push((*event.metadata().level(), message));
    }

    fn enter(&self, _id: &span::Id) {}

    fn exit(&self, _id: &span::Id) {}
}

struct MessageVisitor<'a>(&'a mut String);

impl Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.0, "{value:?}");
        }
    }
}

/// Builds an unsigned compact JWT carrying the given claims
pub(crate) fn jwt(claims: serde_json::Value) -> String {
    let header = Base64Url::from_raw(&br#"{"alg":"none","typ":"JWT"}"#[..]);
    let payload = Base64Url::from_raw(serde_json::to_vec(&claims).expect("claims serialize"));
    format!("{header}.{payload}.c2ln")
}
