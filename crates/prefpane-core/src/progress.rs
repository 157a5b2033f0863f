use crate::dispatch::UiDispatcher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Lines ending with this marker stay open; the next append continues them.
pub const CONTINUATION_MARKER: &str = "...";

#[must_use]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Delivery {
    Delivered,
    /// The sink was disposed or its UI is gone; workers should stop.
    NotDelivered,
}

impl Delivery {
    pub fn is_delivered(self) -> bool {
        self == Delivery::Delivered
    }
}

/// Whatever actually displays progress text. Only ever called on the
/// affinity thread.
pub trait ProgressView: Send {
    fn append(&mut self, text: &str);
    /// The operation reached a terminal state (enable "OK", stop spinners).
    fn finish(&mut self) {}
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transcript {
    text: String,
    finished: bool,
}

impl Transcript {
    pub fn rendered(&self) -> &str {
        &self.text
    }

    pub fn lines(&self) -> Vec<&str> {
        let trimmed = self.text.strip_suffix('\n').unwrap_or(&self.text);
        if trimmed.is_empty() {
            return Vec::new();
        }
        trimmed.split('\n').collect()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl ProgressView for Transcript {
    fn append(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

/// Transcript readable from outside the sink.
#[derive(Clone, Default)]
pub struct SharedTranscript(Arc<Mutex<Transcript>>);

impl SharedTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Transcript {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Transcript> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProgressView for SharedTranscript {
    fn append(&mut self, text: &str) {
        self.lock().append(text);
    }

    fn finish(&mut self) {
        self.lock().finish();
    }
}

struct SinkInner {
    dispatcher: Arc<dyn UiDispatcher>,
    view: Mutex<Box<dyn ProgressView>>,
    disposed: AtomicBool,
}

impl SinkInner {
    fn write(&self, text: &str, finish: bool) {
        if self.disposed.load(Ordering::SeqCst) {
            debug!("Dropping progress text for disposed sink");
            return;
        }
        let mut view = self
            .view
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        view.append(text);
        if finish {
            view.finish();
        }
    }
}

/// Append-only progress text. Safe to call from any thread: every append is
/// a single task on the affinity dispatcher, so concurrent writers never
/// interleave inside one append.
#[derive(Clone)]
pub struct ProgressSink {
    inner: Arc<SinkInner>,
}

impl ProgressSink {
    pub fn new(dispatcher: Arc<dyn UiDispatcher>, view: impl ProgressView + 'static) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                dispatcher,
                view: Mutex::new(Box::new(view)),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Appends `text` terminated by a newline unless it ends with
    /// [`CONTINUATION_MARKER`].
    pub fn append_line(&self, text: &str) -> Delivery {
        self.submit(terminate(text))
    }

    /// Appends `text` verbatim.
    pub fn append_fragment(&self, text: &str) -> Delivery {
        self.submit(text.to_string())
    }

    pub fn dispose(&self) {
        if !self.inner.disposed.swap(true, Ordering::SeqCst) {
            debug!("Progress sink disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Writes the closing line and marks the view finished. Must run on the
    /// affinity thread.
    pub(crate) fn finish_on_affinity(&self, line: &str) {
        self.inner.write(&terminate(line), true);
    }

    fn submit(&self, text: String) -> Delivery {
        if self.is_disposed() {
            return Delivery::NotDelivered;
        }
        let inner = Arc::clone(&self.inner);
        let queued = self
            .inner
            .dispatcher
            .dispatch(Box::new(move || inner.write(&text, false)));
        if !queued {
            warn!("Affinity dispatcher gone; disposing progress sink");
            self.dispose();
            return Delivery::NotDelivered;
        }
        Delivery::Delivered
    }
}

fn terminate(text: &str) -> String {
    if text.ends_with(CONTINUATION_MARKER) {
        text.to_string()
    } else {
        format!("{text}\n")
    }
}
