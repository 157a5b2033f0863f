//! Cancellable background operations that stream progress into a sink.
//!
//! Work runs on its own thread. Its result is marshalled back onto the
//! affinity thread, where the final line is written, the terminal state is
//! taken and the completion callback runs exactly once.

use crate::dispatch::UiDispatcher;
use crate::journal::OperationJournal;
use crate::progress::ProgressSink;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperationState {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationState::Completed | OperationState::Failed | OperationState::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Idle => "idle",
            OperationState::Running => "running",
            OperationState::Completed => "completed",
            OperationState::Failed => "failed",
            OperationState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperationKind {
    Backup,
    Restore,
    AutoBackup,
    ProxyTest,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Backup => "backup",
            OperationKind::Restore => "restore",
            OperationKind::AutoBackup => "auto_backup",
            OperationKind::ProxyTest => "proxy_test",
        }
    }

    /// Human label used in the closing line.
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Backup => "Backup",
            OperationKind::Restore => "Restore",
            OperationKind::AutoBackup => "Auto backup",
            OperationKind::ProxyTest => "Proxy test",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum OperationOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

impl OperationOutcome {
    pub fn state(&self) -> OperationState {
        match self {
            OperationOutcome::Completed => OperationState::Completed,
            OperationOutcome::Failed(_) => OperationState::Failed,
            OperationOutcome::Cancelled => OperationState::Cancelled,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            OperationOutcome::Failed(message) => Some(message),
            _ => None,
        }
    }

    pub fn final_line(&self, kind: OperationKind) -> String {
        match self {
            OperationOutcome::Completed => format!("{} Complete!", kind.label()),
            OperationOutcome::Failed(message) => format!("{} Failed: {message}", kind.label()),
            OperationOutcome::Cancelled => format!("{} Cancelled", kind.label()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    #[error("operation cannot start from state {0}")]
    NotIdle(OperationState),
    #[error("failed to spawn operation worker: {0}")]
    Spawn(String),
}

#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a worker sees: the sink and a cooperative cancellation check.
pub struct WorkContext {
    sink: ProgressSink,
    cancel: CancelToken,
    reported: Option<DoneSignal>,
}

impl WorkContext {
    pub fn new(sink: ProgressSink, cancel: CancelToken) -> Self {
        Self {
            sink,
            cancel,
            reported: None,
        }
    }

    /// Releases `signal` once the first report has been queued.
    fn signal_first_report(mut self, signal: DoneSignal) -> Self {
        self.reported = Some(signal);
        self
    }

    pub fn sink(&self) -> &ProgressSink {
        &self.sink
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn checkpoint(&self) -> Result<(), WorkError> {
        if self.is_cancelled() {
            return Err(WorkError::Cancelled);
        }
        Ok(())
    }

    /// Appends a progress line; an undelivered line counts as cancellation.
    pub fn report(&self, line: &str) -> Result<(), WorkError> {
        self.checkpoint()?;
        if !self.sink.append_line(line).is_delivered() {
            return Err(WorkError::Cancelled);
        }
        self.mark_reported();
        Ok(())
    }

    pub fn report_fragment(&self, text: &str) -> Result<(), WorkError> {
        self.checkpoint()?;
        if !self.sink.append_fragment(text).is_delivered() {
            return Err(WorkError::Cancelled);
        }
        self.mark_reported();
        Ok(())
    }

    fn mark_reported(&self) {
        if let Some(signal) = &self.reported {
            signal.release();
        }
    }
}

/// Single-permit release signal handed from the primary worker to helpers.
#[derive(Clone, Default)]
pub struct DoneSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl DoneSignal {
    pub fn release(&self) {
        let (lock, condvar) = &*self.inner;
        *lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = true;
        condvar.notify_all();
    }

    pub fn is_released(&self) -> bool {
        *self
            .inner
            .0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Waits up to `timeout`; returns whether the signal was released.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let (guard, _) = condvar
            .wait_timeout_while(guard, timeout, |released| !*released)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard
    }
}

/// Secondary contributor appending filler while the primary worker runs.
#[derive(Clone, Debug)]
pub struct Ticker {
    pub interval: Duration,
    pub filler: String,
}

impl Default for Ticker {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            filler: ".".to_string(),
        }
    }
}

pub type CompletionCallback = Box<dyn FnOnce(&OperationOutcome) + Send + 'static>;

struct Shared {
    id: Uuid,
    kind: OperationKind,
    target: String,
    state: Mutex<OperationState>,
    cancel: CancelToken,
    dispatcher: Arc<dyn UiDispatcher>,
    on_complete: Mutex<Option<CompletionCallback>>,
    journal: Mutex<Option<OperationJournal>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, OperationState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// First terminal observation wins; later ones are no-ops.
    fn transition(&self, next: OperationState) -> bool {
        let mut state = self.state();
        if state.is_terminal() {
            return false;
        }
        *state = next;
        true
    }

    fn complete(&self, outcome: OperationOutcome, sink: Option<&ProgressSink>) {
        if !self.transition(outcome.state()) {
            info!(
                operation = %self.id,
                ignored = outcome.state().as_str(),
                "Operation already settled"
            );
            return;
        }
        if let Some(sink) = sink {
            sink.finish_on_affinity(&outcome.final_line(self.kind));
        }
        match &outcome {
            OperationOutcome::Completed => {
                info!(
                    operation = %self.id,
                    kind = self.kind.as_str(),
                    target = %self.target,
                    "Operation completed"
                )
            }
            OperationOutcome::Cancelled => {
                warn!(
                    operation = %self.id,
                    kind = self.kind.as_str(),
                    target = %self.target,
                    "Operation cancelled"
                )
            }
            OperationOutcome::Failed(message) => {
                error!(
                    operation = %self.id,
                    kind = self.kind.as_str(),
                    target = %self.target,
                    error = %message,
                    "Operation failed"
                )
            }
        }
        let journal = self
            .journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(journal) = journal
            && let Err(err) = journal.record(&self.id, self.kind, &self.target, &outcome)
        {
            warn!(operation = %self.id, error = %err, "Failed to journal operation");
        }
        let callback = self
            .on_complete
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(callback) = callback {
            callback(&outcome);
        }
    }
}

/// Drives one operation from Idle to a terminal state. A new operation
/// needs a new controller.
#[derive(Clone)]
pub struct OperationController {
    shared: Arc<Shared>,
}

impl OperationController {
    pub fn new(
        kind: OperationKind,
        target: impl Into<String>,
        dispatcher: Arc<dyn UiDispatcher>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                kind,
                target: target.into(),
                state: Mutex::new(OperationState::Idle),
                cancel: CancelToken::default(),
                dispatcher,
                on_complete: Mutex::new(None),
                journal: Mutex::new(None),
            }),
        }
    }

    pub fn with_journal(self, journal: OperationJournal) -> Self {
        *self
            .shared
            .journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(journal);
        self
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn kind(&self) -> OperationKind {
        self.shared.kind
    }

    pub fn target(&self) -> &str {
        &self.shared.target
    }

    pub fn state(&self) -> OperationState {
        *self.shared.state()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.shared.cancel.clone()
    }

    /// Schedules `work` on a background thread and returns immediately.
    pub fn start<W, C>(
        &self,
        work: W,
        sink: ProgressSink,
        on_complete: C,
    ) -> Result<(), OperationError>
    where
        W: FnOnce(&WorkContext) -> Result<(), WorkError> + Send + 'static,
        C: FnOnce(&OperationOutcome) + Send + 'static,
    {
        self.begin(Box::new(on_complete))?;
        let controller = self.clone();
        let ctx = WorkContext::new(sink.clone(), self.cancel_token());
        let spawned = thread::Builder::new()
            .name(format!("{}-worker", self.shared.kind.as_str()))
            .spawn(move || {
                let result = work(&ctx);
                controller.settle(result, sink);
            });
        self.check_spawn(spawned.map(|_| ()))
    }

    /// Like [`start`](Self::start), plus a ticker thread appending filler to
    /// the same sink until the primary worker is done. Filler starts only
    /// after the worker's first report, and the ticker is joined before the
    /// result is settled, so it never precedes the header or follows the
    /// closing line.
    pub fn start_with_ticker<W, C>(
        &self,
        work: W,
        sink: ProgressSink,
        on_complete: C,
        ticker: Ticker,
    ) -> Result<(), OperationError>
    where
        W: FnOnce(&WorkContext) -> Result<(), WorkError> + Send + 'static,
        C: FnOnce(&OperationOutcome) + Send + 'static,
    {
        self.begin(Box::new(on_complete))?;
        let done = DoneSignal::default();
        let reported = DoneSignal::default();
        let ticker_handle = {
            let done = done.clone();
            let reported = reported.clone();
            let sink = sink.clone();
            thread::Builder::new()
                .name(format!("{}-ticker", self.shared.kind.as_str()))
                .spawn(move || run_ticker(&sink, &reported, &done, &ticker))
        };
        let ticker_handle = match ticker_handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(operation = %self.shared.id, error = %err, "Ticker not started");
                None
            }
        };
        let controller = self.clone();
        let ctx = WorkContext::new(sink.clone(), self.cancel_token())
            .signal_first_report(reported.clone());
        let worker_done = done.clone();
        let worker_reported = reported.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-worker", self.shared.kind.as_str()))
            .spawn(move || {
                let result = work(&ctx);
                worker_done.release();
                worker_reported.release();
                if let Some(handle) = ticker_handle
                    && handle.join().is_err()
                {
                    warn!("Ticker thread panicked");
                }
                controller.settle(result, sink);
            });
        if spawned.is_err() {
            done.release();
            reported.release();
        }
        self.check_spawn(spawned.map(|_| ()))
    }

    /// Requests cooperative cancellation; the worker stops at its next
    /// checkpoint.
    pub fn cancel(&self) {
        if !self.shared.cancel.is_cancelled() {
            info!(operation = %self.shared.id, "Cancellation requested");
        }
        self.shared.cancel.cancel();
    }

    /// Cancels and settles as Cancelled right away, without waiting for the
    /// worker. Call on the affinity thread when the UI goes away; whatever
    /// the worker returns later is ignored.
    pub fn abandon(&self, sink: &ProgressSink) {
        self.cancel();
        if self.state() == OperationState::Running {
            self.shared.complete(OperationOutcome::Cancelled, Some(sink));
        }
    }

    fn begin(&self, on_complete: CompletionCallback) -> Result<(), OperationError> {
        {
            let mut state = self.shared.state();
            if *state != OperationState::Idle {
                return Err(OperationError::NotIdle(*state));
            }
            *state = OperationState::Running;
        }
        *self
            .shared
            .on_complete
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(on_complete);
        info!(
            operation = %self.shared.id,
            kind = self.shared.kind.as_str(),
            target = %self.shared.target,
            "Operation started"
        );
        Ok(())
    }

    fn check_spawn(&self, spawned: std::io::Result<()>) -> Result<(), OperationError> {
        match spawned {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(operation = %self.shared.id, error = %err, "Failed to spawn worker");
                self.shared.transition(OperationState::Failed);
                self.shared
                    .on_complete
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .take();
                Err(OperationError::Spawn(err.to_string()))
            }
        }
    }

    fn settle(&self, result: Result<(), WorkError>, sink: ProgressSink) {
        let outcome = match result {
            Ok(()) => OperationOutcome::Completed,
            Err(WorkError::Cancelled) => OperationOutcome::Cancelled,
            Err(WorkError::Failed(err)) => OperationOutcome::Failed(format!("{err:#}")),
        };
        let shared = Arc::clone(&self.shared);
        let task_outcome = outcome.clone();
        let queued = self
            .shared
            .dispatcher
            .dispatch(Box::new(move || shared.complete(task_outcome, Some(&sink))));
        if !queued {
            warn!(
                operation = %self.shared.id,
                "Affinity dispatcher gone; settling without completion callback"
            );
            self.shared
                .on_complete
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            self.shared.complete(outcome, None);
        }
    }
}

fn run_ticker(sink: &ProgressSink, reported: &DoneSignal, done: &DoneSignal, ticker: &Ticker) {
    while !reported.wait_timeout(ticker.interval) {
        if done.is_released() {
            return;
        }
    }
    loop {
        if done.is_released() {
            break;
        }
        if !sink.append_fragment(&ticker.filler).is_delivered() {
            break;
        }
        if done.wait_timeout(ticker.interval) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::TaskQueue;
    use crate::progress::SharedTranscript;
    use std::sync::atomic::AtomicUsize;

    const WAIT: Duration = Duration::from_secs(10);

    struct Harness {
        queue: TaskQueue,
        sink: ProgressSink,
        transcript: SharedTranscript,
        calls: Arc<AtomicUsize>,
        outcome: Arc<Mutex<Option<OperationOutcome>>>,
    }

    impl Harness {
        fn new() -> Self {
            let queue = TaskQueue::new();
            let transcript = SharedTranscript::new();
            let sink = ProgressSink::new(queue.dispatcher(), transcript.clone());
            Self {
                queue,
                sink,
                transcript,
                calls: Arc::new(AtomicUsize::new(0)),
                outcome: Arc::new(Mutex::new(None)),
            }
        }

        fn controller(&self, kind: OperationKind) -> OperationController {
            OperationController::new(kind, "/tmp/b", self.queue.dispatcher())
        }

        fn on_complete(&self) -> impl FnOnce(&OperationOutcome) + Send + 'static {
            let calls = Arc::clone(&self.calls);
            let slot = Arc::clone(&self.outcome);
            move |outcome: &OperationOutcome| {
                calls.fetch_add(1, Ordering::SeqCst);
                *slot.lock().unwrap() = Some(outcome.clone());
            }
        }

        fn run_to_end(&self, controller: &OperationController) {
            assert!(self.queue.run_until(|| controller.is_finished(), WAIT));
            self.queue.run_pending();
        }
    }

    #[test]
    fn backup_transcript_ends_with_complete_line() {
        let harness = Harness::new();
        let controller = harness.controller(OperationKind::Backup);
        controller
            .start(
                |ctx| {
                    for i in 1..=3 {
                        ctx.report(&format!("Copying file {i} of 3..."))?;
                        ctx.report("...done")?;
                    }
                    Ok(())
                },
                harness.sink.clone(),
                harness.on_complete(),
            )
            .unwrap();
        harness.run_to_end(&controller);

        let transcript = harness.transcript.snapshot();
        assert_eq!(
            transcript.lines(),
            vec![
                "Copying file 1 of 3......done",
                "Copying file 2 of 3......done",
                "Copying file 3 of 3......done",
                "Backup Complete!",
            ]
        );
        assert!(transcript.is_finished());
        assert_eq!(controller.state(), OperationState::Completed);
        assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_surfaces_as_final_line() {
        let harness = Harness::new();
        let controller = harness.controller(OperationKind::Restore);
        controller
            .start(
                |_| Err(anyhow::anyhow!("Invalid backup").into()),
                harness.sink.clone(),
                harness.on_complete(),
            )
            .unwrap();
        harness.run_to_end(&controller);
        assert_eq!(controller.state(), OperationState::Failed);
        assert_eq!(
            harness.transcript.snapshot().lines(),
            vec!["Restore Failed: Invalid backup"]
        );
        assert_eq!(
            *harness.outcome.lock().unwrap(),
            Some(OperationOutcome::Failed("Invalid backup".into()))
        );
    }

    #[test]
    fn start_twice_is_rejected() {
        let harness = Harness::new();
        let controller = harness.controller(OperationKind::Backup);
        controller
            .start(|_| Ok(()), harness.sink.clone(), harness.on_complete())
            .unwrap();
        let err = controller
            .start(|_| Ok(()), harness.sink.clone(), harness.on_complete())
            .unwrap_err();
        assert_eq!(err, OperationError::NotIdle(OperationState::Running));
        harness.run_to_end(&controller);
        let err = controller
            .start(|_| Ok(()), harness.sink.clone(), harness.on_complete())
            .unwrap_err();
        assert_eq!(err, OperationError::NotIdle(OperationState::Completed));
        assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancellation_is_observed_at_checkpoint() {
        let harness = Harness::new();
        let controller = harness.controller(OperationKind::Backup);
        let reported = DoneSignal::default();
        let reported_in = reported.clone();
        let gate = DoneSignal::default();
        let gate_in = gate.clone();
        controller
            .start(
                move |ctx| {
                    ctx.report("Copying 'settings.json' ...")?;
                    reported_in.release();
                    gate_in.wait_timeout(WAIT);
                    ctx.checkpoint()?;
                    ctx.report("never written")?;
                    Ok(())
                },
                harness.sink.clone(),
                harness.on_complete(),
            )
            .unwrap();
        assert!(reported.wait_timeout(WAIT));
        controller.cancel();
        gate.release();
        harness.run_to_end(&controller);
        assert_eq!(controller.state(), OperationState::Cancelled);
        assert_eq!(
            harness.transcript.snapshot().lines(),
            vec!["Copying 'settings.json' ...Backup Cancelled"]
        );
        assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn abandon_races_with_natural_completion() {
        let harness = Harness::new();
        let controller = harness.controller(OperationKind::Backup);
        let gate = DoneSignal::default();
        let gate_in = gate.clone();
        controller
            .start(
                move |_| {
                    gate_in.wait_timeout(WAIT);
                    Ok(())
                },
                harness.sink.clone(),
                harness.on_complete(),
            )
            .unwrap();
        controller.abandon(&harness.sink);
        assert_eq!(controller.state(), OperationState::Cancelled);
        gate.release();
        // Let the worker's own settle task arrive and be ignored.
        harness
            .queue
            .run_until(|| false, Duration::from_millis(200));
        assert_eq!(controller.state(), OperationState::Cancelled);
        assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *harness.outcome.lock().unwrap(),
            Some(OperationOutcome::Cancelled)
        );
    }

    #[test]
    fn disposed_sink_stops_worker() {
        let harness = Harness::new();
        let controller = harness.controller(OperationKind::Backup);
        harness.sink.dispose();
        controller
            .start(
                |ctx| {
                    ctx.report("first")?;
                    Ok(())
                },
                harness.sink.clone(),
                harness.on_complete(),
            )
            .unwrap();
        harness.run_to_end(&controller);
        assert_eq!(controller.state(), OperationState::Cancelled);
        assert_eq!(harness.transcript.snapshot().rendered(), "");
        assert_eq!(harness.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn torn_down_ui_settles_without_callback() {
        let harness = Harness::new();
        let controller = harness.controller(OperationKind::Backup);
        let gate = DoneSignal::default();
        let gate_in = gate.clone();
        controller
            .start(
                move |_| {
                    gate_in.wait_timeout(WAIT);
                    Ok(())
                },
                harness.sink.clone(),
                harness.on_complete(),
            )
            .unwrap();
        let Harness { queue, calls, .. } = harness;
        drop(queue);
        gate.release();
        let deadline = std::time::Instant::now() + WAIT;
        while !controller.is_finished() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(controller.state(), OperationState::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn ticker_stops_before_final_line() {
        let harness = Harness::new();
        let controller = harness.controller(OperationKind::ProxyTest);
        controller
            .start_with_ticker(
                |ctx| {
                    ctx.report("Testing SOCKS connection to localhost:1080")?;
                    thread::sleep(Duration::from_millis(60));
                    ctx.report("\nConnection OK - supported version(s): V5")?;
                    Ok(())
                },
                harness.sink.clone(),
                harness.on_complete(),
                Ticker {
                    interval: Duration::from_millis(10),
                    filler: ".".into(),
                },
            )
            .unwrap();
        harness.run_to_end(&controller);
        let transcript = harness.transcript.snapshot();
        let rendered = transcript.rendered();
        assert!(rendered.starts_with("Testing SOCKS connection to localhost:1080\n."));
        assert!(rendered.contains(".\nConnection OK - supported version(s): V5\n"));
        assert!(rendered.ends_with("Proxy test Complete!\n"));
        assert_eq!(rendered.matches("Complete!").count(), 1);
    }

    #[test]
    fn ticker_waits_for_the_first_report() {
        let harness = Harness::new();
        let controller = harness.controller(OperationKind::ProxyTest);
        controller
            .start_with_ticker(
                |ctx| {
                    thread::sleep(Duration::from_millis(40));
                    ctx.report("Testing SOCKS connection to localhost:1080")?;
                    Ok(())
                },
                harness.sink.clone(),
                harness.on_complete(),
                Ticker {
                    interval: Duration::from_millis(5),
                    filler: ".".into(),
                },
            )
            .unwrap();
        harness.run_to_end(&controller);
        let rendered = harness.transcript.snapshot().rendered().to_string();
        assert!(rendered.starts_with("Testing SOCKS connection to localhost:1080\n"));
        assert!(rendered.ends_with("Proxy test Complete!\n"));
    }

    #[test]
    fn silent_worker_gets_no_filler() {
        let harness = Harness::new();
        let controller = harness.controller(OperationKind::ProxyTest);
        controller
            .start_with_ticker(
                |_| {
                    thread::sleep(Duration::from_millis(30));
                    Ok(())
                },
                harness.sink.clone(),
                harness.on_complete(),
                Ticker {
                    interval: Duration::from_millis(5),
                    filler: ".".into(),
                },
            )
            .unwrap();
        harness.run_to_end(&controller);
        assert_eq!(
            harness.transcript.snapshot().rendered(),
            "Proxy test Complete!\n"
        );
    }

    #[test]
    fn final_lines_name_the_operation() {
        assert_eq!(
            OperationOutcome::Completed.final_line(OperationKind::Backup),
            "Backup Complete!"
        );
        assert_eq!(
            OperationOutcome::Failed("boom".into()).final_line(OperationKind::AutoBackup),
            "Auto backup Failed: boom"
        );
    }
}
