use super::*;

/// Writes progress text straight to stdout as it arrives.
pub(super) struct TerminalView;

impl ProgressView for TerminalView {
    fn append(&mut self, text: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

pub(super) fn terminal_sink(queue: &TaskQueue) -> ProgressSink {
    ProgressSink::new(queue.dispatcher(), TerminalView)
}

/// SIGINT/SIGTERM flag polled while an operation runs. The first signal
/// asks the operation to stop; a second one exits the process.
#[derive(Clone, Default)]
pub(super) struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    pub(super) fn register() -> Self {
        let interrupt = Self::default();
        for (signal, name) in [(SIGINT, "SIGINT"), (SIGTERM, "SIGTERM")] {
            if let Err(err) = signal_hook::flag::register_conditional_shutdown(
                signal,
                130,
                Arc::clone(&interrupt.flag),
            ) {
                warn!(signal = name, error = %err, "Failed to register forced shutdown");
            }
            if let Err(err) = signal_hook::flag::register(signal, Arc::clone(&interrupt.flag)) {
                warn!(signal = name, error = %err, "Failed to register interrupt handler");
            }
        }
        interrupt
    }

    #[cfg(test)]
    pub(super) fn raise(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub(super) fn is_raised(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Drives the affinity loop on the calling thread until the operation
/// settles. An interrupt cancels the operation once; the loop then keeps
/// running so the worker can clean up and settle.
pub(super) fn wait_for(
    queue: &TaskQueue,
    controller: &OperationController,
    interrupt: &Interrupt,
) -> OperationState {
    let mut cancelled = false;
    loop {
        let woke = queue.run_until(
            || controller.is_finished() || (!cancelled && interrupt.is_raised()),
            Duration::from_secs(1),
        );
        if controller.is_finished() {
            break;
        }
        if woke && !cancelled {
            warn!(operation = %controller.id(), "Interrupted; cancelling operation");
            eprintln!("Cancelling... press Ctrl-C again to exit immediately");
            controller.cancel();
            cancelled = true;
        }
    }
    queue.run_pending();
    controller.state()
}

/// Asks a yes/no question; anything but an explicit yes declines.
pub(super) fn confirm(
    prompt: &str,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> io::Result<bool> {
    write!(output, "{prompt} [y/N] ")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
