//! Structural-edit Commands
//!
//! Interactive commands (drawing a guide line, inserting a shape) edit the
//! graph from worker threads while a render loop keeps pulling from it.
//!
//! # Discipline
//!
//! - Each command runs on its own thread.
//! - Blocking commands, the default, hold one edit lock shared by every
//!   command of a [`CommandRunner`], so at most one of them runs at a time.
//!   Non-blocking commands skip the lock.
//! - The runner counts commands in flight. Render loops use
//!   [`CommandRunner::in_flight`] to avoid issuing overlapping edits.
//! - The graph itself sits behind its own mutex. Every graph operation,
//!   including pulls from the render thread, takes it for the duration of
//!   that one operation, so a command's edits interleave with pulls between
//!   calls, never within one.
//! - Cancellation is cooperative: commands poll
//!   [`CommandContext::is_cancelled`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Mutex, MutexGuard};

use crate::error::CommandError;
use crate::graph::Graph;

/// A graph shared between a render loop and command threads.
pub type SharedGraph = Arc<Mutex<Graph>>;

/// A unit of structural editing.
pub trait Command: Send + 'static {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Perform the edit.
    fn run(&mut self, ctx: &CommandContext) -> Result<(), CommandError>;

    /// Whether the command must not overlap other blocking commands.
    fn blocking(&self) -> bool {
        true
    }
}

/// What a running command can reach.
#[derive(Debug, Clone)]
pub struct CommandContext {
    graph: SharedGraph,
    cancelled: Arc<AtomicBool>,
}

impl CommandContext {
    /// Lock the graph for one or more operations.
    ///
    /// Keep the guard short-lived so pulls from other threads can proceed.
    pub fn graph(&self) -> MutexGuard<'_, Graph> {
        self.graph.lock()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(CommandError::Cancelled)` once cancellation was requested.
    pub fn check_cancelled(&self) -> Result<(), CommandError> {
        if self.is_cancelled() {
            Err(CommandError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Handle to a command running on its own thread.
#[derive(Debug)]
pub struct CommandHandle {
    name: String,
    cancelled: Arc<AtomicBool>,
    thread: JoinHandle<Result<(), CommandError>>,
}

impl CommandHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ask the command to stop at its next cancellation check.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the command and return its outcome.
    pub fn join(self) -> Result<(), CommandError> {
        self.thread.join().map_err(|_| CommandError::Panicked)?
    }
}

/// Runs commands against one shared graph.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    graph: SharedGraph,
    edit_lock: Arc<Mutex<()>>,
    in_flight: Arc<Mutex<usize>>,
}

/// Decrements the in-flight count when a command thread ends, however it ends.
struct InFlight(Arc<Mutex<usize>>);

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut count = self.0.lock();
        *count = count.saturating_sub(1);
    }
}

impl CommandRunner {
    pub fn new(graph: Graph) -> Self {
        Self::with_shared(Arc::new(Mutex::new(graph)))
    }

    pub fn with_shared(graph: SharedGraph) -> Self {
        Self {
            graph,
            edit_lock: Arc::new(Mutex::new(())),
            in_flight: Arc::new(Mutex::new(0)),
        }
    }

    /// The shared graph, for render-loop pulls.
    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    /// Number of commands spawned and not yet finished.
    pub fn in_flight(&self) -> usize {
        *self.in_flight.lock()
    }

    /// Start `command` on a new thread.
    pub fn spawn<C: Command>(&self, mut command: C) -> Result<CommandHandle, CommandError> {
        let name = command.name().to_string();
        let cancelled = Arc::new(AtomicBool::new(false));
        let ctx = CommandContext {
            graph: Arc::clone(&self.graph),
            cancelled: Arc::clone(&cancelled),
        };
        let edit_lock = Arc::clone(&self.edit_lock);

        *self.in_flight.lock() += 1;
        let guard = InFlight(Arc::clone(&self.in_flight));
        let thread_name = name.clone();

        let thread = thread::Builder::new()
            .name(format!("command:{name}"))
            .spawn(move || {
                let _guard = guard;
                let _edit = command.blocking().then(|| edit_lock.lock());
                let _span = tracing::debug_span!("command", name = %thread_name).entered();
                // Queued behind another command; it may have been cancelled meanwhile.
                ctx.check_cancelled()?;
                tracing::debug!("command started");
                let result = command.run(&ctx);
                match &result {
                    Ok(()) => tracing::debug!("command finished"),
                    Err(err) => tracing::warn!(error = %err, "command failed"),
                }
                result
            })
            .map_err(|err| CommandError::Failed(format!("could not spawn thread: {err}")))?;

        Ok(CommandHandle {
            name,
            cancelled,
            thread,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    /// Records the highest number of overlapping runs it observed.
    struct Overlap {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        blocking: bool,
    }

    impl Command for Overlap {
        fn name(&self) -> &str {
            "overlap"
        }

        fn run(&mut self, _ctx: &CommandContext) -> Result<(), CommandError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }

        fn blocking(&self) -> bool {
            self.blocking
        }
    }

    fn run_overlapping(runner: &CommandRunner, blocking: bool) -> usize {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                runner
                    .spawn(Overlap {
                        active: active.clone(),
                        peak: peak.clone(),
                        blocking,
                    })
                    .unwrap()
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        peak.load(Ordering::SeqCst)
    }

    #[test]
    fn blocking_commands_never_overlap() {
        let runner = CommandRunner::new(Graph::new());
        assert_eq!(run_overlapping(&runner, true), 1);
        assert_eq!(runner.in_flight(), 0);
    }

    #[test]
    fn non_blocking_commands_skip_the_edit_lock() {
        let runner = CommandRunner::new(Graph::new());
        // Hold the edit lock: only non-blocking commands can make progress.
        let _held = runner.edit_lock.lock();
        assert!(run_overlapping(&runner, false) >= 1);
    }

    struct WaitForCancel {
        started: mpsc::Sender<()>,
    }

    impl Command for WaitForCancel {
        fn name(&self) -> &str {
            "wait"
        }

        fn run(&mut self, ctx: &CommandContext) -> Result<(), CommandError> {
            self.started.send(()).ok();
            loop {
                ctx.check_cancelled()?;
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    #[test]
    fn cancel_is_observed_and_counter_drops() {
        let runner = CommandRunner::new(Graph::new());
        let (tx, rx) = mpsc::channel();
        let handle = runner.spawn(WaitForCancel { started: tx }).unwrap();
        rx.recv().unwrap();
        assert_eq!(runner.in_flight(), 1);

        handle.cancel();
        assert!(matches!(handle.join(), Err(CommandError::Cancelled)));
        assert_eq!(runner.in_flight(), 0);
    }

    struct Panics;

    impl Command for Panics {
        fn name(&self) -> &str {
            "panics"
        }

        fn run(&mut self, _ctx: &CommandContext) -> Result<(), CommandError> {
            panic!("boom");
        }
    }

    #[test]
    fn panicking_command_is_reported_and_uncounted() {
        let runner = CommandRunner::new(Graph::new());
        let handle = runner.spawn(Panics).unwrap();
        assert!(matches!(handle.join(), Err(CommandError::Panicked)));
        assert_eq!(runner.in_flight(), 0);
    }
}
