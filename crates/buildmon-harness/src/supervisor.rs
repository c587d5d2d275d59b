//! Output supervision for a supervised tool process
//!
//! Wraps exactly one [`ProcessHandle`]: demultiplexes its stdout/stderr into a
//! single logical event stream and exposes pattern waits, pattern races,
//! build-completion waits, and termination control on top of it.
//!
//! The "protocol" here is substring matching against free-text tool output. It
//! is inherently best-effort and coupled to the tool's log wording; that
//! fragility is the contract, not an implementation accident.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};

use buildmon_core::events::{ProcessEvent, StreamSource};
use buildmon_core::prelude::*;

use crate::launcher::{Launched, ProcessHandle};

/// Fixed marker the supervised tool prints after a successful (re)build.
///
/// Matched per chunk, exactly as the tool emits it. A marker split across two
/// chunks does not match.
pub const BUILD_SUCCESS_MARKER: &str = "Build successful";

/// Messages into the dispatcher task. Chunks, exit reports, registrations, and
/// kill requests all travel over one channel, so their relative order is the
/// order the supervisor observes them in.
enum Msg {
    Event(ProcessEvent),
    WaitOutput {
        target: String,
        reply: PatternReply,
    },
    WaitBuild {
        reply: oneshot::Sender<Result<()>>,
    },
    WaitExit {
        reply: oneshot::Sender<Result<Option<i32>>>,
    },
    Kill,
}

/// Reply slot for a pattern wait.
///
/// A plain wait owns its slot alone. A race group shares one slot between all
/// its waits: the first match takes the sender, and the losers stay registered
/// but find the slot empty when they eventually match, so their resolution is
/// discarded. This reproduces the original first-match-wins / leaked-listener
/// behavior without letting a loser fire after the race is decided.
#[derive(Clone)]
struct PatternReply(Arc<Mutex<Option<oneshot::Sender<Result<String>>>>>);

impl PatternReply {
    fn new() -> (Self, oneshot::Receiver<Result<String>>) {
        let (tx, rx) = oneshot::channel();
        (Self(Arc::new(Mutex::new(Some(tx)))), rx)
    }

    fn send(&self, value: Result<String>) {
        if let Ok(mut slot) = self.0.lock() {
            if let Some(tx) = slot.take() {
                let _ = tx.send(value);
            }
        }
    }
}

/// One outstanding pattern wait.
///
/// Each wait accumulates its own copy of all output seen since registration.
/// The buffer is per-registration on purpose: a wait registered later must not
/// match text that arrived earlier, so there is no process-wide buffer to
/// consult retroactively.
struct PendingWait {
    target: String,
    buffer: String,
    reply: PatternReply,
}

impl PendingWait {
    fn match_at(&self) -> Option<usize> {
        self.buffer.find(&self.target)
    }
}

enum State {
    Running,
    Terminated { code: Option<i32> },
    Errored(FailureReason),
}

/// Dispatcher state. Lives in a single task, so chunk delivery and wait
/// registration are processed one at a time with no concurrent mutation.
struct Dispatcher {
    state: State,
    pattern_waits: Vec<PendingWait>,
    build_waits: VecDeque<oneshot::Sender<Result<()>>>,
    exit_waits: Vec<oneshot::Sender<Result<Option<i32>>>>,
    /// One-shot sender that tells the wait task to force-kill the process.
    /// Consumed on the first kill request.
    kill_tx: Option<oneshot::Sender<()>>,
    /// Set when a kill was requested, so the following exit is classified as
    /// deliberate termination rather than an error.
    kill_requested: bool,
    exited: Arc<AtomicBool>,
}

impl Dispatcher {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Msg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                Msg::Event(ProcessEvent::Output { source, text }) => self.on_chunk(source, &text),
                Msg::Event(ProcessEvent::Exited { code }) => self.on_exited(code),
                Msg::WaitOutput { target, reply } => self.on_wait_output(target, reply),
                Msg::WaitBuild { reply } => self.on_wait_build(reply),
                Msg::WaitExit { reply } => self.on_wait_exit(reply),
                Msg::Kill => self.on_kill(),
            }
        }
        debug!("supervisor dispatcher finished");
    }

    fn on_chunk(&mut self, source: StreamSource, text: &str) {
        trace!("{}: {}", source.as_str(), text);

        if !matches!(self.state, State::Running) {
            return;
        }

        // Feed every registered wait its own copy of the chunk.
        for wait in &mut self.pattern_waits {
            wait.buffer.push_str(text);
        }

        // Resolve matches ordered by target position in the accumulated text.
        // Waits in a race group share identical buffers, so when one chunk
        // satisfies several of them, the earlier occurrence takes the slot.
        let mut matched: Vec<(usize, usize)> = self
            .pattern_waits
            .iter()
            .enumerate()
            .filter_map(|(idx, wait)| wait.match_at().map(|pos| (pos, idx)))
            .collect();
        matched.sort_unstable();

        for &(_, idx) in &matched {
            let wait = &self.pattern_waits[idx];
            debug!("output wait matched: {:?}", wait.target);
            wait.reply.send(Ok(wait.buffer.clone()));
        }

        // Remove resolved waits, preserving registration order of the rest.
        let mut removed: Vec<usize> = matched.into_iter().map(|(_, idx)| idx).collect();
        removed.sort_unstable_by(|a, b| b.cmp(a));
        for idx in removed {
            self.pattern_waits.remove(idx);
        }

        // One build wait is re-armed per marker-carrying chunk, oldest first.
        if text.contains(BUILD_SUCCESS_MARKER) {
            if let Some(reply) = self.build_waits.pop_front() {
                debug!("build completion observed");
                let _ = reply.send(Ok(()));
            } else {
                trace!("build completion observed with no wait registered");
            }
        }
    }

    fn on_exited(&mut self, code: Option<i32>) {
        if !matches!(self.state, State::Running) {
            return;
        }

        // Mark exited before resolving any waiter, so has_exited() is already
        // true when a resolved caller runs.
        self.exited.store(true, Ordering::Release);

        if self.kill_requested || code == Some(0) {
            info!("process terminated (code: {:?})", code);
            self.state = State::Terminated { code };
            for reply in self.exit_waits.drain(..) {
                let _ = reply.send(Ok(code));
            }
            // Pattern and build waits stay pending: a deliberately killed
            // serve process must not look like a matched pattern.
        } else {
            warn!("process exited unexpectedly with code: {:?}", code);
            self.fail(FailureReason::Exit { code });
        }
    }

    /// Enter `Errored`: every outstanding wait rejects with the same cause,
    /// and every wait registered afterwards rejects immediately.
    fn fail(&mut self, reason: FailureReason) {
        for wait in self.pattern_waits.drain(..) {
            wait.reply.send(Err(reason.to_error()));
        }
        for reply in self.build_waits.drain(..) {
            let _ = reply.send(Err(reason.to_error()));
        }
        for reply in self.exit_waits.drain(..) {
            let _ = reply.send(Err(reason.to_error()));
        }
        self.state = State::Errored(reason);
    }

    fn on_wait_output(&mut self, target: String, reply: PatternReply) {
        match &self.state {
            State::Errored(reason) => reply.send(Err(reason.to_error())),
            // Registered under Terminated too: such a wait hangs, exactly like
            // a wait whose output arrived before registration.
            _ => self.pattern_waits.push(PendingWait {
                target,
                buffer: String::new(),
                reply,
            }),
        }
    }

    fn on_wait_build(&mut self, reply: oneshot::Sender<Result<()>>) {
        match &self.state {
            State::Errored(reason) => {
                let _ = reply.send(Err(reason.to_error()));
            }
            _ => self.build_waits.push_back(reply),
        }
    }

    fn on_wait_exit(&mut self, reply: oneshot::Sender<Result<Option<i32>>>) {
        match &self.state {
            State::Running => self.exit_waits.push(reply),
            State::Terminated { code } => {
                let _ = reply.send(Ok(*code));
            }
            State::Errored(reason) => {
                let _ = reply.send(Err(reason.to_error()));
            }
        }
    }

    fn on_kill(&mut self) {
        if !matches!(self.state, State::Running) {
            debug!("kill requested on terminated process, ignoring");
            return;
        }
        self.kill_requested = true;
        if let Some(tx) = self.kill_tx.take() {
            info!("kill requested, signalling wait task");
            // Ignore send error -- the wait task may have already exited naturally.
            let _ = tx.send(());
        }
    }
}

/// Read raw chunks from one output stream and forward them to the dispatcher.
///
/// Chunk-based rather than line-based: matching is substring containment over
/// output "as it becomes available", and a tool may leave a partial line
/// unterminated indefinitely.
async fn stream_reader<R>(mut stream: R, source: StreamSource, tx: mpsc::UnboundedSender<Msg>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                if tx
                    .send(Msg::Event(ProcessEvent::Output { source, text }))
                    .is_err()
                {
                    debug!("{} channel closed", source.as_str());
                    break;
                }
            }
            Err(e) => {
                warn!("error reading {}: {}", source.as_str(), e);
                break;
            }
        }
    }

    debug!("{} reader finished", source.as_str());
}

/// Background task: owns the `Child`, waits for it to exit, reports the real
/// exit code to the dispatcher.
///
/// Two ways the task can end:
/// 1. The process exits naturally -- `child.wait()` resolves.
/// 2. `kill_rx` fires -- we kill the child first, then wait for it.
///
/// Either way the child is reaped here, exactly once.
async fn wait_for_exit(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    tx: mpsc::UnboundedSender<Msg>,
) {
    let code: Option<i32> = tokio::select! {
        result = child.wait() => {
            match result {
                Ok(status) => {
                    info!("process exited with status: {:?}", status);
                    status.code()
                }
                Err(e) => {
                    error!("error waiting for process: {}", e);
                    None
                }
            }
        }
        _ = kill_rx => {
            if let Err(e) = child.kill().await {
                error!("failed to kill process: {}", e);
            }
            match child.wait().await {
                Ok(status) => {
                    info!("process killed, exit status: {:?}", status);
                    status.code()
                }
                Err(e) => {
                    error!("error waiting after kill: {}", e);
                    None
                }
            }
        }
    };

    let _ = tx.send(Msg::Event(ProcessEvent::Exited { code }));
}

/// Supervises one tool process.
///
/// Owns the [`ProcessHandle`] for its lifetime. Wait registrations are
/// synchronous; the returned futures suspend the caller until matching output
/// arrives or the process errors. Multiple waits may be outstanding at once
/// and resolve independently, in whatever order their conditions are met.
///
/// Known race, preserved from the source behavior: a wait registered after the
/// triggering output has already been delivered hangs. Callers race against
/// real time; register before provoking the output.
#[derive(Debug)]
pub struct SupervisedProcess {
    tx: mpsc::UnboundedSender<Msg>,
    pid: Option<u32>,
    /// Assigned at construction for server processes; `None` otherwise.
    port: Option<u16>,
    /// Set to `true` by the dispatcher once the child has exited.
    /// Allows synchronous `has_exited()` / `is_running()` checks.
    exited: Arc<AtomicBool>,
    http: reqwest::Client,
}

impl SupervisedProcess {
    /// Supervise a process with no associated server port.
    pub fn new(handle: ProcessHandle) -> Self {
        Self::attach(handle, None)
    }

    /// Supervise a network-bound server process. `port` is the port the tool
    /// was told to serve on; [`request`](Self::request) uses it.
    pub fn with_port(handle: ProcessHandle, port: u16) -> Self {
        Self::attach(handle, Some(port))
    }

    fn attach(handle: ProcessHandle, port: Option<u16>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let exited = Arc::new(AtomicBool::new(false));

        let mut dispatcher = Dispatcher {
            state: State::Running,
            pattern_waits: Vec::new(),
            build_waits: VecDeque::new(),
            exit_waits: Vec::new(),
            kill_tx: None,
            kill_requested: false,
            exited: Arc::clone(&exited),
        };

        match handle.launched {
            Launched::Spawned(mut child) => {
                let stdout = child.stdout.take().expect("stdout was configured");
                tokio::spawn(stream_reader(stdout, StreamSource::Stdout, tx.clone()));

                let stderr = child.stderr.take().expect("stderr was configured");
                tokio::spawn(stream_reader(stderr, StreamSource::Stderr, tx.clone()));

                let (kill_tx, kill_rx) = oneshot::channel::<()>();
                dispatcher.kill_tx = Some(kill_tx);

                // The wait task takes ownership of `child`.
                tokio::spawn(wait_for_exit(child, kill_rx, tx.clone()));
            }
            Launched::Failed(reason) => {
                // The process never ran: start in Errored so every wait,
                // current or future, observes the spawn failure.
                warn!("supervising a failed spawn: {:?}", reason);
                exited.store(true, Ordering::Release);
                dispatcher.state = State::Errored(reason);
            }
        }

        tokio::spawn(dispatcher.run(rx));

        Self {
            tx,
            pid: handle.pid,
            port,
            exited,
            http: reqwest::Client::new(),
        }
    }

    /// Wait until output (either stream) accumulated since this call contains
    /// `target`, then resolve with the full accumulated text.
    ///
    /// Registration happens synchronously, before the returned future is first
    /// polled. Output delivered before this call is never matched.
    pub fn wait_for_output(
        &self,
        target: impl Into<String>,
    ) -> impl Future<Output = Result<String>> {
        let (reply, rx) = PatternReply::new();
        let registered = self
            .tx
            .send(Msg::WaitOutput {
                target: target.into(),
                reply,
            })
            .is_ok();

        async move {
            if !registered {
                return Err(Error::ChannelClosed);
            }
            rx.await.map_err(|_| Error::ChannelClosed)?
        }
    }

    /// Register one pattern wait per target and resolve with whichever matches
    /// first. The losing waits stay registered; their eventual resolutions are
    /// discarded.
    pub fn race_for_outputs(&self, targets: &[&str]) -> impl Future<Output = Result<String>> {
        let (reply, rx) = PatternReply::new();
        let mut registered = true;
        for target in targets {
            registered &= self
                .tx
                .send(Msg::WaitOutput {
                    target: (*target).to_string(),
                    reply: reply.clone(),
                })
                .is_ok();
        }

        async move {
            if !registered {
                return Err(Error::ChannelClosed);
            }
            rx.await.map_err(|_| Error::ChannelClosed)?
        }
    }

    /// Wait for the next build-success marker after this call.
    ///
    /// Single-shot: each call arms one wait, and each marker-carrying chunk
    /// resolves one wait, oldest first. Call again after a resolution to wait
    /// for the next rebuild. Rejects if the process errors first.
    pub fn wait_for_build(&self) -> impl Future<Output = Result<()>> {
        let (reply, rx) = oneshot::channel();
        let registered = self.tx.send(Msg::WaitBuild { reply }).is_ok();

        async move {
            if !registered {
                return Err(Error::ChannelClosed);
            }
            rx.await.map_err(|_| Error::ChannelClosed)?
        }
    }

    /// Wait for the process to reach a terminal state: resolves with the exit
    /// code on deliberate termination (exit 0 or kill), rejects with the cause
    /// if the process errored. Immediate if already terminal.
    pub fn wait_until_exit(&self) -> impl Future<Output = Result<Option<i32>>> {
        let (reply, rx) = oneshot::channel();
        let registered = self.tx.send(Msg::WaitExit { reply }).is_ok();

        async move {
            if !registered {
                return Err(Error::ChannelClosed);
            }
            rx.await.map_err(|_| Error::ChannelClosed)?
        }
    }

    /// Terminate the process unconditionally. Idempotent: killing an
    /// already-terminated process is a no-op, never an error.
    pub fn kill(&self) {
        let _ = self.tx.send(Msg::Kill);
    }

    /// HTTP GET against the supervised server: `http://localhost:{port}{path}`.
    ///
    /// Only valid for supervisors constructed with a port.
    pub async fn request(&self, path: &str) -> Result<reqwest::Response> {
        let port = self.port.ok_or(Error::NoServerPort)?;
        let url = format!("http://localhost:{}{}", port, path);
        debug!("GET {}", url);
        Ok(self.http.get(&url).send().await?)
    }

    /// Check if the process has already exited.
    ///
    /// Non-blocking, synchronous check backed by an atomic flag set by the
    /// dispatcher before it resolves any exit waiter.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Check if the process is still running.
    pub fn is_running(&self) -> bool {
        !self.has_exited()
    }

    /// Get the process ID, if the spawn succeeded.
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// The server port this supervisor was constructed with, if any.
    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl Drop for SupervisedProcess {
    fn drop(&mut self) {
        if !self.has_exited() {
            warn!("SupervisedProcess dropped while process may still be running");
            // Route a kill through the dispatcher so the wait task reaps the
            // child. kill_on_drop on the Child is the final safety net.
            let _ = self.tx.send(Msg::Kill);
        }
        debug!("SupervisedProcess dropped");
    }
}
