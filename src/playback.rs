//! Playback engine.
//!
//! `Idle -> Running -> Idle`. A run replays an immutable snapshot of the action
//! list on a dedicated worker thread until its [`RepeatPolicy`] is exhausted, a
//! stop is requested, or a pointer primitive fails. Progress reaches the caller
//! as [`PlaybackEvent`]s on the channel returned by [`PlaybackEngine::new`].

use crate::{
    action::ClickAction,
    error::{ParseError, PointerError},
    pointer::Pointer,
    presentation::Presentation,
};
use parking_lot::Mutex;
use rand::Rng;
use std::{
    num::{NonZeroU32, NonZeroU64},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread,
    time::{Duration, Instant},
};

/// Largest offset jitter adds to or removes from a delay.
pub const JITTER_MS: i64 = 100;

/// How long shutdown waits for the worker to exit.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

const SLEEP_SLICE_MS: u64 = 50;
const EMPTY_PASS_IDLE: Duration = Duration::from_millis(200);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepeatPolicy {
    ByCount(NonZeroU32),
    ByDuration(NonZeroU64),
    Unbounded,
}

/// Which repeat field the user selected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RepeatMode {
    Count,
    Duration,
    #[default]
    Unbounded,
}

impl RepeatPolicy {
    pub fn count(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Self::ByCount)
    }

    pub fn seconds(s: u64) -> Option<Self> {
        NonZeroU64::new(s).map(Self::ByDuration)
    }

    /// Reads only the field belonging to `mode`.
    pub fn from_inputs(mode: RepeatMode, count: &str, seconds: &str) -> Result<Self, ParseError> {
        match mode {
            RepeatMode::Count => {
                let n = positive("Repeat count", count)?;
                NonZeroU32::try_from(n).map(Self::ByCount).map_err(|_| ParseError::InvalidInteger {
                    field: "Repeat count",
                    value: count.trim().to_string(),
                })
            }
            RepeatMode::Duration => Ok(Self::ByDuration(positive("Repeat seconds", seconds)?)),
            RepeatMode::Unbounded => Ok(Self::Unbounded),
        }
    }

    /// Checked once after every full pass.
    fn exhausted(&self, completed_cycles: u64, started: Option<Instant>) -> bool {
        match *self {
            RepeatPolicy::ByCount(n) => completed_cycles >= u64::from(n.get()),
            RepeatPolicy::ByDuration(s) => {
                started.map_or(true, |t| t.elapsed() >= Duration::from_secs(s.get()))
            }
            RepeatPolicy::Unbounded => false,
        }
    }
}

fn positive(field: &'static str, raw: &str) -> Result<NonZeroU64, ParseError> {
    let raw = raw.trim();
    let value: i64 = raw
        .parse()
        .map_err(|_| ParseError::InvalidInteger { field, value: raw.to_string() })?;
    u64::try_from(value)
        .ok()
        .and_then(NonZeroU64::new)
        .ok_or_else(|| ParseError::NotPositive { field, value: raw.to_string() })
}

/// Nominal delay plus a fresh uniform offset in `[-JITTER_MS, JITTER_MS]`, clamped at zero.
pub fn jittered_delay<R: Rng + ?Sized>(nominal_ms: u64, rng: &mut R) -> u64 {
    let nominal = i64::try_from(nominal_ms).unwrap_or(i64::MAX);
    let offset = rng.gen_range(-JITTER_MS..=JITTER_MS);
    nominal.saturating_add(offset).max(0) as u64
}

/// Transient state of one run, readable for display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackSession {
    pub running: bool,
    pub completed_cycles: u64,
    pub start_timestamp: Option<Instant>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExitReason {
    Exhausted,
    Stopped,
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaybackSummary {
    pub cycles: u64,
    pub clicks: u64,
    pub reason: ExitReason,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaybackEvent {
    Clicked { index: usize, x: i32, y: i32, delay_ms: u64 },
    CycleCompleted(u64),
    Finished(PlaybackSummary),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
    /// The previous worker has not exited yet.
    StillStopping,
}

struct RunShared {
    stop: AtomicBool,
    session: Mutex<PlaybackSession>,
}

impl RunShared {
    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

struct ActiveRun {
    shared: Arc<RunShared>,
    handle: Option<thread::JoinHandle<()>>,
    done: mpsc::Receiver<()>,
    exited: bool,
}

impl ActiveRun {
    fn poll_exit(&mut self) -> bool {
        if !self.exited && self.done.try_recv().is_ok() {
            self.exited = true;
        }
        if self.exited {
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
        self.exited
    }

    fn wait_exit(&mut self, timeout: Duration) -> bool {
        if !self.exited && self.done.recv_timeout(timeout).is_ok() {
            self.exited = true;
        }
        self.poll_exit()
    }
}

/// Stops whichever run is current. Clones share the engine's run slot, so a
/// hotkey thread can stop playback without going through the UI loop.
#[derive(Clone)]
pub struct StopHandle {
    current: Arc<Mutex<Option<Arc<RunShared>>>>,
    presentation: Arc<dyn Presentation>,
}

impl StopHandle {
    /// Requests a stop and returns at once; the worker exits before its next click.
    pub fn stop(&self) {
        let Some(shared) = self.current.lock().clone() else { return };
        let was_running = {
            let mut session = shared.session.lock();
            shared.stop.store(true, Ordering::SeqCst);
            std::mem::replace(&mut session.running, false)
        };
        if was_running {
            tracing::info!("Stopped clicking");
            self.presentation.show();
        }
    }
}

pub struct PlaybackEngine<P: Pointer + Clone> {
    pointer: P,
    presentation: Arc<dyn Presentation>,
    events: mpsc::Sender<PlaybackEvent>,
    active: Option<ActiveRun>,
    stopper: StopHandle,
}

impl<P: Pointer + Clone> PlaybackEngine<P> {
    pub fn new(
        pointer: P,
        presentation: Arc<dyn Presentation>,
    ) -> (Self, mpsc::Receiver<PlaybackEvent>) {
        let (events, rx) = mpsc::channel();
        let stopper = StopHandle { current: Arc::default(), presentation: Arc::clone(&presentation) };
        (Self { pointer, presentation, events, active: None, stopper }, rx)
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stopper.clone()
    }

    /// Starts a run over `snapshot`. Does nothing while a run is active.
    pub fn start(
        &mut self,
        snapshot: Arc<[ClickAction]>,
        policy: RepeatPolicy,
        jitter: bool,
    ) -> StartOutcome {
        if let Some(active) = self.active.as_mut() {
            if active.shared.session.lock().running {
                tracing::debug!("Start ignored: already running");
                return StartOutcome::AlreadyRunning;
            }
            if !active.poll_exit() {
                tracing::warn!("Start ignored: previous run is still stopping");
                return StartOutcome::StillStopping;
            }
        }

        let shared = Arc::new(RunShared {
            stop: AtomicBool::new(false),
            session: Mutex::new(PlaybackSession {
                running: true,
                completed_cycles: 0,
                start_timestamp: matches!(policy, RepeatPolicy::ByDuration(_)).then(Instant::now),
            }),
        });
        let (done_tx, done) = mpsc::channel();

        tracing::info!(
            "Starting clicking: {} clicks per pass, {:?}, jitter {}",
            snapshot.len(),
            policy,
            if jitter { "on" } else { "off" }
        );
        self.presentation.hide();
        *self.stopper.current.lock() = Some(Arc::clone(&shared));

        let worker = Worker {
            pointer: self.pointer.clone(),
            actions: snapshot,
            policy,
            jitter,
            shared: Arc::clone(&shared),
            events: self.events.clone(),
            presentation: Arc::clone(&self.presentation),
        };
        let handle = thread::spawn(move || worker.run(done_tx));

        self.active = Some(ActiveRun { shared, handle: Some(handle), done, exited: false });
        StartOutcome::Started
    }

    /// See [`StopHandle::stop`].
    pub fn stop(&mut self) {
        self.stopper.stop();
    }

    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|a| a.shared.session.lock().running)
    }

    pub fn session(&self) -> PlaybackSession {
        self.active.as_ref().map(|a| *a.shared.session.lock()).unwrap_or_default()
    }

    /// Stop, then wait up to `timeout` for the worker to leave the pointer alone.
    /// Returns `false` when the worker is still alive after the timeout.
    pub fn shutdown(&mut self, timeout: Duration) -> bool {
        self.stop();
        match self.active.as_mut() {
            Some(active) => {
                let exited = active.wait_exit(timeout);
                if !exited {
                    tracing::warn!("Playback worker did not exit within {:?}", timeout);
                }
                exited
            }
            None => true,
        }
    }
}

impl<P: Pointer + Clone> Drop for PlaybackEngine<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker<P> {
    pointer: P,
    actions: Arc<[ClickAction]>,
    policy: RepeatPolicy,
    jitter: bool,
    shared: Arc<RunShared>,
    events: mpsc::Sender<PlaybackEvent>,
    presentation: Arc<dyn Presentation>,
}

/// Runs on every exit path of the worker, panics included.
struct Cleanup {
    shared: Arc<RunShared>,
    events: mpsc::Sender<PlaybackEvent>,
    presentation: Arc<dyn Presentation>,
    done: mpsc::Sender<()>,
    summary: PlaybackSummary,
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        let was_running = {
            let mut session = self.shared.session.lock();
            let was_running = session.running;
            *session = PlaybackSession::default();
            self.shared.stop.store(true, Ordering::SeqCst);
            was_running
        };
        if was_running {
            self.presentation.show();
        }
        match &self.summary.reason {
            ExitReason::Failed(err) => tracing::error!("Clicking aborted: {}", err),
            reason => tracing::info!(
                "Clicking finished ({:?}) after {} cycles, {} clicks",
                reason,
                self.summary.cycles,
                self.summary.clicks
            ),
        }
        let _ = self.events.send(PlaybackEvent::Finished(self.summary.clone()));
        let _ = self.done.send(());
        self.presentation.refresh();
    }
}

impl<P: Pointer> Worker<P> {
    fn run(mut self, done: mpsc::Sender<()>) {
        let mut cleanup = Cleanup {
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
            presentation: Arc::clone(&self.presentation),
            done,
            summary: PlaybackSummary {
                cycles: 0,
                clicks: 0,
                reason: ExitReason::Failed("playback worker panicked".into()),
            },
        };
        cleanup.summary.reason = match self.play(&mut cleanup.summary) {
            Ok(reason) => reason,
            Err(e) => ExitReason::Failed(e.to_string()),
        };
    }

    fn play(&mut self, summary: &mut PlaybackSummary) -> Result<ExitReason, PointerError> {
        let mut rng = rand::thread_rng();
        let started = self.shared.session.lock().start_timestamp;

        loop {
            for (index, action) in self.actions.iter().enumerate() {
                let delay_ms = if self.jitter {
                    jittered_delay(action.delay_ms, &mut rng)
                } else {
                    action.delay_ms
                };

                // Holding the session lock keeps a concurrent stop() from
                // returning between the check and the click.
                {
                    let _session = self.shared.session.lock();
                    if self.shared.stop_requested() {
                        return Ok(ExitReason::Stopped);
                    }
                    self.pointer.click_at(action.x, action.y)?;
                }
                summary.clicks += 1;
                tracing::debug!("Clicked at ({}, {}) with {}ms delay", action.x, action.y, delay_ms);
                let _ = self.events.send(PlaybackEvent::Clicked {
                    index,
                    x: action.x,
                    y: action.y,
                    delay_ms,
                });
                self.sleep(Duration::from_millis(delay_ms));
            }

            if self.actions.is_empty() && !matches!(self.policy, RepeatPolicy::ByCount(_)) {
                self.sleep(EMPTY_PASS_IDLE);
            }
            if self.shared.stop_requested() {
                return Ok(ExitReason::Stopped);
            }

            let cycles = {
                let mut session = self.shared.session.lock();
                session.completed_cycles += 1;
                session.completed_cycles
            };
            summary.cycles = cycles;
            let _ = self.events.send(PlaybackEvent::CycleCompleted(cycles));
            self.presentation.refresh();

            if self.policy.exhausted(cycles, started) {
                return Ok(ExitReason::Exhausted);
            }
        }
    }

    /// Sleeps in slices so a stop request cuts the wait short.
    fn sleep(&self, total: Duration) {
        let slice = Duration::from_millis(SLEEP_SLICE_MS);
        let deadline = Instant::now() + total;
        loop {
            if self.shared.stop_requested() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep(slice.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pointer::RecordingPointer, presentation::NoPresentation};
    use rand::{rngs::StdRng, SeedableRng};

    fn engine(pointer: &RecordingPointer) -> (PlaybackEngine<RecordingPointer>, mpsc::Receiver<PlaybackEvent>) {
        PlaybackEngine::new(pointer.clone(), Arc::new(NoPresentation))
    }

    fn actions(delays: &[u64]) -> Arc<[ClickAction]> {
        delays
            .iter()
            .enumerate()
            .map(|(i, d)| ClickAction::new(i as i32 * 10, i as i32 * 20, *d))
            .collect()
    }

    fn wait_finished(rx: &mpsc::Receiver<PlaybackEvent>) -> PlaybackSummary {
        loop {
            match rx.recv_timeout(Duration::from_secs(10)).unwrap() {
                PlaybackEvent::Finished(summary) => return summary,
                _ => continue,
            }
        }
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let samples: Vec<u64> = (0..1000).map(|_| jittered_delay(50, &mut rng)).collect();
        assert!(samples.iter().all(|&d| d <= 150));
        assert!(samples.iter().any(|&d| d == 0), "negative results clamp to zero");
        assert!(samples.iter().any(|&d| d > 50));
    }

    #[test]
    fn test_jitter_recomputed_each_time() {
        let mut rng = StdRng::seed_from_u64(1);
        let samples: std::collections::HashSet<u64> =
            (0..50).map(|_| jittered_delay(1000, &mut rng)).collect();
        assert!(samples.len() > 1);
        assert!(samples.iter().all(|&d| (900..=1100).contains(&d)));
    }

    #[test]
    fn test_policy_from_inputs() {
        assert_eq!(
            RepeatPolicy::from_inputs(RepeatMode::Count, " 3 ", "junk"),
            Ok(RepeatPolicy::count(3).unwrap())
        );
        assert_eq!(
            RepeatPolicy::from_inputs(RepeatMode::Duration, "", "15"),
            Ok(RepeatPolicy::seconds(15).unwrap())
        );
        assert_eq!(RepeatPolicy::from_inputs(RepeatMode::Unbounded, "x", "y"), Ok(RepeatPolicy::Unbounded));
        assert!(matches!(
            RepeatPolicy::from_inputs(RepeatMode::Count, "0", ""),
            Err(ParseError::NotPositive { .. })
        ));
        assert!(matches!(
            RepeatPolicy::from_inputs(RepeatMode::Duration, "", "-4"),
            Err(ParseError::NotPositive { .. })
        ));
        assert!(matches!(
            RepeatPolicy::from_inputs(RepeatMode::Count, "ten", ""),
            Err(ParseError::InvalidInteger { .. })
        ));
        assert!(RepeatPolicy::from_inputs(RepeatMode::Count, "99999999999", "").is_err());
    }

    #[test]
    fn test_by_count_clicks_n_times() {
        let pointer = RecordingPointer::new();
        let (mut engine, rx) = engine(&pointer);
        let list = actions(&[1, 1, 1]);
        assert_eq!(engine.start(list, RepeatPolicy::count(4).unwrap(), false), StartOutcome::Started);
        let summary = wait_finished(&rx);
        assert_eq!(summary.reason, ExitReason::Exhausted);
        assert_eq!(summary.cycles, 4);
        assert_eq!(pointer.click_count(), 12);
        assert_eq!(&pointer.clicks()[..3], &[(0, 0), (10, 20), (20, 40)]);
        assert!(engine.shutdown(Duration::from_secs(1)));
        assert!(!engine.is_running());
    }

    #[test]
    fn test_empty_list_by_count_is_vacuous() {
        let pointer = RecordingPointer::new();
        let (mut engine, rx) = engine(&pointer);
        engine.start(actions(&[]), RepeatPolicy::count(5).unwrap(), false);
        let summary = wait_finished(&rx);
        assert_eq!(summary.cycles, 5);
        assert_eq!(summary.clicks, 0);
        assert_eq!(summary.reason, ExitReason::Exhausted);
    }

    #[test]
    fn test_redundant_start_is_noop() {
        let pointer = RecordingPointer::new();
        let (mut engine, rx) = engine(&pointer);
        // One long pass: no cycle can complete while the samples are taken.
        engine.start(actions(&[5_000]), RepeatPolicy::seconds(1).unwrap(), false);
        thread::sleep(Duration::from_millis(50));
        let before = engine.session();
        assert!(before.running);
        assert!(before.start_timestamp.is_some());
        assert_eq!(before.completed_cycles, 0);

        assert_eq!(
            engine.start(actions(&[1, 1]), RepeatPolicy::count(1).unwrap(), true),
            StartOutcome::AlreadyRunning
        );
        assert_eq!(engine.session(), before);

        engine.stop();
        assert_eq!(wait_finished(&rx).reason, ExitReason::Stopped);
        assert_eq!(pointer.click_count(), 1);
    }

    #[test]
    fn test_stop_halts_clicks() {
        let pointer = RecordingPointer::new();
        let (mut engine, rx) = engine(&pointer);
        engine.start(actions(&[30, 30]), RepeatPolicy::Unbounded, false);
        thread::sleep(Duration::from_millis(150));
        engine.stop();
        assert!(!engine.is_running());
        let clicks_at_stop = pointer.click_count();
        let summary = wait_finished(&rx);
        assert_eq!(summary.reason, ExitReason::Stopped);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(pointer.click_count(), clicks_at_stop);
        assert!(clicks_at_stop > 0);
    }

    #[test]
    fn test_stop_handle_from_other_thread() {
        let pointer = RecordingPointer::new();
        let (mut engine, rx) = engine(&pointer);
        let handle = engine.stop_handle();
        handle.stop();
        assert_eq!(engine.session(), PlaybackSession::default());

        engine.start(actions(&[30]), RepeatPolicy::Unbounded, false);
        thread::sleep(Duration::from_millis(80));
        thread::spawn(move || handle.stop()).join().unwrap();
        assert!(!engine.is_running());
        assert_eq!(wait_finished(&rx).reason, ExitReason::Stopped);
        let clicks = pointer.click_count();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(pointer.click_count(), clicks);
    }

    #[test]
    fn test_failure_returns_to_idle() {
        let pointer = RecordingPointer::failing_after(2);
        let (mut engine, rx) = engine(&pointer);
        engine.start(actions(&[1, 1, 1]), RepeatPolicy::count(3).unwrap(), false);
        let summary = wait_finished(&rx);
        assert!(matches!(summary.reason, ExitReason::Failed(_)));
        assert_eq!(summary.clicks, 2);
        assert!(!engine.is_running());
        assert_eq!(engine.session(), PlaybackSession::default());
    }

    #[test]
    fn test_restart_after_exhaustion() {
        let pointer = RecordingPointer::new();
        let (mut engine, rx) = engine(&pointer);
        engine.start(actions(&[1]), RepeatPolicy::count(1).unwrap(), false);
        wait_finished(&rx);
        assert!(engine.shutdown(Duration::from_secs(1)));
        assert_eq!(engine.start(actions(&[1]), RepeatPolicy::count(2).unwrap(), false), StartOutcome::Started);
        wait_finished(&rx);
        assert_eq!(pointer.click_count(), 3);
    }
}
