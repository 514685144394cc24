//! Delayed restore.
//!
//! [`ReopenTimer`] is the countdown itself, driven by whatever elapsed time it
//! is fed. [`ReopenTimerService`] feeds it from a worker thread and performs
//! the restore when it fires.

use crate::constants::TIMER_TICK_INTERVAL;
use crate::error::AppError;
use crate::models::SessionSnapshot;
use crate::session::{RestoreReport, SessionService};
use log::{debug, error, info};
use serde::Serialize;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    Idle,
    Running { remaining: Duration },
    Firing,
}

/// Transitions reported by [`ReopenTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Started { delay: Duration },
    Superseded { remaining: Duration },
    Cancelled { remaining: Duration },
}

#[derive(Debug)]
pub struct ReopenTimer {
    phase: TimerPhase,
    snapshot: Option<SessionSnapshot>,
}

impl Default for ReopenTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl ReopenTimer {
    pub fn new() -> Self {
        Self {
            phase: TimerPhase::Idle,
            snapshot: None,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, TimerPhase::Running { .. })
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self.phase {
            TimerPhase::Running { remaining } => Some(remaining),
            TimerPhase::Idle | TimerPhase::Firing => None,
        }
    }

    /// Arm the timer for `snapshot`. A timer that is already counting down is
    /// replaced and never fires.
    pub fn start(&mut self, snapshot: SessionSnapshot, delay: Duration) -> Vec<TimerEvent> {
        let mut events = Vec::with_capacity(2);
        if let TimerPhase::Running { remaining } = self.phase {
            events.push(TimerEvent::Superseded { remaining });
        }
        self.phase = TimerPhase::Running { remaining: delay };
        self.snapshot = Some(snapshot);
        events.push(TimerEvent::Started { delay });
        events
    }

    /// Stop a countdown. Does nothing once the timer is firing or idle.
    pub fn cancel(&mut self) -> Option<TimerEvent> {
        let TimerPhase::Running { remaining } = self.phase else {
            return None;
        };
        self.phase = TimerPhase::Idle;
        self.snapshot = None;
        Some(TimerEvent::Cancelled { remaining })
    }

    /// Count `elapsed` off the countdown. Returns the snapshot exactly once,
    /// when the countdown reaches zero.
    pub fn advance(&mut self, elapsed: Duration) -> Option<SessionSnapshot> {
        let TimerPhase::Running { remaining } = self.phase else {
            return None;
        };
        let remaining = remaining.saturating_sub(elapsed);
        if !remaining.is_zero() {
            self.phase = TimerPhase::Running { remaining };
            return None;
        }
        self.phase = TimerPhase::Firing;
        self.snapshot.take()
    }

    /// The restore handed out by [`advance`](Self::advance) has completed.
    pub fn finish_firing(&mut self) {
        if self.phase == TimerPhase::Firing {
            self.phase = TimerPhase::Idle;
        }
    }
}

/// Whole seconds left, rounded up so a countdown never shows zero early.
pub fn remaining_secs(remaining: Duration) -> u64 {
    let secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}

/// Performs the restore once a timer fires.
pub trait SnapshotRestorer: Send + Sync {
    fn restore_snapshot(&self, snapshot: &SessionSnapshot) -> Result<RestoreReport, AppError>;
}

impl SnapshotRestorer for SessionService {
    /// Waits for a save or restore already in flight instead of dropping the
    /// timer's restore.
    fn restore_snapshot(&self, snapshot: &SessionSnapshot) -> Result<RestoreReport, AppError> {
        Ok(self.restore_queued(snapshot))
    }
}

/// Published to the listener of a [`ReopenTimerService`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TimerNotice {
    Started { delay_secs: u64 },
    Tick { remaining_secs: u64 },
    Superseded,
    Cancelled,
    Fired { report: RestoreReport },
    Failed { reason: String },
}

pub type TimerListener = Arc<dyn Fn(&TimerNotice) + Send + Sync>;

struct TimerState {
    machine: ReopenTimer,
    /// Bumped by every start and cancel; a worker only acts while it still
    /// holds the current generation.
    generation: u64,
}

struct Shared {
    state: Mutex<TimerState>,
    wake: Condvar,
    listener: Mutex<Option<TimerListener>>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn publish(&self, notice: &TimerNotice) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        if let Some(listener) = listener {
            listener(notice);
        }
    }
}

fn notice_for(event: TimerEvent) -> TimerNotice {
    match event {
        TimerEvent::Started { delay } => TimerNotice::Started {
            delay_secs: remaining_secs(delay),
        },
        TimerEvent::Superseded { .. } => TimerNotice::Superseded,
        TimerEvent::Cancelled { .. } => TimerNotice::Cancelled,
    }
}

pub struct ReopenTimerService {
    shared: Arc<Shared>,
    restorer: Arc<dyn SnapshotRestorer>,
    tick_interval: Duration,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ReopenTimerService {
    pub fn new(restorer: Arc<dyn SnapshotRestorer>) -> Self {
        Self::with_tick_interval(restorer, TIMER_TICK_INTERVAL)
    }

    pub fn with_tick_interval(restorer: Arc<dyn SnapshotRestorer>, tick_interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(TimerState {
                    machine: ReopenTimer::new(),
                    generation: 0,
                }),
                wake: Condvar::new(),
                listener: Mutex::new(None),
            }),
            restorer,
            tick_interval,
            worker: Mutex::new(None),
        }
    }

    pub fn set_listener(&self, listener: TimerListener) {
        *self
            .shared
            .listener
            .lock()
            .unwrap_or_else(|p| p.into_inner()) = Some(listener);
    }

    pub fn phase(&self) -> TimerPhase {
        self.shared.lock_state().machine.phase()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock_state().machine.is_running()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.shared.lock_state().machine.remaining()
    }

    /// Restore `snapshot` after `delay`, replacing any pending countdown.
    pub fn start(&self, snapshot: SessionSnapshot, delay: Duration) {
        let (events, generation) = {
            let mut state = self.shared.lock_state();
            let events = state.machine.start(snapshot, delay);
            state.generation = state.generation.wrapping_add(1);
            (events, state.generation)
        };
        self.shared.wake.notify_all();
        info!("Restore scheduled in {}s", remaining_secs(delay));
        for event in events {
            self.shared.publish(&notice_for(event));
        }

        let shared = Arc::clone(&self.shared);
        let restorer = Arc::clone(&self.restorer);
        let tick_interval = self.tick_interval;
        let handle = thread::spawn(move || run_worker(&shared, restorer.as_ref(), tick_interval, generation));
        *self.worker.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
    }

    /// Cancel a pending countdown. Returns `false` when there was nothing to
    /// cancel, including once the restore has begun.
    pub fn cancel(&self) -> bool {
        let event = {
            let mut state = self.shared.lock_state();
            let event = state.machine.cancel();
            if event.is_some() {
                state.generation = state.generation.wrapping_add(1);
            }
            event
        };
        let Some(event) = event else {
            return false;
        };
        self.shared.wake.notify_all();
        info!("Scheduled restore cancelled");
        self.shared.publish(&notice_for(event));
        true
    }

    /// Block until the most recently started worker has exited.
    pub fn wait(&self) {
        let handle = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Timer worker panicked");
            }
        }
    }
}

impl Drop for ReopenTimerService {
    fn drop(&mut self) {
        let mut state = self.shared.lock_state();
        if state.machine.cancel().is_some() {
            debug!("Dropping pending restore on shutdown");
        }
        state.generation = state.generation.wrapping_add(1);
        drop(state);
        self.shared.wake.notify_all();
    }
}

fn run_worker(shared: &Shared, restorer: &dyn SnapshotRestorer, tick_interval: Duration, generation: u64) {
    let mut last = Instant::now();
    let mut state = shared.lock_state();

    let snapshot = loop {
        if state.generation != generation {
            debug!("Timer worker {generation} superseded");
            return;
        }
        let Some(remaining) = state.machine.remaining() else {
            return;
        };
        if !remaining.is_zero() {
            let wait = remaining.min(tick_interval);
            state = shared
                .wake
                .wait_timeout(state, wait)
                .map_or_else(|p| p.into_inner().0, |(guard, _)| guard);
            if state.generation != generation {
                debug!("Timer worker {generation} superseded");
                return;
            }
        }

        let now = Instant::now();
        let fired = state.machine.advance(now.duration_since(last));
        last = now;
        match fired {
            Some(snapshot) => break snapshot,
            None => {
                let remaining = state.machine.remaining().map_or(0, remaining_secs);
                drop(state);
                shared.publish(&TimerNotice::Tick {
                    remaining_secs: remaining,
                });
                state = shared.lock_state();
            }
        }
    };
    drop(state);

    info!("Restore timer fired for {} apps", snapshot.len());
    let notice = match restorer.restore_snapshot(&snapshot) {
        Ok(report) => TimerNotice::Fired { report },
        Err(e) => {
            error!("Scheduled restore failed: {e}");
            TimerNotice::Failed { reason: e.to_string() }
        }
    };
    shared.lock_state().machine.finish_firing();
    shared.publish(&notice);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AppOutcome;
    use crate::test_utils::sample_app;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn snapshot(ids: &[&str]) -> SessionSnapshot {
        SessionSnapshot::new(ids.iter().map(|id| sample_app(id)).collect())
    }

    #[test]
    fn test_start_then_cancel_never_fires() {
        let mut timer = ReopenTimer::new();
        timer.start(snapshot(&["com.example.a"]), Duration::from_secs(10));
        timer.advance(Duration::from_secs(4));

        let event = timer.cancel();
        assert_eq!(
            event,
            Some(TimerEvent::Cancelled {
                remaining: Duration::from_secs(6)
            })
        );
        assert_eq!(timer.phase(), TimerPhase::Idle);
        assert!(timer.advance(Duration::from_secs(60)).is_none());
    }

    #[test]
    fn test_expiry_fires_once() {
        let mut timer = ReopenTimer::new();
        let saved = snapshot(&["com.example.a", "com.example.b"]);
        timer.start(saved.clone(), Duration::from_secs(10));

        assert!(timer.advance(Duration::from_secs(9)).is_none());
        assert_eq!(timer.remaining(), Some(Duration::from_secs(1)));
        let fired = timer.advance(Duration::from_secs(1));
        assert_eq!(fired, Some(saved));
        assert_eq!(timer.phase(), TimerPhase::Firing);
        assert!(timer.advance(Duration::from_secs(1)).is_none());

        timer.finish_firing();
        assert_eq!(timer.phase(), TimerPhase::Idle);
    }

    #[test]
    fn test_second_start_supersedes_first() {
        let mut timer = ReopenTimer::new();
        let first = snapshot(&["com.example.first"]);
        let second = snapshot(&["com.example.second"]);

        timer.start(first, Duration::from_secs(10));
        timer.advance(Duration::from_secs(3));
        let events = timer.start(second.clone(), Duration::from_secs(5));
        assert_eq!(
            events,
            vec![
                TimerEvent::Superseded {
                    remaining: Duration::from_secs(7)
                },
                TimerEvent::Started {
                    delay: Duration::from_secs(5)
                },
            ]
        );

        let fired = timer.advance(Duration::from_secs(10));
        assert_eq!(fired, Some(second));
        assert!(timer.advance(Duration::from_secs(10)).is_none());
    }

    #[test]
    fn test_cancel_while_firing_is_noop() {
        let mut timer = ReopenTimer::new();
        timer.start(snapshot(&["com.example.a"]), Duration::from_secs(1));
        assert!(timer.advance(Duration::from_secs(2)).is_some());

        assert_eq!(timer.cancel(), None);
        assert_eq!(timer.phase(), TimerPhase::Firing);
    }

    #[test]
    fn test_cancel_when_idle_is_noop() {
        let mut timer = ReopenTimer::new();
        assert_eq!(timer.cancel(), None);
        timer.finish_firing();
        assert_eq!(timer.phase(), TimerPhase::Idle);
    }

    #[test]
    fn test_remaining_secs_rounds_up() {
        assert_eq!(remaining_secs(Duration::from_millis(1500)), 2);
        assert_eq!(remaining_secs(Duration::from_secs(3)), 3);
        assert_eq!(remaining_secs(Duration::ZERO), 0);
    }

    /// Counts restores and remembers which snapshots were restored.
    #[derive(Default)]
    struct CountingRestorer {
        restored: Mutex<Vec<SessionSnapshot>>,
        calls: AtomicUsize,
    }

    impl SnapshotRestorer for CountingRestorer {
        fn restore_snapshot(&self, snapshot: &SessionSnapshot) -> Result<RestoreReport, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.restored.lock().unwrap().push(snapshot.clone());
            Ok(RestoreReport {
                outcomes: Vec::<AppOutcome>::new(),
                persistence_warning: None,
            })
        }
    }

    fn service(restorer: &Arc<CountingRestorer>) -> ReopenTimerService {
        ReopenTimerService::with_tick_interval(
            Arc::clone(restorer) as Arc<dyn SnapshotRestorer>,
            Duration::from_millis(10),
        )
    }

    #[test]
    fn test_service_fires_once_after_delay() {
        let restorer = Arc::new(CountingRestorer::default());
        let timer = service(&restorer);
        let notices = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&notices);
        timer.set_listener(Arc::new(move |notice: &TimerNotice| {
            sink.lock().unwrap().push(notice.clone());
        }));

        let saved = snapshot(&["com.example.a"]);
        timer.start(saved.clone(), Duration::from_millis(50));
        assert!(timer.is_running());
        timer.wait();

        assert_eq!(restorer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(restorer.restored.lock().unwrap().first(), Some(&saved));
        assert_eq!(timer.phase(), TimerPhase::Idle);

        let notices = notices.lock().unwrap();
        assert!(matches!(notices.first(), Some(TimerNotice::Started { .. })));
        assert!(matches!(notices.last(), Some(TimerNotice::Fired { .. })));
        assert!(notices.iter().any(|n| matches!(n, TimerNotice::Tick { .. })));
    }

    #[test]
    fn test_service_cancel_prevents_restore() {
        let restorer = Arc::new(CountingRestorer::default());
        let timer = service(&restorer);

        timer.start(snapshot(&["com.example.a"]), Duration::from_millis(200));
        thread::sleep(Duration::from_millis(20));
        assert!(timer.cancel());
        timer.wait();
        thread::sleep(Duration::from_millis(250));

        assert_eq!(restorer.calls.load(Ordering::SeqCst), 0);
        assert!(!timer.cancel());
        assert_eq!(timer.phase(), TimerPhase::Idle);
    }

    #[test]
    fn test_service_restart_fires_only_latest() {
        let restorer = Arc::new(CountingRestorer::default());
        let timer = service(&restorer);
        let first = snapshot(&["com.example.first"]);
        let second = snapshot(&["com.example.second"]);

        timer.start(first, Duration::from_millis(100));
        thread::sleep(Duration::from_millis(20));
        timer.start(second.clone(), Duration::from_millis(60));
        timer.wait();
        thread::sleep(Duration::from_millis(150));

        assert_eq!(restorer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(restorer.restored.lock().unwrap().first(), Some(&second));
    }
}
