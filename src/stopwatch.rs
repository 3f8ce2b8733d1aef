//! Workout stopwatch with a manual repetition counter.
//!
//! A stopwatch is either idle or running. While running, a worker thread
//! recomputes the elapsed time every tick and publishes it to subscribers.
//! Stopping the clock counts as one finished repetition.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Default refresh interval while running
pub const DEFAULT_TICK: Duration = Duration::from_millis(10);

/// Source of monotonic time
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The process clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopwatchState {
    #[default]
    Idle,
    Running,
}

impl StopwatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
        }
    }
}

/// Snapshot pushed to subscribers on every refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub elapsed: Duration,
    pub repetitions: u32,
}

impl Tick {
    pub fn display(&self) -> String {
        format_elapsed(self.elapsed)
    }
}

/// Format as `MM:SS.ss`.
///
/// Hundredths are truncated, where a `{:05.2}` float format would round:
/// 1.006 s shows `00:01.00`, not `00:01.01`. Truncation keeps the seconds
/// field from ever reading `60.00`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let centis = elapsed.as_millis() / 10;
    let minutes = centis / 6000;
    let rest = centis % 6000;
    format!("{:02}:{:02}.{:02}", minutes, rest / 100, rest % 100)
}

#[derive(Debug, Default)]
struct Inner {
    state: StopwatchState,
    started_at: Option<Instant>,
    /// Last computed elapsed time, shown while idle
    frozen: Duration,
    repetitions: u32,
    subscribers: Vec<Sender<Tick>>,
}

impl Inner {
    fn elapsed(&self, now: Instant) -> Duration {
        match (self.state, self.started_at) {
            (StopwatchState::Running, Some(start)) => now.saturating_duration_since(start),
            _ => self.frozen,
        }
    }

    fn snapshot(&self, now: Instant) -> Tick {
        Tick {
            elapsed: self.elapsed(now),
            repetitions: self.repetitions,
        }
    }

    fn publish(&mut self, tick: Tick) {
        self.subscribers.retain(|tx| tx.send(tick).is_ok());
    }
}

fn lock(shared: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    // A panicking subscriber must not wedge the stopwatch
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Refresh worker for one run of the stopwatch
struct Ticker {
    cancel_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    fn spawn(shared: Arc<Mutex<Inner>>, clock: Arc<dyn Clock>, interval: Duration) -> Self {
        let (cancel_tx, cancel_rx) = mpsc::channel();
        let handle = thread::spawn(move || Self::tick_loop(shared, clock, interval, cancel_rx));
        Self {
            cancel_tx,
            handle: Some(handle),
        }
    }

    /// Sleep one interval at a time; any message or a dropped sender ends the loop.
    fn tick_loop(
        shared: Arc<Mutex<Inner>>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        cancel_rx: Receiver<()>,
    ) {
        loop {
            match cancel_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    let mut inner = lock(&shared);
                    if inner.state != StopwatchState::Running {
                        break;
                    }
                    let tick = inner.snapshot(clock.now());
                    inner.publish(tick);
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// Signal the worker and wait for it to exit
    fn cancel(mut self) {
        let _ = self.cancel_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Stopwatch and repetition counter owned by one stopwatch screen
pub struct Stopwatch {
    shared: Arc<Mutex<Inner>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    ticker: Option<Ticker>,
}

impl Stopwatch {
    pub fn new(interval: Duration) -> Self {
        Self::with_clock(Arc::new(SystemClock), interval)
    }

    pub fn with_clock(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Inner::default())),
            clock,
            interval,
            ticker: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> StopwatchState {
        lock(&self.shared).state
    }

    pub fn is_running(&self) -> bool {
        self.state() == StopwatchState::Running
    }

    /// Start from zero. Calling this while running restarts the clock.
    pub fn start(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }

        let now = self.clock.now();
        {
            let mut inner = lock(&self.shared);
            inner.state = StopwatchState::Running;
            inner.started_at = Some(now);
            inner.frozen = Duration::ZERO;
            let tick = inner.snapshot(now);
            inner.publish(tick);
        }

        self.ticker = Some(Ticker::spawn(
            Arc::clone(&self.shared),
            Arc::clone(&self.clock),
            self.interval,
        ));
    }

    /// Stop the clock and count one repetition.
    ///
    /// Returns false, changing nothing, when already idle.
    pub fn stop(&mut self) -> bool {
        {
            let mut inner = lock(&self.shared);
            if inner.state != StopwatchState::Running {
                return false;
            }
            let now = self.clock.now();
            inner.frozen = inner.elapsed(now);
            inner.state = StopwatchState::Idle;
            inner.started_at = None;
            inner.repetitions = inner.repetitions.saturating_add(1);
            let tick = inner.snapshot(now);
            inner.publish(tick);
        }

        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
        true
    }

    /// Time since start while running; the value at the last stop while idle.
    pub fn elapsed(&self) -> Duration {
        lock(&self.shared).elapsed(self.clock.now())
    }

    pub fn display(&self) -> String {
        format_elapsed(self.elapsed())
    }

    pub fn repetitions(&self) -> u32 {
        lock(&self.shared).repetitions
    }

    pub fn increment_repetition(&self) -> u32 {
        self.adjust_repetitions(|n| n.saturating_add(1))
    }

    /// No-op at zero
    pub fn decrement_repetition(&self) -> u32 {
        self.adjust_repetitions(|n| n.saturating_sub(1))
    }

    fn adjust_repetitions(&self, f: impl FnOnce(u32) -> u32) -> u32 {
        let mut inner = lock(&self.shared);
        inner.repetitions = f(inner.repetitions);
        let tick = inner.snapshot(self.clock.now());
        inner.publish(tick);
        inner.repetitions
    }

    /// Receive a [`Tick`] on every refresh, start, stop and counter change.
    pub fn subscribe(&self) -> Receiver<Tick> {
        let (tx, rx) = mpsc::channel();
        lock(&self.shared).subscribers.push(tx);
        rx
    }

    pub fn snapshot(&self) -> Tick {
        lock(&self.shared).snapshot(self.clock.now())
    }
}

impl Drop for Stopwatch {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
        }
    }
}

impl std::fmt::Debug for Stopwatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tick = self.snapshot();
        f.debug_struct("Stopwatch")
            .field("state", &self.state())
            .field("elapsed", &tick.elapsed)
            .field("repetitions", &tick.repetitions)
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Clock that only moves when told to
    struct ManualClock {
        base: Instant,
        offset: Mutex<Duration>,
    }

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                base: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            })
        }

        fn advance(&self, by: Duration) {
            *self.offset.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock().unwrap()
        }
    }

    fn manual_stopwatch() -> (Arc<ManualClock>, Stopwatch) {
        let clock = ManualClock::new();
        let sw = Stopwatch::with_clock(clock.clone(), Duration::from_millis(50));
        (clock, sw)
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00.00");
        assert_eq!(format_elapsed(Duration::from_millis(65_420)), "01:05.42");
        assert_eq!(format_elapsed(Duration::from_millis(187_420)), "03:07.42");
        assert_eq!(format_elapsed(Duration::from_millis(59_999)), "00:59.99");
        assert_eq!(format_elapsed(Duration::from_secs(6000)), "100:00.00");
    }

    #[test]
    fn test_format_elapsed_truncates_hundredths() {
        assert_eq!(format_elapsed(Duration::from_millis(1_006)), "00:01.00");
        assert_eq!(format_elapsed(Duration::from_millis(59_995)), "00:59.99");
        assert_eq!(format_elapsed(Duration::from_millis(119_999)), "01:59.99");
    }

    #[test]
    fn test_simulated_elapsed_display() {
        let (clock, mut sw) = manual_stopwatch();
        sw.start();
        clock.advance(Duration::from_millis(65_420));
        assert_eq!(sw.display(), "01:05.42");
    }

    #[test]
    fn test_initial_state() {
        let (_clock, sw) = manual_stopwatch();
        assert_eq!(sw.state(), StopwatchState::Idle);
        assert_eq!(sw.elapsed(), Duration::ZERO);
        assert_eq!(sw.repetitions(), 0);
    }

    #[test]
    fn test_stop_freezes_elapsed_and_counts_repetition() {
        let (clock, mut sw) = manual_stopwatch();
        sw.start();
        clock.advance(Duration::from_secs(3));
        assert!(sw.stop());

        assert_eq!(sw.state(), StopwatchState::Idle);
        assert_eq!(sw.repetitions(), 1);
        clock.advance(Duration::from_secs(5));
        assert_eq!(sw.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let (_clock, mut sw) = manual_stopwatch();
        assert!(!sw.stop());
        assert_eq!(sw.repetitions(), 0);

        sw.start();
        assert!(sw.stop());
        assert!(!sw.stop());
        assert_eq!(sw.repetitions(), 1);
    }

    #[test]
    fn test_start_while_running_restarts() {
        let (clock, mut sw) = manual_stopwatch();
        sw.start();
        clock.advance(Duration::from_secs(10));
        sw.start();
        clock.advance(Duration::from_secs(2));

        assert!(sw.is_running());
        assert_eq!(sw.display(), "00:02.00");
        assert_eq!(sw.repetitions(), 0);
    }

    #[test]
    fn test_start_after_stop_resets_elapsed() {
        let (clock, mut sw) = manual_stopwatch();
        sw.start();
        clock.advance(Duration::from_secs(7));
        sw.stop();
        sw.start();
        assert_eq!(sw.elapsed(), Duration::ZERO);
        assert_eq!(sw.repetitions(), 1);
    }

    #[test]
    fn test_repetitions_never_negative() {
        let (_clock, mut sw) = manual_stopwatch();
        assert_eq!(sw.decrement_repetition(), 0);
        assert_eq!(sw.increment_repetition(), 1);
        assert_eq!(sw.decrement_repetition(), 0);
        assert_eq!(sw.decrement_repetition(), 0);

        // Independent of run state
        sw.start();
        assert_eq!(sw.increment_repetition(), 1);
        assert_eq!(sw.increment_repetition(), 2);
        sw.stop();
        assert_eq!(sw.repetitions(), 3);
        for _ in 0..5 {
            sw.decrement_repetition();
        }
        assert_eq!(sw.repetitions(), 0);
    }

    #[test]
    fn test_subscribers_see_start_and_stop() {
        let (clock, mut sw) = manual_stopwatch();
        let rx = sw.subscribe();

        sw.start();
        clock.advance(Duration::from_secs(4));
        sw.stop();

        let ticks: Vec<Tick> = rx.try_iter().collect();
        let first = ticks.first().unwrap();
        let last = ticks.last().unwrap();
        assert_eq!(first.elapsed, Duration::ZERO);
        assert_eq!(last.elapsed, Duration::from_secs(4));
        assert_eq!(last.repetitions, 1);
    }

    #[test]
    fn test_ticks_flow_while_running_and_halt_on_stop() {
        let mut sw = Stopwatch::new(Duration::from_millis(5));
        let rx = sw.subscribe();
        sw.start();

        // Start tick plus at least one refresh tick
        rx.recv_timeout(Duration::from_secs(1)).unwrap();
        rx.recv_timeout(Duration::from_secs(1)).unwrap();

        assert!(sw.stop());
        let drained: Vec<Tick> = rx.try_iter().collect();
        assert_eq!(drained.last().unwrap().repetitions, 1);

        thread::sleep(Duration::from_millis(40));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_drop_cancels_worker() {
        let mut sw = Stopwatch::new(Duration::from_millis(5));
        let rx = sw.subscribe();
        sw.start();
        drop(sw);

        // Worker has been joined, so every sender is gone once drained
        let deadline = Instant::now() + Duration::from_secs(1);
        loop {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(_) => assert!(Instant::now() < deadline),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => panic!("worker still holds subscribers"),
            }
        }
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let (_clock, sw) = manual_stopwatch();
        let rx = sw.subscribe();
        let keep = sw.subscribe();
        drop(rx);

        sw.increment_repetition();
        assert_eq!(lock(&sw.shared).subscribers.len(), 1);
        assert_eq!(keep.try_recv().unwrap().repetitions, 1);
    }
}
