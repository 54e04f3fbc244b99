//! Recovery timer and elapsed-time counter.
//!
//! Both are one-second loops running on their own tokio task. The recovery
//! timer is single-slot: starting it again replaces the running countdown.

use crate::config::TimerConfig;
use crate::cues::{self, CueKind, SharedCuePlayer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Observable state of the recovery timer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TimerState {
    #[default]
    Idle,
    Running {
        total: u32,
        remaining: u32,
    },
    Elapsed,
}

/// Natural expiry of the countdown started as `generation`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestElapsed {
    pub generation: u64,
}

/// Single-slot rest countdown with audible cues
pub struct RecoveryTimer {
    config: TimerConfig,
    cues: SharedCuePlayer,
    state_tx: Arc<watch::Sender<TimerState>>,
    elapsed_tx: mpsc::UnboundedSender<RestElapsed>,
    elapsed_rx: mpsc::UnboundedReceiver<RestElapsed>,
    generation: u64,
    armed: Option<u64>,
    active: Option<Arc<AtomicBool>>,
    task: Option<JoinHandle<()>>,
}

impl RecoveryTimer {
    pub fn new(config: TimerConfig, cues: SharedCuePlayer) -> Self {
        let (state_tx, _) = watch::channel(TimerState::Idle);
        let (elapsed_tx, elapsed_rx) = mpsc::unbounded_channel();
        Self {
            config,
            cues,
            state_tx: Arc::new(state_tx),
            elapsed_tx,
            elapsed_rx,
            generation: 0,
            armed: None,
            active: None,
            task: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TimerState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> TimerState {
        *self.state_tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.armed.is_some()
    }

    /// Number of countdowns started so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a countdown of `seconds`, replacing any running one
    ///
    /// Must be called from within a tokio runtime. Returns the generation
    /// that the matching [`RestElapsed`] will carry.
    pub fn start(&mut self, seconds: u32) -> u64 {
        self.cancel_task();
        self.generation += 1;
        let generation = self.generation;

        let active = Arc::new(AtomicBool::new(true));
        let state_tx = Arc::clone(&self.state_tx);
        let elapsed_tx = self.elapsed_tx.clone();
        let cues = Arc::clone(&self.cues);
        let countdown_from = self.config.countdown_cue_seconds;
        let tick = self.config.tick();
        let flag = Arc::clone(&active);

        state_tx.send_replace(TimerState::Running {
            total: seconds,
            remaining: seconds,
        });

        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + tick, tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut remaining = seconds;

            while remaining > 0 {
                interval.tick().await;
                if !flag.load(Ordering::SeqCst) {
                    return;
                }
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
                state_tx.send_replace(TimerState::Running {
                    total: seconds,
                    remaining,
                });
                if remaining <= countdown_from {
                    cues::fire(&cues, CueKind::CountdownBeep);
                }
            }

            if !flag.swap(false, Ordering::SeqCst) {
                return;
            }
            state_tx.send_replace(TimerState::Elapsed);
            cues::fire(&cues, CueKind::TimerComplete);
            let _ = elapsed_tx.send(RestElapsed { generation });
        });

        tracing::debug!("Recovery timer {} started: {}s", generation, seconds);
        self.active = Some(active);
        self.task = Some(task);
        self.armed = Some(generation);
        generation
    }

    /// Stop the running countdown immediately
    ///
    /// Returns whether a countdown was running. A stopped countdown never
    /// reports expiry.
    pub fn stop(&mut self) -> bool {
        let was_running = self.armed.take().is_some();
        self.cancel_task();
        self.state_tx.send_replace(TimerState::Idle);
        if was_running {
            tracing::debug!("Recovery timer {} stopped", self.generation);
        }
        was_running
    }

    /// Wait for the running countdown to expire
    ///
    /// Expiry signals of replaced or stopped countdowns are discarded. Pends
    /// forever when nothing is running. Cancel safe.
    pub async fn elapsed(&mut self) -> RestElapsed {
        loop {
            match self.elapsed_rx.recv().await {
                Some(signal) if self.armed == Some(signal.generation) => {
                    self.armed = None;
                    self.task = None;
                    self.active = None;
                    return signal;
                }
                Some(stale) => {
                    tracing::debug!("Ignoring stale expiry of timer {}", stale.generation);
                }
                None => std::future::pending::<()>().await,
            }
        }
    }

    fn cancel_task(&mut self) {
        if let Some(active) = self.active.take() {
            active.store(false, Ordering::SeqCst);
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for RecoveryTimer {
    fn drop(&mut self) {
        self.cancel_task();
    }
}

/// Wall-clock style counter of seconds since the session became active
pub struct ElapsedCounter {
    tick: std::time::Duration,
    seconds_tx: Arc<watch::Sender<u64>>,
    task: Option<JoinHandle<()>>,
}

impl ElapsedCounter {
    pub fn new(config: &TimerConfig) -> Self {
        let (seconds_tx, _) = watch::channel(0);
        Self {
            tick: config.tick(),
            seconds_tx: Arc::new(seconds_tx),
            task: None,
        }
    }

    /// Restart counting from zero. Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        self.stop();
        self.seconds_tx.send_replace(0);

        let seconds_tx = Arc::clone(&self.seconds_tx);
        let tick = self.tick;
        self.task = Some(tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + tick, tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                seconds_tx.send_modify(|s| *s += 1);
            }
        }));
    }

    /// Stop counting, keeping the last value
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn reset(&mut self) {
        self.stop();
        self.seconds_tx.send_replace(0);
    }

    pub fn seconds(&self) -> u64 {
        *self.seconds_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.seconds_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for ElapsedCounter {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cues::RecordingCuePlayer;
    use std::time::Duration;

    fn timer_with_recorder() -> (RecoveryTimer, Arc<RecordingCuePlayer>) {
        let recorder = Arc::new(RecordingCuePlayer::new());
        let timer = RecoveryTimer::new(TimerConfig::default(), recorder.clone());
        (timer, recorder)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_expires_with_cues() {
        let (mut timer, recorder) = timer_with_recorder();

        let generation = timer.start(5);
        assert_eq!(
            timer.state(),
            TimerState::Running {
                total: 5,
                remaining: 5
            }
        );

        let signal = timer.elapsed().await;
        settle().await;

        assert_eq!(signal.generation, generation);
        assert_eq!(timer.state(), TimerState::Elapsed);
        assert!(!timer.is_running());
        assert_eq!(recorder.count(CueKind::CountdownBeep), 3);
        assert_eq!(recorder.count(CueKind::TimerComplete), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_running_countdown() {
        let (mut timer, recorder) = timer_with_recorder();

        let first = timer.start(2);
        let second = timer.start(4);
        assert_ne!(first, second);

        let signal = timer.elapsed().await;
        settle().await;
        assert_eq!(signal.generation, second);
        assert_eq!(recorder.count(CueKind::TimerComplete), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_prevents_expiry() {
        let (mut timer, recorder) = timer_with_recorder();

        timer.start(3);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(timer.stop());
        assert_eq!(timer.state(), TimerState::Idle);

        let waited = tokio::time::timeout(Duration::from_secs(10), timer.elapsed()).await;
        assert!(waited.is_err());
        settle().await;
        assert_eq!(recorder.count(CueKind::TimerComplete), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_ticks_down() {
        let (mut timer, _recorder) = timer_with_recorder();
        let mut state = timer.subscribe();

        timer.start(10);
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(
            *state.borrow_and_update(),
            TimerState::Running {
                total: 10,
                remaining: 8
            }
        );
        timer.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_counter_counts_seconds() {
        let mut counter = ElapsedCounter::new(&TimerConfig::default());
        counter.start();
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(counter.seconds(), 3);

        counter.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.seconds(), 3);

        counter.reset();
        assert_eq!(counter.seconds(), 0);
    }
}
