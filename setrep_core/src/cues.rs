//! Audio cues.
//!
//! Playback is a collaborator concern. Session logic only fires cues and never
//! waits for them; a failing player is logged and otherwise ignored.

use crate::Result;
use std::sync::Arc;

/// Kinds of audible cues the session emits
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CueKind {
    /// Short beep in the last seconds of a rest period
    CountdownBeep,
    /// Rest timer reached zero
    TimerComplete,
    /// A set was confirmed
    SeriesComplete,
    /// Rest is over and the workout moved on
    RestComplete,
}

/// Something that can play a cue
pub trait CuePlayer: Send + Sync {
    fn play(&self, kind: CueKind) -> Result<()>;
}

/// Default player: records cues in the log only
#[derive(Clone, Debug, Default)]
pub struct TracingCuePlayer;

impl CuePlayer for TracingCuePlayer {
    fn play(&self, kind: CueKind) -> Result<()> {
        tracing::debug!("cue: {:?}", kind);
        Ok(())
    }
}

/// Shared handle to a cue player
pub type SharedCuePlayer = Arc<dyn CuePlayer>;

/// Play a cue on a background task without awaiting it
///
/// Must be called from within a tokio runtime.
pub fn fire(player: &SharedCuePlayer, kind: CueKind) {
    let player = Arc::clone(player);
    tokio::spawn(async move {
        if let Err(e) = player.play(kind) {
            tracing::warn!("Failed to play {:?} cue: {}", kind, e);
        }
    });
}

/// Player that remembers every cue it was asked to play
#[derive(Debug, Default)]
pub struct RecordingCuePlayer {
    played: std::sync::Mutex<Vec<CueKind>>,
}

impl RecordingCuePlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cues played so far, in order
    pub fn played(&self) -> Vec<CueKind> {
        self.played
            .lock()
            .map(|played| played.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: CueKind) -> usize {
        self.played().iter().filter(|k| **k == kind).count()
    }
}

impl CuePlayer for RecordingCuePlayer {
    fn play(&self, kind: CueKind) -> Result<()> {
        let mut played = self
            .played
            .lock()
            .map_err(|_| crate::Error::Other("cue recorder poisoned".into()))?;
        played.push(kind);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingPlayer;

    impl CuePlayer for FailingPlayer {
        fn play(&self, _kind: CueKind) -> Result<()> {
            Err(crate::Error::Other("no audio device".into()))
        }
    }

    #[tokio::test]
    async fn test_fire_reaches_player() {
        let recorder = Arc::new(RecordingCuePlayer::new());
        let player: SharedCuePlayer = recorder.clone();

        fire(&player, CueKind::SeriesComplete);
        fire(&player, CueKind::RestComplete);
        for _ in 0..100 {
            if recorder.played().len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }

        let mut played = recorder.played();
        played.sort_by_key(|k| *k as u8);
        assert_eq!(played, vec![CueKind::SeriesComplete, CueKind::RestComplete]);
    }

    #[tokio::test]
    async fn test_failing_player_does_not_propagate() {
        crate::logging::init_test();
        let player: SharedCuePlayer = Arc::new(FailingPlayer);
        fire(&player, CueKind::TimerComplete);
        tokio::task::yield_now().await;
    }
}
