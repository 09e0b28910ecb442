//! Session lifecycle shared by `SenderCoordinator` and `ReceiverCoordinator`
//!
//! ```text
//! Idle → Initializing → Running ⇄ Paused
//!              │           │        │
//!              └───────→ Stopping ←─┘ → Stopped → Initializing (relaunch)
//! ```
//!
//! Pausing flips the session flag only. Encoders, decoders and the config
//! handshake survive it, so a resumed session sends data straight away (the
//! sender forces a keyframe first). Stopping cancels the loops and clears
//! the handshake; a relaunch announces every config again.

use std::fmt;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    /// Channels wired, loops being spawned
    Initializing,
    Running { started_at: Instant },
    /// Frames are dropped as `Inactive` on arrival
    Paused { paused_at: Instant },
    /// Cancellation sent, waiting for the loops to return
    Stopping,
    Stopped,
}

impl PipelineState {
    /// Whether a coordinator may move from this state to `target`.
    ///
    /// Re-entering the current phase is allowed, so repeated `pause` or
    /// `resume` calls are harmless.
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        match (self, target) {
            (Idle | Stopped, Initializing) => true,
            (Initializing | Paused { .. }, Running { .. }) => true,
            (Running { .. }, Paused { .. }) => true,
            (Initializing | Running { .. } | Paused { .. }, Stopping) => true,
            (Stopping, Stopped) => true,
            (Running { .. }, Running { .. }) | (Paused { .. }, Paused { .. }) => true,
            (a, b) => a == b,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, PipelineState::Running { .. })
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, PipelineState::Paused { .. })
    }

    /// Stop requested or done; nothing can be started any more
    pub fn is_stopped(&self) -> bool {
        matches!(self, PipelineState::Stopping | PipelineState::Stopped)
    }

    /// Time spent in the current running or paused phase
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            PipelineState::Running { started_at } => Some(started_at.elapsed()),
            PipelineState::Paused { paused_at } => Some(paused_at.elapsed()),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Idle => "idle",
            PipelineState::Initializing => "initializing",
            PipelineState::Running { .. } => "running",
            PipelineState::Paused { .. } => "paused",
            PipelineState::Stopping => "stopping",
            PipelineState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PipelineState::*;

    fn running() -> PipelineState {
        Running {
            started_at: Instant::now(),
        }
    }

    fn paused() -> PipelineState {
        Paused {
            paused_at: Instant::now(),
        }
    }

    #[test]
    fn test_launch_pause_stop_relaunch() {
        assert!(Idle.can_transition_to(&Initializing));
        assert!(Initializing.can_transition_to(&running()));
        assert!(running().can_transition_to(&paused()));
        assert!(paused().can_transition_to(&running()));
        assert!(paused().can_transition_to(&Stopping));
        assert!(Stopping.can_transition_to(&Stopped));
        assert!(Stopped.can_transition_to(&Initializing));
    }

    #[test]
    fn test_repeated_pause_and_resume() {
        assert!(paused().can_transition_to(&paused()));
        assert!(running().can_transition_to(&running()));
        assert!(Stopped.can_transition_to(&Stopped));
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!Idle.can_transition_to(&running()));
        assert!(!Idle.can_transition_to(&Stopping));
        assert!(!Stopped.can_transition_to(&running()));
        assert!(!Stopped.can_transition_to(&Stopping));
        assert!(!paused().can_transition_to(&Initializing));
        assert!(!Stopping.can_transition_to(&running()));
        assert!(!Initializing.can_transition_to(&paused()));
    }

    #[test]
    fn test_phase_queries() {
        assert!(running().elapsed().is_some());
        assert!(paused().elapsed().is_some());
        assert!(Initializing.elapsed().is_none());
        assert!(Stopping.is_stopped());
        assert!(!paused().is_stopped());
        assert_eq!(paused().to_string(), "paused");
    }
}
