use std::fmt;

/// Capture sub-state tracked while the engine is streaming.
///
/// Device switches toggle this without leaving [`EngineState::Streaming`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureSubState {
    Active,
    Stopped,
}

/// Engine lifecycle state machine.
///
/// State transitions:
/// ```text
/// idle → output-ready → streaming{active ↔ stopped}
///   ↓         ↓                 ↓
///   └─────────┴──→ closed ←─────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    Idle,
    OutputReady,
    Streaming { capture: CaptureSubState },
    Closed,
}

/// Inputs to the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineEvent {
    OutputInitialized,
    CaptureStarted,
    CaptureStopped,
    Close,
}

impl EngineState {
    /// Apply `event`, returning the next state or `None` when the event is
    /// not valid from this state.
    pub fn transition(self, event: EngineEvent) -> Option<EngineState> {
        use CaptureSubState::*;
        use EngineEvent::*;
        use EngineState::*;

        match (self, event) {
            (Closed, Close) => Some(Closed),
            (Closed, _) => None,
            (_, Close) => Some(Closed),

            (Idle, OutputInitialized) => Some(OutputReady),
            (OutputReady | Streaming { .. }, OutputInitialized) => Some(self),

            (Idle, CaptureStarted) => None,
            (OutputReady | Streaming { .. }, CaptureStarted) => {
                Some(Streaming { capture: Active })
            }

            (Streaming { .. }, CaptureStopped) => Some(Streaming { capture: Stopped }),
            (Idle | OutputReady, CaptureStopped) => Some(self),
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn is_output_ready(&self) -> bool {
        matches!(self, Self::OutputReady | Self::Streaming { .. })
    }

    pub fn is_capturing(&self) -> bool {
        matches!(
            self,
            Self::Streaming {
                capture: CaptureSubState::Active
            }
        )
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::OutputReady => f.write_str("output-ready"),
            Self::Streaming {
                capture: CaptureSubState::Active,
            } => f.write_str("streaming (capture active)"),
            Self::Streaming {
                capture: CaptureSubState::Stopped,
            } => f.write_str("streaming (capture stopped)"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTIVE: EngineState = EngineState::Streaming {
        capture: CaptureSubState::Active,
    };
    const STOPPED: EngineState = EngineState::Streaming {
        capture: CaptureSubState::Stopped,
    };

    #[test]
    fn happy_path() {
        let s = EngineState::Idle;
        let s = s.transition(EngineEvent::OutputInitialized).unwrap();
        assert_eq!(s, EngineState::OutputReady);
        let s = s.transition(EngineEvent::CaptureStarted).unwrap();
        assert_eq!(s, ACTIVE);
        let s = s.transition(EngineEvent::CaptureStopped).unwrap();
        assert_eq!(s, STOPPED);
        let s = s.transition(EngineEvent::CaptureStarted).unwrap();
        assert_eq!(s, ACTIVE);
        assert_eq!(s.transition(EngineEvent::Close), Some(EngineState::Closed));
    }

    #[test]
    fn capture_requires_output() {
        assert_eq!(EngineState::Idle.transition(EngineEvent::CaptureStarted), None);
    }

    #[test]
    fn output_init_is_idempotent() {
        assert_eq!(
            ACTIVE.transition(EngineEvent::OutputInitialized),
            Some(ACTIVE)
        );
        assert_eq!(
            EngineState::OutputReady.transition(EngineEvent::OutputInitialized),
            Some(EngineState::OutputReady)
        );
    }

    #[test]
    fn closed_is_terminal() {
        let closed = EngineState::Closed;
        assert_eq!(closed.transition(EngineEvent::Close), Some(closed));
        assert_eq!(closed.transition(EngineEvent::OutputInitialized), None);
        assert_eq!(closed.transition(EngineEvent::CaptureStarted), None);
        assert_eq!(closed.transition(EngineEvent::CaptureStopped), None);
    }

    #[test]
    fn redundant_stop_keeps_state() {
        assert_eq!(
            EngineState::OutputReady.transition(EngineEvent::CaptureStopped),
            Some(EngineState::OutputReady)
        );
        assert_eq!(STOPPED.transition(EngineEvent::CaptureStopped), Some(STOPPED));
    }

    #[test]
    fn display_names() {
        assert_eq!(EngineState::OutputReady.to_string(), "output-ready");
        assert!(ACTIVE.is_capturing());
        assert!(!STOPPED.is_capturing());
        assert!(STOPPED.is_output_ready());
    }
}
