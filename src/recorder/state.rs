use serde::{Deserialize, Serialize};
use std::fmt;

/// Recording lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
    Paused,
    Stopped,
}

impl RecordingState {
    /// Recording or paused: the encoder holds the stream
    pub fn is_active(self) -> bool {
        matches!(self, RecordingState::Recording | RecordingState::Paused)
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordingState::Idle => "idle",
            RecordingState::Recording => "recording",
            RecordingState::Paused => "paused",
            RecordingState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Inputs to the lifecycle state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingAction {
    Start,
    Pause,
    Resume,
    Stop,
    Reset,
    /// Encoder runtime failure
    Fail,
}

impl RecordingAction {
    pub fn name(self) -> &'static str {
        match self {
            RecordingAction::Start => "start",
            RecordingAction::Pause => "pause",
            RecordingAction::Resume => "resume",
            RecordingAction::Stop => "stop",
            RecordingAction::Reset => "reset",
            RecordingAction::Fail => "fail",
        }
    }
}

/// Transition table. `None` means the action is not accepted from `state`.
pub fn transition(state: RecordingState, action: RecordingAction) -> Option<RecordingState> {
    use RecordingAction as A;
    use RecordingState as S;

    match (state, action) {
        (S::Idle, A::Start) => Some(S::Recording),
        (S::Recording, A::Pause) => Some(S::Paused),
        (S::Paused, A::Resume) => Some(S::Recording),
        (S::Recording | S::Paused, A::Stop) => Some(S::Stopped),
        (S::Recording | S::Paused, A::Fail) => Some(S::Idle),
        (_, A::Reset) => Some(S::Idle),
        _ => None,
    }
}
