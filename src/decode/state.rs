//! Decoder lifecycle state machine.

/// Decoder state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderState {
    /// Constructed, not opened yet
    #[default]
    Init,
    /// Open, decode steps may produce a frame
    Running,
    /// A decoded frame is waiting in the output buffer
    HasFrame,
    /// Reserved for a successful end of stream; never entered
    Ended,
    /// Open or decode failed; terminal
    Failed,
}

impl DecoderState {
    /// Check if a frame is ready to be taken
    pub fn has_frame(&self) -> bool {
        matches!(self, DecoderState::HasFrame)
    }

    /// Check if the decoder failed
    pub fn is_failed(&self) -> bool {
        matches!(self, DecoderState::Failed)
    }

    /// Check if decode steps can still make progress
    pub fn is_active(&self) -> bool {
        matches!(self, DecoderState::Running | DecoderState::HasFrame)
    }

    /// Check if no further frames can ever be produced
    pub fn is_terminal(&self) -> bool {
        matches!(self, DecoderState::Failed | DecoderState::Ended)
    }

    /// State after the caller consumes the current frame
    pub fn after_take(self) -> Self {
        match self {
            DecoderState::HasFrame => DecoderState::Running,
            other => other,
        }
    }
}
