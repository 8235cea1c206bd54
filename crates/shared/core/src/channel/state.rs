use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Channel handle lifecycle
///
/// `Created → Connecting → Open → (Buffered) → Closing → Closed`
///
/// States only move forward. A broken connection jumps straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ChannelState {
    Created = 0,
    Connecting = 1,
    Open = 2,
    /// Open with messages queued between the network and the caller
    Buffered = 3,
    Closing = 4,
    Closed = 5,
}

impl ChannelState {
    /// Returns true once no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelState::Closed)
    }

    /// Returns true while messages may still flow
    pub fn is_active(&self) -> bool {
        matches!(self, ChannelState::Open | ChannelState::Buffered)
    }

    pub fn can_transition_to(&self, next: ChannelState) -> bool {
        !self.is_terminal() && next > *self
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelState::Created,
            1 => ChannelState::Connecting,
            2 => ChannelState::Open,
            3 => ChannelState::Buffered,
            4 => ChannelState::Closing,
            _ => ChannelState::Closed,
        }
    }
}

/// Lock-free holder for a `ChannelState`, shared by a handle and its relay task
#[derive(Debug)]
pub struct StateCell {
    state: AtomicU8,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(ChannelState::Created as u8),
        }
    }

    pub fn get(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `next` if the lifecycle allows it.
    ///
    /// Returns the previous state on success, or the current state when the
    /// transition is refused (backwards, or out of `Closed`).
    pub fn advance(&self, next: ChannelState) -> Result<ChannelState, ChannelState> {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let current = ChannelState::from_u8(current);
                current.can_transition_to(next).then_some(next as u8)
            })
            .map(ChannelState::from_u8)
            .map_err(ChannelState::from_u8)
    }

    /// Terminal transition, always allowed unless already closed
    pub fn close(&self) -> ChannelState {
        ChannelState::from_u8(
            self.state
                .swap(ChannelState::Closed as u8, Ordering::AcqRel),
        )
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
