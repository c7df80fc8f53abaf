//! The element state machine.
//!
//! ```text
//! NULL <-> READY <-> PAUSED <-> PLAYING
//! ```
//!
//! - `NULL`: nothing allocated.
//! - `READY`: resources checked and opened, no data flowing.
//! - `PAUSED`: data flows until sinks have received their first buffer
//!   (preroll), then blocks.
//! - `PLAYING`: data flows freely.

use std::fmt;

/// One of the four element states. Ordered from `Null` to `Playing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum State {
    /// Initial state, no resources held.
    #[default]
    Null,
    /// Resources allocated, not streaming.
    Ready,
    /// Streaming, sinks blocked after preroll.
    Paused,
    /// Streaming.
    Playing,
}

impl State {
    /// The adjacent state one step toward `target`, or `self` if already there.
    pub fn next_toward(self, target: State) -> State {
        use State::*;
        match self.cmp(&target) {
            std::cmp::Ordering::Less => match self {
                Null => Ready,
                Ready => Paused,
                Paused | Playing => Playing,
            },
            std::cmp::Ordering::Greater => match self {
                Playing => Paused,
                Paused => Ready,
                Ready | Null => Null,
            },
            std::cmp::Ordering::Equal => self,
        }
    }

    /// Upper-case name, as printed in logs.
    pub fn name(self) -> &'static str {
        match self {
            State::Null => "NULL",
            State::Ready => "READY",
            State::Paused => "PAUSED",
            State::Playing => "PLAYING",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single-step transition between adjacent states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateChange {
    /// State before the transition.
    pub from: State,
    /// State after the transition.
    pub to: State,
}

impl StateChange {
    /// NULL to READY.
    pub const NULL_TO_READY: Self = Self::new(State::Null, State::Ready);
    /// READY to PAUSED.
    pub const READY_TO_PAUSED: Self = Self::new(State::Ready, State::Paused);
    /// PAUSED to PLAYING.
    pub const PAUSED_TO_PLAYING: Self = Self::new(State::Paused, State::Playing);
    /// PLAYING to PAUSED.
    pub const PLAYING_TO_PAUSED: Self = Self::new(State::Playing, State::Paused);
    /// PAUSED to READY.
    pub const PAUSED_TO_READY: Self = Self::new(State::Paused, State::Ready);
    /// READY to NULL.
    pub const READY_TO_NULL: Self = Self::new(State::Ready, State::Null);

    /// Create a transition.
    pub const fn new(from: State, to: State) -> Self {
        Self { from, to }
    }

    /// Whether the transition moves toward PLAYING.
    pub fn is_upward(&self) -> bool {
        self.to > self.from
    }
}

impl fmt::Display for StateChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Successful outcome of a state change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateChangeSuccess {
    /// The transition completed.
    Success,
    /// The transition will complete later; an async-done message follows.
    Async,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_toward() {
        assert_eq!(State::Null.next_toward(State::Playing), State::Ready);
        assert_eq!(State::Paused.next_toward(State::Playing), State::Playing);
        assert_eq!(State::Playing.next_toward(State::Null), State::Paused);
        assert_eq!(State::Ready.next_toward(State::Ready), State::Ready);
    }

    #[test]
    fn test_ordering_and_display() {
        assert!(State::Null < State::Ready);
        assert!(State::Paused < State::Playing);
        assert_eq!(State::Paused.to_string(), "PAUSED");
        assert_eq!(StateChange::READY_TO_PAUSED.to_string(), "READY -> PAUSED");
        assert!(StateChange::READY_TO_PAUSED.is_upward());
        assert!(!StateChange::PAUSED_TO_READY.is_upward());
    }
}
