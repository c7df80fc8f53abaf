//! Keyboard control of a running pipeline.
//!
//! Maps single-key commands to pipeline actions: `p` or space toggles
//! between PLAYING and PAUSED, `q` (or `s`) sends end-of-stream. Input is
//! handled one line at a time, so it works with a line-buffered terminal.

use crate::element::{State, StateChangeSuccess};
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use tracing::info;

/// What a key press did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// A state change toward this state was requested.
    SetState(State),
    /// End-of-stream was sent into the pipeline.
    SendEos,
    /// The key has no binding.
    Ignored,
}

/// Tracks the play/pause toggle.
#[derive(Debug, Clone)]
pub struct KeyboardController {
    playing: bool,
}

impl KeyboardController {
    /// Create a controller. `playing` is the state the pipeline was last
    /// put into.
    pub fn new(playing: bool) -> Self {
        Self { playing }
    }

    /// Whether the last toggle went to PLAYING.
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// The action bound to `key`, without performing it.
    pub fn action_for(&self, key: char) -> ControlAction {
        match key.to_ascii_lowercase() {
            'p' | ' ' => ControlAction::SetState(if self.playing {
                State::Paused
            } else {
                State::Playing
            }),
            'q' | 's' => ControlAction::SendEos,
            _ => ControlAction::Ignored,
        }
    }

    /// Perform the action bound to `key`. The toggle only flips when the
    /// pipeline accepts the state change.
    pub fn handle_key(&mut self, pipeline: &mut Pipeline, key: char) -> Result<ControlAction> {
        let action = self.action_for(key);
        match action {
            ControlAction::SetState(state) => {
                let result = pipeline.set_state(state)?;
                self.playing = state == State::Playing;
                info!(
                    pipeline = %pipeline.name(),
                    state = %state,
                    pending = result == StateChangeSuccess::Async,
                    "setting pipeline to {}",
                    if self.playing { "playing" } else { "paused" }
                );
            }
            ControlAction::SendEos => {
                if !pipeline.send_eos() {
                    return Err(Error::StateChange {
                        element: pipeline.name().to_string(),
                        reason: "no source accepted end-of-stream".into(),
                    });
                }
                info!(pipeline = %pipeline.name(), "stopping the pipeline");
            }
            ControlAction::Ignored => {}
        }
        Ok(action)
    }

    /// Handle one line of input by its first character.
    pub fn handle_line(&mut self, pipeline: &mut Pipeline, line: &str) -> Result<ControlAction> {
        match line.trim_end_matches(['\r', '\n']).chars().next() {
            Some(key) => self.handle_key(pipeline, key),
            None => Ok(ControlAction::Ignored),
        }
    }
}

impl Default for KeyboardController {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ElementFactory;

    #[test]
    fn test_key_bindings() {
        let controller = KeyboardController::new(false);
        assert_eq!(controller.action_for('p'), ControlAction::SetState(State::Playing));
        assert_eq!(controller.action_for(' '), ControlAction::SetState(State::Playing));
        assert_eq!(controller.action_for('Q'), ControlAction::SendEos);
        assert_eq!(controller.action_for('x'), ControlAction::Ignored);

        let controller = KeyboardController::new(true);
        assert_eq!(controller.action_for('P'), ControlAction::SetState(State::Paused));
    }

    #[test]
    fn test_toggle_drives_pipeline() {
        let factory = ElementFactory::with_builtins();
        let mut pipeline =
            crate::pipeline::launch(&factory, "testsrc interval-ms=5 ! fakesink").unwrap();
        let mut controller = KeyboardController::new(false);

        assert_eq!(
            controller.handle_line(&mut pipeline, "p\n").unwrap(),
            ControlAction::SetState(State::Playing)
        );
        assert!(controller.is_playing());
        assert_eq!(pipeline.target_state(), State::Playing);

        controller.handle_key(&mut pipeline, 'p').unwrap();
        assert!(!controller.is_playing());
        assert_eq!(pipeline.target_state(), State::Paused);

        assert_eq!(controller.handle_line(&mut pipeline, "").unwrap(), ControlAction::Ignored);
        pipeline.set_state(State::Null).unwrap();
    }
}
