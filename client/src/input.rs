//! Keyboard sampling and translation into paddle commands

use macroquad::prelude::*;
use shared::{ClientMessage, PaddleSide, UserInput};

/// Keys the court reacts to. W/S steer the left paddle, the arrows the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    W,
    S,
    Up,
    Down,
}

impl Key {
    const ALL: [Key; 4] = [Key::W, Key::S, Key::Up, Key::Down];

    fn code(self) -> KeyCode {
        match self {
            Key::W => KeyCode::W,
            Key::S => KeyCode::S,
            Key::Up => KeyCode::Up,
            Key::Down => KeyCode::Down,
        }
    }

    fn index(self) -> usize {
        match self {
            Key::W => 0,
            Key::S => 1,
            Key::Up => 2,
            Key::Down => 3,
        }
    }

    pub fn paddle(self) -> PaddleSide {
        match self {
            Key::W | Key::S => PaddleSide::Left,
            Key::Up | Key::Down => PaddleSide::Right,
        }
    }

    pub fn command(self, pressed: bool) -> UserInput {
        match (self, pressed) {
            (Key::W | Key::Up, true) => UserInput::MoveUpStart,
            (Key::W | Key::Up, false) => UserInput::MoveUpEnd,
            (Key::S | Key::Down, true) => UserInput::MoveDownStart,
            (Key::S | Key::Down, false) => UserInput::MoveDownEnd,
        }
    }
}

/// Turns key edges into `game` messages, suppressing repeats of the last
/// command sent
pub struct InputManager {
    prev_cmd: Option<UserInput>,
    // Previous frame key states for edge detection
    prev_down: [bool; 4],
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            prev_cmd: None,
            prev_down: [false; 4],
        }
    }

    /// Returns the message to send for one key edge, if the command differs
    /// from the previous one.
    pub fn key_event(&mut self, key: Key, pressed: bool) -> Option<ClientMessage> {
        let cmd = key.command(pressed);
        if self.prev_cmd == Some(cmd) {
            return None;
        }
        self.prev_cmd = Some(cmd);

        Some(ClientMessage::Game {
            cmd,
            paddle: key.paddle(),
        })
    }

    /// Samples the keyboard once per frame and collects the messages to send
    pub fn update(&mut self) -> Vec<ClientMessage> {
        let mut messages = Vec::new();

        for key in Key::ALL {
            let down = is_key_down(key.code());
            let was_down = self.prev_down[key.index()];
            self.prev_down[key.index()] = down;

            if down != was_down {
                messages.extend(self.key_event(key, down));
            }
        }

        messages
    }

    pub fn last_command(&self) -> Option<UserInput> {
        self.prev_cmd
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_manager_creation() {
        let input_manager = InputManager::new();
        assert_eq!(input_manager.last_command(), None);
        assert_eq!(input_manager.prev_down, [false; 4]);
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(Key::W.paddle(), PaddleSide::Left);
        assert_eq!(Key::Down.paddle(), PaddleSide::Right);
        assert_eq!(Key::Up.command(true), UserInput::MoveUpStart);
        assert_eq!(Key::S.command(false), UserInput::MoveDownEnd);
    }

    #[test]
    fn test_press_and_release_sent() {
        let mut input = InputManager::new();

        assert_eq!(
            input.key_event(Key::W, true),
            Some(ClientMessage::Game {
                cmd: UserInput::MoveUpStart,
                paddle: PaddleSide::Left,
            })
        );
        assert_eq!(
            input.key_event(Key::W, false),
            Some(ClientMessage::Game {
                cmd: UserInput::MoveUpEnd,
                paddle: PaddleSide::Left,
            })
        );
    }

    #[test]
    fn test_repeated_command_suppressed() {
        let mut input = InputManager::new();

        assert!(input.key_event(Key::Down, true).is_some());
        assert!(input.key_event(Key::Down, true).is_none());
        // Same command from the other paddle's key is still a repeat.
        assert!(input.key_event(Key::S, true).is_none());
        assert!(input.key_event(Key::S, false).is_some());
        assert_eq!(input.last_command(), Some(UserInput::MoveDownEnd));
    }
}
