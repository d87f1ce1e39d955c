//! Data-channel control command parsing
//!
//! Text format (comma-separated ASCII):
//! - `m,<dx>,<dy>`: pointer move
//! - `w,<dz>`: wheel / zoom
//!
//! Anything else is ignored without surfacing an error to the peer.

use tracing::trace;

use super::bridge::{ControlEvent, InputSink};

/// Command prefixes
pub const CMD_MOVE: &str = "m";
pub const CMD_WHEEL: &str = "w";

/// Parsed control command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Move { dx: i32, dy: i32 },
    Wheel { dz: i32 },
}

impl ControlCommand {
    pub fn to_event(self) -> ControlEvent {
        match self {
            ControlCommand::Move { dx, dy } => ControlEvent::movement(dx, dy),
            ControlCommand::Wheel { dz } => ControlEvent::wheel(dz),
        }
    }
}

/// Parse one data-channel text command
pub fn parse_command(text: &str) -> Option<ControlCommand> {
    let mut fields = text.trim_end_matches(['\r', '\n']).split(',');

    match fields.next()? {
        CMD_MOVE => {
            let dx = fields.next()?.parse::<i32>().ok()?;
            let dy = fields.next()?.parse::<i32>().ok()?;
            Some(ControlCommand::Move { dx, dy })
        }
        CMD_WHEEL => {
            let dz = fields.next()?.parse::<i32>().ok()?;
            Some(ControlCommand::Wheel { dz })
        }
        _ => None,
    }
}

/// Parse `text` and forward a valid command to `sink`
///
/// Returns whether a command was delivered.
pub fn apply_command(text: &str, sink: &dyn InputSink) -> bool {
    match parse_command(text) {
        Some(ControlCommand::Move { dx, dy }) => sink.input_xy(dx, dy),
        Some(ControlCommand::Wheel { dz }) => sink.input_z(dz),
        None => {
            trace!("Ignoring control message {:?}", text);
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingInput {
        calls: Mutex<Vec<(char, i32, i32)>>,
    }

    impl InputSink for RecordingInput {
        fn input_xy(&self, dx: i32, dy: i32) {
            self.calls.lock().push(('m', dx, dy));
        }
        fn input_z(&self, dz: i32) {
            self.calls.lock().push(('w', dz, 0));
        }
    }

    #[test]
    fn test_move_command() {
        let input = RecordingInput::default();
        assert!(apply_command("m,10,20", &input));
        assert_eq!(*input.calls.lock(), vec![('m', 10, 20)]);
    }

    #[test]
    fn test_wheel_command() {
        let input = RecordingInput::default();
        assert!(apply_command("w,-3", &input));
        assert!(apply_command("w,0", &input));
        assert_eq!(*input.calls.lock(), vec![('w', -3, 0), ('w', 0, 0)]);
    }

    #[test]
    fn test_invalid_commands_are_ignored() {
        let input = RecordingInput::default();
        for text in ["m,10", "w,bad", "x,1", "", "m", "m,1,two", "w", "M,1,2", "m,,1"] {
            assert!(!apply_command(text, &input), "{:?} should be ignored", text);
        }
        assert!(input.calls.lock().is_empty());
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("m,-5,7"), Some(ControlCommand::Move { dx: -5, dy: 7 }));
        assert_eq!(parse_command("m,0,0\n"), Some(ControlCommand::Move { dx: 0, dy: 0 }));
        assert_eq!(parse_command("w,120"), Some(ControlCommand::Wheel { dz: 120 }));
        assert_eq!(parse_command("w,99999999999"), None);
        assert_eq!(
            parse_command("w,4").map(ControlCommand::to_event),
            Some(ControlEvent::wheel(4))
        );
    }
}
