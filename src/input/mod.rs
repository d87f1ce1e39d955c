//! Control input carried from the data channel into the render tick
//!
//! ```text
//! data channel text --parse--> ControlEvent --InputSender--> [128 slots]
//!                                                               |
//!                                    render tick <--drain-- InputReceiver
//! ```

pub mod bridge;
pub mod command;

pub use bridge::{
    input_bridge, ControlEvent, InputReceiver, InputSender, InputSink, PointerState,
    INPUT_QUEUE_CAPACITY,
};
pub use command::{apply_command, parse_command, ControlCommand};
