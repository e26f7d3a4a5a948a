mod command_framer;
mod command_table;
mod control_session;

pub use self::command_framer::{
    CommandFramer, FrameReceipt, FrameStep, FrameWrite, FramerError, MAX_COMMAND_LEN, STEP_DELAY,
};
pub use self::command_table::RobotCommand;
pub use self::control_session::{
    ControlSession, DispatchError, DispatchReceipt, SETTLE_DELAY,
};
