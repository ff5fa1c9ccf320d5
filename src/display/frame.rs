//! Utility to display call frames

use super::value::{ParametersDisplay, ValueDisplay};
use clr_call_trace::{value::Value, FrameRef, FrameStatus};
use std::fmt::{self, Display, Formatter};

/// Display a frame as a C#-like call expression, with its return value
#[derive(Clone, Copy, Debug)]
pub struct FrameDisplay<'trace>(pub FrameRef<'trace>);
//
impl Display for FrameDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let frame = self.0;
        let Some(method) = frame.method() else {
            return write!(f, "Thread {}", frame.thread_id());
        };
        write!(f, "{}", method.full_name())?;

        match frame.enter_values() {
            Some(Ok(parameters)) => write!(f, "({})", ParametersDisplay(parameters))?,
            Some(Err(e)) => write!(f, "(<{e}>)")?,
            None => write!(f, "(…)")?,
        }

        match frame.exit_value() {
            Some(Ok(Value::Void)) | None => {}
            Some(Ok(value)) => write!(f, " -> {}", ValueDisplay(value))?,
            Some(Err(e)) => write!(f, " -> <{e}>")?,
        }

        match frame.status() {
            FrameStatus::Returned => Ok(()),
            FrameStatus::Replaced => write!(f, " [tail call]"),
            FrameStatus::Running => write!(f, " [running]"),
            FrameStatus::Incomplete => write!(f, " [incomplete]"),
        }
    }
}

/// Render a frame into a string
pub fn frame_string(frame: FrameRef) -> String {
    FrameDisplay(frame).to_string()
}
