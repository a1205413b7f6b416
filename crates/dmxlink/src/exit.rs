use std::fmt;
use std::io;

use dmxlink_controller::ControllerError;
use dmxlink_frame::FrameError;
use dmxlink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const DRIVER_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(DRIVER_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Link(err) => transport_error(context, err),
        FrameError::OutOfRange { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        FrameError::InvalidLength(_) | FrameError::InvalidTiming(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn controller_error(context: &str, err: ControllerError) -> CliError {
    match err {
        ControllerError::Configuration(_) => CliError::new(USAGE, format!("{context}: {err}")),
        ControllerError::Driver(err) => transport_error(context, err),
        ControllerError::Frame(err) => frame_error(context, err),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
