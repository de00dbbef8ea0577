//! Driver status codes
//!
//! A [`Status`] is the opaque result code returned by menu callbacks and by
//! driver calls. `0` means success; any other value is a failure the menu
//! navigator reacts to by backtracking. The named constants mirror the
//! status values of the external driver API so diagnostics can print a
//! readable description next to the raw code.

use std::fmt;

/// Opaque status code. `Status::SUCCESS` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Status(pub u32);

impl Status {
    pub const SUCCESS: Status = Status(0);

    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    pub fn code(self) -> u32 {
        self.0
    }

    /// Process exit code for this status.
    ///
    /// Only the low byte survives on most platforms, so a failure whose low
    /// byte is zero exits with 1 rather than looking like success.
    pub fn exit_code(self) -> i32 {
        match self.0 & 0xff {
            0 if self.is_success() => 0,
            0 => 1,
            low => low as i32,
        }
    }

    /// Convert a driver result into the status it carries.
    pub fn of<T>(result: &Result<T, Status>) -> Status {
        match result {
            Ok(_) => Status::SUCCESS,
            Err(status) => *status,
        }
    }
}

impl From<u32> for Status {
    fn from(code: u32) -> Self {
        Status(code)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x} ({})", self.0, describe(*self))
    }
}

pub const WINDRIVER_STATUS_ERROR: Status = Status(0x2000_0000);
pub const INVALID_HANDLE: Status = Status(0x2000_0001);
pub const READ_WRITE_CONFLICT: Status = Status(0x2000_0003);
pub const INSUFFICIENT_RESOURCES: Status = Status(0x2000_0005);
pub const DATA_MISMATCH: Status = Status(0x2000_0008);
pub const NOT_IMPLEMENTED: Status = Status(0x2000_000a);
pub const DEVICE_NOT_FOUND: Status = Status(0x2000_000f);
pub const WRONG_UNIQUE_ID: Status = Status(0x2000_0010);
pub const OPERATION_ALREADY_DONE: Status = Status(0x2000_0011);
pub const TIME_OUT_EXPIRED: Status = Status(0x2000_0015);
pub const INVALID_PARAMETER: Status = Status(0x2000_001b);
pub const INCORRECT_VERSION: Status = Status(0x2000_001c);
pub const OPERATION_FAILED: Status = Status(0x2000_0020);
pub const NO_DEVICE_OBJECT: Status = Status(0x2000_0023);
pub const NO_RESOURCES_ON_DEVICE: Status = Status(0x2000_0024);

/// Human-readable description of a status code.
pub fn describe(status: Status) -> &'static str {
    match status {
        Status::SUCCESS => "Success",
        WINDRIVER_STATUS_ERROR => "Error",
        INVALID_HANDLE => "Invalid handle",
        READ_WRITE_CONFLICT => "Read/write conflict",
        INSUFFICIENT_RESOURCES => "Insufficient resources",
        DATA_MISMATCH => "Data mismatch",
        NOT_IMPLEMENTED => "Function not implemented",
        DEVICE_NOT_FOUND => "Device not found",
        WRONG_UNIQUE_ID => "Wrong unique ID",
        OPERATION_ALREADY_DONE => "Operation already done",
        TIME_OUT_EXPIRED => "Time out expired",
        INVALID_PARAMETER => "Invalid parameter",
        INCORRECT_VERSION => "Incorrect version",
        OPERATION_FAILED => "Operation failed",
        NO_DEVICE_OBJECT => "No device object",
        NO_RESOURCES_ON_DEVICE => "No resources on device",
        _ => "Unrecognized error code",
    }
}
