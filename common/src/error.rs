use serde::Serialize;
use thiserror::Error;

/// Rejection reasons for a schedule document. Entry indices are zero-based
/// positions in the document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("schedule document is not valid JSON: {0}")]
    Syntax(String),
    #[error("schedule document has no entries")]
    Empty,
    #[error("entry {index}: hour {hour} outside 0..=23")]
    HourOutOfRange { index: usize, hour: i64 },
    #[error("entry {index}: minute {minute} outside 0..=59")]
    MinuteOutOfRange { index: usize, minute: i64 },
    #[error("entry {index}: target temperature {value} does not fit")]
    TemperatureOutOfRange { index: usize, value: i64 },
    #[error("entry {index}: power must be a boolean or 0/1")]
    InvalidPower { index: usize },
    #[error("entry {index}: duplicate time {hour:02}:{minute:02}")]
    Duplicate { index: usize, hour: u8, minute: u8 },
    #[error("entry {index}: {hour:02}:{minute:02} is earlier than the entry before it")]
    OutOfOrder { index: usize, hour: u8, minute: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeSyncError {
    #[error("time server unreachable: {0}")]
    Unreachable(String),
    #[error("no time response after {attempts} attempts")]
    Timeout { attempts: u32 },
    #[error("malformed time response: {0}")]
    Malformed(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("schedule transport failed: {0}")]
    Transport(String),
    #[error("schedule server answered HTTP {0}")]
    Status(u16),
    #[error("schedule document is {len} bytes, limit is {capacity}")]
    TooLarge { len: usize, capacity: usize },
    #[error("schedule read failed: {0}")]
    Io(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("appliance cannot encode command: {0}")]
    Unsupported(String),
    #[error("command transmission failed: {0}")]
    Transmit(String),
}

/// Broken assumptions about schedule shape that slipped past parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("matcher received an empty schedule")]
    EmptySchedule,
    #[error("interval to next entry is {minutes} minutes")]
    NonPositiveInterval { minutes: i32 },
    #[error("index {index} outside schedule of {len} entries")]
    IndexOutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetentionError {
    #[error("retained state is blank")]
    Blank,
    #[error("retained state has unknown magic {0:02x?}")]
    BadMagic([u8; 4]),
    #[error("retained state checksum mismatch")]
    Corrupt,
    #[error("schedule cache needs {len} bytes, capacity is {capacity}")]
    CacheOverflow { len: usize, capacity: usize },
    #[error("retention write failed: {0}")]
    Write(String),
}

/// Everything that degraded a cycle, kept in the cycle report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum CycleFault {
    Retention(String),
    TimeSync(String),
    Fetch(String),
    Parse(String),
    Dispatch(String),
    Invariant(String),
    NoSchedule,
    ClockUnknown,
}

impl From<RetentionError> for CycleFault {
    fn from(err: RetentionError) -> Self {
        Self::Retention(err.to_string())
    }
}

impl From<TimeSyncError> for CycleFault {
    fn from(err: TimeSyncError) -> Self {
        Self::TimeSync(err.to_string())
    }
}

impl From<FetchError> for CycleFault {
    fn from(err: FetchError) -> Self {
        Self::Fetch(err.to_string())
    }
}

impl From<ParseError> for CycleFault {
    fn from(err: ParseError) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<DispatchError> for CycleFault {
    fn from(err: DispatchError) -> Self {
        Self::Dispatch(err.to_string())
    }
}

impl From<InvariantViolation> for CycleFault {
    fn from(err: InvariantViolation) -> Self {
        Self::Invariant(err.to_string())
    }
}
