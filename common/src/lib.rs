pub mod clock;
pub mod config;
pub mod cycle;
pub mod error;
pub mod matcher;
pub mod planner;
pub mod ports;
pub mod retention;
pub mod schedule;
pub mod topics;
pub mod types;

pub use clock::{ClockEstimate, LocalZone};
pub use config::{CycleConfig, IrHardwareConfig, NetworkConfig, NodeConfig, NtpConfig};
pub use cycle::{CycleController, CycleReport, DispatchStatus};
pub use error::{
    CycleFault, DispatchError, FetchError, InvariantViolation, ParseError, RetentionError,
    TimeSyncError,
};
pub use matcher::MatchOutcome;
pub use ports::{CommandEmitter, RetentionStore, ScheduleSource, TimeSource};
pub use retention::{
    MemoryRetention, PersistentState, RetainedBlob, ScheduleCache, RETAINED_BLOB_LEN,
    SCHEDULE_CACHE_CAPACITY,
};
pub use schedule::{Schedule, ScheduleEntry, TimeOfDay};
pub use topics::*;
pub use types::{ApplianceCommand, ClockSource, CyclePhase, WakeReason};
