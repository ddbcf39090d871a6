//! Collaborator boundaries consumed by the cycle controller.
//!
//! Each adapter owns its own bounded retry; the controller calls every port
//! at most once per cycle and moves on when it fails.

use crate::{
    error::{DispatchError, FetchError, TimeSyncError},
    types::ApplianceCommand,
};

pub use crate::retention::RetentionStore;

pub trait TimeSource {
    /// Unix epoch seconds from the network.
    fn fetch_network_time(&mut self) -> Result<i64, TimeSyncError>;
}

pub trait ScheduleSource {
    fn fetch_schedule_document(&mut self) -> Result<Vec<u8>, FetchError>;
}

/// Fire-and-forget appliance control. `Ok` means the command left the node,
/// not that the appliance acted on it.
pub trait CommandEmitter {
    fn emit(&mut self, command: ApplianceCommand) -> Result<(), DispatchError>;
}

impl<T: TimeSource + ?Sized> TimeSource for &mut T {
    fn fetch_network_time(&mut self) -> Result<i64, TimeSyncError> {
        (**self).fetch_network_time()
    }
}

impl<T: ScheduleSource + ?Sized> ScheduleSource for &mut T {
    fn fetch_schedule_document(&mut self) -> Result<Vec<u8>, FetchError> {
        (**self).fetch_schedule_document()
    }
}

impl<T: CommandEmitter + ?Sized> CommandEmitter for &mut T {
    fn emit(&mut self, command: ApplianceCommand) -> Result<(), DispatchError> {
        (**self).emit(command)
    }
}

impl<T: RetentionStore + ?Sized> RetentionStore for &mut T {
    fn load(&mut self) -> crate::retention::RetainedBlob {
        (**self).load()
    }

    fn save(
        &mut self,
        blob: &crate::retention::RetainedBlob,
    ) -> Result<(), crate::error::RetentionError> {
        (**self).save(blob)
    }
}
