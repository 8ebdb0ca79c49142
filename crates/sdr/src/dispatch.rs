// Copyright 2025-2026 CEMAXECUTER LLC

//! Immediate-vs-deferred push of shadow changes.

use crate::api::{ApiError, DeviceHandle, RspApi};
use crate::mode::Tuner;
use crate::params::ParamStore;
use crate::reason::ReasonFlags;

/// Collects the reason flags dirtied by one public operation and commits
/// them with at most one vendor `update` call.
#[derive(Debug, Default)]
pub struct UpdateDispatcher {
    pending: ReasonFlags,
}

impl UpdateDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record register groups dirtied by a setter.
    pub fn mark(&mut self, reasons: ReasonFlags) {
        self.pending |= reasons;
    }

    pub fn pending(&self) -> ReasonFlags {
        self.pending
    }

    /// Commit the accumulated flags.
    ///
    /// While streaming this issues one `update` carrying the union and
    /// returns the flags sent. When idle the flags are dropped: the
    /// streaming engine pushes the whole shadow at stream start.
    pub fn flush(
        &mut self,
        api: &mut dyn RspApi,
        device: &DeviceHandle,
        tuner: Tuner,
        streaming: bool,
        params: &ParamStore,
    ) -> Result<ReasonFlags, ApiError> {
        let reasons = self.pending.take();
        if reasons.is_empty() {
            return Ok(ReasonFlags::NONE);
        }
        if !streaming {
            log::debug!("not streaming, deferring {:?}", reasons);
            return Ok(ReasonFlags::NONE);
        }
        log::debug!("update {:?}", reasons);
        api.update(device, tuner, reasons, params)?;
        Ok(reasons)
    }
}
