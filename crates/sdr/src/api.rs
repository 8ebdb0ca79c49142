// Copyright 2025-2026 CEMAXECUTER LLC

//! Collaborator interfaces: the vendor control API and the streaming engine.

use serde::Serialize;

use crate::antenna::DuoAmPort;
use crate::mode::{DuoMode, Tuner};
use crate::params::ParamStore;
use crate::reason::ReasonFlags;

/// sdrplay_api version this crate is written against.
pub const API_VERSION: f32 = 3.07;

/// Receiver family, keyed by the vendor hardware id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HardwareVersion {
    Rsp1,
    Rsp1a,
    Rsp2,
    RspDuo,
}

impl HardwareVersion {
    pub fn from_id(id: u8) -> Option<HardwareVersion> {
        match id {
            1 => Some(HardwareVersion::Rsp1),
            2 => Some(HardwareVersion::Rsp2),
            3 => Some(HardwareVersion::RspDuo),
            255 => Some(HardwareVersion::Rsp1a),
            _ => None,
        }
    }

    pub fn id(self) -> u8 {
        match self {
            HardwareVersion::Rsp1 => 1,
            HardwareVersion::Rsp2 => 2,
            HardwareVersion::RspDuo => 3,
            HardwareVersion::Rsp1a => 255,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            HardwareVersion::Rsp1 => "RSP1",
            HardwareVersion::Rsp1a => "RSP1A",
            HardwareVersion::Rsp2 => "RSP2",
            HardwareVersion::RspDuo => "RSPduo",
        }
    }
}

/// One entry of the vendor device enumeration.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub serial: String,
    pub hw_ver: HardwareVersion,
    /// RSPduo modes still available on this unit
    pub duo_modes: DuoMode,
}

/// The vendor's per-device selection record (`sdrplay_api_DeviceT`).
///
/// `tuner` and `duo_mode` are inputs to `select_device`; `handle` is filled
/// in by a successful selection and cleared on release.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    pub serial: String,
    pub hw_ver: HardwareVersion,
    pub tuner: Tuner,
    pub duo_mode: DuoMode,
    pub handle: Option<u64>,
}

impl DeviceHandle {
    pub fn new(info: &DeviceInfo) -> Self {
        Self {
            serial: info.serial.clone(),
            hw_ver: info.hw_ver,
            tuner: Tuner::A,
            duo_mode: info.duo_modes,
            handle: None,
        }
    }

    pub fn is_selected(&self) -> bool {
        self.handle.is_some()
    }
}

/// Error reported by the vendor API. The message is the vendor's own
/// error string and is passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ApiError(pub String);

/// Vendor hardware control API.
///
/// `update` commits the register groups named by `reasons` from the shadow
/// state in one pass; callers never assume finer atomicity than that.
pub trait RspApi: Send {
    fn open(&mut self) -> Result<(), ApiError>;

    fn close(&mut self);

    fn api_version(&mut self) -> Result<f32, ApiError>;

    fn devices(&mut self) -> Result<Vec<DeviceInfo>, ApiError>;

    fn select_device(&mut self, device: &mut DeviceHandle) -> Result<(), ApiError>;

    fn release_device(&mut self, device: &mut DeviceHandle) -> Result<(), ApiError>;

    /// Move the RSPduo front end to `tuner`, routing tuner 1 through `am_port`.
    fn swap_active_tuner(
        &mut self,
        device: &mut DeviceHandle,
        tuner: Tuner,
        am_port: DuoAmPort,
    ) -> Result<(), ApiError>;

    fn update(
        &mut self,
        device: &DeviceHandle,
        tuner: Tuner,
        reasons: ReasonFlags,
        params: &ParamStore,
    ) -> Result<(), ApiError>;

    /// Start the hardware stream, committing the whole shadow state.
    fn init(&mut self, device: &DeviceHandle, params: &ParamStore) -> Result<(), ApiError>;

    fn uninit(&mut self, device: &DeviceHandle) -> Result<(), ApiError>;
}

/// The sample-streaming engine, as seen from the control plane.
///
/// Start and stop transitions run under the device guard through
/// [`RspDevice::with_stream`](crate::RspDevice::with_stream). `teardown` is
/// called with the guard held and must not call back into the device.
pub trait StreamEngine: Send {
    /// True while a hardware stream is running.
    fn is_active(&self) -> bool;

    fn start(
        &mut self,
        api: &mut dyn RspApi,
        device: &DeviceHandle,
        params: &ParamStore,
    ) -> Result<(), ApiError>;

    fn stop(&mut self, api: &mut dyn RspApi, device: &DeviceHandle) -> Result<(), ApiError>;

    /// Stop the hardware stream ahead of a device release. Errors are
    /// logged, the release goes ahead regardless.
    fn teardown(&mut self, api: &mut dyn RspApi, device: &DeviceHandle) {
        if let Err(e) = self.stop(api, device) {
            log::warn!("stream teardown on {}: {}", device.serial, e);
        }
    }

    /// Drop buffered samples after a sample-rate change.
    fn reset_buffers(&mut self) {}
}
