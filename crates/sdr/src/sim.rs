// Copyright 2025-2026 CEMAXECUTER LLC

//! In-process vendor API and streaming engine.
//!
//! `SimApi` behaves like a receiver attached over USB: it enumerates the
//! configured devices, hands out handles, and records every state-changing
//! call so the control plane can be driven and observed without hardware.
//! Clones share state, so a test can keep one clone while the device owns
//! the other.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::antenna::DuoAmPort;
use crate::api::{
    ApiError, DeviceHandle, DeviceInfo, HardwareVersion, RspApi, StreamEngine, API_VERSION,
};
use crate::mode::{DuoMode, Tuner};
use crate::params::ParamStore;
use crate::reason::ReasonFlags;

/// A recorded vendor call.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Open,
    Close,
    Select {
        serial: String,
        tuner: Tuner,
        mode: DuoMode,
    },
    Release {
        serial: String,
    },
    SwapTuner {
        tuner: Tuner,
        am_port: DuoAmPort,
    },
    Update {
        tuner: Tuner,
        reasons: ReasonFlags,
    },
    Init {
        fs_hz: u32,
    },
    Uninit,
}

struct SimState {
    devices: Vec<DeviceInfo>,
    version: f32,
    calls: Vec<ApiCall>,
    open: bool,
    next_handle: u64,
    fail_open: Option<String>,
    fail_select: Option<String>,
    fail_update: Option<String>,
}

/// Simulated `sdrplay_api`.
#[derive(Clone)]
pub struct SimApi {
    state: Arc<Mutex<SimState>>,
}

impl SimApi {
    pub fn new(devices: Vec<DeviceInfo>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                devices,
                version: API_VERSION,
                calls: Vec::new(),
                open: false,
                next_handle: 1,
                fail_open: None,
                fail_select: None,
                fail_update: None,
            })),
        }
    }

    /// One receiver of the given kind. An RSPduo reports every mode free.
    pub fn single(hw: HardwareVersion) -> Self {
        Self::new(vec![Self::device_info(hw, "SIM0001")])
    }

    pub fn device_info(hw: HardwareVersion, serial: &str) -> DeviceInfo {
        let duo_modes = match hw {
            HardwareVersion::RspDuo => {
                DuoMode::SINGLE_TUNER | DuoMode::DUAL_TUNER | DuoMode::MASTER
            }
            _ => DuoMode::UNKNOWN,
        };
        DeviceInfo {
            serial: serial.to_string(),
            hw_ver: hw,
            duo_modes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_api_version(self, version: f32) -> Self {
        self.lock().version = version;
        self
    }

    pub fn fail_open(&self, message: &str) {
        self.lock().fail_open = Some(message.to_string());
    }

    /// Make the next `select_device` fail with `message`.
    pub fn fail_next_select(&self, message: &str) {
        self.lock().fail_select = Some(message.to_string());
    }

    /// Make every `update` fail with `message` until cleared with `None`.
    pub fn fail_updates(&self, message: Option<&str>) {
        self.lock().fail_update = message.map(str::to_string);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Only the `update` calls, as (tuner, reasons).
    pub fn updates(&self) -> Vec<(Tuner, ReasonFlags)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                ApiCall::Update { tuner, reasons } => Some((*tuner, *reasons)),
                _ => None,
            })
            .collect()
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }
}

impl RspApi for SimApi {
    fn open(&mut self) -> Result<(), ApiError> {
        let mut st = self.lock();
        if let Some(msg) = st.fail_open.take() {
            return Err(ApiError(msg));
        }
        st.open = true;
        st.calls.push(ApiCall::Open);
        Ok(())
    }

    fn close(&mut self) {
        let mut st = self.lock();
        st.open = false;
        st.calls.push(ApiCall::Close);
    }

    fn api_version(&mut self) -> Result<f32, ApiError> {
        let st = self.lock();
        if !st.open {
            return Err(ApiError("sdrplay_api_NotInitialised".to_string()));
        }
        Ok(st.version)
    }

    fn devices(&mut self) -> Result<Vec<DeviceInfo>, ApiError> {
        Ok(self.lock().devices.clone())
    }

    fn select_device(&mut self, device: &mut DeviceHandle) -> Result<(), ApiError> {
        let mut st = self.lock();
        if let Some(msg) = st.fail_select.take() {
            return Err(ApiError(msg));
        }
        if device.hw_ver == HardwareVersion::RspDuo && !device.duo_mode.is_resolved() {
            return Err(ApiError("sdrplay_api_InvalidParam".to_string()));
        }
        st.calls.push(ApiCall::Select {
            serial: device.serial.clone(),
            tuner: device.tuner,
            mode: device.duo_mode,
        });
        device.handle = Some(st.next_handle);
        st.next_handle += 1;
        Ok(())
    }

    fn release_device(&mut self, device: &mut DeviceHandle) -> Result<(), ApiError> {
        let mut st = self.lock();
        st.calls.push(ApiCall::Release {
            serial: device.serial.clone(),
        });
        device.handle = None;
        Ok(())
    }

    fn swap_active_tuner(
        &mut self,
        device: &mut DeviceHandle,
        tuner: Tuner,
        am_port: DuoAmPort,
    ) -> Result<(), ApiError> {
        if !device.is_selected() {
            return Err(ApiError("sdrplay_api_NotInitialised".to_string()));
        }
        self.lock().calls.push(ApiCall::SwapTuner { tuner, am_port });
        device.tuner = tuner;
        Ok(())
    }

    fn update(
        &mut self,
        device: &DeviceHandle,
        tuner: Tuner,
        reasons: ReasonFlags,
        _params: &ParamStore,
    ) -> Result<(), ApiError> {
        let mut st = self.lock();
        if !device.is_selected() {
            return Err(ApiError("sdrplay_api_NotInitialised".to_string()));
        }
        if let Some(msg) = &st.fail_update {
            return Err(ApiError(msg.clone()));
        }
        st.calls.push(ApiCall::Update { tuner, reasons });
        Ok(())
    }

    fn init(&mut self, device: &DeviceHandle, params: &ParamStore) -> Result<(), ApiError> {
        if !device.is_selected() {
            return Err(ApiError("sdrplay_api_NotInitialised".to_string()));
        }
        self.lock().calls.push(ApiCall::Init {
            fs_hz: params.device().fs_hz,
        });
        Ok(())
    }

    fn uninit(&mut self, _device: &DeviceHandle) -> Result<(), ApiError> {
        self.lock().calls.push(ApiCall::Uninit);
        Ok(())
    }
}

/// Streaming engine stand-in. Tracks the running flag and buffer resets.
#[derive(Clone, Default)]
pub struct SimStream {
    running: Arc<AtomicBool>,
    resets: Arc<AtomicUsize>,
}

impl SimStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn reset_count(&self) -> usize {
        self.resets.load(Ordering::Relaxed)
    }
}

impl StreamEngine for SimStream {
    fn is_active(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn start(
        &mut self,
        api: &mut dyn RspApi,
        device: &DeviceHandle,
        params: &ParamStore,
    ) -> Result<(), ApiError> {
        if self.is_active() {
            return Ok(());
        }
        api.init(device, params)?;
        self.running.store(true, Ordering::Relaxed);
        log::info!("streaming from {} at {} Hz", device.serial, params.device().fs_hz);
        Ok(())
    }

    fn stop(&mut self, api: &mut dyn RspApi, device: &DeviceHandle) -> Result<(), ApiError> {
        if !self.is_active() {
            return Ok(());
        }
        self.running.store(false, Ordering::Relaxed);
        api.uninit(device)
    }

    fn reset_buffers(&mut self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }
}
