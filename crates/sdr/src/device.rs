// Copyright 2025-2026 CEMAXECUTER LLC

//! The `SDRplay3` device object.
//!
//! Every public operation takes the device guard for its full duration, so
//! a setter, a mode change and a stream start/stop never interleave. The
//! session lock is only ever taken while the device guard is held.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::antenna::{self, Antenna, DuoRouting, PortStep};
use crate::api::{
    ApiError, DeviceHandle, DeviceInfo, HardwareVersion, RspApi, StreamEngine, API_VERSION,
};
use crate::dispatch::UpdateDispatcher;
use crate::mode::{self, DuoMode, ModeRequest, Transition, Tuner};
use crate::params::{AgcMode, ParamStore};
use crate::planner::{IfType, BANDWIDTHS, SAMPLE_RATES};
use crate::reason::ReasonFlags;
use crate::session::{ApiSession, SessionLease};
use crate::settings::{self, GainElement, Setting, GAIN_NAMES};
use crate::Direction;

pub const DRIVER_KEY: &str = "SDRplay3";
pub const LABEL_PREFIX: &str = "SDRplay3 Dev";
pub const FREQUENCY_NAMES: [&str; 2] = ["RF", "CORR"];
/// Tunable RF range in Hz.
pub const RF_RANGE: (f64, f64) = (10_000.0, 2_000_000_000.0);

/// SoapySDR-style key/value arguments.
pub type Kwargs = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum RspError {
    /// The device could not be opened. Fatal for this device object.
    #[error("{context}: {message}")]
    Construction {
        context: &'static str,
        message: String,
    },
    /// A mode change released the device and could not select it again.
    #[error("device lost during mode change: {0}")]
    Transition(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

fn construction(context: &'static str) -> impl FnOnce(ApiError) -> RspError {
    move |e| RspError::Construction {
        context,
        message: e.0,
    }
}

/// Parsed construction arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceArgs {
    /// Position in the vendor enumeration
    pub index: usize,
    pub rspduo_mode: Option<String>,
}

impl DeviceArgs {
    pub fn from_kwargs(args: &Kwargs) -> Result<DeviceArgs, RspError> {
        let label = args.get("label").ok_or_else(|| RspError::Construction {
            context: "device args",
            message: "missing label".to_string(),
        })?;
        let index = parse_label_index(label).ok_or_else(|| RspError::Construction {
            context: "device args",
            message: format!("no device index in label '{}'", label),
        })?;
        Ok(DeviceArgs {
            index,
            rspduo_mode: args.get("rspduo_mode").cloned(),
        })
    }
}

/// Device index from a label such as "SDRplay3 Dev0 RSP1A 1234".
pub fn parse_label_index(label: &str) -> Option<usize> {
    let pos = label.find(LABEL_PREFIX)?;
    let digit = label[pos + LABEL_PREFIX.len()..].chars().next()?;
    digit.to_digit(10).map(|d| d as usize)
}

/// Construction arguments for every attached receiver.
pub fn enumerate(session: &ApiSession) -> Result<Vec<Kwargs>, ApiError> {
    let lease = session.acquire()?;
    let devices = lease.with_api(|api| api.devices())?;
    Ok(devices
        .iter()
        .enumerate()
        .map(|(idx, info)| device_kwargs(idx, info))
        .collect())
}

fn device_kwargs(index: usize, info: &DeviceInfo) -> Kwargs {
    let mut args = Kwargs::new();
    args.insert(
        "label".to_string(),
        format!("{}{} {} {}", LABEL_PREFIX, index, info.hw_ver.name(), info.serial),
    );
    args.insert("serial".to_string(), info.serial.clone());
    if info.hw_ver == HardwareVersion::RspDuo {
        args.insert("rspduo_mode".to_string(), mode::MODE_SINGLE_A.to_string());
    }
    args
}

fn check_api_version(found: f32) -> Result<(), RspError> {
    if found.trunc() != API_VERSION.trunc() {
        return Err(RspError::Construction {
            context: "sdrplay_api_ApiVersion",
            message: format!(
                "api version {:.2} is incompatible with {:.2}",
                found, API_VERSION
            ),
        });
    }
    if (found - API_VERSION).abs() > f32::EPSILON {
        log::warn!(
            "sdrplay_api version {:.3} does not equal build version {:.3}",
            found,
            API_VERSION
        );
    }
    Ok(())
}

enum DriverState {
    Ready,
    /// Released by a mode change and not selected again
    Failed(String),
}

struct Inner {
    handle: DeviceHandle,
    params: ParamStore,
    dispatch: UpdateDispatcher,
    engine: Box<dyn StreamEngine>,
    state: DriverState,
}

impl Inner {
    fn ensure_ready(&self) -> Result<(), RspError> {
        match &self.state {
            DriverState::Ready => Ok(()),
            DriverState::Failed(msg) => Err(RspError::Transition(msg.clone())),
        }
    }

    fn current_antenna(&self) -> Antenna {
        match self.handle.hw_ver {
            HardwareVersion::Rsp1 | HardwareVersion::Rsp1a => Antenna::Rx,
            HardwareVersion::Rsp2 => self.params.channel().rsp2_routing.current(),
            HardwareVersion::RspDuo => self.duo_routing().current(),
        }
    }

    fn duo_routing(&self) -> DuoRouting {
        DuoRouting {
            tuner: self.handle.tuner,
            am_port: self.params.device().duo_tuner1_am_port,
        }
    }

    fn mode_string(&self) -> &'static str {
        mode::mode_to_string(self.handle.tuner, self.handle.duo_mode)
    }
}

/// Handed to [`RspDevice::with_stream`] callers. Everything here is
/// borrowed under the device guard.
pub struct StreamControl<'a> {
    pub engine: &'a mut dyn StreamEngine,
    pub api: &'a mut dyn RspApi,
    pub device: &'a DeviceHandle,
    /// Shadow state to push wholesale at stream start
    pub params: &'a ParamStore,
}

impl StreamControl<'_> {
    pub fn start(self) -> Result<(), ApiError> {
        self.engine.start(self.api, self.device, self.params)
    }

    pub fn stop(self) -> Result<(), ApiError> {
        self.engine.stop(self.api, self.device)
    }
}

/// Serializable view of the whole device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    pub driver: &'static str,
    pub serial: String,
    pub hardware: &'static str,
    pub api_version: f32,
    pub rspduo_mode: &'static str,
    pub antenna: &'static str,
    pub streaming: bool,
    pub failed: Option<String>,
    pub params: ParamStore,
}

/// A selected RSP receiver.
pub struct RspDevice {
    lease: SessionLease,
    api_version: f32,
    inner: Mutex<Inner>,
}

impl RspDevice {
    /// Open the API (or join the open session), select the device named by
    /// `args` and load the documented defaults.
    pub fn new(
        session: &ApiSession,
        args: &Kwargs,
        engine: Box<dyn StreamEngine>,
    ) -> Result<RspDevice, RspError> {
        let args = DeviceArgs::from_kwargs(args)?;
        let lease = session.acquire().map_err(construction("sdrplay_api_Open"))?;

        let devices = lease
            .with_api(|api| api.devices())
            .map_err(construction("sdrplay_api_GetDevices"))?;
        let info = devices.get(args.index).ok_or_else(|| RspError::Construction {
            context: "sdrplay_api_GetDevices",
            message: format!("no device at index {} ({} found)", args.index, devices.len()),
        })?;

        let api_version = lease
            .with_api(|api| api.api_version())
            .map_err(construction("sdrplay_api_ApiVersion"))?;
        check_api_version(api_version)?;

        let mut handle = DeviceHandle::new(info);
        if info.hw_ver == HardwareVersion::RspDuo {
            let requested = args.rspduo_mode.as_deref().unwrap_or(mode::MODE_SINGLE_A);
            let request = ModeRequest::parse(requested);
            handle.tuner = request.tuner;
            handle.duo_mode = mode::resolve_initial(request.mode, info.duo_modes);
        } else {
            handle.tuner = Tuner::A;
            handle.duo_mode = DuoMode::UNKNOWN;
        }
        lease
            .select(&mut handle)
            .map_err(construction("sdrplay_api_SelectDevice"))?;

        let params = ParamStore::new(handle.hw_ver, handle.tuner);
        let inner = Inner {
            handle,
            params,
            dispatch: UpdateDispatcher::new(),
            engine,
            state: DriverState::Ready,
        };
        log::info!(
            "selected {} {} {}",
            inner.handle.hw_ver.name(),
            inner.handle.serial,
            inner.mode_string()
        );

        Ok(RspDevice {
            lease,
            api_version,
            inner: Mutex::new(inner),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Push the flags dirtied by one operation. Vendor errors are logged and
    /// absorbed.
    fn commit(&self, inner: &mut Inner, reasons: ReasonFlags) {
        inner.dispatch.mark(reasons);
        let streaming = inner.engine.is_active();
        let Inner {
            dispatch,
            handle,
            params,
            ..
        } = inner;
        let result = self
            .lease
            .with_api(|api| dispatch.flush(api, handle, handle.tuner, streaming, params));
        if let Err(e) = result {
            log::warn!("update {:?} failed: {}", reasons, e);
        }
    }

    // ---- identification ----

    pub fn driver_key(&self) -> &'static str {
        DRIVER_KEY
    }

    pub fn hardware_key(&self) -> String {
        self.lock().handle.serial.clone()
    }

    pub fn hardware_version(&self) -> HardwareVersion {
        self.lock().handle.hw_ver
    }

    pub fn hardware_info(&self) -> Kwargs {
        let mut info = Kwargs::new();
        info.insert(
            "sdrplay_api_api_version".to_string(),
            format!("{:.6}", self.api_version),
        );
        info.insert(
            "sdrplay_api_hw_version".to_string(),
            self.hardware_version().id().to_string(),
        );
        info
    }

    pub fn num_channels(&self, dir: Direction) -> usize {
        if dir == Direction::Tx {
            return 0;
        }
        let inner = self.lock();
        if inner.handle.hw_ver == HardwareVersion::RspDuo
            && inner.handle.duo_mode == DuoMode::DUAL_TUNER
        {
            2
        } else {
            1
        }
    }

    // ---- antenna ----

    pub fn list_antennas(&self, dir: Direction) -> Vec<&'static str> {
        if dir == Direction::Tx {
            return Vec::new();
        }
        antenna::list_antennas(self.hardware_version()).to_vec()
    }

    pub fn set_antenna(&self, dir: Direction, name: &str) -> Result<(), RspError> {
        let mut inner = self.lock();
        inner.ensure_ready()?;
        if dir == Direction::Tx {
            return Ok(());
        }
        let hw = inner.handle.hw_ver;
        let Some(target) = Antenna::parse(hw, name) else {
            log::debug!("ignoring unknown antenna '{}'", name);
            return Ok(());
        };
        let steps = match hw {
            HardwareVersion::Rsp1 | HardwareVersion::Rsp1a => Vec::new(),
            HardwareVersion::Rsp2 => {
                antenna::sequence_rsp2(inner.params.channel().rsp2_routing, target)
            }
            HardwareVersion::RspDuo => {
                let swap_allowed = inner.handle.duo_mode != DuoMode::DUAL_TUNER;
                antenna::sequence_duo(inner.duo_routing(), target, swap_allowed)
            }
        };
        for step in steps {
            if !self.apply_step(&mut inner, step) {
                break;
            }
        }
        Ok(())
    }

    /// Commit one routing sub-step. Returns false if the sequence must stop.
    fn apply_step(&self, inner: &mut Inner, step: PortStep) -> bool {
        match step {
            PortStep::SwapTuner { tuner, am_port } => {
                let handle = &mut inner.handle;
                let result = self
                    .lease
                    .with_api(|api| api.swap_active_tuner(handle, tuner, am_port));
                if let Err(e) = result {
                    log::error!("tuner swap to {:?} failed: {}", tuner, e);
                    return false;
                }
                inner.handle.tuner = tuner;
                inner.params.apply_port_step(step);
                true
            }
            _ => {
                let reasons = inner.params.apply_port_step(step);
                self.commit(inner, reasons);
                true
            }
        }
    }

    pub fn antenna(&self, dir: Direction) -> String {
        if dir == Direction::Tx {
            return String::new();
        }
        self.lock().current_antenna().name().to_string()
    }

    // ---- frontend corrections ----

    pub fn has_dc_offset_mode(&self, dir: Direction) -> bool {
        dir == Direction::Rx
    }

    pub fn set_dc_offset_mode(&self, dir: Direction, automatic: bool) -> Result<(), RspError> {
        let mut inner = self.lock();
        inner.ensure_ready()?;
        if dir == Direction::Tx {
            return Ok(());
        }
        let reasons = inner.params.set_dc_offset_mode(automatic);
        self.commit(&mut inner, reasons);
        Ok(())
    }

    pub fn dc_offset_mode(&self, _dir: Direction) -> bool {
        self.lock().params.channel().dc_enable
    }

    /// No fixed DC correction value can be programmed.
    pub fn has_dc_offset(&self, _dir: Direction) -> bool {
        false
    }

    // ---- gain ----

    pub fn list_gains(&self, _dir: Direction) -> Vec<&'static str> {
        GAIN_NAMES.to_vec()
    }

    pub fn has_gain_mode(&self, dir: Direction) -> bool {
        dir == Direction::Rx
    }

    pub fn set_gain_mode(&self, dir: Direction, automatic: bool) -> Result<(), RspError> {
        let mut inner = self.lock();
        inner.ensure_ready()?;
        if dir == Direction::Tx {
            return Ok(());
        }
        let reasons = inner.params.set_agc(automatic);
        self.commit(&mut inner, reasons);
        Ok(())
    }

    pub fn gain_mode(&self, _dir: Direction) -> bool {
        self.lock().params.channel().agc.mode != AgcMode::Disabled
    }

    pub fn set_gain(&self, dir: Direction, name: &str, value: f64) -> Result<(), RspError> {
        let mut inner = self.lock();
        inner.ensure_ready()?;
        if dir == Direction::Tx {
            return Ok(());
        }
        let reasons = match GainElement::from_name(name) {
            Some(GainElement::Ifgr) => inner.params.set_gain_reduction(value as i32),
            Some(GainElement::Rfgr) => inner.params.set_lna_state(value as u8),
            None => {
                log::debug!("ignoring unknown gain element '{}'", name);
                ReasonFlags::NONE
            }
        };
        self.commit(&mut inner, reasons);
        Ok(())
    }

    pub fn gain(&self, _dir: Direction, name: &str) -> f64 {
        let inner = self.lock();
        let ch = inner.params.channel();
        match GainElement::from_name(name) {
            Some(GainElement::Ifgr) => f64::from(ch.gr_db),
            Some(GainElement::Rfgr) => f64::from(ch.lna_state),
            None => 0.0,
        }
    }

    /// Range of a gain element; unknown names get the IFGR range.
    pub fn gain_range(&self, _dir: Direction, name: &str) -> (f64, f64) {
        let element = GainElement::from_name(name).unwrap_or(GainElement::Ifgr);
        element.range(self.hardware_version())
    }

    // ---- frequency ----

    pub fn set_frequency(&self, dir: Direction, name: &str, value: f64) -> Result<(), RspError> {
        let mut inner = self.lock();
        inner.ensure_ready()?;
        if dir == Direction::Tx {
            return Ok(());
        }
        let reasons = match name {
            "RF" => inner.params.set_rf(value as u32),
            "CORR" => inner.params.set_ppm(value),
            _ => {
                log::debug!("ignoring unknown frequency component '{}'", name);
                ReasonFlags::NONE
            }
        };
        self.commit(&mut inner, reasons);
        Ok(())
    }

    pub fn frequency(&self, _dir: Direction, name: &str) -> f64 {
        let inner = self.lock();
        match name {
            "RF" => f64::from(inner.params.channel().rf_hz),
            "CORR" => inner.params.device().ppm,
            _ => 0.0,
        }
    }

    pub fn list_frequencies(&self, _dir: Direction) -> Vec<&'static str> {
        FREQUENCY_NAMES.to_vec()
    }

    pub fn frequency_range(&self, _dir: Direction, name: &str) -> Vec<(f64, f64)> {
        if name == "RF" {
            vec![RF_RANGE]
        } else {
            Vec::new()
        }
    }

    // ---- sample rate ----

    /// Program the nearest legal fs/decimation pair for `rate`. The filter
    /// bandwidth is re-derived from the rate as well.
    pub fn set_sample_rate(&self, dir: Direction, rate: f64) -> Result<(), RspError> {
        let mut inner = self.lock();
        inner.ensure_ready()?;
        if dir == Direction::Tx {
            return Ok(());
        }
        let reasons = inner.params.set_sample_rate(rate as u32);
        if !reasons.is_empty() {
            inner.engine.reset_buffers();
        }
        log::debug!(
            "sample rate {} Hz: fs {} Hz, decimation {}",
            rate,
            inner.params.device().fs_hz,
            inner.params.channel().decimation.factor
        );
        self.commit(&mut inner, reasons);
        Ok(())
    }

    /// The rate the client asked for, not the ADC rate.
    pub fn sample_rate(&self, _dir: Direction) -> f64 {
        f64::from(self.lock().params.device().requested_rate)
    }

    pub fn list_sample_rates(&self, _dir: Direction) -> Vec<f64> {
        SAMPLE_RATES.iter().map(|&r| f64::from(r)).collect()
    }

    // ---- bandwidth ----

    pub fn set_bandwidth(&self, dir: Direction, bw: f64) -> Result<(), RspError> {
        let mut inner = self.lock();
        inner.ensure_ready()?;
        if dir == Direction::Tx {
            return Ok(());
        }
        let reasons = inner.params.set_bandwidth(bw);
        self.commit(&mut inner, reasons);
        Ok(())
    }

    pub fn bandwidth(&self, dir: Direction) -> f64 {
        if dir == Direction::Tx {
            return 0.0;
        }
        f64::from(self.lock().params.channel().bandwidth.hz())
    }

    pub fn list_bandwidths(&self, _dir: Direction) -> Vec<f64> {
        BANDWIDTHS.iter().map(|bw| f64::from(bw.hz())).collect()
    }

    pub fn bandwidth_range(&self, dir: Direction) -> Vec<(f64, f64)> {
        self.list_bandwidths(dir)
            .into_iter()
            .map(|bw| (bw, bw))
            .collect()
    }

    // ---- settings ----

    pub fn setting_keys(&self) -> Vec<&'static str> {
        settings::setting_keys(self.hardware_version())
    }

    pub fn write_setting(&self, key: &str, value: &str) -> Result<(), RspError> {
        let mut inner = self.lock();
        inner.ensure_ready()?;
        let hw = inner.handle.hw_ver;
        let setting = match Setting::from_key(key) {
            Some(s) if s.supported(hw) => s,
            _ => {
                log::debug!("ignoring setting '{}' on {}", key, hw.name());
                return Ok(());
            }
        };

        let reasons = match setting {
            Setting::RspDuoMode => return self.change_duo_mode(&mut inner, value),
            #[cfg(feature = "rfgain-setting")]
            Setting::RfGainSel => {
                let reasons = inner.params.set_lna_state(settings::parse_rfgain(value));
                // under AGC the loop owns the LNA state
                if inner.params.channel().agc.mode == AgcMode::Disabled {
                    reasons
                } else {
                    ReasonFlags::NONE
                }
            }
            Setting::IfMode => inner.params.set_if_type(IfType::from_setting(value)),
            Setting::IqCorrection => inner.params.set_iq_correction(settings::parse_bool(value)),
            Setting::AgcSetPoint => match value.trim().parse::<i32>() {
                Ok(dbfs) => inner.params.set_agc_set_point(dbfs),
                Err(_) => {
                    log::debug!("ignoring agc_setpoint '{}'", value);
                    ReasonFlags::NONE
                }
            },
            Setting::ExtRef => inner.params.set_ext_ref(settings::parse_bool(value)),
            Setting::BiasT => inner.params.set_bias_t(settings::parse_bool(value)),
            Setting::RfNotch => inner.params.set_rf_notch(settings::parse_bool(value)),
            Setting::DabNotch => inner.params.set_dab_notch(settings::parse_bool(value)),
        };
        self.commit(&mut inner, reasons);
        Ok(())
    }

    /// Current value of a setting; unknown keys read as empty.
    pub fn read_setting(&self, key: &str) -> String {
        let inner = self.lock();
        let hw = inner.handle.hw_ver;
        let params = &inner.params;
        match Setting::from_key(key) {
            Some(Setting::RspDuoMode) if hw == HardwareVersion::RspDuo => {
                inner.mode_string().to_string()
            }
            Some(Setting::RspDuoMode) | None => String::new(),
            #[cfg(feature = "rfgain-setting")]
            Some(Setting::RfGainSel) => params.channel().lna_state.to_string(),
            Some(Setting::IfMode) => params.channel().if_type.as_str().to_string(),
            Some(Setting::IqCorrection) => {
                settings::format_bool(params.channel().iq_enable).to_string()
            }
            Some(Setting::AgcSetPoint) => params.channel().agc.set_point_dbfs.to_string(),
            Some(Setting::ExtRef) => settings::format_bool(params.ext_ref()).to_string(),
            Some(Setting::BiasT) => settings::format_bool(params.bias_t()).to_string(),
            Some(Setting::RfNotch) => settings::format_bool(params.rf_notch()).to_string(),
            Some(Setting::DabNotch) => settings::format_bool(params.dab_notch()).to_string(),
        }
    }

    /// RSPduo mode string, empty on other receivers.
    pub fn rspduo_mode(&self) -> String {
        self.read_setting("rspduo_mode")
    }

    fn change_duo_mode(&self, inner: &mut Inner, value: &str) -> Result<(), RspError> {
        let request = ModeRequest::parse(value);
        if !request.is_known() {
            log::debug!("ignoring unknown rspduo_mode '{}'", value);
            return Ok(());
        }

        match mode::plan_transition(request, inner.handle.tuner, inner.handle.duo_mode) {
            Transition::None => Ok(()),
            Transition::SwapTuner { tuner } => {
                let am_port = inner.params.device().duo_tuner1_am_port;
                self.apply_step(inner, PortStep::SwapTuner { tuner, am_port });
                Ok(())
            }
            Transition::Reselect { tuner, mode } => {
                log::info!(
                    "RSPduo mode change to '{}', releasing and selecting again",
                    value
                );
                let Inner { engine, handle, .. } = &mut *inner;
                if engine.is_active() {
                    self.lease.with_api(|api| engine.teardown(api, handle));
                }
                if let Err(e) = self.lease.release(handle) {
                    log::warn!("release of {} failed: {}", handle.serial, e);
                }

                handle.tuner = tuner;
                handle.duo_mode = mode;
                inner.dispatch = UpdateDispatcher::new();

                match self.lease.select(&mut inner.handle) {
                    Ok(()) => {
                        // a fresh selection starts from the power-on defaults
                        inner.params = ParamStore::new(inner.handle.hw_ver, tuner);
                        log::info!("RSPduo now in {}", inner.mode_string());
                        Ok(())
                    }
                    Err(e) => {
                        log::error!("select after mode change failed: {}", e);
                        inner.state = DriverState::Failed(e.0.clone());
                        Err(RspError::Transition(e.0))
                    }
                }
            }
        }
    }

    // ---- streaming ----

    /// Run a stream start/stop transition under the device guard.
    pub fn with_stream<R>(
        &self,
        f: impl FnOnce(StreamControl<'_>) -> Result<R, ApiError>,
    ) -> Result<R, RspError> {
        let mut inner = self.lock();
        inner.ensure_ready()?;
        let Inner {
            engine,
            handle,
            params,
            ..
        } = &mut *inner;
        let r = self.lease.with_api(|api| {
            f(StreamControl {
                engine: &mut **engine,
                api,
                device: handle,
                params,
            })
        })?;
        Ok(r)
    }

    pub fn activate_stream(&self) -> Result<(), RspError> {
        self.with_stream(|ctl| ctl.start())
    }

    pub fn deactivate_stream(&self) -> Result<(), RspError> {
        self.with_stream(|ctl| ctl.stop())
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().engine.is_active()
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        let inner = self.lock();
        let (rspduo_mode, failed) = (
            inner.mode_string(),
            match &inner.state {
                DriverState::Ready => None,
                DriverState::Failed(msg) => Some(msg.clone()),
            },
        );
        DeviceSnapshot {
            driver: DRIVER_KEY,
            serial: inner.handle.serial.clone(),
            hardware: inner.handle.hw_ver.name(),
            api_version: self.api_version,
            rspduo_mode,
            antenna: inner.current_antenna().name(),
            streaming: inner.engine.is_active(),
            failed,
            params: inner.params.clone(),
        }
    }
}

impl Drop for RspDevice {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|e| e.into_inner());
        let Inner { engine, handle, .. } = inner;
        if engine.is_active() {
            self.lease.with_api(|api| engine.teardown(api, handle));
        }
        if handle.is_selected() {
            if let Err(e) = self.lease.release(handle) {
                log::warn!("release of {} failed: {}", handle.serial, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{ApiCall, SimApi, SimStream};
    use std::sync::Arc;
    use std::thread;

    fn kwargs(label: &str, mode: Option<&str>) -> Kwargs {
        let mut args = Kwargs::new();
        args.insert("label".to_string(), label.to_string());
        if let Some(m) = mode {
            args.insert("rspduo_mode".to_string(), m.to_string());
        }
        args
    }

    fn open_with(sim: &SimApi, mode: Option<&str>) -> (RspDevice, SimStream) {
        let session = ApiSession::new(Box::new(sim.clone()));
        let stream = SimStream::new();
        let dev = RspDevice::new(
            &session,
            &kwargs("SDRplay3 Dev0", mode),
            Box::new(stream.clone()),
        )
        .unwrap();
        sim.clear_calls();
        (dev, stream)
    }

    fn open(hw: HardwareVersion) -> (RspDevice, SimApi, SimStream) {
        let sim = SimApi::single(hw);
        let (dev, stream) = open_with(&sim, None);
        (dev, sim, stream)
    }

    fn open_duo(mode: &str) -> (RspDevice, SimApi, SimStream) {
        let sim = SimApi::single(HardwareVersion::RspDuo);
        let (dev, stream) = open_with(&sim, Some(mode));
        (dev, sim, stream)
    }

    #[test]
    fn test_construction_selects_with_defaults() {
        let sim = SimApi::single(HardwareVersion::Rsp1a);
        let session = ApiSession::new(Box::new(sim.clone()));
        let dev = RspDevice::new(
            &session,
            &kwargs("SDRplay3 Dev0 RSP1A SIM0001", None),
            Box::new(SimStream::new()),
        )
        .unwrap();

        assert_eq!(
            sim.calls(),
            vec![
                ApiCall::Open,
                ApiCall::Select {
                    serial: "SIM0001".to_string(),
                    tuner: Tuner::A,
                    mode: DuoMode::UNKNOWN
                }
            ]
        );
        assert_eq!(dev.driver_key(), "SDRplay3");
        assert_eq!(dev.hardware_key(), "SIM0001");
        assert_eq!(dev.sample_rate(Direction::Rx), 2_000_000.0);
        assert_eq!(dev.bandwidth(Direction::Rx), 1_536_000.0);
        assert_eq!(dev.frequency(Direction::Rx, "RF"), 100_000_000.0);
        assert_eq!(dev.gain(Direction::Rx, "IFGR"), 40.0);
        assert_eq!(dev.gain(Direction::Rx, "RFGR"), 4.0);
        assert!(dev.gain_mode(Direction::Rx));
        assert!(dev.dc_offset_mode(Direction::Rx));
        assert_eq!(dev.antenna(Direction::Rx), "RX");
        assert_eq!(dev.num_channels(Direction::Rx), 1);
        assert_eq!(dev.num_channels(Direction::Tx), 0);
        assert_eq!(dev.read_setting("agc_setpoint"), "-30");
        assert_eq!(dev.read_setting("if_mode"), "Zero-IF");

        let info = dev.hardware_info();
        assert_eq!(info["sdrplay_api_hw_version"], "255");
        assert_eq!(info["sdrplay_api_api_version"], format!("{:.6}", API_VERSION));
    }

    #[test]
    fn test_construction_failures() {
        let sim = SimApi::single(HardwareVersion::Rsp1a);
        let session = ApiSession::new(Box::new(sim.clone()));

        let err = RspDevice::new(&session, &kwargs("RSP1A", None), Box::new(SimStream::new()));
        assert!(matches!(err, Err(RspError::Construction { .. })));

        let err = RspDevice::new(
            &session,
            &kwargs("SDRplay3 Dev3", None),
            Box::new(SimStream::new()),
        );
        assert!(matches!(err, Err(RspError::Construction { .. })));
        // the failed attempt gave its lease back
        assert!(!sim.is_open());

        sim.fail_next_select("sdrplay_api_HwError");
        match RspDevice::new(
            &session,
            &kwargs("SDRplay3 Dev0", None),
            Box::new(SimStream::new()),
        ) {
            Err(RspError::Construction { context, message }) => {
                assert_eq!(context, "sdrplay_api_SelectDevice");
                assert_eq!(message, "sdrplay_api_HwError");
            }
            _ => panic!("expected a construction failure"),
        }
    }

    #[test]
    fn test_api_version_check() {
        let sim = SimApi::single(HardwareVersion::Rsp1).with_api_version(2.13);
        let session = ApiSession::new(Box::new(sim));
        let err = RspDevice::new(
            &session,
            &kwargs("SDRplay3 Dev0", None),
            Box::new(SimStream::new()),
        );
        assert!(matches!(
            err,
            Err(RspError::Construction {
                context: "sdrplay_api_ApiVersion",
                ..
            })
        ));

        let sim = SimApi::single(HardwareVersion::Rsp1).with_api_version(3.15);
        let session = ApiSession::new(Box::new(sim));
        assert!(RspDevice::new(
            &session,
            &kwargs("SDRplay3 Dev0", None),
            Box::new(SimStream::new())
        )
        .is_ok());
    }

    #[test]
    fn test_label_index() {
        assert_eq!(parse_label_index("SDRplay3 Dev0"), Some(0));
        assert_eq!(parse_label_index("x SDRplay3 Dev7 RSP2 123"), Some(7));
        assert_eq!(parse_label_index("SDRplay3 Dev"), None);
        assert_eq!(parse_label_index("SDRplay3 DevX"), None);
    }

    #[test]
    fn test_identical_writes_are_not_pushed() {
        let (dev, sim, _stream) = open(HardwareVersion::Rsp1a);
        dev.activate_stream().unwrap();
        sim.clear_calls();

        dev.set_frequency(Direction::Rx, "RF", 433_920_000.0).unwrap();
        dev.set_frequency(Direction::Rx, "RF", 433_920_000.0).unwrap();
        dev.set_gain(Direction::Rx, "IFGR", 40.0).unwrap();
        dev.set_bandwidth(Direction::Rx, 1_536_000.0).unwrap();
        dev.write_setting("if_mode", "Zero-IF").unwrap();
        assert_eq!(sim.updates(), vec![(Tuner::A, ReasonFlags::TUNER_FRF)]);
    }

    #[test]
    fn test_if_mode_is_one_update() {
        let (dev, sim, _stream) = open(HardwareVersion::Rsp1a);
        dev.activate_stream().unwrap();
        sim.clear_calls();

        dev.write_setting("if_mode", "450kHz").unwrap();
        assert_eq!(
            sim.updates(),
            vec![(
                Tuner::A,
                ReasonFlags::DEV_FS | ReasonFlags::TUNER_BW_TYPE | ReasonFlags::TUNER_IF_TYPE
            )]
        );
        assert_eq!(dev.read_setting("if_mode"), "450kHz");
        assert_eq!(dev.bandwidth(Direction::Rx), 600_000.0);
    }

    #[test]
    fn test_rate_change_deferred_then_pushed() {
        let (dev, sim, stream) = open(HardwareVersion::Rsp1a);

        dev.set_sample_rate(Direction::Rx, 1_000_000.0).unwrap();
        assert!(sim.updates().is_empty());
        let snap = dev.snapshot();
        assert_eq!(snap.params.device().fs_hz, 2_000_000);
        assert_eq!(snap.params.channel().decimation.factor, 2);
        assert!(snap.params.channel().decimation.enabled);
        assert_eq!(dev.sample_rate(Direction::Rx), 1_000_000.0);
        assert_eq!(stream.reset_count(), 1);

        dev.activate_stream().unwrap();
        assert_eq!(sim.calls(), vec![ApiCall::Init { fs_hz: 2_000_000 }]);

        dev.set_sample_rate(Direction::Rx, 500_000.0).unwrap();
        assert_eq!(
            sim.updates(),
            vec![(Tuner::A, ReasonFlags::DEV_FS | ReasonFlags::CTRL_DECIMATION)]
        );
        assert_eq!(dev.snapshot().params.channel().decimation.factor, 4);
        assert_eq!(stream.reset_count(), 2);

        dev.set_sample_rate(Direction::Rx, 500_000.0).unwrap();
        assert_eq!(sim.updates().len(), 1);
    }

    #[test]
    fn test_rsp2_hiz_to_antenna_a_is_two_updates() {
        let (dev, sim, _stream) = open(HardwareVersion::Rsp2);
        dev.set_antenna(Direction::Rx, "Hi-Z").unwrap();
        assert_eq!(dev.antenna(Direction::Rx), "Hi-Z");
        dev.activate_stream().unwrap();
        sim.clear_calls();

        dev.set_antenna(Direction::Rx, "Antenna A").unwrap();
        assert_eq!(
            sim.updates(),
            vec![
                (Tuner::A, ReasonFlags::RSP2_AM_PORT_SELECT),
                (Tuner::A, ReasonFlags::RSP2_ANTENNA_CONTROL),
            ]
        );
        assert_eq!(dev.antenna(Direction::Rx), "Antenna A");

        sim.clear_calls();
        dev.set_antenna(Direction::Rx, "Antenna B").unwrap();
        assert_eq!(sim.updates(), vec![(Tuner::A, ReasonFlags::RSP2_ANTENNA_CONTROL)]);

        sim.clear_calls();
        dev.set_antenna(Direction::Rx, "Antenna C").unwrap();
        dev.set_antenna(Direction::Tx, "Antenna A").unwrap();
        assert!(sim.calls().is_empty());
        assert_eq!(dev.antenna(Direction::Rx), "Antenna B");
    }

    #[test]
    fn test_duo_hiz_to_tuner2() {
        let (dev, sim, _stream) = open_duo(mode::MODE_SINGLE_A);
        dev.set_antenna(Direction::Rx, "Tuner 1 HiZ").unwrap();
        assert_eq!(dev.antenna(Direction::Rx), "Tuner 1 Hi-Z");
        dev.activate_stream().unwrap();
        sim.clear_calls();

        dev.set_antenna(Direction::Rx, "Tuner 2 50 ohm").unwrap();
        assert_eq!(
            sim.calls(),
            vec![
                ApiCall::Update {
                    tuner: Tuner::A,
                    reasons: ReasonFlags::RSPDUO_AM_PORT_SELECT
                },
                ApiCall::SwapTuner {
                    tuner: Tuner::B,
                    am_port: antenna::DuoAmPort::Port2
                },
            ]
        );
        assert_eq!(dev.antenna(Direction::Rx), "Tuner 2 50 ohm");
        assert_eq!(dev.rspduo_mode(), mode::MODE_SINGLE_B);
    }

    #[test]
    fn test_duo_tuners_keep_their_own_parameters() {
        let (dev, _sim, _stream) = open_duo(mode::MODE_SINGLE_A);
        dev.set_frequency(Direction::Rx, "RF", 7_100_000.0).unwrap();
        dev.write_setting("rspduo_mode", mode::MODE_SINGLE_B).unwrap();
        assert_eq!(dev.frequency(Direction::Rx, "RF"), 100_000_000.0);
        dev.set_antenna(Direction::Rx, "Tuner 1 50 ohm").unwrap();
        assert_eq!(dev.frequency(Direction::Rx, "RF"), 7_100_000.0);
    }

    #[test]
    fn test_dual_tuner_twice_is_noop() {
        let (dev, sim, _stream) = open_duo(mode::MODE_SINGLE_A);

        dev.write_setting("rspduo_mode", mode::MODE_DUAL).unwrap();
        assert_eq!(
            sim.calls(),
            vec![
                ApiCall::Release {
                    serial: "SIM0001".to_string()
                },
                ApiCall::Select {
                    serial: "SIM0001".to_string(),
                    tuner: Tuner::Both,
                    mode: DuoMode::DUAL_TUNER
                },
            ]
        );
        assert_eq!(dev.num_channels(Direction::Rx), 2);
        assert_eq!(dev.rspduo_mode(), mode::MODE_DUAL);

        sim.clear_calls();
        dev.write_setting("rspduo_mode", mode::MODE_DUAL).unwrap();
        assert!(sim.calls().is_empty());

        // no tuner swaps while both tuners run
        dev.set_antenna(Direction::Rx, "Tuner 2 50 ohm").unwrap();
        assert!(sim.calls().is_empty());
    }

    #[test]
    fn test_reselect_restores_defaults() {
        let (dev, _sim, _stream) = open_duo(mode::MODE_SINGLE_A);
        dev.set_frequency(Direction::Rx, "RF", 7_100_000.0).unwrap();
        dev.set_sample_rate(Direction::Rx, 500_000.0).unwrap();
        dev.write_setting("biasT_ctrl", "true").unwrap();
        assert_eq!(dev.snapshot().params.channel().decimation.factor, 4);

        dev.write_setting("rspduo_mode", mode::MODE_DUAL).unwrap();
        assert_eq!(dev.frequency(Direction::Rx, "RF"), 100_000_000.0);
        assert_eq!(dev.sample_rate(Direction::Rx), 2_000_000.0);
        let snap = dev.snapshot();
        assert_eq!(snap.params.device().fs_hz, 2_000_000);
        assert_eq!(snap.params.channel().decimation.factor, 1);
        assert!(!snap.params.channel().decimation.enabled);
        assert_eq!(dev.read_setting("biasT_ctrl"), "false");
    }

    #[test]
    fn test_stream_and_setters_from_two_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RspDevice>();

        let (dev, sim, _stream) = open(HardwareVersion::Rsp1a);
        let dev = Arc::new(dev);

        let streamer = {
            let dev = Arc::clone(&dev);
            thread::spawn(move || {
                for _ in 0..200 {
                    dev.activate_stream().unwrap();
                    dev.deactivate_stream().unwrap();
                }
            })
        };
        let tuner = {
            let dev = Arc::clone(&dev);
            thread::spawn(move || {
                for i in 0..200u32 {
                    let hz = 100_000_000.0 + f64::from(i % 2) * 1_000_000.0;
                    dev.set_frequency(Direction::Rx, "RF", hz).unwrap();
                }
            })
        };
        streamer.join().unwrap();
        tuner.join().unwrap();

        let mut active = false;
        for call in sim.calls() {
            match call {
                ApiCall::Init { .. } => {
                    assert!(!active);
                    active = true;
                }
                ApiCall::Uninit => {
                    assert!(active);
                    active = false;
                }
                ApiCall::Update { .. } => assert!(active),
                _ => {}
            }
        }
        assert!(!active);
        assert!(!dev.is_streaming());
    }

    #[test]
    fn test_mode_change_tears_down_stream_first() {
        let (dev, sim, stream) = open_duo(mode::MODE_SINGLE_A);
        dev.activate_stream().unwrap();
        sim.clear_calls();

        dev.write_setting("rspduo_mode", mode::MODE_MASTER_SLAVE_A).unwrap();
        let calls = sim.calls();
        assert_eq!(calls[0], ApiCall::Uninit);
        assert!(matches!(calls[1], ApiCall::Release { .. }));
        assert!(matches!(
            calls[2],
            ApiCall::Select {
                mode: DuoMode::MASTER,
                ..
            }
        ));
        assert!(!stream.is_active());
        assert!(!dev.is_streaming());
    }

    #[test]
    fn test_reselect_failure_is_fatal() {
        let (dev, sim, _stream) = open_duo(mode::MODE_SINGLE_A);
        sim.fail_next_select("sdrplay_api_ServiceNotResponding");

        let err = dev.write_setting("rspduo_mode", mode::MODE_DUAL);
        assert!(matches!(err, Err(RspError::Transition(ref m)) if m == "sdrplay_api_ServiceNotResponding"));
        assert!(matches!(
            dev.set_frequency(Direction::Rx, "RF", 1e6),
            Err(RspError::Transition(_))
        ));
        assert!(matches!(dev.activate_stream(), Err(RspError::Transition(_))));
        assert!(matches!(
            dev.write_setting("if_mode", "450kHz"),
            Err(RspError::Transition(_))
        ));
        assert_eq!(
            dev.snapshot().failed.as_deref(),
            Some("sdrplay_api_ServiceNotResponding")
        );

        // nothing left to release
        sim.clear_calls();
        drop(dev);
        assert_eq!(sim.calls(), vec![ApiCall::Close]);
    }

    #[test]
    fn test_master_slave_resolution() {
        let (dev, sim, _stream) = open_duo(mode::MODE_MASTER_SLAVE_B);
        assert_eq!(dev.snapshot().rspduo_mode, mode::MODE_MASTER_SLAVE_B);

        // already master, so a Master/Slave request for the other tuner swaps
        dev.write_setting("rspduo_mode", mode::MODE_MASTER_SLAVE_A).unwrap();
        assert_eq!(
            sim.calls(),
            vec![ApiCall::SwapTuner {
                tuner: Tuner::A,
                am_port: antenna::DuoAmPort::Port2
            }]
        );
    }

    #[test]
    fn test_slave_when_master_taken() {
        let info = DeviceInfo {
            serial: "SIM0002".to_string(),
            hw_ver: HardwareVersion::RspDuo,
            duo_modes: DuoMode::SLAVE,
        };
        let sim = SimApi::new(vec![info]);
        let session = ApiSession::new(Box::new(sim.clone()));
        let _dev = RspDevice::new(
            &session,
            &kwargs("SDRplay3 Dev0", Some(mode::MODE_MASTER_SLAVE_A)),
            Box::new(SimStream::new()),
        )
        .unwrap();
        assert!(sim.calls().contains(&ApiCall::Select {
            serial: "SIM0002".to_string(),
            tuner: Tuner::A,
            mode: DuoMode::SLAVE
        }));
    }

    #[test]
    fn test_settings_round_trip_and_ignores() {
        let (dev, sim, _stream) = open(HardwareVersion::RspDuo);
        dev.write_setting("biasT_ctrl", "true").unwrap();
        dev.write_setting("extref_ctrl", "yes").unwrap();
        dev.write_setting("dabnotch_ctrl", "false").unwrap();
        dev.write_setting("agc_setpoint", "-45").unwrap();
        dev.write_setting("agc_setpoint", "loud").unwrap();
        dev.write_setting("no_such_key", "1").unwrap();
        dev.write_setting("rspduo_mode", "Tuner C").unwrap();

        assert_eq!(dev.read_setting("biasT_ctrl"), "true");
        assert_eq!(dev.read_setting("extref_ctrl"), "true");
        assert_eq!(dev.read_setting("dabnotch_ctrl"), "false");
        assert_eq!(dev.read_setting("agc_setpoint"), "-45");
        assert_eq!(dev.read_setting("no_such_key"), "");
        assert_eq!(dev.rspduo_mode(), mode::MODE_SINGLE_A);
        // idle: nothing reaches the hardware
        assert!(sim.calls().is_empty());
    }

    #[test]
    fn test_iq_correction_forces_dc_on() {
        let (dev, _sim, _stream) = open(HardwareVersion::Rsp1);
        dev.set_dc_offset_mode(Direction::Rx, false).unwrap();
        assert!(!dev.dc_offset_mode(Direction::Rx));
        dev.write_setting("iqcorr_ctrl", "false").unwrap();
        assert!(dev.dc_offset_mode(Direction::Rx));
        assert_eq!(dev.read_setting("iqcorr_ctrl"), "false");
        assert_eq!(dev.read_setting("rspduo_mode"), "");
    }

    #[test]
    fn test_gain_api() {
        let (dev, sim, _stream) = open(HardwareVersion::Rsp2);
        assert_eq!(dev.list_gains(Direction::Rx), vec!["IFGR", "RFGR"]);
        assert_eq!(dev.gain_range(Direction::Rx, "RFGR"), (0.0, 8.0));
        assert_eq!(dev.gain_range(Direction::Rx, "IFGR"), (20.0, 59.0));

        dev.activate_stream().unwrap();
        sim.clear_calls();
        dev.set_gain(Direction::Rx, "RFGR", 6.0).unwrap();
        dev.set_gain(Direction::Rx, "VGA", 6.0).unwrap();
        dev.set_gain_mode(Direction::Rx, false).unwrap();
        assert_eq!(
            sim.updates(),
            vec![
                (Tuner::A, ReasonFlags::TUNER_GR),
                (Tuner::A, ReasonFlags::CTRL_AGC)
            ]
        );
        assert_eq!(dev.gain(Direction::Rx, "RFGR"), 6.0);
        assert!(!dev.gain_mode(Direction::Rx));
    }

    #[test]
    fn test_update_errors_are_absorbed() {
        let (dev, sim, _stream) = open(HardwareVersion::Rsp1a);
        dev.activate_stream().unwrap();
        sim.fail_updates(Some("sdrplay_api_HwError"));
        assert!(dev.set_frequency(Direction::Rx, "RF", 915e6).is_ok());
        assert_eq!(dev.frequency(Direction::Rx, "RF"), 915e6);
    }

    #[test]
    fn test_ranges_and_lists() {
        let (dev, _sim, _stream) = open(HardwareVersion::Rsp1);
        assert_eq!(dev.list_frequencies(Direction::Rx), vec!["RF", "CORR"]);
        assert_eq!(dev.frequency_range(Direction::Rx, "RF"), vec![RF_RANGE]);
        assert!(dev.frequency_range(Direction::Rx, "CORR").is_empty());
        assert_eq!(dev.list_sample_rates(Direction::Rx).len(), 13);
        assert_eq!(dev.list_bandwidths(Direction::Rx)[3], 1_536_000.0);
        assert_eq!(dev.bandwidth_range(Direction::Rx)[0], (200_000.0, 200_000.0));
        assert_eq!(dev.list_antennas(Direction::Rx), vec!["RX"]);
        assert!(dev.has_gain_mode(Direction::Rx));
        assert!(!dev.has_gain_mode(Direction::Tx));
        assert!(dev.has_dc_offset_mode(Direction::Rx));
        assert!(!dev.has_dc_offset(Direction::Rx));
        assert!(dev.list_antennas(Direction::Tx).is_empty());
        assert_eq!(dev.setting_keys(), settings::setting_keys(HardwareVersion::Rsp1));
    }

    #[test]
    fn test_drop_stops_stream_and_releases() {
        let (dev, sim, _stream) = open(HardwareVersion::Rsp2);
        dev.activate_stream().unwrap();
        sim.clear_calls();
        drop(dev);
        assert_eq!(
            sim.calls(),
            vec![
                ApiCall::Uninit,
                ApiCall::Release {
                    serial: "SIM0001".to_string()
                },
                ApiCall::Close,
            ]
        );
    }

    #[test]
    fn test_enumerate() {
        let sim = SimApi::new(vec![
            SimApi::device_info(HardwareVersion::Rsp1a, "A1"),
            SimApi::device_info(HardwareVersion::RspDuo, "D1"),
        ]);
        let session = ApiSession::new(Box::new(sim));
        let found = enumerate(&session).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[1]["label"], "SDRplay3 Dev1 RSPduo D1");
        assert_eq!(found[1]["rspduo_mode"], mode::MODE_SINGLE_A);
        assert_eq!(parse_label_index(&found[1]["label"]), Some(1));
        assert_eq!(session.lease_count(), 0);
    }
}
