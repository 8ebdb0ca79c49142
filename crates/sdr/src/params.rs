// Copyright 2025-2026 CEMAXECUTER LLC

//! Shadow copy of the receiver registers.
//!
//! Every setter compares against the shadow value first and returns the
//! reason flags for the register groups it actually changed. An identical
//! write returns `ReasonFlags::NONE` and nothing is pushed.

use serde::Serialize;

use crate::antenna::{DuoAmPort, PortStep, Rsp2AmPort, Rsp2Antenna, Rsp2Routing};
use crate::api::HardwareVersion;
use crate::mode::Tuner;
use crate::planner::{self, Bandwidth, IfType};
use crate::reason::ReasonFlags;

pub const DEFAULT_SAMPLE_RATE: u32 = 2_000_000;
pub const DEFAULT_RF_HZ: u32 = 100_000_000;
pub const DEFAULT_GR_DB: i32 = 40;
pub const DEFAULT_AGC_SET_POINT: i32 = -30;

/// IF gain reduction limits in dB.
pub const IF_GR_RANGE: (i32, i32) = (20, 59);
/// AGC set point limits in dBfs.
pub const AGC_SET_POINT_RANGE: (i32, i32) = (-60, 0);

/// AGC loop bandwidth (`sdrplay_api_AgcControlT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AgcMode {
    Disabled,
    Hz100,
    Hz50,
    Hz5,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgcParams {
    pub mode: AgcMode,
    pub set_point_dbfs: i32,
    pub knee_dbfs: i32,
    pub decay_ms: u16,
    pub hang_ms: u16,
    pub sync_update: bool,
    /// Mirror of the tuner LNA state the AGC starts from
    pub lna_state: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decimation {
    pub factor: u32,
    pub enabled: bool,
    pub wide_band_signal: bool,
}

/// Per-tuner parameters. Tuner A and tuner B each own one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelParams {
    pub rf_hz: u32,
    pub if_type: IfType,
    pub bandwidth: Bandwidth,
    pub gr_db: i32,
    pub lna_state: u8,
    pub agc: AgcParams,
    pub dc_enable: bool,
    pub iq_enable: bool,
    pub decimation: Decimation,
    pub rsp1a_bias_t: bool,
    pub rsp2_routing: Rsp2Routing,
    pub rsp2_bias_t: bool,
    pub rsp2_rf_notch: bool,
    pub duo_bias_t: bool,
    pub duo_rf_notch: bool,
    pub duo_dab_notch: bool,
    pub duo_am_notch: bool,
}

impl ChannelParams {
    fn new(hw: HardwareVersion) -> Self {
        let lna_state = default_lna_state(hw);
        Self {
            rf_hz: DEFAULT_RF_HZ,
            if_type: IfType::Zero,
            bandwidth: Bandwidth::Bw1536k,
            gr_db: DEFAULT_GR_DB,
            lna_state,
            agc: AgcParams {
                mode: AgcMode::Hz100,
                set_point_dbfs: DEFAULT_AGC_SET_POINT,
                knee_dbfs: 0,
                decay_ms: 0,
                hang_ms: 0,
                sync_update: false,
                lna_state,
            },
            dc_enable: true,
            iq_enable: true,
            decimation: Decimation {
                factor: 1,
                enabled: false,
                wide_band_signal: false,
            },
            rsp1a_bias_t: false,
            rsp2_routing: Rsp2Routing {
                antenna: Rsp2Antenna::A,
                am_port: Rsp2AmPort::Port2,
            },
            rsp2_bias_t: false,
            rsp2_rf_notch: false,
            duo_bias_t: false,
            duo_rf_notch: false,
            duo_dab_notch: false,
            duo_am_notch: false,
        }
    }
}

/// Device-wide parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceParams {
    /// ADC sample rate programmed into the fs register
    pub fs_hz: u32,
    /// Output rate the client asked for
    pub requested_rate: u32,
    pub ppm: f64,
    pub rsp2_ext_ref: bool,
    pub duo_ext_ref: bool,
    pub rsp1a_rf_notch: bool,
    pub rsp1a_dab_notch: bool,
    pub duo_tuner1_am_port: DuoAmPort,
}

/// Starting LNA state: mid-scale on the parts with a 10-step LNA.
pub fn default_lna_state(hw: HardwareVersion) -> u8 {
    match hw {
        HardwareVersion::Rsp2 | HardwareVersion::RspDuo | HardwareVersion::Rsp1a => 4,
        HardwareVersion::Rsp1 => 1,
    }
}

/// Highest LNA state for each receiver.
pub fn max_lna_state(hw: HardwareVersion) -> u8 {
    match hw {
        HardwareVersion::Rsp1 => 3,
        HardwareVersion::Rsp2 => 8,
        HardwareVersion::RspDuo | HardwareVersion::Rsp1a => 9,
    }
}

/// The full shadow state of one selected receiver.
#[derive(Debug, Clone, Serialize)]
pub struct ParamStore {
    hw: HardwareVersion,
    tuner: Tuner,
    device: DeviceParams,
    channels: [ChannelParams; 2],
}

impl ParamStore {
    /// Documented power-on defaults for `hw`, with `tuner` active.
    pub fn new(hw: HardwareVersion, tuner: Tuner) -> Self {
        Self {
            hw,
            tuner,
            device: DeviceParams {
                fs_hz: DEFAULT_SAMPLE_RATE,
                requested_rate: DEFAULT_SAMPLE_RATE,
                ppm: 0.0,
                rsp2_ext_ref: false,
                duo_ext_ref: false,
                rsp1a_rf_notch: false,
                rsp1a_dab_notch: false,
                duo_tuner1_am_port: DuoAmPort::Port2,
            },
            channels: [ChannelParams::new(hw), ChannelParams::new(hw)],
        }
    }

    pub fn device(&self) -> &DeviceParams {
        &self.device
    }

    fn active_index(&self) -> usize {
        match self.tuner {
            Tuner::B => 1,
            _ => 0,
        }
    }

    /// Parameters of the active tuner.
    pub fn channel(&self) -> &ChannelParams {
        &self.channels[self.active_index()]
    }

    fn channel_mut(&mut self) -> &mut ChannelParams {
        let idx = self.active_index();
        &mut self.channels[idx]
    }

    pub fn set_rf(&mut self, hz: u32) -> ReasonFlags {
        let ch = self.channel_mut();
        if ch.rf_hz == hz {
            return ReasonFlags::NONE;
        }
        ch.rf_hz = hz;
        ReasonFlags::TUNER_FRF
    }

    pub fn set_ppm(&mut self, ppm: f64) -> ReasonFlags {
        if self.device.ppm == ppm {
            return ReasonFlags::NONE;
        }
        self.device.ppm = ppm;
        ReasonFlags::DEV_PPM
    }

    /// Record a requested output rate and program fs and decimation for it.
    ///
    /// The IF filter follows the rate in the shadow only; the hardware
    /// picks it up with the next bandwidth commit or stream start.
    pub fn set_sample_rate(&mut self, requested: u32) -> ReasonFlags {
        self.device.requested_rate = requested;
        let if_type = self.channel().if_type;
        let plan = planner::plan(requested, if_type);
        self.channel_mut().bandwidth = planner::bandwidth_for(f64::from(requested), if_type);

        let current = self.channel().decimation;
        if plan.hw_rate == self.device.fs_hz
            && plan.factor == current.factor
            && plan.decimate == current.enabled
        {
            return ReasonFlags::NONE;
        }

        self.device.fs_hz = plan.hw_rate;
        self.channel_mut().decimation = Decimation {
            factor: plan.factor,
            enabled: plan.decimate,
            wide_band_signal: if_type == IfType::Zero,
        };
        ReasonFlags::DEV_FS | ReasonFlags::CTRL_DECIMATION
    }

    /// Change the IF mode and re-plan rate, decimation and filter for the
    /// current requested rate.
    pub fn set_if_type(&mut self, if_type: IfType) -> ReasonFlags {
        if self.channel().if_type == if_type {
            return ReasonFlags::NONE;
        }
        let requested = self.device.requested_rate;
        let plan = planner::plan(requested, if_type);
        let decimation = Decimation {
            factor: plan.factor,
            enabled: plan.decimate,
            wide_band_signal: if_type == IfType::Zero,
        };

        self.device.fs_hz = plan.hw_rate;
        let ch = self.channel_mut();
        ch.if_type = if_type;
        ch.bandwidth = planner::bandwidth_for(f64::from(requested), if_type);

        let mut reasons =
            ReasonFlags::DEV_FS | ReasonFlags::TUNER_BW_TYPE | ReasonFlags::TUNER_IF_TYPE;
        if ch.decimation.factor != decimation.factor || ch.decimation.enabled != decimation.enabled
        {
            reasons |= ReasonFlags::CTRL_DECIMATION;
        }
        ch.decimation = decimation;
        reasons
    }

    pub fn set_bandwidth(&mut self, hz: f64) -> ReasonFlags {
        let bw = Bandwidth::from_hz(hz);
        let ch = self.channel_mut();
        if ch.bandwidth == bw {
            return ReasonFlags::NONE;
        }
        ch.bandwidth = bw;
        ReasonFlags::TUNER_BW_TYPE
    }

    pub fn set_gain_reduction(&mut self, gr_db: i32) -> ReasonFlags {
        let gr_db = gr_db.clamp(IF_GR_RANGE.0, IF_GR_RANGE.1);
        let ch = self.channel_mut();
        if ch.gr_db == gr_db {
            return ReasonFlags::NONE;
        }
        ch.gr_db = gr_db;
        ReasonFlags::TUNER_GR
    }

    pub fn set_lna_state(&mut self, state: u8) -> ReasonFlags {
        let state = state.min(max_lna_state(self.hw));
        let ch = self.channel_mut();
        if ch.lna_state == state {
            return ReasonFlags::NONE;
        }
        ch.lna_state = state;
        ch.agc.lna_state = state;
        ReasonFlags::TUNER_GR
    }

    pub fn set_agc(&mut self, automatic: bool) -> ReasonFlags {
        let mode = if automatic { AgcMode::Hz100 } else { AgcMode::Disabled };
        let ch = self.channel_mut();
        if ch.agc.mode == mode {
            return ReasonFlags::NONE;
        }
        ch.agc.mode = mode;
        ReasonFlags::CTRL_AGC
    }

    pub fn set_agc_set_point(&mut self, dbfs: i32) -> ReasonFlags {
        let dbfs = dbfs.clamp(AGC_SET_POINT_RANGE.0, AGC_SET_POINT_RANGE.1);
        let ch = self.channel_mut();
        if ch.agc.set_point_dbfs == dbfs {
            return ReasonFlags::NONE;
        }
        ch.agc.set_point_dbfs = dbfs;
        ReasonFlags::CTRL_AGC
    }

    /// Automatic DC and IQ correction together.
    pub fn set_dc_offset_mode(&mut self, automatic: bool) -> ReasonFlags {
        let ch = self.channel_mut();
        if ch.dc_enable == automatic && ch.iq_enable == automatic {
            return ReasonFlags::NONE;
        }
        ch.dc_enable = automatic;
        ch.iq_enable = automatic;
        ReasonFlags::CTRL_DC_OFFSET_IQ_IMBALANCE
    }

    /// IQ correction on its own; DC correction is forced on.
    pub fn set_iq_correction(&mut self, enabled: bool) -> ReasonFlags {
        let ch = self.channel_mut();
        if ch.iq_enable == enabled && ch.dc_enable {
            return ReasonFlags::NONE;
        }
        ch.iq_enable = enabled;
        ch.dc_enable = true;
        ReasonFlags::CTRL_DC_OFFSET_IQ_IMBALANCE
    }

    pub fn set_ext_ref(&mut self, on: bool) -> ReasonFlags {
        let (field, reason) = match self.hw {
            HardwareVersion::Rsp2 => (&mut self.device.rsp2_ext_ref, ReasonFlags::RSP2_EXT_REF_CONTROL),
            HardwareVersion::RspDuo => (&mut self.device.duo_ext_ref, ReasonFlags::RSPDUO_EXT_REF_CONTROL),
            _ => return ReasonFlags::NONE,
        };
        write_flag(field, on, reason)
    }

    pub fn ext_ref(&self) -> bool {
        match self.hw {
            HardwareVersion::Rsp2 => self.device.rsp2_ext_ref,
            HardwareVersion::RspDuo => self.device.duo_ext_ref,
            _ => false,
        }
    }

    pub fn set_bias_t(&mut self, on: bool) -> ReasonFlags {
        let hw = self.hw;
        let ch = self.channel_mut();
        let (field, reason) = match hw {
            HardwareVersion::Rsp1a => (&mut ch.rsp1a_bias_t, ReasonFlags::RSP1A_BIAS_T_CONTROL),
            HardwareVersion::Rsp2 => (&mut ch.rsp2_bias_t, ReasonFlags::RSP2_BIAS_T_CONTROL),
            HardwareVersion::RspDuo => (&mut ch.duo_bias_t, ReasonFlags::RSPDUO_BIAS_T_CONTROL),
            HardwareVersion::Rsp1 => return ReasonFlags::NONE,
        };
        write_flag(field, on, reason)
    }

    pub fn bias_t(&self) -> bool {
        let ch = self.channel();
        match self.hw {
            HardwareVersion::Rsp1a => ch.rsp1a_bias_t,
            HardwareVersion::Rsp2 => ch.rsp2_bias_t,
            HardwareVersion::RspDuo => ch.duo_bias_t,
            HardwareVersion::Rsp1 => false,
        }
    }

    /// RF notch. On the RSPduo the notch in front of the Hi-Z port is a
    /// separate AM notch, chosen by the tuner 1 port routing.
    pub fn set_rf_notch(&mut self, on: bool) -> ReasonFlags {
        match self.hw {
            HardwareVersion::Rsp2 => {
                let ch = self.channel_mut();
                write_flag(&mut ch.rsp2_rf_notch, on, ReasonFlags::RSP2_RF_NOTCH_CONTROL)
            }
            HardwareVersion::Rsp1a => write_flag(
                &mut self.device.rsp1a_rf_notch,
                on,
                ReasonFlags::RSP1A_RF_NOTCH_CONTROL,
            ),
            HardwareVersion::RspDuo => {
                let hiz = self.duo_hiz_active();
                let port = self.device.duo_tuner1_am_port;
                let ch = self.channel_mut();
                if hiz {
                    write_flag(&mut ch.duo_am_notch, on, ReasonFlags::RSPDUO_TUNER1_AM_NOTCH_CONTROL)
                } else if port == DuoAmPort::Port2 {
                    write_flag(&mut ch.duo_rf_notch, on, ReasonFlags::RSPDUO_RF_NOTCH_CONTROL)
                } else {
                    ReasonFlags::NONE
                }
            }
            HardwareVersion::Rsp1 => ReasonFlags::NONE,
        }
    }

    pub fn rf_notch(&self) -> bool {
        let ch = self.channel();
        match self.hw {
            HardwareVersion::Rsp2 => ch.rsp2_rf_notch,
            HardwareVersion::Rsp1a => self.device.rsp1a_rf_notch,
            HardwareVersion::RspDuo => {
                if self.duo_hiz_active() {
                    ch.duo_am_notch
                } else if self.device.duo_tuner1_am_port == DuoAmPort::Port2 {
                    ch.duo_rf_notch
                } else {
                    false
                }
            }
            HardwareVersion::Rsp1 => false,
        }
    }

    pub fn set_dab_notch(&mut self, on: bool) -> ReasonFlags {
        match self.hw {
            HardwareVersion::RspDuo => {
                let ch = self.channel_mut();
                write_flag(&mut ch.duo_dab_notch, on, ReasonFlags::RSPDUO_RF_DAB_NOTCH_CONTROL)
            }
            HardwareVersion::Rsp1a => write_flag(
                &mut self.device.rsp1a_dab_notch,
                on,
                ReasonFlags::RSP1A_RF_DAB_NOTCH_CONTROL,
            ),
            _ => ReasonFlags::NONE,
        }
    }

    pub fn dab_notch(&self) -> bool {
        match self.hw {
            HardwareVersion::RspDuo => self.channel().duo_dab_notch,
            HardwareVersion::Rsp1a => self.device.rsp1a_dab_notch,
            _ => false,
        }
    }

    fn duo_hiz_active(&self) -> bool {
        self.tuner == Tuner::A && self.device.duo_tuner1_am_port == DuoAmPort::Port1
    }

    /// Write the register named by one routing sub-step.
    pub fn apply_port_step(&mut self, step: PortStep) -> ReasonFlags {
        match step {
            PortStep::Rsp2AmPort(port) => {
                let routing = &mut self.channel_mut().rsp2_routing;
                if routing.am_port == port {
                    return ReasonFlags::NONE;
                }
                routing.am_port = port;
            }
            PortStep::Rsp2Antenna(antenna) => {
                // written even when unchanged: leaving Hi-Z re-asserts it
                self.channel_mut().rsp2_routing.antenna = antenna;
            }
            PortStep::DuoAmPort(port) => {
                if self.device.duo_tuner1_am_port == port {
                    return ReasonFlags::NONE;
                }
                self.device.duo_tuner1_am_port = port;
            }
            PortStep::SwapTuner { tuner, am_port } => {
                self.tuner = tuner;
                self.device.duo_tuner1_am_port = am_port;
            }
        }
        step.reason()
    }
}

fn write_flag(field: &mut bool, on: bool, reason: ReasonFlags) -> ReasonFlags {
    if *field == on {
        return ReasonFlags::NONE;
    }
    *field = on;
    reason
}
