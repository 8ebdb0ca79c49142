// Copyright 2025-2026 CEMAXECUTER LLC

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Vendor "reason for update" bitmask.
///
/// Each bit names one register group the vendor `update` call commits from
/// the shadow state. Values match `sdrplay_api_ReasonForUpdateT`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReasonFlags(u32);

impl ReasonFlags {
    pub const NONE: Self = Self(0);
    pub const DEV_FS: Self = Self(0x0000_0001);
    pub const DEV_PPM: Self = Self(0x0000_0002);
    pub const DEV_SYNC_UPDATE: Self = Self(0x0000_0004);
    pub const DEV_RESET_FLAGS: Self = Self(0x0000_0008);
    pub const RSP1A_BIAS_T_CONTROL: Self = Self(0x0000_0010);
    pub const RSP1A_RF_NOTCH_CONTROL: Self = Self(0x0000_0020);
    pub const RSP1A_RF_DAB_NOTCH_CONTROL: Self = Self(0x0000_0040);
    pub const RSP2_BIAS_T_CONTROL: Self = Self(0x0000_0080);
    pub const RSP2_AM_PORT_SELECT: Self = Self(0x0000_0100);
    pub const RSP2_ANTENNA_CONTROL: Self = Self(0x0000_0200);
    pub const RSP2_RF_NOTCH_CONTROL: Self = Self(0x0000_0400);
    pub const RSP2_EXT_REF_CONTROL: Self = Self(0x0000_0800);
    pub const RSPDUO_EXT_REF_CONTROL: Self = Self(0x0000_1000);
    pub const TUNER_GR: Self = Self(0x0000_8000);
    pub const TUNER_GR_LIMITS: Self = Self(0x0001_0000);
    pub const TUNER_FRF: Self = Self(0x0002_0000);
    pub const TUNER_BW_TYPE: Self = Self(0x0004_0000);
    pub const TUNER_IF_TYPE: Self = Self(0x0008_0000);
    pub const TUNER_DC_OFFSET: Self = Self(0x0010_0000);
    pub const TUNER_LO_MODE: Self = Self(0x0020_0000);
    pub const CTRL_DC_OFFSET_IQ_IMBALANCE: Self = Self(0x0040_0000);
    pub const CTRL_DECIMATION: Self = Self(0x0080_0000);
    pub const CTRL_AGC: Self = Self(0x0100_0000);
    pub const CTRL_ADSB_MODE: Self = Self(0x0200_0000);
    pub const CTRL_OVERLOAD_MSG_ACK: Self = Self(0x0400_0000);
    pub const RSPDUO_BIAS_T_CONTROL: Self = Self(0x0800_0000);
    pub const RSPDUO_AM_PORT_SELECT: Self = Self(0x1000_0000);
    pub const RSPDUO_TUNER1_AM_NOTCH_CONTROL: Self = Self(0x2000_0000);
    pub const RSPDUO_RF_NOTCH_CONTROL: Self = Self(0x4000_0000);
    pub const RSPDUO_RF_DAB_NOTCH_CONTROL: Self = Self(0x8000_0000);

    const NAMES: [(Self, &'static str); 31] = [
        (Self::DEV_FS, "Dev_Fs"),
        (Self::DEV_PPM, "Dev_Ppm"),
        (Self::DEV_SYNC_UPDATE, "Dev_SyncUpdate"),
        (Self::DEV_RESET_FLAGS, "Dev_ResetFlags"),
        (Self::RSP1A_BIAS_T_CONTROL, "Rsp1a_BiasTControl"),
        (Self::RSP1A_RF_NOTCH_CONTROL, "Rsp1a_RfNotchControl"),
        (Self::RSP1A_RF_DAB_NOTCH_CONTROL, "Rsp1a_RfDabNotchControl"),
        (Self::RSP2_BIAS_T_CONTROL, "Rsp2_BiasTControl"),
        (Self::RSP2_AM_PORT_SELECT, "Rsp2_AmPortSelect"),
        (Self::RSP2_ANTENNA_CONTROL, "Rsp2_AntennaControl"),
        (Self::RSP2_RF_NOTCH_CONTROL, "Rsp2_RfNotchControl"),
        (Self::RSP2_EXT_REF_CONTROL, "Rsp2_ExtRefControl"),
        (Self::RSPDUO_EXT_REF_CONTROL, "RspDuo_ExtRefControl"),
        (Self::TUNER_GR, "Tuner_Gr"),
        (Self::TUNER_GR_LIMITS, "Tuner_GrLimits"),
        (Self::TUNER_FRF, "Tuner_Frf"),
        (Self::TUNER_BW_TYPE, "Tuner_BwType"),
        (Self::TUNER_IF_TYPE, "Tuner_IfType"),
        (Self::TUNER_DC_OFFSET, "Tuner_DcOffset"),
        (Self::TUNER_LO_MODE, "Tuner_LoMode"),
        (Self::CTRL_DC_OFFSET_IQ_IMBALANCE, "Ctrl_DCoffsetIQimbalance"),
        (Self::CTRL_DECIMATION, "Ctrl_Decimation"),
        (Self::CTRL_AGC, "Ctrl_Agc"),
        (Self::CTRL_ADSB_MODE, "Ctrl_AdsbMode"),
        (Self::CTRL_OVERLOAD_MSG_ACK, "Ctrl_OverloadMsgAck"),
        (Self::RSPDUO_BIAS_T_CONTROL, "RspDuo_BiasTControl"),
        (Self::RSPDUO_AM_PORT_SELECT, "RspDuo_AmPortSelect"),
        (Self::RSPDUO_TUNER1_AM_NOTCH_CONTROL, "RspDuo_Tuner1AmNotchControl"),
        (Self::RSPDUO_RF_NOTCH_CONTROL, "RspDuo_RfNotchControl"),
        (Self::RSPDUO_RF_DAB_NOTCH_CONTROL, "RspDuo_RfDabNotchControl"),
        (Self::NONE, "None"),
    ];

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Return the accumulated flags and leave `self` empty.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

impl BitOr for ReasonFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ReasonFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ReasonFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "ReasonFlags(None)");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| !flag.is_empty() && self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "ReasonFlags({})", names.join("|"))
    }
}
