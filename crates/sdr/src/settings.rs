// Copyright 2025-2026 CEMAXECUTER LLC

//! Setting keys and gain element names.

use crate::api::HardwareVersion;
use crate::params::{max_lna_state, IF_GR_RANGE};

/// A device setting reachable through `write_setting` / `read_setting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    RspDuoMode,
    #[cfg(feature = "rfgain-setting")]
    RfGainSel,
    IfMode,
    IqCorrection,
    AgcSetPoint,
    ExtRef,
    BiasT,
    RfNotch,
    DabNotch,
}

const SETTINGS: &[(&str, Setting)] = &[
    ("rspduo_mode", Setting::RspDuoMode),
    #[cfg(feature = "rfgain-setting")]
    ("rfgain_sel", Setting::RfGainSel),
    ("if_mode", Setting::IfMode),
    ("iqcorr_ctrl", Setting::IqCorrection),
    ("agc_setpoint", Setting::AgcSetPoint),
    ("extref_ctrl", Setting::ExtRef),
    ("biasT_ctrl", Setting::BiasT),
    ("rfnotch_ctrl", Setting::RfNotch),
    ("dabnotch_ctrl", Setting::DabNotch),
];

impl Setting {
    pub fn from_key(key: &str) -> Option<Setting> {
        SETTINGS.iter().find(|(k, _)| *k == key).map(|(_, s)| *s)
    }

    /// Whether `hw` has the hardware this setting controls.
    pub fn supported(self, hw: HardwareVersion) -> bool {
        use HardwareVersion::*;
        match self {
            Setting::RspDuoMode => hw == RspDuo,
            #[cfg(feature = "rfgain-setting")]
            Setting::RfGainSel => true,
            Setting::IfMode | Setting::IqCorrection | Setting::AgcSetPoint => true,
            Setting::ExtRef => matches!(hw, Rsp2 | RspDuo),
            Setting::BiasT | Setting::RfNotch => matches!(hw, Rsp1a | Rsp2 | RspDuo),
            Setting::DabNotch => matches!(hw, Rsp1a | RspDuo),
        }
    }
}

/// Setting keys valid for `hw`, in display order.
pub fn setting_keys(hw: HardwareVersion) -> Vec<&'static str> {
    SETTINGS
        .iter()
        .filter(|(_, s)| s.supported(hw))
        .map(|(k, _)| *k)
        .collect()
}

/// Boolean setting values: "false" is off, anything else is on.
pub fn parse_bool(value: &str) -> bool {
    value != "false"
}

pub fn format_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// `rfgain_sel` values: "0" through "8" select that LNA state, anything
/// else selects 9.
#[cfg(feature = "rfgain-setting")]
pub fn parse_rfgain(value: &str) -> u8 {
    match value.parse::<u8>() {
        Ok(n) if n <= 8 && value.len() == 1 => n,
        _ => 9,
    }
}

/// Named gain stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainElement {
    /// IF gain reduction in dB
    Ifgr,
    /// RF gain reduction as an LNA state index
    Rfgr,
}

pub const GAIN_NAMES: [&str; 2] = ["IFGR", "RFGR"];

impl GainElement {
    pub fn from_name(name: &str) -> Option<GainElement> {
        match name {
            "IFGR" => Some(GainElement::Ifgr),
            "RFGR" => Some(GainElement::Rfgr),
            _ => None,
        }
    }

    /// Inclusive (min, max) for this stage on `hw`.
    pub fn range(self, hw: HardwareVersion) -> (f64, f64) {
        match self {
            GainElement::Ifgr => (f64::from(IF_GR_RANGE.0), f64::from(IF_GR_RANGE.1)),
            GainElement::Rfgr => (0.0, f64::from(max_lna_state(hw))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_per_hardware() {
        let rsp1 = setting_keys(HardwareVersion::Rsp1);
        assert!(rsp1.contains(&"if_mode"));
        assert!(rsp1.contains(&"agc_setpoint"));
        assert!(!rsp1.contains(&"biasT_ctrl"));
        assert!(!rsp1.contains(&"rspduo_mode"));

        let duo = setting_keys(HardwareVersion::RspDuo);
        assert_eq!(duo[0], "rspduo_mode");
        assert!(duo.contains(&"extref_ctrl"));
        assert!(duo.contains(&"dabnotch_ctrl"));

        let rsp2 = setting_keys(HardwareVersion::Rsp2);
        assert!(rsp2.contains(&"rfnotch_ctrl"));
        assert!(!rsp2.contains(&"dabnotch_ctrl"));

        let rsp1a = setting_keys(HardwareVersion::Rsp1a);
        assert!(!rsp1a.contains(&"extref_ctrl"));
    }

    #[test]
    fn test_key_lookup() {
        assert_eq!(Setting::from_key("biasT_ctrl"), Some(Setting::BiasT));
        assert_eq!(Setting::from_key("biast_ctrl"), None);
    }

    #[test]
    fn test_bool_values() {
        assert!(!parse_bool("false"));
        assert!(parse_bool("true"));
        assert!(parse_bool("0"));
        assert_eq!(format_bool(false), "false");
    }

    #[test]
    fn test_gain_ranges() {
        assert_eq!(GainElement::Ifgr.range(HardwareVersion::Rsp2), (20.0, 59.0));
        assert_eq!(GainElement::Rfgr.range(HardwareVersion::Rsp1), (0.0, 3.0));
        assert_eq!(GainElement::Rfgr.range(HardwareVersion::Rsp2), (0.0, 8.0));
        assert_eq!(GainElement::Rfgr.range(HardwareVersion::RspDuo), (0.0, 9.0));
        assert_eq!(GainElement::Rfgr.range(HardwareVersion::Rsp1a), (0.0, 9.0));
        assert_eq!(GainElement::from_name("LNA"), None);
    }

    #[cfg(feature = "rfgain-setting")]
    #[test]
    fn test_rfgain_values() {
        assert_eq!(parse_rfgain("0"), 0);
        assert_eq!(parse_rfgain("8"), 8);
        assert_eq!(parse_rfgain("9"), 9);
        assert_eq!(parse_rfgain("x"), 9);
        assert_eq!(Setting::from_key("rfgain_sel"), Some(Setting::RfGainSel));
    }
}
