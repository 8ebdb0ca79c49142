// Copyright 2025-2026 CEMAXECUTER LLC

//! Sample-rate, decimation and IF filter planning.
//!
//! The RSP ADC only runs at a handful of base rates. Lower output rates are
//! reached by the on-chip decimator, which must be programmed together with
//! the sample-rate register. Everything here is a pure function of the
//! requested rate and the IF mode.

use serde::Serialize;

/// Tuner IF mode (`sdrplay_api_If_kHzT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IfType {
    Zero,
    If450,
    If1620,
    If2048,
}

impl IfType {
    pub const ALL: [IfType; 4] = [IfType::Zero, IfType::If450, IfType::If1620, IfType::If2048];

    /// Setting string used by the `if_mode` key.
    pub fn as_str(self) -> &'static str {
        match self {
            IfType::Zero => "Zero-IF",
            IfType::If450 => "450kHz",
            IfType::If1620 => "1620kHz",
            IfType::If2048 => "2048kHz",
        }
    }

    /// Parse an `if_mode` value. Unknown strings select Zero-IF.
    pub fn from_setting(value: &str) -> IfType {
        match value {
            "450kHz" => IfType::If450,
            "1620kHz" => IfType::If1620,
            "2048kHz" => IfType::If2048,
            _ => IfType::Zero,
        }
    }
}

/// Tuner IF filter bandwidth (`sdrplay_api_Bw_MHzT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Bandwidth {
    Bw200k,
    Bw300k,
    Bw600k,
    Bw1536k,
    Bw5M,
    Bw6M,
    Bw7M,
    Bw8M,
}

/// Every filter bandwidth, narrowest first.
pub const BANDWIDTHS: [Bandwidth; 8] = [
    Bandwidth::Bw200k,
    Bandwidth::Bw300k,
    Bandwidth::Bw600k,
    Bandwidth::Bw1536k,
    Bandwidth::Bw5M,
    Bandwidth::Bw6M,
    Bandwidth::Bw7M,
    Bandwidth::Bw8M,
];

/// Output sample rates advertised to clients.
pub const SAMPLE_RATES: [u32; 13] = [
    250_000, 500_000, 1_000_000, 2_000_000, 2_048_000, 3_000_000, 4_000_000, 5_000_000,
    6_000_000, 7_000_000, 8_000_000, 9_000_000, 10_000_000,
];

impl Bandwidth {
    pub fn hz(self) -> u32 {
        match self {
            Bandwidth::Bw200k => 200_000,
            Bandwidth::Bw300k => 300_000,
            Bandwidth::Bw600k => 600_000,
            Bandwidth::Bw1536k => 1_536_000,
            Bandwidth::Bw5M => 5_000_000,
            Bandwidth::Bw6M => 6_000_000,
            Bandwidth::Bw7M => 7_000_000,
            Bandwidth::Bw8M => 8_000_000,
        }
    }

    /// Exact lookup by bandwidth in Hz. Values that are not a filter
    /// setting fall back to 200 kHz, as the vendor driver does.
    pub fn from_hz(hz: f64) -> Bandwidth {
        BANDWIDTHS
            .iter()
            .copied()
            .find(|bw| f64::from(bw.hz()) == hz)
            .unwrap_or(Bandwidth::Bw200k)
    }
}

/// Hardware programming that realizes a requested output rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePlan {
    /// ADC sample rate written to the fs register
    pub hw_rate: u32,
    /// Decimation factor (1, 2, 4 or 8)
    pub factor: u32,
    pub decimate: bool,
}

impl RatePlan {
    const fn decimated(hw_rate: u32, factor: u32) -> Self {
        Self {
            hw_rate,
            factor,
            decimate: true,
        }
    }

    const fn identity(rate: u32) -> Self {
        Self {
            hw_rate: rate,
            factor: 1,
            decimate: false,
        }
    }
}

/// Map a requested output rate onto an ADC rate and decimation setting.
///
/// Never fails: a rate the IF mode cannot produce is passed through
/// undecimated and a warning is logged.
pub fn plan(requested: u32, if_type: IfType) -> RatePlan {
    match if_type {
        IfType::Zero => match requested {
            200_000..=499_999 => RatePlan::decimated(2_000_000, 8),
            500_000..=999_999 => RatePlan::decimated(2_000_000, 4),
            1_000_000..=1_999_999 => RatePlan::decimated(2_000_000, 2),
            _ => RatePlan::identity(requested),
        },
        IfType::If450 => match requested {
            1_000_000 => RatePlan::decimated(2_000_000, 2),
            500_000 => RatePlan::decimated(2_000_000, 4),
            _ => unsupported(requested, if_type),
        },
        IfType::If2048 => match requested {
            2_048_000 => RatePlan::decimated(8_192_000, 4),
            _ => unsupported(requested, if_type),
        },
        IfType::If1620 => unsupported(requested, if_type),
    }
}

fn unsupported(requested: u32, if_type: IfType) -> RatePlan {
    log::warn!(
        "sample rate {} Hz is not supported with {} IF, programming it undecimated",
        requested,
        if_type.as_str()
    );
    RatePlan::identity(requested)
}

/// Narrowest IF filter that passes `rate`, using the band edges of the IF mode.
pub fn bandwidth_for(rate: f64, if_type: IfType) -> Bandwidth {
    match if_type {
        IfType::Zero => {
            if rate < 300_000.0 {
                Bandwidth::Bw200k
            } else if rate < 600_000.0 {
                Bandwidth::Bw300k
            } else if rate < 1_536_000.0 {
                Bandwidth::Bw600k
            } else if rate < 5_000_000.0 {
                Bandwidth::Bw1536k
            } else if rate < 6_000_000.0 {
                Bandwidth::Bw5M
            } else if rate < 7_000_000.0 {
                Bandwidth::Bw6M
            } else if rate < 8_000_000.0 {
                Bandwidth::Bw7M
            } else {
                Bandwidth::Bw8M
            }
        }
        IfType::If450 | IfType::If1620 => {
            if rate < 500_000.0 {
                Bandwidth::Bw200k
            } else if rate < 1_000_000.0 {
                Bandwidth::Bw300k
            } else {
                Bandwidth::Bw600k
            }
        }
        IfType::If2048 => {
            if rate < 500_000.0 {
                Bandwidth::Bw200k
            } else if rate < 1_000_000.0 {
                Bandwidth::Bw300k
            } else if rate < 1_536_000.0 {
                Bandwidth::Bw600k
            } else {
                Bandwidth::Bw1536k
            }
        }
    }
}
