// Copyright 2025-2026 CEMAXECUTER LLC

//! RSPduo tuner selection and operating-mode negotiation.
//!
//! The RSPduo can run one tuner, both tuners in one process, or be shared
//! between two processes as master and slave. Switching the active tuner
//! within a mode is a register-level swap; changing the mode itself means
//! releasing the device and selecting it again.

use std::fmt;
use std::ops::BitOr;

use serde::Serialize;

/// Active tuner selector (`sdrplay_api_TunerSelectT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tuner {
    Neither,
    A,
    B,
    Both,
}

/// RSPduo operating mode bitmask (`sdrplay_api_RspDuoModeT`).
///
/// Enumeration reports the modes still available as a mask, and a request
/// for "Master/Slave" carries both bits until it is resolved.
#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DuoMode(u8);

impl DuoMode {
    pub const UNKNOWN: Self = Self(0);
    pub const SINGLE_TUNER: Self = Self(1);
    pub const DUAL_TUNER: Self = Self(2);
    pub const MASTER: Self = Self(4);
    pub const SLAVE: Self = Self(8);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// True when exactly one mode bit is set.
    pub const fn is_resolved(self) -> bool {
        self.0.count_ones() == 1
    }
}

impl BitOr for DuoMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for DuoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.intersects(Self::SINGLE_TUNER) {
            parts.push("SingleTuner");
        }
        if self.intersects(Self::DUAL_TUNER) {
            parts.push("DualTuner");
        }
        if self.intersects(Self::MASTER) {
            parts.push("Master");
        }
        if self.intersects(Self::SLAVE) {
            parts.push("Slave");
        }
        if parts.is_empty() {
            parts.push("Unknown");
        }
        write!(f, "DuoMode({})", parts.join("|"))
    }
}

/// A parsed `rspduo_mode` value: the tuner to run and the mode mask asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeRequest {
    pub tuner: Tuner,
    pub mode: DuoMode,
}

pub const MODE_SINGLE_A: &str = "Tuner A (Single Tuner)";
pub const MODE_MASTER_SLAVE_A: &str = "Tuner A (Master/Slave)";
pub const MODE_SINGLE_B: &str = "Tuner B (Single Tuner)";
pub const MODE_MASTER_SLAVE_B: &str = "Tuner B (Master/Slave)";
pub const MODE_DUAL: &str = "Dual Tuner";

/// Every accepted `rspduo_mode` string.
pub const MODE_STRINGS: [&str; 5] = [
    MODE_SINGLE_A,
    MODE_MASTER_SLAVE_A,
    MODE_SINGLE_B,
    MODE_MASTER_SLAVE_B,
    MODE_DUAL,
];

impl ModeRequest {
    /// Parse a mode string. Unrecognized strings yield `Neither`/`UNKNOWN`.
    pub fn parse(value: &str) -> ModeRequest {
        let (tuner, mode) = match value {
            MODE_SINGLE_A => (Tuner::A, DuoMode::SINGLE_TUNER),
            MODE_SINGLE_B => (Tuner::B, DuoMode::SINGLE_TUNER),
            MODE_MASTER_SLAVE_A => (Tuner::A, DuoMode::MASTER | DuoMode::SLAVE),
            MODE_MASTER_SLAVE_B => (Tuner::B, DuoMode::MASTER | DuoMode::SLAVE),
            MODE_DUAL => (Tuner::Both, DuoMode::DUAL_TUNER),
            _ => (Tuner::Neither, DuoMode::UNKNOWN),
        };
        ModeRequest { tuner, mode }
    }

    /// True if this parsed from a known mode string.
    pub fn is_known(&self) -> bool {
        self.mode != DuoMode::UNKNOWN
    }
}

/// Mode string for a resolved tuner/mode pair; empty when there is none.
pub fn mode_to_string(tuner: Tuner, mode: DuoMode) -> &'static str {
    match mode {
        DuoMode::SINGLE_TUNER => match tuner {
            Tuner::A => MODE_SINGLE_A,
            Tuner::B => MODE_SINGLE_B,
            _ => "",
        },
        DuoMode::DUAL_TUNER => MODE_DUAL,
        DuoMode::MASTER | DuoMode::SLAVE => match tuner {
            Tuner::A => MODE_MASTER_SLAVE_A,
            Tuner::B => MODE_MASTER_SLAVE_B,
            _ => "",
        },
        _ => "",
    }
}

/// Resolve the mode requested at device selection time.
///
/// `available` is the mask reported by enumeration. A Master/Slave request
/// becomes master when the master role is free, otherwise slave.
pub fn resolve_initial(requested: DuoMode, available: DuoMode) -> DuoMode {
    if requested.intersects(DuoMode::MASTER) && available.intersects(DuoMode::MASTER) {
        DuoMode::MASTER
    } else if requested.intersects(DuoMode::SLAVE) {
        DuoMode::SLAVE
    } else {
        requested
    }
}

/// Resolve a mode-change request against the currently negotiated mode.
///
/// Keeps the current master or slave role when the request allows it, and
/// otherwise prefers master.
pub fn resolve(requested: DuoMode, current: DuoMode) -> DuoMode {
    if requested.intersects(DuoMode::MASTER) && current.intersects(DuoMode::MASTER) {
        DuoMode::MASTER
    } else if requested.intersects(DuoMode::SLAVE) && current.intersects(DuoMode::SLAVE) {
        DuoMode::SLAVE
    } else if requested.intersects(DuoMode::MASTER) {
        DuoMode::MASTER
    } else {
        requested
    }
}

/// What a mode-change request costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to do.
    None,
    /// Same mode, different tuner: swap the active tuner in place.
    SwapTuner { tuner: Tuner },
    /// Different mode: release the device and select it again.
    Reselect { tuner: Tuner, mode: DuoMode },
}

/// Decide how to move from the current tuner/mode to a request.
pub fn plan_transition(request: ModeRequest, current_tuner: Tuner, current_mode: DuoMode) -> Transition {
    let mode = resolve(request.mode, current_mode);
    if mode != current_mode {
        Transition::Reselect {
            tuner: request.tuner,
            mode,
        }
    } else if request.tuner != current_tuner {
        Transition::SwapTuner {
            tuner: request.tuner,
        }
    } else {
        Transition::None
    }
}
