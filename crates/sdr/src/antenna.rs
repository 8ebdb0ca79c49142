// Copyright 2025-2026 CEMAXECUTER LLC

//! Antenna and port routing.
//!
//! On the RSP2 and RSPduo the visible "antenna" is encoded by two
//! correlated selectors, and some raw combinations are not valid routing
//! states. A change is therefore broken into ordered sub-steps, each of
//! which is committed on its own.

use serde::Serialize;

use crate::api::HardwareVersion;
use crate::mode::Tuner;
use crate::reason::ReasonFlags;

/// RSP2 antenna selector (`sdrplay_api_Rsp2_AntennaSelectT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rsp2Antenna {
    A,
    B,
}

/// RSP2 AM port selector: port 1 is the Hi-Z input, port 2 the 50 ohm path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Rsp2AmPort {
    Port1,
    Port2,
}

/// RSPduo tuner 1 AM port selector: port 1 is Hi-Z, port 2 is 50 ohm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DuoAmPort {
    Port1,
    Port2,
}

/// A named antenna choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Antenna {
    /// The single input of the RSP1 and RSP1A
    Rx,
    Rsp2A,
    Rsp2B,
    Rsp2HiZ,
    DuoTuner1,
    DuoTuner2,
    DuoTuner1HiZ,
}

impl Antenna {
    /// Parse an antenna name for the given hardware.
    pub fn parse(hw: HardwareVersion, name: &str) -> Option<Antenna> {
        match (hw, name) {
            (HardwareVersion::Rsp1 | HardwareVersion::Rsp1a, "RX") => Some(Antenna::Rx),
            (HardwareVersion::Rsp2, "Antenna A") => Some(Antenna::Rsp2A),
            (HardwareVersion::Rsp2, "Antenna B") => Some(Antenna::Rsp2B),
            (HardwareVersion::Rsp2, "Hi-Z") => Some(Antenna::Rsp2HiZ),
            (HardwareVersion::RspDuo, "Tuner 1 50 ohm") => Some(Antenna::DuoTuner1),
            (HardwareVersion::RspDuo, "Tuner 2 50 ohm") => Some(Antenna::DuoTuner2),
            (HardwareVersion::RspDuo, "Tuner 1 Hi-Z" | "Tuner 1 HiZ") => {
                Some(Antenna::DuoTuner1HiZ)
            }
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Antenna::Rx => "RX",
            Antenna::Rsp2A => "Antenna A",
            Antenna::Rsp2B => "Antenna B",
            Antenna::Rsp2HiZ => "Hi-Z",
            Antenna::DuoTuner1 => "Tuner 1 50 ohm",
            Antenna::DuoTuner2 => "Tuner 2 50 ohm",
            Antenna::DuoTuner1HiZ => "Tuner 1 Hi-Z",
        }
    }
}

/// Antenna names offered by a receiver.
pub fn list_antennas(hw: HardwareVersion) -> &'static [&'static str] {
    match hw {
        HardwareVersion::Rsp1 | HardwareVersion::Rsp1a => &["RX"],
        HardwareVersion::Rsp2 => &["Antenna A", "Antenna B", "Hi-Z"],
        HardwareVersion::RspDuo => &["Tuner 1 50 ohm", "Tuner 2 50 ohm", "Tuner 1 Hi-Z"],
    }
}

/// RSP2 routing as held in the shadow state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rsp2Routing {
    pub antenna: Rsp2Antenna,
    pub am_port: Rsp2AmPort,
}

impl Rsp2Routing {
    pub fn current(&self) -> Antenna {
        match (self.am_port, self.antenna) {
            (Rsp2AmPort::Port1, _) => Antenna::Rsp2HiZ,
            (Rsp2AmPort::Port2, Rsp2Antenna::A) => Antenna::Rsp2A,
            (Rsp2AmPort::Port2, Rsp2Antenna::B) => Antenna::Rsp2B,
        }
    }
}

/// RSPduo routing: active tuner plus the tuner 1 AM port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuoRouting {
    pub tuner: Tuner,
    pub am_port: DuoAmPort,
}

impl DuoRouting {
    pub fn current(&self) -> Antenna {
        if self.am_port == DuoAmPort::Port1 {
            Antenna::DuoTuner1HiZ
        } else if self.tuner == Tuner::B {
            Antenna::DuoTuner2
        } else {
            Antenna::DuoTuner1
        }
    }
}

/// One hardware sub-step of a routing change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortStep {
    Rsp2AmPort(Rsp2AmPort),
    Rsp2Antenna(Rsp2Antenna),
    DuoAmPort(DuoAmPort),
    /// Vendor tuner swap; carries the tuner 1 port to use afterwards
    SwapTuner { tuner: Tuner, am_port: DuoAmPort },
}

impl PortStep {
    /// Register group committed by this step. Tuner swaps are a separate
    /// vendor call and carry no reason flag.
    pub fn reason(self) -> ReasonFlags {
        match self {
            PortStep::Rsp2AmPort(_) => ReasonFlags::RSP2_AM_PORT_SELECT,
            PortStep::Rsp2Antenna(_) => ReasonFlags::RSP2_ANTENNA_CONTROL,
            PortStep::DuoAmPort(_) => ReasonFlags::RSPDUO_AM_PORT_SELECT,
            PortStep::SwapTuner { .. } => ReasonFlags::NONE,
        }
    }
}

/// Order the RSP2 sub-steps that reach `target`.
///
/// Leaving Hi-Z moves the AM port back to the 50 ohm path before the
/// antenna bit is written, so both bits never change in one commit.
pub fn sequence_rsp2(current: Rsp2Routing, target: Antenna) -> Vec<PortStep> {
    let antenna = match target {
        Antenna::Rsp2HiZ => {
            if current.am_port == Rsp2AmPort::Port1 {
                return Vec::new();
            }
            return vec![PortStep::Rsp2AmPort(Rsp2AmPort::Port1)];
        }
        Antenna::Rsp2A => Rsp2Antenna::A,
        Antenna::Rsp2B => Rsp2Antenna::B,
        _ => return Vec::new(),
    };

    if current.am_port == Rsp2AmPort::Port1 {
        vec![
            PortStep::Rsp2AmPort(Rsp2AmPort::Port2),
            PortStep::Rsp2Antenna(antenna),
        ]
    } else if current.antenna != antenna {
        vec![PortStep::Rsp2Antenna(antenna)]
    } else {
        Vec::new()
    }
}

/// Order the RSPduo sub-steps that reach `target`.
///
/// `swap_allowed` is false in dual-tuner mode, where both tuners already
/// run and a request for the other tuner is ignored.
pub fn sequence_duo(current: DuoRouting, target: Antenna, swap_allowed: bool) -> Vec<PortStep> {
    let (tuner, am_port) = match target {
        Antenna::DuoTuner1 => (Tuner::A, DuoAmPort::Port2),
        Antenna::DuoTuner2 => (Tuner::B, DuoAmPort::Port2),
        Antenna::DuoTuner1HiZ => (Tuner::A, DuoAmPort::Port1),
        _ => return Vec::new(),
    };

    if tuner == current.tuner || current.tuner == Tuner::Both {
        if current.am_port == am_port {
            return Vec::new();
        }
        return vec![PortStep::DuoAmPort(am_port)];
    }

    if !swap_allowed {
        log::debug!("ignoring antenna {} outside single-tuner operation", target.name());
        return Vec::new();
    }

    if current.am_port == DuoAmPort::Port1 && am_port == DuoAmPort::Port2 {
        vec![
            PortStep::DuoAmPort(DuoAmPort::Port2),
            PortStep::SwapTuner { tuner, am_port },
        ]
    } else {
        vec![PortStep::SwapTuner { tuner, am_port }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rsp2(antenna: Rsp2Antenna, am_port: Rsp2AmPort) -> Rsp2Routing {
        Rsp2Routing { antenna, am_port }
    }

    #[test]
    fn test_rsp2_hiz_to_antenna_is_two_steps() {
        let steps = sequence_rsp2(rsp2(Rsp2Antenna::A, Rsp2AmPort::Port1), Antenna::Rsp2A);
        assert_eq!(
            steps,
            vec![
                PortStep::Rsp2AmPort(Rsp2AmPort::Port2),
                PortStep::Rsp2Antenna(Rsp2Antenna::A),
            ]
        );
        assert_eq!(steps[0].reason(), ReasonFlags::RSP2_AM_PORT_SELECT);
        assert_eq!(steps[1].reason(), ReasonFlags::RSP2_ANTENNA_CONTROL);
    }

    #[test]
    fn test_rsp2_single_steps() {
        let a = rsp2(Rsp2Antenna::A, Rsp2AmPort::Port2);
        assert_eq!(
            sequence_rsp2(a, Antenna::Rsp2B),
            vec![PortStep::Rsp2Antenna(Rsp2Antenna::B)]
        );
        assert_eq!(
            sequence_rsp2(a, Antenna::Rsp2HiZ),
            vec![PortStep::Rsp2AmPort(Rsp2AmPort::Port1)]
        );
        assert!(sequence_rsp2(a, Antenna::Rsp2A).is_empty());
        assert!(sequence_rsp2(rsp2(Rsp2Antenna::B, Rsp2AmPort::Port1), Antenna::Rsp2HiZ).is_empty());
    }

    #[test]
    fn test_duo_leaving_hiz_for_tuner2() {
        let hiz = DuoRouting {
            tuner: Tuner::A,
            am_port: DuoAmPort::Port1,
        };
        assert_eq!(hiz.current(), Antenna::DuoTuner1HiZ);
        assert_eq!(
            sequence_duo(hiz, Antenna::DuoTuner2, true),
            vec![
                PortStep::DuoAmPort(DuoAmPort::Port2),
                PortStep::SwapTuner {
                    tuner: Tuner::B,
                    am_port: DuoAmPort::Port2
                },
            ]
        );
        assert_eq!(
            sequence_duo(hiz, Antenna::DuoTuner1, true),
            vec![PortStep::DuoAmPort(DuoAmPort::Port2)]
        );
    }

    #[test]
    fn test_duo_swaps() {
        let t2 = DuoRouting {
            tuner: Tuner::B,
            am_port: DuoAmPort::Port2,
        };
        assert_eq!(
            sequence_duo(t2, Antenna::DuoTuner1HiZ, true),
            vec![PortStep::SwapTuner {
                tuner: Tuner::A,
                am_port: DuoAmPort::Port1
            }]
        );
        assert_eq!(
            sequence_duo(t2, Antenna::DuoTuner1, true),
            vec![PortStep::SwapTuner {
                tuner: Tuner::A,
                am_port: DuoAmPort::Port2
            }]
        );
        assert!(sequence_duo(t2, Antenna::DuoTuner2, true).is_empty());
        assert!(sequence_duo(t2, Antenna::DuoTuner1, false).is_empty());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(Antenna::parse(HardwareVersion::Rsp2, "Hi-Z"), Some(Antenna::Rsp2HiZ));
        assert_eq!(
            Antenna::parse(HardwareVersion::RspDuo, "Tuner 1 HiZ"),
            Some(Antenna::DuoTuner1HiZ)
        );
        assert_eq!(Antenna::parse(HardwareVersion::Rsp2, "Tuner 1 50 ohm"), None);
        for hw in [HardwareVersion::Rsp1a, HardwareVersion::Rsp2, HardwareVersion::RspDuo] {
            for name in list_antennas(hw) {
                let antenna = Antenna::parse(hw, name).unwrap();
                assert_eq!(antenna.name(), *name);
            }
        }
    }
}
