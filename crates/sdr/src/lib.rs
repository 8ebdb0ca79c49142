//! Control plane for SDRplay RSP receivers (RSP1, RSP1A, RSP2, RSPduo).
//!
//! Keeps a shadow copy of the receiver parameters and pushes changes
//! through the vendor API, immediately while streaming and at the next
//! stream start otherwise.

pub mod antenna;
pub mod api;
pub mod device;
pub mod dispatch;
pub mod mode;
pub mod params;
pub mod planner;
pub mod reason;
pub mod session;
pub mod settings;
pub mod sim;

pub use api::{ApiError, DeviceHandle, DeviceInfo, HardwareVersion, RspApi, StreamEngine};
pub use device::{DeviceArgs, DeviceSnapshot, Kwargs, RspDevice, RspError, StreamControl};
pub use mode::{DuoMode, Tuner};
pub use params::ParamStore;
pub use reason::ReasonFlags;
pub use session::ApiSession;

/// Stream direction. RSP receivers have no transmit path, so every
/// operation on `Tx` is ignored or reports nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}
