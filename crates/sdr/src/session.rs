// Copyright 2025-2026 CEMAXECUTER LLC

//! Process-wide vendor API session.
//!
//! The vendor library is opened once per process no matter how many device
//! objects exist. `ApiSession` owns the API handle; each device holds a
//! `SessionLease`, and the API is closed when the last lease drops.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::api::{ApiError, DeviceHandle, RspApi};

struct SessionState {
    api: Box<dyn RspApi>,
    leases: usize,
    /// Serial of the device currently selected through this session
    selected: Option<String>,
}

/// Shared owner of the vendor API handle.
#[derive(Clone)]
pub struct ApiSession {
    state: Arc<Mutex<SessionState>>,
}

impl ApiSession {
    pub fn new(api: Box<dyn RspApi>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                api,
                leases: 0,
                selected: None,
            })),
        }
    }

    /// Take a lease, opening the API if this is the first one.
    pub fn acquire(&self) -> Result<SessionLease, ApiError> {
        let mut st = lock(&self.state);
        if st.leases == 0 {
            st.api.open()?;
            log::debug!("sdrplay api opened");
        }
        st.leases += 1;
        Ok(SessionLease {
            state: self.state.clone(),
        })
    }

    pub fn lease_count(&self) -> usize {
        lock(&self.state).leases
    }

    pub fn selected(&self) -> Option<String> {
        lock(&self.state).selected.clone()
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// One device's claim on the open API.
pub struct SessionLease {
    state: Arc<Mutex<SessionState>>,
}

impl SessionLease {
    /// Run `f` against the API with the session lock held.
    pub fn with_api<R>(&self, f: impl FnOnce(&mut dyn RspApi) -> R) -> R {
        let mut st = lock(&self.state);
        f(&mut *st.api)
    }

    pub fn select(&self, device: &mut DeviceHandle) -> Result<(), ApiError> {
        let mut st = lock(&self.state);
        st.api.select_device(device)?;
        st.selected = Some(device.serial.clone());
        Ok(())
    }

    pub fn release(&self, device: &mut DeviceHandle) -> Result<(), ApiError> {
        let mut st = lock(&self.state);
        if st.selected.as_deref() == Some(device.serial.as_str()) {
            st.selected = None;
        }
        st.api.release_device(device)
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let mut st = lock(&self.state);
        st.leases = st.leases.saturating_sub(1);
        if st.leases == 0 {
            st.api.close();
            st.selected = None;
            log::debug!("sdrplay api closed");
        }
    }
}
