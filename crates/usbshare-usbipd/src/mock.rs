//! In-memory [`DeviceBackend`] for tests.
//!
//! Records every call and answers from configurable results. Enabled in
//! downstream crates with the `mock` feature.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use usbshare_core::{BackendFailure, BackendResult, DriverStatus};

use crate::backend::DeviceBackend;

/// A recorded backend invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    List,
    Bind(String),
    Unbind(String),
    Attach { host: String, device_id: String },
    Detach(String),
    DriverStatus,
}

#[derive(Debug)]
struct MockState {
    list: Result<String, BackendFailure>,
    bind: BackendResult,
    unbind: BackendResult,
    attach_default: BackendResult,
    attach_by_device: HashMap<String, BackendResult>,
    detach: BackendResult,
    driver: DriverStatus,
    calls: Vec<MockCall>,
}

/// Scriptable backend. All operations succeed until told otherwise.
#[derive(Debug)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                list: Ok(String::new()),
                bind: BackendResult::ok(),
                unbind: BackendResult::ok(),
                attach_default: BackendResult::ok(),
                attach_by_device: HashMap::new(),
                detach: BackendResult::ok(),
                driver: DriverStatus::reachable(),
                calls: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the raw `list` output returned on success.
    pub fn set_list_output(&self, output: impl Into<String>) {
        self.state().list = Ok(output.into());
    }

    pub fn fail_list(&self, failure: BackendFailure) {
        self.state().list = Err(failure);
    }

    pub fn set_bind_result(&self, result: BackendResult) {
        self.state().bind = result;
    }

    pub fn set_unbind_result(&self, result: BackendResult) {
        self.state().unbind = result;
    }

    /// Result for attach calls on devices without a specific override.
    pub fn set_attach_result(&self, result: BackendResult) {
        self.state().attach_default = result;
    }

    pub fn set_attach_result_for(&self, device_id: impl Into<String>, result: BackendResult) {
        self.state().attach_by_device.insert(device_id.into(), result);
    }

    pub fn set_detach_result(&self, result: BackendResult) {
        self.state().detach = result;
    }

    pub fn set_driver_status(&self, status: DriverStatus) {
        self.state().driver = status;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    /// Number of attach calls made for `device_id`.
    pub fn attach_count(&self, device_id: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, MockCall::Attach { device_id: id, .. } if id == device_id))
            .count()
    }

    fn record(&self, call: MockCall) -> MutexGuard<'_, MockState> {
        let mut state = self.state();
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl DeviceBackend for MockBackend {
    async fn list_raw(&self, _cancel: &CancellationToken) -> Result<String, BackendFailure> {
        self.record(MockCall::List).list.clone()
    }

    async fn bind(&self, device_id: &str, _cancel: &CancellationToken) -> BackendResult {
        self.record(MockCall::Bind(device_id.to_string())).bind.clone()
    }

    async fn unbind(&self, device_id: &str, _cancel: &CancellationToken) -> BackendResult {
        self.record(MockCall::Unbind(device_id.to_string()))
            .unbind
            .clone()
    }

    async fn attach(
        &self,
        host_address: &str,
        device_id: &str,
        _cancel: &CancellationToken,
    ) -> BackendResult {
        let state = self.record(MockCall::Attach {
            host: host_address.to_string(),
            device_id: device_id.to_string(),
        });
        state
            .attach_by_device
            .get(device_id)
            .unwrap_or(&state.attach_default)
            .clone()
    }

    async fn detach(&self, device_id: &str, _cancel: &CancellationToken) -> BackendResult {
        self.record(MockCall::Detach(device_id.to_string()))
            .detach
            .clone()
    }

    async fn driver_status(&self, _cancel: &CancellationToken) -> DriverStatus {
        self.record(MockCall::DriverStatus).driver.clone()
    }
}
