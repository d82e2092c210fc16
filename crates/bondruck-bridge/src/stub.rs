// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scriptable in-memory provider for desktop/CI builds and engine tests.
//
// Unlike a pure no-op stub, this provider models just enough behavior to
// exercise the whole engine: attached wired devices with real endpoint
// layouts, a bonded/discoverable wireless set, a permission script, and a
// per-device write log so tests can assert the exact byte protocol.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use bondruck_core::error::{BondruckError, Result};
use bondruck_core::types::{
    CapabilitySet, DeviceDescriptor, PermissionState, RequestToken, TransportKind,
};

use crate::traits::*;

/// What the scripted permission authority answers for one capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionScript {
    /// Already granted; `check` returns `Granted` without prompting.
    Granted,
    /// Already denied; `check` returns `Denied`.
    Denied,
    /// `check` returns `Unknown`; the prompt must be resolved by the test
    /// through the engine's permission gate.
    Prompt,
}

/// Counters exposed to tests for asserting which platform calls happened.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallCounters {
    pub wired_enumerations: usize,
    pub wireless_enumerations: usize,
    pub wireless_connects: usize,
    pub scans_started: usize,
    pub scans_cancelled: usize,
}

#[derive(Default)]
struct StubState {
    wired_available: bool,
    wired_devices: Vec<WiredDevice>,
    wired_open_error: Option<String>,

    adapter_enabled: bool,
    bonded: Vec<DeviceDescriptor>,
    discoverable: Vec<DeviceDescriptor>,
    primary_connect_fails: bool,
    all_connects_fail: bool,
    pair_started: bool,
    pair_requests: Vec<String>,

    permissions: HashMap<String, PermissionScript>,
    requested: Vec<(CapabilitySet, RequestToken)>,

    /// Writes succeed while this counts down; `Some(0)` fails the next write.
    writes_before_failure: Option<usize>,

    counters: CallCounters,
    wired_claims: Vec<(String, u8, u8)>,
    connect_attempts: Vec<(String, ServiceChannel)>,
    writes: HashMap<String, Vec<Vec<u8>>>,
    flushes: HashMap<String, usize>,
    closed: HashMap<String, bool>,
}

/// The in-memory provider.  Clone-cheap; all handles share one state.
#[derive(Clone)]
pub struct StubProvider {
    state: Arc<Mutex<StubState>>,
}

impl Default for StubProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl StubProvider {
    pub fn new() -> Self {
        let state = StubState {
            wired_available: true,
            adapter_enabled: true,
            pair_started: true,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().expect("stub state lock poisoned")
    }

    // -- scripting: wired ----------------------------------------------------

    pub fn set_wired_available(&self, available: bool) {
        self.lock().wired_available = available;
    }

    /// Attach a wired printer exposing one interface with an interrupt-in and
    /// a bulk-out endpoint — the shape every ESC/POS USB printer presents.
    pub fn add_wired_printer(&self, address: &str, name: &str) {
        self.add_wired_device(address, name, true, true);
    }

    /// Attach a wired device with a controllable endpoint layout and
    /// authorization state.
    pub fn add_wired_device(&self, address: &str, name: &str, bulk_out: bool, authorized: bool) {
        let mut endpoints = vec![WiredEndpoint {
            number: 1,
            direction: EndpointDirection::In,
            transfer: TransferKind::Interrupt,
        }];
        if bulk_out {
            endpoints.push(WiredEndpoint {
                number: 2,
                direction: EndpointDirection::Out,
                transfer: TransferKind::Bulk,
            });
        }
        self.lock().wired_devices.push(WiredDevice {
            descriptor: DeviceDescriptor {
                address: address.into(),
                name: Some(name.into()),
                transport: TransportKind::Wired,
                bonded: false,
            },
            authorized,
            interfaces: vec![WiredInterface {
                number: 0,
                endpoints,
            }],
        });
    }

    /// Grant a previously unauthorized wired device (the platform side of a
    /// user accepting the USB prompt).
    pub fn authorize_wired(&self, address: &str) {
        let mut state = self.lock();
        for dev in &mut state.wired_devices {
            if dev.descriptor.address.eq_ignore_ascii_case(address) {
                dev.authorized = true;
            }
        }
    }

    pub fn set_wired_open_error(&self, message: &str) {
        self.lock().wired_open_error = Some(message.into());
    }

    // -- scripting: wireless -------------------------------------------------

    pub fn set_adapter_enabled(&self, enabled: bool) {
        self.lock().adapter_enabled = enabled;
    }

    pub fn add_bonded(&self, address: &str, name: &str) {
        self.lock().bonded.push(DeviceDescriptor {
            address: address.into(),
            name: Some(name.into()),
            transport: TransportKind::Wireless,
            bonded: true,
        });
    }

    pub fn add_bonded_unnamed(&self, address: &str) {
        self.lock().bonded.push(DeviceDescriptor {
            address: address.into(),
            name: None,
            transport: TransportKind::Wireless,
            bonded: true,
        });
    }

    /// A device the live scan will report (possibly more than once).
    pub fn add_discoverable(&self, address: &str, name: &str) {
        self.lock().discoverable.push(DeviceDescriptor {
            address: address.into(),
            name: Some(name.into()),
            transport: TransportKind::Wireless,
            bonded: false,
        });
    }

    /// Make the well-known serial-port service fail; the numbered alternate
    /// channel still connects.
    pub fn fail_primary_connect(&self) {
        self.lock().primary_connect_fails = true;
    }

    pub fn fail_all_connects(&self) {
        self.lock().all_connects_fail = true;
    }

    pub fn set_pair_started(&self, started: bool) {
        self.lock().pair_started = started;
    }

    // -- scripting: permissions & failure injection ---------------------------

    /// Script the authority's answer for one capability set.  Unscripted
    /// capability sets default to `Granted`.
    pub fn script_permission(&self, caps: &CapabilitySet, script: PermissionScript) {
        self.lock().permissions.insert(caps.key(), script);
    }

    /// Let `n` writes succeed, then fail every subsequent one.
    pub fn fail_writes_after(&self, n: usize) {
        self.lock().writes_before_failure = Some(n);
    }

    // -- inspection ----------------------------------------------------------

    pub fn counters(&self) -> CallCounters {
        self.lock().counters
    }

    /// Every write issued to the given device's channel, in order.
    pub fn writes(&self, address: &str) -> Vec<Vec<u8>> {
        self.lock().writes.get(address).cloned().unwrap_or_default()
    }

    pub fn total_bytes_written(&self) -> usize {
        self.lock()
            .writes
            .values()
            .flat_map(|ws| ws.iter().map(Vec::len))
            .sum()
    }

    pub fn flush_count(&self, address: &str) -> usize {
        self.lock().flushes.get(address).copied().unwrap_or(0)
    }

    pub fn was_closed(&self, address: &str) -> bool {
        self.lock().closed.get(address).copied().unwrap_or(false)
    }

    pub fn connect_attempts(&self) -> Vec<(String, ServiceChannel)> {
        self.lock().connect_attempts.clone()
    }

    /// Every (address, interface, endpoint) triple claimed through `open`.
    pub fn wired_claims(&self) -> Vec<(String, u8, u8)> {
        self.lock().wired_claims.clone()
    }

    /// Tokens the authority has been asked to prompt for, oldest first.
    pub fn requested_tokens(&self) -> Vec<(CapabilitySet, RequestToken)> {
        self.lock().requested.clone()
    }

    pub fn pair_requests(&self) -> Vec<String> {
        self.lock().pair_requests.clone()
    }
}

impl TransportProvider for StubProvider {
    fn wired(&self) -> Arc<dyn WiredBus> {
        Arc::new(self.clone())
    }

    fn directory(&self) -> Arc<dyn DeviceDirectory> {
        Arc::new(self.clone())
    }

    fn authority(&self) -> Arc<dyn PermissionAuthority> {
        Arc::new(self.clone())
    }

    fn platform_name(&self) -> &str {
        "stub"
    }
}

#[async_trait]
impl WiredBus for StubProvider {
    fn available(&self) -> bool {
        self.lock().wired_available
    }

    async fn devices(&self) -> Result<Vec<WiredDevice>> {
        let mut state = self.lock();
        state.counters.wired_enumerations += 1;
        Ok(state.wired_devices.clone())
    }

    async fn open(
        &self,
        address: &str,
        interface: u8,
        endpoint: u8,
    ) -> Result<Box<dyn RawChannel>> {
        let mut state = self.lock();
        if let Some(msg) = &state.wired_open_error {
            return Err(BondruckError::Transport(msg.clone()));
        }
        let claimable = state.wired_devices.iter().any(|d| {
            d.descriptor.address.eq_ignore_ascii_case(address)
                && d.interfaces.iter().any(|i| {
                    i.number == interface && i.endpoints.iter().any(|e| e.number == endpoint)
                })
        });
        if !claimable {
            return Err(BondruckError::Transport(format!(
                "wired device {address} detached or endpoint {interface}/{endpoint} gone"
            )));
        }
        state
            .wired_claims
            .push((address.to_string(), interface, endpoint));
        drop(state);
        Ok(Box::new(StubChannel {
            address: address.to_string(),
            state: Arc::clone(&self.state),
        }))
    }
}

#[async_trait]
impl DeviceDirectory for StubProvider {
    fn enabled(&self) -> bool {
        self.lock().adapter_enabled
    }

    async fn bonded(&self) -> Result<Vec<DeviceDescriptor>> {
        let mut state = self.lock();
        state.counters.wireless_enumerations += 1;
        Ok(state.bonded.clone())
    }

    fn start_scan(
        &self,
        sink: mpsc::UnboundedSender<DeviceDescriptor>,
    ) -> Result<Box<dyn ScanHandle>> {
        let mut state = self.lock();
        state.counters.scans_started += 1;
        // Report everything up front; the engine owns dedup and the window.
        for dev in &state.discoverable {
            let _ = sink.send(dev.clone());
        }
        Ok(Box::new(StubScanHandle {
            cancelled: AtomicBool::new(false),
            state: Arc::clone(&self.state),
            _sink: sink,
        }))
    }

    async fn connect(
        &self,
        device: &DeviceDescriptor,
        channel: ServiceChannel,
    ) -> Result<Box<dyn RawChannel>> {
        let mut state = self.lock();
        state.counters.wireless_connects += 1;
        state
            .connect_attempts
            .push((device.address.clone(), channel));

        if state.all_connects_fail {
            return Err(BondruckError::Transport(format!(
                "connect to {} refused",
                device.address
            )));
        }
        if state.primary_connect_fails && channel == ServiceChannel::SerialPort {
            return Err(BondruckError::Transport(
                "serial-port service record lookup failed".into(),
            ));
        }
        drop(state);
        Ok(Box::new(StubChannel {
            address: device.address.clone(),
            state: Arc::clone(&self.state),
        }))
    }

    async fn pair(&self, address: &str) -> Result<bool> {
        let mut state = self.lock();
        state.pair_requests.push(address.to_string());
        Ok(state.pair_started)
    }
}

impl PermissionAuthority for StubProvider {
    fn check(&self, caps: &CapabilitySet) -> PermissionState {
        match self.lock().permissions.get(&caps.key()) {
            Some(PermissionScript::Granted) | None => PermissionState::Granted,
            Some(PermissionScript::Denied) => PermissionState::Denied,
            Some(PermissionScript::Prompt) => PermissionState::Unknown,
        }
    }

    fn request(&self, caps: &CapabilitySet, token: RequestToken) {
        tracing::debug!(caps = %caps, token = %token, "stub authority prompt fired");
        self.lock().requested.push((caps.clone(), token));
    }
}

/// Channel recording every write into the shared state.
struct StubChannel {
    address: String,
    state: Arc<Mutex<StubState>>,
}

#[async_trait]
impl RawChannel for StubChannel {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock().expect("stub state lock poisoned");
        if let Some(remaining) = state.writes_before_failure {
            if remaining == 0 {
                return Err(BondruckError::Transport(format!(
                    "write to {} failed",
                    self.address
                )));
            }
            state.writes_before_failure = Some(remaining - 1);
        }
        state
            .writes
            .entry(self.address.clone())
            .or_default()
            .push(bytes.to_vec());
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        let mut state = self.state.lock().expect("stub state lock poisoned");
        *state.flushes.entry(self.address.clone()).or_insert(0) += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock().expect("stub state lock poisoned");
        state.closed.insert(self.address.clone(), true);
        Ok(())
    }
}

/// Intentionally has no `Drop` cancellation: the engine is required to cancel
/// explicitly, and tests assert that by comparing started/cancelled counters.
struct StubScanHandle {
    cancelled: AtomicBool,
    state: Arc<Mutex<StubState>>,
    _sink: mpsc::UnboundedSender<DeviceDescriptor>,
}

impl ScanHandle for StubScanHandle {
    fn cancel(&mut self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            let mut state = self.state.lock().expect("stub state lock poisoned");
            state.counters.scans_cancelled += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_records_writes_in_order() {
        let stub = StubProvider::new();
        stub.add_wired_printer("usb:1-1", "TM-T20");

        let mut channel = stub.open("usb:1-1", 0, 2).await.expect("open");
        channel.write_all(&[1, 2]).await.expect("write");
        channel.write_all(&[3]).await.expect("write");
        channel.flush().await.expect("flush");
        channel.close().await.expect("close");

        assert_eq!(stub.writes("usb:1-1"), vec![vec![1, 2], vec![3]]);
        assert_eq!(stub.flush_count("usb:1-1"), 1);
        assert!(stub.was_closed("usb:1-1"));
        assert_eq!(stub.wired_claims(), vec![("usb:1-1".to_string(), 0, 2)]);
    }

    #[tokio::test]
    async fn write_failure_injection_counts_down() {
        let stub = StubProvider::new();
        stub.add_wired_printer("usb:1-1", "TM-T20");
        stub.fail_writes_after(1);

        let mut channel = stub.open("usb:1-1", 0, 2).await.expect("open");
        channel.write_all(&[1]).await.expect("first write succeeds");
        assert!(channel.write_all(&[2]).await.is_err());
    }

    #[tokio::test]
    async fn primary_connect_failure_spares_numbered_channel() {
        let stub = StubProvider::new();
        stub.add_bonded("AA:BB", "SimuPrinter");
        stub.fail_primary_connect();

        let bonded = stub.bonded().await.expect("bonded");
        let dev = &bonded[0];
        assert!(stub.connect(dev, ServiceChannel::SerialPort).await.is_err());
        assert!(stub.connect(dev, ServiceChannel::Number(1)).await.is_ok());
        assert_eq!(stub.counters().wireless_connects, 2);
    }

    #[test]
    fn scan_cancel_is_idempotent() {
        let stub = StubProvider::new();
        stub.add_discoverable("AA:BB", "SimuPrinter");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = stub.start_scan(tx).expect("scan");
        assert_eq!(rx.try_recv().expect("found device").address, "AA:BB");

        handle.cancel();
        handle.cancel();
        let counters = stub.counters();
        assert_eq!(counters.scans_started, 1);
        assert_eq!(counters.scans_cancelled, 1);
    }

    #[test]
    fn unscripted_permissions_default_to_granted() {
        let stub = StubProvider::new();
        assert_eq!(
            stub.check(&CapabilitySet::Wireless),
            PermissionState::Granted
        );

        stub.script_permission(&CapabilitySet::Wireless, PermissionScript::Prompt);
        assert_eq!(
            stub.check(&CapabilitySet::Wireless),
            PermissionState::Unknown
        );
    }
}
