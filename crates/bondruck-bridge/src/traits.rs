// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic trait definitions for transport access.
//
// Real implementations wrap the host USB stack and Bluetooth adapter; the
// `stub` module provides a scriptable in-memory implementation for desktop
// builds and tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use bondruck_core::error::Result;
use bondruck_core::types::{CapabilitySet, DeviceDescriptor, PermissionState, RequestToken};

/// Well-known Serial Port Profile service identifier used for the primary
/// wireless connection attempt.
pub const SPP_SERVICE_UUID: &str = "00001101-0000-1000-8000-00805F9B34FB";

/// Rendezvous identifier for opening a duplex stream to a bonded wireless
/// device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceChannel {
    /// The well-known SPP service record ([`SPP_SERVICE_UUID`]).
    SerialPort,
    /// A fixed channel number, used as the typed alternate when the service
    /// record lookup fails on cheap receipt printers.
    Number(u8),
}

/// Unified provider that groups the three platform capabilities the engine
/// consumes.  Injected at construction so tests can substitute fakes.
pub trait TransportProvider: Send + Sync {
    fn wired(&self) -> Arc<dyn WiredBus>;
    fn directory(&self) -> Arc<dyn DeviceDirectory>;
    fn authority(&self) -> Arc<dyn PermissionAuthority>;

    /// Human-readable platform name (e.g. "Android 14", "stub").
    fn platform_name(&self) -> &str;
}

/// An exclusive duplex channel to one device.
///
/// Writes carry no application-level acknowledgment on either transport;
/// `write_all` returning `Ok` means the local transport accepted the bytes,
/// nothing more.
#[async_trait]
pub trait RawChannel: Send {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()>;
    async fn flush(&mut self) -> Result<()>;
    async fn close(&mut self) -> Result<()>;
}

impl std::fmt::Debug for dyn RawChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn RawChannel")
    }
}

/// Direction of a wired endpoint, from the host's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointDirection {
    In,
    Out,
}

/// Transfer type of a wired endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Bulk,
    Interrupt,
    Control,
}

/// One endpoint on a wired interface.
#[derive(Debug, Clone)]
pub struct WiredEndpoint {
    pub number: u8,
    pub direction: EndpointDirection,
    pub transfer: TransferKind,
}

impl WiredEndpoint {
    /// Whether this endpoint can carry an outbound payload stream.
    pub fn is_bulk_out(&self) -> bool {
        self.direction == EndpointDirection::Out && self.transfer == TransferKind::Bulk
    }
}

/// One interface on an attached wired device.
#[derive(Debug, Clone)]
pub struct WiredInterface {
    pub number: u8,
    pub endpoints: Vec<WiredEndpoint>,
}

/// An attached wired device as the bus reports it.
#[derive(Debug, Clone)]
pub struct WiredDevice {
    pub descriptor: DeviceDescriptor,
    /// Whether the OS has already authorized this app for this device.
    pub authorized: bool,
    pub interfaces: Vec<WiredInterface>,
}

/// Access to the host's wired (USB) subsystem.
#[async_trait]
pub trait WiredBus: Send + Sync {
    /// Whether the subsystem exists at all on this host.  `false` is a
    /// classification ("transport unavailable"), not an error.
    fn available(&self) -> bool;

    /// Snapshot of currently attached devices, in enumeration order.
    async fn devices(&self) -> Result<Vec<WiredDevice>>;

    /// Claim `interface` on the device and open an exclusive channel over
    /// its bulk-out `endpoint`.  Both come from the enumeration snapshot.
    async fn open(
        &self,
        address: &str,
        interface: u8,
        endpoint: u8,
    ) -> Result<Box<dyn RawChannel>>;
}

/// Handle to a running live scan.  Cancelling releases the underlying
/// platform listener; implementations must tolerate repeated calls.
pub trait ScanHandle: Send {
    fn cancel(&mut self);
}

/// Access to the host's wireless (Bluetooth) adapter.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// Whether the adapter is present and switched on.
    fn enabled(&self) -> bool;

    /// The already-bonded device set, available without scanning.  Order is
    /// platform-defined and must not be relied upon.
    async fn bonded(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Start a live scan, pushing each found device into `sink` until the
    /// returned handle is cancelled.  The caller owns deduplication and the
    /// time box.
    fn start_scan(
        &self,
        sink: mpsc::UnboundedSender<DeviceDescriptor>,
    ) -> Result<Box<dyn ScanHandle>>;

    /// Open a connection-oriented socket to a bonded device.  Blocking
    /// behavior and connect timeout (~12 s) are the platform's own.
    async fn connect(
        &self,
        device: &DeviceDescriptor,
        channel: ServiceChannel,
    ) -> Result<Box<dyn RawChannel>>;

    /// Fire-and-forget bond initiation.  Returns whether the platform
    /// accepted the request; the pairing dialog itself is out-of-band.
    async fn pair(&self, address: &str) -> Result<bool>;
}

/// The OS permission prompt, reduced to its grant/deny signal.
///
/// `request` fires the asynchronous prompt; the eventual decision is routed
/// back through the engine's permission gate keyed by `token`.
pub trait PermissionAuthority: Send + Sync {
    /// Current state without prompting.  Returns `Unknown`, `Granted`, or
    /// `Denied` — never `Pending` (pending is gate-side state).
    fn check(&self, caps: &CapabilitySet) -> PermissionState;

    /// Fire the prompt for `caps`.  The platform glue must later report the
    /// outcome to the gate under the same `token`.
    fn request(&self, caps: &CapabilitySet, token: RequestToken);
}
