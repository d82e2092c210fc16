// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bondruck — Platform transport provider abstractions.
//
// The engine never talks to a USB stack or a Bluetooth adapter directly.
// Everything platform-specific sits behind the traits in `traits`, injected
// at construction, so the transport-selection and delivery logic can be
// exercised end to end against the in-memory `stub` provider.

pub mod stub;
pub mod traits;

pub use stub::StubProvider;
pub use traits::{
    DeviceDirectory, EndpointDirection, PermissionAuthority, RawChannel, ScanHandle,
    ServiceChannel, TransferKind, TransportProvider, WiredBus, WiredDevice, WiredEndpoint,
    WiredInterface,
};
