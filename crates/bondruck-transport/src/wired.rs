// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wired (USB bulk) enumerator.
//
// Candidate policy is "first viable", not "best": first device in
// enumeration order, its first interface carrying a bulk-out endpoint, that
// endpoint.  Devices lacking authorization fire an asynchronous prompt
// through the gate and are excluded from the walk — enumeration itself never
// blocks; the orchestrator decides whether to wait for the grant.

use tracing::{debug, info};

use bondruck_bridge::traits::{WiredBus, WiredDevice};
use bondruck_core::error::Result;
use bondruck_core::types::{
    CapabilitySet, DeviceDescriptor, PermissionState, RequestToken, UnavailableReason,
};

use crate::permission::PermissionGate;

/// Typed outcome of a wired probe.  The orchestrator branches on this
/// instead of catching exceptions around the whole attempt.
#[derive(Debug)]
pub enum WiredProbe {
    /// A viable, authorized device ready to open.
    Candidate(WiredCandidate),
    /// Viable devices exist but every one is waiting on a prompt; the token
    /// identifies the first prompt fired.
    AwaitingPermission(RequestToken),
    /// Viable devices exist and the user has refused every one.
    Denied,
    /// Nothing to try on this transport.
    Unavailable(UnavailableReason),
}

/// The device/interface/endpoint triple the probe settled on.
#[derive(Debug, Clone)]
pub struct WiredCandidate {
    pub descriptor: DeviceDescriptor,
    pub interface: u8,
    pub endpoint: u8,
}

pub struct WiredEnumerator<'a> {
    bus: &'a dyn WiredBus,
    gate: &'a PermissionGate,
}

impl<'a> WiredEnumerator<'a> {
    pub fn new(bus: &'a dyn WiredBus, gate: &'a PermissionGate) -> Self {
        Self { bus, gate }
    }

    /// Walk the attached devices and classify the transport.
    pub async fn probe(&self) -> Result<WiredProbe> {
        if !self.bus.available() {
            info!("wired subsystem missing");
            return Ok(WiredProbe::Unavailable(UnavailableReason::SubsystemMissing));
        }

        let devices = self.bus.devices().await?;
        debug!(count = devices.len(), "wired devices enumerated");

        let mut first_pending: Option<RequestToken> = None;
        let mut any_denied = false;

        for device in &devices {
            let Some((interface, endpoint)) = first_bulk_out(device) else {
                continue;
            };

            if !device.authorized {
                let caps = CapabilitySet::WiredDevice(device.descriptor.address.clone());
                match self.gate.ensure(&caps) {
                    PermissionState::Granted => {
                        // The OS view was stale; the bus snapshot said
                        // unauthorized but the grant already exists.
                    }
                    PermissionState::Pending(token) => {
                        debug!(address = %device.descriptor.address, token = %token,
                               "wired device awaiting authorization");
                        first_pending.get_or_insert(token);
                        continue;
                    }
                    PermissionState::Denied | PermissionState::Unknown => {
                        any_denied = true;
                        continue;
                    }
                }
            }

            info!(address = %device.descriptor.address, interface, endpoint,
                  "wired candidate selected");
            return Ok(WiredProbe::Candidate(WiredCandidate {
                descriptor: device.descriptor.clone(),
                interface,
                endpoint,
            }));
        }

        if let Some(token) = first_pending {
            return Ok(WiredProbe::AwaitingPermission(token));
        }
        if any_denied {
            return Ok(WiredProbe::Denied);
        }
        Ok(WiredProbe::Unavailable(UnavailableReason::NoCandidates))
    }
}

/// First interface with a bulk-out endpoint, and that endpoint, in
/// enumeration order.
fn first_bulk_out(device: &WiredDevice) -> Option<(u8, u8)> {
    for interface in &device.interfaces {
        for endpoint in &interface.endpoints {
            if endpoint.is_bulk_out() {
                return Some((interface.number, endpoint.number));
            }
        }
    }
    None
}
