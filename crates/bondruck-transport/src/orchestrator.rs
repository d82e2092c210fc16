// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Retry/fallback orchestrator: TryWired → TryWireless → Success | Failure.
//
// Wired is always attempted first, sequentially, as policy — the cable is
// cheaper, faster, and immune to pairing trouble.  A wired transport error
// is classified "this transport unavailable" and falls through to wireless
// silently; only the terminal, post-fallback failure reaches the caller.
// Permission denials and exact-hint selection misses cut the fallback short:
// no amount of transport switching fixes those.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use bondruck_bridge::traits::{DeviceDirectory, TransportProvider, WiredBus};
use bondruck_core::config::EngineConfig;
use bondruck_core::error::{BondruckError, Result};
use bondruck_core::types::{
    CapabilitySet, DeliveryRequest, PermissionState, SelectionHint, TransportKind,
    UnavailableReason,
};

use crate::permission::PermissionGate;
use crate::selector;
use crate::session::DeliverySession;
use crate::wired::{WiredEnumerator, WiredProbe};
use crate::wireless::{WirelessEnumerator, WirelessProbe};

/// How one transport attempt ended, as seen by the fallback policy.
enum AttemptOutcome {
    Delivered,
    /// Not delivered, but falling back is legitimate.  Carries the reason
    /// for the terminal error message.
    Skipped(String),
}

/// Sequences the wired-then-wireless attempts for one delivery call.
pub struct Orchestrator {
    wired: Arc<dyn WiredBus>,
    directory: Arc<dyn DeviceDirectory>,
    gate: Arc<PermissionGate>,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(
        wired: Arc<dyn WiredBus>,
        directory: Arc<dyn DeviceDirectory>,
        gate: Arc<PermissionGate>,
        config: EngineConfig,
    ) -> Self {
        Self {
            wired,
            directory,
            gate,
            config,
        }
    }

    pub fn from_provider(provider: &dyn TransportProvider, config: EngineConfig) -> Self {
        let gate = Arc::new(PermissionGate::new(provider.authority()));
        Self::new(provider.wired(), provider.directory(), gate, config)
    }

    /// The permission gate, for platform glue that must route grant/deny
    /// callbacks into in-flight deliveries.
    pub fn gate(&self) -> &Arc<PermissionGate> {
        &self.gate
    }

    /// Run one delivery call through the transport state machine.
    #[instrument(skip_all, fields(len = request.payload.len()))]
    pub async fn deliver(
        &self,
        request: &DeliveryRequest,
        cancel: &CancellationToken,
    ) -> Result<TransportKind> {
        if request.payload.is_empty() {
            return Err(BondruckError::InvalidRequest(
                "payload must not be empty".into(),
            ));
        }
        let hint = request.hint();

        debug!(stage = "TryWired");
        let wired_reason = match self.try_wired(&request.payload, cancel).await? {
            AttemptOutcome::Delivered => {
                info!(stage = "Success", via = %TransportKind::Wired);
                return Ok(TransportKind::Wired);
            }
            AttemptOutcome::Skipped(reason) => reason,
        };

        debug!(stage = "TryWireless", wired = %wired_reason);
        match self.try_wireless(&request.payload, &hint, cancel).await? {
            AttemptOutcome::Delivered => {
                info!(stage = "Success", via = %TransportKind::Wireless);
                Ok(TransportKind::Wireless)
            }
            AttemptOutcome::Skipped(wireless_reason) => {
                info!(stage = "Failure", wired = %wired_reason, wireless = %wireless_reason);
                Err(BondruckError::NoTransportAvailable(format!(
                    "wired: {wired_reason}; wireless: {wireless_reason}"
                )))
            }
        }
    }

    async fn try_wired(
        &self,
        payload: &[u8],
        cancel: &CancellationToken,
    ) -> Result<AttemptOutcome> {
        let enumerator = WiredEnumerator::new(self.wired.as_ref(), &self.gate);

        let mut probe = match enumerator.probe().await {
            Ok(probe) => probe,
            Err(BondruckError::Cancelled) => return Err(BondruckError::Cancelled),
            Err(err) => {
                warn!(error = %err, "wired enumeration failed, treating as unavailable");
                return Ok(AttemptOutcome::Skipped(format!("enumeration failed: {err}")));
            }
        };

        // A device that is about to be granted is better than a premature
        // fallback: wait for the decision, bounded, then look again once.
        if let WiredProbe::AwaitingPermission(token) = probe {
            debug!(token = %token, "waiting for wired authorization");
            match self.gate.await_decision(token, self.config.permission_wait).await {
                PermissionState::Granted => probe = enumerator.probe().await?,
                PermissionState::Denied => {
                    return Err(BondruckError::PermissionDenied(
                        "wired device authorization refused".into(),
                    ));
                }
                PermissionState::Pending(_) | PermissionState::Unknown => {
                    return Ok(AttemptOutcome::Skipped(
                        UnavailableReason::PermissionPending.to_string(),
                    ));
                }
            }
        }

        match probe {
            WiredProbe::Candidate(candidate) => {
                let mut session = DeliverySession::new(
                    TransportKind::Wired,
                    candidate.descriptor.clone(),
                    self.config.clone(),
                );
                let attempt = async {
                    let channel = self
                        .wired
                        .open(
                            &candidate.descriptor.address,
                            candidate.interface,
                            candidate.endpoint,
                        )
                        .await?;
                    session.deliver(channel, payload, cancel).await
                };
                match attempt.await {
                    Ok(()) => Ok(AttemptOutcome::Delivered),
                    Err(BondruckError::Cancelled) => Err(BondruckError::Cancelled),
                    Err(err) => {
                        warn!(address = %candidate.descriptor.address, error = %err,
                              "wired attempt failed, falling back");
                        Ok(AttemptOutcome::Skipped(format!("attempt failed: {err}")))
                    }
                }
            }
            WiredProbe::AwaitingPermission(_) => {
                // Granted, but the re-probe still sees the old authorization
                // snapshot.  Do not wait twice.
                Ok(AttemptOutcome::Skipped(
                    UnavailableReason::PermissionPending.to_string(),
                ))
            }
            WiredProbe::Denied => Err(BondruckError::PermissionDenied(
                "wired device authorization refused".into(),
            )),
            WiredProbe::Unavailable(reason) => Ok(AttemptOutcome::Skipped(reason.to_string())),
        }
    }

    async fn try_wireless(
        &self,
        payload: &[u8],
        hint: &SelectionHint,
        cancel: &CancellationToken,
    ) -> Result<AttemptOutcome> {
        match self.gate.ensure(&CapabilitySet::Wireless) {
            PermissionState::Granted => {}
            PermissionState::Denied => {
                return Err(BondruckError::PermissionDenied(
                    "wireless connect+scan refused".into(),
                ));
            }
            PermissionState::Pending(token) => {
                debug!(token = %token, "waiting for wireless authorization");
                match self.gate.await_decision(token, self.config.permission_wait).await {
                    PermissionState::Granted => {}
                    PermissionState::Denied => {
                        return Err(BondruckError::PermissionDenied(
                            "wireless connect+scan refused".into(),
                        ));
                    }
                    _ => {
                        return Ok(AttemptOutcome::Skipped(
                            UnavailableReason::PermissionPending.to_string(),
                        ));
                    }
                }
            }
            PermissionState::Unknown => {
                return Ok(AttemptOutcome::Skipped(
                    UnavailableReason::PermissionPending.to_string(),
                ));
            }
        }

        let enumerator = WirelessEnumerator::new(self.directory.as_ref(), &self.config);
        let working_set = match enumerator.probe(hint, cancel).await? {
            WirelessProbe::Candidates(set) => set,
            WirelessProbe::Unavailable(reason) => {
                return Ok(AttemptOutcome::Skipped(reason.to_string()));
            }
        };

        // Selection failures are terminal: an exact-address miss means the
        // caller named a printer this device has never paired with.
        let device = selector::select(&working_set, hint)?;

        let mut session = DeliverySession::new(
            TransportKind::Wireless,
            device.clone(),
            self.config.clone(),
        );
        let attempt = async {
            let channel = enumerator.open(&device).await?;
            session.deliver(channel, payload, cancel).await
        };
        match attempt.await {
            Ok(()) => Ok(AttemptOutcome::Delivered),
            Err(BondruckError::Cancelled) => Err(BondruckError::Cancelled),
            Err(err) => {
                warn!(address = %device.address, error = %err, "wireless attempt failed");
                Ok(AttemptOutcome::Skipped(format!("attempt failed: {err}")))
            }
        }
    }
}
