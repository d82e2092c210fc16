// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Public facade over the engine: direct and queued delivery, the bonded
// diagnostics listing, pairing, and the permission callback entry point.
//
// Failures are logged here with their human rendering so the host shell can
// show the cashier something actionable without translating error variants
// itself.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use bondruck_bridge::traits::{DeviceDirectory, TransportProvider};
use bondruck_core::config::EngineConfig;
use bondruck_core::error::{BondruckError, Result};
use bondruck_core::human_errors::humanize_error;
use bondruck_core::types::{
    BondedDeviceInfo, DeliveryReceipt, DeliveryRequest, PairReply, RequestToken,
};

use crate::orchestrator::Orchestrator;
use crate::worker::{DeliveryPool, DeliveryTicket};

/// One service per process, shared across host threads.
pub struct DeliveryService {
    orchestrator: Arc<Orchestrator>,
    pool: DeliveryPool,
    directory: Arc<dyn DeviceDirectory>,
}

impl DeliveryService {
    pub fn new(provider: Arc<dyn TransportProvider>, config: EngineConfig) -> Self {
        info!(platform = provider.platform_name(), "delivery service starting");
        let directory = provider.directory();
        let orchestrator =
            Arc::new(Orchestrator::from_provider(provider.as_ref(), config.clone()));
        let pool =
            DeliveryPool::new(Arc::clone(&orchestrator), config.workers, config.queue_depth);
        Self {
            orchestrator,
            pool,
            directory,
        }
    }

    /// Deliver inline on the caller's task, bypassing the queue.
    pub async fn deliver(&self, request: DeliveryRequest) -> Result<DeliveryReceipt> {
        let cancel = CancellationToken::new();
        match self.orchestrator.deliver(&request, &cancel).await {
            Ok(via) => Ok(DeliveryReceipt { via }),
            Err(err) => Err(self.log_failure(err)),
        }
    }

    /// Enqueue a delivery on the worker pool.
    pub fn submit(&self, request: DeliveryRequest) -> Result<DeliveryTicket> {
        self.pool.submit(request).map_err(|err| self.log_failure(err))
    }

    /// Bonded wireless devices, for the settings screen's printer picker.
    pub async fn list_bonded_devices(&self) -> Result<Vec<BondedDeviceInfo>> {
        if !self.directory.enabled() {
            return Err(BondruckError::NoTransportAvailable(
                "wireless adapter missing or disabled".into(),
            ));
        }
        let bonded = self.directory.bonded().await?;
        Ok(bonded
            .into_iter()
            .map(|d| BondedDeviceInfo {
                name: d.name,
                address: d.address,
            })
            .collect())
    }

    /// Fire-and-forget bond initiation; PIN entry happens out-of-band.
    pub async fn pair_device(&self, address: &str) -> Result<PairReply> {
        if !self.directory.enabled() {
            return Err(BondruckError::NoTransportAvailable(
                "wireless adapter missing or disabled".into(),
            ));
        }
        let started = self.directory.pair(address).await?;
        info!(address, started, "pairing initiated");
        Ok(PairReply { started })
    }

    /// Entry point for the platform's asynchronous grant/deny callback.
    pub fn resolve_permission(&self, token: RequestToken, granted: bool) -> bool {
        self.orchestrator.gate().resolve(token, granted)
    }

    /// Stop the worker pool; in-flight jobs run to completion.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }

    fn log_failure(&self, err: BondruckError) -> BondruckError {
        let human = humanize_error(&err);
        warn!(error = %err, message = %human.message, retriable = human.retriable,
              "delivery failed");
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bondruck_bridge::stub::StubProvider;
    use bondruck_core::types::TransportKind;

    fn service_over(stub: &StubProvider) -> DeliveryService {
        DeliveryService::new(Arc::new(stub.clone()), EngineConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn inline_delivery_returns_the_transport_used() {
        let stub = StubProvider::new();
        stub.add_wired_printer("usb:1-1", "TM-T20");
        let service = service_over(&stub);

        let receipt = service
            .deliver(DeliveryRequest::new(vec![1u8; 300]))
            .await
            .expect("deliver");
        assert_eq!(receipt.via, TransportKind::Wired);

        let json = serde_json::to_string(&receipt).expect("serialize");
        assert_eq!(json, r#"{"via":"wired"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_delivery_resolves_through_the_ticket() {
        let stub = StubProvider::new();
        stub.set_wired_available(false);
        stub.add_bonded("AA:BB", "SimuPrinter");
        let service = service_over(&stub);

        let ticket = service
            .submit(DeliveryRequest::new(vec![2u8; 10]))
            .expect("submit");
        let via = ticket.wait().await.expect("deliver");
        assert_eq!(via, TransportKind::Wireless);
    }

    #[tokio::test]
    async fn bonded_listing_maps_names_and_addresses() {
        let stub = StubProvider::new();
        stub.add_bonded("AA:BB", "SimuPrinter");
        stub.add_bonded_unnamed("CC:DD");
        let service = service_over(&stub);

        let listed = service.list_bonded_devices().await.expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name.as_deref(), Some("SimuPrinter"));
        assert_eq!(listed[0].address, "AA:BB");
        assert!(listed[1].name.is_none());
    }

    #[tokio::test]
    async fn bonded_listing_fails_when_the_adapter_is_off() {
        let stub = StubProvider::new();
        stub.set_adapter_enabled(false);
        let service = service_over(&stub);

        let err = service.list_bonded_devices().await.expect_err("disabled");
        assert!(matches!(err, BondruckError::NoTransportAvailable(_)));
    }

    #[tokio::test]
    async fn pairing_reports_whether_the_bond_started() {
        let stub = StubProvider::new();
        let service = service_over(&stub);

        let reply = service.pair_device("AA:BB").await.expect("pair");
        assert!(reply.started);
        assert_eq!(stub.pair_requests(), vec!["AA:BB".to_string()]);

        stub.set_pair_started(false);
        let reply = service.pair_device("CC:DD").await.expect("pair");
        assert!(!reply.started);
    }

    #[tokio::test]
    async fn resolving_an_unknown_token_is_reported_as_such() {
        let stub = StubProvider::new();
        let service = service_over(&stub);
        assert!(!service.resolve_permission(RequestToken::new(), true));
    }
}
