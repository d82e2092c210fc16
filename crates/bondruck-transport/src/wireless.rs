// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Wireless (Bluetooth SPP) enumerator and time-boxed discovery.
//
// The bonded set is the working set; a live scan runs only when that set is
// empty and no exact-address hint pins the target.  The scan is force-
// cancelled at window expiry regardless of accumulated results, and the
// listener is released on every exit path — timeout, cancellation, or error.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bondruck_bridge::traits::{DeviceDirectory, RawChannel, ServiceChannel};
use bondruck_core::config::EngineConfig;
use bondruck_core::error::{BondruckError, Result};
use bondruck_core::types::{DeviceDescriptor, SelectionHint, UnavailableReason};

/// Typed outcome of a wireless probe.
#[derive(Debug)]
pub enum WirelessProbe {
    /// The working set (bonded, plus scan results when a scan ran).
    Candidates(Vec<DeviceDescriptor>),
    Unavailable(UnavailableReason),
}

pub struct WirelessEnumerator<'a> {
    directory: &'a dyn DeviceDirectory,
    config: &'a EngineConfig,
}

impl<'a> WirelessEnumerator<'a> {
    pub fn new(directory: &'a dyn DeviceDirectory, config: &'a EngineConfig) -> Self {
        Self { directory, config }
    }

    /// Build the working set for selection.
    pub async fn probe(
        &self,
        hint: &SelectionHint,
        cancel: &CancellationToken,
    ) -> Result<WirelessProbe> {
        if !self.directory.enabled() {
            info!("wireless adapter missing or disabled");
            return Ok(WirelessProbe::Unavailable(UnavailableReason::AdapterDisabled));
        }

        let mut working_set = self.directory.bonded().await?;
        debug!(count = working_set.len(), "bonded devices listed");

        // An exact-address hint can only match a bonded device; scanning for
        // it would be wasted radio time.
        if working_set.is_empty() && hint.exact_address.is_none() {
            let found = self.discover(cancel).await?;
            info!(count = found.len(), "live scan merged into working set");
            merge_deduplicated(&mut working_set, found);
        }

        if working_set.is_empty() {
            return Ok(WirelessProbe::Unavailable(UnavailableReason::NoCandidates));
        }
        Ok(WirelessProbe::Candidates(working_set))
    }

    /// Run one live scan bounded by the discovery window.
    ///
    /// Results are deduplicated by address (case-insensitive).  The listener
    /// is cancelled on the timeout path, on caller cancellation, and when the
    /// platform closes the stream early.
    async fn discover(&self, cancel: &CancellationToken) -> Result<Vec<DeviceDescriptor>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handle = self.directory.start_scan(tx)?;

        let window = tokio::time::sleep(self.config.discovery_window);
        tokio::pin!(window);

        let mut found = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        loop {
            tokio::select! {
                _ = &mut window => {
                    debug!("discovery window expired");
                    break;
                }
                _ = cancel.cancelled() => {
                    handle.cancel();
                    return Err(BondruckError::Cancelled);
                }
                device = rx.recv() => match device {
                    Some(d) => {
                        if seen.insert(d.address.to_lowercase()) {
                            debug!(address = %d.address, name = ?d.name, "device found");
                            found.push(d);
                        }
                    }
                    None => {
                        warn!("scan stream closed before the window expired");
                        break;
                    }
                },
            }
        }

        handle.cancel();
        Ok(found)
    }

    /// Open a duplex channel to a selected device.
    ///
    /// The well-known serial-port service is tried first; on failure exactly
    /// one retry runs against the fixed alternate channel number.  Beyond
    /// that, the error propagates.
    pub async fn open(&self, device: &DeviceDescriptor) -> Result<Box<dyn RawChannel>> {
        match self.directory.connect(device, ServiceChannel::SerialPort).await {
            Ok(channel) => Ok(channel),
            Err(primary) => {
                warn!(address = %device.address, error = %primary,
                      "serial-port service failed, trying alternate channel");
                self.directory
                    .connect(device, ServiceChannel::Number(self.config.fallback_channel))
                    .await
            }
        }
    }
}

/// Append `found` entries whose address is not already in `working_set`.
fn merge_deduplicated(working_set: &mut Vec<DeviceDescriptor>, found: Vec<DeviceDescriptor>) {
    let mut known: HashSet<String> = working_set
        .iter()
        .map(|d| d.address.to_lowercase())
        .collect();
    for device in found {
        if known.insert(device.address.to_lowercase()) {
            working_set.push(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bondruck_bridge::stub::StubProvider;
    use bondruck_bridge::traits::TransportProvider;
    use std::sync::Arc;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[tokio::test]
    async fn disabled_adapter_is_unavailable() {
        let stub = StubProvider::new();
        stub.set_adapter_enabled(false);
        let cfg = config();
        let directory: Arc<dyn DeviceDirectory> = stub.directory();
        let enumerator = WirelessEnumerator::new(directory.as_ref(), &cfg);

        let probe = enumerator
            .probe(&SelectionHint::default(), &CancellationToken::new())
            .await
            .expect("probe");
        assert!(matches!(
            probe,
            WirelessProbe::Unavailable(UnavailableReason::AdapterDisabled)
        ));
        assert_eq!(stub.counters().scans_started, 0);
    }

    #[tokio::test]
    async fn bonded_set_skips_the_scan_entirely() {
        let stub = StubProvider::new();
        stub.add_bonded("AA:BB", "SimuPrinter");
        let cfg = config();
        let directory: Arc<dyn DeviceDirectory> = stub.directory();
        let enumerator = WirelessEnumerator::new(directory.as_ref(), &cfg);

        let probe = enumerator
            .probe(&SelectionHint::default(), &CancellationToken::new())
            .await
            .expect("probe");
        let WirelessProbe::Candidates(set) = probe else {
            panic!("expected candidates");
        };
        assert_eq!(set.len(), 1);
        assert_eq!(stub.counters().scans_started, 0);
    }

    #[tokio::test]
    async fn exact_address_hint_never_scans_even_with_empty_bonded_set() {
        let stub = StubProvider::new();
        stub.add_discoverable("AA:BB", "SimuPrinter");
        let cfg = config();
        let directory: Arc<dyn DeviceDirectory> = stub.directory();
        let enumerator = WirelessEnumerator::new(directory.as_ref(), &cfg);

        let hint = SelectionHint {
            exact_address: Some("AA:BB".into()),
            name_substring: None,
        };
        let probe = enumerator
            .probe(&hint, &CancellationToken::new())
            .await
            .expect("probe");
        assert!(matches!(
            probe,
            WirelessProbe::Unavailable(UnavailableReason::NoCandidates)
        ));
        assert_eq!(stub.counters().scans_started, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn scan_deduplicates_and_releases_listener_on_timeout() {
        let stub = StubProvider::new();
        stub.add_discoverable("AA:BB", "SimuPrinter");
        stub.add_discoverable("aa:bb", "SimuPrinter (dup)");
        stub.add_discoverable("CC:DD", "Headset");
        let cfg = config();
        let directory: Arc<dyn DeviceDirectory> = stub.directory();
        let enumerator = WirelessEnumerator::new(directory.as_ref(), &cfg);

        let probe = enumerator
            .probe(&SelectionHint::default(), &CancellationToken::new())
            .await
            .expect("probe");
        let WirelessProbe::Candidates(set) = probe else {
            panic!("expected candidates");
        };
        assert_eq!(set.len(), 2, "duplicate address must be dropped");

        let counters = stub.counters();
        assert_eq!(counters.scans_started, 1);
        assert_eq!(counters.scans_cancelled, 1, "listener must be released");
    }

    #[tokio::test(start_paused = true)]
    async fn caller_cancellation_stops_the_scan_and_releases_listener() {
        let stub = StubProvider::new();
        let cfg = config();
        let directory: Arc<dyn DeviceDirectory> = stub.directory();
        let enumerator = WirelessEnumerator::new(directory.as_ref(), &cfg);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = enumerator
            .probe(&SelectionHint::default(), &cancel)
            .await
            .expect_err("cancelled");
        assert!(matches!(err, BondruckError::Cancelled));
        assert_eq!(stub.counters().scans_cancelled, 1);
    }

    #[tokio::test]
    async fn open_retries_once_on_alternate_channel() {
        let stub = StubProvider::new();
        stub.add_bonded("AA:BB", "SimuPrinter");
        stub.fail_primary_connect();
        let cfg = config();
        let directory: Arc<dyn DeviceDirectory> = stub.directory();
        let enumerator = WirelessEnumerator::new(directory.as_ref(), &cfg);

        let device = stub.directory().bonded().await.expect("bonded")[0].clone();
        enumerator.open(&device).await.expect("alternate channel");

        let attempts = stub.connect_attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].1, ServiceChannel::SerialPort);
        assert_eq!(attempts[1].1, ServiceChannel::Number(cfg.fallback_channel));
    }

    #[tokio::test]
    async fn open_fails_after_both_channels_refuse() {
        let stub = StubProvider::new();
        stub.add_bonded("AA:BB", "SimuPrinter");
        stub.fail_all_connects();
        let cfg = config();
        let directory: Arc<dyn DeviceDirectory> = stub.directory();
        let enumerator = WirelessEnumerator::new(directory.as_ref(), &cfg);

        let device = stub.directory().bonded().await.expect("bonded")[0].clone();
        let err = enumerator.open(&device).await.expect_err("both refuse");
        assert!(matches!(err, BondruckError::Transport(_)));
        assert_eq!(stub.connect_attempts().len(), 2, "exactly one retry");
    }
}
