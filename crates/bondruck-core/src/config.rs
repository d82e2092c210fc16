// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the delivery engine.
///
/// The defaults are calibrated for low-buffer thermal receipt printers: the
/// wire protocols carry no acknowledgment, so the engine throttles itself
/// below the slowest receiver drain rate we have seen in the field rather
/// than trusting flow control that does not exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Payload slice size written and flushed as one unit.
    pub chunk_size: usize,
    /// Pause after the reset preamble before the first payload byte —
    /// receivers discard bytes arriving too soon after connect.
    pub reset_settle: Duration,
    /// Pause between consecutive chunks.
    pub chunk_delay: Duration,
    /// Pause after the trailer before closing, so slow receivers finish
    /// draining and cutting.
    pub trailer_settle: Duration,
    /// Hard bound on each wired bulk write.  Wireless connects rely on the
    /// platform's own default (~12 s) and are not re-enforced here.
    pub wired_write_timeout: Duration,
    /// Live-scan window; the scan is force-cancelled at expiry regardless of
    /// accumulated results.
    pub discovery_window: Duration,
    /// How long the orchestrator waits for a pending permission grant before
    /// classifying the transport unavailable.
    pub permission_wait: Duration,
    /// Alternate wireless service channel tried once when the well-known
    /// serial-port service fails to open.
    pub fallback_channel: u8,
    /// Delivery workers draining the job queue.
    pub workers: usize,
    /// Bounded job queue depth; saturation fails submits immediately.
    pub queue_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 256,
            reset_settle: Duration::from_millis(80),
            chunk_delay: Duration::from_millis(15),
            trailer_settle: Duration::from_millis(350),
            wired_write_timeout: Duration::from_secs(5),
            discovery_window: Duration::from_millis(3500),
            permission_wait: Duration::from_secs(10),
            fallback_channel: 1,
            workers: 2,
            queue_depth: 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_protocol_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.chunk_size, 256);
        assert_eq!(cfg.reset_settle, Duration::from_millis(80));
        assert_eq!(cfg.chunk_delay, Duration::from_millis(15));
        assert_eq!(cfg.trailer_settle, Duration::from_millis(350));
        assert_eq!(cfg.discovery_window, Duration::from_millis(3500));
        assert_eq!(cfg.fallback_channel, 1);
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).expect("serialize");
        let back: EngineConfig = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.chunk_size, cfg.chunk_size);
        assert_eq!(back.wired_write_timeout, cfg.wired_write_timeout);
    }
}
