// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Connection session: the chunked delivery protocol.
//
// Neither link acknowledges at the application level, so the framing is
// defensive throughout: a reset preamble flushed before any payload byte, a
// settle pause for receivers that discard early bytes, fixed-size chunks
// paced below the receiver drain rate, and a trailer with a long settle
// before close so the cut finishes before the socket drops.
//
// Success means every byte was accepted by the local transport.  It is not
// proof the paper came out.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use bondruck_bridge::traits::RawChannel;
use bondruck_core::config::EngineConfig;
use bondruck_core::error::{BondruckError, Result};
use bondruck_core::types::{DeviceDescriptor, SessionState, TransportKind};

/// Device-reset sequence (ESC @) flushed immediately after open.
pub const RESET_PREAMBLE: [u8; 2] = [0x1B, 0x40];

/// Line-feed pair written after the last chunk.
pub const TRAILER: [u8; 2] = [0x0A, 0x0A];

/// Number of chunk writes a payload of `len` produces at `chunk_size`.
/// A zero chunk size is treated as 1, matching the session's clamp.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size.max(1))
}

/// One delivery attempt over an already-opened channel.
///
/// Exactly one session exists per delivery call; `Closed` and `Failed` are
/// terminal and the session cannot be reused.
pub struct DeliverySession {
    transport: TransportKind,
    device: DeviceDescriptor,
    config: EngineConfig,
    state: SessionState,
}

impl DeliverySession {
    pub fn new(
        transport: TransportKind,
        device: DeviceDescriptor,
        mut config: EngineConfig,
    ) -> Self {
        // A deserialized config may carry chunk_size 0; slicing needs ≥ 1.
        config.chunk_size = config.chunk_size.max(1);
        Self {
            transport,
            device,
            config,
            state: SessionState::Opening,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Stream `payload` through `channel`: preamble, chunks, trailer, close.
    ///
    /// Any write error closes the channel best-effort and propagates; the
    /// cancellation token is observed between chunks.
    #[instrument(
        skip_all,
        fields(transport = %self.transport, address = %self.device.address, len = payload.len())
    )]
    pub async fn deliver(
        &mut self,
        mut channel: Box<dyn RawChannel>,
        payload: &[u8],
        cancel: &CancellationToken,
    ) -> Result<()> {
        debug_assert!(!payload.is_empty(), "empty payloads are rejected upstream");
        self.state = SessionState::Streaming;

        match self.stream(channel.as_mut(), payload, cancel).await {
            Ok(()) => {
                channel.close().await?;
                self.state = SessionState::Closed;
                info!(chunks = chunk_count(payload.len(), self.config.chunk_size),
                      "payload accepted by local transport");
                Ok(())
            }
            Err(err) => {
                // Close best-effort; the original error is the one that matters.
                let _ = channel.close().await;
                self.state = SessionState::Failed;
                Err(err)
            }
        }
    }

    async fn stream(
        &self,
        channel: &mut dyn RawChannel,
        payload: &[u8],
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.checkpoint(cancel)?;

        // Receivers discard bytes arriving too soon after connect; reset
        // first and let the device settle.
        self.write_flushed(channel, &RESET_PREAMBLE).await?;
        tokio::time::sleep(self.config.reset_settle).await;

        let mut chunks = payload.chunks(self.config.chunk_size).peekable();
        while let Some(chunk) = chunks.next() {
            self.checkpoint(cancel)?;
            self.write_flushed(channel, chunk).await?;
            debug!(len = chunk.len(), "chunk accepted");
            if chunks.peek().is_some() {
                tokio::time::sleep(self.config.chunk_delay).await;
            }
        }

        self.write_flushed(channel, &TRAILER).await?;
        tokio::time::sleep(self.config.trailer_settle).await;
        Ok(())
    }

    /// Write-and-flush one unit.  Wired bulk transfers get a hard timeout;
    /// wireless sockets rely on the platform's own connect/write bounds.
    async fn write_flushed(&self, channel: &mut dyn RawChannel, bytes: &[u8]) -> Result<()> {
        match self.transport {
            TransportKind::Wired => {
                let budget = self.config.wired_write_timeout;
                tokio::time::timeout(budget, async {
                    channel.write_all(bytes).await?;
                    channel.flush().await
                })
                .await
                .map_err(|_| {
                    BondruckError::Transport(format!(
                        "bulk write of {} bytes timed out after {:?}",
                        bytes.len(),
                        budget
                    ))
                })?
            }
            TransportKind::Wireless => {
                channel.write_all(bytes).await?;
                channel.flush().await
            }
        }
    }

    fn checkpoint(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(BondruckError::Cancelled);
        }
        Ok(())
    }
}
