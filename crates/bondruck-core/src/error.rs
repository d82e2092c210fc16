// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Bondruck.

use thiserror::Error;

/// Top-level error type for all Bondruck operations.
///
/// Delivery results are binary: a request either succeeds or fails with one
/// of these variants.  Partial-payload progress is not reported — the wire
/// protocols involved carry no acknowledgment, so "bytes accepted before the
/// error" would be a guess, not a fact.
#[derive(Debug, Error)]
pub enum BondruckError {
    // -- Transport selection --
    /// Link-level authorization was refused by the user or platform.
    /// Never retried automatically; clearing it requires out-of-band action.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Neither the wired nor the wireless transport could accept the payload.
    #[error("no transport available: {0}")]
    NoTransportAvailable(String),

    /// Device selection found no match (e.g. an exact-address hint that does
    /// not correspond to any bonded device).
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    // -- Delivery --
    /// The channel reported an error while opening, writing, or closing.
    #[error("transport I/O error: {0}")]
    Transport(String),

    /// The delivery call was cancelled mid-stream by its caller.
    #[error("delivery cancelled")]
    Cancelled,

    /// The request was malformed before any transport was touched.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The delivery queue is saturated; the request was never enqueued.
    #[error("delivery queue full ({0} slots)")]
    Busy(usize),

    // -- Ambient --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BondruckError>;
