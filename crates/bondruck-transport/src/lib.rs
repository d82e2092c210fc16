// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bondruck Transport — the selection and delivery engine.
//
// Given an opaque byte payload, pick between the wired bulk link and the
// wireless serial link, select a target device, negotiate permission, and
// stream the payload through defensive framing (reset preamble, fixed-size
// chunks, pacing delays, trailer).  Wired is always tried first; wireless is
// the silent fallback; the first success wins.

pub mod orchestrator;
pub mod permission;
pub mod selector;
pub mod service;
pub mod session;
pub mod wired;
pub mod wireless;
pub mod worker;

pub use orchestrator::Orchestrator;
pub use permission::PermissionGate;
pub use service::DeliveryService;
pub use session::DeliverySession;
pub use worker::{DeliveryPool, DeliveryTicket};
