// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Permission gate: idempotent ensure() over the platform authority, with a
// correlation map so concurrent prompts resolve to the calls that fired them.
//
// The platform glue reports the user's decision through `resolve(token, ..)`;
// the delivery call suspends in `await_decision(token, ..)` bounded by a
// timeout.  Denial is terminal for the call — it is never re-requested
// automatically, since clearing it needs out-of-band user action.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use bondruck_bridge::traits::PermissionAuthority;
use bondruck_core::types::{CapabilitySet, PermissionState, RequestToken};

struct PendingEntry {
    caps_key: String,
    receiver: oneshot::Receiver<bool>,
}

#[derive(Default)]
struct Correlation {
    /// Capability key → the in-flight token, for idempotent re-entry.
    by_caps: HashMap<String, RequestToken>,
    /// Token → the half the awaiting call consumes.
    pending: HashMap<RequestToken, PendingEntry>,
    /// Token → the half the platform callback consumes.
    deciders: HashMap<RequestToken, oneshot::Sender<bool>>,
}

/// Gate between the engine and the OS permission prompt.
pub struct PermissionGate {
    authority: Arc<dyn PermissionAuthority>,
    correlation: Mutex<Correlation>,
}

impl PermissionGate {
    pub fn new(authority: Arc<dyn PermissionAuthority>) -> Self {
        Self {
            authority,
            correlation: Mutex::new(Correlation::default()),
        }
    }

    /// Check-or-request authorization for a capability set.
    ///
    /// Idempotent: a second call while a prompt is in flight returns
    /// `Pending` with the *same* token rather than firing a second prompt.
    pub fn ensure(&self, caps: &CapabilitySet) -> PermissionState {
        match self.authority.check(caps) {
            PermissionState::Granted => PermissionState::Granted,
            PermissionState::Denied => PermissionState::Denied,
            PermissionState::Pending(token) => PermissionState::Pending(token),
            PermissionState::Unknown => {
                let mut corr = self.lock();
                if let Some(token) = corr.by_caps.get(&caps.key()) {
                    return PermissionState::Pending(*token);
                }

                let token = RequestToken::new();
                let (tx, rx) = oneshot::channel();
                corr.by_caps.insert(caps.key(), token);
                corr.pending.insert(
                    token,
                    PendingEntry {
                        caps_key: caps.key(),
                        receiver: rx,
                    },
                );
                corr.deciders.insert(token, tx);
                drop(corr);

                debug!(caps = %caps, token = %token, "firing permission prompt");
                self.authority.request(caps, token);
                PermissionState::Pending(token)
            }
        }
    }

    /// Asynchronous grant/deny callback from the platform glue.
    ///
    /// Resolves exactly the call holding `token`.  Returns `false` when the
    /// token is unknown (already resolved, or never issued).
    pub fn resolve(&self, token: RequestToken, granted: bool) -> bool {
        let decider = self.lock().deciders.remove(&token);
        match decider {
            Some(tx) => {
                debug!(token = %token, granted, "permission decision received");
                // The awaiting side may have given up; that's fine.
                let _ = tx.send(granted);
                true
            }
            None => {
                warn!(token = %token, "permission decision for unknown token");
                false
            }
        }
    }

    /// Suspend until the decision for `token` arrives, bounded by `timeout`.
    ///
    /// Returns `Granted`/`Denied` on a decision, or `Pending(token)` when the
    /// bound expires with the prompt still open (the entry stays live so a
    /// later decision is not lost).
    pub async fn await_decision(&self, token: RequestToken, timeout: Duration) -> PermissionState {
        let entry = self.lock().pending.remove(&token);
        let Some(mut entry) = entry else {
            // Already consumed by an earlier await; report what we know.
            return PermissionState::Unknown;
        };

        match tokio::time::timeout(timeout, &mut entry.receiver).await {
            Ok(Ok(true)) => {
                self.clear(&entry.caps_key, token);
                PermissionState::Granted
            }
            Ok(Ok(false)) => {
                self.clear(&entry.caps_key, token);
                PermissionState::Denied
            }
            Ok(Err(_)) => {
                // Decider dropped without a decision; treat as denial.
                warn!(token = %token, "permission prompt abandoned");
                self.clear(&entry.caps_key, token);
                PermissionState::Denied
            }
            Err(_) => {
                debug!(token = %token, "permission wait bound expired");
                self.lock().pending.insert(token, entry);
                PermissionState::Pending(token)
            }
        }
    }

    fn clear(&self, caps_key: &str, token: RequestToken) {
        let mut corr = self.lock();
        if corr.by_caps.get(caps_key) == Some(&token) {
            corr.by_caps.remove(caps_key);
        }
        corr.deciders.remove(&token);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Correlation> {
        self.correlation.lock().expect("correlation lock poisoned")
    }
}
