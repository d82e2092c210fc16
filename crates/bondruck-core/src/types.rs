// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Bondruck transport engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The two physical links a payload can travel over.  Exhaustive by design —
/// network printing, vendor AIDL bridges, etc. live outside this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Bulk-capable point-to-point cable link (USB OTG or direct).
    Wired,
    /// Short-range connection-oriented wireless serial link (Bluetooth SPP).
    Wireless,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wired => write!(f, "wired"),
            Self::Wireless => write!(f, "wireless"),
        }
    }
}

/// A device visible on one of the transports.
///
/// Produced fresh for every delivery call and discarded when the call
/// resolves — there is no persistent device cache.  The address is unique
/// within one transport's candidate set, nothing more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Platform identity: a USB device path or a Bluetooth MAC address.
    pub address: String,
    /// Human-readable name, when the platform reports one.
    pub name: Option<String>,
    pub transport: TransportKind,
    /// Whether the OS remembers this device across sessions.
    pub bonded: bool,
}

impl DeviceDescriptor {
    /// Lowercased name for case-insensitive matching; empty if unnamed.
    pub fn name_lower(&self) -> String {
        self.name.as_deref().unwrap_or_default().to_lowercase()
    }
}

/// Caller-supplied targeting hint.  At most one hint is honoured per call;
/// an exact address always takes precedence over a name substring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionHint {
    /// Match a bonded device by case-insensitive address equality.
    /// A miss is a hard `DeviceNotFound` — no heuristic fallback.
    pub exact_address: Option<String>,
    /// Case-insensitive substring over bonded device names.
    pub name_substring: Option<String>,
}

impl SelectionHint {
    pub fn is_empty(&self) -> bool {
        self.exact_address.is_none() && self.name_substring.is_none()
    }
}

/// Correlation token for an asynchronous permission decision.
///
/// Every permission request gets its own token; the grant/deny callback
/// resolves exactly the call holding that token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestToken(pub Uuid);

impl RequestToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authorization state for a capability set.
///
/// Legal transitions: Unknown/Denied → Pending → {Granted, Denied}.
/// Granted never transitions backward inside one delivery call; a platform
/// revocation mid-session surfaces as an I/O permission error on the next
/// channel operation instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    /// Not yet asked.
    Unknown,
    Granted,
    /// A prompt is in flight; the decision will arrive under this token.
    Pending(RequestToken),
    Denied,
}

/// What a permission request covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CapabilitySet {
    /// Wired authorization is per physical device identity, one-shot.
    WiredDevice(String),
    /// Wireless needs connect and scan granted together.
    Wireless,
}

impl CapabilitySet {
    /// Stable key for correlation-map lookups.
    pub fn key(&self) -> String {
        match self {
            Self::WiredDevice(addr) => format!("wired:{}", addr.to_lowercase()),
            Self::Wireless => "wireless".into(),
        }
    }
}

impl std::fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WiredDevice(addr) => write!(f, "wired device {addr}"),
            Self::Wireless => write!(f, "wireless connect+scan"),
        }
    }
}

/// Lifecycle of one delivery session.  Closed and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    Streaming,
    Closed,
    Failed,
}

/// Why a transport produced no usable candidate.
///
/// This is a classification, not an error: the orchestrator branches on it
/// to decide whether falling back to the other transport makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The transport subsystem does not exist on this host.
    SubsystemMissing,
    /// The adapter exists but is switched off.
    AdapterDisabled,
    /// Enumeration ran but yielded no viable device.
    NoCandidates,
    /// A permission grant was still pending when the wait bound expired.
    PermissionPending,
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubsystemMissing => write!(f, "transport subsystem missing"),
            Self::AdapterDisabled => write!(f, "adapter disabled"),
            Self::NoCandidates => write!(f, "no viable device"),
            Self::PermissionPending => write!(f, "permission grant still pending"),
        }
    }
}

/// A delivery request as it crosses the engine boundary.
///
/// The payload arrives already serialized (ESC/POS or any other byte
/// protocol) — this engine never inspects or validates its content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRequest {
    /// Opaque, non-empty byte payload.  Owned exclusively by the delivery
    /// call for its duration.
    pub payload: Vec<u8>,
    /// Optional exact wireless address to target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_address: Option<String>,
    /// Optional name substring to target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_hint: Option<String>,
}

impl DeliveryRequest {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            target_address: None,
            name_hint: None,
        }
    }

    /// Derive the selection hint for this request.
    pub fn hint(&self) -> SelectionHint {
        SelectionHint {
            exact_address: self.target_address.clone(),
            name_substring: self.name_hint.clone(),
        }
    }
}

/// Successful delivery response: which transport carried the payload.
///
/// Success means every byte was accepted by the local transport without a
/// transport error.  Neither link offers an application-level acknowledgment,
/// so physical print completion is not guaranteed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub via: TransportKind,
}

/// One entry of the bonded-device diagnostic listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BondedDeviceInfo {
    pub name: Option<String>,
    pub address: String,
}

/// Reply to a fire-and-forget pairing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairReply {
    /// Whether the platform accepted the bond initiation.  Completion of the
    /// actual pairing (PIN entry etc.) happens out-of-band.
    pub started: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kind_serializes_lowercase() {
        let json = serde_json::to_string(&TransportKind::Wired).expect("serialize");
        assert_eq!(json, "\"wired\"");
        let json = serde_json::to_string(&TransportKind::Wireless).expect("serialize");
        assert_eq!(json, "\"wireless\"");
    }

    #[test]
    fn request_hint_prefers_given_fields() {
        let mut req = DeliveryRequest::new(vec![1]);
        req.target_address = Some("AA:BB".into());
        req.name_hint = Some("pos".into());

        let hint = req.hint();
        assert_eq!(hint.exact_address.as_deref(), Some("AA:BB"));
        assert_eq!(hint.name_substring.as_deref(), Some("pos"));
        assert!(!hint.is_empty());
    }

    #[test]
    fn capability_keys_are_case_insensitive_per_device() {
        let a = CapabilitySet::WiredDevice("USB:1-2".into());
        let b = CapabilitySet::WiredDevice("usb:1-2".into());
        assert_eq!(a.key(), b.key());
        assert_ne!(a.key(), CapabilitySet::Wireless.key());
    }

    #[test]
    fn request_round_trips_through_json() {
        let req = DeliveryRequest {
            payload: vec![0x1B, 0x40, 0x41],
            target_address: Some("AA:BB:CC:DD:EE:FF".into()),
            name_hint: None,
        };
        let json = serde_json::to_string(&req).expect("serialize");
        let back: DeliveryRequest = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.payload, req.payload);
        assert_eq!(back.target_address, req.target_address);
        assert!(back.name_hint.is_none());
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(RequestToken::new(), RequestToken::new());
    }
}
