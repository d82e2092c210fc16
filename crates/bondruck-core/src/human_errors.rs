// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the people running the till.
//
// Delivery failures surface on a cashier's screen mid-shift, so every
// technical error maps to plain English with a concrete next step.

use crate::error::BondruckError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Momentary glitch — pressing "print again" may well succeed.
    Transient,
    /// User must do something (accept a prompt, pair the printer, plug it in).
    ActionRequired,
    /// Cannot be fixed by retrying or user action on this device.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether pressing "print again" is worth it.
    pub retriable: bool,
    pub severity: Severity,
}

/// Convert a `BondruckError` into a `HumanError` a cashier can act on.
pub fn humanize_error(err: &BondruckError) -> HumanError {
    match err {
        BondruckError::PermissionDenied(detail) => HumanError {
            message: "The printer connection was blocked.".into(),
            suggestion: format!(
                "Open your device settings and allow this app to use the printer, \
                 then try again. ({detail})"
            ),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        BondruckError::NoTransportAvailable(detail) => HumanError {
            message: "We couldn't reach any printer.".into(),
            suggestion: format!(
                "Check that the printer is switched on, and that it is either \
                 plugged into this device or paired over Bluetooth. ({detail})"
            ),
            retriable: true,
            severity: Severity::ActionRequired,
        },

        BondruckError::DeviceNotFound(detail) => HumanError {
            message: "That printer isn't paired with this device.".into(),
            suggestion: format!(
                "Pair the printer in Bluetooth settings first, or pick a \
                 different printer. ({detail})"
            ),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        BondruckError::Transport(detail) => HumanError {
            message: "The printer stopped responding while printing.".into(),
            suggestion: format!(
                "Make sure the cable is seated or the printer is in range, \
                 then print again. ({detail})"
            ),
            retriable: true,
            severity: Severity::Transient,
        },

        BondruckError::Cancelled => HumanError {
            message: "Printing was cancelled.".into(),
            suggestion: "Nothing was harmed — print again whenever you're ready.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        BondruckError::InvalidRequest(detail) => HumanError {
            message: "There was nothing to print.".into(),
            suggestion: format!(
                "This looks like an app problem, not a printer problem. ({detail})"
            ),
            retriable: false,
            severity: Severity::Permanent,
        },

        BondruckError::Busy(_) => HumanError {
            message: "The printer is busy with earlier receipts.".into(),
            suggestion: "Give it a moment to catch up, then print again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        BondruckError::Io(detail) => HumanError {
            message: "A local file problem got in the way.".into(),
            suggestion: format!("Try again; if it keeps happening, restart the app. ({detail})"),
            retriable: true,
            severity: Severity::Transient,
        },

        BondruckError::Serialization(detail) => HumanError {
            message: "The print request was garbled.".into(),
            suggestion: format!("This looks like an app problem. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denial_is_not_retriable() {
        let h = humanize_error(&BondruckError::PermissionDenied("bluetooth".into()));
        assert!(!h.retriable);
        assert_eq!(h.severity, Severity::ActionRequired);
    }

    #[test]
    fn transport_errors_are_transient() {
        let h = humanize_error(&BondruckError::Transport("bulk write failed".into()));
        assert!(h.retriable);
        assert_eq!(h.severity, Severity::Transient);
        assert!(h.suggestion.contains("bulk write failed"));
    }

    #[test]
    fn cancellation_reads_as_harmless() {
        let h = humanize_error(&BondruckError::Cancelled);
        assert!(h.retriable);
        assert!(h.message.to_lowercase().contains("cancelled"));
    }
}
