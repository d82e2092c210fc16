// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device selector: deterministic priority chain over the candidate set.
//
// 1. exact address hint (a miss is final — no fallback)
// 2. name substring hint
// 3. printer-likeness keyword heuristic
// 4. first candidate in enumeration order
//
// Enumeration order comes from the platform and is non-deterministic; rule 4
// exists so the no-hint single-device shop still works, not because the
// order means anything.

use tracing::debug;

use bondruck_core::error::{BondruckError, Result};
use bondruck_core::types::{DeviceDescriptor, SelectionHint};

/// Name tokens that mark a device as printer-like.  Vendor/model tokens
/// cover the cheap thermal units common behind POS counters.
pub const PRINTER_KEYWORDS: &[&str] = &[
    "printer", "print", "pos", "thermal", "receipt", "escpos", "epson", "sunmi", "goojprt", "rpp",
    "mtp",
];

/// Pick exactly one device from `candidates`, or fail with `DeviceNotFound`.
pub fn select(candidates: &[DeviceDescriptor], hint: &SelectionHint) -> Result<DeviceDescriptor> {
    if let Some(address) = hint.exact_address.as_deref() {
        return candidates
            .iter()
            .find(|d| d.address.eq_ignore_ascii_case(address))
            .cloned()
            .ok_or_else(|| {
                BondruckError::DeviceNotFound(format!("no bonded device with address {address}"))
            });
    }

    if candidates.is_empty() {
        return Err(BondruckError::DeviceNotFound(
            "candidate set is empty".into(),
        ));
    }

    if let Some(fragment) = hint.name_substring.as_deref() {
        let needle = fragment.to_lowercase();
        if let Some(found) = candidates.iter().find(|d| d.name_lower().contains(&needle)) {
            debug!(address = %found.address, fragment, "selected by name substring");
            return Ok(found.clone());
        }
        // Substring missed: fall through to the heuristic, same as no hint.
    }

    if let Some(found) = candidates.iter().find(|d| looks_like_printer(d)) {
        debug!(address = %found.address, "selected by printer-likeness heuristic");
        return Ok(found.clone());
    }

    debug!(address = %candidates[0].address, "selected first candidate in enumeration order");
    Ok(candidates[0].clone())
}

fn looks_like_printer(device: &DeviceDescriptor) -> bool {
    let name = device.name_lower();
    !name.is_empty() && PRINTER_KEYWORDS.iter().any(|kw| name.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bondruck_core::types::TransportKind;

    fn dev(address: &str, name: Option<&str>) -> DeviceDescriptor {
        DeviceDescriptor {
            address: address.into(),
            name: name.map(String::from),
            transport: TransportKind::Wireless,
            bonded: true,
        }
    }

    fn hint_addr(addr: &str) -> SelectionHint {
        SelectionHint {
            exact_address: Some(addr.into()),
            name_substring: None,
        }
    }

    fn hint_name(fragment: &str) -> SelectionHint {
        SelectionHint {
            exact_address: None,
            name_substring: Some(fragment.into()),
        }
    }

    #[test]
    fn exact_address_is_case_insensitive() {
        let set = [dev("AA:BB:CC", Some("X")), dev("DD:EE:FF", Some("Y"))];
        let chosen = select(&set, &hint_addr("aa:bb:cc")).expect("select");
        assert_eq!(chosen.name.as_deref(), Some("X"));
    }

    #[test]
    fn exact_address_miss_is_final() {
        let set = [dev("AA:BB:CC", Some("SimuPrinter"))];
        let err = select(&set, &hint_addr("11:22:33")).expect_err("must miss");
        assert!(matches!(err, BondruckError::DeviceNotFound(_)));
    }

    #[test]
    fn exact_address_beats_name_hint() {
        let set = [dev("AA", Some("SimuPrinter")), dev("BB", Some("Target"))];
        let hint = SelectionHint {
            exact_address: Some("BB".into()),
            name_substring: Some("simu".into()),
        };
        assert_eq!(select(&set, &hint).expect("select").address, "BB");
    }

    #[test]
    fn name_substring_matches_case_insensitively() {
        let set = [dev("AA", Some("Kitchen")), dev("BB", Some("RP-326 Front"))];
        let chosen = select(&set, &hint_name("rp-326")).expect("select");
        assert_eq!(chosen.address, "BB");
    }

    #[test]
    fn missed_substring_falls_back_to_heuristic() {
        let set = [dev("AA", Some("Foo")), dev("BB", Some("SimuPrinter"))];
        let chosen = select(&set, &hint_name("nosuch")).expect("select");
        assert_eq!(chosen.address, "BB");
    }

    #[test]
    fn heuristic_finds_printer_like_name_regardless_of_position() {
        for printer_at in 0..3 {
            let mut set = vec![
                dev("AA", Some("Headset")),
                dev("BB", Some("Car Audio")),
                dev("CC", Some("Speaker")),
            ];
            set[printer_at] = dev("PP", Some("SimuPrinter"));
            let chosen = select(&set, &SelectionHint::default()).expect("select");
            assert_eq!(chosen.address, "PP", "printer at index {printer_at}");
        }
    }

    #[test]
    fn heuristic_beats_enumeration_order() {
        let set = [dev("AA", Some("Foo")), dev("BB", Some("SimuPrinter"))];
        let chosen = select(&set, &SelectionHint::default()).expect("select");
        assert_eq!(chosen.name.as_deref(), Some("SimuPrinter"));
    }

    #[test]
    fn no_hint_no_printer_name_takes_first() {
        let set = [dev("AA", Some("Foo")), dev("BB", Some("Bar"))];
        let chosen = select(&set, &SelectionHint::default()).expect("select");
        assert_eq!(chosen.address, "AA");
    }

    #[test]
    fn unnamed_devices_never_match_the_heuristic() {
        let set = [dev("AA", None), dev("BB", Some("POS-58"))];
        let chosen = select(&set, &SelectionHint::default()).expect("select");
        assert_eq!(chosen.address, "BB");
    }

    #[test]
    fn empty_set_is_device_not_found() {
        let err = select(&[], &SelectionHint::default()).expect_err("empty set");
        assert!(matches!(err, BondruckError::DeviceNotFound(_)));
    }
}
