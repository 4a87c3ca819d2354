/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! The on-device service-number table (spec.md §4.1.5 "External
//! Procedures", §9 "the only process-wide resource is the read-only set of
//! built-in mnemonics, service-number tables, and character encodings").
//!
//! No on-device ROM survives in `original_source/` (build configuration
//! only), so the concrete selector bytes below are this implementation's
//! own choice rather than a recovered device fact. They are documented here
//! once and shared by both sides of the trap: `crate::cc::codegen` encodes
//! a call as `swi` followed by this table's selector byte, and
//! `crate::driver`'s emulator-side dispatcher (used in place of a real ROM
//! image, which this toolchain never has) looks the same byte up to supply
//! the service's effect.
//!
//! A handful of commonly-needed services are named here (console I/O, the
//! `ADDNUM` example from spec.md §8 scenario 6); any other `external`
//! declaration still compiles; its selector is derived deterministically
//! from its on-device name, and the emulator's dispatcher treats an
//! unrecognized selector as a no-op that returns zero, consistent with
//! spec.md's framing of the ROM as an out-of-scope external collaborator.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceReturn {
    Void,
    Int,
    Str,
}

#[derive(Debug, Clone, Copy)]
pub struct ServiceDef {
    /// On-device name, including the `%`/`$` suffix per spec.md §4.1.5.
    pub device_name: &'static str,
    pub selector: u8,
    pub arg_count: u8,
    pub ret: ServiceReturn,
}

pub const SERVICES: &[ServiceDef] = &[
    ServiceDef { device_name: "CLS", selector: 0x01, arg_count: 0, ret: ServiceReturn::Void },
    ServiceDef { device_name: "PUTC", selector: 0x02, arg_count: 1, ret: ServiceReturn::Void },
    ServiceDef { device_name: "PRINT_INT", selector: 0x03, arg_count: 1, ret: ServiceReturn::Void },
    ServiceDef { device_name: "ADDNUM%", selector: 0x05, arg_count: 2, ret: ServiceReturn::Int },
];

/// Builds the on-device name spec.md §4.1.5's table derives from a
/// declaration's C-side kind: the bare name for `void`, `name%` for `int`,
/// `name$` for `char`.
pub fn device_name(c_name: &str, kind: crate::cc::ast::ExternalKind) -> String {
    match kind {
        crate::cc::ast::ExternalKind::Void => c_name.to_string(),
        crate::cc::ast::ExternalKind::Int => format!("{c_name}%"),
        crate::cc::ast::ExternalKind::Char => format!("{c_name}$"),
    }
}

pub fn lookup(device_name: &str) -> Option<&'static ServiceDef> {
    SERVICES.iter().find(|s| s.device_name == device_name)
}

/// Reverse lookup used by `crate::driver`'s service dispatcher, which only
/// has the selector byte it read off the instruction stream to go on.
pub fn lookup_by_selector(selector: u8) -> Option<&'static ServiceDef> {
    SERVICES.iter().find(|s| s.selector == selector)
}

/// Deterministic fallback selector for an `external` not in the known
/// table, so object code stays reproducible across builds even though the
/// emulator's dispatcher (lacking a real ROM) cannot supply a meaningful
/// effect for it. FNV-1a over the on-device name, folded into the unused
/// high half of the selector byte space so it can never collide with a
/// `SERVICES` entry.
pub fn selector_for(device_name: &str) -> u8 {
    if let Some(def) = lookup(device_name) {
        return def.selector;
    }
    let mut hash: u32 = 0x811c_9dc5;
    for b in device_name.bytes() {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    0x80 | ((hash & 0x7F) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cc::ast::ExternalKind;

    #[test]
    fn device_name_applies_the_documented_suffix() {
        assert_eq!(device_name("ADDNUM", ExternalKind::Int), "ADDNUM%");
        assert_eq!(device_name("readstr", ExternalKind::Char), "readstr$");
        assert_eq!(device_name("cls", ExternalKind::Void), "cls");
    }

    #[test]
    fn known_services_resolve_by_exact_device_name() {
        assert_eq!(lookup("ADDNUM%").unwrap().arg_count, 2);
        assert!(lookup("addnum%").is_none());
    }

    #[test]
    fn unknown_externals_get_a_stable_selector_outside_the_known_range() {
        let a = selector_for("FROBNICATE%");
        let b = selector_for("FROBNICATE%");
        assert_eq!(a, b);
        assert!(a >= 0x80);
    }

    #[test]
    fn selectors_resolve_back_to_their_service() {
        assert_eq!(lookup_by_selector(0x05).unwrap().device_name, "ADDNUM%");
        assert!(lookup_by_selector(0x7F).is_none());
    }
}
