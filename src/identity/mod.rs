//! Processor identification: model naming, microarchitecture, process node.
//!
//! Three ordered tables per vendor, all scanned linearly with
//! first-match-wins semantics:
//!
//! 1. a model-name table mapping a masked version word (plus an optional
//!    predicate over auxiliary signals) to a marketing family name,
//! 2. a microarchitecture table filling in the microarchitecture name and
//!    the physical process node,
//! 3. a brand-ID fallback table for parts that predate the free-text brand
//!    string leaves.
//!
//! Entry order encodes specificity: exact family+model+stepping rows with
//! predicates come first, family-only catch-alls last. Do not reorder. A
//! handful of rows deliberately repeat the same mask+pattern with different
//! predicates; the first whose predicate passes wins.

use serde::{Deserialize, Serialize};

use crate::cache::{CacheDescriptor, CacheKind};
use crate::features::FeatureSet;
use crate::version::{Vendor, VersionRecord};

/// Auxiliary decode outputs consulted by match-rule predicates.
pub struct Signals<'a> {
    pub caches: &'a [CacheDescriptor],
    pub brand_string: Option<&'a str>,
    pub core_count: u16,
    pub features: &'a FeatureSet,
    /// Raw brand-ID byte from the primary feature leaf (0 when absent).
    pub brand_id: u8,
}

impl<'a> Signals<'a> {
    pub fn has_feature(&self, name: &str) -> bool {
        self.features.has_feature(name)
    }

    /// Largest level-2 cache observed, in KiB.
    pub fn l2_size_kb(&self) -> u64 {
        self.level_size_kb(2)
    }

    /// Largest level-3 cache observed, in KiB.
    pub fn l3_size_kb(&self) -> u64 {
        self.level_size_kb(3)
    }

    fn level_size_kb(&self, level: u8) -> u64 {
        self.caches
            .iter()
            .filter(|c| {
                c.level == level && matches!(c.kind, CacheKind::Unified | CacheKind::Data)
            })
            .filter_map(|c| c.size_bytes)
            .max()
            .unwrap_or(0)
            / 1024
    }

    fn brand_contains(&self, needle: &str) -> bool {
        self.brand_string.is_some_and(|b| b.contains(needle))
    }
}

/// Structured identification outcome. Produced once per pass, immutable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityResult {
    pub vendor_display: String,
    pub microarchitecture: Option<String>,
    pub family_display: Option<String>,
    pub physical_process: Option<String>,
    pub brand_string: Option<String>,
}

type Predicate = fn(&Signals) -> bool;

/// One row of the model-name table.
struct ModelRule {
    mask: u32,
    pattern: u32,
    predicate: Option<Predicate>,
    name: &'static str,
}

/// One row of the microarchitecture/process table.
struct UarchRule {
    mask: u32,
    pattern: u32,
    uarch: &'static str,
    process: &'static str,
}

// Version-word field masks. Stepping [0,4), model [4,8), family [8,12),
// ext model [16,20), ext family [20,28).
const M_FAMILY: u32 = 0x0FF0_0F00;
const M_MODEL: u32 = 0x0FFF_0FF0;
const M_STEPPING: u32 = 0x0FFF_0FFF;

/// Compose a version-word pattern from its four signature fields.
const fn sig(ext_family: u32, ext_model: u32, family: u32, model: u32) -> u32 {
    (ext_family << 20) | (ext_model << 16) | (family << 8) | (model << 4)
}

/// Intel family-6 shorthand.
const fn f6(ext_model: u32, model: u32) -> u32 {
    sig(0, ext_model, 6, model)
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

fn p_mobile(s: &Signals) -> bool {
    s.brand_contains("Mobile")
        || s.brand_contains("mobile")
        || matches!(s.brand_id, 0x06 | 0x07 | 0x0E | 0x0F | 0x11 | 0x13 | 0x15 | 0x17)
}

fn p_celeron(s: &Signals) -> bool {
    s.brand_contains("Celeron") || matches!(s.brand_id, 0x01 | 0x0A | 0x12 | 0x14)
}

fn p_xeon(s: &Signals) -> bool {
    s.brand_contains("Xeon") || matches!(s.brand_id, 0x0B | 0x0C)
}

fn p_no_l2(s: &Signals) -> bool {
    s.l2_size_kb() == 0
}

fn p_l2_128k(s: &Signals) -> bool {
    s.l2_size_kb() == 128
}

fn p_l2_256k(s: &Signals) -> bool {
    s.l2_size_kb() == 256
}

fn p_l2_512k(s: &Signals) -> bool {
    s.l2_size_kb() == 512
}

fn p_dual_core(s: &Signals) -> bool {
    s.core_count >= 2
}

// ---------------------------------------------------------------------------
// Intel model-name table
// ---------------------------------------------------------------------------

macro_rules! rule {
    ($mask:expr, $pattern:expr, $name:expr) => {
        ModelRule { mask: $mask, pattern: $pattern, predicate: None, name: $name }
    };
    ($mask:expr, $pattern:expr, $pred:expr, $name:expr) => {
        ModelRule { mask: $mask, pattern: $pattern, predicate: Some($pred), name: $name }
    };
}

#[rustfmt::skip]
const INTEL_MODELS: &[ModelRule] = &[
    // Family 6, newest first within each specificity band.
    rule!(M_MODEL, f6(0xC, 0x6), "Core Ultra (Arrow Lake)"),
    rule!(M_MODEL, f6(0xB, 0xD), "Core Ultra (Lunar Lake)"),
    rule!(M_MODEL, f6(0xA, 0xA), "Core Ultra (Meteor Lake)"),
    rule!(M_MODEL, f6(0xA, 0xD), "Xeon (Granite Rapids)"),
    rule!(M_MODEL, f6(0xC, 0xF), "Xeon (Emerald Rapids)"),
    rule!(M_MODEL, f6(0x8, 0xF), "Xeon (Sapphire Rapids)"),
    rule!(M_MODEL, f6(0xB, 0x7), "Core (Raptor Lake)"),
    rule!(M_MODEL, f6(0xB, 0xA), "Core (Raptor Lake-P)"),
    rule!(M_MODEL, f6(0xB, 0xF), "Core (Raptor Lake)"),
    rule!(M_MODEL, f6(0x9, 0x7), "Core (Alder Lake)"),
    rule!(M_MODEL, f6(0x9, 0xA), "Core (Alder Lake-P)"),
    rule!(M_MODEL, f6(0xA, 0x7), "Core (Rocket Lake)"),
    rule!(M_MODEL, f6(0x8, 0xC), "Core (Tiger Lake-U)"),
    rule!(M_MODEL, f6(0x8, 0xD), "Core (Tiger Lake-H)"),
    rule!(M_MODEL, f6(0x7, 0xE), "Core (Ice Lake-U)"),
    rule!(M_MODEL, f6(0x6, 0xA), "Xeon (Ice Lake-SP)"),
    rule!(M_MODEL, f6(0x6, 0xC), "Xeon (Ice Lake-D)"),
    rule!(M_MODEL, f6(0xA, 0x5), "Core (Comet Lake)"),
    rule!(M_MODEL, f6(0xA, 0x6), "Core (Comet Lake-U)"),
    // Stepping-split signatures: exact-stepping rows precede the fallback.
    rule!(M_STEPPING, f6(0x8, 0xE) | 0x9, "Core (Kaby Lake-U)"),
    rule!(M_STEPPING, f6(0x8, 0xE) | 0xA, "Core (Coffee Lake-U)"),
    rule!(M_STEPPING, f6(0x8, 0xE) | 0xB, "Core (Whiskey Lake-U)"),
    rule!(M_STEPPING, f6(0x8, 0xE) | 0xC, "Core (Comet Lake-U)"),
    rule!(M_MODEL, f6(0x8, 0xE), "Core (Kaby Lake-U)"),
    rule!(M_STEPPING, f6(0x9, 0xE) | 0x9, "Core (Kaby Lake)"),
    rule!(M_MODEL, f6(0x9, 0xE), "Core (Coffee Lake)"),
    rule!(M_STEPPING, f6(0x5, 0x5) | 0x7, "Xeon (Cascade Lake)"),
    rule!(M_STEPPING, f6(0x5, 0x5) | 0xB, "Xeon (Cooper Lake)"),
    rule!(M_MODEL, f6(0x5, 0x5), "Xeon (Skylake-SP)"),
    rule!(M_MODEL, f6(0x4, 0xE), "Core (Skylake-U)"),
    rule!(M_MODEL, f6(0x5, 0xE), "Core (Skylake)"),
    rule!(M_MODEL, f6(0x3, 0xD), "Core (Broadwell-U)"),
    rule!(M_MODEL, f6(0x4, 0x7), "Core (Broadwell-H)"),
    rule!(M_MODEL, f6(0x4, 0xF), "Xeon (Broadwell-E)"),
    rule!(M_MODEL, f6(0x5, 0x6), "Xeon D (Broadwell-DE)"),
    rule!(M_MODEL, f6(0x3, 0xC), "Core (Haswell)"),
    rule!(M_MODEL, f6(0x4, 0x5), "Core (Haswell-ULT)"),
    rule!(M_MODEL, f6(0x4, 0x6), "Core (Haswell-GT3e)"),
    rule!(M_MODEL, f6(0x3, 0xF), "Xeon (Haswell-E)"),
    rule!(M_MODEL, f6(0x3, 0xA), "Core (Ivy Bridge)"),
    rule!(M_MODEL, f6(0x3, 0xE), "Xeon (Ivy Bridge-E)"),
    rule!(M_MODEL, f6(0x2, 0xA), "Core (Sandy Bridge)"),
    rule!(M_MODEL, f6(0x2, 0xD), "Xeon (Sandy Bridge-E)"),
    rule!(M_MODEL, f6(0x2, 0x5), "Core (Clarkdale)"),
    rule!(M_MODEL, f6(0x2, 0xC), "Xeon (Gulftown)"),
    rule!(M_MODEL, f6(0x2, 0xF), "Xeon (Westmere-EX)"),
    rule!(M_MODEL, f6(0x1, 0xA), "Core i7 (Bloomfield)"),
    rule!(M_MODEL, f6(0x1, 0xE), "Core (Lynnfield)"),
    rule!(M_MODEL, f6(0x2, 0xE), "Xeon (Nehalem-EX)"),
    // Atom line.
    rule!(M_MODEL, f6(0x9, 0xC), "Pentium Silver (Jasper Lake)"),
    rule!(M_MODEL, f6(0x8, 0xA), "Core (Lakefield)"),
    rule!(M_MODEL, f6(0x7, 0xA), "Pentium Silver (Gemini Lake)"),
    rule!(M_MODEL, f6(0x5, 0xC), "Atom (Apollo Lake)"),
    rule!(M_MODEL, f6(0x4, 0xC), "Atom (Cherry Trail)"),
    rule!(M_MODEL, f6(0x3, 0x7), "Atom (Bay Trail)"),
    rule!(M_MODEL, f6(0x1, 0xC), "Atom (Bonnell)"),
    // Core 2 era.
    rule!(M_MODEL, f6(0x1, 0x7), p_xeon, "Xeon (Penryn)"),
    rule!(M_MODEL, f6(0x1, 0x7), "Core 2 (Penryn)"),
    rule!(M_MODEL, f6(0x1, 0xD), "Xeon (Dunnington)"),
    rule!(M_MODEL, f6(0x1, 0x6), "Core 2 (Merom-L)"),
    rule!(M_MODEL, f6(0x0, 0xF), "Core 2 (Merom)"),
    // Same mask+pattern twice: mobile predicate row first, plain fallback
    // second. Order is load-bearing.
    rule!(M_MODEL, f6(0x0, 0xE), p_mobile, "Core Duo (Yonah)"),
    rule!(M_MODEL, f6(0x0, 0xE), "Core (Yonah)"),
    rule!(M_MODEL, f6(0x0, 0xD), "Pentium M (Dothan)"),
    rule!(M_MODEL, f6(0x0, 0x9), "Pentium M (Banias)"),
    // P6 line; cache-size predicates separate Celeron cuts.
    rule!(M_MODEL, f6(0x0, 0xB), "Pentium III (Tualatin)"),
    rule!(M_MODEL, f6(0x0, 0xA), "Pentium III Xeon (Cascades)"),
    rule!(M_MODEL, f6(0x0, 0x8), p_l2_128k, "Celeron (Coppermine-128)"),
    rule!(M_MODEL, f6(0x0, 0x8), p_mobile, "Mobile Pentium III (Coppermine)"),
    rule!(M_MODEL, f6(0x0, 0x8), "Pentium III (Coppermine)"),
    rule!(M_MODEL, f6(0x0, 0x7), "Pentium III (Katmai)"),
    rule!(M_MODEL, f6(0x0, 0x6), p_l2_128k, "Celeron (Mendocino)"),
    rule!(M_MODEL, f6(0x0, 0x6), "Pentium II (Dixon)"),
    rule!(M_MODEL, f6(0x0, 0x5), p_no_l2, "Celeron (Covington)"),
    rule!(M_MODEL, f6(0x0, 0x5), "Pentium II (Deschutes)"),
    rule!(M_MODEL, f6(0x0, 0x3), "Pentium II (Klamath)"),
    rule!(M_MODEL, f6(0x0, 0x1), "Pentium Pro"),
    // NetBurst.
    rule!(M_MODEL, sig(0, 0, 0xF, 0x6), p_dual_core, "Pentium D (Presler)"),
    rule!(M_MODEL, sig(0, 0, 0xF, 0x6), "Pentium 4 (Cedar Mill)"),
    rule!(M_MODEL, sig(0, 0, 0xF, 0x4), p_dual_core, "Pentium D (Smithfield)"),
    rule!(M_MODEL, sig(0, 0, 0xF, 0x4), "Pentium 4 (Prescott-2M)"),
    rule!(M_MODEL, sig(0, 0, 0xF, 0x3), "Pentium 4 (Prescott)"),
    rule!(M_MODEL, sig(0, 0, 0xF, 0x2), p_mobile, "Mobile Pentium 4 (Northwood)"),
    rule!(M_MODEL, sig(0, 0, 0xF, 0x2), p_celeron, "Celeron (Northwood-128)"),
    rule!(M_MODEL, sig(0, 0, 0xF, 0x2), "Pentium 4 (Northwood)"),
    rule!(M_MODEL, sig(0, 0, 0xF, 0x1), "Pentium 4 (Willamette)"),
    rule!(M_MODEL, sig(0, 0, 0xF, 0x0), "Pentium 4 (Willamette)"),
    // P5 and i486.
    rule!(M_MODEL, sig(0, 0, 5, 0x4), "Pentium MMX"),
    rule!(M_MODEL, sig(0, 0, 5, 0x8), "Mobile Pentium MMX"),
    rule!(M_MODEL, sig(0, 0, 5, 0x2), "Pentium"),
    rule!(M_MODEL, sig(0, 0, 5, 0x1), "Pentium"),
    rule!(M_MODEL, sig(0, 0, 4, 0x3), "i486 DX2"),
    rule!(M_MODEL, sig(0, 0, 4, 0x8), "i486 DX4"),
    // Family catch-alls.
    rule!(M_FAMILY, sig(0, 0, 6, 0), "Core (unknown)"),
    rule!(M_FAMILY, sig(0, 0, 0xF, 0), "Pentium 4 (unknown)"),
    rule!(M_FAMILY, sig(0, 0, 5, 0), "Pentium (unknown)"),
    rule!(M_FAMILY, sig(0, 0, 4, 0), "i486"),
];

#[rustfmt::skip]
const INTEL_UARCH: &[UarchRule] = &[
    UarchRule { mask: M_MODEL, pattern: f6(0xC, 0x6), uarch: "Lion Cove / Skymont", process: "TSMC N3B" },
    UarchRule { mask: M_MODEL, pattern: f6(0xB, 0xD), uarch: "Lion Cove / Skymont", process: "TSMC N3B" },
    UarchRule { mask: M_MODEL, pattern: f6(0xA, 0xA), uarch: "Redwood Cove / Crestmont", process: "Intel 4" },
    UarchRule { mask: M_MODEL, pattern: f6(0xA, 0xD), uarch: "Redwood Cove", process: "Intel 3" },
    UarchRule { mask: M_MODEL, pattern: f6(0xC, 0xF), uarch: "Raptor Cove", process: "Intel 7" },
    UarchRule { mask: M_MODEL, pattern: f6(0x8, 0xF), uarch: "Golden Cove", process: "Intel 7" },
    UarchRule { mask: M_MODEL, pattern: f6(0xB, 0x7), uarch: "Raptor Cove / Gracemont", process: "Intel 7" },
    UarchRule { mask: M_MODEL, pattern: f6(0xB, 0xA), uarch: "Raptor Cove / Gracemont", process: "Intel 7" },
    UarchRule { mask: M_MODEL, pattern: f6(0xB, 0xF), uarch: "Raptor Cove / Gracemont", process: "Intel 7" },
    UarchRule { mask: M_MODEL, pattern: f6(0x9, 0x7), uarch: "Golden Cove / Gracemont", process: "Intel 7" },
    UarchRule { mask: M_MODEL, pattern: f6(0x9, 0xA), uarch: "Golden Cove / Gracemont", process: "Intel 7" },
    UarchRule { mask: M_MODEL, pattern: f6(0xA, 0x7), uarch: "Cypress Cove", process: "14 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x8, 0xC), uarch: "Willow Cove", process: "10 nm SuperFin" },
    UarchRule { mask: M_MODEL, pattern: f6(0x8, 0xD), uarch: "Willow Cove", process: "10 nm SuperFin" },
    UarchRule { mask: M_MODEL, pattern: f6(0x7, 0xE), uarch: "Sunny Cove", process: "10 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x6, 0xA), uarch: "Sunny Cove", process: "10 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x6, 0xC), uarch: "Sunny Cove", process: "10 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x9, 0xC), uarch: "Tremont", process: "10 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x8, 0xA), uarch: "Sunny Cove / Tremont", process: "10 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x7, 0xA), uarch: "Goldmont Plus", process: "14 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x5, 0xC), uarch: "Goldmont", process: "14 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x4, 0xC), uarch: "Airmont", process: "14 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x3, 0x7), uarch: "Silvermont", process: "22 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x1, 0xC), uarch: "Bonnell", process: "45 nm" },
    // Skylake derivatives share one core design across process tweaks.
    UarchRule { mask: M_MODEL, pattern: f6(0xA, 0x5), uarch: "Skylake", process: "14 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0xA, 0x6), uarch: "Skylake", process: "14 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x8, 0xE), uarch: "Skylake", process: "14 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x9, 0xE), uarch: "Skylake", process: "14 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x5, 0x5), uarch: "Skylake", process: "14 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x4, 0xE), uarch: "Skylake", process: "14 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x5, 0xE), uarch: "Skylake", process: "14 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x3, 0xD), uarch: "Broadwell", process: "14 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x4, 0x7), uarch: "Broadwell", process: "14 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x4, 0xF), uarch: "Broadwell", process: "14 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x5, 0x6), uarch: "Broadwell", process: "14 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x3, 0xC), uarch: "Haswell", process: "22 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x4, 0x5), uarch: "Haswell", process: "22 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x4, 0x6), uarch: "Haswell", process: "22 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x3, 0xF), uarch: "Haswell", process: "22 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x3, 0xA), uarch: "Ivy Bridge", process: "22 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x3, 0xE), uarch: "Ivy Bridge", process: "22 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x2, 0xA), uarch: "Sandy Bridge", process: "32 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x2, 0xD), uarch: "Sandy Bridge", process: "32 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x2, 0x5), uarch: "Westmere", process: "32 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x2, 0xC), uarch: "Westmere", process: "32 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x2, 0xF), uarch: "Westmere", process: "32 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x1, 0xA), uarch: "Nehalem", process: "45 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x1, 0xE), uarch: "Nehalem", process: "45 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x2, 0xE), uarch: "Nehalem", process: "45 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x1, 0x7), uarch: "Penryn", process: "45 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x1, 0xD), uarch: "Penryn", process: "45 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x0, 0xF), uarch: "Merom", process: "65 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x1, 0x6), uarch: "Merom", process: "65 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x0, 0xE), uarch: "P6 (Yonah)", process: "65 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x0, 0xD), uarch: "P6 (Dothan)", process: "90 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x0, 0x9), uarch: "P6 (Banias)", process: "130 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x0, 0xB), uarch: "P6", process: "130 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x0, 0xA), uarch: "P6", process: "180 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x0, 0x8), uarch: "P6", process: "180 nm" },
    UarchRule { mask: M_MODEL, pattern: f6(0x0, 0x7), uarch: "P6", process: "250 nm" },
    UarchRule { mask: M_FAMILY, pattern: sig(0, 0, 6, 0), uarch: "P6", process: "350 nm" },
    UarchRule { mask: M_MODEL, pattern: sig(0, 0, 0xF, 0x6), uarch: "NetBurst", process: "65 nm" },
    UarchRule { mask: M_MODEL, pattern: sig(0, 0, 0xF, 0x4), uarch: "NetBurst", process: "90 nm" },
    UarchRule { mask: M_MODEL, pattern: sig(0, 0, 0xF, 0x3), uarch: "NetBurst", process: "90 nm" },
    UarchRule { mask: M_MODEL, pattern: sig(0, 0, 0xF, 0x2), uarch: "NetBurst", process: "130 nm" },
    UarchRule { mask: M_FAMILY, pattern: sig(0, 0, 0xF, 0), uarch: "NetBurst", process: "180 nm" },
    UarchRule { mask: M_FAMILY, pattern: sig(0, 0, 5, 0), uarch: "P5", process: "350 nm" },
];

// ---------------------------------------------------------------------------
// AMD tables. Family 0xF signatures carry the real family in the extended
// field (synth family = 0xF + ext), so patterns spell out both.
// ---------------------------------------------------------------------------

#[rustfmt::skip]
const AMD_MODELS: &[ModelRule] = &[
    // Zen 5.
    rule!(M_MODEL, sig(0xB, 0x4, 0xF, 0x4), "Ryzen (Granite Ridge)"),
    rule!(M_MODEL, sig(0xB, 0x2, 0xF, 0x4), "Ryzen AI (Strix Point)"),
    rule!(M_FAMILY, sig(0xB, 0, 0xF, 0), "Ryzen (Zen 5)"),
    // Zen 3 / Zen 4 (family 0x19).
    rule!(M_MODEL, sig(0xA, 0x6, 0xF, 0x1), "Ryzen (Raphael)"),
    rule!(M_MODEL, sig(0xA, 0x7, 0xF, 0x0), "Ryzen (Phoenix)"),
    rule!(M_MODEL, sig(0xA, 0x1, 0xF, 0x1), "EPYC (Genoa)"),
    rule!(M_MODEL, sig(0xA, 0x2, 0xF, 0x1), "Ryzen (Vermeer)"),
    rule!(M_MODEL, sig(0xA, 0x5, 0xF, 0x0), "Ryzen (Cezanne)"),
    rule!(M_MODEL, sig(0xA, 0x4, 0xF, 0x0), "Ryzen (Rembrandt)"),
    rule!(M_MODEL, sig(0xA, 0x0, 0xF, 0x1), "EPYC (Milan)"),
    rule!(M_FAMILY, sig(0xA, 0, 0xF, 0), "Ryzen (Zen 3)"),
    // Zen / Zen+ / Zen 2 (family 0x17).
    rule!(M_MODEL, sig(0x8, 0x7, 0xF, 0x1), "Ryzen (Matisse)"),
    rule!(M_MODEL, sig(0x8, 0x3, 0xF, 0x1), "EPYC (Rome)"),
    rule!(M_MODEL, sig(0x8, 0x6, 0xF, 0x0), "Ryzen (Renoir)"),
    rule!(M_MODEL, sig(0x8, 0x6, 0xF, 0x8), "Ryzen (Lucienne)"),
    rule!(M_MODEL, sig(0x8, 0x9, 0xF, 0x0), "Ryzen (Van Gogh)"),
    rule!(M_MODEL, sig(0x8, 0x1, 0xF, 0x8), "Ryzen (Picasso)"),
    rule!(M_MODEL, sig(0x8, 0x1, 0xF, 0x1), "Ryzen (Raven Ridge)"),
    rule!(M_MODEL, sig(0x8, 0x0, 0xF, 0x8), "Ryzen (Pinnacle Ridge)"),
    rule!(M_MODEL, sig(0x8, 0x0, 0xF, 0x1), "Ryzen (Summit Ridge)"),
    rule!(M_MODEL, sig(0x8, 0x0, 0xF, 0x7), "EPYC (Naples)"),
    rule!(M_FAMILY, sig(0x8, 0, 0xF, 0), "Ryzen (Zen)"),
    // Bulldozer line (family 0x15) and cats (0x14, 0x16).
    rule!(M_MODEL, sig(0x6, 0x6, 0xF, 0x0), "A-Series (Carrizo)"),
    rule!(M_MODEL, sig(0x6, 0x3, 0xF, 0x0), "A-Series (Kaveri)"),
    rule!(M_MODEL, sig(0x6, 0x1, 0xF, 0x0), "A-Series (Trinity)"),
    rule!(M_MODEL, sig(0x6, 0x0, 0xF, 0x1), "FX (Zambezi)"),
    rule!(M_MODEL, sig(0x6, 0x0, 0xF, 0x2), "FX (Vishera)"),
    rule!(M_FAMILY, sig(0x6, 0, 0xF, 0), "FX (Bulldozer)"),
    rule!(M_FAMILY, sig(0x7, 0, 0xF, 0), "Athlon (Jaguar)"),
    rule!(M_FAMILY, sig(0x5, 0, 0xF, 0), "E-Series (Bobcat)"),
    rule!(M_FAMILY, sig(0x3, 0, 0xF, 0), "A-Series (Llano)"),
    // K10 (family 0x10).
    rule!(M_MODEL, sig(0x1, 0x0, 0xF, 0x2), "Phenom (Agena)"),
    rule!(M_MODEL, sig(0x1, 0x0, 0xF, 0x4), "Phenom II (Deneb)"),
    rule!(M_MODEL, sig(0x1, 0x0, 0xF, 0x6), "Phenom II (Thuban)"),
    rule!(M_FAMILY, sig(0x1, 0, 0xF, 0), "Phenom (K10)"),
    // K8 (family 0xF, no extension).
    rule!(M_MODEL, sig(0, 0, 0xF, 0x4), "Athlon 64 (Clawhammer)"),
    rule!(M_MODEL, sig(0, 0, 0xF, 0x5), "Opteron (Sledgehammer)"),
    rule!(M_MODEL, sig(0, 0, 0xF, 0xC), "Athlon 64 (Newcastle)"),
    rule!(M_FAMILY, sig(0, 0, 0xF, 0), "Athlon 64 (K8)"),
    // K7 (family 6). Barton and Thorton share a signature; the L2 size
    // predicate rows stay in authored order, duplicates included.
    rule!(M_MODEL, sig(0, 0, 6, 0xA), p_l2_512k, "Athlon XP (Barton)"),
    rule!(M_MODEL, sig(0, 0, 6, 0xA), p_l2_256k, "Athlon XP (Thorton)"),
    rule!(M_MODEL, sig(0, 0, 6, 0xA), "Athlon XP"),
    rule!(M_MODEL, sig(0, 0, 6, 0x8), "Athlon XP (Thoroughbred)"),
    rule!(M_MODEL, sig(0, 0, 6, 0x7), "Duron (Morgan)"),
    rule!(M_MODEL, sig(0, 0, 6, 0x6), "Athlon XP (Palomino)"),
    rule!(M_MODEL, sig(0, 0, 6, 0x4), "Athlon (Thunderbird)"),
    rule!(M_MODEL, sig(0, 0, 6, 0x3), "Duron (Spitfire)"),
    rule!(M_MODEL, sig(0, 0, 6, 0x2), "Athlon (K75)"),
    rule!(M_MODEL, sig(0, 0, 6, 0x1), "Athlon (K7)"),
    rule!(M_FAMILY, sig(0, 0, 6, 0), "Athlon"),
    // K6 and K5 (family 5).
    rule!(M_MODEL, sig(0, 0, 5, 0x9), "K6-III (Sharptooth)"),
    rule!(M_MODEL, sig(0, 0, 5, 0x8), "K6-2 (Chomper)"),
    rule!(M_MODEL, sig(0, 0, 5, 0x7), "K6 (Little Foot)"),
    rule!(M_MODEL, sig(0, 0, 5, 0x6), "K6 (Model 6)"),
    rule!(M_FAMILY, sig(0, 0, 5, 0), "K5"),
    rule!(M_FAMILY, sig(0, 0, 4, 0), "Am486"),
];

#[rustfmt::skip]
const AMD_UARCH: &[UarchRule] = &[
    UarchRule { mask: M_FAMILY, pattern: sig(0xB, 0, 0xF, 0), uarch: "Zen 5", process: "TSMC N4" },
    UarchRule { mask: M_MODEL, pattern: sig(0xA, 0x6, 0xF, 0x1), uarch: "Zen 4", process: "TSMC N5" },
    UarchRule { mask: M_MODEL, pattern: sig(0xA, 0x7, 0xF, 0x0), uarch: "Zen 4", process: "TSMC N4" },
    UarchRule { mask: M_MODEL, pattern: sig(0xA, 0x1, 0xF, 0x1), uarch: "Zen 4", process: "TSMC N5" },
    UarchRule { mask: M_FAMILY, pattern: sig(0xA, 0, 0xF, 0), uarch: "Zen 3", process: "TSMC N7" },
    UarchRule { mask: M_MODEL, pattern: sig(0x8, 0x7, 0xF, 0x1), uarch: "Zen 2", process: "TSMC N7" },
    UarchRule { mask: M_MODEL, pattern: sig(0x8, 0x3, 0xF, 0x1), uarch: "Zen 2", process: "TSMC N7" },
    UarchRule { mask: M_MODEL, pattern: sig(0x8, 0x6, 0xF, 0x0), uarch: "Zen 2", process: "TSMC N7" },
    UarchRule { mask: M_MODEL, pattern: sig(0x8, 0x6, 0xF, 0x8), uarch: "Zen 2", process: "TSMC N7" },
    UarchRule { mask: M_MODEL, pattern: sig(0x8, 0x9, 0xF, 0x0), uarch: "Zen 2", process: "TSMC N7" },
    UarchRule { mask: M_MODEL, pattern: sig(0x8, 0x0, 0xF, 0x8), uarch: "Zen+", process: "GF 12LP" },
    UarchRule { mask: M_MODEL, pattern: sig(0x8, 0x1, 0xF, 0x8), uarch: "Zen+", process: "GF 12LP" },
    UarchRule { mask: M_FAMILY, pattern: sig(0x8, 0, 0xF, 0), uarch: "Zen", process: "GF 14LPP" },
    UarchRule { mask: M_MODEL, pattern: sig(0x6, 0x6, 0xF, 0x0), uarch: "Excavator", process: "28 nm" },
    UarchRule { mask: M_MODEL, pattern: sig(0x6, 0x3, 0xF, 0x0), uarch: "Steamroller", process: "28 nm" },
    UarchRule { mask: M_MODEL, pattern: sig(0x6, 0x1, 0xF, 0x0), uarch: "Piledriver", process: "32 nm" },
    UarchRule { mask: M_MODEL, pattern: sig(0x6, 0x0, 0xF, 0x2), uarch: "Piledriver", process: "32 nm" },
    UarchRule { mask: M_FAMILY, pattern: sig(0x6, 0, 0xF, 0), uarch: "Bulldozer", process: "32 nm" },
    UarchRule { mask: M_FAMILY, pattern: sig(0x7, 0, 0xF, 0), uarch: "Jaguar", process: "28 nm" },
    UarchRule { mask: M_FAMILY, pattern: sig(0x5, 0, 0xF, 0), uarch: "Bobcat", process: "40 nm" },
    UarchRule { mask: M_FAMILY, pattern: sig(0x3, 0, 0xF, 0), uarch: "K10 (Husky)", process: "32 nm" },
    UarchRule { mask: M_MODEL, pattern: sig(0x1, 0x0, 0xF, 0x4), uarch: "K10", process: "45 nm" },
    UarchRule { mask: M_MODEL, pattern: sig(0x1, 0x0, 0xF, 0x6), uarch: "K10", process: "45 nm" },
    UarchRule { mask: M_FAMILY, pattern: sig(0x1, 0, 0xF, 0), uarch: "K10", process: "65 nm" },
    UarchRule { mask: M_FAMILY, pattern: sig(0, 0, 0xF, 0), uarch: "K8 (Hammer)", process: "130 nm" },
    UarchRule { mask: M_MODEL, pattern: sig(0, 0, 6, 0xA), uarch: "K7", process: "130 nm" },
    UarchRule { mask: M_MODEL, pattern: sig(0, 0, 6, 0x8), uarch: "K7", process: "130 nm" },
    UarchRule { mask: M_FAMILY, pattern: sig(0, 0, 6, 0), uarch: "K7", process: "180 nm" },
    UarchRule { mask: M_MODEL, pattern: sig(0, 0, 5, 0x8), uarch: "K6", process: "250 nm" },
    UarchRule { mask: M_MODEL, pattern: sig(0, 0, 5, 0x9), uarch: "K6", process: "250 nm" },
    UarchRule { mask: M_FAMILY, pattern: sig(0, 0, 5, 0), uarch: "K5/K6", process: "350 nm" },
];

#[rustfmt::skip]
const HYGON_MODELS: &[ModelRule] = &[
    rule!(M_FAMILY, sig(0x9, 0, 0xF, 0), "Dhyana"),
];

#[rustfmt::skip]
const HYGON_UARCH: &[UarchRule] = &[
    UarchRule { mask: M_FAMILY, pattern: sig(0x9, 0, 0xF, 0), uarch: "Zen (Dhyana)", process: "GF 14LPP" },
];

// ---------------------------------------------------------------------------
// Brand-ID fallback table (Intel only; AMD never used the field). A couple
// of IDs are themselves overloaded on the signature and are resolved in
// the lookup before the plain table.
// ---------------------------------------------------------------------------

const INTEL_BRAND_IDS: &[(u8, &str)] = &[
    (0x01, "Intel(R) Celeron(R)"),
    (0x02, "Intel(R) Pentium(R) III"),
    (0x03, "Intel(R) Pentium(R) III Xeon(TM)"),
    (0x04, "Intel(R) Pentium(R) III"),
    (0x06, "Mobile Intel(R) Pentium(R) III"),
    (0x07, "Mobile Intel(R) Celeron(R)"),
    (0x08, "Intel(R) Pentium(R) 4"),
    (0x09, "Intel(R) Pentium(R) 4"),
    (0x0A, "Intel(R) Celeron(R)"),
    (0x0B, "Intel(R) Xeon(TM)"),
    (0x0C, "Intel(R) Xeon(TM) MP"),
    (0x0E, "Mobile Intel(R) Pentium(R) 4"),
    (0x0F, "Mobile Intel(R) Celeron(R)"),
    (0x11, "Mobile Genuine Intel(R)"),
    (0x12, "Intel(R) Celeron(R) M"),
    (0x13, "Mobile Intel(R) Celeron(R)"),
    (0x14, "Intel(R) Celeron(R)"),
    (0x15, "Mobile Genuine Intel(R)"),
    (0x16, "Intel(R) Pentium(R) M"),
    (0x17, "Mobile Intel(R) Celeron(R)"),
];

fn brand_id_string(vendor: Vendor, brand_id: u8, raw_version: u32) -> Option<&'static str> {
    if vendor != Vendor::Intel || brand_id == 0 {
        return None;
    }
    // Signature-overloaded IDs, resolved before the plain table.
    match brand_id {
        0x03 if raw_version == 0x06B1 => return Some("Intel(R) Celeron(R)"),
        0x0B if raw_version < 0x0F13 => return Some("Intel(R) Xeon(TM) MP"),
        0x0E if raw_version < 0x0F13 => return Some("Intel(R) Pentium(R) 4 - M"),
        _ => {}
    }
    INTEL_BRAND_IDS
        .iter()
        .find(|(id, _)| *id == brand_id)
        .map(|&(_, name)| name)
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

fn scan_models<'t>(
    rules: &'t [ModelRule],
    raw: u32,
    signals: &Signals,
) -> Option<&'t ModelRule> {
    rules.iter().find(|rule| {
        raw & rule.mask == rule.pattern
            && rule.predicate.map_or(true, |pred| pred(signals))
    })
}

fn scan_uarch<'t>(rules: &'t [UarchRule], raw: u32) -> Option<&'t UarchRule> {
    rules.iter().find(|rule| raw & rule.mask == rule.pattern)
}

/// Classify a version record plus auxiliary signals into an identity.
///
/// Deterministic and total: the same inputs always produce the same result,
/// and an unmatched signature falls back to a generic
/// "(vendor) (unknown model)" name rather than failing.
pub fn identify(version: &VersionRecord, signals: &Signals) -> IdentityResult {
    let (models, uarchs): (&[ModelRule], &[UarchRule]) = match version.vendor {
        Vendor::Intel => (INTEL_MODELS, INTEL_UARCH),
        Vendor::Amd => (AMD_MODELS, AMD_UARCH),
        Vendor::Hygon => (HYGON_MODELS, HYGON_UARCH),
        _ => (&[], &[]),
    };

    let family_display = match scan_models(models, version.raw, signals) {
        Some(rule) => rule.name.to_string(),
        None => format!("{} (unknown model)", version.vendor),
    };

    let (microarchitecture, physical_process) = match scan_uarch(uarchs, version.raw) {
        Some(rule) => (Some(rule.uarch.to_string()), Some(rule.process.to_string())),
        None => (None, None),
    };

    let brand_string = signals
        .brand_string
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .or_else(|| {
            brand_id_string(version.vendor, signals.brand_id, version.raw).map(str::to_string)
        });

    IdentityResult {
        vendor_display: version.vendor.to_string(),
        microarchitecture,
        family_display: Some(family_display),
        physical_process,
        brand_string,
    }
}
