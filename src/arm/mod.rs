//! ARM/Linux identification: capability words, `/proc/cpuinfo`, MIDR tables.
//!
//! No identification instruction is available from user space, so two OS
//! probes stand in for it: the auxiliary-vector capability bit pair
//! (hwcap/hwcap2) and the line-oriented cpuinfo pseudo-file. The MIDR
//! fields recovered from cpuinfo (implementer byte, part number) drive an
//! ordered rule table structurally identical to the x86 model matcher,
//! including rebrand predicates for parts sold under a different name than
//! the core they license.
//!
//! # Platform Support
//!
//! - **aarch64 Linux**: full decode
//! - Elsewhere the probes return empty data and everything degrades to an
//!   empty contribution

use serde::{Deserialize, Serialize};

use crate::cache::{Associativity, CacheDescriptor, CacheKind};
use crate::features::{
    apply_capability_word, arm_feature_from_token, FeatureSet, ARM_HWCAP, ARM_HWCAP2,
};
use crate::identity::IdentityResult;
use crate::probe::RawProbe;

pub const CPUINFO_PATH: &str = "/proc/cpuinfo";

/// Free-text "Hardware" values are occasionally garbage; cap them.
const HARDWARE_MAX_LEN: usize = 128;

/// Everything recovered from the ARM probes for one profiling pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArmInfo {
    pub features: FeatureSet,
    /// MIDR implementer byte (0x41 = Arm Ltd).
    pub implementer: u8,
    pub variant: u8,
    /// MIDR part number, 12 bits.
    pub part: u16,
    pub revision: u8,
    pub hardware: Option<String>,
    pub model_name: Option<String>,
    pub cache_size_kb: Option<u32>,
    /// Count of `processor` stanzas seen in the text probe.
    pub core_count: u16,
}

/// Run both OS probes and fold the results into one record.
///
/// Every failure path degrades silently: a missing pseudo-file or an
/// unparsable field leaves the corresponding [`ArmInfo`] field at its
/// default.
pub fn gather(probe: &dyn RawProbe) -> ArmInfo {
    let mut info = ArmInfo::default();

    let (hwcap, hwcap2) = probe.capability_words();
    apply_capability_word(&mut info.features, hwcap, ARM_HWCAP);
    apply_capability_word(&mut info.features, hwcap2, ARM_HWCAP2);

    match probe.text_probe(CPUINFO_PATH) {
        Ok(lines) => {
            for (key, value) in &lines {
                apply_line(&mut info, key, value);
            }
        }
        Err(err) => {
            log::debug!("text probe {CPUINFO_PATH} unavailable: {err}");
        }
    }

    info
}

/// Dispatch one `key : value` pair, bucketed by key length before the
/// string compare so most lines fail on a single integer check.
fn apply_line(info: &mut ArmInfo, key: &str, value: &str) {
    match (key.len(), key) {
        (8, "CPU part") => {
            if let Some(part) = parse_uint(value) {
                info.part = (part & 0xFFF) as u16;
            }
        }
        (8, "Features") => {
            for token in value.split_ascii_whitespace() {
                if let Some(feature) = arm_feature_from_token(token) {
                    info.features.insert(feature);
                }
            }
        }
        (8, "Hardware") => {
            let mut text = value.to_string();
            if text.len() > HARDWARE_MAX_LEN {
                // Back off to a char boundary; truncating mid-codepoint panics.
                let mut cut = HARDWARE_MAX_LEN;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            info.hardware = Some(text);
        }
        (9, "processor") => {
            info.core_count = info.core_count.saturating_add(1);
        }
        (10, "model name") => {
            info.model_name = Some(value.to_string());
        }
        (10, "cache size") => {
            // "512 KB" style; the unit suffix is always KB here.
            if let Some(kb) = value.split_ascii_whitespace().next().and_then(parse_uint) {
                info.cache_size_kb = Some(kb);
            }
        }
        (11, "CPU variant") => {
            if let Some(v) = parse_uint(value) {
                info.variant = (v & 0xF) as u8;
            }
        }
        (12, "CPU revision") => {
            if let Some(r) = parse_uint(value) {
                info.revision = (r & 0xF) as u8;
            }
        }
        (15, "CPU implementer") => {
            if let Some(imp) = parse_uint(value) {
                info.implementer = (imp & 0xFF) as u8;
            }
        }
        _ => {}
    }
}

/// Parse a cpuinfo numeric field, hex (`0xd03`) or decimal.
fn parse_uint(value: &str) -> Option<u32> {
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

// ---------------------------------------------------------------------------
// MIDR tables
// ---------------------------------------------------------------------------

const IMPLEMENTERS: &[(u8, &str)] = &[
    (0x41, "Arm"),
    (0x42, "Broadcom"),
    (0x43, "Cavium"),
    (0x44, "DEC"),
    (0x46, "Fujitsu"),
    (0x48, "HiSilicon"),
    (0x4E, "Nvidia"),
    (0x50, "Applied Micro"),
    (0x51, "Qualcomm"),
    (0x53, "Samsung"),
    (0x56, "Marvell"),
    (0x61, "Apple"),
    (0x66, "Faraday"),
    (0x69, "Intel"),
    (0x6D, "Microsoft"),
    (0x70, "Phytium"),
    (0xC0, "Ampere"),
];

type Predicate = fn(&ArmInfo) -> bool;

/// One row of the (implementer, part) core table. Scanned in order,
/// first match wins, same as the x86 rule tables.
struct MidrRule {
    implementer: u8,
    part: u16,
    predicate: Option<Predicate>,
    uarch: &'static str,
}

macro_rules! midr {
    ($imp:expr, $part:expr, $uarch:expr) => {
        MidrRule { implementer: $imp, part: $part, predicate: None, uarch: $uarch }
    };
    ($imp:expr, $part:expr, $pred:expr, $uarch:expr) => {
        MidrRule { implementer: $imp, part: $part, predicate: Some($pred), uarch: $uarch }
    };
}

fn p_variant_ge_4(info: &ArmInfo) -> bool {
    info.variant >= 4
}

#[rustfmt::skip]
const MIDR_CORES: &[MidrRule] = &[
    // Arm Ltd.
    midr!(0x41, 0xD82, "Cortex-X4"),
    midr!(0x41, 0xD81, "Cortex-A720"),
    midr!(0x41, 0xD80, "Cortex-A520"),
    midr!(0x41, 0xD4F, "Neoverse-V2"),
    midr!(0x41, 0xD4E, "Cortex-X3"),
    midr!(0x41, 0xD4D, "Cortex-A715"),
    midr!(0x41, 0xD4B, "Cortex-A78C"),
    midr!(0x41, 0xD49, "Neoverse-N2"),
    midr!(0x41, 0xD48, "Cortex-X2"),
    midr!(0x41, 0xD47, "Cortex-A710"),
    midr!(0x41, 0xD46, "Cortex-A510"),
    midr!(0x41, 0xD44, "Cortex-X1"),
    midr!(0x41, 0xD42, "Cortex-A78AE"),
    midr!(0x41, 0xD41, "Cortex-A78"),
    midr!(0x41, 0xD40, "Neoverse-V1"),
    midr!(0x41, 0xD0E, "Cortex-A76AE"),
    midr!(0x41, 0xD0D, "Cortex-A77"),
    midr!(0x41, 0xD0C, "Neoverse-N1"),
    midr!(0x41, 0xD0B, "Cortex-A76"),
    midr!(0x41, 0xD0A, "Cortex-A75"),
    midr!(0x41, 0xD09, "Cortex-A73"),
    midr!(0x41, 0xD08, "Cortex-A72"),
    midr!(0x41, 0xD07, "Cortex-A57"),
    midr!(0x41, 0xD05, "Cortex-A55"),
    midr!(0x41, 0xD04, "Cortex-A35"),
    midr!(0x41, 0xD03, "Cortex-A53"),
    midr!(0x41, 0xD01, "Cortex-A32"),
    midr!(0x41, 0xC0F, "Cortex-A15"),
    midr!(0x41, 0xC0D, "Cortex-A17"),
    midr!(0x41, 0xC09, "Cortex-A9"),
    midr!(0x41, 0xC08, "Cortex-A8"),
    midr!(0x41, 0xC07, "Cortex-A7"),
    midr!(0x41, 0xC05, "Cortex-A5"),
    // Qualcomm. The Kryo numbered parts are licensed Cortex designs sold
    // under the Kryo brand; the rows name both.
    midr!(0x51, 0x805, "Kryo 4xx Silver (Cortex-A55)"),
    midr!(0x51, 0x804, "Kryo 4xx Gold (Cortex-A76)"),
    midr!(0x51, 0x803, "Kryo 3xx Silver (Cortex-A55)"),
    midr!(0x51, 0x802, "Kryo 3xx Gold (Cortex-A75)"),
    midr!(0x51, 0x801, "Kryo 2xx Silver (Cortex-A53)"),
    midr!(0x51, 0x800, "Kryo 2xx Gold (Cortex-A73)"),
    midr!(0x51, 0xC01, "Saphira"),
    midr!(0x51, 0xC00, "Falkor"),
    midr!(0x51, 0x211, "Kryo Gold"),
    midr!(0x51, 0x205, "Kryo Silver"),
    midr!(0x51, 0x201, "Kryo Silver"),
    // Broadcom's Vulcan shipped as the Cavium ThunderX2.
    midr!(0x42, 0x516, "ThunderX2 (Vulcan)"),
    midr!(0x43, 0x0AF, "ThunderX2"),
    midr!(0x43, 0x0A1, "ThunderX"),
    // Samsung reused part 0x001 across Mongoose generations; the variant
    // field disambiguates. Predicate row first, plain fallback second.
    midr!(0x53, 0x001, p_variant_ge_4, "Exynos M2 (Mongoose)"),
    midr!(0x53, 0x001, "Exynos M1 (Mongoose)"),
    midr!(0x53, 0x002, "Exynos M3 (Meerkat)"),
    // Apple.
    midr!(0x61, 0x021, "Firestorm"),
    midr!(0x61, 0x020, "Icestorm"),
    midr!(0x61, 0x023, "Firestorm (Pro)"),
    midr!(0x61, 0x022, "Icestorm (Pro)"),
    midr!(0x61, 0x025, "Firestorm (Max)"),
    midr!(0x61, 0x024, "Icestorm (Max)"),
    midr!(0x61, 0x031, "Avalanche"),
    midr!(0x61, 0x030, "Blizzard"),
    midr!(0x61, 0x033, "Avalanche (Pro)"),
    midr!(0x61, 0x032, "Blizzard (Pro)"),
    // Others.
    midr!(0xC0, 0xAC4, "Ampere-1a"),
    midr!(0xC0, 0xAC3, "Ampere-1"),
    midr!(0x48, 0xD01, "TaiShan-v110"),
    midr!(0x4E, 0x004, "Carmel"),
    midr!(0x4E, 0x003, "Denver 2"),
    midr!(0x46, 0x001, "A64FX"),
    midr!(0x70, 0x663, "FTC-663"),
    midr!(0x70, 0x662, "FTC-662"),
    midr!(0x70, 0x661, "FTC-661"),
];

fn implementer_name(byte: u8) -> Option<&'static str> {
    IMPLEMENTERS.iter().find(|(b, _)| *b == byte).map(|&(_, n)| n)
}

/// Classify the MIDR fields into an identity. Deterministic and total;
/// an unmatched part falls back to "(vendor) (unknown model)".
pub fn identify(info: &ArmInfo) -> IdentityResult {
    let vendor_display = implementer_name(info.implementer)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Unknown (implementer {:#04x})", info.implementer));

    let core = MIDR_CORES.iter().find(|rule| {
        rule.implementer == info.implementer
            && rule.part == info.part
            && rule.predicate.map_or(true, |pred| pred(info))
    });

    let family_display = match core {
        Some(rule) => rule.uarch.to_string(),
        None => format!("{vendor_display} (unknown model)"),
    };

    let brand_string = info
        .hardware
        .clone()
        .or_else(|| info.model_name.clone())
        .filter(|s| !s.is_empty());

    IdentityResult {
        vendor_display,
        microarchitecture: core.map(|rule| rule.uarch.to_string()),
        family_display: Some(family_display),
        physical_process: None,
        brand_string,
    }
}

/// Cache descriptors recoverable from the text probe. At most one entry;
/// the kernel reports a single aggregate "cache size" when it reports any.
pub fn cache_descriptors(info: &ArmInfo) -> Vec<CacheDescriptor> {
    let Some(kb) = info.cache_size_kb else {
        return Vec::new();
    };
    vec![CacheDescriptor {
        kind: CacheKind::Unified,
        level: 2,
        size_bytes: Some(kb as u64 * 1024),
        line_size: 0,
        associativity: Associativity::Unknown,
        entries: 0,
        page_bytes: None,
        shared_by_threads: 1,
        partitioned_by_core: 1,
    }]
}
