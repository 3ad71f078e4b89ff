//! Architecture adapters and the aggregate [`ProcessorProfile`].
//!
//! The x86 adapter drives the probe through a fixed leaf sequence, builds a
//! [`ProbeSnapshot`], and hands it to each decoder; the ARM adapter drives
//! the OS probes in [`crate::arm`]. Both produce the same output record.
//!
//! Every sub-leaf loop has a sentinel-based termination predicate and a hard
//! cap so a misbehaving probe can never hang a profiling pass.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::arm;
use crate::bitfield::extract32;
use crate::cache::{self, CacheDescriptor};
use crate::error::Result;
use crate::features::{self, FeatureSet};
use crate::freq;
use crate::identity::{self, IdentityResult, Signals};
use crate::probe::{NativeProbe, ProbeSnapshot, RawProbe};
use crate::topology::{self, bits_needed, CoreTopology, LevelKind, TopologyLevel};
use crate::version::{Vendor, VersionRecord};

/// Hard bound on any sub-leaf enumeration.
const MAX_SUBLEAVES: u32 = 64;

/// Everything one profiling pass learned about the processor.
///
/// Plain data, freshly allocated per call, safe to serialize. The engine
/// holds no cache of it; callers may keep it as long as they like.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorProfile {
    /// Raw 12-byte vendor string ("GenuineIntel"), empty on ARM.
    pub vendor_string: String,
    pub version: VersionRecord,
    pub features: FeatureSet,
    /// Decode-ordered, not deduplicated across leaf formats.
    pub caches: Vec<CacheDescriptor>,
    pub topology: CoreTopology,
    pub identity: IdentityResult,
    pub brand_string: Option<String>,
}

impl ProcessorProfile {
    /// Whether more than one logical processor shares a core.
    pub fn smt_enabled(&self) -> bool {
        self.topology.smt_width() > 1
    }

    pub fn core_count(&self) -> u16 {
        self.topology.core_count()
    }

    pub fn logical_count(&self) -> u16 {
        self.topology.logical_count()
    }
}

/// Gather every leaf the x86 decode path consumes, in the fixed order
/// 0, 1, 2, 4, 7, 0xb, 0xd, 0x1f, then the extended range.
pub fn gather_x86(probe: &dyn RawProbe) -> ProbeSnapshot {
    let mut snap = ProbeSnapshot::new();

    let leaf0 = probe.query(0, 0);
    snap.push(0, leaf0);
    let max_basic = leaf0.eax;

    if max_basic >= 1 {
        snap.push(1, probe.query(1, 0));
    }

    if max_basic >= 2 {
        // The low byte of the first query's eax is the total number of
        // times the leaf must be queried.
        let first = probe.query(2, 0);
        snap.push(2, first);
        let count = (first.eax & 0xFF).min(MAX_SUBLEAVES);
        for _ in 1..count {
            snap.push(2, probe.query(2, 0));
        }
    }

    if max_basic >= 4 {
        for sub in 0..MAX_SUBLEAVES {
            let words = probe.query(4, sub);
            snap.push(4, words);
            if extract32(words.eax, 0, 5) == 0 {
                break;
            }
        }
    }

    if max_basic >= 7 {
        let first = probe.query(7, 0);
        snap.push(7, first);
        let max_sub = first.eax.min(MAX_SUBLEAVES - 1);
        for sub in 1..=max_sub {
            snap.push(7, probe.query(7, sub));
        }
    }

    if max_basic >= 0xb {
        gather_topology_leaf(probe, &mut snap, 0xb);
    }

    if max_basic >= 0xd {
        snap.push(0xd, probe.query(0xd, 0));
        snap.push(0xd, probe.query(0xd, 1));
    }

    if max_basic >= 0x1f {
        gather_topology_leaf(probe, &mut snap, 0x1f);
    }

    let ext0 = probe.query(0x8000_0000, 0);
    snap.push(0x8000_0000, ext0);
    let max_ext = ext0.eax;
    if max_ext > 0x8000_0000 {
        for leaf in 0x8000_0001..=max_ext.min(0x8000_001F) {
            if leaf == 0x8000_001D {
                for sub in 0..MAX_SUBLEAVES {
                    let words = probe.query(leaf, sub);
                    snap.push(leaf, words);
                    if extract32(words.eax, 0, 5) == 0 {
                        break;
                    }
                }
            } else {
                snap.push(leaf, probe.query(leaf, 0));
            }
        }
    }

    snap
}

/// Extended-topology gather: one sub-leaf per level until type 0.
fn gather_topology_leaf(probe: &dyn RawProbe, snap: &mut ProbeSnapshot, leaf: u32) {
    for sub in 0..MAX_SUBLEAVES {
        let words = probe.query(leaf, sub);
        snap.push(leaf, words);
        if extract32(words.ecx, 8, 16) == 0 {
            break;
        }
    }
}

/// Assemble the 48-byte free-text brand string from its three leaves,
/// trimming NUL and space padding. `None` when absent or all padding.
pub fn brand_string(snap: &ProbeSnapshot) -> Option<String> {
    if !snap.supports(0x8000_0004) {
        return None;
    }
    let mut bytes = Vec::with_capacity(48);
    for leaf in 0x8000_0002..=0x8000_0004u32 {
        let words = snap.leaf(leaf)?;
        for reg in [words.eax, words.ebx, words.ecx, words.edx] {
            bytes.extend_from_slice(&reg.to_le_bytes());
        }
    }
    let text = String::from_utf8_lossy(&bytes);
    let trimmed = text.trim_matches(|c: char| c == '\0' || c == ' ');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Run one full x86 profiling pass against `probe`.
pub fn profile_x86(probe: &dyn RawProbe) -> ProcessorProfile {
    let snap = gather_x86(probe);

    let (vendor, vendor_string) = match snap.leaf(0) {
        Some(w) => (
            Vendor::from_leaf0(w.ebx, w.ecx, w.edx),
            Vendor::raw_string(w.ebx, w.ecx, w.edx),
        ),
        None => (Vendor::Unknown, String::new()),
    };

    let version_word = snap.leaf(1).map(|w| w.eax).unwrap_or(0);
    let version = VersionRecord::decode(vendor, version_word);

    let features = features::aggregate(vendor, &snap);
    let caches = cache::build(&version, &snap);
    let topology = topology::resolve(&snap);
    let brand = brand_string(&snap);
    let brand_id = snap.leaf(1).map(|w| (w.ebx & 0xFF) as u8).unwrap_or(0);

    let signals = Signals {
        caches: &caches,
        brand_string: brand.as_deref(),
        core_count: topology.core_count(),
        features: &features,
        brand_id,
    };
    let identity = identity::identify(&version, &signals);

    ProcessorProfile {
        vendor_string,
        version,
        features,
        caches,
        topology,
        identity,
        brand_string: brand,
    }
}

/// Run one full ARM/Linux profiling pass against `probe`.
pub fn profile_arm(probe: &dyn RawProbe) -> ProcessorProfile {
    let info = arm::gather(probe);
    let identity = arm::identify(&info);
    let caches = arm::cache_descriptors(&info);

    // No version word exists on this path; the record carries zeros and
    // the MIDR-based identity carries the naming.
    let version = VersionRecord::decode(Vendor::Unknown, 0);

    let mut levels = Vec::new();
    if info.core_count > 0 {
        levels.push(TopologyLevel {
            kind: LevelKind::Core,
            bit_width: bits_needed(info.core_count as u32),
            logical_processor_count: info.core_count,
        });
    }
    let topology = CoreTopology { apic_id: 0, levels };

    let brand_string = identity.brand_string.clone();

    ProcessorProfile {
        vendor_string: String::new(),
        version,
        features: info.features,
        caches,
        topology,
        identity,
        brand_string,
    }
}

/// Profile the processor this code runs on, picking the adapter by target.
pub fn profile_native(probe: &dyn RawProbe) -> ProcessorProfile {
    if cfg!(target_arch = "x86_64") {
        profile_x86(probe)
    } else {
        profile_arm(probe)
    }
}

/// One-shot profiler over the native probe.
pub struct ProcessorProfiler {
    profile: ProcessorProfile,
}

impl ProcessorProfiler {
    /// Run one profiling pass on the current processor.
    pub fn new() -> Result<Self> {
        let probe = NativeProbe::new();
        Ok(Self { profile: profile_native(&probe) })
    }

    pub fn profile(&self) -> &ProcessorProfile {
        &self.profile
    }

    pub fn into_profile(self) -> ProcessorProfile {
        self.profile
    }

    /// Estimate the current core clock over `window` wall-clock time.
    pub fn estimate_frequency_mhz(&self, window: Duration) -> Option<u32> {
        freq::estimate_frequency_mhz(&NativeProbe::new(), window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{MockProbe, RawWords};

    /// Minimal synthetic Coffee Lake: vendor, version word, one feature
    /// register, one deterministic cache level, a topology pair, brand.
    fn coffee_lake_probe() -> MockProbe {
        let mut p = MockProbe::new();
        // Leaf 0: max basic 0x16, "GenuineIntel".
        p.set(0, 0, RawWords::new(0x16, 0x756e6547, 0x6c65746e, 0x49656e69));
        // Leaf 1: version 0x000906EA, APIC id 2, 12 logical, sse2+htt.
        p.set(
            1,
            0,
            RawWords::new(0x000906EA, (2 << 24) | (12 << 16), 0, (1 << 26) | (1 << 28)),
        );
        // Leaf 4 sub 0: L1 data, 64B lines, 8 ways, 63 sets (32 KiB),
        // shared by 2 threads, then the terminator.
        p.set(
            4,
            0,
            RawWords::new(
                1 | (1 << 5) | (1 << 14),
                (63 << 0) | (0 << 12) | (7 << 22),
                63,
                0,
            ),
        );
        p.set(4, 1, RawWords::zero());
        // Leaf 0xb: SMT width 2, core level 12 logical.
        p.set(0xb, 0, RawWords::new(1, 2, 1 << 8, 2));
        p.set(0xb, 1, RawWords::new(4, 12, 2 << 8, 2));
        p.set(0xb, 2, RawWords::zero());
        // Extended range with a brand string.
        p.set(0x8000_0000, 0, RawWords::new(0x8000_0004, 0, 0, 0));
        p.set(0x8000_0001, 0, RawWords::zero());
        set_brand(&mut p, "Intel(R) Core(TM) i7-8700K CPU @ 3.70GHz");
        p
    }

    fn set_brand(p: &mut MockProbe, brand: &str) {
        let mut bytes = [0u8; 48];
        bytes[..brand.len()].copy_from_slice(brand.as_bytes());
        for (i, leaf) in (0x8000_0002..=0x8000_0004u32).enumerate() {
            let chunk = &bytes[i * 16..(i + 1) * 16];
            let word = |j: usize| {
                u32::from_le_bytes([chunk[j], chunk[j + 1], chunk[j + 2], chunk[j + 3]])
            };
            p.set(leaf, 0, RawWords::new(word(0), word(4), word(8), word(12)));
        }
    }

    #[test]
    fn test_profile_x86_coffee_lake() {
        let profile = profile_x86(&coffee_lake_probe());
        assert_eq!(profile.vendor_string, "GenuineIntel");
        assert_eq!(profile.version.vendor, Vendor::Intel);
        assert_eq!(profile.version.family, 6);
        assert_eq!(profile.version.model_synth, 0x9E);
        assert!(profile.features.has_feature("sse2"));
        assert_eq!(profile.caches.len(), 1);
        assert_eq!(profile.caches[0].size_bytes, Some(32 * 1024));
        assert_eq!(profile.topology.smt_width(), 2);
        assert_eq!(profile.core_count(), 6);
        assert!(profile.smt_enabled());
        assert_eq!(
            profile.identity.family_display.as_deref(),
            Some("Core (Coffee Lake)")
        );
        assert_eq!(
            profile.brand_string.as_deref(),
            Some("Intel(R) Core(TM) i7-8700K CPU @ 3.70GHz")
        );
    }

    #[test]
    fn test_profile_empty_probe_degrades() {
        // All-zero probe: every leaf absent, profile is default-shaped.
        let profile = profile_x86(&MockProbe::new());
        assert_eq!(profile.version.vendor, Vendor::Unknown);
        assert!(profile.features.is_empty());
        assert!(profile.caches.is_empty());
        assert!(profile.brand_string.is_none());
        assert_eq!(profile.logical_count(), 1);
    }

    #[test]
    fn test_brand_string_trims_padding() {
        let mut p = MockProbe::new();
        p.set(0, 0, RawWords::new(1, 0, 0, 0));
        p.set(0x8000_0000, 0, RawWords::new(0x8000_0004, 0, 0, 0));
        set_brand(&mut p, "      padded brand");
        let snap = gather_x86(&p);
        assert_eq!(brand_string(&snap).as_deref(), Some("padded brand"));
    }

    #[test]
    fn test_brand_string_absent_when_all_zero() {
        let mut p = MockProbe::new();
        p.set(0, 0, RawWords::new(1, 0, 0, 0));
        p.set(0x8000_0000, 0, RawWords::new(0x8000_0004, 0, 0, 0));
        let snap = gather_x86(&p);
        assert_eq!(brand_string(&snap), None);
    }

    #[test]
    fn test_subleaf_loops_are_bounded() {
        /// A probe that never reports a terminating sub-leaf.
        struct Runaway;
        impl RawProbe for Runaway {
            fn query(&self, _: u32, _: u32) -> RawWords {
                // Non-zero cache type and topology level type everywhere.
                RawWords::new(1, 1, 1 << 8, 0)
            }
            fn cycle_counter(&self) -> u64 {
                0
            }
            fn capability_words(&self) -> (u32, u32) {
                (0, 0)
            }
            fn text_probe(&self, _: &str) -> std::io::Result<Vec<(String, String)>> {
                Ok(Vec::new())
            }
        }
        let snap = gather_x86(&Runaway);
        assert!(snap.subleaves(4).len() <= MAX_SUBLEAVES as usize);
        assert!(snap.subleaves(0xb).len() <= MAX_SUBLEAVES as usize);
        assert!(snap.subleaves(2).len() <= MAX_SUBLEAVES as usize);
    }

    #[test]
    fn test_profile_arm_path() {
        let mut p = MockProbe::new();
        p.hwcap = (0b11, 0);
        p.cpuinfo = "\
processor\t: 0
processor\t: 1
CPU implementer\t: 0x41
CPU part\t: 0xd08
"
        .to_string();
        let profile = profile_arm(&p);
        assert!(profile.features.has_feature("fp"));
        assert!(profile.features.has_feature("asimd"));
        assert_eq!(profile.identity.vendor_display, "Arm");
        assert_eq!(
            profile.identity.microarchitecture.as_deref(),
            Some("Cortex-A72")
        );
        assert_eq!(profile.logical_count(), 2);
        assert!(!profile.smt_enabled());
    }

    #[test]
    fn test_profile_x86_zen2() {
        let mut p = MockProbe::new();
        // "AuthenticAMD", max basic 0xd.
        p.set(0, 0, RawWords::new(0xd, 0x68747541, 0x444d4163, 0x69746e65));
        // Matisse version word; nx in the extended feature register.
        p.set(1, 0, RawWords::new(0x00870F10, 0, 0, 1 << 26));
        p.set(0x8000_0000, 0, RawWords::new(0x8000_001d, 0, 0, 0));
        p.set(0x8000_0001, 0, RawWords::new(0, 0, 0, 1 << 20));
        // L3 via the deterministic extended leaf: 16-way, 64B, 16384 sets.
        p.set(
            0x8000_001d,
            0,
            RawWords::new(3 | (3 << 5), 63 | (15 << 22), 16383, 0),
        );
        p.set(0x8000_001d, 1, RawWords::zero());
        set_brand(&mut p, "AMD Ryzen 7 3700X 8-Core Processor");

        let profile = profile_x86(&p);
        assert_eq!(profile.version.vendor, Vendor::Amd);
        assert_eq!(profile.version.family_synth, 23);
        // AMD semantics for extended edx bit 20.
        assert!(profile.features.has_feature("nx"));
        assert!(!profile.features.has_feature("ds"));
        let l3 = profile.caches.iter().find(|c| c.level == 3).unwrap();
        assert_eq!(l3.size_bytes, Some(16 * 1024 * 1024));
        assert_eq!(
            profile.identity.family_display.as_deref(),
            Some("Ryzen (Matisse)")
        );
        assert_eq!(profile.identity.microarchitecture.as_deref(), Some("Zen 2"));
    }

    #[test]
    fn test_profile_json_round_trip() {
        let profile = profile_x86(&coffee_lake_probe());
        let json = serde_json::to_string(&profile).unwrap();
        let back: ProcessorProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.version, profile.version);
        assert_eq!(back.identity, profile.identity);
        assert_eq!(back.caches.len(), profile.caches.len());
    }
}
