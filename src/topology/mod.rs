//! Logical-processor topology decoding.
//!
//! The APIC ID of each logical processor is a bit-field hierarchy: splitting
//! it at the per-level bit widths reveals SMT, core, and package membership.
//! Two encodings exist:
//!
//! - **Legacy**: the initial APIC ID in leaf 1 plus sharing counts proxied
//!   from the deterministic cache leaf, used when no dedicated topology leaf
//!   is present.
//! - **Extended**: leaf 0xb and its wider successor 0x1f enumerate one
//!   sub-leaf per level, finest first, until a sub-leaf reports level
//!   type 0.

use serde::{Deserialize, Serialize};

use crate::bitfield::extract32;
use crate::probe::ProbeSnapshot;

/// Granularity of one topology level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelKind {
    Smt,
    Core,
    Module,
    Tile,
    Die,
    /// A level type this decoder does not know; kept, not skipped.
    Unknown,
}

impl LevelKind {
    fn from_type_field(value: u32) -> Option<Self> {
        match value {
            0 => None,
            1 => Some(Self::Smt),
            2 => Some(Self::Core),
            3 => Some(Self::Module),
            4 => Some(Self::Tile),
            5 => Some(Self::Die),
            _ => Some(Self::Unknown),
        }
    }
}

impl std::fmt::Display for LevelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Smt => write!(f, "SMT"),
            Self::Core => write!(f, "Core"),
            Self::Module => write!(f, "Module"),
            Self::Tile => write!(f, "Tile"),
            Self::Die => write!(f, "Die"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One level of the APIC-ID hierarchy, finest granularity first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyLevel {
    pub kind: LevelKind,
    /// APIC-ID bits to shift away to reach the next-coarser level.
    pub bit_width: u8,
    /// Logical processors at this level and below.
    pub logical_processor_count: u16,
}

/// Resolved topology for the calling logical processor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreTopology {
    pub apic_id: u32,
    /// Ordered finest to coarsest.
    pub levels: Vec<TopologyLevel>,
}

impl CoreTopology {
    /// Logical processors per core (1 when no SMT level was reported).
    pub fn smt_width(&self) -> u16 {
        self.levels
            .iter()
            .find(|l| l.kind == LevelKind::Smt)
            .map(|l| l.logical_processor_count.max(1))
            .unwrap_or(1)
    }

    /// Logical processors in the package, per the coarsest reported level.
    pub fn logical_count(&self) -> u16 {
        self.levels
            .last()
            .map(|l| l.logical_processor_count.max(1))
            .unwrap_or(1)
    }

    /// Core count derived from the coarsest level and the SMT width.
    pub fn core_count(&self) -> u16 {
        (self.logical_count() / self.smt_width()).max(1)
    }
}

/// Smallest bit width that can index `count` items.
pub(crate) fn bits_needed(count: u32) -> u8 {
    if count <= 1 {
        0
    } else {
        (32 - (count - 1).leading_zeros()) as u8
    }
}

/// Decode the topology from whichever leaves the snapshot gathered.
///
/// Preference order: leaf 0x1f, then 0xb, then the legacy leaf-1/leaf-4
/// proxy. Every path degrades to a default (single-processor) topology
/// rather than failing.
pub fn resolve(snapshot: &ProbeSnapshot) -> CoreTopology {
    for leaf in [0x1f_u32, 0xb] {
        if snapshot.supports(leaf) {
            let topo = decode_extended(snapshot, leaf);
            if !topo.levels.is_empty() {
                return topo;
            }
        }
    }
    decode_legacy(snapshot)
}

fn decode_extended(snapshot: &ProbeSnapshot, leaf: u32) -> CoreTopology {
    let mut topo = CoreTopology::default();

    for (index, words) in snapshot.subleaves(leaf).iter().enumerate() {
        let count = extract32(words.ebx, 0, 16);
        let Some(kind) = LevelKind::from_type_field(extract32(words.ecx, 8, 16)) else {
            break;
        };
        if count == 0 {
            break;
        }
        if index == 0 {
            // The x2APIC ID comes from sub-leaf 0 only.
            topo.apic_id = words.edx;
        }
        topo.levels.push(TopologyLevel {
            kind,
            bit_width: extract32(words.eax, 0, 5) as u8,
            logical_processor_count: count as u16,
        });
    }

    topo
}

fn decode_legacy(snapshot: &ProbeSnapshot) -> CoreTopology {
    let Some(leaf1) = snapshot.leaf(1).copied() else {
        return CoreTopology::default();
    };

    let apic_id = extract32(leaf1.ebx, 24, 32);
    let htt = extract32(leaf1.edx, 28, 29) == 1;
    let logical = if htt {
        extract32(leaf1.ebx, 16, 24).max(1)
    } else {
        1
    };

    // Cores-on-die from the deterministic cache leaf stands in for the
    // missing topology leaf.
    let cores = snapshot
        .subleaves(4)
        .first()
        .map(|w| extract32(w.eax, 26, 32) + 1)
        .unwrap_or(1)
        .min(logical.max(1));

    let smt = (logical / cores.max(1)).max(1);

    let mut levels = Vec::new();
    levels.push(TopologyLevel {
        kind: LevelKind::Smt,
        bit_width: bits_needed(smt),
        logical_processor_count: smt as u16,
    });
    if logical > 1 {
        levels.push(TopologyLevel {
            kind: LevelKind::Core,
            bit_width: bits_needed(logical),
            logical_processor_count: logical as u16,
        });
    }

    CoreTopology { apic_id, levels }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::RawWords;

    fn ext_subleaf(bit_width: u32, count: u32, level_type: u32, x2apic: u32) -> RawWords {
        RawWords::new(bit_width, count, level_type << 8, x2apic)
    }

    #[test]
    fn test_extended_two_levels() {
        let mut snap = ProbeSnapshot::new();
        snap.push(0, RawWords::new(0xb, 0, 0, 0));
        snap.push(0xb, ext_subleaf(1, 2, 1, 42));
        snap.push(0xb, ext_subleaf(4, 8, 2, 0));
        snap.push(0xb, ext_subleaf(0, 0, 0, 0));

        let topo = resolve(&snap);
        assert_eq!(topo.levels.len(), 2);
        assert_eq!(topo.levels[0].kind, LevelKind::Smt);
        assert_eq!(topo.levels[0].bit_width, 1);
        assert_eq!(topo.levels[0].logical_processor_count, 2);
        assert_eq!(topo.levels[1].kind, LevelKind::Core);
        assert_eq!(topo.levels[1].logical_processor_count, 8);
        assert_eq!(topo.apic_id, 42);
    }

    #[test]
    fn test_extended_derived_counts() {
        let mut snap = ProbeSnapshot::new();
        snap.push(0, RawWords::new(0xb, 0, 0, 0));
        snap.push(0xb, ext_subleaf(1, 2, 1, 0));
        snap.push(0xb, ext_subleaf(4, 16, 2, 0));
        let topo = resolve(&snap);
        assert_eq!(topo.smt_width(), 2);
        assert_eq!(topo.logical_count(), 16);
        assert_eq!(topo.core_count(), 8);
    }

    #[test]
    fn test_leaf_1f_preferred() {
        let mut snap = ProbeSnapshot::new();
        snap.push(0, RawWords::new(0x1f, 0, 0, 0));
        snap.push(0xb, ext_subleaf(1, 2, 1, 7));
        snap.push(0x1f, ext_subleaf(1, 2, 1, 9));
        snap.push(0x1f, ext_subleaf(5, 24, 2, 0));
        let topo = resolve(&snap);
        assert_eq!(topo.apic_id, 9);
        assert_eq!(topo.logical_count(), 24);
    }

    #[test]
    fn test_extended_empty_falls_back_to_legacy() {
        let mut snap = ProbeSnapshot::new();
        snap.push(0, RawWords::new(0xb, 0, 0, 0));
        // Leaf 0xb present but reports nothing: legacy leaf 1 takes over.
        snap.push(0xb, ext_subleaf(0, 0, 0, 0));
        // HTT set, 8 logical, APIC id 3.
        snap.push(1, RawWords::new(0, (3 << 24) | (8 << 16), 0, 1 << 28));
        snap.push(4, RawWords::new(3 << 26, 0, 0, 0)); // 4 cores on die
        let topo = resolve(&snap);
        assert_eq!(topo.apic_id, 3);
        assert_eq!(topo.smt_width(), 2);
        assert_eq!(topo.core_count(), 4);
    }

    #[test]
    fn test_legacy_no_htt() {
        let mut snap = ProbeSnapshot::new();
        snap.push(0, RawWords::new(1, 0, 0, 0));
        snap.push(1, RawWords::new(0, 5 << 24, 0, 0));
        let topo = resolve(&snap);
        assert_eq!(topo.apic_id, 5);
        assert_eq!(topo.smt_width(), 1);
        assert_eq!(topo.logical_count(), 1);
    }

    #[test]
    fn test_empty_snapshot_default() {
        let topo = resolve(&ProbeSnapshot::new());
        assert_eq!(topo.apic_id, 0);
        assert!(topo.levels.is_empty());
        assert_eq!(topo.logical_count(), 1);
        assert_eq!(topo.core_count(), 1);
    }

    #[test]
    fn test_bits_needed() {
        assert_eq!(bits_needed(1), 0);
        assert_eq!(bits_needed(2), 1);
        assert_eq!(bits_needed(8), 3);
        assert_eq!(bits_needed(12), 4);
    }

    #[test]
    fn test_unknown_level_type_kept() {
        let mut snap = ProbeSnapshot::new();
        snap.push(0, RawWords::new(0xb, 0, 0, 0));
        snap.push(0xb, ext_subleaf(1, 2, 1, 0));
        snap.push(0xb, ext_subleaf(6, 64, 9, 0));
        let topo = resolve(&snap);
        assert_eq!(topo.levels.len(), 2);
        assert_eq!(topo.levels[1].kind, LevelKind::Unknown);
    }

    #[test]
    fn test_level_kind_display() {
        assert_eq!(LevelKind::Smt.to_string(), "SMT");
        assert_eq!(LevelKind::Die.to_string(), "Die");
    }
}
