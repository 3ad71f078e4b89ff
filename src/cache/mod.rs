//! Cache and TLB topology decoding.
//!
//! Five independent leaf encodings all normalize into [`CacheDescriptor`]:
//!
//! 1. the legacy descriptor-byte leaf (leaf 2), a byte-at-a-time table
//!    lookup with one version-disambiguated overload,
//! 2. the deterministic parameterized leaf (leaf 4), iterated until a
//!    sub-leaf reports no more caches,
//! 3. the legacy extended leaves 0x8000_0005/0x8000_0006/0x8000_0019 with
//!    fixed-width packed sub-fields and an associativity-index table,
//! 4. the deterministic extended leaf 0x8000_001d, field-compatible with
//!    leaf 4 but with its own bit layout,
//! 5. append-in-decode-order assembly of all of the above.
//!
//! Descriptors are not deduplicated across formats: a cache legitimately
//! reported by more than one leaf yields one record per leaf.

use serde::{Deserialize, Serialize};

use crate::bitfield::{bit32, extract32};
use crate::probe::ProbeSnapshot;
use crate::version::VersionRecord;

/// What a descriptor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CacheKind {
    Instruction,
    Data,
    Unified,
    /// Translation buffer for instruction fetches.
    InstructionTlb,
    /// Translation buffer for data accesses.
    DataTlb,
    /// Shared/unified translation buffer.
    UnifiedTlb,
    /// Decoded micro-op trace cache.
    Trace,
    /// Hardware prefetcher stride.
    Prefetch,
}

impl CacheKind {
    pub fn is_tlb(self) -> bool {
        matches!(
            self,
            Self::InstructionTlb | Self::DataTlb | Self::UnifiedTlb
        )
    }
}

impl std::fmt::Display for CacheKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Instruction => write!(f, "Instruction"),
            Self::Data => write!(f, "Data"),
            Self::Unified => write!(f, "Unified"),
            Self::InstructionTlb => write!(f, "Instruction TLB"),
            Self::DataTlb => write!(f, "Data TLB"),
            Self::UnifiedTlb => write!(f, "Unified TLB"),
            Self::Trace => write!(f, "Trace"),
            Self::Prefetch => write!(f, "Prefetch"),
        }
    }
}

/// Set associativity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Associativity {
    Direct,
    Ways(u32),
    Full,
    /// Reported without an associativity field.
    Unknown,
}

impl Associativity {
    /// Way count usable in size arithmetic (`Direct` = 1, `Full` and
    /// `Unknown` = 0).
    pub fn ways(self) -> u32 {
        match self {
            Self::Direct => 1,
            Self::Ways(w) => w,
            Self::Full | Self::Unknown => 0,
        }
    }
}

impl std::fmt::Display for Associativity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct-mapped"),
            Self::Ways(w) => write!(f, "{w}-way"),
            Self::Full => write!(f, "fully-associative"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One normalized cache or TLB record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheDescriptor {
    pub kind: CacheKind,
    /// 1, 2 or 3.
    pub level: u8,
    /// Total size in bytes; `None` for TLBs, which count entries instead.
    pub size_bytes: Option<u64>,
    /// Line size in bytes (0 when the leaf does not report one).
    pub line_size: u32,
    pub associativity: Associativity,
    /// Entry count for TLBs, 0 for caches.
    pub entries: u32,
    /// Page size covered by a TLB record, bytes.
    pub page_bytes: Option<u64>,
    /// Logical processors sharing this cache (1 when unreported).
    pub shared_by_threads: u32,
    /// Processor cores on the physical die (1 when unreported).
    pub partitioned_by_core: u32,
}

impl CacheDescriptor {
    fn cache(kind: CacheKind, level: u8, size_kb: u64, ways: u32, line: u32) -> Self {
        Self {
            kind,
            level,
            size_bytes: Some(size_kb * 1024),
            line_size: line,
            associativity: Associativity::Ways(ways),
            entries: 0,
            page_bytes: None,
            shared_by_threads: 1,
            partitioned_by_core: 1,
        }
    }

    fn tlb(kind: CacheKind, level: u8, page_kb: u64, entries: u32, assoc: Associativity) -> Self {
        Self {
            kind,
            level,
            size_bytes: None,
            line_size: 0,
            associativity: assoc,
            entries,
            page_bytes: Some(page_kb * 1024),
            shared_by_threads: 1,
            partitioned_by_core: 1,
        }
    }
}

const KB4: u64 = 4;
const MB2: u64 = 2 * 1024;
const MB4: u64 = 4 * 1024;
const GB1: u64 = 1024 * 1024;

/// Decode every cache leaf the snapshot gathered, in leaf-processing order.
///
/// Absent leaves contribute zero descriptors; malformed sub-leaves (type
/// field outside the defined range) are treated as "no cache", never as an
/// error.
pub fn build(version: &VersionRecord, snapshot: &ProbeSnapshot) -> Vec<CacheDescriptor> {
    let mut out = Vec::new();

    if snapshot.supports(2) {
        decode_legacy_descriptor_leaf(version, snapshot, &mut out);
    }
    if snapshot.supports(4) {
        decode_deterministic_leaf(snapshot, &mut out);
    }
    if snapshot.supports(0x8000_0005) {
        if let Some(w) = snapshot.leaf(0x8000_0005) {
            decode_ext_l1(w, &mut out);
        }
    }
    if snapshot.supports(0x8000_0006) {
        if let Some(w) = snapshot.leaf(0x8000_0006) {
            decode_ext_l2_l3(w, &mut out);
        }
    }
    if snapshot.supports(0x8000_0019) {
        if let Some(w) = snapshot.leaf(0x8000_0019) {
            decode_ext_1g_tlb(w, &mut out);
        }
    }
    if snapshot.supports(0x8000_001d) {
        decode_ext_deterministic_leaf(snapshot, &mut out);
    }

    out
}

// ---------------------------------------------------------------------------
// Format 1: legacy descriptor-byte leaf (leaf 2)
// ---------------------------------------------------------------------------

fn decode_legacy_descriptor_leaf(
    version: &VersionRecord,
    snapshot: &ProbeSnapshot,
    out: &mut Vec<CacheDescriptor>,
) {
    for (sub, words) in snapshot.subleaves(2).iter().enumerate() {
        for (reg_idx, &word) in [words.eax, words.ebx, words.ecx, words.edx].iter().enumerate() {
            // Bit 31 set marks the whole register as reserved.
            if bit32(word, 31) {
                continue;
            }
            for byte_idx in 0..4u8 {
                // The low byte of eax in sub-leaf 0 is the iteration count.
                if sub == 0 && reg_idx == 0 && byte_idx == 0 {
                    continue;
                }
                let byte = extract32(word, byte_idx * 8, byte_idx * 8 + 8) as u8;
                push_legacy_byte(byte, version, out);
            }
        }
    }
}

/// The descriptor-byte table. Most bytes map to exactly one record; 0x63
/// maps to two, and 0x49 is overloaded on the version record.
fn push_legacy_byte(byte: u8, version: &VersionRecord, out: &mut Vec<CacheDescriptor>) {
    use Associativity::{Full, Ways};
    use CacheDescriptor as D;
    use CacheKind::*;

    let one = |d: CacheDescriptor, out: &mut Vec<CacheDescriptor>| out.push(d);

    match byte {
        0x00 => {}
        0x01 => one(D::tlb(InstructionTlb, 1, KB4, 32, Ways(4)), out),
        0x02 => one(D::tlb(InstructionTlb, 1, MB4, 2, Full), out),
        0x03 => one(D::tlb(DataTlb, 1, KB4, 64, Ways(4)), out),
        0x04 => one(D::tlb(DataTlb, 1, MB4, 8, Ways(4)), out),
        0x05 => one(D::tlb(DataTlb, 1, MB4, 32, Ways(4)), out),
        0x06 => one(D::cache(Instruction, 1, 8, 4, 32), out),
        0x08 => one(D::cache(Instruction, 1, 16, 4, 32), out),
        0x09 => one(D::cache(Instruction, 1, 32, 4, 64), out),
        0x0a => one(D::cache(Data, 1, 8, 2, 32), out),
        0x0b => one(D::tlb(InstructionTlb, 1, MB4, 4, Ways(4)), out),
        0x0c => one(D::cache(Data, 1, 16, 4, 32), out),
        0x0d => one(D::cache(Data, 1, 16, 4, 64), out),
        0x0e => one(D::cache(Data, 1, 24, 6, 64), out),
        0x21 => one(D::cache(Unified, 2, 256, 8, 64), out),
        0x22 => one(D::cache(Unified, 3, 512, 4, 64), out),
        0x23 => one(D::cache(Unified, 3, 1024, 8, 64), out),
        0x25 => one(D::cache(Unified, 3, 2048, 8, 64), out),
        0x29 => one(D::cache(Unified, 3, 4096, 8, 64), out),
        0x2c => one(D::cache(Data, 1, 32, 8, 64), out),
        0x30 => one(D::cache(Instruction, 1, 32, 8, 64), out),
        0x41 => one(D::cache(Unified, 2, 128, 4, 32), out),
        0x42 => one(D::cache(Unified, 2, 256, 4, 32), out),
        0x43 => one(D::cache(Unified, 2, 512, 4, 32), out),
        0x44 => one(D::cache(Unified, 2, 1024, 4, 32), out),
        0x45 => one(D::cache(Unified, 2, 2048, 4, 32), out),
        0x46 => one(D::cache(Unified, 3, 4096, 4, 64), out),
        0x47 => one(D::cache(Unified, 3, 8192, 8, 64), out),
        0x48 => one(D::cache(Unified, 2, 3072, 12, 64), out),
        // Overloaded byte: a 4 MB unified cache that is L2 on the Xeon MP
        // signature (family 0xF, model 6) and L3 everywhere else. A
        // one-off special case, not a generic rule.
        0x49 => {
            if version.family_synth == 0x0F && version.model_synth == 0x06 {
                one(D::cache(Unified, 2, 4096, 16, 64), out);
            } else {
                one(D::cache(Unified, 3, 4096, 16, 64), out);
            }
        }
        0x4a => one(D::cache(Unified, 3, 6144, 12, 64), out),
        0x4b => one(D::cache(Unified, 3, 8192, 16, 64), out),
        0x4c => one(D::cache(Unified, 3, 12288, 12, 64), out),
        0x4d => one(D::cache(Unified, 3, 16384, 16, 64), out),
        0x4e => one(D::cache(Unified, 2, 6144, 24, 64), out),
        0x4f => one(D::tlb(InstructionTlb, 1, KB4, 32, Full), out),
        0x50 => one(D::tlb(InstructionTlb, 1, KB4, 64, Full), out),
        0x51 => one(D::tlb(InstructionTlb, 1, KB4, 128, Full), out),
        0x52 => one(D::tlb(InstructionTlb, 1, KB4, 256, Full), out),
        0x55 => one(D::tlb(InstructionTlb, 1, MB2, 7, Full), out),
        0x56 => one(D::tlb(DataTlb, 1, MB4, 16, Ways(4)), out),
        0x57 => one(D::tlb(DataTlb, 1, KB4, 16, Ways(4)), out),
        0x59 => one(D::tlb(DataTlb, 1, KB4, 16, Full), out),
        0x5a => one(D::tlb(DataTlb, 1, MB2, 32, Ways(4)), out),
        0x5b => one(D::tlb(DataTlb, 1, KB4, 64, Full), out),
        0x5c => one(D::tlb(DataTlb, 1, KB4, 128, Full), out),
        0x5d => one(D::tlb(DataTlb, 1, KB4, 256, Full), out),
        0x60 => one(D::cache(Data, 1, 16, 8, 64), out),
        0x61 => one(D::tlb(InstructionTlb, 1, KB4, 48, Full), out),
        // Two descriptors from one byte: a 2M/4M data TLB and a 1G one.
        0x63 => {
            one(D::tlb(DataTlb, 1, MB2, 32, Ways(4)), out);
            one(D::tlb(DataTlb, 1, GB1, 4, Ways(4)), out);
        }
        0x66 => one(D::cache(Data, 1, 8, 4, 64), out),
        0x67 => one(D::cache(Data, 1, 16, 4, 64), out),
        0x68 => one(D::cache(Data, 1, 32, 4, 64), out),
        // Trace caches: size is in K-micro-ops, reported in `entries`.
        0x70 => one(trace_cache(12 * 1024, 8), out),
        0x71 => one(trace_cache(16 * 1024, 8), out),
        0x72 => one(trace_cache(32 * 1024, 8), out),
        0x76 => one(D::tlb(InstructionTlb, 1, MB2, 8, Full), out),
        0x78 => one(D::cache(Unified, 2, 1024, 4, 64), out),
        0x79 => one(D::cache(Unified, 2, 128, 8, 64), out),
        0x7a => one(D::cache(Unified, 2, 256, 8, 64), out),
        0x7b => one(D::cache(Unified, 2, 512, 8, 64), out),
        0x7c => one(D::cache(Unified, 2, 1024, 8, 64), out),
        0x7d => one(D::cache(Unified, 2, 2048, 8, 64), out),
        0x7f => one(D::cache(Unified, 2, 512, 2, 64), out),
        0x80 => one(D::cache(Unified, 2, 512, 8, 64), out),
        0x82 => one(D::cache(Unified, 2, 256, 8, 32), out),
        0x83 => one(D::cache(Unified, 2, 512, 8, 32), out),
        0x84 => one(D::cache(Unified, 2, 1024, 8, 32), out),
        0x85 => one(D::cache(Unified, 2, 2048, 8, 32), out),
        0x86 => one(D::cache(Unified, 2, 512, 4, 64), out),
        0x87 => one(D::cache(Unified, 2, 1024, 8, 64), out),
        0xa0 => one(D::tlb(DataTlb, 1, KB4, 32, Full), out),
        0xb0 => one(D::tlb(InstructionTlb, 1, KB4, 128, Ways(4)), out),
        0xb1 => one(D::tlb(InstructionTlb, 1, MB2, 8, Ways(4)), out),
        0xb2 => one(D::tlb(InstructionTlb, 1, KB4, 64, Ways(4)), out),
        0xb3 => one(D::tlb(DataTlb, 1, KB4, 128, Ways(4)), out),
        0xb4 => one(D::tlb(DataTlb, 1, KB4, 256, Ways(4)), out),
        0xb5 => one(D::tlb(InstructionTlb, 1, KB4, 64, Ways(8)), out),
        0xb6 => one(D::tlb(InstructionTlb, 1, KB4, 128, Ways(8)), out),
        0xba => one(D::tlb(DataTlb, 1, KB4, 64, Ways(4)), out),
        0xc0 => one(D::tlb(DataTlb, 1, KB4, 8, Ways(4)), out),
        0xc1 => one(D::tlb(UnifiedTlb, 2, KB4, 1024, Ways(8)), out),
        0xc2 => one(D::tlb(DataTlb, 1, KB4, 16, Ways(4)), out),
        0xc3 => {
            one(D::tlb(UnifiedTlb, 2, KB4, 1536, Ways(6)), out);
            one(D::tlb(UnifiedTlb, 2, GB1, 16, Ways(4)), out);
        }
        0xc4 => one(D::tlb(DataTlb, 1, MB2, 32, Ways(4)), out),
        0xca => one(D::tlb(UnifiedTlb, 2, KB4, 512, Ways(4)), out),
        0xd0 => one(D::cache(Unified, 3, 512, 4, 64), out),
        0xd1 => one(D::cache(Unified, 3, 1024, 4, 64), out),
        0xd2 => one(D::cache(Unified, 3, 2048, 4, 64), out),
        0xd6 => one(D::cache(Unified, 3, 1024, 8, 64), out),
        0xd7 => one(D::cache(Unified, 3, 2048, 8, 64), out),
        0xd8 => one(D::cache(Unified, 3, 4096, 8, 64), out),
        0xdc => one(D::cache(Unified, 3, 1536, 12, 64), out),
        0xdd => one(D::cache(Unified, 3, 3072, 12, 64), out),
        0xde => one(D::cache(Unified, 3, 6144, 12, 64), out),
        0xe2 => one(D::cache(Unified, 3, 2048, 16, 64), out),
        0xe3 => one(D::cache(Unified, 3, 4096, 16, 64), out),
        0xe4 => one(D::cache(Unified, 3, 8192, 16, 64), out),
        0xea => one(D::cache(Unified, 3, 12288, 24, 64), out),
        0xeb => one(D::cache(Unified, 3, 18432, 24, 64), out),
        0xec => one(D::cache(Unified, 3, 24576, 24, 64), out),
        0xf0 => one(prefetch(64), out),
        0xf1 => one(prefetch(128), out),
        // 0x40 ("no higher-level cache"), 0xfe/0xff ("use the deterministic
        // leaf instead") and unrecognized bytes contribute nothing.
        _ => {}
    }
}

fn trace_cache(uops: u32, ways: u32) -> CacheDescriptor {
    CacheDescriptor {
        kind: CacheKind::Trace,
        level: 1,
        size_bytes: None,
        line_size: 0,
        associativity: Associativity::Ways(ways),
        entries: uops,
        page_bytes: None,
        shared_by_threads: 1,
        partitioned_by_core: 1,
    }
}

fn prefetch(stride: u32) -> CacheDescriptor {
    CacheDescriptor {
        kind: CacheKind::Prefetch,
        level: 1,
        size_bytes: None,
        line_size: stride,
        associativity: Associativity::Direct,
        entries: 0,
        page_bytes: None,
        shared_by_threads: 1,
        partitioned_by_core: 1,
    }
}

// ---------------------------------------------------------------------------
// Format 2: deterministic parameterized leaf (leaf 4)
// ---------------------------------------------------------------------------

fn deterministic_kind(type_field: u32) -> Option<CacheKind> {
    match type_field {
        1 => Some(CacheKind::Data),
        2 => Some(CacheKind::Instruction),
        3 => Some(CacheKind::Unified),
        // 0 = no more caches; anything else is malformed and means the same.
        _ => None,
    }
}

fn decode_deterministic_leaf(snapshot: &ProbeSnapshot, out: &mut Vec<CacheDescriptor>) {
    for words in snapshot.subleaves(4) {
        let type_field = extract32(words.eax, 0, 5);
        let Some(kind) = deterministic_kind(type_field) else {
            if type_field != 0 {
                log::debug!("deterministic cache sub-leaf with type {type_field}, ignoring");
            }
            break;
        };
        let level = extract32(words.eax, 5, 8) as u8;
        let fully = bit32(words.eax, 9);
        let threads = extract32(words.eax, 14, 26) + 1;
        let cores = extract32(words.eax, 26, 32) + 1;

        // The ebx fields are stored biased by one: a raw zero means one.
        let line = extract32(words.ebx, 0, 12) + 1;
        let partitions = extract32(words.ebx, 12, 22) + 1;
        let ways = extract32(words.ebx, 22, 32) + 1;
        // Sets come through verbatim, not biased.
        let sets = words.ecx as u64;

        let size = ways as u64 * partitions as u64 * line as u64 * (sets + 1);

        out.push(CacheDescriptor {
            kind,
            level,
            size_bytes: Some(size),
            line_size: line,
            associativity: if fully {
                Associativity::Full
            } else {
                Associativity::Ways(ways)
            },
            entries: 0,
            page_bytes: None,
            shared_by_threads: threads,
            partitioned_by_core: cores,
        });
    }
}

// ---------------------------------------------------------------------------
// Format 3: legacy extended leaves 0x8000_0005 / 0x8000_0006 / 0x8000_0019
// ---------------------------------------------------------------------------

/// L2/L3 associativity-index translation. Indices 0 and 6 are reserved in
/// the encoding and mean "not present", never 0-way or 6-way.
const ASSOC_INDEX: [Option<Associativity>; 16] = [
    None,
    Some(Associativity::Direct),
    Some(Associativity::Ways(2)),
    Some(Associativity::Ways(3)),
    Some(Associativity::Ways(4)),
    Some(Associativity::Ways(6)),
    None,
    Some(Associativity::Ways(8)),
    Some(Associativity::Ways(16)),
    Some(Associativity::Ways(24)),
    Some(Associativity::Ways(32)),
    Some(Associativity::Ways(48)),
    Some(Associativity::Ways(64)),
    Some(Associativity::Ways(96)),
    Some(Associativity::Ways(128)),
    Some(Associativity::Full),
];

/// L1 leaves encode associativity as a plain byte: 0 = not present,
/// 0xFF = fully associative, anything else a direct way count.
fn l1_assoc(byte: u32) -> Option<Associativity> {
    match byte {
        0 => None,
        0xFF => Some(Associativity::Full),
        1 => Some(Associativity::Direct),
        w => Some(Associativity::Ways(w)),
    }
}

fn decode_ext_l1(words: &crate::probe::RawWords, out: &mut Vec<CacheDescriptor>) {
    // eax: 2M/4M-page TLBs, low half instruction, high half data.
    // ebx: the same pair for 4K pages.
    for (word, page_kb) in [(words.eax, MB2), (words.ebx, KB4)] {
        let i_entries = extract32(word, 0, 8);
        if let Some(assoc) = l1_assoc(extract32(word, 8, 16)) {
            if i_entries > 0 {
                out.push(CacheDescriptor::tlb(
                    CacheKind::InstructionTlb,
                    1,
                    page_kb,
                    i_entries,
                    assoc,
                ));
            }
        }
        let d_entries = extract32(word, 16, 24);
        if let Some(assoc) = l1_assoc(extract32(word, 24, 32)) {
            if d_entries > 0 {
                out.push(CacheDescriptor::tlb(
                    CacheKind::DataTlb,
                    1,
                    page_kb,
                    d_entries,
                    assoc,
                ));
            }
        }
    }

    // ecx: L1 data cache, edx: L1 instruction cache.
    for (word, kind) in [(words.ecx, CacheKind::Data), (words.edx, CacheKind::Instruction)] {
        let size_kb = extract32(word, 24, 32) as u64;
        let line = extract32(word, 0, 8);
        if size_kb == 0 {
            continue;
        }
        if let Some(assoc) = l1_assoc(extract32(word, 16, 24)) {
            out.push(CacheDescriptor {
                kind,
                level: 1,
                size_bytes: Some(size_kb * 1024),
                line_size: line,
                associativity: assoc,
                entries: 0,
                page_bytes: None,
                shared_by_threads: 1,
                partitioned_by_core: 1,
            });
        }
    }
}

fn decode_ext_l2_l3(words: &crate::probe::RawWords, out: &mut Vec<CacheDescriptor>) {
    // eax: L2 TLB for 2M/4M pages, ebx: L2 TLB for 4K pages. Each half-word
    // carries a 12-bit entry count and a 4-bit associativity index.
    for (word, page_kb) in [(words.eax, MB2), (words.ebx, KB4)] {
        let i_entries = extract32(word, 0, 12);
        if let Some(assoc) = ASSOC_INDEX[extract32(word, 12, 16) as usize] {
            if i_entries > 0 {
                out.push(CacheDescriptor::tlb(
                    CacheKind::InstructionTlb,
                    2,
                    page_kb,
                    i_entries,
                    assoc,
                ));
            }
        }
        let d_entries = extract32(word, 16, 28);
        if let Some(assoc) = ASSOC_INDEX[extract32(word, 28, 32) as usize] {
            if d_entries > 0 {
                out.push(CacheDescriptor::tlb(
                    CacheKind::DataTlb,
                    2,
                    page_kb,
                    d_entries,
                    assoc,
                ));
            }
        }
    }

    // ecx: L2 cache (size in KB).
    let l2_kb = extract32(words.ecx, 16, 32) as u64;
    if l2_kb > 0 {
        if let Some(assoc) = ASSOC_INDEX[extract32(words.ecx, 12, 16) as usize] {
            out.push(CacheDescriptor {
                kind: CacheKind::Unified,
                level: 2,
                size_bytes: Some(l2_kb * 1024),
                line_size: extract32(words.ecx, 0, 8),
                associativity: assoc,
                entries: 0,
                page_bytes: None,
                shared_by_threads: 1,
                partitioned_by_core: 1,
            });
        }
    }

    // edx: L3 cache (size in 512 KB units).
    let l3_units = extract32(words.edx, 18, 32) as u64;
    if l3_units > 0 {
        if let Some(assoc) = ASSOC_INDEX[extract32(words.edx, 12, 16) as usize] {
            out.push(CacheDescriptor {
                kind: CacheKind::Unified,
                level: 3,
                size_bytes: Some(l3_units * 512 * 1024),
                line_size: extract32(words.edx, 0, 8),
                associativity: assoc,
                entries: 0,
                page_bytes: None,
                shared_by_threads: 1,
                partitioned_by_core: 1,
            });
        }
    }
}

fn decode_ext_1g_tlb(words: &crate::probe::RawWords, out: &mut Vec<CacheDescriptor>) {
    // eax: L1 TLB for 1 GB pages, ebx: L2 TLB for 1 GB pages.
    for (word, level) in [(words.eax, 1u8), (words.ebx, 2u8)] {
        let i_entries = extract32(word, 0, 12);
        if let Some(assoc) = ASSOC_INDEX[extract32(word, 12, 16) as usize] {
            if i_entries > 0 {
                out.push(CacheDescriptor::tlb(
                    CacheKind::InstructionTlb,
                    level,
                    GB1,
                    i_entries,
                    assoc,
                ));
            }
        }
        let d_entries = extract32(word, 16, 28);
        if let Some(assoc) = ASSOC_INDEX[extract32(word, 28, 32) as usize] {
            if d_entries > 0 {
                out.push(CacheDescriptor::tlb(
                    CacheKind::DataTlb,
                    level,
                    GB1,
                    d_entries,
                    assoc,
                ));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Format 4: deterministic extended leaf 0x8000_001d
// ---------------------------------------------------------------------------

fn decode_ext_deterministic_leaf(snapshot: &ProbeSnapshot, out: &mut Vec<CacheDescriptor>) {
    for words in snapshot.subleaves(0x8000_001d) {
        let type_field = extract32(words.eax, 0, 5);
        let Some(kind) = deterministic_kind(type_field) else {
            break;
        };
        let level = extract32(words.eax, 5, 8) as u8;
        let fully = bit32(words.eax, 9);
        // This leaf has its own layout: a 12-bit sharing count and no
        // cores-on-die field. Offsets are deliberately written out here
        // rather than shared with the leaf-4 decoder.
        let threads = extract32(words.eax, 14, 26) + 1;

        let line = extract32(words.ebx, 0, 12) + 1;
        let partitions = extract32(words.ebx, 12, 22) + 1;
        let ways = extract32(words.ebx, 22, 32) + 1;
        let sets = words.ecx as u64;

        let size = ways as u64 * partitions as u64 * line as u64 * (sets + 1);

        out.push(CacheDescriptor {
            kind,
            level,
            size_bytes: Some(size),
            line_size: line,
            associativity: if fully {
                Associativity::Full
            } else {
                Associativity::Ways(ways)
            },
            entries: 0,
            page_bytes: None,
            shared_by_threads: threads,
            partitioned_by_core: 1,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeSnapshot, RawWords};
    use crate::version::{Vendor, VersionRecord};

    fn intel_version(word: u32) -> VersionRecord {
        VersionRecord::decode(Vendor::Intel, word)
    }

    /// leaf-4 style sub-leaf words for a cache.
    fn det_words(type_: u32, level: u32, ways: u32, parts: u32, line: u32, sets: u32) -> RawWords {
        RawWords::new(
            type_ | (level << 5),
            (line - 1) | ((parts - 1) << 12) | ((ways - 1) << 22),
            sets,
            0,
        )
    }

    #[test]
    fn test_deterministic_size_math() {
        // ways=4 (raw 3), partitions=1 (raw 0), line=64 (raw 63), sets raw
        // 511: size must be 4*1*64*512 = 131072 bytes.
        let mut snap = ProbeSnapshot::new();
        snap.push(0, RawWords::new(4, 0, 0, 0));
        snap.push(4, det_words(1, 1, 4, 1, 64, 511));
        snap.push(4, RawWords::zero());
        let caches = build(&intel_version(0x000906EA), &snap);
        assert_eq!(caches.len(), 1);
        assert_eq!(caches[0].size_bytes, Some(131072));
        assert_eq!(caches[0].kind, CacheKind::Data);
        assert_eq!(caches[0].level, 1);
        assert_eq!(caches[0].line_size, 64);
        assert_eq!(caches[0].associativity, Associativity::Ways(4));
    }

    #[test]
    fn test_deterministic_stops_at_type_zero() {
        let mut snap = ProbeSnapshot::new();
        snap.push(0, RawWords::new(4, 0, 0, 0));
        snap.push(4, det_words(1, 1, 8, 1, 64, 63));
        snap.push(4, RawWords::zero());
        snap.push(4, det_words(3, 2, 8, 1, 64, 1023));
        let caches = build(&intel_version(0x000906EA), &snap);
        // The unified cache after the terminator must not be decoded.
        assert_eq!(caches.len(), 1);
    }

    #[test]
    fn test_deterministic_malformed_type_is_no_cache() {
        let mut snap = ProbeSnapshot::new();
        snap.push(0, RawWords::new(4, 0, 0, 0));
        snap.push(4, det_words(7, 1, 8, 1, 64, 63));
        let caches = build(&intel_version(0x000906EA), &snap);
        assert!(caches.is_empty());
    }

    #[test]
    fn test_deterministic_sharing_fields() {
        let mut snap = ProbeSnapshot::new();
        snap.push(0, RawWords::new(4, 0, 0, 0));
        let mut w = det_words(3, 3, 16, 1, 64, 16383);
        w.eax |= (15 << 14) | (7 << 26); // 16 threads share, 8 cores on die
        snap.push(4, w);
        let caches = build(&intel_version(0x000906EA), &snap);
        assert_eq!(caches[0].shared_by_threads, 16);
        assert_eq!(caches[0].partitioned_by_core, 8);
    }

    #[test]
    fn test_legacy_byte_simple() {
        // Sub-leaf word carrying descriptor 0x2c (L1D 32K 8-way) in ebx.
        let mut snap = ProbeSnapshot::new();
        snap.push(0, RawWords::new(2, 0, 0, 0));
        snap.push(2, RawWords::new(0x01, 0x2c, 0, 0));
        let caches = build(&intel_version(0x000906EA), &snap);
        assert_eq!(caches.len(), 1);
        assert_eq!(caches[0].kind, CacheKind::Data);
        assert_eq!(caches[0].size_bytes, Some(32 * 1024));
        assert_eq!(caches[0].associativity, Associativity::Ways(8));
    }

    #[test]
    fn test_legacy_byte_reserved_register_skipped() {
        let mut snap = ProbeSnapshot::new();
        snap.push(0, RawWords::new(2, 0, 0, 0));
        // ebx carries 0x2c but bit 31 marks the register reserved.
        snap.push(2, RawWords::new(0x01, 0x2c | (1 << 31), 0, 0));
        let caches = build(&intel_version(0x000906EA), &snap);
        assert!(caches.is_empty());
    }

    #[test]
    fn test_legacy_byte_49_overload() {
        let mut snap = ProbeSnapshot::new();
        snap.push(0, RawWords::new(2, 0, 0, 0));
        snap.push(2, RawWords::new(0x01, 0x49, 0, 0));

        // Xeon MP signature: family 0xF model 6 -> the byte means L2.
        let xeon = VersionRecord::decode(Vendor::Intel, 0x0000_0F60);
        assert_eq!(xeon.family_synth, 0x0F);
        assert_eq!(xeon.model_synth, 0x06);
        let caches = build(&xeon, &snap);
        assert_eq!(caches[0].level, 2);

        // Anything else -> L3.
        let caches = build(&intel_version(0x000906EA), &snap);
        assert_eq!(caches[0].level, 3);
    }

    #[test]
    fn test_legacy_byte_63_two_descriptors() {
        let mut snap = ProbeSnapshot::new();
        snap.push(0, RawWords::new(2, 0, 0, 0));
        snap.push(2, RawWords::new(0x01, 0x63, 0, 0));
        let caches = build(&intel_version(0x000906EA), &snap);
        assert_eq!(caches.len(), 2);
        assert_eq!(caches[0].page_bytes, Some(2 * 1024 * 1024));
        assert_eq!(caches[1].page_bytes, Some(1024 * 1024 * 1024));
    }

    #[test]
    fn test_ext_l1_cache_fields() {
        // L1D: 32 KB, 8-way, 64-byte lines; L1I: 64 KB, 4-way, 64-byte.
        let mut snap = ProbeSnapshot::new();
        snap.push(0x8000_0000, RawWords::new(0x8000_0005, 0, 0, 0));
        snap.push(
            0x8000_0005,
            RawWords::new(0, 0, 0x2008_0140 | 64, 0x4004_0140 | 64),
        );
        let caches = build(&intel_version(0x00870F10), &snap);
        let l1d = caches.iter().find(|c| c.kind == CacheKind::Data).unwrap();
        assert_eq!(l1d.size_bytes, Some(32 * 1024));
        assert_eq!(l1d.associativity, Associativity::Ways(8));
        assert_eq!(l1d.line_size, 64);
        let l1i = caches.iter().find(|c| c.kind == CacheKind::Instruction).unwrap();
        assert_eq!(l1i.size_bytes, Some(64 * 1024));
        assert_eq!(l1i.associativity, Associativity::Ways(4));
    }

    #[test]
    fn test_ext_l1_tlbs() {
        // eax: 2M/4M TLBs: 64-entry 4-way inst, 64-entry full data.
        let eax = 64 | (4 << 8) | (64 << 16) | (0xFF << 24);
        let mut snap = ProbeSnapshot::new();
        snap.push(0x8000_0000, RawWords::new(0x8000_0005, 0, 0, 0));
        snap.push(0x8000_0005, RawWords::new(eax, 0, 0, 0));
        let caches = build(&intel_version(0x00870F10), &snap);
        assert_eq!(caches.len(), 2);
        assert_eq!(caches[0].kind, CacheKind::InstructionTlb);
        assert_eq!(caches[0].entries, 64);
        assert_eq!(caches[1].associativity, Associativity::Full);
    }

    #[test]
    fn test_ext_l2_assoc_index_reserved() {
        // L2 512 KB with associativity index 6: reserved, so no record.
        let ecx = 64 | (6 << 12) | (512 << 16);
        let mut snap = ProbeSnapshot::new();
        snap.push(0x8000_0000, RawWords::new(0x8000_0006, 0, 0, 0));
        snap.push(0x8000_0006, RawWords::new(0, 0, ecx, 0));
        let caches = build(&intel_version(0x00870F10), &snap);
        assert!(caches.is_empty());
    }

    #[test]
    fn test_ext_l2_l3_sizes() {
        // L2 512 KB 8-way (index 7); L3 in 512 KB units: 16 -> 8 MB, 16-way.
        let ecx = 64 | (7 << 12) | (512 << 16);
        let edx = 64 | (8 << 12) | (16 << 18);
        let mut snap = ProbeSnapshot::new();
        snap.push(0x8000_0000, RawWords::new(0x8000_0006, 0, 0, 0));
        snap.push(0x8000_0006, RawWords::new(0, 0, ecx, edx));
        let caches = build(&intel_version(0x00870F10), &snap);
        assert_eq!(caches.len(), 2);
        assert_eq!(caches[0].size_bytes, Some(512 * 1024));
        assert_eq!(caches[0].associativity, Associativity::Ways(8));
        assert_eq!(caches[1].size_bytes, Some(8 * 1024 * 1024));
        assert_eq!(caches[1].associativity, Associativity::Ways(16));
    }

    #[test]
    fn test_ext_1g_tlb() {
        let eax = 16 | (4 << 12); // L1 instruction, 16 entries, 4-way
        let mut snap = ProbeSnapshot::new();
        snap.push(0x8000_0000, RawWords::new(0x8000_0019, 0, 0, 0));
        snap.push(0x8000_0019, RawWords::new(eax, 0, 0, 0));
        let caches = build(&intel_version(0x00870F10), &snap);
        assert_eq!(caches.len(), 1);
        assert_eq!(caches[0].page_bytes, Some(1024 * 1024 * 1024));
        assert_eq!(caches[0].entries, 16);
    }

    #[test]
    fn test_ext_deterministic_no_cores_field() {
        let mut snap = ProbeSnapshot::new();
        snap.push(0x8000_0000, RawWords::new(0x8000_001d, 0, 0, 0));
        let mut w = det_words(3, 3, 16, 1, 64, 16383);
        // Bits [26,32) are reserved in this layout and must not leak into
        // a cores-on-die count.
        w.eax |= (15 << 14) | (7 << 26);
        snap.push(0x8000_001d, w);
        let caches = build(&intel_version(0x00870F10), &snap);
        assert_eq!(caches[0].shared_by_threads, 16);
        assert_eq!(caches[0].partitioned_by_core, 1);
    }

    #[test]
    fn test_no_cross_format_dedup() {
        // The same L1D reported by leaf 2 (0x2c) and leaf 4 yields two
        // records, flagged here rather than silently merged.
        let mut snap = ProbeSnapshot::new();
        snap.push(0, RawWords::new(4, 0, 0, 0));
        snap.push(2, RawWords::new(0x01, 0x2c, 0, 0));
        snap.push(4, det_words(1, 1, 8, 1, 64, 63));
        let caches = build(&intel_version(0x000906EA), &snap);
        assert_eq!(caches.len(), 2);
        assert_eq!(caches[0].size_bytes, caches[1].size_bytes);
    }

    #[test]
    fn test_absent_leaves_empty() {
        let snap = ProbeSnapshot::new();
        let caches = build(&intel_version(0x000906EA), &snap);
        assert!(caches.is_empty());
    }

    #[test]
    fn test_display_impls() {
        assert_eq!(CacheKind::DataTlb.to_string(), "Data TLB");
        assert_eq!(Associativity::Ways(8).to_string(), "8-way");
        assert_eq!(Associativity::Full.to_string(), "fully-associative");
        assert_eq!(Associativity::Direct.to_string(), "direct-mapped");
        assert_eq!(Associativity::Unknown.to_string(), "unknown");
        assert_eq!(Associativity::Unknown.ways(), 0);
    }

    #[test]
    fn test_descriptor_serialization() {
        let d = CacheDescriptor::cache(CacheKind::Unified, 2, 512, 8, 64);
        let json = serde_json::to_string(&d).unwrap();
        let back: CacheDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(d, back);
    }
}
