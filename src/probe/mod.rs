//! Raw probe layer: hardware identification queries and OS pseudo-file reads.
//!
//! The decode engine never touches hardware directly; it consumes data
//! gathered through the [`RawProbe`] trait. On x86_64 the probe issues the
//! CPUID instruction; on ARM/Linux it reads the auxiliary-vector capability
//! words and line-oriented pseudo-files such as `/proc/cpuinfo`.
//!
//! # Platform Support
//!
//! - **x86_64**: CPUID via `core::arch` intrinsics, TSC via `_rdtsc`
//! - **ARM Linux**: `getauxval(AT_HWCAP/AT_HWCAP2)`, `/proc/cpuinfo`
//! - Other targets: queries return zeroed words (everything downstream
//!   degrades to an empty contribution)

use std::collections::BTreeMap;
use std::io;

use serde::{Deserialize, Serialize};

/// One hardware identification result: four packed 32-bit register words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawWords {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

impl RawWords {
    /// All-zero result, the value an absent leaf decodes as.
    pub const fn zero() -> Self {
        Self { eax: 0, ebx: 0, ecx: 0, edx: 0 }
    }

    pub const fn new(eax: u32, ebx: u32, ecx: u32, edx: u32) -> Self {
        Self { eax, ebx, ecx, edx }
    }
}

/// Register selector within a [`RawWords`] tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reg {
    Eax,
    Ebx,
    Ecx,
    Edx,
}

impl RawWords {
    /// Select one register word.
    pub fn reg(&self, reg: Reg) -> u32 {
        match reg {
            Reg::Eax => self.eax,
            Reg::Ebx => self.ebx,
            Reg::Ecx => self.ecx,
            Reg::Edx => self.edx,
        }
    }
}

/// Source of raw identification data.
///
/// One profiling pass issues a strictly sequential series of these calls.
/// Implementations must be side-effect free from the engine's point of view;
/// the engine holds no state between calls beyond the snapshot it builds.
pub trait RawProbe {
    /// Issue one identification query for `leaf`/`subleaf`.
    ///
    /// Leaves that do not define a sub-leaf are queried with `subleaf = 0`.
    /// Unsupported leaves return whatever the hardware returns for them
    /// (typically the highest-supported-leaf echo or zeros); the engine
    /// guards every access with a max-leaf range check.
    fn query(&self, leaf: u32, subleaf: u32) -> RawWords;

    /// Read the monotonic cycle counter. Used only by frequency estimation.
    fn cycle_counter(&self) -> u64;

    /// ARM/Linux OS capability bit-vector pair (hwcap, hwcap2).
    ///
    /// Returns `(0, 0)` where the OS does not expose capability words.
    fn capability_words(&self) -> (u32, u32);

    /// Read a line-oriented `key : value` pseudo-file.
    ///
    /// Keys and values are returned trimmed, one pair per line, in file
    /// order. Lines without a separator are skipped.
    fn text_probe(&self, path: &str) -> io::Result<Vec<(String, String)>>;
}

/// Probe backed by the real hardware and OS.
#[derive(Debug, Default)]
pub struct NativeProbe;

impl NativeProbe {
    pub fn new() -> Self {
        Self
    }
}

impl RawProbe for NativeProbe {
    #[cfg(target_arch = "x86_64")]
    fn query(&self, leaf: u32, subleaf: u32) -> RawWords {
        // Safe on every x86_64: CPUID is unprivileged and always present.
        let r = unsafe { core::arch::x86_64::__cpuid_count(leaf, subleaf) };
        RawWords { eax: r.eax, ebx: r.ebx, ecx: r.ecx, edx: r.edx }
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn query(&self, _leaf: u32, _subleaf: u32) -> RawWords {
        RawWords::zero()
    }

    #[cfg(target_arch = "x86_64")]
    fn cycle_counter(&self) -> u64 {
        unsafe { core::arch::x86_64::_rdtsc() }
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn cycle_counter(&self) -> u64 {
        // No architectural counter exposed in stable core::arch here; a
        // monotonic clock in nanoseconds keeps the frequency math usable.
        use std::time::Instant;
        use std::sync::OnceLock;
        static EPOCH: OnceLock<Instant> = OnceLock::new();
        EPOCH.get_or_init(Instant::now).elapsed().as_nanos() as u64
    }

    #[cfg(target_os = "linux")]
    fn capability_words(&self) -> (u32, u32) {
        let hwcap = unsafe { libc::getauxval(libc::AT_HWCAP) };
        let hwcap2 = unsafe { libc::getauxval(libc::AT_HWCAP2) };
        (hwcap as u32, hwcap2 as u32)
    }

    #[cfg(not(target_os = "linux"))]
    fn capability_words(&self) -> (u32, u32) {
        (0, 0)
    }

    fn text_probe(&self, path: &str) -> io::Result<Vec<(String, String)>> {
        let text = std::fs::read_to_string(path)?;
        Ok(parse_key_value_lines(&text))
    }
}

/// Split `key : value` lines into trimmed pairs, preserving file order.
pub(crate) fn parse_key_value_lines(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Canned probe for tests and benches: a fixed `(leaf, subleaf)` map plus
/// optional capability words and text-probe content.
#[derive(Debug, Default, Clone)]
pub struct MockProbe {
    leaves: BTreeMap<(u32, u32), RawWords>,
    pub hwcap: (u32, u32),
    pub cpuinfo: String,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the words returned for `(leaf, subleaf)`.
    pub fn set(&mut self, leaf: u32, subleaf: u32, words: RawWords) -> &mut Self {
        self.leaves.insert((leaf, subleaf), words);
        self
    }
}

impl RawProbe for MockProbe {
    fn query(&self, leaf: u32, subleaf: u32) -> RawWords {
        self.leaves
            .get(&(leaf, subleaf))
            .copied()
            .unwrap_or(RawWords::zero())
    }

    fn cycle_counter(&self) -> u64 {
        0
    }

    fn capability_words(&self) -> (u32, u32) {
        self.hwcap
    }

    fn text_probe(&self, _path: &str) -> io::Result<Vec<(String, String)>> {
        Ok(parse_key_value_lines(&self.cpuinfo))
    }
}

/// Every sub-leaf gathered for the leaves one profiling pass visited.
///
/// Built once by the architecture adapter, then consumed read-only by the
/// decoders. Sub-leaf words are stored in query order (index = sub-leaf).
#[derive(Debug, Default, Clone)]
pub struct ProbeSnapshot {
    leaves: BTreeMap<u32, Vec<RawWords>>,
}

impl ProbeSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the words for the next sub-leaf of `leaf`.
    pub fn push(&mut self, leaf: u32, words: RawWords) {
        self.leaves.entry(leaf).or_default().push(words);
    }

    /// Sub-leaf 0 of `leaf`, if the leaf was gathered.
    pub fn leaf(&self, leaf: u32) -> Option<&RawWords> {
        self.leaves.get(&leaf).and_then(|v| v.first())
    }

    /// All gathered sub-leaves of `leaf`, in sub-leaf order.
    pub fn subleaves(&self, leaf: u32) -> &[RawWords] {
        self.leaves.get(&leaf).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Highest supported basic leaf (leaf 0, eax), 0 when absent.
    pub fn max_basic_leaf(&self) -> u32 {
        self.leaf(0).map(|w| w.eax).unwrap_or(0)
    }

    /// Highest supported extended leaf (leaf 0x8000_0000, eax), 0 when absent.
    pub fn max_extended_leaf(&self) -> u32 {
        self.leaf(0x8000_0000).map(|w| w.eax).unwrap_or(0)
    }

    /// Range check for leaf presence: basic leaves against the basic
    /// maximum, 0x8000_xxxx leaves against the extended maximum. A leaf
    /// that fails this check contributes nothing downstream.
    pub fn supports(&self, leaf: u32) -> bool {
        if leaf & 0x8000_0000 != 0 {
            let max = self.max_extended_leaf();
            max >= 0x8000_0000 && leaf <= max
        } else {
            leaf <= self.max_basic_leaf()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_words_zero() {
        let w = RawWords::zero();
        assert_eq!(w.eax, 0);
        assert_eq!(w.reg(Reg::Edx), 0);
    }

    #[test]
    fn test_reg_select() {
        let w = RawWords::new(1, 2, 3, 4);
        assert_eq!(w.reg(Reg::Eax), 1);
        assert_eq!(w.reg(Reg::Ebx), 2);
        assert_eq!(w.reg(Reg::Ecx), 3);
        assert_eq!(w.reg(Reg::Edx), 4);
    }

    #[test]
    fn test_parse_key_value_lines() {
        let text = "model name\t: Cortex-A53\nbogus line\nCPU part\t: 0xd03\n";
        let pairs = parse_key_value_lines(text);
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], ("model name".to_string(), "Cortex-A53".to_string()));
        assert_eq!(pairs[1], ("CPU part".to_string(), "0xd03".to_string()));
    }

    #[test]
    fn test_mock_probe_missing_leaf_is_zero() {
        let probe = MockProbe::new();
        assert_eq!(probe.query(0x1234, 0), RawWords::zero());
    }

    #[test]
    fn test_snapshot_supports_basic() {
        let mut snap = ProbeSnapshot::new();
        snap.push(0, RawWords::new(0x16, 0, 0, 0));
        assert!(snap.supports(0x7));
        assert!(snap.supports(0x16));
        assert!(!snap.supports(0x17));
    }

    #[test]
    fn test_snapshot_supports_extended() {
        let mut snap = ProbeSnapshot::new();
        snap.push(0x8000_0000, RawWords::new(0x8000_0008, 0, 0, 0));
        assert!(snap.supports(0x8000_0001));
        assert!(snap.supports(0x8000_0008));
        assert!(!snap.supports(0x8000_0019));
    }

    #[test]
    fn test_snapshot_supports_extended_absent() {
        let snap = ProbeSnapshot::new();
        assert!(!snap.supports(0x8000_0001));
    }

    #[test]
    fn test_snapshot_subleaf_order() {
        let mut snap = ProbeSnapshot::new();
        snap.push(4, RawWords::new(1, 0, 0, 0));
        snap.push(4, RawWords::new(2, 0, 0, 0));
        let subs = snap.subleaves(4);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].eax, 1);
        assert_eq!(subs[1].eax, 2);
    }
}
