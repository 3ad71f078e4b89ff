//! Instruction-set feature aggregation.
//!
//! Maps (register, bit-position) pairs from the feature leaves into one
//! canonical [`FeatureSet`]. Most registers have architecturally fixed
//! semantics and use a single shared table; the extended feature register
//! pair of leaf 0x8000_0001 does not, so it gets fully separate per-vendor
//! tables (the same bit position legitimately means different things on
//! different vendors there, e.g. bit 20 of the extended edx word).
//!
//! Each extended leaf contributes its own small table, consulted only after
//! the max-leaf range check confirms the leaf exists. An absent leaf is not
//! an error; it simply contributes no flags.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::bitfield::bit32;
use crate::probe::{ProbeSnapshot, Reg};
use crate::version::Vendor;

/// A named instruction-set feature flag.
///
/// Names follow the lowercase token spelling the Linux kernel uses in
/// `/proc/cpuinfo`, which keeps the x86 flag list and the ARM `Features`
/// token list in one namespace.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[allow(missing_docs)]
pub enum Feature {
    // Leaf 1 edx
    Fpu,
    Vme,
    De,
    Pse,
    Tsc,
    Msr,
    Pae,
    Mce,
    Cx8,
    Apic,
    Sep,
    Mtrr,
    Pge,
    Mca,
    Cmov,
    Pat,
    Pse36,
    Psn,
    Clfsh,
    Ds,
    Acpi,
    Mmx,
    Fxsr,
    Sse,
    Sse2,
    Ss,
    Htt,
    Tm,
    Pbe,
    // Leaf 1 ecx
    Sse3,
    Pclmulqdq,
    Dtes64,
    Monitor,
    DsCpl,
    Vmx,
    Smx,
    Est,
    Tm2,
    Ssse3,
    CnxtId,
    Sdbg,
    Fma,
    Cx16,
    Xtpr,
    Pdcm,
    Pcid,
    Dca,
    Sse41,
    Sse42,
    X2apic,
    Movbe,
    Popcnt,
    TscDeadline,
    Aes,
    Xsave,
    Osxsave,
    Avx,
    F16c,
    Rdrand,
    Hypervisor,
    // Leaf 7 ebx
    Fsgsbase,
    TscAdjust,
    Sgx,
    Bmi1,
    Hle,
    Avx2,
    Smep,
    Bmi2,
    Erms,
    Invpcid,
    Rtm,
    Mpx,
    Avx512F,
    Avx512Dq,
    Rdseed,
    Adx,
    Smap,
    Avx512Ifma,
    Clflushopt,
    Clwb,
    ProcessorTrace,
    Avx512Pf,
    Avx512Er,
    Avx512Cd,
    Sha,
    Avx512Bw,
    Avx512Vl,
    // Leaf 7 ecx
    Avx512Vbmi,
    Umip,
    Pku,
    Avx512Vbmi2,
    Gfni,
    Vaes,
    Vpclmulqdq,
    Avx512Vnni,
    Avx512Bitalg,
    Avx512Vpopcntdq,
    Rdpid,
    Cldemote,
    Movdiri,
    Movdir64b,
    // Leaf 7 edx
    Fsrm,
    Avx512Vp2intersect,
    AmxBf16,
    Avx512Fp16,
    AmxTile,
    AmxInt8,
    // Leaf 0xd sub-leaf 1 eax
    Xsaveopt,
    Xsavec,
    Xgetbv1,
    Xsaves,
    // Leaf 0x8000_0001 edx (per vendor)
    Syscall,
    Nx,
    MmxExt,
    FxsrOpt,
    Page1Gb,
    Rdtscp,
    Lm,
    ThreeDNowExt,
    ThreeDNow,
    // Leaf 0x8000_0001 ecx (per vendor)
    LahfLm,
    CmpLegacy,
    Svm,
    ExtApic,
    Cr8Legacy,
    Abm,
    Sse4a,
    MisalignSse,
    ThreeDNowPrefetch,
    Osvw,
    Ibs,
    Xop,
    Skinit,
    Wdt,
    Lwp,
    Fma4,
    Tbm,
    TopoExt,
    // Leaf 0x8000_0007 edx
    Ts,
    HwPstate,
    InvariantTsc,
    Cpb,
    // Leaf 0x8000_0008 ebx
    Clzero,
    Wbnoinvd,
    // Leaf 0x8000_001b eax
    IbsFfv,
    IbsFetchSam,
    IbsOpSam,
    IbsRdWrOpCnt,
    IbsOpCnt,
    IbsBrnTrgt,
    // Leaf 0x8000_001c eax
    LwpAvail,
    LwpVal,
    LwpIre,
    LwpBre,
    // ARM hwcap
    Fp,
    Asimd,
    Evtstrm,
    Pmull,
    Sha1,
    Sha2,
    Crc32,
    Atomics,
    Fphp,
    AsimdHp,
    CpuidReg,
    AsimdRdm,
    Jscvt,
    Fcma,
    Lrcpc,
    Dcpop,
    Sha3,
    Sm3,
    Sm4,
    AsimdDp,
    Sha512,
    Sve,
    AsimdFhm,
    Dit,
    Uscat,
    Ilrcpc,
    Flagm,
    Ssbs,
    Sb,
    Paca,
    Pacg,
    // ARM hwcap2
    Dcpodp,
    Sve2,
    SveAes,
    SvePmull,
    SveBitperm,
    SveSha3,
    SveSm4,
    Flagm2,
    Frint,
    SveI8mm,
    SveF32mm,
    SveF64mm,
    SveBf16,
    I8mm,
    Bf16,
    Dgh,
    Rng,
    Bti,
    Mte,
}

impl Feature {
    /// Canonical lowercase flag token.
    pub fn name(self) -> &'static str {
        match self {
            Self::Fpu => "fpu",
            Self::Vme => "vme",
            Self::De => "de",
            Self::Pse => "pse",
            Self::Tsc => "tsc",
            Self::Msr => "msr",
            Self::Pae => "pae",
            Self::Mce => "mce",
            Self::Cx8 => "cx8",
            Self::Apic => "apic",
            Self::Sep => "sep",
            Self::Mtrr => "mtrr",
            Self::Pge => "pge",
            Self::Mca => "mca",
            Self::Cmov => "cmov",
            Self::Pat => "pat",
            Self::Pse36 => "pse36",
            Self::Psn => "psn",
            Self::Clfsh => "clflush",
            Self::Ds => "ds",
            Self::Acpi => "acpi",
            Self::Mmx => "mmx",
            Self::Fxsr => "fxsr",
            Self::Sse => "sse",
            Self::Sse2 => "sse2",
            Self::Ss => "ss",
            Self::Htt => "ht",
            Self::Tm => "tm",
            Self::Pbe => "pbe",
            Self::Sse3 => "sse3",
            Self::Pclmulqdq => "pclmulqdq",
            Self::Dtes64 => "dtes64",
            Self::Monitor => "monitor",
            Self::DsCpl => "ds_cpl",
            Self::Vmx => "vmx",
            Self::Smx => "smx",
            Self::Est => "est",
            Self::Tm2 => "tm2",
            Self::Ssse3 => "ssse3",
            Self::CnxtId => "cid",
            Self::Sdbg => "sdbg",
            Self::Fma => "fma",
            Self::Cx16 => "cx16",
            Self::Xtpr => "xtpr",
            Self::Pdcm => "pdcm",
            Self::Pcid => "pcid",
            Self::Dca => "dca",
            Self::Sse41 => "sse4_1",
            Self::Sse42 => "sse4_2",
            Self::X2apic => "x2apic",
            Self::Movbe => "movbe",
            Self::Popcnt => "popcnt",
            Self::TscDeadline => "tsc_deadline_timer",
            Self::Aes => "aes",
            Self::Xsave => "xsave",
            Self::Osxsave => "osxsave",
            Self::Avx => "avx",
            Self::F16c => "f16c",
            Self::Rdrand => "rdrand",
            Self::Hypervisor => "hypervisor",
            Self::Fsgsbase => "fsgsbase",
            Self::TscAdjust => "tsc_adjust",
            Self::Sgx => "sgx",
            Self::Bmi1 => "bmi1",
            Self::Hle => "hle",
            Self::Avx2 => "avx2",
            Self::Smep => "smep",
            Self::Bmi2 => "bmi2",
            Self::Erms => "erms",
            Self::Invpcid => "invpcid",
            Self::Rtm => "rtm",
            Self::Mpx => "mpx",
            Self::Avx512F => "avx512f",
            Self::Avx512Dq => "avx512dq",
            Self::Rdseed => "rdseed",
            Self::Adx => "adx",
            Self::Smap => "smap",
            Self::Avx512Ifma => "avx512ifma",
            Self::Clflushopt => "clflushopt",
            Self::Clwb => "clwb",
            Self::ProcessorTrace => "intel_pt",
            Self::Avx512Pf => "avx512pf",
            Self::Avx512Er => "avx512er",
            Self::Avx512Cd => "avx512cd",
            Self::Sha => "sha_ni",
            Self::Avx512Bw => "avx512bw",
            Self::Avx512Vl => "avx512vl",
            Self::Avx512Vbmi => "avx512vbmi",
            Self::Umip => "umip",
            Self::Pku => "pku",
            Self::Avx512Vbmi2 => "avx512_vbmi2",
            Self::Gfni => "gfni",
            Self::Vaes => "vaes",
            Self::Vpclmulqdq => "vpclmulqdq",
            Self::Avx512Vnni => "avx512_vnni",
            Self::Avx512Bitalg => "avx512_bitalg",
            Self::Avx512Vpopcntdq => "avx512_vpopcntdq",
            Self::Rdpid => "rdpid",
            Self::Cldemote => "cldemote",
            Self::Movdiri => "movdiri",
            Self::Movdir64b => "movdir64b",
            Self::Fsrm => "fsrm",
            Self::Avx512Vp2intersect => "avx512_vp2intersect",
            Self::AmxBf16 => "amx_bf16",
            Self::Avx512Fp16 => "avx512_fp16",
            Self::AmxTile => "amx_tile",
            Self::AmxInt8 => "amx_int8",
            Self::Xsaveopt => "xsaveopt",
            Self::Xsavec => "xsavec",
            Self::Xgetbv1 => "xgetbv1",
            Self::Xsaves => "xsaves",
            Self::Syscall => "syscall",
            Self::Nx => "nx",
            Self::MmxExt => "mmxext",
            Self::FxsrOpt => "fxsr_opt",
            Self::Page1Gb => "pdpe1gb",
            Self::Rdtscp => "rdtscp",
            Self::Lm => "lm",
            Self::ThreeDNowExt => "3dnowext",
            Self::ThreeDNow => "3dnow",
            Self::LahfLm => "lahf_lm",
            Self::CmpLegacy => "cmp_legacy",
            Self::Svm => "svm",
            Self::ExtApic => "extapic",
            Self::Cr8Legacy => "cr8_legacy",
            Self::Abm => "abm",
            Self::Sse4a => "sse4a",
            Self::MisalignSse => "misalignsse",
            Self::ThreeDNowPrefetch => "3dnowprefetch",
            Self::Osvw => "osvw",
            Self::Ibs => "ibs",
            Self::Xop => "xop",
            Self::Skinit => "skinit",
            Self::Wdt => "wdt",
            Self::Lwp => "lwp",
            Self::Fma4 => "fma4",
            Self::Tbm => "tbm",
            Self::TopoExt => "topoext",
            Self::Ts => "ts",
            Self::HwPstate => "hw_pstate",
            Self::InvariantTsc => "constant_tsc",
            Self::Cpb => "cpb",
            Self::Clzero => "clzero",
            Self::Wbnoinvd => "wbnoinvd",
            Self::IbsFfv => "ibs_ffv",
            Self::IbsFetchSam => "ibs_fetchsam",
            Self::IbsOpSam => "ibs_opsam",
            Self::IbsRdWrOpCnt => "ibs_rdwropcnt",
            Self::IbsOpCnt => "ibs_opcnt",
            Self::IbsBrnTrgt => "ibs_brntrgt",
            Self::LwpAvail => "lwp_avail",
            Self::LwpVal => "lwp_val",
            Self::LwpIre => "lwp_ire",
            Self::LwpBre => "lwp_bre",
            Self::Fp => "fp",
            Self::Asimd => "asimd",
            Self::Evtstrm => "evtstrm",
            Self::Pmull => "pmull",
            Self::Sha1 => "sha1",
            Self::Sha2 => "sha2",
            Self::Crc32 => "crc32",
            Self::Atomics => "atomics",
            Self::Fphp => "fphp",
            Self::AsimdHp => "asimdhp",
            Self::CpuidReg => "cpuid",
            Self::AsimdRdm => "asimdrdm",
            Self::Jscvt => "jscvt",
            Self::Fcma => "fcma",
            Self::Lrcpc => "lrcpc",
            Self::Dcpop => "dcpop",
            Self::Sha3 => "sha3",
            Self::Sm3 => "sm3",
            Self::Sm4 => "sm4",
            Self::AsimdDp => "asimddp",
            Self::Sha512 => "sha512",
            Self::Sve => "sve",
            Self::AsimdFhm => "asimdfhm",
            Self::Dit => "dit",
            Self::Uscat => "uscat",
            Self::Ilrcpc => "ilrcpc",
            Self::Flagm => "flagm",
            Self::Ssbs => "ssbs",
            Self::Sb => "sb",
            Self::Paca => "paca",
            Self::Pacg => "pacg",
            Self::Dcpodp => "dcpodp",
            Self::Sve2 => "sve2",
            Self::SveAes => "sveaes",
            Self::SvePmull => "svepmull",
            Self::SveBitperm => "svebitperm",
            Self::SveSha3 => "svesha3",
            Self::SveSm4 => "svesm4",
            Self::Flagm2 => "flagm2",
            Self::Frint => "frint",
            Self::SveI8mm => "svei8mm",
            Self::SveF32mm => "svef32mm",
            Self::SveF64mm => "svef64mm",
            Self::SveBf16 => "svebf16",
            Self::I8mm => "i8mm",
            Self::Bf16 => "bf16",
            Self::Dgh => "dgh",
            Self::Rng => "rng",
            Self::Bti => "bti",
            Self::Mte => "mte",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The canonical feature-flag set produced by one profiling pass.
///
/// Grows by union only while the pass runs; read-only afterward.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    flags: BTreeSet<Feature>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, feature: Feature) {
        self.flags.insert(feature);
    }

    pub fn contains(&self, feature: Feature) -> bool {
        self.flags.contains(&feature)
    }

    /// Look a flag up by its canonical token name.
    pub fn has_feature(&self, name: &str) -> bool {
        self.flags.iter().any(|f| f.name() == name)
    }

    pub fn union_with(&mut self, other: &FeatureSet) {
        self.flags.extend(other.flags.iter().copied());
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        self.flags.iter().copied()
    }

    /// Canonical token names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.flags.iter().map(|f| f.name()).collect()
    }
}

/// One row of a bit table: this register bit sets that flag.
type BitRow = (Reg, u8, Feature);

// ---------------------------------------------------------------------------
// Shared tables (architecturally fixed semantics)
// ---------------------------------------------------------------------------

const LEAF1: &[BitRow] = &[
    (Reg::Edx, 0, Feature::Fpu),
    (Reg::Edx, 1, Feature::Vme),
    (Reg::Edx, 2, Feature::De),
    (Reg::Edx, 3, Feature::Pse),
    (Reg::Edx, 4, Feature::Tsc),
    (Reg::Edx, 5, Feature::Msr),
    (Reg::Edx, 6, Feature::Pae),
    (Reg::Edx, 7, Feature::Mce),
    (Reg::Edx, 8, Feature::Cx8),
    (Reg::Edx, 9, Feature::Apic),
    (Reg::Edx, 11, Feature::Sep),
    (Reg::Edx, 12, Feature::Mtrr),
    (Reg::Edx, 13, Feature::Pge),
    (Reg::Edx, 14, Feature::Mca),
    (Reg::Edx, 15, Feature::Cmov),
    (Reg::Edx, 16, Feature::Pat),
    (Reg::Edx, 17, Feature::Pse36),
    (Reg::Edx, 18, Feature::Psn),
    (Reg::Edx, 19, Feature::Clfsh),
    (Reg::Edx, 21, Feature::Ds),
    (Reg::Edx, 22, Feature::Acpi),
    (Reg::Edx, 23, Feature::Mmx),
    (Reg::Edx, 24, Feature::Fxsr),
    (Reg::Edx, 25, Feature::Sse),
    (Reg::Edx, 26, Feature::Sse2),
    (Reg::Edx, 27, Feature::Ss),
    (Reg::Edx, 28, Feature::Htt),
    (Reg::Edx, 29, Feature::Tm),
    (Reg::Edx, 31, Feature::Pbe),
    (Reg::Ecx, 0, Feature::Sse3),
    (Reg::Ecx, 1, Feature::Pclmulqdq),
    (Reg::Ecx, 2, Feature::Dtes64),
    (Reg::Ecx, 3, Feature::Monitor),
    (Reg::Ecx, 4, Feature::DsCpl),
    (Reg::Ecx, 5, Feature::Vmx),
    (Reg::Ecx, 6, Feature::Smx),
    (Reg::Ecx, 7, Feature::Est),
    (Reg::Ecx, 8, Feature::Tm2),
    (Reg::Ecx, 9, Feature::Ssse3),
    (Reg::Ecx, 10, Feature::CnxtId),
    (Reg::Ecx, 11, Feature::Sdbg),
    (Reg::Ecx, 12, Feature::Fma),
    (Reg::Ecx, 13, Feature::Cx16),
    (Reg::Ecx, 14, Feature::Xtpr),
    (Reg::Ecx, 15, Feature::Pdcm),
    (Reg::Ecx, 17, Feature::Pcid),
    (Reg::Ecx, 18, Feature::Dca),
    (Reg::Ecx, 19, Feature::Sse41),
    (Reg::Ecx, 20, Feature::Sse42),
    (Reg::Ecx, 21, Feature::X2apic),
    (Reg::Ecx, 22, Feature::Movbe),
    (Reg::Ecx, 23, Feature::Popcnt),
    (Reg::Ecx, 24, Feature::TscDeadline),
    (Reg::Ecx, 25, Feature::Aes),
    (Reg::Ecx, 26, Feature::Xsave),
    (Reg::Ecx, 27, Feature::Osxsave),
    (Reg::Ecx, 28, Feature::Avx),
    (Reg::Ecx, 29, Feature::F16c),
    (Reg::Ecx, 30, Feature::Rdrand),
    (Reg::Ecx, 31, Feature::Hypervisor),
];

const LEAF7: &[BitRow] = &[
    (Reg::Ebx, 0, Feature::Fsgsbase),
    (Reg::Ebx, 1, Feature::TscAdjust),
    (Reg::Ebx, 2, Feature::Sgx),
    (Reg::Ebx, 3, Feature::Bmi1),
    (Reg::Ebx, 4, Feature::Hle),
    (Reg::Ebx, 5, Feature::Avx2),
    (Reg::Ebx, 7, Feature::Smep),
    (Reg::Ebx, 8, Feature::Bmi2),
    (Reg::Ebx, 9, Feature::Erms),
    (Reg::Ebx, 10, Feature::Invpcid),
    (Reg::Ebx, 11, Feature::Rtm),
    (Reg::Ebx, 14, Feature::Mpx),
    (Reg::Ebx, 16, Feature::Avx512F),
    (Reg::Ebx, 17, Feature::Avx512Dq),
    (Reg::Ebx, 18, Feature::Rdseed),
    (Reg::Ebx, 19, Feature::Adx),
    (Reg::Ebx, 20, Feature::Smap),
    (Reg::Ebx, 21, Feature::Avx512Ifma),
    (Reg::Ebx, 23, Feature::Clflushopt),
    (Reg::Ebx, 24, Feature::Clwb),
    (Reg::Ebx, 25, Feature::ProcessorTrace),
    (Reg::Ebx, 26, Feature::Avx512Pf),
    (Reg::Ebx, 27, Feature::Avx512Er),
    (Reg::Ebx, 28, Feature::Avx512Cd),
    (Reg::Ebx, 29, Feature::Sha),
    (Reg::Ebx, 30, Feature::Avx512Bw),
    (Reg::Ebx, 31, Feature::Avx512Vl),
    (Reg::Ecx, 1, Feature::Avx512Vbmi),
    (Reg::Ecx, 2, Feature::Umip),
    (Reg::Ecx, 3, Feature::Pku),
    (Reg::Ecx, 6, Feature::Avx512Vbmi2),
    (Reg::Ecx, 8, Feature::Gfni),
    (Reg::Ecx, 9, Feature::Vaes),
    (Reg::Ecx, 10, Feature::Vpclmulqdq),
    (Reg::Ecx, 11, Feature::Avx512Vnni),
    (Reg::Ecx, 12, Feature::Avx512Bitalg),
    (Reg::Ecx, 14, Feature::Avx512Vpopcntdq),
    (Reg::Ecx, 22, Feature::Rdpid),
    (Reg::Ecx, 25, Feature::Cldemote),
    (Reg::Ecx, 27, Feature::Movdiri),
    (Reg::Ecx, 28, Feature::Movdir64b),
    (Reg::Edx, 4, Feature::Fsrm),
    (Reg::Edx, 8, Feature::Avx512Vp2intersect),
    (Reg::Edx, 22, Feature::AmxBf16),
    (Reg::Edx, 23, Feature::Avx512Fp16),
    (Reg::Edx, 24, Feature::AmxTile),
    (Reg::Edx, 25, Feature::AmxInt8),
];

const LEAF_XSAVE_SUB1: &[BitRow] = &[
    (Reg::Eax, 0, Feature::Xsaveopt),
    (Reg::Eax, 1, Feature::Xsavec),
    (Reg::Eax, 2, Feature::Xgetbv1),
    (Reg::Eax, 3, Feature::Xsaves),
];

const EXT_APM: &[BitRow] = &[
    (Reg::Edx, 0, Feature::Ts),
    (Reg::Edx, 7, Feature::HwPstate),
    (Reg::Edx, 8, Feature::InvariantTsc),
    (Reg::Edx, 9, Feature::Cpb),
];

const EXT_CAPS: &[BitRow] = &[
    (Reg::Ebx, 0, Feature::Clzero),
    (Reg::Ebx, 9, Feature::Wbnoinvd),
];

const EXT_IBS: &[BitRow] = &[
    (Reg::Eax, 0, Feature::IbsFfv),
    (Reg::Eax, 1, Feature::IbsFetchSam),
    (Reg::Eax, 2, Feature::IbsOpSam),
    (Reg::Eax, 3, Feature::IbsRdWrOpCnt),
    (Reg::Eax, 4, Feature::IbsOpCnt),
    (Reg::Eax, 5, Feature::IbsBrnTrgt),
];

const EXT_LWP: &[BitRow] = &[
    (Reg::Eax, 0, Feature::LwpAvail),
    (Reg::Eax, 1, Feature::LwpVal),
    (Reg::Eax, 2, Feature::LwpIre),
    (Reg::Eax, 3, Feature::LwpBre),
];

// ---------------------------------------------------------------------------
// Per-vendor tables for leaf 0x8000_0001.
//
// These must stay separate: Intel reuses bit 20 of edx for debug-store
// reporting where AMD defines no-execute, and AMD populates a long tail of
// ecx bits Intel reserves. Do not merge them into one "generic" table.
// ---------------------------------------------------------------------------

const EXT1_INTEL: &[BitRow] = &[
    (Reg::Edx, 11, Feature::Syscall),
    (Reg::Edx, 20, Feature::Ds),
    (Reg::Edx, 26, Feature::Page1Gb),
    (Reg::Edx, 27, Feature::Rdtscp),
    (Reg::Edx, 29, Feature::Lm),
    (Reg::Ecx, 0, Feature::LahfLm),
    (Reg::Ecx, 5, Feature::Abm),
    (Reg::Ecx, 8, Feature::ThreeDNowPrefetch),
];

const EXT1_AMD: &[BitRow] = &[
    (Reg::Edx, 11, Feature::Syscall),
    (Reg::Edx, 20, Feature::Nx),
    (Reg::Edx, 22, Feature::MmxExt),
    (Reg::Edx, 25, Feature::FxsrOpt),
    (Reg::Edx, 26, Feature::Page1Gb),
    (Reg::Edx, 27, Feature::Rdtscp),
    (Reg::Edx, 29, Feature::Lm),
    (Reg::Edx, 30, Feature::ThreeDNowExt),
    (Reg::Edx, 31, Feature::ThreeDNow),
    (Reg::Ecx, 0, Feature::LahfLm),
    (Reg::Ecx, 1, Feature::CmpLegacy),
    (Reg::Ecx, 2, Feature::Svm),
    (Reg::Ecx, 3, Feature::ExtApic),
    (Reg::Ecx, 4, Feature::Cr8Legacy),
    (Reg::Ecx, 5, Feature::Abm),
    (Reg::Ecx, 6, Feature::Sse4a),
    (Reg::Ecx, 7, Feature::MisalignSse),
    (Reg::Ecx, 8, Feature::ThreeDNowPrefetch),
    (Reg::Ecx, 9, Feature::Osvw),
    (Reg::Ecx, 10, Feature::Ibs),
    (Reg::Ecx, 11, Feature::Xop),
    (Reg::Ecx, 12, Feature::Skinit),
    (Reg::Ecx, 13, Feature::Wdt),
    (Reg::Ecx, 15, Feature::Lwp),
    (Reg::Ecx, 16, Feature::Fma4),
    (Reg::Ecx, 21, Feature::Tbm),
    (Reg::Ecx, 22, Feature::TopoExt),
];

// ---------------------------------------------------------------------------
// ARM capability-word tables, same row shape as the x86 tables. hwcap bits
// map onto the Reg::Eax slot for uniformity; only the bit index matters.
// ---------------------------------------------------------------------------

pub(crate) const ARM_HWCAP: &[(u8, Feature)] = &[
    (0, Feature::Fp),
    (1, Feature::Asimd),
    (2, Feature::Evtstrm),
    (3, Feature::Aes),
    (4, Feature::Pmull),
    (5, Feature::Sha1),
    (6, Feature::Sha2),
    (7, Feature::Crc32),
    (8, Feature::Atomics),
    (9, Feature::Fphp),
    (10, Feature::AsimdHp),
    (11, Feature::CpuidReg),
    (12, Feature::AsimdRdm),
    (13, Feature::Jscvt),
    (14, Feature::Fcma),
    (15, Feature::Lrcpc),
    (16, Feature::Dcpop),
    (17, Feature::Sha3),
    (18, Feature::Sm3),
    (19, Feature::Sm4),
    (20, Feature::AsimdDp),
    (21, Feature::Sha512),
    (22, Feature::Sve),
    (23, Feature::AsimdFhm),
    (24, Feature::Dit),
    (25, Feature::Uscat),
    (26, Feature::Ilrcpc),
    (27, Feature::Flagm),
    (28, Feature::Ssbs),
    (29, Feature::Sb),
    (30, Feature::Paca),
    (31, Feature::Pacg),
];

pub(crate) const ARM_HWCAP2: &[(u8, Feature)] = &[
    (0, Feature::Dcpodp),
    (1, Feature::Sve2),
    (2, Feature::SveAes),
    (3, Feature::SvePmull),
    (4, Feature::SveBitperm),
    (5, Feature::SveSha3),
    (6, Feature::SveSm4),
    (7, Feature::Flagm2),
    (8, Feature::Frint),
    (9, Feature::SveI8mm),
    (10, Feature::SveF32mm),
    (11, Feature::SveF64mm),
    (12, Feature::SveBf16),
    (13, Feature::I8mm),
    (14, Feature::Bf16),
    (15, Feature::Dgh),
    (16, Feature::Rng),
    (17, Feature::Bti),
    (18, Feature::Mte),
];

/// Map one token of an ARM `Features` line to a flag. The token spelling is
/// the kernel's, which matches [`Feature::name`] for every ARM flag.
pub fn arm_feature_from_token(token: &str) -> Option<Feature> {
    ARM_HWCAP
        .iter()
        .chain(ARM_HWCAP2.iter())
        .find(|(_, f)| f.name() == token)
        .map(|&(_, f)| f)
}

/// Decode a capability bit-vector against one of the ARM tables.
pub(crate) fn apply_capability_word(set: &mut FeatureSet, word: u32, table: &[(u8, Feature)]) {
    for &(bit, feature) in table {
        if bit32(word, bit) {
            set.insert(feature);
        }
    }
}

fn apply_bit_table(set: &mut FeatureSet, words: &crate::probe::RawWords, table: &[BitRow]) {
    for &(reg, bit, feature) in table {
        if bit32(words.reg(reg), bit) {
            set.insert(feature);
        }
    }
}

/// Aggregate every feature flag the gathered leaves report.
///
/// Monotonic union: each present leaf adds its flags; an absent leaf (one
/// that fails the snapshot's max-leaf range check) is skipped silently.
pub fn aggregate(vendor: Vendor, snapshot: &ProbeSnapshot) -> FeatureSet {
    let mut set = FeatureSet::new();

    if snapshot.supports(1) {
        if let Some(words) = snapshot.leaf(1) {
            apply_bit_table(&mut set, words, LEAF1);
        }
    }

    if snapshot.supports(7) {
        if let Some(words) = snapshot.leaf(7) {
            apply_bit_table(&mut set, words, LEAF7);
        }
    }

    if snapshot.supports(0xd) {
        if let Some(words) = snapshot.subleaves(0xd).get(1) {
            apply_bit_table(&mut set, words, LEAF_XSAVE_SUB1);
        }
    }

    if snapshot.supports(0x8000_0001) {
        if let Some(words) = snapshot.leaf(0x8000_0001) {
            // Vendor-specific register semantics: select the table by
            // vendor, never a shared one. Hygon parts follow AMD's layout.
            let table = match vendor {
                Vendor::Amd | Vendor::Hygon => EXT1_AMD,
                _ => EXT1_INTEL,
            };
            apply_bit_table(&mut set, words, table);
        }
    }

    if snapshot.supports(0x8000_0007) {
        if let Some(words) = snapshot.leaf(0x8000_0007) {
            apply_bit_table(&mut set, words, EXT_APM);
        }
    }

    if snapshot.supports(0x8000_0008) {
        if let Some(words) = snapshot.leaf(0x8000_0008) {
            apply_bit_table(&mut set, words, EXT_CAPS);
        }
    }

    if snapshot.supports(0x8000_001b) {
        if let Some(words) = snapshot.leaf(0x8000_001b) {
            apply_bit_table(&mut set, words, EXT_IBS);
        }
    }

    if snapshot.supports(0x8000_001c) {
        if let Some(words) = snapshot.leaf(0x8000_001c) {
            apply_bit_table(&mut set, words, EXT_LWP);
        }
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::RawWords;

    fn snapshot_with(leaves: &[(u32, RawWords)]) -> ProbeSnapshot {
        let mut snap = ProbeSnapshot::new();
        for &(leaf, words) in leaves {
            snap.push(leaf, words);
        }
        snap
    }

    #[test]
    fn test_leaf1_basic_flags() {
        let snap = snapshot_with(&[
            (0, RawWords::new(1, 0, 0, 0)),
            // edx: fpu + sse + sse2, ecx: sse3
            (1, RawWords::new(0, 0, 1, (1 << 0) | (1 << 25) | (1 << 26))),
        ]);
        let set = aggregate(Vendor::Intel, &snap);
        assert!(set.contains(Feature::Fpu));
        assert!(set.contains(Feature::Sse));
        assert!(set.contains(Feature::Sse2));
        assert!(set.contains(Feature::Sse3));
        assert!(!set.contains(Feature::Avx));
    }

    #[test]
    fn test_unsupported_leaf7_skipped() {
        // Max basic leaf 1: leaf 7 words present in the map must be ignored.
        let snap = snapshot_with(&[
            (0, RawWords::new(1, 0, 0, 0)),
            (7, RawWords::new(0, 1 << 5, 0, 0)),
        ]);
        let set = aggregate(Vendor::Intel, &snap);
        assert!(!set.contains(Feature::Avx2));
    }

    #[test]
    fn test_leaf7_avx2() {
        let snap = snapshot_with(&[
            (0, RawWords::new(7, 0, 0, 0)),
            (7, RawWords::new(0, (1 << 5) | (1 << 29), 0, 0)),
        ]);
        let set = aggregate(Vendor::Intel, &snap);
        assert!(set.contains(Feature::Avx2));
        assert!(set.contains(Feature::Sha));
    }

    #[test]
    fn test_ext1_bit20_vendor_specific() {
        // Same words, different vendors: bit 20 of extended edx is NX on
        // AMD and debug-store on Intel.
        let leaves = [
            (0x8000_0000, RawWords::new(0x8000_0001, 0, 0, 0)),
            (0x8000_0001, RawWords::new(0, 0, 0, 1 << 20)),
        ];
        let amd = aggregate(Vendor::Amd, &snapshot_with(&leaves));
        assert!(amd.contains(Feature::Nx));
        assert!(!amd.contains(Feature::Ds));

        let intel = aggregate(Vendor::Intel, &snapshot_with(&leaves));
        assert!(intel.contains(Feature::Ds));
        assert!(!intel.contains(Feature::Nx));
    }

    #[test]
    fn test_hygon_uses_amd_table() {
        let leaves = [
            (0x8000_0000, RawWords::new(0x8000_0001, 0, 0, 0)),
            (0x8000_0001, RawWords::new(0, 0, 1 << 2, 0)),
        ];
        let set = aggregate(Vendor::Hygon, &snapshot_with(&leaves));
        assert!(set.contains(Feature::Svm));
    }

    #[test]
    fn test_aggregate_is_monotonic() {
        let base = [
            (0, RawWords::new(1, 0, 0, 0)),
            (1, RawWords::new(0, 0, 0, 1 << 25)),
        ];
        let without = aggregate(Vendor::Intel, &snapshot_with(&base));

        let extended = [
            (0, RawWords::new(7, 0, 0, 0)),
            (1, RawWords::new(0, 0, 0, 1 << 25)),
            (7, RawWords::new(0, 1 << 5, 0, 0)),
        ];
        let with = aggregate(Vendor::Intel, &snapshot_with(&extended));

        // Adding a supported leaf never removes a previously-set flag.
        for flag in without.iter() {
            assert!(with.contains(flag), "{flag} lost after adding leaf 7");
        }
        assert!(with.len() > without.len());
    }

    #[test]
    fn test_xsave_subleaf1() {
        let mut snap = ProbeSnapshot::new();
        snap.push(0, RawWords::new(0xd, 0, 0, 0));
        snap.push(0xd, RawWords::zero());
        snap.push(0xd, RawWords::new(0b1011, 0, 0, 0));
        let set = aggregate(Vendor::Intel, &snap);
        assert!(set.contains(Feature::Xsaveopt));
        assert!(set.contains(Feature::Xsavec));
        assert!(!set.contains(Feature::Xgetbv1));
        assert!(set.contains(Feature::Xsaves));
    }

    #[test]
    fn test_arm_token_lookup() {
        assert_eq!(arm_feature_from_token("asimd"), Some(Feature::Asimd));
        assert_eq!(arm_feature_from_token("sve2"), Some(Feature::Sve2));
        assert_eq!(arm_feature_from_token("nonsense"), None);
    }

    #[test]
    fn test_capability_word_decode() {
        let mut set = FeatureSet::new();
        apply_capability_word(&mut set, 0b1111, ARM_HWCAP);
        assert_eq!(set.len(), 4);
        assert!(set.contains(Feature::Fp));
        assert!(set.contains(Feature::Aes));
    }

    #[test]
    fn test_feature_set_names_sorted() {
        let mut set = FeatureSet::new();
        set.insert(Feature::Sse2);
        set.insert(Feature::Avx);
        let names = set.names();
        assert_eq!(names.len(), 2);
        assert!(set.has_feature("avx"));
        assert!(set.has_feature("sse2"));
        assert!(!set.has_feature("avx2"));
    }

    #[test]
    fn test_feature_set_serialization() {
        let mut set = FeatureSet::new();
        set.insert(Feature::Avx2);
        let json = serde_json::to_string(&set).unwrap();
        let back: FeatureSet = serde_json::from_str(&json).unwrap();
        assert!(back.contains(Feature::Avx2));
    }
}
