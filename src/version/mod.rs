//! Version-word decoding: vendor, family/model/stepping, processor kind.
//!
//! The primary identification leaf packs the whole version record into one
//! 32-bit word. Layout (inclusive-exclusive bit ranges):
//!
//! | field       | bits      |
//! |-------------|-----------|
//! | stepping    | [0, 4)    |
//! | model       | [4, 8)    |
//! | family      | [8, 12)   |
//! | kind        | [13, 15)  |
//! | model_ext   | [16, 20)  |
//! | family_ext  | [20, 28)  |
//!
//! Synthesized family/model fold the extended continuation bits back in,
//! because several vendors ran out of room in the original 4-bit fields.

use serde::{Deserialize, Serialize};

use crate::bitfield::extract32;

/// CPU vendor, identified by the 12-byte vendor string of leaf 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vendor {
    Intel,
    Amd,
    Hygon,
    Centaur,
    Zhaoxin,
    Transmeta,
    Cyrix,
    NexGen,
    Rise,
    Sis,
    Umc,
    NationalSemi,
    Vortex,
    Unknown,
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Intel => write!(f, "Intel"),
            Self::Amd => write!(f, "AMD"),
            Self::Hygon => write!(f, "Hygon"),
            Self::Centaur => write!(f, "Centaur"),
            Self::Zhaoxin => write!(f, "Zhaoxin"),
            Self::Transmeta => write!(f, "Transmeta"),
            Self::Cyrix => write!(f, "Cyrix"),
            Self::NexGen => write!(f, "NexGen"),
            Self::Rise => write!(f, "Rise"),
            Self::Sis => write!(f, "SiS"),
            Self::Umc => write!(f, "UMC"),
            Self::NationalSemi => write!(f, "National Semiconductor"),
            Self::Vortex => write!(f, "Vortex"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

impl Vendor {
    /// Identify the vendor from the leaf-0 register words.
    ///
    /// The vendor string is the 12 bytes of ebx, edx, ecx in that order
    /// (little-endian within each word).
    pub fn from_leaf0(ebx: u32, ecx: u32, edx: u32) -> Self {
        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&ebx.to_le_bytes());
        bytes[4..8].copy_from_slice(&edx.to_le_bytes());
        bytes[8..12].copy_from_slice(&ecx.to_le_bytes());
        match &bytes {
            b"GenuineIntel" => Self::Intel,
            b"AuthenticAMD" | b"AMDisbetter!" => Self::Amd,
            b"HygonGenuine" => Self::Hygon,
            b"CentaurHauls" | b"VIA VIA VIA " => Self::Centaur,
            b"  Shanghai  " => Self::Zhaoxin,
            b"GenuineTMx86" | b"TransmetaCPU" => Self::Transmeta,
            b"CyrixInstead" => Self::Cyrix,
            b"NexGenDriven" => Self::NexGen,
            b"RiseRiseRise" => Self::Rise,
            b"SiS SiS SiS " => Self::Sis,
            b"UMC UMC UMC " => Self::Umc,
            b"Geode by NSC" => Self::NationalSemi,
            b"Vortex86 SoC" => Self::Vortex,
            _ => Self::Unknown,
        }
    }

    /// The raw 12-byte vendor string, lossily decoded.
    pub fn raw_string(ebx: u32, ecx: u32, edx: u32) -> String {
        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&ebx.to_le_bytes());
        bytes[4..8].copy_from_slice(&edx.to_le_bytes());
        bytes[8..12].copy_from_slice(&ecx.to_le_bytes());
        String::from_utf8_lossy(&bytes).trim_end_matches('\0').to_string()
    }
}

/// Processor kind field of the version word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionKind {
    /// Original OEM processor (kind bits 0b00).
    #[default]
    Primary,
    /// OverDrive upgrade processor (0b01).
    OverDrive,
    /// Secondary processor of a dual configuration (0b10).
    Secondary,
}

impl std::fmt::Display for VersionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "Primary"),
            Self::OverDrive => write!(f, "OverDrive"),
            Self::Secondary => write!(f, "Secondary"),
        }
    }
}

/// Normalized version record decoded from the primary identification word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub vendor: Vendor,
    pub family: u8,
    pub model: u8,
    pub stepping: u8,
    pub family_ext: u8,
    pub model_ext: u8,
    /// `family + family_ext`.
    pub family_synth: u16,
    /// `model + (model_ext << 4)`.
    pub model_synth: u16,
    pub kind: VersionKind,
    /// The raw version word, kept for mask/pattern identity matching.
    pub raw: u32,
}

impl VersionRecord {
    /// Decode the primary identification word. Pure; the only non-fatal
    /// fallback is an out-of-range kind field, which becomes `Primary`.
    pub fn decode(vendor: Vendor, word: u32) -> Self {
        let stepping = extract32(word, 0, 4) as u8;
        let model = extract32(word, 4, 8) as u8;
        let family = extract32(word, 8, 12) as u8;
        let kind = match extract32(word, 13, 15) {
            0 => VersionKind::Primary,
            1 => VersionKind::OverDrive,
            2 => VersionKind::Secondary,
            other => {
                log::warn!("unknown processor kind {other} in version word {word:#010x}");
                VersionKind::Primary
            }
        };
        let model_ext = extract32(word, 16, 20) as u8;
        let family_ext = extract32(word, 20, 28) as u8;

        Self {
            vendor,
            family,
            model,
            stepping,
            family_ext,
            model_ext,
            family_synth: family as u16 + family_ext as u16,
            model_synth: model as u16 + ((model_ext as u16) << 4),
            kind,
            raw: word,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_coffee_lake_word() {
        // 0x000906EA: stepping 10, model 14, family 6, model_ext 9
        let v = VersionRecord::decode(Vendor::Intel, 0x000906EA);
        assert_eq!(v.family, 6);
        assert_eq!(v.model, 14);
        assert_eq!(v.stepping, 10);
        assert_eq!(v.model_ext, 9);
        assert_eq!(v.family_synth, 6);
        assert_eq!(v.model_synth, 14 + (9 << 4));
        assert_eq!(v.kind, VersionKind::Primary);
    }

    #[test]
    fn test_decode_plain_family6_word() {
        // No extension bits set: synthesized fields collapse to the base ones.
        let v = VersionRecord::decode(Vendor::Intel, 0x000006EA);
        assert_eq!(v.family, 6);
        assert_eq!(v.model, 14);
        assert_eq!(v.stepping, 10);
        assert_eq!(v.family_synth, 6);
        assert_eq!(v.model_synth, 14);
    }

    #[test]
    fn test_decode_extended_family() {
        // Zen 2: family 0xF + ext 0x8 = 23, model 0x1 + (0x7 << 4) = 0x71
        let v = VersionRecord::decode(Vendor::Amd, 0x0087_0F10);
        assert_eq!(v.family, 0xF);
        assert_eq!(v.family_ext, 0x8);
        assert_eq!(v.family_synth, 23);
        assert_eq!(v.model_synth, 0x71);
    }

    #[test]
    fn test_synth_never_below_base() {
        for word in [0u32, 0x000906EA, 0x00870F10, 0xFFFF_FFFF, 0x0F0F_0F0F] {
            let v = VersionRecord::decode(Vendor::Unknown, word);
            assert!(v.family_synth >= v.family as u16);
            assert!(v.model_synth >= v.model as u16);
        }
    }

    #[test]
    fn test_kind_overdrive() {
        let v = VersionRecord::decode(Vendor::Intel, 1 << 13);
        assert_eq!(v.kind, VersionKind::OverDrive);
    }

    #[test]
    fn test_kind_out_of_range_falls_back() {
        // Kind bits 0b11 are undefined; decode must not fail.
        let v = VersionRecord::decode(Vendor::Intel, 0b11 << 13);
        assert_eq!(v.kind, VersionKind::Primary);
    }

    #[test]
    fn test_vendor_from_leaf0() {
        // "GenuineIntel" packed as ebx/edx/ecx
        let v = Vendor::from_leaf0(0x756e6547, 0x6c65746e, 0x49656e69);
        assert_eq!(v, Vendor::Intel);
        // "AuthenticAMD"
        let v = Vendor::from_leaf0(0x68747541, 0x444d4163, 0x69746e65);
        assert_eq!(v, Vendor::Amd);
    }

    #[test]
    fn test_vendor_unknown() {
        assert_eq!(Vendor::from_leaf0(0, 0, 0), Vendor::Unknown);
    }

    #[test]
    fn test_vendor_display() {
        assert_eq!(Vendor::Amd.to_string(), "AMD");
        assert_eq!(Vendor::Sis.to_string(), "SiS");
    }

    #[test]
    fn test_raw_string_round_trip() {
        let s = Vendor::raw_string(0x756e6547, 0x6c65746e, 0x49656e69);
        assert_eq!(s, "GenuineIntel");
    }
}
