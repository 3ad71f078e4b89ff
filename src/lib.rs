//! Processor identification and capability decoding.
//!
//! `siproflib` turns raw low-level probe data (CPUID register words on
//! x86_64, auxiliary-vector capability words and `/proc/cpuinfo` on
//! ARM/Linux) into structured facts: vendor, microarchitecture, brand
//! string, ISA feature set, cache/TLB hierarchy, and core topology.
//!
//! One call profiles the current processor:
//!
//! ```no_run
//! use siproflib::ProcessorProfiler;
//!
//! let profiler = ProcessorProfiler::new().unwrap();
//! let profile = profiler.profile();
//! println!("{}", profile.identity.vendor_display);
//! if profile.features.has_feature("avx2") {
//!     // pick the wide code path
//! }
//! ```
//!
//! The decode engine itself is pure: every decoder takes a
//! [`probe::ProbeSnapshot`] gathered by an architecture adapter and
//! degrades to an empty contribution for anything the hardware does not
//! report. Nothing in the decode path returns an error; [`error::ProfileError`]
//! covers probe I/O and auxiliary operations only.
//!
//! # Platform Support
//!
//! - **x86_64** (Linux, macOS, Windows): full CPUID decode
//! - **aarch64 Linux**: hwcap + cpuinfo + MIDR decode
//! - Other targets compile and return a default-valued profile

pub mod arm;
pub mod bitfield;
pub mod cache;
pub mod error;
pub mod features;
pub mod freq;
pub mod identity;
pub mod probe;
pub mod profile;
pub mod topology;
pub mod version;

pub use cache::{Associativity, CacheDescriptor, CacheKind};
pub use error::{ProfileError, Result};
pub use features::{Feature, FeatureSet};
pub use identity::IdentityResult;
pub use probe::{MockProbe, NativeProbe, ProbeSnapshot, RawProbe, RawWords};
pub use profile::{profile_arm, profile_native, profile_x86, ProcessorProfile, ProcessorProfiler};
pub use topology::{CoreTopology, LevelKind, TopologyLevel};
pub use version::{Vendor, VersionKind, VersionRecord};
