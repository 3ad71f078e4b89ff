// SPDX-License-Identifier: AGPL-3.0-or-later
//! Benchmark for the decode engine.
//!
//! Measures a full profiling pass over a canned probe snapshot, plus the
//! individual decoders, so table-growth regressions show up.

use criterion::{criterion_group, criterion_main, Criterion};

use siproflib::probe::RawWords;
use siproflib::{profile_x86, MockProbe, Vendor, VersionRecord};

/// Synthetic Coffee Lake probe: vendor, version, features, one cache
/// level, extended topology, brand string.
fn coffee_lake_probe() -> MockProbe {
    let mut p = MockProbe::new();
    p.set(0, 0, RawWords::new(0x16, 0x756e6547, 0x6c65746e, 0x49656e69));
    p.set(
        1,
        0,
        RawWords::new(
            0x000906EA,
            (2 << 24) | (12 << 16),
            0x7ffafbff,
            0xbfebfbff,
        ),
    );
    p.set(4, 0, RawWords::new(1 | (1 << 5) | (1 << 14), 63 | (7 << 22), 63, 0));
    p.set(4, 1, RawWords::zero());
    p.set(7, 0, RawWords::new(0, 0x029c6fbf, 0, 0));
    p.set(0xb, 0, RawWords::new(1, 2, 1 << 8, 2));
    p.set(0xb, 1, RawWords::new(4, 12, 2 << 8, 2));
    p.set(0xb, 2, RawWords::zero());
    p.set(0x8000_0000, 0, RawWords::new(0x8000_0008, 0, 0, 0));
    p.set(0x8000_0001, 0, RawWords::new(0, 0, 0x121, 0x2c100800));
    let brand = b"Intel(R) Core(TM) i7-8700K CPU @ 3.70GHz\0\0\0\0\0\0\0\0";
    for (i, leaf) in (0x8000_0002..=0x8000_0004u32).enumerate() {
        let chunk = &brand[i * 16..(i + 1) * 16];
        let word =
            |j: usize| u32::from_le_bytes([chunk[j], chunk[j + 1], chunk[j + 2], chunk[j + 3]]);
        p.set(leaf, 0, RawWords::new(word(0), word(4), word(8), word(12)));
    }
    p
}

fn bench_full_profile(c: &mut Criterion) {
    let probe = coffee_lake_probe();
    c.bench_function("profile_x86", |b| {
        b.iter(|| {
            let profile = profile_x86(&probe);
            std::hint::black_box(profile);
        });
    });
}

fn bench_version_decode(c: &mut Criterion) {
    c.bench_function("version_decode", |b| {
        b.iter(|| {
            let v = VersionRecord::decode(Vendor::Intel, std::hint::black_box(0x000906EA));
            std::hint::black_box(v);
        });
    });
}

fn bench_feature_aggregate(c: &mut Criterion) {
    let probe = coffee_lake_probe();
    let snap = siproflib::profile::gather_x86(&probe);
    c.bench_function("feature_aggregate", |b| {
        b.iter(|| {
            let set = siproflib::features::aggregate(Vendor::Intel, &snap);
            std::hint::black_box(set);
        });
    });
}

fn bench_cache_build(c: &mut Criterion) {
    let probe = coffee_lake_probe();
    let snap = siproflib::profile::gather_x86(&probe);
    let version = VersionRecord::decode(Vendor::Intel, 0x000906EA);
    c.bench_function("cache_build", |b| {
        b.iter(|| {
            let caches = siproflib::cache::build(&version, &snap);
            std::hint::black_box(caches);
        });
    });
}

criterion_group!(
    benches,
    bench_full_profile,
    bench_version_decode,
    bench_feature_aggregate,
    bench_cache_build
);
criterion_main!(benches);
