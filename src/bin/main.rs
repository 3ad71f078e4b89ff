//! CLI tool for silicon-profile (siprof)

#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::time::Duration;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "siprof")]
#[command(about = "Identify the processor: vendor, microarchitecture, ISA features, caches, topology", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json or text)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Also estimate the current core clock (samples for ~50 ms)
    #[arg(long)]
    frequency: bool,
}

#[cfg(feature = "cli")]
fn main() -> siproflib::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let profiler = siproflib::ProcessorProfiler::new()?;
    let profile = profiler.profile();

    let frequency_mhz = if cli.frequency {
        profiler.estimate_frequency_mhz(Duration::from_millis(50))
    } else {
        None
    };

    match cli.format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(profile)?);
            if let Some(mhz) = frequency_mhz {
                println!("{{\"frequency_mhz\": {mhz}}}");
            }
        }
        _ => {
            print_text(profile, frequency_mhz);
        }
    }

    Ok(())
}

#[cfg(feature = "cli")]
fn print_text(profile: &siproflib::ProcessorProfile, frequency_mhz: Option<u32>) {
    let id = &profile.identity;
    println!("Vendor:            {}", id.vendor_display);
    if let Some(brand) = &profile.brand_string {
        println!("Brand:             {brand}");
    }
    if let Some(family) = &id.family_display {
        println!("Model:             {family}");
    }
    if let Some(uarch) = &id.microarchitecture {
        println!("Microarchitecture: {uarch}");
    }
    if let Some(process) = &id.physical_process {
        println!("Process:           {process}");
    }
    println!(
        "Signature:         family {:#x} model {:#x} stepping {}",
        profile.version.family_synth, profile.version.model_synth, profile.version.stepping
    );
    println!(
        "Topology:          {} cores, {} logical, SMT {}",
        profile.core_count(),
        profile.logical_count(),
        if profile.smt_enabled() { "on" } else { "off" }
    );
    if let Some(mhz) = frequency_mhz {
        println!("Frequency:         ~{mhz} MHz");
    }

    if !profile.caches.is_empty() {
        println!("Caches:");
        for cache in &profile.caches {
            if cache.kind.is_tlb() {
                println!(
                    "  L{} {}: {} entries, {}",
                    cache.level, cache.kind, cache.entries, cache.associativity
                );
            } else if let Some(bytes) = cache.size_bytes {
                println!(
                    "  L{} {}: {} KiB, {}, {}B lines",
                    cache.level,
                    cache.kind,
                    bytes / 1024,
                    cache.associativity,
                    cache.line_size
                );
            }
        }
    }

    let names = profile.features.names();
    if !names.is_empty() {
        println!("Features:          {}", names.join(" "));
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("siprof was built without the `cli` feature");
}
