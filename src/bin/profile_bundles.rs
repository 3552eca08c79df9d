#![allow(dead_code, unused_imports)]

use archetype_bundle::prelude::*;
use std::time::Instant;

const RELEASES: usize = 10_000;

#[cfg(feature = "profiling")]
fn setup() -> Result<(TagRegistry, std::sync::Arc<BundleDescriptor>, MemoryTransport)> {
    let mut registry = TagRegistry::new();
    registry.register("Platform", ["iOS", "Android", "Standalone"], Some(0))?;
    registry.register("Quality", ["SD", "HD"], Some(0))?;

    let shared = BundleDescriptor::builder("Shared").build(&registry)?;
    let level = BundleDescriptor::builder("Level")
        .tag_group("Quality")
        .dependency(shared)
        .build(&registry)?;

    let transport = MemoryTransport::with_base_path("Bundles");
    transport.insert("Shared_iOS", [("atlas", vec![0u8; 256])]);
    transport.insert("Level_iOS_HD", [("terrain", vec![0u8; 1024])]);
    Ok((registry, level, transport))
}

#[cfg(feature = "profiling")]
#[tracing::instrument(skip(loader, level))]
async fn profile_cycles(
    loader: &BundleLoader<MemoryTransport>,
    level: &BundleDescriptor,
    selection: TagSelection,
    count: usize,
) -> Result<()> {
    for i in 0..count {
        if i % 1_000 == 0 {
            tracing::info!("Acquire/release cycle {}/{}", i, count);
        }
        loader.get_bundle(level, Some(selection)).await?;
        loader.release_bundle(level, Some(selection))?;
    }
    Ok(())
}

#[cfg(feature = "profiling")]
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let _guard = archetype_bundle::profiling::init_file_subscriber("trace.log")?;

    let (registry, level, transport) = setup()?;
    let selection = registry.selection([("Platform", "iOS"), ("Quality", "HD")])?;
    let loader = BundleLoader::new(transport, UrlPathProvider::new("Bundles"));

    println!("Warming up...");
    loader.get_bundle(&level, Some(selection)).await?;

    println!("Profiling {RELEASES} cached acquire/release cycles...");
    let start = Instant::now();
    profile_cycles(&loader, &level, selection, RELEASES).await?;
    println!("Complete in: {:?}", start.elapsed());

    loader.release_bundle(&level, Some(selection))?;
    println!(
        "Fetches: {}, cache stats: {:?}",
        loader.transport().fetch_log().len(),
        loader.cache().stats()
    );
    Ok(())
}

#[cfg(not(feature = "profiling"))]
fn main() {
    println!("profile_bundles binary requires --features profiling");
}
