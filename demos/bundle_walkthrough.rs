//! Walkthrough: tag settings, a descriptor catalog and a loader
//!
//! Loads a level that depends on a shared bundle, pulls one asset out of it,
//! then releases everything again.

use archetype_bundle::prelude::*;

const TAGS: &str = r#"{
    "groups": [
        { "name": "Platform", "tags": ["iOS", "Android", "Standalone"], "default": "Standalone" },
        { "name": "Quality", "tags": ["SD", "HD"], "default": "SD" }
    ]
}"#;

const CATALOG: &str = r#"[
    { "name": "Shared", "assets": { "iOS": ["atlas.png"] } },
    { "name": "Level", "tag_groups": ["Quality"], "dependencies": ["Shared"] }
]"#;

const LOADER: &str = r#"{
    "base_path": "Bundles",
    "active_tags": { "Platform": "iOS", "Quality": "HD" }
}"#;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let registry = TagRegistry::from_settings(&TagSettings::from_json_str(TAGS)?)?;
    let settings = LoaderSettings::from_json_str(LOADER)?;
    let catalog = DescriptorCatalog::from_json_str(CATALOG, &registry, settings.key_format())?;

    let transport = MemoryTransport::with_base_path(&settings.base_path);
    transport.insert("Shared_iOS", [("atlas.png", vec![0u8; 16])]);
    transport.insert("Level_iOS_HD", [("terrain.mesh", vec![1u8; 32])]);

    let loader = BundleLoader::from_settings(transport, &settings, &registry)?;
    let events = loader.subscribe();
    let level = catalog.get("Level")?;

    let loaded = loader.get_asset(&level, "terrain.mesh", None).await?;
    println!(
        "Loaded {} ({} bytes), resident: {:?}",
        loaded.asset.name,
        loaded.asset.bytes.len(),
        loader.loaded_keys()
    );

    match loader.get_asset(&level, "missing.mesh", None).await {
        Ok(_) => println!("Unexpected asset"),
        Err(err) => println!("Expected failure: {err}"),
    }

    // One release per successful or failed get_asset above.
    loader.release_asset(&level, "missing.mesh", None)?;
    loader.release_asset(&level, "terrain.mesh", None)?;
    println!("Resident after release: {:?}", loader.loaded_keys());

    for event in events.try_iter() {
        println!("{event:?}");
    }

    if let Some(platform) = registry.platform_group() {
        let android = platform.tag_by_name("Android")?;
        println!("Default Android build name: {}", level.default_bundle_name(android)?);
    }
    Ok(())
}
