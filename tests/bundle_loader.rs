use archetype_bundle::assets::{BundleLoader, MemoryTransport, UrlPathProvider};
use archetype_bundle::prelude::*;
use std::sync::Arc;
use std::time::Duration;

struct Fixture {
    registry: TagRegistry,
    a: Arc<BundleDescriptor>,
    b: Arc<BundleDescriptor>,
    loader: Arc<BundleLoader<MemoryTransport>>,
}

/// A depends on B, both vary by platform only
fn fixture() -> Fixture {
    let mut registry = TagRegistry::new();
    registry
        .register("Platform", ["iOS", "Android"], Some(0))
        .unwrap();
    let b = BundleDescriptor::builder("B").build(&registry).unwrap();
    let a = BundleDescriptor::builder("A")
        .dependency(b.clone())
        .build(&registry)
        .unwrap();

    let transport = MemoryTransport::with_base_path("Bundles");
    transport.insert("A_iOS", [("hero.prefab", vec![1u8])]);
    transport.insert("B_iOS", [("shared.mat", vec![2u8])]);
    let loader = Arc::new(BundleLoader::new(transport, UrlPathProvider::new("Bundles")));
    Fixture {
        registry,
        a,
        b,
        loader,
    }
}

fn ios(registry: &TagRegistry) -> Option<TagSelection> {
    Some(registry.selection([("Platform", "iOS")]).unwrap())
}

async fn wait_for_joins(loader: &BundleLoader<MemoryTransport>, joins: u64) {
    for _ in 0..500 {
        if loader.cache().stats().joins >= joins {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("second caller never joined the in-flight load");
}

#[tokio::test]
async fn test_dependency_scenario() {
    let f = fixture();
    let tags = ios(&f.registry);

    f.loader.get_bundle(&f.a, tags).await.unwrap();
    assert_eq!(f.loader.loaded_keys(), ["A_iOS", "B_iOS"]);
    assert_eq!(f.loader.cache().ref_count("A_iOS"), Some(1));
    assert_eq!(f.loader.cache().ref_count("B_iOS"), Some(1));
    // Dependency is fetched first.
    assert_eq!(
        f.loader.transport().fetch_log(),
        ["Bundles/B_iOS", "Bundles/A_iOS"]
    );

    assert!(f.loader.release_bundle(&f.a, tags).unwrap());
    assert!(f.loader.cache().is_empty());
    assert_eq!(f.loader.transport().unload_count("A_iOS"), 1);
    assert_eq!(f.loader.transport().unload_count("B_iOS"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_gets_share_one_fetch() {
    let f = fixture();
    let tags = ios(&f.registry);
    f.loader.transport().hold();

    let spawn_get = || {
        let loader = f.loader.clone();
        let b = f.b.clone();
        tokio::spawn(async move { loader.get_bundle(&b, tags).await })
    };
    let first = spawn_get();
    let second = spawn_get();

    wait_for_joins(&f.loader, 1).await;
    f.loader.transport().open(1);

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(f.loader.transport().fetch_count("B_iOS"), 1);
    assert_eq!(f.loader.cache().ref_count("B_iOS"), Some(2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_gets_of_dependent_bundle() {
    let f = fixture();
    let tags = ios(&f.registry);
    f.loader.transport().hold();

    let spawn_get = || {
        let loader = f.loader.clone();
        let a = f.a.clone();
        tokio::spawn(async move { loader.get_bundle(&a, tags).await.map(|_| ()) })
    };
    let first = spawn_get();
    let second = spawn_get();

    wait_for_joins(&f.loader, 1).await;
    // One permit for B, one for A.
    f.loader.transport().open(2);

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
    assert_eq!(f.loader.transport().fetch_count("A_iOS"), 1);
    assert_eq!(f.loader.transport().fetch_count("B_iOS"), 1);
    assert_eq!(f.loader.cache().ref_count("A_iOS"), Some(2));
    assert_eq!(f.loader.cache().ref_count("B_iOS"), Some(2));

    f.loader.release_bundle(&f.a, tags).unwrap();
    f.loader.release_bundle(&f.a, tags).unwrap();
    assert!(f.loader.cache().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_joined_callers_share_failure() {
    let f = fixture();
    let tags = ios(&f.registry);
    f.loader.transport().fail_next("B_iOS", 1);
    f.loader.transport().hold();

    let spawn_get = || {
        let loader = f.loader.clone();
        let b = f.b.clone();
        tokio::spawn(async move { loader.get_bundle(&b, tags).await.map(|_| ()) })
    };
    let first = spawn_get();
    let second = spawn_get();

    wait_for_joins(&f.loader, 1).await;
    f.loader.transport().open(1);

    let first = first.await.unwrap().unwrap_err();
    let second = second.await.unwrap().unwrap_err();
    assert!(matches!(first, BundleError::BundleFetchFailed { .. }));
    assert_eq!(first, second);
    assert!(f.loader.cache().is_empty());
    assert_eq!(f.loader.transport().fetch_count("B_iOS"), 1);
}

#[tokio::test]
async fn test_failed_fetch_then_retry() {
    let f = fixture();
    let tags = ios(&f.registry);
    f.loader.transport().fail_next("B_iOS", 1);

    let err = f.loader.get_bundle(&f.a, tags).await.unwrap_err();
    match err {
        BundleError::BundleFetchFailed { key, path, .. } => {
            assert_eq!(key, "B_iOS");
            assert_eq!(path, "Bundles/B_iOS");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(f.loader.cache().is_empty());
    // A is never attempted once its dependency fails.
    assert_eq!(f.loader.transport().fetch_count("A_iOS"), 0);

    f.loader.get_bundle(&f.a, tags).await.unwrap();
    assert_eq!(f.loader.transport().fetch_count("B_iOS"), 2);
    assert_eq!(f.loader.loaded_keys(), ["A_iOS", "B_iOS"]);
}

#[tokio::test]
async fn test_partial_chain_stays_acquired() {
    let f = fixture();
    let tags = ios(&f.registry);
    f.loader.transport().fail_next("A_iOS", 1);

    assert!(f.loader.get_bundle(&f.a, tags).await.is_err());
    assert_eq!(f.loader.loaded_keys(), ["B_iOS"]);
    assert_eq!(f.loader.cache().ref_count("B_iOS"), Some(1));

    // The caller unwinds the dependency it was handed.
    assert!(f.loader.release_bundle(&f.b, tags).unwrap());
    assert!(f.loader.cache().is_empty());
}

#[tokio::test]
async fn test_repeated_gets_round_trip() {
    let f = fixture();
    let tags = ios(&f.registry);
    const N: usize = 5;

    for _ in 0..N {
        f.loader.get_bundle(&f.a, tags).await.unwrap();
    }
    assert_eq!(f.loader.cache().ref_count("A_iOS"), Some(N));
    assert_eq!(f.loader.cache().ref_count("B_iOS"), Some(N));
    assert_eq!(f.loader.transport().fetch_log().len(), 2);

    for i in 0..N {
        let evicted = f.loader.release_bundle(&f.a, tags).unwrap();
        assert_eq!(evicted, i == N - 1);
    }
    assert!(f.loader.cache().is_empty());
    assert_eq!(f.loader.transport().unload_count("A_iOS"), 1);
    assert_eq!(f.loader.transport().unload_count("B_iOS"), 1);
}

#[tokio::test]
async fn test_release_restores_dependency_count() {
    let f = fixture();
    let tags = ios(&f.registry);

    f.loader.get_bundle(&f.b, tags).await.unwrap();
    assert_eq!(f.loader.cache().ref_count("B_iOS"), Some(1));
    f.loader.get_bundle(&f.a, tags).await.unwrap();
    assert_eq!(f.loader.cache().ref_count("B_iOS"), Some(2));

    f.loader.release_bundle(&f.a, tags).unwrap();
    assert_eq!(f.loader.cache().ref_count("B_iOS"), Some(1));
    assert!(!f.loader.cache().contains_key("A_iOS"));
    assert_eq!(f.loader.transport().unload_count("B_iOS"), 0);
}

#[tokio::test]
async fn test_release_of_unloaded_bundle() {
    let f = fixture();
    let err = f
        .loader
        .release_bundle(&f.a, ios(&f.registry))
        .unwrap_err();
    assert_eq!(err, BundleError::UnknownKey("A_iOS".into()));
    assert!(f.loader.cache().is_empty());
}

#[tokio::test]
async fn test_missing_variant_fails_fetch() {
    let f = fixture();
    let android = Some(f.registry.selection([("Platform", "Android")]).unwrap());

    let err = f.loader.get_bundle(&f.b, android).await.unwrap_err();
    assert!(matches!(err, BundleError::BundleFetchFailed { ref key, .. } if key == "B_Android"));
    assert_eq!(f.loader.cache().stats().failed_loads, 1);
}

#[tokio::test]
async fn test_asset_not_found_keeps_bundle() {
    let f = fixture();
    let tags = ios(&f.registry);

    let asset = f
        .loader
        .get_asset(&f.a, "hero.prefab", tags)
        .await
        .unwrap();
    assert_eq!(&*asset.asset.bytes, &[1]);

    let err = f
        .loader
        .get_asset(&f.a, "villain.prefab", tags)
        .await
        .err()
        .unwrap();
    assert_eq!(
        err,
        BundleError::AssetNotFound {
            bundle: "A".into(),
            asset: "villain.prefab".into()
        }
    );
    assert_eq!(f.loader.cache().ref_count("A_iOS"), Some(2));

    f.loader.release_asset(&f.a, "villain.prefab", tags).unwrap();
    f.loader.release_asset(&f.a, "hero.prefab", tags).unwrap();
    assert!(f.loader.cache().is_empty());
}

#[tokio::test]
async fn test_separate_loaders_do_not_share_cache() {
    let f = fixture();
    let tags = ios(&f.registry);
    let other = BundleLoader::new(MemoryTransport::new(), UrlPathProvider::new(""));
    other.transport().insert("B_iOS", [("shared.mat", vec![3u8])]);

    f.loader.get_bundle(&f.b, tags).await.unwrap();
    other.get_bundle(&f.b, tags).await.unwrap();
    assert_eq!(f.loader.cache().ref_count("B_iOS"), Some(1));
    assert_eq!(other.cache().ref_count("B_iOS"), Some(1));
    assert_eq!(other.transport().fetch_log(), ["B_iOS"]);
}
