// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! In-memory transport and bundles
//!
//! Stand-ins for a real transport in tests, benches and demos. The
//! transport counts fetches, can fail scripted fetches, and can hold
//! fetches open until the caller lets them through.

use crate::assets::{BundleHandle, BundleTransport, FetchError, LoadError, Unload};
use ahash::AHashMap;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::trace;

/// Asset extracted from a [`MemoryBundle`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryAsset {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

#[derive(Debug, Default)]
struct UnloadLog {
    unloads: Mutex<AHashMap<String, usize>>,
}

/// A bundle living entirely in memory
#[derive(Debug)]
pub struct MemoryBundle {
    key: String,
    assets: AHashMap<String, Arc<[u8]>>,
    log: Arc<UnloadLog>,
}

impl MemoryBundle {
    /// File key this bundle was fetched for
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn asset_names(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }
}

impl Unload for MemoryBundle {
    fn unload(&self, keep_loaded_objects: bool) {
        trace!(key = %self.key, keep_loaded_objects, "memory bundle unloaded");
        *self.log.unloads.lock().entry(self.key.clone()).or_insert(0) += 1;
    }
}

#[async_trait]
impl BundleHandle for MemoryBundle {
    type Asset = MemoryAsset;

    fn contains(&self, asset_name: &str) -> bool {
        self.assets.contains_key(asset_name)
    }

    async fn load_asset(&self, asset_name: &str) -> std::result::Result<MemoryAsset, LoadError> {
        tokio::task::yield_now().await;
        self.assets
            .get(asset_name)
            .map(|bytes| MemoryAsset {
                name: asset_name.to_string(),
                bytes: bytes.clone(),
            })
            .ok_or_else(|| LoadError(format!("{asset_name} vanished from {}", self.key)))
    }
}

/// Transport serving bundles registered by cache key.
///
/// Fetch paths are mapped back to keys by removing the base path the loader
/// joined onto them.
#[derive(Default)]
pub struct MemoryTransport {
    base_path: String,
    bundles: RwLock<AHashMap<String, AHashMap<String, Arc<[u8]>>>>,
    fetches: Mutex<Vec<String>>,
    failures: Mutex<AHashMap<String, usize>>,
    gate: RwLock<Option<Arc<Semaphore>>>,
    log: Arc<UnloadLog>,
}

impl MemoryTransport {
    /// Transport for a loader whose fetch paths are the bare keys
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport for a loader joining keys onto `base_path`
    pub fn with_base_path(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    /// Register a bundle under its cache key
    pub fn insert<I, N, B>(&self, key: impl Into<String>, assets: I)
    where
        I: IntoIterator<Item = (N, B)>,
        N: Into<String>,
        B: Into<Vec<u8>>,
    {
        let assets = assets
            .into_iter()
            .map(|(name, bytes)| {
                let bytes: Vec<u8> = bytes.into();
                (name.into(), Arc::from(bytes))
            })
            .collect();
        self.bundles.write().insert(key.into(), assets);
    }

    /// Make the next `times` fetches of `key` fail
    pub fn fail_next(&self, key: impl Into<String>, times: usize) {
        *self.failures.lock().entry(key.into()).or_insert(0) += times;
    }

    /// Hold every subsequent fetch until [`open`](Self::open) lets it pass
    pub fn hold(&self) {
        *self.gate.write() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `fetches` held fetches through
    pub fn open(&self, fetches: usize) {
        if let Some(gate) = self.gate.read().as_ref() {
            gate.add_permits(fetches);
        }
    }

    /// Stop holding fetches
    pub fn release_hold(&self) {
        if let Some(gate) = self.gate.write().take() {
            gate.close();
        }
    }

    /// Paths fetched so far, in order
    pub fn fetch_log(&self) -> Vec<String> {
        self.fetches.lock().clone()
    }

    /// Fetches made for `key`
    pub fn fetch_count(&self, key: &str) -> usize {
        self.fetches
            .lock()
            .iter()
            .filter(|path| self.cache_key(path) == key)
            .count()
    }

    /// Times the bundle for `key` was unloaded
    pub fn unload_count(&self, key: &str) -> usize {
        self.log.unloads.lock().get(key).copied().unwrap_or(0)
    }
}

impl MemoryTransport {
    fn cache_key<'a>(&self, path: &'a str) -> &'a str {
        const SEPARATORS: [char; 2] = ['/', '\\'];
        if self.base_path.is_empty() {
            return path;
        }
        path.strip_prefix(self.base_path.as_str())
            .filter(|rest| self.base_path.ends_with(SEPARATORS) || rest.starts_with(SEPARATORS))
            .map(|rest| rest.trim_start_matches(SEPARATORS))
            .unwrap_or(path)
    }
}

#[async_trait]
impl BundleTransport for MemoryTransport {
    type Bundle = MemoryBundle;

    async fn fetch(&self, path: &str) -> std::result::Result<MemoryBundle, FetchError> {
        self.fetches.lock().push(path.to_string());
        let key = self.cache_key(path).to_string();

        let gate = self.gate.read().clone();
        if let Some(gate) = gate {
            // A closed gate means holding was switched off.
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        tokio::task::yield_now().await;

        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(FetchError::new(format!("scripted failure for {key}")));
                }
            }
        }

        let assets = self
            .bundles
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| FetchError::new(format!("no bundle at {path}")))?;

        Ok(MemoryBundle {
            key,
            assets,
            log: self.log.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_registered_bundle() {
        let transport = MemoryTransport::with_base_path("Bundles");
        transport.insert("UI_iOS", [("button.png", vec![1u8, 2, 3])]);

        let bundle = transport.fetch("Bundles/UI_iOS").await.unwrap();
        assert!(bundle.contains("button.png"));
        assert!(!bundle.contains("slider.png"));
        let asset = bundle.load_asset("button.png").await.unwrap();
        assert_eq!(&*asset.bytes, &[1, 2, 3]);
        assert_eq!(transport.fetch_count("UI_iOS"), 1);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let transport = MemoryTransport::with_base_path("Bundles");
        transport.insert("UI_iOS", [("button.png", vec![0u8])]);
        transport.fail_next("UI_iOS", 1);

        assert!(transport.fetch("Bundles/UI_iOS").await.is_err());
        assert!(transport.fetch("Bundles/UI_iOS").await.is_ok());
        assert!(transport.fetch("Bundles/Missing_iOS").await.is_err());
    }

    #[tokio::test]
    async fn test_unload_is_recorded() {
        let transport = MemoryTransport::new();
        transport.insert("UI_iOS", Vec::<(String, Vec<u8>)>::new());
        let bundle = transport.fetch("UI_iOS").await.unwrap();
        bundle.unload(false);
        assert_eq!(transport.unload_count("UI_iOS"), 1);
    }

    #[tokio::test]
    async fn test_nested_keys_do_not_collide() {
        let transport = MemoryTransport::with_base_path("cdn/");
        transport.insert("levels/level_iOS", [("terrain", vec![1u8])]);
        transport.insert("props/level_iOS", [("crate", vec![2u8])]);

        let level = transport.fetch("cdn/levels/level_iOS").await.unwrap();
        assert_eq!(level.key(), "levels/level_iOS");
        assert!(level.contains("terrain"));
        let props = transport.fetch("cdn/props/level_iOS").await.unwrap();
        assert!(props.contains("crate"));

        assert_eq!(transport.fetch_count("levels/level_iOS"), 1);
        assert_eq!(transport.fetch_count("props/level_iOS"), 1);
        assert_eq!(transport.fetch_count("level_iOS"), 0);
    }

    #[tokio::test]
    async fn test_base_path_needs_separator() {
        let transport = MemoryTransport::with_base_path("Bundles");
        transport.insert("BundlesUI_iOS", [("button", vec![0u8])]);
        let bundle = transport.fetch("BundlesUI_iOS").await.unwrap();
        assert_eq!(bundle.key(), "BundlesUI_iOS");
    }
}
