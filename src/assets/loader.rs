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

//! Loads and releases tagged bundles and their dependencies.
//!
//! Every `get_*` call must be matched by a `release_*` call with the same
//! descriptor and selection. Dependencies are acquired before the bundle
//! itself and released after it, so one release undoes exactly one get.
//!
//! When a dependency chain fails part way, the links that already succeeded
//! stay cached with their counts raised. The caller decides how far to
//! unwind.

use crate::assets::{
    BundleEvent, BundleHandle, BundleTransport, LocalPathProvider, Origin, PathProvider,
    RefCountCache,
};
use crate::bundle::BundleDescriptor;
use crate::config::LoaderSettings;
use crate::error::{BundleError, Result};
use crate::tags::{TagRegistry, TagSelection};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

#[cfg(feature = "profiling")]
use tracing::{info_span, Instrument};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Descriptor names from the requested bundle down to the current one
type Chain = SmallVec<[String; 8]>;

type Bundle<T> = <T as BundleTransport>::Bundle;
type Asset<T> = <Bundle<T> as BundleHandle>::Asset;

/// Progress of a single `get_bundle` request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    ResolvingDependencies,
    AwaitingFetch,
    Cached,
    Delivered,
    Failed,
}

/// An extracted asset together with the bundle reference that keeps it valid
pub struct LoadedAsset<B: BundleHandle> {
    pub asset: B::Asset,
    pub bundle: Arc<B>,
}

/// Bundle loader service.
///
/// Owns its cache, so independent loaders never share state.
pub struct BundleLoader<T: BundleTransport> {
    transport: T,
    paths: Box<dyn PathProvider>,
    cache: RefCountCache<Bundle<T>>,
    active_tags: RwLock<TagSelection>,
    listeners: Mutex<Vec<Sender<BundleEvent>>>,
}

impl<T: BundleTransport> BundleLoader<T> {
    /// Create a loader with an empty cache
    pub fn new(transport: T, paths: impl PathProvider + 'static) -> Self {
        Self::with_cache(transport, paths, RefCountCache::new())
    }

    /// Create a loader around an existing cache
    pub fn with_cache(
        transport: T,
        paths: impl PathProvider + 'static,
        cache: RefCountCache<Bundle<T>>,
    ) -> Self {
        Self {
            transport,
            paths: Box::new(paths),
            cache,
            active_tags: RwLock::new(TagSelection::empty()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Create a loader from settings, fetching from a local directory
    pub fn from_settings(
        transport: T,
        settings: &LoaderSettings,
        registry: &TagRegistry,
    ) -> Result<Self> {
        let loader = Self::with_cache(
            transport,
            LocalPathProvider::new(&settings.base_path),
            RefCountCache::with_unload_policy(settings.keep_loaded_objects),
        );
        loader.set_active_tags(settings.active_selection(registry)?);
        Ok(loader)
    }

    /// Selection used when a caller passes `None`
    pub fn active_tags(&self) -> TagSelection {
        *self.active_tags.read()
    }

    pub fn set_active_tags(&self, selection: TagSelection) {
        *self.active_tags.write() = selection;
    }

    pub fn cache(&self) -> &RefCountCache<Bundle<T>> {
        &self.cache
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Base path bundles are fetched from
    pub fn base_path(&self) -> String {
        self.paths.base_path()
    }

    /// Fetch path for a cache key
    pub fn bundle_path(&self, key: &str) -> String {
        self.paths.bundle_path(key)
    }

    /// Keys of every resident bundle
    pub fn loaded_keys(&self) -> Vec<String> {
        self.cache.keys()
    }

    /// Receive [`BundleEvent`]s from now on
    pub fn subscribe(&self) -> Receiver<BundleEvent> {
        let (tx, rx) = channel::unbounded();
        self.listeners.lock().push(tx);
        rx
    }

    fn emit(&self, event: BundleEvent) {
        // Listeners whose receiver was dropped are forgotten.
        self.listeners
            .lock()
            .retain(|listener| listener.send(event.clone()).is_ok());
    }

    fn resolve(&self, tags: Option<TagSelection>) -> TagSelection {
        tags.unwrap_or_else(|| self.active_tags())
    }

    /// Load a bundle's dependencies, then the bundle itself.
    ///
    /// `tags` defaults to the active selection.
    pub async fn get_bundle(
        &self,
        descriptor: &BundleDescriptor,
        tags: Option<TagSelection>,
    ) -> Result<Arc<Bundle<T>>> {
        let selection = self.resolve(tags);
        let mut chain = Chain::new();
        let load = self.get_bundle_inner(descriptor, selection, &mut chain);
        #[cfg(feature = "profiling")]
        let load = load.instrument(info_span!("bundle.get", bundle = descriptor.name()));
        load.await
    }

    fn get_bundle_inner<'a>(
        &'a self,
        descriptor: &'a BundleDescriptor,
        selection: TagSelection,
        chain: &'a mut Chain,
    ) -> BoxFuture<'a, Result<Arc<Bundle<T>>>> {
        Box::pin(async move {
            if chain.iter().any(|name| name == descriptor.name()) {
                let mut cycle = chain.to_vec();
                cycle.push(descriptor.name().to_string());
                return Err(BundleError::DependencyCycle(cycle));
            }

            // Validate before touching any dependency.
            let key = descriptor.file_key(&selection)?;

            trace!(key = %key, state = ?LoadState::ResolvingDependencies);
            chain.push(descriptor.name().to_string());
            for dependency in descriptor.dependencies() {
                if let Err(err) = self.get_bundle_inner(dependency, selection, chain).await {
                    trace!(key = %key, state = ?LoadState::Failed);
                    return Err(err);
                }
            }
            chain.pop();

            trace!(key = %key, state = ?LoadState::AwaitingFetch);
            let path = self.bundle_path(&key);
            let acquired = self
                .cache
                .acquire_tracked(&key, || self.fetch(&key, &path))
                .await;

            match acquired {
                Ok(acquired) => {
                    trace!(key = %key, state = ?LoadState::Cached, origin = ?acquired.origin);
                    if acquired.origin == Origin::Loaded {
                        self.emit(BundleEvent::Loaded { key: key.clone() });
                    }
                    trace!(key = %key, state = ?LoadState::Delivered);
                    Ok(acquired.handle)
                }
                Err(err) => {
                    trace!(key = %key, state = ?LoadState::Failed);
                    Err(err)
                }
            }
        })
    }

    async fn fetch(&self, key: &str, path: &str) -> Result<Bundle<T>> {
        info!(key, path, "Load bundle");
        match self.transport.fetch(path).await {
            Ok(bundle) => {
                info!(key, "bundle loaded");
                Ok(bundle)
            }
            Err(err) => {
                warn!(key, path, reason = %err, "bundle fetch failed");
                Err(BundleError::BundleFetchFailed {
                    key: key.to_string(),
                    path: path.to_string(),
                    reason: err.reason,
                })
            }
        }
    }

    /// Load the bundle, then extract one asset from it.
    ///
    /// The bundle reference is held even when this fails with
    /// [`BundleError::AssetNotFound`]; release it as usual.
    pub async fn get_asset(
        &self,
        descriptor: &BundleDescriptor,
        asset_name: &str,
        tags: Option<TagSelection>,
    ) -> Result<LoadedAsset<Bundle<T>>> {
        let bundle = self.get_bundle(descriptor, tags).await?;
        if !bundle.contains(asset_name) {
            error!(bundle = descriptor.name(), asset = asset_name, "asset not in bundle");
            return Err(BundleError::AssetNotFound {
                bundle: descriptor.name().to_string(),
                asset: asset_name.to_string(),
            });
        }

        let asset: Asset<T> = bundle
            .load_asset(asset_name)
            .await
            .map_err(|err| BundleError::AssetLoadFailed {
                bundle: descriptor.name().to_string(),
                asset: asset_name.to_string(),
                reason: err.to_string(),
            })?;
        Ok(LoadedAsset { asset, bundle })
    }

    /// Release a bundle, then its dependencies.
    ///
    /// Returns `true` if the bundle itself was unloaded. Dependencies are
    /// released even if one of them fails; the first failure is returned.
    pub fn release_bundle(
        &self,
        descriptor: &BundleDescriptor,
        tags: Option<TagSelection>,
    ) -> Result<bool> {
        let selection = self.resolve(tags);
        let mut chain = Chain::new();
        self.release_inner(descriptor, selection, &mut chain)
    }

    fn release_inner(
        &self,
        descriptor: &BundleDescriptor,
        selection: TagSelection,
        chain: &mut Chain,
    ) -> Result<bool> {
        if chain.iter().any(|name| name == descriptor.name()) {
            let mut cycle = chain.to_vec();
            cycle.push(descriptor.name().to_string());
            return Err(BundleError::DependencyCycle(cycle));
        }

        let key = descriptor.file_key(&selection)?;
        let evicted = self.cache.release(&key)?;
        if evicted {
            self.emit(BundleEvent::Evicted { key: key.clone() });
        } else {
            debug!(key = %key, "bundle released");
        }

        chain.push(descriptor.name().to_string());
        let mut first_error = None;
        for dependency in descriptor.dependencies() {
            if let Err(err) = self.release_inner(dependency, selection, chain) {
                first_error.get_or_insert(err);
            }
        }
        chain.pop();

        match first_error {
            Some(err) => Err(err),
            None => Ok(evicted),
        }
    }

    /// Mirror of [`get_asset`](Self::get_asset). Assets are not counted on
    /// their own, so this releases the bundle.
    pub fn release_asset(
        &self,
        descriptor: &BundleDescriptor,
        asset_name: &str,
        tags: Option<TagSelection>,
    ) -> Result<bool> {
        debug!(bundle = descriptor.name(), asset = asset_name, "release asset");
        self.release_bundle(descriptor, tags)
    }
}
