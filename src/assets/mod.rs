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

// Bundle Runtime
//
// Provides bundle loading and caching with:
// - Reference-counted, single-flight cache
// - Dependency-ordered async loading
// - Pluggable transport and path resolution
// - Load/evict notifications

pub mod cache;
pub mod loader;
pub mod memory;
pub mod transport;

pub use cache::{Acquired, CacheStats, Origin, RefCountCache};
pub use loader::{BundleLoader, LoadState, LoadedAsset};
pub use memory::{MemoryAsset, MemoryBundle, MemoryTransport};
pub use transport::{
    combine_path, BundleTransport, FetchError, LocalPathProvider, PathProvider, UrlPathProvider,
};

use async_trait::async_trait;
use std::fmt;

/// Anything the cache can release once its last reference goes away.
///
/// `unload` runs while the cache holds its internal lock, so it must not
/// call back into the cache.
pub trait Unload: Send + Sync + 'static {
    /// Release backing resources. With `keep_loaded_objects` the objects
    /// already extracted from the bundle stay alive.
    fn unload(&self, keep_loaded_objects: bool);
}

/// Failure while extracting an asset from a loaded bundle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadError(pub String);

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for LoadError {}

/// A loaded physical bundle
#[async_trait]
pub trait BundleHandle: Unload {
    type Asset: Send + 'static;

    /// True if the bundle holds an asset with this name
    fn contains(&self, asset_name: &str) -> bool;

    /// Extract an asset
    async fn load_asset(&self, asset_name: &str) -> std::result::Result<Self::Asset, LoadError>;
}

/// Cache lifecycle notifications
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BundleEvent {
    /// Bundle was fetched and inserted
    Loaded { key: String },
    /// Last reference released, bundle unloaded
    Evicted { key: String },
}
