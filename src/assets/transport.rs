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

use crate::assets::BundleHandle;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;

/// Transport could not produce a bundle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchError {
    pub reason: String,
}

impl FetchError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl std::error::Error for FetchError {}

/// Fetches raw bundles (filesystem, HTTP, archive, ...).
///
/// A fetch may take arbitrarily long and may be retried by the loader after
/// an earlier failure for the same path.
#[async_trait]
pub trait BundleTransport: Send + Sync + 'static {
    type Bundle: BundleHandle;

    async fn fetch(&self, path: &str) -> Result<Self::Bundle, FetchError>;
}

/// Where bundles live
pub trait PathProvider: Send + Sync {
    /// Directory or URL all bundles are fetched from
    fn base_path(&self) -> String;

    /// Join a cache key onto the base path
    fn combine(&self, base: &str, key: &str) -> String {
        combine_path(base, key)
    }

    /// Full fetch path for a cache key
    fn bundle_path(&self, key: &str) -> String {
        self.combine(&self.base_path(), key)
    }
}

/// `/`-join that tolerates an empty base and trailing separators
pub fn combine_path(base: &str, key: &str) -> String {
    if base.is_empty() {
        return key.to_string();
    }
    if base.ends_with('/') {
        format!("{base}{key}")
    } else {
        format!("{base}/{key}")
    }
}

/// Bundles in a local directory
#[derive(Clone, Debug)]
pub struct LocalPathProvider {
    root: PathBuf,
}

impl LocalPathProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PathProvider for LocalPathProvider {
    fn base_path(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }

    fn combine(&self, base: &str, key: &str) -> String {
        PathBuf::from(base).join(key).to_string_lossy().into_owned()
    }
}

/// Bundles behind a remote endpoint
#[derive(Clone, Debug)]
pub struct UrlPathProvider {
    base_url: String,
}

impl UrlPathProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl PathProvider for UrlPathProvider {
    fn base_path(&self) -> String {
        self.base_url.clone()
    }
}
