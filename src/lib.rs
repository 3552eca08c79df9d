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

//! Archetype Bundle - tag-variant asset bundle loading
//!
//! Bundles are built in several variants, one per combination of tags
//! (platform, quality, language, ...). A [`BundleDescriptor`] names the tag
//! groups a bundle varies by, and a [`TagSelection`] picks one variant. The
//! [`BundleLoader`] turns the pair into a file key, fetches the bundle and its
//! dependencies through a [`BundleTransport`], and reference-counts every
//! loaded bundle so concurrent users share one copy.

pub mod assets;
pub mod bundle;
pub mod config;
pub mod error;
pub mod prelude;
pub mod profiling;
pub mod tags;

pub use assets::{
    BundleEvent, BundleHandle, BundleLoader, BundleTransport, CacheStats, LoadError, LoadState,
    LoadedAsset, PathProvider, RefCountCache, Unload,
};
pub use bundle::{BundleDescriptor, DescriptorBuilder, DescriptorCatalog, DescriptorRecord};
pub use config::{KeyFormat, LoaderSettings, TagGroupSettings, TagSettings};
pub use error::*;
pub use tags::{GroupId, Tag, TagGroup, TagRegistry, TagSelection};
