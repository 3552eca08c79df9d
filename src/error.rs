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

//! Error types

use std::fmt;

/// Bundle system error type
///
/// Errors are `Clone` so a single failed load can be handed to every
/// caller that joined it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleError {
    /// Malformed tag group configuration
    InvalidTagGroup(String),

    /// Tag group name not registered
    UnknownTagGroup(String),

    /// Tag name not present in its group
    UnknownTag { group: String, tag: String },

    /// Selection does not cover every tag group a bundle requires
    TagMaskMismatch {
        bundle: String,
        required: u64,
        supplied: u64,
    },

    /// Release or peek of a key that is not cached
    UnknownKey(String),

    /// Transport could not produce a valid bundle
    BundleFetchFailed {
        key: String,
        path: String,
        reason: String,
    },

    /// Asset is not part of a loaded bundle
    AssetNotFound { bundle: String, asset: String },

    /// Asset is present but could not be extracted
    AssetLoadFailed {
        bundle: String,
        asset: String,
        reason: String,
    },

    /// Descriptor dependencies loop back on themselves
    DependencyCycle(Vec<String>),

    /// Descriptor name not present in the catalog
    UnknownBundle(String),

    /// The task driving a shared load was dropped before it finished
    LoadAbandoned(String),

    /// Settings could not be parsed
    Config(String),

    /// Filesystem failure outside of a bundle fetch
    Io(String),
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleError::InvalidTagGroup(msg) => write!(f, "Invalid tag group: {msg}"),
            BundleError::UnknownTagGroup(name) => write!(f, "Unknown tag group: {name}"),
            BundleError::UnknownTag { group, tag } => {
                write!(f, "Unknown tag '{tag}' in group '{group}'")
            }
            BundleError::TagMaskMismatch {
                bundle,
                required,
                supplied,
            } => write!(
                f,
                "Tag selection {supplied:#x} does not include tags required by bundle {bundle} ({required:#x})"
            ),
            BundleError::UnknownKey(key) => write!(f, "No bundle with id {key}"),
            BundleError::BundleFetchFailed { key, path, reason } => {
                write!(f, "Failed to fetch bundle {key} from {path}: {reason}")
            }
            BundleError::AssetNotFound { bundle, asset } => {
                write!(f, "Bundle {bundle} does not contain {asset}")
            }
            BundleError::AssetLoadFailed {
                bundle,
                asset,
                reason,
            } => write!(f, "Failed to load {asset} from bundle {bundle}: {reason}"),
            BundleError::DependencyCycle(chain) => {
                write!(f, "Bundle dependency cycle: {}", chain.join(" -> "))
            }
            BundleError::UnknownBundle(name) => write!(f, "Unknown bundle: {name}"),
            BundleError::LoadAbandoned(key) => {
                write!(f, "Load of bundle {key} was abandoned before completion")
            }
            BundleError::Config(msg) => write!(f, "Config error: {msg}"),
            BundleError::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for BundleError {}

impl From<serde_json::Error> for BundleError {
    fn from(err: serde_json::Error) -> Self {
        BundleError::Config(err.to_string())
    }
}

impl From<std::io::Error> for BundleError {
    fn from(err: std::io::Error) -> Self {
        BundleError::Io(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, BundleError>;
