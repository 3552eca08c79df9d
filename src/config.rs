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

//! Settings for tags and the bundle loader
//!
//! Both settings types are plain serde structs and are usually read from
//! JSON shipped next to the built bundles:
//!
//! ```
//! use archetype_bundle::config::{LoaderSettings, TagSettings};
//!
//! let tags = TagSettings::from_json_str(r#"{
//!     "groups": [
//!         { "name": "Platform", "tags": ["iOS", "Android"], "default": "iOS" },
//!         { "name": "Quality", "tags": ["SD", "HD"], "default": "SD" }
//!     ]
//! }"#).unwrap();
//! assert_eq!(tags.groups.len(), 2);
//!
//! let loader = LoaderSettings::from_json_str(r#"{
//!     "base_path": "Bundles",
//!     "active_tags": { "Platform": "Android", "Quality": "HD" }
//! }"#).unwrap();
//! assert_eq!(loader.name_separator, '_');
//! ```

use crate::error::Result;
use crate::tags::{TagRegistry, TagSelection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One tag group as authored
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagGroupSettings {
    pub name: String,
    pub tags: Vec<String>,
    #[serde(default)]
    pub default: Option<String>,
}

/// All tag groups, platform group first
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSettings {
    pub groups: Vec<TagGroupSettings>,
}

impl TagSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Separators used to turn a bundle name and its tags into a file key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFormat {
    /// Between the name prefix and the tag string
    pub name_separator: char,
    /// Between individual tag names
    pub tag_separator: char,
}

impl Default for KeyFormat {
    fn default() -> Self {
        Self {
            name_separator: '_',
            tag_separator: '_',
        }
    }
}

/// Runtime loader configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    /// Directory or URL all bundles are fetched from
    pub base_path: String,
    pub name_separator: char,
    pub tag_separator: char,
    /// Passed to the bundle handle on unload
    pub keep_loaded_objects: bool,
    /// Initially active tag per group name
    pub active_tags: BTreeMap<String, String>,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        let format = KeyFormat::default();
        Self {
            base_path: "Bundles".to_string(),
            name_separator: format.name_separator,
            tag_separator: format.tag_separator,
            keep_loaded_objects: false,
            active_tags: BTreeMap::new(),
        }
    }
}

impl LoaderSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn key_format(&self) -> KeyFormat {
        KeyFormat {
            name_separator: self.name_separator,
            tag_separator: self.tag_separator,
        }
    }

    /// Resolve `active_tags` against the registry
    pub fn active_selection(&self, registry: &TagRegistry) -> Result<TagSelection> {
        registry.selection(
            self.active_tags
                .iter()
                .map(|(group, tag)| (group.as_str(), tag.as_str())),
        )
    }
}
