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

//! Persisted descriptor layout
//!
//! The build tooling writes one [`DescriptorRecord`] per logical bundle.
//! Dependencies are stored by name; [`DescriptorCatalog`] links them into
//! shared descriptors and rejects unknown names and dependency cycles.

use super::BundleDescriptor;
use crate::config::KeyFormat;
use crate::error::{BundleError, Result};
use crate::tags::TagRegistry;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One descriptor as stored on disk
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorRecord {
    pub name: String,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub tag_groups: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Tag string -> asset paths
    #[serde(default)]
    pub assets: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// Resolved descriptors by logical name
#[derive(Debug, Default)]
pub struct DescriptorCatalog {
    descriptors: AHashMap<String, Arc<BundleDescriptor>>,
    order: Vec<String>,
}

impl DescriptorCatalog {
    /// Parse a JSON array of records and resolve it
    pub fn from_json_str(json: &str, registry: &TagRegistry, format: KeyFormat) -> Result<Self> {
        let records: Vec<DescriptorRecord> = serde_json::from_str(json)?;
        Self::from_records(&records, registry, format)
    }

    pub fn from_records(
        records: &[DescriptorRecord],
        registry: &TagRegistry,
        format: KeyFormat,
    ) -> Result<Self> {
        let mut by_name: AHashMap<&str, &DescriptorRecord> = AHashMap::new();
        for record in records {
            if by_name.insert(record.name.as_str(), record).is_some() {
                return Err(BundleError::Config(format!(
                    "bundle '{}' is declared twice",
                    record.name
                )));
            }
        }

        let mut linker = Linker {
            records: &by_name,
            registry,
            format,
            state: AHashMap::new(),
            built: AHashMap::new(),
            stack: Vec::new(),
        };
        for record in records {
            linker.resolve(&record.name)?;
        }

        Ok(Self {
            descriptors: linker.built,
            order: records.iter().map(|r| r.name.clone()).collect(),
        })
    }

    pub fn get(&self, name: &str) -> Result<Arc<BundleDescriptor>> {
        self.descriptors
            .get(name)
            .cloned()
            .ok_or_else(|| BundleError::UnknownBundle(name.to_string()))
    }

    /// Names in declaration order
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

struct Linker<'a> {
    records: &'a AHashMap<&'a str, &'a DescriptorRecord>,
    registry: &'a TagRegistry,
    format: KeyFormat,
    state: AHashMap<String, Visit>,
    built: AHashMap<String, Arc<BundleDescriptor>>,
    stack: Vec<String>,
}

impl Linker<'_> {
    fn resolve(&mut self, name: &str) -> Result<Arc<BundleDescriptor>> {
        match self.state.get(name) {
            Some(Visit::Done) => {
                let built = self.built.get(name).cloned();
                return built.ok_or_else(|| BundleError::UnknownBundle(name.to_string()));
            }
            Some(Visit::InProgress) => {
                let mut chain = self.stack.clone();
                chain.push(name.to_string());
                return Err(BundleError::DependencyCycle(chain));
            }
            None => {}
        }

        let record = *self
            .records
            .get(name)
            .ok_or_else(|| BundleError::UnknownBundle(name.to_string()))?;

        self.state.insert(name.to_string(), Visit::InProgress);
        self.stack.push(name.to_string());

        let mut builder = BundleDescriptor::builder(record.name.clone())
            .tag_groups(record.tag_groups.iter().cloned())
            .key_format(self.format);
        if let Some(prefix) = &record.prefix {
            builder = builder.prefix(prefix.clone());
        }
        for dependency in &record.dependencies {
            builder = builder.dependency(self.resolve(dependency)?);
        }
        for (tag_string, paths) in &record.assets {
            builder = builder.assets(tag_string.clone(), paths.iter().cloned());
        }
        let descriptor = builder.build(self.registry)?;

        self.stack.pop();
        self.state.insert(name.to_string(), Visit::Done);
        self.built.insert(name.to_string(), descriptor.clone());
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TagRegistry {
        let mut registry = TagRegistry::new();
        registry.register("Platform", ["iOS", "Android"], Some(0)).unwrap();
        registry.register("Quality", ["SD", "HD"], Some(0)).unwrap();
        registry
    }

    #[test]
    fn test_links_shared_dependencies() {
        let json = r#"[
            { "name": "Level", "tag_groups": ["Quality"], "dependencies": ["Shared", "Audio"] },
            { "name": "Audio", "dependencies": ["Shared"] },
            { "name": "Shared" }
        ]"#;
        let catalog = DescriptorCatalog::from_json_str(json, &registry(), KeyFormat::default())
            .unwrap();
        assert_eq!(catalog.len(), 3);

        let level = catalog.get("Level").unwrap();
        let audio = catalog.get("Audio").unwrap();
        let deps: Vec<_> = level.dependencies().iter().map(|d| d.name()).collect();
        assert_eq!(deps, ["Shared", "Audio"]);
        assert!(Arc::ptr_eq(&level.dependencies()[0], &audio.dependencies()[0]));
    }

    #[test]
    fn test_detects_cycle() {
        let records = vec![
            DescriptorRecord {
                name: "A".into(),
                dependencies: vec!["B".into()],
                ..Default::default()
            },
            DescriptorRecord {
                name: "B".into(),
                dependencies: vec!["A".into()],
                ..Default::default()
            },
        ];
        let err = DescriptorCatalog::from_records(&records, &registry(), KeyFormat::default())
            .unwrap_err();
        assert_eq!(
            err,
            BundleError::DependencyCycle(vec!["A".into(), "B".into(), "A".into()])
        );
    }

    #[test]
    fn test_unknown_dependency() {
        let records = vec![DescriptorRecord {
            name: "A".into(),
            dependencies: vec!["Missing".into()],
            ..Default::default()
        }];
        let err = DescriptorCatalog::from_records(&records, &registry(), KeyFormat::default())
            .unwrap_err();
        assert_eq!(err, BundleError::UnknownBundle("Missing".into()));
    }

    #[test]
    fn test_duplicate_names() {
        let records = vec![
            DescriptorRecord {
                name: "A".into(),
                ..Default::default()
            },
            DescriptorRecord {
                name: "A".into(),
                ..Default::default()
            },
        ];
        assert!(matches!(
            DescriptorCatalog::from_records(&records, &registry(), KeyFormat::default()),
            Err(BundleError::Config(_))
        ));
    }

    #[test]
    fn test_record_assets_survive() {
        let json = r#"[{ "name": "Level", "assets": { "iOS": ["Assets/a.prefab"] } }]"#;
        let catalog = DescriptorCatalog::from_json_str(json, &registry(), KeyFormat::default())
            .unwrap();
        let level = catalog.get("Level").unwrap();
        assert_eq!(level.assets_for_tags("iOS"), ["Assets/a.prefab".to_string()]);
    }
}
