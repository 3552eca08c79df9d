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

use crate::config::KeyFormat;
use crate::error::{BundleError, Result};
use crate::tags::{self, Tag, TagGroup, TagRegistry, TagSelection};
use ahash::AHashMap;
use std::sync::Arc;

/// Static metadata for one logical bundle.
///
/// Descriptors are read-only once built. Dependencies are shared through
/// `Arc` and must form a DAG.
#[derive(Debug)]
pub struct BundleDescriptor {
    name: String,
    prefix: String,
    groups: Vec<TagGroup>,
    required_mask: u64,
    dependencies: Vec<Arc<BundleDescriptor>>,
    assets: AHashMap<String, Vec<String>>,
    format: KeyFormat,
}

impl BundleDescriptor {
    pub fn builder(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder::new(name.into())
    }

    /// Logical name, unique per catalog
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Leading part of every file key
    pub fn file_name_prefix(&self) -> &str {
        &self.prefix
    }

    /// Applicable tag groups, platform group first
    pub fn tag_groups(&self) -> &[TagGroup] {
        &self.groups
    }

    pub fn dependencies(&self) -> &[Arc<BundleDescriptor>] {
        &self.dependencies
    }

    pub fn key_format(&self) -> KeyFormat {
        self.format
    }

    /// Union of every applicable group's bit field
    pub fn required_mask(&self) -> u64 {
        self.required_mask
    }

    /// Cache key and file name for `selection`.
    ///
    /// Fails with [`BundleError::TagMaskMismatch`] unless the selection
    /// specifies a tag for every group this bundle depends on. Tags outside
    /// the required mask do not influence the key.
    pub fn file_key(&self, selection: &TagSelection) -> Result<String> {
        if !selection.covers(self.required_mask) {
            return Err(BundleError::TagMaskMismatch {
                bundle: self.name.clone(),
                required: self.required_mask,
                supplied: selection.mask(),
            });
        }
        let tag_string = selection
            .masked(self.required_mask)
            .string_form(&self.groups, self.format.tag_separator);
        Ok(self.join_key(&tag_string))
    }

    /// Platform tag plus the default of every other group
    pub fn default_selection(&self, platform: Tag) -> Result<TagSelection> {
        Ok(TagSelection::from_tags([platform]).combine(tags::default_combination(&self.groups, 1)?))
    }

    /// Name the build tooling gives this bundle's default variant for
    /// `platform`
    pub fn default_bundle_name(&self, platform: Tag) -> Result<String> {
        let mut chosen = vec![platform];
        chosen.extend(tags::default_combination(&self.groups, 1)?);
        let tag_string = tags::build_tag_string(&self.groups, &chosen, self.format.tag_separator);
        Ok(self.join_key(&tag_string))
    }

    /// Asset paths assigned to an exact tag string. Build-time only.
    pub fn assets_for_tags(&self, tag_string: &str) -> &[String] {
        self.assets
            .get(tag_string)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Tag strings that have an asset assignment
    pub fn assigned_tag_strings(&self) -> impl Iterator<Item = &str> {
        self.assets.keys().map(String::as_str)
    }

    fn join_key(&self, tag_string: &str) -> String {
        if tag_string.is_empty() {
            return self.prefix.clone();
        }
        let mut key = String::with_capacity(self.prefix.len() + 1 + tag_string.len());
        key.push_str(&self.prefix);
        key.push(self.format.name_separator);
        key.push_str(tag_string);
        key
    }
}

/// Builder for [`BundleDescriptor`]
pub struct DescriptorBuilder {
    name: String,
    prefix: Option<String>,
    group_names: Vec<String>,
    dependencies: Vec<Arc<BundleDescriptor>>,
    assets: AHashMap<String, Vec<String>>,
    format: KeyFormat,
}

impl DescriptorBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            prefix: None,
            group_names: Vec::new(),
            dependencies: Vec::new(),
            assets: AHashMap::new(),
            format: KeyFormat::default(),
        }
    }

    /// Override the file name prefix (defaults to the name)
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn tag_group(mut self, group: impl Into<String>) -> Self {
        self.group_names.push(group.into());
        self
    }

    pub fn tag_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_names.extend(groups.into_iter().map(Into::into));
        self
    }

    pub fn dependency(mut self, dependency: Arc<BundleDescriptor>) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn assets<I, S>(mut self, tag_string: impl Into<String>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assets
            .entry(tag_string.into())
            .or_default()
            .extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn key_format(mut self, format: KeyFormat) -> Self {
        self.format = format;
        self
    }

    /// Resolve group names and freeze the descriptor.
    ///
    /// The registry's platform group is always included and comes first;
    /// remaining groups follow registration order.
    pub fn build(self, registry: &TagRegistry) -> Result<Arc<BundleDescriptor>> {
        let mut ids = Vec::with_capacity(self.group_names.len() + 1);
        for name in &self.group_names {
            ids.push(registry.group_by_name(name)?.id());
        }
        ids.sort_unstable();
        ids.dedup();
        if let Some(platform) = registry.platform_group() {
            if ids.first() != Some(&platform.id()) {
                ids.insert(0, platform.id());
            }
        }

        let groups: Vec<TagGroup> = ids
            .into_iter()
            .filter_map(|id| registry.group(id).cloned())
            .collect();
        let required_mask = groups.iter().fold(0, |mask, g| mask | g.mask());

        Ok(Arc::new(BundleDescriptor {
            prefix: self.prefix.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            groups,
            required_mask,
            dependencies: self.dependencies,
            assets: self.assets,
            format: self.format,
        }))
    }
}
