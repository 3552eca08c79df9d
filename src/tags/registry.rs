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

use super::{GroupId, Tag, TagGroup, TagSelection};
use crate::config::TagSettings;
use crate::error::{BundleError, Result};

/// Owns the tag groups and hands out disjoint bit fields.
///
/// The first registered group is the platform group. Descriptors always
/// depend on it because every bundle is built per platform.
#[derive(Clone, Debug, Default)]
pub struct TagRegistry {
    groups: Vec<TagGroup>,
    next_offset: u32,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from deserialized settings
    pub fn from_settings(settings: &TagSettings) -> Result<Self> {
        let mut registry = Self::new();
        for group in &settings.groups {
            let default = match &group.default {
                Some(name) => Some(group.tags.iter().position(|t| t == name).ok_or_else(
                    || {
                        BundleError::InvalidTagGroup(format!(
                            "group '{}' default '{name}' is not one of its tags",
                            group.name
                        ))
                    },
                )?),
                None => None,
            };
            registry.register(group.name.clone(), group.tags.clone(), default)?;
        }
        Ok(registry)
    }

    /// Register a new group, returning its id
    pub fn register<N, I, T>(&mut self, name: N, tags: I, default: Option<usize>) -> Result<GroupId>
    where
        N: Into<String>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let name = name.into();
        if self.groups.iter().any(|g| g.name() == name) {
            return Err(BundleError::InvalidTagGroup(format!(
                "group '{name}' is registered twice"
            )));
        }
        let id = GroupId::try_from(self.groups.len())
            .map_err(|_| BundleError::InvalidTagGroup("too many tag groups".to_string()))?;
        let tags = tags.into_iter().map(Into::into).collect();

        let group = TagGroup::new(id, name, tags, default, self.next_offset)?;
        self.next_offset += group.width();
        self.groups.push(group);
        Ok(id)
    }

    /// Groups in registration order
    pub fn groups(&self) -> &[TagGroup] {
        &self.groups
    }

    pub fn group(&self, id: GroupId) -> Option<&TagGroup> {
        self.groups.get(id as usize)
    }

    pub fn group_by_name(&self, name: &str) -> Result<&TagGroup> {
        self.groups
            .iter()
            .find(|g| g.name() == name)
            .ok_or_else(|| BundleError::UnknownTagGroup(name.to_string()))
    }

    /// Group whose tag is always supplied by the load context
    pub fn platform_group(&self) -> Option<&TagGroup> {
        self.groups.first()
    }

    /// Look up `tag` in `group`
    pub fn tag(&self, group: &str, tag: &str) -> Result<Tag> {
        self.group_by_name(group)?.tag_by_name(tag)
    }

    /// Build a selection from `(group, tag)` name pairs
    pub fn selection<'a, I>(&self, pairs: I) -> Result<TagSelection>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut selection = TagSelection::empty();
        for (group, tag) in pairs {
            selection = selection.with(self.tag(group, tag)?);
        }
        Ok(selection)
    }

    /// Selection holding every group's default tag
    pub fn default_selection(&self) -> Result<TagSelection> {
        Ok(TagSelection::from_tags(super::default_combination(
            &self.groups,
            0,
        )?))
    }

    /// Bits used so far
    pub fn used_bits(&self) -> u32 {
        self.next_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TagGroupSettings;

    #[test]
    fn test_groups_are_disjoint() {
        let mut registry = TagRegistry::new();
        registry.register("Platform", ["iOS", "Android", "Standalone"], Some(0)).unwrap();
        registry.register("Quality", ["SD", "HD"], Some(0)).unwrap();
        registry.register("Locale", ["en", "fr", "de", "ja", "ko"], Some(0)).unwrap();

        let groups = registry.groups();
        for (i, a) in groups.iter().enumerate() {
            for b in &groups[i + 1..] {
                assert_eq!(a.mask() & b.mask(), 0, "{} overlaps {}", a.name(), b.name());
            }
        }
        assert_eq!(registry.used_bits(), 2 + 2 + 3);
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let mut registry = TagRegistry::new();
        registry.register("Platform", ["iOS"], None).unwrap();
        assert!(matches!(
            registry.register("Platform", ["Android"], None),
            Err(BundleError::InvalidTagGroup(_))
        ));
    }

    #[test]
    fn test_from_settings() {
        let settings = TagSettings {
            groups: vec![
                TagGroupSettings {
                    name: "Platform".into(),
                    tags: vec!["iOS".into(), "Android".into()],
                    default: Some("Android".into()),
                },
                TagGroupSettings {
                    name: "Quality".into(),
                    tags: vec!["SD".into(), "HD".into()],
                    default: None,
                },
            ],
        };
        let registry = TagRegistry::from_settings(&settings).unwrap();
        assert_eq!(registry.platform_group().unwrap().name(), "Platform");
        let platform = registry.group_by_name("Platform").unwrap();
        assert_eq!(platform.default_tag().unwrap(), registry.tag("Platform", "Android").unwrap());
    }

    #[test]
    fn test_from_settings_bad_default() {
        let settings = TagSettings {
            groups: vec![TagGroupSettings {
                name: "Platform".into(),
                tags: vec!["iOS".into()],
                default: Some("Switch".into()),
            }],
        };
        assert!(matches!(
            TagRegistry::from_settings(&settings),
            Err(BundleError::InvalidTagGroup(_))
        ));
    }

    #[test]
    fn test_selection_unknown_names() {
        let mut registry = TagRegistry::new();
        registry.register("Platform", ["iOS"], None).unwrap();
        assert!(matches!(
            registry.selection([("Platform", "Android")]),
            Err(BundleError::UnknownTag { .. })
        ));
        assert!(matches!(
            registry.selection([("Region", "EU")]),
            Err(BundleError::UnknownTagGroup(_))
        ));
    }
}
