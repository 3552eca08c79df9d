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

use crate::error::{BundleError, Result};

/// Index of a group inside its [`TagRegistry`](super::TagRegistry)
pub type GroupId = u16;

/// A single variant value, e.g. `iOS` in the platform group.
///
/// Tags are plain bit patterns: the group's field holds `index + 1`, so an
/// all-zero field means "no tag chosen for this group".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Tag {
    group: GroupId,
    index: u16,
    bits: u64,
    group_mask: u64,
}

impl Tag {
    /// Owning group
    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Position of the tag inside its group
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Bits this tag contributes to a selection
    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Full bit field of the owning group
    pub fn group_mask(&self) -> u64 {
        self.group_mask
    }
}

/// A closed set of mutually exclusive tags occupying one bit field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagGroup {
    id: GroupId,
    name: String,
    tags: Vec<String>,
    default: Option<usize>,
    offset: u32,
    width: u32,
}

impl TagGroup {
    /// Bits needed to encode `tag_count` tags plus the empty value
    pub(crate) fn field_width(tag_count: usize) -> u32 {
        u64::BITS - (tag_count as u64).leading_zeros()
    }

    pub(crate) fn new(
        id: GroupId,
        name: String,
        tags: Vec<String>,
        default: Option<usize>,
        offset: u32,
    ) -> Result<Self> {
        if tags.is_empty() {
            return Err(BundleError::InvalidTagGroup(format!(
                "group '{name}' has no tags"
            )));
        }
        for (i, tag) in tags.iter().enumerate() {
            if tags[..i].contains(tag) {
                return Err(BundleError::InvalidTagGroup(format!(
                    "group '{name}' declares tag '{tag}' twice"
                )));
            }
        }
        if let Some(default) = default {
            if default >= tags.len() {
                return Err(BundleError::InvalidTagGroup(format!(
                    "group '{name}' default index {default} is out of range"
                )));
            }
        }
        if tags.len() > u16::MAX as usize {
            return Err(BundleError::InvalidTagGroup(format!(
                "group '{name}' has too many tags"
            )));
        }

        let width = Self::field_width(tags.len());
        if offset + width > u64::BITS {
            return Err(BundleError::InvalidTagGroup(format!(
                "group '{name}' does not fit in the 64-bit tag space"
            )));
        }

        Ok(Self {
            id,
            name,
            tags,
            default,
            offset,
            width,
        })
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tag names in declaration order
    pub fn tag_names(&self) -> &[String] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Bit field owned by this group
    pub fn mask(&self) -> u64 {
        ((1u64 << self.width) - 1) << self.offset
    }

    /// Tag at `index`, if any
    pub fn tag(&self, index: usize) -> Option<Tag> {
        if index >= self.tags.len() {
            return None;
        }
        Some(Tag {
            group: self.id,
            index: index as u16,
            bits: ((index as u64) + 1) << self.offset,
            group_mask: self.mask(),
        })
    }

    /// Look a tag up by name
    pub fn tag_by_name(&self, name: &str) -> Result<Tag> {
        self.tags
            .iter()
            .position(|t| t == name)
            .and_then(|i| self.tag(i))
            .ok_or_else(|| BundleError::UnknownTag {
                group: self.name.clone(),
                tag: name.to_string(),
            })
    }

    /// Configured default tag
    pub fn default_tag(&self) -> Result<Tag> {
        self.default
            .and_then(|i| self.tag(i))
            .ok_or_else(|| {
                BundleError::InvalidTagGroup(format!("group '{}' has no default tag", self.name))
            })
    }

    /// Name of a tag belonging to this group
    pub fn tag_name(&self, tag: Tag) -> Option<&str> {
        if tag.group != self.id {
            return None;
        }
        self.tags.get(tag.index()).map(String::as_str)
    }

    /// Decode this group's field out of raw selection bits
    pub fn decode(&self, bits: u64) -> Option<Tag> {
        let value = (bits & self.mask()) >> self.offset;
        if value == 0 {
            return None;
        }
        self.tag(value as usize - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform() -> TagGroup {
        TagGroup::new(
            0,
            "Platform".into(),
            vec!["iOS".into(), "Android".into(), "Standalone".into()],
            Some(2),
            0,
        )
        .unwrap()
    }

    #[test]
    fn test_field_width() {
        assert_eq!(TagGroup::field_width(1), 1);
        assert_eq!(TagGroup::field_width(2), 2);
        assert_eq!(TagGroup::field_width(3), 2);
        assert_eq!(TagGroup::field_width(4), 3);
    }

    #[test]
    fn test_tag_bits_stay_in_field() {
        let group = TagGroup::new(1, "Quality".into(), vec!["SD".into(), "HD".into()], None, 5)
            .unwrap();
        assert_eq!(group.mask(), 0b11 << 5);
        for i in 0..group.len() {
            let tag = group.tag(i).unwrap();
            assert_eq!(tag.bits() & !group.mask(), 0);
            assert_ne!(tag.bits(), 0);
        }
    }

    #[test]
    fn test_decode_round_trip() {
        let group = platform();
        let android = group.tag_by_name("Android").unwrap();
        assert_eq!(group.decode(android.bits()), Some(android));
        assert_eq!(group.decode(0), None);
        assert_eq!(group.tag_name(android), Some("Android"));
    }

    #[test]
    fn test_rejects_bad_default() {
        let err = TagGroup::new(0, "Locale".into(), vec!["en".into()], Some(3), 0).unwrap_err();
        assert!(matches!(err, BundleError::InvalidTagGroup(_)));
    }

    #[test]
    fn test_rejects_empty_and_duplicates() {
        assert!(TagGroup::new(0, "Empty".into(), vec![], None, 0).is_err());
        assert!(TagGroup::new(0, "Dup".into(), vec!["a".into(), "a".into()], None, 0).is_err());
    }

    #[test]
    fn test_rejects_overflow() {
        let err = TagGroup::new(0, "Late".into(), vec!["x".into(), "y".into()], None, 63)
            .unwrap_err();
        assert!(matches!(err, BundleError::InvalidTagGroup(_)));
    }

    #[test]
    fn test_missing_default() {
        let group = TagGroup::new(0, "Locale".into(), vec!["en".into()], None, 0).unwrap();
        assert!(matches!(
            group.default_tag(),
            Err(BundleError::InvalidTagGroup(_))
        ));
    }
}
