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

use super::{Tag, TagGroup};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chosen tag per group, packed into a 64-bit tag space.
///
/// `bits` holds the encoded tags, `mask` marks which group fields have been
/// specified. Two selections that agree inside a bundle's required mask
/// produce the same [`masked`](Self::masked) value and therefore the same
/// cache key for that bundle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagSelection {
    bits: u64,
    mask: u64,
}

impl TagSelection {
    /// Empty selection
    pub const fn empty() -> Self {
        Self { bits: 0, mask: 0 }
    }

    /// Selection made of the given tags
    pub fn from_tags<I: IntoIterator<Item = Tag>>(tags: I) -> Self {
        Self::empty().combine(tags)
    }

    /// Returns a new selection with the given tags applied.
    ///
    /// Across distinct groups this is a plain bitwise OR. A tag for a group
    /// that already has one replaces it, since tags in a group are
    /// mutually exclusive.
    pub fn combine<I: IntoIterator<Item = Tag>>(self, tags: I) -> Self {
        tags.into_iter().fold(self, |sel, tag| sel.with(tag))
    }

    /// Returns a new selection with one tag applied
    pub fn with(self, tag: Tag) -> Self {
        Self {
            bits: (self.bits & !tag.group_mask()) | tag.bits(),
            mask: self.mask | tag.group_mask(),
        }
    }

    /// Projects the selection down to `mask`
    pub fn masked(self, mask: u64) -> Self {
        Self {
            bits: self.bits & mask,
            mask: self.mask & mask,
        }
    }

    /// True if every field in `required` has been specified
    pub fn covers(&self, required: u64) -> bool {
        (self.mask & required) == required
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Group fields that carry a tag
    pub fn mask(&self) -> u64 {
        self.mask
    }

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    /// Tag chosen for `group`, if any
    pub fn tag_in(&self, group: &TagGroup) -> Option<Tag> {
        if self.mask & group.mask() == 0 {
            return None;
        }
        group.decode(self.bits)
    }

    /// Tag names of every specified group, in group order.
    ///
    /// This is the variant half of a bundle file name, so it must match the
    /// naming used by the build tooling exactly.
    pub fn string_form(&self, groups: &[TagGroup], separator: char) -> String {
        let mut out = String::new();
        for group in groups {
            let Some(name) = self.tag_in(group).and_then(|tag| group.tag_name(tag)) else {
                continue;
            };
            if !out.is_empty() {
                out.push(separator);
            }
            out.push_str(name);
        }
        out
    }
}

impl fmt::Display for TagSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}/{:#x}", self.bits, self.mask)
    }
}
