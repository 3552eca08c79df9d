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

// Tag Model
//
// Variant axes (platform, locale, quality, ...) and the bitmask selections
// built from them. Pure data, no I/O.

pub mod group;
pub mod registry;
pub mod selection;

pub use group::{GroupId, Tag, TagGroup};
pub use registry::TagRegistry;
pub use selection::TagSelection;

use crate::error::Result;

/// Apply `tags` on top of `selection`
pub fn combine<I: IntoIterator<Item = Tag>>(selection: TagSelection, tags: I) -> TagSelection {
    selection.combine(tags)
}

/// Restrict `selection` to `mask`
pub fn masked(selection: TagSelection, mask: u64) -> TagSelection {
    selection.masked(mask)
}

/// One default tag per group, skipping the first `skip_from_start` groups.
///
/// Builds skip the platform group (`skip_from_start = 1`) because the
/// platform comes from the build or load context instead.
pub fn default_combination(groups: &[TagGroup], skip_from_start: usize) -> Result<Vec<Tag>> {
    groups
        .iter()
        .skip(skip_from_start)
        .map(TagGroup::default_tag)
        .collect()
}

/// Join tag names in the given order, resolving names through `groups`
pub fn build_tag_string(groups: &[TagGroup], tags: &[Tag], separator: char) -> String {
    let mut out = String::new();
    for tag in tags {
        let Some(name) = groups
            .iter()
            .find(|g| g.id() == tag.group())
            .and_then(|g| g.tag_name(*tag))
        else {
            continue;
        };
        if !out.is_empty() {
            out.push(separator);
        }
        out.push_str(name);
    }
    out
}
