//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use archetype_bundle::prelude::*;
//! ```

pub use crate::assets::{
    BundleEvent, BundleHandle, BundleLoader, BundleTransport, LocalPathProvider,
    MemoryTransport, PathProvider, UrlPathProvider,
};
pub use crate::bundle::{BundleDescriptor, DescriptorCatalog};
pub use crate::config::{LoaderSettings, TagSettings};
pub use crate::error::{BundleError, Result};
pub use crate::tags::{Tag, TagRegistry, TagSelection};
