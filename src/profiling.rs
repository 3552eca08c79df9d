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

//! # Profiling
//!
//! Loader operations emit `tracing` events at all times. With the
//! `profiling` feature, `get_bundle` also runs inside a `bundle.get` span and
//! [`init_file_subscriber`] can write everything to a file:
//!
//! ```toml
//! [dependencies]
//! archetype_bundle = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! ```ignore
//! let _guard = archetype_bundle::profiling::init_file_subscriber("trace.log")?;
//! // load and release bundles; events flush when the guard drops
//! ```
//!
//! Use `RUST_LOG=trace` with your own subscriber to see per-request state
//! transitions.

#[cfg(feature = "profiling")]
use crate::error::{BundleError, Result};

/// Install a global subscriber writing every event at `TRACE` and above to
/// `path`. Keep the returned guard alive until the program exits.
#[cfg(feature = "profiling")]
pub fn init_file_subscriber(
    path: impl AsRef<std::path::Path>,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let file = std::fs::File::create(path)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .try_init()
        .map_err(|err| BundleError::Config(err.to_string()))?;
    Ok(guard)
}
