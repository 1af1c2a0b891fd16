// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for dedup-probe.
//!
//! Configuration is layered: the embedded default config comes first, and the repository config
//! (`.config/dedup-probe.toml`, or the file passed in with `--config-file`) is merged on top of it.
//! Settings are grouped into named profiles; custom profiles fall back to the default profile for
//! every key they don't set.

mod elements;
mod imp;

pub use elements::*;
pub use imp::*;
