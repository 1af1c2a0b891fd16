// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Machine-readable output for [dedup-probe](https://crates.io/crates/dedup-probe).
//!
//! The types in this crate are what `dedup-probe --message-format json` prints, and the exit codes
//! the binary terminates with.

mod exit_codes;
mod summary;

pub use exit_codes::*;
pub use summary::*;
