// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The probe runner.
//!
//! The main structure in this module is [`ProbeRunner`], which is constructed via a
//! [`ProbeRunnerBuilder`]. The runner drives cases through the executor batch by batch, on a
//! single-threaded Tokio runtime.

mod executor;
mod scheduler;

pub use executor::*;
pub use scheduler::*;
