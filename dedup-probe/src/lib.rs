// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Validates how a notification-dispatch endpoint handles duplicate submissions.
//!
//! `dedup-probe race` fires simultaneous identical submissions for every case in a case file and
//! checks that the endpoint delivers exactly one of them. `dedup-probe load` submits every case
//! once, a batch at a time, and checks each response against the case's expectation.
//!
//! The core functionality lives in [`dedup-probe-runner`](dedup_probe_runner).

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputWriter;
