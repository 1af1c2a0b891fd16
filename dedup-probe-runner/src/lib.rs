// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for [dedup-probe](https://crates.io/crates/dedup-probe), a validator for
//! duplicate-submission races against a notification-dispatch endpoint.
//!
//! The basic flow is: a [`CaseList`](case_source::CaseList) is read from a case file, a
//! [`ProbeRunner`](runner::ProbeRunner) fires its cases at a
//! [`NotificationClient`](client::NotificationClient) either as race groups or as load batches,
//! and a [`ProbeReporter`](reporter::ProbeReporter) displays and aggregates the classified
//! outcomes before they are checked against the totals the case file declares.

pub mod case_source;
pub mod classify;
pub mod client;
pub mod config;
pub mod errors;
pub mod reporter;
pub mod runner;
mod stopwatch;
#[cfg(test)]
mod test_helpers;
