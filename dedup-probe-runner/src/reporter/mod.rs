// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report the results of a probe run to the console, and export them as tables and JUnit XML.
//!
//! The main type here is [`ProbeReporter`], which is constructed via a [`ProbeReporterBuilder`].

mod aggregator;
mod displayer;
pub mod events;
mod export;
mod imp;
mod junit;

pub use aggregator::*;
pub use displayer::ReporterStderr;
pub use export::*;
pub use imp::*;
pub use junit::write_junit;
