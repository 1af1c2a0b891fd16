// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events for the reporter.
//!
//! These types form the interface between the probe runner and the probe reporter. The probe
//! reporter observes the event stream produced by the runner and displays, aggregates and exports
//! it.

use crate::{case_source::CaseList, runner::GroupResult, runner::RunMode};
use chrono::{DateTime, Local};
use std::time::Duration;

/// A probe event.
///
/// Events are produced by a [`ProbeRunner`](crate::runner::ProbeRunner) and consumed by a
/// [`ProbeReporter`](crate::reporter::ProbeReporter).
#[derive(Clone, Debug)]
pub struct ProbeEvent<'a> {
    /// The time at which the event was generated.
    pub timestamp: DateTime<Local>,

    /// The amount of time elapsed since the start of the run.
    pub elapsed: Duration,

    /// The kind of event this is.
    pub kind: ProbeEventKind<'a>,
}

/// The kind of probe event this is.
///
/// Forms part of [`ProbeEvent`].
#[derive(Clone, Debug)]
pub enum ProbeEventKind<'a> {
    /// The run started.
    RunStarted {
        /// The mode the run executes in.
        mode: RunMode,

        /// The cases that will be run.
        cases: &'a CaseList,

        /// The profile chosen for this run.
        profile_name: String,

        /// The number of batches the cases were sliced into.
        batch_count: usize,
    },

    /// A batch of cases is about to be launched.
    BatchStarted {
        /// The 0-based index of this batch.
        index: usize,

        /// The total number of batches.
        total: usize,

        /// The number of cases in this batch.
        size: usize,
    },

    /// A case finished executing.
    CaseFinished {
        /// The 0-based position of this case within the run.
        index: usize,

        /// The total number of cases.
        total: usize,

        /// The outcomes of the case and their classification.
        result: GroupResult<'a>,
    },

    /// The run finished, either because every case completed or because the global timeout was
    /// hit.
    RunFinished {
        /// The time at which the run was started.
        start_time: DateTime<Local>,

        /// The amount of time it took for the run to finish.
        elapsed: Duration,

        /// Statistics for the run.
        run_stats: RunStats,

        /// True if the run was cut off by its global timeout.
        timed_out: bool,
    },
}

/// Statistics for a probe run.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct RunStats {
    /// The total number of cases in the run.
    pub initial_cases: usize,

    /// The number of cases that finished executing.
    pub finished_cases: usize,

    /// The number of finished cases that passed.
    pub passed_cases: usize,

    /// The number of submissions whose outcome was recorded.
    pub finished_requests: usize,
}

impl RunStats {
    /// Returns true if every case ran and passed.
    pub fn is_success(&self) -> bool {
        self.finished_cases == self.initial_cases && self.passed_cases == self.finished_cases
    }

    /// Returns the number of finished cases that failed.
    pub fn failed_cases(&self) -> usize {
        self.finished_cases - self.passed_cases
    }

    pub(crate) fn on_case_finished(&mut self, result: &GroupResult<'_>) {
        self.finished_cases += 1;
        self.finished_requests += result.outcomes.len();
        if result.verdict() {
            self.passed_cases += 1;
        }
    }
}
