// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    aggregator::ResultAggregator,
    displayer::{DisplayReporter, ReporterStderr},
    events::{ProbeEvent, ProbeEventKind},
};
use crate::{case_source::CaseList, errors::WriteEventError, runner::RunMode};

/// Probe reporter builder.
#[derive(Debug, Default)]
pub struct ProbeReporterBuilder {
    should_colorize: bool,
    verbose: bool,
}

impl ProbeReporterBuilder {
    /// Set to true if the reporter should colorize output.
    pub fn set_colorize(&mut self, should_colorize: bool) -> &mut Self {
        self.should_colorize = should_colorize;
        self
    }

    /// Sets verbose output: every request's outcome is shown, not just those of failing cases.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Creates a new probe reporter.
    pub fn build<'a>(&self, mode: RunMode, output: ReporterStderr<'a>) -> ProbeReporter<'a> {
        ProbeReporter {
            display_reporter: DisplayReporter::new(self.should_colorize, self.verbose, output),
            aggregator: ResultAggregator::new(mode),
            cases: None,
        }
    }
}

/// Displays probe events on standard error as they happen, and aggregates them for the final
/// checks and exports.
pub struct ProbeReporter<'a> {
    display_reporter: DisplayReporter<'a>,
    aggregator: ResultAggregator,
    cases: Option<&'a CaseList>,
}

impl<'a> ProbeReporter<'a> {
    /// Reports a probe event.
    ///
    /// Once the run finishes, the aggregate checks are displayed as well.
    pub fn report_event(&mut self, event: ProbeEvent<'a>) -> Result<(), WriteEventError> {
        self.display_reporter.write_event(&event)?;
        self.aggregator.write_event(&event);

        match event.kind {
            ProbeEventKind::RunStarted { cases, .. } => {
                self.cases = Some(cases);
            }
            ProbeEventKind::RunFinished { .. } => {
                if let Some(cases) = self.cases {
                    self.display_reporter
                        .write_checks(&self.aggregator.checks(cases))?;
                }
            }
            ProbeEventKind::BatchStarted { .. } | ProbeEventKind::CaseFinished { .. } => {}
        }

        Ok(())
    }

    /// Marks the reporter done, returning everything it aggregated.
    pub fn finish(self) -> ResultAggregator {
        self.aggregator
    }
}
