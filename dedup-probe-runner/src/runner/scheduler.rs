// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{execute_group, execute_load_batch};
use crate::{
    case_source::{CaseList, TestCase},
    client::{NotificationClient, NotificationRequest, SubmitResponse},
    config::{PositiveCount, ProbeProfile},
    errors::{ProbeRunnerBuildError, ProbeRunnerExecuteError, SendError, WriteEventError},
    reporter::events::{ProbeEvent, ProbeEventKind, RunStats},
    stopwatch::{StopwatchStart, stopwatch},
};
use chrono::Local;
use dedup_probe_metadata::ProbeMode;
use std::{fmt, time::Duration};
use tokio::runtime::Runtime;
use tracing::debug;

/// How a run issues its submissions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunMode {
    /// Every case is a race group of `width` simultaneous duplicate submissions, and groups run
    /// one at a time.
    Race {
        /// The number of duplicate submissions per case.
        width: PositiveCount,
    },

    /// Cases are sliced into batches of `batch_size`, with one submission per case and a whole
    /// batch in flight at once.
    Load {
        /// The number of cases per batch.
        batch_size: PositiveCount,
    },
}

impl RunMode {
    /// Returns the serializable mode.
    pub fn probe_mode(self) -> ProbeMode {
        match self {
            Self::Race { .. } => ProbeMode::Race,
            Self::Load { .. } => ProbeMode::Load,
        }
    }

    /// Returns the number of submissions issued for each case.
    pub fn requests_per_case(self) -> usize {
        match self {
            Self::Race { width } => width.get(),
            Self::Load { .. } => 1,
        }
    }

    /// Returns the number of cases in a full batch.
    pub fn cases_per_batch(self) -> usize {
        match self {
            Self::Race { .. } => 1,
            Self::Load { batch_size } => batch_size.get(),
        }
    }

    /// Slices cases into batches, preserving order. The last batch may be shorter than the rest.
    pub fn batches(self, cases: &[TestCase]) -> std::slice::Chunks<'_, TestCase> {
        cases.chunks(self.cases_per_batch())
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Race { width } => write!(f, "race mode, {width} submissions per case"),
            Self::Load { batch_size } => write!(f, "load mode, batches of {batch_size}"),
        }
    }
}

/// Probe runner options.
#[derive(Debug, Default)]
pub struct ProbeRunnerBuilder {
    race_width: Option<PositiveCount>,
    batch_size: Option<PositiveCount>,
    global_timeout: Option<Duration>,
}

impl ProbeRunnerBuilder {
    /// Sets the number of duplicate submissions per case in race mode.
    pub fn set_race_width(&mut self, race_width: PositiveCount) -> &mut Self {
        self.race_width = Some(race_width);
        self
    }

    /// Sets the number of cases per batch in load mode.
    pub fn set_batch_size(&mut self, batch_size: PositiveCount) -> &mut Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Sets the global timeout for the run.
    pub fn set_global_timeout(&mut self, global_timeout: Duration) -> &mut Self {
        self.global_timeout = Some(global_timeout);
        self
    }

    /// Creates a new probe runner. Settings not set on the builder come from `profile`.
    pub fn build<'a, C: NotificationClient>(
        self,
        mode: ProbeMode,
        cases: &'a CaseList,
        profile: &ProbeProfile<'_>,
        client: &'a C,
    ) -> Result<ProbeRunner<'a, C>, ProbeRunnerBuildError> {
        let (mode, global_timeout) = match mode {
            ProbeMode::Race => (
                RunMode::Race {
                    width: self.race_width.unwrap_or_else(|| profile.race_width()),
                },
                self.global_timeout
                    .unwrap_or_else(|| profile.race_global_timeout()),
            ),
            ProbeMode::Load => (
                RunMode::Load {
                    batch_size: self.batch_size.unwrap_or_else(|| profile.batch_size()),
                },
                self.global_timeout
                    .unwrap_or_else(|| profile.load_global_timeout()),
            ),
        };

        Ok(ProbeRunner {
            mode,
            global_timeout,
            profile_name: profile.name().to_owned(),
            cases,
            client,
            runtime: build_runtime().map_err(ProbeRunnerBuildError::TokioRuntimeCreate)?,
        })
    }
}

/// Context for running a probe.
///
/// Created using [`ProbeRunnerBuilder::build`].
pub struct ProbeRunner<'a, C> {
    mode: RunMode,
    global_timeout: Duration,
    profile_name: String,
    cases: &'a CaseList,
    client: &'a C,
    runtime: Runtime,
}

impl<C> fmt::Debug for ProbeRunner<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProbeRunner")
            .field("mode", &self.mode)
            .field("global_timeout", &self.global_timeout)
            .field("profile_name", &self.profile_name)
            .field("cases", &self.cases.len())
            .finish_non_exhaustive()
    }
}

impl<'a, C: NotificationClient> ProbeRunner<'a, C> {
    /// Returns the mode this runner executes in.
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Returns the global timeout for this run.
    pub fn global_timeout(&self) -> Duration {
        self.global_timeout
    }

    /// Executes every case, batch by batch.
    ///
    /// Accepts a callback that is called with each event. If the callback returns an error, the
    /// run stops and the error is returned.
    ///
    /// If the global timeout is hit, in-flight submissions are dropped, a `RunFinished` event is
    /// still reported, and [`ProbeRunnerExecuteError::GlobalTimeout`] is returned.
    pub fn try_execute<F>(self, mut callback: F) -> Result<RunStats, ProbeRunnerExecuteError>
    where
        F: FnMut(ProbeEvent<'a>) -> Result<(), WriteEventError>,
    {
        let stopwatch = stopwatch();
        let mut run_stats = RunStats {
            initial_cases: self.cases.len(),
            ..RunStats::default()
        };

        // The timeout must be created inside the runtime.
        let res = self.runtime.block_on(async {
            tokio::time::timeout(
                self.global_timeout,
                self.run_batches(&stopwatch, &mut run_stats, &mut callback),
            )
            .await
        });

        let timed_out = match res {
            Ok(Ok(())) => false,
            Ok(Err(error)) => return Err(ProbeRunnerExecuteError::Report(error)),
            Err(_) => true,
        };

        let snapshot = stopwatch.snapshot();
        callback(ProbeEvent {
            timestamp: Local::now(),
            elapsed: snapshot.duration,
            kind: ProbeEventKind::RunFinished {
                start_time: snapshot.start_time,
                elapsed: snapshot.duration,
                run_stats,
                timed_out,
            },
        })
        .map_err(ProbeRunnerExecuteError::Report)?;

        if timed_out {
            Err(ProbeRunnerExecuteError::GlobalTimeout {
                timeout: self.global_timeout,
                completed_cases: run_stats.finished_cases,
                total_cases: run_stats.initial_cases,
            })
        } else {
            Ok(run_stats)
        }
    }

    async fn run_batches<F>(
        &self,
        stopwatch: &StopwatchStart,
        run_stats: &mut RunStats,
        callback: &mut F,
    ) -> Result<(), WriteEventError>
    where
        F: FnMut(ProbeEvent<'a>) -> Result<(), WriteEventError>,
    {
        let cases: &'a [TestCase] = self.cases.cases();
        let batch_count = self.mode.batches(cases).len();
        let event = |kind| ProbeEvent {
            timestamp: Local::now(),
            elapsed: stopwatch.snapshot().duration,
            kind,
        };

        callback(event(ProbeEventKind::RunStarted {
            mode: self.mode,
            cases: self.cases,
            profile_name: self.profile_name.clone(),
            batch_count,
        }))?;

        let mut case_index = 0;
        for (batch_index, batch) in self.mode.batches(cases).enumerate() {
            debug!(
                "starting batch {}/{batch_count} ({} cases)",
                batch_index + 1,
                batch.len()
            );
            callback(event(ProbeEventKind::BatchStarted {
                index: batch_index,
                total: batch_count,
                size: batch.len(),
            }))?;

            let results = match self.mode {
                RunMode::Race { width } => {
                    // A race batch is exactly one case.
                    let mut results = Vec::with_capacity(batch.len());
                    for case in batch {
                        results.push(execute_group(self.client, case, width.get()).await);
                    }
                    results
                }
                RunMode::Load { .. } => execute_load_batch(self.client, batch).await,
            };

            for result in results {
                run_stats.on_case_finished(&result);
                callback(event(ProbeEventKind::CaseFinished {
                    index: case_index,
                    total: cases.len(),
                    result,
                }))?;
                case_index += 1;
            }
        }

        Ok(())
    }
}

/// Sends a single notification and waits for its response.
pub fn send_single<C: NotificationClient>(
    client: &C,
    request: &NotificationRequest,
) -> Result<SubmitResponse, SendError> {
    let runtime = build_runtime().map_err(SendError::TokioRuntimeCreate)?;
    runtime
        .block_on(client.submit(request))
        .map_err(SendError::Transport)
}

fn build_runtime() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
}
