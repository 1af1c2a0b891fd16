// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use dedup_probe_metadata::DedupProbeExitCode;
use dedup_probe_runner::errors::*;
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An expected error: bad input, a failed probe, or an unreachable endpoint. Each variant maps to a
/// documented exit code.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("current directory is invalid")]
    CurrentDirInvalid {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirNotUtf8 { path: std::path::PathBuf },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("profile not found")]
    ProfileNotFound {
        #[from]
        err: ProfileNotFound,
    },
    #[error("case source error")]
    CaseSourceError {
        #[from]
        err: CaseSourceError,
    },
    #[error("no cases in {path}")]
    NoCases { path: Utf8PathBuf },
    #[error("client build error")]
    ClientBuildError {
        #[from]
        err: ClientBuildError,
    },
    #[error("probe runner build error")]
    ProbeRunnerBuildError {
        #[from]
        err: ProbeRunnerBuildError,
    },
    #[error("send error")]
    SendError {
        #[from]
        err: SendError,
    },
    #[error("notification was not delivered")]
    NotDelivered {
        status: u16,
        error_flag: bool,
        message: Option<String>,
    },
    #[error("probe run failed")]
    ProbeRunFailed {
        #[source]
        err: AggregateMismatch,
    },
    #[error("global timeout")]
    GlobalTimeout {
        #[source]
        err: ProbeRunnerExecuteError,
    },
    #[error("error writing run events")]
    WriteEventError {
        #[source]
        err: WriteEventError,
    },
    #[error("report write error")]
    ReportWriteError {
        #[from]
        err: ReportWriteError,
    },
    #[error("error writing output")]
    WriteOutput {
        #[source]
        err: std::io::Error,
    },
    #[error("error serializing output")]
    SerializeOutput {
        #[source]
        err: serde_json::Error,
    },
}

impl ExpectedError {
    pub(crate) fn execute_error(err: ProbeRunnerExecuteError) -> Self {
        match err {
            ProbeRunnerExecuteError::Report(err) => Self::WriteEventError { err },
            err @ ProbeRunnerExecuteError::GlobalTimeout { .. } => Self::GlobalTimeout { err },
        }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirInvalid { .. }
            | Self::CurrentDirNotUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::ProfileNotFound { .. }
            | Self::CaseSourceError { .. }
            | Self::ClientBuildError { .. }
            | Self::ProbeRunnerBuildError { .. } => DedupProbeExitCode::SETUP_ERROR,
            Self::SendError { err } => match err {
                SendError::TokioRuntimeCreate(_) => DedupProbeExitCode::SETUP_ERROR,
                _ => DedupProbeExitCode::RUN_FAILED,
            },
            Self::NoCases { .. } => DedupProbeExitCode::NO_CASES,
            Self::NotDelivered { .. } | Self::ProbeRunFailed { .. } => {
                DedupProbeExitCode::RUN_FAILED
            }
            Self::GlobalTimeout { .. } => DedupProbeExitCode::GLOBAL_TIMEOUT,
            Self::WriteEventError { .. }
            | Self::ReportWriteError { .. }
            | Self::WriteOutput { .. }
            | Self::SerializeOutput { .. } => DedupProbeExitCode::WRITE_OUTPUT_ERROR,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::CurrentDirInvalid { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirNotUtf8 { path } => {
                error!(
                    "current directory `{}` is not valid UTF-8",
                    path.display().style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse dedup-probe config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::ProfileNotFound { err } => {
                error!("{err}");
                None
            }
            Self::CaseSourceError { err } => {
                error!("{err}");
                err.source()
            }
            Self::NoCases { path } => {
                error!("no cases found in `{}`", path.style(styles.bold));
                None
            }
            Self::ClientBuildError { err } => {
                error!("failed to set up the notification client");
                Some(err as &dyn Error)
            }
            Self::ProbeRunnerBuildError { err } => {
                error!("failed to build probe runner");
                Some(err as &dyn Error)
            }
            Self::SendError { err } => {
                error!("{err}");
                err.source()
            }
            Self::NotDelivered {
                status,
                error_flag,
                message,
            } => {
                error!(
                    "notification was not delivered: status {}, error {}{}",
                    status.style(styles.bold),
                    error_flag.style(styles.bold),
                    message
                        .as_ref()
                        .map(|message| format!(" ({message})"))
                        .unwrap_or_default(),
                );
                None
            }
            Self::ProbeRunFailed { err } => {
                error!("probe run failed");
                Some(err as &dyn Error)
            }
            Self::GlobalTimeout { err } => {
                error!("{err}");
                None
            }
            Self::WriteEventError { err } => {
                error!("failed to write event to output");
                Some(err as &dyn Error)
            }
            Self::ReportWriteError { err } => {
                error!("{err}");
                err.source()
            }
            Self::WriteOutput { err } => {
                error!("failed to write output");
                Some(err as &dyn Error)
            }
            Self::SerializeOutput { err } => {
                error!("failed to serialize output");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
