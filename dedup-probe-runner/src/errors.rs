// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by dedup-probe.

use camino::Utf8PathBuf;
use config::ConfigError;
use dedup_probe_metadata::CountCheckSummary;
use itertools::Itertools;
use std::{fmt, time::Duration};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse dedup-probe config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// An error that occurred while parsing a width or batch size.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct PositiveCountParseError {
    message: String,
}

impl PositiveCountParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An error which indicates that a profile was requested but not known to dedup-probe.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }

    /// Returns the profile that wasn't found.
    pub fn profile(&self) -> &str {
        &self.profile
    }
}

/// An error that occurred while reading cases from a case file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CaseSourceError {
    /// The case file could not be opened.
    #[error("failed to open case file `{path}`")]
    Open {
        /// The case file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: csv::Error,
    },

    /// A row or the header of the case file could not be read.
    #[error("failed to read row {row} of case file `{path}`")]
    Read {
        /// The case file.
        path: Utf8PathBuf,

        /// The 1-based data row, or 0 for the header.
        row: usize,

        /// The underlying error.
        #[source]
        error: csv::Error,
    },

    /// A required column was missing from the header.
    #[error("case file `{path}` is missing required column `{column}`")]
    MissingColumn {
        /// The case file.
        path: Utf8PathBuf,

        /// The missing column.
        column: &'static str,
    },
}

/// An error that occurred while constructing the HTTP notification client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientBuildError {
    /// No base URL was provided by the profile, the command line or the environment.
    #[error("no base URL configured for profile `{profile}`")]
    MissingBaseUrl {
        /// The profile in use.
        profile: String,
    },

    /// The endpoint URL was invalid.
    #[error("invalid endpoint URL `{url}`: {message}")]
    InvalidUrl {
        /// The URL.
        url: String,

        /// Why it was rejected.
        message: String,
    },

    /// The API key could not be used as a header value.
    #[error("API key read from `{env_var}` is not a valid header value")]
    InvalidApiKey {
        /// The environment variable the key was read from.
        env_var: String,

        /// The underlying error.
        #[source]
        error: reqwest::header::InvalidHeaderValue,
    },

    /// The underlying HTTP client could not be built.
    #[error("failed to build HTTP client")]
    Http(#[source] reqwest::Error),
}

/// A single submission could not complete at the transport level.
///
/// The executor never propagates this error: it becomes a flagged, synthetic outcome.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<reqwest::Error>,
}

impl TransportError {
    /// Creates a new transport error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn http(error: reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            "request timed out".to_owned()
        } else if error.is_connect() {
            "connection failed".to_owned()
        } else {
            "request failed".to_owned()
        };
        Self {
            message,
            source: Some(error),
        }
    }

    /// Returns true if this error was caused by a timeout.
    pub fn is_timeout(&self) -> bool {
        self.source.as_ref().is_some_and(|error| error.is_timeout())
    }
}

/// An error that occurred while creating a probe runner.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProbeRunnerBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),
}

/// An error that occurred while sending a single notification.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SendError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),

    /// The submission failed in transport.
    #[error("submission failed")]
    Transport(#[source] TransportError),
}

/// An error that ended a probe run before every case completed.
#[derive(Debug, Error)]
pub enum ProbeRunnerExecuteError {
    /// The run did not complete within its global timeout.
    #[error(
        "run exceeded its global timeout of {} after {completed_cases} of {total_cases} cases",
        humantime::format_duration(*.timeout)
    )]
    GlobalTimeout {
        /// The configured timeout.
        timeout: Duration,

        /// The number of cases that completed before the cutoff.
        completed_cases: usize,

        /// The number of cases in the run.
        total_cases: usize,
    },

    /// Reporting a run event failed.
    #[error("error reporting run events")]
    Report(#[source] WriteEventError),
}

/// The counts obtained by a run disagreed with the counts declared by the case source.
#[derive(Clone, Debug, Error)]
pub struct AggregateMismatch {
    mismatches: Vec<CountCheckSummary>,
}

impl AggregateMismatch {
    pub(crate) fn new(mismatches: Vec<CountCheckSummary>) -> Self {
        Self { mismatches }
    }

    /// Returns the failed checks.
    pub fn mismatches(&self) -> &[CountCheckSummary] {
        &self.mismatches
    }
}

impl fmt::Display for AggregateMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "aggregate counts do not match declared totals: {}",
            self.mismatches
                .iter()
                .map(|check| format!(
                    "{} (declared {}, obtained {})",
                    check.name, check.declared, check.obtained
                ))
                .join("; ")
        )
    }
}

/// An error that occurred while writing a report file.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportWriteError {
    /// The report directory could not be created.
    #[error("failed to create report directory `{dir}`")]
    CreateDir {
        /// The directory.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A row could not be serialized.
    #[error("failed to serialize report rows for `{path}`")]
    Csv {
        /// The report file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: csv::Error,
    },

    /// The JUnit report could not be serialized.
    #[error("failed to serialize JUnit report for `{path}`")]
    Junit {
        /// The report file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: quick_junit::SerializeError,
    },

    /// The report file could not be written.
    #[error("failed to write report file `{path}`")]
    Write {
        /// The report file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: atomicwrites::Error<std::io::Error>,
    },
}

/// An error that occurred while writing run events to the console.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while writing the event to the provided output.
    #[error("error writing to output")]
    Io(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_mismatch_display() {
        let error = AggregateMismatch::new(vec![
            CountCheckSummary {
                name: "delivered requests".to_owned(),
                declared: 4,
                obtained: 5,
            },
            CountCheckSummary {
                name: "cases passed".to_owned(),
                declared: 10,
                obtained: 9,
            },
        ]);
        assert_eq!(
            error.to_string(),
            "aggregate counts do not match declared totals: \
             delivered requests (declared 4, obtained 5); cases passed (declared 10, obtained 9)"
        );
    }

    #[test]
    fn profile_not_found_sorts_profiles() {
        let error = ProfileNotFound::new("nightly", ["default", "ci"]);
        assert_eq!(
            error.to_string(),
            "profile `nightly` not found (known profiles: ci, default)"
        );
    }
}
