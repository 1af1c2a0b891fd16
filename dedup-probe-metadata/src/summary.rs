// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome a case declares for its submissions.
///
/// The case source phrases this as an "error" flag: `error = false` means the notification was
/// actually sent.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// Exactly one submission is delivered (`error = false`).
    Accepted,

    /// Every submission is refused (`error = true`).
    Rejected,
}

impl Outcome {
    /// Returns the `error` flag this outcome corresponds to.
    pub fn error_flag(self) -> bool {
        match self {
            Self::Accepted => false,
            Self::Rejected => true,
        }
    }

    /// Returns the outcome corresponding to an `error` flag.
    pub fn from_error_flag(error: bool) -> Self {
        if error { Self::Rejected } else { Self::Accepted }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// How a probe run submits requests.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeMode {
    /// Every case is a race group of simultaneous duplicate submissions.
    Race,

    /// Cases are sliced into batches, one submission per case, each batch fired concurrently.
    Load,
}

impl fmt::Display for ProbeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Race => write!(f, "race"),
            Self::Load => write!(f, "load"),
        }
    }
}

/// Global counts for a probe run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunSummary {
    /// The number of cases executed.
    pub total_cases: usize,

    /// The number of requests submitted, including ones that failed in transport.
    pub total_requests: usize,

    /// The number of requests that were delivered: status 200 with `error = false`.
    pub success_count: usize,

    /// The number of requests that came back flagged, whatever their status.
    pub rejected_count: usize,

    /// The number of cases whose verdict was a pass.
    pub cases_passed: usize,
}

impl RunSummary {
    /// Returns the number of cases whose verdict was a failure.
    pub fn cases_failed(&self) -> usize {
        self.total_cases - self.cases_passed
    }
}

/// A single comparison between a count declared by the case source and the count a run obtained.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CountCheckSummary {
    /// What is being counted.
    pub name: String,

    /// The count derived from the case source.
    pub declared: usize,

    /// The count obtained from the run.
    pub obtained: usize,
}

impl CountCheckSummary {
    /// Returns true if the declared and obtained counts agree.
    pub fn is_match(&self) -> bool {
        self.declared == self.obtained
    }
}

/// The final, serializable report of a probe run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunSummaryReport {
    /// The mode the run executed in.
    pub mode: ProbeMode,

    /// Requests issued per case: the race width in race mode, 1 in load mode.
    pub requests_per_case: usize,

    /// Global counts.
    pub summary: RunSummary,

    /// Every count cross-check performed at the end of the run.
    pub checks: Vec<CountCheckSummary>,

    /// Wall-clock duration of the run in milliseconds.
    pub elapsed_ms: u64,
}

impl RunSummaryReport {
    /// Returns true if every case passed and every count check matched.
    pub fn is_success(&self) -> bool {
        self.summary.cases_failed() == 0 && self.checks.iter().all(|check| check.is_match())
    }
}

/// A serializable view of one case read from the case source.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CaseSummary {
    /// The 1-based data row the case was read from.
    pub row: usize,

    /// The phone number submitted.
    pub phone: String,

    /// The management ID submitted, as sent over the wire.
    pub management_id: serde_json::Value,

    /// The notification type submitted, as sent over the wire.
    pub notification_type: serde_json::Value,

    /// The declared outcome.
    pub expected: Outcome,

    /// The declared HTTP status, if the case source has one.
    pub expected_status: Option<u16>,
}

/// A serializable view of a case source, as printed by `dedup-probe list`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CaseListSummary {
    /// The number of cases expected to be accepted.
    pub expected_accepted: usize,

    /// The number of cases expected to be rejected.
    pub expected_rejected: usize,

    /// The number of rows whose expectation could not be parsed and defaulted to accepted.
    pub malformed_expectations: usize,

    /// The cases, in source order.
    pub cases: Vec<CaseSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(Outcome::Accepted, false; "accepted is not flagged")]
    #[test_case(Outcome::Rejected, true; "rejected is flagged")]
    fn outcome_error_flag(outcome: Outcome, flag: bool) {
        assert_eq!(outcome.error_flag(), flag);
        assert_eq!(Outcome::from_error_flag(flag), outcome);
    }

    #[test]
    fn report_success() {
        let mut report = RunSummaryReport {
            mode: ProbeMode::Race,
            requests_per_case: 3,
            summary: RunSummary {
                total_cases: 2,
                total_requests: 6,
                success_count: 1,
                rejected_count: 5,
                cases_passed: 2,
            },
            checks: vec![CountCheckSummary {
                name: "delivered".to_owned(),
                declared: 1,
                obtained: 1,
            }],
            elapsed_ms: 10,
        };
        assert!(report.is_success(), "all passed and counts match");

        report.checks[0].obtained = 2;
        assert!(!report.is_success(), "count mismatch => failure");

        report.checks[0].obtained = 1;
        report.summary.cases_passed = 1;
        assert!(!report.is_success(), "failed case => failure");
    }

    #[test]
    fn report_serializes_kebab_case() {
        let summary = RunSummary {
            total_cases: 1,
            total_requests: 3,
            success_count: 1,
            rejected_count: 2,
            cases_passed: 1,
        };
        let json = serde_json::to_value(summary).expect("serialization succeeds");
        assert_eq!(json["total-requests"], 3);
        assert_eq!(json["cases-passed"], 1);
    }
}
