// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Accumulating per-request validation records and checking them against declared totals.

use crate::{
    case_source::{CaseList, CaseValue},
    classify::OutcomeCounts,
    errors::AggregateMismatch,
    reporter::events::{ProbeEvent, ProbeEventKind},
    runner::{GroupResult, RunMode},
};
use chrono::{DateTime, Local};
use dedup_probe_metadata::{CountCheckSummary, Outcome, RunSummary, RunSummaryReport};
use std::{collections::BTreeMap, time::Duration};

/// The status a race-mode submission is expected to come back with.
const RACE_EXPECTED_STATUS: u16 = 200;

/// One row of the validation report: a single submission and how it was judged.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidationRecord {
    /// The phone number submitted.
    pub phone: String,

    /// The management ID submitted.
    pub management_id: CaseValue,

    /// The notification type submitted.
    pub notification_type: CaseValue,

    /// The outcome the case declared.
    pub expected: Outcome,

    /// The `error` flag obtained.
    pub obtained_error_flag: bool,

    /// Whether this submission's outcome was correct for its role in the case.
    pub correct: bool,

    /// The HTTP status expected, if any.
    pub expected_status: Option<u16>,

    /// The HTTP status obtained, or 0 for a transport failure.
    pub obtained_status: u16,

    /// The message carried by the response, if any.
    pub message: Option<String>,

    /// The 0-based position of the submission within its case.
    pub request_index: usize,

    /// Whether this submission delivered the notification.
    pub delivered: bool,

    /// The wall-clock time the case's submissions were launched.
    pub launched_at: DateTime<Local>,
}

/// The verdict for a single case.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CaseVerdict {
    /// The 1-based data row of the case.
    pub row: usize,

    /// The phone number submitted.
    pub phone: String,

    /// The management ID submitted.
    pub management_id: CaseValue,

    /// The outcome the case declared.
    pub expected: Outcome,

    /// Whether the case passed.
    pub verdict: bool,

    /// The distribution of the case's outcomes.
    pub counts: OutcomeCounts,

    /// The wall-clock time the case's submissions were launched.
    pub launched_at: DateTime<Local>,
}

/// Accumulates the results of a run.
///
/// Counts are additive and independent of the order cases finish in; records are kept in the
/// order they were received.
#[derive(Clone, Debug)]
pub struct ResultAggregator {
    mode: RunMode,
    records: Vec<ValidationRecord>,
    verdicts: Vec<CaseVerdict>,
    summary: RunSummary,
    // Obtained statuses, for cases that declare a status.
    obtained_statuses: BTreeMap<u16, usize>,
    start_time: Option<DateTime<Local>>,
    elapsed: Duration,
}

impl ResultAggregator {
    /// Creates a new, empty aggregator.
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            records: Vec::new(),
            verdicts: Vec::new(),
            summary: RunSummary::default(),
            obtained_statuses: BTreeMap::new(),
            start_time: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Records a probe event.
    pub fn write_event(&mut self, event: &ProbeEvent<'_>) {
        match &event.kind {
            ProbeEventKind::RunStarted { .. } | ProbeEventKind::BatchStarted { .. } => {}
            ProbeEventKind::CaseFinished { result, .. } => self.record(result),
            ProbeEventKind::RunFinished {
                start_time,
                elapsed,
                ..
            } => {
                self.start_time = Some(*start_time);
                self.elapsed = *elapsed;
            }
        }
    }

    /// Records the result of a case, flattening it into one record per submission.
    pub fn record(&mut self, result: &GroupResult<'_>) {
        let case = result.case;
        let expected_status = match self.mode {
            RunMode::Race { .. } => Some(case.expected_status.unwrap_or(RACE_EXPECTED_STATUS)),
            RunMode::Load { .. } => case.expected_status,
        };

        for (outcome, &correct) in result.outcomes.iter().zip(&result.classification.correct) {
            self.records.push(ValidationRecord {
                phone: case.phone.clone(),
                management_id: case.management_id.clone(),
                notification_type: case.notification_type.clone(),
                expected: case.expected,
                obtained_error_flag: outcome.error_flag,
                correct,
                expected_status,
                obtained_status: outcome.status,
                message: outcome.message.clone(),
                request_index: outcome.request_index,
                delivered: outcome.is_delivered(),
                launched_at: result.launched_at,
            });

            if case.expected_status.is_some() {
                *self.obtained_statuses.entry(outcome.status).or_default() += 1;
            }
        }

        let counts = result.classification.counts;
        self.summary.total_cases += 1;
        self.summary.total_requests += counts.total();
        self.summary.success_count += counts.delivered;
        self.summary.rejected_count += counts.flagged();
        if result.verdict() {
            self.summary.cases_passed += 1;
        }

        self.verdicts.push(CaseVerdict {
            row: case.row,
            phone: case.phone.clone(),
            management_id: case.management_id.clone(),
            expected: case.expected,
            verdict: result.verdict(),
            counts,
            launched_at: result.launched_at,
        });
    }

    /// Returns the mode of the run.
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Returns every record, in the order received.
    pub fn records(&self) -> &[ValidationRecord] {
        &self.records
    }

    /// Returns the verdict of every case, in the order received.
    pub fn verdicts(&self) -> &[CaseVerdict] {
        &self.verdicts
    }

    /// Returns global counts.
    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Returns the time the run started, once it has finished.
    pub fn start_time(&self) -> Option<DateTime<Local>> {
        self.start_time
    }

    /// Returns how long the run took, once it has finished.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Compares the obtained counts against the totals the case source declares.
    pub fn checks(&self, cases: &CaseList) -> Vec<CountCheckSummary> {
        let check = |name: String, declared: usize, obtained: usize| CountCheckSummary {
            name,
            declared,
            obtained,
        };

        let mut checks = vec![check(
            "delivered requests".to_owned(),
            cases.expected_accepted(),
            self.summary.success_count,
        )];

        if let RunMode::Load { .. } = self.mode {
            checks.push(check(
                "flagged requests".to_owned(),
                cases.expected_rejected(),
                self.summary.rejected_count,
            ));

            let declared = cases.declared_status_counts();
            let mut statuses: Vec<u16> = declared
                .keys()
                .chain(self.obtained_statuses.keys())
                .copied()
                .collect();
            statuses.sort_unstable();
            statuses.dedup();
            for status in statuses {
                checks.push(check(
                    format!("status {status} responses"),
                    declared.get(&status).copied().unwrap_or_default(),
                    self.obtained_statuses
                        .get(&status)
                        .copied()
                        .unwrap_or_default(),
                ));
            }
        }

        checks.push(check(
            "cases passed".to_owned(),
            cases.len(),
            self.summary.cases_passed,
        ));
        checks
    }

    /// Returns an error listing every check that failed.
    pub fn verify(&self, cases: &CaseList) -> Result<(), AggregateMismatch> {
        let mismatches: Vec<_> = self
            .checks(cases)
            .into_iter()
            .filter(|check| !check.is_match())
            .collect();
        if mismatches.is_empty() {
            Ok(())
        } else {
            Err(AggregateMismatch::new(mismatches))
        }
    }

    /// Produces the serializable report for this run.
    pub fn to_report(&self, cases: &CaseList) -> RunSummaryReport {
        RunSummaryReport {
            mode: self.mode.probe_mode(),
            requests_per_case: self.mode.requests_per_case(),
            summary: self.summary,
            checks: self.checks(cases),
            elapsed_ms: u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        case_source::TestCase,
        classify::{RequestOutcome, classify_group, classify_load},
        config::PositiveCount,
        test_helpers::case,
    };
    use pretty_assertions::assert_eq;

    fn race_mode() -> RunMode {
        RunMode::Race {
            width: PositiveCount::new(3).expect("3 is positive"),
        }
    }

    fn load_mode() -> RunMode {
        RunMode::Load {
            batch_size: PositiveCount::new(40).expect("40 is positive"),
        }
    }

    fn group<'a>(case: &'a TestCase, statuses: &[(u16, bool)]) -> GroupResult<'a> {
        let outcomes: Vec<_> = statuses
            .iter()
            .enumerate()
            .map(|(request_index, &(status, error_flag))| RequestOutcome {
                request_index,
                status,
                error_flag,
                message: None,
            })
            .collect();
        let classification = if outcomes.len() == 1 {
            classify_load(&outcomes[0], case.expected)
        } else {
            classify_group(&outcomes, case.expected)
        };
        GroupResult {
            case,
            outcomes,
            classification,
            launched_at: Local::now(),
        }
    }

    #[test]
    fn race_scenario() {
        let accepted = case(1, 160864065, Outcome::Accepted);
        let rejected = case(2, 160864066, Outcome::Rejected);
        let cases = CaseList::new("cases.csv", vec![accepted.clone(), rejected.clone()]);

        let mut aggregator = ResultAggregator::new(race_mode());
        aggregator.record(&group(&accepted, &[(200, false), (200, true), (200, true)]));
        aggregator.record(&group(&rejected, &[(200, true), (400, true), (200, true)]));

        assert_eq!(
            aggregator.summary(),
            RunSummary {
                total_cases: 2,
                total_requests: 6,
                success_count: 1,
                rejected_count: 5,
                cases_passed: 2,
            }
        );
        assert_eq!(aggregator.records().len(), 6);
        assert!(aggregator.records().iter().all(|record| record.correct));
        assert_eq!(
            aggregator
                .records()
                .iter()
                .map(|record| record.expected_status)
                .collect::<Vec<_>>(),
            vec![Some(200); 6]
        );
        aggregator.verify(&cases).expect("totals match");

        let report = aggregator.to_report(&cases);
        assert!(report.is_success());
        assert_eq!(
            report.summary.total_requests,
            report.summary.total_cases * report.requests_per_case
        );
    }

    #[test]
    fn race_double_delivery_is_a_mismatch() {
        let accepted = case(1, 160864065, Outcome::Accepted);
        let cases = CaseList::new("cases.csv", vec![accepted.clone()]);

        let mut aggregator = ResultAggregator::new(race_mode());
        aggregator.record(&group(&accepted, &[(200, false), (200, false), (200, true)]));

        assert_eq!(aggregator.summary().cases_passed, 0);
        let error = aggregator.verify(&cases).expect_err("two deliveries");
        assert_eq!(
            error.mismatches(),
            &[
                CountCheckSummary {
                    name: "delivered requests".to_owned(),
                    declared: 1,
                    obtained: 2,
                },
                CountCheckSummary {
                    name: "cases passed".to_owned(),
                    declared: 1,
                    obtained: 0,
                },
            ]
        );
    }

    #[test]
    fn load_status_checks() {
        let mut sent = case(1, 1, Outcome::Accepted);
        sent.expected_status = Some(200);
        let mut invalid = case(2, 2, Outcome::Rejected);
        invalid.expected_status = Some(400);
        let undeclared = case(3, 3, Outcome::Rejected);
        let cases = CaseList::new(
            "cases.csv",
            vec![sent.clone(), invalid.clone(), undeclared.clone()],
        );

        let mut aggregator = ResultAggregator::new(load_mode());
        aggregator.record(&group(&sent, &[(200, false)]));
        // Flagged as expected, but with the wrong status.
        aggregator.record(&group(&invalid, &[(500, true)]));
        aggregator.record(&group(&undeclared, &[(200, true)]));

        assert_eq!(aggregator.summary().cases_passed, 3);
        let checks = aggregator.checks(&cases);
        let names: Vec<_> = checks.iter().map(|check| check.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "delivered requests",
                "flagged requests",
                "status 200 responses",
                "status 400 responses",
                "status 500 responses",
                "cases passed",
            ]
        );

        let error = aggregator.verify(&cases).expect_err("status mismatch");
        let failed: Vec<_> = error
            .mismatches()
            .iter()
            .map(|check| (check.name.as_str(), check.declared, check.obtained))
            .collect();
        assert_eq!(
            failed,
            vec![("status 400 responses", 1, 0), ("status 500 responses", 0, 1)]
        );
    }

    #[test]
    fn records_are_in_received_order() {
        let first = case(1, 1, Outcome::Rejected);
        let second = case(2, 2, Outcome::Rejected);

        let mut aggregator = ResultAggregator::new(load_mode());
        aggregator.record(&group(&second, &[(200, true)]));
        aggregator.record(&group(&first, &[(200, true)]));

        let rows: Vec<_> = aggregator.verdicts().iter().map(|verdict| verdict.row).collect();
        assert_eq!(rows, vec![2, 1]);
    }
}
