// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classifying request outcomes against a declared expectation.
//!
//! A status of 200 means a call reached the business layer; any other status is an error outcome
//! no matter what the body says. A race group expected to be accepted must produce exactly one
//! delivered outcome (status 200, not flagged), with every other outcome a status 200 duplicate.
//! A race group expected to be rejected must come back flagged across the board.
//!
//! Everything here is a pure function of its inputs.

use crate::client::SubmitResponse;
use dedup_probe_metadata::Outcome;
use std::fmt;

/// The outcome of a single submission.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RequestOutcome {
    /// The position of this submission within its group, in submission order. Diagnostic only.
    pub request_index: usize,

    /// The HTTP status, or 0 if the submission failed in transport.
    pub status: u16,

    /// The `error` flag.
    pub error_flag: bool,

    /// The message carried by the response, if any.
    pub message: Option<String>,
}

impl RequestOutcome {
    /// Creates an outcome out of a response.
    pub fn from_response(request_index: usize, response: SubmitResponse) -> Self {
        Self {
            request_index,
            status: response.status,
            error_flag: response.error_flag,
            message: response.message,
        }
    }

    /// Returns true if this outcome delivered the notification.
    pub fn is_delivered(&self) -> bool {
        self.status == 200 && !self.error_flag
    }

    /// Returns true if this outcome is a duplicate refused by the business layer.
    pub fn is_duplicate(&self) -> bool {
        self.status == 200 && self.error_flag
    }
}

/// How a group's outcomes are distributed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OutcomeCounts {
    /// Status 200, not flagged.
    pub delivered: usize,

    /// Status 200, flagged.
    pub duplicates: usize,

    /// Any other status, including transport failures.
    pub errors: usize,
}

impl OutcomeCounts {
    /// Counts a list of outcomes.
    pub fn new<'a>(outcomes: impl IntoIterator<Item = &'a RequestOutcome>) -> Self {
        let mut counts = Self::default();
        for outcome in outcomes {
            if outcome.is_delivered() {
                counts.delivered += 1;
            } else if outcome.is_duplicate() {
                counts.duplicates += 1;
            } else {
                counts.errors += 1;
            }
        }
        counts
    }

    /// Returns the total number of outcomes counted.
    pub fn total(&self) -> usize {
        self.delivered + self.duplicates + self.errors
    }

    /// Returns the number of flagged outcomes.
    pub fn flagged(&self) -> usize {
        self.duplicates + self.errors
    }
}

impl fmt::Display for OutcomeCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} delivered, {} duplicate, {} error",
            self.delivered, self.duplicates, self.errors
        )
    }
}

/// The result of classifying a race group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupClassification {
    /// True if the group's distribution matches its expectation.
    pub verdict: bool,

    /// Per-outcome correctness, in the same order as the classified outcomes.
    pub correct: Vec<bool>,

    /// The position of the outcome counted as the one delivery, if any.
    pub winner: Option<usize>,

    /// The distribution of the group's outcomes.
    pub counts: OutcomeCounts,
}

/// Classifies the outcomes of a race group against its expected outcome.
///
/// The verdict is holistic. Per-outcome correctness follows each outcome's role:
///
/// * For a rejected group, an outcome is correct if it is flagged.
/// * For an accepted group, the delivered outcome with the lowest request index is the winner and
///   is correct. Further delivered outcomes are not. Status 200 duplicates are correct losers as
///   long as there is a winner, and non-200 outcomes are never correct.
pub fn classify_group(outcomes: &[RequestOutcome], expected: Outcome) -> GroupClassification {
    let counts = OutcomeCounts::new(outcomes);

    match expected {
        Outcome::Rejected => GroupClassification {
            verdict: outcomes.iter().all(|outcome| outcome.error_flag),
            correct: outcomes.iter().map(|outcome| outcome.error_flag).collect(),
            winner: None,
            counts,
        },
        Outcome::Accepted => {
            let winner = outcomes
                .iter()
                .enumerate()
                .filter(|(_, outcome)| outcome.is_delivered())
                .min_by_key(|(_, outcome)| outcome.request_index)
                .map(|(pos, _)| pos);
            let correct = outcomes
                .iter()
                .enumerate()
                .map(|(pos, outcome)| {
                    if outcome.is_delivered() {
                        winner == Some(pos)
                    } else {
                        outcome.is_duplicate() && winner.is_some()
                    }
                })
                .collect();

            GroupClassification {
                verdict: counts.delivered == 1 && counts.duplicates + 1 == outcomes.len(),
                correct,
                winner,
                counts,
            }
        }
    }
}

/// Classifies a single load-mode outcome: it is correct if its flag is the expected one.
pub fn classify_single(outcome: &RequestOutcome, expected: Outcome) -> bool {
    outcome.error_flag == expected.error_flag()
}

/// Classifies a load-mode case, which has exactly one outcome.
///
/// The verdict only looks at the flag; the status is compared in aggregate at the end of the run.
pub fn classify_load(outcome: &RequestOutcome, expected: Outcome) -> GroupClassification {
    let verdict = classify_single(outcome, expected);
    GroupClassification {
        verdict,
        correct: vec![verdict],
        winner: outcome.is_delivered().then_some(0),
        counts: OutcomeCounts::new([outcome]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;
    use test_strategy::proptest;

    fn outcomes(statuses: &[(u16, bool)]) -> Vec<RequestOutcome> {
        statuses
            .iter()
            .enumerate()
            .map(|(request_index, &(status, error_flag))| RequestOutcome {
                request_index,
                status,
                error_flag,
                message: None,
            })
            .collect()
    }

    #[test_case(
        &[(200, false), (200, true), (200, true)], Outcome::Accepted,
        true, &[true, true, true], Some(0)
        ; "accepted, one winner"
    )]
    #[test_case(
        &[(200, true), (200, true), (200, false)], Outcome::Accepted,
        true, &[true, true, true], Some(2)
        ; "accepted, winner last"
    )]
    #[test_case(
        &[(200, false), (200, false), (200, true)], Outcome::Accepted,
        false, &[true, false, true], Some(0)
        ; "accepted, duplicate delivery"
    )]
    #[test_case(
        &[(200, true), (200, true), (200, true)], Outcome::Accepted,
        false, &[false, false, false], None
        ; "accepted, nothing delivered"
    )]
    #[test_case(
        &[(200, false), (0, true), (200, true)], Outcome::Accepted,
        false, &[true, false, true], Some(0)
        ; "accepted, transport failure"
    )]
    #[test_case(
        &[(200, true), (400, true), (200, true)], Outcome::Rejected,
        true, &[true, true, true], None
        ; "rejected, mixed statuses"
    )]
    #[test_case(
        &[(200, true), (200, false), (200, true)], Outcome::Rejected,
        false, &[true, false, true], None
        ; "rejected, one delivered"
    )]
    fn classify_race_group(
        statuses: &[(u16, bool)],
        expected: Outcome,
        verdict: bool,
        correct: &[bool],
        winner: Option<usize>,
    ) {
        let classification = classify_group(&outcomes(statuses), expected);
        assert_eq!(classification.verdict, verdict, "verdict");
        assert_eq!(classification.correct, correct, "per-request correctness");
        assert_eq!(classification.winner, winner, "winner");
    }

    #[test]
    fn winner_is_lowest_request_index() {
        // Outcomes listed in completion order rather than submission order.
        let outcome = |request_index, error_flag| RequestOutcome {
            request_index,
            status: 200,
            error_flag,
            message: None,
        };
        let group = vec![outcome(2, false), outcome(1, true), outcome(0, false)];

        let classification = classify_group(&group, Outcome::Accepted);
        assert!(!classification.verdict, "two deliveries");
        assert_eq!(classification.winner, Some(2));
        assert_eq!(classification.correct, vec![false, true, true]);
    }

    #[test]
    fn counts() {
        let group = outcomes(&[(200, false), (200, true), (500, true), (0, true)]);
        let counts = OutcomeCounts::new(&group);
        assert_eq!(
            counts,
            OutcomeCounts {
                delivered: 1,
                duplicates: 1,
                errors: 2,
            }
        );
        assert_eq!(counts.total(), 4);
        assert_eq!(counts.flagged(), 3);
        assert_eq!(counts.to_string(), "1 delivered, 1 duplicate, 2 error");
    }

    #[test_case(200, false, Outcome::Accepted, true; "delivered as expected")]
    #[test_case(400, true, Outcome::Rejected, true; "refused as expected")]
    #[test_case(200, true, Outcome::Accepted, false; "unexpectedly refused")]
    #[test_case(200, false, Outcome::Rejected, false; "unexpectedly delivered")]
    fn classify_load_outcome(status: u16, error_flag: bool, expected: Outcome, correct: bool) {
        let outcome = RequestOutcome {
            request_index: 0,
            status,
            error_flag,
            message: None,
        };
        assert_eq!(classify_single(&outcome, expected), correct);

        let classification = classify_load(&outcome, expected);
        assert_eq!(classification.verdict, correct);
        assert_eq!(classification.correct, vec![correct]);
        assert_eq!(classification.counts.total(), 1);
    }

    fn arb_outcomes() -> impl Strategy<Value = Vec<RequestOutcome>> {
        prop::collection::vec(
            (prop::sample::select(vec![0u16, 200, 400, 500]), any::<bool>()),
            1..8,
        )
        .prop_map(|statuses| outcomes(&statuses))
    }

    #[proptest]
    fn classification_is_deterministic(
        #[strategy(arb_outcomes())] group: Vec<RequestOutcome>,
        rejected: bool,
    ) {
        let expected = Outcome::from_error_flag(rejected);
        let first = classify_group(&group, expected);
        let second = classify_group(&group.clone(), expected);
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.correct.len(), group.len());
        prop_assert_eq!(first.counts.total(), group.len());
    }

    #[proptest]
    fn passing_verdict_marks_every_request_correct(
        #[strategy(arb_outcomes())] group: Vec<RequestOutcome>,
        rejected: bool,
    ) {
        let classification = classify_group(&group, Outcome::from_error_flag(rejected));
        if classification.verdict {
            prop_assert!(classification.correct.iter().all(|&correct| correct));
        }
    }
}
