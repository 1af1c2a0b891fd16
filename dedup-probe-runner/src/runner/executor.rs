// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Issuing submissions concurrently.
//!
//! Every submission in a race group or a load batch is created up front and driven by a single
//! join barrier, so no submission waits on another one before it is sent. A submission that fails
//! in transport turns into a synthetic flagged outcome and never hides its siblings.

use crate::{
    case_source::TestCase,
    classify::{GroupClassification, RequestOutcome, classify_group, classify_load},
    client::{NotificationClient, NotificationRequest, SubmitResponse},
};
use chrono::{DateTime, Local};
use futures::future::join_all;
use tracing::{debug, warn};

/// The result of executing one case: its outcomes, and how they were classified.
#[derive(Clone, Debug)]
pub struct GroupResult<'a> {
    /// The case that was executed.
    pub case: &'a TestCase,

    /// One outcome per submission, in submission order.
    pub outcomes: Vec<RequestOutcome>,

    /// The classification of the outcomes against the case's expectation.
    pub classification: GroupClassification,

    /// The wall-clock time the case's submissions were launched.
    pub launched_at: DateTime<Local>,
}

impl GroupResult<'_> {
    /// Returns true if the case passed.
    pub fn verdict(&self) -> bool {
        self.classification.verdict
    }
}

/// Fires `width` identical submissions for a case at once, and classifies the outcomes.
///
/// Always returns exactly `width` outcomes.
pub async fn execute_group<'a, C: NotificationClient>(
    client: &C,
    case: &'a TestCase,
    width: usize,
) -> GroupResult<'a> {
    let request = NotificationRequest::for_case(case);
    let launched_at = Local::now();
    debug!(
        "launching {width} submissions for management ID {}",
        case.management_id
    );

    let submissions =
        (0..width).map(|request_index| submit_one(client, &request, request_index));
    let outcomes = join_all(submissions).await;

    let classification = classify_group(&outcomes, case.expected);
    GroupResult {
        case,
        outcomes,
        classification,
        launched_at,
    }
}

/// Fires one submission per case across a whole batch at once, and classifies each outcome.
///
/// Returns one result per case, in batch order.
pub async fn execute_load_batch<'a, C: NotificationClient>(
    client: &C,
    batch: &'a [TestCase],
) -> Vec<GroupResult<'a>> {
    let launched_at = Local::now();
    let submissions = batch.iter().map(|case| async move {
        let request = NotificationRequest::for_case(case);
        let outcome = submit_one(client, &request, 0).await;
        let classification = classify_load(&outcome, case.expected);
        GroupResult {
            case,
            outcomes: vec![outcome],
            classification,
            launched_at,
        }
    });
    join_all(submissions).await
}

async fn submit_one<C: NotificationClient>(
    client: &C,
    request: &NotificationRequest,
    request_index: usize,
) -> RequestOutcome {
    match client.submit(request).await {
        Ok(response) => RequestOutcome::from_response(request_index, response),
        Err(error) => {
            warn!(
                request_index,
                timed_out = error.is_timeout(),
                "submission for management ID {} failed: {error}",
                request.management_id,
            );
            RequestOutcome::from_response(request_index, SubmitResponse::transport_failure())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{BarrierClient, DedupServer, FlakyClient, case};
    use dedup_probe_metadata::Outcome;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[tokio::test]
    async fn race_group_has_one_winner() {
        let client = DedupServer::default();
        let case = case(1, 160864065, Outcome::Accepted);

        let result = execute_group(&client, &case, 3).await;
        assert_eq!(result.outcomes.len(), 3);
        assert_eq!(
            result
                .outcomes
                .iter()
                .map(|outcome| outcome.request_index)
                .collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(result.verdict());
        assert_eq!(result.classification.counts.delivered, 1);
        assert_eq!(result.classification.counts.duplicates, 2);
    }

    #[tokio::test]
    async fn submissions_are_simultaneous() {
        // The client only answers once `width` submissions are in flight at the same time.
        let client = BarrierClient::new(4);
        let case = case(1, 7, Outcome::Rejected);

        let result = tokio::time::timeout(Duration::from_secs(5), execute_group(&client, &case, 4))
            .await
            .expect("all four submissions were in flight together");
        assert_eq!(result.outcomes.len(), 4);
    }

    #[tokio::test]
    async fn load_batch_is_simultaneous() {
        let client = BarrierClient::new(3);
        let cases = [
            case(1, 1, Outcome::Rejected),
            case(2, 2, Outcome::Rejected),
            case(3, 3, Outcome::Rejected),
        ];

        let results =
            tokio::time::timeout(Duration::from_secs(5), execute_load_batch(&client, &cases))
                .await
                .expect("the whole batch was in flight together");
        assert_eq!(
            results.iter().map(|result| result.case.row).collect::<Vec<_>>(),
            vec![1, 2, 3],
            "results are in batch order"
        );
        assert!(results.iter().all(|result| result.outcomes.len() == 1));
        assert!(results.iter().all(GroupResult::verdict));
    }

    #[tokio::test]
    async fn transport_failure_is_recovered() {
        // The client's second call fails in transport.
        let client = FlakyClient::new([1]);
        let case = case(1, 99, Outcome::Accepted);

        let result = execute_group(&client, &case, 3).await;
        assert_eq!(result.outcomes.len(), 3, "one failure doesn't hide the others");

        let failed = &result.outcomes[1];
        assert_eq!(failed.status, 0);
        assert!(failed.error_flag);
        assert_eq!(failed.message.as_deref(), Some("transport failure"));
        assert!(!result.verdict());
    }
}
