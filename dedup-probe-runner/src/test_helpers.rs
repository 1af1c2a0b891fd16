// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process notification clients for tests.

use crate::{
    case_source::{CaseValue, TestCase},
    client::{NotificationClient, NotificationRequest, SubmitResponse},
    errors::TransportError,
};
use dedup_probe_metadata::Outcome;
use std::{
    collections::{BTreeSet, HashSet},
    future::Future,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::Barrier;

pub(crate) fn case(row: usize, management_id: i64, expected: Outcome) -> TestCase {
    TestCase {
        row,
        phone: "926208479".to_owned(),
        management_id: CaseValue::Number(management_id),
        notification_type: CaseValue::Number(7),
        expected,
        expected_status: None,
    }
}

fn delivered() -> SubmitResponse {
    SubmitResponse {
        status: 200,
        error_flag: false,
        message: Some("notification sent".to_owned()),
    }
}

fn duplicate() -> SubmitResponse {
    SubmitResponse {
        status: 200,
        error_flag: true,
        message: Some("notification already sent".to_owned()),
    }
}

/// Behaves like a correct endpoint: the first submission for a management ID is delivered, every
/// later one is a duplicate. Management IDs in `invalid` are refused with a 400.
#[derive(Debug, Default)]
pub(crate) struct DedupServer {
    invalid: HashSet<i64>,
    seen: Mutex<HashSet<String>>,
}

impl DedupServer {
    pub(crate) fn with_invalid(invalid: impl IntoIterator<Item = i64>) -> Self {
        Self {
            invalid: invalid.into_iter().collect(),
            seen: Mutex::default(),
        }
    }

    fn respond(&self, request: &NotificationRequest) -> SubmitResponse {
        if let CaseValue::Number(id) = request.management_id {
            if self.invalid.contains(&id) {
                return SubmitResponse {
                    status: 400,
                    error_flag: true,
                    message: Some("invalid management ID".to_owned()),
                };
            }
        }
        let mut seen = self.seen.lock().expect("lock is not poisoned");
        if seen.insert(request.management_id.to_string()) {
            delivered()
        } else {
            duplicate()
        }
    }
}

impl NotificationClient for DedupServer {
    fn submit(
        &self,
        request: &NotificationRequest,
    ) -> impl Future<Output = Result<SubmitResponse, TransportError>> {
        // Decide at call time, so that call order decides the winner.
        let response = self.respond(request);
        async move { Ok(response) }
    }
}

/// Delivers every submission, duplicates included.
#[derive(Debug, Default)]
pub(crate) struct NoDedupServer;

impl NotificationClient for NoDedupServer {
    async fn submit(
        &self,
        _request: &NotificationRequest,
    ) -> Result<SubmitResponse, TransportError> {
        Ok(delivered())
    }
}

/// Refuses every submission, but only answers once `count` submissions are waiting at once.
#[derive(Debug)]
pub(crate) struct BarrierClient {
    barrier: Barrier,
}

impl BarrierClient {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            barrier: Barrier::new(count),
        }
    }
}

impl NotificationClient for BarrierClient {
    async fn submit(
        &self,
        _request: &NotificationRequest,
    ) -> Result<SubmitResponse, TransportError> {
        self.barrier.wait().await;
        Ok(duplicate())
    }
}

/// A [`DedupServer`] whose calls fail in transport when their 0-based call number is in `failing`.
#[derive(Debug)]
pub(crate) struct FlakyClient {
    failing: BTreeSet<usize>,
    calls: AtomicUsize,
    inner: DedupServer,
}

impl FlakyClient {
    pub(crate) fn new(failing: impl IntoIterator<Item = usize>) -> Self {
        Self {
            failing: failing.into_iter().collect(),
            calls: AtomicUsize::new(0),
            inner: DedupServer::default(),
        }
    }
}

impl NotificationClient for FlakyClient {
    fn submit(
        &self,
        request: &NotificationRequest,
    ) -> impl Future<Output = Result<SubmitResponse, TransportError>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let result = if self.failing.contains(&call) {
            Err(TransportError::new("connection reset"))
        } else {
            Ok(self.inner.respond(request))
        };
        async move { result }
    }
}

/// Never answers.
#[derive(Debug, Default)]
pub(crate) struct HangingClient;

impl NotificationClient for HangingClient {
    async fn submit(
        &self,
        _request: &NotificationRequest,
    ) -> Result<SubmitResponse, TransportError> {
        std::future::pending().await
    }
}

/// Delivers every submission after yielding to the runtime a few times, and tracks the largest
/// number of submissions in flight at once.
#[derive(Debug, Default)]
pub(crate) struct PeakInFlightClient {
    in_flight: AtomicUsize,
    pub(crate) peak: AtomicUsize,
    pub(crate) calls: AtomicUsize,
}

impl NotificationClient for PeakInFlightClient {
    async fn submit(
        &self,
        _request: &NotificationRequest,
    ) -> Result<SubmitResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(in_flight, Ordering::SeqCst);
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(delivered())
    }
}

/// Counts the submissions it receives, and delivers all of them.
#[derive(Debug, Default)]
pub(crate) struct CountingClient {
    pub(crate) calls: AtomicUsize,
}

impl NotificationClient for CountingClient {
    async fn submit(
        &self,
        _request: &NotificationRequest,
    ) -> Result<SubmitResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(delivered())
    }
}
