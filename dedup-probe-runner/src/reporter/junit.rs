// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Code to generate JUnit XML reports from case verdicts.

use super::{
    aggregator::{CaseVerdict, ResultAggregator},
    export::{ExportSpec, ReportExporter},
};
use crate::errors::ReportWriteError;
use camino::Utf8PathBuf;
use chrono::Local;
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use tracing::info;

/// Writes a JUnit report for a finished run next to its tabular export.
///
/// The report has one test suite named after the sheet, and one test case per case.
pub fn write_junit(
    exporter: &ReportExporter,
    aggregator: &ResultAggregator,
) -> Result<Utf8PathBuf, ReportWriteError> {
    let spec = ExportSpec::for_mode(aggregator.mode());
    let start_time = aggregator.start_time().unwrap_or_else(Local::now);
    let path = exporter.report_path(spec.base_name, start_time, "xml");

    let mut suite = TestSuite::new(spec.sheet_name);
    suite.add_test_cases(aggregator.verdicts().iter().map(test_case_for));

    let mut report = Report::new("dedup-probe");
    report
        .set_timestamp(start_time)
        .set_time(aggregator.elapsed())
        .add_test_suite(suite);

    let xml = report.to_string().map_err(|error| ReportWriteError::Junit {
        path: path.clone(),
        error,
    })?;
    exporter.write_file(&path, xml.as_bytes())?;
    info!("wrote JUnit report to {path}");
    Ok(path)
}

fn test_case_for(verdict: &CaseVerdict) -> TestCase {
    let status = if verdict.verdict {
        TestCaseStatus::success()
    } else {
        let mut status = TestCaseStatus::non_success(NonSuccessKind::Failure);
        status
            .set_type("verdict")
            .set_message(format!("expected {}, obtained {}", verdict.expected, verdict.counts));
        status
    };

    let mut test_case = TestCase::new(
        format!("row {}: {}", verdict.row, verdict.management_id),
        status,
    );
    test_case
        .set_classname(verdict.phone.clone())
        .set_timestamp(verdict.launched_at);
    test_case
}
