// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reading test cases from a tabular case file.
//!
//! A case file is a CSV file with a header row naming the columns `CELULAR`, `IDGESTION`, `TIPO`
//! and `VALORESPERADO`, plus an optional `STATUS` column. Cells are loosely typed: `null`,
//! `undefined` and empty cells are all read as empty strings, and the expectation is matched
//! case-insensitively against a fixed lookup table.

use crate::errors::CaseSourceError;
use camino::{Utf8Path, Utf8PathBuf};
use dedup_probe_metadata::{CaseListSummary, CaseSummary, Outcome};
use serde::Serialize;
use std::{collections::BTreeMap, fmt, io};
use tracing::warn;

const PHONE_COLUMN: &str = "CELULAR";
const MANAGEMENT_ID_COLUMN: &str = "IDGESTION";
const NOTIFICATION_TYPE_COLUMN: &str = "TIPO";
const EXPECTATION_COLUMN: &str = "VALORESPERADO";
const STATUS_COLUMN: &str = "STATUS";

/// Maps a lowercased expectation cell to the outcome it declares.
///
/// The column holds the expected value of the API's `error` flag.
static EXPECTATIONS: &[(&str, Outcome)] = &[
    ("true", Outcome::Rejected),
    ("verdadero", Outcome::Rejected),
    ("false", Outcome::Accepted),
    ("falso", Outcome::Accepted),
];

/// Parses an expectation cell, returning `None` if it isn't in the lookup table.
pub fn parse_expectation(raw: &str) -> Option<Outcome> {
    let raw = raw.trim().to_lowercase();
    EXPECTATIONS
        .iter()
        .find(|(key, _)| *key == raw)
        .map(|(_, outcome)| *outcome)
}

/// A cell value sent over the wire as-is: integers stay integers, everything else is a string.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CaseValue {
    /// An integer cell.
    Number(i64),

    /// Any other cell, including empty ones.
    Text(String),
}

impl CaseValue {
    /// Interprets a cell: integers stay integers, and `null` or `undefined` cells are empty.
    pub fn from_cell(cell: &str) -> Self {
        let cell = normalize_cell(cell);
        match cell.parse::<i64>() {
            Ok(number) => Self::Number(number),
            Err(_) => Self::Text(cell.to_owned()),
        }
    }

    /// Returns this value as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Number(number) => (*number).into(),
            Self::Text(text) => text.as_str().into(),
        }
    }
}

impl fmt::Display for CaseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(number) => write!(f, "{number}"),
            Self::Text(text) => write!(f, "{text}"),
        }
    }
}

/// A single test case: one notification and the outcome its submissions should produce.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestCase {
    /// The 1-based data row this case was read from.
    pub row: usize,

    /// The phone number the notification is sent to.
    pub phone: String,

    /// The management (job) ID.
    pub management_id: CaseValue,

    /// The notification type.
    pub notification_type: CaseValue,

    /// The declared outcome.
    pub expected: Outcome,

    /// The declared HTTP status, if the case file has a `STATUS` column and the cell isn't empty.
    pub expected_status: Option<u16>,
}

impl TestCase {
    /// Returns a serializable summary of this case.
    pub fn to_summary(&self) -> CaseSummary {
        CaseSummary {
            row: self.row,
            phone: self.phone.clone(),
            management_id: self.management_id.to_json(),
            notification_type: self.notification_type.to_json(),
            expected: self.expected,
            expected_status: self.expected_status,
        }
    }
}

/// An ordered list of test cases, along with totals declared by the case file.
#[derive(Clone, Debug)]
pub struct CaseList {
    path: Utf8PathBuf,
    cases: Vec<TestCase>,
    malformed_expectations: usize,
}

impl CaseList {
    /// Reads a case list from a CSV file.
    pub fn from_path(path: impl Into<Utf8PathBuf>) -> Result<Self, CaseSourceError> {
        let path = path.into();
        let reader = reader_builder()
            .from_path(&path)
            .map_err(|error| CaseSourceError::Open {
                path: path.clone(),
                error,
            })?;
        Self::from_csv(path, reader)
    }

    /// Reads a case list from CSV data. `path` is used for diagnostics only.
    pub fn from_reader(
        path: impl Into<Utf8PathBuf>,
        reader: impl io::Read,
    ) -> Result<Self, CaseSourceError> {
        let reader = reader_builder().from_reader(reader);
        Self::from_csv(path.into(), reader)
    }

    /// Creates a case list out of already-parsed cases.
    pub fn new(path: impl Into<Utf8PathBuf>, cases: Vec<TestCase>) -> Self {
        Self {
            path: path.into(),
            cases,
            malformed_expectations: 0,
        }
    }

    fn from_csv<R: io::Read>(
        path: Utf8PathBuf,
        mut reader: csv::Reader<R>,
    ) -> Result<Self, CaseSourceError> {
        let headers = reader
            .headers()
            .map_err(|error| CaseSourceError::Read {
                path: path.clone(),
                row: 0,
                error,
            })?
            .clone();
        let columns = Columns::new(&path, &headers)?;

        let mut cases = Vec::new();
        let mut malformed_expectations = 0;
        for (idx, record) in reader.records().enumerate() {
            let row = idx + 1;
            let record = record.map_err(|error| CaseSourceError::Read {
                path: path.clone(),
                row,
                error,
            })?;
            // Spreadsheet exports often end with rows of empty cells.
            if record.iter().all(|cell| normalize_cell(cell).is_empty()) {
                continue;
            }

            let cell = |idx: usize| normalize_cell(record.get(idx).unwrap_or_default());

            let management_id = CaseValue::from_cell(cell(columns.management_id));
            let raw_expectation = cell(columns.expectation);
            let expected = match parse_expectation(raw_expectation) {
                Some(outcome) => outcome,
                None => {
                    warn!(
                        "row {row}: unexpected {EXPECTATION_COLUMN} value `{raw_expectation}` \
                         for management ID {management_id}, assuming the notification is accepted"
                    );
                    malformed_expectations += 1;
                    Outcome::Accepted
                }
            };

            let expected_status = match columns.status.map(cell) {
                None | Some("") => None,
                Some(value) => {
                    let status = parse_status(value);
                    if status.is_none() {
                        warn!(
                            "row {row}: unexpected {STATUS_COLUMN} value `{value}` \
                             for management ID {management_id}, treating the status as undeclared"
                        );
                    }
                    status
                }
            };

            cases.push(TestCase {
                row,
                phone: cell(columns.phone).to_owned(),
                management_id,
                notification_type: CaseValue::from_cell(cell(columns.notification_type)),
                expected,
                expected_status,
            });
        }

        Ok(Self {
            path,
            cases,
            malformed_expectations,
        })
    }

    /// Returns the path the cases were read from.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the cases, in source order.
    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    /// Returns the number of cases.
    pub fn len(&self) -> usize {
        self.cases.len()
    }

    /// Returns true if there are no cases.
    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Returns the number of rows whose expectation wasn't recognized.
    pub fn malformed_expectations(&self) -> usize {
        self.malformed_expectations
    }

    /// Returns the number of cases declared as accepted.
    pub fn expected_accepted(&self) -> usize {
        self.cases
            .iter()
            .filter(|case| case.expected == Outcome::Accepted)
            .count()
    }

    /// Returns the number of cases declared as rejected.
    pub fn expected_rejected(&self) -> usize {
        self.cases.len() - self.expected_accepted()
    }

    /// Returns the number of cases declaring each HTTP status.
    pub fn declared_status_counts(&self) -> BTreeMap<u16, usize> {
        let mut counts = BTreeMap::new();
        for status in self.cases.iter().filter_map(|case| case.expected_status) {
            *counts.entry(status).or_default() += 1;
        }
        counts
    }

    /// Returns a serializable summary of this list.
    pub fn to_summary(&self) -> CaseListSummary {
        CaseListSummary {
            expected_accepted: self.expected_accepted(),
            expected_rejected: self.expected_rejected(),
            malformed_expectations: self.malformed_expectations,
            cases: self.cases.iter().map(TestCase::to_summary).collect(),
        }
    }
}

struct Columns {
    phone: usize,
    management_id: usize,
    notification_type: usize,
    expectation: usize,
    status: Option<usize>,
}

impl Columns {
    fn new(path: &Utf8Path, headers: &csv::StringRecord) -> Result<Self, CaseSourceError> {
        let find = |column: &str| {
            headers
                .iter()
                .position(|header| header.eq_ignore_ascii_case(column))
        };
        let require = |column: &'static str| {
            find(column).ok_or_else(|| CaseSourceError::MissingColumn {
                path: path.to_owned(),
                column,
            })
        };

        Ok(Self {
            phone: require(PHONE_COLUMN)?,
            management_id: require(MANAGEMENT_ID_COLUMN)?,
            notification_type: require(NOTIFICATION_TYPE_COLUMN)?,
            expectation: require(EXPECTATION_COLUMN)?,
            status: find(STATUS_COLUMN),
        })
    }
}

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.has_headers(true).flexible(true).trim(csv::Trim::All);
    builder
}

/// Parses a status cell. Spreadsheet exports may write integers as `400.0`.
fn parse_status(cell: &str) -> Option<u16> {
    cell.parse::<u16>().ok().or_else(|| {
        let value = cell.parse::<f64>().ok()?;
        (value.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(&value))
            .then_some(value as u16)
    })
}

fn normalize_cell(cell: &str) -> &str {
    let cell = cell.trim();
    if cell.eq_ignore_ascii_case("null") || cell.eq_ignore_ascii_case("undefined") {
        ""
    } else {
        cell
    }
}
