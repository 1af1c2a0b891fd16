// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Human-readable progress and results, written to standard error.

use super::events::{ProbeEvent, ProbeEventKind, RunStats};
use crate::{errors::WriteEventError, runner::GroupResult};
use dedup_probe_metadata::CountCheckSummary;
use owo_colors::{OwoColorize, Style};
use std::io::{self, BufWriter, Write};

/// Standard error destination for the reporter.
///
/// This is usually a terminal, but can be an in-memory buffer for tests.
pub enum ReporterStderr<'a> {
    /// Produce output on the (possibly piped) terminal.
    Terminal,

    /// Write output to a buffer.
    Buffer(&'a mut Vec<u8>),
}

pub(super) struct DisplayReporter<'a> {
    styles: Styles,
    verbose: bool,
    stderr: ReporterStderr<'a>,
}

impl<'a> DisplayReporter<'a> {
    pub(super) fn new(should_colorize: bool, verbose: bool, stderr: ReporterStderr<'a>) -> Self {
        let mut styles = Styles::default();
        if should_colorize {
            styles.colorize();
        }
        Self {
            styles,
            verbose,
            stderr,
        }
    }

    pub(super) fn write_event(&mut self, event: &ProbeEvent<'_>) -> Result<(), WriteEventError> {
        with_writer(&mut self.stderr, |writer| {
            write_event_impl(&self.styles, self.verbose, event, writer)
        })
    }

    pub(super) fn write_checks(
        &mut self,
        checks: &[CountCheckSummary],
    ) -> Result<(), WriteEventError> {
        with_writer(&mut self.stderr, |writer| {
            write_checks_impl(&self.styles, checks, writer)
        })
    }
}

fn with_writer(
    stderr: &mut ReporterStderr<'_>,
    f: impl FnOnce(&mut dyn Write) -> io::Result<()>,
) -> Result<(), WriteEventError> {
    match stderr {
        ReporterStderr::Terminal => {
            let mut writer = BufWriter::new(io::stderr());
            f(&mut writer).map_err(WriteEventError::Io)?;
            writer.flush().map_err(WriteEventError::Io)
        }
        ReporterStderr::Buffer(buf) => f(*buf).map_err(WriteEventError::Io),
    }
}

fn write_event_impl(
    styles: &Styles,
    verbose: bool,
    event: &ProbeEvent<'_>,
    writer: &mut dyn Write,
) -> io::Result<()> {
    match &event.kind {
        ProbeEventKind::RunStarted {
            mode,
            cases,
            profile_name,
            batch_count: _,
        } => {
            writeln!(writer, "{}", HBAR)?;
            write!(writer, "{:>12} ", "Probe run".style(styles.pass))?;
            writeln!(
                writer,
                "with profile: {}",
                profile_name.style(styles.count)
            )?;

            write!(writer, "{:>12} ", "Starting".style(styles.pass))?;
            write!(
                writer,
                "{} {} from {} ({mode})",
                cases.len().style(styles.count),
                cases_str(cases.len()),
                cases.path(),
            )?;
            if cases.malformed_expectations() > 0 {
                write!(
                    writer,
                    ", {} with unreadable expectations",
                    cases.malformed_expectations().style(styles.skip),
                )?;
            }
            writeln!(writer)?;
        }
        ProbeEventKind::BatchStarted { index, total, size } => {
            // A race batch is a single case, which already gets a status line.
            if *total > 1 && *size > 1 {
                write!(writer, "{:>12} ", "Batch".style(styles.pass))?;
                writeln!(
                    writer,
                    "{}/{} ({} {})",
                    (index + 1).style(styles.count),
                    total.style(styles.count),
                    size.style(styles.count),
                    cases_str(*size),
                )?;
            }
        }
        ProbeEventKind::CaseFinished {
            index,
            total,
            result,
        } => {
            write_case_line(styles, *index, *total, event, result, writer)?;
            if verbose || !result.verdict() {
                write_outcome_lines(styles, result, writer)?;
            }
        }
        ProbeEventKind::RunFinished {
            start_time: _,
            elapsed,
            run_stats,
            timed_out,
        } => {
            let summary_style = if run_stats.is_success() {
                styles.pass
            } else {
                styles.fail
            };
            write!(
                writer,
                "{HBAR}\n{:>12} ",
                "Summary".style(summary_style)
            )?;

            // * > means right-align.
            // * 8 is the number of characters to pad to.
            // * .3 means print three digits after the decimal point.
            write!(writer, "[{:>8.3?}s] ", elapsed.as_secs_f64())?;

            write!(writer, "{}", run_stats.finished_cases.style(styles.count))?;
            if run_stats.finished_cases != run_stats.initial_cases {
                write!(writer, "/{}", run_stats.initial_cases.style(styles.count))?;
            }
            writeln!(
                writer,
                " {} run: {}",
                cases_str(run_stats.initial_cases),
                SummaryStr {
                    styles,
                    run_stats,
                    timed_out: *timed_out,
                },
            )?;
        }
    }

    Ok(())
}

fn write_case_line(
    styles: &Styles,
    index: usize,
    total: usize,
    event: &ProbeEvent<'_>,
    result: &GroupResult<'_>,
    writer: &mut dyn Write,
) -> io::Result<()> {
    if result.verdict() {
        write!(writer, "{:>12} ", "PASS".style(styles.pass))?;
    } else {
        write!(writer, "{:>12} ", "FAIL".style(styles.fail))?;
    }

    let width = total.to_string().len();
    write!(
        writer,
        "[{:>width$}/{total}] [{:>8.3?}s] ",
        index + 1,
        event.elapsed.as_secs_f64(),
    )?;

    let case = result.case;
    writeln!(
        writer,
        "{} {}: {}",
        case.management_id.style(styles.count),
        format!("(row {}, expected {})", case.row, case.expected).style(styles.dim),
        result.classification.counts,
    )
}

fn write_outcome_lines(
    styles: &Styles,
    result: &GroupResult<'_>,
    writer: &mut dyn Write,
) -> io::Result<()> {
    let outcomes = result.outcomes.iter().zip(&result.classification.correct);
    for (pos, (outcome, &correct)) in outcomes.enumerate() {
        let marker = if correct {
            "ok".style(styles.pass_output)
        } else {
            "wrong".style(styles.fail_output)
        };
        write!(
            writer,
            "{:>12}   request {}: status {}, error {} [{marker}]",
            "",
            outcome.request_index + 1,
            outcome.status.style(styles.count),
            outcome.error_flag,
        )?;
        if result.classification.winner == Some(pos) {
            write!(writer, " {}", "winner".style(styles.pass))?;
        }
        if let Some(message) = &outcome.message {
            write!(writer, " {}", message.style(styles.dim))?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

fn write_checks_impl(
    styles: &Styles,
    checks: &[CountCheckSummary],
    writer: &mut dyn Write,
) -> io::Result<()> {
    for check in checks {
        if check.is_match() {
            write!(writer, "{:>12} ", "MATCH".style(styles.pass))?;
        } else {
            write!(writer, "{:>12} ", "MISMATCH".style(styles.fail))?;
        }
        writeln!(
            writer,
            "{}: declared {}, obtained {}",
            check.name,
            check.declared.style(styles.count),
            check.obtained.style(styles.count),
        )?;
    }
    Ok(())
}

struct SummaryStr<'a> {
    styles: &'a Styles,
    run_stats: &'a RunStats,
    timed_out: bool,
}

impl std::fmt::Display for SummaryStr<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            styles,
            run_stats,
            timed_out,
        } = self;
        write!(
            f,
            "{} {}",
            run_stats.passed_cases.style(styles.count),
            "passed".style(styles.pass),
        )?;
        if run_stats.failed_cases() > 0 {
            write!(
                f,
                ", {} {}",
                run_stats.failed_cases().style(styles.count),
                "failed".style(styles.fail),
            )?;
        }
        if *timed_out {
            write!(f, ", {}", "timed out".style(styles.fail))?;
        }
        Ok(())
    }
}

const HBAR: &str = "------------";

fn cases_str(count: usize) -> &'static str {
    if count == 1 { "case" } else { "cases" }
}

#[derive(Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    dim: Style,
    pass_output: Style,
    fail_output: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.dim = Style::new().dimmed();
        self.pass_output = Style::new().green();
        self.fail_output = Style::new().magenta();
    }
}
