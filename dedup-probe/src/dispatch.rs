// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::Result,
    output::{OutputContext, OutputOpts, OutputWriter},
};
use camino::Utf8PathBuf;
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dedup_probe_metadata::ProbeMode;
use dedup_probe_runner::{
    case_source::{CaseList, CaseValue},
    client::{ClientSettings, HttpNotificationClient, NotificationRequest},
    config::{PositiveCount, ProbeConfig, ProbeProfile},
    reporter::{ExportSpec, ProbeReporterBuilder, ReportExporter, write_junit},
    runner::{ProbeRunnerBuilder, send_single},
};
use std::{io::Write, time::Duration};
use tracing::info;

/// Validates how a notification-dispatch endpoint handles duplicate submissions.
///
/// Race mode fires simultaneous identical submissions for every case and checks that exactly one
/// of them is delivered. Load mode submits every case once, a batch at a time, and checks each
/// outcome against its expectation.
#[derive(Debug, Parser)]
#[command(version, name = "dedup-probe")]
pub struct DedupProbeApp {
    #[command(flatten)]
    output: OutputOpts,

    #[command(flatten)]
    config_opts: ConfigOpts,

    #[command(subcommand)]
    command: Command,
}

impl DedupProbeApp {
    /// Initializes logging and colors.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the exit code.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        match self.command {
            Command::Race {
                run_opts,
                race_width,
            } => {
                let mut builder = ProbeRunnerBuilder::default();
                if let Some(race_width) = race_width {
                    builder.set_race_width(race_width);
                }
                run_opts.exec(
                    ProbeMode::Race,
                    builder,
                    &self.config_opts,
                    output,
                    output_writer,
                )
            }
            Command::Load {
                run_opts,
                batch_size,
            } => {
                let mut builder = ProbeRunnerBuilder::default();
                if let Some(batch_size) = batch_size {
                    builder.set_batch_size(batch_size);
                }
                run_opts.exec(
                    ProbeMode::Load,
                    builder,
                    &self.config_opts,
                    output,
                    output_writer,
                )
            }
            Command::Send(send_opts) => send_opts.exec(&self.config_opts),
            Command::List {
                cases_opts,
                message_format,
            } => exec_list(&cases_opts, message_format, output_writer),
        }
    }
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: .config/dedup-probe.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// Configuration profile to use
    #[arg(
        long,
        short = 'P',
        global = true,
        value_name = "PROFILE",
        env = "DEDUP_PROBE_PROFILE"
    )]
    profile: Option<String>,
}

impl ConfigOpts {
    /// Reads the config layered on top of the defaults.
    fn make_config(&self) -> Result<ProbeConfig> {
        let current_dir =
            std::env::current_dir().map_err(|err| ExpectedError::CurrentDirInvalid { err })?;
        let root = Utf8PathBuf::try_from(current_dir)
            .map_err(|err| ExpectedError::CurrentDirNotUtf8 {
                path: err.into_path_buf(),
            })?;
        Ok(ProbeConfig::from_sources(
            root,
            self.config_file.as_deref(),
        )?)
    }

    fn profile_name(&self) -> &str {
        self.profile
            .as_deref()
            .unwrap_or(ProbeConfig::DEFAULT_PROFILE)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fire simultaneous duplicate submissions for every case
    ///
    /// Cases run one at a time. A case expected to be accepted passes if exactly one of its
    /// submissions is delivered and the rest are reported as duplicates; a case expected to be
    /// rejected passes if every submission is refused.
    Race {
        #[command(flatten)]
        run_opts: RunOpts,

        /// Number of simultaneous submissions per case [default: from profile]
        #[arg(long, value_name = "K", help_heading = "RUNNER OPTIONS")]
        race_width: Option<PositiveCount>,
    },

    /// Submit every case once, a batch at a time
    ///
    /// Every case in a batch is in flight at once, and each batch completes before the next one
    /// starts.
    Load {
        #[command(flatten)]
        run_opts: RunOpts,

        /// Number of cases per batch [default: from profile]
        #[arg(long, value_name = "N", help_heading = "RUNNER OPTIONS")]
        batch_size: Option<PositiveCount>,
    },

    /// Submit a single notification
    ///
    /// Succeeds if the notification is delivered: status 200 with `error` false.
    Send(SendOpts),

    /// List the cases in a case file without submitting anything
    List {
        #[command(flatten)]
        cases_opts: CasesOpts,

        /// Output format
        #[arg(short = 'T', long, value_enum, default_value_t, value_name = "FMT")]
        message_format: MessageFormat,
    },
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
enum MessageFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
}

#[derive(Debug, Args)]
struct CasesOpts {
    /// Case file, a CSV with CELULAR, IDGESTION, TIPO and VALORESPERADO columns
    #[arg(long, value_name = "FILE")]
    cases: Utf8PathBuf,
}

impl CasesOpts {
    fn read(&self) -> Result<CaseList> {
        let cases = CaseList::from_path(&self.cases)?;
        if cases.malformed_expectations() > 0 {
            info!(
                "{} rows of {} have unreadable expectations and are expected to be accepted",
                cases.malformed_expectations(),
                self.cases,
            );
        }
        Ok(cases)
    }
}

#[derive(Debug, Args)]
struct EndpointOpts {
    /// Base URL of the notification API [default: from profile]
    #[arg(long, value_name = "URL", env = "DEDUP_PROBE_BASE_URL")]
    base_url: Option<String>,
}

impl EndpointOpts {
    fn make_client(&self, profile: &ProbeProfile<'_>) -> Result<HttpNotificationClient> {
        let settings = ClientSettings::from_profile(profile, self.base_url.as_deref())?;
        Ok(HttpNotificationClient::new(&settings)?)
    }
}

#[derive(Debug, Args)]
struct RunOpts {
    #[command(flatten)]
    cases_opts: CasesOpts,

    #[command(flatten)]
    endpoint_opts: EndpointOpts,

    /// Cut the whole run off after this long [default: from profile]
    #[arg(
        long,
        value_name = "DURATION",
        value_parser = humantime::parse_duration,
        help_heading = "RUNNER OPTIONS"
    )]
    global_timeout: Option<Duration>,

    /// Do not write report files
    #[arg(long, help_heading = "REPORTER OPTIONS")]
    no_export: bool,

    /// Format of the summary printed to stdout once the run is done
    #[arg(
        long,
        value_enum,
        default_value_t,
        value_name = "FMT",
        help_heading = "REPORTER OPTIONS"
    )]
    message_format: MessageFormat,
}

impl RunOpts {
    fn exec(
        self,
        mode: ProbeMode,
        mut builder: ProbeRunnerBuilder,
        config_opts: &ConfigOpts,
        output: OutputContext,
        output_writer: &mut OutputWriter,
    ) -> Result<i32> {
        let config = config_opts.make_config()?;
        let profile = config.profile(config_opts.profile_name())?;

        let cases = self.cases_opts.read()?;
        if cases.is_empty() {
            return Err(ExpectedError::NoCases {
                path: self.cases_opts.cases,
            });
        }

        let client = self.endpoint_opts.make_client(&profile)?;
        if let Some(global_timeout) = self.global_timeout {
            builder.set_global_timeout(global_timeout);
        }
        let runner = builder.build(mode, &cases, &profile, &client)?;
        info!(
            "probing {} in {}, cut off after {}",
            client.endpoint(),
            runner.mode(),
            humantime::format_duration(runner.global_timeout()),
        );

        let mut reporter = ProbeReporterBuilder::default()
            .set_colorize(output.color.should_colorize(supports_color::Stream::Stderr))
            .set_verbose(output.verbose)
            .build(runner.mode(), output_writer.reporter_output());
        let res = runner.try_execute(|event| reporter.report_event(event));
        let aggregator = reporter.finish();

        // Partial results are exported too, so that a run that hit its global timeout can still
        // be inspected.
        if !self.no_export && !aggregator.records().is_empty() {
            let exporter = ReportExporter::new(profile.report_dir());
            let timestamp = aggregator.start_time().unwrap_or_else(Local::now);
            exporter.export(
                &ExportSpec::for_mode(aggregator.mode()),
                aggregator.records(),
                timestamp,
            )?;
            if profile.junit_enabled() {
                write_junit(&exporter, &aggregator)?;
            }
        }

        if self.message_format == MessageFormat::Json {
            let mut writer = output_writer.stdout_writer();
            serde_json::to_writer_pretty(&mut writer, &aggregator.to_report(&cases))
                .map_err(|err| ExpectedError::SerializeOutput { err })?;
            writeln!(writer).map_err(|err| ExpectedError::WriteOutput { err })?;
            writer
                .flush()
                .map_err(|err| ExpectedError::WriteOutput { err })?;
        }

        res.map_err(ExpectedError::execute_error)?;
        aggregator
            .verify(&cases)
            .map_err(|err| ExpectedError::ProbeRunFailed { err })?;
        Ok(0)
    }
}

#[derive(Debug, Args)]
struct SendOpts {
    /// Phone number to notify
    #[arg(long)]
    phone: String,

    /// Management (job) ID
    #[arg(long, value_name = "ID")]
    management_id: String,

    /// Notification type
    #[arg(long, value_name = "TYPE")]
    notification_type: String,

    #[command(flatten)]
    endpoint_opts: EndpointOpts,
}

impl SendOpts {
    fn exec(self, config_opts: &ConfigOpts) -> Result<i32> {
        let config = config_opts.make_config()?;
        let profile = config.profile(config_opts.profile_name())?;
        let client = self.endpoint_opts.make_client(&profile)?;

        let request = NotificationRequest {
            phone: self.phone,
            management_id: CaseValue::from_cell(&self.management_id),
            notification_type: CaseValue::from_cell(&self.notification_type),
        };
        let response = send_single(&client, &request)?;
        if response.is_delivered() {
            info!(
                "notification delivered to {}{}",
                request.phone,
                response
                    .message
                    .map(|message| format!(": {message}"))
                    .unwrap_or_default(),
            );
            Ok(0)
        } else {
            Err(ExpectedError::NotDelivered {
                status: response.status,
                error_flag: response.error_flag,
                message: response.message,
            })
        }
    }
}

fn exec_list(
    cases_opts: &CasesOpts,
    message_format: MessageFormat,
    output_writer: &mut OutputWriter,
) -> Result<i32> {
    let cases = cases_opts.read()?;
    let mut writer = output_writer.stdout_writer();

    match message_format {
        MessageFormat::Human => write_human_list(&cases, &mut writer),
        MessageFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, &cases.to_summary())
                .map_err(|err| ExpectedError::SerializeOutput { err })?;
            writeln!(writer)
        }
    }
    .and_then(|()| writer.flush())
    .map_err(|err| ExpectedError::WriteOutput { err })?;

    Ok(0)
}

fn write_human_list(cases: &CaseList, writer: &mut dyn Write) -> std::io::Result<()> {
    writeln!(
        writer,
        "{}: {} cases ({} expected accepted, {} expected rejected)",
        cases.path(),
        cases.len(),
        cases.expected_accepted(),
        cases.expected_rejected(),
    )?;
    for case in cases.cases() {
        write!(
            writer,
            "    row {}: management ID {}, phone {}, type {}, expected {}",
            case.row, case.management_id, case.phone, case.notification_type, case.expected,
        )?;
        if let Some(status) = case.expected_status {
            write!(writer, ", status {status}")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}
