// Copyright (c) The dedup-probe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tabular export of validation records.

use super::aggregator::ValidationRecord;
use crate::{errors::ReportWriteError, runner::RunMode};
use atomicwrites::{AllowOverwrite, AtomicFile};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Local};
use std::io::Write;
use tracing::info;

/// The name of the sheet that results are written to.
pub const SHEET_NAME: &str = "Resultados";

/// A single column of a tabular export.
#[derive(Clone, Copy)]
pub struct Column<T> {
    /// The column's header.
    pub header: &'static str,

    /// Renders a row's value for this column.
    pub extract: fn(&T) -> String,
}

impl<T> std::fmt::Debug for Column<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

/// Describes one exported table.
#[derive(Clone, Copy, Debug)]
pub struct ExportSpec<'a, T> {
    /// The file name prefix; a timestamp and extension are appended.
    pub base_name: &'a str,

    /// The name of the sheet the rows belong to.
    pub sheet_name: &'a str,

    /// The columns, in order.
    pub columns: &'a [Column<T>],
}

impl<'a> ExportSpec<'a, ValidationRecord> {
    /// Returns the export used for a run mode.
    pub fn for_mode(mode: RunMode) -> Self {
        match mode {
            RunMode::Race { .. } => Self {
                base_name: "resultados_notificaciones_whatsapp",
                sheet_name: SHEET_NAME,
                columns: RECORD_COLUMNS,
            },
            RunMode::Load { .. } => Self {
                base_name: "resultados_notificaciones_no_validas_whatsapp",
                sheet_name: SHEET_NAME,
                columns: &RECORD_COLUMNS[..9],
            },
        }
    }
}

/// Every column a validation record can be exported with.
pub static RECORD_COLUMNS: &[Column<ValidationRecord>] = &[
    Column {
        header: "CELULAR",
        extract: |record| record.phone.clone(),
    },
    Column {
        header: "ID GESTION",
        extract: |record| record.management_id.to_string(),
    },
    Column {
        header: "TIPO",
        extract: |record| record.notification_type.to_string(),
    },
    Column {
        header: "RESULTADO ESPERADO",
        extract: |record| record.expected.error_flag().to_string(),
    },
    Column {
        header: "RESULTADO OBTENIDO",
        extract: |record| record.obtained_error_flag.to_string(),
    },
    Column {
        header: "ES CORRECTO?",
        extract: |record| yes_no(record.correct),
    },
    Column {
        header: "STATUS ESPERADO",
        extract: |record| {
            record
                .expected_status
                .map(|status| status.to_string())
                .unwrap_or_default()
        },
    },
    Column {
        header: "STATUS OBTENIDO",
        extract: |record| record.obtained_status.to_string(),
    },
    Column {
        header: "MENSAJE ERROR",
        extract: |record| record.message.clone().unwrap_or_default(),
    },
    Column {
        header: "HORA",
        extract: |record| record.launched_at.format("%H:%M:%S").to_string(),
    },
    Column {
        header: "NUM REQUEST",
        extract: |record| (record.request_index + 1).to_string(),
    },
    Column {
        header: "SE ENVIÓ?",
        extract: |record| yes_no(record.delivered),
    },
];

fn yes_no(value: bool) -> String {
    if value { "Sí" } else { "No" }.to_owned()
}

/// Writes timestamped tables into a report directory.
#[derive(Clone, Debug)]
pub struct ReportExporter {
    dir: Utf8PathBuf,
}

impl ReportExporter {
    /// Creates a new exporter that writes into `dir`. The directory is created on first export.
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the path of a report file named after `base_name` and `timestamp`.
    pub fn report_path(
        &self,
        base_name: &str,
        timestamp: DateTime<Local>,
        extension: &str,
    ) -> Utf8PathBuf {
        self.dir.join(format!(
            "{base_name}_{}.{extension}",
            timestamp.format("%Y%m%d_%H%M%S")
        ))
    }

    /// Writes `rows` as CSV, returning the path written to.
    pub fn export<T>(
        &self,
        spec: &ExportSpec<'_, T>,
        rows: &[T],
        timestamp: DateTime<Local>,
    ) -> Result<Utf8PathBuf, ReportWriteError> {
        let path = self.report_path(spec.base_name, timestamp, "csv");

        let csv_err = |error: csv::Error| ReportWriteError::Csv {
            path: path.clone(),
            error,
        };
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(spec.columns.iter().map(|column| column.header))
            .map_err(csv_err)?;
        for row in rows {
            writer
                .write_record(spec.columns.iter().map(|column| (column.extract)(row)))
                .map_err(csv_err)?;
        }
        let contents = writer
            .into_inner()
            .map_err(|error| csv_err(error.into_error().into()))?;

        self.write_file(&path, &contents)?;
        info!(
            "exported {} rows of sheet `{}` to {path}",
            rows.len(),
            spec.sheet_name
        );
        Ok(path)
    }

    pub(super) fn write_file(
        &self,
        path: &Utf8Path,
        contents: &[u8],
    ) -> Result<(), ReportWriteError> {
        std::fs::create_dir_all(&self.dir).map_err(|error| ReportWriteError::CreateDir {
            dir: self.dir.clone(),
            error,
        })?;
        AtomicFile::new(path, AllowOverwrite)
            .write(|file| file.write_all(contents))
            .map_err(|error| ReportWriteError::Write {
                path: path.to_owned(),
                error,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{case_source::CaseValue, config::PositiveCount};
    use camino_tempfile::Utf8TempDir;
    use chrono::TimeZone;
    use dedup_probe_metadata::Outcome;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn timestamp() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2025, 3, 14, 9, 26, 53)
            .single()
            .expect("unambiguous local time")
    }

    fn record(request_index: usize, delivered: bool) -> ValidationRecord {
        ValidationRecord {
            phone: "926208479".to_owned(),
            management_id: CaseValue::Number(160864065),
            notification_type: CaseValue::Text("recordatorio".to_owned()),
            expected: Outcome::Accepted,
            obtained_error_flag: !delivered,
            correct: true,
            expected_status: Some(200),
            obtained_status: 200,
            message: (!delivered).then(|| "ya enviado, con coma".to_owned()),
            request_index,
            delivered,
            launched_at: timestamp(),
        }
    }

    #[test]
    fn race_export() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let exporter = ReportExporter::new(dir.path().join("nested/reports"));
        let spec = ExportSpec::for_mode(RunMode::Race {
            width: PositiveCount::new(2).expect("2 is positive"),
        });

        let path = exporter
            .export(&spec, &[record(0, true), record(1, false)], timestamp())
            .expect("export succeeds");
        assert_eq!(
            path,
            dir.path()
                .join("nested/reports/resultados_notificaciones_whatsapp_20250314_092653.csv")
        );

        let contents = std::fs::read_to_string(&path).expect("report is readable");
        assert_eq!(
            contents,
            indoc! {"
                CELULAR,ID GESTION,TIPO,RESULTADO ESPERADO,RESULTADO OBTENIDO,ES CORRECTO?,STATUS ESPERADO,STATUS OBTENIDO,MENSAJE ERROR,HORA,NUM REQUEST,SE ENVIÓ?
                926208479,160864065,recordatorio,false,false,Sí,200,200,,09:26:53,1,Sí
                926208479,160864065,recordatorio,false,true,Sí,200,200,\"ya enviado, con coma\",09:26:53,2,No
            "}
        );
    }

    #[test]
    fn load_export_has_nine_columns() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let exporter = ReportExporter::new(dir.path());
        let spec = ExportSpec::for_mode(RunMode::Load {
            batch_size: PositiveCount::new(40).expect("40 is positive"),
        });
        assert_eq!(spec.columns.len(), 9);
        assert_eq!(spec.columns[8].header, "MENSAJE ERROR");

        let path = exporter
            .export(&spec, &[record(0, true)], timestamp())
            .expect("export succeeds");
        assert_eq!(
            path.file_name(),
            Some("resultados_notificaciones_no_validas_whatsapp_20250314_092653.csv")
        );

        // Exporting again into the existing directory overwrites the same file.
        exporter
            .export(&spec, &[], timestamp())
            .expect("second export succeeds");
        let contents = std::fs::read_to_string(&path).expect("report is readable");
        assert_eq!(contents.lines().count(), 1, "only the header remains");
    }
}
