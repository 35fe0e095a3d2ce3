//! Survey rows in, effect tables out.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::rows::{FieldValue, SurveyRow};
use crate::types::AteResult;

#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to read delimited rows: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to parse JSON rows: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported row file '{0}'. Expected a .csv, .tsv, or .json extension.")]
    UnsupportedExtension(String),
}

/// How raw survey exports are cleaned on the way in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadOptions {
    /// Numeric sentinels (e.g. -9 for "refused") that mean the field was not answered.
    pub missing_codes: Vec<f64>,
}

impl LoadOptions {
    fn is_missing(&self, value: &FieldValue) -> bool {
        if value.is_blank() {
            return true;
        }
        value
            .as_number()
            .is_some_and(|n| self.missing_codes.iter().any(|code| (n - code).abs() < 1e-9))
    }

    fn clean(&self, mut row: SurveyRow) -> SurveyRow {
        row.retain(|_, value| !self.is_missing(value));
        row
    }
}

/// Loads survey rows from a delimited file (header row, one record per line)
/// or a JSON array of objects. Blank cells and missing codes are dropped, so
/// the engine sees those fields as absent.
pub fn load_rows(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Vec<SurveyRow>, IoError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let rows = match extension.as_str() {
        "csv" => read_delimited(path, b',', options)?,
        "tsv" | "txt" => read_delimited(path, b'\t', options)?,
        "json" => {
            let text = std::fs::read_to_string(path)?;
            let rows: Vec<SurveyRow> = serde_json::from_str(&text)?;
            rows.into_iter().map(|row| options.clean(row)).collect()
        }
        _ => return Err(IoError::UnsupportedExtension(path.display().to_string())),
    };

    log::info!("Loaded {} survey rows from {}", rows.len(), path.display());
    Ok(rows)
}

fn read_delimited(
    path: &Path,
    delimiter: u8,
    options: &LoadOptions,
) -> Result<Vec<SurveyRow>, IoError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: SurveyRow = headers
            .iter()
            .zip(record.iter())
            .map(|(field, cell)| (field.trim(), cell.trim()))
            .collect();
        rows.push(options.clean(row));
    }
    Ok(rows)
}

/// Output layout for a batch of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Tsv,
    Json,
}

/// Long-format table: one line per activity and outcome level. An invalid
/// activity gets a single line with `NA` in the level columns.
pub fn write_results_tsv<W: Write>(results: &[AteResult], writer: &mut W) -> io::Result<()> {
    writeln!(writer, "activity\tvalidity\tlevel\tlabel\tcontrol\ttreatment\tate")?;
    let mut control_buf = ryu::Buffer::new();
    let mut treatment_buf = ryu::Buffer::new();
    let mut ate_buf = ryu::Buffer::new();

    for result in results {
        if !result.is_valid {
            writeln!(writer, "{}\tinvalid\tNA\tNA\tNA\tNA\tNA", result.activity)?;
            continue;
        }
        for (index, label) in result.labels.iter().enumerate() {
            writeln!(
                writer,
                "{}\tvalid\t{}\t{}\t{}\t{}\t{}",
                result.activity,
                index + 1,
                label,
                control_buf.format(result.control[index]),
                treatment_buf.format(result.treatment[index]),
                ate_buf.format(result.ate[index]),
            )?;
        }
    }
    Ok(())
}

pub fn write_results_json<W: Write>(results: &[AteResult], writer: &mut W) -> Result<(), IoError> {
    #[derive(Serialize)]
    struct Report<'a> {
        results: &'a [AteResult],
        valid: usize,
        invalid: usize,
    }

    let valid = results.iter().filter(|r| r.is_valid).count();
    let report = Report {
        results,
        valid,
        invalid: results.len() - valid,
    };
    serde_json::to_writer_pretty(&mut *writer, &report)?;
    writeln!(writer)?;
    Ok(())
}

/// Writes to `path`, or to stdout when no path is given.
pub fn write_results(
    results: &[AteResult],
    path: Option<&Path>,
    format: OutputFormat,
) -> Result<(), IoError> {
    let mut writer: BufWriter<Box<dyn Write>> = match path {
        Some(path) => BufWriter::new(Box::new(File::create(path)?)),
        None => BufWriter::new(Box::new(io::stdout().lock())),
    };
    match format {
        OutputFormat::Tsv => write_results_tsv(results, &mut writer)?,
        OutputFormat::Json => write_results_json(results, &mut writer)?,
    }
    writer.flush()?;
    if let Some(path) = path {
        log::info!("Wrote {} results to {}", results.len(), path.display());
    }
    Ok(())
}
