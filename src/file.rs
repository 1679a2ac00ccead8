use std::{
    collections::BTreeSet,
    io::{Cursor, Read, Write},
    path::{Path, PathBuf},
    str::FromStr,
};

use calamine::{Data, Reader, Xlsx};
use regex::Regex;
use rust_xlsxwriter::{Workbook, Worksheet};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    batch::Outcome,
    record::{RawRecord, REQUIRED_FIELDS},
    Config, Error,
};

/// Columns written first, in this order. Every other column follows sorted by name.
const PRIORITY_COLUMNS: [&str; 6] = [
    "coefficient",
    "std_error",
    "sample_size",
    "t_statistic",
    "p_value",
    "is_significant",
];

const SHEET_NAME: &str = "Results";

const DESCRIPTIONS: &[(&str, &str)] = &[
    ("coefficient", "Regression coefficient"),
    ("std_error", "Standard error"),
    ("sample_size", "Sample size"),
    ("t_statistic", "t statistic"),
    ("p_value", "Two-tailed p-value"),
    ("is_significant", "Significant"),
    ("alpha_used", "Significance level used"),
    ("significance_level", "Significance level given"),
    ("confidence_interval_lower", "Confidence interval lower bound"),
    ("confidence_interval_upper", "Confidence interval upper bound"),
    ("degrees_of_freedom", "Degrees of freedom"),
    ("margin_of_error", "Margin of error"),
    ("num_predictors", "Number of predictors"),
    ("regression_type", "Regression type given"),
    ("regression_type_used", "Regression type used"),
    ("error_kind", "Error kind"),
    ("error_message", "Error message"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Decimal places for real valued columns of text outputs.
    pub precision: usize,
    /// Add a description row below the header of text outputs.
    pub descriptions: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            precision: 6,
            descriptions: true,
        }
    }
}

impl From<&Config> for WriteOptions {
    fn from(config: &Config) -> Self {
        Self {
            precision: config.precision,
            descriptions: config.descriptions,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct File {
    path: PathBuf,
    file_type: FileType,
    gz: bool,
}

impl File {
    pub fn new(path: impl Into<PathBuf>, file_type: FileType, gz: bool) -> Self {
        Self {
            path: path.into(),
            file_type,
            gz,
        }
    }

    #[inline(always)]
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    #[inline(always)]
    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    #[inline(always)]
    pub fn gz(&self) -> bool {
        self.gz
    }

    /// Load every row of the file. A missing file or a missing required column aborts the
    /// whole load.
    #[tracing::instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read_records(&self) -> Result<Vec<RawRecord>, Error> {
        let file = std::fs::File::open(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::SourceNotFound(self.path.clone()),
            _ => Error::Io(e),
        })?;
        let records = if self.gz {
            let decoder = flate2::read::GzDecoder::new(file);
            self.read_from_reader(decoder)?
        } else {
            self.read_from_reader(file)?
        };
        info!("Read {} records", records.len());
        Ok(records)
    }

    pub fn read_from_reader(&self, mut reader: impl Read) -> Result<Vec<RawRecord>, Error> {
        let records: Vec<RawRecord> = match self.file_type {
            FileType::Csv => return Self::read_text_file(reader, b','),
            FileType::Tsv => return Self::read_text_file(reader, b'\t'),
            FileType::Txt => return Self::read_text_file(reader, b' '),
            FileType::Xlsx => {
                let mut bytes = vec![];
                reader.read_to_end(&mut bytes)?;
                return Self::read_xlsx_file(bytes);
            },
            FileType::Json => serde_json::from_reader(reader)?,
            FileType::Cbor => serde_cbor::from_reader(reader)?,
        };
        if !records.is_empty() {
            check_columns(records.iter().flat_map(|r| r.keys()))?;
        }
        Ok(records)
    }

    fn read_text_file(mut reader: impl Read, sep: u8) -> Result<Vec<RawRecord>, Error> {
        let mut file = String::new();
        reader.read_to_string(&mut file)?;
        let file = file.trim_start_matches('\u{feff}');
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(sep)
            .has_headers(true)
            .flexible(true)
            .from_reader(file.as_bytes());
        let header = normalize_header(reader.headers()?.iter())?;
        if header.iter().all(|h| h.is_empty()) {
            return Err(Error::EmptyFile);
        }
        debug!("Header {:?}", header);
        check_columns(header.iter().map(|h| h.as_str()))?;

        let mut records = vec![];
        for record in reader.records() {
            let record = record?;
            if record.len() != header.len() {
                return Err(Error::FieldCountMismatch {
                    line: record.position().map_or(0, |p| p.line() as usize),
                    found: record.len(),
                    expected: header.len(),
                });
            }
            records.push(
                header
                    .iter()
                    .cloned()
                    .zip(record.iter().map(|f| Value::String(f.to_string())))
                    .collect::<RawRecord>(),
            );
        }
        Ok(records)
    }

    // first worksheet, first row is the header
    fn read_xlsx_file(bytes: Vec<u8>) -> Result<Vec<RawRecord>, Error> {
        let mut workbook: Xlsx<_> = calamine::open_workbook_from_rs(Cursor::new(bytes))?;
        let range = workbook.worksheet_range_at(0).ok_or(Error::EmptyFile)??;
        let mut rows = range.rows();
        let header = rows.next().ok_or(Error::EmptyFile)?;
        let header = normalize_header(header.iter().map(|c| c.to_string()))?;
        debug!("Header {:?}", header);
        check_columns(header.iter().map(|h| h.as_str()))?;

        let records = rows
            .filter(|row| row.iter().any(|c| !matches!(c, Data::Empty)))
            .map(|row| {
                header
                    .iter()
                    .zip(row)
                    .filter(|(h, _)| !h.is_empty())
                    .map(|(h, cell)| (h.clone(), xlsx_value(cell)))
                    .collect::<RawRecord>()
            })
            .collect();
        Ok(records)
    }

    /// Write the outcomes, replacing the file only once everything has been written.
    #[tracing::instrument(skip(self, outcomes), fields(path = %self.path.display()))]
    pub fn write_outcomes(&self, outcomes: &[Outcome], options: &WriteOptions) -> Result<(), Error> {
        let file_name = self
            .path
            .file_name()
            .ok_or(Error::NoFileName)?
            .to_str()
            .ok_or(Error::InvalidFileName)?;
        let tmp_path = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, rand::random::<u64>()));
        if let Err(e) = self.write_to_path(&tmp_path, outcomes, options) {
            if let Err(e) = std::fs::remove_file(&tmp_path) {
                warn!("failed to remove {}: {}", tmp_path.display(), e);
            }
            return Err(e);
        }
        std::fs::rename(&tmp_path, &self.path)?;
        info!("Wrote {} outcomes", outcomes.len());
        Ok(())
    }

    fn write_to_path(
        &self,
        path: &Path,
        outcomes: &[Outcome],
        options: &WriteOptions,
    ) -> Result<(), Error> {
        let file = std::fs::File::create(path)?;
        if self.gz {
            let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            self.write_outcomes_to_writer(&mut encoder, outcomes, options)?;
            encoder.finish()?;
        } else {
            let mut writer = std::io::BufWriter::new(file);
            self.write_outcomes_to_writer(&mut writer, outcomes, options)?;
            writer.flush()?;
        }
        Ok(())
    }

    pub fn write_outcomes_to_writer(
        &self,
        writer: impl Write,
        outcomes: &[Outcome],
        options: &WriteOptions,
    ) -> Result<(), Error> {
        match self.file_type {
            FileType::Csv => Self::write_text_file(writer, outcomes, b',', options)?,
            FileType::Tsv => Self::write_text_file(writer, outcomes, b'\t', options)?,
            FileType::Txt => Self::write_text_file(writer, outcomes, b' ', options)?,
            FileType::Xlsx => Self::write_xlsx_file(writer, outcomes, options)?,
            FileType::Json => serde_json::to_writer_pretty(writer, &external_values(outcomes)?)?,
            FileType::Cbor => serde_cbor::to_writer(writer, &external_values(outcomes)?)?,
        }
        Ok(())
    }

    fn write_text_file(
        writer: impl Write,
        outcomes: &[Outcome],
        sep: u8,
        options: &WriteOptions,
    ) -> Result<(), Error> {
        if outcomes.is_empty() {
            warn!("No outcomes to write");
            return Ok(());
        }
        let table = Table::new(outcomes);
        let mut writer = csv::WriterBuilder::new()
            .delimiter(sep)
            .from_writer(writer);
        writer.write_record(&table.columns)?;
        if options.descriptions {
            writer.write_record(table.descriptions())?;
        }
        for row in &table.rows {
            writer.write_record(
                table
                    .cells(row)
                    .map(|cell| cell.map(|c| c.render(options.precision)).unwrap_or_default()),
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_xlsx_file(
        mut writer: impl Write,
        outcomes: &[Outcome],
        options: &WriteOptions,
    ) -> Result<(), Error> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;
        if outcomes.is_empty() {
            warn!("No outcomes to write");
        } else {
            let table = Table::new(outcomes);
            for (col, name) in table.columns.iter().enumerate() {
                sheet.write_string(0, col as u16, *name)?;
            }
            let mut row_num = 1;
            if options.descriptions {
                for (col, description) in table.descriptions().enumerate() {
                    sheet.write_string(row_num, col as u16, description)?;
                }
                row_num += 1;
            }
            for row in &table.rows {
                for (col, cell) in table.cells(row).enumerate() {
                    if let Some(cell) = cell {
                        cell.write_xlsx(sheet, row_num, col as u16)?;
                    }
                }
                row_num += 1;
            }
        }
        writer.write_all(&workbook.save_to_buffer()?)?;
        Ok(())
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let extension = path
            .file_name()
            .ok_or(Error::NoFileName)?
            .to_str()
            .ok_or(Error::InvalidFileName)?
            .split('.')
            .filter(|x| !x.is_empty())
            .collect::<Vec<&str>>();
        if extension.len() < 2 {
            return Err(Error::NoFileExtension);
        }
        let gz = extension[extension.len() - 1] == "gz";
        if gz && extension.len() < 3 {
            return Err(Error::NoFileExtension);
        }
        let extension = extension[extension.len() - if gz { 2 } else { 1 }];
        let file_type = FileType::from_str(extension)?;
        Ok(Self {
            path,
            file_type,
            gz,
        })
    }
}

impl FromStr for File {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_path(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Comma-separated values.
    /// Expects the first row to be the column names.
    Csv,
    /// Tab-separated values.
    /// Expects the first row to be the column names.
    Tsv,
    /// Space-separated values.
    /// Expects the first row to be the column names.
    Txt,
    /// A list of objects keyed by column name.
    Json,
    /// Same layout as json.
    Cbor,
    /// Excel workbook. Only the first worksheet is read, its first row holds the column
    /// names.
    Xlsx,
}

impl FromStr for FileType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "csv" => Self::Csv,
            "tsv" => Self::Tsv,
            "txt" => Self::Txt,
            "json" => Self::Json,
            "cbor" => Self::Cbor,
            "xlsx" => Self::Xlsx,
            _ => return Err(Error::UnsupportedFileType(s.to_string())),
        })
    }
}

fn check_columns<'a>(columns: impl Iterator<Item = &'a str>) -> Result<(), Error> {
    let columns = columns.collect::<BTreeSet<_>>();
    let missing = REQUIRED_FIELDS
        .iter()
        .filter(|f| !columns.contains(*f))
        .map(|f| f.to_string())
        .collect::<Vec<_>>();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::Schema(missing))
    }
}

// trimmed, lower-cased, every run of other characters becomes `_`
fn normalize_header<S: AsRef<str>>(header: impl Iterator<Item = S>) -> Result<Vec<String>, Error> {
    let non_word = Regex::new(r"[^0-9a-z]+")?;
    Ok(header
        .map(|h| {
            non_word
                .replace_all(&h.as_ref().trim().to_lowercase(), "_")
                .trim_matches('_')
                .to_string()
        })
        .collect())
}

fn xlsx_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::Int(x) => Value::from(*x),
        Data::Float(x) => Value::from(*x),
        Data::Bool(x) => Value::Bool(*x),
        Data::String(s) => Value::String(s.clone()),
        other => Value::String(other.to_string()),
    }
}

// row_index only identifies rows inside a batch
fn external_values(outcomes: &[Outcome]) -> Result<Vec<Value>, Error> {
    outcomes
        .iter()
        .map(|o| {
            let mut v = serde_json::to_value(o)?;
            if let Some(m) = v.as_object_mut() {
                m.remove("row_index");
            }
            Ok::<_, Error>(v)
        })
        .collect()
}

enum Cell<'a> {
    Real(f64),
    Integer(i64),
    Bool(bool),
    Text(&'a str),
    Raw(&'a Value),
}

impl Cell<'_> {
    fn render(&self, precision: usize) -> String {
        match self {
            Cell::Real(x) => format!("{:.*}", precision, x),
            Cell::Integer(x) => x.to_string(),
            Cell::Bool(x) => x.to_string(),
            Cell::Text(s) => s.to_string(),
            Cell::Raw(Value::String(s)) => s.clone(),
            Cell::Raw(v) => v.to_string(),
        }
    }

    // numbers keep full precision in workbooks
    fn write_xlsx(&self, sheet: &mut Worksheet, row: u32, col: u16) -> Result<(), Error> {
        match self {
            Cell::Real(x) if x.is_finite() => sheet.write_number(row, col, *x)?,
            Cell::Real(x) => sheet.write_string(row, col, x.to_string())?,
            Cell::Integer(x) => sheet.write_number(row, col, *x as f64)?,
            Cell::Bool(x) => sheet.write_boolean(row, col, *x)?,
            Cell::Text(s) => sheet.write_string(row, col, *s)?,
            Cell::Raw(Value::Number(n)) => match n.as_f64() {
                Some(x) => sheet.write_number(row, col, x)?,
                None => sheet.write_string(row, col, n.to_string())?,
            },
            Cell::Raw(Value::Bool(x)) => sheet.write_boolean(row, col, *x)?,
            Cell::Raw(Value::String(s)) => sheet.write_string(row, col, s.as_str())?,
            Cell::Raw(v) => sheet.write_string(row, col, v.to_string())?,
        };
        Ok(())
    }
}

/// Outcomes laid out as named columns: the priority columns first, every other column
/// present in any outcome after them sorted by name.
struct Table<'a> {
    columns: Vec<&'static str>,
    rows: Vec<Vec<(&'static str, Cell<'a>)>>,
}

impl<'a> Table<'a> {
    fn new(outcomes: &'a [Outcome]) -> Self {
        let rows = outcomes.iter().map(cells).collect::<Vec<_>>();
        let present = rows
            .iter()
            .flat_map(|r| r.iter().map(|(name, _)| *name))
            .collect::<BTreeSet<_>>();
        let columns = PRIORITY_COLUMNS
            .iter()
            .copied()
            .filter(|c| present.contains(c))
            .chain(
                present
                    .iter()
                    .copied()
                    .filter(|c| !PRIORITY_COLUMNS.contains(c)),
            )
            .collect();
        Self { columns, rows }
    }

    fn descriptions(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| {
            DESCRIPTIONS
                .iter()
                .find(|(name, _)| name == c)
                .map_or(*c, |(_, d)| *d)
        })
    }

    // `None` where the row has no value for the column
    fn cells<'r>(
        &'r self,
        row: &'r [(&'static str, Cell<'a>)],
    ) -> impl Iterator<Item = Option<&'r Cell<'a>>> + 'r {
        self.columns
            .iter()
            .map(move |c| row.iter().find(|(name, _)| name == c).map(|(_, cell)| cell))
    }
}

fn cells(outcome: &Outcome) -> Vec<(&'static str, Cell<'_>)> {
    match outcome {
        Outcome::Success(e) => {
            let ci = e.confidence_interval();
            let mut cells = vec![
                ("coefficient", Cell::Real(e.coefficient())),
                ("std_error", Cell::Real(e.std_error())),
                ("sample_size", Cell::Integer(e.sample_size())),
                ("t_statistic", Cell::Real(e.t_statistic())),
                ("p_value", Cell::Real(e.p_value())),
                ("is_significant", Cell::Bool(e.is_significant())),
                ("alpha_used", Cell::Real(e.alpha_used())),
                ("degrees_of_freedom", Cell::Integer(e.degrees_of_freedom())),
                ("confidence_interval_lower", Cell::Real(ci.lower)),
                ("confidence_interval_upper", Cell::Real(ci.upper)),
                ("margin_of_error", Cell::Real(e.margin_of_error())),
                (
                    "regression_type_used",
                    Cell::Text(e.regression_type_used().as_str()),
                ),
            ];
            if let Some(k) = e.num_predictors() {
                cells.push(("num_predictors", Cell::Integer(k)));
            }
            cells
        },
        Outcome::Error(e) => vec![
            ("error_kind", Cell::Text(e.error_kind.as_str())),
            ("error_message", Cell::Text(&e.error_message)),
            ("coefficient", Cell::Raw(&e.snapshot.coefficient)),
            ("std_error", Cell::Raw(&e.snapshot.std_error)),
            ("sample_size", Cell::Raw(&e.snapshot.sample_size)),
            ("significance_level", Cell::Raw(&e.snapshot.significance_level)),
            ("regression_type", Cell::Raw(&e.snapshot.regression_type)),
            ("num_predictors", Cell::Raw(&e.snapshot.num_predictors)),
        ],
    }
}
