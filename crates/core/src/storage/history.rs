use crate::domain::price::PriceRecord;
use anyhow::Context;
use chrono::NaiveDateTime;
use csv::{ByteRecord, StringRecord};
use rust_decimal::Decimal;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const COL_TIMESTAMP: &str = "Fecha";
pub const COL_PRODUCT: &str = "Componente";
pub const COL_PRICE: &str = "Precio";
pub const COL_URL: &str = "URL";

pub const HEADER: [&str; 4] = [COL_TIMESTAMP, COL_PRODUCT, COL_PRICE, COL_URL];

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIMESTAMP_FORMAT_FRACTIONAL: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Snapshot of the persisted log, in file order.
#[derive(Debug, Clone, Default)]
pub struct History {
    records: Vec<PriceRecord>,
    skipped: usize,
}

impl History {
    pub fn from_records(records: Vec<PriceRecord>) -> Self {
        Self {
            records,
            skipped: 0,
        }
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows dropped during load because they could not be parsed.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Latest record for `product_id`; on equal timestamps the last inserted wins.
    pub fn most_recent(&self, product_id: &str) -> Option<&PriceRecord> {
        // max_by_key returns the last of several equal maxima.
        self.records
            .iter()
            .filter(|r| r.product_id == product_id)
            .max_by_key(|r| r.timestamp)
    }
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    timestamp: usize,
    product: usize,
    price: usize,
    url: usize,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> anyhow::Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
                .with_context(|| format!("history header is missing column {name:?}"))
        };

        Ok(Self {
            timestamp: find(COL_TIMESTAMP)?,
            product: find(COL_PRODUCT)?,
            price: find(COL_PRICE)?,
            url: find(COL_URL)?,
        })
    }

    fn parse_row(&self, row: &StringRecord) -> anyhow::Result<PriceRecord> {
        let field = |idx: usize, name: &str| {
            row.get(idx)
                .map(str::trim)
                .with_context(|| format!("missing {name}"))
        };

        let timestamp = parse_timestamp(field(self.timestamp, COL_TIMESTAMP)?)?;

        let product_id = field(self.product, COL_PRODUCT)?;
        anyhow::ensure!(!product_id.is_empty(), "empty {COL_PRODUCT}");

        let raw_price = field(self.price, COL_PRICE)?;
        let price = Decimal::from_str(raw_price)
            .or_else(|_| Decimal::from_scientific(raw_price))
            .with_context(|| format!("invalid {COL_PRICE}: {raw_price:?}"))?;
        anyhow::ensure!(!price.is_sign_negative(), "negative {COL_PRICE}: {price}");

        Ok(PriceRecord {
            timestamp,
            product_id: product_id.to_string(),
            price,
            source_url: row.get(self.url).unwrap_or_default().trim().to_string(),
        })
    }

    fn to_row(&self, record: &PriceRecord, width: usize) -> Vec<String> {
        let mut row = vec![String::new(); width];
        row[self.timestamp] = record.timestamp.format(TIMESTAMP_FORMAT).to_string();
        row[self.product] = record.product_id.clone();
        row[self.price] = record.price.to_string();
        row[self.url] = record.source_url.clone();
        row
    }
}

pub fn parse_timestamp(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT_FRACTIONAL))
        .with_context(|| format!("invalid {COL_TIMESTAMP}: {s:?}"))
}

/// Reads the persisted history. A missing or empty file is an empty history;
/// an unreadable file or a header without the expected columns is an error.
/// Individual corrupt rows are skipped with a warning.
pub fn load(path: impl AsRef<Path>) -> anyhow::Result<History> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::info!(path = %path.display(), "no history file yet; starting empty");
            return Ok(History::default());
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to open history {}", path.display()))
        }
    };

    let history = read_history(file)
        .with_context(|| format!("malformed history file {}", path.display()))?;

    tracing::info!(
        path = %path.display(),
        records = history.len(),
        skipped = history.skipped(),
        "history loaded"
    );
    Ok(history)
}

fn read_history<R: io::Read>(reader: R) -> anyhow::Result<History> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = rdr.headers().context("failed to read history header")?.clone();
    if headers.is_empty() {
        return Ok(History::default());
    }
    let columns = Columns::from_headers(&headers)?;

    let mut history = History::default();
    for (idx, row) in rdr.records().enumerate() {
        // Header is line 1.
        let line = idx + 2;
        let parsed = match row {
            Ok(row) => columns.parse_row(&row),
            Err(err) if matches!(err.kind(), csv::ErrorKind::Io(_)) => {
                return Err(err).context("failed to read history");
            }
            Err(err) => Err(err.into()),
        };

        match parsed {
            Ok(record) => history.records.push(record),
            Err(err) => {
                history.skipped += 1;
                tracing::warn!(line, error = %format!("{err:#}"), "skipping corrupt history row");
            }
        }
    }

    Ok(history)
}

/// Persists `prior rows ∪ new_records` and returns the total row count.
///
/// Prior rows are copied byte-for-byte, including rows `load` would skip, so
/// nothing previously persisted is ever lost. The union is written to a sibling
/// staging file which then replaces the store in a single rename.
pub fn append(path: impl AsRef<Path>, new_records: &[PriceRecord]) -> anyhow::Result<usize> {
    let path = path.as_ref();
    let existing = read_raw(path)
        .with_context(|| format!("failed to read history {} before append", path.display()))?;

    let prior_len = existing.as_ref().map_or(0, |(_, rows)| rows.len());
    if new_records.is_empty() {
        return Ok(prior_len);
    }

    let (headers, prior_rows) = match existing {
        Some((headers, rows)) => (headers, rows),
        None => (ByteRecord::from(HEADER.to_vec()), Vec::new()),
    };
    let text_headers = StringRecord::from_byte_record(headers.clone())
        .map_err(|e| anyhow::anyhow!("history header is not UTF-8: {e}"))?;
    let columns = Columns::from_headers(&text_headers)?;

    let staging = staging_path(path);
    if let Err(err) = write_union(&staging, &headers, &prior_rows, columns, new_records) {
        let _ = fs::remove_file(&staging);
        return Err(err.context(format!("failed to write history {}", path.display())));
    }
    fs::rename(&staging, path).with_context(|| {
        format!(
            "failed to replace history {} with {}",
            path.display(),
            staging.display()
        )
    })?;

    Ok(prior_len + new_records.len())
}

fn read_raw(path: &Path) -> anyhow::Result<Option<(ByteRecord, Vec<ByteRecord>)>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(file);
    let headers = rdr.byte_headers()?.clone();
    if headers.is_empty() {
        return Ok(None);
    }

    let rows = rdr
        .byte_records()
        .collect::<Result<Vec<_>, _>>()
        .context("failed to read history rows")?;
    Ok(Some((headers, rows)))
}

fn write_union(
    staging: &Path,
    headers: &ByteRecord,
    prior_rows: &[ByteRecord],
    columns: Columns,
    new_records: &[PriceRecord],
) -> anyhow::Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(staging)
        .with_context(|| format!("failed to create {}", staging.display()))?;

    writer.write_byte_record(headers)?;
    for row in prior_rows {
        writer.write_byte_record(row)?;
    }
    for record in new_records {
        writer.write_record(columns.to_row(record, headers.len()))?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush history: {}", e.error()))?;
    file.sync_all().context("failed to sync history")?;
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("history"));
    name.push(".tmp");
    path.with_file_name(name)
}
