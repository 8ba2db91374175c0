//! CSV-backed stat store
//!
//! File layout: optional UTF-8 BOM, a header row, one row per endpoint key.
//! Three headers are accepted on read; the extended one is always written.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use csv::StringRecord;
use tracing::{debug, info, instrument};

use super::StatTable;
use crate::error::{NodeProbeError, Result};
use crate::models::{EndpointKey, EndpointStat};

const BOM: &str = "\u{feff}";

const MINIMAL_COLUMNS: &[&str] = &["server", "port", "protocol", "pass", "notpass"];
const LEGACY_RATE_COLUMNS: &[&str] = &["server", "port", "protocol", "pass", "notpass", "success_rate"];
const EXTENDED_COLUMNS: &[&str] = &[
    "server",
    "port",
    "protocol",
    "pass",
    "notpass",
    "firsttime",
    "updatetime",
];

/// Column layouts understood by the reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreSchema {
    /// `server,port,protocol,pass,notpass`
    Minimal,
    /// Minimal plus a redundant `success_rate` column, ignored on read
    LegacyRate,
    /// Minimal plus `firsttime,updatetime`
    Extended,
}

impl StoreSchema {
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            StoreSchema::Minimal => MINIMAL_COLUMNS,
            StoreSchema::LegacyRate => LEGACY_RATE_COLUMNS,
            StoreSchema::Extended => EXTENDED_COLUMNS,
        }
    }

    pub fn has_timestamps(&self) -> bool {
        matches!(self, StoreSchema::Extended)
    }

    /// Match a header row against the known layouts.
    ///
    /// `ip` is accepted as an older name for `server`.
    fn detect(header: &StringRecord) -> std::result::Result<Self, String> {
        let names: Vec<String> = header
            .iter()
            .map(|h| match h.trim().to_lowercase().as_str() {
                "ip" => "server".to_string(),
                other => other.to_string(),
            })
            .collect();

        let schema = match names.len() {
            5 => StoreSchema::Minimal,
            6 => StoreSchema::LegacyRate,
            7 => StoreSchema::Extended,
            n => {
                return Err(format!(
                    "header has {} columns, expected 5, 6 or 7",
                    n
                ))
            }
        };

        if names.iter().map(String::as_str).ne(schema.columns().iter().copied()) {
            return Err(format!(
                "unrecognized header `{}`, expected `{}`",
                names.join(","),
                schema.columns().join(",")
            ));
        }

        Ok(schema)
    }
}

/// Stat store persisted as a single CSV file.
///
/// Assumes a single writer process; concurrent runs against the same file
/// may overwrite each other's increments.
#[derive(Debug, Clone)]
pub struct StatStore {
    path: PathBuf,
}

impl StatStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every row.
    ///
    /// A missing file is an empty store. A file that exists but does not
    /// match a known layout yields [`NodeProbeError::Format`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn load_all(&self) -> Result<StatTable> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Stat store not found, starting empty");
                return Ok(StatTable::new());
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                return Err(NodeProbeError::format(&self.path, "file is not valid UTF-8"));
            }
            Err(e) => return Err(NodeProbeError::storage(&self.path, e)),
        };

        let table = parse_table(&content).map_err(|reason| NodeProbeError::format(&self.path, reason))?;
        debug!(rows = table.len(), "Stat store loaded");
        Ok(table)
    }

    /// Write every row, replacing the file atomically.
    ///
    /// Rows go to a sibling temp file which is synced and renamed over the
    /// target, so readers see either the old or the new file in full.
    #[instrument(skip(self, table), fields(path = %self.path.display(), rows = table.len()))]
    pub fn save_all(&self, table: &StatTable) -> Result<()> {
        let bytes = render_table(table)
            .map_err(|e| NodeProbeError::Internal(format!("failed to encode stat rows: {}", e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| NodeProbeError::storage(parent, e))?;
        }

        let tmp = self.temp_path();
        write_synced(&tmp, &bytes).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            NodeProbeError::storage(&tmp, e)
        })?;

        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            NodeProbeError::storage(&self.path, e)
        })?;

        info!("Stat store saved");
        Ok(())
    }

    /// Merge a single row into the file (load, merge, save)
    pub fn upsert<F>(&self, key: EndpointKey, incoming: &EndpointStat, merge: F) -> Result<EndpointStat>
    where
        F: FnOnce(Option<&EndpointStat>, &EndpointStat) -> EndpointStat,
    {
        let mut table = self.load_all()?;
        let merged = table.upsert(key, incoming, merge);
        self.save_all(&table)?;
        Ok(merged)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "stats.csv".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn parse_table(content: &str) -> std::result::Result<StatTable, String> {
    let content = content.strip_prefix(BOM).unwrap_or(content);
    let cleaned = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if cleaned.is_empty() {
        return Ok(StatTable::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(cleaned.as_bytes());

    let header = reader.headers().map_err(|e| e.to_string())?.clone();
    let schema = StoreSchema::detect(&header)?;
    let expected = schema.columns().len();

    let mut table = StatTable::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| e.to_string())?;
        let row = index + 1;
        if record.len() != expected {
            return Err(format!(
                "row {} has {} columns, expected {}",
                row,
                record.len(),
                expected
            ));
        }

        let (key, stat) = parse_row(&record, schema).map_err(|e| format!("row {}: {}", row, e))?;
        table.upsert(key, &stat, EndpointStat::merge_rows);
    }

    Ok(table)
}

fn parse_row(record: &StringRecord, schema: StoreSchema) -> std::result::Result<(EndpointKey, EndpointStat), String> {
    let field = |i: usize| record.get(i).unwrap_or("");

    let server = field(0);
    if server.is_empty() {
        return Err("server is empty".to_string());
    }
    let port: u16 = field(1)
        .parse()
        .map_err(|_| format!("invalid port `{}`", field(1)))?;
    let protocol = Some(field(2)).filter(|p| !p.is_empty());

    let stat = EndpointStat {
        pass: parse_counter(field(3), "pass")?,
        fail: parse_counter(field(4), "notpass")?,
        first_seen: if schema.has_timestamps() {
            parse_timestamp(field(5), "firsttime")?
        } else {
            None
        },
        last_seen: if schema.has_timestamps() {
            parse_timestamp(field(6), "updatetime")?
        } else {
            None
        },
    };

    Ok((EndpointKey::new(server, port, protocol), stat))
}

fn parse_counter(raw: &str, column: &str) -> std::result::Result<u64, String> {
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse()
        .map_err(|_| format!("invalid {} counter `{}`", column, raw))
}

/// RFC 3339, or `YYYY-MM-DD HH:MM:SS[.fff]` read as UTC; empty means unknown
fn parse_timestamp(raw: &str, column: &str) -> std::result::Result<Option<DateTime<Utc>>, String> {
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| Some(Utc.from_utc_datetime(&naive)))
        .map_err(|_| format!("invalid {} timestamp `{}`", column, raw))
}

fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

fn render_table(table: &StatTable) -> std::result::Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(BOM.as_bytes().to_vec());

    writer.write_record(EXTENDED_COLUMNS)?;
    for (key, stat) in table {
        writer.write_record([
            key.address().to_string(),
            key.port().to_string(),
            key.protocol().to_string(),
            stat.pass.to_string(),
            stat.fail.to_string(),
            format_timestamp(stat.first_seen),
            format_timestamp(stat.last_seen),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}
