//! Append-only CSV ledger of completed screening runs.
//!
//! A row is only ever added at the end of the file. Each append writes its
//! whole payload or leaves the file as it was found.

use crate::prelude::{ScreenError, ScreenResult};
use crate::processing::classify::Classification;
use crate::processing::pipeline::FitResult;
use crate::table::Table;
use crate::telemetry::log::LogManager;
use chrono::{Local, SecondsFormat};
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const LEDGER_HEADER: [&str; 7] = [
    "Part",
    "Timestamp",
    "Technician",
    "Software",
    "Dipole [N m T^-1]",
    "Field @ 1 m [nT]",
    "Result",
];

const UNKNOWN_OPERATOR: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub part: String,
    pub timestamp: String,
    pub technician: String,
    pub software: String,
    pub moment: f64,
    pub stray_field_t: f64,
    pub classification: Classification,
}

impl LedgerEntry {
    /// Row for a completed run, taking identification from the table's globals.
    pub fn from_run(table: &Table, result: &FitResult) -> ScreenResult<Self> {
        let part = table
            .global_value("Part")
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                ScreenError::DataConsistency("global property 'Part' is required for the ledger".into())
            })?;
        let timestamp = table
            .global_value("Timestamp")
            .map(str::to_string)
            .unwrap_or_else(|| Local::now().to_rfc3339_opts(SecondsFormat::Secs, false));
        let technician = table.global_value("User").unwrap_or(UNKNOWN_OPERATOR);
        let software = table
            .global_value("Version")
            .map(str::to_string)
            .unwrap_or_else(|| format!("screencore-{}", env!("CARGO_PKG_VERSION")));

        Ok(Self {
            part: part.to_string(),
            timestamp,
            technician: technician.to_string(),
            software,
            moment: result.moment,
            stray_field_t: result.stray_field_t,
            classification: result.classification,
        })
    }

    /// Text columns are always quoted; the two figures never are.
    fn cells(&self) -> [String; 7] {
        [
            quoted(&self.part),
            quoted(&self.timestamp),
            quoted(&self.technician),
            quoted(&self.software),
            scientific(self.moment),
            scientific(self.stray_field_t * 1e9),
            quoted(self.classification.label()),
        ]
    }
}

pub struct ResultsLedger {
    path: PathBuf,
    logger: LogManager,
}

impl ResultsLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            logger: LogManager::new("ledger"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one row, writing the header first when the file is new.
    pub fn append(&self, entry: &LedgerEntry) -> ScreenResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(file) => self.write_new(file, entry),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => self.write_existing(entry),
            Err(err) => Err(err.into()),
        }?;

        self.logger.record(&format!(
            "{} {} appended to {}",
            entry.part,
            entry.classification,
            self.path.display()
        ));
        Ok(())
    }

    fn write_new(&self, mut file: File, entry: &LedgerEntry) -> ScreenResult<()> {
        let written = encode(Some(&LEDGER_HEADER), entry)
            .and_then(|payload| file.write_all(&payload).and_then(|_| file.flush()).map_err(Into::into));
        if written.is_err() {
            drop(file);
            if let Err(err) = fs::remove_file(&self.path) {
                self.logger
                    .warn(&format!("could not remove partial ledger {}: {}", self.path.display(), err));
            }
        }
        written
    }

    fn write_existing(&self, entry: &LedgerEntry) -> ScreenResult<()> {
        let mut payload = encode(None, entry)?;
        let mut file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        let original = file.metadata()?.len();

        if original > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::Start(original - 1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                payload = [b"\r\n".as_slice(), payload.as_slice()].concat();
            }
        }

        if let Err(err) = file.write_all(&payload).and_then(|_| file.flush()) {
            if let Err(restore) = file.set_len(original) {
                self.logger.warn(&format!(
                    "could not restore {} to {} bytes: {}",
                    self.path.display(),
                    original,
                    restore
                ));
            }
            return Err(err.into());
        }
        Ok(())
    }
}

fn quoted(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

/// Three-decimal scientific notation with a signed, two-digit exponent (`8.000e-02`).
fn scientific(value: f64) -> String {
    let formatted = format!("{:.3e}", value);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => match exponent.parse::<i32>() {
            Ok(exp) => format!(
                "{}e{}{:02}",
                mantissa,
                if exp < 0 { '-' } else { '+' },
                exp.unsigned_abs()
            ),
            Err(_) => formatted,
        },
        None => formatted,
    }
}

// Cells arrive pre-quoted, so the writer must not quote again.
fn encode(header: Option<&[&str; 7]>, entry: &LedgerEntry) -> ScreenResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::CRLF)
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(Vec::new());
    if let Some(header) = header {
        writer.write_record(header.iter().map(|name| quoted(name)))?;
    }
    writer.write_record(entry.cells())?;
    writer
        .into_inner()
        .map_err(|err| ScreenError::Io(err.into_error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::ClassificationBasis;
    use crate::table::Property;

    fn result(moment: f64, classification: Classification) -> FitResult {
        FitResult {
            moment,
            moment_err: 0.0,
            stray_field_t: 2e-7 * moment,
            stray_field_err_t: 0.0,
            classification,
            basis: ClassificationBasis::Moment,
            limit: 0.05,
        }
    }

    fn table() -> Table {
        Table::builder()
            .title("Raw Data")
            .global(Property::new("Part", ["BRKT-7"]))
            .global(Property::new("Timestamp", ["2026-03-01T10:00:00+01:00"]))
            .global(Property::new("User", ["jdoe"]))
            .global(Property::new("Version", ["1.4.2"]))
            .build()
            .unwrap()
    }

    #[test]
    fn entry_takes_run_identity_from_globals() {
        let entry = LedgerEntry::from_run(&table(), &result(0.01, Classification::Pass)).unwrap();
        assert_eq!(entry.part, "BRKT-7");
        assert_eq!(entry.technician, "jdoe");
        assert_eq!(entry.software, "1.4.2");
    }

    #[test]
    fn entry_requires_part() {
        let bare = Table::builder().title("Raw Data").build().unwrap();
        assert!(LedgerEntry::from_run(&bare, &result(0.01, Classification::Pass)).is_err());
    }

    #[test]
    fn missing_operator_and_version_fall_back() {
        let table = Table::builder()
            .global(Property::new("Part", ["P"]))
            .build()
            .unwrap();
        let entry = LedgerEntry::from_run(&table, &result(0.01, Classification::Pass)).unwrap();
        assert_eq!(entry.technician, "unknown");
        assert!(entry.software.starts_with("screencore-"));
        assert!(!entry.timestamp.is_empty());
    }

    #[test]
    fn first_append_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("ledger.csv");
        let ledger = ResultsLedger::new(&path);
        let entry = LedgerEntry::from_run(&table(), &result(0.0123, Classification::Pass)).unwrap();
        ledger.append(&entry).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.split("\r\n").collect();
        assert_eq!(
            lines[0],
            "\"Part\",\"Timestamp\",\"Technician\",\"Software\",\"Dipole [N m T^-1]\",\"Field @ 1 m [nT]\",\"Result\""
        );
        assert!(lines[1].starts_with("\"BRKT-7\",\"2026-03-01T10:00:00+01:00\",\"jdoe\",\"1.4.2\","));
        assert!(lines[1].contains(",1.230e-02,"));
        assert!(lines[1].ends_with("\"PASS\""));
        assert_eq!(lines[2], "");
    }

    #[test]
    fn exponents_are_signed_and_two_digits() {
        assert_eq!(scientific(0.08), "8.000e-02");
        assert_eq!(scientific(1.0), "1.000e+00");
        assert_eq!(scientific(6000.0), "6.000e+03");
        assert_eq!(scientific(-2.5e-12), "-2.500e-12");
        assert_eq!(scientific(0.0), "0.000e+00");
        assert_eq!(scientific(3.0e150), "3.000e+150");
    }

    #[test]
    fn numeric_looking_text_is_still_quoted() {
        let table = Table::builder()
            .global(Property::new("Part", ["12345"]))
            .global(Property::new("Timestamp", ["2026"]))
            .global(Property::new("User", ["say \"hi\""]))
            .global(Property::new("Version", ["2"]))
            .build()
            .unwrap();
        let entry = LedgerEntry::from_run(&table, &result(0.02, Classification::Pass)).unwrap();
        let payload = String::from_utf8(encode(None, &entry).unwrap()).unwrap();
        assert!(payload.starts_with("\"12345\",\"2026\",\"say \"\"hi\"\"\",\"2\",2.000e-02,"));
        assert!(payload.ends_with(",\"PASS\"\r\n"));
    }

    #[test]
    fn later_appends_preserve_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        let ledger = ResultsLedger::new(&path);
        let pass = LedgerEntry::from_run(&table(), &result(0.01, Classification::Pass)).unwrap();
        let fail = LedgerEntry::from_run(&table(), &result(0.09, Classification::Fail)).unwrap();
        ledger.append(&pass).unwrap();
        let before = fs::read(&path).unwrap();
        ledger.append(&fail).unwrap();
        let after = fs::read(&path).unwrap();

        assert_eq!(&after[..before.len()], &before[..]);
        let text = String::from_utf8(after).unwrap();
        assert_eq!(text.matches("\"Part\"").count(), 1);
        assert_eq!(text.trim_end().lines().count(), 3);
        assert!(text.trim_end().ends_with("\"FAIL\""));
    }

    #[test]
    fn unterminated_last_line_gets_a_break() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.csv");
        fs::write(&path, "Part,Timestamp,Technician,Software,Dipole,Field,Result").unwrap();
        let entry = LedgerEntry::from_run(&table(), &result(0.06, Classification::Fail)).unwrap();
        ResultsLedger::new(&path).append(&entry).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Part,Timestamp,Technician,Software,Dipole,Field,Result\r\n\"BRKT-7\""));
    }
}
