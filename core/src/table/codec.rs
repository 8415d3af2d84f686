//! Row-tagged CSV persistence for [`Table`].
//!
//! The leading field of each row is its tag: `C` (or `#`) comment, `G` global
//! property, `F` interleave declaration, `P` dataset property, `H` variable
//! header and `D` data. After an `F,Interleave,A-E,F-J,...` row every dataset
//! owns an inclusive column range whose first cell carries that dataset's own
//! tag, so several sensors can share the same physical rows.

use super::column::{column_code, ColumnRange};
use super::model::{Dataset, Property, Samples, Table, Variable, TITLE_KEY};
use crate::prelude::{ScreenError, ScreenResult};
use log::debug;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

pub const DATASET_KEY: &str = "Dataset";
pub const INTERLEAVE_KEY: &str = "Interleave";
pub const FORMAT_BANNER: &str = "Semantic-CSV v0.1";

pub fn read_table<P: AsRef<Path>>(path: P) -> ScreenResult<Table> {
    let path = path.as_ref();
    let file = File::open(path)?;
    parse_table(file, &path.display().to_string())
}

pub fn parse_str(text: &str, label: &str) -> ScreenResult<Table> {
    parse_table(text.as_bytes(), label)
}

/// Parses a whole table; any error aborts the read and no partial table is returned.
pub fn parse_table<R: Read>(reader: R, label: &str) -> ScreenResult<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::None)
        .from_reader(reader);
    let mut parser = TableParser::new(label);
    let mut record = csv::StringRecord::new();

    loop {
        let more = reader.read_record(&mut record).map_err(|err| {
            let line = err.position().map(|p| p.line()).unwrap_or(parser.line + 1);
            ScreenError::format(label, line, err.to_string())
        })?;
        if !more {
            break;
        }
        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(parser.line + 1);
        let cells: Vec<&str> = record.iter().collect();
        parser.feed(line, &cells)?;
    }

    parser.finish()
}

struct PendingDataset {
    range: Option<ColumnRange>,
    properties: BTreeMap<String, Property>,
    columns: Vec<Option<usize>>,
    headers: Vec<(String, String)>,
    cells: Vec<Vec<String>>,
    rows: usize,
}

impl PendingDataset {
    fn new(range: Option<ColumnRange>) -> Self {
        Self {
            range,
            properties: BTreeMap::new(),
            columns: Vec::new(),
            headers: Vec::new(),
            cells: Vec::new(),
            rows: 0,
        }
    }

    fn first_column(&self) -> usize {
        self.range.map(|r| r.start).unwrap_or(0)
    }

    fn property_row(&mut self, body: &[&str]) {
        if let Some(property) = property_from(body) {
            self.properties.insert(property.name().to_string(), property);
        }
    }

    fn header_row(&mut self, body: &[&str]) -> Result<(), String> {
        if self.rows > 0 {
            return Err("Header row redefined after data rows".into());
        }
        self.columns.clear();
        self.headers.clear();
        for cell in body {
            if cell.trim().is_empty() {
                self.columns.push(None);
                continue;
            }
            let (name, unit) = Variable::parse_header(cell);
            if self.headers.iter().any(|(existing, _)| *existing == name) {
                return Err(format!("Duplicate variable '{}' in header", name));
            }
            self.columns.push(Some(self.headers.len()));
            self.headers.push((name, unit));
        }
        self.cells = vec![Vec::new(); self.headers.len()];
        Ok(())
    }

    fn data_row(&mut self, body: &[&str]) -> Result<(), String> {
        let mut row: Vec<&str> = vec![""; self.headers.len()];
        for (index, &cell) in body.iter().enumerate() {
            match self.columns.get(index).copied().flatten() {
                Some(slot) => row[slot] = cell,
                None if cell.trim().is_empty() => {}
                None => {
                    return Err(format!(
                        "header missing for column {} (value '{}')",
                        describe_column(self.first_column() + 1 + index),
                        cell.trim()
                    ))
                }
            }
        }
        for (slot, value) in row.into_iter().enumerate() {
            self.cells[slot].push(value.to_string());
        }
        self.rows += 1;
        Ok(())
    }

    fn finish(self, index: usize) -> ScreenResult<Dataset> {
        let mut properties = self.properties;
        let id = properties
            .remove(DATASET_KEY)
            .and_then(|p| p.first().map(str::to_string))
            .unwrap_or_else(|| index.to_string());

        let mut dataset = Dataset::new(id);
        for property in properties.into_values() {
            dataset.set_property(property);
        }
        for ((name, unit), cells) in self.headers.into_iter().zip(self.cells) {
            dataset.add_variable(Variable::new(name, unit, Samples::from_cells(cells)))?;
        }
        Ok(dataset)
    }
}

struct TableParser<'a> {
    label: &'a str,
    line: u64,
    globals: BTreeMap<String, Property>,
    datasets: Vec<PendingDataset>,
    interleaved: bool,
    dataset_rows_seen: bool,
}

impl<'a> TableParser<'a> {
    fn new(label: &'a str) -> Self {
        Self {
            label,
            line: 0,
            globals: BTreeMap::new(),
            datasets: Vec::new(),
            interleaved: false,
            dataset_rows_seen: false,
        }
    }

    fn error(&self, message: impl Into<String>) -> ScreenError {
        ScreenError::format(self.label, self.line, message)
    }

    fn feed(&mut self, line: u64, cells: &[&str]) -> ScreenResult<()> {
        self.line = line;
        if cells.iter().all(|c| c.trim().is_empty()) {
            return Ok(());
        }
        match cells[0].trim() {
            "C" => Ok(()),
            tag if tag.starts_with('#') => Ok(()),
            "G" => self.global_row(cells),
            "F" => self.format_row(cells),
            _ => self.dataset_row(cells),
        }
    }

    fn global_row(&mut self, cells: &[&str]) -> ScreenResult<()> {
        if self.dataset_rows_seen {
            return Err(self.error("Global 'G' rows must precede 'P', 'H' and 'D' rows"));
        }
        if let Some(property) = property_from(&cells[1..]) {
            self.globals.insert(property.name().to_string(), property);
        }
        Ok(())
    }

    fn format_row(&mut self, cells: &[&str]) -> ScreenResult<()> {
        if self.dataset_rows_seen {
            return Err(self.error(
                "Interleaved format must be specified before 'P'roperty, 'H'eader or 'D'ata rows",
            ));
        }
        if self.interleaved {
            return Err(self.error("Duplicate 'F' row"));
        }
        if cells.len() < 3 {
            return Err(self.error("Short column count"));
        }
        if cells[1].trim() != INTERLEAVE_KEY {
            return Err(self.error(format!("Expected '{}' in 2nd column", INTERLEAVE_KEY)));
        }

        for spec in &cells[2..] {
            if spec.trim().is_empty() {
                break;
            }
            let range = ColumnRange::parse(spec).map_err(|message| self.error(message))?;
            if let Some(clash) = self
                .datasets
                .iter()
                .filter_map(|d| d.range)
                .find(|existing| existing.overlaps(&range))
            {
                return Err(self.error(format!(
                    "Column range {} overlaps {}",
                    range, clash
                )));
            }
            self.datasets.push(PendingDataset::new(Some(range)));
        }
        if self.datasets.is_empty() {
            return Err(self.error("No column ranges in 'F' row"));
        }
        self.interleaved = true;
        debug!(
            "{}: {} interleaved dataset(s) declared",
            self.label,
            self.datasets.len()
        );
        Ok(())
    }

    fn dataset_row(&mut self, cells: &[&str]) -> ScreenResult<()> {
        if self.datasets.is_empty() {
            self.datasets.push(PendingDataset::new(None));
        }
        self.dataset_rows_seen = true;
        if self.interleaved {
            self.check_uncovered(cells)?;
        }

        let label = self.label;
        let line = self.line;
        for dataset in self.datasets.iter_mut() {
            let sub = match dataset.range {
                Some(range) => range.slice(cells),
                None => cells,
            };
            let Some((&tag, body)) = sub.split_first() else {
                continue;
            };
            match tag.trim() {
                "" => {}
                "P" => dataset.property_row(body),
                "H" => dataset
                    .header_row(body)
                    .map_err(|message| ScreenError::format(label, line, message))?,
                "D" => dataset
                    .data_row(body)
                    .map_err(|message| ScreenError::format(label, line, message))?,
                other => {
                    return Err(ScreenError::format(
                        label,
                        line,
                        format!("Unknown row type '{}'", other),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Every non-empty cell of an interleaved row must fall inside a declared range.
    fn check_uncovered(&self, cells: &[&str]) -> ScreenResult<()> {
        let stray = cells.iter().enumerate().find(|(index, cell)| {
            !cell.trim().is_empty()
                && !self
                    .datasets
                    .iter()
                    .filter_map(|d| d.range)
                    .any(|range| range.start <= *index && *index <= range.end)
        });
        match stray {
            Some((index, cell)) => Err(self.error(format!(
                "header missing for column {} (value '{}'), outside every interleaved range",
                describe_column(index),
                cell.trim()
            ))),
            None => Ok(()),
        }
    }

    fn finish(self) -> ScreenResult<Table> {
        let label = self.label;
        let line = self.line;
        let as_format = |err: ScreenError| match err {
            ScreenError::DataConsistency(message) => ScreenError::format(label, line, message),
            other => other,
        };

        let mut builder = Table::builder();
        for property in self.globals.into_values() {
            builder = builder.global(property);
        }
        for (index, pending) in self.datasets.into_iter().enumerate() {
            builder = builder.dataset(pending.finish(index).map_err(as_format)?);
        }
        let table = builder.build().map_err(as_format)?;
        debug!(
            "{}: parsed {} global property row(s), {} dataset(s)",
            label,
            table.globals().len(),
            table.datasets().len()
        );
        Ok(table)
    }
}

fn property_from(cells: &[&str]) -> Option<Property> {
    let (name, values) = cells.split_first()?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(Property::new(name, values.iter().copied()))
}

fn describe_column(index: usize) -> String {
    match column_code(index) {
        Some(code) => format!("{} (index {})", code, index),
        None => format!("index {}", index),
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

struct DatasetBlock<'t> {
    dataset: &'t Dataset,
    range: ColumnRange,
    property_rows: Vec<Vec<String>>,
}

impl<'t> DatasetBlock<'t> {
    fn new(dataset: &'t Dataset, start: usize) -> Self {
        let mut property_rows = vec![vec![DATASET_KEY.to_string(), dataset.id().to_string()]];
        for property in dataset.properties().values() {
            let mut row = vec![property.name().to_string()];
            row.extend(property.values().iter().cloned());
            property_rows.push(row);
        }
        let body = property_rows
            .iter()
            .map(Vec::len)
            .chain(std::iter::once(dataset.variables().len()))
            .max()
            .unwrap_or(1);
        Self {
            dataset,
            range: ColumnRange {
                start,
                end: start + body,
            },
            property_rows,
        }
    }

    fn put(&self, row: &mut [String], tag: &str, cells: &[String]) {
        row[self.range.start] = tag.to_string();
        for (offset, cell) in cells.iter().enumerate() {
            row[self.range.start + 1 + offset] = cell.clone();
        }
    }
}

/// Writes globals, the interleave declaration, dataset properties, headers
/// and side-by-side data rows, padding exhausted datasets with empty cells.
pub fn serialize_table<W: Write>(table: &Table, writer: W) -> ScreenResult<()> {
    let mut blocks = Vec::with_capacity(table.datasets().len());
    let mut next = 0;
    for dataset in table.datasets() {
        let block = DatasetBlock::new(dataset, next);
        next = block.range.end + 1;
        blocks.push(block);
    }

    let mut global_rows = Vec::new();
    if let Some(title) = table.global(TITLE_KEY) {
        global_rows.push(property_cells("G", title));
    }
    for property in table.globals().values().filter(|p| p.name() != TITLE_KEY) {
        global_rows.push(property_cells("G", property));
    }

    let interleave = if blocks.len() > 1 {
        let mut row = vec!["F".to_string(), INTERLEAVE_KEY.to_string()];
        row.extend(blocks.iter().map(|b| b.range.to_string()));
        Some(row)
    } else {
        None
    };

    let width = [
        next,
        2,
        global_rows.iter().map(Vec::len).max().unwrap_or(0),
        interleave.as_ref().map(Vec::len).unwrap_or(0),
    ]
    .into_iter()
    .max()
    .unwrap_or(2);

    let mut out = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::CRLF)
        .from_writer(writer);
    let blank = vec![String::new(); width];
    let padded = |mut cells: Vec<String>| {
        cells.resize(width, String::new());
        cells
    };

    out.write_record(padded(vec!["C".into(), FORMAT_BANNER.into()]))?;
    out.write_record(&blank)?;
    for row in global_rows {
        out.write_record(padded(row))?;
    }
    out.write_record(&blank)?;
    if let Some(row) = interleave {
        out.write_record(padded(row))?;
        out.write_record(&blank)?;
    }

    let property_count = blocks.iter().map(|b| b.property_rows.len()).max().unwrap_or(0);
    for index in 0..property_count {
        let mut row = blank.clone();
        for block in &blocks {
            if let Some(cells) = block.property_rows.get(index) {
                block.put(&mut row, "P", cells);
            }
        }
        out.write_record(&row)?;
    }
    if !blocks.is_empty() {
        out.write_record(&blank)?;
    }

    if blocks.iter().any(|b| !b.dataset.variables().is_empty()) {
        let mut row = blank.clone();
        for block in blocks.iter().filter(|b| !b.dataset.variables().is_empty()) {
            let labels: Vec<String> = block
                .dataset
                .variables()
                .iter()
                .map(Variable::header_label)
                .collect();
            block.put(&mut row, "H", &labels);
        }
        out.write_record(&row)?;
    }

    let row_count = blocks.iter().map(|b| b.dataset.row_count()).max().unwrap_or(0);
    for index in 0..row_count {
        let mut row = blank.clone();
        for block in &blocks {
            if index < block.dataset.row_count() {
                let cells: Vec<String> = block
                    .dataset
                    .variables()
                    .iter()
                    .map(|v| v.samples().cell(index))
                    .collect();
                block.put(&mut row, "D", &cells);
            }
        }
        out.write_record(&row)?;
    }

    out.flush()?;
    Ok(())
}

fn property_cells(tag: &str, property: &Property) -> Vec<String> {
    let mut cells = vec![tag.to_string(), property.name().to_string()];
    cells.extend(property.values().iter().cloned());
    cells
}

pub fn to_string(table: &Table) -> ScreenResult<String> {
    let mut buffer = Vec::new();
    serialize_table(table, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub fn write_table<P: AsRef<Path>>(table: &Table, path: P) -> ScreenResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(path)?;
    serialize_table(table, file)?;
    debug!("table written to {}", path.display());
    Ok(())
}
