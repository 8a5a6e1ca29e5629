//! Row classification: preamble, header, data
//!
//! Rows before the header are dropped unread. The header row resolves the
//! required column names to positions; a missing name is fatal. Every later
//! row is projected onto a [`RawRecord`] that borrows from the CSV record.

use crate::error::{IndexError, Result};
use csv::StringRecord;
use std::fmt;

/// Columns the pipeline needs from the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RequiredColumn {
    Regione,
    Provincia,
    Comune,
    Strada,
    Civico,
    Barrato,
}

impl RequiredColumn {
    pub const ALL: [RequiredColumn; 6] = [
        RequiredColumn::Regione,
        RequiredColumn::Provincia,
        RequiredColumn::Comune,
        RequiredColumn::Strada,
        RequiredColumn::Civico,
        RequiredColumn::Barrato,
    ];

    /// Exact header text, matched case-sensitively
    pub fn name(self) -> &'static str {
        match self {
            RequiredColumn::Regione => "regione",
            RequiredColumn::Provincia => "provincia",
            RequiredColumn::Comune => "comune",
            RequiredColumn::Strada => "strada",
            RequiredColumn::Civico => "civico",
            RequiredColumn::Barrato => "barrato",
        }
    }
}

impl fmt::Display for RequiredColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Positions of the required columns within a data row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    positions: [usize; 6],
}

impl ColumnMap {
    /// Resolve the required columns; the first occurrence of a name wins.
    pub fn resolve(header: &StringRecord) -> std::result::Result<Self, Vec<RequiredColumn>> {
        let mut positions = [0usize; 6];
        let mut missing = Vec::new();

        for (slot, column) in RequiredColumn::ALL.iter().enumerate() {
            match header.iter().position(|name| name == column.name()) {
                Some(position) => positions[slot] = position,
                None => missing.push(*column),
            }
        }

        if missing.is_empty() {
            Ok(Self { positions })
        } else {
            Err(missing)
        }
    }

    pub fn position(&self, column: RequiredColumn) -> usize {
        self.positions[column as usize]
    }

    /// Project a data row; short rows and empty cells yield absent fields.
    pub fn project<'r>(&self, record: &'r StringRecord) -> RawRecord<'r> {
        let field = |column: RequiredColumn| {
            record
                .get(self.position(column))
                .filter(|value| !value.is_empty())
        };

        RawRecord {
            regione: field(RequiredColumn::Regione),
            provincia: field(RequiredColumn::Provincia),
            comune: field(RequiredColumn::Comune),
            strada: field(RequiredColumn::Strada),
            civico: field(RequiredColumn::Civico),
            barrato: field(RequiredColumn::Barrato),
        }
    }
}

/// The fields of one data row, borrowed from the CSV record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawRecord<'a> {
    pub regione: Option<&'a str>,
    pub provincia: Option<&'a str>,
    pub comune: Option<&'a str>,
    pub strada: Option<&'a str>,
    pub civico: Option<&'a str>,
    pub barrato: Option<&'a str>,
}

/// Outcome of classifying one row
#[derive(Debug)]
pub enum Classified<'a> {
    /// Row before the header, discarded
    Preamble,
    /// The header row; columns are now resolved
    Header(ColumnMap),
    /// A data row
    Record(RawRecord<'a>),
}

/// Stateful classifier: knows where the header is and what it resolved to
#[derive(Debug, Clone)]
pub struct RowClassifier {
    header_row: u64,
    columns: Option<ColumnMap>,
}

impl RowClassifier {
    pub fn new(header_row: u64) -> Self {
        Self {
            header_row,
            columns: None,
        }
    }

    pub fn header_row(&self) -> u64 {
        self.header_row
    }

    /// Whether the header row has been seen and resolved
    pub fn has_header(&self) -> bool {
        self.columns.is_some()
    }

    /// Classify the row at `index`. Fails only on the header row.
    pub fn classify<'r>(&mut self, index: u64, record: &'r StringRecord) -> Result<Classified<'r>> {
        if index < self.header_row {
            return Ok(Classified::Preamble);
        }

        if index == self.header_row {
            let columns =
                ColumnMap::resolve(record).map_err(|missing| IndexError::MissingColumns {
                    row: index,
                    missing: missing.iter().map(|c| c.name().to_string()).collect(),
                })?;
            self.columns = Some(columns);
            return Ok(Classified::Header(columns));
        }

        match self.columns {
            Some(columns) => Ok(Classified::Record(columns.project(record))),
            // Rows arrive in order, so the header has always been resolved here.
            None => Err(IndexError::HeaderNotFound {
                header_row: self.header_row,
                rows_read: index,
            }),
        }
    }
}
