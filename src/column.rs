use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::byte_source::ByteSource;
use crate::config::{apply_col_names, resolve_col_select, ReaderConfig};
use crate::error::{ColumnType, Problem, ProblemKind, Result};
use crate::index::Index;
use crate::infer::{infer_columns, InferredColumn};
use crate::utils::{unescape, unquoted};

/// A single converted value, or NA. Borrows nothing: callers that want the
/// zero-copy path for character columns should use
/// [`ColumnStore::get_bytes`] instead of [`ColumnStore::get`].
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Logical(bool),
    Integer(i64),
    Double(f64),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Character(String),
    Na,
}

/// A dense typed array produced by [`ColumnStore::materialize`]. Once
/// present, every subsequent read bypasses the byte source entirely.
#[derive(Debug, Clone)]
enum Materialized {
    Logical(Vec<Option<bool>>),
    Integer(Vec<Option<i64>>),
    Double(Vec<Option<f64>>),
    Date(Vec<Option<NaiveDate>>),
    Time(Vec<Option<NaiveTime>>),
    DateTime(Vec<Option<NaiveDateTime>>),
    Character(Vec<Option<String>>),
}

impl Materialized {
    fn get(&self, row: usize) -> Cell {
        match self {
            Materialized::Logical(v) => v[row].map(Cell::Logical).unwrap_or(Cell::Na),
            Materialized::Integer(v) => v[row].map(Cell::Integer).unwrap_or(Cell::Na),
            Materialized::Double(v) => v[row].map(Cell::Double).unwrap_or(Cell::Na),
            Materialized::Date(v) => v[row].map(Cell::Date).unwrap_or(Cell::Na),
            Materialized::Time(v) => v[row].map(Cell::Time).unwrap_or(Cell::Na),
            Materialized::DateTime(v) => v[row].map(Cell::DateTime).unwrap_or(Cell::Na),
            Materialized::Character(v) => v[row].clone().map(Cell::Character).unwrap_or(Cell::Na),
        }
    }
}

/// Once the fraction of distinct rows requested through [`Table::get`]
/// exceeds this, the column materializes itself eagerly rather than
/// continuing to pay a byte-source round trip per call. Chosen so that a
/// caller doing a near-complete scalar scan of a column pays one dense
/// build instead of many repeated conversions; a caller touching only a
/// handful of rows never pays it at all.
const AUTO_MATERIALIZE_THRESHOLD: f64 = 0.25;

/// One column's binding to `(index, byte source, type, converter)`. Scalar
/// reads go straight to the byte source and convert on the fly; a
/// `OnceLock` latch means at most one caller ever pays the cost of
/// building the dense materialized array, and every other caller either
/// sees it already built or blocks until it is.
pub struct ColumnStore {
    pub name: String,
    pub ty: ColumnType,
    format: Option<String>,
    na_strings: Vec<String>,
    /// Index into the underlying `Index`'s columns — distinct from this
    /// column's position in `Table::columns` once `col_select` reorders or
    /// subsets the physical columns.
    phys_col: usize,
    /// This column's position in the table actually handed to callers,
    /// used to label `Problem`s the way a caller sees the table.
    output_col: usize,
    materialized: OnceLock<Materialized>,
    requested_rows: Mutex<HashSet<u64>>,
}

fn is_na(bytes: &[u8], na_strings: &[String]) -> bool {
    na_strings.iter().any(|na| na.as_bytes() == bytes)
}

/// Strips a single pair of surrounding quotes and collapses doubled quotes,
/// the same unescaping [`crate::records::ByteRecord`] applies to quoted
/// fields read through the row-oriented path.
fn unquote_and_unescape(bytes: &[u8], quote: u8) -> std::borrow::Cow<[u8]> {
    match unquoted(bytes, quote) {
        Some(inner) => unescape(inner, quote),
        None => std::borrow::Cow::Borrowed(bytes),
    }
}

impl ColumnStore {
    fn convert(&self, bytes: &[u8], row: u64) -> std::result::Result<Cell, Problem> {
        if is_na(bytes, &self.na_strings) {
            return Ok(Cell::Na);
        }

        let text = match std::str::from_utf8(bytes) {
            Ok(s) => s,
            Err(_) => {
                return Err(Problem {
                    row,
                    col: self.output_col,
                    kind: ProblemKind::ParseFailure {
                        expected_type: self.ty,
                        bytes: bytes.to_vec(),
                    },
                })
            }
        };

        let fail = || Problem {
            row,
            col: self.output_col,
            kind: ProblemKind::ParseFailure {
                expected_type: self.ty,
                bytes: bytes.to_vec(),
            },
        };

        match self.ty {
            ColumnType::Logical => match text {
                "TRUE" | "True" | "true" | "T" => Ok(Cell::Logical(true)),
                "FALSE" | "False" | "false" | "F" => Ok(Cell::Logical(false)),
                _ => Err(fail()),
            },
            ColumnType::Integer => text.parse::<i64>().map(Cell::Integer).map_err(|_| fail()),
            ColumnType::Double => text.parse::<f64>().map(Cell::Double).map_err(|_| fail()),
            ColumnType::NumberWithGrouping => {
                let stripped: String = text.chars().filter(|&c| c != ',').collect();
                stripped.parse::<f64>().map(Cell::Double).map_err(|_| fail())
            }
            ColumnType::Time => {
                let format = self.format.as_deref().unwrap_or("%H:%M:%S");
                NaiveTime::parse_from_str(text, format)
                    .map(Cell::Time)
                    .map_err(|_| fail())
            }
            ColumnType::Date => {
                let format = self.format.as_deref().unwrap_or("%Y-%m-%d");
                NaiveDate::parse_from_str(text, format)
                    .map(Cell::Date)
                    .map_err(|_| fail())
            }
            ColumnType::DateTime => {
                let format = self.format.as_deref().unwrap_or("%Y-%m-%dT%H:%M:%S");
                NaiveDateTime::parse_from_str(text, format)
                    .map(Cell::DateTime)
                    .map_err(|_| fail())
            }
            ColumnType::Character | ColumnType::Factor => Ok(Cell::Character(text.to_string())),
        }
    }

    fn materialize(&self, source: &ByteSource, index: &Index) -> &Materialized {
        self.materialized.get_or_init(|| {
            let rows = index.rows() as usize;
            let data = source.as_slice();

            macro_rules! collect {
                ($variant:ident) => {{
                    let mut out = Vec::with_capacity(rows);
                    for row in 0..rows as u64 {
                        let (lo, hi) = index.field_bounds(row, self.phys_col);
                        let raw = &data[lo as usize..hi as usize];
                        let unescaped = unquote_and_unescape(raw, index.quote());
                        out.push(match self.convert(&unescaped, row) {
                            Ok(Cell::$variant(v)) => Some(v),
                            _ => None,
                        });
                    }
                    Materialized::$variant(out)
                }};
            }

            match self.ty {
                ColumnType::Logical => collect!(Logical),
                ColumnType::Integer => collect!(Integer),
                ColumnType::Double | ColumnType::NumberWithGrouping => collect!(Double),
                ColumnType::Time => collect!(Time),
                ColumnType::Date => collect!(Date),
                ColumnType::DateTime => collect!(DateTime),
                ColumnType::Character | ColumnType::Factor => {
                    let mut out = Vec::with_capacity(rows);
                    for row in 0..rows as u64 {
                        let (lo, hi) = index.field_bounds(row, self.phys_col);
                        let raw = &data[lo as usize..hi as usize];
                        if is_na(raw, &self.na_strings) {
                            out.push(None);
                        } else {
                            let unescaped = unquote_and_unescape(raw, index.quote());
                            out.push(Some(String::from_utf8_lossy(&unescaped).into_owned()));
                        }
                    }
                    Materialized::Character(out)
                }
            }
        })
    }

    /// Reads one cell, tracking distinct rows requested through this path so
    /// far. Once that fraction crosses [`AUTO_MATERIALIZE_THRESHOLD`], the
    /// column materializes itself and every subsequent call (including this
    /// one) is served from the dense array instead of the byte source.
    fn get_tracked(&self, source: &ByteSource, index: &Index, row: u64) -> std::result::Result<Cell, Problem> {
        if let Some(materialized) = self.materialized.get() {
            return Ok(materialized.get(row as usize));
        }

        let total_rows = index.rows().max(1) as usize;
        let crossed = {
            let mut requested = self.requested_rows.lock().unwrap();
            requested.insert(row);
            requested.len() as f64 / total_rows as f64 > AUTO_MATERIALIZE_THRESHOLD
        };

        if crossed {
            return Ok(self.materialize(source, index).get(row as usize));
        }

        let (lo, hi) = index.field_bounds(row, self.phys_col);
        let raw = &source.as_slice()[lo as usize..hi as usize];
        let unescaped = unquote_and_unescape(raw, index.quote());
        self.convert(&unescaped, row)
    }
}

/// The full set of columns bound to one byte source and index, as produced
/// by opening a delimited file. Column access is lazy by default;
/// [`Table::materialize_all`] forces every column into its dense array up
/// front.
pub struct Table {
    source: ByteSource,
    index: Index,
    columns: Vec<ColumnStore>,
    problems: Vec<Problem>,
}

impl Table {
    pub(crate) fn new(
        source: ByteSource,
        index: Index,
        col_names: Vec<String>,
        config: &ReaderConfig,
    ) -> Result<Self> {
        let renamed = apply_col_names(&col_names, config);
        let inferred: Vec<InferredColumn> = infer_columns(&source, &index, &renamed, config);
        let selected = resolve_col_select(&renamed, config)?;

        let columns = selected
            .into_iter()
            .filter(|&(_, phys_col)| !inferred[phys_col].skip)
            .enumerate()
            .map(|(output_col, (name, phys_col))| {
                let inferred = &inferred[phys_col];
                ColumnStore {
                    name,
                    ty: inferred.ty,
                    format: inferred.format.clone(),
                    na_strings: config.na_strings.clone(),
                    phys_col,
                    output_col,
                    materialized: OnceLock::new(),
                    requested_rows: Mutex::new(HashSet::new()),
                }
            })
            .collect();

        let problems = index
            .shape_deviations()
            .iter()
            .map(|&(row, found)| Problem {
                row,
                col: 0,
                kind: ProblemKind::ColumnCountMismatch {
                    expected: index.cols(),
                    found,
                },
            })
            .collect();

        Ok(Table {
            source,
            index,
            columns,
            problems,
        })
    }

    pub fn rows(&self) -> u64 {
        self.index.rows()
    }

    pub fn cols(&self) -> usize {
        self.columns.len()
    }

    pub fn col_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn col_type(&self, col: usize) -> ColumnType {
        self.columns[col].ty
    }

    pub fn col_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Per-cell and per-row problems recorded while converting values or
    /// while indexing (row-shape deviations), ordered by `(row, col)`.
    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    /// Raw, unescaped bytes for a character column whose field required no
    /// quote-unescaping: the only case where a caller can read a field
    /// without any copy at all. Bypasses the auto-materialize tracker,
    /// since forcing a dense `Vec<String>` here would defeat the point of
    /// the zero-copy path.
    pub fn get_bytes(&self, row: u64, col: usize) -> Option<&[u8]> {
        let column = &self.columns[col];

        if !matches!(column.ty, ColumnType::Character | ColumnType::Factor) {
            return None;
        }

        let (lo, hi) = self.index.field_bounds(row, column.phys_col);
        let raw = &self.source.as_slice()[lo as usize..hi as usize];

        if unquoted(raw, self.index.quote()).is_some() || memchr::memchr(self.index.quote(), raw).is_some() {
            return None;
        }

        Some(raw)
    }

    /// Reads and converts a single cell. Does not force materialization
    /// immediately, but repeated calls against a wide swath of a column's
    /// rows will trigger it; see [`ColumnStore::get_tracked`].
    pub fn get(&mut self, row: u64, col: usize) -> Cell {
        let column = &self.columns[col];

        match column.get_tracked(&self.source, &self.index, row) {
            Ok(cell) => cell,
            Err(problem) => {
                self.problems.push(problem);
                Cell::Na
            }
        }
    }

    /// Forces the named column into its dense materialized array and
    /// returns it. Scalar reads through [`Self::get`] still go straight to
    /// the byte source until the auto-materialize threshold is crossed;
    /// only this accessor and [`Self::materialize_all`] force it
    /// unconditionally.
    pub fn materialize(&self, col: usize) -> Vec<Cell> {
        let column = &self.columns[col];
        let materialized = column.materialize(&self.source, &self.index);
        (0..self.index.rows() as usize).map(|r| materialized.get(r)).collect()
    }

    pub fn materialize_all(&self) {
        for col in 0..self.columns.len() {
            self.columns[col].materialize(&self.source, &self.index);
        }
    }
}
