use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use crate::byte_source::{CompressionFormat, Decoder};
use crate::error::{ColumnType, Error, Result};
use crate::progress::ProgressSink;
use crate::writer::Encoder;

/// A user override for a single column, keyed by name in [`ReaderConfig::col_types`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnTypeOverride {
    Logical,
    Integer,
    Double,
    NumberWithGrouping,
    Time,
    Date,
    DateTime,
    Character,
    Factor,
    Skip,
}

impl From<ColumnTypeOverride> for ColumnType {
    fn from(value: ColumnTypeOverride) -> Self {
        match value {
            ColumnTypeOverride::Logical => ColumnType::Logical,
            ColumnTypeOverride::Integer => ColumnType::Integer,
            ColumnTypeOverride::Double => ColumnType::Double,
            ColumnTypeOverride::NumberWithGrouping => ColumnType::NumberWithGrouping,
            ColumnTypeOverride::Time => ColumnType::Time,
            ColumnTypeOverride::Date => ColumnType::Date,
            ColumnTypeOverride::DateTime => ColumnType::DateTime,
            ColumnTypeOverride::Character => ColumnType::Character,
            ColumnTypeOverride::Factor => ColumnType::Factor,
            ColumnTypeOverride::Skip => ColumnType::Character,
        }
    }
}

/// Which columns to keep, and under what name, in the resulting table.
#[derive(Debug, Clone)]
pub enum ColSelect {
    All,
    /// Output name -> either a 0-based position or the original header name.
    Named(Vec<(String, ColumnRef)>),
}

#[derive(Debug, Clone)]
pub enum ColumnRef {
    Position(usize),
    Name(String),
}

/// Ordered list of format strings tried, in order, against the type
/// inferer's date/time/datetime samples. A caller-supplied locale replaces
/// this wholesale; the core has no built-in month-name or AM/PM table.
#[derive(Debug, Clone)]
pub struct Locale {
    pub date_formats: Vec<String>,
    pub time_formats: Vec<String>,
    pub datetime_formats: Vec<String>,
    pub decimal_mark: u8,
    pub grouping_mark: u8,
}

impl Default for Locale {
    fn default() -> Self {
        Self {
            date_formats: vec!["%Y-%m-%d".to_string(), "%Y/%m/%d".to_string(), "%m/%d/%Y".to_string()],
            time_formats: vec!["%H:%M:%S".to_string(), "%H:%M".to_string()],
            datetime_formats: vec![
                "%Y-%m-%dT%H:%M:%S".to_string(),
                "%Y-%m-%d %H:%M:%S".to_string(),
            ],
            decimal_mark: b'.',
            grouping_mark: b',',
        }
    }
}

fn env_usize(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_duration_secs(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .map(Duration::from_secs_f64)
}

/// How often progress is reported, resolved from either explicit
/// configuration or the `READER_PROGRESS_*` environment variables.
#[derive(Debug, Clone, Copy)]
pub struct ProgressCadence {
    pub show_after: Duration,
    pub update_interval: Duration,
}

impl Default for ProgressCadence {
    fn default() -> Self {
        Self {
            show_after: env_duration_secs("READER_PROGRESS_SHOW_AFTER")
                .unwrap_or(Duration::from_secs_f64(2.0)),
            update_interval: env_duration_secs("READER_PROGRESS_UPDATE_INTERVAL")
                .unwrap_or(Duration::from_millis(200)),
        }
    }
}

/// Builder for the delimited-file reader, mirroring the `XxxBuilder` idiom
/// used by this crate's other builders: chainable `&mut self -> &mut Self`
/// setters, with a final resolution step that validates and fills in
/// environment-driven defaults.
pub struct ReaderConfig {
    pub(crate) delim: Option<u8>,
    pub(crate) quote: u8,
    pub(crate) escape_double: bool,
    pub(crate) escape_backslash: bool,
    pub(crate) trim_ws: bool,
    pub(crate) comment: Option<u8>,
    pub(crate) skip: usize,
    pub(crate) n_max: Option<u64>,
    pub(crate) has_header: bool,
    pub(crate) col_names: Option<Vec<String>>,
    pub(crate) col_select: ColSelect,
    pub(crate) col_types: HashMap<String, ColumnTypeOverride>,
    pub(crate) na_strings: Vec<String>,
    pub(crate) guess_max: usize,
    pub(crate) locale: Locale,
    pub(crate) num_threads: Option<usize>,
    pub(crate) progress: Option<Arc<dyn ProgressSink>>,
    pub(crate) progress_cadence: ProgressCadence,
    pub(crate) id_column_name: Option<String>,
    pub(crate) connection_size: usize,
    pub(crate) decoders: HashMap<CompressionFormat, Arc<dyn Decoder>>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            delim: None,
            quote: b'"',
            escape_double: true,
            escape_backslash: false,
            trim_ws: false,
            comment: None,
            skip: 0,
            n_max: None,
            has_header: true,
            col_names: None,
            col_select: ColSelect::All,
            col_types: HashMap::new(),
            na_strings: vec!["".to_string(), "NA".to_string()],
            guess_max: 1000,
            locale: Locale::default(),
            num_threads: None,
            progress: None,
            progress_cadence: ProgressCadence::default(),
            id_column_name: None,
            connection_size: env_usize("READER_CONNECTION_SIZE").unwrap_or(1 << 16),
            decoders: HashMap::new(),
        }
    }
}

impl ReaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delim(&mut self, delim: u8) -> &mut Self {
        self.delim = Some(delim);
        self
    }

    pub fn quote(&mut self, quote: u8) -> &mut Self {
        self.quote = quote;
        self
    }

    pub fn escape_double(&mut self, yes: bool) -> &mut Self {
        self.escape_double = yes;
        self
    }

    pub fn escape_backslash(&mut self, yes: bool) -> &mut Self {
        self.escape_backslash = yes;
        self
    }

    pub fn trim_ws(&mut self, yes: bool) -> &mut Self {
        self.trim_ws = yes;
        self
    }

    pub fn comment(&mut self, comment: u8) -> &mut Self {
        self.comment = Some(comment);
        self
    }

    pub fn skip(&mut self, skip: usize) -> &mut Self {
        self.skip = skip;
        self
    }

    pub fn n_max(&mut self, n_max: u64) -> &mut Self {
        self.n_max = Some(n_max);
        self
    }

    pub fn has_header(&mut self, yes: bool) -> &mut Self {
        self.has_header = yes;
        self
    }

    pub fn col_names(&mut self, names: Vec<String>) -> &mut Self {
        self.col_names = Some(names);
        self
    }

    pub fn col_select(&mut self, select: ColSelect) -> &mut Self {
        self.col_select = select;
        self
    }

    pub fn col_type(&mut self, name: impl Into<String>, ty: ColumnTypeOverride) -> &mut Self {
        self.col_types.insert(name.into(), ty);
        self
    }

    pub fn na_strings(&mut self, na_strings: Vec<String>) -> &mut Self {
        self.na_strings = na_strings;
        self
    }

    pub fn guess_max(&mut self, guess_max: usize) -> &mut Self {
        self.guess_max = guess_max;
        self
    }

    pub fn locale(&mut self, locale: Locale) -> &mut Self {
        self.locale = locale;
        self
    }

    pub fn num_threads(&mut self, num_threads: usize) -> &mut Self {
        self.num_threads = Some(num_threads);
        self
    }

    pub fn progress(&mut self, sink: Arc<dyn ProgressSink>) -> &mut Self {
        self.progress = Some(sink);
        self
    }

    pub fn id_column_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.id_column_name = Some(name.into());
        self
    }

    /// Registers a streaming decoder for `format`, used by [`crate::read`]
    /// when the input path's suffix names a compressed format. Without a
    /// registered decoder, opening a `.gz`/`.bz2`/`.xz`/`.zip` path fails
    /// with a codec error rather than mapping the compressed bytes as if
    /// they were already decoded.
    pub fn decoder(&mut self, format: CompressionFormat, decoder: Arc<dyn Decoder>) -> &mut Self {
        self.decoders.insert(format, decoder);
        self
    }

    pub(crate) fn decoder_for(&self, format: CompressionFormat) -> Option<Arc<dyn Decoder>> {
        self.decoders.get(&format).cloned()
    }

    /// Number of worker threads to use, resolved from explicit
    /// configuration, then `READER_THREADS`, then available parallelism.
    pub(crate) fn resolved_num_threads(&self) -> usize {
        self.num_threads
            .or_else(|| env_usize("READER_THREADS"))
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }

    /// Validates the combination of options eagerly, before any I/O happens.
    pub fn validate(&self) -> Result<()> {
        if let Some(delim) = self.delim {
            if Some(delim) == self.comment {
                return Err(Error::delimiter_unknown());
            }
        }

        if let ColSelect::Named(pairs) = &self.col_select {
            for (_, reference) in pairs {
                if let ColumnRef::Name(name) = reference {
                    if name.is_empty() {
                        return Err(Error::unknown_column(name.clone()));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Applies `config.col_names` as a positional rename of `physical_names`,
/// the header (or `X1..XC` defaults) the indexer produced. Names past the
/// end of `config.col_names` (or the whole list, if `col_names` is unset)
/// are left as-is.
pub(crate) fn apply_col_names(physical_names: &[String], config: &ReaderConfig) -> Vec<String> {
    let mut renamed = physical_names.to_vec();

    if let Some(names) = &config.col_names {
        for (i, name) in names.iter().enumerate() {
            if let Some(slot) = renamed.get_mut(i) {
                *slot = name.clone();
            }
        }
    }

    renamed
}

/// Resolves `config.col_select` against `renamed_names` (the names left by
/// [`apply_col_names`]) into `(output_name, physical_column_index)` pairs,
/// in output order. A [`ColumnRef::Name`] or [`ColumnRef::Position`] that
/// doesn't resolve to an existing column is an `UnknownColumn` error. An
/// empty output name in a `col_select` pair falls back to the column's
/// already-renamed name.
pub(crate) fn resolve_col_select(
    renamed_names: &[String],
    config: &ReaderConfig,
) -> Result<Vec<(String, usize)>> {
    match &config.col_select {
        ColSelect::All => Ok(renamed_names
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, name)| (name, i))
            .collect()),
        ColSelect::Named(pairs) => pairs
            .iter()
            .map(|(out_name, reference)| {
                let phys = match reference {
                    ColumnRef::Position(p) => *p,
                    ColumnRef::Name(name) => renamed_names
                        .iter()
                        .position(|n| n == name)
                        .ok_or_else(|| Error::unknown_column(name.clone()))?,
                };

                let resolved_name = renamed_names
                    .get(phys)
                    .ok_or_else(|| Error::unknown_column(format!("position {}", phys)))?;

                let name = if out_name.is_empty() {
                    resolved_name.clone()
                } else {
                    out_name.clone()
                };

                Ok((name, phys))
            })
            .collect(),
    }
}

/// Quoting policy for the writer, matching the three modes named in this
/// crate's writer interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuotingPolicy {
    #[default]
    Needs,
    Always,
    Never,
}

pub struct WriterConfig {
    pub(crate) delim: u8,
    pub(crate) quote: u8,
    pub(crate) quoting: QuotingPolicy,
    pub(crate) chunk_rows: usize,
    pub(crate) num_threads: Option<usize>,
    pub(crate) encoders: HashMap<CompressionFormat, Arc<dyn Encoder>>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            delim: b',',
            quote: b'"',
            quoting: QuotingPolicy::default(),
            chunk_rows: 1 << 15,
            num_threads: None,
            encoders: HashMap::new(),
        }
    }
}

impl WriterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delim(&mut self, delim: u8) -> &mut Self {
        self.delim = delim;
        self
    }

    pub fn quote(&mut self, quote: u8) -> &mut Self {
        self.quote = quote;
        self
    }

    pub fn quoting(&mut self, policy: QuotingPolicy) -> &mut Self {
        self.quoting = policy;
        self
    }

    pub fn chunk_rows(&mut self, chunk_rows: usize) -> &mut Self {
        self.chunk_rows = chunk_rows;
        self
    }

    pub fn num_threads(&mut self, num_threads: usize) -> &mut Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Registers a streaming encoder for `format`, used by
    /// [`crate::writer::create_sink_for`] when the output path's suffix
    /// names a compressed format (`.gz`, `.bz2`, `.xz` on write; `.zip` is
    /// not a write target per §6).
    pub fn encoder(&mut self, format: CompressionFormat, encoder: Arc<dyn Encoder>) -> &mut Self {
        self.encoders.insert(format, encoder);
        self
    }

    pub(crate) fn encoder_for(&self, format: CompressionFormat) -> Option<Arc<dyn Encoder>> {
        self.encoders.get(&format).cloned()
    }

    pub(crate) fn resolved_num_threads(&self) -> usize {
        self.num_threads
            .or_else(|| env_usize("READER_THREADS"))
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_na_strings() {
        let config = ReaderConfig::new();
        assert_eq!(config.na_strings, vec!["".to_string(), "NA".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_delim_equal_to_comment() {
        let mut config = ReaderConfig::new();
        config.delim(b'#').comment(b'#');
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_col_select_by_position_with_default_name() {
        let mut config = ReaderConfig::new();
        config.col_select(ColSelect::Named(vec![
            ("car".to_string(), ColumnRef::Position(1)),
            ("".to_string(), ColumnRef::Position(3)),
        ]));

        let physical = vec!["mpg".to_string(), "cyl".to_string(), "disp".to_string(), "hp".to_string()];
        let renamed = apply_col_names(&physical, &config);
        let selected = resolve_col_select(&renamed, &config).unwrap();

        assert_eq!(
            selected,
            vec![("car".to_string(), 1), ("hp".to_string(), 3)]
        );
    }

    #[test]
    fn test_resolve_col_select_unknown_name_errors() {
        let mut config = ReaderConfig::new();
        config.col_select(ColSelect::Named(vec![("x".to_string(), ColumnRef::Name("nope".to_string()))]));

        let physical = vec!["a".to_string(), "b".to_string()];
        let renamed = apply_col_names(&physical, &config);
        assert!(resolve_col_select(&renamed, &config).is_err());
    }

    #[test]
    fn test_col_names_rename_then_col_select_by_renamed_name() {
        let mut config = ReaderConfig::new();
        config.col_names(vec!["first".to_string(), "second".to_string()]);
        config.col_select(ColSelect::Named(vec![("".to_string(), ColumnRef::Name("second".to_string()))]));

        let physical = vec!["a".to_string(), "b".to_string()];
        let renamed = apply_col_names(&physical, &config);
        let selected = resolve_col_select(&renamed, &config).unwrap();

        assert_eq!(selected, vec![("second".to_string(), 1)]);
    }

    #[test]
    fn test_writer_defaults() {
        let config = WriterConfig::new();
        assert_eq!(config.chunk_rows, 1 << 15);
        assert_eq!(config.quoting, QuotingPolicy::Needs);
    }
}
