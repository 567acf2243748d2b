use std::borrow::Cow;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::byte_source::ByteSource;
use crate::config::{ColumnTypeOverride, ReaderConfig};
use crate::error::ColumnType;
use crate::index::Index;
use crate::utils::{unescape, unquoted};

/// The result of inference for a single column: the type that accepted
/// every sampled value, the winning format string for time-like types, and
/// whether the column should be excluded from the store entirely.
#[derive(Debug, Clone)]
pub struct InferredColumn {
    pub ty: ColumnType,
    pub format: Option<String>,
    pub skip: bool,
}

/// Row numbers to sample: the first, the last, and `guess_max - 2` more
/// spread evenly in between, deduplicated. All come straight from the
/// index, so inference never re-scans rows it won't use.
fn sample_rows(rows: u64, guess_max: usize) -> Vec<u64> {
    if rows == 0 {
        return Vec::new();
    }

    if guess_max == 0 || rows as usize <= guess_max {
        return (0..rows).collect();
    }

    let mut picked = Vec::with_capacity(guess_max);
    let last = rows - 1;
    let step = rows as f64 / guess_max as f64;

    for i in 0..guess_max {
        let r = ((i as f64) * step) as u64;
        picked.push(r.min(last));
    }

    picked.push(last);
    picked.dedup();
    picked
}

fn trimmed(bytes: &[u8]) -> &[u8] {
    let mut lo = 0;
    let mut hi = bytes.len();

    while lo < hi && (bytes[lo] == b' ' || bytes[lo] == b'\t') {
        lo += 1;
    }

    while hi > lo && (bytes[hi - 1] == b' ' || bytes[hi - 1] == b'\t') {
        hi -= 1;
    }

    &bytes[lo..hi]
}

fn is_na(bytes: &[u8], na_strings: &[String]) -> bool {
    na_strings.iter().any(|na| na.as_bytes() == bytes)
}

/// Strips surrounding quotes and collapses doubled quotes before
/// classification, the same unescaping [`crate::column::ColumnStore`]
/// applies before converting: a column whose values are always quoted
/// (`"123"`, `"456"`) must still classify as numeric, not character, just
/// because its raw bytes carry quote marks.
fn unquote_and_unescape(bytes: &[u8], quote: u8) -> Cow<[u8]> {
    match unquoted(bytes, quote) {
        Some(inner) => unescape(inner, quote),
        None => Cow::Borrowed(bytes),
    }
}

fn is_logical(bytes: &[u8]) -> bool {
    matches!(
        bytes,
        b"TRUE" | b"FALSE" | b"True" | b"False" | b"true" | b"false" | b"T" | b"F"
    )
}

fn is_integer(bytes: &[u8]) -> bool {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .is_some()
}

fn is_double(bytes: &[u8], decimal_mark: u8) -> bool {
    let normalized: Vec<u8> = bytes
        .iter()
        .map(|&b| if b == decimal_mark { b'.' } else { b })
        .collect();

    std::str::from_utf8(&normalized)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .is_some()
}

fn is_number_with_grouping(bytes: &[u8], decimal_mark: u8, grouping_mark: u8) -> bool {
    if !bytes.contains(&grouping_mark) {
        return false;
    }

    let stripped: Vec<u8> = bytes.iter().copied().filter(|&b| b != grouping_mark).collect();
    is_double(&stripped, decimal_mark)
}

/// Finds the first format in `formats` that parses every sample with
/// `parse`, returning it if one exists.
fn winning_format<'a, T>(
    samples: &[Cow<[u8]>],
    formats: &'a [String],
    parse: impl Fn(&str, &str) -> Option<T>,
) -> Option<&'a str> {
    formats.iter().find(|format| {
        samples.iter().all(|bytes| {
            std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| parse(s, format))
                .is_some()
        })
    }).map(|s| s.as_str())
}

fn parse_time(s: &str, format: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, format).ok()
}

fn parse_date(s: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, format).ok()
}

fn parse_datetime(s: &str, format: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, format).ok()
}

/// Samples up to `config.guess_max` rows per column and classifies each
/// column by the first type, in priority order, that accepts every
/// non-NA sample. User overrides in `config.col_types` skip inference
/// entirely for the named column.
pub(crate) fn infer_columns(
    source: &ByteSource,
    index: &Index,
    col_names: &[String],
    config: &ReaderConfig,
) -> Vec<InferredColumn> {
    let rows = sample_rows(index.rows(), config.guess_max);
    let data = source.as_slice();

    (0..index.cols())
        .map(|col| {
            if let Some(name) = col_names.get(col) {
                if let Some(&override_ty) = config.col_types.get(name) {
                    return InferredColumn {
                        skip: override_ty == ColumnTypeOverride::Skip,
                        ty: override_ty.into(),
                        format: None,
                    };
                }
            }

            let samples: Vec<Cow<[u8]>> = rows
                .iter()
                .map(|&row| {
                    let (lo, hi) = index.field_bounds(row, col);
                    let raw = trimmed(&data[lo as usize..hi as usize]);
                    unquote_and_unescape(raw, index.quote())
                })
                .filter(|bytes| !is_na(bytes, &config.na_strings))
                .collect();

            if samples.is_empty() {
                return InferredColumn {
                    ty: ColumnType::Character,
                    format: None,
                    skip: false,
                };
            }

            if samples.iter().all(|s| is_logical(s)) {
                return InferredColumn {
                    ty: ColumnType::Logical,
                    format: None,
                    skip: false,
                };
            }

            if samples.iter().all(|s| is_integer(s)) {
                return InferredColumn {
                    ty: ColumnType::Integer,
                    format: None,
                    skip: false,
                };
            }

            if samples.iter().all(|s| is_double(s, config.locale.decimal_mark)) {
                return InferredColumn {
                    ty: ColumnType::Double,
                    format: None,
                    skip: false,
                };
            }

            if samples
                .iter()
                .all(|s| is_number_with_grouping(s, config.locale.decimal_mark, config.locale.grouping_mark))
            {
                return InferredColumn {
                    ty: ColumnType::NumberWithGrouping,
                    format: None,
                    skip: false,
                };
            }

            if let Some(format) = winning_format(&samples, &config.locale.time_formats, parse_time) {
                return InferredColumn {
                    ty: ColumnType::Time,
                    format: Some(format.to_string()),
                    skip: false,
                };
            }

            if let Some(format) = winning_format(&samples, &config.locale.date_formats, parse_date) {
                return InferredColumn {
                    ty: ColumnType::Date,
                    format: Some(format.to_string()),
                    skip: false,
                };
            }

            if let Some(format) = winning_format(&samples, &config.locale.datetime_formats, parse_datetime) {
                return InferredColumn {
                    ty: ColumnType::DateTime,
                    format: Some(format.to_string()),
                    skip: false,
                };
            }

            InferredColumn {
                ty: ColumnType::Character,
                format: None,
                skip: false,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::build_index;

    fn build(input: &[u8], config: &ReaderConfig) -> (ByteSource, Index, Vec<String>) {
        let source = ByteSource::from_bytes(input.to_vec());
        let build = build_index(&source, config, None).unwrap();
        (source, build.index, build.col_names)
    }

    #[test]
    fn test_infer_integer_and_character() {
        let config = ReaderConfig::new();
        let (source, index, names) = build(b"id,name\n1,alice\n2,bob\n3,carol\n", &config);
        let inferred = infer_columns(&source, &index, &names, &config);

        assert_eq!(inferred[0].ty, ColumnType::Integer);
        assert_eq!(inferred[1].ty, ColumnType::Character);
    }

    #[test]
    fn test_infer_double_with_na() {
        let config = ReaderConfig::new();
        let (source, index, names) = build(b"value\n1.5\nNA\n3.25\n", &config);
        let inferred = infer_columns(&source, &index, &names, &config);

        assert_eq!(inferred[0].ty, ColumnType::Double);
    }

    #[test]
    fn test_infer_logical() {
        let config = ReaderConfig::new();
        let (source, index, names) = build(b"flag\nTRUE\nFALSE\nTRUE\n", &config);
        let inferred = infer_columns(&source, &index, &names, &config);

        assert_eq!(inferred[0].ty, ColumnType::Logical);
    }

    #[test]
    fn test_infer_date() {
        let config = ReaderConfig::new();
        let (source, index, names) = build(b"d\n2024-01-01\n2024-02-15\n", &config);
        let inferred = infer_columns(&source, &index, &names, &config);

        assert_eq!(inferred[0].ty, ColumnType::Date);
        assert_eq!(inferred[0].format.as_deref(), Some("%Y-%m-%d"));
    }

    #[test]
    fn test_infer_integer_when_always_quoted() {
        let config = ReaderConfig::new();
        let (source, index, names) = build(b"id\n\"1\"\n\"2\"\n\"3\"\n", &config);
        let inferred = infer_columns(&source, &index, &names, &config);

        assert_eq!(inferred[0].ty, ColumnType::Integer);
    }

    #[test]
    fn test_col_type_override_skip() {
        let mut config = ReaderConfig::new();
        config.col_type("name", ColumnTypeOverride::Skip);
        let (source, index, names) = build(b"id,name\n1,alice\n2,bob\n", &config);
        let inferred = infer_columns(&source, &index, &names, &config);

        assert!(inferred[1].skip);
    }
}
