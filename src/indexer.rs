use std::sync::atomic::{AtomicU64, Ordering};

use memchr::memchr_iter;

use crate::byte_source::ByteSource;
use crate::config::ReaderConfig;
use crate::error::{Error, Result};
use crate::index::{Index, Newline};
use crate::progress::{Progress, ProgressCtx};
use crate::records::ByteRecord;

/// Below this size, or when the source isn't memory-mapped, indexing runs
/// on a single thread: the fixed cost of finding safe chunk boundaries
/// isn't worth paying for small inputs.
const PARALLEL_THRESHOLD: usize = 1 << 16;

/// Rows scanned between progress-counter flushes. Small enough that a
/// caller's sink sees motion well before a large file finishes, large
/// enough that the atomic adds and cadence check don't show up per-row.
const PROGRESS_REPORT_ROWS: u64 = 4096;

const DELIM_CANDIDATES: [u8; 5] = [b',', b'\t', b'|', b';', b':'];

pub(crate) struct IndexBuild {
    pub index: Index,
    pub col_names: Vec<String>,
}

/// Guesses the field delimiter from a sample of the leading bytes by
/// counting candidate occurrences per line outside quoted regions and
/// picking whichever is both most frequent and constant across lines.
fn guess_delimiter(sample: &[u8], quote: u8) -> Result<u8> {
    let mut lines: Vec<&[u8]> = Vec::new();
    let mut start = 0;
    let mut in_quote = false;

    for (i, &b) in sample.iter().enumerate() {
        if b == quote {
            in_quote = !in_quote;
        } else if b == b'\n' && !in_quote {
            lines.push(&sample[start..i]);
            start = i + 1;

            if lines.len() >= 5 {
                break;
            }
        }
    }

    if start < sample.len() && lines.len() < 5 {
        lines.push(&sample[start..]);
    }

    lines.retain(|line| !line.is_empty());

    if lines.is_empty() {
        return Err(Error::delimiter_unknown());
    }

    let mut best: Option<(u8, usize)> = None;

    for &candidate in &DELIM_CANDIDATES {
        let counts: Vec<usize> = lines
            .iter()
            .map(|line| memchr_iter(candidate, line).count())
            .collect();

        let first = counts[0];

        if first == 0 || !counts.iter().all(|&c| c == first) {
            continue;
        }

        if best.map(|(_, best_count)| first > best_count).unwrap_or(true) {
            best = Some((candidate, first));
        }
    }

    best.map(|(d, _)| d).ok_or_else(Error::delimiter_unknown)
}

struct ScanCfg {
    delimiter: u8,
    quote: u8,
    escape_double: bool,
    comment: Option<u8>,
    trim_ws: bool,
}

#[derive(Clone, Copy)]
enum State {
    FieldStart,
    Unquoted,
    Quoted,
    QuotedMaybeEnd,
}

/// One worker's output: absolute field-start offsets, row ends, and real
/// field counts for the row range it scanned, plus bookkeeping shared with
/// the driver (newline convention seen, whether escaping fired, deviating
/// rows).
struct ScanOutcome {
    offsets: Vec<u64>,
    row_ends: Vec<u64>,
    real_cols: Vec<u32>,
    cols: usize,
    newline_is_crlf: bool,
    had_escaped_quotes: bool,
    shape_deviations: Vec<(u64, usize)>,
}

/// Scans `data[start..end]` as a sequence of complete records, starting in
/// field-start state (`start` must be a genuine record boundary). If
/// `expected_cols` is `None`, the first record's field count becomes the
/// column count for every row scanned here. `row_base` is the 0-based
/// output row number of the first record in this range, used only to label
/// shape deviations.
fn scan_range(
    data: &[u8],
    start: usize,
    end: usize,
    cfg: &ScanCfg,
    expected_cols: Option<usize>,
    row_base: u64,
    n_max_remaining: Option<&AtomicU64>,
    progress: Option<ProgressCtx>,
) -> ScanOutcome {
    let mut offsets = Vec::new();
    let mut row_ends = Vec::new();
    let mut real_cols = Vec::new();
    let mut shape_deviations = Vec::new();
    let mut cols = expected_cols.unwrap_or(0);
    let mut newline_is_crlf = false;
    let mut had_escaped_quotes = false;

    let mut pos = start;
    let mut row_index = row_base;
    let mut last_reported_pos = start;
    let mut rows_since_report: u64 = 0;

    while pos < end {
        if data[pos] == b'\n' {
            pos += 1;
            continue;
        }

        if pos + 1 < end && data[pos] == b'\r' && data[pos + 1] == b'\n' {
            pos += 2;
            continue;
        }

        if let Some(comment) = cfg.comment {
            if data[pos] == comment {
                match memchr::memchr(b'\n', &data[pos..end]) {
                    Some(offset) => pos += offset + 1,
                    None => pos = end,
                }
                continue;
            }
        }

        if let Some(limit) = n_max_remaining {
            let previous = limit.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                if n == 0 {
                    None
                } else {
                    Some(n - 1)
                }
            });

            if previous.is_err() {
                break;
            }
        }

        let mut field_starts: Vec<u64> = vec![pos as u64];
        let mut state = State::FieldStart;
        let mut scan_pos = pos;
        let row_end;

        loop {
            if scan_pos >= end {
                row_end = scan_pos as u64;
                pos = end;
                break;
            }

            let byte = data[scan_pos];

            match state {
                State::FieldStart => {
                    if byte == cfg.quote {
                        state = State::Quoted;
                        scan_pos += 1;
                    } else {
                        state = State::Unquoted;
                    }
                }
                State::Unquoted => {
                    if byte == cfg.delimiter {
                        field_starts.push(scan_pos as u64 + 1);
                        scan_pos += 1;
                        state = State::FieldStart;
                    } else if byte == b'\n' {
                        row_end = scan_pos as u64;
                        pos = scan_pos + 1;
                        break;
                    } else if byte == b'\r' && scan_pos + 1 < end && data[scan_pos + 1] == b'\n' {
                        row_end = scan_pos as u64;
                        pos = scan_pos + 2;
                        newline_is_crlf = true;
                        break;
                    } else {
                        scan_pos += 1;
                    }
                }
                State::Quoted => {
                    if byte == cfg.quote {
                        state = State::QuotedMaybeEnd;
                    }

                    scan_pos += 1;
                }
                State::QuotedMaybeEnd => {
                    if byte == cfg.quote && cfg.escape_double {
                        had_escaped_quotes = true;
                        state = State::Quoted;
                        scan_pos += 1;
                    } else if byte == cfg.delimiter {
                        field_starts.push(scan_pos as u64 + 1);
                        scan_pos += 1;
                        state = State::FieldStart;
                    } else if byte == b'\n' {
                        row_end = scan_pos as u64;
                        pos = scan_pos + 1;
                        break;
                    } else if byte == b'\r' && scan_pos + 1 < end && data[scan_pos + 1] == b'\n' {
                        row_end = scan_pos as u64;
                        pos = scan_pos + 2;
                        newline_is_crlf = true;
                        break;
                    } else if cfg.trim_ws && (byte == b' ' || byte == b'\t') {
                        scan_pos += 1;
                    } else {
                        // Not a valid quote/delimiter/newline after a
                        // closing quote: tolerate it as literal content
                        // rather than failing the whole scan.
                        state = State::Unquoted;
                        scan_pos += 1;
                    }
                }
            }
        }

        let found_cols = field_starts.len();

        if cols == 0 {
            cols = found_cols;
        }

        if found_cols != cols {
            shape_deviations.push((row_index, found_cols));
        }

        let real = found_cols.min(cols) as u32;

        for c in 0..cols {
            if c < field_starts.len() {
                offsets.push(field_starts[c]);
            } else {
                offsets.push(row_end);
            }
        }

        row_ends.push(row_end);
        real_cols.push(real);
        row_index += 1;
        rows_since_report += 1;

        if let Some(ctx) = progress {
            if rows_since_report >= PROGRESS_REPORT_ROWS {
                ctx.advance((pos - last_reported_pos) as u64, rows_since_report);
                last_reported_pos = pos;
                rows_since_report = 0;
            }
        }
    }

    if let Some(ctx) = progress {
        if rows_since_report > 0 || pos > last_reported_pos {
            ctx.advance((pos - last_reported_pos) as u64, rows_since_report);
        }
    }

    ScanOutcome {
        offsets,
        row_ends,
        real_cols,
        cols: cols.max(1),
        newline_is_crlf,
        had_escaped_quotes,
        shape_deviations,
    }
}

/// Scans forward from a nominal chunk boundary to the next position that is
/// provably a record start: a newline not inside a quoted field. `in_quote`
/// is the caller's belief about whether `pos` itself sits inside a quoted
/// region, derived from a parity count over everything before it.
fn find_safe_boundary(
    data: &[u8],
    mut pos: usize,
    end: usize,
    quote: u8,
    mut in_quote: bool,
) -> usize {
    while pos < end {
        let byte = data[pos];

        if byte == quote {
            in_quote = !in_quote;
        } else if byte == b'\n' && !in_quote {
            return pos + 1;
        }

        pos += 1;
    }

    end
}

fn quote_count(data: &[u8], start: usize, end: usize, quote: u8) -> u64 {
    memchr_iter(quote, &data[start..end]).count() as u64
}

/// Builds an [`Index`] over `source` per `config`, parallelizing the scan
/// across a fixed worker pool when the source is large and memory-mapped.
pub(crate) fn build_index(
    source: &ByteSource,
    config: &ReaderConfig,
    progress: Option<&Progress>,
) -> Result<IndexBuild> {
    let data = source.as_slice();

    let delimiter = match config.delim {
        Some(d) => d,
        None => guess_delimiter(&data[..data.len().min(64 * 1024)], config.quote)?,
    };

    let mut pos = 0usize;

    // Skip `skip` physical lines (quote-aware).
    for _ in 0..config.skip {
        pos = find_safe_boundary(data, pos, data.len(), config.quote, false);
    }

    // Skip leading comment lines.
    if let Some(comment) = config.comment {
        while pos < data.len() && data[pos] == comment {
            pos = find_safe_boundary(data, pos, data.len(), config.quote, false);
        }
    }

    let scan_cfg = ScanCfg {
        delimiter,
        quote: config.quote,
        escape_double: config.escape_double,
        comment: config.comment,
        trim_ws: config.trim_ws,
    };

    let mut header_range = None;
    let mut col_names: Vec<String> = Vec::new();

    if config.has_header && pos < data.len() {
        let header_end = find_safe_boundary(data, pos, data.len(), config.quote, false);
        let header_outcome = scan_range(data, pos, header_end, &scan_cfg, None, 0, None, None);

        if let Some(&first_end) = header_outcome.row_ends.first() {
            header_range = Some((pos as u64, first_end));

            let cols = header_outcome.cols;
            let mut record = ByteRecord::new();

            for c in 0..cols {
                let lo = header_outcome.offsets[c] as usize;
                let hi = if c + 1 < header_outcome.real_cols[0] as usize {
                    header_outcome.offsets[c + 1] as usize - 1
                } else {
                    header_outcome.row_ends[0] as usize
                };
                record.push_field(&data[lo..hi]);
            }

            col_names = dedup_names(
                record
                    .iter()
                    .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string()),
            );
        }

        pos = header_end;
    }

    let body_start = pos;
    let body_len = data.len().saturating_sub(body_start);

    let n_max_counter = config.n_max.map(AtomicU64::new);

    let progress_ctx = progress.map(|p| ProgressCtx {
        progress: p,
        sink: config.progress.as_deref(),
        cadence: config.progress_cadence,
    });

    if let Some(p) = progress {
        p.add_bytes(body_start as u64);
    }

    let use_parallel = source.is_mapped()
        && body_len >= PARALLEL_THRESHOLD
        && !config.escape_backslash
        && config.resolved_num_threads() > 1;

    let outcome = if use_parallel {
        scan_parallel(data, body_start, &scan_cfg, config, n_max_counter.as_ref(), progress_ctx)
    } else {
        scan_range(
            data,
            body_start,
            data.len(),
            &scan_cfg,
            None,
            0,
            n_max_counter.as_ref(),
            progress_ctx,
        )
    };

    if !config.has_header && col_names.is_empty() {
        col_names = (1..=outcome.cols).map(|i| format!("X{}", i)).collect();
    }

    let newline = if outcome.newline_is_crlf {
        Newline::CrLf
    } else {
        Newline::Lf
    };

    let index = Index::from_parts(
        outcome.offsets,
        outcome.row_ends,
        outcome.real_cols,
        outcome.cols,
        header_range,
        delimiter,
        config.quote,
        newline,
        outcome.had_escaped_quotes,
        outcome.shape_deviations,
    );

    Ok(IndexBuild { index, col_names })
}

/// Partitions `data[body_start..]` across the configured thread count,
/// finding a safe record-boundary split point for each internal boundary
/// via a parallel quote-parity count, then scans each resulting range
/// independently on its own thread.
fn scan_parallel(
    data: &[u8],
    body_start: usize,
    scan_cfg: &ScanCfg,
    config: &ReaderConfig,
    n_max_counter: Option<&AtomicU64>,
    progress: Option<ProgressCtx>,
) -> ScanOutcome {
    let len = data.len();
    let body_len = len - body_start;
    let threads = config
        .resolved_num_threads()
        .min((body_len / PARALLEL_THRESHOLD).max(1))
        .max(1);

    if threads <= 1 {
        return scan_range(data, body_start, len, scan_cfg, None, 0, n_max_counter, progress);
    }

    let span = body_len / threads;
    let mut nominal: Vec<usize> = (1..threads).map(|k| body_start + span * k).collect();
    nominal.push(len);

    // Parity of quote bytes in `[body_start, boundary)`, accumulated as we
    // walk the nominal boundaries left to right.
    let mut parity = false;
    let mut safe_starts = vec![body_start];
    let mut prev = body_start;

    for &boundary in &nominal[..nominal.len() - 1] {
        parity ^= quote_count(data, prev, boundary, scan_cfg.quote) % 2 == 1;
        safe_starts.push(find_safe_boundary(
            data,
            boundary,
            len,
            scan_cfg.quote,
            parity,
        ));
        prev = boundary;
    }

    safe_starts.push(len);
    safe_starts.dedup();

    if safe_starts.len() <= 2 {
        return scan_range(data, body_start, len, scan_cfg, None, 0, n_max_counter, progress);
    }

    // The first range determines the column count for every other range.
    let first_outcome = scan_range(
        data,
        safe_starts[0],
        safe_starts[1],
        scan_cfg,
        None,
        0,
        n_max_counter,
        progress,
    );
    let cols = first_outcome.cols;

    let ranges: Vec<(usize, usize)> = safe_starts[1..].windows(2).map(|w| (w[0], w[1])).collect();

    let outcomes: Vec<ScanOutcome> = std::thread::scope(|scope| {
        let handles: Vec<_> = ranges
            .iter()
            .map(|&(start, end)| {
                scope.spawn(move || {
                    scan_range(data, start, end, scan_cfg, Some(cols), 0, n_max_counter, progress)
                })
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    merge_outcomes(first_outcome, outcomes, cols)
}

fn merge_outcomes(first: ScanOutcome, rest: Vec<ScanOutcome>, cols: usize) -> ScanOutcome {
    let mut offsets = first.offsets;
    let mut row_ends = first.row_ends;
    let mut real_cols = first.real_cols;
    let mut shape_deviations = first.shape_deviations;
    let mut newline_is_crlf = first.newline_is_crlf;
    let mut had_escaped_quotes = first.had_escaped_quotes;

    for outcome in rest {
        let row_base = row_ends.len() as u64;

        offsets.extend(outcome.offsets);
        real_cols.extend(outcome.real_cols);
        shape_deviations.extend(
            outcome
                .shape_deviations
                .into_iter()
                .map(|(row, found)| (row + row_base, found)),
        );
        newline_is_crlf |= outcome.newline_is_crlf;
        had_escaped_quotes |= outcome.had_escaped_quotes;
        row_ends.extend(outcome.row_ends);
    }

    ScanOutcome {
        offsets,
        row_ends,
        real_cols,
        cols,
        newline_is_crlf,
        had_escaped_quotes,
        shape_deviations,
    }
}

/// Deduplicates and fills in header names per the documented rule: blank
/// names become positional, repeats get a `...N` suffix keyed by their
/// 1-based original position.
fn dedup_names(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashMap::new();
    let mut out = Vec::new();

    for (i, name) in names.enumerate() {
        let position = i + 1;
        let candidate = if name.is_empty() {
            format!("X{}", position)
        } else {
            name
        };

        let count = seen.entry(candidate.clone()).or_insert(0);
        *count += 1;

        if *count > 1 {
            out.push(format!("{}...{}", candidate, position));
        } else {
            out.push(candidate);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressSink;
    use std::sync::atomic::AtomicU64 as TestAtomicU64;
    use std::sync::Arc;

    fn build(input: &[u8], config: &ReaderConfig) -> IndexBuild {
        let source = ByteSource::from_bytes(input.to_vec());
        build_index(&source, config, None).unwrap()
    }

    struct CountingSink {
        calls: TestAtomicU64,
    }

    impl ProgressSink for CountingSink {
        fn on_progress(&self, _progress: &Progress) {
            self.calls.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_guess_delimiter_comma() {
        let result = build(b"a,b,c\n1,2,3\n4,5,6\n", &ReaderConfig::new());
        assert_eq!(result.col_names, vec!["a", "b", "c"]);
        assert_eq!(result.index.cols(), 3);
        assert_eq!(result.index.rows(), 2);
    }

    #[test]
    fn test_quoted_newline() {
        let input = b"x,y\n\"a\nb\",1\nc,2\n";
        let result = build(input, &ReaderConfig::new());
        assert_eq!(result.index.rows(), 2);

        let (lo, hi) = result.index.field_bounds(0, 0);
        assert_eq!(&input[lo as usize..hi as usize], &b"\"a\nb\""[..]);
    }

    #[test]
    fn test_no_header() {
        let mut config = ReaderConfig::new();
        config.has_header(false);
        let result = build(b"1,2,3\n4,5,6\n", &config);
        assert_eq!(result.col_names, vec!["X1", "X2", "X3"]);
        assert_eq!(result.index.rows(), 2);
    }

    #[test]
    fn test_column_padding() {
        let result = build(b"a,b,c\n1,2\n3,4,5\n", &ReaderConfig::new());
        assert_eq!(result.index.rows(), 2);
        assert_eq!(result.index.shape_deviations(), &[(0, 2)]);
    }

    #[test]
    fn test_dedup_names() {
        let names =
            dedup_names(vec!["a".to_string(), "".to_string(), "a".to_string()].into_iter());
        assert_eq!(names, vec!["a", "X2", "a...3"]);
    }

    #[test]
    fn test_progress_counters_reach_full_total_after_scan() {
        let input = b"a,b\n1,2\n3,4\n5,6\n".to_vec();
        let source = ByteSource::from_bytes(input.clone());
        let progress = Progress::new(input.len() as u64);

        let mut config = ReaderConfig::new();
        config.progress(Arc::new(CountingSink { calls: TestAtomicU64::new(0) }));

        let build = build_index(&source, &config, Some(&progress)).unwrap();

        assert_eq!(build.index.rows(), 3);
        assert_eq!(progress.bytes_indexed(), input.len() as u64);
        assert_eq!(progress.rows_indexed(), 3);
    }

    #[test]
    fn test_progress_sink_notified_once_cadence_elapses() {
        let input = b"a,b\n1,2\n3,4\n".to_vec();
        let source = ByteSource::from_bytes(input);
        let progress = Progress::new(source.len() as u64);

        let sink = Arc::new(CountingSink { calls: TestAtomicU64::new(0) });
        let mut config = ReaderConfig::new();
        config.progress(sink.clone());
        config.progress_cadence.show_after = std::time::Duration::from_millis(0);
        config.progress_cadence.update_interval = std::time::Duration::from_millis(0);

        build_index(&source, &config, Some(&progress)).unwrap();

        assert!(sink.calls.load(Ordering::Relaxed) >= 1);
    }
}
