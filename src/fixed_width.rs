use crate::byte_source::ByteSource;
use crate::error::Result;
use crate::utils::trim_trailing_crlf;

/// A single resolved column: byte offsets relative to the start of its
/// line, end-exclusive.
#[derive(Debug, Clone)]
pub struct FixedWidthColumn {
    pub name: String,
    pub start: usize,
    pub end: usize,
}

/// The four configuration shapes a caller may supply, all reduced to a
/// vector of `(start, end, name)` triples before indexing begins.
pub enum FixedWidthLayout {
    /// Infer column breaks from runs of space characters shared by every
    /// sampled line.
    Infer { sample_lines: usize },
    /// Cumulative widths, e.g. `[10, 8, 12]` becomes breaks at 10, 18, 30.
    Widths(Vec<usize>),
    /// Explicit `(start, end)` pairs.
    Positions(Vec<(usize, usize)>),
    /// Explicit `(name, start, end)` triples; skips default `X1..XC` naming.
    Named(Vec<(String, usize, usize)>),
}

fn first_lines(data: &[u8], n: usize) -> Vec<&[u8]> {
    let mut lines = Vec::with_capacity(n);
    let mut start = 0;

    while start < data.len() && lines.len() < n {
        let end = memchr::memchr(b'\n', &data[start..])
            .map(|i| start + i)
            .unwrap_or(data.len());
        let line = trim_trailing_crlf(&data[start..end.min(data.len()).max(start)]);
        lines.push(line);
        start = end + 1;
    }

    lines
}

/// Finds column breaks shared by every sampled line: positions that are
/// either a space or past that line's own length in all of `lines`.
fn infer_breaks(lines: &[&[u8]]) -> Vec<usize> {
    let max_len = lines.iter().map(|l| l.len()).max().unwrap_or(0);

    if max_len == 0 {
        return Vec::new();
    }

    let is_space_column = |pos: usize| {
        lines
            .iter()
            .all(|line| pos >= line.len() || line[pos] == b' ')
    };

    let mut breaks = Vec::new();
    let mut run_start: Option<usize> = None;

    for pos in 0..max_len {
        if is_space_column(pos) {
            run_start.get_or_insert(pos);
        } else if let Some(s) = run_start.take() {
            breaks.push((s + pos) / 2);
        }
    }

    breaks
}

fn resolve_layout(layout: &FixedWidthLayout, data: &[u8]) -> Vec<FixedWidthColumn> {
    match layout {
        FixedWidthLayout::Widths(widths) => {
            let mut start = 0;
            widths
                .iter()
                .enumerate()
                .map(|(i, &w)| {
                    let end = start + w;
                    let col = FixedWidthColumn {
                        name: format!("X{}", i + 1),
                        start,
                        end,
                    };
                    start = end;
                    col
                })
                .collect()
        }
        FixedWidthLayout::Positions(positions) => positions
            .iter()
            .enumerate()
            .map(|(i, &(start, end))| FixedWidthColumn {
                name: format!("X{}", i + 1),
                start,
                end,
            })
            .collect(),
        FixedWidthLayout::Named(named) => named
            .iter()
            .map(|(name, start, end)| FixedWidthColumn {
                name: name.clone(),
                start: *start,
                end: *end,
            })
            .collect(),
        FixedWidthLayout::Infer { sample_lines } => {
            let lines = first_lines(data, *sample_lines);
            let mut breaks = infer_breaks(&lines);
            let max_len = lines.iter().map(|l| l.len()).max().unwrap_or(0);
            breaks.push(max_len);

            let mut start = 0;
            breaks
                .into_iter()
                .enumerate()
                .map(|(i, end)| {
                    let col = FixedWidthColumn {
                        name: format!("X{}", i + 1),
                        start,
                        end,
                    };
                    start = end;
                    col
                })
                .collect()
        }
    }
}

/// Per-row line boundaries plus the resolved column definitions. Unlike
/// [`crate::index::Index`], field bounds are computed directly from each
/// column's own `(start, end)` rather than derived from a neighbor's
/// start, since fixed-width fields aren't delimiter-separated.
pub struct FixedWidthIndex {
    pub(crate) columns: Vec<FixedWidthColumn>,
    pub(crate) line_starts: Vec<u64>,
    pub(crate) line_ends: Vec<u64>,
}

impl FixedWidthIndex {
    pub fn rows(&self) -> u64 {
        self.line_starts.len() as u64
    }

    pub fn cols(&self) -> usize {
        self.columns.len()
    }

    pub fn col_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Byte range `[lo, hi)` for `(row, col)`. A line shorter than the
    /// column's own end is clamped to the line's own end, reading back as
    /// empty (NA) for any column entirely past a short row, per the
    /// right-padding rule.
    pub fn field_bounds(&self, row: u64, col: usize) -> (u64, u64) {
        let line_start = self.line_starts[row as usize];
        let line_end = self.line_ends[row as usize];
        let column = &self.columns[col];

        let lo = (line_start + column.start as u64).min(line_end);
        let hi = (line_start + column.end as u64).min(line_end);

        (lo, hi)
    }
}

/// Scans `source` line by line (quote-unaware; fixed-width has no quoting)
/// and binds each line to the resolved column layout.
pub fn build_fixed_width_index(
    source: &ByteSource,
    layout: &FixedWidthLayout,
    has_header: bool,
) -> Result<FixedWidthIndex> {
    let data = source.as_slice();
    let columns = resolve_layout(layout, data);

    let mut line_starts = Vec::new();
    let mut line_ends = Vec::new();
    let mut pos = 0usize;

    if has_header {
        match memchr::memchr(b'\n', &data[pos..]) {
            Some(offset) => pos += offset + 1,
            None => pos = data.len(),
        }
    }

    while pos < data.len() {
        let end = memchr::memchr(b'\n', &data[pos..])
            .map(|i| pos + i)
            .unwrap_or(data.len());

        let content_end = {
            let line = trim_trailing_crlf(&data[pos..end.max(pos)]);
            pos + line.len()
        };

        line_starts.push(pos as u64);
        line_ends.push(content_end as u64);

        pos = if end < data.len() { end + 1 } else { data.len() };
    }

    Ok(FixedWidthIndex {
        columns,
        line_starts,
        line_ends,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widths_layout() {
        let source = ByteSource::from_bytes(b"id  name\n1   alice\n2   bob\n".to_vec());
        let layout = FixedWidthLayout::Widths(vec![4, 5]);
        let index = build_fixed_width_index(&source, &layout, true).unwrap();

        assert_eq!(index.rows(), 2);
        assert_eq!(index.cols(), 2);

        let data = source.as_slice();
        let (lo, hi) = index.field_bounds(0, 0);
        assert_eq!(&data[lo as usize..hi as usize], b"1   ");
    }

    #[test]
    fn test_short_row_pads_with_empty() {
        let source = ByteSource::from_bytes(b"1234567890\n12345\n".to_vec());
        let layout = FixedWidthLayout::Positions(vec![(0, 5), (5, 10)]);
        let index = build_fixed_width_index(&source, &layout, false).unwrap();

        let (lo, hi) = index.field_bounds(1, 1);
        assert_eq!(lo, hi);
    }

    #[test]
    fn test_infer_breaks() {
        let lines: Vec<&[u8]> = vec![b"aa  bb", b"cc  dd"];
        let breaks = infer_breaks(&lines);
        assert_eq!(breaks, vec![3]);
    }
}
