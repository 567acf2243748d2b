/// Newline convention detected from the first record terminator seen while
/// indexing. Used by the writer to match the input's own convention and by
/// multi-file concatenation to require a consistent convention across files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Newline {
    Lf,
    CrLf,
}

/// The byte-offset map produced by a single pass over a [`crate::byte_source::ByteSource`].
///
/// `offsets` holds `rows * cols` absolute byte positions, one per field
/// start, in row-major order. `row_ends[r]` holds the absolute position
/// where row `r`'s last slot (column `cols - 1`) ends content-wise —
/// terminator and any truncated surplus fields excluded. `real_cols[r]`
/// holds `min(actual field count, cols)`: for a normal row this is just
/// `cols`; for a row padded up to `cols` it is the true, smaller field
/// count, letting [`Index::field_bounds`] tell a genuine delimiter-bounded
/// gap between two real fields apart from the gap in front of padding.
///
/// Field `(r, c)` occupies `[offsets[r*cols+c], offsets[r*cols+c+1] - 1)`
/// when `c + 1 < real_cols[r]`, and `[offsets[r*cols+c], row_ends[r])`
/// otherwise. Padded slots have their start set equal to `row_ends[r]`, so
/// they read back as empty.
#[derive(Debug, Clone)]
pub struct Index {
    pub(crate) offsets: Vec<u64>,
    pub(crate) row_ends: Vec<u64>,
    pub(crate) real_cols: Vec<u32>,
    pub(crate) cols: usize,
    pub(crate) header_range: Option<(u64, u64)>,
    pub(crate) delimiter: u8,
    pub(crate) quote: u8,
    pub(crate) newline: Newline,
    pub(crate) had_escaped_quotes: bool,
    /// Rows (0-based, in output order) that were padded or truncated to
    /// match `cols`, paired with the field count actually found.
    pub(crate) shape_deviations: Vec<(u64, usize)>,
}

impl Index {
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> u64 {
        self.row_ends.len() as u64
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn quote(&self) -> u8 {
        self.quote
    }

    pub fn newline(&self) -> Newline {
        self.newline
    }

    pub fn shape_deviations(&self) -> &[(u64, usize)] {
        &self.shape_deviations
    }

    /// Byte range `[lo, hi)` of field `(row, col)`'s content, with any
    /// trailing separator already excluded.
    ///
    /// Panics on out-of-bounds input; callers in this crate always check
    /// `row < rows()` and `col < cols()` first since the Index is an
    /// internal, already-validated structure.
    #[inline]
    pub(crate) fn field_bounds(&self, row: u64, col: usize) -> (u64, u64) {
        let i = row as usize * self.cols + col;
        let lo = self.offsets[i];
        let real = self.real_cols[row as usize] as usize;

        let hi = if col + 1 < real {
            self.offsets[i + 1] - 1
        } else {
            self.row_ends[row as usize]
        };

        (lo, hi)
    }

    /// Builds an index directly from pre-computed field-start offsets, used
    /// by the indexer once all worker chunks have been scanned and
    /// concatenated in byte order.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        offsets: Vec<u64>,
        row_ends: Vec<u64>,
        real_cols: Vec<u32>,
        cols: usize,
        header_range: Option<(u64, u64)>,
        delimiter: u8,
        quote: u8,
        newline: Newline,
        had_escaped_quotes: bool,
        shape_deviations: Vec<(u64, usize)>,
    ) -> Self {
        debug_assert!(cols > 0);
        debug_assert_eq!(offsets.len(), row_ends.len() * cols);
        debug_assert_eq!(row_ends.len(), real_cols.len());

        Self {
            offsets,
            row_ends,
            real_cols,
            cols,
            header_range,
            delimiter,
            quote,
            newline,
            had_escaped_quotes,
            shape_deviations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> Index {
        // "a,b,c\nd,e,f" (no trailing newline): two full rows, three columns.
        Index::from_parts(
            vec![0, 2, 4, 6, 8, 10],
            vec![5, 11],
            vec![3, 3],
            3,
            None,
            b',',
            b'"',
            Newline::Lf,
            false,
            Vec::new(),
        )
    }

    #[test]
    fn test_field_bounds() {
        let index = sample_index();
        assert_eq!(index.rows(), 2);
        assert_eq!(index.cols(), 3);
        assert_eq!(index.field_bounds(0, 0), (0, 1));
        assert_eq!(index.field_bounds(0, 2), (4, 5));
        assert_eq!(index.field_bounds(1, 2), (10, 11));
    }

    #[test]
    fn test_padded_row() {
        // "a,b,c\nd,e\n": second row only has two real fields, so its third
        // slot is padded with its own row end, reading back as empty.
        let index = Index::from_parts(
            vec![0, 2, 4, 6, 8, 9],
            vec![5, 9],
            vec![3, 2],
            3,
            None,
            b',',
            b'"',
            Newline::Lf,
            false,
            vec![(1, 2)],
        );

        assert_eq!(index.field_bounds(1, 0), (6, 7));
        assert_eq!(index.field_bounds(1, 1), (8, 9));
        assert_eq!(index.field_bounds(1, 2), (9, 9));
    }

    #[test]
    fn test_truncated_row() {
        // "a,b,c,d,e\n" with cols=3: surplus "d","e" are discarded, but the
        // kept last slot still ends exactly before its own delimiter.
        let index = Index::from_parts(
            vec![0, 2, 4],
            vec![5],
            vec![3],
            3,
            None,
            b',',
            b'"',
            Newline::Lf,
            false,
            vec![(0, 5)],
        );

        assert_eq!(index.field_bounds(0, 2), (4, 5));
    }
}
