/*!
`lazytab` is a lazy, indexed, column-oriented reader and writer for
delimited and fixed-width tabular text files.

A file is scanned exactly once to build an [`index::Index`]: a map from
`(row, column)` to a byte range. Columns are typed and materialized on
demand afterwards, through [`column::Table`], rather than all at once on
open.

# Reading

- [`read`]: opens a delimited file, indexes it, infers column types, and
  returns a [`column::Table`] backed by a memory mapping.
- [`read_bytes`]: same, but over an in-memory buffer (a pipe, a
  decompressor's output, test fixtures).
- [`multi_file::build_logical_index`]: indexes several files sharing a
  schema as one logical table.
- [`read_fixed_width`]: indexes a fixed-width layout instead of a
  delimited one.

# Writing

- [`writer::Writer`]: a row-at-a-time writer with configurable quoting.
- [`writer::write_chunked`]: splits rows across worker threads and
  reassembles them in order.

# Design notes

Indexing is single-pass and, for large memory-mapped inputs, chunked
across a worker pool: each worker first counts quote bytes to establish
quote parity at its chunk boundary, then scans forward to the next
genuine record start before indexing its own range independently. See
[`indexer`] for the details.

Progress is reported through atomic counters ([`progress::Progress`])
rather than a built-in UI; a caller wanting to display progress supplies
a [`progress::ProgressSink`].

# Caveats

Compressed or non-seekable sources are read fully into memory before
indexing; there is no streaming decompression path. Backslash-escaped
quoting disables parallel indexing, since safe chunk boundaries can't be
found independently of the backslash's own running state.
*/
mod byte_source;
mod column;
mod config;
mod debug;
mod error;
mod ext;
mod fixed_width;
mod index;
mod indexer;
mod infer;
mod multi_file;
mod progress;
mod records;
mod searcher;
mod utils;
mod writer;

use std::path::Path;

pub use byte_source::{ByteSource, CompressionFormat, Decoder};
pub use column::{Cell, Table};
pub use config::{ColSelect, ColumnRef, ColumnTypeOverride, Locale, QuotingPolicy, ReaderConfig, WriterConfig};
pub use error::{ColumnType, Error, Problem, ProblemKind, Result};
pub use fixed_width::{build_fixed_width_index, FixedWidthColumn, FixedWidthIndex, FixedWidthLayout};
pub use index::{Index, Newline};
pub use multi_file::{build_logical_index, build_logical_table, FileEntry, LogicalIndex, LogicalTable};
pub use progress::{NullSink, Progress, ProgressSink};
pub use records::{ByteRecord, ZeroCopyByteRecord};
pub use searcher::Searcher;
pub use writer::{cell_row_to_byte_record, create_sink, create_sink_for, format_cell, write_chunked, Encoder, Writer};

/// Opens and indexes a delimited file at `path`, inferring every column's
/// type and returning a lazily-materializing [`Table`].
pub fn read(path: impl AsRef<Path>, config: &ReaderConfig) -> Result<Table> {
    config.validate()?;

    let source = byte_source::open_source(path.as_ref(), config)?;
    source.advise_sequential();

    let progress = config.progress.as_ref().map(|_| Progress::new(source.len() as u64));
    let build = indexer::build_index(&source, config, progress.as_deref())?;

    Table::new(source, build.index, build.col_names, config)
}

/// Indexes an in-memory buffer as a delimited table. Used for
/// non-seekable sources (pipes, decompressor output) and for testing.
pub fn read_bytes(bytes: Vec<u8>, config: &ReaderConfig) -> Result<Table> {
    config.validate()?;

    let source = ByteSource::from_bytes(bytes);
    let build = indexer::build_index(&source, config, None)?;

    Table::new(source, build.index, build.col_names, config)
}

/// Opens and indexes a fixed-width file at `path` per `layout`.
pub fn read_fixed_width(
    path: impl AsRef<Path>,
    layout: &FixedWidthLayout,
    has_header: bool,
) -> Result<(ByteSource, FixedWidthIndex)> {
    let source = ByteSource::mmap_file(path)?;
    let index = build_fixed_width_index(&source, layout, has_header)?;
    Ok((source, index))
}
