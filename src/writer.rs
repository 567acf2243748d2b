use std::fs::File;
use std::io::{self, BufWriter, IntoInnerError, Write};
use std::path::Path;

use crate::byte_source::CompressionFormat;
use crate::column::Cell;
use crate::config::{QuotingPolicy, WriterConfig};
use crate::error::{Error, Result};
use crate::records::ByteRecord;
use crate::searcher::Searcher;

/// A caller-supplied streaming encoder for one [`CompressionFormat`],
/// wrapping a plain sink with the matching compressor. Mirrors
/// [`crate::byte_source::Decoder`] on the write side.
pub trait Encoder: Send + Sync {
    fn wrap(&self, sink: Box<dyn Write>) -> Box<dyn Write>;
}

/// Formats a single typed cell back to bytes, the inverse of
/// [`crate::column::ColumnStore`]'s read-side converters. `na_repr` is
/// written for [`Cell::Na`], matching whichever of `config.na_strings` the
/// caller wants to round-trip through.
pub fn format_cell(cell: &Cell, na_repr: &str) -> Vec<u8> {
    match cell {
        Cell::Na => na_repr.as_bytes().to_vec(),
        Cell::Logical(true) => b"TRUE".to_vec(),
        Cell::Logical(false) => b"FALSE".to_vec(),
        Cell::Integer(v) => v.to_string().into_bytes(),
        Cell::Double(v) => v.to_string().into_bytes(),
        Cell::Date(v) => v.format("%Y-%m-%d").to_string().into_bytes(),
        Cell::Time(v) => v.format("%H:%M:%S").to_string().into_bytes(),
        Cell::DateTime(v) => v.format("%Y-%m-%dT%H:%M:%S").to_string().into_bytes(),
        Cell::Character(v) => v.clone().into_bytes(),
    }
}

/// Converts one row of typed cells into a [`ByteRecord`], applying
/// `format_cell` to each cell. The result still needs to pass through a
/// [`Writer`] to get quoting and delimiting applied.
pub fn cell_row_to_byte_record(cells: &[Cell], na_repr: &str) -> ByteRecord {
    cells.iter().map(|c| format_cell(c, na_repr)).collect()
}

pub struct Writer<W: Write> {
    delimiter: u8,
    quote: u8,
    quoting: QuotingPolicy,
    buffer: BufWriter<W>,
    quote_bounds: Vec<usize>,
    scratch: Vec<u8>,
    searcher: Searcher,
}

impl<W: Write> Writer<W> {
    pub fn with_capacity(writer: W, capacity: usize, delimiter: u8, quote: u8) -> Self {
        Self {
            buffer: BufWriter::with_capacity(capacity, writer),
            quote,
            delimiter,
            quoting: QuotingPolicy::Needs,
            quote_bounds: Vec::new(),
            scratch: Vec::new(),
            searcher: Searcher::new(delimiter, quote, b'\n'),
        }
    }

    pub fn from_config(writer: W, config: &WriterConfig) -> Self {
        Self {
            buffer: BufWriter::with_capacity(1 << 16, writer),
            quote: config.quote,
            delimiter: config.delim,
            quoting: config.quoting,
            quote_bounds: Vec::new(),
            scratch: Vec::new(),
            searcher: Searcher::new(config.delim, config.quote, b'\n'),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.buffer.flush()
    }

    pub fn write_byte_record_no_quoting(&mut self, record: &ByteRecord) -> io::Result<()> {
        let last_i = record.len().saturating_sub(1);

        for (i, cell) in record.iter().enumerate() {
            self.buffer.write_all(cell)?;

            if i != last_i {
                self.buffer.write_all(&[self.delimiter])?;
            }
        }

        self.buffer.write_all(b"\n")?;

        Ok(())
    }

    fn assess_quoting(&mut self, cell: &[u8]) -> bool {
        let mut must_quote = false;

        self.quote_bounds.clear();

        for offset in self.searcher.search(cell) {
            let byte = cell[offset];

            if byte == self.quote {
                if self.quote_bounds.is_empty() {
                    self.quote_bounds.push(0);
                }

                self.quote_bounds.push(offset);
            }

            must_quote = true;
        }

        if !self.quote_bounds.is_empty() {
            self.quote_bounds.push(cell.len());
        }

        must_quote
    }

    fn quote(&mut self, cell: &[u8]) {
        self.scratch.clear();
        self.scratch.push(self.quote);

        if self.quote_bounds.is_empty() {
            self.scratch.extend_from_slice(cell);
        } else {
            let windows = self.quote_bounds.windows(2);
            let last_i = windows.len().saturating_sub(1);

            for (i, w) in windows.enumerate() {
                self.scratch.extend_from_slice(&cell[w[0]..w[1]]);

                if i != last_i {
                    self.scratch.push(self.quote);
                }
            }
        }

        self.scratch.push(self.quote);
    }

    pub fn write_byte_record(&mut self, record: &ByteRecord) -> io::Result<()> {
        let last_i = record.len().saturating_sub(1);

        // Under `Never`, a field containing the delimiter, quote, or a
        // newline can't be written unambiguously without quoting it; check
        // every field before writing any of them rather than failing
        // partway through an already-started record.
        if self.quoting == QuotingPolicy::Never {
            for cell in record.iter() {
                if self.assess_quoting(cell) {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "field would be ambiguous without quoting under QuotingPolicy::Never",
                    ));
                }
            }
        }

        for (i, cell) in record.iter().enumerate() {
            let must_quote = match self.quoting {
                QuotingPolicy::Never => false,
                QuotingPolicy::Always => {
                    self.assess_quoting(cell);
                    true
                }
                QuotingPolicy::Needs => self.assess_quoting(cell),
            };

            if !must_quote {
                self.buffer.write_all(cell)?;
            } else {
                self.quote(cell);
                self.buffer.write_all(&self.scratch)?;
            }

            if i != last_i {
                self.buffer.write_all(&[self.delimiter])?;
            }
        }

        self.buffer.write_all(b"\n")?;

        Ok(())
    }

    pub fn into_inner(self) -> Result<W, IntoInnerError<BufWriter<W>>> {
        self.buffer.into_inner()
    }
}

/// Formats `rows` (and, if given, a header) into an in-memory buffer using
/// `config`. Used both directly and as the per-chunk unit of work for
/// [`write_chunked`].
fn format_chunk(header: Option<&ByteRecord>, rows: &[ByteRecord], config: &WriterConfig) -> Vec<u8> {
    let mut writer = Writer::from_config(Vec::new(), config);

    if let Some(header) = header {
        writer.write_byte_record(header).expect("writing to a Vec<u8> never fails");
    }

    for row in rows {
        writer
            .write_byte_record(row)
            .expect("writing to a Vec<u8> never fails");
    }

    writer.into_inner().expect("Vec<u8> sink has no flush to fail")
}

/// Splits `rows` into `config.chunk_rows`-sized groups, formats each group
/// on its own thread, then writes the resulting buffers to `dest` in
/// their original order. The header, if any, is written synchronously
/// before any chunk starts.
pub fn write_chunked<W: Write>(
    dest: W,
    config: &WriterConfig,
    header: Option<&ByteRecord>,
    rows: &[ByteRecord],
) -> io::Result<W> {
    let mut dest = dest;

    if let Some(header) = header {
        let mut head_writer = Writer::from_config(&mut dest, config);
        head_writer.write_byte_record(header)?;
        head_writer.flush()?;
    }

    if rows.is_empty() {
        return Ok(dest);
    }

    let threads = config.resolved_num_threads().min(
        (rows.len() / config.chunk_rows.max(1)).max(1),
    );

    let chunks: Vec<&[ByteRecord]> = rows.chunks(config.chunk_rows.max(1)).collect();

    let buffers: Vec<Vec<u8>> = if threads <= 1 || chunks.len() <= 1 {
        chunks.iter().map(|chunk| format_chunk(None, chunk, config)).collect()
    } else {
        std::thread::scope(|scope| {
            let handles: Vec<_> = chunks
                .iter()
                .map(|chunk| scope.spawn(move || format_chunk(None, chunk, config)))
                .collect();

            handles.into_iter().map(|h| h.join().unwrap()).collect()
        })
    };

    for buffer in buffers {
        dest.write_all(&buffer)?;
    }

    Ok(dest)
}

/// Opens `path` for writing, truncating any existing content. Compression
/// is out of scope: callers writing to a `.gz`/`.zst` destination must wrap
/// the returned file themselves with a codec of their choosing, or use
/// [`create_sink_for`] with a registered [`Encoder`].
pub fn create_sink(path: impl AsRef<Path>) -> io::Result<BufWriter<File>> {
    let file = File::create(path)?;
    Ok(BufWriter::new(file))
}

/// Opens `path` for writing, wrapping the sink with `config`'s registered
/// [`Encoder`] if the path's suffix names a compressed format (`.gz`,
/// `.bz2`, `.xz` per §6). A recognized suffix with no registered encoder is
/// a codec error rather than writing raw, undecoded bytes under a
/// misleading name.
pub fn create_sink_for(path: impl AsRef<Path>, config: &WriterConfig) -> Result<Box<dyn Write>> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let sink: Box<dyn Write> = Box::new(BufWriter::new(file));

    match CompressionFormat::from_path(path) {
        None => Ok(sink),
        Some(format) => match config.encoder_for(format) {
            Some(encoder) => Ok(encoder.wrap(sink)),
            None => Err(Error::codec(format!(
                "no encoder registered for {:?}-compressed output; call WriterConfig::encoder to register one",
                format
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn rec(fields: &[&str]) -> ByteRecord {
        fields.iter().map(|f| f.as_bytes()).collect::<Vec<_>>().into()
    }

    #[test]
    fn test_write_byte_record() -> io::Result<()> {
        let output = Cursor::new(Vec::<u8>::new());
        let mut writer = Writer::with_capacity(output, 32, b',', b'"');

        writer.write_byte_record_no_quoting(&rec(&["name", "surname", "age"]))?;
        writer.write_byte_record(&rec(&["john,", "landis", "45"]))?;
        writer.write_byte_record(&rec(&["lucy", "get\ngot", "\"te,\"st\""]))?;

        assert_eq!(
            std::str::from_utf8(writer.into_inner()?.get_ref()).unwrap(),
            "name,surname,age\n\"john,\",landis,45\nlucy,\"get\ngot\",\"\"\"te,\"\"st\"\"\"\n",
        );

        Ok(())
    }

    #[test]
    fn test_quoting_policy_never_errors_on_ambiguous_field() {
        let output = Cursor::new(Vec::<u8>::new());
        let mut config = WriterConfig::new();
        config.quoting(QuotingPolicy::Never);
        let mut writer = Writer::from_config(output, &config);

        let err = writer.write_byte_record(&rec(&["a,b", "c"])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_quoting_policy_never_writes_unambiguous_fields() -> io::Result<()> {
        let output = Cursor::new(Vec::<u8>::new());
        let mut config = WriterConfig::new();
        config.quoting(QuotingPolicy::Never);
        let mut writer = Writer::from_config(output, &config);

        writer.write_byte_record(&rec(&["ab", "c"]))?;

        assert_eq!(
            std::str::from_utf8(writer.into_inner()?.get_ref()).unwrap(),
            "ab,c\n",
        );

        Ok(())
    }

    #[test]
    fn test_format_cell_round_trip_shapes() {
        assert_eq!(format_cell(&Cell::Integer(42), "NA"), b"42");
        assert_eq!(format_cell(&Cell::Logical(true), "NA"), b"TRUE");
        assert_eq!(format_cell(&Cell::Na, "NA"), b"NA");
        assert_eq!(format_cell(&Cell::Character("hi".to_string()), "NA"), b"hi");
    }

    #[test]
    fn test_cell_row_to_byte_record_then_write() -> io::Result<()> {
        let row = vec![Cell::Integer(1), Cell::Character("a,b".to_string()), Cell::Na];
        let record = cell_row_to_byte_record(&row, "NA");

        let output = Cursor::new(Vec::<u8>::new());
        let mut writer = Writer::from_config(output, &WriterConfig::new());
        writer.write_byte_record(&record)?;

        assert_eq!(
            std::str::from_utf8(writer.into_inner()?.get_ref()).unwrap(),
            "1,\"a,b\",NA\n",
        );

        Ok(())
    }

    #[test]
    fn test_write_chunked_preserves_order() {
        let rows: Vec<ByteRecord> = (0..50).map(|i| rec(&[&i.to_string()])).collect();
        let mut config = WriterConfig::new();
        config.chunk_rows(10);

        let dest = write_chunked(Vec::new(), &config, Some(&rec(&["n"])), &rows).unwrap();
        let text = std::str::from_utf8(&dest).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "n");
        assert_eq!(lines[1], "0");
        assert_eq!(lines[50], "49");
    }
}
