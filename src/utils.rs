use std::borrow::Cow;

#[inline]
pub fn trim_trailing_cr(line: &[u8]) -> &[u8] {
    let len = line.len();

    if !line.is_empty() && line[len - 1] == b'\r' {
        &line[..len - 1]
    } else {
        line
    }
}

pub fn trim_trailing_crlf(slice: &[u8]) -> &[u8] {
    let len = slice.len();

    match len {
        0 => slice,
        1 => {
            if slice[0] == b'\n' {
                b""
            } else {
                slice
            }
        }
        _ => {
            if &slice[len - 2..] == b"\r\n" {
                &slice[..len - 2]
            } else if slice[len - 1] == b'\n' {
                &slice[..len - 1]
            } else {
                slice
            }
        }
    }
}

/// Strips a single pair of surrounding quote bytes from `cell`, if present.
///
/// Returns `None` when the cell isn't quoted, so callers can fall back to
/// the original slice without an extra branch at the call site.
#[inline]
pub fn unquoted(cell: &[u8], quote: u8) -> Option<&[u8]> {
    let len = cell.len();

    if len >= 2 && cell[0] == quote && cell[len - 1] == quote {
        Some(&cell[1..len - 1])
    } else {
        None
    }
}

/// Collapses doubled quote bytes in an already-unquoted field.
///
/// Returns a borrowed slice when no doubled quote was found, else an owned
/// buffer with the doubling undone.
pub fn unescape(cell: &[u8], quote: u8) -> Cow<[u8]> {
    if memchr::memchr(quote, cell).is_none() {
        return Cow::Borrowed(cell);
    }

    let mut out = Vec::with_capacity(cell.len());
    unescape_to(cell, quote, &mut out);
    Cow::Owned(out)
}

/// Same as [`unescape`] but appends into a caller-owned buffer, letting the
/// indexer and the type inferer avoid one allocation per cell when they
/// already own a scratch buffer.
pub fn unescape_to(cell: &[u8], quote: u8, out: &mut Vec<u8>) {
    let mut rest = cell;

    while let Some(offset) = memchr::memchr(quote, rest) {
        out.extend_from_slice(&rest[..=offset]);
        rest = &rest[offset + 1..];

        if rest.first() == Some(&quote) {
            rest = &rest[1..];
        }
    }

    out.extend_from_slice(rest);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unquoted() {
        assert_eq!(unquoted(b"\"abc\"", b'"'), Some(&b"abc"[..]));
        assert_eq!(unquoted(b"abc", b'"'), None);
        assert_eq!(unquoted(b"\"", b'"'), None);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(b"abc", b'"'), Cow::Borrowed(&b"abc"[..]));
        assert_eq!(
            unescape(b"a\"\"b", b'"').into_owned(),
            b"a\"b".to_vec()
        );
    }
}
