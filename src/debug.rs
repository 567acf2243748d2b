use std::fmt;

/// Renders a byte slice as a lossy string for `Debug` impls instead of a
/// numeric byte list, matching how the rest of the crate reports field
/// contents in error messages.
pub(crate) struct Bytes<'a>(pub &'a [u8]);

impl fmt::Debug for Bytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.0))
    }
}
