//! Line reassembly across chunk boundaries.

/// Byte that terminates a line.
pub(crate) const LINE_TERMINATOR: u8 = b'\n';

/// Output of one accumulation step.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Accumulated {
    /// Complete lines, in file order.
    pub lines: Vec<String>,
    /// Unterminated tail to carry into the next call.
    pub pending: Vec<u8>,
}

/// Splits `pending + new_bytes` into complete lines and a new pending fragment.
///
/// Every segment followed by a terminator is a complete line; whatever follows
/// the last terminator (possibly nothing) becomes the new pending fragment. The
/// function holds no state: the caller owns the fragment between calls.
pub fn consume(pending: &[u8], new_bytes: &[u8]) -> Accumulated {
    let Some(last) = new_bytes.iter().rposition(|b| *b == LINE_TERMINATOR) else {
        let mut carried = Vec::with_capacity(pending.len() + new_bytes.len());
        carried.extend_from_slice(pending);
        carried.extend_from_slice(new_bytes);
        return Accumulated {
            lines: Vec::new(),
            pending: carried,
        };
    };

    let mut head = Vec::with_capacity(pending.len() + last);
    head.extend_from_slice(pending);
    head.extend_from_slice(&new_bytes[..last]);

    Accumulated {
        lines: split_lines(&head),
        pending: new_bytes[last + 1..].to_vec(),
    }
}

/// Splits the region before a buffer's final terminator into decoded lines.
///
/// Each segment becomes one line, so `"a\n\nb"` yields three lines.
pub(crate) fn split_lines(content: &[u8]) -> Vec<String> {
    content
        .split(|b| *b == LINE_TERMINATOR)
        .map(decode_line)
        .collect()
}

/// Decodes one line, dropping a trailing carriage return.
pub(crate) fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
