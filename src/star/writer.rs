use std::borrow::Cow;
use std::io::Write;

use super::block::Block;
use super::columns::{LABEL_PREFIX, LEGACY_BLOCK, LOOP_MARKER};
use crate::error::{Error, Result};

/// Quote delimiters, tried in order
const QUOTES: [char; 2] = ['"', '\''];

/// Whether a value must be quoted to survive whitespace splitting
fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value.contains(char::is_whitespace)
        || value.starts_with(QUOTES)
        || value.starts_with(LABEL_PREFIX)
        || value.starts_with(LEGACY_BLOCK)
        || value.starts_with(LOOP_MARKER)
}

/// A quote closes a value only when followed by whitespace or the line end
fn closes_early(value: &str, quote: char) -> bool {
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == quote && chars.peek().is_some_and(|n| n.is_whitespace()) {
            return true;
        }
    }
    false
}

/// Render one field, quoting it when bare text would not read back
pub(crate) fn format_value<'a>(value: &'a str, block: &str, row: usize) -> Result<Cow<'a, str>> {
    if !needs_quotes(value) {
        return Ok(Cow::Borrowed(value));
    }
    if !value.contains(['\n', '\r']) {
        if let Some(quote) = QUOTES.into_iter().find(|&q| !closes_early(value, q)) {
            return Ok(Cow::Owned(format!("{quote}{value}{quote}")));
        }
    }
    Err(Error::InvalidFormat(format!(
        "{} row {}: value {:?} cannot be written as a STAR field",
        block, row, value
    )))
}

/// Write one block: name, blank line, `loop_`, labels, rows, blank line
pub(crate) fn write_block<W: Write>(writer: &mut W, name: &str, block: &Block) -> Result<()> {
    writeln!(writer, "{}", name.trim())?;
    writeln!(writer)?;
    writeln!(writer, "{}", LOOP_MARKER)?;
    for column in block.columns() {
        writeln!(writer, "{}", column)?;
    }
    for (i, row) in block.rows().iter().enumerate() {
        let fields = row
            .iter()
            .map(|value| format_value(value, name, i))
            .collect::<Result<Vec<_>>>()?;
        writeln!(writer, "{}", fields.join(" "))?;
    }
    writeln!(writer)?;
    Ok(())
}
