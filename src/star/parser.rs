//! Line-oriented STAR parser.
//!
//! Blocks are read with an explicit state machine so that every malformed
//! layout maps to a specific error instead of falling out of nested scans.

use std::path::Path;

use log::debug;

use super::block::Block;
use super::columns::{LABEL_PREFIX, LEGACY_BLOCK, LOOP_MARKER, OPTICS_BLOCK};
use crate::error::{Error, Result};

/// Which STAR layout a file uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StarDialect {
    /// Single `data_` block, no optics table
    Legacy,
    /// `data_optics` followed by a named data block such as `data_particles`
    Versioned {
        /// Name of the data block
        data_block: String,
    },
}

impl StarDialect {
    /// Name of the block holding one row per record
    pub fn data_block(&self) -> &str {
        match self {
            StarDialect::Legacy => LEGACY_BLOCK,
            StarDialect::Versioned { data_block } => data_block,
        }
    }
}

/// States of the block reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    /// Looking for the line naming the block
    SeekBlock,
    /// Looking for `loop_`
    SeekLoop,
    /// Consuming `_`-prefixed labels
    ReadColumns,
    /// Consuming rows until a blank line
    ReadRows,
    /// Block complete
    Done,
}

/// Determine the dialect from the first `data_optics` or `data_` marker
pub(crate) fn detect_dialect(text: &str, path: &Path) -> Result<StarDialect> {
    let mut lines = text.lines();

    let mut versioned = None;
    for line in lines.by_ref() {
        let Some(first) = line.split_whitespace().next() else {
            continue;
        };
        if first.starts_with('#') {
            continue;
        }
        if first == OPTICS_BLOCK {
            versioned = Some(true);
            break;
        }
        if first == LEGACY_BLOCK {
            versioned = Some(false);
            break;
        }
    }

    match versioned {
        None => Err(Error::UnrecognizedDialect {
            path: path.to_path_buf(),
        }),
        Some(false) => Ok(StarDialect::Legacy),
        Some(true) => {
            for line in lines {
                let mut words = line.split_whitespace();
                if let (Some(word), None) = (words.next(), words.next()) {
                    if word.starts_with(LEGACY_BLOCK) {
                        debug!("Data block of {} is {}", path.display(), word);
                        return Ok(StarDialect::Versioned {
                            data_block: word.to_string(),
                        });
                    }
                }
            }
            Err(Error::MissingBlock(format!(
                "data block after {} in {}",
                OPTICS_BLOCK,
                path.display()
            )))
        }
    }
}

/// Read one block starting at the current position of `lines`
///
/// Lines before the block name are skipped. On return `lines` is positioned
/// after the blank line terminating the rows.
pub(crate) fn parse_block<'a, I>(lines: &mut I, name: &str) -> Result<Block>
where
    I: Iterator<Item = &'a str>,
{
    let mut state = ParseState::SeekBlock;
    let mut block = Block::new(name, Vec::new());

    while state != ParseState::Done {
        let Some(line) = lines.next() else {
            match state {
                ParseState::SeekBlock => return Err(Error::MissingBlock(name.to_string())),
                ParseState::SeekLoop => {
                    return Err(Error::MissingBlock(format!("{} in {}", LOOP_MARKER, name)))
                }
                _ => break,
            }
        };

        state = match state {
            ParseState::SeekBlock => {
                if line.split_whitespace().next() == Some(name) {
                    ParseState::SeekLoop
                } else {
                    ParseState::SeekBlock
                }
            }
            ParseState::SeekLoop => {
                if line.trim_start().starts_with(LOOP_MARKER) {
                    ParseState::ReadColumns
                } else {
                    ParseState::SeekLoop
                }
            }
            ParseState::ReadColumns => {
                let trimmed = line.trim();
                if trimmed.starts_with(LABEL_PREFIX) {
                    // Labels may carry a `#n` position suffix
                    if let Some(label) = trimmed.split_whitespace().next() {
                        block.push_label(label);
                    }
                    ParseState::ReadColumns
                } else if trimmed.is_empty() {
                    if block.columns().is_empty() {
                        ParseState::ReadColumns
                    } else {
                        ParseState::Done
                    }
                } else {
                    push_tokens(&mut block, trimmed)?;
                    ParseState::ReadRows
                }
            }
            ParseState::ReadRows => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    ParseState::Done
                } else {
                    push_tokens(&mut block, trimmed)?;
                    ParseState::ReadRows
                }
            }
            ParseState::Done => ParseState::Done,
        };
    }

    debug!(
        "Parsed {}: {} columns, {} rows",
        name,
        block.columns().len(),
        block.num_rows()
    );
    Ok(block)
}

/// Byte offset of the quote closing a quoted value in `body`
///
/// As in CIF, a quote closes the value only when followed by whitespace or
/// the end of the line, so values may contain the delimiter elsewhere.
fn closing_quote(body: &str, quote: char) -> Option<usize> {
    let mut chars = body.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == quote && chars.peek().map_or(true, |&(_, n)| n.is_whitespace()) {
            return Some(i);
        }
    }
    None
}

/// Split a row into fields; `"..."` and `'...'` delimit values with spaces
fn split_fields(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut rest = line.trim_start();
    while let Some(first) = rest.chars().next() {
        if first == '"' || first == '\'' {
            let body = &rest[first.len_utf8()..];
            let end = closing_quote(body, first)?;
            fields.push(body[..end].to_string());
            rest = body[end + first.len_utf8()..].trim_start();
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            fields.push(rest[..end].to_string());
            rest = rest[end..].trim_start();
        }
    }
    Some(fields)
}

fn push_tokens(block: &mut Block, line: &str) -> Result<()> {
    let row = split_fields(line).ok_or_else(|| {
        Error::InvalidFormat(format!(
            "{} row {}: unterminated quoted value",
            block.name(),
            block.num_rows()
        ))
    })?;
    block.push_row(row)
}

/// Parse a whole STAR document
pub(crate) fn parse_document(
    text: &str,
    path: &Path,
) -> Result<(StarDialect, Option<Block>, Block)> {
    let dialect = detect_dialect(text, path)?;
    let mut lines = text.lines();

    let optics = match dialect {
        StarDialect::Legacy => None,
        StarDialect::Versioned { .. } => Some(parse_block(&mut lines, OPTICS_BLOCK)?),
    };
    let data = parse_block(&mut lines, dialect.data_block())?;
    Ok((dialect, optics, data))
}
