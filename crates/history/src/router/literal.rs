//! Restricted parser for the web-history payload
//!
//! `getWebHistory.asp` answers with script source of the form
//!
//! ```text
//! array_temp = [["AA:BB:CC:DD:EE:FF","1670000000","example.com"], ...];
//! ```
//!
//! Only that shape is accepted: an optional `var`/`let`/`const`, one
//! identifier, `=`, then a two-level array of string/number/boolean/null
//! literals and an optional `;`. Anything else (calls, operators, further
//! statements, identifiers in value position) is rejected. The payload is
//! never evaluated.

use thiserror::Error;

use crate::models::HistoryRow;

/// Error produced when a payload falls outside the accepted grammar
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiteralError {
    #[error("payload is empty")]
    Empty,
    #[error("unexpected end of payload, expected {expected}")]
    UnexpectedEnd { expected: &'static str },
    #[error("unexpected {found:?} at offset {offset}, expected {expected}")]
    Unexpected {
        found: char,
        offset: usize,
        expected: &'static str,
    },
    #[error("unterminated string starting at offset {0}")]
    UnterminatedString(usize),
    #[error("invalid escape sequence at offset {0}")]
    InvalidEscape(usize),
    #[error("invalid number {text:?} at offset {offset}")]
    InvalidNumber { text: String, offset: usize },
    #[error("identifier {name:?} at offset {offset} is not a literal")]
    NotALiteral { name: String, offset: usize },
    #[error("unexpected content after the array at offset {0}")]
    TrailingContent(usize),
}

/// Parse a history payload into raw rows
pub fn parse_history_payload(input: &str) -> Result<Vec<HistoryRow>, LiteralError> {
    let mut parser = Parser::new(input);
    parser.skip_ws();
    if parser.at_end() {
        return Err(LiteralError::Empty);
    }

    parser.assignment_prefix()?;
    let rows = parser.outer_array()?;

    parser.skip_ws();
    if parser.peek() == Some(';') {
        parser.pos += 1;
        parser.skip_ws();
    }
    if !parser.at_end() {
        return Err(LiteralError::TrailingContent(parser.pos));
    }

    Ok(rows.into_iter().map(HistoryRow::new).collect())
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            // BOM shows up when the router's page is saved and replayed
            if c.is_whitespace() || c == '\u{feff}' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, wanted: char, expected: &'static str) -> Result<(), LiteralError> {
        match self.peek() {
            Some(c) if c == wanted => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => Err(LiteralError::Unexpected {
                found: c,
                offset: self.pos,
                expected,
            }),
            None => Err(LiteralError::UnexpectedEnd { expected }),
        }
    }

    /// `[var|let|const] ident =`, or nothing when the payload is a bare array
    fn assignment_prefix(&mut self) -> Result<(), LiteralError> {
        if self.peek() == Some('[') {
            return Ok(());
        }

        let name = self.identifier("variable name")?;
        if matches!(name.as_str(), "var" | "let" | "const") {
            self.skip_ws();
            self.identifier("variable name")?;
        }

        self.skip_ws();
        self.expect('=', "'='")?;
        self.skip_ws();
        Ok(())
    }

    fn identifier(&mut self, expected: &'static str) -> Result<String, LiteralError> {
        let start = self.pos;
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
            Some(c) => {
                return Err(LiteralError::Unexpected {
                    found: c,
                    offset: start,
                    expected,
                });
            }
            None => return Err(LiteralError::UnexpectedEnd { expected }),
        }

        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
                self.pos += 1;
            } else {
                break;
            }
        }

        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn outer_array(&mut self) -> Result<Vec<Vec<String>>, LiteralError> {
        self.expect('[', "'['")?;
        let mut rows = Vec::new();

        loop {
            self.skip_ws();
            if self.peek() == Some(']') {
                self.pos += 1;
                return Ok(rows);
            }

            rows.push(self.row()?);

            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {
                    self.pos += 1;
                    return Ok(rows);
                }
                Some(c) => {
                    return Err(LiteralError::Unexpected {
                        found: c,
                        offset: self.pos,
                        expected: "',' or ']'",
                    });
                }
                None => return Err(LiteralError::UnexpectedEnd { expected: "']'" }),
            }
        }
    }

    fn row(&mut self) -> Result<Vec<String>, LiteralError> {
        self.expect('[', "'[' starting a row")?;
        let mut fields = Vec::new();

        loop {
            self.skip_ws();
            if self.peek() == Some(']') {
                self.pos += 1;
                return Ok(fields);
            }

            fields.push(self.scalar()?);

            self.skip_ws();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(']') => {
                    self.pos += 1;
                    return Ok(fields);
                }
                Some(c) => {
                    return Err(LiteralError::Unexpected {
                        found: c,
                        offset: self.pos,
                        expected: "',' or ']'",
                    });
                }
                None => return Err(LiteralError::UnexpectedEnd { expected: "']'" }),
            }
        }
    }

    fn scalar(&mut self) -> Result<String, LiteralError> {
        match self.peek() {
            Some(q @ ('"' | '\'')) => self.string(q),
            Some(c) if c == '-' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let offset = self.pos;
                let name = self.identifier("literal")?;
                match name.as_str() {
                    "true" | "false" => Ok(name),
                    "null" => Ok(String::new()),
                    _ => Err(LiteralError::NotALiteral { name, offset }),
                }
            }
            Some(c) => Err(LiteralError::Unexpected {
                found: c,
                offset: self.pos,
                expected: "string or number literal",
            }),
            None => Err(LiteralError::UnexpectedEnd {
                expected: "string or number literal",
            }),
        }
    }

    fn string(&mut self, quote: char) -> Result<String, LiteralError> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();

        loop {
            let Some(c) = self.peek() else {
                return Err(LiteralError::UnterminatedString(start));
            };
            self.pos += 1;

            match c {
                c if c == quote => return Ok(value),
                '\n' | '\r' => return Err(LiteralError::UnterminatedString(start)),
                '\\' => value.push(self.escape()?),
                c => value.push(c),
            }
        }
    }

    fn escape(&mut self) -> Result<char, LiteralError> {
        let offset = self.pos - 1;
        let Some(c) = self.peek() else {
            return Err(LiteralError::InvalidEscape(offset));
        };
        self.pos += 1;

        match c {
            '\\' | '"' | '\'' | '/' => Ok(c),
            'n' => Ok('\n'),
            'r' => Ok('\r'),
            't' => Ok('\t'),
            'b' => Ok('\u{8}'),
            'f' => Ok('\u{c}'),
            'x' => self.hex_escape(2, offset),
            'u' => self.hex_escape(4, offset),
            _ => Err(LiteralError::InvalidEscape(offset)),
        }
    }

    fn hex_escape(&mut self, digits: usize, offset: usize) -> Result<char, LiteralError> {
        let end = self.pos + digits;
        if end > self.chars.len() {
            return Err(LiteralError::InvalidEscape(offset));
        }
        let hex: String = self.chars[self.pos..end].iter().collect();
        let code = u32::from_str_radix(&hex, 16).map_err(|_| LiteralError::InvalidEscape(offset))?;
        self.pos = end;
        char::from_u32(code).ok_or(LiteralError::InvalidEscape(offset))
    }

    fn number(&mut self) -> Result<String, LiteralError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while let Some(c) = self.peek() {
            let sign_after_exponent =
                (c == '+' || c == '-') && matches!(self.chars.get(self.pos - 1), Some('e' | 'E'));
            if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || sign_after_exponent {
                self.pos += 1;
            } else {
                break;
            }
        }

        let text: String = self.chars[start..self.pos].iter().collect();
        let well_formed = text
            .trim_start_matches('-')
            .starts_with(|c: char| c.is_ascii_digit())
            && text.parse::<f64>().is_ok_and(f64::is_finite);
        if !well_formed {
            return Err(LiteralError::InvalidNumber {
                text,
                offset: start,
            });
        }
        Ok(text)
    }
}
