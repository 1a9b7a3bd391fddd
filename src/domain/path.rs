//! Name paths and reference strings.
//!
//! A [`CanvasPath`] addresses a node by the child names leading to it from an
//! ancestor. A [`ReferenceString`] is the stored target of a linked node: a run
//! of leading `<` escapes followed by a node name, optionally continued by
//! `/`-separated child names that descend into the named node.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::ParseError;

/// The escape character that walks one level up from a reference's anchor.
pub const ESCAPE: char = '<';

/// Separator between names in a textual path.
pub const SEPARATOR: char = '/';

/// Sequence of child names from an ancestor down to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanvasPath(Vec<String>);

impl CanvasPath {
    /// The empty path, addressing the ancestor itself.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Parse `a/b/c`. The empty string is the root path.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        Parser::new(input).parse_path()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// A new path one level deeper.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.into());
        Self(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    pub fn join(&self, other: &CanvasPath) -> Self {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    pub fn starts_with(&self, prefix: &CanvasPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn strip_prefix(&self, prefix: &CanvasPath) -> Option<Self> {
        self.0
            .strip_prefix(prefix.0.as_slice())
            .map(|rest| Self(rest.to_vec()))
    }
}

impl fmt::Display for CanvasPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        write!(f, "{}", self.0.join("/"))
    }
}

/// Parsed form of a linked node's target string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceString {
    pub escapes: usize,
    pub name: String,
}

impl ReferenceString {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        Parser::new(input).parse_reference()
    }

    /// Split without validating the name. Used by resolution, which treats a
    /// malformed name as simply unresolvable.
    pub fn split(input: &str) -> Self {
        let escapes = input.chars().take_while(|c| *c == ESCAPE).count();
        Self {
            escapes,
            name: input[escapes * ESCAPE.len_utf8()..].to_string(),
        }
    }

    pub fn with_escapes(&self, escapes: usize) -> Self {
        Self {
            escapes,
            name: self.name.clone(),
        }
    }

    /// The name looked up from the anchor, and the child path below it.
    pub fn head_and_rest(&self) -> (&str, CanvasPath) {
        let mut segments = self.name.split(SEPARATOR);
        let head = segments.next().unwrap_or_default();
        (head, CanvasPath::from_segments(segments))
    }
}

impl fmt::Display for ReferenceString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for _ in 0..self.escapes {
            write!(f, "{ESCAPE}")?;
        }
        write!(f, "{}", self.name)
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn parse_name(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch == SEPARATOR {
                break;
            }
            if ch == ESCAPE || ch.is_whitespace() {
                return Err(ParseError {
                    message: format!("unexpected '{}' in name", ch),
                    position: self.pos,
                });
            }
            self.advance();
        }
        if self.pos == start {
            return Err(ParseError {
                message: "expected name".to_string(),
                position: start,
            });
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_path(&mut self) -> Result<CanvasPath, ParseError> {
        let mut segments = Vec::new();
        if self.input.is_empty() {
            return Ok(CanvasPath(segments));
        }
        loop {
            segments.push(self.parse_name()?);
            match self.advance() {
                None => break,
                Some(SEPARATOR) => continue,
                Some(ch) => {
                    return Err(ParseError {
                        message: format!("expected '/', found '{}'", ch),
                        position: self.pos - ch.len_utf8(),
                    });
                }
            }
        }
        Ok(CanvasPath(segments))
    }

    fn parse_reference(&mut self) -> Result<ReferenceString, ParseError> {
        let mut escapes = 0;
        while self.peek() == Some(ESCAPE) {
            self.advance();
            escapes += 1;
        }
        if self.peek().is_none() {
            if escapes == 0 {
                return Err(ParseError {
                    message: "empty reference".to_string(),
                    position: 0,
                });
            }
            return Ok(ReferenceString {
                escapes,
                name: String::new(),
            });
        }
        let start = self.pos;
        loop {
            self.parse_name()?;
            match self.advance() {
                None => break,
                Some(SEPARATOR) => continue,
                Some(ch) => {
                    return Err(ParseError {
                        message: format!("unexpected '{}' after name", ch),
                        position: self.pos - ch.len_utf8(),
                    });
                }
            }
        }
        Ok(ReferenceString {
            escapes,
            name: self.input[start..].to_string(),
        })
    }
}
