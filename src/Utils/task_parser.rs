//! parse document with structure like " title1 key1: value1, value2 key2: value2 title2 key3:value3, value4" which has titles and
//! pairs key-vector of values into HashMap<String, HashMap<String, Vec<Value>>>. Used for simulation settings:
//! ```text
//! grid
//!   start: 0.0
//!   end: 10.0
//!   points: 101
//! solver
//!   method: dopri45
//!   rtol: 1e-8
//! outputs
//!   names: P, rho, der(m)
//! ```
//! Lines starting with //, #, % or ; are comments.
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{alpha1, alphanumeric1, multispace0, space0},
    combinator::{map, recognize},
    multi::{many0, many1, separated_list0},
    sequence::{delimited, pair, separated_pair, terminated},
};
use std::collections::HashMap;
use std::fmt::Display;

pub type SectionMap = HashMap<String, Vec<Value>>;
pub type DocumentMap = HashMap<String, SectionMap>;

/// enum to represent different value types:
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Float(f64),
    Integer(i64),
    Boolean(bool),
}

impl Value {
    pub fn as_string(&self) -> Option<&String> {
        if let Value::String(s) = self { Some(s) } else { None }
    }

    /// integers are accepted where a float is expected
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        if let Value::Integer(i) = self { Some(*i) } else { None }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        if let Value::Boolean(b) = self { Some(*b) } else { None }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Float(val) => write!(f, "{}", val),
            Value::Integer(val) => write!(f, "{}", val),
            Value::Boolean(val) => write!(f, "{}", val),
        }
    }
}

fn word(input: &str) -> IResult<&str, String> {
    map(
        recognize(pair(alt((alpha1, tag("_"))), many0(alt((alphanumeric1, tag("_")))))),
        String::from,
    )
    .parse(input)
}

/// Parses a title (word characters without spaces), trailing blanks dropped
pub(crate) fn parse_title(input: &str) -> IResult<&str, String> {
    let (input, result) = word(input)?;
    Ok((input.trim_start(), result))
}

/// Parses a key (word characters without spaces)
pub(crate) fn parse_key(input: &str) -> IResult<&str, String> {
    word(input)
}

/// Single value; integer, float and boolean are tried before falling back to a string
pub(crate) fn parse_value(input: &str) -> IResult<&str, Value> {
    let (input, s) = take_while1(|c: char| !matches!(c, ',' | ' ' | '\t' | '\n' | '\r' | ';')).parse(input)?;
    let value = if let Ok(val) = s.parse::<i64>() {
        Value::Integer(val)
    } else if let Ok(val) = s.parse::<f64>() {
        Value::Float(val)
    } else if let Ok(val) = s.parse::<bool>() {
        Value::Boolean(val)
    } else {
        Value::String(s.to_string())
    };
    Ok((input, value))
}

/// Comma separated values on one line
pub(crate) fn parse_value_list(input: &str) -> IResult<&str, Vec<Value>> {
    let (input, _) = space0(input)?;
    separated_list0(delimited(space0, tag(","), space0), parse_value).parse(input)
}

/// Parses a key-value pair where value is a list
pub(crate) fn parse_key_value_pair(input: &str) -> IResult<&str, (String, Vec<Value>)> {
    let colon_separator = delimited(space0, tag(":"), space0);
    let (input, result) = separated_pair(parse_key, colon_separator, parse_value_list).parse(input)?;
    Ok((input.trim_start(), result))
}

/// Parses a section with a title and at least one key-value pair
pub(crate) fn parse_section(input: &str) -> IResult<&str, (String, SectionMap)> {
    let (input, _) = space0(input)?;
    let (input, title) = parse_title(input)?;
    let (input, _) = multispace0(input)?;
    let (input, pairs) = many1(terminated(parse_key_value_pair, space0)).parse(input)?;
    Ok((input, (title, pairs.into_iter().collect())))
}

/// Filters out comment lines (starting with //, #, %, or ;) and blank lines
pub(crate) fn filter_comments(input: &str) -> String {
    input
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.starts_with("//")
                && !trimmed.starts_with('#')
                && !trimmed.starts_with('%')
                && !trimmed.starts_with(';')
                && !trimmed.is_empty()
        })
        .collect::<Vec<&str>>()
        .join("\n")
}

/// Parses the sections of an already comment-free document
pub(crate) fn parse_document(input: &str) -> IResult<&str, DocumentMap> {
    let (input, _) = multispace0(input)?;
    let (input, sections) = many1(delimited(space0, parse_section, multispace0)).parse(input)?;
    let mut result: DocumentMap = HashMap::new();
    for (title, section_map) in sections {
        // repeated titles are merged, later keys win
        result.entry(title).or_default().extend(section_map);
    }
    Ok((input, result))
}

/// Parses a whole document; comments allowed, the complete input must be consumed.
/// An empty document gives an empty map.
pub fn parse_document_as(input: &str) -> Result<DocumentMap, String> {
    let filtered = filter_comments(input);
    if filtered.trim().is_empty() {
        return Ok(HashMap::new());
    }
    match parse_document(&filtered) {
        Ok((remaining, parsed)) => {
            if !remaining.trim().is_empty() {
                return Err(format!(
                    "Failed to parse entire document. Remaining: '{}'",
                    remaining
                ));
            }
            Ok(parsed)
        }
        Err(e) => Err(format!("Parsing error: {:?}", e)),
    }
}

/// Typed, read-only view of a parsed document.
#[derive(Debug, Clone, Default)]
pub struct TaskDocument {
    pub sections: DocumentMap,
}

impl TaskDocument {
    pub fn parse(input: &str) -> Result<Self, String> {
        Ok(Self {
            sections: parse_document_as(input)?,
        })
    }

    pub fn has_section(&self, title: &str) -> bool {
        self.sections.contains_key(title)
    }

    pub fn values(&self, title: &str, key: &str) -> Option<&Vec<Value>> {
        self.sections.get(title).and_then(|s| s.get(key))
    }

    fn single(&self, title: &str, key: &str) -> Result<Option<&Value>, String> {
        match self.values(title, key) {
            None => Ok(None),
            Some(values) if values.len() == 1 => Ok(values.first()),
            Some(values) => Err(format!(
                "{}.{} expects one value, got {}",
                title,
                key,
                values.len()
            )),
        }
    }

    pub fn get_float(&self, title: &str, key: &str) -> Result<Option<f64>, String> {
        match self.single(title, key)? {
            None => Ok(None),
            Some(v) => v
                .as_float()
                .map(Some)
                .ok_or_else(|| format!("{}.{} must be a number, got {}", title, key, v)),
        }
    }

    pub fn get_usize(&self, title: &str, key: &str) -> Result<Option<usize>, String> {
        match self.single(title, key)? {
            None => Ok(None),
            Some(v) => v
                .as_integer()
                .and_then(|i| usize::try_from(i).ok())
                .map(Some)
                .ok_or_else(|| format!("{}.{} must be a non-negative integer, got {}", title, key, v)),
        }
    }

    /// Any single value rendered as text
    pub fn get_string(&self, title: &str, key: &str) -> Result<Option<String>, String> {
        Ok(self.single(title, key)?.map(|v| v.to_string()))
    }

    pub fn get_strings(&self, title: &str, key: &str) -> Option<Vec<String>> {
        self.values(title, key)
            .map(|values| values.iter().map(|v| v.to_string()).collect())
    }
}
