//! Field-equality queries.
//!
//! The store describes every filtered listing as a [`FieldQuery`]. The
//! embedded backend evaluates it in-process against the serialized values;
//! the remote backend ships it as an indexed query string with named
//! parameters:
//!
//! ```text
//! FROM karavan.PodStatus WHERE project = :project AND env = :env
//! ```
//!
//! [`ParsedQuery`] is the server-side half: it parses such a string, binds
//! parameters, and evaluates predicates against JSON documents. Both halves
//! share [`field_equals`], so the two backends agree on what matches.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{StateError, StateResult};

/// Conjunction of `field = value` predicates over one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldQuery {
    type_name: &'static str,
    filters: Vec<(&'static str, String)>,
}

impl FieldQuery {
    pub fn from_type(type_name: &'static str) -> Self {
        Self {
            type_name,
            filters: Vec::new(),
        }
    }

    /// Add an equality predicate; the parameter is named after the field.
    pub fn eq(mut self, field: &'static str, value: impl Into<String>) -> Self {
        self.filters.push((field, value.into()));
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn query_string(&self) -> String {
        let mut query = format!("FROM {}", self.type_name);
        for (i, (field, _)) in self.filters.iter().enumerate() {
            query.push_str(if i == 0 { " WHERE " } else { " AND " });
            query.push_str(&format!("{field} = :{field}"));
        }
        query
    }

    pub fn params(&self) -> BTreeMap<String, String> {
        self.filters
            .iter()
            .map(|(field, value)| (field.to_string(), value.clone()))
            .collect()
    }

    /// In-process evaluation against a serialized value.
    pub fn matches(&self, doc: &Value) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| field_equals(doc, field, value))
    }
}

/// Whether `doc.field` equals `expected`, comparing scalars by their text form.
/// A missing field never matches.
pub fn field_equals(doc: &Value, field: &str, expected: &str) -> bool {
    match doc.get(field) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Number(n)) => n.to_string() == expected,
        Some(Value::Bool(b)) => b.to_string() == expected,
        _ => false,
    }
}

// ── Server-side parsing ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Param(String),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub field: String,
    pub operand: Operand,
}

/// A parsed `FROM <type> [WHERE a = :p AND b = 'x' ...]` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedQuery {
    pub entity: String,
    pub predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Word(String),
    Param(String),
    Str(String),
    Eq,
}

fn tokenize(input: &str) -> StateResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '=' {
            chars.next();
            tokens.push(Token::Eq);
        } else if c == ':' {
            chars.next();
            let name = take_word(&mut chars);
            if name.is_empty() {
                return Err(StateError::Query(format!("empty parameter name in '{input}'")));
            }
            tokens.push(Token::Param(name));
        } else if c == '\'' {
            chars.next();
            let mut s = String::new();
            loop {
                match chars.next() {
                    Some('\'') if chars.peek() == Some(&'\'') => {
                        chars.next();
                        s.push('\'');
                    }
                    Some('\'') => break,
                    Some(ch) => s.push(ch),
                    None => {
                        return Err(StateError::Query(format!(
                            "unterminated string literal in '{input}'"
                        )));
                    }
                }
            }
            tokens.push(Token::Str(s));
        } else if is_word_char(c) {
            tokens.push(Token::Word(take_word(&mut chars)));
        } else {
            return Err(StateError::Query(format!(
                "unexpected character '{c}' in '{input}'"
            )));
        }
    }
    Ok(tokens)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

fn take_word(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        if !is_word_char(c) {
            break;
        }
        word.push(c);
        chars.next();
    }
    word
}

fn keyword(token: Option<&Token>, kw: &str) -> bool {
    matches!(token, Some(Token::Word(w)) if w.eq_ignore_ascii_case(kw))
}

impl ParsedQuery {
    pub fn parse(input: &str) -> StateResult<Self> {
        let tokens = tokenize(input)?;
        let mut it = tokens.iter();

        if !keyword(it.next(), "FROM") {
            return Err(StateError::Query(format!("expected FROM in '{input}'")));
        }
        let entity = match it.next() {
            Some(Token::Word(w)) => w.clone(),
            _ => return Err(StateError::Query(format!("expected entity name in '{input}'"))),
        };

        let mut predicates = Vec::new();
        match it.next() {
            None => return Ok(Self { entity, predicates }),
            t if keyword(t, "WHERE") => {}
            _ => return Err(StateError::Query(format!("expected WHERE in '{input}'"))),
        }

        loop {
            let field = match it.next() {
                Some(Token::Word(w)) => w.clone(),
                _ => return Err(StateError::Query(format!("expected field name in '{input}'"))),
            };
            if it.next() != Some(&Token::Eq) {
                return Err(StateError::Query(format!("expected '=' after {field}")));
            }
            let operand = match it.next() {
                Some(Token::Param(p)) => Operand::Param(p.clone()),
                Some(Token::Str(s)) => Operand::Literal(s.clone()),
                Some(Token::Word(w)) => Operand::Literal(w.clone()),
                _ => return Err(StateError::Query(format!("expected value for {field}"))),
            };
            predicates.push(Predicate { field, operand });

            match it.next() {
                None => break,
                t if keyword(t, "AND") => continue,
                _ => return Err(StateError::Query(format!("expected AND in '{input}'"))),
            }
        }

        Ok(Self { entity, predicates })
    }

    /// Resolve every `:param` against `params`; unbound parameters are an error.
    pub fn bind(&self, params: &BTreeMap<String, String>) -> StateResult<Vec<(String, String)>> {
        self.predicates
            .iter()
            .map(|p| {
                let value = match &p.operand {
                    Operand::Literal(v) => v.clone(),
                    Operand::Param(name) => params
                        .get(name)
                        .cloned()
                        .ok_or_else(|| StateError::Query(format!("unbound parameter :{name}")))?,
                };
                Ok((p.field.clone(), value))
            })
            .collect()
    }

    /// Render with parameters inlined as quoted literals, for servers that
    /// take the query as a single string.
    pub fn render_inline(&self, params: &BTreeMap<String, String>) -> StateResult<String> {
        let bound = self.bind(params)?;
        let mut query = format!("FROM {}", self.entity);
        for (i, (field, value)) in bound.iter().enumerate() {
            query.push_str(if i == 0 { " WHERE " } else { " AND " });
            query.push_str(&format!("{field} = '{}'", value.replace('\'', "''")));
        }
        Ok(query)
    }
}
