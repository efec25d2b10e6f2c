//! Metadata filter expressions.
//!
//! A [`Filter`] is a tree of conditions combined with `and`, `or` and `not`.
//! Field names are dotted paths into a record's metadata (`author.name`);
//! `id`, `source_id`, `position` and `text` resolve to the record itself.
//! Conditions on a missing field are false, so `not` is the only way to
//! select records that lack a field.

use crate::types::Metadata;
use ragline_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

/// Comparison operator of a [`Filter::Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Field equals one of the values of an array
    In,
    /// Array field has the value as an element, or string field has it as a
    /// substring
    Contains,
    /// Field is present and not null; the value is ignored
    Exists,
}

impl FilterOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::In => "in",
            Self::Contains => "contains",
            Self::Exists => "exists",
        }
    }
}

/// Physical columns a filter may be pushed down to as SQL.
#[derive(Debug, Clone, Copy)]
pub struct SqlColumns<'a> {
    /// Scalar columns compared directly
    pub scalar: &'a [&'a str],
    /// List-of-string columns; only `contains` translates, as `array_has`
    pub lists: &'a [&'a str],
}

/// Boolean filter over record fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Condition {
        field: String,
        op: FilterOp,
        #[serde(default)]
        value: Value,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

/// Something a filter can be evaluated against.
pub trait FilterTarget {
    /// Resolve a (possibly dotted) field path.
    fn field(&self, path: &str) -> Option<Cow<'_, Value>>;
}

impl FilterTarget for Metadata {
    fn field(&self, path: &str) -> Option<Cow<'_, Value>> {
        lookup_path(self, path).map(Cow::Borrowed)
    }
}

/// Walk a dotted path through nested JSON objects.
pub fn lookup_path<'a>(metadata: &'a Metadata, path: &str) -> Option<&'a Value> {
    // A literal key containing dots wins over nested lookup
    if let Some(value) = metadata.get(path) {
        return Some(value);
    }
    let mut parts = path.split('.');
    let mut current = metadata.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

impl Filter {
    pub fn condition(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self::Condition {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::condition(field, FilterOp::Eq, value)
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self::condition(field, FilterOp::Exists, Value::Null)
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::And(mut filters) => {
                filters.push(other);
                Self::And(filters)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Self::Or(mut filters) => {
                filters.push(other);
                Self::Or(filters)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Evaluate against a record.
    pub fn matches<T: FilterTarget + ?Sized>(&self, target: &T) -> bool {
        match self {
            Self::Condition { field, op, value } => match target.field(field) {
                Some(actual) => compare(&actual, *op, value),
                None => false,
            },
            Self::And(filters) => filters.iter().all(|f| f.matches(target)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(target)),
            Self::Not(inner) => !inner.matches(target),
        }
    }

    /// Every field path the filter refers to.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Condition { field, .. } => out.push(field),
            Self::And(filters) | Self::Or(filters) => {
                filters.iter().for_each(|f| f.collect_fields(out))
            }
            Self::Not(inner) => inner.collect_fields(out),
        }
    }

    /// Translate to a SQL predicate when every condition targets one of
    /// `columns`; `None` means the filter must be evaluated client-side.
    pub fn to_sql(&self, columns: &SqlColumns<'_>) -> Option<String> {
        match self {
            Self::Condition { field, op, value } => {
                if columns.lists.contains(&field.as_str()) {
                    return list_condition_sql(field, *op, value);
                }
                if !columns.scalar.contains(&field.as_str()) {
                    return None;
                }
                condition_sql(field, *op, value)
            }
            Self::And(filters) => join_sql(filters, " AND ", columns),
            Self::Or(filters) => join_sql(filters, " OR ", columns),
            Self::Not(inner) => inner.to_sql(columns).map(|sql| format!("NOT ({})", sql)),
        }
    }

    /// Parse the textual filter syntax.
    ///
    /// ```text
    /// source_id == "guide.md" and (tags contains rust or position < 3)
    /// not title exists
    /// lang in [en, de]
    /// ```
    pub fn parse(input: &str) -> AppResult<Self> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(filter_error("empty filter expression"));
        }
        let mut parser = Parser { tokens, pos: 0 };
        let filter = parser.parse_or()?;
        match parser.peek() {
            None => Ok(filter),
            Some(token) => Err(filter_error(&format!("unexpected '{}'", token))),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Condition {
                field,
                op: FilterOp::Exists,
                ..
            } => write!(f, "{} exists", field),
            Self::Condition { field, op, value } => write!(f, "{} {} {}", field, op.as_str(), value),
            Self::And(filters) | Self::Or(filters) => {
                let sep = if matches!(self, Self::And(_)) { " and " } else { " or " };
                let parts: Vec<String> = filters.iter().map(|x| format!("({})", x)).collect();
                write!(f, "{}", parts.join(sep))
            }
            Self::Not(inner) => write!(f, "not ({})", inner),
        }
    }
}

fn compare(actual: &Value, op: FilterOp, expected: &Value) -> bool {
    match op {
        FilterOp::Exists => !actual.is_null(),
        FilterOp::Eq => values_equal(actual, expected),
        FilterOp::Ne => !actual.is_null() && !values_equal(actual, expected),
        FilterOp::Gt => order(actual, expected) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(order(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
        FilterOp::Lt => order(actual, expected) == Some(Ordering::Less),
        FilterOp::Lte => matches!(order(actual, expected), Some(Ordering::Less | Ordering::Equal)),
        FilterOp::In => expected
            .as_array()
            .is_some_and(|options| options.iter().any(|o| values_equal(actual, o))),
        FilterOp::Contains => match (actual, expected) {
            (Value::Array(items), _) => items.iter().any(|item| values_equal(item, expected)),
            (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
            _ => false,
        },
    }
}

/// Numbers compare by value so `3 == 3.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Numbers order numerically and strings lexicographically (which also
/// orders RFC 3339 timestamps); anything else is incomparable.
fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn join_sql(filters: &[Filter], sep: &str, columns: &SqlColumns<'_>) -> Option<String> {
    if filters.is_empty() {
        return None;
    }
    let parts = filters
        .iter()
        .map(|f| f.to_sql(columns).map(|sql| format!("({})", sql)))
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join(sep))
}

/// List columns only answer membership; anything else stays client-side.
fn list_condition_sql(field: &str, op: FilterOp, value: &Value) -> Option<String> {
    match (op, value) {
        (FilterOp::Contains, Value::String(needle)) => Some(format!(
            "array_has({}, '{}')",
            field,
            needle.replace('\'', "''")
        )),
        _ => None,
    }
}

fn condition_sql(field: &str, op: FilterOp, value: &Value) -> Option<String> {
    let sql = match op {
        FilterOp::Exists => format!("{} IS NOT NULL", field),
        FilterOp::Eq => format!("{} = {}", field, sql_literal(value)?),
        FilterOp::Ne => format!("{} <> {}", field, sql_literal(value)?),
        FilterOp::Gt => format!("{} > {}", field, sql_literal(value)?),
        FilterOp::Gte => format!("{} >= {}", field, sql_literal(value)?),
        FilterOp::Lt => format!("{} < {}", field, sql_literal(value)?),
        FilterOp::Lte => format!("{} <= {}", field, sql_literal(value)?),
        FilterOp::In => {
            let items = value
                .as_array()?
                .iter()
                .map(sql_literal)
                .collect::<Option<Vec<_>>>()?;
            if items.is_empty() {
                return Some("FALSE".to_string());
            }
            format!("{} IN ({})", field, items.join(", "))
        }
        FilterOp::Contains => {
            let needle = value.as_str()?;
            // LIKE wildcards in the needle cannot be expressed safely
            if needle.contains(['%', '_', '\\']) {
                return None;
            }
            format!("{} LIKE '%{}%'", field, needle.replace('\'', "''"))
        }
    };
    Some(sql)
}

fn sql_literal(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(format!("'{}'", s.replace('\'', "''"))),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
        _ => None,
    }
}

fn filter_error(message: &str) -> AppError {
    AppError::InvalidConfig(format!("Invalid filter: {}", message))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(w) => write!(f, "{}", w),
            Self::Quoted(q) => write!(f, "\"{}\"", q),
            Self::Op(op) => write!(f, "{}", op),
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
            Self::LBracket => write!(f, "["),
            Self::RBracket => write!(f, "]"),
            Self::Comma => write!(f, ","),
        }
    }
}

fn tokenize(input: &str) -> AppResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | ')' | '[' | ']' | ',' => {
                chars.next();
                tokens.push(match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    _ => Token::Comma,
                });
            }
            '"' | '\'' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    match ch {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                text.push(escaped);
                            }
                        }
                        ch if ch == c => {
                            closed = true;
                            break;
                        }
                        ch => text.push(ch),
                    }
                }
                if !closed {
                    return Err(filter_error("unterminated string"));
                }
                tokens.push(Token::Quoted(text));
            }
            '=' | '!' | '<' | '>' => {
                chars.next();
                let followed_by_eq = chars.next_if_eq(&'=').is_some();
                let op = match (c, followed_by_eq) {
                    ('=', _) => "==",
                    ('!', true) => "!=",
                    ('<', true) => "<=",
                    ('>', true) => ">=",
                    ('<', false) => "<",
                    ('>', false) => ">",
                    _ => return Err(filter_error("expected '!='")),
                };
                tokens.push(Token::Op(op));
            }
            _ => {
                let mut word = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || "()[],=!<>\"'".contains(ch) {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn parse_or(&mut self) -> AppResult<Filter> {
        let mut filter = self.parse_and()?;
        while self.keyword("or") {
            filter = filter.or(self.parse_and()?);
        }
        Ok(filter)
    }

    fn parse_and(&mut self) -> AppResult<Filter> {
        let mut filter = self.parse_unary()?;
        while self.keyword("and") {
            filter = filter.and(self.parse_unary()?);
        }
        Ok(filter)
    }

    fn parse_unary(&mut self) -> AppResult<Filter> {
        if self.keyword("not") {
            return Ok(self.parse_unary()?.negate());
        }
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            return match self.next() {
                Some(Token::RParen) => Ok(inner),
                _ => Err(filter_error("missing ')'")),
            };
        }
        self.parse_condition()
    }

    fn parse_condition(&mut self) -> AppResult<Filter> {
        let field = match self.next() {
            Some(Token::Word(w)) => w,
            Some(Token::Quoted(q)) => q,
            Some(other) => return Err(filter_error(&format!("expected field, found '{}'", other))),
            None => return Err(filter_error("expected field")),
        };

        let op = match self.next() {
            Some(Token::Op(op)) => match op {
                "==" => FilterOp::Eq,
                "!=" => FilterOp::Ne,
                ">" => FilterOp::Gt,
                ">=" => FilterOp::Gte,
                "<" => FilterOp::Lt,
                _ => FilterOp::Lte,
            },
            Some(Token::Word(w)) => match w.to_ascii_lowercase().as_str() {
                "in" => FilterOp::In,
                "contains" => FilterOp::Contains,
                "exists" => return Ok(Filter::exists(field)),
                other => return Err(filter_error(&format!("unknown operator '{}'", other))),
            },
            _ => return Err(filter_error(&format!("expected operator after '{}'", field))),
        };

        let value = if op == FilterOp::In {
            self.parse_list()?
        } else {
            self.parse_value()?
        };
        Ok(Filter::condition(field, op, value))
    }

    fn parse_list(&mut self) -> AppResult<Value> {
        if self.next() != Some(Token::LBracket) {
            return Err(filter_error("'in' expects a list like [a, b]"));
        }
        let mut items = Vec::new();
        if self.peek() == Some(&Token::RBracket) {
            self.pos += 1;
            return Ok(Value::Array(items));
        }
        loop {
            items.push(self.parse_value()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RBracket) => break,
                _ => return Err(filter_error("missing ']'")),
            }
        }
        Ok(Value::Array(items))
    }

    fn parse_value(&mut self) -> AppResult<Value> {
        match self.next() {
            Some(Token::Quoted(s)) => Ok(Value::String(s)),
            Some(Token::Word(w)) => Ok(bare_value(&w)),
            _ => Err(filter_error("expected value")),
        }
    }
}

/// Unquoted values: booleans, null and numbers keep their type, everything
/// else is a string.
fn bare_value(word: &str) -> Value {
    match word {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => {
            if let Ok(n) = word.parse::<i64>() {
                Value::from(n)
            } else if let Some(n) = word.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                Value::Number(n)
            } else {
                Value::String(word.to_string())
            }
        }
    }
}
