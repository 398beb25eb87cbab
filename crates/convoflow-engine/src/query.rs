//! Contact query matcher for dynamic groups.
//!
//! Queries are evaluated against a contact's query context (see
//! [`Contact::query_context`](crate::types::Contact::query_context)).
//!
//! Supported:
//! - Attributes: `name`, `language`, `status`, `uuid`, `id`, `timezone`,
//!   `tickets`, `urn_count`, `created_on`, `last_seen_on`
//! - Fields: `fields.age` or the bare key `age`
//! - URN schemes: `tel`, `mailto`, ... match the contact's first URN of that scheme
//! - `group` matches membership by group name
//! - Comparisons: `=` (or `==`), `!=`, `~` (contains), `>`, `<`, `>=`, `<=`
//! - Logical: `AND` / `&&`, `OR` / `||`, `!`, parentheses
//! - Literals: quoted or bare strings, numbers, `true`/`false`/`null`
//!
//! String comparison is case-insensitive. An unset value equals `""`.

use serde_json::Value;

use crate::errors::QueryError;

const ATTRIBUTES: &[&str] = &[
    "uuid",
    "id",
    "name",
    "language",
    "status",
    "timezone",
    "tickets",
    "urn_count",
    "created_on",
    "last_seen_on",
];

/// Evaluates a query against a contact query context.
pub fn matches(query: &str, contact: &Value) -> Result<bool, QueryError> {
    let tokens = tokenize(query)?;
    if tokens.is_empty() {
        return Err(QueryError::Parse {
            message: "empty query".into(),
        });
    }
    let (val, rest) = parse_or(&tokens, contact)?;
    if let Some(tok) = rest.first() {
        return Err(QueryError::Parse {
            message: format!("unexpected token: {tok:?}"),
        });
    }
    Ok(val.as_bool())
}

/// Checks a query parses, without a contact to evaluate it against.
pub fn validate(query: &str) -> Result<(), QueryError> {
    matches(query, &Value::Null).map(|_| ())
}

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Eq,
    Ne,
    Contains,
    Gt,
    Lt,
    Ge,
    Le,
    And,
    Or,
    Not,
    LParen,
    RParen,
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

fn tokenize(input: &str) -> Result<Vec<Token>, QueryError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += if peek(&chars, i + 1) == Some('=') { 2 } else { 1 };
            }
            '~' => {
                tokens.push(Token::Contains);
                i += 1;
            }
            '!' if peek(&chars, i + 1) == Some('=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '>' if peek(&chars, i + 1) == Some('=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '<' if peek(&chars, i + 1) == Some('=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '&' if peek(&chars, i + 1) == Some('&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if peek(&chars, i + 1) == Some('|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '"' | '\'' => {
                let quote = chars[i];
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(QueryError::Parse {
                        message: "unterminated string literal".into(),
                    });
                }
                tokens.push(Token::Str(chars[start..i].iter().collect()));
                i += 1;
            }
            c if c.is_ascii_digit()
                || ((c == '-' || c == '+')
                    && peek(&chars, i + 1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                // phone numbers and dates are strings that start with digits
                if c == '+' || (i < chars.len() && is_word_char(chars[i])) {
                    while i < chars.len() && is_word_char(chars[i]) {
                        i += 1;
                    }
                    tokens.push(Token::Str(chars[start..i].iter().collect()));
                    continue;
                }
                let num: f64 = text.parse().map_err(|_| QueryError::Parse {
                    message: format!("invalid number: {text}"),
                })?;
                tokens.push(Token::Num(num));
            }
            c if is_word_char(c) => {
                let start = i;
                while i < chars.len() && is_word_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.to_lowercase().as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            other => {
                return Err(QueryError::Parse {
                    message: format!("unexpected character: {other}"),
                });
            }
        }
    }
    Ok(tokens)
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '-' | '@' | '+' | ':')
}

fn peek(chars: &[char], idx: usize) -> Option<char> {
    chars.get(idx).copied()
}

// ---------------------------------------------------------------------------
// Evaluated value (internal)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum EvalValue {
    Bool(bool),
    Num(f64),
    Str(String),
    Null,
    List(Vec<String>),
}

impl EvalValue {
    fn as_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Null => false,
            Self::Num(n) => *n != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<String> {
        match self {
            Self::Str(s) => Some(s.to_lowercase()),
            Self::Num(n) => Some(format_number(*n)),
            Self::Bool(b) => Some(b.to_string()),
            Self::Null => Some(String::new()),
            Self::List(_) => None,
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

// ---------------------------------------------------------------------------
// Recursive descent parser: ! > comparison > AND > OR
// ---------------------------------------------------------------------------

type ParseResult<'a> = Result<(EvalValue, &'a [Token]), QueryError>;

/// or_expr = and_expr ( OR and_expr )*
fn parse_or<'a>(tokens: &'a [Token], data: &Value) -> ParseResult<'a> {
    let (mut left, mut rest) = parse_and(tokens, data)?;
    while rest.first() == Some(&Token::Or) {
        let (right, r) = parse_and(&rest[1..], data)?;
        left = EvalValue::Bool(left.as_bool() || right.as_bool());
        rest = r;
    }
    Ok((left, rest))
}

/// and_expr = not_expr ( AND? not_expr )*, adjacent conditions are ANDed
fn parse_and<'a>(tokens: &'a [Token], data: &Value) -> ParseResult<'a> {
    let (mut left, mut rest) = parse_not(tokens, data)?;
    loop {
        let next = match rest.first() {
            Some(Token::And) => &rest[1..],
            Some(Token::Ident(_)) | Some(Token::LParen) | Some(Token::Not) => rest,
            _ => break,
        };
        let (right, r) = parse_not(next, data)?;
        left = EvalValue::Bool(left.as_bool() && right.as_bool());
        rest = r;
    }
    Ok((left, rest))
}

/// not_expr = "!" not_expr | comparison
fn parse_not<'a>(tokens: &'a [Token], data: &Value) -> ParseResult<'a> {
    if tokens.first() == Some(&Token::Not) {
        let (val, rest) = parse_not(&tokens[1..], data)?;
        return Ok((EvalValue::Bool(!val.as_bool()), rest));
    }
    parse_comparison(tokens, data)
}

/// comparison = "(" or_expr ")" | operand ( op value )?
fn parse_comparison<'a>(tokens: &'a [Token], data: &Value) -> ParseResult<'a> {
    if tokens.first() == Some(&Token::LParen) {
        let (val, rest) = parse_or(&tokens[1..], data)?;
        if rest.first() != Some(&Token::RParen) {
            return Err(QueryError::Parse {
                message: "missing closing parenthesis".into(),
            });
        }
        return Ok((val, &rest[1..]));
    }

    let (left, rest) = parse_operand(tokens, data)?;
    let op = match rest.first() {
        Some(Token::Eq) => CompOp::Eq,
        Some(Token::Ne) => CompOp::Ne,
        Some(Token::Contains) => CompOp::Contains,
        Some(Token::Gt) => CompOp::Gt,
        Some(Token::Lt) => CompOp::Lt,
        Some(Token::Ge) => CompOp::Ge,
        Some(Token::Le) => CompOp::Le,
        _ => return Ok((left, rest)),
    };
    let (right, rest) = parse_value(&rest[1..])?;
    Ok((EvalValue::Bool(compare(&left, &right, op)), rest))
}

#[derive(Clone, Copy)]
enum CompOp {
    Eq,
    Ne,
    Contains,
    Gt,
    Lt,
    Ge,
    Le,
}

fn compare(left: &EvalValue, right: &EvalValue, op: CompOp) -> bool {
    if let EvalValue::List(items) = left {
        let any = items
            .iter()
            .any(|item| compare(&EvalValue::Str(item.clone()), right, CompOp::Eq));
        return match op {
            CompOp::Eq => any,
            CompOp::Ne => !any,
            CompOp::Contains => items
                .iter()
                .any(|item| compare(&EvalValue::Str(item.clone()), right, CompOp::Contains)),
            _ => false,
        };
    }

    if matches!(op, CompOp::Gt | CompOp::Lt | CompOp::Ge | CompOp::Le) {
        if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
            return match op {
                CompOp::Gt => l > r,
                CompOp::Lt => l < r,
                CompOp::Ge => l >= r || (l - r).abs() < f64::EPSILON,
                _ => l <= r || (l - r).abs() < f64::EPSILON,
            };
        }
        // dates compare as text when both sides are ISO formatted
        if let (EvalValue::Str(l), EvalValue::Str(r)) = (left, right) {
            return match op {
                CompOp::Gt => l.as_str() > r.as_str(),
                CompOp::Lt => l.as_str() < r.as_str(),
                CompOp::Ge => l >= r,
                _ => l <= r,
            };
        }
        return false;
    }

    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        if matches!(op, CompOp::Eq | CompOp::Ne) {
            let equal = (l - r).abs() < f64::EPSILON;
            return matches!(op, CompOp::Eq) == equal;
        }
    }

    let (Some(l), Some(r)) = (left.as_text(), right.as_text()) else {
        return false;
    };
    match op {
        CompOp::Eq => l == r,
        CompOp::Ne => l != r,
        CompOp::Contains => !r.is_empty() && l.contains(&r),
        _ => false,
    }
}

/// operand = Ident (resolved against the contact) | literal
fn parse_operand<'a>(tokens: &'a [Token], data: &Value) -> ParseResult<'a> {
    match tokens.first() {
        Some(Token::Ident(name)) => Ok((resolve(data, name), &tokens[1..])),
        _ => parse_value(tokens),
    }
}

/// value = Str | Num | Bool | Null | bare word
fn parse_value(tokens: &[Token]) -> ParseResult<'_> {
    let Some(first) = tokens.first() else {
        return Err(QueryError::Parse {
            message: "unexpected end of query".into(),
        });
    };
    let val = match first {
        Token::Str(s) | Token::Ident(s) => EvalValue::Str(s.clone()),
        Token::Num(n) => EvalValue::Num(*n),
        Token::Bool(b) => EvalValue::Bool(*b),
        Token::Null => EvalValue::Null,
        other => {
            return Err(QueryError::Parse {
                message: format!("expected value, got {other:?}"),
            })
        }
    };
    Ok((val, &tokens[1..]))
}

/// Resolves a query property against a contact query context.
fn resolve(data: &Value, name: &str) -> EvalValue {
    let lowered = name.to_lowercase();
    let value = if lowered == "group" || lowered == "groups" {
        data.get("groups")
    } else if ATTRIBUTES.contains(&lowered.as_str()) {
        data.get(lowered.as_str())
    } else if let Some(key) = lowered.strip_prefix("fields.") {
        data.get("fields").and_then(|f| f.get(key))
    } else if let Some(scheme) = lowered.strip_prefix("urns.") {
        data.get("urns").and_then(|u| u.get(scheme))
    } else if let Some(v) = data.get("urns").and_then(|u| u.get(lowered.as_str())) {
        Some(v)
    } else {
        data.get("fields").and_then(|f| f.get(lowered.as_str()))
    };

    match value {
        None | Some(Value::Null) => EvalValue::Null,
        Some(Value::Bool(b)) => EvalValue::Bool(*b),
        Some(Value::Number(n)) => EvalValue::Num(n.as_f64().unwrap_or(0.0)),
        Some(Value::String(s)) => EvalValue::Str(s.clone()),
        Some(Value::Array(items)) => EvalValue::List(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        Some(other) => EvalValue::Str(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
