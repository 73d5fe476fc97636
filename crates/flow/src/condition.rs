//! Condition expression parser and evaluator.
//!
//! Named conditions in a flow file are written in a small DSL over the
//! turn's data, intent, state, and turn number:
//!
//! ```text
//! data.company_size >= 50
//! data.email EXISTS
//! data.industry NOT IN @regulated_industries
//! intent IN @questions AND turn > 3
//! data.notes CONTAINS "budget" OR data.pain_points CONTAINS "cost"
//! state == "presentation" AND NOT (data.budget < 1000)
//! ```
//!
//! Grammar (informal):
//! ```text
//! expr     = and ("OR" and)*
//! and      = unary ("AND" unary)*
//! unary    = "NOT" unary | primary
//! primary  = "(" expr ")" | atom
//! atom     = field ["NOT"] OP value
//!          | field ["NOT"] "EXISTS"
//!          | field ["NOT"] "IN" CATEGORY
//! field    = "data." IDENT | "intent" | "state" | "turn"
//! OP       = "CONTAINS" | "MATCHES" | "STARTS_WITH" | "ENDS_WITH"
//!          | "==" | "!=" | ">" | "<" | ">=" | "<="
//! value    = QUOTED_STRING | NUMBER | "true" | "false" | IDENT
//! CATEGORY = "@" IDENT
//! ```

use parley_core::ids::{IntentId, StateId};
use parley_core::value::{DataMap, FieldValue};
use regex_lite::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// A parsed condition tree.
#[derive(Debug, Clone)]
pub enum Condition {
    /// A single comparison.
    Atom(Atom),
    /// Logical AND of two sub-conditions.
    And(Box<Condition>, Box<Condition>),
    /// Logical OR of two sub-conditions.
    Or(Box<Condition>, Box<Condition>),
    /// Negation.
    Not(Box<Condition>),
    /// Always true (empty condition).
    Always,
}

#[derive(Debug, Clone)]
pub struct Atom {
    pub field: Field,
    pub op: Op,
    /// `field NOT OP value`: the atom's result is inverted.
    pub negated: bool,
    pub value: Literal,
}

/// A field reference in a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    /// `data.<name>`: a collected (or just extracted) data field.
    Data(String),
    /// `intent`: this turn's intent label.
    Intent,
    /// `state`: the state the turn is processed in.
    State,
    /// `turn`: the 1-based number of the current turn.
    Turn,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Contains,
    Matches,
    StartsWith,
    EndsWith,
    Eq,
    Gt,
    Lt,
    Gte,
    Lte,
    Exists,
    In,
}

/// A literal on the right-hand side of an atom.
#[derive(Debug, Clone)]
pub enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
    /// `@name`: a composed intent category.
    Category(String),
    /// Regex compiled at parse time for `MATCHES`.
    Pattern(Regex),
    /// No right-hand side (`EXISTS`).
    None,
}

/// What a condition is evaluated against.
pub struct EvalContext<'a> {
    /// Prospective data: collected data merged with this turn's extraction.
    pub data: &'a DataMap,
    pub intent: &'a IntentId,
    pub state: &'a StateId,
    pub turn: u32,
    /// Expanded composed categories.
    pub categories: &'a BTreeMap<String, BTreeSet<IntentId>>,
}

/// Names a condition depends on, for load-time validation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct References {
    pub fields: BTreeSet<String>,
    pub categories: BTreeSet<String>,
}

/// A field's value resolved for comparison.
enum Resolved<'a> {
    Value(&'a FieldValue),
    Text(&'a str),
    Num(f64),
}

impl Condition {
    /// Evaluate this condition against a context.
    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        match self {
            Condition::Always => true,
            Condition::Atom(atom) => atom.evaluate(ctx),
            Condition::And(a, b) => a.evaluate(ctx) && b.evaluate(ctx),
            Condition::Or(a, b) => a.evaluate(ctx) || b.evaluate(ctx),
            Condition::Not(inner) => !inner.evaluate(ctx),
        }
    }

    /// Collect every data field and category this condition mentions.
    pub fn references(&self) -> References {
        let mut refs = References::default();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references(&self, refs: &mut References) {
        match self {
            Condition::Always => {}
            Condition::Atom(atom) => {
                if let Field::Data(name) = &atom.field {
                    refs.fields.insert(name.clone());
                }
                if let Literal::Category(name) = &atom.value {
                    refs.categories.insert(name.clone());
                }
            }
            Condition::And(a, b) | Condition::Or(a, b) => {
                a.collect_references(refs);
                b.collect_references(refs);
            }
            Condition::Not(inner) => inner.collect_references(refs),
        }
    }
}

impl Atom {
    fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        let positive = self.evaluate_positive(ctx);
        if self.negated { !positive } else { positive }
    }

    fn evaluate_positive(&self, ctx: &EvalContext<'_>) -> bool {
        let Some(resolved) = self.resolve_field(ctx) else {
            return false;
        };
        match self.op {
            Op::Exists => match resolved {
                Resolved::Value(v) => !v.is_blank(),
                Resolved::Text(s) => !s.is_empty(),
                Resolved::Num(_) => true,
            },
            Op::Contains => match (&resolved, &self.value) {
                (Resolved::Value(FieldValue::List(items)), lit) => {
                    items.iter().any(|item| literal_equals(item, lit))
                }
                _ => text_of(&resolved).is_some_and(|s| s.contains(self.value_str())),
            },
            Op::StartsWith => text_of(&resolved).is_some_and(|s| s.starts_with(self.value_str())),
            Op::EndsWith => text_of(&resolved).is_some_and(|s| s.ends_with(self.value_str())),
            Op::Matches => match &self.value {
                Literal::Pattern(re) => text_of(&resolved).is_some_and(|s| re.is_match(s)),
                _ => false,
            },
            Op::Eq => match (&resolved, &self.value) {
                (Resolved::Value(v), lit) => literal_equals(v, lit),
                (Resolved::Text(s), Literal::Str(lit)) => s == lit,
                (Resolved::Num(n), Literal::Num(lit)) => (n - lit).abs() < f64::EPSILON,
                _ => false,
            },
            Op::Gt => self.compare_num(&resolved, |a, b| a > b),
            Op::Lt => self.compare_num(&resolved, |a, b| a < b),
            Op::Gte => self.compare_num(&resolved, |a, b| a >= b),
            Op::Lte => self.compare_num(&resolved, |a, b| a <= b),
            Op::In => {
                let Literal::Category(name) = &self.value else {
                    return false;
                };
                let Some(members) = ctx.categories.get(name) else {
                    return false;
                };
                text_of(&resolved).is_some_and(|s| members.contains(s))
            }
        }
    }

    fn resolve_field<'a>(&self, ctx: &EvalContext<'a>) -> Option<Resolved<'a>> {
        match &self.field {
            Field::Data(name) => ctx.data.get(name).map(Resolved::Value),
            Field::Intent => Some(Resolved::Text(ctx.intent.as_str())),
            Field::State => Some(Resolved::Text(ctx.state.as_str())),
            Field::Turn => Some(Resolved::Num(f64::from(ctx.turn))),
        }
    }

    fn compare_num(&self, resolved: &Resolved<'_>, cmp: impl Fn(f64, f64) -> bool) -> bool {
        let lhs = match resolved {
            Resolved::Value(v) => v.as_f64(),
            Resolved::Num(n) => Some(*n),
            Resolved::Text(_) => None,
        };
        match (lhs, &self.value) {
            (Some(a), Literal::Num(b)) => cmp(a, *b),
            _ => false,
        }
    }

    fn value_str(&self) -> &str {
        match &self.value {
            Literal::Str(s) => s,
            _ => "",
        }
    }
}

fn text_of<'a>(resolved: &Resolved<'a>) -> Option<&'a str> {
    match resolved {
        Resolved::Value(FieldValue::Text(s)) => Some(s.as_str()),
        Resolved::Text(s) => Some(s),
        _ => None,
    }
}

fn literal_equals(value: &FieldValue, lit: &Literal) -> bool {
    match (value, lit) {
        (FieldValue::Text(s), Literal::Str(l)) => s == l,
        (FieldValue::Bool(b), Literal::Bool(l)) => b == l,
        (v, Literal::Num(l)) => v.as_f64().is_some_and(|x| (x - l).abs() < f64::EPSILON),
        _ => false,
    }
}

// ─── Parser ──────────────────────────────────────────────────────────

/// Parse a condition expression string into a [`Condition`] tree.
///
/// Returns `Ok(Condition::Always)` for empty input.
pub fn parse_condition(input: &str) -> Result<Condition, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Condition::Always);
    }
    let tokens = tokenize(input)?;
    let (cond, rest) = parse_or(&tokens)?;
    if !rest.is_empty() {
        return Err(format!("unexpected tokens after expression: {rest:?}"));
    }
    Ok(cond)
}

/// Token types for the condition DSL.
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Category(String),
    Str(String),
    Num(f64),
    Bool(bool),
    And,
    Or,
    Not,
    // Operators
    Contains,
    Matches,
    StartsWith,
    EndsWith,
    Exists,
    In,
    Eq,
    NotEq,
    Gt,
    Lt,
    Gte,
    Lte,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => {
                            if let Some(escaped) = chars.next() {
                                s.push(escaped);
                            }
                        }
                        Some(ch) if ch == quote => break,
                        Some(ch) => s.push(ch),
                        None => return Err("unterminated string literal".into()),
                    }
                }
                tokens.push(Token::Str(s));
            }
            '@' => {
                chars.next();
                let name = take_word(&mut chars);
                if name.is_empty() {
                    return Err("expected category name after '@'".into());
                }
                tokens.push(Token::Category(name));
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Gte);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Lte);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                }
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::NotEq);
                } else {
                    tokens.push(Token::Not);
                }
            }
            _ if c.is_ascii_digit() || c == '-' => {
                let mut num_str = String::new();
                num_str.push(c);
                chars.next();
                while let Some(&nc) = chars.peek() {
                    if nc.is_ascii_digit() || nc == '.' {
                        num_str.push(nc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match num_str.parse::<f64>() {
                    Ok(n) => tokens.push(Token::Num(n)),
                    Err(_) => return Err(format!("invalid number: {num_str}")),
                }
            }
            _ if c.is_alphanumeric() || c == '_' || c == '.' => {
                let word = take_word(&mut chars);
                let token = match word.as_str() {
                    "AND" | "and" => Token::And,
                    "OR" | "or" => Token::Or,
                    "NOT" | "not" => Token::Not,
                    "CONTAINS" | "contains" => Token::Contains,
                    "MATCHES" | "matches" => Token::Matches,
                    "STARTS_WITH" | "starts_with" => Token::StartsWith,
                    "ENDS_WITH" | "ends_with" => Token::EndsWith,
                    "EXISTS" | "exists" => Token::Exists,
                    "IN" | "in" => Token::In,
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    _ => Token::Ident(word),
                };
                tokens.push(token);
            }
            _ => return Err(format!("unexpected character: {c}")),
        }
    }

    Ok(tokens)
}

fn take_word(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut word = String::new();
    while let Some(&wc) = chars.peek() {
        if wc.is_alphanumeric() || wc == '_' || wc == '.' {
            word.push(wc);
            chars.next();
        } else {
            break;
        }
    }
    word
}

fn parse_or(tokens: &[Token]) -> Result<(Condition, &[Token]), String> {
    let (mut left, mut rest) = parse_and(tokens)?;
    while rest.first() == Some(&Token::Or) {
        let (right, remaining) = parse_and(&rest[1..])?;
        left = Condition::Or(Box::new(left), Box::new(right));
        rest = remaining;
    }
    Ok((left, rest))
}

fn parse_and(tokens: &[Token]) -> Result<(Condition, &[Token]), String> {
    let (mut left, mut rest) = parse_unary(tokens)?;
    while rest.first() == Some(&Token::And) {
        let (right, remaining) = parse_unary(&rest[1..])?;
        left = Condition::And(Box::new(left), Box::new(right));
        rest = remaining;
    }
    Ok((left, rest))
}

fn parse_unary(tokens: &[Token]) -> Result<(Condition, &[Token]), String> {
    // A leading NOT is always logical negation; `field NOT OP` is handled in
    // parse_atom.
    if tokens.first() == Some(&Token::Not) {
        let (inner, rest) = parse_unary(&tokens[1..])?;
        return Ok((Condition::Not(Box::new(inner)), rest));
    }
    parse_primary(tokens)
}

fn parse_primary(tokens: &[Token]) -> Result<(Condition, &[Token]), String> {
    if tokens.first() == Some(&Token::LParen) {
        let (inner, rest) = parse_or(&tokens[1..])?;
        if rest.first() != Some(&Token::RParen) {
            return Err("expected closing parenthesis".into());
        }
        return Ok((inner, &rest[1..]));
    }
    parse_atom(tokens)
}

fn parse_atom(tokens: &[Token]) -> Result<(Condition, &[Token]), String> {
    let (field, rest) = parse_field(tokens)?;

    let (negated, rest) = match rest.first() {
        Some(Token::Not) => (true, &rest[1..]),
        _ => (false, rest),
    };

    let (op, negated, rest) = match rest.first() {
        Some(Token::Contains) => (Op::Contains, negated, &rest[1..]),
        Some(Token::Matches) => (Op::Matches, negated, &rest[1..]),
        Some(Token::StartsWith) => (Op::StartsWith, negated, &rest[1..]),
        Some(Token::EndsWith) => (Op::EndsWith, negated, &rest[1..]),
        Some(Token::Exists) => (Op::Exists, negated, &rest[1..]),
        Some(Token::In) => (Op::In, negated, &rest[1..]),
        Some(Token::Eq) if !negated => (Op::Eq, false, &rest[1..]),
        Some(Token::NotEq) if !negated => (Op::Eq, true, &rest[1..]),
        Some(Token::Gt) if !negated => (Op::Gt, false, &rest[1..]),
        Some(Token::Lt) if !negated => (Op::Lt, false, &rest[1..]),
        Some(Token::Gte) if !negated => (Op::Gte, false, &rest[1..]),
        Some(Token::Lte) if !negated => (Op::Lte, false, &rest[1..]),
        Some(other) if negated => return Err(format!("cannot negate operator: {other:?}")),
        other => return Err(format!("expected operator, got {other:?}")),
    };

    let (value, rest) = match op {
        Op::Exists => (Literal::None, rest),
        Op::In => match rest.first() {
            Some(Token::Category(name)) => (Literal::Category(name.clone()), &rest[1..]),
            other => return Err(format!("IN expects @category, got {other:?}")),
        },
        Op::Matches => match rest.first() {
            Some(Token::Str(pattern)) => {
                let re = Regex::new(pattern)
                    .map_err(|e| format!("invalid pattern {pattern:?}: {e}"))?;
                (Literal::Pattern(re), &rest[1..])
            }
            other => return Err(format!("MATCHES expects a quoted pattern, got {other:?}")),
        },
        Op::Gt | Op::Lt | Op::Gte | Op::Lte => match rest.first() {
            Some(Token::Num(n)) => (Literal::Num(*n), &rest[1..]),
            other => return Err(format!("numeric comparison expects a number, got {other:?}")),
        },
        _ => parse_value(rest)?,
    };

    Ok((
        Condition::Atom(Atom {
            field,
            op,
            negated,
            value,
        }),
        rest,
    ))
}

fn parse_field(tokens: &[Token]) -> Result<(Field, &[Token]), String> {
    match tokens.first() {
        Some(Token::Ident(name)) => {
            let field = if let Some(data_name) = name.strip_prefix("data.") {
                if data_name.is_empty() {
                    return Err("empty data field name".into());
                }
                Field::Data(data_name.to_string())
            } else {
                match name.as_str() {
                    "intent" => Field::Intent,
                    "state" => Field::State,
                    "turn" => Field::Turn,
                    other => return Err(format!("unknown field: {other}")),
                }
            };
            Ok((field, &tokens[1..]))
        }
        _ => Err(format!("expected field name, got {:?}", tokens.first())),
    }
}

fn parse_value(tokens: &[Token]) -> Result<(Literal, &[Token]), String> {
    match tokens.first() {
        Some(Token::Str(s)) => Ok((Literal::Str(s.clone()), &tokens[1..])),
        Some(Token::Num(n)) => Ok((Literal::Num(*n), &tokens[1..])),
        Some(Token::Bool(b)) => Ok((Literal::Bool(*b), &tokens[1..])),
        // Bare identifier as a string value.
        Some(Token::Ident(s)) => Ok((Literal::Str(s.clone()), &tokens[1..])),
        _ => Err(format!("expected value, got {:?}", tokens.first())),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
