//! Reader for the isl-style text notation of sets and maps.
//!
//! Supported forms (conjunctions of affine constraints only):
//!
//! ```text
//! [N, M] -> { S[i, j] : 0 <= i < N and 0 <= j <= M - 1 and j = 0 }
//! [N] -> { S[i, j] -> [0, i, j + N] }
//! [N] -> { : N >= 1 }
//! ```

use crate::polyhedral::constraint::Constraint;
use crate::polyhedral::expr::{AffineExpr, MAX_MAGNITUDE};
use crate::polyhedral::map::AffineMap;
use crate::polyhedral::set::IntegerSet;
use crate::polyhedral::space::Space;
use crate::utils::errors::{CompileResult, ConfigError, ConfigErrorKind};
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Ident(String),
    Int(i64),
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Colon,
    Arrow,
    Plus,
    Minus,
    Star,
    Le,
    Lt,
    Ge,
    Gt,
    Eq,
    And,
}

fn parse_error(message: impl Into<String>) -> ConfigError {
    ConfigError::new(ConfigErrorKind::Parse, message)
}

/// Largest absolute value of a constant or coefficient in parsed text.
pub const MAX_LITERAL: i64 = MAX_MAGNITUDE >> 2;

fn within_range(value: Option<i64>) -> Result<i64, ConfigError> {
    match value {
        Some(v) if v.unsigned_abs() <= MAX_LITERAL as u64 => Ok(v),
        _ => Err(ConfigError::new(
            ConfigErrorKind::Overflow,
            format!("constants and coefficients must lie within +/-{}", MAX_LITERAL),
        )),
    }
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    offset: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self { chars: source.chars().peekable(), offset: 0 }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.offset += c.len_utf8();
        Some(c)
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn tokenize(mut self) -> Result<Vec<Tok>, ConfigError> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            let start = self.offset;
            if c.is_whitespace() {
                self.advance();
                continue;
            }
            if c.is_ascii_digit() {
                let mut value: i64 = 0;
                while let Some(&d) = self.chars.peek() {
                    let Some(digit) = d.to_digit(10) else { break };
                    value = value
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(digit as i64))
                        .ok_or_else(|| parse_error(format!("integer literal too large at offset {}", start)))?;
                    self.advance();
                }
                tokens.push(Tok::Int(value));
                continue;
            }
            if c.is_alphabetic() || c == '_' {
                let mut name = String::new();
                while let Some(&d) = self.chars.peek() {
                    if d.is_alphanumeric() || d == '_' || d == '\'' {
                        name.push(d);
                        self.advance();
                    } else {
                        break;
                    }
                }
                tokens.push(if name == "and" { Tok::And } else { Tok::Ident(name) });
                continue;
            }
            self.advance();
            let tok = match c {
                '[' => Tok::LBracket,
                ']' => Tok::RBracket,
                '{' => Tok::LBrace,
                '}' => Tok::RBrace,
                '(' => Tok::LParen,
                ')' => Tok::RParen,
                ',' => Tok::Comma,
                ':' => Tok::Colon,
                '+' => Tok::Plus,
                '*' => Tok::Star,
                '-' if self.match_char('>') => Tok::Arrow,
                '-' => Tok::Minus,
                '<' if self.match_char('=') => Tok::Le,
                '<' => Tok::Lt,
                '>' if self.match_char('=') => Tok::Ge,
                '>' => Tok::Gt,
                '=' => {
                    self.match_char('=');
                    Tok::Eq
                }
                '&' if self.match_char('&') => Tok::And,
                other => {
                    return Err(parse_error(format!("unexpected character `{}` at offset {}", other, start)));
                }
            };
            tokens.push(tok);
        }
        Ok(tokens)
    }
}

/// Linear form over named variables, before names are resolved.
#[derive(Debug, Clone, Default)]
struct Lin {
    constant: i64,
    terms: BTreeMap<String, i64>,
}

impl Lin {
    fn constant(value: i64) -> Self {
        Self { constant: value, terms: BTreeMap::new() }
    }

    fn var(name: String) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(name, 1);
        Self { constant: 0, terms }
    }

    fn add(mut self, other: Lin, sign: i64) -> Result<Self, ConfigError> {
        self.constant = within_range(self.constant.checked_add(sign * other.constant))?;
        for (name, c) in other.terms {
            let slot = self.terms.entry(name).or_insert(0);
            *slot = within_range(slot.checked_add(sign * c))?;
        }
        Ok(self)
    }

    fn scale(mut self, factor: i64) -> Result<Self, ConfigError> {
        self.constant = within_range(self.constant.checked_mul(factor))?;
        for c in self.terms.values_mut() {
            *c = within_range(c.checked_mul(factor))?;
        }
        Ok(self)
    }

    fn as_constant(&self) -> Option<i64> {
        if self.terms.values().all(|&c| c == 0) { Some(self.constant) } else { None }
    }

    fn resolve(&self, dims: &[String], params: &[String]) -> Result<AffineExpr, ConfigError> {
        let mut expr = AffineExpr::constant(self.constant, dims.len(), params.len());
        for (name, &c) in &self.terms {
            if let Some(d) = dims.iter().position(|n| n == name) {
                expr.coeffs[d] += c;
            } else if let Some(p) = params.iter().position(|n| n == name) {
                expr.param_coeffs[p] += c;
            } else {
                return Err(parse_error(format!("unknown identifier `{}`", name)));
            }
        }
        Ok(expr)
    }
}

/// One tuple: an optional name and its entries.
struct Tuple {
    name: Option<String>,
    entries: Vec<Lin>,
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn new(text: &str) -> Result<Self, ConfigError> {
        Ok(Self { tokens: Lexer::new(text).tokenize()?, pos: 0 })
    }

    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + ahead)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok) -> Result<(), ConfigError> {
        match self.next() {
            Some(t) if t == tok => Ok(()),
            other => Err(parse_error(format!("expected {:?}, found {:?}", tok, other))),
        }
    }

    fn ident(&mut self) -> Result<String, ConfigError> {
        match self.next() {
            Some(Tok::Ident(name)) => Ok(name),
            other => Err(parse_error(format!("expected identifier, found {:?}", other))),
        }
    }

    fn finish(&self) -> Result<(), ConfigError> {
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(parse_error(format!("trailing input starting at {:?}", t))),
        }
    }

    /// `[N, M] ->` prefix, if present.
    fn params(&mut self) -> Result<Vec<String>, ConfigError> {
        if self.peek() != Some(&Tok::LBracket) {
            return Ok(Vec::new());
        }
        self.expect(Tok::LBracket)?;
        let mut names = Vec::new();
        if !self.eat(&Tok::RBracket) {
            loop {
                names.push(self.ident()?);
                if self.eat(&Tok::RBracket) {
                    break;
                }
                self.expect(Tok::Comma)?;
            }
        }
        self.expect(Tok::Arrow)?;
        Ok(names)
    }

    /// `S[e, ...]`, `[e, ...]` or nothing.
    fn tuple(&mut self) -> Result<Option<Tuple>, ConfigError> {
        let name = match (self.peek(), self.peek_at(1)) {
            (Some(Tok::Ident(_)), Some(Tok::LBracket)) => Some(self.ident()?),
            (Some(Tok::LBracket), _) => None,
            _ => return Ok(None),
        };
        self.expect(Tok::LBracket)?;
        let mut entries = Vec::new();
        if !self.eat(&Tok::RBracket) {
            loop {
                entries.push(self.expr()?);
                if self.eat(&Tok::RBracket) {
                    break;
                }
                self.expect(Tok::Comma)?;
            }
        }
        Ok(Some(Tuple { name, entries }))
    }

    fn expr(&mut self) -> Result<Lin, ConfigError> {
        let mut lhs = self.term()?;
        loop {
            if self.eat(&Tok::Plus) {
                lhs = lhs.add(self.term()?, 1)?;
            } else if self.eat(&Tok::Minus) {
                lhs = lhs.add(self.term()?, -1)?;
            } else {
                return Ok(lhs);
            }
        }
    }

    fn term(&mut self) -> Result<Lin, ConfigError> {
        let mut lhs = self.factor()?;
        while self.eat(&Tok::Star) {
            let rhs = self.factor()?;
            lhs = match (lhs.as_constant(), rhs.as_constant()) {
                (Some(k), _) => rhs.scale(k)?,
                (_, Some(k)) => lhs.scale(k)?,
                _ => return Err(parse_error("product of two non-constant terms is not affine")),
            };
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Lin, ConfigError> {
        match self.next() {
            Some(Tok::Minus) => self.factor()?.scale(-1),
            Some(Tok::Int(v)) => {
                let v = within_range(Some(v))?;
                // `2i` is shorthand for `2 * i`.
                if let Some(Tok::Ident(_)) = self.peek() {
                    let name = self.ident()?;
                    return Lin::var(name).scale(v);
                }
                Ok(Lin::constant(v))
            }
            Some(Tok::Ident(name)) => Ok(Lin::var(name)),
            Some(Tok::LParen) => {
                let inner = self.expr()?;
                self.expect(Tok::RParen)?;
                Ok(inner)
            }
            other => Err(parse_error(format!("expected expression, found {:?}", other))),
        }
    }

    /// `e0 op e1 op e2 ... and ...`
    fn constraints(&mut self, dims: &[String], params: &[String]) -> Result<Vec<Constraint>, ConfigError> {
        let mut out = Vec::new();
        loop {
            let mut lhs = self.expr()?;
            let mut chained = false;
            while let Some(op) = self.peek().cloned() {
                if !matches!(op, Tok::Le | Tok::Lt | Tok::Ge | Tok::Gt | Tok::Eq) {
                    break;
                }
                self.pos += 1;
                let rhs = self.expr()?;
                let l = lhs.resolve(dims, params)?;
                let r = rhs.resolve(dims, params)?;
                let one = AffineExpr::constant(1, dims.len(), params.len());
                out.push(match op {
                    Tok::Le => Constraint::le(l, r),
                    Tok::Lt => Constraint::le(l + one, r),
                    Tok::Ge => Constraint::ge(l, r),
                    Tok::Gt => Constraint::ge(l, r + one),
                    _ => Constraint::eq(l, r),
                });
                lhs = rhs;
                chained = true;
            }
            if !chained {
                return Err(parse_error("expected a comparison"));
            }
            if !self.eat(&Tok::And) {
                return Ok(out);
            }
        }
    }
}

fn tuple_names(tuple: &Tuple) -> Result<Vec<String>, ConfigError> {
    tuple
        .entries
        .iter()
        .map(|lin| match (lin.constant, lin.terms.len(), lin.terms.iter().next()) {
            (0, 1, Some((name, 1))) => Ok(name.clone()),
            _ => Err(parse_error("set tuple entries must be plain dimension names")),
        })
        .collect()
}

/// A parsed set with its tuple name, if any.
#[derive(Debug, Clone)]
pub struct NamedSet {
    pub name: Option<String>,
    pub set: IntegerSet,
}

/// A parsed map with its input tuple name, if any.
#[derive(Debug, Clone)]
pub struct NamedMap {
    pub name: Option<String>,
    pub map: AffineMap,
}

/// Parse `[params] -> { name[dims] : constraints }`.
///
/// A set without a tuple (`{ : N > 0 }`) is a parameter-only context.
pub fn parse_set(text: &str) -> CompileResult<NamedSet> {
    let mut p = Parser::new(text)?;
    let params = p.params()?;
    p.expect(Tok::LBrace)?;
    let (name, dims) = match p.tuple()? {
        Some(tuple) => (tuple.name.clone(), tuple_names(&tuple)?),
        None => (None, Vec::new()),
    };
    let space = Space::set_with_params(dims.len(), params.len())
        .with_dim_names(dims.clone())
        .with_param_names(params.clone());
    let mut set = IntegerSet::from_space(space);
    if p.eat(&Tok::Colon) && p.peek() != Some(&Tok::RBrace) {
        for c in p.constraints(&dims, &params)? {
            set.add_constraint(c);
        }
    }
    p.expect(Tok::RBrace)?;
    p.finish()?;
    Ok(NamedSet { name, set })
}

/// Parse `[params] -> { name[dims] -> [exprs] }`.
pub fn parse_map(text: &str) -> CompileResult<NamedMap> {
    let mut p = Parser::new(text)?;
    let params = p.params()?;
    p.expect(Tok::LBrace)?;
    let input = p.tuple()?.ok_or_else(|| parse_error("expected input tuple"))?;
    let dims = tuple_names(&input)?;
    p.expect(Tok::Arrow)?;
    let output = p.tuple()?.ok_or_else(|| parse_error("expected output tuple"))?;
    let outputs = output
        .entries
        .iter()
        .map(|lin| lin.resolve(&dims, &params))
        .collect::<Result<Vec<_>, _>>()?;
    p.expect(Tok::RBrace)?;
    p.finish()?;
    let map = AffineMap::from_outputs(dims.len(), params.len(), outputs).with_names(dims, params);
    Ok(NamedMap { name: input.name, map })
}

/// Parse a parameter-only set such as `[N] -> { : N >= 1 }`.
pub fn parse_context(text: &str) -> CompileResult<IntegerSet> {
    let parsed = parse_set(text)?;
    if parsed.set.dim() != 0 {
        return Err(parse_error(format!("context must not have dimensions: {}", text)).into());
    }
    Ok(parsed.set)
}
