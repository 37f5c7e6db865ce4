use crate::{
    error::InternalError,
    expr::{ArithOp, CompareOp, Expr, Literal},
    obs::sink::{self, MetricsEvent},
};
use tracing::instrument;

const KEYWORDS: &[&str] = &[
    "AND", "OR", "NOT", "LIKE", "ESCAPE", "IS", "NULL", "TRUE", "FALSE", "CASE", "WHEN", "THEN",
    "ELSE", "END",
];

pub(crate) const fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '*' | '-')
}

pub(crate) fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|kw| kw.eq_ignore_ascii_case(word))
}

/// Length of the JSON number at the start of `input`, if any.
pub(crate) fn scan_number(input: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let digits = |mut i: usize| {
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        (i > start).then_some(i)
    };

    let mut i = usize::from(bytes.first() == Some(&b'-'));
    match bytes.get(i) {
        Some(b'0') => i += 1,
        Some(b'1'..=b'9') => i = digits(i)?,
        _ => return None,
    }
    if bytes.get(i) == Some(&b'.')
        && let Some(end) = digits(i + 1)
    {
        i = end;
    }
    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        if let Some(end) = digits(j) {
            i = end;
        }
    }

    Some(i)
}

/// Parse filter-language text into an expression tree.
#[instrument(name = "expr::parse", level = "debug", skip_all)]
pub fn parse(input: &str) -> Result<Expr, InternalError> {
    let result = Parser::new(input).parse_all();
    sink::record(MetricsEvent::Parse {
        ok: result.is_ok(),
    });

    result
}

///
/// NamePart
/// One lexical segment of a parameter path.
///

enum NamePart {
    Raw(String),
    Interpolated(Expr),
}

///
/// Parser
/// Hand-written recursive descent over the input text, one method per
/// precedence level.
///

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    const fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.remaining().chars().nth(1)
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek_char(), Some(c) if c.is_whitespace()) {
            self.consume_char();
        }
    }

    fn error(&self, message: impl std::fmt::Display) -> InternalError {
        InternalError::syntax(self.pos, message)
    }

    fn unexpected(&self) -> InternalError {
        match self.peek_char() {
            Some(c) => self.error(format!("unexpected character '{c}'")),
            None => self.error("unexpected end of input"),
        }
    }

    // Word made only of identifier characters, not consumed.
    fn peek_word(&self) -> &'a str {
        let rest = self.remaining();
        let end = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());

        &rest[..end]
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        let save = self.pos;
        self.skip_ws();
        let word = self.peek_word();
        let followed_by_brace = self.remaining()[word.len()..].starts_with('{');
        if word.eq_ignore_ascii_case(kw) && !followed_by_brace {
            self.pos += word.len();
            true
        } else {
            self.pos = save;
            false
        }
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        self.skip_ws();
        if self.remaining().starts_with(symbol) {
            self.pos += symbol.len();
            true
        } else {
            false
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), InternalError> {
        self.skip_ws();
        if self.peek_char() == Some(expected) {
            self.consume_char();
            Ok(())
        } else {
            Err(self.error(format!("expected '{expected}'")))
        }
    }

    fn parse_all(&mut self) -> Result<Expr, InternalError> {
        let expr = self.parse_or()?;
        self.skip_ws();
        if self.pos < self.input.len() {
            return Err(self.unexpected());
        }

        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, InternalError> {
        let mut operands = vec![self.parse_and()?];
        while self.eat_keyword("OR") {
            operands.push(self.parse_and()?);
        }

        Ok(if operands.len() == 1 {
            operands.swap_remove(0)
        } else {
            Expr::Or(operands)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, InternalError> {
        let mut operands = vec![self.parse_not()?];
        while self.eat_keyword("AND") {
            operands.push(self.parse_not()?);
        }

        Ok(if operands.len() == 1 {
            operands.swap_remove(0)
        } else {
            Expr::And(operands)
        })
    }

    fn parse_not(&mut self) -> Result<Expr, InternalError> {
        if self.eat_keyword("NOT") {
            return Ok(Expr::not(self.parse_not()?));
        }

        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, InternalError> {
        let mut lhs = self.parse_concat()?;
        loop {
            if let Some(op) = self.eat_compare_op() {
                let rhs = self.parse_concat()?;
                lhs = Expr::compare(op, lhs, rhs);
                continue;
            }

            if self.eat_keyword("IS") {
                let negated = self.eat_keyword("NOT");
                if !self.eat_keyword("NULL") {
                    return Err(self.error("expected NULL after IS"));
                }
                lhs = Expr::IsNull {
                    operand: Box::new(lhs),
                    negated,
                };
                continue;
            }

            let save = self.pos;
            let negated = self.eat_keyword("NOT");
            if self.eat_keyword("LIKE") {
                let pattern = self.parse_concat()?;
                let escape = if self.eat_keyword("ESCAPE") {
                    Some(self.parse_concat()?)
                } else {
                    None
                };
                lhs = Expr::like(lhs, pattern, escape, negated);
                continue;
            }
            self.pos = save;

            return Ok(lhs);
        }
    }

    fn eat_compare_op(&mut self) -> Option<CompareOp> {
        // Longest symbols first.
        for symbol in ["<>", ">=", "<=", "=", ">", "<"] {
            if self.eat_symbol(symbol) {
                return CompareOp::from_symbol(symbol);
            }
        }

        None
    }

    fn parse_concat(&mut self) -> Result<Expr, InternalError> {
        let mut lhs = self.parse_additive()?;
        while self.eat_symbol("||") {
            let rhs = self.parse_additive()?;
            lhs = Expr::concat(lhs, rhs);
        }

        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, InternalError> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_symbol("+") {
                ArithOp::Add
            } else if self.eat_symbol("-") {
                ArithOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::arith(op, lhs, rhs);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, InternalError> {
        let mut lhs = self.parse_primary()?;
        loop {
            let op = if self.eat_symbol("*") {
                ArithOp::Mul
            } else if self.eat_symbol("/") {
                ArithOp::Div
            } else {
                return Ok(lhs);
            };
            let rhs = self.parse_primary()?;
            lhs = Expr::arith(op, lhs, rhs);
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, InternalError> {
        self.skip_ws();
        match self.peek_char() {
            Some('(') => {
                self.consume_char();
                let inner = self.parse_or()?;
                self.expect_char(')')?;
                Ok(inner)
            }
            Some('\'') => self.parse_single_quoted().map(Expr::text),
            Some('"') => self.parse_double_quoted().map(Expr::text),
            Some(c) if self.at_number_start(c) => match self.try_parse_number() {
                Some(n) => Ok(Expr::number(n)),
                None => self.parse_word(),
            },
            Some(c) if is_ident_char(c) || c == '{' => self.parse_word(),
            _ => Err(self.unexpected()),
        }
    }

    fn at_number_start(&self, c: char) -> bool {
        c.is_ascii_digit() || (c == '-' && self.peek_second().is_some_and(|d| d.is_ascii_digit()))
    }

    // A number only when no identifier character follows it.
    fn try_parse_number(&mut self) -> Option<f64> {
        let rest = self.remaining();
        let len = scan_number(rest)?;
        if rest[len..].starts_with(|c: char| is_ident_char(c) || c == '{') {
            return None;
        }
        let value = rest[..len].parse::<f64>().ok().filter(|v| v.is_finite())?;
        self.pos += len;

        Some(value)
    }

    fn parse_single_quoted(&mut self) -> Result<String, InternalError> {
        let start = self.pos;
        self.consume_char();
        let mut out = String::new();
        loop {
            match self.consume_char() {
                Some('\'') if self.peek_char() == Some('\'') => {
                    self.consume_char();
                    out.push('\'');
                }
                Some('\'') => return Ok(out),
                Some(c) => out.push(c),
                None => return Err(InternalError::syntax(start, "unterminated string literal")),
            }
        }
    }

    fn parse_double_quoted(&mut self) -> Result<String, InternalError> {
        let start = self.pos;
        self.consume_char();
        let mut escaped = false;
        while let Some(c) = self.consume_char() {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                '"' => {
                    let raw = &self.input[start..self.pos];
                    return serde_json::from_str::<String>(raw).map_err(|err| {
                        InternalError::syntax(start, format!("invalid string literal: {err}"))
                    });
                }
                _ => {}
            }
        }

        Err(InternalError::syntax(start, "unterminated string literal"))
    }

    fn parse_word(&mut self) -> Result<Expr, InternalError> {
        let start = self.pos;
        let parts = self.parse_name_parts()?;

        let raw = match parts.as_slice() {
            [NamePart::Raw(raw)] => raw.clone(),
            _ => return Ok(Expr::Param(Box::new(fold_name_parts(parts)))),
        };

        if raw.eq_ignore_ascii_case("true") {
            return Ok(Expr::bool(true));
        }
        if raw.eq_ignore_ascii_case("false") {
            return Ok(Expr::bool(false));
        }
        if raw.eq_ignore_ascii_case("null") {
            return Ok(Expr::null());
        }
        if raw.eq_ignore_ascii_case("case") {
            return self.parse_case();
        }
        if is_keyword(&raw) {
            return Err(InternalError::syntax(
                start,
                format!("unexpected keyword '{raw}'"),
            ));
        }

        let save = self.pos;
        self.skip_ws();
        if self.peek_char() == Some('(') && is_function_name(&raw) {
            self.consume_char();
            let args = self.parse_args()?;
            return Ok(Expr::func(raw, args));
        }
        self.pos = save;

        Ok(Expr::param(raw))
    }

    fn parse_name_parts(&mut self) -> Result<Vec<NamePart>, InternalError> {
        let mut parts = Vec::new();
        loop {
            match self.peek_char() {
                Some('{') => {
                    self.consume_char();
                    let inner = self.parse_or()?;
                    self.expect_char('}')?;
                    parts.push(NamePart::Interpolated(inner));
                }
                Some(c) if is_ident_char(c) => {
                    let word = self.peek_word();
                    self.pos += word.len();
                    parts.push(NamePart::Raw(word.to_string()));
                }
                _ => break,
            }
        }

        if parts.is_empty() {
            return Err(self.unexpected());
        }

        Ok(parts)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, InternalError> {
        let mut args = Vec::new();
        self.skip_ws();
        if self.peek_char() == Some(')') {
            self.consume_char();
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            self.skip_ws();
            match self.consume_char() {
                Some(',') => {}
                Some(')') => return Ok(args),
                _ => return Err(self.error("expected ',' or ')' in argument list")),
            }
        }
    }

    fn parse_case(&mut self) -> Result<Expr, InternalError> {
        let mut arms = Vec::new();
        while self.eat_keyword("WHEN") {
            let guard = self.parse_or()?;
            if !self.eat_keyword("THEN") {
                return Err(self.error("expected THEN"));
            }
            let value = self.parse_or()?;
            arms.push((guard, value));
        }
        if self.eat_keyword("ELSE") {
            let value = self.parse_or()?;
            arms.push((Expr::bool(true), value));
        }
        if arms.is_empty() {
            return Err(self.error("expected WHEN or ELSE after CASE"));
        }
        if !self.eat_keyword("END") {
            return Err(self.error("expected END"));
        }

        Ok(Expr::Case(arms))
    }
}

fn is_function_name(word: &str) -> bool {
    word.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        && word.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn fold_name_parts(parts: Vec<NamePart>) -> Expr {
    let mut iter = parts.into_iter().map(|part| match part {
        NamePart::Raw(raw) => Expr::Literal(Literal::Text(raw)),
        NamePart::Interpolated(expr) => expr,
    });
    let first = iter.next().unwrap_or_else(|| Expr::text(""));

    iter.fold(first, Expr::concat)
}
