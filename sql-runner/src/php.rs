//! Reader for the array literal returned by a PHP configuration script.
//!
//! LimeSurvey keeps its settings in `application/config/config.php`, a script
//! that ends with `return array(...);`. Only the literal subset such files use
//! is understood: scalars, nested `array(...)`/`[...]`, string concatenation
//! and bare constants. Anything that would need a PHP interpreter (function
//! calls, variables) is rejected.

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Parse failure with the 1-based line it occurred on.
#[derive(Debug, Error, PartialEq)]
#[error("line {line}: {message}")]
pub struct PhpParseError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Str(String),
    Int(i64),
    Float(f64),
    Ident(String),
    Variable(String),
    Arrow,
    DoubleColon,
    Punct(char),
}

struct Lexer<'a> {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    src: &'a str,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
            line: 1,
            src,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.get(self.pos).copied()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn starts_with(&self, pat: &str) -> bool {
        pat.chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i).map(|p| p.eq_ignore_ascii_case(&c)) == Some(true))
    }

    fn error(&self, message: impl Into<String>) -> PhpParseError {
        PhpParseError {
            line: self.line,
            message: message.into(),
        }
    }

    /// Skip inline text up to and including the next open tag.
    fn skip_inline_text(&mut self) {
        while self.peek().is_some() {
            if self.starts_with("<?php") {
                for _ in 0.."<?php".len() {
                    self.bump();
                }
                return;
            }
            if self.starts_with("<?") {
                self.bump();
                self.bump();
                return;
            }
            self.bump();
        }
    }

    fn tokenize(mut self) -> Result<Vec<(Token, usize)>, PhpParseError> {
        tracing::trace!("Tokenizing {} bytes of PHP", self.src.len());
        let mut tokens = Vec::new();
        self.skip_inline_text();

        while let Some(c) = self.peek() {
            let line = self.line;
            match c {
                c if c.is_whitespace() => {
                    self.bump();
                }
                '?' if self.peek_at(1) == Some('>') => {
                    // A close tag ends the statement it is on.
                    tokens.push((Token::Punct(';'), line));
                    self.skip_inline_text();
                }
                '#' if self.peek_at(1) != Some('[') => self.skip_line_comment(),
                '/' if self.peek_at(1) == Some('/') => self.skip_line_comment(),
                '/' if self.peek_at(1) == Some('*') => self.skip_block_comment()?,
                '\'' => {
                    let s = self.single_quoted()?;
                    tokens.push((Token::Str(s), line));
                }
                '"' => {
                    let s = self.double_quoted()?;
                    tokens.push((Token::Str(s), line));
                }
                c if c.is_ascii_digit() => {
                    let token = self.number()?;
                    tokens.push((token, line));
                }
                '.' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => {
                    let token = self.number()?;
                    tokens.push((token, line));
                }
                '$' => {
                    self.bump();
                    let name = self.identifier();
                    tokens.push((Token::Variable(name), line));
                }
                c if c.is_alphabetic() || c == '_' || c == '\\' => {
                    let name = self.identifier();
                    tokens.push((Token::Ident(name), line));
                }
                '=' if self.peek_at(1) == Some('>') => {
                    self.bump();
                    self.bump();
                    tokens.push((Token::Arrow, line));
                }
                ':' if self.peek_at(1) == Some(':') => {
                    self.bump();
                    self.bump();
                    tokens.push((Token::DoubleColon, line));
                }
                other => {
                    self.bump();
                    tokens.push((Token::Punct(other), line));
                }
            }
        }

        Ok(tokens)
    }

    fn skip_line_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == '\n' || (c == '?' && self.peek_at(1) == Some('>')) {
                return;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), PhpParseError> {
        self.bump();
        self.bump();
        while self.peek().is_some() {
            if self.peek() == Some('*') && self.peek_at(1) == Some('/') {
                self.bump();
                self.bump();
                return Ok(());
            }
            self.bump();
        }
        Err(self.error("unterminated comment"))
    }

    fn single_quoted(&mut self) -> Result<String, PhpParseError> {
        let start = self.line;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\'') => return Ok(out),
                Some('\\') => match self.peek() {
                    Some(c @ ('\'' | '\\')) => {
                        self.bump();
                        out.push(c);
                    }
                    _ => out.push('\\'),
                },
                Some(c) => out.push(c),
                None => {
                    return Err(PhpParseError {
                        line: start,
                        message: "unterminated string".to_string(),
                    })
                }
            }
        }
    }

    fn double_quoted(&mut self) -> Result<String, PhpParseError> {
        let start = self.line;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => {
                    let escaped = match self.peek() {
                        Some('n') => Some('\n'),
                        Some('t') => Some('\t'),
                        Some('r') => Some('\r'),
                        Some('v') => Some('\u{0b}'),
                        Some('e') => Some('\u{1b}'),
                        Some('f') => Some('\u{0c}'),
                        Some('0') => Some('\0'),
                        Some(c @ ('\\' | '"' | '$')) => Some(c),
                        _ => None,
                    };
                    match escaped {
                        Some(c) => {
                            self.bump();
                            out.push(c);
                        }
                        None => out.push('\\'),
                    }
                }
                Some(c) => out.push(c),
                None => {
                    return Err(PhpParseError {
                        line: start,
                        message: "unterminated string".to_string(),
                    })
                }
            }
        }
    }

    fn number(&mut self) -> Result<Token, PhpParseError> {
        if self.peek() == Some('0') {
            let radix = match self.peek_at(1) {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.bump();
                self.bump();
                let mut digits = String::new();
                while let Some(c) = self.peek().filter(|c| c.is_digit(radix) || *c == '_') {
                    self.bump();
                    if c != '_' {
                        digits.push(c);
                    }
                }
                return self.radix_literal(&digits, radix);
            }
        }

        let mut text = String::new();
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => text.push(c),
                '_' => {}
                '.' if !is_float => {
                    is_float = true;
                    text.push(c);
                    if !self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) {
                        text.push('0');
                    }
                }
                'e' | 'E'
                    if self
                        .peek_at(1)
                        .is_some_and(|n| n.is_ascii_digit() || n == '-' || n == '+') =>
                {
                    is_float = true;
                    text.push(c);
                    self.bump();
                    if let Some(sign @ ('-' | '+')) = self.peek() {
                        text.push(sign);
                        self.bump();
                    }
                    continue;
                }
                _ => break,
            }
            self.bump();
        }

        if is_float {
            return text
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|_| self.error(format!("invalid number {}", text)));
        }

        // A leading zero marks a legacy octal literal
        match text.strip_prefix('0').filter(|rest| !rest.is_empty()) {
            Some(octal) => self.radix_literal(octal, 8),
            None => self.radix_literal(&text, 10),
        }
    }

    /// Integer literal in `radix`; values beyond `i64` become floats, as in PHP.
    fn radix_literal(&self, digits: &str, radix: u32) -> Result<Token, PhpParseError> {
        let invalid = || self.error(format!("invalid numeric literal {}", digits));
        if digits.is_empty()
            || !digits.chars().all(|c| c.is_digit(radix))
            || self.peek().is_some_and(|c| c.is_alphanumeric())
        {
            return Err(invalid());
        }

        match i64::from_str_radix(digits, radix) {
            Ok(n) => Ok(Token::Int(n)),
            Err(_) => u128::from_str_radix(digits, radix)
                .map(|n| Token::Float(n as f64))
                .or_else(|_| {
                    if radix == 10 {
                        digits.parse::<f64>().map(Token::Float).map_err(|_| invalid())
                    } else {
                        Err(invalid())
                    }
                }),
        }
    }

    fn identifier(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '\\' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        name
    }
}

/// PHP array key: integer-like strings are normalized to integers.
#[derive(Debug, Clone, PartialEq)]
enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::String(s) => Some(match s.parse::<i64>() {
                Ok(n) if n.to_string() == *s => Key::Int(n),
                _ => Key::Str(s.clone()),
            }),
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).map(Key::Int),
            Value::Bool(b) => Some(Key::Int(i64::from(*b))),
            Value::Null => Some(Key::Str(String::new())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    fn into_string(self) -> String {
        match self {
            Key::Int(n) => n.to_string(),
            Key::Str(s) => s,
        }
    }
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, l)| *l)
            .unwrap_or(1)
    }

    fn error(&self, message: impl Into<String>) -> PhpParseError {
        PhpParseError {
            line: self.line(),
            message: message.into(),
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek() == Some(&Token::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), PhpParseError> {
        if self.eat_punct(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}', found {}", c, self.describe_next())))
        }
    }

    fn describe_next(&self) -> String {
        match self.peek() {
            None => "end of file".to_string(),
            Some(Token::Str(s)) => format!("string '{}'", s),
            Some(Token::Int(n)) => n.to_string(),
            Some(Token::Float(f)) => f.to_string(),
            Some(Token::Ident(s)) => format!("'{}'", s),
            Some(Token::Variable(s)) => format!("variable ${}", s),
            Some(Token::Arrow) => "'=>'".to_string(),
            Some(Token::DoubleColon) => "'::'".to_string(),
            Some(Token::Punct(c)) => format!("'{}'", c),
        }
    }

    /// Move past the first `return` keyword.
    fn seek_return(&mut self) -> Result<(), PhpParseError> {
        while let Some(token) = self.next() {
            if matches!(&token, Token::Ident(name) if name.eq_ignore_ascii_case("return")) {
                return Ok(());
            }
        }
        Err(PhpParseError {
            line: self.line(),
            message: "no return statement found".to_string(),
        })
    }

    fn expression(&mut self) -> Result<Value, PhpParseError> {
        let mut value = self.unary()?;
        while self.eat_punct('.') {
            let rhs = self.unary()?;
            let (Some(lhs), Some(rhs)) = (to_php_string(&value), to_php_string(&rhs)) else {
                return Err(self.error("cannot concatenate an array"));
            };
            value = Value::String(lhs + &rhs);
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<Value, PhpParseError> {
        if self.eat_punct('-') {
            return match self.unary()? {
                Value::Number(n) => Ok(negate(&n)),
                _ => Err(self.error("unary minus on a non-number")),
            };
        }
        if self.eat_punct('+') {
            return match self.unary()? {
                Value::Number(n) => Ok(Value::Number(n)),
                _ => Err(self.error("unary plus on a non-number")),
            };
        }
        if self.eat_punct('(') {
            let value = self.expression()?;
            self.expect_punct(')')?;
            return Ok(value);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Value, PhpParseError> {
        let line = self.line();
        match self.next() {
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Int(n)) => Ok(Value::Number(n.into())),
            Some(Token::Float(f)) => Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| self.error("non-finite number")),
            Some(Token::Punct('[')) => self.array_entries(']'),
            Some(Token::Ident(name)) => self.identifier_expression(name),
            Some(Token::Variable(name)) => Err(PhpParseError {
                line,
                message: format!("variable ${} cannot be evaluated", name),
            }),
            Some(_) => {
                self.pos -= 1;
                Err(self.error(format!("unexpected {}", self.describe_next())))
            }
            None => Err(self.error("unexpected end of file")),
        }
    }

    fn identifier_expression(&mut self, name: String) -> Result<Value, PhpParseError> {
        match name.to_ascii_lowercase().as_str() {
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            "null" => return Ok(Value::Null),
            "array" if self.eat_punct('(') => return self.array_entries(')'),
            _ => {}
        }

        if self.peek() == Some(&Token::Punct('(')) {
            return Err(self.error(format!("function call {}() cannot be evaluated", name)));
        }

        // Constants evaluate to their own name, class constants included.
        if self.peek() == Some(&Token::DoubleColon) {
            self.pos += 1;
            return match self.next() {
                Some(Token::Ident(member)) => Ok(Value::String(format!("{}::{}", name, member))),
                _ => Err(self.error("expected a class constant after '::'")),
            };
        }
        Ok(Value::String(name))
    }

    fn array_entries(&mut self, close: char) -> Result<Value, PhpParseError> {
        let mut entries: Vec<(Key, Value)> = Vec::new();
        let mut next_index: i64 = 0;

        loop {
            if self.eat_punct(close) {
                break;
            }

            let first = self.expression()?;
            let (key, value) = if self.peek() == Some(&Token::Arrow) {
                self.pos += 1;
                let key = Key::from_value(&first).ok_or_else(|| self.error("illegal array key"))?;
                (key, self.expression()?)
            } else {
                (Key::Int(next_index), first)
            };

            if let Key::Int(n) = key {
                next_index = next_index.max(n.saturating_add(1));
            }
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => entries.push((key, value)),
            }

            if !self.eat_punct(',') {
                self.expect_punct(close)?;
                break;
            }
        }

        Ok(into_json(entries))
    }
}

fn negate(n: &Number) -> Value {
    match n.as_i64().and_then(i64::checked_neg) {
        Some(v) => Value::Number(v.into()),
        None => n
            .as_f64()
            .and_then(|f| Number::from_f64(-f))
            .map(Value::Number)
            .unwrap_or(Value::Null),
    }
}

fn to_php_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("1".to_string()),
        Value::Bool(false) | Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// A list when the keys are exactly `0..n` in order, an object otherwise.
fn into_json(entries: Vec<(Key, Value)>) -> Value {
    let is_list = entries
        .iter()
        .enumerate()
        .all(|(i, (k, _))| *k == Key::Int(i as i64));

    if is_list {
        Value::Array(entries.into_iter().map(|(_, v)| v).collect())
    } else {
        let map: Map<String, Value> = entries
            .into_iter()
            .map(|(k, v)| (k.into_string(), v))
            .collect();
        Value::Object(map)
    }
}

/// Evaluate the value returned by a PHP configuration script.
pub fn parse_returned_value(source: &str) -> Result<Value, PhpParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.seek_return()?;
    let value = parser.expression()?;
    if !parser.eat_punct(';') && parser.peek().is_some() {
        return Err(parser.error(format!("expected ';', found {}", parser.describe_next())));
    }
    Ok(value)
}
