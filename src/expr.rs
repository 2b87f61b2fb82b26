//! Sandboxed expression evaluator for defaults and computed fields.
//!
//! Expressions are small and declarative:
//!
//! - **Literals**: `42`, `2.5`, `'text'`, `"text"`, `true`, `false`, `null`
//! - **Names**: `title`, `address.city` (looked up in the caller's context)
//! - **Calls**: only the builtins listed in [`BUILTINS`]
//! - **Operators**: `not`/`!`, unary `-`, `* /`, `+ -`, `== != < <= > >=`,
//!   `and`/`&&`, `or`/`||`, parentheses
//!
//! `+` concatenates when either side is a string. An expression can only see
//! the context it is given and the builtins; there is no other way out.
//!
//! ```
//! use rest_schema::expr::evaluate;
//! use serde_json::{json, Map};
//!
//! let mut context = Map::new();
//! context.insert("title".into(), json!("Hello World"));
//! assert_eq!(evaluate("slugify(title)", &context).unwrap(), json!("hello-world"));
//! ```

use deunicode::deunicode;
use serde_json::{Map, Number, Value};
use time::macros::format_description;
use time::OffsetDateTime;

use crate::error::EvalError;

/// Maximum expression size in bytes.
pub const MAX_EXPRESSION_BYTES: usize = 4096;
/// Maximum nesting of parentheses, calls and unary operators.
pub const MAX_NESTING: usize = 32;

/// Functions callable from expressions.
pub const BUILTINS: &[&str] = &["now", "today", "slugify", "lower", "upper", "len", "str"];

/// Evaluate with the system clock.
///
/// # Errors
///
/// Returns `EvalError` if the expression does not parse or fails to evaluate.
pub fn evaluate(expression: &str, context: &Map<String, Value>) -> Result<Value, EvalError> {
    Evaluator::new().evaluate(expression, context)
}

/// Evaluates expressions against an explicit context.
///
/// Holds no state between calls apart from the clock used by `now()`.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    clock: fn() -> OffsetDateTime,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            clock: OffsetDateTime::now_utc,
        }
    }

    /// Use a fixed clock for `now()` and `today()`.
    pub fn with_clock(clock: fn() -> OffsetDateTime) -> Self {
        Self { clock }
    }

    /// # Errors
    ///
    /// Returns `EvalError` if the expression does not parse or fails to evaluate.
    pub fn evaluate(
        &self,
        expression: &str,
        context: &Map<String, Value>,
    ) -> Result<Value, EvalError> {
        let expr = parse(expression)?;
        self.eval(&expr, context)
    }

    /// Evaluate a guard and reduce it to a boolean.
    ///
    /// # Errors
    ///
    /// Returns `EvalError` if the expression does not parse or fails to evaluate.
    pub fn check(&self, expression: &str, context: &Map<String, Value>) -> Result<bool, EvalError> {
        self.evaluate(expression, context).map(|v| is_truthy(&v))
    }

    fn eval(&self, expr: &Expr, context: &Map<String, Value>) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => context
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnknownName { name: name.clone() }),
            Expr::Call { builtin, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg, context))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(*builtin, args)
            }
            Expr::Not(inner) => Ok(Value::Bool(!is_truthy(&self.eval(inner, context)?))),
            Expr::Neg(inner) => match as_num(&self.eval(inner, context)?) {
                Some(Num::Int(i)) => match i.checked_neg() {
                    Some(n) => Ok(Value::from(n)),
                    None => float(-(i as f64)),
                },
                Some(Num::Float(f)) => float(-f),
                None => Err(EvalError::TypeMismatch {
                    operator: "-",
                    left: "nothing",
                    right: "non-number",
                }),
            },
            Expr::And(left, right) => {
                if !is_truthy(&self.eval(left, context)?) {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(is_truthy(&self.eval(right, context)?)))
            }
            Expr::Or(left, right) => {
                if is_truthy(&self.eval(left, context)?) {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(is_truthy(&self.eval(right, context)?)))
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, context)?;
                let right = self.eval(right, context)?;
                binary(*op, &left, &right)
            }
        }
    }

    fn call(&self, builtin: Builtin, args: Vec<Value>) -> Result<Value, EvalError> {
        if args.len() != builtin.arity() {
            return Err(EvalError::Arity {
                function: builtin.name(),
                expected: builtin.arity(),
                actual: args.len(),
            });
        }
        let arg = args.into_iter().next();

        match (builtin, arg) {
            (Builtin::Now, _) => (self.clock)()
                .format(format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second]Z"
                ))
                .map(Value::String)
                .map_err(|e| EvalError::Clock {
                    message: e.to_string(),
                }),
            (Builtin::Today, _) => (self.clock)()
                .format(format_description!("[year]-[month]-[day]"))
                .map(Value::String)
                .map_err(|e| EvalError::Clock {
                    message: e.to_string(),
                }),
            (Builtin::Slugify, Some(value)) => Ok(Value::String(slugify(&display(&value)))),
            (Builtin::Lower, Some(Value::String(s))) => Ok(Value::String(s.to_lowercase())),
            (Builtin::Upper, Some(Value::String(s))) => Ok(Value::String(s.to_uppercase())),
            (Builtin::Len, Some(Value::String(s))) => Ok(Value::from(s.chars().count())),
            (Builtin::Len, Some(Value::Array(items))) => Ok(Value::from(items.len())),
            (Builtin::Str, Some(value)) => Ok(Value::String(display(&value))),
            (builtin, Some(value)) => Err(EvalError::TypeMismatch {
                operator: builtin.name(),
                left: crate::types::json_type_name(&value),
                right: "nothing",
            }),
            (builtin, None) => Err(EvalError::Arity {
                function: builtin.name(),
                expected: builtin.arity(),
                actual: 0,
            }),
        }
    }
}

/// Lowercase, hyphen-separated form of `input` (`"Hello, World!"` → `"hello-world"`).
///
/// Non-ASCII text is transliterated first (`"Crème brûlée"` → `"creme-brulee"`),
/// then anything that is not an ASCII letter or digit separates words.
pub fn slugify(input: &str) -> String {
    let ascii = deunicode(input);
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_hyphen = false;

    for c in ascii.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Truthiness: `null`, `false`, `0`, `""`, `[]` and `{}` are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Text form of a value; `null` is the empty string.
fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn as_num(value: &Value) -> Option<Num> {
    let Value::Number(n) = value else {
        return None;
    };
    match n.as_i64() {
        Some(i) => Some(Num::Int(i)),
        None => n.as_f64().map(Num::Float),
    }
}

fn float(f: f64) -> Result<Value, EvalError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or(EvalError::NotFinite)
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    let mismatch = || EvalError::TypeMismatch {
        operator: op.symbol(),
        left: crate::types::json_type_name(left),
        right: crate::types::json_type_name(right),
    };

    match op {
        BinaryOp::Add if left.is_string() || right.is_string() => {
            Ok(Value::String(format!("{}{}", display(left), display(right))))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
            let (a, b) = (as_num(left).ok_or_else(mismatch)?, as_num(right).ok_or_else(mismatch)?);
            if let (Num::Int(a), Num::Int(b)) = (a, b) {
                let exact = match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    _ => a.checked_mul(b),
                };
                if let Some(n) = exact {
                    return Ok(Value::from(n));
                }
            }
            let (a, b) = (a.as_f64(), b.as_f64());
            float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                _ => a * b,
            })
        }
        BinaryOp::Div => {
            let (a, b) = (as_num(left).ok_or_else(mismatch)?, as_num(right).ok_or_else(mismatch)?);
            if b.as_f64() == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            float(a.as_f64() / b.as_f64())
        }
        BinaryOp::Eq => Ok(Value::Bool(loosely_equal(left, right))),
        BinaryOp::Ne => Ok(Value::Bool(!loosely_equal(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Value::String(a), Value::String(b)) => a.partial_cmp(b),
                _ => as_num(left)
                    .zip(as_num(right))
                    .and_then(|(a, b)| a.as_f64().partial_cmp(&b.as_f64())),
            }
            .ok_or_else(mismatch)?;
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }
    }
}

/// Equality where `1 == 1.0`.
fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (as_num(left), as_num(right)) {
        (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

// --- Parsing ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Now,
    Today,
    Slugify,
    Lower,
    Upper,
    Len,
    Str,
}

impl Builtin {
    fn lookup(name: &str) -> Option<Self> {
        let builtin = match name {
            "now" => Builtin::Now,
            "today" => Builtin::Today,
            "slugify" => Builtin::Slugify,
            "lower" => Builtin::Lower,
            "upper" => Builtin::Upper,
            "len" => Builtin::Len,
            "str" => Builtin::Str,
            _ => return None,
        };
        Some(builtin)
    }

    fn name(self) -> &'static str {
        match self {
            Builtin::Now => "now",
            Builtin::Today => "today",
            Builtin::Slugify => "slugify",
            Builtin::Lower => "lower",
            Builtin::Upper => "upper",
            Builtin::Len => "len",
            Builtin::Str => "str",
        }
    }

    fn arity(self) -> usize {
        match self {
            Builtin::Now | Builtin::Today => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Name(String),
    Call { builtin: Builtin, args: Vec<Expr> },
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    Null,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    LParen,
    RParen,
    Comma,
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => name.clone(),
            Token::Int(i) => i.to_string(),
            Token::Float(f) => f.to_string(),
            Token::Str(s) => format!("'{}'", s),
            Token::True => "true".into(),
            Token::False => "false".into(),
            Token::Null => "null".into(),
            Token::And => "and".into(),
            Token::Or => "or".into(),
            Token::Not => "not".into(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::EqEq => "==".into(),
            Token::NotEq => "!=".into(),
            Token::Lt => "<".into(),
            Token::Le => "<=".into(),
            Token::Gt => ">".into(),
            Token::Ge => ">=".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Comma => ",".into(),
            Token::Eof => "end of input".into(),
        }
    }
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    position: usize,
}

fn parse(input: &str) -> Result<Expr, EvalError> {
    if input.len() > MAX_EXPRESSION_BYTES {
        return Err(EvalError::InputTooLarge {
            max_bytes: MAX_EXPRESSION_BYTES,
            actual_bytes: input.len(),
        });
    }
    if input.trim().is_empty() {
        return Err(EvalError::EmptyInput);
    }

    let tokens = Lexer::new(input).lex()?;
    let mut parser = Parser {
        tokens,
        index: 0,
        depth: 0,
    };
    let expr = parser.parse_or()?;
    parser.expect(&Token::Eof, "end of input")?;
    Ok(expr)
}

struct Lexer<'a> {
    input: &'a str,
    chars: Vec<(usize, char)>,
    index: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().collect(),
            index: 0,
        }
    }

    fn lex(mut self) -> Result<Vec<Spanned>, EvalError> {
        let mut tokens = Vec::new();

        while let Some(&(position, ch)) = self.chars.get(self.index) {
            let token = match ch {
                c if c.is_whitespace() => {
                    self.index += 1;
                    continue;
                }
                '(' => self.single(Token::LParen),
                ')' => self.single(Token::RParen),
                ',' => self.single(Token::Comma),
                '+' => self.single(Token::Plus),
                '-' => self.single(Token::Minus),
                '*' => self.single(Token::Star),
                '/' => self.single(Token::Slash),
                '=' => self.pair('=', Token::EqEq, None, "==", position)?,
                '!' => self.pair('=', Token::NotEq, Some(Token::Not), "!", position)?,
                '<' => self.pair('=', Token::Le, Some(Token::Lt), "<", position)?,
                '>' => self.pair('=', Token::Ge, Some(Token::Gt), ">", position)?,
                '&' => self.pair('&', Token::And, None, "&&", position)?,
                '|' => self.pair('|', Token::Or, None, "||", position)?,
                '\'' | '"' => self.string(ch, position)?,
                '0'..='9' => self.number(position)?,
                c if c.is_alphabetic() || c == '_' => self.word(),
                other => {
                    return Err(EvalError::UnexpectedToken {
                        expected: "expression",
                        found: other.to_string(),
                        position,
                    })
                }
            };
            tokens.push(Spanned { token, position });
        }

        tokens.push(Spanned {
            token: Token::Eof,
            position: self.input.len(),
        });
        Ok(tokens)
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.index + 1).map(|&(_, c)| c)
    }

    /// Byte offset of the current char, or the input length at the end.
    fn offset(&self) -> usize {
        self.chars
            .get(self.index)
            .map(|&(pos, _)| pos)
            .unwrap_or(self.input.len())
    }

    fn single(&mut self, token: Token) -> Token {
        self.index += 1;
        token
    }

    /// Two-char operator, or the single-char fallback if there is one.
    fn pair(
        &mut self,
        second: char,
        double: Token,
        single: Option<Token>,
        expected: &'static str,
        position: usize,
    ) -> Result<Token, EvalError> {
        if self.peek_next() == Some(second) {
            self.index += 2;
            return Ok(double);
        }
        match single {
            Some(token) => Ok(self.single(token)),
            None => Err(EvalError::UnexpectedToken {
                expected,
                found: self.input[position..].chars().take(1).collect(),
                position,
            }),
        }
    }

    fn string(&mut self, quote: char, position: usize) -> Result<Token, EvalError> {
        self.index += 1;
        let mut text = String::new();

        while let Some(&(_, c)) = self.chars.get(self.index) {
            self.index += 1;
            match c {
                c if c == quote => return Ok(Token::Str(text)),
                '\\' => {
                    let Some(&(_, escaped)) = self.chars.get(self.index) else {
                        break;
                    };
                    self.index += 1;
                    text.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                }
                c => text.push(c),
            }
        }

        Err(EvalError::UnterminatedString { position })
    }

    fn number(&mut self, start: usize) -> Result<Token, EvalError> {
        let mut is_float = false;
        while let Some(&(_, c)) = self.chars.get(self.index) {
            if c.is_ascii_digit() {
                self.index += 1;
            } else if c == '.' && !is_float && self.peek_next().is_some_and(|n| n.is_ascii_digit()) {
                is_float = true;
                self.index += 1;
            } else {
                break;
            }
        }

        let raw = &self.input[start..self.offset()];
        let invalid = || EvalError::InvalidNumber {
            raw: raw.to_string(),
            position: start,
        };
        if is_float {
            raw.parse().map(Token::Float).map_err(|_| invalid())
        } else {
            raw.parse().map(Token::Int).map_err(|_| invalid())
        }
    }

    /// Identifier (dots allowed, for dotted field names) or keyword.
    fn word(&mut self) -> Token {
        let start = self.offset();
        while let Some(&(_, c)) = self.chars.get(self.index) {
            if c.is_alphanumeric() || c == '_' || c == '.' {
                self.index += 1;
            } else {
                break;
            }
        }

        match &self.input[start..self.offset()] {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            ident => Token::Ident(ident.to_string()),
        }
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
    depth: usize,
}

impl Parser {
    fn current(&self) -> &Token {
        self.tokens
            .get(self.index)
            .map(|t| &t.token)
            .unwrap_or(&Token::Eof)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .or_else(|| self.tokens.last())
            .map(|t| t.position)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        self.index += 1;
        token
    }

    fn matches(&mut self, token: &Token) -> bool {
        if self.current() == token {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, expected: &'static str) -> Result<(), EvalError> {
        if self.matches(token) {
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn unexpected(&self, expected: &'static str) -> EvalError {
        EvalError::UnexpectedToken {
            expected,
            found: self.current().describe(),
            position: self.position(),
        }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, EvalError>) -> Result<T, EvalError> {
        if self.depth >= MAX_NESTING {
            return Err(EvalError::NestingTooDeep {
                max_depth: MAX_NESTING,
                position: self.position(),
            });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn parse_or(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_and()?;
        while self.matches(&Token::Or) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_not()?;
        while self.matches(&Token::And) {
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, EvalError> {
        if self.matches(&Token::Not) {
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, EvalError> {
        let left = self.parse_additive()?;
        let op = match self.current() {
            Token::EqEq => BinaryOp::Eq,
            Token::NotEq => BinaryOp::Ne,
            Token::Lt => BinaryOp::Lt,
            Token::Le => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::Ge => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.current() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_term(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, EvalError> {
        if self.matches(&Token::Minus) {
            let inner = self.nested(Self::parse_unary)?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, EvalError> {
        let position = self.position();
        match self.advance() {
            Token::Int(i) => Ok(Expr::Literal(Value::from(i))),
            Token::Float(f) => Number::from_f64(f)
                .map(|n| Expr::Literal(Value::Number(n)))
                .ok_or(EvalError::InvalidNumber {
                    raw: f.to_string(),
                    position,
                }),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Ident(name) => {
                if !self.matches(&Token::LParen) {
                    return Ok(Expr::Name(name));
                }
                let builtin =
                    Builtin::lookup(&name).ok_or(EvalError::UnknownFunction { name })?;
                self.nested(|parser| {
                    let args = parser.parse_arguments()?;
                    Ok(Expr::Call { builtin, args })
                })
            }
            Token::LParen => self.nested(|parser| {
                let expr = parser.parse_or()?;
                parser.expect(&Token::RParen, "`)`")?;
                Ok(expr)
            }),
            _ => {
                self.index -= 1;
                Err(self.unexpected("a value, name, or `(`"))
            }
        }
    }

    /// Arguments after the opening parenthesis, through the closing one.
    fn parse_arguments(&mut self) -> Result<Vec<Expr>, EvalError> {
        let mut args = Vec::new();
        if self.matches(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_or()?);
            if self.matches(&Token::Comma) {
                continue;
            }
            self.expect(&Token::RParen, "`,` or `)`")?;
            return Ok(args);
        }
    }
}
