//! Interpreter for the expression language embedded in function snippets.
//!
//! The grammar is deliberately small: dot navigation over the context
//! slots, string/number/bool literals, regex `match`, short-circuit
//! boolean operators, comparisons, arithmetic, the ternary operator, and
//! optional `return` statement lists. Identifiers resolve through a
//! [`Scope`]; unknown names and absent members yield the undefined value,
//! which propagates through further member access.

use regex::RegexBuilder;
use serde_json::Value as Json;
use std::fmt;
use thiserror::Error;

/// Error type for expression parsing and evaluation.
#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    /// The expression text could not be parsed.
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// The expression failed during evaluation.
    #[error("eval error: {0}")]
    Eval(String),
}

/// Name resolution for the five context slot identifiers.
pub trait Scope {
    /// Resolve an identifier; unknown names yield [`Value::Undefined`].
    fn lookup(&self, name: &str) -> Value;
}

/// An empty scope where every identifier is undefined.
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn lookup(&self, _name: &str) -> Value {
        Value::Undefined
    }
}

/// Runtime value of the expression language.
///
/// JSON values cover null/bool/number/string and the object trees the
/// context slots are built from; `Undefined` is distinct from JSON null so
/// absent-member access can be told apart from an explicit null.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Json(Json),
}

impl Value {
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Json(Json::Null))
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined => false,
            Value::Json(Json::Null) => false,
            Value::Json(Json::Bool(b)) => *b,
            Value::Json(Json::Number(n)) => {
                let f = n.as_f64().unwrap_or(f64::NAN);
                f != 0.0 && !f.is_nan()
            }
            Value::Json(Json::String(s)) => !s.is_empty(),
            Value::Json(Json::Array(_)) | Value::Json(Json::Object(_)) => true,
        }
    }

    pub fn as_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Json(Json::Null) => 0.0,
            Value::Json(Json::Bool(b)) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Json(Json::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
            Value::Json(Json::String(s)) => s.trim().parse().unwrap_or(f64::NAN),
            Value::Json(Json::Array(_)) | Value::Json(Json::Object(_)) => f64::NAN,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Json(Json::String(s)) => Some(s),
            _ => None,
        }
    }

    fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Json(a), Value::Json(b)) => match (a, b) {
                (Json::Number(x), Json::Number(y)) => {
                    x.as_f64().unwrap_or(f64::NAN) == y.as_f64().unwrap_or(f64::NAN)
                }
                _ => a == b,
            },
            _ => false,
        }
    }

    fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            // undefined and null are loosely equal to each other and
            // themselves, and to nothing else.
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Value::Json(Json::String(a)), Value::Json(Json::String(b))) => a == b,
            _ => {
                let (a, b) = (self.as_number(), other.as_number());
                a == b && !a.is_nan()
            }
        }
    }
}

/// Format a number the way the snippet output expects: integral values
/// print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Json(Json::Null) => write!(f, "null"),
            Value::Json(Json::Bool(b)) => write!(f, "{}", b),
            Value::Json(Json::Number(n)) => {
                write!(f, "{}", format_number(n.as_f64().unwrap_or(f64::NAN)))
            }
            Value::Json(Json::String(s)) => write!(f, "{}", s),
            Value::Json(other) => write!(f, "{}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Str(String),
    Regex { pattern: String, case_insensitive: bool },
    Ident(String),
    True,
    False,
    Null,
    Undefined,
    Return,
    Dot,
    LParen,
    RParen,
    Comma,
    Semi,
    Question,
    Colon,
    AndAnd,
    OrOr,
    Not,
    StrictEq,
    StrictNe,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
}

impl Token {
    /// True when a `/` following this token starts a regex literal rather
    /// than a division.
    fn allows_regex(&self) -> bool {
        !matches!(
            self,
            Token::Num(_)
                | Token::Str(_)
                | Token::Regex { .. }
                | Token::Ident(_)
                | Token::True
                | Token::False
                | Token::Null
                | Token::Undefined
                | Token::RParen
        )
    }
}

fn lex(source: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let bytes: Vec<char> = source.chars().collect();
    let mut tokens: Vec<(usize, Token)> = Vec::new();
    let mut i = 0usize;

    let err = |offset: usize, message: &str| ExprError::Parse {
        offset,
        message: message.to_string(),
    };

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '0'..='9' => {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if i < bytes.len() && bytes[i] == '.' && i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() {
                    i += 1;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                let text: String = bytes[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| err(start, "invalid number literal"))?;
                tokens.push((start, Token::Num(n)));
            }
            '\'' | '"' => {
                let quote = c;
                let start = i;
                i += 1;
                let mut s = String::new();
                loop {
                    if i >= bytes.len() {
                        return Err(err(start, "unterminated string literal"));
                    }
                    match bytes[i] {
                        '\\' if i + 1 < bytes.len() => {
                            let esc = bytes[i + 1];
                            s.push(match esc {
                                'n' => '\n',
                                't' => '\t',
                                other => other,
                            });
                            i += 2;
                        }
                        q if q == quote => {
                            i += 1;
                            break;
                        }
                        other => {
                            s.push(other);
                            i += 1;
                        }
                    }
                }
                tokens.push((start, Token::Str(s)));
            }
            '/' => {
                let regex_position = tokens.last().map_or(true, |(_, t)| t.allows_regex());
                if regex_position {
                    let start = i;
                    i += 1;
                    let mut pattern = String::new();
                    loop {
                        if i >= bytes.len() {
                            return Err(err(start, "unterminated regex literal"));
                        }
                        match bytes[i] {
                            '\\' if i + 1 < bytes.len() => {
                                pattern.push(bytes[i]);
                                pattern.push(bytes[i + 1]);
                                i += 2;
                            }
                            '/' => {
                                i += 1;
                                break;
                            }
                            other => {
                                pattern.push(other);
                                i += 1;
                            }
                        }
                    }
                    let mut case_insensitive = false;
                    while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
                        match bytes[i] {
                            'i' => case_insensitive = true,
                            other => {
                                return Err(err(i, &format!("unsupported regex flag '{}'", other)))
                            }
                        }
                        i += 1;
                    }
                    tokens.push((start, Token::Regex { pattern, case_insensitive }));
                } else {
                    tokens.push((i, Token::Slash));
                    i += 1;
                }
            }
            '.' => {
                tokens.push((i, Token::Dot));
                i += 1;
            }
            '(' => {
                tokens.push((i, Token::LParen));
                i += 1;
            }
            ')' => {
                tokens.push((i, Token::RParen));
                i += 1;
            }
            ',' => {
                tokens.push((i, Token::Comma));
                i += 1;
            }
            ';' => {
                tokens.push((i, Token::Semi));
                i += 1;
            }
            '?' => {
                tokens.push((i, Token::Question));
                i += 1;
            }
            ':' => {
                tokens.push((i, Token::Colon));
                i += 1;
            }
            '+' => {
                tokens.push((i, Token::Plus));
                i += 1;
            }
            '-' => {
                tokens.push((i, Token::Minus));
                i += 1;
            }
            '*' => {
                tokens.push((i, Token::Star));
                i += 1;
            }
            '&' => {
                if bytes.get(i + 1) == Some(&'&') {
                    tokens.push((i, Token::AndAnd));
                    i += 2;
                } else {
                    return Err(err(i, "expected '&&'"));
                }
            }
            '|' => {
                if bytes.get(i + 1) == Some(&'|') {
                    tokens.push((i, Token::OrOr));
                    i += 2;
                } else {
                    return Err(err(i, "expected '||'"));
                }
            }
            '=' => {
                if bytes.get(i + 1) == Some(&'=') && bytes.get(i + 2) == Some(&'=') {
                    tokens.push((i, Token::StrictEq));
                    i += 3;
                } else if bytes.get(i + 1) == Some(&'=') {
                    tokens.push((i, Token::Eq));
                    i += 2;
                } else {
                    return Err(err(i, "assignment is not supported"));
                }
            }
            '!' => {
                if bytes.get(i + 1) == Some(&'=') && bytes.get(i + 2) == Some(&'=') {
                    tokens.push((i, Token::StrictNe));
                    i += 3;
                } else if bytes.get(i + 1) == Some(&'=') {
                    tokens.push((i, Token::Ne));
                    i += 2;
                } else {
                    tokens.push((i, Token::Not));
                    i += 1;
                }
            }
            '<' => {
                if bytes.get(i + 1) == Some(&'=') {
                    tokens.push((i, Token::Le));
                    i += 2;
                } else {
                    tokens.push((i, Token::Lt));
                    i += 1;
                }
            }
            '>' => {
                if bytes.get(i + 1) == Some(&'=') {
                    tokens.push((i, Token::Ge));
                    i += 2;
                } else {
                    tokens.push((i, Token::Gt));
                    i += 1;
                }
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == '_' || bytes[i] == '$')
                {
                    i += 1;
                }
                let word: String = bytes[start..i].iter().collect();
                let token = match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "undefined" => Token::Undefined,
                    "return" => Token::Return,
                    _ => Token::Ident(word),
                };
                tokens.push((start, token));
            }
            other => return Err(err(i, &format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    Str(String),
    Bool(bool),
    Null,
    Undefined,
    Regex { pattern: String, case_insensitive: bool },
    Ident(String),
    Member(Box<Expr>, String),
    MethodCall(Box<Expr>, String, Vec<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    StrictEq,
    StrictNe,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
enum Stmt {
    Expr(Expr),
    Return(Expr),
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(o, _)| *o)
            .unwrap_or(0)
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::Parse {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), ExprError> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            other => Err(self.error(format!("expected {:?}, found {:?}", token, other))),
        }
    }

    fn parse_program(&mut self) -> Result<Vec<Stmt>, ExprError> {
        let mut stmts = Vec::new();
        loop {
            while self.peek() == Some(&Token::Semi) {
                self.next();
            }
            if self.peek().is_none() {
                break;
            }
            if self.peek() == Some(&Token::Return) {
                self.next();
                let expr = self.parse_expr()?;
                stmts.push(Stmt::Return(expr));
            } else {
                let expr = self.parse_expr()?;
                stmts.push(Stmt::Expr(expr));
            }
        }
        if stmts.is_empty() {
            return Err(self.error("empty expression"));
        }
        Ok(stmts)
    }

    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr, ExprError> {
        let cond = self.parse_or()?;
        if self.peek() == Some(&Token::Question) {
            self.next();
            let then = self.parse_expr()?;
            self.expect(Token::Colon)?;
            let otherwise = self.parse_ternary()?;
            Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise)))
        } else {
            Ok(cond)
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.next();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_equality()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.next();
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::StrictEq) => BinOp::StrictEq,
                Some(Token::StrictNe) => BinOp::StrictNe,
                Some(Token::Eq) => BinOp::Eq,
                Some(Token::Ne) => BinOp::Ne,
                _ => break,
            };
            self.next();
            let right = self.parse_relational()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinOp::Lt,
                Some(Token::Le) => BinOp::Le,
                Some(Token::Gt) => BinOp::Gt,
                Some(Token::Ge) => BinOp::Ge,
                _ => break,
            };
            self.next();
            let right = self.parse_additive()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.next();
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.next();
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some(Token::Not) => {
                self.next();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::Minus) => {
                self.next();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.next();
                    let name = match self.next() {
                        Some(Token::Ident(name)) => name,
                        other => {
                            return Err(self.error(format!(
                                "expected member name after '.', found {:?}",
                                other
                            )))
                        }
                    };
                    if self.peek() == Some(&Token::LParen) {
                        self.next();
                        let mut args = Vec::new();
                        if self.peek() != Some(&Token::RParen) {
                            loop {
                                args.push(self.parse_expr()?);
                                if self.peek() == Some(&Token::Comma) {
                                    self.next();
                                } else {
                                    break;
                                }
                            }
                        }
                        self.expect(Token::RParen)?;
                        expr = Expr::MethodCall(Box::new(expr), name, args);
                    } else {
                        expr = Expr::Member(Box::new(expr), name);
                    }
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::Null) => Ok(Expr::Null),
            Some(Token::Undefined) => Ok(Expr::Undefined),
            Some(Token::Regex { pattern, case_insensitive }) => {
                Ok(Expr::Regex { pattern, case_insensitive })
            }
            Some(Token::Ident(name)) => Ok(Expr::Ident(name)),
            Some(Token::LParen) => {
                let expr = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            other => Err(self.error(format!("unexpected token {:?}", other))),
        }
    }
}

fn eval_expr(expr: &Expr, scope: &dyn Scope) -> Result<Value, ExprError> {
    match expr {
        Expr::Num(n) => Ok(Value::Json(number(*n))),
        Expr::Str(s) => Ok(Value::Json(Json::String(s.clone()))),
        Expr::Bool(b) => Ok(Value::Json(Json::Bool(*b))),
        Expr::Null => Ok(Value::Json(Json::Null)),
        Expr::Undefined => Ok(Value::Undefined),
        Expr::Regex { .. } => Err(ExprError::Eval(
            "regex literal outside of match()".to_string(),
        )),
        Expr::Ident(name) => Ok(scope.lookup(name)),
        Expr::Member(base, name) => {
            let base = eval_expr(base, scope)?;
            Ok(member(&base, name))
        }
        Expr::MethodCall(base, name, args) => {
            let base = eval_expr(base, scope)?;
            call_method(&base, name, args, scope)
        }
        Expr::Not(inner) => {
            let value = eval_expr(inner, scope)?;
            Ok(Value::Json(Json::Bool(!value.truthy())))
        }
        Expr::Neg(inner) => {
            let value = eval_expr(inner, scope)?;
            Ok(Value::Json(number(-value.as_number())))
        }
        Expr::And(left, right) => {
            let left = eval_expr(left, scope)?;
            if left.truthy() {
                eval_expr(right, scope)
            } else {
                Ok(left)
            }
        }
        Expr::Or(left, right) => {
            let left = eval_expr(left, scope)?;
            if left.truthy() {
                Ok(left)
            } else {
                eval_expr(right, scope)
            }
        }
        Expr::Ternary(cond, then, otherwise) => {
            if eval_expr(cond, scope)?.truthy() {
                eval_expr(then, scope)
            } else {
                eval_expr(otherwise, scope)
            }
        }
        Expr::Binary(op, left, right) => {
            let left = eval_expr(left, scope)?;
            let right = eval_expr(right, scope)?;
            eval_binary(*op, &left, &right)
        }
    }
}

fn number(n: f64) -> Json {
    serde_json::Number::from_f64(n)
        .map(Json::Number)
        .unwrap_or(Json::Null)
}

fn member(base: &Value, name: &str) -> Value {
    match base {
        Value::Json(Json::Object(map)) => map
            .get(name)
            .cloned()
            .map(Value::Json)
            .unwrap_or(Value::Undefined),
        // Navigation through the undefined value (or anything without
        // members) stays undefined rather than failing mid-expression.
        _ => Value::Undefined,
    }
}

fn call_method(
    base: &Value,
    name: &str,
    args: &[Expr],
    _scope: &dyn Scope,
) -> Result<Value, ExprError> {
    match name {
        "match" => {
            let Some(target) = base.as_str() else {
                return Ok(Value::Undefined);
            };
            let Some(Expr::Regex { pattern, case_insensitive }) = args.first() else {
                return Err(ExprError::Eval(
                    "match() expects a regex literal argument".to_string(),
                ));
            };
            let re = RegexBuilder::new(pattern)
                .case_insensitive(*case_insensitive)
                .build()
                .map_err(|e| ExprError::Eval(format!("invalid regex /{}/: {}", pattern, e)))?;
            Ok(match re.find(target) {
                Some(m) => Value::Json(Json::String(m.as_str().to_string())),
                None => Value::Json(Json::Null),
            })
        }
        other => Err(ExprError::Eval(format!("unknown method '{}'", other))),
    }
}

fn eval_binary(op: BinOp, left: &Value, right: &Value) -> Result<Value, ExprError> {
    let value = match op {
        BinOp::StrictEq => Json::Bool(left.strict_eq(right)),
        BinOp::StrictNe => Json::Bool(!left.strict_eq(right)),
        BinOp::Eq => Json::Bool(left.loose_eq(right)),
        BinOp::Ne => Json::Bool(!left.loose_eq(right)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            Json::Bool(compare(op, left, right))
        }
        BinOp::Add => match (left.as_str(), right.as_str()) {
            (None, None) => number(left.as_number() + right.as_number()),
            _ => Json::String(format!("{}{}", left, right)),
        },
        BinOp::Sub => number(left.as_number() - right.as_number()),
        BinOp::Mul => number(left.as_number() * right.as_number()),
        BinOp::Div => number(left.as_number() / right.as_number()),
    };
    Ok(Value::Json(value))
}

fn compare(op: BinOp, left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (left.as_str(), right.as_str()) {
        return match op {
            BinOp::Lt => a < b,
            BinOp::Le => a <= b,
            BinOp::Gt => a > b,
            BinOp::Ge => a >= b,
            _ => false,
        };
    }
    let (a, b) = (left.as_number(), right.as_number());
    if a.is_nan() || b.is_nan() {
        return false;
    }
    match op {
        BinOp::Lt => a < b,
        BinOp::Le => a <= b,
        BinOp::Gt => a > b,
        BinOp::Ge => a >= b,
        _ => false,
    }
}

/// Parse and evaluate an expression against a scope.
///
/// A source without `return` is a single expression; otherwise it is a
/// statement list whose value is the first `return`, or the last
/// statement when no `return` executes.
pub fn evaluate(source: &str, scope: &dyn Scope) -> Result<Value, ExprError> {
    let tokens = lex(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let stmts = parser.parse_program()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("trailing tokens"));
    }

    let mut last = Value::Undefined;
    for stmt in &stmts {
        match stmt {
            Stmt::Return(expr) => return eval_expr(expr, scope),
            Stmt::Expr(expr) => last = eval_expr(expr, scope)?,
        }
    }
    Ok(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct JsonScope(Json);

    impl Scope for JsonScope {
        fn lookup(&self, name: &str) -> Value {
            match &self.0 {
                Json::Object(map) => map
                    .get(name)
                    .cloned()
                    .map(Value::Json)
                    .unwrap_or(Value::Undefined),
                _ => Value::Undefined,
            }
        }
    }

    fn eval(source: &str, scope_json: Json) -> Value {
        evaluate(source, &JsonScope(scope_json)).expect("expression should evaluate")
    }

    fn eval_str(source: &str, scope_json: Json) -> String {
        eval(source, scope_json).to_string()
    }

    #[test]
    fn test_literals() {
        assert_eq!(eval("42", json!({})), Value::Json(json!(42.0)));
        assert_eq!(eval("3.5", json!({})), Value::Json(json!(3.5)));
        assert_eq!(eval("'hi'", json!({})), Value::Json(json!("hi")));
        assert_eq!(eval("true", json!({})), Value::Json(json!(true)));
        assert_eq!(eval("null", json!({})), Value::Json(Json::Null));
    }

    #[test]
    fn test_member_navigation() {
        let scope = json!({"input": {"path": {"filename": "ep01"}}});
        assert_eq!(eval_str("input.path.filename", scope), "ep01");
    }

    #[test]
    fn test_absent_member_is_undefined_and_propagates() {
        let scope = json!({"stream": {"index": 2}});
        assert_eq!(eval("stream.tags", scope.clone()), Value::Undefined);
        assert_eq!(eval("stream.tags.language", scope.clone()), Value::Undefined);
        assert_eq!(eval("nosuch.deep.path", scope), Value::Undefined);
    }

    #[test]
    fn test_ternary_with_guard() {
        let scope = json!({"stream": {"tags": {"language": "eng"}}});
        assert_eq!(
            eval_str(
                "stream.tags && stream.tags.language ? stream.tags.language : 'und'",
                scope
            ),
            "eng"
        );
        assert_eq!(
            eval_str(
                "stream.tags && stream.tags.language ? stream.tags.language : 'und'",
                json!({"stream": {"index": 0}})
            ),
            "und"
        );
    }

    #[test]
    fn test_nested_ternary_right_associative() {
        // a ? 'x' : b ? 'y' : 'z'
        assert_eq!(eval_str("false ? 'x' : true ? 'y' : 'z'", json!({})), "y");
        assert_eq!(eval_str("false ? 'x' : false ? 'y' : 'z'", json!({})), "z");
    }

    #[test]
    fn test_strict_equality() {
        let scope = json!({"stream": {"disposition": {"forced": 1}}});
        assert_eq!(
            eval("stream.disposition.forced===1", scope.clone()),
            Value::Json(json!(true))
        );
        assert_eq!(
            eval("stream.disposition.default===1", scope),
            Value::Json(json!(false))
        );
    }

    #[test]
    fn test_loose_equality_coerces() {
        assert_eq!(eval("'5' == 5", json!({})), Value::Json(json!(true)));
        assert_eq!(eval("'5' === 5", json!({})), Value::Json(json!(false)));
        assert_eq!(eval("null == undefined", json!({})), Value::Json(json!(true)));
        assert_eq!(eval("null === undefined", json!({})), Value::Json(json!(false)));
    }

    #[test]
    fn test_comparisons_and_arithmetic() {
        let scope = json!({"input": {"format": {"duration": 1200.0}}});
        assert_eq!(
            eval("input.format.duration > 3600", scope.clone()),
            Value::Json(json!(false))
        );
        assert_eq!(
            eval("input.format.duration / 60 >= 20", scope),
            Value::Json(json!(true))
        );
        assert_eq!(eval_str("1 + 2 * 3", json!({})), "7");
        assert_eq!(eval_str("'a' + 1", json!({})), "a1");
    }

    #[test]
    fn test_string_comparison_against_number_coerces() {
        // ffprobe reports format.duration as a string.
        let scope = json!({"input": {"format": {"duration": "7200.5"}}});
        assert_eq!(
            eval("input.format.duration > 3600", scope),
            Value::Json(json!(true))
        );
    }

    #[test]
    fn test_match_method() {
        let scope = json!({"stream": {"tags": {"title": "Forced subs"}}});
        assert_eq!(
            eval_str("stream.tags.title.match(/forced/i)", scope.clone()),
            "Forced"
        );
        assert_eq!(
            eval("stream.tags.title.match(/sdh/i)", scope),
            Value::Json(Json::Null)
        );
    }

    #[test]
    fn test_match_with_alternation() {
        let scope = json!({"stream": {"tags": {"title": "English SDH"}}});
        assert!(eval("stream.tags.title.match(/hi|sdh/i)", scope).truthy());
    }

    #[test]
    fn test_match_on_undefined_is_undefined() {
        assert_eq!(
            eval("stream.tags.title.match(/x/i)", json!({})),
            Value::Undefined
        );
    }

    #[test]
    fn test_short_circuit_returns_operands() {
        let scope = json!({"stream": {"tags": {"language": "fra"}}});
        assert_eq!(
            eval_str("stream.tags && stream.tags.language", scope),
            "fra"
        );
        assert_eq!(eval_str("'' || 'fallback'", json!({})), "fallback");
    }

    #[test]
    fn test_label_expression_end_to_end() {
        let expr = "(stream.disposition && stream.disposition.forced===1) \
                    || (stream.tags && stream.tags.title && stream.tags.title.match(/forced/i)) \
                    ? 'forced' : \
                    (stream.disposition && stream.disposition.hearing_impaired===1) \
                    || (stream.tags && stream.tags.title && stream.tags.title.match(/hi|sdh/i)) \
                    ? 'sdh' : ''";

        let forced = json!({"stream": {"disposition": {"forced": 1}}});
        assert_eq!(eval_str(expr, forced), "forced");

        let sdh = json!({"stream": {"tags": {"title": "English (SDH)"}}});
        assert_eq!(eval_str(expr, sdh), "sdh");

        let plain = json!({"stream": {"disposition": {"forced": 0}, "tags": {"title": "Full"}}});
        assert_eq!(eval_str(expr, plain), "");
    }

    #[test]
    fn test_return_statement_list() {
        assert_eq!(eval_str("return 'a'", json!({})), "a");
        assert_eq!(eval_str("1; return 2; 3", json!({})), "2");
        assert_eq!(eval_str("true ? 1 : 2; 'last'", json!({})), "last");
    }

    #[test]
    fn test_not_and_negation() {
        assert_eq!(eval("!''", json!({})), Value::Json(json!(true)));
        assert_eq!(eval("!1", json!({})), Value::Json(json!(false)));
        assert_eq!(eval_str("-3 + 5", json!({})), "2");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            evaluate("1 +", &EmptyScope),
            Err(ExprError::Parse { .. })
        ));
        assert!(matches!(
            evaluate("'open", &EmptyScope),
            Err(ExprError::Parse { .. })
        ));
        assert!(matches!(
            evaluate("a = 1", &EmptyScope),
            Err(ExprError::Parse { .. })
        ));
    }

    #[test]
    fn test_division_is_not_regex_after_operand() {
        assert_eq!(eval_str("10 / 4", json!({})), "2.5");
        let scope = json!({"chapter": {"time_base": "1/1000"}});
        assert_eq!(eval_str("chapter.time_base", scope), "1/1000");
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(3.5), "3.5");
    }
}
