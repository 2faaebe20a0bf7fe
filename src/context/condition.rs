//! Execution conditions
//!
//! A small boolean grammar evaluated against a parameter snapshot:
//!
//! ```text
//! expr    := and ( ("||" | "or") and )*
//! and     := unary ( ("&&" | "and") unary )*
//! unary   := ("!" | "not") unary | primary
//! primary := "(" expr ")" | operand ( cmp operand )?
//! cmp     := "==" | "!=" | "<" | "<=" | ">" | ">="
//! operand := number | 'string' | "string" | true | false | null
//!          | identifier | ${identifier}
//! ```
//!
//! Identifiers may be dotted (`user.role`) and see the same names as
//! templates, including `env.a.b` environment paths. Undefined variables
//! evaluate to null. `not` and parentheses nest at most
//! [`MAX_NESTING`] levels deep. Nothing is ever executed; the expression is parsed into a
//! [`Condition`] tree and walked.

use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

use super::resolver::{value_to_string, Scope};
use crate::definition::ParamMap;

/// Deepest allowed chain of `not` operators and parentheses
pub const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error("Empty condition")]
    Empty,

    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("Unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("Unexpected token '{found}' at position {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("Unexpected end of condition")]
    UnexpectedEnd,

    #[error("Condition nested deeper than {max} levels at position {pos}")]
    TooDeep { max: usize, pos: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Variable(String),
    Literal(Value),
}

/// Parsed condition tree
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// A bare operand, tested for truthiness
    Truthy(Operand),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    pub fn parse(input: &str) -> Result<Self, ConditionError> {
        let tokens = lex(input)?;
        if tokens.is_empty() {
            return Err(ConditionError::Empty);
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let condition = parser.parse_or()?;
        match parser.peek() {
            None => Ok(condition),
            Some(token) => Err(ConditionError::UnexpectedToken {
                found: token.kind.to_string(),
                pos: token.pos,
            }),
        }
    }

    pub fn evaluate(&self, vars: &ParamMap) -> bool {
        self.evaluate_in(&Scope::new(vars))
    }

    /// Evaluate with template lookup rules (parameters, then `env.` paths)
    pub fn evaluate_in(&self, scope: &Scope<'_>) -> bool {
        match self {
            Condition::Truthy(operand) => is_truthy(&operand.value(scope)),
            Condition::Compare { left, op, right } => {
                compare(&left.value(scope), *op, &right.value(scope))
            }
            Condition::Not(inner) => !inner.evaluate_in(scope),
            Condition::And(a, b) => a.evaluate_in(scope) && b.evaluate_in(scope),
            Condition::Or(a, b) => a.evaluate_in(scope) || b.evaluate_in(scope),
        }
    }
}

/// Parse and evaluate in one step
pub fn evaluate_condition(input: &str, vars: &ParamMap) -> Result<bool, ConditionError> {
    Ok(Condition::parse(input)?.evaluate(vars))
}

impl Operand {
    fn value(&self, scope: &Scope<'_>) -> Value {
        match self {
            Operand::Literal(v) => v.clone(),
            Operand::Variable(name) => scope.lookup(name).unwrap_or(Value::Null),
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let lower = s.trim().to_lowercase();
            !lower.is_empty() && !matches!(lower.as_str(), "false" | "0" | "null" | "none")
        }
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    let ordering = match (as_number(left), as_number(right)) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (left, right) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => {
                // Mixed kinds only support (in)equality on their rendering
                let equal = value_to_string(left) == value_to_string(right);
                return match op {
                    CompareOp::Eq => equal,
                    CompareOp::Ne => !equal,
                    _ => false,
                };
            }
        },
    };

    match (op, ordering) {
        (CompareOp::Eq, o) => o == Some(Ordering::Equal),
        (CompareOp::Ne, o) => o != Some(Ordering::Equal),
        (CompareOp::Lt, Some(o)) => o == Ordering::Less,
        (CompareOp::Le, Some(o)) => o != Ordering::Greater,
        (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
        (CompareOp::Ge, Some(o)) => o != Ordering::Less,
        (_, None) => false,
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    LParen,
    RParen,
    And,
    Or,
    Not,
    Cmp(CompareOp),
    Literal(Value),
    Ident(String),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::And => write!(f, "and"),
            TokenKind::Or => write!(f, "or"),
            TokenKind::Not => write!(f, "not"),
            TokenKind::Cmp(op) => write!(
                f,
                "{}",
                match op {
                    CompareOp::Eq => "==",
                    CompareOp::Ne => "!=",
                    CompareOp::Lt => "<",
                    CompareOp::Le => "<=",
                    CompareOp::Gt => ">",
                    CompareOp::Ge => ">=",
                }
            ),
            TokenKind::Literal(v) => write!(f, "{}", v),
            TokenKind::Ident(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-'
}

fn lex(input: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let peek_is = |i: usize, expected: char| chars.get(i).is_some_and(|&(_, c)| c == expected);

    while let Some(&(pos, c)) = chars.get(i) {
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let (kind, width) = match c {
            '(' => (TokenKind::LParen, 1),
            ')' => (TokenKind::RParen, 1),
            '=' if peek_is(i + 1, '=') => (TokenKind::Cmp(CompareOp::Eq), 2),
            '!' if peek_is(i + 1, '=') => (TokenKind::Cmp(CompareOp::Ne), 2),
            '!' => (TokenKind::Not, 1),
            '<' if peek_is(i + 1, '=') => (TokenKind::Cmp(CompareOp::Le), 2),
            '<' => (TokenKind::Cmp(CompareOp::Lt), 1),
            '>' if peek_is(i + 1, '=') => (TokenKind::Cmp(CompareOp::Ge), 2),
            '>' => (TokenKind::Cmp(CompareOp::Gt), 1),
            '&' if peek_is(i + 1, '&') => (TokenKind::And, 2),
            '|' if peek_is(i + 1, '|') => (TokenKind::Or, 2),
            '\'' | '"' => {
                let mut end = i + 1;
                let mut text = String::new();
                loop {
                    match chars.get(end) {
                        None => return Err(ConditionError::UnterminatedString(pos)),
                        Some(&(_, ch)) if ch == c => break,
                        Some(&(_, ch)) => text.push(ch),
                    }
                    end += 1;
                }
                (TokenKind::Literal(Value::String(text)), end + 1 - i)
            }
            '$' if peek_is(i + 1, '{') => {
                let mut end = i + 2;
                let mut name = String::new();
                loop {
                    match chars.get(end) {
                        None => return Err(ConditionError::UnexpectedEnd),
                        Some(&(_, '}')) => break,
                        Some(&(_, ch)) => name.push(ch),
                    }
                    end += 1;
                }
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(ConditionError::UnexpectedChar { ch: '}', pos: chars[end].0 });
                }
                (TokenKind::Ident(name), end + 1 - i)
            }
            c if c.is_ascii_digit()
                || (c == '-' && chars.get(i + 1).is_some_and(|&(_, d)| d.is_ascii_digit())) =>
            {
                let mut end = i + 1;
                while chars
                    .get(end)
                    .is_some_and(|&(_, d)| d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E')
                {
                    end += 1;
                }
                let text: String = chars[i..end].iter().map(|&(_, ch)| ch).collect();
                let value = match text.parse::<i64>() {
                    Ok(n) => Value::from(n),
                    Err(_) => text
                        .parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                        .ok_or(ConditionError::UnexpectedChar { ch: c, pos })?,
                };
                (TokenKind::Literal(value), end - i)
            }
            c if is_ident_start(c) => {
                let mut end = i + 1;
                while chars.get(end).is_some_and(|&(_, ch)| is_ident_char(ch)) {
                    end += 1;
                }
                let word: String = chars[i..end].iter().map(|&(_, ch)| ch).collect();
                let kind = match word.to_ascii_lowercase().as_str() {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    "true" => TokenKind::Literal(Value::Bool(true)),
                    "false" => TokenKind::Literal(Value::Bool(false)),
                    "null" | "none" => TokenKind::Literal(Value::Null),
                    _ => TokenKind::Ident(word),
                };
                (kind, end - i)
            }
            other => return Err(ConditionError::UnexpectedChar { ch: other, pos }),
        };

        tokens.push(Token { kind, pos });
        i += width;
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, ConditionError> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(ConditionError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|t| &t.kind == kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume `kind` as the opener of one nesting level
    fn open(&mut self, kind: &TokenKind) -> Result<bool, ConditionError> {
        let pos = match self.peek() {
            Some(token) if &token.kind == kind => token.pos,
            _ => return Ok(false),
        };
        if self.depth >= MAX_NESTING {
            return Err(ConditionError::TooDeep {
                max: MAX_NESTING,
                pos,
            });
        }
        self.pos += 1;
        self.depth += 1;
        Ok(true)
    }

    fn parse_or(&mut self) -> Result<Condition, ConditionError> {
        let mut left = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            let right = self.parse_and()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Condition, ConditionError> {
        let mut left = self.parse_unary()?;
        while self.eat(&TokenKind::And) {
            let right = self.parse_unary()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Condition, ConditionError> {
        if self.open(&TokenKind::Not)? {
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Condition::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Condition, ConditionError> {
        if self.open(&TokenKind::LParen)? {
            let inner = self.parse_or()?;
            self.depth -= 1;
            let close = self.next()?;
            if close.kind != TokenKind::RParen {
                return Err(ConditionError::UnexpectedToken {
                    found: close.kind.to_string(),
                    pos: close.pos,
                });
            }
            return Ok(inner);
        }

        let left = self.parse_operand()?;
        if let Some(TokenKind::Cmp(op)) = self.peek().map(|t| t.kind.clone()) {
            self.pos += 1;
            let right = self.parse_operand()?;
            return Ok(Condition::Compare { left, op, right });
        }
        Ok(Condition::Truthy(left))
    }

    fn parse_operand(&mut self) -> Result<Operand, ConditionError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Literal(value) => Ok(Operand::Literal(value)),
            TokenKind::Ident(name) => Ok(Operand::Variable(name)),
            other => Err(ConditionError::UnexpectedToken {
                found: other.to_string(),
                pos: token.pos,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars() -> ParamMap {
        serde_json::from_value(json!({
            "status": 200,
            "role": "admin",
            "enabled": true,
            "count": "5",
            "user": { "country": "DE" },
            "empty": ""
        }))
        .unwrap()
    }

    fn eval(expr: &str) -> bool {
        evaluate_condition(expr, &vars()).unwrap()
    }

    #[test]
    fn test_comparisons() {
        assert!(eval("status == 200"));
        assert!(eval("status != 404"));
        assert!(eval("status >= 200 && status < 300"));
        assert!(eval("role == 'admin'"));
        assert!(eval("role == \"admin\""));
        assert!(!eval("role == 'guest'"));
        assert!(eval("count > 3"));
        assert!(eval("user.country == 'DE'"));
    }

    #[test]
    fn test_connectives_and_precedence() {
        assert!(eval("role == 'guest' or status == 200"));
        assert!(eval("not (role == 'guest')"));
        assert!(eval("!empty"));
        // and binds tighter than or
        assert!(eval("true || false && false"));
        assert!(!eval("(true || false) && false"));
    }

    #[test]
    fn test_truthiness_and_missing() {
        assert!(eval("enabled"));
        assert!(!eval("empty"));
        assert!(!eval("missing"));
        assert!(eval("missing == null"));
        assert!(!eval("missing > 1"));
    }

    #[test]
    fn test_dollar_brace_variables() {
        assert!(eval("${status} == 200 and ${role} == 'admin'"));
    }

    #[test]
    fn test_ast_shape() {
        let cond = Condition::parse("a == 1 and not b").unwrap();
        assert_eq!(
            cond,
            Condition::And(
                Box::new(Condition::Compare {
                    left: Operand::Variable("a".into()),
                    op: CompareOp::Eq,
                    right: Operand::Literal(json!(1)),
                }),
                Box::new(Condition::Not(Box::new(Condition::Truthy(Operand::Variable(
                    "b".into()
                ))))),
            )
        );
    }

    #[test]
    fn test_negative_and_float_literals() {
        let vars: ParamMap = serde_json::from_value(json!({ "t": -1.5 })).unwrap();
        assert!(evaluate_condition("t < -1", &vars).unwrap());
        assert!(evaluate_condition("t == -1.5", &vars).unwrap());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Condition::parse("   "), Err(ConditionError::Empty));
        assert!(matches!(
            Condition::parse("a == 'open"),
            Err(ConditionError::UnterminatedString(_))
        ));
        assert!(matches!(
            Condition::parse("a ; b"),
            Err(ConditionError::UnexpectedChar { ch: ';', .. })
        ));
        assert!(matches!(
            Condition::parse("(a == 1"),
            Err(ConditionError::UnexpectedEnd)
        ));
        assert!(matches!(
            Condition::parse("a == 1 b"),
            Err(ConditionError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            Condition::parse("a =="),
            Err(ConditionError::UnexpectedEnd)
        ));
    }

    #[test]
    fn test_nesting_is_capped() {
        let ok = format!("{}a{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(Condition::parse(&ok).is_ok());

        let parens = format!("{}a{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(matches!(
            Condition::parse(&parens),
            Err(ConditionError::TooDeep { max: MAX_NESTING, .. })
        ));

        let nots = format!("{}a", "not ".repeat(10_000));
        assert_eq!(
            Condition::parse(&nots),
            Err(ConditionError::TooDeep {
                max: MAX_NESTING,
                pos: MAX_NESTING * 4
            })
        );

        // Sibling groups do not accumulate depth
        let siblings = vec!["(not a)"; 200].join(" or ");
        assert!(Condition::parse(&siblings).is_ok());
    }

    #[test]
    fn test_environment_paths_in_conditions() {
        let env = crate::context::EnvironmentConfig::new(
            "staging",
            json!({ "api": { "region": "eu" } }),
        )
        .unwrap();
        let vars = vars();
        let scope = Scope::new(&vars).with_environment(&env);

        let cond = Condition::parse("${env.api.region} == 'eu' and status == 200").unwrap();
        assert!(cond.evaluate_in(&scope));
        assert!(!cond.evaluate(&vars));
    }
}
