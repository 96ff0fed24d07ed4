use crate::error::{CompileError, EvalError};
use crate::numeric::{BinaryOp, Function, Numeric};
use std::collections::HashMap;
use std::f64::consts::PI;

const CONSTANTS: &[(&str, f64)] = &[("pi", PI)];

/// The closed set of variable names an expression may reference.
///
/// Functions (`sin, cos, tan, exp, sqrt, log`) and constants (`pi`) are always
/// available; the variable list decides the slot order used by
/// [`Expression::evaluate_slots`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    variables: Vec<String>,
}

impl AllowList {
    pub fn new<I, S>(variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            variables: variables.into_iter().map(Into::into).collect(),
        }
    }

    /// `x`, `y` and `t`, in that slot order.
    pub fn planar() -> Self {
        Self::new(["x", "y", "t"])
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    fn resolve(&self, name: &str) -> Option<Symbol> {
        if let Some(function) = Function::from_name(name) {
            return Some(Symbol::Function(function));
        }
        if let Some((_, value)) = CONSTANTS.iter().find(|(n, _)| *n == name) {
            return Some(Symbol::Constant(*value));
        }
        self.variables
            .iter()
            .position(|v| v == name)
            .map(Symbol::Variable)
    }

    fn all_names(&self) -> Vec<&str> {
        self.variables
            .iter()
            .map(String::as_str)
            .chain(CONSTANTS.iter().map(|(n, _)| *n))
            .chain(Function::ALL.iter().map(|f| f.name()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Symbol {
    Variable(usize),
    Constant(f64),
    Function(Function),
}

/// Resolved syntax tree. Variables are already mapped to slots.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Number(f64),
    Variable(usize),
    Negate(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Call(Function, Box<Node>),
}

/// A compiled formula, evaluable any number of times in scalar or array mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
    variables: Vec<String>,
}

/// Parses `input` and checks every identifier against `allowed`.
pub fn compile(input: &str, allowed: &AllowList) -> Result<Expression, CompileError> {
    let tokens = tokenize(input, allowed)?;
    let mut parser = Parser {
        source: input,
        tokens,
        pos: 0,
        depth: 0,
    };
    let root = parser.parse_expression()?;
    if let Some(token) = parser.peek() {
        return Err(parser.error_at(
            token,
            format!("unexpected '{}' after a complete expression", token.text),
            "insert an operator such as '*' between terms",
        ));
    }
    Ok(Expression {
        source: input.to_string(),
        root,
        variables: allowed.variables.clone(),
    })
}

impl Expression {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// True when the expression mentions `name` as a variable.
    pub fn references(&self, name: &str) -> bool {
        match self.variables.iter().position(|v| v == name) {
            Some(slot) => node_references(&self.root, slot),
            None => false,
        }
    }

    /// Evaluates with named bindings. The map is only read.
    pub fn evaluate<V: Numeric>(&self, bindings: &HashMap<String, V>) -> Result<V, EvalError> {
        eval_node(&self.root, &|slot| {
            let name = &self.variables[slot];
            bindings
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnboundVariable(name.clone()))
        })
    }

    /// Evaluates with values given in allow-list slot order.
    pub fn evaluate_slots<V: Numeric>(&self, values: &[V]) -> Result<V, EvalError> {
        eval_node(&self.root, &|slot| {
            values
                .get(slot)
                .cloned()
                .ok_or_else(|| EvalError::UnboundVariable(self.variables[slot].clone()))
        })
    }
}

fn node_references(node: &Node, slot: usize) -> bool {
    match node {
        Node::Number(_) => false,
        Node::Variable(s) => *s == slot,
        Node::Negate(inner) | Node::Call(_, inner) => node_references(inner, slot),
        Node::Binary(_, lhs, rhs) => node_references(lhs, slot) || node_references(rhs, slot),
    }
}

fn eval_node<V, L>(node: &Node, load: &L) -> Result<V, EvalError>
where
    V: Numeric,
    L: Fn(usize) -> Result<V, EvalError>,
{
    match node {
        Node::Number(n) => Ok(V::constant(*n)),
        Node::Variable(slot) => load(*slot),
        Node::Negate(inner) => Ok(eval_node(inner, load)?.negate()),
        Node::Binary(op, lhs, rhs) => {
            let a = eval_node(lhs, load)?;
            let b = eval_node(rhs, load)?;
            V::binary(*op, a, b)
        }
        Node::Call(function, arg) => V::call(*function, eval_node(arg, load)?),
    }
}

// --- Tokenizer ---

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Symbol(Symbol),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
    text: String,
}

fn compile_error(
    source: &str,
    fragment: &str,
    offset: usize,
    message: String,
    hint: impl Into<String>,
) -> CompileError {
    CompileError {
        expression: source.to_string(),
        fragment: fragment.to_string(),
        offset,
        message,
        hint: hint.into(),
    }
}

fn tokenize(input: &str, allowed: &AllowList) -> Result<Vec<Token>, CompileError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || (c == '.' && next_is_digit(input, offset)) {
            let end = scan_number(input, offset);
            let text = &input[offset..end];
            let value: f64 = text.parse().map_err(|_| {
                compile_error(
                    input,
                    text,
                    offset,
                    format!("malformed number '{text}'"),
                    "write numbers like '2', '0.5' or '1e-3'",
                )
            })?;
            while chars.peek().is_some_and(|&(i, _)| i < end) {
                chars.next();
            }
            tokens.push(Token {
                kind: TokenKind::Number(value),
                offset,
                text: text.to_string(),
            });
        } else if c.is_alphabetic() || c == '_' {
            let mut end = offset;
            while let Some(&(i, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    end = i + d.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let name = &input[offset..end];
            let symbol = allowed
                .resolve(name)
                .ok_or_else(|| unknown_identifier(input, name, offset, allowed))?;
            tokens.push(Token {
                kind: TokenKind::Symbol(symbol),
                offset,
                text: name.to_string(),
            });
        } else {
            chars.next();
            let kind = match c {
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => {
                    if chars.peek().is_some_and(|&(_, d)| d == '*') {
                        chars.next();
                        TokenKind::Caret
                    } else {
                        TokenKind::Star
                    }
                }
                '/' => TokenKind::Slash,
                '^' => TokenKind::Caret,
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                other => {
                    let fragment = &input[offset..offset + other.len_utf8()];
                    return Err(compile_error(
                        input,
                        fragment,
                        offset,
                        format!("unexpected character '{other}'"),
                        character_hint(other),
                    ));
                }
            };
            let end = chars.peek().map_or(input.len(), |&(i, _)| i);
            tokens.push(Token {
                kind,
                offset,
                text: input[offset..end].to_string(),
            });
        }
    }
    Ok(tokens)
}

fn next_is_digit(input: &str, offset: usize) -> bool {
    input[offset + 1..]
        .chars()
        .next()
        .is_some_and(|d| d.is_ascii_digit())
}

/// Returns the end offset of the number starting at `start`.
fn scan_number(input: &str, start: usize) -> usize {
    let bytes = input.as_bytes();
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        if exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
                exp_end += 1;
            }
            end = exp_end;
        }
    }
    end
}

fn character_hint(c: char) -> &'static str {
    match c {
        '.' => "attribute access is not supported; use plain arithmetic",
        '\'' | '"' => "text literals are not supported",
        '=' => "enter only the right-hand side, e.g. 'y' instead of 'dx/dt = y'",
        ';' => "enter a single expression",
        ',' => "functions take exactly one argument",
        '[' | ']' | '{' | '}' => "use parentheses for grouping",
        _ => "only numbers, variables, + - * / ^, parentheses and allowed functions may be used",
    }
}

fn unknown_identifier(input: &str, name: &str, offset: usize, allowed: &AllowList) -> CompileError {
    let names = allowed.all_names();
    let tolerance = (name.chars().count() / 3).max(1);
    let suggestion = names
        .iter()
        .map(|candidate| (edit_distance(name, candidate), *candidate))
        .filter(|(distance, _)| *distance <= tolerance)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate);
    let hint = match suggestion {
        Some(best) if Function::from_name(best).is_some() => {
            format!("use '{best}(x)' not '{name}(x)'")
        }
        Some(best) => format!("use '{best}' not '{name}'"),
        None => format!("allowed names are: {}", names.join(", ")),
    };
    compile_error(
        input,
        name,
        offset,
        format!("unknown identifier '{name}'"),
        hint,
    )
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut current = vec![i + 1; b_chars.len() + 1];
        for (j, cb) in b_chars.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        previous = current;
    }
    previous[b_chars.len()]
}

// --- Parser ---

/// Deepest chain of parentheses, calls, signs and exponents accepted.
const MAX_NESTING: usize = 128;

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error_at(&self, token: &Token, message: String, hint: &str) -> CompileError {
        compile_error(self.source, &token.text, token.offset, message, hint)
    }

    fn error_at_end(&self, message: &str, hint: &str) -> CompileError {
        compile_error(
            self.source,
            "",
            self.source.len(),
            message.to_string(),
            hint,
        )
    }

    // expression := term (('+' | '-') term)*
    fn parse_expression(&mut self) -> Result<Node, CompileError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.consume();
            let right = self.parse_term()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // term := unary (('*' | '/') unary)*
    fn parse_term(&mut self) -> Result<Node, CompileError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // Every nested construct passes through here, so this bounds recursion.
    fn parse_unary(&mut self) -> Result<Node, CompileError> {
        if self.depth >= MAX_NESTING {
            let message = "expression is nested too deeply".to_string();
            let hint = format!("use at most {MAX_NESTING} nested parentheses, signs or exponents");
            return Err(match self.peek() {
                Some(token) => self.error_at(token, message, &hint),
                None => self.error_at_end(&message, &hint),
            });
        }
        self.depth += 1;
        let node = self.parse_signed();
        self.depth -= 1;
        node
    }

    // unary := ('-' | '+') unary | power
    fn parse_signed(&mut self) -> Result<Node, CompileError> {
        match self.peek_kind() {
            Some(TokenKind::Minus) => {
                self.consume();
                Ok(Node::Negate(Box::new(self.parse_unary()?)))
            }
            Some(TokenKind::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    // power := primary ('^' unary)?
    // Right-associative, and the exponent may carry its own sign: 2^-1.
    fn parse_power(&mut self) -> Result<Node, CompileError> {
        let base = self.parse_primary()?;
        if let Some(TokenKind::Caret) = self.peek_kind() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Node::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Node, CompileError> {
        let token = match self.consume() {
            Some(token) => token,
            None => {
                return Err(self.error_at_end(
                    "expression ended unexpectedly",
                    "complete the expression, e.g. 'x - y'",
                ))
            }
        };
        match token.kind {
            TokenKind::Number(n) => Ok(Node::Number(n)),
            TokenKind::Symbol(Symbol::Function(function)) => {
                if !matches!(self.peek_kind(), Some(TokenKind::LParen)) {
                    return Err(self.error_at(
                        &token,
                        format!("'{}' is a function and must be called", token.text),
                        &format!("write '{}(x)'", token.text),
                    ));
                }
                self.consume();
                let arg = self.parse_expression()?;
                self.expect_closing(&token)?;
                Ok(Node::Call(function, Box::new(arg)))
            }
            TokenKind::Symbol(Symbol::Variable(slot)) => {
                self.reject_call(&token)?;
                Ok(Node::Variable(slot))
            }
            TokenKind::Symbol(Symbol::Constant(value)) => {
                self.reject_call(&token)?;
                Ok(Node::Number(value))
            }
            TokenKind::LParen => {
                let inner = self.parse_expression()?;
                self.expect_closing(&token)?;
                Ok(inner)
            }
            _ => Err(self.error_at(
                &token,
                format!("unexpected '{}'", token.text),
                "an operand (number, variable or parenthesis) is expected here",
            )),
        }
    }

    fn reject_call(&self, token: &Token) -> Result<(), CompileError> {
        if let Some(TokenKind::LParen) = self.peek_kind() {
            return Err(self.error_at(
                token,
                format!("'{}' is not a function", token.text),
                "use '*' for multiplication, e.g. 'x*(y + 1)'",
            ));
        }
        Ok(())
    }

    fn expect_closing(&mut self, opening: &Token) -> Result<(), CompileError> {
        match self.consume() {
            Some(Token {
                kind: TokenKind::RParen,
                ..
            }) => Ok(()),
            Some(other) => Err(self.error_at(
                &other,
                format!("expected ')' but found '{}'", other.text),
                "check that parentheses are balanced",
            )),
            None => Err(compile_error(
                self.source,
                &opening.text,
                opening.offset,
                "unclosed '('".to_string(),
                "check that parentheses are balanced",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::FieldValue;
    use nalgebra::DMatrix;

    fn scalar(expr: &str, x: f64, y: f64) -> Result<f64, EvalError> {
        compile(expr, &AllowList::planar())
            .expect("expression should compile")
            .evaluate_slots(&[x, y, 0.0])
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(scalar("1 + 2 * 3", 0.0, 0.0).unwrap(), 7.0);
        assert_eq!(scalar("(1 + 2) * 3", 0.0, 0.0).unwrap(), 9.0);
        assert_eq!(scalar("2^3^2", 0.0, 0.0).unwrap(), 512.0);
        assert_eq!(scalar("-x^2", 3.0, 0.0).unwrap(), -9.0);
        assert_eq!(scalar("2^-1", 0.0, 0.0).unwrap(), 0.5);
        assert_eq!(scalar("x**2 - y", 3.0, 1.0).unwrap(), 8.0);
        assert_eq!(scalar("8 / 4 / 2", 0.0, 0.0).unwrap(), 1.0);
        assert_eq!(scalar("1.5e1 + .5", 0.0, 0.0).unwrap(), 15.5);
    }

    #[test]
    fn functions_and_constants_evaluate() {
        let value = scalar("sin(pi/2) + cos(0) + exp(0) + sqrt(4) + log(1) + tan(0)", 0.0, 0.0)
            .expect("evaluates");
        assert!((value - 5.0).abs() < 1e-12, "got {value}");
    }

    #[test]
    fn misspelled_function_is_rejected_with_hint() {
        let err = compile("sinn(x)", &AllowList::planar()).expect_err("sinn should fail");
        assert_eq!(err.fragment, "sinn");
        assert_eq!(err.offset, 0);
        assert!(err.to_string().contains("sinn"), "unexpected error: {err}");
        assert_eq!(err.hint, "use 'sin(x)' not 'sinn(x)'");
    }

    #[test]
    fn host_calls_are_rejected_before_anything_else() {
        let err = compile("os.system('x')", &AllowList::planar()).expect_err("os should fail");
        assert_eq!(err.fragment, "os");
        assert!(err.message.contains("unknown identifier"));
        assert_eq!(err.expression, "os.system('x')");
    }

    #[test]
    fn deep_nesting_is_a_compile_error() {
        let parens = "(".repeat(10_000);
        let err = compile(&parens, &AllowList::planar()).expect_err("too deep");
        assert_eq!(err.message, "expression is nested too deeply");
        assert_eq!(err.fragment, "(");

        let signs = format!("{}x", "-".repeat(10_000));
        let err = compile(&signs, &AllowList::planar()).expect_err("too deep");
        assert_eq!(err.message, "expression is nested too deeply");

        let powers = format!("{}x", "x^".repeat(10_000));
        assert!(compile(&powers, &AllowList::planar()).is_err());

        let nested = format!("{}x{}", "sin(".repeat(50), ")".repeat(50));
        assert!(compile(&nested, &AllowList::planar()).is_ok());
    }

    #[test]
    fn statement_syntax_is_rejected() {
        for input in ["x = 1", "x; y", "x.real", "'x'", "pow(x, 2)", "x[0]", "__import__"] {
            assert!(
                compile(input, &AllowList::planar()).is_err(),
                "expected '{input}' to be rejected"
            );
        }
    }

    #[test]
    fn malformed_arithmetic_is_rejected() {
        for input in ["", "1 +", "(x", "x)", "x y", "sin x", "x(2)", "*2", "1.2.3"] {
            let err = compile(input, &AllowList::planar())
                .expect_err("malformed input should fail");
            assert_eq!(err.expression, input);
        }
    }

    #[test]
    fn named_bindings_are_not_mutated() {
        let expr = compile("x * y", &AllowList::planar()).expect("compiles");
        let mut bindings = HashMap::new();
        bindings.insert("x".to_string(), 2.0);
        bindings.insert("y".to_string(), 4.0);
        let before = bindings.clone();
        assert_eq!(expr.evaluate(&bindings).expect("evaluates"), 8.0);
        assert_eq!(bindings, before);
    }

    #[test]
    fn missing_binding_is_reported() {
        let expr = compile("x + y", &AllowList::planar()).expect("compiles");
        let mut bindings = HashMap::new();
        bindings.insert("x".to_string(), 1.0);
        let err = expr.evaluate(&bindings).expect_err("y is unbound");
        assert_eq!(err, EvalError::UnboundVariable("y".to_string()));
    }

    #[test]
    fn same_expression_evaluates_in_both_modes() {
        let expr = compile("x*y - sin(x) + 2", &AllowList::planar()).expect("compiles");
        let xs = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 2.0, 3.0]);
        let ys = DMatrix::from_row_slice(2, 2, &[-1.0, 0.5, 1.5, -2.0]);
        let array = expr
            .evaluate_slots(&[
                FieldValue::Array(xs.clone()),
                FieldValue::Array(ys.clone()),
                FieldValue::Scalar(0.0),
            ])
            .expect("array evaluation")
            .into_array(2, 2)
            .expect("shape");
        for i in 0..2 {
            for j in 0..2 {
                let point = expr
                    .evaluate_slots(&[xs[(i, j)], ys[(i, j)], 0.0])
                    .expect("scalar evaluation");
                assert!((array[(i, j)] - point).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn scalar_mode_reports_domain_errors() {
        assert!(matches!(
            scalar("1/x", 0.0, 0.0),
            Err(EvalError::DivisionByZero { .. })
        ));
        assert!(matches!(
            scalar("sqrt(x)", -1.0, 0.0),
            Err(EvalError::Domain { function: "sqrt", .. })
        ));
    }

    #[test]
    fn references_tracks_used_variables() {
        let expr = compile("2 * y", &AllowList::planar()).expect("compiles");
        assert!(expr.references("y"));
        assert!(!expr.references("x"));
        assert!(!expr.references("z"));
    }
}
