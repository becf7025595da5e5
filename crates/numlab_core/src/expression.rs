use crate::error::{EvalError, ParseError};
use crate::traits::RealFunction;
use serde::Serialize;
use std::collections::HashMap;
use std::f64::consts;

/// Named functions understood by the engine. `log` is the natural logarithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Log10,
    Log2,
    Sqrt,
    Abs,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        let function = match name {
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "asin" | "arcsin" => Function::Asin,
            "acos" | "arccos" => Function::Acos,
            "atan" | "arctan" => Function::Atan,
            "sinh" => Function::Sinh,
            "cosh" => Function::Cosh,
            "tanh" => Function::Tanh,
            "exp" => Function::Exp,
            "ln" | "log" => Function::Ln,
            "log10" => Function::Log10,
            "log2" => Function::Log2,
            "sqrt" => Function::Sqrt,
            "abs" => Function::Abs,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Asin => "asin",
            Function::Acos => "acos",
            Function::Atan => "atan",
            Function::Sinh => "sinh",
            Function::Cosh => "cosh",
            Function::Tanh => "tanh",
            Function::Exp => "exp",
            Function::Ln => "ln",
            Function::Log10 => "log10",
            Function::Log2 => "log2",
            Function::Sqrt => "sqrt",
            Function::Abs => "abs",
        }
    }

    fn apply(self, a: f64) -> Result<f64, EvalError> {
        let domain = |ok: bool| {
            if ok {
                Ok(())
            } else {
                Err(EvalError::Domain {
                    function: self.name(),
                    argument: a,
                })
            }
        };
        let value = match self {
            Function::Sin => a.sin(),
            Function::Cos => a.cos(),
            Function::Tan => a.tan(),
            Function::Asin => {
                domain((-1.0..=1.0).contains(&a))?;
                a.asin()
            }
            Function::Acos => {
                domain((-1.0..=1.0).contains(&a))?;
                a.acos()
            }
            Function::Atan => a.atan(),
            Function::Sinh => a.sinh(),
            Function::Cosh => a.cosh(),
            Function::Tanh => a.tanh(),
            Function::Exp => a.exp(),
            Function::Ln => {
                domain(a > 0.0)?;
                a.ln()
            }
            Function::Log10 => {
                domain(a > 0.0)?;
                a.log10()
            }
            Function::Log2 => {
                domain(a > 0.0)?;
                a.log2()
            }
            Function::Sqrt => {
                domain(a >= 0.0)?;
                a.sqrt()
            }
            Function::Abs => a.abs(),
        };
        Ok(value)
    }
}

/// OpCodes for the stack-based virtual machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant onto the stack.
    LoadConst(f64),
    /// Pushes the value of a variable (by index) onto the stack.
    /// Indices follow the order the variables were declared in (e.g., 0=x, 1=y).
    LoadVar(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b). Fails when b == 0.
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes -a.
    Neg,
    /// Pops top value (a), pushes f(a).
    Call(Function),
}

/// A compiled sequence of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stateless stack VM. The stack is owned by the caller of `execute`,
/// so one `Bytecode` can be evaluated from any number of threads.
pub struct VM;

impl VM {
    pub fn execute(bytecode: &Bytecode, vars: &[f64], stack: &mut Vec<f64>) -> Result<f64, EvalError> {
        stack.clear();

        for op in &bytecode.ops {
            let value = match *op {
                OpCode::LoadConst(val) => val,
                OpCode::LoadVar(idx) => *vars.get(idx).ok_or(EvalError::Arity {
                    expected: idx + 1,
                    found: vars.len(),
                })?,
                OpCode::Add => {
                    let (a, b) = pop_pair(stack)?;
                    a + b
                }
                OpCode::Sub => {
                    let (a, b) = pop_pair(stack)?;
                    a - b
                }
                OpCode::Mul => {
                    let (a, b) = pop_pair(stack)?;
                    a * b
                }
                OpCode::Div => {
                    let (a, b) = pop_pair(stack)?;
                    if b == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    a / b
                }
                OpCode::Pow => {
                    let (a, b) = pop_pair(stack)?;
                    power(a, b)?
                }
                OpCode::Neg => -pop(stack)?,
                OpCode::Call(function) => function.apply(pop(stack)?)?,
            };
            stack.push(value);
        }

        pop(stack)
    }
}

fn pop(stack: &mut Vec<f64>) -> Result<f64, EvalError> {
    stack.pop().ok_or(EvalError::StackUnderflow)
}

fn pop_pair(stack: &mut Vec<f64>) -> Result<(f64, f64), EvalError> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    Ok((a, b))
}

fn power(base: f64, exponent: f64) -> Result<f64, EvalError> {
    if base == 0.0 && exponent < 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    if base < 0.0 && exponent.fract() != 0.0 {
        return Err(EvalError::InvalidPower { base, exponent });
    }
    Ok(base.powf(exponent))
}

// --- AST & Compiler ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Neg(Box<Expr>),
    Call(Function, Box<Expr>),
}

/// Compiles an AST into `Bytecode`, resolving variable names to indices.
/// `pi` and `e` are folded to constants unless declared as variables.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(var_names: &[String]) -> Self {
        let var_map = var_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { var_map }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, ParseError> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), ParseError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => {
                if let Some(&idx) = self.var_map.get(name) {
                    ops.push(OpCode::LoadVar(idx));
                } else {
                    match name.as_str() {
                        "pi" => ops.push(OpCode::LoadConst(consts::PI)),
                        "e" => ops.push(OpCode::LoadConst(consts::E)),
                        _ => return Err(ParseError::UnknownVariable(name.clone())),
                    }
                }
            }
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                ops.push(match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::Div => OpCode::Div,
                    BinaryOp::Pow => OpCode::Pow,
                });
            }
            Expr::Neg(operand) => {
                self.compile_recursive(operand, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(function, arg) => {
                self.compile_recursive(arg, ops)?;
                ops.push(OpCode::Call(*function));
            }
        }
        Ok(())
    }
}

// --- Parser ---

/// Parses a string expression into an AST.
///
/// Grammar, loosest binding first:
/// `sum := product (('+' | '-') product)*`,
/// `product := unary (('*' | '/') unary | <implicit> power)*`,
/// `unary := ('-' | '+') unary | power`,
/// `power := primary ('^' unary)?` (right associative, so `-x^2` is `-(x^2)`).
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_sum()?;
    match parser.peek() {
        None => Ok(expr),
        Some((token, position)) => Err(ParseError::UnexpectedToken {
            token: token.to_string(),
            position,
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Identifier(name) => write!(f, "{name}"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Caret => write!(f, "^"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut literal = String::new();
            while let Some(&(_, d)) = chars.peek() {
                let exponent_sign = (d == '+' || d == '-')
                    && literal.ends_with(['e', 'E']);
                if d.is_ascii_digit() || d == '.' || exponent_sign {
                    literal.push(d);
                    chars.next();
                } else if d == 'e' || d == 'E' {
                    // Only an exponent when digits follow, optionally signed: `2e` and
                    // `2e-x` multiply by the constant e.
                    let mut lookahead = chars.clone();
                    lookahead.next();
                    let exponent = match lookahead.next() {
                        Some((_, n)) if n.is_ascii_digit() => true,
                        Some((_, '+' | '-')) => {
                            matches!(lookahead.next(), Some((_, n)) if n.is_ascii_digit())
                        }
                        _ => false,
                    };
                    if !exponent {
                        break;
                    }
                    literal.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = literal
                .parse()
                .map_err(|_| ParseError::InvalidNumber(literal.clone()))?;
            tokens.push((Token::Number(value), position));
        } else if c.is_alphabetic() {
            let mut ident = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push((Token::Identifier(ident), position));
        } else {
            chars.next();
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => {
                    if matches!(chars.peek(), Some(&(_, '*'))) {
                        chars.next();
                        Token::Caret
                    } else {
                        Token::Star
                    }
                }
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => return Err(ParseError::UnexpectedCharacter { ch: c, position }),
            };
            tokens.push((token, position));
        }
    }
    Ok(tokens)
}

/// Nesting allowed in one expression. Parentheses, calls, unary signs, exponents and
/// every operator chained onto a sum or product each count one level.
pub const MAX_NESTING: usize = 128;

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<(&Token, usize)> {
        self.tokens.get(self.pos).map(|(t, p)| (t, *p))
    }

    fn consume(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn end_position(&self) -> usize {
        self.tokens.last().map_or(0, |(_, p)| p + 1)
    }

    fn deepen(&mut self) -> Result<(), ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::TooDeep { limit: MAX_NESTING });
        }
        self.depth += 1;
        Ok(())
    }

    fn nested(&mut self, parse: fn(&mut Self) -> Result<Expr, ParseError>) -> Result<Expr, ParseError> {
        self.deepen()?;
        let expr = parse(self)?;
        self.depth -= 1;
        Ok(expr)
    }

    fn parse_sum(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut left = self.parse_product()?;

        while let Some((token, _)) = self.peek() {
            let op = match token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.consume();
            self.deepen()?;
            let right = self.parse_product()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr, ParseError> {
        let depth = self.depth;
        let mut left = self.parse_unary()?;

        while let Some((token, _)) = self.peek() {
            match token {
                Token::Star | Token::Slash => {
                    let op = if *token == Token::Star {
                        BinaryOp::Mul
                    } else {
                        BinaryOp::Div
                    };
                    self.consume();
                    self.deepen()?;
                    let right = self.parse_unary()?;
                    left = Expr::Binary(Box::new(left), op, Box::new(right));
                }
                // Implicit multiplication: `2x`, `3(x+1)`, `(x+1)(x-1)`.
                Token::Number(_) | Token::Identifier(_) | Token::LParen => {
                    self.deepen()?;
                    let right = self.parse_power()?;
                    left = Expr::Binary(Box::new(left), BinaryOp::Mul, Box::new(right));
                }
                _ => break,
            }
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some((Token::Minus, _)) => {
                self.consume();
                Ok(Expr::Neg(Box::new(self.nested(Self::parse_unary)?)))
            }
            Some((Token::Plus, _)) => {
                self.consume();
                self.nested(Self::parse_unary)
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_primary()?;
        if let Some((Token::Caret, _)) = self.peek() {
            self.consume();
            let exponent = self.nested(Self::parse_unary)?;
            return Ok(Expr::Binary(Box::new(base), BinaryOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        match self.consume() {
            Some((Token::Number(n), _)) => Ok(Expr::Number(n)),
            Some((Token::Identifier(name), _)) => {
                let opens_call = matches!(self.peek(), Some((Token::LParen, _)));
                match Function::from_name(&name) {
                    Some(function) if opens_call => {
                        self.consume();
                        let arg = self.nested(Self::parse_sum)?;
                        self.expect_closing()?;
                        Ok(Expr::Call(function, Box::new(arg)))
                    }
                    // `sin x` without parentheses takes the following power as argument.
                    Some(function) => {
                        let arg = self.nested(Self::parse_power)?;
                        Ok(Expr::Call(function, Box::new(arg)))
                    }
                    None if opens_call => Err(ParseError::UnknownFunction(name)),
                    None => Ok(Expr::Variable(name)),
                }
            }
            Some((Token::LParen, _)) => {
                let expr = self.nested(Self::parse_sum)?;
                self.expect_closing()?;
                Ok(expr)
            }
            Some((token, position)) => Err(ParseError::UnexpectedToken {
                token: token.to_string(),
                position,
            }),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn expect_closing(&mut self) -> Result<(), ParseError> {
        match self.consume() {
            Some((Token::RParen, _)) => Ok(()),
            Some((_, position)) => Err(ParseError::UnbalancedParenthesis { position }),
            None => Err(ParseError::UnbalancedParenthesis {
                position: self.end_position(),
            }),
        }
    }
}

// --- Expression ---

/// A parsed and compiled scalar expression.
///
/// Construction either yields a fully compiled expression or a [`ParseError`];
/// there is no partially usable state. Evaluation never mutates the expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expression {
    source: String,
    variables: Vec<String>,
    #[serde(skip)]
    bytecode: Bytecode,
}

impl Expression {
    /// Parses a function of the single free variable `x`.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        Self::with_variables(text, &["x"])
    }

    /// Parses an expression over a fixed, ordered set of named variables.
    pub fn with_variables(text: &str, variables: &[&str]) -> Result<Self, ParseError> {
        let variables: Vec<String> = variables.iter().map(|v| v.to_string()).collect();
        let expr = parse(text)?;
        let bytecode = Compiler::new(&variables).compile(&expr)?;
        Ok(Self {
            source: text.trim().to_string(),
            variables,
            bytecode,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    /// Evaluates with one value per declared variable, in declaration order.
    pub fn evaluate_at(&self, values: &[f64]) -> Result<f64, EvalError> {
        if values.len() != self.variables.len() {
            return Err(EvalError::Arity {
                expected: self.variables.len(),
                found: values.len(),
            });
        }
        let mut stack = Vec::with_capacity(self.bytecode.ops.len());
        VM::execute(&self.bytecode, values, &mut stack)
    }
}

impl RealFunction for Expression {
    fn evaluate(&self, x: f64) -> Result<f64, EvalError> {
        self.evaluate_at(&[x])
    }
}

/// One row of a function table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplePoint {
    pub x: f64,
    /// `None` where the function is undefined or non-finite.
    pub y: Option<f64>,
}

/// Samples `f` at `samples` evenly spaced points of `[start, end]` (both ends included).
pub fn tabulate(f: &impl RealFunction, start: f64, end: f64, samples: usize) -> Vec<SamplePoint> {
    let spacing = if samples > 1 {
        (end - start) / (samples - 1) as f64
    } else {
        0.0
    };
    (0..samples)
        .map(|i| {
            let x = if i + 1 == samples && samples > 1 {
                end
            } else {
                start + spacing * i as f64
            };
            SamplePoint {
                x,
                y: f.evaluate_finite(x).ok(),
            }
        })
        .collect()
}
