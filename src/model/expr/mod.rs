//! Formula language for model outputs.
//!
//! Formulas are parsed once, at request validation, into an [`Expr`] tree
//! whose identifiers are already resolved to input slots. Evaluating a tree
//! per trial is a pure function of the input slice.
//!
//! ## Precedence (lowest to highest)
//!
//! 1. `<`, `<=`, `>`, `>=`, `==`, `!=` - left associative, yield 1 or 0
//! 2. `+`, `-` - left associative
//! 3. `*`, `/`, `%` - left associative
//! 4. Unary `-` - prefix
//! 5. `^` - right associative (so `-2^2 == -4`)
//! 6. Atoms: numbers, variables, `pi`, `e`, `(expr)`, `f(args)`

mod lexer;
mod parser;

use std::fmt;

use thiserror::Error;

pub use lexer::{tokenize, Spanned, Token};
pub use parser::{parse, MAX_DEPTH};

/// Formula could not be parsed or resolved.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Character outside the formula alphabet.
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar {
        /// Offending character.
        ch: char,
        /// Byte offset.
        pos: usize,
    },
    /// Numeric literal that does not parse.
    #[error("invalid number '{text}' at position {pos}")]
    InvalidNumber {
        /// Literal text.
        text: String,
        /// Byte offset.
        pos: usize,
    },
    /// Token where something else was required.
    #[error("expected {expected}, found {found} at position {pos}")]
    UnexpectedToken {
        /// What the parser wanted.
        expected: String,
        /// What it got.
        found: String,
        /// Byte offset.
        pos: usize,
    },
    /// Input ended early.
    #[error("unexpected end of formula, expected {expected}")]
    UnexpectedEnd {
        /// What the parser wanted.
        expected: String,
    },
    /// Identifier is neither an input variable nor a constant.
    #[error("unknown variable '{name}' at position {pos}")]
    UnknownVariable {
        /// Identifier.
        name: String,
        /// Byte offset.
        pos: usize,
    },
    /// Call to a function that does not exist.
    #[error("unknown function '{name}' at position {pos}")]
    UnknownFunction {
        /// Function name.
        name: String,
        /// Byte offset.
        pos: usize,
    },
    /// Wrong number of arguments.
    #[error("function '{function}' expects {expected} argument(s), got {found}")]
    Arity {
        /// Function name.
        function: &'static str,
        /// Accepted argument count description.
        expected: &'static str,
        /// Supplied count.
        found: usize,
    },
    /// Nesting deeper than [`MAX_DEPTH`].
    #[error("formula nesting exceeds {max} levels")]
    TooDeep {
        /// Limit.
        max: usize,
    },
}

/// Per-trial evaluation failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,
    /// Argument outside a function's domain.
    #[error("domain error: {function}({arg})")]
    Domain {
        /// Function name.
        function: &'static str,
        /// Offending argument.
        arg: f64,
    },
    /// NaN or infinity produced.
    #[error("non-finite result ({value}) from {operation}")]
    NonFinite {
        /// Operator or function that produced it.
        operation: &'static str,
        /// The value.
        value: f64,
    },
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Negation.
    Neg,
}

/// Infix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `^`
    Pow,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

impl BinaryOp {
    const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "^",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

/// Single-argument math functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathFn {
    /// Square root; domain `x >= 0`.
    Sqrt,
    /// Natural log (`ln` or `log`); domain `x > 0`.
    Ln,
    /// Base-10 log; domain `x > 0`.
    Log10,
    /// `e^x`.
    Exp,
    /// Absolute value.
    Abs,
    /// Round down.
    Floor,
    /// Round up.
    Ceil,
    /// Round half away from zero.
    Round,
    /// Sine (radians).
    Sin,
    /// Cosine (radians).
    Cos,
    /// Tangent (radians).
    Tan,
}

impl MathFn {
    /// Canonical name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sqrt => "sqrt",
            Self::Ln => "ln",
            Self::Log10 => "log10",
            Self::Exp => "exp",
            Self::Abs => "abs",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Round => "round",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
        }
    }

    fn apply(self, x: f64) -> Result<f64, EvalError> {
        let value = match self {
            Self::Sqrt if x < 0.0 => return Err(EvalError::Domain { function: self.name(), arg: x }),
            Self::Ln | Self::Log10 if x <= 0.0 => {
                return Err(EvalError::Domain { function: self.name(), arg: x })
            }
            Self::Sqrt => x.sqrt(),
            Self::Ln => x.ln(),
            Self::Log10 => x.log10(),
            Self::Exp => x.exp(),
            Self::Abs => x.abs(),
            Self::Floor => x.floor(),
            Self::Ceil => x.ceil(),
            Self::Round => x.round(),
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Tan => x.tan(),
        };
        checked(self.name(), value)
    }
}

/// Built-in functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// One-argument math function.
    Math(MathFn),
    /// Minimum of two or more arguments.
    Min,
    /// Maximum of two or more arguments.
    Max,
    /// `pow(base, exponent)`.
    Pow,
    /// `if(cond, then, else)`; only the chosen branch is evaluated.
    If,
}

impl Function {
    /// Look up a function by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sqrt" => Self::Math(MathFn::Sqrt),
            "ln" | "log" => Self::Math(MathFn::Ln),
            "log10" => Self::Math(MathFn::Log10),
            "exp" => Self::Math(MathFn::Exp),
            "abs" => Self::Math(MathFn::Abs),
            "floor" => Self::Math(MathFn::Floor),
            "ceil" => Self::Math(MathFn::Ceil),
            "round" => Self::Math(MathFn::Round),
            "sin" => Self::Math(MathFn::Sin),
            "cos" => Self::Math(MathFn::Cos),
            "tan" => Self::Math(MathFn::Tan),
            "min" => Self::Min,
            "max" => Self::Max,
            "pow" => Self::Pow,
            "if" => Self::If,
            _ => return None,
        })
    }

    /// Canonical name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Math(m) => m.name(),
            Self::Min => "min",
            Self::Max => "max",
            Self::Pow => "pow",
            Self::If => "if",
        }
    }

    /// Check an argument count.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Arity`] when `found` is not accepted.
    pub fn check_arity(self, found: usize) -> Result<(), ParseError> {
        let (ok, expected) = match self {
            Self::Math(_) => (found == 1, "1"),
            Self::Min | Self::Max => (found >= 2, "at least 2"),
            Self::Pow => (found == 2, "2"),
            Self::If => (found == 3, "3"),
        };
        if ok {
            Ok(())
        } else {
            Err(ParseError::Arity {
                function: self.name(),
                expected,
                found,
            })
        }
    }
}

/// Resolved expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal or named constant.
    Number(f64),
    /// Input slot.
    Var(usize),
    /// Prefix operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Infix operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Function call.
    Call {
        /// Function.
        func: Function,
        /// Arguments (arity already checked).
        args: Vec<Expr>,
    },
}

fn checked(operation: &'static str, value: f64) -> Result<f64, EvalError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::NonFinite { operation, value })
    }
}

const fn truth(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

impl Expr {
    /// Evaluate against input slot values.
    ///
    /// # Errors
    ///
    /// Returns an [`EvalError`] on division by zero, a domain violation, or
    /// any non-finite intermediate value.
    pub fn eval(&self, inputs: &[f64]) -> Result<f64, EvalError> {
        match self {
            Self::Number(n) => checked("literal", *n),
            Self::Var(slot) => checked("input", inputs.get(*slot).copied().unwrap_or(f64::NAN)),
            Self::Unary {
                op: UnaryOp::Neg,
                operand,
            } => Ok(-operand.eval(inputs)?),
            Self::Binary { op, left, right } => {
                let l = left.eval(inputs)?;
                let r = right.eval(inputs)?;
                let value = match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div | BinaryOp::Mod if r == 0.0 => {
                        return Err(EvalError::DivisionByZero)
                    }
                    BinaryOp::Div => l / r,
                    BinaryOp::Mod => l % r,
                    BinaryOp::Pow => l.powf(r),
                    BinaryOp::Lt => truth(l < r),
                    BinaryOp::Le => truth(l <= r),
                    BinaryOp::Gt => truth(l > r),
                    BinaryOp::Ge => truth(l >= r),
                    BinaryOp::Eq => truth(l == r),
                    BinaryOp::Ne => truth(l != r),
                };
                checked(op.symbol(), value)
            }
            Self::Call { func, args } => eval_call(*func, args, inputs),
        }
    }

    /// Number of nodes in the tree.
    #[must_use]
    pub fn node_count(&self) -> usize {
        match self {
            Self::Number(_) | Self::Var(_) => 1,
            Self::Unary { operand, .. } => 1 + operand.node_count(),
            Self::Binary { left, right, .. } => 1 + left.node_count() + right.node_count(),
            Self::Call { args, .. } => 1 + args.iter().map(Self::node_count).sum::<usize>(),
        }
    }
}

fn eval_call(func: Function, args: &[Expr], inputs: &[f64]) -> Result<f64, EvalError> {
    match func {
        Function::Math(m) => m.apply(args[0].eval(inputs)?),
        Function::If => {
            if args[0].eval(inputs)? == 0.0 {
                args[2].eval(inputs)
            } else {
                args[1].eval(inputs)
            }
        }
        Function::Min | Function::Max => {
            let mut acc = args[0].eval(inputs)?;
            for arg in &args[1..] {
                let v = arg.eval(inputs)?;
                acc = if func == Function::Min { acc.min(v) } else { acc.max(v) };
            }
            Ok(acc)
        }
        Function::Pow => {
            let base = args[0].eval(inputs)?;
            let exponent = args[1].eval(inputs)?;
            checked("pow", base.powf(exponent))
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Var(slot) => write!(f, "${slot}"),
            Self::Unary { operand, .. } => write!(f, "(-{operand})"),
            Self::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Self::Call { func, args } => {
                write!(f, "{}(", func.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}
