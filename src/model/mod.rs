//! Model definitions: input variables and the formulas that map a sampled
//! input vector to named outputs.
//!
//! A [`ModelSpec`] is what the caller sends. Compiling it against the
//! declared variable names yields a [`CompiledModel`] whose evaluation is a
//! pure function, safe to call from any number of trial workers at once.

pub mod distribution;
pub mod expr;

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub use distribution::{Distribution, DistributionSpec};
pub use expr::{EvalError, Expr, ParseError};

/// Output name used by single-formula and built-in models.
pub const DEFAULT_OUTPUT: &str = "result";

/// Model as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelSpec {
    /// Inline formula, or the name of a built-in model.
    Formula(String),
    /// `{"name": "<builtin>"}`
    Named {
        /// Built-in model name.
        name: String,
    },
    /// `{"outputs": {"<output>": "<formula>", ...}}`
    Outputs {
        /// Output name to formula, in output order.
        outputs: IndexMap<String, String>,
    },
}

/// Models that need no formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinModel {
    /// The single input variable, unchanged.
    Identity,
    /// Sum of all inputs.
    Sum,
    /// Product of all inputs.
    Product,
    /// Arithmetic mean of all inputs.
    Mean,
}

impl BuiltinModel {
    /// All built-ins, for documentation.
    pub const ALL: [Self; 4] = [Self::Identity, Self::Sum, Self::Product, Self::Mean];

    /// Look up a built-in by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "identity" => Some(Self::Identity),
            "sum" => Some(Self::Sum),
            "product" => Some(Self::Product),
            "mean" => Some(Self::Mean),
            _ => None,
        }
    }

    /// Wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Sum => "sum",
            Self::Product => "product",
            Self::Mean => "mean",
        }
    }

    /// Build the expression tree over `n_inputs` slots.
    ///
    /// # Errors
    ///
    /// `identity` requires exactly one input.
    pub fn expr(self, n_inputs: usize) -> Result<Expr, String> {
        use expr::BinaryOp;

        if n_inputs == 0 {
            return Err(format!("{self} model requires at least one variable"));
        }
        if self == Self::Identity {
            return if n_inputs == 1 {
                Ok(Expr::Var(0))
            } else {
                Err(format!("identity model requires exactly one variable, got {n_inputs}"))
            };
        }

        let op = if self == Self::Product {
            BinaryOp::Mul
        } else {
            BinaryOp::Add
        };
        let folded = (1..n_inputs).fold(Expr::Var(0), |acc, slot| Expr::Binary {
            op,
            left: Box::new(acc),
            right: Box::new(Expr::Var(slot)),
        });

        if self == Self::Mean {
            Ok(Expr::Binary {
                op: BinaryOp::Div,
                left: Box::new(folded),
                right: Box::new(Expr::Number(n_inputs as f64)),
            })
        } else {
            Ok(folded)
        }
    }
}

impl fmt::Display for BuiltinModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a model failed to compile.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelError {
    /// Field path relative to the request (e.g. `model.outputs.profit`).
    pub field: String,
    /// Description.
    pub message: String,
}

impl ModelError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check that `name` is usable as a variable or output identifier.
#[must_use]
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl ModelSpec {
    /// Resolve against the declared variables and parse every formula.
    ///
    /// A string that names a built-in is the built-in unless a variable of
    /// the same name exists, in which case it is a formula.
    ///
    /// # Errors
    ///
    /// Returns the first [`ModelError`] found.
    pub fn compile(&self, variables: &[String], max_formula_len: usize) -> Result<CompiledModel, ModelError> {
        let n = variables.len();
        let builtin = |b: BuiltinModel, field: &str| {
            b.expr(n)
                .map(CompiledModel::single)
                .map_err(|m| ModelError::new(field, m))
        };

        match self {
            Self::Formula(source) => {
                if let Some(b) = BuiltinModel::from_name(source.trim()) {
                    if !variables.iter().any(|v| v == source.trim()) {
                        return builtin(b, "model");
                    }
                }
                let expr = compile_formula(source, variables, max_formula_len, "model")?;
                Ok(CompiledModel::single(expr))
            }
            Self::Named { name } => {
                let b = BuiltinModel::from_name(name).ok_or_else(|| {
                    let known: Vec<&str> = BuiltinModel::ALL.iter().map(|b| b.name()).collect();
                    ModelError::new(
                        "model.name",
                        format!("unknown model '{name}', expected one of: {}", known.join(", ")),
                    )
                })?;
                builtin(b, "model.name")
            }
            Self::Outputs { outputs } => {
                if outputs.is_empty() {
                    return Err(ModelError::new("model.outputs", "at least one output is required"));
                }
                let mut names = Vec::with_capacity(outputs.len());
                let mut exprs = Vec::with_capacity(outputs.len());
                for (name, source) in outputs {
                    let field = format!("model.outputs.{name}");
                    if !is_identifier(name) {
                        return Err(ModelError::new(field, "output name must be an identifier"));
                    }
                    exprs.push(compile_formula(source, variables, max_formula_len, &field)?);
                    names.push(name.clone());
                }
                Ok(CompiledModel { names, exprs })
            }
        }
    }
}

fn compile_formula(
    source: &str,
    variables: &[String],
    max_len: usize,
    field: &str,
) -> Result<Expr, ModelError> {
    if source.len() > max_len {
        return Err(ModelError::new(
            field,
            format!("formula is {} bytes, limit is {max_len}", source.len()),
        ));
    }
    expr::parse(source, variables).map_err(|e| ModelError::new(field, e.to_string()))
}

/// Parsed model, ready for per-trial evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledModel {
    names: Vec<String>,
    exprs: Vec<Expr>,
}

impl CompiledModel {
    fn single(expr: Expr) -> Self {
        Self {
            names: vec![DEFAULT_OUTPUT.to_string()],
            exprs: vec![expr],
        }
    }

    /// Output names, in output order.
    #[must_use]
    pub fn output_names(&self) -> &[String] {
        &self.names
    }

    /// Evaluate every output for one input vector (slot order).
    ///
    /// # Errors
    ///
    /// Returns the first output's [`EvalError`].
    pub fn evaluate(&self, inputs: &[f64]) -> Result<Vec<f64>, EvalError> {
        self.exprs.iter().map(|e| e.eval(inputs)).collect()
    }
}
