//! # Symbolic Engine Module
//!
//! The closed expression grammar every stage of the DAE pipeline works on.
//! An expression is built once and never mutated afterwards: substitution,
//! differentiation and simplification all return new trees.
//!
//! ## Main Structures and Methods
//!
//! ### `Expr` Enum
//! - **Variables**: `Var(String)` - symbolic handle of a model variable ("x", "der(x)", "time")
//! - **Constants**: `Const(f64)` - numerical constants
//! - **Binary operations**: `Add`, `Sub`, `Mul`, `Div`, `Pow`
//! - **Function calls**: `Exp`, `Ln`, `sin`, `cos`, `tg`, `arcsin`, `arccos`, `arctg`
//!
//! Unary minus is represented as `Mul(Const(-1), x)`.
//!
//! ### Key Methods
//! - `substitute_variable()` / `substitute_variables()` - replace handles by expressions
//! - `set_variable_from_map()` - replace handles by numbers
//! - `contains_variable()` / `contains_any_variable()` - dependency queries
//! - `all_arguments_are_variables()` - sorted list of referenced handles

#![allow(non_camel_case_types)]

use std::collections::{BTreeSet, HashMap};
use std::f64;
use std::fmt;

/// Core symbolic expression enum representing mathematical expressions as an abstract syntax tree.
///
/// # Examples
/// ```rust, ignore
/// use symbolic_engine::Expr;
/// let x = Expr::Var("x".to_string());
/// let expr = Expr::Add(Box::new(x), Box::new(Expr::Const(2.0)));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Symbolic variable with a name (e.g., "x", "der(x)", "time")
    Var(String),
    /// Numerical constant value
    Const(f64),
    /// Addition operation: left + right
    Add(Box<Expr>, Box<Expr>),
    /// Subtraction operation: left - right
    Sub(Box<Expr>, Box<Expr>),
    /// Multiplication operation: left * right
    Mul(Box<Expr>, Box<Expr>),
    /// Division operation: left / right
    Div(Box<Expr>, Box<Expr>),
    /// Power operation: base ^ exponent
    Pow(Box<Expr>, Box<Expr>),
    /// Exponential function: e^x
    Exp(Box<Expr>),
    /// Natural logarithm: ln(x)
    Ln(Box<Expr>),
    /// Sine function: sin(x)
    sin(Box<Expr>),
    /// Cosine function: cos(x)
    cos(Box<Expr>),
    /// Tangent function: tan(x) - uses mathematical notation 'tg'
    tg(Box<Expr>),
    /// Arcsine function: arcsin(x)
    arcsin(Box<Expr>),
    /// Arccosine function: arccos(x)
    arccos(Box<Expr>),
    /// Arctangent function: arctan(x) - uses mathematical notation 'arctg'
    arctg(Box<Expr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Const(val) => write!(f, "{}", val),
            Expr::Add(lhs, rhs) => write!(f, "({} + {})", lhs, rhs),
            Expr::Sub(lhs, rhs) => write!(f, "({} - {})", lhs, rhs),
            Expr::Mul(lhs, rhs) => write!(f, "({} * {})", lhs, rhs),
            Expr::Div(lhs, rhs) => write!(f, "({} / {})", lhs, rhs),
            Expr::Pow(base, exp) => write!(f, "({} ^ {})", base, exp),
            Expr::Exp(expr) => write!(f, "exp({})", expr),
            Expr::Ln(expr) => write!(f, "ln({})", expr),
            Expr::sin(expr) => write!(f, "sin({})", expr),
            Expr::cos(expr) => write!(f, "cos({})", expr),
            Expr::tg(expr) => write!(f, "tg({})", expr),
            Expr::arcsin(expr) => write!(f, "arcsin({})", expr),
            Expr::arccos(expr) => write!(f, "arccos({})", expr),
            Expr::arctg(expr) => write!(f, "arctg({})", expr),
        }
    }
}

impl std::ops::Add for Expr {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Expr::Add(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Sub for Expr {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Expr::Sub(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Mul for Expr {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Expr::Mul(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Div for Expr {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        Expr::Div(self.boxed(), rhs.boxed())
    }
}

impl std::ops::Neg for Expr {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Expr::Mul(Box::new(Expr::Const(-1.0)), Box::new(self))
    }
}

impl Expr {
    /// BASIC FEATURES

    /// Handle of the derivative of a state, `der(x)`.
    pub fn der(state: &str) -> Expr {
        Expr::Var(derivative_name(state))
    }

    /// Convenience method to wrap expression in Box for recursive structures.
    pub fn boxed(self) -> Box<Self> {
        Box::new(self)
    }

    pub fn exp(self) -> Expr {
        Expr::Exp(self.boxed())
    }

    pub fn ln(self) -> Expr {
        Expr::Ln(self.boxed())
    }

    pub fn pow(self, rhs: Expr) -> Expr {
        Expr::Pow(self.boxed(), rhs.boxed())
    }

    /// Checks if expression is exactly zero (constant 0.0).
    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Const(val) if *val == 0.0)
    }

    pub fn is_one(&self) -> bool {
        matches!(self, Expr::Const(val) if *val == 1.0)
    }

    /// Value of the expression if it is a constant.
    pub fn as_const(&self) -> Option<f64> {
        match self {
            Expr::Const(val) => Some(*val),
            _ => None,
        }
    }

    /// Rebuilds the node with every direct child replaced by `f(child)`.
    ///
    /// Leaves (`Var`, `Const`) are returned unchanged. All structural
    /// rewrites in the crate are expressed through this single traversal.
    pub fn map_args<F: FnMut(&Expr) -> Expr>(&self, mut f: F) -> Expr {
        match self {
            Expr::Var(_) | Expr::Const(_) => self.clone(),
            Expr::Add(lhs, rhs) => Expr::Add(f(lhs.as_ref()).boxed(), f(rhs.as_ref()).boxed()),
            Expr::Sub(lhs, rhs) => Expr::Sub(f(lhs.as_ref()).boxed(), f(rhs.as_ref()).boxed()),
            Expr::Mul(lhs, rhs) => Expr::Mul(f(lhs.as_ref()).boxed(), f(rhs.as_ref()).boxed()),
            Expr::Div(lhs, rhs) => Expr::Div(f(lhs.as_ref()).boxed(), f(rhs.as_ref()).boxed()),
            Expr::Pow(base, exp) => Expr::Pow(f(base.as_ref()).boxed(), f(exp.as_ref()).boxed()),
            Expr::Exp(expr) => Expr::Exp(f(expr.as_ref()).boxed()),
            Expr::Ln(expr) => Expr::Ln(f(expr.as_ref()).boxed()),
            Expr::sin(expr) => Expr::sin(f(expr.as_ref()).boxed()),
            Expr::cos(expr) => Expr::cos(f(expr.as_ref()).boxed()),
            Expr::tg(expr) => Expr::tg(f(expr.as_ref()).boxed()),
            Expr::arcsin(expr) => Expr::arcsin(f(expr.as_ref()).boxed()),
            Expr::arccos(expr) => Expr::arccos(f(expr.as_ref()).boxed()),
            Expr::arctg(expr) => Expr::arctg(f(expr.as_ref()).boxed()),
        }
    }

    /// Direct children of the node, left to right.
    pub fn args(&self) -> Vec<&Expr> {
        match self {
            Expr::Var(_) | Expr::Const(_) => Vec::new(),
            Expr::Add(lhs, rhs)
            | Expr::Sub(lhs, rhs)
            | Expr::Mul(lhs, rhs)
            | Expr::Div(lhs, rhs)
            | Expr::Pow(lhs, rhs) => vec![lhs.as_ref(), rhs.as_ref()],
            Expr::Exp(expr)
            | Expr::Ln(expr)
            | Expr::sin(expr)
            | Expr::cos(expr)
            | Expr::tg(expr)
            | Expr::arcsin(expr)
            | Expr::arccos(expr)
            | Expr::arctg(expr) => vec![expr.as_ref()],
        }
    }

    /// Substitutes multiple variables with constant values using a HashMap.
    /// Only variables present in the map are substituted.
    pub fn set_variable_from_map(&self, var_map: &HashMap<String, f64>) -> Expr {
        match self {
            Expr::Var(name) => match var_map.get(name) {
                Some(value) => Expr::Const(*value),
                None => self.clone(),
            },
            _ => self.map_args(|e| e.set_variable_from_map(var_map)),
        }
    }

    /// substitute a variable with an expression
    pub fn substitute_variable(&self, var: &str, expr: &Expr) -> Expr {
        match self {
            Expr::Var(name) if name == var => expr.clone(),
            _ => self.map_args(|e| e.substitute_variable(var, expr)),
        }
    }

    /// Simultaneous substitution: every handle found in `map` is replaced once,
    /// replacement expressions are not revisited.
    pub fn substitute_variables(&self, map: &HashMap<String, Expr>) -> Expr {
        match self {
            Expr::Var(name) => match map.get(name) {
                Some(replacement) => replacement.clone(),
                None => self.clone(),
            },
            _ => self.map_args(|e| e.substitute_variables(map)),
        }
    }

    /// check if the expression contains a variable
    pub fn contains_variable(&self, var_name: &str) -> bool {
        match self {
            Expr::Var(name) => name == var_name,
            Expr::Const(_) => false,
            _ => self.args().iter().any(|e| e.contains_variable(var_name)),
        }
    }

    /// check if the expression contains at least one of the given variables
    pub fn contains_any_variable<S: AsRef<str>>(&self, vars: &[S]) -> bool {
        match self {
            Expr::Var(name) => vars.iter().any(|v| v.as_ref() == name),
            Expr::Const(_) => false,
            _ => self.args().iter().any(|e| e.contains_any_variable(vars)),
        }
    }

    /// Collects the names of all referenced handles into `acc`.
    pub fn collect_variables(&self, acc: &mut BTreeSet<String>) {
        match self {
            Expr::Var(name) => {
                acc.insert(name.clone());
            }
            Expr::Const(_) => {}
            _ => {
                for arg in self.args() {
                    arg.collect_variables(acc);
                }
            }
        }
    }

    /// Sorted, deduplicated names of every variable in the expression.
    pub fn all_arguments_are_variables(&self) -> Vec<String> {
        let mut acc = BTreeSet::new();
        self.collect_variables(&mut acc);
        acc.into_iter().collect()
    }
}

/// Name of the derivative handle of a state.
pub fn derivative_name(state: &str) -> String {
    format!("der({})", state)
}

/// Inverse of [`derivative_name`]: `der(x)` -> `Some("x")`.
pub fn derivative_target(name: &str) -> Option<&str> {
    name.strip_prefix("der(")
        .and_then(|rest| rest.strip_suffix(')'))
        .filter(|inner| !inner.is_empty())
}
