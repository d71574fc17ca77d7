//! The compiler's own expression tree, as consumed by code generators.

use crate::utils::errors::EvalError;
use crate::utils::pretty::CodeFormatter;
use num_integer::Integer;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "==",
        }
    }

    fn holds(self, l: i64, r: i64) -> bool {
        match self {
            CmpOp::Lt => l < r,
            CmpOp::Le => l <= r,
            CmpOp::Gt => l > r,
            CmpOp::Ge => l >= r,
            CmpOp::Eq => l == r,
        }
    }
}

/// Iteration range of a loop.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LoopRange {
    /// `extent` iterations starting at `min`
    Finite { min: Box<Expr>, extent: Box<Expr> },
    /// Starts at `min` and never ends
    Unbounded { min: Box<Expr> },
}

impl LoopRange {
    pub fn min(&self) -> &Expr {
        match self {
            LoopRange::Finite { min, .. } | LoopRange::Unbounded { min } => min,
        }
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, LoopRange::Finite { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    IntImm(i64),
    Var(String),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    /// Division rounding toward zero, as in C.
    Div(Box<Expr>, Box<Expr>),
    /// Division rounding toward negative infinity.
    FloorDiv(Box<Expr>, Box<Expr>),
    Min(Box<Expr>, Box<Expr>),
    Max(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Block(Vec<Expr>),
    For { var: String, range: LoopRange, stride: i64, body: Box<Expr> },
    IfThenElse { cond: Box<Expr>, then_case: Box<Expr>, else_case: Option<Box<Expr>> },
    /// A stage instance.
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    pub fn var(name: &str) -> Self {
        Expr::Var(name.to_string())
    }

    pub fn is_stmt(&self) -> bool {
        matches!(self, Expr::Block(_) | Expr::For { .. } | Expr::IfThenElse { .. } | Expr::Call { .. })
    }

    /// Integer value of a scalar expression.
    pub fn eval(&self, env: &HashMap<String, i64>) -> Result<i64, EvalError> {
        let bin = |a: &Expr, b: &Expr| -> Result<(i64, i64), EvalError> { Ok((a.eval(env)?, b.eval(env)?)) };
        let checked = |v: Option<i64>| v.ok_or(EvalError::Overflow);
        Ok(match self {
            Expr::IntImm(v) => *v,
            Expr::Var(name) => *env.get(name).ok_or_else(|| EvalError::Unbound(name.clone()))?,
            Expr::Neg(e) => checked(e.eval(env)?.checked_neg())?,
            Expr::Add(a, b) => bin(a, b).and_then(|(a, b)| checked(a.checked_add(b)))?,
            Expr::Sub(a, b) => bin(a, b).and_then(|(a, b)| checked(a.checked_sub(b)))?,
            Expr::Mul(a, b) => bin(a, b).and_then(|(a, b)| checked(a.checked_mul(b)))?,
            Expr::Div(a, b) | Expr::FloorDiv(a, b) => {
                let (a, b) = bin(a, b)?;
                if b == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                if a == i64::MIN && b == -1 {
                    return Err(EvalError::Overflow);
                }
                match self {
                    Expr::Div(..) => a / b,
                    _ => Integer::div_floor(&a, &b),
                }
            }
            Expr::Min(a, b) => bin(a, b).map(|(a, b)| a.min(b))?,
            Expr::Max(a, b) => bin(a, b).map(|(a, b)| a.max(b))?,
            Expr::Cmp(op, a, b) => bin(a, b).map(|(a, b)| op.holds(a, b) as i64)?,
            Expr::And(a, b) => bin(a, b).map(|(a, b)| (a != 0 && b != 0) as i64)?,
            Expr::Or(a, b) => bin(a, b).map(|(a, b)| (a != 0 || b != 0) as i64)?,
            Expr::Block(_) | Expr::For { .. } | Expr::IfThenElse { .. } | Expr::Call { .. } => {
                return Err(EvalError::NotInteger(self.to_string().trim_end().to_string()));
            }
        })
    }

    /// Execute a statement tree, recording every call with its evaluated
    /// arguments.
    pub fn run(&self, env: &mut HashMap<String, i64>, trace: &mut Vec<(String, Vec<i64>)>) -> Result<(), EvalError> {
        match self {
            Expr::Block(stmts) => {
                for s in stmts {
                    s.run(env, trace)?;
                }
            }
            Expr::For { var, range, stride, body } => {
                let LoopRange::Finite { min, extent } = range else {
                    return Err(EvalError::Unbounded(var.clone()));
                };
                let start = min.eval(env)?;
                let end = start.checked_add(extent.eval(env)?).ok_or(EvalError::Overflow)?;
                let shadowed = env.get(var).copied();
                let mut v = start;
                while v < end {
                    env.insert(var.clone(), v);
                    body.run(env, trace)?;
                    match v.checked_add((*stride).max(1)) {
                        Some(next) => v = next,
                        None => break,
                    }
                }
                match shadowed {
                    Some(old) => env.insert(var.clone(), old),
                    None => env.remove(var),
                };
            }
            Expr::IfThenElse { cond, then_case, else_case } => {
                if cond.eval(env)? != 0 {
                    then_case.run(env, trace)?;
                } else if let Some(e) = else_case {
                    e.run(env, trace)?;
                }
            }
            Expr::Call { name, args } => {
                let values = args.iter().map(|a| a.eval(env)).collect::<Result<Vec<_>, _>>()?;
                trace.push((name.clone(), values));
            }
            scalar => {
                scalar.eval(env)?;
            }
        }
        Ok(())
    }

    fn render_into(&self, fmt: &mut CodeFormatter) {
        match self {
            Expr::Block(stmts) => stmts.iter().for_each(|s| s.render_into(fmt)),
            Expr::For { var, range, stride, body } => {
                let header = match range {
                    LoopRange::Finite { min, extent } => {
                        format!("for ({}, {}, {}) step {}", var, min, extent, stride)
                    }
                    LoopRange::Unbounded { min } => format!("for ({}, {}, inf) step {}", var, min, stride),
                };
                fmt.block(&header, |fmt| body.render_into(fmt));
            }
            Expr::IfThenElse { cond, then_case, else_case } => {
                fmt.block(&format!("if ({})", cond), |fmt| then_case.render_into(fmt));
                if let Some(e) = else_case {
                    fmt.block("else", |fmt| e.render_into(fmt));
                }
            }
            Expr::Call { name, args } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                fmt.writeln(&format!("{}({})", name, args.join(", ")));
            }
            scalar => fmt.writeln(&scalar.to_string()),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::IntImm(v) => write!(f, "{}", v),
            Expr::Var(name) => write!(f, "{}", name),
            Expr::Neg(e) => write!(f, "(-{})", e),
            Expr::Add(a, b) => write!(f, "({} + {})", a, b),
            Expr::Sub(a, b) => write!(f, "({} - {})", a, b),
            Expr::Mul(a, b) => write!(f, "({} * {})", a, b),
            Expr::Div(a, b) => write!(f, "({} / {})", a, b),
            Expr::FloorDiv(a, b) => write!(f, "floor_div({}, {})", a, b),
            Expr::Min(a, b) => write!(f, "min({}, {})", a, b),
            Expr::Max(a, b) => write!(f, "max({}, {})", a, b),
            Expr::Cmp(op, a, b) => write!(f, "({} {} {})", a, op.symbol(), b),
            Expr::And(a, b) => write!(f, "({} && {})", a, b),
            Expr::Or(a, b) => write!(f, "({} || {})", a, b),
            stmt => {
                let mut fmt = CodeFormatter::default_indent();
                stmt.render_into(&mut fmt);
                f.write_str(&fmt.finish())
            }
        }
    }
}
