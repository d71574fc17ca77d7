//! Generated loop-nest AST.

use crate::utils::errors::EvalError;
use crate::utils::pretty::CodeFormatter;
use num_integer::Integer;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Where a loop comes from: its timestamp level and the stage axes it scans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoopOrigin {
    pub level: usize,
    /// `(stage, axis)` pairs placed at this level.
    pub axes: Vec<(String, String)>,
}

/// A node in the generated AST.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AstNode {
    /// A sequence of nodes
    Block { statements: Vec<AstNode> },
    /// `for (iterator = lower; iterator <= upper; iterator += stride)`;
    /// no upper bound means the loop is unbounded.
    For {
        iterator: String,
        lower: AstExpr,
        upper: Option<AstExpr>,
        stride: i64,
        body: Vec<AstNode>,
        origin: LoopOrigin,
    },
    /// A guarded body
    If { condition: AstExpr, then_body: Vec<AstNode> },
    /// One instance of a stage, with its original axes as arguments
    Stmt { stage: String, args: Vec<AstExpr> },
}

impl AstNode {
    pub fn block(statements: Vec<AstNode>) -> Self {
        Self::Block { statements }
    }

    /// Whether a leaf of `stage` appears anywhere under this node.
    pub fn contains_stmt(&self, stage: &str) -> bool {
        self.find_stmt(stage).is_some()
    }

    /// Arguments of the first leaf of `stage` in pre-order.
    pub fn find_stmt(&self, stage: &str) -> Option<&[AstExpr]> {
        match self {
            AstNode::Stmt { stage: s, args } if s == stage => Some(args),
            AstNode::Stmt { .. } => None,
            AstNode::Block { statements: body } | AstNode::For { body, .. } | AstNode::If { then_body: body, .. } => {
                body.iter().find_map(|n| n.find_stmt(stage))
            }
        }
    }

    /// Number of `For` nodes.
    pub fn loop_count(&self) -> usize {
        match self {
            AstNode::Stmt { .. } => 0,
            AstNode::For { body, .. } => 1 + body.iter().map(AstNode::loop_count).sum::<usize>(),
            AstNode::Block { statements: body } | AstNode::If { then_body: body, .. } => {
                body.iter().map(AstNode::loop_count).sum()
            }
        }
    }

    /// Loops scanning `axis` of `stage`.
    pub fn loops_for_axis(&self, stage: &str, axis: &str) -> Vec<&AstNode> {
        let mut found = Vec::new();
        self.collect_loops(stage, axis, &mut found);
        found
    }

    fn collect_loops<'a>(&'a self, stage: &str, axis: &str, found: &mut Vec<&'a AstNode>) {
        match self {
            AstNode::Stmt { .. } => {}
            AstNode::For { body, origin, .. } => {
                if origin.axes.iter().any(|(s, a)| s == stage && a == axis) {
                    found.push(self);
                }
                body.iter().for_each(|n| n.collect_loops(stage, axis, found));
            }
            AstNode::Block { statements: body } | AstNode::If { then_body: body, .. } => {
                body.iter().for_each(|n| n.collect_loops(stage, axis, found));
            }
        }
    }

    /// Execute the AST for concrete parameter values and list the statement
    /// instances in execution order.
    pub fn instances(&self, params: &HashMap<String, i64>) -> Result<Vec<(String, Vec<i64>)>, EvalError> {
        let mut env = params.clone();
        let mut out = Vec::new();
        self.run(&mut env, &mut out)?;
        Ok(out)
    }

    fn run(&self, env: &mut HashMap<String, i64>, out: &mut Vec<(String, Vec<i64>)>) -> Result<(), EvalError> {
        match self {
            AstNode::Block { statements } => {
                for n in statements {
                    n.run(env, out)?;
                }
            }
            AstNode::For { iterator, lower, upper, stride, body, .. } => {
                let upper = upper.as_ref().ok_or_else(|| EvalError::Unbounded(iterator.clone()))?;
                let (lo, hi) = (lower.eval(env)?, upper.eval(env)?);
                let shadowed = env.get(iterator).copied();
                let mut v = lo;
                while v <= hi {
                    env.insert(iterator.clone(), v);
                    for n in body {
                        n.run(env, out)?;
                    }
                    match v.checked_add((*stride).max(1)) {
                        Some(next) => v = next,
                        None => break,
                    }
                }
                match shadowed {
                    Some(old) => env.insert(iterator.clone(), old),
                    None => env.remove(iterator),
                };
            }
            AstNode::If { condition, then_body } => {
                if condition.eval(env)? != 0 {
                    for n in then_body {
                        n.run(env, out)?;
                    }
                }
            }
            AstNode::Stmt { stage, args } => {
                let values = args.iter().map(|a| a.eval(env)).collect::<Result<Vec<_>, _>>()?;
                out.push((stage.clone(), values));
            }
        }
        Ok(())
    }

    fn render_into(&self, fmt: &mut CodeFormatter) {
        match self {
            AstNode::Block { statements } => {
                for n in statements {
                    n.render_into(fmt);
                }
            }
            AstNode::For { iterator, lower, upper, stride, body, .. } => {
                let cond = upper.as_ref().map(|u| format!("{} <= {}", iterator, u)).unwrap_or_default();
                let header = format!("for ({} = {}; {}; {} += {})", iterator, lower, cond, iterator, stride);
                fmt.block(&header, |fmt| body.iter().for_each(|n| n.render_into(fmt)));
            }
            AstNode::If { condition, then_body } => {
                fmt.block(&format!("if ({})", condition), |fmt| then_body.iter().for_each(|n| n.render_into(fmt)));
            }
            AstNode::Stmt { stage, args } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                fmt.writeln(&format!("{}({});", stage, args.join(", ")));
            }
        }
    }

    pub fn render(&self) -> String {
        let mut fmt = CodeFormatter::default_indent();
        self.render_into(&mut fmt);
        fmt.finish()
    }
}

impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AstBinOp {
    Add,
    Sub,
    Mul,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    And,
    Or,
}

impl AstBinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AstBinOp::Add => "+",
            AstBinOp::Sub => "-",
            AstBinOp::Mul => "*",
            AstBinOp::Lt => "<",
            AstBinOp::Le => "<=",
            AstBinOp::Gt => ">",
            AstBinOp::Ge => ">=",
            AstBinOp::Eq => "==",
            AstBinOp::And => "&&",
            AstBinOp::Or => "||",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(self, AstBinOp::Lt | AstBinOp::Le | AstBinOp::Gt | AstBinOp::Ge | AstBinOp::Eq)
    }

    fn precedence(self) -> u8 {
        match self {
            AstBinOp::Or => 1,
            AstBinOp::And => 2,
            AstBinOp::Lt | AstBinOp::Le | AstBinOp::Gt | AstBinOp::Ge | AstBinOp::Eq => 3,
            AstBinOp::Add | AstBinOp::Sub => 4,
            AstBinOp::Mul => 5,
        }
    }
}

/// An expression in the generated AST.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AstExpr {
    /// Integer constant
    Int(i64),
    /// Loop iterator or parameter
    Var(String),
    /// Negation
    Neg(Box<AstExpr>),
    /// Binary operation
    Binary { op: AstBinOp, left: Box<AstExpr>, right: Box<AstExpr> },
    /// Minimum
    Min(Box<AstExpr>, Box<AstExpr>),
    /// Maximum
    Max(Box<AstExpr>, Box<AstExpr>),
    /// Floor division
    FloorDiv(Box<AstExpr>, Box<AstExpr>),
    /// Ceiling division
    CeilDiv(Box<AstExpr>, Box<AstExpr>),
}

impl AstExpr {
    pub fn int(v: i64) -> Self {
        Self::Int(v)
    }

    pub fn var(name: &str) -> Self {
        Self::Var(name.to_string())
    }

    pub fn binary(op: AstBinOp, left: Self, right: Self) -> Self {
        Self::Binary { op, left: Box::new(left), right: Box::new(right) }
    }

    pub fn add(self, other: Self) -> Self {
        Self::binary(AstBinOp::Add, self, other)
    }

    pub fn sub(self, other: Self) -> Self {
        Self::binary(AstBinOp::Sub, self, other)
    }

    pub fn mul(self, other: Self) -> Self {
        Self::binary(AstBinOp::Mul, self, other)
    }

    pub fn neg(self) -> Self {
        Self::Neg(Box::new(self))
    }

    pub fn ge(self, other: Self) -> Self {
        Self::binary(AstBinOp::Ge, self, other)
    }

    pub fn le(self, other: Self) -> Self {
        Self::binary(AstBinOp::Le, self, other)
    }

    pub fn equals(self, other: Self) -> Self {
        Self::binary(AstBinOp::Eq, self, other)
    }

    pub fn and(self, other: Self) -> Self {
        Self::binary(AstBinOp::And, self, other)
    }

    pub fn min(self, other: Self) -> Self {
        Self::Min(Box::new(self), Box::new(other))
    }

    pub fn max(self, other: Self) -> Self {
        Self::Max(Box::new(self), Box::new(other))
    }

    pub fn floor_div(self, other: Self) -> Self {
        Self::FloorDiv(Box::new(self), Box::new(other))
    }

    pub fn ceil_div(self, other: Self) -> Self {
        Self::CeilDiv(Box::new(self), Box::new(other))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AstExpr::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Replace variables by expressions.
    pub fn substitute(&self, bindings: &HashMap<String, AstExpr>) -> AstExpr {
        let sub = |e: &AstExpr| Box::new(e.substitute(bindings));
        match self {
            AstExpr::Int(_) => self.clone(),
            AstExpr::Var(name) => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            AstExpr::Neg(e) => AstExpr::Neg(sub(e)),
            AstExpr::Binary { op, left, right } => AstExpr::Binary { op: *op, left: sub(left), right: sub(right) },
            AstExpr::Min(a, b) => AstExpr::Min(sub(a), sub(b)),
            AstExpr::Max(a, b) => AstExpr::Max(sub(a), sub(b)),
            AstExpr::FloorDiv(a, b) => AstExpr::FloorDiv(sub(a), sub(b)),
            AstExpr::CeilDiv(a, b) => AstExpr::CeilDiv(sub(a), sub(b)),
        }
    }

    /// Evaluate with floor semantics for both divisions. Comparisons and
    /// logical operators yield 1 or 0.
    pub fn eval(&self, env: &HashMap<String, i64>) -> Result<i64, EvalError> {
        Ok(match self {
            AstExpr::Int(v) => *v,
            AstExpr::Var(name) => *env.get(name).ok_or_else(|| EvalError::Unbound(name.clone()))?,
            AstExpr::Neg(e) => e.eval(env)?.checked_neg().ok_or(EvalError::Overflow)?,
            AstExpr::Binary { op, left, right } => {
                let (l, r) = (left.eval(env)?, right.eval(env)?);
                let checked = |v: Option<i64>| v.ok_or(EvalError::Overflow);
                match op {
                    AstBinOp::Add => checked(l.checked_add(r))?,
                    AstBinOp::Sub => checked(l.checked_sub(r))?,
                    AstBinOp::Mul => checked(l.checked_mul(r))?,
                    AstBinOp::Lt => (l < r) as i64,
                    AstBinOp::Le => (l <= r) as i64,
                    AstBinOp::Gt => (l > r) as i64,
                    AstBinOp::Ge => (l >= r) as i64,
                    AstBinOp::Eq => (l == r) as i64,
                    AstBinOp::And => (l != 0 && r != 0) as i64,
                    AstBinOp::Or => (l != 0 || r != 0) as i64,
                }
            }
            AstExpr::Min(a, b) => a.eval(env)?.min(b.eval(env)?),
            AstExpr::Max(a, b) => a.eval(env)?.max(b.eval(env)?),
            AstExpr::FloorDiv(a, b) => floor_div(a.eval(env)?, b.eval(env)?)?,
            AstExpr::CeilDiv(a, b) => ceil_div(a.eval(env)?, b.eval(env)?)?,
        })
    }

    /// Canonical form: affine parts are collected into sorted sums, constant
    /// subexpressions are folded and comparisons are moved to the
    /// `terms >= terms` shape. Equal affine values simplify to equal trees.
    /// A part whose folding would overflow is left as written.
    pub fn simplify(&self) -> AstExpr {
        match self {
            AstExpr::Binary { op, left, right } if op.is_comparison() => simplify_comparison(*op, left, right),
            AstExpr::Binary { op, left, right } if matches!(op, AstBinOp::And | AstBinOp::Or) => {
                let (l, r) = (left.simplify(), right.simplify());
                let absorbing = (*op == AstBinOp::Or) as i64;
                match (l.as_int(), r.as_int()) {
                    (Some(a), _) if (a != 0) as i64 == absorbing => AstExpr::Int(absorbing),
                    (_, Some(b)) if (b != 0) as i64 == absorbing => AstExpr::Int(absorbing),
                    (Some(_), _) => r,
                    (_, Some(_)) => l,
                    _ if l == r => l,
                    _ => AstExpr::binary(*op, l, r),
                }
            }
            AstExpr::Min(a, b) | AstExpr::Max(a, b) => {
                let is_min = matches!(self, AstExpr::Min(..));
                let (a, b) = (a.simplify(), b.simplify());
                let diff = Linear::of(&a).zip(Linear::of(&b)).and_then(|(x, y)| x.add(y, -1));
                match diff.as_ref().and_then(Linear::as_constant) {
                    Some(d) if (d <= 0) == is_min => a,
                    Some(_) => b,
                    None if is_min => a.min(b),
                    None => a.max(b),
                }
            }
            AstExpr::FloorDiv(a, b) | AstExpr::CeilDiv(a, b) => {
                let is_floor = matches!(self, AstExpr::FloorDiv(..));
                let (a, b) = (a.simplify(), b.simplify());
                let folded = match (a.as_int(), b.as_int()) {
                    (_, Some(1)) => return a,
                    (Some(x), Some(y)) if is_floor => floor_div(x, y).ok(),
                    (Some(x), Some(y)) => ceil_div(x, y).ok(),
                    _ => None,
                };
                match folded {
                    Some(q) => AstExpr::Int(q),
                    None if is_floor => a.floor_div(b),
                    None => a.ceil_div(b),
                }
            }
            _ => Linear::of(self).map(|l| l.rebuild()).unwrap_or_else(|| self.clone()),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            AstExpr::Binary { op, .. } => op.precedence(),
            AstExpr::Neg(_) => 6,
            AstExpr::Int(v) if *v < 0 => 6,
            _ => 7,
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, min_prec: u8) -> fmt::Result {
        let wrap = self.precedence() < min_prec;
        if wrap {
            write!(f, "(")?;
        }
        match self {
            AstExpr::Int(v) => write!(f, "{}", v)?,
            AstExpr::Var(name) => write!(f, "{}", name)?,
            AstExpr::Neg(e) => {
                write!(f, "-")?;
                e.fmt_prec(f, 7)?;
            }
            AstExpr::Binary { op, left, right } => {
                let p = op.precedence();
                left.fmt_prec(f, p)?;
                write!(f, " {} ", op.symbol())?;
                right.fmt_prec(f, p + 1)?;
            }
            AstExpr::Min(a, b) => write!(f, "min({}, {})", a, b)?,
            AstExpr::Max(a, b) => write!(f, "max({}, {})", a, b)?,
            AstExpr::FloorDiv(a, b) => write!(f, "floord({}, {})", a, b)?,
            AstExpr::CeilDiv(a, b) => write!(f, "ceild({}, {})", a, b)?,
        }
        if wrap {
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl fmt::Display for AstExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

fn floor_div(a: i64, b: i64) -> Result<i64, EvalError> {
    if b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    if a == i64::MIN && b == -1 {
        return Err(EvalError::Overflow);
    }
    Ok(Integer::div_floor(&a, &b))
}

fn ceil_div(a: i64, b: i64) -> Result<i64, EvalError> {
    let q = floor_div(a.checked_neg().ok_or(EvalError::Overflow)?, b)?;
    q.checked_neg().ok_or(EvalError::Overflow)
}

/// A checked result, with `i64::MIN` also rejected so that every
/// coefficient of a [`Linear`] can be negated.
fn negatable(v: Option<i64>) -> Option<i64> {
    v.filter(|&v| v != i64::MIN)
}

/// `sum(coeff * atom) + constant`, atoms keyed by their rendering.
#[derive(Debug, Clone, Default)]
struct Linear {
    terms: BTreeMap<String, (AstExpr, i64)>,
    constant: i64,
}

impl Linear {
    fn constant(value: i64) -> Self {
        Self { terms: BTreeMap::new(), constant: value }
    }

    fn atom(expr: AstExpr) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(expr.to_string(), (expr, 1));
        Self { terms, constant: 0 }
    }

    /// `None` if folding overflows.
    fn of(expr: &AstExpr) -> Option<Self> {
        Some(match expr {
            AstExpr::Int(v) => Self::constant(negatable(Some(*v))?),
            AstExpr::Var(_) => Self::atom(expr.clone()),
            AstExpr::Neg(e) => Self::of(e)?.scale(-1)?,
            AstExpr::Binary { op: AstBinOp::Add, left, right } => Self::of(left)?.add(Self::of(right)?, 1)?,
            AstExpr::Binary { op: AstBinOp::Sub, left, right } => Self::of(left)?.add(Self::of(right)?, -1)?,
            AstExpr::Binary { op: AstBinOp::Mul, left, right } => {
                let (l, r) = (Self::of(left)?, Self::of(right)?);
                match (l.as_constant(), r.as_constant()) {
                    (Some(k), _) => r.scale(k)?,
                    (_, Some(k)) => l.scale(k)?,
                    _ => Self::atom(l.rebuild().mul(r.rebuild())),
                }
            }
            _ => {
                let s = expr.simplify();
                match s.as_int() {
                    Some(v) => Self::constant(negatable(Some(v))?),
                    None => Self::atom(s),
                }
            }
        })
    }

    fn add(mut self, other: Linear, sign: i64) -> Option<Self> {
        self.constant = negatable(self.constant.checked_add(other.constant.checked_mul(sign)?))?;
        for (key, (atom, c)) in other.terms {
            let slot = &mut self.terms.entry(key).or_insert((atom, 0)).1;
            *slot = negatable(slot.checked_add(c.checked_mul(sign)?))?;
        }
        self.terms.retain(|_, (_, c)| *c != 0);
        Some(self)
    }

    fn scale(mut self, k: i64) -> Option<Self> {
        self.constant = negatable(self.constant.checked_mul(k))?;
        for (_, c) in self.terms.values_mut() {
            *c = negatable(c.checked_mul(k))?;
        }
        self.terms.retain(|_, (_, c)| *c != 0);
        Some(self)
    }

    fn as_constant(&self) -> Option<i64> {
        if self.terms.is_empty() { Some(self.constant) } else { None }
    }

    fn leading_sign(&self) -> i64 {
        self.terms.values().map(|(_, c)| c.signum()).max().unwrap_or(0)
    }

    /// Split into (positive terms, negated negative terms), both constant-free.
    fn split(&self) -> (Linear, Linear) {
        let mut pos = Linear::default();
        let mut neg = Linear::default();
        for (key, (atom, c)) in &self.terms {
            if *c > 0 {
                pos.terms.insert(key.clone(), (atom.clone(), *c));
            } else {
                neg.terms.insert(key.clone(), (atom.clone(), -c));
            }
        }
        (pos, neg)
    }

    fn rebuild(&self) -> AstExpr {
        let term = |atom: &AstExpr, c: i64| match c {
            1 => atom.clone(),
            -1 => atom.clone().neg(),
            _ => AstExpr::Int(c).mul(atom.clone()),
        };
        let positive = self.terms.values().filter(|(_, c)| *c > 0);
        let negative = self.terms.values().filter(|(_, c)| *c < 0);
        let mut acc: Option<AstExpr> = None;
        for (atom, c) in positive.chain(negative) {
            acc = Some(match acc {
                None => term(atom, *c),
                Some(e) if *c < 0 => e.sub(term(atom, -c)),
                Some(e) => e.add(term(atom, *c)),
            });
        }
        match acc {
            None => AstExpr::Int(self.constant),
            Some(e) if self.constant > 0 => e.add(AstExpr::Int(self.constant)),
            Some(e) if self.constant < 0 => e.sub(AstExpr::Int(-self.constant)),
            Some(e) => e,
        }
    }
}

fn simplify_comparison(op: AstBinOp, left: &AstExpr, right: &AstExpr) -> AstExpr {
    comparison_form(op, left, right).unwrap_or_else(|| AstExpr::binary(op, left.simplify(), right.simplify()))
}

fn comparison_form(op: AstBinOp, left: &AstExpr, right: &AstExpr) -> Option<AstExpr> {
    let diff = Linear::of(left)?.add(Linear::of(right)?, -1)?;
    // Bring every inequality to `d >= 0` over the integers.
    let (d, is_eq) = match op {
        AstBinOp::Ge => (diff, false),
        AstBinOp::Gt => (diff.add(Linear::constant(1), -1)?, false),
        AstBinOp::Le => (diff.scale(-1)?, false),
        AstBinOp::Lt => (diff.scale(-1)?.add(Linear::constant(1), -1)?, false),
        _ => (diff, true),
    };
    if let Some(v) = d.as_constant() {
        let holds = if is_eq { v == 0 } else { v >= 0 };
        return Some(AstExpr::Int(holds as i64));
    }
    let d = if is_eq && d.leading_sign() < 0 { d.scale(-1)? } else { d };
    let (pos, mut neg) = d.split();
    if pos.terms.is_empty() {
        // k - neg >= 0  is  neg <= k
        return Some(neg.rebuild().le(AstExpr::Int(d.constant)));
    }
    neg.constant = -d.constant;
    if is_eq {
        return Some(pos.rebuild().equals(neg.rebuild()));
    }
    Some(pos.rebuild().ge(neg.rebuild()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(name: &str) -> AstExpr {
        AstExpr::var(name)
    }

    #[test]
    fn test_simplify_is_canonical() {
        let a = v("N").sub(AstExpr::int(1)).add(v("c0")).sub(v("c0"));
        let b = AstExpr::int(-1).add(v("N"));
        assert_eq!(a.simplify(), b.simplify());
        assert_eq!(a.simplify().to_string(), "N - 1");

        let neg = AstExpr::int(3).sub(v("i").mul(AstExpr::int(2)));
        assert_eq!(neg.simplify().to_string(), "-2 * i + 3");
    }

    #[test]
    fn test_fold_constants() {
        assert_eq!(AstExpr::int(-7).floor_div(AstExpr::int(2)).simplify(), AstExpr::Int(-4));
        assert_eq!(AstExpr::int(-7).ceil_div(AstExpr::int(2)).simplify(), AstExpr::Int(-3));
        assert_eq!(AstExpr::int(3).min(AstExpr::int(5)).simplify(), AstExpr::Int(3));
        assert_eq!(v("N").max(v("N").add(AstExpr::int(2))).simplify().to_string(), "N + 2");
        assert_eq!(v("i").ge(v("i")).simplify(), AstExpr::Int(1));
        assert_eq!(AstExpr::int(0).and(v("i").ge(AstExpr::int(1))).simplify(), AstExpr::Int(0));
    }

    #[test]
    fn test_comparison_shape() {
        let c = AstExpr::int(0).le(v("N").sub(AstExpr::int(1))).simplify();
        assert_eq!(c.to_string(), "N >= 1");
        let c = v("c0").le(AstExpr::int(3)).simplify();
        assert_eq!(c.to_string(), "c0 <= 3");
    }

    #[test]
    fn test_eval_floor_semantics() {
        let env: HashMap<String, i64> = [("a".to_string(), -7)].into_iter().collect();
        assert_eq!(v("a").floor_div(AstExpr::int(2)).eval(&env), Ok(-4));
        assert_eq!(v("a").ceil_div(AstExpr::int(2)).eval(&env), Ok(-3));
        assert_eq!(v("a").floor_div(AstExpr::int(0)).eval(&env), Err(EvalError::DivisionByZero));
        assert_eq!(v("b").eval(&env), Err(EvalError::Unbound("b".into())));
    }

    #[test]
    fn test_overflow_is_reported() {
        let env = HashMap::new();
        let max = AstExpr::int(i64::MAX);
        assert_eq!(max.clone().add(AstExpr::int(1)).eval(&env), Err(EvalError::Overflow));
        assert_eq!(max.clone().mul(AstExpr::int(2)).eval(&env), Err(EvalError::Overflow));
        assert_eq!(AstExpr::int(i64::MIN).neg().eval(&env), Err(EvalError::Overflow));
        assert_eq!(AstExpr::int(i64::MIN).floor_div(AstExpr::int(-1)).eval(&env), Err(EvalError::Overflow));

        // Folding stops where it would overflow; the expression is kept.
        let sum = max.clone().add(AstExpr::int(1));
        assert_eq!(sum.simplify(), sum);
        assert_eq!(max.clone().ge(v("N").sub(max.clone())).simplify().to_string(), format!("{} >= N - {}", i64::MAX, i64::MAX));
        assert_eq!(AstExpr::int(i64::MIN).ceil_div(AstExpr::int(2)).simplify().as_int(), None);

        // A loop ending at i64::MAX stops instead of stepping past it.
        let lp = AstNode::For {
            iterator: "c0".into(),
            lower: AstExpr::int(i64::MAX - 1),
            upper: Some(max),
            stride: 1,
            body: vec![AstNode::Stmt { stage: "S".into(), args: vec![v("c0")] }],
            origin: LoopOrigin { level: 0, axes: vec![] },
        };
        let points: Vec<i64> = lp.instances(&env).unwrap().into_iter().map(|(_, p)| p[0]).collect();
        assert_eq!(points, vec![i64::MAX - 1, i64::MAX]);
    }

    #[test]
    fn test_display_precedence() {
        let e = v("a").sub(v("b").add(v("c"))).mul(AstExpr::int(2));
        assert_eq!(e.to_string(), "(a - (b + c)) * 2");
        assert_eq!(v("a").add(v("b")).neg().to_string(), "-(a + b)");
    }

    #[test]
    fn test_instances_and_render() {
        let ast = AstNode::block(vec![AstNode::For {
            iterator: "c0".into(),
            lower: AstExpr::int(0),
            upper: Some(v("N").sub(AstExpr::int(1))),
            stride: 1,
            body: vec![AstNode::If {
                condition: v("c0").ge(AstExpr::int(1)),
                then_body: vec![AstNode::Stmt { stage: "S".into(), args: vec![v("c0")] }],
            }],
            origin: LoopOrigin { level: 0, axes: vec![("S".into(), "i".into())] },
        }]);
        let params: HashMap<String, i64> = [("N".to_string(), 3)].into_iter().collect();
        let inst = ast.instances(&params).unwrap();
        assert_eq!(inst, vec![("S".to_string(), vec![1]), ("S".to_string(), vec![2])]);
        assert!(ast.contains_stmt("S"));
        assert!(!ast.contains_stmt("T"));
        assert_eq!(ast.loop_count(), 1);
        assert_eq!(ast.loops_for_axis("S", "i").len(), 1);
        assert_eq!(
            ast.render(),
            "for (c0 = 0; c0 <= N - 1; c0 += 1) {\n  if (c0 >= 1) {\n    S(c0);\n  }\n}\n"
        );
    }
}
