//! Conversion of generated ASTs into [`Expr`] trees.

use crate::bridge::expr::{CmpOp, Expr, LoopRange};
use crate::codegen::ast::{AstBinOp, AstExpr, AstNode};
use std::collections::HashMap;

/// Converts AST nodes and expressions, optionally replacing some
/// parameters by constants.
#[derive(Debug, Clone, Default)]
pub struct ExprBridge {
    constants: HashMap<String, i64>,
}

fn b(e: Expr) -> Box<Expr> {
    Box::new(e)
}

impl ExprBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_constants(constants: impl IntoIterator<Item = (String, i64)>) -> Self {
        Self { constants: constants.into_iter().collect() }
    }

    pub fn convert_node(&self, node: &AstNode) -> Expr {
        match node {
            AstNode::Block { statements } => Expr::Block(statements.iter().map(|n| self.convert_node(n)).collect()),
            AstNode::For { iterator, lower, upper, stride, body, .. } => {
                let min = b(self.convert_expr(lower));
                let range = match upper {
                    Some(upper) => {
                        let extent = upper.clone().sub(lower.clone()).add(AstExpr::Int(1)).simplify();
                        LoopRange::Finite { min, extent: b(self.convert_expr(&extent)) }
                    }
                    None => LoopRange::Unbounded { min },
                };
                Expr::For { var: iterator.clone(), range, stride: *stride, body: b(self.convert_body(body)) }
            }
            AstNode::If { condition, then_body } => Expr::IfThenElse {
                cond: b(self.convert_expr(condition)),
                then_case: b(self.convert_body(then_body)),
                else_case: None,
            },
            AstNode::Stmt { stage, args } => Expr::Call {
                name: stage.clone(),
                args: args.iter().map(|a| self.convert_expr(a)).collect(),
            },
        }
    }

    fn convert_body(&self, body: &[AstNode]) -> Expr {
        match body {
            [single] => self.convert_node(single),
            _ => Expr::Block(body.iter().map(|n| self.convert_node(n)).collect()),
        }
    }

    pub fn convert_expr(&self, expr: &AstExpr) -> Expr {
        let conv = |e: &AstExpr| b(self.convert_expr(e));
        match expr {
            AstExpr::Int(v) => Expr::IntImm(*v),
            AstExpr::Var(name) => match self.constants.get(name) {
                Some(v) => Expr::IntImm(*v),
                None => Expr::Var(name.clone()),
            },
            AstExpr::Neg(e) => Expr::Neg(conv(e)),
            AstExpr::Binary { op, left, right } => {
                let (l, r) = (conv(left), conv(right));
                match op {
                    AstBinOp::Add => Expr::Add(l, r),
                    AstBinOp::Sub => Expr::Sub(l, r),
                    AstBinOp::Mul => Expr::Mul(l, r),
                    AstBinOp::Lt => Expr::Cmp(CmpOp::Lt, l, r),
                    AstBinOp::Le => Expr::Cmp(CmpOp::Le, l, r),
                    AstBinOp::Gt => Expr::Cmp(CmpOp::Gt, l, r),
                    AstBinOp::Ge => Expr::Cmp(CmpOp::Ge, l, r),
                    AstBinOp::Eq => Expr::Cmp(CmpOp::Eq, l, r),
                    AstBinOp::And => Expr::And(l, r),
                    AstBinOp::Or => Expr::Or(l, r),
                }
            }
            AstExpr::Min(x, y) => Expr::Min(conv(x), conv(y)),
            AstExpr::Max(x, y) => Expr::Max(conv(x), conv(y)),
            AstExpr::FloorDiv(x, y) => Expr::FloorDiv(conv(x), conv(y)),
            AstExpr::CeilDiv(x, y) => match y.as_int() {
                // ceil(a / d) == floor((a + d - 1) / d) for d > 0
                Some(d) if d > 0 => Expr::FloorDiv(b(Expr::Add(conv(x), b(Expr::IntImm(d - 1)))), b(Expr::IntImm(d))),
                _ => Expr::Neg(b(Expr::FloorDiv(b(Expr::Neg(conv(x))), conv(y)))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::ast::LoopOrigin;

    fn env(pairs: &[(&str, i64)]) -> HashMap<String, i64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_divisions_on_negatives() {
        let bridge = ExprBridge::new();
        for a in -9..=9 {
            for d in [1, 2, 3, -2] {
                let e = env(&[("a", a), ("d", d)]);
                let floor = AstExpr::var("a").floor_div(AstExpr::int(d));
                let ceil = AstExpr::var("a").ceil_div(AstExpr::int(d));
                let ceil_sym = AstExpr::var("a").ceil_div(AstExpr::var("d"));
                assert_eq!(bridge.convert_expr(&floor).eval(&e), floor.eval(&e));
                assert_eq!(bridge.convert_expr(&ceil).eval(&e), ceil.eval(&e));
                assert_eq!(bridge.convert_expr(&ceil_sym).eval(&e), ceil_sym.eval(&e));
            }
        }
        let floor = bridge.convert_expr(&AstExpr::var("a").floor_div(AstExpr::int(2)));
        assert!(matches!(floor, Expr::FloorDiv(..)));
    }

    #[test]
    fn test_loop_ranges() {
        let bridge = ExprBridge::with_constants([("K".to_string(), 0)]);
        let stmt = AstNode::Stmt { stage: "S".into(), args: vec![AstExpr::var("c0")] };
        let finite = AstNode::For {
            iterator: "c0".into(),
            lower: AstExpr::int(0),
            upper: Some(AstExpr::var("K")),
            stride: 1,
            body: vec![stmt.clone()],
            origin: LoopOrigin { level: 0, axes: vec![] },
        };
        match bridge.convert_node(&finite) {
            Expr::For { range: LoopRange::Finite { min, extent }, body, .. } => {
                assert_eq!(*min, Expr::IntImm(0));
                assert_eq!(extent.eval(&HashMap::new()), Ok(1));
                assert!(matches!(*body, Expr::Call { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }

        let unbounded = AstNode::For {
            iterator: "c0".into(),
            lower: AstExpr::var("N"),
            upper: None,
            stride: 1,
            body: vec![stmt],
            origin: LoopOrigin { level: 0, axes: vec![] },
        };
        let e = bridge.convert_node(&unbounded);
        assert!(matches!(e, Expr::For { range: LoopRange::Unbounded { .. }, .. }));
    }
}
