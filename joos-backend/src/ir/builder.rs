//! Node construction and fresh-name generation.
//!
//! Every IR node is created through an [`IrBuilder`], which hands out
//! unit-unique [`NodeId`]s and fresh temporary/label names. One builder lives
//! in each [`CompUnit`](super::CompUnit); there is no process-wide counter.

use super::conventions;
use super::ir::{BinOpKind, Expr, ExprKind, NodeId, Stmt, StmtKind};

#[derive(Debug, Clone)]
pub struct IrBuilder {
    scope: String,
    next_node: u32,
    next_temp: u32,
    next_label: u32,
}

impl IrBuilder {
    /// `scope` prefixes every generated name so that units never collide.
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            next_node: 0,
            next_temp: 0,
            next_label: 0,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    pub fn fresh_temp_name(&mut self) -> String {
        let name = format!("{}.t{}", self.scope, self.next_temp);
        self.next_temp += 1;
        name
    }

    pub fn fresh_label(&mut self) -> String {
        let name = format!("{}.L{}", self.scope, self.next_label);
        self.next_label += 1;
        name
    }

    // ── Expressions ─────────────────────────────────────────────────────

    pub fn binop(&mut self, op: BinOpKind, left: Expr, right: Expr) -> Expr {
        let id = self.next_id();
        Expr::new(
            id,
            ExprKind::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        )
    }

    pub fn call(&mut self, target: Expr, args: Vec<Expr>) -> Expr {
        let id = self.next_id();
        Expr::new(
            id,
            ExprKind::Call {
                target: Box::new(target),
                args,
            },
        )
    }

    pub fn constant(&mut self, value: i32) -> Expr {
        let id = self.next_id();
        Expr::new(id, ExprKind::Const(value))
    }

    pub fn eseq(&mut self, stmt: Stmt, expr: Expr) -> Expr {
        let id = self.next_id();
        Expr::new(
            id,
            ExprKind::ESeq {
                stmt: Box::new(stmt),
                expr: Box::new(expr),
            },
        )
    }

    pub fn mem(&mut self, addr: Expr) -> Expr {
        let id = self.next_id();
        Expr::new(id, ExprKind::Mem(Box::new(addr)))
    }

    /// A code label local to the unit.
    pub fn name(&mut self, label: impl Into<String>) -> Expr {
        let id = self.next_id();
        Expr::new(
            id,
            ExprKind::Name {
                label: label.into(),
                global: false,
            },
        )
    }

    /// A symbol that may be defined in another unit (functions, vtables).
    pub fn global_name(&mut self, label: impl Into<String>) -> Expr {
        let id = self.next_id();
        Expr::new(
            id,
            ExprKind::Name {
                label: label.into(),
                global: true,
            },
        )
    }

    pub fn temp(&mut self, name: impl Into<String>) -> Expr {
        let id = self.next_id();
        Expr::new(
            id,
            ExprKind::Temp {
                name: name.into(),
                global: false,
            },
        )
    }

    /// A static field living in the data section.
    pub fn global_temp(&mut self, name: impl Into<String>) -> Expr {
        let id = self.next_id();
        Expr::new(
            id,
            ExprKind::Temp {
                name: name.into(),
                global: true,
            },
        )
    }

    pub fn fresh_temp(&mut self) -> Expr {
        let name = self.fresh_temp_name();
        self.temp(name)
    }

    pub fn ret_temp(&mut self) -> Expr {
        self.temp(conventions::RETURN_TEMP)
    }

    pub fn arg_temp(&mut self, index: usize) -> Expr {
        self.temp(conventions::arg_temp(index))
    }

    // ── Statements ──────────────────────────────────────────────────────

    pub fn cjump(
        &mut self,
        cond: Expr,
        true_label: impl Into<String>,
        false_label: impl Into<String>,
    ) -> Stmt {
        let id = self.next_id();
        Stmt::new(
            id,
            StmtKind::CJump {
                cond,
                true_label: true_label.into(),
                false_label: false_label.into(),
            },
        )
    }

    pub fn exp(&mut self, expr: Expr) -> Stmt {
        let id = self.next_id();
        Stmt::new(id, StmtKind::Exp(expr))
    }

    pub fn jump(&mut self, target: Expr) -> Stmt {
        let id = self.next_id();
        Stmt::new(id, StmtKind::Jump(target))
    }

    pub fn jump_to(&mut self, label: impl Into<String>) -> Stmt {
        let target = self.name(label);
        self.jump(target)
    }

    pub fn label(&mut self, name: impl Into<String>) -> Stmt {
        let id = self.next_id();
        Stmt::new(id, StmtKind::Label(name.into()))
    }

    pub fn mov(&mut self, target: Expr, source: Expr) -> Stmt {
        let id = self.next_id();
        Stmt::new(id, StmtKind::Move { target, source })
    }

    pub fn ret(&mut self, value: Option<Expr>) -> Stmt {
        let id = self.next_id();
        Stmt::new(id, StmtKind::Return(value))
    }

    pub fn seq(&mut self, stmts: Vec<Stmt>) -> Stmt {
        let id = self.next_id();
        Stmt::new(id, StmtKind::Seq(stmts))
    }

    pub fn comment(&mut self, text: impl Into<String>) -> Stmt {
        let id = self.next_id();
        Stmt::new(id, StmtKind::Comment(text.into()))
    }

    pub fn call_stmt(&mut self, target: Expr, args: Vec<Expr>) -> Stmt {
        let id = self.next_id();
        Stmt::new(id, StmtKind::Call { target, args })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_per_builder() {
        let mut b = IrBuilder::new("A");
        let x = b.constant(1);
        let y = b.constant(1);
        assert_ne!(x.id, y.id);
        assert_ne!(x, y);
    }

    #[test]
    fn fresh_names_carry_scope() {
        let mut a = IrBuilder::new("A");
        let mut b = IrBuilder::new("B");
        assert_eq!(a.fresh_temp_name(), "A.t0");
        assert_eq!(a.fresh_temp_name(), "A.t1");
        assert_eq!(b.fresh_temp_name(), "B.t0");
        assert_eq!(a.fresh_label(), "A.L0");
    }
}
