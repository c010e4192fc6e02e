//! Verifies that a unit is in canonical form before it is tiled.

use super::ir::{CanonicalUnit, Expr, ExprKind, Stmt, StmtKind};
use crate::{CompileError, CompileResult};

pub fn check_unit(unit: &CanonicalUnit) -> CompileResult<()> {
    for func in &unit.functions {
        check_stmt(&func.body)?;
    }
    for stmt in unit.start.iter().chain(&unit.static_inits) {
        check_stmt(stmt)?;
    }
    Ok(())
}

pub fn check_stmt(stmt: &Stmt) -> CompileResult<()> {
    match &stmt.kind {
        StmtKind::Label(_) | StmtKind::Comment(_) | StmtKind::Return(None) => Ok(()),
        StmtKind::CJump { cond, .. } => check_expr(cond),
        StmtKind::Exp(e) | StmtKind::Jump(e) | StmtKind::Return(Some(e)) => check_expr(e),
        StmtKind::Move { target, source } => {
            match &target.kind {
                ExprKind::Temp { .. } => {}
                ExprKind::Mem(addr) => check_expr(addr)?,
                _ => {
                    return Err(CompileError::InvalidMoveTarget {
                        node: stmt.to_string(),
                    })
                }
            }
            check_expr(source)
        }
        StmtKind::Seq(stmts) => stmts.iter().try_for_each(check_stmt),
        StmtKind::Call { target, args } => {
            check_expr(target)?;
            match args.iter().find(|a| a.as_temp().is_none()) {
                Some(arg) => Err(not_canonical(arg, "call argument is not a temporary")),
                None => Ok(()),
            }
        }
    }
}

pub fn check_expr(expr: &Expr) -> CompileResult<()> {
    match &expr.kind {
        ExprKind::Const(_) | ExprKind::Name { .. } | ExprKind::Temp { .. } => Ok(()),
        ExprKind::BinOp { left, right, .. } => {
            check_expr(left)?;
            check_expr(right)
        }
        ExprKind::Mem(addr) => check_expr(addr),
        ExprKind::ESeq { .. } => Err(not_canonical(expr, "ESEQ survived canonicalization")),
        ExprKind::Call { .. } => Err(not_canonical(expr, "call used as an expression")),
    }
}

fn not_canonical(node: &Expr, reason: &'static str) -> CompileError {
    CompileError::NotCanonical {
        reason,
        node: node.to_string(),
    }
}
