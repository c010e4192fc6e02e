//! Symbol import/export discovery.

use crate::ir::conventions::RUNTIME_SYMBOLS;
use crate::ir::{CanonicalUnit, Expr, ExprKind, Stmt, StmtKind};
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependencies {
    /// Functions defined by the unit, in definition order.
    pub exports: Vec<String>,
    /// Symbols referenced but defined elsewhere, sorted.
    pub imports: BTreeSet<String>,
}

/// Every function a unit defines is exported. Functions and globals it
/// references but does not define are imported, as are the runtime symbols.
/// Static fields always live in the startup artifact, so they are imported
/// even by the unit that declares them.
pub fn unit_dependencies(unit: &CanonicalUnit) -> Dependencies {
    let exports: Vec<String> = unit.functions.iter().map(|f| f.label.clone()).collect();
    let mut refs = BTreeSet::new();
    for func in &unit.functions {
        collect_stmt(&func.body, &mut refs);
    }
    let defined: HashSet<&str> = exports.iter().map(String::as_str).collect();
    let imports = finish_imports(refs, &defined);
    Dependencies { exports, imports }
}

/// Imports of the startup artifact: whatever the initializers reference that
/// is not a static field, plus the entry point.
pub fn startup_imports<'a>(
    stmts: impl IntoIterator<Item = &'a Stmt>,
    fields: &HashSet<&str>,
    entry: &str,
) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    for stmt in stmts {
        collect_stmt(stmt, &mut refs);
    }
    refs.insert(entry.to_string());
    finish_imports(refs, fields)
}

fn finish_imports(mut refs: BTreeSet<String>, defined: &HashSet<&str>) -> BTreeSet<String> {
    refs.retain(|s| !defined.contains(s.as_str()));
    refs.extend(RUNTIME_SYMBOLS.iter().map(|s| s.to_string()));
    refs
}

fn collect_stmt(stmt: &Stmt, refs: &mut BTreeSet<String>) {
    match &stmt.kind {
        StmtKind::CJump { cond, .. } => collect_expr(cond, refs),
        StmtKind::Exp(e) | StmtKind::Jump(e) | StmtKind::Return(Some(e)) => collect_expr(e, refs),
        StmtKind::Move { target, source } => {
            collect_expr(target, refs);
            collect_expr(source, refs);
        }
        StmtKind::Seq(stmts) => stmts.iter().for_each(|s| collect_stmt(s, refs)),
        StmtKind::Call { target, args } => {
            if let Some(label) = target.as_name() {
                refs.insert(label.to_string());
            } else {
                collect_expr(target, refs);
            }
            args.iter().for_each(|a| collect_expr(a, refs));
        }
        StmtKind::Label(_) | StmtKind::Comment(_) | StmtKind::Return(None) => {}
    }
}

fn collect_expr(expr: &Expr, refs: &mut BTreeSet<String>) {
    match &expr.kind {
        ExprKind::Name {
            label,
            global: true,
        }
        | ExprKind::Temp {
            name: label,
            global: true,
        } => {
            refs.insert(label.clone());
        }
        ExprKind::BinOp { left, right, .. } => {
            collect_expr(left, refs);
            collect_expr(right, refs);
        }
        ExprKind::Mem(addr) => collect_expr(addr, refs),
        ExprKind::Call { target, args } => {
            collect_expr(target, refs);
            args.iter().for_each(|a| collect_expr(a, refs));
        }
        ExprKind::ESeq { stmt, expr } => {
            collect_stmt(stmt, refs);
            collect_expr(expr, refs);
        }
        ExprKind::Const(_) | ExprKind::Name { .. } | ExprKind::Temp { .. } => {}
    }
}
