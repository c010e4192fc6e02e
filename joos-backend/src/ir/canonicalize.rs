//! Canonicalization: lifts every side effect out of expression position.
//!
//! Each expression lowers to `(hoisted statements, pure expression)`. After
//! the pass:
//! - no `ESeq` remains,
//! - every call is a `Call` statement whose result is read from `_RET`,
//! - `Move` targets are `Temp` or `Mem`,
//! - `CJump` conditions are pure.
//!
//! Nodes whose shape survives keep their `NodeId`, so a tree with nothing to
//! hoist comes back equal to the input.

use super::builder::IrBuilder;
use super::ir::{
    CanonicalUnit, CompUnit, Expr, ExprKind, FuncDecl, NodeId, StaticField, Stmt, StmtKind,
};
use crate::{CompileError, CompileResult};

type Lowered = (Vec<Stmt>, Expr);

pub struct Canonicalizer<'a> {
    builder: &'a mut IrBuilder,
}

impl<'a> Canonicalizer<'a> {
    pub fn new(builder: &'a mut IrBuilder) -> Self {
        Self { builder }
    }

    /// Canonicalize a statement tree, keeping a single statement where the
    /// input was one and nothing needed hoisting.
    ///
    /// A lowered non-`Seq` statement keeps its id on the last hoisted
    /// statement, so a wrapping `Seq` needs an id of its own.
    pub fn canonicalize_stmt(&mut self, stmt: Stmt) -> CompileResult<Stmt> {
        let id = stmt.id;
        let was_seq = stmt.is_seq();
        let mut stmts = self.lower_stmt(stmt)?;
        if was_seq {
            return Ok(Stmt::new(id, StmtKind::Seq(stmts)));
        }
        if stmts.len() == 1 {
            if let Some(single) = stmts.pop() {
                return Ok(single);
            }
        }
        Ok(self.builder.seq(stmts))
    }

    /// Lower a static initializer into `Seq(hoisted..., Move(field, value))`.
    pub fn canonicalize_field(&mut self, field: StaticField) -> CompileResult<Stmt> {
        let (mut stmts, value) = self.lower_expr(field.init)?;
        let target = self.builder.global_temp(field.name);
        stmts.push(self.builder.mov(target, value));
        Ok(self.builder.seq(stmts))
    }

    pub fn lower_expr(&mut self, expr: Expr) -> CompileResult<Lowered> {
        let id = expr.id;
        match expr.kind {
            kind @ (ExprKind::Const(_) | ExprKind::Name { .. } | ExprKind::Temp { .. }) => {
                Ok((Vec::new(), Expr::new(id, kind)))
            }

            ExprKind::BinOp { op, left, right } => {
                let (mut stmts, left) = self.lower_expr(*left)?;
                let (right_stmts, right) = self.lower_expr(*right)?;
                let left = if right_stmts.is_empty() {
                    left
                } else {
                    // Pin the left value before the right side's effects run.
                    let t = self.builder.fresh_temp_name();
                    let target = self.builder.temp(t.clone());
                    stmts.push(self.builder.mov(target, left));
                    self.builder.temp(t)
                };
                stmts.extend(right_stmts);
                let expr = Expr::new(
                    id,
                    ExprKind::BinOp {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                    },
                );
                Ok((stmts, expr))
            }

            ExprKind::Mem(addr) => {
                let (stmts, addr) = self.lower_expr(*addr)?;
                Ok((stmts, Expr::new(id, ExprKind::Mem(Box::new(addr)))))
            }

            ExprKind::Call { target, args } => {
                let stmts = self.lower_call(id, *target, args)?;
                Ok((stmts, self.builder.ret_temp()))
            }

            ExprKind::ESeq { stmt, expr } => {
                let mut stmts = self.lower_stmt(*stmt)?;
                let (more, expr) = self.lower_expr(*expr)?;
                stmts.extend(more);
                Ok((stmts, expr))
            }
        }
    }

    /// Arguments are evaluated left to right, each into its own temporary.
    fn lower_call(&mut self, id: NodeId, target: Expr, args: Vec<Expr>) -> CompileResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        let mut arg_temps = Vec::with_capacity(args.len());
        for arg in args {
            let (hoisted, value) = self.lower_expr(arg)?;
            stmts.extend(hoisted);
            let t = self.builder.fresh_temp_name();
            let dst = self.builder.temp(t.clone());
            stmts.push(self.builder.mov(dst, value));
            arg_temps.push(self.builder.temp(t));
        }

        let target = if matches!(target.kind, ExprKind::Name { .. }) {
            target
        } else {
            let (hoisted, target) = self.lower_expr(target)?;
            stmts.extend(hoisted);
            target
        };

        stmts.push(Stmt::new(
            id,
            StmtKind::Call {
                target,
                args: arg_temps,
            },
        ));
        Ok(stmts)
    }

    pub fn lower_stmt(&mut self, stmt: Stmt) -> CompileResult<Vec<Stmt>> {
        let id = stmt.id;
        match stmt.kind {
            kind @ (StmtKind::Label(_) | StmtKind::Comment(_)) => Ok(vec![Stmt::new(id, kind)]),

            StmtKind::CJump {
                cond,
                true_label,
                false_label,
            } => {
                let (mut stmts, cond) = self.lower_expr(cond)?;
                stmts.push(Stmt::new(
                    id,
                    StmtKind::CJump {
                        cond,
                        true_label,
                        false_label,
                    },
                ));
                Ok(stmts)
            }

            StmtKind::Exp(expr) => {
                let (mut stmts, residue) = self.lower_expr(expr)?;
                if !residue.is_leaf() {
                    stmts.push(Stmt::new(id, StmtKind::Exp(residue)));
                }
                Ok(stmts)
            }

            StmtKind::Jump(target) => {
                let (mut stmts, target) = self.lower_expr(target)?;
                stmts.push(Stmt::new(id, StmtKind::Jump(target)));
                Ok(stmts)
            }

            StmtKind::Move { target, source } => self.lower_move(id, target, source),

            StmtKind::Return(value) => match value {
                Some(value) => {
                    let (mut stmts, value) = self.lower_expr(value)?;
                    stmts.push(Stmt::new(id, StmtKind::Return(Some(value))));
                    Ok(stmts)
                }
                None => Ok(vec![Stmt::new(id, StmtKind::Return(None))]),
            },

            StmtKind::Seq(children) => {
                let mut stmts = Vec::with_capacity(children.len());
                for child in children {
                    stmts.extend(self.lower_stmt(child)?);
                }
                Ok(stmts)
            }

            StmtKind::Call { target, args } => self.lower_call(id, target, args),
        }
    }

    fn lower_move(&mut self, id: NodeId, target: Expr, source: Expr) -> CompileResult<Vec<Stmt>> {
        match target.kind {
            kind @ ExprKind::Temp { .. } => {
                let target = Expr::new(target.id, kind);
                let (mut stmts, source) = self.lower_expr(source)?;
                stmts.push(Stmt::new(id, StmtKind::Move { target, source }));
                Ok(stmts)
            }

            ExprKind::Mem(addr) => {
                // Address first, then source, each parked in its own temporary.
                let (mut stmts, addr) = self.lower_expr(*addr)?;
                let addr_temp = self.builder.fresh_temp_name();
                let dst = self.builder.temp(addr_temp.clone());
                stmts.push(self.builder.mov(dst, addr));

                let (source_stmts, source) = self.lower_expr(source)?;
                stmts.extend(source_stmts);
                let value_temp = self.builder.fresh_temp_name();
                let dst = self.builder.temp(value_temp.clone());
                stmts.push(self.builder.mov(dst, source));

                let addr = self.builder.temp(addr_temp);
                let target = Expr::new(target.id, ExprKind::Mem(Box::new(addr)));
                let source = self.builder.temp(value_temp);
                stmts.push(Stmt::new(id, StmtKind::Move { target, source }));
                Ok(stmts)
            }

            kind => Err(CompileError::InvalidMoveTarget {
                node: Expr::new(target.id, kind).to_string(),
            }),
        }
    }
}

/// Canonicalize a whole unit: functions, static initializers, start code.
pub fn canonicalize_unit(unit: CompUnit) -> CompileResult<CanonicalUnit> {
    let CompUnit {
        name,
        functions,
        static_fields,
        start_stmts,
        mut builder,
    } = unit;
    let mut canon = Canonicalizer::new(&mut builder);

    let mut canonical_functions = Vec::with_capacity(functions.len());
    for func in functions {
        log::trace!("canonicalizing {}", func.label);
        canonical_functions.push(FuncDecl {
            body: canon.canonicalize_stmt(func.body)?,
            ..func
        });
    }

    let field_names: Vec<String> = static_fields.iter().map(|f| f.name.clone()).collect();
    let mut static_inits = Vec::with_capacity(static_fields.len());
    for field in static_fields {
        static_inits.push(canon.canonicalize_field(field)?);
    }

    let mut start = Vec::with_capacity(start_stmts.len());
    for stmt in start_stmts {
        start.push(canon.canonicalize_stmt(stmt)?);
    }

    log::debug!(
        "canonicalized unit {}: {} functions, {} static fields",
        name,
        canonical_functions.len(),
        field_names.len()
    );

    Ok(CanonicalUnit {
        name,
        functions: canonical_functions,
        field_names,
        static_inits,
        start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BinOpKind;

    #[test]
    fn leaves_come_back_untouched() {
        let mut b = IrBuilder::new("T");
        let c = b.constant(7);
        let expected = c.clone();
        let (stmts, e) = Canonicalizer::new(&mut b).lower_expr(c).expect("lower");
        assert!(stmts.is_empty());
        assert_eq!(e, expected);
    }

    #[test]
    fn eseq_is_flattened() {
        let mut b = IrBuilder::new("T");
        let x = b.temp("x");
        let one = b.constant(1);
        let set = b.mov(x, one);
        let read = b.temp("x");
        let e = b.eseq(set, read);
        let (stmts, e) = Canonicalizer::new(&mut b).lower_expr(e).expect("lower");
        assert_eq!(stmts.len(), 1);
        assert!(matches!(stmts[0].kind, StmtKind::Move { .. }));
        assert_eq!(e.as_temp(), Some(("x", false)));
    }

    #[test]
    fn left_operand_is_not_pinned_without_right_effects() {
        let mut b = IrBuilder::new("T");
        let x = b.temp("x");
        let y = b.temp("y");
        let sum = b.binop(BinOpKind::Add, x, y);
        let (stmts, _) = Canonicalizer::new(&mut b).lower_expr(sum).expect("lower");
        assert!(stmts.is_empty());
    }

    #[test]
    fn hoisting_wrapper_gets_its_own_id() {
        let mut b = IrBuilder::new("T");
        let f = b.global_name("T.f");
        let call = b.call(f, vec![]);
        let one = b.constant(1);
        let sum = b.binop(BinOpKind::Add, call, one);
        let ret = b.ret(Some(sum));
        let ret_id = ret.id;

        let body = Canonicalizer::new(&mut b).canonicalize_stmt(ret).expect("canonicalize");
        let StmtKind::Seq(stmts) = &body.kind else {
            panic!("expected a SEQ, got {body}");
        };
        assert_ne!(body.id, ret_id);
        assert!(stmts.iter().all(|s| s.id != body.id));
        assert_eq!(stmts.last().map(|s| s.id), Some(ret_id));
    }

    #[test]
    fn seq_keeps_its_id() {
        let mut b = IrBuilder::new("T");
        let x = b.temp("x");
        let one = b.constant(1);
        let set = b.mov(x, one);
        let body = b.seq(vec![set]);
        let id = body.id;
        let body = Canonicalizer::new(&mut b).canonicalize_stmt(body).expect("canonicalize");
        assert_eq!(body.id, id);
        assert!(body.is_seq());
    }

    #[test]
    fn move_to_const_is_rejected() {
        let mut b = IrBuilder::new("T");
        let c = b.constant(1);
        let v = b.constant(2);
        let m = b.mov(c, v);
        let err = Canonicalizer::new(&mut b).lower_stmt(m).unwrap_err();
        assert!(matches!(err, CompileError::InvalidMoveTarget { .. }));
    }
}
