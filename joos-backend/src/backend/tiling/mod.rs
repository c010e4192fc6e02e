//! Instruction selection by tiling.
//!
//! Every canonical node kind has exactly one template, so the minimum-cost
//! cover is the template applied recursively. Tiles are memoized by
//! [`NodeId`]; a node is tiled at most once and flattened on demand.

mod tile;

pub use tile::{Tile, TileElem};

use super::abi::{arg_offset, PhysReg};
use super::instruction::{AbstractReg, AluOp, AsmInstr, Cond, MemRef, Operand, Reg};
use crate::ir::conventions::{self, EXCEPTION, MALLOC};
use crate::ir::{BinOpKind, Expr, ExprKind, NodeId, Stmt, StmtKind};
use crate::{CompileError, CompileResult};
use std::collections::HashMap;
use tile::substitute_dest;

pub struct Tiler {
    memo: HashMap<NodeId, Tile>,
    next_reg: u32,
}

impl Default for Tiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Tiler {
    pub fn new() -> Self {
        Self {
            memo: HashMap::new(),
            next_reg: 0,
        }
    }

    /// Forget tiles from the previous unit. Node ids are only unique within
    /// a unit; fresh register numbering keeps counting.
    pub fn begin_unit(&mut self) {
        self.memo.clear();
    }

    pub fn tile(&self, id: NodeId) -> Option<&Tile> {
        self.memo.get(&id)
    }

    pub fn cost(&self, id: NodeId) -> Option<usize> {
        self.memo.get(&id).map(|t| t.cost)
    }

    /// Tile a statement and flatten it into a linear instruction list.
    pub fn tile_body(&mut self, body: Stmt) -> CompileResult<Vec<AsmInstr>> {
        let root = self.tile_stmt(body)?;
        let instrs = self.flatten(root)?;
        log::trace!(
            "tiled {root}: cost {}, {} instructions",
            self.cost(root).unwrap_or(0),
            instrs.len()
        );
        Ok(instrs)
    }

    fn fresh(&mut self) -> Reg {
        let r = Reg::Abstract(AbstractReg::Fresh(self.next_reg));
        self.next_reg += 1;
        r
    }

    /// Record the tile for `id`. A child already holding the same id would
    /// make the tile refer to itself, so that is rejected.
    fn finish(&mut self, id: NodeId, elems: Vec<TileElem>) -> CompileResult<NodeId> {
        if self.memo.contains_key(&id) {
            return Err(CompileError::DuplicateNode { node: id });
        }
        let children: usize = elems
            .iter()
            .filter_map(|e| match e {
                TileElem::Expr { node, .. } | TileElem::Stmt(node) => self.cost(*node),
                TileElem::Instr(_) => None,
            })
            .sum();
        let cost = Tile::own_cost(&elems) + children;
        self.memo.insert(
            id,
            Tile {
                elems,
                cost,
                pinned: None,
            },
        );
        Ok(id)
    }

    // ── Operand helpers ─────────────────────────────────────────────────

    /// Tile `expr` and return a register holding its value, appending the
    /// child reference to `elems` when one is needed.
    fn operand(&mut self, expr: Expr, elems: &mut Vec<TileElem>) -> CompileResult<Reg> {
        let node = self.tile_expr(expr)?;
        if let Some(r) = self.memo.get(&node).and_then(|t| t.pinned.clone()) {
            return Ok(r);
        }
        let dest = self.fresh();
        elems.push(TileElem::Expr {
            node,
            dest: dest.clone(),
        });
        Ok(dest)
    }

    /// Tile `expr` so that its value ends up in `dest`.
    fn into_dest(&mut self, expr: Expr, dest: Reg, elems: &mut Vec<TileElem>) -> CompileResult<()> {
        let node = self.tile_expr(expr)?;
        match self.memo.get(&node).and_then(|t| t.pinned.clone()) {
            Some(r) if r == dest => {}
            Some(r) => elems.push(TileElem::Instr(AsmInstr::mov(dest, r))),
            None => elems.push(TileElem::Expr { node, dest }),
        }
        Ok(())
    }

    // ── Expressions ─────────────────────────────────────────────────────

    pub fn tile_expr(&mut self, expr: Expr) -> CompileResult<NodeId> {
        let id = expr.id;
        if self.memo.contains_key(&id) {
            return Ok(id);
        }
        let d = Reg::Dest;
        let mut elems = Vec::new();
        match expr.kind {
            ExprKind::Const(v) => elems.push(TileElem::Instr(AsmInstr::mov(d, v))),

            ExprKind::Name { label, .. } => {
                elems.push(TileElem::Instr(AsmInstr::mov(d, Operand::Label(label))))
            }

            ExprKind::Temp { name, global } => {
                let src: Operand = if conventions::is_return_temp(&name) {
                    PhysReg::ACCUMULATOR.into()
                } else if let Some(index) = conventions::arg_index(&name) {
                    MemRef::frame(arg_offset(index)).into()
                } else if global {
                    MemRef::symbol(name).into()
                } else {
                    self.memo.insert(id, Tile::pinned(Reg::temp(name)));
                    return Ok(id);
                };
                elems.push(TileElem::Instr(AsmInstr::mov(d, src)));
            }

            ExprKind::BinOp { op, left, right } => self.tile_binop(op, *left, *right, &mut elems)?,

            ExprKind::Mem(addr) => {
                let a = self.operand(*addr, &mut elems)?;
                elems.push(TileElem::Instr(AsmInstr::mov(d, MemRef::base(a))));
            }

            kind @ (ExprKind::ESeq { .. } | ExprKind::Call { .. }) => {
                let reason = if matches!(kind, ExprKind::ESeq { .. }) {
                    "ESEQ reached the tiler"
                } else {
                    "call used as an expression reached the tiler"
                };
                return Err(CompileError::NotCanonical {
                    reason,
                    node: Expr::new(id, kind).to_string(),
                });
            }
        }
        self.finish(id, elems)
    }

    fn tile_binop(
        &mut self,
        op: BinOpKind,
        left: Expr,
        right: Expr,
        elems: &mut Vec<TileElem>,
    ) -> CompileResult<()> {
        let d = Reg::Dest;
        let eax = PhysReg::Eax;
        let edx = PhysReg::Edx;
        match op {
            BinOpKind::Add => {
                let a = self.operand(left, elems)?;
                let b = self.operand(right, elems)?;
                elems.push(TileElem::Instr(AsmInstr::Lea {
                    dst: d,
                    addr: MemRef::base_index(a, b),
                }));
            }

            BinOpKind::Sub | BinOpKind::And | BinOpKind::Or => {
                // The left operand is overwritten, so it never aliases a temp.
                let a = self.fresh();
                self.into_dest(left, a.clone(), elems)?;
                let b = self.operand(right, elems)?;
                let alu = match op {
                    BinOpKind::Sub => AluOp::Sub,
                    BinOpKind::And => AluOp::And,
                    _ => AluOp::Or,
                };
                elems.push(TileElem::Instr(AsmInstr::alu(alu, a.clone(), b)));
                elems.push(TileElem::Instr(AsmInstr::mov(d, a)));
            }

            BinOpKind::Mul => {
                let a = self.operand(left, elems)?;
                let b = self.operand(right, elems)?;
                elems.extend(
                    [
                        AsmInstr::mov(eax, a),
                        AsmInstr::IMul { src: b.into() },
                        AsmInstr::mov(d, eax),
                    ]
                    .map(TileElem::Instr),
                );
            }

            BinOpKind::Div | BinOpKind::Mod => {
                let a = self.operand(left, elems)?;
                let b = self.operand(right, elems)?;
                let result = if op == BinOpKind::Div { eax } else { edx };
                elems.extend(
                    [
                        AsmInstr::cmp(b.clone(), 0),
                        AsmInstr::Jcc {
                            cond: Cond::Eq,
                            label: EXCEPTION.to_string(),
                        },
                        AsmInstr::mov(eax, a),
                        AsmInstr::Cdq,
                        AsmInstr::IDiv { src: b.into() },
                        AsmInstr::mov(d, result),
                    ]
                    .map(TileElem::Instr),
                );
            }

            BinOpKind::Eq
            | BinOpKind::Neq
            | BinOpKind::Lt
            | BinOpKind::Gt
            | BinOpKind::Leq
            | BinOpKind::Geq => {
                let cond = match op {
                    BinOpKind::Eq => Cond::Eq,
                    BinOpKind::Neq => Cond::Ne,
                    BinOpKind::Lt => Cond::Lt,
                    BinOpKind::Gt => Cond::Gt,
                    BinOpKind::Leq => Cond::Le,
                    _ => Cond::Ge,
                };
                let a = self.operand(left, elems)?;
                let b = self.operand(right, elems)?;
                elems.extend(
                    [
                        AsmInstr::cmp(a, b),
                        AsmInstr::SetCc { cond },
                        AsmInstr::MovZxAl { dst: d },
                    ]
                    .map(TileElem::Instr),
                );
            }
        }
        Ok(())
    }

    // ── Statements ──────────────────────────────────────────────────────

    pub fn tile_stmt(&mut self, stmt: Stmt) -> CompileResult<NodeId> {
        let id = stmt.id;
        if self.memo.contains_key(&id) {
            return Ok(id);
        }
        let mut elems = Vec::new();
        match stmt.kind {
            StmtKind::Move { target, source } => self.tile_move(target, source, &mut elems)?,

            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.into_dest(value, PhysReg::ACCUMULATOR.into(), &mut elems)?;
                }
                elems.extend(epilogue().into_iter().map(TileElem::Instr));
            }

            StmtKind::Call { target, args } => self.tile_call(target, args, &mut elems)?,

            StmtKind::CJump {
                cond, true_label, ..
            } => {
                let c = self.operand(cond, &mut elems)?;
                elems.push(TileElem::Instr(AsmInstr::Test { a: c.clone(), b: c }));
                elems.push(TileElem::Instr(AsmInstr::Jcc {
                    cond: Cond::Ne,
                    label: true_label,
                }));
            }

            StmtKind::Jump(target) => match target.kind {
                ExprKind::Name { label, .. } => {
                    elems.push(TileElem::Instr(AsmInstr::jmp_label(label)))
                }
                kind => {
                    let r = self.operand(Expr::new(target.id, kind), &mut elems)?;
                    elems.push(TileElem::Instr(AsmInstr::Jmp { target: r.into() }));
                }
            },

            StmtKind::Label(name) => elems.push(TileElem::Instr(AsmInstr::Label(name))),

            StmtKind::Comment(text) => elems.push(TileElem::Instr(AsmInstr::Comment(text))),

            StmtKind::Exp(expr) => {
                let discard = self.fresh();
                self.into_dest(expr, discard, &mut elems)?;
            }

            StmtKind::Seq(stmts) => {
                for s in stmts {
                    let child = self.tile_stmt(s)?;
                    elems.push(TileElem::Stmt(child));
                }
            }
        }
        self.finish(id, elems)
    }

    fn tile_move(&mut self, target: Expr, source: Expr, elems: &mut Vec<TileElem>) -> CompileResult<()> {
        match target.kind {
            ExprKind::Temp { name, global } => {
                if conventions::is_return_temp(&name) {
                    self.into_dest(source, PhysReg::ACCUMULATOR.into(), elems)
                } else if let Some(index) = conventions::arg_index(&name) {
                    let v = self.operand(source, elems)?;
                    elems.push(TileElem::Instr(AsmInstr::mov(MemRef::frame(arg_offset(index)), v)));
                    Ok(())
                } else if global {
                    let v = self.operand(source, elems)?;
                    elems.push(TileElem::Instr(AsmInstr::mov(MemRef::symbol(name), v)));
                    Ok(())
                } else {
                    // The source's destination is the temporary itself.
                    self.into_dest(source, Reg::temp(name), elems)
                }
            }

            ExprKind::Mem(addr) => {
                let v = self.operand(source, elems)?;
                let a = self.operand(*addr, elems)?;
                elems.push(TileElem::Instr(AsmInstr::mov(MemRef::base(a), v)));
                Ok(())
            }

            kind => Err(CompileError::InvalidMoveTarget {
                node: Expr::new(target.id, kind).to_string(),
            }),
        }
    }

    /// Arguments are pushed right to left and popped by the caller.
    fn tile_call(&mut self, target: Expr, args: Vec<Expr>, elems: &mut Vec<TileElem>) -> CompileResult<()> {
        if target.as_name() == Some(MALLOC) {
            let count = args.len();
            let Ok([size]) = <[Expr; 1]>::try_from(args) else {
                return Err(CompileError::MallocArity { count });
            };
            if size.as_temp().is_none() {
                return Err(CompileError::NotCanonical {
                    reason: "call argument is not a temporary",
                    node: size.to_string(),
                });
            }
            self.into_dest(size, PhysReg::ACCUMULATOR.into(), elems)?;
            elems.push(TileElem::Instr(AsmInstr::call_label(MALLOC)));
            return Ok(());
        }

        let count = args.len();
        for arg in args.into_iter().rev() {
            if arg.as_temp().is_none() {
                return Err(CompileError::NotCanonical {
                    reason: "call argument is not a temporary",
                    node: arg.to_string(),
                });
            }
            let r = self.operand(arg, elems)?;
            elems.push(TileElem::Instr(AsmInstr::push(r)));
        }

        let call = match target.kind {
            ExprKind::Name { label, .. } => AsmInstr::call_label(label),
            kind => {
                let r = self.operand(Expr::new(target.id, kind), elems)?;
                AsmInstr::Call { target: r.into() }
            }
        };
        elems.push(TileElem::Instr(call));

        if count > 0 {
            elems.push(TileElem::Instr(AsmInstr::alu(
                AluOp::Add,
                PhysReg::STACK_PTR,
                count as i32 * PhysReg::WORD,
            )));
        }
        Ok(())
    }

    // ── Flattening ──────────────────────────────────────────────────────

    /// Expand a tile and everything it references into a linear list.
    pub fn flatten(&self, root: NodeId) -> CompileResult<Vec<AsmInstr>> {
        let mut out = Vec::new();
        self.flatten_into(root, None, &mut out)?;
        Ok(out)
    }

    fn flatten_into(&self, id: NodeId, dest: Option<&Reg>, out: &mut Vec<AsmInstr>) -> CompileResult<()> {
        let tile = self
            .memo
            .get(&id)
            .ok_or(CompileError::MissingTile { node: id })?;
        for elem in &tile.elems {
            match elem {
                TileElem::Instr(instr) => {
                    let mut instr = instr.clone();
                    if let Some(dest) = dest {
                        substitute_dest(&mut instr, dest);
                    }
                    out.push(instr);
                }
                TileElem::Expr { node, dest: child } => {
                    let child = match (child, dest) {
                        (Reg::Dest, Some(outer)) => outer,
                        _ => child,
                    };
                    self.flatten_into(*node, Some(child), out)?;
                }
                TileElem::Stmt(node) => self.flatten_into(*node, None, out)?,
            }
        }
        Ok(())
    }
}

/// `mov esp, ebp; pop ebp; ret`
pub fn epilogue() -> [AsmInstr; 3] {
    [
        AsmInstr::mov(PhysReg::STACK_PTR, PhysReg::FRAME_PTR),
        AsmInstr::Pop {
            dst: PhysReg::FRAME_PTR.into(),
        },
        AsmInstr::Ret,
    ]
}
