use crate::backend::instruction::{AsmInstr, Reg};
use crate::ir::NodeId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileElem {
    /// A concrete instruction; may mention [`Reg::Dest`].
    Instr(AsmInstr),
    /// The tile of an expression node, writing its value into `dest`.
    ///
    /// `dest` may itself be [`Reg::Dest`], forwarding the parent's destination.
    Expr { node: NodeId, dest: Reg },
    /// The tile of a statement node.
    Stmt(NodeId),
}

/// An instruction template covering one IR node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tile {
    pub elems: Vec<TileElem>,
    /// Concrete instructions emitted, counting referenced child tiles.
    pub cost: usize,
    /// Set when the node's value already lives in a register and the tile
    /// emits nothing; parents read this register directly.
    pub pinned: Option<Reg>,
}

impl Tile {
    pub fn pinned(reg: Reg) -> Self {
        Self {
            elems: Vec::new(),
            cost: 0,
            pinned: Some(reg),
        }
    }

    /// Concrete instructions in this tile alone, children excluded.
    pub fn own_cost(elems: &[TileElem]) -> usize {
        elems
            .iter()
            .filter(|e| matches!(e, TileElem::Instr(i) if i.is_real()))
            .count()
    }
}

/// Replace every destination placeholder in `instr` with `dest`.
pub fn substitute_dest(instr: &mut AsmInstr, dest: &Reg) {
    instr.for_each_reg_mut(&mut |r| {
        if *r == Reg::Dest {
            *r = dest.clone();
        }
    });
}
