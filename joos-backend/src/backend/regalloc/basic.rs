//! Basic register allocator.
//!
//! Gives every abstract register its own stack slot and routes each use
//! through a scratch register. Nothing stays in a register between
//! instructions, so calls need no save/restore.

use super::intervals::Assignment;
use super::{check_initialized, rewrite_instr, Allocation, RegAllocator};
use crate::backend::instruction::{AbstractReg, AsmInstr};
use crate::CompileResult;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct BasicAllocator;

impl BasicAllocator {
    pub fn new() -> Self {
        Self
    }
}

impl RegAllocator for BasicAllocator {
    fn allocate(&mut self, instrs: Vec<AsmInstr>) -> CompileResult<Allocation> {
        check_initialized(&instrs)?;

        let mut homes: HashMap<AbstractReg, Assignment> = HashMap::new();
        for instr in &instrs {
            for a in instr.abstract_regs() {
                let next = homes.len() + 1;
                homes.entry(a).or_insert(Assignment::Stack(next));
            }
        }

        let mut out = Vec::with_capacity(instrs.len() * 2);
        for instr in instrs {
            rewrite_instr(instr, &homes, &mut out)?;
        }
        log::debug!("basic allocator: {} slots", homes.len());

        Ok(Allocation {
            instrs: out,
            frame_slots: homes.len(),
        })
    }
}
