//! Register allocation interfaces and shared infrastructure.
//!
//! This module defines:
//! - [`RegAllocator`]: the trait that all register allocators implement.
//! - [`AllocatorKind`]: enum for selecting an allocator at compile time.
//! - [`check_initialized`]: the write-before-read precondition both run.
//! - [`rewrite_instr`]: substitution of homes into one instruction, with
//!   scratch loads and stores for spilled operands.

mod basic;
mod intervals;
mod linear_scan;

pub use basic::BasicAllocator;
pub use intervals::{Assignment, Interval, LiveIntervals};
pub use linear_scan::{assign_intervals, LinearScanAllocator};

use super::abi::{slot_offset, PhysReg};
use super::instruction::{AbstractReg, AnnotatedInstr, AsmInstr, Reg};
use crate::{CompileError, CompileResult};
use std::collections::{HashMap, HashSet};

// ============================================================================
// Allocator selection
// ============================================================================

/// Which register allocator implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocatorKind {
    /// Every abstract register lives in its own stack slot.
    Basic,
    #[default]
    LinearScan,
}

// ============================================================================
// Allocator trait
// ============================================================================

/// Result of allocating one function or initializer body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// Only physical registers and frame-relative memory remain.
    pub instrs: Vec<AnnotatedInstr>,
    /// Stack slots the prologue must reserve.
    pub frame_slots: usize,
}

/// Abstract register allocation interface.
///
/// Each call handles one body with fresh state; nothing carries over between
/// bodies.
pub trait RegAllocator {
    fn allocate(&mut self, instrs: Vec<AsmInstr>) -> CompileResult<Allocation>;
}

// ============================================================================
// Shared helpers
// ============================================================================

/// Every abstract register must be written before it is first read, in
/// linear instruction order.
pub fn check_initialized(instrs: &[AsmInstr]) -> CompileResult<()> {
    let mut written: HashSet<AbstractReg> = HashSet::new();
    for instr in instrs {
        for r in instr.uses() {
            if let Reg::Abstract(a) = r {
                if !written.contains(&a) {
                    return Err(CompileError::UninitializedTemp { name: temp_name(&a) });
                }
            }
        }
        for r in instr.defs() {
            if let Reg::Abstract(a) = r {
                written.insert(a);
            }
        }
    }
    Ok(())
}

fn temp_name(reg: &AbstractReg) -> String {
    match reg {
        AbstractReg::Temp(name) => name.clone(),
        AbstractReg::Fresh(_) => reg.to_string(),
    }
}

/// Replace abstract registers in `instr` by their homes and append the result
/// to `out`. Spilled operands go through scratch registers: loaded before the
/// instruction when read, stored after it when written.
pub fn rewrite_instr(
    mut instr: AsmInstr,
    homes: &HashMap<AbstractReg, Assignment>,
    out: &mut Vec<AnnotatedInstr>,
) -> CompileResult<()> {
    let mentioned = instr.abstract_regs();
    let mut scratch: HashMap<AbstractReg, (PhysReg, usize)> = HashMap::new();
    let mut spilled: Vec<AbstractReg> = Vec::new();
    for a in &mentioned {
        match homes.get(a) {
            Some(Assignment::Stack(slot)) => {
                if let Some(&sc) = PhysReg::SCRATCH.get(spilled.len()) {
                    scratch.insert(a.clone(), (sc, *slot));
                }
                spilled.push(a.clone());
            }
            Some(Assignment::Reg(_)) => {}
            Some(Assignment::Unassigned) | None => {
                return Err(CompileError::UninitializedTemp { name: temp_name(a) })
            }
        }
    }
    if spilled.len() > PhysReg::SCRATCH.len() {
        return Err(CompileError::TooManyRegisters {
            instr: instr.to_string().trim().to_string(),
            count: spilled.len(),
            max: PhysReg::SCRATCH.len(),
        });
    }

    let reads: Vec<Reg> = instr.uses();
    let writes: Vec<Reg> = instr.defs();

    for a in &spilled {
        if let Some(&(sc, slot)) = scratch.get(a) {
            if reads.contains(&Reg::Abstract(a.clone())) {
                emit_c(out, AsmInstr::load_frame(sc, slot_offset(slot)), format!("restore {}", temp_name(a)));
            }
        }
    }

    instr.for_each_reg_mut(&mut |r| {
        if let Reg::Abstract(a) = r {
            let phys = match homes.get(a) {
                Some(Assignment::Reg(p)) => Some(*p),
                _ => scratch.get(a).map(|(sc, _)| *sc),
            };
            if let Some(p) = phys {
                *r = Reg::Phys(p);
            }
        }
    });
    out.push((instr, None));

    for a in &spilled {
        if let Some(&(sc, slot)) = scratch.get(a) {
            if writes.contains(&Reg::Abstract(a.clone())) {
                emit_c(out, AsmInstr::store_frame(slot_offset(slot), sc), format!("spill {}", temp_name(a)));
            }
        }
    }
    Ok(())
}

/// Push an instruction with a comment.
#[inline]
pub(crate) fn emit_c(out: &mut Vec<AnnotatedInstr>, instr: AsmInstr, comment: impl Into<String>) {
    out.push((instr, Some(comment.into())));
}
