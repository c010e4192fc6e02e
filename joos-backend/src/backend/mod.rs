//! x86 backend: lowers canonical IR to 32-bit NASM assembly.
//!
//! Module layout:
//! - `abi`: register definitions and frame layout constants
//! - `instruction`: typed x86 instructions over abstract and physical registers
//! - `tiling`: instruction selection by memoized tiling
//! - `regalloc`: register allocation trait and implementations
//! - `codegen`: code generation driver (canonical IR to assembly text)
//! - `optimize`: assembly-level cleanup passes

pub mod abi;
pub mod instruction;
pub mod regalloc;
pub mod tiling;
mod codegen;
mod optimize;

// Re-export the public API at `backend::` level.
pub use codegen::{unit_dependencies, Codegen, Dependencies, Program, UnitAsm};
pub use regalloc::AllocatorKind;

use crate::ir::CanonicalUnit;
use crate::options::CompileOptions;
use crate::CompileResult;
use regalloc::{BasicAllocator, LinearScanAllocator, RegAllocator};

/// Build the allocator selected by `kind`.
pub fn new_allocator(kind: AllocatorKind) -> Box<dyn RegAllocator> {
    match kind {
        AllocatorKind::Basic => Box::new(BasicAllocator::new()),
        AllocatorKind::LinearScan => Box::new(LinearScanAllocator::new()),
    }
}

/// Generate assembly for a whole program of canonical units.
pub(crate) fn compile_program(
    units: Vec<CanonicalUnit>,
    options: &CompileOptions,
) -> CompileResult<Program> {
    log::debug!("backend: {:?} allocator", options.allocator_kind());
    let reg = new_allocator(options.allocator_kind());
    Codegen::new(reg, options.clone()).emit_program(units)
}
