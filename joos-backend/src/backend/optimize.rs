//! Assembly-level optimization passes.
//!
//! Each pass implements the `AsmPass` trait and operates on an allocated
//! instruction list. Passes are composed via the `PassManager` and run after
//! register allocation but before the final text emission.

use super::instruction::{AnnotatedInstr, AsmInstr, Operand};

// ============================================================================
// Pass infrastructure
// ============================================================================

/// A single optimization pass over allocated assembly.
pub trait AsmPass {
    fn run(&self, instrs: &mut Vec<AnnotatedInstr>);
}

/// Runs a sequence of `AsmPass`es in order.
struct PassManager {
    passes: Vec<Box<dyn AsmPass>>,
}

impl PassManager {
    fn new() -> Self {
        Self { passes: Vec::new() }
    }

    fn add(&mut self, pass: Box<dyn AsmPass>) {
        self.passes.push(pass);
    }

    fn run_all(&self, instrs: &mut Vec<AnnotatedInstr>) {
        for pass in &self.passes {
            pass.run(instrs);
        }
    }
}

// ============================================================================
// Peephole optimizer
// ============================================================================

/// Removes `mov r, r` left behind when a source and its destination landed
/// in the same register.
struct PeepholeOptimizer;

impl AsmPass for PeepholeOptimizer {
    fn run(&self, instrs: &mut Vec<AnnotatedInstr>) {
        instrs.retain(|(instr, _)| {
            !matches!(
                instr,
                AsmInstr::Mov {
                    dst: Operand::Reg(d),
                    src: Operand::Reg(s),
                } if d == s
            )
        });
    }
}

// ============================================================================
// Unreachable code after `ret` and `jmp`
// ============================================================================

struct UnreachableCodeEliminator;

impl AsmPass for UnreachableCodeEliminator {
    fn run(&self, instrs: &mut Vec<AnnotatedInstr>) {
        let mut reachable = true;
        instrs.retain(|(instr, _)| {
            match instr {
                AsmInstr::Label(_) => reachable = true,
                AsmInstr::Comment(_) => return true,
                _ if !reachable => return false,
                AsmInstr::Ret | AsmInstr::Jmp { .. } => reachable = false,
                _ => {}
            }
            true
        });
    }
}

// ============================================================================
// Jump optimizer
// ============================================================================

/// Removes `jmp X` instructions that are immediately followed by label `X`.
struct JumpOptimizer;

impl AsmPass for JumpOptimizer {
    fn run(&self, instrs: &mut Vec<AnnotatedInstr>) {
        let mut i = 0;
        while i + 1 < instrs.len() {
            let fallthrough = match (&instrs[i].0, next_non_comment(instrs, i + 1)) {
                (
                    AsmInstr::Jmp {
                        target: Operand::Label(target),
                    },
                    Some(AsmInstr::Label(label)),
                ) => target == label,
                _ => false,
            };
            if fallthrough {
                instrs.remove(i);
            } else {
                i += 1;
            }
        }
    }
}

fn next_non_comment(instrs: &[AnnotatedInstr], from: usize) -> Option<&AsmInstr> {
    instrs[from..]
        .iter()
        .map(|(i, _)| i)
        .find(|i| !matches!(i, AsmInstr::Comment(_)))
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all optimization passes on one allocated body.
pub fn optimize(instrs: &mut Vec<AnnotatedInstr>) {
    let mut pm = PassManager::new();
    pm.add(Box::new(PeepholeOptimizer));
    pm.add(Box::new(UnreachableCodeEliminator));
    pm.add(Box::new(JumpOptimizer));
    pm.run_all(instrs);
}
