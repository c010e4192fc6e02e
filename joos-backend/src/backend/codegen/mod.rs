//! Code generation driver and assembly output.
//!
//! Contains the [`Codegen`] struct (the central code-generation driver),
//! text rendering helpers, and the output types for unit and startup
//! artifacts.

mod deps;
mod program;

pub use deps::{startup_imports, unit_dependencies, Dependencies};

use super::abi::PhysReg;
use super::instruction::{AbstractReg, AluOp, AnnotatedInstr, AsmInstr, Reg};
use super::optimize;
use super::regalloc::{Allocation, RegAllocator};
use super::tiling::{epilogue, Tiler};
use crate::ir::{CanonicalUnit, FuncDecl, Stmt};
use crate::options::CompileOptions;
use crate::{CompileError, CompileResult};
use std::collections::HashSet;
use std::fmt::Write as _;

// ============================================================================
// Output types
// ============================================================================

/// Assembly text for one compilation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitAsm {
    pub name: String,
    pub text: String,
}

/// Everything a program compiles to: one artifact per unit plus the startup
/// artifact that initializes static fields and calls the entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub units: Vec<UnitAsm>,
    pub startup: String,
}

impl Program {
    pub const STARTUP_FILE: &'static str = "main.s";

    pub fn unit(&self, name: &str) -> Option<&UnitAsm> {
        self.units.iter().find(|u| u.name == name)
    }

    /// `(file name, text)` pairs, startup last.
    pub fn files(&self) -> Vec<(String, &str)> {
        let mut files: Vec<(String, &str)> = self
            .units
            .iter()
            .map(|u| (format!("{}.s", u.name), u.text.as_str()))
            .collect();
        files.push((Self::STARTUP_FILE.to_string(), self.startup.as_str()));
        files
    }
}

// ============================================================================
// Codegen state
// ============================================================================

/// Central code-generation driver.
///
/// Tiles each body, hands it to the register allocator, tidies the result
/// and renders text. Every function body is allocated on its own; the
/// static initializers of all units share one allocation.
pub struct Codegen {
    pub(crate) reg: Box<dyn RegAllocator>,
    pub(crate) tiler: Tiler,
    pub(crate) options: CompileOptions,
    pub(crate) startup_body: Vec<AsmInstr>,
    pub(crate) startup_stmts: Vec<Stmt>,
    pub(crate) fields: Vec<String>,
}

impl Codegen {
    pub fn new(reg: Box<dyn RegAllocator>, options: CompileOptions) -> Self {
        Self {
            reg,
            tiler: Tiler::new(),
            options,
            startup_body: Vec::new(),
            startup_stmts: Vec::new(),
            fields: Vec::new(),
        }
    }

    // ── Program ─────────────────────────────────────────────────────────

    pub fn emit_program(mut self, units: Vec<CanonicalUnit>) -> CompileResult<Program> {
        let entry = resolve_entry(&units, self.options.entry_point.as_deref())?;

        let mut out = Vec::with_capacity(units.len());
        for unit in units {
            out.push(self.emit_unit(unit)?);
        }
        let startup = self.emit_startup(&entry)?;
        log::info!("compiled {} units, entry point {entry}", out.len());

        Ok(Program {
            units: out,
            startup,
        })
    }

    // ── Units ───────────────────────────────────────────────────────────

    fn emit_unit(&mut self, unit: CanonicalUnit) -> CompileResult<UnitAsm> {
        let deps = unit_dependencies(&unit);
        let CanonicalUnit {
            name,
            functions,
            field_names,
            static_inits,
            start,
        } = unit;

        self.tiler.begin_unit();

        let mut text = String::new();
        let _ = writeln!(text, "section .text");
        let _ = writeln!(text);
        for label in &deps.exports {
            let _ = writeln!(text, "global {label}");
        }
        for import in &deps.imports {
            let _ = writeln!(text, "extern {import}");
        }

        for func in functions {
            let _ = writeln!(text);
            self.emit_function(func, &mut text)?;
        }

        // Initializers are tiled now, while this unit's node ids are in the
        // memo, and allocated later together with every other unit's.
        for stmt in start.into_iter().chain(static_inits) {
            self.startup_stmts.push(stmt.clone());
            let mut instrs = self.tiler.tile_body(stmt)?;
            scope_temps(&mut instrs, &name);
            self.startup_body.extend(instrs);
        }
        self.fields.extend(field_names);

        log::debug!("unit {name}: {} bytes of assembly", text.len());
        Ok(UnitAsm { name, text })
    }

    fn emit_function(&mut self, func: FuncDecl, text: &mut String) -> CompileResult<()> {
        log::debug!("function {} ({} params)", func.label, func.num_params);
        let instrs = self.tiler.tile_body(func.body)?;
        let Allocation {
            instrs: mut body,
            frame_slots,
        } = self.reg.allocate(instrs)?;

        if !ends_in_return(&body) {
            body.extend(epilogue().into_iter().map(|i| (i, None)));
        }
        if self.options.peephole {
            optimize::optimize(&mut body);
        }

        let _ = writeln!(text, "{}:", func.label);
        render(&prologue(frame_slots), &[], self.options.emit_comments, text);
        render(&[], &body, self.options.emit_comments, text);
        Ok(())
    }

    // ── Startup ─────────────────────────────────────────────────────────

    fn emit_startup(&mut self, entry: &str) -> CompileResult<String> {
        let body = std::mem::take(&mut self.startup_body);
        let Allocation {
            instrs: mut body,
            frame_slots,
        } = self.reg.allocate(body)?;
        if self.options.peephole {
            optimize::optimize(&mut body);
        }

        let fields: HashSet<&str> = self.fields.iter().map(String::as_str).collect();
        let imports = startup_imports(&self.startup_stmts, &fields, entry);
        Ok(program::render_startup(
            &self.fields,
            &imports,
            frame_slots,
            &body,
            entry,
            self.options.emit_comments,
        ))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// `push ebp; mov ebp, esp; sub esp, 4*slots`, the last only for a
/// non-empty frame.
pub fn prologue(slots: usize) -> Vec<AsmInstr> {
    let mut out = vec![
        AsmInstr::push(PhysReg::FRAME_PTR),
        AsmInstr::mov(PhysReg::FRAME_PTR, PhysReg::STACK_PTR),
    ];
    if slots > 0 {
        out.push(AsmInstr::alu(
            AluOp::Sub,
            PhysReg::STACK_PTR,
            slots as i32 * PhysReg::WORD,
        ));
    }
    out
}

/// Prefix named temporaries with `unit.` so that initializers from
/// different units never share a register once merged into one body.
fn scope_temps(instrs: &mut [AsmInstr], unit: &str) {
    let prefix = format!("{unit}.");
    for instr in instrs {
        instr.for_each_reg_mut(&mut |r| {
            if let Reg::Abstract(AbstractReg::Temp(name)) = r {
                if !name.starts_with(&prefix) {
                    *name = format!("{prefix}{name}");
                }
            }
        });
    }
}

fn ends_in_return(body: &[AnnotatedInstr]) -> bool {
    body.iter()
        .rev()
        .map(|(i, _)| i)
        .find(|i| !matches!(i, AsmInstr::Comment(_)))
        .is_some_and(|i| matches!(i, AsmInstr::Ret))
}

fn resolve_entry(units: &[CanonicalUnit], requested: Option<&str>) -> CompileResult<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    for func in units.iter().flat_map(|u| &u.functions) {
        if !seen.insert(func.label.as_str()) {
            return Err(CompileError::DuplicateFunction {
                label: func.label.clone(),
            });
        }
    }
    match requested {
        Some(label) if seen.contains(label) => Ok(label.to_string()),
        Some(label) => Err(CompileError::UnknownEntryPoint {
            label: label.to_string(),
        }),
        None => units
            .iter()
            .flat_map(|u| &u.functions)
            .next()
            .map(|f| f.label.clone())
            .ok_or(CompileError::NoEntryPoint),
    }
}

/// Append `plain` then `annotated` instructions as text, one per line.
pub(crate) fn render(
    plain: &[AsmInstr],
    annotated: &[AnnotatedInstr],
    emit_comments: bool,
    text: &mut String,
) {
    let lines = plain
        .iter()
        .map(|i| (i, None))
        .chain(annotated.iter().map(|(i, c)| (i, c.as_deref())));
    for (instr, comment) in lines {
        if matches!(instr, AsmInstr::Comment(_)) && !emit_comments {
            continue;
        }
        match comment {
            Some(c) if emit_comments => {
                let _ = writeln!(text, "{instr} ; {c}");
            }
            _ => {
                let _ = writeln!(text, "{instr}");
            }
        }
    }
}
