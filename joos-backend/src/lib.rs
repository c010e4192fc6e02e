pub mod ir;
pub mod backend;
pub mod options;

pub use backend::{Program, UnitAsm};
pub use options::CompileOptions;

use thiserror::Error;

/// Internal-consistency failures. Each one is a defect in the compiler, not
/// in the program being compiled, and aborts the whole run.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Non-canonical IR ({reason}): {node}")]
    NotCanonical { reason: &'static str, node: String },

    #[error("Move target must be a Temp or Mem: {node}")]
    InvalidMoveTarget { node: String },

    #[error("Node {node} was tiled more than once")]
    DuplicateNode { node: ir::NodeId },

    #[error("No tile recorded for node {node}")]
    MissingTile { node: ir::NodeId },

    #[error("Temporary {name} was never initialized!")]
    UninitializedTemp { name: String },

    #[error("Instruction `{instr}` needs {count} spill registers, at most {max} are available")]
    TooManyRegisters {
        instr: String,
        count: usize,
        max: usize,
    },

    #[error("__malloc takes exactly one argument, got {count}")]
    MallocArity { count: usize },

    #[error("Entry point {label} is not defined in any unit")]
    UnknownEntryPoint { label: String },

    #[error("Function {label} is defined more than once")]
    DuplicateFunction { label: String },

    #[error("No function to use as the entry point")]
    NoEntryPoint,

    #[error("Invalid options: {0}")]
    Options(#[from] serde_json::Error),
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Canonicalize one unit.
pub fn canonicalize_unit(unit: ir::CompUnit) -> CompileResult<ir::CanonicalUnit> {
    ir::canonicalize::canonicalize_unit(unit)
}

/// Compile a whole program to x86 assembly with default options.
pub fn compile_units_to_x86(units: Vec<ir::CompUnit>) -> CompileResult<Program> {
    compile_units(units, &CompileOptions::default())
}

/// Compile a whole program: one artifact per unit plus the startup artifact.
pub fn compile_units(units: Vec<ir::CompUnit>, options: &CompileOptions) -> CompileResult<Program> {
    let canonical = units
        .into_iter()
        .map(canonicalize_unit)
        .collect::<CompileResult<Vec<_>>>()?;
    if options.verify_canonical {
        for unit in &canonical {
            ir::canonical_check::check_unit(unit)?;
        }
    }
    backend::compile_program(canonical, options)
}
