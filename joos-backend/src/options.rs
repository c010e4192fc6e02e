use crate::backend::regalloc::AllocatorKind;
use crate::CompileResult;
use serde::{Deserialize, Serialize};

// ── Compilation options ──────────────────────────────────────────────

/// Register allocator selection for assembly generation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AllocatorOpt {
    Basic,
    #[default]
    LinearScan,
}

impl From<AllocatorOpt> for AllocatorKind {
    fn from(opt: AllocatorOpt) -> Self {
        match opt {
            AllocatorOpt::Basic => AllocatorKind::Basic,
            AllocatorOpt::LinearScan => AllocatorKind::LinearScan,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Options for [`compile_units`](crate::compile_units).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CompileOptions {
    #[serde(default)]
    pub allocator: AllocatorOpt,
    /// Keep IR comments and allocator annotations as `;` lines.
    #[serde(default = "default_true")]
    pub emit_comments: bool,
    /// Run the canonical-form checker before tiling.
    #[serde(default = "default_true")]
    pub verify_canonical: bool,
    #[serde(default = "default_true")]
    pub peephole: bool,
    /// Label of the function the startup code calls. Defaults to the first
    /// function of the first unit.
    #[serde(default)]
    pub entry_point: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            allocator: AllocatorOpt::LinearScan,
            emit_comments: true,
            verify_canonical: true,
            peephole: true,
            entry_point: None,
        }
    }
}

impl CompileOptions {
    pub fn from_json(text: &str) -> CompileResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn allocator_kind(&self) -> AllocatorKind {
        self.allocator.into()
    }
}
