use std::fmt;

/// 32-bit x86 general-purpose registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PhysReg {
    Eax,
    Ebx,
    Ecx,
    Edx,
    Esi,
    Edi,
    Esp,
    Ebp,
}

impl PhysReg {
    /// Registers the linear-scan allocator hands out, in preference order.
    pub const ALLOCATABLE: [PhysReg; 3] = [PhysReg::Ebx, PhysReg::Edx, PhysReg::Eax];

    /// Reserved for loading and storing spilled operands around one
    /// instruction; never live across instructions.
    pub const SCRATCH: [PhysReg; 3] = [PhysReg::Ecx, PhysReg::Esi, PhysReg::Edi];

    /// Generated prologues preserve nothing, so every allocatable register
    /// may be clobbered by a callee.
    pub const CALLER_SAVED: [PhysReg; 3] = Self::ALLOCATABLE;

    pub const ACCUMULATOR: PhysReg = PhysReg::Eax;
    pub const REMAINDER: PhysReg = PhysReg::Edx;
    pub const STACK_PTR: PhysReg = PhysReg::Esp;
    pub const FRAME_PTR: PhysReg = PhysReg::Ebp;

    /// Bytes per stack slot and per pushed argument.
    pub const WORD: i32 = 4;

    pub fn as_str(&self) -> &'static str {
        match self {
            PhysReg::Eax => "eax",
            PhysReg::Ebx => "ebx",
            PhysReg::Ecx => "ecx",
            PhysReg::Edx => "edx",
            PhysReg::Esi => "esi",
            PhysReg::Edi => "edi",
            PhysReg::Esp => "esp",
            PhysReg::Ebp => "ebp",
        }
    }

    /// Stack and frame pointers are managed structurally, never allocated.
    pub fn is_frame_reg(&self) -> bool {
        matches!(self, PhysReg::Esp | PhysReg::Ebp)
    }
}

impl fmt::Display for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame offset of a 1-based local slot: `[ebp - 4*slot]`.
pub fn slot_offset(slot: usize) -> i32 {
    -(slot as i32) * PhysReg::WORD
}

/// Frame offset of the `index`th incoming argument, above the saved frame
/// pointer and return address.
pub fn arg_offset(index: usize) -> i32 {
    (index as i32 + 2) * PhysReg::WORD
}
