//! x86 machine-instruction types.
//!
//! This module defines register references (`Reg`), memory and instruction
//! operands (`MemRef`, `Operand`), condition codes (`Cond`) and the typed
//! instruction set (`AsmInstr`) shared by the tiler, the register allocators
//! and the emitter. Instructions print in NASM syntax.

use super::abi::PhysReg;
use std::fmt;

// ============================================================================
// Registers
// ============================================================================

/// A virtual register produced by tiling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AbstractReg {
    /// An IR temporary, named by the front end or the canonicalizer.
    Temp(String),
    /// A register the tiler invented for an intermediate value.
    Fresh(u32),
}

impl fmt::Display for AbstractReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractReg::Temp(name) => write!(f, "%{name}"),
            AbstractReg::Fresh(n) => write!(f, "%r{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reg {
    Phys(PhysReg),
    Abstract(AbstractReg),
    /// Placeholder for the destination of an expression tile; replaced when
    /// the tile is flattened into its parent.
    Dest,
}

impl Reg {
    pub fn temp(name: impl Into<String>) -> Self {
        Reg::Abstract(AbstractReg::Temp(name.into()))
    }

    pub fn as_abstract(&self) -> Option<&AbstractReg> {
        match self {
            Reg::Abstract(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_phys(&self) -> Option<PhysReg> {
        match self {
            Reg::Phys(p) => Some(*p),
            _ => None,
        }
    }
}

impl From<PhysReg> for Reg {
    fn from(p: PhysReg) -> Self {
        Reg::Phys(p)
    }
}

impl From<AbstractReg> for Reg {
    fn from(a: AbstractReg) -> Self {
        Reg::Abstract(a)
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reg::Phys(p) => write!(f, "{p}"),
            Reg::Abstract(a) => write!(f, "{a}"),
            Reg::Dest => f.write_str("%dest"),
        }
    }
}

// ============================================================================
// Operands
// ============================================================================

/// `[symbol + base + index + disp]`, any part optional.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemRef {
    pub symbol: Option<String>,
    pub base: Option<Reg>,
    pub index: Option<Reg>,
    pub disp: i32,
}

impl MemRef {
    pub fn base(base: impl Into<Reg>) -> Self {
        Self {
            base: Some(base.into()),
            ..Self::default()
        }
    }

    pub fn base_disp(base: impl Into<Reg>, disp: i32) -> Self {
        Self {
            base: Some(base.into()),
            disp,
            ..Self::default()
        }
    }

    pub fn base_index(base: impl Into<Reg>, index: impl Into<Reg>) -> Self {
        Self {
            base: Some(base.into()),
            index: Some(index.into()),
            ..Self::default()
        }
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Self {
            symbol: Some(name.into()),
            ..Self::default()
        }
    }

    /// A local slot in the current frame.
    pub fn frame(offset: i32) -> Self {
        Self::base_disp(PhysReg::FRAME_PTR, offset)
    }

    fn regs(&self) -> impl Iterator<Item = &Reg> {
        self.base.iter().chain(self.index.iter())
    }

    fn regs_mut(&mut self) -> impl Iterator<Item = &mut Reg> {
        self.base.iter_mut().chain(self.index.iter_mut())
    }
}

impl fmt::Display for MemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if let Some(sym) = &self.symbol {
            parts.push(sym.clone());
        }
        parts.extend(self.regs().map(|r| r.to_string()));
        let mut text = parts.join(" + ");
        if text.is_empty() {
            text = self.disp.to_string();
        } else if self.disp > 0 {
            text = format!("{text} + {}", self.disp);
        } else if self.disp < 0 {
            text = format!("{text} - {}", -(self.disp as i64));
        }
        write!(f, "[{text}]")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg),
    Mem(MemRef),
    Imm(i32),
    Label(String),
}

impl Operand {
    pub fn label(name: impl Into<String>) -> Self {
        Operand::Label(name.into())
    }

    pub fn as_reg(&self) -> Option<&Reg> {
        match self {
            Operand::Reg(r) => Some(r),
            _ => None,
        }
    }

    fn is_mem(&self) -> bool {
        matches!(self, Operand::Mem(_))
    }

    fn regs(&self) -> Vec<&Reg> {
        match self {
            Operand::Reg(r) => vec![r],
            Operand::Mem(m) => m.regs().collect(),
            Operand::Imm(_) | Operand::Label(_) => Vec::new(),
        }
    }

    fn regs_mut(&mut self) -> Vec<&mut Reg> {
        match self {
            Operand::Reg(r) => vec![r],
            Operand::Mem(m) => m.regs_mut().collect(),
            Operand::Imm(_) | Operand::Label(_) => Vec::new(),
        }
    }
}

impl From<Reg> for Operand {
    fn from(r: Reg) -> Self {
        Operand::Reg(r)
    }
}

impl From<PhysReg> for Operand {
    fn from(p: PhysReg) -> Self {
        Operand::Reg(Reg::Phys(p))
    }
}

impl From<MemRef> for Operand {
    fn from(m: MemRef) -> Self {
        Operand::Mem(m)
    }
}

impl From<i32> for Operand {
    fn from(v: i32) -> Self {
        Operand::Imm(v)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{r}"),
            Operand::Mem(m) => write!(f, "{m}"),
            Operand::Imm(v) => write!(f, "{v}"),
            Operand::Label(l) => f.write_str(l),
        }
    }
}

// ============================================================================
// Condition codes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Cond {
    /// Mnemonic suffix shared by `setCC` and `jCC`.
    pub fn suffix(&self) -> &'static str {
        match self {
            Cond::Eq => "e",
            Cond::Ne => "nz",
            Cond::Lt => "l",
            Cond::Gt => "g",
            Cond::Le => "le",
            Cond::Ge => "ge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    And,
    Or,
}

impl AluOp {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Sub => "sub",
            AluOp::And => "and",
            AluOp::Or => "or",
        }
    }
}

// ============================================================================
// Typed x86 instruction
// ============================================================================

/// A typed x86 instruction.
///
/// Implicit register effects (`imul`, `idiv`, `cdq`, `setCC`, `call`, `ret`,
/// `int 0x80`) are part of [`AsmInstr::uses`] and [`AsmInstr::defs`] so that
/// the allocator sees them as real-register windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmInstr {
    // ── Data movement ───────────────────────────────────────────────────
    Mov { dst: Operand, src: Operand },
    Lea { dst: Reg, addr: MemRef },
    Push { src: Operand },
    Pop { dst: Reg },

    // ── Arithmetic ──────────────────────────────────────────────────────
    /// `op dst, src` (dst is both read and written)
    Alu { op: AluOp, dst: Reg, src: Operand },
    /// `imul src`: edx:eax = eax * src
    IMul { src: Operand },
    /// `idiv src`: eax = edx:eax / src, edx = remainder
    IDiv { src: Operand },
    /// Sign-extend eax into edx.
    Cdq,

    // ── Comparison ──────────────────────────────────────────────────────
    Cmp { a: Operand, b: Operand },
    Test { a: Reg, b: Reg },
    /// `setCC al`
    SetCc { cond: Cond },
    /// `movzx dst, al`
    MovZxAl { dst: Reg },

    // ── Control flow ────────────────────────────────────────────────────
    Jmp { target: Operand },
    Jcc { cond: Cond, label: String },
    Call { target: Operand },
    Ret,
    /// `int 0x80` with the syscall number in eax and argument in ebx.
    Int80,

    // ── Pseudo ──────────────────────────────────────────────────────────
    Label(String),
    Comment(String),
}

// ── Convenience constructors ────────────────────────────────────────────

impl AsmInstr {
    pub fn mov(dst: impl Into<Operand>, src: impl Into<Operand>) -> Self {
        AsmInstr::Mov {
            dst: dst.into(),
            src: src.into(),
        }
    }

    pub fn alu(op: AluOp, dst: impl Into<Reg>, src: impl Into<Operand>) -> Self {
        AsmInstr::Alu {
            op,
            dst: dst.into(),
            src: src.into(),
        }
    }

    pub fn cmp(a: impl Into<Operand>, b: impl Into<Operand>) -> Self {
        AsmInstr::Cmp {
            a: a.into(),
            b: b.into(),
        }
    }

    pub fn push(src: impl Into<Operand>) -> Self {
        AsmInstr::Push { src: src.into() }
    }

    pub fn jmp_label(label: impl Into<String>) -> Self {
        AsmInstr::Jmp {
            target: Operand::Label(label.into()),
        }
    }

    pub fn call_label(label: impl Into<String>) -> Self {
        AsmInstr::Call {
            target: Operand::Label(label.into()),
        }
    }

    /// Store a register into a frame slot.
    pub fn store_frame(offset: i32, src: PhysReg) -> Self {
        Self::mov(MemRef::frame(offset), src)
    }

    /// Load a frame slot into a register.
    pub fn load_frame(dst: PhysReg, offset: i32) -> Self {
        Self::mov(dst, MemRef::frame(offset))
    }

    /// Labels and comments emit no machine code.
    pub fn is_real(&self) -> bool {
        !matches!(self, AsmInstr::Label(_) | AsmInstr::Comment(_))
    }

    /// Every register operand is physical.
    pub fn is_allocated(&self) -> bool {
        let mut copy = self.clone();
        let mut physical = true;
        copy.for_each_reg_mut(&mut |r| physical &= matches!(r, Reg::Phys(_)));
        physical
    }

    pub fn is_call(&self) -> bool {
        matches!(self, AsmInstr::Call { .. })
    }

    /// The label a direct jump or branch may transfer control to.
    pub fn jump_target(&self) -> Option<&str> {
        match self {
            AsmInstr::Jmp {
                target: Operand::Label(l),
            } => Some(l.as_str()),
            AsmInstr::Jcc { label, .. } => Some(label.as_str()),
            _ => None,
        }
    }

    /// Registers read, including implicit operands.
    pub fn uses(&self) -> Vec<Reg> {
        let eax = Reg::Phys(PhysReg::Eax);
        let edx = Reg::Phys(PhysReg::Edx);
        let mut out: Vec<Reg> = match self {
            AsmInstr::Mov { dst, src } => {
                let mut v: Vec<Reg> = src.regs().into_iter().cloned().collect();
                if dst.is_mem() {
                    v.extend(dst.regs().into_iter().cloned());
                }
                v
            }
            AsmInstr::Lea { addr, .. } => addr.regs().cloned().collect(),
            AsmInstr::Push { src } => src.regs().into_iter().cloned().collect(),
            AsmInstr::Pop { .. } => Vec::new(),
            AsmInstr::Alu { dst, src, .. } => {
                let mut v = vec![dst.clone()];
                v.extend(src.regs().into_iter().cloned());
                v
            }
            AsmInstr::IMul { src } => {
                let mut v = vec![eax];
                v.extend(src.regs().into_iter().cloned());
                v
            }
            AsmInstr::IDiv { src } => {
                let mut v = vec![eax, edx];
                v.extend(src.regs().into_iter().cloned());
                v
            }
            AsmInstr::Cdq => vec![eax],
            AsmInstr::Cmp { a, b } => a.regs().into_iter().chain(b.regs()).cloned().collect(),
            AsmInstr::Test { a, b } => vec![a.clone(), b.clone()],
            AsmInstr::SetCc { .. } => Vec::new(),
            AsmInstr::MovZxAl { .. } => vec![eax],
            AsmInstr::Jmp { target } | AsmInstr::Call { target } => {
                target.regs().into_iter().cloned().collect()
            }
            AsmInstr::Ret => vec![eax],
            AsmInstr::Int80 => vec![eax, Reg::Phys(PhysReg::Ebx)],
            AsmInstr::Jcc { .. } | AsmInstr::Label(_) | AsmInstr::Comment(_) => Vec::new(),
        };
        dedup(&mut out);
        out
    }

    /// Registers written, including implicit results.
    pub fn defs(&self) -> Vec<Reg> {
        let eax = Reg::Phys(PhysReg::Eax);
        let edx = Reg::Phys(PhysReg::Edx);
        match self {
            AsmInstr::Mov {
                dst: Operand::Reg(r),
                ..
            } => vec![r.clone()],
            AsmInstr::Lea { dst, .. }
            | AsmInstr::Pop { dst }
            | AsmInstr::Alu { dst, .. }
            | AsmInstr::MovZxAl { dst } => vec![dst.clone()],
            AsmInstr::IMul { .. } | AsmInstr::IDiv { .. } => vec![eax, edx],
            AsmInstr::Cdq => vec![edx],
            AsmInstr::SetCc { .. } | AsmInstr::Call { .. } => vec![eax],
            _ => Vec::new(),
        }
    }

    /// Visit every explicit register operand.
    pub fn for_each_reg_mut(&mut self, f: &mut impl FnMut(&mut Reg)) {
        let regs: Vec<&mut Reg> = match self {
            AsmInstr::Mov { dst, src } | AsmInstr::Cmp { a: dst, b: src } => {
                let mut v = dst.regs_mut();
                v.extend(src.regs_mut());
                v
            }
            AsmInstr::Lea { dst, addr } => {
                let mut v = vec![dst];
                v.extend(addr.regs_mut());
                v
            }
            AsmInstr::Alu { dst, src, .. } => {
                let mut v = vec![dst];
                v.extend(src.regs_mut());
                v
            }
            AsmInstr::Push { src: op }
            | AsmInstr::IMul { src: op }
            | AsmInstr::IDiv { src: op }
            | AsmInstr::Jmp { target: op }
            | AsmInstr::Call { target: op } => op.regs_mut(),
            AsmInstr::Pop { dst } | AsmInstr::MovZxAl { dst } => vec![dst],
            AsmInstr::Test { a, b } => vec![a, b],
            AsmInstr::Cdq
            | AsmInstr::SetCc { .. }
            | AsmInstr::Jcc { .. }
            | AsmInstr::Ret
            | AsmInstr::Int80
            | AsmInstr::Label(_)
            | AsmInstr::Comment(_) => Vec::new(),
        };
        for r in regs {
            f(r);
        }
    }

    /// Distinct abstract registers this instruction mentions, in operand order.
    pub fn abstract_regs(&self) -> Vec<AbstractReg> {
        let mut out: Vec<AbstractReg> = Vec::new();
        for r in self.uses().into_iter().chain(self.defs()) {
            if let Reg::Abstract(a) = r {
                if !out.contains(&a) {
                    out.push(a);
                }
            }
        }
        out
    }
}

fn dedup(regs: &mut Vec<Reg>) {
    let mut seen: Vec<Reg> = Vec::with_capacity(regs.len());
    regs.retain(|r| {
        if seen.contains(r) {
            false
        } else {
            seen.push(r.clone());
            true
        }
    });
}

// ── Display: NASM text ────────────────────────────────────────

/// Operand-size prefix needed when neither operand names a register.
fn size_prefix(a: &Operand, b: &Operand) -> &'static str {
    if (a.is_mem() && !matches!(b, Operand::Reg(_))) || (b.is_mem() && !matches!(a, Operand::Reg(_)))
    {
        "dword "
    } else {
        ""
    }
}

impl fmt::Display for AsmInstr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmInstr::Mov { dst, src } => write!(f, "    mov {}{dst}, {src}", size_prefix(dst, src)),
            AsmInstr::Lea { dst, addr } => write!(f, "    lea {dst}, {addr}"),
            AsmInstr::Push { src } if src.is_mem() => write!(f, "    push dword {src}"),
            AsmInstr::Push { src } => write!(f, "    push {src}"),
            AsmInstr::Pop { dst } => write!(f, "    pop {dst}"),
            AsmInstr::Alu { op, dst, src } => write!(f, "    {} {dst}, {src}", op.mnemonic()),
            AsmInstr::IMul { src } if src.is_mem() => write!(f, "    imul dword {src}"),
            AsmInstr::IMul { src } => write!(f, "    imul {src}"),
            AsmInstr::IDiv { src } if src.is_mem() => write!(f, "    idiv dword {src}"),
            AsmInstr::IDiv { src } => write!(f, "    idiv {src}"),
            AsmInstr::Cdq => f.write_str("    cdq"),
            AsmInstr::Cmp { a, b } => write!(f, "    cmp {}{a}, {b}", size_prefix(a, b)),
            AsmInstr::Test { a, b } => write!(f, "    test {a}, {b}"),
            AsmInstr::SetCc { cond } => write!(f, "    set{} al", cond.suffix()),
            AsmInstr::MovZxAl { dst } => write!(f, "    movzx {dst}, al"),
            AsmInstr::Jmp { target } => write!(f, "    jmp {target}"),
            AsmInstr::Jcc { cond, label } => write!(f, "    j{} {label}", cond.suffix()),
            AsmInstr::Call { target } => write!(f, "    call {target}"),
            AsmInstr::Ret => f.write_str("    ret"),
            AsmInstr::Int80 => f.write_str("    int 0x80"),
            AsmInstr::Label(l) => write!(f, "{l}:"),
            AsmInstr::Comment(text) => write!(f, "    ; {text}"),
        }
    }
}

// ============================================================================
// Annotated instruction (regalloc output)
// ============================================================================

/// An instruction paired with an optional assembly comment.
/// Used as the output type for register allocator operations.
pub type AnnotatedInstr = (AsmInstr, Option<String>);
