//! The startup artifact: static storage, initializers, entry call, exit.

use super::{prologue, render};
use crate::backend::abi::PhysReg;
use crate::backend::instruction::{AnnotatedInstr, AsmInstr};
use crate::ir::conventions::START_LABEL;
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// Linux `exit` system call number.
const SYS_EXIT: i32 = 1;

pub(crate) fn render_startup(
    fields: &[String],
    imports: &BTreeSet<String>,
    frame_slots: usize,
    init: &[AnnotatedInstr],
    entry: &str,
    emit_comments: bool,
) -> String {
    let mut text = String::new();

    let _ = writeln!(text, "section .data");
    for field in fields {
        let _ = writeln!(text, "{field}: dd 0");
    }
    let _ = writeln!(text);

    let _ = writeln!(text, "section .text");
    for field in fields {
        let _ = writeln!(text, "global {field}");
    }
    let _ = writeln!(text, "global {START_LABEL}");
    for import in imports {
        let _ = writeln!(text, "extern {import}");
    }
    let _ = writeln!(text);

    let _ = writeln!(text, "{START_LABEL}:");
    render(&prologue(frame_slots), init, emit_comments, &mut text);
    render(&exit_sequence(entry), &[], emit_comments, &mut text);
    text
}

/// Tear down the initializer frame, call the entry point and exit with its
/// return value.
fn exit_sequence(entry: &str) -> Vec<AsmInstr> {
    vec![
        AsmInstr::mov(PhysReg::STACK_PTR, PhysReg::FRAME_PTR),
        AsmInstr::Pop {
            dst: PhysReg::FRAME_PTR.into(),
        },
        AsmInstr::call_label(entry),
        AsmInstr::mov(PhysReg::Ebx, PhysReg::Eax),
        AsmInstr::mov(PhysReg::Eax, SYS_EXIT),
        AsmInstr::Int80,
    ]
}
