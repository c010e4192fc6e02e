//! Linear-scan register allocator.
//!
//! Intervals are assigned in order of increasing start. Registers and stack
//! slots are two separate pools; a slot freed by an expired interval is
//! reused before a new one is opened. Around each call, registers holding a
//! value that lives across it are saved to extra slots and restored.

use super::intervals::{Assignment, LiveIntervals};
use super::{check_initialized, emit_c, rewrite_instr, Allocation, RegAllocator};
use crate::backend::abi::{slot_offset, PhysReg};
use crate::backend::instruction::AsmInstr;
use crate::CompileResult;
use std::collections::BTreeSet;

#[derive(Debug, Default)]
pub struct LinearScanAllocator;

impl LinearScanAllocator {
    pub fn new() -> Self {
        Self
    }
}

/// Assign every interval a register or a stack slot. Returns the number of
/// stack slots opened (the high-water mark).
pub fn assign_intervals(live: &mut LiveIntervals) -> usize {
    let mut order: Vec<usize> = (0..live.intervals.len()).collect();
    order.sort_by_key(|&k| (live.intervals[k].start, live.intervals[k].end));

    let mut active: Vec<usize> = Vec::new();
    let mut free_slots: BTreeSet<usize> = BTreeSet::new();
    let mut opened = 0;

    for k in order {
        let (start, end) = (live.intervals[k].start, live.intervals[k].end);

        // Expire intervals that ended before this one starts.
        active.retain(|&a| {
            let iv = &live.intervals[a];
            if iv.end >= start {
                return true;
            }
            if let Assignment::Stack(slot) = iv.assignment {
                free_slots.insert(slot);
            }
            false
        });

        let busy: Vec<PhysReg> = active
            .iter()
            .filter_map(|&a| match live.intervals[a].assignment {
                Assignment::Reg(p) => Some(p),
                _ => None,
            })
            .collect();
        let choice = PhysReg::ALLOCATABLE
            .iter()
            .copied()
            .find(|&p| !busy.contains(&p) && !live.real_conflict(p, start, end));

        live.intervals[k].assignment = match choice {
            Some(p) => Assignment::Reg(p),
            None => {
                let slot = free_slots.pop_first().unwrap_or_else(|| {
                    opened += 1;
                    opened
                });
                Assignment::Stack(slot)
            }
        };
        active.push(k);
    }
    opened
}

impl RegAllocator for LinearScanAllocator {
    fn allocate(&mut self, instrs: Vec<AsmInstr>) -> CompileResult<Allocation> {
        check_initialized(&instrs)?;

        let mut live = LiveIntervals::build(&instrs);
        live.extend_for_labels(&instrs);
        let spill_slots = assign_intervals(&mut live);
        let homes = live.homes();

        let mut out = Vec::with_capacity(instrs.len());
        let mut max_saves = 0;
        for (i, instr) in instrs.into_iter().enumerate() {
            if !instr.is_call() {
                rewrite_instr(instr, &homes, &mut out)?;
                continue;
            }

            let mut saved: Vec<PhysReg> = live
                .intervals
                .iter()
                .filter(|iv| iv.start < i && i < iv.end)
                .filter_map(|iv| match iv.assignment {
                    Assignment::Reg(p) if PhysReg::CALLER_SAVED.contains(&p) => Some(p),
                    _ => None,
                })
                .collect();
            saved.sort();
            saved.dedup();
            max_saves = max_saves.max(saved.len());

            for (k, &p) in saved.iter().enumerate() {
                let offset = slot_offset(spill_slots + k + 1);
                emit_c(&mut out, AsmInstr::store_frame(offset, p), format!("save {p}"));
            }
            rewrite_instr(instr, &homes, &mut out)?;
            for (k, &p) in saved.iter().enumerate() {
                let offset = slot_offset(spill_slots + k + 1);
                emit_c(&mut out, AsmInstr::load_frame(p, offset), format!("restore {p}"));
            }
        }

        let spilled = live
            .intervals
            .iter()
            .filter(|iv| matches!(iv.assignment, Assignment::Stack(_)))
            .count();
        log::debug!(
            "linear scan: {} intervals, {} spilled, {} spill slots, {} save slots",
            live.intervals.len(),
            spilled,
            spill_slots,
            max_saves
        );

        Ok(Allocation {
            instrs: out,
            frame_slots: spill_slots + max_saves,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::instruction::Reg;

    fn t(name: &str) -> Reg {
        Reg::temp(name)
    }

    #[test]
    fn overlapping_intervals_get_distinct_registers() {
        let instrs = vec![
            AsmInstr::mov(t("a"), 1),
            AsmInstr::mov(t("b"), 2),
            AsmInstr::push(t("a")),
            AsmInstr::push(t("b")),
        ];
        let mut live = LiveIntervals::build(&instrs);
        assert_eq!(assign_intervals(&mut live), 0);
        let a = live.intervals[0].assignment;
        let b = live.intervals[1].assignment;
        assert!(matches!(a, Assignment::Reg(_)));
        assert_ne!(a, b);
    }

    #[test]
    fn expired_slot_is_reused() {
        // Five values live at once, then five more after they all die.
        let mut instrs = Vec::new();
        for round in 0..2 {
            let names: Vec<String> = (0..5).map(|k| format!("v{round}_{k}")).collect();
            for n in &names {
                instrs.push(AsmInstr::mov(t(n), 1));
            }
            for n in &names {
                instrs.push(AsmInstr::push(t(n)));
            }
        }
        let mut live = LiveIntervals::build(&instrs);
        let opened = assign_intervals(&mut live);
        assert_eq!(opened, 5 - PhysReg::ALLOCATABLE.len());
    }

    #[test]
    fn value_live_across_call_is_saved() {
        let instrs = vec![
            AsmInstr::mov(t("keep"), 7),
            AsmInstr::call_label("f"),
            AsmInstr::mov(t("r"), PhysReg::Eax),
            AsmInstr::push(t("keep")),
            AsmInstr::push(t("r")),
        ];
        let alloc = LinearScanAllocator::new().allocate(instrs).expect("allocate");
        let text: Vec<String> = alloc.instrs.iter().map(|(i, _)| i.to_string()).collect();
        let call = text.iter().position(|l| l.contains("call f")).expect("call");
        assert!(text[call - 1].starts_with("    mov [ebp - 4]"), "{text:?}");
        assert!(text[call + 1].ends_with("[ebp - 4]"), "{text:?}");
        assert_eq!(alloc.frame_slots, 1);
    }
}
