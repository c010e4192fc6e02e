//! Live-interval construction for linear scan.
//!
//! Abstract registers get one `[first, last]` interval each. Physical
//! registers get a list of usage windows instead: a write that does not also
//! read the register starts a new window, and each read extends the current
//! one. An abstract interval may only take a physical register whose windows
//! it does not overlap.

use crate::backend::abi::PhysReg;
use crate::backend::instruction::{AbstractReg, AsmInstr, Reg};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    Unassigned,
    Reg(PhysReg),
    /// 1-based slot below the frame pointer.
    Stack(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    pub reg: AbstractReg,
    pub start: usize,
    pub end: usize,
    pub assignment: Assignment,
}

impl Interval {
    /// Inclusive on both ends.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start <= end && start <= self.end
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.start <= pos && pos <= self.end
    }
}

#[derive(Debug, Clone, Default)]
pub struct LiveIntervals {
    /// In order of first appearance.
    pub intervals: Vec<Interval>,
    /// Usage windows of physical registers, `(start, end)` inclusive.
    pub windows: BTreeMap<PhysReg, Vec<(usize, usize)>>,
    index: HashMap<AbstractReg, usize>,
}

impl LiveIntervals {
    pub fn build(instrs: &[AsmInstr]) -> Self {
        let mut live = LiveIntervals::default();
        for (i, instr) in instrs.iter().enumerate() {
            let uses = instr.uses();
            let defs = instr.defs();

            for r in uses.iter().chain(&defs) {
                if let Reg::Abstract(a) = r {
                    live.touch(a, i);
                }
            }

            for r in &uses {
                if let Some(p) = r.as_phys().filter(|p| !p.is_frame_reg()) {
                    let windows = live.windows.entry(p).or_default();
                    match windows.last_mut() {
                        Some(w) => w.1 = i,
                        None => windows.push((i, i)),
                    }
                }
            }
            for r in &defs {
                if uses.contains(r) {
                    continue;
                }
                if let Some(p) = r.as_phys().filter(|p| !p.is_frame_reg()) {
                    live.windows.entry(p).or_default().push((i, i));
                }
            }
        }
        live
    }

    fn touch(&mut self, reg: &AbstractReg, pos: usize) {
        match self.index.get(reg) {
            Some(&k) => {
                let iv = &mut self.intervals[k];
                iv.start = iv.start.min(pos);
                iv.end = iv.end.max(pos);
            }
            None => {
                self.index.insert(reg.clone(), self.intervals.len());
                self.intervals.push(Interval {
                    reg: reg.clone(),
                    start: pos,
                    end: pos,
                    assignment: Assignment::Unassigned,
                });
            }
        }
    }

    pub fn get(&self, reg: &AbstractReg) -> Option<&Interval> {
        self.index.get(reg).map(|&k| &self.intervals[k])
    }

    /// Stretch every interval live at a label to cover each jump that
    /// targets it, until nothing changes. A back edge would otherwise let a
    /// loop-carried value's register be reused inside the loop.
    pub fn extend_for_labels(&mut self, instrs: &[AsmInstr]) {
        let labels: HashMap<&str, usize> = instrs
            .iter()
            .enumerate()
            .filter_map(|(i, instr)| match instr {
                AsmInstr::Label(l) => Some((l.as_str(), i)),
                _ => None,
            })
            .collect();
        let jumps: Vec<(usize, usize)> = instrs
            .iter()
            .enumerate()
            .filter_map(|(j, instr)| {
                let target = instr.jump_target()?;
                labels.get(target).map(|&pos| (j, pos))
            })
            .collect();

        let mut rounds = 0;
        loop {
            let mut changed = false;
            for &(jump, label) in &jumps {
                for iv in self.intervals.iter_mut() {
                    if iv.contains(label) && iv.end < jump {
                        iv.end = jump;
                        changed = true;
                    }
                }
            }
            rounds += 1;
            if !changed {
                break;
            }
        }
        log::trace!("label extension settled after {rounds} rounds");
    }

    /// Does any usage window of `reg` overlap `[start, end]`?
    pub fn real_conflict(&self, reg: PhysReg, start: usize, end: usize) -> bool {
        self.windows
            .get(&reg)
            .is_some_and(|ws| ws.iter().any(|&(s, e)| s <= end && start <= e))
    }

    pub fn homes(&self) -> HashMap<AbstractReg, Assignment> {
        self.intervals
            .iter()
            .map(|iv| (iv.reg.clone(), iv.assignment))
            .collect()
    }
}
