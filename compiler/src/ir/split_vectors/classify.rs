//! Split/Preserve Classification
//!
//! Decides, once and before any rewriting, whether each multi-slot temporary
//! is torn into independently tracked scalars or kept as an atomic unit.
//!
//! Seeds:
//! - *split*: results of vector merges, multi-slot operands of vector merges,
//!   and multi-slot sources of vector splits and element extracts;
//! - *preserve*: operands of memory accesses (which need contiguous
//!   registers) and results of anything touching subword classes.
//!
//! Phis and parallel copies tie their results and operands together; both
//! properties flow across those ties until nothing changes. A temporary
//! wanted by both sides is preserved.

use crate::ir::{Instruction, Opcode, Program, TempId};
use fxhash::FxBuildHasher;
use indexmap::IndexSet;
use log::debug;

/// Insertion-ordered set of temporaries
pub type TempSet = IndexSet<TempId, FxBuildHasher>;

/// Result of the split/preserve fixed point. The two sets are disjoint.
#[derive(Debug, Clone, Default)]
pub struct Classification {
    to_split: TempSet,
    to_preserve: TempSet,
}

impl Classification {
    pub fn compute(program: &Program) -> Self {
        let mut sets = Self::default();

        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut progress = false;
            for block in &program.blocks {
                for instr in &block.instructions {
                    progress |= sets.visit(instr);
                }
            }
            if !progress {
                break;
            }
        }

        let Classification {
            to_split,
            to_preserve,
        } = &mut sets;
        to_split.retain(|id| !to_preserve.contains(id));

        // Relevant vectors that neither side claimed stay whole.
        for block in &program.blocks {
            for instr in block.instructions.iter().filter(|i| is_relevant(i)) {
                let temps = instr
                    .definitions
                    .iter()
                    .copied()
                    .chain(instr.uses());
                for temp in temps {
                    if temp.size() > 1 && !to_split.contains(&temp.id) {
                        to_preserve.insert(temp.id);
                    }
                }
            }
        }

        debug!(
            "split_vectors: classified {} temps to split, {} to preserve ({} rounds)",
            sets.to_split.len(),
            sets.to_preserve.len(),
            rounds
        );
        sets
    }

    /// Apply one instruction's constraints. Returns true if a set grew.
    fn visit(&mut self, instr: &Instruction) -> bool {
        let mut progress = false;

        match instr.opcode {
            Opcode::Phi | Opcode::LinearPhi => {
                let Some(def) = instr.definitions.first() else {
                    return false;
                };
                if instr.touches_subdword() {
                    return self.to_preserve.insert(def.id);
                }
                let ops: Vec<TempId> = instr.operands.iter().filter_map(|o| o.temp_id()).collect();
                progress |= self.tie(def.id, &ops);
            }
            Opcode::ParallelCopy => {
                if instr.touches_subdword() {
                    if let Some(def) = instr.definitions.first() {
                        return self.to_preserve.insert(def.id);
                    }
                    return false;
                }
                for (def, op) in instr.definitions.iter().zip(&instr.operands) {
                    if let Some(id) = op.temp_id() {
                        progress |= self.tie(def.id, &[id]);
                    }
                }
            }
            Opcode::CreateVector => {
                let Some(def) = instr.definitions.first() else {
                    return false;
                };
                if def.size() <= 1 {
                    return false;
                }
                if instr.touches_subdword() {
                    return self.to_preserve.insert(def.id);
                }
                progress |= self.to_split.insert(def.id);
                for op in instr.uses().filter(|t| t.size() > 1) {
                    progress |= self.to_split.insert(op.id);
                }
            }
            _ if instr.needs_contiguous_operands() => {
                for op in instr.uses() {
                    progress |= self.to_preserve.insert(op.id);
                }
            }
            Opcode::SplitVector | Opcode::ExtractVector => {
                if instr.touches_subdword() {
                    if let Some(def) = instr.definitions.first() {
                        return self.to_preserve.insert(def.id);
                    }
                    return false;
                }
                if let Some(src) = instr.operands.first().and_then(|o| o.get_temp()) {
                    if src.size() > 1 {
                        progress |= self.to_split.insert(src.id);
                    }
                }
            }
            _ => {}
        }

        progress
    }

    /// Spread both properties across a result and the operands merged into it.
    fn tie(&mut self, def: TempId, ops: &[TempId]) -> bool {
        let mut progress = false;
        let needs_split =
            self.to_split.contains(&def) || ops.iter().any(|id| self.to_split.contains(id));
        let needs_preserve = self.to_preserve.contains(&def)
            || ops.iter().any(|id| self.to_preserve.contains(id));

        if needs_split {
            progress |= self.to_split.insert(def);
            for &id in ops {
                progress |= self.to_split.insert(id);
            }
        }
        if needs_preserve {
            progress |= self.to_preserve.insert(def);
            for &id in ops {
                progress |= self.to_preserve.insert(id);
            }
        }
        progress
    }

    pub fn should_split(&self, id: TempId) -> bool {
        self.to_split.contains(&id)
    }

    pub fn is_preserved(&self, id: TempId) -> bool {
        self.to_preserve.contains(&id)
    }

    pub fn to_split(&self) -> impl Iterator<Item = TempId> + '_ {
        self.to_split.iter().copied()
    }

    pub fn to_preserve(&self) -> impl Iterator<Item = TempId> + '_ {
        self.to_preserve.iter().copied()
    }

    pub fn split_count(&self) -> usize {
        self.to_split.len()
    }

    pub fn preserved_count(&self) -> usize {
        self.to_preserve.len()
    }
}

/// Instructions whose vector operands and results the classifier looks at.
fn is_relevant(instr: &Instruction) -> bool {
    matches!(
        instr.opcode,
        Opcode::CreateVector
            | Opcode::SplitVector
            | Opcode::ExtractVector
            | Opcode::Phi
            | Opcode::LinearPhi
            | Opcode::ParallelCopy
    ) || instr.needs_contiguous_operands()
}
