//! Dead Split Elimination
//!
//! The rewriter splits a vector again after every instruction that reads or
//! defines it whole. Most of those splits are never read. Each one is tagged
//! with the vector it feeds, so once rewriting is done the per-value states
//! tell whether any of its results were observed.

use super::state::SplitState;
use super::value_state::{ValueRef, ValueState};
use crate::ir::{BlockId, Instruction, Opcode, TempId};
use fxhash::FxHashMap;
use log::debug;

impl SplitState<'_> {
    /// Remove tagged splits whose results were never read. Returns the
    /// number removed.
    pub(super) fn eliminate_dead_splits(&mut self) -> usize {
        let mut removed = 0;
        for block in self.program.blocks.iter_mut() {
            let index = block.index;
            let before = block.instructions.len();
            block
                .instructions
                .retain(|instr| !is_dead_split(instr, index, &self.values, &self.vector_splits));
            removed += before - block.instructions.len();
        }

        debug!("split_vectors: removed {} dead splits", removed);
        self.stats.dead_splits_removed += removed;
        removed
    }
}

fn is_dead_split(
    instr: &Instruction,
    block: BlockId,
    values: &FxHashMap<ValueRef, ValueState>,
    splits: &super::state::VectorSplitIndex,
) -> bool {
    if instr.opcode != Opcode::SplitVector || instr.pass_flags == 0 {
        return false;
    }
    let Some(components) = splits.get(TempId(instr.pass_flags)) else {
        return false;
    };

    for (i, (value, def)) in components.iter().zip(&instr.definitions).enumerate() {
        // A repeated component only holds its last definition.
        if components[i + 1..].contains(value) {
            continue;
        }
        let used = values
            .get(value)
            .map_or(true, |state| state.output_is_used(block, def.id));
        if used {
            return false;
        }
    }
    true
}
