//! Pass State and Vector Split Index
//!
//! `SplitState` owns everything the pass tracks while rewriting one program:
//! the per-value SSA states, the index from split vectors to their component
//! values, deferred loop-header phis, and the instruction buffer of the block
//! currently being rebuilt.

use super::classify::Classification;
use super::phi::PhiStub;
use super::value_state::{BlockDef, ValueRef, ValueState};
use super::SplitStats;
use crate::ir::blocks::insert_before_region_end;
use crate::ir::dominance::DominanceFrontiers;
use crate::ir::{BlockId, Instruction, Operand, Program, Temp, TempId};
use fxhash::FxHashMap;
use log::trace;
use std::collections::BTreeSet;

/// Maps each split vector to its component values, in slot order.
#[derive(Debug, Clone, Default)]
pub struct VectorSplitIndex {
    splits: FxHashMap<TempId, Vec<ValueRef>>,
}

impl VectorSplitIndex {
    pub fn get(&self, id: TempId) -> Option<&[ValueRef]> {
        self.splits.get(&id).map(|refs| refs.as_slice())
    }

    pub fn contains(&self, id: TempId) -> bool {
        self.splits.contains_key(&id)
    }

    fn insert(&mut self, id: TempId, refs: Vec<ValueRef>) {
        self.splits.insert(id, refs);
    }

    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }
}

/// The block whose instruction list is being rebuilt. Instructions meant for
/// this block go into the buffer, not into the program.
#[derive(Debug, Default)]
pub(super) struct WorkingBlock {
    pub block: Option<BlockId>,
    pub instructions: Vec<Instruction>,
}

/// A phi synthesized while resolving a value. Kept out of the blocks until
/// the end of the pass so later definitions can still patch its operands.
#[derive(Debug)]
pub(super) struct InsertedPhi {
    pub block: BlockId,
    pub instr: Instruction,
}

/// A synthesized phi whose operands still have to be resolved.
#[derive(Debug, Clone, Copy)]
pub(super) struct PendingPhi {
    pub phi: usize,
    pub value: ValueRef,
}

pub struct SplitState<'p> {
    pub(super) program: &'p mut Program,
    pub(super) classification: Classification,
    pub(super) frontiers: DominanceFrontiers,
    pub(super) values: FxHashMap<ValueRef, ValueState>,
    pub(super) vector_splits: VectorSplitIndex,
    pub(super) header_phis: FxHashMap<BlockId, Vec<PhiStub>>,
    /// Loop headers with deferred work, processed lowest index first
    pub(super) header_worklist: BTreeSet<BlockId>,
    /// Header whose deferred phis are being lowered right now
    pub(super) active_header: Option<BlockId>,
    pub(super) working: WorkingBlock,
    pub(super) inserted_phis: Vec<InsertedPhi>,
    pub(super) pending_phis: Vec<PendingPhi>,
    pub(super) resolving: bool,
    pub(super) stats: SplitStats,
}

impl<'p> SplitState<'p> {
    pub fn new(
        program: &'p mut Program,
        classification: Classification,
        frontiers: DominanceFrontiers,
    ) -> Self {
        let stats = SplitStats {
            temps_split: classification.split_count(),
            temps_preserved: classification.preserved_count(),
            ..SplitStats::default()
        };
        Self {
            program,
            classification,
            frontiers,
            values: FxHashMap::default(),
            vector_splits: VectorSplitIndex::default(),
            header_phis: FxHashMap::default(),
            header_worklist: BTreeSet::new(),
            active_header: None,
            working: WorkingBlock::default(),
            inserted_phis: Vec::new(),
            pending_phis: Vec::new(),
            resolving: false,
            stats,
        }
    }

    pub fn stats(&self) -> SplitStats {
        self.stats
    }

    pub fn vector_splits(&self) -> &VectorSplitIndex {
        &self.vector_splits
    }

    pub fn value_state(&self, value: ValueRef) -> Option<&ValueState> {
        self.values.get(&value)
    }

    /// Record that scalar `id` is represented by `op` from `block` onwards.
    pub(super) fn remap_temp(&mut self, id: TempId, block: BlockId, op: Operand) {
        let value = ValueRef::Scalar(id);
        if !self.values.contains_key(&value) {
            let rc = self.program.temp_rc(id);
            self.values.insert(value, ValueState::new(value, rc));
        }
        trace!("split_vectors: {} = {} in {}", id, op, block);
        self.add_output(value, block, BlockDef::new(op, true));
    }

    /// Record new values for every component of vector `id` in `block`.
    ///
    /// The first time a vector is split its components become tracked
    /// values. A component that is itself a tracked scalar is shared rather
    /// than duplicated.
    pub(super) fn split_vector(&mut self, id: TempId, block: BlockId, ops: &[Operand]) {
        let refs = match self.vector_splits.get(id) {
            Some(refs) => refs.to_vec(),
            None => {
                let elem = self.program.temp_rc(id).elem();
                let mut refs = Vec::with_capacity(ops.len());
                for (index, op) in ops.iter().enumerate() {
                    if let Some(scalar) = op.temp_id().map(ValueRef::Scalar) {
                        if self.values.contains_key(&scalar) {
                            refs.push(scalar);
                            continue;
                        }
                    }
                    let component = ValueRef::VectorComponent {
                        vector: id,
                        index: index as u32,
                    };
                    self.values
                        .insert(component, ValueState::new(component, elem));
                    refs.push(component);
                }
                self.vector_splits.insert(id, refs.clone());
                refs
            }
        };

        debug_assert_eq!(refs.len(), ops.len(), "component count of {}", id);
        for (value, op) in refs.into_iter().zip(ops) {
            self.add_output(value, block, BlockDef::new(*op, false));
        }
    }

    /// Current values of components `range` of `temp`, valid in `block`.
    ///
    /// A vector that was never decomposed is split in place.
    pub(super) fn vector_components(
        &mut self,
        block: BlockId,
        temp: Temp,
        range: std::ops::Range<usize>,
    ) -> Result<Vec<Operand>, super::SplitError> {
        if let Some(refs) = self.vector_splits.get(temp.id).map(|refs| refs[range.clone()].to_vec()) {
            return refs
                .into_iter()
                .map(|value| self.get_output(value, block))
                .collect();
        }

        let elem = temp.rc.elem();
        let parts: Vec<Temp> = (0..temp.size())
            .map(|_| self.program.allocate_tmp(elem))
            .collect();
        self.emit(Instruction::split_vector(temp.into(), parts.clone()));
        Ok(parts[range].iter().map(|&t| t.into()).collect())
    }

    /// Append to the block being rebuilt.
    pub(super) fn emit(&mut self, instr: Instruction) {
        debug_assert!(self.working.block.is_some());
        self.working.instructions.push(instr);
    }

    /// Place `instr` at the end of `block`, before its region-end marker.
    pub(super) fn insert_before_region_end(&mut self, block: BlockId, instr: Instruction) {
        if self.working.block == Some(block) {
            insert_before_region_end(&mut self.working.instructions, instr);
        } else {
            self.program.block_mut(block).insert_before_region_end(instr);
        }
    }

    /// Move the synthesized phis to the top of their blocks.
    pub(super) fn materialize_phis(&mut self) {
        let mut per_block: FxHashMap<BlockId, Vec<Instruction>> = FxHashMap::default();
        for InsertedPhi { block, instr } in self.inserted_phis.drain(..) {
            per_block.entry(block).or_default().push(instr);
        }
        for (block, phis) in per_block {
            self.program.block_mut(block).instructions.splice(0..0, phis);
        }
    }
}
