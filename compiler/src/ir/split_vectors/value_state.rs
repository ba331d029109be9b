//! Per-Value SSA State
//!
//! Each tracked scalar value records, per block, which operand represents it
//! at the end of that block. Definitions are added as the rewriter walks the
//! blocks in order; reads are answered lazily by walking the dominator tree
//! and inserting phis where definitions from different paths meet.
//!
//! **Placeholders**: when a block gets a definition, every block in its
//! dominance frontier (transitively) receives an entry without a value. A
//! read that reaches such an entry knows a phi is required there.
//!
//! **Loop headers**: a back edge is only seen after the loop body has been
//! rewritten. Reads that cross a header before that point get a header phi
//! whose back-edge operands are resolved once all blocks are done.

use super::phi::PhiStub;
use super::state::{InsertedPhi, PendingPhi, SplitState};
use super::SplitError;
use crate::ir::{
    AluOp, BlockId, BlockList, Instruction, Operand, RegClass, RegType, TempId,
};
use fxhash::FxHashMap;
use log::trace;
use std::fmt;

/// A scalar value tracked by the pass: either a single-slot temporary or one
/// component of a split vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueRef {
    Scalar(TempId),
    VectorComponent { vector: TempId, index: u32 },
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueRef::Scalar(id) => write!(f, "{}", id),
            ValueRef::VectorComponent { vector, index } => write!(f, "{}[{}]", vector, index),
        }
    }
}

/// The value's representation at the end of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDef {
    /// `None` marks a placeholder: a merge point whose phi is not built yet
    pub value: Option<Operand>,
    /// Synthesized phi that defines `value`, if any
    pub phi: Option<usize>,
    /// Whether anything has read this definition
    pub used: bool,
}

impl BlockDef {
    pub fn new(value: Operand, used: bool) -> Self {
        Self {
            value: Some(value),
            phi: None,
            used,
        }
    }

    pub fn placeholder() -> Self {
        Self {
            value: None,
            phi: None,
            used: true,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.value.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ValueState {
    pub value: ValueRef,
    /// Single-slot class of the value; selects the CFG domain
    pub rc: RegClass,
    defs: FxHashMap<BlockId, BlockDef>,
}

impl ValueState {
    pub fn new(value: ValueRef, rc: RegClass) -> Self {
        debug_assert_eq!(rc.size(), 1, "tracked values are single-slot");
        Self {
            value,
            rc,
            defs: FxHashMap::default(),
        }
    }

    pub fn def(&self, block: BlockId) -> Option<&BlockDef> {
        self.defs.get(&block)
    }

    /// Blocks with an entry, in index order.
    pub fn blocks(&self) -> Vec<BlockId> {
        let mut blocks: Vec<BlockId> = self.defs.keys().copied().collect();
        blocks.sort_unstable();
        blocks
    }

    /// Whether the definition `id` made in `block` was ever read.
    ///
    /// A definition superseded later in the same block, or a block without
    /// an entry, counts as used.
    pub fn output_is_used(&self, block: BlockId, id: TempId) -> bool {
        match self.defs.get(&block) {
            Some(def) if def.value.and_then(|op| op.temp_id()) == Some(id) => def.used,
            _ => true,
        }
    }

    /// A loop header lacking a value needs a phi if the value may arrive
    /// along a back edge: the header is itself a merge point, the read comes
    /// from inside the loop, or the loop body defines the value.
    fn needs_header_phi(&self, header: BlockId, query: BlockId, last_pred: Option<BlockId>) -> bool {
        if self.defs.contains_key(&header) {
            return true;
        }
        let Some(last_pred) = last_pred else {
            return false;
        };
        query < last_pred
            || (header.0..last_pred.0).any(|b| self.defs.contains_key(&BlockId(b)))
    }
}

impl SplitState<'_> {
    fn value_state_mut(&mut self, value: ValueRef) -> &mut ValueState {
        self.values
            .get_mut(&value)
            .unwrap_or_else(|| panic!("value {} is not tracked", value))
    }

    /// The operand that holds `value` throughout `block`.
    pub(super) fn get_output(&mut self, value: ValueRef, block: BlockId) -> Result<Operand, SplitError> {
        let op = self.find_output(value, block)?;
        self.resolve_pending_phis()?;
        Ok(op)
    }

    fn find_output(&mut self, value: ValueRef, block: BlockId) -> Result<Operand, SplitError> {
        let rc = self.values[&value].rc;
        let domain = rc.domain();

        let mut cursor = Some(block);
        while let Some(current) = cursor {
            let info = self.program.block(current);
            let loop_header = info.loop_header;
            let num_preds = info.preds(domain).len();
            let last_pred = info.preds(domain).last().copied();
            let idom = info.idom(domain);

            let state = &self.values[&value];
            let has_value = state.def(current).is_some_and(|def| def.value.is_some());
            if loop_header && !has_value && state.needs_header_phi(current, block, last_pred) {
                let tmp = self.program.allocate_tmp(rc);
                trace!("split_vectors: header phi {} for {} at {}", tmp, value, current);
                self.add_output(value, current, BlockDef::new(tmp.into(), true));
                self.add_header_phi(current, PhiStub::for_value(rc, tmp, value, num_preds));
                return Ok(tmp.into());
            }

            let state = self.value_state_mut(value);
            match state.defs.get_mut(&current) {
                None => cursor = idom,
                Some(def) => {
                    if let Some(op) = def.value {
                        def.used = true;
                        return Ok(op);
                    }
                    return Ok(self.insert_merge_phi(value, rc, current, num_preds));
                }
            }
        }

        Err(SplitError::UndefinedValue { block, value })
    }

    /// Create a phi for `value` at a placeholder. Its operands are filled in
    /// by `resolve_pending_phis`.
    fn insert_merge_phi(&mut self, value: ValueRef, rc: RegClass, block: BlockId, num_preds: usize) -> Operand {
        let tmp = self.program.allocate_tmp(rc);
        let phi = self.inserted_phis.len();
        self.inserted_phis.push(InsertedPhi {
            block,
            instr: Instruction::phi(tmp, vec![Operand::Undefined(rc); num_preds]),
        });
        self.add_output(
            value,
            block,
            BlockDef {
                value: Some(tmp.into()),
                phi: Some(phi),
                used: true,
            },
        );
        self.pending_phis.push(PendingPhi { phi, value });
        self.stats.phis_inserted += 1;
        trace!("split_vectors: phi {} for {} at {}", tmp, value, block);
        tmp.into()
    }

    /// Fill in operands of synthesized phis. Resolving one operand may create
    /// further phis; only the outermost call drains the queue.
    fn resolve_pending_phis(&mut self) -> Result<(), SplitError> {
        if self.resolving {
            return Ok(());
        }
        self.resolving = true;
        let result = self.drain_pending_phis();
        self.resolving = false;
        result
    }

    fn drain_pending_phis(&mut self) -> Result<(), SplitError> {
        while let Some(PendingPhi { phi, value }) = self.pending_phis.pop() {
            let block = self.inserted_phis[phi].block;
            let rc = self.values[&value].rc;
            let preds: BlockList = self.program.block(block).preds(rc.domain()).into();
            for (i, pred) in preds.into_iter().enumerate() {
                let op = self.get_phi_operand(block, pred, rc.ty(), value)?;
                self.inserted_phis[phi].instr.operands[i] = op;
            }
        }
        Ok(())
    }

    /// Operand for the `pred` edge of a phi in `block` whose result lives in
    /// `def_type` registers. A divergent value feeding a uniform phi is made
    /// uniform at the end of the predecessor.
    pub(super) fn get_phi_operand(
        &mut self,
        block: BlockId,
        pred: BlockId,
        def_type: RegType,
        value: ValueRef,
    ) -> Result<Operand, SplitError> {
        let op = self.get_output(value, pred)?;
        let Some(temp) = op.get_temp() else {
            return Ok(op);
        };
        if def_type != RegType::Sgpr || temp.rc.ty() == RegType::Sgpr {
            return Ok(op);
        }

        let uniform = self
            .program
            .allocate_tmp(RegClass::new(RegType::Sgpr, temp.size() as u8));
        trace!(
            "split_vectors: {} made uniform as {} on edge {} -> {}",
            temp,
            uniform,
            pred,
            block
        );
        self.insert_before_region_end(
            pred,
            Instruction::alu(AluOp::ReadFirstLane, vec![uniform], vec![op]),
        );
        self.stats.copies_inserted += 1;
        Ok(uniform.into())
    }

    /// Record `def` as the value of `value` at the end of `block`.
    ///
    /// Replacing an earlier definition patches synthesized phis that read the
    /// old one. Every block in the iterated dominance frontier that has no
    /// entry yet gets a placeholder.
    pub(super) fn add_output(&mut self, value: ValueRef, block: BlockId, mut def: BlockDef) {
        let state = self
            .values
            .get_mut(&value)
            .unwrap_or_else(|| panic!("value {} is not tracked", value));
        let domain = state.rc.domain();

        if let Some(old) = state.defs.remove(&block) {
            if let (Some(old_id), Some(new_value)) = (old.value.and_then(|op| op.temp_id()), def.value) {
                for phi in state.defs.values().filter_map(|d| d.phi) {
                    for op in &mut self.inserted_phis[phi].instr.operands {
                        if op.temp_id() == Some(old_id) {
                            *op = new_value;
                            def.used = true;
                        }
                    }
                }
            }
        }
        state.defs.insert(block, def);

        let mut worklist = vec![block];
        while let Some(current) = worklist.pop() {
            for &merge in self.frontiers.frontier(domain, current) {
                if !state.defs.contains_key(&merge) {
                    state.defs.insert(merge, BlockDef::placeholder());
                    worklist.push(merge);
                }
            }
        }
    }
}
