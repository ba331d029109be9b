//! Phi Splitting and Loop-Header Phis
//!
//! A phi of a split vector becomes one phi per component. Phis in ordinary
//! blocks are lowered as soon as they are reached, since every predecessor
//! has already been rewritten. Loop headers are different: the back-edge
//! predecessors come later in block order, so their phis are recorded as
//! stubs and lowered after the whole program has been walked.

use super::state::SplitState;
use super::value_state::ValueRef;
use super::SplitError;
use crate::ir::{BlockId, BlockList, CfgDomain, Instruction, Opcode, Operand, RegClass, RegType, Temp};
use log::debug;
use smallvec::{smallvec, SmallVec};

/// One predecessor's contribution to a deferred phi.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhiOperand {
    /// A tracked value, resolved at the predecessor
    Value(ValueRef),
    /// An operand of the original instruction
    Operand(Operand),
}

/// A phi that still has to be expanded into per-component phis.
#[derive(Debug, Clone)]
pub struct PhiStub {
    /// Class of the original result
    pub rc: RegClass,
    /// One single-slot result per component
    pub defs: Vec<Temp>,
    /// Indexed like the predecessors of the phi's block
    pub operands: Vec<PhiOperand>,
}

impl PhiStub {
    /// A header phi for a single tracked value, reading it on every edge.
    pub fn for_value(rc: RegClass, def: Temp, value: ValueRef, num_preds: usize) -> Self {
        Self {
            rc,
            defs: vec![def],
            operands: vec![PhiOperand::Value(value); num_preds],
        }
    }
}

type Slots = SmallVec<[Operand; 4]>;

impl SplitState<'_> {
    /// Defer a phi until the loop body has been rewritten.
    pub(super) fn add_header_phi(&mut self, header: BlockId, stub: PhiStub) {
        self.header_phis.entry(header).or_default().push(stub);
        if self.active_header != Some(header) {
            self.header_worklist.insert(header);
        }
    }

    /// Expand a phi into one phi per component of its result.
    pub(super) fn lower_phi(&mut self, block: BlockId, stub: &PhiStub) -> Result<Vec<Instruction>, SplitError> {
        let n = stub.defs.len();
        let elem = stub.rc.elem();
        let def_type = stub.rc.ty();
        let preds: BlockList = self.program.block(block).preds(stub.rc.domain()).into();
        debug_assert_eq!(preds.len(), stub.operands.len(), "phi operands of {}", block);

        let mut per_pred: Vec<Slots> = Vec::with_capacity(preds.len());
        for (&pred, operand) in preds.iter().zip(&stub.operands) {
            let slots: Slots = match *operand {
                PhiOperand::Value(value) => {
                    smallvec![self.get_phi_operand(block, pred, def_type, value)?]
                }
                PhiOperand::Operand(Operand::Temp(temp)) => {
                    self.phi_operand_slots(block, pred, def_type, temp)?
                }
                PhiOperand::Operand(Operand::Constant { value, .. }) => {
                    (0..n as u32).map(|i| Operand::constant_slot(value, i)).collect()
                }
                PhiOperand::Operand(Operand::Fixed { reg, rc }) => (0..n as u32)
                    .map(|i| Operand::fixed(reg.advance(4 * i), rc.elem()))
                    .collect(),
                PhiOperand::Operand(Operand::Undefined(_)) => smallvec![Operand::Undefined(elem); n],
            };
            debug_assert_eq!(slots.len(), n, "phi operand slots at {}", pred);
            per_pred.push(slots);
        }

        let phis: Vec<Instruction> = stub
            .defs
            .iter()
            .enumerate()
            .map(|(i, &def)| Instruction::phi(def, per_pred.iter().map(|slots| slots[i]).collect()))
            .collect();

        if self.program.block(block).loop_header {
            self.stats.header_phis += phis.len();
        } else {
            self.stats.phis_inserted += phis.len();
        }
        Ok(phis)
    }

    /// Per-component operands of a vector flowing in from `pred`.
    fn phi_operand_slots(
        &mut self,
        block: BlockId,
        pred: BlockId,
        def_type: RegType,
        temp: Temp,
    ) -> Result<Slots, SplitError> {
        if let Some(refs) = self.vector_splits.get(temp.id).map(<[ValueRef]>::to_vec) {
            return refs
                .into_iter()
                .map(|value| self.get_phi_operand(block, pred, def_type, value))
                .collect();
        }
        let scalar = ValueRef::Scalar(temp.id);
        if self.values.contains_key(&scalar) {
            return Ok(smallvec![self.get_phi_operand(block, pred, def_type, scalar)?]);
        }
        // Operands of a split phi are split themselves, and every split
        // vector is decomposed where it is defined.
        debug_assert_eq!(temp.size(), 1, "{} reaches a split phi undecomposed", temp);
        Ok(smallvec![temp.into()])
    }

    /// Operand of a phi that is kept whole, read on the `pred` edge.
    ///
    /// A tracked scalar is resolved. A vector that only exists as components
    /// is reassembled at the end of the predecessor: a split can register a
    /// preserved multi-slot piece of its source, and that piece may feed a
    /// kept phi.
    pub(super) fn whole_phi_operand(
        &mut self,
        block: BlockId,
        pred: BlockId,
        def_type: RegType,
        op: Operand,
    ) -> Result<Operand, SplitError> {
        let Some(temp) = op.get_temp() else {
            return Ok(op);
        };
        if temp.size() == 1 {
            let scalar = ValueRef::Scalar(temp.id);
            if self.values.contains_key(&scalar) {
                return self.get_phi_operand(block, pred, def_type, scalar);
            }
            return Ok(op);
        }

        let Some(refs) = self.vector_splits.get(temp.id).map(<[ValueRef]>::to_vec) else {
            return Ok(op);
        };
        let components = refs
            .into_iter()
            .map(|value| self.get_phi_operand(block, pred, def_type, value))
            .collect::<Result<Vec<_>, _>>()?;
        let merged = self.program.allocate_tmp(temp.rc);
        self.insert_before_region_end(pred, Instruction::create_vector(merged, components));
        Ok(merged.into())
    }

    /// Resolve the operands of the whole phis at the top of `header` that
    /// read tracked values.
    fn patch_header_phis(&mut self, header: BlockId) -> Result<(), SplitError> {
        let count = self
            .program
            .block(header)
            .instructions
            .iter()
            .take_while(|i| i.is_phi())
            .count();

        for idx in 0..count {
            let instr = &self.program.block(header).instructions[idx];
            let domain = if instr.opcode == Opcode::LinearPhi {
                CfgDomain::Linear
            } else {
                CfgDomain::Logical
            };
            let def_type = instr.definitions[0].rc.ty();
            let operands = instr.operands.clone();
            let preds: BlockList = self.program.block(header).preds(domain).into();

            for (i, (op, &pred)) in operands.into_iter().zip(preds.iter()).enumerate() {
                let resolved = self.whole_phi_operand(header, pred, def_type, op)?;
                if resolved != op {
                    self.program.block_mut(header).instructions[idx].operands[i] = resolved;
                }
            }
        }
        Ok(())
    }

    /// Finish every loop header with deferred work, lowest index first.
    ///
    /// Lowering may place new stubs on this header (drained before moving
    /// on) or on other headers (queued).
    pub(super) fn process_loop_headers(&mut self) -> Result<(), SplitError> {
        while let Some(header) = self.header_worklist.pop_first() {
            debug!("split_vectors: finishing loop header {}", header);
            self.active_header = Some(header);

            self.patch_header_phis(header)?;
            let mut lowered = Vec::new();
            while let Some(stubs) = self.header_phis.remove(&header) {
                for stub in &stubs {
                    lowered.extend(self.lower_phi(header, stub)?);
                }
            }
            self.program
                .block_mut(header)
                .instructions
                .splice(0..0, lowered);

            self.active_header = None;
        }
        Ok(())
    }
}
