//! Instruction Rewriting
//!
//! Walks every block in order and rebuilds its instruction list. Vector
//! merges, splits, extracts and copies of split vectors turn into value
//! bookkeeping and mostly disappear. Everything else keeps its shape: split
//! vectors it reads are reassembled right before it and split again right
//! after, and vector results it defines are split immediately.

use super::phi::{PhiOperand, PhiStub};
use super::state::SplitState;
use super::value_state::ValueRef;
use super::SplitError;
use crate::ir::{
    AluOp, BlockId, BlockList, CfgDomain, Instruction, Opcode, Operand, RegClass, RegType, Temp,
};
use log::trace;

impl SplitState<'_> {
    pub(super) fn rewrite_blocks(&mut self) -> Result<(), SplitError> {
        for index in 0..self.program.blocks.len() {
            let block = self.program.blocks[index].index;
            let instructions = std::mem::take(&mut self.program.blocks[index].instructions);

            self.working.block = Some(block);
            self.working.instructions = Vec::with_capacity(instructions.len());
            for instr in instructions {
                self.rewrite_instruction(block, instr)?;
            }

            self.program.blocks[index].instructions = std::mem::take(&mut self.working.instructions);
            self.working.block = None;
        }
        Ok(())
    }

    fn rewrite_instruction(&mut self, block: BlockId, mut instr: Instruction) -> Result<(), SplitError> {
        instr.pass_flags = 0;
        match instr.opcode {
            Opcode::CreateVector => self.rewrite_create_vector(block, instr),
            Opcode::SplitVector | Opcode::ParallelCopy if self.splits_source(&instr) => {
                self.rewrite_split(block, instr)
            }
            Opcode::ExtractVector if self.extracts_from_split(&instr) => {
                self.rewrite_extract(block, instr)
            }
            Opcode::Phi | Opcode::LinearPhi => self.rewrite_phi(block, instr),
            _ => self.rewrite_generic(block, instr),
        }
    }

    /// Current representation of a scalar operand, coerced back to the
    /// operand's own class.
    fn update_operand(&mut self, block: BlockId, op: Operand) -> Result<Operand, SplitError> {
        let Some(orig) = op.get_temp() else {
            return Ok(op);
        };
        let scalar = ValueRef::Scalar(orig.id);
        if !self.values.contains_key(&scalar) {
            return Ok(op);
        }

        let mut temp = match self.get_output(scalar, block)? {
            Operand::Temp(temp) => temp,
            other => {
                let temp = self.program.allocate_tmp(orig.rc);
                self.emit(Instruction::copy(temp, other));
                self.stats.copies_inserted += 1;
                temp
            }
        };
        if temp.rc != orig.rc {
            temp = if orig.rc.ty() == RegType::Sgpr {
                self.as_uniform(temp)
            } else {
                let copy = self.program.allocate_tmp(orig.rc);
                self.emit(Instruction::copy(copy, temp.into()));
                self.stats.copies_inserted += 1;
                copy
            };
        }
        Ok(temp.into())
    }

    /// A scalar-register copy of `temp`, reading the first active lane if it
    /// lives in vector registers.
    fn as_uniform(&mut self, temp: Temp) -> Temp {
        if temp.rc.ty() == RegType::Sgpr {
            return temp;
        }
        let uniform = self
            .program
            .allocate_tmp(RegClass::new(RegType::Sgpr, temp.size() as u8));
        self.emit(Instruction::alu(AluOp::ReadFirstLane, vec![uniform], vec![temp.into()]));
        self.stats.copies_inserted += 1;
        uniform
    }

    fn rewrite_create_vector(&mut self, block: BlockId, instr: Instruction) -> Result<(), SplitError> {
        let def = instr.definitions[0];
        if def.size() == 1 || !self.classification.should_split(def.id) {
            return self.rewrite_kept_create_vector(block, instr);
        }

        let elem = def.rc.elem();
        let mut components = Vec::with_capacity(def.size() as usize);
        for op in &instr.operands {
            match *op {
                Operand::Temp(temp) if temp.size() == 1 => {
                    components.push(self.update_operand(block, *op)?);
                }
                Operand::Temp(temp) => {
                    components.extend(self.vector_components(block, temp, 0..temp.size() as usize)?);
                }
                Operand::Constant { value, size } => {
                    components.extend((0..size as u32).map(|i| Operand::constant_slot(value, i)));
                }
                Operand::Fixed { reg, rc } => {
                    components
                        .extend((0..rc.size()).map(|i| Operand::fixed(reg.advance(4 * i), rc.elem())));
                }
                Operand::Undefined(rc) => {
                    components.extend((0..rc.size()).map(|_| Operand::Undefined(elem)));
                }
            }
        }

        trace!("split_vectors: {} dissolved into {} components", def, components.len());
        self.split_vector(def.id, block, &components);
        Ok(())
    }

    /// A merge whose result stays whole. Split operands are spliced in as
    /// their components.
    fn rewrite_kept_create_vector(&mut self, block: BlockId, mut instr: Instruction) -> Result<(), SplitError> {
        let mut operands = Vec::with_capacity(instr.operands.len());
        for op in std::mem::take(&mut instr.operands) {
            match op.get_temp() {
                Some(temp) if temp.size() == 1 => operands.push(self.update_operand(block, op)?),
                Some(temp) if self.vector_splits.contains(temp.id) && !temp.rc.is_subdword() => {
                    operands.extend(self.vector_components(block, temp, 0..temp.size() as usize)?);
                }
                _ => operands.push(op),
            }
        }
        instr.operands = operands;
        if let Some(&def) = instr.definitions.first() {
            if def.size() == 1 && !def.rc.is_subdword() {
                self.remap_temp(def.id, block, def.into());
            }
        }
        self.emit(instr);
        Ok(())
    }

    /// Vector splits and single copies whose source is decomposed, a
    /// 64-bit constant, or a fixed register.
    fn splits_source(&self, instr: &Instruction) -> bool {
        if instr.touches_subdword() || instr.operands.is_empty() {
            return false;
        }
        let is_split = instr.opcode == Opcode::SplitVector;
        let single_copy = instr.opcode == Opcode::ParallelCopy
            && instr.definitions.len() == 1
            && instr.operands.len() == 1;
        let def_split = single_copy && self.classification.should_split(instr.definitions[0].id);

        match instr.operands[0] {
            Operand::Temp(src) => {
                src.size() > 1 && self.classification.should_split(src.id) && (is_split || single_copy)
            }
            Operand::Constant { size: 2, .. } => {
                (is_split && instr.definitions.len() == 2)
                    || (def_split && instr.definitions[0].size() == 2)
            }
            Operand::Fixed { rc, .. } => rc.size() > 1 && (is_split || def_split),
            _ => false,
        }
    }

    fn rewrite_split(&mut self, block: BlockId, instr: Instruction) -> Result<(), SplitError> {
        match instr.operands[0] {
            Operand::Temp(src) => {
                let components = self.vector_components(block, src, 0..src.size() as usize)?;
                let mut next = 0;
                for def in &instr.definitions {
                    let n = def.size() as usize;
                    if n == 1 {
                        self.remap_temp(def.id, block, components[next]);
                    } else {
                        self.split_vector(def.id, block, &components[next..next + n]);
                    }
                    next += n;
                }
            }
            Operand::Constant { value, .. } => {
                if instr.opcode == Opcode::SplitVector {
                    for (i, def) in instr.definitions.iter().enumerate() {
                        let tmp = self.program.allocate_tmp(def.rc);
                        self.emit(Instruction::copy(tmp, Operand::constant_slot(value, i as u32)));
                        self.remap_temp(def.id, block, tmp.into());
                    }
                } else {
                    let def = instr.definitions[0];
                    let parts: Vec<Operand> = (0..2)
                        .map(|i| {
                            let tmp = self.program.allocate_tmp(def.rc.elem());
                            self.emit(Instruction::copy(tmp, Operand::constant_slot(value, i)));
                            tmp.into()
                        })
                        .collect();
                    self.split_vector(def.id, block, &parts);
                }
                self.stats.copies_inserted += 2;
            }
            Operand::Fixed { reg, .. } => {
                let mut reg = reg;
                let mut copies = Vec::new();
                for def in &instr.definitions {
                    if def.size() == 1 {
                        copies.push(Instruction::copy(*def, Operand::fixed(reg, def.rc)));
                        self.remap_temp(def.id, block, (*def).into());
                        reg = reg.advance(4);
                        continue;
                    }
                    let elem = def.rc.elem();
                    let mut parts = Vec::with_capacity(def.size() as usize);
                    for _ in 0..def.size() {
                        let tmp = self.program.allocate_tmp(elem);
                        copies.push(Instruction::copy(tmp, Operand::fixed(reg, elem)));
                        parts.push(tmp.into());
                        reg = reg.advance(4);
                    }
                    self.split_vector(def.id, block, &parts);
                }
                self.stats.copies_inserted += copies.len();
                for copy in copies {
                    self.emit(copy);
                }
            }
            Operand::Undefined(_) => unreachable!("not a split source"),
        }
        Ok(())
    }

    fn extracts_from_split(&self, instr: &Instruction) -> bool {
        !instr.touches_subdword()
            && instr.operands.get(1).is_some_and(Operand::is_constant)
            && instr.operands[0]
                .get_temp()
                .is_some_and(|src| src.size() > 1 && self.classification.should_split(src.id))
    }

    /// Element `index` of a vector, counted in units of the result size.
    fn rewrite_extract(&mut self, block: BlockId, instr: Instruction) -> Result<(), SplitError> {
        let def = instr.definitions[0];
        let (Some(src), Some(index)) = (instr.operands[0].get_temp(), instr.operands[1].constant_value()) else {
            return self.rewrite_generic(block, instr);
        };
        let n = def.size() as usize;
        // Index is in units of the result size: a v2 extract at index 1
        // reads slots 2 and 3, not 1 and 2.
        let start = index as usize * n;
        let components = self.vector_components(block, src, start..start + n)?;
        if n == 1 {
            self.remap_temp(def.id, block, components[0]);
        } else {
            self.split_vector(def.id, block, &components);
        }
        Ok(())
    }

    fn rewrite_phi(&mut self, block: BlockId, mut instr: Instruction) -> Result<(), SplitError> {
        let def = instr.definitions[0];
        let loop_header = self.program.block(block).loop_header;

        if def.size() == 1 || !self.classification.should_split(def.id) {
            if loop_header {
                self.header_worklist.insert(block);
            } else {
                let domain = if instr.opcode == Opcode::LinearPhi {
                    CfgDomain::Linear
                } else {
                    CfgDomain::Logical
                };
                let preds: BlockList = self.program.block(block).preds(domain).into();
                for (op, &pred) in instr.operands.iter_mut().zip(preds.iter()) {
                    *op = self.whole_phi_operand(block, pred, def.rc.ty(), *op)?;
                }
            }
            if def.size() == 1 && !def.rc.is_subdword() {
                self.remap_temp(def.id, block, def.into());
            }
            self.emit(instr);
            return Ok(());
        }

        let elem = def.rc.elem();
        let defs: Vec<Temp> = (0..def.size()).map(|_| self.program.allocate_tmp(elem)).collect();
        let components: Vec<Operand> = defs.iter().map(|&t| t.into()).collect();
        self.split_vector(def.id, block, &components);

        let stub = PhiStub {
            rc: def.rc,
            defs,
            operands: instr.operands.into_iter().map(PhiOperand::Operand).collect(),
        };
        if loop_header {
            self.add_header_phi(block, stub);
        } else {
            for phi in self.lower_phi(block, &stub)? {
                self.emit(phi);
            }
        }
        Ok(())
    }

    /// Any other instruction: reassemble split vector operands, then split
    /// vector results again.
    fn rewrite_generic(&mut self, block: BlockId, mut instr: Instruction) -> Result<(), SplitError> {
        let mut pending: Vec<bool> = instr
            .operands
            .iter()
            .map(|op| op.get_temp().is_some_and(|t| !t.rc.is_linear_vgpr() && !t.rc.is_subdword()))
            .collect();
        let branch = instr.is_branch();
        let mut resplits = Vec::new();

        for i in 0..instr.operands.len() {
            if !pending[i] {
                continue;
            }
            let Some(temp) = instr.operands[i].get_temp() else {
                continue;
            };
            if temp.size() == 1 {
                instr.operands[i] = self.update_operand(block, instr.operands[i])?;
                continue;
            }
            let Some(refs) = self.vector_splits.get(temp.id).map(<[ValueRef]>::to_vec) else {
                continue;
            };

            let components = refs
                .into_iter()
                .map(|value| self.get_output(value, block))
                .collect::<Result<Vec<_>, _>>()?;
            let merged = self.program.allocate_tmp(temp.rc);
            self.emit(Instruction::create_vector(merged, components));
            for j in i..instr.operands.len() {
                if instr.operands[j].temp_id() == Some(temp.id) {
                    instr.operands[j] = merged.into();
                    pending[j] = false;
                }
            }

            if !branch {
                resplits.push(self.resplit(block, temp, merged));
            }
        }

        if !branch {
            for def in instr.definitions.clone() {
                if def.rc.is_linear_vgpr() || def.rc.is_subdword() {
                    continue;
                }
                if def.size() == 1 {
                    self.remap_temp(def.id, block, def.into());
                } else if self.classification.should_split(def.id) {
                    resplits.push(self.resplit(block, def, def));
                }
            }
        }

        self.emit(instr);
        for split in resplits {
            self.emit(split);
        }
        Ok(())
    }

    /// Split `source` into fresh components that become the new values of
    /// `vector`. The split is tagged with the vector so it can be removed if
    /// nothing reads the components.
    fn resplit(&mut self, block: BlockId, vector: Temp, source: Temp) -> Instruction {
        let elem = vector.rc.elem();
        let parts: Vec<Temp> = (0..vector.size()).map(|_| self.program.allocate_tmp(elem)).collect();
        let components: Vec<Operand> = parts.iter().map(|&t| t.into()).collect();
        self.split_vector(vector.id, block, &components);

        let mut split = Instruction::split_vector(source.into(), parts);
        split.pass_flags = vector.id.as_u32();
        split
    }
}
