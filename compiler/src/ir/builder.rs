//! Program Builder
//!
//! This module provides a builder interface for constructing programs in a
//! convenient way. The builder tracks the block currently being filled and
//! computes immediate dominators for both CFG domains when finished.
//!
//! Edges must be added in an order that lists a loop header's back-edge
//! predecessors last, matching what the passes expect.

use tracing::debug;

use super::dominance::compute_dominators;
use super::{
    AluOp, BlockId, CfgDomain, Instruction, MemoryOp, Opcode, Operand, Program, RegClass, Temp,
};

/// Builder for constructing programs
pub struct ProgramBuilder {
    /// The program being built
    program: Program,

    /// Current basic block being built
    current_block: BlockId,
}

impl ProgramBuilder {
    /// Create a builder with an empty entry block
    pub fn new() -> Self {
        let mut program = Program::new();
        let entry = program.create_block();
        Self {
            program,
            current_block: entry,
        }
    }

    pub fn entry(&self) -> BlockId {
        BlockId::entry()
    }

    // === Block Building ===

    /// Create a new basic block
    pub fn create_block(&mut self) -> BlockId {
        self.program.create_block()
    }

    /// Create a new block flagged as a loop header
    pub fn create_loop_header(&mut self) -> BlockId {
        let id = self.program.create_block();
        self.program.block_mut(id).loop_header = true;
        id
    }

    /// Switch to building in a different block
    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current_block = block;
    }

    pub fn current_block(&self) -> BlockId {
        self.current_block
    }

    /// Connect two blocks in both the logical and the linear CFG
    pub fn edge(&mut self, from: BlockId, to: BlockId) {
        self.logical_edge(from, to);
        self.linear_edge(from, to);
    }

    /// Connect two blocks in the logical CFG only
    pub fn logical_edge(&mut self, from: BlockId, to: BlockId) {
        self.connect(CfgDomain::Logical, from, to);
    }

    /// Connect two blocks in the linear CFG only (divergence management)
    pub fn linear_edge(&mut self, from: BlockId, to: BlockId) {
        self.connect(CfgDomain::Linear, from, to);
    }

    fn connect(&mut self, domain: CfgDomain, from: BlockId, to: BlockId) {
        let source = self.program.block_mut(from);
        let succs = match domain {
            CfgDomain::Logical => &mut source.logical_succs,
            CfgDomain::Linear => &mut source.linear_succs,
        };
        if !succs.contains(&to) {
            succs.push(to);
        }

        let target = self.program.block_mut(to);
        let preds = match domain {
            CfgDomain::Logical => &mut target.logical_preds,
            CfgDomain::Linear => &mut target.linear_preds,
        };
        if !preds.contains(&from) {
            preds.push(from);
        }
    }

    // === Register Management ===

    /// Allocate a temporary without defining it
    pub fn alloc_temp(&mut self, rc: RegClass) -> Temp {
        self.program.allocate_tmp(rc)
    }

    // === Instruction Building ===

    /// Append an instruction to the current block
    pub fn push(&mut self, instr: Instruction) {
        let block = self.current_block;
        self.program.block_mut(block).instructions.push(instr);
    }

    /// Move a constant or undefined value into a fresh temporary
    pub fn build_mov(&mut self, rc: RegClass, src: Operand) -> Temp {
        let def = self.alloc_temp(rc);
        self.push(Instruction::alu(AluOp::Mov, vec![def], vec![src]));
        def
    }

    pub fn build_alu(&mut self, op: AluOp, rc: RegClass, operands: Vec<Operand>) -> Temp {
        let def = self.alloc_temp(rc);
        self.push(Instruction::alu(op, vec![def], operands));
        def
    }

    pub fn build_create_vector(&mut self, rc: RegClass, operands: Vec<Operand>) -> Temp {
        let def = self.alloc_temp(rc);
        self.push(Instruction::create_vector(def, operands));
        def
    }

    /// Split `src` into pieces of the given classes
    pub fn build_split_vector(&mut self, src: Operand, classes: &[RegClass]) -> Vec<Temp> {
        let defs: Vec<Temp> = classes.iter().map(|&rc| self.alloc_temp(rc)).collect();
        self.push(Instruction::split_vector(src, defs.clone()));
        defs
    }

    pub fn build_extract_vector(&mut self, rc: RegClass, src: Temp, index: u32) -> Temp {
        let def = self.alloc_temp(rc);
        self.push(Instruction::extract_vector(def, src.into(), index));
        def
    }

    pub fn build_copy(&mut self, rc: RegClass, src: Operand) -> Temp {
        let def = self.alloc_temp(rc);
        self.push(Instruction::copy(def, src));
        def
    }

    /// Build a phi with a fresh result; operands are in predecessor order
    pub fn build_phi(&mut self, rc: RegClass, operands: Vec<Operand>) -> Temp {
        let def = self.alloc_temp(rc);
        self.build_phi_into(def, operands);
        def
    }

    /// Build a phi for a result allocated earlier (loop-carried values)
    pub fn build_phi_into(&mut self, def: Temp, operands: Vec<Operand>) {
        self.push(Instruction::phi(def, operands));
    }

    pub fn build_load(&mut self, rc: RegClass, address: Operand) -> Temp {
        let def = self.alloc_temp(rc);
        self.push(Instruction::new(
            Opcode::Memory(MemoryOp::Load),
            vec![def],
            vec![address],
        ));
        def
    }

    pub fn build_store(&mut self, address: Operand, data: Operand) {
        self.push(Instruction::new(
            Opcode::Memory(MemoryOp::Store),
            vec![],
            vec![address, data],
        ));
    }

    pub fn build_logical_end(&mut self) {
        self.push(Instruction::new(Opcode::LogicalEnd, vec![], vec![]));
    }

    pub fn build_branch(&mut self, operands: Vec<Operand>) {
        self.push(Instruction::new(Opcode::Branch, vec![], operands));
    }

    /// Finish the program and fill in immediate dominators
    pub fn finish(mut self) -> Program {
        compute_dominators(&mut self.program);
        debug!(
            "Built program with {} blocks and {} instructions",
            self.program.blocks.len(),
            self.program.instruction_count()
        );
        self.program
    }
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self::new()
    }
}
