//! IR Instructions
//!
//! Defines the instruction set seen by the backend passes. Only the pseudo
//! instructions that shuffle register slots around are modeled precisely;
//! ordinary ALU and memory operations are grouped into coarse families.

use super::{PhysReg, RegClass, RegType, Temp, TempId};
use std::fmt;

/// ALU operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add,
    Mul,
    Mov,
    /// Two-component dot product reading a packed vector operand
    Dot2,
    /// Copy lane 0 of a vgpr into an sgpr
    ReadFirstLane,
}

/// Memory operations. Their register operands must be contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOp {
    Load,
    Store,
    /// Ray intersection with a 64-bit node pointer; takes its operands unpacked
    BvhIntersect64,
}

/// Instruction opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Build a vector from its components
    CreateVector,
    /// Decompose a vector into consecutive pieces
    SplitVector,
    /// Extract a slice of a vector; operand 1 is the index in units of the result size
    ExtractVector,
    /// Merge along the logical CFG
    Phi,
    /// Merge along the linear CFG
    LinearPhi,
    /// Copies that execute simultaneously
    ParallelCopy,
    /// End of the logical (per-lane) part of a block
    LogicalEnd,
    /// Control flow transfer at the end of a block
    Branch,
    Alu(AluOp),
    Memory(MemoryOp),
}

impl Opcode {
    pub fn is_phi(&self) -> bool {
        matches!(self, Opcode::Phi | Opcode::LinearPhi)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Opcode::CreateVector => "p_create_vector",
            Opcode::SplitVector => "p_split_vector",
            Opcode::ExtractVector => "p_extract_vector",
            Opcode::Phi => "p_phi",
            Opcode::LinearPhi => "p_linear_phi",
            Opcode::ParallelCopy => "p_parallelcopy",
            Opcode::LogicalEnd => "p_logical_end",
            Opcode::Branch => "p_branch",
            Opcode::Alu(AluOp::Add) => "add",
            Opcode::Alu(AluOp::Mul) => "mul",
            Opcode::Alu(AluOp::Mov) => "mov",
            Opcode::Alu(AluOp::Dot2) => "dot2",
            Opcode::Alu(AluOp::ReadFirstLane) => "v_readfirstlane_b32",
            Opcode::Memory(MemoryOp::Load) => "load",
            Opcode::Memory(MemoryOp::Store) => "store",
            Opcode::Memory(MemoryOp::BvhIntersect64) => "image_bvh64_intersect_ray",
        }
    }
}

/// Instruction operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    /// A virtual register
    Temp(Temp),
    /// Inline constant; `size` is 1 or 2 slots
    Constant { value: u64, size: u8 },
    /// Undefined value of the given class
    Undefined(RegClass),
    /// Fixed physical register (only after register assignment)
    Fixed { reg: PhysReg, rc: RegClass },
}

impl Operand {
    pub fn temp(temp: Temp) -> Self {
        Operand::Temp(temp)
    }

    /// 32-bit constant
    pub fn c32(value: u32) -> Self {
        Operand::Constant {
            value: value as u64,
            size: 1,
        }
    }

    /// 64-bit constant
    pub fn c64(value: u64) -> Self {
        Operand::Constant { value, size: 2 }
    }

    pub fn undef(rc: RegClass) -> Self {
        Operand::Undefined(rc)
    }

    pub fn fixed(reg: PhysReg, rc: RegClass) -> Self {
        Operand::Fixed { reg, rc }
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, Operand::Temp(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Operand::Constant { .. })
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Operand::Undefined(_))
    }

    pub fn get_temp(&self) -> Option<Temp> {
        match self {
            Operand::Temp(temp) => Some(*temp),
            _ => None,
        }
    }

    pub fn temp_id(&self) -> Option<TempId> {
        self.get_temp().map(|temp| temp.id)
    }

    pub fn constant_value(&self) -> Option<u64> {
        match self {
            Operand::Constant { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Register class, if the operand has one. Constants are treated as
    /// scalar values of their size.
    pub fn reg_class(&self) -> RegClass {
        match self {
            Operand::Temp(temp) => temp.rc,
            Operand::Constant { size, .. } => RegClass::new(RegType::Sgpr, *size),
            Operand::Undefined(rc) | Operand::Fixed { rc, .. } => *rc,
        }
    }

    /// Size in slots.
    pub fn size(&self) -> u32 {
        self.reg_class().size()
    }

    pub fn is_subdword(&self) -> bool {
        match self {
            Operand::Constant { .. } => false,
            _ => self.reg_class().is_subdword(),
        }
    }

    /// Slot `index` of a constant, least significant slot first. Slot 0 is
    /// the low dword, matching the register order of the split result.
    pub fn constant_slot(value: u64, index: u32) -> Operand {
        Operand::c32((value >> (index * 32)) as u32)
    }
}

impl From<Temp> for Operand {
    fn from(temp: Temp) -> Self {
        Operand::Temp(temp)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Temp(temp) => write!(f, "{}", temp),
            Operand::Constant { value, size: 1 } => write!(f, "{:#x}", value),
            Operand::Constant { value, .. } => write!(f, "{:#x}:64", value),
            Operand::Undefined(rc) => write!(f, "undef:{}", rc),
            Operand::Fixed { reg, rc } => write!(f, "{}:{}", reg, rc),
        }
    }
}

/// A single instruction: opcode, results and operands.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub definitions: Vec<Temp>,
    pub operands: Vec<Operand>,
    /// Scratch field owned by the pass that is currently running
    pub pass_flags: u32,
}

impl Instruction {
    pub fn new(opcode: Opcode, definitions: Vec<Temp>, operands: Vec<Operand>) -> Self {
        Self {
            opcode,
            definitions,
            operands,
            pass_flags: 0,
        }
    }

    pub fn create_vector(def: Temp, operands: Vec<Operand>) -> Self {
        Self::new(Opcode::CreateVector, vec![def], operands)
    }

    pub fn split_vector(src: Operand, definitions: Vec<Temp>) -> Self {
        Self::new(Opcode::SplitVector, definitions, vec![src])
    }

    pub fn extract_vector(def: Temp, src: Operand, index: u32) -> Self {
        Self::new(Opcode::ExtractVector, vec![def], vec![src, Operand::c32(index)])
    }

    /// A phi along the CFG domain matching the class of `def`.
    pub fn phi(def: Temp, operands: Vec<Operand>) -> Self {
        let opcode = if def.rc.is_linear() {
            Opcode::LinearPhi
        } else {
            Opcode::Phi
        };
        Self::new(opcode, vec![def], operands)
    }

    pub fn copy(def: Temp, src: Operand) -> Self {
        Self::new(Opcode::ParallelCopy, vec![def], vec![src])
    }

    pub fn alu(op: AluOp, definitions: Vec<Temp>, operands: Vec<Operand>) -> Self {
        Self::new(Opcode::Alu(op), definitions, operands)
    }

    pub fn is_phi(&self) -> bool {
        self.opcode.is_phi()
    }

    pub fn is_branch(&self) -> bool {
        self.opcode == Opcode::Branch
    }

    /// Memory access whose operands must stay in contiguous registers.
    pub fn needs_contiguous_operands(&self) -> bool {
        matches!(
            self.opcode,
            Opcode::Memory(MemoryOp::Load) | Opcode::Memory(MemoryOp::Store)
        )
    }

    /// Logical end marker or branch: copies that must execute on every path
    /// into a successor are placed before this instruction.
    pub fn ends_region(&self) -> bool {
        matches!(self.opcode, Opcode::LogicalEnd | Opcode::Branch)
    }

    /// Whether any result or operand is narrower than one slot.
    pub fn touches_subdword(&self) -> bool {
        self.definitions.iter().any(|def| def.rc.is_subdword())
            || self.operands.iter().any(|op| op.is_subdword())
    }

    pub fn uses(&self) -> impl Iterator<Item = Temp> + '_ {
        self.operands.iter().filter_map(|op| op.get_temp())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.definitions.is_empty() {
            let defs: Vec<String> = self.definitions.iter().map(|d| d.to_string()).collect();
            write!(f, "{} = ", defs.join(", "))?;
        }
        write!(f, "{}", self.opcode.name())?;
        let ops: Vec<String> = self.operands.iter().map(|op| op.to_string()).collect();
        if !ops.is_empty() {
            write!(f, " {}", ops.join(", "))?;
        }
        Ok(())
    }
}
