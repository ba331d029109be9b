//! Basic Blocks and Programs
//!
//! A program is an ordered list of basic blocks. Block order is consistent
//! with dominance: every block comes after its immediate dominators, and a
//! loop header has the lowest index of all blocks in its loop. Loop back-edge
//! predecessors are listed last in a header's predecessor lists.
//!
//! Each block carries two adjacency views. The logical view follows the
//! structured source control flow; the linear view additionally contains the
//! blocks inserted to manage wave divergence.

use super::{CfgDomain, Instruction, RegClass, Temp, TempId};
use smallvec::SmallVec;

/// Unique identifier for basic blocks; equal to the block's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn entry() -> Self {
        Self(0)
    }

    pub fn is_entry(&self) -> bool {
        self.0 == 0
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BB{}", self.0)
    }
}

pub type BlockList = SmallVec<[BlockId; 2]>;

/// A basic block with both CFG views
#[derive(Debug, Clone)]
pub struct Block {
    pub index: BlockId,

    /// Whether this block is a loop header
    pub loop_header: bool,

    pub logical_preds: BlockList,
    pub linear_preds: BlockList,
    pub logical_succs: BlockList,
    pub linear_succs: BlockList,

    /// Immediate dominators; `None` for the entry block and unreachable blocks
    pub logical_idom: Option<BlockId>,
    pub linear_idom: Option<BlockId>,

    pub instructions: Vec<Instruction>,
}

impl Block {
    pub fn new(index: BlockId) -> Self {
        Self {
            index,
            loop_header: false,
            logical_preds: SmallVec::new(),
            linear_preds: SmallVec::new(),
            logical_succs: SmallVec::new(),
            linear_succs: SmallVec::new(),
            logical_idom: None,
            linear_idom: None,
            instructions: Vec::new(),
        }
    }

    pub fn preds(&self, domain: CfgDomain) -> &[BlockId] {
        match domain {
            CfgDomain::Logical => &self.logical_preds,
            CfgDomain::Linear => &self.linear_preds,
        }
    }

    pub fn succs(&self, domain: CfgDomain) -> &[BlockId] {
        match domain {
            CfgDomain::Logical => &self.logical_succs,
            CfgDomain::Linear => &self.linear_succs,
        }
    }

    pub fn idom(&self, domain: CfgDomain) -> Option<BlockId> {
        match domain {
            CfgDomain::Logical => self.logical_idom,
            CfgDomain::Linear => self.linear_idom,
        }
    }

    /// Entry block, or a block with a dominator in this domain.
    pub fn is_reachable(&self, domain: CfgDomain) -> bool {
        self.index.is_entry() || self.idom(domain).is_some()
    }

    /// Insert before the first logical-end marker or branch, so the
    /// instruction executes on every path leaving the block.
    pub fn insert_before_region_end(&mut self, instr: Instruction) {
        insert_before_region_end(&mut self.instructions, instr);
    }
}

/// See [`Block::insert_before_region_end`].
pub fn insert_before_region_end(instructions: &mut Vec<Instruction>, instr: Instruction) {
    let pos = instructions
        .iter()
        .position(|i| i.ends_region())
        .unwrap_or(instructions.len());
    instructions.insert(pos, instr);
}

/// A function body: blocks plus the arena of temporaries.
#[derive(Debug, Clone)]
pub struct Program {
    pub blocks: Vec<Block>,

    /// Register class of every allocated temporary, indexed by id
    temp_rc: Vec<RegClass>,
}

impl Program {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            // id 0 is reserved
            temp_rc: vec![RegClass::S1],
        }
    }

    /// Allocate a fresh temporary.
    pub fn allocate_tmp(&mut self, rc: RegClass) -> Temp {
        let id = TempId(self.temp_rc.len() as u32);
        self.temp_rc.push(rc);
        Temp::new(id, rc)
    }

    pub fn temp_rc(&self, id: TempId) -> RegClass {
        self.temp_rc[id.0 as usize]
    }

    pub fn temp(&self, id: TempId) -> Temp {
        Temp::new(id, self.temp_rc(id))
    }

    /// Number of allocated ids, including the reserved one.
    pub fn peek_allocation_id(&self) -> u32 {
        self.temp_rc.len() as u32
    }

    pub fn create_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(Block::new(id));
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}
