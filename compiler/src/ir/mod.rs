//! Intermediate Representation (IR) for the Wavefront Backend
//!
//! A low-level, SSA-form representation of one shader program:
//! - temporaries carry a register class (register file, size, linearity)
//! - blocks are ordered so that dominators precede the blocks they dominate
//! - each block has logical and linear predecessor/successor lists and an
//!   immediate dominator in each view

pub mod types;
pub mod instructions;
pub mod blocks;
pub mod builder;
pub mod dominance;
pub mod dump;
pub mod optimization;
pub mod split_vectors;
pub mod validation;

pub use types::*;
pub use instructions::*;
pub use blocks::*;
pub use builder::ProgramBuilder;
pub use optimization::{OptimizationPass, OptimizationResult, PassError, PassManager};
pub use split_vectors::{split_vectors, SplitError, SplitStats, SplitVectorsPass};
