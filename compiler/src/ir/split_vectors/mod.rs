//! Vector Splitting
//!
//! Breaks multi-slot temporaries into independent single-slot values so that
//! register allocation can place each component separately, and keeps the
//! program in SSA form while doing so.
//!
//! The pass runs in four stages:
//!
//! 1. **Classification**: a fixed point over the whole program decides which
//!    vectors are split and which must stay whole ([`classify`]).
//! 2. **Rewriting**: blocks are visited in order. Each split vector's
//!    components are tracked as values with per-block definitions; reads are
//!    answered by walking the dominator tree of the CFG the value lives in,
//!    inserting phis at dominance-frontier merge points on demand.
//! 3. **Loop headers**: phis whose back-edge values were not yet known are
//!    lowered once every block has been rewritten.
//! 4. **Cleanup**: splits emitted after whole-vector uses whose results were
//!    never read are removed.
//!
//! Values in scalar registers and in linear vector registers follow the
//! linear CFG; all other values follow the logical CFG.

pub mod classify;
mod dead_splits;
pub mod error;
mod phi;
mod rewrite;
pub mod state;
pub mod value_state;

pub use classify::Classification;
pub use error::SplitError;
pub use phi::{PhiOperand, PhiStub};
pub use state::{SplitState, VectorSplitIndex};
pub use value_state::{BlockDef, ValueRef, ValueState};

use super::dominance::DominanceFrontiers;
use super::optimization::{OptimizationPass, OptimizationResult, PassError};
use super::validation::validate_program;
use super::Program;
use crate::config::SplitVectorsConfig;
use log::{debug, info};

/// Counters reported by one run of the pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SplitStats {
    pub temps_split: usize,
    pub temps_preserved: usize,
    /// Component phis and merge phis outside loop headers
    pub phis_inserted: usize,
    pub header_phis: usize,
    /// Constant moves, class coercions and lane reads
    pub copies_inserted: usize,
    pub dead_splits_removed: usize,
}

impl SplitStats {
    pub fn modified(&self) -> bool {
        self.temps_split > 0 || self.phis_inserted > 0 || self.header_phis > 0
    }
}

/// Split vectors in `program` with the default configuration.
pub fn split_vectors(program: &mut Program) -> Result<SplitStats, SplitError> {
    split_vectors_with_config(program, &SplitVectorsConfig::default())
}

/// Split vectors in `program`.
///
/// On error the program is left partially rewritten and must be discarded.
pub fn split_vectors_with_config(
    program: &mut Program,
    config: &SplitVectorsConfig,
) -> Result<SplitStats, SplitError> {
    if !config.enabled {
        debug!("split_vectors: disabled");
        return Ok(SplitStats::default());
    }

    let classification = Classification::compute(program);
    let frontiers = DominanceFrontiers::build(program);
    let mut state = SplitState::new(program, classification, frontiers);

    state.rewrite_blocks()?;
    state.process_loop_headers()?;
    state.materialize_phis();
    if config.eliminate_dead_splits {
        state.eliminate_dead_splits();
    }

    let stats = state.stats();
    info!(
        "split_vectors: {} split, {} preserved, {} phis, {} header phis, {} copies, {} dead splits removed",
        stats.temps_split,
        stats.temps_preserved,
        stats.phis_inserted,
        stats.header_phis,
        stats.copies_inserted,
        stats.dead_splits_removed
    );
    Ok(stats)
}

/// The vector splitting pass, for use in a [`PassManager`](super::optimization::PassManager).
pub struct SplitVectorsPass {
    config: SplitVectorsConfig,
}

impl SplitVectorsPass {
    /// Default configuration with environment overrides applied.
    pub fn new() -> Self {
        Self::with_config(SplitVectorsConfig::from_env())
    }

    pub fn with_config(config: SplitVectorsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SplitVectorsConfig {
        &self.config
    }
}

impl Default for SplitVectorsPass {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizationPass for SplitVectorsPass {
    fn name(&self) -> &'static str {
        "split_vectors"
    }

    fn run_on_program(&mut self, program: &mut Program) -> Result<OptimizationResult, PassError> {
        let before = program.instruction_count();
        let stats = split_vectors_with_config(program, &self.config)?;
        if self.config.validate {
            validate_program(program).map_err(PassError::Validation)?;
        }

        let mut result = if stats.modified() {
            OptimizationResult::changed()
        } else {
            OptimizationResult::unchanged()
        };
        result.instructions_eliminated = before.saturating_sub(program.instruction_count());
        for (key, value) in [
            ("temps_split", stats.temps_split),
            ("temps_preserved", stats.temps_preserved),
            ("phis_inserted", stats.phis_inserted),
            ("header_phis", stats.header_phis),
            ("copies_inserted", stats.copies_inserted),
            ("dead_splits_removed", stats.dead_splits_removed),
        ] {
            result.stats.insert(key.to_string(), value);
        }
        Ok(result)
    }
}
