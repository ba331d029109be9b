//! Optimization Passes
//!
//! Passes implement [`OptimizationPass`] and are run in order by a
//! [`PassManager`]. Each pass reports whether it changed the program along
//! with named counters.

use super::split_vectors::{SplitError, SplitVectorsPass};
use super::validation::ValidationError;
use super::Program;
use std::collections::HashMap;
use tracing::debug;

/// Optimization pass trait
pub trait OptimizationPass {
    /// Get the name of this pass
    fn name(&self) -> &'static str;

    /// Run the pass on a program
    fn run_on_program(&mut self, program: &mut Program) -> Result<OptimizationResult, PassError>;
}

/// Result of an optimization pass
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Whether the IR was modified
    pub modified: bool,

    /// Number of instructions eliminated
    pub instructions_eliminated: usize,

    /// Other statistics
    pub stats: HashMap<String, usize>,
}

impl OptimizationResult {
    /// Create a result indicating no changes
    pub fn unchanged() -> Self {
        Self {
            modified: false,
            instructions_eliminated: 0,
            stats: HashMap::new(),
        }
    }

    /// Create a result indicating changes
    pub fn changed() -> Self {
        Self {
            modified: true,
            ..Self::unchanged()
        }
    }

    /// Combine results
    pub fn combine(mut self, other: OptimizationResult) -> Self {
        self.modified |= other.modified;
        self.instructions_eliminated += other.instructions_eliminated;

        for (key, value) in other.stats {
            *self.stats.entry(key).or_insert(0) += value;
        }

        self
    }
}

/// A pass failed; the program must be discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassError {
    Split(SplitError),
    /// The pass produced IR that does not validate
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for PassError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassError::Split(err) => write!(f, "{}", err),
            PassError::Validation(errors) => {
                write!(f, "{} validation error(s)", errors.len())?;
                for err in errors {
                    write!(f, "\n  {}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for PassError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PassError::Split(err) => Some(err),
            PassError::Validation(_) => None,
        }
    }
}

impl From<SplitError> for PassError {
    fn from(err: SplitError) -> Self {
        PassError::Split(err)
    }
}

/// Optimization pass manager
pub struct PassManager {
    passes: Vec<Box<dyn OptimizationPass>>,
}

impl PassManager {
    /// Create a new pass manager
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// Add a pass to the manager
    pub fn add_pass<P: OptimizationPass + 'static>(&mut self, pass: P) {
        self.passes.push(Box::new(pass));
    }

    /// The passes run before register allocation
    pub fn default_pipeline() -> Self {
        let mut manager = Self::new();
        manager.add_pass(SplitVectorsPass::new());
        manager
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run every pass once, in order. Stops at the first failure.
    pub fn run(&mut self, program: &mut Program) -> Result<OptimizationResult, PassError> {
        let mut total_result = OptimizationResult::unchanged();

        for pass in &mut self.passes {
            let result = pass.run_on_program(program)?;
            debug!(
                "{}: modified={} eliminated={}",
                pass.name(),
                result.modified,
                result.instructions_eliminated
            );
            total_result = total_result.combine(result);
        }

        Ok(total_result)
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::new()
    }
}
