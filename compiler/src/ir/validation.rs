//! IR Validation
//!
//! Structural checks run after passes that rewrite the program: every
//! temporary is defined once, every operand refers to a defined temporary,
//! phis sit at the top of their block and have one operand per predecessor.

use super::{BlockId, CfgDomain, Opcode, Program, TempId};
use fxhash::FxHashSet;
use std::fmt;

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub block: BlockId,
    /// Position of the offending instruction in its block
    pub instruction: usize,
}

/// Types of validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Operand refers to a temporary nothing defines
    UndefinedTemp { temp: TempId },

    /// Temporary defined more than once
    MultipleDefinitions { temp: TempId },

    /// Phi operand count differs from the predecessor count
    PhiArity { operands: usize, preds: usize },

    /// Phi placed after a non-phi instruction
    PhiNotAtBlockStart,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}: ", self.block, self.instruction)?;
        match &self.kind {
            ValidationErrorKind::UndefinedTemp { temp } => write!(f, "use of undefined {}", temp),
            ValidationErrorKind::MultipleDefinitions { temp } => {
                write!(f, "{} is defined more than once", temp)
            }
            ValidationErrorKind::PhiArity { operands, preds } => write!(
                f,
                "phi has {} operands but the block has {} predecessors",
                operands, preds
            ),
            ValidationErrorKind::PhiNotAtBlockStart => write!(f, "phi after a non-phi instruction"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a program, collecting every error found.
pub fn validate_program(program: &Program) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut defined: FxHashSet<TempId> = FxHashSet::default();

    for block in &program.blocks {
        for (i, instr) in block.instructions.iter().enumerate() {
            for def in &instr.definitions {
                if !defined.insert(def.id) {
                    errors.push(ValidationError {
                        kind: ValidationErrorKind::MultipleDefinitions { temp: def.id },
                        block: block.index,
                        instruction: i,
                    });
                }
            }
        }
    }

    for block in &program.blocks {
        let mut seen_non_phi = false;
        for (i, instr) in block.instructions.iter().enumerate() {
            let mut error = |kind| {
                errors.push(ValidationError {
                    kind,
                    block: block.index,
                    instruction: i,
                })
            };

            if instr.is_phi() {
                if seen_non_phi {
                    error(ValidationErrorKind::PhiNotAtBlockStart);
                }
                let domain = if instr.opcode == Opcode::LinearPhi {
                    CfgDomain::Linear
                } else {
                    CfgDomain::Logical
                };
                let preds = block.preds(domain).len();
                if instr.operands.len() != preds {
                    error(ValidationErrorKind::PhiArity {
                        operands: instr.operands.len(),
                        preds,
                    });
                }
            } else {
                seen_non_phi = true;
            }

            for temp in instr.uses() {
                if !defined.contains(&temp.id) {
                    error(ValidationErrorKind::UndefinedTemp { temp: temp.id });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
