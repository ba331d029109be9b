//! Split Vectors Errors

use super::value_state::ValueRef;
use crate::ir::BlockId;

/// **Fatal internal-consistency error**
///
/// Raised when a value is read in a block that no definition reaches along
/// every dominating path. This means an earlier stage produced malformed IR;
/// compilation of the current function is abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitError {
    UndefinedValue { block: BlockId, value: ValueRef },
}

impl std::fmt::Display for SplitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UndefinedValue { block, value } => {
                write!(f, "Value {} is undefined in block {}", value, block)
            }
        }
    }
}

impl std::error::Error for SplitError {}
