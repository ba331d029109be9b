//! Dominance Analysis
//!
//! Two pieces live here:
//!
//! 1. **Immediate dominators**: Cooper, Harvey and Kennedy's iterative
//!    algorithm. Hosts normally supply dominators themselves; the program
//!    builder uses this to fill them in.
//! 2. **Dominance frontiers**: computed per CFG domain from the immediate
//!    dominators already stored on the blocks (Cytron et al.). The frontier
//!    of a block B is where a definition made in B has to be reconciled with
//!    definitions flowing in along other paths.

use super::{BlockId, CfgDomain, Program};
use std::collections::BTreeSet;

/// Immediate dominators of every block in one CFG domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DominatorTree {
    /// Immediate dominator for each block (entry and unreachable blocks have none)
    idom: Vec<Option<BlockId>>,
}

impl DominatorTree {
    /// Compute immediate dominators with the iterative dataflow algorithm.
    ///
    /// Block indices double as the reverse postorder: dominators always have a
    /// lower index than the blocks they dominate.
    pub fn compute(program: &Program, domain: CfgDomain) -> Self {
        let n = program.blocks.len();
        let mut idom: Vec<Option<BlockId>> = vec![None; n];
        let mut processed = vec![false; n];
        if n == 0 {
            return Self { idom };
        }
        processed[0] = true;

        let mut changed = true;
        while changed {
            changed = false;

            for block in program.blocks.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;

                for &pred in block.preds(domain) {
                    if !processed[pred.index()] {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => Self::intersect(current, pred, &idom),
                    });
                }

                if let Some(new_idom) = new_idom {
                    let b = block.index.index();
                    if !processed[b] || idom[b] != Some(new_idom) {
                        idom[b] = Some(new_idom);
                        processed[b] = true;
                        changed = true;
                    }
                }
            }
        }

        Self { idom }
    }

    fn intersect(mut a: BlockId, mut b: BlockId, idom: &[Option<BlockId>]) -> BlockId {
        while a != b {
            while a > b {
                a = idom[a.index()].unwrap_or(BlockId::entry());
            }
            while b > a {
                b = idom[b.index()].unwrap_or(BlockId::entry());
            }
        }
        a
    }

    pub fn immediate_dominator(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(block.index()).copied().flatten()
    }

    /// Returns true if every path from the entry to `b` passes through `a`.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut current = Some(b);
        while let Some(block) = current {
            if block == a {
                return true;
            }
            current = self.immediate_dominator(block);
        }
        false
    }

    /// Store the result on the program's blocks.
    pub fn apply(&self, program: &mut Program, domain: CfgDomain) {
        for (block, idom) in program.blocks.iter_mut().zip(&self.idom) {
            match domain {
                CfgDomain::Logical => block.logical_idom = *idom,
                CfgDomain::Linear => block.linear_idom = *idom,
            }
        }
    }
}

/// Fill in both dominator trees of a program.
pub fn compute_dominators(program: &mut Program) {
    for domain in [CfgDomain::Logical, CfgDomain::Linear] {
        DominatorTree::compute(program, domain).apply(program, domain);
    }
}

/// Dominance frontiers of every block, for both CFG domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DominanceFrontiers {
    logical: Vec<BTreeSet<BlockId>>,
    linear: Vec<BTreeSet<BlockId>>,
}

impl DominanceFrontiers {
    /// Compute frontiers from the immediate dominators stored on the blocks.
    ///
    /// For every block M with at least two predecessors, each predecessor's
    /// dominator chain is walked upwards, adding M to every visited block's
    /// frontier, until reaching idom(M). The walk also stops at M itself so
    /// self-loops do not place a header in its own frontier.
    pub fn build(program: &Program) -> Self {
        Self {
            logical: Self::build_domain(program, CfgDomain::Logical),
            linear: Self::build_domain(program, CfgDomain::Linear),
        }
    }

    fn build_domain(program: &Program, domain: CfgDomain) -> Vec<BTreeSet<BlockId>> {
        let mut frontiers = vec![BTreeSet::new(); program.blocks.len()];

        for block in &program.blocks {
            let preds = block.preds(domain);
            if preds.len() < 2 || !block.is_reachable(domain) {
                continue;
            }
            let stop = block.idom(domain);

            for &pred in preds {
                if !program.block(pred).is_reachable(domain) {
                    continue;
                }
                let mut runner = Some(pred);
                while let Some(current) = runner {
                    if Some(current) == stop || current == block.index {
                        break;
                    }
                    frontiers[current.index()].insert(block.index);
                    runner = program.block(current).idom(domain);
                }
            }
        }

        frontiers
    }

    pub fn frontier(&self, domain: CfgDomain, block: BlockId) -> &BTreeSet<BlockId> {
        match domain {
            CfgDomain::Logical => &self.logical[block.index()],
            CfgDomain::Linear => &self.linear[block.index()],
        }
    }
}
