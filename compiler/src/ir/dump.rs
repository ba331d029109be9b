//! IR Dump Utility
//!
//! Pretty-prints programs in a human-readable format. Useful for debugging
//! passes and for readable test failures.

use super::{Block, CfgDomain, Program};
use std::fmt::Write;

/// Dump an entire program to a string.
pub fn dump_program(program: &Program) -> String {
    let mut out = String::new();
    writeln!(out, "; Blocks: {}", program.blocks.len()).unwrap();
    for block in &program.blocks {
        out.push_str(&dump_block(block));
    }
    out
}

/// Dump a single block: header line with both CFG views, then instructions.
pub fn dump_block(block: &Block) -> String {
    let mut out = String::new();

    let list = |domain: CfgDomain| {
        block
            .preds(domain)
            .iter()
            .map(|b| b.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    write!(out, "{}:", block.index).unwrap();
    if block.loop_header {
        write!(out, " ; loop header").unwrap();
    }
    writeln!(
        out,
        " ; logical preds: [{}], linear preds: [{}]",
        list(CfgDomain::Logical),
        list(CfgDomain::Linear)
    )
    .unwrap();

    for instr in &block.instructions {
        writeln!(out, "    {}", instr).unwrap();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::ProgramBuilder;
    use crate::ir::{Operand, RegClass};

    #[test]
    fn test_dump_program() {
        let mut b = ProgramBuilder::new();
        let header = b.create_loop_header();
        b.edge(b.entry(), header);
        let x = b.build_mov(RegClass::V1, Operand::c32(1));
        b.build_create_vector(RegClass::V2, vec![x.into(), x.into()]);
        let text = dump_program(&b.finish());

        assert!(text.starts_with("; Blocks: 2\n"));
        assert!(text.contains("p_create_vector %1:v1, %1:v1"));
        assert!(text.contains("BB1: ; loop header ; logical preds: [BB0], linear preds: [BB0]"));
    }
}
