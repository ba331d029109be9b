//! End-to-end scenarios for the vector splitting pass.

use wavefront_compiler::config::SplitVectorsConfig;
use wavefront_compiler::ir::dump::dump_program;
use wavefront_compiler::ir::split_vectors::{split_vectors_with_config, ValueRef};
use wavefront_compiler::ir::validation::validate_program;
use wavefront_compiler::ir::*;
use wavefront_compiler::logging;

fn run(program: &mut Program) -> SplitStats {
    logging::init_test();
    let stats = split_vectors(program).unwrap();
    if let Err(errors) = validate_program(program) {
        panic!("invalid IR after split_vectors: {:?}\n{}", errors, dump_program(program));
    }
    stats
}

fn count(program: &Program, block: BlockId, opcode: Opcode) -> usize {
    program
        .block(block)
        .instructions
        .iter()
        .filter(|i| i.opcode == opcode)
        .count()
}

fn defining<'a>(program: &'a Program, temp: Temp) -> &'a Instruction {
    program
        .blocks
        .iter()
        .flat_map(|b| &b.instructions)
        .find(|i| i.definitions.contains(&temp))
        .unwrap_or_else(|| panic!("{} is not defined\n{}", temp, dump_program(program)))
}

fn diamond(b: &mut ProgramBuilder) -> [BlockId; 4] {
    let entry = b.entry();
    let left = b.create_block();
    let right = b.create_block();
    let merge = b.create_block();
    b.edge(entry, left);
    b.edge(entry, right);
    b.edge(left, merge);
    b.edge(right, merge);
    [entry, left, right, merge]
}

/// A vector built in block 0, taken apart and partly recomputed in both
/// arms, and merged by a phi in block 3.
fn concrete_scenario(store_vector: bool) -> (Program, [Temp; 5]) {
    let mut b = ProgramBuilder::new();
    let [_, left, right, merge] = diamond(&mut b);

    let a = b.build_mov(RegClass::V1, Operand::c32(1));
    let bb = b.build_mov(RegClass::V1, Operand::c32(2));
    let c = b.build_mov(RegClass::V1, Operand::c32(3));
    let t = b.build_create_vector(RegClass::V2, vec![a.into(), bb.into()]);
    if store_vector {
        b.build_store(Operand::c32(0), t.into());
    }

    b.switch_to_block(left);
    let p = b.build_split_vector(t.into(), &[RegClass::V1, RegClass::V1]);
    let u0 = b.build_alu(AluOp::Add, RegClass::V1, vec![p[0].into(), c.into()]);
    let t1 = b.build_create_vector(RegClass::V2, vec![u0.into(), p[1].into()]);

    b.switch_to_block(right);
    let q = b.build_split_vector(t.into(), &[RegClass::V1, RegClass::V1]);
    let u1 = b.build_alu(AluOp::Add, RegClass::V1, vec![q[1].into(), c.into()]);
    let t2 = b.build_create_vector(RegClass::V2, vec![q[0].into(), u1.into()]);

    b.switch_to_block(merge);
    let t3 = b.build_phi(RegClass::V2, vec![t1.into(), t2.into()]);
    b.build_alu(AluOp::Dot2, RegClass::V1, vec![t3.into()]);

    (b.finish(), [a, bb, u0, u1, t])
}

#[test]
fn test_concrete_scenario_one_phi_per_component() {
    let (mut program, [a, b, u0, u1, _]) = concrete_scenario(false);
    let stats = run(&mut program);

    let merge = BlockId(3);
    let phis: Vec<&Instruction> = program
        .block(merge)
        .instructions
        .iter()
        .filter(|i| i.is_phi())
        .collect();
    assert_eq!(phis.len(), 2, "{}", dump_program(&program));
    assert_eq!(phis[0].operands, vec![Operand::Temp(u0), Operand::Temp(a)]);
    assert_eq!(phis[1].operands, vec![Operand::Temp(b), Operand::Temp(u1)]);
    assert!(phis.iter().all(|phi| phi.opcode == Opcode::Phi));

    // The merge in block 0 is gone; so are the splits in the arms.
    assert_eq!(count(&program, BlockId(0), Opcode::CreateVector), 0);
    for arm in [BlockId(1), BlockId(2)] {
        assert_eq!(count(&program, arm, Opcode::SplitVector), 0);
        assert_eq!(count(&program, arm, Opcode::CreateVector), 0);
    }
    assert_eq!(stats.phis_inserted, 2);
    assert_eq!(stats.dead_splits_removed, 1);
}

#[test]
fn test_concrete_scenario_preserved_vector_is_kept_verbatim() {
    let (mut program, [a, b, _, _, t]) = concrete_scenario(true);
    run(&mut program);

    let merge = defining(&program, t);
    assert_eq!(merge.opcode, Opcode::CreateVector);
    assert_eq!(merge.operands, vec![Operand::Temp(a), Operand::Temp(b)]);
    assert_eq!(count(&program, BlockId(3), Opcode::Phi), 2);
}

#[test]
fn test_concrete_scenario_is_deterministic() {
    let (mut first, _) = concrete_scenario(false);
    let (mut second, _) = concrete_scenario(false);
    run(&mut first);
    run(&mut second);
    assert_eq!(dump_program(&first), dump_program(&second));
}

#[test]
fn test_diamond_synthesizes_merge_phis() {
    // The vector is re-split after a whole use in one arm only; reading it
    // at the merge needs a phi per component.
    let mut b = ProgramBuilder::new();
    let [_, left, _, merge] = diamond(&mut b);
    let x = b.build_mov(RegClass::V1, Operand::c32(1));
    let y = b.build_mov(RegClass::V1, Operand::c32(2));
    let v = b.build_create_vector(RegClass::V2, vec![x.into(), y.into()]);
    b.switch_to_block(left);
    b.build_alu(AluOp::Dot2, RegClass::V1, vec![v.into()]);
    b.switch_to_block(merge);
    b.build_alu(AluOp::Dot2, RegClass::V1, vec![v.into()]);
    let mut program = b.finish();

    let stats = run(&mut program);
    assert_eq!(stats.phis_inserted, 2);

    let instrs = &program.block(merge).instructions;
    assert!(instrs[0].is_phi() && instrs[1].is_phi());
    let resplit = program
        .block(left)
        .instructions
        .iter()
        .find(|i| i.opcode == Opcode::SplitVector)
        .expect("the re-split in the left arm is read at the merge");
    assert_eq!(
        instrs[0].operands,
        vec![Operand::Temp(resplit.definitions[0]), Operand::Temp(x)]
    );
    assert_eq!(
        instrs[1].operands,
        vec![Operand::Temp(resplit.definitions[1]), Operand::Temp(y)]
    );
    // The merge's own re-split is never read.
    assert_eq!(count(&program, merge, Opcode::SplitVector), 0);
}

/// entry -> header <-> body, header -> exit
fn simple_loop(b: &mut ProgramBuilder) -> [BlockId; 4] {
    let entry = b.entry();
    let header = b.create_loop_header();
    let body = b.create_block();
    let exit = b.create_block();
    b.edge(entry, header);
    b.edge(header, body);
    b.edge(body, header);
    b.edge(header, exit);
    [entry, header, body, exit]
}

#[test]
fn test_loop_header_phi_is_deferred_until_back_edge() {
    let mut b = ProgramBuilder::new();
    let [_, header, body, exit] = simple_loop(&mut b);

    let x = b.build_mov(RegClass::V1, Operand::c32(1));
    let y = b.build_mov(RegClass::V1, Operand::c32(2));
    let v = b.build_create_vector(RegClass::V2, vec![x.into(), y.into()]);
    let next = b.alloc_temp(RegClass::V2);

    b.switch_to_block(header);
    let p = b.build_phi(RegClass::V2, vec![v.into(), next.into()]);

    b.switch_to_block(body);
    let parts = b.build_split_vector(p.into(), &[RegClass::V1, RegClass::V1]);
    let sum = b.build_alu(AluOp::Add, RegClass::V1, vec![parts[0].into(), parts[1].into()]);
    b.push(Instruction::create_vector(next, vec![sum.into(), parts[0].into()]));

    b.switch_to_block(exit);
    b.build_alu(AluOp::Dot2, RegClass::V1, vec![p.into()]);
    let mut program = b.finish();

    let stats = run(&mut program);
    assert_eq!(stats.header_phis, 2);

    let instrs = &program.block(header).instructions;
    assert_eq!(instrs.len(), 2, "{}", dump_program(&program));
    let (h0, h1) = (instrs[0].definitions[0], instrs[1].definitions[0]);
    assert_eq!(instrs[0].operands, vec![Operand::Temp(x), Operand::Temp(sum)]);
    assert_eq!(instrs[1].operands, vec![Operand::Temp(y), Operand::Temp(h0)]);

    let add = defining(&program, sum);
    assert_eq!(add.operands, vec![Operand::Temp(h0), Operand::Temp(h1)]);
    assert_eq!(count(&program, body, Opcode::CreateVector), 0);
}

#[test]
fn test_value_redefined_in_loop_gets_header_phi() {
    let mut b = ProgramBuilder::new();
    let [_, header, body, exit] = simple_loop(&mut b);

    let x = b.build_mov(RegClass::V1, Operand::c32(1));
    let y = b.build_mov(RegClass::V1, Operand::c32(2));
    let v = b.build_create_vector(RegClass::V2, vec![x.into(), y.into()]);
    b.switch_to_block(body);
    b.build_alu(AluOp::Dot2, RegClass::V1, vec![v.into()]);
    b.switch_to_block(exit);
    b.build_alu(AluOp::Dot2, RegClass::V1, vec![v.into()]);
    let mut program = b.finish();

    let stats = run(&mut program);
    assert_eq!(stats.header_phis, 2);

    let phis = &program.block(header).instructions;
    let resplit = program
        .block(body)
        .instructions
        .iter()
        .find(|i| i.opcode == Opcode::SplitVector)
        .expect("the body re-split feeds the back edge");
    assert_eq!(
        phis[0].operands,
        vec![Operand::Temp(x), Operand::Temp(resplit.definitions[0])]
    );
    assert_eq!(
        phis[1].operands,
        vec![Operand::Temp(y), Operand::Temp(resplit.definitions[1])]
    );

    let merged = program
        .block(exit)
        .instructions
        .iter()
        .find(|i| i.opcode == Opcode::CreateVector)
        .unwrap();
    assert_eq!(
        merged.operands,
        vec![
            Operand::Temp(phis[0].definitions[0]),
            Operand::Temp(phis[1].definitions[0])
        ]
    );
}

#[test]
fn test_straight_line_extract_round_trip() {
    let mut b = ProgramBuilder::new();
    let s: Vec<Temp> = (0..4)
        .map(|i| b.build_mov(RegClass::V1, Operand::c32(i)))
        .collect();
    let v = b.build_create_vector(
        RegClass::V4,
        s.iter().map(|&t| Operand::from(t)).collect(),
    );
    let e = b.build_extract_vector(RegClass::V2, v, 1);
    let parts = b.build_split_vector(e.into(), &[RegClass::V1, RegClass::V1]);
    let sum = b.build_alu(AluOp::Add, RegClass::V1, vec![parts[0].into(), parts[1].into()]);
    let mut program = b.finish();

    run(&mut program);
    let instrs = &program.block(BlockId(0)).instructions;
    assert!(instrs.iter().all(|i| !matches!(
        i.opcode,
        Opcode::CreateVector | Opcode::SplitVector | Opcode::ExtractVector
    )));
    assert_eq!(
        defining(&program, sum).operands,
        vec![Operand::Temp(s[2]), Operand::Temp(s[3])]
    );
}

#[test]
fn test_memory_vectors_are_untouched() {
    let mut b = ProgramBuilder::new();
    let loaded = b.build_load(RegClass::V4, Operand::c32(0));
    b.build_store(Operand::c32(16), loaded.into());
    let mut program = b.finish();
    let before = program.clone();

    let stats = run(&mut program);
    assert_eq!(stats.temps_split, 0);
    assert_eq!(dump_program(&program), dump_program(&before));
}

#[test]
fn test_dead_split_elimination_is_sound() {
    let build = || {
        let mut b = ProgramBuilder::new();
        let [_, _, body, exit] = simple_loop(&mut b);
        let x = b.build_mov(RegClass::V1, Operand::c32(1));
        let v = b.build_create_vector(RegClass::V2, vec![x.into(), x.into()]);
        b.switch_to_block(body);
        b.build_alu(AluOp::Dot2, RegClass::V1, vec![v.into()]);
        b.build_alu(AluOp::Dot2, RegClass::V1, vec![v.into()]);
        b.switch_to_block(exit);
        b.build_alu(AluOp::Dot2, RegClass::V1, vec![v.into()]);
        b.finish()
    };

    let mut pruned = build();
    let stats = run(&mut pruned);
    assert!(stats.dead_splits_removed > 0);

    let mut kept = build();
    let config = SplitVectorsConfig {
        eliminate_dead_splits: false,
        ..SplitVectorsConfig::default()
    };
    let kept_stats = split_vectors_with_config(&mut kept, &config).unwrap();
    assert_eq!(kept_stats.dead_splits_removed, 0);
    assert_eq!(validate_program(&kept), Ok(()));

    let splits = |p: &Program| {
        p.blocks
            .iter()
            .map(|b| count(p, b.index, Opcode::SplitVector))
            .sum::<usize>()
    };
    assert_eq!(splits(&kept) - splits(&pruned), stats.dead_splits_removed);
}

#[test]
fn test_linear_only_edge_follows_register_file() {
    // Logical: 0 -> 1 -> 3. Linear adds the divergence block 2 between 0 and 3.
    let mut b = ProgramBuilder::new();
    let bb0 = b.entry();
    let bb1 = b.create_block();
    let bb2 = b.create_block();
    let bb3 = b.create_block();
    b.edge(bb0, bb1);
    b.linear_edge(bb0, bb2);
    b.edge(bb1, bb3);
    b.linear_edge(bb2, bb3);

    let sa = b.build_mov(RegClass::S1, Operand::c32(1));
    let sb = b.build_mov(RegClass::S1, Operand::c32(2));
    let sv = b.build_create_vector(RegClass::S2, vec![sa.into(), sb.into()]);
    let va = b.build_mov(RegClass::V1, Operand::c32(3));
    let vb = b.build_mov(RegClass::V1, Operand::c32(4));
    let vv = b.build_create_vector(RegClass::V2, vec![va.into(), vb.into()]);
    for block in [bb1, bb3] {
        b.switch_to_block(block);
        b.build_alu(AluOp::Add, RegClass::S1, vec![sv.into()]);
        b.build_alu(AluOp::Dot2, RegClass::V1, vec![vv.into()]);
    }
    let mut program = b.finish();

    let stats = run(&mut program);
    assert_eq!(stats.phis_inserted, 2);

    let instrs = &program.block(bb3).instructions;
    assert_eq!(instrs[0].opcode, Opcode::LinearPhi);
    assert_eq!(instrs[1].opcode, Opcode::LinearPhi);
    assert_eq!(count(&program, bb3, Opcode::Phi), 0);
    assert_eq!(instrs[0].operands[1], Operand::Temp(sa));
    assert_eq!(instrs[1].operands[1], Operand::Temp(sb));

    // The vgpr vector is read straight from block 1's re-split.
    let vgpr_split = program
        .block(bb1)
        .instructions
        .iter()
        .find(|i| i.opcode == Opcode::SplitVector && i.definitions[0].rc == RegClass::V1)
        .unwrap();
    let vgpr_merge = program
        .block(bb3)
        .instructions
        .iter()
        .find(|i| i.opcode == Opcode::CreateVector && i.definitions[0].rc == RegClass::V2)
        .unwrap();
    let expected: Vec<Operand> = vgpr_split.definitions.iter().map(|&t| t.into()).collect();
    assert_eq!(vgpr_merge.operands, expected);
}

#[test]
fn test_undefined_value_aborts() {
    let mut b = ProgramBuilder::new();
    let [_, left, right, _] = diamond(&mut b);
    b.switch_to_block(left);
    let v = b.build_create_vector(RegClass::V2, vec![Operand::c32(1), Operand::c32(2)]);
    b.switch_to_block(right);
    b.build_alu(AluOp::Dot2, RegClass::V1, vec![v.into()]);
    let mut program = b.finish();

    logging::init_test();
    let err = split_vectors(&mut program).unwrap_err();
    assert_eq!(
        err,
        SplitError::UndefinedValue {
            block: right,
            value: ValueRef::VectorComponent {
                vector: v.id,
                index: 0
            }
        }
    );
}

#[test]
fn test_pass_manager_surfaces_errors() {
    let mut b = ProgramBuilder::new();
    let [_, left, right, _] = diamond(&mut b);
    b.switch_to_block(left);
    let v = b.build_create_vector(RegClass::V2, vec![Operand::c32(1), Operand::c32(2)]);
    b.switch_to_block(right);
    b.build_alu(AluOp::Dot2, RegClass::V1, vec![v.into()]);
    let mut program = b.finish();

    let mut manager = PassManager::new();
    manager.add_pass(SplitVectorsPass::with_config(SplitVectorsConfig::default()));
    let err = manager.run(&mut program).unwrap_err();
    assert!(matches!(err, PassError::Split(SplitError::UndefinedValue { .. })));
}

#[test]
fn test_wide_constant_copy_is_split_low_first() {
    let mut b = ProgramBuilder::new();
    let k = b.build_copy(RegClass::S2, Operand::c64(0xAAAA_0000_0000_BBBB));
    let w = b.build_create_vector(RegClass::S4, vec![k.into(), k.into()]);
    b.build_alu(AluOp::Add, RegClass::S1, vec![w.into()]);
    let mut program = b.finish();

    run(&mut program);
    let instrs = &program.block(BlockId(0)).instructions;
    assert_eq!(instrs[0].operands, vec![Operand::c32(0xBBBB)]);
    assert_eq!(instrs[1].operands, vec![Operand::c32(0xAAAA_0000)]);
    let (lo, hi) = (instrs[0].definitions[0], instrs[1].definitions[0]);
    let merged = instrs
        .iter()
        .find(|i| i.opcode == Opcode::CreateVector)
        .unwrap();
    assert_eq!(
        merged.operands,
        vec![Operand::Temp(lo), Operand::Temp(hi), Operand::Temp(lo), Operand::Temp(hi)]
    );
}

#[test]
fn test_fixed_register_split_copies_each_slot() {
    let mut b = ProgramBuilder::new();
    let parts = b.build_split_vector(
        Operand::fixed(PhysReg::new(8), RegClass::V3),
        &[RegClass::V1, RegClass::V1, RegClass::V1],
    );
    let sum = b.build_alu(
        AluOp::Add,
        RegClass::V1,
        parts.iter().map(|&t| Operand::from(t)).collect(),
    );
    let mut program = b.finish();

    let stats = run(&mut program);
    assert_eq!(stats.copies_inserted, 3);

    let instrs = &program.block(BlockId(0)).instructions;
    assert_eq!(count(&program, BlockId(0), Opcode::SplitVector), 0);
    for (i, &part) in parts.iter().enumerate() {
        assert_eq!(
            instrs[i],
            Instruction::copy(part, Operand::fixed(PhysReg::new(8 + i as u32), RegClass::V1))
        );
    }
    let expected: Vec<Operand> = parts.iter().map(|&t| t.into()).collect();
    assert_eq!(defining(&program, sum).operands, expected);
}

#[test]
fn test_constant_and_undefined_phi_operands_fill_every_slot() {
    let mut b = ProgramBuilder::new();
    let [_, _, _, merge] = diamond(&mut b);
    let x = b.build_mov(RegClass::V1, Operand::c32(1));
    let y = b.build_mov(RegClass::V1, Operand::c32(2));
    let t = b.build_create_vector(RegClass::V2, vec![x.into(), y.into()]);

    b.switch_to_block(merge);
    let p = b.build_phi(RegClass::V2, vec![t.into(), Operand::c64(0x5_0000_0004)]);
    let q = b.build_phi(RegClass::V2, vec![Operand::undef(RegClass::V2), t.into()]);
    b.build_alu(AluOp::Dot2, RegClass::V1, vec![p.into()]);
    b.build_alu(AluOp::Dot2, RegClass::V1, vec![q.into()]);
    let mut program = b.finish();

    let stats = run(&mut program);
    assert_eq!(stats.phis_inserted, 4);

    let phis: Vec<&Instruction> = program
        .block(merge)
        .instructions
        .iter()
        .filter(|i| i.is_phi())
        .collect();
    assert_eq!(phis.len(), 4, "{}", dump_program(&program));
    assert_eq!(phis[0].operands, vec![Operand::Temp(x), Operand::c32(4)]);
    assert_eq!(phis[1].operands, vec![Operand::Temp(y), Operand::c32(5)]);
    let undef = Operand::undef(RegClass::V1);
    assert_eq!(phis[2].operands, vec![undef, Operand::Temp(x)]);
    assert_eq!(phis[3].operands, vec![undef, Operand::Temp(y)]);
}

#[test]
fn test_kept_merge_expands_split_operand() {
    let mut b = ProgramBuilder::new();
    let x = b.build_mov(RegClass::V1, Operand::c32(1));
    let y = b.build_mov(RegClass::V1, Operand::c32(2));
    let z0 = b.build_mov(RegClass::V1, Operand::c32(3));
    let z1 = b.build_mov(RegClass::V1, Operand::c32(4));
    let t = b.build_create_vector(RegClass::V2, vec![x.into(), y.into()]);
    let w = b.build_create_vector(RegClass::V4, vec![t.into(), z0.into(), z1.into()]);
    b.build_store(Operand::c32(0), w.into());
    let mut program = b.finish();

    run(&mut program);
    assert_eq!(count(&program, BlockId(0), Opcode::CreateVector), 1);
    assert_eq!(
        defining(&program, w).operands,
        vec![
            Operand::Temp(x),
            Operand::Temp(y),
            Operand::Temp(z0),
            Operand::Temp(z1)
        ]
    );
}

#[test]
fn test_kept_phi_reassembles_preserved_piece() {
    // The split registers both halves of v. The low half is also stored and
    // flows into a phi, so that phi stays whole and needs the half rebuilt
    // at the end of the left arm.
    let mut b = ProgramBuilder::new();
    let [_, left, right, merge] = diamond(&mut b);
    let s: Vec<Operand> = (0..4)
        .map(|i| b.build_mov(RegClass::V1, Operand::c32(i)).into())
        .collect();
    let v = b.build_create_vector(RegClass::V4, s);

    b.switch_to_block(left);
    let halves = b.build_split_vector(v.into(), &[RegClass::V2, RegClass::V2]);
    b.build_store(Operand::c32(0), halves[0].into());
    b.switch_to_block(right);
    let r = b.build_load(RegClass::V2, Operand::c32(8));
    b.switch_to_block(merge);
    let p = b.build_phi(RegClass::V2, vec![halves[0].into(), r.into()]);
    b.build_store(Operand::c32(16), p.into());
    let mut program = b.finish();

    run(&mut program);

    let arm = &program.block(left).instructions;
    let resplit = arm
        .iter()
        .find(|i| i.opcode == Opcode::SplitVector)
        .expect("the store re-splits the low half");
    let rebuilt = arm.last().unwrap();
    assert_eq!(rebuilt.opcode, Opcode::CreateVector);
    let expected: Vec<Operand> = resplit.definitions.iter().map(|&t| t.into()).collect();
    assert_eq!(rebuilt.operands, expected);

    let phi = defining(&program, p);
    assert_eq!(phi.opcode, Opcode::Phi);
    assert_eq!(
        phi.operands,
        vec![Operand::Temp(rebuilt.definitions[0]), Operand::Temp(r)]
    );
}

#[test]
fn test_nested_loop_headers_are_finished_in_turn() {
    // 0 -> 1 (outer header) -> 2 (inner header) <-> 3, 2 -> 4 -> 1, 1 -> 5
    let mut b = ProgramBuilder::new();
    let entry = b.entry();
    let outer = b.create_loop_header();
    let inner = b.create_loop_header();
    let body = b.create_block();
    let latch = b.create_block();
    let exit = b.create_block();
    b.edge(entry, outer);
    b.edge(outer, inner);
    b.edge(inner, body);
    b.edge(body, inner);
    b.edge(inner, latch);
    b.edge(latch, outer);
    b.edge(outer, exit);

    let x = b.build_mov(RegClass::V1, Operand::c32(1));
    let y = b.build_mov(RegClass::V1, Operand::c32(2));
    let v = b.build_create_vector(RegClass::V2, vec![x.into(), y.into()]);
    b.switch_to_block(body);
    b.build_alu(AluOp::Dot2, RegClass::V1, vec![v.into()]);
    b.switch_to_block(exit);
    b.build_alu(AluOp::Dot2, RegClass::V1, vec![v.into()]);
    let mut program = b.finish();

    let stats = run(&mut program);
    assert_eq!(stats.header_phis, 4);

    // Finishing the outer header reads the latch, which needs phis at the
    // inner header; those read the outer phis and the body re-split.
    let outer_phis = &program.block(outer).instructions;
    let inner_phis = &program.block(inner).instructions;
    assert_eq!(outer_phis.len(), 2, "{}", dump_program(&program));
    assert_eq!(inner_phis.len(), 2, "{}", dump_program(&program));
    let resplit = program
        .block(body)
        .instructions
        .iter()
        .find(|i| i.opcode == Opcode::SplitVector)
        .expect("the body re-split feeds the inner back edge");

    for (i, original) in [x, y].into_iter().enumerate() {
        assert_eq!(
            outer_phis[i].operands,
            vec![Operand::Temp(original), Operand::Temp(inner_phis[i].definitions[0])]
        );
        assert_eq!(
            inner_phis[i].operands,
            vec![
                Operand::Temp(outer_phis[i].definitions[0]),
                Operand::Temp(resplit.definitions[i])
            ]
        );
    }

    let outer_defs: Vec<Operand> = outer_phis.iter().map(|i| i.definitions[0].into()).collect();
    for block in [body, exit] {
        let merged = program
            .block(block)
            .instructions
            .iter()
            .find(|i| i.opcode == Opcode::CreateVector)
            .unwrap();
        assert_eq!(merged.operands, outer_defs);
    }
}

#[test]
fn test_uniform_phi_reads_first_lane_in_predecessor() {
    // An sgpr piece of a vgpr vector is only available in vector registers;
    // the linear phi gets a uniform copy made before the left arm ends.
    let mut b = ProgramBuilder::new();
    let [_, left, right, merge] = diamond(&mut b);
    let a = b.build_mov(RegClass::V1, Operand::c32(1));
    let c = b.build_mov(RegClass::V1, Operand::c32(2));
    let v = b.build_create_vector(RegClass::V2, vec![a.into(), c.into()]);

    b.switch_to_block(left);
    let parts = b.build_split_vector(v.into(), &[RegClass::S1, RegClass::S1]);
    b.build_logical_end();
    b.switch_to_block(right);
    let s = b.build_mov(RegClass::S1, Operand::c32(7));
    b.build_logical_end();
    b.switch_to_block(merge);
    let phi = b.build_phi(RegClass::S1, vec![parts[0].into(), s.into()]);
    let sum = b.build_alu(AluOp::Add, RegClass::S1, vec![phi.into()]);
    let mut program = b.finish();

    let stats = run(&mut program);
    assert_eq!(stats.copies_inserted, 1);

    let arm = &program.block(left).instructions;
    assert_eq!(arm.len(), 2, "{}", dump_program(&program));
    assert_eq!(arm[0].opcode, Opcode::Alu(AluOp::ReadFirstLane));
    assert_eq!(arm[0].operands, vec![Operand::Temp(a)]);
    assert_eq!(arm[1].opcode, Opcode::LogicalEnd);
    let uniform = arm[0].definitions[0];
    assert_eq!(uniform.rc, RegClass::S1);

    let merged = defining(&program, phi);
    assert_eq!(merged.opcode, Opcode::LinearPhi);
    assert_eq!(merged.operands, vec![Operand::Temp(uniform), Operand::Temp(s)]);
    assert_eq!(defining(&program, sum).operands, vec![Operand::Temp(phi)]);
}
