mod common;

use joos_backend::backend::abi::PhysReg;
use joos_backend::backend::instruction::{AbstractReg, AsmInstr, Reg};
use joos_backend::backend::regalloc::{
    assign_intervals, Assignment, BasicAllocator, LinearScanAllocator, LiveIntervals, RegAllocator,
};
use joos_backend::backend::tiling::Tiler;
use joos_backend::canonicalize_unit;
use joos_backend::ir::canonical_check::check_unit;
use joos_backend::ir::{BinOpKind, CompUnit, Expr, ExprKind, Stmt, StmtKind};

// ── Canonicalization ─────────────────────────────────────────────────────

#[test]
fn canonical_units_have_no_eseq_or_expression_calls() {
    common::init_logging();
    for unit in common::two_unit_program() {
        let canon = canonicalize_unit(unit).expect("canonicalize");
        check_unit(&canon).expect("canonical form");
        for func in &canon.functions {
            assert_closed(&func.body);
        }
        for init in &canon.static_inits {
            assert_closed(init);
        }
    }
}

#[test]
fn calls_in_both_operands_keep_their_order() {
    let mut unit = CompUnit::new("Main");
    let b = &mut unit.builder;
    let fa = b.global_name("Main.a");
    let fb = b.global_name("Main.b");
    let ca = b.call(fa, vec![]);
    let cb = b.call(fb, vec![]);
    let sum = b.binop(BinOpKind::Sub, ca, cb);
    let body = b.ret(Some(sum));
    unit.add_function("Main.main", body, 0);

    let canon = canonicalize_unit(unit).expect("canonicalize");
    let StmtKind::Seq(stmts) = &canon.functions[0].body.kind else {
        panic!("expected a SEQ, got {}", canon.functions[0].body);
    };
    assert_eq!(stmts.len(), 4, "{}", canon.functions[0].body);

    assert!(matches!(&stmts[0].kind, StmtKind::Call { target, .. } if target.as_name() == Some("Main.a")));
    let StmtKind::Move { target, source } = &stmts[1].kind else {
        panic!("expected the first result to be saved, got {}", stmts[1]);
    };
    let (saved, _) = target.as_temp().expect("temp target");
    assert_eq!(source.as_temp(), Some(("_RET", false)));
    assert!(matches!(&stmts[2].kind, StmtKind::Call { target, .. } if target.as_name() == Some("Main.b")));

    let StmtKind::Return(Some(value)) = &stmts[3].kind else {
        panic!("expected a return, got {}", stmts[3]);
    };
    let ExprKind::BinOp { left, right, .. } = &value.kind else {
        panic!("expected a binop, got {value}");
    };
    assert_eq!(left.as_temp(), Some((saved, false)));
    assert_eq!(right.as_temp(), Some(("_RET", false)));
}

#[test]
fn pure_body_is_returned_unchanged() {
    let unit = common::return_sum_unit();
    let original = unit.functions[0].body.clone();
    let canon = canonicalize_unit(unit).expect("canonicalize");
    assert_eq!(canon.functions[0].body, original);
}

#[test]
fn call_arguments_are_bound_to_temps() {
    let mut unit = CompUnit::new("Main");
    let b = &mut unit.builder;
    let f = b.global_name("Main.f");
    let one = b.constant(1);
    let x = b.temp("x");
    let two = b.constant(2);
    let arg = b.binop(BinOpKind::Add, x, two);
    let call = b.call_stmt(f, vec![one, arg]);
    let ret = b.ret(None);
    let body = b.seq(vec![call, ret]);
    unit.add_function("Main.main", body, 0);

    let canon = canonicalize_unit(unit).expect("canonicalize");
    let StmtKind::Seq(stmts) = &canon.functions[0].body.kind else {
        panic!("expected a SEQ");
    };
    let StmtKind::Call { args, .. } = &stmts[2].kind else {
        panic!("expected the call third, got {}", stmts[2]);
    };
    assert_eq!(args.len(), 2);
    assert!(args.iter().all(|a| a.as_temp().is_some()));
}

#[test]
fn store_evaluates_address_then_value() {
    let mut unit = CompUnit::new("Main");
    let b = &mut unit.builder;
    let p = b.temp("p");
    let addr = b.mem(p);
    let five = b.constant(5);
    let store = b.mov(addr, five);
    unit.add_function("Main.main", store, 0);

    let canon = canonicalize_unit(unit).expect("canonicalize");
    let StmtKind::Seq(stmts) = &canon.functions[0].body.kind else {
        panic!("expected a SEQ");
    };
    assert_eq!(stmts.len(), 3);
    let StmtKind::Move { target: t1, source: s1 } = &stmts[0].kind else {
        panic!("address first");
    };
    assert_eq!(s1.as_temp(), Some(("p", false)));
    let StmtKind::Move { target: t2, source: s2 } = &stmts[1].kind else {
        panic!("value second");
    };
    assert!(matches!(s2.kind, ExprKind::Const(5)));
    let StmtKind::Move { target, source } = &stmts[2].kind else {
        panic!("store last");
    };
    let ExprKind::Mem(a) = &target.kind else {
        panic!("memory target");
    };
    assert_eq!(a.as_temp(), t1.as_temp());
    assert_eq!(source.as_temp(), t2.as_temp());
}

#[test]
fn static_initializer_ends_in_field_write() {
    let units = common::two_unit_program();
    let canon = canonicalize_unit(units.into_iter().next().expect("unit")).expect("canonicalize");
    assert_eq!(canon.field_names, vec!["Main.x".to_string()]);
    let StmtKind::Seq(stmts) = &canon.static_inits[0].kind else {
        panic!("expected a SEQ");
    };
    let Some(StmtKind::Move { target, source }) = stmts.last().map(|s| &s.kind) else {
        panic!("expected a move");
    };
    assert_eq!(target.as_temp(), Some(("Main.x", true)));
    assert!(matches!(source.kind, ExprKind::Const(2)));
}

// ── Tiling ───────────────────────────────────────────────────────────────

#[test]
fn tiling_is_deterministic() {
    let tile = || {
        let unit = common::two_unit_program().remove(0);
        let canon = canonicalize_unit(unit).expect("canonicalize");
        let body = canon.functions[0].body.clone();
        Tiler::new().tile_body(body).expect("tile")
    };
    assert_eq!(tile(), tile());
}

#[test]
fn bare_return_with_a_call_is_tiled() {
    let unit = common::two_unit_program().remove(0);
    let canon = canonicalize_unit(unit).expect("canonicalize");
    let body = canon.functions[0].body.clone();
    assert!(body.is_seq(), "{body}");

    let instrs = Tiler::new().tile_body(body).expect("tile");
    let text: Vec<String> = instrs.iter().map(ToString::to_string).collect();
    let call = text.iter().position(|l| l == "    call Lib.twice").expect("call");
    let push = text.iter().position(|l| l.starts_with("    push ")).expect("push");
    assert!(push < call, "{text:?}");
    assert!(text[call + 1..].iter().any(|l| l.contains("[Main.x]")), "{text:?}");
    assert_eq!(text.last().map(String::as_str), Some("    ret"));
}

#[test]
fn bare_store_is_tiled() {
    let mut unit = CompUnit::new("Main");
    let b = &mut unit.builder;
    let p = b.arg_temp(0);
    let addr = b.mem(p);
    let five = b.constant(5);
    let store = b.mov(addr, five);
    unit.add_function("Main.main", store, 1);

    let canon = canonicalize_unit(unit).expect("canonicalize");
    let body = canon.functions[0].body.clone();
    let instrs = Tiler::new().tile_body(body).expect("tile");
    assert_eq!(instrs.len(), 3, "{instrs:?}");
    assert!(instrs[0].to_string().ends_with("[ebp + 8]"), "{instrs:?}");
    assert!(instrs[2].to_string().starts_with("    mov ["), "{instrs:?}");
}

#[test]
fn division_checks_for_zero() {
    let mut unit = CompUnit::new("Main");
    let b = &mut unit.builder;
    let x = b.temp("x");
    let seven = b.constant(7);
    let init = b.mov(x, seven);
    let x = b.temp("x");
    let y = b.constant(2);
    let quotient = b.binop(BinOpKind::Mod, x, y);
    let ret = b.ret(Some(quotient));
    let body = b.seq(vec![init, ret]);

    let instrs = Tiler::new().tile_body(body).expect("tile");
    let text: Vec<String> = instrs.iter().map(ToString::to_string).collect();
    let check = text.iter().position(|l| l == "    je __exception").expect("zero check");
    let divide = text.iter().position(|l| l.starts_with("    idiv")).expect("idiv");
    assert!(check < divide);
    assert_eq!(text[divide - 1], "    cdq");
    assert!(text[divide + 1].ends_with(", edx"), "{text:?}");
}

#[test]
fn conditional_jump_tests_and_branches_on_true() {
    let mut b = joos_backend::ir::IrBuilder::new("T");
    let x = b.temp("x");
    let zero = b.constant(0);
    let init = b.mov(x, zero);
    let x = b.temp("x");
    let one = b.constant(1);
    let cond = b.binop(BinOpKind::Lt, x, one);
    let jump = b.cjump(cond, "T.yes", "T.no");
    let no = b.label("T.no");
    let body = b.seq(vec![init, jump, no]);

    let instrs = Tiler::new().tile_body(body).expect("tile");
    let text: Vec<String> = instrs.iter().map(ToString::to_string).collect();
    assert!(text.iter().any(|l| l == "    setl al"), "{text:?}");
    assert!(text.iter().any(|l| l.starts_with("    test ")), "{text:?}");
    assert!(text.iter().any(|l| l == "    jnz T.yes"), "{text:?}");
    assert!(!text.iter().any(|l| l.contains("jmp")), "{text:?}");
}

// ── Register allocation ──────────────────────────────────────────────────

/// `t0 = 0; ...; t{n-1} = n-1; return t0 + t1 + ... + t{n-1}`
fn many_live_values(n: i32) -> Vec<AsmInstr> {
    let mut b = joos_backend::ir::IrBuilder::new("T");
    let mut stmts = Vec::new();
    for k in 0..n {
        let t = b.temp(format!("t{k}"));
        let v = b.constant(k);
        stmts.push(b.mov(t, v));
    }
    let mut sum = b.temp("t0");
    for k in 1..n {
        let t = b.temp(format!("t{k}"));
        sum = b.binop(BinOpKind::Add, sum, t);
    }
    stmts.push(b.ret(Some(sum)));
    let body = b.seq(stmts);
    Tiler::new().tile_body(body).expect("tile")
}

#[test]
fn overlapping_intervals_never_share_a_register() {
    let instrs = many_live_values(6);
    let mut live = LiveIntervals::build(&instrs);
    live.extend_for_labels(&instrs);
    assign_intervals(&mut live);

    for (i, a) in live.intervals.iter().enumerate() {
        for b in &live.intervals[i + 1..] {
            if !a.overlaps(b.start, b.end) {
                continue;
            }
            if let (Assignment::Reg(ra), Assignment::Reg(rb)) = (a.assignment, b.assignment) {
                assert_ne!(ra, rb, "{} and {} overlap", a.reg, b.reg);
            }
        }
    }
}

#[test]
fn pressure_spills_to_the_frame() {
    common::init_logging();
    let alloc = LinearScanAllocator::new()
        .allocate(many_live_values(6))
        .expect("allocate");
    assert!(alloc.frame_slots > 0);
    assert!(alloc.instrs.iter().all(|(i, _)| i.is_allocated()));
    let spills = alloc
        .instrs
        .iter()
        .filter(|(_, c)| c.as_deref().is_some_and(|c| c.starts_with("spill")))
        .count();
    let restores = alloc
        .instrs
        .iter()
        .filter(|(_, c)| c.as_deref().is_some_and(|c| c.starts_with("restore")))
        .count();
    assert!(spills > 0 && restores > 0);
}

#[test]
fn spilled_values_are_loaded_before_reads_and_stored_after_writes() {
    let alloc = LinearScanAllocator::new()
        .allocate(many_live_values(8))
        .expect("allocate");
    let instrs = &alloc.instrs;
    let annotated = |c: &Option<String>, kind: &str| c.as_deref().is_some_and(|c| c.starts_with(kind));

    let mut bracketed = 0;
    for (k, (instr, comment)) in instrs.iter().enumerate() {
        if comment.is_some() {
            continue;
        }
        let loaded: Vec<PhysReg> = instrs[..k]
            .iter()
            .rev()
            .take_while(|(_, c)| annotated(c, "restore"))
            .flat_map(|(i, _)| scratch(i.defs()))
            .collect();
        let stored: Vec<PhysReg> = instrs[k + 1..]
            .iter()
            .take_while(|(_, c)| annotated(c, "spill"))
            .flat_map(|(i, _)| scratch(i.uses()))
            .collect();
        for p in scratch(instr.uses()) {
            assert!(loaded.contains(&p), "{instr} reads {p} without a load");
            bracketed += 1;
        }
        for p in scratch(instr.defs()) {
            assert!(stored.contains(&p), "{instr} writes {p} without a store");
            bracketed += 1;
        }
    }
    assert!(bracketed > 0);

    // Every load and store sits next to the instruction it serves.
    for (k, (instr, comment)) in instrs.iter().enumerate() {
        if annotated(comment, "restore") {
            let (user, _) = instrs[k + 1..]
                .iter()
                .find(|(_, c)| c.is_none())
                .expect("instruction after a load");
            for p in scratch(instr.defs()) {
                assert!(scratch(user.uses()).contains(&p), "{instr} feeds {user}");
            }
        } else if annotated(comment, "spill") {
            let (writer, _) = instrs[..k]
                .iter()
                .rev()
                .find(|(_, c)| c.is_none())
                .expect("instruction before a store");
            for p in scratch(instr.uses()) {
                assert!(scratch(writer.defs()).contains(&p), "{instr} follows {writer}");
            }
        }
    }
}

#[test]
fn loop_carried_temp_keeps_its_register_around_the_back_edge() {
    common::init_logging();
    let canon = canonicalize_unit(common::counting_loop_unit()).expect("canonicalize");
    let body = canon.functions[0].body.clone();
    let instrs = Tiler::new().tile_body(body).expect("tile");
    let back_edge = instrs
        .iter()
        .position(|i| matches!(i, AsmInstr::Jmp { .. }) && i.jump_target() == Some("Main.top"))
        .expect("back edge");

    let mut live = LiveIntervals::build(&instrs);
    live.extend_for_labels(&instrs);
    assign_intervals(&mut live);

    let i = live.get(&AbstractReg::Temp("i".into())).expect("interval for i");
    assert!(i.end >= back_edge, "i ends at {} before the jump at {back_edge}", i.end);
    let Assignment::Reg(home) = i.assignment else {
        panic!("i should stay in a register, got {:?}", i.assignment);
    };
    for other in live.intervals.iter().filter(|iv| iv.reg != i.reg) {
        if other.overlaps(i.start, i.end) {
            assert_ne!(other.assignment, Assignment::Reg(home), "{} shares {home} with i", other.reg);
        }
    }
    let k = live.get(&AbstractReg::Temp("k".into())).expect("interval for k");
    assert!(k.overlaps(i.start, i.end));

    let alloc = LinearScanAllocator::new().allocate(instrs).expect("allocate");
    assert!(alloc.instrs.iter().all(|(i, _)| i.is_allocated()));
}

#[test]
fn small_body_needs_no_frame() {
    let unit = common::return_sum_unit();
    let canon = canonicalize_unit(unit).expect("canonicalize");
    let body = canon.functions[0].body.clone();
    let instrs = Tiler::new().tile_body(body).expect("tile");
    let alloc = LinearScanAllocator::new().allocate(instrs).expect("allocate");
    assert_eq!(alloc.frame_slots, 0);
    assert!(alloc.instrs.iter().all(|(i, _)| i.is_allocated()));
}

#[test]
fn basic_allocator_gives_each_register_a_slot() {
    let instrs = many_live_values(4);
    let mut regs = Vec::new();
    for i in &instrs {
        for a in i.abstract_regs() {
            if !regs.contains(&a) {
                regs.push(a);
            }
        }
    }
    let alloc = BasicAllocator::new().allocate(instrs).expect("allocate");
    assert_eq!(alloc.frame_slots, regs.len());
    assert!(alloc.instrs.iter().all(|(i, _)| i.is_allocated()));
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn scratch(regs: Vec<Reg>) -> Vec<PhysReg> {
    regs.into_iter()
        .filter_map(|r| match r {
            Reg::Phys(p) if PhysReg::SCRATCH.contains(&p) => Some(p),
            _ => None,
        })
        .collect()
}

fn assert_closed(stmt: &Stmt) {
    match &stmt.kind {
        StmtKind::CJump { cond: e, .. }
        | StmtKind::Exp(e)
        | StmtKind::Jump(e)
        | StmtKind::Return(Some(e)) => assert_pure(e),
        StmtKind::Move { target, source } => {
            assert_pure(target);
            assert_pure(source);
        }
        StmtKind::Seq(stmts) => stmts.iter().for_each(assert_closed),
        StmtKind::Call { target, args } => {
            assert_pure(target);
            args.iter().for_each(assert_pure);
        }
        StmtKind::Label(_) | StmtKind::Comment(_) | StmtKind::Return(None) => {}
    }
}

fn assert_pure(expr: &Expr) {
    match &expr.kind {
        ExprKind::ESeq { .. } | ExprKind::Call { .. } => panic!("not canonical: {expr}"),
        ExprKind::BinOp { left, right, .. } => {
            assert_pure(left);
            assert_pure(right);
        }
        ExprKind::Mem(addr) => assert_pure(addr),
        ExprKind::Const(_) | ExprKind::Name { .. } | ExprKind::Temp { .. } => {}
    }
}
