#![allow(dead_code)]

use joos_backend::ir::{BinOpKind, CompUnit};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `Main.main() { return 1 + 2; }`
pub fn return_sum_unit() -> CompUnit {
    let mut unit = CompUnit::new("Main");
    let b = &mut unit.builder;
    let one = b.constant(1);
    let two = b.constant(2);
    let sum = b.binop(BinOpKind::Add, one, two);
    let body = b.ret(Some(sum));
    unit.add_function("Main.main", body, 0);
    unit
}

/// `Main.main() { return Lib.twice(20) + Main.x; }` with `static int x = 2;`
/// plus `Lib.twice(n) { return n * 2; }` in a second unit.
pub fn two_unit_program() -> Vec<CompUnit> {
    let mut main = CompUnit::new("Main");
    let b = &mut main.builder;
    let twice = b.global_name("Lib.twice");
    let arg = b.constant(20);
    let call = b.call(twice, vec![arg]);
    let field = b.global_temp("Main.x");
    let sum = b.binop(BinOpKind::Add, call, field);
    let body = b.ret(Some(sum));
    let init = b.constant(2);
    main.add_function("Main.main", body, 0);
    main.add_static_field("Main.x", init);

    let mut lib = CompUnit::new("Lib");
    let b = &mut lib.builder;
    let n = b.arg_temp(0);
    let two = b.constant(2);
    let product = b.binop(BinOpKind::Mul, n, two);
    let body = b.ret(Some(product));
    lib.add_function("Lib.twice", body, 1);

    vec![main, lib]
}

/// `Main.main() { i = 0; while (i < 10) { i = i + 1; k = 7; k + k; } return 0; }`
pub fn counting_loop_unit() -> CompUnit {
    let mut unit = CompUnit::new("Main");
    let b = &mut unit.builder;
    let i = b.temp("i");
    let zero = b.constant(0);
    let init = b.mov(i, zero);
    let top = b.label("Main.top");
    let i = b.temp("i");
    let ten = b.constant(10);
    let done = b.binop(BinOpKind::Geq, i, ten);
    let test = b.cjump(done, "Main.done", "Main.body");
    let body = b.label("Main.body");
    let i = b.temp("i");
    let read = b.temp("i");
    let one = b.constant(1);
    let next = b.binop(BinOpKind::Add, read, one);
    let step = b.mov(i, next);
    let k = b.temp("k");
    let seven = b.constant(7);
    let set_k = b.mov(k, seven);
    let k1 = b.temp("k");
    let k2 = b.temp("k");
    let twice = b.binop(BinOpKind::Add, k1, k2);
    let discard = b.exp(twice);
    let back = b.jump_to("Main.top");
    let exit = b.label("Main.done");
    let zero = b.constant(0);
    let ret = b.ret(Some(zero));
    let body = b.seq(vec![init, top, test, body, step, set_k, discard, back, exit, ret]);
    unit.add_function("Main.main", body, 0);
    unit
}

/// `Main.main() { x = 5; return x + Main.f(); }` plus `Main.f() { return 1; }`
pub fn value_across_call_unit() -> CompUnit {
    let mut unit = CompUnit::new("Main");
    let b = &mut unit.builder;
    let x = b.temp("x");
    let five = b.constant(5);
    let init = b.mov(x, five);
    let x = b.temp("x");
    let f = b.global_name("Main.f");
    let call = b.call(f, vec![]);
    let sum = b.binop(BinOpKind::Add, x, call);
    let ret = b.ret(Some(sum));
    let body = b.seq(vec![init, ret]);
    unit.add_function("Main.main", body, 0);

    let one = unit.builder.constant(1);
    let body = unit.builder.ret(Some(one));
    unit.add_function("Main.f", body, 0);
    unit
}
