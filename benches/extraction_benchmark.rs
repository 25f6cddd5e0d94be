use criterion::{black_box, criterion_group, criterion_main, Criterion};
use finally_dec_rs::{DecompileOptions, Decompiler, MethodBuilder, RawMethod};
use std::sync::Arc;

/// Try block with `returns` exits, each carrying its own copy of a two-call
/// finally body
fn many_returns(returns: usize) -> RawMethod {
    let mut b = MethodBuilder::new("Bench.run()V");
    let body = b.block();
    let handler = b.block();
    let cond = b.var(1);
    b.invoke(body, "work()V", vec![]);
    b.if_test(body, cond);

    let t = b.move_exception(handler, 0);
    b.invoke(handler, "unlock()V", vec![]);
    b.invoke(handler, "close()V", vec![]);
    b.throw(handler, t);

    for _ in 0..returns {
        let exit = b.block();
        b.invoke(exit, "unlock()V", vec![]);
        b.invoke(exit, "close()V", vec![]);
        b.ret(exit);
        b.edge(body, exit);
    }
    b.try_block(&[body], &[(handler, &[][..])]);
    b.build()
}

/// Same shape with each copy split over two blocks, which forces the
/// traversal engine
fn split_returns(returns: usize) -> RawMethod {
    let mut b = MethodBuilder::new("Bench.split()V");
    let body = b.block();
    let handler = b.block();
    let cond = b.var(1);
    b.invoke(body, "work()V", vec![]);
    b.if_test(body, cond);

    let t = b.move_exception(handler, 0);
    b.invoke(handler, "unlock()V", vec![]);
    b.invoke(handler, "close()V", vec![]);
    b.throw(handler, t);

    for _ in 0..returns {
        let first = b.block();
        let second = b.block();
        b.invoke(first, "unlock()V", vec![]);
        b.invoke(second, "close()V", vec![]);
        b.ret(second);
        b.edge(body, first).edge(first, second);
    }
    b.try_block(&[body], &[(handler, &[][..])]);
    b.build()
}

fn extraction_benchmark(c: &mut Criterion) {
    let decompiler = Decompiler::new(DecompileOptions::default());

    let simple = Arc::new(many_returns(8));
    c.bench_function("block_matcher_8_returns", |b| {
        b.iter(|| black_box(decompiler.decompile_method(Arc::clone(&simple)).unwrap()));
    });

    let split = Arc::new(split_returns(8));
    c.bench_function("traversal_8_split_returns", |b| {
        b.iter(|| black_box(decompiler.decompile_method(Arc::clone(&split)).unwrap()));
    });

    let methods: Vec<RawMethod> = (0..64).map(|_| many_returns(4)).collect();
    c.bench_function("parallel_64_methods", |b| {
        b.iter(|| black_box(decompiler.decompile_all(methods.clone())));
    });
}

criterion_group!(benches, extraction_benchmark);
criterion_main!(benches);
