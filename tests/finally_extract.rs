use finally_dec_rs::ir::{InsnId, Literal, RawArg, SsaVarId};
use finally_dec_rs::trycatch::{HandlerId, TryId};
use finally_dec_rs::{DecompileOptions, Decompiler, MethodBuilder, MethodNode};
use petgraph::graph::NodeIndex;

fn run(b: MethodBuilder, options: DecompileOptions) -> MethodNode {
    let mut mth = b.load().unwrap();
    Decompiler::new(options).process_method(&mut mth).unwrap();
    mth
}

fn insns(mth: &MethodNode, block: usize) -> Vec<InsnId> {
    mth.block_insns(NodeIndex::new(block)).to_vec()
}

fn suppressed(mth: &MethodNode, block: usize) -> Vec<bool> {
    insns(mth, block)
        .into_iter()
        .map(|id| mth.insn(id).flags.suppress)
        .collect()
}

fn no_marks(mth: &MethodNode) -> bool {
    (0..mth.insn_count()).all(|i| {
        let flags = mth.insn(InsnId(i as u32)).flags;
        !flags.suppress && !flags.finally
    })
}

/// try { work(); } finally { close(); }
fn simple_finally() -> MethodBuilder {
    let mut b = MethodBuilder::new("Simple.run()V");
    let body = b.block();
    let after = b.block();
    let handler = b.block();
    b.invoke(body, "work()V", vec![]);
    b.invoke(after, "close()V", vec![]);
    b.ret(after);
    let t = b.move_exception(handler, 0);
    b.invoke(handler, "close()V", vec![]);
    b.throw(handler, t);
    b.edge(body, after);
    b.try_block(&[body], &[(handler, &[][..])]);
    b
}

#[test]
fn test_simple_finally_before_return() {
    let mth = run(simple_finally(), DecompileOptions::default());

    assert!(mth.handler(HandlerId(0)).is_finally);
    assert_eq!(suppressed(&mth, 1), vec![true, false]);
    let handler = insns(&mth, 2);
    assert!(mth.insn(handler[1]).flags.finally);
    assert!(mth.insn(handler[2]).flags.suppress);
    assert!(mth.comments().is_empty());
    assert!(mth.errors().is_empty());
}

#[test]
fn test_empty_finally_is_removed() {
    let mut b = MethodBuilder::new("Empty.run()V");
    let body = b.block();
    let after = b.block();
    let handler = b.block();
    b.invoke(body, "work()V", vec![]);
    b.ret(after);
    let t = b.move_exception(handler, 0);
    b.throw(handler, t);
    b.edge(body, after);
    b.try_block(&[body], &[(handler, &[][..])]);
    let mth = run(b, DecompileOptions::default());

    let handler = mth.handler(HandlerId(0));
    assert!(handler.removed);
    assert!(!handler.is_finally);
    assert!(mth.try_block(TryId(0)).implicit);
    assert!(mth.active_try_blocks().is_empty());
    assert!(mth.comments().is_empty());
    assert!(mth.errors().is_empty());
}

/// try { work(); } catch (E e) { handle(); } finally { close(); }
fn catch_and_finally(catch_has_copy: bool) -> MethodBuilder {
    let mut b = MethodBuilder::new("Catch.run()V");
    let body = b.block();
    let after = b.block();
    let catch_e = b.block();
    let handler = b.block();
    b.invoke(body, "work()V", vec![]);
    b.invoke(after, "close()V", vec![]);
    b.ret(after);
    b.move_exception(catch_e, 1);
    b.invoke(catch_e, "handle()V", vec![]);
    if catch_has_copy {
        b.invoke(catch_e, "close()V", vec![]);
    }
    b.ret(catch_e);
    let t = b.move_exception(handler, 0);
    b.invoke(handler, "close()V", vec![]);
    b.throw(handler, t);
    b.edge(body, after);
    b.try_block(&[body], &[(catch_e, &["LE;"][..]), (handler, &[][..])]);
    b
}

#[test]
fn test_catch_and_finally() {
    let mth = run(catch_and_finally(true), DecompileOptions::default());

    assert!(mth.handler(HandlerId(1)).is_finally);
    assert!(!mth.handler(HandlerId(0)).is_finally);
    assert_eq!(suppressed(&mth, 1), vec![true, false]);
    assert_eq!(suppressed(&mth, 2), vec![false, false, true, false]);
}

#[test]
fn test_missing_copy_in_catch_fails_softly() {
    let mth = run(catch_and_finally(false), DecompileOptions::default());

    assert!(!mth.handler(HandlerId(1)).is_finally);
    assert!(no_marks(&mth));
    assert_eq!(mth.comments().len(), 1);
    assert!(mth.comments()[0].contains("try0"));
    assert!(mth.errors().is_empty());
}

#[test]
fn test_nested_try_is_merged() {
    // try { try { a(); } catch (E e) { b(); } } finally { f(); }
    let mut b = MethodBuilder::new("Nested.run()V");
    let body = b.block();
    let after = b.block();
    let catch_e = b.block();
    let handler = b.block();
    b.invoke(body, "a()V", vec![]);
    b.invoke(after, "f()V", vec![]);
    b.ret(after);
    b.move_exception(catch_e, 1);
    b.invoke(catch_e, "b()V", vec![]);
    b.invoke(catch_e, "f()V", vec![]);
    b.ret(catch_e);
    let t = b.move_exception(handler, 0);
    b.invoke(handler, "f()V", vec![]);
    b.throw(handler, t);
    b.edge(body, after);
    let outer = b.try_block(&[body, catch_e], &[(handler, &[][..])]);
    let inner = b.try_block(&[body], &[(catch_e, &["LE;"][..])]);
    b.nest(inner, outer);
    let mth = run(b, DecompileOptions::default());

    assert!(mth.handler(HandlerId(0)).is_finally);
    assert!(mth.try_block(TryId(1)).merged);
    assert_eq!(mth.active_try_blocks(), &[TryId(0)]);
    assert!(mth.try_block(TryId(0)).handlers.contains(&HandlerId(1)));
    assert_eq!(suppressed(&mth, 1), vec![true, false]);
    assert_eq!(suppressed(&mth, 2), vec![false, false, true, false]);
}

#[test]
fn test_extraction_is_idempotent() {
    let mut mth = simple_finally().load().unwrap();
    let decompiler = Decompiler::default();
    decompiler.process_method(&mut mth).unwrap();
    let first: Vec<_> = (0..mth.insn_count())
        .map(|i| mth.insn(InsnId(i as u32)).flags)
        .collect();

    decompiler.process_method(&mut mth).unwrap();
    let second: Vec<_> = (0..mth.insn_count())
        .map(|i| mth.insn(InsnId(i as u32)).flags)
        .collect();
    assert_eq!(first, second);
    assert!(mth.comments().is_empty());
}

#[test]
fn test_different_constant_is_not_a_copy() {
    let mut b = MethodBuilder::new("Const.run()V");
    let body = b.block();
    let after = b.block();
    let handler = b.block();
    b.invoke(body, "work()V", vec![]);
    let one = b.konst(after, 1, Literal::Int(1));
    b.invoke(after, "log(I)V", vec![RawArg::Var(one)]);
    b.ret(after);
    let t = b.move_exception(handler, 0);
    let two = b.konst(handler, 1, Literal::Int(2));
    b.invoke(handler, "log(I)V", vec![RawArg::Var(two)]);
    b.throw(handler, t);
    b.edge(body, after);
    b.try_block(&[body], &[(handler, &[][..])]);
    let mth = run(b, DecompileOptions::default());

    assert!(!mth.handler(HandlerId(0)).is_finally);
    assert!(no_marks(&mth));
    assert_eq!(mth.comments().len(), 1);
}

#[test]
fn test_renamed_register_is_tolerated() {
    let mut b = MethodBuilder::new("Rename.run()V");
    let body = b.block();
    let after = b.block();
    let handler = b.block();
    let res = b.named_var(2, "res", "Ljava/io/Closeable;");
    let res_copy = b.named_var(3, "res", "Ljava/io/Closeable;");
    b.invoke(body, "work()V", vec![]);
    b.invoke(after, "close(Ljava/io/Closeable;)V", vec![RawArg::Var(res)]);
    b.ret(after);
    let t = b.move_exception(handler, 0);
    b.invoke(handler, "close(Ljava/io/Closeable;)V", vec![RawArg::Var(res_copy)]);
    b.throw(handler, t);
    b.edge(body, after);
    b.try_block(&[body], &[(handler, &[][..])]);
    let mth = run(b, DecompileOptions::default());

    assert!(mth.handler(HandlerId(0)).is_finally);
    assert_eq!(
        mth.var(SsaVarId(res)).code_var,
        mth.var(SsaVarId(res_copy)).code_var
    );
}

/// Copy split over two blocks, which only the traversal engine follows
fn split_copy() -> MethodBuilder {
    let mut b = MethodBuilder::new("Split.run()V");
    let body = b.block();
    let first = b.block();
    let second = b.block();
    let handler = b.block();
    b.invoke(body, "work()V", vec![]);
    b.invoke(first, "x()V", vec![]);
    b.invoke(second, "y()V", vec![]);
    b.ret(second);
    let t = b.move_exception(handler, 0);
    b.invoke(handler, "x()V", vec![]);
    b.invoke(handler, "y()V", vec![]);
    b.throw(handler, t);
    b.edge(body, first).edge(first, second);
    b.try_block(&[body], &[(handler, &[][..])]);
    b
}

#[test]
fn test_traversal_handles_split_copy() {
    let mth = run(split_copy(), DecompileOptions::default());

    assert!(mth.handler(HandlerId(0)).is_finally);
    assert_eq!(suppressed(&mth, 1), vec![true]);
    assert_eq!(suppressed(&mth, 2), vec![true, false]);
    assert!(mth.block(NodeIndex::new(1)).flags.suppressed);
    assert!(!mth.block(NodeIndex::new(2)).flags.suppressed);
    assert!(mth.block(NodeIndex::new(3)).flags.finally);
}

#[test]
fn test_exploration_limit_is_reported_as_comment() {
    let options = DecompileOptions {
        exploration_limit: 2,
        ..DecompileOptions::default()
    };
    let mth = run(split_copy(), options);

    assert!(!mth.handler(HandlerId(0)).is_finally);
    assert!(no_marks(&mth));
    assert!(mth.comments()[0].contains("exploration limit"));
    assert!(mth.errors().is_empty());
}

#[test]
fn test_copy_on_every_return() {
    let mut b = MethodBuilder::new("Returns.run(Z)V");
    let body = b.block();
    let left = b.block();
    let right = b.block();
    let handler = b.block();
    let cond = b.var(1);
    b.invoke(body, "work()V", vec![]);
    b.if_test(body, cond);
    b.invoke(left, "close()V", vec![]);
    b.ret(left);
    b.invoke(right, "close()V", vec![]);
    b.ret(right);
    let t = b.move_exception(handler, 0);
    b.invoke(handler, "close()V", vec![]);
    b.throw(handler, t);
    b.edge(body, left).edge(body, right);
    b.try_block(&[body], &[(handler, &[][..])]);
    let mth = run(b, DecompileOptions::default());

    assert!(mth.handler(HandlerId(0)).is_finally);
    assert_eq!(suppressed(&mth, 1), vec![true, false]);
    assert_eq!(suppressed(&mth, 2), vec![true, false]);
}

#[test]
fn test_finally_inside_loop_body() {
    // while (c) { try { work(); } finally { close(); } } return;
    let mut b = MethodBuilder::new("Loop.run(Z)V");
    let head = b.block();
    let body = b.block();
    let after = b.block();
    let done = b.block();
    let handler = b.block();
    let cond = b.var(1);
    b.if_test(head, cond);
    b.invoke(body, "work()V", vec![]);
    b.invoke(after, "close()V", vec![]);
    b.goto(after);
    b.ret(done);
    let t = b.move_exception(handler, 0);
    b.invoke(handler, "close()V", vec![]);
    b.throw(handler, t);
    b.edge(head, body).edge(head, done).edge(body, after).edge(after, head);
    b.try_block(&[body], &[(handler, &[][..])]);
    let mth = run(b, DecompileOptions::default());

    assert!(mth.handler(HandlerId(0)).is_finally);
    assert_eq!(suppressed(&mth, after), vec![true, false]);
    assert_eq!(suppressed(&mth, done), vec![false]);
    assert!(mth.comments().is_empty());
}

#[test]
fn test_finally_inside_do_while_body() {
    // do { try { work(); } finally { close(); } } while (c); return;
    let mut b = MethodBuilder::new("DoWhile.run(Z)V");
    let body = b.block();
    let after = b.block();
    let done = b.block();
    let handler = b.block();
    let cond = b.var(1);
    b.invoke(body, "work()V", vec![]);
    b.invoke(after, "close()V", vec![]);
    b.if_test(after, cond);
    b.ret(done);
    let t = b.move_exception(handler, 0);
    b.invoke(handler, "close()V", vec![]);
    b.throw(handler, t);
    b.edge(body, after).edge(after, body).edge(after, done);
    b.try_block(&[body], &[(handler, &[][..])]);
    let mth = run(b, DecompileOptions::default());

    assert!(mth.handler(HandlerId(0)).is_finally);
    assert_eq!(suppressed(&mth, after), vec![true, false]);
    assert!(mth.comments().is_empty());
}

#[test]
fn test_disabled_extraction_leaves_method_untouched() {
    let options = DecompileOptions {
        extract_finally: false,
        ..DecompileOptions::default()
    };
    let mth = run(simple_finally(), options);
    assert!(!mth.handler(HandlerId(0)).is_finally);
    assert!(no_marks(&mth));
}

#[test]
fn test_report_lists_canonical_and_suppressed() {
    let report = Decompiler::default()
        .decompile_method(std::sync::Arc::new(simple_finally().build()))
        .unwrap();
    assert_eq!(report.finally_blocks.len(), 1);
    let finally = &report.finally_blocks[0];
    assert_eq!(finally.try_block, TryId(0));
    assert_eq!(finally.canonical.len(), 1);
    assert_eq!(finally.suppressed.len(), 1);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["name"], "Simple.run()V");
}
