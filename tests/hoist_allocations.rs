//! Integration tests for allocation hoisting

mod common;

use common::*;
use ilxlate::analysis::optimization_passes::{HoistAllocationsPass, OptimizationPass, PassContext};
use ilxlate::ast::{
    Dispatch, Literal, MethodRef, NodeId, NodeKind, PrimitiveType, Tree, TypeRef, UnaryOp,
    VariableId, VariableKind,
};
use ilxlate::program::{Function, TypeSystem};
use ilxlate::{FunctionAnalysisEngine, PassConfig, RedirectionTable, TranslateOptions, Translator};

fn sequential() -> TranslateOptions {
    TranslateOptions {
        parallel: false,
        ..TranslateOptions::default()
    }
}

#[test]
fn test_struct_in_loop_is_hoisted_to_one_temporary() {
    let (main, lp) = point_loop("Main", member("Consume", "(Demo.Point&)"), Dispatch::Direct);
    let program = program(vec![main, consume(), point_constructor()], types());

    let translator = Translator::new(sequential(), RedirectionTable::empty());
    let report = translator.translate(&program).expect("Failed to translate program");
    assert_eq!(report.failed().count(), 0);

    let outcome = report
        .outcome(&member("Main", "()"))
        .expect("Main has an outcome");
    let applied = &outcome.result.as_ref().expect("Main translated").passes_applied;
    assert_eq!(applied, &vec!["hoist-allocations"]);

    let function = program.lock(&member("Main", "()")).expect("Failed to lock Main");
    let tree = &function.tree;
    assert_eq!(hoisted_variables(tree), 1);
    assert_eq!(
        count_kind(tree, lp, |k| matches!(k, NodeKind::NewObject { .. })),
        0,
        "the loop must not allocate"
    );

    // var $hoisted0 = default(Point); precedes the loop
    let statements = tree.children(tree.root());
    assert_eq!(statements.len(), 2);
    assert_eq!(*tree.kind(statements[0]), NodeKind::VariableDeclaration);
    assert_eq!(statements[1], lp);
    let declarators = tree.children(statements[0]);
    assert_eq!(declarators.len(), 1);
    let NodeKind::VariableDeclarator { variable } = *tree.kind(declarators[0]) else {
        panic!("expected a declarator");
    };
    assert_eq!(tree.variable(variable).name, "$hoisted0");
    assert_eq!(tree.variable(variable).ty, point());
    let initializer = tree.children(declarators[0])[0];
    assert_eq!(*tree.kind(initializer), NodeKind::DefaultValue);

    // Consume(ref (Point..ctor($hoisted0, i, i, i), $hoisted0))
    let comma = tree
        .descendants(lp)
        .into_iter()
        .find(|&n| matches!(tree.kind(n), NodeKind::Comma))
        .expect("construction was rewritten");
    assert_eq!(*tree.kind(tree.parent(comma).expect("attached")), NodeKind::ReferenceOf);
    let [init, result] = *tree.children(comma) else {
        panic!("expected two comma operands");
    };
    assert_eq!(*tree.kind(result), NodeKind::Variable(variable));
    match tree.kind(init) {
        NodeKind::Invocation {
            method, has_this, ..
        } => {
            assert_eq!(method, &MethodRef::Member(point_ctor()));
            assert!(*has_this);
        }
        other => panic!("expected constructor call, got {:?}", other),
    }
    assert_eq!(
        tree.call_receiver(init).map(|r| tree.kind(r).clone()),
        Some(NodeKind::Variable(variable))
    );
    assert_eq!(tree.call_arguments(init).len(), 3);
}

#[test]
fn test_parallel_translation_matches_sequential() {
    let build = || {
        let (main, _) = point_loop("Main", member("Consume", "(Demo.Point&)"), Dispatch::Direct);
        let (other, _) = point_loop("Other", member("Consume", "(Demo.Point&)"), Dispatch::Direct);
        program(vec![main, other, consume(), point_constructor()], types())
    };

    let sequential_program = build();
    Translator::new(sequential(), RedirectionTable::empty())
        .translate(&sequential_program)
        .expect("Failed to translate sequentially");

    let parallel_program = build();
    let options = TranslateOptions {
        threads: Some(4),
        ..TranslateOptions::default()
    };
    Translator::new(options, RedirectionTable::empty())
        .translate(&parallel_program)
        .expect("Failed to translate in parallel");

    for name in ["Main", "Other"] {
        let a = sequential_program.lock(&member(name, "()")).expect("lock");
        let b = parallel_program.lock(&member(name, "()")).expect("lock");
        assert_eq!(
            a.tree.structural_key(a.tree.root()),
            b.tree.structural_key(b.tree.root()),
            "{} differs between sequential and parallel runs",
            name
        );
    }
}

#[test]
fn test_hoisting_is_idempotent() {
    let (main, _) = point_loop("Main", member("Consume", "(Demo.Point&)"), Dispatch::Direct);
    let program = program(vec![main, consume(), point_constructor()], types());
    let table = RedirectionTable::empty();
    let engine = FunctionAnalysisEngine::new(&program, &table);
    let config = PassConfig::default();
    let ctx = PassContext::new(&engine, &config);

    let mut function = program.lock(&member("Main", "()")).expect("lock");
    assert!(HoistAllocationsPass.run(&mut function, &ctx).expect("first run"));
    engine.invalidate(&function.id);

    let before = function.tree.structural_key(function.tree.root());
    let version = function.tree.version();
    assert!(!HoistAllocationsPass.run(&mut function, &ctx).expect("second run"));
    assert_eq!(function.tree.structural_key(function.tree.root()), before);
    assert_eq!(function.tree.version(), version);
    assert_eq!(hoisted_variables(&function.tree), 1);
}

#[test]
fn test_unknown_callee_keeps_allocation() {
    // Consume is not part of the program, so nothing is known about it
    let (main, lp) = point_loop("Main", member("Consume", "(Demo.Point&)"), Dispatch::Direct);
    let program = program(vec![main, point_constructor()], types());

    Translator::new(sequential(), RedirectionTable::empty())
        .translate(&program)
        .expect("Failed to translate program");

    let function = program.lock(&member("Main", "()")).expect("lock");
    assert_eq!(hoisted_variables(&function.tree), 0);
    assert_eq!(
        count_kind(&function.tree, lp, |k| matches!(k, NodeKind::NewObject { .. })),
        1
    );
}

#[test]
fn test_retaining_callee_keeps_allocation() {
    let (main, lp) = point_loop("Main", member("Keep", "(Demo.Point&)"), Dispatch::Direct);
    let program = program(vec![main, keep(), point_constructor()], types());

    Translator::new(sequential(), RedirectionTable::empty())
        .translate(&program)
        .expect("Failed to translate program");

    let function = program.lock(&member("Main", "()")).expect("lock");
    assert_eq!(hoisted_variables(&function.tree), 0);
    assert_eq!(
        count_kind(&function.tree, lp, |k| matches!(k, NodeKind::NewObject { .. })),
        1
    );
}

#[test]
fn test_constructor_without_body_keeps_allocation() {
    let (main, _) = point_loop("Main", member("Consume", "(Demo.Point&)"), Dispatch::Direct);
    let program = program(vec![main, consume()], types());

    Translator::new(sequential(), RedirectionTable::empty())
        .translate(&program)
        .expect("Failed to translate program");

    let function = program.lock(&member("Main", "()")).expect("lock");
    assert_eq!(hoisted_variables(&function.tree), 0);
}

fn virtual_program() -> ilxlate::Program {
    let consume_id = member("Consume", "(Demo.Point&)");
    let (main, _) = point_loop("Main", consume_id.clone(), Dispatch::Virtual);
    let mut types = types();
    overridable(&mut types, consume_id);
    program(vec![main, consume(), point_constructor()], types)
}

#[test]
fn test_virtual_callee_uses_declared_body_with_heuristic() {
    let program = virtual_program();
    Translator::new(sequential(), RedirectionTable::empty())
        .translate(&program)
        .expect("Failed to translate program");

    let function = program.lock(&member("Main", "()")).expect("lock");
    assert_eq!(hoisted_variables(&function.tree), 1);
}

#[test]
fn test_virtual_callee_escapes_without_heuristic() {
    let program = virtual_program();
    let mut options = sequential();
    options.passes.unresolved_escape_heuristic = false;
    Translator::new(options, RedirectionTable::empty())
        .translate(&program)
        .expect("Failed to translate program");

    let function = program.lock(&member("Main", "()")).expect("lock");
    assert_eq!(hoisted_variables(&function.tree), 0);
}

#[test]
fn test_disabled_pass_changes_nothing() {
    let (main, _) = point_loop("Main", member("Consume", "(Demo.Point&)"), Dispatch::Direct);
    let program = program(vec![main, consume(), point_constructor()], types());
    let mut options = sequential();
    options.passes.hoist_allocations = false;

    let report = Translator::new(options, RedirectionTable::empty())
        .translate(&program)
        .expect("Failed to translate program");
    let outcome = report.outcome(&member("Main", "()")).expect("outcome");
    assert!(outcome.result.as_ref().expect("translated").passes_applied.is_empty());

    let function = program.lock(&member("Main", "()")).expect("lock");
    assert_eq!(hoisted_variables(&function.tree), 0);
}

/// `Peek(ref int value)` reads through its reference only
fn peek() -> Function {
    let mut tree = Tree::new();
    let p = tree.parameter("value", 0, TypeRef::by_ref(int()));
    let read = tree.var(p);
    let stmt = tree.expr_stmt(read);
    tree.push_statement(stmt).expect("attach");
    Function::new(member("Peek", "(System.Int32&)"), tree)
}

/// `while (true) body`
fn forever(tree: &mut Tree, body: NodeId) -> NodeId {
    let cond = tree.literal(Literal::Bool(true), TypeRef::Primitive(PrimitiveType::Bool));
    tree.while_loop(cond, body)
}

/// Target variable of every retarget under `root`, in document order
fn retarget_temporaries(tree: &Tree, root: NodeId) -> Vec<VariableId> {
    tree.descendants(root)
        .into_iter()
        .filter(|&n| matches!(tree.kind(n), NodeKind::Retarget { .. }))
        .map(|n| match tree.kind(tree.children(n)[0]) {
            NodeKind::Variable(v) => *v,
            other => panic!("unexpected retarget target {:?}", other),
        })
        .collect()
}

/// `while (...) { Peek(&a[0]); Peek(&a[0]); Peek(&b[0]); Peek(&a[i++]); }`
fn element_sites() -> Function {
    let mut tree = Tree::new();
    let a = tree.parameter("a", 0, TypeRef::array_of(int()));
    let b = tree.parameter("b", 1, TypeRef::array_of(int()));
    let i = tree.local("i", int());

    let mut statements = Vec::new();
    for array in [a, a, b] {
        let array = tree.var(array);
        let zero = tree.int(0);
        let element = tree.new_element_reference(array, zero, false);
        let call = tree.call(member("Peek", "(System.Int32&)"), None, vec![element], TypeRef::Void);
        statements.push(tree.expr_stmt(call));
    }
    let array = tree.var(a);
    let i_read = tree.var(i);
    let bump = tree.unary(UnaryOp::PostIncrement, i_read, int());
    let element = tree.new_element_reference(array, bump, false);
    let call = tree.call(member("Peek", "(System.Int32&)"), None, vec![element], TypeRef::Void);
    statements.push(tree.expr_stmt(call));

    let body = tree.block(statements);
    let lp = forever(&mut tree, body);
    tree.push_statement(lp).expect("attach");
    Function::new(member("Scan", "(System.Int32[],System.Int32[])"), tree)
}

#[test]
fn test_element_reference_cache_keys() {
    let program = program(vec![element_sites(), peek()], TypeSystem::new());
    Translator::new(sequential(), RedirectionTable::empty())
        .translate(&program)
        .expect("Failed to translate program");

    let function = program
        .lock(&member("Scan", "(System.Int32[],System.Int32[])"))
        .expect("lock");
    let tree = &function.tree;
    // a[0] shared, b[0] separate, a[i++] never shared
    assert_eq!(hoisted_variables(tree), 3);

    let targets: Vec<_> = tree
        .descendants(tree.root())
        .into_iter()
        .filter(|&n| matches!(tree.kind(n), NodeKind::Retarget { .. }))
        .map(|n| tree.kind(tree.children(n)[0]).clone())
        .collect();
    assert_eq!(targets.len(), 4);
    assert_eq!(targets[0], targets[1]);
    assert_ne!(targets[0], targets[2]);
    assert_ne!(targets[0], targets[3]);
    assert_ne!(targets[2], targets[3]);

    let hoisted: Vec<_> = tree
        .variables()
        .filter(|(_, v)| v.kind == VariableKind::Hoisted)
        .map(|(_, v)| v.ty.clone())
        .collect();
    assert!(hoisted
        .iter()
        .all(|ty| *ty == TypeRef::ElementReference(Box::new(int()))));
}

fn peek2_id() -> ilxlate::ast::QualifiedMemberId {
    member("Peek2", "(System.Int32&,System.Int32,System.Int32&)")
}

/// `Peek2(ref int first, int step, ref int second)` reads all three
fn peek2() -> Function {
    let mut tree = Tree::new();
    let first = tree.parameter("first", 0, TypeRef::by_ref(int()));
    let step = tree.parameter("step", 1, int());
    let second = tree.parameter("second", 2, TypeRef::by_ref(int()));
    for parameter in [first, step, second] {
        let read = tree.var(parameter);
        let stmt = tree.expr_stmt(read);
        tree.push_statement(stmt).expect("attach");
    }
    Function::new(peek2_id(), tree)
}

/// `while (true) { Peek2(&a[i], Inc(ref i), &a[i]); Peek(&a[i]); }`
fn interleaved_sites() -> (Function, NodeId) {
    let mut tree = Tree::new();
    let a = tree.parameter("a", 0, TypeRef::array_of(int()));
    let i = tree.local("i", int());
    let element = |tree: &mut Tree| {
        let array = tree.var(a);
        let index = tree.var(i);
        tree.new_element_reference(array, index, false)
    };

    let first = element(&mut tree);
    let i_ref = tree.var(i);
    let i_ref = tree.reference_of(i_ref);
    let inc = tree.call(member("Inc", "(System.Int32&)"), None, vec![i_ref], int());
    let second = element(&mut tree);
    let pair = tree.call(peek2_id(), None, vec![first, inc, second], TypeRef::Void);
    let pair_stmt = tree.expr_stmt(pair);
    let third = element(&mut tree);
    let single = tree.call(member("Peek", "(System.Int32&)"), None, vec![third], TypeRef::Void);
    let single_stmt = tree.expr_stmt(single);

    let body = tree.block(vec![pair_stmt, single_stmt]);
    let lp = forever(&mut tree, body);
    tree.push_statement(lp).expect("attach");
    (Function::new(member("Stride", "(System.Int32[])"), tree), lp)
}

#[test]
fn test_side_effect_between_sites_splits_temporary() {
    let (stride, lp) = interleaved_sites();
    let program = program(vec![stride, peek(), peek2()], TypeSystem::new());
    Translator::new(sequential(), RedirectionTable::empty())
        .translate(&program)
        .expect("Failed to translate program");

    let function = program
        .lock(&member("Stride", "(System.Int32[])"))
        .expect("lock");
    let tree = &function.tree;
    // Inc(ref i) runs between the two arguments of Peek2, so they must not
    // alias; the later Peek call may reuse the second temporary
    assert_eq!(hoisted_variables(tree), 2);
    let temporaries = retarget_temporaries(tree, lp);
    assert_eq!(temporaries.len(), 3);
    assert_ne!(temporaries[0], temporaries[1]);
    assert_eq!(temporaries[1], temporaries[2]);
}

#[test]
fn test_unresolved_target_keeps_allocation() {
    let callee = MethodRef::Unresolved {
        name: "Consume".to_string(),
    };
    let (main, lp) = point_loop_calling("Main", callee, Dispatch::Direct);
    let program = program(vec![main, consume(), point_constructor()], types());

    let report = Translator::new(sequential(), RedirectionTable::empty())
        .translate(&program)
        .expect("Failed to translate program");
    assert_eq!(report.failed().count(), 0);

    let function = program.lock(&member("Main", "()")).expect("lock");
    assert_eq!(hoisted_variables(&function.tree), 0);
    assert_eq!(
        count_kind(&function.tree, lp, |k| matches!(k, NodeKind::NewObject { .. })),
        1
    );
}

#[test]
fn test_packed_element_reference_stays_packed() {
    // while (true) { Peek(&packed a[0]); Peek(&packed a[0]); }
    let mut tree = Tree::new();
    let a = tree.parameter("a", 0, TypeRef::array_of(int()));
    let mut statements = Vec::new();
    for _ in 0..2 {
        let array = tree.var(a);
        let zero = tree.int(0);
        let element = tree.new_element_reference(array, zero, true);
        let call = tree.call(member("Peek", "(System.Int32&)"), None, vec![element], TypeRef::Void);
        statements.push(tree.expr_stmt(call));
    }
    let body = tree.block(statements);
    let lp = forever(&mut tree, body);
    tree.push_statement(lp).expect("attach");
    let id = member("Packed", "(System.Int32[])");
    let program = program(vec![Function::new(id.clone(), tree), peek()], TypeSystem::new());

    Translator::new(sequential(), RedirectionTable::empty())
        .translate(&program)
        .expect("Failed to translate program");

    let function = program.lock(&id).expect("lock");
    let tree = &function.tree;
    assert_eq!(hoisted_variables(tree), 1);
    assert_eq!(retarget_temporaries(tree, lp).len(), 2);
    assert_eq!(
        count_kind(tree, lp, |k| *k == NodeKind::Retarget { packed: true }),
        2
    );
    assert_eq!(
        count_kind(tree, lp, |k| matches!(k, NodeKind::NewElementReference { .. })),
        0
    );

    let declaration = tree.children(tree.root())[0];
    let declarator = tree.children(declaration)[0];
    let initializer = tree.children(declarator)[0];
    assert_eq!(
        *tree.kind(initializer),
        NodeKind::NewElementReference { packed: true }
    );
}
