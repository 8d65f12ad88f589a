//! Program builders shared by the integration tests
#![allow(dead_code)]

use ilxlate::ast::{
    BinaryOp, Dispatch, FieldRef, MethodRef, NodeId, NodeKind, PrimitiveType, QualifiedMemberId,
    Tree, TypeRef, UnaryOp, VariableKind,
};
use ilxlate::program::{Function, MemberInfo, Program, TypeInfo, TypeSystem};

pub const POINT: &str = "Demo.Point";
pub const PROGRAM: &str = "Demo.Program";

pub fn int() -> TypeRef {
    TypeRef::Primitive(PrimitiveType::Int32)
}

pub fn point() -> TypeRef {
    TypeRef::value_type(POINT)
}

pub fn point_ctor() -> QualifiedMemberId {
    QualifiedMemberId::new(POINT, ".ctor", "(System.Int32,System.Int32,System.Int32)")
}

pub fn member(name: &str, signature: &str) -> QualifiedMemberId {
    QualifiedMemberId::new(PROGRAM, name, signature)
}

pub fn types() -> TypeSystem {
    let mut types = TypeSystem::new();
    types.add_type(TypeInfo {
        name: POINT.to_string(),
        value_type: true,
        pure_disposal: false,
    });
    types
}

/// `Point(int x, int y, int z) { this.X = x; this.Y = y; this.Z = z; }`
pub fn point_constructor() -> Function {
    let mut tree = Tree::new();
    let this = tree.this_variable(TypeRef::by_ref(point()));
    for (index, field) in ["X", "Y", "Z"].iter().enumerate() {
        let parameter = tree.parameter(field.to_lowercase(), index, int());
        let receiver = tree.var(this);
        let target = tree.field(receiver, FieldRef::instance(POINT, *field), int());
        let value = tree.var(parameter);
        let assign = tree.assign(target, value);
        let stmt = tree.expr_stmt(assign);
        tree.push_statement(stmt).expect("attach statement");
    }
    Function::new(point_ctor(), tree)
}

/// `void Consume(ref Point p) { p.X; }`: reads through the reference only
pub fn consume() -> Function {
    let mut tree = Tree::new();
    let p = tree.parameter("p", 0, TypeRef::by_ref(point()));
    let receiver = tree.var(p);
    let read = tree.field(receiver, FieldRef::instance(POINT, "X"), int());
    let stmt = tree.expr_stmt(read);
    tree.push_statement(stmt).expect("attach statement");
    Function::new(member("Consume", "(Demo.Point&)"), tree)
}

/// `void Keep(ref Point p) { Program.last = p; }`: retains the reference
pub fn keep() -> Function {
    let mut tree = Tree::new();
    let p = tree.parameter("p", 0, TypeRef::by_ref(point()));
    let target = tree.static_field(
        FieldRef::static_field(PROGRAM, "last"),
        TypeRef::by_ref(point()),
    );
    let value = tree.var(p);
    let assign = tree.assign(target, value);
    let stmt = tree.expr_stmt(assign);
    tree.push_statement(stmt).expect("attach statement");
    Function::new(member("Keep", "(Demo.Point&)"), tree)
}

/// `for (i = 0; i < 1000; i++) { callee(ref new Point(i, i, i)); }`
///
/// Returns the function and its loop node.
pub fn point_loop(name: &str, callee: QualifiedMemberId, dispatch: Dispatch) -> (Function, NodeId) {
    point_loop_calling(name, MethodRef::Member(callee), dispatch)
}

pub fn point_loop_calling(name: &str, callee: MethodRef, dispatch: Dispatch) -> (Function, NodeId) {
    let mut tree = Tree::new();
    let i = tree.local("i", int());

    let i_init = tree.var(i);
    let zero = tree.int(0);
    let init = tree.assign(i_init, zero);
    let i_cond = tree.var(i);
    let limit = tree.int(1000);
    let bool_type = TypeRef::Primitive(PrimitiveType::Bool);
    let cond = tree.binary(BinaryOp::Lt, i_cond, limit, bool_type);
    let i_update = tree.var(i);
    let update = tree.unary(UnaryOp::PostIncrement, i_update, int());

    let args = (0..3).map(|_| tree.var(i)).collect::<Vec<_>>();
    let construction = tree.new_object(point_ctor(), args, point());
    let reference = tree.reference_of(construction);
    let call = tree.invocation(callee, dispatch, None, vec![reference], TypeRef::Void);
    let call_stmt = tree.expr_stmt(call);
    let body = tree.block(vec![call_stmt]);
    let lp = tree.for_loop(init, cond, update, body);
    tree.push_statement(lp).expect("attach loop");
    (Function::new(member(name, "()"), tree), lp)
}

pub fn program(functions: Vec<Function>, types: TypeSystem) -> Program {
    let mut program = Program::new(types);
    for function in functions {
        program.add_function(function).expect("unique function");
    }
    program
}

pub fn count_kind(tree: &Tree, root: NodeId, pred: impl Fn(&NodeKind) -> bool) -> usize {
    tree.descendants(root)
        .into_iter()
        .filter(|&n| pred(tree.kind(n)))
        .count()
}

pub fn hoisted_variables(tree: &Tree) -> usize {
    tree.variables()
        .filter(|(_, v)| v.kind == VariableKind::Hoisted)
        .count()
}

pub fn overridable(types: &mut TypeSystem, id: QualifiedMemberId) {
    types.add_member(MemberInfo {
        id,
        overridable: true,
        pure: false,
    });
}
