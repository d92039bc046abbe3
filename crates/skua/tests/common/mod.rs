//! Shared parse-tree construction helpers: a thin layer over the public
//! `ast` module so tests read like the programs they encode.

use skua::ast::{
    Ast, BinaryOp, CatchClause, ClassElement, FunctionNode, LogicalOp, Node, NodeId, Param, Span,
    SwitchCase, UnaryOp, UpdateOp,
};
use skua::{Agent, EngineError, Value};

pub struct B {
    pub ast: Ast,
}

#[allow(dead_code, reason = "each test binary uses the slice of the builder it needs")]
impl B {
    pub fn new() -> Self {
        Self { ast: Ast::new() }
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.ast.push(node, Span::ZERO)
    }

    // --- expressions ---

    pub fn num(&mut self, v: f64) -> NodeId {
        self.push(Node::Number(v))
    }

    pub fn str_(&mut self, v: &str) -> NodeId {
        self.push(Node::StringLit(v.into()))
    }

    pub fn boolean(&mut self, v: bool) -> NodeId {
        self.push(Node::Bool(v))
    }

    pub fn null(&mut self) -> NodeId {
        self.push(Node::Null)
    }

    pub fn ident(&mut self, name: &str) -> NodeId {
        self.push(Node::Ident(name.into()))
    }

    pub fn this(&mut self) -> NodeId {
        self.push(Node::This)
    }

    pub fn array(&mut self, items: Vec<NodeId>) -> NodeId {
        let items = items.into_iter().map(Some).collect();
        self.push(Node::Array(items))
    }

    pub fn array_with_holes(&mut self, items: Vec<Option<NodeId>>) -> NodeId {
        self.push(Node::Array(items))
    }

    pub fn object(&mut self, props: Vec<(&str, NodeId)>) -> NodeId {
        let props = props
            .into_iter()
            .map(|(name, value)| {
                let key = self.push(Node::Ident(name.into()));
                self.push(Node::PropKeyValue { key, computed: false, value })
            })
            .collect();
        self.push(Node::ObjectLit(props))
    }

    pub fn member(&mut self, object: NodeId, name: &str) -> NodeId {
        let property = self.push(Node::Ident(name.into()));
        self.push(Node::Member { object, property, computed: false })
    }

    pub fn index(&mut self, object: NodeId, property: NodeId) -> NodeId {
        self.push(Node::Member { object, property, computed: true })
    }

    pub fn call(&mut self, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        self.push(Node::Call { callee, args })
    }

    pub fn method(&mut self, object: NodeId, name: &str, args: Vec<NodeId>) -> NodeId {
        let callee = self.member(object, name);
        self.call(callee, args)
    }

    pub fn new_expr(&mut self, callee: NodeId, args: Vec<NodeId>) -> NodeId {
        self.push(Node::New { callee, args })
    }

    pub fn bin(&mut self, op: BinaryOp, left: NodeId, right: NodeId) -> NodeId {
        self.push(Node::Binary { op, left, right })
    }

    pub fn logical(&mut self, op: LogicalOp, left: NodeId, right: NodeId) -> NodeId {
        self.push(Node::Logical { op, left, right })
    }

    pub fn unary(&mut self, op: UnaryOp, expr: NodeId) -> NodeId {
        self.push(Node::Unary { op, expr })
    }

    pub fn update(&mut self, op: UpdateOp, prefix: bool, target: NodeId) -> NodeId {
        self.push(Node::Update { op, prefix, target })
    }

    pub fn assign(&mut self, target: NodeId, value: NodeId) -> NodeId {
        self.push(Node::Assign { target, op: None, value })
    }

    pub fn assign_op(&mut self, op: BinaryOp, target: NodeId, value: NodeId) -> NodeId {
        self.push(Node::Assign { target, op: Some(op), value })
    }

    /// `name = value` as a statement, targeting a (usually global) binding.
    pub fn set_global(&mut self, name: &str, value: NodeId) -> NodeId {
        let target = self.ident(name);
        let assignment = self.assign(target, value);
        self.expr(assignment)
    }

    pub fn conditional(&mut self, test: NodeId, consequent: NodeId, alternate: NodeId) -> NodeId {
        self.push(Node::Conditional { test, consequent, alternate })
    }

    pub fn await_(&mut self, expr: NodeId) -> NodeId {
        self.push(Node::Await(expr))
    }

    pub fn yield_(&mut self, argument: Option<NodeId>) -> NodeId {
        self.push(Node::Yield { argument, delegate: false })
    }

    pub fn spread(&mut self, expr: NodeId) -> NodeId {
        self.push(Node::Spread(expr))
    }

    // --- functions ---

    pub fn func_expr(&mut self, params: &[&str], body: Vec<NodeId>) -> NodeId {
        self.function(None, params, body, false, false, false)
    }

    pub fn func_decl(&mut self, name: &str, params: &[&str], body: Vec<NodeId>) -> NodeId {
        self.function(Some(name), params, body, false, false, false)
    }

    pub fn generator_expr(&mut self, params: &[&str], body: Vec<NodeId>) -> NodeId {
        self.function(None, params, body, true, false, false)
    }

    pub fn generator_decl(&mut self, name: &str, params: &[&str], body: Vec<NodeId>) -> NodeId {
        self.function(Some(name), params, body, true, false, false)
    }

    pub fn async_func_expr(&mut self, params: &[&str], body: Vec<NodeId>) -> NodeId {
        self.function(None, params, body, false, true, false)
    }

    pub fn async_generator_expr(&mut self, params: &[&str], body: Vec<NodeId>) -> NodeId {
        self.function(None, params, body, true, true, false)
    }

    /// `param => expr`
    pub fn arrow(&mut self, params: &[&str], expr: NodeId) -> NodeId {
        let params = params
            .iter()
            .map(|p| Param { name: (*p).into(), default: None, rest: false })
            .collect();
        self.push(Node::Function(Box::new(FunctionNode {
            name: None,
            params,
            body: vec![expr],
            is_arrow: true,
            is_async: false,
            is_generator: false,
            strict: false,
            expression_body: true,
            source_text: None,
        })))
    }

    pub fn arrow_block(&mut self, params: &[&str], body: Vec<NodeId>) -> NodeId {
        let params = params
            .iter()
            .map(|p| Param { name: (*p).into(), default: None, rest: false })
            .collect();
        self.push(Node::Function(Box::new(FunctionNode {
            name: None,
            params,
            body,
            is_arrow: true,
            is_async: false,
            is_generator: false,
            strict: false,
            expression_body: false,
            source_text: None,
        })))
    }

    fn function(
        &mut self,
        name: Option<&str>,
        params: &[&str],
        body: Vec<NodeId>,
        is_generator: bool,
        is_async: bool,
        strict: bool,
    ) -> NodeId {
        let params = params
            .iter()
            .map(|p| Param { name: (*p).into(), default: None, rest: false })
            .collect();
        self.push(Node::Function(Box::new(FunctionNode {
            name: name.map(Into::into),
            params,
            body,
            is_arrow: false,
            is_async,
            is_generator,
            strict,
            expression_body: false,
            source_text: None,
        })))
    }

    pub fn class_expr(
        &mut self,
        name: Option<&str>,
        heritage: Option<NodeId>,
        elements: Vec<ClassElement>,
    ) -> NodeId {
        self.push(Node::Class(Box::new(skua::ast::ClassNode {
            name: name.map(Into::into),
            heritage,
            elements,
            source_text: None,
        })))
    }

    // --- statements ---

    pub fn expr(&mut self, expr: NodeId) -> NodeId {
        self.push(Node::ExprStmt(expr))
    }

    pub fn var(&mut self, name: &str, init: Option<NodeId>) -> NodeId {
        self.push(Node::VarDecl {
            kind: skua::ast::DeclKind::Var,
            declarations: vec![(name.into(), init)],
        })
    }

    pub fn let_(&mut self, name: &str, init: Option<NodeId>) -> NodeId {
        self.push(Node::VarDecl {
            kind: skua::ast::DeclKind::Let,
            declarations: vec![(name.into(), init)],
        })
    }

    pub fn const_(&mut self, name: &str, init: NodeId) -> NodeId {
        self.push(Node::VarDecl {
            kind: skua::ast::DeclKind::Const,
            declarations: vec![(name.into(), Some(init))],
        })
    }

    pub fn block(&mut self, body: Vec<NodeId>) -> NodeId {
        self.push(Node::Block(body))
    }

    pub fn if_(&mut self, test: NodeId, consequent: NodeId, alternate: Option<NodeId>) -> NodeId {
        self.push(Node::If { test, consequent, alternate })
    }

    pub fn while_(&mut self, test: NodeId, body: NodeId) -> NodeId {
        self.push(Node::While { test, body })
    }

    pub fn for_of(&mut self, left: NodeId, right: NodeId, body: NodeId) -> NodeId {
        self.push(Node::ForOf { left, right, body, awaited: false })
    }

    pub fn ret(&mut self, argument: Option<NodeId>) -> NodeId {
        self.push(Node::Return(argument))
    }

    pub fn throw(&mut self, argument: NodeId) -> NodeId {
        self.push(Node::Throw(argument))
    }

    pub fn try_catch(&mut self, block: NodeId, param: Option<&str>, catch_body: NodeId) -> NodeId {
        self.push(Node::Try {
            block,
            catch: Some(CatchClause { param: param.map(Into::into), body: catch_body }),
            finally: None,
        })
    }

    pub fn try_finally(&mut self, block: NodeId, finally: NodeId) -> NodeId {
        self.push(Node::Try { block, catch: None, finally: Some(finally) })
    }

    pub fn break_(&mut self, label: Option<&str>) -> NodeId {
        self.push(Node::Break(label.map(Into::into)))
    }

    pub fn continue_(&mut self, label: Option<&str>) -> NodeId {
        self.push(Node::Continue(label.map(Into::into)))
    }

    pub fn labelled(&mut self, label: &str, body: NodeId) -> NodeId {
        self.push(Node::Labelled { label: label.into(), body })
    }

    pub fn switch(&mut self, discriminant: NodeId, cases: Vec<SwitchCase>) -> NodeId {
        self.push(Node::Switch { discriminant, cases })
    }

    pub fn script(mut self, body: Vec<NodeId>) -> (Ast, NodeId) {
        let root = self.push(Node::Script { body, strict: false });
        (self.ast, root)
    }

    pub fn module(mut self, body: Vec<NodeId>) -> (Ast, NodeId) {
        let root = self.push(Node::Module { body });
        (self.ast, root)
    }
}

/// Builds and evaluates a script on a fresh agent, returning both so tests
/// can poke at the aftermath.
#[allow(dead_code, reason = "each test binary uses the slice of the helpers it needs")]
pub fn eval(build: impl FnOnce(&mut B) -> Vec<NodeId>) -> (Agent, Result<Value, EngineError>) {
    let mut agent = Agent::default();
    let result = eval_in(&mut agent, build);
    (agent, result)
}

/// Evaluates a script on an existing agent.
#[allow(dead_code, reason = "each test binary uses the slice of the helpers it needs")]
pub fn eval_in(
    agent: &mut Agent,
    build: impl FnOnce(&mut B) -> Vec<NodeId>,
) -> Result<Value, EngineError> {
    let mut b = B::new();
    let body = build(&mut b);
    let (ast, root) = b.script(body);
    let realm = agent.initial_realm();
    let script = agent.add_script(ast, root, "test", realm);
    agent.evaluate_script(script)
}

/// Reads a global binding after evaluation.
#[allow(dead_code, reason = "each test binary uses the slice of the helpers it needs")]
pub fn global(agent: &mut Agent, name: &str) -> Value {
    let realm = agent.initial_realm();
    let global = agent.global_object(realm);
    agent.get_property(global, name).expect("global read")
}
