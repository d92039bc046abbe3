//! The parse-tree interface.
//!
//! The engine does not parse source text; an embedder's parser produces
//! these nodes. An [`Ast`] is an arena of tagged nodes with source spans;
//! the static-semantics helpers (`bound_names`, `var_declared_names`,
//! `lexically_declared_names`, `import_entries`, `module_requests`, …)
//! operate purely on this shape.

use num_bigint::BigInt;

/// Identity of a registered script or module source within an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u32);

impl SourceId {
    pub(crate) fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("source index exceeds u32"))
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a node within one [`Ast`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn new(index: usize) -> Self {
        Self(u32::try_from(index).expect("node index exceeds u32"))
    }

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Source position of a node, for call-site traces and error reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub const ZERO: Self = Self { line: 0, column: 0 };

    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    ShiftRightUnsigned,
    LessThan,
    LessThanEquals,
    GreaterThan,
    GreaterThanEquals,
    LooseEquals,
    LooseNotEquals,
    StrictEquals,
    StrictNotEquals,
    InstanceOf,
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

/// One formal parameter. Binding patterns are not part of this interface;
/// parameters are identifiers with optional defaults and an optional
/// trailing rest.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: Box<str>,
    pub default: Option<NodeId>,
    pub rest: bool,
}

/// A function of any flavor: declaration, expression, arrow, or method.
#[derive(Debug, Clone)]
pub struct FunctionNode {
    pub name: Option<Box<str>>,
    pub params: Vec<Param>,
    /// Statement list, or a single expression when `expression_body`.
    pub body: Vec<NodeId>,
    pub is_arrow: bool,
    pub is_async: bool,
    pub is_generator: bool,
    pub strict: bool,
    /// Arrow functions with `=> expr` bodies: `body[0]` is the expression.
    pub expression_body: bool,
    /// Original source text, for `toString` when the host keeps it.
    pub source_text: Option<Box<str>>,
}

impl FunctionNode {
    /// The `get`/`set`/`async`/`*` flag text, as the standard's FlagText.
    pub fn flag_text(&self) -> &'static str {
        match (self.is_async, self.is_generator) {
            (false, false) => "",
            (false, true) => "*",
            (true, false) => "async",
            (true, true) => "async*",
        }
    }

    /// IsSimpleParameterList: no defaults, no rest.
    pub fn is_simple_parameter_list(&self) -> bool {
        self.params.iter().all(|p| p.default.is_none() && !p.rest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassElementKind {
    Method,
    Getter,
    Setter,
    Field,
}

#[derive(Debug, Clone)]
pub enum ClassKey {
    Ident(Box<str>),
    StringLit(Box<str>),
    Number(f64),
    Computed(NodeId),
    Private(Box<str>),
}

#[derive(Debug, Clone)]
pub struct ClassElement {
    pub kind: ClassElementKind,
    pub is_static: bool,
    pub key: ClassKey,
    /// Method body (a Function node) or field initializer expression.
    pub value: Option<NodeId>,
}

impl ClassElement {
    /// IsStatic of the element.
    pub fn is_static(&self) -> bool {
        self.is_static
    }
}

#[derive(Debug, Clone)]
pub struct ClassNode {
    pub name: Option<Box<str>>,
    pub heritage: Option<NodeId>,
    pub elements: Vec<ClassElement>,
    pub source_text: Option<Box<str>>,
}

#[derive(Debug, Clone)]
pub struct SwitchCase {
    /// `None` for the default clause.
    pub test: Option<NodeId>,
    pub body: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    /// Catch parameter name; `None` for `catch {}`.
    pub param: Option<Box<str>>,
    pub body: NodeId,
}

#[derive(Debug, Clone)]
pub struct ImportSpecifier {
    /// The name exported by the requested module.
    pub import: Box<str>,
    /// The local binding name.
    pub local: Box<str>,
}

#[derive(Debug, Clone)]
pub struct ExportSpecifier {
    /// Local binding (or import name for re-exports).
    pub local: Box<str>,
    /// The name seen by importers.
    pub export: Box<str>,
}

/// A tagged parse-tree node.
#[derive(Debug, Clone)]
pub enum Node {
    // --- roots ---
    Script { body: Vec<NodeId>, strict: bool },
    Module { body: Vec<NodeId> },

    // --- expressions ---
    Null,
    Bool(bool),
    Number(f64),
    StringLit(Box<str>),
    BigIntLit(BigInt),
    Ident(Box<str>),
    This,
    NewTarget,
    ImportMeta,
    /// Array literal; `None` entries are elisions.
    Array(Vec<Option<NodeId>>),
    /// Spread element inside arrays and argument lists.
    Spread(NodeId),
    ObjectLit(Vec<NodeId>),
    PropKeyValue { key: NodeId, computed: bool, value: NodeId },
    PropShorthand(Box<str>),
    PropMethod { key: NodeId, computed: bool, func: NodeId },
    PropGetter { key: NodeId, computed: bool, func: NodeId },
    PropSetter { key: NodeId, computed: bool, func: NodeId },
    PropSpread(NodeId),
    Template { quasis: Vec<Box<str>>, exprs: Vec<NodeId> },
    Member { object: NodeId, property: NodeId, computed: bool },
    PrivateMember { object: NodeId, name: Box<str> },
    SuperProperty { property: NodeId, computed: bool },
    SuperCall { args: Vec<NodeId> },
    Call { callee: NodeId, args: Vec<NodeId> },
    New { callee: NodeId, args: Vec<NodeId> },
    Unary { op: UnaryOp, expr: NodeId },
    Update { op: UpdateOp, prefix: bool, target: NodeId },
    Binary { op: BinaryOp, left: NodeId, right: NodeId },
    Logical { op: LogicalOp, left: NodeId, right: NodeId },
    Conditional { test: NodeId, consequent: NodeId, alternate: NodeId },
    Assign { target: NodeId, op: Option<BinaryOp>, value: NodeId },
    Sequence(Vec<NodeId>),
    Function(Box<FunctionNode>),
    Class(Box<ClassNode>),
    Yield { argument: Option<NodeId>, delegate: bool },
    Await(NodeId),

    // --- statements ---
    Block(Vec<NodeId>),
    VarDecl { kind: DeclKind, declarations: Vec<(Box<str>, Option<NodeId>)> },
    Empty,
    ExprStmt(NodeId),
    If { test: NodeId, consequent: NodeId, alternate: Option<NodeId> },
    DoWhile { body: NodeId, test: NodeId },
    While { test: NodeId, body: NodeId },
    For {
        init: Option<NodeId>,
        test: Option<NodeId>,
        update: Option<NodeId>,
        body: NodeId,
    },
    ForIn { left: NodeId, right: NodeId, body: NodeId },
    ForOf { left: NodeId, right: NodeId, body: NodeId, awaited: bool },
    Continue(Option<Box<str>>),
    Break(Option<Box<str>>),
    Return(Option<NodeId>),
    With { object: NodeId, body: NodeId },
    Labelled { label: Box<str>, body: NodeId },
    Switch { discriminant: NodeId, cases: Vec<SwitchCase> },
    Throw(NodeId),
    Try {
        block: NodeId,
        catch: Option<CatchClause>,
        finally: Option<NodeId>,
    },
    Debugger,

    // --- module items ---
    Import {
        specifier: Box<str>,
        default: Option<Box<str>>,
        namespace: Option<Box<str>>,
        named: Vec<ImportSpecifier>,
    },
    ExportNamed {
        specifier: Option<Box<str>>,
        named: Vec<ExportSpecifier>,
    },
    ExportDecl(NodeId),
    ExportDefault(NodeId),
    ExportStar { specifier: Box<str> },
}

/// An arena of nodes forming one parsed script or module.
#[derive(Debug, Default, Clone)]
pub struct Ast {
    kinds: Vec<Node>,
    spans: Vec<Span>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: Node, span: Span) -> NodeId {
        let id = NodeId::new(self.kinds.len());
        self.kinds.push(node);
        self.spans.push(span);
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.kinds[id.index()]
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.spans[id.index()]
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    // --- static semantics ---

    /// BoundNames of a declaration node.
    pub fn bound_names(&self, id: NodeId) -> Vec<&str> {
        match self.node(id) {
            Node::VarDecl { declarations, .. } => {
                declarations.iter().map(|(name, _)| name.as_ref()).collect()
            }
            Node::Function(f) => f.name.as_deref().into_iter().collect(),
            Node::Class(c) => c.name.as_deref().into_iter().collect(),
            Node::Import { default, namespace, named, .. } => {
                let mut names: Vec<&str> = Vec::new();
                names.extend(default.as_deref());
                names.extend(namespace.as_deref());
                names.extend(named.iter().map(|s| s.local.as_ref()));
                names
            }
            Node::ExportDecl(decl) => self.bound_names(*decl),
            _ => Vec::new(),
        }
    }

    /// VarDeclaredNames of a statement list: `var` names reachable without
    /// crossing a function boundary.
    pub fn var_declared_names<'a>(&'a self, body: &[NodeId]) -> Vec<&'a str> {
        let mut out = Vec::new();
        for &stmt in body {
            self.collect_var_names(stmt, &mut out);
        }
        out
    }

    fn collect_var_names<'a>(&'a self, id: NodeId, out: &mut Vec<&'a str>) {
        match self.node(id) {
            Node::VarDecl { kind: DeclKind::Var, declarations } => {
                out.extend(declarations.iter().map(|(name, _)| name.as_ref()));
            }
            Node::Block(body) => {
                for &stmt in body {
                    self.collect_var_names(stmt, out);
                }
            }
            Node::If { consequent, alternate, .. } => {
                self.collect_var_names(*consequent, out);
                if let Some(alt) = alternate {
                    self.collect_var_names(*alt, out);
                }
            }
            Node::DoWhile { body, .. } | Node::While { body, .. } | Node::With { body, .. } => {
                self.collect_var_names(*body, out);
            }
            Node::For { init, body, .. } => {
                if let Some(init) = init {
                    self.collect_var_names(*init, out);
                }
                self.collect_var_names(*body, out);
            }
            Node::ForIn { left, body, .. } | Node::ForOf { left, body, .. } => {
                self.collect_var_names(*left, out);
                self.collect_var_names(*body, out);
            }
            Node::Labelled { body, .. } => self.collect_var_names(*body, out),
            Node::Switch { cases, .. } => {
                for case in cases {
                    for &stmt in &case.body {
                        self.collect_var_names(stmt, out);
                    }
                }
            }
            Node::Try { block, catch, finally } => {
                self.collect_var_names(*block, out);
                if let Some(catch) = catch {
                    self.collect_var_names(catch.body, out);
                }
                if let Some(finally) = finally {
                    self.collect_var_names(*finally, out);
                }
            }
            Node::ExportDecl(decl) => self.collect_var_names(*decl, out),
            _ => {}
        }
    }

    /// LexicallyDeclaredNames of a statement list: let/const/class names,
    /// plus function declarations (which hoist separately).
    pub fn lexically_declared_names<'a>(&'a self, body: &[NodeId]) -> Vec<&'a str> {
        let mut out = Vec::new();
        for &id in self.lexically_scoped_declarations(body) {
            out.extend(self.bound_names(id));
        }
        out
    }

    /// LexicallyScopedDeclarations: the let/const/class declarations of a
    /// statement list (not descending into blocks).
    pub fn lexically_scoped_declarations<'a>(&self, body: &'a [NodeId]) -> Vec<&'a NodeId> {
        body.iter()
            .filter(|&&id| {
                match self.node(id) {
                    Node::VarDecl { kind, .. } => *kind != DeclKind::Var,
                    Node::Class(_) => true,
                    Node::ExportDecl(decl) => {
                        matches!(self.node(*decl), Node::VarDecl { kind, .. } if *kind != DeclKind::Var)
                            || matches!(self.node(*decl), Node::Class(_))
                    }
                    _ => false,
                }
            })
            .collect()
    }

    /// The function declarations of a statement list, in source order.
    pub fn function_declarations(&self, body: &[NodeId]) -> Vec<NodeId> {
        body.iter()
            .copied()
            .flat_map(|id| match self.node(id) {
                Node::Function(f) if f.name.is_some() && !f.is_arrow => Some(id),
                Node::ExportDecl(decl) => match self.node(*decl) {
                    Node::Function(f) if f.name.is_some() && !f.is_arrow => Some(*decl),
                    _ => None,
                },
                Node::ExportDefault(expr) => match self.node(*expr) {
                    Node::Function(f) if !f.is_arrow => Some(*expr),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    /// ModuleRequests: every specifier this module imports or re-exports
    /// from, in source order, deduplicated.
    pub fn module_requests<'a>(&'a self, body: &[NodeId]) -> Vec<&'a str> {
        let mut out: Vec<&str> = Vec::new();
        for &id in body {
            let specifier = match self.node(id) {
                Node::Import { specifier, .. } => Some(specifier.as_ref()),
                Node::ExportNamed { specifier: Some(specifier), .. } => Some(specifier.as_ref()),
                Node::ExportStar { specifier } => Some(specifier.as_ref()),
                _ => None,
            };
            if let Some(s) = specifier
                && !out.contains(&s)
            {
                out.push(s);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_names_cross_blocks_but_not_functions() {
        let mut ast = Ast::new();
        let inner_var = ast.push(
            Node::VarDecl { kind: DeclKind::Var, declarations: vec![("inner".into(), None)] },
            Span::ZERO,
        );
        let func = ast.push(
            Node::Function(Box::new(FunctionNode {
                name: Some("f".into()),
                params: vec![],
                body: vec![inner_var],
                is_arrow: false,
                is_async: false,
                is_generator: false,
                strict: false,
                expression_body: false,
                source_text: None,
            })),
            Span::ZERO,
        );
        let outer_var = ast.push(
            Node::VarDecl { kind: DeclKind::Var, declarations: vec![("outer".into(), None)] },
            Span::ZERO,
        );
        let block = ast.push(Node::Block(vec![outer_var, func]), Span::ZERO);
        assert_eq!(ast.var_declared_names(&[block]), vec!["outer"]);
    }

    #[test]
    fn flag_text_matches_function_flavor() {
        let mut f = FunctionNode {
            name: None,
            params: vec![],
            body: vec![],
            is_arrow: false,
            is_async: true,
            is_generator: true,
            strict: false,
            expression_body: false,
            source_text: None,
        };
        assert_eq!(f.flag_text(), "async*");
        f.is_async = false;
        assert_eq!(f.flag_text(), "*");
    }
}
