//! Elaboration tree for the reference linker
//!
//! The tree is produced by parsing and cell linking, then mutated in place by
//! the linker passes: placeholder reference nodes (`ParseRef`, `Dot`,
//! `ClassOrPackageRef`) are replaced by bound references (`VarRef`,
//! `VarXRef`, `FTaskRef`, `RefDType`, ...), and consumed declaration nodes
//! (ports, defparams, imports) are deleted.
//!
//! Nodes live in one arena and refer to each other by [`NodeId`]. Deletion
//! is deferred: [`Ast::defer_delete`] queues a node, [`Ast::sweep`] (called
//! between passes, never inside a traversal) tombstones the queued slots, so
//! an in-flight traversal holding an id never reads freed storage.

use rustc_hash::FxHashMap;
use sv_arena::{Arena, ArenaMap, Idx};
use sv_intern::Symbol;
use sv_span::FileSpan;

/// Id of a node in the elaboration tree
pub type NodeId = Idx<Node>;

/// Phase-scoped side table keyed by node id
///
/// Replaces in-node scratch fields: each linker phase owns its own maps and
/// drops them at phase end, so stale cross-phase data cannot be read.
pub type NodeMap<V> = ArenaMap<NodeId, V>;

/// A node: a kind plus its source location
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub span: FileSpan,
}

/// Variable storage classes the linker distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarType {
    /// Plain net; implicit nets are created as single-bit wires
    Wire,
    /// Procedural variable
    Logic,
    /// Overridable module/class parameter
    GParam,
    /// Local parameter
    LParam,
    /// Generate loop index
    GenVar,
}

impl VarType {
    pub fn is_param(self) -> bool {
        matches!(self, Self::GParam | Self::LParam)
    }
}

/// Direction of a modport or clocking item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
    Inout,
}

impl Direction {
    pub fn is_read_only(self) -> bool {
        matches!(self, Self::Input)
    }
}

/// Literal constants; `False` doubles as the safe placeholder substituted
/// for unresolvable expressions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstKind {
    Int(i64),
    False,
}

/// Node kinds
///
/// One closed sum over every declaration, type and expression form the
/// linker touches, so each pass is an exhaustive match.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Tombstone left by [`Ast::sweep`]; traversals skip it
    Deleted,

    // --- structure ---
    /// Root of the design; `modules` is sorted top modules first
    Netlist { modules: Vec<NodeId> },
    Module {
        name: Symbol,
        stmts: Vec<NodeId>,
        /// Hierarchy depth, 1 = top
        level: u16,
        /// Not reachable from any live cell; set by the param pass
        dead: bool,
    },
    Package {
        name: Symbol,
        stmts: Vec<NodeId>,
        /// The compilation-unit package (`$unit`)
        is_unit: bool,
    },
    Iface { name: Symbol, stmts: Vec<NodeId> },
    Class {
        name: Symbol,
        stmts: Vec<NodeId>,
        extends: Option<NodeId>,
    },
    /// `extends Base(args)` / `implements Base` clause under a class
    ClassExtends {
        class_name: Symbol,
        args: Vec<NodeId>,
        is_implements: bool,
        /// Base depends on unresolved parameters; resolution is deferred
        parameterized: bool,
        /// Bound base class, filled by the resolver
        base: Option<NodeId>,
    },
    /// Module/interface instance; `module` is guaranteed linked before this
    /// pass runs. `name` may be dotted (`a.b.c`) after flattening.
    Cell {
        name: Symbol,
        module: Option<NodeId>,
        pins: Vec<NodeId>,
        params: Vec<NodeId>,
        recursive: bool,
    },
    /// Placeholder for an inlined (collapsed) instance; `name` uses the
    /// `__DOT__` joining convention
    CellInline { name: Symbol, orig_module: Symbol },
    /// begin/end block; unnamed blocks have `name: None` until the find
    /// pass synthesizes one (only when they declare something)
    Begin {
        name: Option<Symbol>,
        generate: bool,
        stmts: Vec<NodeId>,
    },
    FTask {
        name: Symbol,
        stmts: Vec<NodeId>,
        is_func: bool,
        is_constructor: bool,
        class_method: bool,
    },
    Constraint { name: Symbol, stmts: Vec<NodeId> },
    Var {
        name: Symbol,
        var_type: VarType,
        dtype: Option<NodeId>,
        is_io: bool,
        /// Set when the var's type resolved to an interface reference
        is_iface_ref: bool,
        is_func_local: bool,
        is_class_member: bool,
        /// Assigned by the param pass from the matching port; 0 = none
        pin_num: u32,
        /// True once a port declaration claimed this var
        port_set: bool,
    },
    Typedef {
        name: Symbol,
        dtype: Option<NodeId>,
        /// Monotonic source-order token for use-before-declaration checks;
        /// 0 disables the check
        decl_token: u32,
    },
    TypedefFwd { name: Symbol },
    EnumDType { items: Vec<NodeId> },
    EnumItem { name: Symbol, value: Option<NodeId> },
    Clocking {
        name: Option<Symbol>,
        items: Vec<NodeId>,
    },
    /// Paired in/out declarations of one clocking signal share a name
    ClockingItem { name: Symbol, direction: Direction },
    Modport { name: Symbol, items: Vec<NodeId> },
    ModportVarRef {
        name: Symbol,
        direction: Direction,
        var: Option<NodeId>,
    },
    ModportFTaskRef {
        name: Symbol,
        is_export: bool,
        ftask: Option<NodeId>,
    },
    /// Positional port declaration, consumed by the param pass
    Port { name: Symbol, pin_num: u32 },
    Pin {
        name: Symbol,
        pin_num: u32,
        expr: Option<NodeId>,
        /// Parameter override rather than signal connection
        param: bool,
        /// Bound port var in the instantiated module
        mod_var: Option<NodeId>,
    },
    /// Legacy parameter override, rewritten into a param `Pin`
    Defparam {
        path: Symbol,
        name: Symbol,
        rhs: NodeId,
    },
    /// Continuous assignment; targets may create implicit nets
    AssignW { lhs: NodeId, rhs: NodeId },
    Foreach { name: Option<Symbol>, stmts: Vec<NodeId> },
    With { name: Option<Symbol>, stmts: Vec<NodeId> },
    /// Flattened scope produced by the external flattening pass
    Scope {
        name: Symbol,
        module: NodeId,
        stmts: Vec<NodeId>,
    },
    /// Per-scope instance of a variable
    VarScope { var: NodeId },
    /// Inlining-produced var equivalence, recorded then followed when
    /// binding cross-references
    AssignAlias { lhs: NodeId, rhs: NodeId },
    /// Inlining-produced scope equivalence for interface connections
    AssignVarScope { lhs: NodeId, rhs: NodeId },
    PackageImport {
        pkg_name: Symbol,
        /// `None` imports the wildcard `pkg::*`
        name: Option<Symbol>,
    },
    PackageExport {
        pkg_name: Symbol,
        name: Option<Symbol>,
    },
    /// `export *::*`
    PackageExportStarStar,
    Disable {
        expr: NodeId,
        target: Option<NodeId>,
    },

    // --- types ---
    /// Unresolved type reference by name
    RefDType {
        name: Symbol,
        typedef: Option<NodeId>,
        class_or_pkg: Option<NodeId>,
        params: Vec<NodeId>,
    },
    IfaceRefDType {
        iface_name: Symbol,
        modport_name: Option<Symbol>,
        iface: Option<NodeId>,
        /// Interface instance this reference resolves through
        cell: Option<NodeId>,
        modport: Option<NodeId>,
    },
    ClassRefDType { class: NodeId, params: Vec<NodeId> },
    /// Array wrapper; interface refs are found through it
    ArrayDType { elem: NodeId },
    LogicDType { width: u32 },
    ParamTypeDType { name: Symbol, is_gparam: bool },

    // --- expressions ---
    Const { value: ConstKind },
    /// Unresolved identifier; the resolver's main input
    ParseRef { name: Symbol },
    /// One dot of a chain; `colon` marks a `::` separator
    Dot {
        lhs: NodeId,
        rhs: NodeId,
        colon: bool,
    },
    VarRef {
        name: Symbol,
        var: Option<NodeId>,
        class_or_pkg: Option<NodeId>,
        /// Modport the reference degraded from, when it came through one.
        /// Carried for visibility only; nothing downstream consumes it.
        modport: Option<NodeId>,
    },
    /// Cross-scope variable reference found via dotted-path resolution
    VarXRef {
        name: Symbol,
        dotted: String,
        var: Option<NodeId>,
        /// Modport the reference degraded from, when it came through one.
        /// Carried for visibility only; nothing downstream consumes it.
        modport: Option<NodeId>,
        contains_gen_block: bool,
        inlined_dots: String,
    },
    MemberSel { from: NodeId, name: Symbol },
    MethodCall {
        from: NodeId,
        name: Symbol,
        args: Vec<NodeId>,
    },
    FTaskRef {
        name: Symbol,
        args: Vec<NodeId>,
        ftask: Option<NodeId>,
        class_or_pkg: Option<NodeId>,
    },
    New { args: Vec<NodeId>, implicit: bool },
    ClassOrPackageRef {
        name: Symbol,
        target: Option<NodeId>,
        params: Vec<NodeId>,
    },
    EnumItemRef {
        item: NodeId,
        class_or_pkg: Option<NodeId>,
    },
    ConstraintRef { constraint: NodeId },
    SelBit { from: NodeId, index: NodeId },
    /// Instance-array element before array elaboration (`cells[i]`)
    CellArrayRef { name: Symbol, sel: NodeId },
    /// Midpoint of a dot chain through an unresolved cell
    CellRef {
        name: Symbol,
        cell: NodeId,
        rhs: NodeId,
    },
    /// Reference parked until array/parameter elaboration makes the scope
    /// concrete
    UnlinkedRef {
        target: NodeId,
        name: Symbol,
        scope: NodeId,
    },
    Concat { parts: Vec<NodeId> },
    BinOp { lhs: NodeId, rhs: NodeId },
}

impl NodeKind {
    /// Declared name, when the kind has one
    pub fn name(&self) -> Option<Symbol> {
        match self {
            Self::Module { name, .. }
            | Self::Package { name, .. }
            | Self::Iface { name, .. }
            | Self::Class { name, .. }
            | Self::Cell { name, .. }
            | Self::CellInline { name, .. }
            | Self::FTask { name, .. }
            | Self::Constraint { name, .. }
            | Self::Var { name, .. }
            | Self::Typedef { name, .. }
            | Self::TypedefFwd { name }
            | Self::EnumItem { name, .. }
            | Self::ClockingItem { name, .. }
            | Self::Modport { name, .. }
            | Self::ModportVarRef { name, .. }
            | Self::ModportFTaskRef { name, .. }
            | Self::Port { name, .. }
            | Self::Pin { name, .. }
            | Self::ParseRef { name }
            | Self::VarRef { name, .. }
            | Self::VarXRef { name, .. }
            | Self::FTaskRef { name, .. }
            | Self::ClassOrPackageRef { name, .. }
            | Self::CellArrayRef { name, .. }
            | Self::CellRef { name, .. }
            | Self::UnlinkedRef { name, .. }
            | Self::ParamTypeDType { name, .. }
            | Self::RefDType { name, .. } => Some(*name),
            Self::Begin { name, .. }
            | Self::Clocking { name, .. }
            | Self::Foreach { name, .. }
            | Self::With { name, .. } => *name,
            Self::Scope { name, .. } => Some(*name),
            _ => None,
        }
    }

    /// Short user-facing description of what kind of thing this declares,
    /// used in duplicate/unresolved diagnostics
    pub fn text_type(&self) -> &'static str {
        match self {
            Self::Var { is_io: true, .. } => "port",
            Self::Var { is_iface_ref: true, .. } => "port",
            Self::Var { var_type: VarType::GParam, .. } => "parameter",
            Self::Var { var_type: VarType::LParam, .. } => "local parameter",
            Self::Var { .. } => "variable",
            Self::ParamTypeDType { is_gparam: true, .. } => "type parameter",
            Self::ParamTypeDType { .. } => "local type parameter",
            Self::Cell { .. } => "instance",
            Self::Constraint { .. } => "constraint",
            Self::FTask { is_func: false, .. } => "task",
            Self::FTask { .. } => "function",
            Self::Begin { .. } => "block",
            Self::Iface { .. } => "interface",
            Self::Module { .. } => "module",
            Self::Package { .. } => "package",
            Self::Class { .. } => "class",
            Self::Typedef { .. } => "typedef",
            Self::EnumItem { .. } => "enum value",
            Self::Modport { .. } => "modport",
            Self::Clocking { .. } => "clocking block",
            Self::Scope { .. } => "scope",
            Self::Netlist { .. } => "netlist",
            _ => "node",
        }
    }
}

/// The mutable elaboration tree
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Arena<Node>,
    root: Option<NodeId>,
    /// Nodes queued for deletion; swept between passes
    delete_queue: Vec<NodeId>,
    /// Var-to-var aliases recorded by the scope pass
    var_aliases: FxHashMap<NodeId, NodeId>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, kind: NodeKind, span: FileSpan) -> NodeId {
        self.nodes.alloc(Node { kind, span })
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    /// Root netlist node
    ///
    /// # Panics
    /// Panics if no root was set; the linker requires a rooted tree.
    pub fn root(&self) -> NodeId {
        self.root.expect("elaboration tree has no root")
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id].kind
    }

    pub fn span(&self, id: NodeId) -> FileSpan {
        self.nodes[id].span
    }

    /// Replace the node in place, keeping its span; the id stays valid and
    /// every existing reference to it now sees the new kind
    pub fn replace(&mut self, id: NodeId, kind: NodeKind) {
        self.nodes[id].kind = kind;
    }

    /// Queue a node for deletion at the next [`Self::sweep`]
    pub fn defer_delete(&mut self, id: NodeId) {
        self.delete_queue.push(id);
    }

    /// Tombstone every queued node. Must only be called between passes.
    pub fn sweep(&mut self) {
        let queue = std::mem::take(&mut self.delete_queue);
        for id in queue {
            self.nodes[id].kind = NodeKind::Deleted;
        }
    }

    pub fn is_deleted(&self, id: NodeId) -> bool {
        matches!(self.nodes[id].kind, NodeKind::Deleted)
    }

    /// Record a var-to-var alias (scope pass); chains are followed by
    /// [`Self::resolve_var_alias`]
    pub fn add_var_alias(&mut self, from: NodeId, to: NodeId) {
        self.var_aliases.insert(from, to);
    }

    /// Follow alias links to the terminal var
    pub fn resolve_var_alias(&self, mut id: NodeId) -> NodeId {
        let mut hops = 0usize;
        while let Some(&next) = self.var_aliases.get(&id) {
            id = next;
            hops += 1;
            assert!(hops <= self.var_aliases.len(), "var alias cycle");
        }
        id
    }

    /// Child ids of expression/type nodes, for generic descents such as the
    /// implicit-net candidate scan. Declarations are not covered; passes
    /// match those explicitly.
    pub fn expr_children(&self, id: NodeId) -> Vec<NodeId> {
        match self.kind(id) {
            NodeKind::Dot { lhs, rhs, .. } | NodeKind::BinOp { lhs, rhs } => vec![*lhs, *rhs],
            NodeKind::SelBit { from, index } => vec![*from, *index],
            NodeKind::MemberSel { from, .. } => vec![*from],
            NodeKind::MethodCall { from, args, .. } => {
                let mut out = vec![*from];
                out.extend(args.iter().copied());
                out
            }
            NodeKind::Concat { parts } => parts.clone(),
            NodeKind::FTaskRef { args, .. } | NodeKind::New { args, .. } => args.clone(),
            NodeKind::CellArrayRef { sel, .. } => vec![*sel],
            NodeKind::CellRef { rhs, .. } => vec![*rhs],
            _ => Vec::new(),
        }
    }

    /// Innermost interface reference of a possibly array-wrapped type
    pub fn iface_ref_from_dtype(&self, mut dtype: NodeId) -> Option<NodeId> {
        loop {
            match self.kind(dtype) {
                NodeKind::IfaceRefDType { .. } => return Some(dtype),
                NodeKind::ArrayDType { elem } => dtype = *elem,
                _ => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> FileSpan {
        FileSpan::synthesized()
    }

    #[test]
    fn replace_keeps_id_valid() {
        let mut ast = Ast::new();
        let interner = sv_intern::Interner::new();
        let name = interner.intern("x");
        let id = ast.alloc(NodeKind::ParseRef { name }, span());
        ast.replace(
            id,
            NodeKind::VarRef {
                name,
                var: None,
                class_or_pkg: None,
                modport: None,
            },
        );
        assert!(matches!(ast.kind(id), NodeKind::VarRef { .. }));
    }

    #[test]
    fn deferred_delete_tombstones_on_sweep() {
        let mut ast = Ast::new();
        let id = ast.alloc(
            NodeKind::Const {
                value: ConstKind::False,
            },
            span(),
        );
        ast.defer_delete(id);
        assert!(!ast.is_deleted(id));
        ast.sweep();
        assert!(ast.is_deleted(id));
    }

    #[test]
    fn var_alias_chain_resolves_to_terminal() {
        let mut ast = Ast::new();
        let interner = sv_intern::Interner::new();
        let var = |ast: &mut Ast, n: &str| {
            ast.alloc(
                NodeKind::Var {
                    name: interner.intern(n),
                    var_type: VarType::Wire,
                    dtype: None,
                    is_io: false,
                    is_iface_ref: false,
                    is_func_local: false,
                    is_class_member: false,
                    pin_num: 0,
                    port_set: false,
                },
                span(),
            )
        };
        let a = var(&mut ast, "a");
        let b = var(&mut ast, "b");
        let c = var(&mut ast, "c");
        ast.add_var_alias(a, b);
        ast.add_var_alias(b, c);
        assert_eq!(ast.resolve_var_alias(a), c);
        assert_eq!(ast.resolve_var_alias(c), c);
    }

    #[test]
    fn iface_ref_found_through_array() {
        let mut ast = Ast::new();
        let interner = sv_intern::Interner::new();
        let ifref = ast.alloc(
            NodeKind::IfaceRefDType {
                iface_name: interner.intern("bus_if"),
                modport_name: None,
                iface: None,
                cell: None,
                modport: None,
            },
            span(),
        );
        let arr = ast.alloc(NodeKind::ArrayDType { elem: ifref }, span());
        assert_eq!(ast.iface_ref_from_dtype(arr), Some(ifref));
        let plain = ast.alloc(NodeKind::LogicDType { width: 1 }, span());
        assert_eq!(ast.iface_ref_from_dtype(plain), None);
    }
}
