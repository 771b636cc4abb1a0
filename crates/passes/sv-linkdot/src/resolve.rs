//! Dotted-reference resolver
//!
//! Rewrites every placeholder reference into a bound one. Dot chains are
//! threaded left to right through a [`DotState`]: the position tag decides
//! the lookup rule for each segment, and must be set before descending the
//! left operand because later segments' rules depend on what it resolved
//! to. References blocked on not-yet-elaborated parameterized classes are
//! parked per enclosing module and retried in exactly one second round.

use sv_ast::{Ast, ConstKind, NodeId, NodeKind, VarType};
use sv_intern::{Interner, Symbol};
use sv_span::FileSpan;

use crate::LinkOptions;
use crate::error::{DiagKind, Diagnostics, suggestion_text};
use crate::state::LinkState;
use crate::symtab::{SymGraph, SymId};

/// Resolve a dotted path: fallback search for the first segment, flat-only
/// for every later one. On a miss, returns the last good scope and the
/// failing segment.
pub(crate) fn find_dotted(
    graph: &SymGraph,
    interner: &Interner,
    scope: SymId,
    dotname: &str,
) -> Result<SymId, (SymId, String)> {
    let mut cur = scope;
    for (i, seg) in dotname.split('.').enumerate() {
        if seg.is_empty() {
            continue;
        }
        let hit = if i == 0 {
            if seg == "$root" {
                Some(graph.root())
            } else {
                let sym = interner.intern(seg);
                graph.find_prefixed(cur, sym, interner, true)
            }
        } else {
            let sym = interner.intern(seg);
            graph.find_prefixed(cur, sym, interner, false)
        };
        match hit {
            Some(h) => cur = h,
            None => return Err((cur, seg.to_string())),
        }
    }
    Ok(cur)
}

/// Where a segment sits in its chain; decides the lookup rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DotPos {
    /// Bare reference, no dot involved
    None,
    /// Segment right after `pkg::` or `Class::`
    Package,
    /// First segment of a dotted chain
    First,
    /// Interior segment after a resolved scope
    Scope,
    /// Last segment; the target kind picks the replacement node
    Final,
    /// After a variable segment: member select, not scope lookup
    Member,
}

/// Transient context threaded through one dot chain
#[derive(Debug, Clone)]
struct DotState {
    /// Scope the next segment is looked up in
    scope: SymId,
    pos: DotPos,
    /// Accumulated path text, for cross-references and messages
    dotted: String,
    super_ref: bool,
    /// Package or class the chain entered through `::`
    class_or_pkg: Option<NodeId>,
    unresolved_cell: bool,
    unresolved_class: bool,
    /// A generate block was crossed on the way
    gen_blk: bool,
    /// Cell-array select awaiting array elaboration
    unlinked_scope: Option<NodeId>,
    /// One diagnostic per chain; later segments stay quiet
    err: bool,
    /// Chain parked for the retry round; leave its nodes untouched
    deferred: bool,
}

impl DotState {
    fn new(scope: SymId) -> Self {
        Self {
            scope,
            pos: DotPos::None,
            dotted: String::new(),
            super_ref: false,
            class_or_pkg: None,
            unresolved_cell: false,
            unresolved_class: false,
            gen_blk: false,
            unlinked_scope: None,
            err: false,
            deferred: false,
        }
    }

    fn append(&mut self, seg: &str) {
        if !self.dotted.is_empty() {
            self.dotted.push('.');
        }
        self.dotted.push_str(seg);
    }
}

pub(crate) fn run(
    ast: &mut Ast,
    state: &mut LinkState,
    interner: &Interner,
    diags: &mut Diagnostics,
    options: &LinkOptions,
) {
    let root = ast.root();
    let NodeKind::Netlist { modules } = ast.kind(root) else {
        panic!("tree root is not a netlist");
    };
    let modules = modules.clone();
    {
        let mut visitor = ResolveVisitor::new(ast, state, interner, diags, options, false);
        for &module in &modules {
            visitor.resolve_module(module);
        }
    }
    // Exactly one retry round for modules that parked work on
    // parameterization; whatever still fails now errors normally
    let deferred = std::mem::take(&mut state.deferred_modules);
    if !deferred.is_empty() {
        for (_, module) in &deferred {
            state.clear_processed_under(ast, *module);
        }
        let mut visitor = ResolveVisitor::new(ast, state, interner, diags, options, true);
        for (_, module) in &deferred {
            visitor.resolve_module(*module);
        }
    }
    assert!(
        state.deferred_modules.is_empty(),
        "deferral requested during the retry round"
    );
}

struct ResolveVisitor<'a> {
    ast: &'a mut Ast,
    state: &'a mut LinkState,
    interner: &'a Interner,
    diags: &'a mut Diagnostics,
    options: &'a LinkOptions,
    /// Second round: parking is no longer allowed
    retry: bool,
    cur_scope: SymId,
    cur_module: NodeId,
    cur_module_name: Symbol,
    cur_class: Option<NodeId>,
    ds: DotState,
}

impl<'a> ResolveVisitor<'a> {
    fn new(
        ast: &'a mut Ast,
        state: &'a mut LinkState,
        interner: &'a Interner,
        diags: &'a mut Diagnostics,
        options: &'a LinkOptions,
        retry: bool,
    ) -> Self {
        let root_scope = state.graph.root();
        let root_node = ast.root();
        let name = interner.intern("");
        Self {
            ast,
            state,
            interner,
            diags,
            options,
            retry,
            cur_scope: root_scope,
            cur_module: root_node,
            cur_module_name: name,
            cur_class: None,
            ds: DotState::new(root_scope),
        }
    }

    fn resolve_module(&mut self, module: NodeId) {
        if let NodeKind::Module { dead: true, .. } = self.ast.kind(module) {
            return;
        }
        let Some(scope) = self.state.node_sym(module) else {
            return;
        };
        let Some(name) = self.ast.kind(module).name() else {
            return;
        };
        self.cur_scope = scope;
        self.cur_module = module;
        self.cur_module_name = name;
        self.ds = DotState::new(scope);
        for stmt in self.stmts_of(module) {
            self.resolve_stmt(stmt);
        }
    }

    fn stmts_of(&self, node: NodeId) -> Vec<NodeId> {
        match self.ast.kind(node) {
            NodeKind::Module { stmts, .. }
            | NodeKind::Package { stmts, .. }
            | NodeKind::Iface { stmts, .. }
            | NodeKind::Class { stmts, .. }
            | NodeKind::Begin { stmts, .. }
            | NodeKind::FTask { stmts, .. }
            | NodeKind::Constraint { stmts, .. }
            | NodeKind::Foreach { stmts, .. }
            | NodeKind::With { stmts, .. }
            | NodeKind::Scope { stmts, .. } => stmts.clone(),
            _ => Vec::new(),
        }
    }

    fn in_scope(&mut self, scope: SymId, f: impl FnOnce(&mut Self)) {
        let saved = self.cur_scope;
        self.cur_scope = scope;
        f(self);
        self.cur_scope = saved;
    }

    // --- statements ---

    fn resolve_stmt(&mut self, id: NodeId) {
        if self.ast.is_deleted(id) {
            return;
        }
        let span = self.ast.span(id);
        match self.ast.kind(id).clone() {
            NodeKind::Begin { .. }
            | NodeKind::FTask { .. }
            | NodeKind::Constraint { .. }
            | NodeKind::Foreach { .. }
            | NodeKind::With { .. }
            | NodeKind::Scope { .. } => {
                let scope = self.state.node_sym(id).unwrap_or(self.cur_scope);
                let stmts = self.stmts_of(id);
                self.in_scope(scope, |this| {
                    for stmt in stmts {
                        this.resolve_stmt(stmt);
                    }
                });
            }
            NodeKind::Class { extends, .. } => {
                self.resolve_class(id, extends);
            }
            NodeKind::Cell { .. } => {
                self.resolve_cell_pins(id);
            }
            NodeKind::Var { dtype, .. } | NodeKind::Typedef { dtype, .. } => {
                if let Some(dtype) = dtype {
                    self.resolve_dtype(dtype);
                }
            }
            NodeKind::AssignW { lhs, rhs } => {
                self.resolve_expr(lhs);
                self.resolve_expr(rhs);
            }
            NodeKind::Disable { expr, .. } => {
                self.resolve_disable(id, expr, span);
            }
            NodeKind::PackageImport { .. }
            | NodeKind::PackageExport { .. }
            | NodeKind::PackageExportStarStar => {
                // The find pass consumed the import; the node is spent
                if self.state.phase.pre_array() {
                    self.ast.defer_delete(id);
                }
            }
            NodeKind::VarScope { .. }
            | NodeKind::AssignAlias { .. }
            | NodeKind::Port { .. }
            | NodeKind::Defparam { .. } => {}
            _ => self.resolve_expr(id),
        }
    }

    fn resolve_class(&mut self, class: NodeId, extends: Option<NodeId>) {
        let saved_class = self.cur_class;
        self.cur_class = Some(class);
        let scope = self.state.node_sym(class).unwrap_or(self.cur_scope);
        if let Some(ext) = extends {
            self.resolve_extends(class, scope, ext);
        }
        let stmts = self.stmts_of(class);
        self.in_scope(scope, |this| {
            for stmt in stmts {
                this.resolve_stmt(stmt);
            }
        });
        self.cur_class = saved_class;
    }

    /// Bind the base class, pull its visible bindings into the derived
    /// scope, and give the derived constructor its implicit `super.new()`
    fn resolve_extends(&mut self, class: NodeId, class_ent: SymId, ext: NodeId) {
        if self.state.is_processed(ext) {
            return;
        }
        let span = self.ast.span(ext);
        let NodeKind::ClassExtends { class_name, parameterized, base, .. } =
            *self.ast.kind(ext)
        else {
            return;
        };
        if base.is_some() {
            self.state.mark_processed(ext);
            return;
        }
        if parameterized && !self.retry {
            self.state
                .defer_module(self.cur_module_name, self.cur_module);
            return;
        }
        self.state.mark_processed(ext);
        let found = self.state.graph.find_fallback(self.cur_scope, class_name);
        let base_node = found.map(|f| self.state.graph.node(f));
        match (found, base_node) {
            (Some(found), Some(base_node))
                if matches!(self.ast.kind(base_node), NodeKind::Class { .. }) =>
            {
                if let NodeKind::ClassExtends { base, .. } = self.ast.kind_mut(ext) {
                    *base = Some(base_node);
                }
                self.state.graph.import_from(class_ent, found, None, false);
                self.insert_implicit_super_new(class, base_node);
            }
            _ => {
                let cands = self
                    .state
                    .graph
                    .candidates(self.cur_scope, self.ast, |k| {
                        matches!(k, NodeKind::Class { .. })
                    });
                let text = self.interner.resolve(&class_name);
                self.diags.error(
                    DiagKind::UnresolvedType {
                        suggestion: suggestion_text(&text, &cands, self.interner),
                        path: text,
                    },
                    span,
                );
            }
        }
    }

    /// A derived constructor that never calls `super.new` gets the call
    /// inserted at its head
    fn insert_implicit_super_new(&mut self, class: NodeId, base: NodeId) {
        let new_name = self.interner.intern("new");
        let Some(ctor) = self.stmts_of(class).into_iter().find(|&s| {
            matches!(self.ast.kind(s), NodeKind::FTask { is_constructor: true, .. })
        }) else {
            return;
        };
        let has_call = self.stmts_of(ctor).iter().any(|&s| {
            matches!(self.ast.kind(s), NodeKind::FTaskRef { name, .. } if *name == new_name)
                || matches!(self.ast.kind(s),
                    NodeKind::Dot { lhs, .. }
                        if matches!(self.ast.kind(*lhs),
                            NodeKind::ParseRef { name } if self.interner.is(name, "super")))
        });
        if has_call {
            return;
        }
        let base_ctor = self.stmts_of(base).into_iter().find(|&s| {
            matches!(self.ast.kind(s), NodeKind::FTask { is_constructor: true, .. })
        });
        let span = self.ast.span(ctor);
        let call = self.ast.alloc(
            NodeKind::FTaskRef {
                name: new_name,
                args: vec![],
                ftask: base_ctor,
                class_or_pkg: Some(base),
            },
            span,
        );
        self.state.mark_processed(call);
        if let NodeKind::FTask { stmts, .. } = self.ast.kind_mut(ctor) {
            stmts.insert(0, call);
        }
    }

    /// Pins resolve against the instantiated module's scope, which is the
    /// cell's own entry
    fn resolve_cell_pins(&mut self, cell: NodeId) {
        let NodeKind::Cell { pins, params, .. } = self.ast.kind(cell).clone() else {
            return;
        };
        let Some(cell_ent) = self.state.node_sym(cell) else {
            return;
        };
        let mut seen = rustc_hash::FxHashSet::default();
        for pin in pins.iter().chain(params.iter()).copied() {
            let span = self.ast.span(pin);
            let NodeKind::Pin { name, expr, param, mod_var, .. } = *self.ast.kind(pin) else {
                continue;
            };
            if let Some(expr) = expr {
                self.resolve_expr(expr);
            }
            if !seen.insert((name, param)) {
                self.diags.error(
                    DiagKind::DuplicatePin {
                        name: self.interner.resolve(&name),
                    },
                    span,
                );
                continue;
            }
            if mod_var.is_some() {
                continue;
            }
            let found = self.state.graph.find_flat(cell_ent, name);
            let target = found.map(|f| self.state.graph.node(f)).filter(|&n| {
                match self.ast.kind(n) {
                    NodeKind::Var { var_type, is_io, is_iface_ref, .. } => {
                        if param {
                            var_type.is_param()
                        } else {
                            *is_io || *is_iface_ref
                        }
                    }
                    NodeKind::ParamTypeDType { .. } => param,
                    _ => false,
                }
            });
            match target {
                Some(n) => {
                    if let NodeKind::Pin { mod_var, .. } = self.ast.kind_mut(pin) {
                        *mod_var = Some(n);
                    }
                }
                None => {
                    let cands = self.state.graph.candidates(cell_ent, self.ast, |k| match k {
                        NodeKind::Var { var_type, is_io, is_iface_ref, .. } => {
                            if param {
                                var_type.is_param()
                            } else {
                                *is_io || *is_iface_ref
                            }
                        }
                        NodeKind::ParamTypeDType { .. } => param,
                        _ => false,
                    });
                    let module_name = self
                        .ast
                        .kind(self.state.graph.node(cell_ent))
                        .name()
                        .map_or_else(String::new, |s| self.interner.resolve(&s));
                    let text = self.interner.resolve(&name);
                    self.diags.error(
                        DiagKind::PinNotFound {
                            suggestion: suggestion_text(&text, &cands, self.interner),
                            name: text,
                            module: module_name,
                        },
                        span,
                    );
                }
            }
        }
    }

    /// Named type references in declarations
    fn resolve_dtype(&mut self, dtype: NodeId) {
        let span = self.ast.span(dtype);
        match self.ast.kind(dtype).clone() {
            NodeKind::ArrayDType { elem } => self.resolve_dtype(elem),
            NodeKind::RefDType { name, typedef: None, class_or_pkg, params } => {
                if self.state.is_processed(dtype) {
                    return;
                }
                let scope = match class_or_pkg.and_then(|n| self.state.node_sym(n)) {
                    Some(pkg_scope) => pkg_scope,
                    None => self.cur_scope,
                };
                let found = if class_or_pkg.is_some() {
                    self.state.graph.find_flat(scope, name)
                } else {
                    self.state.graph.find_fallback(scope, name)
                };
                let target = found.map(|f| self.state.graph.node(f));
                match target {
                    Some(n)
                        if matches!(
                            self.ast.kind(n),
                            NodeKind::Typedef { .. }
                                | NodeKind::Class { .. }
                                | NodeKind::ParamTypeDType { .. }
                        ) =>
                    {
                        if !params.is_empty() && !self.retry {
                            // Parameterized type; shape not concrete yet.
                            // Not marked processed, so the retry sees it.
                            self.state
                                .defer_module(self.cur_module_name, self.cur_module);
                            return;
                        }
                        self.state.mark_processed(dtype);
                        self.check_use_before_decl(n, span, name);
                        if let NodeKind::RefDType { typedef, .. } = self.ast.kind_mut(dtype) {
                            *typedef = Some(n);
                        }
                    }
                    _ => {
                        let cands = self.state.graph.candidates(self.cur_scope, self.ast, |k| {
                            matches!(
                                k,
                                NodeKind::Typedef { .. }
                                    | NodeKind::Class { .. }
                                    | NodeKind::ParamTypeDType { .. }
                            )
                        });
                        let text = self.interner.resolve(&name);
                        self.diags.error(
                            DiagKind::UnresolvedType {
                                suggestion: suggestion_text(&text, &cands, self.interner),
                                path: text,
                            },
                            span,
                        );
                    }
                }
            }
            NodeKind::EnumDType { items } => {
                for item in items {
                    if let NodeKind::EnumItem { value: Some(value), .. } = *self.ast.kind(item) {
                        self.resolve_expr(value);
                    }
                }
            }
            _ => {}
        }
    }

    /// Forward-typedef-sensitive constructs carry a source-order token;
    /// a use at an earlier token is an error unless the token was cleared
    fn check_use_before_decl(&mut self, decl: NodeId, use_span: FileSpan, name: Symbol) {
        if let NodeKind::Typedef { decl_token, .. } = *self.ast.kind(decl) {
            if decl_token != 0 {
                let decl_span = self.ast.span(decl);
                if use_span.file == decl_span.file && use_span.span.start < decl_span.span.start {
                    self.diags.error(
                        DiagKind::UseBeforeDeclaration {
                            name: self.interner.resolve(&name),
                        },
                        use_span,
                    );
                }
            }
        }
    }

    fn resolve_disable(&mut self, disable: NodeId, expr: NodeId, span: FileSpan) {
        if self.state.is_processed(expr) {
            return;
        }
        self.state.mark_processed(expr);
        let text = self.dotted_text(expr);
        let found = find_dotted(&self.state.graph, self.interner, self.cur_scope, &text);
        match found {
            Ok(ent)
                if matches!(
                    self.ast.kind(self.state.graph.node(ent)),
                    NodeKind::Begin { .. } | NodeKind::FTask { .. }
                ) =>
            {
                let target = self.state.graph.node(ent);
                if let NodeKind::Disable { target: slot, .. } = self.ast.kind_mut(disable) {
                    *slot = Some(target);
                }
            }
            _ => {
                self.diags.error(
                    DiagKind::BadDisableTarget { name: text },
                    span,
                );
            }
        }
    }

    fn dotted_text(&self, mut id: NodeId) -> String {
        let mut segs = Vec::new();
        loop {
            match self.ast.kind(id) {
                NodeKind::Dot { lhs, rhs, .. } => {
                    if let Some(name) = self.ast.kind(*rhs).name() {
                        segs.push(self.interner.resolve(&name));
                    }
                    id = *lhs;
                }
                NodeKind::ParseRef { name } | NodeKind::VarRef { name, .. } => {
                    segs.push(self.interner.resolve(name));
                    break;
                }
                _ => break,
            }
        }
        segs.reverse();
        segs.join(".")
    }

    // --- expressions ---

    fn resolve_expr(&mut self, id: NodeId) {
        if self.ast.is_deleted(id) || self.state.is_processed(id) {
            return;
        }
        match self.ast.kind(id).clone() {
            NodeKind::Dot { .. } => self.resolve_dot(id),
            NodeKind::ParseRef { name } => {
                self.state.mark_processed(id);
                let mut ds = DotState::new(self.cur_scope);
                std::mem::swap(&mut self.ds, &mut ds);
                self.resolve_segment(id, name);
                self.ds = ds;
            }
            NodeKind::VarRef { .. } => self.rebind_var_ref(id),
            NodeKind::VarXRef { .. } => self.rebind_var_xref(id),
            NodeKind::FTaskRef { name, args, ftask, .. } => {
                self.state.mark_processed(id);
                for arg in args {
                    self.resolve_expr(arg);
                }
                if ftask.is_none() {
                    self.bind_ftask_ref(id, name, self.cur_scope, true);
                }
            }
            NodeKind::ClassOrPackageRef { name, target, params } => {
                self.state.mark_processed(id);
                for p in params {
                    self.resolve_expr(p);
                }
                if target.is_none() {
                    self.bind_class_or_pkg(id, name);
                }
            }
            NodeKind::New { args, .. } => {
                self.state.mark_processed(id);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            NodeKind::MemberSel { from, .. } => self.resolve_expr(from),
            NodeKind::MethodCall { from, args, .. } => {
                self.resolve_expr(from);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            NodeKind::CellArrayRef { sel, .. } => self.resolve_expr(sel),
            _ => {
                for child in self.ast.expr_children(id) {
                    self.resolve_expr(child);
                }
            }
        }
    }

    fn resolve_dot(&mut self, dot: NodeId) {
        if self.state.is_processed(dot) {
            return;
        }
        self.state.mark_processed(dot);
        let NodeKind::Dot { lhs, rhs, colon } = *self.ast.kind(dot) else {
            return;
        };
        let start = self.ds.pos == DotPos::None;
        let saved = if start {
            let saved = self.ds.clone();
            self.ds = DotState::new(self.cur_scope);
            self.ds.pos = DotPos::First;
            Some(saved)
        } else {
            None
        };

        if colon {
            self.resolve_colon_lhs(lhs);
        } else {
            self.resolve_dot_operand(lhs);
        }

        if self.ds.err {
            if start {
                // A parked chain stays intact for the retry round; only a
                // reported failure collapses to the placeholder
                if !self.ds.deferred {
                    self.ast.replace(dot, NodeKind::Const { value: ConstKind::False });
                }
                self.ds = saved.unwrap_or_else(|| DotState::new(self.cur_scope));
            }
            return;
        }

        if self.ds.pos == DotPos::Member {
            self.resolve_member_rhs(dot, lhs, rhs);
            if let Some(saved) = saved {
                self.ds = saved;
            }
            return;
        }

        if start {
            self.ds.pos = DotPos::Final;
        }
        self.resolve_dot_operand(rhs);

        if start && self.ds.unresolved_cell {
            if let Some(scope_node) = self.ds.unlinked_scope {
                self.wrap_unlinked(dot, rhs, scope_node);
            }
        } else if !self.ds.err && (start || self.ds.pos == DotPos::Member) {
            // The chain (or the scope part of it, once a var segment makes
            // the rest member access) collapses to its rewritten segment
            let kind = self.ast.kind(rhs).clone();
            self.ast.replace(dot, kind);
            self.ast.defer_delete(rhs);
            self.delete_scaffold(lhs);
        } else if start && !self.ds.deferred {
            self.ast.replace(dot, NodeKind::Const { value: ConstKind::False });
        }
        if start {
            self.ds = saved.unwrap_or_else(|| DotState::new(self.cur_scope));
        }
    }

    /// `Pkg::` or `Class::` left operand: flat lookups only from here on
    fn resolve_colon_lhs(&mut self, lhs: NodeId) {
        self.state.mark_processed(lhs);
        let span = self.ast.span(lhs);
        let name = match self.ast.kind(lhs) {
            NodeKind::ParseRef { name } => *name,
            NodeKind::ClassOrPackageRef { name, target, params } => {
                if !params.is_empty() && target.is_none() && !self.retry {
                    self.state
                        .defer_module(self.cur_module_name, self.cur_module);
                    self.ds.unresolved_class = true;
                    self.ds.err = true;
                    self.ds.deferred = true;
                    return;
                }
                *name
            }
            _ => {
                self.ds.err = true;
                return;
            }
        };
        let found = self
            .state
            .graph
            .find_fallback(self.ds.scope, name)
            .or_else(|| {
                self.state
                    .find_module_name(name)
                    .and_then(|n| self.state.node_sym(n))
            });
        match found {
            Some(ent)
                if matches!(
                    self.ast.kind(self.state.graph.node(ent)),
                    NodeKind::Package { .. } | NodeKind::Class { .. }
                ) =>
            {
                let target = self.state.graph.node(ent);
                if let NodeKind::ClassOrPackageRef { target: slot, .. } = self.ast.kind_mut(lhs)
                {
                    *slot = Some(target);
                }
                self.ds.scope = ent;
                self.ds.pos = DotPos::Package;
                self.ds.class_or_pkg = Some(target);
            }
            _ => {
                let text = self.interner.resolve(&name);
                let cands = self.state.graph.candidates(self.cur_scope, self.ast, |k| {
                    matches!(k, NodeKind::Package { .. } | NodeKind::Class { .. })
                });
                self.diags.error(
                    DiagKind::UnresolvedScope {
                        suggestion: suggestion_text(&text, &cands, self.interner),
                        path: text,
                    },
                    span,
                );
                self.ds.err = true;
            }
        }
    }

    fn resolve_dot_operand(&mut self, id: NodeId) {
        match self.ast.kind(id).clone() {
            NodeKind::Dot { .. } => self.resolve_dot(id),
            NodeKind::ParseRef { name } => {
                self.state.mark_processed(id);
                if self.interner.is(&name, "this") {
                    self.resolve_this(id);
                } else if self.interner.is(&name, "super") {
                    self.resolve_super(id);
                } else {
                    self.resolve_segment(id, name);
                }
            }
            NodeKind::CellArrayRef { name, sel } => {
                self.state.mark_processed(id);
                self.resolve_expr(sel);
                self.resolve_cell_array(id, name);
            }
            NodeKind::FTaskRef { name, args, ftask, .. } => {
                self.state.mark_processed(id);
                for arg in args {
                    self.resolve_expr(arg);
                }
                if ftask.is_none() {
                    let flat = self.ds.pos != DotPos::None && self.ds.pos != DotPos::First;
                    let scope = self.ds.scope;
                    self.bind_ftask_ref(id, name, scope, !flat);
                }
            }
            NodeKind::New { args, .. } => {
                self.state.mark_processed(id);
                for arg in args {
                    self.resolve_expr(arg);
                }
            }
            NodeKind::VarRef { .. } | NodeKind::VarXRef { .. } => {
                // Already bound in an earlier phase; scope steps reuse it
                self.state.mark_processed(id);
            }
            _ => {
                self.diags.error(
                    DiagKind::NotExpectingDot {
                        name: String::new(),
                        kind: self.ast.kind(id).text_type().to_string(),
                    },
                    self.ast.span(id),
                );
                self.ds.err = true;
            }
        }
    }

    fn resolve_this(&mut self, id: NodeId) {
        let span = self.ast.span(id);
        match self.cur_class.and_then(|c| self.state.node_sym(c)) {
            Some(class_ent) => {
                self.ds.scope = class_ent;
                self.ds.pos = DotPos::Scope;
            }
            None => {
                self.diags.error(
                    DiagKind::Unsupported {
                        what: "'this' outside a class".to_string(),
                    },
                    span,
                );
                self.ds.err = true;
            }
        }
    }

    fn resolve_super(&mut self, id: NodeId) {
        let span = self.ast.span(id);
        let base = self.cur_class.and_then(|c| match self.ast.kind(c) {
            NodeKind::Class { extends: Some(ext), .. } => match self.ast.kind(*ext) {
                NodeKind::ClassExtends { base, parameterized, .. } => Some((*base, *parameterized)),
                _ => None,
            },
            _ => None,
        });
        match base {
            Some((Some(base), _)) => match self.state.node_sym(base) {
                Some(base_ent) => {
                    self.ds.scope = base_ent;
                    self.ds.pos = DotPos::Scope;
                    self.ds.super_ref = true;
                }
                None => {
                    self.ds.unresolved_class = true;
                    self.ds.err = true;
                }
            },
            Some((None, true)) if !self.retry => {
                // Base awaits parameterization; park the whole reference
                self.state
                    .defer_module(self.cur_module_name, self.cur_module);
                self.ds.unresolved_class = true;
                self.ds.err = true;
                self.ds.deferred = true;
            }
            _ => {
                self.diags.error(
                    DiagKind::Unsupported {
                        what: "'super' outside a derived class".to_string(),
                    },
                    span,
                );
                self.ds.err = true;
            }
        }
    }

    /// `cells[i].sig`: the element is not a concrete scope until arrays
    /// are elaborated; park the select for a later re-attempt
    fn resolve_cell_array(&mut self, id: NodeId, name: Symbol) {
        match self.state.graph.find_fallback(self.ds.scope, name) {
            Some(found)
                if matches!(
                    self.ast.kind(self.state.graph.node(found)),
                    NodeKind::Cell { .. }
                ) =>
            {
                self.ds.unresolved_cell = true;
                self.ds.unlinked_scope = Some(id);
                self.ds.scope = found;
                self.ds.pos = DotPos::Scope;
                self.ds.append(&self.interner.resolve(&name));
            }
            _ => {
                let text = self.interner.resolve(&name);
                self.diags.error(
                    DiagKind::UnresolvedScope {
                        suggestion: String::new(),
                        path: text,
                    },
                    self.ast.span(id),
                );
                self.ds.err = true;
            }
        }
    }

    /// One plain segment: look up per position, rewrite per target kind
    fn resolve_segment(&mut self, id: NodeId, name: Symbol) {
        let span = self.ast.span(id);
        let text = self.interner.resolve(&name);
        let mut crossed_cell = false;
        let found = match self.ds.pos {
            DotPos::None => self.find_first(name, &mut crossed_cell),
            DotPos::First => {
                let hit = self.find_first(name, &mut crossed_cell);
                self.ds.pos = DotPos::Scope;
                hit
            }
            DotPos::Package => {
                self.ds.pos = DotPos::Scope;
                self.state.graph.find_flat(self.ds.scope, name)
            }
            DotPos::Scope | DotPos::Final => {
                self.state
                    .graph
                    .find_prefixed(self.ds.scope, name, self.interner, false)
            }
            DotPos::Member => unreachable!("member segments are built structurally"),
        };
        let final_pos = matches!(self.ds.pos, DotPos::Final | DotPos::None);
        let Some(found) = found else {
            self.segment_not_found(id, name, text, final_pos, span);
            return;
        };
        let target = self.state.graph.node(found);
        match self.ast.kind(target).clone() {
            NodeKind::Var { .. } | NodeKind::VarScope { .. } => {
                if crossed_cell && self.ds.dotted.is_empty() && self.ds.pos != DotPos::None {
                    // A var found only past a cell boundary is not a valid
                    // hierarchical head
                    self.segment_not_found(id, name, text, final_pos, span);
                    return;
                }
                self.bind_var(id, name, found);
            }
            NodeKind::Cell { module, .. } => {
                if final_pos {
                    self.degrade_cell_to_var(id, name, found, module, span);
                } else {
                    self.scope_step(found, &text);
                }
            }
            NodeKind::Modport { .. } => {
                if final_pos {
                    let modport = target;
                    self.degrade_modport_to_var(id, found, Some(modport), span);
                } else {
                    self.scope_step(found, &text);
                }
            }
            NodeKind::Begin { generate, .. } => {
                self.ds.gen_blk |= generate;
                if final_pos {
                    // A block name alone is not a value; `disable` targets
                    // take the dotted-path route instead
                    self.segment_not_found(id, name, text, true, span);
                } else {
                    self.scope_step(found, &text);
                }
            }
            NodeKind::Module { .. }
            | NodeKind::Iface { .. }
            | NodeKind::Package { .. }
            | NodeKind::Scope { .. }
            | NodeKind::CellInline { .. }
            | NodeKind::Clocking { .. } => {
                self.scope_step(found, &text);
            }
            NodeKind::FTask { is_func, class_method, .. } => {
                if final_pos && (!is_func || class_method) {
                    // Tasks and class methods may be called without parens
                    self.ast.replace(
                        id,
                        NodeKind::FTaskRef {
                            name,
                            args: vec![],
                            ftask: Some(target),
                            class_or_pkg: self
                                .state
                                .graph
                                .ent(found)
                                .class_or_pkg
                                .or(self.ds.class_or_pkg),
                        },
                    );
                } else if final_pos {
                    self.segment_not_found(id, name, text, true, span);
                } else {
                    self.scope_step(found, &text);
                }
            }
            NodeKind::EnumItem { .. } => {
                self.ast.replace(
                    id,
                    NodeKind::EnumItemRef {
                        item: target,
                        class_or_pkg: self
                            .state
                            .graph
                            .ent(found)
                            .class_or_pkg
                            .or(self.ds.class_or_pkg),
                    },
                );
            }
            NodeKind::Constraint { .. } => {
                self.ast
                    .replace(id, NodeKind::ConstraintRef { constraint: target });
            }
            NodeKind::Class { .. } => {
                self.ast.replace(
                    id,
                    NodeKind::ClassOrPackageRef {
                        name,
                        target: Some(target),
                        params: vec![],
                    },
                );
                self.ds.scope = found;
            }
            NodeKind::Typedef { .. } | NodeKind::ParamTypeDType { .. } => {
                self.check_use_before_decl(target, span, name);
                self.ast.replace(
                    id,
                    NodeKind::RefDType {
                        name,
                        typedef: Some(target),
                        class_or_pkg: self.state.graph.ent(found).class_or_pkg,
                        params: vec![],
                    },
                );
            }
            _ => {
                self.diags.error(
                    DiagKind::NotExpectingDot {
                        name: text,
                        kind: self.ast.kind(target).text_type().to_string(),
                    },
                    span,
                );
                self.ds.err = true;
            }
        }
    }

    fn scope_step(&mut self, found: SymId, text: &str) {
        self.ds.scope = found;
        self.ds.append(text);
        if self.ds.pos == DotPos::None {
            self.ds.pos = DotPos::Scope;
        }
    }

    /// First-segment search: current scope with fallback, the enclosing
    /// cell or module's own name, `$root`, then an upward walk that tracks
    /// cell-boundary crossings
    fn find_first(&mut self, name: Symbol, crossed_cell: &mut bool) -> Option<SymId> {
        if let Some(hit) = self
            .state
            .graph
            .find_prefixed(self.ds.scope, name, self.interner, true)
        {
            return Some(hit);
        }
        if self.interner.is(&name, "$root") {
            return Some(self.state.graph.root());
        }
        let mut cur = Some(self.ds.scope);
        let mut hops = 0usize;
        while let Some(ent) = cur {
            let node = self.state.graph.node(ent);
            if self.ast.kind(node).name() == Some(name)
                && matches!(
                    self.ast.kind(node),
                    NodeKind::Cell { .. }
                        | NodeKind::Module { .. }
                        | NodeKind::Iface { .. }
                        | NodeKind::Scope { .. }
                )
            {
                return Some(ent);
            }
            if let Some(hit) = self.state.graph.find_flat(ent, name) {
                let hit_node = self.state.graph.node(hit);
                if *crossed_cell && matches!(self.ast.kind(hit_node), NodeKind::Var { .. }) {
                    // Vars do not leak across instance boundaries
                    return None;
                }
                return Some(hit);
            }
            if matches!(self.ast.kind(node), NodeKind::Cell { .. }) {
                *crossed_cell = true;
            }
            cur = self.state.graph.ent(ent).parent;
            hops += 1;
            if hops > 4096 {
                panic!("parent cycle in symbol graph");
            }
        }
        None
    }

    fn bind_var(&mut self, id: NodeId, name: Symbol, found: SymId) {
        let target = self.state.graph.node(found);
        let var = match self.ast.kind(target) {
            NodeKind::VarScope { var } => {
                let aliased = self.ast.resolve_var_alias(target);
                match self.ast.kind(aliased) {
                    NodeKind::VarScope { var } => *var,
                    _ => *var,
                }
            }
            _ => target,
        };
        if self.ds.dotted.is_empty() {
            self.ast.replace(
                id,
                NodeKind::VarRef {
                    name,
                    var: Some(var),
                    class_or_pkg: self
                        .state
                        .graph
                        .ent(found)
                        .class_or_pkg
                        .or(self.ds.class_or_pkg),
                    modport: None,
                },
            );
        } else {
            self.ast.replace(
                id,
                NodeKind::VarXRef {
                    name,
                    dotted: self.ds.dotted.clone(),
                    var: Some(var),
                    modport: None,
                    contains_gen_block: self.ds.gen_blk,
                    inlined_dots: String::new(),
                },
            );
        }
        self.ds.pos = DotPos::Member;
    }

    /// An interface cell named in variable position stands for the whole
    /// interface: the synthesized `{name}__Viftop` variable
    fn degrade_cell_to_var(
        &mut self,
        id: NodeId,
        name: Symbol,
        cell_ent: SymId,
        module: Option<NodeId>,
        span: FileSpan,
    ) {
        let is_iface = module
            .map(|m| matches!(self.ast.kind(m), NodeKind::Iface { .. }))
            .unwrap_or(false);
        if !is_iface {
            self.segment_not_found(id, name, self.interner.resolve(&name), true, span);
            return;
        }
        self.degrade_modport_to_var(id, cell_ent, None, span);
    }

    /// Modports lose their identity here: the bound reference goes through
    /// the whole-interface variable, with the modport carried as a tag only
    fn degrade_modport_to_var(
        &mut self,
        id: NodeId,
        scope_ent: SymId,
        modport: Option<NodeId>,
        span: FileSpan,
    ) {
        let cell_ent = match modport {
            // The modport was found under the cell scope
            Some(_) => self.ds.scope,
            None => scope_ent,
        };
        let cell_node = self.state.graph.node(cell_ent);
        let Some(cell_name) = self.ast.kind(cell_node).name() else {
            self.ds.err = true;
            return;
        };
        let viftop_name = self
            .interner
            .intern(&format!("{}__Viftop", self.interner.resolve(&cell_name)));
        let parent = self
            .state
            .graph
            .ent(cell_ent)
            .parent
            .unwrap_or_else(|| self.state.graph.root());
        let viftop_ent = match self.state.graph.find_flat(parent, viftop_name) {
            Some(ent) => ent,
            None => {
                let dtype = self.ast.alloc(
                    NodeKind::IfaceRefDType {
                        iface_name: cell_name,
                        modport_name: None,
                        iface: None,
                        cell: Some(cell_node),
                        modport: None,
                    },
                    span,
                );
                let var = self.ast.alloc(
                    NodeKind::Var {
                        name: viftop_name,
                        var_type: VarType::Wire,
                        dtype: Some(dtype),
                        is_io: false,
                        is_iface_ref: true,
                        is_func_local: false,
                        is_class_member: false,
                        pin_num: 0,
                        port_set: false,
                    },
                    span,
                );
                self.push_module_stmt(var);
                let ent = self.state.graph.new_ent(var, parent, Some(parent));
                self.state.graph.reinsert(parent, viftop_name, ent);
                self.state.set_node_sym(var, ent);
                ent
            }
        };
        let var = self.state.graph.node(viftop_ent);
        if self.ds.dotted.is_empty() {
            self.ast.replace(
                id,
                NodeKind::VarRef {
                    name: viftop_name,
                    var: Some(var),
                    class_or_pkg: None,
                    modport,
                },
            );
        } else {
            self.ast.replace(
                id,
                NodeKind::VarXRef {
                    name: viftop_name,
                    dotted: self.ds.dotted.clone(),
                    var: Some(var),
                    modport,
                    contains_gen_block: self.ds.gen_blk,
                    inlined_dots: String::new(),
                },
            );
        }
        self.ds.pos = DotPos::Member;
    }

    fn segment_not_found(
        &mut self,
        id: NodeId,
        name: Symbol,
        text: String,
        final_pos: bool,
        span: FileSpan,
    ) {
        if self.ds.err {
            return;
        }
        if self.ds.unresolved_cell {
            // Lookup went through an unelaborated cell array; the wrapped
            // reference is re-attempted later, so stay quiet
            self.ast.replace(
                id,
                NodeKind::VarXRef {
                    name,
                    dotted: self.ds.dotted.clone(),
                    var: None,
                    modport: None,
                    contains_gen_block: self.ds.gen_blk,
                    inlined_dots: String::new(),
                },
            );
            return;
        }
        // Implicit net: single unqualified identifier, permitted by a pin
        // or assign target in this module
        if final_pos
            && self.ds.dotted.is_empty()
            && self.state.implicit_allowed(self.cur_module, name)
        {
            self.create_implicit_net(id, name, span);
            return;
        }
        let full_path = if self.ds.dotted.is_empty() {
            text.clone()
        } else {
            format!("{}.{}", self.ds.dotted, text)
        };
        if final_pos {
            let cands = self.state.graph.candidates(self.ds.scope, self.ast, |k| {
                matches!(k, NodeKind::Var { .. } | NodeKind::VarScope { .. })
            });
            self.diags.error(
                DiagKind::UnresolvedVariable {
                    suggestion: suggestion_text(&text, &cands, self.interner),
                    path: full_path,
                },
                span,
            );
        } else {
            let cands = self.state.graph.candidates(self.ds.scope, self.ast, |k| {
                matches!(
                    k,
                    NodeKind::Cell { .. }
                        | NodeKind::Begin { .. }
                        | NodeKind::Module { .. }
                        | NodeKind::Iface { .. }
                        | NodeKind::Scope { .. }
                )
            });
            self.diags.error(
                DiagKind::UnresolvedScope {
                    suggestion: suggestion_text(&text, &cands, self.interner),
                    path: full_path,
                },
                span,
            );
        }
        self.ds.err = true;
        let state = &*self.state;
        let ast = &*self.ast;
        let interner = self.interner;
        self.diags
            .dump_on_first_error(|| state.dump(ast, interner));
        self.ast
            .replace(id, NodeKind::Const { value: ConstKind::False });
    }

    /// Synthesize the one-bit net and its entry so every later use of the
    /// name binds to the same declaration
    fn create_implicit_net(&mut self, id: NodeId, name: Symbol, span: FileSpan) {
        if self.options.default_nettype_none {
            self.diags.error(
                DiagKind::ImplicitDisabled {
                    name: self.interner.resolve(&name),
                },
                span,
            );
        } else {
            self.diags.warning(
                DiagKind::ImplicitCreated {
                    name: self.interner.resolve(&name),
                },
                span,
            );
        }
        // Declared even when disabled, so one mistake errors once
        let dtype = self.ast.alloc(NodeKind::LogicDType { width: 1 }, span);
        let var = self.ast.alloc(
            NodeKind::Var {
                name,
                var_type: VarType::Wire,
                dtype: Some(dtype),
                is_io: false,
                is_iface_ref: false,
                is_func_local: false,
                is_class_member: false,
                pin_num: 0,
                port_set: false,
            },
            span,
        );
        self.push_module_stmt(var);
        let Some(module_scope) = self.state.node_sym(self.cur_module) else {
            panic!("enclosing module has no symbol entry");
        };
        let ent = self
            .state
            .graph
            .new_ent(var, module_scope, Some(module_scope));
        self.state.graph.reinsert(module_scope, name, ent);
        self.state.set_node_sym(var, ent);
        self.ast.replace(
            id,
            NodeKind::VarRef {
                name,
                var: Some(var),
                class_or_pkg: None,
                modport: None,
            },
        );
    }

    fn push_module_stmt(&mut self, stmt: NodeId) {
        let module = self.cur_module;
        match self.ast.kind_mut(module) {
            NodeKind::Module { stmts, .. }
            | NodeKind::Package { stmts, .. }
            | NodeKind::Iface { stmts, .. } => stmts.push(stmt),
            _ => {}
        }
    }

    /// `a.b` after `a` resolved to a variable: structural member access,
    /// bound by later type-aware stages
    fn resolve_member_rhs(&mut self, dot: NodeId, lhs: NodeId, rhs: NodeId) {
        self.state.mark_processed(rhs);
        match self.ast.kind(rhs).clone() {
            NodeKind::ParseRef { name } => {
                self.ast.replace(dot, NodeKind::MemberSel { from: lhs, name });
            }
            NodeKind::FTaskRef { name, args, .. } => {
                for arg in &args {
                    self.resolve_expr(*arg);
                }
                self.ast
                    .replace(dot, NodeKind::MethodCall { from: lhs, name, args });
            }
            _ => {
                self.diags.error(
                    DiagKind::NotExpectingDot {
                        name: String::new(),
                        kind: self.ast.kind(rhs).text_type().to_string(),
                    },
                    self.ast.span(rhs),
                );
                self.ds.err = true;
            }
        }
    }

    /// The chain went through `cells[i]`; keep the whole reference parked
    /// until arrays are concrete
    fn wrap_unlinked(&mut self, dot: NodeId, rhs: NodeId, scope_node: NodeId) {
        let name = self
            .ast
            .kind(rhs)
            .name()
            .unwrap_or_else(|| self.interner.intern(""));
        self.ast.replace(
            dot,
            NodeKind::UnlinkedRef {
                target: rhs,
                name,
                scope: scope_node,
            },
        );
    }

    // --- later-phase re-binding ---

    fn rebind_var_ref(&mut self, id: NodeId) {
        self.state.mark_processed(id);
        if self.state.phase.is_primary() {
            return;
        }
        let NodeKind::VarRef { name, .. } = *self.ast.kind(id) else {
            return;
        };
        let Some(found) = self.state.graph.find_fallback(self.cur_scope, name) else {
            return;
        };
        let target = self.state.graph.node(found);
        let var = match self.ast.kind(target) {
            NodeKind::VarScope { var } => {
                let aliased = self.ast.resolve_var_alias(target);
                match self.ast.kind(aliased) {
                    NodeKind::VarScope { var } => *var,
                    _ => *var,
                }
            }
            NodeKind::Var { .. } => target,
            _ => return,
        };
        if let NodeKind::VarRef { var: slot, .. } = self.ast.kind_mut(id) {
            *slot = Some(var);
        }
    }

    fn rebind_var_xref(&mut self, id: NodeId) {
        self.state.mark_processed(id);
        if self.state.phase.is_primary() {
            return;
        }
        let span = self.ast.span(id);
        let NodeKind::VarXRef { name, ref dotted, contains_gen_block, ref inlined_dots, .. } =
            *self.ast.kind(id)
        else {
            return;
        };
        let dotted = dotted.clone();
        let inlined = inlined_dots.clone();
        let scope = match find_dotted(&self.state.graph, self.interner, self.cur_scope, &dotted) {
            Ok(scope) => Some(scope),
            Err(_) if !inlined.is_empty() => {
                // Retry against the inlined (collapsed) path
                find_dotted(&self.state.graph, self.interner, self.cur_scope, &inlined).ok()
            }
            Err(_) => None,
        };
        let found = scope.and_then(|s| {
            self.state
                .graph
                .find_prefixed(s, name, self.interner, false)
        });
        match found {
            Some(found) => {
                let target = self.state.graph.node(found);
                let var = match self.ast.kind(target) {
                    NodeKind::VarScope { var } => {
                        let aliased = self.ast.resolve_var_alias(target);
                        match self.ast.kind(aliased) {
                            NodeKind::VarScope { var } => *var,
                            _ => *var,
                        }
                    }
                    _ => target,
                };
                if let NodeKind::VarXRef { var: slot, .. } = self.ast.kind_mut(id) {
                    *slot = Some(var);
                }
            }
            None if self.state.phase.is_scoped() => {
                let text = self.interner.resolve(&name);
                let path = if dotted.is_empty() {
                    text
                } else {
                    format!("{}.{}", dotted, text)
                };
                // A reference through an elided generate branch is not an
                // error on its own
                if !contains_gen_block {
                    self.diags.error(
                        DiagKind::UnresolvedVariable {
                            path,
                            suggestion: String::new(),
                        },
                        span,
                    );
                }
            }
            None => {}
        }
    }

    fn bind_ftask_ref(&mut self, id: NodeId, name: Symbol, scope: SymId, fallback: bool) {
        let span = self.ast.span(id);
        let found = if fallback {
            self.state.graph.find_fallback(scope, name)
        } else {
            self.state.graph.find_flat(scope, name)
        };
        match found {
            Some(found)
                if matches!(
                    self.ast.kind(self.state.graph.node(found)),
                    NodeKind::FTask { .. }
                ) =>
            {
                let target = self.state.graph.node(found);
                let pkg = self.state.graph.ent(found).class_or_pkg.or(self.ds.class_or_pkg);
                if let NodeKind::FTaskRef { ftask, class_or_pkg, .. } = self.ast.kind_mut(id) {
                    *ftask = Some(target);
                    if class_or_pkg.is_none() {
                        *class_or_pkg = pkg;
                    }
                }
            }
            _ => {
                let cands = self.state.graph.candidates(scope, self.ast, |k| {
                    matches!(k, NodeKind::FTask { .. })
                });
                let text = self.interner.resolve(&name);
                self.diags.error(
                    DiagKind::UnresolvedFunction {
                        what: "task/function",
                        suggestion: suggestion_text(&text, &cands, self.interner),
                        path: text,
                    },
                    span,
                );
                self.ds.err = true;
            }
        }
    }

    fn bind_class_or_pkg(&mut self, id: NodeId, name: Symbol) {
        let span = self.ast.span(id);
        let found = self
            .state
            .graph
            .find_fallback(self.cur_scope, name)
            .or_else(|| {
                self.state
                    .find_module_name(name)
                    .and_then(|n| self.state.node_sym(n))
            });
        match found {
            Some(found)
                if matches!(
                    self.ast.kind(self.state.graph.node(found)),
                    NodeKind::Package { .. } | NodeKind::Class { .. }
                ) =>
            {
                let target = self.state.graph.node(found);
                if let NodeKind::ClassOrPackageRef { target: slot, .. } = self.ast.kind_mut(id) {
                    *slot = Some(target);
                }
            }
            _ => {
                let cands = self.state.graph.candidates(self.cur_scope, self.ast, |k| {
                    matches!(k, NodeKind::Package { .. } | NodeKind::Class { .. })
                });
                let text = self.interner.resolve(&name);
                self.diags.error(
                    DiagKind::UnresolvedScope {
                        suggestion: suggestion_text(&text, &cands, self.interner),
                        path: text,
                    },
                    span,
                );
            }
        }
    }

    /// Interior Dot and ParseRef nodes of a collapsed chain are spent
    fn delete_scaffold(&mut self, id: NodeId) {
        match self.ast.kind(id).clone() {
            NodeKind::Dot { lhs, rhs, .. } => {
                self.delete_scaffold(lhs);
                self.delete_scaffold(rhs);
                self.ast.defer_delete(id);
            }
            NodeKind::ParseRef { .. } | NodeKind::ClassOrPackageRef { .. } => {
                self.ast.defer_delete(id);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_state_accumulates_path() {
        let mut ast = Ast::new();
        let root = ast.alloc(NodeKind::Netlist { modules: vec![] }, FileSpan::synthesized());
        ast.set_root(root);
        let graph = SymGraph::new(root, true);
        let mut ds = DotState::new(graph.root());
        ds.append("top");
        ds.append("s");
        assert_eq!(ds.dotted, "top.s");
        assert_eq!(ds.pos, DotPos::None);
        assert!(!ds.err);
    }
}
