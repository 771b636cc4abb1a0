//! Find pass: builds the initial symbol entry hierarchy
//!
//! One top-down walk inserting an entry per declaration. The hierarchy
//! follows instantiation: a cell's entry becomes the scope holding the
//! instantiated module's declarations, so `top.s.x` is three nested
//! entries. Modules instantiated more than once are walked under each
//! cell; the node-to-entry table keeps the last visit, which is the one
//! later passes resolve the shared body against.

use sv_ast::{Ast, NodeId, NodeKind};
use sv_intern::{Interner, Symbol};
use sv_span::FileSpan;

use crate::error::{DiagKind, Diagnostics};
use crate::state::LinkState;
use crate::symtab::{SCOPE_JOIN, SymId};

/// Maximum instantiation depth before a recursive module is cut off
const RECURSION_LIMIT: usize = 64;

pub(crate) fn run(
    ast: &mut Ast,
    state: &mut LinkState,
    interner: &Interner,
    diags: &mut Diagnostics,
) {
    let mut visitor = FindVisitor {
        ast,
        state,
        interner,
        diags,
        module: None,
        class: None,
        depth: 0,
    };
    visitor.run();
}

struct FindVisitor<'a> {
    ast: &'a mut Ast,
    state: &'a mut LinkState,
    interner: &'a Interner,
    diags: &'a mut Diagnostics,
    /// Enclosing module/interface/package node
    module: Option<NodeId>,
    /// Enclosing class node, for method marking
    class: Option<NodeId>,
    depth: usize,
}

impl FindVisitor<'_> {
    fn run(&mut self) {
        let root_node = self.ast.root();
        let NodeKind::Netlist { modules } = self.ast.kind(root_node) else {
            panic!("tree root is not a netlist");
        };
        let modules = modules.clone();
        let root = self.state.graph.root();

        for &m in &modules {
            if let Some(name) = self.ast.kind(m).name() {
                self.state.insert_module_name(name, m);
            }
        }

        // The compilation unit scope; top modules fall back to it
        let unit = self.find_or_make_unit(&modules, root);
        self.state.unit_scope = Some(unit);

        // Packages first so imports during module walks resolve
        for &m in &modules {
            if let NodeKind::Package {
                name,
                is_unit: false,
                ..
            } = *self.ast.kind(m)
            {
                let ent = self.state.graph.new_ent(m, root, Some(unit));
                self.insert(root, name, ent, self.ast.span(m));
                self.state.set_node_sym(m, ent);
                self.walk_contents(m, ent, Some(m));
            }
        }
        if let Some(&unit_node) = modules.iter().find(|&&m| {
            matches!(self.ast.kind(m), NodeKind::Package { is_unit: true, .. })
        }) {
            self.state.set_node_sym(unit_node, unit);
            self.walk_contents(unit_node, unit, Some(unit_node));
        }
        for &m in &modules {
            if let NodeKind::Module { name, level, .. } = *self.ast.kind(m) {
                // Level 1-2 are the roots of the instantiation forest;
                // everything deeper is reached through cells
                if level <= 2 {
                    let ent = self.state.graph.new_ent(m, root, Some(unit));
                    self.insert(root, name, ent, self.ast.span(m));
                    self.state.set_node_sym(m, ent);
                    self.walk_contents(m, ent, Some(m));
                }
            }
        }
    }

    fn find_or_make_unit(&mut self, modules: &[NodeId], root: SymId) -> SymId {
        let unit_node = modules
            .iter()
            .copied()
            .find(|&m| matches!(self.ast.kind(m), NodeKind::Package { is_unit: true, .. }))
            .unwrap_or_else(|| {
                self.ast.alloc(
                    NodeKind::Package {
                        name: self.interner.intern("$unit"),
                        stmts: vec![],
                        is_unit: true,
                    },
                    FileSpan::synthesized(),
                )
            });
        let unit = self.state.graph.new_ent(unit_node, root, None);
        // "$unit" cannot be spelled in source, so no collision is possible
        let name = self.interner.intern("$unit");
        self.state.graph.reinsert(root, name, unit);
        unit
    }

    fn insert(&mut self, parent: SymId, name: Symbol, ent: SymId, span: FileSpan) {
        self.state
            .graph
            .insert(parent, name, ent, self.ast, self.interner, self.diags, span);
    }

    fn walk_contents(&mut self, scope_node: NodeId, scope: SymId, module: Option<NodeId>) {
        let saved_module = self.module;
        if module.is_some() {
            self.module = module;
        }
        let stmts = self.stmts_of(scope_node);
        for stmt in stmts {
            self.visit(stmt, scope);
        }
        self.module = saved_module;
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
            | NodeKind::With { stmts, .. } => stmts.clone(),
            _ => Vec::new(),
        }
    }

    fn visit(&mut self, id: NodeId, cur: SymId) {
        let span = self.ast.span(id);
        match self.ast.kind(id).clone() {
            NodeKind::Cell { name, module, recursive, .. } => {
                self.visit_cell(id, name, module, recursive, cur, span);
            }
            NodeKind::CellInline { name, .. } => {
                // Placeholder for a collapsed instance: lookups inside it
                // see the prefixed flat names, then the module scope
                let ent = self.state.graph.new_ent(id, cur, Some(cur));
                let text = self.interner.resolve(&name);
                self.state.graph.ent_mut(ent).prefix = format!("{text}{SCOPE_JOIN}");
                self.insert(cur, name, ent, span);
                self.state.set_node_sym(id, ent);
            }
            NodeKind::Iface { name, .. } => {
                // Reached through a cell; the enclosing cell entry is the
                // interface scope
                let _ = name;
                self.state.set_node_sym(id, cur);
                self.state.iface_defs.push((cur, id));
                self.walk_contents(id, cur, Some(id));
            }
            NodeKind::Class { name, extends, .. } => {
                let ent = self.state.graph.new_ent(id, cur, Some(cur));
                self.insert(cur, name, ent, span);
                self.state.set_node_sym(id, ent);
                if self.state.phase.is_primary() {
                    self.ensure_constructor(id, ent);
                }
                let saved_class = self.class;
                self.class = Some(id);
                self.walk_contents(id, ent, None);
                self.class = saved_class;
                let _ = extends;
            }
            NodeKind::Begin { name, stmts, .. } => {
                self.visit_begin(id, name, &stmts, cur, span);
            }
            NodeKind::FTask { name, is_constructor, .. } => {
                let ent = self.state.graph.new_ent(id, cur, Some(cur));
                self.insert(cur, name, ent, span);
                self.state.set_node_sym(id, ent);
                if self.class.is_some() {
                    if let NodeKind::FTask { class_method, .. } = self.ast.kind_mut(id) {
                        *class_method = true;
                    }
                }
                let _ = is_constructor;
                self.walk_contents(id, ent, None);
            }
            NodeKind::Constraint { name, .. } => {
                let ent = self.state.graph.new_ent(id, cur, Some(cur));
                self.insert(cur, name, ent, span);
                self.state.set_node_sym(id, ent);
                self.walk_contents(id, ent, None);
            }
            NodeKind::Var { name, dtype, is_class_member, .. } => {
                self.warn_shadow(cur, name, span);
                let ent = self.state.graph.new_ent(id, cur, Some(cur));
                self.insert(cur, name, ent, span);
                self.state.set_node_sym(id, ent);
                if let Some(dtype) = dtype {
                    self.visit_dtype_decls(dtype, cur);
                }
                if self.class.is_some() && !is_class_member {
                    if let NodeKind::Var { is_class_member, .. } = self.ast.kind_mut(id) {
                        *is_class_member = true;
                    }
                }
            }
            NodeKind::Typedef { name, dtype, .. } => {
                let ent = self.state.graph.new_ent(id, cur, Some(cur));
                self.insert(cur, name, ent, span);
                self.state.set_node_sym(id, ent);
                if let Some(dtype) = dtype {
                    self.visit_dtype_decls(dtype, cur);
                }
            }
            NodeKind::TypedefFwd { name } => {
                // Only needed until the real declaration is seen; never
                // shadows one already present
                if self.state.graph.find_flat(cur, name).is_none() {
                    let ent = self.state.graph.new_ent(id, cur, Some(cur));
                    self.state.graph.reinsert(cur, name, ent);
                    self.state.set_node_sym(id, ent);
                }
            }
            NodeKind::ParamTypeDType { name, .. } => {
                let ent = self.state.graph.new_ent(id, cur, Some(cur));
                self.insert(cur, name, ent, span);
                self.state.set_node_sym(id, ent);
            }
            NodeKind::Clocking { name, items } => {
                let scope = match name {
                    Some(name) => {
                        let ent = self.state.graph.new_ent(id, cur, Some(cur));
                        self.insert(cur, name, ent, span);
                        self.state.set_node_sym(id, ent);
                        ent
                    }
                    None => cur,
                };
                for item in items {
                    let item_span = self.ast.span(item);
                    if let NodeKind::ClockingItem { name, .. } = *self.ast.kind(item) {
                        let ent = self.state.graph.new_ent(item, scope, Some(scope));
                        self.insert(scope, name, ent, item_span);
                        self.state.set_node_sym(item, ent);
                    }
                }
            }
            NodeKind::Foreach { name, .. } | NodeKind::With { name, .. } => {
                let block_name = match name {
                    Some(name) => name,
                    None => {
                        let synth = self.state.next_unnamed_block(self.interner);
                        match self.ast.kind_mut(id) {
                            NodeKind::Foreach { name, .. } | NodeKind::With { name, .. } => {
                                *name = Some(synth);
                            }
                            _ => unreachable!(),
                        }
                        synth
                    }
                };
                let ent = self.state.graph.new_ent(id, cur, Some(cur));
                self.state.graph.reinsert(cur, block_name, ent);
                self.state.set_node_sym(id, ent);
                self.walk_contents(id, ent, None);
            }
            NodeKind::PackageImport { pkg_name, name } => {
                self.apply_import(cur, pkg_name, name, false, span);
            }
            NodeKind::PackageExport { pkg_name, name } => {
                self.apply_import(cur, pkg_name, name, true, span);
            }
            NodeKind::PackageExportStarStar => {
                self.state.graph.export_all_imported(cur);
            }
            // Scope-tree nodes are handled by the scope pass
            NodeKind::Scope { .. }
            | NodeKind::VarScope { .. }
            | NodeKind::AssignAlias { .. }
            | NodeKind::AssignVarScope { .. } => {}
            _ => {}
        }
    }

    fn visit_cell(
        &mut self,
        id: NodeId,
        name: Symbol,
        module: Option<NodeId>,
        recursive: bool,
        cur: SymId,
        span: FileSpan,
    ) {
        // The dotted-hierarchy point: `a.b.c` is inserted as `c` under the
        // already-built `a.b`
        let text = self.interner.resolve(&name);
        let (parent, leaf) = if let Some(pos) = text.rfind('.') {
            let prefix = &text[..pos];
            let leaf = self.interner.intern(&text[pos + 1..]);
            match crate::resolve::find_dotted(&self.state.graph, self.interner, cur, prefix) {
                Ok(scope) => (scope, leaf),
                Err((ok_scope, _bad)) => (ok_scope, leaf),
            }
        } else {
            (cur, name)
        };
        // Misses inside the instance fall back to the compilation unit,
        // never into the instantiating module
        let fallback = self.state.unit_scope.unwrap_or(cur);
        let ent = self.state.graph.new_ent(id, parent, Some(fallback));
        self.insert(parent, leaf, ent, span);
        if parent != cur {
            // Also reachable under the collapsed inlined name
            let joined = self.interner.intern(&text.replace('.', SCOPE_JOIN));
            self.state.graph.reinsert(cur, joined, ent);
        }
        self.state.set_node_sym(id, ent);

        let Some(module) = module else {
            return;
        };
        if recursive || self.depth >= RECURSION_LIMIT {
            return;
        }
        self.depth += 1;
        self.state.set_node_sym(module, ent);
        match self.ast.kind(module) {
            NodeKind::Iface { .. } => {
                self.state.iface_defs.push((ent, module));
                self.walk_contents(module, ent, Some(module));
            }
            _ => self.walk_contents(module, ent, Some(module)),
        }
        self.depth -= 1;
    }

    fn visit_begin(
        &mut self,
        id: NodeId,
        name: Option<Symbol>,
        stmts: &[NodeId],
        cur: SymId,
        span: FileSpan,
    ) {
        let name = match name {
            Some(name) => Some(name),
            None if self.contains_decls(stmts) => {
                let synth = self.state.next_unnamed_block(self.interner);
                if let NodeKind::Begin { name, .. } = self.ast.kind_mut(id) {
                    *name = Some(synth);
                }
                Some(synth)
            }
            // Anonymous and empty of declarations: transparent
            None => None,
        };
        match name {
            Some(name) => {
                let ent = self.state.graph.new_ent(id, cur, Some(cur));
                self.insert(cur, name, ent, span);
                self.state.set_node_sym(id, ent);
                self.walk_contents(id, ent, None);
            }
            None => {
                self.state.set_node_sym(id, cur);
                self.walk_contents(id, cur, None);
            }
        }
    }

    /// Enum values become visible in the scope enclosing the type
    fn visit_dtype_decls(&mut self, dtype: NodeId, cur: SymId) {
        let mut dtype = dtype;
        loop {
            match self.ast.kind(dtype) {
                NodeKind::ArrayDType { elem } => dtype = *elem,
                NodeKind::EnumDType { items } => {
                    for item in items.clone() {
                        let span = self.ast.span(item);
                        if let NodeKind::EnumItem { name, .. } = *self.ast.kind(item) {
                            let ent = self.state.graph.new_ent(item, cur, Some(cur));
                            self.insert(cur, name, ent, span);
                            self.state.set_node_sym(item, ent);
                        }
                    }
                    return;
                }
                _ => return,
            }
        }
    }

    fn contains_decls(&self, stmts: &[NodeId]) -> bool {
        stmts.iter().any(|&s| {
            matches!(
                self.ast.kind(s),
                NodeKind::Var { .. }
                    | NodeKind::Typedef { .. }
                    | NodeKind::TypedefFwd { .. }
                    | NodeKind::FTask { .. }
                    | NodeKind::Cell { .. }
                    | NodeKind::Begin { .. }
                    | NodeKind::Clocking { .. }
                    | NodeKind::Constraint { .. }
            )
        })
    }

    /// Every class can be `new`ed even without an explicit constructor
    fn ensure_constructor(&mut self, class: NodeId, class_ent: SymId) {
        let new_name = self.interner.intern("new");
        let has_new = self.stmts_of(class).iter().any(|&s| {
            matches!(self.ast.kind(s), NodeKind::FTask { name, .. } if *name == new_name)
        });
        if has_new {
            return;
        }
        let span = self.ast.span(class);
        let ctor = self.ast.alloc(
            NodeKind::FTask {
                name: new_name,
                stmts: vec![],
                is_func: true,
                is_constructor: true,
                class_method: true,
            },
            span,
        );
        if let NodeKind::Class { stmts, .. } = self.ast.kind_mut(class) {
            stmts.push(ctor);
        }
        let ent = self.state.graph.new_ent(ctor, class_ent, Some(class_ent));
        self.state.graph.reinsert(class_ent, new_name, ent);
        self.state.set_node_sym(ctor, ent);
    }

    fn warn_shadow(&mut self, cur: SymId, name: Symbol, span: FileSpan) {
        if self.state.graph.find_flat(cur, name).is_none()
            && self.state.graph.find_fallback(cur, name).is_some()
        {
            self.diags.warning(
                DiagKind::ShadowedDeclaration {
                    name: self.interner.resolve(&name),
                },
                span,
            );
        }
    }

    fn apply_import(
        &mut self,
        cur: SymId,
        pkg_name: Symbol,
        name: Option<Symbol>,
        reexport: bool,
        span: FileSpan,
    ) {
        let Some(pkg_node) = self.state.find_module_name(pkg_name) else {
            self.diags.error(
                DiagKind::UnresolvedScope {
                    path: self.interner.resolve(&pkg_name),
                    suggestion: String::new(),
                },
                span,
            );
            return;
        };
        let Some(pkg_ent) = self.state.node_sym(pkg_node) else {
            self.diags.error(
                DiagKind::UnresolvedScope {
                    path: self.interner.resolve(&pkg_name),
                    suggestion: String::new(),
                },
                span,
            );
            return;
        };
        self.state.graph.import_from(cur, pkg_ent, name, reexport);
    }
}
