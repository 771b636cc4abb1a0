//! Per-phase linker state
//!
//! Owns the symbol entry graph, the flat module-name table, the scope-alias
//! maps, the deferred interface-variable list and the implicit-net
//! permission set. Created fresh at the start of each phase and dropped at
//! its end; nothing here survives into the next phase.

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use sv_ast::{Ast, NodeId, NodeKind, NodeMap};
use sv_intern::{Interner, Symbol};

use crate::symtab::{SymGraph, SymId};

/// Which elaboration round this phase serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    /// First pass over the parsed tree
    Primary,
    /// After parameter elaboration
    Paramed,
    /// After instance-array elaboration
    Arrayed,
    /// After flattening into scopes
    Scoped,
}

impl LinkPhase {
    /// Phases before instance arrays are elaborated
    pub fn pre_array(self) -> bool {
        matches!(self, Self::Primary | Self::Paramed)
    }

    pub fn is_primary(self) -> bool {
        self == Self::Primary
    }

    pub fn is_scoped(self) -> bool {
        self == Self::Scoped
    }

    fn number(self) -> u32 {
        match self {
            Self::Primary => 0,
            Self::Paramed => 1,
            Self::Arrayed => 2,
            Self::Scoped => 3,
        }
    }
}

/// The two alias categories, resolved in this order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasKind {
    /// Modport entry aliased to its interface items
    Modport,
    /// Interface-typed var aliased to the interface (or modport) scope
    IfaceTop,
}

/// All mutable state of one linking phase
pub struct LinkState {
    pub phase: LinkPhase,
    pub graph: SymGraph,
    /// The compilation-unit (`$unit`) entry, set by the find pass
    pub unit_scope: Option<SymId>,
    /// Flat module/package/interface name table
    modules: FxHashMap<Symbol, NodeId>,
    /// Declaration node -> its entry, this phase only
    node_syms: NodeMap<SymId>,
    /// Reference nodes already rewritten this phase
    processed: NodeMap<()>,
    /// Alias chains per category; category order is load-bearing
    modport_aliases: FxHashMap<SymId, SymId>,
    iface_top_aliases: FxHashMap<SymId, SymId>,
    /// Interface-typed vars awaiting alias computation (var entry, var node)
    pub iface_vars: Vec<(SymId, NodeId)>,
    /// Interfaces queued for their self-contained modport visit
    pub iface_defs: Vec<(SymId, NodeId)>,
    /// (module, identifier) pairs allowed to become implicit nets
    implicit_ok: FxHashSet<(NodeId, Symbol)>,
    /// Elaborated scope name -> scope entry (final phase)
    scope_names: FxHashMap<Symbol, SymId>,
    /// Modules holding references that deferred on parameterization,
    /// keyed by module name for the retry round
    pub deferred_modules: IndexMap<Symbol, NodeId>,
    /// Counter feeding synthesized unnamed-block names
    unnamed_blocks: u32,
}

impl LinkState {
    pub fn new(phase: LinkPhase, root: NodeId) -> Self {
        Self {
            phase,
            graph: SymGraph::new(root, phase.is_primary()),
            unit_scope: None,
            modules: FxHashMap::default(),
            node_syms: NodeMap::default(),
            processed: NodeMap::default(),
            modport_aliases: FxHashMap::default(),
            iface_top_aliases: FxHashMap::default(),
            iface_vars: Vec::new(),
            iface_defs: Vec::new(),
            implicit_ok: FxHashSet::default(),
            scope_names: FxHashMap::default(),
            deferred_modules: IndexMap::new(),
            unnamed_blocks: 0,
        }
    }

    // --- module-name table ---

    pub fn insert_module_name(&mut self, name: Symbol, node: NodeId) {
        self.modules.insert(name, node);
    }

    pub fn find_module_name(&self, name: Symbol) -> Option<NodeId> {
        self.modules.get(&name).copied()
    }

    // --- node <-> entry association ---

    pub fn set_node_sym(&mut self, node: NodeId, sym: SymId) {
        self.node_syms.insert(node, sym);
    }

    pub fn node_sym(&self, node: NodeId) -> Option<SymId> {
        self.node_syms.get(node).copied()
    }

    /// Entry for a node that the find pass must have inserted
    ///
    /// # Panics
    /// Panics when no entry exists; that is a bug in the passes, not a user
    /// error.
    pub fn existing_node_sym(&self, node: NodeId) -> SymId {
        match self.node_syms.get(node) {
            Some(sym) => *sym,
            None => panic!("no symbol entry recorded for node {node:?}"),
        }
    }

    // --- processed markers ---

    pub fn mark_processed(&mut self, node: NodeId) {
        self.processed.insert(node, ());
    }

    pub fn is_processed(&self, node: NodeId) -> bool {
        self.processed.contains_idx(node)
    }

    /// Clear processed markers for every node under `stmts` of one module,
    /// so the deferred-retry round revisits exactly that module
    pub fn clear_processed_under(&mut self, ast: &Ast, module: NodeId) {
        let mut stack = vec![module];
        while let Some(id) = stack.pop() {
            self.processed.remove(id);
            match ast.kind(id) {
                NodeKind::Module { stmts, .. }
                | NodeKind::Package { stmts, .. }
                | NodeKind::Iface { stmts, .. }
                | NodeKind::Class { stmts, .. }
                | NodeKind::Begin { stmts, .. }
                | NodeKind::FTask { stmts, .. }
                | NodeKind::Constraint { stmts, .. }
                | NodeKind::Foreach { stmts, .. }
                | NodeKind::With { stmts, .. }
                | NodeKind::Scope { stmts, .. } => stack.extend(stmts.iter().copied()),
                NodeKind::Var { dtype, .. } | NodeKind::Typedef { dtype, .. } => {
                    stack.extend(*dtype);
                }
                NodeKind::AssignW { lhs, rhs }
                | NodeKind::AssignAlias { lhs, rhs }
                | NodeKind::AssignVarScope { lhs, rhs } => stack.extend([*lhs, *rhs]),
                NodeKind::Disable { expr, .. } => stack.push(*expr),
                NodeKind::Cell { pins, params, .. } => {
                    stack.extend(pins.iter().copied());
                    stack.extend(params.iter().copied());
                }
                NodeKind::Pin { expr, .. } => stack.extend(*expr),
                NodeKind::ArrayDType { elem } => stack.push(*elem),
                NodeKind::EnumDType { items } => stack.extend(items.iter().copied()),
                NodeKind::EnumItem { value, .. } => stack.extend(*value),
                _ => stack.extend(ast.expr_children(id)),
            }
        }
    }

    // --- aliases ---

    pub fn add_scope_alias(&mut self, kind: AliasKind, from: SymId, to: SymId) {
        match kind {
            AliasKind::Modport => self.modport_aliases.insert(from, to),
            AliasKind::IfaceTop => self.iface_top_aliases.insert(from, to),
        };
    }

    /// Close every alias chain and import the terminal's visible bindings
    /// into the chain's source entry. Modport aliases resolve first: an
    /// interface-top alias may capture a modport alias's target afterwards.
    pub fn compute_scope_aliases(&mut self, ast: &Ast) {
        for kind in [AliasKind::Modport, AliasKind::IfaceTop] {
            let map = match kind {
                AliasKind::Modport => std::mem::take(&mut self.modport_aliases),
                AliasKind::IfaceTop => std::mem::take(&mut self.iface_top_aliases),
            };
            let mut sources: Vec<SymId> = map.keys().copied().collect();
            sources.sort_by_key(|id| u32::from(id.into_raw()));
            for src in sources {
                let mut terminal = map[&src];
                let mut hops = 0usize;
                while let Some(&next) = map.get(&terminal) {
                    terminal = next;
                    hops += 1;
                    assert!(hops <= map.len(), "scope alias cycle");
                }
                self.graph.import_from(src, terminal, None, false);
                // A modport terminal also exposes its parent interface's
                // bindings: access to signals not listed in the modport is
                // still allowed
                if matches!(ast.kind(self.graph.node(terminal)), NodeKind::Modport { .. }) {
                    if let Some(iface) = self.graph.ent(terminal).parent {
                        self.graph.import_from(src, iface, None, false);
                    }
                }
            }
        }
    }

    // --- implicit-net permission ---

    pub fn allow_implicit(&mut self, module: NodeId, name: Symbol) {
        self.implicit_ok.insert((module, name));
    }

    pub fn implicit_allowed(&self, module: NodeId, name: Symbol) -> bool {
        self.implicit_ok.contains(&(module, name))
    }

    // --- elaborated scope names (final phase) ---

    pub fn insert_scope_name(&mut self, name: Symbol, sym: SymId) {
        self.scope_names.insert(name, sym);
    }

    pub fn find_scope_name(&self, name: Symbol) -> Option<SymId> {
        self.scope_names.get(&name).copied()
    }

    // --- deferral ---

    pub fn defer_module(&mut self, name: Symbol, module: NodeId) {
        self.deferred_modules.entry(name).or_insert(module);
    }

    /// Synthesized name for an unnamed block that declares something.
    /// Later phases get a phase infix so the name cannot collide with one
    /// synthesized in an earlier phase and already embedded in the tree.
    pub fn next_unnamed_block(&mut self, interner: &Interner) -> Symbol {
        self.unnamed_blocks += 1;
        let n = self.unnamed_blocks;
        if self.phase.is_primary() {
            interner.intern(&format!("unnamedblk{n}"))
        } else {
            interner.intern(&format!("unnamedblk{}_{n}", self.phase.number()))
        }
    }

    /// Symbol graph plus the non-empty alias maps, for debugging
    pub fn dump(&self, ast: &Ast, interner: &Interner) -> String {
        let mut out = self.graph.dump(ast, interner);
        for (label, map) in [
            ("modport aliases", &self.modport_aliases),
            ("iface-top aliases", &self.iface_top_aliases),
        ] {
            if map.is_empty() {
                continue;
            }
            out.push_str(label);
            out.push_str(":\n");
            let mut pairs: Vec<(SymId, SymId)> = map.iter().map(|(a, b)| (*a, *b)).collect();
            pairs.sort_by_key(|(a, _)| u32::from(a.into_raw()));
            for (from, to) in pairs {
                let from_name = ast
                    .kind(self.graph.node(from))
                    .name()
                    .map_or_else(|| "?".to_string(), |s| interner.resolve(&s));
                let to_name = ast
                    .kind(self.graph.node(to))
                    .name()
                    .map_or_else(|| "?".to_string(), |s| interner.resolve(&s));
                out.push_str(&format!("  {from_name} -> {to_name}\n"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sv_span::FileSpan;

    #[test]
    fn phase_rounds() {
        assert!(LinkPhase::Primary.pre_array());
        assert!(LinkPhase::Paramed.pre_array());
        assert!(!LinkPhase::Arrayed.pre_array());
        assert!(LinkPhase::Scoped.is_scoped());
    }

    #[test]
    fn unnamed_block_names_carry_phase_infix() {
        let interner = Interner::new();
        let mut ast = Ast::new();
        let root = ast.alloc(NodeKind::Netlist { modules: vec![] }, FileSpan::synthesized());
        ast.set_root(root);

        let mut primary = LinkState::new(LinkPhase::Primary, root);
        assert_eq!(
            interner.resolve(&primary.next_unnamed_block(&interner)),
            "unnamedblk1"
        );
        let mut scoped = LinkState::new(LinkPhase::Scoped, root);
        assert_eq!(
            interner.resolve(&scoped.next_unnamed_block(&interner)),
            "unnamedblk3_1"
        );
    }

    #[test]
    fn implicit_permission_is_per_module() {
        let mut ast = Ast::new();
        let root = ast.alloc(NodeKind::Netlist { modules: vec![] }, FileSpan::synthesized());
        ast.set_root(root);
        let interner = Interner::new();
        let m1 = ast.alloc(
            NodeKind::Module {
                name: interner.intern("m1"),
                stmts: vec![],
                level: 1,
                dead: false,
            },
            FileSpan::synthesized(),
        );
        let m2 = ast.alloc(
            NodeKind::Module {
                name: interner.intern("m2"),
                stmts: vec![],
                level: 1,
                dead: false,
            },
            FileSpan::synthesized(),
        );
        let mut state = LinkState::new(LinkPhase::Primary, root);
        let y = interner.intern("y");
        state.allow_implicit(m1, y);
        assert!(state.implicit_allowed(m1, y));
        assert!(!state.implicit_allowed(m2, y));
    }
}
