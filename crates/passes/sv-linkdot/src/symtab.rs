//! Hierarchical symbol entry graph
//!
//! One entry per declaration, arena-allocated and addressed by [`SymId`].
//! Entries form a DAG: `parent` points at the enclosing scope, `fallback`
//! points at the scope consulted when a flat lookup misses (usually the
//! parent, but tasks fall back to their module and top modules fall back to
//! the compilation unit). The graph is rebuilt from scratch every linking
//! phase and dropped at phase end.

use indexmap::IndexMap;
use sv_arena::{Arena, Idx};
use sv_ast::{Ast, NodeId, NodeKind};
use sv_intern::{Interner, Symbol};
use sv_span::FileSpan;

use crate::error::{DiagKind, Diagnostics};

/// Handle of an entry in one phase's graph
pub type SymId = Idx<SymEnt>;

/// Joiner used for collapsed (inlined) scope names
pub const SCOPE_JOIN: &str = "__DOT__";

/// One symbol entry wrapping exactly one declaration node
#[derive(Debug)]
pub struct SymEnt {
    /// The declaration this entry stands for
    pub node: NodeId,
    pub parent: Option<SymId>,
    /// Scope searched when a flat lookup here misses; `None` ends the chain
    pub fallback: Option<SymId>,
    /// Collapsed-scope name prefix (`a__DOT__b__DOT__`), empty when the
    /// scope was never inlined
    pub prefix: String,
    /// Package or class this binding came through, for `pkg::x` reporting
    pub class_or_pkg: Option<NodeId>,
    /// Binding was copied here by a package import/export
    pub imported: bool,
    /// Visible to importers; pin-number bookkeeping entries are not
    pub exported: bool,
    children: IndexMap<Symbol, SymId>,
}

/// Arena of entries plus the root; one graph per phase
#[derive(Debug)]
pub struct SymGraph {
    arena: Arena<SymEnt>,
    root: SymId,
    /// Graph serves the primary phase; some duplicate exemptions only
    /// apply there
    primary: bool,
}

impl SymGraph {
    /// Create a graph whose root wraps the netlist node
    pub fn new(root_node: NodeId, primary: bool) -> Self {
        let mut arena = Arena::new();
        let root = arena.alloc(SymEnt {
            node: root_node,
            parent: None,
            fallback: None,
            prefix: String::new(),
            class_or_pkg: None,
            imported: false,
            exported: true,
            children: IndexMap::new(),
        });
        Self {
            arena,
            root,
            primary,
        }
    }

    pub fn root(&self) -> SymId {
        self.root
    }

    pub fn ent(&self, id: SymId) -> &SymEnt {
        &self.arena[id]
    }

    pub fn ent_mut(&mut self, id: SymId) -> &mut SymEnt {
        &mut self.arena[id]
    }

    pub fn node(&self, id: SymId) -> NodeId {
        self.arena[id].node
    }

    /// Allocate an entry without naming it under any scope
    pub fn new_ent(&mut self, node: NodeId, parent: SymId, fallback: Option<SymId>) -> SymId {
        self.arena.alloc(SymEnt {
            node,
            parent: Some(parent),
            fallback,
            prefix: String::new(),
            class_or_pkg: None,
            imported: false,
            exported: true,
            children: IndexMap::new(),
        })
    }

    /// Name `child` under `parent`, enforcing the duplicate rules.
    ///
    /// A prior binding is overwritten silently when it wraps the same node,
    /// was imported, or (in the primary phase) both sides are generate
    /// blocks. Paired input/output clocking items keep the first binding.
    /// Everything else is a duplicate error.
    pub fn insert(
        &mut self,
        parent: SymId,
        name: Symbol,
        child: SymId,
        ast: &Ast,
        interner: &Interner,
        diags: &mut Diagnostics,
        span: FileSpan,
    ) {
        if let Some(&prior) = self.arena[parent].children.get(&name) {
            if prior == child || self.arena[prior].node == self.arena[child].node {
                return;
            }
            if self.arena[prior].imported {
                self.arena[parent].children.insert(name, child);
                return;
            }
            let prior_kind = ast.kind(self.arena[prior].node);
            let new_kind = ast.kind(self.arena[child].node);
            // Mutually-exclusive generate branches regenerate the same
            // name, but only before elaboration picks one
            if self.primary {
                if let (
                    NodeKind::Begin { generate: true, .. },
                    NodeKind::Begin { generate: true, .. },
                ) = (prior_kind, new_kind)
                {
                    self.arena[parent].children.insert(name, child);
                    return;
                }
            }
            if let (
                NodeKind::ClockingItem {
                    direction: prior_dir,
                    ..
                },
                NodeKind::ClockingItem { direction, .. },
            ) = (prior_kind, new_kind)
            {
                if prior_dir != direction {
                    return;
                }
            }
            let name_text = interner.resolve(&name);
            let prev_text = prior_kind.text_type();
            let new_text = new_kind.text_type();
            if prev_text == new_text {
                diags.error(
                    DiagKind::DuplicateDeclaration {
                        name: name_text,
                        kind: new_text.to_string(),
                    },
                    span,
                );
            } else {
                diags.error(
                    DiagKind::SameNameDifferentKind {
                        name: name_text,
                        prev_kind: prev_text.to_string(),
                        kind: new_text.to_string(),
                    },
                    span,
                );
            }
            return;
        }
        self.arena[parent].children.insert(name, child);
    }

    /// Overwrite any prior binding unconditionally
    pub fn reinsert(&mut self, parent: SymId, name: Symbol, child: SymId) {
        self.arena[parent].children.insert(name, child);
    }

    /// Flat lookup: this scope only
    pub fn find_flat(&self, scope: SymId, name: Symbol) -> Option<SymId> {
        self.arena[scope].children.get(&name).copied()
    }

    /// Flat lookup, then follow the fallback chain outward
    pub fn find_fallback(&self, scope: SymId, name: Symbol) -> Option<SymId> {
        let mut cur = Some(scope);
        let mut hops = 0usize;
        while let Some(id) = cur {
            if let Some(found) = self.find_flat(id, name) {
                return Some(found);
            }
            cur = self.arena[id].fallback;
            hops += 1;
            assert!(hops <= self.arena.len(), "fallback cycle in symbol graph");
        }
        None
    }

    /// Lookup retrying with the scope's collapsed-inline prefix,
    /// progressively shortened one `__DOT__` segment at a time
    pub fn find_prefixed(
        &self,
        scope: SymId,
        name: Symbol,
        interner: &Interner,
        fallback: bool,
    ) -> Option<SymId> {
        let base = if fallback {
            self.find_fallback(scope, name)
        } else {
            self.find_flat(scope, name)
        };
        if base.is_some() {
            return base;
        }
        let name_text = interner.resolve(&name);
        let mut prefix = self.arena[scope].prefix.clone();
        while !prefix.is_empty() {
            let prefixed = interner.intern(&format!("{prefix}{name_text}"));
            let hit = if fallback {
                self.find_fallback(scope, prefixed)
            } else {
                self.find_flat(scope, prefixed)
            };
            if hit.is_some() {
                return hit;
            }
            // Drop the innermost prefix segment and retry
            let trimmed = prefix.trim_end_matches(SCOPE_JOIN);
            prefix = match trimmed.rfind(SCOPE_JOIN) {
                Some(pos) => trimmed[..pos + SCOPE_JOIN.len()].to_string(),
                None => String::new(),
            };
        }
        None
    }

    /// Copy `src`'s visible (exported) bindings into `dst`, marked imported.
    /// `name` restricts to one binding; `None` is the wildcard. `reexport`
    /// makes the copies visible to importers of `dst` in turn (package
    /// `export`); plain `import` does not chain. Ownership of the underlying
    /// declarations does not move.
    pub fn import_from(&mut self, dst: SymId, src: SymId, name: Option<Symbol>, reexport: bool) {
        let picks: Vec<(Symbol, SymId)> = self.arena[src]
            .children
            .iter()
            .filter(|&(child_name, &child)| {
                self.arena[child].exported && name.is_none_or(|n| *child_name == n)
            })
            .map(|(n, c)| (*n, *c))
            .collect();
        let src_node = self.arena[src].node;
        for (child_name, child) in picks {
            if self.arena[dst].children.contains_key(&child_name) {
                // Local declarations win over imports
                continue;
            }
            let copy = self.arena.alloc(SymEnt {
                node: self.arena[child].node,
                parent: Some(dst),
                fallback: self.arena[child].fallback,
                prefix: String::new(),
                class_or_pkg: Some(src_node),
                imported: true,
                exported: reexport,
                children: self.arena[child].children.clone(),
            });
            self.arena[dst].children.insert(child_name, copy);
        }
    }

    /// `export *::*`: everything imported into `scope` becomes visible to
    /// its importers in turn
    pub fn export_all_imported(&mut self, scope: SymId) {
        let imported: Vec<SymId> = self.arena[scope]
            .children
            .values()
            .copied()
            .filter(|&c| self.arena[c].imported)
            .collect();
        for child in imported {
            self.arena[child].exported = true;
        }
    }

    /// Names visible from `scope` whose declarations pass `matcher`, for
    /// spelling suggestions. Walks the fallback chain.
    pub fn candidates(
        &self,
        scope: SymId,
        ast: &Ast,
        matcher: impl Fn(&NodeKind) -> bool,
    ) -> Vec<Symbol> {
        let mut out = Vec::new();
        let mut cur = Some(scope);
        let mut hops = 0usize;
        while let Some(id) = cur {
            for (&name, &child) in &self.arena[id].children {
                if matcher(ast.kind(self.arena[child].node)) && !out.contains(&name) {
                    out.push(name);
                }
            }
            cur = self.arena[id].fallback;
            hops += 1;
            assert!(hops <= self.arena.len(), "fallback cycle in symbol graph");
        }
        out
    }

    /// Child bindings of a scope, in insertion order
    pub fn children(&self, scope: SymId) -> impl Iterator<Item = (Symbol, SymId)> + '_ {
        self.arena[scope].children.iter().map(|(n, c)| (*n, *c))
    }

    /// Plain-text listing of the graph for debugging; not a stable format
    pub fn dump(&self, ast: &Ast, interner: &Interner) -> String {
        let mut out = String::new();
        self.dump_ent(self.root, "<root>", 0, ast, interner, &mut out);
        out
    }

    fn dump_ent(
        &self,
        id: SymId,
        name: &str,
        depth: usize,
        ast: &Ast,
        interner: &Interner,
        out: &mut String,
    ) {
        use std::fmt::Write;
        let ent = &self.arena[id];
        let kind = ast.kind(ent.node).text_type();
        let _ = write!(out, "{:indent$}{name} [{kind}]", "", indent = depth * 2);
        if ent.imported {
            out.push_str(" imported");
        }
        if !ent.prefix.is_empty() {
            let _ = write!(out, " prefix={}", ent.prefix);
        }
        out.push('\n');
        for (child_name, child) in &ent.children {
            // Imported copies share children with their source; do not recurse
            if self.arena[*child].parent == Some(id) {
                self.dump_ent(
                    *child,
                    &interner.resolve(child_name),
                    depth + 1,
                    ast,
                    interner,
                    out,
                );
            } else {
                let _ = writeln!(
                    out,
                    "{:indent$}{} [alias]",
                    "",
                    interner.resolve(child_name),
                    indent = (depth + 1) * 2
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sv_ast::{ConstKind, Direction, VarType};

    fn span() -> FileSpan {
        FileSpan::synthesized()
    }

    struct Fixture {
        ast: Ast,
        interner: Interner,
        graph: SymGraph,
    }

    fn fixture() -> Fixture {
        fixture_with(true)
    }

    fn fixture_with(primary: bool) -> Fixture {
        let mut ast = Ast::new();
        let root = ast.alloc(NodeKind::Netlist { modules: vec![] }, span());
        ast.set_root(root);
        let graph = SymGraph::new(root, primary);
        Fixture {
            ast,
            interner: Interner::new(),
            graph,
        }
    }

    fn add_var(fx: &mut Fixture, scope: SymId, name: &str) -> SymId {
        let sym = fx.interner.intern(name);
        let node = fx.ast.alloc(
            NodeKind::Var {
                name: sym,
                var_type: VarType::Logic,
                dtype: None,
                is_io: false,
                is_iface_ref: false,
                is_func_local: false,
                is_class_member: false,
                pin_num: 0,
                port_set: false,
            },
            span(),
        );
        let ent = fx.graph.new_ent(node, scope, Some(scope));
        let mut diags = Diagnostics::new();
        fx.graph
            .insert(scope, sym, ent, &fx.ast, &fx.interner, &mut diags, span());
        assert!(diags.is_empty(), "{:?}", diags.iter().collect::<Vec<_>>());
        ent
    }

    #[test]
    fn fallback_chain_finds_outer_name() {
        let mut fx = fixture();
        let root = fx.graph.root();
        let outer = add_var(&mut fx, root, "clk");
        let mod_node = fx.ast.alloc(
            NodeKind::Module {
                name: fx.interner.intern("m"),
                stmts: vec![],
                level: 1,
                dead: false,
            },
            span(),
        );
        let scope = fx.graph.new_ent(mod_node, root, Some(root));
        let clk = fx.interner.intern("clk");
        assert_eq!(fx.graph.find_flat(scope, clk), None);
        assert_eq!(fx.graph.find_fallback(scope, clk), Some(outer));
    }

    #[test]
    fn duplicate_same_node_is_silent() {
        let mut fx = fixture();
        let root = fx.graph.root();
        let ent = add_var(&mut fx, root, "x");
        let x = fx.interner.intern("x");
        let twin = fx.graph.new_ent(fx.graph.node(ent), root, Some(root));
        let mut diags = Diagnostics::new();
        fx.graph
            .insert(root, x, twin, &fx.ast, &fx.interner, &mut diags, span());
        assert!(diags.is_empty());
    }

    #[test]
    fn duplicate_distinct_nodes_reported() {
        let mut fx = fixture();
        let root = fx.graph.root();
        add_var(&mut fx, root, "x");
        let x = fx.interner.intern("x");
        let other = fx.ast.alloc(
            NodeKind::Var {
                name: x,
                var_type: VarType::Logic,
                dtype: None,
                is_io: false,
                is_iface_ref: false,
                is_func_local: false,
                is_class_member: false,
                pin_num: 0,
                port_set: false,
            },
            span(),
        );
        let ent = fx.graph.new_ent(other, root, Some(root));
        let mut diags = Diagnostics::new();
        fx.graph
            .insert(root, x, ent, &fx.ast, &fx.interner, &mut diags, span());
        assert_eq!(diags.len(), 1);
        assert!(diags.has_errors());
    }

    #[test]
    fn generate_siblings_overwrite_without_error() {
        let mut fx = fixture();
        let root = fx.graph.root();
        let blk = fx.interner.intern("blk");
        let mk = |fx: &mut Fixture| {
            fx.ast.alloc(
                NodeKind::Begin {
                    name: Some(blk),
                    generate: true,
                    stmts: vec![],
                },
                span(),
            )
        };
        let first = mk(&mut fx);
        let second = mk(&mut fx);
        let first_ent = fx.graph.new_ent(first, root, Some(root));
        let second_ent = fx.graph.new_ent(second, root, Some(root));
        let mut diags = Diagnostics::new();
        fx.graph
            .insert(root, blk, first_ent, &fx.ast, &fx.interner, &mut diags, span());
        fx.graph
            .insert(root, blk, second_ent, &fx.ast, &fx.interner, &mut diags, span());
        assert!(diags.is_empty());
        assert_eq!(fx.graph.find_flat(root, blk), Some(second_ent));
    }

    #[test]
    fn generate_siblings_are_duplicates_after_primary() {
        let mut fx = fixture_with(false);
        let root = fx.graph.root();
        let blk = fx.interner.intern("blk");
        let mk = |fx: &mut Fixture| {
            fx.ast.alloc(
                NodeKind::Begin {
                    name: Some(blk),
                    generate: true,
                    stmts: vec![],
                },
                span(),
            )
        };
        let first = mk(&mut fx);
        let second = mk(&mut fx);
        let first_ent = fx.graph.new_ent(first, root, Some(root));
        let second_ent = fx.graph.new_ent(second, root, Some(root));
        let mut diags = Diagnostics::new();
        fx.graph
            .insert(root, blk, first_ent, &fx.ast, &fx.interner, &mut diags, span());
        fx.graph
            .insert(root, blk, second_ent, &fx.ast, &fx.interner, &mut diags, span());
        assert_eq!(diags.len(), 1);
        assert!(diags.has_errors());
        assert_eq!(fx.graph.find_flat(root, blk), Some(first_ent));
    }

    #[test]
    fn paired_clocking_items_keep_first() {
        let mut fx = fixture();
        let root = fx.graph.root();
        let sig = fx.interner.intern("data");
        let input = fx.ast.alloc(
            NodeKind::ClockingItem {
                name: sig,
                direction: Direction::Input,
            },
            span(),
        );
        let output = fx.ast.alloc(
            NodeKind::ClockingItem {
                name: sig,
                direction: Direction::Output,
            },
            span(),
        );
        let in_ent = fx.graph.new_ent(input, root, Some(root));
        let out_ent = fx.graph.new_ent(output, root, Some(root));
        let mut diags = Diagnostics::new();
        fx.graph
            .insert(root, sig, in_ent, &fx.ast, &fx.interner, &mut diags, span());
        fx.graph
            .insert(root, sig, out_ent, &fx.ast, &fx.interner, &mut diags, span());
        assert!(diags.is_empty());
        assert_eq!(fx.graph.find_flat(root, sig), Some(in_ent));
    }

    #[test]
    fn import_skips_unexported_and_local_wins() {
        let mut fx = fixture();
        let root = fx.graph.root();
        let pkg_node = fx.ast.alloc(
            NodeKind::Package {
                name: fx.interner.intern("pkg"),
                stmts: vec![],
                is_unit: false,
            },
            span(),
        );
        let pkg = fx.graph.new_ent(pkg_node, root, Some(root));
        add_var(&mut fx, pkg, "visible");
        let hidden_ent = add_var(&mut fx, pkg, "hidden");
        fx.graph.ent_mut(hidden_ent).exported = false;
        let local = add_var(&mut fx, root, "visible");

        fx.graph.import_from(root, pkg, None, false);
        let visible = fx.interner.intern("visible");
        let hidden = fx.interner.intern("hidden");
        assert_eq!(fx.graph.find_flat(root, visible), Some(local));
        assert_eq!(fx.graph.find_flat(root, hidden), None);
    }

    #[test]
    fn prefixed_lookup_shortens_inline_prefix() {
        let mut fx = fixture();
        let root = fx.graph.root();
        add_var(&mut fx, root, "a__DOT__b__DOT__sig");
        let scope_node = fx.ast.alloc(
            NodeKind::Const {
                value: ConstKind::False,
            },
            span(),
        );
        let scope = fx.graph.new_ent(scope_node, root, Some(root));
        fx.graph.ent_mut(scope).prefix = "a__DOT__b__DOT__c__DOT__".to_string();
        let sig = fx.interner.intern("sig");
        let hit = fx.graph.find_prefixed(scope, sig, &fx.interner, true);
        assert!(hit.is_some());
    }
}
