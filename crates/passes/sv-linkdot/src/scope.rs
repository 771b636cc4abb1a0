//! Scope pass, final phase only
//!
//! Flattening has replaced the instance tree with `Scope` nodes carrying
//! elaborated dotted names (`top.s`). This pass rebuilds a flat symbol
//! table keyed by those names, re-inserts every non-local variable, and
//! records the two alias kinds the inliner produced: direct var-to-var
//! equivalences and interface/modport scope equivalences.

use sv_ast::{Ast, NodeId, NodeKind};
use sv_intern::Interner;

use crate::error::{DiagKind, Diagnostics};
use crate::state::{AliasKind, LinkState};
use crate::symtab::SymId;

pub(crate) fn run(
    ast: &mut Ast,
    state: &mut LinkState,
    interner: &Interner,
    diags: &mut Diagnostics,
) {
    let mut scopes = collect_scopes(ast, interner);
    // Parents first: "top" before "top.s" before "top.s.u"
    scopes.sort_by_key(|&(_, depth)| depth);
    for (scope_node, _) in scopes {
        visit_scope(ast, state, interner, diags, scope_node);
    }
}

fn collect_scopes(ast: &Ast, interner: &Interner) -> Vec<(NodeId, usize)> {
    let root = ast.root();
    let NodeKind::Netlist { modules } = ast.kind(root) else {
        panic!("tree root is not a netlist");
    };
    let mut out = Vec::new();
    for &module in modules {
        let stmts = match ast.kind(module) {
            NodeKind::Module { stmts, .. }
            | NodeKind::Package { stmts, .. }
            | NodeKind::Iface { stmts, .. } => stmts,
            _ => continue,
        };
        for &stmt in stmts {
            if let NodeKind::Scope { name, .. } = ast.kind(stmt) {
                let depth = interner.resolve(name).matches('.').count();
                out.push((stmt, depth));
            }
        }
    }
    out
}

fn visit_scope(
    ast: &mut Ast,
    state: &mut LinkState,
    interner: &Interner,
    diags: &mut Diagnostics,
    scope_node: NodeId,
) {
    let NodeKind::Scope { name, stmts, .. } = ast.kind(scope_node).clone() else {
        unreachable!();
    };
    let full = interner.resolve(&name);
    let (parent_ent, leaf) = match full.rsplit_once('.') {
        Some((parent_name, leaf)) => {
            let parent_sym = interner.intern(parent_name);
            let parent = state
                .find_scope_name(parent_sym)
                .unwrap_or_else(|| state.graph.root());
            (parent, interner.intern(leaf))
        }
        None => (state.graph.root(), name),
    };
    let ent = state.graph.new_ent(scope_node, parent_ent, Some(parent_ent));
    state.graph.reinsert(parent_ent, leaf, ent);
    state.insert_scope_name(name, ent);
    state.set_node_sym(scope_node, ent);

    for stmt in stmts {
        visit_scope_stmt(ast, state, interner, diags, ent, stmt);
    }
}

fn visit_scope_stmt(
    ast: &mut Ast,
    state: &mut LinkState,
    interner: &Interner,
    diags: &mut Diagnostics,
    scope_ent: SymId,
    stmt: NodeId,
) {
    let span = ast.span(stmt);
    match ast.kind(stmt).clone() {
        NodeKind::VarScope { var } => {
            let NodeKind::Var { name, is_func_local, is_iface_ref, .. } = *ast.kind(var) else {
                panic!("var-scope does not wrap a var");
            };
            if is_func_local {
                return;
            }
            let ent = state.graph.new_ent(stmt, scope_ent, Some(scope_ent));
            state.graph.reinsert(scope_ent, name, ent);
            state.set_node_sym(stmt, ent);
            if is_iface_ref {
                record_iface_alias(ast, state, interner, diags, scope_ent, ent, var);
            }
        }
        NodeKind::FTask { name, .. }
        | NodeKind::Begin { name: Some(name), .. }
        | NodeKind::Foreach { name: Some(name), .. }
        | NodeKind::With { name: Some(name), .. } => {
            let ent = state.graph.new_ent(stmt, scope_ent, Some(scope_ent));
            state.graph.reinsert(scope_ent, name, ent);
            state.set_node_sym(stmt, ent);
            let stmts = match ast.kind(stmt) {
                NodeKind::FTask { stmts, .. }
                | NodeKind::Begin { stmts, .. }
                | NodeKind::Foreach { stmts, .. }
                | NodeKind::With { stmts, .. } => stmts.clone(),
                _ => unreachable!(),
            };
            for inner in stmts {
                visit_scope_stmt(ast, state, interner, diags, ent, inner);
            }
        }
        NodeKind::Var { name, .. } => {
            // Task/function locals re-listed under their block
            let ent = state.graph.new_ent(stmt, scope_ent, Some(scope_ent));
            state.graph.reinsert(scope_ent, name, ent);
            state.set_node_sym(stmt, ent);
        }
        NodeKind::AssignAlias { lhs, rhs } => {
            ast.add_var_alias(lhs, rhs);
        }
        NodeKind::AssignVarScope { lhs, rhs } => {
            let lhs_ent = lookup_side(ast, state, interner, scope_ent, lhs, false);
            let rhs_ent = lookup_side(ast, state, interner, scope_ent, rhs, true);
            match (lhs_ent, rhs_ent) {
                (Some(from), Some(to)) => {
                    state.add_scope_alias(AliasKind::IfaceTop, from, to);
                }
                _ => diags.error(
                    DiagKind::UnresolvedScope {
                        path: side_text(ast, interner, lhs),
                        suggestion: String::new(),
                    },
                    span,
                ),
            }
            ast.defer_delete(stmt);
        }
        _ => {}
    }
}

/// An interface-typed var in a flattened scope aliases to the interface
/// cell (or modport) it was connected to, found by dotted lookup of the
/// cell name the type recorded
fn record_iface_alias(
    ast: &Ast,
    state: &mut LinkState,
    interner: &Interner,
    diags: &mut Diagnostics,
    scope_ent: SymId,
    var_scope_ent: SymId,
    var: NodeId,
) {
    let span = ast.span(var);
    let NodeKind::Var { name, dtype: Some(dtype), .. } = *ast.kind(var) else {
        return;
    };
    let Some(ifref) = ast.iface_ref_from_dtype(dtype) else {
        return;
    };
    let NodeKind::IfaceRefDType { iface_name, modport_name, cell, .. } = *ast.kind(ifref) else {
        return;
    };
    let cell_text = match cell.and_then(|c| ast.kind(c).name()) {
        Some(cell_name) => interner.resolve(&cell_name),
        None => interner.resolve(&iface_name),
    };
    let Ok(mut target) = crate::resolve::find_dotted(&state.graph, interner, scope_ent, &cell_text)
    else {
        diags.error(
            DiagKind::UnresolvedInterface {
                name: interner.resolve(&name),
            },
            span,
        );
        return;
    };
    if let Some(mp_name) = modport_name {
        if let Some(mp) = state.graph.find_fallback(target, mp_name) {
            target = mp;
        }
    }
    state.add_scope_alias(AliasKind::IfaceTop, var_scope_ent, target);
}

fn lookup_side(
    ast: &Ast,
    state: &LinkState,
    interner: &Interner,
    scope_ent: SymId,
    side: NodeId,
    prefixed_retry: bool,
) -> Option<SymId> {
    let text = side_text(ast, interner, side);
    match crate::resolve::find_dotted(&state.graph, interner, scope_ent, &text) {
        Ok(ent) => Some(ent),
        Err(_) if prefixed_retry => {
            let sym = interner.intern(&text);
            state.graph.find_prefixed(scope_ent, sym, interner, true)
        }
        Err(_) => None,
    }
}

fn side_text(ast: &Ast, interner: &Interner, side: NodeId) -> String {
    match ast.kind(side) {
        NodeKind::ParseRef { name } | NodeKind::VarRef { name, .. } => interner.resolve(name),
        NodeKind::VarXRef { dotted, name, .. } => {
            let name = interner.resolve(name);
            if dotted.is_empty() {
                name
            } else {
                format!("{dotted}.{name}")
            }
        }
        _ => String::new(),
    }
}
