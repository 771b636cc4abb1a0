//! Interface discovery
//!
//! Runs in the primary phase, after the find pass. Promotes unresolved type
//! references that name a declared interface into interface references,
//! queues every interface-typed variable for alias computation, and gives
//! each discovered interface its self-contained modport resolution visit.
//! Alias computation itself happens afterwards so the full cell hierarchy
//! exists first.

use sv_ast::{Ast, NodeId, NodeKind};
use sv_intern::{Interner, Symbol};

use crate::error::{DiagKind, Diagnostics, suggestion_text};
use crate::state::{AliasKind, LinkState};
use crate::symtab::SymId;

pub(crate) fn run(
    ast: &mut Ast,
    state: &mut LinkState,
    interner: &Interner,
    diags: &mut Diagnostics,
) {
    promote_iface_types(ast, state);
    let iface_defs = std::mem::take(&mut state.iface_defs);
    for (scope, iface) in iface_defs {
        visit_modports(ast, state, interner, diags, scope, iface);
    }
    compute_iface_var_syms(ast, state, interner, diags);
}

/// `ifc v;` parses as a reference to a type named `ifc`; when no local
/// symbol hides the name and an interface of that name exists, the type
/// becomes an interface reference and the var is queued for aliasing
fn promote_iface_types(ast: &mut Ast, state: &mut LinkState) {
    let vars = collect_vars(ast);
    for var in vars {
        let Some(var_ent) = state.node_sym(var) else {
            continue;
        };
        let NodeKind::Var { dtype: Some(dtype), .. } = *ast.kind(var) else {
            continue;
        };
        let Some(leaf) = leaf_dtype(ast, dtype) else {
            continue;
        };
        if let NodeKind::RefDType { name, typedef: None, class_or_pkg: None, .. } =
            *ast.kind(leaf)
        {
            if hidden_by_local(state, ast, var_ent, var, name) {
                continue;
            }
            let Some(target) = state.find_module_name(name) else {
                continue;
            };
            if !matches!(ast.kind(target), NodeKind::Iface { .. }) {
                continue;
            }
            ast.replace(
                leaf,
                NodeKind::IfaceRefDType {
                    iface_name: name,
                    modport_name: None,
                    iface: Some(target),
                    cell: None,
                    modport: None,
                },
            );
        }
        if ast.iface_ref_from_dtype(dtype).is_some() {
            if let NodeKind::Var { is_iface_ref, .. } = ast.kind_mut(var) {
                *is_iface_ref = true;
            }
            state.iface_vars.push((var_ent, var));
        }
    }
}

/// A local symbol of the same name wins over the interface, unless it is
/// the declaring var itself (`ifc ifc;` still resolves)
fn hidden_by_local(
    state: &LinkState,
    ast: &Ast,
    var_ent: SymId,
    var: NodeId,
    name: Symbol,
) -> bool {
    let Some(scope) = state.graph.ent(var_ent).parent else {
        return false;
    };
    match state.graph.find_fallback(scope, name) {
        Some(found) => {
            let found_node = state.graph.node(found);
            found_node != var && !matches!(ast.kind(found_node), NodeKind::Iface { .. })
        }
        None => false,
    }
}

/// Resolve one interface's modports against its own scope
fn visit_modports(
    ast: &mut Ast,
    state: &mut LinkState,
    interner: &Interner,
    diags: &mut Diagnostics,
    iface_scope: SymId,
    iface: NodeId,
) {
    let NodeKind::Iface { stmts, .. } = ast.kind(iface) else {
        panic!("modport visit on a non-interface node");
    };
    let modports: Vec<NodeId> = stmts
        .iter()
        .copied()
        .filter(|&s| matches!(ast.kind(s), NodeKind::Modport { .. }))
        .collect();
    for modport in modports {
        let span = ast.span(modport);
        let NodeKind::Modport { name, items } = ast.kind(modport).clone() else {
            unreachable!();
        };
        let modport_ent = state.graph.new_ent(modport, iface_scope, Some(iface_scope));
        state
            .graph
            .insert(iface_scope, name, modport_ent, ast, interner, diags, span);
        state.set_node_sym(modport, modport_ent);
        for item in items {
            visit_modport_item(ast, state, interner, diags, iface_scope, modport_ent, item);
        }
    }
}

fn visit_modport_item(
    ast: &mut Ast,
    state: &mut LinkState,
    interner: &Interner,
    diags: &mut Diagnostics,
    iface_scope: SymId,
    modport_ent: SymId,
    item: NodeId,
) {
    let span = ast.span(item);
    match ast.kind(item).clone() {
        NodeKind::ModportFTaskRef { name, .. } => {
            match state.graph.find_fallback(iface_scope, name) {
                Some(found)
                    if matches!(ast.kind(state.graph.node(found)), NodeKind::FTask { .. }) =>
                {
                    let ftask_node = state.graph.node(found);
                    if let NodeKind::ModportFTaskRef { ftask, .. } = ast.kind_mut(item) {
                        *ftask = Some(ftask_node);
                    }
                    let sub = state.graph.new_ent(ftask_node, modport_ent, Some(modport_ent));
                    state.graph.reinsert(modport_ent, name, sub);
                    state.add_scope_alias(AliasKind::Modport, sub, found);
                }
                Some(_) => diags.error(
                    DiagKind::UnresolvedFunction {
                        what: "modport task/function",
                        path: interner.resolve(&name),
                        suggestion: String::new(),
                    },
                    span,
                ),
                None => {
                    let cands = state
                        .graph
                        .candidates(iface_scope, ast, |k| matches!(k, NodeKind::FTask { .. }));
                    diags.error(
                        DiagKind::UnresolvedFunction {
                            what: "modport task/function",
                            path: interner.resolve(&name),
                            suggestion: suggestion_text(&interner.resolve(&name), &cands, interner),
                        },
                        span,
                    );
                }
            }
        }
        NodeKind::ModportVarRef { name, .. } => {
            match state.graph.find_fallback(iface_scope, name) {
                Some(found)
                    if matches!(ast.kind(state.graph.node(found)), NodeKind::Var { .. }) =>
                {
                    let var_node = state.graph.node(found);
                    if let NodeKind::ModportVarRef { var, .. } = ast.kind_mut(item) {
                        *var = Some(var_node);
                    }
                    state.graph.reinsert(modport_ent, name, found);
                }
                _ => {
                    let cands = state
                        .graph
                        .candidates(iface_scope, ast, |k| matches!(k, NodeKind::Var { .. }));
                    diags.error(
                        DiagKind::UnresolvedVariable {
                            path: interner.resolve(&name),
                            suggestion: suggestion_text(&interner.resolve(&name), &cands, interner),
                        },
                        span,
                    );
                }
            }
        }
        _ => {}
    }
}

/// For each interface-typed var, find the interface (or modport) scope it
/// stands for and record the interface-top alias that later merges the
/// interface's bindings into the var's entry
fn compute_iface_var_syms(
    ast: &mut Ast,
    state: &mut LinkState,
    interner: &Interner,
    diags: &mut Diagnostics,
) {
    let queued = std::mem::take(&mut state.iface_vars);
    for (var_ent, var) in queued {
        let span = ast.span(var);
        let NodeKind::Var { name, dtype: Some(dtype), .. } = *ast.kind(var) else {
            continue;
        };
        let Some(ifref) = ast.iface_ref_from_dtype(dtype) else {
            continue;
        };
        let NodeKind::IfaceRefDType { iface, cell, modport_name, .. } = *ast.kind(ifref) else {
            continue;
        };
        // An instantiated interface resolves through its cell; a virtual
        // or port-bound one through the interface definition
        let target_node = cell.or(iface);
        let Some(target_ent) = target_node.and_then(|n| state.node_sym(n)) else {
            diags.error(
                DiagKind::UnresolvedInterface {
                    name: interner.resolve(&name),
                },
                span,
            );
            continue;
        };
        let alias_target = match modport_name {
            Some(mp_name) => match state.graph.find_fallback(target_ent, mp_name) {
                Some(found)
                    if matches!(ast.kind(state.graph.node(found)), NodeKind::Modport { .. }) =>
                {
                    let mp_node = state.graph.node(found);
                    if let NodeKind::IfaceRefDType { modport, .. } = ast.kind_mut(ifref) {
                        *modport = Some(mp_node);
                    }
                    found
                }
                _ => {
                    let cands = state
                        .graph
                        .candidates(target_ent, ast, |k| matches!(k, NodeKind::Modport { .. }));
                    let iface_text = iface
                        .and_then(|i| ast.kind(i).name())
                        .map_or_else(String::new, |s| interner.resolve(&s));
                    diags.error(
                        DiagKind::UnresolvedModport {
                            name: interner.resolve(&mp_name),
                            iface: iface_text,
                            suggestion: suggestion_text(
                                &interner.resolve(&mp_name),
                                &cands,
                                interner,
                            ),
                        },
                        span,
                    );
                    continue;
                }
            },
            None => target_ent,
        };
        state.add_scope_alias(AliasKind::IfaceTop, var_ent, alias_target);
    }
}

fn leaf_dtype(ast: &Ast, mut dtype: NodeId) -> Option<NodeId> {
    loop {
        match ast.kind(dtype) {
            NodeKind::ArrayDType { elem } => dtype = *elem,
            NodeKind::RefDType { .. } | NodeKind::IfaceRefDType { .. } => return Some(dtype),
            _ => return None,
        }
    }
}

/// All vars in the design, by walking every statement list once
fn collect_vars(ast: &Ast) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut seen = rustc_hash::FxHashSet::default();
    let mut stack = vec![ast.root()];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        match ast.kind(id) {
            NodeKind::Var { .. } => out.push(id),
            NodeKind::Netlist { modules } => stack.extend(modules.iter().copied()),
            NodeKind::Cell { module, .. } => {
                if let Some(module) = module {
                    stack.push(*module);
                }
            }
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
            _ => {}
        }
    }
    out
}
