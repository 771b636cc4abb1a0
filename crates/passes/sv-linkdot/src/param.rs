//! Parameter and pin pass
//!
//! Pre-array phases only. Matches port declarations to their I/O vars,
//! rewrites `defparam` into named parameter pins on the target instance,
//! retires forward typedefs, and computes the implicit-net candidate set
//! from pin and continuous-assign expressions.

use sv_ast::{Ast, NodeId, NodeKind};
use sv_intern::{Interner, Symbol};
use sv_span::FileSpan;

use crate::error::{DiagKind, Diagnostics};
use crate::state::LinkState;
use crate::symtab::SymId;

pub(crate) fn run(
    ast: &mut Ast,
    state: &mut LinkState,
    interner: &Interner,
    diags: &mut Diagnostics,
) {
    mark_dead_modules(ast, state);
    let root = ast.root();
    let NodeKind::Netlist { modules } = ast.kind(root) else {
        panic!("tree root is not a netlist");
    };
    // Each module is handled once, against the scope of its last find-pass
    // visit; a shared body resolves identically under any of its cells
    for module in modules.clone() {
        if let NodeKind::Module { dead: true, .. } = ast.kind(module) {
            continue;
        }
        let Some(scope) = state.node_sym(module) else {
            continue;
        };
        walk_stmts(ast, state, interner, diags, module, scope);
    }
}

/// A module the find pass never reached through any live cell is dead;
/// later passes skip its body
fn mark_dead_modules(ast: &mut Ast, state: &LinkState) {
    let root = ast.root();
    let NodeKind::Netlist { modules } = ast.kind(root) else {
        return;
    };
    for module in modules.clone() {
        if let NodeKind::Module { level, .. } = *ast.kind(module) {
            if level > 2 && state.node_sym(module).is_none() {
                if let NodeKind::Module { dead, .. } = ast.kind_mut(module) {
                    *dead = true;
                }
            }
        }
    }
}

fn walk_stmts(
    ast: &mut Ast,
    state: &mut LinkState,
    interner: &Interner,
    diags: &mut Diagnostics,
    module: NodeId,
    module_scope: SymId,
) {
    let mut stack = vec![module];
    let mut seen = rustc_hash::FxHashSet::default();
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        let span = ast.span(id);
        match ast.kind(id).clone() {
            NodeKind::Port { name, pin_num } => {
                visit_port(ast, state, interner, diags, module_scope, id, name, pin_num, span);
            }
            NodeKind::Defparam { path, name, rhs } => {
                visit_defparam(
                    ast, state, interner, diags, module_scope, id, path, name, rhs, span,
                );
            }
            NodeKind::TypedefFwd { name } => {
                visit_typedef_fwd(ast, state, module_scope, id, name);
            }
            NodeKind::Cell { pins, params, .. } => {
                for pin in pins.iter().chain(params.iter()) {
                    if let NodeKind::Pin { expr: Some(expr), .. } = ast.kind(*pin) {
                        mark_implicit_candidates(ast, state, module, *expr);
                    }
                }
            }
            NodeKind::AssignW { lhs, .. } => {
                mark_implicit_candidates(ast, state, module, lhs);
            }
            NodeKind::Module { stmts, .. }
            | NodeKind::Package { stmts, .. }
            | NodeKind::Iface { stmts, .. }
            | NodeKind::Class { stmts, .. }
            | NodeKind::Begin { stmts, .. }
            | NodeKind::FTask { stmts, .. }
            | NodeKind::Constraint { stmts, .. }
            | NodeKind::Foreach { stmts, .. }
            | NodeKind::With { stmts, .. } => stack.extend(stmts),
            _ => {}
        }
    }
}

/// Port declarations carry only a name and position; the real I/O var
/// lives in the module body. Bind the two, then the port node is spent.
#[expect(clippy::too_many_arguments, reason = "plain visitor plumbing")]
fn visit_port(
    ast: &mut Ast,
    state: &mut LinkState,
    interner: &Interner,
    diags: &mut Diagnostics,
    module_scope: SymId,
    port: NodeId,
    name: Symbol,
    pin_num: u32,
    span: FileSpan,
) {
    let Some(found) = state.graph.find_flat(module_scope, name) else {
        diags.error(
            DiagKind::PortNotFound {
                name: interner.resolve(&name),
            },
            span,
        );
        ast.defer_delete(port);
        return;
    };
    let var_node = state.graph.node(found);
    let NodeKind::Var { is_io, is_iface_ref, port_set, .. } = *ast.kind(var_node) else {
        diags.error(
            DiagKind::PortNotIo {
                name: interner.resolve(&name),
            },
            span,
        );
        ast.defer_delete(port);
        return;
    };
    if !is_io && !is_iface_ref {
        diags.error(
            DiagKind::PortNotIo {
                name: interner.resolve(&name),
            },
            span,
        );
    } else if port_set {
        diags.error(
            DiagKind::DuplicatePort {
                name: interner.resolve(&name),
            },
            span,
        );
    } else {
        if let NodeKind::Var { pin_num: var_pin, port_set, .. } = ast.kind_mut(var_node) {
            *var_pin = pin_num;
            *port_set = true;
        }
        // Bookkeeping entry for positional connection; hidden from imports
        let pin_name = interner.intern(&format!("__pinNumber{pin_num}"));
        let pin_ent = state.graph.new_ent(var_node, module_scope, Some(module_scope));
        state.graph.ent_mut(pin_ent).exported = false;
        state.graph.reinsert(module_scope, pin_name, pin_ent);
    }
    ast.defer_delete(port);
}

/// `defparam path.of.instance.NAME = rhs` becomes a named parameter pin on
/// the instance; value checking is someone else's job
#[expect(clippy::too_many_arguments, reason = "plain visitor plumbing")]
fn visit_defparam(
    ast: &mut Ast,
    state: &mut LinkState,
    interner: &Interner,
    diags: &mut Diagnostics,
    module_scope: SymId,
    defparam: NodeId,
    path: Symbol,
    name: Symbol,
    rhs: NodeId,
    span: FileSpan,
) {
    diags.warning(
        DiagKind::DeprecatedDefparam {
            name: interner.resolve(&name),
        },
        span,
    );
    let path_text = interner.resolve(&path);
    let cell_ent =
        match crate::resolve::find_dotted(&state.graph, interner, module_scope, &path_text) {
            Ok(ent) if matches!(ast.kind(state.graph.node(ent)), NodeKind::Cell { .. }) => ent,
            _ => {
                diags.error(DiagKind::DefparamTargetMissing { path: path_text }, span);
                ast.defer_delete(defparam);
                return;
            }
        };
    let cell_node = state.graph.node(cell_ent);
    let pin = ast.alloc(
        NodeKind::Pin {
            name,
            pin_num: 0,
            expr: Some(rhs),
            param: true,
            mod_var: None,
        },
        span,
    );
    if let NodeKind::Cell { params, .. } = ast.kind_mut(cell_node) {
        params.push(pin);
    }
    ast.defer_delete(defparam);
}

/// The forward declaration did its parsing job; fold its position into the
/// real typedef so later uses pass the use-before-declaration check
fn visit_typedef_fwd(
    ast: &mut Ast,
    state: &mut LinkState,
    module_scope: SymId,
    fwd: NodeId,
    name: Symbol,
) {
    if let Some(found) = state.graph.find_fallback(module_scope, name) {
        let found_node = state.graph.node(found);
        if found_node != fwd {
            if let NodeKind::Typedef { decl_token, .. } = ast.kind_mut(found_node) {
                *decl_token = 0;
            }
        }
    }
    ast.defer_delete(fwd);
}

/// Only a bare identifier may become an implicit net. Dotted access never
/// qualifies; operators recurse so `{a, b}` and `a[0]` targets are found.
fn mark_implicit_candidates(ast: &Ast, state: &mut LinkState, module: NodeId, expr: NodeId) {
    match ast.kind(expr) {
        NodeKind::ParseRef { name } | NodeKind::VarRef { name, .. } => {
            state.allow_implicit(module, *name);
        }
        NodeKind::Dot { .. } => {}
        _ => {
            for child in ast.expr_children(expr) {
                mark_implicit_candidates(ast, state, module, child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_target_is_not_an_implicit_candidate() {
        let mut ast = Ast::new();
        let interner = Interner::new();
        let root = ast.alloc(NodeKind::Netlist { modules: vec![] }, FileSpan::synthesized());
        ast.set_root(root);
        let module = ast.alloc(
            NodeKind::Module {
                name: interner.intern("m"),
                stmts: vec![],
                level: 1,
                dead: false,
            },
            FileSpan::synthesized(),
        );
        let a = ast.alloc(
            NodeKind::ParseRef {
                name: interner.intern("a"),
            },
            FileSpan::synthesized(),
        );
        let b = ast.alloc(
            NodeKind::ParseRef {
                name: interner.intern("b"),
            },
            FileSpan::synthesized(),
        );
        let dotted = ast.alloc(
            NodeKind::Dot {
                lhs: a,
                rhs: b,
                colon: false,
            },
            FileSpan::synthesized(),
        );
        let bare = ast.alloc(
            NodeKind::ParseRef {
                name: interner.intern("y"),
            },
            FileSpan::synthesized(),
        );
        let concat = ast.alloc(
            NodeKind::Concat {
                parts: vec![dotted, bare],
            },
            FileSpan::synthesized(),
        );

        let mut state = LinkState::new(crate::state::LinkPhase::Primary, root);
        mark_implicit_candidates(&ast, &mut state, module, concat);
        assert!(state.implicit_allowed(module, interner.intern("y")));
        assert!(!state.implicit_allowed(module, interner.intern("a")));
        assert!(!state.implicit_allowed(module, interner.intern("b")));
    }
}
