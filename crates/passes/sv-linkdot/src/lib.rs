//! Hierarchical reference linking
//!
//! The name-resolution stage of the elaboration pipeline: takes a tree in
//! which instances and declarations exist but dotted references (`a.b.c`,
//! `pkg::X`, `super.f()`, interface and modport access) are placeholder
//! nodes, and rewrites every one into a bound reference.
//!
//! Linking runs four times, interleaved with the external elaboration
//! stages: [`link_primary`] on the parsed tree, [`link_paramed`] after
//! parameter elaboration, [`link_arrayed`] after instance arrays are
//! concrete, and [`link_scoped`] after flattening. Each run builds its
//! symbol graph from scratch; nothing is shared between runs except the
//! tree itself.

pub mod error;
mod find;
mod iface;
mod param;
mod resolve;
mod scope;
pub mod state;
pub mod symtab;

use sv_ast::Ast;
use sv_intern::Interner;

pub use error::{DiagKind, Diagnostic, Diagnostics, Severity};
pub use state::{LinkPhase, LinkState};
pub use symtab::{SymEnt, SymGraph, SymId};

/// Externally-configured knobs
#[derive(Debug, Clone, Default)]
pub struct LinkOptions {
    /// `default_nettype none` is in effect: an undeclared identifier is an
    /// error instead of an implicit one-bit net warning
    pub default_nettype_none: bool,
}

/// First linking round, over the freshly parsed tree
pub fn link_primary(ast: &mut Ast, interner: &Interner) -> Diagnostics {
    link_phase(ast, interner, LinkPhase::Primary, &LinkOptions::default())
}

/// After parameter elaboration
pub fn link_paramed(ast: &mut Ast, interner: &Interner) -> Diagnostics {
    link_phase(ast, interner, LinkPhase::Paramed, &LinkOptions::default())
}

/// After instance-array elaboration
pub fn link_arrayed(ast: &mut Ast, interner: &Interner) -> Diagnostics {
    link_phase(ast, interner, LinkPhase::Arrayed, &LinkOptions::default())
}

/// Final round, over the flattened scope tree
pub fn link_scoped(ast: &mut Ast, interner: &Interner) -> Diagnostics {
    link_phase(ast, interner, LinkPhase::Scoped, &LinkOptions::default())
}

/// One linking round: build the symbol graph, run the phase's passes,
/// close the scope aliases, then resolve every reference (with one
/// deferred-retry traversal for modules that parked work)
pub fn link_phase(
    ast: &mut Ast,
    interner: &Interner,
    phase: LinkPhase,
    options: &LinkOptions,
) -> Diagnostics {
    let mut diags = Diagnostics::new();
    let root = ast.root();
    let mut state = LinkState::new(phase, root);

    find::run(ast, &mut state, interner, &mut diags);
    if !phase.is_scoped() {
        iface::run(ast, &mut state, interner, &mut diags);
    }
    if phase.pre_array() {
        param::run(ast, &mut state, interner, &mut diags);
    }
    if phase.is_scoped() {
        scope::run(ast, &mut state, interner, &mut diags);
    }
    state.compute_scope_aliases(ast);
    resolve::run(ast, &mut state, interner, &mut diags, options);

    // Consumed nodes tombstone only between passes, never mid-traversal
    ast.sweep();
    diags
}

/// Symbol graph listing after the find pass of `phase`, for debugging and
/// snapshot tests
pub fn symbol_dump(ast: &mut Ast, interner: &Interner, phase: LinkPhase) -> String {
    let mut diags = Diagnostics::new();
    let root = ast.root();
    let mut state = LinkState::new(phase, root);
    find::run(ast, &mut state, interner, &mut diags);
    state.dump(ast, interner)
}
