//! Diagnostics for hierarchical reference linking
//!
//! Linking never aborts on a user error: the offending reference is replaced
//! by a safe placeholder and traversal continues, so one run reports every
//! independent error in a design. Diagnostics accumulate in [`Diagnostics`]
//! and are returned to the caller at the end of each phase.

use sv_intern::{Interner, Symbol};
use sv_span::FileSpan;

/// What went wrong; the message text carries the names involved
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiagKind {
    /// Same name declared twice in one scope, no exemption applies
    #[error("duplicate declaration of '{name}': {kind}")]
    DuplicateDeclaration { name: String, kind: String },

    /// Same name declared twice with different declaration kinds
    #[error("'{name}' is already declared as a {prev_kind}, now a {kind}")]
    SameNameDifferentKind {
        name: String,
        prev_kind: String,
        kind: String,
    },

    /// Declaration hides one in an enclosing scope (warning)
    #[error("declaration of '{name}' hides declaration in upper scope")]
    ShadowedDeclaration { name: String },

    #[error("cannot find scope '{path}'{suggestion}")]
    UnresolvedScope { path: String, suggestion: String },

    #[error("cannot find variable '{path}'{suggestion}")]
    UnresolvedVariable { path: String, suggestion: String },

    #[error("cannot find {what} '{path}'{suggestion}")]
    UnresolvedFunction {
        what: &'static str,
        path: String,
        suggestion: String,
    },

    #[error("cannot find type '{path}'{suggestion}")]
    UnresolvedType { path: String, suggestion: String },

    #[error("modport '{name}' not found under interface '{iface}'{suggestion}")]
    UnresolvedModport {
        name: String,
        iface: String,
        suggestion: String,
    },

    #[error("cannot find interface for '{name}'")]
    UnresolvedInterface { name: String },

    #[error("port '{name}' not found in module")]
    PortNotFound { name: String },

    /// Port declaration names a var that is not an I/O
    #[error("'{name}' is not an input/output/inout/interface port")]
    PortNotIo { name: String },

    #[error("duplicate port declaration for '{name}'")]
    DuplicatePort { name: String },

    #[error("pin '{name}' not found in module '{module}'{suggestion}")]
    PinNotFound {
        name: String,
        module: String,
        suggestion: String,
    },

    #[error("duplicate pin connection '{name}'")]
    DuplicatePin { name: String },

    #[error("defparam target instance '{path}' not found")]
    DefparamTargetMissing { path: String },

    /// `defparam` still works but the named-parameter form replaces it
    #[error("defparam is deprecated; use #(.{name}(...)) instead")]
    DeprecatedDefparam { name: String },

    /// Implicit one-bit net was synthesized (warning unless configured off)
    #[error("implicit declaration of net '{name}'")]
    ImplicitCreated { name: String },

    /// Undeclared identifier in a `default_nettype none` region
    #[error("'{name}' is undeclared and implicit nets are disabled")]
    ImplicitDisabled { name: String },

    #[error("'{name}' is used before its declaration")]
    UseBeforeDeclaration { name: String },

    #[error("disable target '{name}' is not a task or block")]
    BadDisableTarget { name: String },

    #[error("'{name}' cannot follow a dot: {kind}")]
    NotExpectingDot { name: String, kind: String },

    #[error("unsupported: {what}")]
    Unsupported { what: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagKind,
    pub span: FileSpan,
}

/// Collected diagnostics for one linking phase
#[derive(Debug, Default)]
pub struct Diagnostics {
    diags: Vec<Diagnostic>,
    suppressed: Vec<std::mem::Discriminant<DiagKind>>,
    /// Symbol-graph dump captured when the first error arrived
    first_error_dump: Option<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, kind: DiagKind, span: FileSpan) {
        self.push(Severity::Error, kind, span);
    }

    pub fn warning(&mut self, kind: DiagKind, span: FileSpan) {
        self.push(Severity::Warning, kind, span);
    }

    fn push(&mut self, severity: Severity, kind: DiagKind, span: FileSpan) {
        if self.suppressed.contains(&std::mem::discriminant(&kind)) {
            return;
        }
        self.diags.push(Diagnostic {
            severity,
            kind,
            span,
        });
    }

    /// Drop all future diagnostics of the same kind as `kind`
    pub fn suppress(&mut self, kind: &DiagKind) {
        self.suppressed.push(std::mem::discriminant(kind));
    }

    pub fn has_errors(&self) -> bool {
        self.diags
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diags.iter()
    }

    pub fn len(&self) -> usize {
        self.diags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diags.is_empty()
    }

    /// Snapshot the symbol graph the first time an error is recorded.
    /// `dump` is only invoked if no error was seen yet.
    pub fn dump_on_first_error(&mut self, dump: impl FnOnce() -> String) {
        if self.first_error_dump.is_none() && self.has_errors() {
            self.first_error_dump = Some(dump());
        }
    }

    pub fn first_error_dump(&self) -> Option<&str> {
        self.first_error_dump.as_deref()
    }
}

/// Render a "did you mean" suffix from a candidate set, or an empty string
/// when nothing is close enough
pub fn suggestion_text(target: &str, candidates: &[Symbol], interner: &Interner) -> String {
    let mut scored: Vec<(String, usize)> = candidates
        .iter()
        .map(|cand| {
            let text = interner.resolve(cand);
            let distance = levenshtein_distance(target, &text);
            (text, distance)
        })
        .filter(|(_, distance)| *distance <= 3)
        .collect();
    scored.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    match scored.first() {
        Some((best, _)) => format!("; did you mean '{best}'?"),
        None => String::new(),
    }
}

fn levenshtein_distance(source: &str, target: &str) -> usize {
    let source_len = source.chars().count();
    let target_len = target.chars().count();

    if source_len == 0 {
        return target_len;
    }
    if target_len == 0 {
        return source_len;
    }

    let mut matrix = vec![vec![0; target_len + 1]; source_len + 1];
    for (idx, row) in matrix.iter_mut().enumerate() {
        row[0] = idx;
    }
    for jdx in 0..=target_len {
        matrix[0][jdx] = jdx;
    }

    for (idx, source_char) in source.chars().enumerate() {
        for (jdx, target_char) in target.chars().enumerate() {
            let cost = usize::from(source_char != target_char);
            matrix[idx + 1][jdx + 1] = (matrix[idx][jdx + 1] + 1)
                .min(matrix[idx + 1][jdx] + 1)
                .min(matrix[idx][jdx] + cost);
        }
    }

    matrix[source_len][target_len]
}
