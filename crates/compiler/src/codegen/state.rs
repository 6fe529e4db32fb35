//! CodeGen state and core types
//!
//! The code generator owns two op streams: the main (entry-point) stream
//! and, through the context stack, one stream per procedure. `emit`
//! appends to the innermost procedure currently being compiled, falling
//! back to the main stream.

use super::contexts::{Contexts, Procedure, ProcedureInfo};
use crate::ast::ValueKind;

/// What evaluating an expression produced: its kind, plus the procedure
/// behind it when the expression denotes a function value (a literal or a
/// name resolving to an alias). Assignment uses the info to register the
/// alias under the new name.
pub struct ExpValue {
    pub kind: ValueKind,
    pub proc: Option<ProcedureInfo>,
}

impl ExpValue {
    pub fn plain(kind: ValueKind) -> Self {
        ExpValue { kind, proc: None }
    }
}

pub struct CodeGen {
    pub(super) contexts: Contexts,
    /// Runtime stack depth in slots. Every emitted push-like instruction
    /// increments it, every pop-like instruction decrements it.
    pub(super) depth: usize,
    pub(super) label_counter: usize,
    pub(super) main: Vec<String>,
    /// Procedures whose frames have been popped, in completion order;
    /// sorted by creation index at emission time.
    pub(super) finished: Vec<Procedure>,
}

impl CodeGen {
    pub fn new() -> Self {
        CodeGen {
            contexts: Contexts::new(),
            depth: 0,
            label_counter: 0,
            main: Vec::new(),
            finished: Vec::new(),
        }
    }

    /// Append one instruction to the stream of the procedure being
    /// compiled, or to the main stream outside any procedure.
    pub(super) fn emit(&mut self, op: impl Into<String>) {
        let op = op.into();
        match self.contexts.top_procedure_mut() {
            Some(procedure) => procedure.ops.push(op),
            None => self.main.push(op),
        }
    }

    pub(super) fn fresh_end_label(&mut self) -> String {
        self.label_counter += 1;
        format!(".Lend_{}", self.label_counter)
    }
}

impl Default for CodeGen {
    fn default() -> Self {
        Self::new()
    }
}
