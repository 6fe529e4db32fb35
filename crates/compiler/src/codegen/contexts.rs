//! Lexical scope stack mirroring the runtime stack
//!
//! This is the central service of the code generator. Each [`Frame`] is one
//! lexical scope: a map from names to the stack slot holding their value,
//! the kinds of those bindings, and the procedure aliases visible in the
//! scope. A frame optionally owns the [`Procedure`] whose body it encloses.
//!
//! Slots are identified by *depth*: the value of the emitter's running
//! stack-depth counter at the moment the slot was pushed. A binding's
//! distance from the stack pointer is therefore `(depth - slot) * 8` bytes.
//! Inside a procedure body the comparison against the procedure's initial
//! depth decides whether a binding is a local (`[rsp+diff]`) or a capture
//! reached through the saved base in `rcx` (`[rsp+rcx+diff+8]`; the
//! trailing `+8` skips the return address, which the depth counter models
//! as an anonymous slot).
//!
//! The bottom frame is the global scope and is never popped.

use crate::ast::ValueKind;
use std::collections::BTreeMap;

/// A compiled function literal: its emitted label and operations buffer,
/// plus the depth bookkeeping that classifies bindings as locals or
/// captures.
#[derive(Debug)]
pub struct Procedure {
    /// Creation order; procedures are appended to the final assembly in
    /// this order.
    pub index: usize,
    pub label: String,
    /// Depth right after the capture prelude at the creation site. Slots
    /// at or below this depth are captures.
    pub initial_depth: usize,
    /// Depth at which the body starts: `initial_depth + arity + 1`, the
    /// `+1` being the return address slot.
    pub entry_depth: usize,
    pub arity: usize,
    pub return_kind: ValueKind,
    pub ops: Vec<String>,
}

/// What a call site needs to know about a procedure: resolved through the
/// alias maps rather than the runtime stack.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureInfo {
    pub label: String,
    pub params: Vec<ValueKind>,
    pub return_kind: ValueKind,
    pub entry_depth: usize,
    /// Set once the alias has been cloned across a procedure boundary.
    /// A call site uses it to pick the capture-base setup: own-region
    /// aliases get `mov rcx, depth*8`, transported aliases extend the
    /// current base with `lea`.
    pub captured: bool,
}

/// One lexical scope.
#[derive(Debug)]
pub struct Frame {
    bindings: BTreeMap<String, usize>,
    binding_kinds: BTreeMap<String, ValueKind>,
    aliases: BTreeMap<String, ProcedureInfo>,
    procedure: Option<Procedure>,
    /// Runtime depth when the frame was created; a non-procedure frame
    /// pops back down to this on exit.
    base_depth: usize,
}

impl Frame {
    fn empty(base_depth: usize) -> Self {
        Frame {
            bindings: BTreeMap::new(),
            binding_kinds: BTreeMap::new(),
            aliases: BTreeMap::new(),
            procedure: None,
            base_depth,
        }
    }

    /// Record a binding without emitting anything. Used for procedure
    /// arguments (the caller already pushed the slots) and for list bases.
    pub fn bind(&mut self, name: &str, slot: usize, kind: ValueKind) {
        self.bindings.insert(name.to_string(), slot);
        self.binding_kinds.insert(name.to_string(), kind);
    }

    pub fn set_alias(&mut self, name: &str, info: ProcedureInfo) {
        self.aliases.insert(name.to_string(), info);
    }

    pub fn procedure(&self) -> Option<&Procedure> {
        self.procedure.as_ref()
    }

    pub fn take_procedure(&mut self) -> Option<Procedure> {
        self.procedure.take()
    }
}

/// Result of resolving a name against the innermost frame.
#[derive(Debug)]
pub enum Resolved {
    /// A stack binding, with the address expression valid at the depth
    /// the lookup was made for.
    Slot { kind: ValueKind, address: String },
    /// A procedure alias.
    Procedure(ProcedureInfo),
}

pub struct Contexts {
    stack: Vec<Frame>,
    procedure_counter: usize,
}

impl Contexts {
    pub fn new() -> Self {
        Contexts {
            stack: vec![Frame::empty(0)],
            procedure_counter: 0,
        }
    }

    pub fn push(&mut self, frame: Frame) {
        self.stack.push(frame);
    }

    fn top(&self) -> &Frame {
        self.stack.last().expect("the global frame is never popped")
    }

    fn top_mut(&mut self) -> &mut Frame {
        self.stack
            .last_mut()
            .expect("the global frame is never popped")
    }

    /// Build the frame for a new scope by cloning everything visible in
    /// the current one.
    ///
    /// Every scalar binding is copied onto the runtime stack (`mov rax,
    /// <address>` / `push rax`), giving the new scope its own slots; list
    /// bindings keep their original slot so the aggregate is reached in
    /// its creation frame. With `procedure` set to `(arity, return_kind)`,
    /// a fresh `procN` label is allocated, the post-prelude depth becomes
    /// the procedure's initial depth, and all cloned aliases are marked
    /// captured.
    ///
    /// Returns the frame (not yet pushed), the prelude operations for the
    /// current stream, and the depth growth.
    pub fn new_frame(
        &mut self,
        procedure: Option<(usize, ValueKind)>,
        depth: usize,
    ) -> (Frame, Vec<String>, usize) {
        let top_initial = self.top_procedure().map(|p| p.initial_depth);
        let top = self.top();

        let mut ops = Vec::new();
        let mut current = depth;
        let mut bindings = BTreeMap::new();
        let mut binding_kinds = BTreeMap::new();
        for (name, slot) in &top.bindings {
            let kind = top.binding_kinds[name].clone();
            if let ValueKind::List { .. } = kind {
                bindings.insert(name.clone(), *slot);
                binding_kinds.insert(name.clone(), kind);
                continue;
            }
            ops.push(format!("mov rax, {}", address_for(*slot, current, top_initial)));
            ops.push("push rax".to_string());
            current += 1;
            bindings.insert(name.clone(), current);
            binding_kinds.insert(name.clone(), kind);
        }

        let mut aliases = top.aliases.clone();
        if procedure.is_some() {
            for info in aliases.values_mut() {
                info.captured = true;
            }
        }

        let procedure = procedure.map(|(arity, return_kind)| {
            self.procedure_counter += 1;
            let label = format!("proc{}", self.procedure_counter);
            let entry_depth = current + arity + 1;
            let ops = vec![format!("{}:", label), format!("sub rcx, {}", entry_depth * 8)];
            Procedure {
                index: self.procedure_counter,
                label,
                initial_depth: current,
                entry_depth,
                arity,
                return_kind,
                ops,
            }
        });

        let frame = Frame {
            bindings,
            binding_kinds,
            aliases,
            procedure,
            base_depth: depth,
        };
        (frame, ops, current - depth)
    }

    /// Detach the innermost frame. A frame owning a procedure receives its
    /// epilogue (local pops, then `ret` consuming the argument slots) and
    /// contributes no pops to the outer stream; any other frame returns
    /// the number of pops needed to restore the depth recorded at its
    /// creation.
    pub fn pop(&mut self, depth: usize) -> (usize, Frame) {
        let mut frame = self
            .stack
            .pop()
            .expect("the global frame is never popped");
        if let Some(procedure) = frame.procedure.as_mut() {
            for _ in procedure.entry_depth..depth {
                procedure.ops.push("pop rbx".to_string());
            }
            if procedure.arity == 0 {
                procedure.ops.push("ret".to_string());
            } else {
                procedure.ops.push(format!("ret {}", procedure.arity * 8));
            }
            (0, frame)
        } else {
            (depth - frame.base_depth, frame)
        }
    }

    /// The nearest enclosing frame's procedure, scanning innermost first.
    pub fn top_procedure(&self) -> Option<&Procedure> {
        self.stack.iter().rev().find_map(|f| f.procedure.as_ref())
    }

    pub fn top_procedure_mut(&mut self) -> Option<&mut Procedure> {
        self.stack
            .iter_mut()
            .rev()
            .find_map(|f| f.procedure.as_mut())
    }

    /// Resolve a name at the given depth. Bindings shadow procedure
    /// aliases.
    pub fn get(&self, name: &str, depth: usize) -> Result<Resolved, String> {
        let top = self.top();
        if let Some(slot) = top.bindings.get(name) {
            let kind = top.binding_kinds[name].clone();
            let address = address_for(*slot, depth, self.top_procedure().map(|p| p.initial_depth));
            return Ok(Resolved::Slot { kind, address });
        }
        if let Some(info) = top.aliases.get(name) {
            return Ok(Resolved::Procedure(info.clone()));
        }
        Err(format!("could not resolve '{}' in the current scope", name))
    }

    /// Install or update a binding whose value sits in `value` (a register
    /// name or immediate).
    ///
    /// A name new to the innermost frame is pushed and recorded. An
    /// existing name inside a procedure frame is overwritten in place.
    /// Otherwise the new value is written through every enclosing frame
    /// holding the binding, stopping after the first frame that owns a
    /// procedure so that outer activations keep their own copies.
    ///
    /// Returns the operations and the depth growth.
    pub fn stack_insert(
        &mut self,
        name: &str,
        value: &str,
        depth: usize,
        kind: ValueKind,
    ) -> (Vec<String>, usize) {
        let top_initial = self.top_procedure().map(|p| p.initial_depth);
        let mut ops = Vec::new();
        let top_index = self.stack.len() - 1;

        if !self.stack[top_index].bindings.contains_key(name) {
            ops.push(format!("push {}", value));
            self.stack[top_index].bind(name, depth + 1, kind);
            return (ops, 1);
        }

        if self.stack[top_index].procedure.is_some() {
            let slot = self.stack[top_index].bindings[name];
            ops.push(format!("mov {}, {}", address_for(slot, depth, top_initial), value));
            self.stack[top_index]
                .binding_kinds
                .insert(name.to_string(), kind);
            return (ops, 0);
        }

        for index in (0..=top_index).rev() {
            let frame = &mut self.stack[index];
            let Some(&slot) = frame.bindings.get(name) else {
                break;
            };
            ops.push(format!("mov {}, {}", address_for(slot, depth, top_initial), value));
            frame.binding_kinds.insert(name.to_string(), kind.clone());
            if frame.procedure.is_some() {
                break;
            }
        }
        (ops, 0)
    }

    /// Record a binding in the innermost frame without emitting anything.
    pub fn record_binding(&mut self, name: &str, slot: usize, kind: ValueKind) {
        self.top_mut().bind(name, slot, kind);
    }

    /// Register a procedure alias, with the same outward write-through
    /// shape as `stack_insert`.
    pub fn proc_insert(&mut self, name: &str, info: ProcedureInfo) {
        let top_index = self.stack.len() - 1;
        let top = &mut self.stack[top_index];
        if !top.aliases.contains_key(name) || top.procedure.is_some() {
            top.set_alias(name, info);
            return;
        }
        for index in (0..=top_index).rev() {
            let frame = &mut self.stack[index];
            if !frame.aliases.contains_key(name) {
                break;
            }
            frame.set_alias(name, info.clone());
            if frame.procedure.is_some() {
                break;
            }
        }
    }
}

impl Default for Contexts {
    fn default() -> Self {
        Self::new()
    }
}

/// The address expression for a slot as seen at `depth`. With an enclosing
/// procedure, slots at or below its initial depth are captures addressed
/// through `rcx`.
fn address_for(slot: usize, depth: usize, procedure_initial: Option<usize>) -> String {
    let diff = (depth - slot) * 8;
    match procedure_initial {
        Some(initial) if slot <= initial => format!("[rsp+rcx+{}+8]", diff),
        _ => format!("[rsp+{}]", diff),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_binding_address_tracks_depth() {
        let mut contexts = Contexts::new();
        let (ops, delta) = contexts.stack_insert("x", "rax", 0, ValueKind::Number);
        assert_eq!(ops, vec!["push rax"]);
        assert_eq!(delta, 1);

        // Right after the push the binding is on top of the stack.
        let Resolved::Slot { kind, address } = contexts.get("x", 1).unwrap() else {
            panic!("expected slot");
        };
        assert_eq!(kind, ValueKind::Number);
        assert_eq!(address, "[rsp+0]");

        // Two more slots later it sits 16 bytes up.
        let Resolved::Slot { address, .. } = contexts.get("x", 3).unwrap() else {
            panic!("expected slot");
        };
        assert_eq!(address, "[rsp+16]");
    }

    #[test]
    fn test_unknown_name_fails() {
        let contexts = Contexts::new();
        assert!(contexts.get("ghost", 0).is_err());
    }

    #[test]
    fn test_new_frame_copies_bindings() {
        let mut contexts = Contexts::new();
        contexts.stack_insert("x", "rax", 0, ValueKind::Number);

        let (frame, ops, delta) = contexts.new_frame(None, 1);
        assert_eq!(ops, vec!["mov rax, [rsp+0]", "push rax"]);
        assert_eq!(delta, 1);
        contexts.push(frame);

        // The clone sits at slot 2 and shadows the original.
        let Resolved::Slot { address, .. } = contexts.get("x", 2).unwrap() else {
            panic!("expected slot");
        };
        assert_eq!(address, "[rsp+0]");
    }

    #[test]
    fn test_procedure_locals_and_captures() {
        let mut contexts = Contexts::new();
        contexts.stack_insert("x", "rax", 0, ValueKind::Number);

        // One capture copy: initial depth 2, one argument, entry depth 4.
        let (mut frame, _ops, delta) = contexts.new_frame(Some((1, ValueKind::Number)), 1);
        assert_eq!(delta, 1);
        let initial = 1 + delta;
        frame.bind("n", initial + 1, ValueKind::Number);
        contexts.push(frame);

        let entry = initial + 1 + 1;
        // The argument is a local: plain rsp-relative address.
        let Resolved::Slot { address, .. } = contexts.get("n", entry).unwrap() else {
            panic!("expected slot");
        };
        assert_eq!(address, "[rsp+8]");

        // The cloned x predates the procedure: addressed through rcx.
        let Resolved::Slot { address, .. } = contexts.get("x", entry).unwrap() else {
            panic!("expected slot");
        };
        assert_eq!(address, "[rsp+rcx+16+8]");
    }

    #[test]
    fn test_procedure_pop_emits_epilogue() {
        let mut contexts = Contexts::new();
        let (frame, _ops, _delta) = contexts.new_frame(Some((2, ValueKind::Number)), 0);
        contexts.push(frame);

        // Body pushed one local beyond the entry depth of 3.
        let (pops, mut frame) = contexts.pop(4);
        assert_eq!(pops, 0);
        let procedure = frame.take_procedure().unwrap();
        assert_eq!(
            procedure.ops,
            vec!["proc1:", "sub rcx, 24", "pop rbx", "ret 16"]
        );
    }

    #[test]
    fn test_plain_frame_pop_counts_slots() {
        let mut contexts = Contexts::new();
        let (frame, _ops, _delta) = contexts.new_frame(None, 5);
        contexts.push(frame);
        let (pops, _frame) = contexts.pop(8);
        assert_eq!(pops, 3);
    }

    #[test]
    fn test_binding_shadows_alias() {
        let mut contexts = Contexts::new();
        let info = ProcedureInfo {
            label: "proc1".to_string(),
            params: vec![],
            return_kind: ValueKind::Number,
            entry_depth: 1,
            captured: false,
        };
        contexts.proc_insert("f", info);
        contexts.stack_insert("f", "rax", 0, ValueKind::Number);
        assert!(matches!(
            contexts.get("f", 1).unwrap(),
            Resolved::Slot { .. }
        ));
    }

    #[test]
    fn test_aliases_marked_captured_across_procedure_boundary() {
        let mut contexts = Contexts::new();
        let info = ProcedureInfo {
            label: "proc9".to_string(),
            params: vec![],
            return_kind: ValueKind::Empty,
            entry_depth: 1,
            captured: false,
        };
        contexts.proc_insert("f", info);

        // A plain scope keeps the alias as-is.
        let (frame, _ops, _delta) = contexts.new_frame(None, 0);
        contexts.push(frame);
        let Resolved::Procedure(alias) = contexts.get("f", 0).unwrap() else {
            panic!("expected alias");
        };
        assert!(!alias.captured);

        // A procedure scope transports it.
        let (frame, _ops, _delta) = contexts.new_frame(Some((0, ValueKind::Empty)), 0);
        contexts.push(frame);
        let Resolved::Procedure(alias) = contexts.get("f", 1).unwrap() else {
            panic!("expected alias");
        };
        assert!(alias.captured);
    }

    #[test]
    fn test_reassignment_writes_through_enclosing_frames() {
        let mut contexts = Contexts::new();
        contexts.stack_insert("x", "rax", 0, ValueKind::Number);
        let (frame, _ops, delta) = contexts.new_frame(None, 1);
        contexts.push(frame);

        let depth = 1 + delta;
        let (ops, grown) = contexts.stack_insert("x", "rax", depth, ValueKind::Number);
        assert_eq!(grown, 0);
        // Both the clone and the original receive the new value.
        assert_eq!(ops, vec!["mov [rsp+0], rax", "mov [rsp+8], rax"]);
    }

    #[test]
    fn test_reassignment_inside_procedure_overwrites_in_place() {
        let mut contexts = Contexts::new();
        let (mut frame, _ops, _delta) = contexts.new_frame(Some((1, ValueKind::Empty)), 0);
        frame.bind("n", 1, ValueKind::Number);
        contexts.push(frame);

        let (ops, grown) = contexts.stack_insert("n", "rax", 2, ValueKind::Number);
        assert_eq!(grown, 0);
        assert_eq!(ops, vec!["mov [rsp+8], rax"]);
    }

    #[test]
    fn test_list_bindings_keep_their_slot_in_new_frames() {
        let mut contexts = Contexts::new();
        contexts.record_binding(
            "xs",
            3,
            ValueKind::List {
                elem: Box::new(ValueKind::Number),
                len: 3,
            },
        );

        let (frame, ops, delta) = contexts.new_frame(None, 3);
        assert!(ops.is_empty());
        assert_eq!(delta, 0);
        contexts.push(frame);

        let Resolved::Slot { address, .. } = contexts.get("xs", 3).unwrap() else {
            panic!("expected slot");
        };
        assert_eq!(address, "[rsp+0]");
    }
}
