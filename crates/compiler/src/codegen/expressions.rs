//! Expression code generation
//!
//! Every expression leaves its single result on top of the runtime stack;
//! the parent that consumes it is responsible for the balancing pop. The
//! exceptions are list literals, which allocate their whole capacity, and
//! calls to functions without a return type, which leave nothing.
//!
//! Binary operators evaluate the right operand first, then the left, so
//! that the left value is popped into `rax` and the right into `rbx`.

use super::contexts::{ProcedureInfo, Resolved};
use super::{CodeGen, CodeGenError, ExpValue};
use crate::ast::{Arg, BinOp, Exp, FunctionLit, FunctionSig, ValueKind};

impl CodeGen {
    pub(super) fn codegen_exp(&mut self, exp: &Exp) -> Result<ExpValue, CodeGenError> {
        match exp {
            Exp::Num(value) => {
                self.push_immediate(*value);
                Ok(ExpValue::plain(ValueKind::Number))
            }
            Exp::Bool(value) => {
                self.emit(format!("push {}", if *value { 1 } else { 0 }));
                self.depth += 1;
                Ok(ExpValue::plain(ValueKind::Boolean))
            }
            Exp::Char(value) => {
                self.push_immediate(*value as i64);
                Ok(ExpValue::plain(ValueKind::Character))
            }
            Exp::Identifier(name) => self.codegen_identifier(name),
            Exp::Negative(inside) => {
                let value = self.codegen_exp(inside)?;
                if value.kind != ValueKind::Number {
                    return Err(CodeGenError::Logic(format!(
                        "cannot negate a value of kind {}",
                        value.kind
                    )));
                }
                self.emit("pop rax");
                self.emit("neg rax");
                self.emit("push rax");
                Ok(ExpValue::plain(ValueKind::Number))
            }
            Exp::Parenthesized(inside) => self.codegen_exp(inside),
            Exp::Binary { op, left, right } => self.codegen_binary(*op, left, right),
            Exp::Function(function) => self.codegen_function(function),
            Exp::Call { name, args } => self.codegen_call(name, args),
            Exp::List {
                elements,
                elem,
                size,
            } => self.codegen_list(elements, elem, *size),
            Exp::GetFromList { index, list } => self.codegen_get(index, list),
        }
    }

    fn push_immediate(&mut self, value: i64) {
        // push takes a sign-extended 32-bit immediate; larger values go
        // through rax.
        if i32::try_from(value).is_ok() {
            self.emit(format!("push {}", value));
        } else {
            self.emit(format!("mov rax, {}", value));
            self.emit("push rax");
        }
        self.depth += 1;
    }

    fn codegen_identifier(&mut self, name: &str) -> Result<ExpValue, CodeGenError> {
        match self.contexts.get(name, self.depth)? {
            Resolved::Slot {
                kind: ValueKind::List { .. },
                ..
            } => Err(CodeGenError::Logic(format!(
                "list '{}' cannot be used as a value; read elements with get",
                name
            ))),
            Resolved::Slot { kind, address } => {
                self.emit(format!("mov rax, {}", address));
                self.emit("push rax");
                self.depth += 1;
                Ok(ExpValue::plain(kind))
            }
            Resolved::Procedure(info) => {
                self.emit(format!("mov rax, {}", info.label));
                self.emit("push rax");
                self.depth += 1;
                let sig = FunctionSig {
                    params: info.params.clone(),
                    ret: Box::new(info.return_kind.clone()),
                };
                Ok(ExpValue {
                    kind: ValueKind::Function(sig),
                    proc: Some(info),
                })
            }
        }
    }

    fn codegen_binary(
        &mut self,
        op: BinOp,
        left: &Exp,
        right: &Exp,
    ) -> Result<ExpValue, CodeGenError> {
        let right_value = self.codegen_exp(right)?;
        let left_value = self.codegen_exp(left)?;

        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                if left_value.kind != ValueKind::Number || right_value.kind != ValueKind::Number {
                    return Err(CodeGenError::Logic(format!(
                        "operator '{}' requires number operands, got {} and {}",
                        op.symbol(),
                        left_value.kind,
                        right_value.kind
                    )));
                }
            }
            BinOp::Less | BinOp::Greater => {
                if left_value.kind != ValueKind::Number || right_value.kind != ValueKind::Number {
                    return Err(CodeGenError::Logic(format!(
                        "comparison '{}' requires number operands, got {} and {}",
                        op.symbol(),
                        left_value.kind,
                        right_value.kind
                    )));
                }
            }
            BinOp::Equals => {
                if left_value.kind != right_value.kind || !left_value.kind.is_scalar() {
                    return Err(CodeGenError::Logic(format!(
                        "comparison '==' requires matching scalar operands, got {} and {}",
                        left_value.kind, right_value.kind
                    )));
                }
            }
        }

        self.emit("pop rax");
        self.emit("pop rbx");
        self.depth -= 2;

        let kind = match op {
            BinOp::Add => {
                self.emit("add rax, rbx");
                self.emit("push rax");
                ValueKind::Number
            }
            BinOp::Sub => {
                self.emit("sub rax, rbx");
                self.emit("push rax");
                ValueKind::Number
            }
            BinOp::Mul => {
                self.emit("imul rax, rbx");
                self.emit("push rax");
                ValueKind::Number
            }
            BinOp::Div => {
                self.emit("xor rdx, rdx");
                self.emit("idiv rbx");
                self.emit("push rax");
                ValueKind::Number
            }
            BinOp::Mod => {
                self.emit("xor rdx, rdx");
                self.emit("idiv rbx");
                self.emit("push rdx");
                ValueKind::Number
            }
            BinOp::Less | BinOp::Greater | BinOp::Equals => {
                self.emit("cmp rax, rbx");
                match op {
                    BinOp::Less => self.emit("setl al"),
                    BinOp::Greater => self.emit("setg al"),
                    _ => self.emit("sete al"),
                }
                self.emit("movzx rax, al");
                self.emit("push rax");
                ValueKind::Boolean
            }
        };
        self.depth += 1;
        Ok(ExpValue::plain(kind))
    }

    /// Compile a function literal.
    ///
    /// The capture prelude runs in the enclosing stream and copies every
    /// visible scalar binding onto the stack; those copies form the
    /// procedure's capture block and stay alive in the enclosing frame.
    /// The body is compiled into the procedure's own stream starting at
    /// its entry depth. In the enclosing stream the literal evaluates to
    /// the procedure's label.
    fn codegen_function(&mut self, function: &FunctionLit) -> Result<ExpValue, CodeGenError> {
        let arity = function.args.len();
        let (mut frame, prelude, delta) = self
            .contexts
            .new_frame(Some((arity, function.return_kind.clone())), self.depth);
        for op in prelude {
            self.emit(op);
        }
        self.depth += delta;

        let initial_depth = self.depth;
        let entry_depth = initial_depth + arity + 1;
        let label = match frame.procedure() {
            Some(procedure) => procedure.label.clone(),
            None => {
                return Err(CodeGenError::Logic(
                    "internal error: procedure frame without a procedure".to_string(),
                ));
            }
        };

        let info = ProcedureInfo {
            label: label.clone(),
            params: function.args.iter().map(|a| a.kind.clone()).collect(),
            return_kind: function.return_kind.clone(),
            entry_depth,
            captured: false,
        };

        // The caller's argument slots become locals of the body.
        for (position, Arg { name, kind }) in function.args.iter().enumerate() {
            frame.bind(name, initial_depth + position + 1, kind.clone());
        }

        if function.recurse.is_some() {
            let mut recursive = info.clone();
            recursive.captured = true;
            frame.set_alias("me", recursive);
        }

        self.contexts.push(frame);
        let saved_depth = self.depth;
        self.depth = entry_depth;

        self.codegen_stmt(&function.body)?;

        let (_pops, mut frame) = self.contexts.pop(self.depth);
        if let Some(procedure) = frame.take_procedure() {
            self.finished.push(procedure);
        }
        self.depth = saved_depth;

        self.emit(format!("mov rax, {}", label));
        self.emit("push rax");
        self.depth += 1;

        let sig = FunctionSig {
            params: info.params.clone(),
            ret: Box::new(info.return_kind.clone()),
        };
        Ok(ExpValue {
            kind: ValueKind::Function(sig),
            proc: Some(info),
        })
    }

    /// Compile `call name with args`.
    ///
    /// The caller saves its own capture base, pushes the arguments
    /// left-to-right, points `rcx` at the callee's capture block and
    /// calls. The callee consumes the argument slots with `ret arity*8`
    /// and leaves its result in `rax`.
    fn codegen_call(&mut self, name: &str, args: &[Exp]) -> Result<ExpValue, CodeGenError> {
        let info = match self.contexts.get(name, self.depth)? {
            Resolved::Procedure(info) => info,
            Resolved::Slot { .. } => {
                return Err(CodeGenError::Logic(format!(
                    "'{}' is not a function and cannot be called",
                    name
                )));
            }
        };

        if args.len() != info.params.len() {
            return Err(CodeGenError::Logic(format!(
                "function '{}' expects {} argument(s) but got {}",
                name,
                info.params.len(),
                args.len()
            )));
        }

        self.emit("push rcx");
        self.depth += 1;

        for (argument, expected) in args.iter().zip(&info.params) {
            let value = self.codegen_exp(argument)?;
            if value.kind != *expected {
                return Err(CodeGenError::Logic(format!(
                    "argument of kind {} passed to '{}' where {} was expected",
                    value.kind, name, expected
                )));
            }
        }

        if info.captured {
            self.emit(format!("lea rcx, [rcx+{}]", (self.depth + 1) * 8));
        } else {
            self.emit(format!("mov rcx, {}", self.depth * 8));
        }
        self.emit(format!("call {}", info.label));
        self.depth -= args.len();
        self.emit("pop rcx");
        self.depth -= 1;

        if info.return_kind == ValueKind::Empty {
            Ok(ExpValue::plain(ValueKind::Empty))
        } else {
            self.emit("push rax");
            self.depth += 1;
            Ok(ExpValue::plain(info.return_kind))
        }
    }

    /// Compile a list literal: reserve the whole capacity as zeroed
    /// slots, then write the provided elements into the first slots.
    /// Element 0 ends up nearest the stack pointer, so indexing grows
    /// upward in addresses.
    fn codegen_list(
        &mut self,
        elements: &[Exp],
        elem: &ValueKind,
        size: usize,
    ) -> Result<ExpValue, CodeGenError> {
        if size == 0 {
            return Err(CodeGenError::Logic(
                "list capacity must be at least 1".to_string(),
            ));
        }
        if elements.len() > size {
            return Err(CodeGenError::Logic(format!(
                "list literal has {} elements but a capacity of {}",
                elements.len(),
                size
            )));
        }

        for _ in 0..size {
            self.emit("push 0");
            self.depth += 1;
        }

        for (position, element) in elements.iter().enumerate() {
            let value = self.codegen_exp(element)?;
            if value.kind != *elem {
                return Err(CodeGenError::Logic(format!(
                    "list element of kind {} in a list of {}",
                    value.kind, elem
                )));
            }
            self.emit("pop rax");
            self.depth -= 1;
            self.emit(format!("mov [rsp+{}], rax", position * 8));
        }

        Ok(ExpValue::plain(ValueKind::List {
            elem: Box::new(elem.clone()),
            len: size,
        }))
    }

    /// Compile `get index from list`: the index is evaluated first, the
    /// list base address is materialised with `lea`, and the element is
    /// read at `base + index*8`.
    fn codegen_get(&mut self, index: &Exp, list: &Exp) -> Result<ExpValue, CodeGenError> {
        match list {
            Exp::Identifier(name) => {
                let index_value = self.codegen_exp(index)?;
                if index_value.kind != ValueKind::Number {
                    return Err(CodeGenError::Logic(format!(
                        "list index must be a number, got {}",
                        index_value.kind
                    )));
                }
                self.emit("pop rbx");
                self.depth -= 1;

                let (elem, address) = match self.contexts.get(name, self.depth)? {
                    Resolved::Slot {
                        kind: ValueKind::List { elem, .. },
                        address,
                    } => (*elem, address),
                    _ => {
                        return Err(CodeGenError::Logic(format!(
                            "'{}' is not a list; get needs a list to read from",
                            name
                        )));
                    }
                };
                self.emit(format!("lea rax, {}", address));
                self.emit("mov rax, [rax+rbx*8]");
                self.emit("push rax");
                self.depth += 1;
                Ok(ExpValue::plain(elem))
            }
            Exp::List { .. } => {
                let list_value = self.codegen_exp(list)?;
                let ValueKind::List { elem, .. } = list_value.kind else {
                    return Err(CodeGenError::Logic(
                        "get needs a list to read from".to_string(),
                    ));
                };
                let base_slot = self.depth;

                let index_value = self.codegen_exp(index)?;
                if index_value.kind != ValueKind::Number {
                    return Err(CodeGenError::Logic(format!(
                        "list index must be a number, got {}",
                        index_value.kind
                    )));
                }
                self.emit("pop rbx");
                self.depth -= 1;

                let diff = (self.depth - base_slot) * 8;
                self.emit(format!("lea rax, [rsp+{}]", diff));
                self.emit("mov rax, [rax+rbx*8]");
                self.emit("push rax");
                self.depth += 1;
                Ok(ExpValue::plain(*elem))
            }
            _ => Err(CodeGenError::Logic(
                "get needs a list name or a list literal to read from".to_string(),
            )),
        }
    }
}
