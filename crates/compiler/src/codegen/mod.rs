//! x86-64 code generation
//!
//! This module turns the typed AST into NASM-syntax assembly as text. The
//! generation is a single forward pass over the AST, cooperating with the
//! context stack in `contexts.rs`.
//!
//! # Key Concepts
//!
//! ## Value Representation
//!
//! Every value is one 8-byte stack slot. Booleans are 0/1 integers,
//! characters are the byte value widened to 64 bits, lists are runs of
//! consecutive slots, and function values are the address of their
//! emitted label.
//!
//! ## Expression Convention
//!
//! An expression leaves its result on top of the stack; the consumer pops
//! it. The generator mirrors every emitted push and pop in a compile-time
//! depth counter, and the context stack turns (depth, slot) pairs into
//! concrete `[rsp+…]` address expressions.
//!
//! ## Closures
//!
//! A function literal copies every visible scalar binding onto the stack
//! at its creation site; those copies are the procedure's capture block
//! and live as long as the creating frame. At run time `rcx` carries the
//! distance between the callee's view of the stack and its capture block:
//! the caller establishes it (`mov rcx, depth*8` for a procedure created
//! in the caller's own region, `lea rcx, [rcx+(depth+1)*8]` for one that
//! was transported across a procedure boundary) and the callee prologue
//! rebases it with `sub rcx, entry_depth*8`. Captured slots are then
//! `[rsp+rcx+diff+8]` wherever the body refers to them.
//!
//! ## Procedures
//!
//! Each function literal becomes a `procN` stream owned by its context
//! frame. Popping the frame appends the epilogue (`ret arity*8`, so the
//! callee consumes its argument slots). All procedure streams are
//! appended after the main stream in creation order.
//!
//! # Module Structure
//!
//! - `contexts.rs`: the scope/context stack
//! - `state.rs`: the CodeGen struct and emission plumbing
//! - `expressions.rs`: expression walk
//! - `statements.rs`: statement walk
//! - `program.rs`: final assembly of the output text
//! - `runtime.rs`: embedded print helpers
//! - `error.rs`: error type

mod contexts;
mod error;
mod expressions;
mod program;
mod runtime;
mod state;
mod statements;

pub use contexts::{Contexts, Frame, Procedure, ProcedureInfo, Resolved};
pub use error::CodeGenError;
pub use state::{CodeGen, ExpValue};
