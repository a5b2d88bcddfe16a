//! Cx Core: shared wire types for the Cx compiler and virtual machine
//!
//! This crate is the foundation both `cx-compiler` and `cx-vm` build on. It
//! holds nothing that depends on parsing or execution machinery, only the
//! data both sides must agree on byte-for-byte:
//!
//! - `value`: the tagged `Value` union pushed and popped from the operand
//!   stack and stored in the heap map.
//! - `instr`: the `Opcode` enum and the `Instruction` triple assembled by
//!   the parser and consumed by the VM dispatch loop.
//! - `error`: the three disjoint error taxonomies (lex/parse, abort,
//!   runtime) shared between the translator and the VM.
//!
//! # Modules
//!
//! - `value`: `Value`, the VM's tagged union over scalar and reference kinds.
//! - `instr`: `Opcode`, `Instruction`, and the program type they assemble into.
//! - `error`: `ErrorCode`, `AbortCode`, `RuntimeErrorCode`.

pub mod error;
pub mod instr;
pub mod value;

pub use error::{AbortCode, ErrorCode, RuntimeErrorCode};
pub use instr::{Instruction, Opcode, Program};
pub use value::Value;
