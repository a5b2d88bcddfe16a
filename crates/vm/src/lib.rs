//! Cx VM: the stack-based interpreter that executes the icode
//! `cx-compiler` assembles.
//!
//! # Modules
//!
//! - `heap`: the synthetic-pointer heap map backing array allocations.
//! - `vm`: `Vm`, `ProgramTable`, `FunctionDescriptor`, and the dispatch
//!   loop that walks a `cx_core::instr::Program`.

pub mod heap;
pub mod vm;

pub use heap::{ElementKind, HeapMap};
pub use vm::{FunctionDescriptor, InvocationGuard, ProgramTable, Vm, STACK_CAPACITY};
