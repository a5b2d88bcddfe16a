//! Cx Compiler: scanner, symbol table, type graph, and parser that
//! translates Cx source into the icode consumed by `cx-vm`.
//!
//! # Modules
//!
//! - `token`: lexical token kinds produced by the scanner.
//! - `diagnostics`: threshold-counted error reporting.
//! - `scanner`: lazy, forward-only lexer.
//! - `symtab`: scoped symbol table (`ScopeStack`/`SymbolTable`).
//! - `types`: reference-counted type arena and compatibility predicates.
//! - `icode`: append-only instruction buffer with branch-target fixup.
//! - `context`: `TranslationContext`, the value threaded through a
//!   translation instead of process-wide globals.
//! - `parser`: the recursive-descent translator from source to
//!   `CompiledProgram`.
//! - `link`: turns a finished `CompiledProgram` into the `cx_vm::ProgramTable`
//!   the VM runs.

pub mod context;
pub mod diagnostics;
pub mod icode;
pub mod link;
pub mod parser;
pub mod scanner;
pub mod symtab;
pub mod token;
pub mod types;

pub use context::{TranslationContext, TranslationOptions};
pub use diagnostics::Diagnostics;
pub use link::to_program_table;
pub use parser::{parse_program, CompiledProgram, FunctionBody};
pub use scanner::Scanner;
pub use symtab::{DefnData, DefnKind, ScopeStack, SymbolTable};
pub use types::{TypeArena, TypeForm, TypeId};
