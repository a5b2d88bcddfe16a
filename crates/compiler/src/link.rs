//! Bridges a finished [`CompiledProgram`] into the `cx_vm::ProgramTable`
//! the VM actually runs, by resolving each function's return type down to
//! whether it returns a value at all.

use crate::context::TranslationContext;
use crate::parser::CompiledProgram;
use crate::types::TypeForm;
use cx_vm::{FunctionDescriptor, ProgramTable};
use std::collections::HashMap;

pub fn to_program_table(compiled: &CompiledProgram, ctx: &TranslationContext) -> ProgramTable {
    let mut functions = HashMap::with_capacity(compiled.functions.len());
    for (&sym, body) in &compiled.functions {
        let has_return = body
            .return_type
            .map(|ty| ctx.types.get(ctx.types.base(ty)).form != TypeForm::None)
            .unwrap_or(false);
        functions.insert(
            sym,
            FunctionDescriptor {
                program: body.program.clone(),
                local_size: body.local_size,
                param_count: body.param_count,
                has_return,
            },
        );
    }
    ProgramTable::new(functions)
}
