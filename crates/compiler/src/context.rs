//! A single translation's mutable state, bundled into one value instead
//! of scattered globals threaded through by reference.

use crate::diagnostics::{Diagnostics, DEFAULT_ERROR_THRESHOLD};
use crate::symtab::{DefnData, DefnKind, ScopeStack};
use crate::types::{PredefinedTypes, TypeArena, TypeData};
use cx_core::value::{SymbolId, Value};
use std::path::PathBuf;

/// How deeply nested statements/expressions may recurse before the
/// parser reports `nesting_too_deep` and aborts.
pub const DEFAULT_MAX_NESTING: u32 = 512;

/// Knobs that do not change during a translation, separated from the
/// mutable tables above so they can be constructed once from CLI flags.
#[derive(Debug, Clone)]
pub struct TranslationOptions {
    /// Directories searched for `#include <...>` targets. Populated from
    /// the `CX_STDLIB` environment variable by the CLI driver, which is
    /// out of this crate's scope.
    pub include_dirs: Vec<PathBuf>,
    /// Directory of the top-level source file, used to resolve
    /// `#include "..."` targets relative to it. `None` when translating
    /// from an in-memory source with no backing file (e.g. tests).
    pub origin_dir: Option<PathBuf>,
    pub error_threshold: usize,
    pub max_nesting: u32,
    pub emit_listing: bool,
    pub dump_icode: bool,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        TranslationOptions {
            include_dirs: Vec::new(),
            origin_dir: None,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            max_nesting: DEFAULT_MAX_NESTING,
            emit_listing: false,
            dump_icode: false,
        }
    }
}

/// Everything a parse needs that would otherwise be a free-floating
/// global: the scope stack, the type arena and its predefined handles,
/// accumulated diagnostics, and the translation's options.
pub struct TranslationContext {
    pub scopes: ScopeStack,
    pub types: TypeArena,
    pub predefined: PredefinedTypes,
    pub diagnostics: Diagnostics,
    pub options: TranslationOptions,
    /// `#include` targets already expanded, to guard against cycles.
    pub included: std::collections::HashSet<PathBuf>,
    /// Current statement/expression recursion depth.
    pub nesting: u32,
}

impl TranslationContext {
    pub fn new(options: TranslationOptions) -> Self {
        let mut types = TypeArena::new();
        let predefined = PredefinedTypes::install(&mut types);
        let threshold = options.error_threshold;
        let mut scopes = ScopeStack::new();
        let false_id = Self::install_bool_const(&mut scopes, &predefined, "false", Value::Int(0));
        let true_id = Self::install_bool_const(&mut scopes, &predefined, "true", Value::Int(1));
        if let TypeData::Enum { consts, .. } = &mut types.get_mut(predefined.boolean).data {
            *consts = vec![false_id, true_id];
        }
        TranslationContext {
            scopes,
            types,
            predefined,
            diagnostics: Diagnostics::new(threshold),
            options,
            included: std::collections::HashSet::new(),
            nesting: 0,
        }
    }

    /// Installs `false`/`true` as global enum constants of `boolean`,
    /// linked into its type node's `consts` by the caller once both IDs
    /// are known.
    fn install_bool_const(scopes: &mut ScopeStack, predefined: &PredefinedTypes, name: &str, value: Value) -> SymbolId {
        let id = scopes.global_mut().enter_new(name).expect("boolean constants installed exactly once");
        let node = scopes.global_mut().get_mut(id);
        node.kind = DefnKind::Constant;
        node.type_id = Some(predefined.boolean);
        node.data = DefnData::Constant(value);
        id
    }

    /// Enter a nested construct, reporting and returning `false` once the
    /// nesting bound is exceeded.
    pub fn enter_nesting(&mut self) -> bool {
        self.nesting += 1;
        self.nesting <= self.options.max_nesting
    }

    pub fn exit_nesting(&mut self) {
        self.nesting = self.nesting.saturating_sub(1);
    }
}

impl Drop for TranslationContext {
    fn drop(&mut self) {
        self.predefined.teardown(&mut self.types);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nesting_bound_is_enforced() {
        let mut ctx = TranslationContext::new(TranslationOptions { max_nesting: 2, ..Default::default() });
        assert!(ctx.enter_nesting());
        assert!(ctx.enter_nesting());
        assert!(!ctx.enter_nesting());
        ctx.exit_nesting();
        ctx.exit_nesting();
        assert_eq!(ctx.nesting, 1);
    }

    #[test]
    fn predefined_types_are_live_for_the_context_lifetime() {
        let ctx = TranslationContext::new(TranslationOptions::default());
        assert!(ctx.types.is_live(ctx.predefined.integer));
    }
}
