//! Type graph and compatibility rules.
//!
//! Types are reference-counted nodes in an arena, indexed by stable
//! handles with a separate refcount array, rather than `Rc<RefCell<_>>`
//! handles, so `set_type` can be a single free function instead of a
//! scattered pile of clone/drop calls.

use crate::symtab::SymbolTable;
use cx_core::value::SymbolId;
use std::fmt;

/// A stable handle into a [`TypeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeForm {
    None,
    Scalar,
    Enum,
    Subrange,
    Array,
    Record,
}

impl fmt::Display for TypeForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TypeForm::None => "*error*",
            TypeForm::Scalar => "scalar",
            TypeForm::Enum => "enum",
            TypeForm::Subrange => "subrange",
            TypeForm::Array => "array",
            TypeForm::Record => "record",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Integer,
    Real,
    Boolean,
    Char,
}

#[derive(Debug, Clone)]
pub enum TypeData {
    None,
    Scalar(ScalarKind),
    Enum {
        /// Declaration-order constant identifiers.
        consts: Vec<SymbolId>,
        max_ordinal: i32,
    },
    Subrange {
        base: TypeId,
        min: i32,
        max: i32,
    },
    Array {
        index: TypeId,
        element: TypeId,
        count: i32,
    },
    Record {
        fields: SymbolTable,
    },
}

/// A type node: a common header of form, byte size, and an optional
/// defining identifier, plus a per-form payload.
#[derive(Debug, Clone)]
pub struct TypeNode {
    pub form: TypeForm,
    pub byte_size: u32,
    /// Non-owning back-reference to the identifier this type was named
    /// by, if any. A weak link, only dereferenced for diagnostics, never
    /// for lifetime decisions.
    pub defining_node: Option<SymbolId>,
    pub data: TypeData,
}

impl TypeNode {
    fn new(form: TypeForm, byte_size: u32, defining_node: Option<SymbolId>, data: TypeData) -> Self {
        TypeNode { form, byte_size, defining_node, data }
    }
}

/// Reference-counted arena of type nodes.
///
/// A slot is tombstoned (`None`) once its refcount reaches zero; using a
/// tombstoned handle is a logic error and panics rather than silently
/// reading garbage, since no type should ever be released while a holder
/// still names it.
pub struct TypeArena {
    nodes: Vec<Option<TypeNode>>,
    refcounts: Vec<u32>,
}

impl TypeArena {
    pub fn new() -> Self {
        TypeArena { nodes: Vec::new(), refcounts: Vec::new() }
    }

    fn alloc(&mut self, node: TypeNode) -> TypeId {
        let id = TypeId(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        self.refcounts.push(0);
        id
    }

    pub fn get(&self, id: TypeId) -> &TypeNode {
        self.nodes[id.0 as usize].as_ref().expect("use of a released type handle")
    }

    pub fn get_mut(&mut self, id: TypeId) -> &mut TypeNode {
        self.nodes[id.0 as usize].as_mut().expect("use of a released type handle")
    }

    pub fn refcount(&self, id: TypeId) -> u32 {
        self.refcounts[id.0 as usize]
    }

    pub fn is_live(&self, id: TypeId) -> bool {
        self.nodes[id.0 as usize].is_some()
    }

    /// Create a new scalar/enum/subrange/array/record type with refcount
    /// zero; the caller must route it through [`TypeArena::set_type`] to
    /// give it an owner.
    pub fn create(&mut self, form: TypeForm, byte_size: u32, defining_node: Option<SymbolId>, data: TypeData) -> TypeId {
        self.alloc(TypeNode::new(form, byte_size, defining_node, data))
    }

    /// Bind `*target` to `source`, incrementing `source`'s refcount and
    /// releasing whatever `*target` held, **in that order** so
    /// self-assignment (`set_type(&mut h, h)`) is safe.
    pub fn set_type(&mut self, target: &mut Option<TypeId>, source: TypeId) {
        self.refcounts[source.0 as usize] += 1;
        if let Some(old) = target.take() {
            self.release(old);
        }
        *target = Some(source);
    }

    /// Decrement `id`'s refcount; at zero, release any types it owns
    /// (subrange's base, array's index/element, nothing extra for a
    /// record since its field symtab holds no type handles of its own
    /// beyond what field types separately own) and tombstone the slot.
    pub fn release(&mut self, id: TypeId) {
        self.refcounts[id.0 as usize] -= 1;
        if self.refcounts[id.0 as usize] != 0 {
            return;
        }
        let node = self.nodes[id.0 as usize].take().expect("double release of a type handle");
        match node.data {
            TypeData::Subrange { base, .. } => self.release(base),
            TypeData::Array { index, element, .. } => {
                self.release(index);
                self.release(element);
            }
            TypeData::None | TypeData::Scalar(_) | TypeData::Enum { .. } | TypeData::Record { .. } => {}
        }
    }

    /// A type's base: itself, except for a subrange, whose base is its
    /// referenced base type.
    pub fn base(&self, id: TypeId) -> TypeId {
        match &self.get(id).data {
            TypeData::Subrange { base, .. } => self.base(*base),
            _ => id,
        }
    }
}

impl Default for TypeArena {
    fn default() -> Self {
        TypeArena::new()
    }
}

/// Handles to the five predefined types plus the placeholder "dummy"
/// type, created once at parser construction.
#[derive(Debug, Clone, Copy)]
pub struct PredefinedTypes {
    pub integer: TypeId,
    pub real: TypeId,
    pub boolean: TypeId,
    pub character: TypeId,
    /// Substituted wherever no real type can be determined, to keep
    /// downstream checks total.
    pub dummy: TypeId,
}

impl PredefinedTypes {
    /// Creates the predefined types and installs them with refcount 1
    /// each (owned by this struct, released by
    /// [`PredefinedTypes::teardown`]).
    pub fn install(arena: &mut TypeArena) -> Self {
        let mut make = |form, size, data| {
            let id = arena.create(form, size, None, data);
            let mut holder = None;
            arena.set_type(&mut holder, id);
            holder.unwrap()
        };
        let integer = make(TypeForm::Scalar, 4, TypeData::Scalar(ScalarKind::Integer));
        let real = make(TypeForm::Scalar, 4, TypeData::Scalar(ScalarKind::Real));
        let character = make(TypeForm::Scalar, 1, TypeData::Scalar(ScalarKind::Char));
        // boolean's enum constants (false=0, true=1) are installed into
        // the global scope by `TranslationContext::new`, which then
        // patches `consts` in once both symbol IDs are known.
        let boolean = make(
            TypeForm::Enum,
            4,
            TypeData::Enum { consts: Vec::new(), max_ordinal: 1 },
        );
        let dummy = make(TypeForm::None, 1, TypeData::None);
        PredefinedTypes { integer, real, boolean, character, dummy }
    }

    pub fn teardown(&self, arena: &mut TypeArena) {
        for id in [self.integer, self.real, self.boolean, self.character, self.dummy] {
            arena.release(id);
        }
    }
}

// --- Compatibility predicates ---

fn scalar_kind(arena: &TypeArena, id: TypeId) -> Option<ScalarKind> {
    match &arena.get(arena.base(id)).data {
        TypeData::Scalar(k) => Some(*k),
        _ => None,
    }
}

fn char_array_len(arena: &TypeArena, id: TypeId, char_kind: TypeId) -> Option<i32> {
    match &arena.get(arena.base(id)).data {
        TypeData::Array { element, count, .. } if arena.base(*element) == arena.base(char_kind) => Some(*count),
        _ => None,
    }
}

/// `assignment_compatible(target, value)`.
pub fn assignment_compatible(arena: &TypeArena, pre: &PredefinedTypes, target: TypeId, value: TypeId) -> bool {
    let t = arena.base(target);
    let v = arena.base(value);
    if t == v {
        return true;
    }
    if t == arena.base(pre.real) && v == arena.base(pre.integer) {
        return true;
    }
    if let (Some(tn), Some(vn)) = (char_array_len(arena, t, pre.character), char_array_len(arena, v, pre.character)) {
        return tn == vn;
    }
    false
}

/// `relational_operand_compatible(a, b)`: same-form scalars/enums, or one
/// integer and one real operand.
pub fn relational_operand_compatible(arena: &TypeArena, pre: &PredefinedTypes, a: TypeId, b: TypeId) -> bool {
    let ba = arena.base(a);
    let bb = arena.base(b);
    if ba == bb && matches!(arena.get(ba).form, TypeForm::Scalar | TypeForm::Enum) {
        return true;
    }
    let int_base = arena.base(pre.integer);
    let real_base = arena.base(pre.real);
    if (ba == int_base && bb == real_base) || (ba == real_base && bb == int_base) {
        return true;
    }
    if let (Some(la), Some(lb)) = (char_array_len(arena, ba, pre.character), char_array_len(arena, bb, pre.character)) {
        return la == lb;
    }
    false
}

/// `integer_or_real(a, b?)`.
pub fn integer_or_real(arena: &TypeArena, pre: &PredefinedTypes, a: TypeId, b: Option<TypeId>) -> bool {
    let is_num = |id: TypeId| {
        let base = arena.base(id);
        base == arena.base(pre.integer) || base == arena.base(pre.real)
    };
    is_num(a) && b.is_none_or(is_num)
}

/// `boolean(a, b?)`.
pub fn boolean_operands(arena: &TypeArena, pre: &PredefinedTypes, a: TypeId, b: Option<TypeId>) -> bool {
    let is_bool = |id: TypeId| arena.base(id) == arena.base(pre.boolean);
    is_bool(a) && b.is_none_or(is_bool)
}

/// `integer_operands(a, b)`.
pub fn integer_operands(arena: &TypeArena, pre: &PredefinedTypes, a: TypeId, b: TypeId) -> bool {
    arena.base(a) == arena.base(pre.integer) && arena.base(b) == arena.base(pre.integer)
}

/// `real_operands(a, b)`: both real, or one real and the
/// other integer (the parser inserts the widening conversion opcode).
pub fn real_operands(arena: &TypeArena, pre: &PredefinedTypes, a: TypeId, b: TypeId) -> bool {
    let ba = arena.base(a);
    let bb = arena.base(b);
    let real = arena.base(pre.real);
    let int = arena.base(pre.integer);
    (ba == real && bb == real) || (ba == real && bb == int) || (bb == real && ba == int)
}

/// Form tag plus scalar kind is enough to fully describe a given type's
/// "kind" for callers that only care about scalar vs. aggregate shape.
pub fn scalar_kind_of(arena: &TypeArena, id: TypeId) -> Option<ScalarKind> {
    scalar_kind(arena, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> (TypeArena, PredefinedTypes) {
        let mut arena = TypeArena::new();
        let pre = PredefinedTypes::install(&mut arena);
        (arena, pre)
    }

    #[test]
    fn assignment_compatible_is_reflexive_for_every_predefined_type() {
        let (arena, pre) = fresh();
        for t in [pre.integer, pre.real, pre.boolean, pre.character, pre.dummy] {
            assert!(assignment_compatible(&arena, &pre, t, t));
        }
    }

    #[test]
    fn real_widens_from_integer_but_not_vice_versa() {
        let (arena, pre) = fresh();
        assert!(assignment_compatible(&arena, &pre, pre.real, pre.integer));
        assert!(!assignment_compatible(&arena, &pre, pre.integer, pre.real));
    }

    #[test]
    fn set_type_handles_self_assignment_safely() {
        let mut arena = TypeArena::new();
        let id = arena.create(TypeForm::Scalar, 4, None, TypeData::Scalar(ScalarKind::Integer));
        let mut holder = None;
        arena.set_type(&mut holder, id);
        assert_eq!(arena.refcount(id), 1);
        arena.set_type(&mut holder, id);
        assert_eq!(arena.refcount(id), 1);
        assert!(arena.is_live(id));
    }

    #[test]
    fn refcount_reaches_zero_exactly_once_on_teardown() {
        let mut arena = TypeArena::new();
        let pre = PredefinedTypes::install(&mut arena);
        for id in [pre.integer, pre.real, pre.boolean, pre.character, pre.dummy] {
            assert_eq!(arena.refcount(id), 1);
        }
        pre.teardown(&mut arena);
        for id in [pre.integer, pre.real, pre.boolean, pre.character, pre.dummy] {
            assert!(!arena.is_live(id));
        }
    }

    #[test]
    fn array_of_char_release_cascades_to_element_and_index_types() {
        let mut arena = TypeArena::new();
        let pre = PredefinedTypes::install(&mut arena);
        let idx = arena.create(TypeForm::Subrange, 4, None, TypeData::Subrange { base: pre.integer, min: 0, max: 2 });
        let mut idx_holder = None;
        arena.set_type(&mut idx_holder, idx);
        let arr = arena.create(TypeForm::Array, 3, None, TypeData::Array { index: idx, element: pre.character, count: 3 });
        let mut arr_holder = None;
        arena.set_type(&mut arr_holder, arr);
        arena.release(idx_holder.unwrap());
        arena.release(arr_holder.unwrap());
        assert!(!arena.is_live(arr));
        assert!(!arena.is_live(idx));
        assert!(arena.is_live(pre.character));
    }
}
