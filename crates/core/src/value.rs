//! The VM's tagged value union.
//!
//! A `Value` is what lives on the operand stack, in a `Instruction`'s
//! operand slots, and (for arrays/records) behind a heap pointer. Every
//! arithmetic and comparison opcode operates on a single homogeneous
//! variant; the parser is responsible for inserting the `I2F`/`F2D`/etc.
//! conversion opcodes so the VM never has to coerce between variants at
//! dispatch time.

use std::fmt;

/// A synthetic heap address: the key into the VM's heap map.
///
/// Distinct from a native pointer — it never refers directly into the
/// host process's address space, only into `cx_vm::heap::HeapMap`.
pub type HeapAddr = u64;

/// A stable handle into the symbol table, used by `Value::SymbolRef` and
/// by `Instruction` operands that name a function, variable, or field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The VM's tagged union over scalar and reference values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// Absence of a value; used to pad unused instruction operand slots.
    None,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(u8),
    Bool(bool),
    /// A synthetic heap address (array or record instance).
    Pointer(HeapAddr),
    /// A reference to a symbol table node (function target, field offset
    /// owner, constant). Carried in icode and in `CALL`/`GETFIELD` operands.
    SymbolRef(SymbolId),
}

impl Default for Value {
    fn default() -> Self {
        Value::None
    }
}

impl Value {
    /// Byte size of the scalar form this value's own variant occupies on
    /// the operand stack. Reference forms report the size of the handle,
    /// not the referent (the referent's size lives in the heap map entry
    /// or the type graph).
    pub fn scalar_size(&self) -> usize {
        match self {
            Value::None => 0,
            Value::Int(_) => size_of::<i32>(),
            Value::Long(_) => size_of::<i64>(),
            Value::Float(_) => size_of::<f32>(),
            Value::Double(_) => size_of::<f64>(),
            Value::Char(_) => size_of::<u8>(),
            Value::Bool(_) => size_of::<bool>(),
            Value::Pointer(_) => size_of::<HeapAddr>(),
            Value::SymbolRef(_) => size_of::<u32>(),
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<u8> {
        match self {
            Value::Char(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<HeapAddr> {
        match self {
            Value::Pointer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<SymbolId> {
        match self {
            Value::SymbolRef(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "<none>"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}L"),
            Value::Float(v) => write!(f, "{v}f"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "'{}'", *v as char),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Pointer(v) => write!(f, "*0x{v:x}"),
            Value::SymbolRef(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_none() {
        assert_eq!(Value::default(), Value::None);
    }

    #[test]
    fn scalar_sizes_match_width() {
        assert_eq!(Value::Int(0).scalar_size(), 4);
        assert_eq!(Value::Long(0).scalar_size(), 8);
        assert_eq!(Value::Float(0.0).scalar_size(), 4);
        assert_eq!(Value::Double(0.0).scalar_size(), 8);
        assert_eq!(Value::Char(0).scalar_size(), 1);
    }

    #[test]
    fn accessors_narrow_correctly() {
        assert_eq!(Value::Int(7).as_int(), Some(7));
        assert_eq!(Value::Long(7).as_int(), None);
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Pointer(42).as_pointer(), Some(42));
    }
}
