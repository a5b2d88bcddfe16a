//! Heap-allocated array storage, addressed through synthetic pointers
//! rather than native ones (`Value::Pointer` never refers directly into
//! the host process).
//!
//! Mirrors the reference-counted-arena discipline `cx_compiler::types`
//! uses for the type graph: entries are allocated at refcount zero,
//! `retain`/`release` move the count, and a release to zero tombstones
//! the slot instead of compacting the map (so outstanding pointers never
//! dangle into a different allocation).

use cx_core::error::RuntimeErrorCode;
use cx_core::value::{HeapAddr, Value};
use std::collections::HashMap;

/// Element type tag, matching the scalar tag `cx_compiler` encodes into
/// `NEWARRAY`'s second operand (0=int, 1=real, 2=bool, 3=char).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Int,
    Real,
    Bool,
    Char,
}

impl ElementKind {
    pub fn from_tag(tag: i32) -> Self {
        match tag {
            1 => ElementKind::Real,
            2 => ElementKind::Bool,
            3 => ElementKind::Char,
            _ => ElementKind::Int,
        }
    }

    fn default_value(self) -> Value {
        match self {
            ElementKind::Int => Value::Int(0),
            ElementKind::Real => Value::Float(0.0),
            ElementKind::Bool => Value::Bool(false),
            ElementKind::Char => Value::Char(0),
        }
    }

    fn element_byte_size(self) -> u32 {
        match self {
            ElementKind::Int => 4,
            ElementKind::Real => 4,
            ElementKind::Bool => 1,
            ElementKind::Char => 1,
        }
    }
}

/// A single heap allocation: a shared, growable element buffer plus the
/// bookkeeping needed to bounds-check and eventually release it.
pub struct HeapEntry {
    pub buffer: Vec<Value>,
    pub element_byte_size: u32,
    pub element_kind: ElementKind,
    pub total_bytes: u32,
    refcount: u32,
}

impl HeapEntry {
    pub fn len(&self) -> i32 {
        self.buffer.len() as i32
    }
}

/// Maps synthetic addresses to their backing allocation. One per `Vm`
/// instance; never shared across instances, so a plain `HashMap` (no
/// locking) is enough.
pub struct HeapMap {
    entries: HashMap<HeapAddr, HeapEntry>,
    next_addr: HeapAddr,
}

impl HeapMap {
    pub fn new() -> Self {
        HeapMap { entries: HashMap::new(), next_addr: 1 }
    }

    /// Allocate an array of `count` elements of `kind`, each initialized
    /// to that kind's zero value. Returns the fresh entry's address at
    /// refcount zero; the caller (the VM's `NEWARRAY` handler) is
    /// responsible for calling [`HeapMap::retain`] once it stores the
    /// pointer somewhere durable.
    pub fn alloc_array(&mut self, count: i32, kind: ElementKind) -> HeapAddr {
        let count = count.max(0) as usize;
        let addr = self.next_addr;
        self.next_addr += 1;
        let element_byte_size = kind.element_byte_size();
        let entry = HeapEntry {
            buffer: vec![kind.default_value(); count],
            element_byte_size,
            element_kind: kind,
            total_bytes: element_byte_size * count as u32,
            refcount: 0,
        };
        self.entries.insert(addr, entry);
        addr
    }

    pub fn get(&self, addr: HeapAddr) -> Option<&HeapEntry> {
        self.entries.get(&addr)
    }

    pub fn retain(&mut self, addr: HeapAddr) {
        if let Some(e) = self.entries.get_mut(&addr) {
            e.refcount += 1;
        }
    }

    /// Decrement the allocation's refcount, erasing it once it reaches
    /// zero. A function's locals are released this way when its
    /// activation dies.
    pub fn release(&mut self, addr: HeapAddr) {
        if let Some(e) = self.entries.get_mut(&addr) {
            e.refcount = e.refcount.saturating_sub(1);
            if e.refcount == 0 {
                self.entries.remove(&addr);
            }
        }
    }

    pub fn load(&self, addr: HeapAddr, index: i32) -> Result<Value, RuntimeErrorCode> {
        let entry = self.entries.get(&addr).ok_or(RuntimeErrorCode::ValueOutOfRange)?;
        if index < 0 || index as usize >= entry.buffer.len() {
            return Err(RuntimeErrorCode::ValueOutOfRange);
        }
        Ok(entry.buffer[index as usize])
    }

    pub fn store(&mut self, addr: HeapAddr, index: i32, value: Value) -> Result<(), RuntimeErrorCode> {
        let entry = self.entries.get_mut(&addr).ok_or(RuntimeErrorCode::ValueOutOfRange)?;
        if index < 0 || index as usize >= entry.buffer.len() {
            return Err(RuntimeErrorCode::ValueOutOfRange);
        }
        entry.buffer[index as usize] = value;
        Ok(())
    }

    pub fn length_of(&self, addr: HeapAddr) -> Result<i32, RuntimeErrorCode> {
        self.entries.get(&addr).map(HeapEntry::len).ok_or(RuntimeErrorCode::ValueOutOfRange)
    }
}

impl Default for HeapMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_roundtrip() {
        let mut heap = HeapMap::new();
        let addr = heap.alloc_array(3, ElementKind::Char);
        heap.retain(addr);
        heap.store(addr, 1, Value::Char(b'x')).unwrap();
        assert_eq!(heap.load(addr, 1).unwrap(), Value::Char(b'x'));
        assert_eq!(heap.load(addr, 0).unwrap(), Value::Char(0));
    }

    #[test]
    fn out_of_bounds_is_value_out_of_range() {
        let mut heap = HeapMap::new();
        let addr = heap.alloc_array(3, ElementKind::Int);
        heap.retain(addr);
        assert_eq!(heap.load(addr, 3), Err(RuntimeErrorCode::ValueOutOfRange));
        assert_eq!(heap.store(addr, -1, Value::Int(0)), Err(RuntimeErrorCode::ValueOutOfRange));
    }

    #[test]
    fn release_to_zero_erases_the_entry() {
        let mut heap = HeapMap::new();
        let addr = heap.alloc_array(1, ElementKind::Int);
        heap.retain(addr);
        heap.release(addr);
        assert!(heap.get(addr).is_none());
        assert_eq!(heap.load(addr, 0), Err(RuntimeErrorCode::ValueOutOfRange));
    }
}
