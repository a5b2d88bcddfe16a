//! Intermediate-code buffer with forward-reference markers.
//!
//! The parser emits instructions as it recognizes constructs, but a
//! branch's target is often not yet known (an `if`'s `else` arm, a
//! `for`'s increment). `IcodeBuffer` lets the parser reserve a slot with
//! [`IcodeBuffer::put_marker`], keep parsing, and patch the target in
//! later with [`IcodeBuffer::fixup`] once the destination is reached.

use cx_core::instr::{Instruction, Opcode, Program};
use cx_core::value::Value;
use std::collections::HashSet;

/// Position of a reserved branch instruction, returned by
/// [`IcodeBuffer::put_marker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkerId(usize);

/// An append-only instruction vector for one function, with fixup
/// tracking.
#[derive(Debug, Default)]
pub struct IcodeBuffer {
    code: Program,
    pending: HashSet<MarkerId>,
}

impl IcodeBuffer {
    pub fn new() -> Self {
        IcodeBuffer { code: Vec::new(), pending: HashSet::new() }
    }

    /// Current emission position; the index the next `emit` will occupy.
    pub fn position(&self) -> usize {
        self.code.len()
    }

    pub fn emit(&mut self, instr: Instruction) -> usize {
        let pos = self.code.len();
        self.code.push(instr);
        pos
    }

    /// Reserve a branch instruction whose target is not yet known. The
    /// opcode is recorded now; `arg0` is a placeholder until
    /// [`IcodeBuffer::fixup`] patches it.
    pub fn put_marker(&mut self, opcode: Opcode) -> MarkerId {
        debug_assert!(opcode.is_branch(), "put_marker called on a non-branch opcode");
        let pos = self.emit(Instruction::with_arg0(opcode, Value::Int(-1)));
        let marker = MarkerId(pos);
        self.pending.insert(marker);
        marker
    }

    /// Patch a previously reserved marker to branch to `target` (an
    /// instruction index). Patching the same marker twice is a logic
    /// error.
    pub fn fixup(&mut self, marker: MarkerId, target: usize) {
        assert!(self.pending.remove(&marker), "fixup of an already-patched or unknown marker");
        self.code[marker.0].arg0 = Value::Int(target as i32);
    }

    /// Patch a marker to the buffer's current position (the common case:
    /// "branch to right here").
    pub fn fixup_here(&mut self, marker: MarkerId) {
        let here = self.position();
        self.fixup(marker, here);
    }

    /// `true` once every marker issued by this buffer has been patched
    /// (a completed function body must satisfy this before assembly).
    pub fn all_fixed_up(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn as_slice(&self) -> &[Instruction] {
        &self.code
    }

    /// Consume the buffer into its assembled program. Panics if any
    /// marker was never patched, since that would emit a branch to `-1`.
    pub fn into_program(self) -> Program {
        assert!(self.all_fixed_up(), "icode buffer has {} unpatched marker(s)", self.pending.len());
        self.code
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixup_patches_the_reserved_instruction() {
        let mut buf = IcodeBuffer::new();
        let marker = buf.put_marker(Opcode::IFEQ);
        buf.emit(Instruction::new(Opcode::NOP));
        buf.fixup_here(marker);
        assert_eq!(buf.as_slice()[0].arg0, Value::Int(2));
    }

    #[test]
    fn unpatched_marker_is_detectable_before_assembly() {
        let mut buf = IcodeBuffer::new();
        buf.put_marker(Opcode::GOTO);
        assert!(!buf.all_fixed_up());
        assert_eq!(buf.pending_count(), 1);
    }

    #[test]
    #[should_panic(expected = "unpatched")]
    fn into_program_panics_on_unpatched_marker() {
        let mut buf = IcodeBuffer::new();
        buf.put_marker(Opcode::GOTO);
        let _ = buf.into_program();
    }

    #[test]
    #[should_panic(expected = "already-patched")]
    fn double_fixup_panics() {
        let mut buf = IcodeBuffer::new();
        let marker = buf.put_marker(Opcode::GOTO);
        buf.fixup_here(marker);
        buf.fixup_here(marker);
    }

    #[test]
    fn two_markers_for_if_else_patch_independently() {
        // if (cond) { A } else { B } -- false-branch jump patched to B's
        // start, jump-over-else patched to after B.
        let mut buf = IcodeBuffer::new();
        let to_else = buf.put_marker(Opcode::IFEQ);
        buf.emit(Instruction::new(Opcode::NOP)); // A
        let over_else = buf.put_marker(Opcode::GOTO);
        buf.fixup_here(to_else);
        buf.emit(Instruction::new(Opcode::NOP)); // B
        buf.fixup_here(over_else);
        let prog = buf.into_program();
        assert_eq!(prog[0].arg0, Value::Int(2));
        assert_eq!(prog[2].arg0, Value::Int(4));
    }
}
