//! The stack-machine dispatch loop.
//!
//! Machine state is a fixed 255-slot operand stack plus an instruction
//! pointer into the current function's program. Activations are
//! delineated by `CALL`/`RETURN`: a function's locals live on the same
//! operand stack at offsets relative to a saved base, so there is no
//! separate locals array to keep in sync with the stack.

use crate::heap::{ElementKind, HeapMap};
use cx_core::error::RuntimeErrorCode;
use cx_core::instr::{Instruction, Opcode, Program};
use cx_core::value::{HeapAddr, SymbolId, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Capacity of the operand stack, as fixed by the calling convention
/// (`stack overflow` is a fatal condition, not a growable Vec).
pub const STACK_CAPACITY: usize = 255;

/// One compiled function, as handed to the VM: its assembled
/// instructions, the activation's total local slot count, how many of
/// those are bound by value parameters, and whether it returns a value.
#[derive(Debug, Clone)]
pub struct FunctionDescriptor {
    pub program: Program,
    pub local_size: i32,
    pub param_count: i32,
    pub has_return: bool,
}

/// Every function a translation produced, keyed by the symbol id
/// `cx_compiler` assigned it.
pub struct ProgramTable {
    functions: HashMap<SymbolId, FunctionDescriptor>,
}

impl ProgramTable {
    pub fn new(functions: HashMap<SymbolId, FunctionDescriptor>) -> Self {
        ProgramTable { functions }
    }

    fn get(&self, id: SymbolId) -> Option<&FunctionDescriptor> {
        self.functions.get(&id)
    }
}

struct Frame {
    return_function: SymbolId,
    return_ip: usize,
    base: usize,
}

/// Held across a host-driven `run`/`step` sequence to serialize
/// invocation of a single `Vm` instance from multiple threads. Distinct
/// instances never share a lock and may run concurrently, one per host
/// thread.
pub struct InvocationGuard<'a>(#[allow(dead_code)] MutexGuard<'a, ()>);

/// A single VM instance: one operand stack, one heap, one active call
/// chain. Multiple instances may run in parallel, each pinned to its own
/// host thread.
pub struct Vm {
    program: ProgramTable,
    heap: HeapMap,
    stack: [Value; STACK_CAPACITY],
    sp: usize,
    ip: usize,
    current: SymbolId,
    frames: Vec<Frame>,
    invocation_lock: Mutex<()>,
}

impl Vm {
    /// Build a machine ready to run `entry`, with its activation already
    /// installed at the bottom of the stack.
    pub fn new(program: ProgramTable, entry: SymbolId) -> Result<Self, RuntimeErrorCode> {
        let local_size = {
            let desc = program.get(entry).ok_or(RuntimeErrorCode::InvalidFunctionArgument)?;
            desc.local_size.max(0) as usize
        };
        if local_size > STACK_CAPACITY {
            return Err(RuntimeErrorCode::StackOverflow);
        }
        Ok(Vm {
            program,
            heap: HeapMap::new(),
            stack: [Value::None; STACK_CAPACITY],
            sp: local_size,
            ip: 0,
            current: entry,
            frames: Vec::new(),
            invocation_lock: Mutex::new(()),
        })
    }

    /// Serializes host-driven invocation of this instance. Does not
    /// guard the dispatch loop itself (`run`/`step` already require
    /// exclusive `&mut self`); this is for a host that wants to hold the
    /// same `Vm` across calls from more than one thread.
    pub fn lock(&self) -> InvocationGuard<'_> {
        InvocationGuard(self.invocation_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    /// Run to completion, returning the entry function's return value
    /// (`0` for `void main`).
    pub fn run(&mut self) -> Result<i32, RuntimeErrorCode> {
        loop {
            if let Some(exit) = self.step()? {
                return Ok(exit);
            }
        }
    }

    fn base(&self) -> usize {
        self.frames.last().map(|f| f.base).unwrap_or(0)
    }

    fn current_program(&self) -> &Program {
        &self.program.get(self.current).expect("current function must resolve").program
    }

    fn fetch(&self) -> Instruction {
        self.current_program()[self.ip]
    }

    fn push(&mut self, v: Value) -> Result<(), RuntimeErrorCode> {
        if self.sp >= STACK_CAPACITY {
            return Err(RuntimeErrorCode::StackOverflow);
        }
        self.stack[self.sp] = v;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.sp -= 1;
        std::mem::replace(&mut self.stack[self.sp], Value::None)
    }

    fn local(&self, offset: i32) -> Value {
        self.stack[self.base() + offset as usize]
    }

    fn set_local(&mut self, offset: i32, v: Value) {
        let idx = self.base() + offset as usize;
        self.stack[idx] = v;
    }

    /// Stores `new_val` into a pointer-valued local, retaining the new
    /// reference before releasing whatever reference the slot held, in
    /// that order (self-assignment safe, mirroring `TypeArena::set_type`).
    fn store_pointer_local(&mut self, offset: i32, new_val: Value) {
        if let Value::Pointer(addr) = new_val {
            self.heap.retain(addr);
        }
        let idx = self.base() + offset as usize;
        if let Value::Pointer(old) = self.stack[idx] {
            self.heap.release(old);
        }
        self.stack[idx] = new_val;
    }

    fn pop_int(&mut self) -> Result<i32, RuntimeErrorCode> {
        self.pop().as_int().ok_or(RuntimeErrorCode::InvalidFunctionArgument)
    }

    fn pop_long(&mut self) -> Result<i64, RuntimeErrorCode> {
        self.pop().as_long().ok_or(RuntimeErrorCode::InvalidFunctionArgument)
    }

    fn pop_float(&mut self) -> Result<f32, RuntimeErrorCode> {
        self.pop().as_float().ok_or(RuntimeErrorCode::InvalidFunctionArgument)
    }

    fn pop_double(&mut self) -> Result<f64, RuntimeErrorCode> {
        self.pop().as_double().ok_or(RuntimeErrorCode::InvalidFunctionArgument)
    }

    fn pop_bool(&mut self) -> Result<bool, RuntimeErrorCode> {
        self.pop().as_bool().ok_or(RuntimeErrorCode::InvalidFunctionArgument)
    }

    fn pop_pointer(&mut self) -> Result<HeapAddr, RuntimeErrorCode> {
        self.pop().as_pointer().ok_or(RuntimeErrorCode::InvalidFunctionArgument)
    }

    /// Execute one instruction. Returns `Some(exit value)` once the
    /// entry activation returns, `None` to keep running.
    fn step(&mut self) -> Result<Option<i32>, RuntimeErrorCode> {
        let instr = self.fetch();
        self.ip += 1;
        match instr.opcode {
            Opcode::ICONST => {
                let v = instr.arg0.as_int().ok_or(RuntimeErrorCode::InvalidFunctionArgument)?;
                self.push(Value::Int(v))?;
            }
            Opcode::LCONST => {
                let v = instr.arg0.as_long().ok_or(RuntimeErrorCode::InvalidFunctionArgument)?;
                self.push(Value::Long(v))?;
            }
            Opcode::FCONST => {
                let v = instr.arg0.as_float().ok_or(RuntimeErrorCode::InvalidFunctionArgument)?;
                self.push(Value::Float(v))?;
            }
            Opcode::DCONST => {
                let v = instr.arg0.as_double().ok_or(RuntimeErrorCode::InvalidFunctionArgument)?;
                self.push(Value::Double(v))?;
            }

            Opcode::ILOAD | Opcode::BLOAD => {
                let off = instr.arg0.as_int().unwrap_or(0);
                self.push(self.local(off))?;
            }
            Opcode::LLOAD => {
                let off = instr.arg0.as_int().unwrap_or(0);
                self.push(self.local(off))?;
            }
            Opcode::FLOAD => {
                let off = instr.arg0.as_int().unwrap_or(0);
                self.push(self.local(off))?;
            }
            Opcode::DLOAD => {
                let off = instr.arg0.as_int().unwrap_or(0);
                self.push(self.local(off))?;
            }
            Opcode::CLOAD => {
                let off = instr.arg0.as_int().unwrap_or(0);
                self.push(self.local(off))?;
            }
            Opcode::ALOAD | Opcode::PLOAD => {
                let off = instr.arg0.as_int().unwrap_or(0);
                self.push(self.local(off))?;
            }

            Opcode::ISTORE | Opcode::BSTORE => {
                let off = instr.arg0.as_int().unwrap_or(0);
                let v = self.pop();
                self.set_local(off, v);
            }
            Opcode::LSTORE | Opcode::FSTORE | Opcode::DSTORE | Opcode::CSTORE => {
                let off = instr.arg0.as_int().unwrap_or(0);
                let v = self.pop();
                self.set_local(off, v);
            }
            Opcode::ASTORE | Opcode::PSTORE => {
                let off = instr.arg0.as_int().unwrap_or(0);
                let v = self.pop();
                self.store_pointer_local(off, v);
            }

            // --- integer arithmetic ---
            Opcode::IADD => self.binop_int(|a, b| a.wrapping_add(b))?,
            Opcode::ISUB => self.binop_int(|a, b| a.wrapping_sub(b))?,
            Opcode::IMUL => self.binop_int(|a, b| a.wrapping_mul(b))?,
            Opcode::IDIV => {
                let b = self.pop_int()?;
                let a = self.pop_int()?;
                if b == 0 {
                    return Err(RuntimeErrorCode::DivisionByZero);
                }
                self.push(Value::Int(a.wrapping_div(b)))?;
            }
            Opcode::IREM => {
                let b = self.pop_int()?;
                let a = self.pop_int()?;
                if b == 0 {
                    return Err(RuntimeErrorCode::DivisionByZero);
                }
                self.push(Value::Int(a.wrapping_rem(b)))?;
            }
            Opcode::INEG => {
                let a = self.pop_int()?;
                self.push(Value::Int(a.wrapping_neg()))?;
            }

            // --- long arithmetic ---
            Opcode::LADD => self.binop_long(|a, b| a.wrapping_add(b))?,
            Opcode::LSUB => self.binop_long(|a, b| a.wrapping_sub(b))?,
            Opcode::LMUL => self.binop_long(|a, b| a.wrapping_mul(b))?,
            Opcode::LDIV => {
                let b = self.pop_long()?;
                let a = self.pop_long()?;
                if b == 0 {
                    return Err(RuntimeErrorCode::DivisionByZero);
                }
                self.push(Value::Long(a.wrapping_div(b)))?;
            }
            Opcode::LREM => {
                let b = self.pop_long()?;
                let a = self.pop_long()?;
                if b == 0 {
                    return Err(RuntimeErrorCode::DivisionByZero);
                }
                self.push(Value::Long(a.wrapping_rem(b)))?;
            }
            Opcode::LNEG => {
                let a = self.pop_long()?;
                self.push(Value::Long(a.wrapping_neg()))?;
            }

            // --- float arithmetic (IEEE-754; division by zero yields inf/NaN) ---
            Opcode::FADD => self.binop_float(|a, b| a + b)?,
            Opcode::FSUB => self.binop_float(|a, b| a - b)?,
            Opcode::FMUL => self.binop_float(|a, b| a * b)?,
            Opcode::FDIV => self.binop_float(|a, b| a / b)?,
            Opcode::FREM => self.binop_float(|a, b| a % b)?,
            Opcode::FNEG => {
                let a = self.pop_float()?;
                self.push(Value::Float(-a))?;
            }

            // --- double arithmetic ---
            Opcode::DADD => self.binop_double(|a, b| a + b)?,
            Opcode::DSUB => self.binop_double(|a, b| a - b)?,
            Opcode::DMUL => self.binop_double(|a, b| a * b)?,
            Opcode::DDIV => self.binop_double(|a, b| a / b)?,
            Opcode::DREM => self.binop_double(|a, b| a % b)?,
            Opcode::DNEG => {
                let a = self.pop_double()?;
                self.push(Value::Double(-a))?;
            }

            // --- bitwise (integer only) ---
            Opcode::IAND => self.binop_int(|a, b| a & b)?,
            Opcode::IOR => self.binop_int(|a, b| a | b)?,
            Opcode::IXOR => self.binop_int(|a, b| a ^ b)?,
            Opcode::ISHL => self.binop_int(|a, b| a.wrapping_shl(b as u32))?,
            Opcode::ISHR => self.binop_int(|a, b| a.wrapping_shr(b as u32))?,
            Opcode::IUSHR => {
                let b = self.pop_int()?;
                let a = self.pop_int()?;
                self.push(Value::Int(((a as u32).wrapping_shr(b as u32)) as i32))?;
            }
            Opcode::INOT => {
                let a = self.pop_int()?;
                self.push(Value::Int(!a))?;
            }

            // --- conversions ---
            Opcode::I2L => {
                let a = self.pop_int()?;
                self.push(Value::Long(a as i64))?;
            }
            Opcode::I2F => {
                let a = self.pop_int()?;
                self.push(Value::Float(a as f32))?;
            }
            Opcode::I2D => {
                let a = self.pop_int()?;
                self.push(Value::Double(a as f64))?;
            }
            Opcode::L2I => {
                let a = self.pop_long()?;
                self.push(Value::Int(a as i32))?;
            }
            Opcode::L2F => {
                let a = self.pop_long()?;
                self.push(Value::Float(a as f32))?;
            }
            Opcode::L2D => {
                let a = self.pop_long()?;
                self.push(Value::Double(a as f64))?;
            }
            Opcode::F2I => {
                let a = self.pop_float()?;
                self.push(Value::Int(a as i32))?;
            }
            Opcode::F2L => {
                let a = self.pop_float()?;
                self.push(Value::Long(a as i64))?;
            }
            Opcode::F2D => {
                let a = self.pop_float()?;
                self.push(Value::Double(a as f64))?;
            }
            Opcode::D2I => {
                let a = self.pop_double()?;
                self.push(Value::Int(a as i32))?;
            }
            Opcode::D2L => {
                let a = self.pop_double()?;
                self.push(Value::Long(a as i64))?;
            }
            Opcode::D2F => {
                let a = self.pop_double()?;
                self.push(Value::Float(a as f32))?;
            }
            Opcode::I2B => {
                let a = self.pop_int()?;
                self.push(Value::Int(a as i8 as i32))?;
            }
            Opcode::I2C => {
                let a = self.pop_int()?;
                self.push(Value::Char(a as u8))?;
            }
            Opcode::I2S => {
                let a = self.pop_int()?;
                self.push(Value::Int(a as i16 as i32))?;
            }

            // --- comparisons: push -1/0/1 ---
            Opcode::ICMP => {
                let b = self.pop_int()?;
                let a = self.pop_int()?;
                self.push(Value::Int(a.cmp(&b) as i32))?;
            }
            Opcode::LCMP => {
                let b = self.pop_long()?;
                let a = self.pop_long()?;
                self.push(Value::Int(a.cmp(&b) as i32))?;
            }
            Opcode::FCMP => {
                let b = self.pop_float()?;
                let a = self.pop_float()?;
                self.push(Value::Int(a.partial_cmp(&b).map(|o| o as i32).unwrap_or(0)))?;
            }
            Opcode::DCMP => {
                let b = self.pop_double()?;
                let a = self.pop_double()?;
                self.push(Value::Int(a.partial_cmp(&b).map(|o| o as i32).unwrap_or(0)))?;
            }

            // --- branches against zero ---
            Opcode::IFEQ | Opcode::IFNE | Opcode::IFLT | Opcode::IFGE | Opcode::IFGT | Opcode::IFLE => {
                let a = self.pop_int()?;
                let taken = match instr.opcode {
                    Opcode::IFEQ => a == 0,
                    Opcode::IFNE => a != 0,
                    Opcode::IFLT => a < 0,
                    Opcode::IFGE => a >= 0,
                    Opcode::IFGT => a > 0,
                    Opcode::IFLE => a <= 0,
                    _ => unreachable!(),
                };
                if taken {
                    self.ip = self.branch_target(&instr)?;
                }
            }

            // --- branches comparing two popped ints ---
            Opcode::IF_ICMPEQ
            | Opcode::IF_ICMPNE
            | Opcode::IF_ICMPLT
            | Opcode::IF_ICMPGE
            | Opcode::IF_ICMPGT
            | Opcode::IF_ICMPLE => {
                let b = self.pop_int()?;
                let a = self.pop_int()?;
                let taken = match instr.opcode {
                    Opcode::IF_ICMPEQ => a == b,
                    Opcode::IF_ICMPNE => a != b,
                    Opcode::IF_ICMPLT => a < b,
                    Opcode::IF_ICMPGE => a >= b,
                    Opcode::IF_ICMPGT => a > b,
                    Opcode::IF_ICMPLE => a <= b,
                    _ => unreachable!(),
                };
                if taken {
                    self.ip = self.branch_target(&instr)?;
                }
            }

            Opcode::GOTO | Opcode::GOTO_W => {
                self.ip = self.branch_target(&instr)?;
            }
            Opcode::JSR => {
                self.push(Value::Int(self.ip as i32))?;
                self.ip = self.branch_target(&instr)?;
            }
            Opcode::RET => {
                let target = self.pop_int()?;
                self.ip = target as usize;
            }
            Opcode::TABLESWITCH | Opcode::LOOKUPSWITCH => {
                return Err(RuntimeErrorCode::UnimplementedRuntimeFeature);
            }

            // --- arrays ---
            Opcode::NEWARRAY => {
                let count = instr.arg0.as_int().ok_or(RuntimeErrorCode::InvalidFunctionArgument)?;
                let tag = instr.arg1.as_int().unwrap_or(0);
                let addr = self.heap.alloc_array(count, ElementKind::from_tag(tag));
                self.push(Value::Pointer(addr))?;
            }
            Opcode::ANEWARRAY | Opcode::MULTIANEWARRAY => {
                return Err(RuntimeErrorCode::UnimplementedRuntimeFeature);
            }
            Opcode::IALOAD | Opcode::LALOAD | Opcode::FALOAD | Opcode::DALOAD | Opcode::CALOAD | Opcode::BALOAD | Opcode::AALOAD => {
                let index = self.pop_int()?;
                let addr = self.pop_pointer()?;
                let v = self.heap.load(addr, index)?;
                self.push(v)?;
            }
            Opcode::IASTORE | Opcode::LASTORE | Opcode::FASTORE | Opcode::DASTORE | Opcode::CASTORE | Opcode::BASTORE | Opcode::AASTORE => {
                let value = self.pop();
                let index = self.pop_int()?;
                let addr = self.pop_pointer()?;
                self.heap.store(addr, index, value)?;
            }
            Opcode::ARRAYLENGTH => {
                let addr = self.pop_pointer()?;
                let len = self.heap.length_of(addr)?;
                self.push(Value::Int(len))?;
            }

            // --- record fields: no record type is emitted yet ---
            Opcode::GETFIELD | Opcode::PUTFIELD => {
                return Err(RuntimeErrorCode::UnimplementedRuntimeFeature);
            }

            // --- stack shaping ---
            Opcode::DUP => {
                let v = self.stack[self.sp - 1];
                self.push(v)?;
            }
            Opcode::DUP2 => {
                let a = self.stack[self.sp - 2];
                let b = self.stack[self.sp - 1];
                self.push(a)?;
                self.push(b)?;
            }
            Opcode::DUP_X1 => {
                let top = self.pop();
                let under = self.pop();
                self.push(top)?;
                self.push(under)?;
                self.push(top)?;
            }
            Opcode::DUP_X2 => {
                let top = self.pop();
                let mid = self.pop();
                let bot = self.pop();
                self.push(top)?;
                self.push(bot)?;
                self.push(mid)?;
                self.push(top)?;
            }
            Opcode::DUP2_X1 => {
                let top = self.pop();
                let mid = self.pop();
                let bot = self.pop();
                self.push(mid)?;
                self.push(top)?;
                self.push(bot)?;
                self.push(mid)?;
                self.push(top)?;
            }
            Opcode::DUP2_X2 => {
                let a = self.pop();
                let b = self.pop();
                let c = self.pop();
                let d = self.pop();
                self.push(b)?;
                self.push(a)?;
                self.push(d)?;
                self.push(c)?;
                self.push(b)?;
                self.push(a)?;
            }
            Opcode::POP => {
                self.pop();
            }
            Opcode::POP2 => {
                self.pop();
                self.pop();
            }
            Opcode::SWAP => {
                let a = self.pop();
                let b = self.pop();
                self.push(a)?;
                self.push(b)?;
            }

            // --- calling convention ---
            Opcode::CALL => return self.dispatch_call(&instr).map(|()| None),
            Opcode::RETURN => return self.dispatch_return(None),
            Opcode::IRETURN | Opcode::FRETURN | Opcode::DRETURN | Opcode::LRETURN | Opcode::ARETURN => {
                let v = self.pop();
                return self.dispatch_return(Some(v));
            }

            // --- misc ---
            Opcode::NOP => {}
            Opcode::HALT => {
                let code = self.pop().as_int().unwrap_or(0);
                return Ok(Some(code));
            }
            Opcode::ATHROW | Opcode::INSTANCEOF | Opcode::CHECKCAST => {
                return Err(RuntimeErrorCode::UnimplementedRuntimeFeature);
            }
            Opcode::MONITORENTER | Opcode::MONITOREXIT => {
                // Dispatch already runs under the caller's exclusive `&mut
                // self`; there is nothing further to serialize here. See
                // `Vm::lock` for the host-facing per-instance lock these
                // opcodes would coordinate with in a multi-threaded embedder.
            }
        }
        Ok(None)
    }

    fn branch_target(&self, instr: &Instruction) -> Result<usize, RuntimeErrorCode> {
        let target = instr.arg0.as_int().ok_or(RuntimeErrorCode::InvalidFunctionArgument)?;
        if target < 0 {
            return Err(RuntimeErrorCode::InvalidFunctionArgument);
        }
        Ok(target as usize)
    }

    fn binop_int(&mut self, f: impl Fn(i32, i32) -> i32) -> Result<(), RuntimeErrorCode> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.push(Value::Int(f(a, b)))
    }

    fn binop_long(&mut self, f: impl Fn(i64, i64) -> i64) -> Result<(), RuntimeErrorCode> {
        let b = self.pop_long()?;
        let a = self.pop_long()?;
        self.push(Value::Long(f(a, b)))
    }

    fn binop_float(&mut self, f: impl Fn(f32, f32) -> f32) -> Result<(), RuntimeErrorCode> {
        let b = self.pop_float()?;
        let a = self.pop_float()?;
        self.push(Value::Float(f(a, b)))
    }

    fn binop_double(&mut self, f: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeErrorCode> {
        let b = self.pop_double()?;
        let a = self.pop_double()?;
        self.push(Value::Double(f(a, b)))
    }

    fn dispatch_call(&mut self, instr: &Instruction) -> Result<(), RuntimeErrorCode> {
        let callee = instr.arg0.as_symbol().ok_or(RuntimeErrorCode::InvalidFunctionArgument)?;
        let argc = instr.arg1.as_int().ok_or(RuntimeErrorCode::InvalidFunctionArgument)?.max(0) as usize;
        let desc = self.program.get(callee).ok_or(RuntimeErrorCode::InvalidFunctionArgument)?;
        let local_size = desc.local_size.max(0) as usize;
        if local_size < argc {
            return Err(RuntimeErrorCode::InvalidFunctionArgument);
        }
        let new_base = self.sp - argc;
        // Arguments already on the stack become the callee's locals;
        // retain any array pointers among them the same way a variable
        // declaration's `ASTORE` would.
        for slot in new_base..new_base + argc {
            if let Value::Pointer(addr) = self.stack[slot] {
                self.heap.retain(addr);
            }
        }
        if new_base + local_size > STACK_CAPACITY {
            return Err(RuntimeErrorCode::StackOverflow);
        }
        for slot in new_base + argc..new_base + local_size {
            self.stack[slot] = Value::None;
        }
        self.frames.push(Frame {
            return_function: self.current,
            return_ip: self.ip,
            base: new_base,
        });
        self.sp = new_base + local_size;
        self.current = callee;
        self.ip = 0;
        Ok(())
    }

    fn dispatch_return(&mut self, value: Option<Value>) -> Result<Option<i32>, RuntimeErrorCode> {
        let desc = self.program.get(self.current).expect("current function must resolve");
        let local_size = desc.local_size.max(0) as usize;
        let base = self.base();
        let protected = value.and_then(|v| v.as_pointer());
        for slot in base..base + local_size {
            if let Value::Pointer(addr) = self.stack[slot] {
                if Some(addr) != protected {
                    self.heap.release(addr);
                }
            }
        }
        self.sp = base;
        match self.frames.pop() {
            None => {
                // Returning from the entry activation: the program's own
                // exit value, or 0 for `void main`.
                Ok(Some(value.and_then(|v| v.as_int()).unwrap_or(0)))
            }
            Some(frame) => {
                self.current = frame.return_function;
                self.ip = frame.return_ip;
                if let Some(v) = value {
                    self.push(v)?;
                }
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cx_core::value::Value;
    use std::collections::HashMap;

    fn sym(n: u32) -> SymbolId {
        SymbolId(n)
    }

    fn single_function_table(program: Program, local_size: i32, has_return: bool) -> ProgramTable {
        let mut functions = HashMap::new();
        functions.insert(sym(0), FunctionDescriptor { program, local_size, param_count: 0, has_return });
        ProgramTable::new(functions)
    }

    #[test]
    fn arithmetic_expression() {
        // 2 + 3 * 4
        let program = vec![
            Instruction::with_arg0(Opcode::ICONST, Value::Int(2)),
            Instruction::with_arg0(Opcode::ICONST, Value::Int(3)),
            Instruction::with_arg0(Opcode::ICONST, Value::Int(4)),
            Instruction::new(Opcode::IMUL),
            Instruction::new(Opcode::IADD),
            Instruction::new(Opcode::IRETURN),
        ];
        let mut vm = Vm::new(single_function_table(program, 0, true), sym(0)).unwrap();
        assert_eq!(vm.run().unwrap(), 14);
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let program = vec![
            Instruction::with_arg0(Opcode::ICONST, Value::Int(1)),
            Instruction::with_arg0(Opcode::ICONST, Value::Int(0)),
            Instruction::new(Opcode::IDIV),
            Instruction::new(Opcode::IRETURN),
        ];
        let mut vm = Vm::new(single_function_table(program, 0, true), sym(0)).unwrap();
        assert_eq!(vm.run(), Err(RuntimeErrorCode::DivisionByZero));
    }

    #[test]
    fn array_bounds_are_enforced() {
        // int a[3]; a[3] = 1;
        let program = vec![
            Instruction::with_args(Opcode::NEWARRAY, Value::Int(3), Value::Int(0)),
            Instruction::with_arg0(Opcode::ASTORE, Value::Int(0)),
            Instruction::with_arg0(Opcode::ALOAD, Value::Int(0)),
            Instruction::with_arg0(Opcode::ICONST, Value::Int(3)),
            Instruction::with_arg0(Opcode::ICONST, Value::Int(1)),
            Instruction::new(Opcode::IASTORE),
            Instruction::new(Opcode::RETURN),
        ];
        let mut vm = Vm::new(single_function_table(program, 1, false), sym(0)).unwrap();
        assert_eq!(vm.run(), Err(RuntimeErrorCode::ValueOutOfRange));
    }

    #[test]
    fn call_and_return_thread_a_value_through_two_activations() {
        // fn add_one(x) { return x + 1; }  fn main() { return add_one(41); }
        let add_one = vec![
            Instruction::with_arg0(Opcode::ILOAD, Value::Int(0)),
            Instruction::with_arg0(Opcode::ICONST, Value::Int(1)),
            Instruction::new(Opcode::IADD),
            Instruction::new(Opcode::IRETURN),
        ];
        let main_fn = vec![
            Instruction::with_arg0(Opcode::ICONST, Value::Int(41)),
            Instruction::with_args(Opcode::CALL, Value::SymbolRef(sym(1)), Value::Int(1)),
            Instruction::new(Opcode::IRETURN),
        ];
        let mut functions = HashMap::new();
        functions.insert(sym(0), FunctionDescriptor { program: main_fn, local_size: 0, param_count: 0, has_return: true });
        functions.insert(sym(1), FunctionDescriptor { program: add_one, local_size: 1, param_count: 1, has_return: true });
        let mut vm = Vm::new(ProgramTable::new(functions), sym(0)).unwrap();
        assert_eq!(vm.run().unwrap(), 42);
    }

    #[test]
    fn returning_an_array_does_not_free_it_out_from_under_the_caller() {
        // fn make() { int a[1]; a[0] = 7; return a; }  fn main() { return make()[0]; }
        let make_fn = vec![
            Instruction::with_args(Opcode::NEWARRAY, Value::Int(1), Value::Int(0)),
            Instruction::with_arg0(Opcode::ASTORE, Value::Int(0)),
            Instruction::with_arg0(Opcode::ALOAD, Value::Int(0)),
            Instruction::with_arg0(Opcode::ICONST, Value::Int(0)),
            Instruction::with_arg0(Opcode::ICONST, Value::Int(7)),
            Instruction::new(Opcode::IASTORE),
            Instruction::with_arg0(Opcode::ALOAD, Value::Int(0)),
            Instruction::new(Opcode::ARETURN),
        ];
        let main_fn = vec![
            Instruction::with_args(Opcode::CALL, Value::SymbolRef(sym(1)), Value::Int(0)),
            Instruction::with_arg0(Opcode::ICONST, Value::Int(0)),
            Instruction::new(Opcode::IALOAD),
            Instruction::new(Opcode::IRETURN),
        ];
        let mut functions = HashMap::new();
        functions.insert(sym(0), FunctionDescriptor { program: main_fn, local_size: 0, param_count: 0, has_return: true });
        functions.insert(sym(1), FunctionDescriptor { program: make_fn, local_size: 1, param_count: 0, has_return: true });
        let mut vm = Vm::new(ProgramTable::new(functions), sym(0)).unwrap();
        assert_eq!(vm.run().unwrap(), 7);
    }
}
