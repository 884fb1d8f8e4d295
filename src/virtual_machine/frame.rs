use std::rc::Rc;

use crate::class_file::unvalidated::Error as DecodeError;
use crate::class_file::unvalidated::Instruction;
use crate::class_file::validated::ClassFile;
use crate::class_file::validated::MethodBody;
use crate::class_file::validated::MethodHandle;
use crate::virtual_machine::value::{ArrayElement, ArrayRef, Handle, Value};
use crate::virtual_machine::Fault;

/// A fixed-capacity operand stack. Capacity is counted in words, the unit `max_stack` is
/// declared in, so a long or double uses two words of it even though it is one entry.
#[derive(Debug)]
pub struct OperandStack {
    values: Vec<Value>,
    words: usize,
    max_words: usize,
}

impl OperandStack {
    pub fn new(max_words: u16) -> Self {
        OperandStack {
            values: Vec::with_capacity(max_words as usize),
            words: 0,
            max_words: max_words as usize,
        }
    }

    /// Number of entries, counting a long or double once.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn words(&self) -> usize {
        self.words
    }

    pub fn max_words(&self) -> usize {
        self.max_words
    }

    pub fn push(&mut self, value: Value) -> Result<(), Fault> {
        let words = value.words();
        if self.words + words > self.max_words {
            return Err(Fault::StackCorruption("operand stack overflow"));
        }
        self.words += words;
        self.values.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, Fault> {
        let value = self
            .values
            .pop()
            .ok_or(Fault::StackCorruption("operand stack underflow"))?;
        self.words -= value.words();
        Ok(value)
    }

    pub fn peek(&self) -> Option<&Value> {
        self.values.last()
    }

    /// Pop entries until exactly `words` words are removed, returned in the order they were
    /// pushed. Splitting a long or double across the boundary is a fault.
    pub fn pop_words(&mut self, words: usize) -> Result<Vec<Value>, Fault> {
        let mut taken = Vec::new();
        let mut count = 0;
        while count < words {
            let value = self.pop()?;
            count += value.words();
            taken.push(value);
        }
        if count != words {
            return Err(Fault::StackCorruption(
                "stack operation splits a long or double",
            ));
        }
        taken.reverse();
        Ok(taken)
    }

    pub fn push_int(&mut self, value: i32) -> Result<(), Fault> {
        self.push(Value::Int(value))
    }

    pub fn pop_int(&mut self) -> Result<i32, Fault> {
        match self.pop()? {
            Value::Int(v) => Ok(v),
            other => Err(Fault::type_mismatch("int", &other)),
        }
    }

    pub fn push_long(&mut self, value: i64) -> Result<(), Fault> {
        self.push(Value::Long(value))
    }

    pub fn pop_long(&mut self) -> Result<i64, Fault> {
        match self.pop()? {
            Value::Long(v) => Ok(v),
            other => Err(Fault::type_mismatch("long", &other)),
        }
    }

    pub fn push_float(&mut self, value: f32) -> Result<(), Fault> {
        self.push(Value::Float(value))
    }

    pub fn pop_float(&mut self) -> Result<f32, Fault> {
        match self.pop()? {
            Value::Float(v) => Ok(v),
            other => Err(Fault::type_mismatch("float", &other)),
        }
    }

    pub fn push_double(&mut self, value: f64) -> Result<(), Fault> {
        self.push(Value::Double(value))
    }

    pub fn pop_double(&mut self) -> Result<f64, Fault> {
        match self.pop()? {
            Value::Double(v) => Ok(v),
            other => Err(Fault::type_mismatch("double", &other)),
        }
    }

    pub fn push_ref(&mut self, value: Option<Handle>) -> Result<(), Fault> {
        self.push(Value::Reference(value))
    }

    pub fn pop_ref(&mut self) -> Result<Option<Handle>, Fault> {
        match self.pop()? {
            Value::Reference(v) => Ok(v),
            other => Err(Fault::type_mismatch("reference", &other)),
        }
    }

    pub fn push_array<T: ArrayElement>(&mut self, array: ArrayRef<T>) -> Result<(), Fault> {
        self.push_ref(Some(T::into_handle(array)))
    }

    /// Pop a non-null array of element type `T`.
    pub fn pop_array<T: ArrayElement>(&mut self) -> Result<ArrayRef<T>, Fault> {
        match self.pop_ref()? {
            None => Err(Fault::NullReference),
            Some(handle) => match T::from_handle(&handle) {
                Some(array) => Ok(array.clone()),
                None => Err(Fault::TypeMismatch {
                    expected: T::TYPE_NAME,
                    found: handle.type_name(),
                }),
            },
        }
    }
}

/// Local variable slots. A long or double stored at `n` also claims `n + 1`, which reads as
/// unset until something else is stored there.
#[derive(Debug)]
pub struct Locals {
    slots: Vec<Option<Value>>,
}

impl Locals {
    pub fn new(max_locals: u16) -> Self {
        Locals {
            slots: vec![None; max_locals as usize],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, idx: u16) -> Result<&Value, Fault> {
        match self.slots.get(idx as usize) {
            None => Err(Fault::InvalidLocalIndex(idx)),
            Some(None) => Err(Fault::UninitializedLocal(idx)),
            Some(Some(value)) => Ok(value),
        }
    }

    pub fn set(&mut self, idx: u16, value: Value) -> Result<(), Fault> {
        let i = idx as usize;
        let last = i + value.words() - 1;
        if last >= self.slots.len() {
            return Err(Fault::InvalidLocalIndex(idx));
        }
        // overwriting the upper half of a long or double invalidates it
        if i > 0 {
            if let Some(Some(prev)) = self.slots.get(i - 1) {
                if prev.is_wide() {
                    self.slots[i - 1] = None;
                }
            }
        }
        if last != i {
            self.slots[last] = None;
        }
        self.slots[i] = Some(value);
        Ok(())
    }

    pub fn get_int(&self, idx: u16) -> Result<i32, Fault> {
        match self.get(idx)? {
            Value::Int(v) => Ok(*v),
            other => Err(Fault::type_mismatch("int", other)),
        }
    }

    pub fn set_int(&mut self, idx: u16, value: i32) -> Result<(), Fault> {
        self.set(idx, Value::Int(value))
    }

    pub fn get_long(&self, idx: u16) -> Result<i64, Fault> {
        match self.get(idx)? {
            Value::Long(v) => Ok(*v),
            other => Err(Fault::type_mismatch("long", other)),
        }
    }

    pub fn set_long(&mut self, idx: u16, value: i64) -> Result<(), Fault> {
        self.set(idx, Value::Long(value))
    }

    pub fn get_float(&self, idx: u16) -> Result<f32, Fault> {
        match self.get(idx)? {
            Value::Float(v) => Ok(*v),
            other => Err(Fault::type_mismatch("float", other)),
        }
    }

    pub fn set_float(&mut self, idx: u16, value: f32) -> Result<(), Fault> {
        self.set(idx, Value::Float(value))
    }

    pub fn get_double(&self, idx: u16) -> Result<f64, Fault> {
        match self.get(idx)? {
            Value::Double(v) => Ok(*v),
            other => Err(Fault::type_mismatch("double", other)),
        }
    }

    pub fn set_double(&mut self, idx: u16, value: f64) -> Result<(), Fault> {
        self.set(idx, Value::Double(value))
    }

    pub fn get_ref(&self, idx: u16) -> Result<Option<Handle>, Fault> {
        match self.get(idx)? {
            Value::Reference(v) => Ok(v.clone()),
            other => Err(Fault::type_mismatch("reference", other)),
        }
    }

    pub fn set_ref(&mut self, idx: u16, value: Option<Handle>) -> Result<(), Fault> {
        self.set(idx, Value::Reference(value))
    }
}

/// One activation of a method. `pc` is the address of the next instruction to run in this
/// frame, and only moves while this frame is on top of the thread's stack.
#[derive(Debug)]
pub struct Frame {
    pub(crate) class: Rc<ClassFile>,
    pub(crate) method: Rc<MethodHandle>,
    pub(crate) body: Rc<MethodBody>,
    pub pc: u32,
    pub locals: Locals,
    pub stack: OperandStack,
}

impl Frame {
    /// A fresh frame for `method`, declared by `class`. Methods without code (native or
    /// abstract) cannot be framed.
    pub fn new(class: Rc<ClassFile>, method: Rc<MethodHandle>) -> Result<Frame, Fault> {
        let body = match method.body.as_ref() {
            Some(body) => Rc::clone(body),
            None => {
                return Err(Fault::NoCode(format!(
                    "{}.{}{}",
                    class.name(),
                    method.name,
                    method.desc
                )));
            }
        };
        Ok(Frame {
            locals: Locals::new(body.max_locals),
            stack: OperandStack::new(body.max_stack),
            class,
            method,
            body,
            pc: 0,
        })
    }

    /// Place `args` into locals starting at 0, each long or double taking two indices.
    pub fn with_args(mut self, args: Vec<Value>) -> Result<Frame, Fault> {
        let mut idx = 0u16;
        for arg in args.into_iter() {
            let words = arg.words() as u16;
            self.locals.set(idx, arg)?;
            idx += words;
        }
        Ok(self)
    }

    pub fn class(&self) -> &Rc<ClassFile> {
        &self.class
    }

    pub fn method(&self) -> &Rc<MethodHandle> {
        &self.method
    }

    pub fn body(&self) -> &Rc<MethodBody> {
        &self.body
    }

    /// Decode the instruction at `pc`, along with its encoded width.
    pub fn current_instruction(&self) -> Result<(Instruction, usize), DecodeError> {
        self.body.instruction_at(self.pc)
    }
}
