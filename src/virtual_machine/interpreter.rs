//! One instruction at a time. `step` runs the instruction at the current frame's pc and says
//! what should happen next; `apply` makes it happen to the thread. Keeping the two apart lets a
//! host look at (or refuse) an action before it takes effect.

use std::cmp::Ordering;
use std::convert::TryFrom;
use std::rc::Rc;

use log::debug;

use crate::class_file::descriptor::{FieldType, MethodDescriptor};
use crate::class_file::unvalidated::instruction::ArrayType;
use crate::class_file::unvalidated::ConstantIdx;
use crate::class_file::unvalidated::Instruction;
use crate::class_file::validated::ClassFile;
use crate::class_file::validated::Constant;
use crate::class_file::validated::FieldHandle;
use crate::class_file::validated::MethodHandle;
use crate::class_file::validated::Resolved;
use crate::virtual_machine::class_loader::ClassLoader;
use crate::virtual_machine::frame::{Frame, OperandStack};
use crate::virtual_machine::thread::Thread;
use crate::virtual_machine::value::{ArrayElement, ArrayRef, Handle, Value};
use crate::virtual_machine::Fault;

/// Per-thread bounds the instructions themselves enforce.
#[derive(Debug, Clone, Copy)]
struct Limits {
    max_array_length: usize,
}

#[derive(Debug)]
pub enum NextAction {
    /// Keep running the current frame from this pc.
    ContinueAt(u32),
    /// Push `frames`, last one on top, after leaving the current frame to resume at
    /// `return_pc`.
    Invoke { frames: Vec<Frame>, return_pc: u32 },
    /// Pop the current frame, handing its return value, if any, to the caller.
    ReturnToCaller(Option<Value>),
}

/// Execute the instruction at the current frame's pc.
pub fn step(thread: &mut Thread, loader: &ClassLoader) -> Result<NextAction, Fault> {
    let max_array_length = thread.max_array_length();
    let frame = thread.current_frame_mut().ok_or(Fault::NoFrame)?;
    let pc = frame.pc;
    if pc as usize >= frame.body().code().len() {
        return Err(Fault::PcOutOfRange(pc));
    }
    let (instruction, width) = frame.current_instruction()?;
    let next = pc + width as u32;
    let limits = Limits { max_array_length };
    execute(frame, loader, limits, &instruction, pc, next)
}

pub fn apply(thread: &mut Thread, action: NextAction) -> Result<(), Fault> {
    match action {
        NextAction::ContinueAt(pc) => {
            thread.current_frame_mut().ok_or(Fault::NoFrame)?.pc = pc;
        }
        NextAction::Invoke { frames, return_pc } => {
            if thread.depth() + frames.len() > thread.max_depth() {
                return Err(Fault::CallDepthExceeded(thread.max_depth()));
            }
            thread.current_frame_mut().ok_or(Fault::NoFrame)?.pc = return_pc;
            for frame in frames.into_iter() {
                thread.push_frame(frame)?;
            }
        }
        NextAction::ReturnToCaller(value) => {
            thread.pop_frame().ok_or(Fault::NoFrame)?;
            match thread.current_frame_mut() {
                Some(caller) => {
                    if let Some(value) = value {
                        caller.stack.push(value)?;
                    }
                }
                None => thread.complete(value),
            }
        }
    }
    Ok(())
}

/// Frames for the `<clinit>` methods that must run before `class` is used: its own and any
/// uninitialized superclasses', ordered so that the last, the topmost superclass, runs first.
/// Classes are marked initialized as their frames are created, so no initializer runs twice.
pub fn initialization_frames(
    loader: &ClassLoader,
    class: &Rc<ClassFile>,
) -> Result<Vec<Frame>, Fault> {
    loader.link(class)?;
    let mut frames = Vec::new();
    let mut current = Some(Rc::clone(class));
    while let Some(c) = current {
        // an initialized class has initialized superclasses
        if c.is_initialized() {
            break;
        }
        c.mark_initialized();
        if let Some(clinit) = c.class_initializer() {
            debug!("initializing class {}", c.name());
            frames.push(Frame::new(Rc::clone(&c), clinit)?);
        }
        current = c.super_link();
    }
    Ok(frames)
}

fn unimplemented(instruction: &Instruction) -> Fault {
    Fault::UnimplementedOpcode {
        opcode: instruction.opcode(),
        mnemonic: instruction.mnemonic(),
    }
}

fn branch(pc: u32, offset: i32) -> Result<NextAction, Fault> {
    let target = i64::from(pc) + i64::from(offset);
    u32::try_from(target)
        .map(NextAction::ContinueAt)
        .map_err(|_| Fault::PcOutOfRange(pc))
}

fn branch_if(taken: bool, pc: u32, offset: i16, next: u32) -> Result<NextAction, Fault> {
    if taken {
        branch(pc, i32::from(offset))
    } else {
        Ok(NextAction::ContinueAt(next))
    }
}

fn type_label(ty: Option<&FieldType>) -> &'static str {
    match ty {
        None => "void",
        Some(FieldType::Long) => "long",
        Some(FieldType::Float) => "float",
        Some(FieldType::Double) => "double",
        Some(FieldType::Object(_)) | Some(FieldType::Array(_)) => "reference",
        Some(_) => "int",
    }
}

/// Narrow an int headed for storage of type `ty`, as the JVM does for boolean, byte, char,
/// and short.
fn narrow(value: Value, ty: &FieldType) -> Value {
    match (value, ty) {
        (Value::Int(v), FieldType::Boolean) => Value::Int(v & 1),
        (Value::Int(v), FieldType::Byte) => Value::Int(i32::from(v as i8)),
        (Value::Int(v), FieldType::Char) => Value::Int(i32::from(v as u16)),
        (Value::Int(v), FieldType::Short) => Value::Int(i32::from(v as i16)),
        (value, _) => value,
    }
}

fn int_op<F: FnOnce(i32, i32) -> Result<i32, Fault>>(
    stack: &mut OperandStack,
    op: F,
) -> Result<(), Fault> {
    let right = stack.pop_int()?;
    let left = stack.pop_int()?;
    stack.push_int(op(left, right)?)
}

fn long_op<F: FnOnce(i64, i64) -> Result<i64, Fault>>(
    stack: &mut OperandStack,
    op: F,
) -> Result<(), Fault> {
    let right = stack.pop_long()?;
    let left = stack.pop_long()?;
    stack.push_long(op(left, right)?)
}

/// Long shifts take an int shift count.
fn long_shift<F: FnOnce(i64, u32) -> i64>(stack: &mut OperandStack, op: F) -> Result<(), Fault> {
    let count = stack.pop_int()?;
    let value = stack.pop_long()?;
    stack.push_long(op(value, count as u32))
}

fn float_op<F: FnOnce(f32, f32) -> f32>(stack: &mut OperandStack, op: F) -> Result<(), Fault> {
    let right = stack.pop_float()?;
    let left = stack.pop_float()?;
    stack.push_float(op(left, right))
}

fn double_op<F: FnOnce(f64, f64) -> f64>(stack: &mut OperandStack, op: F) -> Result<(), Fault> {
    let right = stack.pop_double()?;
    let left = stack.pop_double()?;
    stack.push_double(op(left, right))
}

const DIVISION_BY_ZERO: Fault = Fault::Arithmetic("division by zero");

fn int_div(left: i32, right: i32) -> Result<i32, Fault> {
    if right == 0 {
        Err(DIVISION_BY_ZERO)
    } else {
        Ok(left.wrapping_div(right))
    }
}

fn int_rem(left: i32, right: i32) -> Result<i32, Fault> {
    if right == 0 {
        Err(DIVISION_BY_ZERO)
    } else {
        Ok(left.wrapping_rem(right))
    }
}

fn long_div(left: i64, right: i64) -> Result<i64, Fault> {
    if right == 0 {
        Err(DIVISION_BY_ZERO)
    } else {
        Ok(left.wrapping_div(right))
    }
}

fn long_rem(left: i64, right: i64) -> Result<i64, Fault> {
    if right == 0 {
        Err(DIVISION_BY_ZERO)
    } else {
        Ok(left.wrapping_rem(right))
    }
}

/// `fcmp<op>`/`dcmp<op>`: NaN on either side yields `nan_result`.
fn float_compare(left: f64, right: f64, nan_result: i32) -> i32 {
    if left.is_nan() || right.is_nan() {
        nan_result
    } else if left > right {
        1
    } else if left < right {
        -1
    } else {
        0
    }
}

fn array_load<T: ArrayElement, F: FnOnce(T) -> Value>(
    stack: &mut OperandStack,
    to_value: F,
) -> Result<(), Fault> {
    let index = stack.pop_int()?;
    let array = stack.pop_array::<T>()?;
    let element = array.get(index)?;
    stack.push(to_value(element))
}

/// The value has already been popped; the index and array are still on the stack.
fn array_store<T: ArrayElement>(stack: &mut OperandStack, value: T) -> Result<(), Fault> {
    let index = stack.pop_int()?;
    let array = stack.pop_array::<T>()?;
    array.set(index, value)
}

fn push_all(stack: &mut OperandStack, values: &[Value]) -> Result<(), Fault> {
    for value in values.iter() {
        stack.push(value.clone())?;
    }
    Ok(())
}

fn new_array(kind: ArrayType, count: usize) -> Result<Handle, Fault> {
    let handle = match kind {
        ArrayType::Boolean | ArrayType::Byte => Handle::ByteArray(ArrayRef::try_filled(count, 0)?),
        ArrayType::Char => Handle::CharArray(ArrayRef::try_filled(count, 0)?),
        ArrayType::Short => Handle::ShortArray(ArrayRef::try_filled(count, 0)?),
        ArrayType::Int => Handle::IntArray(ArrayRef::try_filled(count, 0)?),
        ArrayType::Long => Handle::LongArray(ArrayRef::try_filled(count, 0)?),
        ArrayType::Float => Handle::FloatArray(ArrayRef::try_filled(count, 0.0)?),
        ArrayType::Double => Handle::DoubleArray(ArrayRef::try_filled(count, 0.0)?),
    };
    Ok(handle)
}

fn array_count(stack: &mut OperandStack, limits: Limits) -> Result<usize, Fault> {
    let count = stack.pop_int()?;
    if count < 0 {
        return Err(Fault::NegativeArraySize(count));
    }
    let count = count as usize;
    if count > limits.max_array_length {
        return Err(Fault::OutOfMemory(count));
    }
    Ok(count)
}

/// Pop a call's arguments, checking each against the descriptor. They come back in
/// declaration order.
fn pop_arguments(
    stack: &mut OperandStack,
    descriptor: &MethodDescriptor,
) -> Result<Vec<Value>, Fault> {
    let mut args = Vec::with_capacity(descriptor.params.len());
    for param in descriptor.params.iter().rev() {
        let value = stack.pop()?;
        if !value.fits(param) {
            return Err(Fault::type_mismatch(type_label(Some(param)), &value));
        }
        args.push(value);
    }
    args.reverse();
    Ok(args)
}

fn resolve_method(
    loader: &ClassLoader,
    class: &ClassFile,
    idx: ConstantIdx,
) -> Result<Resolved<MethodHandle>, Fault> {
    let method_ref = match class.constant(idx) {
        Some(Constant::MethodRef(method_ref)) | Some(Constant::InterfaceMethodRef(method_ref)) => {
            Rc::clone(method_ref)
        }
        _ => {
            return Err(Fault::BadConstant {
                index: idx.inner(),
                expected: "a method reference",
            });
        }
    };
    let resolved = method_ref.resolve_with(|r| {
        debug!("resolving method {}", r);
        let target = loader.load(&r.class_name)?;
        loader.resolve_method(&target, &r.name, &r.desc)
    })?;
    Ok(resolved)
}

fn resolve_static_field(
    loader: &ClassLoader,
    class: &ClassFile,
    idx: ConstantIdx,
) -> Result<Resolved<FieldHandle>, Fault> {
    let field_ref = match class.constant(idx) {
        Some(Constant::FieldRef(field_ref)) => Rc::clone(field_ref),
        _ => {
            return Err(Fault::BadConstant {
                index: idx.inner(),
                expected: "a field reference",
            });
        }
    };
    let resolved = field_ref.resolve_with(|r| {
        debug!("resolving field {}", r);
        let target = loader.load(&r.class_name)?;
        loader.resolve_field(&target, &r.name, &r.desc)
    })?;
    if !resolved.handle.access().is_static() {
        return Err(Fault::IncompatibleClassChange(format!(
            "{}.{} is not static",
            resolved.class.name(),
            resolved.handle.name()
        )));
    }
    Ok(resolved)
}

fn return_value(frame: &mut Frame, value: Option<Value>) -> Result<NextAction, Fault> {
    let ret = frame.method().descriptor().ret.clone();
    match (ret, value) {
        (None, None) => Ok(NextAction::ReturnToCaller(None)),
        (Some(ty), Some(value)) if value.fits(&ty) => {
            Ok(NextAction::ReturnToCaller(Some(narrow(value, &ty))))
        }
        (ret, Some(value)) => Err(Fault::type_mismatch(type_label(ret.as_ref()), &value)),
        (ret, None) => Err(Fault::TypeMismatch {
            expected: type_label(ret.as_ref()),
            found: "void",
        }),
    }
}

fn execute(
    frame: &mut Frame,
    loader: &ClassLoader,
    limits: Limits,
    instruction: &Instruction,
    pc: u32,
    next: u32,
) -> Result<NextAction, Fault> {
    let stack = &mut frame.stack;
    let locals = &mut frame.locals;
    match instruction {
        Instruction::Nop => {}
        Instruction::AConstNull => stack.push_ref(None)?,
        Instruction::IConstM1 => stack.push_int(-1)?,
        Instruction::IConst0 => stack.push_int(0)?,
        Instruction::IConst1 => stack.push_int(1)?,
        Instruction::IConst2 => stack.push_int(2)?,
        Instruction::IConst3 => stack.push_int(3)?,
        Instruction::IConst4 => stack.push_int(4)?,
        Instruction::IConst5 => stack.push_int(5)?,
        Instruction::LConst0 => stack.push_long(0)?,
        Instruction::LConst1 => stack.push_long(1)?,
        Instruction::FConst0 => stack.push_float(0.0)?,
        Instruction::FConst1 => stack.push_float(1.0)?,
        Instruction::FConst2 => stack.push_float(2.0)?,
        Instruction::DConst0 => stack.push_double(0.0)?,
        Instruction::DConst1 => stack.push_double(1.0)?,
        Instruction::BIPush(v) => stack.push_int(i32::from(*v))?,
        Instruction::SIPush(v) => stack.push_int(i32::from(*v))?,
        Instruction::Ldc(idx) | Instruction::LdcW(idx) => {
            let value = match frame.class.constant(*idx) {
                Some(Constant::Integer(v)) => Value::Int(*v),
                Some(Constant::Float(v)) => Value::Float(*v),
                Some(Constant::String(s)) => Value::Reference(Some(Handle::String(Rc::clone(s)))),
                Some(Constant::Class(name)) => {
                    Value::Reference(Some(Handle::Class(Rc::clone(name))))
                }
                // method handles, method types, and dynamic constants need an object model
                Some(Constant::MethodHandle(_, _))
                | Some(Constant::MethodType(_))
                | Some(Constant::Dynamic(_, _)) => return Err(unimplemented(instruction)),
                _ => {
                    return Err(Fault::BadConstant {
                        index: idx.inner(),
                        expected: "a loadable constant",
                    });
                }
            };
            stack.push(value)?;
        }
        Instruction::Ldc2W(idx) => match frame.class.constant(*idx) {
            Some(Constant::Long(v)) => stack.push_long(*v)?,
            Some(Constant::Double(v)) => stack.push_double(*v)?,
            Some(Constant::Dynamic(_, _)) => return Err(unimplemented(instruction)),
            _ => {
                return Err(Fault::BadConstant {
                    index: idx.inner(),
                    expected: "a long or double",
                });
            }
        },

        Instruction::ILoad(idx) => stack.push_int(locals.get_int(*idx)?)?,
        Instruction::LLoad(idx) => stack.push_long(locals.get_long(*idx)?)?,
        Instruction::FLoad(idx) => stack.push_float(locals.get_float(*idx)?)?,
        Instruction::DLoad(idx) => stack.push_double(locals.get_double(*idx)?)?,
        Instruction::ALoad(idx) => stack.push_ref(locals.get_ref(*idx)?)?,
        Instruction::ILoad0 => stack.push_int(locals.get_int(0)?)?,
        Instruction::ILoad1 => stack.push_int(locals.get_int(1)?)?,
        Instruction::ILoad2 => stack.push_int(locals.get_int(2)?)?,
        Instruction::ILoad3 => stack.push_int(locals.get_int(3)?)?,
        Instruction::LLoad0 => stack.push_long(locals.get_long(0)?)?,
        Instruction::LLoad1 => stack.push_long(locals.get_long(1)?)?,
        Instruction::LLoad2 => stack.push_long(locals.get_long(2)?)?,
        Instruction::LLoad3 => stack.push_long(locals.get_long(3)?)?,
        Instruction::FLoad0 => stack.push_float(locals.get_float(0)?)?,
        Instruction::FLoad1 => stack.push_float(locals.get_float(1)?)?,
        Instruction::FLoad2 => stack.push_float(locals.get_float(2)?)?,
        Instruction::FLoad3 => stack.push_float(locals.get_float(3)?)?,
        Instruction::DLoad0 => stack.push_double(locals.get_double(0)?)?,
        Instruction::DLoad1 => stack.push_double(locals.get_double(1)?)?,
        Instruction::DLoad2 => stack.push_double(locals.get_double(2)?)?,
        Instruction::DLoad3 => stack.push_double(locals.get_double(3)?)?,
        Instruction::ALoad0 => stack.push_ref(locals.get_ref(0)?)?,
        Instruction::ALoad1 => stack.push_ref(locals.get_ref(1)?)?,
        Instruction::ALoad2 => stack.push_ref(locals.get_ref(2)?)?,
        Instruction::ALoad3 => stack.push_ref(locals.get_ref(3)?)?,

        Instruction::IALoad => array_load::<i32, _>(stack, Value::Int)?,
        Instruction::LALoad => array_load::<i64, _>(stack, Value::Long)?,
        Instruction::FALoad => array_load::<f32, _>(stack, Value::Float)?,
        Instruction::DALoad => array_load::<f64, _>(stack, Value::Double)?,
        Instruction::AALoad => array_load::<Option<Handle>, _>(stack, Value::Reference)?,
        Instruction::BALoad => array_load::<i8, _>(stack, |v| Value::Int(i32::from(v)))?,
        Instruction::CALoad => array_load::<u16, _>(stack, |v| Value::Int(i32::from(v)))?,
        Instruction::SALoad => array_load::<i16, _>(stack, |v| Value::Int(i32::from(v)))?,

        Instruction::IStore(idx) => locals.set_int(*idx, stack.pop_int()?)?,
        Instruction::LStore(idx) => locals.set_long(*idx, stack.pop_long()?)?,
        Instruction::FStore(idx) => locals.set_float(*idx, stack.pop_float()?)?,
        Instruction::DStore(idx) => locals.set_double(*idx, stack.pop_double()?)?,
        Instruction::AStore(idx) => locals.set_ref(*idx, stack.pop_ref()?)?,
        Instruction::IStore0 => locals.set_int(0, stack.pop_int()?)?,
        Instruction::IStore1 => locals.set_int(1, stack.pop_int()?)?,
        Instruction::IStore2 => locals.set_int(2, stack.pop_int()?)?,
        Instruction::IStore3 => locals.set_int(3, stack.pop_int()?)?,
        Instruction::LStore0 => locals.set_long(0, stack.pop_long()?)?,
        Instruction::LStore1 => locals.set_long(1, stack.pop_long()?)?,
        Instruction::LStore2 => locals.set_long(2, stack.pop_long()?)?,
        Instruction::LStore3 => locals.set_long(3, stack.pop_long()?)?,
        Instruction::FStore0 => locals.set_float(0, stack.pop_float()?)?,
        Instruction::FStore1 => locals.set_float(1, stack.pop_float()?)?,
        Instruction::FStore2 => locals.set_float(2, stack.pop_float()?)?,
        Instruction::FStore3 => locals.set_float(3, stack.pop_float()?)?,
        Instruction::DStore0 => locals.set_double(0, stack.pop_double()?)?,
        Instruction::DStore1 => locals.set_double(1, stack.pop_double()?)?,
        Instruction::DStore2 => locals.set_double(2, stack.pop_double()?)?,
        Instruction::DStore3 => locals.set_double(3, stack.pop_double()?)?,
        Instruction::AStore0 => locals.set_ref(0, stack.pop_ref()?)?,
        Instruction::AStore1 => locals.set_ref(1, stack.pop_ref()?)?,
        Instruction::AStore2 => locals.set_ref(2, stack.pop_ref()?)?,
        Instruction::AStore3 => locals.set_ref(3, stack.pop_ref()?)?,

        Instruction::IAStore => {
            let value = stack.pop_int()?;
            array_store::<i32>(stack, value)?;
        }
        Instruction::LAStore => {
            let value = stack.pop_long()?;
            array_store::<i64>(stack, value)?;
        }
        Instruction::FAStore => {
            let value = stack.pop_float()?;
            array_store::<f32>(stack, value)?;
        }
        Instruction::DAStore => {
            let value = stack.pop_double()?;
            array_store::<f64>(stack, value)?;
        }
        Instruction::AAStore => {
            let value = stack.pop_ref()?;
            array_store::<Option<Handle>>(stack, value)?;
        }
        Instruction::BAStore => {
            let value = stack.pop_int()?;
            array_store::<i8>(stack, value as i8)?;
        }
        Instruction::CAStore => {
            let value = stack.pop_int()?;
            array_store::<u16>(stack, value as u16)?;
        }
        Instruction::SAStore => {
            let value = stack.pop_int()?;
            array_store::<i16>(stack, value as i16)?;
        }

        // The shuffles work in words: `pop_words` refuses to split a long or double, which is
        // exactly the set of stack shapes each form's category rules forbid.
        Instruction::Pop => {
            stack.pop_words(1)?;
        }
        Instruction::Pop2 => {
            stack.pop_words(2)?;
        }
        Instruction::Dup => {
            let top = stack.pop_words(1)?;
            push_all(stack, &top)?;
            push_all(stack, &top)?;
        }
        Instruction::DupX1 => {
            let top = stack.pop_words(1)?;
            let next = stack.pop_words(1)?;
            push_all(stack, &top)?;
            push_all(stack, &next)?;
            push_all(stack, &top)?;
        }
        Instruction::DupX2 => {
            let top = stack.pop_words(1)?;
            let under = stack.pop_words(2)?;
            push_all(stack, &top)?;
            push_all(stack, &under)?;
            push_all(stack, &top)?;
        }
        Instruction::Dup2 => {
            let top = stack.pop_words(2)?;
            push_all(stack, &top)?;
            push_all(stack, &top)?;
        }
        Instruction::Dup2X1 => {
            let top = stack.pop_words(2)?;
            let next = stack.pop_words(1)?;
            push_all(stack, &top)?;
            push_all(stack, &next)?;
            push_all(stack, &top)?;
        }
        Instruction::Dup2X2 => {
            let top = stack.pop_words(2)?;
            let under = stack.pop_words(2)?;
            push_all(stack, &top)?;
            push_all(stack, &under)?;
            push_all(stack, &top)?;
        }
        Instruction::Swap => {
            let top = stack.pop_words(1)?;
            let next = stack.pop_words(1)?;
            push_all(stack, &top)?;
            push_all(stack, &next)?;
        }

        Instruction::IAdd => int_op(stack, |l, r| Ok(l.wrapping_add(r)))?,
        Instruction::LAdd => long_op(stack, |l, r| Ok(l.wrapping_add(r)))?,
        Instruction::FAdd => float_op(stack, |l, r| l + r)?,
        Instruction::DAdd => double_op(stack, |l, r| l + r)?,
        Instruction::ISub => int_op(stack, |l, r| Ok(l.wrapping_sub(r)))?,
        Instruction::LSub => long_op(stack, |l, r| Ok(l.wrapping_sub(r)))?,
        Instruction::FSub => float_op(stack, |l, r| l - r)?,
        Instruction::DSub => double_op(stack, |l, r| l - r)?,
        Instruction::IMul => int_op(stack, |l, r| Ok(l.wrapping_mul(r)))?,
        Instruction::LMul => long_op(stack, |l, r| Ok(l.wrapping_mul(r)))?,
        Instruction::FMul => float_op(stack, |l, r| l * r)?,
        Instruction::DMul => double_op(stack, |l, r| l * r)?,
        Instruction::IDiv => int_op(stack, int_div)?,
        Instruction::LDiv => long_op(stack, long_div)?,
        Instruction::FDiv => float_op(stack, |l, r| l / r)?,
        Instruction::DDiv => double_op(stack, |l, r| l / r)?,
        Instruction::IRem => int_op(stack, int_rem)?,
        Instruction::LRem => long_op(stack, long_rem)?,
        // `%` on floats truncates toward zero and keeps the dividend's sign, like fmod
        Instruction::FRem => float_op(stack, |l, r| l % r)?,
        Instruction::DRem => double_op(stack, |l, r| l % r)?,
        Instruction::INeg => {
            let v = stack.pop_int()?;
            stack.push_int(v.wrapping_neg())?;
        }
        Instruction::LNeg => {
            let v = stack.pop_long()?;
            stack.push_long(v.wrapping_neg())?;
        }
        Instruction::FNeg => {
            let v = stack.pop_float()?;
            stack.push_float(-v)?;
        }
        Instruction::DNeg => {
            let v = stack.pop_double()?;
            stack.push_double(-v)?;
        }

        Instruction::IShl => int_op(stack, |l, r| Ok(l.wrapping_shl(r as u32)))?,
        Instruction::LShl => long_shift(stack, |v, n| v.wrapping_shl(n))?,
        Instruction::IShr => int_op(stack, |l, r| Ok(l.wrapping_shr(r as u32)))?,
        Instruction::LShr => long_shift(stack, |v, n| v.wrapping_shr(n))?,
        Instruction::IUshr => int_op(stack, |l, r| Ok((l as u32).wrapping_shr(r as u32) as i32))?,
        Instruction::LUshr => long_shift(stack, |v, n| (v as u64).wrapping_shr(n) as i64)?,
        Instruction::IAnd => int_op(stack, |l, r| Ok(l & r))?,
        Instruction::LAnd => long_op(stack, |l, r| Ok(l & r))?,
        Instruction::IOr => int_op(stack, |l, r| Ok(l | r))?,
        Instruction::LOr => long_op(stack, |l, r| Ok(l | r))?,
        Instruction::IXor => int_op(stack, |l, r| Ok(l ^ r))?,
        Instruction::LXor => long_op(stack, |l, r| Ok(l ^ r))?,
        Instruction::IInc(idx, delta) => {
            let v = locals.get_int(*idx)?;
            locals.set_int(*idx, v.wrapping_add(i32::from(*delta)))?;
        }

        // `as` between numeric types saturates and sends NaN to zero, which is the JVM's rule
        // for float-to-integer conversions.
        Instruction::I2L => {
            let v = stack.pop_int()?;
            stack.push_long(i64::from(v))?;
        }
        Instruction::I2F => {
            let v = stack.pop_int()?;
            stack.push_float(v as f32)?;
        }
        Instruction::I2D => {
            let v = stack.pop_int()?;
            stack.push_double(f64::from(v))?;
        }
        Instruction::L2I => {
            let v = stack.pop_long()?;
            stack.push_int(v as i32)?;
        }
        Instruction::L2F => {
            let v = stack.pop_long()?;
            stack.push_float(v as f32)?;
        }
        Instruction::L2D => {
            let v = stack.pop_long()?;
            stack.push_double(v as f64)?;
        }
        Instruction::F2I => {
            let v = stack.pop_float()?;
            stack.push_int(v as i32)?;
        }
        Instruction::F2L => {
            let v = stack.pop_float()?;
            stack.push_long(v as i64)?;
        }
        Instruction::F2D => {
            let v = stack.pop_float()?;
            stack.push_double(f64::from(v))?;
        }
        Instruction::D2I => {
            let v = stack.pop_double()?;
            stack.push_int(v as i32)?;
        }
        Instruction::D2L => {
            let v = stack.pop_double()?;
            stack.push_long(v as i64)?;
        }
        Instruction::D2F => {
            let v = stack.pop_double()?;
            stack.push_float(v as f32)?;
        }
        Instruction::I2B => {
            let v = stack.pop_int()?;
            stack.push_int(i32::from(v as i8))?;
        }
        Instruction::I2C => {
            let v = stack.pop_int()?;
            stack.push_int(i32::from(v as u16))?;
        }
        Instruction::I2S => {
            let v = stack.pop_int()?;
            stack.push_int(i32::from(v as i16))?;
        }

        Instruction::LCmp => {
            let right = stack.pop_long()?;
            let left = stack.pop_long()?;
            stack.push_int(match left.cmp(&right) {
                Ordering::Less => -1,
                Ordering::Equal => 0,
                Ordering::Greater => 1,
            })?;
        }
        Instruction::FCmpL | Instruction::FCmpG => {
            let right = stack.pop_float()?;
            let left = stack.pop_float()?;
            let nan = if let Instruction::FCmpG = instruction { 1 } else { -1 };
            stack.push_int(float_compare(f64::from(left), f64::from(right), nan))?;
        }
        Instruction::DCmpL | Instruction::DCmpG => {
            let right = stack.pop_double()?;
            let left = stack.pop_double()?;
            let nan = if let Instruction::DCmpG = instruction { 1 } else { -1 };
            stack.push_int(float_compare(left, right, nan))?;
        }

        Instruction::IfEq(off) => return branch_if(stack.pop_int()? == 0, pc, *off, next),
        Instruction::IfNe(off) => return branch_if(stack.pop_int()? != 0, pc, *off, next),
        Instruction::IfLt(off) => return branch_if(stack.pop_int()? < 0, pc, *off, next),
        Instruction::IfGe(off) => return branch_if(stack.pop_int()? >= 0, pc, *off, next),
        Instruction::IfGt(off) => return branch_if(stack.pop_int()? > 0, pc, *off, next),
        Instruction::IfLe(off) => return branch_if(stack.pop_int()? <= 0, pc, *off, next),
        Instruction::IfIcmpEq(off)
        | Instruction::IfIcmpNe(off)
        | Instruction::IfIcmpLt(off)
        | Instruction::IfIcmpGe(off)
        | Instruction::IfIcmpGt(off)
        | Instruction::IfIcmpLe(off) => {
            let right = stack.pop_int()?;
            let left = stack.pop_int()?;
            let taken = match instruction {
                Instruction::IfIcmpEq(_) => left == right,
                Instruction::IfIcmpNe(_) => left != right,
                Instruction::IfIcmpLt(_) => left < right,
                Instruction::IfIcmpGe(_) => left >= right,
                Instruction::IfIcmpGt(_) => left > right,
                _ => left <= right,
            };
            return branch_if(taken, pc, *off, next);
        }
        Instruction::IfAcmpEq(off) | Instruction::IfAcmpNe(off) => {
            let right = stack.pop_ref()?;
            let left = stack.pop_ref()?;
            let same = Handle::same(left.as_ref(), right.as_ref());
            let taken = if let Instruction::IfAcmpEq(_) = instruction {
                same
            } else {
                !same
            };
            return branch_if(taken, pc, *off, next);
        }
        Instruction::IfNull(off) => return branch_if(stack.pop_ref()?.is_none(), pc, *off, next),
        Instruction::IfNonNull(off) => {
            return branch_if(stack.pop_ref()?.is_some(), pc, *off, next)
        }
        Instruction::Goto(off) => return branch(pc, i32::from(*off)),
        Instruction::GotoW(off) => return branch(pc, *off),

        Instruction::IReturn => {
            let value = stack.pop_int()?;
            return return_value(frame, Some(Value::Int(value)));
        }
        Instruction::LReturn => {
            let value = stack.pop_long()?;
            return return_value(frame, Some(Value::Long(value)));
        }
        Instruction::FReturn => {
            let value = stack.pop_float()?;
            return return_value(frame, Some(Value::Float(value)));
        }
        Instruction::DReturn => {
            let value = stack.pop_double()?;
            return return_value(frame, Some(Value::Double(value)));
        }
        Instruction::AReturn => {
            let value = stack.pop_ref()?;
            return return_value(frame, Some(Value::Reference(value)));
        }
        Instruction::Return => return return_value(frame, None),

        Instruction::GetStatic(idx) => {
            let resolved = resolve_static_field(loader, &frame.class, *idx)?;
            let init = initialization_frames(loader, &resolved.class)?;
            if !init.is_empty() {
                return Ok(NextAction::Invoke {
                    frames: init,
                    return_pc: pc,
                });
            }
            let value = resolved
                .class
                .get_static(resolved.handle.name(), resolved.handle.desc())
                .ok_or_else(|| Fault::FieldNotFound {
                    class: resolved.class.name().to_string(),
                    name: resolved.handle.name().to_string(),
                    desc: resolved.handle.desc().to_string(),
                })?;
            frame.stack.push(value)?;
        }
        Instruction::PutStatic(idx) => {
            let resolved = resolve_static_field(loader, &frame.class, *idx)?;
            let init = initialization_frames(loader, &resolved.class)?;
            if !init.is_empty() {
                return Ok(NextAction::Invoke {
                    frames: init,
                    return_pc: pc,
                });
            }
            let field = &resolved.handle;
            let value = frame.stack.pop()?;
            if !value.fits(field.ty()) {
                return Err(Fault::type_mismatch(type_label(Some(field.ty())), &value));
            }
            let value = if let FieldType::Boolean = field.ty() {
                narrow(value, field.ty())
            } else {
                value
            };
            if !resolved.class.set_static(field.name(), field.desc(), value) {
                return Err(Fault::FieldNotFound {
                    class: resolved.class.name().to_string(),
                    name: field.name().to_string(),
                    desc: field.desc().to_string(),
                });
            }
        }
        Instruction::InvokeStatic(idx) => {
            let resolved = resolve_method(loader, &frame.class, *idx)?;
            let method = &resolved.handle;
            if !method.is_static() {
                return Err(Fault::IncompatibleClassChange(format!(
                    "{}.{}{} is not static",
                    method.class_name(),
                    method.name(),
                    method.desc()
                )));
            }
            let init = initialization_frames(loader, &resolved.class)?;
            if !init.is_empty() {
                // run the initializers, then come back and make the call
                return Ok(NextAction::Invoke {
                    frames: init,
                    return_pc: pc,
                });
            }
            let callee = Frame::new(Rc::clone(&resolved.class), Rc::clone(method))?;
            let args = pop_arguments(&mut frame.stack, method.descriptor())?;
            return Ok(NextAction::Invoke {
                frames: vec![callee.with_args(args)?],
                return_pc: next,
            });
        }

        Instruction::NewArray(kind) => {
            let count = array_count(stack, limits)?;
            stack.push_ref(Some(new_array(*kind, count)?))?;
        }
        Instruction::ANewArray(idx) => {
            match frame.class.constant(*idx) {
                Some(Constant::Class(_)) => {}
                _ => {
                    return Err(Fault::BadConstant {
                        index: idx.inner(),
                        expected: "a class",
                    });
                }
            }
            let count = array_count(&mut frame.stack, limits)?;
            frame
                .stack
                .push_array::<Option<Handle>>(ArrayRef::try_filled(count, None)?)?;
        }
        Instruction::ArrayLength => {
            let handle = stack.pop_ref()?.ok_or(Fault::NullReference)?;
            let length = handle.array_len().ok_or(Fault::TypeMismatch {
                expected: "array",
                found: handle.type_name(),
            })?;
            stack.push_int(length as i32)?;
        }

        // No object model, no subroutines, no switches: these stop the run rather than
        // pretend.
        Instruction::Jsr(_)
        | Instruction::JsrW(_)
        | Instruction::Ret(_)
        | Instruction::TableSwitch(_, _, _, _)
        | Instruction::LookupSwitch(_, _)
        | Instruction::GetField(_)
        | Instruction::PutField(_)
        | Instruction::InvokeVirtual(_)
        | Instruction::InvokeSpecial(_)
        | Instruction::InvokeInterface(_, _)
        | Instruction::InvokeDynamic(_)
        | Instruction::New(_)
        | Instruction::AThrow
        | Instruction::CheckCast(_)
        | Instruction::InstanceOf(_)
        | Instruction::MonitorEnter
        | Instruction::MonitorExit
        | Instruction::MultiANewArray(_, _)
        | Instruction::Breakpoint
        | Instruction::ImpDep1
        | Instruction::ImpDep2 => return Err(unimplemented(instruction)),
    }

    Ok(NextAction::ContinueAt(next))
}
