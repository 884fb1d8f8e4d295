use std::collections::HashSet;
use std::rc::Rc;

use crate::class_file::descriptor::MethodDescriptor;
use crate::class_file::unvalidated;
use crate::class_file::unvalidated::Attribute;
use crate::class_file::unvalidated::ClassFile as UnvalidatedClassFile;
use crate::class_file::unvalidated::CodeAttribute;
use crate::class_file::unvalidated::ConstantIdx;
use crate::class_file::unvalidated::ExceptionTableRecord;
use crate::class_file::unvalidated::Instruction;
use crate::class_file::unvalidated::LineNumberEntry;
use crate::class_file::validated::ValidationError;

#[derive(Debug)]
pub struct MethodBody {
    pub(crate) max_stack: u16,
    pub(crate) max_locals: u16,
    bytes: Box<[u8]>,
    // handlers are recorded but never dispatched to
    exception_table: Vec<ExceptionTableRecord>,
    line_numbers: Vec<LineNumberEntry>,
}

impl MethodBody {
    pub fn max_stack(&self) -> u16 {
        self.max_stack
    }

    pub fn max_locals(&self) -> u16 {
        self.max_locals
    }

    pub fn code(&self) -> &[u8] {
        &self.bytes
    }

    pub fn exception_table(&self) -> &[ExceptionTableRecord] {
        &self.exception_table
    }

    /// Decode the instruction at `pc`, with its width in bytes.
    pub fn instruction_at(&self, pc: u32) -> Result<(Instruction, usize), unvalidated::Error> {
        Instruction::decode_at(&self.bytes, pc as usize)
    }

    /// The source line `pc` belongs to, from the method's `LineNumberTable`.
    pub fn line_for(&self, pc: u32) -> Option<u16> {
        self.line_numbers
            .iter()
            .filter(|entry| u32::from(entry.start_pc) <= pc)
            .max_by_key(|entry| entry.start_pc)
            .map(|entry| entry.line_number)
    }

    pub fn handlers_covering(&self, pc: u32) -> impl Iterator<Item = &ExceptionTableRecord> {
        self.exception_table
            .iter()
            .filter(move |record| record.covers(pc))
    }
}

#[derive(Debug)]
pub struct MethodHandle {
    pub(crate) access_flags: unvalidated::MethodAccessFlags,
    pub(crate) name: String,
    pub(crate) desc: String,
    pub(crate) descriptor: MethodDescriptor,
    /// Name of the declaring class.
    pub(crate) class_name: String,
    pub(crate) body: Option<Rc<MethodBody>>,
}

/// Local variable index touched by `inst` and how many indices the value spans.
fn local_access(inst: &Instruction) -> Option<(u16, u16)> {
    use Instruction::*;
    let access = match inst {
        ILoad(idx) | FLoad(idx) | ALoad(idx) | IStore(idx) | FStore(idx) | AStore(idx)
        | IInc(idx, _) | Ret(idx) => (*idx, 1),
        LLoad(idx) | DLoad(idx) | LStore(idx) | DStore(idx) => (*idx, 2),
        ILoad0 | FLoad0 | ALoad0 | IStore0 | FStore0 | AStore0 => (0, 1),
        ILoad1 | FLoad1 | ALoad1 | IStore1 | FStore1 | AStore1 => (1, 1),
        ILoad2 | FLoad2 | ALoad2 | IStore2 | FStore2 | AStore2 => (2, 1),
        ILoad3 | FLoad3 | ALoad3 | IStore3 | FStore3 | AStore3 => (3, 1),
        LLoad0 | DLoad0 | LStore0 | DStore0 => (0, 2),
        LLoad1 | DLoad1 | LStore1 | DStore1 => (1, 2),
        LLoad2 | DLoad2 | LStore2 | DStore2 => (2, 2),
        LLoad3 | DLoad3 | LStore3 | DStore3 => (3, 2),
        _ => return None,
    };
    Some(access)
}

/// Every address `inst`, sitting at `position`, may jump to.
fn branch_targets(inst: &Instruction, position: u32) -> Vec<i64> {
    use Instruction::*;
    let base = i64::from(position);
    match inst {
        IfEq(off) | IfNe(off) | IfLt(off) | IfGe(off) | IfGt(off) | IfLe(off) | IfIcmpEq(off)
        | IfIcmpNe(off) | IfIcmpLt(off) | IfIcmpGe(off) | IfIcmpGt(off) | IfIcmpLe(off)
        | IfAcmpEq(off) | IfAcmpNe(off) | Goto(off) | Jsr(off) | IfNull(off) | IfNonNull(off) => {
            vec![base + i64::from(*off)]
        }
        GotoW(off) | JsrW(off) => vec![base + i64::from(*off)],
        TableSwitch(default, _, _, offsets) => std::iter::once(default)
            .chain(offsets.iter())
            .map(|off| base + i64::from(*off))
            .collect(),
        LookupSwitch(default, pairs) => std::iter::once(*default)
            .chain(pairs.iter().map(|(_, off)| *off))
            .map(|off| base + i64::from(off))
            .collect(),
        _ => Vec::new(),
    }
}

/// Check that the constant an instruction names has the kind the instruction needs.
fn check_constant_operand(
    raw_class: &UnvalidatedClassFile,
    inst: &Instruction,
) -> Result<(), ValidationError> {
    use unvalidated::Constant as C;
    let (idx, expected): (ConstantIdx, &'static str) = match inst {
        Instruction::Ldc(idx) | Instruction::LdcW(idx) => {
            (*idx, "Integer, Float, String, Class, MethodType, MethodHandle, or Dynamic")
        }
        Instruction::Ldc2W(idx) => (*idx, "Long, Double, or Dynamic"),
        Instruction::GetStatic(idx)
        | Instruction::PutStatic(idx)
        | Instruction::GetField(idx)
        | Instruction::PutField(idx) => (*idx, "Fieldref"),
        Instruction::InvokeVirtual(idx) => (*idx, "Methodref"),
        Instruction::InvokeSpecial(idx) | Instruction::InvokeStatic(idx) => {
            (*idx, "Methodref or InterfaceMethodref")
        }
        Instruction::InvokeInterface(idx, _) => (*idx, "InterfaceMethodref"),
        Instruction::InvokeDynamic(idx) => (*idx, "InvokeDynamic"),
        Instruction::New(idx)
        | Instruction::ANewArray(idx)
        | Instruction::CheckCast(idx)
        | Instruction::InstanceOf(idx)
        | Instruction::MultiANewArray(idx, _) => (*idx, "Class"),
        _ => return Ok(()),
    };

    let constant = raw_class.checked_const(idx)?;
    let ok = match (inst, constant) {
        (Instruction::Ldc(_), C::Integer(_))
        | (Instruction::Ldc(_), C::Float(_))
        | (Instruction::Ldc(_), C::String(_))
        | (Instruction::Ldc(_), C::Class(_))
        | (Instruction::Ldc(_), C::MethodType(_))
        | (Instruction::Ldc(_), C::MethodHandle(_, _))
        | (Instruction::Ldc(_), C::Dynamic(_, _))
        | (Instruction::LdcW(_), C::Integer(_))
        | (Instruction::LdcW(_), C::Float(_))
        | (Instruction::LdcW(_), C::String(_))
        | (Instruction::LdcW(_), C::Class(_))
        | (Instruction::LdcW(_), C::MethodType(_))
        | (Instruction::LdcW(_), C::MethodHandle(_, _))
        | (Instruction::LdcW(_), C::Dynamic(_, _)) => true,
        (Instruction::Ldc2W(_), C::Long(_))
        | (Instruction::Ldc2W(_), C::Double(_))
        | (Instruction::Ldc2W(_), C::Dynamic(_, _)) => true,
        (Instruction::GetStatic(_), C::Fieldref(_, _))
        | (Instruction::PutStatic(_), C::Fieldref(_, _))
        | (Instruction::GetField(_), C::Fieldref(_, _))
        | (Instruction::PutField(_), C::Fieldref(_, _)) => true,
        (Instruction::InvokeVirtual(_), C::Methodref(_, _)) => true,
        (Instruction::InvokeSpecial(_), C::Methodref(_, _))
        | (Instruction::InvokeSpecial(_), C::InterfaceMethodref(_, _))
        | (Instruction::InvokeStatic(_), C::Methodref(_, _))
        | (Instruction::InvokeStatic(_), C::InterfaceMethodref(_, _)) => true,
        (Instruction::InvokeInterface(_, _), C::InterfaceMethodref(_, _)) => true,
        (Instruction::InvokeDynamic(_), C::InvokeDynamic(_, _)) => true,
        (Instruction::New(_), C::Class(_))
        | (Instruction::ANewArray(_), C::Class(_))
        | (Instruction::CheckCast(_), C::Class(_))
        | (Instruction::InstanceOf(_), C::Class(_))
        | (Instruction::MultiANewArray(_, _), C::Class(_)) => true,
        _ => false,
    };

    if ok {
        Ok(())
    } else {
        Err(ValidationError::BadConst {
            index: idx.inner(),
            found: constant.type_name(),
            expected,
        })
    }
}

fn validate_body(
    raw_class: &UnvalidatedClassFile,
    method: &str,
    code: CodeAttribute,
    min_locals: usize,
) -> Result<MethodBody, ValidationError> {
    let invalid = |reason: String| ValidationError::InvalidMethod {
        method: method.to_string(),
        reason,
    };

    if usize::from(code.max_locals) < min_locals {
        return Err(invalid(format!(
            "max_locals {} cannot hold {} words of arguments",
            code.max_locals, min_locals
        )));
    }

    let mut starts = HashSet::new();
    let mut targets = Vec::new();
    let mut position = 0usize;
    while position < code.code.len() {
        let (inst, width) = Instruction::decode_at(&code.code, position)
            .map_err(|e| invalid(format!("at pc {}: {}", position, e)))?;
        starts.insert(position as i64);

        if let Some((idx, words)) = local_access(&inst) {
            if u32::from(idx) + u32::from(words) > u32::from(code.max_locals) {
                return Err(invalid(format!(
                    "{} at pc {} uses local {} beyond max_locals {}",
                    inst.mnemonic(),
                    position,
                    idx,
                    code.max_locals
                )));
            }
        }
        check_constant_operand(raw_class, &inst)?;
        for target in branch_targets(&inst, position as u32) {
            targets.push((position, target));
        }

        position += width;
    }

    for (from, target) in targets {
        if !starts.contains(&target) {
            return Err(invalid(format!(
                "branch at pc {} to {}, which is not an instruction",
                from, target
            )));
        }
    }

    let mut line_numbers = Vec::new();
    for attr in code.attributes.iter() {
        if attr.name(raw_class) == Some("LineNumberTable") {
            if let Attribute::LineNumberTable(entries) = attr.materialize(raw_class)? {
                line_numbers.extend(entries);
            }
        }
    }

    Ok(MethodBody {
        max_stack: code.max_stack,
        max_locals: code.max_locals,
        bytes: code.code.into_boxed_slice(),
        exception_table: code.exception_table,
        line_numbers,
    })
}

impl MethodHandle {
    pub fn access(&self) -> &unvalidated::MethodAccessFlags {
        &self.access_flags
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn descriptor(&self) -> &MethodDescriptor {
        &self.descriptor
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn body(&self) -> Option<&Rc<MethodBody>> {
        self.body.as_ref()
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.is_static()
    }

    /// Words of locals the caller fills in: the arguments, plus the receiver for instance
    /// methods.
    pub fn arg_words(&self) -> usize {
        self.descriptor.arg_words() + if self.is_static() { 0 } else { 1 }
    }

    pub fn validate(
        raw_class: &UnvalidatedClassFile,
        class_name: &str,
        raw_method: &unvalidated::MethodInfo,
    ) -> Result<MethodHandle, ValidationError> {
        let name = raw_class.checked_utf8(raw_method.name_index)?.to_string();
        let desc = raw_class.checked_utf8(raw_method.descriptor_index)?.to_string();
        let descriptor = MethodDescriptor::parse(&desc)?;
        let qualified = format!("{}.{}{}", class_name, name, desc);

        let mut code_attrs = raw_method
            .attributes
            .iter()
            .filter(|a| a.name(raw_class) == Some("Code"));
        let code_attr = code_attrs.next();
        if code_attrs.next().is_some() {
            return Err(ValidationError::InvalidMethod {
                method: qualified,
                reason: "multiple Code attributes".to_string(),
            });
        }

        let access_flags = raw_method.access_flags;
        let needs_code = !(access_flags.is_native() || access_flags.is_abstract());
        let body = match (code_attr, needs_code) {
            (Some(attr), true) => {
                let code = match attr.materialize(raw_class) {
                    Ok(Attribute::Code(code)) => code,
                    Ok(_) => {
                        return Err(ValidationError::MissingCodeAttribute {
                            method: qualified,
                            reason: "Code attribute did not parse as code".to_string(),
                        });
                    }
                    Err(e) => {
                        return Err(ValidationError::MissingCodeAttribute {
                            method: qualified,
                            reason: e.to_string(),
                        });
                    }
                };
                let min_locals =
                    descriptor.arg_words() + if access_flags.is_static() { 0 } else { 1 };
                Some(Rc::new(validate_body(raw_class, &qualified, code, min_locals)?))
            }
            (None, true) => {
                return Err(ValidationError::MissingCodeAttribute {
                    method: qualified,
                    reason: "absent".to_string(),
                });
            }
            (Some(_), false) => {
                return Err(ValidationError::InvalidMethod {
                    method: qualified,
                    reason: "native or abstract method with a Code attribute".to_string(),
                });
            }
            (None, false) => None,
        };

        Ok(MethodHandle {
            access_flags,
            name,
            desc,
            descriptor,
            class_name: class_name.to_string(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_file::unvalidated::AttributeInfo;
    use crate::class_file::unvalidated::attribute::put_u16;
    use crate::class_file::validated::ClassFile;

    const STATIC: u16 = 0x0008;

    fn validate(raw: UnvalidatedClassFile) -> Result<ClassFile, ValidationError> {
        ClassFile::validate(&raw)
    }

    #[test]
    fn missing_code_is_rejected() {
        let raw =
            UnvalidatedClassFile::synthetic("demo/NoCode").with_method("f", "()V", STATIC, None);
        assert!(matches!(
            validate(raw),
            Err(ValidationError::MissingCodeAttribute { .. })
        ));
    }

    #[test]
    fn native_methods_need_no_code() {
        let raw = UnvalidatedClassFile::synthetic("demo/Native").with_method(
            "f",
            "()V",
            STATIC | 0x0100,
            None,
        );
        let class = validate(raw).unwrap();
        assert!(class.get_method("f", "()V").unwrap().body().is_none());
    }

    #[test]
    fn locals_must_hold_arguments() {
        // (IJ)V needs three words of locals
        let raw = UnvalidatedClassFile::synthetic("demo/Args").with_method(
            "f",
            "(IJ)V",
            STATIC,
            Some(CodeAttribute::new(0, 2, vec![0xb1])),
        );
        assert!(matches!(
            validate(raw),
            Err(ValidationError::InvalidMethod { .. })
        ));
    }

    #[test]
    fn local_indices_are_checked() {
        // lload_1 with max_locals 2 touches local 2
        let raw = UnvalidatedClassFile::synthetic("demo/Locals").with_method(
            "f",
            "()V",
            STATIC,
            Some(CodeAttribute::new(2, 2, vec![0x1f, 0x58, 0xb1])),
        );
        assert!(matches!(
            validate(raw),
            Err(ValidationError::InvalidMethod { .. })
        ));
    }

    #[test]
    fn branches_must_land_on_instructions() {
        // goto +2 lands inside its own operand
        let raw = UnvalidatedClassFile::synthetic("demo/Branch").with_method(
            "f",
            "()V",
            STATIC,
            Some(CodeAttribute::new(0, 0, vec![0xa7, 0x00, 0x02, 0xb1])),
        );
        assert!(matches!(
            validate(raw),
            Err(ValidationError::InvalidMethod { .. })
        ));

        let raw = UnvalidatedClassFile::synthetic("demo/Branch").with_method(
            "f",
            "()V",
            STATIC,
            Some(CodeAttribute::new(0, 0, vec![0xa7, 0x00, 0x03, 0xb1])),
        );
        assert!(validate(raw).is_ok());
    }

    #[test]
    fn ldc_operand_kind_is_checked() {
        let mut raw = UnvalidatedClassFile::synthetic("demo/Ldc");
        let long_idx = raw.add_constant(unvalidated::Constant::Long(1));
        let code = vec![0x12, long_idx.inner() as u8, 0x57, 0xb1];
        let raw = raw.with_method("f", "()V", STATIC, Some(CodeAttribute::new(2, 0, code)));
        assert!(matches!(
            validate(raw),
            Err(ValidationError::BadConst {
                found: "Long",
                ..
            })
        ));
    }

    #[test]
    fn line_numbers_come_from_the_code_attribute() {
        let mut raw = UnvalidatedClassFile::synthetic("demo/Lines");
        let mut data = Vec::new();
        put_u16(&mut data, 2);
        for (pc, line) in [(0u16, 10u16), (1, 11)].iter() {
            put_u16(&mut data, *pc);
            put_u16(&mut data, *line);
        }
        let name_index = raw.add_utf8("LineNumberTable");
        let mut code = CodeAttribute::new(1, 0, vec![0x03, 0x57, 0xb1]);
        code.attributes.push(AttributeInfo { name_index, data });
        let class = validate(raw.with_method("f", "()V", STATIC, Some(code))).unwrap();

        let method = class.get_method("f", "()V").unwrap();
        let body = method.body().unwrap();
        assert_eq!(body.line_for(0), Some(10));
        assert_eq!(body.line_for(2), Some(11));
        assert_eq!(method.class_name(), "demo/Lines");
    }
}
