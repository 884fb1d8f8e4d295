use crate::class_file::unvalidated::ConstantIdx;
use crate::class_file::unvalidated::Error;

use crate::class_file::unvalidated::read::ByteCursor;
use crate::class_file::unvalidated::read::FromReader;

use std::fmt;

const WIDE: u8 = 0xc4;

/// Element type operand of `newarray`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayType {
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

impl ArrayType {
    pub fn from_code(code: u8) -> Result<Self, Error> {
        Ok(match code {
            4 => ArrayType::Boolean,
            5 => ArrayType::Char,
            6 => ArrayType::Float,
            7 => ArrayType::Double,
            8 => ArrayType::Byte,
            9 => ArrayType::Short,
            10 => ArrayType::Int,
            11 => ArrayType::Long,
            _ => {
                return Err(Error::ClassFileError("invalid newarray element type"));
            }
        })
    }

    pub fn code(&self) -> u8 {
        match self {
            ArrayType::Boolean => 4,
            ArrayType::Char => 5,
            ArrayType::Float => 6,
            ArrayType::Double => 7,
            ArrayType::Byte => 8,
            ArrayType::Short => 9,
            ArrayType::Int => 10,
            ArrayType::Long => 11,
        }
    }
}

/// One decoded instruction. Branch offsets are kept exactly as encoded: relative to the address
/// of the instruction's own opcode byte. Local indices are widened to `u16` whether or not the
/// instruction was prefixed by `wide`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BIPush(i8),
    SIPush(i16),
    Ldc(ConstantIdx),
    LdcW(ConstantIdx),
    Ldc2W(ConstantIdx),
    ILoad(u16),
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    ILoad0,
    ILoad1,
    ILoad2,
    ILoad3,
    LLoad0,
    LLoad1,
    LLoad2,
    LLoad3,
    FLoad0,
    FLoad1,
    FLoad2,
    FLoad3,
    DLoad0,
    DLoad1,
    DLoad2,
    DLoad3,
    ALoad0,
    ALoad1,
    ALoad2,
    ALoad3,
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16),
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IStore0,
    IStore1,
    IStore2,
    IStore3,
    LStore0,
    LStore1,
    LStore2,
    LStore3,
    FStore0,
    FStore1,
    FStore2,
    FStore3,
    DStore0,
    DStore1,
    DStore2,
    DStore3,
    AStore0,
    AStore1,
    AStore2,
    AStore3,
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    IShl,
    LShl,
    IShr,
    LShr,
    IUshr,
    LUshr,
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16),
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmpL,
    FCmpG,
    DCmpL,
    DCmpG,
    IfEq(i16),
    IfNe(i16),
    IfLt(i16),
    IfGe(i16),
    IfGt(i16),
    IfLe(i16),
    IfIcmpEq(i16),
    IfIcmpNe(i16),
    IfIcmpLt(i16),
    IfIcmpGe(i16),
    IfIcmpGt(i16),
    IfIcmpLe(i16),
    IfAcmpEq(i16),
    IfAcmpNe(i16),
    Goto(i16),
    Jsr(i16),
    Ret(u16),
    /// default, low, high, then one offset per value in `low..=high`.
    TableSwitch(i32, i32, i32, Vec<i32>),
    /// default, then `(match, offset)` pairs.
    LookupSwitch(i32, Vec<(i32, i32)>),
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    GetStatic(ConstantIdx),
    PutStatic(ConstantIdx),
    GetField(ConstantIdx),
    PutField(ConstantIdx),
    InvokeVirtual(ConstantIdx),
    InvokeSpecial(ConstantIdx),
    InvokeStatic(ConstantIdx),
    InvokeInterface(ConstantIdx, u8),
    InvokeDynamic(ConstantIdx),
    New(ConstantIdx),
    NewArray(ArrayType),
    ANewArray(ConstantIdx),
    ArrayLength,
    AThrow,
    CheckCast(ConstantIdx),
    InstanceOf(ConstantIdx),
    MonitorEnter,
    MonitorExit,
    MultiANewArray(ConstantIdx, u8),
    IfNull(i16),
    IfNonNull(i16),
    GotoW(i32),
    JsrW(i32),
    Breakpoint,
    ImpDep1,
    ImpDep2,
}

impl Instruction {
    /// Decode the instruction starting at `pc` in `code`, returning it with its encoded width.
    /// `code` must be the whole method body so that switch padding lines up.
    pub fn decode_at(code: &[u8], pc: usize) -> Result<(Instruction, usize), Error> {
        let mut data = ByteCursor::at(code, pc);
        let instruction = Instruction::read_from(&mut data)?;
        Ok((instruction, data.position() - pc))
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Instruction::Nop => 0x00,
            Instruction::AConstNull => 0x01,
            Instruction::IConstM1 => 0x02,
            Instruction::IConst0 => 0x03,
            Instruction::IConst1 => 0x04,
            Instruction::IConst2 => 0x05,
            Instruction::IConst3 => 0x06,
            Instruction::IConst4 => 0x07,
            Instruction::IConst5 => 0x08,
            Instruction::LConst0 => 0x09,
            Instruction::LConst1 => 0x0a,
            Instruction::FConst0 => 0x0b,
            Instruction::FConst1 => 0x0c,
            Instruction::FConst2 => 0x0d,
            Instruction::DConst0 => 0x0e,
            Instruction::DConst1 => 0x0f,
            Instruction::BIPush(..) => 0x10,
            Instruction::SIPush(..) => 0x11,
            Instruction::Ldc(..) => 0x12,
            Instruction::LdcW(..) => 0x13,
            Instruction::Ldc2W(..) => 0x14,
            Instruction::ILoad(..) => 0x15,
            Instruction::LLoad(..) => 0x16,
            Instruction::FLoad(..) => 0x17,
            Instruction::DLoad(..) => 0x18,
            Instruction::ALoad(..) => 0x19,
            Instruction::ILoad0 => 0x1a,
            Instruction::ILoad1 => 0x1b,
            Instruction::ILoad2 => 0x1c,
            Instruction::ILoad3 => 0x1d,
            Instruction::LLoad0 => 0x1e,
            Instruction::LLoad1 => 0x1f,
            Instruction::LLoad2 => 0x20,
            Instruction::LLoad3 => 0x21,
            Instruction::FLoad0 => 0x22,
            Instruction::FLoad1 => 0x23,
            Instruction::FLoad2 => 0x24,
            Instruction::FLoad3 => 0x25,
            Instruction::DLoad0 => 0x26,
            Instruction::DLoad1 => 0x27,
            Instruction::DLoad2 => 0x28,
            Instruction::DLoad3 => 0x29,
            Instruction::ALoad0 => 0x2a,
            Instruction::ALoad1 => 0x2b,
            Instruction::ALoad2 => 0x2c,
            Instruction::ALoad3 => 0x2d,
            Instruction::IALoad => 0x2e,
            Instruction::LALoad => 0x2f,
            Instruction::FALoad => 0x30,
            Instruction::DALoad => 0x31,
            Instruction::AALoad => 0x32,
            Instruction::BALoad => 0x33,
            Instruction::CALoad => 0x34,
            Instruction::SALoad => 0x35,
            Instruction::IStore(..) => 0x36,
            Instruction::LStore(..) => 0x37,
            Instruction::FStore(..) => 0x38,
            Instruction::DStore(..) => 0x39,
            Instruction::AStore(..) => 0x3a,
            Instruction::IStore0 => 0x3b,
            Instruction::IStore1 => 0x3c,
            Instruction::IStore2 => 0x3d,
            Instruction::IStore3 => 0x3e,
            Instruction::LStore0 => 0x3f,
            Instruction::LStore1 => 0x40,
            Instruction::LStore2 => 0x41,
            Instruction::LStore3 => 0x42,
            Instruction::FStore0 => 0x43,
            Instruction::FStore1 => 0x44,
            Instruction::FStore2 => 0x45,
            Instruction::FStore3 => 0x46,
            Instruction::DStore0 => 0x47,
            Instruction::DStore1 => 0x48,
            Instruction::DStore2 => 0x49,
            Instruction::DStore3 => 0x4a,
            Instruction::AStore0 => 0x4b,
            Instruction::AStore1 => 0x4c,
            Instruction::AStore2 => 0x4d,
            Instruction::AStore3 => 0x4e,
            Instruction::IAStore => 0x4f,
            Instruction::LAStore => 0x50,
            Instruction::FAStore => 0x51,
            Instruction::DAStore => 0x52,
            Instruction::AAStore => 0x53,
            Instruction::BAStore => 0x54,
            Instruction::CAStore => 0x55,
            Instruction::SAStore => 0x56,
            Instruction::Pop => 0x57,
            Instruction::Pop2 => 0x58,
            Instruction::Dup => 0x59,
            Instruction::DupX1 => 0x5a,
            Instruction::DupX2 => 0x5b,
            Instruction::Dup2 => 0x5c,
            Instruction::Dup2X1 => 0x5d,
            Instruction::Dup2X2 => 0x5e,
            Instruction::Swap => 0x5f,
            Instruction::IAdd => 0x60,
            Instruction::LAdd => 0x61,
            Instruction::FAdd => 0x62,
            Instruction::DAdd => 0x63,
            Instruction::ISub => 0x64,
            Instruction::LSub => 0x65,
            Instruction::FSub => 0x66,
            Instruction::DSub => 0x67,
            Instruction::IMul => 0x68,
            Instruction::LMul => 0x69,
            Instruction::FMul => 0x6a,
            Instruction::DMul => 0x6b,
            Instruction::IDiv => 0x6c,
            Instruction::LDiv => 0x6d,
            Instruction::FDiv => 0x6e,
            Instruction::DDiv => 0x6f,
            Instruction::IRem => 0x70,
            Instruction::LRem => 0x71,
            Instruction::FRem => 0x72,
            Instruction::DRem => 0x73,
            Instruction::INeg => 0x74,
            Instruction::LNeg => 0x75,
            Instruction::FNeg => 0x76,
            Instruction::DNeg => 0x77,
            Instruction::IShl => 0x78,
            Instruction::LShl => 0x79,
            Instruction::IShr => 0x7a,
            Instruction::LShr => 0x7b,
            Instruction::IUshr => 0x7c,
            Instruction::LUshr => 0x7d,
            Instruction::IAnd => 0x7e,
            Instruction::LAnd => 0x7f,
            Instruction::IOr => 0x80,
            Instruction::LOr => 0x81,
            Instruction::IXor => 0x82,
            Instruction::LXor => 0x83,
            Instruction::IInc(..) => 0x84,
            Instruction::I2L => 0x85,
            Instruction::I2F => 0x86,
            Instruction::I2D => 0x87,
            Instruction::L2I => 0x88,
            Instruction::L2F => 0x89,
            Instruction::L2D => 0x8a,
            Instruction::F2I => 0x8b,
            Instruction::F2L => 0x8c,
            Instruction::F2D => 0x8d,
            Instruction::D2I => 0x8e,
            Instruction::D2L => 0x8f,
            Instruction::D2F => 0x90,
            Instruction::I2B => 0x91,
            Instruction::I2C => 0x92,
            Instruction::I2S => 0x93,
            Instruction::LCmp => 0x94,
            Instruction::FCmpL => 0x95,
            Instruction::FCmpG => 0x96,
            Instruction::DCmpL => 0x97,
            Instruction::DCmpG => 0x98,
            Instruction::IfEq(..) => 0x99,
            Instruction::IfNe(..) => 0x9a,
            Instruction::IfLt(..) => 0x9b,
            Instruction::IfGe(..) => 0x9c,
            Instruction::IfGt(..) => 0x9d,
            Instruction::IfLe(..) => 0x9e,
            Instruction::IfIcmpEq(..) => 0x9f,
            Instruction::IfIcmpNe(..) => 0xa0,
            Instruction::IfIcmpLt(..) => 0xa1,
            Instruction::IfIcmpGe(..) => 0xa2,
            Instruction::IfIcmpGt(..) => 0xa3,
            Instruction::IfIcmpLe(..) => 0xa4,
            Instruction::IfAcmpEq(..) => 0xa5,
            Instruction::IfAcmpNe(..) => 0xa6,
            Instruction::Goto(..) => 0xa7,
            Instruction::Jsr(..) => 0xa8,
            Instruction::Ret(..) => 0xa9,
            Instruction::TableSwitch(..) => 0xaa,
            Instruction::LookupSwitch(..) => 0xab,
            Instruction::IReturn => 0xac,
            Instruction::LReturn => 0xad,
            Instruction::FReturn => 0xae,
            Instruction::DReturn => 0xaf,
            Instruction::AReturn => 0xb0,
            Instruction::Return => 0xb1,
            Instruction::GetStatic(..) => 0xb2,
            Instruction::PutStatic(..) => 0xb3,
            Instruction::GetField(..) => 0xb4,
            Instruction::PutField(..) => 0xb5,
            Instruction::InvokeVirtual(..) => 0xb6,
            Instruction::InvokeSpecial(..) => 0xb7,
            Instruction::InvokeStatic(..) => 0xb8,
            Instruction::InvokeInterface(..) => 0xb9,
            Instruction::InvokeDynamic(..) => 0xba,
            Instruction::New(..) => 0xbb,
            Instruction::NewArray(..) => 0xbc,
            Instruction::ANewArray(..) => 0xbd,
            Instruction::ArrayLength => 0xbe,
            Instruction::AThrow => 0xbf,
            Instruction::CheckCast(..) => 0xc0,
            Instruction::InstanceOf(..) => 0xc1,
            Instruction::MonitorEnter => 0xc2,
            Instruction::MonitorExit => 0xc3,
            Instruction::MultiANewArray(..) => 0xc5,
            Instruction::IfNull(..) => 0xc6,
            Instruction::IfNonNull(..) => 0xc7,
            Instruction::GotoW(..) => 0xc8,
            Instruction::JsrW(..) => 0xc9,
            Instruction::Breakpoint => 0xca,
            Instruction::ImpDep1 => 0xfe,
            Instruction::ImpDep2 => 0xff,
        }
    }

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Nop => "nop",
            Instruction::AConstNull => "aconst_null",
            Instruction::IConstM1 => "iconst_m1",
            Instruction::IConst0 => "iconst_0",
            Instruction::IConst1 => "iconst_1",
            Instruction::IConst2 => "iconst_2",
            Instruction::IConst3 => "iconst_3",
            Instruction::IConst4 => "iconst_4",
            Instruction::IConst5 => "iconst_5",
            Instruction::LConst0 => "lconst_0",
            Instruction::LConst1 => "lconst_1",
            Instruction::FConst0 => "fconst_0",
            Instruction::FConst1 => "fconst_1",
            Instruction::FConst2 => "fconst_2",
            Instruction::DConst0 => "dconst_0",
            Instruction::DConst1 => "dconst_1",
            Instruction::BIPush(..) => "bipush",
            Instruction::SIPush(..) => "sipush",
            Instruction::Ldc(..) => "ldc",
            Instruction::LdcW(..) => "ldc_w",
            Instruction::Ldc2W(..) => "ldc2_w",
            Instruction::ILoad(..) => "iload",
            Instruction::LLoad(..) => "lload",
            Instruction::FLoad(..) => "fload",
            Instruction::DLoad(..) => "dload",
            Instruction::ALoad(..) => "aload",
            Instruction::ILoad0 => "iload_0",
            Instruction::ILoad1 => "iload_1",
            Instruction::ILoad2 => "iload_2",
            Instruction::ILoad3 => "iload_3",
            Instruction::LLoad0 => "lload_0",
            Instruction::LLoad1 => "lload_1",
            Instruction::LLoad2 => "lload_2",
            Instruction::LLoad3 => "lload_3",
            Instruction::FLoad0 => "fload_0",
            Instruction::FLoad1 => "fload_1",
            Instruction::FLoad2 => "fload_2",
            Instruction::FLoad3 => "fload_3",
            Instruction::DLoad0 => "dload_0",
            Instruction::DLoad1 => "dload_1",
            Instruction::DLoad2 => "dload_2",
            Instruction::DLoad3 => "dload_3",
            Instruction::ALoad0 => "aload_0",
            Instruction::ALoad1 => "aload_1",
            Instruction::ALoad2 => "aload_2",
            Instruction::ALoad3 => "aload_3",
            Instruction::IALoad => "iaload",
            Instruction::LALoad => "laload",
            Instruction::FALoad => "faload",
            Instruction::DALoad => "daload",
            Instruction::AALoad => "aaload",
            Instruction::BALoad => "baload",
            Instruction::CALoad => "caload",
            Instruction::SALoad => "saload",
            Instruction::IStore(..) => "istore",
            Instruction::LStore(..) => "lstore",
            Instruction::FStore(..) => "fstore",
            Instruction::DStore(..) => "dstore",
            Instruction::AStore(..) => "astore",
            Instruction::IStore0 => "istore_0",
            Instruction::IStore1 => "istore_1",
            Instruction::IStore2 => "istore_2",
            Instruction::IStore3 => "istore_3",
            Instruction::LStore0 => "lstore_0",
            Instruction::LStore1 => "lstore_1",
            Instruction::LStore2 => "lstore_2",
            Instruction::LStore3 => "lstore_3",
            Instruction::FStore0 => "fstore_0",
            Instruction::FStore1 => "fstore_1",
            Instruction::FStore2 => "fstore_2",
            Instruction::FStore3 => "fstore_3",
            Instruction::DStore0 => "dstore_0",
            Instruction::DStore1 => "dstore_1",
            Instruction::DStore2 => "dstore_2",
            Instruction::DStore3 => "dstore_3",
            Instruction::AStore0 => "astore_0",
            Instruction::AStore1 => "astore_1",
            Instruction::AStore2 => "astore_2",
            Instruction::AStore3 => "astore_3",
            Instruction::IAStore => "iastore",
            Instruction::LAStore => "lastore",
            Instruction::FAStore => "fastore",
            Instruction::DAStore => "dastore",
            Instruction::AAStore => "aastore",
            Instruction::BAStore => "bastore",
            Instruction::CAStore => "castore",
            Instruction::SAStore => "sastore",
            Instruction::Pop => "pop",
            Instruction::Pop2 => "pop2",
            Instruction::Dup => "dup",
            Instruction::DupX1 => "dup_x1",
            Instruction::DupX2 => "dup_x2",
            Instruction::Dup2 => "dup2",
            Instruction::Dup2X1 => "dup2_x1",
            Instruction::Dup2X2 => "dup2_x2",
            Instruction::Swap => "swap",
            Instruction::IAdd => "iadd",
            Instruction::LAdd => "ladd",
            Instruction::FAdd => "fadd",
            Instruction::DAdd => "dadd",
            Instruction::ISub => "isub",
            Instruction::LSub => "lsub",
            Instruction::FSub => "fsub",
            Instruction::DSub => "dsub",
            Instruction::IMul => "imul",
            Instruction::LMul => "lmul",
            Instruction::FMul => "fmul",
            Instruction::DMul => "dmul",
            Instruction::IDiv => "idiv",
            Instruction::LDiv => "ldiv",
            Instruction::FDiv => "fdiv",
            Instruction::DDiv => "ddiv",
            Instruction::IRem => "irem",
            Instruction::LRem => "lrem",
            Instruction::FRem => "frem",
            Instruction::DRem => "drem",
            Instruction::INeg => "ineg",
            Instruction::LNeg => "lneg",
            Instruction::FNeg => "fneg",
            Instruction::DNeg => "dneg",
            Instruction::IShl => "ishl",
            Instruction::LShl => "lshl",
            Instruction::IShr => "ishr",
            Instruction::LShr => "lshr",
            Instruction::IUshr => "iushr",
            Instruction::LUshr => "lushr",
            Instruction::IAnd => "iand",
            Instruction::LAnd => "land",
            Instruction::IOr => "ior",
            Instruction::LOr => "lor",
            Instruction::IXor => "ixor",
            Instruction::LXor => "lxor",
            Instruction::IInc(..) => "iinc",
            Instruction::I2L => "i2l",
            Instruction::I2F => "i2f",
            Instruction::I2D => "i2d",
            Instruction::L2I => "l2i",
            Instruction::L2F => "l2f",
            Instruction::L2D => "l2d",
            Instruction::F2I => "f2i",
            Instruction::F2L => "f2l",
            Instruction::F2D => "f2d",
            Instruction::D2I => "d2i",
            Instruction::D2L => "d2l",
            Instruction::D2F => "d2f",
            Instruction::I2B => "i2b",
            Instruction::I2C => "i2c",
            Instruction::I2S => "i2s",
            Instruction::LCmp => "lcmp",
            Instruction::FCmpL => "fcmpl",
            Instruction::FCmpG => "fcmpg",
            Instruction::DCmpL => "dcmpl",
            Instruction::DCmpG => "dcmpg",
            Instruction::IfEq(..) => "ifeq",
            Instruction::IfNe(..) => "ifne",
            Instruction::IfLt(..) => "iflt",
            Instruction::IfGe(..) => "ifge",
            Instruction::IfGt(..) => "ifgt",
            Instruction::IfLe(..) => "ifle",
            Instruction::IfIcmpEq(..) => "if_icmpeq",
            Instruction::IfIcmpNe(..) => "if_icmpne",
            Instruction::IfIcmpLt(..) => "if_icmplt",
            Instruction::IfIcmpGe(..) => "if_icmpge",
            Instruction::IfIcmpGt(..) => "if_icmpgt",
            Instruction::IfIcmpLe(..) => "if_icmple",
            Instruction::IfAcmpEq(..) => "if_acmpeq",
            Instruction::IfAcmpNe(..) => "if_acmpne",
            Instruction::Goto(..) => "goto",
            Instruction::Jsr(..) => "jsr",
            Instruction::Ret(..) => "ret",
            Instruction::TableSwitch(..) => "tableswitch",
            Instruction::LookupSwitch(..) => "lookupswitch",
            Instruction::IReturn => "ireturn",
            Instruction::LReturn => "lreturn",
            Instruction::FReturn => "freturn",
            Instruction::DReturn => "dreturn",
            Instruction::AReturn => "areturn",
            Instruction::Return => "return",
            Instruction::GetStatic(..) => "getstatic",
            Instruction::PutStatic(..) => "putstatic",
            Instruction::GetField(..) => "getfield",
            Instruction::PutField(..) => "putfield",
            Instruction::InvokeVirtual(..) => "invokevirtual",
            Instruction::InvokeSpecial(..) => "invokespecial",
            Instruction::InvokeStatic(..) => "invokestatic",
            Instruction::InvokeInterface(..) => "invokeinterface",
            Instruction::InvokeDynamic(..) => "invokedynamic",
            Instruction::New(..) => "new",
            Instruction::NewArray(..) => "newarray",
            Instruction::ANewArray(..) => "anewarray",
            Instruction::ArrayLength => "arraylength",
            Instruction::AThrow => "athrow",
            Instruction::CheckCast(..) => "checkcast",
            Instruction::InstanceOf(..) => "instanceof",
            Instruction::MonitorEnter => "monitorenter",
            Instruction::MonitorExit => "monitorexit",
            Instruction::MultiANewArray(..) => "multianewarray",
            Instruction::IfNull(..) => "ifnull",
            Instruction::IfNonNull(..) => "ifnonnull",
            Instruction::GotoW(..) => "goto_w",
            Instruction::JsrW(..) => "jsr_w",
            Instruction::Breakpoint => "breakpoint",
            Instruction::ImpDep1 => "impdep1",
            Instruction::ImpDep2 => "impdep2",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mnemonic = self.mnemonic();
        match self {
            Instruction::BIPush(value) => write!(f, "{} {}", mnemonic, value),
            Instruction::SIPush(value) => write!(f, "{} {}", mnemonic, value),
            Instruction::Ldc(idx)
            | Instruction::LdcW(idx)
            | Instruction::Ldc2W(idx)
            | Instruction::GetStatic(idx)
            | Instruction::PutStatic(idx)
            | Instruction::GetField(idx)
            | Instruction::PutField(idx)
            | Instruction::InvokeVirtual(idx)
            | Instruction::InvokeSpecial(idx)
            | Instruction::InvokeStatic(idx)
            | Instruction::InvokeDynamic(idx)
            | Instruction::New(idx)
            | Instruction::ANewArray(idx)
            | Instruction::CheckCast(idx)
            | Instruction::InstanceOf(idx) => write!(f, "{} {}", mnemonic, idx),
            Instruction::InvokeInterface(idx, count) => {
                write!(f, "{} {}, {}", mnemonic, idx, count)
            }
            Instruction::MultiANewArray(idx, dimensions) => {
                write!(f, "{} {}, {}", mnemonic, idx, dimensions)
            }
            Instruction::ILoad(idx)
            | Instruction::LLoad(idx)
            | Instruction::FLoad(idx)
            | Instruction::DLoad(idx)
            | Instruction::ALoad(idx)
            | Instruction::IStore(idx)
            | Instruction::LStore(idx)
            | Instruction::FStore(idx)
            | Instruction::DStore(idx)
            | Instruction::AStore(idx)
            | Instruction::Ret(idx) => write!(f, "{} {}", mnemonic, idx),
            Instruction::IInc(idx, delta) => write!(f, "{} {}, {}", mnemonic, idx, delta),
            Instruction::IfEq(offset)
            | Instruction::IfNe(offset)
            | Instruction::IfLt(offset)
            | Instruction::IfGe(offset)
            | Instruction::IfGt(offset)
            | Instruction::IfLe(offset)
            | Instruction::IfIcmpEq(offset)
            | Instruction::IfIcmpNe(offset)
            | Instruction::IfIcmpLt(offset)
            | Instruction::IfIcmpGe(offset)
            | Instruction::IfIcmpGt(offset)
            | Instruction::IfIcmpLe(offset)
            | Instruction::IfAcmpEq(offset)
            | Instruction::IfAcmpNe(offset)
            | Instruction::Goto(offset)
            | Instruction::Jsr(offset)
            | Instruction::IfNull(offset)
            | Instruction::IfNonNull(offset) => write!(f, "{} {:+}", mnemonic, offset),
            Instruction::GotoW(offset) | Instruction::JsrW(offset) => {
                write!(f, "{} {:+}", mnemonic, offset)
            }
            Instruction::NewArray(ty) => write!(f, "{} {:?}", mnemonic, ty),
            Instruction::TableSwitch(default, low, high, offsets) => write!(
                f,
                "{} {}..={} {:?} default {:+}",
                mnemonic, low, high, offsets, default
            ),
            Instruction::LookupSwitch(default, pairs) => {
                write!(f, "{} {:?} default {:+}", mnemonic, pairs, default)
            }
            _ => f.write_str(mnemonic),
        }
    }
}

fn read_idx(data: &mut ByteCursor, wide: bool) -> Result<u16, Error> {
    if wide {
        data.read_u16()
    } else {
        data.read_u8().map(|v| v.into())
    }
}

fn read_const(data: &mut ByteCursor, wide: bool) -> Result<i16, Error> {
    if wide {
        data.read_i16()
    } else {
        data.read_i8().map(|v| v.into())
    }
}

fn expect_zero(data: &mut ByteCursor) -> Result<(), Error> {
    if data.read_u8()? != 0 {
        return Err(Error::ClassFileError("nonzero reserved instruction operand"));
    }
    Ok(())
}

fn read_table_switch(data: &mut ByteCursor) -> Result<Instruction, Error> {
    data.align_to(4)?;
    let default = data.read_i32()?;
    let low = data.read_i32()?;
    let high = data.read_i32()?;
    if high < low {
        return Err(Error::ClassFileError("tableswitch with high < low"));
    }
    let count = (high as i64 - low as i64 + 1) as usize;
    if count.saturating_mul(4) > data.remaining() {
        return Err(Error::Truncated {
            offset: data.position(),
            wanted: count.saturating_mul(4),
            remaining: data.remaining(),
        });
    }
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        offsets.push(data.read_i32()?);
    }
    Ok(Instruction::TableSwitch(default, low, high, offsets))
}

fn read_lookup_switch(data: &mut ByteCursor) -> Result<Instruction, Error> {
    data.align_to(4)?;
    let default = data.read_i32()?;
    // Not a bug!
    // "Immediately after the padding follow a series of signed 32-bit
    // values: default, npairs, and then npairs pairs of signed 32-bit values."
    let count = data.read_i32()?;
    if count < 0 {
        return Err(Error::ClassFileError("lookupswitch with negative pair count"));
    }
    let mut pairs = Vec::new();
    for _ in 0..count {
        pairs.push((data.read_i32()?, data.read_i32()?));
    }
    Ok(Instruction::LookupSwitch(default, pairs))
}

fn read_instruction(data: &mut ByteCursor, opc: u8, wide: bool) -> Result<Instruction, Error> {
    if wide {
        match opc {
            0x15..=0x19 | 0x36..=0x3a | 0x84 | 0xa9 => {}
            other => {
                return Err(Error::BadInstruction(other, true));
            }
        }
    }

    let instruction = match opc {
        0x00 => Instruction::Nop,
        0x01 => Instruction::AConstNull,
        0x02 => Instruction::IConstM1,
        0x03 => Instruction::IConst0,
        0x04 => Instruction::IConst1,
        0x05 => Instruction::IConst2,
        0x06 => Instruction::IConst3,
        0x07 => Instruction::IConst4,
        0x08 => Instruction::IConst5,
        0x09 => Instruction::LConst0,
        0x0a => Instruction::LConst1,
        0x0b => Instruction::FConst0,
        0x0c => Instruction::FConst1,
        0x0d => Instruction::FConst2,
        0x0e => Instruction::DConst0,
        0x0f => Instruction::DConst1,
        0x10 => Instruction::BIPush(data.read_i8()?),
        0x11 => Instruction::SIPush(data.read_i16()?),
        0x12 => Instruction::Ldc(ConstantIdx::new(data.read_u8()? as u16).ok_or(Error::BadIndex)?),
        0x13 => Instruction::LdcW(ConstantIdx::read_from(data)?),
        0x14 => Instruction::Ldc2W(ConstantIdx::read_from(data)?),
        0x15 => Instruction::ILoad(read_idx(data, wide)?),
        0x16 => Instruction::LLoad(read_idx(data, wide)?),
        0x17 => Instruction::FLoad(read_idx(data, wide)?),
        0x18 => Instruction::DLoad(read_idx(data, wide)?),
        0x19 => Instruction::ALoad(read_idx(data, wide)?),
        0x1a => Instruction::ILoad0,
        0x1b => Instruction::ILoad1,
        0x1c => Instruction::ILoad2,
        0x1d => Instruction::ILoad3,
        0x1e => Instruction::LLoad0,
        0x1f => Instruction::LLoad1,
        0x20 => Instruction::LLoad2,
        0x21 => Instruction::LLoad3,
        0x22 => Instruction::FLoad0,
        0x23 => Instruction::FLoad1,
        0x24 => Instruction::FLoad2,
        0x25 => Instruction::FLoad3,
        0x26 => Instruction::DLoad0,
        0x27 => Instruction::DLoad1,
        0x28 => Instruction::DLoad2,
        0x29 => Instruction::DLoad3,
        0x2a => Instruction::ALoad0,
        0x2b => Instruction::ALoad1,
        0x2c => Instruction::ALoad2,
        0x2d => Instruction::ALoad3,
        0x2e => Instruction::IALoad,
        0x2f => Instruction::LALoad,
        0x30 => Instruction::FALoad,
        0x31 => Instruction::DALoad,
        0x32 => Instruction::AALoad,
        0x33 => Instruction::BALoad,
        0x34 => Instruction::CALoad,
        0x35 => Instruction::SALoad,
        0x36 => Instruction::IStore(read_idx(data, wide)?),
        0x37 => Instruction::LStore(read_idx(data, wide)?),
        0x38 => Instruction::FStore(read_idx(data, wide)?),
        0x39 => Instruction::DStore(read_idx(data, wide)?),
        0x3a => Instruction::AStore(read_idx(data, wide)?),
        0x3b => Instruction::IStore0,
        0x3c => Instruction::IStore1,
        0x3d => Instruction::IStore2,
        0x3e => Instruction::IStore3,
        0x3f => Instruction::LStore0,
        0x40 => Instruction::LStore1,
        0x41 => Instruction::LStore2,
        0x42 => Instruction::LStore3,
        0x43 => Instruction::FStore0,
        0x44 => Instruction::FStore1,
        0x45 => Instruction::FStore2,
        0x46 => Instruction::FStore3,
        0x47 => Instruction::DStore0,
        0x48 => Instruction::DStore1,
        0x49 => Instruction::DStore2,
        0x4a => Instruction::DStore3,
        0x4b => Instruction::AStore0,
        0x4c => Instruction::AStore1,
        0x4d => Instruction::AStore2,
        0x4e => Instruction::AStore3,
        0x4f => Instruction::IAStore,
        0x50 => Instruction::LAStore,
        0x51 => Instruction::FAStore,
        0x52 => Instruction::DAStore,
        0x53 => Instruction::AAStore,
        0x54 => Instruction::BAStore,
        0x55 => Instruction::CAStore,
        0x56 => Instruction::SAStore,
        0x57 => Instruction::Pop,
        0x58 => Instruction::Pop2,
        0x59 => Instruction::Dup,
        0x5a => Instruction::DupX1,
        0x5b => Instruction::DupX2,
        0x5c => Instruction::Dup2,
        0x5d => Instruction::Dup2X1,
        0x5e => Instruction::Dup2X2,
        0x5f => Instruction::Swap,
        0x60 => Instruction::IAdd,
        0x61 => Instruction::LAdd,
        0x62 => Instruction::FAdd,
        0x63 => Instruction::DAdd,
        0x64 => Instruction::ISub,
        0x65 => Instruction::LSub,
        0x66 => Instruction::FSub,
        0x67 => Instruction::DSub,
        0x68 => Instruction::IMul,
        0x69 => Instruction::LMul,
        0x6a => Instruction::FMul,
        0x6b => Instruction::DMul,
        0x6c => Instruction::IDiv,
        0x6d => Instruction::LDiv,
        0x6e => Instruction::FDiv,
        0x6f => Instruction::DDiv,
        0x70 => Instruction::IRem,
        0x71 => Instruction::LRem,
        0x72 => Instruction::FRem,
        0x73 => Instruction::DRem,
        0x74 => Instruction::INeg,
        0x75 => Instruction::LNeg,
        0x76 => Instruction::FNeg,
        0x77 => Instruction::DNeg,
        0x78 => Instruction::IShl,
        0x79 => Instruction::LShl,
        0x7a => Instruction::IShr,
        0x7b => Instruction::LShr,
        0x7c => Instruction::IUshr,
        0x7d => Instruction::LUshr,
        0x7e => Instruction::IAnd,
        0x7f => Instruction::LAnd,
        0x80 => Instruction::IOr,
        0x81 => Instruction::LOr,
        0x82 => Instruction::IXor,
        0x83 => Instruction::LXor,
        0x84 => Instruction::IInc(read_idx(data, wide)?, read_const(data, wide)?),
        0x85 => Instruction::I2L,
        0x86 => Instruction::I2F,
        0x87 => Instruction::I2D,
        0x88 => Instruction::L2I,
        0x89 => Instruction::L2F,
        0x8a => Instruction::L2D,
        0x8b => Instruction::F2I,
        0x8c => Instruction::F2L,
        0x8d => Instruction::F2D,
        0x8e => Instruction::D2I,
        0x8f => Instruction::D2L,
        0x90 => Instruction::D2F,
        0x91 => Instruction::I2B,
        0x92 => Instruction::I2C,
        0x93 => Instruction::I2S,
        0x94 => Instruction::LCmp,
        0x95 => Instruction::FCmpL,
        0x96 => Instruction::FCmpG,
        0x97 => Instruction::DCmpL,
        0x98 => Instruction::DCmpG,
        0x99 => Instruction::IfEq(data.read_i16()?),
        0x9a => Instruction::IfNe(data.read_i16()?),
        0x9b => Instruction::IfLt(data.read_i16()?),
        0x9c => Instruction::IfGe(data.read_i16()?),
        0x9d => Instruction::IfGt(data.read_i16()?),
        0x9e => Instruction::IfLe(data.read_i16()?),
        0x9f => Instruction::IfIcmpEq(data.read_i16()?),
        0xa0 => Instruction::IfIcmpNe(data.read_i16()?),
        0xa1 => Instruction::IfIcmpLt(data.read_i16()?),
        0xa2 => Instruction::IfIcmpGe(data.read_i16()?),
        0xa3 => Instruction::IfIcmpGt(data.read_i16()?),
        0xa4 => Instruction::IfIcmpLe(data.read_i16()?),
        0xa5 => Instruction::IfAcmpEq(data.read_i16()?),
        0xa6 => Instruction::IfAcmpNe(data.read_i16()?),
        0xa7 => Instruction::Goto(data.read_i16()?),
        0xa8 => Instruction::Jsr(data.read_i16()?),
        0xa9 => Instruction::Ret(read_idx(data, wide)?),
        0xaa => read_table_switch(data)?,
        0xab => read_lookup_switch(data)?,
        0xac => Instruction::IReturn,
        0xad => Instruction::LReturn,
        0xae => Instruction::FReturn,
        0xaf => Instruction::DReturn,
        0xb0 => Instruction::AReturn,
        0xb1 => Instruction::Return,
        0xb2 => Instruction::GetStatic(ConstantIdx::read_from(data)?),
        0xb3 => Instruction::PutStatic(ConstantIdx::read_from(data)?),
        0xb4 => Instruction::GetField(ConstantIdx::read_from(data)?),
        0xb5 => Instruction::PutField(ConstantIdx::read_from(data)?),
        0xb6 => Instruction::InvokeVirtual(ConstantIdx::read_from(data)?),
        0xb7 => Instruction::InvokeSpecial(ConstantIdx::read_from(data)?),
        0xb8 => Instruction::InvokeStatic(ConstantIdx::read_from(data)?),
        0xb9 => {
            let idx = ConstantIdx::read_from(data)?;
            let count = data.read_u8()?;
            expect_zero(data)?;
            Instruction::InvokeInterface(idx, count)
        }
        0xba => {
            let idx = ConstantIdx::read_from(data)?;
            expect_zero(data)?;
            expect_zero(data)?;
            Instruction::InvokeDynamic(idx)
        }
        0xbb => Instruction::New(ConstantIdx::read_from(data)?),
        0xbc => Instruction::NewArray(ArrayType::from_code(data.read_u8()?)?),
        0xbd => Instruction::ANewArray(ConstantIdx::read_from(data)?),
        0xbe => Instruction::ArrayLength,
        0xbf => Instruction::AThrow,
        0xc0 => Instruction::CheckCast(ConstantIdx::read_from(data)?),
        0xc1 => Instruction::InstanceOf(ConstantIdx::read_from(data)?),
        0xc2 => Instruction::MonitorEnter,
        0xc3 => Instruction::MonitorExit,
        0xc5 => Instruction::MultiANewArray(ConstantIdx::read_from(data)?, data.read_u8()?),
        0xc6 => Instruction::IfNull(data.read_i16()?),
        0xc7 => Instruction::IfNonNull(data.read_i16()?),
        0xc8 => Instruction::GotoW(data.read_i32()?),
        0xc9 => Instruction::JsrW(data.read_i32()?),
        0xca => Instruction::Breakpoint,
        0xfe => Instruction::ImpDep1,
        0xff => Instruction::ImpDep2,
        other => {
            return Err(Error::BadInstruction(other, wide));
        }
    };
    Ok(instruction)
}

impl FromReader for Instruction {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        let first = data.read_u8()?;

        if first == WIDE {
            let next = data.read_u8()?;
            read_instruction(data, next, true)
        } else {
            read_instruction(data, first, false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_follow_operands() {
        let code = [0x10, 0xff, 0x11, 0x01, 0x00, 0x60, 0xb1];
        assert_eq!(
            Instruction::decode_at(&code, 0).unwrap(),
            (Instruction::BIPush(-1), 2)
        );
        assert_eq!(
            Instruction::decode_at(&code, 2).unwrap(),
            (Instruction::SIPush(256), 3)
        );
        assert_eq!(Instruction::decode_at(&code, 5).unwrap(), (Instruction::IAdd, 1));
        assert_eq!(Instruction::decode_at(&code, 6).unwrap(), (Instruction::Return, 1));
    }

    #[test]
    fn iinc_delta_is_signed() {
        let code = [0x84, 0x01, 0xff];
        assert_eq!(
            Instruction::decode_at(&code, 0).unwrap(),
            (Instruction::IInc(1, -1), 3)
        );
        let wide = [0xc4, 0x84, 0x01, 0x00, 0xff, 0x38];
        assert_eq!(
            Instruction::decode_at(&wide, 0).unwrap(),
            (Instruction::IInc(256, -200), 6)
        );
    }

    #[test]
    fn wide_load_and_bad_wide() {
        let code = [0xc4, 0x15, 0x01, 0x02];
        assert_eq!(
            Instruction::decode_at(&code, 0).unwrap(),
            (Instruction::ILoad(0x0102), 4)
        );
        assert!(matches!(
            Instruction::decode_at(&[0xc4, 0x60], 0),
            Err(Error::BadInstruction(0x60, true))
        ));
    }

    #[test]
    fn long_and_array_opcodes_are_distinct() {
        assert_eq!(Instruction::decode_at(&[0x61], 0).unwrap().0, Instruction::LAdd);
        assert_eq!(Instruction::decode_at(&[0x2e], 0).unwrap().0, Instruction::IALoad);
        assert_eq!(Instruction::decode_at(&[0x4f], 0).unwrap().0, Instruction::IAStore);
        assert_eq!(Instruction::decode_at(&[0x94], 0).unwrap().0, Instruction::LCmp);
    }

    #[test]
    fn goto_offsets_are_signed() {
        let (inst, width) = Instruction::decode_at(&[0xa7, 0xff, 0xfd], 0).unwrap();
        assert_eq!(inst, Instruction::Goto(-3));
        assert_eq!(width, 3);
        assert_eq!(inst.to_string(), "goto -3");
    }

    #[test]
    fn tableswitch_padding_is_relative_to_code_start() {
        // nop, then tableswitch at pc 1: two padding bytes bring the operands to pc 4.
        let mut code = vec![0x00, 0xaa, 0x00, 0x00];
        for word in [20i32, 0, 1, 10, 12].iter() {
            code.extend_from_slice(&word.to_be_bytes());
        }
        let (inst, width) = Instruction::decode_at(&code, 1).unwrap();
        assert_eq!(inst, Instruction::TableSwitch(20, 0, 1, vec![10, 12]));
        assert_eq!(width, code.len() - 1);
    }

    #[test]
    fn undefined_and_reserved_opcodes() {
        assert!(matches!(
            Instruction::decode_at(&[0xcb], 0),
            Err(Error::BadInstruction(0xcb, false))
        ));
        assert_eq!(Instruction::decode_at(&[0xca], 0).unwrap().0, Instruction::Breakpoint);
        assert_eq!(Instruction::decode_at(&[0xff], 0).unwrap().0.mnemonic(), "impdep2");
    }

    #[test]
    fn opcode_matches_decoded_byte() {
        for byte in 0u8..=0xc9 {
            if byte == 0xc4 || byte == 0xaa || byte == 0xab {
                continue;
            }
            let mut code = vec![byte];
            code.extend_from_slice(&[1, 1, 0, 0, 0]);
            if byte == 0xbc {
                code[1] = 10;
            }
            let (inst, _) = Instruction::decode_at(&code, 0).unwrap();
            assert_eq!(inst.opcode(), byte, "{}", inst.mnemonic());
        }
    }
}
