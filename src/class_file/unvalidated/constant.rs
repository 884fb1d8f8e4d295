use crate::class_file::unvalidated::MethodHandleBehavior;

use std::fmt;

/// A constant pool entry exactly as encoded. Numeric payloads are kept as their raw bits; the
/// resolver reinterprets them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    /// Index 0, and the slot following a `Long` or `Double`.
    Unusable,
    Utf8(Vec<u8>),
    Integer(u32),
    Float(u32),
    Long(u64),
    Double(u64),
    Class(ConstantIdx),
    String(ConstantIdx),
    Fieldref(ConstantIdx, ConstantIdx),
    Methodref(ConstantIdx, ConstantIdx),
    InterfaceMethodref(ConstantIdx, ConstantIdx),
    NameAndType(ConstantIdx, ConstantIdx),
    MethodHandle(MethodHandleBehavior, ConstantIdx),
    MethodType(ConstantIdx),
    Dynamic(u16, ConstantIdx),
    InvokeDynamic(u16, ConstantIdx),
    Module(ConstantIdx),
    Package(ConstantIdx),
}

impl Constant {
    pub fn type_name(&self) -> &'static str {
        match self {
            Constant::Unusable => "Unusable",
            Constant::Utf8(_) => "Utf8",
            Constant::Integer(_) => "Integer",
            Constant::Float(_) => "Float",
            Constant::Long(_) => "Long",
            Constant::Double(_) => "Double",
            Constant::Class(_) => "Class",
            Constant::String(_) => "String",
            Constant::Fieldref(_, _) => "Fieldref",
            Constant::Methodref(_, _) => "Methodref",
            Constant::InterfaceMethodref(_, _) => "InterfaceMethodref",
            Constant::NameAndType(_, _) => "NameAndType",
            Constant::MethodHandle(_, _) => "MethodHandle",
            Constant::MethodType(_) => "MethodType",
            Constant::Dynamic(_, _) => "Dynamic",
            Constant::InvokeDynamic(_, _) => "InvokeDynamic",
            Constant::Module(_) => "Module",
            Constant::Package(_) => "Package",
        }
    }

    /// `Long` and `Double` take up two constant pool slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstantIdx {
    /// In a just world, this would be `NonZero<u16>`.
    pub(crate) idx: u16,
}

impl ConstantIdx {
    pub fn inner(&self) -> u16 {
        self.idx
    }

    pub fn new(idx: u16) -> Option<ConstantIdx> {
        if idx == 0 {
            None
        } else {
            Some(ConstantIdx { idx })
        }
    }
}

impl fmt::Display for ConstantIdx {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.idx)
    }
}
