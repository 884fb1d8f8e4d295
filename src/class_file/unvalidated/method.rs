use crate::class_file::unvalidated::AttributeInfo;
use crate::class_file::unvalidated::ConstantIdx;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodAccessFlags {
    pub flags: u16,
}

impl MethodAccessFlags {
    pub fn is_public(&self) -> bool {
        (self.flags & 0x0001) == 0x0001
    }
    pub fn is_private(&self) -> bool {
        (self.flags & 0x0002) == 0x0002
    }
    pub fn is_protected(&self) -> bool {
        (self.flags & 0x0004) == 0x0004
    }
    pub fn is_static(&self) -> bool {
        (self.flags & 0x0008) == 0x0008
    }
    pub fn is_final(&self) -> bool {
        (self.flags & 0x0010) == 0x0010
    }
    pub fn is_synchronized(&self) -> bool {
        (self.flags & 0x0020) == 0x0020
    }
    pub fn is_bridge(&self) -> bool {
        (self.flags & 0x0040) == 0x0040
    }
    pub fn is_varargs(&self) -> bool {
        (self.flags & 0x0080) == 0x0080
    }
    pub fn is_native(&self) -> bool {
        (self.flags & 0x0100) == 0x0100
    }
    pub fn is_abstract(&self) -> bool {
        (self.flags & 0x0400) == 0x0400
    }
    pub fn is_strict(&self) -> bool {
        (self.flags & 0x0800) == 0x0800
    }
    pub fn is_synthetic(&self) -> bool {
        (self.flags & 0x1000) == 0x1000
    }
}

#[derive(Debug, Clone)]
pub struct MethodInfo {
    pub access_flags: MethodAccessFlags,
    pub name_index: ConstantIdx,
    pub descriptor_index: ConstantIdx,
    pub attributes: Vec<AttributeInfo>,
}

/// The `reference_kind` of a `CONSTANT_MethodHandle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodHandleBehavior {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
    Other(u8),
}

impl MethodHandleBehavior {
    pub fn from_kind(kind: u8) -> Self {
        match kind {
            1 => MethodHandleBehavior::GetField,
            2 => MethodHandleBehavior::GetStatic,
            3 => MethodHandleBehavior::PutField,
            4 => MethodHandleBehavior::PutStatic,
            5 => MethodHandleBehavior::InvokeVirtual,
            6 => MethodHandleBehavior::InvokeStatic,
            7 => MethodHandleBehavior::InvokeSpecial,
            8 => MethodHandleBehavior::NewInvokeSpecial,
            9 => MethodHandleBehavior::InvokeInterface,
            other => MethodHandleBehavior::Other(other),
        }
    }

    pub fn kind(&self) -> u8 {
        match self {
            MethodHandleBehavior::GetField => 1,
            MethodHandleBehavior::GetStatic => 2,
            MethodHandleBehavior::PutField => 3,
            MethodHandleBehavior::PutStatic => 4,
            MethodHandleBehavior::InvokeVirtual => 5,
            MethodHandleBehavior::InvokeStatic => 6,
            MethodHandleBehavior::InvokeSpecial => 7,
            MethodHandleBehavior::NewInvokeSpecial => 8,
            MethodHandleBehavior::InvokeInterface => 9,
            MethodHandleBehavior::Other(kind) => *kind,
        }
    }
}
