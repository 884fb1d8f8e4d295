pub mod attribute;
pub mod class;
pub mod constant;
pub mod field;
pub mod instruction;
pub mod method;
pub mod read;

pub use instruction::Instruction;

pub use crate::class_file::unvalidated::attribute::Attribute;
pub use crate::class_file::unvalidated::attribute::AttributeInfo;
pub use crate::class_file::unvalidated::attribute::CodeAttribute;
pub use crate::class_file::unvalidated::attribute::ExceptionTableRecord;
pub use crate::class_file::unvalidated::attribute::LineNumberEntry;
pub use crate::class_file::unvalidated::attribute::LocalVariableEntry;
pub use crate::class_file::unvalidated::class::AccessFlags;
pub use crate::class_file::unvalidated::class::ClassFile;
pub use crate::class_file::unvalidated::constant::Constant;
pub use crate::class_file::unvalidated::constant::ConstantIdx;
pub use crate::class_file::unvalidated::field::FieldAccessFlags;
pub use crate::class_file::unvalidated::field::FieldInfo;
pub use crate::class_file::unvalidated::method::MethodAccessFlags;
pub use crate::class_file::unvalidated::method::MethodHandleBehavior;
pub use crate::class_file::unvalidated::method::MethodInfo;
pub use crate::class_file::unvalidated::read::ByteCursor;

use thiserror::Error;

/// Everything that can go wrong while turning bytes into a `ClassFile`. None of these are
/// recoverable: the input is malformed or incomplete.
#[derive(Debug, Error)]
pub enum Error {
    #[error("bad magic {0:#010x}, expected 0xcafebabe")]
    BadMagic(u32),
    #[error("constant pool index 0 is never valid")]
    BadIndex,
    #[error("truncated input: wanted {wanted} bytes at offset {offset}, {remaining} remaining")]
    Truncated {
        offset: usize,
        wanted: usize,
        remaining: usize,
    },
    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag { tag: u8, index: u16 },
    #[error("bad instruction {0:#04x} (wide: {1})")]
    BadInstruction(u8, bool),
    #[error("malformed class file: {0}")]
    ClassFileError(&'static str),
    #[error("unsupported attribute {0}")]
    UnsupportedAttribute(String),
}
