use crate::class_file::unvalidated::AccessFlags;
use crate::class_file::unvalidated::AttributeInfo;
use crate::class_file::unvalidated::ClassFile;
use crate::class_file::unvalidated::Constant;
use crate::class_file::unvalidated::ConstantIdx;
use crate::class_file::unvalidated::Error;
use crate::class_file::unvalidated::FieldAccessFlags;
use crate::class_file::unvalidated::FieldInfo;
use crate::class_file::unvalidated::MethodAccessFlags;
use crate::class_file::unvalidated::MethodHandleBehavior;
use crate::class_file::unvalidated::MethodInfo;

use byteorder::{BigEndian, ByteOrder};

pub const CLASS_MAGIC: u32 = 0xcafebabe;

/// A forward-only reader over an immutable byte buffer. Every read either consumes exactly its
/// width or fails with `Error::Truncated` without moving.
#[derive(Debug, Clone)]
pub struct ByteCursor<'data> {
    data: &'data [u8],
    position: usize,
}

impl<'data> ByteCursor<'data> {
    pub fn new(data: &'data [u8]) -> Self {
        ByteCursor { data, position: 0 }
    }

    /// A cursor over all of `data`, starting at `position`. Used by the instruction decoder so
    /// switch padding can be computed against the start of the method's code.
    pub fn at(data: &'data [u8], position: usize) -> Self {
        ByteCursor { data, position }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, wanted: usize) -> Result<&'data [u8], Error> {
        let remaining = self.remaining();
        if wanted > remaining {
            return Err(Error::Truncated {
                offset: self.position,
                wanted,
                remaining,
            });
        }
        let start = self.position;
        self.position += wanted;
        Ok(&self.data[start..self.position])
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16, Error> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, Error> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        Ok(BigEndian::read_u64(self.take(8)?))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'data [u8], Error> {
        self.take(len)
    }

    /// Skip forward until the position is a multiple of `alignment`.
    pub fn align_to(&mut self, alignment: usize) -> Result<(), Error> {
        let padding = (alignment - self.position % alignment) % alignment;
        self.take(padding).map(|_| ())
    }
}

pub trait FromReader: Sized {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error>;
}

impl FromReader for u8 {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        data.read_u8()
    }
}

impl FromReader for i8 {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        data.read_i8()
    }
}

impl FromReader for u16 {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        data.read_u16()
    }
}

impl FromReader for i16 {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        data.read_i16()
    }
}

impl FromReader for u32 {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        data.read_u32()
    }
}

impl FromReader for i32 {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        data.read_i32()
    }
}

impl FromReader for u64 {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        data.read_u64()
    }
}

impl FromReader for AccessFlags {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        Ok(AccessFlags {
            flags: data.read_u16()?,
        })
    }
}

impl FromReader for FieldAccessFlags {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        Ok(FieldAccessFlags {
            flags: data.read_u16()?,
        })
    }
}

impl FromReader for MethodAccessFlags {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        Ok(MethodAccessFlags {
            flags: data.read_u16()?,
        })
    }
}

impl FromReader for AttributeInfo {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        let name_index = ConstantIdx::read_from(data)?;
        let attr_length = data.read_u32()? as usize;
        let attr_data = data.read_bytes(attr_length)?.to_vec();
        Ok(AttributeInfo {
            name_index,
            data: attr_data,
        })
    }
}

impl FromReader for FieldInfo {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        let access_flags = FieldAccessFlags::read_from(data)?;
        let name_index = ConstantIdx::read_from(data)?;
        let descriptor_index = ConstantIdx::read_from(data)?;
        let attributes = read_prefixed_array::<AttributeInfo>(data)?;
        Ok(FieldInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }
}

impl FromReader for MethodInfo {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        let access_flags = MethodAccessFlags::read_from(data)?;
        let name_index = ConstantIdx::read_from(data)?;
        let descriptor_index = ConstantIdx::read_from(data)?;
        let attributes = read_prefixed_array::<AttributeInfo>(data)?;
        Ok(MethodInfo {
            access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }
}

impl FromReader for MethodHandleBehavior {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        Ok(MethodHandleBehavior::from_kind(data.read_u8()?))
    }
}

impl FromReader for ConstantIdx {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        let idx = data.read_u16()?;
        if idx == 0 {
            return Err(Error::BadIndex);
        }

        Ok(ConstantIdx { idx })
    }
}

impl FromReader for Option<ConstantIdx> {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        let idx = data.read_u16()?;
        if idx == 0 {
            return Ok(None);
        }

        Ok(Some(ConstantIdx { idx }))
    }
}

/// Decode the constant at pool position `index`. `index` is only used for error reporting.
fn read_constant(data: &mut ByteCursor, index: u16) -> Result<Constant, Error> {
    let tag = data.read_u8()?;
    let entry = match tag {
        1 => {
            let len = data.read_u16()? as usize;
            Constant::Utf8(data.read_bytes(len)?.to_vec())
        }
        3 => Constant::Integer(data.read_u32()?),
        4 => Constant::Float(data.read_u32()?),
        5 => Constant::Long(data.read_u64()?),
        6 => Constant::Double(data.read_u64()?),
        7 => Constant::Class(ConstantIdx::read_from(data)?),
        8 => Constant::String(ConstantIdx::read_from(data)?),
        9 => Constant::Fieldref(ConstantIdx::read_from(data)?, ConstantIdx::read_from(data)?),
        10 => Constant::Methodref(ConstantIdx::read_from(data)?, ConstantIdx::read_from(data)?),
        11 => Constant::InterfaceMethodref(
            ConstantIdx::read_from(data)?,
            ConstantIdx::read_from(data)?,
        ),
        12 => Constant::NameAndType(ConstantIdx::read_from(data)?, ConstantIdx::read_from(data)?),
        15 => Constant::MethodHandle(
            MethodHandleBehavior::read_from(data)?,
            ConstantIdx::read_from(data)?,
        ),
        16 => Constant::MethodType(ConstantIdx::read_from(data)?),
        17 => Constant::Dynamic(data.read_u16()?, ConstantIdx::read_from(data)?),
        18 => Constant::InvokeDynamic(data.read_u16()?, ConstantIdx::read_from(data)?),
        19 => Constant::Module(ConstantIdx::read_from(data)?),
        20 => Constant::Package(ConstantIdx::read_from(data)?),
        tag => {
            return Err(Error::UnknownConstantTag { tag, index });
        }
    };
    Ok(entry)
}

/// Read a `count`-prefixed constant pool. The returned table is indexed exactly like the class
/// file indexes it: position 0 and the slot following every Long or Double hold
/// `Constant::Unusable`.
fn read_constant_pool(data: &mut ByteCursor) -> Result<Vec<Constant>, Error> {
    let count = data.read_u16()? as usize;
    if count == 0 {
        return Err(Error::ClassFileError("constant pool count must be at least 1"));
    }

    let mut constants = Vec::with_capacity(count);
    constants.push(Constant::Unusable);
    while constants.len() < count {
        let constant = read_constant(data, constants.len() as u16)?;
        let wide = constant.is_wide();
        constants.push(constant);
        if wide {
            if constants.len() == count {
                return Err(Error::ClassFileError(
                    "long or double constant occupies the final pool slot",
                ));
            }
            constants.push(Constant::Unusable);
        }
    }
    Ok(constants)
}

pub(crate) fn read_prefixed_array<T: FromReader>(data: &mut ByteCursor) -> Result<Vec<T>, Error> {
    let count = data.read_u16()?;
    let mut elements = Vec::with_capacity(count as usize);
    for _ in 0..count {
        elements.push(T::read_from(data)?);
    }
    Ok(elements)
}

pub fn class_header(bytes: &[u8]) -> Result<ClassFile, Error> {
    let mut data = ByteCursor::new(bytes);
    let magic = data.read_u32()?;
    if magic != CLASS_MAGIC {
        return Err(Error::BadMagic(magic));
    }
    let minor_version = data.read_u16()?;
    let major_version = data.read_u16()?;
    let constant_pool = read_constant_pool(&mut data)?;
    let access_flags = AccessFlags::read_from(&mut data)?;
    let this_class = ConstantIdx::read_from(&mut data)?;
    let super_class = Option::<ConstantIdx>::read_from(&mut data)?;
    let interfaces = read_prefixed_array::<ConstantIdx>(&mut data)?;
    let fields = read_prefixed_array::<FieldInfo>(&mut data)?;
    let methods = read_prefixed_array::<MethodInfo>(&mut data)?;
    let attributes = read_prefixed_array::<AttributeInfo>(&mut data)?;

    if !data.is_empty() {
        return Err(Error::ClassFileError("trailing bytes after class attributes"));
    }

    Ok(ClassFile {
        minor_version,
        major_version,
        constant_pool,
        access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_reads_big_endian_and_advances() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut cursor = ByteCursor::new(&bytes);
        assert_eq!(cursor.read_u8().unwrap(), 0x01);
        assert_eq!(cursor.position(), 1);
        assert_eq!(cursor.read_u16().unwrap(), 0x0203);
        assert_eq!(cursor.read_u32().unwrap(), 0x04050607);
        assert!(cursor.is_empty());
    }

    #[test]
    fn truncated_read_does_not_move() {
        let bytes = [0xca, 0xfe, 0xba];
        let mut cursor = ByteCursor::new(&bytes);
        match cursor.read_u32() {
            Err(Error::Truncated {
                offset: 0,
                wanted: 4,
                remaining: 3,
            }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.read_bytes(3).unwrap(), &bytes[..]);
        assert!(cursor.read_u8().is_err());
    }

    #[test]
    fn u64_and_signed_reads() {
        let bytes = [0xff, 0xfe, 0, 0, 0, 0, 0, 0, 0, 0x2a];
        let mut cursor = ByteCursor::new(&bytes);
        assert_eq!(cursor.read_i16().unwrap(), -2);
        assert_eq!(cursor.read_u64().unwrap(), 0x2a);
    }

    #[test]
    fn alignment_is_relative_to_buffer_start() {
        let bytes = [0u8; 12];
        let mut cursor = ByteCursor::at(&bytes, 1);
        cursor.align_to(4).unwrap();
        assert_eq!(cursor.position(), 4);
        cursor.align_to(4).unwrap();
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn zero_constant_index_is_rejected() {
        let bytes = [0, 0];
        assert!(matches!(
            ConstantIdx::read_from(&mut ByteCursor::new(&bytes)),
            Err(Error::BadIndex)
        ));
        assert_eq!(
            Option::<ConstantIdx>::read_from(&mut ByteCursor::new(&bytes)).unwrap(),
            None
        );
    }
}
