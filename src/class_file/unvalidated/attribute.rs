use crate::class_file::unvalidated::ClassFile;
use crate::class_file::unvalidated::ConstantIdx;
use crate::class_file::unvalidated::Error;

use crate::class_file::unvalidated::read::read_prefixed_array;
use crate::class_file::unvalidated::read::ByteCursor;
use crate::class_file::unvalidated::read::FromReader;

use byteorder::{BigEndian, ByteOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionTableRecord {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    /// `None` catches everything.
    pub catch_type: Option<ConstantIdx>,
}

impl ExceptionTableRecord {
    /// Handler ranges are half-open: `start_pc` is covered, `end_pc` is not.
    pub fn covers(&self, pc: u32) -> bool {
        (self.start_pc as u32) <= pc && pc < (self.end_pc as u32)
    }
}

impl FromReader for ExceptionTableRecord {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        Ok(ExceptionTableRecord {
            start_pc: u16::read_from(data)?,
            end_pc: u16::read_from(data)?,
            handler_pc: u16::read_from(data)?,
            catch_type: Option::<ConstantIdx>::read_from(data)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

impl FromReader for LineNumberEntry {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        Ok(LineNumberEntry {
            start_pc: u16::read_from(data)?,
            line_number: u16::read_from(data)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariableEntry {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: ConstantIdx,
    pub descriptor_index: ConstantIdx,
    pub index: u16,
}

impl FromReader for LocalVariableEntry {
    fn read_from(data: &mut ByteCursor) -> Result<Self, Error> {
        Ok(LocalVariableEntry {
            start_pc: u16::read_from(data)?,
            length: u16::read_from(data)?,
            name_index: ConstantIdx::read_from(data)?,
            descriptor_index: ConstantIdx::read_from(data)?,
            index: u16::read_from(data)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeAttribute {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableRecord>,
    pub attributes: Vec<AttributeInfo>,
}

impl CodeAttribute {
    pub fn new(max_stack: u16, max_locals: u16, code: Vec<u8>) -> Self {
        CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        let data = &mut ByteCursor::new(data);
        let max_stack = u16::read_from(data)?;
        let max_locals = u16::read_from(data)?;
        let code_length = u32::read_from(data)? as usize;
        if code_length == 0 {
            return Err(Error::ClassFileError("code attribute with empty code"));
        }
        let code = data.read_bytes(code_length)?.to_vec();
        let exception_table = read_prefixed_array::<ExceptionTableRecord>(data)?;
        let attributes = read_prefixed_array::<AttributeInfo>(data)?;
        expect_consumed(data)?;
        Ok(CodeAttribute {
            max_stack,
            max_locals,
            code,
            exception_table,
            attributes,
        })
    }

    /// The attribute body as it would appear in a class file, without the name and length
    /// header.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + self.code.len());
        put_u16(&mut out, self.max_stack);
        put_u16(&mut out, self.max_locals);
        put_u32(&mut out, self.code.len() as u32);
        out.extend_from_slice(&self.code);
        put_u16(&mut out, self.exception_table.len() as u16);
        for record in self.exception_table.iter() {
            put_u16(&mut out, record.start_pc);
            put_u16(&mut out, record.end_pc);
            put_u16(&mut out, record.handler_pc);
            put_u16(&mut out, record.catch_type.map(|idx| idx.inner()).unwrap_or(0));
        }
        put_u16(&mut out, self.attributes.len() as u16);
        for attr in self.attributes.iter() {
            put_u16(&mut out, attr.name_index.inner());
            put_u32(&mut out, attr.data.len() as u32);
            out.extend_from_slice(&attr.data);
        }
        out
    }
}

pub(crate) fn put_u16(out: &mut Vec<u8>, value: u16) {
    let mut buf = [0u8; 2];
    BigEndian::write_u16(&mut buf, value);
    out.extend_from_slice(&buf);
}

pub(crate) fn put_u32(out: &mut Vec<u8>, value: u32) {
    let mut buf = [0u8; 4];
    BigEndian::write_u32(&mut buf, value);
    out.extend_from_slice(&buf);
}

fn expect_consumed(data: &ByteCursor) -> Result<(), Error> {
    if data.is_empty() {
        Ok(())
    } else {
        Err(Error::ClassFileError("attribute length disagrees with its contents"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    // constantvalue_index
    ConstantValue(ConstantIdx),
    Code(CodeAttribute),
    Exceptions(Vec<ConstantIdx>),
    LineNumberTable(Vec<LineNumberEntry>),
    LocalVariableTable(Vec<LocalVariableEntry>),
    SourceFile(ConstantIdx),
    Signature(ConstantIdx),
}

/// An attribute as it sits in the class file. Typed views are produced on demand by
/// `materialize`, so unknown attributes cost nothing unless someone asks about them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeInfo {
    pub(crate) name_index: ConstantIdx,
    pub(crate) data: Vec<u8>,
}

impl AttributeInfo {
    pub fn name_index(&self) -> ConstantIdx {
        self.name_index
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn name<'a>(&self, class_file: &'a ClassFile) -> Option<&'a str> {
        class_file.get_str(self.name_index)
    }

    pub fn materialize(&self, class_file: &ClassFile) -> Result<Attribute, Error> {
        let data = &mut ByteCursor::new(&self.data);
        let attribute = match class_file.get_raw_str(self.name_index) {
            Some(b"ConstantValue") => Attribute::ConstantValue(ConstantIdx::read_from(data)?),
            Some(b"Code") => return Ok(Attribute::Code(CodeAttribute::parse(&self.data)?)),
            Some(b"Exceptions") => Attribute::Exceptions(read_prefixed_array(data)?),
            Some(b"LineNumberTable") => Attribute::LineNumberTable(read_prefixed_array(data)?),
            Some(b"LocalVariableTable") => {
                Attribute::LocalVariableTable(read_prefixed_array(data)?)
            }
            Some(b"SourceFile") => Attribute::SourceFile(ConstantIdx::read_from(data)?),
            Some(b"Signature") => Attribute::Signature(ConstantIdx::read_from(data)?),
            Some(other) => {
                return Err(Error::UnsupportedAttribute(
                    String::from_utf8_lossy(other).into_owned(),
                ));
            }
            None => {
                return Err(Error::ClassFileError(
                    "bad constant pool index - not a utf8",
                ));
            }
        };
        expect_consumed(data)?;
        Ok(attribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_attribute_parse_matches_encode() {
        let mut code = CodeAttribute::new(2, 1, vec![0x04, 0xac]);
        code.exception_table.push(ExceptionTableRecord {
            start_pc: 0,
            end_pc: 1,
            handler_pc: 1,
            catch_type: None,
        });
        let parsed = CodeAttribute::parse(&code.encode()).unwrap();
        assert_eq!(parsed, code);
        assert!(parsed.exception_table[0].covers(0));
        assert!(!parsed.exception_table[0].covers(1));
    }

    #[test]
    fn short_code_attribute_is_truncated() {
        let mut bytes = CodeAttribute::new(1, 1, vec![0xb1]).encode();
        bytes.truncate(6);
        assert!(matches!(
            CodeAttribute::parse(&bytes),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn unknown_attribute_keeps_its_name() {
        let mut class = ClassFile::synthetic("A");
        let name_index = class.add_utf8("Deprecated");
        let attr = AttributeInfo {
            name_index,
            data: Vec::new(),
        };
        match attr.materialize(&class) {
            Err(Error::UnsupportedAttribute(name)) => assert_eq!(name, "Deprecated"),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(attr.name(&class), Some("Deprecated"));
    }

    #[test]
    fn line_number_table_projection() {
        let mut class = ClassFile::synthetic("A");
        let name_index = class.add_utf8("LineNumberTable");
        let mut data = Vec::new();
        put_u16(&mut data, 2);
        for (pc, line) in [(0u16, 10u16), (4, 11)].iter() {
            put_u16(&mut data, *pc);
            put_u16(&mut data, *line);
        }
        let attr = AttributeInfo { name_index, data };
        assert_eq!(
            attr.materialize(&class).unwrap(),
            Attribute::LineNumberTable(vec![
                LineNumberEntry {
                    start_pc: 0,
                    line_number: 10
                },
                LineNumberEntry {
                    start_pc: 4,
                    line_number: 11
                },
            ])
        );
    }
}
