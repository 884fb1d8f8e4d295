use crate::class_file::unvalidated::Attribute;
use crate::class_file::unvalidated::AttributeInfo;
use crate::class_file::unvalidated::CodeAttribute;
use crate::class_file::unvalidated::Constant;
use crate::class_file::unvalidated::ConstantIdx;
use crate::class_file::unvalidated::Error;
use crate::class_file::unvalidated::FieldAccessFlags;
use crate::class_file::unvalidated::FieldInfo;
use crate::class_file::unvalidated::MethodAccessFlags;
use crate::class_file::unvalidated::MethodInfo;

use crate::class_file::unvalidated::attribute::put_u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessFlags {
    pub(crate) flags: u16,
}

impl AccessFlags {
    pub fn new(flags: u16) -> Self {
        AccessFlags { flags }
    }
    pub fn bits(&self) -> u16 {
        self.flags
    }
    pub fn is_public(&self) -> bool {
        (self.flags & 0x0001) == 0x0001
    }
    pub fn is_final(&self) -> bool {
        (self.flags & 0x0010) == 0x0010
    }
    pub fn is_super(&self) -> bool {
        (self.flags & 0x0020) == 0x0020
    }
    pub fn is_interface(&self) -> bool {
        (self.flags & 0x0200) == 0x0200
    }
    pub fn is_abstract(&self) -> bool {
        (self.flags & 0x0400) == 0x0400
    }
    pub fn is_synthetic(&self) -> bool {
        (self.flags & 0x1000) == 0x1000
    }
    pub fn is_annotation(&self) -> bool {
        (self.flags & 0x2000) == 0x2000
    }
    pub fn is_enum(&self) -> bool {
        (self.flags & 0x4000) == 0x4000
    }
}

/// As cute as a zero-copy class file parse would be, I really don't want to think about DSTs,
/// which are all over the place.
///
/// `constant_pool` is indexed the way the class file indexes it: `constant_pool[0]` is
/// `Constant::Unusable`, as is the slot after every `Long` and `Double`.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub(crate) minor_version: u16,
    pub(crate) major_version: u16,
    pub(crate) constant_pool: Vec<Constant>,
    pub(crate) access_flags: AccessFlags,
    pub(crate) this_class: ConstantIdx,
    pub(crate) super_class: Option<ConstantIdx>,
    pub(crate) interfaces: Vec<ConstantIdx>,
    pub(crate) fields: Vec<FieldInfo>,
    pub(crate) methods: Vec<MethodInfo>,
    pub(crate) attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    pub fn minor_version(&self) -> u16 {
        self.minor_version
    }

    pub fn major_version(&self) -> u16 {
        self.major_version
    }

    /// The pool count as written in the class file: one more than the highest usable index.
    pub fn constant_pool_count(&self) -> u16 {
        self.constant_pool.len() as u16
    }

    pub fn constant_pool(&self) -> &[Constant] {
        &self.constant_pool
    }

    pub fn access_flags(&self) -> AccessFlags {
        self.access_flags
    }

    pub fn this_class(&self) -> ConstantIdx {
        self.this_class
    }

    pub fn super_class(&self) -> Option<ConstantIdx> {
        self.super_class
    }

    pub fn interfaces(&self) -> &[ConstantIdx] {
        &self.interfaces
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn methods(&self) -> &[MethodInfo] {
        &self.methods
    }

    pub fn attributes(&self) -> &[AttributeInfo] {
        &self.attributes
    }

    pub fn get_str(&self, idx: ConstantIdx) -> Option<&str> {
        self.get_raw_str(idx)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn get_raw_str(&self, idx: ConstantIdx) -> Option<&[u8]> {
        if let Some(Constant::Utf8(bytes)) = self.get_const(idx) {
            Some(bytes)
        } else {
            None
        }
    }

    /// Look up a constant. Placeholder slots are not constants, so they read as `None`.
    pub fn get_const(&self, idx: ConstantIdx) -> Option<&Constant> {
        match self.constant_pool.get(idx.inner() as usize) {
            Some(Constant::Unusable) | None => None,
            Some(constant) => Some(constant),
        }
    }

    /// The name behind a `CONSTANT_Class` entry.
    pub fn get_class_name(&self, idx: ConstantIdx) -> Option<&str> {
        if let Some(Constant::Class(name)) = self.get_const(idx) {
            self.get_str(*name)
        } else {
            None
        }
    }

    pub fn this_class_name(&self) -> Option<&str> {
        self.get_class_name(self.this_class)
    }

    pub fn super_class_name(&self) -> Option<&str> {
        self.super_class.and_then(|idx| self.get_class_name(idx))
    }

    pub fn source_file(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find_map(|attr| match attr.materialize(self) {
                Ok(Attribute::SourceFile(idx)) => self.get_str(idx),
                _ => None,
            })
    }

    // Builder methods for classes that never existed as bytes. They mutate the constant pool
    // directly, appending entries the way a compiler would lay them out.

    pub fn synthetic(name: &str) -> ClassFile {
        let mut res = ClassFile {
            major_version: 52,
            minor_version: 0,
            constant_pool: vec![Constant::Unusable],
            access_flags: AccessFlags { flags: 0x0021 },
            this_class: ConstantIdx { idx: 1 },
            super_class: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        };
        res.this_class = res.add_class(name);
        res
    }

    pub fn extends(mut self, super_class: &str) -> Self {
        self.super_class = Some(self.add_class(super_class));
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        let idx = self.add_class(interface);
        self.interfaces.push(idx);
        self
    }

    pub fn with_field(mut self, name: &str, ty: &str, flags: u16) -> Self {
        let name_index = self.add_utf8(name);
        let descriptor_index = self.add_utf8(ty);
        self.fields.push(FieldInfo {
            access_flags: FieldAccessFlags { flags },
            name_index,
            descriptor_index,
            attributes: Vec::new(),
        });
        self
    }

    /// A static field whose initial value comes from a `ConstantValue` attribute.
    pub fn with_constant_field(
        mut self,
        name: &str,
        ty: &str,
        flags: u16,
        value: Constant,
    ) -> Self {
        let value_idx = self.add_constant(value);
        let attr_name = self.add_utf8("ConstantValue");
        self = self.with_field(name, ty, flags);
        if let Some(field) = self.fields.last_mut() {
            field.attributes.push(AttributeInfo {
                name_index: attr_name,
                data: index_bytes(value_idx),
            });
        }
        self
    }

    /// Add a method. Methods without `code` are only valid when `flags` marks them native or
    /// abstract.
    pub fn with_method(
        mut self,
        name: &str,
        desc: &str,
        flags: u16,
        code: Option<CodeAttribute>,
    ) -> Self {
        let name_index = self.add_utf8(name);
        let descriptor_index = self.add_utf8(desc);
        let mut attributes = Vec::new();
        if let Some(code) = code {
            attributes.push(AttributeInfo {
                name_index: self.add_utf8("Code"),
                data: code.encode(),
            });
        }
        self.methods.push(MethodInfo {
            access_flags: MethodAccessFlags { flags },
            name_index,
            descriptor_index,
            attributes,
        });
        self
    }

    pub fn with_source_file(mut self, file: &str) -> Self {
        let name_index = self.add_utf8("SourceFile");
        let file_idx = self.add_utf8(file);
        self.attributes.push(AttributeInfo {
            name_index,
            data: index_bytes(file_idx),
        });
        self
    }

    /// Append `constant`, returning its index. Wide constants get their trailing placeholder.
    pub fn add_constant(&mut self, constant: Constant) -> ConstantIdx {
        let idx = ConstantIdx {
            idx: self.constant_pool.len() as u16,
        };
        let wide = constant.is_wide();
        self.constant_pool.push(constant);
        if wide {
            self.constant_pool.push(Constant::Unusable);
        }
        idx
    }

    /// Reuses an existing identical `Utf8` entry if there is one.
    pub fn add_utf8(&mut self, text: &str) -> ConstantIdx {
        let existing = self.constant_pool.iter().position(|constant| match constant {
            Constant::Utf8(bytes) => bytes.as_slice() == text.as_bytes(),
            _ => false,
        });
        match existing {
            Some(idx) => ConstantIdx { idx: idx as u16 },
            None => self.add_constant(Constant::Utf8(text.as_bytes().to_vec())),
        }
    }

    pub fn add_class(&mut self, name: &str) -> ConstantIdx {
        let name = self.add_utf8(name);
        self.add_constant(Constant::Class(name))
    }

    pub fn add_string(&mut self, text: &str) -> ConstantIdx {
        let text = self.add_utf8(text);
        self.add_constant(Constant::String(text))
    }

    pub fn add_name_and_type(&mut self, name: &str, desc: &str) -> ConstantIdx {
        let name = self.add_utf8(name);
        let desc = self.add_utf8(desc);
        self.add_constant(Constant::NameAndType(name, desc))
    }

    pub fn add_method_ref(&mut self, class: &str, name: &str, desc: &str) -> ConstantIdx {
        let class = self.add_class(class);
        let name_and_type = self.add_name_and_type(name, desc);
        self.add_constant(Constant::Methodref(class, name_and_type))
    }

    pub fn add_field_ref(&mut self, class: &str, name: &str, desc: &str) -> ConstantIdx {
        let class = self.add_class(class);
        let name_and_type = self.add_name_and_type(name, desc);
        self.add_constant(Constant::Fieldref(class, name_and_type))
    }

    /// Find the first attribute named `name` in `attributes` and materialize it.
    pub fn find_attribute(
        &self,
        attributes: &[AttributeInfo],
        name: &str,
    ) -> Option<Result<Attribute, Error>> {
        attributes
            .iter()
            .find(|attr| self.get_str(attr.name_index) == Some(name))
            .map(|attr| attr.materialize(self))
    }
}

fn index_bytes(idx: ConstantIdx) -> Vec<u8> {
    let mut data = Vec::with_capacity(2);
    put_u16(&mut data, idx.inner());
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_pool_is_one_indexed() {
        let mut class = ClassFile::synthetic("demo/Thing").extends("java/lang/Object");
        assert_eq!(class.this_class_name(), Some("demo/Thing"));
        assert_eq!(class.super_class_name(), Some("java/lang/Object"));
        assert_eq!(class.constant_pool()[0], Constant::Unusable);

        let long = class.add_constant(Constant::Long(7));
        let after = class.add_utf8("after");
        assert_eq!(after.inner(), long.inner() + 2);
        assert!(class.get_const(ConstantIdx::new(long.inner() + 1).unwrap()).is_none());
        assert_eq!(class.constant_pool_count(), after.inner() + 1);
    }

    #[test]
    fn utf8_entries_are_shared() {
        let mut class = ClassFile::synthetic("A");
        let first = class.add_utf8("x");
        let second = class.add_utf8("x");
        assert_eq!(first, second);
    }

    #[test]
    fn source_file_attribute() {
        let class = ClassFile::synthetic("A").with_source_file("A.java");
        assert_eq!(class.source_file(), Some("A.java"));
    }
}
