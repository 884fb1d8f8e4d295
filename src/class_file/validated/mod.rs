use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::class_file::descriptor::DescriptorError;
use crate::class_file::unvalidated;
use crate::class_file::unvalidated::AccessFlags;
use crate::class_file::unvalidated::Attribute;
use crate::class_file::unvalidated::ConstantIdx;
use crate::class_file::unvalidated::ClassFile as UnvalidatedClassFile;
use crate::virtual_machine::value::Value;

mod constant;
pub use constant::Constant;
pub use constant::FieldRef;
pub use constant::MemberRef;
pub use constant::MethodRef;
pub use constant::Resolved;

mod method;
pub use method::MethodBody;
pub use method::MethodHandle;

mod field;
pub use field::FieldHandle;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("utf8 constant is not valid utf-8")]
    BadString,
    #[error("constant pool index {0} does not name a constant")]
    BadIndex(u16),
    #[error("constant #{index} is {found}, expected {expected}")]
    BadConst {
        index: u16,
        found: &'static str,
        expected: &'static str,
    },
    #[error("method {method} has no usable Code attribute: {reason}")]
    MissingCodeAttribute { method: String, reason: String },
    #[error("invalid method {method}: {reason}")]
    InvalidMethod { method: String, reason: String },
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
    #[error(transparent)]
    BadDescriptor(#[from] DescriptorError),
    #[error("bad attribute: {0}")]
    BadAttribute(#[from] unvalidated::Error),
}

impl UnvalidatedClassFile {
    pub(crate) fn checked_const(
        &self,
        idx: ConstantIdx,
    ) -> Result<&unvalidated::Constant, ValidationError> {
        self.get_const(idx)
            .ok_or_else(|| ValidationError::BadIndex(idx.inner()))
    }

    pub(crate) fn checked_utf8(&self, idx: ConstantIdx) -> Result<&str, ValidationError> {
        match self.checked_const(idx)? {
            unvalidated::Constant::Utf8(bytes) => {
                std::str::from_utf8(bytes).map_err(|_| ValidationError::BadString)
            }
            other => Err(ValidationError::BadConst {
                index: idx.inner(),
                found: other.type_name(),
                expected: "Utf8",
            }),
        }
    }

    pub(crate) fn checked_class_name(&self, idx: ConstantIdx) -> Result<&str, ValidationError> {
        match self.checked_const(idx)? {
            unvalidated::Constant::Class(name_idx) => self.checked_utf8(*name_idx),
            other => Err(ValidationError::BadConst {
                index: idx.inner(),
                found: other.type_name(),
                expected: "Class",
            }),
        }
    }
}

/// Superclass and interfaces, filled in by the loader the first time the class is linked.
#[derive(Default)]
struct Links {
    linked: bool,
    super_class: Option<Rc<ClassFile>>,
    interfaces: Vec<Rc<ClassFile>>,
}

/// A class as the interpreter sees it: names resolved, descriptors parsed, method bodies
/// checked, plus the mutable runtime state (static fields, links, initialization) that lives
/// alongside it for as long as its loader does.
pub struct ClassFile {
    pub(crate) this_class: String,
    pub(crate) super_class: Option<String>,
    interfaces: Vec<String>,
    access_flags: AccessFlags,
    constants: Vec<Constant>,
    pub(crate) fields: Vec<Rc<FieldHandle>>,
    methods: Vec<Rc<MethodHandle>>,
    source_file: Option<String>,
    /// Keyed by name and descriptor: a class may declare two fields with one name.
    statics: RefCell<HashMap<(String, String), Value>>,
    links: RefCell<Links>,
    initialized: Cell<bool>,
}

// Links and resolved constants can point back at this class, so only the names are printed.
impl fmt::Debug for ClassFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ClassFile")
            .field("this_class", &self.this_class)
            .field("super_class", &self.super_class)
            .field("interfaces", &self.interfaces)
            .field("constants", &self.constants.len())
            .field("fields", &self.fields)
            .field("methods", &self.methods)
            .field("initialized", &self.initialized.get())
            .finish()
    }
}

impl ClassFile {
    pub fn validate(raw_class: &UnvalidatedClassFile) -> Result<ClassFile, ValidationError> {
        let this_class = raw_class.checked_class_name(raw_class.this_class)?.to_string();
        let super_class = match raw_class.super_class {
            Some(idx) => Some(raw_class.checked_class_name(idx)?.to_string()),
            None => None,
        };
        let mut interfaces = Vec::new();
        for idx in raw_class.interfaces.iter() {
            interfaces.push(raw_class.checked_class_name(*idx)?.to_string());
        }

        let mut constants = Vec::with_capacity(raw_class.constant_pool.len());
        for raw_const in raw_class.constant_pool.iter() {
            constants.push(Constant::validate(raw_class, raw_const)?);
        }

        let mut fields = Vec::new();
        for raw_field in raw_class.fields.iter() {
            fields.push(Rc::new(FieldHandle::validate(raw_class, raw_field)?));
        }
        let mut methods = Vec::new();
        for raw_method in raw_class.methods.iter() {
            methods.push(Rc::new(MethodHandle::validate(
                raw_class,
                &this_class,
                raw_method,
            )?));
        }

        let mut source_file = None;
        for attr in raw_class.attributes.iter() {
            if attr.name(raw_class) == Some("SourceFile") {
                if let Attribute::SourceFile(idx) = attr.materialize(raw_class)? {
                    source_file = Some(raw_class.checked_utf8(idx)?.to_string());
                }
            }
        }

        let class = ClassFile {
            this_class,
            super_class,
            interfaces,
            access_flags: raw_class.access_flags,
            constants,
            fields,
            methods,
            source_file,
            statics: RefCell::new(HashMap::new()),
            links: RefCell::new(Links::default()),
            initialized: Cell::new(false),
        };
        class.init_statics()?;
        Ok(class)
    }

    fn init_statics(&self) -> Result<(), ValidationError> {
        let mut statics = self.statics.borrow_mut();
        for field in self.fields.iter().filter(|f| f.access_flags.is_static()) {
            let value = match field.constant_value {
                Some(idx) => {
                    let value = match self.constant(idx) {
                        Some(Constant::Integer(v)) => Value::Int(*v),
                        Some(Constant::Long(v)) => Value::Long(*v),
                        Some(Constant::Float(v)) => Value::Float(*v),
                        Some(Constant::Double(v)) => Value::Double(*v),
                        Some(Constant::String(s)) => Value::string(s),
                        Some(other) => {
                            return Err(ValidationError::BadConst {
                                index: idx.inner(),
                                found: other.type_name(),
                                expected: "Integer, Long, Float, Double, or String",
                            });
                        }
                        None => return Err(ValidationError::BadIndex(idx.inner())),
                    };
                    if !value.fits(&field.ty) {
                        return Err(ValidationError::InvalidField {
                            field: field.name.clone(),
                            reason: format!(
                                "ConstantValue of type {} for a field of type {}",
                                value.type_name(),
                                field.ty
                            ),
                        });
                    }
                    value
                }
                None => Value::default_of(&field.ty),
            };
            statics.insert((field.name.clone(), field.desc.clone()), value);
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.this_class
    }

    pub fn super_class_name(&self) -> Option<&str> {
        self.super_class.as_deref()
    }

    pub fn interface_names(&self) -> &[String] {
        &self.interfaces
    }

    pub fn access_flags(&self) -> AccessFlags {
        self.access_flags
    }

    pub fn source_file(&self) -> Option<&str> {
        self.source_file.as_deref()
    }

    /// Look up a constant by its class-file index. Index 0 and the placeholder after a long or
    /// double are not constants.
    pub fn constant(&self, idx: ConstantIdx) -> Option<&Constant> {
        match self.constants.get(idx.inner() as usize) {
            Some(Constant::Unusable) | None => None,
            Some(constant) => Some(constant),
        }
    }

    pub fn constant_pool_count(&self) -> usize {
        self.constants.len()
    }

    pub fn methods(&self) -> &[Rc<MethodHandle>] {
        &self.methods
    }

    pub fn fields(&self) -> &[Rc<FieldHandle>] {
        &self.fields
    }

    pub fn get_method(&self, name: &str, desc: &str) -> Option<Rc<MethodHandle>> {
        for method in self.methods.iter() {
            if method.name == name && method.desc == desc {
                return Some(Rc::clone(method));
            }
        }

        None
    }

    pub fn get_methods(&self, name: &str) -> Vec<Rc<MethodHandle>> {
        let mut methods = Vec::new();
        for method in self.methods.iter() {
            if method.name == name {
                methods.push(Rc::clone(method));
            }
        }
        methods
    }

    pub fn get_field(&self, name: &str, desc: &str) -> Option<Rc<FieldHandle>> {
        self.fields
            .iter()
            .find(|field| field.name == name && field.desc == desc)
            .map(Rc::clone)
    }

    /// `public static void main(String[])`, if the class declares one.
    pub fn main_method(&self) -> Option<Rc<MethodHandle>> {
        self.get_method("main", "([Ljava/lang/String;)V")
            .filter(|method| method.access_flags.is_static())
    }

    pub fn class_initializer(&self) -> Option<Rc<MethodHandle>> {
        self.get_method("<clinit>", "()V")
            .filter(|method| method.access_flags.is_static())
    }

    pub fn has_static_field(&self, name: &str) -> bool {
        self.fields
            .iter()
            .any(|field| field.access_flags.is_static() && field.name == name)
    }

    pub fn has_instance_field(&self, name: &str) -> bool {
        self.fields
            .iter()
            .any(|field| !field.access_flags.is_static() && field.name == name)
    }

    pub fn get_static(&self, name: &str, desc: &str) -> Option<Value> {
        let key = (name.to_string(), desc.to_string());
        self.statics.borrow().get(&key).cloned()
    }

    /// Store into a static field this class declares. Returns `false`, storing nothing, if
    /// there is no such field.
    pub fn set_static(&self, name: &str, desc: &str, value: Value) -> bool {
        let key = (name.to_string(), desc.to_string());
        match self.statics.borrow_mut().get_mut(&key) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.links.borrow().linked
    }

    pub fn super_link(&self) -> Option<Rc<ClassFile>> {
        self.links.borrow().super_class.as_ref().map(Rc::clone)
    }

    pub fn interface_links(&self) -> Vec<Rc<ClassFile>> {
        self.links.borrow().interfaces.iter().map(Rc::clone).collect()
    }

    pub(crate) fn set_links(
        &self,
        super_class: Option<Rc<ClassFile>>,
        interfaces: Vec<Rc<ClassFile>>,
    ) {
        let mut links = self.links.borrow_mut();
        links.super_class = super_class;
        links.interfaces = interfaces;
        links.linked = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.get()
    }

    pub(crate) fn mark_initialized(&self) {
        self.initialized.set(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class_file::unvalidated::CodeAttribute;

    #[test]
    fn resolves_names_and_literals() {
        let mut raw = UnvalidatedClassFile::synthetic("demo/Consts").extends("java/lang/Object");
        let int_idx = raw.add_constant(unvalidated::Constant::Integer(-5i32 as u32));
        let long_idx = raw.add_constant(unvalidated::Constant::Long(-1i64 as u64));
        let float_idx = raw.add_constant(unvalidated::Constant::Float(1.5f32.to_bits()));
        let string_idx = raw.add_string("hello");
        let method_idx = raw.add_method_ref("demo/Other", "f", "(I)I");

        let class = ClassFile::validate(&raw).unwrap();
        assert_eq!(class.name(), "demo/Consts");
        assert_eq!(class.super_class_name(), Some("java/lang/Object"));
        assert!(matches!(class.constant(int_idx), Some(Constant::Integer(-5))));
        assert!(matches!(class.constant(long_idx), Some(Constant::Long(-1))));
        assert!(matches!(class.constant(float_idx), Some(Constant::Float(v)) if *v == 1.5));
        assert!(matches!(class.constant(string_idx), Some(Constant::String(s)) if &**s == "hello"));

        let after_long = ConstantIdx::new(long_idx.inner() + 1).unwrap();
        assert!(class.constant(after_long).is_none());

        match class.constant(method_idx) {
            Some(Constant::MethodRef(method_ref)) => {
                assert_eq!(method_ref.class_name, "demo/Other");
                assert_eq!(method_ref.name, "f");
                assert_eq!(method_ref.desc, "(I)I");
                assert!(!method_ref.is_resolved());
            }
            other => panic!("unexpected constant: {:?}", other),
        }
    }

    #[test]
    fn statics_start_at_defaults_or_constant_values() {
        let raw = UnvalidatedClassFile::synthetic("demo/Statics")
            .with_field("count", "I", 0x0008)
            .with_field("total", "J", 0x0008)
            .with_field("name", "Ljava/lang/String;", 0x0008)
            .with_field("instance", "I", 0x0000)
            .with_constant_field("LIMIT", "I", 0x0018, unvalidated::Constant::Integer(10));
        let class = ClassFile::validate(&raw).unwrap();
        assert_eq!(class.get_static("count", "I"), Some(Value::Int(0)));
        assert_eq!(class.get_static("total", "J"), Some(Value::Long(0)));
        assert_eq!(
            class.get_static("name", "Ljava/lang/String;"),
            Some(Value::null())
        );
        assert_eq!(class.get_static("LIMIT", "I"), Some(Value::Int(10)));
        assert_eq!(class.get_static("instance", "I"), None);
        assert!(class.has_instance_field("instance"));

        assert!(class.set_static("count", "I", Value::Int(3)));
        assert_eq!(class.get_static("count", "I"), Some(Value::Int(3)));
        assert!(!class.set_static("count", "J", Value::Long(3)));
        assert!(!class.set_static("missing", "I", Value::Int(3)));
    }

    #[test]
    fn statics_with_one_name_and_two_types_are_separate() {
        let raw = UnvalidatedClassFile::synthetic("demo/Overloaded")
            .with_field("value", "I", 0x0008)
            .with_field("value", "J", 0x0008);
        let class = ClassFile::validate(&raw).unwrap();
        assert_eq!(class.get_static("value", "I"), Some(Value::Int(0)));
        assert_eq!(class.get_static("value", "J"), Some(Value::Long(0)));

        assert!(class.set_static("value", "J", Value::Long(7)));
        assert_eq!(class.get_static("value", "I"), Some(Value::Int(0)));
        assert_eq!(class.get_static("value", "J"), Some(Value::Long(7)));
    }

    #[test]
    fn mistyped_constant_value_is_rejected() {
        let raw = UnvalidatedClassFile::synthetic("demo/Bad").with_constant_field(
            "X",
            "J",
            0x0018,
            unvalidated::Constant::Integer(1),
        );
        assert!(matches!(
            ClassFile::validate(&raw),
            Err(ValidationError::InvalidField { .. })
        ));
    }

    #[test]
    fn main_and_clinit_lookup() {
        let raw = UnvalidatedClassFile::synthetic("demo/Main")
            .with_method(
                "main",
                "([Ljava/lang/String;)V",
                0x0009,
                Some(CodeAttribute::new(0, 1, vec![0xb1])),
            )
            .with_method("<clinit>", "()V", 0x0008, Some(CodeAttribute::new(0, 0, vec![0xb1])));
        let class = ClassFile::validate(&raw).unwrap();
        assert!(class.main_method().is_some());
        assert!(class.class_initializer().is_some());
        assert_eq!(class.get_methods("main").len(), 1);
        assert!(!class.is_initialized());
    }

    #[test]
    fn this_class_must_be_a_class() {
        let mut raw = UnvalidatedClassFile::synthetic("demo/Broken");
        raw.this_class = raw.add_utf8("demo/Broken");
        assert!(matches!(
            ClassFile::validate(&raw),
            Err(ValidationError::BadConst {
                expected: "Class",
                ..
            })
        ));
    }
}
