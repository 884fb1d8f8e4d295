use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::class_file::unvalidated;
use crate::class_file::unvalidated::ClassFile as UnvalidatedClassFile;
use crate::class_file::unvalidated::ConstantIdx;
use crate::class_file::unvalidated::MethodHandleBehavior;
use crate::class_file::validated::ClassFile;
use crate::class_file::validated::FieldHandle;
use crate::class_file::validated::MethodHandle;
use crate::class_file::validated::ValidationError;

/// A resolved constant pool entry. Names and literals are materialized; member references stay
/// symbolic until the interpreter first uses them.
#[derive(Debug)]
pub enum Constant {
    Unusable,
    Utf8(Rc<str>),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(Rc<str>),
    String(Rc<str>),
    FieldRef(Rc<FieldRef>),
    MethodRef(Rc<MethodRef>),
    InterfaceMethodRef(Rc<MethodRef>),
    NameAndType(Rc<str>, Rc<str>),
    MethodHandle(MethodHandleBehavior, ConstantIdx),
    MethodType(ConstantIdx),
    Dynamic(u16, ConstantIdx),
    InvokeDynamic(u16, ConstantIdx),
    Module(Rc<str>),
    Package(Rc<str>),
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
            Constant::FieldRef(_) => "Fieldref",
            Constant::MethodRef(_) => "Methodref",
            Constant::InterfaceMethodRef(_) => "InterfaceMethodref",
            Constant::NameAndType(_, _) => "NameAndType",
            Constant::MethodHandle(_, _) => "MethodHandle",
            Constant::MethodType(_) => "MethodType",
            Constant::Dynamic(_, _) => "Dynamic",
            Constant::InvokeDynamic(_, _) => "InvokeDynamic",
            Constant::Module(_) => "Module",
            Constant::Package(_) => "Package",
        }
    }

    pub fn validate(
        raw_class: &UnvalidatedClassFile,
        raw_const: &unvalidated::Constant,
    ) -> Result<Constant, ValidationError> {
        let v = match raw_const {
            unvalidated::Constant::Unusable => Constant::Unusable,
            unvalidated::Constant::Utf8(bytes) => Constant::Utf8(Rc::from(
                std::str::from_utf8(bytes).map_err(|_| ValidationError::BadString)?,
            )),
            unvalidated::Constant::Integer(v) => Constant::Integer(*v as i32),
            unvalidated::Constant::Float(v) => Constant::Float(f32::from_bits(*v)),
            unvalidated::Constant::Long(v) => Constant::Long(*v as i64),
            unvalidated::Constant::Double(v) => Constant::Double(f64::from_bits(*v)),
            unvalidated::Constant::Class(idx) => {
                Constant::Class(Rc::from(raw_class.checked_utf8(*idx)?))
            }
            unvalidated::Constant::String(idx) => {
                Constant::String(Rc::from(raw_class.checked_utf8(*idx)?))
            }
            unvalidated::Constant::Fieldref(class_idx, nat_idx) => {
                Constant::FieldRef(Rc::new(MemberRef::validate(raw_class, *class_idx, *nat_idx)?))
            }
            unvalidated::Constant::Methodref(class_idx, nat_idx) => {
                Constant::MethodRef(Rc::new(MemberRef::validate(raw_class, *class_idx, *nat_idx)?))
            }
            unvalidated::Constant::InterfaceMethodref(class_idx, nat_idx) => {
                Constant::InterfaceMethodRef(Rc::new(MemberRef::validate(
                    raw_class, *class_idx, *nat_idx,
                )?))
            }
            unvalidated::Constant::NameAndType(name_idx, desc_idx) => Constant::NameAndType(
                Rc::from(raw_class.checked_utf8(*name_idx)?),
                Rc::from(raw_class.checked_utf8(*desc_idx)?),
            ),
            unvalidated::Constant::MethodHandle(kind, idx) => Constant::MethodHandle(*kind, *idx),
            unvalidated::Constant::MethodType(idx) => Constant::MethodType(*idx),
            unvalidated::Constant::Dynamic(bootstrap, idx) => Constant::Dynamic(*bootstrap, *idx),
            unvalidated::Constant::InvokeDynamic(bootstrap, idx) => {
                Constant::InvokeDynamic(*bootstrap, *idx)
            }
            unvalidated::Constant::Module(idx) => {
                Constant::Module(Rc::from(raw_class.checked_utf8(*idx)?))
            }
            unvalidated::Constant::Package(idx) => {
                Constant::Package(Rc::from(raw_class.checked_utf8(*idx)?))
            }
        };

        Ok(v)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Constant::Unusable => f.write_str("<unusable>"),
            Constant::Utf8(v) => write!(f, "{:?}", v),
            Constant::Integer(v) => write!(f, "{}", v),
            Constant::Float(v) => write!(f, "{}f", v),
            Constant::Long(v) => write!(f, "{}l", v),
            Constant::Double(v) => write!(f, "{}d", v),
            Constant::Class(v) => write!(f, "class<{}>", v),
            Constant::String(v) => write!(f, "{:?}", v),
            Constant::FieldRef(r) => write!(f, "field {}", r),
            Constant::MethodRef(r) => write!(f, "method {}", r),
            Constant::InterfaceMethodRef(r) => write!(f, "interfacemethod {}", r),
            Constant::NameAndType(name, desc) => write!(f, "{}:{}", name, desc),
            Constant::MethodHandle(kind, idx) => write!(f, "methodhandle {} {}", kind.kind(), idx),
            Constant::MethodType(idx) => write!(f, "methodtype {}", idx),
            Constant::Dynamic(bootstrap, idx) => write!(f, "dynamic {} {}", bootstrap, idx),
            Constant::InvokeDynamic(bootstrap, idx) => {
                write!(f, "invokedynamic {} {}", bootstrap, idx)
            }
            Constant::Module(v) => write!(f, "module {}", v),
            Constant::Package(v) => write!(f, "package {}", v),
        }
    }
}

/// What a member reference resolves to: the member's handle and the class that declares it,
/// which is not necessarily the class the reference names.
pub struct Resolved<H> {
    pub class: Rc<ClassFile>,
    pub handle: Rc<H>,
}

impl<H> Clone for Resolved<H> {
    fn clone(&self) -> Self {
        Resolved {
            class: Rc::clone(&self.class),
            handle: Rc::clone(&self.handle),
        }
    }
}

enum RefState<H> {
    Unresolved,
    Resolved(Resolved<H>),
}

/// A field or method reference from the constant pool. It starts out as names only and is
/// resolved at most once, on first use.
pub struct MemberRef<H> {
    pub class_name: String,
    pub name: String,
    pub desc: String,
    state: RefCell<RefState<H>>,
}

pub type FieldRef = MemberRef<FieldHandle>;
pub type MethodRef = MemberRef<MethodHandle>;

impl<H> MemberRef<H> {
    pub fn new(class_name: &str, name: &str, desc: &str) -> Self {
        MemberRef {
            class_name: class_name.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
            state: RefCell::new(RefState::Unresolved),
        }
    }

    fn validate(
        raw_class: &UnvalidatedClassFile,
        class_idx: ConstantIdx,
        name_and_type_idx: ConstantIdx,
    ) -> Result<Self, ValidationError> {
        let class_name = match raw_class.checked_const(class_idx)? {
            unvalidated::Constant::Class(name_idx) => raw_class.checked_utf8(*name_idx)?,
            other => {
                return Err(ValidationError::BadConst {
                    index: class_idx.inner(),
                    found: other.type_name(),
                    expected: "Class",
                });
            }
        };
        let (name, desc) = match raw_class.checked_const(name_and_type_idx)? {
            unvalidated::Constant::NameAndType(name_idx, desc_idx) => (
                raw_class.checked_utf8(*name_idx)?,
                raw_class.checked_utf8(*desc_idx)?,
            ),
            other => {
                return Err(ValidationError::BadConst {
                    index: name_and_type_idx.inner(),
                    found: other.type_name(),
                    expected: "NameAndType",
                });
            }
        };
        Ok(MemberRef::new(class_name, name, desc))
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.state.borrow(), RefState::Resolved(_))
    }

    pub fn resolved(&self) -> Option<Resolved<H>> {
        match &*self.state.borrow() {
            RefState::Resolved(resolved) => Some(resolved.clone()),
            RefState::Unresolved => None,
        }
    }

    /// Resolve through `resolve` unless already resolved. A failed resolution leaves the
    /// reference unresolved.
    pub fn resolve_with<E, F>(&self, resolve: F) -> Result<Resolved<H>, E>
    where
        F: FnOnce(&Self) -> Result<Resolved<H>, E>,
    {
        if let Some(resolved) = self.resolved() {
            return Ok(resolved);
        }
        let resolved = resolve(self)?;
        *self.state.borrow_mut() = RefState::Resolved(resolved.clone());
        Ok(resolved)
    }
}

impl<H> fmt::Display for MemberRef<H> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}{}", self.class_name, self.name, self.desc)
    }
}

// Resolved state is deliberately left out: it points at other classes, and through their
// constant pools possibly back here.
impl<H> fmt::Debug for MemberRef<H> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MemberRef")
            .field("class_name", &self.class_name)
            .field("name", &self.name)
            .field("desc", &self.desc)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
