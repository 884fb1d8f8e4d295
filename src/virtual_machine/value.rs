use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::class_file::descriptor::FieldType;
use crate::virtual_machine::Fault;

/// A value on the operand stack or in a local variable. Long and double are one `Value` each;
/// their two-word width is accounted for by `words()` rather than by splitting them.
#[derive(Clone)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// `None` is `null`.
    Reference(Option<Handle>),
}

impl Value {
    pub fn null() -> Value {
        Value::Reference(None)
    }

    pub fn string(s: &str) -> Value {
        Value::Reference(Some(Handle::String(Rc::from(s))))
    }

    /// The zero value a field or array element of type `ty` starts as.
    pub fn default_of(ty: &FieldType) -> Value {
        match ty {
            FieldType::Long => Value::Long(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::Object(_) | FieldType::Array(_) => Value::Reference(None),
            _ => Value::Int(0),
        }
    }

    /// Operand stack words this value takes: two for long and double, one otherwise.
    pub fn words(&self) -> usize {
        match self {
            Value::Long(_) | Value::Double(_) => 2,
            _ => 1,
        }
    }

    pub fn is_wide(&self) -> bool {
        self.words() == 2
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Reference(None) => "null",
            Value::Reference(Some(handle)) => handle.type_name(),
        }
    }

    /// Whether this value may be stored somewhere declared as `ty`.
    pub fn fits(&self, ty: &FieldType) -> bool {
        match (self, ty) {
            (Value::Int(_), ty) => ty.is_int_like(),
            (Value::Long(_), FieldType::Long) => true,
            (Value::Float(_), FieldType::Float) => true,
            (Value::Double(_), FieldType::Double) => true,
            (Value::Reference(_), ty) => ty.is_reference(),
            _ => false,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        if let Value::Int(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        if let Value::Long(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        if let Value::Float(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        if let Value::Double(v) = self {
            Some(*v)
        } else {
            None
        }
    }

    pub fn as_reference(&self) -> Option<&Option<Handle>> {
        if let Value::Reference(v) = self {
            Some(v)
        } else {
            None
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "Int({})", v),
            Value::Long(v) => write!(f, "Long({})", v),
            Value::Float(v) => write!(f, "Float({})", v),
            Value::Double(v) => write!(f, "Double({})", v),
            Value::Reference(None) => f.write_str("null"),
            Value::Reference(Some(handle)) => write!(f, "{:?}", handle),
        }
    }
}

/// Numbers compare by value (bitwise for floats, so NaN equals itself); references by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Reference(a), Value::Reference(b)) => Handle::same(a.as_ref(), b.as_ref()),
            _ => false,
        }
    }
}

/// A shared, mutable, fixed-length array.
pub struct ArrayRef<T>(Rc<RefCell<Box<[T]>>>);

impl<T> Clone for ArrayRef<T> {
    fn clone(&self) -> Self {
        ArrayRef(Rc::clone(&self.0))
    }
}

impl<T: Clone> ArrayRef<T> {
    pub fn new(elements: Vec<T>) -> Self {
        ArrayRef(Rc::new(RefCell::new(elements.into_boxed_slice())))
    }

    pub fn filled(len: usize, element: T) -> Self {
        ArrayRef::new(vec![element; len])
    }

    /// Like `filled`, but a failed allocation is a fault rather than an abort.
    pub fn try_filled(len: usize, element: T) -> Result<Self, Fault> {
        let mut elements = Vec::new();
        elements
            .try_reserve_exact(len)
            .map_err(|_| Fault::OutOfMemory(len))?;
        elements.resize(len, element);
        Ok(ArrayRef::new(elements))
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self, index: i32) -> Result<usize, Fault> {
        let length = self.len();
        if index < 0 || index as usize >= length {
            return Err(Fault::IndexOutOfBounds { index, length });
        }
        Ok(index as usize)
    }

    pub fn get(&self, index: i32) -> Result<T, Fault> {
        let index = self.check(index)?;
        Ok(self.0.borrow()[index].clone())
    }

    pub fn set(&self, index: i32, value: T) -> Result<(), Fault> {
        let index = self.check(index)?;
        self.0.borrow_mut()[index] = value;
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.0.borrow().to_vec()
    }

    pub fn ptr_eq(&self, other: &ArrayRef<T>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: fmt::Debug> fmt::Debug for ArrayRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.0.borrow().iter()).finish()
    }
}

/// A non-null reference. There is no general object model; the only heap values are arrays,
/// string literals, and class literals.
#[derive(Clone)]
pub enum Handle {
    IntArray(ArrayRef<i32>),
    LongArray(ArrayRef<i64>),
    FloatArray(ArrayRef<f32>),
    DoubleArray(ArrayRef<f64>),
    /// Also backs `boolean[]`.
    ByteArray(ArrayRef<i8>),
    CharArray(ArrayRef<u16>),
    ShortArray(ArrayRef<i16>),
    RefArray(ArrayRef<Option<Handle>>),
    String(Rc<str>),
    Class(Rc<str>),
}

impl Handle {
    pub fn type_name(&self) -> &'static str {
        match self {
            Handle::IntArray(_) => "int[]",
            Handle::LongArray(_) => "long[]",
            Handle::FloatArray(_) => "float[]",
            Handle::DoubleArray(_) => "double[]",
            Handle::ByteArray(_) => "byte[]",
            Handle::CharArray(_) => "char[]",
            Handle::ShortArray(_) => "short[]",
            Handle::RefArray(_) => "reference[]",
            Handle::String(_) => "java/lang/String",
            Handle::Class(_) => "java/lang/Class",
        }
    }

    /// `None` if this is not an array.
    pub fn array_len(&self) -> Option<usize> {
        Some(match self {
            Handle::IntArray(a) => a.len(),
            Handle::LongArray(a) => a.len(),
            Handle::FloatArray(a) => a.len(),
            Handle::DoubleArray(a) => a.len(),
            Handle::ByteArray(a) => a.len(),
            Handle::CharArray(a) => a.len(),
            Handle::ShortArray(a) => a.len(),
            Handle::RefArray(a) => a.len(),
            Handle::String(_) | Handle::Class(_) => return None,
        })
    }

    pub fn ptr_eq(&self, other: &Handle) -> bool {
        match (self, other) {
            (Handle::IntArray(a), Handle::IntArray(b)) => a.ptr_eq(b),
            (Handle::LongArray(a), Handle::LongArray(b)) => a.ptr_eq(b),
            (Handle::FloatArray(a), Handle::FloatArray(b)) => a.ptr_eq(b),
            (Handle::DoubleArray(a), Handle::DoubleArray(b)) => a.ptr_eq(b),
            (Handle::ByteArray(a), Handle::ByteArray(b)) => a.ptr_eq(b),
            (Handle::CharArray(a), Handle::CharArray(b)) => a.ptr_eq(b),
            (Handle::ShortArray(a), Handle::ShortArray(b)) => a.ptr_eq(b),
            (Handle::RefArray(a), Handle::RefArray(b)) => a.ptr_eq(b),
            (Handle::String(a), Handle::String(b)) => Rc::ptr_eq(a, b),
            (Handle::Class(a), Handle::Class(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Reference equality as `if_acmpeq` sees it, `null` included.
    pub fn same(a: Option<&Handle>, b: Option<&Handle>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Handle::IntArray(a) => write!(f, "int{:?}", a),
            Handle::LongArray(a) => write!(f, "long{:?}", a),
            Handle::FloatArray(a) => write!(f, "float{:?}", a),
            Handle::DoubleArray(a) => write!(f, "double{:?}", a),
            Handle::ByteArray(a) => write!(f, "byte{:?}", a),
            Handle::CharArray(a) => write!(f, "char{:?}", a),
            Handle::ShortArray(a) => write!(f, "short{:?}", a),
            Handle::RefArray(a) => write!(f, "ref{:?}", a),
            Handle::String(s) => write!(f, "String({:?})", s),
            Handle::Class(name) => write!(f, "Class({})", name),
        }
    }
}

/// Element types an array handle can hold, so the typed array accessors can share one
/// implementation.
pub trait ArrayElement: Clone + Sized {
    const TYPE_NAME: &'static str;

    fn from_handle(handle: &Handle) -> Option<&ArrayRef<Self>>;
    fn into_handle(array: ArrayRef<Self>) -> Handle;
}

macro_rules! array_element {
    ($ty:ty, $variant:ident, $name:expr) => {
        impl ArrayElement for $ty {
            const TYPE_NAME: &'static str = $name;

            fn from_handle(handle: &Handle) -> Option<&ArrayRef<Self>> {
                if let Handle::$variant(array) = handle {
                    Some(array)
                } else {
                    None
                }
            }

            fn into_handle(array: ArrayRef<Self>) -> Handle {
                Handle::$variant(array)
            }
        }
    };
}

array_element!(i32, IntArray, "int[]");
array_element!(i64, LongArray, "long[]");
array_element!(f32, FloatArray, "float[]");
array_element!(f64, DoubleArray, "double[]");
array_element!(i8, ByteArray, "byte[]");
array_element!(u16, CharArray, "char[]");
array_element!(i16, ShortArray, "short[]");
array_element!(Option<Handle>, RefArray, "reference[]");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_values_take_two_words() {
        assert_eq!(Value::Long(1).words(), 2);
        assert_eq!(Value::Double(1.0).words(), 2);
        assert_eq!(Value::Int(1).words(), 1);
        assert_eq!(Value::null().words(), 1);
    }

    #[test]
    fn array_bounds() {
        let array = ArrayRef::filled(3, 0i32);
        array.set(2, 7).unwrap();
        assert_eq!(array.get(2).unwrap(), 7);
        match array.get(3) {
            Err(Fault::IndexOutOfBounds {
                index: 3,
                length: 3,
            }) => {}
            other => panic!("unexpected: {:?}", other),
        }
        assert!(array.get(-1).is_err());
    }

    #[test]
    fn references_compare_by_identity() {
        let a = Handle::IntArray(ArrayRef::filled(1, 0));
        let b = Handle::IntArray(ArrayRef::filled(1, 0));
        assert!(Handle::same(Some(&a), Some(&a.clone())));
        assert!(!Handle::same(Some(&a), Some(&b)));
        assert!(Handle::same(None, None));
        assert!(!Handle::same(Some(&a), None));
        assert_eq!(Value::Reference(Some(a.clone())), Value::Reference(Some(a)));
    }

    #[test]
    fn fits_follows_descriptor() {
        assert!(Value::Int(1).fits(&FieldType::Boolean));
        assert!(!Value::Int(1).fits(&FieldType::Long));
        assert!(Value::null().fits(&FieldType::Array(Box::new(FieldType::Int))));
        assert_eq!(Value::default_of(&FieldType::Double), Value::Double(0.0));
    }
}
