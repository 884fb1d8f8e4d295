mod common;

use common::{ClassBuilder, Code, PUBLIC_STATIC};

use kettle::class_file::unvalidated::read::class_header;
use kettle::class_file::unvalidated::{Constant as RawConstant, ConstantIdx, Error};
use kettle::class_file::validated::{ClassFile, Constant, ValidationError};

const RETURN: u8 = 0xb1;

fn idx(i: u16) -> ConstantIdx {
    ConstantIdx::new(i).unwrap()
}

#[test]
fn five_methods_no_fields() {
    let mut builder = ClassBuilder::new("demo/Five");
    for filler in ["a", "b", "c", "d", "e", "f"].iter() {
        builder.utf8(filler);
    }
    assert_eq!(builder.class("demo/Five"), 8);
    for name in ["one", "two", "three", "four", "five"].iter() {
        builder = builder.method(
            PUBLIC_STATIC,
            name,
            "()V",
            Some(Code::new(0, 0, vec![RETURN])),
        );
    }
    let bytes = builder.build();

    let raw = class_header(&bytes).unwrap();
    assert_eq!(raw.this_class().inner(), 8);
    assert_eq!(raw.this_class_name(), Some("demo/Five"));
    assert_eq!(raw.fields().len(), 0);
    assert_eq!(raw.methods().len(), 5);
    assert_eq!(raw.super_class_name(), Some("java/lang/Object"));

    let class = ClassFile::validate(&raw).unwrap();
    assert_eq!(class.fields().len(), 0);
    assert_eq!(class.methods().len(), 5);
    assert_eq!(class.get_methods("three").len(), 1);
}

#[test]
fn wide_constants_take_two_slots() {
    let mut builder = ClassBuilder::new("demo/Wide");
    let long = builder.long(0x1_0000_0002);
    let after = builder.integer(7);
    assert_eq!(after, long + 2);
    let double = builder.double(2.5);
    let bytes = builder.build();

    let raw = class_header(&bytes).unwrap();
    assert_eq!(raw.get_const(idx(long)), Some(&RawConstant::Long(0x1_0000_0002)));
    assert_eq!(raw.get_const(idx(long + 1)), None);
    assert_eq!(raw.constant_pool()[(long + 1) as usize], RawConstant::Unusable);
    assert_eq!(raw.get_const(idx(after)), Some(&RawConstant::Integer(7)));

    let class = ClassFile::validate(&raw).unwrap();
    assert!(matches!(class.constant(idx(long)), Some(Constant::Long(0x1_0000_0002))));
    assert!(class.constant(idx(long + 1)).is_none());
    assert!(class.constant(idx(double + 1)).is_none());
    match class.constant(idx(double)) {
        Some(Constant::Double(v)) => assert_eq!(*v, 2.5),
        other => panic!("unexpected constant {:?}", other),
    }
    assert_eq!(class.constant_pool_count(), raw.constant_pool_count() as usize);
}

#[test]
fn bad_magic() {
    let mut bytes = ClassBuilder::new("demo/Magic").build();
    bytes[0] = 0xde;
    bytes[1] = 0xad;
    match class_header(&bytes) {
        Err(Error::BadMagic(magic)) => assert_eq!(magic, 0xdead_babe),
        other => panic!("expected bad magic, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn unknown_constant_tag() {
    let mut builder = ClassBuilder::new("demo/Tag");
    let bad = builder.raw_constant(vec![2, 0, 0]);
    let bytes = builder.build();
    match class_header(&bytes) {
        Err(Error::UnknownConstantTag { tag, index }) => {
            assert_eq!(tag, 2);
            assert_eq!(index, bad);
        }
        other => panic!("expected unknown tag, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn truncated_input() {
    let bytes = ClassBuilder::new("demo/Short")
        .method(PUBLIC_STATIC, "run", "()V", Some(Code::new(0, 0, vec![RETURN])))
        .build();
    for cut in [3, 9, bytes.len() / 2, bytes.len() - 1].iter() {
        assert!(
            matches!(class_header(&bytes[..*cut]), Err(Error::Truncated { .. })),
            "cut at {}",
            cut
        );
    }
    assert!(class_header(&bytes).is_ok());
}

#[test]
fn module_and_package_constants_decode() {
    let mut builder = ClassBuilder::new("demo/Modular");
    let name = builder.utf8("demo");
    let module = builder.raw_constant(vec![19, (name >> 8) as u8, name as u8]);
    let package = builder.raw_constant(vec![20, (name >> 8) as u8, name as u8]);
    let bytes = builder.build();

    let raw = class_header(&bytes).unwrap();
    assert_eq!(raw.get_const(idx(module)), Some(&RawConstant::Module(idx(name))));
    assert_eq!(raw.get_const(idx(package)), Some(&RawConstant::Package(idx(name))));
    let class = ClassFile::validate(&raw).unwrap();
    assert!(matches!(class.constant(idx(module)), Some(Constant::Module(m)) if &**m == "demo"));
}

#[test]
fn methods_need_code() {
    let bytes = ClassBuilder::new("demo/NoCode")
        .method(PUBLIC_STATIC, "run", "()V", None)
        .build();
    let raw = class_header(&bytes).unwrap();
    match ClassFile::validate(&raw) {
        Err(ValidationError::MissingCodeAttribute { method, .. }) => {
            assert!(method.contains("run"), "{}", method)
        }
        other => panic!("expected missing code, got {:?}", other.map(|_| ())),
    }

    let bytes = ClassBuilder::new("demo/Native")
        .method(PUBLIC_STATIC | common::ACC_NATIVE, "run", "()V", None)
        .build();
    let class = ClassFile::validate(&class_header(&bytes).unwrap()).unwrap();
    assert!(class.get_method("run", "()V").unwrap().body().is_none());
}

#[test]
fn branch_into_an_operand_is_rejected() {
    // goto +1 lands inside its own operand bytes
    let bytes = ClassBuilder::new("demo/Branch")
        .method(
            PUBLIC_STATIC,
            "run",
            "()V",
            Some(Code::new(0, 0, vec![0xa7, 0x00, 0x01, RETURN])),
        )
        .build();
    let raw = class_header(&bytes).unwrap();
    assert!(matches!(
        ClassFile::validate(&raw),
        Err(ValidationError::InvalidMethod { .. })
    ));
}

#[test]
fn constant_values_seed_statics() {
    let mut builder = ClassBuilder::new("demo/Consts");
    let answer = builder.integer(42);
    let bytes = builder
        .constant_field(PUBLIC_STATIC | common::ACC_FINAL, "ANSWER", "I", answer)
        .field(PUBLIC_STATIC, "total", "J")
        .build();
    let class = ClassFile::validate(&class_header(&bytes).unwrap()).unwrap();
    assert_eq!(class.get_static("ANSWER", "I"), Some(kettle::Value::Int(42)));
    assert_eq!(class.get_static("total", "J"), Some(kettle::Value::Long(0)));
    assert_eq!(class.get_static("total", "I"), None);
    assert_eq!(class.get_static("missing", "I"), None);
}

#[test]
fn deeply_nested_array_descriptor_is_rejected() {
    let desc = format!("({}I)V", "[".repeat(60000));
    let bytes = ClassBuilder::new("demo/Deep")
        .method(PUBLIC_STATIC, "f", &desc, Some(Code::new(0, 1, vec![RETURN])))
        .build();
    let raw = class_header(&bytes).unwrap();
    assert!(matches!(
        ClassFile::validate(&raw),
        Err(ValidationError::BadDescriptor(_))
    ));
}
