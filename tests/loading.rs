mod common;

use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use common::{init_logger, vm_with, ClassBuilder, Code, PUBLIC_STATIC};

use kettle::virtual_machine::class_loader::{ClassLoader, ClassPath, MemorySource};
use kettle::{LoadError, VMError, Value, VirtualMachine, VmConfig};

fn returns_int(name: &str, value: u8) -> Vec<u8> {
    ClassBuilder::new(name)
        .method(
            PUBLIC_STATIC,
            "get",
            "()I",
            Some(Code::new(1, 0, vec![0x10, value, 0xac])),
        )
        .build()
}

/// A fresh directory under the system temp dir, removed again on drop.
struct ScratchDir(PathBuf);

impl ScratchDir {
    fn new(tag: &str) -> ScratchDir {
        let dir = std::env::temp_dir().join(format!("kettle-{}-{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        ScratchDir(dir)
    }

    fn write_class(&self, name: &str, bytes: &[u8]) {
        let path = self.0.join(format!("{}.class", name));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

#[test]
fn classes_load_from_directories() {
    init_logger();
    let first = ScratchDir::new("first");
    let second = ScratchDir::new("second");
    first.write_class("demo/pkg/Shadowed", &returns_int("demo/pkg/Shadowed", 1));
    second.write_class("demo/pkg/Shadowed", &returns_int("demo/pkg/Shadowed", 2));
    second.write_class("demo/pkg/Only", &returns_int("demo/pkg/Only", 3));

    let config = VmConfig::default().with_classpath(vec![first.0.clone(), second.0.clone()]);
    let vm = VirtualMachine::new(config);
    assert_eq!(
        vm.invoke_static("demo/pkg/Shadowed", "get", "()I", &[]).unwrap(),
        Some(Value::Int(1))
    );
    assert_eq!(
        vm.invoke_static("demo/pkg/Only", "get", "()I", &[]).unwrap(),
        Some(Value::Int(3))
    );
    assert!(matches!(
        vm.load("demo/pkg/Missing"),
        Err(LoadError::ClassNotFound(_))
    ));
}

#[test]
fn loads_are_cached() {
    init_logger();
    let vm = vm_with(
        VmConfig::default(),
        vec![("demo/A", returns_int("demo/A", 5))],
    );
    let once = vm.load("demo/A").unwrap();
    let twice = vm.load("demo/A").unwrap();
    assert!(Rc::ptr_eq(&once, &twice));
    // demo/A and java/lang/Object
    assert!(vm.loader().is_loaded("demo/A"));
    assert!(!vm.loader().is_loaded("java/lang/Object"));
    vm.loader().link(&once).unwrap();
    assert!(vm.loader().is_loaded("java/lang/Object"));
    assert_eq!(vm.loader().loaded_count(), 2);
}

#[test]
fn names_must_match() {
    init_logger();
    let vm = vm_with(
        VmConfig::default(),
        vec![("demo/A", returns_int("demo/B", 5))],
    );
    match vm.load("demo/A") {
        Err(LoadError::NameMismatch { requested, found }) => {
            assert_eq!(requested, "demo/A");
            assert_eq!(found, "demo/B");
        }
        other => panic!("unexpected {:?}", other.map(|_| ())),
    }
}

#[test]
fn malformed_classes_are_reported() {
    init_logger();
    let vm = vm_with(VmConfig::default(), vec![("demo/A", vec![0xca, 0xfe])]);
    assert!(matches!(vm.load("demo/A"), Err(LoadError::Malformed { .. })));

    let invalid = ClassBuilder::new("demo/B")
        .method(PUBLIC_STATIC, "run", "()V", None)
        .build();
    let vm = vm_with(VmConfig::default(), vec![("demo/B", invalid)]);
    assert!(matches!(vm.load("demo/B"), Err(LoadError::Invalid { .. })));
}

#[test]
fn cyclic_superclasses_are_rejected() {
    init_logger();
    let a = ClassBuilder::new("demo/A")
        .extends("demo/B")
        .method(
            PUBLIC_STATIC,
            "run",
            "()V",
            Some(Code::new(0, 0, vec![0xb1])),
        )
        .build();
    let b = ClassBuilder::new("demo/B").extends("demo/A").build();
    let vm = vm_with(VmConfig::default(), vec![("demo/A", a), ("demo/B", b)]);

    // loading alone doesn't look at superclasses
    assert!(vm.load("demo/A").is_ok());
    assert!(matches!(
        vm.invoke_static("demo/A", "run", "()V", &[]),
        Err(VMError::Load(LoadError::ClassCircularity(_)))
    ));
}

#[test]
fn static_methods_are_inherited() {
    init_logger();
    let base = returns_int("demo/Base", 7);
    let derived = ClassBuilder::new("demo/Derived")
        .extends("demo/Base")
        .build();
    let vm = vm_with(
        VmConfig::default(),
        vec![("demo/Base", base), ("demo/Derived", derived)],
    );
    assert_eq!(
        vm.invoke_static("demo/Derived", "get", "()I", &[]).unwrap(),
        Some(Value::Int(7))
    );
}

#[test]
fn define_registers_bytes_directly() {
    init_logger();
    let loader = ClassLoader::new(Box::new(ClassPath::new()));
    let defined = loader.define(&returns_int("demo/Defined", 1)).unwrap();
    assert_eq!(defined.name(), "demo/Defined");
    assert!(Rc::ptr_eq(&defined, &loader.load("demo/Defined").unwrap()));
    assert!(matches!(
        loader.define(&returns_int("demo/Defined", 2)),
        Err(LoadError::DuplicateClass(_))
    ));

    let mut path = ClassPath::new();
    path.push(MemorySource::new().with_class("demo/Later", returns_int("demo/Later", 4)));
    assert_eq!(path.len(), 1);
    let loader = ClassLoader::new(Box::new(path));
    assert_eq!(loader.load("demo/Later").unwrap().name(), "demo/Later");
}
