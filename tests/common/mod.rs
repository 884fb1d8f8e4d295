//! A small class-file assembler, so tests can describe classes as constants and bytecode and
//! run them without a compiler.

#![allow(dead_code)]

use std::collections::HashMap;

use byteorder::{BigEndian, WriteBytesExt};

use kettle::virtual_machine::class_loader::MemorySource;
use kettle::{VirtualMachine, VmConfig};

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_ABSTRACT: u16 = 0x0400;

pub const PUBLIC_STATIC: u16 = ACC_PUBLIC | ACC_STATIC;

pub fn init_logger() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Trace)
        .try_init();
}

/// A method's `Code` attribute.
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub bytes: Vec<u8>,
    pub handlers: Vec<(u16, u16, u16, u16)>,
    pub lines: Vec<(u16, u16)>,
}

impl Code {
    pub fn new(max_stack: u16, max_locals: u16, bytes: Vec<u8>) -> Self {
        Code {
            max_stack,
            max_locals,
            bytes,
            handlers: Vec::new(),
            lines: Vec::new(),
        }
    }

    /// Cover `[start, end)` with a catch-all handler at `handler`.
    pub fn handler(mut self, start: u16, end: u16, handler: u16) -> Self {
        self.handlers.push((start, end, handler, 0));
        self
    }

    pub fn line(mut self, start_pc: u16, line: u16) -> Self {
        self.lines.push((start_pc, line));
        self
    }
}

pub struct ClassBuilder {
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    access_flags: u16,
    pool: Vec<u8>,
    next_index: u16,
    utf8s: HashMap<String, u16>,
    classes: HashMap<String, u16>,
    fields: Vec<Vec<u8>>,
    methods: Vec<Vec<u8>>,
    attributes: Vec<Vec<u8>>,
}

impl ClassBuilder {
    /// A public class extending `java/lang/Object`.
    pub fn new(name: &str) -> Self {
        ClassBuilder {
            name: name.to_string(),
            super_name: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            access_flags: ACC_PUBLIC | 0x0020,
            pool: Vec::new(),
            next_index: 1,
            utf8s: HashMap::new(),
            classes: HashMap::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn extends(mut self, super_name: &str) -> Self {
        self.super_name = Some(super_name.to_string());
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    fn entry(&mut self, bytes: Vec<u8>, slots: u16) -> u16 {
        let idx = self.next_index;
        self.pool.extend_from_slice(&bytes);
        self.next_index += slots;
        idx
    }

    pub fn utf8(&mut self, text: &str) -> u16 {
        if let Some(idx) = self.utf8s.get(text) {
            return *idx;
        }
        let mut bytes = vec![1];
        bytes.write_u16::<BigEndian>(text.len() as u16).unwrap();
        bytes.extend_from_slice(text.as_bytes());
        let idx = self.entry(bytes, 1);
        self.utf8s.insert(text.to_string(), idx);
        idx
    }

    /// Reuses an existing `Class` entry for `name` if there is one.
    pub fn class(&mut self, name: &str) -> u16 {
        if let Some(idx) = self.classes.get(name) {
            return *idx;
        }
        let name_idx = self.utf8(name);
        let idx = self.indexed(7, name_idx);
        self.classes.insert(name.to_string(), idx);
        idx
    }

    pub fn string(&mut self, text: &str) -> u16 {
        let text = self.utf8(text);
        self.indexed(8, text)
    }

    fn indexed(&mut self, tag: u8, idx: u16) -> u16 {
        let mut bytes = vec![tag];
        bytes.write_u16::<BigEndian>(idx).unwrap();
        self.entry(bytes, 1)
    }

    fn pair(&mut self, tag: u8, first: u16, second: u16) -> u16 {
        let mut bytes = vec![tag];
        bytes.write_u16::<BigEndian>(first).unwrap();
        bytes.write_u16::<BigEndian>(second).unwrap();
        self.entry(bytes, 1)
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        let mut bytes = vec![3];
        bytes.write_i32::<BigEndian>(value).unwrap();
        self.entry(bytes, 1)
    }

    pub fn float(&mut self, value: f32) -> u16 {
        let mut bytes = vec![4];
        bytes.write_f32::<BigEndian>(value).unwrap();
        self.entry(bytes, 1)
    }

    /// Takes two pool slots.
    pub fn long(&mut self, value: i64) -> u16 {
        let mut bytes = vec![5];
        bytes.write_i64::<BigEndian>(value).unwrap();
        self.entry(bytes, 2)
    }

    /// Takes two pool slots.
    pub fn double(&mut self, value: f64) -> u16 {
        let mut bytes = vec![6];
        bytes.write_f64::<BigEndian>(value).unwrap();
        self.entry(bytes, 2)
    }

    pub fn name_and_type(&mut self, name: &str, desc: &str) -> u16 {
        let name = self.utf8(name);
        let desc = self.utf8(desc);
        self.pair(12, name, desc)
    }

    pub fn field_ref(&mut self, class: &str, name: &str, desc: &str) -> u16 {
        let class = self.class(class);
        let name_and_type = self.name_and_type(name, desc);
        self.pair(9, class, name_and_type)
    }

    pub fn method_ref(&mut self, class: &str, name: &str, desc: &str) -> u16 {
        let class = self.class(class);
        let name_and_type = self.name_and_type(name, desc);
        self.pair(10, class, name_and_type)
    }

    /// Append raw bytes to the pool as one entry, for tags the helpers above don't cover.
    pub fn raw_constant(&mut self, bytes: Vec<u8>) -> u16 {
        self.entry(bytes, 1)
    }

    fn attribute(&mut self, name: &str, data: &[u8]) -> Vec<u8> {
        let name = self.utf8(name);
        let mut bytes = Vec::new();
        bytes.write_u16::<BigEndian>(name).unwrap();
        bytes.write_u32::<BigEndian>(data.len() as u32).unwrap();
        bytes.extend_from_slice(data);
        bytes
    }

    pub fn field(mut self, flags: u16, name: &str, desc: &str) -> Self {
        let bytes = self.member(flags, name, desc, Vec::new());
        self.fields.push(bytes);
        self
    }

    /// A field with a `ConstantValue` attribute pointing at `value`.
    pub fn constant_field(mut self, flags: u16, name: &str, desc: &str, value: u16) -> Self {
        let mut data = Vec::new();
        data.write_u16::<BigEndian>(value).unwrap();
        let attribute = self.attribute("ConstantValue", &data);
        let bytes = self.member(flags, name, desc, vec![attribute]);
        self.fields.push(bytes);
        self
    }

    pub fn method(mut self, flags: u16, name: &str, desc: &str, code: Option<Code>) -> Self {
        let attributes = match code {
            Some(code) => {
                let data = self.code_data(&code);
                vec![self.attribute("Code", &data)]
            }
            None => Vec::new(),
        };
        let bytes = self.member(flags, name, desc, attributes);
        self.methods.push(bytes);
        self
    }

    pub fn source_file(mut self, file: &str) -> Self {
        let file = self.utf8(file);
        let mut data = Vec::new();
        data.write_u16::<BigEndian>(file).unwrap();
        let attribute = self.attribute("SourceFile", &data);
        self.attributes.push(attribute);
        self
    }

    fn member(&mut self, flags: u16, name: &str, desc: &str, attributes: Vec<Vec<u8>>) -> Vec<u8> {
        let name = self.utf8(name);
        let desc = self.utf8(desc);
        let mut bytes = Vec::new();
        bytes.write_u16::<BigEndian>(flags).unwrap();
        bytes.write_u16::<BigEndian>(name).unwrap();
        bytes.write_u16::<BigEndian>(desc).unwrap();
        bytes.write_u16::<BigEndian>(attributes.len() as u16).unwrap();
        for attribute in attributes.iter() {
            bytes.extend_from_slice(attribute);
        }
        bytes
    }

    fn code_data(&mut self, code: &Code) -> Vec<u8> {
        let mut data = Vec::new();
        data.write_u16::<BigEndian>(code.max_stack).unwrap();
        data.write_u16::<BigEndian>(code.max_locals).unwrap();
        data.write_u32::<BigEndian>(code.bytes.len() as u32).unwrap();
        data.extend_from_slice(&code.bytes);
        data.write_u16::<BigEndian>(code.handlers.len() as u16).unwrap();
        for (start, end, handler, catch_type) in code.handlers.iter() {
            data.write_u16::<BigEndian>(*start).unwrap();
            data.write_u16::<BigEndian>(*end).unwrap();
            data.write_u16::<BigEndian>(*handler).unwrap();
            data.write_u16::<BigEndian>(*catch_type).unwrap();
        }
        if code.lines.is_empty() {
            data.write_u16::<BigEndian>(0).unwrap();
        } else {
            let mut table = Vec::new();
            table.write_u16::<BigEndian>(code.lines.len() as u16).unwrap();
            for (start_pc, line) in code.lines.iter() {
                table.write_u16::<BigEndian>(*start_pc).unwrap();
                table.write_u16::<BigEndian>(*line).unwrap();
            }
            let attribute = self.attribute("LineNumberTable", &table);
            data.write_u16::<BigEndian>(1).unwrap();
            data.extend_from_slice(&attribute);
        }
        data
    }

    pub fn build(mut self) -> Vec<u8> {
        let name = self.name.clone();
        let this_class = self.class(&name);
        let super_class = match self.super_name.clone() {
            Some(super_name) => self.class(&super_name),
            None => 0,
        };
        let interfaces: Vec<u16> = self
            .interfaces
            .clone()
            .iter()
            .map(|interface| self.class(interface))
            .collect();

        let mut out = Vec::new();
        out.write_u32::<BigEndian>(0xcafe_babe).unwrap();
        out.write_u16::<BigEndian>(0).unwrap();
        out.write_u16::<BigEndian>(52).unwrap();
        out.write_u16::<BigEndian>(self.next_index).unwrap();
        out.extend_from_slice(&self.pool);
        out.write_u16::<BigEndian>(self.access_flags).unwrap();
        out.write_u16::<BigEndian>(this_class).unwrap();
        out.write_u16::<BigEndian>(super_class).unwrap();
        out.write_u16::<BigEndian>(interfaces.len() as u16).unwrap();
        for interface in interfaces.iter() {
            out.write_u16::<BigEndian>(*interface).unwrap();
        }
        for members in [&self.fields, &self.methods, &self.attributes].iter() {
            out.write_u16::<BigEndian>(members.len() as u16).unwrap();
            for member in members.iter() {
                out.extend_from_slice(member);
            }
        }
        out
    }
}

/// A machine whose class path is exactly `classes`.
pub fn vm_with(config: VmConfig, classes: Vec<(&str, Vec<u8>)>) -> VirtualMachine {
    let mut source = MemorySource::new();
    for (name, bytes) in classes.into_iter() {
        source.insert(name, bytes);
    }
    VirtualMachine::with_source(config, Box::new(source))
}

/// One class, one static method, run with `args`.
pub fn run_static(
    class: Vec<u8>,
    name: &str,
    desc: &str,
    args: &[kettle::Value],
) -> Result<Option<kettle::Value>, kettle::VMError> {
    init_logger();
    let vm = vm_with(VmConfig::default(), vec![("demo/Main", class)]);
    vm.invoke_static("demo/Main", name, desc, args)
}
