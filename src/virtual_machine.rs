use std::fmt;
use std::io;
use std::rc::Rc;

use log::{debug, trace, warn};
use thiserror::Error;

use crate::class_file::descriptor::FieldType;
use crate::class_file::unvalidated;
use crate::class_file::validated::ClassFile;
use crate::class_file::validated::ValidationError;

mod bootstrap;
pub mod class_loader;
pub mod config;
pub mod frame;
pub mod interpreter;
pub mod thread;
pub mod value;

use class_loader::ClassLoader;
use class_loader::ClassPath;
use class_loader::ClassSource;
use config::VmConfig;
use frame::Frame;
use thread::Thread;
use value::{ArrayRef, Handle, Value};

/// Failure to produce a runtime class, or to find a member in one.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("class {0} not found")]
    ClassNotFound(String),
    #[error("error reading class {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("class {name} is malformed: {source}")]
    Malformed {
        name: String,
        #[source]
        source: unvalidated::Error,
    },
    #[error("class {name} is invalid: {source}")]
    Invalid {
        name: String,
        #[source]
        source: ValidationError,
    },
    #[error("class circularity: {0} is its own superclass or superinterface")]
    ClassCircularity(String),
    #[error("looked for class {requested} but found {found}")]
    NameMismatch { requested: String, found: String },
    #[error("class {0} is already defined")]
    DuplicateClass(String),
    #[error("no method {class}.{name}{desc}")]
    MethodNotFound {
        class: String,
        name: String,
        desc: String,
    },
    #[error("no field {class}.{name}:{desc}")]
    FieldNotFound {
        class: String,
        name: String,
        desc: String,
    },
}

/// A runtime fault. Every fault ends the run: nothing here is caught by bytecode.
#[derive(Debug, Error)]
pub enum Fault {
    #[error("stack corruption: {0}")]
    StackCorruption(&'static str),
    #[error("invalid local variable index {0}")]
    InvalidLocalIndex(u16),
    #[error("local variable {0} read before it was written")]
    UninitializedLocal(u16),
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("null reference")]
    NullReference,
    #[error("index {index} out of bounds for length {length}")]
    IndexOutOfBounds { index: i32, length: usize },
    #[error("negative array size {0}")]
    NegativeArraySize(i32),
    #[error("out of memory allocating an array of {0} elements")]
    OutOfMemory(usize),
    #[error("arithmetic fault: {0}")]
    Arithmetic(&'static str),
    #[error("unimplemented opcode {opcode:#04x} ({mnemonic})")]
    UnimplementedOpcode { opcode: u8, mnemonic: &'static str },
    #[error("constant #{index} is not {expected}")]
    BadConstant { index: u16, expected: &'static str },
    #[error("no method {class}.{name}{desc}")]
    MethodNotFound {
        class: String,
        name: String,
        desc: String,
    },
    #[error("no field {class}.{name}:{desc}")]
    FieldNotFound {
        class: String,
        name: String,
        desc: String,
    },
    #[error("incompatible class change: {0}")]
    IncompatibleClassChange(String),
    #[error("method {0} has no code")]
    NoCode(String),
    #[error("call depth exceeded {0} frames")]
    CallDepthExceeded(usize),
    #[error("pc {0} is outside the method")]
    PcOutOfRange(u32),
    #[error("no frame to execute")]
    NoFrame,
    #[error("undecodable instruction: {0}")]
    Decode(#[from] unvalidated::Error),
    #[error("class loading failed: {0}")]
    ClassLoad(#[source] LoadError),
}

impl Fault {
    pub fn type_mismatch(expected: &'static str, found: &Value) -> Fault {
        Fault::TypeMismatch {
            expected,
            found: found.type_name(),
        }
    }
}

impl From<LoadError> for Fault {
    fn from(err: LoadError) -> Fault {
        match err {
            LoadError::MethodNotFound { class, name, desc } => {
                Fault::MethodNotFound { class, name, desc }
            }
            LoadError::FieldNotFound { class, name, desc } => {
                Fault::FieldNotFound { class, name, desc }
            }
            other => Fault::ClassLoad(other),
        }
    }
}

/// Where a fault happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultLocation {
    pub class: String,
    pub method: String,
    pub desc: String,
    pub pc: u32,
    pub mnemonic: Option<&'static str>,
    pub source_file: Option<String>,
    pub line: Option<u16>,
}

impl FaultLocation {
    pub fn of(frame: &Frame) -> FaultLocation {
        let class = frame.class();
        let method = frame.method();
        FaultLocation {
            class: class.name().to_string(),
            method: method.name().to_string(),
            desc: method.desc().to_string(),
            pc: frame.pc,
            mnemonic: frame
                .current_instruction()
                .ok()
                .map(|(inst, _)| inst.mnemonic()),
            source_file: class.source_file().map(|s| s.to_string()),
            line: frame.body().line_for(frame.pc),
        }
    }
}

impl fmt::Display for FaultLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}{} pc {}", self.class, self.method, self.desc, self.pc)?;
        if let Some(mnemonic) = self.mnemonic {
            write!(f, " ({})", mnemonic)?;
        }
        match (&self.source_file, self.line) {
            (Some(file), Some(line)) => write!(f, " ({}:{})", file, line),
            (Some(file), None) => write!(f, " ({})", file),
            (None, Some(line)) => write!(f, " (line {})", line),
            (None, None) => Ok(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum VMError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("{fault} at {location}")]
    Fault {
        fault: Fault,
        location: FaultLocation,
    },
    #[error("cannot enter {method}: {fault}")]
    Entry { method: String, fault: Fault },
    #[error("no method {class}.{name}{desc}")]
    NoSuchMethod {
        class: String,
        name: String,
        desc: String,
    },
    #[error("{0} is not static")]
    NotStatic(String),
    #[error("bad arguments for {method}: {reason}")]
    BadArguments { method: String, reason: String },
}

impl VMError {
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            VMError::Fault { fault, .. } | VMError::Entry { fault, .. } => Some(fault),
            _ => None,
        }
    }

    pub fn location(&self) -> Option<&FaultLocation> {
        match self {
            VMError::Fault { location, .. } => Some(location),
            _ => None,
        }
    }
}

pub struct VirtualMachine {
    loader: ClassLoader,
    config: VmConfig,
}

impl VirtualMachine {
    /// A machine loading classes from the directories in `config.classpath`.
    pub fn new(config: VmConfig) -> Self {
        let source = ClassPath::from_dirs(&config.classpath);
        VirtualMachine::with_source(config, Box::new(source))
    }

    pub fn with_source(config: VmConfig, source: Box<dyn ClassSource>) -> Self {
        VirtualMachine {
            loader: ClassLoader::new(source),
            config,
        }
    }

    pub fn loader(&self) -> &ClassLoader {
        &self.loader
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn load(&self, class_name: &str) -> Result<Rc<ClassFile>, LoadError> {
        self.loader.load(class_name)
    }

    /// Call a static method and run it, and any class initializers it needs, to completion.
    pub fn invoke_static(
        &self,
        class_name: &str,
        name: &str,
        desc: &str,
        args: &[Value],
    ) -> Result<Option<Value>, VMError> {
        let class = self.loader.load(class_name)?;
        let resolved = match self.loader.resolve_method(&class, name, desc) {
            Ok(resolved) => resolved,
            Err(LoadError::MethodNotFound { .. }) => {
                return Err(VMError::NoSuchMethod {
                    class: class_name.to_string(),
                    name: name.to_string(),
                    desc: desc.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let method = resolved.handle;
        let qualified = format!("{}.{}{}", method.class_name(), method.name(), method.desc());
        if !method.is_static() {
            return Err(VMError::NotStatic(qualified));
        }
        check_arguments(&qualified, &method.descriptor().params, args)?;

        let mut thread = Thread::new(self.config.max_call_depth)
            .with_max_array_length(self.config.max_array_length);
        let entry = |fault: Fault| VMError::Entry {
            method: qualified.clone(),
            fault,
        };
        let frame = Frame::new(Rc::clone(&resolved.class), Rc::clone(&method))
            .and_then(|frame| frame.with_args(args.to_vec()))
            .map_err(entry)?;
        thread.push_frame(frame).map_err(entry)?;
        let init_frames =
            interpreter::initialization_frames(&self.loader, &resolved.class).map_err(entry)?;
        for frame in init_frames.into_iter() {
            thread.push_frame(frame).map_err(entry)?;
        }

        debug!("invoking {}", qualified);
        self.run(&mut thread)
    }

    /// Run `class_name.main(String[])` with `args`.
    pub fn run_main(&self, class_name: &str, args: &[String]) -> Result<(), VMError> {
        let class = self.loader.load(class_name)?;
        if class.main_method().is_none() {
            return Err(VMError::NoSuchMethod {
                class: class_name.to_string(),
                name: "main".to_string(),
                desc: "([Ljava/lang/String;)V".to_string(),
            });
        }
        let strings = args
            .iter()
            .map(|arg| Some(Handle::String(Rc::from(arg.as_str()))))
            .collect();
        let argv = Value::Reference(Some(Handle::RefArray(ArrayRef::new(strings))));
        self.invoke_static(class_name, "main", "([Ljava/lang/String;)V", &[argv])?;
        Ok(())
    }

    /// Step `thread` until its last frame returns, yielding what that frame returned.
    pub fn run(&self, thread: &mut Thread) -> Result<Option<Value>, VMError> {
        while !thread.is_empty() {
            if self.config.trace_instructions {
                trace_instruction(thread);
            }
            let result = interpreter::step(thread, &self.loader)
                .and_then(|action| interpreter::apply(thread, action));
            if let Err(fault) = result {
                return Err(locate(thread, fault));
            }
        }
        Ok(thread.take_completion())
    }
}

fn check_arguments(method: &str, params: &[FieldType], args: &[Value]) -> Result<(), VMError> {
    if params.len() != args.len() {
        return Err(VMError::BadArguments {
            method: method.to_string(),
            reason: format!("expected {} arguments, got {}", params.len(), args.len()),
        });
    }
    for (i, (param, arg)) in params.iter().zip(args.iter()).enumerate() {
        if !arg.fits(param) {
            return Err(VMError::BadArguments {
                method: method.to_string(),
                reason: format!("argument {} is {}, expected {}", i, arg.type_name(), param),
            });
        }
    }
    Ok(())
}

fn trace_instruction(thread: &Thread) {
    if let Some(frame) = thread.current_frame() {
        match frame.current_instruction() {
            Ok((inst, _)) => trace!(
                "{}.{}{} pc {}: {} (stack depth {})",
                frame.class().name(),
                frame.method().name(),
                frame.method().desc(),
                frame.pc,
                inst,
                frame.stack.len()
            ),
            Err(e) => trace!("pc {}: undecodable instruction: {}", frame.pc, e),
        }
    }
}

fn locate(thread: &Thread, fault: Fault) -> VMError {
    let frame = match thread.current_frame() {
        Some(frame) => frame,
        None => {
            return VMError::Entry {
                method: "<none>".to_string(),
                fault,
            };
        }
    };
    let location = FaultLocation::of(frame);
    if frame.body().handlers_covering(frame.pc).next().is_some() {
        warn!(
            "{} at {} lands in an exception handler range; handlers are not run",
            fault, location
        );
    }
    VMError::Fault { fault, location }
}
