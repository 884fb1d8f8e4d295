use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::debug;

use crate::class_file::unvalidated::read::class_header;
use crate::class_file::unvalidated::ClassFile as UnvalidatedClassFile;
use crate::class_file::validated::ClassFile;
use crate::class_file::validated::FieldHandle;
use crate::class_file::validated::MethodHandle;
use crate::class_file::validated::Resolved;
use crate::virtual_machine::bootstrap;
use crate::virtual_machine::LoadError;

/// Where class bytes come from. `Ok(None)` means "not here", which is not an error.
pub trait ClassSource {
    fn find_class(&self, name: &str) -> io::Result<Option<Vec<u8>>>;
}

/// Classes laid out on disk the way `javac -d` writes them: `a/b/C` is `<root>/a/b/C.class`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        DirectorySource { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ClassSource for DirectorySource {
    fn find_class(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        let path = self.root.join(format!("{}.class", name));
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    classes: HashMap<String, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        MemorySource::default()
    }

    pub fn insert(&mut self, name: &str, bytes: Vec<u8>) {
        self.classes.insert(name.to_string(), bytes);
    }

    pub fn with_class(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.insert(name, bytes);
        self
    }
}

impl ClassSource for MemorySource {
    fn find_class(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        Ok(self.classes.get(name).cloned())
    }
}

/// An ordered list of sources; the first one that has a class provides it.
#[derive(Default)]
pub struct ClassPath {
    sources: Vec<Box<dyn ClassSource>>,
}

impl ClassPath {
    pub fn new() -> Self {
        ClassPath::default()
    }

    pub fn from_dirs(dirs: &[PathBuf]) -> Self {
        let mut classpath = ClassPath::new();
        for dir in dirs.iter() {
            classpath.push(DirectorySource::new(dir.clone()));
        }
        classpath
    }

    pub fn push<S: ClassSource + 'static>(&mut self, source: S) {
        self.sources.push(Box::new(source));
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl ClassSource for ClassPath {
    fn find_class(&self, name: &str) -> io::Result<Option<Vec<u8>>> {
        for source in self.sources.iter() {
            if let Some(bytes) = source.find_class(name)? {
                return Ok(Some(bytes));
            }
        }
        Ok(None)
    }
}

/// Loads, caches, and links classes. A class is loaded at most once; every later `load` of the
/// same name hands out the same `Rc`.
pub struct ClassLoader {
    source: Box<dyn ClassSource>,
    classes: RefCell<HashMap<String, Rc<ClassFile>>>,
    /// Classes whose superclass chain is being linked right now.
    linking: RefCell<HashSet<String>>,
}

impl ClassLoader {
    pub fn new(source: Box<dyn ClassSource>) -> Self {
        ClassLoader {
            source,
            classes: RefCell::new(HashMap::new()),
            linking: RefCell::new(HashSet::new()),
        }
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.classes.borrow().contains_key(name)
    }

    pub fn loaded_count(&self) -> usize {
        self.classes.borrow().len()
    }

    pub fn load(&self, name: &str) -> Result<Rc<ClassFile>, LoadError> {
        if let Some(class) = self.classes.borrow().get(name) {
            return Ok(Rc::clone(class));
        }

        let raw = match bootstrap::build_synthetic_class(name) {
            Some(raw) => raw,
            None => {
                let bytes = self
                    .source
                    .find_class(name)
                    .map_err(|source| LoadError::Io {
                        name: name.to_string(),
                        source,
                    })?
                    .ok_or_else(|| LoadError::ClassNotFound(name.to_string()))?;
                class_header(&bytes).map_err(|source| LoadError::Malformed {
                    name: name.to_string(),
                    source,
                })?
            }
        };

        match raw.this_class_name() {
            Some(found) if found == name => {}
            found => {
                return Err(LoadError::NameMismatch {
                    requested: name.to_string(),
                    found: found.unwrap_or("<unnamed>").to_string(),
                });
            }
        }

        self.define_class(&raw)
    }

    /// Decode and register a class from bytes supplied directly.
    pub fn define(&self, bytes: &[u8]) -> Result<Rc<ClassFile>, LoadError> {
        let raw = class_header(bytes).map_err(|source| LoadError::Malformed {
            name: "<defined>".to_string(),
            source,
        })?;
        self.define_class(&raw)
    }

    /// Register an already-decoded class, such as one put together with
    /// `ClassFile::synthetic`.
    pub fn define_class(&self, raw: &UnvalidatedClassFile) -> Result<Rc<ClassFile>, LoadError> {
        let class = ClassFile::validate(raw).map_err(|source| LoadError::Invalid {
            name: raw.this_class_name().unwrap_or("<unnamed>").to_string(),
            source,
        })?;
        let name = class.name().to_string();
        if self.is_loaded(&name) {
            return Err(LoadError::DuplicateClass(name));
        }

        debug!(
            "loaded class {} ({} methods, {} fields)",
            name,
            class.methods().len(),
            class.fields().len()
        );
        let class = Rc::new(class);
        self.classes.borrow_mut().insert(name, Rc::clone(&class));
        Ok(class)
    }

    /// Load and link the superclass chain and interfaces of `class`, if not already done.
    pub fn link(&self, class: &Rc<ClassFile>) -> Result<(), LoadError> {
        if class.is_linked() {
            return Ok(());
        }
        let name = class.name().to_string();
        if !self.linking.borrow_mut().insert(name.clone()) {
            return Err(LoadError::ClassCircularity(name));
        }
        let result = self.link_supers(class);
        self.linking.borrow_mut().remove(&name);
        let (super_class, interfaces) = result?;

        debug!(
            "linked class {} (super {})",
            name,
            super_class.as_ref().map(|s| s.name()).unwrap_or("<none>")
        );
        class.set_links(super_class, interfaces);
        Ok(())
    }

    fn link_supers(
        &self,
        class: &Rc<ClassFile>,
    ) -> Result<(Option<Rc<ClassFile>>, Vec<Rc<ClassFile>>), LoadError> {
        let super_class = match class.super_class_name() {
            Some(super_name) => {
                let super_class = self.load(super_name)?;
                self.link(&super_class)?;
                Some(super_class)
            }
            None => None,
        };
        let mut interfaces = Vec::new();
        for interface_name in class.interface_names().iter() {
            let interface = self.load(interface_name)?;
            self.link(&interface)?;
            interfaces.push(interface);
        }
        Ok((super_class, interfaces))
    }

    /// Find `name` with descriptor `desc` in `class` or, failing that, its superclasses and
    /// then its interfaces.
    pub fn resolve_method(
        &self,
        class: &Rc<ClassFile>,
        name: &str,
        desc: &str,
    ) -> Result<Resolved<MethodHandle>, LoadError> {
        self.link(class)?;
        let found = find_member(class, &mut |c: &Rc<ClassFile>| c.get_method(name, desc));
        found.ok_or_else(|| LoadError::MethodNotFound {
            class: class.name().to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
        })
    }

    pub fn resolve_field(
        &self,
        class: &Rc<ClassFile>,
        name: &str,
        desc: &str,
    ) -> Result<Resolved<FieldHandle>, LoadError> {
        self.link(class)?;
        let found = find_member(class, &mut |c: &Rc<ClassFile>| c.get_field(name, desc));
        found.ok_or_else(|| LoadError::FieldNotFound {
            class: class.name().to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
        })
    }
}

// Only linked classes are searched: `link` has already filled in every class reachable here.
fn find_member<H, F>(class: &Rc<ClassFile>, lookup: &mut F) -> Option<Resolved<H>>
where
    F: FnMut(&Rc<ClassFile>) -> Option<Rc<H>>,
{
    let mut current = Some(Rc::clone(class));
    while let Some(c) = current {
        if let Some(handle) = lookup(&c) {
            return Some(Resolved { class: c, handle });
        }
        current = c.super_link();
    }

    let mut current = Some(Rc::clone(class));
    while let Some(c) = current {
        for interface in c.interface_links().iter() {
            if let Some(found) = find_member(interface, lookup) {
                return Some(found);
            }
        }
        current = c.super_link();
    }
    None
}
