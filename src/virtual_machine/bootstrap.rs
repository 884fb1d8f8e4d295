//! Classes the loader provides itself rather than finding on the class path.

use crate::class_file::unvalidated::ClassFile as UnvalidatedClassFile;
use crate::class_file::unvalidated::CodeAttribute;

const ACC_PUBLIC: u16 = 0x0001;
const RETURN: u8 = 0xb1;

pub fn build_synthetic_class(name: &str) -> Option<UnvalidatedClassFile> {
    let class = match name {
        // The root of every superclass chain. Its constructor does nothing, so that the usual
        // `aload_0; invokespecial Object.<init>` preamble has something to name.
        "java/lang/Object" => UnvalidatedClassFile::synthetic("java/lang/Object").with_method(
            "<init>",
            "()V",
            ACC_PUBLIC,
            Some(CodeAttribute::new(0, 1, vec![RETURN])),
        ),
        _ => return None,
    };
    Some(class)
}
