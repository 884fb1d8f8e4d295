use crate::class_file::descriptor::FieldType;
use crate::class_file::unvalidated;
use crate::class_file::unvalidated::Attribute;
use crate::class_file::unvalidated::ClassFile as UnvalidatedClassFile;
use crate::class_file::unvalidated::ConstantIdx;
use crate::class_file::validated::ValidationError;

#[derive(Debug)]
pub struct FieldHandle {
    pub(crate) access_flags: unvalidated::FieldAccessFlags,
    pub(crate) name: String,
    pub(crate) desc: String,
    pub(crate) ty: FieldType,
    /// Index of the `ConstantValue` initializer, for static fields that have one.
    pub(crate) constant_value: Option<ConstantIdx>,
}

impl FieldHandle {
    pub fn validate(
        raw_class: &UnvalidatedClassFile,
        raw_field: &unvalidated::FieldInfo,
    ) -> Result<FieldHandle, ValidationError> {
        let name = raw_class.checked_utf8(raw_field.name_index)?.to_string();
        let desc = raw_class.checked_utf8(raw_field.descriptor_index)?.to_string();
        let ty = FieldType::parse(&desc)?;

        let mut constant_value = None;
        if raw_field.access_flags.is_static() {
            for attr in raw_field.attributes.iter() {
                if attr.name(raw_class) == Some("ConstantValue") {
                    if let Attribute::ConstantValue(idx) = attr.materialize(raw_class)? {
                        constant_value = Some(idx);
                    }
                }
            }
        }

        Ok(FieldHandle {
            access_flags: raw_field.access_flags,
            name,
            desc,
            ty,
            constant_value,
        })
    }

    pub fn access(&self) -> &unvalidated::FieldAccessFlags {
        &self.access_flags
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn ty(&self) -> &FieldType {
        &self.ty
    }
}
