//! Field and method descriptors, e.g. `[I` or `(IJ[Ljava/lang/String;)V`.

use std::fmt;
use std::str::Chars;

use thiserror::Error;

/// The most array dimensions a descriptor may carry.
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed descriptor {0:?}")]
pub struct DescriptorError(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Object(String),
    Short,
    Boolean,
    Array(Box<FieldType>),
}

impl FieldType {
    pub fn parse(desc: &str) -> Result<FieldType, DescriptorError> {
        let mut chars = desc.chars();
        let ty = parse_field_type(&mut chars).ok_or_else(|| DescriptorError(desc.to_string()))?;
        if chars.next().is_some() {
            return Err(DescriptorError(desc.to_string()));
        }
        Ok(ty)
    }

    /// Long and double take two words of operand stack and two local variable indices.
    pub fn is_wide(&self) -> bool {
        matches!(self, FieldType::Long | FieldType::Double)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    /// Types that live on the operand stack as an `int`.
    pub fn is_int_like(&self) -> bool {
        matches!(
            self,
            FieldType::Byte
                | FieldType::Char
                | FieldType::Int
                | FieldType::Short
                | FieldType::Boolean
        )
    }

    pub fn words(&self) -> usize {
        if self.is_wide() {
            2
        } else {
            1
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldType::Byte => f.write_str("B"),
            FieldType::Char => f.write_str("C"),
            FieldType::Double => f.write_str("D"),
            FieldType::Float => f.write_str("F"),
            FieldType::Int => f.write_str("I"),
            FieldType::Long => f.write_str("J"),
            FieldType::Object(name) => write!(f, "L{};", name),
            FieldType::Short => f.write_str("S"),
            FieldType::Boolean => f.write_str("Z"),
            FieldType::Array(inner) => write!(f, "[{}", inner),
        }
    }
}

fn parse_field_type(chars: &mut Chars) -> Option<FieldType> {
    let mut dimensions = 0;
    while chars.as_str().starts_with('[') {
        chars.next();
        dimensions += 1;
        if dimensions > MAX_ARRAY_DIMENSIONS {
            return None;
        }
    }
    let mut ty = match chars.next()? {
        'B' => FieldType::Byte,
        'C' => FieldType::Char,
        'D' => FieldType::Double,
        'F' => FieldType::Float,
        'I' => FieldType::Int,
        'J' => FieldType::Long,
        'S' => FieldType::Short,
        'Z' => FieldType::Boolean,
        'L' => {
            let mut name = String::new();
            loop {
                match chars.next()? {
                    ';' => break,
                    c => name.push(c),
                }
            }
            if name.is_empty() {
                return None;
            }
            FieldType::Object(name)
        }
        _ => return None,
    };
    for _ in 0..dimensions {
        ty = FieldType::Array(Box::new(ty));
    }
    Some(ty)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub params: Vec<FieldType>,
    /// `None` for `V`.
    pub ret: Option<FieldType>,
}

impl MethodDescriptor {
    pub fn parse(desc: &str) -> Result<MethodDescriptor, DescriptorError> {
        let err = || DescriptorError(desc.to_string());
        let mut chars = desc.chars();
        if chars.next() != Some('(') {
            return Err(err());
        }
        let mut params = Vec::new();
        loop {
            let rest = chars.as_str();
            if rest.starts_with(')') {
                chars.next();
                break;
            }
            params.push(parse_field_type(&mut chars).ok_or_else(err)?);
        }
        let ret = if chars.as_str() == "V" {
            chars.next();
            None
        } else {
            Some(parse_field_type(&mut chars).ok_or_else(err)?)
        };
        if chars.next().is_some() {
            return Err(err());
        }
        Ok(MethodDescriptor { params, ret })
    }

    /// Words of operand stack the arguments occupy, not counting a receiver.
    pub fn arg_words(&self) -> usize {
        self.params.iter().map(FieldType::words).sum()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("(")?;
        for param in self.params.iter() {
            write!(f, "{}", param)?;
        }
        f.write_str(")")?;
        match &self.ret {
            Some(ret) => write!(f, "{}", ret),
            None => f.write_str("V"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_descriptor() {
        let desc = MethodDescriptor::parse("([Ljava/lang/String;)V").unwrap();
        assert_eq!(
            desc.params,
            vec![FieldType::Array(Box::new(FieldType::Object(
                "java/lang/String".to_string()
            )))]
        );
        assert_eq!(desc.ret, None);
        assert_eq!(desc.to_string(), "([Ljava/lang/String;)V");
    }

    #[test]
    fn wide_params_count_two_words() {
        let desc = MethodDescriptor::parse("(IJD[J)J").unwrap();
        assert_eq!(desc.arg_words(), 6);
        assert_eq!(desc.ret, Some(FieldType::Long));
    }

    #[test]
    fn rejects_garbage() {
        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("(I)VV").is_err());
        assert!(MethodDescriptor::parse("(Q)V").is_err());
        assert!(FieldType::parse("Ljava/lang/String").is_err());
        assert!(FieldType::parse("L;").is_err());
        assert!(FieldType::parse("II").is_err());
        assert!(FieldType::parse("[[[").is_err());
    }

    #[test]
    fn array_dimensions_are_capped() {
        let deepest = format!("{}I", "[".repeat(MAX_ARRAY_DIMENSIONS));
        let mut ty = FieldType::parse(&deepest).unwrap();
        let mut dimensions = 0;
        while let FieldType::Array(inner) = ty {
            ty = *inner;
            dimensions += 1;
        }
        assert_eq!(dimensions, MAX_ARRAY_DIMENSIONS);
        assert_eq!(ty, FieldType::Int);

        let too_deep = format!("({}I)V", "[".repeat(MAX_ARRAY_DIMENSIONS + 1));
        assert_eq!(
            MethodDescriptor::parse(&too_deep),
            Err(DescriptorError(too_deep.clone()))
        );
        let huge = format!("({}I)V", "[".repeat(60000));
        assert!(MethodDescriptor::parse(&huge).is_err());
    }
}
