use crate::errors::class_format_check::{FormatCause, FormatError};

/// [Field Descriptors](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=105)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldDescriptor {
    Byte,
    Boolean,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Slash-form class name, e.g. `java/lang/String`.
    Object(String),
    /// Component type of a one-dimension-deeper array.
    Array(Box<FieldDescriptor>),
}

impl FieldDescriptor {
    pub fn parse(descriptor: &str) -> Result<FieldDescriptor, FormatError> {
        let bytes = descriptor.as_bytes();
        let mut pos = 0;
        let desc = Self::parse_at(bytes, &mut pos, descriptor)?;
        if pos != bytes.len() {
            return Err(FormatError::new(
                FormatCause::InvalidDescriptor(descriptor.into()),
                "field descriptor has trailing characters",
            ));
        }
        Ok(desc)
    }

    fn parse_at(
        bytes: &[u8],
        pos: &mut usize,
        whole: &str,
    ) -> Result<FieldDescriptor, FormatError> {
        let invalid =
            || FormatError::new(FormatCause::InvalidDescriptor(whole.into()), "bad descriptor");
        let c = *bytes.get(*pos).ok_or_else(invalid)?;
        *pos += 1;
        Ok(match c {
            b'B' => FieldDescriptor::Byte,
            b'Z' => FieldDescriptor::Boolean,
            b'C' => FieldDescriptor::Char,
            b'S' => FieldDescriptor::Short,
            b'I' => FieldDescriptor::Int,
            b'J' => FieldDescriptor::Long,
            b'F' => FieldDescriptor::Float,
            b'D' => FieldDescriptor::Double,
            b'L' => {
                let start = *pos;
                while *bytes.get(*pos).ok_or_else(invalid)? != b';' {
                    *pos += 1;
                }
                let name = std::str::from_utf8(&bytes[start..*pos])
                    .map_err(|_| invalid())?
                    .to_string();
                *pos += 1;
                FieldDescriptor::Object(name)
            }
            b'[' => FieldDescriptor::Array(Box::new(Self::parse_at(bytes, pos, whole)?)),
            _ => return Err(invalid()),
        })
    }

    /// Longs and doubles occupy two stack-machine slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, FieldDescriptor::Long | FieldDescriptor::Double)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldDescriptor::Object(_) | FieldDescriptor::Array(_))
    }

    /// The wire form, e.g. `[Ljava/lang/String;`.
    pub fn descriptor(&self) -> String {
        match self {
            FieldDescriptor::Byte => "B".into(),
            FieldDescriptor::Boolean => "Z".into(),
            FieldDescriptor::Char => "C".into(),
            FieldDescriptor::Short => "S".into(),
            FieldDescriptor::Int => "I".into(),
            FieldDescriptor::Long => "J".into(),
            FieldDescriptor::Float => "F".into(),
            FieldDescriptor::Double => "D".into(),
            FieldDescriptor::Object(name) => format!("L{name};"),
            FieldDescriptor::Array(component) => format!("[{}", component.descriptor()),
        }
    }
}

/// [Method Descriptors](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=106)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldDescriptor>,
    /// `None` is a void return.
    pub return_type: Option<FieldDescriptor>,
}

impl MethodDescriptor {
    pub fn parse(descriptor: &str) -> Result<MethodDescriptor, FormatError> {
        let invalid = || {
            FormatError::new(
                FormatCause::InvalidDescriptor(descriptor.into()),
                "bad method descriptor",
            )
        };
        let bytes = descriptor.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(invalid());
        }
        let mut pos = 1;
        let mut parameters = Vec::new();
        loop {
            match bytes.get(pos) {
                Some(b')') => {
                    pos += 1;
                    break;
                }
                Some(_) => {
                    parameters.push(FieldDescriptor::parse_at(bytes, &mut pos, descriptor)?)
                }
                None => return Err(invalid()),
            }
        }
        let return_type = if bytes.get(pos) == Some(&b'V') {
            pos += 1;
            None
        } else {
            Some(FieldDescriptor::parse_at(bytes, &mut pos, descriptor)?)
        };
        if pos != bytes.len() {
            return Err(invalid());
        }
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }

    /// Local-variable slots consumed by the parameters, after inflating
    /// longs and doubles to two slots. Excludes the receiver slot.
    pub fn parameter_slots(&self) -> usize {
        self.parameters
            .iter()
            .map(|p| if p.is_wide() { 2 } else { 1 })
            .sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_primitive_field_descriptors() {
        assert_eq!(FieldDescriptor::parse("I").unwrap(), FieldDescriptor::Int);
        assert_eq!(FieldDescriptor::parse("J").unwrap(), FieldDescriptor::Long);
        assert!(FieldDescriptor::parse("J").unwrap().is_wide());
    }

    #[test]
    fn parses_object_and_array_descriptors() {
        assert_eq!(
            FieldDescriptor::parse("Ljava/lang/String;").unwrap(),
            FieldDescriptor::Object("java/lang/String".into())
        );
        let two_dim = FieldDescriptor::parse("[[I").unwrap();
        assert_eq!(
            two_dim,
            FieldDescriptor::Array(Box::new(FieldDescriptor::Array(Box::new(
                FieldDescriptor::Int
            ))))
        );
        assert_eq!(two_dim.descriptor(), "[[I");
    }

    #[test]
    fn rejects_malformed_descriptors() {
        assert!(FieldDescriptor::parse("Q").is_err());
        assert!(FieldDescriptor::parse("Ljava/lang/String").is_err());
        assert!(FieldDescriptor::parse("II").is_err());
    }

    #[test]
    fn parses_method_descriptors() {
        let desc = MethodDescriptor::parse("(IJLjava/lang/String;[B)V").unwrap();
        assert_eq!(desc.parameters.len(), 4);
        assert_eq!(desc.return_type, None);
        assert_eq!(desc.parameter_slots(), 5);

        let desc = MethodDescriptor::parse("()Ljava/lang/Object;").unwrap();
        assert!(desc.parameters.is_empty());
        assert_eq!(
            desc.return_type,
            Some(FieldDescriptor::Object("java/lang/Object".into()))
        );
    }

    #[test]
    fn rejects_malformed_method_descriptors() {
        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("(I)VV").is_err());
    }
}
