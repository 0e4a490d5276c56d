use std::{error::Error, io::Cursor};

use byteorder::{ReadBytesExt, BE};

use crate::constants::{self, ConstantPool};
use crate::errors::class_loading::{LoadingCause, LoadingError};

/// [Attributes](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=123)
#[derive(Clone, Debug)]
pub enum AttributeInfo {
    Code(Code),
    LineNumberTable(LineNumberTable),
    SourceFile(SourceFile),
    ConstantValue(ConstantValue),
    Exceptions(Exceptions),
    RuntimeVisibleAnnotations(RuntimeVisibleAnnotations),
    Unknown(RawAttribute),
}

/// One guarded region of a `Code` attribute. `catch_type` 0 catches
/// every throwable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExceptionTableEntry {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

/// [Code Attribute](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=130)
#[derive(Clone, Debug)]
pub struct Code {
    /**
     * **max_stack**\
     *  The maximum depth of the operand stack of this method at any point
     *  during execution.
     */
    pub max_stack: u16,
    /**
     * **max_locals**\
     *  The number of local variables allocated upon invocation, including
     *  the locals used to pass parameters. Longs and doubles count two.
     */
    pub max_locals: u16,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<AttributeInfo>,
}

impl Code {
    /// Line-number entries from the nested tables, if the compiler
    /// emitted any.
    pub fn line_number_for(&self, pc: u16) -> Option<u16> {
        let mut best: Option<(u16, u16)> = None;
        for attr in &self.attributes {
            if let AttributeInfo::LineNumberTable(table) = attr {
                for entry in &table.entries {
                    if entry.start_pc <= pc {
                        match best {
                            Some((start, _)) if start >= entry.start_pc => {}
                            _ => best = Some((entry.start_pc, entry.line_number)),
                        }
                    }
                }
            }
        }
        best.map(|(_, line)| line)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct LineNumberEntry {
    pub start_pc: u16,
    pub line_number: u16,
}

/// [LineNumberTable Attribute](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=163)
#[derive(Clone, Debug)]
pub struct LineNumberTable {
    pub entries: Vec<LineNumberEntry>,
}

/// [SourceFile Attribute](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=161)
#[derive(Clone, Debug)]
pub struct SourceFile {
    pub sourcefile_index: u16,
    pub file_name: String,
}

/// [ConstantValue Attribute](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=129)
#[derive(Clone, Copy, Debug)]
pub struct ConstantValue {
    pub constantvalue_index: u16,
}

/// [Exceptions Attribute](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=143)
#[derive(Clone, Debug)]
pub struct Exceptions {
    pub exception_index_table: Vec<u16>,
}

/// [RuntimeVisibleAnnotations](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=171)
#[derive(Clone, Debug)]
pub struct RuntimeVisibleAnnotations {
    pub annotations: Vec<Annotation>,
}

#[derive(Clone, Debug)]
pub struct Annotation {
    pub type_index: u16,
    pub type_descriptor: String,
    pub elements: Vec<(u16, ElementValue)>,
}

#[derive(Clone, Debug)]
pub enum ElementValue {
    /// Primitive or string constant: tag plus a pool index.
    Const(u8, u16),
    EnumConst {
        type_name_index: u16,
        const_name_index: u16,
    },
    Class(u16),
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

/// An attribute this loader does not model. Keeps the raw bytes so a
/// consumer can re-open them as a typed reader later.
#[derive(Clone, Debug)]
pub struct RawAttribute {
    pub name: String,
    pub info: Vec<u8>,
}

impl RawAttribute {
    pub fn open(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.info)
    }
}

/// Reads an attribute table (count prefix plus entries) at the cursor,
/// appending the parsed attributes to `attributes`.
pub fn read_attributes(
    constant_pool: &[ConstantPool],
    attributes: &mut Vec<AttributeInfo>,
    cursor: &mut Cursor<&[u8]>,
) -> Result<(), Box<dyn Error>> {
    let count = cursor.read_u16::<BE>()?;
    for _ in 0..count {
        attributes.push(read_attribute(constant_pool, cursor)?);
    }
    Ok(())
}

fn read_attribute(
    constant_pool: &[ConstantPool],
    cursor: &mut Cursor<&[u8]>,
) -> Result<AttributeInfo, Box<dyn Error>> {
    let name_index = cursor.read_u16::<BE>()?;
    let length = cursor.read_u32::<BE>()?;
    let name = constants::utf8_at(constant_pool, name_index).ok_or_else(|| {
        LoadingError::new(
            LoadingCause::InvalidAttributeNameIndex(name_index),
            "attribute name was not a Utf8 constant",
        )
    })?;

    Ok(match name.as_str() {
        "Code" => {
            let max_stack = cursor.read_u16::<BE>()?;
            let max_locals = cursor.read_u16::<BE>()?;
            let code_length = cursor.read_u32::<BE>()?;
            let mut code = vec![0; code_length as usize];
            std::io::Read::read_exact(cursor, &mut code)?;
            let exception_table_length = cursor.read_u16::<BE>()?;
            let mut exception_table = Vec::with_capacity(exception_table_length as usize);
            for _ in 0..exception_table_length {
                exception_table.push(ExceptionTableEntry {
                    start_pc: cursor.read_u16::<BE>()?,
                    end_pc: cursor.read_u16::<BE>()?,
                    handler_pc: cursor.read_u16::<BE>()?,
                    catch_type: cursor.read_u16::<BE>()?,
                });
            }
            let mut nested = Vec::new();
            read_attributes(constant_pool, &mut nested, cursor)?;
            AttributeInfo::Code(Code {
                max_stack,
                max_locals,
                code,
                exception_table,
                attributes: nested,
            })
        }
        "LineNumberTable" => {
            let count = cursor.read_u16::<BE>()?;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                entries.push(LineNumberEntry {
                    start_pc: cursor.read_u16::<BE>()?,
                    line_number: cursor.read_u16::<BE>()?,
                });
            }
            AttributeInfo::LineNumberTable(LineNumberTable { entries })
        }
        "SourceFile" => {
            let sourcefile_index = cursor.read_u16::<BE>()?;
            let file_name =
                constants::utf8_at(constant_pool, sourcefile_index).ok_or_else(|| {
                    LoadingError::new(
                        LoadingCause::InvalidAttributeNameIndex(sourcefile_index),
                        "SourceFile index was not a Utf8 constant",
                    )
                })?;
            AttributeInfo::SourceFile(SourceFile {
                sourcefile_index,
                file_name,
            })
        }
        "ConstantValue" => AttributeInfo::ConstantValue(ConstantValue {
            constantvalue_index: cursor.read_u16::<BE>()?,
        }),
        "Exceptions" => {
            let count = cursor.read_u16::<BE>()?;
            let mut exception_index_table = Vec::with_capacity(count as usize);
            for _ in 0..count {
                exception_index_table.push(cursor.read_u16::<BE>()?);
            }
            AttributeInfo::Exceptions(Exceptions {
                exception_index_table,
            })
        }
        "RuntimeVisibleAnnotations" => {
            let count = cursor.read_u16::<BE>()?;
            let mut annotations = Vec::with_capacity(count as usize);
            for _ in 0..count {
                annotations.push(read_annotation(constant_pool, cursor)?);
            }
            AttributeInfo::RuntimeVisibleAnnotations(RuntimeVisibleAnnotations { annotations })
        }
        _ => {
            let mut info = vec![0; length as usize];
            std::io::Read::read_exact(cursor, &mut info)?;
            AttributeInfo::Unknown(RawAttribute { name, info })
        }
    })
}

fn read_annotation(
    constant_pool: &[ConstantPool],
    cursor: &mut Cursor<&[u8]>,
) -> Result<Annotation, Box<dyn Error>> {
    let type_index = cursor.read_u16::<BE>()?;
    let type_descriptor = constants::utf8_at(constant_pool, type_index).ok_or_else(|| {
        LoadingError::new(
            LoadingCause::InvalidAttributeNameIndex(type_index),
            "annotation type was not a Utf8 constant",
        )
    })?;
    let pair_count = cursor.read_u16::<BE>()?;
    let mut elements = Vec::with_capacity(pair_count as usize);
    for _ in 0..pair_count {
        let element_name_index = cursor.read_u16::<BE>()?;
        elements.push((element_name_index, read_element_value(constant_pool, cursor)?));
    }
    Ok(Annotation {
        type_index,
        type_descriptor,
        elements,
    })
}

fn read_element_value(
    constant_pool: &[ConstantPool],
    cursor: &mut Cursor<&[u8]>,
) -> Result<ElementValue, Box<dyn Error>> {
    let tag = cursor.read_u8()?;
    Ok(match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => {
            ElementValue::Const(tag, cursor.read_u16::<BE>()?)
        }
        b'e' => ElementValue::EnumConst {
            type_name_index: cursor.read_u16::<BE>()?,
            const_name_index: cursor.read_u16::<BE>()?,
        },
        b'c' => ElementValue::Class(cursor.read_u16::<BE>()?),
        b'@' => ElementValue::Annotation(Box::new(read_annotation(constant_pool, cursor)?)),
        b'[' => {
            let count = cursor.read_u16::<BE>()?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(read_element_value(constant_pool, cursor)?);
            }
            ElementValue::Array(values)
        }
        _ => {
            return Err(Box::new(LoadingError::new(
                LoadingCause::InvalidConstantTag(tag),
                "unknown element_value tag",
            )))
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::Utf8;

    fn pool_with(names: &[&str]) -> Vec<ConstantPool> {
        let mut pool = vec![ConstantPool::Unknown];
        for name in names {
            pool.push(ConstantPool::Utf8(Utf8::from(*name)));
        }
        pool
    }

    #[test]
    fn parses_code_with_exception_table_and_line_numbers() {
        let pool = pool_with(&["Code", "LineNumberTable"]);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u16.to_be_bytes()); // one attribute
        bytes.extend_from_slice(&1u16.to_be_bytes()); // name -> "Code"
        let body = {
            let mut body = Vec::new();
            body.extend_from_slice(&2u16.to_be_bytes()); // max_stack
            body.extend_from_slice(&3u16.to_be_bytes()); // max_locals
            body.extend_from_slice(&1u32.to_be_bytes()); // code length
            body.push(0xb1); // return
            body.extend_from_slice(&1u16.to_be_bytes()); // one handler
            body.extend_from_slice(&0u16.to_be_bytes());
            body.extend_from_slice(&1u16.to_be_bytes());
            body.extend_from_slice(&0u16.to_be_bytes());
            body.extend_from_slice(&0u16.to_be_bytes()); // catch-all
            body.extend_from_slice(&1u16.to_be_bytes()); // one nested attribute
            body.extend_from_slice(&2u16.to_be_bytes()); // -> "LineNumberTable"
            body.extend_from_slice(&6u32.to_be_bytes());
            body.extend_from_slice(&1u16.to_be_bytes());
            body.extend_from_slice(&0u16.to_be_bytes()); // start_pc
            body.extend_from_slice(&7u16.to_be_bytes()); // line 7
            body
        };
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&body);

        let mut attributes = Vec::new();
        let mut cursor = Cursor::new(bytes.as_slice());
        read_attributes(&pool, &mut attributes, &mut cursor).unwrap();

        let AttributeInfo::Code(code) = &attributes[0] else {
            panic!("expected a Code attribute");
        };
        assert_eq!(code.max_stack, 2);
        assert_eq!(code.max_locals, 3);
        assert_eq!(code.code, vec![0xb1]);
        assert_eq!(
            code.exception_table[0],
            ExceptionTableEntry {
                start_pc: 0,
                end_pc: 1,
                handler_pc: 0,
                catch_type: 0
            }
        );
        assert_eq!(code.line_number_for(0), Some(7));
    }

    #[test]
    fn unknown_attributes_keep_raw_bytes() {
        let pool = pool_with(&["Deprecated"]);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.extend_from_slice(&3u32.to_be_bytes());
        bytes.extend_from_slice(&[0xAA, 0xBB, 0xCC]);

        let mut attributes = Vec::new();
        let mut cursor = Cursor::new(bytes.as_slice());
        read_attributes(&pool, &mut attributes, &mut cursor).unwrap();

        let AttributeInfo::Unknown(raw) = &attributes[0] else {
            panic!("expected a raw attribute");
        };
        assert_eq!(raw.name, "Deprecated");
        assert_eq!(raw.info, vec![0xAA, 0xBB, 0xCC]);
        assert_eq!(raw.open().get_ref().len(), 3);
    }
}
