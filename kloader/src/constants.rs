use std::{error::Error, io::Cursor};

use byteorder::{ReadBytesExt, BE};

use crate::errors::class_format_check::{FormatCause, FormatError};
use crate::errors::class_loading::{LoadingCause, LoadingError};

/// [The Constant Pool](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=87)
#[derive(Clone, Debug)]
pub enum ConstantPool {
    Utf8(Utf8),
    Integer(Integer),
    Float(Float),
    Long(Long),
    Double(Double),
    Class(Class),
    String(String),
    Fieldref(Fieldref),
    Methodref(Methodref),
    InterfaceMethodref(InterfaceMethodref),
    NameAndType(NameAndType),
    MethodHandle(MethodHandle),
    MethodType(MethodType),
    InvokeDynamic(InvokeDynamic),
    /// Index 0 and the trailing slot of eight-byte constants.
    Unknown,
}

#[repr(u8)]
pub enum Tags {
    Utf8 = 1,
    Integer = 3,
    Float = 4,
    Long = 5,
    Double = 6,
    Class = 7,
    String = 8,
    Fieldref = 9,
    Methodref = 10,
    InterfaceMethodref = 11,
    NameAndType = 12,
    MethodHandle = 15,
    MethodType = 16,
    InvokeDynamic = 18,
}

#[derive(Clone)]
/// [Utf8 Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=118)
pub struct Utf8 {
    /** The number of bytes in the bytes array (not the length of the
     *  resulting string).
     */
    pub length: u16,
    pub bytes: Vec<u8>,
}

impl Utf8 {
    pub fn new(cursor: &mut Cursor<&[u8]>) -> Result<Utf8, Box<dyn Error>> {
        let length = cursor.read_u16::<BE>()?;
        let mut bytes = vec![0; length as usize];
        std::io::Read::read_exact(cursor, &mut bytes)?;
        Ok(Utf8 { length, bytes })
    }
}

impl From<&str> for Utf8 {
    fn from(input: &str) -> Self {
        Utf8 {
            length: input.len() as u16,
            bytes: input.as_bytes().to_vec(),
        }
    }
}

impl From<&Utf8> for std::string::String {
    fn from(value: &Utf8) -> Self {
        // Some compilers emit modified UTF-8 sequences that are not valid
        // standard UTF-8; decode those lossily.
        std::string::String::from_utf8_lossy(&value.bytes).into_owned()
    }
}

impl std::fmt::Debug for Utf8 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}\"", std::string::String::from(self))
    }
}

#[derive(Clone, Debug)]
/// [Integer Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=93)
pub struct Integer {
    pub bytes: u32,
}

impl Integer {
    pub fn value(&self) -> i32 {
        self.bytes as i32
    }
}

#[derive(Clone, Debug)]
/// [Float Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=93)
pub struct Float {
    pub bytes: u32,
}

impl Float {
    pub fn value(&self) -> f32 {
        f32::from_bits(self.bytes)
    }
}

#[derive(Clone, Debug)]
/// [Long Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=94)
pub struct Long {
    pub high_bytes: u32,
    pub low_bytes: u32,
}

impl Long {
    pub fn value(&self) -> i64 {
        (((self.high_bytes as u64) << 32) | self.low_bytes as u64) as i64
    }
}

#[derive(Clone, Debug)]
/// [Double Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=94)
pub struct Double {
    pub high_bytes: u32,
    pub low_bytes: u32,
}

impl Double {
    pub fn value(&self) -> f64 {
        f64::from_bits(((self.high_bytes as u64) << 32) | self.low_bytes as u64)
    }
}

#[derive(Clone, Debug)]
/// [Class Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=91)
pub struct Class {
    pub name_index: u16,
    /// Decoded slash-form name, attached by [`resolve_pool`].
    pub name: Option<std::string::String>,
}

#[derive(Clone, Debug)]
/// [String Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=92)
pub struct String {
    pub string_index: u16,
    /// Decoded contents, attached by [`resolve_pool`].
    pub contents: Option<std::string::String>,
}

#[derive(Clone, Debug)]
/// [Fieldref Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=91)
pub struct Fieldref {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug)]
/// [Methodref Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=91)
pub struct Methodref {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug)]
/// [InterfaceMethodref Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=91)
pub struct InterfaceMethodref {
    pub class_index: u16,
    pub name_and_type_index: u16,
}

#[derive(Clone, Debug)]
/// [NameAndType Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=95)
pub struct NameAndType {
    pub name_index: u16,
    pub descriptor_index: u16,
    /// Decoded member name, attached by [`resolve_pool`].
    pub name: Option<std::string::String>,
    /// Decoded descriptor, attached by [`resolve_pool`].
    pub descriptor: Option<std::string::String>,
}

#[derive(Clone, Debug)]
/// [MethodHandle Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=99)
pub struct MethodHandle {
    pub reference_kind: u8,
    pub reference_index: u16,
}

#[derive(Clone, Debug)]
/// [MethodType Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=101)
pub struct MethodType {
    pub descriptor_index: u16,
    /// Decoded descriptor, attached by [`resolve_pool`].
    pub descriptor: Option<std::string::String>,
}

#[derive(Clone, Debug)]
/// [InvokeDynamic Constant](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=102)
pub struct InvokeDynamic {
    pub bootstrap_method_attr_index: u16,
    pub name_and_type_index: u16,
}

/// Reads `count - 1` logical entries into `pool`, which the caller has
/// seeded with the unused index-0 entry. Eight-byte constants push a
/// trailing [`ConstantPool::Unknown`] so the historical two-slot wire
/// indexing holds.
pub fn read_constant_pool(
    pool: &mut Vec<ConstantPool>,
    count: u16,
    cursor: &mut Cursor<&[u8]>,
) -> Result<(), Box<dyn Error>> {
    while pool.len() < count as usize {
        let tag = cursor.read_u8()?;
        match tag {
            t if t == Tags::Utf8 as u8 => pool.push(ConstantPool::Utf8(Utf8::new(cursor)?)),
            t if t == Tags::Integer as u8 => pool.push(ConstantPool::Integer(Integer {
                bytes: cursor.read_u32::<BE>()?,
            })),
            t if t == Tags::Float as u8 => pool.push(ConstantPool::Float(Float {
                bytes: cursor.read_u32::<BE>()?,
            })),
            t if t == Tags::Long as u8 => {
                pool.push(ConstantPool::Long(Long {
                    high_bytes: cursor.read_u32::<BE>()?,
                    low_bytes: cursor.read_u32::<BE>()?,
                }));
                pool.push(ConstantPool::Unknown);
            }
            t if t == Tags::Double as u8 => {
                pool.push(ConstantPool::Double(Double {
                    high_bytes: cursor.read_u32::<BE>()?,
                    low_bytes: cursor.read_u32::<BE>()?,
                }));
                pool.push(ConstantPool::Unknown);
            }
            t if t == Tags::Class as u8 => pool.push(ConstantPool::Class(Class {
                name_index: cursor.read_u16::<BE>()?,
                name: None,
            })),
            t if t == Tags::String as u8 => pool.push(ConstantPool::String(String {
                string_index: cursor.read_u16::<BE>()?,
                contents: None,
            })),
            t if t == Tags::Fieldref as u8 => pool.push(ConstantPool::Fieldref(Fieldref {
                class_index: cursor.read_u16::<BE>()?,
                name_and_type_index: cursor.read_u16::<BE>()?,
            })),
            t if t == Tags::Methodref as u8 => pool.push(ConstantPool::Methodref(Methodref {
                class_index: cursor.read_u16::<BE>()?,
                name_and_type_index: cursor.read_u16::<BE>()?,
            })),
            t if t == Tags::InterfaceMethodref as u8 => {
                pool.push(ConstantPool::InterfaceMethodref(InterfaceMethodref {
                    class_index: cursor.read_u16::<BE>()?,
                    name_and_type_index: cursor.read_u16::<BE>()?,
                }))
            }
            t if t == Tags::NameAndType as u8 => {
                pool.push(ConstantPool::NameAndType(NameAndType {
                    name_index: cursor.read_u16::<BE>()?,
                    descriptor_index: cursor.read_u16::<BE>()?,
                    name: None,
                    descriptor: None,
                }))
            }
            t if t == Tags::MethodHandle as u8 => {
                pool.push(ConstantPool::MethodHandle(MethodHandle {
                    reference_kind: cursor.read_u8()?,
                    reference_index: cursor.read_u16::<BE>()?,
                }))
            }
            t if t == Tags::MethodType as u8 => pool.push(ConstantPool::MethodType(MethodType {
                descriptor_index: cursor.read_u16::<BE>()?,
                descriptor: None,
            })),
            t if t == Tags::InvokeDynamic as u8 => {
                pool.push(ConstantPool::InvokeDynamic(InvokeDynamic {
                    bootstrap_method_attr_index: cursor.read_u16::<BE>()?,
                    name_and_type_index: cursor.read_u16::<BE>()?,
                }))
            }
            _ => {
                return Err(Box::new(LoadingError::new(
                    LoadingCause::InvalidConstantTag(tag),
                    &format!("at pool index {}", pool.len()),
                )))
            }
        }
    }
    Ok(())
}

/// Second pass over a freshly read pool: decode the Utf8 entries that
/// Class, String, NameAndType and MethodType entries point at and attach
/// the text, so later consumers never chase a Utf8 index again.
pub fn resolve_pool(pool: &mut [ConstantPool]) -> Result<(), FormatError> {
    let lookup = |pool: &[ConstantPool], index: u16| -> Result<std::string::String, FormatError> {
        match pool.get(index as usize) {
            Some(ConstantPool::Utf8(utf8)) => Ok(std::string::String::from(utf8)),
            _ => Err(FormatError::new(
                FormatCause::InvalidIndex(index),
                "expected a Utf8 constant",
            )),
        }
    };

    for i in 0..pool.len() {
        match &pool[i] {
            ConstantPool::Class(c) => {
                let name = lookup(pool, c.name_index)?;
                if let ConstantPool::Class(c) = &mut pool[i] {
                    c.name = Some(name);
                }
            }
            ConstantPool::String(s) => {
                let contents = lookup(pool, s.string_index)?;
                if let ConstantPool::String(s) = &mut pool[i] {
                    s.contents = Some(contents);
                }
            }
            ConstantPool::NameAndType(nat) => {
                let name = lookup(pool, nat.name_index)?;
                let descriptor = lookup(pool, nat.descriptor_index)?;
                if let ConstantPool::NameAndType(nat) = &mut pool[i] {
                    nat.name = Some(name);
                    nat.descriptor = Some(descriptor);
                }
            }
            ConstantPool::MethodType(mt) => {
                let descriptor = lookup(pool, mt.descriptor_index)?;
                if let ConstantPool::MethodType(mt) = &mut pool[i] {
                    mt.descriptor = Some(descriptor);
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Resolved slash-form name of the Class constant at `index`.
pub fn class_name_at(pool: &[ConstantPool], index: u16) -> Option<&str> {
    match pool.get(index as usize)? {
        ConstantPool::Class(c) => c.name.as_deref(),
        _ => None,
    }
}

/// Resolved `(name, descriptor)` of the NameAndType constant at `index`.
pub fn name_and_type_at(pool: &[ConstantPool], index: u16) -> Option<(&str, &str)> {
    match pool.get(index as usize)? {
        ConstantPool::NameAndType(nat) => Some((nat.name.as_deref()?, nat.descriptor.as_deref()?)),
        _ => None,
    }
}

/// `(class_index, name_and_type_index)` of any of the three member
/// reference constants at `index`.
pub fn member_ref_at(pool: &[ConstantPool], index: u16) -> Option<(u16, u16)> {
    match pool.get(index as usize)? {
        ConstantPool::Fieldref(r) => Some((r.class_index, r.name_and_type_index)),
        ConstantPool::Methodref(r) => Some((r.class_index, r.name_and_type_index)),
        ConstantPool::InterfaceMethodref(r) => Some((r.class_index, r.name_and_type_index)),
        _ => None,
    }
}

pub fn utf8_at(pool: &[ConstantPool], index: u16) -> Option<std::string::String> {
    match pool.get(index as usize)? {
        ConstantPool::Utf8(utf8) => Some(std::string::String::from(utf8)),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn pool_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        // #1 Utf8 "Main"
        bytes.push(Tags::Utf8 as u8);
        bytes.extend_from_slice(&4u16.to_be_bytes());
        bytes.extend_from_slice(b"Main");
        // #2 Class -> #1
        bytes.push(Tags::Class as u8);
        bytes.extend_from_slice(&1u16.to_be_bytes());
        // #3 Long 0x1_0000_0001
        bytes.push(Tags::Long as u8);
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        // #5 Integer -7
        bytes.push(Tags::Integer as u8);
        bytes.extend_from_slice(&(-7i32 as u32).to_be_bytes());
        bytes
    }

    #[test]
    fn eight_byte_constants_take_two_slots() {
        let data = pool_bytes();
        let mut cursor = Cursor::new(data.as_slice());
        let mut pool = vec![ConstantPool::Unknown];
        read_constant_pool(&mut pool, 6, &mut cursor).unwrap();
        assert!(matches!(pool[3], ConstantPool::Long(_)));
        assert!(matches!(pool[4], ConstantPool::Unknown));
        let ConstantPool::Long(l) = &pool[3] else {
            unreachable!()
        };
        assert_eq!(l.value(), 0x1_0000_0001);
        let ConstantPool::Integer(i) = &pool[5] else {
            unreachable!()
        };
        assert_eq!(i.value(), -7);
    }

    #[test]
    fn resolution_attaches_decoded_names() {
        let data = pool_bytes();
        let mut cursor = Cursor::new(data.as_slice());
        let mut pool = vec![ConstantPool::Unknown];
        read_constant_pool(&mut pool, 6, &mut cursor).unwrap();
        resolve_pool(&mut pool).unwrap();
        assert_eq!(class_name_at(&pool, 2), Some("Main"));
    }

    #[test]
    fn invalid_tag_is_a_loading_error() {
        let bytes = [42u8, 0, 0];
        let mut cursor = Cursor::new(bytes.as_slice());
        let mut pool = vec![ConstantPool::Unknown];
        assert!(read_constant_pool(&mut pool, 2, &mut cursor).is_err());
    }
}
