use byteorder::{ReadBytesExt, BE};
use std::error::Error;
use std::io::Cursor;

use crate::access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use crate::attributes::{self, AttributeInfo, Code};
use crate::constants::{self, ConstantPool};
use crate::descriptors::{FieldDescriptor, MethodDescriptor};
use crate::errors::class_format_check::{FormatCause, FormatError};

/// [Fields](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=108)
#[derive(Clone, Debug)]
pub struct FieldInfo {
    pub access_flags: FieldAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    /// Decoded from the constant pool at load time.
    pub name: String,
    pub descriptor: String,
    pub attributes: Vec<AttributeInfo>,
}

impl FieldInfo {
    fn new(
        cursor: &mut Cursor<&[u8]>,
        constant_pool: &[ConstantPool],
    ) -> Result<FieldInfo, Box<dyn Error>> {
        let flags = cursor.read_u16::<BE>()?;
        let name_index = cursor.read_u16::<BE>()?;
        let descriptor_index = cursor.read_u16::<BE>()?;
        let name = resolved_utf8(constant_pool, name_index)?;
        let descriptor = resolved_utf8(constant_pool, descriptor_index)?;
        let mut attributes = Vec::new();
        attributes::read_attributes(constant_pool, &mut attributes, cursor)?;
        Ok(FieldInfo {
            access_flags: FieldAccessFlags::from_u16(flags),
            name_index,
            descriptor_index,
            name,
            descriptor,
            attributes,
        })
    }
}

/// [Methods](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=111)
#[derive(Clone, Debug)]
pub struct MethodInfo {
    pub access_flags: MethodAccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    /// Decoded from the constant pool at load time.
    pub name: String,
    pub descriptor: String,
    pub attributes: Vec<AttributeInfo>,
}

impl MethodInfo {
    fn new(
        cursor: &mut Cursor<&[u8]>,
        constant_pool: &[ConstantPool],
    ) -> Result<MethodInfo, Box<dyn Error>> {
        let flags = cursor.read_u16::<BE>()?;
        let name_index = cursor.read_u16::<BE>()?;
        let descriptor_index = cursor.read_u16::<BE>()?;
        let name = resolved_utf8(constant_pool, name_index)?;
        let descriptor = resolved_utf8(constant_pool, descriptor_index)?;
        let mut attributes = Vec::new();
        attributes::read_attributes(constant_pool, &mut attributes, cursor)?;
        Ok(MethodInfo {
            access_flags: MethodAccessFlags::from_u16(flags),
            name_index,
            descriptor_index,
            name,
            descriptor,
            attributes,
        })
    }

    /// The `Code` attribute, if this method carries bytecode.
    pub fn code(&self) -> Option<&Code> {
        self.attributes.iter().find_map(|attr| match attr {
            AttributeInfo::Code(code) => Some(code),
            _ => None,
        })
    }
}

fn resolved_utf8(pool: &[ConstantPool], index: u16) -> Result<String, Box<dyn Error>> {
    constants::utf8_at(pool, index).ok_or_else(|| {
        Box::new(FormatError::new(
            FormatCause::InvalidIndex(index),
            "expected a Utf8 constant",
        )) as Box<dyn Error>
    })
}

/// One parsed class blob. The constant pool has been through the
/// resolution pass, so class, string, name-and-type and method-type
/// entries carry their decoded text.
#[derive(Clone, Debug)]
pub struct ClassFile {
    /**
     * **magic**\
     *  The magic item supplies the magic number identifying the class
     *  file format; it has the value 0xCAFEBABE.
     */
    pub magic: u32,
    pub minor_version: u16,
    pub major_version: u16,
    /**
     * **constant_pool**\
     *  Indexed from 1 to constant_pool_count - 1; eight-byte constants
     *  occupy two slots.
     */
    pub constant_pool: Vec<ConstantPool>,
    pub access_flags: ClassAccessFlags,
    pub this_class: u16,
    /// Zero only for the root object class.
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<AttributeInfo>,
}

impl ClassFile {
    pub fn from_bytes(bytes: &[u8]) -> Result<ClassFile, Box<dyn Error>> {
        let mut cursor = Cursor::new(bytes);
        let magic = cursor.read_u32::<BE>()?;
        if magic != 0xCAFEBABE {
            return Err(Box::new(FormatError::new(
                FormatCause::IncorrectMagic(magic),
                "class blob does not start with 0xCAFEBABE",
            )));
        }
        let minor_version = cursor.read_u16::<BE>()?;
        let major_version = cursor.read_u16::<BE>()?;
        let constant_pool_count = cursor.read_u16::<BE>()?;
        let constant_pool = {
            let mut pool = Vec::with_capacity(constant_pool_count as usize);
            pool.push(ConstantPool::Unknown);
            constants::read_constant_pool(&mut pool, constant_pool_count, &mut cursor)?;
            constants::resolve_pool(&mut pool)?;
            pool
        };
        let access_flags = ClassAccessFlags::from_u16(cursor.read_u16::<BE>()?);
        let this_class = cursor.read_u16::<BE>()?;
        let super_class = cursor.read_u16::<BE>()?;
        let interfaces_count = cursor.read_u16::<BE>()?;
        let interfaces = {
            let mut interfaces = Vec::with_capacity(interfaces_count as usize);
            for _ in 0..interfaces_count {
                interfaces.push(cursor.read_u16::<BE>()?);
            }
            interfaces
        };
        let field_count = cursor.read_u16::<BE>()?;
        let fields = {
            let mut fields = Vec::with_capacity(field_count as usize);
            for _ in 0..field_count {
                fields.push(FieldInfo::new(&mut cursor, &constant_pool)?);
            }
            fields
        };
        let methods_count = cursor.read_u16::<BE>()?;
        let methods = {
            let mut methods = Vec::with_capacity(methods_count as usize);
            for _ in 0..methods_count {
                methods.push(MethodInfo::new(&mut cursor, &constant_pool)?);
            }
            methods
        };
        let attributes = {
            let mut attributes = Vec::new();
            attributes::read_attributes(&constant_pool, &mut attributes, &mut cursor)?;
            attributes
        };
        // The class file must not be truncated or have extra bytes at the end.
        if cursor.position() != bytes.len() as u64 {
            return Err(Box::new(FormatError::new(
                FormatCause::ExtraBytes,
                "class blob has leftover bytes",
            )));
        }
        let class = ClassFile {
            magic,
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        };
        check_format(&class)?;
        Ok(class)
    }

    /// Slash-form canonical name of the class this blob declares.
    pub fn class_name(&self) -> Result<&str, FormatError> {
        constants::class_name_at(&self.constant_pool, self.this_class).ok_or_else(|| {
            FormatError::new(
                FormatCause::InvalidIndex(self.this_class),
                "this_class was not a resolvable Class constant",
            )
        })
    }

    /// `None` only for the root object class.
    pub fn super_class_name(&self) -> Result<Option<&str>, FormatError> {
        if self.super_class == 0 {
            return Ok(None);
        }
        constants::class_name_at(&self.constant_pool, self.super_class)
            .map(Some)
            .ok_or_else(|| {
                FormatError::new(
                    FormatCause::InvalidIndex(self.super_class),
                    "super_class was not a resolvable Class constant",
                )
            })
    }

    pub fn interface_names(&self) -> Result<Vec<&str>, FormatError> {
        self.interfaces
            .iter()
            .map(|&index| {
                constants::class_name_at(&self.constant_pool, index).ok_or_else(|| {
                    FormatError::new(
                        FormatCause::InvalidIndex(index),
                        "interface was not a resolvable Class constant",
                    )
                })
            })
            .collect()
    }

    /// Class-level `SourceFile` attribute, used for diagnostics.
    pub fn source_file(&self) -> Option<&str> {
        self.attributes.iter().find_map(|attr| match attr {
            AttributeInfo::SourceFile(sf) => Some(sf.file_name.as_str()),
            _ => None,
        })
    }
}

/// [Format Checking](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=375)
fn check_format(class: &ClassFile) -> Result<(), FormatError> {
    class.class_name()?;
    class.super_class_name()?;
    class.interface_names()?;

    // All member references in the constant pool must point at resolvable
    // classes and name-and-type entries with well-formed descriptors.
    for (index, constant) in class.constant_pool.iter().enumerate() {
        let index = index as u16;
        match constant {
            ConstantPool::Fieldref(r) => {
                let nat = check_member_ref(class, r.class_index, r.name_and_type_index)?;
                if FieldDescriptor::parse(nat).is_err() {
                    return Err(FormatError::new(
                        FormatCause::InvalidDescriptor(nat.into()),
                        "Fieldref descriptor was not a field descriptor",
                    ));
                }
            }
            ConstantPool::Methodref(r) => {
                let nat = check_member_ref(class, r.class_index, r.name_and_type_index)?;
                if MethodDescriptor::parse(nat).is_err() {
                    return Err(FormatError::new(
                        FormatCause::InvalidDescriptor(nat.into()),
                        "Methodref descriptor was not a method descriptor",
                    ));
                }
            }
            ConstantPool::InterfaceMethodref(r) => {
                let nat = check_member_ref(class, r.class_index, r.name_and_type_index)?;
                if MethodDescriptor::parse(nat).is_err() {
                    return Err(FormatError::new(
                        FormatCause::InvalidDescriptor(nat.into()),
                        "InterfaceMethodref descriptor was not a method descriptor",
                    ));
                }
            }
            ConstantPool::Class(c) if c.name.is_none() => {
                return Err(FormatError::new(
                    FormatCause::UnresolvedEntry(index),
                    "Class constant was not resolved",
                ));
            }
            ConstantPool::String(s) if s.contents.is_none() => {
                return Err(FormatError::new(
                    FormatCause::UnresolvedEntry(index),
                    "String constant was not resolved",
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

fn check_member_ref<'c>(
    class: &'c ClassFile,
    class_index: u16,
    nat_index: u16,
) -> Result<&'c str, FormatError> {
    if constants::class_name_at(&class.constant_pool, class_index).is_none() {
        return Err(FormatError::new(
            FormatCause::InvalidIndex(class_index),
            "member reference class_index was not a Class constant",
        ));
    }
    let (_, descriptor) =
        constants::name_and_type_at(&class.constant_pool, nat_index).ok_or_else(|| {
            FormatError::new(
                FormatCause::InvalidIndex(nat_index),
                "member reference name_and_type_index was not a NameAndType constant",
            )
        })?;
    Ok(descriptor)
}
