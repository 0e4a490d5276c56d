use bitflags::bitflags;

bitflags! {
    /// [Class Access Flags](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=85)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ClassAccessFlags: u16 {
        /// Declared public; may be accessed from outside its package.
        const PUBLIC = 0x0001;
        /// Declared final; no subclasses allowed.
        const FINAL = 0x0010;
        /// Treat superclass methods specially when invoked by
        /// the invokespecial instruction.
        const SUPER = 0x0020;
        /// Is an interface, not a class.
        const INTERFACE = 0x0200;
        /// Declared abstract; must not be instantiated.
        const ABSTRACT = 0x0400;
        /// Declared synthetic; not present in the source code.
        const SYNTHETIC = 0x1000;
        /// Declared as an annotation interface.
        const ANNOTATION = 0x2000;
        /// Declared as an enum class.
        const ENUM = 0x4000;
        /// Is a module, not a class or interface.
        const MODULE = 0x8000;
    }
}

bitflags! {
    /// [Field Access Flags](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=93)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        /// Declared static.
        const STATIC = 0x0008;
        /// Declared final; never directly assigned to after object construction.
        const FINAL = 0x0010;
        /// Declared volatile; cannot be cached.
        const VOLATILE = 0x0040;
        /// Declared transient; not written or read by a persistent object manager.
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        /// Declared as an element of an enum class.
        const ENUM = 0x4000;
    }
}

bitflags! {
    /// [Method Access Flags](https://docs.oracle.com/javase/specs/jvms/se17/jvms17.pdf#page=96)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        /// Declared static.
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        /// Declared synchronized; invocation is wrapped by a monitor use.
        const SYNCHRONIZED = 0x0020;
        /// A bridge method, generated by the compiler.
        const BRIDGE = 0x0040;
        /// Declared with variable number of arguments.
        const VARARGS = 0x0080;
        /// Declared native; implemented in a language other than the Java
        /// programming language.
        const NATIVE = 0x0100;
        /// Declared abstract; no implementation is provided.
        const ABSTRACT = 0x0400;
        /// In a class file whose major version number is at least 46 and at
        /// most 60: declared strictfp.
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

impl ClassAccessFlags {
    pub fn from_u16(value: u16) -> Self {
        ClassAccessFlags::from_bits_truncate(value)
    }
}

impl FieldAccessFlags {
    pub fn from_u16(value: u16) -> Self {
        FieldAccessFlags::from_bits_truncate(value)
    }
}

impl MethodAccessFlags {
    pub fn from_u16(value: u16) -> Self {
        MethodAccessFlags::from_bits_truncate(value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flags_decode_from_wire_masks() {
        let flags = MethodAccessFlags::from_u16(0x0009);
        assert!(flags.contains(MethodAccessFlags::PUBLIC));
        assert!(flags.contains(MethodAccessFlags::STATIC));
        assert!(!flags.contains(MethodAccessFlags::NATIVE));
    }

    #[test]
    fn unknown_bits_are_dropped() {
        let flags = ClassAccessFlags::from_u16(0x0021 | 0x0002);
        assert_eq!(
            flags,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER
        );
    }
}
