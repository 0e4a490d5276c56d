//! In-memory class-file assembly for the execution tests. Pool entries
//! are appended on demand; indices are handed back so code bytes can
//! reference them.
#![allow(dead_code)]

pub struct MethodHandlers {
    pub entries: Vec<(u16, u16, u16, u16)>,
}

impl MethodHandlers {
    pub fn none() -> MethodHandlers {
        MethodHandlers {
            entries: Vec::new(),
        }
    }

    pub fn catching(entries: &[(u16, u16, u16, u16)]) -> MethodHandlers {
        MethodHandlers {
            entries: entries.to_vec(),
        }
    }
}

struct PoolEntry {
    bytes: Vec<u8>,
    slots: u16,
}

pub struct ClassBytes {
    entries: Vec<PoolEntry>,
    next_index: u16,
    access_flags: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<Vec<u8>>,
    methods: Vec<Vec<u8>>,
}

impl ClassBytes {
    pub fn new(class_name: &str, super_name: &str) -> ClassBytes {
        let mut b = ClassBytes {
            entries: Vec::new(),
            next_index: 1,
            access_flags: 0x0021, // public super
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
        };
        b.this_class = b.class(class_name);
        b.super_class = b.class(super_name);
        b
    }

    fn push_entry(&mut self, bytes: Vec<u8>, slots: u16) -> u16 {
        let index = self.next_index;
        self.entries.push(PoolEntry { bytes, slots });
        self.next_index += slots;
        index
    }

    pub fn utf8(&mut self, text: &str) -> u16 {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&(text.len() as u16).to_be_bytes());
        bytes.extend_from_slice(text.as_bytes());
        self.push_entry(bytes, 1)
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let name_index = self.utf8(name);
        let mut bytes = vec![7u8];
        bytes.extend_from_slice(&name_index.to_be_bytes());
        self.push_entry(bytes, 1)
    }

    pub fn string(&mut self, text: &str) -> u16 {
        let contents_index = self.utf8(text);
        let mut bytes = vec![8u8];
        bytes.extend_from_slice(&contents_index.to_be_bytes());
        self.push_entry(bytes, 1)
    }

    pub fn int_const(&mut self, value: i32) -> u16 {
        let mut bytes = vec![3u8];
        bytes.extend_from_slice(&(value as u32).to_be_bytes());
        self.push_entry(bytes, 1)
    }

    pub fn float_const(&mut self, value: f32) -> u16 {
        let mut bytes = vec![4u8];
        bytes.extend_from_slice(&value.to_bits().to_be_bytes());
        self.push_entry(bytes, 1)
    }

    pub fn long_const(&mut self, value: i64) -> u16 {
        let mut bytes = vec![5u8];
        bytes.extend_from_slice(&(value as u64).to_be_bytes());
        self.push_entry(bytes, 2)
    }

    pub fn double_const(&mut self, value: f64) -> u16 {
        let mut bytes = vec![6u8];
        bytes.extend_from_slice(&value.to_bits().to_be_bytes());
        self.push_entry(bytes, 2)
    }

    fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let mut bytes = vec![12u8];
        bytes.extend_from_slice(&name_index.to_be_bytes());
        bytes.extend_from_slice(&descriptor_index.to_be_bytes());
        self.push_entry(bytes, 1)
    }

    fn member_ref(&mut self, tag: u8, class: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(class);
        let nat_index = self.name_and_type(name, descriptor);
        let mut bytes = vec![tag];
        bytes.extend_from_slice(&class_index.to_be_bytes());
        bytes.extend_from_slice(&nat_index.to_be_bytes());
        self.push_entry(bytes, 1)
    }

    pub fn fieldref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(9, class, name, descriptor)
    }

    pub fn methodref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(10, class, name, descriptor)
    }

    pub fn interface_methodref(&mut self, class: &str, name: &str, descriptor: &str) -> u16 {
        self.member_ref(11, class, name, descriptor)
    }

    pub fn set_flags(&mut self, flags: u16) {
        self.access_flags = flags;
    }

    pub fn add_interface(&mut self, name: &str) {
        let index = self.class(name);
        self.interfaces.push(index);
    }

    pub fn add_field(&mut self, flags: u16, name: &str, descriptor: &str) {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&flags.to_be_bytes());
        bytes.extend_from_slice(&name_index.to_be_bytes());
        bytes.extend_from_slice(&descriptor_index.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());
        self.fields.push(bytes);
    }

    /// A method without a body (abstract or native, per flags).
    pub fn add_bare_method(&mut self, flags: u16, name: &str, descriptor: &str) {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&flags.to_be_bytes());
        bytes.extend_from_slice(&name_index.to_be_bytes());
        bytes.extend_from_slice(&descriptor_index.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());
        self.methods.push(bytes);
    }

    pub fn add_method(
        &mut self,
        flags: u16,
        name: &str,
        descriptor: &str,
        max_stack: u16,
        max_locals: u16,
        code: &[u8],
        handlers: MethodHandlers,
    ) {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let code_name_index = self.utf8("Code");
        let mut body = Vec::new();
        body.extend_from_slice(&max_stack.to_be_bytes());
        body.extend_from_slice(&max_locals.to_be_bytes());
        body.extend_from_slice(&(code.len() as u32).to_be_bytes());
        body.extend_from_slice(code);
        body.extend_from_slice(&(handlers.entries.len() as u16).to_be_bytes());
        for (start_pc, end_pc, handler_pc, catch_type) in &handlers.entries {
            body.extend_from_slice(&start_pc.to_be_bytes());
            body.extend_from_slice(&end_pc.to_be_bytes());
            body.extend_from_slice(&handler_pc.to_be_bytes());
            body.extend_from_slice(&catch_type.to_be_bytes());
        }
        body.extend_from_slice(&0u16.to_be_bytes()); // nested attributes
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&flags.to_be_bytes());
        bytes.extend_from_slice(&name_index.to_be_bytes());
        bytes.extend_from_slice(&descriptor_index.to_be_bytes());
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.extend_from_slice(&code_name_index.to_be_bytes());
        bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&body);
        self.methods.push(bytes);
    }

    pub fn build(self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&52u16.to_be_bytes());
        bytes.extend_from_slice(&self.next_index.to_be_bytes());
        for entry in &self.entries {
            bytes.extend_from_slice(&entry.bytes);
        }
        bytes.extend_from_slice(&self.access_flags.to_be_bytes());
        bytes.extend_from_slice(&self.this_class.to_be_bytes());
        bytes.extend_from_slice(&self.super_class.to_be_bytes());
        bytes.extend_from_slice(&(self.interfaces.len() as u16).to_be_bytes());
        for interface in &self.interfaces {
            bytes.extend_from_slice(&interface.to_be_bytes());
        }
        bytes.extend_from_slice(&(self.fields.len() as u16).to_be_bytes());
        for field in &self.fields {
            bytes.extend_from_slice(field);
        }
        bytes.extend_from_slice(&(self.methods.len() as u16).to_be_bytes());
        for method in &self.methods {
            bytes.extend_from_slice(method);
        }
        bytes.extend_from_slice(&0u16.to_be_bytes()); // class attributes
        bytes
    }
}

// Opcode bytes the tests assemble by hand.
pub mod op {
    pub const ACONST_NULL: u8 = 0x01;
    pub const ICONST_0: u8 = 0x03;
    pub const ICONST_1: u8 = 0x04;
    pub const ICONST_2: u8 = 0x05;
    pub const ICONST_3: u8 = 0x06;
    pub const ICONST_5: u8 = 0x08;
    pub const LCONST_1: u8 = 0x0a;
    pub const FCONST_0: u8 = 0x0b;
    pub const BIPUSH: u8 = 0x10;
    pub const SIPUSH: u8 = 0x11;
    pub const LDC: u8 = 0x12;
    pub const LDC2_W: u8 = 0x14;
    pub const ILOAD_0: u8 = 0x1a;
    pub const ILOAD_1: u8 = 0x1b;
    pub const ALOAD_0: u8 = 0x2a;
    pub const IALOAD: u8 = 0x2e;
    pub const AALOAD: u8 = 0x32;
    pub const ISTORE_0: u8 = 0x3b;
    pub const ISTORE_1: u8 = 0x3c;
    pub const ASTORE_0: u8 = 0x4b;
    pub const IASTORE: u8 = 0x4f;
    pub const POP: u8 = 0x57;
    pub const DUP: u8 = 0x59;
    pub const DUP_X1: u8 = 0x5a;
    pub const DUP2: u8 = 0x5c;
    pub const DUP2_X2: u8 = 0x5e;
    pub const IADD: u8 = 0x60;
    pub const LADD: u8 = 0x61;
    pub const IDIV: u8 = 0x6c;
    pub const ISHL: u8 = 0x78;
    pub const LSHL: u8 = 0x79;
    pub const IINC: u8 = 0x84;
    pub const FCMPL: u8 = 0x95;
    pub const FCMPG: u8 = 0x96;
    pub const IF_ICMPGT: u8 = 0xa3;
    pub const GOTO: u8 = 0xa7;
    pub const LOOKUPSWITCH: u8 = 0xab;
    pub const IRETURN: u8 = 0xac;
    pub const LRETURN: u8 = 0xad;
    pub const ARETURN: u8 = 0xb0;
    pub const RETURN: u8 = 0xb1;
    pub const GETSTATIC: u8 = 0xb2;
    pub const PUTSTATIC: u8 = 0xb3;
    pub const GETFIELD: u8 = 0xb4;
    pub const PUTFIELD: u8 = 0xb5;
    pub const INVOKEVIRTUAL: u8 = 0xb6;
    pub const INVOKESPECIAL: u8 = 0xb7;
    pub const INVOKESTATIC: u8 = 0xb8;
    pub const NEW: u8 = 0xbb;
    pub const NEWARRAY: u8 = 0xbc;
    pub const ARRAYLENGTH: u8 = 0xbe;
    pub const ATHROW: u8 = 0xbf;
    pub const CHECKCAST: u8 = 0xc0;
    pub const INSTANCEOF: u8 = 0xc1;
    pub const MULTIANEWARRAY: u8 = 0xc5;
}

/// Splits a u16 pool index into operand bytes.
pub fn idx(index: u16) -> [u8; 2] {
    index.to_be_bytes()
}

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_SYNCHRONIZED: u16 = 0x0020;
