use std::sync::Arc;

use kloader::access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use kloader::constants::ConstantPool;

use crate::class_type::{ClassField, ClassInvokable, ClassType};
use crate::errors::VmResult;
use crate::value::Value;
use crate::vm::Vm;

use super::{java_io, java_lang};

fn public_native() -> MethodAccessFlags {
    MethodAccessFlags::PUBLIC | MethodAccessFlags::NATIVE
}

fn public_static_native() -> MethodAccessFlags {
    MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC | MethodAccessFlags::NATIVE
}

fn public_abstract() -> MethodAccessFlags {
    MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT
}

/// Builds a native-backed class type. Stub invokables carry no code;
/// dispatch finds their bodies in the native registry, so user
/// subclasses and `super` calls work through the ordinary walk.
fn stub(
    name: &str,
    super_name: Option<&str>,
    interfaces: &[&str],
    access_flags: ClassAccessFlags,
    fields: &[(&str, &str, FieldAccessFlags)],
    methods: &[(&str, &str, MethodAccessFlags)],
) -> Arc<ClassType> {
    Arc::new(ClassType::new(
        name.to_string(),
        super_name.map(str::to_string),
        interfaces.iter().map(|s| s.to_string()).collect(),
        access_flags,
        fields
            .iter()
            .map(|(name, descriptor, flags)| ClassField {
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                flags: *flags,
                attributes: Vec::new(),
            })
            .collect(),
        methods
            .iter()
            .map(|(name, descriptor, flags)| ClassInvokable {
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                flags: *flags,
                attributes: Vec::new(),
            })
            .collect(),
        Arc::new(vec![ConstantPool::Unknown]),
        None,
    ))
}

/// Throwable classes that add nothing over their super: constructors
/// and accessors all resolve up the chain to `java/lang/Throwable`.
const THROWABLES: &[(&str, &str)] = &[
    ("java/lang/Exception", "java/lang/Throwable"),
    ("java/lang/Error", "java/lang/Throwable"),
    ("java/lang/RuntimeException", "java/lang/Exception"),
    ("java/lang/InterruptedException", "java/lang/Exception"),
    ("java/lang/CloneNotSupportedException", "java/lang/Exception"),
    ("java/lang/ArithmeticException", "java/lang/RuntimeException"),
    ("java/lang/NullPointerException", "java/lang/RuntimeException"),
    ("java/lang/ClassCastException", "java/lang/RuntimeException"),
    ("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
    ("java/lang/NumberFormatException", "java/lang/IllegalArgumentException"),
    ("java/lang/IllegalMonitorStateException", "java/lang/RuntimeException"),
    ("java/lang/IllegalStateException", "java/lang/RuntimeException"),
    ("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException"),
    (
        "java/lang/ArrayIndexOutOfBoundsException",
        "java/lang/IndexOutOfBoundsException",
    ),
    (
        "java/lang/StringIndexOutOfBoundsException",
        "java/lang/IndexOutOfBoundsException",
    ),
    ("java/lang/NegativeArraySizeException", "java/lang/RuntimeException"),
    ("java/lang/ArrayStoreException", "java/lang/RuntimeException"),
    (
        "java/lang/UnsupportedOperationException",
        "java/lang/RuntimeException",
    ),
    ("java/lang/LinkageError", "java/lang/Error"),
    ("java/lang/NoClassDefFoundError", "java/lang/LinkageError"),
    ("java/lang/UnsatisfiedLinkError", "java/lang/LinkageError"),
    ("java/lang/ClassCircularityError", "java/lang/LinkageError"),
    ("java/lang/BootstrapMethodError", "java/lang/LinkageError"),
    (
        "java/lang/IncompatibleClassChangeError",
        "java/lang/LinkageError",
    ),
    (
        "java/lang/AbstractMethodError",
        "java/lang/IncompatibleClassChangeError",
    ),
    (
        "java/lang/NoSuchMethodError",
        "java/lang/IncompatibleClassChangeError",
    ),
    (
        "java/lang/NoSuchFieldError",
        "java/lang/IncompatibleClassChangeError",
    ),
    (
        "java/lang/InstantiationError",
        "java/lang/IncompatibleClassChangeError",
    ),
];

/// Registers the native-backed core library: the class types first,
/// then their host implementations, then the shared stream objects.
pub fn install(vm: &Arc<Vm>) -> VmResult<()> {
    let public = ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER;
    let interface =
        ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT;
    let field = FieldAccessFlags::PRIVATE;
    let static_field = FieldAccessFlags::PRIVATE | FieldAccessFlags::STATIC;

    vm.register_class(stub(
        "java/lang/Object",
        None,
        &[],
        public,
        &[],
        &[
            ("<init>", "()V", public_native()),
            ("getClass", "()Ljava/lang/Class;", public_native()),
            ("hashCode", "()I", public_native()),
            ("equals", "(Ljava/lang/Object;)Z", public_native()),
            ("toString", "()Ljava/lang/String;", public_native()),
            ("clone", "()Ljava/lang/Object;", public_native()),
            ("wait", "()V", public_native()),
            ("wait", "(J)V", public_native()),
            ("notify", "()V", public_native()),
            ("notifyAll", "()V", public_native()),
        ],
    ));

    vm.register_class(stub(
        "java/lang/Cloneable",
        Some("java/lang/Object"),
        &[],
        interface,
        &[],
        &[],
    ));
    vm.register_class(stub(
        "java/io/Serializable",
        Some("java/lang/Object"),
        &[],
        interface,
        &[],
        &[],
    ));
    vm.register_class(stub(
        "java/lang/Runnable",
        Some("java/lang/Object"),
        &[],
        interface,
        &[],
        &[("run", "()V", public_abstract())],
    ));

    vm.register_class(stub(
        "java/lang/Class",
        Some("java/lang/Object"),
        &[],
        public,
        &[("name", "Ljava/lang/String;", field)],
        &[
            ("getName", "()Ljava/lang/String;", public_native()),
            ("isPrimitive", "()Z", public_native()),
            ("isArray", "()Z", public_native()),
            ("isInterface", "()Z", public_native()),
            ("getComponentType", "()Ljava/lang/Class;", public_native()),
            (
                "forName",
                "(Ljava/lang/String;)Ljava/lang/Class;",
                public_static_native(),
            ),
        ],
    ));

    vm.register_class(stub(
        "java/lang/String",
        Some("java/lang/Object"),
        &["java/io/Serializable"],
        public,
        &[("value", "[C", field)],
        &[
            ("length", "()I", public_native()),
            ("charAt", "(I)C", public_native()),
            ("hashCode", "()I", public_native()),
            ("equals", "(Ljava/lang/Object;)Z", public_native()),
            ("intern", "()Ljava/lang/String;", public_native()),
            ("toString", "()Ljava/lang/String;", public_native()),
        ],
    ));

    vm.register_class(stub(
        "java/lang/StringBuilder",
        Some("java/lang/Object"),
        &[],
        public,
        &[("buf", "Ljava/lang/String;", field)],
        &[
            ("<init>", "()V", public_native()),
            (
                "append",
                "(Ljava/lang/String;)Ljava/lang/StringBuilder;",
                public_native(),
            ),
            (
                "append",
                "(Ljava/lang/Object;)Ljava/lang/StringBuilder;",
                public_native(),
            ),
            ("append", "(I)Ljava/lang/StringBuilder;", public_native()),
            ("append", "(J)Ljava/lang/StringBuilder;", public_native()),
            ("append", "(Z)Ljava/lang/StringBuilder;", public_native()),
            ("append", "(C)Ljava/lang/StringBuilder;", public_native()),
            ("append", "(F)Ljava/lang/StringBuilder;", public_native()),
            ("append", "(D)Ljava/lang/StringBuilder;", public_native()),
            ("toString", "()Ljava/lang/String;", public_native()),
        ],
    ));

    vm.register_class(stub(
        "java/lang/Throwable",
        Some("java/lang/Object"),
        &["java/io/Serializable"],
        public,
        &[
            ("detailMessage", "Ljava/lang/String;", field),
            ("backtrace", "Ljava/lang/String;", field),
        ],
        &[
            ("<init>", "()V", public_native()),
            ("<init>", "(Ljava/lang/String;)V", public_native()),
            ("getMessage", "()Ljava/lang/String;", public_native()),
            ("toString", "()Ljava/lang/String;", public_native()),
            ("printStackTrace", "()V", public_native()),
            (
                "fillInStackTrace",
                "()Ljava/lang/Throwable;",
                public_native(),
            ),
        ],
    ));

    for (name, super_name) in THROWABLES {
        vm.register_class(stub(name, Some(super_name), &[], public, &[], &[]));
    }

    vm.register_class(stub(
        "java/lang/Number",
        Some("java/lang/Object"),
        &[],
        public | ClassAccessFlags::ABSTRACT,
        &[],
        &[],
    ));
    vm.register_class(stub(
        "java/lang/Integer",
        Some("java/lang/Number"),
        &[],
        public,
        &[("value", "I", field)],
        &[
            ("<init>", "(I)V", public_native()),
            ("intValue", "()I", public_native()),
            ("parseInt", "(Ljava/lang/String;)I", public_static_native()),
            ("toString", "(I)Ljava/lang/String;", public_static_native()),
            ("valueOf", "(I)Ljava/lang/Integer;", public_static_native()),
        ],
    ));
    vm.register_class(stub(
        "java/lang/Float",
        Some("java/lang/Number"),
        &[],
        public,
        &[],
        &[
            ("floatToRawIntBits", "(F)I", public_static_native()),
            ("intBitsToFloat", "(I)F", public_static_native()),
        ],
    ));
    vm.register_class(stub(
        "java/lang/Double",
        Some("java/lang/Number"),
        &[],
        public,
        &[],
        &[
            ("doubleToRawLongBits", "(D)J", public_static_native()),
            ("longBitsToDouble", "(J)D", public_static_native()),
        ],
    ));

    vm.register_class(stub(
        "java/lang/Math",
        Some("java/lang/Object"),
        &[],
        public | ClassAccessFlags::FINAL,
        &[],
        &[
            ("min", "(II)I", public_static_native()),
            ("max", "(II)I", public_static_native()),
            ("abs", "(I)I", public_static_native()),
            ("sqrt", "(D)D", public_static_native()),
        ],
    ));

    vm.register_class(stub(
        "java/lang/System",
        Some("java/lang/Object"),
        &[],
        public | ClassAccessFlags::FINAL,
        &[
            ("out", "Ljava/io/PrintStream;", static_field),
            ("err", "Ljava/io/PrintStream;", static_field),
            ("props", "Ljava/util/Properties;", static_field),
        ],
        &[
            ("currentTimeMillis", "()J", public_static_native()),
            ("nanoTime", "()J", public_static_native()),
            (
                "arraycopy",
                "(Ljava/lang/Object;ILjava/lang/Object;II)V",
                public_static_native(),
            ),
            (
                "identityHashCode",
                "(Ljava/lang/Object;)I",
                public_static_native(),
            ),
            (
                "getProperty",
                "(Ljava/lang/String;)Ljava/lang/String;",
                public_static_native(),
            ),
            ("lineSeparator", "()Ljava/lang/String;", public_static_native()),
        ],
    ));

    vm.register_class(stub(
        "java/lang/Thread",
        Some("java/lang/Object"),
        &["java/lang/Runnable"],
        public,
        &[
            ("name", "Ljava/lang/String;", field),
            ("priority", "I", field),
            ("eetop", "J", field),
            ("target", "Ljava/lang/Runnable;", field),
        ],
        &[
            ("<init>", "()V", public_native()),
            ("<init>", "(Ljava/lang/Runnable;)V", public_native()),
            ("run", "()V", public_native()),
            ("start", "()V", public_native()),
            ("getName", "()Ljava/lang/String;", public_native()),
            ("isAlive", "()Z", public_native()),
            ("join", "()V", public_native()),
            (
                "currentThread",
                "()Ljava/lang/Thread;",
                public_static_native(),
            ),
            ("sleep", "(J)V", public_static_native()),
        ],
    ));

    vm.register_class(stub(
        "java/util/Properties",
        Some("java/lang/Object"),
        &[],
        public,
        &[],
        &[
            ("<init>", "()V", public_native()),
            (
                "setProperty",
                "(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/Object;",
                public_native(),
            ),
            (
                "getProperty",
                "(Ljava/lang/String;)Ljava/lang/String;",
                public_native(),
            ),
        ],
    ));

    vm.register_class(stub(
        "java/io/PrintStream",
        Some("java/lang/Object"),
        &[],
        public,
        &[("fd", "I", field)],
        &[
            ("println", "()V", public_native()),
            ("println", "(Ljava/lang/String;)V", public_native()),
            ("println", "(Ljava/lang/Object;)V", public_native()),
            ("println", "(I)V", public_native()),
            ("println", "(J)V", public_native()),
            ("println", "(Z)V", public_native()),
            ("println", "(C)V", public_native()),
            ("println", "(F)V", public_native()),
            ("println", "(D)V", public_native()),
            ("print", "(Ljava/lang/String;)V", public_native()),
            ("print", "(I)V", public_native()),
            ("print", "(C)V", public_native()),
        ],
    ));

    vm.register_class(stub(
        "sun/misc/Unsafe",
        Some("java/lang/Object"),
        &[],
        public | ClassAccessFlags::FINAL,
        &[("theUnsafe", "Lsun/misc/Unsafe;", static_field)],
        &[
            ("getUnsafe", "()Lsun/misc/Unsafe;", public_static_native()),
            (
                "objectFieldOffset",
                "(Ljava/lang/Class;Ljava/lang/String;)J",
                public_native(),
            ),
            (
                "compareAndSwapInt",
                "(Ljava/lang/Object;JII)Z",
                public_native(),
            ),
            ("getInt", "(Ljava/lang/Object;J)I", public_native()),
            ("putInt", "(Ljava/lang/Object;JI)V", public_native()),
        ],
    ));

    vm.register_class(stub(
        "sun/reflect/Reflection",
        Some("java/lang/Object"),
        &[],
        public,
        &[],
        &[(
            "getCallerClass",
            "()Ljava/lang/Class;",
            public_static_native(),
        )],
    ));

    java_lang::register(vm);
    java_io::register(vm);

    // The shared console streams: one PrintStream per file descriptor.
    let print_stream = vm.resolve_class("java/io/PrintStream")?;
    let system = vm.resolve_class("java/lang/System")?;
    for (name, fd) in [("out", 1), ("err", 2)] {
        let stream = print_stream.new_instance(vm)?;
        stream.set_field("fd", "I", Value::Int(fd))?;
        system.static_put(vm, name, "Ljava/io/PrintStream;", Value::Instance(stream))?;
    }
    Ok(())
}
