use std::collections::HashMap;
use std::sync::Arc;

use kloader::access_flags::{ClassAccessFlags, FieldAccessFlags, MethodAccessFlags};
use kloader::attributes::{AttributeInfo, Code};
use kloader::class_file::ClassFile;
use kloader::constants::ConstantPool;
use kloader::descriptors::FieldDescriptor;
use parking_lot::Mutex;
use tracing::debug;

use crate::class_instance::ClassInstance;
use crate::errors::{internal, VmError, VmResult};
use crate::exceptions;
use crate::monitor::Monitor;
use crate::ops;
use crate::value::Value;
use crate::vm::Vm;

/// One declared field, static or not.
#[derive(Clone, Debug)]
pub struct ClassField {
    pub name: String,
    pub descriptor: String,
    pub flags: FieldAccessFlags,
    pub attributes: Vec<AttributeInfo>,
}

impl ClassField {
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldAccessFlags::STATIC)
    }
}

/// One method entry. An invokable runs bytecode if it carries a `Code`
/// attribute, or a host callback if it is flagged native.
#[derive(Clone, Debug)]
pub struct ClassInvokable {
    pub name: String,
    pub descriptor: String,
    pub flags: MethodAccessFlags,
    pub attributes: Vec<AttributeInfo>,
}

impl ClassInvokable {
    pub fn code(&self) -> Option<&Code> {
        self.attributes.iter().find_map(|attr| match attr {
            AttributeInfo::Code(code) => Some(code),
            _ => None,
        })
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAccessFlags::STATIC)
    }

    pub fn is_native(&self) -> bool {
        self.flags.contains(MethodAccessFlags::NATIVE)
    }

    pub fn is_abstract(&self) -> bool {
        self.flags.contains(MethodAccessFlags::ABSTRACT)
    }

    pub fn is_synchronized(&self) -> bool {
        self.flags.contains(MethodAccessFlags::SYNCHRONIZED)
    }

    /// Concrete entries are selectable by dispatch; abstract ones are
    /// only declarations.
    pub fn is_concrete(&self) -> bool {
        !self.is_abstract()
    }
}

struct StaticInitGate {
    enabled: bool,
    called: bool,
}

/// Field offsets handed to low-level intrinsics: the ordinal position
/// among fields of the same staticness, with a bit recording which
/// table it indexes.
const STATIC_OFFSET_BIT: i64 = 1 << 31;

/// The runtime representation of one loaded class or interface. Unique
/// per canonical name within a registry and alive for the process.
pub struct ClassType {
    name: String,
    super_name: Option<String>,
    interface_names: Vec<String>,
    access_flags: ClassAccessFlags,
    fields: Vec<ClassField>,
    invokables: Vec<ClassInvokable>,
    static_slots: Mutex<HashMap<(String, String), Value>>,
    pool: Arc<Vec<ConstantPool>>,
    monitor: Monitor,
    static_init: Mutex<StaticInitGate>,
    source_file: Option<String>,
}

impl ClassType {
    pub(crate) fn new(
        name: String,
        super_name: Option<String>,
        interface_names: Vec<String>,
        access_flags: ClassAccessFlags,
        fields: Vec<ClassField>,
        invokables: Vec<ClassInvokable>,
        pool: Arc<Vec<ConstantPool>>,
        source_file: Option<String>,
    ) -> ClassType {
        ClassType {
            name,
            super_name,
            interface_names,
            access_flags,
            fields,
            invokables,
            static_slots: Mutex::new(HashMap::new()),
            pool,
            monitor: Monitor::new(),
            static_init: Mutex::new(StaticInitGate {
                enabled: true,
                called: false,
            }),
            source_file,
        }
    }

    /// Builds the runtime type from a parsed class blob. Super and
    /// interface names stay strings; the registry resolves them on
    /// first use.
    pub fn from_class_file(class: &ClassFile) -> Result<ClassType, VmError> {
        let name = class
            .class_name()
            .map_err(|e| VmError::MalformedClass {
                name: "<unknown>".into(),
                message: e.to_string(),
            })?
            .to_string();
        let wrap = |e: kloader::errors::class_format_check::FormatError| VmError::MalformedClass {
            name: name.clone(),
            message: e.to_string(),
        };
        let super_name = class.super_class_name().map_err(wrap)?.map(str::to_string);
        let interface_names = class
            .interface_names()
            .map_err(wrap)?
            .into_iter()
            .map(str::to_string)
            .collect();
        let fields = class
            .fields
            .iter()
            .map(|f| ClassField {
                name: f.name.clone(),
                descriptor: f.descriptor.clone(),
                flags: f.access_flags,
                attributes: f.attributes.clone(),
            })
            .collect();
        let invokables = class
            .methods
            .iter()
            .map(|m| ClassInvokable {
                name: m.name.clone(),
                descriptor: m.descriptor.clone(),
                flags: m.access_flags,
                attributes: m.attributes.clone(),
            })
            .collect();
        Ok(ClassType::new(
            name,
            super_name,
            interface_names,
            class.access_flags,
            fields,
            invokables,
            Arc::new(class.constant_pool.clone()),
            class.source_file().map(str::to_string),
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    pub fn interface_names(&self) -> &[String] {
        &self.interface_names
    }

    pub fn access_flags(&self) -> ClassAccessFlags {
        self.access_flags
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::ABSTRACT)
    }

    pub fn fields(&self) -> &[ClassField] {
        &self.fields
    }

    pub fn invokables(&self) -> &[ClassInvokable] {
        &self.invokables
    }

    pub fn pool(&self) -> &Arc<Vec<ConstantPool>> {
        &self.pool
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    /// File name for diagnostics, from the `SourceFile` attribute.
    pub fn source_file(&self) -> Option<&str> {
        self.source_file.as_deref()
    }

    pub fn super_type(self: &Arc<Self>, vm: &Arc<Vm>) -> VmResult<Option<Arc<ClassType>>> {
        match &self.super_name {
            Some(name) => Ok(Some(vm.resolve_class(name)?)),
            None => Ok(None),
        }
    }

    pub fn find_invokable(&self, name: &str, descriptor: &str) -> Option<&ClassInvokable> {
        self.invokables
            .iter()
            .find(|inv| inv.name == name && inv.descriptor == descriptor)
    }

    pub(crate) fn find_invokable_index(&self, name: &str, descriptor: &str) -> Option<usize> {
        self.invokables
            .iter()
            .position(|inv| inv.name == name && inv.descriptor == descriptor)
    }

    pub fn find_field(&self, name: &str, descriptor: &str, is_static: bool) -> Option<&ClassField> {
        self.fields
            .iter()
            .find(|f| f.is_static() == is_static && f.name == name && f.descriptor == descriptor)
    }

    /// True when a value of this type may stand where `target` is
    /// expected: the type itself, any implemented interface, or
    /// anything its super type casts to.
    pub fn can_cast_to(self: &Arc<Self>, vm: &Arc<Vm>, target: &str) -> VmResult<bool> {
        if self.name == target {
            return Ok(true);
        }
        for interface in &self.interface_names {
            if interface == target {
                return Ok(true);
            }
            let interface_type = vm.resolve_class(interface)?;
            if interface_type.can_cast_to(vm, target)? {
                return Ok(true);
            }
        }
        match self.super_type(vm)? {
            Some(super_type) => super_type.can_cast_to(vm, target),
            None => Ok(false),
        }
    }

    /// Turns the gate off (or back on). With the gate disabled a
    /// first-use check records nothing and `<clinit>` stays pending,
    /// which lets a host register classes before it can run user code.
    pub fn set_static_init_enabled(&self, enabled: bool) {
        self.static_init.lock().enabled = enabled;
    }

    pub fn static_init_called(&self) -> bool {
        self.static_init.lock().called
    }

    /// Runs `<clinit>()V` exactly once per type, supers first. The
    /// called-flag transition is a compare-and-set under the gate lock;
    /// the initializer itself runs while holding no monitor.
    pub fn ensure_static_init(self: &Arc<Self>, vm: &Arc<Vm>) -> VmResult<()> {
        if let Some(super_type) = self.super_type(vm)? {
            super_type.ensure_static_init(vm)?;
        }
        let run = {
            let mut gate = self.static_init.lock();
            if gate.enabled && !gate.called {
                gate.called = true;
                true
            } else {
                false
            }
        };
        if run {
            if let Some(index) = self.find_invokable_index("<clinit>", "()V") {
                debug!(class = %self.name, "running static initializer");
                ops::run_invokable(vm, self, &self.invokables[index], None, Vec::new())?;
            }
        }
        Ok(())
    }

    /// Static dispatch: own table first, then up the super chain. The
    /// registry-backed native table is consulted at the declaring level
    /// before any bytecode.
    pub fn call_class_method(
        self: &Arc<Self>,
        vm: &Arc<Vm>,
        name: &str,
        descriptor: &str,
        params: Vec<Value>,
    ) -> VmResult<Option<Value>> {
        self.ensure_static_init(vm)?;
        let mut current = Arc::clone(self);
        loop {
            if let Some(index) = current.find_invokable_index(name, descriptor) {
                let invokable = &current.invokables[index];
                if invokable.is_static() && invokable.is_concrete() {
                    return ops::run_invokable(vm, &current, invokable, None, params);
                }
            }
            current = match current.super_type(vm)? {
                Some(super_type) => super_type,
                None => {
                    return Err(exceptions::throw(
                        vm,
                        "java/lang/NoSuchMethodError",
                        &format!("{}.{}{}", self.name, name, descriptor),
                    ))
                }
            };
        }
    }

    fn declaring_level_for_static(
        self: &Arc<Self>,
        vm: &Arc<Vm>,
        name: &str,
        descriptor: &str,
    ) -> VmResult<Option<Arc<ClassType>>> {
        if self.find_field(name, descriptor, true).is_some() {
            return Ok(Some(Arc::clone(self)));
        }
        // Interface constants resolve through the superinterfaces before
        // the super chain.
        for interface in &self.interface_names {
            let interface_type = vm.resolve_class(interface)?;
            if let Some(found) =
                interface_type.declaring_level_for_static(vm, name, descriptor)?
            {
                return Ok(Some(found));
            }
        }
        match self.super_type(vm)? {
            Some(super_type) => super_type.declaring_level_for_static(vm, name, descriptor),
            None => Ok(None),
        }
    }

    /// The initial value of a static slot: the `ConstantValue` the
    /// compiler attached for a constant field, the descriptor default
    /// otherwise.
    fn static_initial_value(
        self: &Arc<Self>,
        vm: &Arc<Vm>,
        name: &str,
        descriptor: &str,
    ) -> VmResult<Value> {
        if let Some(field) = self.find_field(name, descriptor, true) {
            for attribute in &field.attributes {
                if let AttributeInfo::ConstantValue(cv) = attribute {
                    return constant_slot_value(vm, &self.pool, cv.constantvalue_index);
                }
            }
        }
        Ok(Value::default_for(
            &FieldDescriptor::parse(descriptor)
                .map_err(|e| internal(format!("bad field descriptor: {e}")))?,
        ))
    }

    /// Reads a static slot, resolving through the super chain to the
    /// declaring type. A first read memoizes the default so later reads
    /// observe the same value identity.
    pub fn static_get(
        self: &Arc<Self>,
        vm: &Arc<Vm>,
        name: &str,
        descriptor: &str,
    ) -> VmResult<Value> {
        self.ensure_static_init(vm)?;
        let declaring = self
            .declaring_level_for_static(vm, name, descriptor)?
            .ok_or_else(|| {
                internal(format!(
                    "getstatic of undeclared field {}.{}:{}",
                    self.name, name, descriptor
                ))
            })?;
        let initial = declaring.static_initial_value(vm, name, descriptor)?;
        let mut slots = declaring.static_slots.lock();
        Ok(slots
            .entry((name.to_string(), descriptor.to_string()))
            .or_insert(initial)
            .clone())
    }

    pub fn static_put(
        self: &Arc<Self>,
        vm: &Arc<Vm>,
        name: &str,
        descriptor: &str,
        value: Value,
    ) -> VmResult<()> {
        self.ensure_static_init(vm)?;
        let declaring = self
            .declaring_level_for_static(vm, name, descriptor)?
            .ok_or_else(|| {
                internal(format!(
                    "putstatic of undeclared field {}.{}:{}",
                    self.name, name, descriptor
                ))
            })?;
        declaring
            .static_slots
            .lock()
            .insert((name.to_string(), descriptor.to_string()), value);
        Ok(())
    }

    /// Allocates an instance of this type, including its super-instance
    /// chain and one shim per implemented interface.
    pub fn new_instance(self: &Arc<Self>, vm: &Arc<Vm>) -> VmResult<Arc<ClassInstance>> {
        self.ensure_static_init(vm)?;
        ClassInstance::for_type(vm, self)
    }

    /// Host-visible opaque offset of a field: position among the fields
    /// of the same staticness in declaration order, with a static bit.
    pub fn field_offset(&self, name: &str, descriptor: &str) -> Option<i64> {
        let field = self
            .fields
            .iter()
            .find(|f| f.name == name && f.descriptor == descriptor)?;
        let ordinal = self
            .fields
            .iter()
            .filter(|f| f.is_static() == field.is_static())
            .position(|f| f.name == name && f.descriptor == descriptor)?;
        Some(if field.is_static() {
            ordinal as i64 | STATIC_OFFSET_BIT
        } else {
            ordinal as i64
        })
    }

    pub fn field_by_offset(&self, offset: i64) -> Option<&ClassField> {
        let is_static = offset & STATIC_OFFSET_BIT != 0;
        let ordinal = (offset & !STATIC_OFFSET_BIT) as usize;
        self.fields
            .iter()
            .filter(|f| f.is_static() == is_static)
            .nth(ordinal)
    }
}

fn constant_slot_value(
    vm: &Arc<Vm>,
    pool: &Arc<Vec<ConstantPool>>,
    index: u16,
) -> VmResult<Value> {
    match pool.get(index as usize) {
        Some(ConstantPool::Integer(i)) => Ok(Value::Int(i.value())),
        Some(ConstantPool::Long(l)) => Ok(Value::Long(l.value())),
        Some(ConstantPool::Float(f)) => Ok(Value::Float(f.value())),
        Some(ConstantPool::Double(d)) => Ok(Value::Double(d.value())),
        Some(ConstantPool::String(s)) => {
            let contents = s
                .contents
                .as_deref()
                .ok_or_else(|| internal("ConstantValue string was not resolved"))?;
            crate::strings::intern(vm, contents)
        }
        _ => Err(internal(format!(
            "ConstantValue index {index} has an unusable tag"
        ))),
    }
}

impl std::fmt::Debug for ClassType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClassType({})", self.name)
    }
}
