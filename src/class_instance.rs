use std::collections::HashMap;
use std::sync::Arc;

use kloader::descriptors::FieldDescriptor;
use parking_lot::Mutex;

use crate::class_type::ClassType;
use crate::errors::{internal, VmResult};
use crate::exceptions;
use crate::monitor::Monitor;
use crate::ops;
use crate::value::Value;
use crate::vm::Vm;

/// One allocation of a class type. The super-instance chain mirrors the
/// superclass chain; each implemented interface gets a shim instance
/// used as the receiver for interface-default dispatch. Field slots
/// cover only the non-static fields declared at this level and fill in
/// lazily with descriptor defaults.
pub struct ClassInstance {
    class_type: Arc<ClassType>,
    super_instance: Option<Arc<ClassInstance>>,
    interface_instances: Vec<Arc<ClassInstance>>,
    fields: Mutex<HashMap<(String, String), Value>>,
    monitor: Monitor,
}

impl ClassInstance {
    /// Allocates an instance of `class_type` without running any
    /// constructor, recursing for the super chain and interface shims.
    pub(crate) fn for_type(
        vm: &Arc<Vm>,
        class_type: &Arc<ClassType>,
    ) -> VmResult<Arc<ClassInstance>> {
        let super_instance = match class_type.super_type(vm)? {
            Some(super_type) => Some(ClassInstance::for_type(vm, &super_type)?),
            None => None,
        };
        let mut interface_instances = Vec::with_capacity(class_type.interface_names().len());
        for interface in class_type.interface_names() {
            let interface_type = vm.resolve_class(interface)?;
            interface_instances.push(ClassInstance::for_type(vm, &interface_type)?);
        }
        Ok(Arc::new(ClassInstance {
            class_type: Arc::clone(class_type),
            super_instance,
            interface_instances,
            fields: Mutex::new(HashMap::new()),
            monitor: Monitor::new(),
        }))
    }

    pub fn class_type(&self) -> &Arc<ClassType> {
        &self.class_type
    }

    pub fn super_instance(&self) -> Option<&Arc<ClassInstance>> {
        self.super_instance.as_ref()
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    fn declares_instance_field(&self, name: &str, descriptor: &str) -> bool {
        self.class_type.find_field(name, descriptor, false).is_some()
    }

    /// Reads a field, resolving at the level of the class type that
    /// declares it and delegating to the super-instance otherwise. A
    /// missing slot memoizes its default so repeated reads observe the
    /// same identity.
    pub fn get_field(&self, name: &str, descriptor: &str) -> VmResult<Value> {
        if self.declares_instance_field(name, descriptor) {
            let default = Value::default_for(
                &FieldDescriptor::parse(descriptor)
                    .map_err(|e| internal(format!("bad field descriptor: {e}")))?,
            );
            let mut slots = self.fields.lock();
            return Ok(slots
                .entry((name.to_string(), descriptor.to_string()))
                .or_insert(default)
                .clone());
        }
        match &self.super_instance {
            Some(super_instance) => super_instance.get_field(name, descriptor),
            None => Err(internal(format!(
                "getfield of undeclared field {}.{}:{}",
                self.class_type.name(),
                name,
                descriptor
            ))),
        }
    }

    /// Writes at the first level of the chain that declares the field.
    /// No declaring level is a programming error, not a catchable
    /// condition.
    pub fn set_field(&self, name: &str, descriptor: &str, value: Value) -> VmResult<()> {
        if self.declares_instance_field(name, descriptor) {
            self.fields
                .lock()
                .insert((name.to_string(), descriptor.to_string()), value);
            return Ok(());
        }
        match &self.super_instance {
            Some(super_instance) => super_instance.set_field(name, descriptor, value),
            None => Err(internal(format!(
                "putfield of undeclared field {}.{}:{}",
                self.class_type.name(),
                name,
                descriptor
            ))),
        }
    }

    /// Atomic compare-and-set on an int slot, under the declaring
    /// level's slot lock. The low-level memory bridge builds on this.
    pub fn compare_and_swap_int(
        &self,
        name: &str,
        descriptor: &str,
        expected: i32,
        update: i32,
    ) -> VmResult<bool> {
        if self.declares_instance_field(name, descriptor) {
            let mut slots = self.fields.lock();
            let slot = slots
                .entry((name.to_string(), descriptor.to_string()))
                .or_insert(Value::Int(0));
            return match slot {
                Value::Int(current) if *current == expected => {
                    *slot = Value::Int(update);
                    Ok(true)
                }
                Value::Int(_) => Ok(false),
                _ => Err(internal("compareAndSwapInt on a non-int slot")),
            };
        }
        match &self.super_instance {
            Some(super_instance) => {
                super_instance.compare_and_swap_int(name, descriptor, expected, update)
            }
            None => Err(internal(format!(
                "compareAndSwapInt on undeclared field {name}:{descriptor}"
            ))),
        }
    }

    /// Copies every populated slot of `source` (all levels) into this
    /// instance, for the shallow `clone` bridge.
    pub fn copy_fields_from(&self, source: &ClassInstance) -> VmResult<()> {
        let snapshot: Vec<((String, String), Value)> = {
            let slots = source.fields.lock();
            slots
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        for ((name, descriptor), value) in snapshot {
            self.set_field(&name, &descriptor, value)?;
        }
        match (&self.super_instance, &source.super_instance) {
            (Some(mine), Some(theirs)) => mine.copy_fields_from(theirs),
            _ => Ok(()),
        }
    }

    /// Virtual selection: the first level of the receiver chain whose
    /// class type declares a concrete matching invokable. The class
    /// chain is searched before the interface shims, so an inherited
    /// body outranks a default implementation.
    pub fn resolve_virtual(&self, name: &str, descriptor: &str) -> Option<(Arc<ClassType>, usize)> {
        if let Some(index) = self.class_type.find_invokable_index(name, descriptor) {
            if self.class_type.invokables()[index].is_concrete() {
                return Some((Arc::clone(&self.class_type), index));
            }
        }
        // The class chain outranks interface defaults.
        if let Some(found) = self
            .super_instance
            .as_ref()
            .and_then(|super_instance| super_instance.resolve_virtual(name, descriptor))
        {
            return Some(found);
        }
        for shim in &self.interface_instances {
            if let Some(found) = shim.resolve_virtual(name, descriptor) {
                return Some(found);
            }
        }
        None
    }

    /// Special selection: the call site's declaring class picks the
    /// level; the search starts there instead of at the receiver's
    /// class. Constructors and `super.` calls come through here.
    pub fn resolve_special(
        self: &Arc<Self>,
        declaring: &str,
        name: &str,
        descriptor: &str,
    ) -> Option<(Arc<ClassType>, usize)> {
        let start = self.level_for(declaring);
        let start = match start {
            Some(level) => level,
            None => Arc::clone(self),
        };
        start.resolve_virtual(name, descriptor)
    }

    /// The level of the chain (or an interface shim) whose class type
    /// carries the given name.
    pub fn level_for(self: &Arc<Self>, class_name: &str) -> Option<Arc<ClassInstance>> {
        if self.class_type.name() == class_name {
            return Some(Arc::clone(self));
        }
        for shim in &self.interface_instances {
            if let Some(found) = shim.level_for(class_name) {
                return Some(found);
            }
        }
        self.super_instance
            .as_ref()
            .and_then(|super_instance| super_instance.level_for(class_name))
    }

    /// Virtual dispatch entry: the receiver's chain selects the
    /// implementation, the receiver itself binds to slot 0.
    pub fn call_virtual(
        self: &Arc<Self>,
        vm: &Arc<Vm>,
        name: &str,
        descriptor: &str,
        params: Vec<Value>,
    ) -> VmResult<Option<Value>> {
        self.class_type.ensure_static_init(vm)?;
        match self.resolve_virtual(name, descriptor) {
            Some((class_type, index)) => ops::run_invokable(
                vm,
                &class_type,
                &class_type.invokables()[index],
                Some(Value::Instance(Arc::clone(self))),
                params,
            ),
            None => Err(exceptions::throw(
                vm,
                "java/lang/AbstractMethodError",
                &format!("{}.{}{}", self.class_type.name(), name, descriptor),
            )),
        }
    }

    /// Special dispatch entry (constructors, `super.` calls).
    pub fn call_special(
        self: &Arc<Self>,
        vm: &Arc<Vm>,
        declaring: &str,
        name: &str,
        descriptor: &str,
        params: Vec<Value>,
    ) -> VmResult<Option<Value>> {
        self.class_type.ensure_static_init(vm)?;
        match self.resolve_special(declaring, name, descriptor) {
            Some((class_type, index)) => ops::run_invokable(
                vm,
                &class_type,
                &class_type.invokables()[index],
                Some(Value::Instance(Arc::clone(self))),
                params,
            ),
            None => Err(exceptions::throw(
                vm,
                "java/lang/AbstractMethodError",
                &format!("{declaring}.{name}{descriptor}"),
            )),
        }
    }
}

impl std::fmt::Debug for ClassInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClassInstance({})", self.class_type.name())
    }
}
