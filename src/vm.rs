use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;

use kloader::class_file::ClassFile;
use kloader::descriptors::FieldDescriptor;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::class_instance::ClassInstance;
use crate::class_type::ClassType;
use crate::errors::{Flow, VmError, VmResult};
use crate::exceptions::{self, ThrownRecord};
use crate::natives::{self, NativeRegistry};
use crate::reflect::ReflectionType;
use crate::source::ClassSource;
use crate::strings;
use crate::threads::ThreadAccessor;
use crate::value::{ArrayObject, Value};

/// One isolated virtual machine: the class registry, class sources,
/// string-intern table, native registry, thread list, thrown record and
/// system properties, each behind its own lock. Hosts (and tests) may
/// run several side by side.
pub struct Vm {
    registry: Mutex<HashMap<String, Arc<ClassType>>>,
    loading: Mutex<HashSet<(ThreadId, String)>>,
    sources: Mutex<Vec<Box<dyn ClassSource>>>,
    natives: NativeRegistry,
    interns: Mutex<HashMap<String, Arc<ClassInstance>>>,
    class_objects: Mutex<HashMap<String, Arc<ClassInstance>>>,
    reflection_types: Mutex<HashMap<String, Arc<ReflectionType>>>,
    threads: Mutex<Vec<Arc<ThreadAccessor>>>,
    next_thread_handle: AtomicU64,
    thrown: Mutex<Option<ThrownRecord>>,
    properties: Mutex<HashMap<String, String>>,
    main_thread: Mutex<Option<Arc<ClassInstance>>>,
}

impl Vm {
    pub fn new() -> Arc<Vm> {
        Arc::new(Vm {
            registry: Mutex::new(HashMap::new()),
            loading: Mutex::new(HashSet::new()),
            sources: Mutex::new(Vec::new()),
            natives: NativeRegistry::new(),
            interns: Mutex::new(HashMap::new()),
            class_objects: Mutex::new(HashMap::new()),
            reflection_types: Mutex::new(HashMap::new()),
            threads: Mutex::new(Vec::new()),
            next_thread_handle: AtomicU64::new(1),
            thrown: Mutex::new(None),
            properties: Mutex::new(HashMap::new()),
            main_thread: Mutex::new(None),
        })
    }

    /// Installs the native-backed core library, registers the calling
    /// thread as the managed main thread, and mirrors the host's
    /// property map into the managed properties object through its
    /// ordinary setter.
    pub fn bootstrap(self: &Arc<Self>, properties: HashMap<String, String>) -> VmResult<()> {
        info!("bootstrapping core class library");
        natives::bootstrap::install(self)?;

        let accessor = self.register_thread();
        accessor.bind_current();
        let thread_type = self.resolve_class("java/lang/Thread")?;
        let main_thread = thread_type.new_instance(self)?;
        main_thread.set_field("name", "Ljava/lang/String;", strings::new_string(self, "main")?)?;
        main_thread.set_field("priority", "I", Value::Int(5))?;
        main_thread.set_field("eetop", "J", Value::Long(accessor.handle() as i64))?;
        accessor.set_thread_instance(&main_thread);
        *self.main_thread.lock() = Some(main_thread);

        let properties_type = self.resolve_class("java/util/Properties")?;
        let managed_properties = properties_type.new_instance(self)?;
        for (key, value) in properties {
            managed_properties.call_virtual(
                self,
                "setProperty",
                "(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/Object;",
                vec![
                    strings::new_string(self, &key)?,
                    strings::new_string(self, &value)?,
                ],
            )?;
        }
        let system = self.resolve_class("java/lang/System")?;
        system.static_put(
            self,
            "props",
            "Ljava/util/Properties;",
            Value::Instance(managed_properties),
        )?;
        Ok(())
    }

    pub fn add_source(&self, source: Box<dyn ClassSource>) {
        self.sources.lock().push(source);
    }

    /// The entry-point class nominated by the first source that has
    /// one.
    pub fn entry_point(&self) -> Option<String> {
        self.sources.lock().iter().find_map(|s| s.entry_point())
    }

    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    /// Registers a pre-built class type, keeping the first registration
    /// when racing.
    pub fn register_class(&self, class_type: Arc<ClassType>) -> Arc<ClassType> {
        let mut registry = self.registry.lock();
        Arc::clone(
            registry
                .entry(class_type.name().to_string())
                .or_insert(class_type),
        )
    }

    /// Parses and registers one class blob handed over by the host.
    pub fn define_class(self: &Arc<Self>, bytes: &[u8]) -> Result<Arc<ClassType>, VmError> {
        let class_file = ClassFile::from_bytes(bytes).map_err(|e| VmError::MalformedClass {
            name: "<blob>".into(),
            message: e.to_string(),
        })?;
        let class_type = Arc::new(ClassType::from_class_file(&class_file)?);
        Ok(self.register_class(class_type))
    }

    /// The registry lookup: cached type, or load from the first source
    /// that yields bytes for the name, linking super and interface
    /// types first.
    pub fn locate_class(self: &Arc<Self>, name: &str) -> Result<Arc<ClassType>, VmError> {
        if let Some(existing) = self.registry.lock().get(name) {
            return Ok(Arc::clone(existing));
        }

        let bytes = {
            let sources = self.sources.lock();
            sources.iter().find_map(|source| source.class_bytes(name))
        }
        .ok_or_else(|| VmError::ClassNotFound(name.to_string()))?;

        let guard_key = (std::thread::current().id(), name.to_string());
        if !self.loading.lock().insert(guard_key.clone()) {
            return Err(VmError::CircularClass(name.to_string()));
        }
        let result = self.load_from_bytes(name, &bytes);
        self.loading.lock().remove(&guard_key);
        result
    }

    fn load_from_bytes(
        self: &Arc<Self>,
        name: &str,
        bytes: &[u8],
    ) -> Result<Arc<ClassType>, VmError> {
        let class_file = ClassFile::from_bytes(bytes).map_err(|e| VmError::MalformedClass {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        let class_type = Arc::new(ClassType::from_class_file(&class_file)?);
        if class_type.name() != name {
            return Err(VmError::MalformedClass {
                name: name.to_string(),
                message: format!("blob declares {}", class_type.name()),
            });
        }
        // Link the super chain and interfaces before the type becomes
        // visible.
        if let Some(super_name) = class_type.super_name() {
            self.locate_class(super_name)?;
        }
        for interface in class_type.interface_names() {
            self.locate_class(interface)?;
        }
        debug!(class = name, "loaded class");
        Ok(self.register_class(class_type))
    }

    /// `locate_class`, with a miss surfaced to running code as
    /// `java/lang/NoClassDefFoundError`.
    pub fn resolve_class(self: &Arc<Self>, name: &str) -> VmResult<Arc<ClassType>> {
        match self.locate_class(name) {
            Ok(class_type) => Ok(class_type),
            Err(VmError::ClassNotFound(missing)) => {
                // Without the bootstrap set there is no throwable to
                // build, so fall back to the raw fault.
                if self
                    .registry
                    .lock()
                    .get("java/lang/NoClassDefFoundError")
                    .is_none()
                {
                    return Err(Flow::Fault(VmError::ClassNotFound(missing)));
                }
                Err(exceptions::throw(
                    self,
                    "java/lang/NoClassDefFoundError",
                    &missing.replace('/', "."),
                ))
            }
            Err(other) => Err(other.into()),
        }
    }

    // String interning.

    pub(crate) fn cached_intern(&self, text: &str) -> Option<Arc<ClassInstance>> {
        self.interns.lock().get(text).cloned()
    }

    pub(crate) fn intern_string(
        &self,
        text: String,
        instance: Arc<ClassInstance>,
    ) -> Arc<ClassInstance> {
        let mut interns = self.interns.lock();
        Arc::clone(interns.entry(text).or_insert(instance))
    }

    // Reflection interning.

    pub(crate) fn cached_reflection_type(&self, canonical: &str) -> Option<Arc<ReflectionType>> {
        self.reflection_types.lock().get(canonical).cloned()
    }

    pub(crate) fn intern_reflection_type(
        &self,
        canonical: String,
        reflection_type: Arc<ReflectionType>,
    ) -> Arc<ReflectionType> {
        let mut types = self.reflection_types.lock();
        Arc::clone(types.entry(canonical).or_insert(reflection_type))
    }

    pub(crate) fn cached_class_object(&self, canonical: &str) -> Option<Arc<ClassInstance>> {
        self.class_objects.lock().get(canonical).cloned()
    }

    pub(crate) fn intern_class_object(
        &self,
        canonical: String,
        instance: Arc<ClassInstance>,
    ) -> Arc<ClassInstance> {
        let mut objects = self.class_objects.lock();
        Arc::clone(objects.entry(canonical).or_insert(instance))
    }

    // Thread accessors.

    pub fn register_thread(&self) -> Arc<ThreadAccessor> {
        let handle = self.next_thread_handle.fetch_add(1, Ordering::SeqCst);
        let accessor = Arc::new(ThreadAccessor::new(handle));
        self.threads.lock().push(Arc::clone(&accessor));
        accessor
    }

    pub fn unregister_thread(&self, handle: u64) {
        self.threads.lock().retain(|t| t.handle() != handle);
    }

    pub fn current_thread(&self) -> Option<Arc<ThreadAccessor>> {
        self.threads
            .lock()
            .iter()
            .find(|t| t.is_current())
            .cloned()
    }

    pub fn thread_by_handle(&self, handle: u64) -> Option<Arc<ThreadAccessor>> {
        self.threads
            .lock()
            .iter()
            .find(|t| t.handle() == handle)
            .cloned()
    }

    pub fn thread_for_instance(&self, instance: &Arc<ClassInstance>) -> Option<Arc<ThreadAccessor>> {
        self.threads
            .lock()
            .iter()
            .find(|t| {
                t.thread_instance()
                    .map(|i| Arc::ptr_eq(&i, instance))
                    .unwrap_or(false)
            })
            .cloned()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    /// The managed instance wrapping the thread that ran `bootstrap`.
    pub fn main_thread(&self) -> Option<Arc<ClassInstance>> {
        self.main_thread.lock().clone()
    }

    // The thrown record: one unacknowledged slot for the process.

    pub fn pending_thrown(&self) -> Option<Arc<ClassInstance>> {
        self.thrown.lock().as_ref().map(|r| Arc::clone(&r.throwable))
    }

    /// First registration wins; a second unhandled throw before the
    /// host acknowledges is dropped.
    pub(crate) fn register_thrown(&self, throwable: &Arc<ClassInstance>) {
        let mut slot = self.thrown.lock();
        match slot.as_ref() {
            Some(existing) if Arc::ptr_eq(&existing.throwable, throwable) => {}
            Some(_) => {
                warn!(
                    class = throwable.class_type().name(),
                    "dropping thrown record while one is unacknowledged"
                );
            }
            None => {
                *slot = Some(ThrownRecord {
                    throwable: Arc::clone(throwable),
                    thread_handle: self.current_thread().map(|t| t.handle()).unwrap_or(0),
                });
            }
        }
    }

    /// A matched handler clears the pending record.
    pub(crate) fn clear_thrown(&self) {
        *self.thrown.lock() = None;
    }

    /// Host acknowledgement: takes the record and frees the slot.
    pub fn take_thrown(&self) -> Option<ThrownRecord> {
        self.thrown.lock().take()
    }

    // System properties.

    pub fn get_property(&self, key: &str) -> Option<String> {
        self.properties.lock().get(key).cloned()
    }

    pub fn set_property(&self, key: String, value: String) -> Option<String> {
        self.properties.lock().insert(key, value)
    }

    /// Convenience for hosts: builds the argument array and invokes
    /// `main([Ljava/lang/String;)V` on the named class.
    pub fn run_main(self: &Arc<Self>, class_name: &str, args: &[String]) -> VmResult<()> {
        let class_type = self.resolve_class(class_name)?;
        let mut elements = Vec::with_capacity(args.len());
        for argument in args {
            elements.push(strings::new_string(self, argument)?);
        }
        let array = ArrayObject::from_values(
            FieldDescriptor::Object("java/lang/String".to_string()),
            elements,
        );
        class_type.call_class_method(
            self,
            "main",
            "([Ljava/lang/String;)V",
            vec![Value::Array(Arc::new(array))],
        )?;
        Ok(())
    }
}
