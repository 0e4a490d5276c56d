pub mod bootstrap;
mod java_io;
mod java_lang;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::errors::VmResult;
use crate::value::Value;
use crate::vm::Vm;

/// A host-provided method body. Instance callbacks receive the receiver
/// value; class callbacks do not.
pub type NativeFn =
    Arc<dyn Fn(&Arc<Vm>, Option<Value>, Vec<Value>) -> VmResult<Option<Value>> + Send + Sync>;

#[derive(Clone)]
pub enum NativeMethod {
    Instance(NativeFn),
    Class(NativeFn),
}

/// The sole bridge between bytecode and host behavior: a flat map from
/// `(class name, method name, descriptor)` to a callback. Dispatch
/// consults it at the declaring level before any bytecode body, so a
/// host can also override a method that has one.
pub struct NativeRegistry {
    map: RwLock<HashMap<(String, String, String), NativeMethod>>,
}

impl NativeRegistry {
    pub fn new() -> NativeRegistry {
        NativeRegistry {
            map: RwLock::new(HashMap::new()),
        }
    }

    /// Idempotent upsert keyed by the triple.
    pub fn register(&self, class_name: &str, name: &str, descriptor: &str, method: NativeMethod) {
        trace!(class_name, name, descriptor, "registering native");
        self.map.write().insert(
            (
                class_name.to_string(),
                name.to_string(),
                descriptor.to_string(),
            ),
            method,
        );
    }

    pub fn register_instance<F>(&self, class_name: &str, name: &str, descriptor: &str, callback: F)
    where
        F: Fn(&Arc<Vm>, Option<Value>, Vec<Value>) -> VmResult<Option<Value>>
            + Send
            + Sync
            + 'static,
    {
        self.register(
            class_name,
            name,
            descriptor,
            NativeMethod::Instance(Arc::new(callback)),
        );
    }

    pub fn register_class<F>(&self, class_name: &str, name: &str, descriptor: &str, callback: F)
    where
        F: Fn(&Arc<Vm>, Option<Value>, Vec<Value>) -> VmResult<Option<Value>>
            + Send
            + Sync
            + 'static,
    {
        self.register(
            class_name,
            name,
            descriptor,
            NativeMethod::Class(Arc::new(callback)),
        );
    }

    pub fn lookup(&self, class_name: &str, name: &str, descriptor: &str) -> Option<NativeMethod> {
        self.map
            .read()
            .get(&(
                class_name.to_string(),
                name.to_string(),
                descriptor.to_string(),
            ))
            .cloned()
    }
}

impl Default for NativeRegistry {
    fn default() -> NativeRegistry {
        NativeRegistry::new()
    }
}
