use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{JoinHandle, ThreadId};

use parking_lot::Mutex;
use tracing::debug;

use crate::class_instance::ClassInstance;
use crate::class_type::ClassType;
use crate::errors::VmResult;
use crate::value::Value;
use crate::vm::Vm;

/// One entry of a thread's call stack: enough to print a stack trace
/// and to answer caller-sensitive reflection queries.
#[derive(Clone)]
pub struct CallRecord {
    pub class_type: Arc<ClassType>,
    pub name: String,
    pub descriptor: String,
    pub code_offset: usize,
    pub caller_sensitive: bool,
}

/// Per managed thread bookkeeping: the native thread it wraps, a weak
/// edge to the managed `java/lang/Thread` instance (observation only),
/// the call stack, and the caller-sensitive depth for nested guards.
pub struct ThreadAccessor {
    handle: u64,
    native_id: Mutex<Option<ThreadId>>,
    thread_var: Mutex<Weak<ClassInstance>>,
    call_stack: Mutex<Vec<CallRecord>>,
    caller_sensitive_depth: AtomicU32,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadAccessor {
    pub(crate) fn new(handle: u64) -> ThreadAccessor {
        ThreadAccessor {
            handle,
            native_id: Mutex::new(None),
            thread_var: Mutex::new(Weak::new()),
            call_stack: Mutex::new(Vec::new()),
            caller_sensitive_depth: AtomicU32::new(0),
            join_handle: Mutex::new(None),
        }
    }

    /// The opaque handle bytecode sees in `Thread.eetop`.
    pub fn handle(&self) -> u64 {
        self.handle
    }

    /// Claims the calling OS thread as this accessor's native thread.
    pub(crate) fn bind_current(&self) {
        *self.native_id.lock() = Some(std::thread::current().id());
    }

    pub(crate) fn is_current(&self) -> bool {
        *self.native_id.lock() == Some(std::thread::current().id())
    }

    pub fn set_thread_instance(&self, instance: &Arc<ClassInstance>) {
        *self.thread_var.lock() = Arc::downgrade(instance);
    }

    pub fn thread_instance(&self) -> Option<Arc<ClassInstance>> {
        self.thread_var.lock().upgrade()
    }

    pub fn push_call(&self, record: CallRecord) {
        self.call_stack.lock().push(record);
    }

    pub fn pop_call(&self) {
        self.call_stack.lock().pop();
    }

    /// Keeps the top record's offset current so an unwinding throw can
    /// report where each frame stood.
    pub fn update_code_offset(&self, offset: usize) {
        if let Some(top) = self.call_stack.lock().last_mut() {
            top.code_offset = offset;
        }
    }

    pub fn call_stack(&self) -> Vec<CallRecord> {
        self.call_stack.lock().clone()
    }

    pub fn enter_caller_sensitive(&self) {
        self.caller_sensitive_depth.fetch_add(1, Ordering::SeqCst);
    }

    pub fn exit_caller_sensitive(&self) {
        self.caller_sensitive_depth.fetch_sub(1, Ordering::SeqCst);
    }

    /// Whether the running native was reached from user code rather
    /// than from another caller-sensitive bridge.
    pub fn in_caller_sensitive(&self) -> bool {
        self.caller_sensitive_depth.load(Ordering::SeqCst) > 0
    }

    pub(crate) fn set_join_handle(&self, handle: JoinHandle<()>) {
        *self.join_handle.lock() = Some(handle);
    }

    pub(crate) fn take_join_handle(&self) -> Option<JoinHandle<()>> {
        self.join_handle.lock().take()
    }
}

impl std::fmt::Debug for ThreadAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ThreadAccessor({})", self.handle)
    }
}

/// Registers one call-stack record for the duration of a method
/// execution.
pub struct ExecutionScope {
    accessor: Option<Arc<ThreadAccessor>>,
}

impl ExecutionScope {
    pub fn enter(
        vm: &Arc<Vm>,
        class_type: &Arc<ClassType>,
        name: &str,
        descriptor: &str,
        caller_sensitive: bool,
    ) -> ExecutionScope {
        let accessor = vm.current_thread();
        if let Some(accessor) = &accessor {
            accessor.push_call(CallRecord {
                class_type: Arc::clone(class_type),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
                code_offset: 0,
                caller_sensitive,
            });
            if caller_sensitive {
                accessor.enter_caller_sensitive();
            }
        }
        ExecutionScope { accessor }
    }
}

impl Drop for ExecutionScope {
    fn drop(&mut self) {
        if let Some(accessor) = &self.accessor {
            if let Some(top) = accessor.call_stack.lock().last() {
                if top.caller_sensitive {
                    accessor.exit_caller_sensitive();
                }
            }
            accessor.pop_call();
        }
    }
}

/// `class.method(File.java:12)` lines for a call-stack snapshot, newest
/// frame first.
pub fn describe_frames(records: &[CallRecord]) -> Vec<String> {
    records
        .iter()
        .rev()
        .map(|record| {
            let class_name = record.class_type.name().replace('/', ".");
            let position = record
                .class_type
                .find_invokable(&record.name, &record.descriptor)
                .and_then(|inv| inv.code())
                .and_then(|code| code.line_number_for(record.code_offset as u16))
                .map(|line| {
                    format!(
                        "{}:{}",
                        record.class_type.source_file().unwrap_or("Unknown Source"),
                        line
                    )
                })
                .unwrap_or_else(|| {
                    record
                        .class_type
                        .source_file()
                        .unwrap_or("Unknown Source")
                        .to_string()
                });
            format!("at {}.{}({})", class_name, record.name, position)
        })
        .collect()
}

/// Starts an OS thread for a managed `java/lang/Thread` instance and
/// drives its `run()V` through normal virtual dispatch. The accessor is
/// registered before the thread body begins and removed when it exits.
pub fn spawn_managed(vm: &Arc<Vm>, thread_var: Arc<ClassInstance>) -> VmResult<()> {
    let accessor = vm.register_thread();
    accessor.set_thread_instance(&thread_var);
    thread_var.set_field("eetop", "J", Value::Long(accessor.handle() as i64))?;

    let vm_for_thread = Arc::clone(vm);
    let accessor_for_thread = Arc::clone(&accessor);
    let handle = std::thread::spawn(move || {
        accessor_for_thread.bind_current();
        debug!(handle = accessor_for_thread.handle(), "managed thread started");
        let result = thread_var.call_virtual(&vm_for_thread, "run", "()V", Vec::new());
        if result.is_err() {
            debug!(
                handle = accessor_for_thread.handle(),
                "managed thread ended abnormally"
            );
        }
        vm_for_thread.unregister_thread(accessor_for_thread.handle());
    });
    accessor.set_join_handle(handle);
    Ok(())
}
