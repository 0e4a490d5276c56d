use std::sync::Arc;

use crate::class_instance::ClassInstance;
use crate::errors::{Flow, VmResult};
use crate::strings;
use crate::value::Value;
use crate::vm::Vm;

/// The process-wide record of an uncaught throw: who threw, and what.
/// Present means unacknowledged; the host takes it to acknowledge.
pub struct ThrownRecord {
    pub throwable: Arc<ClassInstance>,
    pub thread_handle: u64,
}

/// Builds a throwable instance through normal dispatch: allocate,
/// then run the matching constructor.
pub fn new_throwable(
    vm: &Arc<Vm>,
    class_name: &str,
    message: Option<&str>,
) -> VmResult<Arc<ClassInstance>> {
    let class_type = vm.resolve_class(class_name)?;
    let instance = class_type.new_instance(vm)?;
    match message {
        Some(message) => {
            let text = strings::new_string(vm, message)?;
            instance.call_special(
                vm,
                class_name,
                "<init>",
                "(Ljava/lang/String;)V",
                vec![text],
            )?;
        }
        None => {
            instance.call_special(vm, class_name, "<init>", "()V", Vec::new())?;
        }
    }
    Ok(instance)
}

/// The one-line way for interpreter code to raise a managed exception:
/// `return Err(exceptions::throw(vm, "java/lang/ArithmeticException", "/ by zero"))`.
/// If the throwable itself cannot be built, the construction fault
/// propagates instead.
pub fn throw(vm: &Arc<Vm>, class_name: &str, message: &str) -> Flow {
    match new_throwable(vm, class_name, Some(message)) {
        Ok(throwable) => Flow::Thrown(throwable),
        Err(flow) => flow,
    }
}

/// The `detailMessage` carried by a throwable, if set.
pub fn message_of(throwable: &Arc<ClassInstance>) -> VmResult<Option<String>> {
    let value = throwable.get_field("detailMessage", "Ljava/lang/String;")?;
    strings::get_string_or_null(&value)
}

/// The header line of a printed trace: `java.lang.Foo: message`.
pub fn describe(throwable: &Arc<ClassInstance>) -> String {
    let class_name = throwable.class_type().name().replace('/', ".");
    match message_of(throwable) {
        Ok(Some(message)) => format!("{class_name}: {message}"),
        _ => class_name,
    }
}
