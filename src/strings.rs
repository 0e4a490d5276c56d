use std::sync::Arc;

use kloader::descriptors::FieldDescriptor;

use crate::errors::{internal, VmResult};
use crate::value::{ArrayObject, Value};
use crate::vm::Vm;

/// Builds a fresh (uninterned) `java/lang/String` whose `value` field
/// carries the UTF-16 code units.
pub fn new_string(vm: &Arc<Vm>, text: &str) -> VmResult<Value> {
    let string_type = vm.resolve_class("java/lang/String")?;
    let instance = string_type.new_instance(vm)?;
    let units: Vec<Value> = text.encode_utf16().map(|u| Value::Int(u as i32)).collect();
    let value = ArrayObject::from_values(FieldDescriptor::Char, units);
    instance.set_field("value", "[C", Value::Array(Arc::new(value)))?;
    Ok(Value::Instance(instance))
}

/// The canonical managed string for these contents. Two interned
/// strings with equal contents share reference identity.
pub fn intern(vm: &Arc<Vm>, text: &str) -> VmResult<Value> {
    if let Some(existing) = vm.cached_intern(text) {
        return Ok(Value::Instance(existing));
    }
    let fresh = new_string(vm, text)?.as_instance()?;
    Ok(Value::Instance(vm.intern_string(text.to_string(), fresh)))
}

/// Extracts host text from a managed string instance.
pub fn get_string(value: &Value) -> VmResult<String> {
    let instance = value.as_instance().map_err(|_| {
        internal(format!(
            "expected a java/lang/String, found {}",
            value.kind_name()
        ))
    })?;
    let chars = instance.get_field("value", "[C")?;
    let array = chars.as_array()?;
    let mut units = Vec::with_capacity(array.len());
    for index in 0..array.len() {
        let unit = array
            .get(index as i32)
            .ok_or_else(|| internal("string value array changed size during read"))?;
        units.push(unit.as_int()? as u16);
    }
    Ok(String::from_utf16_lossy(&units))
}

/// `None` for null, the contents otherwise; for natives taking an
/// optional string argument.
pub fn get_string_or_null(value: &Value) -> VmResult<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    get_string(value).map(Some)
}
