use std::sync::Arc;

use kloader::descriptors::FieldDescriptor;

use crate::class_type::ClassType;
use crate::errors::{internal, VmResult};
use crate::strings;
use crate::value::Value;
use crate::vm::Vm;

/// What a runtime type handle stands for: a primitive, a loaded class,
/// or an N-dimensional array over one of those.
pub enum ReflectionKind {
    Primitive(FieldDescriptor),
    Class(Arc<ClassType>),
    Array {
        element: FieldDescriptor,
        dims: u8,
    },
}

/// An interned type handle. The registry guarantees one instance per
/// canonical name, so equality reduces to reference identity.
pub struct ReflectionType {
    pub canonical_name: String,
    pub kind: ReflectionKind,
}

impl ReflectionType {
    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, ReflectionKind::Primitive(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ReflectionKind::Array { .. })
    }

    /// The name `Class.getName` answers with: dotted class names,
    /// descriptor form for arrays, keyword form for primitives.
    pub fn java_name(&self) -> String {
        match &self.kind {
            ReflectionKind::Primitive(p) => primitive_keyword(p).to_string(),
            ReflectionKind::Class(class_type) => class_type.name().replace('/', "."),
            ReflectionKind::Array { .. } => self.canonical_name.replace('/', "."),
        }
    }
}

fn primitive_keyword(descriptor: &FieldDescriptor) -> &'static str {
    match descriptor {
        FieldDescriptor::Byte => "byte",
        FieldDescriptor::Boolean => "boolean",
        FieldDescriptor::Char => "char",
        FieldDescriptor::Short => "short",
        FieldDescriptor::Int => "int",
        FieldDescriptor::Long => "long",
        FieldDescriptor::Float => "float",
        FieldDescriptor::Double => "double",
        _ => "object",
    }
}

/// Accepts descriptor grammar (`I`, `Lpkg/Name;`, `[I`) and plain
/// slash or dotted class names; answers the canonical interned name.
pub fn canonical_name(text: &str) -> String {
    match text {
        "byte" => return "B".into(),
        "boolean" => return "Z".into(),
        "char" => return "C".into(),
        "short" => return "S".into(),
        "int" => return "I".into(),
        "long" => return "J".into(),
        "float" => return "F".into(),
        "double" => return "D".into(),
        _ => {}
    }
    let text = text.replace('.', "/");
    if let Some(inner) = text.strip_prefix('L') {
        if let Some(name) = inner.strip_suffix(';') {
            return name.to_string();
        }
    }
    text
}

/// Interns (and on first use builds) the reflection type for a
/// descriptor or class name.
pub fn reflection_type_for(vm: &Arc<Vm>, text: &str) -> VmResult<Arc<ReflectionType>> {
    let canonical = canonical_name(text);
    if let Some(existing) = vm.cached_reflection_type(&canonical) {
        return Ok(existing);
    }
    let kind = if canonical.starts_with('[') {
        let descriptor = FieldDescriptor::parse(&canonical)
            .map_err(|e| internal(format!("bad array type name {canonical}: {e}")))?;
        let mut dims = 0u8;
        let mut element: &FieldDescriptor = &descriptor;
        while let FieldDescriptor::Array(component) = element {
            dims += 1;
            element = component.as_ref();
        }
        // The element class of a reference array must resolve before the
        // handle exists.
        if let FieldDescriptor::Object(name) = element {
            vm.resolve_class(name)?;
        }
        ReflectionKind::Array {
            element: element.clone(),
            dims,
        }
    } else if matches!(canonical.as_str(), "B" | "Z" | "S" | "C" | "I" | "J" | "F" | "D") {
        let descriptor = FieldDescriptor::parse(&canonical)
            .map_err(|e| internal(format!("bad primitive type name {canonical}: {e}")))?;
        ReflectionKind::Primitive(descriptor)
    } else {
        ReflectionKind::Class(vm.resolve_class(&canonical)?)
    };
    let reflection_type = Arc::new(ReflectionType {
        canonical_name: canonical.clone(),
        kind,
    });
    Ok(vm.intern_reflection_type(canonical, reflection_type))
}

/// The `java/lang/Class` instance surfaced to bytecode for a type
/// literal; one per canonical name, so `==` on class objects works.
pub fn class_object_for(vm: &Arc<Vm>, text: &str) -> VmResult<Value> {
    let reflection_type = reflection_type_for(vm, text)?;
    if let Some(existing) = vm.cached_class_object(&reflection_type.canonical_name) {
        return Ok(Value::Instance(existing));
    }
    let class_type = vm.resolve_class("java/lang/Class")?;
    let instance = class_type.new_instance(vm)?;
    let name_value = strings::intern(vm, &reflection_type.java_name())?;
    instance.set_field("name", "Ljava/lang/String;", name_value)?;
    Ok(Value::Instance(vm.intern_class_object(
        reflection_type.canonical_name.clone(),
        instance,
    )))
}

/// Maps a class object back to its interned reflection type, through
/// the `name` field it was built with.
pub fn reflection_type_of_class_object(
    vm: &Arc<Vm>,
    class_object: &Value,
) -> VmResult<Arc<ReflectionType>> {
    let instance = class_object.as_instance()?;
    let name = strings::get_string(&instance.get_field("name", "Ljava/lang/String;")?)?;
    reflection_type_for(vm, &name)
}
