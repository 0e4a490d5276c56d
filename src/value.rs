use std::sync::Arc;

use kloader::descriptors::FieldDescriptor;
use parking_lot::Mutex;

use crate::class_instance::ClassInstance;
use crate::errors::{internal, VmResult};
use crate::monitor::Monitor;

/// One operand-stack or slot value. Booleans, bytes, shorts and chars
/// all compute as 32-bit ints; the declared descriptor travels with
/// array components and field slots, not with the value itself.
/// References are shared-ownership; replacing a slot swaps the
/// reference, never the pointee.
#[derive(Clone)]
pub enum Value {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Instance(Arc<ClassInstance>),
    Array(Arc<ArrayObject>),
}

impl Value {
    /// Longs and doubles occupy two conceptual stack slots (`pop2`,
    /// the `dup2` family, local-slot inflation).
    pub fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Reference identity, the `if_acmpeq` relation. Two nulls compare
    /// equal; references compare by allocation.
    pub fn ref_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Instance(a), Value::Instance(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_int(&self) -> VmResult<i32> {
        match self {
            Value::Int(v) => Ok(*v),
            _ => Err(internal(format!("expected an int, found {}", self.kind_name()))),
        }
    }

    pub fn as_long(&self) -> VmResult<i64> {
        match self {
            Value::Long(v) => Ok(*v),
            _ => Err(internal(format!("expected a long, found {}", self.kind_name()))),
        }
    }

    pub fn as_float(&self) -> VmResult<f32> {
        match self {
            Value::Float(v) => Ok(*v),
            _ => Err(internal(format!("expected a float, found {}", self.kind_name()))),
        }
    }

    pub fn as_double(&self) -> VmResult<f64> {
        match self {
            Value::Double(v) => Ok(*v),
            _ => Err(internal(format!("expected a double, found {}", self.kind_name()))),
        }
    }

    pub fn as_instance(&self) -> VmResult<Arc<ClassInstance>> {
        match self {
            Value::Instance(obj) => Ok(Arc::clone(obj)),
            _ => Err(internal(format!(
                "expected a class instance, found {}",
                self.kind_name()
            ))),
        }
    }

    pub fn as_array(&self) -> VmResult<Arc<ArrayObject>> {
        match self {
            Value::Array(arr) => Ok(Arc::clone(arr)),
            _ => Err(internal(format!("expected an array, found {}", self.kind_name()))),
        }
    }

    /// Zero / false / `'\0'` / 0.0 / null, per declared descriptor.
    pub fn default_for(descriptor: &FieldDescriptor) -> Value {
        match descriptor {
            FieldDescriptor::Byte
            | FieldDescriptor::Boolean
            | FieldDescriptor::Char
            | FieldDescriptor::Short
            | FieldDescriptor::Int => Value::Int(0),
            FieldDescriptor::Long => Value::Long(0),
            FieldDescriptor::Float => Value::Float(0.0),
            FieldDescriptor::Double => Value::Double(0.0),
            FieldDescriptor::Object(_) | FieldDescriptor::Array(_) => Value::Null,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Instance(_) => "instance",
            Value::Array(_) => "array",
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(v) => write!(f, "int {v}"),
            Value::Long(v) => write!(f, "long {v}"),
            Value::Float(v) => write!(f, "float {v}"),
            Value::Double(v) => write!(f, "double {v}"),
            Value::Instance(obj) => write!(f, "instance of {}", obj.class_type().name()),
            Value::Array(arr) => write!(f, "array {}", arr.descriptor()),
        }
    }
}

/// Outcome of an array store before any reference-assignability test.
#[derive(Debug, PartialEq, Eq)]
pub enum ArrayStore {
    Stored,
    OutOfBounds,
    TypeMismatch,
}

/// One array allocation: element type, backing values, and its own
/// monitor so the allocation can answer `getClass` and serve as a lock
/// receiver like any other object.
pub struct ArrayObject {
    component: FieldDescriptor,
    elements: Mutex<Vec<Value>>,
    monitor: Monitor,
}

impl ArrayObject {
    pub fn new(component: FieldDescriptor, length: usize) -> ArrayObject {
        let fill = Value::default_for(&component);
        ArrayObject {
            component,
            elements: Mutex::new(vec![fill; length]),
            monitor: Monitor::new(),
        }
    }

    /// Wraps already-typed element values, e.g. the code units of a
    /// managed string.
    pub fn from_values(component: FieldDescriptor, values: Vec<Value>) -> ArrayObject {
        ArrayObject {
            component,
            elements: Mutex::new(values),
            monitor: Monitor::new(),
        }
    }

    pub fn component(&self) -> &FieldDescriptor {
        &self.component
    }

    /// The wire descriptor of the whole array, e.g. `[I` or
    /// `[Ljava/lang/String;`.
    pub fn descriptor(&self) -> String {
        format!("[{}", self.component.descriptor())
    }

    pub fn len(&self) -> usize {
        self.elements.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: i32) -> Option<Value> {
        if index < 0 {
            return None;
        }
        self.elements.lock().get(index as usize).cloned()
    }

    /// Bounds- and variant-checks the store. Reference assignability
    /// against the component class is the caller's job; every integral
    /// component accepts an int by widening.
    pub fn set(&self, index: i32, value: Value) -> ArrayStore {
        let variant_matches = match (&self.component, &value) {
            (
                FieldDescriptor::Byte
                | FieldDescriptor::Boolean
                | FieldDescriptor::Char
                | FieldDescriptor::Short
                | FieldDescriptor::Int,
                Value::Int(_),
            ) => true,
            (FieldDescriptor::Long, Value::Long(_)) => true,
            (FieldDescriptor::Float, Value::Float(_)) => true,
            (FieldDescriptor::Double, Value::Double(_)) => true,
            (FieldDescriptor::Object(_) | FieldDescriptor::Array(_), Value::Null) => true,
            (FieldDescriptor::Object(_), Value::Instance(_)) => true,
            (FieldDescriptor::Object(_), Value::Array(_)) => true,
            (FieldDescriptor::Array(_), Value::Array(_)) => true,
            _ => false,
        };
        if !variant_matches {
            return ArrayStore::TypeMismatch;
        }
        if index < 0 {
            return ArrayStore::OutOfBounds;
        }
        let mut elements = self.elements.lock();
        match elements.get_mut(index as usize) {
            Some(slot) => {
                *slot = value;
                ArrayStore::Stored
            }
            None => ArrayStore::OutOfBounds,
        }
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }
}

impl std::fmt::Debug for ArrayObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.descriptor(), self.len())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_follow_the_descriptor() {
        assert!(matches!(
            Value::default_for(&FieldDescriptor::Boolean),
            Value::Int(0)
        ));
        assert!(matches!(
            Value::default_for(&FieldDescriptor::Double),
            Value::Double(_)
        ));
        assert!(Value::default_for(&FieldDescriptor::Object("java/lang/String".into())).is_null());
    }

    #[test]
    fn wide_values_are_long_and_double_only() {
        assert!(Value::Long(1).is_wide());
        assert!(Value::Double(1.0).is_wide());
        assert!(!Value::Int(1).is_wide());
        assert!(!Value::Null.is_wide());
    }

    #[test]
    fn reference_identity_distinguishes_allocations() {
        let a = Arc::new(ArrayObject::new(FieldDescriptor::Int, 1));
        let same = Value::Array(Arc::clone(&a));
        let b = Arc::new(ArrayObject::new(FieldDescriptor::Int, 1));
        assert!(Value::Array(a).ref_eq(&same));
        assert!(!same.ref_eq(&Value::Array(b)));
        assert!(Value::Null.ref_eq(&Value::Null));
    }

    #[test]
    fn zero_length_array_rejects_every_index() {
        let arr = ArrayObject::new(FieldDescriptor::Int, 0);
        assert!(arr.get(0).is_none());
        assert_eq!(arr.set(0, Value::Int(1)), ArrayStore::OutOfBounds);
        assert_eq!(arr.set(-1, Value::Int(1)), ArrayStore::OutOfBounds);
    }

    #[test]
    fn integral_components_accept_ints_and_nothing_else() {
        let arr = ArrayObject::new(FieldDescriptor::Byte, 2);
        assert_eq!(arr.set(0, Value::Int(300)), ArrayStore::Stored);
        assert_eq!(arr.set(1, Value::Long(1)), ArrayStore::TypeMismatch);
    }
}
