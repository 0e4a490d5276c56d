pub mod mnemonics;

use std::sync::Arc;

use kloader::constants::{self, ConstantPool};
use kloader::descriptors::{FieldDescriptor, MethodDescriptor};
use tracing::trace;

use crate::class_instance::ClassInstance;
use crate::class_type::{ClassInvokable, ClassType};
use crate::errors::{internal, Flow, VmResult};
use crate::exceptions;
use crate::natives::NativeMethod;
use crate::reflect;
use crate::stack_frame::StackFrame;
use crate::strings;
use crate::threads::ExecutionScope;
use crate::value::{ArrayObject, ArrayStore, Value};
use crate::vm::Vm;

use mnemonics::Mnemonic;

/// Outcome of one instruction.
enum Step {
    Continue,
    Return(Option<Value>),
}

/// What a synchronized invocation locks: the receiver for instance
/// methods, the class type for static ones.
enum SyncTarget {
    Instance(Arc<ClassInstance>),
    Array(Arc<ArrayObject>),
    Class(Arc<ClassType>),
}

impl SyncTarget {
    fn monitor(&self) -> &crate::monitor::Monitor {
        match self {
            SyncTarget::Instance(obj) => obj.monitor(),
            SyncTarget::Array(arr) => arr.monitor(),
            SyncTarget::Class(class_type) => class_type.monitor(),
        }
    }
}

/// Runs one invokable of `class_type`: a host native if one is
/// registered (or the method is flagged native), bytecode otherwise.
/// Handles the call-stack record, synchronized-method locking, frame
/// construction and parameter binding.
pub fn run_invokable(
    vm: &Arc<Vm>,
    class_type: &Arc<ClassType>,
    invokable: &ClassInvokable,
    this_value: Option<Value>,
    params: Vec<Value>,
) -> VmResult<Option<Value>> {
    let native = vm
        .natives()
        .lookup(class_type.name(), &invokable.name, &invokable.descriptor);

    let sync_target = if invokable.is_synchronized() {
        Some(match &this_value {
            Some(Value::Instance(obj)) => SyncTarget::Instance(Arc::clone(obj)),
            Some(Value::Array(arr)) => SyncTarget::Array(Arc::clone(arr)),
            _ => SyncTarget::Class(Arc::clone(class_type)),
        })
    } else {
        None
    };
    if let Some(target) = &sync_target {
        target.monitor().enter();
    }

    let result = (|| {
        if let Some(native) = native {
            let _scope =
                ExecutionScope::enter(vm, class_type, &invokable.name, &invokable.descriptor, true);
            return match native {
                NativeMethod::Instance(callback) => (*callback)(vm, this_value.clone(), params),
                NativeMethod::Class(callback) => (*callback)(vm, None, params),
            };
        }
        if invokable.is_native() {
            return Err(exceptions::throw(
                vm,
                "java/lang/UnsatisfiedLinkError",
                &format!(
                    "{}.{}{}",
                    class_type.name().replace('/', "."),
                    invokable.name,
                    invokable.descriptor
                ),
            ));
        }
        let Some(code) = invokable.code() else {
            return Err(exceptions::throw(
                vm,
                "java/lang/AbstractMethodError",
                &format!("{}.{}{}", class_type.name(), invokable.name, invokable.descriptor),
            ));
        };
        let _scope =
            ExecutionScope::enter(vm, class_type, &invokable.name, &invokable.descriptor, false);
        let mut frame = StackFrame::new(
            code,
            Arc::clone(class_type.pool()),
            this_value.clone(),
            params,
        );
        run_frame(vm, &mut frame)
    })();

    if let Some(target) = &sync_target {
        // Entered above, so the exit cannot observe a foreign owner.
        let _ = target.monitor().exit();
    }
    result
}

/// The inner loop: one instruction at a time until a return, a throw
/// that no active handler catches, or an internal fault. A caught throw
/// clears the operand stack, pushes the throwable and resumes at the
/// handler.
pub(crate) fn run_frame(vm: &Arc<Vm>, frame: &mut StackFrame) -> VmResult<Option<Value>> {
    if let Some(pending) = vm.pending_thrown() {
        return Err(Flow::Thrown(pending));
    }
    let accessor = vm.current_thread();
    loop {
        let start = frame.offset;
        if let Some(accessor) = &accessor {
            accessor.update_code_offset(start);
        }
        match step(vm, frame, start) {
            Ok(Step::Continue) => {}
            Ok(Step::Return(value)) => return Ok(value),
            Err(Flow::Thrown(throwable)) => {
                match handler_for(vm, frame, start, &throwable)? {
                    Some(handler_pc) => {
                        trace!(handler_pc, "throw caught by local handler");
                        frame.stack.clear();
                        frame.push(Value::Instance(throwable));
                        frame.offset = handler_pc;
                        vm.clear_thrown();
                    }
                    None => {
                        vm.register_thrown(&throwable);
                        return Err(Flow::Thrown(throwable));
                    }
                }
            }
            Err(fault) => return Err(fault),
        }
    }
}

/// Scans the active exception-table entries in order; entry 0 catches
/// everything, otherwise the throwable must cast to the entry's class.
fn handler_for(
    vm: &Arc<Vm>,
    frame: &StackFrame,
    pc: usize,
    throwable: &Arc<ClassInstance>,
) -> VmResult<Option<usize>> {
    for entry in frame.active_handlers(pc) {
        let catches = if entry.catch_type == 0 {
            true
        } else {
            let class_name = constants::class_name_at(&frame.pool, entry.catch_type)
                .ok_or_else(|| internal("catch type was not a resolvable Class constant"))?;
            throwable.class_type().can_cast_to(vm, class_name)?
        };
        if catches {
            return Ok(Some(entry.handler_pc as usize));
        }
    }
    Ok(None)
}

fn branch(frame: &mut StackFrame, start: usize, relative: i32) {
    frame.offset = (start as i64 + relative as i64) as usize;
}

/// Pops the declared parameters of `descriptor`, restoring declaration
/// order (they sit on the stack last-first).
fn pop_arguments(frame: &mut StackFrame, descriptor: &str) -> VmResult<Vec<Value>> {
    let parsed = MethodDescriptor::parse(descriptor)
        .map_err(|e| internal(format!("bad method descriptor at call site: {e}")))?;
    let mut args = Vec::with_capacity(parsed.parameters.len());
    for _ in 0..parsed.parameters.len() {
        args.push(frame.pop()?);
    }
    args.reverse();
    Ok(args)
}

fn member_ref<'p>(
    pool: &'p [ConstantPool],
    index: u16,
) -> VmResult<(&'p str, &'p str, &'p str)> {
    let (class_index, nat_index) = constants::member_ref_at(pool, index)
        .ok_or_else(|| internal(format!("constant {index} is not a member reference")))?;
    let class_name = constants::class_name_at(pool, class_index)
        .ok_or_else(|| internal("member reference class was not resolved"))?;
    let (name, descriptor) = constants::name_and_type_at(pool, nat_index)
        .ok_or_else(|| internal("member reference name-and-type was not resolved"))?;
    Ok((class_name, name, descriptor))
}

/// The `instanceof` relation; `checkcast` throws where this is false.
pub(crate) fn value_instanceof(vm: &Arc<Vm>, value: &Value, target: &str) -> VmResult<bool> {
    match value {
        Value::Null => Ok(false),
        Value::Instance(obj) => obj.class_type().can_cast_to(vm, target),
        Value::Array(arr) => array_castable(vm, &arr.descriptor(), target),
        _ => Err(internal("instanceof on a primitive value")),
    }
}

fn array_castable(vm: &Arc<Vm>, source_descriptor: &str, target: &str) -> VmResult<bool> {
    if target == "java/lang/Object" || target == "java/lang/Cloneable" || target == "java/io/Serializable" {
        return Ok(true);
    }
    if !target.starts_with('[') {
        return Ok(false);
    }
    if source_descriptor == target {
        return Ok(true);
    }
    let source = FieldDescriptor::parse(source_descriptor)
        .map_err(|e| internal(format!("bad array descriptor: {e}")))?;
    let target = FieldDescriptor::parse(target)
        .map_err(|e| internal(format!("bad array descriptor: {e}")))?;
    component_assignable(vm, &source, &target)
}

fn component_assignable(
    vm: &Arc<Vm>,
    source: &FieldDescriptor,
    target: &FieldDescriptor,
) -> VmResult<bool> {
    match (source, target) {
        (FieldDescriptor::Array(s), FieldDescriptor::Array(t)) => {
            component_assignable(vm, s, t)
        }
        (FieldDescriptor::Array(_), FieldDescriptor::Object(name)) => Ok(name
            == "java/lang/Object"
            || name == "java/lang/Cloneable"
            || name == "java/io/Serializable"),
        (FieldDescriptor::Object(s), FieldDescriptor::Object(t)) => {
            vm.resolve_class(s)?.can_cast_to(vm, t)
        }
        (s, t) => Ok(s == t),
    }
}

/// Whether `value` may be stored into an array of `component`. Integral
/// widening is free; reference stores check assignability; null always
/// stores into reference components.
fn value_storable(vm: &Arc<Vm>, component: &FieldDescriptor, value: &Value) -> VmResult<bool> {
    match component {
        FieldDescriptor::Object(name) => match value {
            Value::Null => Ok(true),
            Value::Instance(obj) => obj.class_type().can_cast_to(vm, name),
            Value::Array(arr) => array_castable(vm, &arr.descriptor(), name),
            _ => Ok(false),
        },
        FieldDescriptor::Array(_) => match value {
            Value::Null => Ok(true),
            Value::Array(arr) => {
                let source = FieldDescriptor::parse(&arr.descriptor())
                    .map_err(|e| internal(format!("bad array descriptor: {e}")))?;
                component_assignable(vm, &source, component)
            }
            _ => Ok(false),
        },
        _ => Ok(true),
    }
}

fn null_pointer(vm: &Arc<Vm>, context: &str) -> Flow {
    exceptions::throw(vm, "java/lang/NullPointerException", context)
}

fn array_index_oob(vm: &Arc<Vm>, index: i32, length: usize) -> Flow {
    exceptions::throw(
        vm,
        "java/lang/ArrayIndexOutOfBoundsException",
        &format!("Index {index} out of bounds for length {length}"),
    )
}

fn array_load(vm: &Arc<Vm>, frame: &mut StackFrame) -> VmResult<Step> {
    let index = frame.pop()?.as_int()?;
    let array_ref = frame.pop()?;
    if array_ref.is_null() {
        return Err(null_pointer(vm, "array load from null"));
    }
    let array = array_ref.as_array()?;
    match array.get(index) {
        Some(value) => {
            frame.push(value);
            Ok(Step::Continue)
        }
        None => Err(array_index_oob(vm, index, array.len())),
    }
}

fn array_store(vm: &Arc<Vm>, frame: &mut StackFrame, check_reference: bool) -> VmResult<Step> {
    let value = frame.pop()?;
    let index = frame.pop()?.as_int()?;
    let array_ref = frame.pop()?;
    if array_ref.is_null() {
        return Err(null_pointer(vm, "array store to null"));
    }
    let array = array_ref.as_array()?;
    if check_reference && !value_storable(vm, array.component(), &value)? {
        return Err(exceptions::throw(
            vm,
            "java/lang/ArrayStoreException",
            &value_type_name(&value),
        ));
    }
    match array.set(index, value) {
        ArrayStore::Stored => Ok(Step::Continue),
        ArrayStore::OutOfBounds => Err(array_index_oob(vm, index, array.len())),
        ArrayStore::TypeMismatch => Err(exceptions::throw(
            vm,
            "java/lang/ArrayStoreException",
            "component type mismatch",
        )),
    }
}

fn value_type_name(value: &Value) -> String {
    match value {
        Value::Instance(obj) => obj.class_type().name().replace('/', "."),
        Value::Array(arr) => arr.descriptor(),
        other => other.kind_name().to_string(),
    }
}

fn int_shift_distance(value: i32) -> u32 {
    (value & 0x1F) as u32
}

fn long_shift_distance(value: i32) -> u32 {
    (value & 0x3F) as u32
}

/// A constant for `ldc`/`ldc_w` (category one) or `ldc2_w` (category
/// two). Strings intern; class literals surface the shared class
/// object.
fn load_constant(vm: &Arc<Vm>, pool: &[ConstantPool], index: u16, wide: bool) -> VmResult<Value> {
    match pool.get(index as usize) {
        Some(ConstantPool::Integer(i)) if !wide => Ok(Value::Int(i.value())),
        Some(ConstantPool::Float(f)) if !wide => Ok(Value::Float(f.value())),
        Some(ConstantPool::String(s)) if !wide => {
            let contents = s
                .contents
                .as_deref()
                .ok_or_else(|| internal("string constant was not resolved"))?;
            strings::intern(vm, contents)
        }
        Some(ConstantPool::Class(c)) if !wide => {
            let name = c
                .name
                .as_deref()
                .ok_or_else(|| internal("class constant was not resolved"))?;
            reflect::class_object_for(vm, name)
        }
        Some(ConstantPool::Long(l)) if wide => Ok(Value::Long(l.value())),
        Some(ConstantPool::Double(d)) if wide => Ok(Value::Double(d.value())),
        _ => Err(internal(format!(
            "constant {index} has the wrong tag for this ldc form"
        ))),
    }
}

fn new_multi_array(whole: &FieldDescriptor, lengths: &[i32]) -> VmResult<Value> {
    let FieldDescriptor::Array(component) = whole else {
        return Err(internal("multianewarray type had fewer dimensions than lengths"));
    };
    let length = lengths[0] as usize;
    let array = ArrayObject::new((**component).clone(), length);
    if lengths.len() > 1 {
        for index in 0..length {
            array.set(index as i32, new_multi_array(component, &lengths[1..])?);
        }
    }
    Ok(Value::Array(Arc::new(array)))
}

/// Instance calls with an array receiver route to the handful of
/// object-protocol bridges an array answers itself.
fn invoke_on_array(
    vm: &Arc<Vm>,
    array: Arc<ArrayObject>,
    name: &str,
    descriptor: &str,
    _args: Vec<Value>,
) -> VmResult<Option<Value>> {
    match (name, descriptor) {
        ("getClass", "()Ljava/lang/Class;") => {
            Ok(Some(reflect::class_object_for(vm, &array.descriptor())?))
        }
        ("clone", "()Ljava/lang/Object;") => {
            let mut elements = Vec::with_capacity(array.len());
            for index in 0..array.len() {
                elements.push(
                    array
                        .get(index as i32)
                        .ok_or_else(|| internal("array changed size during clone"))?,
                );
            }
            Ok(Some(Value::Array(Arc::new(ArrayObject::from_values(
                array.component().clone(),
                elements,
            )))))
        }
        ("hashCode", "()I") => Ok(Some(Value::Int(Arc::as_ptr(&array) as u32 as i32))),
        ("toString", "()Ljava/lang/String;") => Ok(Some(strings::new_string(
            vm,
            &format!("{}@{:x}", array.descriptor(), Arc::as_ptr(&array) as usize),
        )?)),
        ("wait", "()V") => {
            map_monitor(vm, array.monitor().wait(None))?;
            Ok(None)
        }
        ("notify", "()V") => {
            map_monitor(vm, array.monitor().notify_one())?;
            Ok(None)
        }
        ("notifyAll", "()V") => {
            map_monitor(vm, array.monitor().notify_all())?;
            Ok(None)
        }
        _ => Err(exceptions::throw(
            vm,
            "java/lang/NoSuchMethodError",
            &format!("{}.{}{}", array.descriptor(), name, descriptor),
        )),
    }
}

pub(crate) fn map_monitor(
    vm: &Arc<Vm>,
    result: Result<(), crate::monitor::NotOwner>,
) -> VmResult<()> {
    result.map_err(|_| {
        exceptions::throw(
            vm,
            "java/lang/IllegalMonitorStateException",
            "current thread is not owner",
        )
    })
}

fn int_binop(frame: &mut StackFrame, op: impl Fn(i32, i32) -> i32) -> VmResult<Step> {
    let b = frame.pop()?.as_int()?;
    let a = frame.pop()?.as_int()?;
    frame.push(Value::Int(op(a, b)));
    Ok(Step::Continue)
}

fn long_binop(frame: &mut StackFrame, op: impl Fn(i64, i64) -> i64) -> VmResult<Step> {
    let b = frame.pop()?.as_long()?;
    let a = frame.pop()?.as_long()?;
    frame.push(Value::Long(op(a, b)));
    Ok(Step::Continue)
}

fn float_binop(frame: &mut StackFrame, op: impl Fn(f32, f32) -> f32) -> VmResult<Step> {
    let b = frame.pop()?.as_float()?;
    let a = frame.pop()?.as_float()?;
    frame.push(Value::Float(op(a, b)));
    Ok(Step::Continue)
}

fn double_binop(frame: &mut StackFrame, op: impl Fn(f64, f64) -> f64) -> VmResult<Step> {
    let b = frame.pop()?.as_double()?;
    let a = frame.pop()?.as_double()?;
    frame.push(Value::Double(op(a, b)));
    Ok(Step::Continue)
}

/// Integral division and remainder trap a zero divisor; the
/// minimum-value / -1 case wraps like the reference semantics require.
fn int_div(vm: &Arc<Vm>, frame: &mut StackFrame, remainder: bool) -> VmResult<Step> {
    let b = frame.pop()?.as_int()?;
    let a = frame.pop()?.as_int()?;
    if b == 0 {
        return Err(exceptions::throw(vm, "java/lang/ArithmeticException", "/ by zero"));
    }
    frame.push(Value::Int(if remainder {
        a.wrapping_rem(b)
    } else {
        a.wrapping_div(b)
    }));
    Ok(Step::Continue)
}

fn long_div(vm: &Arc<Vm>, frame: &mut StackFrame, remainder: bool) -> VmResult<Step> {
    let b = frame.pop()?.as_long()?;
    let a = frame.pop()?.as_long()?;
    if b == 0 {
        return Err(exceptions::throw(vm, "java/lang/ArithmeticException", "/ by zero"));
    }
    frame.push(Value::Long(if remainder {
        a.wrapping_rem(b)
    } else {
        a.wrapping_div(b)
    }));
    Ok(Step::Continue)
}

fn if_int(frame: &mut StackFrame, start: usize, test: impl Fn(i32) -> bool) -> VmResult<Step> {
    let relative = frame.read_i16()?;
    if test(frame.pop()?.as_int()?) {
        branch(frame, start, relative as i32);
    }
    Ok(Step::Continue)
}

fn if_int_pair(
    frame: &mut StackFrame,
    start: usize,
    test: impl Fn(i32, i32) -> bool,
) -> VmResult<Step> {
    let relative = frame.read_i16()?;
    let b = frame.pop()?.as_int()?;
    let a = frame.pop()?.as_int()?;
    if test(a, b) {
        branch(frame, start, relative as i32);
    }
    Ok(Step::Continue)
}

fn float_compare(frame: &mut StackFrame, nan_result: i32) -> VmResult<Step> {
    let b = frame.pop()?.as_float()?;
    let a = frame.pop()?.as_float()?;
    let result = match a.partial_cmp(&b) {
        Some(std::cmp::Ordering::Less) => -1,
        Some(std::cmp::Ordering::Equal) => 0,
        Some(std::cmp::Ordering::Greater) => 1,
        None => nan_result,
    };
    frame.push(Value::Int(result));
    Ok(Step::Continue)
}

fn double_compare(frame: &mut StackFrame, nan_result: i32) -> VmResult<Step> {
    let b = frame.pop()?.as_double()?;
    let a = frame.pop()?.as_double()?;
    let result = match a.partial_cmp(&b) {
        Some(std::cmp::Ordering::Less) => -1,
        Some(std::cmp::Ordering::Equal) => 0,
        Some(std::cmp::Ordering::Greater) => 1,
        None => nan_result,
    };
    frame.push(Value::Int(result));
    Ok(Step::Continue)
}

fn newarray_component(atype: u8) -> VmResult<FieldDescriptor> {
    Ok(match atype {
        4 => FieldDescriptor::Boolean,
        5 => FieldDescriptor::Char,
        6 => FieldDescriptor::Float,
        7 => FieldDescriptor::Double,
        8 => FieldDescriptor::Byte,
        9 => FieldDescriptor::Short,
        10 => FieldDescriptor::Int,
        11 => FieldDescriptor::Long,
        _ => return Err(internal(format!("newarray with unknown atype {atype}"))),
    })
}

fn step(vm: &Arc<Vm>, frame: &mut StackFrame, start: usize) -> VmResult<Step> {
    let opcode = frame.read_u8()?;
    let mnemonic = Mnemonic::from(opcode);
    trace!(offset = start, ?mnemonic, "executing");
    match mnemonic {
        Mnemonic::Nop => Ok(Step::Continue),

        // Constants.
        Mnemonic::AconstNull => {
            frame.push(Value::Null);
            Ok(Step::Continue)
        }
        Mnemonic::IconstM1
        | Mnemonic::Iconst0
        | Mnemonic::Iconst1
        | Mnemonic::Iconst2
        | Mnemonic::Iconst3
        | Mnemonic::Iconst4
        | Mnemonic::Iconst5 => {
            frame.push(Value::Int(opcode as i32 - 0x03));
            Ok(Step::Continue)
        }
        Mnemonic::Lconst0 | Mnemonic::Lconst1 => {
            frame.push(Value::Long((opcode - 0x09) as i64));
            Ok(Step::Continue)
        }
        Mnemonic::Fconst0 | Mnemonic::Fconst1 | Mnemonic::Fconst2 => {
            frame.push(Value::Float((opcode - 0x0b) as f32));
            Ok(Step::Continue)
        }
        Mnemonic::Dconst0 | Mnemonic::Dconst1 => {
            frame.push(Value::Double((opcode - 0x0e) as f64));
            Ok(Step::Continue)
        }
        Mnemonic::Bipush => {
            let value = frame.read_i8()?;
            frame.push(Value::Int(value as i32));
            Ok(Step::Continue)
        }
        Mnemonic::Sipush => {
            let value = frame.read_i16()?;
            frame.push(Value::Int(value as i32));
            Ok(Step::Continue)
        }
        Mnemonic::Ldc => {
            let index = frame.read_u8()? as u16;
            let pool = Arc::clone(&frame.pool);
            let value = load_constant(vm, &pool, index, false)?;
            frame.push(value);
            Ok(Step::Continue)
        }
        Mnemonic::LdcW => {
            let index = frame.read_u16()?;
            let pool = Arc::clone(&frame.pool);
            let value = load_constant(vm, &pool, index, false)?;
            frame.push(value);
            Ok(Step::Continue)
        }
        Mnemonic::Ldc2W => {
            let index = frame.read_u16()?;
            let pool = Arc::clone(&frame.pool);
            let value = load_constant(vm, &pool, index, true)?;
            frame.push(value);
            Ok(Step::Continue)
        }

        // Local loads. The compiled-in indices of the short forms live
        // in the opcode itself.
        Mnemonic::Iload | Mnemonic::Lload | Mnemonic::Fload | Mnemonic::Dload | Mnemonic::Aload => {
            let index = frame.read_u8()? as usize;
            let value = frame.local(index)?;
            frame.push(value);
            Ok(Step::Continue)
        }
        Mnemonic::Iload0 | Mnemonic::Iload1 | Mnemonic::Iload2 | Mnemonic::Iload3 => {
            let value = frame.local((opcode - 0x1a) as usize)?;
            frame.push(value);
            Ok(Step::Continue)
        }
        Mnemonic::Lload0 | Mnemonic::Lload1 | Mnemonic::Lload2 | Mnemonic::Lload3 => {
            let value = frame.local((opcode - 0x1e) as usize)?;
            frame.push(value);
            Ok(Step::Continue)
        }
        Mnemonic::Fload0 | Mnemonic::Fload1 | Mnemonic::Fload2 | Mnemonic::Fload3 => {
            let value = frame.local((opcode - 0x22) as usize)?;
            frame.push(value);
            Ok(Step::Continue)
        }
        Mnemonic::Dload0 | Mnemonic::Dload1 | Mnemonic::Dload2 | Mnemonic::Dload3 => {
            let value = frame.local((opcode - 0x26) as usize)?;
            frame.push(value);
            Ok(Step::Continue)
        }
        Mnemonic::Aload0 | Mnemonic::Aload1 | Mnemonic::Aload2 | Mnemonic::Aload3 => {
            let value = frame.local((opcode - 0x2a) as usize)?;
            frame.push(value);
            Ok(Step::Continue)
        }

        // Array loads.
        Mnemonic::Iaload
        | Mnemonic::Laload
        | Mnemonic::Faload
        | Mnemonic::Daload
        | Mnemonic::Aaload
        | Mnemonic::Baload
        | Mnemonic::Caload
        | Mnemonic::Saload => array_load(vm, frame),

        // Local stores.
        Mnemonic::Istore
        | Mnemonic::Lstore
        | Mnemonic::Fstore
        | Mnemonic::Dstore
        | Mnemonic::Astore => {
            let index = frame.read_u8()? as usize;
            let value = frame.pop()?;
            frame.set_local(index, value)?;
            Ok(Step::Continue)
        }
        Mnemonic::Istore0 | Mnemonic::Istore1 | Mnemonic::Istore2 | Mnemonic::Istore3 => {
            let value = frame.pop()?;
            frame.set_local((opcode - 0x3b) as usize, value)?;
            Ok(Step::Continue)
        }
        Mnemonic::Lstore0 | Mnemonic::Lstore1 | Mnemonic::Lstore2 | Mnemonic::Lstore3 => {
            let value = frame.pop()?;
            frame.set_local((opcode - 0x3f) as usize, value)?;
            Ok(Step::Continue)
        }
        Mnemonic::Fstore0 | Mnemonic::Fstore1 | Mnemonic::Fstore2 | Mnemonic::Fstore3 => {
            let value = frame.pop()?;
            frame.set_local((opcode - 0x43) as usize, value)?;
            Ok(Step::Continue)
        }
        Mnemonic::Dstore0 | Mnemonic::Dstore1 | Mnemonic::Dstore2 | Mnemonic::Dstore3 => {
            let value = frame.pop()?;
            frame.set_local((opcode - 0x47) as usize, value)?;
            Ok(Step::Continue)
        }
        Mnemonic::Astore0 | Mnemonic::Astore1 | Mnemonic::Astore2 | Mnemonic::Astore3 => {
            let value = frame.pop()?;
            frame.set_local((opcode - 0x4b) as usize, value)?;
            Ok(Step::Continue)
        }

        // Array stores. Reference stores check assignability against the
        // component class.
        Mnemonic::Iastore
        | Mnemonic::Lastore
        | Mnemonic::Fastore
        | Mnemonic::Dastore
        | Mnemonic::Bastore
        | Mnemonic::Castore
        | Mnemonic::Sastore => array_store(vm, frame, false),
        Mnemonic::Aastore => array_store(vm, frame, true),

        // Stack manipulation, honoring the big-computational rule.
        Mnemonic::Pop => {
            frame.pop()?;
            Ok(Step::Continue)
        }
        Mnemonic::Pop2 => {
            let top = frame.pop()?;
            if !top.is_wide() {
                frame.pop()?;
            }
            Ok(Step::Continue)
        }
        Mnemonic::Dup => {
            let top = frame.pop()?;
            frame.push(top.clone());
            frame.push(top);
            Ok(Step::Continue)
        }
        Mnemonic::DupX1 => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            frame.push(v1.clone());
            frame.push(v2);
            frame.push(v1);
            Ok(Step::Continue)
        }
        Mnemonic::DupX2 => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            if v2.is_wide() {
                frame.push(v1.clone());
                frame.push(v2);
                frame.push(v1);
            } else {
                let v3 = frame.pop()?;
                frame.push(v1.clone());
                frame.push(v3);
                frame.push(v2);
                frame.push(v1);
            }
            Ok(Step::Continue)
        }
        Mnemonic::Dup2 => {
            let v1 = frame.pop()?;
            if v1.is_wide() {
                frame.push(v1.clone());
                frame.push(v1);
            } else {
                let v2 = frame.pop()?;
                frame.push(v2.clone());
                frame.push(v1.clone());
                frame.push(v2);
                frame.push(v1);
            }
            Ok(Step::Continue)
        }
        Mnemonic::Dup2X1 => {
            let v1 = frame.pop()?;
            if v1.is_wide() {
                let v2 = frame.pop()?;
                frame.push(v1.clone());
                frame.push(v2);
                frame.push(v1);
            } else {
                let v2 = frame.pop()?;
                let v3 = frame.pop()?;
                frame.push(v2.clone());
                frame.push(v1.clone());
                frame.push(v3);
                frame.push(v2);
                frame.push(v1);
            }
            Ok(Step::Continue)
        }
        Mnemonic::Dup2X2 => {
            let v1 = frame.pop()?;
            if v1.is_wide() {
                let v2 = frame.pop()?;
                if v2.is_wide() {
                    frame.push(v1.clone());
                    frame.push(v2);
                    frame.push(v1);
                } else {
                    let v3 = frame.pop()?;
                    frame.push(v1.clone());
                    frame.push(v3);
                    frame.push(v2);
                    frame.push(v1);
                }
            } else {
                let v2 = frame.pop()?;
                let v3 = frame.pop()?;
                if v3.is_wide() {
                    frame.push(v2.clone());
                    frame.push(v1.clone());
                    frame.push(v3);
                    frame.push(v2);
                    frame.push(v1);
                } else {
                    let v4 = frame.pop()?;
                    frame.push(v2.clone());
                    frame.push(v1.clone());
                    frame.push(v4);
                    frame.push(v3);
                    frame.push(v2);
                    frame.push(v1);
                }
            }
            Ok(Step::Continue)
        }
        Mnemonic::Swap => {
            let v1 = frame.pop()?;
            let v2 = frame.pop()?;
            frame.push(v1);
            frame.push(v2);
            Ok(Step::Continue)
        }

        // Arithmetic.
        Mnemonic::Iadd => int_binop(frame, |a, b| a.wrapping_add(b)),
        Mnemonic::Ladd => long_binop(frame, |a, b| a.wrapping_add(b)),
        Mnemonic::Fadd => float_binop(frame, |a, b| a + b),
        Mnemonic::Dadd => double_binop(frame, |a, b| a + b),
        Mnemonic::Isub => int_binop(frame, |a, b| a.wrapping_sub(b)),
        Mnemonic::Lsub => long_binop(frame, |a, b| a.wrapping_sub(b)),
        Mnemonic::Fsub => float_binop(frame, |a, b| a - b),
        Mnemonic::Dsub => double_binop(frame, |a, b| a - b),
        Mnemonic::Imul => int_binop(frame, |a, b| a.wrapping_mul(b)),
        Mnemonic::Lmul => long_binop(frame, |a, b| a.wrapping_mul(b)),
        Mnemonic::Fmul => float_binop(frame, |a, b| a * b),
        Mnemonic::Dmul => double_binop(frame, |a, b| a * b),
        Mnemonic::Idiv => int_div(vm, frame, false),
        Mnemonic::Ldiv => long_div(vm, frame, false),
        Mnemonic::Fdiv => float_binop(frame, |a, b| a / b),
        Mnemonic::Ddiv => double_binop(frame, |a, b| a / b),
        Mnemonic::Irem => int_div(vm, frame, true),
        Mnemonic::Lrem => long_div(vm, frame, true),
        Mnemonic::Frem => float_binop(frame, |a, b| a % b),
        Mnemonic::Drem => double_binop(frame, |a, b| a % b),
        Mnemonic::Ineg => {
            let value = frame.pop()?.as_int()?;
            frame.push(Value::Int(value.wrapping_neg()));
            Ok(Step::Continue)
        }
        Mnemonic::Lneg => {
            let value = frame.pop()?.as_long()?;
            frame.push(Value::Long(value.wrapping_neg()));
            Ok(Step::Continue)
        }
        Mnemonic::Fneg => {
            let value = frame.pop()?.as_float()?;
            frame.push(Value::Float(-value));
            Ok(Step::Continue)
        }
        Mnemonic::Dneg => {
            let value = frame.pop()?.as_double()?;
            frame.push(Value::Double(-value));
            Ok(Step::Continue)
        }

        // Shifts mask the distance to the operand width.
        Mnemonic::Ishl => int_binop(frame, |a, b| a.wrapping_shl(int_shift_distance(b))),
        Mnemonic::Lshl => {
            let b = frame.pop()?.as_int()?;
            let a = frame.pop()?.as_long()?;
            frame.push(Value::Long(a.wrapping_shl(long_shift_distance(b))));
            Ok(Step::Continue)
        }
        Mnemonic::Ishr => int_binop(frame, |a, b| a.wrapping_shr(int_shift_distance(b))),
        Mnemonic::Lshr => {
            let b = frame.pop()?.as_int()?;
            let a = frame.pop()?.as_long()?;
            frame.push(Value::Long(a.wrapping_shr(long_shift_distance(b))));
            Ok(Step::Continue)
        }
        Mnemonic::Iushr => int_binop(frame, |a, b| {
            ((a as u32).wrapping_shr(int_shift_distance(b))) as i32
        }),
        Mnemonic::Lushr => {
            let b = frame.pop()?.as_int()?;
            let a = frame.pop()?.as_long()?;
            frame.push(Value::Long(
                ((a as u64).wrapping_shr(long_shift_distance(b))) as i64,
            ));
            Ok(Step::Continue)
        }
        Mnemonic::Iand => int_binop(frame, |a, b| a & b),
        Mnemonic::Land => long_binop(frame, |a, b| a & b),
        Mnemonic::Ior => int_binop(frame, |a, b| a | b),
        Mnemonic::Lor => long_binop(frame, |a, b| a | b),
        Mnemonic::Ixor => int_binop(frame, |a, b| a ^ b),
        Mnemonic::Lxor => long_binop(frame, |a, b| a ^ b),
        Mnemonic::Iinc => {
            let index = frame.read_u8()? as usize;
            let delta = frame.read_i8()? as i32;
            let value = frame.local(index)?.as_int()?;
            frame.set_local(index, Value::Int(value.wrapping_add(delta)))?;
            Ok(Step::Continue)
        }

        // Conversions.
        Mnemonic::I2l => {
            let value = frame.pop()?.as_int()?;
            frame.push(Value::Long(value as i64));
            Ok(Step::Continue)
        }
        Mnemonic::I2f => {
            let value = frame.pop()?.as_int()?;
            frame.push(Value::Float(value as f32));
            Ok(Step::Continue)
        }
        Mnemonic::I2d => {
            let value = frame.pop()?.as_int()?;
            frame.push(Value::Double(value as f64));
            Ok(Step::Continue)
        }
        Mnemonic::L2i => {
            let value = frame.pop()?.as_long()?;
            frame.push(Value::Int(value as i32));
            Ok(Step::Continue)
        }
        Mnemonic::L2f => {
            let value = frame.pop()?.as_long()?;
            frame.push(Value::Float(value as f32));
            Ok(Step::Continue)
        }
        Mnemonic::L2d => {
            let value = frame.pop()?.as_long()?;
            frame.push(Value::Double(value as f64));
            Ok(Step::Continue)
        }
        Mnemonic::F2i => {
            let value = frame.pop()?.as_float()?;
            frame.push(Value::Int(value as i32));
            Ok(Step::Continue)
        }
        Mnemonic::F2l => {
            let value = frame.pop()?.as_float()?;
            frame.push(Value::Long(value as i64));
            Ok(Step::Continue)
        }
        Mnemonic::F2d => {
            let value = frame.pop()?.as_float()?;
            frame.push(Value::Double(value as f64));
            Ok(Step::Continue)
        }
        Mnemonic::D2i => {
            let value = frame.pop()?.as_double()?;
            frame.push(Value::Int(value as i32));
            Ok(Step::Continue)
        }
        Mnemonic::D2l => {
            let value = frame.pop()?.as_double()?;
            frame.push(Value::Long(value as i64));
            Ok(Step::Continue)
        }
        Mnemonic::D2f => {
            let value = frame.pop()?.as_double()?;
            frame.push(Value::Float(value as f32));
            Ok(Step::Continue)
        }
        Mnemonic::I2b => {
            let value = frame.pop()?.as_int()?;
            frame.push(Value::Int(value as i8 as i32));
            Ok(Step::Continue)
        }
        Mnemonic::I2c => {
            let value = frame.pop()?.as_int()?;
            frame.push(Value::Int(value as u16 as i32));
            Ok(Step::Continue)
        }
        Mnemonic::I2s => {
            let value = frame.pop()?.as_int()?;
            frame.push(Value::Int(value as i16 as i32));
            Ok(Step::Continue)
        }

        // Comparisons. The NaN result is compiled into the opcode.
        Mnemonic::Lcmp => {
            let b = frame.pop()?.as_long()?;
            let a = frame.pop()?.as_long()?;
            frame.push(Value::Int(match a.cmp(&b) {
                std::cmp::Ordering::Less => -1,
                std::cmp::Ordering::Equal => 0,
                std::cmp::Ordering::Greater => 1,
            }));
            Ok(Step::Continue)
        }
        Mnemonic::Fcmpl => float_compare(frame, -1),
        Mnemonic::Fcmpg => float_compare(frame, 1),
        Mnemonic::Dcmpl => double_compare(frame, -1),
        Mnemonic::Dcmpg => double_compare(frame, 1),

        // Branches; the signed operand is relative to this
        // instruction's own start address.
        Mnemonic::Ifeq => if_int(frame, start, |v| v == 0),
        Mnemonic::Ifne => if_int(frame, start, |v| v != 0),
        Mnemonic::Iflt => if_int(frame, start, |v| v < 0),
        Mnemonic::Ifge => if_int(frame, start, |v| v >= 0),
        Mnemonic::Ifgt => if_int(frame, start, |v| v > 0),
        Mnemonic::Ifle => if_int(frame, start, |v| v <= 0),
        Mnemonic::IfIcmpeq => if_int_pair(frame, start, |a, b| a == b),
        Mnemonic::IfIcmpne => if_int_pair(frame, start, |a, b| a != b),
        Mnemonic::IfIcmplt => if_int_pair(frame, start, |a, b| a < b),
        Mnemonic::IfIcmpge => if_int_pair(frame, start, |a, b| a >= b),
        Mnemonic::IfIcmpgt => if_int_pair(frame, start, |a, b| a > b),
        Mnemonic::IfIcmple => if_int_pair(frame, start, |a, b| a <= b),
        Mnemonic::IfAcmpeq => {
            let relative = frame.read_i16()?;
            let b = frame.pop()?;
            let a = frame.pop()?;
            if a.ref_eq(&b) {
                branch(frame, start, relative as i32);
            }
            Ok(Step::Continue)
        }
        Mnemonic::IfAcmpne => {
            let relative = frame.read_i16()?;
            let b = frame.pop()?;
            let a = frame.pop()?;
            if !a.ref_eq(&b) {
                branch(frame, start, relative as i32);
            }
            Ok(Step::Continue)
        }
        Mnemonic::Ifnull => {
            let relative = frame.read_i16()?;
            if frame.pop()?.is_null() {
                branch(frame, start, relative as i32);
            }
            Ok(Step::Continue)
        }
        Mnemonic::Ifnonnull => {
            let relative = frame.read_i16()?;
            if !frame.pop()?.is_null() {
                branch(frame, start, relative as i32);
            }
            Ok(Step::Continue)
        }
        Mnemonic::Goto => {
            let relative = frame.read_i16()?;
            branch(frame, start, relative as i32);
            Ok(Step::Continue)
        }
        Mnemonic::GotoW => {
            let relative = frame.read_i32()?;
            branch(frame, start, relative);
            Ok(Step::Continue)
        }

        // Subroutine opcodes predate modern compilers; nothing emits
        // them anymore, so reaching one is an interpreter-level fault.
        Mnemonic::Jsr | Mnemonic::JsrW | Mnemonic::Ret => Err(internal(format!(
            "jsr/ret are not supported (opcode {opcode:#x} at {start})"
        ))),

        Mnemonic::Tableswitch => {
            let key = frame.pop()?.as_int()?;
            frame.offset = (start + 4) & !3;
            let default = frame.read_i32()?;
            let low = frame.read_i32()?;
            let high = frame.read_i32()?;
            if high < low {
                return Err(internal("tableswitch bounds are inverted"));
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            let mut selected = default;
            for position in 0..count {
                let jump = frame.read_i32()?;
                if key as i64 == low as i64 + position as i64 {
                    selected = jump;
                }
            }
            branch(frame, start, selected);
            Ok(Step::Continue)
        }
        Mnemonic::Lookupswitch => {
            let key = frame.pop()?.as_int()?;
            frame.offset = (start + 4) & !3;
            let default = frame.read_i32()?;
            let npairs = frame.read_i32()?;
            let mut selected = default;
            for _ in 0..npairs {
                let candidate = frame.read_i32()?;
                let jump = frame.read_i32()?;
                if candidate == key {
                    selected = jump;
                }
            }
            branch(frame, start, selected);
            Ok(Step::Continue)
        }

        // Returns.
        Mnemonic::Ireturn
        | Mnemonic::Lreturn
        | Mnemonic::Freturn
        | Mnemonic::Dreturn
        | Mnemonic::Areturn => {
            let value = frame.pop()?;
            Ok(Step::Return(Some(value)))
        }
        Mnemonic::Return => Ok(Step::Return(None)),

        // Field access.
        Mnemonic::Getstatic => {
            let index = frame.read_u16()?;
            let pool = Arc::clone(&frame.pool);
            let (class_name, name, descriptor) = member_ref(&pool, index)?;
            let class_type = vm.resolve_class(class_name)?;
            let value = class_type.static_get(vm, name, descriptor)?;
            frame.push(value);
            Ok(Step::Continue)
        }
        Mnemonic::Putstatic => {
            let index = frame.read_u16()?;
            let pool = Arc::clone(&frame.pool);
            let (class_name, name, descriptor) = member_ref(&pool, index)?;
            let class_type = vm.resolve_class(class_name)?;
            let value = frame.pop()?;
            class_type.static_put(vm, name, descriptor, value)?;
            Ok(Step::Continue)
        }
        Mnemonic::Getfield => {
            let index = frame.read_u16()?;
            let pool = Arc::clone(&frame.pool);
            let (_, name, descriptor) = member_ref(&pool, index)?;
            let object = frame.pop()?;
            if object.is_null() {
                return Err(null_pointer(vm, &format!("getfield {name}")));
            }
            let value = object.as_instance()?.get_field(name, descriptor)?;
            frame.push(value);
            Ok(Step::Continue)
        }
        Mnemonic::Putfield => {
            let index = frame.read_u16()?;
            let pool = Arc::clone(&frame.pool);
            let (_, name, descriptor) = member_ref(&pool, index)?;
            let value = frame.pop()?;
            let object = frame.pop()?;
            if object.is_null() {
                return Err(null_pointer(vm, &format!("putfield {name}")));
            }
            object.as_instance()?.set_field(name, descriptor, value)?;
            Ok(Step::Continue)
        }

        // Invocation. The callee's return value is the only thing the
        // caller's stack gains.
        Mnemonic::Invokevirtual | Mnemonic::Invokeinterface | Mnemonic::Invokespecial => {
            let index = frame.read_u16()?;
            if mnemonic == Mnemonic::Invokeinterface {
                frame.read_u8()?;
                frame.read_u8()?;
            }
            let pool = Arc::clone(&frame.pool);
            let (class_name, name, descriptor) = member_ref(&pool, index)?;
            let args = pop_arguments(frame, descriptor)?;
            let receiver = frame.pop()?;
            let result = match &receiver {
                Value::Instance(object) => {
                    if mnemonic == Mnemonic::Invokespecial {
                        object.call_special(vm, class_name, name, descriptor, args)?
                    } else {
                        object.call_virtual(vm, name, descriptor, args)?
                    }
                }
                Value::Array(array) => {
                    invoke_on_array(vm, Arc::clone(array), name, descriptor, args)?
                }
                Value::Null => {
                    return Err(null_pointer(
                        vm,
                        &format!("invoke {name}{descriptor} on null"),
                    ))
                }
                _ => return Err(internal("invoke on a primitive receiver")),
            };
            if let Some(value) = result {
                frame.push(value);
            }
            Ok(Step::Continue)
        }
        Mnemonic::Invokestatic => {
            let index = frame.read_u16()?;
            let pool = Arc::clone(&frame.pool);
            let (class_name, name, descriptor) = member_ref(&pool, index)?;
            let args = pop_arguments(frame, descriptor)?;
            let class_type = vm.resolve_class(class_name)?;
            if let Some(value) = class_type.call_class_method(vm, name, descriptor, args)? {
                frame.push(value);
            }
            Ok(Step::Continue)
        }
        Mnemonic::Invokedynamic => {
            let index = frame.read_u16()?;
            frame.read_u8()?;
            frame.read_u8()?;
            let pool = Arc::clone(&frame.pool);
            let nat_index = match pool.get(index as usize) {
                Some(ConstantPool::InvokeDynamic(id)) => id.name_and_type_index,
                _ => return Err(internal("invokedynamic site was not an InvokeDynamic constant")),
            };
            let (name, descriptor) = constants::name_and_type_at(&pool, nat_index)
                .ok_or_else(|| internal("invokedynamic name-and-type was not resolved"))?;
            // Dynamic linkage is host-shim territory; without one the
            // site fails the way an absent bootstrap would.
            match vm.natives().lookup("<invokedynamic>", name, descriptor) {
                Some(NativeMethod::Class(callback)) | Some(NativeMethod::Instance(callback)) => {
                    let args = pop_arguments(frame, descriptor)?;
                    if let Some(value) = (*callback)(vm, None, args)? {
                        frame.push(value);
                    }
                    Ok(Step::Continue)
                }
                None => Err(exceptions::throw(
                    vm,
                    "java/lang/BootstrapMethodError",
                    &format!("no host shim for {name}{descriptor}"),
                )),
            }
        }

        // Allocation.
        Mnemonic::New => {
            let index = frame.read_u16()?;
            let pool = Arc::clone(&frame.pool);
            let class_name = constants::class_name_at(&pool, index)
                .ok_or_else(|| internal("new target was not a resolvable Class constant"))?;
            let class_type = vm.resolve_class(class_name)?;
            if class_type.is_interface() || class_type.is_abstract() {
                return Err(exceptions::throw(
                    vm,
                    "java/lang/InstantiationError",
                    &class_name.replace('/', "."),
                ));
            }
            let instance = class_type.new_instance(vm)?;
            frame.push(Value::Instance(instance));
            Ok(Step::Continue)
        }
        Mnemonic::Newarray => {
            let atype = frame.read_u8()?;
            let length = frame.pop()?.as_int()?;
            if length < 0 {
                return Err(exceptions::throw(
                    vm,
                    "java/lang/NegativeArraySizeException",
                    &length.to_string(),
                ));
            }
            let component = newarray_component(atype)?;
            frame.push(Value::Array(Arc::new(ArrayObject::new(
                component,
                length as usize,
            ))));
            Ok(Step::Continue)
        }
        Mnemonic::Anewarray => {
            let index = frame.read_u16()?;
            let pool = Arc::clone(&frame.pool);
            let class_name = constants::class_name_at(&pool, index)
                .ok_or_else(|| internal("anewarray target was not a resolvable Class constant"))?;
            let length = frame.pop()?.as_int()?;
            if length < 0 {
                return Err(exceptions::throw(
                    vm,
                    "java/lang/NegativeArraySizeException",
                    &length.to_string(),
                ));
            }
            let component = if class_name.starts_with('[') {
                FieldDescriptor::parse(class_name)
                    .map_err(|e| internal(format!("bad anewarray component: {e}")))?
            } else {
                vm.resolve_class(class_name)?;
                FieldDescriptor::Object(class_name.to_string())
            };
            frame.push(Value::Array(Arc::new(ArrayObject::new(
                component,
                length as usize,
            ))));
            Ok(Step::Continue)
        }
        Mnemonic::Multianewarray => {
            let index = frame.read_u16()?;
            let dimensions = frame.read_u8()? as usize;
            let pool = Arc::clone(&frame.pool);
            let class_name = constants::class_name_at(&pool, index).ok_or_else(|| {
                internal("multianewarray target was not a resolvable Class constant")
            })?;
            // Lengths sit innermost-on-top; popping and reversing
            // restores declaration order.
            let mut lengths = Vec::with_capacity(dimensions);
            for _ in 0..dimensions {
                let length = frame.pop()?.as_int()?;
                if length < 0 {
                    return Err(exceptions::throw(
                        vm,
                        "java/lang/NegativeArraySizeException",
                        &length.to_string(),
                    ));
                }
                lengths.push(length);
            }
            lengths.reverse();
            let whole = FieldDescriptor::parse(class_name)
                .map_err(|e| internal(format!("bad multianewarray type: {e}")))?;
            frame.push(new_multi_array(&whole, &lengths)?);
            Ok(Step::Continue)
        }
        Mnemonic::Arraylength => {
            let array_ref = frame.pop()?;
            if array_ref.is_null() {
                return Err(null_pointer(vm, "arraylength of null"));
            }
            frame.push(Value::Int(array_ref.as_array()?.len() as i32));
            Ok(Step::Continue)
        }

        Mnemonic::Athrow => {
            let value = frame.pop()?;
            if value.is_null() {
                return Err(null_pointer(vm, "athrow of null"));
            }
            Err(Flow::Thrown(value.as_instance()?))
        }

        // Type tests agree with each other: instanceof answers true
        // exactly where checkcast passes.
        Mnemonic::Checkcast => {
            let index = frame.read_u16()?;
            let pool = Arc::clone(&frame.pool);
            let class_name = constants::class_name_at(&pool, index)
                .ok_or_else(|| internal("checkcast target was not a resolvable Class constant"))?;
            let value = frame.pop()?;
            if !value.is_null() && !value_instanceof(vm, &value, class_name)? {
                return Err(exceptions::throw(
                    vm,
                    "java/lang/ClassCastException",
                    &format!(
                        "class {} cannot be cast to class {}",
                        value_type_name(&value),
                        class_name.replace('/', ".")
                    ),
                ));
            }
            frame.push(value);
            Ok(Step::Continue)
        }
        Mnemonic::Instanceof => {
            let index = frame.read_u16()?;
            let pool = Arc::clone(&frame.pool);
            let class_name = constants::class_name_at(&pool, index)
                .ok_or_else(|| internal("instanceof target was not a resolvable Class constant"))?;
            let value = frame.pop()?;
            let result = !value.is_null() && value_instanceof(vm, &value, class_name)?;
            frame.push(Value::Int(result as i32));
            Ok(Step::Continue)
        }

        Mnemonic::Monitorenter => {
            let value = frame.pop()?;
            match &value {
                Value::Instance(object) => object.monitor().enter(),
                Value::Array(array) => array.monitor().enter(),
                Value::Null => return Err(null_pointer(vm, "monitorenter on null")),
                _ => return Err(internal("monitorenter on a primitive value")),
            }
            Ok(Step::Continue)
        }
        Mnemonic::Monitorexit => {
            let value = frame.pop()?;
            match &value {
                Value::Instance(object) => map_monitor(vm, object.monitor().exit())?,
                Value::Array(array) => map_monitor(vm, array.monitor().exit())?,
                Value::Null => return Err(null_pointer(vm, "monitorexit on null")),
                _ => return Err(internal("monitorexit on a primitive value")),
            }
            Ok(Step::Continue)
        }

        Mnemonic::Wide => {
            let wide_opcode = frame.read_u8()?;
            match Mnemonic::from(wide_opcode) {
                Mnemonic::Iload
                | Mnemonic::Lload
                | Mnemonic::Fload
                | Mnemonic::Dload
                | Mnemonic::Aload => {
                    let index = frame.read_u16()? as usize;
                    let value = frame.local(index)?;
                    frame.push(value);
                    Ok(Step::Continue)
                }
                Mnemonic::Istore
                | Mnemonic::Lstore
                | Mnemonic::Fstore
                | Mnemonic::Dstore
                | Mnemonic::Astore => {
                    let index = frame.read_u16()? as usize;
                    let value = frame.pop()?;
                    frame.set_local(index, value)?;
                    Ok(Step::Continue)
                }
                Mnemonic::Iinc => {
                    let index = frame.read_u16()? as usize;
                    let delta = frame.read_i16()? as i32;
                    let value = frame.local(index)?.as_int()?;
                    frame.set_local(index, Value::Int(value.wrapping_add(delta)))?;
                    Ok(Step::Continue)
                }
                Mnemonic::Ret => Err(internal("jsr/ret are not supported")),
                _ => Err(internal(format!(
                    "wide prefix on unsupported opcode {wide_opcode:#x}"
                ))),
            }
        }

        Mnemonic::Unknown(opcode) => Err(internal(format!(
            "invalid or unimplemented instruction {opcode:#x} at {start}"
        ))),
    }
}
