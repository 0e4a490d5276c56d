use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::class_instance::ClassInstance;
use crate::errors::{internal, VmResult};
use crate::exceptions;
use crate::ops;
use crate::reflect::{self, ReflectionKind};
use crate::strings;
use crate::threads;
use crate::value::{ArrayStore, Value};
use crate::vm::Vm;

fn arg(params: &[Value], index: usize) -> VmResult<Value> {
    params
        .get(index)
        .cloned()
        .ok_or_else(|| internal(format!("native callback missing argument {index}")))
}

fn receiver(this: Option<Value>) -> VmResult<Arc<ClassInstance>> {
    this.ok_or_else(|| internal("instance native called without a receiver"))?
        .as_instance()
}

fn receiver_value(this: Option<Value>) -> VmResult<Value> {
    this.ok_or_else(|| internal("instance native called without a receiver"))
}

fn identity_hash(instance: &Arc<ClassInstance>) -> i32 {
    Arc::as_ptr(instance) as u32 as i32
}

/// The formatted call stack of the current thread, captured when a
/// throwable is constructed.
fn captured_backtrace(vm: &Arc<Vm>) -> VmResult<Value> {
    match vm.current_thread() {
        Some(accessor) => {
            let lines = threads::describe_frames(&accessor.call_stack());
            strings::new_string(vm, &lines.join("\n"))
        }
        None => Ok(Value::Null),
    }
}

fn java_string_hash(text: &str) -> i32 {
    let mut hash = 0i32;
    for unit in text.encode_utf16() {
        hash = hash.wrapping_mul(31).wrapping_add(unit as i32);
    }
    hash
}

/// Formats a value the way `StringBuilder.append` would print it.
fn display_value(vm: &Arc<Vm>, value: &Value) -> VmResult<String> {
    Ok(match value {
        Value::Null => "null".to_string(),
        Value::Int(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Float(v) => format!("{v:?}"),
        Value::Double(v) => format!("{v:?}"),
        Value::Instance(obj) => {
            let text = obj.call_virtual(vm, "toString", "()Ljava/lang/String;", Vec::new())?;
            match text {
                Some(text) if !text.is_null() => strings::get_string(&text)?,
                _ => "null".to_string(),
            }
        }
        Value::Array(arr) => format!("{}@{:x}", arr.descriptor(), Arc::as_ptr(arr) as usize),
    })
}

fn append_text(vm: &Arc<Vm>, this: Option<Value>, text: &str) -> VmResult<Option<Value>> {
    let builder = receiver(this.clone())?;
    let current = builder.get_field("buf", "Ljava/lang/String;")?;
    let mut contents = strings::get_string_or_null(&current)?.unwrap_or_default();
    contents.push_str(text);
    builder.set_field("buf", "Ljava/lang/String;", strings::new_string(vm, &contents)?)?;
    Ok(Some(receiver_value(this)?))
}

/// Walks the receiver's class chain for the type declaring the field
/// behind an opaque offset.
fn field_at_offset(
    instance: &Arc<ClassInstance>,
    offset: i64,
) -> VmResult<(String, String)> {
    let mut level = Some(Arc::clone(instance));
    while let Some(current) = level {
        if let Some(field) = current.class_type().field_by_offset(offset) {
            return Ok((field.name.clone(), field.descriptor.clone()));
        }
        level = current.super_instance().cloned();
    }
    Err(internal(format!("no field at offset {offset}")))
}

pub(super) fn register(vm: &Arc<Vm>) {
    let natives = vm.natives();

    // java/lang/Object
    natives.register_instance("java/lang/Object", "<init>", "()V", |_, _, _| Ok(None));
    natives.register_instance(
        "java/lang/Object",
        "getClass",
        "()Ljava/lang/Class;",
        |vm, this, _| {
            let instance = receiver(this)?;
            Ok(Some(reflect::class_object_for(
                vm,
                instance.class_type().name(),
            )?))
        },
    );
    natives.register_instance("java/lang/Object", "hashCode", "()I", |_, this, _| {
        Ok(Some(Value::Int(identity_hash(&receiver(this)?))))
    });
    natives.register_instance(
        "java/lang/Object",
        "equals",
        "(Ljava/lang/Object;)Z",
        |_, this, params| {
            let this = receiver_value(this)?;
            Ok(Some(Value::Int(this.ref_eq(&arg(&params, 0)?) as i32)))
        },
    );
    natives.register_instance(
        "java/lang/Object",
        "toString",
        "()Ljava/lang/String;",
        |vm, this, _| {
            let instance = receiver(this)?;
            let text = format!(
                "{}@{:x}",
                instance.class_type().name().replace('/', "."),
                identity_hash(&instance) as u32
            );
            Ok(Some(strings::new_string(vm, &text)?))
        },
    );
    natives.register_instance(
        "java/lang/Object",
        "clone",
        "()Ljava/lang/Object;",
        |vm, this, _| {
            let instance = receiver(this)?;
            if !instance
                .class_type()
                .can_cast_to(vm, "java/lang/Cloneable")?
            {
                return Err(exceptions::throw(
                    vm,
                    "java/lang/CloneNotSupportedException",
                    &instance.class_type().name().replace('/', "."),
                ));
            }
            let copy = instance.class_type().new_instance(vm)?;
            copy.copy_fields_from(&instance)?;
            Ok(Some(Value::Instance(copy)))
        },
    );
    natives.register_instance("java/lang/Object", "wait", "()V", |vm, this, _| {
        ops::map_monitor(vm, receiver(this)?.monitor().wait(None))?;
        Ok(None)
    });
    natives.register_instance("java/lang/Object", "wait", "(J)V", |vm, this, params| {
        let millis = arg(&params, 0)?.as_long()?;
        let timeout = if millis <= 0 {
            None
        } else {
            Some(Duration::from_millis(millis as u64))
        };
        ops::map_monitor(vm, receiver(this)?.monitor().wait(timeout))?;
        Ok(None)
    });
    natives.register_instance("java/lang/Object", "notify", "()V", |vm, this, _| {
        ops::map_monitor(vm, receiver(this)?.monitor().notify_one())?;
        Ok(None)
    });
    natives.register_instance("java/lang/Object", "notifyAll", "()V", |vm, this, _| {
        ops::map_monitor(vm, receiver(this)?.monitor().notify_all())?;
        Ok(None)
    });

    // java/lang/Class
    natives.register_instance(
        "java/lang/Class",
        "getName",
        "()Ljava/lang/String;",
        |_, this, _| {
            Ok(Some(
                receiver(this)?.get_field("name", "Ljava/lang/String;")?,
            ))
        },
    );
    natives.register_instance("java/lang/Class", "isPrimitive", "()Z", |vm, this, _| {
        let reflection = reflect::reflection_type_of_class_object(vm, &receiver_value(this)?)?;
        Ok(Some(Value::Int(reflection.is_primitive() as i32)))
    });
    natives.register_instance("java/lang/Class", "isArray", "()Z", |vm, this, _| {
        let reflection = reflect::reflection_type_of_class_object(vm, &receiver_value(this)?)?;
        Ok(Some(Value::Int(reflection.is_array() as i32)))
    });
    natives.register_instance("java/lang/Class", "isInterface", "()Z", |vm, this, _| {
        let reflection = reflect::reflection_type_of_class_object(vm, &receiver_value(this)?)?;
        let result = match &reflection.kind {
            ReflectionKind::Class(class_type) => class_type.is_interface(),
            _ => false,
        };
        Ok(Some(Value::Int(result as i32)))
    });
    natives.register_instance(
        "java/lang/Class",
        "getComponentType",
        "()Ljava/lang/Class;",
        |vm, this, _| {
            let reflection = reflect::reflection_type_of_class_object(vm, &receiver_value(this)?)?;
            if !reflection.is_array() {
                return Ok(Some(Value::Null));
            }
            let component = &reflection.canonical_name[1..];
            Ok(Some(reflect::class_object_for(vm, component)?))
        },
    );
    natives.register_class(
        "java/lang/Class",
        "forName",
        "(Ljava/lang/String;)Ljava/lang/Class;",
        |vm, _, params| {
            let name = strings::get_string(&arg(&params, 0)?)?;
            let class_object = reflect::class_object_for(vm, &name)?;
            // forName initializes the named class.
            let reflection = reflect::reflection_type_of_class_object(vm, &class_object)?;
            if let ReflectionKind::Class(class_type) = &reflection.kind {
                class_type.ensure_static_init(vm)?;
            }
            Ok(Some(class_object))
        },
    );

    // java/lang/String
    natives.register_instance("java/lang/String", "length", "()I", |_, this, _| {
        let text = strings::get_string(&receiver_value(this)?)?;
        Ok(Some(Value::Int(text.encode_utf16().count() as i32)))
    });
    natives.register_instance("java/lang/String", "charAt", "(I)C", |vm, this, params| {
        let index = arg(&params, 0)?.as_int()?;
        let text = strings::get_string(&receiver_value(this)?)?;
        let units: Vec<u16> = text.encode_utf16().collect();
        if index < 0 || index as usize >= units.len() {
            return Err(exceptions::throw(
                vm,
                "java/lang/StringIndexOutOfBoundsException",
                &format!("index {index}, length {}", units.len()),
            ));
        }
        Ok(Some(Value::Int(units[index as usize] as i32)))
    });
    natives.register_instance("java/lang/String", "hashCode", "()I", |_, this, _| {
        let text = strings::get_string(&receiver_value(this)?)?;
        Ok(Some(Value::Int(java_string_hash(&text))))
    });
    natives.register_instance(
        "java/lang/String",
        "equals",
        "(Ljava/lang/Object;)Z",
        |vm, this, params| {
            let other = arg(&params, 0)?;
            let equal = match &other {
                Value::Instance(obj) if obj.class_type().can_cast_to(vm, "java/lang/String")? => {
                    strings::get_string(&other)? == strings::get_string(&receiver_value(this)?)?
                }
                _ => false,
            };
            Ok(Some(Value::Int(equal as i32)))
        },
    );
    natives.register_instance(
        "java/lang/String",
        "intern",
        "()Ljava/lang/String;",
        |vm, this, _| {
            let text = strings::get_string(&receiver_value(this)?)?;
            Ok(Some(strings::intern(vm, &text)?))
        },
    );
    natives.register_instance(
        "java/lang/String",
        "toString",
        "()Ljava/lang/String;",
        |_, this, _| Ok(Some(receiver_value(this)?)),
    );

    // java/lang/StringBuilder
    natives.register_instance("java/lang/StringBuilder", "<init>", "()V", |vm, this, _| {
        receiver(this)?.set_field("buf", "Ljava/lang/String;", strings::new_string(vm, "")?)?;
        Ok(None)
    });
    natives.register_instance(
        "java/lang/StringBuilder",
        "append",
        "(Ljava/lang/String;)Ljava/lang/StringBuilder;",
        |vm, this, params| {
            let text = strings::get_string_or_null(&arg(&params, 0)?)?
                .unwrap_or_else(|| "null".to_string());
            append_text(vm, this, &text)
        },
    );
    natives.register_instance(
        "java/lang/StringBuilder",
        "append",
        "(Ljava/lang/Object;)Ljava/lang/StringBuilder;",
        |vm, this, params| {
            let text = display_value(vm, &arg(&params, 0)?)?;
            append_text(vm, this, &text)
        },
    );
    natives.register_instance(
        "java/lang/StringBuilder",
        "append",
        "(I)Ljava/lang/StringBuilder;",
        |vm, this, params| append_text(vm, this, &arg(&params, 0)?.as_int()?.to_string()),
    );
    natives.register_instance(
        "java/lang/StringBuilder",
        "append",
        "(J)Ljava/lang/StringBuilder;",
        |vm, this, params| append_text(vm, this, &arg(&params, 0)?.as_long()?.to_string()),
    );
    natives.register_instance(
        "java/lang/StringBuilder",
        "append",
        "(Z)Ljava/lang/StringBuilder;",
        |vm, this, params| {
            let text = if arg(&params, 0)?.as_int()? != 0 {
                "true"
            } else {
                "false"
            };
            append_text(vm, this, text)
        },
    );
    natives.register_instance(
        "java/lang/StringBuilder",
        "append",
        "(C)Ljava/lang/StringBuilder;",
        |vm, this, params| {
            let unit = arg(&params, 0)?.as_int()? as u16;
            append_text(vm, this, &String::from_utf16_lossy(&[unit]))
        },
    );
    natives.register_instance(
        "java/lang/StringBuilder",
        "append",
        "(F)Ljava/lang/StringBuilder;",
        |vm, this, params| {
            let value = arg(&params, 0)?.as_float()?;
            append_text(vm, this, &format!("{value:?}"))
        },
    );
    natives.register_instance(
        "java/lang/StringBuilder",
        "append",
        "(D)Ljava/lang/StringBuilder;",
        |vm, this, params| {
            let value = arg(&params, 0)?.as_double()?;
            append_text(vm, this, &format!("{value:?}"))
        },
    );
    natives.register_instance(
        "java/lang/StringBuilder",
        "toString",
        "()Ljava/lang/String;",
        |vm, this, _| {
            let current = receiver(this)?.get_field("buf", "Ljava/lang/String;")?;
            let contents = strings::get_string_or_null(&current)?.unwrap_or_default();
            Ok(Some(strings::new_string(vm, &contents)?))
        },
    );

    // java/lang/Throwable
    natives.register_instance("java/lang/Throwable", "<init>", "()V", |vm, this, _| {
        let throwable = receiver(this)?;
        throwable.set_field("backtrace", "Ljava/lang/String;", captured_backtrace(vm)?)?;
        Ok(None)
    });
    natives.register_instance(
        "java/lang/Throwable",
        "<init>",
        "(Ljava/lang/String;)V",
        |vm, this, params| {
            let throwable = receiver(this)?;
            throwable.set_field("detailMessage", "Ljava/lang/String;", arg(&params, 0)?)?;
            throwable.set_field("backtrace", "Ljava/lang/String;", captured_backtrace(vm)?)?;
            Ok(None)
        },
    );
    natives.register_instance(
        "java/lang/Throwable",
        "getMessage",
        "()Ljava/lang/String;",
        |_, this, _| {
            Ok(Some(
                receiver(this)?.get_field("detailMessage", "Ljava/lang/String;")?,
            ))
        },
    );
    natives.register_instance(
        "java/lang/Throwable",
        "toString",
        "()Ljava/lang/String;",
        |vm, this, _| {
            let text = exceptions::describe(&receiver(this)?);
            Ok(Some(strings::new_string(vm, &text)?))
        },
    );
    natives.register_instance(
        "java/lang/Throwable",
        "printStackTrace",
        "()V",
        |_, this, _| {
            let throwable = receiver(this)?;
            eprintln!("{}", exceptions::describe(&throwable));
            let backtrace = throwable.get_field("backtrace", "Ljava/lang/String;")?;
            if let Some(lines) = strings::get_string_or_null(&backtrace)? {
                for line in lines.lines() {
                    eprintln!("\t{line}");
                }
            }
            Ok(None)
        },
    );
    natives.register_instance(
        "java/lang/Throwable",
        "fillInStackTrace",
        "()Ljava/lang/Throwable;",
        |vm, this, _| {
            let throwable = receiver(this.clone())?;
            throwable.set_field("backtrace", "Ljava/lang/String;", captured_backtrace(vm)?)?;
            Ok(Some(receiver_value(this)?))
        },
    );

    // java/lang/Integer and the bit bridges
    natives.register_instance("java/lang/Integer", "<init>", "(I)V", |_, this, params| {
        receiver(this)?.set_field("value", "I", arg(&params, 0)?)?;
        Ok(None)
    });
    natives.register_instance("java/lang/Integer", "intValue", "()I", |_, this, _| {
        Ok(Some(receiver(this)?.get_field("value", "I")?))
    });
    natives.register_class(
        "java/lang/Integer",
        "parseInt",
        "(Ljava/lang/String;)I",
        |vm, _, params| {
            let text = strings::get_string(&arg(&params, 0)?)?;
            match text.trim().parse::<i32>() {
                Ok(value) => Ok(Some(Value::Int(value))),
                Err(_) => Err(exceptions::throw(
                    vm,
                    "java/lang/NumberFormatException",
                    &format!("For input string: \"{text}\""),
                )),
            }
        },
    );
    natives.register_class(
        "java/lang/Integer",
        "toString",
        "(I)Ljava/lang/String;",
        |vm, _, params| {
            Ok(Some(strings::new_string(
                vm,
                &arg(&params, 0)?.as_int()?.to_string(),
            )?))
        },
    );
    natives.register_class(
        "java/lang/Integer",
        "valueOf",
        "(I)Ljava/lang/Integer;",
        |vm, _, params| {
            let boxed = vm.resolve_class("java/lang/Integer")?.new_instance(vm)?;
            boxed.set_field("value", "I", arg(&params, 0)?)?;
            Ok(Some(Value::Instance(boxed)))
        },
    );
    natives.register_class(
        "java/lang/Float",
        "floatToRawIntBits",
        "(F)I",
        |_, _, params| {
            Ok(Some(Value::Int(arg(&params, 0)?.as_float()?.to_bits() as i32)))
        },
    );
    natives.register_class(
        "java/lang/Float",
        "intBitsToFloat",
        "(I)F",
        |_, _, params| {
            Ok(Some(Value::Float(f32::from_bits(
                arg(&params, 0)?.as_int()? as u32,
            ))))
        },
    );
    natives.register_class(
        "java/lang/Double",
        "doubleToRawLongBits",
        "(D)J",
        |_, _, params| {
            Ok(Some(Value::Long(
                arg(&params, 0)?.as_double()?.to_bits() as i64
            )))
        },
    );
    natives.register_class(
        "java/lang/Double",
        "longBitsToDouble",
        "(J)D",
        |_, _, params| {
            Ok(Some(Value::Double(f64::from_bits(
                arg(&params, 0)?.as_long()? as u64,
            ))))
        },
    );

    // java/lang/Math
    natives.register_class("java/lang/Math", "min", "(II)I", |_, _, params| {
        Ok(Some(Value::Int(
            arg(&params, 0)?.as_int()?.min(arg(&params, 1)?.as_int()?),
        )))
    });
    natives.register_class("java/lang/Math", "max", "(II)I", |_, _, params| {
        Ok(Some(Value::Int(
            arg(&params, 0)?.as_int()?.max(arg(&params, 1)?.as_int()?),
        )))
    });
    natives.register_class("java/lang/Math", "abs", "(I)I", |_, _, params| {
        Ok(Some(Value::Int(arg(&params, 0)?.as_int()?.wrapping_abs())))
    });
    natives.register_class("java/lang/Math", "sqrt", "(D)D", |_, _, params| {
        Ok(Some(Value::Double(arg(&params, 0)?.as_double()?.sqrt())))
    });

    // java/lang/System
    natives.register_class("java/lang/System", "currentTimeMillis", "()J", |_, _, _| {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Ok(Some(Value::Long(now.as_millis() as i64)))
    });
    natives.register_class("java/lang/System", "nanoTime", "()J", |_, _, _| {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Ok(Some(Value::Long(now.as_nanos() as i64)))
    });
    natives.register_class(
        "java/lang/System",
        "identityHashCode",
        "(Ljava/lang/Object;)I",
        |_, _, params| {
            let value = arg(&params, 0)?;
            let hash = match &value {
                Value::Instance(obj) => identity_hash(obj),
                Value::Array(arr) => Arc::as_ptr(arr) as u32 as i32,
                _ => 0,
            };
            Ok(Some(Value::Int(hash)))
        },
    );
    natives.register_class(
        "java/lang/System",
        "arraycopy",
        "(Ljava/lang/Object;ILjava/lang/Object;II)V",
        |vm, _, params| {
            let source = arg(&params, 0)?;
            let source_pos = arg(&params, 1)?.as_int()?;
            let dest = arg(&params, 2)?;
            let dest_pos = arg(&params, 3)?.as_int()?;
            let length = arg(&params, 4)?.as_int()?;
            if source.is_null() || dest.is_null() {
                return Err(exceptions::throw(
                    vm,
                    "java/lang/NullPointerException",
                    "arraycopy",
                ));
            }
            let source = source.as_array()?;
            let dest = dest.as_array()?;
            if source_pos < 0
                || dest_pos < 0
                || length < 0
                || source_pos as usize + length as usize > source.len()
                || dest_pos as usize + length as usize > dest.len()
            {
                return Err(exceptions::throw(
                    vm,
                    "java/lang/IndexOutOfBoundsException",
                    "arraycopy range",
                ));
            }
            // Snapshot first so overlapping self-copies behave.
            let mut window = Vec::with_capacity(length as usize);
            for index in 0..length {
                window.push(
                    source
                        .get(source_pos + index)
                        .ok_or_else(|| internal("arraycopy source changed size"))?,
                );
            }
            for (index, value) in window.into_iter().enumerate() {
                match dest.set(dest_pos + index as i32, value) {
                    ArrayStore::Stored => {}
                    _ => {
                        return Err(exceptions::throw(
                            vm,
                            "java/lang/ArrayStoreException",
                            "arraycopy component mismatch",
                        ))
                    }
                }
            }
            Ok(None)
        },
    );
    natives.register_class(
        "java/lang/System",
        "getProperty",
        "(Ljava/lang/String;)Ljava/lang/String;",
        |vm, _, params| {
            let key = strings::get_string(&arg(&params, 0)?)?;
            match vm.get_property(&key) {
                Some(value) => Ok(Some(strings::new_string(vm, &value)?)),
                None => Ok(Some(Value::Null)),
            }
        },
    );
    natives.register_class(
        "java/lang/System",
        "lineSeparator",
        "()Ljava/lang/String;",
        |vm, _, _| Ok(Some(strings::intern(vm, "\n")?)),
    );

    // java/lang/Thread
    natives.register_instance("java/lang/Thread", "<init>", "()V", |_, this, _| {
        receiver(this)?.set_field("priority", "I", Value::Int(5))?;
        Ok(None)
    });
    natives.register_instance(
        "java/lang/Thread",
        "<init>",
        "(Ljava/lang/Runnable;)V",
        |_, this, params| {
            let thread = receiver(this)?;
            thread.set_field("priority", "I", Value::Int(5))?;
            thread.set_field("target", "Ljava/lang/Runnable;", arg(&params, 0)?)?;
            Ok(None)
        },
    );
    natives.register_instance("java/lang/Thread", "run", "()V", |vm, this, _| {
        let target = receiver(this)?.get_field("target", "Ljava/lang/Runnable;")?;
        if let Value::Instance(runnable) = target {
            runnable.call_virtual(vm, "run", "()V", Vec::new())?;
        }
        Ok(None)
    });
    natives.register_instance("java/lang/Thread", "start", "()V", |vm, this, _| {
        threads::spawn_managed(vm, receiver(this)?)?;
        Ok(None)
    });
    natives.register_instance(
        "java/lang/Thread",
        "getName",
        "()Ljava/lang/String;",
        |_, this, _| Ok(Some(receiver(this)?.get_field("name", "Ljava/lang/String;")?)),
    );
    natives.register_instance("java/lang/Thread", "isAlive", "()Z", |vm, this, _| {
        let thread = receiver(this)?;
        Ok(Some(Value::Int(vm.thread_for_instance(&thread).is_some() as i32)))
    });
    natives.register_instance("java/lang/Thread", "join", "()V", |vm, this, _| {
        let thread = receiver(this)?;
        if let Some(accessor) = vm.thread_for_instance(&thread) {
            if let Some(handle) = accessor.take_join_handle() {
                handle
                    .join()
                    .map_err(|_| internal("joined thread panicked"))?;
            }
        }
        Ok(None)
    });
    natives.register_class(
        "java/lang/Thread",
        "currentThread",
        "()Ljava/lang/Thread;",
        |vm, _, _| {
            let instance = vm
                .current_thread()
                .and_then(|accessor| accessor.thread_instance());
            Ok(Some(match instance {
                Some(instance) => Value::Instance(instance),
                None => Value::Null,
            }))
        },
    );
    natives.register_class("java/lang/Thread", "sleep", "(J)V", |_, _, params| {
        let millis = arg(&params, 0)?.as_long()?;
        if millis > 0 {
            std::thread::sleep(Duration::from_millis(millis as u64));
        }
        Ok(None)
    });

    // java/util/Properties, backed by the context's property map.
    natives.register_instance("java/util/Properties", "<init>", "()V", |_, _, _| Ok(None));
    natives.register_instance(
        "java/util/Properties",
        "setProperty",
        "(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/Object;",
        |vm, _, params| {
            let key = strings::get_string(&arg(&params, 0)?)?;
            let value = strings::get_string(&arg(&params, 1)?)?;
            let previous = vm.set_property(key, value);
            Ok(Some(match previous {
                Some(previous) => strings::new_string(vm, &previous)?,
                None => Value::Null,
            }))
        },
    );
    natives.register_instance(
        "java/util/Properties",
        "getProperty",
        "(Ljava/lang/String;)Ljava/lang/String;",
        |vm, _, params| {
            let key = strings::get_string(&arg(&params, 0)?)?;
            Ok(Some(match vm.get_property(&key) {
                Some(value) => strings::new_string(vm, &value)?,
                None => Value::Null,
            }))
        },
    );

    // sun/misc/Unsafe: field references as opaque integers.
    natives.register_class(
        "sun/misc/Unsafe",
        "getUnsafe",
        "()Lsun/misc/Unsafe;",
        |vm, _, _| {
            let unsafe_type = vm.resolve_class("sun/misc/Unsafe")?;
            let cached = unsafe_type.static_get(vm, "theUnsafe", "Lsun/misc/Unsafe;")?;
            if !cached.is_null() {
                return Ok(Some(cached));
            }
            let singleton = Value::Instance(unsafe_type.new_instance(vm)?);
            unsafe_type.static_put(vm, "theUnsafe", "Lsun/misc/Unsafe;", singleton.clone())?;
            Ok(Some(singleton))
        },
    );
    natives.register_instance(
        "sun/misc/Unsafe",
        "objectFieldOffset",
        "(Ljava/lang/Class;Ljava/lang/String;)J",
        |vm, _, params| {
            let reflection = reflect::reflection_type_of_class_object(vm, &arg(&params, 0)?)?;
            let field_name = strings::get_string(&arg(&params, 1)?)?;
            let ReflectionKind::Class(class_type) = &reflection.kind else {
                return Err(internal("objectFieldOffset on a non-class type"));
            };
            let field = class_type
                .fields()
                .iter()
                .find(|f| f.name == field_name)
                .ok_or_else(|| internal(format!("no field named {field_name}")))?;
            let offset = class_type
                .field_offset(&field.name, &field.descriptor)
                .ok_or_else(|| internal("field offset was not computable"))?;
            Ok(Some(Value::Long(offset)))
        },
    );
    natives.register_instance(
        "sun/misc/Unsafe",
        "compareAndSwapInt",
        "(Ljava/lang/Object;JII)Z",
        |_, _, params| {
            let target = arg(&params, 0)?.as_instance()?;
            let offset = arg(&params, 1)?.as_long()?;
            let expected = arg(&params, 2)?.as_int()?;
            let update = arg(&params, 3)?.as_int()?;
            let (name, descriptor) = field_at_offset(&target, offset)?;
            let swapped = target.compare_and_swap_int(&name, &descriptor, expected, update)?;
            Ok(Some(Value::Int(swapped as i32)))
        },
    );
    natives.register_instance(
        "sun/misc/Unsafe",
        "getInt",
        "(Ljava/lang/Object;J)I",
        |_, _, params| {
            let target = arg(&params, 0)?.as_instance()?;
            let offset = arg(&params, 1)?.as_long()?;
            let (name, descriptor) = field_at_offset(&target, offset)?;
            Ok(Some(target.get_field(&name, &descriptor)?))
        },
    );
    natives.register_instance(
        "sun/misc/Unsafe",
        "putInt",
        "(Ljava/lang/Object;JI)V",
        |_, _, params| {
            let target = arg(&params, 0)?.as_instance()?;
            let offset = arg(&params, 1)?.as_long()?;
            let value = arg(&params, 2)?;
            let (name, descriptor) = field_at_offset(&target, offset)?;
            target.set_field(&name, &descriptor, value)?;
            Ok(None)
        },
    );

    // sun/reflect/Reflection
    natives.register_class(
        "sun/reflect/Reflection",
        "getCallerClass",
        "()Ljava/lang/Class;",
        |vm, _, _| {
            let Some(accessor) = vm.current_thread() else {
                return Ok(Some(Value::Null));
            };
            // Newest first, skipping the caller-sensitive bridge frames;
            // the first survivor invoked the bridge, the second is its
            // caller.
            let caller = accessor
                .call_stack()
                .into_iter()
                .rev()
                .filter(|record| !record.caller_sensitive)
                .nth(1);
            Ok(Some(match caller {
                Some(record) => reflect::class_object_for(vm, record.class_type.name())?,
                None => Value::Null,
            }))
        },
    );
}
