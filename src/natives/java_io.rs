use std::io::Write;
use std::sync::Arc;

use crate::errors::{internal, VmResult};
use crate::strings;
use crate::value::Value;
use crate::vm::Vm;

/// Writes a line (or fragment) to the stream the receiver's `fd` field
/// selects. Console I/O is the host's side of the bridge; errors on a
/// closed pipe are ignored the way a real console stream swallows them.
fn write_stream(this: Option<Value>, text: &str, newline: bool) -> VmResult<()> {
    let stream = this
        .ok_or_else(|| internal("print stream native called without a receiver"))?
        .as_instance()?;
    let fd = stream.get_field("fd", "I")?.as_int()?;
    let payload = if newline {
        format!("{text}\n")
    } else {
        text.to_string()
    };
    if fd == 2 {
        let _ = std::io::stderr().write_all(payload.as_bytes());
    } else {
        let _ = std::io::stdout().write_all(payload.as_bytes());
    }
    Ok(())
}

pub(super) fn register(vm: &Arc<Vm>) {
    let natives = vm.natives();

    natives.register_instance("java/io/PrintStream", "println", "()V", |_, this, _| {
        write_stream(this, "", true)?;
        Ok(None)
    });
    natives.register_instance(
        "java/io/PrintStream",
        "println",
        "(Ljava/lang/String;)V",
        |_, this, params| {
            let text = strings::get_string_or_null(&params[0])?.unwrap_or_else(|| "null".into());
            write_stream(this, &text, true)?;
            Ok(None)
        },
    );
    natives.register_instance(
        "java/io/PrintStream",
        "println",
        "(Ljava/lang/Object;)V",
        |vm, this, params| {
            let text = match &params[0] {
                Value::Null => "null".to_string(),
                Value::Instance(obj) => {
                    let result =
                        obj.call_virtual(vm, "toString", "()Ljava/lang/String;", Vec::new())?;
                    match result {
                        Some(text) if !text.is_null() => strings::get_string(&text)?,
                        _ => "null".to_string(),
                    }
                }
                Value::Array(arr) => arr.descriptor(),
                other => other.kind_name().to_string(),
            };
            write_stream(this, &text, true)?;
            Ok(None)
        },
    );
    natives.register_instance(
        "java/io/PrintStream",
        "println",
        "(I)V",
        |_, this, params| {
            write_stream(this, &params[0].as_int()?.to_string(), true)?;
            Ok(None)
        },
    );
    natives.register_instance(
        "java/io/PrintStream",
        "println",
        "(J)V",
        |_, this, params| {
            write_stream(this, &params[0].as_long()?.to_string(), true)?;
            Ok(None)
        },
    );
    natives.register_instance(
        "java/io/PrintStream",
        "println",
        "(Z)V",
        |_, this, params| {
            let text = if params[0].as_int()? != 0 { "true" } else { "false" };
            write_stream(this, text, true)?;
            Ok(None)
        },
    );
    natives.register_instance(
        "java/io/PrintStream",
        "println",
        "(C)V",
        |_, this, params| {
            let unit = params[0].as_int()? as u16;
            write_stream(this, &String::from_utf16_lossy(&[unit]), true)?;
            Ok(None)
        },
    );
    natives.register_instance(
        "java/io/PrintStream",
        "println",
        "(F)V",
        |_, this, params| {
            let value = params[0].as_float()?;
            write_stream(this, &format!("{value:?}"), true)?;
            Ok(None)
        },
    );
    natives.register_instance(
        "java/io/PrintStream",
        "println",
        "(D)V",
        |_, this, params| {
            let value = params[0].as_double()?;
            write_stream(this, &format!("{value:?}"), true)?;
            Ok(None)
        },
    );
    natives.register_instance(
        "java/io/PrintStream",
        "print",
        "(Ljava/lang/String;)V",
        |_, this, params| {
            let text = strings::get_string_or_null(&params[0])?.unwrap_or_else(|| "null".into());
            write_stream(this, &text, false)?;
            Ok(None)
        },
    );
    natives.register_instance(
        "java/io/PrintStream",
        "print",
        "(I)V",
        |_, this, params| {
            write_stream(this, &params[0].as_int()?.to_string(), false)?;
            Ok(None)
        },
    );
    natives.register_instance(
        "java/io/PrintStream",
        "print",
        "(C)V",
        |_, this, params| {
            let unit = params[0].as_int()? as u16;
            write_stream(this, &String::from_utf16_lossy(&[unit]), false)?;
            Ok(None)
        },
    );
}
