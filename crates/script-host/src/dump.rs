//! Long-form value dumps and conversion of engine values to owned data

use std::mem::MaybeUninit;

use picojs_protocol::{ExceptionKind, ScriptException, ScriptValue};
use rquickjs::convert::Coerced;
use rquickjs::{qjs, Ctx, FromJs, Object, Type, Value};

/// Structural text rendering of any script value
pub(crate) fn dump_long(value: &Value<'_>, max_depth: usize) -> String {
    let mut out = String::new();
    write_value(value, 0, max_depth, &mut out);
    out
}

fn write_value(value: &Value<'_>, depth: usize, max_depth: usize, out: &mut String) {
    match value.type_of() {
        Type::Uninitialized | Type::Undefined => out.push_str("undefined"),
        Type::Null => out.push_str("null"),
        Type::Bool | Type::Int | Type::Float => write_coerced(value, out),
        Type::BigInt => {
            write_coerced(value, out);
            out.push('n');
        }
        Type::String => match string_lossy(value) {
            Some(text) => write_quoted(&text, out),
            None => out.push_str("\"?\""),
        },
        Type::Symbol => out.push_str("Symbol()"),
        Type::Array => write_array(value, depth, max_depth, out),
        Type::Function | Type::Constructor => write_function(value, out),
        Type::Exception => write_error(value, out),
        _ => match value.as_object() {
            Some(object) => write_object(object, depth, max_depth, out),
            None => write_coerced(value, out),
        },
    }
}

/// Contents of a string value, with unpaired surrogates replaced
pub(crate) fn string_lossy(value: &Value<'_>) -> Option<String> {
    value.as_string()?;
    let ctx = value.ctx();
    let raw_ctx = ctx.as_raw().as_ptr();
    let mut len = MaybeUninit::uninit();

    // SAFETY: `value` is a live string of this context; the returned buffer
    // holds `len` bytes and is released with JS_FreeCString below
    unsafe {
        let ptr = qjs::JS_ToCStringLen(raw_ctx, len.as_mut_ptr(), value.as_raw());
        if ptr.is_null() {
            let _ = ctx.catch();
            return None;
        }
        let bytes = std::slice::from_raw_parts(ptr.cast::<u8>(), len.assume_init() as usize);
        let text = String::from_utf8_lossy(bytes).into_owned();
        qjs::JS_FreeCString(raw_ctx, ptr);
        Some(text)
    }
}

/// Read `key`, discarding any exception a getter throws
fn read_property<'js, V: FromJs<'js>>(object: &Object<'js>, key: &str) -> Option<V> {
    match object.get::<_, V>(key) {
        Ok(value) => Some(value),
        Err(err) => {
            discard_exception(object.ctx(), &err);
            None
        }
    }
}

fn discard_exception(ctx: &Ctx<'_>, err: &rquickjs::Error) {
    if matches!(err, rquickjs::Error::Exception) {
        let _ = ctx.catch();
    }
}

fn write_coerced(value: &Value<'_>, out: &mut String) {
    match value.get::<Coerced<String>>() {
        Ok(Coerced(text)) => out.push_str(&text),
        Err(_) => out.push('?'),
    }
}

fn write_quoted(text: &str, out: &mut String) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_array(value: &Value<'_>, depth: usize, max_depth: usize, out: &mut String) {
    let Some(array) = value.as_array() else {
        out.push_str("[Array]");
        return;
    };
    if array.is_empty() {
        out.push_str("[]");
        return;
    }
    if depth >= max_depth {
        out.push_str("[Array]");
        return;
    }

    out.push_str("[ ");
    for (i, item) in array.iter::<Value>().enumerate() {
        if i != 0 {
            out.push_str(", ");
        }
        match item {
            Ok(item) => write_value(&item, depth + 1, max_depth, out),
            Err(err) => {
                discard_exception(array.ctx(), &err);
                out.push('?');
            }
        }
    }
    out.push_str(" ]");
}

fn write_object(object: &Object<'_>, depth: usize, max_depth: usize, out: &mut String) {
    let mut keys = Vec::new();
    for key in object.keys::<String>() {
        match key {
            Ok(key) => keys.push(key),
            Err(err) => discard_exception(object.ctx(), &err),
        }
    }
    if keys.is_empty() {
        out.push_str("{}");
        return;
    }
    if depth >= max_depth {
        out.push_str("[Object]");
        return;
    }

    out.push_str("{ ");
    for (i, key) in keys.iter().enumerate() {
        if i != 0 {
            out.push_str(", ");
        }
        out.push_str(key);
        out.push_str(": ");
        match read_property::<Value>(object, key) {
            Some(value) => write_value(&value, depth + 1, max_depth, out),
            // A getter that throws
            None => out.push_str("[Getter]"),
        }
    }
    out.push_str(" }");
}

fn write_function(value: &Value<'_>, out: &mut String) {
    let name = value
        .as_object()
        .and_then(|f| read_property::<Option<String>>(f, "name").flatten())
        .filter(|name| !name.is_empty());
    match name {
        Some(name) => {
            out.push_str("[Function ");
            out.push_str(&name);
            out.push(']');
        }
        None => out.push_str("[Function]"),
    }
}

fn write_error(value: &Value<'_>, out: &mut String) {
    let Some(error) = value.as_object() else {
        write_coerced(value, out);
        return;
    };
    let fields = ErrorFields::read(error);
    out.push_str(&fields.headline());
    if let Some(stack) = fields.stack.as_deref().map(str::trim_end) {
        if !stack.is_empty() {
            out.push('\n');
            out.push_str(stack);
        }
    }
}

struct ErrorFields {
    name: String,
    message: String,
    stack: Option<String>,
}

impl ErrorFields {
    fn read(error: &Object<'_>) -> Self {
        let text = |key: &str| read_property::<Option<String>>(error, key).flatten();
        Self {
            name: text("name").unwrap_or_else(|| "Error".into()),
            message: text("message").unwrap_or_default(),
            stack: text("stack"),
        }
    }

    fn headline(&self) -> String {
        if self.message.is_empty() {
            self.name.clone()
        } else {
            format!("{}: {}", self.name, self.message)
        }
    }
}

/// Copy a value out of the engine
pub(crate) fn to_script_value(value: &Value<'_>, max_depth: usize) -> ScriptValue {
    match value.type_of() {
        Type::Uninitialized | Type::Undefined => ScriptValue::Undefined,
        Type::Null => ScriptValue::Null,
        Type::Bool => ScriptValue::Bool(value.as_bool().unwrap_or_default()),
        Type::Int | Type::Float => ScriptValue::Number(value.as_number().unwrap_or(f64::NAN)),
        Type::String => match string_lossy(value) {
            Some(text) => ScriptValue::String(text),
            None => ScriptValue::Object(dump_long(value, max_depth)),
        },
        _ => ScriptValue::Object(dump_long(value, max_depth)),
    }
}

/// Describe a caught exception value
pub(crate) fn to_script_exception(
    value: &Value<'_>,
    source_name: &str,
    max_depth: usize,
) -> ScriptException {
    let rendered = dump_long(value, max_depth);

    match value.as_object() {
        Some(object) => {
            let fields = ErrorFields::read(object);
            let kind = if matches!(value.type_of(), Type::Exception) {
                ExceptionKind::from_name(&fields.name)
            } else {
                ExceptionKind::Other
            };
            ScriptException {
                kind,
                name: fields.name,
                message: fields.message,
                stack: fields.stack,
                source_name: source_name.to_string(),
                rendered,
            }
        }
        // `throw 42` and friends
        None => {
            let message = match value.get::<Coerced<String>>() {
                Ok(Coerced(text)) => text,
                Err(_) => rendered.clone(),
            };
            ScriptException {
                kind: ExceptionKind::Other,
                name: "Uncaught".into(),
                message,
                stack: None,
                source_name: source_name.to_string(),
                rendered,
            }
        }
    }
}
