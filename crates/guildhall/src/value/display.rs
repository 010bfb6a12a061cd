//! Display and Debug implementations for Value

use std::fmt;

use super::*;

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{:?}", n),
            Value::Symbol(s) => write!(f, ":{}", s),

            // Shallow: nested objects may form cycles.
            Value::Object(obj) => write!(
                f,
                "#<{}:{:#x} owner={}>",
                obj.kind_name(),
                obj.addr(),
                obj.header().stored_owner()
            ),

            Value::Guild(guild) => match guild.name() {
                Some(name) => write!(f, "#<Guild:{} {}>", guild.id(), name),
                None => write!(f, "#<Guild:{}>", guild.id()),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Object(obj) => match &*obj.body() {
                ObjectBody::Str(s) => write!(f, "{}", s),
                ObjectBody::Array(items) => {
                    write!(f, "[")?;
                    for (i, item) in items.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{:?}", item)?;
                    }
                    write!(f, "]")
                }
                ObjectBody::Record(record) => {
                    write!(f, "{} {{", record.class)?;
                    for (i, (name, value)) in record.fields.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, " {}: {:?}", name, value)?;
                    }
                    write!(f, " }}")
                }
                ObjectBody::Weak(target) => match target.upgrade() {
                    Some(obj) => write!(f, "weak({:?})", Value::Object(obj)),
                    None => write!(f, "weak(<dead>)"),
                },
                ObjectBody::Handle(handle) => {
                    write!(f, "#<{} fd={}>", handle.resource, handle.descriptor)
                }
            },
            other => write!(f, "{:?}", other),
        }
    }
}
