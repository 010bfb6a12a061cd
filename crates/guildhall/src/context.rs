//! Per-guild execution context
//!
//! The context is the only way guild code reaches the heap. Allocation
//! tags new objects with the current guild, and every read or write goes
//! through the belonging barrier first. Once the guild has terminated its
//! context can no longer touch the heap.

use std::sync::{Arc, Weak};

use crate::belonging::{self, confirm_object};
use crate::config::RuntimeConfig;
use crate::environment::Environment;
use crate::error::{GuildError, Result};
use crate::guild::Guild;
use crate::registry::GuildRegistry;
use crate::value::{GuildId, HeapObject, NativeHandle, ObjectBody, ObjectRef, Record, Value};

/// Execution state bound to one guild.
///
/// Not `Clone`: exactly one context drives a guild.
#[derive(Debug)]
pub struct ExecContext {
    guild: Arc<Guild>,
    registry: Arc<GuildRegistry>,
    env: Environment,
}

impl ExecContext {
    pub(crate) fn new(guild: Arc<Guild>, registry: Arc<GuildRegistry>) -> Self {
        Self {
            guild,
            registry,
            env: Environment::new(),
        }
    }

    /// The guild this context executes in.
    pub fn guild(&self) -> &Arc<Guild> {
        &self.guild
    }

    /// Id of the guild this context executes in.
    #[inline]
    pub fn current_id(&self) -> GuildId {
        self.guild.id()
    }

    /// Whether this context drives the main guild.
    pub fn is_main(&self) -> bool {
        self.guild.is_main()
    }

    /// The process-wide registry.
    pub fn registry(&self) -> &Arc<GuildRegistry> {
        &self.registry
    }

    /// Runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        self.registry.config()
    }

    /// Guild-local bindings.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Guild-local bindings, mutably.
    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    // ═══════════════════════════════════════════════════════════════════
    // Allocation
    // ═══════════════════════════════════════════════════════════════════

    /// Allocate a heap object owned by the current guild.
    pub fn alloc(&self, body: ObjectBody) -> Value {
        let obj = HeapObject::new(body, 0);
        belonging::tag(&obj, self.current_id());
        Value::Object(obj)
    }

    /// Allocate a mutable string.
    pub fn alloc_str(&self, s: impl Into<String>) -> Value {
        self.alloc(ObjectBody::Str(s.into()))
    }

    /// Allocate an array.
    pub fn alloc_array(&self, items: Vec<Value>) -> Value {
        self.alloc(ObjectBody::Array(items))
    }

    /// Allocate a record.
    pub fn alloc_record(&self, record: Record) -> Value {
        self.alloc(ObjectBody::Record(record))
    }

    /// Open a native handle bound to the current guild.
    pub fn alloc_handle(&self, resource: impl Into<String>, descriptor: u64) -> Value {
        self.alloc(ObjectBody::Handle(NativeHandle {
            resource: resource.into(),
            descriptor,
        }))
    }

    /// Allocate a weak reference to a heap object.
    pub fn alloc_weak(&self, target: &Value) -> Result<Value> {
        let obj = expect_object(target)?;
        Ok(self.alloc(ObjectBody::Weak(Arc::downgrade(obj))))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Barrier-checked access
    // ═══════════════════════════════════════════════════════════════════

    /// Read an object's body.
    pub fn read<R>(&self, value: &Value, f: impl FnOnce(&ObjectBody) -> R) -> Result<R> {
        self.guild.ensure_running()?;
        let obj = expect_object(value)?;
        confirm_object(self, obj);
        let body = obj.body();
        Ok(f(&body))
    }

    /// Mutate an object's body. Frozen objects are rejected.
    pub fn write<R>(&self, value: &Value, f: impl FnOnce(&mut ObjectBody) -> R) -> Result<R> {
        self.guild.ensure_running()?;
        let obj = expect_object(value)?;
        confirm_object(self, obj);
        if obj.is_frozen() {
            return Err(GuildError::Frozen {
                kind: obj.kind_name(),
            });
        }
        let mut body = obj.body_mut();
        Ok(f(&mut body))
    }

    /// Append to an array.
    pub fn push(&self, array: &Value, item: Value) -> Result<()> {
        self.write(array, |body| match body {
            ObjectBody::Array(items) => {
                items.push(item);
                Ok(())
            }
            other => Err(GuildError::TypeError {
                expected: "Array",
                got: other.kind_name(),
            }),
        })?
    }

    /// Set a record field.
    pub fn set_field(&self, record: &Value, name: impl Into<String>, value: Value) -> Result<()> {
        self.write(record, |body| match body {
            ObjectBody::Record(record) => {
                record.fields.insert(name.into(), value);
                Ok(())
            }
            other => Err(GuildError::TypeError {
                expected: "Record",
                got: other.kind_name(),
            }),
        })?
    }

    /// Append to a string.
    pub fn append_str(&self, string: &Value, tail: &str) -> Result<()> {
        self.write(string, |body| match body {
            ObjectBody::Str(s) => {
                s.push_str(tail);
                Ok(())
            }
            other => Err(GuildError::TypeError {
                expected: "String",
                got: other.kind_name(),
            }),
        })?
    }

    /// Copy out string contents.
    pub fn string(&self, value: &Value) -> Result<String> {
        self.read(value, |body| match body {
            ObjectBody::Str(s) => Ok(s.clone()),
            other => Err(GuildError::TypeError {
                expected: "String",
                got: other.kind_name(),
            }),
        })?
    }

    /// Copy out array items.
    pub fn items(&self, value: &Value) -> Result<Vec<Value>> {
        self.read(value, |body| match body {
            ObjectBody::Array(items) => Ok(items.clone()),
            other => Err(GuildError::TypeError {
                expected: "Array",
                got: other.kind_name(),
            }),
        })?
    }

    /// Read a record field.
    pub fn field(&self, record: &Value, name: &str) -> Result<Option<Value>> {
        self.read(record, |body| match body {
            ObjectBody::Record(record) => Ok(record.get(name).cloned()),
            other => Err(GuildError::TypeError {
                expected: "Record",
                got: other.kind_name(),
            }),
        })?
    }

    /// Follow a weak reference; `None` once the target is gone.
    pub fn upgrade(&self, weak: &Value) -> Result<Option<Value>> {
        self.read(weak, |body| match body {
            ObjectBody::Weak(target) => Ok(Weak::upgrade(target).map(Value::Object)),
            other => Err(GuildError::TypeError {
                expected: "WeakRef",
                got: other.kind_name(),
            }),
        })?
    }

    /// Freeze a single object. Immediates are already frozen.
    pub fn freeze(&self, value: &Value) -> Result<()> {
        self.guild.ensure_running()?;
        if let Value::Object(obj) = value {
            self.freeze_object(obj);
        }
        Ok(())
    }

    pub(crate) fn freeze_object(&self, obj: &ObjectRef) {
        confirm_object(self, obj);
        obj.freeze();
    }
}

fn expect_object(value: &Value) -> Result<&ObjectRef> {
    value
        .as_object()
        .ok_or_else(|| GuildError::type_error("object", value))
}
