//! Heap objects: a header word plus a lock-protected body

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use indexmap::IndexMap;

use super::header::{Header, FL_FROZEN, FL_SHAREABLE};
use super::Value;

/// Shared pointer to a heap object.
pub type ObjectRef = Arc<HeapObject>;

/// A heap-allocated object.
///
/// The allocator owns layout and lifetime; the guild layer only reads
/// and writes the owner subfield of [`HeapObject::header`].
pub struct HeapObject {
    header: Header,
    body: RwLock<ObjectBody>,
}

/// The payload of a heap object.
#[derive(Debug, Clone)]
pub enum ObjectBody {
    /// Mutable string
    Str(String),

    /// Ordered sequence
    Array(Vec<Value>),

    /// Record with named fields in definition order
    Record(Record),

    /// Weak reference to another heap object
    Weak(Weak<HeapObject>),

    /// Native resource bound to the guild that opened it
    Handle(NativeHandle),
}

/// A record instance with named fields.
///
/// Uses IndexMap to keep fields in definition order.
#[derive(Debug, Clone, Default)]
pub struct Record {
    /// The record's class name (e.g. "Point")
    pub class: String,

    /// Field values in definition order
    pub fields: IndexMap<String, Value>,
}

impl Record {
    /// Create an empty record of the given class
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: IndexMap::new(),
        }
    }

    /// Add a field (builder pattern)
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Get a field by name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// Opaque native resource (thread, socket, file descriptor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeHandle {
    /// What kind of resource this is
    pub resource: String,

    /// Host-side descriptor
    pub descriptor: u64,
}

impl ObjectBody {
    /// Human-readable kind name.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ObjectBody::Str(_) => "String",
            ObjectBody::Array(_) => "Array",
            ObjectBody::Record(_) => "Record",
            ObjectBody::Weak(_) => "WeakRef",
            ObjectBody::Handle(_) => "Handle",
        }
    }

    /// Visit every heap object directly reachable from this body.
    ///
    /// Dead weak targets are skipped.
    pub fn for_each_child(&self, mut visit: impl FnMut(ObjectRef)) {
        match self {
            ObjectBody::Str(_) | ObjectBody::Handle(_) => {}
            ObjectBody::Array(items) => {
                for item in items {
                    if let Value::Object(obj) = item {
                        visit(Arc::clone(obj));
                    }
                }
            }
            ObjectBody::Record(record) => {
                for value in record.fields.values() {
                    if let Value::Object(obj) = value {
                        visit(Arc::clone(obj));
                    }
                }
            }
            ObjectBody::Weak(target) => {
                if let Some(obj) = target.upgrade() {
                    visit(obj);
                }
            }
        }
    }
}

impl HeapObject {
    /// Allocate an object with a fresh header carrying `owner` and no flags.
    pub fn new(body: ObjectBody, owner: u32) -> ObjectRef {
        Arc::new(Self {
            header: Header::new(0, owner),
            body: RwLock::new(body),
        })
    }

    /// The header word.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Whether the object rejects mutation.
    pub fn is_frozen(&self) -> bool {
        self.header.has_flag(FL_FROZEN)
    }

    /// Whether shareability was already established and cached.
    pub fn is_flagged_shareable(&self) -> bool {
        self.header.has_flag(FL_SHAREABLE)
    }

    /// Kind name of the body.
    pub fn kind_name(&self) -> &'static str {
        self.body().kind_name()
    }

    /// Stable address used for identity and visited sets.
    pub fn addr(self: &ObjectRef) -> usize {
        Arc::as_ptr(self) as usize
    }

    /// Read access to the body, bypassing the ownership barrier.
    ///
    /// For the classifier and the transfer walk; guild code reads through
    /// [`crate::ExecContext::read`].
    pub(crate) fn body(&self) -> RwLockReadGuard<'_, ObjectBody> {
        // A poisoned lock only means a writer panicked mid-update; the
        // body is still a valid value.
        self.body.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn body_mut(&self) -> RwLockWriteGuard<'_, ObjectBody> {
        self.body.write().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn freeze(&self) {
        self.header.set_flags(FL_FROZEN);
    }
}

impl std::fmt::Debug for HeapObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapObject")
            .field("header", &self.header)
            .field("body", &*self.body())
            .finish()
    }
}
