use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Identifier of an isolate (an independent heap + thread of execution) in the
/// inspected VM.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IsolateId(pub String);

/// Identifier of a heap object, scoped to its isolate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl IsolateId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IsolateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstanceKind {
    Null,
    Bool,
    Int,
    Double,
    String,
    List,
    Map,
    Set,
    Record,
    PlainInstance,
    Type,
    Closure,
}

impl InstanceKind {
    /// Kinds whose `value_as_string` fully describes the value.
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            Self::Null | Self::Bool | Self::Int | Self::Double | Self::String
        )
    }

    /// Kinds whose contents are addressed by index and fetched in windows.
    pub fn is_indexed(self) -> bool {
        matches!(self, Self::List | Self::Set)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryRef {
    pub id: ObjectId,
    pub name: String,
    pub uri: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRef {
    pub id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub library: Option<LibraryRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRef {
    pub id: ObjectId,
    pub uri: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceLocation {
    pub script: ScriptRef,
    #[serde(default)]
    pub line: Option<u32>,
}

/// Declaration that owns a function.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FuncOwner {
    Library(LibraryRef),
    Class(ClassRef),
    Function(Box<FuncRef>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FuncRef {
    pub id: ObjectId,
    pub name: String,
    pub owner: FuncOwner,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_const: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRef {
    pub id: ObjectId,
    pub name: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub declared_type: Option<String>,
}

/// Reference to a remote instance.
///
/// Equality and hashing only consider the owning isolate and the object id;
/// the remaining fields are descriptive snapshots taken when the reference was
/// surfaced.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRef {
    pub id: ObjectId,
    pub isolate: IsolateId,
    pub kind: InstanceKind,
    #[serde(default)]
    pub class: Option<ClassRef>,
    #[serde(default)]
    pub value_as_string: Option<String>,
    #[serde(default)]
    pub length: Option<usize>,
    /// For `Type` instances, the class the type denotes.
    #[serde(default)]
    pub type_class: Option<ClassRef>,
}

impl PartialEq for InstanceRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.isolate == other.isolate
    }
}

impl Eq for InstanceRef {}

impl Hash for InstanceRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.isolate.hash(state);
    }
}

impl InstanceRef {
    pub fn class_name(&self) -> Option<&str> {
        self.class.as_ref().map(|c| c.name.as_str())
    }

    /// Short human readable rendering used by variable trees.
    pub fn display_string(&self) -> String {
        match self.kind {
            InstanceKind::Null => "null".to_string(),
            InstanceKind::String => {
                format!("'{}'", self.value_as_string.as_deref().unwrap_or_default())
            }
            kind if kind.is_primitive() => self
                .value_as_string
                .clone()
                .unwrap_or_else(|| "<unknown>".to_string()),
            InstanceKind::List | InstanceKind::Map | InstanceKind::Set => {
                let class = self.class_name().unwrap_or("Object");
                match self.length {
                    Some(length) => format!("{class} (length: {length})"),
                    None => class.to_string(),
                }
            }
            InstanceKind::Type => match &self.type_class {
                Some(class) => format!("Type ({})", class.name),
                None => "Type".to_string(),
            },
            InstanceKind::Closure => "Closure".to_string(),
            _ => format!("Instance of '{}'", self.class_name().unwrap_or("Object")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentinelKind {
    Collected,
    Expired,
    NotInitialized,
    BeingInitialized,
    OptimizedOut,
    Free,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sentinel {
    pub kind: SentinelKind,
    pub value_as_string: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRef {
    pub id: ObjectId,
    pub message: String,
}

/// Anything the service can hand back where a value is expected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Value {
    Instance(InstanceRef),
    Sentinel(Sentinel),
    Error(ErrorRef),
}

impl Value {
    pub fn as_instance(&self) -> Option<&InstanceRef> {
        match self {
            Self::Instance(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.as_instance().is_some_and(|i| i.kind.is_primitive())
    }

    pub fn display_string(&self) -> String {
        match self {
            Self::Instance(instance) => instance.display_string(),
            Self::Sentinel(sentinel) => sentinel.value_as_string.clone(),
            Self::Error(error) => format!("<error: {}>", error.message),
        }
    }

    /// String form used as a display name (map keys): strings are not quoted.
    pub fn key_string(&self) -> String {
        match self {
            Self::Instance(instance) if instance.kind == InstanceKind::String => {
                instance.value_as_string.clone().unwrap_or_default()
            }
            other => other.display_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapAssociation {
    pub key: Value,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldName {
    Positional(usize),
    Named(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundField {
    pub name: FieldName,
    pub value: Value,
}

/// Full instance contents, possibly windowed by `offset`/`count`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub reference: InstanceRef,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub elements: Option<Vec<Value>>,
    #[serde(default)]
    pub associations: Option<Vec<MapAssociation>>,
    #[serde(default)]
    pub fields: Vec<BoundField>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub reference: ClassRef,
    pub library: LibraryRef,
    #[serde(default)]
    pub super_class: Option<ClassRef>,
    #[serde(default)]
    pub fields: Vec<FieldRef>,
    #[serde(default)]
    pub functions: Vec<FuncRef>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryDependency {
    /// `false` for `export` directives.
    pub is_import: bool,
    #[serde(default)]
    pub is_deferred: bool,
    #[serde(default)]
    pub prefix: Option<String>,
    pub target: LibraryRef,
    #[serde(default)]
    pub shows: Vec<String>,
    #[serde(default)]
    pub hides: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    pub reference: LibraryRef,
    #[serde(default)]
    pub variables: Vec<FieldRef>,
    #[serde(default)]
    pub functions: Vec<FuncRef>,
    #[serde(default)]
    pub classes: Vec<ClassRef>,
    #[serde(default)]
    pub dependencies: Vec<LibraryDependency>,
}

/// Result of `get_object`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Obj {
    Instance(Instance),
    Class(Class),
    Library(Library),
    Sentinel(Sentinel),
}

impl Obj {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Instance(_) => "Instance",
            Self::Class(_) => "Class",
            Self::Library(_) => "Library",
            Self::Sentinel(_) => "Sentinel",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundVariable {
    pub name: String,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    pub index: usize,
    #[serde(default)]
    pub function: Option<FuncRef>,
    #[serde(default)]
    pub location: Option<SourceLocation>,
    #[serde(default)]
    pub vars: Vec<BoundVariable>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stack {
    pub frames: Vec<Frame>,
}
