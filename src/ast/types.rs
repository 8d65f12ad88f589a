//! Type and member references
//!
//! These are the handles the metadata reader hands over for the source type
//! system. They are plain values: equality is structural and they are cheap
//! enough to clone into node payloads and cache keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally unique key for a method or function across one translation run
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedMemberId {
    /// Full name of the declaring type
    pub declaring_type: String,
    /// Member name, e.g. `Dispose` or `.ctor`
    pub name: String,
    /// Parameter signature including parentheses, e.g. `(System.Int32)`
    pub signature: String,
}

impl QualifiedMemberId {
    pub fn new(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            signature: signature.into(),
        }
    }

    /// Whether this member is an instance constructor
    pub fn is_constructor(&self) -> bool {
        self.name == ".ctor"
    }
}

impl fmt::Display for QualifiedMemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}{}", self.declaring_type, self.name, self.signature)
    }
}

/// Built-in primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    Bool,
    Int32,
    Int64,
    Float64,
    String,
    Object,
}

/// Static type of a node or variable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeRef {
    Void,
    Primitive(PrimitiveType),
    /// A named type from the source type system
    Named { name: String, value_type: bool },
    Array(Box<TypeRef>),
    /// Managed pointer (`ref T` parameter)
    ByRef(Box<TypeRef>),
    /// Runtime proxy object standing in for a reference to an array element
    ElementReference(Box<TypeRef>),
}

impl TypeRef {
    /// A named reference (class) type
    pub fn class(name: impl Into<String>) -> Self {
        TypeRef::Named {
            name: name.into(),
            value_type: false,
        }
    }

    /// A named value (struct) type
    pub fn value_type(name: impl Into<String>) -> Self {
        TypeRef::Named {
            name: name.into(),
            value_type: true,
        }
    }

    pub fn array_of(element: TypeRef) -> Self {
        TypeRef::Array(Box::new(element))
    }

    pub fn by_ref(target: TypeRef) -> Self {
        TypeRef::ByRef(Box::new(target))
    }

    /// Whether values of this type are user-defined structs
    pub fn is_struct(&self) -> bool {
        matches!(
            self,
            TypeRef::Named {
                value_type: true,
                ..
            }
        )
    }

    pub fn is_by_ref(&self) -> bool {
        matches!(self, TypeRef::ByRef(_))
    }

    /// Name of the type as used for type-system lookups
    pub fn name(&self) -> String {
        match self {
            TypeRef::Void => "System.Void".to_string(),
            TypeRef::Primitive(p) => match p {
                PrimitiveType::Bool => "System.Boolean",
                PrimitiveType::Int32 => "System.Int32",
                PrimitiveType::Int64 => "System.Int64",
                PrimitiveType::Float64 => "System.Double",
                PrimitiveType::String => "System.String",
                PrimitiveType::Object => "System.Object",
            }
            .to_string(),
            TypeRef::Named { name, .. } => name.clone(),
            TypeRef::Array(element) => format!("{}[]", element.name()),
            TypeRef::ByRef(target) => format!("{}&", target.name()),
            TypeRef::ElementReference(element) => format!("ElementReference<{}>", element.name()),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Call target of an invocation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MethodRef {
    /// A member known to the metadata reader
    Member(QualifiedMemberId),
    /// A target the metadata reader could not resolve
    Unresolved { name: String },
}

impl MethodRef {
    pub fn member(&self) -> Option<&QualifiedMemberId> {
        match self {
            MethodRef::Member(id) => Some(id),
            MethodRef::Unresolved { .. } => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MethodRef::Member(id) => &id.name,
            MethodRef::Unresolved { name } => name,
        }
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodRef::Member(id) => write!(f, "{}", id),
            MethodRef::Unresolved { name } => write!(f, "<unresolved {}>", name),
        }
    }
}

/// How an invocation selects its target at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dispatch {
    Direct,
    Virtual,
}

/// Field accessed by a field node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldRef {
    pub declaring_type: String,
    pub name: String,
    pub is_static: bool,
    pub is_readonly: bool,
}

impl FieldRef {
    pub fn instance(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            is_static: false,
            is_readonly: false,
        }
    }

    pub fn static_field(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            name: name.into(),
            is_static: true,
            is_readonly: false,
        }
    }

    pub fn readonly(mut self) -> Self {
        self.is_readonly = true;
        self
    }

    /// Static fields that can change at runtime count as shared mutable state
    pub fn is_mutable_static(&self) -> bool {
        self.is_static && !self.is_readonly
    }
}
