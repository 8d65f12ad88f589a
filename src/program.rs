//! Translation unit handed over by the metadata reader
//!
//! A [`Program`] owns every function tree of one translation run plus the
//! [`TypeSystem`] facts the passes need (value types, overridable members,
//! purity attributes). Each function sits behind its own mutex so workers can
//! rewrite different functions at the same time while the analysis engine
//! reads callees without ever blocking.

use crate::ast::{QualifiedMemberId, Tree, TypeRef};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, TryLockError};

/// Declared facts about a type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub name: String,
    #[serde(default)]
    pub value_type: bool,
    /// `Dispose` on this type has no observable effect
    #[serde(default)]
    pub pure_disposal: bool,
}

/// Declared facts about a member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub id: QualifiedMemberId,
    /// Virtual and not sealed, so a virtual call may land in an override
    #[serde(default)]
    pub overridable: bool,
    /// Marked side-effect free by an attribute on the declaration
    #[serde(default)]
    pub pure: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TypeSystemFile {
    #[serde(default)]
    types: Vec<TypeInfo>,
    #[serde(default)]
    members: Vec<MemberInfo>,
}

/// Read-only view of the source type system
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "TypeSystemFile", into = "TypeSystemFile")]
pub struct TypeSystem {
    types: HashMap<String, TypeInfo>,
    members: HashMap<QualifiedMemberId, MemberInfo>,
}

impl From<TypeSystemFile> for TypeSystem {
    fn from(file: TypeSystemFile) -> Self {
        let mut types = TypeSystem::default();
        for info in file.types {
            types.add_type(info);
        }
        for info in file.members {
            types.add_member(info);
        }
        types
    }
}

impl From<TypeSystem> for TypeSystemFile {
    fn from(types: TypeSystem) -> Self {
        let mut type_list: Vec<TypeInfo> = types.types.into_values().collect();
        type_list.sort_by(|a, b| a.name.cmp(&b.name));
        let mut members: Vec<MemberInfo> = types.members.into_values().collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));
        TypeSystemFile {
            types: type_list,
            members,
        }
    }
}

impl TypeSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&mut self, info: TypeInfo) {
        self.types.insert(info.name.clone(), info);
    }

    pub fn add_member(&mut self, info: MemberInfo) {
        self.members.insert(info.id.clone(), info);
    }

    pub fn type_info(&self, name: &str) -> Option<&TypeInfo> {
        self.types.get(name)
    }

    pub fn member(&self, id: &QualifiedMemberId) -> Option<&MemberInfo> {
        self.members.get(id)
    }

    /// Whether construction of `ty` produces a struct value
    pub fn is_struct(&self, ty: &TypeRef) -> bool {
        ty.is_struct()
            || self
                .type_info(&ty.name())
                .is_some_and(|info| info.value_type)
    }

    /// Whether `Dispose` on `type_name` is declared side-effect free
    pub fn has_pure_disposal(&self, type_name: &str) -> bool {
        self.type_info(type_name)
            .is_some_and(|info| info.pure_disposal)
    }

    pub fn is_overridable(&self, id: &QualifiedMemberId) -> bool {
        self.member(id).is_some_and(|info| info.overridable)
    }

    pub fn is_declared_pure(&self, id: &QualifiedMemberId) -> bool {
        self.member(id).is_some_and(|info| info.pure)
    }
}

/// One lowered method body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Function {
    pub id: QualifiedMemberId,
    pub tree: Tree,
}

impl Function {
    pub fn new(id: QualifiedMemberId, tree: Tree) -> Self {
        Self { id, tree }
    }

    pub fn is_constructor(&self) -> bool {
        self.id.is_constructor()
    }
}

/// Serialized form of a program
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramFile {
    #[serde(default)]
    pub types: TypeSystem,
    #[serde(default)]
    pub functions: Vec<Function>,
}

/// Result of a non-blocking attempt to read a function
pub enum FunctionAccess<'a> {
    Available(MutexGuard<'a, Function>),
    /// Locked by a worker, or by the current thread further up the stack
    Busy,
    Missing,
}

/// All functions of one translation run
#[derive(Debug, Default)]
pub struct Program {
    types: TypeSystem,
    functions: BTreeMap<QualifiedMemberId, Mutex<Function>>,
}

impl Program {
    pub fn new(types: TypeSystem) -> Self {
        Self {
            types,
            functions: BTreeMap::new(),
        }
    }

    /// Build a program from its serialized form, validating every tree
    pub fn from_file(file: ProgramFile) -> Result<Self> {
        let mut program = Program::new(file.types);
        for mut function in file.functions {
            function.tree.relink()?;
            program.add_function(function)?;
        }
        Ok(program)
    }

    pub fn add_function(&mut self, function: Function) -> Result<()> {
        if self.functions.contains_key(&function.id) {
            return Err(Error::internal(format!(
                "function {} is defined twice",
                function.id
            )));
        }
        self.functions
            .insert(function.id.clone(), Mutex::new(function));
        Ok(())
    }

    pub fn types(&self) -> &TypeSystem {
        &self.types
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn contains(&self, id: &QualifiedMemberId) -> bool {
        self.functions.contains_key(id)
    }

    /// Function identifiers in a stable order
    pub fn function_ids(&self) -> Vec<QualifiedMemberId> {
        self.functions.keys().cloned().collect()
    }

    /// Lock a function for rewriting, waiting if necessary
    pub fn lock(&self, id: &QualifiedMemberId) -> Result<MutexGuard<'_, Function>> {
        let slot = self.functions.get(id).ok_or_else(|| Error::UnknownFunction {
            function: id.to_string(),
        })?;
        slot.lock()
            .map_err(|_| Error::internal(format!("function {} was poisoned by a panic", id)))
    }

    /// Lock a function only if nobody holds it
    pub fn try_lock(&self, id: &QualifiedMemberId) -> FunctionAccess<'_> {
        match self.functions.get(id) {
            None => FunctionAccess::Missing,
            Some(slot) => match slot.try_lock() {
                Ok(guard) => FunctionAccess::Available(guard),
                Err(TryLockError::WouldBlock) | Err(TryLockError::Poisoned(_)) => {
                    FunctionAccess::Busy
                }
            },
        }
    }

    /// Consume the program back into its serialized form
    pub fn into_file(self) -> Result<ProgramFile> {
        let mut functions = Vec::with_capacity(self.functions.len());
        for (id, slot) in self.functions {
            let function = slot
                .into_inner()
                .map_err(|_| Error::internal(format!("function {} was poisoned by a panic", id)))?;
            functions.push(function);
        }
        Ok(ProgramFile {
            types: self.types,
            functions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> QualifiedMemberId {
        QualifiedMemberId::new("Demo.Program", name, "()")
    }

    #[test]
    fn test_duplicate_functions_are_rejected() {
        let mut program = Program::new(TypeSystem::new());
        program
            .add_function(Function::new(id("Main"), Tree::new()))
            .unwrap();
        assert!(program
            .add_function(Function::new(id("Main"), Tree::new()))
            .is_err());
    }

    #[test]
    fn test_try_lock_reports_busy_while_locked() {
        let mut program = Program::new(TypeSystem::new());
        program
            .add_function(Function::new(id("Main"), Tree::new()))
            .unwrap();

        let guard = program.lock(&id("Main")).unwrap();
        assert!(matches!(program.try_lock(&id("Main")), FunctionAccess::Busy));
        drop(guard);
        assert!(matches!(
            program.try_lock(&id("Main")),
            FunctionAccess::Available(_)
        ));
        assert!(matches!(
            program.try_lock(&id("Missing")),
            FunctionAccess::Missing
        ));
    }

    #[test]
    fn test_type_system_round_trips_through_json() {
        let mut types = TypeSystem::new();
        types.add_type(TypeInfo {
            name: "Demo.Handle".to_string(),
            value_type: true,
            pure_disposal: true,
        });
        let json = serde_json::to_string(&types).unwrap();
        let back: TypeSystem = serde_json::from_str(&json).unwrap();
        assert!(back.has_pure_disposal("Demo.Handle"));
        assert!(back.is_struct(&TypeRef::class("Demo.Handle")));
    }
}
