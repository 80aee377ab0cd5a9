//! HC-005: Lexical scopes.
//!
//! Scopes live in an arena owned by the compilation and refer to their parent
//! by `ScopeId`, so a child never owns its parent and nothing dangles once the
//! compilation ends. The arena also holds the class-scope side table: the
//! scope created for each evaluated class or node.

use super::catalog::ResourceId;
use super::collection::TypeId;
use super::error::{CompileError, Result};
use super::types::Value;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;

/// Index of a scope within its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub(crate) usize);

/// One variable environment.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: IndexMap<String, Value>,
    pub parent: Option<ScopeId>,
    /// Descriptor whose evaluation created this scope
    pub source: Option<TypeId>,
    pub dynamic: bool,
    pub namespace: String,
    pub resource: Option<ResourceId>,
    pub module_name: Option<String>,
}

impl Scope {
    pub fn vars(&self) -> &IndexMap<String, Value> {
        &self.vars
    }
}

/// Options for [`Scopes::newscope`].
#[derive(Debug, Clone, Default)]
pub struct NewScope {
    pub source: Option<TypeId>,
    pub dynamic: bool,
    pub namespace: String,
    pub resource: Option<ResourceId>,
    pub module_name: Option<String>,
}

/// Arena of every scope created during one compilation.
#[derive(Debug, Clone)]
pub struct Scopes {
    arena: Vec<Scope>,
    class_scopes: FxHashMap<TypeId, ScopeId>,
}

impl Scopes {
    /// Create an arena holding only the top scope.
    pub fn new() -> Self {
        Self {
            arena: vec![Scope::default()],
            class_scopes: FxHashMap::default(),
        }
    }

    pub fn top(&self) -> ScopeId {
        ScopeId(0)
    }

    /// Create a child of `parent`.
    pub fn newscope(&mut self, parent: ScopeId, opts: NewScope) -> ScopeId {
        let id = ScopeId(self.arena.len());
        self.arena.push(Scope {
            vars: IndexMap::new(),
            parent: Some(parent),
            source: opts.source,
            dynamic: opts.dynamic,
            namespace: opts.namespace,
            resource: opts.resource,
            module_name: opts.module_name,
        });
        id
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.arena[id.0]
    }

    pub fn set_parent(&mut self, id: ScopeId, parent: ScopeId) {
        self.arena[id.0].parent = Some(parent);
    }

    /// Assign a variable from manifest code; reassignment in the same scope fails.
    pub fn set_var(&mut self, id: ScopeId, name: &str, value: Value) -> Result<()> {
        let vars = &mut self.arena[id.0].vars;
        if vars.contains_key(name) {
            return Err(CompileError::VariableReassignment(name.to_string()));
        }
        vars.insert(name.to_string(), value);
        Ok(())
    }

    /// Bind a variable, replacing any previous binding in this scope.
    pub fn bind(&mut self, id: ScopeId, name: &str, value: Value) {
        tracing::trace!(scope = id.0, variable = name, value = %value, "bind");
        self.arena[id.0].vars.insert(name.to_string(), value);
    }

    /// Variable defined directly in this scope.
    pub fn lookup_local(&self, id: ScopeId, name: &str) -> Option<&Value> {
        self.arena[id.0].vars.get(name)
    }

    /// Walk the parent chain until the variable is found.
    pub fn lookup(&self, id: ScopeId, name: &str) -> Option<&Value> {
        let mut current = Some(id);
        while let Some(scope_id) = current {
            let scope = &self.arena[scope_id.0];
            if let Some(v) = scope.vars.get(name) {
                return Some(v);
            }
            current = scope.parent;
        }
        None
    }

    /// Every ancestor of a scope, nearest first.
    pub fn ancestors(&self, id: ScopeId) -> Vec<ScopeId> {
        let mut out = Vec::new();
        let mut current = self.arena[id.0].parent;
        while let Some(scope_id) = current {
            out.push(scope_id);
            current = self.arena[scope_id.0].parent;
        }
        out
    }

    /// Module name of the scope, or of its nearest ancestor that has one.
    pub fn module_name(&self, id: ScopeId) -> Option<&str> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .find_map(|s| self.arena[s.0].module_name.as_deref())
    }

    pub fn set_class_scope(&mut self, ty: TypeId, scope: ScopeId) {
        self.class_scopes.insert(ty, scope);
    }

    pub fn class_scope(&self, ty: TypeId) -> Option<ScopeId> {
        self.class_scopes.get(&ty).copied()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}
