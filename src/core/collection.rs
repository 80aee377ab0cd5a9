//! HC-004: Type collection — the per-compilation registry of descriptors.
//!
//! Descriptors live in an arena addressed by `TypeId` and are indexed by
//! `(kind, key)`. The collection is `Clone + Send`, so each concurrent
//! compilation can own a private copy.

use super::descriptor::{normalize_name, TypeDescriptor};
use super::error::{CompileError, Result};
use super::types::TypeKind;
use rustc_hash::FxHashMap;

/// Index of a descriptor within its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) usize);

/// Registry of every class, node, and defined type known to a compilation.
#[derive(Debug, Clone)]
pub struct TypeCollection {
    environment: String,
    types: Vec<TypeDescriptor>,
    index: FxHashMap<(TypeKind, String), TypeId>,
}

impl TypeCollection {
    pub fn new(environment: &str) -> Self {
        Self {
            environment: environment.to_string(),
            types: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Register a descriptor. Any existing `(kind, name)` is an error;
    /// reopened classes go through [`TypeCollection::merge_class`].
    pub fn add(&mut self, descriptor: TypeDescriptor) -> Result<TypeId> {
        let key = (descriptor.kind(), descriptor.key());
        if self.index.contains_key(&key) {
            return Err(CompileError::DuplicateType {
                kind: descriptor.kind(),
                name: descriptor.key(),
            });
        }
        let id = TypeId(self.types.len());
        self.types.push(descriptor);
        self.index.insert(key, id);
        Ok(id)
    }

    /// Merge a class into an existing class of the same name, or add it.
    pub fn merge_class(&mut self, descriptor: TypeDescriptor, freeze_main: bool) -> Result<TypeId> {
        match self.lookup(TypeKind::Hostclass, descriptor.name()) {
            Some(id) => {
                self.types[id.0].merge(descriptor, freeze_main)?;
                Ok(id)
            }
            None if !descriptor.is_hostclass() => Err(CompileError::MergeIncompatible {
                dest: format!("class '{}'", descriptor.name()),
                source_name: format!("{} '{}'", descriptor.kind(), descriptor.name()),
                reason: "only classes can be reopened".to_string(),
            }),
            None => self.add(descriptor),
        }
    }

    pub fn get(&self, id: TypeId) -> &TypeDescriptor {
        &self.types[id.0]
    }

    /// Exact lookup, insensitive to case and a leading `::`. Pattern keys
    /// (`/re/`) compare as authored.
    pub fn lookup(&self, kind: TypeKind, name: &str) -> Option<TypeId> {
        self.index.get(&(kind, index_key(name))).copied()
    }

    pub fn hostclass(&self, name: &str) -> Option<TypeId> {
        self.lookup(TypeKind::Hostclass, name)
    }

    pub fn definition(&self, name: &str) -> Option<TypeId> {
        self.lookup(TypeKind::Definition, name)
    }

    pub fn node(&self, name: &str) -> Option<TypeId> {
        self.lookup(TypeKind::Node, name)
    }

    /// Relative lookup from within `namespace`: `ns::name` for the namespace
    /// and each enclosing namespace, then `name`. A leading `::` only looks at
    /// the top level.
    pub fn find(&self, kind: TypeKind, namespace: &str, name: &str) -> Option<TypeId> {
        if name.starts_with("::") {
            return self.lookup(kind, name);
        }
        let mut ns = normalize_name(namespace);
        while !ns.is_empty() {
            if let Some(id) = self.lookup(kind, &format!("{}::{}", ns, name)) {
                return Some(id);
            }
            ns = match ns.rfind("::") {
                Some(idx) => ns[..idx].to_string(),
                None => String::new(),
            };
        }
        self.lookup(kind, name)
    }

    /// Select the node definition for a host. `names` are candidate names,
    /// most specific first. Literal names win over patterns; patterns are
    /// tried in declaration order; `default` is the fallback.
    pub fn node_for(&self, names: &[String]) -> Option<TypeId> {
        for name in names {
            if let Some(id) = self.node(name) {
                return Some(id);
            }
        }
        for id in self.ids_of(TypeKind::Node) {
            let node = self.get(id);
            if node.name_is_regex() && names.iter().any(|n| node.matches(n)) {
                return Some(id);
            }
        }
        self.node("default")
    }

    /// Whether `ancestor` appears in `child`'s resolved parent chain.
    pub fn is_child_of(&self, child: TypeId, ancestor: TypeId) -> bool {
        let mut seen = 0;
        let mut current = self.get(child).resolved_parent();
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            seen += 1;
            if seen > self.types.len() {
                return false;
            }
            current = self.get(id).resolved_parent();
        }
        false
    }

    /// Ids of every descriptor of a kind, in declaration order.
    pub fn ids_of(&self, kind: TypeKind) -> impl Iterator<Item = TypeId> + '_ {
        self.types
            .iter()
            .enumerate()
            .filter(move |(_, t)| t.kind() == kind)
            .map(|(i, _)| TypeId(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &TypeDescriptor)> {
        self.types.iter().enumerate().map(|(i, t)| (TypeId(i), t))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

fn index_key(name: &str) -> String {
    if name.starts_with('/') {
        name.to_string()
    } else {
        normalize_name(name)
    }
}

impl Default for TypeCollection {
    fn default() -> Self {
        Self::new("production")
    }
}
