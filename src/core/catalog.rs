//! HC-006: Catalog — the realized resources of one compilation.
//!
//! One resource per `(tag, title)`. The catalog also records the tags of
//! included classes (ancestors included) and the ordered list of evaluated
//! classes and nodes. Its version is a BLAKE3 digest of the resource listing.

use super::collection::TypeId;
use super::descriptor::capitalize_type;
use super::error::{CompileError, Result};
use super::scope::ScopeId;
use super::types::Value;
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Index of a resource within its catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceId(pub(crate) usize);

/// A realized resource.
#[derive(Debug, Clone)]
pub struct Resource {
    tag: String,
    title: String,
    params: IndexMap<String, Value>,
    evaluated: bool,
    /// Scope the resource was declared in
    scope: ScopeId,
    /// Descriptor this resource instantiates (classes, nodes, defined types)
    source: Option<TypeId>,
}

impl Resource {
    pub fn new(tag: &str, title: &str, scope: ScopeId) -> Self {
        Self {
            tag: canonical_tag(tag),
            title: title.to_string(),
            params: IndexMap::new(),
            evaluated: false,
            scope,
            source: None,
        }
    }

    pub fn with_source(mut self, source: TypeId) -> Self {
        self.source = Some(source);
        self
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// `Class[base]`, `Apache::Vhost[www]`.
    pub fn reference(&self) -> String {
        format!("{}[{}]", self.tag, self.title)
    }

    /// Explicit `name` parameter, else the title.
    pub fn name(&self) -> String {
        match self.params.get("name") {
            Some(v) if !v.is_undef() => v.to_string(),
            _ => self.title.clone(),
        }
    }

    pub fn get(&self, param: &str) -> Option<&Value> {
        self.params.get(param)
    }

    pub fn set(&mut self, param: &str, value: Value) {
        self.params.insert(param.to_string(), value);
    }

    pub fn parameters(&self) -> &IndexMap<String, Value> {
        &self.params
    }

    pub fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    pub(crate) fn mark_evaluated(&mut self) {
        self.evaluated = true;
    }

    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    pub fn source(&self) -> Option<TypeId> {
        self.source
    }
}

/// Realized resources for one host.
#[derive(Debug, Clone)]
pub struct Catalog {
    name: String,
    version: Option<String>,
    resources: Vec<Resource>,
    index: FxHashMap<(String, String), ResourceId>,
    tags: IndexSet<String>,
    classes: IndexSet<String>,
}

impl Catalog {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: None,
            resources: Vec::new(),
            index: FxHashMap::default(),
            tags: IndexSet::new(),
            classes: IndexSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Find a resource by tag and title.
    pub fn resource(&self, tag: &str, title: &str) -> Option<ResourceId> {
        self.index.get(&resource_key(tag, title)).copied()
    }

    /// Add a resource; a second resource with the same tag and title fails.
    pub fn add_resource(&mut self, resource: Resource) -> Result<ResourceId> {
        let key = resource_key(&resource.tag, &resource.title);
        if self.index.contains_key(&key) {
            return Err(CompileError::DuplicateResource {
                reference: resource.reference(),
            });
        }
        let id = ResourceId(self.resources.len());
        self.resources.push(resource);
        self.index.insert(key, id);
        Ok(id)
    }

    pub fn get(&self, id: ResourceId) -> &Resource {
        &self.resources[id.0]
    }

    pub fn get_mut(&mut self, id: ResourceId) -> &mut Resource {
        &mut self.resources[id.0]
    }

    pub fn tag<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.tags.insert(name.as_ref().to_lowercase());
        }
    }

    pub fn is_tagged(&self, name: &str) -> bool {
        self.tags.contains(&name.to_lowercase())
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn add_class(&mut self, name: &str) {
        self.classes.insert(name.to_string());
    }

    /// Evaluated class and node titles, in evaluation order.
    pub fn classes(&self) -> Vec<&str> {
        self.classes.iter().map(String::as_str).collect()
    }

    pub fn resources(&self) -> impl Iterator<Item = (ResourceId, &Resource)> {
        self.resources
            .iter()
            .enumerate()
            .map(|(i, r)| (ResourceId(i), r))
    }

    /// Resources that instantiate a descriptor but have not been evaluated.
    pub fn unevaluated(&self) -> Vec<ResourceId> {
        self.resources()
            .filter(|(_, r)| r.source.is_some() && !r.evaluated)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Compute and store the catalog version.
    pub fn finalize(&mut self) -> String {
        let version = self.digest();
        self.version = Some(version.clone());
        version
    }

    /// BLAKE3 digest of the canonical resource listing. Returns `"blake3:{hex}"`.
    pub fn digest(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for r in &self.resources {
            hasher.update(r.reference().as_bytes());
            hasher.update(b"\0");
            for (k, v) in &r.params {
                hasher.update(k.as_bytes());
                hasher.update(b"=");
                hasher.update(v.to_string().as_bytes());
                hasher.update(b"\0");
            }
            hasher.update(b"\n");
        }
        format!("blake3:{}", hasher.finalize().to_hex())
    }

    /// Serializable view of the catalog.
    pub fn to_document(&self) -> CatalogDocument {
        CatalogDocument {
            name: self.name.clone(),
            version: self.version.clone(),
            classes: self.classes.iter().cloned().collect(),
            tags: self.tags.iter().cloned().collect(),
            resources: self
                .resources
                .iter()
                .map(|r| ResourceEntry {
                    resource_type: r.tag.clone(),
                    title: r.title.clone(),
                    parameters: r.params.clone(),
                })
                .collect(),
        }
    }
}

/// Catalog as written to disk or stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
}

/// One resource in a [`CatalogDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub title: String,
    #[serde(default)]
    pub parameters: IndexMap<String, Value>,
}

/// `class` → `Class`, `apache::vhost` → `Apache::Vhost`.
pub fn canonical_tag(tag: &str) -> String {
    capitalize_type(&tag.to_lowercase())
}

fn resource_key(tag: &str, title: &str) -> (String, String) {
    let tag = canonical_tag(tag);
    let title = if tag == "Class" || tag == "Node" {
        title.to_lowercase()
    } else {
        title.to_string()
    };
    (tag, title)
}
