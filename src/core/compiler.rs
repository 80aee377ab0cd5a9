//! HC-009: Compilation driver.
//!
//! A `Compiler` owns everything one compilation touches: its own copy of the
//! type collection, the scope arena, and the catalog being built. Compiling
//! several hosts in parallel means one `Compiler` per thread.

use super::catalog::{Catalog, Resource, ResourceId};
use super::collection::TypeCollection;
use super::descriptor::TypeDescriptor;
use super::error::{CompileError, Result};
use super::harness;
use super::scope::{ScopeId, Scopes};
use super::settings::Settings;
use super::types::{TypeKind, Value};
use indexmap::IndexMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// The host a catalog is compiled for.
#[derive(Debug, Clone, Default)]
pub struct NodeInfo {
    /// Lower-cased host name
    pub name: String,
    given: String,
    pub facts: IndexMap<String, Value>,
    /// Classes assigned outside the manifests
    pub classes: Vec<String>,
}

impl NodeInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            given: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_fact(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.facts.insert(name.to_string(), value.into());
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.classes.push(class.to_string());
        self
    }

    /// Candidate names for node matching: the full name, then each shorter
    /// domain prefix. `web01.example.com` → `web01.example.com`,
    /// `web01.example`, `web01`. Case is kept as given so patterns match as
    /// authored; literal node names compare case-insensitively anyway.
    pub fn names(&self) -> Vec<String> {
        let mut names = vec![self.given.clone()];
        let mut current = self.given.as_str();
        while let Some(idx) = current.rfind('.') {
            current = &current[..idx];
            if current.is_empty() {
                break;
            }
            names.push(current.to_string());
        }
        names
    }
}

/// State of one catalog compilation.
pub struct Compiler {
    pub(crate) types: TypeCollection,
    pub(crate) scopes: Scopes,
    pub(crate) catalog: Catalog,
    settings: Settings,
    node: NodeInfo,
}

impl Compiler {
    pub fn new(types: TypeCollection, node: NodeInfo, settings: Settings) -> Self {
        Self {
            types,
            scopes: Scopes::new(),
            catalog: Catalog::new(&node.name),
            settings,
            node,
        }
    }

    pub fn types(&self) -> &TypeCollection {
        &self.types
    }

    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    pub fn scopes_mut(&mut self) -> &mut Scopes {
        &mut self.scopes
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn node(&self) -> &NodeInfo {
        &self.node
    }

    pub fn topscope(&self) -> ScopeId {
        self.scopes.top()
    }

    /// Compile the catalog for this compiler's node.
    pub fn compile(mut self) -> Result<Catalog> {
        let start = Instant::now();
        info!(
            node = %self.node.name,
            environment = self.types.environment(),
            types = self.types.len(),
            "compiling catalog"
        );

        self.bind_facts();
        self.evaluate_main()?;
        self.evaluate_node()?;
        self.evaluate_node_classes()?;
        let definitions = self.evaluate_definitions()?;
        let version = self.catalog.finalize();

        info!(
            node = %self.node.name,
            resources = self.catalog.len(),
            definitions,
            version = %version,
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "catalog compiled"
        );
        Ok(self.catalog)
    }

    fn bind_facts(&mut self) {
        let top = self.topscope();
        for (name, value) in &self.node.facts {
            self.scopes.bind(top, name, value.clone());
        }
        let short = self.node.name.split('.').next().unwrap_or_default().to_string();
        let defaults = [
            ("clientcert", self.node.name.clone()),
            ("fqdn", self.node.name.clone()),
            ("hostname", short),
        ];
        for (name, value) in defaults {
            if !self.node.facts.contains_key(name) {
                self.scopes.bind(top, name, Value::Str(value));
            }
        }
    }

    fn evaluate_main(&mut self) -> Result<()> {
        let main = match self.types.hostclass("") {
            Some(id) => id,
            None => self.types.add(TypeDescriptor::new(TypeKind::Hostclass, ""))?,
        };
        let top = self.topscope();
        let id = harness::ensure_in_catalog(self, main, top, None)?;
        harness::evaluate_resource(self, id)
    }

    fn evaluate_node(&mut self) -> Result<()> {
        let names = self.node.names();
        match self.types.node_for(&names) {
            Some(ty) => {
                debug!(node = %self.node.name, definition = %self.types.get(ty).key(), "node matched");
                let top = self.topscope();
                let id = harness::ensure_in_catalog(self, ty, top, None)?;
                harness::evaluate_resource(self, id)
            }
            None if self.types.ids_of(TypeKind::Node).next().is_some() => {
                Err(CompileError::NoMatchingNode(self.node.name.clone()))
            }
            None => Ok(()),
        }
    }

    fn evaluate_node_classes(&mut self) -> Result<()> {
        let top = self.topscope();
        for class in self.node.classes.clone() {
            self.include_class(top, &class, None)?;
        }
        Ok(())
    }

    /// Evaluate pending defined-type instances until none remain. Returns
    /// how many were evaluated.
    pub fn evaluate_definitions(&mut self) -> Result<usize> {
        let mut evaluated = 0;
        loop {
            let pending = self.catalog.unevaluated();
            if pending.is_empty() {
                return Ok(evaluated);
            }
            for id in pending {
                harness::evaluate_resource(self, id)?;
                evaluated += 1;
            }
        }
    }

    /// Realize and evaluate a class, looked up relative to the scope's
    /// namespace. A class that is already in the catalog is not evaluated
    /// again.
    pub fn include_class(
        &mut self,
        scope: ScopeId,
        name: &str,
        parameters: Option<IndexMap<String, Value>>,
    ) -> Result<ResourceId> {
        let namespace = self.scopes.get(scope).namespace.clone();
        let ty = self
            .types
            .find(TypeKind::Hostclass, &namespace, name)
            .ok_or_else(|| CompileError::UnknownClass(name.to_string()))?;
        let id = harness::ensure_in_catalog(self, ty, scope, parameters)?;
        harness::evaluate_resource(self, id)?;
        Ok(id)
    }

    /// Declare a resource. Defined types are queued for evaluation; any other
    /// type name yields a plain resource. `class` declares a class; `node`
    /// is rejected.
    pub fn declare_resource(
        &mut self,
        scope: ScopeId,
        type_name: &str,
        title: &str,
        parameters: IndexMap<String, Value>,
    ) -> Result<ResourceId> {
        if type_name.eq_ignore_ascii_case("class") {
            return self.include_class(scope, title, Some(parameters));
        }
        if type_name.eq_ignore_ascii_case("node") {
            return Err(CompileError::InvalidOperation(format!(
                "node '{}' cannot be declared as a resource",
                title
            )));
        }
        let namespace = self.scopes.get(scope).namespace.clone();
        let mut resource = match self.types.find(TypeKind::Definition, &namespace, type_name) {
            Some(ty) => Resource::new(&self.types.get(ty).resource_tag(), title, scope).with_source(ty),
            None => Resource::new(type_name, title, scope),
        };
        for (param, value) in parameters {
            resource.set(&param, value);
        }
        let reference = resource.reference();
        let id = self.catalog.add_resource(resource)?;
        debug!(resource = %reference, "declared");
        Ok(id)
    }

    /// Look up a variable. `a::b::x` reads `x` from class `a::b`'s scope and
    /// `::x` from the top scope; a bare name walks the scope chain.
    pub fn lookup_var(&self, scope: ScopeId, name: &str) -> Result<Value> {
        let found = match name.rsplit_once("::") {
            Some(("", var)) => self.scopes.lookup(self.topscope(), var),
            Some((class, var)) => {
                let class_scope = self
                    .types
                    .hostclass(class)
                    .and_then(|ty| self.scopes.class_scope(ty));
                match class_scope {
                    Some(s) => self.scopes.lookup(s, var),
                    None => {
                        warn!(variable = name, class, "class not evaluated; cannot look up variable");
                        None
                    }
                }
            }
            None => self.scopes.lookup(scope, name),
        };
        match found {
            Some(value) => Ok(value.clone()),
            None if self.settings.strict_variables => {
                Err(CompileError::UnknownVariable(name.to_string()))
            }
            None => {
                debug!(variable = name, "undefined variable");
                Ok(Value::Undef)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
