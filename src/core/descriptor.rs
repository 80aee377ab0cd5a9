//! HC-003: Type descriptors — one class, node, or defined type.
//!
//! A descriptor is immutable once the collection is built, except for the
//! write-once `resolved_parent` cache and class merging. Parents are named by
//! string because forward references across manifest files are legal; the
//! harness resolves them on first use.

use super::catalog::ResourceId;
use super::collection::TypeId;
use super::compiler::Compiler;
use super::error::{CompileError, Result};
use super::scope::ScopeId;
use super::types::{Expr, TypeKind};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Title of the resource realized for the unnamed top-level class.
pub const MAIN_TITLE: &str = "main";

/// Cross-cutting control attributes every type accepts.
pub const METAPARAMS: &[&str] = &[
    "alias",
    "audit",
    "before",
    "check",
    "loglevel",
    "noop",
    "notify",
    "require",
    "schedule",
    "stage",
    "subscribe",
    "tag",
];

/// Signature of a pre-linked body: invoked once with the resource, the
/// evaluation scope, and the descriptor being evaluated.
pub type NativeFn = dyn Fn(&mut Compiler, ResourceId, ScopeId, TypeId) -> Result<()> + Send + Sync;

/// An opaque, pre-linked body.
#[derive(Clone)]
pub struct NativeBody(pub Arc<NativeFn>);

impl fmt::Debug for NativeBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NativeBody(..)")
    }
}

/// What runs when a descriptor is evaluated.
#[derive(Debug, Clone)]
pub enum Body {
    Code(Expr),
    Native(NativeBody),
    /// Bodies of a reopened class, in declaration order
    Sequence(Vec<Body>),
}

impl Body {
    fn into_parts(self) -> Vec<Body> {
        match self {
            Self::Sequence(parts) => parts,
            other => vec![other],
        }
    }
}

/// A class, node, or defined type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    kind: TypeKind,
    name: String,
    namespace: String,
    name_regex: Option<Regex>,
    pub parent: Option<String>,
    /// Declared parameters with optional default expressions (order-preserving)
    pub parameters: IndexMap<String, Option<Expr>>,
    pub body: Option<Body>,
    pub module_name: Option<String>,
    pub doc: String,
    pub file: Option<PathBuf>,
    pub line: Option<usize>,
    resolved_parent: OnceCell<TypeId>,
}

impl TypeDescriptor {
    /// Create a descriptor named by a literal string.
    pub fn new(kind: TypeKind, name: &str) -> Self {
        let name = normalize_name(name);
        let namespace = match kind {
            TypeKind::Hostclass => name.clone(),
            TypeKind::Node | TypeKind::Definition => qualifier(&name).to_string(),
        };
        Self {
            kind,
            name,
            namespace,
            name_regex: None,
            parent: None,
            parameters: IndexMap::new(),
            body: None,
            module_name: None,
            doc: String::new(),
            file: None,
            line: None,
            resolved_parent: OnceCell::new(),
        }
    }

    /// Create a node named by a regular expression.
    pub fn node_pattern(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| CompileError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        let mut node = Self::new(TypeKind::Node, "");
        node.name = pattern_display_name(pattern);
        node.namespace = String::new();
        node.name_regex = Some(regex);
        Ok(node)
    }

    /// Name the parent. A leading `::` is kept so resolution starts at the
    /// top level; a `/re/` pattern key is kept as authored.
    pub fn with_parent(mut self, parent: &str) -> Self {
        self.parent = Some(if parent.starts_with('/') {
            parent.to_string()
        } else {
            parent.to_lowercase()
        });
        self
    }

    pub fn with_parameter(mut self, name: &str, default: Option<Expr>) -> Self {
        self.parameters.insert(name.to_string(), default);
        self
    }

    pub fn with_code(mut self, code: Expr) -> Self {
        self.body = Some(Body::Code(code));
        self
    }

    pub fn with_native<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut Compiler, ResourceId, ScopeId, TypeId) -> Result<()> + Send + Sync + 'static,
    {
        self.body = Some(Body::Native(NativeBody(Arc::new(f))));
        self
    }

    pub fn with_module(mut self, module_name: &str) -> Self {
        self.module_name = Some(module_name.to_string());
        self
    }

    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = doc.to_string();
        self
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_hostclass(&self) -> bool {
        self.kind == TypeKind::Hostclass
    }

    pub fn is_node(&self) -> bool {
        self.kind == TypeKind::Node
    }

    pub fn is_definition(&self) -> bool {
        self.kind == TypeKind::Definition
    }

    pub fn name_is_regex(&self) -> bool {
        self.name_regex.is_some()
    }

    /// Key under which the collection stores this descriptor.
    pub fn key(&self) -> String {
        match &self.name_regex {
            Some(re) => format!("/{}/", re.as_str()),
            None => self.name.clone(),
        }
    }

    /// Resource tag used for catalog entries of this type.
    pub fn resource_tag(&self) -> String {
        match self.kind {
            TypeKind::Hostclass => "Class".to_string(),
            TypeKind::Node => "Node".to_string(),
            TypeKind::Definition => capitalize_type(&self.name),
        }
    }

    /// Title of the singleton resource; the unnamed top-level class is `main`.
    pub fn resource_title(&self) -> String {
        if self.is_hostclass() && self.name.is_empty() {
            MAIN_TITLE.to_string()
        } else {
            self.name.clone()
        }
    }

    /// Match a candidate hostname. Patterns match as authored; literal names
    /// compare case-insensitively.
    pub fn matches(&self, candidate: &str) -> bool {
        match &self.name_regex {
            Some(re) => re.is_match(candidate),
            None => self.name.eq_ignore_ascii_case(candidate),
        }
    }

    /// Whether a resource of this type may carry the given parameter.
    pub fn is_valid_parameter(&self, param: &str) -> bool {
        param == "name"
            || param == "title"
            || self.parameters.contains_key(param)
            || METAPARAMS.contains(&param)
    }

    pub fn resolved_parent(&self) -> Option<TypeId> {
        self.resolved_parent.get().copied()
    }

    /// Cache the resolved parent. The first write wins.
    pub(crate) fn cache_parent(&self, parent: TypeId) -> TypeId {
        *self.resolved_parent.get_or_init(|| parent)
    }

    /// Merge a reopened class into this one.
    pub fn merge(&mut self, source: TypeDescriptor, freeze_main: bool) -> Result<()> {
        let incompatible = |reason: String| CompileError::MergeIncompatible {
            dest: format!("{} '{}'", self.kind, self.name),
            source_name: format!("{} '{}'", source.kind, source.name),
            reason,
        };
        if !self.is_hostclass() {
            return Err(incompatible(format!(
                "'{}' is not a class; cannot add code to it",
                self.name
            )));
        }
        if !source.is_hostclass() {
            return Err(incompatible(format!(
                "'{}' is not a class; cannot add code from it",
                source.name
            )));
        }
        if freeze_main && self.name.is_empty() {
            return Err(incompatible(
                "top-level code cannot be reopened while freeze_main is enabled".to_string(),
            ));
        }
        if let (Some(mine), Some(theirs)) = (&self.parent, &source.parent) {
            if normalize_name(mine) != normalize_name(theirs) {
                return Err(incompatible(format!(
                    "different parent classes ('{}' vs '{}')",
                    mine, theirs
                )));
            }
        }

        if self.parent.is_none() {
            self.parent = source.parent;
        }
        self.doc.push_str(&source.doc);

        self.body = match (self.body.take(), source.body) {
            (None, theirs) => theirs,
            (mine, None) => mine,
            (Some(mine), Some(theirs)) => {
                let mut parts = mine.into_parts();
                parts.extend(theirs.into_parts());
                Some(Body::Sequence(parts))
            }
        };
        Ok(())
    }
}

// ============================================================================
// Serialized form
// ============================================================================

/// Descriptor as written by `hostcat types --format yaml|json`.
///
/// `arguments` always lists the metaparameters. Bodies are not carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDocument {
    /// Name, or `/re/` for a pattern node
    pub name: String,
    pub kind: TypeKind,
    #[serde(default)]
    pub arguments: IndexMap<String, Option<Expr>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub doc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl TypeDescriptor {
    pub fn to_document(&self) -> TypeDocument {
        let mut arguments = self.parameters.clone();
        for meta in METAPARAMS {
            if !arguments.contains_key(*meta) {
                arguments.insert(meta.to_string(), None);
            }
        }
        TypeDocument {
            name: self.key(),
            kind: self.kind,
            arguments,
            parent: self.parent.clone(),
            doc: self.doc.clone(),
            module: self.module_name.clone(),
            file: self.file.clone(),
            line: self.line,
        }
    }

    /// Rebuild a descriptor without a body. Metaparameters without a default
    /// are dropped from the parameter list.
    pub fn from_document(doc: TypeDocument) -> Result<Self> {
        let mut descriptor = match doc.name.strip_prefix('/').and_then(|n| n.strip_suffix('/')) {
            Some(pattern) if doc.kind == TypeKind::Node => Self::node_pattern(pattern)?,
            _ => Self::new(doc.kind, &doc.name),
        };
        if let Some(parent) = &doc.parent {
            descriptor = descriptor.with_parent(parent);
        }
        descriptor.parameters = doc
            .arguments
            .into_iter()
            .filter(|(name, default)| default.is_some() || !METAPARAMS.contains(&name.as_str()))
            .collect();
        descriptor.doc = doc.doc;
        descriptor.module_name = doc.module;
        descriptor.file = doc.file;
        descriptor.line = doc.line;
        Ok(descriptor)
    }
}

/// Lower-case a name and strip a leading `::`.
pub fn normalize_name(name: &str) -> String {
    name.trim_start_matches("::").to_lowercase()
}

/// All but the last `::` segment of a name.
fn qualifier(name: &str) -> &str {
    match name.rfind("::") {
        Some(idx) => &name[..idx],
        None => "",
    }
}

/// Printable name for a pattern-named node.
pub fn pattern_display_name(pattern: &str) -> String {
    let kept: String = pattern
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.'))
        .collect();
    kept.trim_start_matches('.').to_lowercase()
}

/// `apache::vhost` → `Apache::Vhost`.
pub fn capitalize_type(name: &str) -> String {
    name.split("::")
        .map(|seg| {
            let mut chars = seg.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("::")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn code(s: &str) -> Body {
        Body::Code(Expr::literal(s))
    }

    fn literals(body: &Body) -> Vec<String> {
        match body {
            Body::Code(Expr::Literal(v)) => vec![v.to_string()],
            Body::Sequence(parts) => parts.iter().flat_map(literals).collect(),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_hc003_name_normalized() {
        let t = TypeDescriptor::new(TypeKind::Hostclass, "Foo::Bar");
        assert_eq!(t.name(), "foo::bar");
        let t = TypeDescriptor::new(TypeKind::Hostclass, "::Top");
        assert_eq!(t.name(), "top");
    }

    #[test]
    fn test_hc003_class_namespace_is_name() {
        let t = TypeDescriptor::new(TypeKind::Hostclass, "Foo::Bar::Baz");
        assert_eq!(t.namespace(), "foo::bar::baz");
    }

    #[test]
    fn test_hc003_node_and_definition_namespace_is_qualifier() {
        for kind in [TypeKind::Definition, TypeKind::Node] {
            let t = TypeDescriptor::new(kind, "Foo::Bar::Baz");
            assert_eq!(t.namespace(), "foo::bar");
        }
        assert_eq!(TypeDescriptor::new(TypeKind::Definition, "vhost").namespace(), "");
    }

    #[test]
    fn test_hc003_kind_predicates() {
        assert!(TypeDescriptor::new(TypeKind::Hostclass, "foo").is_hostclass());
        assert!(TypeDescriptor::new(TypeKind::Node, "foo").is_node());
        assert!(TypeDescriptor::new(TypeKind::Definition, "foo").is_definition());
    }

    #[test]
    fn test_hc003_pattern_node_name() {
        let n = TypeDescriptor::node_pattern("ww").unwrap();
        assert!(n.name_is_regex());
        assert_eq!(n.name(), "ww");
        assert_eq!(n.namespace(), "");
        assert_eq!(TypeDescriptor::node_pattern("W").unwrap().name(), "w");
        assert!(!TypeDescriptor::node_pattern("w*w").unwrap().name().contains('*'));
        assert!(!TypeDescriptor::node_pattern(".ww").unwrap().name().starts_with('.'));
    }

    #[test]
    fn test_hc003_pattern_node_normalization_example() {
        let n = TypeDescriptor::node_pattern(".W*w").unwrap();
        assert_eq!(n.name(), "ww");
    }

    #[test]
    fn test_hc003_invalid_pattern() {
        let err = TypeDescriptor::node_pattern("(unclosed").unwrap_err();
        assert!(matches!(err, CompileError::InvalidPattern { .. }));
    }

    #[test]
    fn test_hc003_match_regex() {
        assert!(TypeDescriptor::node_pattern(r"\w").unwrap().matches("foo"));
        assert!(!TypeDescriptor::node_pattern(r"\d").unwrap().matches("foo"));
    }

    #[test]
    fn test_hc003_match_regex_case_as_authored() {
        let n = TypeDescriptor::node_pattern("^WEB").unwrap();
        assert!(n.matches("WEB01"));
        assert!(!n.matches("web01"));
    }

    #[test]
    fn test_hc003_match_literal() {
        assert!(TypeDescriptor::new(TypeKind::Node, "foo").matches("foo"));
        assert!(!TypeDescriptor::new(TypeKind::Node, "foo").matches("bar"));
        assert!(TypeDescriptor::new(TypeKind::Node, "fOo").matches("foO"));
    }

    #[test]
    fn test_hc003_resource_tag_and_title() {
        assert_eq!(TypeDescriptor::new(TypeKind::Hostclass, "top").resource_tag(), "Class");
        assert_eq!(TypeDescriptor::new(TypeKind::Node, "top").resource_tag(), "Node");
        assert_eq!(
            TypeDescriptor::new(TypeKind::Definition, "apache::vhost").resource_tag(),
            "Apache::Vhost"
        );
        assert_eq!(TypeDescriptor::new(TypeKind::Hostclass, "").resource_title(), MAIN_TITLE);
        assert_eq!(TypeDescriptor::new(TypeKind::Hostclass, "x").resource_title(), "x");
    }

    #[test]
    fn test_hc003_valid_parameters() {
        let t = TypeDescriptor::new(TypeKind::Hostclass, "foo").with_parameter("yay", None);
        assert!(t.is_valid_parameter("yay"));
        assert!(t.is_valid_parameter("name"));
        assert!(t.is_valid_parameter("title"));
        assert!(t.is_valid_parameter("require"));
        assert!(!t.is_valid_parameter("yayness"));
    }

    fn round_trip(t: &TypeDescriptor) -> TypeDescriptor {
        let json = serde_json::to_string(&t.to_document()).unwrap();
        TypeDescriptor::from_document(serde_json::from_str(&json).unwrap()).unwrap()
    }

    #[test]
    fn test_hc003_document_keeps_name_and_kind() {
        let t = TypeDescriptor::new(TypeKind::Hostclass, "foo");
        let back = round_trip(&t);
        assert_eq!(back.name(), "foo");
        assert_eq!(back.kind(), TypeKind::Hostclass);
        assert!(back.body.is_none());
    }

    #[test]
    fn test_hc003_document_keeps_arguments() {
        let t = TypeDescriptor::new(TypeKind::Definition, "vhost")
            .with_parameter("one", None)
            .with_parameter("two", Some(Expr::literal("foo")));
        let back = round_trip(&t);
        assert_eq!(back.parameters.get("one"), Some(&None));
        assert_eq!(back.parameters.get("two"), Some(&Some(Expr::literal("foo"))));
        assert!(!back.parameters.contains_key("noop"));
    }

    #[test]
    fn test_hc003_document_lists_metaparams() {
        let doc = TypeDescriptor::new(TypeKind::Hostclass, "foo").to_document();
        assert!(doc.arguments.contains_key("noop"));
        assert!(doc.arguments.contains_key("require"));
    }

    #[test]
    fn test_hc003_document_optional_fields() {
        let bare = serde_json::to_value(TypeDescriptor::new(TypeKind::Hostclass, "foo").to_document()).unwrap();
        for field in ["line", "doc", "file", "parent", "module"] {
            assert!(bare.get(field).is_none(), "{field} should be omitted");
        }

        let mut t = TypeDescriptor::new(TypeKind::Hostclass, "foo")
            .with_parent("bar")
            .with_doc("value")
            .with_module("apache");
        t.file = Some(PathBuf::from("site.yaml"));
        t.line = Some(12);
        let back = round_trip(&t);
        assert_eq!(back.parent.as_deref(), Some("bar"));
        assert_eq!(back.doc, "value");
        assert_eq!(back.module_name.as_deref(), Some("apache"));
        assert_eq!(back.file, Some(PathBuf::from("site.yaml")));
        assert_eq!(back.line, Some(12));
    }

    #[test]
    fn test_hc003_document_pattern_node() {
        let t = TypeDescriptor::node_pattern(r"^WEB\d+").unwrap();
        let yaml = serde_yaml_ng::to_string(&t.to_document()).unwrap();
        let back = TypeDescriptor::from_document(serde_yaml_ng::from_str(&yaml).unwrap()).unwrap();
        assert!(back.name_is_regex());
        assert_eq!(back.key(), t.key());
        assert!(back.matches("WEB01"));
    }

    #[test]
    fn test_hc003_parent_keeps_absolute_prefix() {
        let t = TypeDescriptor::new(TypeKind::Hostclass, "foo").with_parent("::Bar");
        assert_eq!(t.parent.as_deref(), Some("::bar"));
    }

    #[test]
    fn test_hc003_parent_cache_write_once() {
        let t = TypeDescriptor::new(TypeKind::Hostclass, "foo").with_parent("bar");
        assert_eq!(t.resolved_parent(), None);
        assert_eq!(t.cache_parent(TypeId(3)), TypeId(3));
        assert_eq!(t.cache_parent(TypeId(7)), TypeId(3));
        assert_eq!(t.resolved_parent(), Some(TypeId(3)));
    }

    #[test]
    fn test_hc003_merge_requires_class_dest() {
        let mut dest = TypeDescriptor::new(TypeKind::Node, "bar");
        let source = TypeDescriptor::new(TypeKind::Hostclass, "foo");
        assert!(matches!(
            dest.merge(source, false),
            Err(CompileError::MergeIncompatible { .. })
        ));
    }

    #[test]
    fn test_hc003_merge_requires_class_source() {
        let mut dest = TypeDescriptor::new(TypeKind::Hostclass, "bar");
        let source = TypeDescriptor::new(TypeKind::Node, "foo");
        assert!(dest.merge(source, false).is_err());
    }

    #[test]
    fn test_hc003_merge_conflicting_parents() {
        let mut dest = TypeDescriptor::new(TypeKind::Hostclass, "b").with_parent("a");
        let source = TypeDescriptor::new(TypeKind::Hostclass, "d").with_parent("c");
        let err = dest.merge(source, false).unwrap_err();
        assert!(err.to_string().contains("different parent"));
    }

    #[test]
    fn test_hc003_merge_frozen_main() {
        let mut dest = TypeDescriptor::new(TypeKind::Hostclass, "");
        let source = TypeDescriptor::new(TypeKind::Hostclass, "");
        assert!(dest.merge(source.clone(), true).is_err());
        assert!(dest.merge(source, false).is_ok());
    }

    #[test]
    fn test_hc003_merge_adopts_parent() {
        let mut dest = TypeDescriptor::new(TypeKind::Hostclass, "bar");
        let source = TypeDescriptor::new(TypeKind::Hostclass, "foo").with_parent("parent");
        dest.merge(source, false).unwrap();
        assert_eq!(dest.parent.as_deref(), Some("parent"));
    }

    #[test]
    fn test_hc003_merge_docs() {
        let mut dest = TypeDescriptor::new(TypeKind::Hostclass, "bar");
        dest.merge(TypeDescriptor::new(TypeKind::Hostclass, "foo").with_doc("yayness"), false)
            .unwrap();
        assert_eq!(dest.doc, "yayness");

        let mut dest = TypeDescriptor::new(TypeKind::Hostclass, "bar").with_doc("fooness");
        dest.merge(TypeDescriptor::new(TypeKind::Hostclass, "foo").with_doc("yayness"), false)
            .unwrap();
        assert_eq!(dest.doc, "foonessyayness");

        let mut dest = TypeDescriptor::new(TypeKind::Hostclass, "bar").with_doc("kept");
        dest.merge(TypeDescriptor::new(TypeKind::Hostclass, "foo"), false)
            .unwrap();
        assert_eq!(dest.doc, "kept");
    }

    #[test]
    fn test_hc003_merge_adopts_body() {
        let mut dest = TypeDescriptor::new(TypeKind::Hostclass, "bar");
        let mut source = TypeDescriptor::new(TypeKind::Hostclass, "foo");
        source.body = Some(code("bar"));
        dest.merge(source, false).unwrap();
        assert_eq!(literals(dest.body.as_ref().unwrap()), vec!["bar"]);
    }

    #[test]
    fn test_hc003_merge_concatenates_bodies() {
        let mut dest = TypeDescriptor::new(TypeKind::Hostclass, "bar");
        dest.body = Some(Body::Sequence(vec![code("dest")]));
        let mut source = TypeDescriptor::new(TypeKind::Hostclass, "foo");
        source.body = Some(Body::Sequence(vec![code("source")]));
        dest.merge(source, false).unwrap();
        assert_eq!(literals(dest.body.as_ref().unwrap()), vec!["dest", "source"]);
    }

    #[test]
    fn test_hc003_merge_single_bodies_become_sequence() {
        let mut dest = TypeDescriptor::new(TypeKind::Hostclass, "bar");
        dest.body = Some(code("foo"));
        let mut source = TypeDescriptor::new(TypeKind::Hostclass, "foo");
        source.body = Some(code("bar"));
        dest.merge(source, false).unwrap();
        assert!(matches!(dest.body, Some(Body::Sequence(ref p)) if p.len() == 2));
    }

    #[test]
    fn test_hc003_capitalize_type() {
        assert_eq!(capitalize_type("apache::vhost"), "Apache::Vhost");
        assert_eq!(capitalize_type("file"), "File");
    }

    proptest! {
        #[test]
        fn prop_hc003_pattern_names_are_printable(pattern in "[a-zA-Z0-9.*+?^$\\\\-]{0,24}") {
            let name = pattern_display_name(&pattern);
            prop_assert!(!name.starts_with('.'));
            prop_assert!(!name.contains('*'));
            prop_assert_eq!(name.clone(), name.to_lowercase());
        }
    }
}
