//! HC-010: YAML manifest parsing, validation, and collection building.
//!
//! A manifest file declares classes, defined types, nodes, and top-level
//! statements:
//!
//! ```yaml
//! module: ntp
//! classes:
//!   ntp:
//!     inherits: base
//!     params:
//!       server: pool.ntp.org
//!       keys: ~            # required
//!     body:
//!       - set: { conf: "/etc/ntp.conf" }
//!       - resource: file
//!         title: "$conf"
//!         params: { content: "server ${server}" }
//! nodes:
//!   /^web\d+$/:
//!     body:
//!       - include: ntp
//! ```
//!
//! Node keys written `/…/` are patterns. Strings interpolate `$x`, `${x}`,
//! `$::x`, and `$a::b::x`.

use super::collection::TypeCollection;
use super::descriptor::{TypeDescriptor, METAPARAMS};
use super::error::{CompileError, Result};
use super::settings::Settings;
use super::types::{value_from_yaml, Expr, TypeKind, Value};
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

type YamlValue = serde_yaml_ng::Value;

/// One parsed manifest file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub classes: IndexMap<String, TypeDecl>,
    #[serde(default)]
    pub defines: IndexMap<String, TypeDecl>,
    #[serde(default)]
    pub nodes: IndexMap<String, TypeDecl>,
    /// Top-level statements, merged into the unnamed main class
    #[serde(default)]
    pub main: Vec<Statement>,
    /// File the manifest was read from
    #[serde(skip)]
    pub file: Option<PathBuf>,
}

/// A class, define, or node declaration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeDecl {
    #[serde(default)]
    pub inherits: Option<String>,
    #[serde(default)]
    pub doc: String,
    /// Parameters with defaults; `~` marks a required parameter
    #[serde(default)]
    pub params: IndexMap<String, YamlValue>,
    #[serde(default)]
    pub body: Vec<Statement>,
}

/// A statement in a body or in `main`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Statement {
    Set(SetStatement),
    Include(IncludeStatement),
    Class(ClassStatement),
    Resource(ResourceStatement),
}

/// `set: { var: value, ... }`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetStatement {
    pub set: IndexMap<String, YamlValue>,
}

/// `include: name` or `include: [a, b]`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IncludeStatement {
    pub include: OneOrMany,
}

/// `class: name` with optional `params`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClassStatement {
    pub class: String,
    #[serde(default)]
    pub params: IndexMap<String, YamlValue>,
}

/// `resource: type`, `title: ...` with optional `params`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceStatement {
    pub resource: String,
    pub title: YamlValue,
    #[serde(default)]
    pub params: IndexMap<String, YamlValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(s) => vec![s.clone()],
            Self::Many(v) => v.clone(),
        }
    }
}

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a manifest from a string.
pub fn parse_manifest(yaml: &str) -> Result<Manifest> {
    serde_yaml_ng::from_str(yaml).map_err(|e| CompileError::Manifest(format!("YAML parse error: {}", e)))
}

/// Parse a manifest file. Without a `module` key, the module name comes
/// from a `modules/<name>/` component of the path.
pub fn parse_manifest_file(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CompileError::io(format!("failed to read {}", path.display()), e))?;
    let mut manifest: Manifest = serde_yaml_ng::from_str(&content)
        .map_err(|e| CompileError::Manifest(format!("{}: {}", path.display(), e)))?;
    if manifest.module.is_none() {
        manifest.module = module_from_path(path);
    }
    manifest.file = Some(path.to_path_buf());
    Ok(manifest)
}

fn module_from_path(path: &Path) -> Option<String> {
    let parts: Vec<&str> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    parts
        .windows(3)
        .rev()
        .find(|w| w[0] == "modules")
        .map(|w| w[1].to_string())
}

/// Load every `*.yaml` / `*.yml` file under a directory, in path order.
pub fn load_manifest_dir(dir: &Path) -> Result<Vec<Manifest>> {
    if !dir.is_dir() {
        return Err(CompileError::Manifest(format!(
            "manifest directory {} does not exist",
            dir.display()
        )));
    }
    let mut paths = Vec::new();
    for ext in ["yaml", "yml"] {
        let pattern = dir.join("**").join(format!("*.{}", ext));
        let pattern = pattern.to_string_lossy();
        let entries = glob::glob(&pattern)
            .map_err(|e| CompileError::Manifest(format!("bad glob {}: {}", pattern, e)))?;
        for entry in entries {
            let path = entry.map_err(|e| CompileError::Manifest(e.to_string()))?;
            paths.push(path);
        }
    }
    paths.sort();
    debug!(dir = %dir.display(), files = paths.len(), "loading manifests");
    paths.iter().map(|p| parse_manifest_file(p)).collect()
}

// ============================================================================
// Validation
// ============================================================================

/// Validate a parsed manifest. Returns a list of errors (empty = valid).
pub fn validate_manifest(manifest: &Manifest) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut push = |message: String| errors.push(ValidationError { message });

    let sections = [
        (TypeKind::Hostclass, &manifest.classes),
        (TypeKind::Definition, &manifest.defines),
        (TypeKind::Node, &manifest.nodes),
    ];
    for (kind, decls) in sections {
        for (name, decl) in decls {
            if name.trim().is_empty() {
                push(format!("{} with an empty name", kind));
                continue;
            }
            if kind == TypeKind::Node {
                if let Some(pattern) = node_pattern(name) {
                    if let Err(e) = Regex::new(pattern) {
                        push(format!("node /{}/ has an invalid pattern: {}", pattern, e));
                    }
                }
            }
            if let Some(parent) = &decl.inherits {
                if kind == TypeKind::Definition {
                    push(format!("define '{}' cannot inherit from '{}'", name, parent));
                } else if parent.eq_ignore_ascii_case(name) {
                    push(format!("{} '{}' inherits from itself", kind, name));
                }
            }
            for param in decl.params.keys() {
                if METAPARAMS.contains(&param.as_str()) || param == "title" {
                    push(format!(
                        "{} '{}' cannot declare '{}' as a parameter; it is a metaparameter",
                        kind, name, param
                    ));
                }
            }
            for stmt in &decl.body {
                check_statement(stmt, &format!("{} '{}'", kind, name), &mut push);
            }
        }
    }
    for stmt in &manifest.main {
        check_statement(stmt, "main", &mut push);
    }
    errors
}

fn check_statement(stmt: &Statement, owner: &str, push: &mut impl FnMut(String)) {
    match stmt {
        Statement::Resource(r) if r.resource.trim().is_empty() => {
            push(format!("{} declares a resource with an empty type", owner))
        }
        Statement::Class(c) if c.class.trim().is_empty() => {
            push(format!("{} declares a class with an empty name", owner))
        }
        Statement::Include(i) if i.include.to_vec().iter().any(|n| n.trim().is_empty()) => {
            push(format!("{} includes a class with an empty name", owner))
        }
        _ => {}
    }
}

// ============================================================================
// Collection building
// ============================================================================

/// Build a type collection from parsed manifests. Classes declared in more
/// than one place are merged; top-level statements go to the unnamed class.
pub fn build_collection(manifests: &[Manifest], settings: &Settings) -> Result<TypeCollection> {
    let mut types = TypeCollection::new(&settings.environment);
    for manifest in manifests {
        for (name, decl) in &manifest.classes {
            let descriptor = describe(TypeDescriptor::new(TypeKind::Hostclass, name), decl, manifest)?;
            types.merge_class(descriptor, settings.freeze_main)?;
        }
        if !manifest.main.is_empty() {
            let mut main = TypeDescriptor::new(TypeKind::Hostclass, "")
                .with_code(statements_expr(&manifest.main)?);
            main.file = manifest.file.clone();
            types.merge_class(main, settings.freeze_main)?;
        }
        for (name, decl) in &manifest.defines {
            let descriptor = describe(TypeDescriptor::new(TypeKind::Definition, name), decl, manifest)?;
            types.add(descriptor)?;
        }
        for (name, decl) in &manifest.nodes {
            let base = match node_pattern(name) {
                Some(pattern) => TypeDescriptor::node_pattern(pattern)?,
                None => TypeDescriptor::new(TypeKind::Node, name),
            };
            types.add(describe(base, decl, manifest)?)?;
        }
    }
    debug!(types = types.len(), environment = types.environment(), "collection built");
    Ok(types)
}

/// Pattern source of a `/…/` node key.
fn node_pattern(key: &str) -> Option<&str> {
    key.strip_prefix('/')?.strip_suffix('/')
}

fn describe(mut descriptor: TypeDescriptor, decl: &TypeDecl, manifest: &Manifest) -> Result<TypeDescriptor> {
    if let Some(parent) = &decl.inherits {
        descriptor = descriptor.with_parent(parent);
    }
    for (param, default) in &decl.params {
        let default = match default {
            YamlValue::Null => None,
            other => Some(value_expr(other)?),
        };
        descriptor = descriptor.with_parameter(param, default);
    }
    if !decl.body.is_empty() {
        descriptor = descriptor.with_code(statements_expr(&decl.body)?);
    }
    if let Some(module) = &manifest.module {
        descriptor = descriptor.with_module(module);
    }
    descriptor.file = manifest.file.clone();
    Ok(descriptor.with_doc(&decl.doc))
}

fn statements_expr(statements: &[Statement]) -> Result<Expr> {
    statements
        .iter()
        .map(statement_expr)
        .collect::<Result<Vec<_>>>()
        .map(Expr::Block)
}

fn statement_expr(stmt: &Statement) -> Result<Expr> {
    Ok(match stmt {
        Statement::Set(s) => Expr::Block(
            s.set
                .iter()
                .map(|(name, value)| -> Result<Expr> { Ok(Expr::assign(name.as_str(), value_expr(value)?)) })
                .collect::<Result<Vec<_>>>()?,
        ),
        Statement::Include(i) => Expr::Include(i.include.to_vec()),
        Statement::Class(c) => Expr::ClassDecl {
            name: c.class.clone(),
            params: params_expr(&c.params)?,
        },
        Statement::Resource(r) => Expr::Declare {
            type_name: r.resource.clone(),
            title: Box::new(value_expr(&r.title)?),
            params: params_expr(&r.params)?,
        },
    })
}

fn params_expr(params: &IndexMap<String, YamlValue>) -> Result<IndexMap<String, Expr>> {
    params
        .iter()
        .map(|(k, v)| -> Result<(String, Expr)> { Ok((k.clone(), value_expr(v)?)) })
        .collect()
}

/// Convert a YAML value into an expression, interpolating strings.
pub fn value_expr(value: &YamlValue) -> Result<Expr> {
    match value {
        YamlValue::String(s) => Ok(interpolate(s)),
        YamlValue::Sequence(items) => items.iter().map(value_expr).collect::<Result<Vec<_>>>().map(Expr::List),
        YamlValue::Mapping(_) => Err(CompileError::Manifest(
            "hash values are not supported in manifests".to_string(),
        )),
        other => Ok(Expr::Literal(value_from_yaml(other))),
    }
}

fn variable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{((?:::)?[A-Za-z_]\w*(?:::[A-Za-z_]\w*)*)\}|\$((?:::)?[A-Za-z_]\w*(?:::[A-Za-z_]\w*)*)")
            .expect("variable regex must compile")
    })
}

/// Split a string into literal and variable parts. A string that is exactly
/// one variable reference keeps the variable's own value.
pub fn interpolate(s: &str) -> Expr {
    let mut parts = Vec::new();
    let mut last = 0;
    for caps in variable_re().captures_iter(s) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1).or_else(|| caps.get(2))) else {
            continue;
        };
        if whole.start() > last {
            parts.push(Expr::Literal(Value::str(&s[last..whole.start()])));
        }
        parts.push(Expr::var(name.as_str()));
        last = whole.end();
    }
    if parts.is_empty() {
        return Expr::Literal(Value::str(s));
    }
    if last < s.len() {
        parts.push(Expr::Literal(Value::str(&s[last..])));
    }
    if parts.len() == 1 && matches!(parts[0], Expr::Var(_)) {
        return parts.remove(0);
    }
    Expr::Concat(parts)
}
