//! HC-002: Compilation errors.
//!
//! Every failure surfaces synchronously to the caller of the compilation.
//! Nothing is retried and nothing already realized is rolled back: a failed
//! compilation discards its catalog as a whole.

use super::types::TypeKind;

/// Errors raised while building a type collection or compiling a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// A declared parent does not exist in the type collection.
    #[error("could not find parent {kind} '{parent}' of {kind} '{name}'")]
    UnresolvableParent {
        kind: TypeKind,
        name: String,
        parent: String,
    },

    #[error("cannot resolve the parent of {kind} '{name}' without a scope")]
    NoScope { kind: TypeKind, name: String },

    #[error("inheritance cycle among {kind}s: {chain}")]
    ParentCycle { kind: TypeKind, chain: String },

    #[error("duplicate declaration: {reference} is already in the catalog")]
    DuplicateResource { reference: String },

    /// Caller misuse, e.g. realizing a definition as a singleton.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("cannot merge {source_name} into {dest}: {reason}")]
    MergeIncompatible {
        dest: String,
        source_name: String,
        reason: String,
    },

    #[error("{reference} does not accept parameter '{param}' ({kind} '{name}' does not declare it)")]
    UnknownParameter {
        param: String,
        kind: TypeKind,
        name: String,
        reference: String,
    },

    #[error("must pass parameter '{param}' to {reference} ({kind} '{name}' has no default)")]
    MissingParameter {
        param: String,
        kind: TypeKind,
        name: String,
        reference: String,
    },

    #[error("{kind} '{name}' is already defined")]
    DuplicateType { kind: TypeKind, name: String },

    #[error("could not find class '{0}'")]
    UnknownClass(String),

    #[error("unknown variable '${0}'")]
    UnknownVariable(String),

    #[error("cannot reassign variable '${0}'")]
    VariableReassignment(String),

    #[error("could not find a node definition matching '{0}' and no default node exists")]
    NoMatchingNode(String),

    #[error("invalid node pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    /// Whether this is the catalog's duplicate-resource rejection.
    pub fn is_duplicate_resource(&self) -> bool {
        matches!(self, Self::DuplicateResource { .. })
    }

    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CompileError>;
