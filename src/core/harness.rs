//! HC-008: Type resolution and catalog materialization.
//!
//! The operations that turn a descriptor plus a scope into catalog entries:
//! realize a singleton resource, resolve the parent chain, bind parameters,
//! and run a body exactly once per resource.
//!
//! Call discipline: `evaluate_code` is not self-guarding. Callers go through
//! [`evaluate_resource`], which checks and sets the resource's `evaluated`
//! flag before running the body.

use super::catalog::{Resource, ResourceId};
use super::collection::TypeId;
use super::compiler::Compiler;
use super::descriptor::{Body, MAIN_TITLE};
use super::error::{CompileError, Result};
use super::eval;
use super::scope::{NewScope, ScopeId};
use super::types::{TypeKind, Value};
use indexmap::IndexMap;
use tracing::{debug, trace};

/// Realize the singleton resource for a class or node.
///
/// Returns the existing resource unchanged when one is already in the
/// catalog; `parameters` are ignored on that path. An existing resource with
/// the same identity but a different source is a duplicate. Otherwise the
/// direct parent
/// is realized first, then the new resource is added and the catalog tagged
/// with its title and every ancestor name.
pub fn ensure_in_catalog(
    ctx: &mut Compiler,
    ty: TypeId,
    scope: ScopeId,
    parameters: Option<IndexMap<String, Value>>,
) -> Result<ResourceId> {
    let descriptor = ctx.types.get(ty);
    if descriptor.is_definition() {
        return Err(CompileError::InvalidOperation(format!(
            "cannot realize define '{}' as a singleton; declare an instance instead",
            descriptor.name()
        )));
    }
    let tag = descriptor.resource_tag();
    let title = descriptor.resource_title();

    if let Some(existing) = ctx.catalog.resource(&tag, &title) {
        let resource = ctx.catalog.get(existing);
        if resource.source() != Some(ty) {
            return Err(CompileError::DuplicateResource {
                reference: resource.reference(),
            });
        }
        trace!(resource = %resource.reference(), "already in catalog");
        return Ok(existing);
    }

    let ancestors = ancestry(ctx, ty, Some(scope))?;
    if let Some(&parent) = ancestors.first() {
        ensure_in_catalog(ctx, parent, scope, None)?;
    }

    let mut resource = Resource::new(&tag, &title, scope).with_source(ty);
    for (param, value) in parameters.into_iter().flatten() {
        resource.set(&param, value);
    }
    let reference = resource.reference();
    let id = ctx.catalog.add_resource(resource)?;

    let ancestor_names: Vec<String> = ancestors
        .iter()
        .map(|&a| ctx.types.get(a).name().to_string())
        .collect();
    ctx.catalog.tag(std::iter::once(title).chain(ancestor_names));
    debug!(resource = %reference, "realized");
    Ok(id)
}

/// Resolve a descriptor's parent, caching the result on the descriptor.
///
/// A cached parent is returned regardless of `scope`. Resolution itself needs
/// a scope: the parent is looked up relative to the descriptor's namespace,
/// then the scope's namespace.
pub fn resolve_parent(ctx: &Compiler, ty: TypeId, scope: Option<ScopeId>) -> Result<Option<TypeId>> {
    let descriptor = ctx.types.get(ty);
    let parent_name = match &descriptor.parent {
        Some(p) => p,
        None => return Ok(None),
    };
    if let Some(cached) = descriptor.resolved_parent() {
        return Ok(Some(cached));
    }
    let scope = scope.ok_or_else(|| CompileError::NoScope {
        kind: descriptor.kind(),
        name: descriptor.name().to_string(),
    })?;

    let kind = descriptor.kind();
    let found = match kind {
        TypeKind::Definition => {
            return Err(CompileError::InvalidOperation(format!(
                "define '{}' cannot inherit",
                descriptor.name()
            )))
        }
        TypeKind::Node => ctx.types.node(parent_name),
        TypeKind::Hostclass => ctx
            .types
            .find(kind, descriptor.namespace(), parent_name)
            .or_else(|| {
                ctx.types
                    .find(kind, &ctx.scopes.get(scope).namespace, parent_name)
            }),
    };
    let parent = found.ok_or_else(|| CompileError::UnresolvableParent {
        kind,
        name: descriptor.name().to_string(),
        parent: parent_name.clone(),
    })?;
    Ok(Some(descriptor.cache_parent(parent)))
}

/// The full parent chain, nearest first. A cycle fails instead of looping.
pub fn ancestry(ctx: &Compiler, ty: TypeId, scope: Option<ScopeId>) -> Result<Vec<TypeId>> {
    let mut chain = vec![ty];
    let mut current = ty;
    while let Some(parent) = resolve_parent(ctx, current, scope)? {
        if chain.contains(&parent) {
            chain.push(parent);
            let names: Vec<&str> = chain.iter().map(|&t| ctx.types.get(t).name()).collect();
            return Err(CompileError::ParentCycle {
                kind: ctx.types.get(ty).kind(),
                chain: names.join(" -> "),
            });
        }
        chain.push(parent);
        current = parent;
    }
    chain.remove(0);
    Ok(chain)
}

/// Evaluate a resource's descriptor unless that already happened.
pub fn evaluate_resource(ctx: &mut Compiler, id: ResourceId) -> Result<()> {
    let resource = ctx.catalog.get_mut(id);
    if resource.is_evaluated() {
        return Ok(());
    }
    resource.mark_evaluated();
    match resource.source() {
        Some(ty) => evaluate_code(ctx, ty, id),
        None => Ok(()),
    }
}

/// Run a descriptor's body for a resource.
///
/// Not self-guarding: a second call runs the body again.
pub fn evaluate_code(ctx: &mut Compiler, ty: TypeId, id: ResourceId) -> Result<()> {
    let descriptor = ctx.types.get(ty);
    let kind = descriptor.kind();
    let namespace = descriptor.namespace().to_string();
    let module_name = descriptor.module_name.clone();
    let has_parent = descriptor.parent.is_some();
    let resource = ctx.catalog.get(id);
    let title = resource.title().to_string();
    let enclosing = resource.scope();
    debug!(resource = %resource.reference(), %kind, "evaluating");

    if kind != TypeKind::Definition {
        ctx.catalog.add_class(&title);
    }

    let scope = if kind == TypeKind::Hostclass && title == MAIN_TITLE {
        enclosing
    } else {
        ctx.scopes.newscope(
            enclosing,
            NewScope {
                source: Some(ty),
                dynamic: true,
                namespace,
                resource: Some(id),
                module_name,
            },
        )
    };

    if has_parent && kind != TypeKind::Definition {
        if let Some(&parent) = ancestry(ctx, ty, Some(scope))?.first() {
            let parent_resource = ensure_in_catalog(ctx, parent, enclosing, None)?;
            evaluate_resource(ctx, parent_resource)?;
            if let Some(parent_scope) = ctx.scopes.class_scope(parent) {
                ctx.scopes.set_parent(scope, parent_scope);
            }
        }
    }

    set_resource_parameters(ctx, ty, id, scope)?;

    if kind != TypeKind::Definition {
        ctx.scopes.set_class_scope(ty, scope);
    }

    match ctx.types.get(ty).body.clone() {
        Some(body) => run_body(ctx, &body, ty, id, scope),
        None => Ok(()),
    }
}

fn run_body(ctx: &mut Compiler, body: &Body, ty: TypeId, id: ResourceId, scope: ScopeId) -> Result<()> {
    match body {
        Body::Code(expr) => eval::evaluate(ctx, expr, scope).map(|_| ()),
        Body::Native(native) => (native.0)(ctx, id, scope, ty),
        Body::Sequence(parts) => {
            for part in parts {
                run_body(ctx, part, ty, id, scope)?;
            }
            Ok(())
        }
    }
}

/// Bind a resource's parameters into its evaluation scope.
///
/// Supplied parameters are validated and bound first, so an explicit `name`
/// or `title` wins over the synthesized ones. Declared parameters the resource
/// does not supply get their default, evaluated in `scope` and written back
/// onto the resource.
pub fn set_resource_parameters(
    ctx: &mut Compiler,
    ty: TypeId,
    id: ResourceId,
    scope: ScopeId,
) -> Result<()> {
    let descriptor = ctx.types.get(ty);
    let kind = descriptor.kind();
    let type_name = descriptor.name().to_string();
    let module_name = descriptor.module_name.clone();
    let declared = descriptor.parameters.clone();
    let resource = ctx.catalog.get(id);
    let reference = resource.reference();
    let supplied = resource.parameters().clone();
    let mut title = resource.title().to_string();
    let mut name = resource.name();
    let caller_module = ctx.scopes.module_name(resource.scope()).map(str::to_string);

    for (param, value) in &supplied {
        if !descriptor.is_valid_parameter(param) {
            return Err(CompileError::UnknownParameter {
                param: param.clone(),
                kind,
                name: type_name,
                reference,
            });
        }
        ctx.scopes.bind(scope, param, value.coerce());
    }

    if kind == TypeKind::Hostclass {
        title = title.to_lowercase();
        name = name.to_lowercase();
    }
    if !supplied.contains_key("title") {
        ctx.scopes.bind(scope, "title", Value::Str(title));
    }
    if !supplied.contains_key("name") {
        ctx.scopes.bind(scope, "name", Value::Str(name));
    }
    if let Some(module_name) = module_name {
        if !supplied.contains_key("module_name") {
            ctx.scopes.bind(scope, "module_name", Value::Str(module_name));
        }
    }
    if let Some(caller) = caller_module {
        if !supplied.contains_key("caller_module_name") {
            ctx.scopes.bind(scope, "caller_module_name", Value::Str(caller));
        }
    }

    for (param, default) in &declared {
        if supplied.contains_key(param) {
            continue;
        }
        let expr = default.as_ref().ok_or_else(|| CompileError::MissingParameter {
            param: param.clone(),
            kind,
            name: type_name.clone(),
            reference: reference.clone(),
        })?;
        let value = eval::evaluate(ctx, expr, scope)?;
        ctx.scopes.bind(scope, param, value.clone());
        ctx.catalog.get_mut(id).set(param, value);
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
