//! HC-007: Expression evaluation.

use super::compiler::Compiler;
use super::error::Result;
use super::scope::ScopeId;
use super::types::{Expr, Value};
use indexmap::IndexMap;

/// Evaluate an expression in a scope.
///
/// Statements (assignment, include, declarations) yield `Undef`; a block
/// yields its last value.
pub fn evaluate(ctx: &mut Compiler, expr: &Expr, scope: ScopeId) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(name) => ctx.lookup_var(scope, name),
        Expr::Concat(parts) => {
            let mut out = String::new();
            for part in parts {
                out.push_str(&evaluate(ctx, part, scope)?.to_string());
            }
            Ok(Value::Str(out))
        }
        Expr::List(items) => {
            let values = items
                .iter()
                .map(|item| evaluate(ctx, item, scope))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(values))
        }
        Expr::Block(statements) => {
            let mut last = Value::Undef;
            for statement in statements {
                last = evaluate(ctx, statement, scope)?;
            }
            Ok(last)
        }
        Expr::Assign { name, value } => {
            let value = evaluate(ctx, value, scope)?;
            ctx.scopes.set_var(scope, name, value)?;
            Ok(Value::Undef)
        }
        Expr::Include(names) => {
            for name in names {
                ctx.include_class(scope, name, None)?;
            }
            Ok(Value::Undef)
        }
        Expr::ClassDecl { name, params } => {
            let params = evaluate_params(ctx, params, scope)?;
            ctx.include_class(scope, name, Some(params))?;
            Ok(Value::Undef)
        }
        Expr::Declare {
            type_name,
            title,
            params,
        } => {
            let titles = match evaluate(ctx, title, scope)? {
                Value::Array(items) => items,
                single => vec![single],
            };
            let params = evaluate_params(ctx, params, scope)?;
            for title in titles {
                ctx.declare_resource(scope, type_name, &title.to_string(), params.clone())?;
            }
            Ok(Value::Undef)
        }
    }
}

fn evaluate_params(
    ctx: &mut Compiler,
    params: &IndexMap<String, Expr>,
    scope: ScopeId,
) -> Result<IndexMap<String, Value>> {
    let mut out = IndexMap::with_capacity(params.len());
    for (name, expr) in params {
        out.insert(name.clone(), evaluate(ctx, expr, scope)?);
    }
    Ok(out)
}
