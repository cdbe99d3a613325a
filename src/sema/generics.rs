//! Generics engine for Sable
//!
//! Constraint checking, worklist unification for call-site inference, and
//! on-demand monomorphization of generic declarations. The engine is the
//! only component that mutates tree nodes, and only ever on deep clones;
//! original generic declarations stay untouched.

use crate::ast::*;
use crate::types::Type;
use crate::utils::{Diagnostic, Span};
use std::collections::HashMap;

/// Deterministic specialization name: `base__arg__arg`
pub fn mangle(base: &str, args: &[Type]) -> String {
    let parts: Vec<String> = args.iter().map(|a| a.canonical()).collect();
    format!("{}__{}", base, parts.join("__"))
}

/// Per-declaration binding state for one inference or instantiation
#[derive(Debug)]
pub struct GenericContext {
    /// Parameter names in declaration order
    params: Vec<String>,
    /// Resolved constraint (always a TypeSet) per parameter
    constraints: HashMap<String, Type>,
    bindings: HashMap<String, Type>,
}

impl GenericContext {
    pub fn new(params: &[(String, Option<Type>)]) -> Self {
        let mut constraints = HashMap::new();
        for (name, constraint) in params {
            if let Some(c) = constraint {
                constraints.insert(name.clone(), c.clone());
            }
        }
        Self {
            params: params.iter().map(|(n, _)| n.clone()).collect(),
            constraints,
            bindings: HashMap::new(),
        }
    }

    /// Bind a concrete type to a parameter. Constraint membership is
    /// structural equality; no numeric widening applies here. A second
    /// binding of the same parameter must equal the first.
    pub fn bind(&mut self, param: &str, ty: Type, span: Span) -> Result<(), Diagnostic> {
        if let Some(existing) = self.bindings.get(param) {
            if *existing != ty {
                return Err(Diagnostic::TypeMismatch {
                    expected: existing.to_string(),
                    got: ty.to_string(),
                    span,
                });
            }
            return Ok(());
        }
        if let Some(constraint) = self.constraints.get(param) {
            let members = match constraint {
                Type::TypeSet { members, .. } => members.as_slice(),
                other => std::slice::from_ref(other),
            };
            if !members.iter().any(|m| *m == ty) {
                return Err(Diagnostic::ConstraintViolation {
                    param: param.to_string(),
                    got: ty.to_string(),
                    constraint: constraint.to_string(),
                    span,
                });
            }
        }
        self.bindings.insert(param.to_string(), ty);
        Ok(())
    }

    pub fn binding(&self, param: &str) -> Option<&Type> {
        self.bindings.get(param)
    }

    /// First parameter that never received a binding, in declaration order
    pub fn unbound(&self) -> Option<&str> {
        self.params
            .iter()
            .find(|p| !self.bindings.contains_key(*p))
            .map(String::as_str)
    }

    pub fn bindings(&self) -> &HashMap<String, Type> {
        &self.bindings
    }

    /// Bound types in parameter declaration order; only valid once every
    /// parameter is bound
    pub fn args_in_order(&self) -> Vec<Type> {
        self.params
            .iter()
            .filter_map(|p| self.bindings.get(p).cloned())
            .collect()
    }
}

/// Worklist-based structural unification of declared parameter types
/// against argument types.
///
/// A bare generic parameter in the pattern binds (after its constraint
/// check); matching GenericInstance pairs decompose into their type
/// arguments; anything else must be structurally equal. Unknown argument
/// types unify with everything so earlier failures do not cascade.
pub fn unify(
    patterns: &[Type],
    concretes: &[Type],
    ctx: &mut GenericContext,
    span: Span,
) -> Result<(), Diagnostic> {
    let mut work: Vec<(&Type, &Type)> = patterns.iter().zip(concretes.iter()).rev().collect();
    while let Some((pattern, concrete)) = work.pop() {
        if concrete.is_unknown() {
            continue;
        }
        match (pattern, concrete) {
            (Type::GenericParam { name, .. }, _) => {
                ctx.bind(name, concrete.clone(), span)?;
            }
            (
                Type::GenericInstance { base: pb, args: pa },
                Type::GenericInstance { base: cb, args: ca },
            ) if pb == cb && pa.len() == ca.len() => {
                for pair in pa.iter().zip(ca.iter()).rev() {
                    work.push(pair);
                }
            }
            // One level of structural decomposition for wrapped parameters
            (Type::Pointer(p), Type::Pointer(c))
            | (Type::Reference(p), Type::Reference(c))
            | (Type::Slice(p), Type::Slice(c)) => work.push((p, c)),
            (
                Type::Array { elem: p, size: ps },
                Type::Array { elem: c, size: cs },
            ) if ps == cs => work.push((p, c)),
            _ => {
                if pattern != concrete {
                    return Err(Diagnostic::TypeMismatch {
                        expected: pattern.to_string(),
                        got: concrete.to_string(),
                        span,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Substitute bound generic parameters inside a type, rebuilding the value
/// in place over an explicit work list. Substitution is deep: parameters
/// buried inside composites are replaced too.
pub fn substitute(ty: &Type, bindings: &HashMap<String, Type>) -> Type {
    let mut out = ty.clone();
    let mut work: Vec<&mut Type> = vec![&mut out];
    while let Some(t) = work.pop() {
        let replacement = match t {
            Type::GenericParam { name, .. } => bindings.get(name.as_str()).cloned(),
            _ => None,
        };
        if let Some(r) = replacement {
            *t = r;
            continue;
        }
        match t {
            Type::Array { elem, .. } => work.push(elem),
            Type::Slice(elem) => work.push(elem),
            Type::Pointer(pointee) => work.push(pointee),
            Type::Reference(referent) => work.push(referent),
            Type::Function {
                params,
                ret,
                variadic_elem,
                ..
            } => {
                for p in params.iter_mut() {
                    work.push(p);
                }
                if let Some(r) = ret {
                    work.push(r);
                }
                if let Some(v) = variadic_elem {
                    work.push(v);
                }
            }
            Type::Struct { fields, .. } | Type::Union { fields, .. } => {
                for (_, f) in fields.iter_mut() {
                    work.push(f);
                }
            }
            Type::GenericInstance { args, .. } => {
                for a in args.iter_mut() {
                    work.push(a);
                }
            }
            Type::TypeSet { members, .. } => {
                for m in members.iter_mut() {
                    work.push(m);
                }
            }
            Type::Primitive(_)
            | Type::Enum { .. }
            | Type::GenericParam { .. }
            | Type::Unknown
            | Type::Void => {}
        }
    }
    out
}

/// A registered generic declaration
#[derive(Debug, Clone)]
struct GenericDecl {
    /// Pristine clone of the declaration
    decl: Decl,
    /// Parameter names with resolved constraints, in declaration order
    params: Vec<(String, Option<Type>)>,
    /// For generic structs: field types with GenericParam leaves
    fields: Option<Vec<(String, Type)>>,
}

/// On-demand specializer with a keyed cache
///
/// Cache entries are created once per (name, ordered argument tuple) and
/// reused for identical keys; argument order is part of the key.
#[derive(Debug, Default)]
pub struct Monomorphizer {
    decls: HashMap<String, GenericDecl>,
    cache: HashMap<(String, Vec<Type>), Decl>,
    /// Instantiation keys in creation order, for deterministic iteration
    order: Vec<(String, Vec<Type>)>,
}

impl Monomorphizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a generic function; called during signature registration
    pub fn register_function(&mut self, decl: &Decl, params: Vec<(String, Option<Type>)>) {
        if let DeclKind::Function(f) = &decl.kind {
            self.decls.insert(
                f.name.clone(),
                GenericDecl {
                    decl: decl.clone(),
                    params,
                    fields: None,
                },
            );
        }
    }

    /// Register a generic struct with its resolved field types
    pub fn register_struct(
        &mut self,
        decl: &Decl,
        params: Vec<(String, Option<Type>)>,
        fields: Vec<(String, Type)>,
    ) {
        if let DeclKind::Struct(s) = &decl.kind {
            self.decls.insert(
                s.name.clone(),
                GenericDecl {
                    decl: decl.clone(),
                    params,
                    fields: Some(fields),
                },
            );
        }
    }

    pub fn is_generic(&self, name: &str) -> bool {
        self.decls.contains_key(name)
    }

    /// Declared generic parameters (name, resolved constraint) of `name`
    pub fn generic_params(&self, name: &str) -> Option<&[(String, Option<Type>)]> {
        self.decls.get(name).map(|g| g.params.as_slice())
    }

    pub fn param_count(&self, name: &str) -> Option<usize> {
        self.decls.get(name).map(|g| g.params.len())
    }

    /// Field types of a registered generic struct, with GenericParam leaves
    pub fn field_types(&self, name: &str) -> Option<&[(String, Type)]> {
        self.decls.get(name).and_then(|g| g.fields.as_deref())
    }

    /// Number of distinct cached specializations
    pub fn instantiation_count(&self) -> usize {
        self.cache.len()
    }

    /// Instantiation keys in creation order
    pub fn instantiations(&self) -> impl Iterator<Item = &(String, Vec<Type>)> {
        self.order.iter()
    }

    /// The nominal struct type of `base<args>`, with field types deeply
    /// substituted
    pub fn struct_type(
        &mut self,
        base: &str,
        args: &[Type],
        span: Span,
    ) -> Result<Type, Diagnostic> {
        let generic = self
            .decls
            .get(base)
            .ok_or_else(|| Diagnostic::NotGeneric {
                name: base.to_string(),
                span,
            })?;
        let fields = generic.fields.clone().ok_or_else(|| Diagnostic::NotGeneric {
            name: base.to_string(),
            span,
        })?;
        let ctx = self.bind_args(base, args, span)?;
        let substituted = fields
            .into_iter()
            .map(|(n, t)| (n, substitute(&t, ctx.bindings())))
            .collect();
        // Ensure the specialized declaration exists for codegen
        self.specialize(base, args, span)?;
        Ok(Type::Struct {
            name: Some(mangle(base, args)),
            fields: substituted,
            generic_params: Vec::new(),
        })
    }

    fn bind_args(
        &self,
        name: &str,
        args: &[Type],
        span: Span,
    ) -> Result<GenericContext, Diagnostic> {
        let generic = self.decls.get(name).ok_or_else(|| Diagnostic::NotGeneric {
            name: name.to_string(),
            span,
        })?;
        if args.len() != generic.params.len() {
            return Err(Diagnostic::ArgCountMismatch {
                expected: generic.params.len(),
                got: args.len(),
                span,
            });
        }
        let mut ctx = GenericContext::new(&generic.params);
        for ((param, _), arg) in generic.params.iter().zip(args.iter()) {
            ctx.bind(param, arg.clone(), span)?;
        }
        Ok(ctx)
    }

    /// Produce (or fetch) the specialization of `name` for the given
    /// ordered concrete type arguments. Idempotent per key.
    pub fn specialize(
        &mut self,
        name: &str,
        args: &[Type],
        span: Span,
    ) -> Result<&Decl, Diagnostic> {
        let key = (name.to_string(), args.to_vec());
        if !self.cache.contains_key(&key) {
            let ctx = self.bind_args(name, args, span)?;
            let generic = &self.decls[name];
            let mut specialized = generic.decl.clone();
            let mangled = mangle(name, args);
            rewrite_decl(&mut specialized, &mangled, ctx.bindings());
            log::debug!("specialized {} as {}", name, mangled);
            self.cache.insert(key.clone(), specialized);
            self.order.push(key.clone());
        } else {
            log::trace!("specialization cache hit for {}", mangle(name, args));
        }
        Ok(&self.cache[&key])
    }
}

/// Work items for the in-place substitution walk
enum Rewrite<'a> {
    Stmt(&'a mut Stmt),
    Expr(&'a mut Expr),
    Block(&'a mut Block),
    Ty(&'a mut TypeExpr),
}

/// Rewrite every generic-type-reference node whose name is bound into a
/// concrete type reference, rename the declaration, and drop its generic
/// parameter list. Iterative over an explicit work list.
fn rewrite_decl(decl: &mut Decl, mangled: &str, bindings: &HashMap<String, Type>) {
    let mut work: Vec<Rewrite> = Vec::new();
    match &mut decl.kind {
        DeclKind::Function(f) => {
            f.name = mangled.to_string();
            f.generics.clear();
            for param in f.params.iter_mut() {
                work.push(Rewrite::Ty(&mut param.ty));
            }
            if let Some(ret) = f.ret.as_mut() {
                work.push(Rewrite::Ty(ret));
            }
            if let Some(vty) = f.variadic_ty.as_mut() {
                work.push(Rewrite::Ty(vty));
            }
            work.push(Rewrite::Block(&mut f.body));
        }
        DeclKind::Struct(s) => {
            s.name = mangled.to_string();
            s.generics.clear();
            for field in s.fields.iter_mut() {
                work.push(Rewrite::Ty(&mut field.ty));
            }
        }
        _ => {}
    }

    while let Some(item) = work.pop() {
        match item {
            Rewrite::Ty(ty) => {
                let replacement = match &ty.kind {
                    TypeExprKind::Named(n) => bindings.get(n.as_str()).cloned(),
                    _ => None,
                };
                if let Some(concrete) = replacement {
                    ty.kind = TypeExprKind::Resolved(concrete);
                    continue;
                }
                match &mut ty.kind {
                    TypeExprKind::Array { elem, .. } => work.push(Rewrite::Ty(elem)),
                    TypeExprKind::Slice(elem) => work.push(Rewrite::Ty(elem)),
                    TypeExprKind::Pointer(pointee) => work.push(Rewrite::Ty(pointee)),
                    TypeExprKind::Reference(referent) => work.push(Rewrite::Ty(referent)),
                    TypeExprKind::Function { params, ret } => {
                        for p in params.iter_mut() {
                            work.push(Rewrite::Ty(p));
                        }
                        if let Some(r) = ret {
                            work.push(Rewrite::Ty(r));
                        }
                    }
                    TypeExprKind::Generic { args, .. } => {
                        for a in args.iter_mut() {
                            work.push(Rewrite::Ty(a));
                        }
                    }
                    TypeExprKind::Set(members) => {
                        for m in members.iter_mut() {
                            work.push(Rewrite::Ty(m));
                        }
                    }
                    TypeExprKind::Named(_) | TypeExprKind::Resolved(_) => {}
                }
            }
            Rewrite::Block(block) => {
                for stmt in block.stmts.iter_mut() {
                    work.push(Rewrite::Stmt(stmt));
                }
            }
            Rewrite::Stmt(stmt) => match &mut stmt.kind {
                StmtKind::Var(v) => {
                    if let Some(ty) = v.ty.as_mut() {
                        work.push(Rewrite::Ty(ty));
                    }
                    if let Some(init) = v.init.as_mut() {
                        work.push(Rewrite::Expr(init));
                    }
                }
                StmtKind::Assign { target, value } => {
                    work.push(Rewrite::Expr(target));
                    work.push(Rewrite::Expr(value));
                }
                StmtKind::Expr(e) => work.push(Rewrite::Expr(e)),
                StmtKind::Block(b) => work.push(Rewrite::Block(b)),
                StmtKind::If {
                    cond,
                    then_body,
                    else_body,
                } => {
                    work.push(Rewrite::Expr(cond));
                    work.push(Rewrite::Block(then_body));
                    if let Some(else_body) = else_body {
                        work.push(Rewrite::Block(else_body));
                    }
                }
                StmtKind::While { cond, body, .. } => {
                    work.push(Rewrite::Expr(cond));
                    work.push(Rewrite::Block(body));
                }
                StmtKind::For {
                    init,
                    cond,
                    step,
                    body,
                    ..
                } => {
                    if let Some(init) = init {
                        work.push(Rewrite::Stmt(init));
                    }
                    if let Some(cond) = cond {
                        work.push(Rewrite::Expr(cond));
                    }
                    if let Some(step) = step {
                        work.push(Rewrite::Stmt(step));
                    }
                    work.push(Rewrite::Block(body));
                }
                StmtKind::ForIn { iterable, body, .. } => {
                    work.push(Rewrite::Expr(iterable));
                    work.push(Rewrite::Block(body));
                }
                StmtKind::Match {
                    scrutinee,
                    cases,
                    else_body,
                } => {
                    work.push(Rewrite::Expr(scrutinee));
                    for case in cases.iter_mut() {
                        for value in case.values.iter_mut() {
                            work.push(Rewrite::Expr(value));
                        }
                        work.push(Rewrite::Block(&mut case.body));
                    }
                    if let Some(else_body) = else_body {
                        work.push(Rewrite::Block(else_body));
                    }
                }
                StmtKind::Return(value) => {
                    if let Some(value) = value {
                        work.push(Rewrite::Expr(value));
                    }
                }
                StmtKind::Defer(e) | StmtKind::Delete(e) => work.push(Rewrite::Expr(e)),
                StmtKind::Break { .. } | StmtKind::Continue { .. } => {}
            },
            Rewrite::Expr(expr) => match &mut expr.kind {
                ExprKind::Binary { lhs, rhs, .. } => {
                    work.push(Rewrite::Expr(lhs));
                    work.push(Rewrite::Expr(rhs));
                }
                ExprKind::Unary { operand, .. } => work.push(Rewrite::Expr(operand)),
                ExprKind::Call { callee, args } => {
                    work.push(Rewrite::Expr(callee));
                    for a in args.iter_mut() {
                        work.push(Rewrite::Expr(a));
                    }
                }
                ExprKind::Field { base, .. } => work.push(Rewrite::Expr(base)),
                ExprKind::Index { base, index } => {
                    work.push(Rewrite::Expr(base));
                    work.push(Rewrite::Expr(index));
                }
                ExprKind::StructInit { fields, .. } => {
                    for f in fields.iter_mut() {
                        work.push(Rewrite::Expr(&mut f.value));
                    }
                }
                ExprKind::ArrayInit { elems } => {
                    for e in elems.iter_mut() {
                        work.push(Rewrite::Expr(e));
                    }
                }
                ExprKind::New(ty) => work.push(Rewrite::Ty(ty)),
                ExprKind::Int(_)
                | ExprKind::Float(_)
                | ExprKind::Str(_)
                | ExprKind::Char(_)
                | ExprKind::Bool(_)
                | ExprKind::Nil
                | ExprKind::Ident(_) => {}
            },
        }
    }
}
