//! Type checking pass for Sable
//!
//! Second of the three passes. Runs two sub-passes over top-level
//! declarations: shape registration (struct/enum/union/type-set shapes and
//! function signatures, so later declarations resolve regardless of file
//! order) and body checking. Every expression node gets a resolved type,
//! cached by node identity for the validation pass and for codegen.
//!
//! Expression checking is iterative: an enter/exit work list computes each
//! node's type on exit from its children's already-cached types. No scope
//! lives inside an expression, which keeps the walk free of bookkeeping.

use crate::ast::*;
use crate::sema::context::SemanticContext;
use crate::sema::generics::{self, GenericContext, Monomorphizer};
use crate::sema::symbols::{ScopeWalker, SymbolKind, SymbolTable};
use crate::types::{Primitive, Type};
use crate::utils::{Diagnostic, Result, Span};
use std::collections::HashMap;

/// Node-identity-keyed map of resolved expression types; write-once
#[derive(Debug, Default)]
pub struct TypeMap {
    map: HashMap<NodeId, Type>,
}

impl TypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// First write wins; later inserts for the same node are ignored
    pub fn insert(&mut self, id: NodeId, ty: Type) {
        self.map.entry(id).or_insert(ty);
    }

    pub fn get(&self, id: NodeId) -> Option<&Type> {
        self.map.get(&id)
    }

    /// Resolved type of a node, Unknown if the node was never typed
    pub fn type_of(&self, id: NodeId) -> Type {
        self.map.get(&id).cloned().unwrap_or(Type::Unknown)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Operator and condition checks let these through: Unknown suppresses
/// cascades after an earlier failure, and a generic parameter's concrete
/// operations are only knowable per specialization.
fn lenient(ty: &Type) -> bool {
    ty.is_unknown() || matches!(ty, Type::GenericParam { .. })
}

/// Work items for the iterative statement walk
enum StWork<'a> {
    Stmt(&'a Stmt),
    /// Condition expression checked after its preceding siblings (C-style
    /// for loops)
    Cond(&'a Expr),
    EnterBlock(&'a Block),
    ExitScope,
}

/// Work items for the iterative expression walk
enum ExWork<'a> {
    Enter(&'a Expr),
    Exit(&'a Expr),
}

pub struct TypeChecker<'a> {
    symbols: &'a mut SymbolTable,
    types: &'a mut TypeMap,
    mono: &'a mut Monomorphizer,
    diagnostics: &'a mut Vec<Diagnostic>,
    ctx: SemanticContext,
}

impl<'a> TypeChecker<'a> {
    pub fn new(
        symbols: &'a mut SymbolTable,
        types: &'a mut TypeMap,
        mono: &'a mut Monomorphizer,
        diagnostics: &'a mut Vec<Diagnostic>,
    ) -> Self {
        Self {
            symbols,
            types,
            mono,
            diagnostics,
            ctx: SemanticContext::new(),
        }
    }

    pub fn run(&mut self, program: &Program) -> Result<()> {
        self.register_skeletons(program);
        self.register_shapes(program)?;
        self.check_bodies(program)?;
        Ok(())
    }

    fn diag(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Patch the symbol `name` in the nearest enclosing scope with `ty`
    fn patch_symbol(&mut self, name: &str, ty: Type) {
        if let Some(symbol) = self.symbols.lookup_mut(name) {
            symbol.ty = ty;
        }
    }

    // ==================== Sub-pass 1: shapes ====================

    /// Give every nominal type symbol a name-carrying skeleton so that
    /// forward references resolve nominally before fields are known. Enum
    /// variant values are fully computed here; they need no types.
    fn register_skeletons(&mut self, program: &Program) {
        for decl in &program.decls {
            match &decl.kind {
                DeclKind::Struct(s) => {
                    self.patch_symbol(
                        &s.name,
                        Type::Struct {
                            name: Some(s.name.clone()),
                            fields: Vec::new(),
                            generic_params: s.generics.iter().map(|g| g.name.clone()).collect(),
                        },
                    );
                }
                DeclKind::Enum(e) => {
                    let mut next = 0i64;
                    let mut variants = Vec::with_capacity(e.variants.len());
                    for v in &e.variants {
                        if let Some(explicit) = v.value {
                            next = explicit;
                        }
                        variants.push((v.name.clone(), Some(next)));
                        next += 1;
                    }
                    self.patch_symbol(
                        &e.name,
                        Type::Enum {
                            name: e.name.clone(),
                            variants,
                        },
                    );
                }
                DeclKind::Union(u) => {
                    self.patch_symbol(
                        &u.name,
                        Type::Union {
                            name: u.name.clone(),
                            fields: Vec::new(),
                        },
                    );
                }
                _ => {}
            }
        }
        // Type sets resolve after every nominal skeleton exists; members
        // reference nominal types by name only
        for decl in &program.decls {
            if let DeclKind::TypeSet(t) = &decl.kind {
                let members = t.members.iter().map(|m| self.resolve_type(m)).collect();
                self.patch_symbol(
                    &t.name,
                    Type::TypeSet {
                        name: Some(t.name.clone()),
                        members,
                    },
                );
            }
        }
    }

    /// Resolve field types, signatures and constraints, patching symbols
    /// in place and registering generic declarations with the engine.
    fn register_shapes(&mut self, program: &Program) -> Result<()> {
        let mut walker = ScopeWalker::new();
        for decl in &program.decls {
            match &decl.kind {
                DeclKind::Struct(s) => {
                    let generic = !s.generics.is_empty();
                    let mut params = Vec::new();
                    if generic {
                        walker.enter(self.symbols)?;
                        params = self.patch_generic_params(&s.generics);
                    }
                    let fields: Vec<(String, Type)> = s
                        .fields
                        .iter()
                        .map(|f| (f.name.clone(), self.resolve_type(&f.ty)))
                        .collect();
                    self.patch_symbol(
                        &s.name,
                        Type::Struct {
                            name: Some(s.name.clone()),
                            fields: fields.clone(),
                            generic_params: params.iter().map(|(n, _)| n.clone()).collect(),
                        },
                    );
                    if generic {
                        self.mono.register_struct(decl, params, fields);
                        walker.exit(self.symbols);
                    } else {
                        walker.enter(self.symbols)?;
                        walker.exit(self.symbols);
                    }
                }
                DeclKind::Enum(_) => {
                    walker.enter(self.symbols)?;
                    walker.exit(self.symbols);
                }
                DeclKind::Union(u) => {
                    let fields = u
                        .fields
                        .iter()
                        .map(|f| (f.name.clone(), self.resolve_type(&f.ty)))
                        .collect();
                    self.patch_symbol(
                        &u.name,
                        Type::Union {
                            name: u.name.clone(),
                            fields,
                        },
                    );
                    walker.enter(self.symbols)?;
                    walker.exit(self.symbols);
                }
                DeclKind::Function(f) => {
                    let generic = !f.generics.is_empty();
                    let mut params = Vec::new();
                    if generic {
                        walker.enter(self.symbols)?;
                        params = self.patch_generic_params(&f.generics);
                    }
                    let signature = self.resolve_signature(f);
                    self.patch_symbol(&f.name, signature);
                    if generic {
                        self.mono.register_function(decl, params);
                        walker.exit(self.symbols);
                    } else {
                        walker.enter(self.symbols)?;
                        walker.exit(self.symbols);
                    }
                }
                DeclKind::Var(v) => {
                    if let Some(ty) = &v.ty {
                        let resolved = self.resolve_type(ty);
                        self.patch_symbol(&v.name, resolved);
                    }
                }
                DeclKind::TypeSet(_) | DeclKind::Import(_) => {}
            }
        }
        Ok(())
    }

    /// Resolve constraints for a generic parameter list and patch the
    /// parameter symbols in the (already entered) generic scope
    fn patch_generic_params(
        &mut self,
        generics: &[GenericParamDecl],
    ) -> Vec<(String, Option<Type>)> {
        let mut params = Vec::with_capacity(generics.len());
        for gp in generics {
            let constraint = gp.constraint.as_ref().map(|c| self.resolve_type(c));
            self.patch_symbol(
                &gp.name,
                Type::GenericParam {
                    name: gp.name.clone(),
                    constraint: constraint.clone().map(Box::new),
                },
            );
            params.push((gp.name.clone(), constraint));
        }
        params
    }

    fn resolve_signature(&mut self, f: &FunctionDecl) -> Type {
        let params = f.params.iter().map(|p| self.resolve_type(&p.ty)).collect();
        let ret = f.ret.as_ref().map(|r| Box::new(self.resolve_type(r)));
        let variadic_elem = f
            .variadic_ty
            .as_ref()
            .map(|t| Box::new(self.resolve_type(t)));
        Type::Function {
            params,
            ret,
            variadic: f.variadic,
            variadic_elem,
        }
    }

    /// Resolve a type expression against the current scope
    fn resolve_type(&mut self, texpr: &TypeExpr) -> Type {
        match &texpr.kind {
            TypeExprKind::Named(name) => {
                if let Some(p) = Primitive::from_name(name) {
                    return Type::Primitive(p);
                }
                match self.symbols.lookup(name) {
                    Some(symbol) => match symbol.kind {
                        SymbolKind::Struct
                        | SymbolKind::Enum
                        | SymbolKind::Union
                        | SymbolKind::Type
                        | SymbolKind::GenericParam => symbol.ty.clone(),
                        _ => {
                            self.diag(Diagnostic::UndefinedType {
                                name: name.clone(),
                                span: texpr.span,
                            });
                            Type::Unknown
                        }
                    },
                    None => {
                        self.diag(Diagnostic::UndefinedType {
                            name: name.clone(),
                            span: texpr.span,
                        });
                        Type::Unknown
                    }
                }
            }
            TypeExprKind::Array { elem, size } => Type::Array {
                elem: Box::new(self.resolve_type(elem)),
                size: *size,
            },
            TypeExprKind::Slice(elem) => Type::Slice(Box::new(self.resolve_type(elem))),
            TypeExprKind::Pointer(pointee) => Type::Pointer(Box::new(self.resolve_type(pointee))),
            TypeExprKind::Reference(referent) => {
                Type::Reference(Box::new(self.resolve_type(referent)))
            }
            TypeExprKind::Function { params, ret } => Type::Function {
                params: params.iter().map(|p| self.resolve_type(p)).collect(),
                ret: ret.as_ref().map(|r| Box::new(self.resolve_type(r))),
                variadic: false,
                variadic_elem: None,
            },
            TypeExprKind::Generic { base, args } => {
                let resolved: Vec<Type> = args.iter().map(|a| self.resolve_type(a)).collect();
                if let Some(expected) = self.mono.param_count(base) {
                    if expected != resolved.len() {
                        self.diag(Diagnostic::ArgCountMismatch {
                            expected,
                            got: resolved.len(),
                            span: texpr.span,
                        });
                        return Type::Unknown;
                    }
                } else if self.symbols.lookup(base).is_none() {
                    self.diag(Diagnostic::UndefinedType {
                        name: base.clone(),
                        span: texpr.span,
                    });
                    return Type::Unknown;
                }
                // Resolution to the specialized struct is deferred to the
                // generics engine; uses keep the instance form
                Type::GenericInstance {
                    base: base.clone(),
                    args: resolved,
                }
            }
            TypeExprKind::Set(members) => Type::TypeSet {
                name: None,
                members: members.iter().map(|m| self.resolve_type(m)).collect(),
            },
            TypeExprKind::Resolved(ty) => ty.clone(),
        }
    }

    // ==================== Sub-pass 2: bodies ====================

    fn check_bodies(&mut self, program: &Program) -> Result<()> {
        let mut walker = ScopeWalker::new();
        for decl in &program.decls {
            match &decl.kind {
                DeclKind::Function(f) => self.check_function(f, &mut walker)?,
                DeclKind::Struct(_) | DeclKind::Enum(_) | DeclKind::Union(_) => {
                    crate::sema::skip_decl_scopes(decl, &mut walker, self.symbols)?;
                }
                DeclKind::Var(v) => self.check_global(v, decl),
                DeclKind::TypeSet(_) | DeclKind::Import(_) => {}
            }
        }
        Ok(())
    }

    fn check_global(&mut self, v: &VarDecl, decl: &Decl) {
        let init_ty = v.init.as_ref().map(|e| self.check_expr(e));
        let declared = v.ty.as_ref().map(|t| self.resolve_type(t));
        let final_ty = match (declared, init_ty) {
            (Some(d), Some(i)) => {
                if !i.is_assignable_to(&d) {
                    self.diag(Diagnostic::TypeMismatch {
                        expected: d.to_string(),
                        got: i.to_string(),
                        span: decl.span,
                    });
                }
                d
            }
            (Some(d), None) => d,
            (None, Some(i)) => i,
            (None, None) => Type::Unknown,
        };
        self.patch_symbol(&v.name, final_ty);
    }

    fn check_function(&mut self, f: &FunctionDecl, walker: &mut ScopeWalker) -> Result<()> {
        log::trace!("type checking function {}", f.name);
        let signature = self
            .symbols
            .lookup(&f.name)
            .map(|s| s.ty.clone())
            .unwrap_or(Type::Unknown);

        if !f.generics.is_empty() {
            walker.enter(self.symbols)?;
        }
        walker.enter(self.symbols)?;

        // Patch parameter symbols from the signature resolved in sub-pass 1
        let (param_tys, ret_ty) = match &signature {
            Type::Function { params, ret, .. } => {
                (params.clone(), ret.as_ref().map(|r| (**r).clone()))
            }
            _ => (Vec::new(), None),
        };
        for (param, ty) in f.params.iter().zip(param_tys) {
            self.patch_symbol(&param.name, ty);
        }

        let mut generic_params = HashMap::new();
        for gp in &f.generics {
            if let Some(symbol) = self.symbols.lookup(&gp.name) {
                generic_params.insert(gp.name.clone(), symbol.ty.clone());
            }
        }
        self.ctx.enter_function(&f.name, ret_ty, generic_params);

        self.check_stmts(&f.body.stmts, walker)?;

        self.ctx.exit_function();
        walker.exit(self.symbols);
        if !f.generics.is_empty() {
            walker.exit(self.symbols);
        }
        Ok(())
    }

    /// Iterative statement walk over one function body. The body scope is
    /// already entered; nested scopes are re-entered through the walker in
    /// the same order name resolution created them.
    fn check_stmts(&mut self, stmts: &[Stmt], walker: &mut ScopeWalker) -> Result<()> {
        let mut work: Vec<StWork> = stmts.iter().rev().map(StWork::Stmt).collect();
        while let Some(item) = work.pop() {
            match item {
                StWork::Stmt(stmt) => self.check_stmt(stmt, &mut work, walker)?,
                StWork::Cond(cond) => self.check_condition(cond),
                StWork::EnterBlock(block) => {
                    walker.enter(self.symbols)?;
                    work.push(StWork::ExitScope);
                    for stmt in block.stmts.iter().rev() {
                        work.push(StWork::Stmt(stmt));
                    }
                }
                StWork::ExitScope => walker.exit(self.symbols),
            }
        }
        Ok(())
    }

    fn check_condition(&mut self, cond: &Expr) {
        let ty = self.check_expr(cond);
        if !ty.is_bool() && !lenient(&ty) {
            self.diag(Diagnostic::ConditionNotBool {
                got: ty.to_string(),
                span: cond.span,
            });
        }
    }

    fn check_stmt<'b>(
        &mut self,
        stmt: &'b Stmt,
        work: &mut Vec<StWork<'b>>,
        walker: &mut ScopeWalker,
    ) -> Result<()> {
        match &stmt.kind {
            StmtKind::Var(v) => {
                let init_ty = v.init.as_ref().map(|e| self.check_expr(e));
                let declared = v.ty.as_ref().map(|t| self.resolve_type(t));
                let final_ty = match (declared, init_ty) {
                    (Some(d), Some(i)) => {
                        if !i.is_assignable_to(&d) {
                            self.diag(Diagnostic::TypeMismatch {
                                expected: d.to_string(),
                                got: i.to_string(),
                                span: stmt.span,
                            });
                        }
                        d
                    }
                    (Some(d), None) => d,
                    (None, Some(i)) => i,
                    (None, None) => Type::Unknown,
                };
                self.patch_symbol(&v.name, final_ty);
            }
            StmtKind::Assign { target, value } => {
                let target_ty = self.check_expr(target);
                let value_ty = self.check_expr(value);
                if let ExprKind::Ident(name) = &target.kind {
                    if let Some(symbol) = self.symbols.lookup(name) {
                        if !symbol.mutable {
                            self.diag(Diagnostic::AssignToImmutable {
                                name: name.clone(),
                                span: target.span,
                            });
                        }
                    }
                }
                if !value_ty.is_assignable_to(&target_ty) {
                    self.diag(Diagnostic::TypeMismatch {
                        expected: target_ty.to_string(),
                        got: value_ty.to_string(),
                        span: stmt.span,
                    });
                }
            }
            StmtKind::Expr(e) => {
                self.check_expr(e);
            }
            StmtKind::Block(b) => work.push(StWork::EnterBlock(b)),
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.check_condition(cond);
                if let Some(else_body) = else_body {
                    work.push(StWork::EnterBlock(else_body));
                }
                work.push(StWork::EnterBlock(then_body));
            }
            StmtKind::While { cond, body, .. } => {
                self.check_condition(cond);
                work.push(StWork::EnterBlock(body));
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
                ..
            } => {
                walker.enter(self.symbols)?;
                work.push(StWork::ExitScope);
                work.push(StWork::EnterBlock(body));
                if let Some(step) = step {
                    work.push(StWork::Stmt(step));
                }
                if let Some(cond) = cond {
                    work.push(StWork::Cond(cond));
                }
                if let Some(init) = init {
                    work.push(StWork::Stmt(init));
                }
            }
            StmtKind::ForIn {
                binding,
                index,
                iterable,
                body,
                ..
            } => {
                walker.enter(self.symbols)?;
                let iter_ty = self.check_expr(iterable);
                let elem_ty = match &iter_ty {
                    Type::Array { elem, .. } => (**elem).clone(),
                    Type::Slice(elem) => (**elem).clone(),
                    Type::Unknown => Type::Unknown,
                    other => {
                        self.diag(Diagnostic::CannotIndex {
                            got: other.to_string(),
                            span: iterable.span,
                        });
                        Type::Unknown
                    }
                };
                self.patch_symbol(binding, elem_ty);
                if let Some(index) = index {
                    self.patch_symbol(index, Type::I64);
                }
                work.push(StWork::ExitScope);
                work.push(StWork::EnterBlock(body));
            }
            StmtKind::Match {
                scrutinee,
                cases,
                else_body,
            } => {
                let scrutinee_ty = self.check_expr(scrutinee);
                for case in cases {
                    for value in &case.values {
                        let value_ty = self.check_expr(value);
                        if !value_ty.is_assignable_to(&scrutinee_ty) {
                            self.diag(Diagnostic::TypeMismatch {
                                expected: scrutinee_ty.to_string(),
                                got: value_ty.to_string(),
                                span: value.span,
                            });
                        }
                    }
                }
                if let Some(else_body) = else_body {
                    work.push(StWork::EnterBlock(else_body));
                }
                for case in cases.iter().rev() {
                    work.push(StWork::EnterBlock(&case.body));
                }
            }
            StmtKind::Return(value) => {
                let value_ty = value.as_ref().map(|e| self.check_expr(e));
                if let Err(diag) = self.ctx.validate_return(value_ty.as_ref(), stmt.span) {
                    self.diag(diag);
                }
            }
            StmtKind::Defer(e) | StmtKind::Delete(e) => {
                self.check_expr(e);
            }
            StmtKind::Break { .. } | StmtKind::Continue { .. } => {}
        }
        Ok(())
    }

    // ==================== Expressions ====================

    /// Type an expression tree iteratively; every node's type lands in the
    /// node-to-type map on exit from its children.
    fn check_expr(&mut self, root: &Expr) -> Type {
        let mut work = vec![ExWork::Enter(root)];
        while let Some(item) = work.pop() {
            match item {
                ExWork::Enter(e) => {
                    work.push(ExWork::Exit(e));
                    match &e.kind {
                        ExprKind::Binary { lhs, rhs, .. } => {
                            work.push(ExWork::Enter(rhs));
                            work.push(ExWork::Enter(lhs));
                        }
                        ExprKind::Unary { operand, .. } => work.push(ExWork::Enter(operand)),
                        ExprKind::Call { callee, args } => {
                            for arg in args.iter().rev() {
                                work.push(ExWork::Enter(arg));
                            }
                            work.push(ExWork::Enter(callee));
                        }
                        ExprKind::Field { base, .. } => work.push(ExWork::Enter(base)),
                        ExprKind::Index { base, index } => {
                            work.push(ExWork::Enter(index));
                            work.push(ExWork::Enter(base));
                        }
                        ExprKind::StructInit { fields, .. } => {
                            for field in fields.iter().rev() {
                                work.push(ExWork::Enter(&field.value));
                            }
                        }
                        ExprKind::ArrayInit { elems } => {
                            for elem in elems.iter().rev() {
                                work.push(ExWork::Enter(elem));
                            }
                        }
                        ExprKind::Int(_)
                        | ExprKind::Float(_)
                        | ExprKind::Str(_)
                        | ExprKind::Char(_)
                        | ExprKind::Bool(_)
                        | ExprKind::Nil
                        | ExprKind::Ident(_)
                        | ExprKind::New(_) => {}
                    }
                }
                ExWork::Exit(e) => {
                    let ty = self.exit_expr(e);
                    self.types.insert(e.id, ty);
                }
            }
        }
        self.types.type_of(root.id)
    }

    /// Compute a node's type from its children's cached types
    fn exit_expr(&mut self, e: &Expr) -> Type {
        match &e.kind {
            ExprKind::Int(_) => Type::I32,
            ExprKind::Float(_) => Type::F64,
            ExprKind::Str(_) => Type::STR,
            ExprKind::Char(_) => Type::CHAR,
            ExprKind::Bool(_) => Type::BOOL,
            // nil types as Unknown here; reference-only placement is the
            // validation pass's job
            ExprKind::Nil => Type::Unknown,
            ExprKind::Ident(name) => match self.symbols.lookup(name) {
                Some(symbol) => {
                    let ty = symbol.ty.clone();
                    self.symbols.mark_used(name);
                    ty
                }
                None => {
                    self.diag(Diagnostic::UndefinedIdentifier {
                        name: name.clone(),
                        span: e.span,
                    });
                    Type::Unknown
                }
            },
            ExprKind::Binary { op, lhs, rhs } => {
                let lt = self.types.type_of(lhs.id);
                let rt = self.types.type_of(rhs.id);
                self.binary_type(*op, &lt, &rt, e.span)
            }
            ExprKind::Unary { op, operand } => {
                let ty = self.types.type_of(operand.id);
                self.unary_type(*op, &ty, e.span)
            }
            ExprKind::Call { callee, args } => self.call_type(callee, args, e.span),
            ExprKind::Field { base, field } => self.field_type(base, field, e.span),
            ExprKind::Index { base, index } => {
                let index_ty = self.types.type_of(index.id);
                if !index_ty.is_integral() && !lenient(&index_ty) {
                    self.diag(Diagnostic::RequiresIntegral {
                        op: "[]".to_string(),
                        got: index_ty.to_string(),
                        span: index.span,
                    });
                }
                match self.types.type_of(base.id) {
                    Type::Array { elem, .. } => *elem,
                    Type::Slice(elem) => *elem,
                    Type::Unknown => Type::Unknown,
                    other => {
                        self.diag(Diagnostic::CannotIndex {
                            got: other.to_string(),
                            span: e.span,
                        });
                        Type::Unknown
                    }
                }
            }
            ExprKind::StructInit { name, fields } => self.struct_init_type(name, fields, e.span),
            ExprKind::ArrayInit { elems } => {
                if elems.is_empty() {
                    return Type::array(Type::Unknown, 0);
                }
                let first = self.types.type_of(elems[0].id);
                for elem in elems.iter().skip(1) {
                    let elem_ty = self.types.type_of(elem.id);
                    if !elem_ty.is_assignable_to(&first) {
                        self.diag(Diagnostic::TypeMismatch {
                            expected: first.to_string(),
                            got: elem_ty.to_string(),
                            span: elem.span,
                        });
                    }
                }
                Type::array(first, elems.len() as u64)
            }
            // `new` is the language's only producer of a nilable reference
            ExprKind::New(texpr) => {
                let allocated = self.resolve_type(texpr);
                Type::reference(allocated)
            }
        }
    }

    fn binary_type(&mut self, op: BinOp, lt: &Type, rt: &Type, span: Span) -> Type {
        if op.is_comparison() {
            return Type::BOOL;
        }
        if op.is_logical() {
            for ty in [lt, rt] {
                if !ty.is_bool() && !lenient(ty) {
                    self.diag(Diagnostic::RequiresBool {
                        op: op.to_string(),
                        got: ty.to_string(),
                        span,
                    });
                }
            }
            return Type::BOOL;
        }
        if op.is_bitwise() {
            for ty in [lt, rt] {
                if !ty.is_integral() && !lenient(ty) {
                    self.diag(Diagnostic::RequiresIntegral {
                        op: op.to_string(),
                        got: ty.to_string(),
                        span,
                    });
                    return Type::Unknown;
                }
            }
            return lt.clone();
        }
        // Arithmetic: both numeric; a floating operand's type wins
        for ty in [lt, rt] {
            if !ty.is_numeric() && !lenient(ty) {
                self.diag(Diagnostic::RequiresNumeric {
                    op: op.to_string(),
                    got: ty.to_string(),
                    span,
                });
                return Type::Unknown;
            }
        }
        if lt.is_unknown() || rt.is_unknown() {
            return Type::Unknown;
        }
        if lt.is_float() {
            lt.clone()
        } else if rt.is_float() {
            rt.clone()
        } else {
            lt.clone()
        }
    }

    fn unary_type(&mut self, op: UnOp, ty: &Type, span: Span) -> Type {
        if ty.is_unknown() {
            return Type::Unknown;
        }
        match op {
            UnOp::Neg => {
                if ty.is_numeric() || lenient(ty) {
                    ty.clone()
                } else {
                    self.diag(Diagnostic::RequiresNumeric {
                        op: op.to_string(),
                        got: ty.to_string(),
                        span,
                    });
                    Type::Unknown
                }
            }
            UnOp::Not => {
                if !ty.is_bool() && !lenient(ty) {
                    self.diag(Diagnostic::RequiresBool {
                        op: op.to_string(),
                        got: ty.to_string(),
                        span,
                    });
                }
                Type::BOOL
            }
            UnOp::BitNot => {
                if ty.is_integral() || lenient(ty) {
                    ty.clone()
                } else {
                    self.diag(Diagnostic::RequiresIntegral {
                        op: op.to_string(),
                        got: ty.to_string(),
                        span,
                    });
                    Type::Unknown
                }
            }
        }
    }

    fn call_type(&mut self, callee: &Expr, args: &[Expr], span: Span) -> Type {
        // Direct calls to generic functions run inference first; a local
        // shadowing the name takes the ordinary path
        if let ExprKind::Ident(name) = &callee.kind {
            let is_function = matches!(
                self.symbols.lookup(name).map(|s| s.kind),
                Some(SymbolKind::Function)
            );
            if is_function && self.mono.is_generic(name) {
                return self.generic_call_type(name, callee, args, span);
            }
        }
        let callee_ty = self.types.type_of(callee.id);
        match callee_ty {
            Type::Function {
                params,
                ret,
                variadic,
                variadic_elem,
            } => {
                let arity_ok = if variadic {
                    args.len() >= params.len()
                } else {
                    args.len() == params.len()
                };
                if !arity_ok {
                    self.diag(Diagnostic::ArgCountMismatch {
                        expected: params.len(),
                        got: args.len(),
                        span,
                    });
                }
                for (arg, param_ty) in args.iter().zip(params.iter()) {
                    let arg_ty = self.types.type_of(arg.id);
                    if !arg_ty.is_assignable_to(param_ty) {
                        self.diag(Diagnostic::TypeMismatch {
                            expected: param_ty.to_string(),
                            got: arg_ty.to_string(),
                            span: arg.span,
                        });
                    }
                }
                if let Some(elem) = &variadic_elem {
                    for arg in args.iter().skip(params.len()) {
                        let arg_ty = self.types.type_of(arg.id);
                        if !arg_ty.is_assignable_to(elem) {
                            self.diag(Diagnostic::TypeMismatch {
                                expected: elem.to_string(),
                                got: arg_ty.to_string(),
                                span: arg.span,
                            });
                        }
                    }
                }
                ret.map(|r| *r).unwrap_or(Type::Void)
            }
            Type::Unknown => Type::Unknown,
            other => {
                self.diag(Diagnostic::NotCallable {
                    got: other.to_string(),
                    span,
                });
                Type::Unknown
            }
        }
    }

    /// Infer bindings for a generic call by unification, request the
    /// specialization, and return the substituted return type
    fn generic_call_type(
        &mut self,
        name: &str,
        callee: &Expr,
        args: &[Expr],
        span: Span,
    ) -> Type {
        let (params, ret, variadic, variadic_elem) = match self.types.type_of(callee.id) {
            Type::Function {
                params,
                ret,
                variadic,
                variadic_elem,
            } => (params, ret, variadic, variadic_elem),
            Type::Unknown => return Type::Unknown,
            other => {
                self.diag(Diagnostic::NotCallable {
                    got: other.to_string(),
                    span,
                });
                return Type::Unknown;
            }
        };
        let arity_ok = if variadic {
            args.len() >= params.len()
        } else {
            args.len() == params.len()
        };
        if !arity_ok {
            self.diag(Diagnostic::ArgCountMismatch {
                expected: params.len(),
                got: args.len(),
                span,
            });
            return Type::Unknown;
        }

        let declared = self
            .mono
            .generic_params(name)
            .map(|p| p.to_vec())
            .unwrap_or_default();
        let mut gctx = GenericContext::new(&declared);
        let arg_tys: Vec<Type> = args.iter().map(|a| self.types.type_of(a.id)).collect();
        if let Err(diag) = generics::unify(&params, &arg_tys[..params.len()], &mut gctx, span) {
            self.diag(diag);
            return Type::Unknown;
        }
        if let Some(param) = gctx.unbound() {
            self.diag(Diagnostic::UnboundGenericParam {
                name: name.to_string(),
                param: param.to_string(),
                span,
            });
            return Type::Unknown;
        }

        if let Some(elem) = &variadic_elem {
            let concrete_elem = generics::substitute(elem, gctx.bindings());
            for arg in args.iter().skip(params.len()) {
                let arg_ty = self.types.type_of(arg.id);
                if !arg_ty.is_assignable_to(&concrete_elem) {
                    self.diag(Diagnostic::TypeMismatch {
                        expected: concrete_elem.to_string(),
                        got: arg_ty.to_string(),
                        span: arg.span,
                    });
                }
            }
        }

        // Calls made from inside another generic body can bind a parameter
        // to a still-generic type; those resolve per outer specialization
        let type_args = gctx.args_in_order();
        if !type_args.iter().any(|a| a.contains_generic_param()) {
            if let Err(diag) = self.mono.specialize(name, &type_args, span) {
                self.diag(diag);
            }
        }
        match ret {
            Some(r) => generics::substitute(&r, gctx.bindings()),
            None => Type::Void,
        }
    }

    fn field_type(&mut self, base: &Expr, field: &str, span: Span) -> Type {
        let base_ty = self.types.type_of(base.id);
        if base_ty.is_unknown() {
            return Type::Unknown;
        }
        // Builtin pseudo-fields: `.adr` takes an address, `.val` follows
        // a pointer or reference
        if field == "adr" {
            return Type::pointer(base_ty);
        }
        if field == "val" {
            return match base_ty {
                Type::Pointer(pointee) => *pointee,
                Type::Reference(referent) => *referent,
                other => {
                    self.diag(Diagnostic::FieldAccessOnNonStruct {
                        got: other.to_string(),
                        field: field.to_string(),
                        span,
                    });
                    Type::Unknown
                }
            };
        }
        // Field access reaches through one level of pointer or reference
        let inner = match base_ty {
            Type::Pointer(pointee) => *pointee,
            Type::Reference(referent) => *referent,
            other => other,
        };
        match inner {
            Type::Struct { name, fields, .. } => {
                let owner = name.clone().unwrap_or_else(|| "struct".to_string());
                // Re-lookup by name so forward-declared fields are fresh
                let fields = match name.as_deref().and_then(|n| self.symbols.lookup(n)) {
                    Some(symbol) => match &symbol.ty {
                        Type::Struct { fields, .. } => fields.clone(),
                        _ => fields,
                    },
                    None => fields,
                };
                match fields.iter().find(|(n, _)| n == field) {
                    Some((_, ty)) => ty.clone(),
                    None => {
                        self.diag(Diagnostic::NoSuchField {
                            owner,
                            field: field.to_string(),
                            span,
                        });
                        Type::Unknown
                    }
                }
            }
            Type::Union { name, fields } => match fields.iter().find(|(n, _)| n == field) {
                Some((_, ty)) => ty.clone(),
                None => {
                    self.diag(Diagnostic::NoSuchField {
                        owner: name,
                        field: field.to_string(),
                        span,
                    });
                    Type::Unknown
                }
            },
            // Accessing a variant name on an enum yields the enum type
            Type::Enum { name, variants } => {
                if variants.iter().any(|(n, _)| n == field) {
                    Type::Enum {
                        name,
                        variants,
                    }
                } else {
                    self.diag(Diagnostic::NoSuchField {
                        owner: name,
                        field: field.to_string(),
                        span,
                    });
                    Type::Unknown
                }
            }
            Type::GenericInstance { base: gbase, args } => {
                self.generic_instance_field(&gbase, &args, field, span)
            }
            other => {
                self.diag(Diagnostic::FieldAccessOnNonStruct {
                    got: other.to_string(),
                    field: field.to_string(),
                    span,
                });
                Type::Unknown
            }
        }
    }

    fn generic_instance_field(
        &mut self,
        base: &str,
        args: &[Type],
        field: &str,
        span: Span,
    ) -> Type {
        let concrete = !args.iter().any(|a| a.contains_generic_param());
        if concrete {
            // Specializing here both checks constraints and seeds the
            // cache for codegen
            match self.mono.struct_type(base, args, span) {
                Ok(Type::Struct { fields, .. }) => {
                    return match fields.iter().find(|(n, _)| n == field) {
                        Some((_, ty)) => ty.clone(),
                        None => {
                            self.diag(Diagnostic::NoSuchField {
                                owner: base.to_string(),
                                field: field.to_string(),
                                span,
                            });
                            Type::Unknown
                        }
                    };
                }
                Ok(_) => return Type::Unknown,
                Err(diag) => {
                    self.diag(diag);
                    return Type::Unknown;
                }
            }
        }
        // Inside a generic body: look at the generic struct's own field
        // types with the instance arguments substituted positionally
        let params = self
            .mono
            .generic_params(base)
            .map(|p| p.to_vec())
            .unwrap_or_default();
        let fields = self
            .mono
            .field_types(base)
            .map(|f| f.to_vec())
            .unwrap_or_default();
        let bindings: HashMap<String, Type> = params
            .iter()
            .map(|(n, _)| n.clone())
            .zip(args.iter().cloned())
            .collect();
        match fields.iter().find(|(n, _)| n == field) {
            Some((_, ty)) => generics::substitute(ty, &bindings),
            None => {
                self.diag(Diagnostic::NoSuchField {
                    owner: base.to_string(),
                    field: field.to_string(),
                    span,
                });
                Type::Unknown
            }
        }
    }

    fn struct_init_type(&mut self, name: &Option<String>, fields: &[FieldInit], span: Span) -> Type {
        let name = match name {
            Some(n) => n,
            None => {
                // Anonymous initializer types structurally from its fields
                let inferred = fields
                    .iter()
                    .map(|f| (f.name.clone(), self.types.type_of(f.value.id)))
                    .collect();
                return Type::Struct {
                    name: None,
                    fields: inferred,
                    generic_params: Vec::new(),
                };
            }
        };
        let symbol_ty = match self.symbols.lookup(name) {
            Some(s) if s.kind == SymbolKind::Struct => s.ty.clone(),
            Some(_) | None => {
                self.diag(Diagnostic::UndefinedType {
                    name: name.clone(),
                    span,
                });
                return Type::Unknown;
            }
        };
        let decl_fields = match &symbol_ty {
            Type::Struct { fields, .. } => fields.clone(),
            _ => Vec::new(),
        };

        if self.mono.is_generic(name) {
            // Infer type arguments from the initialized fields
            let declared = self
                .mono
                .generic_params(name)
                .map(|p| p.to_vec())
                .unwrap_or_default();
            let mut gctx = GenericContext::new(&declared);
            let mut patterns = Vec::new();
            let mut concretes = Vec::new();
            for init in fields {
                match decl_fields.iter().find(|(n, _)| n == &init.name) {
                    Some((_, ty)) => {
                        patterns.push(ty.clone());
                        concretes.push(self.types.type_of(init.value.id));
                    }
                    None => self.diag(Diagnostic::NoSuchField {
                        owner: name.clone(),
                        field: init.name.clone(),
                        span: init.span,
                    }),
                }
            }
            if let Err(diag) = generics::unify(&patterns, &concretes, &mut gctx, span) {
                self.diag(diag);
                return Type::Unknown;
            }
            if let Some(param) = gctx.unbound() {
                self.diag(Diagnostic::UnboundGenericParam {
                    name: name.clone(),
                    param: param.to_string(),
                    span,
                });
                return Type::Unknown;
            }
            let args = gctx.args_in_order();
            if !args.iter().any(|a| a.contains_generic_param()) {
                if let Err(diag) = self.mono.struct_type(name, &args, span) {
                    self.diag(diag);
                }
            }
            return Type::GenericInstance {
                base: name.clone(),
                args,
            };
        }

        for init in fields {
            match decl_fields.iter().find(|(n, _)| n == &init.name) {
                Some((_, field_ty)) => {
                    let value_ty = self.types.type_of(init.value.id);
                    if !value_ty.is_assignable_to(field_ty) {
                        self.diag(Diagnostic::TypeMismatch {
                            expected: field_ty.to_string(),
                            got: value_ty.to_string(),
                            span: init.span,
                        });
                    }
                }
                None => self.diag(Diagnostic::NoSuchField {
                    owner: name.clone(),
                    field: init.name.clone(),
                    span: init.span,
                }),
            }
        }
        symbol_ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::sema::resolve::NameResolution;
    use crate::sema::symbols::ModuleTable;
    use pretty_assertions::assert_eq;

    fn check(program: &Program) -> (TypeMap, Monomorphizer, Vec<Diagnostic>) {
        let mut symbols = SymbolTable::new();
        let mut modules = ModuleTable::new();
        let mut diagnostics = Vec::new();
        NameResolution::new(&mut symbols, &mut modules, &mut diagnostics)
            .run(program)
            .unwrap();
        let mut types = TypeMap::new();
        let mut mono = Monomorphizer::new();
        TypeChecker::new(&mut symbols, &mut types, &mut mono, &mut diagnostics)
            .run(program)
            .unwrap();
        (types, mono, diagnostics)
    }

    fn main_with(stmts: Vec<Stmt>) -> Program {
        program(vec![fn_decl("main", vec![], vec![], None, block(stmts))])
    }

    fn struct_init(name: &str, inits: Vec<(&str, Expr)>) -> Expr {
        expr(ExprKind::StructInit {
            name: Some(name.to_string()),
            fields: inits
                .into_iter()
                .map(|(n, value)| FieldInit {
                    name: n.to_string(),
                    value,
                    span: sp(),
                })
                .collect(),
        })
    }

    fn point_decl() -> Decl {
        struct_decl("Point", vec![("x", ty("i32")), ("y", ty("i32"))])
    }

    #[test]
    fn annotated_var_mismatch_reports_expected_and_got() {
        let p = main_with(vec![var_stmt("x", Some(ty("i32")), Some(string("hello")))]);
        let (_, _, diagnostics) = check(&p);
        assert_eq!(diagnostics.len(), 1);
        match &diagnostics[0] {
            Diagnostic::TypeMismatch { expected, got, .. } => {
                assert_eq!(expected, "i32");
                assert_eq!(got, "string");
            }
            other => panic!("unexpected diagnostic {:?}", other),
        }
    }

    #[test]
    fn two_unrelated_undefined_identifiers_both_surface() {
        let p = main_with(vec![
            stmt(StmtKind::Expr(ident("first_missing"))),
            stmt(StmtKind::Expr(ident("second_missing"))),
        ]);
        let (_, _, diagnostics) = check(&p);
        let codes: Vec<&str> = diagnostics.iter().map(|d| d.code()).collect();
        assert_eq!(codes, vec!["undefined-identifier", "undefined-identifier"]);
    }

    #[test]
    fn arithmetic_prefers_the_floating_operand() {
        let sum = binary(BinOp::Add, int(1), expr(ExprKind::Float(2.0)));
        let sum_id = sum.id;
        let plain = binary(BinOp::Add, int(1), int(2));
        let plain_id = plain.id;
        let p = main_with(vec![
            stmt(StmtKind::Expr(sum)),
            stmt(StmtKind::Expr(plain)),
        ]);
        let (types, _, diagnostics) = check(&p);
        assert!(diagnostics.is_empty());
        assert_eq!(types.type_of(sum_id), Type::F64);
        assert_eq!(types.type_of(plain_id), Type::I32);
    }

    #[test]
    fn comparisons_always_yield_bool() {
        let cmp = binary(BinOp::Lt, string("a"), int(1));
        let cmp_id = cmp.id;
        let p = main_with(vec![stmt(StmtKind::Expr(cmp))]);
        let (types, _, diagnostics) = check(&p);
        assert!(diagnostics.is_empty());
        assert_eq!(types.type_of(cmp_id), Type::BOOL);
    }

    #[test]
    fn logical_operators_require_bool_operands() {
        let p = main_with(vec![stmt(StmtKind::Expr(binary(
            BinOp::And,
            int(1),
            boolean(true),
        )))]);
        let (_, _, diagnostics) = check(&p);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), "requires-bool");
    }

    #[test]
    fn bitwise_operators_keep_the_left_operand_type() {
        let e = binary(BinOp::BitAnd, int(3), int(5));
        let e_id = e.id;
        let p = main_with(vec![stmt(StmtKind::Expr(e))]);
        let (types, _, diagnostics) = check(&p);
        assert!(diagnostics.is_empty());
        assert_eq!(types.type_of(e_id), Type::I32);
    }

    #[test]
    fn call_checks_arity_and_argument_types() {
        let add = fn_decl(
            "add",
            vec![],
            vec![param("a", ty("i32")), param("b", ty("i32"))],
            Some(ty("i32")),
            block(vec![ret_stmt(Some(binary(
                BinOp::Add,
                ident("a"),
                ident("b"),
            )))]),
        );
        let bad_count = call(ident("add"), vec![int(1)]);
        let bad_type = call(ident("add"), vec![int(1), string("x")]);
        let p = program(vec![
            add,
            fn_decl(
                "main",
                vec![],
                vec![],
                None,
                block(vec![
                    stmt(StmtKind::Expr(bad_count)),
                    stmt(StmtKind::Expr(bad_type)),
                ]),
            ),
        ]);
        let (_, _, diagnostics) = check(&p);
        let codes: Vec<&str> = diagnostics.iter().map(|d| d.code()).collect();
        assert_eq!(codes, vec!["wrong-argument-count", "type-mismatch"]);
    }

    #[test]
    fn calling_a_non_function_is_not_callable() {
        let p = main_with(vec![
            var_stmt("x", Some(ty("i32")), Some(int(1))),
            stmt(StmtKind::Expr(call(ident("x"), vec![]))),
        ]);
        let (_, _, diagnostics) = check(&p);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), "not-callable");
    }

    #[test]
    fn missing_struct_field_names_owner_and_field() {
        let p = program(vec![
            point_decl(),
            fn_decl(
                "main",
                vec![],
                vec![],
                None,
                block(vec![
                    var_stmt(
                        "p",
                        Some(ty("Point")),
                        Some(struct_init("Point", vec![("x", int(1)), ("y", int(2))])),
                    ),
                    stmt(StmtKind::Expr(field(ident("p"), "z"))),
                ]),
            ),
        ]);
        let (_, _, diagnostics) = check(&p);
        assert_eq!(diagnostics.len(), 1);
        match &diagnostics[0] {
            Diagnostic::NoSuchField { owner, field, .. } => {
                assert_eq!(owner, "Point");
                assert_eq!(field, "z");
            }
            other => panic!("unexpected diagnostic {:?}", other),
        }
    }

    #[test]
    fn enum_variant_access_yields_the_enum_type() {
        let color = decl(DeclKind::Enum(EnumDecl {
            name: "Color".to_string(),
            variants: vec![
                VariantDecl {
                    name: "red".to_string(),
                    value: None,
                    span: sp(),
                },
                VariantDecl {
                    name: "green".to_string(),
                    value: Some(5),
                    span: sp(),
                },
            ],
        }));
        let access = field(ident("Color"), "red");
        let access_id = access.id;
        let p = program(vec![
            color,
            fn_decl(
                "main",
                vec![],
                vec![],
                None,
                block(vec![stmt(StmtKind::Expr(access))]),
            ),
        ]);
        let (types, _, diagnostics) = check(&p);
        assert!(diagnostics.is_empty());
        match types.type_of(access_id) {
            Type::Enum { name, variants } => {
                assert_eq!(name, "Color");
                assert_eq!(variants[0], ("red".to_string(), Some(0)));
                assert_eq!(variants[1], ("green".to_string(), Some(5)));
            }
            other => panic!("unexpected type {:?}", other),
        }
    }

    #[test]
    fn adr_and_val_pseudo_fields() {
        let addressed = field(ident("x"), "adr");
        let addressed_id = addressed.id;
        let deref = field(field(ident("x"), "adr"), "val");
        let deref_id = deref.id;
        let bad = field(int(1), "val");
        let p = main_with(vec![
            var_stmt("x", Some(ty("i32")), None),
            stmt(StmtKind::Expr(addressed)),
            stmt(StmtKind::Expr(deref)),
            stmt(StmtKind::Expr(bad)),
        ]);
        let (types, _, diagnostics) = check(&p);
        assert_eq!(types.type_of(addressed_id), Type::pointer(Type::I32));
        assert_eq!(types.type_of(deref_id), Type::I32);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), "field-access-on-non-struct");
    }

    #[test]
    fn new_always_yields_a_reference() {
        let alloc = expr(ExprKind::New(ty("i32")));
        let alloc_id = alloc.id;
        let p = main_with(vec![stmt(StmtKind::Expr(alloc))]);
        let (types, _, diagnostics) = check(&p);
        assert!(diagnostics.is_empty());
        assert_eq!(types.type_of(alloc_id), Type::reference(Type::I32));
    }

    #[test]
    fn condition_must_be_bool() {
        let p = main_with(vec![stmt(StmtKind::If {
            cond: int(1),
            then_body: block(vec![]),
            else_body: None,
        })]);
        let (_, _, diagnostics) = check(&p);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), "condition-not-bool");
    }

    #[test]
    fn return_value_checked_against_signature() {
        let p = program(vec![fn_decl(
            "f",
            vec![],
            vec![],
            Some(ty("i32")),
            block(vec![ret_stmt(Some(string("nope")))]),
        )]);
        let (_, _, diagnostics) = check(&p);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), "type-mismatch");
    }

    #[test]
    fn assigning_to_a_constant_is_rejected() {
        let constant = stmt(StmtKind::Var(VarDecl {
            name: "limit".to_string(),
            ty: Some(ty("i32")),
            init: Some(int(10)),
            constant: true,
        }));
        let p = main_with(vec![
            constant,
            stmt(StmtKind::Assign {
                target: ident("limit"),
                value: int(11),
            }),
        ]);
        let (_, _, diagnostics) = check(&p);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), "assign-to-immutable");
    }

    #[test]
    fn identity_calls_specialize_per_argument_type() {
        // identity :: fn($T, x: T) T { ret x }
        let identity = fn_decl(
            "identity",
            vec![generic_param("T", None)],
            vec![param("x", ty("T"))],
            Some(ty("T")),
            block(vec![ret_stmt(Some(ident("x")))]),
        );
        let int_call = call(ident("identity"), vec![int(7)]);
        let int_call_id = int_call.id;
        let str_call = call(ident("identity"), vec![string("s")]);
        let str_call_id = str_call.id;
        let p = program(vec![
            identity,
            fn_decl(
                "main",
                vec![],
                vec![],
                None,
                block(vec![
                    stmt(StmtKind::Expr(int_call)),
                    stmt(StmtKind::Expr(str_call)),
                ]),
            ),
        ]);
        let (types, mut mono, diagnostics) = check(&p);
        assert!(diagnostics.is_empty(), "unexpected: {:?}", diagnostics);
        assert_eq!(types.type_of(int_call_id), Type::I32);
        assert_eq!(types.type_of(str_call_id), Type::STR);
        assert_eq!(mono.instantiation_count(), 2);
        let spec = mono.specialize("identity", &[Type::I32], sp()).unwrap();
        assert_eq!(spec.name(), Some("identity__i32"));
        let spec = mono.specialize("identity", &[Type::STR], sp()).unwrap();
        assert_eq!(spec.name(), Some("identity__string"));
    }

    #[test]
    fn constrained_generic_rejects_struct_argument_at_binding() {
        let numeric = decl(DeclKind::TypeSet(TypeSetDecl {
            name: "Numeric".to_string(),
            members: vec![ty("i32"), ty("i64"), ty("f64")],
        }));
        let square = fn_decl(
            "square",
            vec![generic_param("T", Some(ty("Numeric")))],
            vec![param("x", ty("T"))],
            Some(ty("T")),
            block(vec![ret_stmt(Some(binary(
                BinOp::Mul,
                ident("x"),
                ident("x"),
            )))]),
        );
        let p = program(vec![
            numeric,
            point_decl(),
            square,
            fn_decl(
                "main",
                vec![],
                vec![],
                None,
                block(vec![
                    var_stmt(
                        "p",
                        Some(ty("Point")),
                        Some(struct_init("Point", vec![("x", int(1)), ("y", int(2))])),
                    ),
                    stmt(StmtKind::Expr(call(ident("square"), vec![ident("p")]))),
                ]),
            ),
        ]);
        let (_, mono, diagnostics) = check(&p);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), "constraint-violation");
        assert_eq!(mono.instantiation_count(), 0);
    }

    #[test]
    fn generic_struct_infers_arguments_from_initializer() {
        let boxed = decl(DeclKind::Struct(StructDecl {
            name: "Box".to_string(),
            generics: vec![generic_param("T", None)],
            fields: vec![FieldDecl {
                name: "value".to_string(),
                ty: ty("T"),
                span: sp(),
            }],
        }));
        let init = struct_init("Box", vec![("value", int(3))]);
        let init_id = init.id;
        let access = field(ident("b"), "value");
        let access_id = access.id;
        let p = program(vec![
            boxed,
            fn_decl(
                "main",
                vec![],
                vec![],
                None,
                block(vec![
                    var_stmt("b", None, Some(init)),
                    stmt(StmtKind::Expr(access)),
                ]),
            ),
        ]);
        let (types, mono, diagnostics) = check(&p);
        assert!(diagnostics.is_empty(), "unexpected: {:?}", diagnostics);
        assert_eq!(
            types.type_of(init_id),
            Type::GenericInstance {
                base: "Box".to_string(),
                args: vec![Type::I32],
            }
        );
        assert_eq!(types.type_of(access_id), Type::I32);
        // Box__i32 was cached for codegen
        assert_eq!(mono.instantiation_count(), 1);
    }

    #[test]
    fn forward_struct_references_resolve_across_file_order() {
        // First uses Second before Second is declared
        let first = struct_decl("First", vec![("next", ty("Second"))]);
        let second = struct_decl("Second", vec![("n", ty("i32"))]);
        let access = field(field(ident("f"), "next"), "n");
        let access_id = access.id;
        let p = program(vec![
            first,
            second,
            fn_decl(
                "main",
                vec![],
                vec![],
                None,
                block(vec![
                    var_stmt("f", Some(ty("First")), None),
                    stmt(StmtKind::Expr(access)),
                ]),
            ),
        ]);
        let (types, _, diagnostics) = check(&p);
        assert!(diagnostics.is_empty(), "unexpected: {:?}", diagnostics);
        assert_eq!(types.type_of(access_id), Type::I32);
    }

    #[test]
    fn deep_expression_nesting_stays_iterative() {
        let mut e = int(0);
        for _ in 0..10_000 {
            e = binary(BinOp::Add, e, int(1));
        }
        let p = main_with(vec![stmt(StmtKind::Expr(e))]);
        let (_, _, diagnostics) = check(&p);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn for_in_over_array_types_binding_and_index() {
        let arr = expr(ExprKind::ArrayInit {
            elems: vec![int(1), int(2), int(3)],
        });
        let use_item = binary(BinOp::Add, ident("item"), int(1));
        let use_item_id = use_item.id;
        let p = main_with(vec![
            var_stmt("xs", None, Some(arr)),
            stmt(StmtKind::ForIn {
                label: None,
                binding: "item".to_string(),
                index: Some("i".to_string()),
                iterable: ident("xs"),
                body: block(vec![stmt(StmtKind::Expr(use_item))]),
            }),
        ]);
        let (types, _, diagnostics) = check(&p);
        assert!(diagnostics.is_empty(), "unexpected: {:?}", diagnostics);
        assert_eq!(types.type_of(use_item_id), Type::I32);
    }
}
