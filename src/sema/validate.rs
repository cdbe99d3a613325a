//! Semantic validation pass for Sable
//!
//! Third of the three passes, read-only over the symbol table and the
//! node-to-type map built by type checking. Validates control flow
//! (break/continue/return legality, return-path totality), memory
//! discipline (del targets must be references, nil only in reference
//! positions) and defer scoping.

use crate::ast::*;
use crate::sema::context::SemanticContext;
use crate::sema::symbols::{ScopeWalker, SymbolTable};
use crate::sema::typecheck::TypeMap;
use crate::utils::{Diagnostic, Result};

/// Work items for the iterative statement walk
enum VWork<'a> {
    Stmt(&'a Stmt),
    EnterBlock(&'a Block),
    ExitScope,
    ExitLoop,
}

/// Work items for the iterative totality computation
enum TWork<'a> {
    Block(&'a Block),
    Stmt(&'a Stmt),
    ExitIf,
    ExitMatch { cases: usize, else_stmts: usize },
}

pub struct Validator<'a> {
    symbols: &'a mut SymbolTable,
    types: &'a TypeMap,
    diagnostics: &'a mut Vec<Diagnostic>,
    ctx: SemanticContext,
}

impl<'a> Validator<'a> {
    pub fn new(
        symbols: &'a mut SymbolTable,
        types: &'a TypeMap,
        diagnostics: &'a mut Vec<Diagnostic>,
    ) -> Self {
        Self {
            symbols,
            types,
            diagnostics,
            ctx: SemanticContext::new(),
        }
    }

    pub fn run(&mut self, program: &Program) -> Result<()> {
        let mut walker = ScopeWalker::new();
        for decl in &program.decls {
            match &decl.kind {
                DeclKind::Function(f) => self.check_function(f, decl, &mut walker)?,
                DeclKind::Struct(_) | DeclKind::Enum(_) | DeclKind::Union(_) => {
                    crate::sema::skip_decl_scopes(decl, &mut walker, self.symbols)?;
                }
                DeclKind::Var(v) => self.check_global(v, decl),
                DeclKind::TypeSet(_) | DeclKind::Import(_) => {}
            }
        }
        Ok(())
    }

    fn diag(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    fn check_global(&mut self, v: &VarDecl, decl: &Decl) {
        if let Some(init) = &v.init {
            if matches!(init.kind, ExprKind::Nil) {
                let ty = self
                    .symbols
                    .lookup(&v.name)
                    .map(|s| s.ty.clone())
                    .unwrap_or(crate::types::Type::Unknown);
                self.require_reference_for_nil(&ty, decl.span);
            } else {
                self.check_nil_usage(init);
            }
        }
    }

    fn require_reference_for_nil(&mut self, expected: &crate::types::Type, span: crate::utils::Span) {
        use crate::types::Type;
        if !matches!(expected, Type::Reference(_)) && !expected.is_unknown() {
            self.diag(Diagnostic::NilForNonReference {
                expected: expected.to_string(),
                span,
            });
        }
    }

    fn check_function(
        &mut self,
        f: &FunctionDecl,
        decl: &Decl,
        walker: &mut ScopeWalker,
    ) -> Result<()> {
        use crate::types::Type;
        log::trace!("validating function {}", f.name);
        let ret_ty = match self.symbols.lookup(&f.name).map(|s| s.ty.clone()) {
            Some(Type::Function { ret, .. }) => ret.map(|r| *r),
            _ => None,
        };

        if !f.generics.is_empty() {
            walker.enter(self.symbols)?;
        }
        walker.enter(self.symbols)?;
        self.ctx
            .enter_function(&f.name, ret_ty.clone(), Default::default());

        self.walk_stmts(&f.body.stmts, walker)?;

        if ret_ty.is_some() && !block_is_total(&f.body) {
            self.diag(Diagnostic::MissingReturn {
                function: f.name.clone(),
                span: decl.span,
            });
        }

        self.ctx.exit_function();
        walker.exit(self.symbols);
        if !f.generics.is_empty() {
            walker.exit(self.symbols);
        }
        Ok(())
    }

    fn walk_stmts(&mut self, stmts: &[Stmt], walker: &mut ScopeWalker) -> Result<()> {
        let mut work: Vec<VWork> = stmts.iter().rev().map(VWork::Stmt).collect();
        while let Some(item) = work.pop() {
            match item {
                VWork::Stmt(stmt) => self.check_stmt(stmt, &mut work, walker)?,
                VWork::EnterBlock(block) => {
                    walker.enter(self.symbols)?;
                    work.push(VWork::ExitScope);
                    for stmt in block.stmts.iter().rev() {
                        work.push(VWork::Stmt(stmt));
                    }
                }
                VWork::ExitScope => {
                    // Defers registered at this depth are done; codegen
                    // runs them in reverse registration order
                    let depth = self.symbols.depth();
                    let popped = self.ctx.pop_defers_at_depth(depth);
                    if !popped.is_empty() {
                        log::trace!("{} defer(s) leave scope depth {}", popped.len(), depth);
                    }
                    walker.exit(self.symbols);
                }
                VWork::ExitLoop => {
                    self.ctx.exit_loop();
                }
            }
        }
        Ok(())
    }

    fn check_stmt<'b>(
        &mut self,
        stmt: &'b Stmt,
        work: &mut Vec<VWork<'b>>,
        walker: &mut ScopeWalker,
    ) -> Result<()> {
        use crate::types::Type;
        match &stmt.kind {
            StmtKind::Var(v) => {
                if let Some(init) = &v.init {
                    if matches!(init.kind, ExprKind::Nil) {
                        let ty = self
                            .symbols
                            .lookup(&v.name)
                            .map(|s| s.ty.clone())
                            .unwrap_or(Type::Unknown);
                        self.require_reference_for_nil(&ty, stmt.span);
                    } else {
                        self.check_nil_usage(init);
                    }
                }
            }
            StmtKind::Assign { target, value } => {
                if matches!(value.kind, ExprKind::Nil) {
                    let ty = self.types.type_of(target.id);
                    self.require_reference_for_nil(&ty, stmt.span);
                } else {
                    self.check_nil_usage(value);
                }
                self.check_nil_usage(target);
            }
            StmtKind::Expr(e) => self.check_nil_usage(e),
            StmtKind::Block(b) => work.push(VWork::EnterBlock(b)),
            StmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                self.check_nil_usage(cond);
                if let Some(else_body) = else_body {
                    work.push(VWork::EnterBlock(else_body));
                }
                work.push(VWork::EnterBlock(then_body));
            }
            StmtKind::While { label, cond, body } => {
                self.check_nil_usage(cond);
                self.ctx.enter_loop(label.clone());
                work.push(VWork::ExitLoop);
                work.push(VWork::EnterBlock(body));
            }
            StmtKind::For {
                label,
                init,
                cond,
                step,
                body,
            } => {
                walker.enter(self.symbols)?;
                self.ctx.enter_loop(label.clone());
                if let Some(cond) = cond {
                    self.check_nil_usage(cond);
                }
                work.push(VWork::ExitScope);
                work.push(VWork::ExitLoop);
                work.push(VWork::EnterBlock(body));
                if let Some(step) = step {
                    work.push(VWork::Stmt(step));
                }
                if let Some(init) = init {
                    work.push(VWork::Stmt(init));
                }
            }
            StmtKind::ForIn {
                label,
                iterable,
                body,
                ..
            } => {
                walker.enter(self.symbols)?;
                self.ctx.enter_loop(label.clone());
                self.check_nil_usage(iterable);
                work.push(VWork::ExitScope);
                work.push(VWork::ExitLoop);
                work.push(VWork::EnterBlock(body));
            }
            StmtKind::Match {
                scrutinee,
                cases,
                else_body,
            } => {
                self.check_nil_usage(scrutinee);
                if let Some(else_body) = else_body {
                    work.push(VWork::EnterBlock(else_body));
                }
                for case in cases.iter().rev() {
                    work.push(VWork::EnterBlock(&case.body));
                }
            }
            StmtKind::Break { label } => {
                if let Err(diag) = self.ctx.validate_break(label.as_deref(), stmt.span) {
                    self.diag(diag);
                }
            }
            StmtKind::Continue { label } => {
                if let Err(diag) = self.ctx.validate_continue(label.as_deref(), stmt.span) {
                    self.diag(diag);
                }
            }
            StmtKind::Return(value) => {
                if !self.ctx.in_function() {
                    self.diag(Diagnostic::ReturnOutsideFunction { span: stmt.span });
                }
                if let Some(value) = value {
                    if matches!(value.kind, ExprKind::Nil) {
                        let expected = self
                            .ctx
                            .function()
                            .and_then(|f| f.return_type.clone())
                            .unwrap_or(Type::Unknown);
                        self.require_reference_for_nil(&expected, stmt.span);
                    } else {
                        self.check_nil_usage(value);
                    }
                }
            }
            StmtKind::Defer(e) => {
                if self.ctx.in_function() {
                    let depth = self.symbols.depth();
                    self.ctx.add_defer(e.id, depth);
                } else {
                    self.diag(Diagnostic::DeferOutsideFunction { span: stmt.span });
                }
                self.check_nil_usage(e);
            }
            StmtKind::Delete(e) => {
                if !self.ctx.in_function() {
                    self.diag(Diagnostic::DeleteOutsideFunction { span: stmt.span });
                }
                match self.types.type_of(e.id) {
                    Type::Reference(_) | Type::Unknown => {}
                    other => self.diag(Diagnostic::DeleteNonReference {
                        got: other.to_string(),
                        span: stmt.span,
                    }),
                }
                self.check_nil_usage(e);
            }
        }
        Ok(())
    }

    /// Walk an expression tree and flag nil placed in a position whose
    /// expected type is not a reference (call arguments, struct and array
    /// initializer slots).
    fn check_nil_usage(&mut self, root: &Expr) {
        use crate::types::Type;
        let mut work: Vec<&Expr> = vec![root];
        while let Some(e) = work.pop() {
            match &e.kind {
                ExprKind::Call { callee, args } => {
                    if let Type::Function {
                        params,
                        variadic_elem,
                        ..
                    } = self.types.type_of(callee.id)
                    {
                        for (i, arg) in args.iter().enumerate() {
                            if matches!(arg.kind, ExprKind::Nil) {
                                let expected =
                                    params.get(i).or(variadic_elem.as_deref());
                                if let Some(expected) = expected {
                                    self.require_reference_for_nil(expected, arg.span);
                                }
                            }
                        }
                    }
                    work.push(callee);
                    work.extend(args.iter());
                }
                ExprKind::StructInit { fields, .. } => {
                    if let Type::Struct {
                        fields: decl_fields,
                        ..
                    } = self.types.type_of(e.id)
                    {
                        for init in fields {
                            if matches!(init.value.kind, ExprKind::Nil) {
                                if let Some((_, field_ty)) =
                                    decl_fields.iter().find(|(n, _)| n == &init.name)
                                {
                                    self.require_reference_for_nil(field_ty, init.span);
                                }
                            }
                        }
                    }
                    work.extend(fields.iter().map(|f| &f.value));
                }
                ExprKind::ArrayInit { elems } => {
                    if let Type::Array { elem, .. } = self.types.type_of(e.id) {
                        for element in elems {
                            if matches!(element.kind, ExprKind::Nil) {
                                self.require_reference_for_nil(&elem, element.span);
                            }
                        }
                    }
                    work.extend(elems.iter());
                }
                ExprKind::Binary { lhs, rhs, .. } => {
                    work.push(lhs);
                    work.push(rhs);
                }
                ExprKind::Unary { operand, .. } => work.push(operand),
                ExprKind::Field { base, .. } => work.push(base),
                ExprKind::Index { base, index } => {
                    work.push(base);
                    work.push(index);
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
    }
}

/// Return-path totality of a block, computed bottom-up over an explicit
/// work list with a result stack.
///
/// A Return is always total. A Block is total iff its last statement is
/// (empty blocks are not). An If is total only with an else branch and
/// both branches total. A Match is total only with an else-case, every
/// case branch total, and at least one else-case statement total.
pub fn block_is_total(block: &Block) -> bool {
    let mut work: Vec<TWork> = vec![TWork::Block(block)];
    let mut results: Vec<bool> = Vec::new();
    while let Some(item) = work.pop() {
        match item {
            TWork::Block(b) => match b.stmts.last() {
                Some(last) => work.push(TWork::Stmt(last)),
                None => results.push(false),
            },
            TWork::Stmt(s) => match &s.kind {
                StmtKind::Return(_) => results.push(true),
                StmtKind::Block(b) => work.push(TWork::Block(b)),
                StmtKind::If {
                    then_body,
                    else_body: Some(else_body),
                    ..
                } => {
                    work.push(TWork::ExitIf);
                    work.push(TWork::Block(then_body));
                    work.push(TWork::Block(else_body));
                }
                StmtKind::Match {
                    cases,
                    else_body: Some(else_body),
                    ..
                } => {
                    work.push(TWork::ExitMatch {
                        cases: cases.len(),
                        else_stmts: else_body.stmts.len(),
                    });
                    for case in cases {
                        work.push(TWork::Block(&case.body));
                    }
                    for stmt in &else_body.stmts {
                        work.push(TWork::Stmt(stmt));
                    }
                }
                _ => results.push(false),
            },
            TWork::ExitIf => {
                let then_total = results.pop().unwrap_or(false);
                let else_total = results.pop().unwrap_or(false);
                results.push(then_total && else_total);
            }
            TWork::ExitMatch { cases, else_stmts } => {
                let mut cases_total = true;
                for _ in 0..cases {
                    cases_total &= results.pop().unwrap_or(false);
                }
                let mut else_total = false;
                for _ in 0..else_stmts {
                    else_total |= results.pop().unwrap_or(false);
                }
                results.push(cases_total && else_total);
            }
        }
    }
    results.pop().unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;
    use crate::sema::generics::Monomorphizer;
    use crate::sema::resolve::NameResolution;
    use crate::sema::symbols::ModuleTable;
    use crate::sema::typecheck::TypeChecker;

    fn validate(program: &Program) -> Vec<Diagnostic> {
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
        Validator::new(&mut symbols, &types, &mut diagnostics)
            .run(program)
            .unwrap();
        diagnostics
    }

    fn main_with(stmts: Vec<Stmt>) -> Program {
        program(vec![fn_decl("main", vec![], vec![], None, block(stmts))])
    }

    #[test]
    fn bare_break_in_main_is_exactly_one_diagnostic() {
        // main :: fn() { break }
        let p = main_with(vec![stmt(StmtKind::Break { label: None })]);
        let diagnostics = validate(&p);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), "break-outside-loop");
    }

    #[test]
    fn break_inside_while_is_legal() {
        let p = main_with(vec![stmt(StmtKind::While {
            label: None,
            cond: boolean(true),
            body: block(vec![stmt(StmtKind::Break { label: None })]),
        })]);
        assert!(validate(&p).is_empty());
    }

    #[test]
    fn labeled_break_to_missing_label_is_reported() {
        let p = main_with(vec![stmt(StmtKind::While {
            label: Some("outer".to_string()),
            cond: boolean(true),
            body: block(vec![stmt(StmtKind::Break {
                label: Some("missing".to_string()),
            })]),
        })]);
        let diagnostics = validate(&p);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), "undefined-label");
    }

    #[test]
    fn continue_outside_loop_is_reported() {
        let p = main_with(vec![stmt(StmtKind::Continue { label: None })]);
        let diagnostics = validate(&p);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), "continue-outside-loop");
    }

    #[test]
    fn del_requires_a_reference() {
        let good = stmt(StmtKind::Delete(ident("r")));
        let bad = stmt(StmtKind::Delete(ident("x")));
        let p = main_with(vec![
            var_stmt("r", None, Some(expr(ExprKind::New(ty("i32"))))),
            var_stmt("x", Some(ty("i32")), Some(int(1))),
            good,
            bad,
        ]);
        let diagnostics = validate(&p);
        assert_eq!(diagnostics.len(), 1);
        match &diagnostics[0] {
            Diagnostic::DeleteNonReference { got, .. } => assert_eq!(got, "i32"),
            other => panic!("unexpected diagnostic {:?}", other),
        }
    }

    #[test]
    fn nil_only_for_reference_types() {
        let p = main_with(vec![
            var_stmt(
                "r",
                Some(TypeExpr::new(
                    TypeExprKind::Reference(Box::new(ty("i32"))),
                    sp(),
                )),
                Some(nil()),
            ),
            var_stmt("x", Some(ty("i32")), Some(nil())),
        ]);
        let diagnostics = validate(&p);
        assert_eq!(diagnostics.len(), 1);
        match &diagnostics[0] {
            Diagnostic::NilForNonReference { expected, .. } => assert_eq!(expected, "i32"),
            other => panic!("unexpected diagnostic {:?}", other),
        }
    }

    #[test]
    fn nil_argument_checked_against_parameter_type() {
        let take_ref = fn_decl(
            "take",
            vec![],
            vec![param(
                "r",
                TypeExpr::new(TypeExprKind::Reference(Box::new(ty("i32"))), sp()),
            )],
            None,
            block(vec![]),
        );
        let take_val = fn_decl(
            "eat",
            vec![],
            vec![param("x", ty("i32"))],
            None,
            block(vec![]),
        );
        let p = program(vec![
            take_ref,
            take_val,
            fn_decl(
                "main",
                vec![],
                vec![],
                None,
                block(vec![
                    stmt(StmtKind::Expr(call(ident("take"), vec![nil()]))),
                    stmt(StmtKind::Expr(call(ident("eat"), vec![nil()]))),
                ]),
            ),
        ]);
        let diagnostics = validate(&p);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), "nil-for-non-reference");
    }

    #[test]
    fn defer_registers_at_scope_depth() {
        let p = main_with(vec![
            stmt(StmtKind::Defer(call(ident("main"), vec![]))),
            stmt(StmtKind::Block(block(vec![stmt(StmtKind::Defer(call(
                ident("main"),
                vec![],
            )))]))),
        ]);
        assert!(validate(&p).is_empty());
    }

    #[test]
    fn non_void_function_without_total_body_is_missing_return() {
        let p = program(vec![fn_decl(
            "f",
            vec![],
            vec![],
            Some(ty("i32")),
            block(vec![stmt(StmtKind::If {
                cond: boolean(true),
                then_body: block(vec![ret_stmt(Some(int(1)))]),
                else_body: None,
            })]),
        )]);
        let diagnostics = validate(&p);
        assert_eq!(diagnostics.len(), 1);
        match &diagnostics[0] {
            Diagnostic::MissingReturn { function, .. } => assert_eq!(function, "f"),
            other => panic!("unexpected diagnostic {:?}", other),
        }
    }

    #[test]
    fn if_with_both_arms_returning_is_total() {
        let p = program(vec![fn_decl(
            "f",
            vec![],
            vec![],
            Some(ty("i32")),
            block(vec![stmt(StmtKind::If {
                cond: boolean(true),
                then_body: block(vec![ret_stmt(Some(int(1)))]),
                else_body: Some(block(vec![ret_stmt(Some(int(2)))])),
            })]),
        )]);
        assert!(validate(&p).is_empty());
    }

    #[test]
    fn void_function_needs_no_return() {
        let p = main_with(vec![]);
        assert!(validate(&p).is_empty());
    }

    #[test]
    fn match_totality_requires_else_and_total_cases() {
        let total_match = stmt(StmtKind::Match {
            scrutinee: int(1),
            cases: vec![MatchCase {
                values: vec![int(0)],
                body: block(vec![ret_stmt(Some(int(0)))]),
                span: sp(),
            }],
            else_body: Some(block(vec![ret_stmt(Some(int(1)))])),
        });
        let p = program(vec![fn_decl(
            "f",
            vec![],
            vec![],
            Some(ty("i32")),
            block(vec![total_match]),
        )]);
        assert!(validate(&p).is_empty());

        let no_else = stmt(StmtKind::Match {
            scrutinee: int(1),
            cases: vec![MatchCase {
                values: vec![int(0)],
                body: block(vec![ret_stmt(Some(int(0)))]),
                span: sp(),
            }],
            else_body: None,
        });
        let p = program(vec![fn_decl(
            "g",
            vec![],
            vec![],
            Some(ty("i32")),
            block(vec![no_else]),
        )]);
        let diagnostics = validate(&p);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), "missing-return");
    }

    #[test]
    fn totality_is_structural_over_nested_blocks() {
        // { { ret 1 } } ends in a block whose last statement returns
        let inner = stmt(StmtKind::Block(block(vec![ret_stmt(Some(int(1)))])));
        assert!(block_is_total(&block(vec![inner])));
        assert!(!block_is_total(&block(vec![])));
        assert!(!block_is_total(&block(vec![stmt(StmtKind::Expr(int(1)))])));
    }

    #[test]
    fn return_type_of_symbol_drives_missing_return() {
        // Trailing return after the if keeps the body total
        let p = program(vec![fn_decl(
            "f",
            vec![],
            vec![],
            Some(ty("i32")),
            block(vec![
                stmt(StmtKind::If {
                    cond: boolean(false),
                    then_body: block(vec![ret_stmt(Some(int(1)))]),
                    else_body: None,
                }),
                ret_stmt(Some(int(0))),
            ]),
        )]);
        assert!(validate(&p).is_empty());
    }

    #[test]
    fn nil_return_needs_reference_return_type() {
        let p = program(vec![fn_decl(
            "f",
            vec![],
            vec![],
            Some(ty("i32")),
            block(vec![ret_stmt(Some(nil()))]),
        )]);
        let diagnostics = validate(&p);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), "nil-for-non-reference");

        let ok = program(vec![fn_decl(
            "g",
            vec![],
            vec![],
            Some(TypeExpr::new(
                TypeExprKind::Reference(Box::new(ty("i32"))),
                sp(),
            )),
            block(vec![ret_stmt(Some(nil()))]),
        )]);
        assert!(validate(&ok).is_empty());
    }

    #[test]
    fn deeply_nested_control_flow_stays_iterative() {
        let mut body = block(vec![ret_stmt(Some(int(1)))]);
        for _ in 0..4096 {
            body = block(vec![stmt(StmtKind::If {
                cond: boolean(true),
                then_body: block(vec![ret_stmt(Some(int(1)))]),
                else_body: Some(body),
            })]);
        }
        let p = program(vec![fn_decl("f", vec![], vec![], Some(ty("i32")), body)]);
        assert!(validate(&p).is_empty());
    }

    #[test]
    fn delete_of_new_reference_type_is_fine() {
        let p = main_with(vec![
            var_stmt("r", None, Some(expr(ExprKind::New(ty("i32"))))),
            stmt(StmtKind::Delete(ident("r"))),
        ]);
        assert!(validate(&p).is_empty());
    }
}
