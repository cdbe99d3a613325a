//! Name resolution pass for Sable
//!
//! First of the three passes: a single preorder walk over top-level
//! declarations and function bodies that populates the symbol table and
//! the module table, reporting name collisions as it goes. Every symbol is
//! created with `Type::Unknown`; type checking patches the types later.
//!
//! The walk is driven by an explicit work stack, not recursion, since
//! declaration nesting depth is user controlled.

use crate::ast::*;
use crate::sema::symbols::{ModuleTable, Symbol, SymbolKind, SymbolTable};
use crate::utils::{Diagnostic, Result};

/// Work items for the iterative preorder walk
enum Work<'a> {
    Decl(&'a Decl),
    Stmt(&'a Stmt),
    Block(&'a Block),
    ExitScope,
}

pub struct NameResolution<'a> {
    symbols: &'a mut SymbolTable,
    modules: &'a mut ModuleTable,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl<'a> NameResolution<'a> {
    pub fn new(
        symbols: &'a mut SymbolTable,
        modules: &'a mut ModuleTable,
        diagnostics: &'a mut Vec<Diagnostic>,
    ) -> Self {
        Self {
            symbols,
            modules,
            diagnostics,
        }
    }

    /// Resolve a whole compilation unit. Never aborts on user errors:
    /// every collision is appended and the walk continues.
    pub fn run(&mut self, program: &Program) -> Result<()> {
        let mut work: Vec<Work> = program.decls.iter().rev().map(Work::Decl).collect();
        while let Some(item) = work.pop() {
            match item {
                Work::Decl(decl) => self.resolve_decl(decl, &mut work),
                Work::Stmt(stmt) => self.resolve_stmt(stmt, &mut work),
                Work::Block(body) => {
                    self.symbols.enter_scope("block");
                    work.push(Work::ExitScope);
                    for stmt in body.stmts.iter().rev() {
                        work.push(Work::Stmt(stmt));
                    }
                }
                Work::ExitScope => self.symbols.exit_scope(),
            }
        }
        Ok(())
    }

    fn define(&mut self, symbol: Symbol) {
        if let Err(diag) = self.symbols.define(symbol) {
            self.diagnostics.push(diag);
        }
    }

    /// Define a struct/union field or enum variant inside its owner's
    /// nested scope; collisions become duplicate-field diagnostics. These
    /// symbols exist only for duplicate detection, so the unused-symbol
    /// scan skips them.
    fn define_member(&mut self, owner: &str, mut symbol: Symbol) {
        symbol.used = true;
        let name = symbol.name.clone();
        let span = symbol.span;
        if self.symbols.define(symbol).is_err() {
            self.diagnostics.push(Diagnostic::DuplicateField {
                owner: owner.to_string(),
                field: name,
                span,
            });
        }
    }

    fn define_generic_params(&mut self, generics: &[GenericParamDecl]) {
        for gp in generics {
            let symbol = Symbol::new(&gp.name, SymbolKind::GenericParam, gp.span);
            if self.symbols.define(symbol).is_err() {
                self.diagnostics.push(Diagnostic::DuplicateGenericParam {
                    name: gp.name.clone(),
                    span: gp.span,
                });
            }
        }
    }

    fn resolve_decl<'b>(&mut self, decl: &'b Decl, work: &mut Vec<Work<'b>>) {
        match &decl.kind {
            DeclKind::Function(f) => {
                self.define(
                    Symbol::new(&f.name, SymbolKind::Function, decl.span).with_decl(decl.id),
                );
                if !f.generics.is_empty() {
                    self.symbols.enter_scope(format!("{}.generics", f.name));
                    self.define_generic_params(&f.generics);
                    work.push(Work::ExitScope);
                }
                self.symbols.enter_scope(f.name.clone());
                work.push(Work::ExitScope);
                for param in &f.params {
                    self.define(
                        Symbol::new(&param.name, SymbolKind::Variable, param.span).mutable(true),
                    );
                }
                for stmt in f.body.stmts.iter().rev() {
                    work.push(Work::Stmt(stmt));
                }
            }
            DeclKind::Struct(s) => {
                self.define(
                    Symbol::new(&s.name, SymbolKind::Struct, decl.span).with_decl(decl.id),
                );
                if !s.generics.is_empty() {
                    self.symbols.enter_scope(format!("{}.generics", s.name));
                    self.define_generic_params(&s.generics);
                }
                self.symbols.enter_scope(format!("{}.fields", s.name));
                for field in &s.fields {
                    self.define_member(
                        &s.name,
                        Symbol::new(&field.name, SymbolKind::Variable, field.span),
                    );
                }
                self.symbols.exit_scope();
                if !s.generics.is_empty() {
                    self.symbols.exit_scope();
                }
            }
            DeclKind::Enum(e) => {
                self.define(Symbol::new(&e.name, SymbolKind::Enum, decl.span).with_decl(decl.id));
                self.symbols.enter_scope(format!("{}.variants", e.name));
                for variant in &e.variants {
                    self.define_member(
                        &e.name,
                        Symbol::new(&variant.name, SymbolKind::EnumVariant, variant.span),
                    );
                }
                self.symbols.exit_scope();
            }
            DeclKind::Union(u) => {
                self.define(Symbol::new(&u.name, SymbolKind::Union, decl.span).with_decl(decl.id));
                self.symbols.enter_scope(format!("{}.fields", u.name));
                for field in &u.fields {
                    self.define_member(
                        &u.name,
                        Symbol::new(&field.name, SymbolKind::Variable, field.span),
                    );
                }
                self.symbols.exit_scope();
            }
            DeclKind::TypeSet(t) => {
                self.define(Symbol::new(&t.name, SymbolKind::Type, decl.span).with_decl(decl.id));
            }
            DeclKind::Var(v) => {
                let kind = if v.constant {
                    SymbolKind::Constant
                } else {
                    SymbolKind::Variable
                };
                self.define(
                    Symbol::new(&v.name, kind, decl.span)
                        .with_decl(decl.id)
                        .mutable(!v.constant),
                );
            }
            DeclKind::Import(import) => self.resolve_import(import, decl),
        }
    }

    /// Register the import in the module table without loading anything;
    /// loading is the collaborator's job, invoked between passes.
    fn resolve_import(&mut self, import: &ImportDecl, decl: &Decl) {
        match &import.kind {
            ImportKind::Alias(alias) => {
                self.modules.add_alias(alias, &import.path);
                self.define(Symbol::new(alias, SymbolKind::Module, decl.span).with_decl(decl.id));
            }
            ImportKind::Using => {
                self.modules.add_using(&import.path);
            }
            ImportKind::Named(names) => {
                for name in names {
                    self.modules.add_named(name, &import.path);
                    self.define(
                        Symbol::new(name, SymbolKind::Module, decl.span).with_decl(decl.id),
                    );
                }
            }
        }
    }

    fn resolve_stmt<'b>(&mut self, stmt: &'b Stmt, work: &mut Vec<Work<'b>>) {
        match &stmt.kind {
            StmtKind::Var(v) => {
                let kind = if v.constant {
                    SymbolKind::Constant
                } else {
                    SymbolKind::Variable
                };
                self.define(Symbol::new(&v.name, kind, stmt.span).mutable(!v.constant));
            }
            StmtKind::Block(body) => work.push(Work::Block(body)),
            StmtKind::If {
                then_body,
                else_body,
                ..
            } => {
                if let Some(else_body) = else_body {
                    work.push(Work::Block(else_body));
                }
                work.push(Work::Block(then_body));
            }
            StmtKind::While { body, .. } => work.push(Work::Block(body)),
            StmtKind::For {
                init, step, body, ..
            } => {
                self.symbols.enter_scope("for");
                work.push(Work::ExitScope);
                work.push(Work::Block(body));
                if let Some(step) = step {
                    work.push(Work::Stmt(step));
                }
                if let Some(init) = init {
                    work.push(Work::Stmt(init));
                }
            }
            StmtKind::ForIn {
                binding, index, body, ..
            } => {
                self.symbols.enter_scope("for-in");
                self.define(Symbol::new(binding, SymbolKind::Variable, stmt.span));
                if let Some(index) = index {
                    self.define(Symbol::new(index, SymbolKind::Variable, stmt.span));
                }
                work.push(Work::ExitScope);
                work.push(Work::Block(body));
            }
            StmtKind::Match {
                cases, else_body, ..
            } => {
                if let Some(else_body) = else_body {
                    work.push(Work::Block(else_body));
                }
                for case in cases.iter().rev() {
                    work.push(Work::Block(&case.body));
                }
            }
            StmtKind::Assign { .. }
            | StmtKind::Expr(_)
            | StmtKind::Break { .. }
            | StmtKind::Continue { .. }
            | StmtKind::Return(_)
            | StmtKind::Defer(_)
            | StmtKind::Delete(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::*;

    fn resolve(program: &Program) -> (SymbolTable, ModuleTable, Vec<Diagnostic>) {
        let mut symbols = SymbolTable::new();
        let mut modules = ModuleTable::new();
        let mut diagnostics = Vec::new();
        NameResolution::new(&mut symbols, &mut modules, &mut diagnostics)
            .run(program)
            .unwrap();
        (symbols, modules, diagnostics)
    }

    #[test]
    fn top_level_declarations_are_defined() {
        let program = program(vec![
            struct_decl("Point", vec![("x", ty("i32")), ("y", ty("i32"))]),
            fn_decl("main", vec![], vec![], None, block(vec![])),
        ]);
        let (symbols, _, diagnostics) = resolve(&program);
        assert!(diagnostics.is_empty());
        assert_eq!(symbols.lookup("Point").unwrap().kind, SymbolKind::Struct);
        assert_eq!(symbols.lookup("main").unwrap().kind, SymbolKind::Function);
    }

    #[test]
    fn unrelated_collisions_are_all_collected() {
        let program = program(vec![
            fn_decl("f", vec![], vec![], None, block(vec![])),
            fn_decl("f", vec![], vec![], None, block(vec![])),
            struct_decl("S", vec![]),
            struct_decl("S", vec![]),
        ]);
        let (_, _, diagnostics) = resolve(&program);
        let codes: Vec<&str> = diagnostics.iter().map(|d| d.code()).collect();
        assert_eq!(codes, vec!["already-defined", "already-defined"]);
    }

    #[test]
    fn duplicate_struct_field_is_reported() {
        let program = program(vec![struct_decl(
            "Pair",
            vec![("a", ty("i32")), ("a", ty("i32"))],
        )]);
        let (_, _, diagnostics) = resolve(&program);
        assert_eq!(diagnostics.len(), 1);
        match &diagnostics[0] {
            Diagnostic::DuplicateField { owner, field, .. } => {
                assert_eq!(owner, "Pair");
                assert_eq!(field, "a");
            }
            other => panic!("unexpected diagnostic {:?}", other),
        }
    }

    #[test]
    fn duplicate_generic_param_is_reported() {
        let program = program(vec![fn_decl(
            "id",
            vec![generic_param("T", None), generic_param("T", None)],
            vec![],
            None,
            block(vec![]),
        )]);
        let (_, _, diagnostics) = resolve(&program);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), "duplicate-generic-param");
    }

    #[test]
    fn locals_shadow_across_scopes_without_collision() {
        let inner = stmt(StmtKind::Block(block(vec![var_stmt("x", None, None)])));
        let program = program(vec![fn_decl(
            "main",
            vec![],
            vec![],
            None,
            block(vec![var_stmt("x", None, None), inner]),
        )]);
        let (_, _, diagnostics) = resolve(&program);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn duplicate_local_in_same_scope_collides() {
        let program = program(vec![fn_decl(
            "main",
            vec![],
            vec![],
            None,
            block(vec![var_stmt("x", None, None), var_stmt("x", None, None)]),
        )]);
        let (_, _, diagnostics) = resolve(&program);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code(), "already-defined");
    }

    #[test]
    fn for_in_preregisters_binding_and_index() {
        let body = block(vec![var_stmt("y", None, None)]);
        let for_in = stmt(StmtKind::ForIn {
            label: None,
            binding: "item".to_string(),
            index: Some("i".to_string()),
            iterable: ident("xs"),
            body,
        });
        let program = program(vec![fn_decl(
            "main",
            vec![],
            vec![],
            None,
            block(vec![for_in]),
        )]);
        let (_, _, diagnostics) = resolve(&program);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn imports_register_without_loading() {
        let program = program(vec![
            decl(DeclKind::Import(ImportDecl {
                path: "core:io".to_string(),
                kind: ImportKind::Alias("io".to_string()),
            })),
            decl(DeclKind::Import(ImportDecl {
                path: "core:mem".to_string(),
                kind: ImportKind::Named(vec!["alloc".to_string()]),
            })),
            decl(DeclKind::Import(ImportDecl {
                path: "core:fmt".to_string(),
                kind: ImportKind::Using,
            })),
        ]);
        let (symbols, modules, diagnostics) = resolve(&program);
        assert!(diagnostics.is_empty());
        assert_eq!(symbols.lookup("io").unwrap().kind, SymbolKind::Module);
        assert_eq!(symbols.lookup("alloc").unwrap().kind, SymbolKind::Module);
        assert_eq!(modules.alias_target("io"), Some("core:io"));
        assert_eq!(modules.usings(), &["core:fmt".to_string()]);
        assert_eq!(modules.paths().len(), 3);
    }

    #[test]
    fn deep_nesting_does_not_overflow() {
        // 4k nested blocks; the explicit work stack keeps this flat
        let mut body = block(vec![var_stmt("x", None, None)]);
        for _ in 0..4096 {
            body = block(vec![stmt(StmtKind::Block(body))]);
        }
        let program = program(vec![fn_decl("main", vec![], vec![], None, body)]);
        let (_, _, diagnostics) = resolve(&program);
        assert!(diagnostics.is_empty());
    }
}
