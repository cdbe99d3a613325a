//! Sable semantic core
//!
//! Takes a parsed compilation unit and runs the three analysis passes:
//! name resolution (populates the symbol table), type checking (annotates
//! every expression node with a resolved type) and semantic validation
//! (control flow and memory discipline). Generic declarations specialize
//! on demand through the monomorphization engine.
//!
//! Parsing and code generation are external collaborators: the tree comes
//! in already built (see [`ast`]), and the [`Analysis`] value going out
//! carries everything a backend needs - the symbol table, the
//! node-to-type map, the ordered diagnostics list and the specialization
//! entry point.

pub mod ast;
pub mod sema;
pub mod types;
pub mod utils;

use ast::{Decl, DeclKind, Program};
use sema::generics::Monomorphizer;
use sema::modules::{ImportDriver, ImportError, ModuleProvider};
use sema::resolve::NameResolution;
use sema::symbols::{ModuleTable, Symbol, SymbolKind, SymbolTable};
use sema::typecheck::{TypeChecker, TypeMap};
use sema::validate::Validator;
use types::Type;
use utils::{AnalysisError, Diagnostic, Result, Severity, Span};

/// Everything downstream consumers need from one analyzed unit
#[derive(Debug)]
pub struct Analysis {
    pub symbols: SymbolTable,
    pub modules: ModuleTable,
    pub types: TypeMap,
    /// Diagnostics in stable traversal order
    pub diagnostics: Vec<Diagnostic>,
    pub monomorphizer: Monomorphizer,
}

impl Analysis {
    fn new() -> Self {
        Self {
            symbols: SymbolTable::new(),
            modules: ModuleTable::new(),
            types: TypeMap::new(),
            diagnostics: Vec::new(),
            monomorphizer: Monomorphizer::new(),
        }
    }

    /// True if any collected diagnostic is an error (warnings alone keep
    /// the unit valid)
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity() == Severity::Error)
    }

    /// Request a concrete specialization of a generic declaration;
    /// idempotent per (name, argument tuple) key
    pub fn specialize(
        &mut self,
        name: &str,
        args: &[Type],
    ) -> std::result::Result<&Decl, Diagnostic> {
        self.monomorphizer.specialize(name, args, Span::dummy())
    }
}

/// Analyze one compilation unit without loading imports
pub fn analyze(program: &Program) -> Result<Analysis> {
    run_pipeline(program, None)
}

/// Analyze one compilation unit, loading imported modules through the
/// collaborator between name resolution and type checking
pub fn analyze_with_imports(
    program: &Program,
    provider: &mut dyn ModuleProvider,
) -> Result<Analysis> {
    run_pipeline(program, Some(provider))
}

fn run_pipeline(
    program: &Program,
    mut provider: Option<&mut dyn ModuleProvider>,
) -> Result<Analysis> {
    let mut analysis = Analysis::new();

    log::debug!("pass 1: name resolution");
    NameResolution::new(
        &mut analysis.symbols,
        &mut analysis.modules,
        &mut analysis.diagnostics,
    )
    .run(program)?;

    if let Some(provider) = provider.take() {
        load_imports(&mut analysis, program, provider)?;
    }

    log::debug!("pass 2: type checking");
    TypeChecker::new(
        &mut analysis.symbols,
        &mut analysis.types,
        &mut analysis.monomorphizer,
        &mut analysis.diagnostics,
    )
    .run(program)?;

    log::debug!("pass 3: semantic validation");
    Validator::new(
        &mut analysis.symbols,
        &analysis.types,
        &mut analysis.diagnostics,
    )
    .run(program)?;

    let unused: Vec<(String, Span)> = analysis
        .symbols
        .unused_symbols()
        .iter()
        .map(|s| (s.name.clone(), s.span))
        .collect();
    for (name, span) in unused {
        analysis.diagnostics.push(Diagnostic::UnusedSymbol { name, span });
    }

    log::debug!(
        "analysis complete: {} typed nodes, {} diagnostics, {} specializations",
        analysis.types.len(),
        analysis.diagnostics.len(),
        analysis.monomorphizer.instantiation_count()
    );
    Ok(analysis)
}

/// Load each distinct import path exactly once, turning a reported cycle
/// into the fatal analysis error and not-found into an ordinary diagnostic
fn load_imports(
    analysis: &mut Analysis,
    program: &Program,
    provider: &mut dyn ModuleProvider,
) -> Result<()> {
    let paths: Vec<String> = analysis.modules.paths().to_vec();
    if paths.is_empty() {
        return Ok(());
    }
    let mut driver = ImportDriver::new(provider);
    for path in paths {
        match driver.load(&path) {
            Ok(decls) => {
                let decls = decls.to_vec();
                register_imported(analysis, &path, &decls);
            }
            Err(ImportError::Cycle(cycle)) => {
                return Err(AnalysisError::ImportCycle { path: cycle });
            }
            Err(ImportError::NotFound) => {
                let span = import_span(program, &path);
                analysis.diagnostics.push(Diagnostic::UndefinedModule {
                    path: path.clone(),
                    span,
                });
            }
        }
    }
    Ok(())
}

fn import_span(program: &Program, path: &str) -> Span {
    program
        .decls
        .iter()
        .find_map(|d| match &d.kind {
            DeclKind::Import(i) if i.path == path => Some(d.span),
            _ => None,
        })
        .unwrap_or_default()
}

/// Register the declarations a loaded module contributes: named imports
/// replace their placeholder symbols, `using` imports land every exported
/// declaration in the global scope
fn register_imported(analysis: &mut Analysis, path: &str, decls: &[Decl]) {
    for decl in decls {
        let name = match decl.name() {
            Some(n) => n.to_string(),
            None => continue,
        };
        let kind = match &decl.kind {
            DeclKind::Function(_) => SymbolKind::Function,
            DeclKind::Struct(_) => SymbolKind::Struct,
            DeclKind::Enum(_) => SymbolKind::Enum,
            DeclKind::Union(_) => SymbolKind::Union,
            DeclKind::TypeSet(_) => SymbolKind::Type,
            DeclKind::Var(v) => {
                if v.constant {
                    SymbolKind::Constant
                } else {
                    SymbolKind::Variable
                }
            }
            DeclKind::Import(_) => continue,
        };
        let named = analysis.modules.named_target(&name) == Some(path);
        let using = analysis.modules.usings().iter().any(|p| p == path);
        if named {
            if let Some(symbol) = analysis.symbols.lookup_mut(&name) {
                symbol.kind = kind;
                symbol.decl = Some(decl.id);
            }
        } else if using {
            let symbol = Symbol::new(&name, kind, decl.span).with_decl(decl.id);
            if let Err(diag) = analysis.symbols.define(symbol) {
                analysis.diagnostics.push(diag);
            }
        }
    }
}
