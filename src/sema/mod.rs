//! Semantic analysis: symbol table, analysis context, the three passes
//! and the generics engine

pub mod context;
pub mod generics;
pub mod modules;
pub mod resolve;
pub mod symbols;
pub mod typecheck;
pub mod validate;

use crate::ast::{Decl, DeclKind};
use crate::utils::Result;
use symbols::{ScopeWalker, SymbolTable};

/// Enter and immediately leave the scope a declaration opened during name
/// resolution, keeping a re-descending pass aligned with the scope tree.
/// Declarations that open no scope are a no-op.
pub(crate) fn skip_decl_scopes(
    decl: &Decl,
    walker: &mut ScopeWalker,
    symbols: &mut SymbolTable,
) -> Result<()> {
    match &decl.kind {
        DeclKind::Function(_)
        | DeclKind::Struct(_)
        | DeclKind::Enum(_)
        | DeclKind::Union(_) => {
            walker.enter(symbols)?;
            walker.exit(symbols);
            Ok(())
        }
        DeclKind::TypeSet(_) | DeclKind::Var(_) | DeclKind::Import(_) => Ok(()),
    }
}
