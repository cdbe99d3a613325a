//! Utility module

mod error;
mod span;

pub use error::{AnalysisError, Diagnostic, Result, Severity};
pub use span::Span;
