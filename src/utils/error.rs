//! Diagnostics for the Sable semantic core
//!
//! Every diagnostic carries a machine-readable code, a source span and
//! structured context fields so CLI and IDE consumers can render them
//! independently of the `Display` text.

use crate::utils::Span;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for fatal analysis failures
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error,
    Warning,
}

/// A semantic diagnostic
///
/// Passes collect these and keep going; nothing here aborts analysis.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum Diagnostic {
    // ==================== Name Errors ====================
    #[error("undefined identifier: {name}")]
    UndefinedIdentifier { name: String, span: Span },

    #[error("undefined type: {name}")]
    UndefinedType { name: String, span: Span },

    #[error("already defined: {name}")]
    AlreadyDefined { name: String, span: Span },

    #[error("duplicate generic parameter: ${name}")]
    DuplicateGenericParam { name: String, span: Span },

    #[error("duplicate field {field} in {owner}")]
    DuplicateField {
        owner: String,
        field: String,
        span: Span,
    },

    #[error("module not found: {path}")]
    UndefinedModule { path: String, span: Span },

    // ==================== Type Errors ====================
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: String,
        got: String,
        span: Span,
    },

    #[error("condition must be bool, got {got}")]
    ConditionNotBool { got: String, span: Span },

    #[error("operator {op} requires numeric operands, got {got}")]
    RequiresNumeric {
        op: String,
        got: String,
        span: Span,
    },

    #[error("operator {op} requires integral operands, got {got}")]
    RequiresIntegral {
        op: String,
        got: String,
        span: Span,
    },

    #[error("operator {op} requires bool operands, got {got}")]
    RequiresBool {
        op: String,
        got: String,
        span: Span,
    },

    #[error("expression of type {got} is not callable")]
    NotCallable { got: String, span: Span },

    #[error("expression of type {got} cannot be indexed")]
    CannotIndex { got: String, span: Span },

    #[error("{owner} has no field {field}")]
    NoSuchField {
        owner: String,
        field: String,
        span: Span,
    },

    #[error("cannot access field {field} on non-struct type {got}")]
    FieldAccessOnNonStruct {
        got: String,
        field: String,
        span: Span,
    },

    #[error("nil is only valid for reference types, expected {expected}")]
    NilForNonReference { expected: String, span: Span },

    #[error("wrong argument count: expected {expected}, got {got}")]
    ArgCountMismatch {
        expected: usize,
        got: usize,
        span: Span,
    },

    #[error("type {got} does not satisfy constraint {constraint} for ${param}")]
    ConstraintViolation {
        param: String,
        got: String,
        constraint: String,
        span: Span,
    },

    #[error("cannot infer type for generic parameter ${param} of {name}")]
    UnboundGenericParam {
        name: String,
        param: String,
        span: Span,
    },

    #[error("{name} is not a generic declaration")]
    NotGeneric { name: String, span: Span },

    #[error("cannot assign to immutable {name}")]
    AssignToImmutable { name: String, span: Span },

    // ==================== Control-Flow Errors ====================
    #[error("break outside of a loop")]
    BreakOutsideLoop { span: Span },

    #[error("continue outside of a loop")]
    ContinueOutsideLoop { span: Span },

    #[error("undefined loop label: {label}")]
    UndefinedLabel { label: String, span: Span },

    #[error("return outside of a function")]
    ReturnOutsideFunction { span: Span },

    #[error("defer outside of a function")]
    DeferOutsideFunction { span: Span },

    #[error("del outside of a function")]
    DeleteOutsideFunction { span: Span },

    #[error("del target must be a reference, got {got}")]
    DeleteNonReference { got: String, span: Span },

    #[error("function {function} does not return on all paths")]
    MissingReturn { function: String, span: Span },

    // ==================== Advisory ====================
    #[error("{name} is never used")]
    UnusedSymbol { name: String, span: Span },
}

impl Diagnostic {
    /// Get the span associated with this diagnostic
    pub fn span(&self) -> Span {
        match self {
            Self::UndefinedIdentifier { span, .. }
            | Self::UndefinedType { span, .. }
            | Self::AlreadyDefined { span, .. }
            | Self::DuplicateGenericParam { span, .. }
            | Self::DuplicateField { span, .. }
            | Self::UndefinedModule { span, .. }
            | Self::TypeMismatch { span, .. }
            | Self::ConditionNotBool { span, .. }
            | Self::RequiresNumeric { span, .. }
            | Self::RequiresIntegral { span, .. }
            | Self::RequiresBool { span, .. }
            | Self::NotCallable { span, .. }
            | Self::CannotIndex { span, .. }
            | Self::NoSuchField { span, .. }
            | Self::FieldAccessOnNonStruct { span, .. }
            | Self::NilForNonReference { span, .. }
            | Self::ArgCountMismatch { span, .. }
            | Self::ConstraintViolation { span, .. }
            | Self::UnboundGenericParam { span, .. }
            | Self::NotGeneric { span, .. }
            | Self::AssignToImmutable { span, .. }
            | Self::BreakOutsideLoop { span }
            | Self::ContinueOutsideLoop { span }
            | Self::UndefinedLabel { span, .. }
            | Self::ReturnOutsideFunction { span }
            | Self::DeferOutsideFunction { span }
            | Self::DeleteOutsideFunction { span }
            | Self::DeleteNonReference { span, .. }
            | Self::MissingReturn { span, .. }
            | Self::UnusedSymbol { span, .. } => *span,
        }
    }

    /// Stable machine-readable code for this diagnostic kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::UndefinedIdentifier { .. } => "undefined-identifier",
            Self::UndefinedType { .. } => "undefined-type",
            Self::AlreadyDefined { .. } => "already-defined",
            Self::DuplicateGenericParam { .. } => "duplicate-generic-param",
            Self::DuplicateField { .. } => "duplicate-field",
            Self::UndefinedModule { .. } => "undefined-module",
            Self::TypeMismatch { .. } => "type-mismatch",
            Self::ConditionNotBool { .. } => "condition-not-bool",
            Self::RequiresNumeric { .. } => "requires-numeric",
            Self::RequiresIntegral { .. } => "requires-integral",
            Self::RequiresBool { .. } => "requires-bool",
            Self::NotCallable { .. } => "not-callable",
            Self::CannotIndex { .. } => "cannot-index",
            Self::NoSuchField { .. } => "no-such-field",
            Self::FieldAccessOnNonStruct { .. } => "field-access-on-non-struct",
            Self::NilForNonReference { .. } => "nil-for-non-reference",
            Self::ArgCountMismatch { .. } => "wrong-argument-count",
            Self::ConstraintViolation { .. } => "constraint-violation",
            Self::UnboundGenericParam { .. } => "unbound-generic-param",
            Self::NotGeneric { .. } => "not-generic",
            Self::AssignToImmutable { .. } => "assign-to-immutable",
            Self::BreakOutsideLoop { .. } => "break-outside-loop",
            Self::ContinueOutsideLoop { .. } => "continue-outside-loop",
            Self::UndefinedLabel { .. } => "undefined-label",
            Self::ReturnOutsideFunction { .. } => "return-outside-function",
            Self::DeferOutsideFunction { .. } => "defer-outside-function",
            Self::DeleteOutsideFunction { .. } => "del-outside-function",
            Self::DeleteNonReference { .. } => "del-non-reference",
            Self::MissingReturn { .. } => "missing-return",
            Self::UnusedSymbol { .. } => "unused-symbol",
        }
    }

    /// Severity of this diagnostic
    pub fn severity(&self) -> Severity {
        match self {
            Self::UnusedSymbol { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

/// Fatal analysis failure
///
/// These abort the pipeline: the tree is malformed in a way the passes do
/// not recognize, or module loading reported a dependency cycle. Everything
/// else is a collected [`Diagnostic`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("circular module dependency: {}", path.join(" -> "))]
    ImportCycle { path: Vec<String> },

    #[error("malformed syntax tree: {detail}")]
    MalformedTree { detail: String, span: Span },
}
