//! Transient analysis state for Sable
//!
//! Tracks the enclosing function, the loop nesting stack and pending
//! deferred actions while a pass walks one function body. All of it is
//! created on function entry and discarded on exit.

use crate::ast::NodeId;
use crate::types::Type;
use crate::utils::{Diagnostic, Span};
use std::collections::HashMap;

/// State of the function currently being analyzed
#[derive(Debug, Clone)]
pub struct FunctionContext {
    pub name: String,
    /// None for void functions
    pub return_type: Option<Type>,
    pub has_returned: bool,
    /// Generic parameter name to its placeholder type
    pub generic_params: HashMap<String, Type>,
    pub defer_count: usize,
}

/// One entry of the loop nesting stack
#[derive(Debug, Clone)]
pub struct LoopContext {
    /// Nesting depth, innermost highest
    pub depth: usize,
    pub label: Option<String>,
    pub has_break: bool,
    pub has_continue: bool,
}

/// A deferred expression and the scope depth it was registered at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferContext {
    pub expr: NodeId,
    pub depth: usize,
}

/// Bookkeeping shared by the analysis passes while inside a function body
#[derive(Debug, Default)]
pub struct SemanticContext {
    function: Option<FunctionContext>,
    loops: Vec<LoopContext>,
    defers: Vec<DeferContext>,
}

impl SemanticContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_function(
        &mut self,
        name: impl Into<String>,
        return_type: Option<Type>,
        generic_params: HashMap<String, Type>,
    ) {
        self.function = Some(FunctionContext {
            name: name.into(),
            return_type,
            has_returned: false,
            generic_params,
            defer_count: 0,
        });
        self.loops.clear();
        self.defers.clear();
    }

    pub fn exit_function(&mut self) -> Option<FunctionContext> {
        self.loops.clear();
        self.defers.clear();
        self.function.take()
    }

    pub fn function(&self) -> Option<&FunctionContext> {
        self.function.as_ref()
    }

    pub fn in_function(&self) -> bool {
        self.function.is_some()
    }

    pub fn enter_loop(&mut self, label: Option<String>) {
        let depth = self.loops.len();
        self.loops.push(LoopContext {
            depth,
            label,
            has_break: false,
            has_continue: false,
        });
    }

    pub fn exit_loop(&mut self) -> Option<LoopContext> {
        self.loops.pop()
    }

    /// Validate a break statement and flag the targeted loop. A labeled
    /// break searches the stack innermost-first.
    pub fn validate_break(&mut self, label: Option<&str>, span: Span) -> Result<(), Diagnostic> {
        if self.loops.is_empty() {
            return Err(Diagnostic::BreakOutsideLoop { span });
        }
        let target = self.find_loop(label, span)?;
        target.has_break = true;
        Ok(())
    }

    /// Validate a continue statement and flag the targeted loop
    pub fn validate_continue(&mut self, label: Option<&str>, span: Span) -> Result<(), Diagnostic> {
        if self.loops.is_empty() {
            return Err(Diagnostic::ContinueOutsideLoop { span });
        }
        let target = self.find_loop(label, span)?;
        target.has_continue = true;
        Ok(())
    }

    fn find_loop(
        &mut self,
        label: Option<&str>,
        span: Span,
    ) -> Result<&mut LoopContext, Diagnostic> {
        match label {
            None => Ok(self.loops.last_mut().expect("loop stack checked non-empty")),
            Some(wanted) => self
                .loops
                .iter_mut()
                .rev()
                .find(|l| l.label.as_deref() == Some(wanted))
                .ok_or_else(|| Diagnostic::UndefinedLabel {
                    label: wanted.to_string(),
                    span,
                }),
        }
    }

    /// Validate a return statement against the enclosing function's
    /// signature via assignability
    pub fn validate_return(
        &mut self,
        value: Option<&Type>,
        span: Span,
    ) -> Result<(), Diagnostic> {
        let function = match self.function.as_mut() {
            Some(f) => f,
            None => return Err(Diagnostic::ReturnOutsideFunction { span }),
        };
        function.has_returned = true;
        match (&function.return_type, value) {
            (None, None) => Ok(()),
            (None, Some(got)) => Err(Diagnostic::TypeMismatch {
                expected: "void".to_string(),
                got: got.to_string(),
                span,
            }),
            (Some(expected), None) => Err(Diagnostic::TypeMismatch {
                expected: expected.to_string(),
                got: "void".to_string(),
                span,
            }),
            (Some(expected), Some(got)) => {
                if got.is_assignable_to(expected) {
                    Ok(())
                } else {
                    Err(Diagnostic::TypeMismatch {
                        expected: expected.to_string(),
                        got: got.to_string(),
                        span,
                    })
                }
            }
        }
    }

    /// Record a deferred expression at the given scope depth
    pub fn add_defer(&mut self, expr: NodeId, depth: usize) {
        self.defers.push(DeferContext { expr, depth });
        if let Some(f) = self.function.as_mut() {
            f.defer_count += 1;
        }
    }

    /// Remove and return the defers registered at `depth`, in registration
    /// order. Consumers run them in reverse of that order at scope exit.
    pub fn pop_defers_at_depth(&mut self, depth: usize) -> Vec<DeferContext> {
        let mut popped = Vec::new();
        let mut kept = Vec::with_capacity(self.defers.len());
        for defer in self.defers.drain(..) {
            if defer.depth == depth {
                popped.push(defer);
            } else {
                kept.push(defer);
            }
        }
        self.defers = kept;
        popped
    }

    pub fn pending_defers(&self) -> usize {
        self.defers.len()
    }
}
