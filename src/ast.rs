//! Syntax tree definitions for Sable
//!
//! The tree is produced by the parsing collaborator and consumed read-only
//! by the analysis passes; only the monomorphization engine works on
//! (cloned) subtrees. Declarations and expressions carry a [`NodeId`]
//! assigned at parse time, which keys the node-to-type map.

use crate::types::Type;
use crate::utils::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a declaration or expression node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

/// Hands out fresh node ids; used by the parser and by tests
#[derive(Debug, Default)]
pub struct NodeIdGen {
    next: u32,
}

impl NodeIdGen {
    pub fn new() -> Self {
        Self { next: 0 }
    }

    pub fn fresh(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}

/// A complete compilation unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub decls: Vec<Decl>,
}

/// Top-level declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decl {
    pub id: NodeId,
    pub span: Span,
    pub kind: DeclKind,
}

impl Decl {
    pub fn new(id: NodeId, kind: DeclKind, span: Span) -> Self {
        Self { id, span, kind }
    }

    /// Name of the declared entity, if it has one
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            DeclKind::Function(f) => Some(&f.name),
            DeclKind::Struct(s) => Some(&s.name),
            DeclKind::Enum(e) => Some(&e.name),
            DeclKind::Union(u) => Some(&u.name),
            DeclKind::TypeSet(t) => Some(&t.name),
            DeclKind::Var(v) => Some(&v.name),
            DeclKind::Import(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DeclKind {
    Function(FunctionDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    Union(UnionDecl),
    TypeSet(TypeSetDecl),
    /// Global variable or constant
    Var(VarDecl),
    Import(ImportDecl),
}

/// Function declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub generics: Vec<GenericParamDecl>,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    /// Trailing `..` parameter; extra call arguments check against
    /// `variadic_ty` when given
    pub variadic: bool,
    pub variadic_ty: Option<TypeExpr>,
    pub body: Block,
}

/// Generic parameter (`$T` with an optional type-set constraint)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericParamDecl {
    pub name: String,
    pub constraint: Option<TypeExpr>,
    pub span: Span,
}

/// Function parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

/// Struct declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructDecl {
    pub name: String,
    pub generics: Vec<GenericParamDecl>,
    pub fields: Vec<FieldDecl>,
}

/// Struct or union field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

/// Enum declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    pub variants: Vec<VariantDecl>,
}

/// Enum variant with an optional explicit integer value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantDecl {
    pub name: String,
    pub value: Option<i64>,
    pub span: Span,
}

/// Union declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnionDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
}

/// Named type set declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSetDecl {
    pub name: String,
    pub members: Vec<TypeExpr>,
}

/// Variable or constant declaration (top level or statement)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VarDecl {
    pub name: String,
    pub ty: Option<TypeExpr>,
    pub init: Option<Expr>,
    pub constant: bool,
}

/// Import declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportDecl {
    pub path: String,
    pub kind: ImportKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ImportKind {
    /// `import io "core:io"`
    Alias(String),
    /// `using import "core:io"`
    Using,
    /// `import "core:io" { read, write }`
    Named(Vec<String>),
}

/// Code block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

/// Statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub span: Span,
    pub kind: StmtKind,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { span, kind }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    Var(VarDecl),
    Assign {
        target: Expr,
        value: Expr,
    },
    Expr(Expr),
    Block(Block),
    If {
        cond: Expr,
        then_body: Block,
        else_body: Option<Block>,
    },
    While {
        label: Option<String>,
        cond: Expr,
        body: Block,
    },
    /// C-style `for init; cond; step`
    For {
        label: Option<String>,
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Box<Stmt>>,
        body: Block,
    },
    /// `for x[, i] in xs`
    ForIn {
        label: Option<String>,
        binding: String,
        index: Option<String>,
        iterable: Expr,
        body: Block,
    },
    Match {
        scrutinee: Expr,
        cases: Vec<MatchCase>,
        else_body: Option<Block>,
    },
    Break {
        label: Option<String>,
    },
    Continue {
        label: Option<String>,
    },
    Return(Option<Expr>),
    Defer(Expr),
    Delete(Expr),
}

/// One `case` arm of a match statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCase {
    pub values: Vec<Expr>,
    pub body: Block,
    pub span: Span,
}

/// Expression
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    pub id: NodeId,
    pub span: Span,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(id: NodeId, kind: ExprKind, span: Span) -> Self {
        Self { id, span, kind }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExprKind {
    Int(i64),
    Float(f64),
    Str(String),
    Char(char),
    Bool(bool),
    Nil,
    Ident(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// Field access; also carries the builtin pseudo-fields `adr` and `val`
    Field {
        base: Box<Expr>,
        field: String,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    StructInit {
        /// Explicit struct type name; inferred from context when absent
        name: Option<String>,
        fields: Vec<FieldInit>,
    },
    ArrayInit {
        elems: Vec<Expr>,
    },
    /// `new T`, the only producer of a nilable reference
    New(TypeExpr),
}

/// Field initializer in a struct literal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldInit {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Logical
    And,
    Or,
    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinOp {
    pub fn is_arithmetic(&self) -> bool {
        matches!(self, Self::Add | Self::Sub | Self::Mul | Self::Div | Self::Mod)
    }

    pub fn is_comparison(&self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, Self::And | Self::Or)
    }

    pub fn is_bitwise(&self) -> bool {
        matches!(self, Self::BitAnd | Self::BitOr | Self::BitXor | Self::Shl | Self::Shr)
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "&&",
            Self::Or => "||",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
        };
        f.write_str(s)
    }
}

/// Unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnOp {
    /// Negation (-)
    Neg,
    /// Logical not (!)
    Not,
    /// Bitwise not (~)
    BitNot,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Neg => "-",
            Self::Not => "!",
            Self::BitNot => "~",
        };
        f.write_str(s)
    }
}

/// Type expression as written in source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeExpr {
    pub span: Span,
    pub kind: TypeExprKind,
}

impl TypeExpr {
    pub fn new(kind: TypeExprKind, span: Span) -> Self {
        Self { span, kind }
    }

    pub fn named(name: impl Into<String>, span: Span) -> Self {
        Self::new(TypeExprKind::Named(name.into()), span)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeExprKind {
    /// Primitive or declared type name
    Named(String),
    Array {
        elem: Box<TypeExpr>,
        size: u64,
    },
    Slice(Box<TypeExpr>),
    Pointer(Box<TypeExpr>),
    Reference(Box<TypeExpr>),
    Function {
        params: Vec<TypeExpr>,
        ret: Option<Box<TypeExpr>>,
    },
    /// `Name<args>` instantiation; resolved by the generics engine
    Generic {
        base: String,
        args: Vec<TypeExpr>,
    },
    /// Anonymous type set, usable as a generic constraint
    Set(Vec<TypeExpr>),
    /// Concrete type substituted in by monomorphization; never produced by
    /// the parser
    Resolved(Type),
}

#[cfg(test)]
pub(crate) mod build {
    //! Tree-construction helpers for unit tests. The parsing collaborator
    //! normally assigns node ids; tests draw them from a shared counter.

    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static NEXT_ID: AtomicU32 = AtomicU32::new(1);

    pub fn id() -> NodeId {
        NodeId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn sp() -> Span {
        Span::dummy()
    }

    pub fn expr(kind: ExprKind) -> Expr {
        Expr::new(id(), kind, sp())
    }

    pub fn int(value: i64) -> Expr {
        expr(ExprKind::Int(value))
    }

    pub fn string(value: &str) -> Expr {
        expr(ExprKind::Str(value.to_string()))
    }

    pub fn boolean(value: bool) -> Expr {
        expr(ExprKind::Bool(value))
    }

    pub fn nil() -> Expr {
        expr(ExprKind::Nil)
    }

    pub fn ident(name: &str) -> Expr {
        expr(ExprKind::Ident(name.to_string()))
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        expr(ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
        expr(ExprKind::Call {
            callee: Box::new(callee),
            args,
        })
    }

    pub fn field(base: Expr, name: &str) -> Expr {
        expr(ExprKind::Field {
            base: Box::new(base),
            field: name.to_string(),
        })
    }

    pub fn stmt(kind: StmtKind) -> Stmt {
        Stmt::new(kind, sp())
    }

    pub fn block(stmts: Vec<Stmt>) -> Block {
        Block {
            stmts,
            span: sp(),
        }
    }

    pub fn ty(name: &str) -> TypeExpr {
        TypeExpr::named(name, sp())
    }

    pub fn var_stmt(name: &str, ty_: Option<TypeExpr>, init: Option<Expr>) -> Stmt {
        stmt(StmtKind::Var(VarDecl {
            name: name.to_string(),
            ty: ty_,
            init,
            constant: false,
        }))
    }

    pub fn ret_stmt(value: Option<Expr>) -> Stmt {
        stmt(StmtKind::Return(value))
    }

    pub fn decl(kind: DeclKind) -> Decl {
        Decl::new(id(), kind, sp())
    }

    pub fn param(name: &str, ty_: TypeExpr) -> Param {
        Param {
            name: name.to_string(),
            ty: ty_,
            span: sp(),
        }
    }

    pub fn generic_param(name: &str, constraint: Option<TypeExpr>) -> GenericParamDecl {
        GenericParamDecl {
            name: name.to_string(),
            constraint,
            span: sp(),
        }
    }

    pub fn fn_decl(
        name: &str,
        generics: Vec<GenericParamDecl>,
        params: Vec<Param>,
        ret: Option<TypeExpr>,
        body: Block,
    ) -> Decl {
        decl(DeclKind::Function(FunctionDecl {
            name: name.to_string(),
            generics,
            params,
            ret,
            variadic: false,
            variadic_ty: None,
            body,
        }))
    }

    pub fn struct_decl(name: &str, fields: Vec<(&str, TypeExpr)>) -> Decl {
        decl(DeclKind::Struct(StructDecl {
            name: name.to_string(),
            generics: vec![],
            fields: fields
                .into_iter()
                .map(|(n, t)| FieldDecl {
                    name: n.to_string(),
                    ty: t,
                    span: sp(),
                })
                .collect(),
        }))
    }

    pub fn program(decls: Vec<Decl>) -> Program {
        Program { decls }
    }
}
