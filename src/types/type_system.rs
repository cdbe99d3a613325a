//! Type system for Sable
//!
//! Types are immutable once built and compared structurally, except named
//! Struct/Enum/Union/TypeSet values which compare nominally. Assignability
//! defaults to equality; primitives additionally widen along their numeric
//! family (signed, unsigned, float), never across families.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Primitive types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Bool,
    Char,
    Str,
}

/// Numeric promotion family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumericFamily {
    Signed,
    Unsigned,
    Float,
}

impl Primitive {
    /// Canonical source-level name
    pub fn name(&self) -> &'static str {
        match self {
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Bool => "bool",
            Self::Char => "char",
            Self::Str => "string",
        }
    }

    /// Map a source-level name to a primitive
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "i8" => Some(Self::I8),
            "i16" => Some(Self::I16),
            "i32" => Some(Self::I32),
            "i64" => Some(Self::I64),
            "u8" => Some(Self::U8),
            "u16" => Some(Self::U16),
            "u32" => Some(Self::U32),
            "u64" => Some(Self::U64),
            "f32" => Some(Self::F32),
            "f64" => Some(Self::F64),
            "bool" => Some(Self::Bool),
            "char" => Some(Self::Char),
            "string" => Some(Self::Str),
            _ => None,
        }
    }

    /// Position in the promotion order of this primitive's numeric family.
    /// bool/char/string are not in any family and admit no promotion.
    fn promotion_rank(&self) -> Option<(NumericFamily, usize)> {
        use NumericFamily::*;
        match self {
            Self::I8 => Some((Signed, 0)),
            Self::I16 => Some((Signed, 1)),
            Self::I32 => Some((Signed, 2)),
            Self::I64 => Some((Signed, 3)),
            Self::U8 => Some((Unsigned, 0)),
            Self::U16 => Some((Unsigned, 1)),
            Self::U32 => Some((Unsigned, 2)),
            Self::U64 => Some((Unsigned, 3)),
            Self::F32 => Some((Float, 0)),
            Self::F64 => Some((Float, 1)),
            Self::Bool | Self::Char | Self::Str => None,
        }
    }

    /// Check if this is a signed integer type
    pub fn is_signed(&self) -> bool {
        matches!(self, Self::I8 | Self::I16 | Self::I32 | Self::I64)
    }

    /// Check if this is an unsigned integer type
    pub fn is_unsigned(&self) -> bool {
        matches!(self, Self::U8 | Self::U16 | Self::U32 | Self::U64)
    }

    /// Check if this is an integer type
    pub fn is_integral(&self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    /// Check if this is a floating-point type
    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Check if this is a numeric type
    pub fn is_numeric(&self) -> bool {
        self.is_integral() || self.is_float()
    }

    /// Exact-name match, or widening within one numeric family
    pub fn is_assignable_to(&self, target: &Self) -> bool {
        if self == target {
            return true;
        }
        match (self.promotion_rank(), target.promotion_rank()) {
            (Some((fa, ra)), Some((fb, rb))) => fa == fb && ra <= rb,
            _ => false,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolved type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Type {
    Primitive(Primitive),
    Array {
        elem: Box<Type>,
        size: u64,
    },
    Slice(Box<Type>),
    /// Non-nilable address value, produced by `.adr`
    Pointer(Box<Type>),
    /// Nilable reference, produced by `new`
    Reference(Box<Type>),
    Function {
        params: Vec<Type>,
        ret: Option<Box<Type>>,
        variadic: bool,
        variadic_elem: Option<Box<Type>>,
    },
    Struct {
        /// Anonymous struct types compare structurally
        name: Option<String>,
        fields: Vec<(String, Type)>,
        generic_params: Vec<String>,
    },
    Enum {
        name: String,
        variants: Vec<(String, Option<i64>)>,
    },
    Union {
        name: String,
        fields: Vec<(String, Type)>,
    },
    GenericParam {
        name: String,
        /// Always a TypeSet when present
        constraint: Option<Box<Type>>,
    },
    GenericInstance {
        base: String,
        args: Vec<Type>,
    },
    TypeSet {
        name: Option<String>,
        members: Vec<Type>,
    },
    /// Placeholder after a failed check; assignable to everything
    Unknown,
    Void,
}

impl Type {
    pub const BOOL: Self = Self::Primitive(Primitive::Bool);
    pub const CHAR: Self = Self::Primitive(Primitive::Char);
    pub const STR: Self = Self::Primitive(Primitive::Str);
    pub const I32: Self = Self::Primitive(Primitive::I32);
    pub const I64: Self = Self::Primitive(Primitive::I64);
    pub const F64: Self = Self::Primitive(Primitive::F64);

    /// Create a pointer type
    pub fn pointer(pointee: Type) -> Self {
        Self::Pointer(Box::new(pointee))
    }

    /// Create a reference type
    pub fn reference(referent: Type) -> Self {
        Self::Reference(Box::new(referent))
    }

    /// Create a slice type
    pub fn slice(elem: Type) -> Self {
        Self::Slice(Box::new(elem))
    }

    /// Create an array type
    pub fn array(elem: Type, size: u64) -> Self {
        Self::Array {
            elem: Box::new(elem),
            size,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Primitive(p) if p.is_numeric())
    }

    pub fn is_integral(&self) -> bool {
        matches!(self, Self::Primitive(p) if p.is_integral())
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::Primitive(p) if p.is_float())
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Self::Primitive(Primitive::Bool))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// Check whether a value of this type can be assigned where `target`
    /// is expected.
    ///
    /// Unknown is assignable to everything so one failure does not cascade;
    /// nothing is assignable *to* Unknown except Unknown itself. Primitives
    /// widen within one numeric family; every other kind requires equality
    /// (nominal for named Struct/Enum/Union/TypeSet, structural otherwise).
    pub fn is_assignable_to(&self, target: &Type) -> bool {
        if self.is_unknown() {
            return true;
        }
        if target.is_unknown() {
            return false;
        }
        match (self, target) {
            (Type::Primitive(a), Type::Primitive(b)) => a.is_assignable_to(b),
            _ => self == target,
        }
    }

    /// Does this type mention a generic parameter anywhere?
    pub fn contains_generic_param(&self) -> bool {
        let mut work: Vec<&Type> = vec![self];
        while let Some(ty) = work.pop() {
            match ty {
                Type::GenericParam { .. } => return true,
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
                    work.extend(params.iter());
                    if let Some(r) = ret {
                        work.push(r);
                    }
                    if let Some(v) = variadic_elem {
                        work.push(v);
                    }
                }
                Type::Struct { fields, .. } | Type::Union { fields, .. } => {
                    work.extend(fields.iter().map(|(_, t)| t));
                }
                Type::GenericInstance { args, .. } => work.extend(args.iter()),
                Type::TypeSet { members, .. } => work.extend(members.iter()),
                Type::Primitive(_) | Type::Enum { .. } | Type::Unknown | Type::Void => {}
            }
        }
        false
    }

    /// Identifier-safe canonical form, used to name specializations
    pub fn canonical(&self) -> String {
        match self {
            Type::Primitive(p) => p.name().to_string(),
            Type::Array { elem, size } => format!("arr{}_{}", size, elem.canonical()),
            Type::Slice(elem) => format!("slice_{}", elem.canonical()),
            Type::Pointer(pointee) => format!("ptr_{}", pointee.canonical()),
            Type::Reference(referent) => format!("ref_{}", referent.canonical()),
            Type::Function { params, ret, .. } => {
                let mut parts: Vec<String> = params.iter().map(|p| p.canonical()).collect();
                parts.push(match ret {
                    Some(r) => r.canonical(),
                    None => "void".to_string(),
                });
                format!("fn_{}", parts.join("_"))
            }
            Type::Struct { name, .. } => name.clone().unwrap_or_else(|| "struct".to_string()),
            Type::Enum { name, .. } => name.clone(),
            Type::Union { name, .. } => name.clone(),
            Type::GenericParam { name, .. } => name.clone(),
            Type::GenericInstance { base, args } => {
                let parts: Vec<String> = args.iter().map(|a| a.canonical()).collect();
                format!("{}__{}", base, parts.join("__"))
            }
            Type::TypeSet { name, .. } => name.clone().unwrap_or_else(|| "set".to_string()),
            Type::Unknown => "unknown".to_string(),
            Type::Void => "void".to_string(),
        }
    }
}

// Named Struct/Enum/Union/TypeSet values compare nominally; everything else
// is structural. Hash mirrors this so cache keys stay consistent.
impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Primitive(a), Type::Primitive(b)) => a == b,
            (
                Type::Array { elem: ea, size: sa },
                Type::Array { elem: eb, size: sb },
            ) => sa == sb && ea == eb,
            (Type::Slice(a), Type::Slice(b)) => a == b,
            (Type::Pointer(a), Type::Pointer(b)) => a == b,
            (Type::Reference(a), Type::Reference(b)) => a == b,
            (
                Type::Function {
                    params: pa,
                    ret: ra,
                    variadic: va,
                    variadic_elem: ea,
                },
                Type::Function {
                    params: pb,
                    ret: rb,
                    variadic: vb,
                    variadic_elem: eb,
                },
            ) => pa == pb && ra == rb && va == vb && ea == eb,
            (Type::Struct { name: Some(a), .. }, Type::Struct { name: Some(b), .. }) => a == b,
            (
                Type::Struct {
                    name: None,
                    fields: fa,
                    ..
                },
                Type::Struct {
                    name: None,
                    fields: fb,
                    ..
                },
            ) => fa == fb,
            (Type::Enum { name: a, .. }, Type::Enum { name: b, .. }) => a == b,
            (Type::Union { name: a, .. }, Type::Union { name: b, .. }) => a == b,
            (Type::GenericParam { name: a, .. }, Type::GenericParam { name: b, .. }) => a == b,
            (
                Type::GenericInstance { base: ba, args: aa },
                Type::GenericInstance { base: bb, args: ab },
            ) => ba == bb && aa == ab,
            (Type::TypeSet { name: Some(a), .. }, Type::TypeSet { name: Some(b), .. }) => a == b,
            (
                Type::TypeSet {
                    name: None,
                    members: ma,
                },
                Type::TypeSet {
                    name: None,
                    members: mb,
                },
            ) => ma == mb,
            (Type::Unknown, Type::Unknown) => true,
            (Type::Void, Type::Void) => true,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Type::Primitive(p) => p.hash(state),
            Type::Array { elem, size } => {
                size.hash(state);
                elem.hash(state);
            }
            Type::Slice(elem) => elem.hash(state),
            Type::Pointer(pointee) => pointee.hash(state),
            Type::Reference(referent) => referent.hash(state),
            Type::Function {
                params,
                ret,
                variadic,
                variadic_elem,
            } => {
                params.hash(state);
                ret.hash(state);
                variadic.hash(state);
                variadic_elem.hash(state);
            }
            // Nominal kinds hash their name only, matching equality
            Type::Struct { name, fields, .. } => match name {
                Some(n) => n.hash(state),
                None => fields.hash(state),
            },
            Type::Enum { name, .. } => name.hash(state),
            Type::Union { name, .. } => name.hash(state),
            Type::GenericParam { name, .. } => name.hash(state),
            Type::GenericInstance { base, args } => {
                base.hash(state);
                args.hash(state);
            }
            Type::TypeSet { name, members } => match name {
                Some(n) => n.hash(state),
                None => members.hash(state),
            },
            Type::Unknown | Type::Void => {}
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{}", p),
            Type::Array { elem, size } => write!(f, "[{}]{}", size, elem),
            Type::Slice(elem) => write!(f, "[]{}", elem),
            Type::Pointer(pointee) => write!(f, "*{}", pointee),
            Type::Reference(referent) => write!(f, "ref {}", referent),
            Type::Function {
                params,
                ret,
                variadic,
                ..
            } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                if *variadic {
                    if !params.is_empty() {
                        write!(f, ", ")?;
                    }
                    write!(f, "..")?;
                }
                write!(f, ")")?;
                if let Some(r) = ret {
                    write!(f, " {}", r)?;
                }
                Ok(())
            }
            Type::Struct { name, fields, .. } => match name {
                Some(n) => write!(f, "{}", n),
                None => {
                    write!(f, "struct{{")?;
                    for (i, (fname, fty)) in fields.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}: {}", fname, fty)?;
                    }
                    write!(f, "}}")
                }
            },
            Type::Enum { name, .. } => write!(f, "{}", name),
            Type::Union { name, .. } => write!(f, "{}", name),
            Type::GenericParam { name, .. } => write!(f, "${}", name),
            Type::GenericInstance { base, args } => {
                write!(f, "{}<", base)?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", a)?;
                }
                write!(f, ">")
            }
            Type::TypeSet { name, members } => match name {
                Some(n) => write!(f, "{}", n),
                None => {
                    write!(f, "set{{")?;
                    for (i, m) in members.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", m)?;
                    }
                    write!(f, "}}")
                }
            },
            Type::Unknown => write!(f, "<unknown>"),
            Type::Void => write!(f, "void"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn assignability_is_reflexive() {
        let types = [
            Type::I32,
            Type::BOOL,
            Type::STR,
            Type::pointer(Type::I32),
            Type::reference(Type::STR),
            Type::array(Type::I64, 4),
            Type::slice(Type::F64),
            Type::Void,
            Type::Unknown,
        ];
        for ty in &types {
            assert!(ty.is_assignable_to(ty), "{} not reflexive", ty);
        }
    }

    #[test]
    fn signed_widening_is_monotonic() {
        let signed = [Primitive::I8, Primitive::I16, Primitive::I32, Primitive::I64];
        for (i, a) in signed.iter().enumerate() {
            for (j, b) in signed.iter().enumerate() {
                assert_eq!(a.is_assignable_to(b), i <= j, "{} -> {}", a, b);
            }
        }
    }

    #[test]
    fn no_promotion_across_families() {
        assert!(!Primitive::I32.is_assignable_to(&Primitive::U32));
        assert!(!Primitive::U32.is_assignable_to(&Primitive::I32));
        assert!(!Primitive::I64.is_assignable_to(&Primitive::F64));
        assert!(!Primitive::U8.is_assignable_to(&Primitive::I16));
        assert!(!Primitive::F32.is_assignable_to(&Primitive::I64));
    }

    #[test]
    fn bool_char_string_admit_no_promotion() {
        for p in [Primitive::Bool, Primitive::Char, Primitive::Str] {
            for q in [Primitive::I64, Primitive::U64, Primitive::F64, Primitive::Bool] {
                assert_eq!(p.is_assignable_to(&q), p == q);
            }
        }
    }

    #[test]
    fn unknown_is_one_directional() {
        assert!(Type::Unknown.is_assignable_to(&Type::I32));
        assert!(Type::Unknown.is_assignable_to(&Type::Unknown));
        assert!(!Type::I32.is_assignable_to(&Type::Unknown));
    }

    #[test]
    fn named_structs_compare_nominally() {
        let a = Type::Struct {
            name: Some("Point".to_string()),
            fields: vec![("x".to_string(), Type::I32)],
            generic_params: vec![],
        };
        let b = Type::Struct {
            name: Some("Point".to_string()),
            fields: vec![],
            generic_params: vec![],
        };
        let c = Type::Struct {
            name: Some("Vec2".to_string()),
            fields: vec![("x".to_string(), Type::I32)],
            generic_params: vec![],
        };
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn function_types_compare_structurally() {
        let f = Type::Function {
            params: vec![Type::I32],
            ret: Some(Box::new(Type::BOOL)),
            variadic: false,
            variadic_elem: None,
        };
        let g = Type::Function {
            params: vec![Type::I32],
            ret: Some(Box::new(Type::BOOL)),
            variadic: false,
            variadic_elem: None,
        };
        assert_eq!(f, g);
        assert!(f.is_assignable_to(&g));
    }

    #[test]
    fn composite_assignability_requires_equality() {
        // No widening inside composites
        assert!(!Type::pointer(Type::I32).is_assignable_to(&Type::pointer(Type::I64)));
        assert!(!Type::array(Type::I32, 3).is_assignable_to(&Type::array(Type::I32, 4)));
        assert!(Type::slice(Type::I32).is_assignable_to(&Type::slice(Type::I32)));
    }

    #[test]
    fn display_forms() {
        assert_eq!(Type::array(Type::I32, 4).to_string(), "[4]i32");
        assert_eq!(Type::slice(Type::STR).to_string(), "[]string");
        assert_eq!(Type::pointer(Type::I32).to_string(), "*i32");
        assert_eq!(Type::reference(Type::I32).to_string(), "ref i32");
        let f = Type::Function {
            params: vec![Type::I32, Type::STR],
            ret: Some(Box::new(Type::BOOL)),
            variadic: false,
            variadic_elem: None,
        };
        assert_eq!(f.to_string(), "fn(i32, string) bool");
    }

    #[test]
    fn canonical_forms_are_identifier_safe() {
        assert_eq!(Type::I32.canonical(), "i32");
        assert_eq!(Type::reference(Type::I32).canonical(), "ref_i32");
        assert_eq!(Type::array(Type::I32, 8).canonical(), "arr8_i32");
        let inst = Type::GenericInstance {
            base: "Vec".to_string(),
            args: vec![Type::I32],
        };
        assert_eq!(inst.canonical(), "Vec__i32");
    }

    #[test]
    fn contains_generic_param_looks_deep() {
        let t = Type::array(
            Type::pointer(Type::GenericParam {
                name: "T".to_string(),
                constraint: None,
            }),
            3,
        );
        assert!(t.contains_generic_param());
        assert!(!Type::array(Type::I32, 3).contains_generic_param());
    }
}
