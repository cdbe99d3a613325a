//! Type representation and compatibility rules

mod type_system;

pub use type_system::{Primitive, Type};
