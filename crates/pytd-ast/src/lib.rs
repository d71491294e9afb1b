//! Declaration tree for parsed pytd stub modules.
//!
//! [`module::Module`] is the final, fully resolved representation produced
//! by the parser, and [`print::print_module`] renders it back to canonical
//! stub source.

pub mod module;
pub mod print;
pub mod ty;

pub use module::{
    Alias, AliasTarget, Class, Constant, Function, MethodKind, Module, Mutator, Parameter,
    ParameterKind, Signature, TypeVariable,
};
pub use print::print_module;
pub use ty::{capitalized_builtin, pep484_translation, Type};
