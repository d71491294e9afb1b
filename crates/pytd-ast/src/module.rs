use serde::Serialize;

use crate::ty::Type;

/// A fully parsed stub module. This is the output of the parsing pipeline:
/// conditionals have been evaluated, names resolved, signatures merged, and
/// duplicates rejected, so consumers never see partial state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Module {
    /// Module name; either supplied by the caller or generated from a
    /// digest of the source when no name was given.
    pub name: String,
    /// True when `name` was generated rather than supplied. Generated names
    /// never prefix top-level declarations in printed output.
    pub generated_name: bool,
    /// Names imported from `typing` in live code. Used by the printer to
    /// decide which typing names may appear in the synthesized import line.
    pub typing_names: Vec<String>,
    pub aliases: Vec<Alias>,
    pub type_params: Vec<TypeVariable>,
    pub constants: Vec<Constant>,
    pub functions: Vec<Function>,
    pub classes: Vec<Class>,
}

/// A typed module- or class-level constant, e.g. `x = ...  # type: int`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constant {
    pub name: String,
    pub ty: Type,
}

/// A name alias, either re-exported from another module or bound locally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alias {
    pub name: String,
    pub target: AliasTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AliasTarget {
    /// `from module import member` (possibly renamed via `as`).
    Import { module: String, member: String },
    /// `name = SomeType` at module level.
    Type(Type),
}

/// A declared type variable, e.g. `T = TypeVar('T', int, str)`.
///
/// Keyword arguments (`bound=`, `covariant=`, ...) are accepted by the
/// grammar but not retained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeVariable {
    pub name: String,
    pub constraints: Vec<Type>,
}

/// A function or method with all of its overloaded signatures merged
/// under one name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Function {
    pub name: String,
    pub kind: MethodKind,
    /// Empty exactly when the function is external (`def foo PYTHONCODE`).
    pub signatures: Vec<Signature>,
    pub is_external: bool,
}

/// How a method is bound. Every signature of a merged function must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MethodKind {
    Method,
    StaticMethod,
    ClassMethod,
}

impl MethodKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MethodKind::Method => "method",
            MethodKind::StaticMethod => "staticmethod",
            MethodKind::ClassMethod => "classmethod",
        }
    }
}

/// One signature of a function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signature {
    pub params: Vec<Parameter>,
    pub return_type: Type,
    /// Parameter mutations from the body, e.g. `x := List[int]`.
    pub mutators: Vec<Mutator>,
    /// Exception types from `raise` statements in the body.
    pub exceptions: Vec<Type>,
}

impl Signature {
    /// True when the signature prints on one line (`: ...` body).
    pub fn has_empty_body(&self) -> bool {
        self.mutators.is_empty() && self.exceptions.is_empty()
    }
}

/// A single formal parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    /// Declared or inferred type. `*args: T` is stored as the accumulated
    /// `Tuple[T, ...]` and `**kwargs: T` as `Dict[str, T]`; an untyped
    /// parameter has no type at all.
    pub ty: Option<Type>,
    /// Whether the parameter carries a default. The default value itself is
    /// never retained; it prints as `= ...`.
    pub has_default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParameterKind {
    Normal,
    /// A bare `*` separating positional from keyword-only parameters.
    BareStar,
    /// `*args`.
    StarArgs,
    /// `**kwargs`.
    KwArgs,
}

/// A body-level parameter mutation, `name := Type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mutator {
    pub name: String,
    pub new_type: Type,
}

/// A class declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Class {
    pub name: String,
    /// Parent classes, with empty parens and `nothing` parents removed.
    pub parents: Vec<Type>,
    pub metaclass: Option<Type>,
    pub constants: Vec<Constant>,
    pub methods: Vec<Function>,
}
