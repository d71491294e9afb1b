use serde::Serialize;

/// A pytd type expression, after name resolution and normalization.
///
/// Union values are stored flattened and deduplicated, `nothing` members
/// already dropped. A union is only ever constructed with two or more
/// distinct members; a would-be singleton collapses to the member itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Type {
    /// The unknown type, written `?`. Prints as `Any`.
    Anything,
    /// The empty (bottom) type, written `nothing`.
    Nothing,
    /// A plain or dotted name, e.g. `int`, `foo.bar.Baz`, `NoneType`.
    Named(String),
    /// A reference to a declared type variable.
    TypeParam(String),
    /// A parametrized type with explicit parameters, e.g. `Tuple[int, str]`.
    Generic { base: String, params: Vec<Type> },
    /// A container of uniform element type: `List[int]`, `Tuple[int, ...]`.
    Homogeneous { base: String, param: Box<Type> },
    /// A union of two or more distinct members.
    Union(Vec<Type>),
    /// `Callable[[A, B], R]`; `args` of `None` means any arity.
    Callable {
        args: Option<Vec<Type>>,
        ret: Box<Type>,
    },
}

impl Type {
    /// Shorthand for a named type.
    pub fn named(name: impl Into<String>) -> Self {
        Type::Named(name.into())
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Type::Nothing)
    }

    pub fn is_anything(&self) -> bool {
        matches!(self, Type::Anything)
    }

    /// True for the `NoneType` name, the pep484 translation of `None`.
    pub fn is_none_type(&self) -> bool {
        matches!(self, Type::Named(n) if n == "NoneType")
    }

    /// Build a union from already-resolved members: flatten nested unions,
    /// drop `nothing`, deduplicate keeping first occurrence, and collapse
    /// a single survivor to itself. An empty result is `nothing`.
    pub fn union(members: Vec<Type>) -> Type {
        let mut flat: Vec<Type> = Vec::new();
        for member in members {
            match member {
                Type::Union(inner) => {
                    for m in inner {
                        if !m.is_nothing() && !flat.contains(&m) {
                            flat.push(m);
                        }
                    }
                }
                m if m.is_nothing() => {}
                m => {
                    if !flat.contains(&m) {
                        flat.push(m);
                    }
                }
            }
        }
        if flat.len() > 1 {
            Type::Union(flat)
        } else {
            flat.pop().unwrap_or(Type::Nothing)
        }
    }
}

/// The capitalized typing name for a parametrized builtin container,
/// if there is one.
pub fn capitalized_builtin(base: &str) -> Option<&'static str> {
    match base {
        "list" => Some("List"),
        "dict" => Some("Dict"),
        "tuple" => Some("Tuple"),
        "set" => Some("Set"),
        "frozenset" => Some("FrozenSet"),
        _ => None,
    }
}

/// The lower-case builtin behind a pep484 capitalized container name,
/// plus the `None` -> `NoneType` translation. This is the table applied
/// during name resolution when the name is not shadowed by a local class.
pub fn pep484_translation(name: &str) -> Option<&'static str> {
    match name {
        "List" => Some("list"),
        "Dict" => Some("dict"),
        "Tuple" => Some("tuple"),
        "Set" => Some("set"),
        "FrozenSet" => Some("frozenset"),
        "None" => Some("NoneType"),
        _ => None,
    }
}
