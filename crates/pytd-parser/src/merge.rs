//! Merging of same-named function definitions.
//!
//! Overloaded `def`s collapse into one [`Function`] carrying every
//! signature; the definitions must agree on how they are bound. Property
//! getters, setters, and deleters fold into a single class attribute whose
//! type is the last explicitly declared non-`Any` type across getter return
//! and setter value parameter. `__new__` is always a staticmethod.

use pytd_ast::{Constant, Function, MethodKind, Signature, Type};
use pytd_common::ParseError;

use crate::grammar::Decorator;

/// One resolved `def`, waiting to be merged with others of the same name.
pub struct PendingFunction {
    pub name: String,
    /// Line of the `def` keyword.
    pub line: u32,
    pub decorators: Vec<Decorator>,
    pub is_external: bool,
    pub signature: Signature,
    /// Whether the return type was written out, as opposed to defaulting
    /// to `Anything`. Property merging only honors explicit returns.
    pub ret_explicit: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Binding {
    Plain,
    Static,
    Class,
    Property(PropertyRole),
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PropertyRole {
    Getter,
    Setter,
    Deleter,
}

/// Decorators that mark overloads or abstractness carry no binding
/// information and are dropped before counting.
fn is_ignored(text: &str) -> bool {
    matches!(
        text,
        "overload" | "typing.overload" | "abstractmethod" | "abc.abstractmethod"
    )
}

fn classify(func: &PendingFunction) -> Result<Binding, ParseError> {
    let kept: Vec<&Decorator> = func
        .decorators
        .iter()
        .filter(|d| !is_ignored(&d.text))
        .collect();
    if kept.len() > 1 {
        return Err(ParseError::at_line(
            format!("Too many decorators for {}", func.name),
            func.line,
        ));
    }
    let Some(decorator) = kept.first() else {
        return Ok(Binding::Plain);
    };
    let binding = match decorator.text.as_str() {
        "staticmethod" => Binding::Static,
        "classmethod" => Binding::Class,
        "property" => Binding::Property(PropertyRole::Getter),
        text if text == format!("{}.setter", func.name) => {
            Binding::Property(PropertyRole::Setter)
        }
        text if text == format!("{}.deleter", func.name) => {
            Binding::Property(PropertyRole::Deleter)
        }
        text => Binding::Other(text.to_string()),
    };
    Ok(binding)
}

fn method_kind(binding: &Binding) -> MethodKind {
    match binding {
        Binding::Static => MethodKind::StaticMethod,
        Binding::Class => MethodKind::ClassMethod,
        _ => MethodKind::Method,
    }
}

/// Group pending functions by name, preserving first-definition order.
fn group_by_name(pending: Vec<PendingFunction>) -> Vec<(String, Vec<PendingFunction>)> {
    let mut groups: Vec<(String, Vec<PendingFunction>)> = Vec::new();
    for func in pending {
        match groups.iter_mut().find(|(name, _)| *name == func.name) {
            Some((_, members)) => members.push(func),
            None => groups.push((func.name.clone(), vec![func])),
        }
    }
    groups
}

/// Merge module-level definitions. Property decorators are only meaningful
/// inside a class and are rejected here wholesale.
pub fn merge_module_functions(
    pending: Vec<PendingFunction>,
) -> Result<Vec<Function>, ParseError> {
    let mut property_names: Vec<String> = Vec::new();
    for func in &pending {
        if matches!(classify(func)?, Binding::Property(_))
            && !property_names.contains(&func.name)
        {
            property_names.push(func.name.clone());
        }
    }
    if !property_names.is_empty() {
        return Err(ParseError::new(format!(
            "Module-level functions with property decorators: {}",
            property_names.join(", ")
        )));
    }

    let mut functions = Vec::new();
    for (name, members) in group_by_name(pending) {
        functions.push(merge_group(&name, members, None)?);
    }
    Ok(functions)
}

/// The merged members of a class body.
#[derive(Debug)]
pub struct ClassMembers {
    pub methods: Vec<Function>,
    /// Attributes folded from property definitions.
    pub properties: Vec<Constant>,
}

/// Merge class-level definitions. Errors that concern the class as a whole
/// are attributed to `class_line`.
pub fn merge_class_functions(
    pending: Vec<PendingFunction>,
    class_line: u32,
) -> Result<ClassMembers, ParseError> {
    let mut methods = Vec::new();
    let mut properties = Vec::new();
    for (name, members) in group_by_name(pending) {
        let mut roles = Vec::with_capacity(members.len());
        let mut has_property = false;
        let mut has_method = false;
        for func in &members {
            let binding = classify(func)?;
            match &binding {
                Binding::Property(role) => {
                    check_property_shape(func, *role, class_line)?;
                    has_property = true;
                }
                Binding::Other(text) => {
                    return Err(ParseError::at_line(
                        format!("Unhandled decorator: {text}"),
                        class_line,
                    ));
                }
                _ => has_method = true,
            }
            roles.push(binding);
        }
        if has_property && has_method {
            return Err(ParseError::at_line(
                format!("Incompatible signatures for {name}"),
                class_line,
            ));
        }
        if has_property {
            properties.push(merge_property(&name, &members, &roles));
        } else {
            methods.push(merge_group(&name, members, Some(class_line))?);
        }
    }
    Ok(ClassMembers {
        methods,
        properties,
    })
}

/// A getter takes only `self`, a setter `self` and the value, a deleter
/// only `self`. Any other shape makes the decorator meaningless.
fn check_property_shape(
    func: &PendingFunction,
    role: PropertyRole,
    class_line: u32,
) -> Result<(), ParseError> {
    let expected = match role {
        PropertyRole::Getter | PropertyRole::Deleter => 1,
        PropertyRole::Setter => 2,
    };
    if func.signature.params.len() != expected {
        let text = match role {
            PropertyRole::Getter => "property".to_string(),
            PropertyRole::Setter => format!("{}.setter", func.name),
            PropertyRole::Deleter => format!("{}.deleter", func.name),
        };
        return Err(ParseError::at_line(
            format!("Unhandled decorator: {text}"),
            class_line,
        ));
    }
    Ok(())
}

fn merge_property(
    name: &str,
    members: &[PendingFunction],
    roles: &[Binding],
) -> Constant {
    let mut ty = Type::Anything;
    for (func, role) in members.iter().zip(roles) {
        let candidate = match role {
            Binding::Property(PropertyRole::Getter) if func.ret_explicit => {
                Some(func.signature.return_type.clone())
            }
            Binding::Property(PropertyRole::Setter) => {
                func.signature.params[1].ty.clone()
            }
            _ => None,
        };
        if let Some(candidate) = candidate {
            if !candidate.is_anything() {
                ty = candidate;
            }
        }
    }
    Constant {
        name: name.to_string(),
        ty,
    }
}

fn merge_group(
    name: &str,
    members: Vec<PendingFunction>,
    class_line: Option<u32>,
) -> Result<Function, ParseError> {
    let external_count = members.iter().filter(|f| f.is_external).count();
    if external_count > 0 {
        if external_count > 1 {
            return Err(ParseError::new(format!("Multiple PYTHONCODEs for {name}")));
        }
        if external_count != members.len() {
            return Err(ParseError::new(format!(
                "Mixed pytd and PYTHONCODEs for {name}"
            )));
        }
        return Ok(Function {
            name: name.to_string(),
            kind: MethodKind::Method,
            signatures: Vec::new(),
            is_external: true,
        });
    }

    let mut kind = None;
    let mut signatures = Vec::with_capacity(members.len());
    for func in members {
        let binding = classify(&func)?;
        if let Binding::Other(text) = &binding {
            return Err(ParseError::at_line(
                format!("Unhandled decorator: {text}"),
                class_line.unwrap_or(func.line),
            ));
        }
        let this_kind = method_kind(&binding);
        match kind {
            None => kind = Some(this_kind),
            Some(existing) if existing != this_kind => {
                let err = format!("Overloaded signatures for {name} disagree on decorators");
                return Err(match class_line {
                    Some(line) => ParseError::at_line(err, line),
                    None => ParseError::new(err),
                });
            }
            Some(_) => {}
        }
        signatures.push(func.signature);
    }
    let mut kind = kind.unwrap_or(MethodKind::Method);
    if name == "__new__" {
        kind = MethodKind::StaticMethod;
    }
    Ok(Function {
        name: name.to_string(),
        kind,
        signatures,
        is_external: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pytd_ast::{Parameter, ParameterKind};

    fn param(name: &str, ty: Option<Type>) -> Parameter {
        Parameter {
            name: name.to_string(),
            kind: ParameterKind::Normal,
            ty,
            has_default: false,
        }
    }

    fn signature(params: Vec<Parameter>, return_type: Type) -> Signature {
        Signature {
            params,
            return_type,
            mutators: Vec::new(),
            exceptions: Vec::new(),
        }
    }

    fn pending(
        name: &str,
        line: u32,
        decorators: &[&str],
        sig: Signature,
        ret_explicit: bool,
    ) -> PendingFunction {
        PendingFunction {
            name: name.to_string(),
            line,
            decorators: decorators
                .iter()
                .map(|t| Decorator {
                    text: t.to_string(),
                    line,
                })
                .collect(),
            is_external: false,
            signature: sig,
            ret_explicit,
        }
    }

    #[test]
    fn overloads_collapse_into_one_function() {
        let funcs = merge_module_functions(vec![
            pending("f", 1, &["overload"], signature(vec![], Type::named("int")), true),
            pending("f", 2, &["overload"], signature(vec![], Type::named("str")), true),
            pending("g", 3, &[], signature(vec![], Type::Anything), false),
        ])
        .unwrap();
        assert_eq!(funcs.len(), 2);
        assert_eq!(funcs[0].name, "f");
        assert_eq!(funcs[0].signatures.len(), 2);
        assert_eq!(funcs[1].name, "g");
    }

    #[test]
    fn too_many_decorators() {
        let err = merge_module_functions(vec![pending(
            "f",
            3,
            &["staticmethod", "classmethod"],
            signature(vec![], Type::Anything),
            false,
        )])
        .unwrap_err();
        assert_eq!(err.message, "Too many decorators for f");
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn module_level_properties_rejected() {
        let err = merge_module_functions(vec![pending(
            "prop",
            1,
            &["property"],
            signature(vec![param("self", None)], Type::Anything),
            false,
        )])
        .unwrap_err();
        assert_eq!(
            err.message,
            "Module-level functions with property decorators: prop"
        );
        assert_eq!(err.line, None);
    }

    #[test]
    fn property_family_folds_to_constant() {
        let members = merge_class_functions(
            vec![
                pending(
                    "attr",
                    2,
                    &["property"],
                    signature(vec![param("self", None)], Type::Anything),
                    false,
                ),
                pending(
                    "attr",
                    3,
                    &["attr.setter"],
                    signature(
                        vec![param("self", None), param("value", Some(Type::named("int")))],
                        Type::Anything,
                    ),
                    false,
                ),
                pending(
                    "attr",
                    4,
                    &["attr.deleter"],
                    signature(vec![param("self", None)], Type::Anything),
                    false,
                ),
            ],
            1,
        )
        .unwrap();
        assert!(members.methods.is_empty());
        assert_eq!(members.properties.len(), 1);
        assert_eq!(members.properties[0].name, "attr");
        assert_eq!(members.properties[0].ty, Type::named("int"));
    }

    #[test]
    fn getter_return_type_wins_when_later() {
        let members = merge_class_functions(
            vec![
                pending(
                    "attr",
                    2,
                    &["attr.setter"],
                    signature(
                        vec![param("self", None), param("value", Some(Type::named("int")))],
                        Type::Anything,
                    ),
                    false,
                ),
                pending(
                    "attr",
                    3,
                    &["property"],
                    signature(vec![param("self", None)], Type::named("str")),
                    true,
                ),
            ],
            1,
        )
        .unwrap();
        assert_eq!(members.properties[0].ty, Type::named("str"));
    }

    #[test]
    fn untyped_property_defaults_to_anything() {
        let members = merge_class_functions(
            vec![pending(
                "attr",
                2,
                &["property"],
                signature(vec![param("self", None)], Type::Anything),
                false,
            )],
            1,
        )
        .unwrap();
        assert_eq!(members.properties[0].ty, Type::Anything);
    }

    #[test]
    fn property_with_wrong_arity_is_unhandled() {
        let err = merge_class_functions(
            vec![pending(
                "attr",
                2,
                &["property"],
                signature(vec![param("self", None), param("extra", None)], Type::Anything),
                false,
            )],
            7,
        )
        .unwrap_err();
        assert_eq!(err.message, "Unhandled decorator: property");
        assert_eq!(err.line, Some(7));
    }

    #[test]
    fn foreign_setter_prefix_is_unhandled() {
        let err = merge_class_functions(
            vec![pending(
                "attr",
                2,
                &["other.setter"],
                signature(vec![param("self", None), param("value", None)], Type::Anything),
                false,
            )],
            5,
        )
        .unwrap_err();
        assert_eq!(err.message, "Unhandled decorator: other.setter");
        assert_eq!(err.line, Some(5));
    }

    #[test]
    fn properties_and_methods_conflict() {
        let err = merge_class_functions(
            vec![
                pending(
                    "attr",
                    2,
                    &["property"],
                    signature(vec![param("self", None)], Type::Anything),
                    false,
                ),
                pending("attr", 3, &[], signature(vec![param("self", None)], Type::Anything), false),
            ],
            1,
        )
        .unwrap_err();
        assert_eq!(err.message, "Incompatible signatures for attr");
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn binding_disagreement_is_an_error() {
        let err = merge_class_functions(
            vec![
                pending("f", 2, &["staticmethod"], signature(vec![], Type::Anything), false),
                pending("f", 3, &["classmethod"], signature(vec![], Type::Anything), false),
            ],
            1,
        )
        .unwrap_err();
        assert_eq!(
            err.message,
            "Overloaded signatures for f disagree on decorators"
        );
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn dunder_new_is_a_staticmethod() {
        let members = merge_class_functions(
            vec![pending(
                "__new__",
                2,
                &[],
                signature(vec![param("cls", None)], Type::Anything),
                false,
            )],
            1,
        )
        .unwrap();
        assert_eq!(members.methods[0].kind, MethodKind::StaticMethod);
    }

    #[test]
    fn pythoncode_rules() {
        let mut external = pending("f", 1, &[], signature(vec![], Type::Anything), false);
        external.is_external = true;
        let merged = merge_module_functions(vec![external]).unwrap();
        assert!(merged[0].is_external);
        assert!(merged[0].signatures.is_empty());

        let mut a = pending("f", 1, &[], signature(vec![], Type::Anything), false);
        a.is_external = true;
        let mut b = pending("f", 2, &[], signature(vec![], Type::Anything), false);
        b.is_external = true;
        let err = merge_module_functions(vec![a, b]).unwrap_err();
        assert_eq!(err.message, "Multiple PYTHONCODEs for f");
        assert_eq!(err.line, None);

        let mut a = pending("f", 1, &[], signature(vec![], Type::Anything), false);
        a.is_external = true;
        let b = pending("f", 2, &[], signature(vec![], Type::Anything), false);
        let err = merge_module_functions(vec![a, b]).unwrap_err();
        assert_eq!(err.message, "Mixed pytd and PYTHONCODEs for f");
    }
}
