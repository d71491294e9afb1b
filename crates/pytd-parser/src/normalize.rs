//! Resolution of raw type expressions into normalized [`Type`] values.
//!
//! Names are looked up against the first-pass [`Registry`]: locally declared
//! classes and type parameters win over aliases, which win over the typing
//! specials (`Any`, `Union`, `Optional`, `Callable`) and the pep484
//! capitalized-builtin translation. The translation is suppressed when the
//! module being parsed is itself named `typing`.
//!
//! `NamedTuple(...)` expressions synthesize a class per occurrence; repeated
//! names gain a `~N` suffix and all synthesized names are stored
//! backtick-quoted so printed output re-parses to the same module.

use pytd_ast::{pep484_translation, Class, Constant, Type};
use pytd_common::ParseError;
use rustc_hash::FxHashMap;

use crate::grammar::TypeExpr;
use crate::names::Registry;

pub struct Resolver<'r> {
    registry: &'r Registry,
    /// Occurrence counts for NamedTuple base names.
    generated: FxHashMap<String, u32>,
    /// Classes synthesized from NamedTuple expressions, appended to the
    /// module after the declared classes.
    pub synthesized: Vec<Class>,
}

impl<'r> Resolver<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Resolver {
            registry,
            generated: FxHashMap::default(),
            synthesized: Vec::new(),
        }
    }

    /// Resolve a type expression. Errors are attributed to `line`, the line
    /// of the statement the expression appears in.
    pub fn resolve(&mut self, expr: &TypeExpr, line: u32) -> Result<Type, ParseError> {
        match expr {
            TypeExpr::Anything => Ok(Type::Anything),
            // A stray ellipsis in ordinary type position means "anything".
            TypeExpr::Ellipsis => Ok(Type::Anything),
            TypeExpr::Name(name) => self.resolve_name(name, line),
            TypeExpr::Parametrized { base, params } => {
                self.resolve_parametrized(base, params, line)
            }
            TypeExpr::Union(members) => {
                let resolved = members
                    .iter()
                    .map(|m| self.resolve(m, line))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Type::union(resolved))
            }
            TypeExpr::Tuple(elements) => self.resolve_implied_tuple(elements, line),
            TypeExpr::NamedTuple { name, fields } => {
                self.synthesize_named_tuple(name, fields, line)
            }
        }
    }

    fn resolve_name(&mut self, name: &str, line: u32) -> Result<Type, ParseError> {
        if name == "nothing" {
            return Ok(Type::Nothing);
        }
        if self.registry.type_params.contains(name) {
            return Ok(Type::TypeParam(name.to_string()));
        }
        if let Some(target) = self.registry.alias_target(name) {
            return Ok(Type::named(target));
        }
        if self.registry.classes.contains(name) {
            return Ok(Type::named(name));
        }
        let bare = name.strip_prefix("typing.").unwrap_or(name);
        match bare {
            "Any" => return Ok(Type::Anything),
            "Union" => {
                return Err(ParseError::at_line("Missing options to typing.Union", line))
            }
            "Optional" => {
                return Err(ParseError::at_line(
                    "Missing options to typing.Optional",
                    line,
                ))
            }
            _ => {}
        }
        if !self.registry.module_is_typing {
            if let Some(translated) = pep484_translation(bare) {
                return Ok(Type::named(translated));
            }
        }
        Ok(Type::named(name))
    }

    /// The resolved spelling of a generic base name.
    fn resolve_base(&self, base: &str) -> String {
        if self.registry.classes.contains(base) {
            return base.to_string();
        }
        if let Some(target) = self.registry.alias_target(base) {
            return target.to_string();
        }
        let bare = base.strip_prefix("typing.").unwrap_or(base);
        if !self.registry.module_is_typing {
            if let Some(translated) = pep484_translation(bare) {
                return translated.to_string();
            }
        }
        base.to_string()
    }

    fn resolve_parametrized(
        &mut self,
        base: &str,
        params: &[TypeExpr],
        line: u32,
    ) -> Result<Type, ParseError> {
        let shadowed =
            self.registry.classes.contains(base) || self.registry.alias_target(base).is_some();
        if !shadowed {
            match base.strip_prefix("typing.").unwrap_or(base) {
                "Union" => {
                    let resolved = params
                        .iter()
                        .map(|p| self.resolve(p, line))
                        .collect::<Result<Vec<_>, _>>()?;
                    return Ok(Type::union(resolved));
                }
                "Optional" => {
                    let mut resolved = params
                        .iter()
                        .map(|p| self.resolve(p, line))
                        .collect::<Result<Vec<_>, _>>()?;
                    resolved.push(Type::named("NoneType"));
                    return Ok(Type::union(resolved));
                }
                "Callable" => return self.resolve_callable(params, line),
                _ => {}
            }
        }

        // `B[T, ...]` is the repeated-arity form; `B[..., ...]` is rejected,
        // and an ellipsis among three or more parameters means `Anything`.
        if params.len() == 2 && params[1] == TypeExpr::Ellipsis {
            if params[0] == TypeExpr::Ellipsis {
                return Err(ParseError::at_line(
                    format!("{base}[..., ...] not supported"),
                    line,
                ));
            }
            let element = self.resolve(&params[0], line)?;
            return Ok(Type::Homogeneous {
                base: self.resolve_base(base),
                param: Box::new(element),
            });
        }
        let resolved = params
            .iter()
            .map(|p| self.resolve(p, line))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Type::Generic {
            base: self.resolve_base(base),
            params: resolved,
        })
    }

    fn resolve_callable(
        &mut self,
        params: &[TypeExpr],
        line: u32,
    ) -> Result<Type, ParseError> {
        if params.is_empty() || params.len() > 2 {
            return Err(ParseError::at_line(
                format!("Expected 2 parameters to Callable, got {}", params.len()),
                line,
            ));
        }
        let args = match &params[0] {
            TypeExpr::Tuple(elements) => {
                let mut resolved = Vec::new();
                for element in elements {
                    // `nothing` and `...` argument entries are dropped.
                    if *element == TypeExpr::Ellipsis {
                        continue;
                    }
                    let ty = self.resolve(element, line)?;
                    if !ty.is_nothing() {
                        resolved.push(ty);
                    }
                }
                Some(resolved)
            }
            TypeExpr::Ellipsis => None,
            first => {
                if self.resolve(first, line)?.is_anything() {
                    None
                } else {
                    return Err(ParseError::at_line(
                        "First argument to Callable must be a list of argument types",
                        line,
                    ));
                }
            }
        };
        let ret = match params.get(1) {
            Some(TypeExpr::Ellipsis) | None => Type::Anything,
            Some(expr) => self.resolve(expr, line)?,
        };
        Ok(Type::Callable {
            args,
            ret: Box::new(ret),
        })
    }

    fn resolve_implied_tuple(
        &mut self,
        elements: &[TypeExpr],
        line: u32,
    ) -> Result<Type, ParseError> {
        if elements.is_empty() {
            return Ok(Type::Homogeneous {
                base: "tuple".to_string(),
                param: Box::new(Type::Nothing),
            });
        }
        let resolved = elements
            .iter()
            .map(|e| self.resolve(e, line))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Type::Generic {
            base: "tuple".to_string(),
            params: resolved,
        })
    }

    fn synthesize_named_tuple(
        &mut self,
        name: &str,
        fields: &[(String, TypeExpr)],
        line: u32,
    ) -> Result<Type, ParseError> {
        let count = self.generated.entry(name.to_string()).or_insert(0);
        let quoted = if *count == 0 {
            format!("`{name}`")
        } else {
            format!("`{name}~{count}`")
        };
        *count += 1;

        let mut constants = Vec::new();
        let mut field_types = Vec::new();
        for (field, expr) in fields {
            let ty = self.resolve(expr, line)?;
            field_types.push(ty.clone());
            constants.push(Constant {
                name: field.clone(),
                ty,
            });
        }
        let parent = if field_types.is_empty() {
            Type::Homogeneous {
                base: "tuple".to_string(),
                param: Box::new(Type::Nothing),
            }
        } else {
            Type::Generic {
                base: "tuple".to_string(),
                params: field_types,
            }
        };
        self.synthesized.push(Class {
            name: quoted.clone(),
            parents: vec![parent],
            metaclass: None,
            constants,
            methods: Vec::new(),
        });
        Ok(Type::named(quoted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::TypeExpr as E;

    fn resolve(expr: &E) -> Result<Type, ParseError> {
        let registry = Registry::default();
        Resolver::new(&registry).resolve(expr, 1)
    }

    fn name(n: &str) -> E {
        E::Name(n.to_string())
    }

    #[test]
    fn pep484_names_translate() {
        assert_eq!(resolve(&name("List")).unwrap(), Type::named("list"));
        assert_eq!(resolve(&name("None")).unwrap(), Type::named("NoneType"));
        assert_eq!(resolve(&name("Any")).unwrap(), Type::Anything);
        assert_eq!(resolve(&name("typing.Any")).unwrap(), Type::Anything);
        assert_eq!(resolve(&name("nothing")).unwrap(), Type::Nothing);
        assert_eq!(resolve(&name("int")).unwrap(), Type::named("int"));
    }

    #[test]
    fn local_class_shadows_translation() {
        let mut registry = Registry::default();
        registry.classes.insert("List".to_string());
        let mut resolver = Resolver::new(&registry);
        assert_eq!(resolver.resolve(&name("List"), 1).unwrap(), Type::named("List"));
    }

    #[test]
    fn typing_module_skips_translation() {
        let registry = Registry {
            module_is_typing: true,
            ..Registry::default()
        };
        let mut resolver = Resolver::new(&registry);
        assert_eq!(resolver.resolve(&name("List"), 1).unwrap(), Type::named("List"));
    }

    #[test]
    fn bare_union_and_optional_are_errors() {
        let err = resolve(&name("Union")).unwrap_err();
        assert_eq!(err.message, "Missing options to typing.Union");
        let err = resolve(&name("typing.Optional")).unwrap_err();
        assert_eq!(err.message, "Missing options to typing.Optional");
    }

    #[test]
    fn optional_is_union_with_none() {
        let resolved = resolve(&E::Parametrized {
            base: "Optional".to_string(),
            params: vec![name("int")],
        })
        .unwrap();
        assert_eq!(
            resolved,
            Type::Union(vec![Type::named("int"), Type::named("NoneType")])
        );
    }

    #[test]
    fn callable_forms() {
        let any_arity = resolve(&E::Parametrized {
            base: "Callable".to_string(),
            params: vec![E::Ellipsis, name("int")],
        })
        .unwrap();
        assert_eq!(
            any_arity,
            Type::Callable {
                args: None,
                ret: Box::new(Type::named("int")),
            }
        );

        let explicit = resolve(&E::Parametrized {
            base: "Callable".to_string(),
            params: vec![E::Tuple(vec![name("int"), name("str")]), name("bool")],
        })
        .unwrap();
        assert_eq!(
            explicit,
            Type::Callable {
                args: Some(vec![Type::named("int"), Type::named("str")]),
                ret: Box::new(Type::named("bool")),
            }
        );

        let defaulted_ret = resolve(&E::Parametrized {
            base: "Callable".to_string(),
            params: vec![E::Tuple(vec![name("int")])],
        })
        .unwrap();
        assert_eq!(
            defaulted_ret,
            Type::Callable {
                args: Some(vec![Type::named("int")]),
                ret: Box::new(Type::Anything),
            }
        );

        // `[nothing]` and `[...]` argument lists collapse to no arguments.
        let collapsed = resolve(&E::Parametrized {
            base: "Callable".to_string(),
            params: vec![E::Tuple(vec![name("nothing")]), name("int")],
        })
        .unwrap();
        assert_eq!(
            collapsed,
            Type::Callable {
                args: Some(vec![]),
                ret: Box::new(Type::named("int")),
            }
        );
    }

    #[test]
    fn callable_errors() {
        let err = resolve(&E::Parametrized {
            base: "Callable".to_string(),
            params: vec![name("int"), name("str"), name("bool")],
        })
        .unwrap_err();
        assert_eq!(err.message, "Expected 2 parameters to Callable, got 3");

        let err = resolve(&E::Parametrized {
            base: "Callable".to_string(),
            params: vec![name("int"), name("str")],
        })
        .unwrap_err();
        assert_eq!(
            err.message,
            "First argument to Callable must be a list of argument types"
        );
    }

    #[test]
    fn trailing_ellipsis_forms() {
        let homogeneous = resolve(&E::Parametrized {
            base: "Tuple".to_string(),
            params: vec![name("int"), E::Ellipsis],
        })
        .unwrap();
        assert_eq!(
            homogeneous,
            Type::Homogeneous {
                base: "tuple".to_string(),
                param: Box::new(Type::named("int")),
            }
        );

        let err = resolve(&E::Parametrized {
            base: "Tuple".to_string(),
            params: vec![E::Ellipsis, E::Ellipsis],
        })
        .unwrap_err();
        assert!(err.message.contains("not supported"));

        let widened = resolve(&E::Parametrized {
            base: "Tuple".to_string(),
            params: vec![name("int"), name("str"), E::Ellipsis],
        })
        .unwrap();
        assert_eq!(
            widened,
            Type::Generic {
                base: "tuple".to_string(),
                params: vec![Type::named("int"), Type::named("str"), Type::Anything],
            }
        );
    }

    #[test]
    fn implied_tuples() {
        assert_eq!(
            resolve(&E::Tuple(vec![])).unwrap(),
            Type::Homogeneous {
                base: "tuple".to_string(),
                param: Box::new(Type::Nothing),
            }
        );
        assert_eq!(
            resolve(&E::Tuple(vec![name("int"), name("str")])).unwrap(),
            Type::Generic {
                base: "tuple".to_string(),
                params: vec![Type::named("int"), Type::named("str")],
            }
        );
    }

    #[test]
    fn named_tuple_synthesis_dedups() {
        let registry = Registry::default();
        let mut resolver = Resolver::new(&registry);
        let expr = E::NamedTuple {
            name: "pair".to_string(),
            fields: vec![
                ("first".to_string(), name("int")),
                ("second".to_string(), name("str")),
            ],
        };
        assert_eq!(resolver.resolve(&expr, 1).unwrap(), Type::named("`pair`"));
        assert_eq!(resolver.resolve(&expr, 2).unwrap(), Type::named("`pair~1`"));
        assert_eq!(resolver.synthesized.len(), 2);
        let class = &resolver.synthesized[0];
        assert_eq!(
            class.parents,
            vec![Type::Generic {
                base: "tuple".to_string(),
                params: vec![Type::named("int"), Type::named("str")],
            }]
        );
        assert_eq!(class.constants.len(), 2);

        let empty = E::NamedTuple {
            name: "unit".to_string(),
            fields: vec![],
        };
        assert_eq!(resolver.resolve(&empty, 3).unwrap(), Type::named("`unit`"));
        assert_eq!(
            resolver.synthesized[2].parents,
            vec![Type::Homogeneous {
                base: "tuple".to_string(),
                param: Box::new(Type::Nothing),
            }]
        );
    }

    #[test]
    fn union_members_flatten() {
        let resolved = resolve(&E::Union(vec![
            name("int"),
            E::Union(vec![name("str"), name("int")]),
        ]))
        .unwrap();
        assert_eq!(
            resolved,
            Type::Union(vec![Type::named("int"), Type::named("str")])
        );
    }
}
