//! Duplicate-name rejection.

use pytd_ast::{Class, Module};
use pytd_common::ParseError;
use rustc_hash::FxHashMap;

/// Names declared more than once, sorted and deduplicated.
fn duplicates<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut counts: FxHashMap<&str, u32> = FxHashMap::default();
    for name in names {
        *counts.entry(name).or_insert(0) += 1;
    }
    let mut repeated: Vec<&str> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(name, _)| name)
        .collect();
    repeated.sort_unstable();
    repeated
}

/// Every top-level declaration claims its name exactly once.
pub fn check_top_level(module: &Module) -> Result<(), ParseError> {
    let names = module
        .aliases
        .iter()
        .map(|a| a.name.as_str())
        .chain(module.type_params.iter().map(|t| t.name.as_str()))
        .chain(module.constants.iter().map(|c| c.name.as_str()))
        .chain(module.functions.iter().map(|f| f.name.as_str()))
        .chain(module.classes.iter().map(|c| c.name.as_str()));
    let repeated = duplicates(names);
    if repeated.is_empty() {
        return Ok(());
    }
    Err(ParseError::new(format!(
        "Duplicate top-level identifier(s): {}",
        repeated.join(", ")
    )))
}

/// Constants (including folded properties) and methods of a class share
/// one namespace.
pub fn check_class(class: &Class, line: u32) -> Result<(), ParseError> {
    let names = class
        .constants
        .iter()
        .map(|c| c.name.as_str())
        .chain(class.methods.iter().map(|m| m.name.as_str()));
    let repeated = duplicates(names);
    if repeated.is_empty() {
        return Ok(());
    }
    Err(ParseError::at_line(
        format!("Duplicate identifier(s): {}", repeated.join(", ")),
        line,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pytd_ast::{Constant, Type};

    fn module_with_constants(names: &[&str]) -> Module {
        Module {
            name: "m".to_string(),
            generated_name: true,
            typing_names: Vec::new(),
            aliases: Vec::new(),
            type_params: Vec::new(),
            constants: names
                .iter()
                .map(|n| Constant {
                    name: n.to_string(),
                    ty: Type::Anything,
                })
                .collect(),
            functions: Vec::new(),
            classes: Vec::new(),
        }
    }

    #[test]
    fn distinct_names_pass() {
        assert!(check_top_level(&module_with_constants(&["a", "b"])).is_ok());
    }

    #[test]
    fn repeated_names_are_sorted_and_deduped() {
        let err =
            check_top_level(&module_with_constants(&["b", "a", "b", "a", "b"])).unwrap_err();
        assert_eq!(err.message, "Duplicate top-level identifier(s): a, b");
        assert_eq!(err.line, None);
    }

    #[test]
    fn class_duplicates_report_the_class_line() {
        let class = Class {
            name: "Foo".to_string(),
            parents: Vec::new(),
            metaclass: None,
            constants: vec![Constant {
                name: "x".to_string(),
                ty: Type::Anything,
            }],
            methods: vec![pytd_ast::Function {
                name: "x".to_string(),
                kind: pytd_ast::MethodKind::Method,
                signatures: Vec::new(),
                is_external: false,
            }],
        };
        let err = check_class(&class, 4).unwrap_err();
        assert_eq!(err.message, "Duplicate identifier(s): x");
        assert_eq!(err.line, Some(4));
    }
}
