//! First-pass name collection.
//!
//! Before any type reference is resolved, the live statements of a program
//! are walked once to register every locally declared class, type parameter,
//! alias, and typing import. Dead `if` branches contribute nothing, so a
//! conditionally declared class can shadow a builtin alias used anywhere in
//! the file.

use pytd_common::{ParseError, TargetEnv};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::condition::evaluate;
use crate::grammar::{ClassStmt, FromItems, IfBlock, Stmt, StmtKind};

/// Names visible to the type resolver.
#[derive(Debug, Default)]
pub struct Registry {
    /// Locally declared classes, including those inside live `if` branches.
    pub classes: FxHashSet<String>,
    /// TypeVar bindings.
    pub type_params: FxHashSet<String>,
    /// Local name to dotted target, from `from M import x` and `x = a.b.C`.
    pub aliases: FxHashMap<String, String>,
    /// Names imported from `typing`, under their local binding.
    pub typing_names: FxHashSet<String>,
    /// True when the module being parsed is itself named `typing`, which
    /// disables pep484 translation.
    pub module_is_typing: bool,
}

impl Registry {
    /// Follow alias chains to the final dotted target, if any.
    pub fn alias_target(&self, name: &str) -> Option<&str> {
        let mut current = self.aliases.get(name)?;
        // Alias-to-alias chains are rare and shallow; bound the walk so a
        // self-referential alias cannot loop.
        for _ in 0..16 {
            match self.aliases.get(current.as_str()) {
                Some(next) => current = next,
                None => break,
            }
        }
        Some(current)
    }
}

/// Collect every name declared by the live statements of `stmts`.
pub fn collect(
    stmts: &[Stmt],
    env: &TargetEnv,
    module_name: &str,
) -> Result<Registry, ParseError> {
    let mut registry = Registry {
        module_is_typing: module_name == "typing",
        ..Registry::default()
    };
    collect_stmts(stmts, env, &mut registry)?;
    Ok(registry)
}

fn collect_stmts(
    stmts: &[Stmt],
    env: &TargetEnv,
    registry: &mut Registry,
) -> Result<(), ParseError> {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Class(class) => {
                registry.classes.insert(class.name.clone());
                collect_class_body(&class.body, env, registry)?;
            }
            StmtKind::TypeVarDef { name, .. } => {
                registry.type_params.insert(name.clone());
            }
            StmtKind::Alias { name, target } => {
                registry.aliases.insert(name.clone(), target.clone());
            }
            StmtKind::FromImport { module, items } => {
                collect_from_import(module, items, registry);
            }
            StmtKind::If(block) => {
                if let Some(body) = live_branch(block, env)? {
                    collect_stmts(body, env, registry)?;
                }
            }
            StmtKind::Import(_) | StmtKind::Constant(_) | StmtKind::Function(_) => {}
        }
    }
    Ok(())
}

fn collect_from_import(module: &str, items: &FromItems, registry: &mut Registry) {
    let names = match items {
        // `from M import *` binds nothing.
        FromItems::Star => return,
        FromItems::Names(names) => names,
    };
    for (member, rename) in names {
        let local = rename.as_deref().unwrap_or(member);
        if module == "typing" {
            registry.typing_names.insert(local.to_string());
        } else {
            registry
                .aliases
                .insert(local.to_string(), format!("{module}.{member}"));
        }
    }
}

fn collect_class_body(
    body: &[ClassStmt],
    env: &TargetEnv,
    registry: &mut Registry,
) -> Result<(), ParseError> {
    for stmt in body {
        if let ClassStmt::If(block) = stmt {
            if let Some(live) = live_branch(block, env)? {
                collect_class_body(live, env, registry)?;
            }
        }
    }
    Ok(())
}

/// The body of the first branch whose condition holds, or the `else` body.
pub fn live_branch<'a, T>(
    block: &'a IfBlock<T>,
    env: &TargetEnv,
) -> Result<Option<&'a [T]>, ParseError> {
    for (condition, body) in &block.branches {
        match condition {
            Some(cond) if !evaluate(cond, env)? => continue,
            _ => return Ok(Some(body)),
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::parse_program;

    fn registry(source: &str) -> Registry {
        let stmts = parse_program(source).unwrap();
        collect(&stmts, &TargetEnv::default(), "<test>").unwrap()
    }

    #[test]
    fn collects_classes_and_typevars() {
        let r = registry("T = TypeVar('T')\nclass Foo:\n    pass\n");
        assert!(r.classes.contains("Foo"));
        assert!(r.type_params.contains("T"));
    }

    #[test]
    fn from_import_binds_dotted_targets() {
        let r = registry("from foo.bar import Baz, Qux as Renamed\n");
        assert_eq!(r.alias_target("Baz"), Some("foo.bar.Baz"));
        assert_eq!(r.alias_target("Renamed"), Some("foo.bar.Qux"));
        assert_eq!(r.alias_target("Qux"), None);
    }

    #[test]
    fn typing_imports_are_kept_separate() {
        let r = registry("from typing import List, Union\n");
        assert!(r.typing_names.contains("List"));
        assert!(r.typing_names.contains("Union"));
        assert!(r.aliases.is_empty());
    }

    #[test]
    fn star_import_binds_nothing() {
        let r = registry("from foo import *\n");
        assert!(r.aliases.is_empty());
    }

    #[test]
    fn dead_branches_are_skipped() {
        let r = registry(
            "if sys.version_info > (3,):\n    class New:\n        pass\nelse:\n    class Old:\n        pass\n",
        );
        assert!(!r.classes.contains("New"));
        assert!(r.classes.contains("Old"));
    }

    #[test]
    fn alias_chains_resolve() {
        let r = registry("x = a.b.C\ny = x\n");
        assert_eq!(r.alias_target("y"), Some("a.b.C"));
    }
}
