//! Canonical source printer.
//!
//! Printing is the external contract of the whole pipeline: a parsed module
//! prints in one canonical layout regardless of how the source spelled it.
//! Sections appear in a fixed order, separated by single blank lines:
//!
//! 1. synthesized imports (`import X` lines sorted, then one
//!    `from typing import ...` line with sorted names)
//! 2. aliases, in declaration order
//! 3. type variables
//! 4. constants
//! 5. functions
//! 6. classes, separated from each other by blank lines
//!
//! The import section is derived from the printed body: a dotted type
//! reference `foo.bar.Baz` synthesizes `import foo.bar`, and a typing name
//! is listed when it is used by the output and was either imported from
//! `typing` in live source or introduced by the printer itself (`Any`,
//! `Union`, `Optional`, `Tuple`, `Dict`, `TypeVar`, `Callable`).

use std::collections::BTreeSet;

use crate::module::{
    Alias, AliasTarget, Class, Constant, Function, MethodKind, Module, Parameter, ParameterKind,
    Signature, TypeVariable,
};
use crate::ty::{capitalized_builtin, Type};

/// Typing names the printer may introduce without a source-level import.
const SYNTHESIZED_TYPING_NAMES: &[&str] = &[
    "Any", "Callable", "Dict", "Optional", "Tuple", "TypeVar", "Union",
];

/// Render a module in canonical form.
pub fn print_module(module: &Module) -> String {
    Printer::default().print(module)
}

#[derive(Default)]
struct Printer {
    /// Type names referenced by the printed body.
    names_used: BTreeSet<String>,
    /// Module prefixes of dotted names, e.g. `foo.bar` for `foo.bar.Baz`.
    modules_used: BTreeSet<String>,
}

impl Printer {
    fn print(mut self, module: &Module) -> String {
        let prefix = if module.generated_name {
            String::new()
        } else {
            format!("{}.", module.name)
        };

        let mut sections: Vec<String> = Vec::new();

        if !module.aliases.is_empty() {
            let lines: Vec<String> = module
                .aliases
                .iter()
                .map(|a| self.alias_line(a, &prefix))
                .collect();
            sections.push(lines.join("\n"));
        }
        if !module.type_params.is_empty() {
            let lines: Vec<String> = module
                .type_params
                .iter()
                .map(|tv| self.type_param_line(tv))
                .collect();
            sections.push(lines.join("\n"));
        }
        if !module.constants.is_empty() {
            let lines: Vec<String> = module
                .constants
                .iter()
                .map(|c| format!("{prefix}{}", self.constant_line(c)))
                .collect();
            sections.push(lines.join("\n"));
        }
        if !module.functions.is_empty() {
            let mut lines: Vec<String> = Vec::new();
            for function in &module.functions {
                lines.extend(self.function_lines(function, 0));
            }
            sections.push(lines.join("\n"));
        }
        let has_classes = !module.classes.is_empty();
        if has_classes {
            let blocks: Vec<String> = module
                .classes
                .iter()
                .map(|c| self.class_block(c))
                .collect();
            sections.push(blocks.join("\n\n"));
        }

        if let Some(imports) = self.import_section(module) {
            sections.insert(0, imports);
        }

        let mut out = sections.join("\n\n");
        if has_classes {
            out.push('\n');
        }
        out
    }

    /// Build the synthesized import section, if anything needs importing.
    fn import_section(&self, module: &Module) -> Option<String> {
        let mut lines: Vec<String> = self
            .modules_used
            .iter()
            .map(|m| format!("import {m}"))
            .collect();

        // A module-level declaration owns its name; a local class Dict must
        // not pull in typing.Dict.
        let declared: BTreeSet<&str> = module
            .classes
            .iter()
            .map(|c| c.name.as_str())
            .chain(module.aliases.iter().map(|a| a.name.as_str()))
            .chain(module.type_params.iter().map(|tv| tv.name.as_str()))
            .collect();
        let typing_names: Vec<&str> = self
            .names_used
            .iter()
            .map(String::as_str)
            .filter(|name| !declared.contains(name))
            .filter(|name| {
                SYNTHESIZED_TYPING_NAMES.contains(name)
                    || module.typing_names.iter().any(|t| t == name)
            })
            .collect();
        if !typing_names.is_empty() {
            lines.push(format!("from typing import {}", typing_names.join(", ")));
        }

        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }

    // ── Declarations ───────────────────────────────────────────────────

    fn alias_line(&mut self, alias: &Alias, prefix: &str) -> String {
        match &alias.target {
            AliasTarget::Import { module, member } => {
                if member == &alias.name {
                    format!("from {module} import {member}")
                } else {
                    format!("from {module} import {member} as {}", alias.name)
                }
            }
            AliasTarget::Type(ty) => {
                let rendered = self.fmt_type(ty);
                format!("{prefix}{} = {rendered}", alias.name)
            }
        }
    }

    fn type_param_line(&mut self, tv: &TypeVariable) -> String {
        self.names_used.insert("TypeVar".to_string());
        if tv.constraints.is_empty() {
            format!("{} = TypeVar('{}')", tv.name, tv.name)
        } else {
            let constraints: Vec<String> =
                tv.constraints.iter().map(|c| self.fmt_type(c)).collect();
            format!(
                "{} = TypeVar('{}', {})",
                tv.name,
                tv.name,
                constraints.join(", ")
            )
        }
    }

    fn constant_line(&mut self, constant: &Constant) -> String {
        let ty = self.fmt_type(&constant.ty);
        format!("{} = ...  # type: {ty}", constant.name)
    }

    fn function_lines(&mut self, function: &Function, indent: usize) -> Vec<String> {
        let pad = " ".repeat(indent);
        if function.is_external {
            return vec![format!("{pad}def {} PYTHONCODE", function.name)];
        }
        let mut lines = Vec::new();
        for signature in &function.signatures {
            // `__new__` is implicitly static and prints without a decorator.
            if function.kind != MethodKind::Method && function.name != "__new__" {
                lines.push(format!("{pad}@{}", function.kind.as_str()));
            }
            lines.extend(self.signature_lines(&function.name, signature, indent));
        }
        lines
    }

    fn signature_lines(&mut self, name: &str, sig: &Signature, indent: usize) -> Vec<String> {
        let pad = " ".repeat(indent);
        let params: Vec<String> = sig.params.iter().map(|p| self.fmt_param(p)).collect();
        let ret = self.fmt_type(&sig.return_type);
        let header = format!("{pad}def {name}({}) -> {ret}", params.join(", "));
        if sig.has_empty_body() {
            return vec![format!("{header}: ...")];
        }
        let mut lines = vec![format!("{header}:")];
        for mutator in &sig.mutators {
            let ty = self.fmt_type(&mutator.new_type);
            lines.push(format!("{pad}    {} := {ty}", mutator.name));
        }
        for exception in &sig.exceptions {
            let ty = self.fmt_type(exception);
            lines.push(format!("{pad}    raise {ty}()"));
        }
        lines
    }

    fn fmt_param(&mut self, param: &Parameter) -> String {
        match param.kind {
            ParameterKind::BareStar => "*".to_string(),
            ParameterKind::StarArgs => match &param.ty {
                // Stored as Tuple[T, ...]; printed unwrapped but the Tuple
                // still counts as a typing usage.
                Some(Type::Homogeneous { param: element, .. }) => {
                    self.names_used.insert("Tuple".to_string());
                    let element = element.clone();
                    format!("*{}: {}", param.name, self.fmt_type(&element))
                }
                Some(other) => {
                    let rendered = self.fmt_type(other);
                    format!("*{}: {rendered}", param.name)
                }
                None => format!("*{}", param.name),
            },
            ParameterKind::KwArgs => match &param.ty {
                // Stored as Dict[str, T].
                Some(Type::Generic { params, .. }) if params.len() == 2 => {
                    self.names_used.insert("Dict".to_string());
                    let value = params[1].clone();
                    format!("**{}: {}", param.name, self.fmt_type(&value))
                }
                Some(other) => {
                    let rendered = self.fmt_type(other);
                    format!("**{}: {rendered}", param.name)
                }
                None => format!("**{}", param.name),
            },
            ParameterKind::Normal => {
                let mut out = param.name.clone();
                if let Some(ty) = &param.ty {
                    let rendered = self.fmt_type(ty);
                    out.push_str(": ");
                    out.push_str(&rendered);
                }
                if param.has_default {
                    out.push_str(" = ...");
                }
                out
            }
        }
    }

    fn class_block(&mut self, class: &Class) -> String {
        let mut parents: Vec<String> = class
            .parents
            .iter()
            .map(|p| self.fmt_type(p))
            .collect();
        if let Some(metaclass) = &class.metaclass {
            let rendered = self.fmt_type(metaclass);
            parents.push(format!("metaclass={rendered}"));
        }
        let header = if parents.is_empty() {
            format!("class {}:", class.name)
        } else {
            format!("class {}({}):", class.name, parents.join(", "))
        };

        let mut lines = vec![header];
        for constant in &class.constants {
            let line = self.constant_line(constant);
            lines.push(format!("    {line}"));
        }
        for method in &class.methods {
            lines.extend(self.function_lines(method, 4));
        }
        if lines.len() == 1 {
            lines.push("    pass".to_string());
        }
        lines.join("\n")
    }

    // ── Types ──────────────────────────────────────────────────────────

    fn fmt_type(&mut self, ty: &Type) -> String {
        match ty {
            Type::Anything => {
                self.names_used.insert("Any".to_string());
                "Any".to_string()
            }
            Type::Nothing => "nothing".to_string(),
            Type::Named(name) => {
                self.note_name(name);
                name.clone()
            }
            Type::TypeParam(name) => name.clone(),
            Type::Generic { base, params } => {
                let base = self.fmt_base(base);
                let params: Vec<String> = params.iter().map(|p| self.fmt_type(p)).collect();
                format!("{base}[{}]", params.join(", "))
            }
            Type::Homogeneous { base, param } => {
                if base == "tuple" {
                    self.names_used.insert("Tuple".to_string());
                    let param = self.fmt_type(param);
                    format!("Tuple[{param}, ...]")
                } else {
                    let base = self.fmt_base(base);
                    let param = self.fmt_type(param);
                    format!("{base}[{param}]")
                }
            }
            Type::Union(members) => {
                // A two-member union with NoneType prints as Optional.
                if members.len() == 2 {
                    if let Some(other) = members.iter().find(|m| !m.is_none_type()) {
                        if members.iter().any(|m| m.is_none_type()) {
                            self.names_used.insert("Optional".to_string());
                            let other = self.fmt_type(other);
                            return format!("Optional[{other}]");
                        }
                    }
                }
                self.names_used.insert("Union".to_string());
                let members: Vec<String> = members.iter().map(|m| self.fmt_type(m)).collect();
                format!("Union[{}]", members.join(", "))
            }
            Type::Callable { args, ret } => {
                self.names_used.insert("Callable".to_string());
                let ret = self.fmt_type(ret);
                match args {
                    None => {
                        self.names_used.insert("Any".to_string());
                        format!("Callable[Any, {ret}]")
                    }
                    Some(args) => {
                        let args: Vec<String> = args.iter().map(|a| self.fmt_type(a)).collect();
                        format!("Callable[[{}], {ret}]", args.join(", "))
                    }
                }
            }
        }
    }

    /// Format the base of a parametrized type, capitalizing builtin
    /// containers for output.
    fn fmt_base(&mut self, base: &str) -> String {
        if let Some(cap) = capitalized_builtin(base) {
            self.names_used.insert(cap.to_string());
            cap.to_string()
        } else {
            self.note_name(base);
            base.to_string()
        }
    }

    /// Record a printed name: dotted names synthesize a module import,
    /// bare names may participate in the typing import line.
    fn note_name(&mut self, name: &str) {
        if let Some(idx) = name.rfind('.') {
            self.modules_used.insert(name[..idx].to_string());
        } else {
            self.names_used.insert(name.to_string());
        }
    }
}
