//! Semantic parser for the pytd type-stub language.
//!
//! [`parse_string`] drives the whole pipeline: the grammar produces a raw
//! statement tree, conditions are evaluated against the target environment,
//! a first pass registers every name declared in live code, and a second
//! pass resolves types, merges overloaded signatures, and rejects duplicate
//! declarations. The result is a fully resolved [`Module`]; callers never
//! see partial state.
//!
//! ```
//! use pytd_parser::{parse_string, Options};
//!
//! let module = parse_string("x = ...  # type: int\n", &Options::default())?;
//! assert_eq!(module.constants[0].name, "x");
//! # Ok::<(), pytd_parser::ParseError>(())
//! ```

mod condition;
mod grammar;
mod merge;
mod names;
mod normalize;
mod validate;

use md5::{Digest, Md5};
use pytd_ast::{
    Alias, AliasTarget, Class, Constant, Module, Mutator, Parameter, ParameterKind, Signature,
    Type, TypeVariable,
};
use pytd_common::TargetEnv;

pub use pytd_common::ParseError;

use crate::grammar::{
    BodyStmt, ClassDef, ClassStmt, ConstantDef, ConstantType, DefaultValue, FromItems, FuncDef,
    RawParam, RawParamKind, Stmt, StmtKind, TypeExpr,
};
use crate::merge::{merge_class_functions, merge_module_functions, PendingFunction};
use crate::names::live_branch;
use crate::normalize::Resolver;

/// Parsing options. The defaults target CPython 2.7.6 on linux, matching
/// the environment stubs are written against unless told otherwise.
#[derive(Debug, Clone)]
pub struct Options {
    /// Module name. When absent, a digest of the source stands in and the
    /// printed output carries no module prefix.
    pub name: Option<String>,
    /// File name attached to errors.
    pub filename: Option<String>,
    pub python_version: Vec<u32>,
    pub platform: String,
}

impl Default for Options {
    fn default() -> Self {
        let env = TargetEnv::default();
        Options {
            name: None,
            filename: None,
            python_version: env.python_version,
            platform: env.platform,
        }
    }
}

/// Parse a stub source into a resolved module.
pub fn parse_string(source: &str, options: &Options) -> Result<Module, ParseError> {
    build_module(source, options).map_err(|err| err.with_filename(options.filename.as_deref()))
}

fn build_module(source: &str, options: &Options) -> Result<Module, ParseError> {
    let stmts = grammar::parse_program(source)?;
    let (name, generated_name) = match &options.name {
        Some(name) => (name.clone(), false),
        None => (format!("{:x}", Md5::digest(source.as_bytes())), true),
    };
    let env = TargetEnv {
        python_version: options.python_version.clone(),
        platform: options.platform.clone(),
    };

    let registry = names::collect(&stmts, &env, &name)?;
    let mut builder = Builder {
        env: &env,
        resolver: Resolver::new(&registry),
    };
    let mut parts = ModuleParts::default();
    builder.build_stmts(&stmts, &mut parts)?;

    let mut classes = parts.classes;
    classes.append(&mut builder.resolver.synthesized);
    let module = Module {
        name,
        generated_name,
        typing_names: parts.typing_names,
        aliases: parts.aliases,
        type_params: parts.type_params,
        constants: parts.constants,
        functions: merge_module_functions(parts.functions)?,
        classes,
    };
    validate::check_top_level(&module)?;
    Ok(module)
}

#[derive(Default)]
struct ModuleParts {
    typing_names: Vec<String>,
    aliases: Vec<Alias>,
    type_params: Vec<TypeVariable>,
    constants: Vec<Constant>,
    functions: Vec<PendingFunction>,
    classes: Vec<Class>,
}

struct Builder<'r> {
    env: &'r TargetEnv,
    resolver: Resolver<'r>,
}

impl<'r> Builder<'r> {
    fn build_stmts(&mut self, stmts: &[Stmt], parts: &mut ModuleParts) -> Result<(), ParseError> {
        for stmt in stmts {
            match &stmt.kind {
                // Plain `import M` leaves no trace; the printer synthesizes
                // import lines from the dotted names actually used.
                StmtKind::Import(_) => {}
                StmtKind::FromImport { module, items } => {
                    build_from_import(module, items, parts);
                }
                StmtKind::Constant(def) => {
                    let ty = self.constant_type(def)?;
                    parts.constants.push(Constant {
                        name: def.name.clone(),
                        ty,
                    });
                }
                StmtKind::Alias { name, target } => {
                    let ty = self
                        .resolver
                        .resolve(&TypeExpr::Name(target.clone()), stmt.line)?;
                    parts.aliases.push(Alias {
                        name: name.clone(),
                        target: AliasTarget::Type(ty),
                    });
                }
                StmtKind::TypeVarDef {
                    name,
                    bound,
                    constraints,
                } => {
                    if bound != name {
                        return Err(ParseError::at_line(
                            format!("TypeVar name needs to be '{bound}' (not '{name}')"),
                            stmt.line,
                        ));
                    }
                    let constraints = constraints
                        .iter()
                        .map(|c| self.resolver.resolve(c, stmt.line))
                        .collect::<Result<Vec<_>, _>>()?;
                    parts.type_params.push(TypeVariable {
                        name: name.clone(),
                        constraints,
                    });
                }
                StmtKind::Function(def) => parts.functions.push(self.build_function(def)?),
                StmtKind::Class(def) => parts.classes.push(self.build_class(def)?),
                StmtKind::If(block) => {
                    if let Some(body) = live_branch(block, self.env)? {
                        self.build_stmts(body, parts)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn constant_type(&mut self, def: &ConstantDef) -> Result<Type, ParseError> {
        match &def.ty {
            ConstantType::Int => Ok(Type::named("int")),
            ConstantType::Bool => Ok(Type::named("bool")),
            ConstantType::Any => Ok(Type::Anything),
            ConstantType::Expr(expr) => self.resolver.resolve(expr, def.line),
        }
    }

    fn build_function(&mut self, def: &FuncDef) -> Result<PendingFunction, ParseError> {
        let params = self.build_params(&def.params, def.line)?;
        let (return_type, ret_explicit) = match &def.ret {
            Some(expr) => (self.resolver.resolve(expr, def.line)?, true),
            None => (Type::Anything, false),
        };
        let mut mutators = Vec::new();
        let mut exceptions = Vec::new();
        for body in &def.body {
            match body {
                BodyStmt::Mutator { name, ty, line } => {
                    if !params.iter().any(|p| p.name == *name) {
                        return Err(ParseError::at_line(
                            format!("No parameter named {name}"),
                            def.line,
                        ));
                    }
                    mutators.push(Mutator {
                        name: name.clone(),
                        new_type: self.resolver.resolve(ty, *line)?,
                    });
                }
                BodyStmt::Raise { exception, line } => {
                    exceptions.push(
                        self.resolver
                            .resolve(&TypeExpr::Name(exception.clone()), *line)?,
                    );
                }
            }
        }
        Ok(PendingFunction {
            name: def.name.clone(),
            line: def.line,
            decorators: def.decorators.clone(),
            is_external: def.is_external,
            signature: Signature {
                params,
                return_type,
                mutators,
                exceptions,
            },
            ret_explicit,
        })
    }

    fn build_params(
        &mut self,
        raw: &[RawParam],
        line: u32,
    ) -> Result<Vec<Parameter>, ParseError> {
        let mut out = Vec::new();
        for param in raw {
            let declared = param
                .ty
                .as_ref()
                .map(|e| self.resolver.resolve(e, line))
                .transpose()?;
            match param.kind {
                RawParamKind::Normal => {
                    // An untyped default can add type information; a default
                    // of None widens a declared type to include NoneType.
                    let ty = match (declared, &param.default) {
                        (Some(t), Some(DefaultValue::None)) => {
                            Some(Type::union(vec![t, Type::named("NoneType")]))
                        }
                        (Some(t), _) => Some(t),
                        (None, Some(DefaultValue::Int)) => Some(Type::named("int")),
                        (None, Some(DefaultValue::Float)) => Some(Type::named("float")),
                        (None, Some(DefaultValue::Bool)) => Some(Type::named("bool")),
                        (None, _) => None,
                    };
                    out.push(Parameter {
                        name: param.name.clone(),
                        kind: ParameterKind::Normal,
                        ty,
                        has_default: param.default.is_some(),
                    });
                }
                RawParamKind::BareStar => out.push(Parameter {
                    name: "*".to_string(),
                    kind: ParameterKind::BareStar,
                    ty: None,
                    has_default: false,
                }),
                RawParamKind::StarArgs => {
                    let ty = declared.map(|t| Type::Homogeneous {
                        base: "tuple".to_string(),
                        param: Box::new(t),
                    });
                    out.push(Parameter {
                        name: param.name.clone(),
                        kind: ParameterKind::StarArgs,
                        ty,
                        has_default: false,
                    });
                }
                RawParamKind::KwArgs => {
                    let ty = declared.map(|t| Type::Generic {
                        base: "dict".to_string(),
                        params: vec![Type::named("str"), t],
                    });
                    out.push(Parameter {
                        name: param.name.clone(),
                        kind: ParameterKind::KwArgs,
                        ty,
                        has_default: false,
                    });
                }
                RawParamKind::EllipsisArgs => {
                    out.push(Parameter {
                        name: "args".to_string(),
                        kind: ParameterKind::StarArgs,
                        ty: None,
                        has_default: false,
                    });
                    out.push(Parameter {
                        name: "kwargs".to_string(),
                        kind: ParameterKind::KwArgs,
                        ty: None,
                        has_default: false,
                    });
                }
            }
        }
        Ok(out)
    }

    fn build_class(&mut self, def: &ClassDef) -> Result<Class, ParseError> {
        let mut parents = Vec::new();
        for parent in &def.parents {
            let ty = self.resolver.resolve(parent, def.line)?;
            if !ty.is_nothing() {
                parents.push(ty);
            }
        }
        let metaclass = def
            .metaclass
            .as_ref()
            .map(|e| self.resolver.resolve(e, def.line))
            .transpose()?;

        let mut constants = Vec::new();
        let mut pending = Vec::new();
        self.build_class_body(&def.body, def.line, &mut constants, &mut pending)?;
        let members = merge_class_functions(pending, def.line)?;
        constants.extend(members.properties);

        let class = Class {
            name: def.name.clone(),
            parents,
            metaclass,
            constants,
            methods: members.methods,
        };
        validate::check_class(&class, def.line)?;
        Ok(class)
    }

    fn build_class_body(
        &mut self,
        body: &[ClassStmt],
        class_line: u32,
        constants: &mut Vec<Constant>,
        pending: &mut Vec<PendingFunction>,
    ) -> Result<(), ParseError> {
        for stmt in body {
            match stmt {
                ClassStmt::Constant(def) => {
                    let ty = self.constant_type(def)?;
                    constants.push(Constant {
                        name: def.name.clone(),
                        ty,
                    });
                }
                // `y = x` copies the type of an earlier class constant.
                ClassStmt::NameAlias { name, target, .. } => {
                    let ty = constants
                        .iter()
                        .find(|c| c.name == *target)
                        .map(|c| c.ty.clone())
                        .ok_or_else(|| {
                            ParseError::at_line(
                                format!("Illegal value for alias '{name}'"),
                                class_line,
                            )
                        })?;
                    constants.push(Constant {
                        name: name.clone(),
                        ty,
                    });
                }
                ClassStmt::Function(def) => pending.push(self.build_function(def)?),
                ClassStmt::If(block) => {
                    if let Some(live) = live_branch(block, self.env)? {
                        self.build_class_body(live, class_line, constants, pending)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn build_from_import(module: &str, items: &FromItems, parts: &mut ModuleParts) {
    let names = match items {
        FromItems::Star => return,
        FromItems::Names(names) => names,
    };
    for (member, rename) in names {
        let local = rename.as_deref().unwrap_or(member);
        if module == "typing" {
            if !parts.typing_names.iter().any(|n| n == local) {
                parts.typing_names.push(local.to_string());
            }
        } else {
            parts.aliases.push(Alias {
                name: local.to_string(),
                target: AliasTarget::Import {
                    module: module.to_string(),
                    member: member.to_string(),
                },
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_name_is_a_source_digest() {
        let module = parse_string("", &Options::default()).unwrap();
        assert!(module.generated_name);
        assert_eq!(module.name, "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn supplied_name_is_kept() {
        let options = Options {
            name: Some("foo".to_string()),
            ..Options::default()
        };
        let module = parse_string("x = ...  # type: int\n", &options).unwrap();
        assert!(!module.generated_name);
        assert_eq!(module.name, "foo");
        assert_eq!(module.constants[0].ty, Type::named("int"));
    }

    #[test]
    fn filename_is_attached_to_errors() {
        let options = Options {
            filename: Some("foo.py".to_string()),
            ..Options::default()
        };
        let err = parse_string("x = 1\n", &options).unwrap_err();
        assert_eq!(err.filename.as_deref(), Some("foo.py"));
        assert_eq!(err.message, "Only '0' allowed as int literal");
    }

    #[test]
    fn typevar_name_must_match() {
        let err = parse_string("T = TypeVar('Q')\n", &Options::default()).unwrap_err();
        assert_eq!(err.message, "TypeVar name needs to be 'Q' (not 'T')");
        assert_eq!(err.line, Some(1));
    }

    #[test]
    fn dead_branches_produce_nothing() {
        let source = "\
if sys.version_info >= (3,):
    x = ...  # type: int
else:
    y = ...  # type: str
";
        let module = parse_string(source, &Options::default()).unwrap();
        assert_eq!(module.constants.len(), 1);
        assert_eq!(module.constants[0].name, "y");
    }

    #[test]
    fn duplicate_top_level_names_are_rejected() {
        let err = parse_string(
            "x = ...  # type: int\nx = ...  # type: str\n",
            &Options::default(),
        )
        .unwrap_err();
        assert_eq!(err.message, "Duplicate top-level identifier(s): x");
        assert_eq!(err.line, None);
    }
}
