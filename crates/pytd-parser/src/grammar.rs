//! Recursive-descent grammar over the token stream.
//!
//! This stage turns tokens into a raw statement tree: conditions are kept
//! unevaluated, type expressions unresolved, and function definitions
//! unmerged. Context restrictions are enforced here (a class body admits no
//! imports, nested classes, or TypeVar definitions), as are the structural
//! parameter rules around `*`, `**`, and `...`.
//!
//! Every statement records the 1-based line it starts on; later stages
//! attribute their errors to these lines.

use pytd_common::span::LineIndex;
use pytd_common::ParseError;
use pytd_lexer::{Token, TokenKind};

const MAX_NESTING_DEPTH: usize = 100;

// ── Raw tree ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `import a.b.c` (renaming is rejected during parsing).
    Import(Vec<String>),
    FromImport {
        module: String,
        items: FromItems,
    },
    Constant(ConstantDef),
    /// `name = Target` where the target is a plain (possibly dotted) name.
    Alias {
        name: String,
        target: String,
    },
    TypeVarDef {
        name: String,
        /// The name given inside `TypeVar('...')`.
        bound: String,
        constraints: Vec<TypeExpr>,
    },
    Function(FuncDef),
    Class(ClassDef),
    If(IfBlock<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromItems {
    Star,
    /// `(member, rename)` pairs.
    Names(Vec<(String, Option<String>)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDef {
    pub name: String,
    pub ty: ConstantType,
    pub line: u32,
}

/// The type of a constant as determined by its right-hand side.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantType {
    /// `x = 0`.
    Int,
    /// `x = True` / `x = False`.
    Bool,
    /// `x = ...` with no type comment.
    Any,
    /// An explicit annotation, from a type comment or pep526 syntax.
    Expr(TypeExpr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    pub name: String,
    pub line: u32,
    pub decorators: Vec<Decorator>,
    pub params: Vec<RawParam>,
    pub ret: Option<TypeExpr>,
    pub body: Vec<BodyStmt>,
    /// `def foo PYTHONCODE`.
    pub is_external: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decorator {
    pub text: String,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawParam {
    pub name: String,
    pub kind: RawParamKind,
    pub ty: Option<TypeExpr>,
    pub default: Option<DefaultValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawParamKind {
    Normal,
    BareStar,
    StarArgs,
    KwArgs,
    /// A literal `...` parameter, shorthand for `*args, **kwargs`.
    EllipsisArgs,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Int,
    Float,
    Bool,
    None,
    Ellipsis,
    Name,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BodyStmt {
    Mutator {
        name: String,
        ty: TypeExpr,
        line: u32,
    },
    Raise {
        exception: String,
        line: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub line: u32,
    pub parents: Vec<TypeExpr>,
    pub metaclass: Option<TypeExpr>,
    pub body: Vec<ClassStmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassStmt {
    Constant(ConstantDef),
    /// `y = x` inside a class body; the target must name an earlier
    /// class-level constant.
    NameAlias {
        name: String,
        target: String,
        line: u32,
    },
    Function(FuncDef),
    If(IfBlock<ClassStmt>),
}

/// An `if`/`elif`/`else` chain. Each branch pairs an optional condition
/// (absent for `else`) with its body.
#[derive(Debug, Clone, PartialEq)]
pub struct IfBlock<T> {
    pub branches: Vec<(Option<CondExpr>, Vec<T>)>,
    pub line: u32,
}

// ── Conditions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum CondExpr {
    Or(Vec<CondExpr>),
    Cmp(Comparison),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// The dotted name on the left, e.g. `sys.version_info`.
    pub target: String,
    pub index: Option<CondIndex>,
    pub op: CmpOp,
    pub value: CondValue,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CondIndex {
    Index(i64),
    Slice {
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CondValue {
    Int(i64),
    Float,
    Str(String),
    Tuple(Vec<CondValue>),
}

// ── Type expressions ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// `?`.
    Anything,
    /// `...` as a type position (generic parameter, Callable argument).
    Ellipsis,
    /// A plain or dotted name.
    Name(String),
    /// `base[p1, p2, ...]`.
    Parametrized {
        base: String,
        params: Vec<TypeExpr>,
    },
    /// `a or b or c`.
    Union(Vec<TypeExpr>),
    /// `[a, b]`, an implied tuple or a Callable argument list.
    Tuple(Vec<TypeExpr>),
    /// `NamedTuple(name, [(field, type), ...])`.
    NamedTuple {
        name: String,
        fields: Vec<(String, TypeExpr)>,
    },
}

// ── Entry points ───────────────────────────────────────────────────────

/// Parse a whole source file into raw statements.
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, ParseError> {
    let tokens = pytd_lexer::tokenize(source)?;
    let mut parser = Parser::new(source, tokens);
    parser.parse_module()
}

// ── Parser ─────────────────────────────────────────────────────────────

pub(crate) struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    index: LineIndex,
    depth: usize,
}

impl<'src> Parser<'src> {
    fn new(source: &'src str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            index: LineIndex::new(source),
            depth: 0,
        }
    }

    // ── Cursor helpers ─────────────────────────────────────────────────

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn nth_kind(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map_or(TokenKind::Eof, |t| t.kind)
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, expecting: &str) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(Some(expecting)))
        }
    }

    fn text(&self, tok: &Token) -> &'src str {
        &self.source[tok.span.start as usize..tok.span.end as usize]
    }

    fn line_of(&self, tok: &Token) -> u32 {
        self.index.line_col(tok.span.start).0
    }

    fn current_line(&self) -> u32 {
        self.index.line_col(self.current().span.start).0
    }

    /// A syntax error at the current token, with source excerpt.
    fn unexpected(&self, expecting: Option<&str>) -> ParseError {
        let tok = self.current();
        let mut message = format!("syntax error, unexpected {}", tok.kind.describe());
        if let Some(expecting) = expecting {
            message.push_str(&format!(", expecting {expecting}"));
        }
        self.error_at(message, tok.span.start)
    }

    fn error_at(&self, message: impl Into<String>, pos: u32) -> ParseError {
        let (line, column) = self.index.line_col(pos);
        let text = self.index.line_text(self.source, pos);
        ParseError::with_excerpt(message, line, text, column as usize)
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            let pos = self.current().span.start;
            Err(self.error_at("maximum nesting depth exceeded", pos))
        } else {
            Ok(())
        }
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ── Module level ───────────────────────────────────────────────────

    fn parse_module(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            match self.current().kind {
                TokenKind::Eof => break,
                TokenKind::String => {
                    // Module docstring.
                    self.advance();
                    self.expect(TokenKind::Newline, "NEWLINE")?;
                }
                TokenKind::Pass => {
                    self.advance();
                    self.expect(TokenKind::Newline, "NEWLINE")?;
                }
                TokenKind::TypeComment => {
                    self.attach_or_skip_type_comment(&mut stmts)?;
                }
                _ => stmts.push(self.parse_stmt()?),
            }
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let line = self.current_line();
        let kind = match self.current().kind {
            TokenKind::Import => self.parse_import()?,
            TokenKind::From => self.parse_from_import()?,
            TokenKind::Class => StmtKind::Class(self.parse_class()?),
            TokenKind::Def | TokenKind::At => StmtKind::Function(self.parse_funcdef()?),
            TokenKind::If => StmtKind::If(self.parse_if(Parser::parse_stmt_block_body)?),
            TokenKind::Ident => self.parse_name_stmt()?,
            _ => return Err(self.unexpected(None)),
        };
        Ok(Stmt { kind, line })
    }

    /// A standalone `# type:` comment line. It retypes an immediately
    /// preceding untyped `name = ...` constant; anywhere else it is dropped.
    fn attach_or_skip_type_comment(&mut self, stmts: &mut [Stmt]) -> Result<(), ParseError> {
        let tok = self.advance();
        let expr = self.type_comment_expr(&tok)?;
        self.expect(TokenKind::Newline, "NEWLINE")?;
        if let Some(expr) = expr {
            if let Some(Stmt {
                kind: StmtKind::Constant(constant),
                ..
            }) = stmts.last_mut()
            {
                if constant.ty == ConstantType::Any {
                    constant.ty = ConstantType::Expr(expr);
                }
            }
        }
        Ok(())
    }

    /// Parse the payload of a type comment token. `ignore` payloads yield
    /// `None`.
    fn type_comment_expr(&mut self, tok: &Token) -> Result<Option<TypeExpr>, ParseError> {
        let payload = self.text(tok);
        if payload == "ignore" {
            return Ok(None);
        }
        let tokens = pytd_lexer::tokenize_expression(payload, tok.span.start)?;
        let mut sub = Parser::new(self.source, tokens);
        let expr = sub.parse_type()?;
        if !sub.at(TokenKind::Eof) {
            return Err(sub.unexpected(None));
        }
        Ok(Some(expr))
    }

    fn parse_import(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(TokenKind::Import, "'import'")?;
        let mut modules = Vec::new();
        loop {
            let (name, _) = self.parse_dotted_name()?;
            if self.at(TokenKind::As) {
                let pos = self.current().span.start;
                return Err(self.error_at("Renaming of modules not supported", pos));
            }
            modules.push(name);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Newline, "NEWLINE")?;
        Ok(StmtKind::Import(modules))
    }

    fn parse_from_import(&mut self) -> Result<StmtKind, ParseError> {
        self.expect(TokenKind::From, "'from'")?;
        let (module, _) = self.parse_dotted_name()?;
        self.expect(TokenKind::Import, "'import'")?;
        let items = if self.eat(TokenKind::Star) {
            FromItems::Star
        } else {
            let parenthesized = self.eat(TokenKind::LParen);
            let mut names = Vec::new();
            loop {
                let name_tok = self.expect(TokenKind::Ident, "NAME")?;
                let member = self.text(&name_tok).to_string();
                let rename = if self.eat(TokenKind::As) {
                    let tok = self.expect(TokenKind::Ident, "NAME")?;
                    Some(self.text(&tok).to_string())
                } else {
                    None
                };
                names.push((member, rename));
                if !self.eat(TokenKind::Comma) {
                    break;
                }
                // Allow a trailing comma before the closing paren.
                if parenthesized && self.at(TokenKind::RParen) {
                    break;
                }
            }
            if parenthesized {
                self.expect(TokenKind::RParen, "')'")?;
            }
            FromItems::Names(names)
        };
        self.expect(TokenKind::Newline, "NEWLINE")?;
        Ok(StmtKind::FromImport { module, items })
    }

    /// A statement introduced by a name: a constant, alias, or TypeVar
    /// definition.
    fn parse_name_stmt(&mut self) -> Result<StmtKind, ParseError> {
        let line = self.current_line();
        let name_tok = self.expect(TokenKind::Ident, "NAME")?;
        let name = self.text(&name_tok).to_string();
        match self.current().kind {
            TokenKind::Colon => {
                let constant = self.parse_pep526_constant(name, line)?;
                Ok(StmtKind::Constant(constant))
            }
            TokenKind::Eq => {
                self.advance();
                // `name = TypeVar('name', ...)`.
                if self.at(TokenKind::Ident)
                    && self.text(self.current()) == "TypeVar"
                    && self.nth_kind(1) == TokenKind::LParen
                {
                    return self.parse_typevar(name);
                }
                // `name = Target` alias.
                if self.at(TokenKind::Ident)
                    && !matches!(self.text(self.current()), "True" | "False")
                {
                    let (target, _) = self.parse_dotted_name()?;
                    if self.at(TokenKind::LParen) {
                        return Err(self.unexpected(None));
                    }
                    self.expect(TokenKind::Newline, "NEWLINE")?;
                    return Ok(StmtKind::Alias { name, target });
                }
                let constant = self.parse_constant_rhs(name, line)?;
                Ok(StmtKind::Constant(constant))
            }
            _ => Err(self.unexpected(Some("':' or '='"))),
        }
    }

    /// `name : type [= ...]`.
    fn parse_pep526_constant(&mut self, name: String, line: u32) -> Result<ConstantDef, ParseError> {
        self.expect(TokenKind::Colon, "':'")?;
        let ty = self.parse_type()?;
        if self.eat(TokenKind::Eq) {
            self.expect(TokenKind::Ellipsis, "'...'")?;
        }
        self.expect(TokenKind::Newline, "NEWLINE")?;
        Ok(ConstantDef {
            name,
            ty: ConstantType::Expr(ty),
            line,
        })
    }

    /// The right-hand side of `name = ` when it is a literal value.
    fn parse_constant_rhs(&mut self, name: String, line: u32) -> Result<ConstantDef, ParseError> {
        let ty = match self.current().kind {
            TokenKind::Int => {
                let tok = self.advance();
                if self.text(&tok) != "0" {
                    return Err(ParseError::at_line("Only '0' allowed as int literal", line));
                }
                ConstantType::Int
            }
            TokenKind::Ident if matches!(self.text(self.current()), "True" | "False") => {
                self.advance();
                ConstantType::Bool
            }
            TokenKind::Ellipsis => {
                self.advance();
                if self.at(TokenKind::TypeComment) {
                    let tok = self.advance();
                    match self.type_comment_expr(&tok)? {
                        Some(expr) => ConstantType::Expr(expr),
                        None => ConstantType::Any,
                    }
                } else {
                    ConstantType::Any
                }
            }
            _ => return Err(self.unexpected(None)),
        };
        self.expect(TokenKind::Newline, "NEWLINE")?;
        Ok(ConstantDef { name, ty, line })
    }

    /// `name = TypeVar('name', constraint, ..., kw=value, ...)`.
    ///
    /// Keyword arguments are parsed and dropped; positional arguments after
    /// a keyword argument are rejected.
    fn parse_typevar(&mut self, name: String) -> Result<StmtKind, ParseError> {
        self.advance(); // TypeVar
        self.expect(TokenKind::LParen, "'('")?;
        let bound_tok = self.expect(TokenKind::String, "STRING")?;
        let bound = self.string_value(&bound_tok);
        let mut constraints = Vec::new();
        let mut saw_keyword = false;
        while self.eat(TokenKind::Comma) {
            if self.at(TokenKind::RParen) {
                break;
            }
            if self.at(TokenKind::Ident) && self.nth_kind(1) == TokenKind::Eq {
                // Keyword argument: parse and discard the value.
                self.advance();
                self.advance();
                self.parse_type()?;
                saw_keyword = true;
            } else {
                if saw_keyword {
                    return Err(self.unexpected(None));
                }
                constraints.push(self.parse_type()?);
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::Newline, "NEWLINE")?;
        Ok(StmtKind::TypeVarDef {
            name,
            bound,
            constraints,
        })
    }

    fn string_value(&self, tok: &Token) -> String {
        let raw = self.text(tok);
        let raw = raw
            .trim_start_matches("'''")
            .trim_end_matches("'''")
            .trim_start_matches("\"\"\"")
            .trim_end_matches("\"\"\"");
        raw.trim_matches(|c| c == '\'' || c == '"').to_string()
    }

    // ── Functions ──────────────────────────────────────────────────────

    fn parse_funcdef(&mut self) -> Result<FuncDef, ParseError> {
        let mut decorators = Vec::new();
        while self.at(TokenKind::At) {
            let line = self.current_line();
            self.advance();
            let (text, _) = self.parse_dotted_name()?;
            self.expect(TokenKind::Newline, "NEWLINE")?;
            decorators.push(Decorator { text, line });
        }
        let def_tok = self.expect(TokenKind::Def, "'def'")?;
        let line = self.line_of(&def_tok);
        let name_tok = self.expect(TokenKind::Ident, "NAME")?;
        let name = self.text(&name_tok).to_string();

        // `def foo PYTHONCODE` declares an externally implemented function.
        if self.at(TokenKind::Ident) && self.text(self.current()) == "PYTHONCODE" {
            self.advance();
            self.expect(TokenKind::Newline, "NEWLINE")?;
            return Ok(FuncDef {
                name,
                line,
                decorators,
                params: Vec::new(),
                ret: None,
                body: Vec::new(),
                is_external: true,
            });
        }

        let params = self.parse_params(line)?;
        let ret = if self.eat(TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_func_body()?;
        Ok(FuncDef {
            name,
            line,
            decorators,
            params,
            ret,
            body,
            is_external: false,
        })
    }

    fn parse_params(&mut self, def_line: u32) -> Result<Vec<RawParam>, ParseError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                params.push(self.parse_param()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
                if self.at(TokenKind::RParen) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        self.check_param_order(&params, def_line)?;
        Ok(params)
    }

    fn parse_param(&mut self) -> Result<RawParam, ParseError> {
        match self.current().kind {
            TokenKind::Ellipsis => {
                self.advance();
                Ok(RawParam {
                    name: String::new(),
                    kind: RawParamKind::EllipsisArgs,
                    ty: None,
                    default: None,
                })
            }
            TokenKind::Star => {
                self.advance();
                if self.at(TokenKind::Comma) || self.at(TokenKind::RParen) {
                    return Ok(RawParam {
                        name: String::new(),
                        kind: RawParamKind::BareStar,
                        ty: None,
                        default: None,
                    });
                }
                let name_tok = self.expect(TokenKind::Ident, "NAME")?;
                let name = self.text(&name_tok).to_string();
                let ty = if self.eat(TokenKind::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                Ok(RawParam {
                    name,
                    kind: RawParamKind::StarArgs,
                    ty,
                    default: None,
                })
            }
            TokenKind::StarStar => {
                self.advance();
                let name_tok = self.expect(TokenKind::Ident, "NAME")?;
                let name = self.text(&name_tok).to_string();
                let ty = if self.eat(TokenKind::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                Ok(RawParam {
                    name,
                    kind: RawParamKind::KwArgs,
                    ty,
                    default: None,
                })
            }
            TokenKind::Ident => {
                let name_tok = self.advance();
                let name = self.text(&name_tok).to_string();
                let ty = if self.eat(TokenKind::Colon) {
                    Some(self.parse_type()?)
                } else {
                    None
                };
                let default = if self.eat(TokenKind::Eq) {
                    Some(self.parse_default()?)
                } else {
                    None
                };
                Ok(RawParam {
                    name,
                    kind: RawParamKind::Normal,
                    ty,
                    default,
                })
            }
            _ => Err(self.unexpected(None)),
        }
    }

    fn parse_default(&mut self) -> Result<DefaultValue, ParseError> {
        match self.current().kind {
            TokenKind::Int => {
                self.advance();
                Ok(DefaultValue::Int)
            }
            TokenKind::Float => {
                self.advance();
                Ok(DefaultValue::Float)
            }
            TokenKind::Minus if self.nth_kind(1) == TokenKind::Int => {
                self.advance();
                self.advance();
                Ok(DefaultValue::Int)
            }
            TokenKind::Minus if self.nth_kind(1) == TokenKind::Float => {
                self.advance();
                self.advance();
                Ok(DefaultValue::Float)
            }
            TokenKind::Ellipsis => {
                self.advance();
                Ok(DefaultValue::Ellipsis)
            }
            TokenKind::Ident => {
                let text = self.text(self.current()).to_string();
                let (_, _) = self.parse_dotted_name()?;
                match text.as_str() {
                    "None" => Ok(DefaultValue::None),
                    "True" | "False" => Ok(DefaultValue::Bool),
                    _ => Ok(DefaultValue::Name),
                }
            }
            _ => Err(self.unexpected(None)),
        }
    }

    /// Structural rules for `*`, `**`, and `...` parameters. All of these
    /// errors are attributed to the `def` line.
    fn check_param_order(&self, params: &[RawParam], line: u32) -> Result<(), ParseError> {
        let mut saw_star = false;
        let mut saw_bare_star = false;
        let mut saw_kwargs = false;
        let mut saw_ellipsis = false;
        let mut named_after_bare_star = false;
        for param in params {
            if saw_ellipsis {
                return Err(ParseError::at_line(
                    "ellipsis (...) must be last parameter",
                    line,
                ));
            }
            match param.kind {
                RawParamKind::EllipsisArgs => {
                    if saw_bare_star {
                        return Err(ParseError::at_line(
                            "ellipsis (...) not compatible with bare *",
                            line,
                        ));
                    }
                    saw_ellipsis = true;
                }
                RawParamKind::BareStar | RawParamKind::StarArgs => {
                    if saw_kwargs {
                        return Err(ParseError::at_line("**x must be last parameter", line));
                    }
                    if saw_star {
                        return Err(ParseError::at_line("Unexpected second *", line));
                    }
                    saw_star = true;
                    saw_bare_star = param.kind == RawParamKind::BareStar;
                }
                RawParamKind::KwArgs => {
                    if saw_kwargs {
                        return Err(ParseError::at_line("**x must be last parameter", line));
                    }
                    saw_kwargs = true;
                }
                RawParamKind::Normal => {
                    if saw_kwargs {
                        return Err(ParseError::at_line("**x must be last parameter", line));
                    }
                    if saw_bare_star {
                        named_after_bare_star = true;
                    }
                }
            }
        }
        if saw_bare_star && !named_after_bare_star {
            return Err(ParseError::at_line(
                "Named arguments must follow bare *",
                line,
            ));
        }
        Ok(())
    }

    /// Everything after the signature: an inline empty body, an indented
    /// block of mutators and raises, or nothing at all.
    fn parse_func_body(&mut self) -> Result<Vec<BodyStmt>, ParseError> {
        if self.eat(TokenKind::Newline) {
            return Ok(Vec::new());
        }
        self.expect(TokenKind::Colon, "':'")?;
        if self.at(TokenKind::TypeComment) {
            let tok = self.advance();
            // Only `# type: ignore` means anything after a signature.
            let _ = self.type_comment_expr(&tok)?;
        }
        if self.at(TokenKind::Ellipsis) || self.at(TokenKind::Pass) || self.at(TokenKind::String) {
            self.advance();
            if self.at(TokenKind::TypeComment) {
                let tok = self.advance();
                let _ = self.type_comment_expr(&tok)?;
            }
            self.expect(TokenKind::Newline, "NEWLINE")?;
            return Ok(Vec::new());
        }
        self.expect(TokenKind::Newline, "NEWLINE")?;
        if !self.eat(TokenKind::Indent) {
            return Ok(Vec::new());
        }
        let mut body = Vec::new();
        while !self.at(TokenKind::Dedent) && !self.at(TokenKind::Eof) {
            match self.current().kind {
                TokenKind::Ellipsis | TokenKind::Pass | TokenKind::String => {
                    self.advance();
                    self.expect(TokenKind::Newline, "NEWLINE")?;
                }
                TokenKind::TypeComment => {
                    self.advance();
                    self.expect(TokenKind::Newline, "NEWLINE")?;
                }
                TokenKind::Raise => {
                    let line = self.current_line();
                    self.advance();
                    let (exception, _) = self.parse_dotted_name()?;
                    if self.eat(TokenKind::LParen) {
                        self.expect(TokenKind::RParen, "')'")?;
                    }
                    self.expect(TokenKind::Newline, "NEWLINE")?;
                    body.push(BodyStmt::Raise { exception, line });
                }
                TokenKind::Ident if self.nth_kind(1) == TokenKind::ColonEq => {
                    let line = self.current_line();
                    let name_tok = self.advance();
                    let name = self.text(&name_tok).to_string();
                    self.advance(); // :=
                    let ty = self.parse_type()?;
                    self.expect(TokenKind::Newline, "NEWLINE")?;
                    body.push(BodyStmt::Mutator { name, ty, line });
                }
                _ => return Err(self.unexpected(None)),
            }
        }
        self.eat(TokenKind::Dedent);
        Ok(body)
    }

    // ── Classes ────────────────────────────────────────────────────────

    fn parse_class(&mut self) -> Result<ClassDef, ParseError> {
        let class_tok = self.expect(TokenKind::Class, "'class'")?;
        let line = self.line_of(&class_tok);
        let name_tok = self.expect(TokenKind::Ident, "NAME")?;
        let name = self.text(&name_tok).to_string();

        let mut parents = Vec::new();
        let mut metaclass = None;
        if self.eat(TokenKind::LParen) {
            while !self.at(TokenKind::RParen) {
                if self.at(TokenKind::Ident) && self.nth_kind(1) == TokenKind::Eq {
                    let kw_tok = self.advance();
                    let keyword = self.text(&kw_tok).to_string();
                    self.advance(); // =
                    let value = self.parse_type()?;
                    if keyword != "metaclass" {
                        return Err(ParseError::at_line(
                            "Only 'metaclass' allowed as classdef kwarg",
                            line,
                        ));
                    }
                    metaclass = Some(value);
                    if self.eat(TokenKind::Comma) && !self.at(TokenKind::RParen) {
                        return Err(ParseError::at_line(
                            "metaclass must be last argument",
                            line,
                        ));
                    }
                    break;
                }
                parents.push(self.parse_type()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
        }
        self.expect(TokenKind::Colon, "':'")?;

        let mut body = Vec::new();
        if self.at(TokenKind::Ellipsis) || self.at(TokenKind::Pass) {
            self.advance();
            self.expect(TokenKind::Newline, "NEWLINE")?;
        } else {
            self.expect(TokenKind::Newline, "NEWLINE")?;
            if self.eat(TokenKind::Indent) {
                body = self.parse_class_block_body()?;
                self.eat(TokenKind::Dedent);
            }
        }
        Ok(ClassDef {
            name,
            line,
            parents,
            metaclass,
            body,
        })
    }

    /// One statement inside a class body. Returns `None` for statements
    /// that leave no declaration (docstrings, `pass`, type comments).
    fn parse_class_stmt(
        &mut self,
        previous: &mut [ClassStmt],
    ) -> Result<Option<ClassStmt>, ParseError> {
        match self.current().kind {
            TokenKind::String | TokenKind::Pass | TokenKind::Ellipsis => {
                self.advance();
                self.expect(TokenKind::Newline, "NEWLINE")?;
                Ok(None)
            }
            TokenKind::TypeComment => {
                let tok = self.advance();
                let expr = self.type_comment_expr(&tok)?;
                self.expect(TokenKind::Newline, "NEWLINE")?;
                if let Some(expr) = expr {
                    if let Some(ClassStmt::Constant(constant)) = previous.last_mut() {
                        if constant.ty == ConstantType::Any {
                            constant.ty = ConstantType::Expr(expr);
                        }
                    }
                }
                Ok(None)
            }
            TokenKind::Def | TokenKind::At => {
                Ok(Some(ClassStmt::Function(self.parse_funcdef()?)))
            }
            TokenKind::If => {
                let block = self.parse_if(Parser::parse_class_block_body)?;
                Ok(Some(ClassStmt::If(block)))
            }
            TokenKind::Ident => {
                let line = self.current_line();
                let name_tok = self.advance();
                let name = self.text(&name_tok).to_string();
                match self.current().kind {
                    TokenKind::Colon => {
                        let constant = self.parse_pep526_constant(name, line)?;
                        Ok(Some(ClassStmt::Constant(constant)))
                    }
                    TokenKind::Eq => {
                        self.advance();
                        if self.at(TokenKind::Ident)
                            && !matches!(self.text(self.current()), "True" | "False")
                        {
                            let target_tok = self.advance();
                            let target = self.text(&target_tok).to_string();
                            if self.at(TokenKind::LParen) {
                                // Calls (TypeVar and friends) have no
                                // meaning inside a class body.
                                return Err(self.unexpected(None));
                            }
                            self.expect(TokenKind::Newline, "NEWLINE")?;
                            return Ok(Some(ClassStmt::NameAlias { name, target, line }));
                        }
                        let constant = self.parse_constant_rhs(name, line)?;
                        Ok(Some(ClassStmt::Constant(constant)))
                    }
                    _ => Err(self.unexpected(Some("':' or '='"))),
                }
            }
            _ => Err(self.unexpected(None)),
        }
    }

    // ── If blocks ──────────────────────────────────────────────────────

    fn parse_if<T>(
        &mut self,
        parse_body: fn(&mut Self) -> Result<Vec<T>, ParseError>,
    ) -> Result<IfBlock<T>, ParseError> {
        self.enter()?;
        let if_tok = self.expect(TokenKind::If, "'if'")?;
        let line = self.line_of(&if_tok);
        let mut branches = Vec::new();

        let cond = self.parse_condition(line)?;
        let body = self.parse_branch_body(parse_body)?;
        branches.push((Some(cond), body));

        loop {
            if self.at(TokenKind::Elif) {
                let elif_line = self.current_line();
                self.advance();
                let cond = self.parse_condition(elif_line)?;
                let body = self.parse_branch_body(parse_body)?;
                branches.push((Some(cond), body));
            } else if self.at(TokenKind::Else) {
                self.advance();
                let body = self.parse_branch_body(parse_body)?;
                branches.push((None, body));
                break;
            } else {
                break;
            }
        }
        self.leave();
        Ok(IfBlock { branches, line })
    }

    fn parse_branch_body<T>(
        &mut self,
        parse_body: fn(&mut Self) -> Result<Vec<T>, ParseError>,
    ) -> Result<Vec<T>, ParseError> {
        self.expect(TokenKind::Colon, "':'")?;
        self.expect(TokenKind::Newline, "NEWLINE")?;
        self.expect(TokenKind::Indent, "INDENT")?;
        let body = parse_body(self)?;
        self.eat(TokenKind::Dedent);
        Ok(body)
    }

    /// Statements until the end of an indented block, module context.
    fn parse_stmt_block_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while !self.at(TokenKind::Dedent) && !self.at(TokenKind::Eof) {
            match self.current().kind {
                TokenKind::String | TokenKind::Pass => {
                    self.advance();
                    self.expect(TokenKind::Newline, "NEWLINE")?;
                }
                TokenKind::TypeComment => {
                    self.attach_or_skip_type_comment(&mut stmts)?;
                }
                _ => stmts.push(self.parse_stmt()?),
            }
        }
        Ok(stmts)
    }

    /// Statements until the end of an indented block, class context.
    fn parse_class_block_body(&mut self) -> Result<Vec<ClassStmt>, ParseError> {
        let mut body = Vec::new();
        while !self.at(TokenKind::Dedent) && !self.at(TokenKind::Eof) {
            if let Some(stmt) = self.parse_class_stmt(&mut body)? {
                body.push(stmt);
            }
        }
        Ok(body)
    }

    // ── Conditions ─────────────────────────────────────────────────────

    /// `cond or cond or ...` with parenthesized grouping.
    fn parse_condition(&mut self, line: u32) -> Result<CondExpr, ParseError> {
        self.enter()?;
        let first = self.parse_condition_primary(line)?;
        let mut rest = Vec::new();
        while self.eat(TokenKind::Or) {
            rest.push(self.parse_condition_primary(line)?);
        }
        self.leave();
        if rest.is_empty() {
            Ok(first)
        } else {
            rest.insert(0, first);
            Ok(CondExpr::Or(rest))
        }
    }

    fn parse_condition_primary(&mut self, line: u32) -> Result<CondExpr, ParseError> {
        if self.eat(TokenKind::LParen) {
            let inner = self.parse_condition(line)?;
            self.expect(TokenKind::RParen, "')'")?;
            return Ok(inner);
        }
        let (target, _) = self.parse_dotted_name()?;
        let index = if self.eat(TokenKind::LBracket) {
            Some(self.parse_cond_index()?)
        } else {
            None
        };
        let op = match self.current().kind {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::NotEq => CmpOp::Ne,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::LtEq => CmpOp::Le,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::GtEq => CmpOp::Ge,
            _ => return Err(self.unexpected(Some("a comparison operator"))),
        };
        self.advance();
        let value = self.parse_cond_value()?;
        Ok(CondExpr::Cmp(Comparison {
            target,
            index,
            op,
            value,
            line,
        }))
    }

    fn parse_cond_index(&mut self) -> Result<CondIndex, ParseError> {
        let start = self.parse_opt_int()?;
        if self.eat(TokenKind::RBracket) {
            return match start {
                Some(i) => Ok(CondIndex::Index(i)),
                None => Err(self.unexpected(None)),
            };
        }
        self.expect(TokenKind::Colon, "':'")?;
        let stop = self.parse_opt_int()?;
        let step = if self.eat(TokenKind::Colon) {
            self.parse_opt_int()?
        } else {
            None
        };
        self.expect(TokenKind::RBracket, "']'")?;
        Ok(CondIndex::Slice { start, stop, step })
    }

    fn parse_opt_int(&mut self) -> Result<Option<i64>, ParseError> {
        let negative = self.at(TokenKind::Minus);
        if negative {
            self.advance();
        }
        if self.at(TokenKind::Int) {
            let tok = self.advance();
            let value: i64 = self
                .text(&tok)
                .parse()
                .map_err(|_| self.error_at("integer literal out of range", tok.span.start))?;
            Ok(Some(if negative { -value } else { value }))
        } else if negative {
            Err(self.unexpected(Some("NUMBER")))
        } else {
            Ok(None)
        }
    }

    fn parse_cond_value(&mut self) -> Result<CondValue, ParseError> {
        match self.current().kind {
            TokenKind::Minus | TokenKind::Int => {
                let value = self.parse_opt_int()?.ok_or_else(|| self.unexpected(None))?;
                Ok(CondValue::Int(value))
            }
            TokenKind::Float => {
                self.advance();
                Ok(CondValue::Float)
            }
            TokenKind::String => {
                let tok = self.advance();
                Ok(CondValue::Str(self.string_value(&tok)))
            }
            TokenKind::LParen => {
                self.advance();
                let mut elements = Vec::new();
                while !self.at(TokenKind::RParen) {
                    elements.push(self.parse_cond_value()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RParen, "')'")?;
                Ok(CondValue::Tuple(elements))
            }
            _ => Err(self.unexpected(None)),
        }
    }

    // ── Type expressions ───────────────────────────────────────────────

    pub(crate) fn parse_type(&mut self) -> Result<TypeExpr, ParseError> {
        self.enter()?;
        let first = self.parse_type_atom()?;
        let mut rest = Vec::new();
        while self.eat(TokenKind::Or) {
            rest.push(self.parse_type_atom()?);
        }
        self.leave();
        if rest.is_empty() {
            Ok(first)
        } else {
            rest.insert(0, first);
            Ok(TypeExpr::Union(rest))
        }
    }

    fn parse_type_atom(&mut self) -> Result<TypeExpr, ParseError> {
        match self.current().kind {
            TokenKind::Question => {
                self.advance();
                Ok(TypeExpr::Anything)
            }
            TokenKind::Ellipsis => {
                self.advance();
                Ok(TypeExpr::Ellipsis)
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_type()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elements = Vec::new();
                while !self.at(TokenKind::RBracket) {
                    elements.push(self.parse_type()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, "']'")?;
                Ok(TypeExpr::Tuple(elements))
            }
            TokenKind::Ident => {
                let (name, _) = self.parse_dotted_name()?;
                if name == "NamedTuple" && self.at(TokenKind::LParen) {
                    return self.parse_named_tuple();
                }
                if self.eat(TokenKind::LBracket) {
                    let mut params = Vec::new();
                    while !self.at(TokenKind::RBracket) {
                        params.push(self.parse_type()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RBracket, "']'")?;
                    return Ok(TypeExpr::Parametrized { base: name, params });
                }
                Ok(TypeExpr::Name(name))
            }
            _ => Err(self.unexpected(None)),
        }
    }

    /// `NamedTuple(name, [(field, type), ...])`, trailing commas allowed
    /// everywhere. Tuple and field names may be bare or quoted.
    fn parse_named_tuple(&mut self) -> Result<TypeExpr, ParseError> {
        self.expect(TokenKind::LParen, "'('")?;
        let name = self.parse_named_tuple_label()?;
        self.expect(TokenKind::Comma, "','")?;
        self.expect(TokenKind::LBracket, "'['")?;
        let mut fields = Vec::new();
        while self.at(TokenKind::LParen) {
            self.advance();
            let field = self.parse_named_tuple_label()?;
            self.expect(TokenKind::Comma, "','")?;
            let ty = self.parse_type()?;
            self.eat(TokenKind::Comma);
            self.expect(TokenKind::RParen, "')'")?;
            fields.push((field, ty));
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBracket, "']'")?;
        self.eat(TokenKind::Comma);
        self.expect(TokenKind::RParen, "')'")?;
        Ok(TypeExpr::NamedTuple { name, fields })
    }

    fn parse_named_tuple_label(&mut self) -> Result<String, ParseError> {
        match self.current().kind {
            TokenKind::String => {
                let tok = self.advance();
                Ok(self.string_value(&tok))
            }
            TokenKind::Ident => {
                let tok = self.advance();
                Ok(self.text(&tok).to_string())
            }
            _ => Err(self.unexpected(Some("NAME or STRING"))),
        }
    }

    fn parse_dotted_name(&mut self) -> Result<(String, u32), ParseError> {
        let first = self.expect(TokenKind::Ident, "NAME")?;
        let line = self.line_of(&first);
        let mut name = self.text(&first).to_string();
        while self.at(TokenKind::Dot) {
            self.advance();
            let part = self.expect(TokenKind::Ident, "NAME")?;
            name.push('.');
            name.push_str(self.text(&part));
        }
        Ok((name, line))
    }
}
