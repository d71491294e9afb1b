//! Tokenizer for the pytd stub language.
//!
//! The lexer is indentation-aware: at the start of each logical line it
//! compares the leading whitespace against an indent stack and emits
//! [`TokenKind::Indent`] / [`TokenKind::Dedent`] tokens, Python-style.
//! Newlines and indentation are suppressed inside `(...)` and `[...]`.
//!
//! Two dialect quirks live here rather than in the grammar:
//!
//! * `# type: <payload>` comments become [`TokenKind::TypeComment`] tokens
//!   whose span covers the payload; all other comments are discarded.
//! * Backtick-quoted names (`` `foo~1` ``) lex as a single [`TokenKind::Ident`]
//!   whose text keeps the backticks, so printed output re-lexes unchanged.
//!
//! Lexing is fail-fast: the first bad character or inconsistent dedent
//! aborts with a [`ParseError`] carrying the offending line and column.

mod cursor;
pub mod token;

use pytd_common::span::LineIndex;
use pytd_common::ParseError;

use crate::cursor::Cursor;
pub use crate::token::{keyword_from_str, Token, TokenKind};

/// Tokenize a complete pytd source file.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source, Mode::Module).run()
}

/// Tokenize a bare type expression, e.g. the payload of a `# type:` comment.
///
/// No indentation or newline tokens are produced; `offset` shifts all spans
/// so they point back into the file the expression was sliced from. The
/// token stream ends with a single [`TokenKind::Eof`].
pub fn tokenize_expression(source: &str, offset: u32) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Lexer::new(source, Mode::Expression).run()?;
    for tok in &mut tokens {
        tok.span.start += offset;
        tok.span.end += offset;
    }
    Ok(tokens)
}

/// What the lexer is tokenizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// A whole file: layout tokens are emitted.
    Module,
    /// A single expression: newlines are whitespace, no layout tokens.
    Expression,
}

struct Lexer<'src> {
    source: &'src str,
    cursor: Cursor<'src>,
    tokens: Vec<Token>,
    mode: Mode,
    /// Indentation stack of column widths. Always starts with 0.
    indents: Vec<u32>,
    /// Nesting depth of `(` and `[`; newlines are suppressed when nonzero.
    depth: u32,
}

impl<'src> Lexer<'src> {
    fn new(source: &'src str, mode: Mode) -> Self {
        Self {
            source,
            cursor: Cursor::new(source),
            tokens: Vec::new(),
            mode,
            indents: vec![0],
            depth: 0,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        if self.mode == Mode::Expression {
            return self.run_expression();
        }
        'lines: while self.start_of_line()? {
            loop {
                self.skip_inline_space();
                match self.cursor.peek() {
                    None => {
                        self.push_here(TokenKind::Newline);
                        break 'lines;
                    }
                    Some('\n') => {
                        if self.depth == 0 {
                            self.push_here(TokenKind::Newline);
                            self.cursor.advance();
                            continue 'lines;
                        }
                        self.cursor.advance();
                    }
                    Some('#') => {
                        self.lex_comment();
                    }
                    Some(ch) => self.lex_token(ch)?,
                }
            }
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push_here(TokenKind::Dedent);
        }
        self.push_here(TokenKind::Eof);
        Ok(self.tokens)
    }

    fn run_expression(mut self) -> Result<Vec<Token>, ParseError> {
        loop {
            self.skip_inline_space();
            match self.cursor.peek() {
                None => break,
                Some('\n') | Some('#') => {
                    self.cursor.eat_while(|c| c != '\n');
                    self.cursor.advance();
                }
                Some(ch) => self.lex_token(ch)?,
            }
        }
        self.push_here(TokenKind::Eof);
        Ok(self.tokens)
    }

    // ── Line starts and indentation ────────────────────────────────────

    /// Position the lexer at the first significant token of the next logical
    /// line, emitting Indent/Dedent tokens as the indentation changes.
    /// Blank and comment-only lines are consumed here; standalone `# type:`
    /// comments still produce a TypeComment + Newline pair. Returns `false`
    /// at end of input.
    fn start_of_line(&mut self) -> Result<bool, ParseError> {
        loop {
            if self.cursor.is_eof() {
                return Ok(false);
            }
            let width = self.measure_indent();
            match self.cursor.peek() {
                None => return Ok(false),
                Some('\n') => {
                    // Blank line.
                    self.cursor.advance();
                    continue;
                }
                Some('#') => {
                    let was_type = self.lex_comment();
                    if was_type {
                        self.push_here(TokenKind::Newline);
                    }
                    if self.cursor.peek() == Some('\n') {
                        self.cursor.advance();
                    }
                    continue;
                }
                Some(_) => {
                    self.apply_indent(width)?;
                    return Ok(true);
                }
            }
        }
    }

    /// Consume leading whitespace of the current line and return its column
    /// width. Tabs advance to the next multiple of eight.
    fn measure_indent(&mut self) -> u32 {
        let mut width = 0u32;
        while let Some(ch) = self.cursor.peek() {
            match ch {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                _ => break,
            }
            self.cursor.advance();
        }
        width
    }

    fn apply_indent(&mut self, width: u32) -> Result<(), ParseError> {
        let current = *self.indents.last().unwrap_or(&0);
        if width > current {
            self.indents.push(width);
            self.push_here(TokenKind::Indent);
        } else if width < current {
            while self.indents.len() > 1 && self.indents.last().copied().unwrap_or(0) > width {
                self.indents.pop();
                self.push_here(TokenKind::Dedent);
            }
            if self.indents.last().copied().unwrap_or(0) != width {
                return Err(self.error_at("Invalid indentation", self.cursor.pos()));
            }
        }
        Ok(())
    }

    // ── Token scanning ─────────────────────────────────────────────────

    fn lex_token(&mut self, ch: char) -> Result<(), ParseError> {
        let start = self.cursor.pos();
        match ch {
            c if c.is_ascii_alphabetic() || c == '_' => self.lex_ident(start),
            c if c.is_ascii_digit() => self.lex_number(start),
            '`' => self.lex_backtick_name(start)?,
            '\'' | '"' => self.lex_string(start, ch)?,
            '.' => {
                self.cursor.advance();
                if self.cursor.peek() == Some('.') && self.cursor.peek_next() == Some('.') {
                    self.cursor.advance();
                    self.cursor.advance();
                    self.push(TokenKind::Ellipsis, start);
                } else {
                    self.push(TokenKind::Dot, start);
                }
            }
            '-' => {
                self.cursor.advance();
                if self.cursor.peek() == Some('>') {
                    self.cursor.advance();
                    self.push(TokenKind::Arrow, start);
                } else {
                    self.push(TokenKind::Minus, start);
                }
            }
            ':' => {
                self.cursor.advance();
                if self.cursor.peek() == Some('=') {
                    self.cursor.advance();
                    self.push(TokenKind::ColonEq, start);
                } else {
                    self.push(TokenKind::Colon, start);
                }
            }
            '=' => {
                self.cursor.advance();
                if self.cursor.peek() == Some('=') {
                    self.cursor.advance();
                    self.push(TokenKind::EqEq, start);
                } else {
                    self.push(TokenKind::Eq, start);
                }
            }
            '!' => {
                self.cursor.advance();
                if self.cursor.peek() == Some('=') {
                    self.cursor.advance();
                    self.push(TokenKind::NotEq, start);
                } else {
                    return Err(self.error_at("Illegal character '!'", start));
                }
            }
            '<' => {
                self.cursor.advance();
                if self.cursor.peek() == Some('=') {
                    self.cursor.advance();
                    self.push(TokenKind::LtEq, start);
                } else {
                    self.push(TokenKind::Lt, start);
                }
            }
            '>' => {
                self.cursor.advance();
                if self.cursor.peek() == Some('=') {
                    self.cursor.advance();
                    self.push(TokenKind::GtEq, start);
                } else {
                    self.push(TokenKind::Gt, start);
                }
            }
            '*' => {
                self.cursor.advance();
                if self.cursor.peek() == Some('*') {
                    self.cursor.advance();
                    self.push(TokenKind::StarStar, start);
                } else {
                    self.push(TokenKind::Star, start);
                }
            }
            '?' => {
                self.cursor.advance();
                self.push(TokenKind::Question, start);
            }
            '@' => {
                self.cursor.advance();
                self.push(TokenKind::At, start);
            }
            ',' => {
                self.cursor.advance();
                self.push(TokenKind::Comma, start);
            }
            '(' => {
                self.cursor.advance();
                self.depth += 1;
                self.push(TokenKind::LParen, start);
            }
            ')' => {
                self.cursor.advance();
                self.depth = self.depth.saturating_sub(1);
                self.push(TokenKind::RParen, start);
            }
            '[' => {
                self.cursor.advance();
                self.depth += 1;
                self.push(TokenKind::LBracket, start);
            }
            ']' => {
                self.cursor.advance();
                self.depth = self.depth.saturating_sub(1);
                self.push(TokenKind::RBracket, start);
            }
            '\\' if self.cursor.peek_next() == Some('\n') => {
                // Explicit line continuation.
                self.cursor.advance();
                self.cursor.advance();
            }
            c => {
                return Err(self.error_at(format!("Illegal character '{c}'"), start));
            }
        }
        Ok(())
    }

    fn lex_ident(&mut self, start: u32) {
        self.cursor
            .eat_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let text = self.cursor.slice(start, self.cursor.pos());
        let kind = keyword_from_str(text).unwrap_or(TokenKind::Ident);
        self.push(kind, start);
    }

    fn lex_number(&mut self, start: u32) {
        self.cursor.eat_while(|c| c.is_ascii_digit());
        let mut kind = TokenKind::Int;
        if self.cursor.peek() == Some('.')
            && self.cursor.peek_next().is_some_and(|c| c.is_ascii_digit())
        {
            self.cursor.advance();
            self.cursor.eat_while(|c| c.is_ascii_digit());
            kind = TokenKind::Float;
        }
        self.push(kind, start);
    }

    /// Backtick-quoted name. The backticks stay part of the token text so
    /// names like `` `foo~1` `` survive a print/re-parse round trip.
    fn lex_backtick_name(&mut self, start: u32) -> Result<(), ParseError> {
        self.cursor.advance();
        self.cursor.eat_while(|c| c != '`' && c != '\n');
        if self.cursor.peek() != Some('`') {
            return Err(self.error_at("Illegal character '`'", start));
        }
        self.cursor.advance();
        self.push(TokenKind::Ident, start);
        Ok(())
    }

    fn lex_string(&mut self, start: u32, quote: char) -> Result<(), ParseError> {
        self.cursor.advance();
        let triple = self.cursor.peek() == Some(quote) && self.cursor.peek_next() == Some(quote);
        if triple {
            self.cursor.advance();
            self.cursor.advance();
            loop {
                match self.cursor.peek() {
                    None => return Err(self.error_at(format!("Illegal character '{quote}'"), start)),
                    Some(c) if c == quote
                        && self.cursor.peek_next() == Some(quote)
                        && self.cursor.peek_nth(2) == Some(quote) =>
                    {
                        self.cursor.advance();
                        self.cursor.advance();
                        self.cursor.advance();
                        break;
                    }
                    Some(_) => {
                        self.cursor.advance();
                    }
                }
            }
        } else {
            loop {
                match self.cursor.peek() {
                    None | Some('\n') => {
                        return Err(self.error_at(format!("Illegal character '{quote}'"), start))
                    }
                    Some(c) if c == quote => {
                        self.cursor.advance();
                        break;
                    }
                    Some(_) => {
                        self.cursor.advance();
                    }
                }
            }
        }
        self.push(TokenKind::String, start);
        Ok(())
    }

    /// Consume a comment. Emits a TypeComment token and returns `true` when
    /// the comment has the form `# type: <payload>`; plain comments are
    /// discarded and `false` is returned.
    fn lex_comment(&mut self) -> bool {
        let hash = self.cursor.pos();
        self.cursor.eat_while(|c| c != '\n');
        let text = self.cursor.slice(hash, self.cursor.pos());
        let body = text[1..].trim_start();
        if let Some(payload) = body.strip_prefix("type:") {
            let payload = payload.trim();
            if !payload.is_empty() {
                // Span of the payload inside the comment.
                let rel = text.rfind(payload).unwrap_or(0) as u32;
                self.tokens.push(Token::new(
                    TokenKind::TypeComment,
                    hash + rel,
                    hash + rel + payload.len() as u32,
                ));
                return true;
            }
        }
        false
    }

    // ── Helpers ────────────────────────────────────────────────────────

    fn skip_inline_space(&mut self) {
        loop {
            match self.cursor.peek() {
                Some(' ') | Some('\t') | Some('\r') => {
                    self.cursor.advance();
                }
                Some('\\') if self.cursor.peek_next() == Some('\n') => {
                    self.cursor.advance();
                    self.cursor.advance();
                }
                _ => break,
            }
        }
    }

    fn push(&mut self, kind: TokenKind, start: u32) {
        self.tokens.push(Token::new(kind, start, self.cursor.pos()));
    }

    fn push_here(&mut self, kind: TokenKind) {
        let pos = self.cursor.pos();
        self.tokens.push(Token::new(kind, pos, pos));
    }

    fn error_at(&self, message: impl Into<String>, pos: u32) -> ParseError {
        let index = LineIndex::new(self.source);
        let (line, column) = index.line_col(pos);
        let text = index.line_text(self.source, pos);
        ParseError::with_excerpt(message, line, text, column as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .expect("lexing should succeed")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn texts(source: &str) -> Vec<(TokenKind, String)> {
        tokenize(source)
            .expect("lexing should succeed")
            .into_iter()
            .map(|t| {
                (
                    t.kind,
                    source[t.span.start as usize..t.span.end as usize].to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn simple_constant() {
        use TokenKind::*;
        assert_eq!(
            kinds("x = 0\n"),
            vec![Ident, Eq, Int, Newline, Eof]
        );
    }

    #[test]
    fn def_with_layout() {
        use TokenKind::*;
        let src = "class A:\n    def foo() -> int: ...\n";
        assert_eq!(
            kinds(src),
            vec![
                Class, Ident, Colon, Newline, Indent, Def, Ident, LParen, RParen,
                Arrow, Ident, Colon, Ellipsis, Newline, Dedent, Eof
            ]
        );
    }

    #[test]
    fn newline_suppressed_in_brackets() {
        use TokenKind::*;
        let src = "x = ...\ndef f(\n    a: int,\n) -> int: ...\n";
        let got = kinds(src);
        assert!(!got.contains(&Indent));
        assert_eq!(got.iter().filter(|k| **k == Newline).count(), 2);
    }

    #[test]
    fn blank_and_comment_lines_skipped() {
        use TokenKind::*;
        let src = "x = 0\n\n# a comment\ny = 0\n";
        assert_eq!(
            kinds(src),
            vec![Ident, Eq, Int, Newline, Ident, Eq, Int, Newline, Eof]
        );
    }

    #[test]
    fn type_comment_trailing() {
        let src = "x = ...  # type: int\n";
        let toks = texts(src);
        assert_eq!(
            toks[3],
            (TokenKind::TypeComment, "int".to_string())
        );
        assert_eq!(toks[4].0, TokenKind::Newline);
    }

    #[test]
    fn type_comment_standalone_line() {
        use TokenKind::*;
        let src = "a = ...\n# type: int\n";
        assert_eq!(
            kinds(src),
            vec![Ident, Eq, Ellipsis, Newline, TypeComment, Newline, Eof]
        );
    }

    #[test]
    fn backtick_name_keeps_backticks() {
        let src = "x = ...  # type: `foo~1`\n";
        let toks = texts(src);
        let ident = toks
            .iter()
            .find(|(k, _)| *k == TokenKind::TypeComment)
            .unwrap();
        assert_eq!(ident.1, "`foo~1`");
        let expr = tokenize_expression("`foo~1`", 0).unwrap();
        assert_eq!(expr[0].kind, TokenKind::Ident);
    }

    #[test]
    fn multi_char_operators() {
        use TokenKind::*;
        let expr = tokenize_expression("-> := ... == != <= >= ** < >", 0).unwrap();
        let got: Vec<TokenKind> = expr.into_iter().map(|t| t.kind).collect();
        assert_eq!(
            got,
            vec![Arrow, ColonEq, Ellipsis, EqEq, NotEq, LtEq, GtEq, StarStar, Lt, Gt, Eof]
        );
    }

    #[test]
    fn expression_offset_shifts_spans() {
        let toks = tokenize_expression("int", 10).unwrap();
        assert_eq!(toks[0].span.start, 10);
        assert_eq!(toks[0].span.end, 13);
    }

    #[test]
    fn dedent_to_unknown_level_fails() {
        let src = "class A:\n    def f() -> int: ...\n  x = 0\n";
        let err = tokenize(src).unwrap_err();
        assert_eq!(err.message, "Invalid indentation");
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn illegal_character_reports_position() {
        let src = "x = 0\ny = ^\n";
        let err = tokenize(src).unwrap_err();
        assert_eq!(err.message, "Illegal character '^'");
        assert_eq!(err.line, Some(2));
        assert_eq!(err.text.as_deref(), Some("y = ^"));
        assert_eq!(err.column, Some(5));
    }

    #[test]
    fn docstring_lexes_as_string() {
        use TokenKind::*;
        let src = "def f() -> int:\n    \"\"\"doc\nstring\"\"\"\n";
        let got = kinds(src);
        assert!(got.contains(&String));
    }

    #[test]
    fn missing_final_newline_still_terminates() {
        use TokenKind::*;
        assert_eq!(kinds("x = 0"), vec![Ident, Eq, Int, Newline, Eof]);
    }

    #[test]
    fn keywords_versus_idents() {
        use TokenKind::*;
        let toks = tokenize_expression("if else elif nothing or NamedTuple", 0).unwrap();
        let got: Vec<TokenKind> = toks.into_iter().map(|t| t.kind).collect();
        assert_eq!(got, vec![If, Else, Elif, Ident, Or, Ident, Eof]);
    }

    #[test]
    fn snapshot_conditional_constant() {
        let src = "if sys.platform == 'linux':\n    x = ...  # type: int\n";
        let dump: Vec<String> = tokenize(src)
            .expect("lexing should succeed")
            .into_iter()
            .map(|t| format!("{:?}", t.kind))
            .collect();
        insta::assert_snapshot!(dump.join("\n"), @r"
        If
        Ident
        Dot
        Ident
        EqEq
        String
        Colon
        Newline
        Indent
        Ident
        Eq
        Ellipsis
        TypeComment
        Newline
        Dedent
        Eof
        ");
    }
}
