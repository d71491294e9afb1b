use serde::Serialize;

use pytd_common::span::Span;

/// A token produced by the pytd lexer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    /// Create a new token from a kind and byte offsets.
    pub fn new(kind: TokenKind, start: u32, end: u32) -> Self {
        Self {
            kind,
            span: Span::new(start, end),
        }
    }
}

/// Every kind of token in the pytd stub language.
///
/// `NamedTuple`, `TypeVar`, `nothing`, `True`, `False`, and `PYTHONCODE` are
/// deliberately NOT keywords: they lex as `Ident` and the grammar recognizes
/// them by text where the dialect gives them meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    // ── Keywords (11) ──────────────────────────────────────────────────
    As,
    Class,
    Def,
    Elif,
    Else,
    From,
    If,
    Import,
    Or,
    Pass,
    Raise,

    // ── Operators and punctuation ──────────────────────────────────────
    /// `->`
    Arrow,
    /// `:=` (signature-body mutator)
    ColonEq,
    /// `...`
    Ellipsis,
    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `=`
    Eq,
    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    LtEq,
    /// `>=`
    GtEq,
    /// `-` (only meaningful in negative slice/index literals)
    Minus,
    /// `*`
    Star,
    /// `**`
    StarStar,
    /// `?` (the open/"any" type)
    Question,
    /// `@` (decorator introducer)
    At,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,

    // ── Literals ───────────────────────────────────────────────────────
    /// Integer literal, e.g. `0`, `27`.
    Int,
    /// Floating-point literal, e.g. `12.3`.
    Float,
    /// String literal (single-, double-, or triple-quoted).
    String,

    // ── Identifiers and comments ───────────────────────────────────────
    /// Identifier, including backtick-quoted names (`` `foo~1` ``), whose
    /// text keeps the backticks verbatim.
    Ident,
    /// The payload of a `# type: ...` comment (span covers the payload only).
    TypeComment,

    // ── Layout ─────────────────────────────────────────────────────────
    /// End of a logical line (suppressed inside brackets).
    Newline,
    /// Indentation increased at the start of a logical line.
    Indent,
    /// Indentation decreased at the start of a logical line.
    Dedent,
    /// End of file.
    Eof,
}

/// Look up a keyword from its string representation.
///
/// Returns `Some(TokenKind)` if the string is a pytd keyword, `None`
/// otherwise. The lexer calls this after scanning an identifier-shaped token.
pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
    match s {
        "as" => Some(TokenKind::As),
        "class" => Some(TokenKind::Class),
        "def" => Some(TokenKind::Def),
        "elif" => Some(TokenKind::Elif),
        "else" => Some(TokenKind::Else),
        "from" => Some(TokenKind::From),
        "if" => Some(TokenKind::If),
        "import" => Some(TokenKind::Import),
        "or" => Some(TokenKind::Or),
        "pass" => Some(TokenKind::Pass),
        "raise" => Some(TokenKind::Raise),
        _ => None,
    }
}

impl TokenKind {
    /// Human-readable token name used in `syntax error, unexpected <X>`
    /// messages.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::As => "'as'",
            TokenKind::Class => "'class'",
            TokenKind::Def => "'def'",
            TokenKind::Elif => "'elif'",
            TokenKind::Else => "'else'",
            TokenKind::From => "'from'",
            TokenKind::If => "'if'",
            TokenKind::Import => "'import'",
            TokenKind::Or => "'or'",
            TokenKind::Pass => "'pass'",
            TokenKind::Raise => "'raise'",
            TokenKind::Arrow => "'->'",
            TokenKind::ColonEq => "':='",
            TokenKind::Ellipsis => "'...'",
            TokenKind::Dot => "'.'",
            TokenKind::Comma => "','",
            TokenKind::Colon => "':'",
            TokenKind::Eq => "'='",
            TokenKind::EqEq => "'=='",
            TokenKind::NotEq => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::Gt => "'>'",
            TokenKind::LtEq => "'<='",
            TokenKind::GtEq => "'>='",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::StarStar => "'**'",
            TokenKind::Question => "'?'",
            TokenKind::At => "'@'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::Int | TokenKind::Float => "NUMBER",
            TokenKind::String => "STRING",
            TokenKind::Ident => "NAME",
            TokenKind::TypeComment => "TYPECOMMENT",
            TokenKind::Newline => "NEWLINE",
            TokenKind::Indent => "INDENT",
            TokenKind::Dedent => "DEDENT",
            TokenKind::Eof => "end of file",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_from_str_recognizes_all_keywords() {
        let keywords = [
            ("as", TokenKind::As),
            ("class", TokenKind::Class),
            ("def", TokenKind::Def),
            ("elif", TokenKind::Elif),
            ("else", TokenKind::Else),
            ("from", TokenKind::From),
            ("if", TokenKind::If),
            ("import", TokenKind::Import),
            ("or", TokenKind::Or),
            ("pass", TokenKind::Pass),
            ("raise", TokenKind::Raise),
        ];
        for (s, expected) in &keywords {
            assert_eq!(keyword_from_str(s), Some(*expected));
        }
        assert_eq!(keywords.len(), 11);
    }

    #[test]
    fn keyword_from_str_rejects_soft_names() {
        // Names the grammar recognizes by text stay plain identifiers.
        for s in ["nothing", "NamedTuple", "TypeVar", "PYTHONCODE", "True", "False", "foo"] {
            assert_eq!(keyword_from_str(s), None, "{s} must not be a keyword");
        }
    }
}
