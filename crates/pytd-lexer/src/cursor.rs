/// A character cursor over source text.
///
/// Tracks byte positions (as `u32`) so token spans can be sliced back out of
/// the original source.
pub struct Cursor<'src> {
    source: &'src str,
    pos: u32,
}

impl<'src> Cursor<'src> {
    pub fn new(source: &'src str) -> Self {
        Self { source, pos: 0 }
    }

    /// Current byte position.
    pub fn pos(&self) -> u32 {
        self.pos
    }

    /// True when the cursor has consumed all input.
    pub fn is_eof(&self) -> bool {
        self.pos as usize >= self.source.len()
    }

    /// Peek at the current character without consuming it.
    pub fn peek(&self) -> Option<char> {
        self.source[self.pos as usize..].chars().next()
    }

    /// Peek one character past the current one.
    pub fn peek_next(&self) -> Option<char> {
        let mut chars = self.source[self.pos as usize..].chars();
        chars.next();
        chars.next()
    }

    /// Peek two characters past the current one.
    pub fn peek_nth(&self, n: usize) -> Option<char> {
        self.source[self.pos as usize..].chars().nth(n)
    }

    /// Consume and return the current character.
    pub fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8() as u32;
        Some(ch)
    }

    /// Consume characters while `pred` holds.
    pub fn eat_while(&mut self, mut pred: impl FnMut(char) -> bool) {
        while let Some(ch) = self.peek() {
            if !pred(ch) {
                break;
            }
            self.advance();
        }
    }

    /// Slice the source between two byte positions.
    pub fn slice(&self, start: u32, end: u32) -> &'src str {
        &self.source[start as usize..end as usize]
    }
}
