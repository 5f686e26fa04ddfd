use super::ast::Position;
use crate::error::SyntaxError;

/// Character cursor over template source that keeps line and column.
pub(crate) struct Scanner<'s> {
    source: &'s str,
    current: usize,
    line: usize,
    column: usize,
}

impl<'s> Scanner<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            current: 0,
            line: 1,
            column: 0,
        }
    }

    pub fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }

    pub fn offset(&self) -> usize {
        self.current
    }

    pub fn slice(&self, start: usize, end: usize) -> &'s str {
        &self.source[start..end]
    }

    pub fn rest(&self) -> &'s str {
        &self.source[self.current..]
    }

    pub fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    pub fn starts_with(&self, pattern: &str) -> bool {
        self.rest().starts_with(pattern)
    }

    pub fn consume(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.current += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Consume `pattern` if the input starts with it.
    pub fn eat(&mut self, pattern: &str) -> bool {
        if !self.starts_with(pattern) {
            return false;
        }
        for _ in pattern.chars() {
            self.consume();
        }
        true
    }

    pub fn eat_char(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.consume();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, pattern: &str) -> Result<(), SyntaxError> {
        if self.eat(pattern) {
            Ok(())
        } else {
            Err(self.error(format!("Expected `{pattern}`")))
        }
    }

    pub fn consume_while(&mut self, pred: impl Fn(char) -> bool) -> &'s str {
        let start = self.current;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.consume();
        }
        &self.source[start..self.current]
    }

    /// Consume up to (not including) `end`. Fails at end of input.
    pub fn consume_until(&mut self, end: &str) -> Result<&'s str, ()> {
        let start = self.current;
        while !self.is_at_end() {
            if self.starts_with(end) {
                return Ok(&self.source[start..self.current]);
            }
            self.consume();
        }
        Err(())
    }

    pub fn skip_whitespace(&mut self) {
        self.consume_while(char::is_whitespace);
    }

    pub fn error(&self, message: impl Into<String>) -> SyntaxError {
        error_at(self.position(), message)
    }
}

pub(crate) fn error_at(pos: Position, message: impl Into<String>) -> SyntaxError {
    SyntaxError {
        message: message.into(),
        line: pos.line,
        column: pos.column,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_lines_and_columns() {
        let mut scanner = Scanner::new("ab\ncd");
        scanner.consume();
        assert_eq!(scanner.position(), Position { line: 1, column: 1 });
        scanner.consume();
        scanner.consume();
        assert_eq!(scanner.position(), Position { line: 2, column: 0 });
    }

    #[test]
    fn consume_until_stops_before_pattern() {
        let mut scanner = Scanner::new("hello}}rest");
        assert_eq!(scanner.consume_until("}}"), Ok("hello"));
        assert!(scanner.eat("}}"));
        assert_eq!(scanner.rest(), "rest");
    }

    #[test]
    fn consume_until_fails_at_end() {
        let mut scanner = Scanner::new("no close");
        assert!(scanner.consume_until("}}").is_err());
    }
}
