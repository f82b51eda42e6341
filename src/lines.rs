/// One line of a byte buffer, `\n` terminator included when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    pub text: &'a [u8],
    /// No more lines follow this one.
    pub is_final: bool,
}

/// Lazily splits a buffer into lines. Cloning restarts from the current
/// position, so a caller can look ahead without losing its place.
#[derive(Debug, Clone)]
pub struct Lines<'a> {
    rest: &'a [u8],
}

pub fn lines(buf: &[u8]) -> Lines<'_> {
    Lines { rest: buf }
}

impl<'a> Iterator for Lines<'a> {
    type Item = Line<'a>;

    fn next(&mut self) -> Option<Line<'a>> {
        if self.rest.is_empty() {
            return None;
        }
        let end = match self.rest.iter().position(|&b| b == b'\n') {
            Some(i) => i + 1,
            None => self.rest.len(),
        };
        let (text, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(Line {
            text,
            is_final: rest.is_empty(),
        })
    }
}
