#[derive(Debug, PartialEq, Clone)]
pub enum Token {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(Vec<u8>),
    HexString(Vec<u8>),
    Name(String),
    Keyword(String),

    DictStart,
    DictEnd,
    ArrayStart,
    ArrayEnd,
}

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.input.len());
    }

    pub(crate) fn input(&self) -> &'a [u8] {
        self.input
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    pub fn next_token(&mut self) -> Option<Token> {
        loop {
            self.skip_whitespace_and_comments();
            let byte = self.bump()?;
            let token = match byte {
                b'[' => Token::ArrayStart,
                b']' => Token::ArrayEnd,
                b'<' if self.peek() == Some(b'<') => {
                    self.pos += 1;
                    Token::DictStart
                }
                b'>' if self.peek() == Some(b'>') => {
                    self.pos += 1;
                    Token::DictEnd
                }
                b'(' => Token::String(self.read_literal_string()),
                b'<' => Token::HexString(self.read_hex_string()),
                b'/' => Token::Name(self.read_name()),
                b'+' | b'-' | b'.' | b'0'..=b'9' => self.read_number(),
                _ if is_regular(byte) => {
                    let word = self.read_regular_run(self.pos - 1);
                    keyword_token(word)
                }
                // Stray delimiters such as ')' '>' '{' '}' carry no meaning here.
                _ => continue,
            };
            return Some(token);
        }
    }

    /// Returns `length` bytes of stream data following the `stream` keyword.
    pub fn consume_stream(&mut self, length: usize) -> &'a [u8] {
        self.skip_stream_linebreak();
        let start = self.pos;
        let end = start.saturating_add(length).min(self.input.len());
        self.pos = end;
        &self.input[start..end]
    }

    pub fn consume_stream_until_endstream(&mut self) -> &'a [u8] {
        self.skip_stream_linebreak();
        let start = self.pos;
        let end = memchr::memmem::find(&self.input[start..], b"endstream")
            .map(|found| start + found)
            .unwrap_or(self.input.len());
        self.pos = end;
        &self.input[start..end]
    }

    /// Skips inline image bytes after an `ID` operator, stopping after the matching `EI`.
    pub fn skip_inline_image_data(&mut self) {
        match self.peek() {
            Some(b'\r') => {
                self.pos += 1;
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            Some(byte) if is_inline_image_whitespace(byte) => self.pos += 1,
            _ => {}
        }

        // First pass wants whitespace on both sides of EI; the second accepts a bare EI
        // when what follows parses like content-stream operators.
        let strict = self.find_inline_image_end(|lexer, at| {
            at > 0 && is_inline_image_whitespace(lexer.input[at - 1])
        });
        let end = strict.or_else(|| {
            self.find_inline_image_end(|lexer, at| lexer.looks_like_operator_followup(at + 2))
        });
        self.pos = end.unwrap_or(self.input.len());
    }

    fn find_inline_image_end<F>(&self, accept: F) -> Option<usize>
    where
        F: Fn(&Self, usize) -> bool,
    {
        let data = &self.input[self.pos..];
        for rel in memchr::memmem::find_iter(data, b"EI") {
            let at = self.pos + rel;
            let after = at + 2;
            let next_ok = after >= self.input.len()
                || is_inline_image_whitespace(self.input[after])
                || is_delim(self.input[after]);
            if next_ok && accept(self, at) {
                return Some(after);
            }
        }
        None
    }

    fn looks_like_operator_followup(&self, from: usize) -> bool {
        let mut lookahead = Lexer::new(&self.input[from.min(self.input.len())..]);
        lookahead.skip_whitespace_and_comments();
        if lookahead.peek().is_none() {
            return true;
        }
        for _ in 0..8 {
            match lookahead.next_token() {
                Some(Token::Keyword(op)) => return is_content_stream_operator(&op),
                Some(_) => {}
                None => break,
            }
        }
        false
    }

    fn skip_stream_linebreak(&mut self) {
        match self.peek() {
            Some(b'\r') => {
                self.pos += 1;
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            Some(b'\n') => self.pos += 1,
            _ => {}
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(byte) = self.peek() {
            if is_whitespace(byte) {
                self.pos += 1;
            } else if byte == b'%' {
                while let Some(b) = self.peek() {
                    if b == b'\n' || b == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn read_literal_string(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut depth = 1usize;
        while let Some(byte) = self.bump() {
            match byte {
                b'\\' => {
                    let Some(next) = self.bump() else {
                        break;
                    };
                    match next {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'\r' => {
                            if self.peek() == Some(b'\n') {
                                self.pos += 1;
                            }
                        }
                        b'\n' => {}
                        b'0'..=b'7' => {
                            let mut val = u16::from(next - b'0');
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        self.pos += 1;
                                        val = (val << 3) | u16::from(d - b'0');
                                    }
                                    _ => break,
                                }
                            }
                            out.push((val & 0xFF) as u8);
                        }
                        other => out.push(other),
                    }
                }
                b'(' => {
                    depth += 1;
                    out.push(byte);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(byte);
                }
                _ => out.push(byte),
            }
        }
        out
    }

    fn read_hex_string(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut high: Option<u8> = None;
        while let Some(byte) = self.bump() {
            if byte == b'>' {
                break;
            }
            let Some(nibble) = hex_nibble(byte) else {
                continue;
            };
            match high.take() {
                Some(h) => out.push((h << 4) | nibble),
                None => high = Some(nibble),
            }
        }
        if let Some(h) = high {
            out.push(h << 4);
        }
        out
    }

    /// Reads a name body, decoding `#xx` escapes.
    fn read_name(&mut self) -> String {
        let start = self.pos;
        let raw = self.read_regular_run(start);
        if !raw.contains('#') {
            return raw;
        }
        let bytes = raw.as_bytes();
        let mut out = Vec::with_capacity(bytes.len());
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'#'
                && i + 2 < bytes.len()
                && let (Some(h), Some(l)) = (hex_nibble(bytes[i + 1]), hex_nibble(bytes[i + 2]))
            {
                out.push((h << 4) | l);
                i += 3;
                continue;
            }
            out.push(bytes[i]);
            i += 1;
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    fn read_number(&mut self) -> Token {
        let text = self.read_regular_run(self.pos - 1);
        if !text.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.')) {
            return keyword_token(text);
        }
        if text.contains('.') {
            // Producers occasionally emit "--5" or "5.-"; keep the parse lenient.
            let cleaned: String = text
                .chars()
                .enumerate()
                .filter(|(i, ch)| *i == 0 || *ch != '-')
                .map(|(_, ch)| ch)
                .collect();
            Token::Real(cleaned.parse().unwrap_or(0.0))
        } else {
            Token::Integer(text.parse().unwrap_or(0))
        }
    }

    /// Consumes regular bytes starting at `start` (which may already be consumed).
    fn read_regular_run(&mut self, start: usize) -> String {
        while let Some(byte) = self.peek() {
            if !is_regular(byte) {
                break;
            }
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token()
    }
}

fn keyword_token(word: String) -> Token {
    match word.as_str() {
        "true" => Token::Boolean(true),
        "false" => Token::Boolean(false),
        "null" => Token::Null,
        _ => Token::Keyword(word),
    }
}

pub(crate) fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b'\x00' | b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

fn is_inline_image_whitespace(byte: u8) -> bool {
    matches!(byte, b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

pub(crate) fn is_delim(byte: u8) -> bool {
    matches!(
        byte,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(byte: u8) -> bool {
    !(is_delim(byte) || is_whitespace(byte))
}

fn is_content_stream_operator(op: &str) -> bool {
    const OPERATORS: &[&str] = &[
        "q", "Q", "cm", "w", "J", "j", "M", "d", "ri", "i", "gs", "m", "l", "c", "v", "y", "h",
        "re", "S", "s", "f", "F", "f*", "B", "B*", "b", "b*", "n", "W", "W*", "CS", "cs", "SC",
        "SCN", "sc", "scn", "G", "g", "RG", "rg", "K", "k", "sh", "BT", "ET", "Tc", "Tw", "Tz",
        "TL", "Tf", "Tr", "Ts", "Td", "TD", "Tm", "T*", "Tj", "TJ", "'", "\"", "d0", "d1", "BI",
        "ID", "EI", "MP", "DP", "BMC", "BDC", "EMC", "BX", "EX", "Do",
    ];
    OPERATORS.contains(&op)
}

fn hex_nibble(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_with_nested_array() {
        let mut lexer = Lexer::new(b"<< /Kids [1 0 R] /Count 1 >>");
        let tokens: Vec<Token> = lexer.by_ref().collect();
        assert_eq!(
            tokens,
            vec![
                Token::DictStart,
                Token::Name("Kids".to_string()),
                Token::ArrayStart,
                Token::Integer(1),
                Token::Integer(0),
                Token::Keyword("R".to_string()),
                Token::ArrayEnd,
                Token::Name("Count".to_string()),
                Token::Integer(1),
                Token::DictEnd,
            ]
        );
    }

    #[test]
    fn literal_string_handles_escapes_and_nesting() {
        let mut lexer = Lexer::new(br"(a\(b\) (c) \101\n)");
        assert_eq!(
            lexer.next(),
            Some(Token::String(b"a(b) (c) A\n".to_vec()))
        );
    }

    #[test]
    fn hex_string_pads_odd_nibble() {
        let mut lexer = Lexer::new(b"<4E6F7>");
        assert_eq!(lexer.next(), Some(Token::HexString(vec![0x4E, 0x6F, 0x70])));
    }

    #[test]
    fn name_escapes_are_decoded() {
        let mut lexer = Lexer::new(b"/First#20Name");
        assert_eq!(lexer.next(), Some(Token::Name("First Name".to_string())));
    }

    #[test]
    fn reals_and_signed_integers() {
        let mut lexer = Lexer::new(b"-12 .5 +3 4.25");
        assert_eq!(lexer.next(), Some(Token::Integer(-12)));
        assert_eq!(lexer.next(), Some(Token::Real(0.5)));
        assert_eq!(lexer.next(), Some(Token::Integer(3)));
        assert_eq!(lexer.next(), Some(Token::Real(4.25)));
    }

    #[test]
    fn stream_until_endstream_excludes_marker() {
        let mut lexer = Lexer::new(b"stream\r\npayloadendstream");
        lexer.set_position(6);
        assert_eq!(lexer.consume_stream_until_endstream(), b"payload");
        assert_eq!(lexer.next(), Some(Token::Keyword("endstream".to_string())));
    }

    #[test]
    fn inline_image_skips_embedded_ei_with_bad_followup() {
        let mut lexer = Lexer::new(b"ID \xffEI zzzz EI Q");
        lexer.set_position(2);
        lexer.skip_inline_image_data();
        assert_eq!(lexer.next(), Some(Token::Keyword("Q".to_string())));
    }
}
