//! Tokenizer for TypeScript declaration files.
//!
//! Produces a flat token stream with byte offsets and line/column positions.
//! Comments are not tokens: line and block comments are skipped, while a
//! JSDoc block (`/** … */`) is attached to the token that follows it so the
//! parser can surface documentation on declarations and class members.

/// A single lexed token.
#[derive(Debug, Clone)]
pub struct Token {
    /// Token class.
    pub kind: TokenKind,
    /// Raw source text of the token. For string tokens this is the
    /// unquoted content.
    pub text: String,
    /// Byte offset of the token start in the source.
    pub start: usize,
    /// Byte offset one past the token end.
    pub end: usize,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub col: u32,
    /// JSDoc block immediately preceding this token, with comment markers
    /// stripped.
    pub doc: Option<String>,
}

/// Token classes. Keywords are not distinguished from identifiers; the
/// parser treats them contextually, which is how TypeScript itself works.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword.
    Ident,
    /// String literal (single or double quoted); `text` holds the content.
    Str,
    /// Numeric literal.
    Num,
    /// Template literal (backticks), kept verbatim in `text`.
    Template,
    /// Punctuation; `text` holds the exact characters (`=>` and `...` are
    /// single tokens, everything else is one character).
    Punct,
    /// End of input.
    Eof,
}

/// Lexes `source` into tokens. Never fails: unexpected bytes are skipped.
#[must_use]
pub fn lex(source: &str) -> Vec<Token> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    col: u32,
    pending_doc: Option<String>,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            col: 1,
            pending_doc: None,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Token> {
        while self.pos < self.bytes.len() {
            let byte = self.bytes[self.pos];
            match byte {
                b' ' | b'\t' | b'\r' => self.advance(1),
                b'\n' => {
                    self.pos += 1;
                    self.line += 1;
                    self.col = 1;
                }
                b'/' if self.peek(1) == Some(b'/') => self.skip_line_comment(),
                b'/' if self.peek(1) == Some(b'*') => self.read_block_comment(),
                b'"' | b'\'' => self.read_string(byte),
                b'`' => self.read_template(),
                b'0'..=b'9' => self.read_number(),
                b'a'..=b'z' | b'A'..=b'Z' | b'_' | b'$' => self.read_ident(),
                _ if byte >= 0x80 => self.read_ident(),
                _ => self.read_punct(),
            }
        }

        let doc = self.pending_doc.take();
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            text: String::new(),
            start: self.pos,
            end: self.pos,
            line: self.line,
            col: self.col,
            doc,
        });
        self.tokens
    }

    fn peek(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
        self.col += u32::try_from(n).unwrap_or(0);
    }

    fn advance_over(&mut self, text: &str) {
        for ch in text.chars() {
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        self.pos += text.len();
    }

    fn skip_line_comment(&mut self) {
        let rest = &self.source[self.pos..];
        let len = rest.find('\n').unwrap_or(rest.len());
        self.advance(len);
    }

    fn read_block_comment(&mut self) {
        let rest = &self.source[self.pos..];
        let end = rest[2..].find("*/").map_or(rest.len(), |i| i + 4);
        let comment = rest[..end].to_string();
        if comment.starts_with("/**") && comment.len() > 4 {
            self.pending_doc = Some(clean_jsdoc(&comment));
        }
        self.advance_over(&comment);
    }

    fn read_string(&mut self, quote: u8) {
        let start = self.pos;
        let (line, col) = (self.line, self.col);
        let mut i = self.pos + 1;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' => i += 2,
                b if b == quote => {
                    i += 1;
                    break;
                }
                b'\n' => break,
                _ => i += 1,
            }
        }
        let end = i.min(self.source.len());
        let raw = self.source[start..end].to_string();
        let content = raw
            .trim_start_matches(char::from(quote))
            .trim_end_matches(char::from(quote))
            .to_string();
        self.push_token(TokenKind::Str, content, start, end, line, col);
        self.advance_over(&raw);
    }

    fn read_template(&mut self) {
        let start = self.pos;
        let (line, col) = (self.line, self.col);
        let mut i = self.pos + 1;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' => i += 2,
                b'`' => {
                    i += 1;
                    break;
                }
                _ => i += 1,
            }
        }
        let raw = self.source[start..i.min(self.source.len())].to_string();
        self.push_token(TokenKind::Template, raw.clone(), start, i, line, col);
        self.advance_over(&raw);
    }

    fn read_number(&mut self) {
        let start = self.pos;
        let (line, col) = (self.line, self.col);
        let mut i = self.pos;
        while i < self.bytes.len()
            && (self.bytes[i].is_ascii_alphanumeric() || self.bytes[i] == b'.' || self.bytes[i] == b'_')
        {
            // A trailing `.` belongs to the number only when followed by a digit.
            if self.bytes[i] == b'.' && !self.bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit()) {
                break;
            }
            i += 1;
        }
        let text = self.source[start..i].to_string();
        self.push_token(TokenKind::Num, text, start, i, line, col);
        self.advance(i - start);
    }

    fn read_ident(&mut self) {
        let start = self.pos;
        let (line, col) = (self.line, self.col);
        let rest = &self.source[start..];
        let len = rest
            .char_indices()
            .find(|&(_, ch)| !(ch.is_alphanumeric() || ch == '_' || ch == '$'))
            .map_or(rest.len(), |(i, _)| i);
        let text = rest[..len].to_string();
        self.push_token(TokenKind::Ident, text, start, start + len, line, col);
        self.advance(len);
    }

    fn read_punct(&mut self) {
        let start = self.pos;
        let (line, col) = (self.line, self.col);
        let rest = &self.source[self.pos..];
        let text = if rest.starts_with("...") {
            "..."
        } else if rest.starts_with("=>") {
            "=>"
        } else {
            &rest[..rest.chars().next().map_or(1, char::len_utf8)]
        };
        let text = text.to_string();
        let len = text.len();
        self.push_token(TokenKind::Punct, text, start, start + len, line, col);
        self.advance(len);
    }

    fn push_token(
        &mut self,
        kind: TokenKind,
        text: String,
        start: usize,
        end: usize,
        line: u32,
        col: u32,
    ) {
        let doc = self.pending_doc.take();
        self.tokens.push(Token {
            kind,
            text,
            start,
            end,
            line,
            col,
            doc,
        });
    }
}

/// Strips `/** … */` markers and per-line `*` prefixes from a JSDoc block.
#[must_use]
pub fn clean_jsdoc(comment: &str) -> String {
    let inner = comment
        .trim_start_matches("/**")
        .trim_end_matches("*/")
        .trim();
    inner
        .lines()
        .map(|line| {
            let line = line.trim_start();
            line.strip_prefix('*').map_or(line, |l| l.strip_prefix(' ').unwrap_or(l))
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<(TokenKind, String)> {
        lex(source)
            .into_iter()
            .filter(|t| t.kind != TokenKind::Eof)
            .map(|t| (t.kind, t.text))
            .collect()
    }

    #[test]
    fn test_lex_declaration() {
        let tokens = kinds("export type Foo = Bar[];");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Ident, "export".to_string()),
                (TokenKind::Ident, "type".to_string()),
                (TokenKind::Ident, "Foo".to_string()),
                (TokenKind::Punct, "=".to_string()),
                (TokenKind::Ident, "Bar".to_string()),
                (TokenKind::Punct, "[".to_string()),
                (TokenKind::Punct, "]".to_string()),
                (TokenKind::Punct, ";".to_string()),
            ]
        );
    }

    #[test]
    fn test_arrow_and_spread_are_single_tokens() {
        let tokens = kinds("(...args) => void");
        let texts: Vec<_> = tokens.iter().map(|(_, t)| t.as_str()).collect();
        assert!(texts.contains(&"..."));
        assert!(texts.contains(&"=>"));
    }

    #[test]
    fn test_generic_close_is_split() {
        // `>>` must lex as two tokens so nested generics close correctly.
        let tokens = kinds("Promise<Array<string>>");
        let closes = tokens.iter().filter(|(_, t)| t == ">").count();
        assert_eq!(closes, 2);
    }

    #[test]
    fn test_string_literal_content() {
        let tokens = kinds("import x from './mod.js';");
        assert!(tokens.contains(&(TokenKind::Str, "./mod.js".to_string())));
    }

    #[test]
    fn test_jsdoc_attaches_to_next_token() {
        let tokens = lex("/** Lists items.\n * Read more: https://x */\nlist(): void;");
        assert_eq!(tokens[0].text, "list");
        let doc = tokens[0].doc.as_deref().unwrap();
        assert!(doc.contains("Lists items."));
        assert!(doc.contains("Read more: https://x"));
    }

    #[test]
    fn test_line_comments_are_skipped() {
        let tokens = kinds("// nothing\nfoo");
        assert_eq!(tokens, vec![(TokenKind::Ident, "foo".to_string())]);
    }

    #[test]
    fn test_positions() {
        let tokens = lex("a\n  b");
        assert_eq!((tokens[0].line, tokens[0].col), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].col), (2, 3));
    }

    #[test]
    fn test_clean_jsdoc() {
        let doc = clean_jsdoc("/**\n * Line one.\n *\n * Line two.\n */");
        assert_eq!(doc, "Line one.\n\nLine two.");
    }
}
