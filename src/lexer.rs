//! Lum lexer.
//!
//! Raw tokens come out of a logos-generated lexer; a synthesis pass then
//! rewrites the stream so the executor never sees the self-update sugar:
//! `x++` becomes `x = @ + 1`, `x -= 3` becomes `x = @ - 3`, and `@+` inside
//! an index becomes `@ + 1`. Header directives (`#alias`) are applied to the
//! source text before any token is produced.

use logos::Logos;

use crate::ast::{BinOp, Primitive};
use crate::error::{LumError, LumResult};
use crate::span::Span;

/// Carrier for lexing failures; an empty payload means "unexpected
/// character" and is refined in `tokenize`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LexProblem(pub Option<String>);

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*[^*]*\*+([^/*][^*]*\*+)*/")]
#[logos(error = LexProblem)]
pub enum TokenKind {
    // Delimiters
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("=")]
    Equal,
    #[token("==")]
    EqEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("!")]
    Not,
    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("&")]
    BitAnd,
    #[token("|")]
    BitOr,
    #[token("^")]
    BitXor,
    #[token("~")]
    BitNot,
    #[token("->")]
    Arrow,
    #[token("..")]
    Range,
    #[token("...")]
    Spread,
    #[token(".")]
    Dot,
    #[token("@")]
    At,

    // Self-update sugar, rewritten away by the synthesis pass.
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,

    // Literals
    #[regex(r"[0-9]+(\.[0-9]+)*", |lex| {
        let s = lex.slice();
        if s.bytes().filter(|&b| b == b'.').count() > 1 {
            Err(LexProblem(Some("Multiple decimal points in number".into())))
        } else {
            Ok(s.to_string())
        }
    })]
    Number(String),

    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape(&s[1..s.len() - 1])
    })]
    Str(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // Keywords
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("return")]
    Return,
    #[token("void")]
    Void,
    #[token("fin")]
    Fin,
    #[token("for")]
    For,
    #[token("struct")]
    Struct,
    #[token("import")]
    Import,
    #[token("export")]
    Export,
    #[token("false")]
    False,
    #[token("true")]
    True,
    #[token("as")]
    As,
    #[token("native")]
    Native,
    #[token("link")]
    Link,

    // Primitive type names
    #[token("int", |_| Primitive::Int)]
    #[token("bool", |_| Primitive::Bool)]
    #[token("string", |_| Primitive::String)]
    Primitive(Primitive),

    Eof,
}

impl TokenKind {
    /// Binary-operator code for operator tokens.
    pub fn op_code(&self) -> Option<BinOp> {
        Some(match self {
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::Slash => BinOp::Div,
            TokenKind::Percent => BinOp::Mod,
            TokenKind::EqEq => BinOp::Eq,
            TokenKind::Lt => BinOp::Lt,
            TokenKind::Gt => BinOp::Gt,
            TokenKind::Le => BinOp::Le,
            TokenKind::Ge => BinOp::Ge,
            TokenKind::Not => BinOp::Not,
            TokenKind::BitNot => BinOp::BitNot,
            TokenKind::BitAnd => BinOp::BitAnd,
            TokenKind::BitOr => BinOp::BitOr,
            TokenKind::BitXor => BinOp::BitXor,
            TokenKind::And => BinOp::And,
            TokenKind::Or => BinOp::Or,
            _ => return None,
        })
    }

    /// Human-readable rendering for error messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Number(n) => format!("number '{n}'"),
            TokenKind::Str(s) => format!("string \"{s}\""),
            TokenKind::Ident(name) => format!("identifier '{name}'"),
            TokenKind::Primitive(p) => format!("type '{p:?}'").to_lowercase(),
            TokenKind::Eof => "end of file".to_string(),
            other => format!("'{other:?}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

pub struct Lexer {
    source: String,
    file: String,
}

impl Lexer {
    /// Consume header directives and apply registered aliases; the result is
    /// the source the token stream refers to.
    pub fn new(source: &str, file: &str) -> LumResult<Self> {
        let (body, aliases) = strip_headers(source, file)?;
        let source = apply_aliases(&body, &aliases);
        Ok(Self {
            source,
            file: file.to_string(),
        })
    }

    /// The preprocessed source; spans on tokens index into this buffer.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokenize(&self) -> LumResult<Vec<Token>> {
        let mut lex = TokenKind::lexer(&self.source);
        let mut raw = Vec::new();

        while let Some(result) = lex.next() {
            let span = Span::new(lex.span().start, lex.span().end);
            match result {
                Ok(kind) => raw.push(Token::new(kind, span)),
                Err(LexProblem(Some(message))) => return Err(self.err(message, span)),
                Err(LexProblem(None)) => {
                    let slice = &self.source[span.start..span.end];
                    let message = if slice.starts_with('"') {
                        "Unterminated string literal".to_string()
                    } else {
                        format!("Unexpected character: '{slice}'")
                    };
                    return Err(self.err(message, span));
                }
            }
        }

        let mut tokens = self.synthesize(raw);
        let end = self.source.len();
        tokens.push(Token::new(TokenKind::Eof, Span::new(end, end)));
        Ok(tokens)
    }

    /// Rewrite self-update sugar into plain token runs. Synthetic tokens
    /// reuse the span of the token that produced them.
    fn synthesize(&self, raw: Vec<Token>) -> Vec<Token> {
        let bytes = self.source.as_bytes();
        let mut out = Vec::with_capacity(raw.len());
        let mut i = 0;

        while i < raw.len() {
            let tok = &raw[i];
            let span = tok.span;
            match &tok.kind {
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let op = if tok.kind == TokenKind::PlusPlus {
                        TokenKind::Plus
                    } else {
                        TokenKind::Minus
                    };
                    out.push(Token::new(TokenKind::Equal, span));
                    out.push(Token::new(TokenKind::At, span));
                    out.push(Token::new(op, span));
                    out.push(Token::new(TokenKind::Number("1".into()), span));
                    i += 1;
                }
                TokenKind::PlusEq | TokenKind::MinusEq => {
                    let op = if tok.kind == TokenKind::PlusEq {
                        TokenKind::Plus
                    } else {
                        TokenKind::Minus
                    };
                    out.push(Token::new(TokenKind::Equal, span));
                    out.push(Token::new(TokenKind::At, span));
                    out.push(Token::new(op, span));
                    i += 1;
                }
                // `+ =` with space lexes as two tokens but behaves as `+=`.
                TokenKind::Plus | TokenKind::Minus
                    if matches!(raw.get(i + 1).map(|t| &t.kind), Some(TokenKind::Equal)) =>
                {
                    out.push(Token::new(TokenKind::Equal, span));
                    out.push(Token::new(TokenKind::At, span));
                    out.push(Token::new(tok.kind.clone(), span));
                    i += 2;
                }
                // `@+` / `@-` directly before `]`, `,` or a space nudges by one.
                TokenKind::At => {
                    let next = raw.get(i + 1);
                    let adjacent_op = next.filter(|n| {
                        n.span.start == span.end
                            && matches!(n.kind, TokenKind::Plus | TokenKind::Minus)
                    });
                    let followed = adjacent_op
                        .map(|n| matches!(bytes.get(n.span.end), Some(b']' | b',' | b' ')))
                        .unwrap_or(false);
                    if let (Some(op), true) = (adjacent_op, followed) {
                        out.push(Token::new(TokenKind::At, span));
                        out.push(Token::new(op.kind.clone(), op.span));
                        out.push(Token::new(TokenKind::Number("1".into()), op.span));
                        i += 2;
                    } else {
                        out.push(tok.clone());
                        i += 1;
                    }
                }
                _ => {
                    out.push(tok.clone());
                    i += 1;
                }
            }
        }

        out
    }

    fn err(&self, message: String, span: Span) -> LumError {
        let (line, col) = span.line_col(&self.source);
        LumError::lexer(message, &self.file, line, col)
    }
}

fn unescape(s: &str) -> Result<String, LexProblem> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some('\\') => result.push('\\'),
                Some('"') => result.push('"'),
                Some(other) => result.push(other),
                None => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }
    Ok(result)
}

/// Consume the leading run of `#`-prefixed header lines. The only directive
/// is `#alias "X" as "Y"`. Header lines are blanked rather than removed so
/// line numbers in later errors stay honest.
fn strip_headers(source: &str, file: &str) -> LumResult<(String, Vec<(String, String)>)> {
    let mut aliases = Vec::new();
    let mut out = String::with_capacity(source.len());
    let mut in_header = true;

    for (idx, line) in source.split_inclusive('\n').enumerate() {
        let trimmed = line.trim();
        if in_header && trimmed.starts_with('#') {
            match parse_alias(trimmed) {
                Some(pair) => aliases.push(pair),
                None => {
                    return Err(LumError::lexer(
                        format!("Unknown header directive: {trimmed}"),
                        file,
                        idx + 1,
                        1,
                    ))
                }
            }
            if line.ends_with('\n') {
                out.push('\n');
            }
            continue;
        }
        if in_header && !trimmed.is_empty() {
            in_header = false;
        }
        out.push_str(line);
    }

    Ok((out, aliases))
}

fn parse_alias(line: &str) -> Option<(String, String)> {
    let rest = line.strip_prefix('#')?.trim_start();
    let rest = rest.strip_prefix("alias")?.trim_start();
    let (from, rest) = quoted(rest)?;
    let rest = rest.trim_start().strip_prefix("as")?.trim_start();
    let (to, rest) = quoted(rest)?;
    if !rest.trim().is_empty() {
        return None;
    }
    Some((from, to))
}

fn quoted(s: &str) -> Option<(String, &str)> {
    let rest = s.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some((rest[..end].to_string(), &rest[end + 1..]))
}

/// Whole-word textual substitution, skipping string literals.
fn apply_aliases(source: &str, aliases: &[(String, String)]) -> String {
    if aliases.is_empty() {
        return source.to_string();
    }

    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c == '"' {
            out.push(c);
            chars.next();
            while let Some(s) = chars.next() {
                out.push(s);
                if s == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else if s == '"' {
                    break;
                }
            }
        } else if c.is_alphanumeric() || c == '_' {
            let mut word = String::new();
            while let Some(&w) = chars.peek() {
                if w.is_alphanumeric() || w == '_' {
                    word.push(w);
                    chars.next();
                } else {
                    break;
                }
            }
            match aliases.iter().find(|(from, _)| *from == word) {
                Some((_, to)) => out.push_str(to),
                None => out.push_str(&word),
            }
        } else {
            out.push(c);
            chars.next();
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source, "test.lum")
            .unwrap()
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn basic_tokens() {
        let toks = kinds("fin int main() { return 0; }");
        assert_eq!(toks[0], TokenKind::Fin);
        assert_eq!(toks[1], TokenKind::Primitive(Primitive::Int));
        assert_eq!(toks[2], TokenKind::Ident("main".into()));
        assert_eq!(toks[3], TokenKind::LParen);
        assert_eq!(*toks.last().unwrap(), TokenKind::Eof);
    }

    #[test]
    fn increment_desugars_to_self_update() {
        assert_eq!(kinds("x++;"), kinds("x = @ + 1;"));
    }

    #[test]
    fn compound_subtract_desugars() {
        assert_eq!(kinds("x -= 3;"), kinds("x = @ - 3;"));
    }

    #[test]
    fn spaced_compound_assign_desugars() {
        assert_eq!(kinds("x + = 2;"), kinds("x = @ + 2;"));
    }

    #[test]
    fn range_splits_numbers() {
        assert_eq!(
            kinds("1..5"),
            vec![
                TokenKind::Number("1".into()),
                TokenKind::Range,
                TokenKind::Number("5".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn index_nudge_sugar() {
        assert_eq!(kinds("a[@+]"), kinds("a[@ + 1]"));
        assert_eq!(kinds("a[@-, 0]"), kinds("a[@ - 1, 0]"));
    }

    #[test]
    fn plain_self_reference_arithmetic_is_untouched() {
        assert_eq!(
            kinds("a[@+2]"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::LBracket,
                TokenKind::At,
                TokenKind::Plus,
                TokenKind::Number("2".into()),
                TokenKind::RBracket,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_escapes() {
        let toks = kinds(r#""a\nb\t\"c\\""#);
        assert_eq!(toks[0], TokenKind::Str("a\nb\t\"c\\".into()));
    }

    #[test]
    fn comments_are_skipped() {
        let toks = kinds("1 // line\n/* block\n spanning */ 2");
        assert_eq!(
            toks,
            vec![
                TokenKind::Number("1".into()),
                TokenKind::Number("2".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn alias_header_rewrites_whole_words() {
        let src = "#alias \"count\" as \"n\"\nint count = 3; string s = \"count\"; int counter = 1;";
        let toks = kinds(src);
        assert!(toks.contains(&TokenKind::Ident("n".into())));
        assert!(toks.contains(&TokenKind::Str("count".into())));
        assert!(toks.contains(&TokenKind::Ident("counter".into())));
        assert!(!toks.contains(&TokenKind::Ident("count".into())));
    }

    #[test]
    fn unknown_header_directive_fails() {
        assert!(Lexer::new("#frobnicate\nint x;", "test.lum").is_err());
    }

    #[test]
    fn unterminated_string_fails() {
        let err = Lexer::new("\"abc", "test.lum").unwrap().tokenize();
        assert!(matches!(err, Err(LumError::Lexer { .. })));
    }

    #[test]
    fn multiple_decimal_points_fail() {
        let err = Lexer::new("1.2.3", "test.lum").unwrap().tokenize();
        assert!(matches!(err, Err(LumError::Lexer { .. })));
    }
}
