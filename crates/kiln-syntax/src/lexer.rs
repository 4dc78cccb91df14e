use crate::error::{SyntaxError, SyntaxResult};
use crate::preprocess::Preprocessed;
use logos::Logos;
use miette::SourceSpan;
use rustc_hash::{FxHashMap, FxHashSet};

/// A token and the text it came from.
///
/// Tokens produced by macro expansion carry the span of the macro name
/// they replaced, and their lexeme points into the macro body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: SourceSpan,
}

#[derive(Debug, Logos, PartialEq, Eq, Clone, Copy, Hash)]
pub enum TokenKind {
    // Keywords
    #[token("void")]
    Void,
    #[token("char")]
    Char,
    #[token("short")]
    Short,
    #[token("int")]
    Int,
    #[token("long")]
    Long,
    #[token("signed")]
    Signed,
    #[token("unsigned")]
    Unsigned,
    #[token("float")]
    Float,
    #[token("double")]
    Double,
    #[token("bool")]
    #[token("_Bool")]
    Bool,
    #[token("__int128")]
    Int128,
    #[token("struct")]
    Struct,
    #[token("const")]
    Const,
    #[token("volatile")]
    Volatile,
    #[token("static")]
    Static,
    #[token("inline")]
    Inline,
    #[token("extern")]
    Extern,
    #[token("typedef")]
    Typedef,
    #[token("return")]
    Return,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("for")]
    For,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("sizeof")]
    Sizeof,
    #[token("nullptr")]
    Nullptr,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // Punctuation
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("->")]
    Arrow,
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
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("=")]
    Assign,
    #[token("+=")]
    PlusAssign,
    #[token("-=")]
    MinusAssign,
    #[token("*=")]
    StarAssign,
    #[token("/=")]
    SlashAssign,
    #[token("%=")]
    PercentAssign,
    #[token("&=")]
    AmpAssign,
    #[token("|=")]
    PipeAssign,
    #[token("^=")]
    CaretAssign,
    #[token("<<=")]
    ShlAssign,
    #[token(">>=")]
    ShrAssign,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    Ge,
    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("~")]
    Tilde,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,

    // Literals
    #[regex(r"0[xX][0-9a-fA-F]+[uUlL]*")]
    #[regex(r"[0-9]+[uUlL]*")]
    IntLiteral,
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?[fFlL]?")]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?[fFlL]?")]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+[fFlL]?")]
    FloatLiteral,
    #[regex(r"'([^'\\\n]|\\[^\n])+'")]
    CharLiteral,
    #[regex(r#""([^"\\\n]|\\[^\n])*""#)]
    StringLiteral,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Identifier,

    #[regex(r"[ \t\n\r\f]+", logos::skip)]
    #[regex(r"//[^\n]*", logos::skip)]
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", logos::skip)]
    Whitespace,

    #[error]
    Error,
}

impl TokenKind {
    /// Human readable spelling for error messages.
    pub fn describe(self) -> &'static str {
        use TokenKind::*;
        match self {
            LParen => "'('",
            RParen => "')'",
            LBrace => "'{'",
            RBrace => "'}'",
            LBracket => "'['",
            RBracket => "']'",
            Semi => "';'",
            Comma => "','",
            Colon => "':'",
            Assign => "'='",
            Identifier => "identifier",
            IntLiteral | FloatLiteral | CharLiteral => "literal",
            StringLiteral => "string literal",
            _ => "token",
        }
    }
}

/// Tokenises preprocessed text, expanding object-like macros.
pub fn lex(pre: &Preprocessed) -> SyntaxResult<Vec<Token<'_>>> {
    let mut lexer = MacroLexer {
        pre,
        macros: FxHashMap::default(),
        next_event: 0,
        tokens: Vec::new(),
    };
    lexer.run()?;
    log::trace!("lexed {} tokens", lexer.tokens.len());
    Ok(lexer.tokens)
}

struct MacroLexer<'a> {
    pre: &'a Preprocessed,
    macros: FxHashMap<&'a str, &'a str>,
    next_event: usize,
    tokens: Vec<Token<'a>>,
}

impl<'a> MacroLexer<'a> {
    fn run(&mut self) -> SyntaxResult<()> {
        let pre: &'a Preprocessed = self.pre;
        let text: &'a str = &pre.text;
        let mut lex = TokenKind::lexer(text);
        while let Some(kind) = lex.next() {
            let range = lex.span();
            let span = SourceSpan::from((range.start, range.end - range.start));
            self.replay_events(range.start);
            let lexeme = lex.slice();
            if kind == TokenKind::Error {
                return Err(unexpected(lexeme, span));
            }
            if kind == TokenKind::Identifier && self.macros.contains_key(lexeme) {
                let mut expanding = FxHashSet::default();
                self.expand(lexeme, span, &mut expanding)?;
            } else {
                self.tokens.push(Token { kind, lexeme, span });
            }
        }
        Ok(())
    }

    fn replay_events(&mut self, offset: usize) {
        let pre: &'a Preprocessed = self.pre;
        let events = &pre.events;
        while let Some(event) = events.get(self.next_event) {
            if event.offset > offset {
                break;
            }
            match &event.body {
                Some(body) => {
                    self.macros.insert(event.name.as_str(), body.as_str());
                }
                None => {
                    self.macros.remove(event.name.as_str());
                }
            }
            self.next_event += 1;
        }
    }

    fn expand(
        &mut self,
        name: &'a str,
        span: SourceSpan,
        expanding: &mut FxHashSet<&'a str>,
    ) -> SyntaxResult<()> {
        let body = match self.macros.get(name) {
            Some(body) => *body,
            None => return Ok(()),
        };
        expanding.insert(name);
        let mut lex = TokenKind::lexer(body);
        while let Some(kind) = lex.next() {
            let lexeme = lex.slice();
            match kind {
                TokenKind::Error => return Err(unexpected(lexeme, span)),
                TokenKind::Identifier
                    if self.macros.contains_key(lexeme) && !expanding.contains(lexeme) =>
                {
                    self.expand(lexeme, span, expanding)?;
                }
                _ => self.tokens.push(Token { kind, lexeme, span }),
            }
        }
        expanding.remove(name);
        Ok(())
    }
}

fn unexpected(lexeme: &str, span: SourceSpan) -> SyntaxError {
    let message = if lexeme.starts_with('"') || lexeme.starts_with('\'') {
        "missing terminating quote character".to_string()
    } else if lexeme.starts_with('#') {
        "stray '#' in program".to_string()
    } else {
        format!("unexpected character '{lexeme}'")
    };
    SyntaxError::Lex { message, span }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::CompileOptions;
    use crate::preprocess::preprocess;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (pre, _) = preprocess(source, &CompileOptions::for_file("code.cpp"));
        lex(&pre).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn keywords_beat_identifiers() {
        assert_eq!(
            kinds("int int32_t unsigned"),
            vec![TokenKind::Int, TokenKind::Identifier, TokenKind::Unsigned]
        );
    }

    #[test]
    fn literals_and_comments() {
        assert_eq!(
            kinds("0x1fUL 42 /* gone */ 'a' // rest\n 1.5f \"C\""),
            vec![
                TokenKind::IntLiteral,
                TokenKind::IntLiteral,
                TokenKind::CharLiteral,
                TokenKind::FloatLiteral,
                TokenKind::StringLiteral,
            ]
        );
    }

    #[test]
    fn longest_operator_wins() {
        assert_eq!(
            kinds("a <<= b->c"),
            vec![
                TokenKind::Identifier,
                TokenKind::ShlAssign,
                TokenKind::Identifier,
                TokenKind::Arrow,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn macros_expand_with_use_span() {
        let source = "#define TWO (1 + 1)\nint x = TWO;";
        let (pre, _) = preprocess(source, &CompileOptions::for_file("code.cpp"));
        let tokens = lex(&pre).unwrap();
        let lexemes: Vec<_> = tokens.iter().map(|t| t.lexeme).collect();
        assert_eq!(lexemes, vec!["int", "x", "=", "(", "1", "+", "1", ")", ";"]);
        let use_offset = source.find("TWO;").unwrap();
        assert_eq!(tokens[4].span.offset(), use_offset);
    }

    #[test]
    fn macros_apply_only_after_definition() {
        let source = "N\n#define N 4\nN\n#undef N\nN";
        let (pre, _) = preprocess(source, &CompileOptions::for_file("code.cpp"));
        let lexemes: Vec<_> = lex(&pre).unwrap().iter().map(|t| t.lexeme).collect();
        assert_eq!(lexemes, vec!["N", "4", "N"]);
    }

    #[test]
    fn self_referential_macro_stops() {
        let source = "#define X X + 1\nX";
        let (pre, _) = preprocess(source, &CompileOptions::for_file("code.cpp"));
        let lexemes: Vec<_> = lex(&pre).unwrap().iter().map(|t| t.lexeme).collect();
        assert_eq!(lexemes, vec!["X", "+", "1"]);
    }

    #[test]
    fn stray_character_is_an_error() {
        let (pre, _) = preprocess("int a = $;", &CompileOptions::for_file("code.cpp"));
        let err = lex(&pre).unwrap_err();
        assert_eq!(err.span().map(|s| s.offset()), Some(8));
    }
}
