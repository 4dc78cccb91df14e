use crate::ast::*;
use crate::error::{SyntaxError, SyntaxResult};
use crate::flags::Language;
use crate::lexer::{Token, TokenKind};
use crate::prelude;
use crate::preprocess::Header;
use kiln_ir::{FloatKind, IntKind, NativeType};
use miette::SourceSpan;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
struct Typedef {
    ty: NativeType,
    const_levels: Vec<bool>,
}

/// Hand-rolled recursive descent parser for the supported C/C++ subset.
pub struct Parser<'a> {
    tokens: &'a [Token<'a>],
    pos: usize,
    language: Language,
    typedefs: FxHashMap<String, Typedef>,
    linkage: Vec<Linkage>,
    /// Length of the source, for errors at end of input.
    end: usize,
    /// Current expression and statement nesting.
    depth: usize,
}

/// Deepest expression or statement nesting accepted, as clang's default
/// `-fbracket-depth`.
pub const MAX_NESTING: usize = 256;

/// Type specifier keywords seen so far in one declaration.
#[derive(Default)]
struct Specifiers {
    signed: bool,
    unsigned: bool,
    short: bool,
    long: u8,
    char: bool,
    int: bool,
    bool: bool,
    int128: bool,
    void: bool,
    float: bool,
    double: bool,
    named: Option<NativeType>,
    named_levels: Vec<bool>,
}

impl Specifiers {
    fn any(&self) -> bool {
        self.signed
            || self.unsigned
            || self.short
            || self.long > 0
            || self.char
            || self.int
            || self.bool
            || self.int128
            || self.void
            || self.float
            || self.double
            || self.named.is_some()
    }
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token<'a>], language: Language, headers: &[Header], end: usize) -> Self {
        let mut typedefs = FxHashMap::default();
        for header in headers {
            for (name, ty) in prelude::typedefs(*header) {
                let depth = pointer_depth(&ty);
                typedefs.insert(
                    name,
                    Typedef {
                        ty,
                        const_levels: vec![false; depth + 1],
                    },
                );
            }
        }
        Self {
            tokens,
            pos: 0,
            language,
            typedefs,
            linkage: Vec::new(),
            end,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&'a Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn peek_kind_at(&self, ahead: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + ahead).map(|t| t.kind)
    }

    fn next(&mut self) -> Option<&'a Token<'a>> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Span of the current token, or an empty span at end of input.
    fn here(&self) -> SourceSpan {
        match self.peek() {
            Some(tok) => tok.span,
            None => SourceSpan::from((self.end, 0)),
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> SyntaxResult<T> {
        Err(SyntaxError::parse(message, self.here()))
    }

    /// Runs `parse` one nesting level deeper, failing once the source nests
    /// past [`MAX_NESTING`].
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> SyntaxResult<T>) -> SyntaxResult<T> {
        if self.depth >= MAX_NESTING {
            return self.error(format!("bracket nesting level exceeded maximum of {MAX_NESTING}"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> SyntaxResult<&'a Token<'a>> {
        match self.peek() {
            Some(tok) if tok.kind == kind => {
                self.pos += 1;
                Ok(tok)
            }
            _ => self.error(message),
        }
    }

    fn span_from(&self, start: SourceSpan) -> SourceSpan {
        let end = match self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)) {
            Some(prev) => prev.span.offset() + prev.span.len(),
            None => start.offset() + start.len(),
        };
        let len = end.saturating_sub(start.offset());
        SourceSpan::from((start.offset(), len))
    }

    fn current_linkage(&self) -> Linkage {
        match (self.language, self.linkage.last()) {
            (Language::C, _) => Linkage::C,
            (Language::Cxx, Some(linkage)) => *linkage,
            (Language::Cxx, None) => Linkage::Cxx,
        }
    }

    fn is_typedef_name(&self, tok: Option<&Token<'a>>) -> bool {
        matches!(tok, Some(t) if t.kind == TokenKind::Identifier && self.typedefs.contains_key(t.lexeme))
    }

    fn is_type_start_at(&self, ahead: usize) -> bool {
        use TokenKind::*;
        let tok = self.tokens.get(self.pos + ahead);
        match tok.map(|t| t.kind) {
            Some(Void | Char | Short | Int | Long | Signed | Unsigned | Float | Double | Bool
            | Int128 | Struct | Const | Volatile) => true,
            Some(Identifier) => self.is_typedef_name(tok),
            _ => false,
        }
    }

    /// `foo bar` where `foo` is not a known type.
    fn unknown_type_name(&self) -> Option<SyntaxError> {
        let tok = self.peek()?;
        if tok.kind == TokenKind::Identifier
            && !self.typedefs.contains_key(tok.lexeme)
            && self.peek_kind_at(1) == Some(TokenKind::Identifier)
        {
            return Some(SyntaxError::parse(
                format!("unknown type name '{}'", tok.lexeme),
                tok.span,
            ));
        }
        None
    }

    //--------------------------------------------------------------------------
    // Top level
    //--------------------------------------------------------------------------

    pub fn parse_translation_unit(&mut self) -> SyntaxResult<TranslationUnit> {
        let mut functions = Vec::new();
        while self.peek().is_some() {
            self.parse_item(&mut functions)?;
        }
        Ok(TranslationUnit { functions })
    }

    fn parse_item(&mut self, out: &mut Vec<FunctionDecl>) -> SyntaxResult<()> {
        match self.peek_kind() {
            Some(TokenKind::Semi) => {
                self.next();
                Ok(())
            }
            Some(TokenKind::Extern) if self.peek_kind_at(1) == Some(TokenKind::StringLiteral) => {
                self.parse_linkage_spec(out)
            }
            Some(TokenKind::Typedef) => self.parse_typedef(),
            _ => {
                let decl = self.parse_function()?;
                out.push(decl);
                Ok(())
            }
        }
    }

    fn parse_linkage_spec(&mut self, out: &mut Vec<FunctionDecl>) -> SyntaxResult<()> {
        self.expect(TokenKind::Extern, "expected 'extern'")?;
        if self.language == Language::C {
            return self.error("expected identifier or '('");
        }
        let lit = self.expect(TokenKind::StringLiteral, "expected string literal")?;
        let linkage = match lit.lexeme {
            "\"C\"" => Linkage::C,
            "\"C++\"" => Linkage::Cxx,
            _ => {
                return Err(SyntaxError::parse("unknown linkage language", lit.span));
            }
        };
        self.linkage.push(linkage);
        let result = self.nested(|p| {
            if p.eat(TokenKind::LBrace) {
                p.parse_linkage_block(out)
            } else {
                p.parse_item(out)
            }
        });
        self.linkage.pop();
        result
    }

    fn parse_linkage_block(&mut self, out: &mut Vec<FunctionDecl>) -> SyntaxResult<()> {
        loop {
            match self.peek_kind() {
                Some(TokenKind::RBrace) => {
                    self.next();
                    return Ok(());
                }
                Some(_) => self.parse_item(out)?,
                None => return self.error("expected '}'"),
            }
        }
    }

    fn parse_typedef(&mut self) -> SyntaxResult<()> {
        self.expect(TokenKind::Typedef, "expected 'typedef'")?;
        if !self.is_type_start_at(0) {
            if let Some(err) = self.unknown_type_name() {
                return Err(err);
            }
            return self.error("expected type");
        }
        let base = self.parse_type_specifiers()?;
        let ty = self.parse_pointers(base);
        let name = self.expect(TokenKind::Identifier, "expected identifier")?;
        self.expect(TokenKind::Semi, "expected ';' after typedef")?;
        self.typedefs.insert(
            name.lexeme.to_string(),
            Typedef {
                ty: ty.ty,
                const_levels: ty.const_levels,
            },
        );
        Ok(())
    }

    fn parse_function(&mut self) -> SyntaxResult<FunctionDecl> {
        let start = self.here();
        while matches!(
            self.peek_kind(),
            Some(TokenKind::Static | TokenKind::Inline | TokenKind::Extern)
        ) {
            self.next();
        }
        if !self.is_type_start_at(0) {
            if let Some(err) = self.unknown_type_name() {
                return Err(err);
            }
            return self.error("expected identifier or '('");
        }
        let linkage = self.current_linkage();
        let base = self.parse_type_specifiers()?;
        let ret = self.parse_pointers(base);
        let name = self.expect(TokenKind::Identifier, "expected identifier or '('")?;
        if !self.check(TokenKind::LParen) {
            return match self.peek_kind() {
                Some(TokenKind::Semi | TokenKind::Assign | TokenKind::Comma | TokenKind::LBracket) => {
                    Err(SyntaxError::parse("global variables are not supported", name.span))
                }
                _ => self.error("expected ';' after top level declarator"),
            };
        }
        let params = self.parse_params()?;
        let body = if self.eat(TokenKind::Semi) {
            None
        } else if self.check(TokenKind::LBrace) {
            Some(self.parse_block()?)
        } else {
            return self.error("expected function body after function declarator");
        };
        Ok(FunctionDecl {
            name: name.lexeme.to_string(),
            name_span: name.span,
            linkage,
            ret,
            params,
            body,
            span: self.span_from(start),
        })
    }

    fn parse_params(&mut self) -> SyntaxResult<Vec<ParamDecl>> {
        self.expect(TokenKind::LParen, "expected '('")?;
        if self.eat(TokenKind::RParen) {
            return Ok(Vec::new());
        }
        if self.check(TokenKind::Void) && self.peek_kind_at(1) == Some(TokenKind::RParen) {
            self.pos += 2;
            return Ok(Vec::new());
        }
        let mut params = Vec::new();
        loop {
            if self.check(TokenKind::Dot) {
                return self.error("variadic functions are not supported");
            }
            if !self.is_type_start_at(0) {
                if let Some(tok) = self.peek().filter(|t| t.kind == TokenKind::Identifier) {
                    return Err(SyntaxError::parse(
                        format!("unknown type name '{}'", tok.lexeme),
                        tok.span,
                    ));
                }
                return self.error("expected parameter declarator");
            }
            let base = self.parse_type_specifiers()?;
            let ty = self.parse_pointers(base);
            let name = match self.peek() {
                Some(tok) if tok.kind == TokenKind::Identifier => {
                    self.next();
                    Some((tok.lexeme.to_string(), tok.span))
                }
                _ => None,
            };
            if self.check(TokenKind::LBracket) {
                return self.error("array parameters are not supported");
            }
            params.push(ParamDecl { name, ty });
            if self.eat(TokenKind::Comma) {
                continue;
            }
            self.expect(TokenKind::RParen, "expected ')'")?;
            return Ok(params);
        }
    }

    //--------------------------------------------------------------------------
    // Types
    //--------------------------------------------------------------------------

    fn parse_type_specifiers(&mut self) -> SyntaxResult<TypeName> {
        let start = self.here();
        let mut spec = Specifiers::default();
        let mut is_const = false;
        let mut words: Vec<String> = Vec::new();

        loop {
            let Some(tok) = self.peek() else { break };
            let conflict = |what: &str| {
                Err(SyntaxError::parse(
                    format!("cannot combine with previous declaration specifier '{what}'"),
                    tok.span,
                ))
            };
            match tok.kind {
                TokenKind::Const => is_const = true,
                TokenKind::Volatile => {}
                TokenKind::Signed => spec.signed = true,
                TokenKind::Unsigned => spec.unsigned = true,
                TokenKind::Short => spec.short = true,
                TokenKind::Long => spec.long += 1,
                TokenKind::Char => spec.char = true,
                TokenKind::Int => spec.int = true,
                TokenKind::Bool => spec.bool = true,
                TokenKind::Int128 => spec.int128 = true,
                TokenKind::Void => spec.void = true,
                TokenKind::Float => spec.float = true,
                TokenKind::Double => spec.double = true,
                TokenKind::Struct => {
                    if spec.any() {
                        return conflict("struct");
                    }
                    self.next();
                    let tag = self.expect(TokenKind::Identifier, "expected identifier after 'struct'")?;
                    spec.named = Some(NativeType::Struct(tag.lexeme.to_string()));
                    spec.named_levels = vec![false];
                    words.push(format!("struct {}", tag.lexeme));
                    continue;
                }
                TokenKind::Identifier if !spec.any() => match self.typedefs.get(tok.lexeme) {
                    Some(def) => {
                        spec.named = Some(def.ty.clone());
                        spec.named_levels = def.const_levels.clone();
                    }
                    None => break,
                },
                _ => break,
            }
            if spec.named.is_some() && tok.kind != TokenKind::Identifier && !matches!(tok.kind, TokenKind::Const | TokenKind::Volatile) {
                return conflict(words.last().map(String::as_str).unwrap_or("type"));
            }
            if tok.kind != TokenKind::Volatile {
                words.push(tok.lexeme.to_string());
            }
            self.next();
        }

        let ty = self.resolve_specifiers(&spec, start)?;
        let mut const_levels = if spec.named.is_some() {
            spec.named_levels.clone()
        } else {
            vec![false]
        };
        if is_const {
            if let Some(last) = const_levels.last_mut() {
                *last = true;
            }
        }
        Ok(TypeName {
            ty,
            const_levels,
            spelling: words.join(" "),
            span: self.span_from(start),
        })
    }

    fn resolve_specifiers(&self, spec: &Specifiers, start: SourceSpan) -> SyntaxResult<NativeType> {
        let fail = |message: &str| Err(SyntaxError::parse(message.to_string(), start));
        if let Some(named) = &spec.named {
            return Ok(named.clone());
        }
        if spec.signed && spec.unsigned {
            return fail("'signed' and 'unsigned' cannot be combined");
        }
        let others = |flags: &[bool]| flags.iter().filter(|f| **f).count();
        let base_count = others(&[
            spec.char,
            spec.bool,
            spec.int128,
            spec.void,
            spec.float,
            spec.double,
        ]);
        if base_count > 1 {
            return fail("cannot combine type specifiers");
        }
        if spec.void {
            if spec.signed || spec.unsigned || spec.short || spec.long > 0 || spec.int {
                return fail("'void' cannot be combined with other type specifiers");
            }
            return Ok(NativeType::Void);
        }
        if spec.float {
            if spec.signed || spec.unsigned || spec.short || spec.long > 0 || spec.int {
                return fail("'float' cannot be combined with other type specifiers");
            }
            return Ok(NativeType::Float(FloatKind::Float));
        }
        if spec.double {
            if spec.long > 0 {
                return fail("'long double' is not supported");
            }
            if spec.signed || spec.unsigned || spec.short || spec.int {
                return fail("'double' cannot be combined with other type specifiers");
            }
            return Ok(NativeType::Float(FloatKind::Double));
        }
        if spec.bool {
            if spec.signed || spec.unsigned || spec.short || spec.long > 0 || spec.int {
                return fail("'bool' cannot be signed or unsigned");
            }
            return Ok(NativeType::Int(IntKind::Bool));
        }
        if spec.char {
            if spec.short || spec.long > 0 || spec.int {
                return fail("'char' cannot be combined with other size specifiers");
            }
            return Ok(NativeType::Int(match (spec.signed, spec.unsigned) {
                (true, _) => IntKind::SChar,
                (_, true) => IntKind::UChar,
                _ => IntKind::Char,
            }));
        }
        if spec.int128 {
            if spec.short || spec.long > 0 || spec.int {
                return fail("'__int128' cannot be combined with other size specifiers");
            }
            return Ok(NativeType::Int(if spec.unsigned {
                IntKind::UInt128
            } else {
                IntKind::Int128
            }));
        }
        let kind = match (spec.short, spec.long) {
            (true, 0) => IntKind::Short,
            (false, 0) => IntKind::Int,
            (false, 1) => IntKind::Long,
            (false, 2) => IntKind::LongLong,
            (true, _) => return fail("'short' and 'long' cannot be combined"),
            (false, _) => return fail("'long long long' is invalid"),
        };
        if !spec.any() {
            return fail("expected type");
        }
        Ok(NativeType::Int(if spec.unsigned {
            kind.to_unsigned()
        } else {
            kind
        }))
    }

    fn parse_pointers(&mut self, mut ty: TypeName) -> TypeName {
        while self.eat(TokenKind::Star) {
            ty.ty = NativeType::pointer_to(ty.ty);
            ty.const_levels.push(false);
            ty.spelling.push('*');
            loop {
                if self.eat(TokenKind::Const) {
                    if let Some(last) = ty.const_levels.last_mut() {
                        *last = true;
                    }
                    ty.spelling.push_str(" const");
                } else if !self.eat(TokenKind::Volatile) {
                    break;
                }
            }
        }
        ty.span = self.span_from(ty.span);
        ty
    }

    //--------------------------------------------------------------------------
    // Statements
    //--------------------------------------------------------------------------

    fn parse_block(&mut self) -> SyntaxResult<Block> {
        let start = self.here();
        self.expect(TokenKind::LBrace, "expected '{'")?;
        let mut stmts = Vec::new();
        loop {
            match self.peek_kind() {
                Some(TokenKind::RBrace) => {
                    self.next();
                    break;
                }
                Some(_) => stmts.push(self.parse_stmt()?),
                None => return self.error("expected '}'"),
            }
        }
        Ok(Block {
            stmts,
            span: self.span_from(start),
        })
    }

    fn parse_stmt(&mut self) -> SyntaxResult<Stmt> {
        self.nested(Self::parse_stmt_at_depth)
    }

    fn parse_stmt_at_depth(&mut self) -> SyntaxResult<Stmt> {
        let start = self.here();
        let kind = match self.peek_kind() {
            Some(TokenKind::LBrace) => StmtKind::Block(self.parse_block()?),
            Some(TokenKind::Semi) => {
                self.next();
                StmtKind::Empty
            }
            Some(TokenKind::If) => {
                self.next();
                self.expect(TokenKind::LParen, "expected '(' after 'if'")?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen, "expected ')'")?;
                let then = Box::new(self.parse_stmt()?);
                let otherwise = if self.eat(TokenKind::Else) {
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                StmtKind::If {
                    cond,
                    then,
                    otherwise,
                }
            }
            Some(TokenKind::While) => {
                self.next();
                self.expect(TokenKind::LParen, "expected '(' after 'while'")?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen, "expected ')'")?;
                let body = Box::new(self.parse_stmt()?);
                StmtKind::While { cond, body }
            }
            Some(TokenKind::Do) => {
                self.next();
                let body = Box::new(self.parse_stmt()?);
                self.expect(TokenKind::While, "expected 'while' in do/while loop")?;
                self.expect(TokenKind::LParen, "expected '(' after 'while'")?;
                let cond = self.parse_expr()?;
                self.expect(TokenKind::RParen, "expected ')'")?;
                self.expect(TokenKind::Semi, "expected ';' after do/while statement")?;
                StmtKind::DoWhile { body, cond }
            }
            Some(TokenKind::For) => self.parse_for()?,
            Some(TokenKind::Return) => {
                self.next();
                let value = if self.check(TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(TokenKind::Semi, "expected ';' after return statement")?;
                StmtKind::Return(value)
            }
            Some(TokenKind::Break) => {
                self.next();
                self.expect(TokenKind::Semi, "expected ';' after break statement")?;
                StmtKind::Break
            }
            Some(TokenKind::Continue) => {
                self.next();
                self.expect(TokenKind::Semi, "expected ';' after continue statement")?;
                StmtKind::Continue
            }
            Some(TokenKind::Static) => {
                return self.error("static local variables are not supported");
            }
            Some(TokenKind::Typedef) => {
                return self.error("local typedefs are not supported");
            }
            _ if self.is_type_start_at(0) && self.peek_kind_at(1) != Some(TokenKind::LParen) => {
                self.parse_declaration()?
            }
            _ => {
                if let Some(err) = self.unknown_type_name() {
                    return Err(err);
                }
                let expr = self.parse_expr()?;
                self.expect(TokenKind::Semi, "expected ';' after expression")?;
                StmtKind::Expr(expr)
            }
        };
        Ok(Stmt {
            kind,
            span: self.span_from(start),
        })
    }

    fn parse_for(&mut self) -> SyntaxResult<StmtKind> {
        self.expect(TokenKind::For, "expected 'for'")?;
        self.expect(TokenKind::LParen, "expected '(' after 'for'")?;
        let init_start = self.here();
        let init = if self.eat(TokenKind::Semi) {
            None
        } else if self.is_type_start_at(0) {
            let kind = self.parse_declaration()?;
            Some(Box::new(Stmt {
                kind,
                span: self.span_from(init_start),
            }))
        } else {
            let expr = self.parse_expr()?;
            self.expect(TokenKind::Semi, "expected ';' in 'for' statement specifier")?;
            Some(Box::new(Stmt {
                kind: StmtKind::Expr(expr),
                span: self.span_from(init_start),
            }))
        };
        let cond = if self.check(TokenKind::Semi) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::Semi, "expected ';' in 'for' statement specifier")?;
        let step = if self.check(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.expect(TokenKind::RParen, "expected ')'")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(StmtKind::For {
            init,
            cond,
            step,
            body,
        })
    }

    fn parse_declaration(&mut self) -> SyntaxResult<StmtKind> {
        let base = self.parse_type_specifiers()?;
        let mut decls = Vec::new();
        loop {
            let ty = self.parse_pointers(base.clone());
            let name = self.expect(TokenKind::Identifier, "expected identifier")?;
            if self.check(TokenKind::LBracket) {
                return self.error("arrays are not supported");
            }
            let init = if self.eat(TokenKind::Assign) {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            decls.push(VarDecl {
                name: name.lexeme.to_string(),
                name_span: name.span,
                ty,
                init,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semi, "expected ';' at end of declaration")?;
        Ok(StmtKind::Decl(decls))
    }

    //--------------------------------------------------------------------------
    // Expressions
    //--------------------------------------------------------------------------

    pub fn parse_expr(&mut self) -> SyntaxResult<Expr> {
        let start = self.here();
        let mut expr = self.parse_assignment()?;
        while self.eat(TokenKind::Comma) {
            let rhs = self.parse_assignment()?;
            expr = Expr {
                kind: ExprKind::Comma(Box::new(expr), Box::new(rhs)),
                span: self.span_from(start),
            };
        }
        Ok(expr)
    }

    fn parse_assignment(&mut self) -> SyntaxResult<Expr> {
        let start = self.here();
        let target = self.parse_conditional()?;
        let op = match self.peek_kind() {
            Some(TokenKind::Assign) => None,
            Some(TokenKind::PlusAssign) => Some(BinOp::Add),
            Some(TokenKind::MinusAssign) => Some(BinOp::Sub),
            Some(TokenKind::StarAssign) => Some(BinOp::Mul),
            Some(TokenKind::SlashAssign) => Some(BinOp::Div),
            Some(TokenKind::PercentAssign) => Some(BinOp::Rem),
            Some(TokenKind::AmpAssign) => Some(BinOp::BitAnd),
            Some(TokenKind::PipeAssign) => Some(BinOp::BitOr),
            Some(TokenKind::CaretAssign) => Some(BinOp::BitXor),
            Some(TokenKind::ShlAssign) => Some(BinOp::Shl),
            Some(TokenKind::ShrAssign) => Some(BinOp::Shr),
            _ => return Ok(target),
        };
        self.next();
        let value = self.nested(Self::parse_assignment)?;
        Ok(Expr {
            kind: ExprKind::Assign {
                op,
                target: Box::new(target),
                value: Box::new(value),
            },
            span: self.span_from(start),
        })
    }

    fn parse_conditional(&mut self) -> SyntaxResult<Expr> {
        let start = self.here();
        let cond = self.parse_binary(1)?;
        if !self.eat(TokenKind::Question) {
            return Ok(cond);
        }
        let then = self.nested(Self::parse_expr)?;
        self.expect(TokenKind::Colon, "expected ':'")?;
        let otherwise = self.nested(Self::parse_conditional)?;
        Ok(Expr {
            kind: ExprKind::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            span: self.span_from(start),
        })
    }

    fn binary_op(kind: TokenKind) -> Option<(BinOp, u8)> {
        use TokenKind::*;
        Some(match kind {
            OrOr => (BinOp::Or, 1),
            AndAnd => (BinOp::And, 2),
            Pipe => (BinOp::BitOr, 3),
            Caret => (BinOp::BitXor, 4),
            Amp => (BinOp::BitAnd, 5),
            EqEq => (BinOp::Eq, 6),
            NotEq => (BinOp::Ne, 6),
            Lt => (BinOp::Lt, 7),
            Le => (BinOp::Le, 7),
            Gt => (BinOp::Gt, 7),
            Ge => (BinOp::Ge, 7),
            Shl => (BinOp::Shl, 8),
            Shr => (BinOp::Shr, 8),
            Plus => (BinOp::Add, 9),
            Minus => (BinOp::Sub, 9),
            Star => (BinOp::Mul, 10),
            Slash => (BinOp::Div, 10),
            Percent => (BinOp::Rem, 10),
            _ => return None,
        })
    }

    /// Precedence climbing over the left-associative binary operators.
    fn parse_binary(&mut self, min_prec: u8) -> SyntaxResult<Expr> {
        let start = self.here();
        let mut lhs = self.parse_unary()?;
        while let Some((op, prec)) = self.peek_kind().and_then(Self::binary_op) {
            if prec < min_prec {
                break;
            }
            self.next();
            let rhs = self.parse_binary(prec + 1)?;
            lhs = Expr {
                kind: ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span: self.span_from(start),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> SyntaxResult<Expr> {
        let start = self.here();
        let op = match self.peek_kind() {
            Some(TokenKind::Minus) => Some(UnOp::Neg),
            Some(TokenKind::Plus) => Some(UnOp::Plus),
            Some(TokenKind::Bang) => Some(UnOp::Not),
            Some(TokenKind::Tilde) => Some(UnOp::BitNot),
            Some(TokenKind::Star) => Some(UnOp::Deref),
            Some(TokenKind::Amp) => Some(UnOp::AddrOf),
            _ => None,
        };
        if let Some(op) = op {
            self.next();
            let operand = self.nested(Self::parse_unary)?;
            return Ok(Expr {
                kind: ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span: self.span_from(start),
            });
        }
        match self.peek_kind() {
            Some(kind @ (TokenKind::PlusPlus | TokenKind::MinusMinus)) => {
                self.next();
                let target = self.nested(Self::parse_unary)?;
                Ok(Expr {
                    kind: ExprKind::Update {
                        target: Box::new(target),
                        increment: kind == TokenKind::PlusPlus,
                        postfix: false,
                    },
                    span: self.span_from(start),
                })
            }
            Some(TokenKind::Sizeof) => {
                self.next();
                if self.check(TokenKind::LParen) && self.is_type_start_at(1) {
                    self.next();
                    let base = self.parse_type_specifiers()?;
                    let ty = self.parse_pointers(base);
                    self.expect(TokenKind::RParen, "expected ')'")?;
                    Ok(Expr {
                        kind: ExprKind::SizeofType(ty),
                        span: self.span_from(start),
                    })
                } else {
                    self.error("sizeof is only supported on type names")
                }
            }
            Some(TokenKind::LParen) if self.is_type_start_at(1) => {
                self.next();
                let base = self.parse_type_specifiers()?;
                let ty = self.parse_pointers(base);
                self.expect(TokenKind::RParen, "expected ')'")?;
                let expr = self.nested(Self::parse_unary)?;
                Ok(Expr {
                    kind: ExprKind::Cast {
                        ty,
                        expr: Box::new(expr),
                    },
                    span: self.span_from(start),
                })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> SyntaxResult<Expr> {
        let start = self.here();
        let mut expr = self.parse_primary()?;
        loop {
            let kind = match self.peek_kind() {
                Some(TokenKind::LParen) => {
                    self.next();
                    let mut args = Vec::new();
                    if !self.eat(TokenKind::RParen) {
                        loop {
                            args.push(self.nested(Self::parse_assignment)?);
                            if self.eat(TokenKind::Comma) {
                                continue;
                            }
                            self.expect(TokenKind::RParen, "expected ')'")?;
                            break;
                        }
                    }
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    }
                }
                Some(kind @ (TokenKind::Arrow | TokenKind::Dot)) => {
                    self.next();
                    let member = self.expect(TokenKind::Identifier, "expected unqualified-id")?;
                    ExprKind::Member {
                        base: Box::new(expr),
                        member: member.lexeme.to_string(),
                        arrow: kind == TokenKind::Arrow,
                    }
                }
                Some(TokenKind::LBracket) => {
                    self.next();
                    let index = self.nested(Self::parse_expr)?;
                    self.expect(TokenKind::RBracket, "expected ']'")?;
                    ExprKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    }
                }
                Some(kind @ (TokenKind::PlusPlus | TokenKind::MinusMinus)) => {
                    self.next();
                    ExprKind::Update {
                        target: Box::new(expr),
                        increment: kind == TokenKind::PlusPlus,
                        postfix: true,
                    }
                }
                _ => return Ok(expr),
            };
            expr = Expr {
                kind,
                span: self.span_from(start),
            };
        }
    }

    fn parse_primary(&mut self) -> SyntaxResult<Expr> {
        let Some(tok) = self.peek() else {
            return self.error("expected expression");
        };
        let kind = match tok.kind {
            TokenKind::IntLiteral => parse_int_literal(tok.lexeme, tok.span)?,
            TokenKind::CharLiteral => ExprKind::Char(parse_char_literal(tok.lexeme, tok.span)?),
            TokenKind::FloatLiteral => ExprKind::FloatLit,
            TokenKind::StringLiteral => {
                // Adjacent literals concatenate.
                while self.peek_kind_at(1) == Some(TokenKind::StringLiteral) {
                    self.next();
                }
                ExprKind::StringLit
            }
            TokenKind::True => ExprKind::Bool(true),
            TokenKind::False => ExprKind::Bool(false),
            TokenKind::Nullptr => ExprKind::Nullptr,
            TokenKind::Identifier => ExprKind::Ident(tok.lexeme.to_string()),
            TokenKind::LParen => {
                let start = tok.span;
                self.next();
                let inner = self.nested(Self::parse_expr)?;
                self.expect(TokenKind::RParen, "expected ')'")?;
                return Ok(Expr {
                    kind: inner.kind,
                    span: self.span_from(start),
                });
            }
            _ => return self.error("expected expression"),
        };
        self.next();
        Ok(Expr {
            kind,
            span: self.span_from(tok.span),
        })
    }
}

fn pointer_depth(ty: &NativeType) -> usize {
    match ty {
        NativeType::Pointer(inner) => 1 + pointer_depth(inner),
        _ => 0,
    }
}

/// Splits an integer literal into value and suffix.
fn parse_int_literal(lexeme: &str, span: SourceSpan) -> SyntaxResult<ExprKind> {
    let digits = lexeme.trim_end_matches(['u', 'U', 'l', 'L']);
    let suffix = &lexeme[digits.len()..];
    let unsigned = suffix.chars().filter(|c| matches!(c, 'u' | 'U')).count();
    let long = suffix.chars().filter(|c| matches!(c, 'l' | 'L')).count();
    if unsigned > 1 || long > 2 {
        return Err(SyntaxError::parse(
            format!("invalid suffix '{suffix}' on integer constant"),
            span,
        ));
    }
    let (radix, body, decimal) =
        if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            (16, hex, false)
        } else if digits.len() > 1 && digits.starts_with('0') {
            if let Some(bad) = digits.chars().find(|c| matches!(c, '8' | '9')) {
                return Err(SyntaxError::parse(
                    format!("invalid digit '{bad}' in octal constant"),
                    span,
                ));
            }
            (8, &digits[1..], false)
        } else {
            (10, digits, true)
        };
    let value = u128::from_str_radix(body, radix)
        .ok()
        .filter(|v| *v <= u64::MAX as u128)
        .ok_or_else(|| {
            SyntaxError::parse(
                "integer literal is too large to be represented in any integer type",
                span,
            )
        })?;
    Ok(ExprKind::Int {
        value,
        unsigned: unsigned == 1,
        long: long as u8,
        decimal,
    })
}

fn parse_char_literal(lexeme: &str, span: SourceSpan) -> SyntaxResult<i64> {
    let inner = &lexeme[1..lexeme.len() - 1];
    let mut chars = inner.chars();
    let value = match chars.next() {
        Some('\\') => {
            let escape = chars.next().unwrap_or('\\');
            match escape {
                'n' => 10,
                't' => 9,
                'r' => 13,
                'a' => 7,
                'b' => 8,
                'f' => 12,
                'v' => 11,
                '\\' | '\'' | '"' | '?' => escape as i64,
                'x' => {
                    let hex: String = chars.by_ref().collect();
                    i64::from_str_radix(&hex, 16)
                        .map_err(|_| SyntaxError::parse("\\x used with no following hex digits", span))?
                }
                '0'..='7' => {
                    let mut octal = String::from(escape);
                    octal.extend(chars.by_ref().take(2));
                    i64::from_str_radix(&octal, 8)
                        .map_err(|_| SyntaxError::parse("invalid octal escape", span))?
                }
                other => {
                    return Err(SyntaxError::parse(
                        format!("unknown escape sequence '\\{other}'"),
                        span,
                    ))
                }
            }
        }
        Some(c) => c as i64,
        None => return Err(SyntaxError::parse("empty character constant", span)),
    };
    if chars.next().is_some() {
        return Err(SyntaxError::parse("multi-character character constant", span));
    }
    Ok(value)
}
