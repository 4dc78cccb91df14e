//! Syntax tree produced by the parser.
//!
//! Types are already resolved through typedefs here, but the spelling the
//! user wrote is kept for the function catalog.

use kiln_ir::NativeType;
use miette::SourceSpan;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeName {
    pub ty: NativeType,
    /// `const` at each pointer depth; index 0 is the base type.
    pub const_levels: Vec<bool>,
    pub spelling: String,
    pub span: SourceSpan,
}

impl TypeName {
    pub fn pointer_depth(&self) -> usize {
        self.const_levels.len().saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Linkage {
    /// `extern "C"` or a C translation unit: the plain name.
    C,
    /// Decorated C++ name.
    Cxx,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationUnit {
    pub functions: Vec<FunctionDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    pub name: Option<(String, SourceSpan)>,
    pub ty: TypeName,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: String,
    pub name_span: SourceSpan,
    pub linkage: Linkage,
    pub ret: TypeName,
    pub params: Vec<ParamDecl>,
    /// `None` for a prototype.
    pub body: Option<Block>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarDecl {
    pub name: String,
    pub name_span: SourceSpan,
    pub ty: TypeName,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    Decl(Vec<VarDecl>),
    Expr(Expr),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then: Box<Stmt>,
        otherwise: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Block(Block),
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,
    Plus,
    Not,
    BitNot,
    Deref,
    AddrOf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    /// Integer literal with its suffix already split off.
    Int {
        value: u128,
        unsigned: bool,
        long: u8,
        decimal: bool,
    },
    Char(i64),
    FloatLit,
    StringLit,
    Bool(bool),
    Nullptr,
    Ident(String),
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    /// `++x`, `x--` and friends.
    Update {
        target: Box<Expr>,
        increment: bool,
        postfix: bool,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `=` when `op` is `None`, compound assignment otherwise.
    Assign {
        op: Option<BinOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Cast {
        ty: TypeName,
        expr: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `base->member` or `base.member`.
    Member {
        base: Box<Expr>,
        member: String,
        arrow: bool,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    SizeofType(TypeName),
    Comma(Box<Expr>, Box<Expr>),
}
