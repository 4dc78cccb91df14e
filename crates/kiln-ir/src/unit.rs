//! The typed intermediate unit.
//!
//! The front-end lowers checked source into this form; the engine turns it
//! into machine code. All implicit C conversions are explicit here as
//! [`ExprKind::Convert`] nodes, so every operand of a [`ExprKind::Binary`]
//! or [`ExprKind::Compare`] already has the operation's type.

use crate::builtins::Builtin;
use crate::types::NativeType;
use kiln_source::OptLevel;

/// Index of a function within [`IntermediateUnit::functions`].
pub type FunctionIndex = usize;

/// A local variable slot. Parameters occupy the first slots, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u32);

impl LocalId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntermediateUnit {
    pub file_name: String,
    /// Defined functions in declaration order.
    pub functions: Vec<FunctionDef>,
    /// Set when the flags named an optimisation level.
    pub opt_level: Option<OptLevel>,
}

impl IntermediateUnit {
    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: Option<String>,
    pub ty: NativeType,
    /// The type as written, e.g. `jstring` or `unsigned char`.
    pub spelling: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    pub name: String,
    pub ty: NativeType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    /// Decorated (linker) name.
    pub name: String,
    /// Name as written in the source.
    pub source_name: String,
    pub params: Vec<Param>,
    pub ret: NativeType,
    pub ret_spelling: String,
    /// Every local slot; the first `params.len()` are the parameters.
    pub locals: Vec<Local>,
    pub body: Vec<Stmt>,
}

impl FunctionDef {
    pub fn local_type(&self, id: LocalId) -> Option<&NativeType> {
        self.locals.get(id.index()).map(|l| &l.ty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Expr(Expr),
    Return(Option<Expr>),
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
    /// `while`, `for` and `do`/`while`. A missing condition loops forever.
    Loop {
        cond: Option<Expr>,
        body: Vec<Stmt>,
        step: Option<Expr>,
        /// `false` for `do`/`while`.
        test_first: bool,
    },
    Break,
    Continue,
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: NativeType,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: NativeType) -> Self {
        Self { kind, ty }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
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
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    BitNot,
    /// Logical not; yields `int` 0 or 1.
    Not,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callee {
    Function(FunctionIndex),
    Builtin(Builtin),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    IntConst(i128),
    /// The null pointer of the expression's type.
    Null,
    Local(LocalId),
    /// Stores `value` (already of the local's type) and yields it.
    Assign {
        local: LocalId,
        value: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Yields `int` 0 or 1. Signedness comes from the operand type.
    Compare {
        op: CompareOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    LogicalAnd(Box<Expr>, Box<Expr>),
    LogicalOr(Box<Expr>, Box<Expr>),
    Conditional {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    /// Converts the operand to this expression's type. A conversion to
    /// `void` evaluates and discards.
    Convert(Box<Expr>),
    Call {
        callee: Callee,
        args: Vec<Expr>,
    },
    FunctionAddress(FunctionIndex),
    /// Evaluates the first operand for its effects, yields the second.
    Comma(Box<Expr>, Box<Expr>),
    /// `++`/`--` on a local; `post` yields the old value.
    Update {
        local: LocalId,
        delta: i64,
        post: bool,
    },
}
