//! Semantic checks and lowering into the intermediate unit.
//!
//! Checking never stops at the first problem: each error is pushed onto the
//! diagnostics list and the offending expression lowers to `None`, so the
//! rest of the function is still checked. A unit lowered with errors is
//! never handed to the engine.
//!
//! Every implicit C conversion is made explicit here, so the engine only
//! sees operands that already have their operation's type.

use crate::ast::{self, BinOp, FunctionDecl, Linkage, StmtKind, TranslationUnit, UnOp};
use crate::flags::Language;
use crate::mangle;
use kiln_ir::{
    BinaryOp, Builtin, Callee, CompareOp, Expr, ExprKind, FunctionDef, FunctionIndex, IntKind,
    IntermediateUnit, Local, LocalId, NativeType, Param, Stmt, UnaryOp,
};
use kiln_source::{Diagnostic, Diagnostics, SourceSpan};
use rustc_hash::{FxHashMap, FxHashSet};

const SEMA: &str = "kiln_syntax::sema";
const WARNING: &str = "kiln_syntax::warning";

/// A declared function, possibly without a body.
#[derive(Debug)]
struct Signature {
    name: String,
    source_name: String,
    params: Vec<NativeType>,
    ret: NativeType,
    /// Index of the first declaration in the translation unit.
    first_seen: usize,
    /// Position in the unit's function list once a body is known.
    defined: Option<FunctionIndex>,
}

/// Lowers a parsed translation unit.
///
/// `builtins_visible` is set when `<jni.h>` was included, which makes the
/// environment functions callable by their bare names.
pub fn lower(
    tu: &TranslationUnit,
    language: Language,
    builtins_visible: bool,
    file_name: &str,
    diagnostics: &mut Diagnostics,
) -> IntermediateUnit {
    let mut checker = Checker {
        language,
        builtins_visible,
        diagnostics,
        signatures: Vec::new(),
        by_source: FxHashMap::default(),
        position: 0,
        ret: NativeType::Void,
        function_name: String::new(),
        locals: Vec::new(),
        const_locals: Vec::new(),
        scopes: Vec::new(),
        loop_depth: 0,
    };
    let definitions = checker.declare_all(tu);
    let mut functions = Vec::with_capacity(definitions.len());
    for (position, signature, decl) in definitions {
        functions.push(checker.function(position, signature, decl));
    }
    log::debug!("lowered {} function(s) from {}", functions.len(), file_name);
    IntermediateUnit {
        file_name: file_name.to_string(),
        functions,
        opt_level: None,
    }
}

struct Checker<'d> {
    language: Language,
    builtins_visible: bool,
    diagnostics: &'d mut Diagnostics,
    signatures: Vec<Signature>,
    by_source: FxHashMap<String, Vec<usize>>,

    // State of the function being lowered.
    position: usize,
    ret: NativeType,
    function_name: String,
    locals: Vec<Local>,
    const_locals: Vec<bool>,
    scopes: Vec<FxHashMap<String, LocalId>>,
    loop_depth: usize,
}

impl<'d> Checker<'d> {
    fn error(&mut self, span: SourceSpan, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::error(message).with_span(span).with_code(SEMA));
    }

    fn warn(&mut self, span: SourceSpan, message: impl Into<String>) {
        self.diagnostics
            .push(Diagnostic::warning(message).with_span(span).with_code(WARNING));
    }

    /// The type of comparisons and logical operators.
    fn truth_type(&self) -> NativeType {
        match self.language {
            Language::C => NativeType::INT,
            Language::Cxx => NativeType::Int(IntKind::Bool),
        }
    }

    //--------------------------------------------------------------------------
    // Declarations
    //--------------------------------------------------------------------------

    fn declare_all<'t>(&mut self, tu: &'t TranslationUnit) -> Vec<(usize, usize, &'t FunctionDecl)> {
        let mut by_name: FxHashMap<String, usize> = FxHashMap::default();
        let mut definitions = Vec::new();
        for (position, decl) in tu.functions.iter().enumerate() {
            if !self.check_signature(decl) {
                continue;
            }
            let name = match (decl.linkage, decl.name.as_str()) {
                (Linkage::Cxx, name) if name != "main" => {
                    let params: Vec<_> = decl.params.iter().map(|p| p.ty.clone()).collect();
                    mangle::decorate(name, &params)
                }
                _ => decl.name.clone(),
            };
            let params: Vec<NativeType> = decl.params.iter().map(|p| p.ty.ty.clone()).collect();
            let index = match by_name.get(&name) {
                Some(&index) => {
                    let existing = &self.signatures[index];
                    if existing.params != params || existing.ret != decl.ret.ty {
                        self.error(decl.name_span, format!("conflicting types for '{}'", decl.name));
                        continue;
                    }
                    index
                }
                None => {
                    let index = self.signatures.len();
                    self.signatures.push(Signature {
                        name: name.clone(),
                        source_name: decl.name.clone(),
                        params,
                        ret: decl.ret.ty.clone(),
                        first_seen: position,
                        defined: None,
                    });
                    self.by_source.entry(decl.name.clone()).or_default().push(index);
                    by_name.insert(name, index);
                    index
                }
            };
            if decl.body.is_some() {
                if self.signatures[index].defined.is_some() {
                    self.error(decl.name_span, format!("redefinition of '{}'", decl.name));
                    continue;
                }
                self.signatures[index].defined = Some(definitions.len());
                definitions.push((position, index, decl));
            }
        }
        definitions
    }

    fn check_signature(&mut self, decl: &FunctionDecl) -> bool {
        let mut ok = true;
        if let NativeType::Struct(tag) = &decl.ret.ty {
            self.error(
                decl.ret.span,
                format!("incomplete result type 'struct {tag}' in function definition"),
            );
            ok = false;
        }
        let mut seen = FxHashSet::default();
        for param in &decl.params {
            match &param.ty.ty {
                NativeType::Void => {
                    self.error(param.ty.span, "parameter cannot have type 'void'");
                    ok = false;
                }
                NativeType::Struct(tag) => {
                    self.error(
                        param.ty.span,
                        format!("variable has incomplete type 'struct {tag}'"),
                    );
                    ok = false;
                }
                _ => {}
            }
            if let Some((name, span)) = &param.name {
                if !seen.insert(name.as_str()) {
                    self.error(*span, format!("redefinition of parameter '{name}'"));
                    ok = false;
                }
            }
        }
        ok
    }

    fn visible(&self, name: &str) -> Vec<usize> {
        self.by_source
            .get(name)
            .map(|candidates| {
                candidates
                    .iter()
                    .copied()
                    .filter(|i| self.signatures[*i].first_seen <= self.position)
                    .collect()
            })
            .unwrap_or_default()
    }

    //--------------------------------------------------------------------------
    // Functions and statements
    //--------------------------------------------------------------------------

    fn function(&mut self, position: usize, signature: usize, decl: &FunctionDecl) -> FunctionDef {
        self.position = position;
        self.ret = decl.ret.ty.clone();
        self.function_name = decl.name.clone();
        self.locals.clear();
        self.const_locals.clear();
        self.scopes = vec![FxHashMap::default()];
        self.loop_depth = 0;

        let mut params = Vec::with_capacity(decl.params.len());
        for param in &decl.params {
            let is_const = param.ty.const_levels.last().copied().unwrap_or(false);
            match &param.name {
                Some((name, span)) => {
                    self.declare(name, param.ty.ty.clone(), is_const, *span);
                }
                None => {
                    self.locals.push(Local {
                        name: String::new(),
                        ty: param.ty.ty.clone(),
                    });
                    self.const_locals.push(is_const);
                }
            }
            params.push(Param {
                name: param.name.as_ref().map(|(name, _)| name.clone()),
                ty: param.ty.ty.clone(),
                spelling: param.ty.spelling.clone(),
            });
        }

        let mut body = Vec::new();
        if let Some(block) = &decl.body {
            for stmt in &block.stmts {
                self.stmt(stmt, &mut body);
            }
            if !self.ret.is_void() && completes(&body) {
                if decl.name == "main" {
                    let zero = Expr::new(ExprKind::IntConst(0), self.ret.clone());
                    body.push(Stmt::Return(Some(zero)));
                } else {
                    let end = block.span.offset() + block.span.len().saturating_sub(1);
                    let message = if contains_return(&body) {
                        "non-void function does not return a value in all control paths"
                    } else {
                        "non-void function does not return a value"
                    };
                    self.warn(SourceSpan::from((end, 1)), message);
                }
            }
        }

        let signature = &self.signatures[signature];
        FunctionDef {
            name: signature.name.clone(),
            source_name: signature.source_name.clone(),
            params,
            ret: decl.ret.ty.clone(),
            ret_spelling: decl.ret.spelling.clone(),
            locals: std::mem::take(&mut self.locals),
            body,
        }
    }

    fn declare(&mut self, name: &str, ty: NativeType, is_const: bool, span: SourceSpan) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(Local {
            name: name.to_string(),
            ty,
        });
        self.const_locals.push(is_const);
        let redefined = match self.scopes.last_mut() {
            Some(scope) => scope.insert(name.to_string(), id).is_some(),
            None => false,
        };
        if redefined {
            self.error(span, format!("redefinition of '{name}'"));
        }
        id
    }

    fn lookup(&self, name: &str) -> Option<LocalId> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name).copied())
    }

    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.scopes.push(FxHashMap::default());
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn stmts_of(&mut self, stmt: &ast::Stmt) -> Vec<Stmt> {
        self.scoped(|this| {
            let mut out = Vec::new();
            this.stmt(stmt, &mut out);
            out
        })
    }

    fn loop_body(&mut self, stmt: &ast::Stmt) -> Vec<Stmt> {
        self.loop_depth += 1;
        let body = self.stmts_of(stmt);
        self.loop_depth -= 1;
        body
    }

    fn stmt(&mut self, stmt: &ast::Stmt, out: &mut Vec<Stmt>) {
        match &stmt.kind {
            StmtKind::Decl(decls) => {
                for decl in decls {
                    self.local_decl(decl, out);
                }
            }
            StmtKind::Expr(expr) => {
                if let Some(lowered) = self.expr(expr) {
                    if result_unused(&lowered) {
                        self.warn(expr.span, "expression result unused");
                    }
                    out.push(Stmt::Expr(lowered));
                }
            }
            StmtKind::Return(value) => self.return_stmt(value.as_ref(), stmt.span, out),
            StmtKind::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.condition(cond);
                let then = self.stmts_of(then);
                let otherwise = match otherwise {
                    Some(otherwise) => self.stmts_of(otherwise),
                    None => Vec::new(),
                };
                if let Some(cond) = cond {
                    out.push(Stmt::If {
                        cond,
                        then,
                        otherwise,
                    });
                }
            }
            StmtKind::While { cond, body } => {
                let cond = self.condition(cond);
                let body = self.loop_body(body);
                if let Some(cond) = cond {
                    out.push(Stmt::Loop {
                        cond: Some(cond),
                        body,
                        step: None,
                        test_first: true,
                    });
                }
            }
            StmtKind::DoWhile { body, cond } => {
                let body = self.loop_body(body);
                if let Some(cond) = self.condition(cond) {
                    out.push(Stmt::Loop {
                        cond: Some(cond),
                        body,
                        step: None,
                        test_first: false,
                    });
                }
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                let lowered = self.scoped(|this| {
                    let mut block = Vec::new();
                    if let Some(init) = init {
                        this.stmt(init, &mut block);
                    }
                    let cond = match cond {
                        Some(cond) => Some(this.condition(cond)?),
                        None => None,
                    };
                    let step = match step {
                        Some(step) => Some(this.expr(step)?),
                        None => None,
                    };
                    let body = this.loop_body(body);
                    block.push(Stmt::Loop {
                        cond,
                        body,
                        step,
                        test_first: true,
                    });
                    Some(block)
                });
                if let Some(block) = lowered {
                    out.push(Stmt::Block(block));
                }
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    self.error(stmt.span, "'break' statement not in loop or switch statement");
                }
                out.push(Stmt::Break);
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    self.error(stmt.span, "'continue' statement not in loop statement");
                }
                out.push(Stmt::Continue);
            }
            StmtKind::Block(block) => {
                let stmts = self.scoped(|this| {
                    let mut inner = Vec::new();
                    for stmt in &block.stmts {
                        this.stmt(stmt, &mut inner);
                    }
                    inner
                });
                out.push(Stmt::Block(stmts));
            }
            StmtKind::Empty => {}
        }
    }

    fn local_decl(&mut self, decl: &ast::VarDecl, out: &mut Vec<Stmt>) {
        match &decl.ty.ty {
            NativeType::Void => {
                self.error(decl.name_span, "variable has incomplete type 'void'");
                return;
            }
            NativeType::Struct(tag) => {
                self.error(
                    decl.name_span,
                    format!("variable has incomplete type 'struct {tag}'"),
                );
                return;
            }
            _ => {}
        }
        let ty = decl.ty.ty.clone();
        let is_const = decl.ty.const_levels.last().copied().unwrap_or(false);
        let id = self.declare(&decl.name, ty.clone(), is_const, decl.name_span);
        if let Some(init) = &decl.init {
            let Some(value) = self.expr(init) else { return };
            if let Some(value) = self.implicit(value, &ty, init.span) {
                out.push(Stmt::Expr(Expr::new(
                    ExprKind::Assign {
                        local: id,
                        value: Box::new(value),
                    },
                    ty,
                )));
            }
        }
    }

    /// A return that fails to check still ends the path, so the missing
    /// return warning does not pile onto the error.
    fn return_stmt(&mut self, value: Option<&ast::Expr>, span: SourceSpan, out: &mut Vec<Stmt>) {
        let lowered = self.return_value(value, span, out);
        out.push(Stmt::Return(lowered));
    }

    fn return_value(&mut self, value: Option<&ast::Expr>, span: SourceSpan, out: &mut Vec<Stmt>) -> Option<Expr> {
        let name = self.function_name.clone();
        let Some(value) = value else {
            if !self.ret.is_void() {
                self.error(span, format!("non-void function '{name}' should return a value"));
            }
            return None;
        };
        let lowered = self.expr(value)?;
        if self.ret.is_void() {
            if lowered.ty.is_void() {
                out.push(Stmt::Expr(lowered));
            } else {
                self.error(
                    value.span,
                    format!("void function '{name}' should not return a value"),
                );
            }
            return None;
        }
        let ret = self.ret.clone();
        self.implicit(lowered, &ret, value.span)
    }

    fn condition(&mut self, expr: &ast::Expr) -> Option<Expr> {
        let lowered = self.expr(expr)?;
        if lowered.ty.is_integer() || lowered.ty.is_pointer() {
            return Some(lowered);
        }
        if lowered.ty.is_float() {
            self.error(expr.span, "floating-point arithmetic is not supported");
        } else {
            self.error(
                expr.span,
                format!(
                    "statement requires expression of scalar type ('{}' invalid)",
                    lowered.ty
                ),
            );
        }
        None
    }

    //--------------------------------------------------------------------------
    // Expressions
    //--------------------------------------------------------------------------

    fn expr(&mut self, expr: &ast::Expr) -> Option<Expr> {
        let span = expr.span;
        match &expr.kind {
            ast::ExprKind::Int {
                value,
                unsigned,
                long,
                decimal,
            } => Some(self.int_literal(*value, *unsigned, *long, *decimal, span)),
            ast::ExprKind::Char(value) => {
                let ty = match self.language {
                    Language::C => NativeType::INT,
                    Language::Cxx => NativeType::Int(IntKind::Char),
                };
                Some(Expr::new(ExprKind::IntConst(*value as i128), ty))
            }
            ast::ExprKind::Bool(value) => Some(Expr::new(
                ExprKind::IntConst(*value as i128),
                self.truth_type(),
            )),
            ast::ExprKind::Nullptr => {
                if self.language == Language::C {
                    self.error(span, "use of undeclared identifier 'nullptr'");
                    return None;
                }
                Some(Expr::new(
                    ExprKind::Null,
                    NativeType::pointer_to(NativeType::Void),
                ))
            }
            ast::ExprKind::FloatLit => {
                self.error(span, "floating-point arithmetic is not supported");
                None
            }
            ast::ExprKind::StringLit => {
                self.error(span, "string literals are not supported");
                None
            }
            ast::ExprKind::Ident(name) => self.ident(name, span),
            ast::ExprKind::Unary { op, operand } => self.unary(*op, operand, span),
            ast::ExprKind::Update {
                target,
                increment,
                postfix,
            } => {
                let (local, ty) = self.assignable(target)?;
                if !ty.is_integer() {
                    if ty.is_pointer() {
                        self.error(span, "pointer arithmetic is not supported");
                    } else {
                        self.error(span, "floating-point arithmetic is not supported");
                    }
                    return None;
                }
                Some(Expr::new(
                    ExprKind::Update {
                        local,
                        delta: if *increment { 1 } else { -1 },
                        post: *postfix,
                    },
                    ty,
                ))
            }
            ast::ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.expr(lhs);
                let rhs = self.expr(rhs);
                self.binary(*op, lhs?, rhs?, span)
            }
            ast::ExprKind::Assign { op, target, value } => {
                let target = self.assignable(target);
                let value = self.expr(value);
                let ((local, ty), value) = (target?, value?);
                let stored = match op {
                    None => self.implicit(value, &ty, span)?,
                    Some(op) => {
                        let current = Expr::new(ExprKind::Local(local), ty.clone());
                        let combined = self.binary(*op, current, value, span)?;
                        convert(combined, &ty)
                    }
                };
                Some(Expr::new(
                    ExprKind::Assign {
                        local,
                        value: Box::new(stored),
                    },
                    ty,
                ))
            }
            ast::ExprKind::Conditional {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.condition(cond);
                let then = self.expr(then);
                let otherwise = self.expr(otherwise);
                self.conditional(cond?, then?, otherwise?, span)
            }
            ast::ExprKind::Cast { ty, expr: operand } => {
                let operand = self.expr(operand)?;
                self.cast(operand, &ty.ty, span)
            }
            ast::ExprKind::Call { callee, args } => self.call(callee, args, span),
            ast::ExprKind::Member { .. } => {
                self.error(span, "member access is only supported for environment calls");
                None
            }
            ast::ExprKind::Index { .. } => {
                self.error(span, "array subscripts are not supported");
                None
            }
            ast::ExprKind::SizeofType(ty) => {
                let bytes = match &ty.ty {
                    NativeType::Int(kind) => kind.bits() / 8,
                    NativeType::Float(kind) => kind.bits() / 8,
                    NativeType::Pointer(_) | NativeType::Function => 8,
                    other => {
                        self.error(
                            span,
                            format!("invalid application of 'sizeof' to an incomplete type '{other}'"),
                        );
                        return None;
                    }
                };
                Some(Expr::new(
                    ExprKind::IntConst(bytes as i128),
                    NativeType::Int(IntKind::ULong),
                ))
            }
            ast::ExprKind::Comma(lhs, rhs) => {
                let lhs = self.expr(lhs);
                let rhs = self.expr(rhs);
                let (lhs, rhs) = (lhs?, rhs?);
                let ty = rhs.ty.clone();
                Some(Expr::new(ExprKind::Comma(Box::new(lhs), Box::new(rhs)), ty))
            }
        }
    }

    fn int_literal(&mut self, value: u128, unsigned: bool, long: u8, decimal: bool, span: SourceSpan) -> Expr {
        use IntKind::*;
        let candidates: &[IntKind] = match (unsigned, long, decimal) {
            (false, 0, true) => &[Int, Long],
            (false, 0, false) => &[Int, UInt, Long, ULong],
            (true, 0, _) => &[UInt, ULong],
            (false, 1, true) => &[Long],
            (false, 1, false) => &[Long, ULong],
            (true, 1, _) => &[ULong],
            (false, _, true) => &[LongLong],
            (false, _, false) => &[LongLong, ULongLong],
            (true, _, _) => &[ULongLong],
        };
        let kind = match candidates.iter().find(|kind| value <= max_value(**kind)) {
            Some(kind) => *kind,
            None => {
                self.warn(
                    span,
                    "integer literal is too large to be represented in a signed integer type, interpreting as unsigned",
                );
                if long >= 2 {
                    ULongLong
                } else {
                    ULong
                }
            }
        };
        Expr::new(ExprKind::IntConst(value as i128), NativeType::Int(kind))
    }

    fn ident(&mut self, name: &str, span: SourceSpan) -> Option<Expr> {
        if let Some(id) = self.lookup(name) {
            let ty = self.locals[id.index()].ty.clone();
            return Some(Expr::new(ExprKind::Local(id), ty));
        }
        match self.visible(name).as_slice() {
            [] => {
                self.error(span, format!("use of undeclared identifier '{name}'"));
                None
            }
            [single] => match self.signatures[*single].defined {
                Some(index) => Some(Expr::new(ExprKind::FunctionAddress(index), NativeType::Function)),
                None => {
                    self.error(span, format!("undefined reference to '{name}'"));
                    None
                }
            },
            _ => {
                self.error(
                    span,
                    format!("reference to overloaded function '{name}' could not be resolved"),
                );
                None
            }
        }
    }

    fn assignable(&mut self, target: &ast::Expr) -> Option<(LocalId, NativeType)> {
        let ast::ExprKind::Ident(name) = &target.kind else {
            self.error(target.span, "expression is not assignable");
            return None;
        };
        match self.lookup(name) {
            Some(id) => {
                let ty = self.locals[id.index()].ty.clone();
                if self.const_locals[id.index()] {
                    self.error(
                        target.span,
                        format!("cannot assign to variable '{name}' with const-qualified type"),
                    );
                    return None;
                }
                Some((id, ty))
            }
            None if self.visible(name).is_empty() => {
                self.error(target.span, format!("use of undeclared identifier '{name}'"));
                None
            }
            None => {
                self.error(target.span, "non-object type is not assignable");
                None
            }
        }
    }

    fn unary(&mut self, op: UnOp, operand: &ast::Expr, span: SourceSpan) -> Option<Expr> {
        match op {
            UnOp::Deref => {
                self.error(span, "pointer dereference is not supported");
                return None;
            }
            UnOp::AddrOf => {
                self.error(span, "taking the address of a value is not supported");
                return None;
            }
            _ => {}
        }
        let operand = self.expr(operand)?;
        if op == UnOp::Not {
            if !(operand.ty.is_integer() || operand.ty.is_pointer()) {
                self.invalid_unary(&operand.ty, span);
                return None;
            }
            return Some(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                self.truth_type(),
            ));
        }
        let Some(kind) = operand.ty.int_kind() else {
            self.invalid_unary(&operand.ty, span);
            return None;
        };
        let promoted = NativeType::Int(promote(kind));
        let operand = convert(operand, &promoted);
        let op = match op {
            UnOp::Neg => UnaryOp::Neg,
            UnOp::BitNot => UnaryOp::BitNot,
            _ => return Some(operand),
        };
        Some(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            promoted,
        ))
    }

    fn invalid_unary(&mut self, ty: &NativeType, span: SourceSpan) {
        if ty.is_float() {
            self.error(span, "floating-point arithmetic is not supported");
        } else {
            self.error(span, format!("invalid argument type '{ty}' to unary expression"));
        }
    }

    fn binary(&mut self, op: BinOp, lhs: Expr, rhs: Expr, span: SourceSpan) -> Option<Expr> {
        if lhs.ty.is_float() || rhs.ty.is_float() {
            self.error(span, "floating-point arithmetic is not supported");
            return None;
        }
        let op = match op {
            BinOp::And | BinOp::Or => {
                if !(is_scalar(&lhs.ty) && is_scalar(&rhs.ty)) {
                    self.invalid_operands(&lhs.ty, &rhs.ty, span);
                    return None;
                }
                let (lhs, rhs) = (Box::new(lhs), Box::new(rhs));
                let kind = if op == BinOp::And {
                    ExprKind::LogicalAnd(lhs, rhs)
                } else {
                    ExprKind::LogicalOr(lhs, rhs)
                };
                return Some(Expr::new(kind, self.truth_type()));
            }
            BinOp::Eq => return self.compare(CompareOp::Eq, lhs, rhs, span),
            BinOp::Ne => return self.compare(CompareOp::Ne, lhs, rhs, span),
            BinOp::Lt => return self.compare(CompareOp::Lt, lhs, rhs, span),
            BinOp::Le => return self.compare(CompareOp::Le, lhs, rhs, span),
            BinOp::Gt => return self.compare(CompareOp::Gt, lhs, rhs, span),
            BinOp::Ge => return self.compare(CompareOp::Ge, lhs, rhs, span),
            BinOp::Add => BinaryOp::Add,
            BinOp::Sub => BinaryOp::Sub,
            BinOp::Mul => BinaryOp::Mul,
            BinOp::Div => BinaryOp::Div,
            BinOp::Rem => BinaryOp::Rem,
            BinOp::Shl => BinaryOp::Shl,
            BinOp::Shr => BinaryOp::Shr,
            BinOp::BitAnd => BinaryOp::BitAnd,
            BinOp::BitOr => BinaryOp::BitOr,
            BinOp::BitXor => BinaryOp::BitXor,
        };
        let (Some(left), Some(right)) = (lhs.ty.int_kind(), rhs.ty.int_kind()) else {
            if matches!(op, BinaryOp::Add | BinaryOp::Sub) && (lhs.ty.is_pointer() || rhs.ty.is_pointer()) {
                self.error(span, "pointer arithmetic is not supported");
            } else {
                self.invalid_operands(&lhs.ty, &rhs.ty, span);
            }
            return None;
        };
        let ty = match op {
            BinaryOp::Shl | BinaryOp::Shr => NativeType::Int(promote(left)),
            _ => NativeType::Int(common(left, right)),
        };
        if matches!(op, BinaryOp::Div | BinaryOp::Rem) && ty.int_kind().map(IntKind::bits) == Some(128) {
            self.error(span, "division of 128-bit integers is not supported");
            return None;
        }
        Some(Expr::new(
            ExprKind::Binary {
                op,
                lhs: Box::new(convert(lhs, &ty)),
                rhs: Box::new(convert(rhs, &ty)),
            },
            ty,
        ))
    }

    fn invalid_operands(&mut self, lhs: &NativeType, rhs: &NativeType, span: SourceSpan) {
        self.error(
            span,
            format!("invalid operands to binary expression ('{lhs}' and '{rhs}')"),
        );
    }

    fn compare(&mut self, op: CompareOp, lhs: Expr, rhs: Expr, span: SourceSpan) -> Option<Expr> {
        let (lhs, rhs) = match (lhs.ty.int_kind(), rhs.ty.int_kind()) {
            (Some(left), Some(right)) => {
                let ty = NativeType::Int(common(left, right));
                (convert(lhs, &ty), convert(rhs, &ty))
            }
            _ if lhs.ty.is_pointer() && is_null_constant(&rhs) => {
                let ty = lhs.ty.clone();
                (lhs, null_of(&ty))
            }
            _ if rhs.ty.is_pointer() && is_null_constant(&lhs) => {
                let ty = rhs.ty.clone();
                (null_of(&ty), rhs)
            }
            _ if lhs.ty.is_pointer() && rhs.ty.is_pointer() => {
                if !pointers_compatible(&lhs.ty, &rhs.ty) && !pointers_compatible(&rhs.ty, &lhs.ty) {
                    self.warn(
                        span,
                        format!(
                            "comparison of distinct pointer types ('{}' and '{}')",
                            lhs.ty, rhs.ty
                        ),
                    );
                }
                let ty = lhs.ty.clone();
                (lhs, convert(rhs, &ty))
            }
            _ if lhs.ty.is_pointer() || rhs.ty.is_pointer() => {
                self.error(
                    span,
                    format!(
                        "comparison between pointer and integer ('{}' and '{}')",
                        lhs.ty, rhs.ty
                    ),
                );
                return None;
            }
            _ => {
                self.invalid_operands(&lhs.ty, &rhs.ty, span);
                return None;
            }
        };
        Some(Expr::new(
            ExprKind::Compare {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            self.truth_type(),
        ))
    }

    fn conditional(&mut self, cond: Expr, then: Expr, otherwise: Expr, span: SourceSpan) -> Option<Expr> {
        let ty = match (then.ty.int_kind(), otherwise.ty.int_kind()) {
            (Some(left), Some(right)) => NativeType::Int(common(left, right)),
            _ if then.ty == otherwise.ty => then.ty.clone(),
            _ if then.ty.is_pointer() && is_null_constant(&otherwise) => then.ty.clone(),
            _ if otherwise.ty.is_pointer() && is_null_constant(&then) => otherwise.ty.clone(),
            _ => {
                self.error(
                    span,
                    format!(
                        "incompatible operand types ('{}' and '{}')",
                        then.ty, otherwise.ty
                    ),
                );
                return None;
            }
        };
        let then = self.implicit(then, &ty, span)?;
        let otherwise = self.implicit(otherwise, &ty, span)?;
        Some(Expr::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            ty,
        ))
    }

    /// Conversion as for assignment, initialisation, argument passing and
    /// `return`.
    fn implicit(&mut self, expr: Expr, to: &NativeType, span: SourceSpan) -> Option<Expr> {
        if expr.ty == *to {
            return Some(expr);
        }
        let from = expr.ty.clone();
        match (&from, to) {
            (NativeType::Float(_), _) | (_, NativeType::Float(_)) => {
                self.error(span, "floating-point arithmetic is not supported");
                None
            }
            (NativeType::Int(_), NativeType::Int(_)) => Some(convert(expr, to)),
            (_, NativeType::Pointer(_)) if is_null_constant(&expr) => Some(null_of(to)),
            (NativeType::Pointer(_) | NativeType::Function, NativeType::Pointer(_))
                if pointers_compatible(&from, to) =>
            {
                Some(convert(expr, to))
            }
            (NativeType::Pointer(_) | NativeType::Function, NativeType::Pointer(_)) => {
                self.error(
                    span,
                    format!("incompatible pointer types converting '{from}' to '{to}'"),
                );
                None
            }
            (NativeType::Pointer(_) | NativeType::Function, NativeType::Int(IntKind::Bool)) => {
                Some(convert(expr, to))
            }
            (NativeType::Int(_), NativeType::Pointer(_)) => {
                self.error(
                    span,
                    format!("incompatible integer to pointer conversion converting '{from}' to '{to}'"),
                );
                None
            }
            (NativeType::Pointer(_) | NativeType::Function, NativeType::Int(_)) => {
                self.error(
                    span,
                    format!("incompatible pointer to integer conversion converting '{from}' to '{to}'"),
                );
                None
            }
            _ => {
                self.error(span, format!("cannot convert '{from}' to '{to}'"));
                None
            }
        }
    }

    fn cast(&mut self, expr: Expr, to: &NativeType, span: SourceSpan) -> Option<Expr> {
        if expr.ty == *to {
            return Some(expr);
        }
        let from = expr.ty.clone();
        match (&from, to) {
            (_, NativeType::Void) => Some(convert(expr, to)),
            (NativeType::Float(_), _) | (_, NativeType::Float(_)) => {
                self.error(span, "floating-point arithmetic is not supported");
                None
            }
            (_, NativeType::Pointer(_)) if is_null_constant(&expr) => Some(null_of(to)),
            (
                NativeType::Int(_) | NativeType::Pointer(_) | NativeType::Function,
                NativeType::Int(_) | NativeType::Pointer(_),
            ) => Some(convert(expr, to)),
            _ => {
                self.error(span, format!("cannot cast from type '{from}' to '{to}'"));
                None
            }
        }
    }

    fn call(&mut self, callee: &ast::Expr, args: &[ast::Expr], span: SourceSpan) -> Option<Expr> {
        match &callee.kind {
            ast::ExprKind::Ident(name) if self.lookup(name).is_none() => {
                let candidates = self.visible(name);
                if candidates.is_empty() {
                    if let Some(builtin) = Builtin::from_name(name).filter(|_| self.builtins_visible) {
                        return self.builtin_call(builtin, None, args, span);
                    }
                    self.error(callee.span, format!("use of undeclared identifier '{name}'"));
                    return None;
                }
                self.direct_call(name, &candidates, args, span)
            }
            ast::ExprKind::Member { base, member, arrow } => {
                if !*arrow {
                    self.error(callee.span, "member reference type 'JNIEnv *' is a pointer; use '->'");
                    return None;
                }
                let Some(builtin) = Builtin::from_name(member) else {
                    self.error(callee.span, format!("no member named '{member}' in 'JNIEnv'"));
                    return None;
                };
                match &base.kind {
                    // (*env)->Name(env, ...)
                    ast::ExprKind::Unary {
                        op: UnOp::Deref,
                        operand,
                    } => {
                        let env = self.expr(operand)?;
                        self.require_env(&env, operand.span)?;
                        self.builtin_call(builtin, None, args, span)
                    }
                    _ => {
                        let env = self.expr(base)?;
                        self.require_env(&env, base.span)?;
                        self.builtin_call(builtin, Some(env), args, span)
                    }
                }
            }
            _ => {
                let callee = self.expr(callee)?;
                self.error(
                    span,
                    format!(
                        "called object type '{}' is not a function or function pointer",
                        callee.ty
                    ),
                );
                None
            }
        }
    }

    fn require_env(&mut self, env: &Expr, span: SourceSpan) -> Option<()> {
        if env.ty.pointee_struct() == Some("JNIEnv_") {
            return Some(());
        }
        self.error(
            span,
            format!("member reference base type '{}' is not an environment pointer", env.ty),
        );
        None
    }

    fn lower_args(&mut self, args: &[ast::Expr]) -> Option<Vec<Expr>> {
        let lowered: Vec<Option<Expr>> = args.iter().map(|arg| self.expr(arg)).collect();
        lowered.into_iter().collect()
    }

    fn arity_error(&mut self, span: SourceSpan, expected: usize, have: usize) {
        let which = if have > expected { "many" } else { "few" };
        self.error(
            span,
            format!("too {which} arguments to function call, expected {expected}, have {have}"),
        );
    }

    fn direct_call(&mut self, name: &str, candidates: &[usize], args: &[ast::Expr], span: SourceSpan) -> Option<Expr> {
        let lowered = self.lower_args(args)?;
        let by_arity: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|i| self.signatures[*i].params.len() == args.len())
            .collect();
        let target = match by_arity.as_slice() {
            [single] => *single,
            [] if candidates.len() == 1 => {
                let expected = self.signatures[candidates[0]].params.len();
                self.arity_error(span, expected, args.len());
                return None;
            }
            [] => {
                self.error(span, format!("no matching function for call to '{name}'"));
                return None;
            }
            several => {
                let exact: Vec<usize> = several
                    .iter()
                    .copied()
                    .filter(|i| {
                        self.signatures[*i]
                            .params
                            .iter()
                            .zip(&lowered)
                            .all(|(param, arg)| *param == arg.ty)
                    })
                    .collect();
                match exact.as_slice() {
                    [single] => *single,
                    _ => {
                        self.error(span, format!("call to '{name}' is ambiguous"));
                        return None;
                    }
                }
            }
        };
        let Some(index) = self.signatures[target].defined else {
            self.error(span, format!("undefined reference to '{name}'"));
            return None;
        };
        let params = self.signatures[target].params.clone();
        let ret = self.signatures[target].ret.clone();
        let mut converted = Vec::with_capacity(lowered.len());
        for ((arg, param), source) in lowered.into_iter().zip(&params).zip(args) {
            converted.push(self.implicit(arg, param, source.span));
        }
        let args = converted.into_iter().collect::<Option<Vec<_>>>()?;
        Some(Expr::new(
            ExprKind::Call {
                callee: Callee::Function(index),
                args,
            },
            ret,
        ))
    }

    fn builtin_call(&mut self, builtin: Builtin, env: Option<Expr>, args: &[ast::Expr], span: SourceSpan) -> Option<Expr> {
        let params = builtin.params();
        let (mut lowered, rest) = match env {
            Some(env) => (vec![env], args),
            None => {
                let Some((first, rest)) = args.split_first() else {
                    self.arity_error(span, params.len() + 1, 0);
                    return None;
                };
                let env = self.expr(first)?;
                if env.ty.pointee_struct() != Some("JNIEnv_") {
                    self.error(
                        first.span,
                        format!("cannot pass '{}' as the environment argument", env.ty),
                    );
                    return None;
                }
                (vec![env], rest)
            }
        };
        if rest.len() != params.len() {
            let offset = lowered.len() - 1;
            self.arity_error(span, params.len() + offset, rest.len() + offset);
            return None;
        }
        for (arg, param) in rest.iter().zip(&params) {
            let value = self.expr(arg)?;
            lowered.push(self.implicit(value, param, arg.span)?);
        }
        Some(Expr::new(
            ExprKind::Call {
                callee: Callee::Builtin(builtin),
                args: lowered,
            },
            builtin.ret(),
        ))
    }
}

fn max_value(kind: IntKind) -> u128 {
    let bits = u32::from(kind.bits());
    if kind.is_signed() {
        u128::MAX >> (129 - bits)
    } else {
        u128::MAX >> (128 - bits)
    }
}

fn promote(kind: IntKind) -> IntKind {
    if kind.rank() < IntKind::Int.rank() {
        IntKind::Int
    } else {
        kind
    }
}

/// The usual arithmetic conversions.
fn common(a: IntKind, b: IntKind) -> IntKind {
    let (a, b) = (promote(a), promote(b));
    if a == b {
        return a;
    }
    if a.is_signed() == b.is_signed() {
        return if a.rank() >= b.rank() { a } else { b };
    }
    let (signed, unsigned) = if a.is_signed() { (a, b) } else { (b, a) };
    if unsigned.rank() >= signed.rank() {
        unsigned
    } else if signed.bits() > unsigned.bits() {
        signed
    } else {
        signed.to_unsigned()
    }
}

fn convert(expr: Expr, to: &NativeType) -> Expr {
    if expr.ty == *to {
        return expr;
    }
    Expr::new(ExprKind::Convert(Box::new(expr)), to.clone())
}

fn null_of(ty: &NativeType) -> Expr {
    Expr::new(ExprKind::Null, ty.clone())
}

fn is_scalar(ty: &NativeType) -> bool {
    ty.is_integer() || ty.is_pointer()
}

/// `0`, `nullptr`, `NULL` and `(void*)0`.
fn is_null_constant(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::IntConst(0) => expr.ty.is_integer(),
        ExprKind::Null => true,
        ExprKind::Convert(inner) => {
            expr.ty == NativeType::pointer_to(NativeType::Void) && is_null_constant(inner)
        }
        _ => false,
    }
}

/// Whether a `from` pointer converts to `to` without a cast.
fn pointers_compatible(from: &NativeType, to: &NativeType) -> bool {
    let void = NativeType::pointer_to(NativeType::Void);
    if from == to || *from == void || *to == void {
        return true;
    }
    // Managed handles convert to their base handle types.
    match (from.pointee_struct(), to.pointee_struct()) {
        (Some(from), Some("_jobject")) => from.starts_with("_j"),
        (Some(from), Some("_jarray")) => from.ends_with("Array"),
        _ => false,
    }
}

/// Expressions whose value is their only effect.
fn result_unused(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::IntConst(_)
        | ExprKind::Null
        | ExprKind::Local(_)
        | ExprKind::FunctionAddress(_)
        | ExprKind::Compare { .. } => true,
        ExprKind::Binary { lhs, rhs, .. } => result_unused(lhs) && result_unused(rhs),
        ExprKind::Unary { operand, .. } => result_unused(operand),
        ExprKind::Convert(inner) => !expr.ty.is_void() && result_unused(inner),
        ExprKind::Comma(_, rhs) => result_unused(rhs),
        _ => false,
    }
}

/// Whether control can reach the end of `stmts`.
fn completes(stmts: &[Stmt]) -> bool {
    stmts.iter().all(stmt_completes)
}

fn stmt_completes(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return(_) | Stmt::Break | Stmt::Continue => false,
        Stmt::If {
            then, otherwise, ..
        } => completes(then) || completes(otherwise),
        Stmt::Loop {
            cond: None, body, ..
        } => breaks(body),
        Stmt::Loop { .. } | Stmt::Expr(_) => true,
        Stmt::Block(stmts) => completes(stmts),
    }
}

/// Whether a `break` in `stmts` leaves the enclosing loop.
fn breaks(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|stmt| match stmt {
        Stmt::Break => true,
        Stmt::If {
            then, otherwise, ..
        } => breaks(then) || breaks(otherwise),
        Stmt::Block(stmts) => breaks(stmts),
        _ => false,
    })
}

fn contains_return(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|stmt| match stmt {
        Stmt::Return(_) => true,
        Stmt::If {
            then, otherwise, ..
        } => contains_return(then) || contains_return(otherwise),
        Stmt::Loop { body, .. } => contains_return(body),
        Stmt::Block(stmts) => contains_return(stmts),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_conversions() {
        assert_eq!(common(IntKind::Char, IntKind::Short), IntKind::Int);
        assert_eq!(common(IntKind::Int, IntKind::UInt), IntKind::UInt);
        assert_eq!(common(IntKind::Long, IntKind::UInt), IntKind::Long);
        assert_eq!(common(IntKind::ULong, IntKind::LongLong), IntKind::ULongLong);
        assert_eq!(common(IntKind::Bool, IntKind::UChar), IntKind::Int);
    }

    #[test]
    fn literal_limits() {
        assert_eq!(max_value(IntKind::Int), i32::MAX as u128);
        assert_eq!(max_value(IntKind::UInt), u32::MAX as u128);
        assert_eq!(max_value(IntKind::ULong), u64::MAX as u128);
    }

    #[test]
    fn handle_conversions() {
        let object = NativeType::opaque("_jobject");
        let string = NativeType::opaque("_jstring");
        let ints = NativeType::opaque("_jintArray");
        assert!(pointers_compatible(&string, &object));
        assert!(!pointers_compatible(&object, &string));
        assert!(pointers_compatible(&ints, &NativeType::opaque("_jarray")));
        assert!(pointers_compatible(&NativeType::pointer_to(NativeType::Void), &string));
    }

    #[test]
    fn fall_through_analysis() {
        let ret = Stmt::Return(None);
        assert!(!completes(&[ret.clone()]));
        assert!(completes(&[Stmt::If {
            cond: Expr::new(ExprKind::IntConst(1), NativeType::INT),
            then: vec![ret.clone()],
            otherwise: vec![],
        }]));
        let forever = Stmt::Loop {
            cond: None,
            body: vec![],
            step: None,
            test_first: true,
        };
        assert!(!completes(&[forever]));
        let escapes = Stmt::Loop {
            cond: None,
            body: vec![Stmt::Break],
            step: None,
            test_first: true,
        };
        assert!(completes(&[escapes]));
    }
}
