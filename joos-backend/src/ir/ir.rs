// Tree IR: expressions, statements and the compilation-unit container.

use super::builder::IrBuilder;
use std::fmt;

/// Stable identity of an IR node within one compilation unit.
///
/// Handed out by [`IrBuilder`]; the tiler memoizes on it instead of on
/// structural equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOpKind {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Eq,
    Neq,
    Lt,
    Gt,
    Leq,
    Geq,
}

impl BinOpKind {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinOpKind::Eq
                | BinOpKind::Neq
                | BinOpKind::Lt
                | BinOpKind::Gt
                | BinOpKind::Leq
                | BinOpKind::Geq
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinOpKind::Add => "ADD",
            BinOpKind::Sub => "SUB",
            BinOpKind::Mul => "MUL",
            BinOpKind::Div => "DIV",
            BinOpKind::Mod => "MOD",
            BinOpKind::And => "AND",
            BinOpKind::Or => "OR",
            BinOpKind::Eq => "EQ",
            BinOpKind::Neq => "NEQ",
            BinOpKind::Lt => "LT",
            BinOpKind::Gt => "GT",
            BinOpKind::Leq => "LEQ",
            BinOpKind::Geq => "GEQ",
        }
    }
}

impl fmt::Display for BinOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    BinOp {
        op: BinOpKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Only valid before canonicalization.
    Call { target: Box<Expr>, args: Vec<Expr> },
    Const(i32),
    /// Run `stmt` for effect, then yield `expr`.
    ESeq { stmt: Box<Stmt>, expr: Box<Expr> },
    Mem(Box<Expr>),
    Name { label: String, global: bool },
    /// A virtual register, or a static field when `global` is set.
    Temp { name: String, global: bool },
}

impl Expr {
    pub fn new(id: NodeId, kind: ExprKind) -> Self {
        Self { id, kind }
    }

    /// `Const`, `Name` and `Temp` carry no computation and no effect.
    pub fn is_leaf(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Const(_) | ExprKind::Name { .. } | ExprKind::Temp { .. }
        )
    }

    pub fn as_temp(&self) -> Option<(&str, bool)> {
        match &self.kind {
            ExprKind::Temp { name, global } => Some((name.as_str(), *global)),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Name { label, .. } => Some(label.as_str()),
            _ => None,
        }
    }
}

// ============================================================================
// Statements
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stmt {
    pub id: NodeId,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtKind {
    /// Branch to `true_label` when `cond` is non-zero, else fall through to
    /// `false_label`, which the producer places immediately after.
    CJump {
        cond: Expr,
        true_label: String,
        false_label: String,
    },
    Exp(Expr),
    Jump(Expr),
    Label(String),
    Move { target: Expr, source: Expr },
    Return(Option<Expr>),
    Seq(Vec<Stmt>),
    Comment(String),
    /// A call whose result, if any, lands in the return register.
    ///
    /// After canonicalization every argument is a `Temp`.
    Call { target: Expr, args: Vec<Expr> },
}

impl Stmt {
    pub fn new(id: NodeId, kind: StmtKind) -> Self {
        Self { id, kind }
    }

    pub fn is_seq(&self) -> bool {
        matches!(self.kind, StmtKind::Seq(_))
    }
}

// ============================================================================
// Compilation units
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncDecl {
    pub label: String,
    pub body: Stmt,
    pub num_params: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticField {
    /// Data-section label of the field.
    pub name: String,
    pub init: Expr,
}

/// Everything one source class contributes to the program.
///
/// Owns the [`IrBuilder`] that minted its node ids, so later rewrites can
/// mint more without clashing.
#[derive(Debug, Clone)]
pub struct CompUnit {
    pub name: String,
    pub functions: Vec<FuncDecl>,
    /// Declaration order; initializers run in exactly this order.
    pub static_fields: Vec<StaticField>,
    pub start_stmts: Vec<Stmt>,
    pub builder: IrBuilder,
}

impl CompUnit {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            builder: IrBuilder::new(name.clone()),
            name,
            functions: Vec::new(),
            static_fields: Vec::new(),
            start_stmts: Vec::new(),
        }
    }

    pub fn add_function(&mut self, label: impl Into<String>, body: Stmt, num_params: usize) {
        self.functions.push(FuncDecl {
            label: label.into(),
            body,
            num_params,
        });
    }

    pub fn add_static_field(&mut self, name: impl Into<String>, init: Expr) {
        self.static_fields.push(StaticField {
            name: name.into(),
            init,
        });
    }

    pub fn add_start_stmt(&mut self, stmt: Stmt) {
        self.start_stmts.push(stmt);
    }
}

/// A compilation unit whose trees satisfy canonical form.
///
/// Static initializers have already been bound into
/// `Seq(..., Move(Temp(field, global), value))` statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalUnit {
    pub name: String,
    pub functions: Vec<FuncDecl>,
    pub field_names: Vec<String>,
    pub static_inits: Vec<Stmt>,
    pub start: Vec<Stmt>,
}

// ============================================================================
// Display (s-expression form, for diagnostics)
// ============================================================================

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::BinOp { op, left, right } => write!(f, "({op} {left} {right})"),
            ExprKind::Call { target, args } => {
                write!(f, "(CALL {target}")?;
                for a in args {
                    write!(f, " {a}")?;
                }
                write!(f, ")")
            }
            ExprKind::Const(v) => write!(f, "(CONST {v})"),
            ExprKind::ESeq { stmt, expr } => write!(f, "(ESEQ {stmt} {expr})"),
            ExprKind::Mem(addr) => write!(f, "(MEM {addr})"),
            ExprKind::Name { label, .. } => write!(f, "(NAME {label})"),
            ExprKind::Temp { name, global } => {
                if *global {
                    write!(f, "(TEMP {name} global)")
                } else {
                    write!(f, "(TEMP {name})")
                }
            }
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::CJump {
                cond,
                true_label,
                false_label,
            } => write!(f, "(CJUMP {cond} {true_label} {false_label})"),
            StmtKind::Exp(e) => write!(f, "(EXP {e})"),
            StmtKind::Jump(t) => write!(f, "(JUMP {t})"),
            StmtKind::Label(l) => write!(f, "(LABEL {l})"),
            StmtKind::Move { target, source } => write!(f, "(MOVE {target} {source})"),
            StmtKind::Return(Some(e)) => write!(f, "(RETURN {e})"),
            StmtKind::Return(None) => write!(f, "(RETURN)"),
            StmtKind::Seq(stmts) => {
                write!(f, "(SEQ")?;
                for s in stmts {
                    write!(f, " {s}")?;
                }
                write!(f, ")")
            }
            StmtKind::Comment(text) => write!(f, "(COMMENT {text:?})"),
            StmtKind::Call { target, args } => {
                write!(f, "(CALL_STMT {target}")?;
                for a in args {
                    write!(f, " {a}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for CanonicalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "UNIT {}", self.name)?;
        for s in &self.start {
            writeln!(f, "  START {s}")?;
        }
        for s in &self.static_inits {
            writeln!(f, "  INIT {s}")?;
        }
        for func in &self.functions {
            writeln!(f, "  FUNC {}({}) {}", func.label, func.num_params, func.body)?;
        }
        Ok(())
    }
}
