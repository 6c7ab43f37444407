// Syntax tree produced by the parser and executed by the interpreter.
//
// Every node that can raise at runtime carries its source line; the chunk
// label lives on `Chunk`, not on the nodes.

use std::sync::Arc;

use smol_str::SmolStr;

/// A compiled unit: the chunk label (file name or `=inline` style tag) plus
/// the top-level block.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub source: SmolStr,
    pub block: Block,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub stats: Vec<Stat>,
}

#[derive(Debug, Clone)]
pub enum Stat {
    /// Call expression in statement position.
    Expr(Expr),
    Local {
        names: Vec<SmolStr>,
        exprs: Vec<Expr>,
        line: u32,
    },
    /// `local function name(...)` — the name is in scope inside the body.
    LocalFunction {
        name: SmolStr,
        func: Arc<FuncBody>,
        line: u32,
    },
    Assign {
        targets: Vec<Expr>,
        exprs: Vec<Expr>,
        line: u32,
    },
    If {
        arms: Vec<(Expr, Block)>,
        else_block: Option<Block>,
        line: u32,
    },
    While {
        cond: Expr,
        body: Block,
        line: u32,
    },
    Repeat {
        body: Block,
        cond: Expr,
        line: u32,
    },
    NumericFor {
        var: SmolStr,
        start: Expr,
        stop: Expr,
        step: Option<Expr>,
        body: Block,
        line: u32,
    },
    GenericFor {
        names: Vec<SmolStr>,
        exprs: Vec<Expr>,
        body: Block,
        line: u32,
    },
    Do(Block),
    Return {
        exprs: Vec<Expr>,
        line: u32,
    },
    Break {
        line: u32,
    },
}

impl Stat {
    pub fn line(&self) -> u32 {
        match self {
            Stat::Expr(e) => e.line,
            Stat::Local { line, .. }
            | Stat::LocalFunction { line, .. }
            | Stat::Assign { line, .. }
            | Stat::If { line, .. }
            | Stat::While { line, .. }
            | Stat::Repeat { line, .. }
            | Stat::NumericFor { line, .. }
            | Stat::GenericFor { line, .. }
            | Stat::Return { line, .. }
            | Stat::Break { line } => *line,
            Stat::Do(b) => b.stats.first().map(|s| s.line()).unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Nil,
    True,
    False,
    Int(i64),
    Num(f64),
    Str(SmolStr),
    Vararg,
    Name(SmolStr),
    Index(Box<Expr>, Box<Expr>),
    Call(Box<Expr>, Vec<Expr>),
    /// `obj:name(args)` — the receiver is evaluated once.
    MethodCall(Box<Expr>, SmolStr, Vec<Expr>),
    Function(Arc<FuncBody>),
    Table(Vec<TableItem>),
    Binop(BinOp, Box<Expr>, Box<Expr>),
    Unop(UnOp, Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum TableItem {
    Positional(Expr),
    Named(SmolStr, Expr),
    Keyed(Expr, Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    Len,
}

/// Function prototype: shared between the AST and every closure created from
/// it.
#[derive(Debug)]
pub struct FuncBody {
    /// Debug name ("" for anonymous functions).
    pub name: SmolStr,
    pub params: Vec<SmolStr>,
    pub is_vararg: bool,
    pub body: Block,
    pub line: u32,
    /// Chunk label copied from the enclosing chunk at parse time.
    pub source: SmolStr,
}
