// Binary chunk format.
//
// A serialized chunk is the parsed syntax tree in a compact byte form, so a
// precompiled script loads without going through the lexer and parser. The
// format is an implementation detail of this crate and carries a version
// byte; a mismatch is rejected up front.

use smol_str::SmolStr;

use crate::ast::{BinOp, Block, Chunk, Expr, ExprKind, FuncBody, Stat, TableItem, UnOp};
use crate::error::{VmError, VmResult};

pub const CHUNK_MAGIC: [u8; 4] = *b"\x1bMBC";
pub const CHUNK_VERSION: u8 = 1;

/// True when `data` starts with the serialized-chunk magic.
pub fn is_bytecode(data: &[u8]) -> bool {
    data.len() >= CHUNK_MAGIC.len() && data[..CHUNK_MAGIC.len()] == CHUNK_MAGIC
}

pub fn serialize_chunk(chunk: &Chunk) -> Vec<u8> {
    let mut w = Writer::new();
    w.bytes(&CHUNK_MAGIC);
    w.u8(CHUNK_VERSION);
    w.str(&chunk.source);
    write_block(&mut w, &chunk.block);
    w.out
}

pub fn deserialize_chunk(data: &[u8]) -> VmResult<Chunk> {
    let mut r = Reader::new(data);
    let magic = r.take(4)?;
    if magic != CHUNK_MAGIC {
        return Err(VmError::compile("bad bytecode: wrong magic"));
    }
    let version = r.u8()?;
    if version != CHUNK_VERSION {
        return Err(VmError::compile(format!(
            "bad bytecode: version {} not supported",
            version
        )));
    }
    let source = r.str()?;
    let block = read_block(&mut r)?;
    if !r.at_end() {
        return Err(VmError::compile("bad bytecode: trailing data"));
    }
    Ok(Chunk { source, block })
}

// ---- writing ----------------------------------------------------------------

struct Writer {
    out: Vec<u8>,
}

impl Writer {
    fn new() -> Writer {
        Writer { out: Vec::new() }
    }

    fn u8(&mut self, v: u8) {
        self.out.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    fn f64(&mut self, v: f64) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    fn bytes(&mut self, v: &[u8]) {
        self.out.extend_from_slice(v);
    }

    fn str(&mut self, s: &str) {
        self.u32(s.len() as u32);
        self.bytes(s.as_bytes());
    }
}

fn write_block(w: &mut Writer, block: &Block) {
    w.u32(block.stats.len() as u32);
    for stat in &block.stats {
        write_stat(w, stat);
    }
}

fn write_names(w: &mut Writer, names: &[SmolStr]) {
    w.u32(names.len() as u32);
    for n in names {
        w.str(n);
    }
}

fn write_exprs(w: &mut Writer, exprs: &[Expr]) {
    w.u32(exprs.len() as u32);
    for e in exprs {
        write_expr(w, e);
    }
}

fn write_func(w: &mut Writer, f: &FuncBody) {
    w.str(&f.name);
    write_names(w, &f.params);
    w.u8(f.is_vararg as u8);
    w.u32(f.line);
    w.str(&f.source);
    write_block(w, &f.body);
}

fn write_stat(w: &mut Writer, stat: &Stat) {
    match stat {
        Stat::Expr(e) => {
            w.u8(0);
            write_expr(w, e);
        }
        Stat::Local { names, exprs, line } => {
            w.u8(1);
            w.u32(*line);
            write_names(w, names);
            write_exprs(w, exprs);
        }
        Stat::LocalFunction { name, func, line } => {
            w.u8(2);
            w.u32(*line);
            w.str(name);
            write_func(w, func);
        }
        Stat::Assign {
            targets,
            exprs,
            line,
        } => {
            w.u8(3);
            w.u32(*line);
            write_exprs(w, targets);
            write_exprs(w, exprs);
        }
        Stat::If {
            arms,
            else_block,
            line,
        } => {
            w.u8(4);
            w.u32(*line);
            w.u32(arms.len() as u32);
            for (cond, body) in arms {
                write_expr(w, cond);
                write_block(w, body);
            }
            match else_block {
                Some(body) => {
                    w.u8(1);
                    write_block(w, body);
                }
                None => w.u8(0),
            }
        }
        Stat::While { cond, body, line } => {
            w.u8(5);
            w.u32(*line);
            write_expr(w, cond);
            write_block(w, body);
        }
        Stat::Repeat { body, cond, line } => {
            w.u8(6);
            w.u32(*line);
            write_block(w, body);
            write_expr(w, cond);
        }
        Stat::NumericFor {
            var,
            start,
            stop,
            step,
            body,
            line,
        } => {
            w.u8(7);
            w.u32(*line);
            w.str(var);
            write_expr(w, start);
            write_expr(w, stop);
            match step {
                Some(e) => {
                    w.u8(1);
                    write_expr(w, e);
                }
                None => w.u8(0),
            }
            write_block(w, body);
        }
        Stat::GenericFor {
            names,
            exprs,
            body,
            line,
        } => {
            w.u8(8);
            w.u32(*line);
            write_names(w, names);
            write_exprs(w, exprs);
            write_block(w, body);
        }
        Stat::Do(body) => {
            w.u8(9);
            write_block(w, body);
        }
        Stat::Return { exprs, line } => {
            w.u8(10);
            w.u32(*line);
            write_exprs(w, exprs);
        }
        Stat::Break { line } => {
            w.u8(11);
            w.u32(*line);
        }
    }
}

fn write_expr(w: &mut Writer, e: &Expr) {
    w.u32(e.line);
    match &e.kind {
        ExprKind::Nil => w.u8(0),
        ExprKind::True => w.u8(1),
        ExprKind::False => w.u8(2),
        ExprKind::Int(i) => {
            w.u8(3);
            w.i64(*i);
        }
        ExprKind::Num(n) => {
            w.u8(4);
            w.f64(*n);
        }
        ExprKind::Str(s) => {
            w.u8(5);
            w.str(s);
        }
        ExprKind::Vararg => w.u8(6),
        ExprKind::Name(name) => {
            w.u8(7);
            w.str(name);
        }
        ExprKind::Index(obj, key) => {
            w.u8(8);
            write_expr(w, obj);
            write_expr(w, key);
        }
        ExprKind::Call(callee, args) => {
            w.u8(9);
            write_expr(w, callee);
            write_exprs(w, args);
        }
        ExprKind::MethodCall(obj, name, args) => {
            w.u8(10);
            write_expr(w, obj);
            w.str(name);
            write_exprs(w, args);
        }
        ExprKind::Function(f) => {
            w.u8(11);
            write_func(w, f);
        }
        ExprKind::Table(items) => {
            w.u8(12);
            w.u32(items.len() as u32);
            for item in items {
                match item {
                    TableItem::Positional(v) => {
                        w.u8(0);
                        write_expr(w, v);
                    }
                    TableItem::Named(name, v) => {
                        w.u8(1);
                        w.str(name);
                        write_expr(w, v);
                    }
                    TableItem::Keyed(k, v) => {
                        w.u8(2);
                        write_expr(w, k);
                        write_expr(w, v);
                    }
                }
            }
        }
        ExprKind::Binop(op, a, b) => {
            w.u8(13);
            w.u8(binop_code(*op));
            write_expr(w, a);
            write_expr(w, b);
        }
        ExprKind::Unop(op, a) => {
            w.u8(14);
            w.u8(match op {
                UnOp::Neg => 0,
                UnOp::Not => 1,
                UnOp::Len => 2,
            });
            write_expr(w, a);
        }
    }
}

fn binop_code(op: BinOp) -> u8 {
    match op {
        BinOp::Add => 0,
        BinOp::Sub => 1,
        BinOp::Mul => 2,
        BinOp::Div => 3,
        BinOp::IDiv => 4,
        BinOp::Mod => 5,
        BinOp::Pow => 6,
        BinOp::Concat => 7,
        BinOp::Eq => 8,
        BinOp::Ne => 9,
        BinOp::Lt => 10,
        BinOp::Le => 11,
        BinOp::Gt => 12,
        BinOp::Ge => 13,
        BinOp::And => 14,
        BinOp::Or => 15,
    }
}

// ---- reading ----------------------------------------------------------------

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Reader<'a> {
        Reader { data, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos == self.data.len()
    }

    fn take(&mut self, n: usize) -> VmResult<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(VmError::compile("bad bytecode: truncated"));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> VmResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> VmResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i64(&mut self) -> VmResult<i64> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(i64::from_le_bytes(buf))
    }

    fn f64(&mut self) -> VmResult<f64> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(f64::from_le_bytes(buf))
    }

    fn str(&mut self) -> VmResult<SmolStr> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(SmolStr::new)
            .map_err(|_| VmError::compile("bad bytecode: invalid string"))
    }
}

fn read_block(r: &mut Reader) -> VmResult<Block> {
    let count = r.u32()? as usize;
    let mut stats = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        stats.push(read_stat(r)?);
    }
    Ok(Block { stats })
}

fn read_names(r: &mut Reader) -> VmResult<Vec<SmolStr>> {
    let count = r.u32()? as usize;
    let mut names = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        names.push(r.str()?);
    }
    Ok(names)
}

fn read_exprs(r: &mut Reader) -> VmResult<Vec<Expr>> {
    let count = r.u32()? as usize;
    let mut exprs = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        exprs.push(read_expr(r)?);
    }
    Ok(exprs)
}

fn read_func(r: &mut Reader) -> VmResult<FuncBody> {
    let name = r.str()?;
    let params = read_names(r)?;
    let is_vararg = r.u8()? != 0;
    let line = r.u32()?;
    let source = r.str()?;
    let body = read_block(r)?;
    Ok(FuncBody {
        name,
        params,
        is_vararg,
        body,
        line,
        source,
    })
}

fn read_stat(r: &mut Reader) -> VmResult<Stat> {
    let tag = r.u8()?;
    match tag {
        0 => Ok(Stat::Expr(read_expr(r)?)),
        1 => {
            let line = r.u32()?;
            let names = read_names(r)?;
            let exprs = read_exprs(r)?;
            Ok(Stat::Local { names, exprs, line })
        }
        2 => {
            let line = r.u32()?;
            let name = r.str()?;
            let func = std::sync::Arc::new(read_func(r)?);
            Ok(Stat::LocalFunction { name, func, line })
        }
        3 => {
            let line = r.u32()?;
            let targets = read_exprs(r)?;
            let exprs = read_exprs(r)?;
            Ok(Stat::Assign {
                targets,
                exprs,
                line,
            })
        }
        4 => {
            let line = r.u32()?;
            let arm_count = r.u32()? as usize;
            let mut arms = Vec::with_capacity(arm_count.min(256));
            for _ in 0..arm_count {
                let cond = read_expr(r)?;
                let body = read_block(r)?;
                arms.push((cond, body));
            }
            let else_block = if r.u8()? != 0 {
                Some(read_block(r)?)
            } else {
                None
            };
            Ok(Stat::If {
                arms,
                else_block,
                line,
            })
        }
        5 => {
            let line = r.u32()?;
            let cond = read_expr(r)?;
            let body = read_block(r)?;
            Ok(Stat::While { cond, body, line })
        }
        6 => {
            let line = r.u32()?;
            let body = read_block(r)?;
            let cond = read_expr(r)?;
            Ok(Stat::Repeat { body, cond, line })
        }
        7 => {
            let line = r.u32()?;
            let var = r.str()?;
            let start = read_expr(r)?;
            let stop = read_expr(r)?;
            let step = if r.u8()? != 0 {
                Some(read_expr(r)?)
            } else {
                None
            };
            let body = read_block(r)?;
            Ok(Stat::NumericFor {
                var,
                start,
                stop,
                step,
                body,
                line,
            })
        }
        8 => {
            let line = r.u32()?;
            let names = read_names(r)?;
            let exprs = read_exprs(r)?;
            let body = read_block(r)?;
            Ok(Stat::GenericFor {
                names,
                exprs,
                body,
                line,
            })
        }
        9 => Ok(Stat::Do(read_block(r)?)),
        10 => {
            let line = r.u32()?;
            let exprs = read_exprs(r)?;
            Ok(Stat::Return { exprs, line })
        }
        11 => {
            let line = r.u32()?;
            Ok(Stat::Break { line })
        }
        other => Err(VmError::compile(format!(
            "bad bytecode: unknown statement tag {}",
            other
        ))),
    }
}

fn read_expr(r: &mut Reader) -> VmResult<Expr> {
    let line = r.u32()?;
    let tag = r.u8()?;
    let kind = match tag {
        0 => ExprKind::Nil,
        1 => ExprKind::True,
        2 => ExprKind::False,
        3 => ExprKind::Int(r.i64()?),
        4 => ExprKind::Num(r.f64()?),
        5 => ExprKind::Str(r.str()?),
        6 => ExprKind::Vararg,
        7 => ExprKind::Name(r.str()?),
        8 => {
            let obj = Box::new(read_expr(r)?);
            let key = Box::new(read_expr(r)?);
            ExprKind::Index(obj, key)
        }
        9 => {
            let callee = Box::new(read_expr(r)?);
            let args = read_exprs(r)?;
            ExprKind::Call(callee, args)
        }
        10 => {
            let obj = Box::new(read_expr(r)?);
            let name = r.str()?;
            let args = read_exprs(r)?;
            ExprKind::MethodCall(obj, name, args)
        }
        11 => ExprKind::Function(std::sync::Arc::new(read_func(r)?)),
        12 => {
            let count = r.u32()? as usize;
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                match r.u8()? {
                    0 => items.push(TableItem::Positional(read_expr(r)?)),
                    1 => {
                        let name = r.str()?;
                        items.push(TableItem::Named(name, read_expr(r)?));
                    }
                    2 => {
                        let k = read_expr(r)?;
                        let v = read_expr(r)?;
                        items.push(TableItem::Keyed(k, v));
                    }
                    other => {
                        return Err(VmError::compile(format!(
                            "bad bytecode: unknown table item tag {}",
                            other
                        )))
                    }
                }
            }
            ExprKind::Table(items)
        }
        13 => {
            let op = binop_from_code(r.u8()?)?;
            let a = Box::new(read_expr(r)?);
            let b = Box::new(read_expr(r)?);
            ExprKind::Binop(op, a, b)
        }
        14 => {
            let op = match r.u8()? {
                0 => UnOp::Neg,
                1 => UnOp::Not,
                2 => UnOp::Len,
                other => {
                    return Err(VmError::compile(format!(
                        "bad bytecode: unknown unary op {}",
                        other
                    )))
                }
            };
            ExprKind::Unop(op, Box::new(read_expr(r)?))
        }
        other => {
            return Err(VmError::compile(format!(
                "bad bytecode: unknown expression tag {}",
                other
            )))
        }
    };
    Ok(Expr { kind, line })
}

fn binop_from_code(code: u8) -> VmResult<BinOp> {
    Ok(match code {
        0 => BinOp::Add,
        1 => BinOp::Sub,
        2 => BinOp::Mul,
        3 => BinOp::Div,
        4 => BinOp::IDiv,
        5 => BinOp::Mod,
        6 => BinOp::Pow,
        7 => BinOp::Concat,
        8 => BinOp::Eq,
        9 => BinOp::Ne,
        10 => BinOp::Lt,
        11 => BinOp::Le,
        12 => BinOp::Gt,
        13 => BinOp::Ge,
        14 => BinOp::And,
        15 => BinOp::Or,
        other => {
            return Err(VmError::compile(format!(
                "bad bytecode: unknown binary op {}",
                other
            )))
        }
    })
}
