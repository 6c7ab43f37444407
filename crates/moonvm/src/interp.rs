// Tree-walking evaluator and the shared VM state.
//
// `VmState` is the per-embedding-instance shared core: globals, registry,
// hooks, print sink. `Interp` is a lightweight evaluation handle created on
// demand (one per entry from the embedder, one per coroutine worker); it
// carries the yield port and per-activation bookkeeping.
//
// Locking discipline: no table or scope lock is held across a nested
// evaluation. Values are cloned out under short locks first.

use std::cell::{Cell, RefCell};
use std::sync::Arc;

use parking_lot::Mutex;
use smol_str::SmolStr;

use crate::ast::{BinOp, Block, Chunk, Expr, ExprKind, Stat, TableItem, UnOp};
use crate::coroutine::YieldPort;
use crate::debug::{DebugInfo, HookEvent, HookState};
use crate::error::{VmError, VmResult};
use crate::registry::RefRegistry;
use crate::table::{Table, TableRef};
use crate::value::{EnvRef, FunctionRef, Scope, Value};

const DEFAULT_MAX_CALL_DEPTH: usize = 200;
const MAX_INDEX_CHAIN: usize = 32;

/// Shared state of one VM instance.
pub struct VmState {
    pub globals: TableRef,
    pub registry: Mutex<RefRegistry>,
    pub hooks: HookState,
    /// Library table used to resolve `("x"):method()` style indexing.
    string_meta: Mutex<Option<TableRef>>,
    print_sink: Mutex<Option<Box<dyn Fn(&str) + Send + Sync>>>,
    pub max_call_depth: usize,
}

impl VmState {
    pub fn new() -> Arc<VmState> {
        Arc::new(VmState {
            globals: TableRef::new(Table::new()),
            registry: Mutex::new(RefRegistry::new()),
            hooks: HookState::new(),
            string_meta: Mutex::new(None),
            print_sink: Mutex::new(None),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        })
    }

    pub fn get_global(&self, name: &str) -> Value {
        self.globals.get_str(name)
    }

    pub fn set_global(&self, name: &str, value: Value) {
        // Global names are always valid keys, the set cannot fail.
        let _ = self.globals.set_str(name, value);
    }

    /// Route `print` output somewhere other than stdout.
    pub fn set_print_sink(&self, sink: Option<Box<dyn Fn(&str) + Send + Sync>>) {
        *self.print_sink.lock() = sink;
    }

    pub(crate) fn print_line(&self, line: &str) {
        let sink = self.print_sink.lock();
        match &*sink {
            Some(f) => f(line),
            None => println!("{}", line),
        }
    }

    pub fn set_string_library(&self, table: TableRef) {
        *self.string_meta.lock() = Some(table);
    }

    fn string_library(&self) -> Option<TableRef> {
        self.string_meta.lock().clone()
    }
}

enum Flow {
    Normal,
    Break,
    Return(Vec<Value>),
}

/// One evaluation activation.
pub struct Interp {
    pub vm: Arc<VmState>,
    yield_port: Option<Arc<YieldPort>>,
    depth: Cell<usize>,
    line: Cell<u32>,
    source: RefCell<SmolStr>,
}

impl Interp {
    pub fn new(vm: Arc<VmState>) -> Interp {
        Interp {
            vm,
            yield_port: None,
            depth: Cell::new(0),
            line: Cell::new(0),
            source: RefCell::new(SmolStr::default()),
        }
    }

    pub(crate) fn with_yield_port(vm: Arc<VmState>, port: Arc<YieldPort>) -> Interp {
        Interp {
            vm,
            yield_port: Some(port),
            depth: Cell::new(0),
            line: Cell::new(0),
            source: RefCell::new(SmolStr::default()),
        }
    }

    pub fn can_yield(&self) -> bool {
        self.yield_port.is_some()
    }

    /// Suspend the enclosing coroutine. Errors when not inside one.
    pub fn yield_values(&self, values: Vec<Value>) -> VmResult<Vec<Value>> {
        match &self.yield_port {
            Some(port) => port.do_yield(values),
            None => Err(self.rt("attempt to yield from outside a coroutine")),
        }
    }

    fn rt(&self, msg: impl Into<String>) -> VmError {
        VmError::runtime(msg).at(&self.source.borrow(), self.line.get())
    }

    fn emit_hook(&self, event: HookEvent, name: &str, name_what: &str, what: &str) {
        if !self.vm.hooks.wants(event) {
            return;
        }
        let info = DebugInfo {
            current_line: self.line.get(),
            source: self.source.borrow().clone(),
            name: SmolStr::new(name),
            name_what: SmolStr::new(name_what),
            what: SmolStr::new(what),
        };
        self.vm.hooks.emit(event, &info);
    }

    // ---- entry points -------------------------------------------------------

    /// Execute a compiled chunk; `args` become the chunk's `...`.
    pub fn exec_chunk(&self, chunk: &Chunk, args: Vec<Value>) -> VmResult<Vec<Value>> {
        let prev_source = self.source.replace(chunk.source.clone());
        let prev_line = self.line.replace(0);
        let env = Scope::root();
        env.lock().varargs = Some(args);
        self.emit_hook(HookEvent::Call, chunk.source.as_str(), "", "main");
        let flow = self.eval_block(&chunk.block, &env);
        self.emit_hook(HookEvent::Return, chunk.source.as_str(), "", "main");
        self.source.replace(prev_source);
        self.line.replace(prev_line);
        match flow? {
            Flow::Return(values) => Ok(values),
            _ => Ok(Vec::new()),
        }
    }

    /// Call any callable value with `args`, returning all results.
    pub fn call_value(&self, func: &Value, args: Vec<Value>) -> VmResult<Vec<Value>> {
        if self.depth.get() >= self.vm.max_call_depth {
            return Err(VmError::stack_overflow().at(&self.source.borrow(), self.line.get()));
        }
        match func {
            Value::Function(f) => self.call_closure(f, args),
            Value::Native(n) => {
                self.emit_hook(HookEvent::Call, n.0.name.as_str(), "global", "native");
                let result = n.call(self, args);
                self.emit_hook(HookEvent::Return, n.0.name.as_str(), "global", "native");
                result
            }
            Value::Table(t) => {
                let handler = t.metatable().map(|m| m.get_str("__call"));
                match handler {
                    Some(h) if !h.is_nil() => {
                        let mut call_args = Vec::with_capacity(args.len() + 1);
                        call_args.push(func.clone());
                        call_args.extend(args);
                        self.call_value(&h, call_args)
                    }
                    _ => Err(self.rt("attempt to call a table value")),
                }
            }
            Value::UserData(u) => {
                let handler = u.metatable().map(|m| m.get_str("__call"));
                match handler {
                    Some(h) if !h.is_nil() => {
                        let mut call_args = Vec::with_capacity(args.len() + 1);
                        call_args.push(func.clone());
                        call_args.extend(args);
                        self.call_value(&h, call_args)
                    }
                    _ => Err(self.rt("attempt to call a userdata value")),
                }
            }
            other => Err(self.rt(format!("attempt to call a {} value", other.type_name()))),
        }
    }

    fn call_closure(&self, f: &FunctionRef, args: Vec<Value>) -> VmResult<Vec<Value>> {
        let proto = f.0.proto.clone();
        let name_what = if proto.name.is_empty() {
            ""
        } else if proto.name.contains(':') {
            "method"
        } else {
            "global"
        };
        self.emit_hook(HookEvent::Call, proto.name.as_str(), name_what, "Lua");

        let env = Scope::child(&f.0.env);
        {
            let mut scope = env.lock();
            for (i, param) in proto.params.iter().enumerate() {
                scope
                    .vars
                    .insert(param.clone(), args.get(i).cloned().unwrap_or(Value::Nil));
            }
            if proto.is_vararg {
                let extra = if args.len() > proto.params.len() {
                    args[proto.params.len()..].to_vec()
                } else {
                    Vec::new()
                };
                scope.varargs = Some(extra);
            }
        }

        let prev_source = self.source.replace(proto.source.clone());
        let prev_line = self.line.get();
        self.depth.set(self.depth.get() + 1);
        let flow = self.eval_block(&proto.body, &env);
        self.depth.set(self.depth.get() - 1);
        self.source.replace(prev_source);
        self.line.set(prev_line);

        self.emit_hook(HookEvent::Return, proto.name.as_str(), name_what, "Lua");
        match flow? {
            Flow::Return(values) => Ok(values),
            _ => Ok(Vec::new()),
        }
    }

    // ---- statements ---------------------------------------------------------

    fn eval_block(&self, block: &Block, env: &EnvRef) -> VmResult<Flow> {
        for stat in &block.stats {
            match self.eval_stat(stat, env)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn eval_stat(&self, stat: &Stat, env: &EnvRef) -> VmResult<Flow> {
        self.line.set(stat.line());
        self.emit_hook(HookEvent::Line, "", "", "Lua");
        let result = self.eval_stat_inner(stat, env);
        result.map_err(|e| e.at(&self.source.borrow(), stat.line()))
    }

    fn eval_stat_inner(&self, stat: &Stat, env: &EnvRef) -> VmResult<Flow> {
        match stat {
            Stat::Expr(e) => {
                self.eval_expr_multi(e, env)?;
                Ok(Flow::Normal)
            }
            Stat::Local { names, exprs, .. } => {
                let values = self.eval_explist(exprs, env)?;
                let mut scope = env.lock();
                for (i, name) in names.iter().enumerate() {
                    scope
                        .vars
                        .insert(name.clone(), values.get(i).cloned().unwrap_or(Value::Nil));
                }
                Ok(Flow::Normal)
            }
            Stat::LocalFunction { name, func, .. } => {
                let closure = Value::Function(FunctionRef::new(func.clone(), env.clone()));
                env.lock().vars.insert(name.clone(), closure);
                Ok(Flow::Normal)
            }
            Stat::Assign { targets, exprs, .. } => {
                let values = self.eval_explist(exprs, env)?;
                for (i, target) in targets.iter().enumerate() {
                    let value = values.get(i).cloned().unwrap_or(Value::Nil);
                    match &target.kind {
                        ExprKind::Name(name) => self.assign_name(env, name, value)?,
                        ExprKind::Index(obj, key) => {
                            let obj = self.eval_expr(obj, env)?;
                            let key = self.eval_expr(key, env)?;
                            self.setindex_value(&obj, &key, value)?;
                        }
                        _ => return Err(self.rt("cannot assign to this expression")),
                    }
                }
                Ok(Flow::Normal)
            }
            Stat::If {
                arms, else_block, ..
            } => {
                for (cond, body) in arms {
                    if self.eval_expr(cond, env)?.truthy() {
                        let scope = Scope::child(env);
                        return self.eval_block(body, &scope);
                    }
                }
                if let Some(body) = else_block {
                    let scope = Scope::child(env);
                    return self.eval_block(body, &scope);
                }
                Ok(Flow::Normal)
            }
            Stat::While { cond, body, .. } => {
                while self.eval_expr(cond, env)?.truthy() {
                    let scope = Scope::child(env);
                    match self.eval_block(body, &scope)? {
                        Flow::Break => break,
                        Flow::Return(values) => return Ok(Flow::Return(values)),
                        Flow::Normal => {}
                    }
                }
                Ok(Flow::Normal)
            }
            Stat::Repeat { body, cond, .. } => loop {
                let scope = Scope::child(env);
                match self.eval_block(body, &scope)? {
                    Flow::Break => return Ok(Flow::Normal),
                    Flow::Return(values) => return Ok(Flow::Return(values)),
                    Flow::Normal => {}
                }
                // `until` sees the body's locals.
                if self.eval_expr(cond, &scope)?.truthy() {
                    return Ok(Flow::Normal);
                }
            },
            Stat::NumericFor {
                var,
                start,
                stop,
                step,
                body,
                ..
            } => self.eval_numeric_for(var, start, stop, step.as_ref(), body, env),
            Stat::GenericFor {
                names,
                exprs,
                body,
                ..
            } => {
                let mut control = self.eval_explist(exprs, env)?;
                control.resize(3, Value::Nil);
                let iter = control[0].clone();
                let state = control[1].clone();
                let mut ctrl = control[2].clone();
                loop {
                    let results = self.call_value(&iter, vec![state.clone(), ctrl.clone()])?;
                    let first = results.first().cloned().unwrap_or(Value::Nil);
                    if first.is_nil() {
                        return Ok(Flow::Normal);
                    }
                    ctrl = first;
                    let scope = Scope::child(env);
                    {
                        let mut s = scope.lock();
                        for (i, name) in names.iter().enumerate() {
                            s.vars
                                .insert(name.clone(), results.get(i).cloned().unwrap_or(Value::Nil));
                        }
                    }
                    match self.eval_block(body, &scope)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(values) => return Ok(Flow::Return(values)),
                        Flow::Normal => {}
                    }
                }
            }
            Stat::Do(body) => {
                let scope = Scope::child(env);
                self.eval_block(body, &scope)
            }
            Stat::Return { exprs, .. } => {
                let values = self.eval_explist(exprs, env)?;
                Ok(Flow::Return(values))
            }
            Stat::Break { .. } => Ok(Flow::Break),
        }
    }

    fn eval_numeric_for(
        &self,
        var: &SmolStr,
        start: &Expr,
        stop: &Expr,
        step: Option<&Expr>,
        body: &Block,
        env: &EnvRef,
    ) -> VmResult<Flow> {
        let start_v = self.eval_expr(start, env)?;
        let stop_v = self.eval_expr(stop, env)?;
        let step_v = match step {
            Some(e) => self.eval_expr(e, env)?,
            None => Value::Integer(1),
        };
        let all_int = matches!(
            (&start_v, &stop_v, &step_v),
            (Value::Integer(_), Value::Integer(_), Value::Integer(_))
        );
        if all_int {
            let (mut i, stop, step) = match (&start_v, &stop_v, &step_v) {
                (Value::Integer(a), Value::Integer(b), Value::Integer(c)) => (*a, *b, *c),
                _ => unreachable!(),
            };
            if step == 0 {
                return Err(self.rt("'for' step is zero"));
            }
            loop {
                if step > 0 && i > stop || step < 0 && i < stop {
                    return Ok(Flow::Normal);
                }
                let scope = Scope::child(env);
                scope.lock().vars.insert(var.clone(), Value::Integer(i));
                match self.eval_block(body, &scope)? {
                    Flow::Break => return Ok(Flow::Normal),
                    Flow::Return(values) => return Ok(Flow::Return(values)),
                    Flow::Normal => {}
                }
                match i.checked_add(step) {
                    Some(next) => i = next,
                    None => return Ok(Flow::Normal),
                }
            }
        } else {
            let to_num = |v: &Value| -> VmResult<f64> {
                v.as_number()
                    .ok_or_else(|| self.rt("'for' initial value must be a number"))
            };
            let mut i = to_num(&start_v)?;
            let stop = to_num(&stop_v)?;
            let step = to_num(&step_v)?;
            if step == 0.0 {
                return Err(self.rt("'for' step is zero"));
            }
            loop {
                if step > 0.0 && i > stop || step < 0.0 && i < stop {
                    return Ok(Flow::Normal);
                }
                let scope = Scope::child(env);
                scope.lock().vars.insert(var.clone(), Value::Number(i));
                match self.eval_block(body, &scope)? {
                    Flow::Break => return Ok(Flow::Normal),
                    Flow::Return(values) => return Ok(Flow::Return(values)),
                    Flow::Normal => {}
                }
                i += step;
            }
        }
    }

    // ---- names --------------------------------------------------------------

    fn lookup_name(&self, env: &EnvRef, name: &SmolStr) -> Value {
        let mut cursor = Some(env.clone());
        while let Some(scope) = cursor {
            let guard = scope.lock();
            if let Some(v) = guard.vars.get(name) {
                return v.clone();
            }
            cursor = guard.parent.clone();
        }
        self.vm.globals.get_str(name)
    }

    fn assign_name(&self, env: &EnvRef, name: &SmolStr, value: Value) -> VmResult<()> {
        let mut cursor = Some(env.clone());
        while let Some(scope) = cursor {
            let mut guard = scope.lock();
            if guard.vars.contains_key(name) {
                guard.vars.insert(name.clone(), value);
                return Ok(());
            }
            cursor = guard.parent.clone();
        }
        self.vm.globals.set_str(name, value)
    }

    fn varargs(&self, env: &EnvRef) -> VmResult<Vec<Value>> {
        let mut cursor = Some(env.clone());
        while let Some(scope) = cursor {
            let guard = scope.lock();
            if let Some(va) = &guard.varargs {
                return Ok(va.clone());
            }
            cursor = guard.parent.clone();
        }
        Err(self.rt("cannot use '...' outside a vararg function"))
    }

    // ---- expressions --------------------------------------------------------

    fn eval_expr(&self, e: &Expr, env: &EnvRef) -> VmResult<Value> {
        match &e.kind {
            ExprKind::Nil => Ok(Value::Nil),
            ExprKind::True => Ok(Value::Boolean(true)),
            ExprKind::False => Ok(Value::Boolean(false)),
            ExprKind::Int(i) => Ok(Value::Integer(*i)),
            ExprKind::Num(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::Str(s.clone())),
            ExprKind::Vararg => Ok(self.varargs(env)?.first().cloned().unwrap_or(Value::Nil)),
            ExprKind::Name(name) => Ok(self.lookup_name(env, name)),
            ExprKind::Index(obj, key) => {
                let obj = self.eval_expr(obj, env)?;
                let key = self.eval_expr(key, env)?;
                self.line.set(e.line);
                self.index_value(&obj, &key)
            }
            ExprKind::Call(_, _) | ExprKind::MethodCall(_, _, _) => Ok(self
                .eval_expr_multi(e, env)?
                .into_iter()
                .next()
                .unwrap_or(Value::Nil)),
            ExprKind::Function(proto) => {
                Ok(Value::Function(FunctionRef::new(proto.clone(), env.clone())))
            }
            ExprKind::Table(items) => self.eval_table_ctor(items, env),
            ExprKind::Binop(op, a, b) => self.eval_binop(*op, a, b, e.line, env),
            ExprKind::Unop(op, a) => {
                let v = self.eval_expr(a, env)?;
                self.line.set(e.line);
                self.eval_unop(*op, &v)
            }
        }
    }

    fn eval_expr_multi(&self, e: &Expr, env: &EnvRef) -> VmResult<Vec<Value>> {
        match &e.kind {
            ExprKind::Call(callee, args) => {
                let func = self.eval_expr(callee, env)?;
                let args = self.eval_explist(args, env)?;
                self.line.set(e.line);
                self.call_value(&func, args)
            }
            ExprKind::MethodCall(obj, name, args) => {
                let receiver = self.eval_expr(obj, env)?;
                self.line.set(e.line);
                let func = self.index_value(&receiver, &Value::Str(name.clone()))?;
                let mut call_args = Vec::with_capacity(args.len() + 1);
                call_args.push(receiver);
                call_args.extend(self.eval_explist(args, env)?);
                self.line.set(e.line);
                self.call_value(&func, call_args)
            }
            ExprKind::Vararg => self.varargs(env),
            _ => Ok(vec![self.eval_expr(e, env)?]),
        }
    }

    /// Evaluate an expression list with Lua adjustment: every expression is
    /// truncated to one value except the last, which expands.
    fn eval_explist(&self, exprs: &[Expr], env: &EnvRef) -> VmResult<Vec<Value>> {
        let mut out = Vec::with_capacity(exprs.len());
        for (i, e) in exprs.iter().enumerate() {
            if i + 1 == exprs.len() {
                out.extend(self.eval_expr_multi(e, env)?);
            } else {
                out.push(self.eval_expr(e, env)?);
            }
        }
        Ok(out)
    }

    fn eval_table_ctor(&self, items: &[TableItem], env: &EnvRef) -> VmResult<Value> {
        let table = TableRef::new(Table::new());
        let mut array_pos: i64 = 1;
        for (i, item) in items.iter().enumerate() {
            match item {
                TableItem::Named(name, e) => {
                    let v = self.eval_expr(e, env)?;
                    table.set(Value::Str(name.clone()), v)?;
                }
                TableItem::Keyed(k, v) => {
                    let key = self.eval_expr(k, env)?;
                    let value = self.eval_expr(v, env)?;
                    table.set(key, value)?;
                }
                TableItem::Positional(e) => {
                    if i + 1 == items.len() {
                        for v in self.eval_expr_multi(e, env)? {
                            table.set(Value::Integer(array_pos), v)?;
                            array_pos += 1;
                        }
                    } else {
                        let v = self.eval_expr(e, env)?;
                        table.set(Value::Integer(array_pos), v)?;
                        array_pos += 1;
                    }
                }
            }
        }
        Ok(Value::Table(table))
    }

    fn eval_binop(
        &self,
        op: BinOp,
        a: &Expr,
        b: &Expr,
        line: u32,
        env: &EnvRef,
    ) -> VmResult<Value> {
        // Short-circuit forms first.
        match op {
            BinOp::And => {
                let left = self.eval_expr(a, env)?;
                if !left.truthy() {
                    return Ok(left);
                }
                return self.eval_expr(b, env);
            }
            BinOp::Or => {
                let left = self.eval_expr(a, env)?;
                if left.truthy() {
                    return Ok(left);
                }
                return self.eval_expr(b, env);
            }
            _ => {}
        }
        let left = self.eval_expr(a, env)?;
        let right = self.eval_expr(b, env)?;
        self.line.set(line);
        match op {
            BinOp::Eq => Ok(Value::Boolean(self.equals(&left, &right)?)),
            BinOp::Ne => Ok(Value::Boolean(!self.equals(&left, &right)?)),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => self.compare(op, &left, &right),
            BinOp::Concat => self.concat(&left, &right),
            _ => self.arith(op, &left, &right),
        }
    }

    fn eval_unop(&self, op: UnOp, v: &Value) -> VmResult<Value> {
        match op {
            UnOp::Not => Ok(Value::Boolean(!v.truthy())),
            UnOp::Neg => match v {
                Value::Integer(i) => Ok(Value::Integer(i.wrapping_neg())),
                Value::Number(n) => Ok(Value::Number(-n)),
                other => Err(self.rt(format!(
                    "attempt to perform arithmetic on a {} value",
                    other.type_name()
                ))),
            },
            UnOp::Len => match v {
                Value::Str(s) => Ok(Value::Integer(s.len() as i64)),
                Value::Table(t) => Ok(Value::Integer(t.len())),
                other => Err(self.rt(format!(
                    "attempt to get length of a {} value",
                    other.type_name()
                ))),
            },
        }
    }

    // ---- operators ----------------------------------------------------------

    pub fn arith(&self, op: BinOp, a: &Value, b: &Value) -> VmResult<Value> {
        let bad = |v: &Value| {
            self.rt(format!(
                "attempt to perform arithmetic on a {} value",
                v.type_name()
            ))
        };
        match (a, b) {
            (Value::Integer(x), Value::Integer(y)) => {
                let (x, y) = (*x, *y);
                match op {
                    BinOp::Add => Ok(Value::Integer(x.wrapping_add(y))),
                    BinOp::Sub => Ok(Value::Integer(x.wrapping_sub(y))),
                    BinOp::Mul => Ok(Value::Integer(x.wrapping_mul(y))),
                    BinOp::Div => Ok(Value::Number(x as f64 / y as f64)),
                    BinOp::IDiv => {
                        if y == 0 {
                            Err(self.rt("attempt to perform 'n//0'"))
                        } else {
                            Ok(Value::Integer(x.div_euclid(y)))
                        }
                    }
                    BinOp::Mod => {
                        if y == 0 {
                            Err(self.rt("attempt to perform 'n%%0'"))
                        } else {
                            Ok(Value::Integer(x.rem_euclid(y)))
                        }
                    }
                    BinOp::Pow => Ok(Value::Number((x as f64).powf(y as f64))),
                    _ => Err(self.rt("bad arithmetic operator")),
                }
            }
            _ => {
                let x = a.as_number().ok_or_else(|| bad(a))?;
                let y = b.as_number().ok_or_else(|| bad(b))?;
                match op {
                    BinOp::Add => Ok(Value::Number(x + y)),
                    BinOp::Sub => Ok(Value::Number(x - y)),
                    BinOp::Mul => Ok(Value::Number(x * y)),
                    BinOp::Div => Ok(Value::Number(x / y)),
                    BinOp::IDiv => Ok(Value::Number((x / y).floor())),
                    BinOp::Mod => Ok(Value::Number(x - (x / y).floor() * y)),
                    BinOp::Pow => Ok(Value::Number(x.powf(y))),
                    _ => Err(self.rt("bad arithmetic operator")),
                }
            }
        }
    }

    fn compare(&self, op: BinOp, a: &Value, b: &Value) -> VmResult<Value> {
        let ord = match (a, b) {
            (Value::Str(x), Value::Str(y)) => x.as_str().partial_cmp(y.as_str()),
            _ => {
                let x = a.as_number().ok_or_else(|| {
                    self.rt(format!(
                        "attempt to compare {} with {}",
                        a.type_name(),
                        b.type_name()
                    ))
                })?;
                let y = b.as_number().ok_or_else(|| {
                    self.rt(format!(
                        "attempt to compare {} with {}",
                        a.type_name(),
                        b.type_name()
                    ))
                })?;
                x.partial_cmp(&y)
            }
        };
        let result = match (op, ord) {
            (_, None) => false,
            (BinOp::Lt, Some(o)) => o == std::cmp::Ordering::Less,
            (BinOp::Le, Some(o)) => o != std::cmp::Ordering::Greater,
            (BinOp::Gt, Some(o)) => o == std::cmp::Ordering::Greater,
            (BinOp::Ge, Some(o)) => o != std::cmp::Ordering::Less,
            _ => false,
        };
        Ok(Value::Boolean(result))
    }

    fn concat(&self, a: &Value, b: &Value) -> VmResult<Value> {
        let render = |v: &Value| -> VmResult<String> {
            match v {
                Value::Str(_) | Value::Integer(_) | Value::Number(_) => Ok(v.display_basic()),
                other => Err(self.rt(format!(
                    "attempt to concatenate a {} value",
                    other.type_name()
                ))),
            }
        };
        let mut s = render(a)?;
        s.push_str(&render(b)?);
        Ok(Value::Str(SmolStr::new(s)))
    }

    /// `==` with `__eq` dispatch: raw equality first, then the metamethod
    /// when both operands are tables or both are userdata.
    pub fn equals(&self, a: &Value, b: &Value) -> VmResult<bool> {
        if a.raw_eq(b) {
            return Ok(true);
        }
        let handler = match (a, b) {
            (Value::Table(x), Value::Table(y)) => {
                let h = x.metatable().map(|m| m.get_str("__eq"));
                match h {
                    Some(h) if !h.is_nil() => Some(h),
                    _ => y.metatable().map(|m| m.get_str("__eq")).filter(|h| !h.is_nil()),
                }
            }
            (Value::UserData(x), Value::UserData(y)) => {
                let h = x.metatable().map(|m| m.get_str("__eq"));
                match h {
                    Some(h) if !h.is_nil() => Some(h),
                    _ => y.metatable().map(|m| m.get_str("__eq")).filter(|h| !h.is_nil()),
                }
            }
            _ => None,
        };
        match handler {
            Some(h) => {
                let results = self.call_value(&h, vec![a.clone(), b.clone()])?;
                Ok(results.first().map(|v| v.truthy()).unwrap_or(false))
            }
            None => Ok(false),
        }
    }

    // ---- indexing -----------------------------------------------------------

    pub fn index_value(&self, obj: &Value, key: &Value) -> VmResult<Value> {
        self.index_chain(obj, key, 0)
    }

    fn index_chain(&self, obj: &Value, key: &Value, depth: usize) -> VmResult<Value> {
        if depth > MAX_INDEX_CHAIN {
            return Err(self.rt("'__index' chain too long; possible loop"));
        }
        match obj {
            Value::Table(t) => {
                let raw = t.get(key);
                if !raw.is_nil() {
                    return Ok(raw);
                }
                let handler = t.metatable().map(|m| m.get_str("__index"));
                match handler {
                    Some(h) if !h.is_nil() => self.index_via_handler(&h, obj, key, depth),
                    _ => Ok(Value::Nil),
                }
            }
            Value::UserData(u) => {
                let handler = u.metatable().map(|m| m.get_str("__index"));
                match handler {
                    Some(h) if !h.is_nil() => self.index_via_handler(&h, obj, key, depth),
                    _ => Err(self.rt("attempt to index a userdata value")),
                }
            }
            Value::Str(_) => match self.vm.string_library() {
                Some(lib) => Ok(lib.get(key)),
                None => Err(self.rt("attempt to index a string value")),
            },
            other => Err(self.rt(format!(
                "attempt to index a {} value",
                other.type_name()
            ))),
        }
    }

    fn index_via_handler(
        &self,
        handler: &Value,
        obj: &Value,
        key: &Value,
        depth: usize,
    ) -> VmResult<Value> {
        match handler {
            Value::Function(_) | Value::Native(_) => {
                let results = self.call_value(handler, vec![obj.clone(), key.clone()])?;
                Ok(results.into_iter().next().unwrap_or(Value::Nil))
            }
            _ => self.index_chain(handler, key, depth + 1),
        }
    }

    pub fn setindex_value(&self, obj: &Value, key: &Value, value: Value) -> VmResult<()> {
        match obj {
            Value::Table(t) => {
                if !t.get(key).is_nil() {
                    return t.set(key.clone(), value);
                }
                let handler = t.metatable().map(|m| m.get_str("__newindex"));
                match handler {
                    Some(h) if !h.is_nil() => self.setindex_via_handler(&h, obj, key, value),
                    _ => t.set(key.clone(), value),
                }
            }
            Value::UserData(u) => {
                let handler = u.metatable().map(|m| m.get_str("__newindex"));
                match handler {
                    Some(h) if !h.is_nil() => self.setindex_via_handler(&h, obj, key, value),
                    _ => Err(self.rt("attempt to index a userdata value")),
                }
            }
            other => Err(self.rt(format!(
                "attempt to index a {} value",
                other.type_name()
            ))),
        }
    }

    fn setindex_via_handler(
        &self,
        handler: &Value,
        obj: &Value,
        key: &Value,
        value: Value,
    ) -> VmResult<()> {
        match handler {
            Value::Function(_) | Value::Native(_) => {
                self.call_value(handler, vec![obj.clone(), key.clone(), value])?;
                Ok(())
            }
            _ => self.setindex_value(handler, key, value),
        }
    }

    // ---- misc ---------------------------------------------------------------

    /// `tostring` with `__tostring` dispatch.
    pub fn tostring_value(&self, v: &Value) -> VmResult<String> {
        let handler = match v {
            Value::Table(t) => t.metatable().map(|m| m.get_str("__tostring")),
            Value::UserData(u) => u.metatable().map(|m| m.get_str("__tostring")),
            _ => None,
        };
        match handler {
            Some(h) if !h.is_nil() => {
                let results = self.call_value(&h, vec![v.clone()])?;
                Ok(results
                    .first()
                    .map(|r| r.display_basic())
                    .unwrap_or_default())
            }
            _ => Ok(v.display_basic()),
        }
    }
}
