// Debug hooks: optional line/call/return notifications.
//
// Hooks are pure notifications; the interpreter ignores anything a handler
// does and never lets it influence execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smol_str::SmolStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    Line,
    Call,
    Return,
}

/// Snapshot handed to hook handlers, modeled on `lua_Debug`.
#[derive(Debug, Clone)]
pub struct DebugInfo {
    pub current_line: u32,
    /// Chunk label of the running code.
    pub source: SmolStr,
    /// Name of the function involved, empty when unknown.
    pub name: SmolStr,
    /// How the name was derived: "global", "method", "local", or "".
    pub name_what: SmolStr,
    /// Coarse classification: "main", "Lua", or "native".
    pub what: SmolStr,
}

pub type HookHandler = Arc<dyn Fn(HookEvent, &DebugInfo) + Send + Sync>;

pub struct HookState {
    pub line_enabled: AtomicBool,
    pub call_enabled: AtomicBool,
    pub return_enabled: AtomicBool,
    handler: Mutex<Option<HookHandler>>,
}

impl HookState {
    pub fn new() -> Self {
        HookState {
            line_enabled: AtomicBool::new(false),
            call_enabled: AtomicBool::new(false),
            return_enabled: AtomicBool::new(false),
            handler: Mutex::new(None),
        }
    }

    pub fn set_handler(&self, handler: Option<HookHandler>) {
        *self.handler.lock() = handler;
    }

    pub fn wants(&self, event: HookEvent) -> bool {
        let flag = match event {
            HookEvent::Line => &self.line_enabled,
            HookEvent::Call => &self.call_enabled,
            HookEvent::Return => &self.return_enabled,
        };
        flag.load(Ordering::Relaxed) && self.handler.lock().is_some()
    }

    pub fn emit(&self, event: HookEvent, info: &DebugInfo) {
        let handler = self.handler.lock().clone();
        if let Some(h) = handler {
            h(event, info);
        }
    }
}

impl Default for HookState {
    fn default() -> Self {
        HookState::new()
    }
}
