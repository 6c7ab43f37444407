// Coroutines.
//
// Each coroutine body runs on its own worker thread; resume/yield is a
// rendezvous over channels, so exactly one side is ever making progress.
// That keeps the single-logical-thread execution model while giving
// `yield` the power to suspend from arbitrary call depth.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{VmError, VmErrorKind, VmResult};
use crate::interp::{Interp, VmState};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoStatus {
    /// Created, body not entered yet.
    Ready,
    /// Currently executing (the resumer is blocked).
    Running,
    /// Stopped at a yield point.
    Suspended,
    /// Body returned normally. Terminal.
    Dead,
    /// Body raised an error. Terminal.
    Failed,
}

impl CoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoStatus::Ready => "suspended",
            CoStatus::Running => "running",
            CoStatus::Suspended => "suspended",
            CoStatus::Dead => "dead",
            CoStatus::Failed => "dead",
        }
    }
}

pub(crate) enum CoEvent {
    Yield(Vec<Value>),
    Return(Vec<Value>),
    Error(VmError),
}

/// Held by the interpreter running inside a coroutine thread; `yield` talks
/// to the resumer through it.
pub struct YieldPort {
    event_tx: Sender<CoEvent>,
    resume_rx: Receiver<Vec<Value>>,
}

impl YieldPort {
    /// Hand values to the resumer and block until resumed again. Errors with
    /// `Terminated` when the owning handle went away; the coroutine thread
    /// unwinds silently in that case.
    pub(crate) fn do_yield(&self, values: Vec<Value>) -> VmResult<Vec<Value>> {
        if self.event_tx.send(CoEvent::Yield(values)).is_err() {
            return Err(VmError::terminated());
        }
        self.resume_rx.recv().map_err(|_| VmError::terminated())
    }
}

pub enum ResumeOutcome {
    Yielded(Vec<Value>),
    Returned(Vec<Value>),
}

struct CoroutineInner {
    status: CoStatus,
    /// The body, present until the first resume.
    func: Option<Value>,
    resume_tx: Option<Sender<Vec<Value>>>,
    event_rx: Option<Receiver<CoEvent>>,
    join: Option<thread::JoinHandle<()>>,
}

pub struct Coroutine {
    inner: Mutex<CoroutineInner>,
}

impl Drop for Coroutine {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        // Disconnecting the resume channel unblocks a suspended worker,
        // which then unwinds with a Terminated error and exits.
        inner.resume_tx.take();
        inner.event_rx.take();
        if let Some(handle) = inner.join.take() {
            drop(handle);
        }
    }
}

#[derive(Clone)]
pub struct ThreadRef(Arc<Coroutine>);

impl ThreadRef {
    pub fn new(func: Value) -> ThreadRef {
        ThreadRef(Arc::new(Coroutine {
            inner: Mutex::new(CoroutineInner {
                status: CoStatus::Ready,
                func: Some(func),
                resume_tx: None,
                event_rx: None,
                join: None,
            }),
        }))
    }

    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    pub fn ptr_eq(&self, other: &ThreadRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn status(&self) -> CoStatus {
        self.0.inner.lock().status
    }

    /// Advance the coroutine with `args`. The caller blocks until the body
    /// yields, returns, or raises.
    pub fn resume(&self, vm: &Arc<VmState>, args: Vec<Value>) -> VmResult<ResumeOutcome> {
        {
            let mut inner = self.0.inner.lock();
            match inner.status {
                CoStatus::Running => {
                    return Err(VmError::runtime("cannot resume non-suspended coroutine"));
                }
                CoStatus::Dead => {
                    return Err(VmError::runtime("cannot resume dead coroutine"));
                }
                CoStatus::Failed => {
                    return Err(VmError::runtime("cannot resume failed coroutine"));
                }
                CoStatus::Ready => {
                    let func = inner
                        .func
                        .take()
                        .ok_or_else(|| VmError::runtime("coroutine has no body"))?;
                    let (resume_tx, resume_rx) = unbounded::<Vec<Value>>();
                    let (event_tx, event_rx) = unbounded::<CoEvent>();
                    let port = Arc::new(YieldPort {
                        event_tx: event_tx.clone(),
                        resume_rx,
                    });
                    let vm = vm.clone();
                    let handle = thread::Builder::new()
                        .name("moonvm-coroutine".to_string())
                        .spawn(move || {
                            let interp = Interp::with_yield_port(vm, port);
                            match interp.call_value(&func, args) {
                                Ok(values) => {
                                    let _ = event_tx.send(CoEvent::Return(values));
                                }
                                Err(e) if e.kind == VmErrorKind::Terminated => {}
                                Err(e) => {
                                    let _ = event_tx.send(CoEvent::Error(e));
                                }
                            }
                        })
                        .map_err(|e| {
                            VmError::runtime(format!("failed to spawn coroutine thread: {}", e))
                        })?;
                    inner.status = CoStatus::Running;
                    inner.resume_tx = Some(resume_tx);
                    inner.event_rx = Some(event_rx);
                    inner.join = Some(handle);
                }
                CoStatus::Suspended => {
                    let tx = inner
                        .resume_tx
                        .clone()
                        .ok_or_else(|| VmError::runtime("coroutine channel missing"))?;
                    inner.status = CoStatus::Running;
                    if tx.send(args).is_err() {
                        inner.status = CoStatus::Failed;
                        return Err(VmError::runtime("coroutine worker is gone"));
                    }
                }
            }
        }
        self.wait_for_event()
    }

    fn wait_for_event(&self) -> VmResult<ResumeOutcome> {
        let rx = match self.0.inner.lock().event_rx.clone() {
            Some(rx) => rx,
            None => return Err(VmError::runtime("coroutine channel missing")),
        };
        match rx.recv() {
            Ok(CoEvent::Yield(values)) => {
                self.0.inner.lock().status = CoStatus::Suspended;
                Ok(ResumeOutcome::Yielded(values))
            }
            Ok(CoEvent::Return(values)) => {
                self.finish(CoStatus::Dead);
                Ok(ResumeOutcome::Returned(values))
            }
            Ok(CoEvent::Error(e)) => {
                self.finish(CoStatus::Failed);
                Err(e)
            }
            Err(_) => {
                self.finish(CoStatus::Failed);
                Err(VmError::runtime("coroutine worker terminated unexpectedly"))
            }
        }
    }

    fn finish(&self, status: CoStatus) {
        let mut inner = self.0.inner.lock();
        inner.status = status;
        inner.resume_tx.take();
        inner.event_rx.take();
        if let Some(handle) = inner.join.take() {
            // The worker already sent its final event; joining is cheap and
            // keeps thread accounting tidy.
            let _ = handle.join();
        }
    }
}
