use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::state;
use moonvm::HookEvent;

#[test]
fn line_and_call_events_fire() {
    let st = state();
    let lines = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let returns = Arc::new(AtomicUsize::new(0));
    let (l, c, r) = (lines.clone(), calls.clone(), returns.clone());
    st.set_hook_handler(
        true,
        true,
        true,
        Some(Arc::new(move |event, _info| match event {
            HookEvent::Line => {
                l.fetch_add(1, Ordering::Relaxed);
            }
            HookEvent::Call => {
                c.fetch_add(1, Ordering::Relaxed);
            }
            HookEvent::Return => {
                r.fetch_add(1, Ordering::Relaxed);
            }
        })),
    );

    st.run_code(
        "local x = 1\nlocal function f() return x + 1 end\nreturn f()",
        "hooked",
    )
    .unwrap();

    assert!(lines.load(Ordering::Relaxed) >= 3);
    assert!(calls.load(Ordering::Relaxed) >= 1);
    assert_eq!(calls.load(Ordering::Relaxed), returns.load(Ordering::Relaxed));
}

#[test]
fn removing_the_handler_stops_events() {
    let st = state();
    let lines = Arc::new(AtomicUsize::new(0));
    let l = lines.clone();
    st.set_hook_handler(
        true,
        false,
        false,
        Some(Arc::new(move |event, _info| {
            if matches!(event, HookEvent::Line) {
                l.fetch_add(1, Ordering::Relaxed);
            }
        })),
    );
    st.run_code("return 1", "a").unwrap();
    let seen = lines.load(Ordering::Relaxed);
    assert!(seen >= 1);

    st.set_hook_handler(false, false, false, None);
    st.run_code("return 2", "b").unwrap();
    assert_eq!(lines.load(Ordering::Relaxed), seen);
}

#[test]
fn hook_sees_source_and_line() {
    let st = state();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    st.set_hook_handler(
        true,
        false,
        false,
        Some(Arc::new(move |_event, info| {
            s.lock().push((info.source.to_string(), info.current_line));
        })),
    );
    st.run_code("local a = 1\nlocal b = 2", "traced").unwrap();
    st.set_hook_handler(false, false, false, None);

    let seen = seen.lock();
    assert!(seen.contains(&("traced".to_string(), 1)));
    assert!(seen.contains(&("traced".to_string(), 2)));
}

#[test]
fn print_sink_captures_output() {
    let st = state();
    let out = Arc::new(Mutex::new(Vec::new()));
    let sink = out.clone();
    st.set_print_sink(move |line| sink.lock().push(line.to_string()));
    st.run_code("print('hello', 2)", "p").unwrap();
    assert_eq!(out.lock().as_slice(), ["hello\t2".to_string()]);
}
