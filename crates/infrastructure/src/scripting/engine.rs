//! The rhai capability surface
//!
//! Registers the script-visible API onto an engine: the `req`/`res`/`qv`
//! handles, bare console functions, `test`/`expect` assertions, and the
//! `sleep`/`set_timeout` timer primitives. Every backend builds its engine
//! through here, which is what keeps the surface identical; only the
//! [`CapabilityHost`] behind the handles differs.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rhai::{
    Dynamic, Engine, EvalAltResult, FnPtr, NativeCallContext, Position, Scope,
};
use serde_json::Value;

use super::bridge::CapabilityCall;

/// One side of the capability boundary: in-process hosts dispatch directly,
/// the isolated worker marshals each call to the host process loop.
pub trait CapabilityHost {
    /// Invokes a capability; errors are plain messages.
    fn invoke(&self, call: CapabilityCall) -> Result<Value, String>;
}

/// Aborts in-flight work: cooperative cancellation for in-process backends,
/// the hard-interrupt flag for the isolated worker.
#[derive(Clone, Default)]
pub struct InterruptFlag {
    flag: Arc<AtomicBool>,
}

impl InterruptFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag.
    pub fn raise(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns true once raised.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A callback scheduled via `set_timeout`, ordered by requested delay then
/// scheduling order.
struct TimerJob {
    delay_ms: i64,
    seq: usize,
    callback: FnPtr,
}

/// The synthetic timer queue backing the `setTimeout`-shaped shim.
#[derive(Default)]
pub struct TimerQueue {
    jobs: Vec<TimerJob>,
    next_seq: usize,
}

impl TimerQueue {
    fn schedule(&mut self, callback: FnPtr, delay_ms: i64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.jobs.push(TimerJob {
            delay_ms: delay_ms.max(0),
            seq,
            callback,
        });
    }

    fn pop_next(&mut self) -> Option<TimerJob> {
        if self.jobs.is_empty() {
            return None;
        }
        let mut best = 0;
        for (index, job) in self.jobs.iter().enumerate() {
            let current = &self.jobs[best];
            if (job.delay_ms, job.seq) < (current.delay_ms, current.seq) {
                best = index;
            }
        }
        Some(self.jobs.remove(best))
    }
}

/// Engine safety limits; the portable backend constrains, the unrestricted
/// one does not.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineLimits {
    /// Operation ceiling, when set.
    pub max_operations: Option<u64>,
    /// Call-depth ceiling, when set.
    pub max_call_levels: Option<usize>,
}

impl EngineLimits {
    /// The constrained profile used by the portable and isolated backends.
    #[must_use]
    pub const fn constrained() -> Self {
        Self {
            max_operations: Some(10_000_000),
            max_call_levels: Some(64),
        }
    }
}

fn runtime_error(message: impl Into<String>) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        Dynamic::from(message.into()),
        Position::NONE,
    ))
}

fn cancelled_error() -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorTerminated(
        Dynamic::from("cancelled".to_string()),
        Position::NONE,
    ))
}

/// Converts a rhai value to JSON, substituting its display form for anything
/// non-serializable (function pointers and the like never cross the
/// boundary).
#[must_use]
pub fn dynamic_to_json(value: &Dynamic) -> Value {
    rhai::serde::from_dynamic::<Value>(value)
        .unwrap_or_else(|_| Value::String(value.to_string()))
}

/// Converts JSON to a rhai value.
#[must_use]
pub fn json_to_dynamic(value: Value) -> Dynamic {
    rhai::serde::to_dynamic(value).unwrap_or(Dynamic::UNIT)
}

fn invoke(
    host: &Rc<dyn CapabilityHost>,
    method: &str,
    args: Vec<Value>,
) -> Result<Dynamic, Box<EvalAltResult>> {
    host.invoke(CapabilityCall::new(method, args))
        .map(json_to_dynamic)
        .map_err(runtime_error)
}

/// The `req` handle.
#[derive(Clone)]
pub struct RequestApi {
    host: Rc<dyn CapabilityHost>,
}

/// The `res` handle.
#[derive(Clone)]
pub struct ResponseApi {
    host: Rc<dyn CapabilityHost>,
}

/// The `qv` handle (variables, process env, next-request).
#[derive(Clone)]
pub struct VarsApi {
    host: Rc<dyn CapabilityHost>,
}

/// The value under assertion inside a `test` callback.
#[derive(Clone)]
pub struct Expectation {
    actual: Dynamic,
}

fn assertion_error(message: &str, actual: &Dynamic, expected: Value) -> Box<EvalAltResult> {
    let payload = serde_json::json!({
        "message": message,
        "actual": dynamic_to_json(actual),
        "expected": expected,
    });
    Box::new(EvalAltResult::ErrorRuntime(
        json_to_dynamic(payload),
        Position::NONE,
    ))
}

#[allow(clippy::needless_pass_by_value)]
fn register_request_api(engine: &mut Engine, host: Rc<dyn CapabilityHost>) {
    engine.register_type_with_name::<RequestApi>("Request");

    let h = host.clone();
    engine.register_fn("get_url", move |_r: &mut RequestApi| {
        invoke(&h, "req.get_url", vec![])
    });
    let h = host.clone();
    engine.register_fn("set_url", move |_r: &mut RequestApi, url: &str| {
        invoke(&h, "req.set_url", vec![Value::String(url.to_string())])
    });
    let h = host.clone();
    engine.register_fn("get_method", move |_r: &mut RequestApi| {
        invoke(&h, "req.get_method", vec![])
    });
    let h = host.clone();
    engine.register_fn("set_method", move |_r: &mut RequestApi, method: &str| {
        invoke(&h, "req.set_method", vec![Value::String(method.to_string())])
    });
    let h = host.clone();
    engine.register_fn("get_header", move |_r: &mut RequestApi, name: &str| {
        invoke(&h, "req.get_header", vec![Value::String(name.to_string())])
    });
    let h = host.clone();
    engine.register_fn(
        "set_header",
        move |_r: &mut RequestApi, name: &str, value: &str| {
            invoke(
                &h,
                "req.set_header",
                vec![
                    Value::String(name.to_string()),
                    Value::String(value.to_string()),
                ],
            )
        },
    );
    let h = host.clone();
    engine.register_fn("get_headers", move |_r: &mut RequestApi| {
        invoke(&h, "req.get_headers", vec![])
    });
    let h = host.clone();
    engine.register_fn("set_headers", move |_r: &mut RequestApi, headers: Dynamic| {
        invoke(&h, "req.set_headers", vec![dynamic_to_json(&headers)])
    });
    let h = host.clone();
    engine.register_fn("get_body", move |_r: &mut RequestApi| {
        invoke(&h, "req.get_body", vec![])
    });
    let h = host.clone();
    engine.register_fn("get_body_raw", move |_r: &mut RequestApi| {
        invoke(&h, "req.get_body_raw", vec![])
    });
    let h = host.clone();
    engine.register_fn("set_body", move |_r: &mut RequestApi, body: Dynamic| {
        invoke(&h, "req.set_body", vec![dynamic_to_json(&body)])
    });
    let h = host.clone();
    engine.register_fn("get_timeout", move |_r: &mut RequestApi| {
        invoke(&h, "req.get_timeout", vec![])
    });
    let h = host.clone();
    engine.register_fn("set_timeout", move |_r: &mut RequestApi, timeout: i64| {
        invoke(&h, "req.set_timeout", vec![Value::from(timeout.max(0))])
    });
    let h = host.clone();
    engine.register_fn(
        "set_max_redirects",
        move |_r: &mut RequestApi, max: i64| {
            invoke(&h, "req.set_max_redirects", vec![Value::from(max.max(0))])
        },
    );
    let h = host;
    engine.register_fn("get_auth_mode", move |_r: &mut RequestApi| {
        invoke(&h, "req.get_auth_mode", vec![])
    });
}

#[allow(clippy::needless_pass_by_value)]
fn register_response_api(engine: &mut Engine, host: Rc<dyn CapabilityHost>) {
    engine.register_type_with_name::<ResponseApi>("Response");

    let h = host.clone();
    engine.register_fn("get_status", move |_r: &mut ResponseApi| {
        invoke(&h, "res.get_status", vec![])
    });
    let h = host.clone();
    engine.register_fn("get_header", move |_r: &mut ResponseApi, name: &str| {
        invoke(&h, "res.get_header", vec![Value::String(name.to_string())])
    });
    let h = host.clone();
    engine.register_fn("get_headers", move |_r: &mut ResponseApi| {
        invoke(&h, "res.get_headers", vec![])
    });
    let h = host.clone();
    engine.register_fn("get_body", move |_r: &mut ResponseApi| {
        invoke(&h, "res.get_body", vec![])
    });
    let h = host;
    engine.register_fn("get_body_raw", move |_r: &mut ResponseApi| {
        invoke(&h, "res.get_body_raw", vec![])
    });
}

#[allow(clippy::needless_pass_by_value)]
fn register_vars_api(engine: &mut Engine, host: Rc<dyn CapabilityHost>) {
    engine.register_type_with_name::<VarsApi>("Vars");

    let h = host.clone();
    engine.register_fn("get_env_var", move |_v: &mut VarsApi, name: &str| {
        invoke(&h, "vars.get_env", vec![Value::String(name.to_string())])
    });
    let h = host.clone();
    engine.register_fn(
        "set_env_var",
        move |_v: &mut VarsApi, name: &str, value: Dynamic| {
            invoke(
                &h,
                "vars.set_env",
                vec![Value::String(name.to_string()), dynamic_to_json(&value)],
            )
        },
    );
    let h = host.clone();
    engine.register_fn("get_var", move |_v: &mut VarsApi, name: &str| {
        invoke(&h, "vars.get_collection", vec![Value::String(name.to_string())])
    });
    let h = host.clone();
    engine.register_fn(
        "set_var",
        move |_v: &mut VarsApi, name: &str, value: Dynamic| {
            invoke(
                &h,
                "vars.set_collection",
                vec![Value::String(name.to_string()), dynamic_to_json(&value)],
            )
        },
    );
    let h = host.clone();
    engine.register_fn("get_folder_var", move |_v: &mut VarsApi, name: &str| {
        invoke(&h, "vars.get_folder", vec![Value::String(name.to_string())])
    });
    let h = host.clone();
    engine.register_fn("get_request_var", move |_v: &mut VarsApi, name: &str| {
        invoke(&h, "vars.get_request", vec![Value::String(name.to_string())])
    });
    let h = host.clone();
    engine.register_fn("get_process_env", move |_v: &mut VarsApi, name: &str| {
        invoke(&h, "vars.get_process_env", vec![Value::String(name.to_string())])
    });
    let h = host.clone();
    engine.register_fn("get_collection_path", move |_v: &mut VarsApi| {
        invoke(&h, "vars.get_collection_path", vec![])
    });
    let h = host;
    engine.register_fn("set_next_request", move |_v: &mut VarsApi, name: &str| {
        invoke(&h, "vars.set_next_request", vec![Value::String(name.to_string())])
    });
}

fn register_console(engine: &mut Engine, host: &Rc<dyn CapabilityHost>) {
    for level in ["log", "debug", "info", "warn", "error"] {
        let method = format!("console.{level}");

        let h = host.clone();
        let m = method.clone();
        engine.register_fn(level, move |a: Dynamic| {
            let _ = h.invoke(CapabilityCall::new(&m, vec![dynamic_to_json(&a)]));
        });

        let h = host.clone();
        let m = method.clone();
        engine.register_fn(level, move |a: Dynamic, b: Dynamic| {
            let _ = h.invoke(CapabilityCall::new(
                &m,
                vec![dynamic_to_json(&a), dynamic_to_json(&b)],
            ));
        });

        let h = host.clone();
        let m = method;
        engine.register_fn(level, move |a: Dynamic, b: Dynamic, c: Dynamic| {
            let _ = h.invoke(CapabilityCall::new(
                &m,
                vec![dynamic_to_json(&a), dynamic_to_json(&b), dynamic_to_json(&c)],
            ));
        });
    }
}

/// Destructures an error thrown inside a `test` callback into the recorded
/// result shape. Assertion errors carry `{message, actual, expected}`; any
/// other error contributes its message.
fn test_failure(description: &str, error: &EvalAltResult) -> Value {
    fn message_text(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    if let EvalAltResult::ErrorRuntime(payload, _) = error {
        let json = dynamic_to_json(payload);
        if let Value::Object(map) = &json {
            if let Some(message) = map.get("message") {
                return serde_json::json!({
                    "description": description,
                    "status": "fail",
                    "error": message_text(message),
                    "actual": map.get("actual").cloned().unwrap_or(Value::Null),
                    "expected": map.get("expected").cloned().unwrap_or(Value::Null),
                });
            }
        }
        return serde_json::json!({
            "description": description,
            "status": "fail",
            "error": message_text(&json),
        });
    }
    serde_json::json!({
        "description": description,
        "status": "fail",
        "error": error.to_string(),
    })
}

fn register_tests(engine: &mut Engine, host: &Rc<dyn CapabilityHost>) {
    let h = host.clone();
    engine.register_fn(
        "test",
        move |ctx: NativeCallContext, description: &str, callback: FnPtr| {
            let record = match callback.call_within_context::<Dynamic>(&ctx, ()) {
                Ok(_) => serde_json::json!({
                    "description": description,
                    "status": "pass",
                }),
                Err(error) => test_failure(description, &error),
            };
            let _ = h.invoke(CapabilityCall::new("test.record", vec![record]));
        },
    );

    engine.register_type_with_name::<Expectation>("Expectation");
    engine.register_fn("expect", |actual: Dynamic| Expectation { actual });

    engine.register_fn(
        "to_equal",
        |e: &mut Expectation, expected: Dynamic| -> Result<(), Box<EvalAltResult>> {
            if dynamic_to_json(&e.actual) == dynamic_to_json(&expected) {
                Ok(())
            } else {
                Err(assertion_error(
                    "expected values to be equal",
                    &e.actual,
                    dynamic_to_json(&expected),
                ))
            }
        },
    );
    engine.register_fn(
        "to_not_equal",
        |e: &mut Expectation, expected: Dynamic| -> Result<(), Box<EvalAltResult>> {
            if dynamic_to_json(&e.actual) == dynamic_to_json(&expected) {
                Err(assertion_error(
                    "expected values to differ",
                    &e.actual,
                    dynamic_to_json(&expected),
                ))
            } else {
                Ok(())
            }
        },
    );
    engine.register_fn(
        "to_be_above",
        |e: &mut Expectation, expected: Dynamic| -> Result<(), Box<EvalAltResult>> {
            match (as_number(&e.actual), as_number(&expected)) {
                (Some(actual), Some(bound)) if actual > bound => Ok(()),
                _ => Err(assertion_error(
                    "expected value to be above bound",
                    &e.actual,
                    dynamic_to_json(&expected),
                )),
            }
        },
    );
    engine.register_fn(
        "to_be_below",
        |e: &mut Expectation, expected: Dynamic| -> Result<(), Box<EvalAltResult>> {
            match (as_number(&e.actual), as_number(&expected)) {
                (Some(actual), Some(bound)) if actual < bound => Ok(()),
                _ => Err(assertion_error(
                    "expected value to be below bound",
                    &e.actual,
                    dynamic_to_json(&expected),
                )),
            }
        },
    );
    engine.register_fn(
        "to_contain",
        |e: &mut Expectation, needle: Dynamic| -> Result<(), Box<EvalAltResult>> {
            let contains = match dynamic_to_json(&e.actual) {
                Value::String(s) => s.contains(&needle.to_string()),
                Value::Array(items) => items.contains(&dynamic_to_json(&needle)),
                _ => false,
            };
            if contains {
                Ok(())
            } else {
                Err(assertion_error(
                    "expected value to contain needle",
                    &e.actual,
                    dynamic_to_json(&needle),
                ))
            }
        },
    );
    engine.register_fn(
        "to_be_true",
        |e: &mut Expectation| -> Result<(), Box<EvalAltResult>> {
            if e.actual.as_bool() == Ok(true) {
                Ok(())
            } else {
                Err(assertion_error("expected true", &e.actual, Value::Bool(true)))
            }
        },
    );
    engine.register_fn(
        "to_be_false",
        |e: &mut Expectation| -> Result<(), Box<EvalAltResult>> {
            if e.actual.as_bool() == Ok(false) {
                Ok(())
            } else {
                Err(assertion_error("expected false", &e.actual, Value::Bool(false)))
            }
        },
    );
    engine.register_fn(
        "to_have_length",
        |e: &mut Expectation, expected: i64| -> Result<(), Box<EvalAltResult>> {
            let length = match dynamic_to_json(&e.actual) {
                Value::String(s) => Some(s.chars().count()),
                Value::Array(items) => Some(items.len()),
                Value::Object(map) => Some(map.len()),
                _ => None,
            };
            if length == usize::try_from(expected).ok() {
                Ok(())
            } else {
                Err(assertion_error(
                    "expected a different length",
                    &e.actual,
                    Value::from(expected),
                ))
            }
        },
    );
}

fn as_number(value: &Dynamic) -> Option<f64> {
    #[allow(clippy::cast_precision_loss)]
    if let Ok(int) = value.as_int() {
        Some(int as f64)
    } else if let Ok(float) = value.as_float() {
        Some(float)
    } else {
        value.to_string().parse().ok()
    }
}

/// Sleeps in small slices so cancellation is observed at delay-resumption
/// points. Returns an error once the flag is raised.
fn cancellable_sleep(ms: i64, interrupt: &InterruptFlag) -> Result<(), Box<EvalAltResult>> {
    const SLICE_MS: u64 = 10;
    let mut remaining = u64::try_from(ms.max(0)).unwrap_or(0);
    loop {
        if interrupt.is_raised() {
            return Err(cancelled_error());
        }
        if remaining == 0 {
            return Ok(());
        }
        let step = remaining.min(SLICE_MS);
        std::thread::sleep(Duration::from_millis(step));
        remaining -= step;
    }
}

fn register_timers(
    engine: &mut Engine,
    timers: &Rc<RefCell<TimerQueue>>,
    interrupt: &InterruptFlag,
) {
    let flag = interrupt.clone();
    engine.register_fn("sleep", move |ms: i64| cancellable_sleep(ms, &flag));

    let queue = Rc::clone(timers);
    engine.register_fn("set_timeout", move |callback: FnPtr, delay_ms: i64| {
        queue.borrow_mut().schedule(callback, delay_ms);
    });
    let queue = Rc::clone(timers);
    engine.register_fn("set_timeout", move |callback: FnPtr| {
        queue.borrow_mut().schedule(callback, 0);
    });
}

/// Everything needed to build a backend engine.
pub struct EngineSetup {
    /// The capability host behind every handle.
    pub host: Rc<dyn CapabilityHost>,
    /// Whether the `res` handle is in scope.
    pub has_response: bool,
    /// Safety limits.
    pub limits: EngineLimits,
    /// Cancellation/interrupt flag.
    pub interrupt: InterruptFlag,
}

/// Builds an engine with the full capability surface and returns it together
/// with its timer queue and base scope.
#[must_use]
pub fn build_engine(setup: &EngineSetup) -> (Engine, Rc<RefCell<TimerQueue>>, Scope<'static>) {
    let mut engine = Engine::new();
    let timers = Rc::new(RefCell::new(TimerQueue::default()));

    if let Some(max_operations) = setup.limits.max_operations {
        engine.set_max_operations(max_operations);
    }
    if let Some(max_call_levels) = setup.limits.max_call_levels {
        engine.set_max_call_levels(max_call_levels);
    }

    let flag = setup.interrupt.clone();
    engine.on_progress(move |_| {
        if flag.is_raised() {
            Some(Dynamic::from("interrupted".to_string()))
        } else {
            None
        }
    });

    register_request_api(&mut engine, setup.host.clone());
    register_vars_api(&mut engine, setup.host.clone());
    if setup.has_response {
        register_response_api(&mut engine, setup.host.clone());
    }
    register_console(&mut engine, &setup.host);
    register_tests(&mut engine, &setup.host);
    register_timers(&mut engine, &timers, &setup.interrupt);

    let mut scope = Scope::new();
    scope.push("req", RequestApi {
        host: setup.host.clone(),
    });
    scope.push("qv", VarsApi {
        host: setup.host.clone(),
    });
    if setup.has_response {
        scope.push("res", ResponseApi {
            host: setup.host.clone(),
        });
    }

    (engine, timers, scope)
}

/// How a script run ended, before the dispatcher maps it onto the error
/// taxonomy.
#[derive(Debug)]
pub enum RunEnd {
    /// Ran to completion (timer queue drained).
    Completed,
    /// The script failed to parse.
    Syntax(String),
    /// The script threw; partial mutations stand.
    Runtime(String),
    /// The interrupt flag ended the run.
    Interrupted,
}

/// Compiles and runs a script, then drains the timer queue cooperatively.
#[must_use]
pub fn run_script(
    engine: &Engine,
    scope: &mut Scope<'static>,
    timers: &Rc<RefCell<TimerQueue>>,
    interrupt: &InterruptFlag,
    script: &str,
) -> RunEnd {
    let ast = match engine.compile(script) {
        Ok(ast) => ast,
        Err(parse_error) => return RunEnd::Syntax(parse_error.to_string()),
    };

    if let Err(error) = engine.run_ast_with_scope(scope, &ast) {
        return classify(&error);
    }

    // Cooperative drain: jobs fire ordered by requested delay, then
    // scheduling order, waiting out the remaining delta between jobs.
    let mut elapsed_ms: i64 = 0;
    loop {
        let job = timers.borrow_mut().pop_next();
        let Some(job) = job else { break };

        if job.delay_ms > elapsed_ms {
            if cancellable_sleep(job.delay_ms - elapsed_ms, interrupt).is_err() {
                return RunEnd::Interrupted;
            }
            elapsed_ms = job.delay_ms;
        }
        if let Err(error) = job.callback.call::<Dynamic>(engine, &ast, ()) {
            return classify(&error);
        }
    }

    RunEnd::Completed
}

fn classify(error: &EvalAltResult) -> RunEnd {
    if matches!(error, EvalAltResult::ErrorTerminated(..)) {
        RunEnd::Interrupted
    } else {
        RunEnd::Runtime(error.to_string())
    }
}
