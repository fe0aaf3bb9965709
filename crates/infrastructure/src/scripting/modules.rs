//! Module access control
//!
//! A build-time capability table maps known module names to vetted rhai
//! module builders. A fixed safe allowlist is always available; the
//! configured whitelist may enable the optional entries. Unknown names are
//! rejected outright (logged and skipped, never fatal). Inside a script an
//! unresolved module name simply fails to import; the host never crashes.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::Rng as _;
use rhai::{Dynamic, Engine, EvalAltResult, Module, Position};
use tracing::warn;

use super::fs_guard::PathGuard;

/// The vetted modules scripts can import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// `json::parse` / `json::stringify`
    Json,
    /// `base64::encode` / `base64::decode`
    Base64,
    /// `time::now_iso` / `time::timestamp_millis`
    Time,
    /// `uuid::v4`
    Uuid,
    /// `random::int` / `random::float` (whitelist-gated)
    Random,
    /// `regex::is_match` / `regex::find` / `regex::replace` (whitelist-gated)
    Regex,
    /// `fs::*` (whitelist-gated, plus the filesystem-access flag)
    Fs,
}

/// Modules that are always available, regardless of configuration.
pub const FIXED_ALLOWLIST: &[ModuleKind] = &[
    ModuleKind::Json,
    ModuleKind::Base64,
    ModuleKind::Time,
    ModuleKind::Uuid,
];

fn lookup(name: &str) -> Option<ModuleKind> {
    match name {
        "json" => Some(ModuleKind::Json),
        "base64" => Some(ModuleKind::Base64),
        "time" => Some(ModuleKind::Time),
        "uuid" => Some(ModuleKind::Uuid),
        "random" => Some(ModuleKind::Random),
        "regex" => Some(ModuleKind::Regex),
        "fs" => Some(ModuleKind::Fs),
        _ => None,
    }
}

/// Resolves the configured whitelist against the capability table.
///
/// Returns the fixed allowlist plus every whitelisted module that resolved.
/// Unresolvable names are logged and skipped. The `fs` module additionally
/// requires the filesystem-access flag.
#[must_use]
pub fn resolve_modules(whitelist: &[String], filesystem_allowed: bool) -> Vec<ModuleKind> {
    let mut resolved: Vec<ModuleKind> = FIXED_ALLOWLIST.to_vec();

    for name in whitelist {
        match lookup(name) {
            Some(ModuleKind::Fs) if !filesystem_allowed => {
                warn!(module = %name, "fs module requires filesystem access; skipping");
            }
            Some(kind) => {
                if !resolved.contains(&kind) {
                    resolved.push(kind);
                }
            }
            None => {
                warn!(module = %name, "unknown module in whitelist; skipping");
            }
        }
    }

    resolved
}

fn runtime_error(message: impl Into<String>) -> Box<EvalAltResult> {
    Box::new(EvalAltResult::ErrorRuntime(
        Dynamic::from(message.into()),
        Position::NONE,
    ))
}

fn json_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("parse", |source: &str| {
        let value: serde_json::Value = serde_json::from_str(source)
            .map_err(|e| runtime_error(format!("json::parse: {e}")))?;
        rhai::serde::to_dynamic(value)
    });
    module.set_native_fn("stringify", |value: Dynamic| {
        let json: serde_json::Value = rhai::serde::from_dynamic(&value)
            .map_err(|e| runtime_error(format!("json::stringify: {e}")))?;
        serde_json::to_string(&json).map_err(|e| runtime_error(format!("json::stringify: {e}")))
    });
    module
}

fn base64_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("encode", |value: &str| Ok(BASE64.encode(value)));
    module.set_native_fn("decode", |value: &str| {
        let bytes = BASE64
            .decode(value)
            .map_err(|e| runtime_error(format!("base64::decode: {e}")))?;
        String::from_utf8(bytes).map_err(|e| runtime_error(format!("base64::decode: {e}")))
    });
    module
}

fn time_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("now_iso", || Ok(chrono::Utc::now().to_rfc3339()));
    module.set_native_fn("timestamp_millis", || {
        Ok(chrono::Utc::now().timestamp_millis())
    });
    module
}

fn uuid_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("v4", || Ok(uuid::Uuid::new_v4().to_string()));
    module
}

fn random_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("int", |min: i64, max: i64| {
        if min > max {
            return Err(runtime_error("random::int: min is greater than max"));
        }
        Ok(rand::rng().random_range(min..=max))
    });
    module.set_native_fn("float", || Ok(rand::rng().random_range(0.0..1.0_f64)));
    module
}

fn regex_module() -> Module {
    fn compiled(pattern: &str) -> Result<regex::Regex, Box<EvalAltResult>> {
        regex::Regex::new(pattern).map_err(|e| runtime_error(format!("regex: {e}")))
    }

    let mut module = Module::new();
    module.set_native_fn("is_match", |pattern: &str, haystack: &str| {
        Ok(compiled(pattern)?.is_match(haystack))
    });
    module.set_native_fn("find", |pattern: &str, haystack: &str| {
        Ok(compiled(pattern)?
            .find(haystack)
            .map_or(Dynamic::UNIT, |m| Dynamic::from(m.as_str().to_string())))
    });
    module.set_native_fn(
        "replace",
        |pattern: &str, haystack: &str, replacement: &str| {
            Ok(compiled(pattern)?
                .replace_all(haystack, replacement)
                .into_owned())
        },
    );
    module
}

fn fs_module(guard: &PathGuard) -> Module {
    let mut module = Module::new();

    let g = guard.clone();
    module.set_native_fn("read_text", move |path: &str| {
        let resolved = g.resolve(path).map_err(runtime_error)?;
        std::fs::read_to_string(&resolved)
            .map_err(|e| runtime_error(format!("fs::read_text {}: {e}", resolved.display())))
    });

    let g = guard.clone();
    module.set_native_fn("write_text", move |path: &str, content: &str| {
        let resolved = g.resolve(path).map_err(runtime_error)?;
        std::fs::write(&resolved, content)
            .map_err(|e| runtime_error(format!("fs::write_text {}: {e}", resolved.display())))?;
        Ok(Dynamic::UNIT)
    });

    let g = guard.clone();
    module.set_native_fn("exists", move |path: &str| {
        let resolved = g.resolve(path).map_err(runtime_error)?;
        Ok(resolved.exists())
    });

    let g = guard.clone();
    module.set_native_fn("list", move |path: &str| {
        let resolved = g.resolve(path).map_err(runtime_error)?;
        let entries = std::fs::read_dir(&resolved)
            .map_err(|e| runtime_error(format!("fs::list {}: {e}", resolved.display())))?;
        let names: rhai::Array = entries
            .filter_map(Result::ok)
            .map(|entry| Dynamic::from(entry.file_name().to_string_lossy().into_owned()))
            .collect();
        Ok(names)
    });

    module
}

/// Registers the resolved modules onto an engine.
///
/// The `fs` module is only registered when a guard is supplied; callers gate
/// that on the filesystem-access flag.
pub fn register_modules(engine: &mut Engine, kinds: &[ModuleKind], guard: Option<&PathGuard>) {
    for kind in kinds {
        match kind {
            ModuleKind::Json => {
                engine.register_static_module("json", json_module().into());
            }
            ModuleKind::Base64 => {
                engine.register_static_module("base64", base64_module().into());
            }
            ModuleKind::Time => {
                engine.register_static_module("time", time_module().into());
            }
            ModuleKind::Uuid => {
                engine.register_static_module("uuid", uuid_module().into());
            }
            ModuleKind::Random => {
                engine.register_static_module("random", random_module().into());
            }
            ModuleKind::Regex => {
                engine.register_static_module("regex", regex_module().into());
            }
            ModuleKind::Fs => {
                if let Some(guard) = guard {
                    engine.register_static_module("fs", fs_module(guard).into());
                }
            }
        }
    }
}
