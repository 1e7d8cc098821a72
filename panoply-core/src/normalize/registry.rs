use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};
use tracing::debug;

#[derive(Clone, Copy)]
struct Entry {
    code: u16,
    name: &'static str,
    matches: fn(&anyhow::Error) -> bool,
}

fn registry() -> &'static RwLock<HashMap<TypeId, Entry>> {
    static REGISTRY: OnceLock<RwLock<HashMap<TypeId, Entry>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

fn is_type<E>(err: &anyhow::Error) -> bool
where
    E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
{
    err.is::<E>()
}

/// Associates an error type with a code from the code table.
///
/// Meant to run once per type during plugin start-up. Codes outside the
/// table are accepted here and reported as normalization failures later.
pub fn register_error_code<E>(code: u16)
where
    E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
{
    let entry = Entry {
        code,
        name: type_name::<E>(),
        matches: is_type::<E>,
    };

    let mut registry = registry().write().unwrap_or_else(|e| e.into_inner());
    if registry.insert(TypeId::of::<E>(), entry).is_some() {
        debug!(error_type = entry.name, code, "Replaced error code registration");
    } else {
        debug!(error_type = entry.name, code, "Registered error code");
    }
}

/// Registered code for `E`, if any.
pub fn registered_code<E: 'static>() -> Option<u16> {
    let registry = registry().read().unwrap_or_else(|e| e.into_inner());
    registry.get(&TypeId::of::<E>()).map(|entry| entry.code)
}

/// Code and type name registered for the concrete error inside `err`.
///
/// `static_type` is the type the error had before it was boxed; it is
/// looked up first, then every registration is tried against `err`.
pub(crate) fn lookup(static_type: TypeId, err: &anyhow::Error) -> Option<(u16, &'static str)> {
    let registry = registry().read().unwrap_or_else(|e| e.into_inner());

    if let Some(entry) = registry.get(&static_type) {
        return Some((entry.code, entry.name));
    }

    registry
        .values()
        .find(|entry| (entry.matches)(err))
        .map(|entry| (entry.code, entry.name))
}
