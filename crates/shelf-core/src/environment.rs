//! Environment handed to runtime children.
//!
//! A host that is itself an Electron app exports markers which make a
//! spawned Electron binary behave as a plain Node process. They are removed
//! before any runtime (or helper tool) is started.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};

/// Variables stripped from the inherited environment.
pub const RUNTIME_ENV_MARKERS: [&str; 2] =
    ["ELECTRON_RUN_AS_NODE", "ATOM_SHELL_INTERNAL_RUN_AS_NODE"];

/// Complete environment of a child process. Names and values are kept as
/// raw OS strings so nothing from the host is lost.
pub type ChildEnvironment = HashMap<OsString, OsString>;

/// Build a child environment from `vars` minus the runtime markers, with
/// `overrides` applied last.
pub fn runtime_environment<I>(vars: I, overrides: &HashMap<String, String>) -> ChildEnvironment
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut env: ChildEnvironment = vars
        .into_iter()
        .filter(|(key, _)| !is_marker(key))
        .collect();
    env.extend(
        overrides
            .iter()
            .map(|(k, v)| (OsString::from(k), OsString::from(v))),
    );
    env
}

/// [`runtime_environment`] applied to the current process environment.
pub fn host_runtime_environment(overrides: &HashMap<String, String>) -> ChildEnvironment {
    runtime_environment(std::env::vars_os(), overrides)
}

fn is_marker(key: &OsStr) -> bool {
    RUNTIME_ENV_MARKERS.iter().any(|marker| key == *marker)
}
