use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of the policy rule a violation was raised under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    DeniedImport,
    DeniedCall,
    DeniedAttribute,
    DeniedName,
    SyntaxError,
    EmptyCode,
}

impl RuleId {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleId::DeniedImport => "denied_import",
            RuleId::DeniedCall => "denied_call",
            RuleId::DeniedAttribute => "denied_attribute",
            RuleId::DeniedName => "denied_name",
            RuleId::SyntaxError => "syntax_error",
            RuleId::EmptyCode => "empty_code",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Modules whose import hands the code process control, filesystem, network
/// or interpreter-internals access. Matched on the first dotted segment, so
/// `os.path` is caught through `os`.
const DENIED_MODULES: &[&str] = &[
    // process control
    "subprocess",
    "os",
    "signal",
    "multiprocessing",
    "threading",
    "pty",
    "resource",
    // filesystem
    "shutil",
    "pathlib",
    "tempfile",
    "glob",
    "fcntl",
    // network sockets
    "socket",
    "socketserver",
    "ssl",
    "http",
    "urllib",
    "ftplib",
    "smtplib",
    "telnetlib",
    "asyncio",
    // dynamic code loading
    "importlib",
    "runpy",
    "pickle",
    "marshal",
    "shelve",
    "code",
    "codeop",
    "py_compile",
    "compileall",
    // interpreter internals / reflection
    "sys",
    "builtins",
    "inspect",
    "gc",
    "ctypes",
    "types",
];

/// Builtins that evaluate strings as code, look attributes up dynamically or
/// reach the host environment directly.
const DENIED_CALLS: &[&str] = &[
    "eval",
    "exec",
    "compile",
    "__import__",
    "getattr",
    "setattr",
    "delattr",
    "globals",
    "locals",
    "vars",
    "open",
    "breakpoint",
    "exit",
    "quit",
];

/// Attribute names that can reach privileged objects by walking live object
/// internals, e.g. `().__class__.__bases__[0].__subclasses__()` or frame
/// traversal through `__traceback__`.
const DENIED_ATTRIBUTES: &[&str] = &[
    "__class__",
    "__bases__",
    "__mro__",
    "__subclasses__",
    "__globals__",
    "__closure__",
    "__code__",
    "__func__",
    "__self__",
    "__dict__",
    "__getattribute__",
    "__getattr__",
    "__setattr__",
    "__delattr__",
    "__init_subclass__",
    "__reduce__",
    "__reduce_ex__",
    "__builtins__",
    "__import__",
    "__loader__",
    "__spec__",
    "__traceback__",
    "tb_frame",
    "f_globals",
    "f_builtins",
    "f_locals",
    "gi_frame",
    "cr_frame",
];

/// Bare names that expose privileged machinery without any call or import.
const DENIED_NAMES: &[&str] = &["__builtins__", "__import__", "__loader__", "__spec__"];

pub fn module_denied(name: &str) -> bool {
    let root = name.split('.').next().unwrap_or(name);
    DENIED_MODULES.contains(&root)
}

pub fn call_denied(name: &str) -> bool {
    DENIED_CALLS.contains(&name)
}

pub fn attribute_denied(name: &str) -> bool {
    DENIED_ATTRIBUTES.contains(&name)
}

pub fn name_denied(name: &str) -> bool {
    DENIED_NAMES.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_denied_matches_dotted_root() {
        assert!(module_denied("os"));
        assert!(module_denied("os.path"));
        assert!(module_denied("urllib.request"));
        assert!(!module_denied("math"));
        assert!(!module_denied("json"));
    }

    #[test]
    fn test_attribute_denylist() {
        assert!(attribute_denied("__subclasses__"));
        assert!(attribute_denied("tb_frame"));
        assert!(!attribute_denied("append"));
    }
}
