/// Sandbox Protocol - How a Submission Reaches the Interpreter
///
/// **Core Responsibility:**
/// Define the fixed bootstrap ("runner") every backend hands to the Python
/// interpreter, the environment it reads, and the envelope it answers with.
///
/// **Runner Rules:**
/// - Submission arrives base64-encoded in `SANDBOX_SOURCE`
/// - `__builtins__` holds only the allowlisted names
/// - `import` resolves only allowlisted modules; `random` is a private,
///   separately seeded `random.Random` instance
/// - stdout is redirected into a bounded in-memory buffer
/// - Any exception is caught and reported as `{name, message}`
/// - Exactly one JSON envelope is written to the real stdout
///
/// Backends only move bytes. Nothing here knows about rubrics or verdicts.

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use pythonic_common::config::SandboxPolicy;
use serde::{Deserialize, Serialize};

pub const SOURCE_VAR: &str = "SANDBOX_SOURCE";
pub const BUILTINS_VAR: &str = "SANDBOX_BUILTINS";
pub const MODULES_VAR: &str = "SANDBOX_MODULES";
pub const SEED_VAR: &str = "SANDBOX_SEED";
pub const OUTPUT_LIMIT_VAR: &str = "SANDBOX_OUTPUT_LIMIT";

/// Filename the interpreter reports in tracebacks and syntax errors
pub const SUBMISSION_FILENAME: &str = "<submission>";

pub const RUNNER_SCRIPT: &str = r#"
import ast, base64, builtins, contextlib, io, json, os, random, string, sys, types

_real_stdout = sys.stdout
_source = base64.b64decode(os.environ["SANDBOX_SOURCE"]).decode("utf-8")
_allowed_builtins = [n for n in os.environ.get("SANDBOX_BUILTINS", "").split(",") if n]
_allowed_modules = [n for n in os.environ.get("SANDBOX_MODULES", "").split(",") if n]
_seed = os.environ.get("SANDBOX_SEED")
_limit = int(os.environ.get("SANDBOX_OUTPUT_LIMIT", "65536"))

_SAFE_DUNDERS = frozenset((
    "__init__", "__str__", "__repr__", "__name__", "__doc__", "__len__", "__bool__",
    "__eq__", "__ne__", "__lt__", "__le__", "__gt__", "__ge__", "__hash__",
    "__add__", "__sub__", "__mul__", "__iter__", "__next__", "__contains__",
    "__getitem__", "__setitem__", "__enter__", "__exit__", "__call__",
))
_FRAME_ATTRS = frozenset((
    "gi_frame", "gi_code", "gi_yieldfrom", "cr_frame", "cr_code", "cr_await",
    "ag_frame", "ag_code", "ag_await", "f_globals", "f_locals", "f_builtins",
    "f_back", "f_code", "tb_frame", "tb_next",
))
_SAFE_NAMES = frozenset(("__name__",))


class OutputLimitExceeded(Exception):
    pass


class SecurityError(Exception):
    pass


class _BoundedBuffer(io.StringIO):
    def write(self, text):
        if self.tell() + len(text) > _limit:
            raise OutputLimitExceeded("output exceeded %d characters" % _limit)
        return io.StringIO.write(self, text)


def _blocked_attr(name):
    if name in _FRAME_ATTRS:
        return True
    return name.startswith("_") and name not in _SAFE_DUNDERS


def _reject(node, what):
    raise SecurityError("line %d: %s is not allowed" % (getattr(node, "lineno", 0), what))


def _check_tree(tree):
    for node in ast.walk(tree):
        if isinstance(node, ast.Attribute) and _blocked_attr(node.attr):
            _reject(node, "access to '%s'" % node.attr)
        elif isinstance(node, ast.Name) and node.id.startswith("__") and node.id not in _SAFE_NAMES:
            _reject(node, "use of '%s'" % node.id)
        elif isinstance(node, ast.alias):
            for name in (node.name, node.asname or ""):
                if name.startswith("_"):
                    _reject(node, "import of '%s'" % name)
        elif type(node).__name__ == "MatchClass":
            for name in node.kwd_attrs:
                if _blocked_attr(name):
                    _reject(node, "access to '%s'" % name)


def _sandbox_random():
    rng = random.Random(int(_seed)) if _seed else random.Random()
    module = types.ModuleType("random")
    for name in ("random", "randint", "randrange", "choice", "choices", "shuffle",
                 "sample", "uniform", "gauss", "getrandbits", "seed"):
        setattr(module, name, getattr(rng, name))
    return module


def _sandbox_string():
    module = types.ModuleType("string")
    for name in ("ascii_letters", "ascii_lowercase", "ascii_uppercase", "digits",
                 "hexdigits", "octdigits", "punctuation", "printable", "whitespace",
                 "capwords"):
        setattr(module, name, getattr(string, name))
    return module


_random = _sandbox_random()
_modules = {}
for _name in _allowed_modules:
    if _name == "random":
        _modules[_name] = _random
        continue
    if _name == "string":
        _modules[_name] = _sandbox_string()
        continue
    try:
        _modules[_name] = __import__(_name)
    except ImportError:
        pass


def _guarded_import(name, globals=None, locals=None, fromlist=(), level=0):
    if level == 0 and name in _modules:
        return _modules[name]
    raise ImportError("import of '%s' is not allowed" % name)


_builtins = dict((n, getattr(builtins, n)) for n in _allowed_builtins if hasattr(builtins, n))
_builtins["__import__"] = _guarded_import
_namespace = {"__builtins__": _builtins, "__name__": "__main__", "random": _random}

_buffer = _BoundedBuffer()
_error = None
try:
    _tree = ast.parse(_source, "<submission>", "exec")
    _check_tree(_tree)
    with contextlib.redirect_stdout(_buffer):
        exec(compile(_tree, "<submission>", "exec"), _namespace)
except BaseException as e:
    _error = {"name": type(e).__name__[:200], "message": str(e)[:2000]}

_envelope = json.dumps({"ok": _error is None, "output": _buffer.getvalue(), "error": _error},
                       ensure_ascii=False)
_real_stdout.buffer.write(_envelope.encode("utf-8", "replace"))
_real_stdout.buffer.write(b"\n")
_real_stdout.flush()
"#;

/// Interpreter flags: isolated mode, no bytecode files, no site packages
pub fn interpreter_args() -> Vec<String> {
    vec![
        "-I".to_string(),
        "-B".to_string(),
        "-S".to_string(),
        "-c".to_string(),
        RUNNER_SCRIPT.to_string(),
    ]
}

/// Environment the runner reads; nothing else from the host is passed through
pub fn runner_env(source: &str, policy: &SandboxPolicy) -> Vec<(String, String)> {
    let mut env = vec![
        (
            SOURCE_VAR.to_string(),
            general_purpose::STANDARD.encode(source),
        ),
        (BUILTINS_VAR.to_string(), policy.allowed_builtins.join(",")),
        (MODULES_VAR.to_string(), policy.allowed_modules.join(",")),
        (
            OUTPUT_LIMIT_VAR.to_string(),
            policy.max_output_bytes.to_string(),
        ),
    ];
    if let Some(seed) = policy.seed {
        env.push((SEED_VAR.to_string(), seed.to_string()));
    }
    env
}

/// Worst-case UTF-8 bytes for one captured character inside the envelope (`\u001f`)
pub const ENVELOPE_BYTES_PER_CHAR: usize = 6;

/// Room for the envelope keys and the truncated error name and message
const ENVELOPE_OVERHEAD: usize = 16 * 1024;

/// Upper bound on runner stdout for a run whose output stays within the limit
pub fn stdout_capacity(policy: &SandboxPolicy) -> usize {
    policy
        .max_output_bytes
        .saturating_mul(ENVELOPE_BYTES_PER_CHAR)
        .saturating_add(ENVELOPE_OVERHEAD)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub name: String,
    pub message: String,
}

/// What the runner reports about one execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,
    pub output: String,
    pub error: Option<EnvelopeError>,
}

/// Parse the envelope from raw runner stdout (the last non-empty line)
pub fn parse_envelope(stdout: &str) -> Result<Envelope> {
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .context("Runner produced no envelope")?;
    serde_json::from_str(line).context("Runner envelope is not valid JSON")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_env_encodes_source() {
        let policy = SandboxPolicy::default();
        let env = runner_env("print('hi')", &policy);

        let source = env.iter().find(|(k, _)| k == SOURCE_VAR).unwrap();
        let decoded = general_purpose::STANDARD.decode(&source.1).unwrap();
        assert_eq!(decoded, b"print('hi')");

        let builtins = env.iter().find(|(k, _)| k == BUILTINS_VAR).unwrap();
        assert!(builtins.1.split(',').any(|b| b == "print"));
        assert!(!builtins.1.split(',').any(|b| b == "eval"));
        assert!(!env.iter().any(|(k, _)| k == SEED_VAR));
    }

    #[test]
    fn test_runner_env_passes_seed() {
        let policy = SandboxPolicy {
            seed: Some(42),
            ..Default::default()
        };
        let env = runner_env("", &policy);
        assert!(env.contains(&(SEED_VAR.to_string(), "42".to_string())));
    }

    #[test]
    fn test_interpreter_args_run_the_runner() {
        let args = interpreter_args();
        assert_eq!(&args[..4], &["-I", "-B", "-S", "-c"]);
        assert!(args[4].contains(SOURCE_VAR));
        assert!(args[4].contains(SUBMISSION_FILENAME));
    }

    #[test]
    fn test_stdout_capacity_fits_escaped_output() {
        let policy = SandboxPolicy {
            max_output_bytes: 1000,
            ..Default::default()
        };
        // astral characters are 4 UTF-8 bytes, escaped control characters 6
        assert!(stdout_capacity(&policy) >= 1000 * 6 + 2000 * 6);
        assert!(RUNNER_SCRIPT.contains("ensure_ascii=False"));
    }

    #[test]
    fn test_runner_checks_source_before_exec() {
        let check = RUNNER_SCRIPT.find("_check_tree(_tree)").unwrap();
        let exec = RUNNER_SCRIPT.find("exec(compile(_tree").unwrap();
        assert!(check < exec);
    }

    #[test]
    fn test_parse_envelope_success() {
        let envelope = parse_envelope("{\"ok\": true, \"output\": \"Hello\\n\", \"error\": null}\n").unwrap();
        assert!(envelope.ok);
        assert_eq!(envelope.output, "Hello\n");
        assert!(envelope.error.is_none());
    }

    #[test]
    fn test_parse_envelope_error() {
        let envelope = parse_envelope(
            r#"{"ok": false, "output": "", "error": {"name": "ZeroDivisionError", "message": "division by zero"}}"#,
        )
        .unwrap();
        assert!(!envelope.ok);
        let error = envelope.error.unwrap();
        assert_eq!(error.name, "ZeroDivisionError");
        assert_eq!(error.message, "division by zero");
    }

    #[test]
    fn test_parse_envelope_rejects_garbage() {
        assert!(parse_envelope("").is_err());
        assert!(parse_envelope("Segmentation fault").is_err());
    }
}
