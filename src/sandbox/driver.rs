//! Python-side driver that runs the submitted code inside the unit.

/// Executed as `python3 -I -X utf8 -c DRIVER <code> <result-path>`.
///
/// Compiles the submitted source under the filename `<code>`, runs it in a
/// fresh namespace, and when the final statement is an expression writes its
/// value to the result file as JSON (repr fallback for values JSON cannot
/// encode). Errors raised by the submitted code propagate as a normal
/// traceback and nonzero exit; because the compile filename is `<code>`,
/// tracebacks never carry host paths.
pub const PYTHON_DRIVER: &str = r#"
import ast
import json
import sys

src = sys.argv[1]
out_path = sys.argv[2]

tree = ast.parse(src, "<code>", "exec")
tail = None
if tree.body and isinstance(tree.body[-1], ast.Expr):
    tail = ast.Expression(tree.body.pop().value)

scope = {"__name__": "__main__"}
exec(compile(tree, "<code>", "exec"), scope)

if tail is not None:
    value = eval(compile(tail, "<code>", "eval"), scope)
    if value is not None:
        try:
            payload = json.dumps(value)
        except (TypeError, ValueError):
            payload = json.dumps(repr(value))
        with open(out_path, "w") as handle:
            handle.write(payload)
"#;

/// Decode the driver's result file into a JSON value.
pub fn decode_return_value(raw: &str) -> Option<serde_json::Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}
