//! Plugin Driver (C1): invokes the external memory-forensics engine once per
//! plugin, captures its output, enforces a per-plugin timeout, and classifies
//! the outcome. See spec §4.1.

pub mod catalogue;

use crate::artifacts::model::Row;
use crate::parser::{parse_structured, parse_tabular, MAX_ROWS_PER_PLUGIN};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Per-invocation timeout (spec §4.1).
pub const PLUGIN_TIMEOUT: Duration = Duration::from_secs(300);

/// Error text is truncated to this many bytes before being persisted or
/// returned (spec §4.1, §7).
const ERROR_TRUNCATE_BYTES: usize = 1000;

const SYMBOL_ERROR_MARKERS: [&str; 3] = ["symbol", "pdb", "unable to validate"];

/// Result of running one plugin over one image.
#[derive(Debug, Clone, Default)]
pub struct PluginInvocation {
    pub plugin_name: String,
    pub rows: Vec<Row>,
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl PluginInvocation {
    pub fn is_symbol_error(&self) -> bool {
        self.error
            .as_deref()
            .map(|e| contains_symbol_marker(e))
            .unwrap_or(false)
    }
}

fn contains_symbol_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    SYMBOL_ERROR_MARKERS.iter().any(|m| lower.contains(m))
}

fn truncate_error(msg: &str) -> String {
    if msg.len() <= ERROR_TRUNCATE_BYTES {
        msg.to_string()
    } else {
        let mut end = ERROR_TRUNCATE_BYTES;
        while !msg.is_char_boundary(end) {
            end -= 1;
        }
        msg[..end].to_string()
    }
}

/// Abstraction over "run an external command and collect its output",
/// enforcing the timeout. Split out from `invoke` so tests can exercise the
/// parsing/classification logic against canned process output.
pub trait CommandRunner: Send + Sync {
    /// Runs `binary` with `args`, waiting at most `timeout`.
    /// Returns `(stdout, stderr, exit_success)`, or `None` on timeout.
    fn run(&self, binary: &str, args: &[String], timeout: Duration) -> Option<(String, String, bool)>;
}

/// Runs the configured external tool binary as a real subprocess.
pub struct SubprocessRunner;

impl CommandRunner for SubprocessRunner {
    fn run(&self, binary: &str, args: &[String], timeout: Duration) -> Option<(String, String, bool)> {
        let mut child = Command::new(binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .ok()?;

        match child.wait_timeout(timeout).ok()? {
            Some(status) => {
                let output = child.wait_with_output().ok()?;
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                Some((stdout, stderr, status.success()))
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                None
            }
        }
    }
}

/// Invoke one plugin of the external memory-forensics engine against
/// `image_path`, following the two-renderer fallback policy in spec §4.1.
pub fn invoke(
    runner: &dyn CommandRunner,
    binary: &str,
    plugin_name: &str,
    image_path: &Path,
    extra_args: &[String],
) -> PluginInvocation {
    let dump = image_path.to_string_lossy().into_owned();

    // Run #1: request structured output.
    let mut json_args = vec!["-f".to_string(), dump.clone(), plugin_name.to_string()];
    json_args.extend(extra_args.iter().cloned());
    json_args.push("-r".to_string());
    json_args.push("json".to_string());

    let first = runner.run(binary, &json_args, PLUGIN_TIMEOUT);
    let (stdout, stderr, ok) = match first {
        Some(v) => v,
        None => {
            return PluginInvocation {
                plugin_name: plugin_name.to_string(),
                rows: Vec::new(),
                warnings: Vec::new(),
                error: Some("timeout".to_string()),
            }
        }
    };

    if ok && !stdout.trim().is_empty() {
        if let Some(rows) = parse_structured(&stdout) {
            return finish(plugin_name, rows, Vec::new(), None);
        }
    }

    // Run #2: tabular fallback, without the structured-output flag.
    let mut text_args = vec!["-f".to_string(), dump, plugin_name.to_string()];
    text_args.extend(extra_args.iter().cloned());

    let second = runner.run(binary, &text_args, PLUGIN_TIMEOUT);
    let (stdout2, stderr2, ok2) = match second {
        Some(v) => v,
        None => {
            return PluginInvocation {
                plugin_name: plugin_name.to_string(),
                rows: Vec::new(),
                warnings: Vec::new(),
                error: Some("timeout".to_string()),
            }
        }
    };

    if !ok2 {
        let error_msg = if !stderr2.trim().is_empty() {
            stderr2.trim().to_string()
        } else if !stdout2.trim().is_empty() {
            stdout2.trim().to_string()
        } else {
            format!("{} produced no output and a non-zero exit status", plugin_name)
        };
        let truncated = truncate_error(&error_msg);
        let mut warnings = Vec::new();
        if contains_symbol_marker(&truncated) || contains_symbol_marker(&stderr) {
            warnings.push("kernel symbols missing — analysis limited".to_string());
        }
        return PluginInvocation {
            plugin_name: plugin_name.to_string(),
            rows: Vec::new(),
            warnings,
            error: Some(truncated),
        };
    }

    let rows = parse_tabular(&stdout2);
    let mut warnings = Vec::new();
    if stderr2.to_lowercase().contains("warning") {
        warnings.push("warnings were emitted during plugin execution".to_string());
    }
    finish(plugin_name, rows, warnings, None)
}

fn finish(
    plugin_name: &str,
    mut rows: Vec<Row>,
    mut warnings: Vec<String>,
    error: Option<String>,
) -> PluginInvocation {
    if rows.len() > MAX_ROWS_PER_PLUGIN {
        rows.truncate(MAX_ROWS_PER_PLUGIN);
        warnings.push(format!(
            "plugin returned more than {} rows; truncated",
            MAX_ROWS_PER_PLUGIN
        ));
    }
    PluginInvocation {
        plugin_name: plugin_name.to_string(),
        rows,
        warnings,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct ScriptedRunner {
        responses: RefCell<Vec<Option<(String, String, bool)>>>,
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, _binary: &str, _args: &[String], _timeout: Duration) -> Option<(String, String, bool)> {
            self.responses.borrow_mut().remove(0)
        }
    }

    fn scripted(responses: Vec<Option<(String, String, bool)>>) -> ScriptedRunner {
        ScriptedRunner {
            responses: RefCell::new(responses),
        }
    }

    #[test]
    fn structured_success_short_circuits_fallback() {
        let runner = scripted(vec![Some((
            r#"{"rows":[{"PID":"4"}]}"#.to_string(),
            String::new(),
            true,
        ))]);
        let result = invoke(&runner, "vol", "windows.pslist.PsList", Path::new("img.raw"), &[]);
        assert!(result.error.is_none());
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn falls_back_to_tabular_when_json_unparsable() {
        let runner = scripted(vec![
            Some(("not json".to_string(), String::new(), true)),
            Some(("PID\tName\n4\tSystem\n".to_string(), String::new(), true)),
        ]);
        let result = invoke(&runner, "vol", "windows.pslist.PsList", Path::new("img.raw"), &[]);
        assert!(result.error.is_none());
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn timeout_on_first_attempt_is_reported() {
        let runner = scripted(vec![None]);
        let result = invoke(&runner, "vol", "windows.pslist.PsList", Path::new("img.raw"), &[]);
        assert_eq!(result.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn symbol_error_sets_warning() {
        let runner = scripted(vec![
            Some(("".to_string(), "".to_string(), false)),
            Some(("".to_string(), "Unable to validate the PDB signature".to_string(), false)),
        ]);
        let result = invoke(&runner, "vol", "windows.info.Info", Path::new("img.raw"), &[]);
        assert!(result.is_symbol_error());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("kernel symbols missing")));
    }

    #[test]
    fn error_text_is_truncated() {
        let long_err = "x".repeat(2000);
        let runner = scripted(vec![
            Some(("".to_string(), "".to_string(), false)),
            Some(("".to_string(), long_err, false)),
        ]);
        let result = invoke(&runner, "vol", "windows.pslist.PsList", Path::new("img.raw"), &[]);
        assert_eq!(result.error.unwrap().len(), ERROR_TRUNCATE_BYTES);
    }

    #[test]
    fn row_limit_is_enforced() {
        let mut stdout = String::from("PID\tName\n");
        for i in 0..20_000 {
            stdout.push_str(&format!("{}\tproc{}.exe\n", i, i));
        }
        let runner = scripted(vec![
            Some(("not json".to_string(), String::new(), true)),
            Some((stdout, String::new(), true)),
        ]);
        let result = invoke(&runner, "vol", "windows.pslist.PsList", Path::new("img.raw"), &[]);
        assert_eq!(result.rows.len(), MAX_ROWS_PER_PLUGIN);
        assert!(result.warnings.iter().any(|w| w.contains("truncated")));
    }
}
