//! A single external program invocation, built flag by flag.

use std::fmt;
use std::path::Path;

use serde::Serialize;

/// Flags whose following value must never be printed or logged.
const SECRET_FLAGS: &[&str] = &["--api_key"];

const REDACTED: &str = "***";

/// An external command with its arguments and extra environment.
///
/// Environment values are always treated as secrets: only the variable
/// names appear in [`fmt::Display`] output and in [`InvocationView`].
#[derive(Clone, PartialEq)]
pub struct Invocation {
    /// Short step name used in logs and the run report.
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(label: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    /// Appends a positional argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends a path as a positional argument.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    /// Appends `name value`.
    pub fn flag(mut self, name: &str, value: impl Into<String>) -> Self {
        self.args.push(name.to_string());
        self.args.push(value.into());
        self
    }

    /// Appends `name path`.
    pub fn path_flag(self, name: &str, path: &Path) -> Self {
        self.flag(name, path.display().to_string())
    }

    /// Appends a bare switch such as `--hierarchical`.
    pub fn switch(mut self, name: &str) -> Self {
        self.args.push(name.to_string());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Value following the first occurrence of `flag`, if any.
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }

    pub fn has_switch(&self, name: &str) -> bool {
        self.args.iter().any(|a| a == name)
    }

    /// Program and arguments with secret values replaced.
    pub fn redacted_argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.clone());
        let mut hide_next = false;
        for arg in &self.args {
            if hide_next {
                argv.push(REDACTED.to_string());
                hide_next = false;
                continue;
            }
            hide_next = SECRET_FLAGS.contains(&arg.as_str());
            argv.push(arg.clone());
        }
        argv
    }

    /// Serializable, secret-free view for dry runs and reports.
    pub fn view(&self) -> InvocationView {
        InvocationView {
            label: self.label.clone(),
            argv: self.redacted_argv(),
            env: self.envs.iter().map(|(k, _)| k.clone()).collect(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, _) in &self.envs {
            write!(f, "{key}={REDACTED} ")?;
        }
        let argv = self.redacted_argv();
        let rendered: Vec<String> = argv.iter().map(|a| quote(a)).collect();
        f.write_str(&rendered.join(" "))
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("label", &self.label)
            .field("argv", &self.redacted_argv())
            .field("env", &self.view().env)
            .finish()
    }
}

/// What [`Invocation::view`] returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationView {
    pub label: String,
    pub argv: Vec<String>,
    /// Names of the variables exported to the child.
    pub env: Vec<String>,
}

/// Quotes an argument for display when it would not survive a shell as-is.
fn quote(arg: &str) -> String {
    if arg.is_empty() {
        return "\"\"".to_string();
    }
    if arg.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        format!("{:?}", arg)
    } else {
        arg.to_string()
    }
}
