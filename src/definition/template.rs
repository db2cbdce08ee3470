//! Pack/unpack command templates
//!
//! Templates are shell command strings with three placeholders:
//!
//! - `%stdin%`: the process's own stdin/stdout pipe (rendered as `-`)
//! - `%paths%`: the configured paths, shell-quoted and space-joined
//! - `%target%`: the restore destination (rendered as `-C <dir>`)
//!
//! Templates are checked when a definition is built: a required placeholder
//! that is missing, or any `%name%` token that is not one of the above, is a
//! configuration error.

use crate::config::ConfigError;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::OnceLock;

pub const DEFAULT_PACK_CMD: &str = "tar -czf %stdin% %paths%";
pub const DEFAULT_UNPACK_CMD: &str = "tar -xzf %stdin% %target%";

/// What `%stdin%` turns into: the conventional "use the pipe" file name
const PIPE_ARGUMENT: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Pack,
    Unpack,
}

impl TemplateKind {
    fn allowed(self) -> &'static [&'static str] {
        match self {
            TemplateKind::Pack => &["stdin", "paths"],
            TemplateKind::Unpack => &["stdin", "paths", "target"],
        }
    }

    fn required(self) -> &'static [&'static str] {
        match self {
            TemplateKind::Pack => &["stdin", "paths"],
            TemplateKind::Unpack => &["stdin"],
        }
    }

    fn field(self) -> &'static str {
        match self {
            TemplateKind::Pack => "tar_pack_cmd",
            TemplateKind::Unpack => "tar_unpack_cmd",
        }
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"%([a-z_]+)%").expect("placeholder pattern is valid"))
}

/// A validated pack or unpack command template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    raw: String,
    kind: TemplateKind,
}

impl CommandTemplate {
    pub fn pack(raw: &str) -> Result<Self, ConfigError> {
        Self::parse(raw, TemplateKind::Pack)
    }

    pub fn unpack(raw: &str) -> Result<Self, ConfigError> {
        Self::parse(raw, TemplateKind::Unpack)
    }

    fn parse(raw: &str, kind: TemplateKind) -> Result<Self, ConfigError> {
        let found: Vec<&str> = placeholder_pattern()
            .captures_iter(raw)
            .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
            .collect();

        if let Some(unknown) = found.iter().find(|name| !kind.allowed().contains(name)) {
            return Err(ConfigError::ValidationError(format!(
                "{}: unknown placeholder '%{}%' in \"{}\"",
                kind.field(),
                unknown,
                raw
            )));
        }

        if let Some(missing) = kind.required().iter().find(|name| !found.contains(name)) {
            return Err(ConfigError::ValidationError(format!(
                "{}: required placeholder '%{}%' missing in \"{}\"",
                kind.field(),
                missing,
                raw
            )));
        }

        Ok(Self {
            raw: raw.to_string(),
            kind,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    /// Render the pack command for `paths`
    pub fn render_pack(&self, paths: &[String]) -> String {
        self.render(paths, None)
    }

    /// Render the unpack command extracting into `target_root`
    pub fn render_unpack(&self, paths: &[String], target_root: &str) -> String {
        self.render(paths, Some(target_root))
    }

    fn render(&self, paths: &[String], target_root: Option<&str>) -> String {
        let joined_paths = paths
            .iter()
            .map(|p| shell_escape::escape(Cow::Borrowed(p.as_str())))
            .collect::<Vec<_>>()
            .join(" ");

        let target = target_root
            .map(|root| format!("-C {}", shell_escape::escape(Cow::Borrowed(root))))
            .unwrap_or_default();

        placeholder_pattern()
            .replace_all(&self.raw, |caps: &Captures<'_>| match &caps[1] {
                "stdin" => PIPE_ARGUMENT.to_string(),
                "paths" => joined_paths.clone(),
                "target" => target.clone(),
                _ => caps[0].to_string(),
            })
            .into_owned()
    }
}
