//! Dockerfile-style recipe parsing
//!
//! Only the instructions that map onto build steps are understood:
//! `FROM` (recorded as the base), `WORKDIR`, `COPY`/`ADD`, `ENV`, `RUN` and
//! `ENTRYPOINT`. `RUN` additionally accepts `--without=<groups>` and
//! `--frozen` flags which become the installer options of the step.

use super::{BuildPlan, BuildStep, PlanError, RunOptions};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

fn instruction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<keyword>[A-Za-z]+)(?:\s+(?P<args>.*))?$").expect("valid regex")
    })
}

fn flag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^--(?P<name>[a-z][a-z0-9-]*)(?:=(?P<value>\S*))?(?:\s+|$)").expect("valid regex")
    })
}

/// A logical recipe line after joining continuations
struct LogicalLine {
    number: usize,
    text: String,
}

/// Parser for Dockerfile-style recipes
#[derive(Debug, Clone)]
pub struct DockerfileParser {
    shell: String,
}

impl DockerfileParser {
    /// Create a parser that expands shell-form commands with `shell -c`
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn parse(&self, content: &str) -> Result<BuildPlan, PlanError> {
        let mut base = None;
        let mut steps = Vec::new();

        for line in logical_lines(content) {
            let caps = instruction_re()
                .captures(&line.text)
                .ok_or_else(|| error(line.number, format!("cannot parse '{}'", line.text)))?;
            let keyword = caps["keyword"].to_uppercase();
            let args = caps.name("args").map(|m| m.as_str().trim()).unwrap_or("");

            debug!(line = line.number, instruction = %keyword, "Parsing recipe instruction");

            match keyword.as_str() {
                "FROM" => {
                    if base.is_some() {
                        return Err(error(line.number, "multi-stage builds are not supported"));
                    }
                    if !steps.is_empty() {
                        return Err(error(
                            line.number,
                            "FROM must precede all other instructions",
                        ));
                    }
                    base = Some(parse_from(args, line.number)?);
                }
                "WORKDIR" => steps.push(parse_workdir(args, line.number)?),
                "COPY" => steps.extend(parse_copy(args, line.number, false)?),
                "ADD" => steps.extend(parse_copy(args, line.number, true)?),
                "ENV" => steps.extend(parse_env(args, line.number)?),
                "RUN" => steps.push(self.parse_run(args, line.number)?),
                "ENTRYPOINT" => {
                    if args.is_empty() {
                        return Err(error(line.number, "ENTRYPOINT requires a command"));
                    }
                    steps.push(BuildStep::Entrypoint(self.command_argv(args)));
                }
                other => {
                    return Err(error(
                        line.number,
                        format!("unsupported instruction '{}'", other),
                    ))
                }
            }
        }

        Ok(BuildPlan::with_base(base, steps))
    }

    fn parse_run(&self, args: &str, line: usize) -> Result<BuildStep, PlanError> {
        let (flags, rest) = take_flags(args);
        let mut options = RunOptions::default();

        for (name, value) in flags {
            match name.as_str() {
                "without" => {
                    let groups = value.ok_or_else(|| error(line, "--without requires a value"))?;
                    options.without.extend(
                        groups
                            .split(',')
                            .map(str::trim)
                            .filter(|g| !g.is_empty())
                            .map(str::to_string),
                    );
                }
                "frozen" => {
                    options.frozen = match value.as_deref() {
                        None | Some("true") => true,
                        Some("false") => false,
                        Some(other) => {
                            return Err(error(
                                line,
                                format!("--frozen expects true or false, got '{}'", other),
                            ))
                        }
                    };
                }
                other => warn!(line, flag = other, "Ignoring unsupported RUN flag"),
            }
        }

        if rest.is_empty() {
            return Err(error(line, "RUN requires a command"));
        }

        Ok(BuildStep::Run {
            argv: self.command_argv(rest),
            options,
        })
    }

    /// Exec form (`["a", "b"]`) is taken verbatim, anything else runs through the shell
    fn command_argv(&self, args: &str) -> Vec<String> {
        if let Some(argv) = parse_exec_form(args) {
            return argv;
        }
        vec![self.shell.clone(), "-c".to_string(), args.to_string()]
    }
}

fn error(line: usize, message: impl Into<String>) -> PlanError {
    PlanError::Dockerfile {
        line,
        message: message.into(),
    }
}

fn logical_lines(content: &str) -> Vec<LogicalLine> {
    let mut lines = Vec::new();
    let mut current: Option<LogicalLine> = None;

    for (idx, raw) in content.lines().enumerate() {
        let trimmed = raw.trim();
        if trimmed.starts_with('#') || (trimmed.is_empty() && current.is_none()) {
            continue;
        }

        let (body, continues) = match trimmed.strip_suffix('\\') {
            Some(body) => (body.trim_end(), true),
            None => (trimmed, false),
        };

        let entry = current.get_or_insert_with(|| LogicalLine {
            number: idx + 1,
            text: String::new(),
        });
        if !entry.text.is_empty() && !body.is_empty() {
            entry.text.push(' ');
        }
        entry.text.push_str(body);

        if !continues {
            if let Some(done) = current.take() {
                if !done.text.is_empty() {
                    lines.push(done);
                }
            }
        }
    }

    if let Some(done) = current.take() {
        if !done.text.is_empty() {
            lines.push(done);
        }
    }

    lines
}

fn take_flags(args: &str) -> (Vec<(String, Option<String>)>, &str) {
    let mut flags = Vec::new();
    let mut rest = args.trim_start();

    while let Some(caps) = flag_re().captures(rest) {
        let name = caps["name"].to_string();
        let value = caps.name("value").map(|m| m.as_str().to_string());
        flags.push((name, value));
        let consumed = caps.get(0).map(|m| m.end()).unwrap_or(rest.len());
        rest = &rest[consumed..];
    }

    (flags, rest.trim())
}

fn parse_exec_form(args: &str) -> Option<Vec<String>> {
    let trimmed = args.trim();
    if !trimmed.starts_with('[') {
        return None;
    }
    serde_json::from_str::<Vec<String>>(trimmed).ok()
}

/// Split on unquoted whitespace, honoring single/double quotes and backslash escapes
fn split_words(input: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some('\''), '\'') => quote = None,
            (Some('\''), _) => current.push(c),
            (_, '\\') => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| "trailing backslash".to_string())?;
                current.push(escaped);
                in_word = true;
            }
            (Some('"'), '"') => quote = None,
            (Some(_), _) => current.push(c),
            (None, '"') | (None, '\'') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, _) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(format!("unterminated {} quote", q));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

fn parse_from(args: &str, line: usize) -> Result<String, PlanError> {
    let words = split_words(args).map_err(|e| error(line, e))?;
    match words.as_slice() {
        [image] => Ok(image.clone()),
        [image, alias, _] if alias.eq_ignore_ascii_case("as") => Ok(image.clone()),
        _ => Err(error(line, "FROM expects an image reference")),
    }
}

fn parse_workdir(args: &str, line: usize) -> Result<BuildStep, PlanError> {
    let words = split_words(args).map_err(|e| error(line, e))?;
    match words.as_slice() {
        [path] => Ok(BuildStep::Workdir(path.clone())),
        _ => Err(error(line, "WORKDIR expects exactly one path")),
    }
}

fn parse_copy(args: &str, line: usize, is_add: bool) -> Result<Vec<BuildStep>, PlanError> {
    let keyword = if is_add { "ADD" } else { "COPY" };
    let (flags, rest) = take_flags(args);

    for (name, _) in flags {
        if name == "from" {
            return Err(error(line, "multi-stage builds are not supported"));
        }
        warn!(line, flag = %name, "Ignoring unsupported {} flag", keyword);
    }

    let words = match parse_exec_form(rest) {
        Some(words) => words,
        None => split_words(rest).map_err(|e| error(line, e))?,
    };

    if words.len() < 2 {
        return Err(error(
            line,
            format!("{} expects at least one source and a destination", keyword),
        ));
    }

    let (sources, destination) = words.split_at(words.len() - 1);
    let mut destination = destination[0].clone();
    if sources.len() > 1 && !destination.ends_with('/') {
        destination.push('/');
    }

    sources
        .iter()
        .map(|source| {
            if is_add && (source.starts_with("http://") || source.starts_with("https://")) {
                return Err(error(line, "ADD from a remote URL is not supported"));
            }
            Ok(BuildStep::Copy {
                source: source.clone(),
                destination: destination.clone(),
            })
        })
        .collect()
}

fn parse_env(args: &str, line: usize) -> Result<Vec<BuildStep>, PlanError> {
    let words = split_words(args).map_err(|e| error(line, e))?;
    let first = words
        .first()
        .ok_or_else(|| error(line, "ENV expects at least one variable"))?;

    if !first.contains('=') {
        // Legacy `ENV KEY value with spaces` form
        let value = words[1..].join(" ");
        return Ok(vec![BuildStep::Env {
            key: first.clone(),
            value,
        }]);
    }

    words
        .iter()
        .map(|word| {
            let (key, value) = word
                .split_once('=')
                .ok_or_else(|| error(line, format!("expected KEY=VALUE, got '{}'", word)))?;
            Ok(BuildStep::Env {
                key: key.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}
