//! Invocation matchers used by the executor mocks.

use std::fmt;
use std::path::Path;

use regex::Regex;

use crate::core::types::ExecRequest;

/// Matches a single string: exactly, or by regular expression.
#[derive(Debug, Clone)]
pub enum Pattern {
    Exact(String),
    Regex(Regex),
}

impl Pattern {
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Pattern::Exact(expected) => expected == value,
            Pattern::Regex(re) => re.is_match(value),
        }
    }
}

impl From<&str> for Pattern {
    fn from(value: &str) -> Self {
        Pattern::Exact(value.to_string())
    }
}

impl From<String> for Pattern {
    fn from(value: String) -> Self {
        Pattern::Exact(value)
    }
}

impl From<Regex> for Pattern {
    fn from(value: Regex) -> Self {
        Pattern::Regex(value)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Exact(value) => f.write_str(value),
            Pattern::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// Constraint on the argument list.
#[derive(Debug, Clone)]
pub enum ArgsPattern {
    /// Same length, each argument matching its pattern.
    Exact(Vec<Pattern>),
    /// The leading arguments match; anything may follow.
    Prefix(Vec<Pattern>),
}

impl ArgsPattern {
    pub fn matches(&self, args: &[String]) -> bool {
        match self {
            ArgsPattern::Exact(patterns) => {
                patterns.len() == args.len() && all_match(patterns, args)
            }
            ArgsPattern::Prefix(patterns) => {
                patterns.len() <= args.len() && all_match(patterns, args)
            }
        }
    }
}

fn all_match(patterns: &[Pattern], args: &[String]) -> bool {
    patterns
        .iter()
        .zip(args)
        .all(|(pattern, arg)| pattern.matches(arg))
}

/// Describes the invocations an expectation accepts.
///
/// Only the command is required; unset argument and working-directory
/// constraints match anything.
#[derive(Debug, Clone)]
pub struct InvocationMatcher {
    pub command: Pattern,
    pub args: Option<ArgsPattern>,
    pub workdir: Option<Pattern>,
}

impl InvocationMatcher {
    pub fn command(command: impl Into<Pattern>) -> Self {
        Self {
            command: command.into(),
            args: None,
            workdir: None,
        }
    }

    pub fn command_regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::command(Pattern::regex(pattern)?))
    }

    /// Require exactly these arguments.
    pub fn args<I, P>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Pattern>,
    {
        self.args = Some(ArgsPattern::Exact(args.into_iter().map(Into::into).collect()));
        self
    }

    /// Require the arguments to start with these.
    pub fn args_prefix<I, P>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Pattern>,
    {
        self.args = Some(ArgsPattern::Prefix(args.into_iter().map(Into::into).collect()));
        self
    }

    /// Require this exact working directory.
    pub fn workdir(self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref().to_string_lossy().into_owned();
        self.workdir_pattern(dir)
    }

    /// Require the working directory, rendered as a string, to match `pattern`.
    pub fn workdir_pattern(mut self, pattern: impl Into<Pattern>) -> Self {
        self.workdir = Some(pattern.into());
        self
    }

    pub fn matches(&self, request: &ExecRequest) -> bool {
        self.command.matches(&request.command)
            && self
                .args
                .as_ref()
                .is_none_or(|args| args.matches(&request.args))
            && self
                .workdir
                .as_ref()
                .is_none_or(|dir| dir.matches(&request.workdir.to_string_lossy()))
    }
}

impl fmt::Display for InvocationMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}", self.command)?;
        match &self.args {
            Some(ArgsPattern::Exact(args)) => {
                for arg in args {
                    write!(f, " {arg}")?;
                }
            }
            Some(ArgsPattern::Prefix(args)) => {
                for arg in args {
                    write!(f, " {arg}")?;
                }
                f.write_str(" ...")?;
            }
            None => {}
        }
        f.write_str("`")?;
        if let Some(dir) = &self.workdir {
            write!(f, " (in {dir})")?;
        }
        Ok(())
    }
}
