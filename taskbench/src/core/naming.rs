//! Default task-name derivation.

/// Name used when a kind's simple name is empty.
pub const FALLBACK_TASK_NAME: &str = "task";

/// Lower-case the first character of `simple_name`, leaving the rest untouched.
///
/// `HelmPackage` becomes `helmPackage`; an empty name falls back to
/// [`FALLBACK_TASK_NAME`].
pub fn decapitalize(simple_name: &str) -> String {
    let mut chars = simple_name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => FALLBACK_TASK_NAME.to_string(),
    }
}

/// True if `name` is usable as a task name: non-empty, no whitespace, no `:`.
pub fn is_valid_task_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(|c| c.is_whitespace() || c == ':')
}
