//! Environment variable substitution for configuration documents.

use regex::Regex;
use std::env;
use tracing::debug;

/// Substitute `${VAR_NAME}` placeholders with environment variable values.
///
/// Unset variables leave the placeholder in place so the validator can
/// report them as unresolved instead of silently injecting empty strings.
pub fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{(\w+)\}").expect("static pattern");
    let mut result = content.to_string();

    for caps in re.captures_iter(content) {
        let placeholder = caps.get(0).expect("whole match").as_str();
        let var_name = caps.get(1).expect("var name group").as_str();

        if let Ok(value) = env::var(var_name) {
            debug!(var = var_name, "substituting environment variable");
            result = result.replace(placeholder, &value);
        }
    }

    result
}

/// Whether a string still contains `${...}` placeholders after substitution.
pub fn has_unresolved_env_vars(content: &str) -> bool {
    let re = Regex::new(r"\$\{(\w+)\}").expect("static pattern");
    re.is_match(content)
}
