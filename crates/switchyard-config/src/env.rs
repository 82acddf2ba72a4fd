use std::sync::LazyLock;

use regex::{Captures, Regex};

/// `{{ env.VAR }}` or `{{ env.VAR | default("fallback") }}`
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*([a-zA-Z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
});

/// Substitute environment placeholders in raw configuration text
///
/// Runs before TOML parsing so the config structs only ever see plain strings.
/// Comment lines are copied through untouched, which lets operators keep
/// commented-out examples referencing variables that are not set.
pub fn expand_env(input: &str) -> Result<String, String> {
    let mut lines = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_owned());
        } else {
            lines.push(expand_line(line)?);
        }
    }

    let mut output = lines.join("\n");
    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

fn expand_line(line: &str) -> Result<String, String> {
    let mut error = None;

    let expanded = PLACEHOLDER.replace_all(line, |caps: &Captures<'_>| {
        let key = &caps[1];
        let fallback = caps.get(2).map(|m| m.as_str());

        match resolve(key, fallback) {
            Ok(value) => value,
            Err(e) => {
                error.get_or_insert(e);
                String::new()
            }
        }
    });

    match error {
        Some(e) => Err(e),
        None => Ok(expanded.into_owned()),
    }
}

fn resolve(key: &str, fallback: Option<&str>) -> Result<String, String> {
    let Some(var) = key.strip_prefix("env.").filter(|v| !v.contains('.')) else {
        return Err(format!("only variables scoped with 'env.' are supported: `{key}`"));
    };

    match (std::env::var(var), fallback) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_owned()),
        (Err(_), None) => Err(format!("environment variable not found: `{var}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let input = "listen_address = \"0.0.0.0:8080\"\n";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn substitutes_every_placeholder_on_a_line() {
        let vars = [("SY_HOST", Some("valkey")), ("SY_PORT", Some("6379"))];
        temp_env::with_vars(vars, || {
            let out = expand_env("url = \"redis://{{ env.SY_HOST }}:{{ env.SY_PORT }}\"").unwrap();
            assert_eq!(out, "url = \"redis://valkey:6379\"");
        });
    }

    #[test]
    fn missing_variable_is_an_error() {
        temp_env::with_var_unset("SY_MISSING", || {
            let err = expand_env("api_key = \"{{ env.SY_MISSING }}\"").unwrap_err();
            assert!(err.contains("SY_MISSING"));
        });
    }

    #[test]
    fn default_applies_only_when_unset() {
        temp_env::with_var_unset("SY_OPTIONAL", || {
            let out = expand_env("key = \"{{ env.SY_OPTIONAL | default(\"none\") }}\"").unwrap();
            assert_eq!(out, "key = \"none\"");
        });
        temp_env::with_var("SY_OPTIONAL", Some("set"), || {
            let out = expand_env("key = \"{{ env.SY_OPTIONAL | default(\"none\") }}\"").unwrap();
            assert_eq!(out, "key = \"set\"");
        });
    }

    #[test]
    fn rejects_other_scopes() {
        let err = expand_env("key = \"{{ vault.TOKEN }}\"").unwrap_err();
        assert!(err.contains("only variables scoped with 'env.'"));
    }

    #[test]
    fn comments_are_not_expanded() {
        temp_env::with_var_unset("SY_COMMENTED", || {
            let input = "  # secret = \"{{ env.SY_COMMENTED }}\"\nport = 1";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }
}
