//! Environment variable expansion for configuration strings.
//!
//! Only the braced forms are recognised:
//! - `${VAR}` - value of VAR, error if unset
//! - `${VAR:-default}` - value of VAR, or `default` when unset
//!
//! Text outside `${...}`, including bare `$VAR`, is copied unchanged.

use std::convert::Infallible;

use crate::ConfigError;

/// Expand `${...}` references in `value` using the process environment.
///
/// `field` is the dotted config path reported in errors.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    expand_with(value, field, |var| std::env::var(var).ok())
}

/// Expand `${...}` references using an arbitrary variable lookup.
///
/// Each reference is expanded on its own, so `shellexpand` never sees the
/// surrounding text.
fn expand_with<F>(value: &str, field: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        // Unclosed reference: the remainder is literal.
        let Some(len) = rest[start..].find('}').map(|end| end + 1) else {
            break;
        };
        let reference = &rest[start..start + len];
        let name = &reference[2..len - 1];

        if !name.contains(":-") && lookup(name).is_none() {
            return Err(ConfigError::EnvVar {
                field: field.to_owned(),
                message: format!("{reference} not set"),
            });
        }

        let expanded = shellexpand::env_with_context(reference, |var: &str| {
            Ok::<_, Infallible>(lookup(var))
        })
        .map_err(|e| -> ConfigError { match e.cause {} })?;

        out.push_str(&rest[..start]);
        out.push_str(&expanded);
        rest = &rest[start + len..];
    }

    out.push_str(rest);
    Ok(out)
}
