use super::{AppConfig, ConfigError, DepartmentConfig};

fn validate_url(context: &str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "{context}: chat_url must start with http:// or https:// (got '{url}')"
        )))
    }
}

fn validate_department(name: &str, department: &DepartmentConfig) -> Result<(), ConfigError> {
    validate_url(&format!("departments.{name}"), &department.chat_url)?;
    if department.api_key.is_empty() {
        // Not fatal at startup: the handler reports a missing credential as a
        // 500 at request entry, before any backend call.
        tracing::warn!("departments.{name}.api_key is empty");
    }
    Ok(())
}

/// Semantic validation beyond what serde enforces structurally.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] with an actionable message on the
/// first violated constraint.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.timeout == 0 {
        return Err(ConfigError::Validation(
            "server.timeout must be greater than zero".to_string(),
        ));
    }
    if config.cors.allowed_origin.is_empty() {
        return Err(ConfigError::Validation(
            "cors.allowed_origin must not be empty (use '*' to allow any origin)".to_string(),
        ));
    }

    validate_url("upstream", &config.upstream.chat_url)?;
    if config.upstream.model.is_empty() {
        return Err(ConfigError::Validation(
            "upstream.model must not be empty".to_string(),
        ));
    }

    validate_department("sports", &config.departments.sports)?;
    validate_department("electronics", &config.departments.electronics)?;
    validate_department("travel", &config.departments.travel)?;

    Ok(())
}
