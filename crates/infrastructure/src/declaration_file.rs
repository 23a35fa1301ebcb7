//! Loading of declarative RBAC configuration files.

use std::path::Path;

use rolegate_core::{AppError, AppResult};
use rolegate_domain::RbacDocument;

/// Serialization format of a declaration file, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationFormat {
    /// `.yaml` or `.yml`.
    Yaml,
    /// `.json`.
    Json,
}

impl DeclarationFormat {
    /// Detects the format from a file path.
    pub fn from_path(path: &Path) -> AppResult<Self> {
        let extension = path
            .extension()
            .and_then(|value| value.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("yaml" | "yml") => Ok(Self::Yaml),
            Some("json") => Ok(Self::Json),
            _ => Err(AppError::Validation(format!(
                "declaration file '{}' must end in .yaml, .yml or .json",
                path.display()
            ))),
        }
    }
}

/// Parses declaration contents. Unknown keys and malformed entries reject the whole document.
pub fn parse_declaration(contents: &str, format: DeclarationFormat) -> AppResult<RbacDocument> {
    match format {
        DeclarationFormat::Yaml => serde_yaml::from_str(contents).map_err(|error| {
            AppError::Validation(format!("invalid yaml declaration: {error}"))
        }),
        DeclarationFormat::Json => serde_json::from_str(contents).map_err(|error| {
            AppError::Validation(format!("invalid json declaration: {error}"))
        }),
    }
}

/// Reads and parses a declaration file.
pub async fn load_declaration_file(path: impl AsRef<Path>) -> AppResult<RbacDocument> {
    let path = path.as_ref();
    let format = DeclarationFormat::from_path(path)?;
    let contents = tokio::fs::read_to_string(path).await.map_err(|error| {
        AppError::Internal(format!(
            "failed to read declaration file '{}': {error}",
            path.display()
        ))
    })?;

    let document = parse_declaration(&contents, format)?;
    tracing::debug!(
        path = %path.display(),
        permissions = document.permissions.len(),
        roles = document.roles.len(),
        "declaration file loaded"
    );

    Ok(document)
}
