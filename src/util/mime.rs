use crate::model::{fs::WriteConfig, object::DEFAULT_MIMETYPE};

/// Content type to store for `path`: the configured one, else a guess from the extension.
pub fn resolve_mimetype(path: &str, config: &WriteConfig) -> String {
    match &config.mimetype {
        Some(mimetype) => mimetype.clone(),
        None => mime_guess::from_path(path)
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| DEFAULT_MIMETYPE.to_string()),
    }
}
