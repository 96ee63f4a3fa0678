//
// config.rs
//
// Markdown validation settings, parsed from LSP configuration payloads
//

use std::sync::RwLock;

use crate::events::Emitter;

/// Per-rule severity as configured by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeveritySetting {
    Error,
    Warning,
    #[default]
    Ignore,
}

impl SeveritySetting {
    fn parse(value: &str) -> Self {
        match value {
            "error" => Self::Error,
            "warning" => Self::Warning,
            _ => Self::Ignore,
        }
    }
}

/// Settings the workspace and diagnostics layers consume.
///
/// `markdown_file_extensions` and `exclude_paths` arrive once via
/// initialization options; the `validate` block may change at any time via
/// `workspace/didChangeConfiguration`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub validate_enabled: bool,
    pub validate_file_links: SeveritySetting,
    pub validate_reference_links: SeveritySetting,
    pub validate_fragment_links: SeveritySetting,
    pub validate_markdown_file_link_fragments: SeveritySetting,
    pub ignore_links: Vec<String>,
    pub markdown_file_extensions: Vec<String>,
    pub exclude_paths: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            validate_enabled: false,
            validate_file_links: SeveritySetting::Ignore,
            validate_reference_links: SeveritySetting::Ignore,
            validate_fragment_links: SeveritySetting::Ignore,
            validate_markdown_file_link_fragments: SeveritySetting::Ignore,
            ignore_links: Vec::new(),
            markdown_file_extensions: vec!["md".to_string()],
            exclude_paths: vec!["**/.*".to_string(), "**/node_modules/**".to_string()],
        }
    }
}

/// Holds the current settings and notifies on change.
#[derive(Default)]
pub struct ConfigManager {
    settings: RwLock<Settings>,
    on_did_change: Emitter<()>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn on_did_change(&self) -> &Emitter<()> {
        &self.on_did_change
    }

    /// Apply `initializationOptions` from the initialize request.
    ///
    /// Only file-extension and exclude-glob lists live here; they are fixed
    /// for the life of the session, so no change event fires.
    pub fn apply_initialization_options(&self, options: &serde_json::Value) {
        let Ok(mut settings) = self.settings.write() else {
            return;
        };
        if let Some(extensions) = string_list(options.get("markdownFileExtensions")) {
            if !extensions.is_empty() {
                settings.markdown_file_extensions = extensions;
            }
        }
        if let Some(excludes) = string_list(options.get("excludePaths")) {
            settings.exclude_paths = excludes;
        }
        log::info!(
            "Configured markdown extensions: {:?}, exclude paths: {:?}",
            settings.markdown_file_extensions,
            settings.exclude_paths
        );
    }

    /// Apply a `workspace/didChangeConfiguration` payload and fire the
    /// change event. Absent fields fall back to their defaults rather than
    /// retaining stale values, matching how clients resend whole sections.
    pub fn update_from_json(&self, payload: &serde_json::Value) {
        {
            let Ok(mut settings) = self.settings.write() else {
                return;
            };
            let validate = payload.get("markdown").and_then(|m| m.get("validate"));

            settings.validate_enabled = validate
                .and_then(|v| v.get("enabled"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            settings.validate_file_links = severity(validate, &["fileLinks", "enabled"]);
            settings.validate_reference_links = severity(validate, &["referenceLinks", "enabled"]);
            settings.validate_fragment_links = severity(validate, &["fragmentLinks", "enabled"]);
            settings.validate_markdown_file_link_fragments =
                severity(validate, &["fileLinks", "markdownFragmentLinks"]);
            settings.ignore_links = validate
                .and_then(|v| string_list(v.get("ignoredLinks")))
                .unwrap_or_default();

            log::trace!("Updated validation settings: {settings:?}");
        }
        self.on_did_change.fire(&());
    }
}

fn severity(validate: Option<&serde_json::Value>, path: &[&str]) -> SeveritySetting {
    let mut node = validate;
    for key in path {
        node = node.and_then(|v| v.get(key));
    }
    node.and_then(|v| v.as_str())
        .map(SeveritySetting::parse)
        .unwrap_or_default()
}

fn string_list(value: Option<&serde_json::Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
    )
}
