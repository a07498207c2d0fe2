//! Index settings loaded with figment
//!
//! Sources, later overriding earlier:
//! 1. Serialized defaults
//! 2. `fieldmark.yaml` / `fieldmark.toml` / `fieldmark.json` in the vault root
//! 3. `FIELDMARK_`-prefixed environment variables

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use fieldmark_fields::{FieldDef, FieldId, FieldOrigin};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, trace};

use crate::error::Result;
use crate::note::NotePath;

/// A class bound to every note for which `expression` evaluates to true
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassQuery {
    pub class: String,
    pub expression: String,
}

/// Settings that shape how notes are indexed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Folder holding one `<ClassName>.md` file per class
    pub class_files_path: String,
    /// Header key naming a note's classes
    pub class_alias: String,
    /// Class applied when nothing else binds a note
    pub global_class: Option<String>,
    /// Fields available on every note
    pub preset_fields: Vec<FieldDef>,
    /// Names never indexed
    pub globally_ignored_fields: Vec<String>,
    pub class_queries: Vec<ClassQuery>,
    /// Path prefixes excluded from indexing
    pub ignored_paths: Vec<String>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            class_files_path: "classes".to_string(),
            class_alias: "fileClass".to_string(),
            global_class: None,
            preset_fields: Vec::new(),
            globally_ignored_fields: Vec::new(),
            class_queries: Vec::new(),
            ignored_paths: Vec::new(),
        }
    }
}

impl IndexSettings {
    /// Load settings for the vault at `root`
    pub fn load(root: &Path) -> Result<Self> {
        debug!(root = %root.display(), "loading index settings");
        let settings: IndexSettings = Self::figment(root).extract()?;
        Ok(settings.normalized())
    }

    /// Build the figment with all sources in precedence order
    pub fn figment(root: &Path) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(IndexSettings::default()));

        let yaml = root.join("fieldmark.yaml");
        if yaml.is_file() {
            trace!(path = %yaml.display(), "merging settings file");
            figment = figment.merge(Yaml::file(yaml));
        }
        let toml = root.join("fieldmark.toml");
        if toml.is_file() {
            trace!(path = %toml.display(), "merging settings file");
            figment = figment.merge(Toml::file(toml));
        }
        let json = root.join("fieldmark.json");
        if json.is_file() {
            trace!(path = %json.display(), "merging settings file");
            figment = figment.merge(Json::file(json));
        }

        figment.merge(Env::prefixed("FIELDMARK_").map(|key| key.as_str().to_lowercase().into()))
    }

    /// Give preset fields their origin and a stable id
    pub fn normalized(mut self) -> Self {
        for field in &mut self.preset_fields {
            if field.id.is_empty() {
                field.id = FieldId::derived("preset", &field.name);
            }
            field.origin = FieldOrigin::Preset;
        }
        self
    }

    pub fn is_ignored_field(&self, name: &str) -> bool {
        self.globally_ignored_fields.iter().any(|f| f == name)
    }

    pub fn is_ignored_path(&self, path: &NotePath) -> bool {
        self.ignored_paths.iter().any(|prefix| path.is_under(prefix))
    }

    /// Whether the note is a class definition file; returns the class name
    pub fn class_file_name<'a>(&self, path: &'a NotePath) -> Option<&'a str> {
        let folder = self.class_files_path.trim_matches('/');
        let rest = path.as_str().strip_prefix(folder)?.strip_prefix('/')?;
        if rest.contains('/') {
            return None;
        }
        rest.strip_suffix(".md")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_defaults_without_files() {
        let temp = TempDir::new().unwrap();
        let settings = IndexSettings::load(temp.path()).unwrap();
        assert_eq!(settings.class_files_path, "classes");
        assert_eq!(settings.class_alias, "fileClass");
        assert!(settings.global_class.is_none());
    }

    #[test]
    #[serial]
    fn test_yaml_file_and_preset_ids() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("fieldmark.yaml"),
            r#"
class_alias: type
global_class: Default
globally_ignored_fields: [secret]
preset_fields:
  - name: rating
    type: { kind: number, max: 5 }
class_queries:
  - class: Done
    expression: "current.status == 'done'"
"#,
        )
        .unwrap();

        let settings = IndexSettings::load(temp.path()).unwrap();
        assert_eq!(settings.class_alias, "type");
        assert_eq!(settings.global_class.as_deref(), Some("Default"));
        assert!(settings.is_ignored_field("secret"));
        assert_eq!(settings.preset_fields[0].id.as_str(), "preset.rating");
        assert_eq!(settings.class_queries[0].class, "Done");
        assert_eq!(settings.class_files_path, "classes");
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("fieldmark.toml"), "class_files_path = \"schema\"\n").unwrap();

        std::env::set_var("FIELDMARK_CLASS_FILES_PATH", "types");
        let settings = IndexSettings::load(temp.path());
        std::env::remove_var("FIELDMARK_CLASS_FILES_PATH");

        assert_eq!(settings.unwrap().class_files_path, "types");
    }

    #[test]
    fn test_class_file_name() {
        let settings = IndexSettings::default();
        assert_eq!(
            settings.class_file_name(&NotePath::new("classes/Project.md")),
            Some("Project")
        );
        assert_eq!(settings.class_file_name(&NotePath::new("classes/sub/X.md")), None);
        assert_eq!(settings.class_file_name(&NotePath::new("Project.md")), None);
    }

    #[test]
    fn test_ignored_paths() {
        let settings = IndexSettings {
            ignored_paths: vec!["Templates".into()],
            ..Default::default()
        };
        assert!(settings.is_ignored_path(&NotePath::new("Templates/Daily.md")));
        assert!(!settings.is_ignored_path(&NotePath::new("Notes/Daily.md")));
    }
}
