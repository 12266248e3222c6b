//! In-memory script store.
//!
//! Scripts are named `script://<basename>.ts` and live only for the process
//! lifetime. Creation and update both run the structural validator and save
//! regardless of the outcome (the author must be able to read their own
//! errors back), returning the validation result alongside the stored
//! script.

use crate::validator::{validate_script, ValidationResult};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// URI scheme prefix for script names.
pub const SCRIPT_SCHEME: &str = "script://";

/// A stored script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Script {
    /// Full `script://…` name.
    pub name: String,
    /// Current content.
    pub content: String,
}

impl Script {
    /// The on-disk filename: the name with the scheme stripped.
    #[must_use]
    pub fn basename(&self) -> &str {
        self.name.strip_prefix(SCRIPT_SCHEME).unwrap_or(&self.name)
    }
}

/// One ordered replacement for [`ScriptStore::update`].
#[derive(Debug, Clone)]
pub struct Replacement {
    /// Text that must occur exactly once at the time this replacement is
    /// processed.
    pub old_str: String,
    /// Replacement text.
    pub new_str: String,
}

/// Script store failure surface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptStoreError {
    /// No script with that name exists.
    #[error("Script not found: {name}")]
    NotFound {
        /// The requested name.
        name: String,
    },

    /// A script with that name already exists.
    #[error("Script name already exists: {name}")]
    Duplicate {
        /// The requested name.
        name: String,
    },

    /// The name does not match `script://<basename>.ts`.
    #[error("Invalid script name {name}: {reason}")]
    InvalidName {
        /// The requested name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A replacement's `old_str` was absent (1-based index).
    #[error("Replacement #{index}: String not found: {old_str:?}")]
    StringNotFound {
        /// 1-based replacement index.
        index: usize,
        /// The missing text.
        old_str: String,
    },

    /// A replacement's `old_str` occurred more than once (1-based index).
    #[error("Replacement #{index}: String must be unique, found {count} occurrences: {old_str:?}")]
    MustBeUnique {
        /// 1-based replacement index.
        index: usize,
        /// Occurrence count at processing time.
        count: usize,
        /// The ambiguous text.
        old_str: String,
    },
}

/// Thread-safe in-memory script store. Last write wins; there are no
/// reservations across concurrent requests.
#[derive(Debug, Default)]
pub struct ScriptStore {
    scripts: RwLock<HashMap<String, Script>>,
}

impl ScriptStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a script. The name must be well-formed and unused; the
    /// content is validated but saved even when invalid.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptStoreError::InvalidName`] or
    /// [`ScriptStoreError::Duplicate`]; validation problems are reported in
    /// the returned [`ValidationResult`], not as errors.
    pub async fn create(
        &self,
        name: &str,
        content: &str,
    ) -> Result<(Script, ValidationResult), ScriptStoreError> {
        validate_name(name)?;

        let script = Script {
            name: name.to_string(),
            content: content.to_string(),
        };
        let validation = validate_script(content);

        let mut scripts = self.scripts.write().await;
        if scripts.contains_key(name) {
            return Err(ScriptStoreError::Duplicate {
                name: name.to_string(),
            });
        }
        scripts.insert(name.to_string(), script.clone());
        tracing::debug!(%name, valid = validation.valid, "script created");
        Ok((script, validation))
    }

    /// Returns a script by name.
    pub async fn get(&self, name: &str) -> Option<Script> {
        self.scripts.read().await.get(name).cloned()
    }

    /// Applies an ordered list of replacements. Each `old_str` must occur
    /// exactly once *at the time it is processed*; an earlier replacement
    /// may create or remove the match for a later one. The update is
    /// atomic: on any failure nothing is saved.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptStoreError::NotFound`],
    /// [`ScriptStoreError::StringNotFound`], or
    /// [`ScriptStoreError::MustBeUnique`], the latter two tagged with the
    /// 1-based replacement index.
    pub async fn update(
        &self,
        name: &str,
        replacements: &[Replacement],
    ) -> Result<(Script, ValidationResult), ScriptStoreError> {
        let mut scripts = self.scripts.write().await;
        let script = scripts
            .get_mut(name)
            .ok_or_else(|| ScriptStoreError::NotFound {
                name: name.to_string(),
            })?;

        let mut content = script.content.clone();
        for (i, replacement) in replacements.iter().enumerate() {
            let index = i + 1;
            let count = content.matches(&replacement.old_str).count();
            match count {
                0 => {
                    return Err(ScriptStoreError::StringNotFound {
                        index,
                        old_str: replacement.old_str.clone(),
                    })
                }
                1 => {
                    content = content.replacen(&replacement.old_str, &replacement.new_str, 1);
                }
                _ => {
                    return Err(ScriptStoreError::MustBeUnique {
                        index,
                        count,
                        old_str: replacement.old_str.clone(),
                    })
                }
            }
        }

        script.content = content;
        let validation = validate_script(&script.content);
        tracing::debug!(%name, valid = validation.valid, "script updated");
        Ok((script.clone(), validation))
    }

    /// All scripts, sorted by name.
    pub async fn list(&self) -> Vec<Script> {
        let mut scripts: Vec<Script> = self.scripts.read().await.values().cloned().collect();
        scripts.sort_by(|a, b| a.name.cmp(&b.name));
        scripts
    }
}

fn validate_name(name: &str) -> Result<(), ScriptStoreError> {
    let invalid = |reason: &str| ScriptStoreError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let Some(basename) = name.strip_prefix(SCRIPT_SCHEME) else {
        return Err(invalid(&format!("must start with `{SCRIPT_SCHEME}`")));
    };
    if !basename.ends_with(".ts") {
        return Err(invalid("must end with `.ts`"));
    }
    if basename.len() <= ".ts".len() {
        return Err(invalid("basename must not be empty"));
    }
    // The basename becomes an on-disk filename inside the workspace.
    if basename.contains('/') || basename.contains('\\') || basename.contains("..") {
        return Err(invalid("basename must not contain path separators"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT: &str = "export default async (client: Client) => {\n    await client.items.list();\n};\n";

    fn replacement(old: &str, new: &str) -> Replacement {
        Replacement {
            old_str: old.to_string(),
            new_str: new.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_view() {
        let store = ScriptStore::new();
        let (script, validation) = store.create("script://demo.ts", CONTENT).await.unwrap();
        assert_eq!(script.basename(), "demo.ts");
        assert!(validation.valid);

        let viewed = store.get("script://demo.ts").await.unwrap();
        assert_eq!(viewed.content, CONTENT);
    }

    #[tokio::test]
    async fn test_invalid_content_is_still_saved() {
        let store = ScriptStore::new();
        let (_, validation) = store
            .create("script://bad.ts", "import axios from \"axios\";")
            .await
            .unwrap();
        assert!(!validation.valid);
        assert!(store.get("script://bad.ts").await.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let store = ScriptStore::new();
        store.create("script://demo.ts", CONTENT).await.unwrap();
        let err = store.create("script://demo.ts", CONTENT).await.unwrap_err();
        assert_eq!(
            err,
            ScriptStoreError::Duplicate {
                name: "script://demo.ts".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_name_format_enforced() {
        let store = ScriptStore::new();
        for bad in [
            "demo.ts",
            "script://demo.js",
            "script://.ts",
            "script://../escape.ts",
            "script://dir/demo.ts",
        ] {
            let err = store.create(bad, CONTENT).await.unwrap_err();
            assert!(
                matches!(err, ScriptStoreError::InvalidName { .. }),
                "expected {bad} to be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_update_single_replacement() {
        let store = ScriptStore::new();
        store.create("script://demo.ts", CONTENT).await.unwrap();

        let (script, _) = store
            .update(
                "script://demo.ts",
                &[replacement("items.list()", "items.find('x')")],
            )
            .await
            .unwrap();
        assert!(script.content.contains("items.find('x')"));
        assert!(!script.content.contains("items.list()"));

        let viewed = store.get("script://demo.ts").await.unwrap();
        assert_eq!(viewed.content, script.content);
    }

    #[tokio::test]
    async fn test_update_sequential_replacements_interact() {
        let store = ScriptStore::new();
        store
            .create("script://seq.ts", "export default async (c: Client) => { alpha(); };")
            .await
            .unwrap();

        // The first replacement creates the match the second one consumes.
        let (script, _) = store
            .update(
                "script://seq.ts",
                &[
                    replacement("alpha()", "beta()"),
                    replacement("beta()", "gamma()"),
                ],
            )
            .await
            .unwrap();
        assert!(script.content.contains("gamma()"));
    }

    #[tokio::test]
    async fn test_update_not_found_script() {
        let store = ScriptStore::new();
        let err = store
            .update("script://ghost.ts", &[replacement("a", "b")])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ScriptStoreError::NotFound {
                name: "script://ghost.ts".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_update_string_not_found_carries_index() {
        let store = ScriptStore::new();
        store.create("script://demo.ts", CONTENT).await.unwrap();
        let err = store
            .update(
                "script://demo.ts",
                &[
                    replacement("items.list()", "items.all()"),
                    replacement("does-not-exist", "x"),
                ],
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ScriptStoreError::StringNotFound {
                index: 2,
                old_str: "does-not-exist".to_string()
            }
        );
        // Atomic: the first replacement must not have been persisted.
        let viewed = store.get("script://demo.ts").await.unwrap();
        assert!(viewed.content.contains("items.list()"));
    }

    #[tokio::test]
    async fn test_update_must_be_unique() {
        let store = ScriptStore::new();
        store
            .create(
                "script://dup.ts",
                "export default async (c: Client) => { x(); x(); };",
            )
            .await
            .unwrap();
        let err = store
            .update("script://dup.ts", &[replacement("x()", "y()")])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ScriptStoreError::MustBeUnique {
                index: 1,
                count: 2,
                old_str: "x()".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let store = ScriptStore::new();
        store.create("script://b.ts", CONTENT).await.unwrap();
        store.create("script://a.ts", CONTENT).await.unwrap();
        let names: Vec<String> = store.list().await.into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["script://a.ts", "script://b.ts"]);
    }
}
