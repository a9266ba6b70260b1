use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use daqg_domain::{MappingRule, SourceId};
use tracing::{debug, warn};

use crate::error::MappingError;

/// In-memory rule catalog backed by one on-disk document, whole-file atomic
/// replace on every mutation (§4.4 "Persistence"). Protected by a
/// single-writer/many-reader lock (§5); additions are rare, lookups are hot.
pub struct MappingCatalog {
    path: PathBuf,
    rules: RwLock<HashMap<SourceId, MappingRule>>,
}

impl MappingCatalog {
    /// Loads the catalog from `path`. A missing file is an empty catalog;
    /// invalid entries are dropped with a warning rather than failing load.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, MappingError> {
        let path = path.into();
        let rules = match std::fs::read_to_string(&path) {
            Ok(content) => {
                let parsed: Vec<MappingRule> =
                    serde_yaml::from_str(&content).map_err(|e| MappingError::Parse {
                        path: path.display().to_string(),
                        source: e,
                    })?;
                parsed
                    .into_iter()
                    .filter_map(|r| {
                        if r.source_id.as_str().trim().is_empty() {
                            warn!("dropping mapping rule with empty source id");
                            None
                        } else {
                            Some((r.source_id.clone(), r))
                        }
                    })
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(MappingError::Io {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };
        debug!(count = rules.len(), path = %path.display(), "loaded mapping catalog");
        Ok(MappingCatalog {
            path,
            rules: RwLock::new(rules),
        })
    }

    pub fn get(&self, source_id: &SourceId) -> Option<MappingRule> {
        self.rules.read().expect("catalog lock poisoned").get(source_id).cloned()
    }

    /// Adds or replaces a rule. An existing hand-edited rule (`auto_generated
    /// == false`) is refused unless `force` is set (§4.4 "auto-generated
    /// rules never overwrite hand-edited ones").
    pub fn add_rule(&self, rule: MappingRule, force: bool) -> Result<(), MappingError> {
        {
            let mut rules = self.rules.write().expect("catalog lock poisoned");
            if let Some(existing) = rules.get(&rule.source_id) {
                if !existing.auto_generated && !force {
                    return Err(MappingError::HandEditedRuleExists(
                        rule.source_id.to_string(),
                    ));
                }
            }
            rules.insert(rule.source_id.clone(), rule);
        }
        self.persist()
    }

    pub fn remove_rule(&self, source_id: &SourceId) -> Result<(), MappingError> {
        {
            let mut rules = self.rules.write().expect("catalog lock poisoned");
            rules.remove(source_id);
        }
        self.persist()
    }

    fn persist(&self) -> Result<(), MappingError> {
        let rules = self.rules.read().expect("catalog lock poisoned");
        let snapshot: Vec<&MappingRule> = rules.values().collect();
        let yaml = serde_yaml::to_string(&snapshot).map_err(|e| MappingError::Parse {
            path: self.path.display().to_string(),
            source: e,
        })?;
        atomic_write(&self.path, &yaml)
    }
}

fn atomic_write(path: &Path, contents: &str) -> Result<(), MappingError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = dir.join(format!(
        ".{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "catalog".to_string())
    ));
    std::fs::write(&tmp_path, contents).map_err(|e| MappingError::Io {
        path: tmp_path.display().to_string(),
        source: e,
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| MappingError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

pub fn stamp_generated_at(rule: &mut MappingRule) {
    rule.generated_at = Some(Utc::now());
}

#[cfg(test)]
mod tests {
    use super::*;
    use daqg_domain::{Mapping, MappingTarget, MappingTargetKind, Transform};

    fn rule(source_id: &str, auto_generated: bool) -> MappingRule {
        MappingRule {
            source_id: SourceId::new(source_id),
            target: MappingTarget {
                kind: MappingTargetKind::Canonical,
                entity_type: "Sensor".into(),
            },
            mappings: vec![Mapping {
                source_field: "v".into(),
                target_field: "v".into(),
                transform: Transform::Direct,
            }],
            include_metadata: false,
            auto_generated,
            generated_at: None,
        }
    }

    #[test]
    fn missing_file_is_an_empty_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MappingCatalog::load(dir.path().join("catalog.yml")).unwrap();
        assert!(catalog.get(&SourceId::new("m1")).is_none());
    }

    #[test]
    fn add_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.yml");
        let catalog = MappingCatalog::load(&path).unwrap();
        catalog.add_rule(rule("m1", true), false).unwrap();

        let reloaded = MappingCatalog::load(&path).unwrap();
        assert!(reloaded.get(&SourceId::new("m1")).is_some());
    }

    #[test]
    fn hand_edited_rule_is_not_overwritten_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = MappingCatalog::load(dir.path().join("catalog.yml")).unwrap();
        catalog.add_rule(rule("m1", false), false).unwrap();

        let result = catalog.add_rule(rule("m1", true), false);
        assert!(result.is_err());

        catalog.add_rule(rule("m1", true), true).unwrap();
        assert!(catalog.get(&SourceId::new("m1")).unwrap().auto_generated);
    }
}
