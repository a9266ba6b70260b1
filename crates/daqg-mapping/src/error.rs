use thiserror::Error;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("rule already exists for source '{0}' and is not auto-generated")]
    HandEditedRuleExists(String),

    #[error("no rule for source '{0}'")]
    NoRule(String),

    #[error("invalid formula expression: {0}")]
    InvalidFormula(String),

    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog parse error in {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}
