use crate::error::{CoverageError, CoverageResult};
use backend::AzureDevOpsConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Test case ids per test point request.
    pub query_batch_size: usize,
    /// Active plans whose points are fetched at the same time. 1 is sequential.
    pub max_concurrent_plan_queries: usize,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            query_batch_size: 200,
            max_concurrent_plan_queries: 4,
        }
    }
}

impl CoverageConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query_batch_size(mut self, batch_size: usize) -> Self {
        self.query_batch_size = batch_size;
        self
    }

    pub fn with_max_concurrent_plan_queries(mut self, max: usize) -> Self {
        self.max_concurrent_plan_queries = max;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.query_batch_size == 0 {
            return Err("Query batch size must be greater than 0".to_string());
        }

        if self.max_concurrent_plan_queries == 0 {
            return Err("Max concurrent plan queries must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Contents of the optional TOML config file.
///
/// ```toml
/// [backend]
/// timeout_secs = 60
/// api_version = "7.0"
///
/// [coverage]
/// query_batch_size = 100
/// max_concurrent_plan_queries = 8
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: AzureDevOpsConfig,
    pub coverage: CoverageConfig,
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> CoverageResult<Self> {
        let config = Self::parse(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> CoverageResult<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Config for one CLI run: the optional file, then `token` (from
    /// `--token` or `AZURE_DEVOPS_PAT`) over the file's token. Only the
    /// merged result is validated.
    pub fn resolve(path: Option<&Path>, token: Option<String>) -> CoverageResult<Self> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => Self::default(),
        };

        if let Some(token) = token {
            config.backend = config.backend.with_personal_access_token(token);
        }
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str) -> CoverageResult<Self> {
        toml::from_str(content).map_err(|e| CoverageError::InvalidConfig {
            message: e.to_string(),
        })
    }

    fn read(path: &Path) -> CoverageResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoverageError::InvalidConfig {
            message: format!("Cannot read {}: {}", path.display(), e),
        })?;
        Self::parse(&content)
    }

    pub fn validate(&self) -> CoverageResult<()> {
        self.backend
            .validate()
            .and_then(|_| self.coverage.validate())
            .map_err(|message| CoverageError::InvalidConfig { message })
    }
}
