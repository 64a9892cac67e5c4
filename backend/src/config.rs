use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureDevOpsConfig {
    #[serde(rename = "timeout_secs", with = "duration_secs")]
    pub timeout: Duration,
    pub api_version: String,
    /// Personal access token, sent as basic auth with an empty user name.
    #[serde(skip_serializing)]
    pub personal_access_token: Option<String>,
    /// Upper bound on ids per batched work item request.
    pub max_ids_per_request: usize,
}

impl Default for AzureDevOpsConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            api_version: "7.0".to_string(),
            personal_access_token: None,
            max_ids_per_request: 200,
        }
    }
}

impl AzureDevOpsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn with_personal_access_token(mut self, token: impl Into<String>) -> Self {
        self.personal_access_token = Some(token.into());
        self
    }

    pub fn with_max_ids_per_request(mut self, max_ids: usize) -> Self {
        self.max_ids_per_request = max_ids;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        if self.api_version.trim().is_empty() {
            return Err("API version cannot be empty".to_string());
        }

        if let Some(token) = &self.personal_access_token {
            if token.trim().is_empty() {
                return Err("Personal access token cannot be blank".to_string());
            }
        }

        // The work items batch endpoint rejects more than 200 ids.
        if !(1..=200).contains(&self.max_ids_per_request) {
            return Err("Max ids per request must be between 1 and 200".to_string());
        }

        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
