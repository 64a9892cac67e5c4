use crate::config::AzureDevOpsConfig;
use crate::provider::{BackendConnector, BackendError, BackendResult, TestManagementBackend};
use crate::types::{
    ConfigurationId, LinkEndId, Outcome, TestCase, TestCaseId, TestConfiguration, TestPlan,
    TestPlanId, TestPlanState, TestPoint, TestPointId, WorkItem, WorkItemCategory, WorkItemId,
    WorkItemLink,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

const TITLE_FIELD: &str = "System.Title";
const WORK_ITEM_TYPE_FIELD: &str = "System.WorkItemType";
const CONTINUATION_TOKEN_HEADER: &str = "x-ms-continuationtoken";

#[derive(Deserialize)]
struct ApiList<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Deserialize)]
struct ApiWorkItem {
    id: u32,
    #[serde(default)]
    fields: HashMap<String, serde_json::Value>,
    #[serde(default)]
    relations: Vec<ApiRelation>,
}

#[derive(Deserialize)]
struct ApiRelation {
    rel: String,
    url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiRelationType {
    reference_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCategory {
    reference_name: String,
    name: String,
    #[serde(default)]
    work_item_types: Vec<ApiNamed>,
}

#[derive(Deserialize)]
struct ApiNamed {
    name: String,
}

#[derive(Deserialize)]
struct ApiTestPlan {
    id: u32,
    name: String,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTestConfiguration {
    id: u32,
    name: String,
    #[serde(default)]
    is_default: bool,
}

#[derive(Deserialize)]
struct ApiSuite {
    id: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiTestPoint {
    id: u32,
    test_case_reference: ApiReference,
    configuration: ApiReference,
    #[serde(default)]
    test_plan: Option<ApiReference>,
    #[serde(default)]
    results: Option<ApiPointResults>,
    #[serde(default)]
    last_updated_date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ApiPointResults {
    #[serde(default)]
    outcome: Option<String>,
}

/// Shallow references carry their id as a string on some endpoints and a
/// number on others.
#[derive(Deserialize)]
struct ApiReference {
    #[serde(deserialize_with = "id_from_string_or_number")]
    id: u32,
}

fn id_from_string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u32),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Number(id) => Ok(id),
        RawId::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Items gathered from the pages of a continuation-token listing.
struct PagedList<T> {
    items: Vec<T>,
    seen_tokens: HashSet<String>,
}

impl<T> PagedList<T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            seen_tokens: HashSet::new(),
        }
    }

    /// Appends one page and returns the token to request the next page with.
    /// A token the server already handed out means it is looping.
    fn push_page(&mut self, page: ApiList<T>, next: Option<String>) -> BackendResult<Option<String>> {
        self.items.extend(page.value);

        let Some(token) = next.filter(|t| !t.trim().is_empty()) else {
            return Ok(None);
        };
        if !self.seen_tokens.insert(token.clone()) {
            return Err(BackendError::InvalidResponse {
                message: format!("Continuation token '{}' was returned twice", token),
            });
        }
        Ok(Some(token))
    }

    fn into_items(self) -> Vec<T> {
        self.items
    }
}

/// Client for the Azure DevOps Services / Azure DevOps Server (TFS) REST API.
pub struct AzureDevOpsBackend {
    http_client: reqwest::Client,
    collection_url: Url,
    config: AzureDevOpsConfig,
}

impl AzureDevOpsBackend {
    pub fn new(collection_url: &str, config: AzureDevOpsConfig) -> BackendResult<Self> {
        config
            .validate()
            .map_err(|msg| BackendError::InvalidConfig { message: msg })?;

        let collection_url =
            Url::parse(collection_url.trim()).map_err(|e| BackendError::InvalidConfig {
                message: format!("Invalid collection url '{}': {}", collection_url, e),
            })?;

        if !matches!(collection_url.scheme(), "http" | "https") {
            return Err(BackendError::InvalidConfig {
                message: "Collection url must start with http:// or https://".to_string(),
            });
        }

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::InvalidConfig {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            collection_url,
            config,
        })
    }

    pub fn collection_url(&self) -> &Url {
        &self.collection_url
    }

    /// Builds `{collection}[/{project}]/_apis/{path...}` with each segment
    /// percent-encoded.
    fn endpoint(&self, project: Option<&str>, path: &[&str]) -> BackendResult<Url> {
        let mut url = self.collection_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| BackendError::InvalidConfig {
                    message: format!("Collection url cannot be a base: {}", self.collection_url),
                })?;
            segments.pop_if_empty();
            if let Some(project) = project {
                segments.push(project);
            }
            segments.push("_apis");
            segments.extend(path);
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.query(&[("api-version", self.config.api_version.as_str())]);
        match &self.config.personal_access_token {
            Some(token) => request.basic_auth("", Some(token)),
            None => request,
        }
    }

    fn map_send_error(e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::ServiceUnavailable {
                message: "Request timeout".to_string(),
            }
        } else if e.is_connect() {
            BackendError::ServiceUnavailable {
                message: "Cannot connect to the project collection".to_string(),
            }
        } else {
            BackendError::Network(e)
        }
    }

    /// Sends the request and maps error statuses. A 404 yields `Ok(None)`.
    async fn send(&self, request: RequestBuilder) -> BackendResult<Option<Response>> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(Self::map_send_error)?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => return Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(BackendError::Authentication)
            }
            StatusCode::SERVICE_UNAVAILABLE => {
                return Err(BackendError::ServiceUnavailable {
                    message: response.text().await.unwrap_or_default(),
                })
            }
            _ if !status.is_success() => {
                let error_text = response.text().await.unwrap_or_default();
                return Err(BackendError::Unexpected {
                    status: status.as_u16(),
                    message: error_text,
                });
            }
            _ => {}
        }

        Ok(Some(response))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> BackendResult<Option<T>> {
        debug!("GET {}", url);
        match self.send(self.http_client.get(url)).await? {
            Some(response) => {
                let body = response.bytes().await.map_err(BackendError::Network)?;
                Ok(Some(serde_json::from_slice(&body)?))
            }
            None => Ok(None),
        }
    }

    /// GETs every page of a `{ "value": [...] }` listing, following the
    /// `x-ms-continuationtoken` response header until the server stops
    /// sending one.
    async fn get_all<T: DeserializeOwned>(&self, url: Url) -> BackendResult<Vec<T>> {
        let mut pages = PagedList::new();
        let mut token: Option<String> = None;

        loop {
            let mut page_url = url.clone();
            if let Some(token) = &token {
                page_url
                    .query_pairs_mut()
                    .append_pair("continuationToken", token);
            }

            debug!("GET {}", page_url);
            let response = self
                .send(self.http_client.get(page_url))
                .await?
                .ok_or_else(|| BackendError::InvalidResponse {
                    message: format!("Endpoint not found: {}", url),
                })?;
            let next = response
                .headers()
                .get(CONTINUATION_TOKEN_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await.map_err(BackendError::Network)?;
            let page: ApiList<T> = serde_json::from_slice(&body)?;

            match pages.push_page(page, next)? {
                Some(next) => token = Some(next),
                None => return Ok(pages.into_items()),
            }
        }
    }

    /// Like [`Self::get_json`] but treats a 404 as a malformed reply: the
    /// endpoint is expected to exist once the project has been confirmed.
    async fn get_required<T: DeserializeOwned>(&self, url: Url) -> BackendResult<T> {
        let target = url.to_string();
        self.get_json(url)
            .await?
            .ok_or_else(|| BackendError::InvalidResponse {
                message: format!("Endpoint not found: {}", target),
            })
    }

    /// Confirms that something answers as a project collection at the url.
    pub async fn probe(&self) -> BackendResult<()> {
        let mut url = self.endpoint(None, &["projects"])?;
        url.query_pairs_mut().append_pair("$top", "1");

        match self.get_json::<serde_json::Value>(url).await? {
            Some(_) => Ok(()),
            None => Err(BackendError::CollectionNotFound {
                url: self.collection_url.to_string(),
            }),
        }
    }

    fn parse_relation_target(url: &str) -> Option<WorkItemId> {
        let lower = url.to_ascii_lowercase();
        let index = lower.rfind("/workitems/")?;
        url[index + "/workitems/".len()..]
            .trim_end_matches('/')
            .parse()
            .ok()
            .map(WorkItemId)
    }

    fn field_string(fields: &HashMap<String, serde_json::Value>, name: &str) -> String {
        fields
            .get(name)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    fn convert_work_item(item: ApiWorkItem) -> WorkItem {
        let links = item
            .relations
            .iter()
            .filter_map(|relation| {
                Self::parse_relation_target(&relation.url).map(|target| WorkItemLink {
                    link_end: LinkEndId::new(relation.rel.clone()),
                    target,
                })
            })
            .collect();

        WorkItem {
            id: WorkItemId(item.id),
            title: Self::field_string(&item.fields, TITLE_FIELD),
            work_item_type: Self::field_string(&item.fields, WORK_ITEM_TYPE_FIELD),
            links,
        }
    }

    fn convert_test_case(item: ApiWorkItem) -> TestCase {
        TestCase {
            id: WorkItemId(item.id),
            title: Self::field_string(&item.fields, TITLE_FIELD),
            work_item_type: Self::field_string(&item.fields, WORK_ITEM_TYPE_FIELD),
        }
    }

    fn convert_plan(plan: ApiTestPlan) -> TestPlan {
        TestPlan {
            id: TestPlanId(plan.id),
            name: plan.name,
            state: plan
                .state
                .as_deref()
                .map(TestPlanState::parse)
                .unwrap_or_else(|| TestPlanState::Other(String::new())),
        }
    }

    fn convert_point(point: ApiTestPoint, plan_id: TestPlanId) -> BackendResult<TestPoint> {
        if let Some(reported) = point.test_plan.as_ref().map(|r| TestPlanId(r.id)) {
            if reported != plan_id {
                return Err(BackendError::InvalidResponse {
                    message: format!(
                        "Test point {} belongs to plan {}, not plan {}",
                        point.id, reported, plan_id
                    ),
                });
            }
        }

        Ok(TestPoint {
            id: TestPointId(point.id),
            test_case_id: WorkItemId(point.test_case_reference.id),
            test_plan_id: plan_id,
            configuration_id: ConfigurationId(point.configuration.id),
            most_recent_outcome: point
                .results
                .and_then(|r| r.outcome)
                .as_deref()
                .map(Outcome::from_server),
            last_updated: point.last_updated_date,
        })
    }
}

#[async_trait]
impl TestManagementBackend for AzureDevOpsBackend {
    async fn project_exists(&self, project: &str) -> BackendResult<bool> {
        let url = self.endpoint(None, &["projects", project])?;
        Ok(self.get_json::<serde_json::Value>(url).await?.is_some())
    }

    async fn get_work_item(
        &self,
        project: &str,
        id: WorkItemId,
    ) -> BackendResult<Option<WorkItem>> {
        let id_segment = id.to_string();
        let mut url = self.endpoint(Some(project), &["wit", "workitems", &id_segment])?;
        url.query_pairs_mut().append_pair("$expand", "relations");

        let item = self.get_json::<ApiWorkItem>(url).await?;
        Ok(item.map(Self::convert_work_item))
    }

    async fn get_forward_link_end(
        &self,
        link_type_reference_name: &str,
    ) -> BackendResult<Option<LinkEndId>> {
        let forward = format!("{}-Forward", link_type_reference_name);
        let url = self.endpoint(None, &["wit", "workitemrelationtypes", &forward])?;

        let relation = self.get_json::<ApiRelationType>(url).await?;
        Ok(relation.map(|r| LinkEndId::new(r.reference_name)))
    }

    async fn get_categories(&self, project: &str) -> BackendResult<Vec<WorkItemCategory>> {
        let url = self.endpoint(Some(project), &["wit", "workitemtypecategories"])?;
        let list: ApiList<ApiCategory> = self.get_required(url).await?;

        Ok(list
            .value
            .into_iter()
            .map(|c| WorkItemCategory {
                reference_name: c.reference_name,
                name: c.name,
                work_item_types: c.work_item_types.into_iter().map(|t| t.name).collect(),
            })
            .collect())
    }

    async fn get_test_plans(&self, project: &str) -> BackendResult<Vec<TestPlan>> {
        let mut url = self.endpoint(Some(project), &["testplan", "plans"])?;
        url.query_pairs_mut().append_pair("filterActivePlans", "true");

        let plans: Vec<ApiTestPlan> = self.get_all(url).await?;
        Ok(plans.into_iter().map(Self::convert_plan).collect())
    }

    async fn query_test_points(
        &self,
        project: &str,
        plan: &TestPlan,
        test_case_ids: &[TestCaseId],
    ) -> BackendResult<Vec<TestPoint>> {
        if test_case_ids.is_empty() {
            return Ok(Vec::new());
        }

        let plan_segment = plan.id.to_string();
        let suites_url =
            self.endpoint(Some(project), &["testplan", "Plans", &plan_segment, "suites"])?;
        let suites: Vec<ApiSuite> = self.get_all(suites_url).await?;

        let joined = test_case_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        debug!(
            "Querying {} test case(s) across {} suite(s) of plan {} ({})",
            test_case_ids.len(),
            suites.len(),
            plan.id,
            plan.name
        );

        // A test case can sit in several suites of the plan; the duplicates
        // are resolved by recency when the matrix is built.
        let mut points = Vec::new();
        for suite in suites {
            let suite_segment = suite.id.to_string();
            let mut url = self.endpoint(
                Some(project),
                &[
                    "testplan",
                    "Plans",
                    &plan_segment,
                    "Suites",
                    &suite_segment,
                    "TestPoint",
                ],
            )?;
            url.query_pairs_mut()
                .append_pair("testCaseId", &joined)
                .append_pair("includePointDetails", "true");

            let suite_points: Vec<ApiTestPoint> = self.get_all(url).await?;
            for point in suite_points {
                points.push(Self::convert_point(point, plan.id)?);
            }
        }

        Ok(points)
    }

    async fn get_test_configurations(
        &self,
        project: &str,
    ) -> BackendResult<Vec<TestConfiguration>> {
        let url = self.endpoint(Some(project), &["testplan", "configurations"])?;
        let configurations: Vec<ApiTestConfiguration> = self.get_all(url).await?;

        Ok(configurations
            .into_iter()
            .map(|c| TestConfiguration {
                id: ConfigurationId(c.id),
                name: c.name,
                is_default: c.is_default,
            })
            .collect())
    }

    async fn resolve_test_cases(&self, ids: &[TestCaseId]) -> BackendResult<Vec<TestCase>> {
        let mut test_cases = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(self.config.max_ids_per_request) {
            let joined = chunk
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");

            let mut url = self.endpoint(None, &["wit", "workitems"])?;
            url.query_pairs_mut()
                .append_pair("ids", &joined)
                .append_pair(
                    "fields",
                    &format!("{},{}", TITLE_FIELD, WORK_ITEM_TYPE_FIELD),
                )
                .append_pair("errorPolicy", "omit");

            // Omitted (deleted or inaccessible) items come back as nulls.
            let list: ApiList<Option<ApiWorkItem>> = self.get_required(url).await?;
            let before = test_cases.len();
            test_cases.extend(list.value.into_iter().flatten().map(Self::convert_test_case));

            let missing = chunk.len().saturating_sub(test_cases.len() - before);
            if missing > 0 {
                warn!("{} linked work item(s) could not be read", missing);
            }
        }

        Ok(test_cases)
    }

    fn backend_name(&self) -> &'static str {
        "azure-devops"
    }
}

/// Opens [`AzureDevOpsBackend`]s with a shared configuration.
#[derive(Debug, Clone, Default)]
pub struct AzureDevOpsConnector {
    config: AzureDevOpsConfig,
}

impl AzureDevOpsConnector {
    pub fn new(config: AzureDevOpsConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BackendConnector for AzureDevOpsConnector {
    async fn connect(&self, collection_url: &str) -> BackendResult<Arc<dyn TestManagementBackend>> {
        let backend = AzureDevOpsBackend::new(collection_url, self.config.clone())?;
        backend.probe().await?;
        info!("Connected to project collection {}", backend.collection_url());
        Ok(Arc::new(backend))
    }
}
