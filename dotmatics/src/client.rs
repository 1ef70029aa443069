use crate::config::{ClientConfig, Credentials};
use crate::errors::{ClientError, Result};
use crate::shaping::{self, ExperimentSummary, SampleCsvRow};
use http::StatusCode;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

const API_ROOT: [&str; 2] = ["browser", "api"];

/// Requests every row of a data source rather than the server's default page.
const UNLIMITED: (&str, &str) = ("limit", "0");

struct ClientInner {
    config: ClientConfig,
    credentials: Credentials,
}

/// Read-only client for the Dotmatics browser API of one project and environment.
///
/// Holds no mutable state. Clones share the underlying connection pool, so callers
/// may issue queries for many experiments concurrently.
#[derive(Clone)]
pub struct DotmaticsClient {
    client: reqwest::Client,
    inner: Arc<ClientInner>,
}

impl DotmaticsClient {
    pub fn new(config: ClientConfig, credentials: Credentials) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(DotmaticsClient {
            client,
            inner: Arc::new(ClientInner {
                config,
                credentials,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        let server = &self.inner.config.server_url;
        let mut url = server.clone();
        url.set_query(None);
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(server.to_string()))?
            .pop_if_empty()
            .extend(API_ROOT)
            .extend(segments);

        Ok(url)
    }

    /// Issues an authenticated GET below `{server}/browser/api/` and returns the JSON body.
    ///
    /// Anything but a 200 is returned as [`ClientError::Request`].
    pub async fn get_json(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<Value> {
        let mut url = self.api_url(segments)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }

        tracing::debug!(path = url.path(), "GET");

        let credentials = &self.inner.credentials;
        let response = self
            .client
            .get(url.clone())
            .basic_auth(credentials.username(), Some(credentials.password()))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json::<Value>().await?),
            status => {
                tracing::warn!(
                    status = status.as_u16(),
                    path = url.path(),
                    "Dotmatics request failed"
                );
                Err(ClientError::from_status(status))
            }
        }
    }

    /// Fetches the rows of `data_source_ids` recorded for one experiment in a single request.
    pub async fn fetch_experiment(
        &self,
        data_source_ids: &[&str],
        experiment_id: &str,
    ) -> Result<Value> {
        if data_source_ids.is_empty() {
            return Err(ClientError::InvalidUrl(
                "at least one data source id is required".to_string(),
            ));
        }

        let ids = data_source_ids.join(",");
        tracing::debug!(experiment_id, data_sources = %ids, "Fetching experiment");

        self.get_json(
            &[
                "data",
                self.inner.credentials.username(),
                &self.inner.config.project_id,
                &ids,
                experiment_id,
            ],
            &[UNLIMITED],
        )
        .await
    }

    /// Fetches the project metadata holding the data source directory. Not cached.
    pub async fn fetch_data_source_directory(&self) -> Result<Value> {
        self.get_json(&["projects", &self.inner.config.project_id], &[])
            .await
    }

    /// Looks up the internal id of the data source called `name` in the project.
    pub async fn resolve_data_source_id(&self, name: &str) -> Result<String> {
        let directory = self.fetch_data_source_directory().await?;
        let id = shaping::find_data_source_id(&directory, name)?;
        tracing::debug!(name, id = %id, "Resolved data source");

        Ok(id)
    }

    /// Fetches the five HashSeq data sources of an experiment, keyed by readable name.
    pub async fn get_experiment_summary(&self, experiment_id: &str) -> Result<ExperimentSummary> {
        let ids = &self.inner.config.data_sources;
        let doc = self.fetch_experiment(&ids.all(), experiment_id).await?;
        let sources = shaping::experiment_data_sources(doc, experiment_id)?;

        ExperimentSummary::from_data_sources(&sources, ids)
    }

    /// Distinct `(*, LIBRARY_ID, I7_NAME)` sample sheet rows of an experiment.
    pub async fn get_sample_csv_rows(&self, experiment_id: &str) -> Result<HashSet<SampleCsvRow>> {
        let id = self.inner.config.data_sources.clt_hash_bio_tech.as_str();
        let doc = self.fetch_experiment(&[id], experiment_id).await?;
        let rows = shaping::experiment_rows(doc, experiment_id, id)?;

        Ok(shaping::sample_csv_rows(rows))
    }

    /// Fetches the rows of the data source called `data_source_name` for an experiment
    /// and hands them to `transform`, returning its result untouched.
    ///
    /// `transform` runs once, after both requests succeeded. It should be a pure
    /// projection of the rows: no I/O, no shared state.
    pub async fn query_named_form<T, F>(
        &self,
        data_source_name: &str,
        experiment_id: &str,
        transform: F,
    ) -> Result<T>
    where
        F: FnOnce(Vec<Value>) -> T,
    {
        let id = self.resolve_data_source_id(data_source_name).await?;
        let doc = self.fetch_experiment(&[id.as_str()], experiment_id).await?;
        let rows = shaping::experiment_rows(doc, experiment_id, &id)?;

        Ok(transform(rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{
        PASSWORD, PROJECT_ID, USERNAME, data_path, mount_data, mount_directory, test_client,
    };
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_experiment_summary() {
        let server = MockServer::start().await;
        mount_data(
            &server,
            "501,502,503,504,505",
            "141885",
            json!({
                "141885": {
                    "dataSources": {
                        "501": {"1": {"STUDY_ID": "S1"}},
                        "502": {"2": {"LIBRARY_ID": "L1"}},
                        "503": {"3": {"SAMPLE_ID": "T1"}},
                        "504": {"4": {"POOL_ID": "P1"}},
                        "505": {"5": {"ASSAY_ID": "A1"}},
                    }
                }
            }),
        )
        .await;

        let client = test_client(&server);
        let summary = client.get_experiment_summary("141885").await.unwrap();

        assert_eq!(summary.summary, json!({"1": {"STUDY_ID": "S1"}}));
        assert_eq!(summary.tech_data, json!({"2": {"LIBRARY_ID": "L1"}}));
        assert_eq!(summary.test_sample, json!({"3": {"SAMPLE_ID": "T1"}}));
        assert_eq!(summary.pool, json!({"4": {"POOL_ID": "P1"}}));
        assert_eq!(summary.hashseq, json!({"5": {"ASSAY_ID": "A1"}}));

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_sample_csv_rows() {
        let server = MockServer::start().await;
        mount_data(
            &server,
            "502",
            "141885",
            json!({
                "141885": {
                    "dataSources": {
                        "502": {
                            "1": {"LIBRARY_ID": "L1", "I7_NAME": "N1"},
                            "2": {"LIBRARY_ID": "L1", "I7_NAME": "N1"},
                        }
                    }
                }
            }),
        )
        .await;

        let client = test_client(&server);
        let rows = client.get_sample_csv_rows("141885").await.unwrap();

        assert_eq!(rows.len(), 1);
        assert!(rows.contains(&SampleCsvRow::new(Some("L1".into()), Some("N1".into()))));
    }

    #[tokio::test]
    async fn test_resolve_data_source_id() {
        let server = MockServer::start().await;
        mount_directory(
            &server,
            json!({
                "dataSources": {
                    "42": {"name": "CLT_POOL_NAMES", "dsID": "42"},
                }
            }),
        )
        .await;

        let client = test_client(&server);
        assert_eq!(
            client.resolve_data_source_id("CLT_POOL_NAMES").await.unwrap(),
            "42"
        );
        assert!(matches!(
            client.resolve_data_source_id("CLT_UNKNOWN").await.unwrap_err(),
            ClientError::DataSourceNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_query_named_form() {
        let server = MockServer::start().await;
        mount_directory(
            &server,
            json!({
                "dataSources": {
                    "42": {"name": "CLT_POOL_NAMES", "dsID": 42},
                    "43": {"name": "CLT_OTHER", "dsID": 43},
                }
            }),
        )
        .await;
        mount_data(
            &server,
            "42",
            "141885",
            json!({
                "141885": {
                    "dataSources": {
                        "42": {
                            "1": {"HASHTAG_ID": "H1"},
                            "2": {"HASHTAG_ID": "H2"},
                        }
                    }
                }
            }),
        )
        .await;

        let client = test_client(&server);

        let mut calls = 0;
        let rows = client
            .query_named_form("CLT_POOL_NAMES", "141885", |rows| {
                calls += 1;
                rows
            })
            .await
            .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(rows, vec![json!({"HASHTAG_ID": "H1"}), json!({"HASHTAG_ID": "H2"})]);
    }

    #[tokio::test]
    async fn test_query_named_form_with_projection() {
        let server = MockServer::start().await;
        mount_directory(
            &server,
            json!({"dataSources": {"7": {"name": "CLT_POOL_NAMES", "dsID": "7"}}}),
        )
        .await;
        mount_data(
            &server,
            "7",
            "99",
            json!({"99": {"dataSources": {"7": {"1": {"HASHTAG_ID": "H9"}, "2": {}}}}}),
        )
        .await;

        let client = test_client(&server);
        let ids = client
            .query_named_form("CLT_POOL_NAMES", "99", shaping::pluck_field("HASHTAG_ID"))
            .await
            .unwrap();
        assert_eq!(ids, vec![json!("H9"), Value::Null]);
    }

    #[tokio::test]
    async fn test_non_200_is_request_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = test_client(&server);

        let err = client.get_experiment_summary("1").await.unwrap_err();
        assert!(
            matches!(&err, ClientError::Request { status, reason } if *status == StatusCode::NOT_FOUND && reason == "Not Found")
        );

        let err = client.get_sample_csv_rows("1").await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

        let err = client.resolve_data_source_id("X").await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));

        let err = client
            .query_named_form("X", "1", |rows| rows)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Request { .. }));
    }

    #[tokio::test]
    async fn test_wrong_credentials_rejected() {
        let server = MockServer::start().await;
        // Only the directory is mounted behind the expected credentials
        mount_directory(&server, json!({"dataSources": {}})).await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let config = test_client(&server).config().clone();
        let client =
            DotmaticsClient::new(config, Credentials::new(USERNAME, format!("{PASSWORD}-x")))
                .unwrap();

        let err = client.fetch_data_source_directory().await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_experiment_id_is_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(data_path("502", "a%2Fb")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"a/b": {"dataSources": {"502": {}}}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server);
        assert!(client.get_sample_csv_rows("a/b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_path_prefix_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/dotmatics/browser/api/projects/{PROJECT_ID}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"dataSources": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_client(&server).config().clone();
        config.server_url = Url::parse(&format!("{}/dotmatics/", server.uri())).unwrap();
        let client = DotmaticsClient::new(config, Credentials::new(USERNAME, PASSWORD)).unwrap();

        client.fetch_data_source_directory().await.unwrap();
    }

    #[tokio::test]
    async fn test_timeout_is_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let mut config = test_client(&server).config().clone();
        config.timeout = Duration::from_millis(200);
        let client = DotmaticsClient::new(config, Credentials::new(USERNAME, PASSWORD)).unwrap();

        match client.fetch_data_source_directory().await.unwrap_err() {
            ClientError::Transport(e) => assert!(e.is_timeout()),
            e => panic!("unexpected error: {e}"),
        }
    }

    #[tokio::test]
    async fn test_no_data_sources_requested() {
        let server = MockServer::start().await;
        let client = test_client(&server);
        assert!(matches!(
            client.fetch_experiment(&[], "1").await.unwrap_err(),
            ClientError::InvalidUrl(_)
        ));
    }
}
