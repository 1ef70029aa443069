use crate::client::DotmaticsClient;
use crate::config::{ClientConfig, Credentials, DataSourceIds, Environment};
use serde_json::Value;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{basic_auth, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const USERNAME: &str = "hashseq-bot";
pub const PASSWORD: &str = "s3cret";
pub const PROJECT_ID: &str = "2001";

pub fn test_config(server_uri: &str) -> ClientConfig {
    ClientConfig {
        environment: Environment::Test,
        project_id: PROJECT_ID.to_string(),
        server_url: Url::parse(server_uri).unwrap(),
        data_sources: DataSourceIds {
            studies_summary_hashseq: "501".into(),
            clt_hash_bio_tech: "502".into(),
            test_sample: "503".into(),
            clt_pool: "504".into(),
            clt_assay_hashseq: "505".into(),
        },
        timeout: Duration::from_secs(5),
    }
}

pub fn test_client(server: &MockServer) -> DotmaticsClient {
    DotmaticsClient::new(
        test_config(&server.uri()),
        Credentials::new(USERNAME, PASSWORD),
    )
    .unwrap()
}

pub fn data_path(data_source_ids: &str, experiment_id: &str) -> String {
    format!("/browser/api/data/{USERNAME}/{PROJECT_ID}/{data_source_ids}/{experiment_id}")
}

/// Serves `body` for exactly one authenticated data request.
pub async fn mount_data(
    server: &MockServer,
    data_source_ids: &str,
    experiment_id: &str,
    body: Value,
) {
    Mock::given(method("GET"))
        .and(path(data_path(data_source_ids, experiment_id)))
        .and(query_param("limit", "0"))
        .and(basic_auth(USERNAME, PASSWORD))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

/// Serves the project's data source directory to authenticated requests.
pub async fn mount_directory(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/browser/api/projects/{PROJECT_ID}")))
        .and(basic_auth(USERNAME, PASSWORD))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}
