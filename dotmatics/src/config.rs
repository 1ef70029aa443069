use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const USERNAME_VAR: &str = "DOTMATICS_USERNAME";
pub const PASSWORD_VAR: &str = "DOTMATICS_PASSWORD";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("malformed config line {line}: expected key=value")]
    MalformedLine { line: usize },
    #[error("missing config key: {0}")]
    MissingKey(String),
    #[error("config value for {0} is empty")]
    EmptyValue(String),
    #[error("config has no section for environment {0}")]
    MissingEnvironment(Environment),
    #[error("invalid server url {url}: {reason}")]
    InvalidServerUrl { url: String, reason: String },
    #[error("invalid timeout {0}: expected a whole number of seconds")]
    InvalidTimeout(String),
    #[error("unknown environment {0}, expected prod or test")]
    UnknownEnvironment(String),
    #[error("environment variable {0} is not set")]
    MissingCredential(&'static str),
}

/// Deployment target selecting the server and data source ids.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Prod,
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Prod => "prod",
            Environment::Test => "test",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" => Ok(Environment::Prod),
            "test" => Ok(Environment::Test),
            _ => Err(ConfigError::UnknownEnvironment(s.to_string())),
        }
    }
}

/// Username and password for HTTP basic auth.
///
/// The password is never printed, `Debug` redacts it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Reads `DOTMATICS_USERNAME` and `DOTMATICS_PASSWORD` from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let username = lookup(USERNAME_VAR).ok_or(ConfigError::MissingCredential(USERNAME_VAR))?;
        let password = lookup(PASSWORD_VAR).ok_or(ConfigError::MissingCredential(PASSWORD_VAR))?;
        Ok(Credentials::new(username, password))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Internal ids of the data sources that make up a HashSeq experiment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataSourceIds {
    pub studies_summary_hashseq: String,
    pub clt_hash_bio_tech: String,
    pub test_sample: String,
    pub clt_pool: String,
    pub clt_assay_hashseq: String,
}

impl DataSourceIds {
    /// All ids, in the order they are requested from the server.
    pub fn all(&self) -> [&str; 5] {
        [
            &self.studies_summary_hashseq,
            &self.clt_hash_bio_tech,
            &self.test_sample,
            &self.clt_pool,
            &self.clt_assay_hashseq,
        ]
    }
}

/// Fully resolved settings for one environment. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub environment: Environment,
    pub project_id: String,
    pub server_url: Url,
    pub data_sources: DataSourceIds,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn load(path: &Path, environment: Environment) -> Result<Self, ConfigError> {
        ConfigFile::from_file(path)?.resolve(environment)
    }
}

/// Config values may be written as bare numbers in YAML.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(u64),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Number(n) => n.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
struct Section {
    server: Option<Scalar>,
    studies_summary_hash_seq: Option<Scalar>,
    clt_hash_bio_tech: Option<Scalar>,
    test_sample: Option<Scalar>,
    clt_pool: Option<Scalar>,
    clt_assay_hash_seq: Option<Scalar>,
}

// Field names as used by the flat format, after the `{env}_` prefix.
const FLAT_DATA_SOURCE_KEYS: [&str; 5] = [
    "StudiesSummaryHashSeq",
    "CltHashBioTech",
    "TestSample",
    "CltPool",
    "CltAssayHashSeq",
];

impl Section {
    fn from_flat(entries: &HashMap<String, String>, env: Environment) -> Option<Self> {
        let get = |key: String| entries.get(&key).cloned().map(Scalar::Text);
        let [summary, bio_tech, test_sample, pool, assay] =
            FLAT_DATA_SOURCE_KEYS.map(|k| get(format!("{env}_{k}")));

        let section = Section {
            server: get(format!("{env}Server")),
            studies_summary_hash_seq: summary,
            clt_hash_bio_tech: bio_tech,
            test_sample,
            clt_pool: pool,
            clt_assay_hash_seq: assay,
        };

        (section != Section::default()).then_some(section)
    }
}

/// The config document as read from disk, before an environment is selected.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(rename = "projectID")]
    project_id: Option<Scalar>,
    #[serde(rename = "timeoutSecs")]
    timeout_secs: Option<Scalar>,
    prod: Option<Section>,
    test: Option<Section>,
}

impl ConfigFile {
    /// Loads `.yaml`/`.yml` files as nested YAML and anything else as flat `key=value` lines.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents),
            _ => Self::from_flat_str(&contents),
        }
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_flat_str(s: &str) -> Result<Self, ConfigError> {
        let mut entries = HashMap::new();

        for (idx, raw) in s.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or(ConfigError::MalformedLine { line: idx + 1 })?;
            entries.insert(key.trim().to_string(), value.trim().to_string());
        }

        Ok(ConfigFile {
            project_id: entries.get("projectID").cloned().map(Scalar::Text),
            timeout_secs: entries.get("timeoutSecs").cloned().map(Scalar::Text),
            prod: Section::from_flat(&entries, Environment::Prod),
            test: Section::from_flat(&entries, Environment::Test),
        })
    }

    /// Selects the section for `environment` and validates every value in it.
    pub fn resolve(&self, environment: Environment) -> Result<ClientConfig, ConfigError> {
        let section = match environment {
            Environment::Prod => self.prod.as_ref(),
            Environment::Test => self.test.as_ref(),
        }
        .ok_or(ConfigError::MissingEnvironment(environment))?;

        let key = |name: &str| format!("{environment}.{name}");

        let project_id = required(&self.project_id, "projectID".to_string())?;
        let server = required(&section.server, key("server"))?;
        let server_url = parse_server_url(&server)?;

        let data_sources = DataSourceIds {
            studies_summary_hashseq: required(
                &section.studies_summary_hash_seq,
                key("studiesSummaryHashSeq"),
            )?,
            clt_hash_bio_tech: required(&section.clt_hash_bio_tech, key("cltHashBioTech"))?,
            test_sample: required(&section.test_sample, key("testSample"))?,
            clt_pool: required(&section.clt_pool, key("cltPool"))?,
            clt_assay_hashseq: required(&section.clt_assay_hash_seq, key("cltAssayHashSeq"))?,
        };

        let timeout = match &self.timeout_secs {
            None => DEFAULT_TIMEOUT,
            Some(Scalar::Number(secs)) => Duration::from_secs(*secs),
            Some(Scalar::Text(s)) => s
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidTimeout(s.clone()))?,
        };
        if timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout("0".to_string()));
        }

        Ok(ClientConfig {
            environment,
            project_id,
            server_url,
            data_sources,
            timeout,
        })
    }
}

fn required(value: &Option<Scalar>, key: String) -> Result<String, ConfigError> {
    let value = value
        .clone()
        .ok_or_else(|| ConfigError::MissingKey(key.clone()))?
        .into_string();

    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyValue(key));
    }
    Ok(trimmed.to_string())
}

fn parse_server_url(server: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(server).map_err(|e| ConfigError::InvalidServerUrl {
        url: server.to_string(),
        reason: e.to_string(),
    })?;

    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidServerUrl {
            url: server.to_string(),
            reason: "expected an http(s) base url".to_string(),
        });
    }
    Ok(url)
}
