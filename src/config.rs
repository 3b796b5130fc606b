use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::headers::HeaderCollection;
use crate::policies::{
    DEFAULT_MAX_REDIRECTS, DEFAULT_REQUEST_ID_HEADER, HttpLogDetailLevel, HttpLogSink,
    TracingLogSink,
};
use crate::retry::RetryPolicy;

const DEFAULT_USER_AGENT: &str = concat!("reqpipe/", env!("CARGO_PKG_VERSION"));

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientProfile {
    #[default]
    StandardSdk,
    LowLatency,
    HighThroughput,
}

impl ClientProfile {
    pub fn defaults(self) -> ClientOptions {
        let base = ClientOptions {
            timeout: Some(Duration::from_secs(10)),
            request_id_header: Some(DEFAULT_REQUEST_ID_HEADER.to_owned()),
            user_agent: Some(DEFAULT_USER_AGENT.to_owned()),
            default_headers: HeaderCollection::new(),
            follow_redirects: true,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            retry: RetryPolicy::standard(),
            log_level: HttpLogDetailLevel::Basic,
            logged_headers: Vec::new(),
            log_sink: Arc::new(TracingLogSink),
        };
        match self {
            Self::StandardSdk => base,
            Self::LowLatency => ClientOptions {
                timeout: Some(Duration::from_secs(2)),
                follow_redirects: false,
                retry: RetryPolicy::standard()
                    .max_attempts(2)
                    .base_backoff(Duration::from_millis(50))
                    .max_backoff(Duration::from_millis(300)),
                ..base
            },
            Self::HighThroughput => ClientOptions {
                timeout: Some(Duration::from_secs(20)),
                retry: RetryPolicy::standard()
                    .max_attempts(4)
                    .base_backoff(Duration::from_millis(150))
                    .max_backoff(Duration::from_secs(3)),
                log_level: HttpLogDetailLevel::None,
                ..base
            },
        }
    }
}

#[derive(Clone)]
pub struct ClientOptions {
    pub timeout: Option<Duration>,
    pub request_id_header: Option<String>,
    pub user_agent: Option<String>,
    pub default_headers: HeaderCollection,
    pub follow_redirects: bool,
    pub max_redirects: usize,
    pub retry: RetryPolicy,
    pub log_level: HttpLogDetailLevel,
    pub logged_headers: Vec<String>,
    pub log_sink: Arc<dyn HttpLogSink>,
}

impl ClientOptions {
    pub fn new() -> Self {
        ClientProfile::default().defaults()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn request_id_header(mut self, header_name: impl Into<String>) -> Self {
        self.request_id_header = Some(header_name.into());
        self
    }

    pub fn without_request_id(mut self) -> Self {
        self.request_id_header = None;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.set(name, value);
        self
    }

    pub fn follow_redirects(mut self, follow_redirects: bool) -> Self {
        self.follow_redirects = follow_redirects;
        self
    }

    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn log_level(mut self, log_level: HttpLogDetailLevel) -> Self {
        self.log_level = log_level;
        self
    }

    pub fn log_header(mut self, name: impl Into<String>) -> Self {
        self.logged_headers.push(name.into());
        self
    }

    pub fn log_sink(mut self, log_sink: Arc<dyn HttpLogSink>) -> Self {
        self.log_sink = log_sink;
        self
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ClientOptions")
            .field("timeout", &self.timeout)
            .field("request_id_header", &self.request_id_header)
            .field("user_agent", &self.user_agent)
            .field("default_headers", &self.default_headers)
            .field("follow_redirects", &self.follow_redirects)
            .field("max_redirects", &self.max_redirects)
            .field("retry", &self.retry)
            .field("log_level", &self.log_level)
            .field("logged_headers", &self.logged_headers)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSettings {
    pub profile: ClientProfile,
    pub timeout_ms: Option<u64>,
    pub max_attempts: Option<usize>,
    pub base_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub follow_redirects: Option<bool>,
    pub max_redirects: Option<usize>,
    pub user_agent: Option<String>,
    pub request_id_header: Option<String>,
    pub log_level: Option<HttpLogDetailLevel>,
    pub logged_headers: Vec<String>,
    pub default_headers: BTreeMap<String, String>,
}

impl PipelineSettings {
    pub fn into_options(self) -> ClientOptions {
        let mut options = self.profile.defaults();
        if let Some(timeout_ms) = self.timeout_ms {
            options.timeout = Some(Duration::from_millis(timeout_ms));
        }
        if let Some(max_attempts) = self.max_attempts {
            options.retry = options.retry.max_attempts(max_attempts);
        }
        if let Some(base_backoff_ms) = self.base_backoff_ms {
            options.retry = options
                .retry
                .base_backoff(Duration::from_millis(base_backoff_ms));
        }
        if let Some(max_backoff_ms) = self.max_backoff_ms {
            options.retry = options
                .retry
                .max_backoff(Duration::from_millis(max_backoff_ms));
        }
        if let Some(follow_redirects) = self.follow_redirects {
            options.follow_redirects = follow_redirects;
        }
        if let Some(max_redirects) = self.max_redirects {
            options.max_redirects = max_redirects;
        }
        if let Some(user_agent) = self.user_agent {
            options.user_agent = Some(user_agent);
        }
        if let Some(request_id_header) = self.request_id_header {
            options.request_id_header = Some(request_id_header);
        }
        if let Some(log_level) = self.log_level {
            options.log_level = log_level;
        }
        options.logged_headers.extend(self.logged_headers);
        for (name, value) in self.default_headers {
            options.default_headers.set(name, value);
        }
        options
    }
}

impl From<PipelineSettings> for ClientOptions {
    fn from(settings: PipelineSettings) -> Self {
        settings.into_options()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ClientProfile, PipelineSettings};
    use crate::policies::HttpLogDetailLevel;

    #[test]
    fn low_latency_profile_tightens_defaults() {
        let options = ClientProfile::LowLatency.defaults();
        assert_eq!(options.timeout, Some(Duration::from_secs(2)));
        assert!(!options.follow_redirects);
        assert_eq!(options.retry.max_attempts_value(), 2);
    }

    #[test]
    fn settings_override_profile_fields() {
        let settings: PipelineSettings = serde_json::from_str(
            r#"{
                "profile": "high_throughput",
                "timeout_ms": 1500,
                "max_attempts": 6,
                "log_level": "headers",
                "logged_headers": ["x-tenant"],
                "default_headers": {"x-api-version": "2024-01-01"}
            }"#,
        )
        .expect("settings should deserialize");

        let options = settings.into_options();
        assert_eq!(options.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(options.retry.max_attempts_value(), 6);
        assert_eq!(options.log_level, HttpLogDetailLevel::Headers);
        assert_eq!(options.logged_headers, vec!["x-tenant".to_owned()]);
        assert_eq!(
            options.default_headers.get("X-Api-Version").as_deref(),
            Some("2024-01-01")
        );
        assert!(options.follow_redirects);
    }

    #[test]
    fn empty_settings_match_standard_profile() {
        let settings: PipelineSettings =
            serde_json::from_str("{}").expect("empty settings should deserialize");
        let options = settings.into_options();
        let standard = ClientProfile::StandardSdk.defaults();

        assert_eq!(options.timeout, standard.timeout);
        assert_eq!(options.max_redirects, standard.max_redirects);
        assert_eq!(options.user_agent, standard.user_agent);
    }

    #[test]
    fn unknown_settings_are_rejected() {
        let result = serde_json::from_str::<PipelineSettings>(r#"{"retries": 3}"#);
        assert!(result.is_err());
    }
}
