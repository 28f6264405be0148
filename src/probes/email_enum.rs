//! Email address discovery probe
//!
//! Combines website crawling, the Hunter.io API, and certificate-transparency
//! text mining. The same address surfaced by several techniques is reconciled
//! through the merge engine, keeping every source and the best confidence.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::CoreConfig;
use crate::event::EventSink;
use crate::merge::{EmailFinding, MergeMap};
use crate::module::{
    looks_like_domain, BaseModule, ModuleInfo, ModuleInput, ModuleOption, ModuleState,
    ModuleStatus, ProbeModule,
};
use crate::probes::wordlists::email_crawl_pages;
use crate::transport::HttpClient;
use crate::{ReconError, Result};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
        .unwrap_or_else(|e| panic!("invalid email pattern: {}", e))
});

/// Structured result payload of an email discovery run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailEnumResult {
    pub domain: String,
    pub emails: Vec<EmailFinding>,
    pub total_found: usize,
    pub sources_used: Vec<String>,
    pub scan_time_ms: u64,
}

/// Multi-source email harvester
pub struct EmailEnumModule {
    base: BaseModule,
    user_agent: String,
    max_results: usize,
}

impl EmailEnumModule {
    pub fn new(config: &CoreConfig) -> Self {
        let info = ModuleInfo {
            name: "email_enum".to_string(),
            category: "passive_osint".to_string(),
            description: "Email discovery via website crawl, Hunter.io and CT-log mining"
                .to_string(),
            version: "1.0.0".to_string(),
            author: "reconx".to_string(),
            tags: vec![
                "email".to_string(),
                "osint".to_string(),
                "harvest".to_string(),
                "passive".to_string(),
            ],
            options: vec![
                ModuleOption::bool("use_website_crawl", "Crawl the target website", true),
                ModuleOption::string(
                    "hunter_io_api_key",
                    "Hunter.io API key; the source is skipped when empty",
                    "",
                ),
                ModuleOption::bool(
                    "deep_search",
                    "Mine certificate transparency logs for addresses",
                    false,
                ),
                ModuleOption::int("timeout", "Request timeout in seconds", 10),
            ],
            requirements: vec!["network".to_string()],
        };

        Self {
            base: BaseModule::new(info),
            user_agent: config.user_agent.clone(),
            max_results: config.max_results,
        }
    }

    /// Pull addresses out of the common pages of the target's own site
    async fn crawl_website(&self, client: &HttpClient, domain: &str) -> Vec<EmailFinding> {
        let mut findings = Vec::new();
        for page in email_crawl_pages() {
            let url = format!("https://{}{}", domain, page);
            let Some(response) = client.get(&url).await else {
                continue;
            };
            if response.status != 200 {
                continue;
            }
            for email in extract_emails(&response.body, domain) {
                findings.push(EmailFinding::new(&email, "website_crawl", 85));
            }
        }
        findings
    }

    /// Query the Hunter.io domain-search API
    async fn hunter_io(&self, client: &HttpClient, domain: &str, api_key: &str) -> Vec<EmailFinding> {
        let url = format!(
            "https://api.hunter.io/v2/domain-search?domain={}&api_key={}",
            domain, api_key
        );
        let Some(body) = client.get_json(&url).await else {
            log::warn!("email_enum: hunter.io query failed for {}", domain);
            return Vec::new();
        };

        let Some(entries) = body
            .get("data")
            .and_then(|d| d.get("emails"))
            .and_then(|e| e.as_array())
        else {
            return Vec::new();
        };

        let mut findings = Vec::new();
        for entry in entries {
            let Some(email) = entry.get("value").and_then(|v| v.as_str()) else {
                continue;
            };
            let confidence = entry
                .get("confidence")
                .and_then(|c| c.as_u64())
                .unwrap_or(75)
                .min(100) as u8;

            let mut finding = EmailFinding::new(email, "hunter.io", confidence);
            let text = |key: &str| {
                entry
                    .get(key)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            let first = text("first_name");
            let last = text("last_name");
            if !first.is_empty() || !last.is_empty() {
                finding.name = format!("{} {}", first, last).trim().to_string();
            }
            finding.position = text("position");
            finding.department = text("department");
            findings.push(finding);
        }
        findings
    }

    /// Mine certificate-transparency records for addresses; a noisy source,
    /// so findings carry low confidence
    async fn ct_log_mining(&self, client: &HttpClient, domain: &str) -> Vec<EmailFinding> {
        let url = format!("https://crt.sh/?q={}&output=json", domain);
        let Some(Value::Array(entries)) = client.get_json(&url).await else {
            return Vec::new();
        };

        let mut findings = Vec::new();
        for entry in entries {
            let text = serde_json::to_string(&entry).unwrap_or_default();
            for email in extract_emails(&text, domain) {
                findings.push(EmailFinding::new(&email, "cert_transparency", 50));
            }
        }
        findings
    }
}

/// Every syntactically plausible address in `text` belonging to `domain`
fn extract_emails(text: &str, domain: &str) -> Vec<String> {
    let suffix = format!("@{}", domain.to_lowercase());
    EMAIL_RE
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|email| email.ends_with(&suffix))
        .collect()
}

#[async_trait]
impl ProbeModule for EmailEnumModule {
    fn info(&self) -> ModuleInfo {
        self.base.info()
    }

    fn validate(&self, input: &ModuleInput) -> Result<()> {
        self.base.validate_input(input)?;
        if input.target.parse::<std::net::IpAddr>().is_ok() || !looks_like_domain(&input.target) {
            return Err(ReconError::InvalidTarget(format!(
                "'{}' is not a valid domain",
                input.target
            )));
        }
        Ok(())
    }

    async fn execute(
        &self,
        cancel: CancellationToken,
        input: ModuleInput,
        sink: EventSink,
    ) -> Result<Value> {
        let started = Instant::now();
        let token = self.base.begin_run(&cancel);

        let opts = match self.base.info_ref().resolve_options(&input.options) {
            Ok(opts) => opts,
            Err(e) => {
                self.base.finish_run(ModuleState::Error, &e.to_string());
                return Err(e);
            }
        };

        let domain = input.target.trim().trim_end_matches('.').to_lowercase();
        let request_timeout = input
            .timeout
            .unwrap_or_else(|| Duration::from_secs(opts.int("timeout").max(1) as u64));
        let api_key = opts.str("hunter_io_api_key");

        let client = match HttpClient::new(request_timeout, &self.user_agent) {
            Ok(client) => client,
            Err(e) => {
                self.base.finish_run(ModuleState::Error, &e.to_string());
                return Err(e);
            }
        };

        let mut merged: MergeMap<EmailFinding> = MergeMap::new();
        let mut sources_used = Vec::new();

        // Phase 1: crawl the target's own site.
        if opts.bool("use_website_crawl") && !token.is_cancelled() {
            self.base.set_progress(0.1, "crawling website");
            sink.progress(0.1, "crawling website");

            let findings = self.crawl_website(&client, &domain).await;
            log::debug!("email_enum: {} crawl hits for {}", findings.len(), domain);
            if !findings.is_empty() {
                sink.data(
                    serde_json::json!({ "type": "emails", "source": "website_crawl", "count": findings.len() }),
                    HashMap::new(),
                );
            }
            sources_used.push("website_crawl".to_string());
            merged.merge_all(findings);
        }

        // Phase 2: Hunter.io, skipped without a key.
        if !api_key.is_empty() && !token.is_cancelled() {
            self.base.set_progress(0.45, "querying hunter.io");
            sink.progress(0.45, "querying hunter.io");

            let findings = self.hunter_io(&client, &domain, &api_key).await;
            if !findings.is_empty() {
                sink.data(
                    serde_json::json!({ "type": "emails", "source": "hunter.io", "count": findings.len() }),
                    HashMap::new(),
                );
            }
            sources_used.push("hunter.io".to_string());
            merged.merge_all(findings);
        } else if api_key.is_empty() {
            log::debug!("email_enum: no hunter.io key, source skipped");
        }

        // Phase 3: CT-log text mining.
        if opts.bool("deep_search") && !token.is_cancelled() {
            self.base.set_progress(0.7, "mining certificate transparency logs");
            sink.progress(0.7, "mining certificate transparency logs");

            let findings = self.ct_log_mining(&client, &domain).await;
            if !findings.is_empty() {
                sink.data(
                    serde_json::json!({ "type": "emails", "source": "cert_transparency", "count": findings.len() }),
                    HashMap::new(),
                );
            }
            sources_used.push("cert_transparency".to_string());
            merged.merge_all(findings);
        }

        let total_merged = merged.len();
        let emails = merged.records(Some(self.max_results));
        if emails.len() < total_merged {
            log::info!(
                "email_enum: {} of {} merged addresses emitted (cap {})",
                emails.len(),
                total_merged,
                self.max_results
            );
        }

        let result = EmailEnumResult {
            domain: domain.clone(),
            total_found: emails.len(),
            emails,
            sources_used,
            scan_time_ms: started.elapsed().as_millis() as u64,
        };
        let payload = serde_json::to_value(&result)
            .map_err(|e| ReconError::ParseError(e.to_string()))?;

        if token.is_cancelled() {
            self.base.finish_run(
                ModuleState::Stopped,
                &format!("stopped with {} emails found", result.total_found),
            );
            return Ok(payload);
        }

        let message = format!("discovery completed: {} emails", result.total_found);
        self.base.finish_run(ModuleState::Completed, &message);

        let mut metadata = HashMap::new();
        metadata.insert("total_emails".to_string(), Value::from(result.total_found));
        metadata.insert(
            "sources_used".to_string(),
            Value::from(result.sources_used.clone()),
        );
        sink.complete(payload.clone(), metadata);

        Ok(payload)
    }

    fn stop(&self) {
        self.base.request_stop();
    }

    fn status(&self) -> ModuleStatus {
        self.base.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_filters_foreign_domains() {
        let text = "contact alice@example.com or bob@other.org, ALICE@EXAMPLE.COM too";
        let emails = extract_emails(text, "example.com");
        assert_eq!(emails, vec!["alice@example.com", "alice@example.com"]);
    }

    #[test]
    fn test_extract_ignores_malformed() {
        let emails = extract_emails("not-an-email@, @example.com, a@b", "example.com");
        assert!(emails.is_empty());
    }

    #[test]
    fn test_validate_rejects_non_domains() {
        let module = EmailEnumModule::new(&CoreConfig::default());
        assert!(module
            .validate(&ModuleInput::new("example.com", "s1"))
            .is_ok());
        assert!(module.validate(&ModuleInput::new("10.0.0.5", "s1")).is_err());
        assert!(module
            .validate(&ModuleInput::new("not a domain", "s1"))
            .is_err());
    }
}
