//! Web directory and file enumeration probe

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::CoreConfig;
use crate::event::EventSink;
use crate::fanout::fan_out;
use crate::module::{
    looks_like_domain, BaseModule, ModuleInfo, ModuleInput, ModuleOption, ModuleState,
    ModuleStatus, ProbeModule,
};
use crate::probes::wordlists::{web_paths_common, web_paths_extensive, web_paths_quick};
use crate::transport::HttpClient;
use crate::{ReconError, Result};

/// One discovered path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathInfo {
    pub path: String,
    pub status_code: u16,
    pub size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    pub response_time_ms: u64,
}

/// Structured result payload of a web enumeration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebEnumResult {
    pub target: String,
    pub base_url: String,
    pub found_paths: Vec<PathInfo>,
    pub total_tested: usize,
    pub scan_time_ms: u64,
}

/// HTTP path brute forcer with status-code filtering
pub struct WebEnumModule {
    base: BaseModule,
    user_agent: String,
}

impl WebEnumModule {
    pub fn new(config: &CoreConfig) -> Self {
        let info = ModuleInfo {
            name: "web_enum".to_string(),
            category: "active_recon".to_string(),
            description: "Web directory and file enumeration over HTTP".to_string(),
            version: "1.0.0".to_string(),
            author: "reconx".to_string(),
            tags: vec![
                "web".to_string(),
                "directory".to_string(),
                "http".to_string(),
                "active".to_string(),
            ],
            options: vec![
                ModuleOption::choice(
                    "wordlist",
                    "Path list to probe",
                    "common",
                    &["quick", "common", "extensive"],
                ),
                ModuleOption::string(
                    "extensions",
                    "Extra file extensions to append (e.g. php,html,bak)",
                    "",
                ),
                ModuleOption::string(
                    "status_codes",
                    "Status codes treated as hits",
                    "200,204,301,302,307,401,403",
                ),
                ModuleOption::int("threads", "Concurrent requests", 50),
                ModuleOption::int("timeout", "Request timeout in seconds", 10),
            ],
            requirements: vec!["network".to_string()],
        };

        Self {
            base: BaseModule::new(info),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Normalize a target into a base URL, defaulting to https
fn base_url(target: &str) -> String {
    let target = target.trim().trim_end_matches('/');
    if target.starts_with("http://") || target.starts_with("https://") {
        target.to_string()
    } else {
        format!("https://{}", target)
    }
}

fn parse_status_codes(spec: &str) -> HashSet<u16> {
    spec.split(',')
        .filter_map(|code| code.trim().parse::<u16>().ok())
        .collect()
}

/// Cross the wordlist with requested extensions
fn generate_paths(wordlist: Vec<&'static str>, extensions: &str) -> Vec<String> {
    let extensions: Vec<&str> = extensions
        .split(',')
        .map(|e| e.trim().trim_start_matches('.'))
        .filter(|e| !e.is_empty())
        .collect();

    let mut paths = Vec::new();
    for word in wordlist {
        paths.push(word.to_string());
        for ext in &extensions {
            if !word.contains('.') {
                paths.push(format!("{}.{}", word, ext));
            }
        }
    }
    paths
}

#[async_trait]
impl ProbeModule for WebEnumModule {
    fn info(&self) -> ModuleInfo {
        self.base.info()
    }

    fn validate(&self, input: &ModuleInput) -> Result<()> {
        self.base.validate_input(input)?;

        let target = input.target.trim();
        let host = target
            .strip_prefix("https://")
            .or_else(|| target.strip_prefix("http://"))
            .unwrap_or(target);
        let host = host.split('/').next().unwrap_or_default();
        let host = host.split(':').next().unwrap_or_default();

        if host.parse::<std::net::IpAddr>().is_err()
            && !looks_like_domain(host)
            && !host.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(ReconError::InvalidTarget(format!(
                "'{}' is not a valid URL or host",
                input.target
            )));
        }
        if host.is_empty() {
            return Err(ReconError::InvalidTarget("empty host".to_string()));
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

        let threads = opts.int("threads").max(1) as usize;
        let request_timeout = input
            .timeout
            .unwrap_or_else(|| Duration::from_secs(opts.int("timeout").max(1) as u64));
        let accepted = parse_status_codes(&opts.str("status_codes"));
        let wordlist = match opts.str("wordlist").as_str() {
            "quick" => web_paths_quick(),
            "extensive" => web_paths_extensive(),
            _ => web_paths_common(),
        };
        let paths = generate_paths(wordlist, &opts.str("extensions"));
        let base = base_url(&input.target);

        let client = match HttpClient::new(request_timeout, &self.user_agent) {
            Ok(client) => client,
            Err(e) => {
                self.base.finish_run(ModuleState::Error, &e.to_string());
                return Err(e);
            }
        };

        // Setup phase: the site root must answer at all.
        self.base.set_progress(0.02, "checking target reachability");
        sink.progress(0.02, "checking target reachability");
        if client.get(&format!("{}/", base)).await.is_none() {
            let e = ReconError::SetupError(format!("target '{}' is unreachable", base));
            self.base.finish_run(ModuleState::Error, &e.to_string());
            return Err(e);
        }

        let total = paths.len();
        sink.progress(0.05, &format!("testing {} paths against {}", total, base));
        log::debug!("web_enum: {} path candidates on {}", total, base);

        let check_sink = sink.clone();
        let base_ref = &base;
        let client_ref = &client;
        let accepted_ref = &accepted;
        let mut found_paths = fan_out(
            paths,
            threads,
            &token,
            |path| {
                let sink = check_sink.clone();
                async move {
                    let url = format!("{}/{}", base_ref, path);
                    let probe_start = Instant::now();
                    let response = client_ref.get(&url).await?;
                    if !accepted_ref.contains(&response.status) {
                        return None;
                    }

                    let info = PathInfo {
                        path: format!("/{}", path),
                        status_code: response.status,
                        size: response.content_length,
                        content_type: response.content_type,
                        response_time_ms: probe_start.elapsed().as_millis() as u64,
                    };
                    sink.data(
                        serde_json::json!({ "type": "found_path", "path": info }),
                        HashMap::new(),
                    );
                    Some(info)
                }
            },
            |done, total| {
                let fraction = 0.05 + 0.9 * done as f64 / total as f64;
                let message = format!("tested {}/{} paths", done, total);
                self.base.set_progress(fraction, &message);
                sink.progress(fraction, &message);
            },
        )
        .await;

        found_paths.sort_by(|a, b| a.path.cmp(&b.path));
        let result = WebEnumResult {
            target: input.target.clone(),
            base_url: base,
            found_paths,
            total_tested: total,
            scan_time_ms: started.elapsed().as_millis() as u64,
        };
        let payload = serde_json::to_value(&result)
            .map_err(|e| ReconError::ParseError(e.to_string()))?;

        if token.is_cancelled() {
            self.base.finish_run(
                ModuleState::Stopped,
                &format!("stopped with {} paths found", result.found_paths.len()),
            );
            return Ok(payload);
        }

        let message = format!("enumeration completed: {} paths found", result.found_paths.len());
        self.base.finish_run(ModuleState::Completed, &message);

        let mut metadata = HashMap::new();
        metadata.insert("found_paths".to_string(), Value::from(result.found_paths.len()));
        metadata.insert("total_tested".to_string(), Value::from(result.total_tested));
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
