//! Domain and subdomain enumeration probe
//!
//! Phased: apex resolution, certificate-transparency query, wordlist DNS
//! brute force, then per-host analysis. Subdomains surfaced by more than one
//! technique are reconciled through the merge engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::CoreConfig;
use crate::event::EventSink;
use crate::fanout::fan_out;
use crate::merge::{MergeMap, SubdomainFinding};
use crate::module::{
    looks_like_domain, BaseModule, ModuleInfo, ModuleInput, ModuleOption, ModuleState,
    ModuleStatus, ProbeModule,
};
use crate::probes::wordlists::subdomain_labels;
use crate::transport::{resolve_host, HttpClient};
use crate::{ReconError, Result};

/// Structured result payload of a domain enumeration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEnumResult {
    pub domain: String,
    pub apex_ips: Vec<String>,
    pub subdomains: Vec<SubdomainFinding>,
    pub total_found: usize,
    pub scan_time_ms: u64,
}

/// Wordlist + certificate-transparency subdomain discovery
pub struct DomainEnumModule {
    base: BaseModule,
    user_agent: String,
}

impl DomainEnumModule {
    pub fn new(config: &CoreConfig) -> Self {
        let info = ModuleInfo {
            name: "domain_enum".to_string(),
            category: "passive_osint".to_string(),
            description: "Domain and subdomain enumeration with DNS and CT-log discovery"
                .to_string(),
            version: "1.0.0".to_string(),
            author: "reconx".to_string(),
            tags: vec![
                "domain".to_string(),
                "subdomain".to_string(),
                "dns".to_string(),
                "passive".to_string(),
            ],
            options: vec![
                ModuleOption::bool("use_wordlist", "Wordlist-based DNS brute force", true),
                ModuleOption::bool("use_crt_sh", "Query certificate transparency logs", true),
                ModuleOption::int("threads", "Concurrent DNS lookups", 50),
                ModuleOption::int("dns_timeout", "DNS query timeout in seconds", 5),
            ],
            requirements: vec!["network".to_string()],
        };

        Self {
            base: BaseModule::new(info),
            user_agent: config.user_agent.clone(),
        }
    }

    /// Pull `%.domain` certificates from crt.sh and turn SAN entries into
    /// candidate findings
    async fn crt_sh_findings(&self, client: &HttpClient, domain: &str) -> Vec<SubdomainFinding> {
        let url = format!("https://crt.sh/?q=%25.{}&output=json", domain);
        let Some(Value::Array(entries)) = client.get_json(&url).await else {
            return Vec::new();
        };

        let mut findings = Vec::new();
        for entry in entries {
            let names = entry
                .get("name_value")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            for name in names.lines() {
                let name = name.trim().trim_start_matches("*.").to_lowercase();
                if within_domain(&name, domain) && looks_like_domain(&name) {
                    findings.push(SubdomainFinding::new(&name, "crt.sh", 70));
                }
            }
        }
        findings
    }
}

/// True when `name` is `domain` itself or one of its subdomains; a plain
/// suffix check would also admit lookalikes such as `notexample.com`.
fn within_domain(name: &str, domain: &str) -> bool {
    name == domain || name.ends_with(&format!(".{}", domain))
}

#[async_trait]
impl ProbeModule for DomainEnumModule {
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
        let threads = opts.int("threads").max(1) as usize;
        let dns_timeout = Duration::from_secs(opts.int("dns_timeout").max(1) as u64);

        // Phase 1: apex resolution doubles as the setup check.
        self.base.set_progress(0.05, "resolving apex domain");
        sink.progress(0.05, "resolving apex domain");
        let Some(apex_ips) = resolve_host(&domain, dns_timeout).await else {
            let e = ReconError::SetupError(format!("domain '{}' does not resolve", domain));
            self.base.finish_run(ModuleState::Error, &e.to_string());
            return Err(e);
        };
        let apex_ips: Vec<String> = apex_ips.iter().map(|ip| ip.to_string()).collect();

        let mut merged: MergeMap<SubdomainFinding> = MergeMap::new();

        // Phase 2: certificate transparency.
        if opts.bool("use_crt_sh") && !token.is_cancelled() {
            self.base.set_progress(0.15, "querying certificate transparency logs");
            sink.progress(0.15, "querying certificate transparency logs");

            let client = match HttpClient::new(Duration::from_secs(15), &self.user_agent) {
                Ok(client) => client,
                Err(e) => {
                    self.base.finish_run(ModuleState::Error, &e.to_string());
                    return Err(e);
                }
            };
            let ct_findings = self.crt_sh_findings(&client, &domain).await;
            log::debug!("domain_enum: {} CT candidates for {}", ct_findings.len(), domain);
            merged.merge_all(ct_findings);
        }

        // Phase 3: wordlist DNS brute force.
        if opts.bool("use_wordlist") && !token.is_cancelled() {
            self.base.set_progress(0.3, "brute forcing subdomains");
            sink.progress(0.3, "brute forcing subdomains");

            let candidates: Vec<String> = subdomain_labels()
                .iter()
                .map(|label| format!("{}.{}", label, domain))
                .collect();

            let check_sink = sink.clone();
            let resolved = fan_out(
                candidates,
                threads,
                &token,
                |host| {
                    let sink = check_sink.clone();
                    async move {
                        let ips = resolve_host(&host, dns_timeout).await?;
                        let mut finding = SubdomainFinding::new(&host, "wordlist", 90);
                        finding.ips = ips.iter().map(|ip| ip.to_string()).collect();
                        finding.resolved = true;
                        sink.data(
                            serde_json::json!({ "type": "subdomain", "subdomain": finding }),
                            HashMap::new(),
                        );
                        Some(finding)
                    }
                },
                |done, total| {
                    let fraction = 0.3 + 0.4 * done as f64 / total as f64;
                    let message = format!("checked {}/{} labels", done, total);
                    self.base.set_progress(fraction, &message);
                    sink.progress(fraction, &message);
                },
            )
            .await;
            merged.merge_all(resolved);
        }

        // Phase 4: resolve hosts only the CT logs knew about.
        let pending: Vec<String> = merged
            .iter()
            .filter(|f| !f.resolved)
            .map(|f| f.host.clone())
            .collect();

        if !pending.is_empty() && !token.is_cancelled() {
            self.base.set_progress(0.7, "analyzing discovered subdomains");
            sink.progress(0.7, "analyzing discovered subdomains");

            let analyzed = fan_out(
                pending,
                threads,
                &token,
                |host| async move {
                    let ips = resolve_host(&host, dns_timeout).await?;
                    let mut finding = SubdomainFinding::new(&host, "dns", 95);
                    finding.ips = ips.iter().map(|ip| ip.to_string()).collect();
                    finding.resolved = true;
                    Some(finding)
                },
                |done, total| {
                    let fraction = 0.7 + 0.25 * done as f64 / total as f64;
                    let message = format!("analyzed {}/{} subdomains", done, total);
                    self.base.set_progress(fraction, &message);
                    sink.progress(fraction, &message);
                },
            )
            .await;
            merged.merge_all(analyzed);
        }

        let subdomains = merged.records(None);
        let result = DomainEnumResult {
            domain: domain.clone(),
            apex_ips,
            total_found: subdomains.len(),
            subdomains,
            scan_time_ms: started.elapsed().as_millis() as u64,
        };
        let payload = serde_json::to_value(&result)
            .map_err(|e| ReconError::ParseError(e.to_string()))?;

        if token.is_cancelled() {
            self.base.finish_run(
                ModuleState::Stopped,
                &format!("stopped with {} subdomains found", result.total_found),
            );
            return Ok(payload);
        }

        let message = format!("enumeration completed: {} subdomains", result.total_found);
        self.base.finish_run(ModuleState::Completed, &message);

        let mut metadata = HashMap::new();
        metadata.insert("total_subdomains".to_string(), Value::from(result.total_found));
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
