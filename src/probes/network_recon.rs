//! Network and IP intelligence probe

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::CoreConfig;
use crate::event::EventSink;
use crate::fanout::fan_out;
use crate::module::{
    looks_like_domain, BaseModule, ModuleInfo, ModuleInput, ModuleOption, ModuleState,
    ModuleStatus, ProbeModule,
};
use crate::probes::service_names::service_name;
use crate::transport::{resolve_host, HttpClient};
use crate::{ReconError, Result};

/// Geolocation and ownership details for an address
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IpIntel {
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub isp: String,
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub asn: String,
}

/// One open port seen during the quick sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepPort {
    pub port: u16,
    pub service: String,
}

/// Reputation summary from VirusTotal
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReputationIntel {
    pub malicious: u64,
    pub suspicious: u64,
    pub harmless: u64,
}

/// Structured result payload of a network reconnaissance run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkReconResult {
    pub target: String,
    pub ip: String,
    pub all_ips: Vec<String>,
    pub intel: IpIntel,
    pub open_ports: Vec<SweepPort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reputation: Option<ReputationIntel>,
    pub scan_time_ms: u64,
}

/// IP geolocation, ownership lookup, quick port sweep and optional
/// reputation check
pub struct NetworkReconModule {
    base: BaseModule,
    user_agent: String,
}

impl NetworkReconModule {
    pub fn new(config: &CoreConfig) -> Self {
        let info = ModuleInfo {
            name: "network_recon".to_string(),
            category: "network_intel".to_string(),
            description: "IP geolocation, ASN lookup, quick port sweep and reputation check"
                .to_string(),
            version: "1.0.0".to_string(),
            author: "reconx".to_string(),
            tags: vec![
                "network".to_string(),
                "ip".to_string(),
                "geolocation".to_string(),
                "asn".to_string(),
            ],
            options: vec![
                ModuleOption::bool("geolocation", "Query geolocation and ASN data", true),
                ModuleOption::bool("port_sweep", "Sweep a small set of common ports", true),
                ModuleOption::string(
                    "virustotal_api_key",
                    "VirusTotal API key; the reputation check is skipped when empty",
                    "",
                ),
                ModuleOption::int("timeout", "Per-request timeout in seconds", 5),
            ],
            requirements: vec!["network".to_string()],
        };

        Self {
            base: BaseModule::new(info),
            user_agent: config.user_agent.clone(),
        }
    }

    /// ip-api.com free endpoint; no key required
    async fn geolocate(&self, client: &HttpClient, ip: IpAddr) -> IpIntel {
        let url = format!(
            "http://ip-api.com/json/{}?fields=status,country,regionName,city,isp,org,as",
            ip
        );
        let Some(body) = client.get_json(&url).await else {
            log::warn!("network_recon: geolocation query failed for {}", ip);
            return IpIntel::default();
        };
        if body.get("status").and_then(|s| s.as_str()) != Some("success") {
            return IpIntel::default();
        }

        let text = |key: &str| {
            body.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        IpIntel {
            country: text("country"),
            region: text("regionName"),
            city: text("city"),
            isp: text("isp"),
            org: text("org"),
            asn: text("as"),
        }
    }

    /// VirusTotal v3 IP report; absent key means the source is skipped
    async fn reputation(
        &self,
        ip: IpAddr,
        api_key: &str,
        request_timeout: Duration,
    ) -> Option<ReputationIntel> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(self.user_agent.clone())
            .build()
            .ok()?;

        let url = format!("https://www.virustotal.com/api/v3/ip_addresses/{}", ip);
        let response = client
            .get(&url)
            .header("x-apikey", api_key)
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            log::warn!(
                "network_recon: virustotal returned {} for {}",
                response.status(),
                ip
            );
            return None;
        }
        let body: Value = response.json().await.ok()?;

        let stats = body
            .get("data")?
            .get("attributes")?
            .get("last_analysis_stats")?;
        let count = |key: &str| stats.get(key).and_then(|v| v.as_u64()).unwrap_or(0);
        Some(ReputationIntel {
            malicious: count("malicious"),
            suspicious: count("suspicious"),
            harmless: count("harmless"),
        })
    }
}

/// Ports checked by the quick sweep
fn sweep_ports() -> Vec<u16> {
    vec![21, 22, 23, 25, 53, 80, 110, 143, 443, 445, 3306, 3389, 5432, 8080, 8443]
}

#[async_trait]
impl ProbeModule for NetworkReconModule {
    fn info(&self) -> ModuleInfo {
        self.base.info()
    }

    fn validate(&self, input: &ModuleInput) -> Result<()> {
        self.base.validate_input(input)?;

        let target = input.target.trim();
        if target.parse::<IpAddr>().is_err() && !looks_like_domain(target) {
            return Err(ReconError::InvalidTarget(
                "target must be an IP address or domain".to_string(),
            ));
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

        let request_timeout = input
            .timeout
            .unwrap_or_else(|| Duration::from_secs(opts.int("timeout").max(1) as u64));
        let api_key = opts.str("virustotal_api_key");

        // Setup phase: the target must resolve to at least one address.
        self.base.set_progress(0.05, "resolving target");
        sink.progress(0.05, "resolving target");
        let all_ips = match input.target.parse::<IpAddr>() {
            Ok(ip) => vec![ip],
            Err(_) => match resolve_host(&input.target, request_timeout).await {
                Some(ips) => ips,
                None => {
                    let e = ReconError::SetupError(format!(
                        "target '{}' does not resolve",
                        input.target
                    ));
                    self.base.finish_run(ModuleState::Error, &e.to_string());
                    return Err(e);
                }
            },
        };
        let ip = all_ips[0];

        let client = match HttpClient::new(request_timeout, &self.user_agent) {
            Ok(client) => client,
            Err(e) => {
                self.base.finish_run(ModuleState::Error, &e.to_string());
                return Err(e);
            }
        };

        // Phase 2: geolocation and ownership.
        let mut intel = IpIntel::default();
        if opts.bool("geolocation") && !token.is_cancelled() {
            self.base.set_progress(0.2, "querying geolocation and ASN data");
            sink.progress(0.2, "querying geolocation and ASN data");

            intel = self.geolocate(&client, ip).await;
            if !intel.country.is_empty() {
                sink.data(
                    serde_json::json!({ "type": "ip_intel", "intel": intel }),
                    HashMap::new(),
                );
            }
        }

        // Phase 3: quick sweep over a fixed common-port set.
        let mut open_ports = Vec::new();
        if opts.bool("port_sweep") && !token.is_cancelled() {
            self.base.set_progress(0.4, "sweeping common ports");
            sink.progress(0.4, "sweeping common ports");

            let connect_timeout = request_timeout.min(Duration::from_secs(2));
            let check_sink = sink.clone();
            open_ports = fan_out(
                sweep_ports(),
                10,
                &token,
                |port| {
                    let sink = check_sink.clone();
                    async move {
                        let addr = SocketAddr::new(ip, port);
                        match timeout(connect_timeout, TcpStream::connect(addr)).await {
                            Ok(Ok(_)) => {
                                let found = SweepPort {
                                    port,
                                    service: service_name(port).to_string(),
                                };
                                sink.data(
                                    serde_json::json!({ "type": "open_port", "port": found }),
                                    HashMap::new(),
                                );
                                Some(found)
                            }
                            _ => None,
                        }
                    }
                },
                |done, total| {
                    let fraction = 0.4 + 0.4 * done as f64 / total as f64;
                    let message = format!("swept {}/{} ports", done, total);
                    self.base.set_progress(fraction, &message);
                    sink.progress(fraction, &message);
                },
            )
            .await;
            open_ports.sort_by_key(|p| p.port);
        }

        // Phase 4: reputation, skipped without a key.
        let mut reputation = None;
        if !api_key.is_empty() && !token.is_cancelled() {
            self.base.set_progress(0.85, "checking reputation");
            sink.progress(0.85, "checking reputation");
            reputation = self.reputation(ip, &api_key, request_timeout).await;
        } else if api_key.is_empty() {
            log::debug!("network_recon: no virustotal key, reputation check skipped");
        }

        let result = NetworkReconResult {
            target: input.target.clone(),
            ip: ip.to_string(),
            all_ips: all_ips.iter().map(|ip| ip.to_string()).collect(),
            intel,
            open_ports,
            reputation,
            scan_time_ms: started.elapsed().as_millis() as u64,
        };
        let payload = serde_json::to_value(&result)
            .map_err(|e| ReconError::ParseError(e.to_string()))?;

        if token.is_cancelled() {
            self.base.finish_run(
                ModuleState::Stopped,
                &format!("stopped with {} open ports found", result.open_ports.len()),
            );
            return Ok(payload);
        }

        let message = format!(
            "recon completed: {} addresses, {} open ports",
            result.all_ips.len(),
            result.open_ports.len()
        );
        self.base.finish_run(ModuleState::Completed, &message);

        let mut metadata = HashMap::new();
        metadata.insert("open_ports".to_string(), Value::from(result.open_ports.len()));
        metadata.insert("addresses".to_string(), Value::from(result.all_ips.len()));
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
