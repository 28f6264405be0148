//! TCP port scanning probe

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
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
use crate::probes::service_names::{common_ports, service_name};
use crate::transport::resolve_host;
use crate::{ReconError, Result};

/// One open port in the scan result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortInfo {
    pub port: u16,
    pub protocol: String,
    pub state: String,
    pub service: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub banner: String,
    pub response_time_ms: u64,
}

/// Structured result payload of a port scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortScanResult {
    pub target: String,
    pub ip: String,
    pub open_ports: Vec<PortInfo>,
    pub total_ports: usize,
    pub scan_type: String,
    pub scan_time_ms: u64,
}

/// TCP connect scanner with optional service naming and banner grabbing
pub struct PortScanModule {
    base: BaseModule,
    default_threads: i64,
}

impl PortScanModule {
    pub fn new(config: &CoreConfig) -> Self {
        let default_threads = config.default_concurrency.min(500) as i64;
        let info = ModuleInfo {
            name: "port_scan".to_string(),
            category: "active_recon".to_string(),
            description: "TCP port scanner with service detection and banner grabbing".to_string(),
            version: "1.0.0".to_string(),
            author: "reconx".to_string(),
            tags: vec![
                "port".to_string(),
                "scan".to_string(),
                "network".to_string(),
                "active".to_string(),
            ],
            options: vec![
                ModuleOption::string(
                    "ports",
                    "Ports to scan: 'common', 'well-known', ranges and lists (e.g. 20-25,80,443)",
                    "common",
                ),
                ModuleOption::int("threads", "Concurrent connection attempts", default_threads),
                ModuleOption::int("timeout", "Connect timeout in seconds", 2),
                ModuleOption::bool("service_detection", "Annotate open ports with service names", true),
                ModuleOption::bool("banner_grab", "Read an initial banner from open ports", true),
            ],
            requirements: vec!["network".to_string()],
        };

        Self {
            base: BaseModule::new(info),
            default_threads,
        }
    }

    async fn probe_port(
        &self,
        ip: IpAddr,
        port: u16,
        connect_timeout: Duration,
        service_detection: bool,
        banner_grab: bool,
    ) -> Option<PortInfo> {
        let start = Instant::now();
        let addr = SocketAddr::new(ip, port);

        let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            // Refused or timed out: a miss, not an error.
            _ => return None,
        };
        let response_time = start.elapsed();

        let service = if service_detection {
            service_name(port).to_string()
        } else {
            String::new()
        };

        let banner = if banner_grab {
            grab_banner(stream, connect_timeout).await
        } else {
            String::new()
        };

        Some(PortInfo {
            port,
            protocol: "tcp".to_string(),
            state: "open".to_string(),
            service,
            banner,
            response_time_ms: response_time.as_millis() as u64,
        })
    }
}

/// Read whatever the service volunteers right after connect
async fn grab_banner(mut stream: TcpStream, read_timeout: Duration) -> String {
    let mut buf = [0u8; 1024];
    match timeout(read_timeout, stream.read(&mut buf)).await {
        Ok(Ok(n)) if n > 0 => String::from_utf8_lossy(&buf[..n]).trim().to_string(),
        _ => String::new(),
    }
}

/// Parse a port specification into a sorted, deduplicated port list
pub fn parse_ports(spec: &str) -> Vec<u16> {
    match spec.trim().to_lowercase().as_str() {
        "common" => return common_ports(),
        "well-known" => return (1..=1023).collect(),
        "all" => return (1..=u16::MAX).collect(),
        _ => {}
    }

    let mut ports = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.trim().parse::<u16>(), end.trim().parse::<u16>())
            {
                if start > 0 && start <= end {
                    ports.extend(start..=end);
                }
            }
        } else if let Ok(port) = part.parse::<u16>() {
            if port > 0 {
                ports.push(port);
            }
        }
    }

    ports.sort_unstable();
    ports.dedup();
    ports
}

#[async_trait]
impl ProbeModule for PortScanModule {
    fn info(&self) -> ModuleInfo {
        self.base.info()
    }

    fn validate(&self, input: &ModuleInput) -> Result<()> {
        self.base.validate_input(input)?;

        let target = input.target.trim();
        let is_hostname = looks_like_domain(target)
            || target
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-');
        if target.parse::<IpAddr>().is_err() && !is_hostname {
            return Err(ReconError::InvalidTarget(
                "target must be an IP address or hostname".to_string(),
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

        let threads = match opts.int("threads") {
            n if n > 0 => n as usize,
            _ => self.default_threads as usize,
        };
        let connect_timeout = input
            .timeout
            .unwrap_or_else(|| Duration::from_secs(opts.int("timeout").max(1) as u64));
        let service_detection = opts.bool("service_detection");
        let banner_grab = opts.bool("banner_grab");

        let ports = parse_ports(&opts.str("ports"));
        if ports.is_empty() {
            let e = ReconError::SetupError("no valid ports to scan".to_string());
            self.base.finish_run(ModuleState::Error, &e.to_string());
            return Err(e);
        }

        // Setup phase: resolve the target once before fanning out.
        self.base.set_progress(0.02, "resolving target");
        sink.progress(0.02, "resolving target");
        let ip = match input.target.parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => match resolve_host(&input.target, connect_timeout.max(Duration::from_secs(2)))
                .await
                .and_then(|ips| ips.into_iter().next())
            {
                Some(ip) => ip,
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

        let total = ports.len();
        sink.progress(0.05, &format!("scanning {} ports on {}", total, ip));
        log::debug!("port_scan: {} candidates on {} ({} threads)", total, ip, threads);

        let check_sink = sink.clone();
        let mut open_ports = fan_out(
            ports,
            threads,
            &token,
            |port| {
                let sink = check_sink.clone();
                async move {
                    let info = self
                        .probe_port(ip, port, connect_timeout, service_detection, banner_grab)
                        .await?;
                    sink.data(
                        serde_json::json!({ "type": "open_port", "port": info }),
                        HashMap::new(),
                    );
                    Some(info)
                }
            },
            |done, total| {
                let fraction = 0.05 + 0.9 * done as f64 / total as f64;
                self.base
                    .set_progress(fraction, &format!("scanned {}/{} ports", done, total));
                sink.progress(fraction, &format!("scanned {}/{} ports", done, total));
            },
        )
        .await;

        open_ports.sort_by_key(|p| p.port);
        let result = PortScanResult {
            target: input.target.clone(),
            ip: ip.to_string(),
            open_ports,
            total_ports: total,
            scan_type: "tcp_connect".to_string(),
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

        let message = format!("scan completed: {} open ports", result.open_ports.len());
        self.base.finish_run(ModuleState::Completed, &message);

        let mut metadata = HashMap::new();
        metadata.insert("open_ports".to_string(), Value::from(result.open_ports.len()));
        metadata.insert("total_ports".to_string(), Value::from(result.total_ports));
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
    fn test_parse_named_sets() {
        assert_eq!(parse_ports("well-known").len(), 1023);
        assert!(parse_ports("common").contains(&443));
    }

    #[test]
    fn test_parse_ranges_and_lists() {
        assert_eq!(parse_ports("20-25"), vec![20, 21, 22, 23, 24, 25]);
        assert_eq!(parse_ports("80,443,22"), vec![22, 80, 443]);
        assert_eq!(parse_ports("8080-8082,80,8081"), vec![80, 8080, 8081, 8082]);
    }

    #[test]
    fn test_parse_garbage_yields_empty() {
        assert!(parse_ports("eighty").is_empty());
        assert!(parse_ports("25-20").is_empty());
        assert!(parse_ports("0").is_empty());
    }

    #[test]
    fn test_validate_rejects_malformed_targets() {
        let module = PortScanModule::new(&CoreConfig::default());
        assert!(module
            .validate(&ModuleInput::new("10.0.0.5", "s1"))
            .is_ok());
        assert!(module
            .validate(&ModuleInput::new("example.com", "s1"))
            .is_ok());
        assert!(module
            .validate(&ModuleInput::new("not a target!", "s1"))
            .is_err());
        assert!(module.validate(&ModuleInput::new("", "s1")).is_err());
    }
}
