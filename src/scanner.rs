//! Probe selection, execution and match resolution
//!
//! A [`Scanner`] pairs an immutable probe catalogue with a copied
//! configuration and exposes a single-target primitive: select the
//! probes that apply to the target, drive each wire exchange in
//! catalogue order, and classify the first response that yields bytes.
//! The scanner is safe to share across concurrent scans; each call owns
//! its connection and buffer.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalogue::Catalogue;
use crate::config::ScanConfig;
use crate::error::{Result, VscanError};
use crate::pattern::Extras;
use crate::probe::{MatchRule, Probe, Protocol};
use crate::transport::{self, WireResponse};

/// Service name reported when bytes were received but no rule matched.
pub const UNKNOWN_SERVICE: &str = "unknown";

/// A single scan endpoint: host, port and transport protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub protocol: Protocol,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16, protocol: Protocol) -> Self {
        Self {
            host: host.into(),
            port,
            protocol,
        }
    }

    /// The dial address, rendered as `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address(), self.protocol)
    }
}

/// Which probe elicited the banner and which rule classified it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeDetails {
    pub probe_name: String,
    /// The probe's payload in its escape-encoded probe-file form
    pub probe_payload: String,
    /// Source text of the rule that matched, if any
    pub matched_pattern: Option<String>,
    pub soft_matched: bool,
}

/// The identified (or unidentified) service behind a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    pub protocol: Protocol,
    /// Lossy text rendering of the banner
    pub banner: String,
    /// Raw banner bytes as received
    pub banner_bytes: Vec<u8>,
    /// Whether the banner arrived over TLS
    pub tls: bool,
    pub details: ProbeDetails,
}

/// Outcome of one scan call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReport {
    pub id: Uuid,
    pub target: Target,
    pub service: ServiceRecord,
    /// Expanded versioninfo fields of the winning match
    pub extras: Extras,
    /// Unix timestamp of when the report was assembled
    pub timestamp: i64,
}

impl ScanReport {
    /// Whether any rule classified the banner.
    pub fn is_identified(&self) -> bool {
        self.service.name != UNKNOWN_SERVICE
    }
}

/// The probing engine.
pub struct Scanner {
    catalogue: Arc<Catalogue>,
    config: ScanConfig,
}

impl Scanner {
    pub fn new(catalogue: Arc<Catalogue>, config: ScanConfig) -> Self {
        Self { catalogue, config }
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Fingerprint a single target.
    ///
    /// Probes are tried in catalogue order; the first response carrying
    /// bytes is classified and returned. Fails with
    /// [`VscanError::NoProbes`] when selection leaves nothing to send
    /// and with [`VscanError::NoIdentification`] when every probe
    /// completes without producing bytes.
    pub async fn scan(&self, target: &Target) -> Result<ScanReport> {
        let selected = self.select_probes(target)?;
        debug!(target = %target, probes = selected.len(), "probes selected");
        self.run_probes(target, &selected).await
    }

    /// Apply the selection rules: all protocol-matching probes, only
    /// the NULL probe, or the port-based default with the NULL probe
    /// appended. Everything above the rarity ceiling is dropped.
    fn select_probes(&self, target: &Target) -> Result<Vec<&Probe>> {
        let mut selected: Vec<&Probe> = Vec::new();

        if self.config.use_all_probes {
            selected.extend(
                self.catalogue
                    .iter()
                    .filter(|probe| probe.protocol == target.protocol),
            );
        } else if self.config.use_null_probe_only {
            selected.extend(self.catalogue.null_probe());
        } else {
            selected.extend(self.catalogue.iter().filter(|probe| {
                probe.protocol == target.protocol
                    && (probe.in_ports(target.port) || probe.in_ssl_ports(target.port))
            }));
            selected.extend(self.catalogue.null_probe());
        }

        selected.retain(|probe| probe.rarity <= self.config.rarity);

        if selected.is_empty() {
            return Err(VscanError::NoProbes);
        }
        Ok(selected)
    }

    async fn run_probes(&self, target: &Target, probes: &[&Probe]) -> Result<ScanReport> {
        for probe in probes {
            let payload = probe.wire_payload();

            // Plain → maybe TLS-retry → done. Ports listed in sslports
            // go straight to TLS.
            let response = if probe.in_ssl_ports(target.port) {
                transport::request(target, true, &payload, &self.config).await
            } else {
                match transport::request(target, false, &payload, &self.config).await {
                    Err(error)
                        if self.config.ssl_always_try && target.protocol == Protocol::Tcp =>
                    {
                        debug!(probe = %probe.name, %error, "plaintext failed, retrying over TLS");
                        transport::request(target, true, &payload, &self.config).await
                    }
                    other => other,
                }
            };

            match response {
                Ok(response) if !response.bytes.is_empty() => {
                    return Ok(self.resolve(target, probe, &response));
                }
                Ok(_) => {}
                Err(error) => {
                    debug!(probe = %probe.name, %error, "probe attempt aborted");
                }
            }
        }

        Err(VscanError::NoIdentification)
    }

    /// Walk the probe's match list, then (once) its fallback's. The
    /// first hard match wins immediately; the first soft match is
    /// remembered and reported only if no hard match appears.
    fn resolve(&self, target: &Target, probe: &Probe, response: &WireResponse) -> ScanReport {
        let mut soft_match: Option<&MatchRule> = None;

        for rule in &probe.matches {
            if !rule.pattern.is_match(&response.bytes) {
                continue;
            }
            if !rule.is_soft {
                return self.build_report(target, probe, response, Some(rule));
            }
            if soft_match.is_none() {
                soft_match = Some(rule);
            }
        }

        // fallback is a single name resolved through the catalogue
        // index at scan time; an undefined name is treated as absent
        if let Some(fallback) = probe
            .fallback
            .as_deref()
            .and_then(|name| self.catalogue.get(name))
        {
            for rule in &fallback.matches {
                if !rule.pattern.is_match(&response.bytes) {
                    continue;
                }
                if !rule.is_soft {
                    return self.build_report(target, probe, response, Some(rule));
                }
                if soft_match.is_none() {
                    soft_match = Some(rule);
                }
            }
        }

        self.build_report(target, probe, response, soft_match)
    }

    fn build_report(
        &self,
        target: &Target,
        probe: &Probe,
        response: &WireResponse,
        matched: Option<&MatchRule>,
    ) -> ScanReport {
        let mut report = ScanReport {
            id: Uuid::new_v4(),
            target: target.clone(),
            service: ServiceRecord {
                name: UNKNOWN_SERVICE.to_string(),
                protocol: probe.protocol,
                banner: String::from_utf8_lossy(&response.bytes).into_owned(),
                banner_bytes: response.bytes.clone(),
                tls: response.tls,
                details: ProbeDetails {
                    probe_name: probe.name.clone(),
                    probe_payload: probe.payload.clone(),
                    matched_pattern: None,
                    soft_matched: false,
                },
            },
            extras: Extras::default(),
            timestamp: chrono::Utc::now().timestamp(),
        };

        if let Some(rule) = matched {
            report.service.name = rule.service.clone();
            report.service.details.matched_pattern = Some(rule.pattern.source.clone());
            report.service.details.soft_matched = rule.is_soft;
            report.extras = rule.extras(&response.bytes);
            info!(
                target = %target,
                service = %report.service.name,
                soft = rule.is_soft,
                "service identified"
            );
        } else {
            info!(target = %target, probe = %probe.name, "banner received but no rule matched");
        }

        report
    }
}
