//! Probe catalogue data model
//!
//! Entities are constructed once by the parser and immutable afterwards.
//! A probe bundles the wire recipe (transport, payload, waits) with its
//! ordered classification rules; a match rule pairs a compiled pattern
//! with the versioninfo template describing what a hit means.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VscanError;
use crate::escape;
use crate::pattern::{Extras, ServicePattern, VersionTemplate};

/// Transport protocol of a probe or target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl FromStr for Protocol {
    type Err = VscanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(VscanError::validation(
                "protocol",
                format!("expected tcp or udp, got {:?}", other),
            )),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The (name, flag, delimiter, body) quadruple extracted from a probe
/// or match line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    pub name: String,
    pub flag: String,
    pub delimiter: char,
    pub body: String,
}

/// A single classification rule attached to a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRule {
    /// Soft matches are tentative: any later hard match overrides them
    pub is_soft: bool,
    /// Service name this rule classifies, e.g. `ssh` or `http`
    pub service: String,
    pub pattern: ServicePattern,
    /// Raw versioninfo segment as it appeared in the probe file
    pub version_info: String,
    /// Parsed versioninfo fields, expanded per response
    pub template: VersionTemplate,
}

impl MatchRule {
    /// Expand the rule's versioninfo template against a response. An
    /// engine that no longer captures (or never compiled) yields empty
    /// extras.
    pub fn extras(&self, response: &[u8]) -> Extras {
        match self.pattern.captures(response) {
            Some(caps) => self.template.expand(&caps),
            None => Extras::default(),
        }
    }
}

/// A named recipe for eliciting and classifying a service banner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
    pub name: String,
    pub protocol: Protocol,
    pub directive: Directive,
    /// Escape-encoded payload text; decoded to wire bytes at send time
    pub payload: String,
    /// Classification rules in probe-file order
    pub matches: Vec<MatchRule>,
    /// Default ports this probe applies to
    pub ports: Vec<u16>,
    /// Ports on which the exchange is wrapped in TLS
    pub ssl_ports: Vec<u16>,
    pub total_wait_ms: u64,
    pub tcp_wrapped_ms: u64,
    /// 1 = common, higher = tried only by more thorough scans
    pub rarity: u32,
    /// Name of the probe whose match list is consulted when this one
    /// yields no hard match; resolved through the catalogue at scan time
    pub fallback: Option<String>,
}

/// Name of the distinguished probe that sends no payload.
pub const NULL_PROBE: &str = "NULL";

impl Probe {
    pub fn in_ports(&self, port: u16) -> bool {
        self.ports.contains(&port)
    }

    pub fn in_ssl_ports(&self, port: u16) -> bool {
        self.ssl_ports.contains(&port)
    }

    pub fn is_null(&self) -> bool {
        self.name == NULL_PROBE
    }

    /// Decode the payload into the literal octets sent on the wire.
    pub fn wire_payload(&self) -> Vec<u8> {
        escape::decode_data(&self.payload)
    }
}
