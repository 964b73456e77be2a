//! # vscan - Active Network Service Fingerprinting
//!
//! Identifies the service behind a (host, port, protocol) triple in the
//! style of nmap version detection: open a connection, optionally send
//! a crafted payload, read the response, and classify it against an
//! ordered library of patterns.
//!
//! ## Features
//!
//! - **Probe catalogue parser**: ingests the nmap-style service probe
//!   text format, including its binary escape sublanguage
//! - **Byte-level pattern matching**: compiled match rules with
//!   versioninfo templates and capture-group substitution
//! - **Probing engine**: port-aware probe selection, opportunistic TLS,
//!   soft/hard match precedence and fallback resolution
//! - **Catalogue persistence**: export/load of the compiled catalogue
//!   as a self-contained JSON document
//!
//! ## Quick start
//!
//! Parse a probe file into a catalogue, build a scanner with a config,
//! then scan targets:
//!
//! ```no_run
//! use std::sync::Arc;
//! use vscan::{parse_file, Protocol, ScanConfig, Scanner, Target};
//!
//! # async fn run() -> vscan::Result<()> {
//! let catalogue = parse_file("nmap-service-probes").await?;
//! let scanner = Scanner::new(Arc::new(catalogue), ScanConfig::default());
//!
//! let target = Target::new("192.0.2.7", 22, Protocol::Tcp);
//! let report = scanner.scan(&target).await?;
//! println!("{} -> {}", target, report.service.name);
//! # Ok(())
//! # }
//! ```
//!
//! The catalogue is immutable after parsing and safe to share across
//! concurrent scans; each scan owns its own connection and buffer.

pub mod catalogue;
pub mod config;
pub mod error;
pub mod escape;
pub mod logging;
pub mod parser;
pub mod pattern;
pub mod persistence;
pub mod probe;
pub mod scanner;

mod transport;

// Re-exports for convenience
pub use crate::{
    catalogue::Catalogue,
    config::{LoggingConfig, ScanConfig},
    error::{Result, VscanError},
    parser::{parse, parse_file},
    pattern::{Extras, PatternFlags, ServicePattern, VersionTemplate},
    persistence::{export_catalogue, load_catalogue, CatalogueStore, FileCatalogueStore},
    probe::{Directive, MatchRule, Probe, Protocol, NULL_PROBE},
    scanner::{ProbeDetails, ScanReport, Scanner, ServiceRecord, Target, UNKNOWN_SERVICE},
};
