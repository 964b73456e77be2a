//! Probe file parser
//!
//! Ingests the nmap-style service probe text format and produces an
//! ordered [`Catalogue`]. The parser is strict about structure (a
//! malformed probe header aborts) but permissive about individual
//! rules: a match whose pattern fails to compile is dropped, an
//! ill-formed port list becomes an empty one, and unknown directives
//! are ignored. Corpus files are large and partially noisy.

use std::path::Path;

use tracing::debug;

use crate::catalogue::Catalogue;
use crate::error::{Result, VscanError};
use crate::pattern::{PatternFlags, ServicePattern, VersionTemplate};
use crate::probe::{Directive, MatchRule, Probe, Protocol};

/// Read and parse a probe file from disk.
pub async fn parse_file(path: impl AsRef<Path>) -> Result<Catalogue> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| VscanError::io(format!("read {}", path.display()), e.to_string()))?;
    parse(&content)
}

/// Parse probe file content into a catalogue.
pub fn parse(content: &str) -> Result<Catalogue> {
    // comments and blank lines are discarded up front
    let lines: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect();

    if lines.is_empty() {
        return Err(VscanError::parse("no content"));
    }

    let exclude_count = lines
        .iter()
        .filter(|line| line.starts_with("Exclude "))
        .count();
    if exclude_count > 1 {
        return Err(VscanError::parse(
            "only one Exclude directive is allowed in a probe file",
        ));
    }

    let first = lines[0];
    if !(first.starts_with("Exclude ") || first.starts_with("Probe ")) {
        return Err(VscanError::parse(
            "line was expected to begin with \"Probe \" or \"Exclude \"",
        ));
    }

    let (exclude, rest) = if exclude_count == 1 {
        if !first.starts_with("Exclude ") {
            return Err(VscanError::parse(
                "the Exclude directive must be the first line",
            ));
        }
        let spec = first["Exclude ".len()..].trim().to_string();
        (Some(spec), &lines[1..])
    } else {
        (None, &lines[..])
    };

    if !rest.first().map_or(false, |line| line.starts_with("Probe ")) {
        return Err(VscanError::parse(
            "a Probe directive must follow the Exclude line",
        ));
    }

    // rejoin and section on probe boundaries; the leading newline makes
    // the first chunk empty so every survivor is one probe body
    let joined = format!("\n{}", rest.join("\n"));
    let mut probes = Vec::new();
    for chunk in joined.split("\nProbe").skip(1) {
        probes.push(parse_probe(chunk)?);
    }

    debug!(probes = probes.len(), "parsed probe file");
    Ok(Catalogue::from_parts(probes, exclude))
}

/// Parse one probe body: the header line plus its child rules.
fn parse_probe(chunk: &str) -> Result<Probe> {
    let body = chunk.trim();
    let mut lines = body.lines();
    let header = lines.next().unwrap_or("");
    let (directive, protocol) = parse_probe_header(header)?;

    let payload = directive
        .body
        .split(directive.delimiter)
        .next()
        .unwrap_or("")
        .to_string();

    let mut probe = Probe {
        name: directive.name.clone(),
        protocol,
        directive,
        payload,
        matches: Vec::new(),
        ports: Vec::new(),
        ssl_ports: Vec::new(),
        total_wait_ms: 0,
        tcp_wrapped_ms: 0,
        rarity: 0,
        fallback: None,
    };

    for line in lines {
        if let Some(text) = line.strip_prefix("match ") {
            match parse_match(text, false) {
                Some(rule) => probe.matches.push(rule),
                None => debug!(probe = %probe.name, line, "dropped match rule"),
            }
        } else if let Some(text) = line.strip_prefix("softmatch ") {
            match parse_match(text, true) {
                Some(rule) => probe.matches.push(rule),
                None => debug!(probe = %probe.name, line, "dropped softmatch rule"),
            }
        } else if let Some(spec) = line.strip_prefix("ports ") {
            probe.ports = parse_port_list(spec).unwrap_or_else(|| {
                debug!(probe = %probe.name, spec, "ignoring malformed port list");
                Vec::new()
            });
        } else if let Some(spec) = line.strip_prefix("sslports ") {
            probe.ssl_ports = parse_port_list(spec).unwrap_or_else(|| {
                debug!(probe = %probe.name, spec, "ignoring malformed ssl port list");
                Vec::new()
            });
        } else if let Some(value) = line.strip_prefix("totalwaitms ") {
            probe.total_wait_ms = value.trim().parse().unwrap_or(0);
        } else if let Some(value) = line.strip_prefix("tcpwrappedms ") {
            probe.tcp_wrapped_ms = value.trim().parse().unwrap_or(0);
        } else if let Some(value) = line.strip_prefix("rarity ") {
            probe.rarity = value.trim().parse().unwrap_or(0);
        } else if let Some(name) = line.strip_prefix("fallback ") {
            probe.fallback = Some(name.trim().to_string());
        }
        // any other directive is tolerated and ignored
    }

    Ok(probe)
}

/// Parse the probe header `<PROTO> <NAME> <FLAG><DELIM><BODY>`, where
/// PROTO is exactly the first four characters.
fn parse_probe_header(header: &str) -> Result<(Directive, Protocol)> {
    if header.len() < 4 || !header.is_char_boundary(4) {
        return Err(VscanError::parse(format!(
            "probe header {:?} is too short",
            header
        )));
    }

    let (proto, rest) = header.split_at(4);
    if proto != "TCP " && proto != "UDP " {
        return Err(VscanError::parse(format!(
            "probe protocol must be TCP or UDP, got {:?}",
            proto.trim_end()
        )));
    }
    if rest.is_empty() {
        return Err(VscanError::parse("probe header has no body"));
    }

    let directive = parse_directive(rest).ok_or_else(|| {
        VscanError::parse(format!("malformed probe directive {:?}", rest))
    })?;
    let protocol: Protocol = proto.trim().parse()?;

    Ok((directive, protocol))
}

/// Split directive text into its (name, flag, delimiter, body)
/// quadruple: the name runs to the first space, the flag and the
/// delimiter are the next two characters, the body is everything after.
fn parse_directive(text: &str) -> Option<Directive> {
    let space = text.find(' ')?;
    let mut tail = text[space + 1..].char_indices();
    let (_, flag) = tail.next()?;
    let (delim_offset, delimiter) = tail.next()?;
    let body_start = space + 1 + delim_offset + delimiter.len_utf8();

    Some(Directive {
        name: text[..space].to_string(),
        flag: flag.to_string(),
        delimiter,
        body: text[body_start..].to_string(),
    })
}

/// Parse one match/softmatch rule. Returns `None` when the directive is
/// malformed or the pattern fails to compile, in which case the caller
/// drops the rule and continues.
fn parse_match(text: &str, is_soft: bool) -> Option<MatchRule> {
    let directive = parse_directive(text)?;
    let mut segments = directive.body.split(directive.delimiter);
    let pattern_text = segments.next().unwrap_or("").to_string();
    let version_info: String = segments.collect::<Vec<_>>().concat();

    let flags = PatternFlags::parse(&directive.flag);
    let pattern = ServicePattern::compile(&pattern_text, flags).ok()?;
    let template = VersionTemplate::parse(&version_info);

    Some(MatchRule {
        is_soft,
        service: directive.name,
        pattern,
        version_info,
        template,
    })
}

/// Parse a `ports`/`sslports` list: comma-separated single ports and
/// `LO-HI` ranges. The upper range bound is exclusive, matching the
/// source format's expansion. Any ill-formed token fails the whole
/// list.
pub(crate) fn parse_port_list(spec: &str) -> Option<Vec<u16>> {
    let mut ports = Vec::new();
    for token in spec.split(',') {
        match token.split_once('-') {
            Some((lo, hi)) => {
                let lo: u16 = lo.parse().ok()?;
                let hi: u16 = hi.parse().ok()?;
                ports.extend(lo..hi);
            }
            None => ports.push(token.parse().ok()?),
        }
    }
    Some(ports)
}

/// Best-effort parse of an `Exclude` specification. Tolerates the
/// `T:`/`U:` protocol prefixes the corpus uses; an ill-formed
/// specification yields an empty list.
pub(crate) fn parse_exclude_spec(spec: &str) -> Vec<u16> {
    let mut ports = Vec::new();
    for token in spec.split(',') {
        let token = token
            .trim()
            .trim_start_matches("T:")
            .trim_start_matches("U:");
        let parsed = match token.split_once('-') {
            Some((lo, hi)) => lo
                .parse::<u16>()
                .ok()
                .zip(hi.parse::<u16>().ok())
                .map(|(lo, hi)| (lo..hi).collect::<Vec<_>>()),
            None => token.parse::<u16>().ok().map(|port| vec![port]),
        };
        match parsed {
            Some(expanded) => ports.extend(expanded),
            None => return Vec::new(),
        }
    }
    ports
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Protocol;

    #[test]
    fn test_parse_minimal_file() {
        let catalogue = parse("Probe TCP NULL q||\nmatch echo m|^hi| p/demo/\n").unwrap();
        assert_eq!(catalogue.len(), 1);

        let probe = catalogue.null_probe().expect("NULL probe");
        assert_eq!(probe.protocol, Protocol::Tcp);
        assert_eq!(probe.payload, "");
        assert_eq!(probe.matches.len(), 1);

        let rule = &probe.matches[0];
        assert!(!rule.is_soft);
        assert_eq!(rule.service, "echo");
        assert_eq!(rule.pattern.source, "^hi");
        assert_eq!(rule.template.product.as_deref(), Some("demo"));
    }

    #[test]
    fn test_exclude_line_is_consumed() {
        let catalogue = parse("Exclude T:9100\nProbe TCP X q||\n").unwrap();
        assert_eq!(catalogue.len(), 1);
        assert!(catalogue.get("X").is_some());
        assert_eq!(catalogue.exclude_spec(), Some("T:9100"));
        assert_eq!(catalogue.exclude_ports(), &[9100]);
    }

    #[test]
    fn test_multiple_excludes_are_fatal() {
        let result = parse("Exclude 1\nExclude 2\nProbe TCP X q||\n");
        assert!(matches!(result, Err(VscanError::Parse { .. })));
    }

    #[test]
    fn test_first_line_must_be_probe_or_exclude() {
        assert!(parse("services 80\nProbe TCP X q||\n").is_err());
        assert!(parse("").is_err());
        assert!(parse("# only comments\n\n").is_err());
    }

    #[test]
    fn test_port_range_upper_bound_is_exclusive() {
        let catalogue = parse("Probe TCP X q||\nports 80,100-103,443\n").unwrap();
        assert_eq!(
            catalogue.get("X").unwrap().ports,
            vec![80, 100, 101, 102, 443]
        );
    }

    #[test]
    fn test_malformed_port_list_becomes_empty() {
        let catalogue = parse("Probe TCP X q||\nports 80,abc\nsslports 443\n").unwrap();
        let probe = catalogue.get("X").unwrap();
        assert!(probe.ports.is_empty());
        assert_eq!(probe.ssl_ports, vec![443]);
    }

    #[test]
    fn test_probe_attributes() {
        let content = "Probe UDP DNSStatusRequest q|\\0\\0\\x10\\0\\0\\0\\0\\0\\0\\0\\0\\0|\n\
                       ports 53,135\n\
                       sslports 853\n\
                       totalwaitms 6000\n\
                       tcpwrappedms 3000\n\
                       rarity 8\n\
                       fallback DNSVersionBindReq\n";
        let catalogue = parse(content).unwrap();
        let probe = catalogue.get("DNSStatusRequest").unwrap();
        assert_eq!(probe.protocol, Protocol::Udp);
        assert_eq!(probe.ports, vec![53, 135]);
        assert_eq!(probe.ssl_ports, vec![853]);
        assert_eq!(probe.total_wait_ms, 6000);
        assert_eq!(probe.tcp_wrapped_ms, 3000);
        assert_eq!(probe.rarity, 8);
        assert_eq!(probe.fallback.as_deref(), Some("DNSVersionBindReq"));
        assert_eq!(
            probe.wire_payload(),
            vec![0, 0, 0x10, 0, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_uncompilable_rule_is_dropped() {
        let content = "Probe TCP X q||\n\
                       match broken m|(| p/never/\n\
                       match kept m|^ok| p/fine/\n";
        let catalogue = parse(content).unwrap();
        let probe = catalogue.get("X").unwrap();
        assert_eq!(probe.matches.len(), 1);
        assert_eq!(probe.matches[0].service, "kept");
        assert!(probe.matches[0].pattern.is_compiled());
    }

    #[test]
    fn test_softmatch_flag_and_unknown_directives() {
        let content = "Probe TCP X q|ping|\n\
                       softmatch ftp m|^220 |\n\
                       frobnicate whatever\n";
        let catalogue = parse(content).unwrap();
        let probe = catalogue.get("X").unwrap();
        assert_eq!(probe.payload, "ping");
        assert_eq!(probe.matches.len(), 1);
        assert!(probe.matches[0].is_soft);
    }

    #[test]
    fn test_multiple_probes_keep_file_order() {
        let content = "Probe TCP NULL q||\n\
                       match ssh m|^SSH-|\n\
                       # a comment between probes\n\
                       Probe TCP GenericLines q|\\r\\n\\r\\n|\n\
                       ports 21,23\n\
                       Probe UDP Help q|help\\r\\n\\r\\n|\n";
        let catalogue = parse(content).unwrap();
        let names: Vec<_> = catalogue.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["NULL", "GenericLines", "Help"]);
        assert_eq!(
            catalogue.get("GenericLines").unwrap().wire_payload(),
            b"\r\n\r\n".to_vec()
        );
    }

    #[test]
    fn test_header_errors_are_fatal() {
        // protocol token must be exactly "TCP " or "UDP "
        assert!(parse("Probe tcp X q||\n").is_err());
        assert!(parse("Probe SCTP X q||\n").is_err());
        // header with nothing after the protocol
        assert!(parse("Probe TCP \n").is_err());
        // header too short
        assert!(parse("Probe T\n").is_err());
        // directive without flag and delimiter
        assert!(parse("Probe TCP X\n").is_err());
    }

    #[test]
    fn test_match_case_insensitive_flag_compiles() {
        let catalogue = parse("Probe TCP X q||\nmatch http i|^http/1| p/demo/\n").unwrap();
        let rule = &catalogue.get("X").unwrap().matches[0];
        assert!(rule.pattern.flags.case_insensitive);
        assert!(rule.pattern.is_match(b"HTTP/1.1 200 OK"));
    }

    #[test]
    fn test_versioninfo_segment_survives_delimiter_split() {
        let catalogue =
            parse("Probe TCP X q||\nmatch ssh m|^SSH-([\\d.]+)| p/OpenSSH/ v/$1/ cpe:/a:openbsd:openssh/\n")
                .unwrap();
        let rule = &catalogue.get("X").unwrap().matches[0];
        assert_eq!(rule.template.product.as_deref(), Some("OpenSSH"));
        assert_eq!(rule.template.version.as_deref(), Some("$1"));
        assert_eq!(rule.template.cpe, vec!["a:openbsd:openssh".to_string()]);
    }

    #[test]
    fn test_exclude_spec_best_effort() {
        assert_eq!(parse_exclude_spec("53,T:9100,U:30000-30002"), vec![53, 9100, 30000, 30001]);
        assert!(parse_exclude_spec("garbage").is_empty());
    }
}
