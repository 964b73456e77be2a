//! The compiled probe catalogue
//!
//! An ordered sequence of probes plus a name index. The order is the
//! probe-file order and drives both probe selection and match
//! evaluation; the index serves fallback resolution and `NULL`-probe
//! lookup. Immutable after construction and safe to share across
//! concurrent scans.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::parser;
use crate::probe::{Probe, NULL_PROBE};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalogue {
    probes: Vec<Probe>,
    /// Raw port specification of the file's `Exclude` directive, kept
    /// for callers to consult; the core itself ignores it
    exclude: Option<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    #[serde(skip)]
    exclude_ports: Vec<u16>,
}

impl Catalogue {
    pub(crate) fn from_parts(probes: Vec<Probe>, exclude: Option<String>) -> Self {
        let mut catalogue = Self {
            probes,
            exclude,
            index: HashMap::new(),
            exclude_ports: Vec::new(),
        };
        catalogue.rebuild();
        catalogue
    }

    /// Rebuild the derived state (name index, parsed exclude list)
    /// after construction or deserialization.
    pub(crate) fn rebuild(&mut self) {
        self.index = self
            .probes
            .iter()
            .enumerate()
            .map(|(position, probe)| (probe.name.clone(), position))
            .collect();
        self.exclude_ports = self
            .exclude
            .as_deref()
            .map(parser::parse_exclude_spec)
            .unwrap_or_default();
    }

    /// Probes in probe-file order.
    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    pub(crate) fn probes_mut(&mut self) -> &mut [Probe] {
        &mut self.probes
    }

    /// Look up a probe by name. When a file carries duplicate names the
    /// last definition wins, matching the source format's behavior.
    pub fn get(&self, name: &str) -> Option<&Probe> {
        self.index.get(name).map(|&position| &self.probes[position])
    }

    /// The distinguished probe that sends no payload.
    pub fn null_probe(&self) -> Option<&Probe> {
        self.get(NULL_PROBE)
    }

    /// Raw port specification of the `Exclude` directive, if the file
    /// carried one.
    pub fn exclude_spec(&self) -> Option<&str> {
        self.exclude.as_deref()
    }

    /// Best-effort parse of the `Exclude` specification; `T:`/`U:`
    /// prefixes are tolerated, an ill-formed specification yields an
    /// empty list.
    pub fn exclude_ports(&self) -> &[u16] {
        &self.exclude_ports
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Probe> {
        self.probes.iter()
    }
}

impl<'c> IntoIterator for &'c Catalogue {
    type Item = &'c Probe;
    type IntoIter = std::slice::Iter<'c, Probe>;

    fn into_iter(self) -> Self::IntoIter {
        self.probes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{Directive, Protocol};

    fn named_probe(name: &str, rarity: u32) -> Probe {
        Probe {
            name: name.to_string(),
            protocol: Protocol::Tcp,
            directive: Directive {
                name: name.to_string(),
                flag: "q".to_string(),
                delimiter: '|',
                body: "|".to_string(),
            },
            payload: String::new(),
            matches: Vec::new(),
            ports: Vec::new(),
            ssl_ports: Vec::new(),
            total_wait_ms: 0,
            tcp_wrapped_ms: 0,
            rarity,
            fallback: None,
        }
    }

    #[test]
    fn test_index_lookup_preserves_order() {
        let catalogue = Catalogue::from_parts(
            vec![named_probe("NULL", 1), named_probe("GenericLines", 2)],
            None,
        );
        assert_eq!(catalogue.len(), 2);
        assert_eq!(catalogue.probes()[0].name, "NULL");
        assert_eq!(catalogue.get("GenericLines").unwrap().rarity, 2);
        assert!(catalogue.get("missing").is_none());
        assert!(catalogue.null_probe().is_some());
    }

    #[test]
    fn test_duplicate_names_last_wins_in_index() {
        let mut second = named_probe("X", 1);
        second.rarity = 9;
        let catalogue = Catalogue::from_parts(vec![named_probe("X", 1), second], None);
        // both stay in the ordered list, the index resolves to the last
        assert_eq!(catalogue.len(), 2);
        assert_eq!(catalogue.get("X").unwrap().rarity, 9);
    }

    #[test]
    fn test_exclude_spec_parsing() {
        let catalogue =
            Catalogue::from_parts(vec![named_probe("NULL", 1)], Some("T:9100,53".to_string()));
        assert_eq!(catalogue.exclude_spec(), Some("T:9100,53"));
        assert_eq!(catalogue.exclude_ports(), &[9100, 53]);
    }
}
