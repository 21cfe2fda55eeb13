//! Technique Mapper (C5): maps IOC kinds to a fixed adversary-technique
//! catalogue. See spec §4.5.

use crate::correlate::Indicator;

/// Catalogue order; also the tie-breaking order used to de-duplicate a
/// single indicator's `technique_ids` (spec §4.4 rule 7, §8).
pub const TECHNIQUE_CATALOGUE_ORDER: &[&str] =
    &["T1056.001", "T1056.004", "T1055", "T1014", "T1027", "T1547", "T1543"];

pub fn technique_name(id: &str) -> &'static str {
    match id {
        "T1056.001" => "Keylogging",
        "T1056.004" => "Credential API Hooking",
        "T1055" => "Process Injection",
        "T1014" => "Rootkit / Driver Tampering",
        "T1027" => "Obfuscation",
        "T1547" => "Registry Persistence",
        "T1543" => "Service Persistence",
        _ => "Unknown",
    }
}

/// Orders and de-duplicates a set of technique identifiers by catalogue
/// position. Used when a single finding (e.g. a hook matching both a
/// keylogging and a credential API) carries more than one technique id.
pub fn order_technique_ids(ids: &[&str]) -> Vec<String> {
    TECHNIQUE_CATALOGUE_ORDER
        .iter()
        .filter(|catalogue_id| ids.contains(catalogue_id))
        .map(|id| id.to_string())
        .collect()
}

/// `technique_id -> ordered, duplicate-free list of IOC kinds that triggered
/// it`, built by iterating indicators in emission order (spec §4.5).
pub fn build_technique_index(indicators: &[Indicator]) -> Vec<(String, Vec<String>)> {
    let mut index: Vec<(String, Vec<String>)> = Vec::new();
    for indicator in indicators {
        let kind = indicator.kind.as_str().to_string();
        for technique_id in &indicator.technique_ids {
            match index.iter_mut().find(|(id, _)| id == technique_id) {
                Some((_, kinds)) => {
                    if !kinds.contains(&kind) {
                        kinds.push(kind.clone());
                    }
                }
                None => index.push((technique_id.clone(), vec![kind.clone()])),
            }
        }
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_catalogue_position_regardless_of_input_order() {
        let ordered = order_technique_ids(&["T1056.004", "T1056.001"]);
        assert_eq!(ordered, vec!["T1056.001", "T1056.004"]);
    }

    #[test]
    fn dedups_repeated_ids() {
        let ordered = order_technique_ids(&["T1055", "T1055"]);
        assert_eq!(ordered, vec!["T1055"]);
    }
}
