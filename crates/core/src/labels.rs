use std::collections::BTreeMap;

pub type LabelMap = BTreeMap<String, String>;

pub const LABEL_PREFIX: &str = "label_";
pub const LABEL_SEPARATOR: char = '|';

/// Parses `label_<key>:<value>|...` into a map. Tokens that are not exactly
/// one `key:value` pair are dropped; a string with no valid pairs yields an
/// empty map.
pub fn parse_label_string(raw: &str) -> LabelMap {
    let mut labels = LabelMap::new();
    for token in raw.split(LABEL_SEPARATOR) {
        let mut parts = token.split(':');
        let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        let key = key.trim();
        let key = key.strip_prefix(LABEL_PREFIX).unwrap_or(key);
        if key.is_empty() {
            continue;
        }
        labels.insert(key.to_string(), value.trim().to_string());
    }
    labels
}

/// Volume labels as seen by a claim: persistent-volume labels overlaid by
/// the claim's own labels.
pub fn merge_volume_labels(volume: &LabelMap, claim: &LabelMap) -> LabelMap {
    let mut merged = volume.clone();
    for (key, value) in claim {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
