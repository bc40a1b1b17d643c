use std::collections::BTreeMap;

use super::Engine;

pub fn parse_engine(s: &str) -> Option<Engine> {
    match s.to_lowercase().as_str() {
        "kafka" => Some(Engine::Kafka),
        "mock" => Some(Engine::Mock),
        _ => None,
    }
}

/// Parses `key=value` client property overrides; malformed entries are skipped.
pub fn parse_client_kv(pairs: &[String]) -> BTreeMap<String, String> {
    let mut props = BTreeMap::new();
    for p in pairs {
        if let Some((k, v)) = p.split_once('=') {
            let k = k.trim();
            if !k.is_empty() {
                props.insert(k.to_string(), v.trim().to_string());
            }
        }
    }
    props
}
