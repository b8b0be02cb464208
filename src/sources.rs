use std::collections::BTreeMap;

use crate::error::{Od11Error, Result};
use crate::types::SourceId;

/// Map a free-form token (numeric ID, canonical name, alias, live source
/// name, or fragment of one) to a source ID.
///
/// Resolution order: numeric tokens are returned as IDs directly; otherwise
/// the token is normalized, expanded through the alias table, and matched
/// against the live source map first exactly, then by prefix/substring.
/// The fixed canonical table is consulted only when the live map has no
/// match. Fragment matches return the first live name in map order that
/// qualifies; no stronger tie-break is promised.
pub fn resolve_source(sources: &BTreeMap<SourceId, String>, token: &str) -> Result<SourceId> {
    let simp = simplify(token);

    if !simp.is_empty() && simp.chars().all(|c| c.is_ascii_digit()) {
        return simp
            .parse()
            .map_err(|_| Od11Error::UnknownSource(token.to_string()));
    }

    let canon = match canonical_for_alias(&simp) {
        Some(canon) => canon,
        None => simp.as_str(),
    };

    for (id, name) in sources {
        if simplify(name) == canon {
            return Ok(*id);
        }
    }

    for (id, name) in sources {
        let name = simplify(name);
        if name.starts_with(canon) || name.contains(canon) {
            return Ok(*id);
        }
    }

    if let Some(id) = canonical_id(canon) {
        return Ok(id);
    }

    Err(Od11Error::UnknownSource(token.to_string()))
}

/// Lowercase a token and strip everything that is not alphanumeric
fn simplify(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Expand an informal abbreviation to its canonical source name
fn canonical_for_alias(token: &str) -> Option<&'static str> {
    let canon = match token {
        "b" | "bt" | "blue" => "bluetooth",
        "o" | "opt" => "optical",
        "l" | "li" | "line" => "linein",
        "s" | "sp" | "spot" => "spotify",
        "a" | "ap" | "air" => "airplay",
        "p" | "pl" => "playlist",
        _ => return None,
    };
    Some(canon)
}

/// Fixed IDs the speaker assigns to its built-in inputs, used as a last
/// resort when the live source map has no match
fn canonical_id(name: &str) -> Option<SourceId> {
    let id = match name {
        "airplay" => 0,
        "spotify" => 1,
        "playlist" => 2,
        "linein" => 3,
        "optical" => 4,
        "bluetooth" => 5,
        _ => return None,
    };
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live_map(entries: &[(SourceId, &str)]) -> BTreeMap<SourceId, String> {
        entries
            .iter()
            .map(|(id, name)| (*id, name.to_string()))
            .collect()
    }

    #[test]
    fn numeric_tokens_bypass_the_map() {
        let sources = live_map(&[(0, "AirPlay"), (5, "Bluetooth")]);
        assert_eq!(resolve_source(&sources, "3").unwrap(), 3);
        assert_eq!(resolve_source(&BTreeMap::new(), "3").unwrap(), 3);
        assert_eq!(resolve_source(&sources, " 12 ").unwrap(), 12);
    }

    #[test]
    fn alias_falls_back_to_canonical_id_with_empty_map() {
        assert_eq!(resolve_source(&BTreeMap::new(), "bt").unwrap(), 5);
        assert_eq!(resolve_source(&BTreeMap::new(), "opt").unwrap(), 4);
        assert_eq!(resolve_source(&BTreeMap::new(), "AirPlay").unwrap(), 0);
    }

    #[test]
    fn alias_resolves_with_a_live_map_present() {
        let sources = live_map(&[(0, "AirPlay"), (5, "BT Speaker")]);
        assert_eq!(resolve_source(&sources, "bt").unwrap(), 5);
    }

    #[test]
    fn exact_live_match_ignores_case_and_punctuation() {
        let sources = live_map(&[(3, "Line-In"), (4, "Optical")]);
        assert_eq!(resolve_source(&sources, "line in").unwrap(), 3);
        assert_eq!(resolve_source(&sources, "OPTICAL").unwrap(), 4);
    }

    #[test]
    fn prefix_and_substring_match_live_names() {
        let sources = live_map(&[(4, "Optical input")]);
        assert_eq!(resolve_source(&sources, "opt").unwrap(), 4);

        let sources = live_map(&[(9, "My Spotify Connect")]);
        assert_eq!(resolve_source(&sources, "spotify").unwrap(), 9);
    }

    #[test]
    fn live_map_wins_over_the_canonical_table() {
        // The speaker may renumber inputs; its map is the ground truth
        let sources = live_map(&[(2, "Bluetooth")]);
        assert_eq!(resolve_source(&sources, "bluetooth").unwrap(), 2);
        assert_eq!(resolve_source(&sources, "bt").unwrap(), 2);
    }

    #[test]
    fn canonical_table_covers_misses_in_a_populated_map() {
        let sources = live_map(&[(9, "Aux")]);
        assert_eq!(resolve_source(&sources, "spotify").unwrap(), 1);
    }

    #[test]
    fn unknown_tokens_are_rejected() {
        let err = resolve_source(&BTreeMap::new(), "xyz").unwrap_err();
        match err {
            Od11Error::UnknownSource(token) => assert_eq!(token, "xyz"),
            other => panic!("expected UnknownSource, got {:?}", other),
        }

        let sources = live_map(&[(0, "AirPlay")]);
        assert!(resolve_source(&sources, "turntable").is_err());
    }

    #[test]
    fn resolution_is_idempotent() {
        let sources = live_map(&[(0, "AirPlay"), (4, "Optical"), (5, "Bluetooth")]);
        for token in ["0", "air", "Optical", "bt", "playlist"] {
            let first = resolve_source(&sources, token).unwrap();
            let second = resolve_source(&sources, token).unwrap();
            assert_eq!(first, second);
        }
    }
}
