use crate::entry::ConfigEntry;

/// Keyword to flag marker, checked in order; the first keyword found as a
/// substring wins.
pub const LOCATION_KEYWORDS: &[(&str, &str)] = &[
    ("us", "🇺🇸"),
    ("usa", "🇺🇸"),
    ("america", "🇺🇸"),
    ("uk", "🇬🇧"),
    ("england", "🇬🇧"),
    ("london", "🇬🇧"),
    ("de", "🇩🇪"),
    ("germany", "🇩🇪"),
    ("berlin", "🇩🇪"),
    ("fr", "🇫🇷"),
    ("france", "🇫🇷"),
    ("paris", "🇫🇷"),
    ("nl", "🇳🇱"),
    ("netherlands", "🇳🇱"),
    ("amsterdam", "🇳🇱"),
    ("ca", "🇨🇦"),
    ("canada", "🇨🇦"),
    ("sg", "🇸🇬"),
    ("singapore", "🇸🇬"),
    ("jp", "🇯🇵"),
    ("japan", "🇯🇵"),
    ("tokyo", "🇯🇵"),
    ("tr", "🇹🇷"),
    ("turkey", "🇹🇷"),
    ("istanbul", "🇹🇷"),
];

pub fn tag_location(entry: &ConfigEntry) -> Option<&'static str> {
    let tag = entry.tag().unwrap_or_default();
    let address = entry.address().unwrap_or_default();
    location_marker(&tag, &address)
}

pub fn location_marker(tag: &str, address: &str) -> Option<&'static str> {
    let haystack = format!("{} {}", tag, address).to_lowercase();
    LOCATION_KEYWORDS
        .iter()
        .find(|(keyword, _)| haystack.contains(keyword))
        .map(|(_, marker)| *marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::OutboundConfig;

    #[test]
    fn matches_city_in_tag() {
        assert_eq!(location_marker("Tokyo-01", "203.0.113.7"), Some("🇯🇵"));
        assert_eq!(location_marker("Istanbul", ""), Some("🇹🇷"));
    }

    #[test]
    fn matches_address_hint() {
        assert_eq!(location_marker("", "sg2.example.net"), Some("🇸🇬"));
    }

    #[test]
    fn table_order_decides_ties() {
        // "de" appears before "fr" in the table.
        assert_eq!(location_marker("fr-de-bridge", ""), Some("🇩🇪"));
    }

    #[test]
    fn no_keyword_no_marker() {
        assert_eq!(location_marker("relay", "10.0.0.1"), None);
    }

    #[test]
    fn tagging_is_idempotent() {
        let entry = ConfigEntry::Outbound(OutboundConfig {
            tag: Some("Amsterdam Edge".to_string()),
            address: "203.0.113.9".to_string(),
            ..OutboundConfig::default()
        });
        let first = tag_location(&entry);
        assert_eq!(first, Some("🇳🇱"));
        assert_eq!(tag_location(&entry), first);
    }

    #[test]
    fn raw_uri_uses_fragment_and_host() {
        let entry = ConfigEntry::RawUri("vless://id@1.2.3.4:443#Paris%20Edge".to_string());
        assert_eq!(tag_location(&entry), Some("🇫🇷"));
    }
}
