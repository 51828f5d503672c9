//! Device name selection.

/// Name fragment used to find the loopback device when none is configured.
pub const DEFAULT_LOOPBACK_FRAGMENT: &str = "BlackHole";

/// Case-insensitive substring match.
pub fn name_matches(name: &str, fragment: &str) -> bool {
    name.to_lowercase().contains(&fragment.to_lowercase())
}

/// Index of the first name containing `fragment`, skipping `exclude`.
///
/// `exclude` keeps the loopback lookup from picking the microphone when both
/// names happen to match.
pub fn find_device(names: &[String], fragment: &str, exclude: Option<&str>) -> Option<usize> {
    names
        .iter()
        .position(|name| name_matches(name, fragment) && Some(name.as_str()) != exclude)
}

/// Human readable list for "not found" errors.
pub fn describe(names: &[String]) -> String {
    if names.is_empty() {
        "no input devices".to_string()
    } else {
        names.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> Vec<String> {
        vec![
            "MacBook Pro Microphone".to_string(),
            "BlackHole 2ch".to_string(),
            "Loopback Audio".to_string(),
        ]
    }

    #[test]
    fn test_match_ignores_case() {
        assert!(name_matches("BlackHole 2ch", "blackhole"));
        assert!(!name_matches("BlackHole 2ch", "soundflower"));
    }

    #[test]
    fn test_find_default_loopback() {
        assert_eq!(find_device(&names(), DEFAULT_LOOPBACK_FRAGMENT, None), Some(1));
        assert_eq!(find_device(&names(), "loopback", None), Some(2));
        assert_eq!(find_device(&names(), "usb", None), None);
    }

    #[test]
    fn test_find_skips_excluded() {
        let names = vec!["Loopback Mic".to_string(), "Loopback Audio".to_string()];
        assert_eq!(find_device(&names, "loopback", Some("Loopback Mic")), Some(1));
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&[]), "no input devices");
        assert_eq!(describe(&names()[..2]), "MacBook Pro Microphone, BlackHole 2ch");
    }
}
