//! Scanner device resolution — picks which `/dev/input/eventN` node to
//! open and which configured user identity goes with it.
//!
//! Resolution order: if a configured path exists, use it; else prefer the
//! stable `by-id` aliases, optionally filtered by a case-insensitive
//! substring; else fall back to the first `event*` node; else the
//! configured path or `event0` itself.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Resolves the scanner input device under `root` (normally `/dev/input`).
/// Exposed with an explicit root so tests can point it at a `tempdir`
/// instead of the real device tree.
pub fn resolve_scanner_device_under(
    root: &Path,
    configured_path: Option<&str>,
    device_filter: Option<&str>,
) -> PathBuf {
    if let Some(p) = configured_path {
        let path = PathBuf::from(p);
        if path.exists() {
            return path;
        }
    }

    let by_id = root.join("by-id");
    if let Some(path) = first_matching_by_id(&by_id, device_filter) {
        return path;
    }

    if let Some(path) = first_event_node(root) {
        return path;
    }

    configured_path
        .map(PathBuf::from)
        .unwrap_or_else(|| root.join("event0"))
}

pub fn resolve_scanner_device(configured_path: Option<&str>, device_filter: Option<&str>) -> PathBuf {
    resolve_scanner_device_under(Path::new("/dev/input"), configured_path, device_filter)
}

/// Picks a `by-id` candidate: prefer one matching `device_filter` (a
/// case-insensitive substring) if any does, but fall through to the first
/// candidate alphabetically — filtered or not — rather than abandoning the
/// `by-id` tier entirely when the filter matches nothing.
fn first_matching_by_id(by_id: &Path, device_filter: Option<&str>) -> Option<PathBuf> {
    let entries = std::fs::read_dir(by_id).ok()?;

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.ends_with("event-kbd"))
        })
        .collect();
    candidates.sort();

    if let Some(filter) = device_filter.map(str::to_lowercase) {
        let preferred = candidates.iter().find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.to_lowercase().contains(&filter))
        });
        if let Some(p) = preferred {
            return Some(p.clone());
        }
    }

    candidates.into_iter().next()
}

fn first_event_node(root: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(root).ok()?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| name.starts_with("event"))
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Resolves the configured user identity for `dev_path`: exact path match
/// first, then basename equality, then basename-suffix match. Empty string
/// if nothing matches.
pub fn resolve_user(scanner_user_map: &HashMap<String, String>, dev_path: &Path) -> String {
    let dev_path_str = dev_path.to_string_lossy();
    if let Some(user) = scanner_user_map.get(dev_path_str.as_ref()) {
        return user.clone();
    }

    let basename = dev_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    for (key, user) in scanner_user_map {
        let key_basename = Path::new(key).file_name().and_then(|n| n.to_str()).unwrap_or(key);
        if key_basename == basename || basename.ends_with(key_basename) {
            return user.clone();
        }
    }

    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_path_wins_when_it_exists() {
        let dir = tempfile::tempdir().unwrap();
        let configured = dir.path().join("eventX");
        std::fs::write(&configured, b"").unwrap();

        let resolved = resolve_scanner_device_under(dir.path(), Some(configured.to_str().unwrap()), None);
        assert_eq!(resolved, configured);
    }

    #[test]
    fn falls_back_to_by_id_filtered_alphabetically() {
        let dir = tempfile::tempdir().unwrap();
        let by_id = dir.path().join("by-id");
        std::fs::create_dir_all(&by_id).unwrap();
        std::fs::write(by_id.join("usb-Zebra-event-kbd"), b"").unwrap();
        std::fs::write(by_id.join("usb-Acme-event-kbd"), b"").unwrap();
        std::fs::write(by_id.join("usb-Acme-event-mouse"), b"").unwrap();

        let resolved = resolve_scanner_device_under(dir.path(), Some("/nonexistent"), None);
        assert_eq!(resolved, by_id.join("usb-Acme-event-kbd"));
    }

    #[test]
    fn device_filter_narrows_by_id_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let by_id = dir.path().join("by-id");
        std::fs::create_dir_all(&by_id).unwrap();
        std::fs::write(by_id.join("usb-Zebra-event-kbd"), b"").unwrap();
        std::fs::write(by_id.join("usb-Acme-event-kbd"), b"").unwrap();

        let resolved = resolve_scanner_device_under(dir.path(), None, Some("zebra"));
        assert_eq!(resolved, by_id.join("usb-Zebra-event-kbd"));
    }

    #[test]
    fn non_matching_filter_still_falls_back_to_first_by_id_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let by_id = dir.path().join("by-id");
        std::fs::create_dir_all(&by_id).unwrap();
        std::fs::write(by_id.join("usb-Zebra-event-kbd"), b"").unwrap();
        std::fs::write(by_id.join("usb-Acme-event-kbd"), b"").unwrap();

        // A filter that matches none of the by-id candidates must not
        // abandon the by-id tier for a raw /dev/input/event* node — it
        // falls through to the first candidate alphabetically, same as
        // an unfiltered lookup.
        let resolved = resolve_scanner_device_under(dir.path(), None, Some("no-such-vendor"));
        assert_eq!(resolved, by_id.join("usb-Acme-event-kbd"));
    }

    #[test]
    fn falls_back_to_first_event_node_when_no_by_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("event1"), b"").unwrap();
        std::fs::write(dir.path().join("event0"), b"").unwrap();
        std::fs::write(dir.path().join("mouse0"), b"").unwrap();

        let resolved = resolve_scanner_device_under(dir.path(), None, None);
        assert_eq!(resolved, dir.path().join("event0"));
    }

    #[test]
    fn falls_back_to_configured_path_when_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_scanner_device_under(dir.path(), Some("/dev/input/eventZ"), None);
        assert_eq!(resolved, PathBuf::from("/dev/input/eventZ"));
    }

    #[test]
    fn falls_back_to_event0_when_nothing_configured_either() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_scanner_device_under(dir.path(), None, None);
        assert_eq!(resolved, dir.path().join("event0"));
    }

    #[test]
    fn resolve_user_exact_path_match() {
        let mut map = HashMap::new();
        map.insert("/dev/input/event3".to_string(), "alice".to_string());
        assert_eq!(resolve_user(&map, Path::new("/dev/input/event3")), "alice");
    }

    #[test]
    fn resolve_user_basename_match() {
        let mut map = HashMap::new();
        map.insert("event3".to_string(), "alice".to_string());
        assert_eq!(resolve_user(&map, Path::new("/dev/input/event3")), "alice");
    }

    #[test]
    fn resolve_user_unresolved_is_empty() {
        let map = HashMap::new();
        assert_eq!(resolve_user(&map, Path::new("/dev/input/event3")), "");
    }
}
