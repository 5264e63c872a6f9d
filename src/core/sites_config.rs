//! Site profile loader — populates the [`crate::adapters::SiteRegistry`] at
//! startup from an optional JSON file, mirroring `load_config`'s candidate-
//! path precedence (`TIN_LOOM_SITES_CONFIG` env var -> `tin-loom-sites.json`
//! in the working directory -> `~/.tin-loom/sites.json`). Per DESIGN.md
//! decision #7, this crate ships no hardcoded per-publisher selectors: an
//! absent/unparsable file just yields an empty registry, and the process
//! starts up with zero adapters registered rather than failing.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::adapters::SiteProfile;

/// Loads the list of [`SiteProfile`]s to register, or an empty `Vec` when no
/// config file is found or it fails to parse.
pub fn load_site_profiles() -> Vec<SiteProfile> {
    let candidates: Vec<PathBuf> = vec![
        std::env::var("TIN_LOOM_SITES_CONFIG").ok().map(PathBuf::from),
        Some(PathBuf::from("tin-loom-sites.json")),
        dirs::home_dir().map(|h| h.join(".tin-loom/sites.json")),
    ]
    .into_iter()
    .flatten()
    .collect();

    for path in candidates {
        if let Some(profiles) = try_load_from(&path) {
            return profiles;
        }
    }

    info!("sites_config: no site profile file found — starting with an empty adapter registry");
    Vec::new()
}

fn try_load_from(path: &Path) -> Option<Vec<SiteProfile>> {
    if !path.exists() {
        return None;
    }
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<Vec<SiteProfile>>(&raw) {
            Ok(profiles) => {
                info!("sites_config: loaded {} site profile(s) from {}", profiles.len(), path.display());
                Some(profiles)
            }
            Err(e) => {
                warn!("sites_config: failed to parse {}: {} — starting with an empty registry", path.display(), e);
                Some(Vec::new())
            }
        },
        Err(e) => {
            warn!("sites_config: failed to read {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_none_not_error() {
        assert!(try_load_from(Path::new("/nonexistent/tin-loom-sites.json")).is_none());
    }

    #[test]
    fn parses_a_profile_list() {
        let raw = r#"[{
            "website": "example",
            "listing_item_selector": ".item",
            "listing_link_selector": "a",
            "detail_title_selector": "h1",
            "detail_content_selectors": ["article"]
        }]"#;
        let profiles: Vec<SiteProfile> = serde_json::from_str(raw).unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].website, "example");
        assert!(profiles[0].nav_page_url.is_none());
    }
}
