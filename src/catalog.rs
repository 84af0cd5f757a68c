use crate::model::Episode;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Reads a JSON array of episodes prepared by whatever fetched them.
pub fn load_episodes(path: &Path) -> Result<Vec<Episode>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog {}", path.display()))?;
    let episodes: Vec<Episode> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse catalog {}", path.display()))?;
    Ok(episodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_episode_array_in_order() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("episodes.json");
        fs::write(
            &path,
            r#"[
                {"title": "one", "thumbnail": "1.jpg", "members": "a", "duration": 10, "url": "1.mp3"},
                {"title": "two", "thumbnail": "2.jpg", "members": "b", "publishedAt": "2 Feb 21", "duration": 20, "url": "2.mp3"}
            ]"#,
        )
        .expect("write");

        let episodes = load_episodes(&path).expect("load");
        let titles: Vec<&str> = episodes.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["one", "two"]);
        assert_eq!(episodes[1].published_at, "2 Feb 21");
    }

    #[test]
    fn missing_catalog_names_the_file() {
        let dir = tempdir().expect("tempdir");
        let err = load_episodes(&dir.path().join("nope.json")).expect_err("missing");
        assert!(format!("{err:#}").contains("nope.json"));
    }
}
