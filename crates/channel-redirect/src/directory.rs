//! Channel directory: group/channel data and per-request snapshots.
//!
//! A fresh [`DirectorySnapshot`] is built for every request so edits to the
//! channel source take effect without a restart. Snapshots are immutable and
//! never shared across requests.

use std::collections::HashMap;
use std::io::ErrorKind;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::config::DirectoryConfig;

/// A named collection of channels.
///
/// Parsing is lenient: a null or mistyped scalar becomes an empty string and a
/// malformed channel entry is dropped, so one bad record never hides the rest.
#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    #[serde(default, deserialize_with = "lenient_string")]
    pub group: String,
    #[serde(default, deserialize_with = "lenient_channels")]
    pub channels: Vec<Channel>,
}

/// A logical stream with its mirror URLs.
#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub logo: String,
    /// Candidate mirrors. `None` when the channel has no URL field at all
    /// (absent, null or an empty string); an empty list is still `Some`.
    #[serde(rename = "url", default, deserialize_with = "deserialize_urls")]
    pub urls: Option<Vec<String>>,
}

/// Parse a group list, skipping entries that are not group objects.
pub fn parse_groups(raw: &str) -> Result<Vec<Group>, serde_json::Error> {
    let entries: Vec<Value> = serde_json::from_str(raw)?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<Group>(entry) {
            Ok(group) => Some(group),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed channel group");
                None
            }
        })
        .collect())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn lenient_channels<'de, D>(deserializer: D) -> Result<Vec<Channel>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Array(entries) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<Channel>(entry) {
            Ok(channel) => Some(channel),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed channel entry");
                None
            }
        })
        .collect())
}

fn deserialize_urls<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(url) if url.is_empty() => None,
        Value::String(url) => Some(vec![url]),
        // Non-string entries keep their slot but can never pass validation.
        Value::Array(urls) => Some(
            urls.into_iter()
                .map(|url| match url {
                    Value::String(url) => url,
                    _ => String::new(),
                })
                .collect(),
        ),
        _ => Some(Vec::new()),
    })
}

/// Immutable point-in-time view of all groups, indexed by channel id.
#[derive(Debug, Default)]
pub struct DirectorySnapshot {
    groups: Vec<Group>,
    index: HashMap<String, (usize, usize)>,
}

impl DirectorySnapshot {
    pub fn new(groups: Vec<Group>) -> Self {
        let mut index = HashMap::new();
        for (g, group) in groups.iter().enumerate() {
            for (c, channel) in group.channels.iter().enumerate() {
                if channel.id.is_empty() {
                    continue;
                }
                // First occurrence wins for duplicated ids.
                index.entry(channel.id.clone()).or_insert((g, c));
            }
        }
        Self { groups, index }
    }

    pub fn lookup(&self, id: &str) -> Option<&Channel> {
        let &(g, c) = self.index.get(id)?;
        self.groups.get(g)?.channels.get(c)
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Builds snapshots from the configured channel sources.
///
/// Source priority: inline `channels_data`, then `channels_file`, then an
/// empty directory. A broken source is logged and skipped.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    config: DirectoryConfig,
}

impl DirectoryLoader {
    pub fn new(config: DirectoryConfig) -> Self {
        Self { config }
    }

    pub async fn snapshot(&self) -> DirectorySnapshot {
        if let Some(groups) = self.inline_groups() {
            return DirectorySnapshot::new(groups);
        }
        DirectorySnapshot::new(self.file_groups().await)
    }

    fn inline_groups(&self) -> Option<Vec<Group>> {
        let data = self.config.channels_data.as_deref()?;
        match parse_groups(data) {
            Ok(groups) if !groups.is_empty() => Some(groups),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Inline channel data is not valid, using channel file");
                None
            }
        }
    }

    async fn file_groups(&self) -> Vec<Group> {
        let path = &self.config.channels_file;
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path, "Channel file not found, directory is empty");
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!(error = %e, path = %path, "Failed to read channel file");
                return Vec::new();
            }
        };

        parse_groups(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, path = %path, "Failed to parse channel file");
            Vec::new()
        })
    }
}

/// Expand a logo reference into a full URL. Absolute URLs pass through;
/// bare names are resolved against `logo_base_url`.
pub fn logo_url(logo_base_url: &str, logo: &str) -> String {
    if logo.is_empty() {
        String::new()
    } else if logo.starts_with("http") {
        logo.to_string()
    } else {
        format!("{logo_base_url}{logo}.png")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"[
        {"group": "News", "channels": [
            {"id": "nhk", "name": "NHK", "logo": "NHK", "url": ["http://a/nhk", "http://b/nhk"]},
            {"id": "tbs", "name": "TBS", "url": "http://a/tbs"},
            {"id": "nhk", "name": "NHK duplicate", "url": "http://dup/nhk"}
        ]},
        {"group": "Misc", "channels": [
            {"id": "nourl", "name": "No URL"},
            {"id": "blank", "name": "Blank", "url": ""},
            {"id": "empty", "name": "Empty", "url": []},
            {"id": "holes", "name": "Holes", "url": [null, "http://c/holes"]}
        ]}
    ]"#;

    fn loader(channels_file: &str, channels_data: Option<&str>) -> DirectoryLoader {
        DirectoryLoader::new(DirectoryConfig {
            channels_file: channels_file.to_string(),
            channels_data: channels_data.map(str::to_string),
            ..DirectoryConfig::default()
        })
    }

    #[test]
    fn test_url_field_shapes() {
        let groups = parse_groups(SAMPLE).unwrap();
        let snapshot = DirectorySnapshot::new(groups);

        let nhk = snapshot.lookup("nhk").unwrap();
        assert_eq!(nhk.name, "NHK", "first occurrence of a duplicated id wins");
        assert_eq!(
            nhk.urls.as_deref(),
            Some(&["http://a/nhk".to_string(), "http://b/nhk".to_string()][..])
        );
        assert_eq!(
            snapshot.lookup("tbs").unwrap().urls,
            Some(vec!["http://a/tbs".to_string()])
        );
        assert_eq!(snapshot.lookup("nourl").unwrap().urls, None);
        assert_eq!(snapshot.lookup("blank").unwrap().urls, None);
        assert_eq!(snapshot.lookup("empty").unwrap().urls, Some(vec![]));
        assert_eq!(
            snapshot.lookup("holes").unwrap().urls,
            Some(vec![String::new(), "http://c/holes".to_string()])
        );
        assert!(snapshot.lookup("missing").is_none());
        assert_eq!(snapshot.groups().len(), 2);
    }

    #[test]
    fn test_null_and_mistyped_fields_do_not_hide_other_channels() {
        let raw = r#"[
            null,
            {"group": null, "channels": [
                {"id": "good", "name": "Good", "url": ["http://a/good", "http://b/good"]},
                {"id": "bad", "logo": null, "url": "http://c"},
                {"id": 42, "name": null, "url": [7, "http://d/num"]},
                {"id": "odd", "url": {"primary": "http://e"}},
                "not a channel",
                null
            ]},
            {"group": "Empty", "channels": null}
        ]"#;
        let snapshot = DirectorySnapshot::new(parse_groups(raw).unwrap());

        assert_eq!(snapshot.groups().len(), 2);
        assert_eq!(snapshot.groups()[0].group, "");
        assert_eq!(snapshot.groups()[0].channels.len(), 4);
        assert!(snapshot.groups()[1].channels.is_empty());

        let good = snapshot.lookup("good").unwrap();
        assert_eq!(good.urls.as_ref().unwrap().len(), 2);

        let bad = snapshot.lookup("bad").unwrap();
        assert_eq!(bad.logo, "");
        assert_eq!(bad.urls, Some(vec!["http://c".to_string()]));

        let numeric = snapshot.lookup("42").unwrap();
        assert_eq!(numeric.name, "");
        assert_eq!(
            numeric.urls,
            Some(vec![String::new(), "http://d/num".to_string()])
        );

        assert_eq!(snapshot.lookup("odd").unwrap().urls, Some(vec![]));
    }

    #[tokio::test]
    async fn test_file_with_one_null_field_still_serves_good_channel() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"group": "G", "channels": [
                {{"id": "good", "url": "http://a/good"}},
                {{"id": "bad", "logo": null, "url": "http://c"}}
            ]}}]"#
        )
        .unwrap();

        let snapshot = loader(file.path().to_str().unwrap(), None).snapshot().await;
        assert!(snapshot.lookup("good").is_some());
        assert!(snapshot.lookup("bad").is_some());
    }

    #[tokio::test]
    async fn test_inline_data_takes_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"group": "File", "channels": []}}]"#).unwrap();

        let loader = loader(file.path().to_str().unwrap(), Some(SAMPLE));
        let snapshot = loader.snapshot().await;
        assert_eq!(snapshot.groups()[0].group, "News");
    }

    #[tokio::test]
    async fn test_invalid_or_empty_inline_data_falls_back_to_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{SAMPLE}").unwrap();
        let path = file.path().to_str().unwrap();

        for inline in ["not json", "[]"] {
            let snapshot = loader(path, Some(inline)).snapshot().await;
            assert!(snapshot.lookup("tbs").is_some(), "inline {inline:?} should fall back");
        }
    }

    #[tokio::test]
    async fn test_missing_or_broken_file_yields_empty_directory() {
        let snapshot = loader("/nonexistent/channels.json", None).snapshot().await;
        assert!(snapshot.is_empty());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ broken").unwrap();
        let snapshot = loader(file.path().to_str().unwrap(), None).snapshot().await;
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_reflects_file_changes() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let loader = loader(&path, None);

        std::fs::write(&path, r#"[{"group": "G", "channels": [{"id": "a", "url": "http://a"}]}]"#)
            .unwrap();
        let first = loader.snapshot().await;
        std::fs::write(&path, r#"[{"group": "G", "channels": [{"id": "b", "url": "http://b"}]}]"#)
            .unwrap();
        let second = loader.snapshot().await;

        assert!(first.lookup("a").is_some());
        assert!(second.lookup("a").is_none());
        assert!(second.lookup("b").is_some());
    }

    #[test]
    fn test_logo_url() {
        let base = DirectoryConfig::default().logo_base_url;
        assert_eq!(logo_url(&base, ""), "");
        assert_eq!(logo_url(&base, "https://cdn/x.png"), "https://cdn/x.png");
        assert_eq!(
            logo_url(&base, "NHK"),
            "https://gcore.jsdelivr.net/gh/fanmingming/live/tv/NHK.png"
        );
    }
}
