//! Local media-probe ingest.
//!
//! The probe collaborator writes `<dir>/<checksum>.json`, the output of
//! `ffprobe -show_format -of json`. The container's description tag becomes
//! `dmovie` for movies and `depisode` for episodes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tapedeck_common::EntityKind;

use crate::metadata::provider::{
    Candidate, LookupKey, MetadataProvider, ProviderError, ProviderId, ProviderRecord,
};

/// Tags consulted for the description, in order. Matching ignores case.
const DESCRIPTION_TAGS: &[&str] = &["description", "synopsis", "comment"];

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

impl ProbeFormat {
    fn description(&self) -> Option<&str> {
        DESCRIPTION_TAGS.iter().find_map(|wanted| {
            self.tags
                .iter()
                .find(|(name, value)| name.eq_ignore_ascii_case(wanted) && !value.trim().is_empty())
                .map(|(_, value)| value.as_str())
        })
    }
}

/// Reads per-file probe output.
pub struct ProbeIngest {
    dir: PathBuf,
    enabled: bool,
}

impl ProbeIngest {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            enabled,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, checksum: &str) -> PathBuf {
        self.dir.join(format!("{checksum}.json"))
    }
}

#[async_trait]
impl MetadataProvider for ProbeIngest {
    fn id(&self) -> ProviderId {
        ProviderId::Probe
    }

    fn is_available(&self) -> bool {
        self.enabled && self.dir.is_dir()
    }

    fn supports(&self, key: &LookupKey) -> bool {
        matches!(key, LookupKey::File { .. })
    }

    async fn search(&self, key: &LookupKey) -> Result<Vec<Candidate>, ProviderError> {
        let LookupKey::File { checksum, .. } = key else {
            return Ok(Vec::new());
        };
        let exists = tokio::fs::try_exists(self.path_for(checksum.as_str()))
            .await
            .map_err(|e| ProviderError::unavailable(ProviderId::Probe, e))?;

        Ok(if exists {
            vec![Candidate {
                id: checksum.to_string(),
                title: checksum.to_string(),
                year: None,
                confidence: 1.0,
            }]
        } else {
            Vec::new()
        })
    }

    async fn fetch(
        &self,
        candidate: &Candidate,
        key: &LookupKey,
    ) -> Result<ProviderRecord, ProviderError> {
        let LookupKey::File { kind, .. } = key else {
            return Err(ProviderError::not_found(ProviderId::Probe, key));
        };

        let path = self.path_for(&candidate.id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ProviderError::not_found(ProviderId::Probe, key))
            }
            Err(e) => return Err(ProviderError::unavailable(ProviderId::Probe, e)),
        };
        let output: ProbeOutput = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::malformed(ProviderId::Probe, format!("{}: {e}", path.display())))?;

        let field = match kind {
            EntityKind::Movie => "dmovie",
            EntityKind::Tv => "depisode",
        };
        let mut record = ProviderRecord::new(ProviderId::Probe);
        record.set_opt(field, output.format.description());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapedeck_common::Checksum;

    fn key(checksum: &str, kind: EntityKind) -> LookupKey {
        LookupKey::File {
            checksum: Checksum::parse(checksum).unwrap(),
            kind,
        }
    }

    #[tokio::test]
    async fn reads_description_tag() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("ab12.json"),
            serde_json::to_vec(&serde_json::json!({
                "format": {"tags": {"title": "Pilot", "DESCRIPTION": "Lorne arrives in Bemidji."}}
            }))
            .unwrap(),
        )
        .unwrap();

        let probe = ProbeIngest::new(dir.path(), true);
        assert!(probe.is_available());

        let key = key("ab12", EntityKind::Tv);
        let candidate = probe.search(&key).await.unwrap().remove(0);
        let record = probe.fetch(&candidate, &key).await.unwrap();
        assert_eq!(record.get("depisode"), Some("Lorne arrives in Bemidji."));
        assert_eq!(record.get("dmovie"), None);
    }

    #[tokio::test]
    async fn falls_back_to_comment_for_movies() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("cd34.json"),
            br#"{"format": {"tags": {"description": "  ", "comment": "A heist."}}}"#,
        )
        .unwrap();

        let probe = ProbeIngest::new(dir.path(), true);
        let key = key("cd34", EntityKind::Movie);
        let candidate = probe.search(&key).await.unwrap().remove(0);
        let record = probe.fetch(&candidate, &key).await.unwrap();
        assert_eq!(record.get("dmovie"), Some("A heist."));
    }

    #[tokio::test]
    async fn missing_file_has_no_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let probe = ProbeIngest::new(dir.path(), true);
        assert!(probe.search(&key("ee", EntityKind::Movie)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_output() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ff.json"), b"[1, 2").unwrap();
        let probe = ProbeIngest::new(dir.path(), true);
        let key = key("ff", EntityKind::Movie);
        let candidate = probe.search(&key).await.unwrap().remove(0);
        assert!(matches!(
            probe.fetch(&candidate, &key).await,
            Err(ProviderError::Malformed { .. })
        ));
    }

    #[test]
    fn only_file_keys_supported() {
        let probe = ProbeIngest::new("/tmp", true);
        assert!(probe.supports(&key("aa", EntityKind::Movie)));
        assert!(!probe.supports(&LookupKey::Movie {
            title: "Heat".into(),
            year: None
        }));
    }
}
