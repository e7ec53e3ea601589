//! Knowledge-base lookups for link targets.
//!
//! Two questions are asked of the knowledge base, always in bulk for one
//! document's distinct targets:
//!
//! - [`KnowledgeBase::resolve_targets`]: does the title exist, what is its
//!   canonical spelling, and where does it redirect to.
//! - [`KnowledgeBase::resolve_ids`]: the numeric page id of each title that
//!   names an existing page.
//!
//! [`Snapshot`] answers from an in-memory table (loadable from JSON) and
//! [`Wikipedia`] from the MediaWiki Action API. Both resolve a title the
//! same way: normalization first, then one redirect hop, and the title exists
//! when the final destination is a known page.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::time::Duration;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::WikipediaConfig;
use crate::error::{CorpusError, CorpusResult};

/// Resolution state of one link target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetResolution {
    pub exists: bool,
    /// Canonical spelling of the requested title.
    pub normalized: String,
    /// Redirect destination; equals `normalized` when there is no redirect.
    pub redirect: String,
}

impl TargetResolution {
    pub fn is_redirect(&self) -> bool {
        self.redirect != self.normalized
    }
}

/// Requested title -> resolution.
pub type TargetMap = AHashMap<String, TargetResolution>;

/// Requested title -> page id. Unknown titles are absent.
pub type IdMap = AHashMap<String, u64>;

/// Source of truth for link targets.
///
/// Both lookups return an empty map for an empty request without reaching
/// the backend.
pub trait KnowledgeBase {
    /// One entry per requested title; missing pages get `exists == false`.
    fn resolve_targets(&self, titles: &BTreeSet<String>) -> CorpusResult<TargetMap>;

    /// Page ids of titles that name an existing page as written.
    fn resolve_ids(&self, titles: &BTreeSet<String>) -> CorpusResult<IdMap>;
}

/// Offline knowledge base.
///
/// ```json
/// {
///   "pages": {"Paris": 22989, "New York City": 645042},
///   "normalized": {"paris": "Paris"},
///   "redirects": {"NYC": "New York City"}
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Existing page title -> page id.
    #[serde(default)]
    pub pages: BTreeMap<String, u64>,
    /// Raw title -> canonical title.
    #[serde(default)]
    pub normalized: BTreeMap<String, String>,
    /// Canonical title -> redirect destination.
    #[serde(default)]
    pub redirects: BTreeMap<String, String>,
}

impl Snapshot {
    /// Load a snapshot from a JSON file.
    pub fn load(path: &Path) -> CorpusResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CorpusError::Config(format!(
                "cannot read knowledge-base snapshot {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn with_page(mut self, title: impl Into<String>, id: u64) -> Self {
        self.pages.insert(title.into(), id);
        self
    }

    pub fn with_normalization(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.normalized.insert(from.into(), to.into());
        self
    }

    pub fn with_redirect(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.redirects.insert(from.into(), to.into());
        self
    }

    /// Normalize, follow one redirect, check the destination.
    pub fn resolve(&self, title: &str) -> TargetResolution {
        let normalized = self
            .normalized
            .get(title)
            .cloned()
            .unwrap_or_else(|| title.to_string());
        let redirect = self
            .redirects
            .get(&normalized)
            .cloned()
            .unwrap_or_else(|| normalized.clone());
        let exists = self.pages.contains_key(&redirect);
        TargetResolution {
            exists,
            normalized,
            redirect,
        }
    }
}

impl KnowledgeBase for Snapshot {
    fn resolve_targets(&self, titles: &BTreeSet<String>) -> CorpusResult<TargetMap> {
        Ok(titles
            .iter()
            .map(|title| (title.clone(), self.resolve(title)))
            .collect())
    }

    fn resolve_ids(&self, titles: &BTreeSet<String>) -> CorpusResult<IdMap> {
        Ok(titles
            .iter()
            .filter_map(|title| self.pages.get(title).map(|id| (title.clone(), *id)))
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    query: Option<ApiQuery>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiQuery {
    #[serde(default)]
    normalized: Vec<TitleMapping>,
    #[serde(default)]
    redirects: Vec<TitleMapping>,
    /// Keyed by page id; missing and invalid titles get negative ids.
    #[serde(default)]
    pages: BTreeMap<String, ApiPage>,
}

#[derive(Debug, Deserialize)]
struct TitleMapping {
    from: String,
    to: String,
}

#[derive(Debug, Deserialize)]
struct ApiPage {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    info: String,
}

impl ApiQuery {
    /// Merge one response into a snapshot table.
    fn merge_into(self, snapshot: &mut Snapshot) {
        for mapping in self.normalized {
            snapshot.normalized.insert(mapping.from, mapping.to);
        }
        for mapping in self.redirects {
            snapshot.redirects.insert(mapping.from, mapping.to);
        }
        for (key, page) in self.pages {
            match key.parse::<i64>() {
                Ok(id) if id > 0 => {
                    snapshot.pages.insert(page.title, id as u64);
                }
                _ => {}
            }
        }
    }
}

/// MediaWiki Action API client.
pub struct Wikipedia {
    client: reqwest::blocking::Client,
    endpoint: String,
    batch_size: usize,
}

impl Wikipedia {
    pub fn new(config: &WikipediaConfig) -> CorpusResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(CorpusError::resolver)?;
        Ok(Self {
            client,
            endpoint: config.api_url(),
            batch_size: config.batch_size.max(1),
        })
    }

    /// Query all titles, `batch_size` at a time, into one table.
    fn fetch(&self, titles: &BTreeSet<String>, follow_redirects: bool) -> CorpusResult<Snapshot> {
        let titles: Vec<&str> = titles.iter().map(String::as_str).collect();
        let mut table = Snapshot::default();
        for batch in titles.chunks(self.batch_size) {
            debug!("querying {} for {} titles", self.endpoint, batch.len());
            self.query(batch, follow_redirects)?.merge_into(&mut table);
        }
        Ok(table)
    }

    fn query(&self, titles: &[&str], follow_redirects: bool) -> CorpusResult<ApiQuery> {
        let joined = titles.join("|");
        let mut params = vec![
            ("format", "json"),
            ("action", "query"),
            ("titles", joined.as_str()),
        ];
        if follow_redirects {
            params.push(("prop", "info"));
            params.push(("redirects", "1"));
        }

        let response: ApiResponse = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json::<ApiResponse>())
            .map_err(CorpusError::resolver)?;

        if let Some(error) = response.error {
            return Err(CorpusError::ResolverUnavailable(format!(
                "{}: {}",
                error.code, error.info
            )));
        }
        Ok(response.query.unwrap_or_default())
    }
}

impl KnowledgeBase for Wikipedia {
    fn resolve_targets(&self, titles: &BTreeSet<String>) -> CorpusResult<TargetMap> {
        if titles.is_empty() {
            return Ok(TargetMap::new());
        }
        self.fetch(titles, true)?.resolve_targets(titles)
    }

    fn resolve_ids(&self, titles: &BTreeSet<String>) -> CorpusResult<IdMap> {
        if titles.is_empty() {
            return Ok(IdMap::new());
        }
        self.fetch(titles, false)?.resolve_ids(titles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titles(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn snapshot() -> Snapshot {
        Snapshot::default()
            .with_page("Paris", 22989)
            .with_page("New York City", 645042)
            .with_page("NYC", 1)
            .with_normalization("paris", "Paris")
            .with_redirect("NYC", "New York City")
    }

    #[test]
    fn test_resolve_plain_page() {
        let resolution = snapshot().resolve("Paris");
        assert!(resolution.exists);
        assert_eq!(resolution.normalized, "Paris");
        assert!(!resolution.is_redirect());
    }

    #[test]
    fn test_resolve_normalization_and_redirect() {
        let kb = snapshot();
        assert_eq!(kb.resolve("paris").normalized, "Paris");
        assert!(kb.resolve("paris").exists);

        let nyc = kb.resolve("NYC");
        assert!(nyc.is_redirect());
        assert_eq!(nyc.redirect, "New York City");
        assert!(nyc.exists);

        let missing = kb.resolve("Atlantis");
        assert!(!missing.exists);
        assert_eq!(missing.redirect, "Atlantis");
    }

    #[test]
    fn test_resolve_targets_covers_every_title() {
        let map = snapshot()
            .resolve_targets(&titles(&["paris", "Atlantis"]))
            .unwrap();
        assert_eq!(map.len(), 2);
        assert!(!map["Atlantis"].exists);
        assert!(snapshot().resolve_targets(&BTreeSet::new()).unwrap().is_empty());
    }

    #[test]
    fn test_resolve_ids_omits_unknown_titles() {
        let ids = snapshot()
            .resolve_ids(&titles(&["Paris", "paris", "Atlantis"]))
            .unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids["Paris"], 22989);
    }

    #[test]
    fn test_snapshot_load_from_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kb.json");
        fs::write(
            &path,
            r#"{"pages": {"Paris": 22989}, "redirects": {"Lutetia": "Paris"}}"#,
        )
        .unwrap();

        let kb = Snapshot::load(&path).unwrap();
        assert!(kb.normalized.is_empty());
        let lutetia = kb.resolve("Lutetia");
        assert!(lutetia.exists);
        assert_eq!(lutetia.redirect, "Paris");

        assert!(matches!(
            Snapshot::load(&dir.path().join("absent.json")),
            Err(CorpusError::Config(_))
        ));
    }

    #[test]
    fn test_api_response_merge() {
        let body = r#"{
            "batchcomplete": "",
            "query": {
                "normalized": [{"from": "paris", "to": "Paris"}],
                "redirects": [{"from": "NYC", "to": "New York City"}],
                "pages": {
                    "22989": {"pageid": 22989, "ns": 0, "title": "Paris"},
                    "645042": {"pageid": 645042, "ns": 0, "title": "New York City"},
                    "-1": {"ns": 0, "title": "Atlantis Xyz", "missing": ""}
                }
            }
        }"#;
        let response: ApiResponse = serde_json::from_str(body).unwrap();
        let mut table = Snapshot::default();
        response.query.unwrap().merge_into(&mut table);

        assert_eq!(table.pages.len(), 2);
        let map = table
            .resolve_targets(&titles(&["paris", "NYC", "Atlantis Xyz"]))
            .unwrap();
        assert_eq!(map["paris"].normalized, "Paris");
        assert!(map["NYC"].is_redirect());
        assert!(map["NYC"].exists);
        assert!(!map["Atlantis Xyz"].exists);
    }

    #[test]
    fn test_batches_merge_into_one_table() {
        let first: ApiQuery = serde_json::from_str(
            r#"{
                "normalized": [{"from": "paris", "to": "Paris"}],
                "pages": {
                    "22989": {"title": "Paris"},
                    "-1": {"title": "Atlantis", "missing": ""}
                }
            }"#,
        )
        .unwrap();
        let second: ApiQuery = serde_json::from_str(
            r#"{
                "redirects": [{"from": "NYC", "to": "New York City"}],
                "pages": {"645042": {"title": "New York City"}}
            }"#,
        )
        .unwrap();

        let mut table = Snapshot::default();
        first.merge_into(&mut table);
        second.merge_into(&mut table);

        assert_eq!(table.pages.len(), 2);
        let map = table
            .resolve_targets(&titles(&["paris", "NYC", "Atlantis"]))
            .unwrap();
        assert_eq!(map["paris"].normalized, "Paris");
        assert!(map["paris"].exists);
        assert_eq!(map["NYC"].redirect, "New York City");
        assert!(map["NYC"].exists);
        assert!(!map["Atlantis"].exists);

        let ids = table
            .resolve_ids(&titles(&["Paris", "New York City"]))
            .unwrap();
        assert_eq!(ids["Paris"], 22989);
        assert_eq!(ids["New York City"], 645042);
    }

    #[test]
    fn test_api_error_response() {
        let body = r#"{"error": {"code": "toomanyvalues", "info": "Too many values"}}"#;
        let response: ApiResponse = serde_json::from_str(body).unwrap();
        assert!(response.query.is_none());
        assert_eq!(response.error.unwrap().code, "toomanyvalues");
    }

    #[test]
    fn test_wikipedia_empty_request_makes_no_call() {
        let config = WikipediaConfig {
            endpoint: "http://127.0.0.1:9/w/api.php".to_string(),
            ..WikipediaConfig::default()
        };
        let kb = Wikipedia::new(&config).unwrap();
        assert!(kb.resolve_targets(&BTreeSet::new()).unwrap().is_empty());
        assert!(kb.resolve_ids(&BTreeSet::new()).unwrap().is_empty());
    }
}
