//! Entity-linking records with left and right context.
//!
//! A document's tokens are flattened into one stream, with a `"\n"` text
//! token after every line, and rendered to plain text once. A cursor then
//! walks the stream keeping the byte range of the current token, so each
//! record's contexts are plain slices of that text: everything before the
//! token and everything after it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::corpus::{Corpus, Document};
use crate::error::CorpusResult;
use crate::knowledge::{IdMap, KnowledgeBase};
use crate::markup::Entity;

/// One linked mention with its surrounding text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkingRecord {
    pub id: u64,
    /// Knowledge-base title the mention links to.
    pub label: String,
    /// Page id of `label`.
    pub label_id: u64,
    pub context_left: String,
    pub mention: String,
    pub context_right: String,
}

/// Record ids for one run. Shared by every document so ids never repeat.
#[derive(Debug, Default)]
pub struct RecordIds {
    next: u64,
}

impl RecordIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Items collected once into an overall list and once per primary category.
#[derive(Debug, Clone)]
pub struct CategoryGroups<T> {
    all: Vec<T>,
    by_category: BTreeMap<char, Vec<T>>,
}

impl<T> Default for CategoryGroups<T> {
    fn default() -> Self {
        Self {
            all: Vec::new(),
            by_category: BTreeMap::new(),
        }
    }
}

impl<T: Clone> CategoryGroups<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, category: char, item: T) {
        self.by_category
            .entry(category)
            .or_default()
            .push(item.clone());
        self.all.push(item);
    }

    pub fn all(&self) -> &[T] {
        &self.all
    }

    /// Items of one primary category; empty when the category never occurred.
    pub fn category(&self, category: char) -> &[T] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Categories in sorted order with their items.
    pub fn categories(&self) -> impl Iterator<Item = (char, &[T])> {
        self.by_category
            .iter()
            .map(|(category, items)| (*category, items.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}

/// Records for every entity of `document` whose target has a page id.
pub fn extract_document(
    document: &Document,
    label_ids: &IdMap,
    ids: &mut RecordIds,
) -> Vec<LinkingRecord> {
    let mut stream: Vec<(&str, Option<&Entity>)> = Vec::new();
    for line in &document.lines {
        stream.extend(line.tokens.iter().map(|t| (t.plain(), t.as_entity())));
        stream.push(("\n", None));
    }
    let text: String = stream.iter().map(|(plain, _)| *plain).collect();

    let mut records = Vec::new();
    let mut start = 0;
    for (plain, entity) in &stream {
        let end = start + plain.len();
        let linked = entity
            .filter(|e| e.is_linked())
            .and_then(|e| label_ids.get(&e.target).map(|id| (e, *id)));
        if let Some((entity, label_id)) = linked {
            records.push(LinkingRecord {
                id: ids.next_id(),
                label: entity.target.clone(),
                label_id,
                context_left: text[..start].to_string(),
                mention: entity.mention.clone(),
                context_right: text[end..].to_string(),
            });
        }
        start = end;
    }
    records
}

/// Records for the whole corpus, grouped by primary category.
///
/// Page ids are looked up once per document for its distinct targets.
pub fn extract_corpus(
    corpus: &Corpus,
    kb: &dyn KnowledgeBase,
) -> CorpusResult<CategoryGroups<LinkingRecord>> {
    let mut ids = RecordIds::new();
    let mut groups = CategoryGroups::new();
    for document in corpus.documents() {
        info!("processing {}", document.file_name);
        let label_ids = kb.resolve_ids(&document.linked_targets())?;
        for record in extract_document(document, &label_ids, &mut ids) {
            groups.push(document.primary_category(), record);
        }
    }
    Ok(groups)
}
