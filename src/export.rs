//! Evaluation exports.
//!
//! - Span documents for NER evaluation: `{"text": ..., "entities": [[start, end, class], ...]}`
//!   with character offsets into the plain text, one JSON array for the corpus.
//! - Linking records for entity-linking evaluation, one JSON object per line.
//!
//! Either export goes to a single file, or with `split` to a directory
//! holding `0.<ext>` with everything plus one file per primary category.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::corpus::{Corpus, Document};
use crate::error::{CorpusError, CorpusResult};
use crate::knowledge::KnowledgeBase;
use crate::linking::{extract_corpus, CategoryGroups, LinkingRecord};
use crate::output::{ensure_new_file, prepare_output_dir};

/// Split-file name of the group holding every document.
pub const ALL_GROUP: char = '0';

/// Plain text of a document with typed character spans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanDocument {
    pub text: String,
    /// `(start, end, class)` in characters, end exclusive.
    pub entities: Vec<(usize, usize, String)>,
}

impl SpanDocument {
    /// Plain text with `\n` after every line. Offsets count chars, not bytes.
    pub fn from_document(document: &Document) -> Self {
        let mut text = String::new();
        let mut offset = 0;
        let mut entities = Vec::new();
        for line in &document.lines {
            for token in &line.tokens {
                let plain = token.plain();
                let len = plain.chars().count();
                if let Some(entity) = token.as_entity() {
                    entities.push((offset, offset + len, entity.class.clone()));
                }
                text.push_str(plain);
                offset += len;
            }
            text.push('\n');
            offset += 1;
        }
        Self { text, entities }
    }
}

/// Serialization layout of an export file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// One JSON array.
    JsonArray,
    /// One JSON value per line.
    JsonLines,
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Format::JsonArray => "json",
            Format::JsonLines => "jsonl",
        }
    }

    pub fn write<T: Serialize>(self, path: &Path, items: &[T]) -> CorpusResult<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        match self {
            Format::JsonArray => serde_json::to_writer(&mut writer, items)?,
            Format::JsonLines => {
                for item in items {
                    serde_json::to_writer(&mut writer, item)?;
                    writer.write_all(b"\n")?;
                }
            }
        }
        writer.flush()?;
        Ok(())
    }
}

/// Check the export target before any work is done.
///
/// A single-file target must not exist; a split target directory is created
/// when missing and must be empty.
pub fn prepare_destination(target: &Path, split: bool) -> CorpusResult<()> {
    if split {
        prepare_output_dir(target)
    } else {
        ensure_new_file(target)
    }
}

/// Write grouped items; returns the files written.
pub fn write_groups<T: Serialize + Clone>(
    groups: &CategoryGroups<T>,
    target: &Path,
    split: bool,
    format: Format,
) -> CorpusResult<Vec<PathBuf>> {
    if !split {
        format.write(target, groups.all())?;
        return Ok(vec![target.to_path_buf()]);
    }

    let ext = format.extension();
    if !groups.category(ALL_GROUP).is_empty() {
        return Err(CorpusError::DestinationConflict(
            target.join(format!("{ALL_GROUP}.{ext}")),
        ));
    }

    let mut written = Vec::new();
    let all = target.join(format!("{ALL_GROUP}.{ext}"));
    format.write(&all, groups.all())?;
    written.push(all);
    for (category, items) in groups.categories() {
        let path = target.join(format!("{category}.{ext}"));
        format.write(&path, items)?;
        written.push(path);
    }
    Ok(written)
}

/// Span documents of the whole corpus.
pub fn span_corpus(corpus: &Corpus) -> CategoryGroups<SpanDocument> {
    let mut groups = CategoryGroups::new();
    for document in corpus.documents() {
        groups.push(document.primary_category(), SpanDocument::from_document(document));
    }
    groups
}

/// Export span documents as a JSON array.
pub fn export_spans(
    corpus: &Corpus,
    target: &Path,
    split: bool,
) -> CorpusResult<CategoryGroups<SpanDocument>> {
    prepare_destination(target, split)?;
    let groups = span_corpus(corpus);
    for path in write_groups(&groups, target, split, Format::JsonArray)? {
        info!("wrote {}", path.display());
    }
    Ok(groups)
}

/// Export linking records as JSON lines.
pub fn export_linking(
    corpus: &Corpus,
    kb: &dyn KnowledgeBase,
    target: &Path,
    split: bool,
) -> CorpusResult<CategoryGroups<LinkingRecord>> {
    prepare_destination(target, split)?;
    let groups = extract_corpus(corpus, kb)?;
    for path in write_groups(&groups, target, split, Format::JsonLines)? {
        info!("wrote {}", path.display());
    }
    Ok(groups)
}
