//! Dataset curation: entity search and listing, class filtering, and
//! non-ASCII character audit and replacement.
//!
//! Nothing here prints. Search results carry enough for the caller to
//! highlight matches; rewrites produce [`RewrittenDocument`]s written to a
//! fresh output directory.

use std::ops::Range;
use std::path::Path;

use ahash::AHashMap;
use tracing::info;

use crate::corpus::{Corpus, Document, Line};
use crate::error::{CorpusError, CorpusResult};
use crate::markup::{render_entity, Entity, Token, RESERVED_CHARS};
use crate::output::{prepare_output_dir, write_documents, RewrittenDocument};

/// Entity filter for `search`.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Accepted classes; empty accepts any class.
    pub classes: Vec<String>,
    /// Substrings of the target; empty accepts any target.
    pub targets: Vec<String>,
}

impl SearchQuery {
    pub fn matches(&self, entity: &Entity) -> bool {
        (self.classes.is_empty() || self.classes.contains(&entity.class))
            && (self.targets.is_empty()
                || self
                    .targets
                    .iter()
                    .any(|t| entity.target.contains(t.as_str())))
    }

    /// Whether the class was asked for explicitly.
    pub fn selects_class(&self, entity: &Entity) -> bool {
        self.classes.contains(&entity.class)
    }

    /// Byte range in the target of the first searched substring found.
    pub fn target_match(&self, entity: &Entity) -> Option<Range<usize>> {
        self.targets.iter().find_map(|t| {
            entity
                .target
                .find(t.as_str())
                .map(|start| start..start + t.len())
        })
    }
}

/// A line with at least one matching entity.
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    pub document: &'a Document,
    pub line: &'a Line,
}

pub fn search<'a>(corpus: &'a Corpus, query: &SearchQuery) -> Vec<SearchHit<'a>> {
    corpus
        .lines()
        .filter(|(_, line)| line.entities().any(|e| query.matches(e)))
        .map(|(document, line)| SearchHit { document, line })
        .collect()
}

/// An entity with its position in the corpus.
#[derive(Debug, Clone, Copy)]
pub struct EntityListing<'a> {
    pub document: &'a Document,
    pub line: &'a Line,
    pub entity: &'a Entity,
}

/// Every entity whose class is in `classes`. An empty selection lists nothing.
pub fn list_entities<'a>(corpus: &'a Corpus, classes: &[String]) -> Vec<EntityListing<'a>> {
    corpus
        .lines()
        .flat_map(|(document, line)| {
            line.entities().map(move |entity| EntityListing {
                document,
                line,
                entity,
            })
        })
        .filter(|listing| classes.contains(&listing.entity.class))
        .collect()
}

/// Replace entities of the excluded classes with their mention text.
pub fn filter_classes(document: &Document, exclude: &[String]) -> RewrittenDocument {
    let lines: Vec<String> = document
        .lines
        .iter()
        .map(|line| {
            line.tokens
                .iter()
                .map(|token| match token {
                    Token::Entity(entity) if exclude.contains(&entity.class) => {
                        entity.mention.as_str()
                    }
                    other => other.raw(),
                })
                .collect()
        })
        .collect();
    RewrittenDocument {
        file_name: document.file_name.clone(),
        lines,
    }
}

/// Write a filtered copy of the corpus into `out`, which must be new or empty.
pub fn filter_into(corpus: &Corpus, exclude: &[String], out: &Path) -> CorpusResult<()> {
    prepare_output_dir(out)?;
    let documents: Vec<_> = corpus
        .documents()
        .map(|doc| filter_classes(doc, exclude))
        .collect();
    write_documents(out, &documents)?;
    info!("filtered {} documents into {}", documents.len(), out.display());
    Ok(())
}

/// Fields of a token that character tools look at.
fn scanned_fields(token: &Token, include_targets: bool) -> Vec<&str> {
    match token {
        Token::Text(text) => vec![text.as_str()],
        Token::Entity(entity) if include_targets => {
            vec![entity.mention.as_str(), entity.class.as_str(), entity.target.as_str()]
        }
        Token::Entity(entity) => vec![entity.mention.as_str()],
    }
}

/// Non-ASCII character frequencies plus a lookup for requested characters.
#[derive(Debug, Clone)]
pub struct CharAudit {
    wanted: Vec<char>,
    include_targets: bool,
    counts: AHashMap<char, usize>,
}

impl CharAudit {
    pub fn new(chars: &str, include_targets: bool) -> Self {
        Self {
            wanted: chars.chars().collect(),
            include_targets,
            counts: AHashMap::new(),
        }
    }

    pub fn include_targets(&self) -> bool {
        self.include_targets
    }

    /// Requested and non-ASCII. ASCII characters are never reported.
    pub fn is_wanted(&self, c: char) -> bool {
        !c.is_ascii() && self.wanted.contains(&c)
    }

    /// Count the non-ASCII characters of a line; true if any is requested.
    pub fn scan_line(&mut self, line: &Line) -> bool {
        let mut hit = false;
        for token in &line.tokens {
            for field in scanned_fields(token, self.include_targets) {
                for c in field.chars().filter(|c| !c.is_ascii()) {
                    *self.counts.entry(c).or_insert(0) += 1;
                    hit |= self.wanted.contains(&c);
                }
            }
        }
        hit
    }

    /// Lines of the corpus holding a requested character. Counts everything.
    pub fn scan<'a>(&mut self, corpus: &'a Corpus) -> Vec<SearchHit<'a>> {
        corpus
            .lines()
            .filter(|(_, line)| self.scan_line(line))
            .map(|(document, line)| SearchHit { document, line })
            .collect()
    }

    /// Most frequent first, ties by code point.
    pub fn frequencies(&self) -> Vec<(char, usize)> {
        let mut counts: Vec<_> = self.counts.iter().map(|(c, n)| (*c, *n)).collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        counts
    }
}

/// One-to-one character mapping plus deletion.
#[derive(Debug, Clone)]
pub struct CharReplacer {
    mapping: Vec<(char, char)>,
    delete: Vec<char>,
    include_targets: bool,
    counts: AHashMap<char, usize>,
}

impl CharReplacer {
    pub fn new(
        search: &str,
        replace: &str,
        delete: &str,
        include_targets: bool,
    ) -> CorpusResult<Self> {
        let search: Vec<char> = search.chars().collect();
        let replace: Vec<char> = replace.chars().collect();
        if search.len() != replace.len() {
            return Err(CorpusError::invalid(format!(
                "search has {} characters but replace has {}",
                search.len(),
                replace.len()
            )));
        }
        if let Some(c) = replace.iter().find(|c| RESERVED_CHARS.contains(*c)) {
            return Err(CorpusError::invalid(format!(
                "replacement {c:?} would break entity markup"
            )));
        }

        let mut mapping: Vec<(char, char)> = Vec::with_capacity(search.len());
        for (from, to) in search.into_iter().zip(replace) {
            match mapping.iter_mut().find(|(f, _)| *f == from) {
                Some(pair) => pair.1 = to,
                None => mapping.push((from, to)),
            }
        }
        let mut deleted: Vec<char> = Vec::new();
        for c in delete.chars() {
            if !deleted.contains(&c) {
                deleted.push(c);
            }
        }

        Ok(Self {
            mapping,
            delete: deleted,
            include_targets,
            counts: AHashMap::new(),
        })
    }

    /// Apply to one string. Deletion wins over mapping.
    pub fn apply(&mut self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            if self.delete.contains(&c) {
                *self.counts.entry(c).or_insert(0) += 1;
            } else if let Some((_, to)) = self.mapping.iter().find(|(from, _)| *from == c) {
                *self.counts.entry(c).or_insert(0) += 1;
                out.push(*to);
            } else {
                out.push(c);
            }
        }
        out
    }

    fn rewrite_token(&mut self, token: &Token) -> String {
        match token {
            Token::Text(text) => self.apply(text),
            Token::Entity(entity) => {
                let mention = self.apply(&entity.mention);
                if self.include_targets {
                    let class = self.apply(&entity.class);
                    let target = self.apply(&entity.target);
                    render_entity(&mention, &class, &target)
                } else {
                    render_entity(&mention, &entity.class, &entity.target)
                }
            }
        }
    }

    pub fn rewrite_document(&mut self, document: &Document) -> RewrittenDocument {
        let mut lines = Vec::with_capacity(document.lines.len());
        for line in &document.lines {
            let mut rendered = String::with_capacity(line.raw.len());
            for token in &line.tokens {
                rendered.push_str(&self.rewrite_token(token));
            }
            lines.push(rendered);
        }
        RewrittenDocument {
            file_name: document.file_name.clone(),
            lines,
        }
    }

    /// Write a rewritten copy of the corpus into `out`, which must be new or empty.
    pub fn rewrite_into(&mut self, corpus: &Corpus, out: &Path) -> CorpusResult<()> {
        prepare_output_dir(out)?;
        let documents: Vec<_> = corpus
            .documents()
            .map(|doc| self.rewrite_document(doc))
            .collect();
        write_documents(out, &documents)
    }

    /// `(from, to, count)` in the order given.
    pub fn replacements(&self) -> Vec<(char, char, usize)> {
        self.mapping
            .iter()
            .map(|(from, to)| (*from, *to, self.count(*from)))
            .collect()
    }

    /// `(char, count)` in the order given.
    pub fn deletions(&self) -> Vec<(char, usize)> {
        self.delete.iter().map(|c| (*c, self.count(*c))).collect()
    }

    fn count(&self, c: char) -> usize {
        self.counts.get(&c).copied().unwrap_or(0)
    }
}

/// Decode `\uXXXX`, `\UXXXXXXXX`, `\xXX`, `\n`, `\t` and `\\` escapes.
pub fn decode_unicode_escapes(input: &str) -> CorpusResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let width = match chars.next() {
            Some('\\') => {
                out.push('\\');
                continue;
            }
            Some('n') => {
                out.push('\n');
                continue;
            }
            Some('t') => {
                out.push('\t');
                continue;
            }
            Some('x') => 2,
            Some('u') => 4,
            Some('U') => 8,
            Some(other) => return Err(CorpusError::invalid(format!("unknown escape \\{other}"))),
            None => return Err(CorpusError::invalid("trailing backslash")),
        };
        let hex: String = chars.by_ref().take(width).collect();
        let decoded = (hex.len() == width)
            .then(|| u32::from_str_radix(&hex, 16).ok())
            .flatten()
            .and_then(char::from_u32)
            .ok_or_else(|| CorpusError::invalid(format!("invalid escape value {hex:?}")))?;
        out.push(decoded);
    }
    Ok(out)
}
