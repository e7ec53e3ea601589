//! Dataset loading: one document per `<category>_<serial>.txt` file.
//!
//! [`Corpus::load`] takes a snapshot of a directory. Everything after that
//! works on the in-memory copy, so iterating documents or lines twice yields
//! the same sequence without touching the filesystem again.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{CorpusError, CorpusResult};
use crate::markup::{self, Entity, MarkupError, Token};

/// One physical line of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    /// 1-based line number.
    pub number: usize,
    pub raw: String,
    pub tokens: Vec<Token>,
    pub plain_text: String,
}

impl Line {
    pub fn parse(number: usize, raw: &str) -> Result<Self, MarkupError> {
        let parsed = markup::parse_line(raw)?;
        Ok(Self {
            number,
            raw: raw.to_string(),
            tokens: parsed.tokens,
            plain_text: parsed.plain_text,
        })
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.tokens.iter().filter_map(Token::as_entity)
    }
}

/// A parsed dataset file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub file_name: String,
    pub category: String,
    pub serial: String,
    pub lines: Vec<Line>,
}

impl Document {
    /// Parse file content. Lines are split on `\n` only, so a `\r` stays part
    /// of its line and survives rewriting.
    pub fn parse(file_name: &str, content: &str) -> CorpusResult<Self> {
        let (category, serial) = split_file_name(file_name)?;

        let mut lines = Vec::new();
        for (i, raw) in content.split_inclusive('\n').enumerate() {
            let raw = raw.strip_suffix('\n').unwrap_or(raw);
            let line = Line::parse(i + 1, raw).map_err(|source| CorpusError::Markup {
                file: file_name.to_string(),
                line: i + 1,
                source,
            })?;
            lines.push(line);
        }

        Ok(Self {
            file_name: file_name.to_string(),
            category,
            serial,
            lines,
        })
    }

    /// First character of the category. Subcategories collapse onto it.
    pub fn primary_category(&self) -> char {
        // Non-empty by construction, see `split_file_name`.
        self.category.chars().next().unwrap_or('_')
    }

    /// Entities of every line, in document order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.lines.iter().flat_map(Line::entities)
    }

    /// Distinct non-empty targets.
    pub fn linked_targets(&self) -> BTreeSet<String> {
        self.entities()
            .filter(|e| e.is_linked())
            .map(|e| e.target.clone())
            .collect()
    }
}

/// The ordered set of documents found in one directory.
#[derive(Debug, Clone)]
pub struct Corpus {
    documents: Vec<Document>,
}

impl Corpus {
    /// Read and tokenize every regular file directly inside `dir`.
    pub fn load(dir: &Path) -> CorpusResult<Self> {
        let mut documents = Vec::new();
        for name in list_files(dir)? {
            let content = fs::read_to_string(dir.join(&name))?;
            let document = Document::parse(&name, &content)?;
            debug!(
                "loaded {} ({} lines, {} entities)",
                name,
                document.lines.len(),
                document.entities().count()
            );
            documents.push(document);
        }
        Ok(Self { documents })
    }

    pub fn from_documents(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn documents(&self) -> std::slice::Iter<'_, Document> {
        self.documents.iter()
    }

    /// Every line of every document, paired with its document.
    pub fn lines(&self) -> impl Iterator<Item = (&Document, &Line)> {
        self.documents
            .iter()
            .flat_map(|doc| doc.lines.iter().map(move |line| (doc, line)))
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.documents.iter().flat_map(Document::entities)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

/// Split `<category>_<serial>[.txt]` on the first underscore.
pub fn split_file_name(file_name: &str) -> CorpusResult<(String, String)> {
    let stem = file_name.strip_suffix(".txt").unwrap_or(file_name);
    match stem.split_once('_') {
        Some((category, serial)) if !category.is_empty() => {
            Ok((category.to_string(), serial.to_string()))
        }
        _ => Err(CorpusError::FileNaming(file_name.to_string())),
    }
}

/// Regular files directly inside `dir`, in natural order.
fn list_files(dir: &Path) -> CorpusResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        match entry.file_name().to_str() {
            Some(name) => names.push(name.to_string()),
            None => {
                return Err(CorpusError::FileNaming(
                    entry.file_name().to_string_lossy().into_owned(),
                ))
            }
        }
    }
    names.sort_by(|a, b| natural_cmp(a, b));
    Ok(names)
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum KeyPart<'a> {
    Text(&'a str),
    Number(Digits<'a>),
}

/// A run of ASCII digits with leading zeros stripped.
#[derive(Debug, PartialEq, Eq)]
struct Digits<'a>(&'a str);

impl Ord for Digits<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(other.0))
    }
}

impl PartialOrd for Digits<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Alternating text/number runs, always starting with a (possibly empty)
/// text run so runs of the same kind line up between keys.
fn natural_key(s: &str) -> Vec<KeyPart<'_>> {
    fn part(run: &str, digits: bool) -> KeyPart<'_> {
        if digits {
            KeyPart::Number(Digits(run.trim_start_matches('0')))
        } else {
            KeyPart::Text(run)
        }
    }

    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_digits = false;
    for (i, c) in s.char_indices() {
        let digit = c.is_ascii_digit();
        if digit != in_digits {
            parts.push(part(&s[start..i], in_digits));
            start = i;
            in_digits = digit;
        }
    }
    parts.push(part(&s[start..], in_digits));
    parts
}

/// Human ordering: digit runs compare by value, text runs lexically.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    natural_key(a)
        .cmp(&natural_key(b))
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) {
        fs::write(dir.path().join(name), content).unwrap();
    }

    #[test]
    fn test_natural_cmp() {
        let mut names = vec!["f_2.txt", "f_10.txt", "f_1.txt"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["f_1.txt", "f_2.txt", "f_10.txt"]);

        assert_eq!(natural_cmp("a_007.txt", "a_7.txt"), Ordering::Less);
        assert_eq!(natural_cmp("b_1.txt", "a_2.txt"), Ordering::Greater);
        assert_eq!(natural_cmp("x9", "x10"), Ordering::Less);
        assert_eq!(natural_cmp("10", "9"), Ordering::Greater);
    }

    #[test]
    fn test_split_file_name() {
        assert_eq!(
            split_file_name("news_12.txt").unwrap(),
            ("news".to_string(), "12".to_string())
        );
        assert_eq!(
            split_file_name("sci_tech_3.txt").unwrap(),
            ("sci".to_string(), "tech_3".to_string())
        );
        assert!(matches!(
            split_file_name("readme.txt"),
            Err(CorpusError::FileNaming(_))
        ));
        assert!(matches!(
            split_file_name("_1.txt"),
            Err(CorpusError::FileNaming(_))
        ));
    }

    #[test]
    fn test_document_parse() {
        let doc = Document::parse(
            "news_1.txt",
            "Hello {{Paris|LOC|Paris}} world.\n{{Bob|PER|}} left\n",
        )
        .unwrap();
        assert_eq!(doc.category, "news");
        assert_eq!(doc.serial, "1");
        assert_eq!(doc.primary_category(), 'n');
        assert_eq!(doc.lines.len(), 2);
        assert_eq!(doc.lines[0].number, 1);
        assert_eq!(doc.lines[1].number, 2);
        assert_eq!(doc.lines[1].raw, "{{Bob|PER|}} left");
        assert_eq!(doc.entities().count(), 2);
        assert_eq!(
            doc.linked_targets().into_iter().collect::<Vec<_>>(),
            vec!["Paris".to_string()]
        );
    }

    #[test]
    fn test_document_parse_keeps_last_line_without_newline() {
        let doc = Document::parse("a_1.txt", "one\r\ntwo").unwrap();
        assert_eq!(doc.lines.len(), 2);
        assert_eq!(doc.lines[0].raw, "one\r");
        assert_eq!(doc.lines[1].raw, "two");

        let empty = Document::parse("a_2.txt", "").unwrap();
        assert!(empty.lines.is_empty());
    }

    #[test]
    fn test_load_orders_files_naturally() {
        let dir = TempDir::new().unwrap();
        write(&dir, "f_2.txt", "two\n");
        write(&dir, "f_10.txt", "ten\n");
        write(&dir, "f_1.txt", "one\n");
        fs::create_dir(dir.path().join("nested")).unwrap();

        let corpus = Corpus::load(dir.path()).unwrap();
        let names: Vec<_> = corpus.documents().map(|d| d.file_name.as_str()).collect();
        assert_eq!(names, vec!["f_1.txt", "f_2.txt", "f_10.txt"]);
        assert_eq!(corpus.len(), 3);
    }

    #[test]
    fn test_load_rejects_bad_file_name() {
        let dir = TempDir::new().unwrap();
        write(&dir, "f_1.txt", "ok\n");
        write(&dir, "notes.txt", "no separator\n");

        let err = Corpus::load(dir.path()).unwrap_err();
        assert!(matches!(err, CorpusError::FileNaming(name) if name == "notes.txt"));
    }

    #[test]
    fn test_load_reports_malformed_line() {
        let dir = TempDir::new().unwrap();
        write(&dir, "f_1.txt", "fine\nbad {{x|Y}} here\n");

        match Corpus::load(dir.path()).unwrap_err() {
            CorpusError::Markup { file, line, .. } => {
                assert_eq!(file, "f_1.txt");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_load_rejects_non_utf8_file_name() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        write(&dir, "f_1.txt", "ok\n");
        let name = OsStr::from_bytes(b"f_\xff.txt");
        if fs::write(dir.path().join(name), "x\n").is_err() {
            // Filesystem refuses non-UTF-8 names.
            return;
        }

        let err = Corpus::load(dir.path()).unwrap_err();
        assert!(matches!(err, CorpusError::FileNaming(name) if name == "f_\u{FFFD}.txt"));
    }

    #[test]
    fn test_lines_iterator_is_restartable() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a_1.txt", "x\ny\n");
        write(&dir, "a_2.txt", "z\n");

        let corpus = Corpus::load(dir.path()).unwrap();
        let first: Vec<_> = corpus
            .lines()
            .map(|(doc, line)| (doc.file_name.clone(), line.number))
            .collect();
        let second: Vec<_> = corpus
            .lines()
            .map(|(doc, line)| (doc.file_name.clone(), line.number))
            .collect();
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![
                ("a_1.txt".to_string(), 1),
                ("a_1.txt".to_string(), 2),
                ("a_2.txt".to_string(), 1),
            ]
        );
    }
}
