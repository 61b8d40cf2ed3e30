//! Uploaded documents: storage, transcript extraction and chapter streaming.
//!
//! Format parsing sits behind [`DocumentExtractor`]; the synthesis pipeline only
//! ever sees the resulting transcript text.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DocumentError;
use crate::text::segment;

/// Number of artificial chapters for documents without headings.
const FALLBACK_CHAPTERS: usize = 10;

/// A chapter as a global word range of the document transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub start_word: usize,
    pub end_word: usize,
}

/// Transcript and chapter list of a document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedDocument {
    pub title: String,
    pub text: String,
    pub chapters: Vec<Chapter>,
}

impl ExtractedDocument {
    /// Transcript text of one chapter.
    pub fn chapter_text(&self, chapter_id: &str) -> Result<String, DocumentError> {
        let chapter = self.chapters.iter().find(|c| c.id == chapter_id).ok_or_else(|| DocumentError::ChapterNotFound(chapter_id.to_string()))?;
        let words: Vec<&str> = self.text.split_whitespace().collect();
        let end = chapter.end_word.min(words.len());
        let start = chapter.start_word.min(end);
        Ok(words[start..end].join(" "))
    }
}

/// Turns a stored file into transcript text and chapters.
pub trait DocumentExtractor: Send + Sync {
    /// Whether this extractor handles files with `extension` (lowercase, no dot).
    fn supports(&self, extension: &str) -> bool;

    fn extract(&self, path: &Path) -> Result<ExtractedDocument, DocumentError>;
}

/// Plain text, markdown and (X)HTML documents.
pub struct TextExtractor {
    heading: Regex,     // Lines that open a chapter
    block_break: Regex, // Block-level HTML boundaries
    tag: Regex,         // Any remaining HTML tag
}

impl TextExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            heading: Regex::new(r"(?i)^\s*#*\s*chapter\b")?,
            block_break: Regex::new(r"(?i)<br\s*/?>|</(p|div|h[1-6]|li|section|title)\s*>")?,
            tag: Regex::new(r"<[^>]*>")?,
        })
    }

    fn strip_markup(&self, html: &str) -> String {
        let text = self.block_break.replace_all(html, "\n");
        let text = self.tag.replace_all(&text, " ");
        text.replace("&nbsp;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&amp;", "&")
    }

    /// Collapse whitespace and detect chapters on the raw lines.
    fn build(&self, title: String, raw: &str) -> ExtractedDocument {
        let mut words: Vec<&str> = Vec::new();
        let mut headings: Vec<(String, usize)> = Vec::new();

        for line in raw.lines() {
            if self.heading.is_match(line) {
                let heading = line.trim().trim_start_matches('#').trim().to_string();
                headings.push((heading, words.len()));
            }
            words.extend(line.split_whitespace());
        }

        let total = words.len();
        let chapters = if headings.is_empty() { even_chapters(total) } else { heading_chapters(headings, total) };

        ExtractedDocument { title, text: words.join(" "), chapters }
    }
}

impl DocumentExtractor for TextExtractor {
    fn supports(&self, extension: &str) -> bool {
        matches!(extension, "txt" | "md" | "html" | "htm" | "xhtml")
    }

    fn extract(&self, path: &Path) -> Result<ExtractedDocument, DocumentError> {
        let raw = std::fs::read_to_string(path)?;
        let title = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();

        let raw = match extension_of(path).as_deref() {
            Some("html" | "htm" | "xhtml") => self.strip_markup(&raw),
            _ => raw,
        };

        Ok(self.build(title, &raw))
    }
}

/// Chapters opened by heading lines; leading text becomes its own chapter.
fn heading_chapters(headings: Vec<(String, usize)>, total: usize) -> Vec<Chapter> {
    let mut starts: Vec<(String, usize)> = Vec::with_capacity(headings.len() + 1);
    if headings.first().is_some_and(|(_, start)| *start > 0) {
        starts.push(("Introduction".to_string(), 0));
    }
    starts.extend(headings);

    let ends: Vec<usize> = starts.iter().skip(1).map(|(_, start)| *start).chain(std::iter::once(total)).collect();

    starts
        .into_iter()
        .zip(ends)
        .enumerate()
        .map(|(i, ((title, start_word), end_word))| Chapter { id: (i + 1).to_string(), title, start_word, end_word })
        .collect()
}

/// Roughly `FALLBACK_CHAPTERS` equal word ranges.
fn even_chapters(total: usize) -> Vec<Chapter> {
    if total == 0 {
        return Vec::new();
    }

    let size = total.div_ceil(FALLBACK_CHAPTERS);
    (0..total)
        .step_by(size)
        .enumerate()
        .map(|(i, start_word)| Chapter {
            id: (i + 1).to_string(),
            title: format!("Chapter {}", i + 1),
            start_word,
            end_word: (start_word + size).min(total),
        })
        .collect()
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().map(|e| e.to_string_lossy().to_lowercase())
}

/// Upload directory plus the extractors able to read its files.
pub struct DocumentStore {
    dir: PathBuf,
    extractors: Vec<Box<dyn DocumentExtractor>>,
}

impl DocumentStore {
    /// Open (and create if needed) the upload directory.
    pub fn new(dir: PathBuf, extractors: Vec<Box<dyn DocumentExtractor>>) -> Result<Self, DocumentError> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir, extractors })
    }

    fn extractor_for(&self, name: &str) -> Result<&dyn DocumentExtractor, DocumentError> {
        let extension = extension_of(Path::new(name)).unwrap_or_default();
        self.extractors
            .iter()
            .find(|e| e.supports(&extension))
            .map(|e| e.as_ref())
            .ok_or_else(|| DocumentError::Unsupported(name.to_string()))
    }

    /// Map a file id to its stored path, rejecting anything outside the upload dir.
    fn resolve(&self, file_id: &str) -> Result<PathBuf, DocumentError> {
        if file_id.is_empty() || file_id.contains(['/', '\\']) || file_id.starts_with('.') {
            return Err(DocumentError::InvalidId(file_id.to_string()));
        }
        Ok(self.dir.join(file_id))
    }

    /// Store an upload and extract it.
    ///
    /// # Returns
    /// The generated file id and the extracted document. The document title is
    /// the uploaded file's stem.
    pub fn save(&self, original_name: &str, bytes: &[u8]) -> Result<(String, ExtractedDocument), DocumentError> {
        let extractor = self.extractor_for(original_name)?;
        let extension = extension_of(Path::new(original_name)).unwrap_or_default();
        let file_id = format!("{}.{}", Uuid::new_v4(), extension);
        let path = self.resolve(&file_id)?;

        std::fs::write(&path, bytes)?;
        let mut document = match extractor.extract(&path) {
            Ok(document) => document,
            Err(e) => {
                let _ = std::fs::remove_file(&path);
                return Err(e);
            }
        };

        if let Some(stem) = Path::new(original_name).file_stem() {
            document.title = stem.to_string_lossy().to_string();
        }

        info!("Stored upload {} as {} ({} chapters)", original_name, file_id, document.chapters.len());
        Ok((file_id, document))
    }

    /// Extract a previously stored file.
    pub fn load(&self, file_id: &str) -> Result<ExtractedDocument, DocumentError> {
        let path = self.resolve(file_id)?;
        if !path.exists() {
            return Err(DocumentError::NotFound(file_id.to_string()));
        }
        self.extractor_for(file_id)?.extract(&path)
    }

    /// Remove a stored file. Missing files are not an error.
    pub fn remove(&self, file_id: &str) -> Result<(), DocumentError> {
        let path = self.resolve(file_id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed upload {}", file_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// One newline-delimited record of the progressive chapter text stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamRecord {
    Progress { progress: usize, total: usize },
    Chunk { text: String, progress: usize, total: usize },
    Complete { progress: usize, total: usize },
}

/// Records streamed for a chapter: progress, one chunk per `chunk_words` words, complete.
pub fn stream_records(text: &str, chunk_words: usize) -> Vec<StreamRecord> {
    let chunks = segment(text, chunk_words);
    let total = chunks.len();

    std::iter::once(StreamRecord::Progress { progress: 0, total })
        .chain(chunks.into_iter().map(|chunk| StreamRecord::Chunk { text: chunk.text, progress: chunk.index, total }))
        .chain(std::iter::once(StreamRecord::Complete { progress: total, total }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> DocumentStore {
        DocumentStore::new(dir.to_path_buf(), vec![Box::new(TextExtractor::new().unwrap())]).unwrap()
    }

    #[test]
    fn test_heading_chapters() {
        let dir = tempfile::tempdir().unwrap();
        let text = "Preface words here\nChapter 1: Start\none two three\n\nCHAPTER 2\nfour five\n";
        let (file_id, document) = store(dir.path()).save("My Book.txt", text.as_bytes()).unwrap();

        assert!(file_id.ends_with(".txt"));
        assert_eq!(document.title, "My Book");
        let titles: Vec<&str> = document.chapters.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Introduction", "Chapter 1: Start", "CHAPTER 2"]);
        assert_eq!(document.chapter_text("1").unwrap(), "Preface words here");
        assert_eq!(document.chapter_text("2").unwrap(), "Chapter 1: Start one two three");
        assert_eq!(document.chapter_text("3").unwrap(), "CHAPTER 2 four five");
        assert!(matches!(document.chapter_text("9"), Err(DocumentError::ChapterNotFound(_))));
    }

    #[test]
    fn test_even_chapters_without_headings() {
        let chapters = even_chapters(95);
        assert_eq!(chapters.len(), 10);
        assert_eq!(chapters[0].end_word, 10);
        assert_eq!(chapters[9].start_word, 90);
        assert_eq!(chapters[9].end_word, 95);
        assert!(even_chapters(0).is_empty());
        assert_eq!(even_chapters(3).len(), 3);
    }

    #[test]
    fn test_html_markup_is_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let html = "<html><body><h1>Chapter One</h1><p>Tom &amp; Jerry<br/>ran</p></body></html>";
        let (_, document) = store(dir.path()).save("book.xhtml", html.as_bytes()).unwrap();

        assert_eq!(document.text, "Chapter One Tom & Jerry ran");
        assert_eq!(document.chapters.len(), 1);
        assert_eq!(document.chapters[0].title, "Chapter One");
    }

    #[test]
    fn test_unsupported_and_invalid_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert!(matches!(store.save("book.pdf", b"%PDF"), Err(DocumentError::Unsupported(_))));
        assert!(matches!(store.load("../etc/passwd"), Err(DocumentError::InvalidId(_))));
        assert!(matches!(store.load("missing.txt"), Err(DocumentError::NotFound(_))));
    }

    #[test]
    fn test_load_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let (file_id, _) = store.save("a.md", b"# Chapter 1\nhello").unwrap();

        assert_eq!(store.load(&file_id).unwrap().chapters[0].title, "Chapter 1");
        store.remove(&file_id).unwrap();
        store.remove(&file_id).unwrap();
        assert!(matches!(store.load(&file_id), Err(DocumentError::NotFound(_))));
    }

    #[test]
    fn test_stream_records() {
        let text = (0..250).map(|i| i.to_string()).collect::<Vec<_>>().join(" ");
        let records = stream_records(&text, 100);

        assert_eq!(records.len(), 5);
        assert_eq!(records[0], StreamRecord::Progress { progress: 0, total: 3 });
        assert!(matches!(&records[3], StreamRecord::Chunk { text, progress: 2, total: 3 } if text.starts_with("200 ")));
        assert_eq!(records[4], StreamRecord::Complete { progress: 3, total: 3 });

        let line = serde_json::to_string(&records[4]).unwrap();
        assert_eq!(line, r#"{"type":"complete","progress":3,"total":3}"#);
    }
}
