//
// document_store.rs
//
// Open-document registry: live editor buffers, authoritative over any cache
//

use ropey::Rope;
use tower_lsp::lsp_types::{TextDocumentContentChangeEvent, Url};

use crate::resource_map::ResourceMap;

pub const MARKDOWN_LANGUAGE_ID: &str = "markdown";

/// A resolved text document snapshot.
///
/// Cloning is cheap: rope clones share their underlying chunks.
#[derive(Debug, Clone)]
pub struct Document {
    pub uri: Url,
    pub language_id: String,
    pub version: i32,
    pub contents: Rope,
}

impl Document {
    pub fn new(uri: Url, language_id: impl Into<String>, version: i32, text: &str) -> Self {
        Self {
            uri,
            language_id: language_id.into(),
            version,
            contents: Rope::from_str(text),
        }
    }

    pub fn text(&self) -> String {
        self.contents.to_string()
    }

    pub fn is_markdown(&self) -> bool {
        self.language_id == MARKDOWN_LANGUAGE_ID
    }

    pub fn apply_change(&mut self, change: TextDocumentContentChangeEvent) {
        if let Some(range) = change.range {
            let start_line = range.start.line as usize;
            let start_utf16_char = range.start.character as usize;
            let end_line = range.end.line as usize;
            let end_utf16_char = range.end.character as usize;

            let start_line_text = self.contents.line(start_line).to_string();
            let end_line_text = self.contents.line(end_line).to_string();

            let start_char = utf16_offset_to_char_offset(&start_line_text, start_utf16_char);
            let end_char = utf16_offset_to_char_offset(&end_line_text, end_utf16_char);

            let start_idx = self.contents.line_to_char(start_line) + start_char;
            let end_idx = self.contents.line_to_char(end_line) + end_char;

            self.contents.remove(start_idx..end_idx);
            self.contents.insert(start_idx, &change.text);
        } else {
            // Full document sync
            self.contents = Rope::from_str(&change.text);
        }
    }
}

/// LSP positions are UTF-16 code-unit offsets; ropey indexes by char.
fn utf16_offset_to_char_offset(line_text: &str, utf16_offset: usize) -> usize {
    let mut utf16_count = 0;
    let mut char_count = 0;

    for ch in line_text.chars() {
        if utf16_count >= utf16_offset {
            return char_count;
        }
        utf16_count += ch.len_utf16();
        char_count += 1;
    }
    char_count
}

/// Registry of documents currently open in the host editor.
///
/// Entries here always win over cached or on-disk state for the same
/// resource.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: ResourceMap<Document>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly opened buffer, returning its snapshot.
    pub fn open(
        &self,
        uri: Url,
        language_id: impl Into<String>,
        version: i32,
        text: &str,
    ) -> Document {
        let document = Document::new(uri.clone(), language_id, version, text);
        self.documents.insert(&uri, document.clone());
        document
    }

    /// Apply content changes to an open buffer, returning the updated
    /// snapshot. Returns `None` for resources that were never opened.
    pub fn change(
        &self,
        uri: &Url,
        version: i32,
        changes: Vec<TextDocumentContentChangeEvent>,
    ) -> Option<Document> {
        let mut document = self.documents.get(uri)?;
        for change in changes {
            document.apply_change(change);
        }
        document.version = version;
        self.documents.insert(uri, document.clone());
        Some(document)
    }

    /// Remove a closed buffer, returning its final snapshot.
    pub fn close(&self, uri: &Url) -> Option<Document> {
        self.documents.remove(uri)
    }

    pub fn get(&self, uri: &Url) -> Option<Document> {
        self.documents.get(uri)
    }

    pub fn contains(&self, uri: &Url) -> bool {
        self.documents.contains(uri)
    }

    /// Snapshot of every open buffer, in no particular order.
    pub fn all(&self) -> Vec<Document> {
        self.documents.values()
    }
}
