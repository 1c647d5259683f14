use crate::models::{DocumentReference, ListFilesRequest, OrderDirection, DEFAULT_PAGE_LIMIT};
use std::collections::HashMap;

/// Client-side cache of the document listing.
///
/// Entries are keyed by `file_id`: a later copy of an id replaces the earlier
/// one in place. `has_more` is inferred from page size alone because the
/// upstream listing reports no total count, so a final page that happens to
/// be exactly full still reports more.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    files: Vec<DocumentReference>,
    positions: HashMap<String, usize>,
    page_size: usize,
    order_dir: OrderDirection,
    next_offset: usize,
    has_more: bool,
}

impl Default for FileCatalog {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_LIMIT, OrderDirection::Desc)
    }
}

impl FileCatalog {
    pub fn new(page_size: usize, order_dir: OrderDirection) -> Self {
        Self {
            files: Vec::new(),
            positions: HashMap::new(),
            page_size: page_size.max(1),
            order_dir,
            next_offset: 0,
            has_more: true,
        }
    }

    pub fn files(&self) -> &[DocumentReference] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn get(&self, file_id: &str) -> Option<&DocumentReference> {
        self.positions.get(file_id).map(|&index| &self.files[index])
    }

    /// Request for the page after everything loaded so far.
    pub fn next_page(&self) -> ListFilesRequest {
        ListFilesRequest {
            offset: self.next_offset,
            limit: self.page_size,
            order_dir: self.order_dir,
        }
    }

    /// Request for the first page, used after an upload.
    pub fn first_page(&self) -> ListFilesRequest {
        ListFilesRequest {
            offset: 0,
            limit: self.page_size,
            order_dir: self.order_dir,
        }
    }

    /// Merges a fetched page into the cache.
    pub fn append_page(&mut self, page: Vec<DocumentReference>) {
        let fetched = page.len();
        for file in page {
            self.upsert(file);
        }
        self.next_offset += fetched;
        self.has_more = fetched == self.page_size;
    }

    /// Replaces the cache with a freshly fetched first page.
    pub fn refresh(&mut self, first_page: Vec<DocumentReference>) {
        self.files.clear();
        self.positions.clear();
        self.next_offset = 0;
        self.append_page(first_page);
    }

    pub fn is_duplicate_name(&self, file_name: &str) -> bool {
        self.files
            .iter()
            .filter(|file| file.file_name == file_name)
            .take(2)
            .count()
            > 1
    }

    /// Display label; files sharing a name are told apart by an id prefix.
    pub fn label(&self, file: &DocumentReference) -> String {
        if self.is_duplicate_name(&file.file_name) {
            let prefix: String = file.file_id.chars().take(8).collect();
            format!("{} [{}…]", file.file_name, prefix)
        } else {
            file.file_name.clone()
        }
    }

    fn upsert(&mut self, file: DocumentReference) {
        match self.positions.get(&file.file_id) {
            Some(&index) => self.files[index] = file,
            None => {
                self.positions.insert(file.file_id.clone(), self.files.len());
                self.files.push(file);
            }
        }
    }
}
