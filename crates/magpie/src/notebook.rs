//
// notebook.rs
//
// Container documents and their independently addressable cells
//

use tower_lsp::lsp_types::Url;

use crate::resource_map::ResourceMap;

/// URI scheme the host uses for notebook cell documents.
pub const NOTEBOOK_CELL_SCHEME: &str = "vscode-notebook-cell";

/// A container document together with its cell identities.
#[derive(Debug, Clone)]
pub struct ContainerDocument {
    pub uri: Url,
    pub cells: Vec<Url>,
}

/// Registry of open container documents.
///
/// The cell-to-container relation is derived on every query; nothing about
/// it is cached elsewhere.
#[derive(Debug, Default)]
pub struct NotebookStore {
    containers: ResourceMap<ContainerDocument>,
    cell_to_container: ResourceMap<Url>,
}

impl NotebookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a container and its current cell set.
    pub fn open(&self, uri: Url, cells: Vec<Url>) {
        // Replacing drops stale cell mappings from an earlier cell set.
        self.close(&uri);
        for cell in &cells {
            self.cell_to_container.insert(cell, uri.clone());
        }
        let key = uri.clone();
        self.containers.insert(&key, ContainerDocument { uri, cells });
    }

    pub fn close(&self, uri: &Url) {
        if let Some(previous) = self.containers.remove(uri) {
            for cell in &previous.cells {
                self.cell_to_container.remove(cell);
            }
        }
    }

    /// Resolve the container owning `cell`, with its sibling cells.
    pub fn containing_document(&self, cell: &Url) -> Option<ContainerDocument> {
        let container = self.cell_to_container.get(cell)?;
        self.containers.get(&container)
    }
}
