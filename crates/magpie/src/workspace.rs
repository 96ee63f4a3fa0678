//
// workspace.rs
//
// Client-backed workspace: cached view over the host's open documents and
// filesystem, watch multiplexing, and document lifecycle fan-out
//

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use dashmap::DashMap;
use tower_lsp::lsp_types::{FileChangeType, FileEvent, TextDocumentContentChangeEvent, Url};

use crate::config::ConfigManager;
use crate::dispose::Disposable;
use crate::document_store::{Document, DocumentStore, MARKDOWN_LANGUAGE_ID};
use crate::events::{Emitter, EventSubscription};
use crate::gateway::HostGateway;
use crate::limiter::Limiter;
use crate::notebook::{ContainerDocument, NotebookStore, NOTEBOOK_CELL_SCHEME};
use crate::protocol::{FileStat, FileWatcherOptions, WatchKind, WatcherChangeParams};
use crate::resource_map::ResourceMap;

/// Ceiling on simultaneous in-flight document resolutions during discovery.
const MAX_CONCURRENT_DISCOVERY: usize = 20;

/// Scheme the host uses for transient bulk-edit previews; never relevant.
const BULK_EDIT_PREVIEW_SCHEME: &str = "vscode-bulkeditpreview";

/// Event channels for one watch subscription.
#[derive(Default)]
struct WatcherChannels {
    on_did_create: Emitter<Url>,
    on_did_change: Emitter<Url>,
    on_did_delete: Emitter<Url>,
}

struct WatcherEntry {
    #[allow(dead_code)]
    resource: Url,
    #[allow(dead_code)]
    options: FileWatcherOptions,
    channels: Arc<WatcherChannels>,
}

/// Live watch subscription returned by [`ClientWorkspace::watch_file`].
///
/// Events keep flowing until `dispose`, which stops the host-side watcher
/// and unmaps the id. Events still in flight for a disposed id are dropped
/// by the router; ids are never reused, so a later subscription for the same
/// resource cannot observe them.
pub struct FileWatcherHandle {
    id: u32,
    resource: Url,
    channels: Arc<WatcherChannels>,
    watchers: Arc<DashMap<u32, WatcherEntry>>,
    gateway: Arc<dyn HostGateway>,
    disposed: AtomicBool,
}

impl FileWatcherHandle {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn on_did_create(
        &self,
        listener: impl Fn(&Url) + Send + Sync + 'static,
    ) -> EventSubscription {
        self.channels.on_did_create.subscribe(listener)
    }

    pub fn on_did_change(
        &self,
        listener: impl Fn(&Url) + Send + Sync + 'static,
    ) -> EventSubscription {
        self.channels.on_did_change.subscribe(listener)
    }

    pub fn on_did_delete(
        &self,
        listener: impl Fn(&Url) + Send + Sync + 'static,
    ) -> EventSubscription {
        self.channels.on_did_delete.subscribe(listener)
    }
}

impl Disposable for FileWatcherHandle {
    fn dispose(&mut self) -> anyhow::Result<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        log::trace!("workspace: disposeWatcher ({}) {}", self.id, self.resource);
        self.gateway.watcher_delete(self.id);
        self.watchers.remove(&self.id);
        Ok(())
    }
}

/// The workspace facade the analysis engine consumes.
///
/// Reconciles three sources of truth for document content: live buffers in
/// the open-document registry (always authoritative), a URI-keyed cache of
/// resolved snapshots, and the host filesystem reached through the gateway.
/// Cache entries are only ever removed on invalidating signals, never
/// patched, so readers re-fetch instead of observing partial staleness.
pub struct ClientWorkspace {
    gateway: Arc<dyn HostGateway>,
    config: Arc<ConfigManager>,
    documents: Arc<DocumentStore>,
    notebooks: Arc<NotebookStore>,

    document_cache: ResourceMap<Document>,
    workspace_folders: RwLock<Vec<Url>>,

    /// Monotonic id pool, owned per workspace instance so independent
    /// workspaces cannot cross-talk.
    watcher_pool: AtomicU32,
    watchers: Arc<DashMap<u32, WatcherEntry>>,

    on_did_create_markdown_document: Emitter<Document>,
    on_did_change_markdown_document: Emitter<Document>,
    on_did_delete_markdown_document: Emitter<Url>,
}

impl ClientWorkspace {
    pub fn new(
        gateway: Arc<dyn HostGateway>,
        config: Arc<ConfigManager>,
        documents: Arc<DocumentStore>,
        notebooks: Arc<NotebookStore>,
    ) -> Self {
        Self {
            gateway,
            config,
            documents,
            notebooks,
            document_cache: ResourceMap::new(),
            workspace_folders: RwLock::new(Vec::new()),
            watcher_pool: AtomicU32::new(0),
            watchers: Arc::new(DashMap::new()),
            on_did_create_markdown_document: Emitter::new(),
            on_did_change_markdown_document: Emitter::new(),
            on_did_delete_markdown_document: Emitter::new(),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle events
    // ------------------------------------------------------------------

    /// Fires for relevant documents that appear, either opened in the editor
    /// or created on disk. Edge-triggered invalidation hints: a live edit and
    /// a concurrent on-disk change may both fire for the same resource.
    pub fn on_did_create_markdown_document(&self) -> &Emitter<Document> {
        &self.on_did_create_markdown_document
    }

    pub fn on_did_change_markdown_document(&self) -> &Emitter<Document> {
        &self.on_did_change_markdown_document
    }

    pub fn on_did_delete_markdown_document(&self) -> &Emitter<Url> {
        &self.on_did_delete_markdown_document
    }

    // ------------------------------------------------------------------
    // Workspace folders
    // ------------------------------------------------------------------

    pub fn workspace_folders(&self) -> Vec<Url> {
        self.workspace_folders
            .read()
            .map(|f| f.clone())
            .unwrap_or_default()
    }

    pub fn set_workspace_folders(&self, folders: Vec<Url>) {
        if let Ok(mut guard) = self.workspace_folders.write() {
            *guard = folders;
        }
    }

    // ------------------------------------------------------------------
    // Relevance predicate
    // ------------------------------------------------------------------

    /// Whether a path is worth a remote read at all: its extension must be a
    /// configured markdown extension.
    pub fn looks_like_markdown_path(&self, uri: &Url) -> bool {
        let path = uri.path();
        let Some(extension) = path.rsplit_once('.').map(|(_, ext)| ext) else {
            return false;
        };
        self.config
            .settings()
            .markdown_file_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
    }

    /// Whether an open document participates in lifecycle fan-out.
    fn is_relevant_document(&self, document: &Document) -> bool {
        document.is_markdown() && document.uri.scheme() != BULK_EDIT_PREVIEW_SCHEME
    }

    // ------------------------------------------------------------------
    // Registry-driven lifecycle (live buffers)
    // ------------------------------------------------------------------

    pub fn open_document(
        &self,
        uri: Url,
        language_id: impl Into<String>,
        version: i32,
        text: &str,
    ) {
        self.document_cache.remove(&uri);
        let document = self.documents.open(uri, language_id, version, text);
        if self.is_relevant_document(&document) {
            self.on_did_create_markdown_document.fire(&document);
        }
    }

    pub fn change_document(
        &self,
        uri: &Url,
        version: i32,
        changes: Vec<TextDocumentContentChangeEvent>,
    ) {
        // Invalidate, never patch: a cached snapshot of this resource is now
        // stale and must be re-populated from the registry on next resolve.
        self.document_cache.remove(uri);
        if let Some(document) = self.documents.change(uri, version, changes) {
            if self.is_relevant_document(&document) {
                self.on_did_change_markdown_document.fire(&document);
            }
        }
    }

    pub fn close_document(&self, uri: &Url) {
        self.document_cache.remove(uri);
        if let Some(document) = self.documents.close(uri) {
            if self.is_relevant_document(&document) {
                self.on_did_delete_markdown_document.fire(uri);
            }
        }
    }

    // ------------------------------------------------------------------
    // Remote-driven lifecycle (watched files)
    // ------------------------------------------------------------------

    /// Apply a `workspace/didChangeWatchedFiles` batch.
    ///
    /// Created/changed entries are re-resolved before firing so consumers
    /// always see fresh content; deleted entries fire with the bare
    /// identity. Payload freshness is never trusted.
    pub async fn handle_watched_files_changed(&self, changes: Vec<FileEvent>) {
        for change in changes {
            let resource = change.uri;
            log::trace!(
                "workspace: onDidChangeWatchedFiles {:?}: {resource}",
                change.typ
            );
            match change.typ {
                FileChangeType::CHANGED => {
                    self.document_cache.remove(&resource);
                    if let Some(document) = self.resolve_document(&resource).await {
                        self.on_did_change_markdown_document.fire(&document);
                    }
                }
                FileChangeType::CREATED => {
                    if let Some(document) = self.resolve_document(&resource).await {
                        self.on_did_create_markdown_document.fire(&document);
                    }
                }
                FileChangeType::DELETED => {
                    self.document_cache.remove(&resource);
                    self.on_did_delete_markdown_document.fire(&resource);
                }
                _ => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Resolve a document snapshot: cache, then open registry, then one
    /// remote read.
    ///
    /// Every failure (not-found, permission, transport) degrades to `None`;
    /// absence is an expected steady-state outcome during scans. Resources
    /// that do not look like markdown short-circuit before any remote call.
    pub async fn resolve_document(&self, resource: &Url) -> Option<Document> {
        if let Some(existing) = self.document_cache.get(resource) {
            return Some(existing);
        }

        if let Some(open) = self.documents.get(resource) {
            self.document_cache.insert(resource, open.clone());
            return Some(open);
        }

        if !self.looks_like_markdown_path(resource) {
            return None;
        }

        match self.gateway.read_file(resource).await {
            Ok(bytes) => {
                // Markdown is assumed to be UTF-8.
                let text = String::from_utf8_lossy(&bytes);
                let document =
                    Document::new(resource.clone(), MARKDOWN_LANGUAGE_ID, 0, text.as_ref());
                self.document_cache.insert(resource, document.clone());
                Some(document)
            }
            Err(e) => {
                log::trace!("workspace: failed to read {resource}: {e}");
                None
            }
        }
    }

    /// O(1) admission check against the open registry; never touches the
    /// gateway.
    pub fn has_document(&self, resource: &Url) -> bool {
        self.documents.contains(resource)
    }

    /// Anything resolvable locally is a file; only unknown resources cost a
    /// remote stat.
    pub async fn stat(&self, resource: &Url) -> Option<FileStat> {
        log::trace!("workspace: stat {resource}");
        if self.document_cache.contains(resource) || self.documents.contains(resource) {
            return Some(FileStat {
                is_directory: false,
            });
        }
        self.gateway.stat(resource).await.ok().flatten()
    }

    pub async fn read_directory(&self, resource: &Url) -> anyhow::Result<Vec<(String, FileStat)>> {
        log::trace!("workspace: readDir {resource}");
        self.gateway.read_directory(resource).await
    }

    /// Resolve the container document owning a notebook cell.
    pub fn containing_document(&self, resource: &Url) -> Option<ContainerDocument> {
        if resource.scheme() == NOTEBOOK_CELL_SCHEME {
            return self.notebooks.containing_document(resource);
        }
        None
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Every markdown document in the workspace: files on disk plus relevant
    /// open buffers (such as untitled documents) not backed by a found file.
    ///
    /// Resolutions run with bounded concurrency; a single resource failing
    /// never aborts the batch. The result is deduplicated and unordered.
    pub async fn discover_markdown_documents(self: &Arc<Self>) -> Vec<Document> {
        let found: Arc<ResourceMap<Document>> = Arc::new(ResourceMap::new());
        let limiter = Limiter::new(MAX_CONCURRENT_DISCOVERY);

        let resources = match self.gateway.find_markdown_files().await {
            Ok(resources) => resources,
            Err(e) => {
                log::warn!("workspace: findMarkdownFilesInWorkspace failed: {e}");
                Vec::new()
            }
        };

        let mut join = tokio::task::JoinSet::new();
        for raw in resources {
            let workspace = Arc::clone(self);
            let limiter = limiter.clone();
            let found = Arc::clone(&found);
            join.spawn(async move {
                limiter
                    .queue(async {
                        let Ok(resource) = Url::parse(&raw) else {
                            return;
                        };
                        if let Some(document) = workspace.resolve_document(&resource).await {
                            found.insert(&resource, document);
                        }
                    })
                    .await;
            });
        }
        while join.join_next().await.is_some() {}

        // Open buffers not already found on disk (captures unsaved and
        // untitled documents).
        for document in self.documents.all() {
            if !found.contains(&document.uri) && self.is_relevant_document(&document) {
                let uri = document.uri.clone();
                found.insert(&uri, document);
            }
        }

        found.values()
    }

    // ------------------------------------------------------------------
    // Watch multiplexer
    // ------------------------------------------------------------------

    /// Start watching `resource` through the host's watch primitive.
    ///
    /// Allocates a fresh id from the per-instance pool and asks the host to
    /// watch parent directories too, so ancestor deletions surface as events.
    pub fn watch_file(&self, resource: Url, options: FileWatcherOptions) -> FileWatcherHandle {
        let id = self.watcher_pool.fetch_add(1, Ordering::Relaxed);
        log::trace!("workspace: watchFile ({id}) {resource}");

        let channels = Arc::new(WatcherChannels::default());
        self.watchers.insert(
            id,
            WatcherEntry {
                resource: resource.clone(),
                options: options.clone(),
                channels: Arc::clone(&channels),
            },
        );
        self.gateway.watcher_create(id, &resource, options, true);

        FileWatcherHandle {
            id,
            resource,
            channels,
            watchers: Arc::clone(&self.watchers),
            gateway: Arc::clone(&self.gateway),
            disposed: AtomicBool::new(false),
        }
    }

    /// Route an inbound watch event to the subscription it is tagged with.
    ///
    /// Events for an unmapped id are dropped silently: the subscription was
    /// disposed while this event was in flight.
    pub fn handle_watcher_event(&self, params: WatcherChangeParams) {
        log::trace!(
            "workspace: fs/watcher/onChange ({}) {:?}: {}",
            params.id,
            params.kind,
            params.uri
        );
        let Ok(resource) = Url::parse(&params.uri) else {
            log::trace!("workspace: dropping watcher event with bad uri: {}", params.uri);
            return;
        };
        let Some(entry) = self.watchers.get(&params.id) else {
            log::trace!("workspace: dropping event for unknown watcher {}", params.id);
            return;
        };
        let channels = Arc::clone(&entry.channels);
        drop(entry);
        match params.kind {
            WatchKind::Create => channels.on_did_create.fire(&resource),
            WatchKind::Change => channels.on_did_change.fire(&resource),
            WatchKind::Delete => channels.on_did_delete.fire(&resource),
        }
    }

    #[cfg(test)]
    pub(crate) fn cached(&self, resource: &Url) -> bool {
        self.document_cache.contains(resource)
    }
}
