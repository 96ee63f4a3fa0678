//
// diagnostics.rs
//
// Pull-diagnostics coordination: per-document computation with cooperative
// cancellation, and workspace-wide refresh on invalidating signals
//

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::{Diagnostic, Url};

use crate::config::{ConfigManager, Settings, SeveritySetting};
use crate::dispose::{Disposable, DisposableStore};
use crate::document_store::Document;
use crate::events::Emitter;
use crate::resource_map::normalize_uri_key;
use crate::workspace::ClientWorkspace;

/// Severity a validation rule reports at, after settings conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    #[default]
    Ignore,
}

impl From<SeveritySetting> for DiagnosticLevel {
    fn from(setting: SeveritySetting) -> Self {
        match setting {
            SeveritySetting::Error => Self::Error,
            SeveritySetting::Warning => Self::Warning,
            SeveritySetting::Ignore => Self::Ignore,
        }
    }
}

/// Options handed to the diagnostics computation for one document.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsOptions {
    pub validate_file_links: DiagnosticLevel,
    pub validate_reference_links: DiagnosticLevel,
    pub validate_fragment_links: DiagnosticLevel,
    pub validate_markdown_file_link_fragments: DiagnosticLevel,
    pub ignore_links: Vec<String>,
}

impl DiagnosticsOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            validate_file_links: settings.validate_file_links.into(),
            validate_reference_links: settings.validate_reference_links.into(),
            validate_fragment_links: settings.validate_fragment_links.into(),
            validate_markdown_file_link_fragments: settings
                .validate_markdown_file_link_fragments
                .into(),
            ignore_links: settings.ignore_links.clone(),
        }
    }
}

/// The analysis engine's diagnostics entry points, seen from this crate.
#[async_trait]
pub trait DiagnosticsProvider: Send + Sync {
    /// Compute diagnostics for one document. Implementations must observe
    /// `token` and return promptly once it is cancelled; the result is then
    /// discarded by the caller.
    async fn compute(
        &self,
        document: &Document,
        options: &DiagnosticsOptions,
        token: CancellationToken,
    ) -> Vec<Diagnostic>;

    /// Fires when a change to one file may have invalidated diagnostics of
    /// files linking to it.
    fn on_linked_to_file_changed(&self) -> &Emitter<Url>;
}

/// Placeholder provider used until an analysis engine is plugged in.
#[derive(Default)]
pub struct EmptyDiagnosticsProvider {
    linked_to_file_changed: Emitter<Url>,
}

impl EmptyDiagnosticsProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DiagnosticsProvider for EmptyDiagnosticsProvider {
    async fn compute(
        &self,
        _document: &Document,
        _options: &DiagnosticsOptions,
        _token: CancellationToken,
    ) -> Vec<Diagnostic> {
        Vec::new()
    }

    fn on_linked_to_file_changed(&self) -> &Emitter<Url> {
        &self.linked_to_file_changed
    }
}

/// Drives pull diagnostics.
///
/// Serves `textDocument/diagnostic` requests through the workspace, cancels
/// superseded computations per document, and asks the host for a
/// workspace-wide refresh whenever a linked file or the configuration
/// changes. Refresh is deliberately coarse; no per-file targeting.
pub struct DiagnosticsCoordinator {
    workspace: Arc<ClientWorkspace>,
    config: Arc<ConfigManager>,
    provider: Arc<dyn DiagnosticsProvider>,
    pending: DashMap<String, CancellationToken>,
    subscriptions: Mutex<DisposableStore>,
}

impl DiagnosticsCoordinator {
    pub fn new(
        workspace: Arc<ClientWorkspace>,
        config: Arc<ConfigManager>,
        provider: Arc<dyn DiagnosticsProvider>,
        request_refresh: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        let refresh: Arc<dyn Fn() + Send + Sync> = Arc::new(request_refresh);

        let mut subscriptions = DisposableStore::new();
        let r = Arc::clone(&refresh);
        subscriptions.add(Box::new(provider.on_linked_to_file_changed().subscribe(
            move |resource| {
                log::trace!("diagnostics: linked file changed: {resource}");
                r();
            },
        )));
        let r = Arc::clone(&refresh);
        subscriptions.add(Box::new(config.on_did_change().subscribe(move |_| r())));

        Self {
            workspace,
            config,
            provider,
            pending: DashMap::new(),
            subscriptions: Mutex::new(subscriptions),
        }
    }

    /// Serve one `textDocument/diagnostic` pull.
    ///
    /// Returns an empty item set when validation is disabled, when the
    /// resource is not an open markdown document, or when resolution fails.
    /// A new pull for a document cancels the computation still pending from
    /// the previous one.
    pub async fn document_diagnostics(&self, resource: &Url) -> Vec<Diagnostic> {
        let settings = self.config.settings();
        if !settings.validate_enabled {
            return Vec::new();
        }
        if !self.workspace.has_document(resource) {
            return Vec::new();
        }
        let Some(document) = self.workspace.resolve_document(resource).await else {
            return Vec::new();
        };

        let key = normalize_uri_key(resource);
        let token = CancellationToken::new();
        if let Some(previous) = self.pending.insert(key.clone(), token.clone()) {
            previous.cancel();
        }

        let options = DiagnosticsOptions::from_settings(&settings);
        let items = self.provider.compute(&document, &options, token.clone()).await;

        // Leave the entry in place if a newer pull already replaced it.
        if !token.is_cancelled() {
            self.pending.remove(&key);
        }
        items
    }
}

impl Disposable for DiagnosticsCoordinator {
    fn dispose(&mut self) -> anyhow::Result<()> {
        for entry in self.pending.iter() {
            entry.value().cancel();
        }
        self.pending.clear();
        match self.subscriptions.lock() {
            Ok(mut subscriptions) => subscriptions.dispose(),
            Err(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document_store::{DocumentStore, MARKDOWN_LANGUAGE_ID};
    use crate::gateway::HostGateway;
    use crate::notebook::NotebookStore;
    use crate::protocol::{FileStat, FileWatcherOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OfflineGateway;

    #[async_trait]
    impl HostGateway for OfflineGateway {
        async fn read_file(&self, _uri: &Url) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("offline")
        }
        async fn stat(&self, _uri: &Url) -> anyhow::Result<Option<FileStat>> {
            anyhow::bail!("offline")
        }
        async fn read_directory(&self, _uri: &Url) -> anyhow::Result<Vec<(String, FileStat)>> {
            anyhow::bail!("offline")
        }
        async fn find_markdown_files(&self) -> anyhow::Result<Vec<String>> {
            anyhow::bail!("offline")
        }
        fn watcher_create(
            &self,
            _id: u32,
            _uri: &Url,
            _options: FileWatcherOptions,
            _watch_parent_dirs: bool,
        ) {
        }
        fn watcher_delete(&self, _id: u32) {}
    }

    /// Records how many computations ran and whether tokens arrived
    /// pre-cancelled.
    struct CountingProvider {
        computations: AtomicUsize,
        linked: Emitter<Url>,
    }

    #[async_trait]
    impl DiagnosticsProvider for CountingProvider {
        async fn compute(
            &self,
            _document: &Document,
            _options: &DiagnosticsOptions,
            _token: CancellationToken,
        ) -> Vec<Diagnostic> {
            self.computations.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        }

        fn on_linked_to_file_changed(&self) -> &Emitter<Url> {
            &self.linked
        }
    }

    fn setup(
        provider: Arc<dyn DiagnosticsProvider>,
        refreshes: Arc<AtomicUsize>,
    ) -> (Arc<ClientWorkspace>, Arc<ConfigManager>, DiagnosticsCoordinator) {
        let config = Arc::new(ConfigManager::new());
        let workspace = Arc::new(ClientWorkspace::new(
            Arc::new(OfflineGateway),
            Arc::clone(&config),
            Arc::new(DocumentStore::new()),
            Arc::new(NotebookStore::new()),
        ));
        let coordinator = DiagnosticsCoordinator::new(
            Arc::clone(&workspace),
            Arc::clone(&config),
            provider,
            move || {
                refreshes.fetch_add(1, Ordering::SeqCst);
            },
        );
        (workspace, config, coordinator)
    }

    fn enable_validation(config: &ConfigManager) {
        config.update_from_json(&serde_json::json!({
            "markdown": { "validate": { "enabled": true } }
        }));
    }

    #[tokio::test]
    async fn test_disabled_validation_returns_empty_without_compute() {
        let provider = Arc::new(CountingProvider {
            computations: AtomicUsize::new(0),
            linked: Emitter::new(),
        });
        let refreshes = Arc::new(AtomicUsize::new(0));
        let (workspace, _config, coordinator) = setup(provider.clone(), refreshes);

        let uri = Url::parse("file:///ws/a.md").unwrap();
        workspace.open_document(uri.clone(), MARKDOWN_LANGUAGE_ID, 1, "# a");

        assert!(coordinator.document_diagnostics(&uri).await.is_empty());
        assert_eq!(provider.computations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unopened_document_returns_empty() {
        let provider = Arc::new(CountingProvider {
            computations: AtomicUsize::new(0),
            linked: Emitter::new(),
        });
        let refreshes = Arc::new(AtomicUsize::new(0));
        let (_workspace, config, coordinator) = setup(provider.clone(), refreshes);
        enable_validation(&config);

        let uri = Url::parse("file:///ws/never-opened.md").unwrap();
        assert!(coordinator.document_diagnostics(&uri).await.is_empty());
        assert_eq!(provider.computations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_open_document_is_computed() {
        let provider = Arc::new(CountingProvider {
            computations: AtomicUsize::new(0),
            linked: Emitter::new(),
        });
        let refreshes = Arc::new(AtomicUsize::new(0));
        let (workspace, config, coordinator) = setup(provider.clone(), refreshes);
        enable_validation(&config);

        let uri = Url::parse("file:///ws/a.md").unwrap();
        workspace.open_document(uri.clone(), MARKDOWN_LANGUAGE_ID, 1, "# a");

        coordinator.document_diagnostics(&uri).await;
        assert_eq!(provider.computations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_linked_file_change_and_config_change_request_refresh() {
        let provider = Arc::new(CountingProvider {
            computations: AtomicUsize::new(0),
            linked: Emitter::new(),
        });
        let refreshes = Arc::new(AtomicUsize::new(0));
        let (_workspace, config, coordinator) = setup(provider.clone(), Arc::clone(&refreshes));

        provider
            .linked
            .fire(&Url::parse("file:///ws/linked.md").unwrap());
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);

        enable_validation(&config);
        assert_eq!(refreshes.load(Ordering::SeqCst), 2);

        drop(coordinator);
    }

    #[tokio::test]
    async fn test_new_pull_cancels_pending_token() {
        // Provider that parks until its token is cancelled, so a second pull
        // can race it.
        struct ParkingProvider {
            linked: Emitter<Url>,
            cancelled: AtomicUsize,
            first: AtomicUsize,
        }

        #[async_trait]
        impl DiagnosticsProvider for ParkingProvider {
            async fn compute(
                &self,
                _document: &Document,
                _options: &DiagnosticsOptions,
                token: CancellationToken,
            ) -> Vec<Diagnostic> {
                if self.first.fetch_add(1, Ordering::SeqCst) == 0 {
                    token.cancelled().await;
                    self.cancelled.fetch_add(1, Ordering::SeqCst);
                }
                Vec::new()
            }

            fn on_linked_to_file_changed(&self) -> &Emitter<Url> {
                &self.linked
            }
        }

        let provider = Arc::new(ParkingProvider {
            linked: Emitter::new(),
            cancelled: AtomicUsize::new(0),
            first: AtomicUsize::new(0),
        });
        let refreshes = Arc::new(AtomicUsize::new(0));
        let (workspace, config, coordinator) = setup(provider.clone(), refreshes);
        enable_validation(&config);
        let coordinator = Arc::new(coordinator);

        let uri = Url::parse("file:///ws/a.md").unwrap();
        workspace.open_document(uri.clone(), MARKDOWN_LANGUAGE_ID, 1, "# a");

        let first = {
            let coordinator = Arc::clone(&coordinator);
            let uri = uri.clone();
            tokio::spawn(async move { coordinator.document_diagnostics(&uri).await })
        };
        // Let the first pull reach its compute call before superseding it.
        tokio::task::yield_now().await;

        coordinator.document_diagnostics(&uri).await;
        first.await.unwrap();

        assert_eq!(provider.cancelled.load(Ordering::SeqCst), 1);
    }
}
