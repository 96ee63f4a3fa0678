//
// backend.rs
//
// tower-lsp server wiring: routes LSP traffic into the workspace facade
//

use std::sync::Arc;

use serde::Deserialize;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::request::{Request, WorkspaceDiagnosticRefresh};
use tower_lsp::lsp_types::*;
use tower_lsp::Client;
use tower_lsp::LanguageServer;
use tower_lsp::LspService;
use tower_lsp::Server;

use crate::config::ConfigManager;
use crate::diagnostics::{DiagnosticsCoordinator, DiagnosticsProvider, EmptyDiagnosticsProvider};
use crate::document_store::DocumentStore;
use crate::gateway::{ClientGateway, HostGateway};
use crate::notebook::NotebookStore;
use crate::protocol;
use crate::workspace::ClientWorkspace;

/// Minimal notebook sync payloads: only the identities the container
/// registry needs.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotebookCellIdentity {
    document: Url,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotebookDocumentIdentity {
    uri: Url,
    #[serde(default)]
    cells: Vec<NotebookCellIdentity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotebookDidOpenParams {
    notebook_document: NotebookDocumentIdentity,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotebookDidChangeParams {
    notebook_document: NotebookVersionedIdentity,
    #[serde(default)]
    change: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotebookVersionedIdentity {
    uri: Url,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotebookDidCloseParams {
    notebook_document: NotebookVersionedIdentity,
}

pub struct Backend {
    client: Client,
    config: Arc<ConfigManager>,
    notebooks: Arc<NotebookStore>,
    workspace: Arc<ClientWorkspace>,
    diagnostics: Arc<DiagnosticsCoordinator>,
}

impl Backend {
    pub fn new(client: Client) -> Self {
        Self::with_provider(client, Arc::new(EmptyDiagnosticsProvider::new()))
    }

    pub fn with_provider(client: Client, provider: Arc<dyn DiagnosticsProvider>) -> Self {
        let gateway: Arc<dyn HostGateway> = Arc::new(ClientGateway::new(client.clone()));
        let config = Arc::new(ConfigManager::new());
        let documents = Arc::new(DocumentStore::new());
        let notebooks = Arc::new(NotebookStore::new());
        let workspace = Arc::new(ClientWorkspace::new(
            gateway,
            Arc::clone(&config),
            documents,
            Arc::clone(&notebooks),
        ));

        let refresh_client = client.clone();
        let diagnostics = Arc::new(DiagnosticsCoordinator::new(
            Arc::clone(&workspace),
            Arc::clone(&config),
            provider,
            move || {
                let client = refresh_client.clone();
                tokio::spawn(async move {
                    if let Err(e) = client.send_request::<WorkspaceDiagnosticRefresh>(()).await {
                        log::trace!("workspace/diagnostic/refresh not acknowledged: {e}");
                    }
                });
            },
        ));

        Self {
            client,
            config,
            notebooks,
            workspace,
            diagnostics,
        }
    }

    pub fn workspace(&self) -> &Arc<ClientWorkspace> {
        &self.workspace
    }

    /// Inbound `markdown/fs/watcher/onChange` from the host.
    async fn on_watcher_change(&self, params: protocol::WatcherChangeParams) -> Result<()> {
        self.workspace.handle_watcher_event(params);
        Ok(())
    }

    async fn on_did_open_notebook(&self, params: NotebookDidOpenParams) {
        let cells = params
            .notebook_document
            .cells
            .into_iter()
            .map(|cell| cell.document)
            .collect();
        self.notebooks.open(params.notebook_document.uri, cells);
    }

    async fn on_did_change_notebook(&self, params: NotebookDidChangeParams) {
        // Cell structure changes arrive as deltas; re-registration happens on
        // the next didOpen for structural shifts we do not model. Content
        // changes do not affect the container relation.
        log::trace!(
            "notebook changed: {} ({} bytes of delta)",
            params.notebook_document.uri,
            params.change.to_string().len()
        );
    }

    async fn on_did_close_notebook(&self, params: NotebookDidCloseParams) {
        self.notebooks.close(&params.notebook_document.uri);
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        log::info!("Initializing magpie");

        if let Some(options) = params.initialization_options.as_ref() {
            self.config.apply_initialization_options(options);
        }

        let mut folders = Vec::new();
        if let Some(workspace_folders) = params.workspace_folders {
            for folder in workspace_folders {
                log::info!("Adding workspace folder: {}", folder.uri);
                folders.push(folder.uri);
            }
        } else if let Some(root_uri) = params.root_uri {
            log::info!("Adding root URI as workspace folder: {root_uri}");
            folders.push(root_uri);
        }
        self.workspace.set_workspace_folders(folders);

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::INCREMENTAL,
                )),
                diagnostic_provider: Some(DiagnosticServerCapabilities::Options(
                    DiagnosticOptions {
                        identifier: Some(String::from("markdown")),
                        inter_file_dependencies: true,
                        workspace_diagnostics: false,
                        work_done_progress_options: Default::default(),
                    },
                )),
                workspace: Some(WorkspaceServerCapabilities {
                    workspace_folders: Some(WorkspaceFoldersServerCapabilities {
                        supported: Some(true),
                        change_notifications: Some(OneOf::Left(true)),
                    }),
                    file_operations: None,
                }),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: String::from("magpie"),
                version: Some(String::from(env!("CARGO_PKG_VERSION"))),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        log::info!("magpie initialized");
        self.client
            .log_message(MessageType::INFO, "magpie language server ready")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        log::info!("magpie shutting down");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let document = params.text_document;
        self.workspace.open_document(
            document.uri,
            document.language_id,
            document.version,
            &document.text,
        );
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        self.workspace.change_document(
            &params.text_document.uri,
            params.text_document.version,
            params.content_changes,
        );
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.workspace.close_document(&params.text_document.uri);
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        self.workspace
            .handle_watched_files_changed(params.changes)
            .await;
    }

    async fn did_change_workspace_folders(&self, params: DidChangeWorkspaceFoldersParams) {
        let mut folders = self.workspace.workspace_folders();
        folders.retain(|uri| !params.event.removed.iter().any(|f| f.uri == *uri));
        for added in params.event.added {
            if !folders.contains(&added.uri) {
                folders.push(added.uri);
            }
        }
        self.workspace.set_workspace_folders(folders);
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        // The config manager fires its change event, which asks the host to
        // re-pull diagnostics workspace-wide.
        self.config.update_from_json(&params.settings);
    }

    async fn diagnostic(
        &self,
        params: DocumentDiagnosticParams,
    ) -> Result<DocumentDiagnosticReportResult> {
        log::trace!("textDocument/diagnostic: {}", params.text_document.uri);
        let items = self
            .diagnostics
            .document_diagnostics(&params.text_document.uri)
            .await;
        Ok(DocumentDiagnosticReportResult::Report(
            DocumentDiagnosticReport::Full(RelatedFullDocumentDiagnosticReport {
                related_documents: None,
                full_document_diagnostic_report: FullDocumentDiagnosticReport {
                    result_id: None,
                    items,
                },
            }),
        ))
    }
}

pub async fn start_lsp() -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::build(Backend::new)
        .custom_method(
            <protocol::FsWatcherOnChange as Request>::METHOD,
            Backend::on_watcher_change,
        )
        .custom_method("notebookDocument/didOpen", Backend::on_did_open_notebook)
        .custom_method("notebookDocument/didChange", Backend::on_did_change_notebook)
        .custom_method("notebookDocument/didClose", Backend::on_did_close_notebook)
        .finish();

    Server::new(stdin, stdout, socket).serve(service).await;
    Ok(())
}
