//
// gateway.rs
//
// Async boundary to the host editor process
//

use async_trait::async_trait;
use tower_lsp::lsp_types::Url;
use tower_lsp::Client;

use crate::protocol::{
    FileStat, FileWatcherOptions, FindFilesParams, FindMarkdownFilesInWorkspace, FsReadDirectory,
    FsReadFile, FsStat, FsWatcherCreate, FsWatcherDelete, UriParams, WatcherCreateParams,
    WatcherDeleteParams,
};

/// Request/response access to the process that owns the real filesystem and
/// watch primitives.
///
/// Every call is a suspension point and may fail with a transport error;
/// callers above the resolver treat any failure as absence. The watcher
/// methods are fire-and-forget: delivery failures are logged, never
/// propagated.
#[async_trait]
pub trait HostGateway: Send + Sync {
    async fn read_file(&self, uri: &Url) -> anyhow::Result<Vec<u8>>;

    async fn stat(&self, uri: &Url) -> anyhow::Result<Option<FileStat>>;

    async fn read_directory(&self, uri: &Url) -> anyhow::Result<Vec<(String, FileStat)>>;

    async fn find_markdown_files(&self) -> anyhow::Result<Vec<String>>;

    fn watcher_create(
        &self,
        id: u32,
        uri: &Url,
        options: FileWatcherOptions,
        watch_parent_dirs: bool,
    );

    fn watcher_delete(&self, id: u32);
}

/// Gateway implementation over the live LSP connection.
pub struct ClientGateway {
    client: Client,
}

impl ClientGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HostGateway for ClientGateway {
    async fn read_file(&self, uri: &Url) -> anyhow::Result<Vec<u8>> {
        self.client
            .send_request::<FsReadFile>(UriParams {
                uri: uri.to_string(),
            })
            .await
            .map_err(|e| anyhow::anyhow!("fs/readFile({uri}) failed: {e}"))
    }

    async fn stat(&self, uri: &Url) -> anyhow::Result<Option<FileStat>> {
        self.client
            .send_request::<FsStat>(UriParams {
                uri: uri.to_string(),
            })
            .await
            .map_err(|e| anyhow::anyhow!("fs/stat({uri}) failed: {e}"))
    }

    async fn read_directory(&self, uri: &Url) -> anyhow::Result<Vec<(String, FileStat)>> {
        self.client
            .send_request::<FsReadDirectory>(UriParams {
                uri: uri.to_string(),
            })
            .await
            .map_err(|e| anyhow::anyhow!("fs/readDirectory({uri}) failed: {e}"))
    }

    async fn find_markdown_files(&self) -> anyhow::Result<Vec<String>> {
        self.client
            .send_request::<FindMarkdownFilesInWorkspace>(FindFilesParams::default())
            .await
            .map_err(|e| anyhow::anyhow!("findMarkdownFilesInWorkspace failed: {e}"))
    }

    fn watcher_create(
        &self,
        id: u32,
        uri: &Url,
        options: FileWatcherOptions,
        watch_parent_dirs: bool,
    ) {
        let client = self.client.clone();
        let params = WatcherCreateParams {
            id,
            uri: uri.to_string(),
            options,
            watch_parent_dirs,
        };
        tokio::spawn(async move {
            if let Err(e) = client.send_request::<FsWatcherCreate>(params).await {
                log::trace!("fs/watcher/create({id}) not acknowledged: {e}");
            }
        });
    }

    fn watcher_delete(&self, id: u32) {
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client
                .send_request::<FsWatcherDelete>(WatcherDeleteParams { id })
                .await
            {
                log::trace!("fs/watcher/delete({id}) not acknowledged: {e}");
            }
        });
    }
}
