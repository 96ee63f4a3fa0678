//
// protocol.rs
//
// Custom requests between the server and the host editor client. The host
// owns the real filesystem and watch primitives; these methods let the
// server reach them.
//

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::request::Request;

/// Single-URI request parameter, shared by the `fs/*` methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UriParams {
    pub uri: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    pub is_directory: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindFilesParams {}

/// Watch options forwarded to the host's filesystem watcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileWatcherOptions {
    /// Watch directories recursively.
    pub recursive: bool,
    /// Glob patterns the host should not report events for.
    pub excludes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherCreateParams {
    pub id: u32,
    pub uri: String,
    pub options: FileWatcherOptions,
    /// Also watch parent directories so deletions of ancestors are seen.
    pub watch_parent_dirs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherDeleteParams {
    pub id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchKind {
    Create,
    Change,
    Delete,
}

/// Inbound watch event, tagged with the subscription id it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherChangeParams {
    pub id: u32,
    pub kind: WatchKind,
    pub uri: String,
}

pub enum FsReadFile {}

impl Request for FsReadFile {
    type Params = UriParams;
    type Result = Vec<u8>;
    const METHOD: &'static str = "markdown/fs/readFile";
}

pub enum FsStat {}

impl Request for FsStat {
    type Params = UriParams;
    type Result = Option<FileStat>;
    const METHOD: &'static str = "markdown/fs/stat";
}

pub enum FsReadDirectory {}

impl Request for FsReadDirectory {
    type Params = UriParams;
    type Result = Vec<(String, FileStat)>;
    const METHOD: &'static str = "markdown/fs/readDirectory";
}

pub enum FindMarkdownFilesInWorkspace {}

impl Request for FindMarkdownFilesInWorkspace {
    type Params = FindFilesParams;
    type Result = Vec<String>;
    const METHOD: &'static str = "markdown/findMarkdownFilesInWorkspace";
}

pub enum FsWatcherCreate {}

impl Request for FsWatcherCreate {
    type Params = WatcherCreateParams;
    type Result = ();
    const METHOD: &'static str = "markdown/fs/watcher/create";
}

pub enum FsWatcherDelete {}

impl Request for FsWatcherDelete {
    type Params = WatcherDeleteParams;
    type Result = ();
    const METHOD: &'static str = "markdown/fs/watcher/delete";
}

/// Client-to-server: a watched resource changed.
pub enum FsWatcherOnChange {}

impl Request for FsWatcherOnChange {
    type Params = WatcherChangeParams;
    type Result = ();
    const METHOD: &'static str = "markdown/fs/watcher/onChange";
}
