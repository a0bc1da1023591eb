//! Filesystem persistence sink
//!
//! Writes one directory per page plus the crawl-wide JSON files. Every JSON
//! file is written to a temporary sibling and renamed into place, so readers
//! only ever see a complete previous or complete new version.

use crate::classify::PageClassification;
use crate::crawler::PageMetadata;
use crate::output::traits::{
    ImageDescriptor, OutboundLink, OutputError, OutputResult, PageRecord, PersistenceSink,
};
use crate::output::{
    CHECKPOINT_FILE, HIERARCHY_FILE, IMAGES_DIR, LISTINGS_FILE, PAGE_INFO_FILE, TEXT_DIR,
    TEXT_FILE,
};
use crate::state::{CrawlSession, HierarchyTree, PageListings};
use crate::url::NormalizedUrl;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Sink that writes crawl output under a root directory
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
}

/// On-disk shape of `page_info.json`
#[derive(Serialize)]
struct PageInfo<'a> {
    url: &'a NormalizedUrl,
    fetched_url: &'a str,
    parent: Option<&'a NormalizedUrl>,
    depth: u32,
    classification: PageClassification,
    discovered_at: u64,
    fetched_at: &'a DateTime<Utc>,
    status: u16,
    content_type: &'a str,
    path: &'a str,
    metadata: &'a PageMetadata,
    structured_data: &'a [serde_json::Value],
    images: &'a [ImageDescriptor],
    links: &'a [OutboundLink],
    local_text_file: &'a str,
}

impl FsSink {
    /// Creates the output directory if needed and checks that it is writable
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let probe = root.join(".write-test");
        fs::write(&probe, b"")?;
        fs::remove_file(&probe)?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Loads the checkpoint left by a previous crawl, if there is one
    pub fn load_checkpoint(&self) -> OutputResult<Option<CrawlSession>> {
        let path = self.root.join(CHECKPOINT_FILE);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(OutputError::Io { path, source }),
        };

        serde_json::from_slice(&content)
            .map(Some)
            .map_err(|source| OutputError::Checkpoint { path, source })
    }

    fn ensure_dir(&self, dir: &Path) -> OutputResult<()> {
        fs::create_dir_all(dir).map_err(|source| OutputError::Io {
            path: dir.to_path_buf(),
            source,
        })
    }
}

impl PersistenceSink for FsSink {
    fn write_page(&mut self, record: &PageRecord, text: &str) -> OutputResult<()> {
        let page_dir = self.root.join(&record.page_dir);
        let text_dir = page_dir.join(TEXT_DIR);
        self.ensure_dir(&text_dir)?;

        let content = format!(
            "URL: {}\nPage Type: {}\n\n{}",
            record.node.url, record.node.classification, text
        );
        write_file(&text_dir.join(TEXT_FILE), content.as_bytes())?;

        let info = PageInfo {
            url: &record.node.url,
            fetched_url: &record.fetched_url,
            parent: record.node.parent.as_ref(),
            depth: record.node.depth,
            classification: record.node.classification,
            discovered_at: record.node.discovered_at,
            fetched_at: &record.fetched_at,
            status: record.status,
            content_type: &record.content_type,
            path: record.node.url.path(),
            metadata: &record.metadata,
            structured_data: &record.structured_data,
            images: &record.images,
            links: &record.outbound_links,
            local_text_file: &record.text_ref,
        };
        write_json_atomic(&page_dir.join(PAGE_INFO_FILE), "page info", &info)?;

        tracing::debug!("Saved page {} to {}", record.node.url, page_dir.display());
        Ok(())
    }

    fn write_image(
        &mut self,
        page_dir: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> OutputResult<String> {
        let images_dir = self.root.join(page_dir).join(IMAGES_DIR);
        self.ensure_dir(&images_dir)?;
        write_file(&images_dir.join(file_name), bytes)?;
        Ok(format!("{}/{}/{}", page_dir, IMAGES_DIR, file_name))
    }

    fn write_hierarchy(&mut self, tree: Option<&HierarchyTree>) -> OutputResult<()> {
        write_json_atomic(&self.root.join(HIERARCHY_FILE), "hierarchy", &tree)
    }

    fn write_listings(&mut self, listings: &PageListings) -> OutputResult<()> {
        write_json_atomic(&self.root.join(LISTINGS_FILE), "page listings", listings)
    }

    fn write_checkpoint(&mut self, session: &CrawlSession) -> OutputResult<()> {
        write_json_atomic(&self.root.join(CHECKPOINT_FILE), "checkpoint", session)
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> OutputResult<()> {
    fs::write(path, bytes).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Serializes `value` to a temporary sibling of `path`, then renames it
fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    what: &'static str,
    value: &T,
) -> OutputResult<()> {
    let json =
        serde_json::to_vec_pretty(value).map_err(|source| OutputError::Serialize { what, source })?;

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let io_err = |source: std::io::Error| OutputError::Io {
        path: tmp_path.clone(),
        source,
    };
    let mut file = fs::File::create(&tmp_path).map_err(io_err)?;
    file.write_all(&json).map_err(io_err)?;
    file.sync_all().map_err(io_err)?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })
}
