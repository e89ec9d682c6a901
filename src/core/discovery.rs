//! Tree Discovery: resolve a course's folder/file tree from its listing pages.
//!
//! The root listing is fetched once, then every folder on it gets one
//! additional request for its own listing. By default expansion stops there:
//! folders found inside a folder are kept as empty folder nodes.

use futures_util::future::BoxFuture;
use futures_util::{stream, FutureExt, StreamExt};
use std::path::Path;

use crate::core::client::ContentFetcher;
use crate::core::listing::{parse_listing, unwrap_xhr, EntryKind, ListingEntry};
use crate::core::material::MaterialNode;
use crate::core::naming::sanitize_file_name;
use crate::error::FetchError;

/// Folder levels below the root whose contents are listed
pub const DEFAULT_MAX_DEPTH: usize = 1;
/// Parallel folder-listing requests
pub const FOLDER_FETCH_CONCURRENCY: usize = 3;

#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub max_depth: usize,
    pub folder_concurrency: usize,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            folder_concurrency: FOLDER_FETCH_CONCURRENCY,
        }
    }
}

pub struct TreeDiscovery<'a> {
    fetcher: &'a dyn ContentFetcher,
    options: DiscoveryOptions,
}

impl<'a> TreeDiscovery<'a> {
    pub fn new(fetcher: &'a dyn ContentFetcher) -> Self {
        Self {
            fetcher,
            options: DiscoveryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: DiscoveryOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the material tree of `course_id`.
    ///
    /// Only a failure of the root listing (or a rejected session) is an error.
    /// A folder whose listing cannot be fetched keeps an empty child list and
    /// a warning.
    pub async fn discover(&self, course_id: &str) -> Result<MaterialNode, FetchError> {
        let portal = self.fetcher.portal();

        // The full table of contents only renders while the TOC view is active
        if let Err(e) = self.fetcher.fetch_page(&portal.toc_state_url(course_id)).await {
            if e.is_auth() {
                return Err(e);
            }
            log::warn!("Could not switch course {} to table-of-contents view: {}", course_id, e);
        }

        let home = portal.content_home(course_id);
        let html = self.fetcher.fetch_page(&home).await?;
        let entries = parse_listing(&html);
        log::debug!("Course {} root listing has {} entries", course_id, entries.len());

        let mut root = MaterialNode::folder(course_id, course_id, Default::default());
        let nodes = entries
            .into_iter()
            .map(|entry| self.node_from_entry(course_id, entry, Path::new("")))
            .collect();
        root.children = self.expand(course_id, nodes, 1).await?;

        Ok(root)
    }

    fn expand<'s>(
        &'s self,
        course_id: &'s str,
        nodes: Vec<MaterialNode>,
        depth: usize,
    ) -> BoxFuture<'s, Result<Vec<MaterialNode>, FetchError>> {
        async move {
            if depth > self.options.max_depth {
                return Ok(nodes);
            }

            let results: Vec<Result<MaterialNode, FetchError>> = stream::iter(nodes)
                .map(|node| self.resolve_folder(course_id, node, depth))
                .buffered(self.options.folder_concurrency.max(1))
                .collect()
                .await;

            results.into_iter().collect()
        }
        .boxed()
    }

    async fn resolve_folder(
        &self,
        course_id: &str,
        mut node: MaterialNode,
        depth: usize,
    ) -> Result<MaterialNode, FetchError> {
        if !node.is_folder() {
            return Ok(node);
        }

        let url = self.fetcher.portal().module_listing(course_id, &node.remote);
        let entries = match self.fetcher.fetch_page(&url).await {
            Ok(body) => match unwrap_xhr(&body) {
                Some(html) => parse_listing(&html),
                None => {
                    return Ok(self.mark_unresolved(node, "unreadable folder listing".to_string()));
                }
            },
            Err(e) if e.is_auth() => return Err(e),
            Err(e) => return Ok(self.mark_unresolved(node, e.to_string())),
        };

        let children: Vec<MaterialNode> = entries
            .into_iter()
            .map(|entry| self.node_from_entry(course_id, entry, &node.target))
            .collect();
        node.children = self.expand(course_id, children, depth + 1).await?;
        Ok(node)
    }

    fn mark_unresolved(&self, mut node: MaterialNode, reason: String) -> MaterialNode {
        log::warn!("Could not fetch contents for folder '{}': {}", node.name, reason);
        node.children.clear();
        node.warning = Some(reason);
        node
    }

    fn node_from_entry(&self, course_id: &str, entry: ListingEntry, parent: &Path) -> MaterialNode {
        let target = parent.join(sanitize_file_name(&entry.name));
        match entry.kind {
            EntryKind::Folder { module_id } => MaterialNode::folder(entry.name, module_id, target),
            EntryKind::File { topic_id, .. } => {
                let url = self.fetcher.portal().file_download(course_id, &topic_id);
                MaterialNode::file(entry.name, url.to_string(), entry.type_label, target)
            }
        }
    }
}

/// Discover `course_id` with the default one-level policy
pub async fn discover(
    fetcher: &dyn ContentFetcher,
    course_id: &str,
) -> Result<MaterialNode, FetchError> {
    TreeDiscovery::new(fetcher).discover(course_id).await
}
