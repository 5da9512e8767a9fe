//! Loads every page listed in a sitemap as a [`Document`].
//!
//! Sitemap indexes are followed one level at a time until only page URLs are
//! left. Pages are fetched one after another and reduced to their visible text.

use crate::document::{normalize_whitespace, Document, DocumentSource};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use regex::Regex;
use scraper::{Html, Selector};

pub const DEFAULT_SITEMAP_URL: &str = "https://docs.smith.langchain.com/sitemap.xml";

/// Nested sitemap indexes deeper than this are ignored
const MAX_SITEMAP_DEPTH: usize = 3;

/// URLs found in one sitemap file
#[derive(Debug, Default, PartialEq)]
pub struct SitemapEntries {
    /// `<url><loc>` entries, pages to load
    pub pages: Vec<String>,
    /// `<sitemap><loc>` entries, nested sitemaps to expand
    pub sitemaps: Vec<String>,
}

/// Extract page and nested-sitemap locations from sitemap XML
pub fn parse_sitemap(xml: &str) -> Result<SitemapEntries> {
    let entry_re = Regex::new(r"(?s)<(url|sitemap)\b[^>]*>(.*?)</(?:url|sitemap)>")?;
    let loc_re = Regex::new(r"(?s)<loc>\s*(.*?)\s*</loc>")?;

    let mut entries = SitemapEntries::default();
    for entry in entry_re.captures_iter(xml) {
        let Some(loc) = loc_re.captures(&entry[2]) else {
            continue;
        };
        let url = unescape_xml(&loc[1]);
        if url.is_empty() {
            continue;
        }

        match &entry[1] {
            "sitemap" => entries.sitemaps.push(url),
            _ => entries.pages.push(url),
        }
    }

    Ok(entries)
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Extract the readable text of an HTML page.
///
/// Prefers `<main>`, then `<article>`, then `<body>`. Script and style
/// contents are skipped. Each text run becomes its own paragraph.
pub fn extract_page_text(html: &str) -> String {
    let document = Html::parse_document(html);

    let root = ["main", "article", "body"]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| document.select(&selector).next());

    let Some(root) = root else {
        return String::new();
    };

    let mut paragraphs = Vec::new();
    for node in root.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node
            .parent()
            .and_then(|parent| parent.value().as_element())
            .is_some_and(|element| matches!(element.name(), "script" | "style" | "noscript"));
        if hidden {
            continue;
        }

        let text = normalize_whitespace(&text.replace('\n', " "));
        if !text.is_empty() {
            paragraphs.push(text);
        }
    }

    paragraphs.join("\n\n")
}

/// Loads documents from the pages of a sitemap
pub struct SitemapLoader {
    client: reqwest::Client,
    web_path: String,
    continue_on_failure: bool,
}

impl SitemapLoader {
    pub fn new(web_path: impl Into<String>) -> Self {
        SitemapLoader {
            client: reqwest::Client::new(),
            web_path: web_path.into(),
            continue_on_failure: false,
        }
    }

    /// Skip pages that fail to load instead of aborting the whole load
    pub fn continue_on_failure(mut self, enabled: bool) -> Self {
        self.continue_on_failure = enabled;
        self
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Request to {} failed: {}",
                url,
                response.status()
            ));
        }

        Ok(response.text().await?)
    }

    /// Resolve the sitemap (and any nested sitemaps) into page URLs
    async fn page_urls(&self) -> Result<Vec<String>> {
        let mut pages = Vec::new();
        let mut pending = vec![(self.web_path.clone(), 0)];

        while let Some((sitemap_url, depth)) = pending.pop() {
            let xml = match self.fetch(&sitemap_url).await {
                Ok(xml) => xml,
                // the top-level sitemap is required
                Err(e) if depth == 0 || !self.continue_on_failure => {
                    return Err(e).with_context(|| format!("Failed to fetch sitemap {}", sitemap_url));
                }
                Err(e) => {
                    warn!("Skipping sitemap {}: {:#}", sitemap_url, e);
                    continue;
                }
            };

            let entries = parse_sitemap(&xml)?;
            debug!(
                "Sitemap {} lists {} pages and {} sitemaps",
                sitemap_url,
                entries.pages.len(),
                entries.sitemaps.len()
            );
            pages.extend(entries.pages);

            if depth + 1 < MAX_SITEMAP_DEPTH {
                // reversed so nested sitemaps are visited in document order
                pending.extend(entries.sitemaps.into_iter().rev().map(|s| (s, depth + 1)));
            } else if !entries.sitemaps.is_empty() {
                warn!("Ignoring sitemaps nested deeper than {}", MAX_SITEMAP_DEPTH);
            }
        }

        Ok(pages)
    }
}

impl DocumentSource for SitemapLoader {
    async fn load(&self) -> Result<Vec<Document>> {
        let urls = self.page_urls().await?;
        info!("Loading {} pages from {}", urls.len(), self.web_path);

        let mut documents = Vec::with_capacity(urls.len());
        for url in urls {
            match self.fetch(&url).await {
                Ok(html) => documents.push(Document::new(extract_page_text(&html), url)),
                Err(e) if self.continue_on_failure => {
                    warn!("Skipping {}: {:#}", url, e);
                }
                Err(e) => return Err(e),
            }
        }

        info!("Loaded {} documents", documents.len());
        Ok(documents)
    }
}
