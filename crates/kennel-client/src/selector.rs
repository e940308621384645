//! CSS-selector driven collectors.
//!
//! Most shelter sites are a paginated grid of cards, each with a name and a
//! link to a detail page. A [`SelectorSource`] describes one such site in
//! JSON so adding a shelter needs no code:
//!
//! ```json
//! {
//!   "name": "happy-paws",
//!   "url": "https://happypaws.example/adopt/dogs",
//!   "card": "article.dog",
//!   "name_selector": "h2",
//!   "next_page": "a.next",
//!   "follow_detail": true,
//!   "description": ".dog-story",
//!   "extras": { "age": ".age" }
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use kennel_core::collector::{CollectContext, Collection, Collector};
use kennel_core::error::AppError;
use kennel_core::models::Listing;
use kennel_core::traits::Fetcher;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

fn default_max_pages() -> usize {
    10
}

fn default_true() -> bool {
    true
}

/// One site's scraping recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectorSource {
    pub name: String,
    /// First listing page.
    pub url: String,
    /// Matches one element per dog.
    pub card: String,
    /// Within a card.
    pub name_selector: String,
    /// Within a card; the element's `href` is the detail URL. Without it the
    /// card itself (if it is a link) or its first `a[href]` is used.
    #[serde(default)]
    pub link: Option<String>,
    /// Applied to the detail page when `follow_detail` is set, otherwise
    /// within the card. Without it the whole detail page's text is used.
    #[serde(default)]
    pub description: Option<String>,
    /// Link to the next listing page, searched in the whole document.
    #[serde(default)]
    pub next_page: Option<String>,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Fetch through the headless browser.
    #[serde(default)]
    pub render: bool,
    /// Fetch each detail page for the description.
    #[serde(default)]
    pub follow_detail: bool,
    /// Consult and fill the Fetch Cache for detail pages.
    #[serde(default = "default_true")]
    pub use_cache: bool,
    /// Extra fields: output key to selector within the card.
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
}

/// Read a JSON array of sources.
pub fn load_sources(path: &Path) -> Result<Vec<SelectorSource>, AppError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        AppError::ConfigError(format!("Cannot read sources file {}: {e}", path.display()))
    })?;
    let sources: Vec<SelectorSource> = serde_json::from_str(&raw)?;
    Ok(sources)
}

struct Selectors {
    card: Selector,
    name: Selector,
    link: Option<Selector>,
    description: Option<Selector>,
    next_page: Option<Selector>,
    extras: Vec<(String, Selector)>,
}

fn compile(source: &str, field: &str, css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| {
        AppError::ConfigError(format!("Source '{source}': invalid {field} selector '{css}': {e}"))
    })
}

/// What one card yields before any detail page is visited.
#[derive(Debug)]
struct Card {
    name: String,
    detail_url: String,
    description: String,
    extras: BTreeMap<String, String>,
}

/// Drives one [`SelectorSource`].
pub struct SelectorCollector {
    source: SelectorSource,
    start: Url,
    selectors: Selectors,
    any_link: Selector,
}

impl SelectorCollector {
    /// Validates the start URL and compiles every selector up front.
    pub fn new(source: SelectorSource) -> Result<Self, AppError> {
        let name = source.name.as_str();
        let start = Url::parse(&source.url).map_err(|e| {
            AppError::ConfigError(format!("Source '{name}': invalid url '{}': {e}", source.url))
        })?;
        let optional = |field: &str, css: &Option<String>| {
            css.as_deref().map(|css| compile(name, field, css)).transpose()
        };

        let selectors = Selectors {
            card: compile(name, "card", &source.card)?,
            name: compile(name, "name", &source.name_selector)?,
            link: optional("link", &source.link)?,
            description: optional("description", &source.description)?,
            next_page: optional("next_page", &source.next_page)?,
            extras: source
                .extras
                .iter()
                .map(|(key, css)| Ok((key.clone(), compile(name, key, css)?)))
                .collect::<Result<_, AppError>>()?,
        };
        let any_link = compile(name, "link", "a[href]")?;

        Ok(Self {
            start,
            selectors,
            any_link,
            source,
        })
    }

    async fn get<F: Fetcher>(&self, ctx: &CollectContext<F>, url: &str) -> Result<String, AppError> {
        if self.source.render {
            ctx.fetcher.render(url).await
        } else {
            ctx.fetcher.fetch(url).await
        }
    }

    /// Cards on one listing page plus the next page's URL, if any.
    fn parse_listing_page(&self, html: &str, base: &Url) -> (Vec<Card>, Option<Url>) {
        let document = Html::parse_document(html);
        let cards = document
            .select(&self.selectors.card)
            .map(|card| self.parse_card(card, base))
            .collect();
        let next = self.selectors.next_page.as_ref().and_then(|selector| {
            document
                .select(selector)
                .find_map(|a| a.value().attr("href"))
                .and_then(|href| base.join(href).ok())
        });
        (cards, next)
    }

    fn parse_card(&self, card: ElementRef<'_>, base: &Url) -> Card {
        let href = match &self.selectors.link {
            Some(selector) => card.select(selector).find_map(|a| a.value().attr("href")),
            None => card
                .value()
                .attr("href")
                .or_else(|| card.select(&self.any_link).find_map(|a| a.value().attr("href"))),
        };
        let detail_url = href
            .and_then(|href| base.join(href).ok())
            .map(String::from)
            .unwrap_or_default();

        let description = if self.source.follow_detail {
            String::new()
        } else {
            self.selectors
                .description
                .as_ref()
                .map(|selector| first_text(card, selector))
                .unwrap_or_default()
        };

        let extras = self
            .selectors
            .extras
            .iter()
            .map(|(key, selector)| (key.clone(), first_text(card, selector)))
            .filter(|(_, value)| !value.is_empty())
            .collect();

        Card {
            name: first_text(card, &self.selectors.name),
            detail_url,
            description,
            extras,
        }
    }

    fn parse_detail_page(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        match &self.selectors.description {
            Some(selector) => document
                .select(selector)
                .map(element_text)
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
            None => element_text(document.root_element()),
        }
    }

    /// Description from the Fetch Cache or the detail page. Failures leave
    /// it empty; the scoring pass gets another chance.
    async fn detail_description<F: Fetcher>(&self, ctx: &CollectContext<F>, card: &Card) -> String {
        if card.detail_url.is_empty() {
            return String::new();
        }
        if self.source.use_cache
            && let Some(entry) = ctx.cached(&card.detail_url)
        {
            return entry.text;
        }

        match self.get(ctx, &card.detail_url).await {
            Ok(html) => {
                let text = self.parse_detail_page(&html);
                if self.source.use_cache {
                    ctx.remember(&card.detail_url, &text, Some(card.name.as_str()))
                        .await;
                }
                text
            }
            Err(e) => {
                tracing::warn!(
                    source = %self.source.name,
                    url = %card.detail_url,
                    error = %e,
                    "Failed to fetch detail page"
                );
                String::new()
            }
        }
    }
}

#[async_trait]
impl<F: Fetcher> Collector<F> for SelectorCollector {
    fn name(&self) -> &str {
        &self.source.name
    }

    async fn collect(&self, ctx: &CollectContext<F>) -> Collection {
        let mut listings = Vec::new();
        let mut visited = HashSet::new();
        let mut page_url = self.start.clone();

        for page in 1..=self.source.max_pages.max(1) {
            if !visited.insert(page_url.clone()) {
                break;
            }

            let html = match self.get(ctx, page_url.as_str()).await {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!(source = %self.source.name, page, url = %page_url, error = %e, "Stopping pagination");
                    return Collection::partial(listings, e);
                }
            };

            let (cards, next) = self.parse_listing_page(&html, &page_url);
            tracing::debug!(source = %self.source.name, page, cards = cards.len(), "Parsed listing page");
            if cards.is_empty() {
                break;
            }

            for card in cards {
                let description = if self.source.follow_detail {
                    self.detail_description(ctx, &card).await
                } else {
                    card.description.clone()
                };
                let listing = card.extras.into_iter().fold(
                    Listing::new(&self.source.name, card.name, card.detail_url)
                        .with_description(description)
                        .with_render(self.source.render),
                    |listing, (key, value)| listing.with_extra(key, value),
                );
                listings.push(listing);
            }

            match next {
                Some(url) => page_url = url,
                None => break,
            }
        }

        Collection::ok(listings)
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
}

fn first_text(card: ElementRef<'_>, selector: &Selector) -> String {
    card.select(selector).next().map(element_text).unwrap_or_default()
}
