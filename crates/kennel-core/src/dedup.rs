use std::collections::HashSet;

use crate::models::Listing;

/// Unique listings, in first-seen order, and how many copies were dropped.
#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub listings: Vec<Listing>,
    pub duplicates: usize,
}

/// Collapse listings sharing `(lowercase(name), detail_url)`.
///
/// Single pass; the first listing seen for a key wins and later copies are
/// dropped without merging fields. Listings with an empty name and an empty
/// URL all share one key and collapse into one.
pub fn deduplicate(listings: Vec<Listing>) -> DedupOutcome {
    let mut seen = HashSet::with_capacity(listings.len());
    let mut outcome = DedupOutcome {
        listings: Vec::with_capacity(listings.len()),
        duplicates: 0,
    };

    for listing in listings {
        if seen.insert(listing.identity()) {
            outcome.listings.push(listing);
        } else {
            tracing::debug!(
                name = %listing.name,
                url = %listing.detail_url,
                source = %listing.source,
                "Dropping duplicate listing"
            );
            outcome.duplicates += 1;
        }
    }

    outcome
}
