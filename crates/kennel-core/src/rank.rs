use crate::models::Listing;

/// Order listings by score, highest first.
///
/// The sort is stable: equal scores keep the order the scoring pass produced,
/// and unscored listings (`-1`) sink to the end.
pub fn rank(mut listings: Vec<Listing>) -> Vec<Listing> {
    listings.sort_by(|a, b| b.score.cmp(&a.score));
    listings
}
