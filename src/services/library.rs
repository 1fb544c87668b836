use crate::error::Result;
use crate::models::TrackSummary;
use crate::services::session::TokenSource;
use crate::services::spotify::SpotifyApi;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};

/// Page size for `/me/tracks`; the provider's maximum.
pub const LIKED_PAGE_SIZE: u32 = 50;

/// One page of the liked-tracks listing.
#[derive(Debug, Clone)]
pub struct LikedPage {
    pub offset: u32,
    /// Items the provider returned, including unavailable ones
    pub received: usize,
    pub total: Option<u32>,
    pub tracks: Vec<TrackSummary>,
}

#[derive(Debug, Clone, Default)]
pub struct LikedCollection {
    pub tracks: Vec<TrackSummary>,
    /// Upstream page requests, counting the terminating empty page
    pub pages_requested: usize,
    pub total: Option<u32>,
}

/// Pages of the user's liked tracks. The stream ends at the first page with
/// no items; neither `total` nor `next` decides termination. Each page
/// starts where the previous one's items ended, so a provider serving
/// fewer items than asked for is followed correctly. Credentials are taken
/// from `tokens` before every request.
pub fn liked_pages<'a>(
    api: &'a dyn SpotifyApi,
    tokens: &'a dyn TokenSource,
) -> impl Stream<Item = Result<LikedPage>> + Send + 'a {
    stream::try_unfold(Some(0u32), move |offset| async move {
        let Some(offset) = offset else {
            return Ok(None);
        };

        let ctx = tokens.current().await?;
        let page = api.saved_tracks(&ctx, offset, LIKED_PAGE_SIZE).await?;
        let received = page.items.len();
        tracing::debug!("Liked tracks page at offset {}: {} items", offset, received);

        if received == 0 {
            return Ok(None);
        }

        let tracks = page
            .items
            .into_iter()
            .filter_map(|item| item.track)
            .filter_map(TrackSummary::from_track)
            .collect();

        let next = offset.checked_add(received as u32);
        Ok(Some((
            LikedPage {
                offset,
                received,
                total: page.total,
                tracks,
            },
            next,
        )))
    })
}

/// Liked tracks one at a time. Finite and not restartable.
pub fn liked_tracks<'a>(
    api: &'a dyn SpotifyApi,
    tokens: &'a dyn TokenSource,
) -> impl Stream<Item = Result<TrackSummary>> + Send + 'a {
    liked_pages(api, tokens)
        .map_ok(|page| stream::iter(page.tracks.into_iter().map(Ok)))
        .try_flatten()
}

pub async fn collect_liked_tracks(
    api: &dyn SpotifyApi,
    tokens: &dyn TokenSource,
) -> Result<LikedCollection> {
    let mut collection = LikedCollection::default();
    let mut pages = Box::pin(liked_pages(api, tokens));

    while let Some(page) = pages.next().await {
        let page = page?;
        collection.pages_requested += 1;
        collection.total = page.total.or(collection.total);
        collection.tracks.extend(page.tracks);
    }
    // the empty page that ended the listing
    collection.pages_requested += 1;

    tracing::info!(
        "Collected {} liked tracks over {} requests",
        collection.tracks.len(),
        collection.pages_requested
    );
    Ok(collection)
}
