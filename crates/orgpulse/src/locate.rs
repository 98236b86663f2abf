//! Locating an existing published table in the sink.

use tracing::{debug, warn};

use orgpulse_core::SessionContext;

use crate::portal::{ItemQuery, SinkItem, TableSink};

/// Cap on the exhaustive owner listing fallback.
const OWNER_LISTING_LIMIT: usize = 1000;

/// Find the hosted table titled exactly `name` and owned by the session
/// user.
///
/// Search indexes lag behind recent publishes, so three strategies run in
/// order: an exact-title search, a loose one, and finally a listing of
/// everything the user owns. A match requires exact title and owner
/// equality regardless of which strategy produced the candidate; transport
/// failures are logged and treated as "not found here", letting the next
/// strategy run.
pub async fn find_table(
    sink: &dyn TableSink,
    session: &SessionContext,
    name: &str,
) -> Option<SinkItem> {
    let accept = |item: &SinkItem| {
        item.title == name && item.owner == session.username && item.item_type == "Feature Service"
    };

    let queries = [
        ItemQuery::exact(name, &session.username).with_type("Feature Service"),
        ItemQuery::loose(name, &session.username).with_type("Feature Service"),
    ];
    for (tier, query) in queries.into_iter().enumerate() {
        match sink.search_items(&query).await {
            Ok(results) => {
                if let Some(found) = results.into_iter().find(|item| accept(item)) {
                    debug!(table = %name, tier, id = %found.id, "found table via search");
                    return Some(found);
                }
            }
            Err(error) => {
                warn!(table = %name, tier, %error, "table search failed");
            }
        }
    }

    match sink.list_owner_items(&session.username, OWNER_LISTING_LIMIT).await {
        Ok(items) => {
            let found = items.into_iter().find(|item| accept(item));
            if let Some(found) = &found {
                debug!(table = %name, id = %found.id, "found table via owner listing");
            }
            found
        }
        Err(error) => {
            warn!(table = %name, %error, "owner listing failed, treating table as absent");
            None
        }
    }
}
