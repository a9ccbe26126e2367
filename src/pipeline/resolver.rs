//! Monitoree resolution by submission token.

use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::model::Monitoree;
use crate::store::Database;

/// A monitoree together with the inbound token that reached it.
#[derive(Debug, Clone)]
pub struct Resolved<'a> {
    pub monitoree: Monitoree,
    /// The token as it arrived, which may be a retired one.
    pub token: &'a str,
}

/// Resolve a submission token to an active (non-purged) monitoree.
///
/// Falls back to the historical-token map when the token has been rotated.
/// Returns `None` (after logging the token) when nothing matches.
pub async fn resolve_monitoree<'a>(
    db: &dyn Database,
    token: Option<&'a str>,
) -> Result<Option<Resolved<'a>>, DatabaseError> {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        info!("Dropping message without a submission token");
        return Ok(None);
    };

    if let Some(monitoree) = db.get_active_monitoree_by_token(token).await? {
        return Ok(Some(Resolved { monitoree, token }));
    }

    if let Some(current) = db.lookup_current_token(token).await? {
        debug!(token = %token, "Resolving retired submission token");
        if let Some(monitoree) = db.get_active_monitoree_by_token(&current).await? {
            return Ok(Some(Resolved { monitoree, token }));
        }
    }

    info!(token = %token, "No active monitoree for submission token");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    #[tokio::test]
    async fn resolves_current_token() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let m = Monitoree::new("j", "abc123");
        db.insert_monitoree(&m).await.unwrap();

        let found = resolve_monitoree(&db, Some("abc123")).await.unwrap().unwrap();
        assert_eq!(found.monitoree.id, m.id);
        assert_eq!(found.token, "abc123");
    }

    #[tokio::test]
    async fn falls_back_to_historical_token() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let m = Monitoree::new("j", "new-token");
        db.insert_monitoree(&m).await.unwrap();
        db.insert_token_mapping("old-token", "new-token").await.unwrap();

        let found = resolve_monitoree(&db, Some("old-token")).await.unwrap().unwrap();
        assert_eq!(found.monitoree.id, m.id);
        // Attribution keys on the token that arrived, not the current one.
        assert_eq!(found.token, "old-token");
    }

    #[tokio::test]
    async fn mapping_to_purged_monitoree_misses() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let mut m = Monitoree::new("j", "new-token");
        m.purged = true;
        db.insert_monitoree(&m).await.unwrap();
        db.insert_token_mapping("old-token", "new-token").await.unwrap();

        assert!(resolve_monitoree(&db, Some("old-token")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_or_missing_token_misses() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        assert!(resolve_monitoree(&db, Some("nope")).await.unwrap().is_none());
        assert!(resolve_monitoree(&db, None).await.unwrap().is_none());
        assert!(resolve_monitoree(&db, Some("")).await.unwrap().is_none());
    }
}
