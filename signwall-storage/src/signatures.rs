//! Signature store seam and its in-memory implementation.
//!
//! The store is the single writer of user and signature rows. A second
//! signature for the same user fails with [`StoreError::UniqueViolation`];
//! nothing upstream checks "already signed" before inserting.

use crate::clock::{Clock, SystemClock};
use async_trait::async_trait;
use signwall_core::{
    LeaderboardEntry, NewSignature, ProviderUser, Signature, SignatureReceipt, SignatureStanding,
    SignwallResult, StoreError,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Name of the uniqueness constraint on `signatures.user_id`.
pub const SIGNATURE_USER_CONSTRAINT: &str = "signatures_user_id_key";

#[async_trait]
pub trait SignatureStore: Send + Sync {
    /// Insert or refresh a user's display fields.
    async fn upsert_user(&self, user: &ProviderUser) -> SignwallResult<()>;

    /// Insert a signature and report its queue position as of the commit.
    async fn insert_signature(&self, new: &NewSignature) -> SignwallResult<SignatureReceipt>;

    /// Hard-delete the user's signature. Returns whether a row was removed.
    async fn delete_signature(&self, user_id: &str) -> SignwallResult<bool>;

    async fn find_signature(&self, user_id: &str) -> SignwallResult<Option<Signature>>;

    async fn has_signed(&self, user_id: &str) -> SignwallResult<bool> {
        Ok(self.find_signature(user_id).await?.is_some())
    }

    /// 1-based position by signing time, `None` if the user has not signed.
    async fn queue_position(&self, user_id: &str) -> SignwallResult<Option<i64>>;

    /// Number of signatures naming `user_id` as referrer.
    async fn referral_count(&self, user_id: &str) -> SignwallResult<i64>;

    /// 1-based rank by referral count, ties sharing a rank. `None` when the
    /// user has referred nobody.
    async fn referral_rank(&self, user_id: &str) -> SignwallResult<Option<i64>>;

    /// Top referrers, best first.
    async fn leaderboard(&self, limit: usize) -> SignwallResult<Vec<LeaderboardEntry>>;

    async fn signature_count(&self) -> SignwallResult<i64>;

    async fn standing(&self, user_id: &str) -> SignwallResult<SignatureStanding> {
        let signature = self.find_signature(user_id).await?;
        let position = match signature {
            Some(_) => self.queue_position(user_id).await?,
            None => None,
        };
        Ok(SignatureStanding {
            has_signed: signature.is_some(),
            position,
            referral_count: self.referral_count(user_id).await?,
            referral_rank: self.referral_rank(user_id).await?,
            referred_by: signature.and_then(|s| s.referrer_id),
        })
    }

    /// Round-trip check used by readiness checks.
    async fn ping(&self) -> SignwallResult<()> {
        Ok(())
    }
}

// ============================================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================================

#[derive(Default)]
struct Tables {
    users: HashMap<String, ProviderUser>,
    signatures: Vec<Signature>,
    next_id: i64,
}

impl Tables {
    fn position_of(&self, user_id: &str) -> Option<i64> {
        let own = self.signatures.iter().find(|s| s.user_id == user_id)?;
        let ahead = self
            .signatures
            .iter()
            .filter(|s| (s.created_at, s.id) < (own.created_at, own.id))
            .count();
        Some(ahead as i64 + 1)
    }

    fn referral_counts(&self) -> HashMap<&str, i64> {
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for referrer in self.signatures.iter().filter_map(|s| s.referrer_id.as_deref()) {
            *counts.entry(referrer).or_default() += 1;
        }
        counts
    }
}

/// Signature store held in process memory. Position is computed under the
/// same write lock as the insert, mirroring the transactional PostgreSQL
/// implementation.
pub struct InMemorySignatureStore {
    tables: RwLock<Tables>,
    clock: Arc<dyn Clock>,
}

impl InMemorySignatureStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tables: RwLock::new(Tables {
                next_id: 1,
                ..Tables::default()
            }),
            clock,
        }
    }

    pub fn user(&self, user_id: &str) -> Option<ProviderUser> {
        self.tables.read().ok()?.users.get(user_id).cloned()
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable {
            reason: "signature store lock poisoned".to_string(),
        }
    }
}

impl Default for InMemorySignatureStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignatureStore for InMemorySignatureStore {
    async fn upsert_user(&self, user: &ProviderUser) -> SignwallResult<()> {
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        tables.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn insert_signature(&self, new: &NewSignature) -> SignwallResult<SignatureReceipt> {
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        if tables.signatures.iter().any(|s| s.user_id == new.user_id) {
            return Err(StoreError::UniqueViolation {
                constraint: SIGNATURE_USER_CONSTRAINT.to_string(),
            }
            .into());
        }
        let signature = Signature {
            id: tables.next_id,
            user_id: new.user_id.clone(),
            referrer_id: new.referrer_id.clone(),
            created_at: self.clock.now(),
        };
        tables.next_id += 1;
        tables.signatures.push(signature.clone());
        let position = tables
            .position_of(&signature.user_id)
            .ok_or_else(|| StoreError::backend("insert_signature", "inserted row not visible"))?;
        Ok(SignatureReceipt {
            signature,
            position,
        })
    }

    async fn delete_signature(&self, user_id: &str) -> SignwallResult<bool> {
        let mut tables = self.tables.write().map_err(|_| Self::poisoned())?;
        let before = tables.signatures.len();
        tables.signatures.retain(|s| s.user_id != user_id);
        Ok(tables.signatures.len() != before)
    }

    async fn find_signature(&self, user_id: &str) -> SignwallResult<Option<Signature>> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        Ok(tables
            .signatures
            .iter()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn queue_position(&self, user_id: &str) -> SignwallResult<Option<i64>> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        Ok(tables.position_of(user_id))
    }

    async fn referral_count(&self, user_id: &str) -> SignwallResult<i64> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        Ok(tables
            .signatures
            .iter()
            .filter(|s| s.referrer_id.as_deref() == Some(user_id))
            .count() as i64)
    }

    async fn referral_rank(&self, user_id: &str) -> SignwallResult<Option<i64>> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        let counts = tables.referral_counts();
        let Some(own) = counts.get(user_id).copied() else {
            return Ok(None);
        };
        let better = counts.values().filter(|&&count| count > own).count();
        Ok(Some(better as i64 + 1))
    }

    async fn leaderboard(&self, limit: usize) -> SignwallResult<Vec<LeaderboardEntry>> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        let counts = tables.referral_counts();
        let mut rows: Vec<(&str, i64)> = counts.into_iter().collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let mut entries = Vec::with_capacity(rows.len().min(limit));
        let mut rank = 0;
        let mut previous = None;
        for (index, (user_id, count)) in rows.into_iter().enumerate().take(limit) {
            if previous != Some(count) {
                rank = index as i64 + 1;
                previous = Some(count);
            }
            entries.push(LeaderboardEntry {
                rank,
                user_id: user_id.to_string(),
                username: tables.users.get(user_id).map(ProviderUser::display_name),
                referral_count: count,
            });
        }
        Ok(entries)
    }

    async fn signature_count(&self) -> SignwallResult<i64> {
        let tables = self.tables.read().map_err(|_| Self::poisoned())?;
        Ok(tables.signatures.len() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use signwall_core::SignwallError;
    use std::time::Duration;

    const A: &str = "100000000000000001";
    const B: &str = "100000000000000002";
    const C: &str = "100000000000000003";
    const D: &str = "100000000000000004";

    fn new_sig(user: &str, referrer: Option<&str>) -> NewSignature {
        NewSignature {
            user_id: user.to_string(),
            referrer_id: referrer.map(str::to_string),
        }
    }

    fn store() -> (InMemorySignatureStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::starting_now());
        (InMemorySignatureStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_positions_follow_signing_order() {
        let (store, clock) = store();
        let mut positions = Vec::new();
        for user in [A, B, C] {
            positions.push(store.insert_signature(&new_sig(user, None)).await.unwrap().position);
            clock.advance(Duration::from_millis(10));
        }
        assert_eq!(positions, vec![1, 2, 3]);
        assert_eq!(store.queue_position(C).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_same_timestamp_breaks_ties_by_id() {
        let (store, _) = store();
        store.insert_signature(&new_sig(A, None)).await.unwrap();
        let second = store.insert_signature(&new_sig(B, None)).await.unwrap();
        assert_eq!(second.position, 2);
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_unique_violation() {
        let (store, _) = store();
        let first = store.insert_signature(&new_sig(A, None)).await.unwrap();
        let err = store
            .insert_signature(&new_sig(A, Some(B)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SignwallError::Store(StoreError::UniqueViolation { .. })
        ));
        assert_eq!(store.find_signature(A).await.unwrap(), Some(first.signature));
        assert_eq!(store.signature_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_hard_and_idempotent() {
        let (store, _) = store();
        store.insert_signature(&new_sig(A, None)).await.unwrap();
        assert!(store.delete_signature(A).await.unwrap());
        assert!(!store.delete_signature(A).await.unwrap());
        assert!(!store.has_signed(A).await.unwrap());
        // A can sign again after unsigning.
        store.insert_signature(&new_sig(A, None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_referral_rank_shares_ties() {
        let (store, clock) = store();
        store.insert_signature(&new_sig(A, None)).await.unwrap();
        store.insert_signature(&new_sig(B, None)).await.unwrap();
        clock.advance(Duration::from_secs(1));
        store.insert_signature(&new_sig(C, Some(A))).await.unwrap();
        store.insert_signature(&new_sig(D, Some(A))).await.unwrap();
        store
            .insert_signature(&new_sig("100000000000000005", Some(B)))
            .await
            .unwrap();
        store
            .insert_signature(&new_sig("100000000000000006", Some(C)))
            .await
            .unwrap();

        assert_eq!(store.referral_count(A).await.unwrap(), 2);
        assert_eq!(store.referral_rank(A).await.unwrap(), Some(1));
        assert_eq!(store.referral_rank(B).await.unwrap(), Some(2));
        assert_eq!(store.referral_rank(C).await.unwrap(), Some(2));
        assert_eq!(store.referral_rank(D).await.unwrap(), None);

        let board = store.leaderboard(10).await.unwrap();
        let ranks: Vec<(String, i64)> = board.iter().map(|e| (e.user_id.clone(), e.rank)).collect();
        assert_eq!(
            ranks,
            vec![(A.to_string(), 1), (B.to_string(), 2), (C.to_string(), 2)]
        );
        assert_eq!(store.leaderboard(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_standing_combines_signature_and_ranks() {
        let (store, _) = store();
        store
            .upsert_user(&ProviderUser {
                id: A.to_string(),
                username: "alpha".to_string(),
                discriminator: "0".to_string(),
                avatar_hash: None,
            })
            .await
            .unwrap();
        store.insert_signature(&new_sig(A, None)).await.unwrap();
        store.insert_signature(&new_sig(B, Some(A))).await.unwrap();

        let standing = store.standing(B).await.unwrap();
        assert!(standing.has_signed);
        assert_eq!(standing.position, Some(2));
        assert_eq!(standing.referred_by.as_deref(), Some(A));

        let standing = store.standing(A).await.unwrap();
        assert_eq!(standing.referral_count, 1);
        assert_eq!(standing.referral_rank, Some(1));

        assert_eq!(store.standing(C).await.unwrap(), SignatureStanding::default());
        assert_eq!(
            store.leaderboard(5).await.unwrap()[0].username.as_deref(),
            Some("alpha")
        );
    }

    proptest::proptest! {
        #[test]
        fn prop_positions_stay_dense_after_unsigns(
            signers in 1usize..20,
            removed in proptest::collection::vec(proptest::bool::ANY, 20),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let positions = runtime.block_on(async {
                let (store, clock) = store();
                let ids: Vec<String> = (0..signers)
                    .map(|n| (100_000_000_000_000_000u64 + n as u64).to_string())
                    .collect();
                for id in &ids {
                    store.insert_signature(&new_sig(id, None)).await.unwrap();
                    clock.advance(Duration::from_millis(1));
                }
                let mut positions = Vec::new();
                for (id, remove) in ids.iter().zip(&removed) {
                    if *remove {
                        store.delete_signature(id).await.unwrap();
                    }
                }
                for id in &ids {
                    if let Some(position) = store.queue_position(id).await.unwrap() {
                        positions.push(position);
                    }
                }
                positions
            });
            let expected: Vec<i64> = (1..=positions.len() as i64).collect();
            proptest::prop_assert_eq!(positions, expected);
        }
    }
}
