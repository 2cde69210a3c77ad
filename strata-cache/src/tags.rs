//! Tag index protocol shared by every store.
//!
//! Each tag owns one index entry, stored in the same backend as the data it
//! indexes, under `<tag_key_prefix><tag>`. A tagged write adds the written key
//! to the index entry of every tag; invalidating a tag deletes every listed
//! key and then the index entry itself.
//!
//! The index is not kept strongly consistent with the data: it may list keys
//! that already expired or were deleted. Those are harmless (deleting a
//! missing key is a no-op) and disappear with the next invalidation.
//!
//! Stores plug their own primitives in through [`TagIndex`]. Backends with an
//! atomic add-member operation use it in [`TagIndex::add_member`];
//! the others read, append and write back, and concurrent writers to the same
//! tag may drop each other's member.

use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::options::Options;
use async_trait::async_trait;
use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, warn};

/// Default prefix of tag index keys.
pub const DEFAULT_TAG_KEY_PREFIX: &str = "gocache_tag_";

/// Default TTL of tag index entries (720 hours).
pub const DEFAULT_TAG_TTL: Duration = Duration::from_secs(720 * 60 * 60);

/// Backend primitives the tag protocol runs on.
#[async_trait]
pub trait TagIndex: Send + Sync {
    /// Members listed under `tag_key`; empty when the entry is absent.
    async fn members(&self, tag_key: &str) -> CacheResult<Vec<String>>;

    /// Add `member` to the entry at `tag_key` (idempotently) and reset the
    /// entry's TTL to `ttl`.
    async fn add_member(&self, tag_key: &str, member: &str, ttl: Duration) -> CacheResult<()>;

    /// Remove the entry stored at the full backend key `key`. Removing a
    /// missing key succeeds.
    async fn remove(&self, key: &str) -> CacheResult<()>;
}

/// Record the full backend key `member` under every tag of `options`.
///
/// Failures are logged per tag and otherwise swallowed: the primary write
/// already happened and must not be reported as failed.
pub async fn index_tags<I>(index: &I, config: &CacheConfig, member: &str, options: &Options)
where
    I: TagIndex + ?Sized,
{
    let ttl = options
        .tags_ttl
        .filter(|ttl| !ttl.is_zero())
        .unwrap_or(config.tag_ttl);

    for tag in &options.tags {
        let tag_key = config.tag_key(tag);
        match index.add_member(&tag_key, member, ttl).await {
            Ok(()) => debug!(tag = %tag, key = %member, "Indexed key under tag"),
            Err(e) => warn!(
                tag = %tag,
                key = %member,
                error = %e,
                "Tag index update failed; key will not be invalidated by this tag"
            ),
        }
    }
}

/// Delete every member of every tag in `tags`, then the tag entries.
///
/// Member deletions run concurrently and independently. The tag entry is
/// deleted even when some members could not be; those stay cached until
/// their own TTL. All sub-failures are returned together.
pub async fn invalidate_tags<I>(index: &I, config: &CacheConfig, tags: &[String]) -> CacheResult<()>
where
    I: TagIndex + ?Sized,
{
    let mut failures = Vec::new();

    for tag in tags {
        let tag_key = config.tag_key(tag);

        let members = match index.members(&tag_key).await {
            Ok(members) => members,
            Err(e) => {
                warn!(tag = %tag, error = %e, "Failed to resolve tag members");
                failures.push(e);
                continue;
            }
        };

        let results = join_all(members.iter().map(|member| index.remove(member))).await;
        for (member, result) in members.iter().zip(results) {
            if let Err(e) = result {
                warn!(tag = %tag, key = %member, error = %e, "Failed to delete tagged key");
                failures.push(e);
            }
        }

        if let Err(e) = index.remove(&tag_key).await {
            warn!(tag = %tag, error = %e, "Failed to delete tag index entry");
            failures.push(e);
        }

        debug!(tag = %tag, members = members.len(), "Invalidated tag");
    }

    CacheError::from_failures("invalidate", failures)
}

/// Append `member` unless it is already listed. Returns whether the list
/// changed.
pub fn append_member(members: &mut Vec<String>, member: &str) -> bool {
    if members.iter().any(|m| m == member) {
        return false;
    }
    members.push(member.to_string());
    true
}

/// Comma-joined member list, used by stores that keep the index as text.
///
/// Members containing `,` are refused by [`comma_list::validate`], since they
/// would decode as several unrelated keys.
pub mod comma_list {
    use crate::error::{CacheError, CacheResult};

    /// Member separator.
    pub const DELIMITER: char = ',';

    /// Check that `member` can be listed.
    pub fn validate(member: &str) -> CacheResult<()> {
        if member.contains(DELIMITER) {
            return Err(CacheError::InvalidKey(format!(
                "{} contains '{}' and cannot be tagged in a text tag index",
                member, DELIMITER
            )));
        }
        Ok(())
    }

    /// Split a stored list; empty segments are dropped.
    pub fn decode(raw: &str) -> Vec<String> {
        raw.split(DELIMITER)
            .filter(|member| !member.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Join members for storage.
    pub fn encode(members: &[String]) -> String {
        members.join(&DELIMITER.to_string())
    }
}
