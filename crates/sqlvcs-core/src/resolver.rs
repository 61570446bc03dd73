//! Three-way resolution of live catalog, base tree, and per-database
//! overlay into the overlay delta.
//!
//! For every object key the resolver materializes the triple
//! `{db, base, diff}` and decides which single overlay mutation (if any)
//! makes the overlay-resolved view equal the live catalog:
//!
//! - live ≡ base with an overlay present → the overlay is redundant, delete it;
//! - object absent in the database and the overlay is not already a
//!   tombstone → write a zero-byte tombstone;
//! - live differs from the overlay → write the live definition.
//!
//! Changes on ignored paths are discarded, and when resolving against a
//! stale tag a cross-check against the repository HEAD drops writes that
//! are already reflected upstream.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::SyncConfig;
use crate::domain::{DbObject, FullObject, ObjectKey, RepoChange};
use crate::error::Result;
use crate::ignore::IgnoreRules;
use crate::normalize::SqlNormalizer;
use crate::paths::{self, BASE_ROOT};
use crate::ports::RepositoryStore;

pub struct OverlayResolver<'a> {
    store: &'a dyn RepositoryStore,
    normalizer: &'a SqlNormalizer,
    ignore: &'a IgnoreRules,
    config: &'a SyncConfig,
}

impl<'a> OverlayResolver<'a> {
    pub fn new(
        store: &'a dyn RepositoryStore,
        normalizer: &'a SqlNormalizer,
        ignore: &'a IgnoreRules,
        config: &'a SyncConfig,
    ) -> Self {
        Self {
            store,
            normalizer,
            ignore,
            config,
        }
    }

    /// Overlay mutations required so the overlay-resolved view of
    /// `commitish` equals the live catalog of `db_name`.
    pub async fn resolve_overlay_delta(
        &self,
        live_objects: &[DbObject],
        commitish: &str,
        db_name: &str,
    ) -> Result<Vec<RepoChange>> {
        let diff_root = self.config.diff_root(db_name);
        let triples = self.build_triples(live_objects, commitish, &diff_root).await?;

        let mut changes = Vec::new();
        for (key, triple) in &triples {
            let Some(change) = self.decide(key, triple, &diff_root) else {
                continue;
            };
            if !self.ignore.should_process(&change.path) {
                debug!(path = %change.path, "overlay change discarded by ignore rules");
                continue;
            }
            changes.push(change);
        }

        // Resolving against a stale tag: drop changes the repository HEAD
        // already reflects.
        if !self.store.is_head(commitish).await? {
            let mut surviving = Vec::with_capacity(changes.len());
            for change in changes {
                if !self.reflected_at_head(&change).await? {
                    surviving.push(change);
                }
            }
            changes = surviving;
        }

        Ok(changes)
    }

    async fn build_triples(
        &self,
        live_objects: &[DbObject],
        commitish: &str,
        diff_root: &str,
    ) -> Result<BTreeMap<ObjectKey, FullObject>> {
        let mut triples: BTreeMap<ObjectKey, FullObject> = BTreeMap::new();

        for object in live_objects {
            triples.entry(object.key.clone()).or_default().db_definition =
                object.definition.clone();
        }

        for (path, content) in self.store.read_tree(commitish, BASE_ROOT).await? {
            let key = paths::path_to_key(&path)?;
            triples.entry(key).or_default().base_definition =
                Some(String::from_utf8_lossy(&content).into_owned());
        }

        for (path, content) in self.store.read_tree(commitish, diff_root).await? {
            let key = paths::path_to_key(&path)?;
            triples.entry(key).or_default().diff_definition =
                Some(String::from_utf8_lossy(&content).into_owned());
        }

        Ok(triples)
    }

    fn decide(&self, key: &ObjectKey, triple: &FullObject, diff_root: &str) -> Option<RepoChange> {
        let diff_path = paths::key_to_path(key, diff_root);
        let db = triple.db_definition.as_deref();
        let base = triple.base_definition.as_deref();
        let diff = triple.diff_definition.as_deref();

        // Absent in the database: the overlay must say so. An existing
        // tombstone stays put, even when the base side is gone too.
        if db.is_none() {
            if diff != Some("") {
                return Some(RepoChange::tombstone(diff_path));
            }
            return None;
        }

        // Live matches base: any overlay for this key is redundant.
        if self.normalizer.equivalent(db, base) {
            if diff.is_some() {
                return Some(RepoChange::delete(diff_path));
            }
            return None;
        }

        if !self.normalizer.equivalent(db, diff) {
            return Some(RepoChange::write(diff_path, db.unwrap_or_default()));
        }

        None
    }

    /// Whether the repository HEAD already carries content equivalent to
    /// this change, making the write (or delete) a no-op upstream.
    async fn reflected_at_head(&self, change: &RepoChange) -> Result<bool> {
        let head_diff = self.store.read_file("HEAD", &change.path).await?;

        match &change.content {
            None => Ok(head_diff.is_none()),
            Some(content) => {
                let head_side = match head_diff {
                    Some(bytes) => Some(bytes),
                    None => {
                        let key = paths::path_to_key(&change.path)?;
                        let base_path = paths::key_to_path(&key, BASE_ROOT);
                        self.store.read_file("HEAD", &base_path).await?
                    }
                };
                let head_text = head_side.map(|b| String::from_utf8_lossy(&b).into_owned());
                Ok(self
                    .normalizer
                    .equivalent(Some(content), head_text.as_deref()))
            }
        }
    }
}
