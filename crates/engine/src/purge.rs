//! Purging: reference release, retention enforcement, zombie reclamation.
//!
//! A purge releases one generation: every backlink its archive references
//! has its count decremented, files reaching zero are unlinked with their
//! emptied parent directories, and finally the archive file and the
//! generation directory itself go. Retention enforcement repeats that for
//! the oldest generations while the quota or the age bound is exceeded.
//!
//! The zombie sweep handles generations *without* a valid archive: their
//! files are deleted unless some valid generation still references them —
//! deduplicated backlinks may physically live in another generation's
//! directory, so reachability, not ownership, decides.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path};

use snapper_core::timestamp::{age_seconds, parse_generation_name};
use snapper_core::{ArchiveKey, Error, Result};
use snapper_durability::generation::{
    archive_path, delete_upwards, list_generations, load_generation_archive, prune_empty_dirs,
    valid_generations, walk_files,
};
use snapper_durability::{Backlink, SNAPSHOT_DIR};
use tracing::{debug, error, info, warn};

use crate::engine::{Snapper, State};

impl Snapper {
    /// Release one generation.
    ///
    /// Targets the named generation, or the oldest valid one; with no
    /// candidate at all this is a no-op. Denied when it would leave fewer
    /// than `min_snapshots` valid generations.
    pub fn purge(&mut self, name: Option<&str>) -> Result<()> {
        self.ensure_state(State::Dormant)?;
        self.state = State::Purge;
        let result = self.purge_op(name);
        self.state = State::Dormant;
        result
    }

    fn purge_op(&mut self, name: Option<&str>) -> Result<()> {
        let valid = valid_generations(&self.root).map_err(|e| {
            error!(target: "snapper::purge", error = %e, "could not scan for generations");
            Error::LoadGenFailed
        })?;

        let target = match name {
            Some(requested) => {
                if !valid.iter().any(|g| g == requested) {
                    warn!(target: "snapper::purge", generation = %requested, "not a valid generation");
                    return Err(Error::LoadGenFailed);
                }
                requested.to_string()
            }
            None => match valid.first() {
                Some(oldest) => oldest.clone(),
                None => {
                    debug!(target: "snapper::purge", "no generation to purge");
                    return Ok(());
                }
            },
        };

        if (valid.len() as u64).saturating_sub(1) < self.config.min_snapshots {
            warn!(
                target: "snapper::purge",
                generation = %target,
                valid = valid.len(),
                min = self.config.min_snapshots,
                "purge denied"
            );
            return Err(Error::PurgeDenied);
        }

        self.purge_generation(&target)
    }

    /// Enforce quota and age policies.
    pub fn purge_expired(&mut self) -> Result<()> {
        self.ensure_state(State::Dormant)?;
        self.state = State::Purge;
        let result = self.enforce_retention();
        self.state = State::Dormant;
        result
    }

    /// Reclaim generations without a valid archive.
    pub fn purge_zombies(&mut self) -> Result<()> {
        self.ensure_state(State::Dormant)?;
        self.state = State::Purge;
        let result = self
            .sweep_dead_generations()
            .map_err(|e| Error::PurgeFailed(format!("zombie sweep: {e}")));
        self.state = State::Dormant;
        result
    }

    /// Purge generations while the quota is exceeded, then generations
    /// past the age bound. The `min_snapshots` floor silently stops both.
    ///
    /// Runs after every commit and close; failures here are fatal.
    pub(crate) fn enforce_retention(&mut self) -> Result<()> {
        let fatalize = |e: Error| {
            if e.is_fatal() {
                e
            } else {
                Error::PurgeFailed(e.to_string())
            }
        };

        if self.config.max_snapshots > 0 {
            loop {
                let valid = valid_generations(&self.root)
                    .map_err(|e| Error::PurgeFailed(format!("scan: {e}")))?;
                let count = valid.len() as u64;
                if count <= self.config.max_snapshots || count <= self.config.min_snapshots {
                    break;
                }
                info!(
                    target: "snapper::purge",
                    generation = %valid[0],
                    count,
                    quota = self.config.max_snapshots,
                    "quota exceeded; purging oldest generation"
                );
                let oldest = valid[0].clone();
                self.purge_generation(&oldest).map_err(fatalize)?;
            }
        }

        if self.config.expiration > 0 {
            let now = self.clock.now();
            let valid = valid_generations(&self.root)
                .map_err(|e| Error::PurgeFailed(format!("scan: {e}")))?;
            let mut remaining = valid.len() as u64;
            for name in valid {
                if remaining <= self.config.min_snapshots {
                    break;
                }
                let Some(minted) = parse_generation_name(&name) else {
                    continue;
                };
                let age = age_seconds(minted, now);
                if age > self.config.expiration {
                    info!(
                        target: "snapper::purge",
                        generation = %name,
                        age,
                        expiration = self.config.expiration,
                        "generation expired"
                    );
                    self.purge_generation(&name).map_err(fatalize)?;
                    remaining -= 1;
                }
            }
        }

        Ok(())
    }

    /// Release every reference held by `name`'s archive, then remove the
    /// archive and — once nothing else lives there — the generation
    /// directory.
    pub(crate) fn purge_generation(&mut self, name: &str) -> Result<()> {
        let archive = match load_generation_archive(&self.root, name) {
            Ok(archive) => archive,
            Err(e) => {
                error!(target: "snapper::purge", generation = %name, error = %e, "could not load archive for purge");
                if self.config.integrity {
                    return Err(match e {
                        snapper_durability::ArchiveError::InvalidEntry(_) => {
                            Error::InvalidArchiveEntry(format!("{name}: {e}"))
                        }
                        _ => Error::InvalidArchiveFile(format!("{name}: {e}")),
                    });
                }
                return Err(Error::LoadGenFailed);
            }
        };

        for (key, backlink) in archive.backlinks() {
            self.release_backlink(key, backlink)?;
        }

        // shared backlinks may keep this generation's directory alive;
        // drop only what is now empty
        prune_empty_dirs(&self.root.join(name).join(SNAPSHOT_DIR))
            .map_err(|e| Error::PurgeFailed(format!("{name}: {e}")))?;
        delete_upwards(&self.root, &archive_path(&self.root, name))
            .map_err(|e| Error::PurgeFailed(format!("{name}: {e}")))?;

        info!(target: "snapper::purge", generation = %name, "generation purged");
        Ok(())
    }

    /// Drop one reference to `backlink`; unlink it when the count reaches
    /// zero.
    fn release_backlink(&self, key: ArchiveKey, backlink: &Backlink) -> Result<()> {
        match backlink.read_refcount(&self.root) {
            Ok(rc) if rc > 1 => {
                if let Err(e) = backlink.write_refcount(&self.root, rc - 1) {
                    if self.config.integrity {
                        return Err(Error::RefCountFailed(format!(
                            "{}: {e}",
                            backlink.value()
                        )));
                    }
                    // other generations may still reference the file;
                    // leaving it in place only leaks, unlinking would dangle
                    warn!(
                        target: "snapper::purge",
                        key,
                        backlink = %backlink.value(),
                        error = %e,
                        "could not decrement reference count; leaving file in place"
                    );
                }
                Ok(())
            }
            Ok(_) => self.unlink_backlink(backlink),
            Err(e) => {
                if self.config.integrity {
                    return Err(Error::RefCountFailed(format!("{}: {e}", backlink.value())));
                }
                warn!(
                    target: "snapper::purge",
                    key,
                    backlink = %backlink.value(),
                    error = %e,
                    "unreadable backlink; unlinking"
                );
                self.unlink_backlink(backlink)
            }
        }
    }

    fn unlink_backlink(&self, backlink: &Backlink) -> Result<()> {
        delete_upwards(&self.root, &backlink.fs_path(&self.root)).map_err(|e| {
            error!(target: "snapper::purge", backlink = %backlink.value(), error = %e, "could not unlink backlink");
            Error::PurgeFailed(format!("{}: {e}", backlink.value()))
        })
    }

    /// Delete dead generations by reachability.
    ///
    /// Runs at every `init_snapshot`, so an aborted creation never becomes
    /// visible as a restorable generation.
    pub(crate) fn sweep_dead_generations(&self) -> io::Result<()> {
        let mut referenced: HashSet<String> = HashSet::new();
        let mut valid: HashSet<String> = HashSet::new();
        let all = list_generations(&self.root)?;

        for name in &all {
            if let Ok(archive) = load_generation_archive(&self.root, name) {
                referenced.extend(archive.backlinks().map(|(_, b)| b.value().to_string()));
                valid.insert(name.clone());
            }
        }

        for name in &all {
            if valid.contains(name) {
                continue;
            }
            debug!(generation = %name, "sweeping dead generation");
            let dir = self.root.join(name);
            for file in walk_files(&dir)? {
                if self.is_referenced(&file, &referenced) {
                    continue;
                }
                fs::remove_file(&file)?;
            }
            if prune_empty_dirs(&dir)? {
                info!(generation = %name, "dead generation removed");
            } else {
                info!(generation = %name, "dead generation retains files referenced by valid archives");
            }
        }
        Ok(())
    }

    fn is_referenced(&self, file: &Path, referenced: &HashSet<String>) -> bool {
        let Ok(rel) = file.strip_prefix(&self.root) else {
            return false;
        };
        let mut value = String::new();
        for component in rel.components() {
            let Component::Normal(part) = component else {
                return false;
            };
            let Some(part) = part.to_str() else {
                return false;
            };
            value.push('/');
            value.push_str(part);
        }
        referenced.contains(&value)
    }
}
