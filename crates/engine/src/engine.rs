//! The snapshot / restore state machine.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use snapper_core::timestamp::mint_generation_name;
use snapper_core::{content_hash, ArchiveKey, Clock, Config, Error, Result, SystemClock};
use snapper_durability::backlink::BacklinkError;
use snapper_durability::generation::{latest_valid_generation, load_generation_archive};
use snapper_durability::{Archive, ArchiveError, Backlink, ARCHIVE_FILE, EXT_DIR, SNAPSHOT_DIR};
use tracing::{debug, error, info, warn};

/// Engine states.
///
/// Every operation names the one state it may run in; the tables in the
/// module docs show the transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No session in progress
    Dormant,
    /// A snapshot session is open (`init_snapshot` .. `commit_snapshot`)
    Creation,
    /// A generation is open for reads (`open_generation` .. `close_generation`)
    Restoration,
    /// A purge is executing
    Purge,
}

/// What `init_snapshot` found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// The latest valid generation's archive was loaded as the baseline
    PriorLoaded,
    /// No valid prior generation exists; the session starts from an empty
    /// archive. Not an error.
    NoPriorGen,
}

/// Mutable state of one snapshot session.
pub(crate) struct CreationSession {
    /// Name of the generation directory being built
    pub(crate) gen_name: String,
    /// Filesystem path of the current insertion directory
    snapshot_dir: PathBuf,
    /// Root-relative value of the current insertion directory
    snapshot_rel: String,
    /// Backlink files written into the current insertion directory
    file_count: u64,
    /// Entries added this session, for rollback on abort
    added: Vec<(ArchiveKey, Backlink)>,
}

/// The snapshot engine.
///
/// Owns the engine root directory exclusively. All operations are methods;
/// there are no globals. Fatal errors ([`Error::is_fatal`]) leave the
/// engine in an unspecified state — the host terminates and restarts, and
/// the next `init_snapshot` reclaims partial on-disk state.
pub struct Snapper {
    pub(crate) root: PathBuf,
    pub(crate) config: Config,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) state: State,
    pub(crate) archive: Archive,
    pub(crate) session: Option<CreationSession>,
    open_gen: Option<String>,
}

impl Snapper {
    /// Create an engine over `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>, config: Config) -> Result<Self> {
        config.validate()?;
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(Error::InitFailed)?;
        info!(root = %root.display(), "snapper engine ready");
        Ok(Snapper {
            root,
            config,
            clock: Box::new(SystemClock),
            state: State::Dormant,
            archive: Archive::new(),
            session: None,
            open_gen: None,
        })
    }

    /// Replace the wall-clock source (tests).
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The engine root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The engine configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The current state of the engine.
    pub fn state(&self) -> State {
        self.state
    }

    pub(crate) fn ensure_state(&self, expected: State) -> Result<()> {
        if self.state != expected {
            warn!(state = ?self.state, ?expected, "operation called in wrong state");
            return Err(Error::InvalidState);
        }
        Ok(())
    }

    /// Begin a snapshot session.
    ///
    /// Sweeps dead generations left by earlier runs, mints a fresh
    /// generation directory, and loads the latest valid generation's
    /// archive as the deduplication baseline.
    pub fn init_snapshot(&mut self) -> Result<InitOutcome> {
        self.ensure_state(State::Dormant)?;

        self.sweep_dead_generations().map_err(Error::InitFailed)?;

        let gen_name = loop {
            let name = mint_generation_name(self.clock.now());
            if !self.root.join(&name).exists() {
                break name;
            }
            warn!(generation = %name, "generation name collision; retrying");
            thread::sleep(Duration::from_secs(1));
        };

        let snapshot_dir = self.root.join(&gen_name).join(SNAPSHOT_DIR);
        fs::create_dir_all(&snapshot_dir).map_err(Error::InitFailed)?;

        let outcome = match self.load_gen(None) {
            Ok(baseline) => {
                debug!(baseline = %baseline, "deduplication baseline loaded");
                InitOutcome::PriorLoaded
            }
            Err(Error::NoPriorGen) => {
                self.archive = Archive::new();
                InitOutcome::NoPriorGen
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Err(Error::InitFailed(io::Error::other(e))),
        };

        info!(generation = %gen_name, ?outcome, "snapshot session started");
        self.session = Some(CreationSession {
            snapshot_rel: format!("/{gen_name}/{SNAPSHOT_DIR}"),
            gen_name,
            snapshot_dir,
            file_count: 0,
            added: Vec::new(),
        });
        self.state = State::Creation;
        Ok(outcome)
    }

    /// Persist one keyed payload into the open session.
    ///
    /// If the key's authoritative backlink already holds this payload and
    /// its reference count is below the redundancy bound, the existing file
    /// is shared: the carried archive entry becomes the new generation's
    /// reference and commit raises the count. At the bound, a redundant
    /// copy is created instead. An invalid or unreadable head evicts the
    /// key's whole chain and starts a fresh one.
    pub fn take_snapshot(&mut self, payload: &[u8], key: ArchiveKey) -> Result<()> {
        self.ensure_state(State::Creation)?;
        if payload.is_empty() {
            warn!(key, "refusing to snapshot an empty payload");
            return Err(Error::NoData);
        }

        let hash = content_hash(payload);

        enum Take {
            Share,
            Evict,
            Create,
        }

        let action = match self.archive.newest(key) {
            None => Take::Create,
            Some(head) if !head.is_valid(&self.root, hash) => {
                if self.config.verbose {
                    debug!(key, backlink = %head.value(), "head does not match payload; evicting chain");
                }
                Take::Evict
            }
            Some(head) => match head.read_refcount(&self.root) {
                Ok(rc) if rc < self.config.redundancy => {
                    if self.config.verbose {
                        debug!(key, backlink = %head.value(), refcount = rc, "sharing existing backlink");
                    }
                    Take::Share
                }
                Ok(rc) => {
                    if self.config.verbose {
                        debug!(
                            key,
                            refcount = rc,
                            redundancy = self.config.redundancy,
                            "redundancy bound reached; creating redundant backlink"
                        );
                    }
                    Take::Create
                }
                Err(e) => {
                    warn!(key, backlink = %head.value(), error = %e, "unreadable head backlink; evicting chain");
                    Take::Evict
                }
            },
        };

        match action {
            // the entry carried in the archive is the new generation's
            // reference; the on-disk count rises at commit
            Take::Share => Ok(()),
            Take::Evict => {
                self.archive.evict(key);
                self.create_backlink(payload, hash, key)
            }
            Take::Create => self.create_backlink(payload, hash, key),
        }
    }

    fn create_backlink(&mut self, payload: &[u8], hash: u32, key: ArchiveKey) -> Result<()> {
        let (value, ext_dir, descend) = {
            let session = self.session.as_ref().ok_or(Error::InvalidState)?;
            let value = format!("{}/{:x}", session.snapshot_rel, session.file_count);
            // opening one more file would push this directory past the
            // fan-out bound, counting the ext/ entry itself
            let descend = session.file_count + 2 >= self.config.threshold;
            (value, session.snapshot_dir.join(EXT_DIR), descend)
        };

        let backlink = match Backlink::new(value) {
            Ok(backlink) => backlink,
            Err(e) => return Err(self.fail_creation(format!("backlink path: {e}"))),
        };
        if let Err(e) = backlink.create(&self.root, hash, payload) {
            return Err(self.fail_creation(format!("{}: {e}", backlink.value())));
        }
        if descend {
            if let Err(e) = fs::create_dir(&ext_dir) {
                return Err(self.fail_creation(format!("{}: {e}", ext_dir.display())));
            }
        }
        if self.config.verbose {
            debug!(key, backlink = %backlink.value(), size = payload.len(), "backlink created");
        }

        let session = self.session.as_mut().ok_or(Error::InvalidState)?;
        session.file_count += 1;
        session.added.push((key, backlink.clone()));
        if descend {
            session.snapshot_dir = ext_dir;
            session.snapshot_rel = format!("{}/{EXT_DIR}", session.snapshot_rel);
            session.file_count = 0;
        }
        self.archive.insert(key, backlink);
        Ok(())
    }

    /// Abort the session and produce the fatal error to surface.
    fn fail_creation(&mut self, detail: String) -> Error {
        error!(detail = %detail, "snapshot creation failed; aborting session");
        self.abort_snapshot();
        Error::SnapshotNotPossible(detail)
    }

    /// Seal the open session into a generation.
    ///
    /// Writes the archive file first, then raises every referenced
    /// backlink's reference count by one; a crash between the two steps
    /// leaves counts behind the archive, which the zombie sweep tolerates.
    /// Finishes by enforcing the retention policy.
    pub fn commit_snapshot(&mut self) -> Result<()> {
        self.ensure_state(State::Creation)?;

        if self.archive.is_empty() {
            warn!("nothing to commit; aborting snapshot");
            self.abort_snapshot();
            return Err(Error::InvalidState);
        }

        let gen_name = match &self.session {
            Some(session) => session.gen_name.clone(),
            None => return Err(Error::InvalidState),
        };
        if let Err(e) = self.archive.commit(&self.root.join(&gen_name), ARCHIVE_FILE) {
            error!(generation = %gen_name, error = %e, "failed to write the archive file");
            self.abort_snapshot();
            return Err(Error::SnapshotNotPossible(format!("archive write: {e}")));
        }

        self.update_references()?;

        info!(
            generation = %gen_name,
            entries = self.archive.total_backlinks(),
            "snapshot committed"
        );
        self.session = None;
        self.state = State::Dormant;
        self.enforce_retention()
    }

    /// Raise the on-disk reference count of every archive entry by one.
    fn update_references(&mut self) -> Result<()> {
        let mut dropped: Vec<(ArchiveKey, Backlink)> = Vec::new();

        for (key, backlink) in self.archive.backlinks() {
            let rc = match backlink.read_refcount(&self.root) {
                Ok(rc) => rc,
                Err(e) => {
                    if self.config.integrity {
                        return Err(Error::InvalidSnapshotFile(format!(
                            "{}: {e}",
                            backlink.value()
                        )));
                    }
                    warn!(key, backlink = %backlink.value(), error = %e, "unreadable backlink; dropping entry");
                    dropped.push((key, backlink.clone()));
                    continue;
                }
            };
            let Some(next) = rc.checked_add(1) else {
                if self.config.integrity {
                    return Err(Error::RefCountFailed(format!(
                        "{}: reference count at capacity",
                        backlink.value()
                    )));
                }
                warn!(key, backlink = %backlink.value(), "reference count at capacity; dropping entry");
                dropped.push((key, backlink.clone()));
                continue;
            };
            if let Err(e) = backlink.write_refcount(&self.root, next) {
                if self.config.integrity {
                    return Err(match e {
                        BacklinkError::InvalidVersion | BacklinkError::InvalidIntegrity => {
                            Error::InvalidSnapshotFile(format!("{}: {e}", backlink.value()))
                        }
                        _ => Error::RefCountFailed(format!("{}: {e}", backlink.value())),
                    });
                }
                warn!(key, backlink = %backlink.value(), error = %e, "could not update reference count; dropping entry");
                dropped.push((key, backlink.clone()));
            }
        }

        for (key, backlink) in dropped {
            self.archive.remove_backlink(key, &backlink);
        }
        Ok(())
    }

    /// Discard the open session: unlink the generation directory and roll
    /// the in-memory archive back to the loaded baseline.
    pub(crate) fn abort_snapshot(&mut self) {
        if let Some(session) = self.session.take() {
            for (key, backlink) in &session.added {
                self.archive.remove_backlink(*key, backlink);
            }
            let gen_dir = self.root.join(&session.gen_name);
            if let Err(e) = fs::remove_dir_all(&gen_dir) {
                if e.kind() != io::ErrorKind::NotFound {
                    error!(generation = %session.gen_name, error = %e, "could not remove aborted generation");
                }
            }
            info!(generation = %session.gen_name, "snapshot aborted");
        }
        self.state = State::Dormant;
    }

    /// Open a generation for restoration.
    ///
    /// With no name, the latest valid generation is opened.
    pub fn open_generation(&mut self, name: Option<&str>) -> Result<()> {
        self.ensure_state(State::Dormant)?;
        let resolved = self.load_gen(name)?;
        info!(generation = %resolved, "generation opened for restoration");
        self.open_gen = Some(resolved);
        self.state = State::Restoration;
        Ok(())
    }

    /// Copy the payload recorded for `key` into `buf`.
    ///
    /// The buffer is zero-filled first; on success it holds the payload
    /// followed by zeroes, on failure it is all zeroes. The key's chain is
    /// tried newest first and any surviving backlink satisfies the call —
    /// redundancy is durability, not replay.
    pub fn restore(&mut self, buf: &mut [u8], key: ArchiveKey) -> Result<usize> {
        self.ensure_state(State::Restoration)?;
        buf.fill(0);

        let Some(queue) = self.archive.queue(key) else {
            warn!(key, "no backlink matches the key");
            return Err(Error::NoMatches);
        };

        let mut head_failure = None;
        for backlink in queue.iter().rev() {
            match backlink.read_payload(&self.root, buf) {
                Ok(size) => {
                    if self.config.verbose {
                        debug!(key, backlink = %backlink.value(), size, "payload restored");
                    }
                    return Ok(size);
                }
                Err(e) => {
                    warn!(key, backlink = %backlink.value(), error = %e, "backlink unusable during restore");
                    if head_failure.is_none() {
                        head_failure = Some(self.restore_error(&e, backlink));
                    }
                    buf.fill(0);
                }
            }
        }
        // the queue is never empty, so a failure was recorded
        Err(head_failure.unwrap_or(Error::NoMatches))
    }

    fn restore_error(&self, e: &BacklinkError, backlink: &Backlink) -> Error {
        match e {
            BacklinkError::InvalidVersion => Error::InvalidVersion,
            BacklinkError::InvalidIntegrity if self.config.integrity => {
                Error::InvalidSnapshotFile(format!("{}: {e}", backlink.value()))
            }
            BacklinkError::InvalidIntegrity => Error::IntegrityFailed,
            BacklinkError::InsufficientSize => Error::RestoreFailed,
            _ => Error::IntegrityFailed,
        }
    }

    /// End the restoration.
    ///
    /// The in-memory archive is kept — it seeds the next snapshot session's
    /// deduplication baseline. Finishes by enforcing the retention policy.
    pub fn close_generation(&mut self) -> Result<()> {
        self.ensure_state(State::Restoration)?;
        if let Some(generation) = self.open_gen.take() {
            info!(generation = %generation, "generation closed");
        }
        self.state = State::Dormant;
        self.enforce_retention()
    }

    /// Load a generation's archive into the in-memory view.
    pub(crate) fn load_gen(&mut self, name: Option<&str>) -> Result<String> {
        let target = match name {
            Some(requested) => {
                if !self.root.join(requested).is_dir() {
                    warn!(generation = %requested, "no such generation");
                    return Err(Error::LoadGenFailed);
                }
                requested.to_string()
            }
            None => latest_valid_generation(&self.root)
                .map_err(|e| {
                    error!(error = %e, "could not scan for generations");
                    Error::LoadGenFailed
                })?
                .ok_or(Error::NoPriorGen)?,
        };

        match load_generation_archive(&self.root, &target) {
            Ok(archive) => {
                debug!(generation = %target, entries = archive.total_backlinks(), "archive loaded");
                self.archive = archive;
                Ok(target)
            }
            Err(e) => {
                error!(generation = %target, error = %e, "could not load archive");
                if self.config.integrity {
                    return Err(match e {
                        ArchiveError::InvalidEntry(_) => {
                            Error::InvalidArchiveEntry(format!("{target}: {e}"))
                        }
                        _ => Error::InvalidArchiveFile(format!("{target}: {e}")),
                    });
                }
                Err(match e {
                    ArchiveError::VersionMismatch(_) => Error::InvalidVersion,
                    ArchiveError::HashMismatch => Error::IntegrityFailed,
                    _ => Error::LoadGenFailed,
                })
            }
        }
    }
}
