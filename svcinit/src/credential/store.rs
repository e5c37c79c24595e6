//! Credential persistence on the data volume.
//!
//! ```text
//! stage()   ──→ <credential>.pending   (create-exclusive, before any network call)
//! commit()  ──→ <credential>           (exclusive hard link, after the service accepted it)
//! ```
//!
//! A secret that reached the managed service is therefore always on disk,
//! and the canonical file is only ever created once. A pending file left by
//! a crash is reused instead of generating a second secret.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use svcinit_shared::constants::paths;
use svcinit_shared::errors::{InitError, InitResult};

use super::{Credential, Secret};

/// Where a staged credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOrigin {
    /// Already in the canonical credential file.
    Persisted,
    /// Left in the pending file by an interrupted run.
    Pending,
    /// Freshly generated by this run.
    Generated,
}

/// A credential ready to be sent to the managed service.
#[derive(Debug, Clone)]
pub struct StagedCredential {
    credential: Credential,
    origin: CredentialOrigin,
}

impl StagedCredential {
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn origin(&self) -> CredentialOrigin {
        self.origin
    }
}

/// Owns the credential file and its staging sibling.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    pending_path: PathBuf,
    username: String,
    secret_length: usize,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, username: impl Into<String>, secret_length: usize) -> Self {
        let path = path.into();
        let mut pending = path.clone().into_os_string();
        pending.push(paths::PENDING_SUFFIX);

        Self {
            path,
            pending_path: PathBuf::from(pending),
            username: username.into(),
            secret_length,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pending_path(&self) -> &Path {
        &self.pending_path
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Directory holding the credential (and the volume lock).
    pub fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the persisted credential, if any.
    pub fn load(&self) -> InitResult<Option<Credential>> {
        Ok(read_secret(&self.path)?.map(|secret| self.credential(secret)))
    }

    /// Return the persisted credential, creating it on first call.
    ///
    /// The file is created with mode `0600` and create-exclusive semantics.
    /// If another writer wins the race, its secret is returned.
    pub fn ensure_credential(&self) -> InitResult<Credential> {
        if let Some(credential) = self.load()? {
            tracing::debug!(path = %self.path.display(), "Credential exists, reusing it");
            return Ok(credential);
        }

        let secret = Secret::generate(self.secret_length);
        match write_exclusive(&self.path, &secret) {
            Ok(()) => {
                tracing::info!(
                    path = %self.path.display(),
                    username = %self.username,
                    "Created credential"
                );
                Ok(self.credential(secret))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => self.adopt_existing(),
            Err(e) => Err(InitError::persist(&self.path, e)),
        }
    }

    /// Pick the secret to offer the managed service and make sure it is on disk.
    ///
    /// Order of preference: the canonical file, a pending file from an
    /// interrupted run, a new secret written to the pending file.
    pub fn stage(&self) -> InitResult<StagedCredential> {
        if let Some(secret) = read_secret(&self.path)? {
            return Ok(self.staged(secret, CredentialOrigin::Persisted));
        }

        if let Some(secret) = read_secret(&self.pending_path)? {
            tracing::info!(
                path = %self.pending_path.display(),
                "Reusing staged secret from an interrupted bootstrap"
            );
            return Ok(self.staged(secret, CredentialOrigin::Pending));
        }

        let secret = Secret::generate(self.secret_length);
        match write_exclusive(&self.pending_path, &secret) {
            Ok(()) => {
                tracing::debug!(path = %self.pending_path.display(), "Staged new secret");
                Ok(self.staged(secret, CredentialOrigin::Generated))
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let secret = read_secret(&self.pending_path)?.ok_or_else(|| {
                    InitError::credential(&self.pending_path, "vanished after a concurrent write")
                })?;
                Ok(self.staged(secret, CredentialOrigin::Pending))
            }
            Err(e) => Err(InitError::persist(&self.pending_path, e)),
        }
    }

    /// Publish a staged credential to the canonical path.
    ///
    /// First writer wins: if the canonical file already exists its secret is
    /// returned and the staged one is discarded.
    pub fn commit(&self, staged: StagedCredential) -> InitResult<Credential> {
        match staged.origin {
            CredentialOrigin::Persisted => Ok(staged.credential),
            CredentialOrigin::Pending | CredentialOrigin::Generated => {
                self.promote(staged.credential)
            }
        }
    }

    /// Drop a staged secret the managed service refused.
    ///
    /// Only the pending file is removed; a persisted credential is never touched.
    pub fn reject(&self, staged: &StagedCredential) {
        if staged.origin == CredentialOrigin::Persisted {
            return;
        }
        tracing::info!(
            path = %self.pending_path.display(),
            "Discarding staged secret rejected by the managed service"
        );
        self.discard_pending();
    }

    /// Promote a pending file left by a crash between admin creation and persistence.
    ///
    /// Returns the promoted credential, or `None` when there was nothing to do.
    pub fn recover_pending(&self) -> InitResult<Option<Credential>> {
        if !self.pending_path.exists() {
            return Ok(None);
        }

        if self.path.exists() {
            self.discard_pending();
            return Ok(None);
        }

        match read_secret(&self.pending_path)? {
            Some(secret) => {
                tracing::info!(
                    path = %self.pending_path.display(),
                    "Promoting staged secret left by an interrupted bootstrap"
                );
                self.promote(self.credential(secret)).map(Some)
            }
            None => Ok(None),
        }
    }

    fn promote(&self, credential: Credential) -> InitResult<Credential> {
        match fs::hard_link(&self.pending_path, &self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                self.discard_pending();
                let winner = self.adopt_existing()?;
                if winner.secret != credential.secret {
                    tracing::warn!(
                        path = %self.path.display(),
                        "Credential was persisted by another writer, adopting it"
                    );
                }
                return Ok(winner);
            }
            // Filesystems without hard links: fall back to an exclusive write
            Err(link_err) => {
                tracing::debug!(error = %link_err, "hard link failed, writing credential directly");
                match write_exclusive(&self.path, &credential.secret) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                        self.discard_pending();
                        return self.adopt_existing();
                    }
                    Err(e) => return Err(InitError::persist(&self.path, e)),
                }
            }
        }

        self.discard_pending();
        sync_dir(self.dir());

        tracing::info!(
            path = %self.path.display(),
            username = %self.username,
            "Persisted credential"
        );
        Ok(credential)
    }

    fn adopt_existing(&self) -> InitResult<Credential> {
        self.load()?.ok_or_else(|| {
            InitError::credential(&self.path, "vanished after a concurrent write")
        })
    }

    fn discard_pending(&self) {
        if let Err(e) = fs::remove_file(&self.pending_path)
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!(
                path = %self.pending_path.display(),
                "Failed to remove pending credential: {}", e
            );
        }
    }

    fn credential(&self, secret: Secret) -> Credential {
        Credential::new(self.username.clone(), secret)
    }

    fn staged(&self, secret: Secret, origin: CredentialOrigin) -> StagedCredential {
        StagedCredential {
            credential: self.credential(secret),
            origin,
        }
    }
}

/// Read a secret file. Missing file is `None`; an empty file is an error.
fn read_secret(path: &Path) -> InitResult<Option<Secret>> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let secret = content.trim_end_matches(['\r', '\n']);
            if secret.is_empty() {
                return Err(InitError::credential(path, "file is empty"));
            }
            Ok(Some(Secret::new(secret)))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(InitError::credential(path, e.to_string())),
    }
}

/// Create `path` exclusively with owner-only permissions and fsync it.
fn write_exclusive(path: &Path, secret: &Secret) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    if let Err(e) = file
        .write_all(secret.expose().as_bytes())
        .and_then(|_| file.sync_all())
    {
        drop(file);
        let _ = fs::remove_file(path);
        return Err(e);
    }

    if let Some(parent) = path.parent() {
        sync_dir(parent);
    }
    Ok(())
}

/// Best-effort fsync of a directory so a new entry survives power loss.
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}
