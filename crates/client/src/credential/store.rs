// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable session storage.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::credential::{Session, User};

/// Holder of the current session.
///
/// Writes are all-or-nothing: a `read` never observes a partially written
/// session. Each read-modify-write (`write_user`, `update_credentials`) is
/// atomic with respect to the others.
pub trait TokenStore: Send + Sync {
    /// Fetch the stored session. `Ok(None)` means there is none; an error
    /// means the store could not be read and the session may still exist.
    fn load(&self) -> anyhow::Result<Option<Session>>;

    fn write(&self, session: &Session) -> anyhow::Result<()>;

    fn clear(&self) -> anyhow::Result<()>;

    /// Replace the user record, keeping both credentials.
    fn write_user(&self, user: &User) -> anyhow::Result<()>;

    /// Install refreshed credentials into the stored session. A missing
    /// `refresh_token` keeps the current one; a missing `user` keeps the
    /// stored record. Returns `None` when no session is stored.
    fn update_credentials(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        user: Option<&User>,
    ) -> anyhow::Result<Option<Session>>;

    /// Like [`load`](Self::load), treating an unreadable store as empty.
    fn read(&self) -> Option<Session> {
        self.load().unwrap_or_else(|e| {
            tracing::warn!(err = %e, "session store unreadable");
            None
        })
    }

    fn access_token(&self) -> Option<String> {
        self.read().map(|s| s.access_token)
    }

    fn refresh_token(&self) -> Option<String> {
        self.read().map(|s| s.refresh_token)
    }

    fn user(&self) -> Option<User> {
        self.read().map(|s| s.user)
    }
}

fn merge_credentials(
    session: &mut Session,
    access_token: &str,
    refresh_token: Option<&str>,
    user: Option<&User>,
) {
    session.access_token = access_token.to_owned();
    if let Some(refresh_token) = refresh_token {
        session.refresh_token = refresh_token.to_owned();
    }
    if let Some(user) = user {
        session.user = user.clone();
    }
}

/// Session persisted as JSON at `<state_dir>/session.json`.
pub struct FileTokenStore {
    path: PathBuf,
    /// Serializes read-modify-write sequences within this process.
    write_lock: Mutex<()>,
}

impl FileTokenStore {
    pub const FILE_NAME: &'static str = "session.json";

    pub fn new(state_dir: &Path) -> Self {
        Self { path: state_dir.join(Self::FILE_NAME), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> anyhow::Result<Option<Session>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&contents) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), err = %e, "discarding corrupt session file");
                Ok(None)
            }
        }
    }

    fn write(&self, session: &Session) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        save(&self.path, session)
    }

    fn clear(&self) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_user(&self, user: &User) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        let mut session = self.load()?.ok_or_else(|| anyhow::anyhow!("no session to update"))?;
        session.user = user.clone();
        save(&self.path, &session)
    }

    fn update_credentials(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        user: Option<&User>,
    ) -> anyhow::Result<Option<Session>> {
        let _guard = self.write_lock.lock();
        let Some(mut session) = self.load()? else {
            return Ok(None);
        };
        merge_credentials(&mut session, access_token, refresh_token, user);
        save(&self.path, &session)?;
        Ok(Some(session))
    }
}

/// Save a session atomically (write tmp + rename).
///
/// Uses a unique temp filename (PID + counter) so concurrent saves never
/// share a `.tmp` file.
fn save(path: &Path, session: &Session) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(session)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// In-memory session, for embedders without disk state and for tests.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    session: Mutex<Option<Session>>,
}

impl MemoryTokenStore {
    pub fn with_session(session: Session) -> Self {
        Self { session: Mutex::new(Some(session)) }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> anyhow::Result<Option<Session>> {
        Ok(self.session.lock().clone())
    }

    fn write(&self, session: &Session) -> anyhow::Result<()> {
        *self.session.lock() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        *self.session.lock() = None;
        Ok(())
    }

    fn write_user(&self, user: &User) -> anyhow::Result<()> {
        let mut guard = self.session.lock();
        let session = guard.as_mut().ok_or_else(|| anyhow::anyhow!("no session to update"))?;
        session.user = user.clone();
        Ok(())
    }

    fn update_credentials(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        user: Option<&User>,
    ) -> anyhow::Result<Option<Session>> {
        let mut guard = self.session.lock();
        let Some(session) = guard.as_mut() else {
            return Ok(None);
        };
        merge_credentials(session, access_token, refresh_token, user);
        Ok(Some(session.clone()))
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
