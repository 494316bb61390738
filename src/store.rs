//! Fixture store: session directory layout and atomic persistence

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::{ReplayError, Result};

/// Directory created next to the hint file to hold all sessions
pub const FIXTURES_DIR: &str = "__fixtures__";

/// Suffix of in-flight temporary files (never read as fixtures)
const TMP_SUFFIX: &str = "tmp";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq, Eq)]
struct SessionDir {
    name: String,
    path: PathBuf,
}

/// Owns the session directory and the fixture files inside it
#[derive(Debug, Clone, Default)]
pub struct FixtureStore {
    session: Option<SessionDir>,
}

impl FixtureStore {
    /// Create an unconfigured store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already configured for a session
    ///
    /// # Errors
    ///
    /// Returns error if the session name is invalid
    pub fn for_session(directory_hint: &Path, session_name: &str) -> Result<Self> {
        let mut store = Self::new();
        store.configure(directory_hint, session_name)?;
        Ok(store)
    }

    /// Point the store at `<parent-of-hint>/__fixtures__/<session>/`
    ///
    /// Call-syntax artifacts (`()`) are stripped from the session name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSessionName` if the cleaned name is unusable as a directory
    pub fn configure(&mut self, directory_hint: &Path, session_name: &str) -> Result<()> {
        let name = clean_session_name(session_name);
        validate_session_name(&name)?;

        let path = directory_hint
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
            .join(FIXTURES_DIR)
            .join(&name);

        debug!("Fixture directory set to {}", path.display());
        self.session = Some(SessionDir { name, path });
        Ok(())
    }

    /// Forget the configured session without touching disk
    pub fn reset(&mut self) {
        self.session = None;
    }

    /// Whether a session is configured
    pub fn is_configured(&self) -> bool {
        self.session.is_some()
    }

    /// Cleaned session name, also used as the fingerprint caller context
    ///
    /// # Errors
    ///
    /// Returns `SessionNotConfigured` if no session is configured
    pub fn session_name(&self) -> Result<&str> {
        Ok(&self.session()?.name)
    }

    /// Session directory path
    ///
    /// # Errors
    ///
    /// Returns `SessionNotConfigured` if no session is configured
    pub fn session_dir(&self) -> Result<&Path> {
        Ok(&self.session()?.path)
    }

    /// Full path of a fixture file in the session directory
    ///
    /// # Errors
    ///
    /// Returns `SessionNotConfigured` if no session is configured
    pub fn fixture_path(&self, file_name: &str) -> Result<PathBuf> {
        Ok(self.session_dir()?.join(file_name))
    }

    /// Check whether a fixture file exists
    ///
    /// # Errors
    ///
    /// Returns error if no session is configured or the check itself fails
    pub async fn exists(&self, file_name: &str) -> Result<bool> {
        let path = self.fixture_path(file_name)?;
        Ok(fs::try_exists(&path).await?)
    }

    /// Read a fixture file
    ///
    /// # Errors
    ///
    /// Returns error if no session is configured or the file cannot be read
    pub async fn read(&self, file_name: &str) -> Result<Vec<u8>> {
        let path = self.fixture_path(file_name)?;
        Ok(fs::read(&path).await?)
    }

    /// Persist a fixture atomically, returning its final path
    ///
    /// Bytes go to a temporary sibling file that is synced and then renamed
    /// over the target, so readers never observe a partial fixture. The
    /// temporary file is removed on failure and when the returned future is
    /// dropped before the rename.
    ///
    /// # Errors
    ///
    /// Returns error if no session is configured or any write step fails
    pub async fn write(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        self.create_session_directory_if_needed().await?;

        let path = self.fixture_path(file_name)?;
        let tmp = TempFile::new(self.session_dir()?.join(format!(
            ".{file_name}.{}.{}.{TMP_SUFFIX}",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        )));

        write_synced(tmp.path(), bytes).await?;
        fs::rename(tmp.path(), &path).await?;
        tmp.persisted();

        debug!("Wrote fixture {} ({} bytes)", path.display(), bytes.len());
        Ok(path)
    }

    /// Create the session directory (and parents) if missing
    ///
    /// # Errors
    ///
    /// Returns `DirectoryCreateFailed` if creation fails
    pub async fn create_session_directory_if_needed(&self) -> Result<()> {
        let path = self.session_dir()?;
        if fs::try_exists(path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::create_dir_all(path)
            .await
            .map_err(|source| ReplayError::DirectoryCreateFailed {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Created fixture directory: {}", path.display());
        Ok(())
    }

    /// Remove the session directory and every fixture in it
    ///
    /// A missing directory is not an error.
    ///
    /// # Errors
    ///
    /// Returns `DirectoryRemoveFailed` if removal fails
    pub async fn remove_session_directory(&self) -> Result<()> {
        let path = self.session_dir()?;

        match fs::remove_dir_all(path).await {
            Ok(()) => {
                info!("Removed fixture directory: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No fixture directory at {}", path.display());
                Ok(())
            }
            Err(source) => Err(ReplayError::DirectoryRemoveFailed {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn session(&self) -> Result<&SessionDir> {
        self.session.as_ref().ok_or(ReplayError::SessionNotConfigured)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// Strip call-syntax artifacts from a caller-supplied session name
pub fn clean_session_name(name: &str) -> String {
    name.replace("()", "")
}

/// Longest single path component common filesystems accept
const MAX_SESSION_NAME_BYTES: usize = 255;

/// Check that a cleaned session name is one plain directory under `__fixtures__`
fn validate_session_name(name: &str) -> Result<()> {
    let problem = if name.trim().is_empty() {
        "is blank".to_string()
    } else if name.len() > MAX_SESSION_NAME_BYTES {
        format!("is {} bytes, limit is {MAX_SESSION_NAME_BYTES}", name.len())
    } else if name.starts_with('.') {
        "starts with '.'".to_string()
    } else if let Some(c) = name
        .chars()
        .find(|&c| c == '/' || c == '\\' || c.is_control())
    {
        format!("contains {c:?}")
    } else {
        return Ok(());
    };

    Err(ReplayError::InvalidSessionName(format!("{name:?} {problem}")))
}

/// Temporary file deleted on drop unless persisted
struct TempFile {
    path: PathBuf,
    keep: bool,
}

impl TempFile {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// The file was renamed into place; nothing to clean up
    fn persisted(mut self) {
        self.keep = true;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if !self.keep {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(temp_dir: &TempDir, session: &str) -> FixtureStore {
        FixtureStore::for_session(&temp_dir.path().join("api_tests.rs"), session).unwrap()
    }

    #[test]
    fn test_directory_convention() {
        let store = FixtureStore::for_session(Path::new("/repo/tests/api_tests.rs"), "fetches_item()").unwrap();

        assert_eq!(store.session_name().unwrap(), "fetches_item");
        assert_eq!(
            store.session_dir().unwrap(),
            Path::new("/repo/tests/__fixtures__/fetches_item")
        );
        assert_eq!(
            store.fixture_path("GET_a_1.json").unwrap(),
            PathBuf::from("/repo/tests/__fixtures__/fetches_item/GET_a_1.json")
        );
    }

    #[test]
    fn test_configure_idempotent_and_reset() {
        let hint = Path::new("/repo/tests/api_tests.rs");
        let mut store = FixtureStore::new();
        assert!(matches!(store.session_dir(), Err(ReplayError::SessionNotConfigured)));

        store.configure(hint, "t").unwrap();
        let first = store.session_dir().unwrap().to_path_buf();
        store.configure(hint, "t").unwrap();
        assert_eq!(store.session_dir().unwrap(), first);

        store.reset();
        assert!(!store.is_configured());
        assert!(matches!(store.session_name(), Err(ReplayError::SessionNotConfigured)));
    }

    #[test]
    fn test_invalid_session_names() {
        let hint = Path::new("/repo/tests/api_tests.rs");
        let too_long = "x".repeat(MAX_SESSION_NAME_BYTES + 1);
        for name in ["", "()", "  ", ".hidden", "..", "a/b", "a\\b", "a\0b", "a\nb", too_long.as_str()] {
            let err = FixtureStore::for_session(hint, name).unwrap_err();
            assert!(matches!(err, ReplayError::InvalidSessionName(_)), "accepted {name:?}");
        }

        let longest = "x".repeat(MAX_SESSION_NAME_BYTES);
        for name in ["module::test_name", "a..b", longest.as_str()] {
            assert!(FixtureStore::for_session(hint, name).is_ok(), "rejected {name:?}");
        }
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir, "session");

        // A non-empty directory where the fixture should land makes the rename fail
        let session_dir = store.session_dir().unwrap().to_path_buf();
        std::fs::create_dir_all(session_dir.join("f.json").join("inner")).unwrap();

        assert!(store.write("f.json", b"{}").await.is_err());

        let entries: Vec<_> = std::fs::read_dir(&session_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["f.json".to_string()]);
    }

    #[test]
    fn test_temp_file_removed_unless_persisted() {
        let temp_dir = TempDir::new().unwrap();
        let dropped = temp_dir.path().join(".a.tmp");
        let kept = temp_dir.path().join(".b.tmp");
        std::fs::write(&dropped, b"x").unwrap();
        std::fs::write(&kept, b"x").unwrap();

        drop(TempFile::new(dropped.clone()));
        TempFile::new(kept.clone()).persisted();

        assert!(!dropped.exists());
        assert!(kept.exists());
    }

    #[tokio::test]
    async fn test_write_read_exists() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir, "session");

        assert!(!store.exists("GET_x_1.json").await.unwrap());

        let path = store.write("GET_x_1.json", b"{}").await.unwrap();
        assert_eq!(path, temp_dir.path().join("__fixtures__/session/GET_x_1.json"));
        assert!(store.exists("GET_x_1.json").await.unwrap());
        assert_eq!(store.read("GET_x_1.json").await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_write_overwrites_and_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir, "session");

        store.write("f.json", b"first").await.unwrap();
        store.write("f.json", b"second").await.unwrap();
        assert_eq!(store.read("f.json").await.unwrap(), b"second");

        let entries: Vec<_> = std::fs::read_dir(store.session_dir().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec!["f.json".to_string()]);
    }

    #[tokio::test]
    async fn test_read_missing_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir, "session");

        assert!(matches!(store.read("nope.json").await, Err(ReplayError::Io(_))));
    }

    #[tokio::test]
    async fn test_remove_session_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store = store_in(&temp_dir, "session");

        // Missing directory is a no-op
        store.remove_session_directory().await.unwrap();

        store.write("f.json", b"{}").await.unwrap();
        store.remove_session_directory().await.unwrap();

        assert!(!store.session_dir().unwrap().exists());
        assert!(temp_dir.path().join(FIXTURES_DIR).exists());
    }

    #[tokio::test]
    async fn test_create_directory_failure() {
        let temp_dir = TempDir::new().unwrap();
        // A regular file where the fixtures directory should go
        std::fs::write(temp_dir.path().join(FIXTURES_DIR), b"").unwrap();
        let store = store_in(&temp_dir, "session");

        let err = store.create_session_directory_if_needed().await.unwrap_err();
        assert!(matches!(err, ReplayError::DirectoryCreateFailed { .. }));
    }

    #[tokio::test]
    async fn test_unconfigured_operations_fail() {
        let store = FixtureStore::new();

        assert!(matches!(store.exists("f.json").await, Err(ReplayError::SessionNotConfigured)));
        assert!(matches!(
            store.remove_session_directory().await,
            Err(ReplayError::SessionNotConfigured)
        ));
    }
}
