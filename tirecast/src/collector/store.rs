//! Session segment files on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::record::SessionRecord;
use crate::artifact::{read_artifact, write_artifact, ArtifactError, ArtifactKind};
use crate::telemetry::SessionInfo;

/// Subdirectory holding segments of sessions still being recorded.
pub const ACTIVE_DIR: &str = "active";

fn unsafe_chars() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-z0-9_-]+").unwrap())
}

/// Make a name safe for use as a filename component.
///
/// Lowercases, collapses every run of characters outside `[a-z0-9_-]` to a
/// single underscore and never returns an empty string.
pub fn sanitize_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let cleaned = unsafe_chars().replace_all(&lowered, "_");
    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Hex characters of the raw-name digest appended by [`unique_file_stem`].
const NAME_DIGEST_LEN: usize = 8;

/// A filename component that stays distinct for distinct raw names.
///
/// Sanitizing alone maps `race.1` and `race 1` to the same string, so the
/// sanitized form is followed by a short SHA-256 digest of the raw name.
pub fn unique_file_stem(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    let hex: String = digest
        .iter()
        .take(NAME_DIGEST_LEN / 2)
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("{}-{}", sanitize_name(name), hex)
}

/// Filename key of a session: sanitized car and track, and the session id
/// made unique with [`unique_file_stem`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub car: String,
    pub track: String,
    pub session: String,
}

impl SessionKey {
    pub fn from_info(info: &SessionInfo) -> Self {
        Self {
            car: sanitize_name(&info.car_id),
            track: sanitize_name(&info.track_id),
            session: unique_file_stem(&info.session_id),
        }
    }

    /// Parse `car.track.session.NNNN.tsr` into a key and segment number.
    fn parse_file_name(path: &Path) -> Option<(Self, u32)> {
        let name = path.file_name()?.to_str()?;
        let stem = name.strip_suffix(".tsr")?;
        let mut parts = stem.split('.');
        let car = parts.next()?;
        let track = parts.next()?;
        let session = parts.next()?;
        let segment = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some((
            Self {
                car: car.to_string(),
                track: track.to_string(),
                session: session.to_string(),
            },
            segment,
        ))
    }

    fn file_name(&self, segment: u32) -> String {
        format!(
            "{}.{}.{}.{:04}.{}",
            self.car,
            self.track,
            self.session,
            segment,
            ArtifactKind::SessionSegment.extension()
        )
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.car, self.track, self.session)
    }
}

/// A finished session as found on disk.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub key: SessionKey,

    /// Segment files in segment order.
    pub segments: Vec<PathBuf>,

    /// Total size of all segments.
    pub bytes: u64,

    /// Newest segment modification time.
    pub modified: SystemTime,
}

/// Reads and writes session segments under one root directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn active_dir(&self) -> PathBuf {
        self.root.join(ACTIVE_DIR)
    }

    /// First unused segment number for a session, across active and finished files.
    pub fn next_segment_index(&self, info: &SessionInfo) -> Result<u32, ArtifactError> {
        let key = SessionKey::from_info(info);
        let mut next = 0;
        for dir in [self.root.clone(), self.active_dir()] {
            for (path_key, segment, _) in self.scan(&dir)? {
                if path_key == key {
                    next = next.max(segment + 1);
                }
            }
        }
        Ok(next)
    }

    /// Persist an in-progress segment. Returns its path and size.
    pub fn write_segment(&self, record: &SessionRecord) -> Result<(PathBuf, u64), ArtifactError> {
        let key = SessionKey::from_info(&record.info);
        let path = self.active_dir().join(key.file_name(record.segment));
        let bytes = write_artifact(&path, ArtifactKind::SessionSegment, record)?;
        debug!(
            path = %path.display(),
            samples = record.samples.len(),
            ground_truth = record.ground_truth.len(),
            bytes,
            "Wrote session segment"
        );
        Ok((path, bytes))
    }

    /// Move a session's in-progress segments into the finished set.
    pub fn finalize(&self, info: &SessionInfo) -> Result<Vec<PathBuf>, ArtifactError> {
        let key = SessionKey::from_info(info);
        let mut moved = Vec::new();
        for (path_key, _, path) in self.scan(&self.active_dir())? {
            if path_key == key {
                moved.push(self.move_to_root(&path)?);
            }
        }
        Ok(moved)
    }

    /// Move segments abandoned by a previous run into the finished set.
    pub fn recover_orphans(&self) -> Result<usize, ArtifactError> {
        let mut recovered = 0;
        for (_, _, path) in self.scan(&self.active_dir())? {
            self.move_to_root(&path)?;
            recovered += 1;
        }
        if recovered > 0 {
            info!(segments = recovered, "Recovered orphaned session segments");
        }
        Ok(recovered)
    }

    /// All finished sessions, oldest first.
    pub fn list(&self) -> Result<Vec<StoredSession>, ArtifactError> {
        let mut sessions: Vec<StoredSession> = Vec::new();

        let mut files = self.scan(&self.root)?;
        files.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));

        for (key, _, path) in files {
            let metadata = fs::metadata(&path).map_err(|e| ArtifactError::Io {
                path: path.clone(),
                source: e,
            })?;
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

            match sessions.last_mut() {
                Some(last) if last.key == key => {
                    last.bytes += metadata.len();
                    last.modified = last.modified.max(modified);
                    last.segments.push(path);
                }
                _ => sessions.push(StoredSession {
                    key,
                    segments: vec![path],
                    bytes: metadata.len(),
                    modified,
                }),
            }
        }

        sessions.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.key.cmp(&b.key)));
        Ok(sessions)
    }

    /// Find a finished session by its id.
    pub fn find(&self, session_id: &str) -> Result<Option<StoredSession>, ArtifactError> {
        let wanted = unique_file_stem(session_id);
        Ok(self.list()?.into_iter().find(|s| s.key.session == wanted))
    }

    /// Load one segment file.
    pub fn load_segment(&self, path: &Path) -> Result<SessionRecord, ArtifactError> {
        read_artifact(path, ArtifactKind::SessionSegment)
    }

    /// Load every segment of a session and merge them.
    pub fn load(&self, stored: &StoredSession) -> Result<SessionRecord, ArtifactError> {
        let segments = stored
            .segments
            .iter()
            .map(|path| self.load_segment(path))
            .collect::<Result<Vec<_>, _>>()?;

        SessionRecord::merge_segments(segments).ok_or_else(|| ArtifactError::Corrupt {
            path: self.root.join(stored.key.to_string()),
            reason: "session has no segments".to_string(),
        })
    }

    /// Load every readable session recorded with the given car.
    ///
    /// Corrupt sessions are skipped with a warning.
    pub fn load_car(&self, car_id: &str) -> Result<Vec<SessionRecord>, ArtifactError> {
        let car = sanitize_name(car_id);
        let mut records = Vec::new();
        for stored in self.list()?.into_iter().filter(|s| s.key.car == car) {
            match self.load(&stored) {
                Ok(record) if record.info.car_id == car_id => records.push(record),
                Ok(_) => {}
                Err(e) if e.is_corrupt() => {
                    warn!(session = %stored.key, error = %e, "Skipping corrupt session");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    /// Delete all segments of a session. Returns bytes freed.
    pub fn delete(&self, stored: &StoredSession) -> Result<u64, ArtifactError> {
        let mut freed = 0;
        for path in &stored.segments {
            let len = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            match fs::remove_file(path) {
                Ok(()) => freed += len,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ArtifactError::Io {
                        path: path.clone(),
                        source: e,
                    })
                }
            }
        }
        Ok(freed)
    }

    /// Bytes used by finished sessions.
    pub fn usage_bytes(&self) -> Result<u64, ArtifactError> {
        Ok(self.list()?.iter().map(|s| s.bytes).sum())
    }

    fn move_to_root(&self, path: &Path) -> Result<PathBuf, ArtifactError> {
        let file_name = path.file_name().unwrap_or_default();
        let target = self.root.join(file_name);
        fs::rename(path, &target).map_err(|e| ArtifactError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(target)
    }

    /// Segment files directly inside `dir`.
    fn scan(&self, dir: &Path) -> Result<Vec<(SessionKey, u32, PathBuf)>, ArtifactError> {
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let pattern = format!(
            "{}/*.{}",
            glob::Pattern::escape(&dir.to_string_lossy()),
            ArtifactKind::SessionSegment.extension()
        );
        let paths = glob::glob(&pattern).map_err(|e| ArtifactError::Io {
            path: dir.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()),
        })?;

        let mut found = Vec::new();
        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!(error = %e, "Unreadable entry in session directory");
                    continue;
                }
            };
            match SessionKey::parse_file_name(&path) {
                Some((key, segment)) => found.push((key, segment, path)),
                None => debug!(path = %path.display(), "Ignoring unrecognised file"),
            }
        }
        Ok(found)
    }
}
