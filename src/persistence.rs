//! Binary on-disk persistence for users and per-day event logs.
//!
//! Layout under the data directory:
//!
//! ```text
//! data/
//!   users.dat            magic "USER", version, count, user records
//!   timeseries/state     magic "TSST", version, current day id
//!   timeseries/day-N.dat magic "TSDY", version, count, event records
//! ```
//!
//! Every file is written to a `*.tmp` sibling and renamed into place, so a
//! crash mid-write leaves the previous version intact. A missing file reads
//! as empty state; a bad magic number or version is a hard error.

use crate::auth::User;
use crate::errors::{PersistenceError, ProtocolError};
use crate::protocol::{ByteReader, ByteWriter, Event};

use std::fs;
use std::path::{Path, PathBuf};

const USERS_MAGIC: i32 = 0x5553_4552; // "USER"
const STATE_MAGIC: i32 = 0x5453_5354; // "TSST"
const DAY_MAGIC: i32 = 0x5453_4459; // "TSDY"
const FORMAT_VERSION: i32 = 1;

/// Owns all file access below one data directory.
#[derive(Debug, Clone)]
pub struct Persistence {
    data_dir: PathBuf,
}

impl Persistence {
    /// A persistence root at `data_dir`. Nothing is touched until the first
    /// save or load.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Persistence {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// The configured data directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn users_path(&self) -> PathBuf {
        self.data_dir.join("users.dat")
    }

    fn state_path(&self) -> PathBuf {
        self.data_dir.join("timeseries").join("state")
    }

    fn day_path(&self, day_id: i32) -> PathBuf {
        self.data_dir
            .join("timeseries")
            .join(format!("day-{}.dat", day_id))
    }

    /// Saves every user record.
    pub fn save_users(&self, users: &[User]) -> Result<(), PersistenceError> {
        let mut w = ByteWriter::new();
        w.put_i32(USERS_MAGIC);
        w.put_i32(FORMAT_VERSION);
        w.put_i32(users.len() as i32);
        for user in users {
            w.put_string(user.username());
            w.put_i32(user.password_hash().len() as i32);
            w.put_bytes(user.password_hash());
        }
        write_atomic(&self.users_path(), &w.into_bytes())?;
        log::debug!("Saved {} users to {:?}", users.len(), self.users_path());
        Ok(())
    }

    /// Loads all users; a missing file yields an empty list.
    pub fn load_users(&self) -> Result<Vec<User>, PersistenceError> {
        let path = self.users_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut r = ByteReader::new(&bytes);
        check_header(&mut r, USERS_MAGIC, &path)?;

        let count = read_count(&mut r, &path)?;
        let mut users = Vec::with_capacity(count);
        for _ in 0..count {
            let username = r.get_string().map_err(|e| malformed(&path, e))?;
            let hash_len = r.get_i32().map_err(|e| malformed(&path, e))?;
            if hash_len < 0 {
                return Err(malformed(&path, ProtocolError::Truncated("hash length")));
            }
            let hash = r
                .get_bytes(hash_len as usize)
                .map_err(|e| malformed(&path, e))?
                .to_vec();
            users.push(User::from_hash(&username, hash));
        }

        log::debug!("Loaded {} users from {:?}", users.len(), path);
        Ok(users)
    }

    /// Saves the state header (current day id).
    pub fn save_state(&self, current_day_id: i32) -> Result<(), PersistenceError> {
        let mut w = ByteWriter::new();
        w.put_i32(STATE_MAGIC);
        w.put_i32(FORMAT_VERSION);
        w.put_i32(current_day_id);
        write_atomic(&self.state_path(), &w.into_bytes())
    }

    /// Loads the state header; `None` if no state was ever saved.
    pub fn load_state(&self) -> Result<Option<i32>, PersistenceError> {
        let path = self.state_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut r = ByteReader::new(&bytes);
        check_header(&mut r, STATE_MAGIC, &path)?;
        let current_day_id = r.get_i32().map_err(|e| malformed(&path, e))?;
        Ok(Some(current_day_id))
    }

    /// Saves one completed day's event log.
    pub fn save_day(&self, day_id: i32, events: &[Event]) -> Result<(), PersistenceError> {
        let mut w = ByteWriter::new();
        w.put_i32(DAY_MAGIC);
        w.put_i32(FORMAT_VERSION);
        w.put_i32(events.len() as i32);
        for event in events {
            w.put_string(&event.product);
            w.put_i32(event.quantity);
            w.put_f64(event.price);
            w.put_i64(event.timestamp);
        }
        write_atomic(&self.day_path(day_id), &w.into_bytes())?;
        log::debug!("Saved day {} ({} events)", day_id, events.len());
        Ok(())
    }

    /// Loads one day's event log; `None` if the file does not exist
    /// (expired or never rotated).
    pub fn load_day(&self, day_id: i32) -> Result<Option<Vec<Event>>, PersistenceError> {
        let path = self.day_path(day_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut r = ByteReader::new(&bytes);
        check_header(&mut r, DAY_MAGIC, &path)?;

        let count = read_count(&mut r, &path)?;
        let mut events = Vec::with_capacity(count);
        for _ in 0..count {
            let product = r.get_string().map_err(|e| malformed(&path, e))?;
            let quantity = r.get_i32().map_err(|e| malformed(&path, e))?;
            let price = r.get_f64().map_err(|e| malformed(&path, e))?;
            let timestamp = r.get_i64().map_err(|e| malformed(&path, e))?;
            events.push(Event {
                product,
                quantity,
                price,
                timestamp,
            });
        }

        Ok(Some(events))
    }

    /// Deletes one day file. Missing files are not an error.
    pub fn delete_day(&self, day_id: i32) -> Result<(), PersistenceError> {
        match fs::remove_file(self.day_path(day_id)) {
            Ok(()) => {
                log::debug!("Deleted expired day file {}", day_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn check_header(
    r: &mut ByteReader<'_>,
    expected_magic: i32,
    path: &Path,
) -> Result<(), PersistenceError> {
    let magic = r.get_i32().map_err(|e| malformed(path, e))?;
    if magic != expected_magic {
        return Err(PersistenceError::Corrupt {
            path: path.display().to_string(),
            reason: format!("bad magic {:#010x}", magic),
        });
    }
    let version = r.get_i32().map_err(|e| malformed(path, e))?;
    if version != FORMAT_VERSION {
        return Err(PersistenceError::Corrupt {
            path: path.display().to_string(),
            reason: format!("unsupported version {}", version),
        });
    }
    Ok(())
}

fn read_count(r: &mut ByteReader<'_>, path: &Path) -> Result<usize, PersistenceError> {
    let count = r.get_i32().map_err(|e| malformed(path, e))?;
    if count < 0 {
        return Err(PersistenceError::Corrupt {
            path: path.display().to_string(),
            reason: format!("negative record count {}", count),
        });
    }
    Ok(count as usize)
}

fn malformed(path: &Path, source: ProtocolError) -> PersistenceError {
    PersistenceError::Malformed {
        path: path.display().to_string(),
        source,
    }
}

// Write to a sibling tmp file, then rename over the destination.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_persistence() -> (TempDir, Persistence) {
        let dir = TempDir::new().unwrap();
        let p = Persistence::new(dir.path());
        (dir, p)
    }

    #[test]
    fn test_users_roundtrip() {
        let (_dir, p) = temp_persistence();
        let users = vec![User::new("alice", "secret"), User::new("bob", "hunter2")];
        p.save_users(&users).unwrap();

        let loaded = p.load_users().unwrap();
        assert_eq!(loaded.len(), 2);
        let alice = loaded.iter().find(|u| u.username() == "alice").unwrap();
        assert!(alice.check_password("secret"));
        assert!(!alice.check_password("wrong"));
    }

    #[test]
    fn test_missing_files_read_as_empty() {
        let (_dir, p) = temp_persistence();
        assert!(p.load_users().unwrap().is_empty());
        assert!(p.load_state().unwrap().is_none());
        assert!(p.load_day(0).unwrap().is_none());
    }

    #[test]
    fn test_state_roundtrip() {
        let (_dir, p) = temp_persistence();
        p.save_state(17).unwrap();
        assert_eq!(p.load_state().unwrap(), Some(17));
        p.save_state(18).unwrap();
        assert_eq!(p.load_state().unwrap(), Some(18));
    }

    #[test]
    fn test_day_roundtrip_preserves_order_and_timestamps() {
        let (_dir, p) = temp_persistence();
        let events = vec![
            Event::with_timestamp("apple", 2, 1.0, 111),
            Event::with_timestamp("pear", 1, 3.0, 222),
            Event::with_timestamp("apple", 4, 0.5, 333),
        ];
        p.save_day(3, &events).unwrap();
        let loaded = p.load_day(3).unwrap().unwrap();
        assert_eq!(loaded, events);
    }

    #[test]
    fn test_delete_day() {
        let (_dir, p) = temp_persistence();
        p.save_day(0, &[Event::with_timestamp("apple", 1, 1.0, 1)])
            .unwrap();
        assert!(p.load_day(0).unwrap().is_some());
        p.delete_day(0).unwrap();
        assert!(p.load_day(0).unwrap().is_none());
        // Deleting again is fine.
        p.delete_day(0).unwrap();
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let (dir, p) = temp_persistence();
        std::fs::write(dir.path().join("users.dat"), b"not a users file").unwrap();
        let err = p.load_users().unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt { .. }));
    }

    #[test]
    fn test_bad_version_is_corrupt() {
        let (dir, p) = temp_persistence();
        let mut w = ByteWriter::new();
        w.put_i32(USERS_MAGIC);
        w.put_i32(99);
        w.put_i32(0);
        std::fs::write(dir.path().join("users.dat"), w.into_bytes()).unwrap();
        let err = p.load_users().unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt { .. }));
    }

    #[test]
    fn test_no_tmp_file_left_behind() {
        let (dir, p) = temp_persistence();
        p.save_state(1).unwrap();
        let ts_dir = dir.path().join("timeseries");
        let leftovers: Vec<_> = std::fs::read_dir(&ts_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
            .collect();
        assert!(leftovers.is_empty());
    }
}
