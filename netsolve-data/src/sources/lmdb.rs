use super::RecordSource;
use crate::datum::Datum;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use log::{debug, info};
use netsolve_core::NetsolveError;
use std::collections::VecDeque;
use std::ops::Bound;
use std::path::Path;

/// Map size used when opening an existing environment for reading. LMDB
/// grows it to the size of the data file if that is larger.
const READ_MAP_SIZE: usize = 1 << 30;
const DEFAULT_PREFETCH: usize = 256;

fn storage(err: heed::Error) -> NetsolveError {
    NetsolveError::Storage(err.to_string())
}

fn open_env(path: &Path, map_size: usize) -> Result<Env, NetsolveError> {
    // SAFETY: the memory map is only accessed through heed's transactions.
    // heed keeps one environment per path for the whole process; when the
    // path is already open with other options it hands that one back.
    match unsafe { EnvOpenOptions::new().map_size(map_size).max_dbs(1).open(path) } {
        Ok(env) => Ok(env),
        Err(heed::Error::BadOpenOptions { env, .. }) => {
            debug!("LMDB environment {} already open, reusing it", path.display());
            Ok(env)
        }
        Err(e) => Err(storage(e)),
    }
}

/// Opens (creating if needed) the unnamed database of `env` for writing.
fn create_main_database(env: &Env) -> Result<Database<Bytes, Bytes>, NetsolveError> {
    let mut wtxn = env.write_txn().map_err(storage)?;
    let db = env
        .create_database::<Bytes, Bytes>(&mut wtxn, None)
        .map_err(storage)?;
    wtxn.commit().map_err(storage)?;
    Ok(db)
}

/// Opens the unnamed database of `env` inside a read transaction.
fn open_main_database(env: &Env) -> Result<Database<Bytes, Bytes>, NetsolveError> {
    let rtxn = env.read_txn().map_err(storage)?;
    let db = env
        .open_database::<Bytes, Bytes>(&rtxn, None)
        .map_err(storage)?
        .ok_or_else(|| NetsolveError::Storage(format!("{}: no main database", env.path().display())))?;
    rtxn.commit().map_err(storage)?;
    Ok(db)
}

/// Sequential cursor over the unnamed database of an LMDB environment.
///
/// Records come back in key order. Reads happen in chunks of `prefetch`
/// records per read transaction; the next chunk resumes right after the last
/// key fetched, so no transaction stays open between calls.
pub struct LmdbSource {
    env: Env,
    db: Database<Bytes, Bytes>,
    prefetch: usize,
    buffer: VecDeque<Vec<u8>>,
    last_key: Option<Vec<u8>>,
    exhausted: bool,
}

impl std::fmt::Debug for LmdbSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbSource")
            .field("path", &self.env.path())
            .field("prefetch", &self.prefetch)
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

impl LmdbSource {
    /// Opens the LMDB environment directory at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NetsolveError> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(NetsolveError::Io(format!(
                "LMDB environment {} is not a directory",
                path.display()
            )));
        }
        let env = open_env(path, READ_MAP_SIZE)?;
        info!("Opened LMDB source {}", path.display());
        Self::with_env(env)
    }

    /// Reads from an environment that is already open.
    pub fn with_env(env: Env) -> Result<Self, NetsolveError> {
        let db = open_main_database(&env)?;
        Ok(LmdbSource {
            env,
            db,
            prefetch: DEFAULT_PREFETCH,
            buffer: VecDeque::new(),
            last_key: None,
            exhausted: false,
        })
    }

    /// Number of records fetched per read transaction.
    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    fn refill(&mut self) -> Result<(), NetsolveError> {
        let rtxn = self.env.read_txn().map_err(storage)?;
        let after = self.last_key.clone();
        let start = match &after {
            Some(key) => Bound::Excluded(key.as_slice()),
            None => Bound::Unbounded,
        };
        let range: (Bound<&[u8]>, Bound<&[u8]>) = (start, Bound::Unbounded);
        let iter = self.db.range(&rtxn, &range).map_err(storage)?;

        let mut fetched = 0usize;
        for item in iter.take(self.prefetch) {
            let (key, value) = item.map_err(storage)?;
            self.last_key = Some(key.to_vec());
            self.buffer.push_back(value.to_vec());
            fetched += 1;
        }
        if fetched == 0 {
            self.exhausted = true;
        }
        debug!("LmdbSource: fetched {} records", fetched);
        Ok(())
    }
}

impl RecordSource for LmdbSource {
    fn next_record(&mut self) -> Result<Option<Vec<u8>>, NetsolveError> {
        if self.buffer.is_empty() && !self.exhausted {
            self.refill()?;
        }
        Ok(self.buffer.pop_front())
    }

    fn rewind(&mut self) -> Result<(), NetsolveError> {
        self.buffer.clear();
        self.last_key = None;
        self.exhausted = false;
        Ok(())
    }

    fn len_hint(&self) -> Option<usize> {
        let rtxn = self.env.read_txn().ok()?;
        self.db.len(&rtxn).ok().map(|n| n as usize)
    }
}

/// Writes records into the unnamed database of an LMDB environment,
/// committing every `commit_every` puts.
pub struct LmdbWriter {
    env: Env,
    db: Database<Bytes, Bytes>,
    pending: Vec<(Vec<u8>, Vec<u8>)>,
    commit_every: usize,
    written: usize,
}

impl LmdbWriter {
    /// Creates the environment directory if needed and opens it for writing.
    pub fn create(path: impl AsRef<Path>, map_size: usize) -> Result<Self, NetsolveError> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)?;
        let env = open_env(path, map_size)?;
        Self::with_env(env)
    }

    pub fn with_env(env: Env) -> Result<Self, NetsolveError> {
        let db = create_main_database(&env)?;
        Ok(LmdbWriter {
            env,
            db,
            pending: Vec::new(),
            commit_every: 1000,
            written: 0,
        })
    }

    pub fn with_commit_every(mut self, commit_every: usize) -> Self {
        self.commit_every = commit_every.max(1);
        self
    }

    /// The environment being written, e.g. to hand it to an [`LmdbSource`].
    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn put(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), NetsolveError> {
        self.pending.push((key.to_vec(), value));
        if self.pending.len() >= self.commit_every {
            self.flush()?;
        }
        Ok(())
    }

    /// Stores `datum` under a zero-padded key, so key order is index order.
    pub fn put_datum(&mut self, index: usize, datum: &Datum) -> Result<(), NetsolveError> {
        let key = format!("{:08}", index);
        self.put(key.as_bytes(), datum.encode_record())
    }

    pub fn flush(&mut self) -> Result<(), NetsolveError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut wtxn = self.env.write_txn().map_err(storage)?;
        for (key, value) in self.pending.drain(..) {
            self.db.put(&mut wtxn, key.as_slice(), value.as_slice()).map_err(storage)?;
            self.written += 1;
        }
        wtxn.commit().map_err(storage)?;
        debug!("LmdbWriter: committed, {} records so far", self.written);
        Ok(())
    }

    /// Commits what is left, releases the environment and returns the number
    /// of records written.
    ///
    /// The environment closes once the last clone of [`env`](Self::env) is
    /// dropped; after that the path can be reopened with any options.
    pub fn finish(mut self) -> Result<usize, NetsolveError> {
        self.flush()?;
        let LmdbWriter { env, written, .. } = self;
        let _closing = env.prepare_for_closing();
        Ok(written)
    }
}

#[cfg(test)]
#[path = "lmdb_test.rs"]
mod tests;
