use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::IndexError;
use crate::store::IndexStore;

/// Vector file magic and version.
const VEC_MAGIC: [u8; 4] = [b'F', b'I', b'D', b'X'];
const VEC_VERSION: u32 = 1;

/// One row of the identity file. Array position is the ordinal
/// position of the matching vector.
#[derive(Debug, Serialize, Deserialize)]
struct IdentityRecord {
    person_id: String,
}

/// Saves and loads the index as two companion files.
///
/// The vector file is binary:
///
/// ```text
/// [4B magic "FIDX"] [4B version=1] [4B dim] [4B count]
/// [count x dim x 4B float32]
/// ```
///
/// All multi-byte values are little-endian. The identity file is a
/// JSON array of `{"person_id": ...}` records, kept human-inspectable
/// so an operator can audit the position-to-identity mapping.
///
/// Saves go through a temp file plus rename for each target, so a
/// crash mid-save leaves the prior pair intact instead of a torn one.
#[derive(Debug)]
pub struct Persistence {
    vector_path: PathBuf,
    identity_path: PathBuf,
    dim: usize,
}

impl Persistence {
    pub fn new(
        vector_path: impl Into<PathBuf>,
        identity_path: impl Into<PathBuf>,
        dim: usize,
    ) -> Self {
        Self {
            vector_path: vector_path.into(),
            identity_path: identity_path.into(),
            dim,
        }
    }

    /// True iff both companion files are present. A half-present pair
    /// counts as absent, forcing a rebuild instead of a partial load.
    pub fn exists(&self) -> bool {
        self.vector_path.exists() && self.identity_path.exists()
    }

    /// Writes both files. Both temp files are fully written before
    /// either rename happens.
    pub fn save(&self, store: &IndexStore) -> Result<(), IndexError> {
        let vec_tmp = tmp_path(&self.vector_path);
        let id_tmp = tmp_path(&self.identity_path);

        self.write_vectors(&vec_tmp, store)?;
        if let Err(e) = self.write_identities(&id_tmp, store) {
            let _ = fs::remove_file(&vec_tmp);
            return Err(e);
        }

        fs::rename(&vec_tmp, &self.vector_path).map_err(io_err)?;
        fs::rename(&id_tmp, &self.identity_path).map_err(io_err)?;
        Ok(())
    }

    /// Reads both files and reconstructs the store.
    ///
    /// Fails with [`IndexError::Corrupt`] if either file is malformed
    /// or the two disagree on row count; a mismatched pair would break
    /// the position-to-identity mapping and must never load.
    pub fn load(&self) -> Result<IndexStore, IndexError> {
        let vectors = self.read_vectors()?;
        let identities = self.read_identities()?;

        if vectors.len() != identities.len() {
            return Err(IndexError::Corrupt(format!(
                "row count mismatch: {} vectors, {} identities",
                vectors.len(),
                identities.len()
            )));
        }
        Ok(IndexStore::from_parts(vectors, identities))
    }

    fn write_vectors(&self, path: &Path, store: &IndexStore) -> Result<(), IndexError> {
        let mut bw = BufWriter::new(File::create(path).map_err(io_err)?);

        bw.write_all(&VEC_MAGIC).map_err(io_err)?;
        bw.write_all(&VEC_VERSION.to_le_bytes()).map_err(io_err)?;
        bw.write_all(&(self.dim as u32).to_le_bytes()).map_err(io_err)?;
        bw.write_all(&(store.len() as u32).to_le_bytes()).map_err(io_err)?;

        for row in store.vectors() {
            for &v in row {
                bw.write_all(&v.to_le_bytes()).map_err(io_err)?;
            }
        }
        bw.flush().map_err(io_err)
    }

    fn write_identities(&self, path: &Path, store: &IndexStore) -> Result<(), IndexError> {
        let records: Vec<IdentityRecord> = store
            .identities()
            .iter()
            .map(|id| IdentityRecord {
                person_id: id.clone(),
            })
            .collect();
        let mut bw = BufWriter::new(File::create(path).map_err(io_err)?);
        serde_json::to_writer_pretty(&mut bw, &records)
            .map_err(|e| IndexError::Persistence(e.to_string()))?;
        bw.flush().map_err(io_err)
    }

    fn read_vectors(&self) -> Result<Vec<Vec<f32>>, IndexError> {
        let mut br = BufReader::new(File::open(&self.vector_path).map_err(io_err)?);

        let mut magic = [0u8; 4];
        br.read_exact(&mut magic).map_err(read_err)?;
        if magic != VEC_MAGIC {
            return Err(IndexError::Corrupt(format!("invalid magic {magic:?}")));
        }

        let version = read_u32(&mut br)?;
        if version != VEC_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported version {version} (want {VEC_VERSION})"
            )));
        }

        let dim = read_u32(&mut br)? as usize;
        if dim != self.dim {
            return Err(IndexError::Corrupt(format!(
                "dimension mismatch: file has {dim}, index expects {}",
                self.dim
            )));
        }

        let count = read_u32(&mut br)? as usize;
        let mut vectors = Vec::with_capacity(count);
        for _ in 0..count {
            let mut row = vec![0.0f32; dim];
            for v in &mut row {
                let mut fb = [0u8; 4];
                br.read_exact(&mut fb).map_err(read_err)?;
                *v = f32::from_le_bytes(fb);
            }
            vectors.push(row);
        }
        Ok(vectors)
    }

    fn read_identities(&self) -> Result<Vec<String>, IndexError> {
        let br = BufReader::new(File::open(&self.identity_path).map_err(io_err)?);
        let records: Vec<IdentityRecord> = serde_json::from_reader(br)
            .map_err(|e| IndexError::Corrupt(format!("identity file: {e}")))?;
        Ok(records.into_iter().map(|r| r.person_id).collect())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".tmp");
    PathBuf::from(os)
}

fn io_err(e: std::io::Error) -> IndexError {
    IndexError::Persistence(e.to_string())
}

/// Read failures inside a file body mean the file is truncated, which
/// is corruption rather than an I/O environment problem.
fn read_err(e: std::io::Error) -> IndexError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        IndexError::Corrupt("truncated vector file".into())
    } else {
        IndexError::Persistence(e.to_string())
    }
}

fn read_u32(br: &mut impl Read) -> Result<u32, IndexError> {
    let mut buf = [0u8; 4];
    br.read_exact(&mut buf).map_err(read_err)?;
    Ok(u32::from_le_bytes(buf))
}
