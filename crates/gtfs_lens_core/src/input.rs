use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GtfsInputError {
    #[error("input path does not exist: {0}")]
    MissingPath(PathBuf),
    #[error("archive cannot be opened as a zip container: {source}")]
    CorruptArchive {
        #[source]
        source: zip::result::ZipError,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the archive comes from. Uploaded bundles arrive as bytes; a path may
/// point at a zip file or at a directory of extracted `.txt` files.
#[derive(Debug, Clone)]
pub enum GtfsInput {
    Zip(PathBuf),
    Directory(PathBuf),
    Bytes(Vec<u8>),
}

impl GtfsInput {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, GtfsInputError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GtfsInputError::MissingPath(path.to_path_buf()));
        }
        if path.is_dir() {
            Ok(GtfsInput::Directory(path.to_path_buf()))
        } else {
            Ok(GtfsInput::Zip(path.to_path_buf()))
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        GtfsInput::Bytes(bytes.into())
    }

    pub fn source(&self) -> String {
        match self {
            GtfsInput::Zip(path) | GtfsInput::Directory(path) => path.display().to_string(),
            GtfsInput::Bytes(bytes) => format!("<{} bytes in memory>", bytes.len()),
        }
    }

    /// Opens the container. A bundle that is not a readable zip fails here,
    /// before any table is parsed.
    pub fn reader(&self) -> Result<GtfsInputReader, GtfsInputError> {
        match self {
            GtfsInput::Directory(path) => Ok(GtfsInputReader::Directory(path.clone())),
            GtfsInput::Zip(path) => {
                let file = File::open(path).map_err(|source| GtfsInputError::Io {
                    path: path.clone(),
                    source,
                })?;
                Ok(GtfsInputReader::Zip(ZipMembers::read(file)?))
            }
            GtfsInput::Bytes(bytes) => Ok(GtfsInputReader::Zip(ZipMembers::read(Cursor::new(
                bytes.as_slice(),
            ))?)),
        }
    }
}

/// Zip members decompressed up front and keyed by bare file name, so a feed
/// zipped inside a top-level folder still resolves `stops.txt`.
#[derive(Debug, Default)]
pub struct ZipMembers {
    members: BTreeMap<String, Result<Vec<u8>, String>>,
}

impl ZipMembers {
    fn read<R: Read + Seek>(reader: R) -> Result<Self, GtfsInputError> {
        let mut archive = zip::ZipArchive::new(reader)
            .map_err(|source| GtfsInputError::CorruptArchive { source })?;
        let mut members = BTreeMap::new();
        for index in 0..archive.len() {
            let mut file = match archive.by_index(index) {
                Ok(file) => file,
                Err(err) => {
                    tracing::warn!("skipping unreadable zip entry #{}: {}", index, err);
                    continue;
                }
            };
            if file.is_dir() {
                continue;
            }
            let Some(name) = Path::new(file.name())
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)
            else {
                continue;
            };
            if members.contains_key(&name) {
                continue;
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            let content = file
                .read_to_end(&mut data)
                .map(|_| data)
                .map_err(|err| err.to_string());
            members.insert(name, content);
        }
        Ok(Self { members })
    }
}

#[derive(Debug)]
pub enum GtfsInputReader {
    Directory(PathBuf),
    Zip(ZipMembers),
}

/// Outcome of looking up one file in the container.
#[derive(Debug)]
pub enum FileContent {
    Missing,
    Data(Vec<u8>),
    Unreadable(String),
}

impl GtfsInputReader {
    pub fn read_file(&self, name: &str) -> FileContent {
        match self {
            GtfsInputReader::Directory(dir) => {
                let path = dir.join(name);
                if !path.is_file() {
                    return FileContent::Missing;
                }
                match std::fs::read(&path) {
                    Ok(data) => FileContent::Data(data),
                    Err(err) => FileContent::Unreadable(err.to_string()),
                }
            }
            GtfsInputReader::Zip(zip) => match zip.members.get(name) {
                None => FileContent::Missing,
                Some(Ok(data)) => FileContent::Data(data.clone()),
                Some(Err(message)) => FileContent::Unreadable(message.clone()),
            },
        }
    }
}
