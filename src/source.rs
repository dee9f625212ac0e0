//! ## Input references and staging
//!
//! A run reads its input from a [`DatasetRef`]: either a local Parquet file or an `https://`
//! URL to one. Before either stage touches the data, the reference is *staged* into a
//! [`StagedDataset`], a local file the engine can scan as often as it needs to.
//!
//! - Local files are used in place.
//! - Remote files are downloaded once into a private temporary directory. The threshold
//!   resolver and the row selector then read the same bytes, and the directory is removed
//!   when the staged dataset is dropped, on success and failure alike.
//!
//! This module also derives the conventional output location, `<dir>/output_<basename>`,
//! through [`output_path_for`].

use crate::exceptions::{TripFilterError, TripFilterResult};
use arrow::datatypes::SchemaRef;
use datafusion::prelude::{DataFrame, ParquetReadOptions, SessionContext};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use reqwest::Url;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Scheme accepted for remote inputs.
pub const URL_PREFIX: &str = "https://";

/// File extension accepted for inputs.
pub const PARQUET_EXTENSION: &str = ".parquet";

/// A reference to an input dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetRef {
    Local(PathBuf),
    Remote(Url),
}

impl DatasetRef {
    /// Parses and validates an input reference.
    ///
    /// Accepts an existing local file or an `https://` URL, in both cases ending with `.parquet`.
    pub fn parse(input: &str) -> TripFilterResult<Self> {
        let invalid = || {
            TripFilterError::InvalidParameter(format!(
                "input_file should be a path or a URL to a parquet file, got '{}'",
                input
            ))
        };
        if !input.ends_with(PARQUET_EXTENSION) {
            return Err(invalid());
        }
        if input.starts_with(URL_PREFIX) {
            let url = Url::parse(input).map_err(|_| invalid())?;
            return Ok(DatasetRef::Remote(url));
        }
        let path = PathBuf::from(input);
        if path.is_file() {
            Ok(DatasetRef::Local(path))
        } else {
            Err(invalid())
        }
    }

    /// The last path component of the reference, e.g. `yellow_tripdata_2019-01.parquet`.
    pub fn basename(&self) -> TripFilterResult<String> {
        let name = match self {
            DatasetRef::Local(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            DatasetRef::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|segment| !segment.is_empty())
                .map(str::to_string),
        };
        name.ok_or_else(|| {
            TripFilterError::InvalidParameter(format!("'{}' has no file name", self))
        })
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetRef::Local(path) => write!(f, "{}", path.display()),
            DatasetRef::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// Builds the output location `<dir>/<prefix><basename of input>`.
pub fn output_path_for(input: &DatasetRef, prefix: &str, dir: &Path) -> TripFilterResult<PathBuf> {
    Ok(dir.join(format!("{}{}", prefix, input.basename()?)))
}

/// An input made available as a local Parquet file for the duration of a run.
#[derive(Debug)]
pub struct StagedDataset {
    reference: DatasetRef,
    path: PathBuf,
    schema: SchemaRef,
    // Holds the download directory of a remote input until the run is over.
    _download_dir: Option<TempDir>,
}

impl StagedDataset {
    /// Stages `reference`, downloading it first if it is remote.
    pub async fn stage(reference: &DatasetRef, fetch_timeout: Duration) -> TripFilterResult<Self> {
        let (path, download_dir) = match reference {
            DatasetRef::Local(path) => (path.clone(), None),
            DatasetRef::Remote(url) => {
                let dir = TempDir::new().map_err(|e| {
                    TripFilterError::source_unavailable(
                        url.as_str(),
                        format!("cannot create download directory: {}", e),
                    )
                })?;
                let path = dir.path().join(reference.basename()?);
                download(url, &path, fetch_timeout).await?;
                (path, Some(dir))
            }
        };
        let schema = read_file_schema(reference, &path)?;
        debug!(
            input = %reference,
            path = %path.display(),
            columns = schema.fields().len(),
            "staged input"
        );
        Ok(Self {
            reference: reference.clone(),
            path,
            schema,
            _download_dir: download_dir,
        })
    }

    pub fn reference(&self) -> &DatasetRef {
        &self.reference
    }

    /// Local path of the staged file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Arrow schema embedded in the input file.
    pub fn schema(&self) -> SchemaRef {
        SchemaRef::clone(&self.schema)
    }

    /// Opens the staged file as a DataFrame in `ctx`.
    pub async fn read(&self, ctx: &SessionContext) -> TripFilterResult<DataFrame> {
        let path = self.path.to_str().ok_or_else(|| {
            TripFilterError::source_unavailable(
                self.reference.to_string(),
                "path is not valid UTF-8",
            )
        })?;
        ctx.read_parquet(path, ParquetReadOptions::default())
            .await
            .map_err(|e| TripFilterError::source_unavailable(self.reference.to_string(), e))
    }
}

/// Reads the Arrow schema of a Parquet file from its footer.
fn read_file_schema(reference: &DatasetRef, path: &Path) -> TripFilterResult<SchemaRef> {
    let file = File::open(path)
        .map_err(|e| TripFilterError::source_unavailable(reference.to_string(), e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| TripFilterError::source_unavailable(reference.to_string(), e))?;
    Ok(SchemaRef::clone(builder.schema()))
}

/// Downloads `url` to `dest`, failing on non-2xx responses, timeouts and truncated bodies.
async fn download(url: &Url, dest: &Path, timeout: Duration) -> TripFilterResult<()> {
    let unavailable = |reason: String| TripFilterError::source_unavailable(url.as_str(), reason);

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| unavailable(e.to_string()))?;
    let mut response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| unavailable(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(unavailable(format!("HTTP status {}", status)));
    }
    let expected = response.content_length();

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| unavailable(format!("cannot create '{}': {}", dest.display(), e)))?;
    let mut received: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| unavailable(e.to_string()))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        received += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| unavailable(e.to_string()))?;

    if let Some(expected) = expected {
        if received != expected {
            return Err(unavailable(format!(
                "transfer ended after {} of {} bytes",
                received, expected
            )));
        }
    }
    info!(url = %url, bytes = received, "downloaded input");
    Ok(())
}
