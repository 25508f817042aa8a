use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use billing_core::{Compression, Manifest, Source};
use billing_db::Db;

use crate::store::{ObjectStore, StoreError};
use crate::types::{BucketDownload, DownloadedReport, IngestError, Result};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

fn path_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|ch| if ch == '/' || ch == '\\' { '_' } else { ch })
        .collect();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "_".to_string()
    } else {
        cleaned
    }
}

/// `<staging_root>/<customer>/<provider_kind>/<location>`, where the location
/// is the bucket name or the delivery path flattened into one segment.
pub fn staging_dir_for(staging_root: &Path, source: &Source) -> PathBuf {
    staging_root
        .join(path_segment(&source.customer_name))
        .join(source.provider_kind.as_str())
        .join(path_segment(source.billing_source.trim().trim_matches('/')))
}

pub fn detect_compression(path: &Path) -> io::Result<Compression> {
    if Compression::from_file_name(path) == Compression::Gzip {
        return Ok(Compression::Gzip);
    }
    let mut magic = [0u8; 2];
    let mut file = File::open(path)?;
    let read = file.read(&mut magic)?;
    Ok(compression_from_bytes(&magic[..read]))
}

fn compression_from_bytes(bytes: &[u8]) -> Compression {
    if bytes.starts_with(&GZIP_MAGIC) {
        Compression::Gzip
    } else {
        Compression::None
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".part");
    let tmp = PathBuf::from(tmp);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

/// Fetches report files into the source's staging directory, skipping the
/// transfer when the stored fingerprint still matches.
pub struct ReportDownloader<'a> {
    store: &'a dyn ObjectStore,
    staging_dir: PathBuf,
    provider_id: String,
}

impl<'a> ReportDownloader<'a> {
    pub fn new(store: &'a dyn ObjectStore, staging_root: &Path, source: &Source) -> Self {
        Self {
            store,
            staging_dir: staging_dir_for(staging_root, source),
            provider_id: source.provider_id.clone(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn staged_name(assembly_id: &str, key: &str) -> String {
        let file_name = key.rsplit('/').next().unwrap_or(key);
        format!("{assembly_id}-{file_name}")
    }

    fn map_store_error(&self, key: &str, err: StoreError) -> IngestError {
        match err {
            StoreError::NotFound { .. } => IngestError::FileNotFound {
                key: key.to_string(),
                location: self.store.location().to_string(),
            },
            StoreError::Unavailable { message } => IngestError::SourceUnavailable {
                location: self.store.location().to_string(),
                message,
            },
        }
    }

    pub fn download_report(
        &self,
        db: &mut Db,
        key: &str,
        assembly_id: &str,
        manifest_id: Option<i64>,
    ) -> Result<DownloadedReport> {
        let file_name = Self::staged_name(assembly_id, key);
        let local_path = self.staging_dir.join(&file_name);

        let remote = self
            .store
            .head(key)
            .map_err(|err| self.map_store_error(key, err))?;
        let stored = db.get_fingerprint(&file_name, &self.provider_id)?;
        if stored.as_deref() == Some(remote.as_str()) && local_path.is_file() {
            log::debug!("{} unchanged, reusing {}", key, local_path.display());
            return Ok(DownloadedReport {
                key: key.to_string(),
                compression: detect_compression(&local_path)?,
                file_name,
                local_path,
                fingerprint: remote,
                transferred: false,
            });
        }

        let data = self
            .store
            .get(key)
            .map_err(|err| self.map_store_error(key, err))?;
        write_atomically(&local_path, &data.bytes)?;
        db.set_fingerprint(&file_name, &self.provider_id, &data.fingerprint, manifest_id)?;
        log::info!(
            "fetched {} ({} bytes) -> {}",
            key,
            data.bytes.len(),
            local_path.display()
        );

        let compression = match Compression::from_file_name(&local_path) {
            Compression::Gzip => Compression::Gzip,
            Compression::None => compression_from_bytes(&data.bytes),
        };
        Ok(DownloadedReport {
            key: key.to_string(),
            file_name,
            local_path,
            compression,
            fingerprint: data.fingerprint,
            transferred: true,
        })
    }

    /// Stages the manifest itself as `<assembly_id>-<report_name>-Manifest.json`
    /// so it survives the cleanup of other assemblies.
    pub fn download_manifest(&self, manifest: &Manifest) -> Result<PathBuf> {
        let key = manifest.manifest_key.as_str();
        let local_path = self
            .staging_dir
            .join(Self::staged_name(&manifest.assembly_id, key));
        let data = self
            .store
            .get(key)
            .map_err(|err| self.map_store_error(key, err))?;
        write_atomically(&local_path, &data.bytes)?;
        log::debug!("staged manifest {} -> {}", key, local_path.display());
        Ok(local_path)
    }

    /// Stages every report file of the manifest, then the manifest next to
    /// them. The first failing file aborts the download.
    pub fn download_bucket(
        &self,
        db: &mut Db,
        manifest: &Manifest,
        manifest_id: Option<i64>,
    ) -> Result<BucketDownload> {
        let reports = manifest
            .report_keys
            .iter()
            .map(|key| self.download_report(db, key, &manifest.assembly_id, manifest_id))
            .collect::<Result<Vec<_>>>()?;
        let manifest_path = self.download_manifest(manifest)?;
        log::info!(
            "staged {} report files and manifest for assembly {}",
            reports.len(),
            manifest.assembly_id
        );
        Ok(BucketDownload {
            manifest_path,
            reports,
        })
    }
}
