//! The run directory ("manifest") layout and all file I/O against it.
//!
//! ```text
//! <run>/
//!   account_info.json
//!   items.ndjson          one listing record per line, page order
//!   items.partial.ndjson  same, from a listing that lost pages
//!   export_summary.json
//!   metadata/<id>.json    {detail, exif, sizes}
//!   photos/<id>_<title>.<ext>
//! ```
//!
//! Writes go to a sibling temp name and are renamed into place, so a reader
//! never sees a half-written file under its final name. Two runs against
//! the same directory at once are not supported.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use super::error::StateError;
use super::types::{AssetLookup, ManifestSummary, MetadataRecord};
use crate::download::stub;
use crate::flickr::PhotoRecord;

pub const PHOTOS_DIR: &str = "photos";
pub const METADATA_DIR: &str = "metadata";
pub const ITEMS_FILE: &str = "items.ndjson";
pub const PARTIAL_ITEMS_FILE: &str = "items.partial.ndjson";
pub const ACCOUNT_INFO_FILE: &str = "account_info.json";
pub const SUMMARY_FILE: &str = "export_summary.json";

/// Separator between the item id and the rest of an asset filename.
pub const ID_SEPARATOR: char = '_';

/// Suffix of in-flight downloads and atomic-write temp files.
pub const PART_SUFFIX: &str = ".part";

#[derive(Debug, Clone)]
pub struct RunManifest {
    root: PathBuf,
}

impl RunManifest {
    /// Create (or adopt) a run directory, making sure both subdirectories exist.
    pub fn create(root: &Path) -> Result<Self, StateError> {
        let manifest = Self {
            root: root.to_path_buf(),
        };
        for dir in [manifest.photos_dir(), manifest.metadata_dir()] {
            std::fs::create_dir_all(&dir).map_err(|source| StateError::Setup {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(manifest)
    }

    /// Open an existing run directory for resume or recovery.
    pub fn open(root: &Path) -> Result<Self, StateError> {
        if !root.is_dir() {
            return Err(StateError::MissingRunDir(root.to_path_buf()));
        }
        Self::create(root)
    }

    /// Open an existing run directory without creating anything in it, for
    /// the read-only `status` report and stub recovery.
    pub fn open_read_only(root: &Path) -> Result<Self, StateError> {
        if !root.is_dir() {
            return Err(StateError::MissingRunDir(root.to_path_buf()));
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Directory name for a fresh run: `flickr_<account>_<YYYYmmdd_HHMMSS>`.
    pub fn run_dir_name(account_id: &str, started: &DateTime<Local>) -> String {
        let account: String = account_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("flickr_{}_{}", account, started.format("%Y%m%d_%H%M%S"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn photos_dir(&self) -> PathBuf {
        self.root.join(PHOTOS_DIR)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join(METADATA_DIR)
    }

    pub fn items_path(&self) -> PathBuf {
        self.root.join(ITEMS_FILE)
    }

    pub fn partial_items_path(&self) -> PathBuf {
        self.root.join(PARTIAL_ITEMS_FILE)
    }

    pub fn account_info_path(&self) -> PathBuf {
        self.root.join(ACCOUNT_INFO_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.root.join(SUMMARY_FILE)
    }

    pub fn metadata_path(&self, id: &str) -> PathBuf {
        self.metadata_dir().join(format!("{id}.json"))
    }

    pub fn has_metadata(&self, id: &str) -> bool {
        self.metadata_path(id).is_file()
    }

    pub fn has_item_list(&self) -> bool {
        self.items_path().is_file()
    }

    pub fn has_account_info(&self) -> bool {
        self.account_info_path().is_file()
    }

    /// Read an item's metadata record; `None` if it was never written.
    pub async fn read_metadata(&self, id: &str) -> Result<Option<MetadataRecord>, StateError> {
        let path = self.metadata_path(id);
        let bytes = match fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StateError::Read { path, source }),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StateError::Json { path, source })
    }

    pub async fn write_metadata(
        &self,
        id: &str,
        record: &MetadataRecord,
    ) -> Result<(), StateError> {
        write_json_atomic(&self.metadata_path(id), record).await
    }

    pub async fn write_account_info(&self, info: &Value) -> Result<(), StateError> {
        write_json_atomic(&self.account_info_path(), info).await
    }

    pub async fn write_summary<T: Serialize>(&self, summary: &T) -> Result<(), StateError> {
        write_json_atomic(&self.summary_path(), summary).await
    }

    /// Look up an item's asset by filename prefix. See [`find_asset_by_id`].
    pub fn find_asset(&self, id: &str) -> Result<AssetLookup, StateError> {
        let dir = self.photos_dir();
        find_asset_by_id(&dir, id).map_err(|source| StateError::Read { path: dir, source })
    }

    /// Write the item list, one JSON record per line in the given order,
    /// and return the path it landed at.
    ///
    /// Only a `complete` listing becomes `items.ndjson`, the file later runs
    /// reuse; one with failed or capped pages goes to `items.partial.ndjson`
    /// so the next run lists the account again. Lines are appended to a
    /// `.part` file which is renamed once written, so either file that exists
    /// is always whole.
    pub async fn write_item_list(
        &self,
        records: &[PhotoRecord],
        complete: bool,
    ) -> Result<PathBuf, StateError> {
        let (path, stale) = if complete {
            (self.items_path(), self.partial_items_path())
        } else {
            (self.partial_items_path(), self.items_path())
        };
        let part = part_path(&path);
        let write_err = |source: std::io::Error| StateError::Write {
            path: part.clone(),
            source,
        };

        let file = fs::File::create(&part).await.map_err(write_err)?;
        let mut out = BufWriter::new(file);
        for record in records {
            let line = serde_json::to_string(record).map_err(|source| StateError::Json {
                path: part.clone(),
                source,
            })?;
            out.write_all(line.as_bytes()).await.map_err(write_err)?;
            out.write_all(b"\n").await.map_err(write_err)?;
        }
        out.flush().await.map_err(write_err)?;
        drop(out);

        fs::rename(&part, &path).await.map_err(|source| StateError::Write {
            path: path.clone(),
            source,
        })?;
        if let Err(e) = fs::remove_file(&stale).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not remove stale {}: {}", stale.display(), e);
            }
        }
        Ok(path)
    }

    /// Read the complete item list back in file order.
    pub async fn read_item_list(&self) -> Result<Vec<PhotoRecord>, StateError> {
        self.read_item_list_from(&self.items_path()).await
    }

    /// Read an item list file back in file order.
    ///
    /// A line that doesn't parse is logged and skipped; a missing or
    /// unreadable file is fatal to the run.
    pub async fn read_item_list_from(&self, path: &Path) -> Result<Vec<PhotoRecord>, StateError> {
        let path = path.to_path_buf();
        let text = match fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::MissingItemList(path))
            }
            Err(source) => return Err(StateError::Read { path, source }),
        };

        let mut records = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<PhotoRecord>(line) {
                Ok(r) => records.push(r),
                Err(e) => warn!("Skipping bad line {} of {}: {}", lineno + 1, path.display(), e),
            }
        }
        debug!("Loaded {} items from {}", records.len(), path.display());
        Ok(records)
    }

    /// Count what's on disk without touching the network.
    pub async fn summarize(&self) -> Result<ManifestSummary, StateError> {
        let mut summary = ManifestSummary {
            has_account_info: self.has_account_info(),
            ..Default::default()
        };

        summary.metadata_records = count_entries(&self.metadata_dir(), |name| {
            name.ends_with(".json")
        })?;

        let photos = self.photos_dir();
        for entry in read_dir_if_exists(&photos)?.into_iter().flatten().flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.ends_with(PART_SUFFIX) {
                continue;
            }
            match stub::is_stub(&entry.path()) {
                Ok(true) => summary.stubs += 1,
                Ok(false) => summary.assets += 1,
                Err(e) => warn!("Cannot inspect {}: {}", entry.path().display(), e),
            }
        }

        if self.has_item_list() {
            let records = self.read_item_list().await?;
            let mut missing = 0u64;
            for record in &records {
                if !self.find_asset(&record.id)?.is_present() {
                    missing += 1;
                }
            }
            summary.listed_items = Some(records.len() as u64);
            summary.missing_assets = Some(missing);
        }

        Ok(summary)
    }
}

/// Find the asset file for `id` by directory listing: any regular file
/// named `<id>_…`, whatever its extension (earlier runs may have guessed a
/// different one).
///
/// `.part` temp files never count. A match that is a stub only counts as
/// [`AssetLookup::Stub`], which callers treat as missing. This is the one
/// place that knows assets are found by prefix; swapping it for an index
/// touches nothing else.
pub fn find_asset_by_id(dir: &Path, id: &str) -> std::io::Result<AssetLookup> {
    let prefix = format!("{id}{ID_SEPARATOR}");
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AssetLookup::Missing),
        Err(e) => return Err(e),
    };

    let mut stub_match = None;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with(&prefix) || name.ends_with(PART_SUFFIX) {
            continue;
        }
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if stub::is_stub(&path)? {
            stub_match = Some(path);
            continue;
        }
        return Ok(AssetLookup::Present(path));
    }
    Ok(stub_match.map_or(AssetLookup::Missing, AssetLookup::Stub))
}

/// The temp name used while `path` is being written.
pub fn part_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(PART_SUFFIX);
    path.with_file_name(name)
}

async fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), StateError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| StateError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let part = part_path(path);
    if let Err(source) = fs::write(&part, &bytes).await {
        let _ = fs::remove_file(&part).await;
        return Err(StateError::Write { path: part, source });
    }
    fs::rename(&part, path).await.map_err(|source| StateError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// `read_dir` that treats a missing directory as empty.
fn read_dir_if_exists(dir: &Path) -> Result<Option<std::fs::ReadDir>, StateError> {
    match std::fs::read_dir(dir) {
        Ok(entries) => Ok(Some(entries)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StateError::Read {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

fn count_entries(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<u64, StateError> {
    Ok(read_dir_if_exists(dir)?
        .into_iter()
        .flatten()
        .flatten()
        .filter(|e| e.file_name().to_str().is_some_and(&keep))
        .count() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::types::SubRecord;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(id: &str) -> PhotoRecord {
        serde_json::from_value(json!({"id": id, "secret": "s", "title": format!("t{id}")})).unwrap()
    }

    #[test]
    fn test_create_makes_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("run");
        let m = RunManifest::create(&root).unwrap();
        assert!(m.photos_dir().is_dir());
        assert!(m.metadata_dir().is_dir());
        assert_eq!(m.items_path(), root.join("items.ndjson"));
    }

    #[test]
    fn test_create_fails_when_root_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("file");
        std::fs::write(&root, b"x").unwrap();
        let err = RunManifest::create(&root).unwrap_err();
        assert!(matches!(err, StateError::Setup { .. }));
    }

    #[test]
    fn test_open_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let err = RunManifest::open(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, StateError::MissingRunDir(_)));
    }

    #[tokio::test]
    async fn test_open_read_only_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let m = RunManifest::open_read_only(dir.path()).unwrap();
        assert!(!m.photos_dir().exists());
        assert!(!m.metadata_dir().exists());

        let summary = m.summarize().await.unwrap();
        assert_eq!(summary.assets, 0);
        assert_eq!(summary.metadata_records, 0);
        assert_eq!(summary.listed_items, None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let err = RunManifest::open_read_only(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, StateError::MissingRunDir(_)));
    }

    #[test]
    fn test_run_dir_name() {
        let started = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            RunManifest::run_dir_name("12345@N01", &started),
            "flickr_12345_N01_20240309_140507"
        );
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/a/items.ndjson")),
            PathBuf::from("/a/items.ndjson.part")
        );
    }

    #[tokio::test]
    async fn test_item_list_preserves_order_and_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let m = RunManifest::create(dir.path()).unwrap();
        let records = vec![record("3"), record("1"), record("3")];
        let written = m.write_item_list(&records, true).await.unwrap();

        assert_eq!(written, m.items_path());
        assert!(m.has_item_list());
        assert!(!part_path(&m.items_path()).exists());
        let text = std::fs::read_to_string(m.items_path()).unwrap();
        assert_eq!(text.lines().count(), 3);

        let back = m.read_item_list().await.unwrap();
        assert_eq!(back, records);
    }

    #[tokio::test]
    async fn test_incomplete_item_list_is_not_reusable() {
        let dir = tempfile::tempdir().unwrap();
        let m = RunManifest::create(dir.path()).unwrap();

        let written = m.write_item_list(&[record("1")], false).await.unwrap();
        assert_eq!(written, m.partial_items_path());
        assert!(!m.has_item_list());
        let back = m.read_item_list_from(&written).await.unwrap();
        assert_eq!(back, vec![record("1")]);

        // a later complete listing replaces the partial one
        m.write_item_list(&[record("1"), record("2")], true).await.unwrap();
        assert!(m.has_item_list());
        assert!(!m.partial_items_path().exists());
    }

    #[tokio::test]
    async fn test_read_item_list_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let m = RunManifest::create(dir.path()).unwrap();
        std::fs::write(
            m.items_path(),
            "{\"id\":\"1\"}\nnot json\n\n{\"id\":\"2\",\"title\":\"x\"}\n",
        )
        .unwrap();
        let ids: Vec<String> = m
            .read_item_list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, ["1", "2"]);
    }

    #[tokio::test]
    async fn test_read_item_list_missing_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let m = RunManifest::create(dir.path()).unwrap();
        let err = m.read_item_list().await.unwrap_err();
        assert!(matches!(err, StateError::MissingItemList(_)));
    }

    #[tokio::test]
    async fn test_metadata_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let m = RunManifest::create(dir.path()).unwrap();
        assert!(!m.has_metadata("9"));
        assert_eq!(m.read_metadata("9").await.unwrap(), None);

        let rec = MetadataRecord {
            detail: SubRecord::Available(json!({"photo": {"id": "9"}})),
            exif: SubRecord::unavailable("API error 2: no exif"),
            sizes: SubRecord::Available(json!({"sizes": {"size": []}})),
        };
        m.write_metadata("9", &rec).await.unwrap();
        assert!(m.has_metadata("9"));
        assert!(!part_path(&m.metadata_path("9")).exists());
        assert_eq!(m.read_metadata("9").await.unwrap(), Some(rec));
    }

    #[test]
    fn test_find_asset_prefix_any_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("42_sunset.png"), b"png").unwrap();
        std::fs::write(dir.path().join("420_other.jpg"), b"jpg").unwrap();

        assert_eq!(
            find_asset_by_id(dir.path(), "42").unwrap(),
            AssetLookup::Present(dir.path().join("42_sunset.png"))
        );
        assert_eq!(find_asset_by_id(dir.path(), "4").unwrap(), AssetLookup::Missing);
    }

    #[test]
    fn test_find_asset_ignores_part_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("42_sunset.jpg.part"), b"half").unwrap();
        assert_eq!(find_asset_by_id(dir.path(), "42").unwrap(), AssetLookup::Missing);
    }

    #[test]
    fn test_find_asset_stub_counts_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let stub_path = dir.path().join("42_sunset.jpg");
        std::fs::write(&stub_path, stub::RATE_LIMIT_PAGE).unwrap();
        let found = find_asset_by_id(dir.path(), "42").unwrap();
        assert_eq!(found, AssetLookup::Stub(stub_path));
        assert!(!found.is_present());
    }

    #[test]
    fn test_find_asset_prefers_real_file_over_stub() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("42_a.jpg"), stub::RATE_LIMIT_PAGE).unwrap();
        std::fs::write(dir.path().join("42_a.png"), b"real image").unwrap();
        assert_eq!(
            find_asset_by_id(dir.path(), "42").unwrap(),
            AssetLookup::Present(dir.path().join("42_a.png"))
        );
    }

    #[test]
    fn test_find_asset_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            find_asset_by_id(&dir.path().join("absent"), "1").unwrap(),
            AssetLookup::Missing
        );
    }

    #[tokio::test]
    async fn test_summarize() {
        let dir = tempfile::tempdir().unwrap();
        let m = RunManifest::create(dir.path()).unwrap();
        m.write_item_list(&[record("1"), record("2"), record("3")], true)
            .await
            .unwrap();
        std::fs::write(m.photos_dir().join("1_t1.jpg"), b"img").unwrap();
        std::fs::write(m.photos_dir().join("2_t2.jpg"), stub::RATE_LIMIT_PAGE).unwrap();
        std::fs::write(m.photos_dir().join("3_t3.jpg.part"), b"partial").unwrap();
        std::fs::write(m.metadata_path("1"), b"{}").unwrap();

        let s = m.summarize().await.unwrap();
        assert_eq!(s.listed_items, Some(3));
        assert_eq!(s.metadata_records, 1);
        assert_eq!(s.assets, 1);
        assert_eq!(s.stubs, 1);
        assert_eq!(s.missing_assets, Some(2));
        assert!(!s.has_account_info);
    }
}
