use async_trait::async_trait;
use aws_sdk_s3 as s3;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use s3::primitives::ByteStream;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::RemoteStorageConfig;
use crate::models::GalleryPhoto;

/// Largest accepted image, in bytes (4 MiB). Checked before any storage I/O.
pub const MAX_UPLOAD_BYTES: usize = 4 * 1024 * 1024;

/// Prefix under which gallery objects live, both on disk and in the bucket.
const GALLERY_NAMESPACE: &str = "gallery";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("local storage failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote storage failure: {0}")]
    Remote(String),
}

// 1. ObjectStore Contract
/// ObjectStore
///
/// The remote bucket operations the adapter needs. Implemented by the real
/// S3/R2 client and by an in-memory mock for tests.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: &str)
    -> Result<(), StorageError>;

    async fn delete_object(&self, key: &str) -> Result<(), StorageError>;
}

// 2. The Real Implementation (Cloudflare R2 through the S3 API)
/// S3ObjectStore
///
/// `force_path_style(true)` keeps bucket names out of the hostname, which R2
/// (like MinIO) expects.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: s3::Client,
    bucket_name: String,
}

impl S3ObjectStore {
    pub fn new(endpoint: &str, access_key: &str, secret_key: &str, bucket: &str) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new("auto"))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        Self {
            client: s3::Client::from_conf(config),
            bucket_name: bucket.to_string(),
        }
    }

    /// Client for an R2 account, addressed through its account endpoint.
    pub fn for_r2(config: &RemoteStorageConfig) -> Self {
        Self::new(
            &r2_endpoint(&config.account_id),
            &config.access_key_id,
            &config.secret_access_key,
            &config.bucket,
        )
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Remote(format!("{e:?}")))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::Remote(format!("{e:?}")))?;
        Ok(())
    }
}

fn r2_endpoint(account_id: &str) -> String {
    format!("https://{account_id}.r2.cloudflarestorage.com")
}

// 3. The Mock Implementation (For Tests)
/// MockObjectStore
///
/// Keeps objects in memory. `new_failing` makes every call fail, to exercise
/// the best-effort paths.
#[derive(Clone, Default)]
pub struct MockObjectStore {
    pub should_fail: bool,
    objects: Arc<Mutex<HashMap<String, (Vec<u8>, String)>>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects
            .lock()
            .map(|objects| objects.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Remote("Mock Storage Error: Simulation requested".into()));
        }
        self.objects
            .lock()
            .map_err(|_| StorageError::Remote("mock store poisoned".into()))?
            .insert(key.to_string(), (bytes, content_type.to_string()));
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<(), StorageError> {
        if self.should_fail {
            return Err(StorageError::Remote("Mock Storage Error: Simulation requested".into()));
        }
        self.objects
            .lock()
            .map_err(|_| StorageError::Remote("mock store poisoned".into()))?
            .remove(key);
        Ok(())
    }
}

// 4. The Adapter
/// RemoteBucket
///
/// An enabled remote backend: the object store plus the base URL under which
/// its objects are publicly reachable.
#[derive(Clone)]
pub struct RemoteBucket {
    store: Arc<dyn ObjectStore>,
    public_base: String,
}

impl RemoteBucket {
    pub fn new(store: Arc<dyn ObjectStore>, public_base: &str) -> Self {
        Self {
            store,
            public_base: public_base.trim_end_matches('/').to_string(),
        }
    }

    /// R2 bucket from configuration. Without an explicit public base URL the
    /// account endpoint plus bucket name is used.
    pub fn from_config(config: &RemoteStorageConfig) -> Self {
        let public_base = match &config.public_base_url {
            Some(base) => base.clone(),
            None => format!("{}/{}", r2_endpoint(&config.account_id), config.bucket),
        };
        Self::new(Arc::new(S3ObjectStore::for_r2(config)), &public_base)
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }
}

/// Where a saved image ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedImage {
    pub filename: String,
    /// `None` when stored on local disk.
    pub storage_key: Option<String>,
    pub url: Option<String>,
}

/// ImageStorage
///
/// Persists uploaded gallery images to the remote bucket when one is
/// configured, otherwise under `<upload_dir>/gallery/`. Callers get back a
/// reference that does not depend on which backend was used.
#[derive(Clone)]
pub struct ImageStorage {
    upload_dir: PathBuf,
    remote: Option<RemoteBucket>,
}

impl ImageStorage {
    pub fn new(upload_dir: impl Into<PathBuf>, remote: Option<RemoteBucket>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            remote,
        }
    }

    pub fn remote_enabled(&self) -> bool {
        self.remote.is_some()
    }

    pub fn local_dir(&self) -> PathBuf {
        self.upload_dir.join(GALLERY_NAMESPACE)
    }

    /// save
    ///
    /// Stores `bytes` under a fresh, collision-resistant filename.
    pub async fn save(
        &self,
        bytes: Vec<u8>,
        mime: &str,
        extension: &str,
    ) -> Result<SavedImage, StorageError> {
        let filename = generate_filename(extension);

        match &self.remote {
            Some(remote) => {
                let key = format!("{GALLERY_NAMESPACE}/{filename}");
                remote.store.put_object(&key, bytes, mime).await?;
                let url = remote.public_url(&key);
                tracing::info!(%key, "Stored image in remote bucket");
                Ok(SavedImage {
                    filename,
                    storage_key: Some(key),
                    url: Some(url),
                })
            }
            None => {
                let dir = self.local_dir();
                tokio::fs::create_dir_all(&dir).await?;
                tokio::fs::write(dir.join(&filename), bytes).await?;
                tracing::info!(%filename, "Stored image on local disk");
                Ok(SavedImage {
                    filename,
                    storage_key: None,
                    url: None,
                })
            }
        }
    }

    /// delete
    ///
    /// Removes the bytes behind a gallery row. Remote failures are logged and
    /// swallowed: the metadata row is already gone and stays authoritative.
    pub async fn delete(
        &self,
        filename: &str,
        storage_key: Option<&str>,
    ) -> Result<(), StorageError> {
        if let (Some(remote), Some(key)) = (&self.remote, storage_key) {
            if let Err(e) = remote.store.delete_object(key).await {
                tracing::error!(%key, error = %e, "Failed to delete remote object");
            }
            return Ok(());
        }

        let path = self.local_dir().join(sanitize_filename(filename));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// attach_public_url
    ///
    /// Fills in the URL of rows stored remotely but written before a public
    /// URL was known.
    pub fn attach_public_url(&self, mut photo: GalleryPhoto) -> GalleryPhoto {
        if photo.url.as_deref().is_some_and(|u| !u.is_empty()) {
            return photo;
        }
        if let (Some(remote), Some(key)) = (&self.remote, photo.storage_key.as_deref()) {
            photo.url = Some(remote.public_url(key));
        }
        photo
    }
}

/// `gallery-<unix millis>-<6 hex chars>.<ext>`
fn generate_filename(extension: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(6).collect();
    format!("gallery-{millis}-{suffix}.{extension}")
}

/// Keeps only the final path component so a stored filename can never
/// address anything outside the gallery directory.
fn sanitize_filename(filename: &str) -> &str {
    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
}

/// An image decoded from a data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub extension: String,
}

/// parse_data_url
///
/// Accepts exactly `data:image/(png|jpeg|jpg|webp);base64,<payload>`.
pub fn parse_data_url(data_url: &str) -> Option<DecodedImage> {
    let rest = data_url.strip_prefix("data:image/")?;
    let (subtype, payload) = rest.split_once(";base64,")?;

    let (mime, extension) = match subtype {
        "png" => ("image/png", "png"),
        "jpeg" | "jpg" => ("image/jpeg", "jpg"),
        "webp" => ("image/webp", "webp"),
        _ => return None,
    };

    let bytes = STANDARD.decode(payload.trim()).ok()?;
    if bytes.is_empty() {
        return None;
    }

    Some(DecodedImage {
        bytes,
        mime: mime.to_string(),
        extension: extension.to_string(),
    })
}

/// StorageState
///
/// The shared storage adapter.
pub type StorageState = Arc<ImageStorage>;
