/// Where an uploaded blob ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle {
    /// Name of the backend that accepted the upload (for logging).
    pub backend: String,
    pub bucket: String,
    /// Normalized key, relative to the bucket.
    pub key: String,
    /// Bytes written.
    pub size: u64,
}
