use std::path::Path;
use std::sync::Arc;

/// The underlying byte store. All consensus persistence goes through this
/// handle; multi-key atomicity is provided by `rocksdb::WriteBatch`.
pub type DB = rocksdb::DB;

pub fn open_db(path: &Path) -> Arc<DB> {
    let mut opts = rocksdb::Options::default();
    opts.create_if_missing(true);
    Arc::new(DB::open(&opts, path).expect("rocksdb must be openable at the provided path"))
}

/// Deletes an existing DB if it exists
pub fn delete_db(path: &Path) {
    if path.exists() {
        let opts = rocksdb::Options::default();
        DB::destroy(&opts, path).expect("rocksdb must be destroyable at the provided path");
    }
}

/// Keeps the temp directory alive for as long as the DB handle is in use
pub struct TempDbLifetime {
    _tempdir: tempfile::TempDir,
}

/// Creates a rocksdb instance in a self-deleting temp directory, for tests
pub fn create_temp_db() -> (TempDbLifetime, Arc<DB>) {
    let tempdir = tempfile::tempdir().expect("a temp directory must be creatable");
    let db = open_db(tempdir.path());
    (TempDbLifetime { _tempdir: tempdir }, db)
}
