use anyhow::Result;

/// Narrow interface onto the test-case blob store. File-mode submissions
/// resolve their per-case names through this; integrity of the stored data
/// is the store's own business.
pub trait TestDataStore: Send + Sync {
    fn read_file(&self, name: &str) -> Result<Vec<u8>>;
}
