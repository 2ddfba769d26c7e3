/// Seam to the platform's small persistent key-value store.
///
/// Values are opaque strings, callers bring their own encoding. Writes are
/// fire and forget; implementations log their own failures.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);
}
