//! Configuration access port trait.

/// Keyed lookup into sectioned configuration. Missing or malformed numbers
/// fall back to `default`.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
}
