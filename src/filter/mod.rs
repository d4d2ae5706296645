pub mod wildcard;

/// Trait for extensible line filtering
pub trait Filter: Send + Sync {
    fn matches(&self, line: &str) -> bool;

    /// Human-readable description of the filter
    fn description(&self) -> String;
}
