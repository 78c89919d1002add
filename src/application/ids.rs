/// Source of globally unique, roughly increasing identifiers.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> i64;
}
