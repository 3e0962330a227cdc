/// Common surface of the entities a hub entry exposes.
///
/// The version number is incremented each time the entity state changes, so
/// observers can detect updates by comparing versions.
pub trait Entity: Send + Sync {
    fn name(&self) -> &str;

    /// Stable id, derived from the hub entry id.
    fn unique_id(&self) -> &str;

    fn version(&self) -> u32;
}
