//! Compile-time SDK identity.
//!
//! Rather than a hand-maintained global, these are plain compile-time
//! constants derived from the crate manifest, reported in every RPC's
//! identity headers and in each `RespondWorkflowTaskCompleted`-shaped
//! completion when they change run-over-run.

/// Name reported to the server in RPC headers and task-completion metadata.
pub const SDK_NAME: &str = "durable-sdk-rust";

/// Version reported alongside [`SDK_NAME`]. Sourced from the crate's own
/// `Cargo.toml` so a release bump can't drift from what ships.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A `(name, version)` pair ready to drop into an RPC header map.
pub fn sdk_identity() -> (&'static str, &'static str) {
    (SDK_NAME, SDK_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_non_empty() {
        let (name, version) = sdk_identity();
        assert!(!name.is_empty());
        assert!(!version.is_empty());
    }
}
</content>
