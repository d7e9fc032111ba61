/// Version of this crate, reported to the flag service.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Value of the `SplitSDKVersion` header.
pub fn sdk_version_header() -> String {
    format!("rust-split-wrapper-{VERSION}")
}
