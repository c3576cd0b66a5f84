use serde::Deserialize;

/// Largest body, in bytes, collected into memory before slicing by default.
pub const DEFAULT_BUFFER_LIMIT: usize = 8 * 1024 * 1024;

/// Settings for [`range_with_config`](crate::range_with_config).
///
/// Deserializable so a host can embed it in its own configuration; every
/// field is optional there.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    /// Responses with an exact size up to this many bytes are buffered and
    /// sliced in memory. Anything larger, or of unknown size, is sliced as a
    /// stream.
    pub buffer_limit: usize,
    /// Answer 400 when a non-GET request carries a `Range` header and no
    /// handler produced the resource (downstream 404 or 405).
    pub reject_unrouted: bool,
}

impl Default for RangeConfig {
    fn default() -> Self {
        RangeConfig {
            buffer_limit: DEFAULT_BUFFER_LIMIT,
            reject_unrouted: true,
        }
    }
}

impl RangeConfig {
    pub fn with_buffer_limit(mut self, buffer_limit: usize) -> Self {
        self.buffer_limit = buffer_limit;
        self
    }

    pub fn with_reject_unrouted(mut self, reject_unrouted: bool) -> Self {
        self.reject_unrouted = reject_unrouted;
        self
    }
}
