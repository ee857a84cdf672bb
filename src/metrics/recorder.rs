//! Recording interface used by request handlers and the count refresh job.

/// Label value used when a lookup fails before network or environment are known.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Environment label used when the caller supplies none.
pub const NULL_ENVIRONMENT: &str = "null";

/// Outcome tag stored in the `result` label of the lookup counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookupResult {
    Found,
    NotFound,
    BadAcceptHeader,
}

impl LookupResult {
    pub fn from_found(found: bool) -> Self {
        if found {
            LookupResult::Found
        } else {
            LookupResult::NotFound
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LookupResult::Found => "found",
            LookupResult::NotFound => "not_found",
            LookupResult::BadAcceptHeader => "error: bad_accept_header",
        }
    }
}

/// Trait for recording PayID metrics.
///
/// Implementations must never fail or block the caller.
pub trait MetricsRecorder: Send + Sync {
    /// Records a lookup rejected because of an unsupported Accept header.
    fn record_lookup_bad_accept_header(&self);

    /// Sets the current identifier count for a `[payment_network, environment]` pair.
    fn set_identifier_count(&self, payment_network: &str, environment: &str, count: f64);

    /// Records a lookup outcome. A missing environment is recorded as `"null"`.
    fn record_lookup_result(&self, found: bool, payment_network: &str, environment: Option<&str>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_tags_match_exposed_label_values() {
        assert_eq!(LookupResult::from_found(true).as_str(), "found");
        assert_eq!(LookupResult::from_found(false).as_str(), "not_found");
        assert_eq!(
            LookupResult::BadAcceptHeader.as_str(),
            "error: bad_accept_header"
        );
    }
}
