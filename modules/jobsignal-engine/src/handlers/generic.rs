use jobsignal_common::SiteType;

use super::{FetchHints, SiteHandler};

/// Tail handler for careers pages without family-specific rules. The
/// default JSON/`<pre>` extraction still applies; everything else is the
/// provider's problem.
pub struct GenericHandler;

impl SiteHandler for GenericHandler {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn site_type(&self) -> SiteType {
        SiteType::Generic
    }

    fn matches_url(&self, _url: &str) -> bool {
        true
    }

    fn fetch_hints(&self, _url: &str) -> FetchHints {
        FetchHints::commonmark()
    }
}
