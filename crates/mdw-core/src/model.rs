//! Writer content model
//!
//! Attributes the writer itself reads from nodes.

use mdw_repo::QName;

/// Namespace URI of the writer's own attributes
pub const MDW_URI: &str = "http://www.mdw.dev/model/metadatawriter/1.0";

/// Prefix always registered for [`MDW_URI`]
pub const MDW_PREFIX: &str = "mdw";

/// Local name of the per-node failure policy flag
pub const FAIL_ON_UNSUPPORTED: &str = "failOnUnsupported";

/// `mdw:failOnUnsupported`; absent means `true`
#[must_use]
pub fn prop_fail_on_unsupported() -> QName {
    QName::new(MDW_URI, FAIL_ON_UNSUPPORTED)
}
