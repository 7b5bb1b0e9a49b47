//! Built-in tools.
//!
//! Currently the scratchpad tool family: explicit save/get/list/search
//! over the session's pass-by-reference store. These are the tools the
//! model reaches for when an offload notice tells it content has been
//! parked under a `ref:key`.

pub mod scratchpad_tools;

pub use scratchpad_tools::register_scratchpad_tools;

/// The routing domain for the scratchpad tool family.
pub const SCRATCHPAD_DOMAIN: &str = "SESSION_SCRATCHPAD";

/// Human description used in the router's domain list.
pub const SCRATCHPAD_DOMAIN_DESCRIPTION: &str =
    "Store or retrieve large data within this session";
