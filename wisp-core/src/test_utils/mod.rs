//! In-memory and builder helpers for testing.
//!
//! Available behind the `test-utils` feature flag. These exist because
//! `wisp-core` has no parser: tests build message chains directly with
//! [`builder`], and exercise [`object::HostContext`]-dependent code
//! against [`TestHost`] instead of a real scheduler.

mod builder;
mod test_host;

pub use builder::{ident, number, string, MessageBuilder};
pub use test_host::TestHost;
