//! Provider backends and failover routing for kiln.
//!
//! All backends implement the `kiln_core::Provider` trait. The router
//! attempts them strictly in configured order, one attempt each, and
//! fails only when the whole route is exhausted.

pub mod anthropic;
pub mod budget;
pub mod format;
pub mod openai_compat;
pub mod router;

pub use anthropic::AnthropicBackend;
pub use budget::ensure_within_budget;
pub use format::format_output;
pub use openai_compat::OpenAiCompatBackend;
pub use router::{build_from_config, ProviderRouter};
