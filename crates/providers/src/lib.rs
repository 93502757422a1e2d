//! Provider integration
//!
//! Backends that create and destroy infrastructure resources. A provider is
//! either an external command (`CommandProvider`) or an explicit dry run.

#![warn(missing_docs)]

pub mod r#trait;
pub mod command;
pub mod dry_run;
pub mod registry;

pub use r#trait::{Provider, ProviderError, ProviderOutput};
pub use command::CommandProvider;
pub use dry_run::{DryRunProvider, ProviderCall};
pub use registry::ProviderRegistry;
