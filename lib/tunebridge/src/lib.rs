pub mod catalog;
pub mod config;
pub mod converter;
pub mod error;
pub mod matching;
pub mod provisioner;
pub mod resolution;
pub mod session;
pub mod traits;

#[cfg(test)]
mod mock;

pub use config::ConverterConfig;
pub use converter::{ConversionJob, Converter, ConverterBuilder};
pub use error::{ConvertError, Result};
pub use provisioner::{PlaylistProvisioner, RetryPolicy};
pub use resolution::{resolution_channel, Decision, ResolutionChannel, ResolutionHandle};
pub use session::{CatalogAccount, ConversionRequest, Session, SessionStore};
pub use traits::{AuthClient, CatalogClient, NullSink, ProgressSink};
