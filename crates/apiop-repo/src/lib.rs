//! apiop remote endpoints
//!
//! - **Version resolution**: environment override, latest release
//!   discovery and a validated default, in that order
//! - **Bundle download**: manifest bundles as YAML or `.tar.gz`
//! - **Mocks**: in-memory endpoints for tests
//!
//! Redirects are followed by hand; see [`http`].

pub mod bundle;
pub mod error;
pub mod http;
pub mod mock;
pub mod version;

pub use bundle::{BundleFetcher, HttpBundleFetcher, load_bundle};
pub use error::{RepoError, Result, VersionError};
pub use http::HttpClient;
pub use mock::{MockBundleFetcher, MockVersionSource, SourceCounts};
pub use version::{HttpVersionSource, VersionQuery, VersionResolver, VersionSource, env_override};
