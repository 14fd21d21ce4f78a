//! PromptGuard Hub
//!
//! Acquisition of model artifacts from a remote registry.
//!
//! - [`ArtifactCache`] resolves the cache root and checks what is on disk. It
//!   never touches the network.
//! - [`ArtifactFetcher`] turns an [`ArtifactRef`] into a complete local file,
//!   downloading on a miss through a `.incomplete` temp file that is renamed
//!   into place only once the body has been fully written.
//! - [`HubConfig`] carries the cache root, remote host, offline switch and
//!   token. A process-wide default is available through [`global_config`] and
//!   [`configure`], but every constructor takes an explicit value.

pub mod cache;
pub mod config;
pub mod fetcher;
pub mod transport;

pub use cache::{ArtifactCache, ArtifactRef};
pub use config::{configure, global_config, Environment, HubConfig};
pub use fetcher::{ArtifactFetcher, Requirement};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, Transport};
