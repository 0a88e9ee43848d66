//! Registry-facing manifest list engine.
//!
//! ```text
//! create ──► reference ──► endpoint (walk) ──► fetch ──► store
//! annotate ─────────────────────────────────────────────► store
//! push ──► store ──► assemble ──► propagate (mount, push members) ──► push
//! ```
//!
//! Every registry request goes through [`auth::RegistryClient`] over a
//! [`transport::RegistryTransport`].

pub mod assemble;
pub mod auth;
pub mod credentials;
pub mod digest;
pub mod endpoint;
pub mod fetch;
pub mod lists;
pub mod platform;
pub mod propagate;
pub mod push;
pub mod record;
pub mod reference;
pub mod store;
#[cfg(test)]
pub(crate) mod testing;
pub mod transport;

pub use assemble::{assemble, AssembledList, ManifestList};
pub use auth::RegistryClient;
pub use credentials::{
    ConfiguredCredentials, CredentialProvider, CredentialStore, RegistryAuth, StaticCredentials,
};
pub use digest::Digest;
pub use endpoint::{Endpoint, EndpointInfo, FetchFailure, FetchOutcome, Negotiator};
pub use lists::{Inspection, ManifestLists, PushOutcome};
pub use platform::{Platform, PlatformAnnotation};
pub use propagate::{BlobMountRequest, ManifestPushRequest, PropagationPlan};
pub use record::ManifestRecord;
pub use reference::ImageReference;
pub use store::{TransactionInfo, TransactionStore};
pub use transport::{HttpTransport, RegistryTransport};
