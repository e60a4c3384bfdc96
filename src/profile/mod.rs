mod errors;
mod model;
mod store;
mod watcher;

pub use errors::StoreError;
pub use model::{ConnectionProfile, ProfileDraft, ProfileId, SealedCredential};
pub use store::{ProfileStore, STORE_SCHEMA_VERSION};
pub use watcher::store_watcher;
