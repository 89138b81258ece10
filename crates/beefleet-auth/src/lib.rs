pub mod storage;

pub use storage::{CredentialSource, CredentialStore, API_KEY_ENV_VAR};
