//! Infrastructure adapters for the Elevara application ports.

#![forbid(unsafe_code)]

mod console_notification_sink;
mod env_secret_store;
mod http_key_set_source;
mod in_memory_resource_manager;
mod local_jwt_signer;
mod smtp_notification_sink;
mod static_key_set_source;

pub use console_notification_sink::ConsoleNotificationSink;
pub use env_secret_store::EnvSecretStore;
pub use http_key_set_source::HttpKeySetSource;
pub use in_memory_resource_manager::InMemoryResourceManager;
pub use local_jwt_signer::LocalKeyJwtSigner;
pub use smtp_notification_sink::{SmtpNotificationConfig, SmtpNotificationSink};
pub use static_key_set_source::StaticKeySetSource;
