pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod remote;
pub mod secret;
pub mod session;
pub mod store;

pub use config::Config;
pub use error::{
    AuthExchangeError, CodecError, ConfigError, FetchError, RegistrationError, SessionError,
};
pub use models::{AccessToken, AppRegistration, ArticleCache, AuthorizationCode, Post};
pub use remote::{
    AppCredentials, MastodonClient, PageRequest, RemoteSession, Status, StatusPage,
};
pub use secret::{Sealed, SecretCodec};
pub use session::{Navigation, SessionEngine, SessionPhase};
pub use store::{Slot, SlotChange, SlotStore};
