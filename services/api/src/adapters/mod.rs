pub mod identity;
pub mod oauth;
pub mod session_file;
pub mod xrpc;

pub use identity::HandleResolver;
pub use oauth::{AuthorizationPrompt, CallbackParams, OAuthAdapter, PromptChannel};
pub use session_file::FileSessionPersistence;
pub use xrpc::XrpcRepositoryAdapter;
