pub mod app;
pub mod client;
pub mod collection;
pub mod domain;
pub mod error;
pub mod metadata;
pub mod ports;
pub mod session;

#[cfg(test)]
mod testing;

pub use app::{AuthState, LessonTracker};
pub use client::{AuthenticatedClient, ClientFactory};
pub use collection::{LessonCollection, DEFAULT_PAGE_SIZE};
pub use domain::{
    record_key_of, CreatedRecord, Did, DomainError, LessonRecord, NewLesson, RecordUri, Session,
    SessionCredentials, StoredLesson, LESSON_COLLECTION,
};
pub use error::LessonError;
pub use metadata::{AuthorizationConfig, ClientMetadata, MetadataError, DEFAULT_SCOPE};
pub use ports::{
    AuthorizationClient, ListedRecord, PortError, PortResult, RecordRef, RepositoryApi,
    SessionPersistence,
};
pub use session::{MemorySessionPersistence, SessionStore, SESSION_STORAGE_KEY};
