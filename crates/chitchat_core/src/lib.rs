pub mod auth;
pub mod cache;
pub mod crypto;
pub mod domain;
pub mod friends;
pub mod maintenance;
pub mod ports;
pub mod presentation;
pub mod routing;
pub mod sanitize;
pub mod session;
pub mod summary;

#[cfg(test)]
mod testing;

pub use auth::{AuthError, AuthOutcome, AuthService};
pub use cache::{MemoryKvStore, UserQueryCache};
pub use domain::{AiFriend, AvatarItem, AvatarUpdate, FriendDraft, Message, NewUser, Roster, User, UserProfile};
pub use friends::{FriendError, FriendService};
pub use ports::{
    DatabaseService, KeyValueStore, OutputSchema, PortError, PortResult, Prompt, ReasoningService,
    SessionEvent, SessionProvider,
};
pub use routing::RoutingPolicy;
pub use session::{SessionOrchestrator, SessionState, SessionSubscription};
pub use summary::{SummaryCache, SummaryGenerator};
