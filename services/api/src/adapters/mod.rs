pub mod db;
pub mod kv_store;
pub mod reasoning_llm;
pub mod session;

pub use db::DbAdapter;
pub use kv_store::FileKvStore;
pub use reasoning_llm::OpenAiReasoningAdapter;
pub use session::DbSessionProvider;
