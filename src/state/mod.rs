pub mod actions;
pub mod container;
pub mod identity;
pub mod store;
pub mod types;

pub use container::AppStore;
pub use identity::{share_link, Identity};
pub use store::{FileStore, KvStore, MemoryStore, Persisted};
pub use types::{
    AppState, BucketItem, Category, CoupleId, GiftBox, ItemId, LoveLetter, Milestone, Quiz,
    QuizQuestion, Reason,
};
