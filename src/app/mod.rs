pub mod errors;
pub mod factory;
pub mod service;

pub use errors::AppError;
pub use factory::AppFactory;
pub use service::{Health, MemoryService};

/// Upper bound for `top_k` on recall
pub const MAX_TOP_K: usize = 100;

/// Upper bound for the bulk listing size
pub const MAX_LIST_LIMIT: usize = 1000;
