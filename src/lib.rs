pub mod account;
pub mod config;
pub mod db;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod rank;
pub mod resolver;
pub mod seed;

pub use account::{AccountId, AccountRecord, Category, ReferenceAccount, TagSet, Taxonomy};
pub use config::Config;
pub use error::{Result, TagspreadError};
pub use graph::{propagate, GraphBuilder, RelationshipGraph};
pub use rank::{rank, CategoryRanking};
pub use resolver::AccountResolver;
pub use seed::seed;
