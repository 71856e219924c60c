pub mod aggregate;
pub mod captions;
pub mod client;
pub mod config;
pub mod creation;
pub mod dates;
pub mod derivatives;
pub mod diffstats;
pub mod error;
pub mod gallery;
pub mod mediaviews;
pub mod stats;
pub mod support;
pub mod walker;
pub mod wiki;

#[cfg(test)]
mod testing;

pub use error::{StatsError, StatsResult};
