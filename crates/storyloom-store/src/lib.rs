//! Storyloom Store — `PostgreSQL` persistence for stories and their rounds.

pub mod pg_story_store;
mod rows;
