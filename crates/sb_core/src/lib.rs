pub mod db;
pub mod domain;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod quiz;
pub mod repo;
pub mod workspace;
