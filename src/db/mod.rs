pub mod entities;
pub mod list_repo;
