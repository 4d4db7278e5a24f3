pub mod client;
pub mod draft;
pub mod files;
pub mod gid;
