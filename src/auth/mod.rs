pub mod grants;
pub mod middleware;
pub mod ownership;
pub mod policy;
pub mod roles;
pub mod validate;
