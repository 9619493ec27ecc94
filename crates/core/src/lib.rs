//! DistribuTech core types and utilities

pub mod config;
pub mod error;
pub mod roles;
pub mod types;

pub use config::ClientConfig;
pub use error::{CoreError, CoreResult};
pub use roles::{Capability, Role};
pub use types::{
    Conversation, Credentials, DepartmentRef, Listing, Message, RegistrationRequest, RoleRef,
    TokenPair, UserInfo, UserProfile, UserRef, UserSummary,
};
