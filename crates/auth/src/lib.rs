//! Token lifecycle and ACL permission checks for the hub.

pub mod ip;
pub mod permissions;
pub mod token;

pub use {
    ip::ip_allowed,
    permissions::{AclChecker, ops, role_allows},
    token::{TOKEN_HEX_LEN, TokenManager, TokenOptions, TokenValidation, sha256_hex},
};
