//! Identities, capabilities and permission resolution.

mod identity;
mod permission;
mod resolver;
mod session;

pub use identity::{Identity, GUEST_USERNAME};
pub use permission::{ObjectType, Permission, PermissionRecord, Permissions};
pub use resolver::{calculate, Resolver};
pub use session::{ProviderTokens, SessionService};
