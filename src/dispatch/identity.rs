//! Acting identity and authorization seams.

use crate::config::SystemIdentityConfig;
use crate::models::{Identity, Task};
use crate::state_machine::TaskAction;
use std::fmt::Debug;

/// Supplies the identity tickets are executed as when the caller did not bring one
pub trait IdentityProvider: Send + Sync + Debug {
    fn current_acting_identity(&self) -> Identity;
}

/// Fixed, configured identity used for channel tickets
#[derive(Debug, Clone)]
pub struct SystemIdentityProvider {
    identity: Identity,
}

impl SystemIdentityProvider {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn from_config(config: &SystemIdentityConfig) -> Self {
        Self::new(config.to_identity())
    }
}

impl Default for SystemIdentityProvider {
    fn default() -> Self {
        Self::from_config(&SystemIdentityConfig::default())
    }
}

impl IdentityProvider for SystemIdentityProvider {
    fn current_acting_identity(&self) -> Identity {
        self.identity.clone()
    }
}

/// Decides whether an identity may run an action on a task
pub trait Authorizer: Send + Sync + Debug {
    fn authorize(&self, identity: &Identity, task: &Task, action: TaskAction) -> bool;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _identity: &Identity, _task: &Task, _action: TaskAction) -> bool {
        true
    }
}

/// Permits an identity that belongs to one of the task's user groups; tasks without groups
/// are open to everyone
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupAuthorizer;

impl Authorizer for GroupAuthorizer {
    fn authorize(&self, identity: &Identity, task: &Task, _action: TaskAction) -> bool {
        task.user_groups.is_empty() || task.user_groups.iter().any(|g| identity.is_member_of(g))
    }
}
