use nix::unistd::setegid;
use nix::unistd::seteuid;
use nix::unistd::User;
use tracing::error;
use tracing::info;
use tracing::warn;

/// Re-sets the effective identity after handler hooks.
///
/// Hooks may escalate to perform privileged work; the runtime guarantees
/// the process is back at the configured unprivileged identity after every
/// hook returns, success or not. Inactive when the process did not start
/// elevated or no target account is configured.
#[derive(Debug, Clone, Default)]
pub struct PrivilegeGuard {
    target: Option<(nix::unistd::Uid, nix::unistd::Gid)>,
}

impl PrivilegeGuard {
    pub fn new(drop_to: Option<&str>) -> Self {
        let Some(account) = drop_to else {
            return Self::default();
        };

        if !nix::unistd::geteuid().is_root() {
            info!("not running elevated, privilege guard inactive");
            return Self::default();
        }

        match User::from_name(account) {
            Ok(Some(user)) => {
                info!(account, uid = %user.uid, "privilege guard active");
                Self {
                    target: Some((user.uid, user.gid)),
                }
            }
            Ok(None) => {
                warn!(account, "unknown account, privilege guard inactive");
                Self::default()
            }
            Err(e) => {
                warn!(account, %e, "account lookup failed, privilege guard inactive");
                Self::default()
            }
        }
    }

    /// Invoked after every hook return.
    pub fn drop_after_hook(&self) {
        let Some((uid, gid)) = self.target else {
            return;
        };

        if let Err(e) = setegid(gid) {
            error!(%gid, %e, "failed to reset effective gid");
        }
        if let Err(e) = seteuid(uid) {
            error!(%uid, %e, "failed to reset effective uid");
        }
    }
}
