//! MembershipMirror port - where the room registry sends local mutations
//! for propagation to peer nodes.

use crate::domain::room::MembershipMutation;

/// Receives local membership mutations after they are applied.
///
/// Mirroring is fire-and-forget: implementations must not block and the
/// registry never waits for cluster-wide convergence.
pub trait MembershipMirror: Send + Sync {
    fn mirror(&self, mutation: MembershipMutation);
}
