//! Room module - vocabulary for room membership mutations.
//!
//! Rooms themselves exist only as entries in a node's registry. The types
//! here describe mutations that may cross nodes.

use serde::{Deserialize, Serialize};

/// Where a registry mutation came from.
///
/// Local mutations are applied and mirrored to the cluster. Replays of
/// remote cluster messages are applied but never mirrored again, which is
/// what stops a mutation from bouncing between nodes forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOrigin {
    Local,
    RemoteReplay,
}

impl MutationOrigin {
    pub fn should_mirror(self) -> bool {
        matches!(self, MutationOrigin::Local)
    }
}

/// Flags for [`MembershipMutation::LeaveAll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveAllOptions {
    /// Also leave each member's self-named room.
    #[serde(default)]
    pub include_socket_rooms: bool,
    /// Also leave the source room itself.
    #[serde(default)]
    pub include_source_room: bool,
}

/// A membership mutation expressed in terms of a source room's members.
///
/// These are the only registry mutations that are mirrored across the
/// cluster: each node applies them to its own local members of
/// `source_room`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipMutation {
    /// Add every member of `source_room` to each of `dest_rooms`.
    AddMembers {
        source_room: String,
        dest_rooms: Vec<String>,
    },
    /// Remove every member of `source_room` from each of `dest_rooms`.
    RemoveMembers {
        source_room: String,
        dest_rooms: Vec<String>,
    },
    /// Remove every member of `source_room` from all of its rooms.
    LeaveAll {
        source_room: String,
        options: LeaveAllOptions,
    },
}

impl MembershipMutation {
    pub fn source_room(&self) -> &str {
        match self {
            MembershipMutation::AddMembers { source_room, .. }
            | MembershipMutation::RemoveMembers { source_room, .. }
            | MembershipMutation::LeaveAll { source_room, .. } => source_room,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_local_mutations_are_mirrored() {
        assert!(MutationOrigin::Local.should_mirror());
        assert!(!MutationOrigin::RemoteReplay.should_mirror());
    }

    #[test]
    fn leave_all_options_default_to_false() {
        let opts: LeaveAllOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(opts, LeaveAllOptions::default());
    }

    #[test]
    fn leave_all_options_use_camel_case() {
        let opts = LeaveAllOptions {
            include_socket_rooms: true,
            include_source_room: false,
        };
        let value = serde_json::to_value(opts).unwrap();
        assert_eq!(value["includeSocketRooms"], true);
        assert_eq!(value["includeSourceRoom"], false);
    }

    #[test]
    fn source_room_is_exposed_for_every_variant() {
        let m = MembershipMutation::LeaveAll {
            source_room: "team-7".to_string(),
            options: LeaveAllOptions::default(),
        };
        assert_eq!(m.source_room(), "team-7");
    }
}
