use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::wire::GlobalPrivacyFlags;
use crate::constants::{
    FLAG_ARCHIVE_AND_MUTE_NEW_NONCONTACT_PEERS, FLAG_HIDE_READ_MARKS, FLAG_KEEP_ARCHIVED_FOLDERS,
    FLAG_KEEP_ARCHIVED_UNMUTED, FLAG_NEW_NONCONTACT_PEERS_REQUIRE_PREMIUM,
};
use crate::session::{EntitlementContext, GatedField};
use crate::sync::SyncedSettings;

/// Which archived chats get unarchived when a new message arrives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnarchiveOnNewMessage {
    /// Keep everything archived
    None,
    /// Unarchive unmuted chats that are not in a folder
    NotInFoldersUnmuted,
    /// Unarchive any unmuted chat
    #[default]
    AnyUnmuted,
}

impl UnarchiveOnNewMessage {
    /// `keep_archived_unmuted` wins over `keep_archived_folders`.
    pub fn from_wire(keep_archived_unmuted: bool, keep_archived_folders: bool) -> Self {
        if keep_archived_unmuted {
            UnarchiveOnNewMessage::None
        } else if keep_archived_folders {
            UnarchiveOnNewMessage::NotInFoldersUnmuted
        } else {
            UnarchiveOnNewMessage::AnyUnmuted
        }
    }

    /// Returns `(keep_archived_unmuted, keep_archived_folders)`.
    pub fn to_wire(self) -> (bool, bool) {
        match self {
            UnarchiveOnNewMessage::None => (true, true),
            UnarchiveOnNewMessage::NotInFoldersUnmuted => (false, true),
            UnarchiveOnNewMessage::AnyUnmuted => (false, false),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnarchiveOnNewMessage::None => "none",
            UnarchiveOnNewMessage::NotInFoldersUnmuted => "not-in-folders",
            UnarchiveOnNewMessage::AnyUnmuted => "any",
        }
    }
}

impl fmt::Display for UnarchiveOnNewMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnarchiveOnNewMessage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(UnarchiveOnNewMessage::None),
            "not-in-folders" | "not-in-folders-unmuted" => {
                Ok(UnarchiveOnNewMessage::NotInFoldersUnmuted)
            }
            "any" | "any-unmuted" => Ok(UnarchiveOnNewMessage::AnyUnmuted),
            other => Err(format!(
                "unknown unarchive policy '{}' (expected none, not-in-folders or any)",
                other
            )),
        }
    }
}

/// Account-wide privacy settings, stored on the server as one flag word.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacySettings {
    pub archive_and_mute: bool,
    pub unarchive_on_new_message: UnarchiveOnNewMessage,
    pub hide_read_time: bool,
    pub new_require_premium: bool,
}

impl SyncedSettings for PrivacySettings {
    type Wire = GlobalPrivacyFlags;

    fn decode(wire: &GlobalPrivacyFlags) -> Self {
        Self {
            archive_and_mute: wire.is_archive_and_mute_new_noncontact_peers(),
            unarchive_on_new_message: UnarchiveOnNewMessage::from_wire(
                wire.is_keep_archived_unmuted(),
                wire.is_keep_archived_folders(),
            ),
            hide_read_time: wire.is_hide_read_marks(),
            new_require_premium: wire.is_new_noncontact_peers_require_premium(),
        }
    }

    fn encode(&self, entitlements: &dyn EntitlementContext) -> GlobalPrivacyFlags {
        let (keep_unmuted, keep_folders) = self.unarchive_on_new_message.to_wire();
        let require_premium = self.new_require_premium
            && entitlements.is_field_permitted(GatedField::NewRequirePremium);

        GlobalPrivacyFlags::default()
            .with(FLAG_ARCHIVE_AND_MUTE_NEW_NONCONTACT_PEERS, self.archive_and_mute)
            .with(FLAG_KEEP_ARCHIVED_UNMUTED, keep_unmuted)
            .with(FLAG_KEEP_ARCHIVED_FOLDERS, keep_folders)
            .with(FLAG_HIDE_READ_MARKS, self.hide_read_time)
            .with(FLAG_NEW_NONCONTACT_PEERS_REQUIRE_PREMIUM, require_premium)
    }

    fn without_gated_fields(&self) -> Self {
        Self {
            new_require_premium: false,
            ..self.clone()
        }
    }
}
