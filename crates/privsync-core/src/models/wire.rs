use serde::{Deserialize, Serialize};

use crate::constants::{
    FLAG_ARCHIVE_AND_MUTE_NEW_NONCONTACT_PEERS, FLAG_HIDE_READ_MARKS, FLAG_KEEP_ARCHIVED_FOLDERS,
    FLAG_KEEP_ARCHIVED_UNMUTED, FLAG_NEW_NONCONTACT_PEERS_REQUIRE_PREMIUM,
};

/// Wire form of the global privacy settings: a single flag word.
///
/// The server omits flags that are not set, so every accessor treats an
/// absent bit as `false`. Bits this client does not know about are carried
/// through untouched and otherwise ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlobalPrivacyFlags {
    #[serde(default)]
    pub flags: u32,
}

impl GlobalPrivacyFlags {
    pub fn from_bits(flags: u32) -> Self {
        Self { flags }
    }

    pub fn bits(&self) -> u32 {
        self.flags
    }

    pub fn has(&self, bit: u32) -> bool {
        self.flags & bit != 0
    }

    pub fn with(mut self, bit: u32, enabled: bool) -> Self {
        if enabled {
            self.flags |= bit;
        } else {
            self.flags &= !bit;
        }
        self
    }

    pub fn is_archive_and_mute_new_noncontact_peers(&self) -> bool {
        self.has(FLAG_ARCHIVE_AND_MUTE_NEW_NONCONTACT_PEERS)
    }

    pub fn is_keep_archived_unmuted(&self) -> bool {
        self.has(FLAG_KEEP_ARCHIVED_UNMUTED)
    }

    pub fn is_keep_archived_folders(&self) -> bool {
        self.has(FLAG_KEEP_ARCHIVED_FOLDERS)
    }

    pub fn is_hide_read_marks(&self) -> bool {
        self.has(FLAG_HIDE_READ_MARKS)
    }

    pub fn is_new_noncontact_peers_require_premium(&self) -> bool {
        self.has(FLAG_NEW_NONCONTACT_PEERS_REQUIRE_PREMIUM)
    }
}
