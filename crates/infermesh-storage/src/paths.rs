//! Canonical storage paths.
//!
//! Addresses are rendered as lowercase `0x` hex so every party derives
//! identical paths.

use infermesh_crypto::Address;

pub fn checkpoint_dir(host: &Address, session_id: u64) -> String {
    format!("checkpoints/{}/{}", host.to_lowercase_hex(), session_id)
}

/// `checkpoints/{host}/{sessionId}/index`
pub fn checkpoint_index(host: &Address, session_id: u64) -> String {
    format!("{}/index", checkpoint_dir(host, session_id))
}

/// `checkpoints/{host}/{sessionId}/delta-{index}`
pub fn checkpoint_delta(host: &Address, session_id: u64, index: u64) -> String {
    format!("{}/delta-{}", checkpoint_dir(host, session_id), index)
}

/// `session-groups/{user}/{groupId}.json`
pub fn session_group(user: &Address, group_id: &str) -> String {
    format!("session-groups/{}/{}.json", user.to_lowercase_hex(), group_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_stable() {
        let host = Address::new([0xab; 20]);
        let hex = format!("0x{}", "ab".repeat(20));
        assert_eq!(checkpoint_index(&host, 7), format!("checkpoints/{hex}/7/index"));
        assert_eq!(checkpoint_delta(&host, 7, 2), format!("checkpoints/{hex}/7/delta-2"));
        assert_eq!(session_group(&host, "work"), format!("session-groups/{hex}/work.json"));
    }

    #[test]
    fn test_delta_paths_share_index_prefix() {
        let host = Address::new([0x01; 20]);
        let dir = checkpoint_dir(&host, 3);
        assert!(checkpoint_delta(&host, 3, 0).starts_with(&dir));
        assert!(checkpoint_index(&host, 3).starts_with(&dir));
    }
}
