//! Membership edits over a [`Channel`] value
//!
//! These functions never touch the store. Each returns the updated channel,
//! which the caller persists with [`ChannelStore::update`](crate::store::ChannelStore::update).

use crate::channel::Channel;
use crate::error::{Error, Result};

/// Add `user_id` to the end of the follower list
pub fn follow(channel: &Channel, user_id: i64) -> Result<Channel> {
    if channel.is_owner(user_id) {
        return Err(Error::SelfFollow);
    }
    if channel.is_following(user_id) {
        return Err(Error::AlreadyFollowing);
    }

    let mut updated = channel.clone();
    updated.users.push(user_id);
    Ok(updated)
}

/// Remove `user_id` from the follower list
pub fn unfollow(channel: &Channel, user_id: i64) -> Result<Channel> {
    if channel.is_owner(user_id) {
        return Err(Error::SelfFollow);
    }
    without_user(channel, user_id)
}

/// Remove `target_id` from the follower list on behalf of `actor_id`, who must own the channel
pub fn kick(channel: &Channel, actor_id: i64, target_id: i64) -> Result<Channel> {
    if !channel.is_owner(actor_id) {
        return Err(Error::NotOwner);
    }
    without_user(channel, target_id)
}

fn without_user(channel: &Channel, user_id: i64) -> Result<Channel> {
    if !channel.is_following(user_id) {
        return Err(Error::NotFollowing);
    }

    let users = channel
        .users
        .iter()
        .copied()
        .filter(|&id| id != user_id)
        .collect();

    Ok(Channel {
        users,
        ..channel.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: i64 = 100;

    fn channel(users: &[i64]) -> Channel {
        Channel {
            id: "news".to_string(),
            token: "secrettokenx".to_string(),
            owner: OWNER,
            owner_name: "owner".to_string(),
            users: users.to_vec(),
        }
    }

    #[test]
    fn test_follow_appends_in_order() {
        let ch = follow(&channel(&[1, 2]), 3).unwrap();
        assert_eq!(ch.users, vec![1, 2, 3]);
    }

    #[test]
    fn test_follow_does_not_mutate_input() {
        let original = channel(&[1]);
        let _ = follow(&original, 2).unwrap();
        assert_eq!(original.users, vec![1]);
    }

    #[test]
    fn test_follow_rejects_owner() {
        assert!(matches!(follow(&channel(&[]), OWNER), Err(Error::SelfFollow)));
    }

    #[test]
    fn test_follow_rejects_duplicate() {
        assert!(matches!(follow(&channel(&[5]), 5), Err(Error::AlreadyFollowing)));
    }

    #[test]
    fn test_unfollow_preserves_order() {
        let ch = unfollow(&channel(&[1, 2, 3, 4]), 2).unwrap();
        assert_eq!(ch.users, vec![1, 3, 4]);
    }

    #[test]
    fn test_unfollow_rejects_owner() {
        assert!(matches!(unfollow(&channel(&[1]), OWNER), Err(Error::SelfFollow)));
    }

    #[test]
    fn test_unfollow_not_following() {
        assert!(matches!(unfollow(&channel(&[1]), 9), Err(Error::NotFollowing)));
    }

    #[test]
    fn test_follow_then_unfollow_round_trip() {
        for users in [vec![], vec![1], vec![3, 1, 2], vec![9, 8, 7, 6]] {
            let before = channel(&users);
            let after = unfollow(&follow(&before, 55).unwrap(), 55).unwrap();
            assert_eq!(after, before);
        }
    }

    #[test]
    fn test_kick_by_owner() {
        let ch = kick(&channel(&[1, 2, 3]), OWNER, 3).unwrap();
        assert_eq!(ch.users, vec![1, 2]);
    }

    #[test]
    fn test_kick_by_non_owner_leaves_users() {
        let before = channel(&[1, 2]);
        assert!(matches!(kick(&before, 1, 2), Err(Error::NotOwner)));
        assert_eq!(before.users, vec![1, 2]);
    }

    #[test]
    fn test_kick_missing_target() {
        assert!(matches!(kick(&channel(&[1]), OWNER, 2), Err(Error::NotFollowing)));
    }

    #[test]
    fn test_kick_owner_is_not_following() {
        assert!(matches!(kick(&channel(&[1]), OWNER, OWNER), Err(Error::NotFollowing)));
    }

    #[test]
    fn test_owner_never_becomes_follower() {
        // Walk a fixed sequence of edits, including attempts to add the owner.
        let mut ch = channel(&[]);
        let ops: [(&str, i64); 9] = [
            ("follow", 1),
            ("follow", OWNER),
            ("follow", 2),
            ("kick", 1),
            ("follow", 1),
            ("follow", OWNER),
            ("kick", OWNER),
            ("follow", 3),
            ("kick", 2),
        ];
        for (op, id) in ops {
            let next = match op {
                "follow" => follow(&ch, id),
                _ => kick(&ch, OWNER, id),
            };
            if let Ok(next) = next {
                ch = next;
            }
            assert!(!ch.users.contains(&OWNER));
            let mut dedup = ch.users.clone();
            dedup.sort_unstable();
            dedup.dedup();
            assert_eq!(dedup.len(), ch.users.len());
        }
        assert_eq!(ch.users, vec![1, 3]);
    }
}
