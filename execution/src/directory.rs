//! Identity and membership collaborator.
//!
//! Users, circles, friendships and follows are owned elsewhere; the engine
//! only queries them to authorize actors and scope visibility.

use stake_types::{Bet, Circle, CircleId, Follow, Friendship, Privacy, User, UserId};
use std::collections::{BTreeMap, BTreeSet};

pub trait Directory: Send + Sync {
    fn user(&self, id: &str) -> Option<User>;
    fn circle(&self, id: &str) -> Option<Circle>;

    /// Circles the user is a member of.
    fn circles_of(&self, user: &str) -> BTreeSet<CircleId>;

    /// Friendship is symmetric.
    fn are_friends(&self, a: &str, b: &str) -> bool;
    fn follows(&self, follower: &str, following: &str) -> bool;

    /// Users whose friends-public bets `user` may explore: friends plus followed users.
    fn network_of(&self, user: &str) -> BTreeSet<UserId>;

    fn is_member(&self, circle: &str, user: &str) -> bool {
        self.circle(circle)
            .map(|circle| circle.has_member(user))
            .unwrap_or(false)
    }
}

/// Whether `actor` may see `bet`, not counting participation.
///
/// The host always can. Members of the bet's circle can. Friends-public bets
/// are also visible to the host's friends and followers.
pub fn can_view(directory: &dyn Directory, actor: &str, bet: &Bet) -> bool {
    if bet.is_host(actor) {
        return true;
    }
    if let Some(circle) = &bet.circle_id {
        if directory.is_member(circle, actor) {
            return true;
        }
    }
    match bet.privacy {
        Privacy::FriendsPublic => {
            directory.are_friends(&bet.created_by, actor)
                || directory.follows(actor, &bet.created_by)
        }
        Privacy::CirclePrivate => false,
    }
}

/// Directory built from a fixed snapshot.
#[derive(Clone, Debug, Default)]
pub struct StaticDirectory {
    users: BTreeMap<UserId, User>,
    circles: BTreeMap<CircleId, Circle>,
    friends: BTreeMap<UserId, BTreeSet<UserId>>,
    following: BTreeMap<UserId, BTreeSet<UserId>>,
}

impl StaticDirectory {
    pub fn new(
        users: impl IntoIterator<Item = User>,
        circles: impl IntoIterator<Item = Circle>,
        friendships: impl IntoIterator<Item = Friendship>,
        follows: impl IntoIterator<Item = Follow>,
    ) -> Self {
        let mut directory = Self::default();
        for user in users {
            directory.add_user(user);
        }
        for circle in circles {
            directory.add_circle(circle);
        }
        for friendship in friendships {
            directory.add_friendship(&friendship.user_id, &friendship.friend_id);
        }
        for follow in follows {
            directory.add_follow(&follow.follower_id, &follow.following_id);
        }
        directory
    }

    pub fn add_user(&mut self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    /// Duplicate member ids are collapsed.
    pub fn add_circle(&mut self, mut circle: Circle) {
        let mut seen = BTreeSet::new();
        circle.members.retain(|member| seen.insert(member.clone()));
        self.circles.insert(circle.id.clone(), circle);
    }

    pub fn add_friendship(&mut self, a: &str, b: &str) {
        self.friends
            .entry(a.to_string())
            .or_default()
            .insert(b.to_string());
        self.friends
            .entry(b.to_string())
            .or_default()
            .insert(a.to_string());
    }

    pub fn add_follow(&mut self, follower: &str, following: &str) {
        self.following
            .entry(follower.to_string())
            .or_default()
            .insert(following.to_string());
    }
}

impl Directory for StaticDirectory {
    fn user(&self, id: &str) -> Option<User> {
        self.users.get(id).cloned()
    }

    fn circle(&self, id: &str) -> Option<Circle> {
        self.circles.get(id).cloned()
    }

    fn circles_of(&self, user: &str) -> BTreeSet<CircleId> {
        self.circles
            .values()
            .filter(|circle| circle.has_member(user))
            .map(|circle| circle.id.clone())
            .collect()
    }

    fn are_friends(&self, a: &str, b: &str) -> bool {
        self.friends
            .get(a)
            .map(|friends| friends.contains(b))
            .unwrap_or(false)
    }

    fn follows(&self, follower: &str, following: &str) -> bool {
        self.following
            .get(follower)
            .map(|following_set| following_set.contains(following))
            .unwrap_or(false)
    }

    fn network_of(&self, user: &str) -> BTreeSet<UserId> {
        let mut network = self.friends.get(user).cloned().unwrap_or_default();
        if let Some(following) = self.following.get(user) {
            network.extend(following.iter().cloned());
        }
        network.remove(user);
        network
    }
}
