//! Friend requests and symmetric friendships.
//!
//! Only pending requests are stored. Accepting or rejecting a request removes it; accepting
//! also records the friendship, once, for both users.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::{CollectionRegistry, DocCollection, Filter, Order, Stored};
use crate::errors::{AppError, ConceptError};

pub const FRIEND_COLLECTION: &str = "friends";
pub const FRIEND_REQUEST_COLLECTION: &str = "friend_requests";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendshipDoc {
    pub user1: String,
    pub user2: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestDoc {
    pub from: String,
    pub to: String,
}

pub type FriendRequest = Stored<FriendRequestDoc>;

pub struct Friending {
    friends: DocCollection<FriendshipDoc>,
    requests: DocCollection<FriendRequestDoc>,
}

impl Friending {
    pub async fn new(registry: &CollectionRegistry, pool: SqlitePool) -> Result<Self, AppError> {
        Ok(Self {
            friends: DocCollection::new(registry, pool.clone(), FRIEND_COLLECTION).await?,
            requests: DocCollection::new(registry, pool, FRIEND_REQUEST_COLLECTION).await?,
        })
    }

    /// Pending requests sent or received by `user`.
    pub async fn get_requests(&self, user: &str) -> Result<Vec<FriendRequest>, AppError> {
        let filter = Filter::eq("from", user).or(Filter::eq("to", user));
        self.requests.read_many(&filter, Order::NewestFirst).await
    }

    pub async fn send_request(&self, from: &str, to: &str) -> Result<FriendRequest, AppError> {
        if from == to {
            return Err(
                ConceptError::not_allowed("You cannot send a friend request to yourself!").into(),
            );
        }
        if self.are_friends(from, to).await? {
            return Err(already_friends(from, to).into());
        }

        let doc = FriendRequestDoc {
            from: from.to_string(),
            to: to.to_string(),
        };
        let id = self
            .requests
            .create_one_unless(&doc, &either_direction(from, to))
            .await?
            .ok_or_else(|| {
                ConceptError::not_allowed("Friend request between {0} and {1} already exists!")
                    .user_arg(from)
                    .user_arg(to)
            })?;

        self.requests
            .read_one(&Filter::id(&id))
            .await?
            .ok_or_else(|| AppError::Internal(format!("Friend request {} vanished", id)))
    }

    /// Withdraw a pending request the sender made.
    pub async fn remove_request(&self, from: &str, to: &str) -> Result<(), AppError> {
        self.take_request(from, to).await?;
        Ok(())
    }

    pub async fn accept_request(&self, from: &str, to: &str) -> Result<(), AppError> {
        self.take_request(from, to).await?;
        self.add_friend(from, to).await
    }

    pub async fn reject_request(&self, from: &str, to: &str) -> Result<(), AppError> {
        self.take_request(from, to).await?;
        Ok(())
    }

    pub async fn remove_friend(&self, user: &str, friend: &str) -> Result<(), AppError> {
        let removed = self.friends.delete_one(&pair(user, friend)).await?;
        if removed == 0 {
            return Err(ConceptError::not_found("{0} and {1} are not friends!")
                .user_arg(user)
                .user_arg(friend)
                .into());
        }
        Ok(())
    }

    /// Ids of everyone `user` is friends with.
    pub async fn get_friends(&self, user: &str) -> Result<Vec<String>, AppError> {
        let filter = Filter::eq("user1", user).or(Filter::eq("user2", user));
        let friendships = self.friends.read_many(&filter, Order::Inserted).await?;

        Ok(friendships
            .into_iter()
            .map(|f| {
                if f.fields.user1 == user {
                    f.fields.user2
                } else {
                    f.fields.user1
                }
            })
            .collect())
    }

    pub async fn are_friends(&self, a: &str, b: &str) -> Result<bool, AppError> {
        Ok(self.friends.count(&pair(a, b)).await? > 0)
    }

    async fn add_friend(&self, a: &str, b: &str) -> Result<(), AppError> {
        let doc = FriendshipDoc {
            user1: a.to_string(),
            user2: b.to_string(),
        };
        self.friends
            .create_one_unless(&doc, &pair(a, b))
            .await?
            .ok_or_else(|| already_friends(a, b))?;
        tracing::info!("{} and {} are now friends", a, b);
        Ok(())
    }

    /// Remove the pending request `from` → `to`, failing if there is none.
    async fn take_request(&self, from: &str, to: &str) -> Result<FriendRequest, AppError> {
        let filter = Filter::eq("from", from).and(Filter::eq("to", to));
        self.requests.pop_one(&filter).await?.ok_or_else(|| {
            ConceptError::not_found("Friend request from {0} to {1} does not exist!")
                .user_arg(from)
                .user_arg(to)
                .into()
        })
    }
}

fn already_friends(a: &str, b: &str) -> ConceptError {
    ConceptError::not_allowed("{0} and {1} are already friends!")
        .user_arg(a)
        .user_arg(b)
}

fn pair(a: &str, b: &str) -> Filter {
    Filter::eq("user1", a)
        .and(Filter::eq("user2", b))
        .or(Filter::eq("user1", b).and(Filter::eq("user2", a)))
}

fn either_direction(a: &str, b: &str) -> Filter {
    Filter::eq("from", a)
        .and(Filter::eq("to", b))
        .or(Filter::eq("from", b).and(Filter::eq("to", a)))
}
