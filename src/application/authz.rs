//! Single authorization decision point for mutations.

use crate::domain::entities::{PostRecord, UserRecord};

/// Authenticated user performing an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: i64,
}

impl From<&UserRecord> for Actor {
    fn from(user: &UserRecord) -> Self {
        Self { user_id: user.id }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    EditPost(&'a PostRecord),
    Comment(&'a PostRecord),
    Follow(&'a UserRecord),
    Unfollow(&'a UserRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

impl Access {
    pub fn is_allowed(self) -> bool {
        matches!(self, Access::Allow)
    }
}

pub fn authorize(actor: Actor, action: Action<'_>) -> Access {
    let allowed = match action {
        Action::EditPost(post) => post.is_authored_by(actor.user_id),
        Action::Comment(_) | Action::Unfollow(_) => true,
        Action::Follow(author) => author.id != actor.user_id,
    };
    if allowed { Access::Allow } else { Access::Deny }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::domain::entities::AuthorRef;

    fn user(id: i64) -> UserRecord {
        UserRecord {
            id,
            username: format!("user{id}"),
            email: None,
            password_hash: String::new(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn post_by(author_id: i64) -> PostRecord {
        PostRecord {
            id: 10,
            author: AuthorRef {
                id: author_id,
                username: format!("user{author_id}"),
            },
            group: None,
            text: "text".to_string(),
            image: None,
            pub_date: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn only_author_may_edit() {
        let post = post_by(1);
        assert_eq!(authorize(Actor { user_id: 1 }, Action::EditPost(&post)), Access::Allow);
        assert_eq!(authorize(Actor { user_id: 2 }, Action::EditPost(&post)), Access::Deny);
    }

    #[test]
    fn any_user_may_comment() {
        let post = post_by(1);
        assert!(authorize(Actor { user_id: 2 }, Action::Comment(&post)).is_allowed());
    }

    #[test]
    fn self_follow_is_denied() {
        let me = user(3);
        assert_eq!(authorize(Actor::from(&me), Action::Follow(&me)), Access::Deny);
        assert_eq!(authorize(Actor { user_id: 4 }, Action::Follow(&me)), Access::Allow);
        assert!(authorize(Actor::from(&me), Action::Unfollow(&me)).is_allowed());
    }
}
