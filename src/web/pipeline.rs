//! Per-request authorization pipeline.
//!
//! Every forum route runs the same stages before its handler:
//!
//! 1. resolve the session user (absent or expired sessions mean anonymous),
//! 2. resolve the entities named in the path (`{topic}`, `{tag}`,
//!    `{post_id}`), failing with 404 when one does not exist or is a
//!    hidden post the user may not see,
//! 3. run a capability gate, failing with 403.
//!
//! Handlers ask for the stages they need through the [`Scoped`] and
//! [`Guarded`] extractors. The scope type decides which path entities are
//! resolved and the capability type decides which gate runs, so a gate that
//! needs a post can only be attached to a scope that carries one.

use std::collections::HashMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts, Path};
use axum::http::request::Parts;

use crate::auth::{cookie_value, resolve_session, SESSION_COOKIE};
use crate::db::{
    Database, Filter, Post, PostColumn, Tag, TagColumn, Topic, TopicColumn, User,
};
use crate::error::{ForumError, Result};

/// Session user, if any. Never rejects for a missing or stale session.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
    Database: FromRef<S>,
{
    type Rejection = ForumError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = cookie_value(&parts.headers, SESSION_COOKIE) else {
            return Ok(Self(None));
        };
        let db = Database::from_ref(state);
        Ok(Self(resolve_session(&db, token).await?))
    }
}

// ========== Path entities ==========

/// The set of path entities a route resolves.
#[async_trait]
pub trait Scope: Sized + Send {
    async fn resolve(parts: &mut Parts, db: &Database, user: Option<&User>) -> Result<Self>;
}

/// Routes without path entities.
#[async_trait]
impl Scope for () {
    async fn resolve(_parts: &mut Parts, _db: &Database, _user: Option<&User>) -> Result<Self> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct TopicScope {
    pub topic: Topic,
}

#[derive(Debug, Clone)]
pub struct TagScope {
    pub topic: Topic,
    pub tag: Tag,
}

#[derive(Debug, Clone)]
pub struct PostScope {
    pub topic: Topic,
    pub post: Post,
}

#[async_trait]
impl Scope for TopicScope {
    async fn resolve(parts: &mut Parts, db: &Database, _user: Option<&User>) -> Result<Self> {
        let params = path_params(parts).await?;
        let topic = resolve_topic(db, param(&params, "topic")?).await?;
        Ok(Self { topic })
    }
}

#[async_trait]
impl Scope for TagScope {
    async fn resolve(parts: &mut Parts, db: &Database, _user: Option<&User>) -> Result<Self> {
        let params = path_params(parts).await?;
        let topic = resolve_topic(db, param(&params, "topic")?).await?;
        let tag = resolve_tag(db, &topic, param(&params, "tag")?).await?;
        Ok(Self { topic, tag })
    }
}

#[async_trait]
impl Scope for PostScope {
    async fn resolve(parts: &mut Parts, db: &Database, user: Option<&User>) -> Result<Self> {
        let params = path_params(parts).await?;
        // A malformed id is rejected before touching the store.
        let post_id = parse_post_id(param(&params, "post_id")?)?;
        let topic = resolve_topic(db, param(&params, "topic")?).await?;
        let post = resolve_post(db, &topic, post_id).await?;
        ensure_visible(&post, user)?;
        Ok(Self { topic, post })
    }
}

async fn path_params(parts: &mut Parts) -> Result<HashMap<String, String>> {
    let Path(params) = Path::<HashMap<String, String>>::from_request_parts(parts, &())
        .await
        .map_err(|e| ForumError::BadRequest(e.body_text()))?;
    Ok(params)
}

fn param<'p>(params: &'p HashMap<String, String>, name: &str) -> Result<&'p str> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| ForumError::Internal(anyhow::anyhow!("route has no `{name}` parameter")))
}

/// Parse the `{post_id}` path segment.
pub fn parse_post_id(raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| ForumError::BadRequest(format!("invalid post id: {raw}")))
}

/// Look a topic up by its (case-insensitive) name.
pub async fn resolve_topic(db: &Database, name: &str) -> Result<Topic> {
    db.topics()
        .find_one(None, &[Filter::eq(TopicColumn::Name, name.to_lowercase())])
        .await
}

/// Look a tag up by name within `topic`.
pub async fn resolve_tag(db: &Database, topic: &Topic, name: &str) -> Result<Tag> {
    db.tags()
        .find_one(
            None,
            &[
                Filter::eq(TagColumn::Name, name.to_lowercase()),
                Filter::eq(TagColumn::TopicId, topic.id),
            ],
        )
        .await
}

/// Look a post up by id within `topic`; a post from another topic is
/// reported as missing.
pub async fn resolve_post(db: &Database, topic: &Topic, post_id: i64) -> Result<Post> {
    db.posts()
        .find_one(
            None,
            &[
                Filter::eq(PostColumn::Id, post_id),
                Filter::eq(PostColumn::TopicId, topic.id),
            ],
        )
        .await
}

/// A hidden post exists only for admins and its creator.
pub fn ensure_visible(post: &Post, user: Option<&User>) -> Result<()> {
    if post.is_visible {
        return Ok(());
    }
    must_be_admin_or_post_creator(user, post)
        .map(|_| ())
        .map_err(|_| ForumError::NotFound)
}

// ========== Capability gates ==========

pub fn must_be_logged_in(user: Option<&User>) -> Result<&User> {
    user.ok_or(ForumError::Forbidden)
}

pub fn must_be_admin(user: Option<&User>) -> Result<&User> {
    match user {
        Some(user) if user.is_admin => Ok(user),
        _ => Err(ForumError::Forbidden),
    }
}

/// Admins, or the user who created `post`.
pub fn must_be_admin_or_post_creator<'u>(
    user: Option<&'u User>,
    post: &Post,
) -> Result<&'u User> {
    match user {
        Some(user) if user.is_admin || user.id == post.creator.id => Ok(user),
        _ => Err(ForumError::Forbidden),
    }
}

/// A gate applicable to scope `S`. Every capability implies a logged-in
/// user.
pub trait Capability<S> {
    fn check(user: Option<&User>, scope: &S) -> Result<()>;
}

pub struct LoggedIn;

pub struct Admin;

pub struct AdminOrPostCreator;

impl<S> Capability<S> for LoggedIn {
    fn check(user: Option<&User>, _scope: &S) -> Result<()> {
        must_be_logged_in(user).map(|_| ())
    }
}

impl<S> Capability<S> for Admin {
    fn check(user: Option<&User>, _scope: &S) -> Result<()> {
        must_be_admin(user).map(|_| ())
    }
}

impl Capability<PostScope> for AdminOrPostCreator {
    fn check(user: Option<&User>, scope: &PostScope) -> Result<()> {
        must_be_admin_or_post_creator(user, &scope.post).map(|_| ())
    }
}

// ========== Extractors ==========

/// Session user plus resolved path entities, no gate.
#[derive(Debug, Clone)]
pub struct Scoped<S> {
    pub user: Option<User>,
    pub scope: S,
}

#[async_trait]
impl<St, S> FromRequestParts<St> for Scoped<S>
where
    St: Send + Sync,
    Database: FromRef<St>,
    S: Scope + 'static,
{
    type Rejection = ForumError;

    async fn from_request_parts(parts: &mut Parts, state: &St) -> Result<Self, Self::Rejection> {
        let MaybeUser(user) = MaybeUser::from_request_parts(parts, state).await?;
        let db = Database::from_ref(state);
        let scope = S::resolve(parts, &db, user.as_ref()).await?;
        Ok(Self { user, scope })
    }
}

/// Session user, resolved path entities, and a passed capability gate `C`.
pub struct Guarded<S, C> {
    pub user: User,
    pub scope: S,
    _capability: PhantomData<fn() -> C>,
}

#[async_trait]
impl<St, S, C> FromRequestParts<St> for Guarded<S, C>
where
    St: Send + Sync,
    Database: FromRef<St>,
    S: Scope + 'static,
    C: Capability<S> + 'static,
{
    type Rejection = ForumError;

    async fn from_request_parts(parts: &mut Parts, state: &St) -> Result<Self, Self::Rejection> {
        let Scoped { user, scope } = Scoped::<S>::from_request_parts(parts, state).await?;
        C::check(user.as_ref(), &scope)?;
        let user = user.ok_or(ForumError::Forbidden)?;
        Ok(Self {
            user,
            scope,
            _capability: PhantomData,
        })
    }
}
