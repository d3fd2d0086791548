use std::collections::HashSet;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::pipeline::{
    Admin, AdminOrPostCreator, Guarded, LoggedIn, MaybeUser, PostScope, Scoped, TagScope,
    TopicScope,
};
use super::AppState;
use crate::db::{
    Filter, Post, PostColumn, Tag, TagColumn, Topic, User, UserColumn, VoteColumn,
};
use crate::error::{ForumError, Result};

/// Create the router with all forum routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(health))
        .route("/topics/new", post(create_topic))
        .route("/topics/:topic", get(topic_page))
        .route("/topics/:topic/new", get(new_post_page).post(create_post))
        .route("/topics/:topic/tags", get(tags_page))
        .route("/topics/:topic/tags/new", post(create_tag))
        .route("/topics/:topic/tags/:tag", get(tag_page))
        .route("/topics/:topic/posts/:post_id", get(post_page))
        .route(
            "/topics/:topic/posts/:post_id/vote",
            post(add_vote).delete(remove_vote),
        )
        .route(
            "/topics/:topic/posts/:post_id/hide",
            post(hide_post).delete(unhide_post),
        )
        .route(
            "/topics/:topic/posts/:post_id/pin",
            post(pin_post).delete(unpin_post),
        )
        .route("/users/:email", get(user_page))
}

// ========== Render data ==========

#[derive(Debug, Serialize)]
pub struct TopicView {
    #[serde(flatten)]
    pub topic: Topic,
    pub url: String,
    pub tags_url: String,
    pub new_post_url: String,
}

impl From<Topic> for TopicView {
    fn from(topic: Topic) -> Self {
        Self {
            url: topic.url(),
            tags_url: topic.tags_url(),
            new_post_url: topic.new_post_url(),
            topic,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TagView {
    pub id: i64,
    pub name: String,
    pub url: String,
}

impl From<Tag> for TagView {
    fn from(tag: Tag) -> Self {
        Self {
            url: tag.url(),
            id: tag.id,
            name: tag.name,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    pub url: String,
    /// Sanitized HTML rendering of the markdown content.
    pub html: String,
    /// Whether the viewer has voted for this post.
    pub voted: bool,
}

impl PostView {
    fn new(post: Post, voted_ids: &HashSet<i64>) -> Self {
        Self {
            url: post.url(),
            html: post.sanitized_content(),
            voted: voted_ids.contains(&post.id),
            post,
        }
    }

    fn list(posts: Vec<Post>, voted_ids: &HashSet<i64>) -> Vec<Self> {
        posts.into_iter().map(|p| Self::new(p, voted_ids)).collect()
    }
}

#[derive(Debug, Serialize)]
pub struct IndexPage {
    pub user: Option<User>,
    pub topics: Vec<TopicView>,
}

#[derive(Debug, Serialize)]
pub struct TopicPage {
    pub user: Option<User>,
    pub topic: TopicView,
    pub tags: Vec<TagView>,
    pub pinned_posts: Vec<PostView>,
    pub unpinned_posts: Vec<PostView>,
}

#[derive(Debug, Serialize)]
pub struct TagsPage {
    pub user: Option<User>,
    pub topic: TopicView,
    pub tags: Vec<TagView>,
}

#[derive(Debug, Serialize)]
pub struct TagPage {
    pub user: Option<User>,
    pub topic: TopicView,
    pub tag: TagView,
    pub posts: Vec<PostView>,
}

#[derive(Debug, Serialize)]
pub struct PostPage {
    pub user: Option<User>,
    pub topic: TopicView,
    pub post: PostView,
    /// Other posts carrying the same tag.
    pub related_posts: Vec<PostView>,
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub user: Option<User>,
    pub profile: User,
    pub posts: Vec<PostView>,
}

// ========== Forms ==========

#[derive(Debug, Deserialize)]
pub struct NewTopicForm {
    name: String,
    title: String,
    description: String,
}

#[derive(Debug, Deserialize)]
pub struct NewTagForm {
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct NewPostForm {
    title: String,
    text: String,
    /// Id of a tag in the same topic; empty for none.
    #[serde(default)]
    tag: String,
}

// ========== Helpers ==========

/// Ids of the posts `user` has voted for; empty for anonymous viewers.
async fn voted_ids(state: &AppState, user: Option<&User>) -> Result<HashSet<i64>> {
    match user {
        Some(user) => {
            state
                .db
                .posts()
                .get_voted_post_ids(None, &[Filter::eq(VoteColumn::UserId, user.id)])
                .await
        }
        None => Ok(HashSet::new()),
    }
}

/// Hidden posts are only listed for admins.
fn listing_filters(
    user: Option<&User>,
    mut filters: Vec<Filter<PostColumn>>,
) -> Vec<Filter<PostColumn>> {
    if !user.is_some_and(|u| u.is_admin) {
        filters.push(Filter::eq(PostColumn::IsVisible, true));
    }
    filters
}

async fn topic_tags(state: &AppState, topic: &Topic) -> Result<Vec<TagView>> {
    let tags = state
        .db
        .tags()
        .find(None, &[Filter::eq(TagColumn::TopicId, topic.id)])
        .await?;
    Ok(tags.into_iter().map(TagView::from).collect())
}

// ========== Handlers ==========

async fn health() -> &'static str {
    "ok"
}

async fn index(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
) -> Result<Json<IndexPage>> {
    let topics = state.db.topics().find(None, &[]).await?;
    Ok(Json(IndexPage {
        user,
        topics: topics.into_iter().map(TopicView::from).collect(),
    }))
}

async fn create_topic(
    State(state): State<AppState>,
    guard: Guarded<(), Admin>,
    Form(form): Form<NewTopicForm>,
) -> Result<Redirect> {
    let topic = state
        .db
        .topics()
        .add(None, &form.name, &form.title, &form.description)
        .await?;
    info!(admin_id = guard.user.id, topic = %topic.name, "Topic created via web");
    Ok(Redirect::to(&topic.url()))
}

async fn topic_page(
    State(state): State<AppState>,
    Scoped { user, scope }: Scoped<TopicScope>,
) -> Result<Json<TopicPage>> {
    let topic = scope.topic;
    let posts = state.db.posts();

    let pinned = posts
        .find(
            None,
            &listing_filters(
                user.as_ref(),
                vec![
                    Filter::eq(PostColumn::TopicId, topic.id),
                    Filter::eq(PostColumn::IsPinned, true),
                ],
            ),
        )
        .await?;
    let unpinned = posts
        .find(
            None,
            &listing_filters(
                user.as_ref(),
                vec![
                    Filter::eq(PostColumn::TopicId, topic.id),
                    Filter::eq(PostColumn::IsPinned, false),
                ],
            ),
        )
        .await?;
    let tags = topic_tags(&state, &topic).await?;
    let voted = voted_ids(&state, user.as_ref()).await?;

    Ok(Json(TopicPage {
        user,
        topic: topic.into(),
        tags,
        pinned_posts: PostView::list(pinned, &voted),
        unpinned_posts: PostView::list(unpinned, &voted),
    }))
}

async fn tags_page(
    State(state): State<AppState>,
    Scoped { user, scope }: Scoped<TopicScope>,
) -> Result<Json<TagsPage>> {
    let tags = topic_tags(&state, &scope.topic).await?;
    Ok(Json(TagsPage {
        user,
        topic: scope.topic.into(),
        tags,
    }))
}

async fn create_tag(
    State(state): State<AppState>,
    guard: Guarded<TopicScope, Admin>,
    Form(form): Form<NewTagForm>,
) -> Result<Redirect> {
    let tag = state
        .db
        .tags()
        .add(None, &form.name, &guard.scope.topic)
        .await?;
    Ok(Redirect::to(&tag.url()))
}

async fn tag_page(
    State(state): State<AppState>,
    Scoped { user, scope }: Scoped<TagScope>,
) -> Result<Json<TagPage>> {
    let posts = state
        .db
        .posts()
        .find(
            None,
            &listing_filters(
                user.as_ref(),
                vec![
                    Filter::eq(PostColumn::TopicId, scope.topic.id),
                    Filter::eq(PostColumn::TagId, scope.tag.id),
                ],
            ),
        )
        .await?;
    let voted = voted_ids(&state, user.as_ref()).await?;

    Ok(Json(TagPage {
        user,
        topic: scope.topic.into(),
        tag: scope.tag.into(),
        posts: PostView::list(posts, &voted),
    }))
}

/// Render data for the new-post form: the tags a post may carry.
async fn new_post_page(
    State(state): State<AppState>,
    guard: Guarded<TopicScope, LoggedIn>,
) -> Result<Json<TagsPage>> {
    let tags = topic_tags(&state, &guard.scope.topic).await?;
    Ok(Json(TagsPage {
        user: Some(guard.user),
        topic: guard.scope.topic.into(),
        tags,
    }))
}

/// Create a post and its optional tag in one transaction.
async fn create_post(
    State(state): State<AppState>,
    guard: Guarded<TopicScope, LoggedIn>,
    Form(form): Form<NewPostForm>,
) -> Result<Redirect> {
    let topic = &guard.scope.topic;
    let tag_id = match form.tag.trim() {
        "" => None,
        raw => Some(
            raw.parse::<i64>()
                .map_err(|_| ForumError::BadRequest(format!("invalid tag id: {raw}")))?,
        ),
    };

    let mut tx = state.db.begin().await?;
    let post = state
        .db
        .posts()
        .add(Some(&mut *tx), &form.title, &form.text, topic, &guard.user)
        .await?;

    if let Some(tag_id) = tag_id {
        let tag = state
            .db
            .tags()
            .find_one(
                Some(&mut *tx),
                &[
                    Filter::eq(TagColumn::Id, tag_id),
                    Filter::eq(TagColumn::TopicId, topic.id),
                ],
            )
            .await
            .map_err(|e| match e {
                ForumError::NotFound => {
                    ForumError::InvalidInput("tag does not exist in this topic".to_string())
                }
                other => other,
            })?;
        state
            .db
            .posts()
            .add_post_tag(Some(&mut *tx), &post, &tag)
            .await?;
    }

    tx.commit().await?;
    Ok(Redirect::to(&post.url()))
}

async fn post_page(
    State(state): State<AppState>,
    Scoped { user, scope }: Scoped<PostScope>,
) -> Result<Json<PostPage>> {
    let related = match scope.post.tag_id {
        Some(tag_id) => {
            state
                .db
                .posts()
                .find(
                    None,
                    &listing_filters(
                        user.as_ref(),
                        vec![
                            Filter::eq(PostColumn::TopicId, scope.topic.id),
                            Filter::eq(PostColumn::TagId, tag_id),
                            Filter::ne(PostColumn::Id, scope.post.id),
                        ],
                    ),
                )
                .await?
        }
        None => Vec::new(),
    };
    let voted = voted_ids(&state, user.as_ref()).await?;

    Ok(Json(PostPage {
        user,
        topic: scope.topic.into(),
        post: PostView::new(scope.post, &voted),
        related_posts: PostView::list(related, &voted),
    }))
}

async fn add_vote(
    State(state): State<AppState>,
    guard: Guarded<PostScope, LoggedIn>,
) -> Result<StatusCode> {
    state
        .db
        .votes()
        .add_vote(None, &guard.scope.post, &guard.user)
        .await?;
    Ok(StatusCode::OK)
}

async fn remove_vote(
    State(state): State<AppState>,
    guard: Guarded<PostScope, LoggedIn>,
) -> Result<StatusCode> {
    state
        .db
        .votes()
        .remove_vote(None, &guard.scope.post, &guard.user)
        .await?;
    Ok(StatusCode::OK)
}

async fn hide_post(
    State(state): State<AppState>,
    guard: Guarded<PostScope, AdminOrPostCreator>,
) -> Result<StatusCode> {
    state
        .db
        .posts()
        .update_visibility(None, &guard.scope.post, false)
        .await?;
    Ok(StatusCode::OK)
}

async fn unhide_post(
    State(state): State<AppState>,
    guard: Guarded<PostScope, AdminOrPostCreator>,
) -> Result<StatusCode> {
    state
        .db
        .posts()
        .update_visibility(None, &guard.scope.post, true)
        .await?;
    Ok(StatusCode::OK)
}

async fn pin_post(
    State(state): State<AppState>,
    guard: Guarded<PostScope, Admin>,
) -> Result<StatusCode> {
    state
        .db
        .posts()
        .update_pinned(None, &guard.scope.post, true)
        .await?;
    Ok(StatusCode::OK)
}

async fn unpin_post(
    State(state): State<AppState>,
    guard: Guarded<PostScope, Admin>,
) -> Result<StatusCode> {
    state
        .db
        .posts()
        .update_pinned(None, &guard.scope.post, false)
        .await?;
    Ok(StatusCode::OK)
}

async fn user_page(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(email): Path<String>,
) -> Result<Json<UserPage>> {
    let profile = state
        .db
        .users()
        .find_one(None, &[Filter::eq(UserColumn::Email, email.to_lowercase())])
        .await?;

    let posts = state
        .db
        .posts()
        .find(
            None,
            &listing_filters(
                user.as_ref(),
                vec![Filter::eq(PostColumn::CreatorId, profile.id)],
            ),
        )
        .await?;
    let voted = voted_ids(&state, user.as_ref()).await?;

    Ok(Json(UserPage {
        user,
        profile,
        posts: PostView::list(posts, &voted),
    }))
}
