use chrono::Datelike;
use std::collections::BTreeMap;

use crate::{
    db::Db,
    error::{AppError, AppResult},
    models::{ArchiveEntry, Post, PostPage, PostPreview, PostRequest, PostSummary},
    params,
};

/// Longest slug kept, in characters.
pub const SLUG_MAX_LEN: usize = 80;
pub const DEFAULT_PAGE_SIZE: i64 = 5;
pub const MAX_PAGE_SIZE: i64 = 20;
const PREVIEW_LEN: usize = 250;

const POST_COLUMNS: &str = "id, title, content, author, slug, created_at, updated_at";
const SLUG_TAKEN: &str = "A post with a similar title already exists";

/// slugify
///
/// Lowercases, keeps `[a-z0-9]`, whitespace and `-`, turns whitespace runs
/// into single hyphens, collapses repeated hyphens, trims them from both
/// ends and truncates to 80 characters. Truncation comes last, so a slug cut
/// at the boundary may end in `-`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;

    for c in title.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else if c == '-' || c.is_whitespace() {
            pending_hyphen = true;
        }
        // Everything else is dropped without breaking the word.
    }

    slug.chars().take(SLUG_MAX_LEN).collect()
}

/// Pagination
///
/// Clamped page request: `page >= 1`, `1 <= limit <= 20`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// From raw query strings; anything unparseable (or zero) takes the default.
    pub fn from_query(page: Option<&str>, limit: Option<&str>) -> Self {
        let parse = |v: Option<&str>| {
            v.and_then(|s| s.trim().parse::<i64>().ok())
                .filter(|n| *n != 0)
        };
        Self::new(
            parse(page).unwrap_or(1),
            parse(limit).unwrap_or(DEFAULT_PAGE_SIZE),
        )
    }

    /// Saturates, so an absurd page number yields an empty page.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        (total + self.limit - 1) / self.limit
    }
}

/// Plain-text preview of rich-text content.
pub fn preview(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    let text = text.replace("&nbsp;", " ");
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(PREVIEW_LEN).collect()
}

/// PostService
///
/// Blog post rules on top of the data access layer.
#[derive(Clone)]
pub struct PostService {
    db: Db,
}

impl PostService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    fn validate(req: &PostRequest) -> AppResult<String> {
        if req.title.trim().is_empty() || req.content.trim().is_empty() || req.author.trim().is_empty()
        {
            return Err(AppError::validation(
                "Title, content, and author are required",
            ));
        }
        let slug = slugify(&req.title);
        if slug.is_empty() {
            return Err(AppError::validation(
                "Title must contain at least one letter or number",
            ));
        }
        Ok(slug)
    }

    /// Public, paginated listing, newest first.
    pub async fn list_page(&self, pagination: Pagination) -> AppResult<PostPage> {
        let rows = self
            .db
            .get_all(
                &format!(
                    "SELECT {POST_COLUMNS} FROM posts ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?"
                ),
                &params![pagination.limit, pagination.offset()],
            )
            .await?;

        let posts = rows
            .into_iter()
            .map(|row| {
                let post = Post::try_from(row)?;
                let preview = preview(&post.content);
                Ok(PostPreview { post, preview })
            })
            .collect::<Result<Vec<_>, crate::db::DbError>>()?;

        let total_posts = self.count().await?;

        Ok(PostPage {
            posts,
            page: pagination.page,
            total_pages: pagination.total_pages(total_posts),
            total_posts,
        })
    }

    pub async fn count(&self) -> AppResult<i64> {
        let row = self
            .db
            .get_one("SELECT COUNT(*) AS count FROM posts", &[])
            .await?;
        Ok(match row {
            Some(row) => row.get("count")?,
            None => 0,
        })
    }

    /// Posts per (year, month), newest month first.
    pub async fn archives(&self) -> AppResult<Vec<ArchiveEntry>> {
        let rows = self
            .db
            .get_all("SELECT created_at FROM posts", &[])
            .await?;

        let mut buckets: BTreeMap<(i32, u32), i64> = BTreeMap::new();
        for row in rows {
            let created_at: chrono::NaiveDateTime = row.get("created_at")?;
            *buckets
                .entry((created_at.year(), created_at.month()))
                .or_default() += 1;
        }

        Ok(buckets
            .into_iter()
            .rev()
            .map(|((year, month), count)| ArchiveEntry { year, month, count })
            .collect())
    }

    pub async fn get_by_slug(&self, slug: &str) -> AppResult<Post> {
        let row = self
            .db
            .get_one(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE slug = ?"),
                &params![slug],
            )
            .await?
            .ok_or_else(|| AppError::not_found("Post not found"))?;
        Ok(Post::try_from(row)?)
    }

    pub async fn get_by_id(&self, id: i64) -> AppResult<Post> {
        let row = self
            .db
            .get_one(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?"),
                &params![id],
            )
            .await?
            .ok_or_else(|| AppError::not_found("Post not found"))?;
        Ok(Post::try_from(row)?)
    }

    /// Dashboard listing without bodies.
    pub async fn list_all(&self) -> AppResult<Vec<PostSummary>> {
        let rows = self
            .db
            .get_all(
                "SELECT id, title, author, slug, created_at, updated_at FROM posts ORDER BY created_at DESC, id DESC",
                &[],
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(PostSummary::try_from)
            .collect::<Result<_, _>>()?)
    }

    /// Creates a post; returns its id and slug.
    pub async fn create(&self, req: &PostRequest) -> AppResult<(i64, String)> {
        let slug = Self::validate(req)?;

        let existing = self
            .db
            .get_one("SELECT id FROM posts WHERE slug = ?", &params![&slug])
            .await?;
        if existing.is_some() {
            return Err(AppError::conflict(SLUG_TAKEN));
        }

        let result = self
            .db
            .run(
                "INSERT INTO posts (title, content, author, slug) VALUES (?, ?, ?, ?)",
                &params![req.title.trim(), &req.content, req.author.trim(), &slug],
            )
            .await
            .map_err(slug_conflict)?;

        let id = result
            .generated_id
            .ok_or_else(|| AppError::Internal("insert returned no id".into()))?;
        tracing::info!(post_id = id, %slug, "Post created");
        Ok((id, slug))
    }

    /// Replaces a post's fields; the slug follows the (possibly new) title.
    pub async fn update(&self, id: i64, req: &PostRequest) -> AppResult<String> {
        let slug = Self::validate(req)?;

        let existing = self
            .db
            .get_one("SELECT id FROM posts WHERE id = ?", &params![id])
            .await?;
        if existing.is_none() {
            return Err(AppError::not_found("Post not found"));
        }

        let conflict = self
            .db
            .get_one(
                "SELECT id FROM posts WHERE slug = ? AND id != ?",
                &params![&slug, id],
            )
            .await?;
        if conflict.is_some() {
            return Err(AppError::conflict(SLUG_TAKEN));
        }

        self.db
            .run(
                "UPDATE posts SET title = ?, content = ?, author = ?, slug = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
                &params![req.title.trim(), &req.content, req.author.trim(), &slug, id],
            )
            .await
            .map_err(slug_conflict)?;

        tracing::info!(post_id = id, %slug, "Post updated");
        Ok(slug)
    }

    pub async fn delete(&self, id: i64) -> AppResult<()> {
        let result = self
            .db
            .run("DELETE FROM posts WHERE id = ?", &params![id])
            .await?;
        if result.affected == 0 {
            return Err(AppError::not_found("Post not found"));
        }
        tracing::info!(post_id = id, "Post deleted");
        Ok(())
    }
}

/// A concurrent writer can still win the race to a slug; the UNIQUE
/// constraint reports it.
fn slug_conflict(e: crate::db::DbError) -> AppError {
    if e.is_unique_violation() {
        AppError::conflict(SLUG_TAKEN)
    } else {
        e.into()
    }
}
