//! Authorities repository.
//!
//! The five authority tables share one layout (`id, heading, qualifier, key,
//! created_at`), so every query is parameterized by [`AuthorityKind::table`].

use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{
        authority::{authority_key, Authority, AuthorityInput, AuthorityRef},
        enums::AuthorityKind,
    },
};

#[derive(Clone)]
pub struct AuthoritiesRepository {
    pool: Pool<Postgres>,
}

impl AuthoritiesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Autocomplete: headings starting with (first) or containing `q`
    pub async fn search(&self, kind: AuthorityKind, q: Option<&str>, limit: i64) -> AppResult<Vec<Authority>> {
        let term = q.map(str::trim).unwrap_or_default();
        let query = format!(
            r#"
            SELECT id, heading, qualifier, key, created_at
            FROM {}
            WHERE $1 = '' OR heading ILIKE '%' || $1 || '%' OR key LIKE $2 || '%'
            ORDER BY (heading ILIKE $1 || '%') DESC, heading
            LIMIT $3
            "#,
            kind.table()
        );
        let rows = sqlx::query_as::<_, Authority>(&query)
            .bind(escape_like(term))
            .bind(authority_key(term, None))
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    pub async fn get_by_id(&self, kind: AuthorityKind, id: i32) -> AppResult<Authority> {
        let query = format!(
            "SELECT id, heading, qualifier, key, created_at FROM {} WHERE id = $1",
            kind.table()
        );
        sqlx::query_as::<_, Authority>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} authority {} not found", kind, id)))
    }

    /// Create an authority; a heading whose key already exists is a conflict
    pub async fn create(&self, kind: AuthorityKind, input: &AuthorityInput) -> AppResult<Authority> {
        let qualifier = qualifier_for(kind, input.qualifier.as_deref());
        let key = authority_key(&input.heading, qualifier);
        let query = format!(
            r#"
            INSERT INTO {} (heading, qualifier, key)
            VALUES ($1, $2, $3)
            ON CONFLICT (key) DO NOTHING
            RETURNING id, heading, qualifier, key, created_at
            "#,
            kind.table()
        );
        sqlx::query_as::<_, Authority>(&query)
            .bind(input.heading.trim())
            .bind(qualifier)
            .bind(&key)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::Conflict(format!("{} authority '{}' already exists", kind, key)))
    }

    /// Rename an authority. Every work using it follows, since works store the id.
    pub async fn rename(&self, kind: AuthorityKind, id: i32, input: &AuthorityInput) -> AppResult<Authority> {
        let qualifier = qualifier_for(kind, input.qualifier.as_deref());
        let key = authority_key(&input.heading, qualifier);

        let clash: Option<i32> = sqlx::query_scalar(&format!(
            "SELECT id FROM {} WHERE key = $1 AND id != $2",
            kind.table()
        ))
        .bind(&key)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(other) = clash {
            return Err(AppError::Conflict(format!(
                "{} authority {} already uses the heading '{}'",
                kind, other, key
            )));
        }

        let query = format!(
            r#"
            UPDATE {} SET heading = $1, qualifier = $2, key = $3
            WHERE id = $4
            RETURNING id, heading, qualifier, key, created_at
            "#,
            kind.table()
        );
        sqlx::query_as::<_, Authority>(&query)
            .bind(input.heading.trim())
            .bind(qualifier)
            .bind(&key)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} authority {} not found", kind, id)))
    }

    /// Ids of the works referencing an authority
    pub async fn works_using(&self, kind: AuthorityKind, id: i32) -> AppResult<Vec<i32>> {
        let query = match kind {
            AuthorityKind::Person => {
                "SELECT id FROM works WHERE composer_id = $1 \
                 UNION SELECT work_id FROM work_persons WHERE person_id = $1 ORDER BY 1"
            }
            AuthorityKind::CorporateBody => {
                "SELECT DISTINCT work_id FROM work_corporate_bodies WHERE corporate_body_id = $1 ORDER BY 1"
            }
            AuthorityKind::UniformTitle => "SELECT id FROM works WHERE uniform_title_id = $1 ORDER BY 1",
            AuthorityKind::MusicalForm => {
                "SELECT DISTINCT work_id FROM work_forms WHERE form_id = $1 ORDER BY 1"
            }
            AuthorityKind::Subject => {
                "SELECT DISTINCT work_id FROM work_subjects WHERE subject_id = $1 ORDER BY 1"
            }
        };
        let ids = sqlx::query_scalar::<_, i32>(query)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}

/// Resolve a reference from a work submission to an authority id, inside the
/// caller's transaction.
///
/// An explicit id must exist. A heading is looked up by key and inserted when
/// new; concurrent inserts of the same key resolve to a single row. Returns
/// `None` for an empty reference.
pub async fn ensure(conn: &mut PgConnection, kind: AuthorityKind, authority: &AuthorityRef) -> AppResult<Option<i32>> {
    if let Some(id) = authority.id {
        let exists: bool = sqlx::query_scalar(&format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)",
            kind.table()
        ))
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
        if !exists {
            return Err(AppError::Validation(format!("Unknown {} authority {}", kind, id)));
        }
        return Ok(Some(id));
    }

    let Some(heading) = authority.heading.as_deref().map(str::trim).filter(|h| !h.is_empty()) else {
        return Ok(None);
    };
    let qualifier = qualifier_for(kind, authority.qualifier.as_deref());
    let key = authority_key(heading, qualifier);

    // The no-op update makes RETURNING yield the existing row on conflict.
    let id = sqlx::query_scalar::<_, i32>(&format!(
        r#"
        INSERT INTO {} (heading, qualifier, key)
        VALUES ($1, $2, $3)
        ON CONFLICT (key) DO UPDATE SET key = EXCLUDED.key
        RETURNING id
        "#,
        kind.table()
    ))
    .bind(heading)
    .bind(qualifier)
    .bind(&key)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Some(id))
}

/// Load an authority as a work-side reference
pub async fn load_ref(conn: &mut PgConnection, kind: AuthorityKind, id: i32) -> AppResult<AuthorityRef> {
    let row: Option<(i32, String, Option<String>)> = sqlx::query_as(&format!(
        "SELECT id, heading, qualifier FROM {} WHERE id = $1",
        kind.table()
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let (id, heading, qualifier) =
        row.ok_or_else(|| AppError::Internal(format!("Dangling {} authority {}", kind, id)))?;
    Ok(AuthorityRef {
        id: Some(id),
        heading: Some(heading),
        qualifier,
    })
}

/// Qualifiers only exist for persons and corporate bodies
fn qualifier_for(kind: AuthorityKind, qualifier: Option<&str>) -> Option<&str> {
    if kind.has_qualifier() {
        qualifier.map(str::trim).filter(|q| !q.is_empty())
    } else {
        None
    }
}

/// Escape `%`, `_` and `\` for use inside a LIKE pattern
pub(crate) fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_a\\b"), "100\\%\\_a\\\\b");
        assert_eq!(escape_like("Bach"), "Bach");
    }

    #[test]
    fn test_qualifier_dropped_for_terms() {
        assert_eq!(qualifier_for(AuthorityKind::Person, Some(" 1685-1750 ")), Some("1685-1750"));
        assert_eq!(qualifier_for(AuthorityKind::Person, Some("  ")), None);
        assert_eq!(qualifier_for(AuthorityKind::MusicalForm, Some("x")), None);
    }
}
