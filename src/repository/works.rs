//! Works repository.
//!
//! A work is spread over the `works` row and one child table per repeatable
//! group. Writes happen on a caller-provided connection so that numbering,
//! children, authority deduplication and link synchronization share the
//! caller's transaction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use super::authorities::{self, escape_like};
use crate::{
    config::CatalogingConfig,
    error::{AppError, AppResult},
    models::{
        authority::AuthorityRef,
        enums::{AuthorityKind, BibliographicLevel, LinkKind, RecordType},
        work::{
            AgentEntry, ElectronicAccess, Identifier, Incipit, LinkTarget, Location, Note,
            PerformanceMedium, PerformancePart, PhysicalDescription, Publication, SeriesStatement,
            TitleStatement, UniformTitleEntry, Work, WorkDraft, WorkLink, WorkQuery, WorkRow,
            WorkSummary,
        },
    },
};

/// Child tables keyed by `work_id`, cleared before a full replacement
const CHILD_TABLES: &[&str] = &[
    "work_identifiers",
    "work_incipits",
    "work_languages",
    "work_countries",
    "work_performance_media",
    "work_series",
    "work_notes",
    "work_subjects",
    "work_forms",
    "work_persons",
    "work_corporate_bodies",
    "work_links",
    "work_locations",
    "work_electronic_access",
];

pub fn format_control_number(prefix: &str, number: i64) -> String {
    format!("{}{:06}", prefix, number)
}

pub fn format_signature(prefix: &str, number: i64) -> String {
    format!("{} {}", prefix, number)
}

/// Fill the shelfmark of the home-institution 852 with the signature.
///
/// When `append_missing` is set and no 852 names the home institution, one is
/// added.
pub fn apply_home_signature(locations: &mut Vec<Location>, institution: &str, signature: &str, append_missing: bool) {
    let mut found = false;
    for location in locations.iter_mut().filter(|l| l.institution.trim() == institution) {
        found = true;
        if location.shelfmark.as_deref().map_or(true, |s| s.trim().is_empty()) {
            location.shelfmark = Some(signature.to_string());
        }
    }
    if !found && append_missing {
        locations.push(Location {
            institution: institution.to_string(),
            shelfmark: Some(signature.to_string()),
            ..Default::default()
        });
    }
}

/// Next value of the per-record-type counter.
///
/// The counter row stays locked until the caller's transaction ends, which
/// serializes concurrent creations of the same record type.
pub async fn next_number(conn: &mut PgConnection, record_type: RecordType) -> AppResult<i64> {
    let current: i64 = sqlx::query_scalar(
        "SELECT last_value FROM record_counters WHERE record_type = $1 FOR UPDATE",
    )
    .bind(record_type)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::Internal(format!("No counter for record type {}", record_type)))?;

    let next = current + 1;
    sqlx::query("UPDATE record_counters SET last_value = $1 WHERE record_type = $2")
        .bind(next)
        .bind(record_type)
        .execute(&mut *conn)
        .await?;

    Ok(next)
}

#[derive(Clone)]
pub struct WorksRepository {
    pool: Pool<Postgres>,
}

impl WorksRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    // =========================================================================
    // READ
    // =========================================================================

    pub async fn get_by_id(&self, id: i32) -> AppResult<Work> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, WorkRow>("SELECT * FROM works WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Work with id {} not found", id)))?;
        hydrate(&mut conn, row).await
    }

    pub async fn get_by_control_number(&self, control_number: &str) -> AppResult<Work> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query_as::<_, WorkRow>("SELECT * FROM works WHERE control_number = $1")
            .bind(control_number)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Work {} not found", control_number)))?;
        hydrate(&mut conn, row).await
    }

    /// Whether a work exists and is not deleted
    pub async fn is_active(&self, id: i32) -> AppResult<bool> {
        let deleted: Option<Option<DateTime<Utc>>> =
            sqlx::query_scalar("SELECT deleted_at FROM works WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        match deleted {
            Some(deleted_at) => Ok(deleted_at.is_none()),
            None => Err(AppError::NotFound(format!("Work with id {} not found", id))),
        }
    }

    /// Lock a work row for the rest of the caller's transaction
    pub async fn lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<WorkRow> {
        sqlx::query_as::<_, WorkRow>("SELECT * FROM works WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Work with id {} not found", id)))
    }

    /// What the validator needs to know about each referenced record
    pub async fn link_targets(&self, conn: &mut PgConnection, ids: &[i32]) -> AppResult<HashMap<i32, LinkTarget>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        // Targets stay locked until commit so their links cannot change underneath
        sqlx::query("SELECT id FROM works WHERE id = ANY($1) ORDER BY id FOR UPDATE")
            .bind(ids)
            .execute(&mut *conn)
            .await?;

        let rows = sqlx::query_as::<_, LinkTarget>(
            r#"
            SELECT w.id, w.control_number, w.title, w.bibliographic_level,
                   (w.deleted_at IS NULL) AS active,
                   (SELECT l.target_id FROM work_links l
                    WHERE l.work_id = w.id AND l.kind = 'host' AND l.target_id IS NOT NULL
                    ORDER BY l.position LIMIT 1) AS host_id,
                   (SELECT COUNT(*) FROM work_links l
                    WHERE l.work_id = w.id AND l.kind = 'constituent') AS constituent_count
            FROM works w
            WHERE w.id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.into_iter().map(|t| (t.id, t)).collect())
    }

    pub async fn load_links(&self, conn: &mut PgConnection, work_id: i32) -> AppResult<Vec<WorkLink>> {
        load_links(conn, work_id).await
    }

    // =========================================================================
    // SEARCH
    // =========================================================================

    /// Search works with pagination
    pub async fn search(&self, query: &WorkQuery) -> AppResult<(Vec<WorkSummary>, i64)> {
        let per_page = query.per_page();
        let offset = (query.page() - 1) * per_page;

        let mut conditions = Vec::new();
        let mut binds: Vec<String> = Vec::new();

        if let Some(q) = non_blank(&query.q) {
            binds.push(contains_pattern(q));
            let idx = binds.len();
            conditions.push(format!(
                "(w.title ILIKE ${i} OR w.control_number ILIKE ${i} OR w.signature ILIKE ${i} \
                 OR p.heading ILIKE ${i} OR ut.heading ILIKE ${i})",
                i = idx
            ));
        }
        if let Some(composer) = non_blank(&query.composer) {
            binds.push(contains_pattern(composer));
            conditions.push(format!("p.heading ILIKE ${}", binds.len()));
        }
        if let Some(title) = non_blank(&query.title) {
            binds.push(contains_pattern(title));
            let idx = binds.len();
            conditions.push(format!("(w.title ILIKE ${i} OR ut.heading ILIKE ${i})", i = idx));
        }
        if let Some(subject) = non_blank(&query.subject) {
            binds.push(contains_pattern(subject));
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM work_subjects ws JOIN subject_terms s ON s.id = ws.subject_id \
                 WHERE ws.work_id = w.id AND s.heading ILIKE ${})",
                binds.len()
            ));
        }
        if let Some(form) = non_blank(&query.form) {
            binds.push(contains_pattern(form));
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM work_forms wf JOIN musical_forms f ON f.id = wf.form_id \
                 WHERE wf.work_id = w.id AND f.heading ILIKE ${})",
                binds.len()
            ));
        }
        if let Some(record_type) = query.record_type {
            binds.push(record_type.as_str().to_string());
            conditions.push(format!("w.record_type = ${}", binds.len()));
        }
        if let Some(level) = query.bibliographic_level {
            binds.push(level.as_str().to_string());
            conditions.push(format!("w.bibliographic_level = ${}", binds.len()));
        }
        if !query.include_deleted.unwrap_or(false) {
            conditions.push("w.deleted_at IS NULL".to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let from_clause = "FROM works w \
                           LEFT JOIN persons p ON p.id = w.composer_id \
                           LEFT JOIN uniform_titles ut ON ut.id = w.uniform_title_id";

        let count_q = format!("SELECT COUNT(*) {} {}", from_clause, where_clause);
        let mut count_builder = sqlx::query_scalar::<_, i64>(&count_q);
        for b in &binds {
            count_builder = count_builder.bind(b);
        }
        let total = count_builder.fetch_one(&self.pool).await?;

        let select_q = format!(
            r#"
            SELECT w.id, w.control_number, w.signature, w.record_type, w.bibliographic_level,
                   w.title, p.heading AS composer, ut.heading AS uniform_title, w.publication_date,
                   (SELECT COUNT(*) FROM scans s WHERE s.work_id = w.id) AS scan_count,
                   w.deleted_at
            {} {}
            ORDER BY LOWER(w.title), w.id
            LIMIT {} OFFSET {}
            "#,
            from_clause, where_clause, per_page, offset
        );
        let mut builder = sqlx::query_as::<_, WorkSummary>(&select_q);
        for b in &binds {
            builder = builder.bind(b);
        }
        let rows = builder.fetch_all(&self.pool).await?;

        Ok((rows, total))
    }

    // =========================================================================
    // WRITE
    // =========================================================================

    /// Insert a validated draft. Returns the new id.
    pub async fn insert(
        &self,
        conn: &mut PgConnection,
        draft: &WorkDraft,
        targets: &HashMap<i32, LinkTarget>,
        cataloging: &CatalogingConfig,
        created_by: Option<i32>,
    ) -> AppResult<i32> {
        let number = next_number(conn, draft.record_type).await?;
        let control_number = format_control_number(cataloging.control_prefix(draft.record_type), number);
        let signature = format_signature(cataloging.signature_prefix(draft.record_type), number);

        let composer_id = ensure_agent(conn, AuthorityKind::Person, draft.composer.as_ref()).await?;
        let uniform_title_id = match &draft.uniform_title {
            Some(ut) => authorities::ensure(conn, AuthorityKind::UniformTitle, &ut.title).await?,
            None => None,
        };
        let ut = draft.uniform_title.as_ref();
        let publication = draft.publication.clone().unwrap_or_default();
        let physical = draft.physical_description.clone().unwrap_or_default();

        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO works (
                control_number, signature, record_type, bibliographic_level,
                composer_id, composer_relator, uniform_title_id,
                uniform_title_medium, uniform_title_number, uniform_title_key, uniform_title_arranged,
                title, title_remainder, responsibility, part_number, part_name, edition,
                publication_place, publisher, publication_date,
                extent, other_physical_details, dimensions, created_by
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24
            )
            RETURNING id
            "#,
        )
        .bind(&control_number)
        .bind(&signature)
        .bind(draft.record_type)
        .bind(draft.bibliographic_level)
        .bind(composer_id)
        .bind(draft.composer.as_ref().and_then(|c| c.relator.as_deref()))
        .bind(uniform_title_id)
        .bind(ut.and_then(|u| u.medium.as_deref()))
        .bind(ut.and_then(|u| u.number.as_deref()))
        .bind(ut.and_then(|u| u.key.as_deref()))
        .bind(ut.and_then(|u| u.arranged.as_deref()))
        .bind(draft.title.title.trim())
        .bind(&draft.title.remainder)
        .bind(&draft.title.responsibility)
        .bind(&draft.title.part_number)
        .bind(&draft.title.part_name)
        .bind(&draft.edition)
        .bind(&publication.place)
        .bind(&publication.publisher)
        .bind(&publication.date)
        .bind(&physical.extent)
        .bind(&physical.other_details)
        .bind(&physical.dimensions)
        .bind(created_by)
        .fetch_one(&mut *conn)
        .await?;

        let mut locations = draft.locations.clone();
        apply_home_signature(&mut locations, &cataloging.institution_code, &signature, true);
        insert_children(conn, id, draft, &locations, targets).await?;
        sync_links(conn, id, &control_number, draft.title.title.trim(), &[], &draft.links).await?;

        tracing::info!(work_id = id, %control_number, %signature, "Work created");
        Ok(id)
    }

    /// Replace every field of a locked work; identity and numbering stay.
    pub async fn replace(
        &self,
        conn: &mut PgConnection,
        current: &WorkRow,
        draft: &WorkDraft,
        previous_links: &[WorkLink],
        targets: &HashMap<i32, LinkTarget>,
        cataloging: &CatalogingConfig,
    ) -> AppResult<()> {
        let composer_id = ensure_agent(conn, AuthorityKind::Person, draft.composer.as_ref()).await?;
        let uniform_title_id = match &draft.uniform_title {
            Some(ut) => authorities::ensure(conn, AuthorityKind::UniformTitle, &ut.title).await?,
            None => None,
        };
        let ut = draft.uniform_title.as_ref();
        let publication = draft.publication.clone().unwrap_or_default();
        let physical = draft.physical_description.clone().unwrap_or_default();

        sqlx::query(
            r#"
            UPDATE works SET
                bibliographic_level = $1, composer_id = $2, composer_relator = $3,
                uniform_title_id = $4, uniform_title_medium = $5, uniform_title_number = $6,
                uniform_title_key = $7, uniform_title_arranged = $8,
                title = $9, title_remainder = $10, responsibility = $11,
                part_number = $12, part_name = $13, edition = $14,
                publication_place = $15, publisher = $16, publication_date = $17,
                extent = $18, other_physical_details = $19, dimensions = $20,
                updated_at = NOW()
            WHERE id = $21
            "#,
        )
        .bind(draft.bibliographic_level)
        .bind(composer_id)
        .bind(draft.composer.as_ref().and_then(|c| c.relator.as_deref()))
        .bind(uniform_title_id)
        .bind(ut.and_then(|u| u.medium.as_deref()))
        .bind(ut.and_then(|u| u.number.as_deref()))
        .bind(ut.and_then(|u| u.key.as_deref()))
        .bind(ut.and_then(|u| u.arranged.as_deref()))
        .bind(draft.title.title.trim())
        .bind(&draft.title.remainder)
        .bind(&draft.title.responsibility)
        .bind(&draft.title.part_number)
        .bind(&draft.title.part_name)
        .bind(&draft.edition)
        .bind(&publication.place)
        .bind(&publication.publisher)
        .bind(&publication.date)
        .bind(&physical.extent)
        .bind(&physical.other_details)
        .bind(&physical.dimensions)
        .bind(current.id)
        .execute(&mut *conn)
        .await?;

        for table in CHILD_TABLES {
            sqlx::query(&format!("DELETE FROM {} WHERE work_id = $1", table))
                .bind(current.id)
                .execute(&mut *conn)
                .await?;
        }

        let mut locations = draft.locations.clone();
        apply_home_signature(&mut locations, &cataloging.institution_code, &current.signature, false);
        insert_children(conn, current.id, draft, &locations, targets).await?;
        sync_links(
            conn,
            current.id,
            &current.control_number,
            draft.title.title.trim(),
            previous_links,
            &draft.links,
        )
        .await?;

        tracing::info!(work_id = current.id, control_number = %current.control_number, "Work updated");
        Ok(())
    }

    /// Soft delete. Entries in other records pointing at the work become textual.
    pub async fn soft_delete(&self, conn: &mut PgConnection, work: &WorkRow) -> AppResult<u64> {
        sqlx::query("UPDATE works SET deleted_at = NOW() WHERE id = $1")
            .bind(work.id)
            .execute(&mut *conn)
            .await?;

        let unlinked = sqlx::query(
            r#"
            UPDATE work_links
            SET target_id = NULL, control_number = $2, title = COALESCE(title, $3)
            WHERE target_id = $1
            "#,
        )
        .bind(work.id)
        .bind(&work.control_number)
        .bind(&work.title)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        touch_referrers(conn, work.id, &work.control_number).await?;
        Ok(unlinked)
    }

    /// Restore a soft-deleted work and relink textual entries carrying its control number
    pub async fn restore(&self, conn: &mut PgConnection, work: &WorkRow) -> AppResult<u64> {
        sqlx::query("UPDATE works SET deleted_at = NULL, updated_at = NOW() WHERE id = $1")
            .bind(work.id)
            .execute(&mut *conn)
            .await?;

        let relinked = sqlx::query(
            r#"
            UPDATE work_links
            SET target_id = $1, title = $3
            WHERE target_id IS NULL AND control_number = $2 AND work_id != $1
            "#,
        )
        .bind(work.id)
        .bind(&work.control_number)
        .bind(&work.title)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        touch_referrers(conn, work.id, &work.control_number).await?;

        let detached = self.reconcile_own_links(conn, work).await?;
        if detached > 0 {
            tracing::info!(work_id = work.id, detached, "Stale link entries made textual on restore");
        }
        Ok(relinked)
    }

    /// Re-mirror the restored work's own 773/774 entries, or make them textual
    /// when the other record moved on while this one was deleted.
    async fn reconcile_own_links(&self, conn: &mut PgConnection, work: &WorkRow) -> AppResult<u64> {
        let links = load_links(conn, work.id).await?;
        let ids: Vec<i32> = links
            .iter()
            .filter(|l| l.kind.mirror().is_some())
            .filter_map(|l| l.target_id)
            .collect();
        let targets = self.link_targets(conn, &ids).await?;

        let mut detached = 0;
        for link in links.iter().filter(|l| l.kind.mirror().is_some()) {
            let Some(target_id) = link.target_id else { continue };
            let target = targets.get(&target_id);
            match (target, link.kind.mirror()) {
                (Some(target), Some(mirror)) if mirror_still_valid(work.id, link.kind, target) => {
                    ensure_mirror(conn, target.id, mirror, work.id, &work.control_number, &work.title).await?;
                }
                _ => {
                    let (title, control_number) = match target {
                        Some(t) => (Some(t.title.clone()), Some(t.control_number.clone())),
                        None => (link.title.clone(), link.control_number.clone()),
                    };
                    sqlx::query(
                        r#"
                        UPDATE work_links SET target_id = NULL, title = $4, control_number = $5
                        WHERE work_id = $1 AND kind = $2 AND target_id = $3
                        "#,
                    )
                    .bind(work.id)
                    .bind(link.kind)
                    .bind(target_id)
                    .bind(title)
                    .bind(control_number)
                    .execute(&mut *conn)
                    .await?;
                    detached += 1;
                }
            }
        }

        if detached > 0 {
            touch(conn, work.id).await?;
        }
        Ok(detached)
    }

    /// Physically delete works soft-deleted before `cutoff`.
    ///
    /// Returns the number of works removed and the stored paths of their scans.
    /// The candidate rows stay locked until commit, so a concurrent restore
    /// either wins (and the work is skipped) or finds the work gone.
    pub async fn purge(&self, cutoff: DateTime<Utc>) -> AppResult<(u64, Vec<String>)> {
        let mut tx = self.pool.begin().await?;

        let ids: Vec<i32> = sqlx::query_scalar(
            r#"
            SELECT id FROM works
            WHERE deleted_at IS NOT NULL AND deleted_at < $1
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await?;

        if ids.is_empty() {
            return Ok((0, Vec::new()));
        }

        let paths: Vec<String> = sqlx::query_scalar("DELETE FROM scans WHERE work_id = ANY($1) RETURNING stored_path")
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await?;

        let purged = sqlx::query("DELETE FROM works WHERE id = ANY($1)")
            .bind(&ids)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok((purged, paths))
    }
}

// =============================================================================
// Children
// =============================================================================

async fn ensure_agent(conn: &mut PgConnection, kind: AuthorityKind, agent: Option<&AgentEntry>) -> AppResult<Option<i32>> {
    match agent {
        Some(agent) => authorities::ensure(conn, kind, &agent.authority).await,
        None => Ok(None),
    }
}

async fn insert_children(
    conn: &mut PgConnection,
    work_id: i32,
    draft: &WorkDraft,
    locations: &[Location],
    targets: &HashMap<i32, LinkTarget>,
) -> AppResult<()> {
    for (pos, identifier) in draft.identifiers.iter().enumerate() {
        sqlx::query(
            "INSERT INTO work_identifiers (work_id, position, kind, value, qualifier, publisher) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(work_id)
        .bind(pos as i32)
        .bind(identifier.kind)
        .bind(identifier.value.trim())
        .bind(&identifier.qualifier)
        .bind(&identifier.publisher)
        .execute(&mut *conn)
        .await?;
    }

    for (pos, incipit) in draft.incipits.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO work_incipits (
                work_id, position, work_number, movement_number, excerpt_number, caption,
                clef, key_signature, time_signature, notation, text_incipit
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(work_id)
        .bind(pos as i32)
        .bind(&incipit.work_number)
        .bind(&incipit.movement_number)
        .bind(&incipit.excerpt_number)
        .bind(&incipit.caption)
        .bind(&incipit.clef)
        .bind(&incipit.key_signature)
        .bind(&incipit.time_signature)
        .bind(&incipit.notation)
        .bind(&incipit.text_incipit)
        .execute(&mut *conn)
        .await?;
    }

    for (table, codes) in [("work_languages", &draft.languages), ("work_countries", &draft.countries)] {
        for (pos, code) in codes.iter().enumerate() {
            sqlx::query(&format!("INSERT INTO {} (work_id, position, code) VALUES ($1, $2, $3)", table))
                .bind(work_id)
                .bind(pos as i32)
                .bind(code)
                .execute(&mut *conn)
                .await?;
        }
    }

    for (pos, medium) in draft.performance_media.iter().enumerate() {
        let medium_id: i32 = sqlx::query_scalar(
            "INSERT INTO work_performance_media (work_id, position, total_performers, note) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(work_id)
        .bind(pos as i32)
        .bind(medium.total_performers)
        .bind(&medium.note)
        .fetch_one(&mut *conn)
        .await?;

        for (part_pos, part) in medium.parts.iter().enumerate() {
            sqlx::query(
                "INSERT INTO work_performance_parts (medium_id, position, instrument, count, soloist) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(medium_id)
            .bind(part_pos as i32)
            .bind(part.instrument.trim())
            .bind(part.count)
            .bind(part.soloist)
            .execute(&mut *conn)
            .await?;
        }
    }

    for (pos, series) in draft.series.iter().enumerate() {
        sqlx::query("INSERT INTO work_series (work_id, position, statement, volume) VALUES ($1, $2, $3, $4)")
            .bind(work_id)
            .bind(pos as i32)
            .bind(series.statement.trim())
            .bind(&series.volume)
            .execute(&mut *conn)
            .await?;
    }

    for (pos, note) in draft.notes.iter().enumerate() {
        sqlx::query("INSERT INTO work_notes (work_id, position, kind, text) VALUES ($1, $2, $3, $4)")
            .bind(work_id)
            .bind(pos as i32)
            .bind(note.kind)
            .bind(note.text.trim())
            .execute(&mut *conn)
            .await?;
    }

    let term_groups = [
        ("work_subjects", "subject_id", AuthorityKind::Subject, &draft.subjects),
        ("work_forms", "form_id", AuthorityKind::MusicalForm, &draft.forms),
    ];
    for (table, column, kind, refs) in term_groups {
        let mut pos = 0;
        for authority in refs {
            let Some(authority_id) = authorities::ensure(conn, kind, authority).await? else {
                continue;
            };
            sqlx::query(&format!(
                "INSERT INTO {} (work_id, position, {}) VALUES ($1, $2, $3)",
                table, column
            ))
            .bind(work_id)
            .bind(pos)
            .bind(authority_id)
            .execute(&mut *conn)
            .await?;
            pos += 1;
        }
    }

    let agent_groups = [
        ("work_persons", "person_id", AuthorityKind::Person, &draft.added_persons),
        ("work_corporate_bodies", "corporate_body_id", AuthorityKind::CorporateBody, &draft.added_corporate_bodies),
    ];
    for (table, column, kind, agents) in agent_groups {
        let mut pos = 0;
        for agent in agents {
            let Some(authority_id) = authorities::ensure(conn, kind, &agent.authority).await? else {
                continue;
            };
            sqlx::query(&format!(
                "INSERT INTO {} (work_id, position, {}, relator) VALUES ($1, $2, $3, $4)",
                table, column
            ))
            .bind(work_id)
            .bind(pos)
            .bind(authority_id)
            .bind(&agent.relator)
            .execute(&mut *conn)
            .await?;
            pos += 1;
        }
    }

    for (pos, link) in draft.links.iter().enumerate() {
        // Linked entries carry a snapshot of their target
        let (title, control_number) = match link.target_id.and_then(|id| targets.get(&id)) {
            Some(target) => (Some(target.title.clone()), Some(target.control_number.clone())),
            None => (link.title.clone(), link.control_number.clone()),
        };
        sqlx::query(
            r#"
            INSERT INTO work_links (work_id, position, kind, target_id, title, control_number, related_parts, relationship)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(work_id)
        .bind(pos as i32)
        .bind(link.kind)
        .bind(link.target_id)
        .bind(title)
        .bind(control_number)
        .bind(&link.related_parts)
        .bind(&link.relationship)
        .execute(&mut *conn)
        .await?;
    }

    for (pos, location) in locations.iter().enumerate() {
        sqlx::query(
            "INSERT INTO work_locations (work_id, position, institution, sublocation, shelfmark, note) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(work_id)
        .bind(pos as i32)
        .bind(location.institution.trim())
        .bind(&location.sublocation)
        .bind(&location.shelfmark)
        .bind(&location.note)
        .execute(&mut *conn)
        .await?;
    }

    for (pos, access) in draft.electronic_access.iter().enumerate() {
        sqlx::query(
            "INSERT INTO work_electronic_access (work_id, position, url, link_text, note, relationship) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(work_id)
        .bind(pos as i32)
        .bind(access.url.trim())
        .bind(&access.link_text)
        .bind(&access.note)
        .bind(access.relationship)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

async fn load_links(conn: &mut PgConnection, work_id: i32) -> AppResult<Vec<WorkLink>> {
    let links = sqlx::query_as::<_, WorkLink>(
        "SELECT kind, target_id, title, control_number, related_parts, relationship \
         FROM work_links WHERE work_id = $1 ORDER BY position, id",
    )
    .bind(work_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(links)
}

/// Assemble a full work from its row and child tables
async fn hydrate(conn: &mut PgConnection, row: WorkRow) -> AppResult<Work> {
    let id = row.id;

    let composer = match row.composer_id {
        Some(person_id) => Some(AgentEntry {
            authority: authorities::load_ref(conn, AuthorityKind::Person, person_id).await?,
            relator: row.composer_relator.clone(),
        }),
        None => None,
    };
    let uniform_title = match row.uniform_title_id {
        Some(title_id) => Some(UniformTitleEntry {
            title: authorities::load_ref(conn, AuthorityKind::UniformTitle, title_id).await?,
            medium: row.uniform_title_medium.clone(),
            number: row.uniform_title_number.clone(),
            key: row.uniform_title_key.clone(),
            arranged: row.uniform_title_arranged.clone(),
        }),
        None => None,
    };

    let identifiers = sqlx::query_as::<_, Identifier>(
        "SELECT kind, value, qualifier, publisher FROM work_identifiers WHERE work_id = $1 ORDER BY position",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let incipits = sqlx::query_as::<_, Incipit>(
        r#"
        SELECT work_number, movement_number, excerpt_number, caption, clef,
               key_signature, time_signature, notation, text_incipit
        FROM work_incipits WHERE work_id = $1 ORDER BY position
        "#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let languages: Vec<String> =
        sqlx::query_scalar("SELECT code FROM work_languages WHERE work_id = $1 ORDER BY position")
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;
    let countries: Vec<String> =
        sqlx::query_scalar("SELECT code FROM work_countries WHERE work_id = $1 ORDER BY position")
            .bind(id)
            .fetch_all(&mut *conn)
            .await?;

    let media: Vec<(i32, Option<i32>, Option<String>)> = sqlx::query_as(
        "SELECT id, total_performers, note FROM work_performance_media WHERE work_id = $1 ORDER BY position",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;
    let medium_ids: Vec<i32> = media.iter().map(|m| m.0).collect();
    let parts: Vec<(i32, String, i32, bool)> = sqlx::query_as(
        "SELECT medium_id, instrument, count, soloist FROM work_performance_parts \
         WHERE medium_id = ANY($1) ORDER BY medium_id, position",
    )
    .bind(&medium_ids)
    .fetch_all(&mut *conn)
    .await?;
    let performance_media = media
        .into_iter()
        .map(|(medium_id, total_performers, note)| PerformanceMedium {
            parts: parts
                .iter()
                .filter(|p| p.0 == medium_id)
                .map(|(_, instrument, count, soloist)| PerformancePart {
                    instrument: instrument.clone(),
                    count: *count,
                    soloist: *soloist,
                })
                .collect(),
            total_performers,
            note,
        })
        .collect();

    let series = sqlx::query_as::<_, SeriesStatement>(
        "SELECT statement, volume FROM work_series WHERE work_id = $1 ORDER BY position",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let notes = sqlx::query_as::<_, Note>("SELECT kind, text FROM work_notes WHERE work_id = $1 ORDER BY position")
        .bind(id)
        .fetch_all(&mut *conn)
        .await?;

    let subjects = load_terms(conn, id, "work_subjects", "subject_id", AuthorityKind::Subject).await?;
    let forms = load_terms(conn, id, "work_forms", "form_id", AuthorityKind::MusicalForm).await?;
    let added_persons = load_agents(conn, id, "work_persons", "person_id", AuthorityKind::Person).await?;
    let added_corporate_bodies = load_agents(
        conn,
        id,
        "work_corporate_bodies",
        "corporate_body_id",
        AuthorityKind::CorporateBody,
    )
    .await?;

    let links = load_links(conn, id).await?;

    let locations = sqlx::query_as::<_, Location>(
        "SELECT institution, sublocation, shelfmark, note FROM work_locations WHERE work_id = $1 ORDER BY position",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let electronic_access = sqlx::query_as::<_, ElectronicAccess>(
        "SELECT url, link_text, note, relationship FROM work_electronic_access WHERE work_id = $1 ORDER BY position",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let publication = Publication {
        place: row.publication_place,
        publisher: row.publisher,
        date: row.publication_date,
    };
    let physical_description = PhysicalDescription {
        extent: row.extent,
        other_details: row.other_physical_details,
        dimensions: row.dimensions,
    };

    Ok(Work {
        id,
        control_number: row.control_number,
        signature: row.signature,
        created_by: row.created_by,
        created_at: row.created_at,
        updated_at: row.updated_at,
        deleted_at: row.deleted_at,
        record: WorkDraft {
            record_type: row.record_type,
            bibliographic_level: row.bibliographic_level,
            composer,
            uniform_title,
            title: TitleStatement {
                title: row.title,
                remainder: row.title_remainder,
                responsibility: row.responsibility,
                part_number: row.part_number,
                part_name: row.part_name,
            },
            edition: row.edition,
            publication: (publication != Publication::default()).then_some(publication),
            physical_description: (physical_description != PhysicalDescription::default())
                .then_some(physical_description),
            identifiers,
            incipits,
            languages,
            countries,
            performance_media,
            series,
            notes,
            subjects,
            forms,
            added_persons,
            added_corporate_bodies,
            links,
            locations,
            electronic_access,
        },
    })
}

async fn load_terms(
    conn: &mut PgConnection,
    work_id: i32,
    table: &str,
    column: &str,
    kind: AuthorityKind,
) -> AppResult<Vec<AuthorityRef>> {
    let rows: Vec<(i32, String, Option<String>)> = sqlx::query_as(&format!(
        "SELECT a.id, a.heading, a.qualifier FROM {} j JOIN {} a ON a.id = j.{} \
         WHERE j.work_id = $1 ORDER BY j.position",
        table,
        kind.table(),
        column
    ))
    .bind(work_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, heading, qualifier)| AuthorityRef {
            id: Some(id),
            heading: Some(heading),
            qualifier,
        })
        .collect())
}

async fn load_agents(
    conn: &mut PgConnection,
    work_id: i32,
    table: &str,
    column: &str,
    kind: AuthorityKind,
) -> AppResult<Vec<AgentEntry>> {
    let rows: Vec<(i32, String, Option<String>, Option<String>)> = sqlx::query_as(&format!(
        "SELECT a.id, a.heading, a.qualifier, j.relator FROM {} j JOIN {} a ON a.id = j.{} \
         WHERE j.work_id = $1 ORDER BY j.position",
        table,
        kind.table(),
        column
    ))
    .bind(work_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, heading, qualifier, relator)| AgentEntry {
            authority: AuthorityRef {
                id: Some(id),
                heading: Some(heading),
                qualifier,
            },
            relator,
        })
        .collect())
}

// =============================================================================
// 773 / 774 synchronization
// =============================================================================

/// Keep host and constituent entries mirrored after `work_id` was written.
async fn sync_links(
    conn: &mut PgConnection,
    work_id: i32,
    control_number: &str,
    title: &str,
    previous: &[WorkLink],
    current: &[WorkLink],
) -> AppResult<()> {
    let is_current = |kind: LinkKind, target: i32| {
        current
            .iter()
            .any(|l| l.kind == kind && l.target_id == Some(target))
    };

    for link in previous {
        let (Some(target_id), Some(mirror)) = (link.target_id, link.kind.mirror()) else {
            continue;
        };
        if is_current(link.kind, target_id) {
            continue;
        }
        let removed = sqlx::query("DELETE FROM work_links WHERE work_id = $1 AND kind = $2 AND target_id = $3")
            .bind(target_id)
            .bind(mirror)
            .bind(work_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();
        if removed > 0 {
            touch(conn, target_id).await?;
            tracing::debug!(work_id, target_id, tag = mirror.tag(), "Removed mirrored entry");
        }
    }

    for link in current {
        let (Some(target_id), Some(mirror)) = (link.target_id, link.kind.mirror()) else {
            continue;
        };
        ensure_mirror(conn, target_id, mirror, work_id, control_number, title).await?;
    }

    // Snapshots held by records pointing at this one
    sqlx::query("UPDATE work_links SET title = $2, control_number = $3 WHERE target_id = $1")
        .bind(work_id)
        .bind(title)
        .bind(control_number)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Make `owner` carry a linked `kind` entry pointing at `target`.
///
/// A matching textual entry is upgraded in place rather than duplicated: for a
/// part (773) its textual host entry, for a collection (774) the textual entry
/// carrying the target's control number.
async fn ensure_mirror(
    conn: &mut PgConnection,
    owner: i32,
    kind: LinkKind,
    target: i32,
    control_number: &str,
    title: &str,
) -> AppResult<()> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM work_links WHERE work_id = $1 AND kind = $2 AND target_id = $3)",
    )
    .bind(owner)
    .bind(kind)
    .bind(target)
    .fetch_one(&mut *conn)
    .await?;
    if exists {
        return Ok(());
    }

    let upgraded = sqlx::query(
        r#"
        UPDATE work_links SET target_id = $3, title = $5, control_number = $4
        WHERE id = (
            SELECT id FROM work_links
            WHERE work_id = $1 AND kind = $2 AND target_id IS NULL
              AND ($2 = 'host' OR control_number = $4)
            ORDER BY position, id
            LIMIT 1
        )
        "#,
    )
    .bind(owner)
    .bind(kind)
    .bind(target)
    .bind(control_number)
    .bind(title)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if upgraded == 0 {
        sqlx::query(
            r#"
            INSERT INTO work_links (work_id, position, kind, target_id, title, control_number)
            SELECT $1, COALESCE(MAX(position) + 1, 0), $2, $3, $5, $4
            FROM work_links WHERE work_id = $1
            "#,
        )
        .bind(owner)
        .bind(kind)
        .bind(target)
        .bind(control_number)
        .bind(title)
        .execute(&mut *conn)
        .await?;
    }

    touch(conn, owner).await?;
    tracing::debug!(work_id = owner, target, tag = kind.tag(), upgraded = upgraded > 0, "Mirrored entry");
    Ok(())
}

/// Whether a linked 773/774 held by `work_id` may still be mirrored on `target`.
///
/// A host must be an active collection. A constituent must be an active part
/// whose own host entry still points back at `work_id`.
fn mirror_still_valid(work_id: i32, kind: LinkKind, target: &LinkTarget) -> bool {
    if !target.active {
        return false;
    }
    match kind {
        LinkKind::Host => target.bibliographic_level == BibliographicLevel::Collection,
        LinkKind::Constituent => {
            target.bibliographic_level == BibliographicLevel::Part && target.host_id == Some(work_id)
        }
        LinkKind::Related => false,
    }
}

async fn touch(conn: &mut PgConnection, work_id: i32) -> AppResult<()> {
    sqlx::query("UPDATE works SET updated_at = NOW() WHERE id = $1")
        .bind(work_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Bump `updated_at` of every record holding an entry for the given work
async fn touch_referrers(conn: &mut PgConnection, work_id: i32, control_number: &str) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE works SET updated_at = NOW()
        WHERE id IN (
            SELECT work_id FROM work_links
            WHERE target_id = $1 OR (target_id IS NULL AND control_number = $2)
        )
        "#,
    )
    .bind(work_id)
    .bind(control_number)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn contains_pattern(term: &str) -> String {
    format!("%{}%", escape_like(term))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link_target(id: i32, level: BibliographicLevel, host_id: Option<i32>) -> LinkTarget {
        LinkTarget {
            id,
            control_number: format!("PR{:06}", id),
            title: format!("Record {}", id),
            bibliographic_level: level,
            active: true,
            host_id,
            constituent_count: 0,
        }
    }

    #[test]
    fn test_restored_part_keeps_host_while_collection_is_live() {
        let host = link_target(2, BibliographicLevel::Collection, None);
        assert!(mirror_still_valid(5, LinkKind::Host, &host));

        let mut gone = host.clone();
        gone.active = false;
        assert!(!mirror_still_valid(5, LinkKind::Host, &gone));

        let relevelled = link_target(2, BibliographicLevel::Independent, None);
        assert!(!mirror_still_valid(5, LinkKind::Host, &relevelled));
    }

    #[test]
    fn test_restored_collection_drops_part_that_moved() {
        let still_ours = link_target(7, BibliographicLevel::Part, Some(1));
        assert!(mirror_still_valid(1, LinkKind::Constituent, &still_ours));

        let moved = link_target(7, BibliographicLevel::Part, Some(9));
        assert!(!mirror_still_valid(1, LinkKind::Constituent, &moved));

        let detached = link_target(7, BibliographicLevel::Part, None);
        assert!(!mirror_still_valid(1, LinkKind::Constituent, &detached));

        let independent = link_target(7, BibliographicLevel::Independent, Some(1));
        assert!(!mirror_still_valid(1, LinkKind::Constituent, &independent));
    }

    #[test]
    fn test_number_formats() {
        assert_eq!(format_control_number("PR", 42), "PR000042");
        assert_eq!(format_control_number("MS", 1_234_567), "MS1234567");
        assert_eq!(format_signature("Mus.ms.", 7), "Mus.ms. 7");
    }

    #[test]
    fn test_home_signature_fills_blank_shelfmark() {
        let mut locations = vec![
            Location {
                institution: "D-B".into(),
                ..Default::default()
            },
            Location {
                institution: "XX-MUS".into(),
                shelfmark: Some(" ".into()),
                ..Default::default()
            },
        ];
        apply_home_signature(&mut locations, "XX-MUS", "Mus.pr. 3", true);
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].shelfmark, None);
        assert_eq!(locations[1].shelfmark.as_deref(), Some("Mus.pr. 3"));
    }

    #[test]
    fn test_home_signature_keeps_explicit_shelfmark() {
        let mut locations = vec![Location {
            institution: "XX-MUS".into(),
            shelfmark: Some("Rara 12".into()),
            ..Default::default()
        }];
        apply_home_signature(&mut locations, "XX-MUS", "Mus.pr. 3", true);
        assert_eq!(locations[0].shelfmark.as_deref(), Some("Rara 12"));
    }

    #[test]
    fn test_home_location_appended_on_creation_only() {
        let mut locations = Vec::new();
        apply_home_signature(&mut locations, "XX-MUS", "Mus.ms. 1", false);
        assert!(locations.is_empty());

        apply_home_signature(&mut locations, "XX-MUS", "Mus.ms. 1", true);
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].institution, "XX-MUS");
        assert_eq!(locations[0].shelfmark.as_deref(), Some("Mus.ms. 1"));
    }

    #[test]
    fn test_contains_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("50%"), "%50\\%%");
    }
}
