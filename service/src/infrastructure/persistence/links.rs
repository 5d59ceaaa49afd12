use std::borrow::Cow;

use carebridge_common::database::Database;
use carebridge_common::{
    CREATED_FIELD_NAME, ID_FIELD_NAME, INSTITUTION_ID_FIELD_NAME, INSTITUTION_LINKS_TABLE_NAME,
    InstitutionLink, LinkId, LinkPairing, LinkRequestId, NewInstitutionLink, TENANT_ID_FIELD_NAME,
    UPDATED_FIELD_NAME, USER_ID_FIELD_NAME,
};
use itertools::Itertools;
use sqlx::Row;
use sqlx::postgres::PgRow;
use sqlx::types::Uuid;

use crate::domain::RepositoryError;
use crate::domain::requests::links::InstitutionLinkRepository;
use crate::infrastructure::persistence::query::{Condition, ConditionValue, QueryBuilder, SortDirection};
use crate::infrastructure::persistence::schema::{ColumnRef, Table};
use crate::infrastructure::persistence::{FromRow, bound_query, from_rows, plain_columns};

const TABLE: Table<'static> = Table::new(INSTITUTION_LINKS_TABLE_NAME, "l");

const ROLE: &str = "role";
const ACTIVE: &str = "active";
const SOURCE_REQUEST_ID: &str = "source_request_id";

const COLUMNS: [&str; 9] = [
    ID_FIELD_NAME,
    USER_ID_FIELD_NAME,
    INSTITUTION_ID_FIELD_NAME,
    TENANT_ID_FIELD_NAME,
    ROLE,
    ACTIVE,
    SOURCE_REQUEST_ID,
    CREATED_FIELD_NAME,
    UPDATED_FIELD_NAME,
];

#[derive(Clone)]
pub struct PostgresInstitutionLinkRepository {
    database: &'static Database,
}

impl PostgresInstitutionLinkRepository {
    pub fn new(database: &'static Database) -> Self {
        Self { database }
    }

    async fn select(&self, conditions: Vec<Condition<'static>>) -> Result<Vec<InstitutionLink>, RepositoryError> {
        let (sql, params) = conditions
            .into_iter()
            .fold(QueryBuilder::from(TABLE).select(select_columns()), |builder, condition| {
                builder.where_condition(condition)
            })
            .order_by(column(UPDATED_FIELD_NAME), SortDirection::Descending)
            .build();

        let rows = bound_query(&sql, params)
            .fetch_all(self.database.database_pool())
            .await?;
        from_rows(rows)
    }

    async fn set_active(
        &self,
        id: LinkId,
        active: bool,
        source_request_id: Option<LinkRequestId>,
    ) -> Result<InstitutionLink, RepositoryError> {
        let sql = format!(
            "UPDATE \"{table}\"
            SET \"{active}\" = $2, \"{source}\" = COALESCE($3, \"{source}\"), \"{updated}\" = now()
            WHERE \"{id}\" = $1
            RETURNING {columns}",
            table = INSTITUTION_LINKS_TABLE_NAME,
            active = ACTIVE,
            source = SOURCE_REQUEST_ID,
            updated = UPDATED_FIELD_NAME,
            id = ID_FIELD_NAME,
            columns = plain_columns(&COLUMNS),
        );

        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(active)
            .bind(source_request_id.map(|source| source.as_uuid()))
            .fetch_optional(self.database.database_pool())
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let link = InstitutionLink::from_row(&row)?;
        tracing::debug!(link_id = %link.id, active, "institution link updated");
        Ok(link)
    }
}

fn column(name: &'static str) -> ColumnRef<'static> {
    Cow::Owned(TABLE.column(name))
}

fn select_columns() -> Vec<ColumnRef<'static>> {
    COLUMNS.into_iter().map(column).collect()
}

/// Tenant-less pairings only match tenant-less rows
fn pairing_conditions(pairing: &LinkPairing) -> Vec<Condition<'static>> {
    let tenant = match pairing.tenant_id {
        Some(tenant_id) => Condition::Equals {
            column: column(TENANT_ID_FIELD_NAME),
            value: ConditionValue::Uuid(tenant_id.as_uuid()),
        },
        None => Condition::IsNull {
            column: column(TENANT_ID_FIELD_NAME),
        },
    };

    vec![
        Condition::Equals {
            column: column(USER_ID_FIELD_NAME),
            value: ConditionValue::Uuid(pairing.user_id.as_uuid()),
        },
        Condition::Equals {
            column: column(INSTITUTION_ID_FIELD_NAME),
            value: ConditionValue::Uuid(pairing.institution_id.as_uuid()),
        },
        Condition::Equals {
            column: column(ROLE),
            value: ConditionValue::Text(pairing.role.as_str().to_string()),
        },
        tenant,
    ]
}

fn active_condition() -> Condition<'static> {
    Condition::Equals {
        column: column(ACTIVE),
        value: ConditionValue::Boolean(true),
    }
}

impl InstitutionLinkRepository for PostgresInstitutionLinkRepository {
    async fn find_for_pairing(&self, pairing: &LinkPairing) -> Result<Vec<InstitutionLink>, RepositoryError> {
        self.select(pairing_conditions(pairing)).await
    }

    async fn find_active(&self, pairing: &LinkPairing) -> Result<Vec<InstitutionLink>, RepositoryError> {
        let mut conditions = pairing_conditions(pairing);
        conditions.push(active_condition());
        self.select(conditions).await
    }

    async fn find_active_by_sources(
        &self,
        request_ids: &[LinkRequestId],
    ) -> Result<Vec<InstitutionLink>, RepositoryError> {
        if request_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sources = request_ids.iter().map(|id| id.as_uuid()).unique().collect();
        self.select(vec![
            Condition::AnyOf {
                column: column(SOURCE_REQUEST_ID),
                values: sources,
            },
            active_condition(),
        ])
        .await
    }

    async fn create(&self, link: NewInstitutionLink) -> Result<InstitutionLink, RepositoryError> {
        let sql = format!(
            "INSERT INTO \"{table}\" (\"{user}\", \"{institution}\", \"{tenant}\", \"{role}\", \"{active}\", \"{source}\")
            VALUES ($1, $2, $3, $4, true, $5)
            RETURNING {columns}",
            table = INSTITUTION_LINKS_TABLE_NAME,
            user = USER_ID_FIELD_NAME,
            institution = INSTITUTION_ID_FIELD_NAME,
            tenant = TENANT_ID_FIELD_NAME,
            role = ROLE,
            active = ACTIVE,
            source = SOURCE_REQUEST_ID,
            columns = plain_columns(&COLUMNS),
        );

        let row = sqlx::query(&sql)
            .bind(link.user_id.as_uuid())
            .bind(link.institution_id.as_uuid())
            .bind(link.tenant_id.map(|tenant| tenant.as_uuid()))
            .bind(link.role.as_str())
            .bind(link.source_request_id.map(|source| source.as_uuid()))
            .fetch_one(self.database.database_pool())
            .await?;

        let link = InstitutionLink::from_row(&row)?;
        tracing::info!(link_id = %link.id, user_id = %link.user_id, institution_id = %link.institution_id, "institution link created");
        Ok(link)
    }

    async fn activate(&self, id: LinkId, source_request_id: LinkRequestId) -> Result<InstitutionLink, RepositoryError> {
        self.set_active(id, true, Some(source_request_id)).await
    }

    async fn deactivate(&self, id: LinkId) -> Result<InstitutionLink, RepositoryError> {
        self.set_active(id, false, None).await
    }
}

impl FromRow for InstitutionLink {
    fn from_row(row: &PgRow) -> Result<Self, RepositoryError> {
        let role: String = row.try_get(ROLE)?;
        let tenant_id: Option<Uuid> = row.try_get(TENANT_ID_FIELD_NAME)?;
        let source_request_id: Option<Uuid> = row.try_get(SOURCE_REQUEST_ID)?;

        Ok(InstitutionLink {
            id: row.try_get::<Uuid, _>(ID_FIELD_NAME)?.into(),
            user_id: row.try_get::<Uuid, _>(USER_ID_FIELD_NAME)?.into(),
            institution_id: row.try_get::<Uuid, _>(INSTITUTION_ID_FIELD_NAME)?.into(),
            tenant_id: tenant_id.map(Into::into),
            role: role.parse()?,
            active: row.try_get(ACTIVE)?,
            source_request_id: source_request_id.map(Into::into),
            created_at: row.try_get(CREATED_FIELD_NAME)?,
            updated_at: row.try_get(UPDATED_FIELD_NAME)?,
        })
    }
}
