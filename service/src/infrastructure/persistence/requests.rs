use std::borrow::Cow;

use carebridge_common::database::Database;
use carebridge_common::{
    CREATED_FIELD_NAME, ID_FIELD_NAME, INSTITUTION_ID_FIELD_NAME, InstitutionInfo,
    LINK_REQUESTS_TABLE_NAME, LinkRequest, LinkRequestId, REVIEWED_BY_FIELD_NAME,
    REVIEWED_FIELD_NAME, RequestStatus, RequesterInfo, STATUS_FIELD_NAME, TENANT_ID_FIELD_NAME,
    USER_ID_FIELD_NAME,
};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::PgRow;
use sqlx::types::Uuid;

use crate::domain::RepositoryError;
use crate::domain::requests::{LinkRequestFilter, LinkRequestPatch, LinkRequestRepository};
use crate::infrastructure::persistence::query::{Condition, ConditionValue, QueryBuilder, SortDirection};
use crate::infrastructure::persistence::schema::{ColumnRef, Table};
use crate::infrastructure::persistence::{FromRow, bound_query, from_rows, plain_columns};

const TABLE: Table<'static> = Table::new(LINK_REQUESTS_TABLE_NAME, "r");

const USER_NAME: &str = "user_name";
const USER_EMAIL: &str = "user_email";
const USER_CATEGORY: &str = "user_category";
const INSTITUTION_NAME: &str = "institution_name";

const COLUMNS: [&str; 18] = [
    ID_FIELD_NAME,
    USER_ID_FIELD_NAME,
    USER_NAME,
    USER_EMAIL,
    USER_CATEGORY,
    INSTITUTION_ID_FIELD_NAME,
    INSTITUTION_NAME,
    "institution_type",
    "institution_is_partner",
    "relationship_type",
    "enrollment_type",
    "message",
    STATUS_FIELD_NAME,
    "review_notes",
    REVIEWED_FIELD_NAME,
    REVIEWED_BY_FIELD_NAME,
    CREATED_FIELD_NAME,
    TENANT_ID_FIELD_NAME,
];

#[derive(Clone)]
pub struct PostgresLinkRequestRepository {
    database: &'static Database,
}

impl PostgresLinkRequestRepository {
    pub fn new(database: &'static Database) -> Self {
        Self { database }
    }

    async fn current_status(&self, id: LinkRequestId) -> Result<Option<RequestStatus>, RepositoryError> {
        let sql = format!(
            "SELECT \"{}\" FROM \"{}\" WHERE \"{}\" = $1",
            STATUS_FIELD_NAME, LINK_REQUESTS_TABLE_NAME, ID_FIELD_NAME
        );
        let status: Option<String> = sqlx::query_scalar(&sql)
            .bind(id.as_uuid())
            .fetch_optional(self.database.database_pool())
            .await?;
        Ok(status.map(|s| s.parse::<RequestStatus>()).transpose()?)
    }
}

fn select_columns() -> Vec<ColumnRef<'static>> {
    COLUMNS
        .into_iter()
        .map(|name| Cow::Owned(TABLE.column(name)))
        .collect()
}

fn filter_conditions(filter: &LinkRequestFilter) -> Vec<Condition<'static>> {
    let mut conditions = Vec::new();
    if let Some(status) = filter.status {
        conditions.push(Condition::Equals {
            column: Cow::Owned(TABLE.column(STATUS_FIELD_NAME)),
            value: ConditionValue::Text(status.as_str().to_string()),
        });
    }
    if let Some(category) = filter.user_category {
        conditions.push(Condition::Equals {
            column: Cow::Owned(TABLE.column(USER_CATEGORY)),
            value: ConditionValue::Text(category.as_str().to_string()),
        });
    }
    if let Some(tenant_id) = filter.tenant_id {
        conditions.push(Condition::Equals {
            column: Cow::Owned(TABLE.column(TENANT_ID_FIELD_NAME)),
            value: ConditionValue::Uuid(tenant_id.as_uuid()),
        });
    }
    if let Some(needle) = &filter.search {
        conditions.push(Condition::AnyMatch(
            [USER_NAME, USER_EMAIL, INSTITUTION_NAME]
                .into_iter()
                .map(|name| Condition::Contains {
                    column: Cow::Owned(TABLE.column(name)),
                    value: needle.clone(),
                })
                .collect(),
        ));
    }
    conditions
}

impl LinkRequestRepository for PostgresLinkRequestRepository {
    async fn find(&self, filter: &LinkRequestFilter) -> Result<Vec<LinkRequest>, RepositoryError> {
        let builder = filter_conditions(filter)
            .into_iter()
            .fold(QueryBuilder::from(TABLE).select(select_columns()), |builder, condition| {
                builder.where_condition(condition)
            })
            .order_by(Cow::Owned(TABLE.column(CREATED_FIELD_NAME)), SortDirection::Descending)
            .order_by(Cow::Owned(TABLE.column(ID_FIELD_NAME)), SortDirection::Ascending)
            .limit(filter.limit)
            .offset(filter.offset);

        let (sql, params) = builder.build();
        let rows = bound_query(&sql, params)
            .fetch_all(self.database.database_pool())
            .await?;
        from_rows(rows)
    }

    async fn find_by_id(&self, id: LinkRequestId) -> Result<LinkRequest, RepositoryError> {
        let (sql, params) = QueryBuilder::from(TABLE)
            .select(select_columns())
            .where_condition(Condition::Equals {
                column: Cow::Owned(TABLE.column(ID_FIELD_NAME)),
                value: ConditionValue::Uuid(id.as_uuid()),
            })
            .build();

        let row = bound_query(&sql, params)
            .fetch_optional(self.database.database_pool())
            .await?
            .ok_or(RepositoryError::NotFound)?;
        LinkRequest::from_row(&row)
    }

    async fn update(&self, id: LinkRequestId, patch: LinkRequestPatch) -> Result<LinkRequest, RepositoryError> {
        patch.validate()?;

        // the pending check is part of the statement, a concurrent review cannot be overwritten
        let sql = format!(
            "UPDATE \"{table}\"
            SET \"{status}\" = $2, \"review_notes\" = $3, \"{reviewed_by}\" = $4, \"{reviewed_at}\" = COALESCE($5, now())
            WHERE \"{id}\" = $1 AND \"{status}\" = 'pending'
            RETURNING {columns}",
            table = LINK_REQUESTS_TABLE_NAME,
            status = STATUS_FIELD_NAME,
            reviewed_by = REVIEWED_BY_FIELD_NAME,
            reviewed_at = REVIEWED_FIELD_NAME,
            id = ID_FIELD_NAME,
            columns = plain_columns(&COLUMNS),
        );

        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .bind(patch.status.as_str())
            .bind(patch.review_notes)
            .bind(patch.reviewed_by.map(|reviewer| reviewer.as_uuid()))
            .bind(patch.reviewed_at)
            .fetch_optional(self.database.database_pool())
            .await?;

        match row {
            Some(row) => LinkRequest::from_row(&row),
            None => match self.current_status(id).await? {
                None => Err(RepositoryError::NotFound),
                Some(status) => Err(RepositoryError::Conflict(format!(
                    "link request is already {}",
                    status
                ))),
            },
        }
    }
}

impl FromRow for LinkRequest {
    fn from_row(row: &PgRow) -> Result<Self, RepositoryError> {
        let status: String = row.try_get(STATUS_FIELD_NAME)?;
        let category: String = row.try_get(USER_CATEGORY)?;
        let reviewed_by: Option<Uuid> = row.try_get(REVIEWED_BY_FIELD_NAME)?;
        let tenant_id: Option<Uuid> = row.try_get(TENANT_ID_FIELD_NAME)?;

        Ok(LinkRequest {
            id: row.try_get::<Uuid, _>(ID_FIELD_NAME)?.into(),
            requester: RequesterInfo {
                id: row.try_get::<Uuid, _>(USER_ID_FIELD_NAME)?.into(),
                name: row.try_get(USER_NAME)?,
                email: row.try_get(USER_EMAIL)?,
                category: category.parse()?,
            },
            institution: InstitutionInfo {
                id: row.try_get::<Uuid, _>(INSTITUTION_ID_FIELD_NAME)?.into(),
                name: row.try_get(INSTITUTION_NAME)?,
                institution_type: row.try_get("institution_type")?,
                is_partner: row.try_get("institution_is_partner")?,
            },
            relationship_type: row.try_get("relationship_type")?,
            enrollment_type: row.try_get("enrollment_type")?,
            message: row.try_get("message")?,
            status: status.parse()?,
            review_notes: row.try_get("review_notes")?,
            reviewed_at: row.try_get::<Option<DateTime<Utc>>, _>(REVIEWED_FIELD_NAME)?,
            reviewed_by: reviewed_by.map(Into::into),
            created_at: row.try_get(CREATED_FIELD_NAME)?,
            tenant_id: tenant_id.map(Into::into),
        })
    }
}
