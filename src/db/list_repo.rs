use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use sea_orm::sea_query::Expr;
use uuid::Uuid;

use super::entities::prelude::{List, ListItem};
use super::entities::{list, list_item};

/// A validated item ready for insertion. Produced by the dispatch layer's
/// decode-and-filter step, never straight from request JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewListItem {
    pub sku: String,
    pub quantity: i32,
}

/// Whether an upsert updated an existing list or created a fresh one. A
/// stale or foreign `list_id` falls back to creation rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Updated,
    Created,
}

/// Lists owned by a customer, most recently updated first, each with its
/// item count. Items themselves are not loaded on this path.
pub async fn lists_for(
    db: &DatabaseConnection,
    customer_id: i64,
) -> Result<Vec<(list::Model, u64)>, sea_orm::DbErr> {
    let lists = List::find()
        .filter(list::Column::CustomerId.eq(customer_id))
        .order_by_desc(list::Column::UpdatedAt)
        .all(db)
        .await?;

    let mut annotated = Vec::with_capacity(lists.len());
    for model in lists {
        let count = ListItem::find()
            .filter(list_item::Column::ListId.eq(model.id))
            .count(db)
            .await?;
        annotated.push((model, count));
    }
    Ok(annotated)
}

/// A single list with its items in insertion order. Returns `None` when no
/// list with that id exists *for that customer* — a list owned by another
/// customer is indistinguishable from a missing one.
pub async fn get_list(
    db: &DatabaseConnection,
    customer_id: i64,
    list_id: Uuid,
) -> Result<Option<(list::Model, Vec<list_item::Model>)>, sea_orm::DbErr> {
    let Some(model) = find_owned(db, customer_id, list_id).await? else {
        return Ok(None);
    };
    let items = items_of(db, list_id).await?;
    Ok(Some((model, items)))
}

/// Creates or updates a list and replaces its entire item set, in one
/// transaction. If `list_id` is given, a conditional update scoped to
/// (id, customer) runs first; zero rows affected means the id is stale or
/// foreign, and a brand-new list is inserted instead. Any failure rolls
/// back the whole call — readers never observe a partial item replace.
pub async fn upsert_list(
    db: &DatabaseConnection,
    customer_id: i64,
    list_id: Option<Uuid>,
    name: &str,
    items: &[NewListItem],
) -> Result<(Uuid, UpsertOutcome), sea_orm::DbErr> {
    let txn = db.begin().await?;
    let now = Utc::now().fixed_offset();

    let (resolved_id, outcome) = match list_id {
        Some(id) => {
            let updated = List::update_many()
                .col_expr(list::Column::Name, Expr::value(name))
                .col_expr(list::Column::UpdatedAt, Expr::value(now))
                .filter(list::Column::Id.eq(id))
                .filter(list::Column::CustomerId.eq(customer_id))
                .exec(&txn)
                .await?
                .rows_affected;
            if updated > 0 {
                (id, UpsertOutcome::Updated)
            } else {
                (insert_list(&txn, customer_id, name).await?, UpsertOutcome::Created)
            }
        }
        None => (insert_list(&txn, customer_id, name).await?, UpsertOutcome::Created),
    };

    ListItem::delete_many()
        .filter(list_item::Column::ListId.eq(resolved_id))
        .exec(&txn)
        .await?;

    if !items.is_empty() {
        let models = items.iter().enumerate().map(|(index, item)| list_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            list_id: Set(resolved_id),
            sku: Set(item.sku.clone()),
            quantity: Set(item.quantity),
            position: Set(index as i32),
            ..Default::default()
        });
        ListItem::insert_many(models).exec(&txn).await?;
    }

    txn.commit().await?;
    Ok((resolved_id, outcome))
}

/// Deletes a list scoped to (id, customer); items go with it via the
/// cascade. Returns whether a row matched.
pub async fn delete_list(
    db: &DatabaseConnection,
    customer_id: i64,
    list_id: Uuid,
) -> Result<bool, sea_orm::DbErr> {
    let result = List::delete_many()
        .filter(list::Column::Id.eq(list_id))
        .filter(list::Column::CustomerId.eq(customer_id))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// The ordered item sequence of an owned list, for handing to a downstream
/// order flow. Same ownership rule as `get_list`.
pub async fn items_for(
    db: &DatabaseConnection,
    customer_id: i64,
    list_id: Uuid,
) -> Result<Option<Vec<list_item::Model>>, sea_orm::DbErr> {
    if find_owned(db, customer_id, list_id).await?.is_none() {
        return Ok(None);
    }
    Ok(Some(items_of(db, list_id).await?))
}

async fn find_owned(
    db: &DatabaseConnection,
    customer_id: i64,
    list_id: Uuid,
) -> Result<Option<list::Model>, sea_orm::DbErr> {
    List::find()
        .filter(list::Column::Id.eq(list_id))
        .filter(list::Column::CustomerId.eq(customer_id))
        .one(db)
        .await
}

async fn items_of(
    db: &DatabaseConnection,
    list_id: Uuid,
) -> Result<Vec<list_item::Model>, sea_orm::DbErr> {
    ListItem::find()
        .filter(list_item::Column::ListId.eq(list_id))
        .order_by_asc(list_item::Column::CreatedAt)
        .order_by_asc(list_item::Column::Position)
        .all(db)
        .await
}

async fn insert_list(
    txn: &sea_orm::DatabaseTransaction,
    customer_id: i64,
    name: &str,
) -> Result<Uuid, sea_orm::DbErr> {
    let id = Uuid::new_v4();
    let model = list::ActiveModel {
        id: Set(id),
        customer_id: Set(customer_id),
        name: Set(name.to_string()),
        ..Default::default()
    };
    model.insert(txn).await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase, MockExecResult, RuntimeErr};
    use uuid::Uuid;

    use super::{NewListItem, upsert_list};

    fn items(skus: &[&str]) -> Vec<NewListItem> {
        skus.iter()
            .map(|sku| NewListItem {
                sku: sku.to_string(),
                quantity: 1,
            })
            .collect()
    }

    #[tokio::test]
    async fn a_failed_item_insert_rolls_back_the_whole_upsert() {
        // Name update and item delete succeed, then the bulk item insert
        // fails. The error must propagate and nothing may commit.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                },
            ])
            .append_query_errors([DbErr::Exec(RuntimeErr::Internal(
                "insert failed".to_string(),
            ))])
            .into_connection();

        let result = upsert_list(
            &db,
            42,
            Some(Uuid::new_v4()),
            "Weekly",
            &items(&["A", "B"]),
        )
        .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("insert failed"));

        // The update and delete ran inside the transaction that then
        // unwound; the failed insert was the last statement attempted.
        let trace = format!("{:?}", db.into_transaction_log());
        assert!(trace.contains("UPDATE"));
        assert!(trace.contains("DELETE"));
        assert!(!trace.contains("COMMIT"));
    }
}
