#[allow(unused_imports)]
pub mod prelude {
    pub use super::list::Entity as List;
    pub use super::list_item::Entity as ListItem;
}

pub mod list {
    use sea_orm::entity::prelude::*;

    #[sea_orm::model]
    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "lists")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        #[sea_orm(indexed)]
        pub customer_id: i64,
        pub name: String,
        #[sea_orm(default_expr = "Expr::current_timestamp()")]
        pub created_at: DateTimeWithTimeZone,
        #[sea_orm(default_expr = "Expr::current_timestamp()")]
        pub updated_at: DateTimeWithTimeZone,
        #[sea_orm(has_many)]
        pub items: HasMany<super::list_item::Entity>,
    }

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod list_item {
    use sea_orm::entity::prelude::*;

    #[sea_orm::model]
    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "list_items")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub id: Uuid,
        #[sea_orm(indexed)]
        pub list_id: Uuid,
        pub sku: String,
        pub quantity: i32,
        /// Submission order within the owning list's last upsert batch.
        /// Items of one batch share a transaction-stable `created_at`, so
        /// this is the tie-breaker that keeps reads deterministic.
        pub position: i32,
        #[sea_orm(default_expr = "Expr::current_timestamp()")]
        pub created_at: DateTimeWithTimeZone,
        #[sea_orm(belongs_to, from = "list_id", to = "id", on_delete = "Cascade")]
        pub list: HasOne<super::list::Entity>,
    }

    impl ActiveModelBehavior for ActiveModel {}
}
