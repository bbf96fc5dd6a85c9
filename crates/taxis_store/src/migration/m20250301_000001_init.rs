use sea_orm_migration::prelude::*;

use crate::db::{AttributeSchemas, EntityAttributes};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(EntityAttributes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EntityAttributes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(EntityAttributes::EntityId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EntityAttributes::AttributeName)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(EntityAttributes::TableName)
                            .text()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_entity_attributes_entity_attr")
                    .table(EntityAttributes::Table)
                    .col(EntityAttributes::EntityId)
                    .col(EntityAttributes::AttributeName)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AttributeSchemas::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AttributeSchemas::TableName)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AttributeSchemas::SchemaVersion)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AttributeSchemas::SchemaDefinition)
                            .text()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_attribute_schemas")
                            .col(AttributeSchemas::TableName)
                            .col(AttributeSchemas::SchemaVersion),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AttributeSchemas::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EntityAttributes::Table).to_owned())
            .await?;
        Ok(())
    }
}
