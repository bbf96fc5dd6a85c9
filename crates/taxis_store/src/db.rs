use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum EntityAttributes {
    Table,
    Id,
    EntityId,
    AttributeName,
    TableName,
}

#[derive(Iden, Clone, Copy)]
pub enum AttributeSchemas {
    Table,
    TableName,
    SchemaVersion,
    SchemaDefinition,
}
