use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProjectDatabase::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProjectDatabase::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProjectDatabase::ProjectId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProjectDatabase::TableName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProjectDatabase::DisplayName)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProjectDatabase::Description).text().null())
                    .col(
                        ColumnDef::new(ProjectDatabase::IsBuiltIn)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ProjectDatabase::IsGenerated)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ProjectDatabase::ApiEnabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ProjectDatabase::Structure)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProjectDatabase::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProjectDatabase::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .unique()
                    .name("uq_project_database_project_table")
                    .table(ProjectDatabase::Table)
                    .col(ProjectDatabase::ProjectId)
                    .col(ProjectDatabase::TableName)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProjectDatabase::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ProjectDatabase {
    Table,
    Id,
    ProjectId,
    TableName,
    DisplayName,
    Description,
    IsBuiltIn,
    IsGenerated,
    ApiEnabled,
    Structure,
    CreatedAt,
    UpdatedAt,
}
