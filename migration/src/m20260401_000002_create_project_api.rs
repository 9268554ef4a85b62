use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProjectApi::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProjectApi::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProjectApi::ProjectId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProjectApi::ApiPath).string().not_null())
                    .col(ColumnDef::new(ProjectApi::Method).string().not_null())
                    .col(ColumnDef::new(ProjectApi::TableId).uuid().null())
                    .col(
                        ColumnDef::new(ProjectApi::IsCustom)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ProjectApi::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ProjectApi::Configuration)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProjectApi::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProjectApi::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    // Dropping a table keeps its API rows (deactivated) but detaches them.
                    .foreign_key(
                        ForeignKey::create()
                            .from(ProjectApi::Table, ProjectApi::TableId)
                            .to(ProjectDatabase::Table, ProjectDatabase::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_project_api_project_table")
                    .table(ProjectApi::Table)
                    .col(ProjectApi::ProjectId)
                    .col(ProjectApi::TableId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProjectApi::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ProjectDatabase {
    Table,
    Id,
}

#[derive(Iden)]
enum ProjectApi {
    Table,
    Id,
    ProjectId,
    ApiPath,
    Method,
    TableId,
    IsCustom,
    IsActive,
    Configuration,
    CreatedAt,
    UpdatedAt,
}
