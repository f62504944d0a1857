use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum AppType {
    #[sea_orm(string_value = "web")]
    Web,
    #[sea_orm(string_value = "mobile")]
    Mobile,
    #[sea_orm(string_value = "desktop")]
    Desktop,
    #[sea_orm(string_value = "distributed")]
    Distributed,
    #[sea_orm(string_value = "microservices")]
    Microservices,
    #[sea_orm(string_value = "other")]
    Other,
}

impl AppType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppType::Web => "web",
            AppType::Mobile => "mobile",
            AppType::Desktop => "desktop",
            AppType::Distributed => "distributed",
            AppType::Microservices => "microservices",
            AppType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "generating")]
    Generating,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalability {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    #[default]
    Standard,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Security {
    Basic,
    #[default]
    Standard,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Performance {
    #[default]
    Standard,
    High,
    Critical,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct NonFunctionalRequirements {
    pub scalability: Scalability,
    pub availability: Availability,
    pub security: Security,
    pub performance: Performance,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, FromJsonQueryResult)]
#[serde(rename_all = "camelCase")]
pub struct TechPreferences {
    pub backend_language: String,
    pub frameworks: Vec<String>,
    pub databases: Vec<String>,
    pub architecture_style: String,
}

/// One section of the AI response, rendered as a single diagram view.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagram {
    pub title: String,
    pub description: String,
    pub diagram_text: String,
    pub explanation: String,
    pub url: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct DiagramList(pub Vec<Diagram>);

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct StringList(pub Vec<String>);

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "requirements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,

    // Form wizard input
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub app_type: AppType,
    #[sea_orm(column_type = "Json")]
    pub functional_requirements: StringList,
    #[sea_orm(column_type = "Json")]
    pub non_functional_requirements: NonFunctionalRequirements,
    #[sea_orm(column_type = "Json")]
    pub tech_preferences: TechPreferences,
    #[sea_orm(column_type = "Text")]
    pub additional_context: String,

    // Generation results
    pub status: RequirementStatus,
    #[sea_orm(column_type = "Json")]
    pub diagrams: DiagramList,
    #[sea_orm(column_type = "Text", nullable)]
    pub design_document: Option<String>,
    #[sea_orm(column_type = "Json")]
    pub diagram_urls: StringList,

    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::generation_status::Entity")]
    GenerationStatuses,
}

impl Related<super::generation_status::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GenerationStatuses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
