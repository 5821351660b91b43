use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Directory entry. Employees are managed elsewhere; this service only reads them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[schema(
    example = json!({
        "id": 7,
        "first_name": "Lucia",
        "last_name": "Paredes",
        "dni": "45879632",
        "schedule_id": 1
    })
)]
pub struct Employee {
    #[schema(example = 7)]
    pub id: u64,

    #[schema(example = "Lucia")]
    pub first_name: String,

    #[schema(example = "Paredes")]
    pub last_name: String,

    #[schema(example = "45879632", nullable = true)]
    pub dni: Option<String>,

    #[schema(example = 1, nullable = true)]
    pub schedule_id: Option<u64>,
}

impl Employee {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}
