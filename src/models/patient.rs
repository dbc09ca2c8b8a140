use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read-only projection of the external patient record. The dispatcher
/// never writes patients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSummary {
    pub id: Uuid,
    pub medical_record_number: String,
    pub full_name: String,
    pub phone: Option<String>,
}
