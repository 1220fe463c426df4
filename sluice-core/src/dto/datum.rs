//! Datum DTOs

use serde::{Deserialize, Serialize};

use crate::domain::datum::DatumInfo;

/// Request one page of a job's datums. `page_size <= 0` returns all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDatumRequest {
    pub job_id: String,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub page_size: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListDatumResponse {
    pub datum_infos: Vec<DatumInfo>,
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub total_pages: i64,
}

/// Streamed variant: page metadata rides on the first record only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDatumStreamResponse {
    pub datum_info: DatumInfo,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub total_pages: Option<i64>,
}
