use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{DeviceError, SwitchError};
use crate::state::AppState;
use crate::types::DatasetInfo;

/// Envelope used by every dataset endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(message: Option<String>, data: Option<T>) -> Self {
        Self {
            success: true,
            message,
            data,
            error: None,
        }
    }

    fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            data: None,
            error: Some(error.into()),
        }
    }
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

/// Dataset id as sent by clients: a number or a numeric string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DatasetIdParam {
    Number(i64),
    Text(String),
}

impl DatasetIdParam {
    fn parse(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Select dataset request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectDatasetRequest {
    #[serde(default)]
    pub dataset_id: Option<DatasetIdParam>,
}

/// List the recorded datasets with their ids
pub async fn list_datasets(State(state): State<Arc<AppState>>) -> ApiResult<Vec<DatasetInfo>> {
    let datasets = state.switch.catalog().infos();
    (StatusCode::OK, Json(ApiResponse::ok(None, Some(datasets))))
}

/// Switch replay to a dataset; same path as the `selectDataset` message
pub async fn select_dataset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SelectDatasetRequest>,
) -> ApiResult<DatasetInfo> {
    let Some(param) = req.dataset_id else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::fail("datasetId is required in the request body")),
        );
    };
    let Some(dataset_id) = param.parse() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::fail("datasetId must be an integer")),
        );
    };

    match state.switch.select_replay_by_id(dataset_id).await {
        Ok(descriptor) => {
            info!("Selected dataset via API: {}", descriptor.relative_path);
            let id = usize::try_from(dataset_id).unwrap_or_default();
            (
                StatusCode::OK,
                Json(ApiResponse::ok(
                    Some(format!("Selected dataset: {}", descriptor.filename)),
                    Some(DatasetInfo::new(id, &descriptor)),
                )),
            )
        }
        Err(SwitchError::UnknownDataset(id)) => {
            warn!("Dataset {} not found", id);
            (
                StatusCode::NOT_FOUND,
                Json(ApiResponse::fail(format!("Dataset with ID {} not found", id))),
            )
        }
        Err(e) => {
            error!("Failed to select dataset {}: {}", dataset_id, e);
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ApiResponse::fail(e.to_string())),
            )
        }
    }
}

/// Switch back to the live device
pub async fn select_live(State(state): State<Arc<AppState>>) -> ApiResult<()> {
    match state.switch.select_live().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::ok(Some("Streaming from live device".to_string()), None)),
        ),
        Err(e) => {
            error!("Failed to select live device: {}", e);
            let status = match e {
                SwitchError::Device(DeviceError::Authentication(_)) => StatusCode::UNAUTHORIZED,
                _ => StatusCode::BAD_GATEWAY,
            };
            (status, Json(ApiResponse::fail(e.to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_id_forms() {
        let req: SelectDatasetRequest = serde_json::from_str(r#"{"datasetId": 3}"#).unwrap();
        assert_eq!(req.dataset_id.unwrap().parse(), Some(3));

        let req: SelectDatasetRequest = serde_json::from_str(r#"{"datasetId": " 7 "}"#).unwrap();
        assert_eq!(req.dataset_id.unwrap().parse(), Some(7));

        let req: SelectDatasetRequest = serde_json::from_str(r#"{"datasetId": "x"}"#).unwrap();
        assert_eq!(req.dataset_id.unwrap().parse(), None);

        let req: SelectDatasetRequest = serde_json::from_str("{}").unwrap();
        assert!(req.dataset_id.is_none());
    }

    #[test]
    fn test_failure_envelope() {
        let json = serde_json::to_value(ApiResponse::<()>::fail("nope")).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "nope");
        assert!(json.get("data").is_none());
    }
}
