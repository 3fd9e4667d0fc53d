//! Campaign API payloads

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-task progress flags reported by the campaign
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    #[serde(default)]
    pub has_xp_to_refresh: bool,
    #[serde(default)]
    pub has_already_earned: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusResponse {
    #[serde(default)]
    pub xp_refresh_tracking_by_task: BTreeMap<String, TaskProgress>,
}

/// Tasks partitioned by what the account can do with them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskCatalog {
    /// Rewards waiting to be claimed
    pub ready: Vec<String>,
    /// Not yet earned, eligible for execution
    pub available: Vec<String>,
}

impl TaskCatalog {
    pub fn from_status(status: &TaskStatusResponse) -> Self {
        let mut catalog = Self::default();
        for (task, progress) in &status.xp_refresh_tracking_by_task {
            if progress.has_xp_to_refresh {
                catalog.ready.push(task.clone());
            } else if !progress.has_already_earned {
                catalog.available.push(task.clone());
            }
        }
        catalog
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.available.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollResponse {
    #[serde(default)]
    pub is_user_verified: bool,
}

/// Account standing in the campaign
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStats {
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub total_xp: u64,
    #[serde(default)]
    pub rank: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ClaimRequest<'a> {
    pub address: String,
    pub task: &'a str,
    pub signed_message: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct AddressRequest {
    pub address: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_partition() {
        let json = r#"{
            "xpRefreshTrackingByTask": {
                "SEND_ZETA": {"hasXpToRefresh": true, "hasAlreadyEarned": true},
                "RECEIVE_BTC": {"hasXpToRefresh": false, "hasAlreadyEarned": false},
                "POOL_DEPOSIT": {"hasXpToRefresh": false, "hasAlreadyEarned": true}
            }
        }"#;
        let status: TaskStatusResponse = serde_json::from_str(json).unwrap();
        let catalog = TaskCatalog::from_status(&status);

        assert_eq!(catalog.ready, vec!["SEND_ZETA".to_string()]);
        assert_eq!(catalog.available, vec!["RECEIVE_BTC".to_string()]);
    }

    #[test]
    fn test_missing_fields_default() {
        let status: TaskStatusResponse = serde_json::from_str("{}").unwrap();
        assert!(TaskCatalog::from_status(&status).is_empty());

        let stats: AccountStats = serde_json::from_str(r#"{"level": 3, "totalXp": 1200}"#).unwrap();
        assert_eq!(stats.rank, 0);
        assert_eq!(stats.total_xp, 1200);
    }

    #[test]
    fn test_claim_request_shape() {
        let body = serde_json::to_value(ClaimRequest {
            address: "0xabc".into(),
            task: "SEND_ZETA",
            signed_message: "0xsig",
        })
        .unwrap();
        assert_eq!(body["signedMessage"], "0xsig");
        assert_eq!(body["task"], "SEND_ZETA");
    }
}
