//! Insights response models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Summary statistics over the processed dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightsSnapshot {
    pub total_transactions: u64,
    pub fraud_cases: u64,
    pub fraud_percentage: f64,
    /// `YYYY-MM-DD` -> fraud count, ordered by date
    pub fraud_trends: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceFraud {
    pub device_id: String,
    pub fraud_cases: u64,
}

/// Fraud cases grouped by device, highest count first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceBreakdown {
    pub devices: Vec<DeviceFraud>,
}
