//! Order audit events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEventType {
    OrderCreated,
    SampleReceived,
    SmearReceived,
    SmearAnalyzed,
    PathReviewOrdered,
    PathReviewCompleted,
    ReportCorrected,
    SmearDiscarded,
}

impl OrderEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderEventType::OrderCreated => "ORDER_CREATED",
            OrderEventType::SampleReceived => "SAMPLE_RECEIVED",
            OrderEventType::SmearReceived => "SMEAR_RECEIVED",
            OrderEventType::SmearAnalyzed => "SMEAR_ANALYZED",
            OrderEventType::PathReviewOrdered => "PATH_REVIEW_ORDERED",
            OrderEventType::PathReviewCompleted => "PATH_REVIEW_COMPLETED",
            OrderEventType::ReportCorrected => "REPORT_CORRECTED",
            OrderEventType::SmearDiscarded => "SMEAR_DISCARDED",
        }
    }
}

impl std::fmt::Display for OrderEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub event_type: OrderEventType,
    pub user: String,
    pub at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn new(event_type: OrderEventType, user: &str, at: DateTime<Utc>) -> Self {
        Self {
            event_type,
            user: user.to_string(),
            at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_serializes_in_screaming_case() {
        let json = serde_json::to_string(&OrderEventType::PathReviewOrdered).unwrap();
        assert_eq!(json, "\"PATH_REVIEW_ORDERED\"");
    }

    #[test]
    fn display_matches_serialized_form() {
        for event_type in [
            OrderEventType::OrderCreated,
            OrderEventType::SmearAnalyzed,
            OrderEventType::PathReviewCompleted,
            OrderEventType::SmearDiscarded,
        ] {
            let json = serde_json::to_string(&event_type).unwrap();
            assert_eq!(json, format!("\"{event_type}\""));
        }
    }
}
