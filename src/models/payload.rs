use serde::{Deserialize, Serialize};

fn default_currency() -> String {
    "EUR".to_string()
}

/// Structured travel results attached to a bot reply.
///
/// Every field is optional and sparse: absence means "section not
/// applicable", not an error. The wire names follow the backend schema
/// (`plan_sugerido`, `hotelId`), the Rust names do not.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TravelPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flights: Option<Vec<FlightOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotels: Option<Vec<HotelOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pois: Option<Vec<PoiInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(
        rename = "plan_sugerido",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub daily_plan: Option<Vec<DayPlan>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightOption {
    #[serde(default)]
    pub airline: Option<String>,
    #[serde(default)]
    pub flight_number: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub departure_time: Option<String>,
    #[serde(default)]
    pub arrival_time: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub stops: u32,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotelOption {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "hotelId", default)]
    pub hotel_id: Option<String>,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub price_per_night: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoiInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayPlan {
    pub day: u32,
    #[serde(default)]
    pub activities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetInfo {
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_payload_decodes() {
        let payload: TravelPayload = serde_json::from_str(r#"{"city":"Roma"}"#).unwrap();
        assert_eq!(payload.city.as_deref(), Some("Roma"));
        assert!(payload.flights.is_none());
        assert!(payload.budget.is_none());
    }

    #[test]
    fn test_wire_field_names() {
        let json = r#"{
            "hotels": [{"name": "Hotel Foro", "hotelId": "HF1", "rating": 4}],
            "plan_sugerido": [{"day": 1, "activities": ["Coliseo"]}]
        }"#;
        let payload: TravelPayload = serde_json::from_str(json).unwrap();
        let hotels = payload.hotels.unwrap();
        assert_eq!(hotels[0].hotel_id.as_deref(), Some("HF1"));
        assert_eq!(hotels[0].currency, "EUR");
        let plan = payload.daily_plan.unwrap();
        assert_eq!(plan[0].day, 1);
        assert_eq!(plan[0].activities, vec!["Coliseo".to_string()]);
    }
}
