pub mod conversation;
pub mod message;
pub mod payload;

pub use conversation::Conversation;
pub use message::{now_ts, Message, Role};
pub use payload::{BudgetInfo, DayPlan, FlightOption, HotelOption, PoiInfo, TravelPayload};
